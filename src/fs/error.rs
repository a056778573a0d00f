use std::fmt;

/// Everything that can go wrong while building or mutating an image.
///
/// Three families: bad parameters ([Validation](FsError::Validation)),
/// failed host I/O ([Io](FsError::Io)), and exhausted on-disk capacity
/// ([FileTooLarge](FsError::FileTooLarge), [NoFreeInode](FsError::NoFreeInode),
/// [NoFreeDataBlock](FsError::NoFreeDataBlock),
/// [RootDirFull](FsError::RootDirFull)). [Corrupted](FsError::Corrupted)
/// covers images that fail structural or checksum validation on load.
/// All of them are terminal for the invoking operation.
#[derive(Debug)]
pub enum FsError {
    Validation(String),
    Io(std::io::Error),
    FileTooLarge { size: u64, max: u64 },
    NoFreeInode,
    NoFreeDataBlock,
    RootDirFull,
    Corrupted(String),
}

impl From<std::io::Error> for FsError {
    fn from(e: std::io::Error) -> Self {
        FsError::Io(e)
    }
}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation(msg) => write!(f, "invalid parameters: {msg}"),
            Self::Io(e) => write!(f, "image I/O error: {e}"),
            Self::FileTooLarge { size, max } => {
                write!(f, "file too big ({size} bytes, max {max} bytes)")
            }
            Self::NoFreeInode => write!(f, "no free inode"),
            Self::NoFreeDataBlock => write!(f, "no free data block"),
            Self::RootDirFull => write!(f, "root directory full"),
            Self::Corrupted(msg) => write!(f, "image corrupted: {msg}"),
        }
    }
}

impl std::error::Error for FsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

/// crate-wide result type
pub type Result<T> = std::result::Result<T, FsError>;
