use clap::Parser;

#[derive(Parser, Debug, PartialEq)]
#[command(author, version, about, long_about)]
pub enum MiniVsfsCli {
    /// create a new, empty image
    Build(BuildArgs),
    /// insert one file into an image's root directory
    Add(AddArgs),
    /// verify the checksums and allocation bookkeeping of an image
    Check(CheckArgs),
}

/// build a new image subcommand
#[derive(clap::Args, Debug, PartialEq)]
#[command(author, version, about = "create a new MiniVSFS image")]
pub struct BuildArgs {
    /// the path of the output image file
    #[clap(long)]
    pub image: String,
    /// total image size in KiB (180..=4096, multiple of 4)
    #[clap(long)]
    pub size_kib: u64,
    /// number of inodes (128..=512)
    #[clap(long)]
    pub inodes: u64,
}

/// insert a file subcommand
#[derive(clap::Args, Debug, PartialEq)]
#[command(author, version, about = "insert one file into an image")]
pub struct AddArgs {
    /// the path of the input image file
    #[clap(long)]
    pub input: String,
    /// the path of the output image file, may equal the input
    #[clap(long)]
    pub output: String,
    /// the host file to insert
    #[clap(long)]
    pub file: String,
}

/// check an image subcommand
#[derive(clap::Args, Debug, PartialEq)]
#[command(author, version, about = "verify an existing MiniVSFS image")]
pub struct CheckArgs {
    /// the path of the image file
    #[clap(long)]
    pub image: String,
}
