use clap::Parser;
use minivsfs::cli_interface::MiniVsfsCli;

/// a CLI interface to create a MiniVSFS image, insert a file into one, or
/// verify one.
///
/// Every failure is terminal: the process exits with code 1 and a
/// diagnostic on standard error, and the input image is left untouched.
fn main() -> anyhow::Result<()> {
    env_logger::builder().format_timestamp_nanos().init();
    let args = MiniVsfsCli::parse();
    match args {
        MiniVsfsCli::Build(args) => {
            minivsfs::build::build(&args.image, args.size_kib, args.inodes)?;
        }
        MiniVsfsCli::Add(args) => {
            minivsfs::add::add(&args.input, &args.output, &args.file)?;
        }
        MiniVsfsCli::Check(args) => {
            minivsfs::check::check(&args.image)?;
        }
    }
    Ok(())
}
