use std::io;
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use v6fs::shell::Shell;

#[derive(Parser)]
struct Args {
    /// V6 disk image file
    disk_file: PathBuf,
}

fn main() -> Result<()> {
    env_logger::init();

    let args = Args::parse();

    let mut shell = Shell::new(args.disk_file);
    shell.run(&mut io::stdin().lock(), &mut io::stdout())
}
