use std::{fs::File, path::PathBuf};

use anyhow::Result;
use clap::Parser;
use v6fs::{storage::FileBackedStorage, v6fs::V6Fs};

#[derive(Parser)]
struct Args {
    /// V6 disk image file
    disk_file: PathBuf,
}

fn main() -> Result<()> {
    env_logger::init();

    let args = Args::parse();

    let disk_file = File::options().read(true).open(args.disk_file)?;
    let fs = V6Fs::open(FileBackedStorage::new(disk_file))?;
    fs.check()?;

    println!("filesystem is consistent");

    Ok(())
}
