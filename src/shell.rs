use std::fs::File;
use std::io::{BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::disk_format::block::BLOCK_SIZE;
use crate::metadata::FileAttributes;
use crate::storage::FileBackedStorage;
use crate::v6fs::{CopyIn, V6Fs};

const USAGE: &str = "\
commands:
    initfs <totalBlocks> <inodeCount>
    cpin <hostSrc> <v6Dest>
    cpout <v6Src> <hostDest>
    mkdir <v6Path>
    rm <v6Path>
or q to exit";

/// The interactive command surface over one backing file.
///
/// The engine is opened lazily so `initfs` can create the backing file from
/// scratch; command failures are printed and the session continues.
pub struct Shell {
    disk_path: PathBuf,
    fs: Option<V6Fs<FileBackedStorage>>,
}

impl Shell {
    pub fn new(disk_path: PathBuf) -> Shell {
        Shell {
            disk_path,
            fs: None,
        }
    }

    /// Runs the command loop until `q` or end of input.
    pub fn run(&mut self, input: &mut impl BufRead, output: &mut impl Write) -> Result<()> {
        let mut line = String::new();

        loop {
            write!(output, ">> ")?;
            output.flush()?;

            line.clear();
            if input.read_line(&mut line)? == 0 {
                // EOF ends the session like `q`
                break;
            }

            let tokens: Vec<&str> = line.split_whitespace().collect();
            let Some((&command, args)) = tokens.split_first() else {
                continue;
            };

            if command == "q" {
                writeln!(output, "exiting")?;
                break;
            }

            if let Err(err) = self.dispatch(command, args, output) {
                writeln!(output, "error: {err:#}")?;
            }
        }

        Ok(())
    }

    fn dispatch(&mut self, command: &str, args: &[&str], output: &mut impl Write) -> Result<()> {
        match (command, args) {
            ("initfs", [total_blocks, inode_count]) => {
                let total_blocks: u16 = total_blocks
                    .parse()
                    .context("totalBlocks must be a block count")?;
                let inode_count: u16 = inode_count
                    .parse()
                    .context("inodeCount must be an inode count")?;

                self.initfs(total_blocks, inode_count)?;
                writeln!(
                    output,
                    "filesystem initialized: {total_blocks} blocks, {inode_count} inodes"
                )?;
            }
            ("cpin", [source, dest]) => {
                let report = self.cpin(source, dest)?;
                if report.complete {
                    writeln!(output, "copied {} bytes into {dest}", report.bytes)?;
                } else {
                    writeln!(
                        output,
                        "out of free blocks: {} bytes copied into {dest} and kept",
                        report.bytes
                    )?;
                }
            }
            ("cpout", [source, dest]) => {
                let bytes = self.cpout(source, dest)?;
                writeln!(output, "copied {bytes} bytes out to {dest}")?;
            }
            ("mkdir", [path]) => {
                self.fs()?.make_directory(path)?;
                writeln!(output, "directory {path} created")?;
            }
            ("rm", [path]) => {
                self.fs()?.remove_file(path)?;
                writeln!(output, "{path} removed")?;
            }
            _ => {
                writeln!(output, "unrecognized command\n{USAGE}")?;
            }
        }

        Ok(())
    }

    /// Creates (or truncates) the backing file and formats it.
    fn initfs(&mut self, total_blocks: u16, inode_count: u16) -> Result<()> {
        let file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.disk_path)
            .context("unable to create the backing file")?;
        file.set_len(u64::from(total_blocks) * BLOCK_SIZE as u64)?;

        let storage = FileBackedStorage::new(file);
        self.fs = Some(V6Fs::format(storage, total_blocks, inode_count)?);

        Ok(())
    }

    fn cpin(&mut self, source: &str, dest: &str) -> Result<CopyIn> {
        let mut host =
            File::open(source).with_context(|| format!("unable to open host file {source}"))?;
        let attrs = host
            .metadata()
            .map(|metadata| FileAttributes::from(&metadata))
            .unwrap_or_default();

        Ok(self.fs()?.copy_in(&mut host, dest, &attrs)?)
    }

    fn cpout(&mut self, source: &str, dest: &str) -> Result<u64> {
        // buffer the content so the host file is only created once the
        // source is known to exist
        let mut content = vec![];
        self.fs()?.copy_out(source, &mut content)?;

        std::fs::write(dest, &content)
            .with_context(|| format!("unable to write host file {dest}"))?;

        Ok(content.len() as u64)
    }

    /// The engine over the backing file, opened lazily for commands that
    /// need an already initialized filesystem.
    fn fs(&mut self) -> Result<&mut V6Fs<FileBackedStorage>> {
        if self.fs.is_none() {
            let file = File::options()
                .read(true)
                .write(true)
                .open(&self.disk_path)
                .context("unable to open the backing file; run initfs first")?;

            self.fs = Some(V6Fs::open(FileBackedStorage::new(file))?);
        }

        Ok(self.fs.as_mut().expect("the engine was just installed"))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::path::Path;

    use super::*;

    fn temp_disk(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("v6fs-shell-{}-{name}", std::process::id()))
    }

    fn run_session(disk: &Path, script: &str) -> String {
        let mut shell = Shell::new(disk.to_path_buf());
        let mut output = vec![];
        shell
            .run(&mut Cursor::new(script.to_string()), &mut output)
            .unwrap();

        String::from_utf8(output).unwrap()
    }

    #[test]
    fn test_unrecognized_command_prints_usage() {
        let disk = temp_disk("usage");
        let output = run_session(&disk, "frobnicate\nq\n");

        assert!(output.contains("unrecognized command"));
        assert!(output.contains("initfs <totalBlocks> <inodeCount>"));
        // the loop survived to process `q`
        assert!(output.contains("exiting"));
    }

    #[test]
    fn test_errors_do_not_end_the_session() {
        let disk = temp_disk("errors");
        let _ = std::fs::remove_file(&disk);

        let output = run_session(&disk, "mkdir /docs\nq\n");

        // no backing file yet: the command fails but the prompt returns
        assert!(output.contains("error:"));
        assert!(output.contains("exiting"));
    }

    #[test]
    fn test_initfs_and_mkdir() {
        let disk = temp_disk("mkdir");
        let output = run_session(&disk, "initfs 100 16\nmkdir /docs\nmkdir /docs\nq\n");

        assert!(output.contains("filesystem initialized: 100 blocks, 16 inodes"));
        assert!(output.contains("directory /docs created"));
        assert!(output.contains("already exists"));

        let _ = std::fs::remove_file(&disk);
    }

    #[test]
    fn test_cpin_cpout_round_trip() {
        let disk = temp_disk("roundtrip");
        let host_in = temp_disk("roundtrip-in");
        let host_out = temp_disk("roundtrip-out");

        let content: Vec<u8> = (0..3000u32).map(|i| (i % 251) as u8).collect();
        std::fs::write(&host_in, &content).unwrap();

        let script = format!(
            "initfs 200 16\ncpin {} /f\ncpout /f {}\nq\n",
            host_in.display(),
            host_out.display()
        );
        let output = run_session(&disk, &script);

        assert!(output.contains("copied 3000 bytes into /f"));
        assert!(output.contains("copied 3000 bytes out to"));
        assert_eq!(std::fs::read(&host_out).unwrap(), content);

        for path in [&disk, &host_in, &host_out] {
            let _ = std::fs::remove_file(path);
        }
    }

    #[test]
    fn test_session_state_survives_across_commands() {
        let disk = temp_disk("state");
        let output = run_session(&disk, "initfs 100 16\nmkdir /a\nmkdir /a/b\nrm /a\nq\n");

        assert!(output.contains("directory /a/b created"));
        // removing a directory is rejected
        assert!(output.contains("is a directory"));

        let _ = std::fs::remove_file(&disk);
    }
}
