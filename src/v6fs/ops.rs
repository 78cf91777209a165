use std::io::{Read, Write};

use log::{info, warn};

use crate::disk_format::block::BLOCK_SIZE;
use crate::disk_format::directory_entry::{DirectoryEntry, EntryName};
use crate::disk_format::inode::{Inode, InodeKind, FREE_INODE, ROOT_INODE};
use crate::error::FsError;
use crate::metadata::FileAttributes;
use crate::storage::BlockStore;

use super::indirection::FileWriter;
use super::path::Resolution;
use super::{InodeNumber, V6Fs};

/// The result of a copy-in: how much arrived, and whether all of it did.
#[derive(Debug, PartialEq, Eq)]
pub struct CopyIn {
    pub inum: InodeNumber,
    pub bytes: u64,
    /// false when allocation failed mid-transfer and a partial file was kept
    pub complete: bool,
}

impl<S: BlockStore> V6Fs<S> {
    /// Copies `source` into the filesystem at `path`, streaming block-sized
    /// chunks through the growth machinery.
    ///
    /// The name is registered before the transfer starts, so on mid-transfer
    /// exhaustion the partially written file stays reachable and is reported
    /// as incomplete rather than rolled back.
    pub fn copy_in(
        &mut self,
        source: &mut impl Read,
        path: &str,
        attrs: &FileAttributes,
    ) -> Result<CopyIn, FsError> {
        let (parent, name) = match self.resolve(ROOT_INODE, path)? {
            Resolution::Found { .. } => return Err(FsError::AlreadyExists(path.to_string())),
            Resolution::Absent { parent, name } => (parent, name),
            Resolution::IntermediateMissing { component } => {
                return Err(FsError::MissingDirectory(component))
            }
        };

        // reject unstorable names before anything is allocated
        let name: EntryName = name.as_str().try_into()?;

        let inum = self.allocate_inode()?;
        let mut inode = Inode::new(InodeKind::Regular, 1);
        inode.uid = attrs.uid;
        inode.gid = attrs.gid;
        inode.actime = attrs.atime;
        inode.modtime = attrs.mtime;
        self.write_inode(inum, inode)?;

        if let Err(err) = self.add_directory_entry(parent, DirectoryEntry { inum, name }) {
            self.write_inode(inum, FREE_INODE)?;
            return Err(err);
        }

        let mut writer = FileWriter::new(self, inum, inode);
        let mut buf = [0; BLOCK_SIZE];
        let mut outcome = Ok(true);
        loop {
            let n = match read_chunk(source, &mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(err) => {
                    outcome = Err(err);
                    break;
                }
            };

            match writer.append(&buf[..n]) {
                Ok(()) => {}
                Err(FsError::OutOfBlocks | FsError::FileTooLarge) => {
                    outcome = Ok(false);
                    break;
                }
                Err(err) => {
                    outcome = Err(err);
                    break;
                }
            }
        }

        let bytes = writer.bytes_written();
        writer.finish()?;
        let complete = outcome?;

        if complete {
            info!("[inode #{inum}] copied {bytes} bytes into {path}");
        } else {
            warn!("[inode #{inum}] partial copy into {path}: {bytes} bytes kept");
        }

        Ok(CopyIn {
            inum,
            bytes,
            complete,
        })
    }

    /// Copies the file at `path` out of the filesystem into `dest`, emitting
    /// its blocks in slot order and truncating the final block to the
    /// recorded byte size. Returns the number of bytes written.
    pub fn copy_out(&self, path: &str, dest: &mut impl Write) -> Result<u64, FsError> {
        let inum = match self.resolve(ROOT_INODE, path)? {
            Resolution::Found { inum, .. } => inum,
            Resolution::Absent { .. } => return Err(FsError::NotFound(path.to_string())),
            Resolution::IntermediateMissing { component } => {
                return Err(FsError::MissingDirectory(component))
            }
        };

        let inode = self.read_inode(inum)?;
        match inode.kind() {
            InodeKind::Regular => {}
            InodeKind::Directory => return Err(FsError::IsDirectory(path.to_string())),
            InodeKind::Free => return Err(FsError::NotFound(path.to_string())),
        }

        let mut remaining = u64::from(inode.size());
        for block_number in self.file_block_numbers(&inode)? {
            if remaining == 0 {
                break;
            }

            let block = self.storage.read_block(block_number)?;
            let n = remaining.min(BLOCK_SIZE as u64) as usize;
            dest.write_all(&block[..n])?;
            remaining -= n as u64;
        }

        let written = u64::from(inode.size()) - remaining;
        info!("[inode #{inum}] copied {written} bytes out of {path}");

        Ok(written)
    }

    /// Creates a directory at `path` with `.` and `..` entries and links it
    /// into its parent.
    pub fn make_directory(&mut self, path: &str) -> Result<InodeNumber, FsError> {
        let (parent, name) = match self.resolve(ROOT_INODE, path)? {
            Resolution::Found { .. } => return Err(FsError::AlreadyExists(path.to_string())),
            Resolution::Absent { parent, name } => (parent, name),
            Resolution::IntermediateMissing { component } => {
                return Err(FsError::MissingDirectory(component))
            }
        };

        let name: EntryName = name.as_str().try_into()?;

        let inum = self.allocate_inode()?;
        let attrs = FileAttributes::now();
        let mut inode = Inode::new(InodeKind::Directory, 2);
        inode.actime = attrs.atime;
        inode.modtime = attrs.mtime;
        self.write_inode(inum, inode)?;

        if let Err(err) = self.link_directory(inum, parent, name) {
            // release whatever entry blocks made it in before the failure
            let mut dead = self.read_inode(inum)?;
            self.free_file_blocks(&mut dead)?;
            self.write_inode(inum, FREE_INODE)?;
            return Err(err);
        }

        self.update_inode(parent, |p| p.nlinks = p.nlinks.saturating_add(1))?;

        info!("[inode #{inum}] created directory {path}");

        Ok(inum)
    }

    fn link_directory(
        &mut self,
        inum: InodeNumber,
        parent: InodeNumber,
        name: EntryName,
    ) -> Result<(), FsError> {
        self.add_directory_entry(
            inum,
            DirectoryEntry::new(inum, ".").expect("'.' is a valid name"),
        )?;
        self.add_directory_entry(
            inum,
            DirectoryEntry::new(parent, "..").expect("'..' is a valid name"),
        )?;
        self.add_directory_entry(parent, DirectoryEntry { inum, name })
    }

    /// Removes the regular file at `path`: frees its blocks through the
    /// reverse of the growth walk, tombstones the parent's entry, and resets
    /// the inode record. Directories are rejected.
    pub fn remove_file(&mut self, path: &str) -> Result<(), FsError> {
        let (parent, inum) = match self.resolve(ROOT_INODE, path)? {
            Resolution::Found { parent, inum } => (parent, inum),
            Resolution::Absent { .. } => return Err(FsError::NotFound(path.to_string())),
            Resolution::IntermediateMissing { component } => {
                return Err(FsError::MissingDirectory(component))
            }
        };

        let mut inode = self.read_inode(inum)?;
        match inode.kind() {
            InodeKind::Regular => {}
            InodeKind::Directory => return Err(FsError::IsDirectory(path.to_string())),
            InodeKind::Free => return Err(FsError::NotFound(path.to_string())),
        }

        self.free_file_blocks(&mut inode)?;
        self.remove_directory_entry(parent, inum)?;
        self.write_inode(inum, FREE_INODE)?;

        info!("[inode #{inum}] removed {path}");

        Ok(())
    }
}

/// Reads up to a full block, tolerating short reads from the source.
fn read_chunk(source: &mut impl Read, buf: &mut [u8; BLOCK_SIZE]) -> Result<usize, FsError> {
    let mut filled = 0;
    while filled < BLOCK_SIZE {
        let n = source.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }

    Ok(filled)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use crate::disk_format::inode::{NUM_INDIRECT, NUM_SINGLE_INDIRECT_SLOTS};
    use crate::storage::MemoryStorage;

    use super::*;

    fn fresh_fs(total_blocks: u16, inode_count: u16) -> V6Fs<MemoryStorage> {
        V6Fs::format(MemoryStorage::new(total_blocks), total_blocks, inode_count).unwrap()
    }

    fn patterned(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    fn round_trip(fs: &mut V6Fs<MemoryStorage>, path: &str, content: &[u8]) {
        let report = fs
            .copy_in(
                &mut Cursor::new(content.to_vec()),
                path,
                &FileAttributes::default(),
            )
            .unwrap();
        assert!(report.complete);
        assert_eq!(report.bytes, content.len() as u64);

        let mut out = vec![];
        let written = fs.copy_out(path, &mut out).unwrap();
        assert_eq!(written, content.len() as u64);
        assert_eq!(out, content);
    }

    mod copy {
        use super::*;

        #[test]
        fn test_round_trip_small_sizes() {
            let mut fs = fresh_fs(256, 32);

            for (i, len) in [0, 1, 100, BLOCK_SIZE, BLOCK_SIZE + 1, 5000]
                .into_iter()
                .enumerate()
            {
                round_trip(&mut fs, &format!("/f{i}"), &patterned(len));
            }
        }

        #[test]
        fn test_round_trip_direct_boundary() {
            let mut fs = fresh_fs(256, 32);

            // exactly eight blocks stays in direct mode
            round_trip(&mut fs, "/eight", &patterned(8 * BLOCK_SIZE));
            let eight = match fs.resolve(ROOT_INODE, "/eight").unwrap() {
                Resolution::Found { inum, .. } => fs.read_inode(inum).unwrap(),
                other => panic!("unexpected resolution: {other:?}"),
            };
            assert!(!eight.is_large());

            // one byte more flips the large bit, content intact
            round_trip(&mut fs, "/nine", &patterned(8 * BLOCK_SIZE + 1));
            let nine = match fs.resolve(ROOT_INODE, "/nine").unwrap() {
                Resolution::Found { inum, .. } => fs.read_inode(inum).unwrap(),
                other => panic!("unexpected resolution: {other:?}"),
            };
            assert!(nine.is_large());
        }

        #[test]
        fn test_round_trip_double_indirect() {
            let mut fs = fresh_fs(2000, 16);

            let len = (NUM_SINGLE_INDIRECT_SLOTS * NUM_INDIRECT + 3) * BLOCK_SIZE + 17;
            round_trip(&mut fs, "/big", &patterned(len));
        }

        #[test]
        fn test_copy_in_existing_name() {
            let mut fs = fresh_fs(128, 16);

            round_trip(&mut fs, "/f", b"content");
            let err = fs
                .copy_in(
                    &mut Cursor::new(b"again".to_vec()),
                    "/f",
                    &FileAttributes::default(),
                )
                .unwrap_err();
            assert!(matches!(err, FsError::AlreadyExists(_)));
        }

        #[test]
        fn test_copy_in_missing_parent() {
            let mut fs = fresh_fs(128, 16);

            let err = fs
                .copy_in(
                    &mut Cursor::new(b"content".to_vec()),
                    "/nowhere/f",
                    &FileAttributes::default(),
                )
                .unwrap_err();
            assert!(matches!(err, FsError::MissingDirectory(_)));
        }

        #[test]
        fn test_copy_in_stamps_attributes() {
            let mut fs = fresh_fs(128, 16);

            let attrs = FileAttributes {
                uid: 9,
                gid: 4,
                atime: [0x0001, 0x2345],
                mtime: [0x0001, 0x2346],
            };
            let report = fs
                .copy_in(&mut Cursor::new(b"content".to_vec()), "/f", &attrs)
                .unwrap();

            let inode = fs.read_inode(report.inum).unwrap();
            assert_eq!(inode.uid, 9);
            assert_eq!(inode.gid, 4);
            assert_eq!(inode.actime, [0x0001, 0x2345]);
            assert_eq!(inode.modtime, [0x0001, 0x2346]);
        }

        #[test]
        fn test_partial_copy_is_kept() {
            // a tiny disk runs out of blocks mid-transfer
            let mut fs = fresh_fs(16, 16);

            let content = patterned(32 * BLOCK_SIZE);
            let report = fs
                .copy_in(
                    &mut Cursor::new(content.clone()),
                    "/partial",
                    &FileAttributes::default(),
                )
                .unwrap();

            assert!(!report.complete);
            assert!(report.bytes > 0);
            assert!(report.bytes < content.len() as u64);

            // the partial file is reachable and holds a prefix of the source
            let mut out = vec![];
            let written = fs.copy_out("/partial", &mut out).unwrap();
            assert_eq!(written, report.bytes);
            assert_eq!(out, content[..report.bytes as usize]);
        }

        #[test]
        fn test_copy_out_missing() {
            let fs = fresh_fs(128, 16);

            let mut out = vec![];
            assert!(matches!(
                fs.copy_out("/ghost", &mut out).unwrap_err(),
                FsError::NotFound(_)
            ));
            assert!(matches!(
                fs.copy_out("/ghost/child", &mut out).unwrap_err(),
                FsError::MissingDirectory(_)
            ));
        }

        #[test]
        fn test_copy_out_directory_rejected() {
            let mut fs = fresh_fs(128, 16);
            fs.make_directory("/docs").unwrap();

            let mut out = vec![];
            assert!(matches!(
                fs.copy_out("/docs", &mut out).unwrap_err(),
                FsError::IsDirectory(_)
            ));
        }
    }

    mod make_directory {
        use super::*;

        #[test]
        fn test_creates_dot_entries() {
            let mut fs = fresh_fs(128, 16);

            let docs = fs.make_directory("/docs").unwrap();
            let entries = fs.read_directory(docs).unwrap();

            assert_eq!(entries.len(), 2);
            assert!(entries[0].name.matches("."));
            assert_eq!(entries[0].inum, docs);
            assert!(entries[1].name.matches(".."));
            assert_eq!(entries[1].inum, ROOT_INODE);
        }

        #[test]
        fn test_bumps_parent_nlinks() {
            let mut fs = fresh_fs(128, 16);

            let before = fs.read_inode(ROOT_INODE).unwrap().nlinks;
            fs.make_directory("/docs").unwrap();
            assert_eq!(fs.read_inode(ROOT_INODE).unwrap().nlinks, before + 1);
        }

        #[test]
        fn test_nested() {
            let mut fs = fresh_fs(128, 16);

            let a = fs.make_directory("/a").unwrap();
            let b = fs.make_directory("/a/b").unwrap();

            let entries = fs.read_directory(b).unwrap();
            assert_eq!(entries[1].inum, a);
        }

        #[test]
        fn test_existing_name_rejected() {
            let mut fs = fresh_fs(128, 16);

            fs.make_directory("/docs").unwrap();
            assert!(matches!(
                fs.make_directory("/docs").unwrap_err(),
                FsError::AlreadyExists(_)
            ));
        }

        #[test]
        fn test_missing_intermediate_rejected() {
            let mut fs = fresh_fs(128, 16);

            assert!(matches!(
                fs.make_directory("/a/b").unwrap_err(),
                FsError::MissingDirectory(_)
            ));
        }

        #[test]
        fn test_inode_exhaustion() {
            // isize 2: the root plus exactly one more inode
            let mut fs = fresh_fs(128, 2);

            fs.make_directory("/one").unwrap();
            assert!(matches!(
                fs.make_directory("/two").unwrap_err(),
                FsError::OutOfInodes
            ));
        }

        #[test]
        fn test_overlong_name_rejected_before_allocation() {
            let mut fs = fresh_fs(128, 16);

            assert!(matches!(
                fs.make_directory("/much-too-long-a-name").unwrap_err(),
                FsError::InvalidName(_)
            ));

            // no inode was consumed by the failed attempt
            assert_eq!(fs.allocate_inode().unwrap(), 2);
        }
    }

    mod remove {
        use super::*;

        #[test]
        fn test_remove_then_not_found() {
            let mut fs = fresh_fs(128, 16);

            round_trip(&mut fs, "/f", &patterned(3000));
            fs.remove_file("/f").unwrap();

            let mut out = vec![];
            assert!(matches!(
                fs.copy_out("/f", &mut out).unwrap_err(),
                FsError::NotFound(_)
            ));
            assert!(matches!(
                fs.remove_file("/f").unwrap_err(),
                FsError::NotFound(_)
            ));
        }

        #[test]
        fn test_remove_directory_rejected() {
            let mut fs = fresh_fs(128, 16);

            fs.make_directory("/docs").unwrap();
            assert!(matches!(
                fs.remove_file("/docs").unwrap_err(),
                FsError::IsDirectory(_)
            ));
        }

        #[test]
        fn test_remove_frees_inode_and_blocks() {
            let mut fs = fresh_fs(64, 16);

            let report = fs
                .copy_in(
                    &mut Cursor::new(patterned(20 * BLOCK_SIZE)),
                    "/f",
                    &FileAttributes::default(),
                )
                .unwrap();
            fs.remove_file("/f").unwrap();

            assert_eq!(fs.read_inode(report.inum).unwrap().kind(), InodeKind::Free);

            // freed blocks are recycled: the same content fits again
            round_trip(&mut fs, "/g", &patterned(20 * BLOCK_SIZE));
        }

        #[test]
        fn test_remove_large_file_recycles_indirect_blocks() {
            let mut fs = fresh_fs(600, 16);

            let content = patterned(300 * BLOCK_SIZE);
            round_trip(&mut fs, "/big", &content);
            fs.remove_file("/big").unwrap();
            round_trip(&mut fs, "/big2", &content);
        }
    }

    mod scenario {
        use super::*;

        #[test]
        fn test_session() {
            // initfs 10000 500
            let mut fs = fresh_fs(10000, 500);

            fs.make_directory("/docs").unwrap();

            let content = patterned(40 * BLOCK_SIZE + 123);
            let report = fs
                .copy_in(
                    &mut Cursor::new(content.clone()),
                    "/docs/localfile.txt",
                    &FileAttributes::default(),
                )
                .unwrap();
            assert!(report.complete);

            let mut out = vec![];
            fs.copy_out("/docs/localfile.txt", &mut out).unwrap();
            assert_eq!(out, content);

            assert!(matches!(
                fs.remove_file("/docs").unwrap_err(),
                FsError::IsDirectory(_)
            ));

            fs.remove_file("/docs/localfile.txt").unwrap();
            assert!(matches!(
                fs.copy_out("/docs/localfile.txt", &mut vec![]).unwrap_err(),
                FsError::NotFound(_)
            ));
        }
    }
}
