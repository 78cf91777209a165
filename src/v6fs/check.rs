use std::collections::{HashMap, HashSet};

use anyhow::{bail, Result};
use bitvec::vec::BitVec;
use log::warn;

use crate::disk_format::block::BLOCK_SIZE;
use crate::disk_format::free_list::FreeCache;
use crate::disk_format::inode::{InodeKind, NUM_ADDR, NUM_SINGLE_INDIRECT_SLOTS, ROOT_INODE};
use crate::storage::BlockStore;

use super::indirection::words;
use super::{BlockNumber, InodeNumber, V6Fs};

impl<S: BlockStore> V6Fs<S> {
    /// Checks the filesystem for consistency: every block accounted for at
    /// most once (reserved, owned by a live inode, or free), and a coherent
    /// directory tree reachable from the root.
    ///
    /// Leaked blocks (neither owned nor free) are only warned about; they
    /// can arise legitimately from an interrupted transfer.
    pub fn check(&self) -> Result<()> {
        self.check_blocks()?;
        self.check_tree()
    }

    fn check_blocks(&self) -> Result<()> {
        let num_blocks = usize::from(self.superblock().fsize);
        let first_data = usize::from(self.first_data_block());

        // a value of `true` means the block is accounted for
        let mut seen: BitVec = BitVec::repeat(false, num_blocks);
        for reserved in 0..first_data {
            seen.set(reserved, true);
        }

        let mut claim = |block: BlockNumber, owner: &str| -> Result<()> {
            let index = usize::from(block);
            if index < first_data || index >= num_blocks {
                bail!("{owner} references out-of-range block {block}");
            }
            if seen[index] {
                bail!("block {block} is claimed twice (last by {owner})");
            }
            seen.set(index, true);
            Ok(())
        };

        for inum in 1..=self.superblock().isize {
            let inode = self.read_inode(inum)?;
            if inode.kind() == InodeKind::Free {
                continue;
            }

            for block in self.file_block_numbers(&inode)? {
                claim(block, &format!("inode {inum}"))?;
            }

            // the indirection structure itself
            if inode.is_large() {
                for slot in 0..NUM_SINGLE_INDIRECT_SLOTS {
                    if inode.addr[slot] != 0 {
                        claim(inode.addr[slot], &format!("inode {inum} indirect"))?;
                    }
                }

                let double = inode.addr[NUM_ADDR - 1];
                if double != 0 {
                    claim(double, &format!("inode {inum} double indirect"))?;

                    let links = self.storage.read_block(double)?;
                    for link in words(&links).take_while(|b| *b != 0) {
                        claim(link, &format!("inode {inum} double indirect"))?;
                    }
                }
            }
        }

        // walk the free chain exactly as the allocator would drain it
        let mut cache = self.superblock().free;
        loop {
            while let Some(block) = cache.pop() {
                claim(block, "free list")?;
            }

            let link = cache.link();
            if link == 0 {
                break;
            }

            claim(link, "free chain link")?;
            cache = FreeCache::from_link_block(&self.storage.read_block(link)?)?;
        }

        if let Some(leaked) = seen.first_zero() {
            warn!("block {leaked} is neither in use nor free");
        }

        Ok(())
    }

    fn check_tree(&self) -> Result<()> {
        if self.read_inode(ROOT_INODE)?.kind() != InodeKind::Directory {
            bail!("root inode does not represent a directory");
        }

        let mut queue = vec![ROOT_INODE];
        let mut seen_directories = HashSet::<InodeNumber>::new();
        let mut directory_parents = HashMap::from([(ROOT_INODE, ROOT_INODE)]);

        while let Some(inum) = queue.pop() {
            let inode = self.read_inode(inum)?;

            match inode.kind() {
                InodeKind::Free => bail!("directory tree includes free inode {inum}"),
                InodeKind::Regular => {
                    let owned = self.file_block_numbers(&inode)?.len();
                    if (inode.size() as usize).div_ceil(BLOCK_SIZE) > owned {
                        bail!(
                            "inode {inum} doesn't have enough blocks to store {} bytes",
                            inode.size()
                        );
                    }
                }
                InodeKind::Directory => {
                    if !seen_directories.insert(inum) {
                        bail!("directory tree includes a loop through inode {inum}");
                    }

                    let parent = *directory_parents
                        .get(&inum)
                        .expect("this directory was discovered through the entries of some directory");

                    let mut names = HashSet::new();

                    for entry in self.read_directory(inum)? {
                        if entry.inum > self.superblock().isize {
                            bail!(
                                "directory {inum} entry {} points to invalid inode {}",
                                entry.name,
                                entry.inum
                            );
                        }

                        let name = entry.name.to_string();
                        if !names.insert(name.clone()) {
                            bail!("directory {inum} contains duplicate entry {name}");
                        }

                        if name == "." {
                            if entry.inum != inum {
                                bail!("'.' entry of directory {inum} doesn't point to self");
                            }
                            continue;
                        }

                        if name == ".." {
                            if entry.inum != parent {
                                bail!("'..' entry of directory {inum} doesn't point to its parent");
                            }
                            continue;
                        }

                        if self.read_inode(entry.inum)?.kind() == InodeKind::Directory {
                            directory_parents.insert(entry.inum, inum);
                        }
                        queue.push(entry.inum);
                    }

                    if !names.contains(".") {
                        bail!("directory {inum} has no '.' entry");
                    }
                    if !names.contains("..") {
                        bail!("directory {inum} has no '..' entry");
                    }
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use crate::disk_format::directory_entry::DirectoryEntry;
    use crate::metadata::FileAttributes;
    use crate::storage::MemoryStorage;

    use super::*;

    fn populated_fs() -> V6Fs<MemoryStorage> {
        let mut fs = V6Fs::format(MemoryStorage::new(512), 512, 32).unwrap();

        fs.make_directory("/docs").unwrap();
        fs.make_directory("/docs/old").unwrap();
        fs.copy_in(
            &mut Cursor::new(vec![7; 20 * BLOCK_SIZE]),
            "/docs/data",
            &FileAttributes::default(),
        )
        .unwrap();

        fs
    }

    #[test]
    fn test_consistent_filesystem_passes() {
        let fs = populated_fs();
        fs.check().unwrap();
    }

    #[test]
    fn test_consistent_after_removal() {
        let mut fs = populated_fs();
        fs.remove_file("/docs/data").unwrap();
        fs.check().unwrap();
    }

    #[test]
    fn test_detects_double_claimed_block() {
        let fs = populated_fs();

        // point a file's first block at the root directory's entry block
        let root_block = fs.read_inode(ROOT_INODE).unwrap().addr[0];
        let data = match fs.resolve(ROOT_INODE, "/docs/data").unwrap() {
            crate::v6fs::Resolution::Found { inum, .. } => inum,
            other => panic!("unexpected resolution: {other:?}"),
        };
        fs.update_inode(data, |inode| inode.addr[0] = root_block)
            .unwrap();

        assert!(fs.check().is_err());
    }

    #[test]
    fn test_detects_free_block_claimed_by_inode() {
        let fs = populated_fs();

        let data = match fs.resolve(ROOT_INODE, "/docs/data").unwrap() {
            crate::v6fs::Resolution::Found { inum, .. } => inum,
            other => panic!("unexpected resolution: {other:?}"),
        };

        // block 300 sits untouched on the free list; claiming it from an
        // inode makes it both free and in use
        fs.update_inode(data, |inode| inode.addr[0] = 300).unwrap();

        assert!(fs.check().is_err());
    }

    #[test]
    fn test_detects_entry_to_free_inode() {
        let mut fs = populated_fs();

        let victim = fs.allocate_inode().unwrap();
        fs.add_directory_entry(ROOT_INODE, DirectoryEntry::new(victim, "dangling").unwrap())
            .unwrap();

        assert!(fs.check().is_err());
    }

    #[test]
    fn test_detects_duplicate_names() {
        let mut fs = populated_fs();

        let docs = match fs.resolve(ROOT_INODE, "/docs").unwrap() {
            crate::v6fs::Resolution::Found { inum, .. } => inum,
            other => panic!("unexpected resolution: {other:?}"),
        };
        fs.add_directory_entry(ROOT_INODE, DirectoryEntry::new(docs, "docs").unwrap())
            .unwrap();

        assert!(fs.check().is_err());
    }
}
