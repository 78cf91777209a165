use crate::disk_format::block::Block;
use crate::disk_format::directory_entry::{
    DirectoryEntry, DIRECTORY_ENTRIES_PER_BLOCK, DIRECTORY_ENTRY_SIZE, FREE_DIRECTORY_ENTRY,
};
use crate::disk_format::inode::{InodeKind, NUM_ADDR};
use crate::error::FsError;
use crate::storage::BlockStore;

use super::{BlockNumber, InodeNumber, V6Fs};

// Directories always use direct addressing: eight blocks of 32 entries each.

impl<S: BlockStore> V6Fs<S> {
    /// Writes `entry` into the first free slot of the directory's blocks,
    /// allocating a zero-filled block once the used ones are packed.
    pub(crate) fn add_directory_entry(
        &mut self,
        dir_inum: InodeNumber,
        entry: DirectoryEntry,
    ) -> Result<(), FsError> {
        let mut dir = self.read_inode(dir_inum)?;
        debug_assert_eq!(dir.kind(), InodeKind::Directory);

        for slot in 0..NUM_ADDR {
            if dir.addr[slot] == 0 {
                let block_number = self.allocate_zeroed_block()?;
                dir.addr[slot] = block_number;
                self.write_entry_at(block_number, 0, &entry)?;

                dir.set_size(entry_end(slot, 0).max(dir.size()));
                return self.write_inode(dir_inum, dir);
            }

            let block = self.storage.read_block(dir.addr[slot])?;
            if let Some(index) = entries_in(&block)?.iter().position(|e| e.inum == 0) {
                self.write_entry_at(dir.addr[slot], index, &entry)?;

                let end = entry_end(slot, index);
                if dir.size() < end {
                    dir.set_size(end);
                    self.write_inode(dir_inum, dir)?;
                }
                return Ok(());
            }
        }

        Err(FsError::DirectoryFull)
    }

    /// The inode number bound to the first live entry named `name`.
    pub(crate) fn lookup_directory_entry(
        &self,
        dir_inum: InodeNumber,
        name: &str,
    ) -> Result<Option<InodeNumber>, FsError> {
        let dir = self.read_inode(dir_inum)?;
        debug_assert_eq!(dir.kind(), InodeKind::Directory);

        for slot in 0..NUM_ADDR {
            if dir.addr[slot] == 0 {
                break;
            }

            let block = self.storage.read_block(dir.addr[slot])?;
            for entry in entries_in(&block)? {
                if entry.inum != 0 && entry.name.matches(name) {
                    return Ok(Some(entry.inum));
                }
            }
        }

        Ok(None)
    }

    /// Tombstones the first entry bound to `target`: inode number to 0, name
    /// cleared. Remaining entries are not compacted or reordered.
    pub(crate) fn remove_directory_entry(
        &mut self,
        dir_inum: InodeNumber,
        target: InodeNumber,
    ) -> Result<(), FsError> {
        let dir = self.read_inode(dir_inum)?;
        debug_assert_eq!(dir.kind(), InodeKind::Directory);

        for slot in 0..NUM_ADDR {
            if dir.addr[slot] == 0 {
                break;
            }

            let block = self.storage.read_block(dir.addr[slot])?;
            if let Some(index) = entries_in(&block)?.iter().position(|e| e.inum == target) {
                return self.write_entry_at(dir.addr[slot], index, &FREE_DIRECTORY_ENTRY);
            }
        }

        Err(FsError::NotFound(format!("inode {target}")))
    }

    /// The directory's live entries, tombstones filtered out.
    pub fn read_directory(&self, dir_inum: InodeNumber) -> Result<Vec<DirectoryEntry>, FsError> {
        let dir = self.read_inode(dir_inum)?;
        debug_assert_eq!(dir.kind(), InodeKind::Directory);

        let mut entries = vec![];
        for slot in 0..NUM_ADDR {
            if dir.addr[slot] == 0 {
                break;
            }

            let block = self.storage.read_block(dir.addr[slot])?;
            entries.extend(entries_in(&block)?.into_iter().filter(|e| e.inum != 0));
        }

        Ok(entries)
    }

    fn write_entry_at(
        &self,
        block_number: BlockNumber,
        index: usize,
        entry: &DirectoryEntry,
    ) -> Result<(), FsError> {
        let serialized = bincode::serialize(entry)?;
        let offset = index * DIRECTORY_ENTRY_SIZE;

        let mut block = self.storage.read_block(block_number)?;
        block[offset..offset + serialized.len()].copy_from_slice(&serialized);

        self.storage.write_block(block_number, &block)
    }
}

fn entries_in(block: &Block) -> Result<Vec<DirectoryEntry>, FsError> {
    block
        .chunks_exact(DIRECTORY_ENTRY_SIZE)
        .map(|chunk| bincode::deserialize(chunk).map_err(FsError::from))
        .collect()
}

/// The directory byte size implied by an entry at `index` of block `slot`.
fn entry_end(slot: usize, index: usize) -> u32 {
    ((slot * DIRECTORY_ENTRIES_PER_BLOCK + index + 1) * DIRECTORY_ENTRY_SIZE) as u32
}
