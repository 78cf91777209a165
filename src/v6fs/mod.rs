use std::time::SystemTime;

use log::info;

use crate::disk_format::block::BLOCK_SIZE;
use crate::disk_format::directory_entry::DirectoryEntry;
use crate::disk_format::free_list::FreeCache;
use crate::disk_format::inode::{
    Inode, InodeKind, INODES_PER_BLOCK, INODE_SIZE, INODE_START_POSITION, ROOT_INODE,
};
use crate::disk_format::superblock::{Superblock, SUPERBLOCK_BLOCK_NUMBER};
use crate::error::FsError;
use crate::metadata::{epoch_words, FileAttributes};
use crate::storage::BlockStore;

/// Offline consistency checking.
mod check;
/// Directory entries packed into a directory inode's direct blocks.
mod directory;
/// Single- and double-indirect addressing of file content.
mod indirection;
/// The user-visible filesystem operations.
mod ops;
/// Slash-separated path resolution.
mod path;

pub use ops::CopyIn;
pub use path::Resolution;

// inode numbers are 1-based and fit the 16-bit directory-entry field
pub type InodeNumber = u16;

// block numbers are 16-bit on disk, in address slots and indirect blocks alike
pub type BlockNumber = u16;

pub struct V6Fs<S: BlockStore> {
    pub storage: S,
    superblock: Superblock,
}

impl<S: BlockStore> V6Fs<S> {
    /// Opens an already formatted filesystem, validating the superblock and
    /// the root directory.
    pub fn open(storage: S) -> Result<V6Fs<S>, FsError> {
        let block = storage.read_block(SUPERBLOCK_BLOCK_NUMBER)?;
        let superblock = Superblock::from_block(&block)?;

        let fs = V6Fs { storage, superblock };

        if fs.superblock.isize == 0 || fs.superblock.fsize <= fs.first_data_block() {
            return Err(FsError::NotInitialized);
        }

        let root = fs.read_inode(ROOT_INODE)?;
        if root.kind() != InodeKind::Directory {
            return Err(FsError::NotInitialized);
        }

        info!("{} total blocks", fs.superblock.fsize);
        info!("{} total inodes", fs.superblock.isize);

        Ok(fs)
    }

    /// Formats the backing store: superblock at block 1, a zeroed inode
    /// table, the free-block chain over the data region, and the root
    /// directory at inode 1 with `.` and `..` pointing to itself.
    pub fn format(storage: S, total_blocks: u16, inode_count: u16) -> Result<V6Fs<S>, FsError> {
        if inode_count == 0 {
            return Err(FsError::InvalidGeometry(
                "at least one inode is required for the root directory".to_string(),
            ));
        }

        let inode_blocks = usize::from(inode_count).div_ceil(INODES_PER_BLOCK);
        let first_data = 2 + inode_blocks;
        if usize::from(total_blocks) <= first_data {
            return Err(FsError::InvalidGeometry(format!(
                "{total_blocks} blocks leave no data region after {inode_blocks} inode blocks"
            )));
        }

        storage.write_block(0, &[0; BLOCK_SIZE])?;
        for block in 2..first_data as BlockNumber {
            storage.write_block(block, &[0; BLOCK_SIZE])?;
        }

        let superblock = Superblock {
            isize: inode_count,
            fsize: total_blocks,
            free: FreeCache::seed(),
            flock: 0,
            ilock: 0,
            fmod: 0,
            time: epoch_words(SystemTime::now()),
        };

        let mut fs = V6Fs { storage, superblock };
        fs.flush_superblock()?;

        // hand every data block to the free list; overflow spills into chain links
        for block in first_data as BlockNumber..total_blocks {
            fs.release_block(block)?;
        }

        let stamp = FileAttributes::now();
        let mut root = Inode::new(InodeKind::Directory, 2);
        root.actime = stamp.atime;
        root.modtime = stamp.mtime;
        fs.write_inode(ROOT_INODE, root)?;
        fs.add_directory_entry(
            ROOT_INODE,
            DirectoryEntry::new(ROOT_INODE, ".").expect("'.' is a valid name"),
        )?;
        fs.add_directory_entry(
            ROOT_INODE,
            DirectoryEntry::new(ROOT_INODE, "..").expect("'..' is a valid name"),
        )?;

        info!("formatted {total_blocks} blocks, {inode_count} inodes");

        Ok(fs)
    }

    pub fn superblock(&self) -> &Superblock {
        &self.superblock
    }

    /// The first block of the data region.
    pub fn first_data_block(&self) -> BlockNumber {
        let inode_blocks = usize::from(self.superblock.isize).div_ceil(INODES_PER_BLOCK);
        2 + inode_blocks as BlockNumber
    }

    fn flush_superblock(&self) -> Result<(), FsError> {
        let block = self.superblock.to_block()?;
        self.storage.write_block(SUPERBLOCK_BLOCK_NUMBER, &block)
    }

    pub fn read_inode(&self, inum: InodeNumber) -> Result<Inode, FsError> {
        self.check_inum(inum)?;

        let position = INODE_START_POSITION + (usize::from(inum) - 1) * INODE_SIZE;
        let block_number = (position / BLOCK_SIZE) as BlockNumber;
        let offset = position % BLOCK_SIZE;

        let block = self.storage.read_block(block_number)?;

        Ok(bincode::deserialize(&block[offset..offset + INODE_SIZE])?)
    }

    pub fn write_inode(&self, inum: InodeNumber, inode: Inode) -> Result<(), FsError> {
        self.check_inum(inum)?;

        let serialized = bincode::serialize(&inode)?;

        let position = INODE_START_POSITION + (usize::from(inum) - 1) * INODE_SIZE;
        let block_number = (position / BLOCK_SIZE) as BlockNumber;
        let offset = position % BLOCK_SIZE;

        let mut block = self.storage.read_block(block_number)?;
        block[offset..offset + INODE_SIZE].copy_from_slice(&serialized);

        self.storage.write_block(block_number, &block)
    }

    pub fn update_inode<F>(&self, inum: InodeNumber, update: F) -> Result<(), FsError>
    where
        F: FnOnce(&mut Inode),
    {
        let mut inode = self.read_inode(inum)?;
        update(&mut inode);
        self.write_inode(inum, inode)
    }

    fn check_inum(&self, inum: InodeNumber) -> Result<(), FsError> {
        if inum == 0 || inum > self.superblock.isize {
            return Err(FsError::NotFound(format!("inode {inum}")));
        }

        Ok(())
    }

    /// Linear scan from inode 1 for the first record whose allocated bit is
    /// clear.
    pub fn allocate_inode(&self) -> Result<InodeNumber, FsError> {
        for inum in 1..=self.superblock.isize {
            if self.read_inode(inum)?.kind() == InodeKind::Free {
                return Ok(inum);
            }
        }

        Err(FsError::OutOfInodes)
    }

    /// Pops a free block, refilling the cache from the chain when only the
    /// pointer entry remains. A drained chain link re-enters circulation as
    /// the allocation result, so no block number is ever lost.
    pub fn allocate_block(&mut self) -> Result<BlockNumber, FsError> {
        if let Some(block) = self.superblock.free.pop() {
            self.flush_superblock()?;
            return Ok(block);
        }

        let link = self.superblock.free.link();
        if link == 0 {
            return Err(FsError::OutOfBlocks);
        }

        let mut block = self.storage.read_block(link)?;
        self.superblock.free = FreeCache::from_link_block(&block)?;

        // consume the link: zero its header word and hand the block out
        block[..2].copy_from_slice(&[0, 0]);
        self.storage.write_block(link, &block)?;
        self.flush_superblock()?;

        Ok(link)
    }

    /// Pushes a freed block, spilling the full cache into that block as the
    /// next chain link.
    pub fn release_block(&mut self, block: BlockNumber) -> Result<(), FsError> {
        if self.superblock.free.is_full() {
            let link = self.superblock.free.to_link_block()?;
            self.storage.write_block(block, &link)?;
            self.superblock.free = FreeCache::pointing_to(block);
        } else {
            self.superblock.free.push(block);
        }

        self.flush_superblock()
    }

    /// Allocates a block and zero-fills it on disk. Indirect and directory
    /// blocks are read back before they are fully written, so stale content
    /// must never be visible.
    pub(crate) fn allocate_zeroed_block(&mut self) -> Result<BlockNumber, FsError> {
        let block = self.allocate_block()?;
        self.storage.write_block(block, &[0; BLOCK_SIZE])?;

        Ok(block)
    }
}
