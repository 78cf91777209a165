use std::cell::RefCell;

use crate::disk_format::block::{Block, BLOCK_SIZE};
use crate::error::FsError;
use crate::v6fs::BlockNumber;

use super::block_store::BlockStore;

/// An in-memory backing store, primarily for tests.
pub struct MemoryStorage {
    blocks: RefCell<Vec<Block>>,
}

impl MemoryStorage {
    pub fn new(num_blocks: u16) -> Self {
        MemoryStorage {
            blocks: RefCell::new(vec![[0; BLOCK_SIZE]; usize::from(num_blocks)]),
        }
    }
}

impl BlockStore for MemoryStorage {
    fn read_block(&self, block_number: BlockNumber) -> Result<Block, FsError> {
        self.blocks
            .borrow()
            .get(usize::from(block_number))
            .copied()
            .ok_or(FsError::BlockOutOfBounds(block_number))
    }

    fn write_block(&self, block_number: BlockNumber, block: &Block) -> Result<(), FsError> {
        let mut blocks = self.blocks.borrow_mut();
        let slot = blocks
            .get_mut(usize::from(block_number))
            .ok_or(FsError::BlockOutOfBounds(block_number))?;
        *slot = *block;

        Ok(())
    }
}
