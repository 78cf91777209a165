use std::fs::File;
use std::os::unix::fs::FileExt;

use crate::disk_format::block::{Block, BLOCK_SIZE};
use crate::error::FsError;
use crate::v6fs::BlockNumber;

use super::block_store::BlockStore;

pub struct FileBackedStorage(File);

impl FileBackedStorage {
    pub fn new(file: File) -> Self {
        FileBackedStorage(file)
    }
}

impl BlockStore for FileBackedStorage {
    fn read_block(&self, block_number: BlockNumber) -> Result<Block, FsError> {
        let mut buf = [0; BLOCK_SIZE];
        let position = u64::from(block_number) * BLOCK_SIZE as u64;

        self.0.read_exact_at(&mut buf, position)?;

        Ok(buf)
    }

    fn write_block(&self, block_number: BlockNumber, block: &Block) -> Result<(), FsError> {
        let position = u64::from(block_number) * BLOCK_SIZE as u64;

        self.0.write_all_at(block, position)?;

        Ok(())
    }
}
