use crate::disk_format::block::Block;
use crate::error::FsError;
use crate::v6fs::BlockNumber;

/// Raw positioned access to the backing store in block-sized units.
///
/// Every component above this trait addresses storage exclusively through
/// block numbers. Failures are propagated to the invoking operation, never
/// retried.
pub trait BlockStore {
    fn read_block(&self, block_number: BlockNumber) -> Result<Block, FsError>;

    fn write_block(&self, block_number: BlockNumber, block: &Block) -> Result<(), FsError>;
}
