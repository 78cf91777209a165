use serde::{Deserialize, Serialize};

use super::block::{Block, BLOCK_SIZE};
use super::free_list::FreeCache;

/// The block number holding the superblock record.
pub const SUPERBLOCK_BLOCK_NUMBER: u16 = 1;

/// The superblock: totals, the free-block cache, and the lock fields the
/// format declares but never enforces.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Superblock {
    /// total number of inodes in the inode table
    pub isize: u16,
    /// total number of blocks in the backing store
    pub fsize: u16,
    /// cache of free block numbers, spilled into chain links on overflow
    pub free: FreeCache,
    pub flock: u8,
    pub ilock: u8,
    pub fmod: u8,
    /// last-update time, epoch seconds split high word first
    pub time: [u16; 2],
}

impl Superblock {
    pub fn to_block(&self) -> Result<Block, bincode::Error> {
        let mut block = [0; BLOCK_SIZE];
        let bytes = bincode::serialize(self)?;
        block[..bytes.len()].copy_from_slice(&bytes);

        Ok(block)
    }

    pub fn from_block(block: &Block) -> Result<Superblock, bincode::Error> {
        bincode::deserialize(&block[..])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fits_in_one_block() {
        let superblock = Superblock {
            isize: 500,
            fsize: 10000,
            free: FreeCache::seed(),
            flock: 0,
            ilock: 0,
            fmod: 0,
            time: [0; 2],
        };

        assert!(bincode::serialized_size(&superblock).unwrap() <= BLOCK_SIZE as u64);
    }

    #[test]
    fn test_block_round_trip() {
        let mut free = FreeCache::seed();
        free.push(40);
        free.push(41);

        let superblock = Superblock {
            isize: 16,
            fsize: 64,
            free,
            flock: 0,
            ilock: 0,
            fmod: 1,
            time: [0x0001, 0x8000],
        };

        let block = superblock.to_block().unwrap();
        let parsed = Superblock::from_block(&block).unwrap();
        assert_eq!(parsed, superblock);
    }
}
