use std::fmt;
use std::mem::size_of;

use serde::de::{self, SeqAccess, Visitor};
use serde::ser::SerializeTuple;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::block::{Block, BLOCK_SIZE};

/// The number of block numbers the cache (and one chain link) holds.
pub const CACHE_CAPACITY: usize = 100;

/// Serialized size of the cache: the count word plus the entry words.
pub const FREE_CACHE_SIZE: usize = 2 * (1 + CACHE_CAPACITY);
const_assert!(size_of::<FreeCache>() == FREE_CACHE_SIZE);
const_assert!(FREE_CACHE_SIZE <= BLOCK_SIZE);

/// The stack of free block numbers cached in the superblock.
///
/// `entries[0]` is always the pointer to the next chain link, with 0
/// terminating the chain; the entries above it are directly allocatable. A
/// full cache that receives another block number spills into that block as a
/// chain link with this same serialization.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(C)]
pub struct FreeCache {
    count: u16,
    entries: [u16; CACHE_CAPACITY],
}

impl FreeCache {
    /// A cache holding only the end-of-chain sentinel.
    pub fn seed() -> FreeCache {
        FreeCache {
            count: 1,
            entries: [0; CACHE_CAPACITY],
        }
    }

    /// A cache holding only a pointer to the chain link at `link`.
    pub fn pointing_to(link: u16) -> FreeCache {
        let mut entries = [0; CACHE_CAPACITY];
        entries[0] = link;

        FreeCache { count: 1, entries }
    }

    pub fn len(&self) -> usize {
        usize::from(self.count)
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() == CACHE_CAPACITY
    }

    /// The chain pointer at the bottom of the stack.
    pub fn link(&self) -> u16 {
        self.entries[0]
    }

    /// Pushes a free block number. The caller must check [`Self::is_full`]
    /// first.
    pub fn push(&mut self, block: u16) {
        debug_assert!(!self.is_full());
        self.entries[self.len()] = block;
        self.count += 1;
    }

    /// Pops the top entry, or `None` once only the chain pointer remains.
    pub fn pop(&mut self) -> Option<u16> {
        if self.count <= 1 {
            return None;
        }

        self.count -= 1;
        Some(self.entries[self.len()])
    }

    /// Serializes the cache into a chain-link block.
    pub fn to_link_block(&self) -> Result<Block, bincode::Error> {
        let mut block = [0; BLOCK_SIZE];
        let bytes = bincode::serialize(self)?;
        block[..bytes.len()].copy_from_slice(&bytes);

        Ok(block)
    }

    /// Reads a chain-link block back into a cache.
    pub fn from_link_block(block: &Block) -> Result<FreeCache, bincode::Error> {
        bincode::deserialize(&block[..])
    }
}

impl Serialize for FreeCache {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(1 + CACHE_CAPACITY)?;
        tuple.serialize_element(&self.count)?;
        for entry in &self.entries {
            tuple.serialize_element(entry)?;
        }

        tuple.end()
    }
}

impl<'de> Deserialize<'de> for FreeCache {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct CacheVisitor;

        impl<'de> Visitor<'de> for CacheVisitor {
            type Value = FreeCache;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, "a count word followed by {CACHE_CAPACITY} entry words")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<FreeCache, A::Error> {
                let count: u16 = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(0, &self))?;

                if usize::from(count) > CACHE_CAPACITY {
                    return Err(de::Error::invalid_value(
                        de::Unexpected::Unsigned(count.into()),
                        &"a count of at most 100",
                    ));
                }

                let mut entries = [0; CACHE_CAPACITY];
                for (i, slot) in entries.iter_mut().enumerate() {
                    *slot = seq
                        .next_element()?
                        .ok_or_else(|| de::Error::invalid_length(i + 1, &self))?;
                }

                Ok(FreeCache { count, entries })
            }
        }

        deserializer.deserialize_tuple(1 + CACHE_CAPACITY, CacheVisitor)
    }
}
