use std::mem::size_of;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::block::BLOCK_SIZE;
use super::boot_block::BOOT_BLOCK_SIZE;

pub const INODE_SIZE: usize = 32;
const_assert!(size_of::<Inode>() == INODE_SIZE);

/// The number of address slots in an inode.
pub const NUM_ADDR: usize = 8;

const_assert!(BLOCK_SIZE % 2 == 0);
/// The number of 16-bit data-block pointers in one indirect block.
pub const NUM_INDIRECT: usize = BLOCK_SIZE / 2;

/// Address slots that hold single-indirect blocks in large-file mode; the
/// last slot holds the double-indirect block.
pub const NUM_SINGLE_INDIRECT_SLOTS: usize = NUM_ADDR - 1;

/// Bound on single-indirect chains reachable through the double-indirect
/// block.
pub const DOUBLE_INDIRECT_LIMIT: usize = 249;

/// The byte offset where the inode table begins. The table follows the boot
/// block and the superblock's block.
pub const INODE_START_POSITION: usize = BOOT_BLOCK_SIZE + BLOCK_SIZE;

const_assert!(BLOCK_SIZE % INODE_SIZE == 0);
pub const INODES_PER_BLOCK: usize = BLOCK_SIZE / INODE_SIZE;

/// The largest byte size the split 24-bit size field can record.
pub const MAX_FILE_SIZE: u32 = 0x00ff_ffff;

/// Inode numbers are 1-based; the root directory always lives at inode 1.
pub const ROOT_INODE: u16 = 1;

/// An inode that is not in use for any file.
pub const FREE_INODE: Inode = Inode {
    flags: InodeFlags::FREE,
    nlinks: 0,
    uid: 0,
    gid: 0,
    size0: 0,
    size1: 0,
    addr: [0; NUM_ADDR],
    actime: [0; 2],
    modtime: [0; 2],
};

/// An on-disk inode record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[repr(C)]
pub struct Inode {
    /// allocation, kind, and large-file bits
    pub flags: InodeFlags,
    /// number of directory entries referring to this inode
    pub nlinks: u8,
    pub uid: u8,
    pub gid: u8,
    /// high byte of the 24-bit file size
    size0: u8,
    /// low word of the 24-bit file size
    size1: u16,
    /// direct data blocks, or indirect blocks in large-file mode
    pub addr: [u16; NUM_ADDR],
    /// access time, epoch seconds split high word first
    pub actime: [u16; 2],
    /// modification time, epoch seconds split high word first
    pub modtime: [u16; 2],
}

impl Inode {
    /// A freshly allocated inode with no content.
    pub fn new(kind: InodeKind, nlinks: u8) -> Inode {
        Inode {
            flags: InodeFlags::new(kind),
            nlinks,
            ..FREE_INODE
        }
    }

    /// The file size in bytes, joined from the split field.
    pub fn size(&self) -> u32 {
        (u32::from(self.size0) << 16) | u32::from(self.size1)
    }

    pub fn set_size(&mut self, size: u32) {
        debug_assert!(size <= MAX_FILE_SIZE);
        self.size0 = (size >> 16) as u8;
        self.size1 = size as u16;
    }

    pub fn kind(&self) -> InodeKind {
        self.flags.kind
    }

    pub fn is_large(&self) -> bool {
        self.flags.large
    }
}

/// What an inode describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InodeKind {
    /// This inode is not in use for any file.
    Free,
    /// This inode describes a regular data file.
    Regular,
    /// This inode describes a directory.
    Directory,
}

/// The inode's 16-bit flags word, decoded into its independent parts.
///
/// On disk: allocated = bit 15, directory = bit 14 set with bit 13 clear
/// (both clear is a regular file), large-file = bit 12. A free inode encodes
/// to an all-clear word.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InodeFlags {
    pub kind: InodeKind,
    pub large: bool,
}

const ALLOCATED_BIT: u16 = 1 << 15;
const KIND_HIGH_BIT: u16 = 1 << 14;
const KIND_LOW_BIT: u16 = 1 << 13;
const LARGE_BIT: u16 = 1 << 12;

impl InodeFlags {
    pub const FREE: InodeFlags = InodeFlags {
        kind: InodeKind::Free,
        large: false,
    };

    pub fn new(kind: InodeKind) -> InodeFlags {
        InodeFlags { kind, large: false }
    }

    fn encode(self) -> u16 {
        let kind_bits = match self.kind {
            InodeKind::Free => return 0,
            InodeKind::Regular => 0,
            InodeKind::Directory => KIND_HIGH_BIT,
        };

        let large_bit = if self.large { LARGE_BIT } else { 0 };

        ALLOCATED_BIT | kind_bits | large_bit
    }

    fn decode(word: u16) -> InodeFlags {
        if word & ALLOCATED_BIT == 0 {
            return InodeFlags::FREE;
        }

        let kind = if word & KIND_HIGH_BIT != 0 && word & KIND_LOW_BIT == 0 {
            InodeKind::Directory
        } else {
            InodeKind::Regular
        };

        InodeFlags {
            kind,
            large: word & LARGE_BIT != 0,
        }
    }
}

impl Serialize for InodeFlags {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u16(self.encode())
    }
}

impl<'de> Deserialize<'de> for InodeFlags {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        u16::deserialize(deserializer).map(InodeFlags::decode)
    }
}
