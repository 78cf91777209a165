use std::fmt::{self, Debug};
use std::mem::size_of;

use serde::{Deserialize, Serialize};

use super::block::BLOCK_SIZE;
use crate::error::FsError;

/// The number of bytes occupied by a directory entry.
pub const DIRECTORY_ENTRY_SIZE: usize = 16;
const_assert!(size_of::<DirectoryEntry>() == DIRECTORY_ENTRY_SIZE);

const_assert!(BLOCK_SIZE % DIRECTORY_ENTRY_SIZE == 0);
/// The number of directory entries that fit in a block.
pub const DIRECTORY_ENTRIES_PER_BLOCK: usize = BLOCK_SIZE / DIRECTORY_ENTRY_SIZE;

/// The maximum supported length of an entry name, excluding the nul padding.
pub const MAX_NAME_LEN: usize = 13;
const NAME_FIELD_LEN: usize = MAX_NAME_LEN + 1;
const_assert!(size_of::<EntryName>() == NAME_FIELD_LEN);

/// A free (or tombstoned) directory entry.
pub const FREE_DIRECTORY_ENTRY: DirectoryEntry = DirectoryEntry {
    inum: 0,
    name: EntryName([0; NAME_FIELD_LEN]),
};

/// A directory entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[repr(C)]
pub struct DirectoryEntry {
    /// The inode number; 0 marks a free or tombstoned slot.
    pub inum: u16,
    /// The name of the entry.
    pub name: EntryName,
}

impl DirectoryEntry {
    /// Constructs a new [`DirectoryEntry`] instance.
    pub fn new(inum: u16, name: &str) -> Result<DirectoryEntry, FsError> {
        Ok(DirectoryEntry {
            inum,
            name: name.try_into()?,
        })
    }
}

/// A name, as used in [`DirectoryEntry`].
///
/// A maximum of [`MAX_NAME_LEN`]-byte-long names are supported.
#[derive(Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[repr(C)]
pub struct EntryName([u8; NAME_FIELD_LEN]);

impl EntryName {
    /// The name bytes up to the first nul.
    fn bytes(&self) -> &[u8] {
        let end = self.0.iter().position(|b| *b == 0).unwrap_or(NAME_FIELD_LEN);
        &self.0[..end]
    }

    pub fn matches(&self, name: &str) -> bool {
        self.bytes() == name.as_bytes()
    }
}

impl TryFrom<&str> for EntryName {
    type Error = FsError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        if value.is_empty() || value.len() > MAX_NAME_LEN || value.contains('/') {
            return Err(FsError::InvalidName(value.to_string()));
        }

        let bytes = value.as_bytes();
        let mut converted = [0; NAME_FIELD_LEN];
        converted[..bytes.len()].copy_from_slice(bytes);

        Ok(EntryName(converted))
    }
}

impl Debug for EntryName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EntryName").field(&self.to_string()).finish()
    }
}

impl fmt::Display for EntryName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(self.bytes()))
    }
}
