use crate::disk_format::inode::InodeKind;
use crate::error::FsError;
use crate::storage::BlockStore;

use super::{InodeNumber, V6Fs};

/// The outcome of walking a path against the directory tree.
#[derive(Debug, PartialEq, Eq)]
pub enum Resolution {
    /// The final component names an existing entry.
    Found {
        parent: InodeNumber,
        inum: InodeNumber,
    },
    /// The parent chain exists but the final name does not.
    Absent {
        parent: InodeNumber,
        name: String,
    },
    /// An intermediate component is not an existing directory.
    IntermediateMissing { component: String },
}

impl<S: BlockStore> V6Fs<S> {
    /// Walks `path` one directory level per component, starting from the
    /// caller's current directory `start`.
    ///
    /// Empty components are ignored, so absolute-looking paths resolve from
    /// `start` too, and a bare `/` resolves to `start` itself. A component
    /// that exists but is not a directory counts as missing.
    pub fn resolve(&self, start: InodeNumber, path: &str) -> Result<Resolution, FsError> {
        let mut components = path.split('/').filter(|c| !c.is_empty()).peekable();
        let mut dir = start;

        while let Some(component) = components.next() {
            if components.peek().is_none() {
                return Ok(match self.lookup_directory_entry(dir, component)? {
                    Some(inum) => Resolution::Found { parent: dir, inum },
                    None => Resolution::Absent {
                        parent: dir,
                        name: component.to_string(),
                    },
                });
            }

            dir = match self.lookup_directory_entry(dir, component)? {
                Some(inum) if self.read_inode(inum)?.kind() == InodeKind::Directory => inum,
                _ => {
                    return Ok(Resolution::IntermediateMissing {
                        component: component.to_string(),
                    })
                }
            };
        }

        Ok(Resolution::Found {
            parent: dir,
            inum: dir,
        })
    }
}
