use std::fs::Metadata;
use std::os::unix::fs::MetadataExt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Attributes stamped into a newly created inode.
pub struct FileAttributes {
    pub uid: u8,
    pub gid: u8,
    pub atime: [u16; 2],
    pub mtime: [u16; 2],
}

impl FileAttributes {
    /// Attributes for an object created right now, owned by nobody.
    pub fn now() -> FileAttributes {
        let words = epoch_words(SystemTime::now());

        FileAttributes {
            uid: 0,
            gid: 0,
            atime: words,
            mtime: words,
        }
    }
}

impl Default for FileAttributes {
    fn default() -> Self {
        FileAttributes {
            uid: 0,
            gid: 0,
            atime: [0; 2],
            mtime: [0; 2],
        }
    }
}

impl From<&Metadata> for FileAttributes {
    fn from(metadata: &Metadata) -> Self {
        FileAttributes {
            // the inode stores single-byte ids
            uid: metadata.uid() as u8,
            gid: metadata.gid() as u8,
            atime: seconds_words(metadata.atime()),
            mtime: seconds_words(metadata.mtime()),
        }
    }
}

/// Splits epoch seconds into the inode's high-word-first pair.
pub fn epoch_words(time: SystemTime) -> [u16; 2] {
    let seconds = time
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_secs())
        .unwrap_or(0);

    seconds_words(seconds as i64)
}

fn seconds_words(seconds: i64) -> [u16; 2] {
    let seconds = seconds as u32;
    [(seconds >> 16) as u16, seconds as u16]
}
