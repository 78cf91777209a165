use thiserror::Error;

/// Errors surfaced by filesystem operations.
///
/// Failures detected deep in the allocation or indirection layers propagate
/// through every calling layer to the invoking operation unchanged; nothing
/// is retried, and already-committed state stays committed.
#[derive(Error, Debug)]
pub enum FsError {
    #[error("no free blocks remain")]
    OutOfBlocks,
    #[error("inode limit reached, no more files or directories can be created")]
    OutOfInodes,
    #[error("maximum file size reached")]
    FileTooLarge,
    #[error("directory has no room for another entry")]
    DirectoryFull,
    #[error("{0}: no such file or directory")]
    NotFound(String),
    #[error("directory {0} does not exist")]
    MissingDirectory(String),
    #[error("{0}: already exists")]
    AlreadyExists(String),
    #[error("{0}: is a directory")]
    IsDirectory(String),
    #[error("{0:?}: invalid entry name")]
    InvalidName(String),
    #[error("block number {0} is out of bounds")]
    BlockOutOfBounds(u16),
    #[error("backing store does not hold an initialized filesystem")]
    NotInitialized,
    #[error("unusable filesystem geometry: {0}")]
    InvalidGeometry(String),
    #[error("i/o failure on the backing store")]
    Io(#[from] std::io::Error),
    #[error("malformed on-disk record")]
    Codec(#[from] bincode::Error),
}
