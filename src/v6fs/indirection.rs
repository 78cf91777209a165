use crate::disk_format::block::{Block, BLOCK_SIZE};
use crate::disk_format::inode::{
    Inode, DOUBLE_INDIRECT_LIMIT, MAX_FILE_SIZE, NUM_ADDR, NUM_INDIRECT,
    NUM_SINGLE_INDIRECT_SLOTS,
};
use crate::error::FsError;
use crate::storage::BlockStore;

use super::{BlockNumber, InodeNumber, V6Fs};

/// Where the next data-block pointer lands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum AppendState {
    /// Filling the inode's own address slots.
    Direct { used: usize },
    /// Filling the single-indirect block at `addr[slot]`.
    Single { slot: usize, used: usize },
    /// Filling the single-indirect block at entry `link` of the
    /// double-indirect block.
    Double {
        link: usize,
        indirect: BlockNumber,
        used: usize,
    },
}

/// Streams content into a freshly created file, growing the addressing
/// structure as the direct slots, then the seven single-indirect chains, then
/// the double-indirect chain fill up.
///
/// The inode is kept in memory until [`Self::finish`], which records the
/// final size and writes the record out; data and indirect blocks land on
/// disk as they are appended.
pub(crate) struct FileWriter<'a, S: BlockStore> {
    fs: &'a mut V6Fs<S>,
    inum: InodeNumber,
    inode: Inode,
    state: AppendState,
    size: u32,
}

impl<'a, S: BlockStore> FileWriter<'a, S> {
    pub fn new(fs: &'a mut V6Fs<S>, inum: InodeNumber, inode: Inode) -> FileWriter<'a, S> {
        FileWriter {
            fs,
            inum,
            inode,
            state: AppendState::Direct { used: 0 },
            size: 0,
        }
    }

    /// Appends one chunk (at most a block) of content. The final chunk may be
    /// short; it is zero-padded on disk and the true size recorded in the
    /// inode.
    pub fn append(&mut self, data: &[u8]) -> Result<(), FsError> {
        debug_assert!(!data.is_empty() && data.len() <= BLOCK_SIZE);

        if u64::from(self.size) + data.len() as u64 > u64::from(MAX_FILE_SIZE) {
            return Err(FsError::FileTooLarge);
        }

        let block = self.fs.allocate_block()?;
        let mut buf = [0; BLOCK_SIZE];
        buf[..data.len()].copy_from_slice(data);
        self.fs.storage.write_block(block, &buf)?;

        if let Err(err) = self.append_pointer(block) {
            // the data block could not be linked into the file
            self.fs.release_block(block)?;
            return Err(err);
        }

        self.size += data.len() as u32;
        Ok(())
    }

    pub fn bytes_written(&self) -> u64 {
        u64::from(self.size)
    }

    /// Records the final size and flushes the inode; also the path taken when
    /// a transfer stops early and the partial file is kept.
    pub fn finish(mut self) -> Result<(), FsError> {
        self.inode.set_size(self.size);
        self.fs.write_inode(self.inum, self.inode)
    }

    fn append_pointer(&mut self, block: BlockNumber) -> Result<(), FsError> {
        if let AppendState::Direct { used } = self.state {
            if used < NUM_ADDR {
                self.inode.addr[used] = block;
                self.state = AppendState::Direct { used: used + 1 };
                return Ok(());
            }

            self.convert_to_large()?;
        }

        match self.state {
            AppendState::Direct { .. } => unreachable!("direct slots were just converted"),
            AppendState::Single { slot, used } if used < NUM_INDIRECT => {
                self.put_pointer(self.inode.addr[slot], used, block)?;
                self.state = AppendState::Single { slot, used: used + 1 };
            }
            AppendState::Single { slot, .. } if slot + 1 < NUM_SINGLE_INDIRECT_SLOTS => {
                let indirect = self.fs.allocate_zeroed_block()?;
                self.inode.addr[slot + 1] = indirect;
                self.put_pointer(indirect, 0, block)?;
                self.state = AppendState::Single {
                    slot: slot + 1,
                    used: 1,
                };
            }
            AppendState::Single { .. } => {
                // all seven direct chains are full; open the double chain
                let double = self.fs.allocate_zeroed_block()?;
                self.inode.addr[NUM_ADDR - 1] = double;

                let indirect = self.fs.allocate_zeroed_block()?;
                self.put_pointer(double, 0, indirect)?;
                self.put_pointer(indirect, 0, block)?;
                self.state = AppendState::Double {
                    link: 0,
                    indirect,
                    used: 1,
                };
            }
            AppendState::Double { link, indirect, used } if used < NUM_INDIRECT => {
                self.put_pointer(indirect, used, block)?;
                self.state = AppendState::Double {
                    link,
                    indirect,
                    used: used + 1,
                };
            }
            AppendState::Double { link, .. } => {
                if link + 1 >= DOUBLE_INDIRECT_LIMIT {
                    return Err(FsError::FileTooLarge);
                }

                let indirect = self.fs.allocate_zeroed_block()?;
                self.put_pointer(self.inode.addr[NUM_ADDR - 1], link + 1, indirect)?;
                self.put_pointer(indirect, 0, block)?;
                self.state = AppendState::Double {
                    link: link + 1,
                    indirect,
                    used: 1,
                };
            }
        }

        Ok(())
    }

    /// Moves the eight direct pointers into a fresh single-indirect block at
    /// slot 0 and flips the large bit. The file's content is untouched.
    fn convert_to_large(&mut self) -> Result<(), FsError> {
        let indirect = self.fs.allocate_zeroed_block()?;

        let mut block = [0; BLOCK_SIZE];
        for (index, addr) in self.inode.addr.iter().enumerate() {
            put_word(&mut block, index, *addr);
        }
        self.fs.storage.write_block(indirect, &block)?;

        self.inode.addr = [0; NUM_ADDR];
        self.inode.addr[0] = indirect;
        self.inode.flags.large = true;
        self.state = AppendState::Single {
            slot: 0,
            used: NUM_ADDR,
        };

        Ok(())
    }

    fn put_pointer(
        &mut self,
        indirect: BlockNumber,
        index: usize,
        value: BlockNumber,
    ) -> Result<(), FsError> {
        let mut block = self.fs.storage.read_block(indirect)?;
        put_word(&mut block, index, value);
        self.fs.storage.write_block(indirect, &block)
    }
}

impl<S: BlockStore> V6Fs<S> {
    /// Every data block owned by the inode, in content order: direct slots,
    /// then single-indirect chains 0..=6, then the double-indirect chain,
    /// stopping at the first empty pointer.
    pub(crate) fn file_block_numbers(&self, inode: &Inode) -> Result<Vec<BlockNumber>, FsError> {
        if !inode.is_large() {
            return Ok(inode.addr.iter().copied().take_while(|b| *b != 0).collect());
        }

        let mut blocks = vec![];
        for slot in 0..NUM_SINGLE_INDIRECT_SLOTS {
            let indirect = inode.addr[slot];
            if indirect == 0 {
                return Ok(blocks);
            }

            let chain = self.storage.read_block(indirect)?;
            blocks.extend(words(&chain).take_while(|b| *b != 0));
        }

        let double = inode.addr[NUM_ADDR - 1];
        if double == 0 {
            return Ok(blocks);
        }

        let links = self.storage.read_block(double)?;
        for indirect in links_in(&links) {
            let chain = self.storage.read_block(indirect)?;
            blocks.extend(words(&chain).take_while(|b| *b != 0));
        }

        Ok(blocks)
    }

    /// Releases every block the inode owns: the leaf data blocks of every
    /// chain, then the indirect blocks themselves, then the large bit and the
    /// address slots are cleared.
    pub(crate) fn free_file_blocks(&mut self, inode: &mut Inode) -> Result<(), FsError> {
        if inode.is_large() {
            for slot in 0..NUM_SINGLE_INDIRECT_SLOTS {
                let indirect = inode.addr[slot];
                if indirect == 0 {
                    break;
                }

                self.free_chain(indirect)?;
            }

            let double = inode.addr[NUM_ADDR - 1];
            if double != 0 {
                let links = self.storage.read_block(double)?;
                for indirect in links_in(&links) {
                    self.free_chain(indirect)?;
                }

                self.release_block(double)?;
            }

            inode.flags.large = false;
        } else {
            for addr in inode.addr {
                if addr == 0 {
                    break;
                }

                self.release_block(addr)?;
            }
        }

        inode.addr = [0; NUM_ADDR];
        inode.set_size(0);

        Ok(())
    }

    /// Releases a single-indirect chain's data blocks, then the chain block
    /// itself.
    fn free_chain(&mut self, indirect: BlockNumber) -> Result<(), FsError> {
        let chain = self.storage.read_block(indirect)?;
        for leaf in links_in(&chain) {
            self.release_block(leaf)?;
        }

        self.release_block(indirect)
    }
}

/// The pointer words of an indirect block, in order.
pub(crate) fn words(block: &Block) -> impl Iterator<Item = BlockNumber> + '_ {
    block
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
}

/// The populated pointer words of an indirect block, collected so the block
/// buffer can be dropped before the pointers are chased.
fn links_in(block: &Block) -> Vec<BlockNumber> {
    words(block).take_while(|b| *b != 0).collect()
}

fn put_word(block: &mut Block, index: usize, value: BlockNumber) {
    block[index * 2..index * 2 + 2].copy_from_slice(&value.to_le_bytes());
}
