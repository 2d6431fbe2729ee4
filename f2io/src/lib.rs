// SPDX-License-Identifier: MIT
#![cfg_attr(not(feature = "std"), no_std)]

//! Device access for the f2fsck engine.
//!
//! Everything the checker reads or writes goes through [`F2IO`]. Addresses
//! handed to [`F2IOExt`] are filesystem block numbers; the raw trait works
//! in bytes.

#[cfg(feature = "alloc")]
extern crate alloc;

pub mod errors;
pub mod stats;
pub mod zoned;

#[cfg(feature = "mem")]
mod mem;

#[cfg(feature = "std")]
mod std;

pub mod prelude {
    pub use super::errors::*;
    pub use super::stats::*;
    pub use super::zoned::{F2IOZoned, Zone, ZoneCondition, ZoneType};
    pub use super::{BLOCK_SIZE, F2IO, F2IOExt, LOG_BLOCK_SIZE};

    #[cfg(feature = "mem")]
    pub use super::mem::MemF2IO;
    #[cfg(feature = "mem")]
    pub use super::zoned::MemZonedF2IO;

    #[cfg(feature = "std")]
    pub use super::std::StdF2IO;
}

use errors::*;
use zoned::F2IOZoned;

/// Filesystem block size.
pub const BLOCK_SIZE: usize = 4096;
pub const LOG_BLOCK_SIZE: u32 = 12;

/// Byte-addressed device.
///
/// Backends exist for RAM buffers, image files and block devices. Zoned
/// devices additionally expose [`F2IOZoned`] through [`F2IO::as_zoned`].
pub trait F2IO {
    fn write_at(&mut self, offset: u64, data: &[u8]) -> F2IOResult;

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> F2IOResult;

    /// Pushes buffered writes to the device.
    fn flush(&mut self) -> F2IOResult;

    /// Hints that `len` bytes at `offset` will be read soon.
    fn readahead(&mut self, _offset: u64, _len: u64) -> F2IOResult {
        Ok(())
    }

    /// Zone commands, when the device is zoned.
    fn as_zoned(&mut self) -> Option<&mut dyn F2IOZoned> {
        None
    }
}

/// Block-addressed helpers on top of [`F2IO`].
pub trait F2IOExt: F2IO {
    /// Reads the block at `blkaddr`; `buf` must be exactly one block.
    #[inline(always)]
    fn read_block(&mut self, blkaddr: u64, buf: &mut [u8]) -> F2IOResult {
        if buf.len() != BLOCK_SIZE {
            return Err(F2IOError::Other("read_block: buffer is not one block"));
        }
        self.read_at(blkaddr << LOG_BLOCK_SIZE, buf)
    }

    /// Writes the block at `blkaddr`; `buf` must be exactly one block.
    #[inline(always)]
    fn write_block(&mut self, blkaddr: u64, buf: &[u8]) -> F2IOResult {
        if buf.len() != BLOCK_SIZE {
            return Err(F2IOError::Other("write_block: buffer is not one block"));
        }
        self.write_at(blkaddr << LOG_BLOCK_SIZE, buf)
    }

    #[inline(always)]
    fn readahead_blocks(&mut self, blkaddr: u64, count: u64) -> F2IOResult {
        self.readahead(blkaddr << LOG_BLOCK_SIZE, count << LOG_BLOCK_SIZE)
    }

    /// Zeroes `len` bytes at `offset`, one block at a time.
    fn zero_fill(&mut self, offset: u64, len: usize) -> F2IOResult {
        const ZERO: [u8; BLOCK_SIZE] = [0u8; BLOCK_SIZE];
        let end = offset + len as u64;
        let mut off = offset;
        while off < end {
            let n = ((end - off) as usize).min(BLOCK_SIZE);
            self.write_at(off, &ZERO[..n])?;
            off += n as u64;
        }
        Ok(())
    }
}

impl<T: F2IO + ?Sized> F2IOExt for T {}
