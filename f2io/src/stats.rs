// SPDX-License-Identifier: MIT

use crate::zoned::F2IOZoned;
use crate::{F2IO, F2IOResult};

/// Traffic seen by an [`IOCounter`].
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub struct IoStats {
    pub reads: u64,
    pub read_bytes: u64,
    pub writes: u64,
    pub write_bytes: u64,
    pub flushes: u64,
    pub readaheads: u64,
    /// Lowest byte offset written, if any.
    pub first_write: Option<u64>,
}

impl IoStats {
    #[inline]
    pub fn is_read_only(&self) -> bool {
        self.writes == 0
    }
}

/// Pass-through device that counts every call.
///
/// Tests wrap an image in it to prove a check-only run leaves the device
/// untouched.
pub struct IOCounter<'a, IO: F2IO + ?Sized> {
    inner: &'a mut IO,
    pub stats: IoStats,
}

impl<'a, IO: F2IO + ?Sized> IOCounter<'a, IO> {
    #[inline]
    pub fn new(inner: &'a mut IO) -> Self {
        Self {
            inner,
            stats: IoStats::default(),
        }
    }

    #[inline]
    pub fn snapshot(&self) -> IoStats {
        self.stats
    }
}

impl<'a, IO: F2IO + ?Sized> F2IO for IOCounter<'a, IO> {
    fn write_at(&mut self, offset: u64, data: &[u8]) -> F2IOResult {
        let s = &mut self.stats;
        s.writes += 1;
        s.write_bytes += data.len() as u64;
        s.first_write = Some(s.first_write.map_or(offset, |o| o.min(offset)));
        self.inner.write_at(offset, data)
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> F2IOResult {
        self.stats.reads += 1;
        self.stats.read_bytes += buf.len() as u64;
        self.inner.read_at(offset, buf)
    }

    fn flush(&mut self) -> F2IOResult {
        self.stats.flushes += 1;
        self.inner.flush()
    }

    fn readahead(&mut self, offset: u64, len: u64) -> F2IOResult {
        self.stats.readaheads += 1;
        self.inner.readahead(offset, len)
    }

    fn as_zoned(&mut self) -> Option<&mut dyn F2IOZoned> {
        self.inner.as_zoned()
    }
}

#[cfg(all(test, feature = "mem", feature = "std"))]
mod tests {
    use super::*;
    use crate::prelude::*;

    #[test]
    fn reads_keep_the_device_read_only() {
        let mut image = vec![0u8; BLOCK_SIZE * 4];
        let mut mem = MemF2IO::new(&mut image);
        let mut io = IOCounter::new(&mut mem);

        let mut blk = vec![0u8; BLOCK_SIZE];
        io.read_block(0, &mut blk).unwrap();
        io.readahead_blocks(1, 2).unwrap();
        let s = io.snapshot();
        assert!(s.is_read_only());
        assert_eq!(s.reads, 1);
        assert_eq!(s.readaheads, 1);
        assert_eq!(s.first_write, None);
    }

    #[test]
    fn tracks_the_lowest_write() {
        let mut image = vec![0u8; BLOCK_SIZE * 4];
        let mut mem = MemF2IO::new(&mut image);
        let mut io = IOCounter::new(&mut mem);

        let blk = vec![1u8; BLOCK_SIZE];
        io.write_block(3, &blk).unwrap();
        io.write_block(1, &blk).unwrap();
        io.flush().unwrap();
        let s = io.snapshot();
        assert_eq!(s.writes, 2);
        assert_eq!(s.write_bytes, 2 * BLOCK_SIZE as u64);
        assert_eq!(s.flushes, 1);
        assert_eq!(s.first_write, Some(BLOCK_SIZE as u64));
    }
}
