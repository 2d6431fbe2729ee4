// SPDX-License-Identifier: MIT

use crate::{F2IO, F2IOError, F2IOResult};

/// Image held in a RAM buffer.
#[derive(Debug)]
pub struct MemF2IO<'a> {
    image: &'a mut [u8],
}

impl<'a> MemF2IO<'a> {
    #[inline]
    pub fn new(image: &'a mut [u8]) -> Self {
        Self { image }
    }

    /// Image size in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.image.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.image.is_empty()
    }

    fn range(&self, offset: u64, len: usize) -> F2IOResult<core::ops::Range<usize>> {
        let start = usize::try_from(offset).map_err(|_| F2IOError::OutOfBounds)?;
        let end = start.checked_add(len).ok_or(F2IOError::OutOfBounds)?;
        if end > self.image.len() {
            return Err(F2IOError::OutOfBounds);
        }
        Ok(start..end)
    }
}

impl<'a> F2IO for MemF2IO<'a> {
    #[inline]
    fn write_at(&mut self, offset: u64, data: &[u8]) -> F2IOResult {
        let r = self.range(offset, data.len())?;
        self.image[r].copy_from_slice(data);
        Ok(())
    }

    #[inline]
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> F2IOResult {
        let r = self.range(offset, buf.len())?;
        buf.copy_from_slice(&self.image[r]);
        Ok(())
    }

    #[inline]
    fn flush(&mut self) -> F2IOResult {
        Ok(())
    }
}
