// SPDX-License-Identifier: MIT

use std::io::{Error, ErrorKind, Read, Seek, SeekFrom, Write};

use crate::{F2IO, F2IOError, F2IOResult};

/// `F2IO` over any `Read + Write + Seek` handle (image files, block devices).
#[derive(Debug)]
pub struct StdF2IO<'a, T: Read + Write + Seek> {
    dev: &'a mut T,
}

impl<'a, T: Read + Write + Seek> StdF2IO<'a, T> {
    #[inline]
    pub fn new(dev: &'a mut T) -> Self {
        Self { dev }
    }
}

impl<'a, T: Read + Write + Seek> F2IO for StdF2IO<'a, T> {
    fn write_at(&mut self, offset: u64, data: &[u8]) -> F2IOResult {
        self.dev.seek(SeekFrom::Start(offset))?;
        self.dev.write_all(data)?;
        Ok(())
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> F2IOResult {
        self.dev.seek(SeekFrom::Start(offset))?;
        self.dev.read_exact(buf)?;
        Ok(())
    }

    fn flush(&mut self) -> F2IOResult {
        self.dev.flush()?;
        Ok(())
    }
}

impl From<Error> for F2IOError {
    #[cold]
    fn from(e: Error) -> Self {
        match e.kind() {
            ErrorKind::UnexpectedEof => F2IOError::OutOfBounds,
            ErrorKind::Unsupported => F2IOError::Unsupported,
            ErrorKind::PermissionDenied => F2IOError::Other("permission denied"),
            ErrorKind::ReadOnlyFilesystem => F2IOError::Other("device is read-only"),
            ErrorKind::WriteZero => F2IOError::Other("short write"),
            ErrorKind::Interrupted => F2IOError::Other("interrupted"),
            ErrorKind::InvalidInput => F2IOError::Other("invalid seek or length"),
            _ => F2IOError::Other("device I/O error"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::prelude::*;
    use tempfile::tempfile;

    #[test]
    fn blocks_round_trip_through_a_file() {
        let mut file = tempfile().unwrap();
        file.set_len((BLOCK_SIZE * 8) as u64).unwrap();
        let mut io = StdF2IO::new(&mut file);

        io.write_block(3, &vec![0xC3u8; BLOCK_SIZE]).unwrap();
        io.flush().unwrap();

        let mut out = vec![0u8; BLOCK_SIZE];
        io.read_block(3, &mut out).unwrap();
        assert!(out.iter().all(|&b| b == 0xC3));
        io.read_block(4, &mut out).unwrap();
        assert!(out.iter().all(|&b| b == 0));
    }

    #[test]
    fn short_file_reads_out_of_bounds() {
        let mut file = tempfile().unwrap();
        file.set_len(BLOCK_SIZE as u64).unwrap();
        let mut io = StdF2IO::new(&mut file);
        let mut out = vec![0u8; BLOCK_SIZE];
        assert_eq!(io.read_block(1, &mut out), Err(F2IOError::OutOfBounds));
    }
}
