// SPDX-License-Identifier: MIT

use core::fmt;

pub use f2io::errors::*;

/// Class of an inconsistency found while walking the image.
///
/// The class drives recovery: structural and cross-reference errors
/// disconnect the smallest enclosing unit, counter mismatches never abort,
/// fatal errors stop the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsckErrorKind {
    Structural,
    Counter,
    CrossRef,
    DevicePointer,
    Fatal,
}

impl FsckErrorKind {
    pub fn name(&self) -> &'static str {
        match self {
            FsckErrorKind::Structural => "structural",
            FsckErrorKind::Counter => "counter",
            FsckErrorKind::CrossRef => "cross-reference",
            FsckErrorKind::DevicePointer => "device pointer",
            FsckErrorKind::Fatal => "fatal",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsckError {
    pub kind: FsckErrorKind,
    pub msg: &'static str,
    pub nid: Option<u32>,
    pub blkaddr: Option<u32>,
    pub io: Option<F2IOError>,
}

impl FsckError {
    #[inline]
    pub const fn new(kind: FsckErrorKind, msg: &'static str) -> Self {
        Self {
            kind,
            msg,
            nid: None,
            blkaddr: None,
            io: None,
        }
    }

    #[inline]
    pub const fn structural(msg: &'static str) -> Self {
        Self::new(FsckErrorKind::Structural, msg)
    }

    #[inline]
    pub const fn counter(msg: &'static str) -> Self {
        Self::new(FsckErrorKind::Counter, msg)
    }

    #[inline]
    pub const fn cross_ref(msg: &'static str) -> Self {
        Self::new(FsckErrorKind::CrossRef, msg)
    }

    #[inline]
    pub const fn device_pointer(msg: &'static str) -> Self {
        Self::new(FsckErrorKind::DevicePointer, msg)
    }

    #[inline]
    pub const fn fatal(msg: &'static str) -> Self {
        Self::new(FsckErrorKind::Fatal, msg)
    }

    #[inline]
    pub const fn nid(mut self, nid: u32) -> Self {
        self.nid = Some(nid);
        self
    }

    #[inline]
    pub const fn blk(mut self, blkaddr: u32) -> Self {
        self.blkaddr = Some(blkaddr);
        self
    }

    #[inline]
    pub fn is_fatal(&self) -> bool {
        self.kind == FsckErrorKind::Fatal
    }

    pub fn msg(&self) -> &'static str {
        self.msg
    }
}

impl fmt::Display for FsckError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.msg, self.kind.name())?;
        if let Some(nid) = self.nid {
            write!(f, " at nid {nid:#x}")?;
        }
        if let Some(blk) = self.blkaddr {
            write!(f, " at block {blk:#x}")?;
        }
        Ok(())
    }
}

impl core::error::Error for FsckError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        self.io.as_ref().map(|e| e as &(dyn core::error::Error + 'static))
    }
}

impl From<F2IOError> for FsckError {
    #[inline]
    fn from(e: F2IOError) -> Self {
        Self {
            io: Some(e),
            ..Self::fatal("device error")
        }
    }
}

/// Errors raised while loading the superblock, checkpoint and tables.
/// Always fatal: nothing is persisted when mount fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountError {
    IO(F2IOError),
    BadMagic,
    BadChecksum,
    BadGeometry(&'static str),
    NoValidCheckpoint,
    Unsupported(&'static str),
    Other(&'static str),
}

impl MountError {
    pub fn msg(&self) -> &'static str {
        match self {
            MountError::IO(_) => "device error",
            MountError::BadMagic => "bad magic",
            MountError::BadChecksum => "checksum mismatch",
            MountError::NoValidCheckpoint => "no valid checkpoint pack",
            MountError::BadGeometry(msg) | MountError::Unsupported(msg) | MountError::Other(msg) => msg,
        }
    }
}

impl fmt::Display for MountError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.msg())
    }
}

impl core::error::Error for MountError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            MountError::IO(e) => Some(e),
            _ => None,
        }
    }
}

impl From<F2IOError> for MountError {
    #[inline]
    fn from(e: F2IOError) -> Self {
        MountError::IO(e)
    }
}

impl From<MountError> for FsckError {
    #[inline]
    fn from(e: MountError) -> Self {
        let mut err = Self::fatal(e.msg());
        if let MountError::IO(io) = e {
            err.io = Some(io);
        }
        err
    }
}

/// Anything that stops a check run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    IO(F2IOError),
    Mount(MountError),
    Fsck(FsckError),
}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FsError::IO(e) => write!(f, "{e}"),
            FsError::Mount(e) => write!(f, "{e}"),
            FsError::Fsck(e) => write!(f, "{e}"),
        }
    }
}

impl core::error::Error for FsError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        use core::error::Error;
        match self {
            FsError::IO(_) => None,
            FsError::Mount(e) => e.source(),
            FsError::Fsck(e) => e.source(),
        }
    }
}

impl From<F2IOError> for FsError {
    fn from(e: F2IOError) -> Self {
        FsError::IO(e)
    }
}

impl From<MountError> for FsError {
    fn from(e: MountError) -> Self {
        FsError::Mount(e)
    }
}

impl From<FsckError> for FsError {
    fn from(e: FsckError) -> Self {
        FsError::Fsck(e)
    }
}

pub type FsResult<T = ()> = Result<T, FsError>;
pub type FsckResult<T = ()> = Result<T, FsckError>;
pub type MountResult<T = ()> = Result<T, MountError>;
