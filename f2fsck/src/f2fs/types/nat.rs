// SPDX-License-Identifier: MIT

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::f2fs::constant::*;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, IntoBytes, FromBytes, KnownLayout, Immutable)]
#[repr(C, packed)]
pub struct F2fsNatEntry {
    pub version: u8,
    pub ino: u32,
    pub block_addr: u32,
}

#[derive(Debug, Clone, Copy, IntoBytes, FromBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct F2fsNatBlock {
    pub entries: [F2fsNatEntry; NAT_ENTRY_PER_BLOCK],
    pub _pad: u8,
}

/// In-memory view of a NAT entry, as used by the walker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeInfo {
    pub nid: u32,
    pub ino: u32,
    pub blk_addr: u32,
    pub version: u8,
}

impl NodeInfo {
    pub fn from_raw(nid: u32, raw: &F2fsNatEntry) -> Self {
        Self {
            nid,
            ino: raw.ino,
            blk_addr: raw.block_addr,
            version: raw.version,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::mem::size_of;

    #[test]
    fn sizes() {
        assert_eq!(size_of::<F2fsNatEntry>(), NAT_ENTRY_SIZE);
        assert_eq!(size_of::<F2fsNatBlock>(), F2FS_BLKSIZE);
    }
}
