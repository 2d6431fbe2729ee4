// SPDX-License-Identifier: MIT

use zerocopy::{FromBytes, FromZeros, Immutable, IntoBytes, KnownLayout};

use crate::f2fs::constant::*;

/// One block of the orphan inode list stored in a checkpoint pack.
#[derive(Debug, Clone, Copy, IntoBytes, FromBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct F2fsOrphanBlock {
    pub ino: [u32; F2FS_ORPHANS_PER_BLOCK],
    pub reserved: u32,
    /// Index of this block in the orphan area
    pub blk_addr: u16,
    /// Number of orphan blocks in the pack
    pub blk_count: u16,
    pub entry_count: u32,
    pub check_sum: u32,
}

impl Default for F2fsOrphanBlock {
    fn default() -> Self {
        Self::new_zeroed()
    }
}

impl F2fsOrphanBlock {
    /// Valid inode numbers of the block.
    pub fn inos(&self) -> &[u32] {
        let n = (self.entry_count as usize).min(F2FS_ORPHANS_PER_BLOCK);
        &self.ino[..n]
    }
}
