// SPDX-License-Identifier: MIT

use zerocopy::{FromBytes, FromZeros, Immutable, IntoBytes, KnownLayout};

use crate::f2fs::constant::*;

/// On-disk SIT entry. `vblocks` packs the segment type in bits 10..16 and
/// the valid block count in bits 0..10.
#[derive(Debug, Clone, Copy, IntoBytes, FromBytes, KnownLayout, Immutable)]
#[repr(C, packed)]
pub struct F2fsSitEntry {
    pub vblocks: u16,
    pub valid_map: [u8; SIT_VBLOCK_MAP_SIZE],
    pub mtime: u64,
}

impl F2fsSitEntry {
    #[inline]
    pub fn valid_blocks(&self) -> u16 {
        self.vblocks & SIT_VBLOCKS_MASK
    }

    #[inline]
    pub fn seg_type(&self) -> u8 {
        ((self.vblocks & !SIT_VBLOCKS_MASK) >> SIT_VBLOCKS_SHIFT) as u8
    }
}

impl Default for F2fsSitEntry {
    fn default() -> Self {
        Self::new_zeroed()
    }
}

#[derive(Debug, Clone, Copy, IntoBytes, FromBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct F2fsSitBlock {
    pub entries: [F2fsSitEntry; SIT_ENTRY_PER_BLOCK],
    pub _pad: [u8; F2FS_BLKSIZE - SIT_ENTRY_PER_BLOCK * SIT_ENTRY_SIZE],
}

/// In-memory state of one segment.
#[derive(Debug, Clone, Copy)]
pub struct SegEntry {
    pub valid_blocks: u16,
    pub cur_valid_map: [u8; SIT_VBLOCK_MAP_SIZE],
    /// Copy as of the checkpoint, before roll-forward marks.
    pub ckpt_valid_blocks: u16,
    pub ckpt_valid_map: [u8; SIT_VBLOCK_MAP_SIZE],
    pub seg_type: u8,
    pub orig_type: u8,
    pub ckpt_type: u8,
    pub mtime: u64,
}

impl Default for SegEntry {
    fn default() -> Self {
        Self {
            valid_blocks: 0,
            cur_valid_map: [0; SIT_VBLOCK_MAP_SIZE],
            ckpt_valid_blocks: 0,
            ckpt_valid_map: [0; SIT_VBLOCK_MAP_SIZE],
            seg_type: 0,
            orig_type: 0,
            ckpt_type: 0,
            mtime: 0,
        }
    }
}

impl SegEntry {
    pub fn from_raw(raw: &F2fsSitEntry) -> Self {
        let map = raw.valid_map;
        Self {
            valid_blocks: raw.valid_blocks(),
            cur_valid_map: map,
            ckpt_valid_blocks: raw.valid_blocks(),
            ckpt_valid_map: map,
            seg_type: raw.seg_type(),
            orig_type: raw.seg_type(),
            ckpt_type: raw.seg_type(),
            mtime: raw.mtime,
        }
    }

    /// Encodes the entry back to its on-disk form. Invalid types drop to 0.
    pub fn to_raw(&self) -> F2fsSitEntry {
        let ty = if self.seg_type >= NO_CHECK_TYPE { 0 } else { self.seg_type as u16 };
        F2fsSitEntry {
            vblocks: (ty << SIT_VBLOCKS_SHIFT) | (self.valid_blocks & SIT_VBLOCKS_MASK),
            valid_map: self.cur_valid_map,
            mtime: self.mtime,
        }
    }
}

#[inline]
pub fn is_data_seg(ty: u8) -> bool {
    (ty as usize) <= CURSEG_COLD_DATA
}

#[inline]
pub fn is_node_seg(ty: u8) -> bool {
    (CURSEG_HOT_NODE..=CURSEG_COLD_NODE).contains(&(ty as usize))
}
