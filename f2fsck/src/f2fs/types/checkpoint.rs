// SPDX-License-Identifier: MIT
//! Checkpoint block header

use zerocopy::{FromBytes, FromZeros, Immutable, IntoBytes, KnownLayout};

use crate::f2fs::constant::*;

/// First 192 bytes of a checkpoint block. The SIT/NAT version bitmaps
/// follow (or live in the payload blocks), the checksum sits at
/// `checksum_offset`.
#[derive(Debug, Clone, Copy, IntoBytes, FromBytes, KnownLayout, Immutable)]
#[repr(C, packed)]
pub struct F2fsCheckpoint {
    pub checkpoint_ver: u64,
    pub user_block_count: u64,
    pub valid_block_count: u64,
    pub rsvd_segment_count: u32,
    pub overprov_segment_count: u32,
    pub free_segment_count: u32,
    pub cur_node_segno: [u32; MAX_ACTIVE_NODE_LOGS],
    pub cur_node_blkoff: [u16; MAX_ACTIVE_NODE_LOGS],
    pub cur_data_segno: [u32; MAX_ACTIVE_DATA_LOGS],
    pub cur_data_blkoff: [u16; MAX_ACTIVE_DATA_LOGS],
    pub ckpt_flags: u32,
    pub cp_pack_total_block_count: u32,
    pub cp_pack_start_sum: u32,
    pub valid_node_count: u32,
    pub valid_inode_count: u32,
    pub next_free_nid: u32,
    pub sit_ver_bitmap_bytesize: u32,
    pub nat_ver_bitmap_bytesize: u32,
    pub checksum_offset: u32,
    pub elapsed_time: u64,
    pub alloc_type: [u8; MAX_ACTIVE_LOGS],
}

impl Default for F2fsCheckpoint {
    fn default() -> Self {
        Self::new_zeroed()
    }
}

impl F2fsCheckpoint {
    #[inline]
    pub fn is_set(&self, flag: u32) -> bool {
        self.ckpt_flags & flag != 0
    }

    #[inline]
    pub fn set_flag(&mut self, flag: u32) {
        self.ckpt_flags |= flag;
    }

    #[inline]
    pub fn clear_flag(&mut self, flag: u32) {
        self.ckpt_flags &= !flag;
    }

    /// Segment number of curseg `ty` (data logs first, then node logs).
    pub fn cur_segno(&self, ty: usize) -> u32 {
        if ty < CURSEG_HOT_NODE {
            let s = self.cur_data_segno;
            s[ty]
        } else {
            let s = self.cur_node_segno;
            s[ty - CURSEG_HOT_NODE]
        }
    }

    pub fn cur_blkoff(&self, ty: usize) -> u16 {
        if ty < CURSEG_HOT_NODE {
            let s = self.cur_data_blkoff;
            s[ty]
        } else {
            let s = self.cur_node_blkoff;
            s[ty - CURSEG_HOT_NODE]
        }
    }

    pub fn set_curseg(&mut self, ty: usize, segno: u32, blkoff: u16, alloc: u8) {
        if ty < CURSEG_HOT_NODE {
            let mut s = self.cur_data_segno;
            let mut o = self.cur_data_blkoff;
            s[ty] = segno;
            o[ty] = blkoff;
            self.cur_data_segno = s;
            self.cur_data_blkoff = o;
        } else {
            let mut s = self.cur_node_segno;
            let mut o = self.cur_node_blkoff;
            s[ty - CURSEG_HOT_NODE] = segno;
            o[ty - CURSEG_HOT_NODE] = blkoff;
            self.cur_node_segno = s;
            self.cur_node_blkoff = o;
        }
        let mut a = self.alloc_type;
        a[ty] = alloc;
        self.alloc_type = a;
    }
}

/// "a is newer than b" with wrap-around, as the kernel compares versions.
#[inline]
pub fn ver_after(a: u64, b: u64) -> bool {
    (a.wrapping_sub(b) as i64) > 0
}
