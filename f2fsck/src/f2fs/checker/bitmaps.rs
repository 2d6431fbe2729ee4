// SPDX-License-Identifier: MIT
//! Checker bitmaps
//!
//! The main bitmap records every main-area block the walk reaches; the SIT
//! bitmap is the union of the on-disk valid maps. At the end of a clean
//! run both are identical. Bits are MSB-first inside each byte, one
//! `SIT_VBLOCK_MAP_SIZE` slice per segment.

use f2io::prelude::*;

use crate::core::{bitmap::MsbBitmapOps, errors::*};
use crate::f2fs::{constant::*, session::CheckSession, types::*};

impl<'a, IO: F2IO + ?Sized> CheckSession<'a, IO> {
    /// Allocates the checker bitmaps and the NAT shadow table.
    pub(crate) fn fsck_init(&mut self) -> FsckResult {
        let main = self.meta.main_segments as usize;
        self.fsck.main_bitmap = vec![0u8; main * SIT_VBLOCK_MAP_SIZE];
        self.build_nat_area_bitmap()?;
        self.build_sit_area_bitmap();
        self.run.quota_fixed = false;
        Ok(())
    }

    /// Bit index of `blk` in the main/SIT bitmaps, if it lies in the main area.
    #[inline]
    fn main_bit(&self, blk: u32) -> Option<usize> {
        self.meta
            .is_valid_blkaddr(blk)
            .then(|| self.meta.main_offset(blk))
    }

    pub(crate) fn test_main_bitmap(&self, blk: u32) -> bool {
        self.main_bit(blk)
            .is_some_and(|bit| self.fsck.main_bitmap.test_msb(bit))
    }

    /// Marks `blk` reached by the walk as a block of log type `ty`.
    ///
    /// The segment is retyped when the SIT disagrees on node/data. Returns
    /// the previous bit.
    pub(crate) fn set_main_bitmap(&mut self, blk: u32, ty: u8) -> bool {
        let Some(bit) = self.main_bit(blk) else {
            return false;
        };
        let segno = self.meta.segno(blk);
        let se = self.seg_entry_mut(segno);
        let cur = se.seg_type;
        let retype = cur >= NO_CHECK_TYPE || is_data_seg(cur) != is_data_seg(ty);
        if retype && cur != ty {
            se.seg_type = ty;
            log::debug!("segment {segno:#x} retyped {cur} -> {ty} by block {blk:#x}");
        }
        self.fsck.main_bitmap.set_msb(bit)
    }

    pub(crate) fn clear_main_bitmap(&mut self, blk: u32) -> bool {
        match self.main_bit(blk) {
            Some(bit) => self.fsck.main_bitmap.clear_msb(bit),
            None => false,
        }
    }

    pub(crate) fn test_sit_bitmap(&self, blk: u32) -> bool {
        self.main_bit(blk)
            .is_some_and(|bit| self.fsck.sit_bitmap.test_msb(bit))
    }

    pub(crate) fn set_sit_bitmap(&mut self, blk: u32) -> bool {
        match self.main_bit(blk) {
            Some(bit) => self.fsck.sit_bitmap.set_msb(bit),
            None => false,
        }
    }

    pub(crate) fn clear_sit_bitmap(&mut self, blk: u32) -> bool {
        match self.main_bit(blk) {
            Some(bit) => self.fsck.sit_bitmap.clear_msb(bit),
            None => false,
        }
    }

    /// True while `nid` is valid in the NAT and the walk has not reached it.
    #[inline]
    pub(crate) fn test_nat_bitmap(&self, nid: u32) -> bool {
        self.fsck.nat_bitmap.test_msb(nid as usize)
    }

    #[inline]
    pub(crate) fn clear_nat_bitmap(&mut self, nid: u32) -> bool {
        self.fsck.nat_bitmap.clear_msb(nid as usize)
    }

    /// Nids still marked in the NAT bitmap, in order.
    pub(crate) fn unreached_nids(&self) -> alloc::vec::Vec<u32> {
        let end = self.fsck.nat_bitmap.len() * 8;
        let mut out = alloc::vec::Vec::new();
        let mut at = 0;
        while let Some(nid) = self.fsck.nat_bitmap.find_next_set_msb(at, end) {
            out.push(nid as u32);
            at = nid + 1;
        }
        out
    }

    /// First byte where the main and SIT bitmaps differ.
    pub(crate) fn bitmap_mismatch(&self) -> Option<usize> {
        first_difference(&self.fsck.main_bitmap, &self.fsck.sit_bitmap)
    }
}

/// Index of the first differing byte, counting a length difference.
fn first_difference(a: &[u8], b: &[u8]) -> Option<usize> {
    a.iter()
        .zip(b.iter())
        .position(|(x, y)| x != y)
        .or_else(|| (a.len() != b.len()).then(|| a.len().min(b.len())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn difference_positions() {
        assert_eq!(first_difference(&[1, 2, 3], &[1, 2, 3]), None);
        assert_eq!(first_difference(&[1, 2, 3], &[1, 0, 3]), Some(1));
        assert_eq!(first_difference(&[1, 2], &[1, 2, 0]), Some(2));
    }
}
