// SPDX-License-Identifier: MIT
//! Current-segment repair

use alloc::boxed::Box;

use f2io::prelude::*;
use zerocopy::{FromZeros, IntoBytes};

use crate::core::{bitmap::MsbBitmapOps, errors::*};
use crate::f2fs::{constant::*, session::CheckSession, types::*};

impl<'a, IO: F2IO + ?Sized> CheckSession<'a, IO> {
    /// Logs that exist on this image. Read-only images only run the hot
    /// data and hot node logs.
    pub(crate) fn active_log(&self, ty: usize) -> bool {
        !self.meta.readonly() || ty == CURSEG_HOT_DATA || ty == CURSEG_HOT_NODE
    }

    /// Points log `ty` at the first free block of its segment and switches
    /// it to SSR. Fails when the segment is full or the device is zoned.
    pub(crate) fn relocate_curseg_offset(&mut self, ty: usize) -> FsckResult {
        if self.run.zoned_hm {
            return Err(FsckError::structural("cannot relocate a curseg on a zoned device"));
        }
        let segno = self.cursegs[ty].segno;
        let map = self.seg_entry(segno).cur_valid_map;
        let Some(free) = map.find_next_zero_msb(0, BLOCKS_PER_SEG as usize) else {
            return Err(FsckError::structural("curseg segment is full"));
        };
        let c = &mut self.cursegs[ty];
        log::debug!(
            "curseg[{ty}].next_blkoff {} -> {free}, alloc_type {} -> SSR",
            c.next_blkoff,
            if c.alloc_type == LFS { "LFS" } else { "SSR" }
        );
        c.next_blkoff = free as u16;
        c.alloc_type = SSR;
        Ok(())
    }

    /// Moves log `ty` to the next free block after `from`, saving its
    /// summary first.
    pub(crate) fn move_one_curseg_info(&mut self, from: u32, left: bool, ty: usize) -> FsckResult {
        if !self.active_log(ty) {
            return Ok(());
        }
        let (from, left) = if self.meta.readonly() {
            if ty == CURSEG_HOT_DATA {
                (self.meta.main_blkaddr, false)
            } else {
                (self.meta.end_blkaddr(), true)
            }
        } else {
            let sum = self.cursegs[ty].sum.clone();
            self.write_block(self.meta.sum_blkaddr(self.cursegs[ty].segno), sum.as_bytes())?;
            (from, left)
        };

        let to = self.find_next_free_block(from, left, ty, self.run.zoned_hm)?;
        let old = self.cursegs[ty].segno;
        let segno = self.meta.segno(to);
        let c = &mut self.cursegs[ty];
        c.segno = segno;
        c.next_blkoff = self.meta.blkoff(to) as u16;
        c.alloc_type = if self.run.zoned_hm { LFS } else { SSR };
        c.zone = self.meta.zone_of(segno);

        self.load_curseg_entries(ty)?;
        self.reset_curseg(ty);
        if self.run.zoned_hm {
            self.zero_journal_of(ty);
        }
        crate::fsck_fix!(self, "CURSEG.MOVE", "move curseg[{ty}] {old:#x} -> {segno:#x} after {from:#x}");
        Ok(())
    }

    /// Moves every log past `from`.
    pub(crate) fn move_curseg_info(&mut self, from: u32, left: bool) -> FsckResult {
        for ty in 0..NR_CURSEG_TYPE {
            self.move_one_curseg_info(from, left, ty)?;
        }
        Ok(())
    }

    /// Repairs log `ty` in place if its segment has room, else moves it.
    pub(crate) fn update_curseg_info(&mut self, ty: usize) -> FsckResult {
        if self.relocate_curseg_offset(ty).is_ok() {
            return Ok(());
        }
        self.move_one_curseg_info(self.meta.main_blkaddr, false, ty)
    }

    /// Checks that log `ty` points at a free block and, for LFS, that
    /// nothing after it is in use. On zoned devices the write pointer is
    /// compared too when `check_wp`.
    pub(crate) fn check_curseg_offset(&mut self, ty: usize, check_wp: bool) -> FsckResult {
        if !self.active_log(ty) {
            return Ok(());
        }
        let c = &self.cursegs[ty];
        let (segno, blkoff, alloc) = (c.segno, c.next_blkoff as usize, c.alloc_type);
        if blkoff >> 3 >= SIT_VBLOCK_MAP_SIZE {
            crate::fsck_bug!(self, true, "CURSEG.OFFSET", "next block offset:{blkoff} is invalid, type:{ty}");
            return Err(FsckError::structural("curseg offset out of range"));
        }
        let map = self.seg_entry(segno).cur_valid_map;
        if map.test_msb(blkoff) {
            crate::fsck_bug!(self, true, "CURSEG.OFFSET", "next block offset is not free, type:{ty}");
            return Err(FsckError::structural("curseg offset in use"));
        }
        if alloc == SSR {
            return Ok(());
        }
        if map.find_next_set_msb(blkoff + 1, BLOCKS_PER_SEG as usize).is_some() {
            crate::fsck_bug!(
                self,
                true,
                "CURSEG.OFFSET",
                "for LFS curseg, space after .next_blkoff should be unused, type:{ty}"
            );
            return Err(FsckError::structural("LFS curseg tail in use"));
        }
        if check_wp && self.run.zoned_hm {
            return self.check_curseg_write_pointer(ty);
        }
        Ok(())
    }

    pub(crate) fn check_curseg_offsets(&mut self, check_wp: bool) -> FsckResult {
        for ty in 0..NR_CURSEG_TYPE {
            self.check_curseg_offset(ty, check_wp)?;
        }
        Ok(())
    }

    /// Repairs every log whose offset check fails, then records the new
    /// positions.
    pub(crate) fn fix_curseg_info(&mut self, check_wp: bool) -> FsckResult {
        let mut moved = false;
        for ty in 0..NR_CURSEG_TYPE {
            if self.check_curseg_offset(ty, check_wp).is_err() {
                self.update_curseg_info(ty)?;
                moved = true;
            }
        }
        if moved {
            self.write_curseg_info();
            self.flush_curseg_sit_entries()?;
        }
        Ok(())
    }

    /// Rewrites the SIT entries of the log segments, whose type a move may
    /// have changed.
    pub(crate) fn flush_curseg_sit_entries(&mut self) -> FsckResult {
        for ty in 0..NR_CURSEG_TYPE {
            let segno = self.cursegs[ty].segno;
            let addr = self.current_sit_addr(segno);
            let mut blk = Box::new(F2fsSitBlock::new_zeroed());
            self.read_block(addr, blk.as_mut_bytes())?;
            let se = self.seg_entry(segno);
            let raw = &mut blk.entries[segno as usize % SIT_ENTRY_PER_BLOCK];
            raw.vblocks = ((se.seg_type as u16) << SIT_VBLOCKS_SHIFT) | se.valid_blocks;
            self.write_block(addr, blk.as_bytes())?;
        }
        Ok(())
    }

    /// Reports segments whose type changed during the walk. A cold data
    /// segment holding other data types is left alone.
    pub(crate) fn check_sit_types(&mut self) -> bool {
        let mut ok = true;
        for segno in 0..self.meta.main_segments {
            let se = &mut self.sm.entries[segno as usize];
            if se.orig_type == se.seg_type {
                continue;
            }
            if se.orig_type == CURSEG_COLD_DATA as u8 && (se.seg_type as usize) <= CURSEG_COLD_DATA {
                se.seg_type = se.orig_type;
                continue;
            }
            let (from, to) = (se.orig_type, se.seg_type);
            crate::fsck_fix!(self, "SIT.TYPE", "wrong segment type [{segno:#x}] {from:x} -> {to:x}");
            ok = false;
        }
        ok
    }

    /// Compares each log with the SIT type of its segment and with its
    /// summary footer. With repairs or preen on, both are corrected in
    /// memory.
    pub(crate) fn chk_curseg_info(&mut self) -> bool {
        let mut ok = true;
        let correct = self.run.fix_on || self.opts.preen != crate::core::options::PreenMode::Off;
        for ty in 0..NR_CURSEG_TYPE {
            if !self.active_log(ty) {
                continue;
            }
            let segno = self.cursegs[ty].segno;
            let se_type = self.seg_entry(segno).seg_type;
            if se_type as usize != ty {
                crate::fsck_bug!(
                    self,
                    true,
                    "CURSEG.TYPE",
                    "incorrect curseg [{ty}]: segno [{segno:#x}] type(SIT) [{se_type}]"
                );
                if correct {
                    self.seg_entry_mut(segno).seg_type = ty as u8;
                }
                ok = false;
            }
            let is_node = self.cursegs[ty].sum.is_node();
            if is_node != (ty >= CURSEG_HOT_NODE) {
                let footer = self.cursegs[ty].sum.footer.entry_type;
                crate::fsck_bug!(
                    self,
                    true,
                    "CURSEG.TYPE",
                    "incorrect curseg [{ty}]: segno [{segno:#x}] type(SSA) [{footer}]"
                );
                if correct {
                    self.cursegs[ty].sum.footer.entry_type =
                        if ty <= CURSEG_COLD_DATA { SUM_TYPE_DATA } else { SUM_TYPE_NODE };
                }
                ok = false;
            }
        }
        ok
    }
}
