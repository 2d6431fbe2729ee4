// SPDX-License-Identifier: MIT
//! Write pointers of host-managed zoned devices
//!
//! A sequential zone only takes writes at its pointer, so before the walk
//! can write anything the pointers must agree with the SIT: a log zone
//! without valid data starts at its zone start, every other open zone is
//! finished so that nothing allocates into it by accident.

use f2io::prelude::*;

use crate::core::{bitmap::MsbBitmapOps, errors::*};
use crate::f2fs::{constant::*, session::CheckSession};

#[inline]
fn blk_to_bytes(blk: u32) -> u64 {
    blk as u64 * F2FS_BLKSIZE as u64
}

#[inline]
fn bytes_to_blk(ofs: u64) -> u32 {
    (ofs / F2FS_BLKSIZE as u64) as u32
}

impl<'a, IO: F2IO + ?Sized> CheckSession<'a, IO> {
    fn report_zone_at(&mut self, blk: u32) -> FsckResult<Option<Zone>> {
        let Some(z) = self.io.as_zoned() else {
            return Ok(None);
        };
        z.report_zone(blk_to_bytes(blk))
            .map(Some)
            .map_err(|e| FsckError::from(e).blk(blk))
    }

    /// True when the zone holding `segno` has not been written yet, or
    /// takes random writes.
    pub(crate) fn write_pointer_at_zone_start(&mut self, segno: u32) -> bool {
        if !self.run.zoned_hm {
            return true;
        }
        let block = self.meta.start_block(segno);
        match self.report_zone_at(block) {
            Ok(Some(zone)) if zone.is_sequential() => zone.wp == zone.start,
            Ok(_) => true,
            Err(e) => {
                log::warn!("zone report failed at segment {segno:#x}: {e}");
                false
            }
        }
    }

    /// Offset of the last valid block of the zone starting at
    /// `zone_segno`, counted from the zone start.
    pub(crate) fn last_vblk_off_in_zone(&self, zone_segno: u32) -> Option<u32> {
        let segs_per_zone = self.meta.segs_per_sec * self.meta.secs_per_zone;
        (0..segs_per_zone).rev().find_map(|s| {
            let se = self.sm.entries.get((zone_segno + s) as usize)?;
            let b = se.cur_valid_map.find_last_set_msb(BLOCKS_PER_SEG as usize)?;
            Some(b as u32 + (s << LOG_BLOCKS_PER_SEG))
        })
    }

    /// Compares log `ty` with the write pointer of its zone. Only a clean
    /// unmount leaves them equal.
    pub(crate) fn check_curseg_write_pointer(&mut self, ty: usize) -> FsckResult {
        if !self.ckpt.cp.is_set(CP_UMOUNT_FLAG) {
            return Err(FsckError::structural("write pointer unknown after unclean shutdown"));
        }
        let cs_block = self.next_free_blkaddr(ty);
        let Some(zone) = self.report_zone_at(cs_block)? else {
            return Ok(());
        };
        if !zone.is_sequential() {
            return Ok(());
        }
        let wp_block = bytes_to_blk(zone.wp);
        let c = self.curseg(ty);
        let (segno, blkoff) = (c.segno, c.next_blkoff);
        let (wp_segno, wp_off) = (self.meta.segno(wp_block), self.meta.blkoff(wp_block));
        if cs_block == wp_block {
            return Ok(());
        }
        if cs_block > wp_block {
            self.note_warn(
                "ZONE.WP",
                format!(
                    "inconsistent write pointer with curseg {ty}: curseg [{segno:#x},{blkoff:#x}] > wp [{wp_segno:#x},{wp_off:#x}]"
                ),
            );
            if !self.run.fix_on {
                self.fsck.chk.wp_inconsistent_zones += 1;
            }
        } else {
            self.note_warn(
                "ZONE.WP",
                format!(
                    "write pointer goes advance from curseg {ty}: curseg [{segno:#x},{blkoff:#x}] wp [{wp_segno:#x},{wp_off:#x}]"
                ),
            );
        }
        Err(FsckError::structural("curseg and write pointer disagree").blk(cs_block))
    }

    /// Reconciles one zone with the SIT.
    fn chk_and_fix_wp_with_sit(&mut self, zone: Zone) -> FsckResult {
        if !zone.is_sequential() || zone.wp_is_meaningless() {
            return Ok(());
        }
        let zone_block = bytes_to_blk(zone.start);
        if zone_block < self.meta.main_blkaddr {
            return Ok(());
        }
        let zone_segno = self.meta.segno(zone_block);
        if zone_segno >= self.meta.main_segments {
            return Ok(());
        }
        let wp_block = bytes_to_blk(zone.wp);
        let wp_segno = self.meta.segno(wp_block);
        let wp_blkoff = wp_block.saturating_sub(self.meta.start_block(wp_segno));
        let last_valid = self.last_vblk_off_in_zone(zone_segno);
        let segs_per_zone = self.meta.segs_per_sec * self.meta.secs_per_zone;

        let holds_log = self
            .cursegs
            .iter()
            .any(|c| zone_segno <= c.segno && c.segno < zone_segno + segs_per_zone);
        if holds_log {
            if last_valid.is_none() && zone.wp != zone.start {
                if !self.run.fix_on {
                    self.note_warn("ZONE.WP", format!("inconsistent write pointer: wp [{wp_segno:#x},{wp_blkoff:#x}]"));
                    self.fsck.chk.wp_inconsistent_zones += 1;
                    return Ok(());
                }
                crate::fsck_fix!(self, "ZONE.RESET", "reset write pointer of zone at segment {zone_segno:#x}");
                if self.writable() {
                    if let Some(z) = self.io.as_zoned() {
                        z.reset_zone(zone.start).map_err(|e| FsckError::from(e).blk(zone_block))?;
                    }
                }
                self.fsck.chk.wp_fixed = true;
            }
            return Ok(());
        }

        if last_valid.is_some_and(|l| zone_block + l > wp_block) {
            self.note_warn(
                "ZONE.WP",
                format!("unexpected invalid write pointer: wp [{wp_segno:#x},{wp_blkoff:#x}]"),
            );
            if !self.run.fix_on {
                self.fsck.chk.wp_inconsistent_zones += 1;
            }
        }
        // empty, closed and full zones are left as they are
        if !self.run.fix_on || !zone.is_open() {
            return Ok(());
        }

        crate::fsck_fix!(self, "ZONE.FINISH", "finish zone at segment {zone_segno:#x}");
        if !self.writable() {
            return Ok(());
        }
        let finished = match self.io.as_zoned() {
            Some(z) => z.finish_zone(zone.start),
            None => Ok(()),
        };
        if let Err(e) = finished {
            log::warn!("finishing zone at {zone_segno:#x} failed ({e:?}), filling it up");
            self.io
                .zero_fill(zone.wp, (zone.end() - zone.wp) as usize)
                .map_err(|e| FsckError::from(e).blk(wp_block))?;
        }
        self.fsck.chk.wp_fixed = true;
        Ok(())
    }

    /// Walks every zone of the device.
    pub(crate) fn fix_wp_sit_alignment(&mut self) -> FsckResult {
        if !self.run.zoned_hm {
            return Ok(());
        }
        let Some((size, count)) = self.io.as_zoned().map(|z| (z.zone_size(), z.zone_count())) else {
            return Ok(());
        };
        for i in 0..count {
            let Some(z) = self.io.as_zoned() else {
                break;
            };
            let zone = z.report_zone(i as u64 * size).map_err(FsckError::from)?;
            self.chk_and_fix_wp_with_sit(zone)?;
        }
        Ok(())
    }

    /// Zoned pre-pass, run before anything writes. With repairs on, the
    /// journals are flushed, the logs fixed and the pointers aligned;
    /// check-only runs just count inconsistent zones.
    pub(crate) fn chk_and_fix_write_pointers(&mut self) -> FsckResult {
        if !self.run.zoned_hm {
            return Ok(());
        }
        if !self.run.fix_on {
            return self.fix_wp_sit_alignment();
        }
        self.flush_nat_journal_entries()?;
        self.flush_sit_journal_entries()?;
        if self.check_curseg_offsets(true).is_err() {
            self.fix_curseg_info(true)?;
        }
        self.fix_wp_sit_alignment()?;
        self.fsck.chk.wp_fixed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_byte_conversion() {
        assert_eq!(blk_to_bytes(3), 3 * 4096);
        assert_eq!(bytes_to_blk(3 * 4096 + 17), 3);
    }
}
