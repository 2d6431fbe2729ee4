// SPDX-License-Identifier: MIT
//! Segment information table

use alloc::boxed::Box;

use f2io::prelude::*;
use zerocopy::{FromZeros, IntoBytes};

use crate::core::{bitmap::MsbBitmapOps, errors::*};
use crate::f2fs::{constant::*, session::CheckSession, types::*};

impl<'a, IO: F2IO + ?Sized> CheckSession<'a, IO> {
    pub(crate) fn build_sit_info(&mut self) {
        self.sm.base = self.meta.sit_blkaddr;
        self.sm.sit_blocks = self.meta.sit_blocks();
        self.sm.version_bitmap = self.ckpt.sit_bitmap().to_vec();
        self.sm.entries = vec![SegEntry::default(); self.meta.main_segments as usize];
        self.sm.free_segments = 0;
    }

    /// Active SIT block holding `segno`.
    pub fn current_sit_addr(&self, segno: u32) -> u32 {
        let off = segno / SIT_ENTRY_PER_BLOCK as u32;
        let mut addr = self.sm.base + off;
        if self.sm.version_bitmap.test_msb(off as usize) {
            addr += self.sm.sit_blocks;
        }
        addr
    }

    fn read_sit_block(&mut self, segno: u32) -> FsckResult<(u32, Box<F2fsSitBlock>)> {
        let addr = self.current_sit_addr(segno);
        let mut blk = Box::new(F2fsSitBlock::new_zeroed());
        self.read_block(addr, blk.as_mut_bytes())?;
        Ok((addr, blk))
    }

    /// Reports a SIT entry whose count, bitmap and type disagree.
    fn check_block_count(&mut self, segno: u32, raw: &F2fsSitEntry) {
        let vblocks = raw.valid_blocks() as u32;
        crate::fsck_bug!(
            self,
            vblocks > BLOCKS_PER_SEG,
            "SIT.VBLOCKS",
            "invalid SIT vblocks: segno={segno:#x}, {vblocks}"
        );
        crate::fsck_bug!(
            self,
            segno >= self.meta.segment_count,
            "SIT.SEGNO",
            "invalid SEGNO: {segno:#x}"
        );
        let map = raw.valid_map;
        let counted: u32 = map.iter().map(|b| b.count_ones()).sum();
        crate::fsck_bug!(
            self,
            vblocks != counted,
            "SIT.VBLOCKS",
            "wrong SIT valid blocks: segno={segno:#x}, {vblocks} vs. {counted}"
        );
        crate::fsck_bug!(
            self,
            raw.seg_type() >= NO_CHECK_TYPE,
            "SIT.TYPE",
            "wrong SIT type: segno={segno:#x}, {}",
            raw.seg_type()
        );
    }

    /// Loads every main segment's SIT entry, then applies the SIT journal.
    pub(crate) fn build_sit_entries(&mut self) -> FsckResult {
        if self.sm.loaded {
            return Ok(());
        }
        self.sm.loaded = true;
        let main = self.meta.main_segments;
        let mut cached: Option<(u32, Box<F2fsSitBlock>)> = None;
        for segno in 0..main {
            let addr = self.current_sit_addr(segno);
            let blk = match cached.take() {
                Some((a, b)) if a == addr => b,
                _ => self.read_sit_block(segno)?.1,
            };
            let raw = blk.entries[segno as usize % SIT_ENTRY_PER_BLOCK];
            cached = Some((addr, blk));

            self.check_block_count(segno, &raw);
            self.sm.entries[segno as usize] = SegEntry::from_raw(&raw);
            if raw.valid_blocks() == 0 && self.is_usable_seg(segno) && !self.is_cur_segno(segno) {
                self.sm.free_segments += 1;
            }
        }

        let mut n = self.cursegs[CURSEG_COLD_DATA].sum.journal_count();
        if n > SIT_JOURNAL_ENTRIES {
            crate::fsck_bug!(self, true, "SIT.JOURNAL", "sit journal holds {n} entries, truncated");
            n = SIT_JOURNAL_ENTRIES;
            self.cursegs[CURSEG_COLD_DATA].sum.set_journal_count(n);
        }
        for i in 0..n {
            let Some(j) = self.cursegs[CURSEG_COLD_DATA].sum.sit_journal(i) else {
                break;
            };
            let segno = j.segno;
            if segno >= main {
                crate::fsck_bug!(self, true, "SIT.JOURNAL", "journal segno({segno}) is invalid");
                self.cursegs[CURSEG_COLD_DATA].sum.set_journal_count(i);
                break;
            }
            self.check_block_count(segno, &j.se);
            self.sm.entries[segno as usize] = SegEntry::from_raw(&j.se);
        }
        Ok(())
    }

    // Before roll-forward is settled, allocation must not touch blocks
    // that only the fsync chain references; the checkpoint copies say
    // which blocks those are.

    /// Valid blocks of `segno` as allocation sees them.
    pub fn seg_vblocks(&self, segno: u32) -> u16 {
        let se = self.seg_entry(segno);
        if self.need_fsync_data_record() { se.ckpt_valid_blocks } else { se.valid_blocks }
    }

    pub fn seg_bitmap(&self, segno: u32) -> &[u8; SIT_VBLOCK_MAP_SIZE] {
        let se = self.seg_entry(segno);
        if self.need_fsync_data_record() { &se.ckpt_valid_map } else { &se.cur_valid_map }
    }

    pub fn seg_type(&self, segno: u32) -> u8 {
        let se = self.seg_entry(segno);
        if self.need_fsync_data_record() { se.ckpt_type } else { se.seg_type }
    }

    /// Builds the checker's SIT bitmap from the segment entries.
    pub(crate) fn build_sit_area_bitmap(&mut self) {
        let main = self.meta.main_segments;
        let mut bitmap = vec![0u8; main as usize * SIT_VBLOCK_MAP_SIZE];
        let mut sum_vblocks = 0u64;
        let mut free_segs = 0;
        for segno in 0..main {
            let se = &self.sm.entries[segno as usize];
            let at = segno as usize * SIT_VBLOCK_MAP_SIZE;
            bitmap[at..at + SIT_VBLOCK_MAP_SIZE].copy_from_slice(&se.cur_valid_map);
            if se.valid_blocks == 0 && self.is_usable_seg(segno) {
                if !self.is_cur_segno(segno) {
                    free_segs += 1;
                }
            } else {
                sum_vblocks += se.valid_blocks as u64;
            }
        }
        self.fsck.sit_bitmap = bitmap;
        self.fsck.chk.sit_valid_blocks = sum_vblocks;
        self.fsck.chk.sit_free_segs = free_segs;
        log::debug!("sit blocks [{sum_vblocks:#x} : {sum_vblocks}] free segs [{free_segs:#x} : {free_segs}]");
    }

    /// Rewrites every SIT entry from the main bitmap and drops the SIT
    /// journal.
    pub(crate) fn rewrite_sit_area_bitmap(&mut self) -> FsckResult {
        self.cursegs[CURSEG_COLD_DATA].sum.set_journal_count(0);
        let main = self.meta.main_segments;
        let mut segno = 0;
        while segno < main {
            let (addr, mut blk) = self.read_sit_block(segno)?;
            let first = segno - segno % SIT_ENTRY_PER_BLOCK as u32;
            let last = (first + SIT_ENTRY_PER_BLOCK as u32).min(main);
            for s in first..last {
                let at = s as usize * SIT_VBLOCK_MAP_SIZE;
                let mut map = [0u8; SIT_VBLOCK_MAP_SIZE];
                map.copy_from_slice(&self.fsck.main_bitmap[at..at + SIT_VBLOCK_MAP_SIZE]);
                let valid: u16 = map.iter().map(|b| b.count_ones() as u16).sum();

                let mut ty = self.sm.entries[s as usize].seg_type;
                if ty >= NO_CHECK_TYPE {
                    crate::fsck_bug!(self, true, "SIT.TYPE", "invalid type and valid blocks={s:#x},{valid:#x}");
                    ty = 0;
                }
                let se = &mut self.sm.entries[s as usize];
                se.cur_valid_map = map;
                se.valid_blocks = valid;
                let raw = &mut blk.entries[s as usize % SIT_ENTRY_PER_BLOCK];
                raw.valid_map = map;
                raw.vblocks = ((ty as u16) << SIT_VBLOCKS_SHIFT) | valid;
            }
            self.write_block(addr, blk.as_bytes())?;
            segno = last;
        }
        Ok(())
    }

    /// Writes the journaled SIT entries back to their blocks and empties
    /// the journal. Returns how many moved.
    pub(crate) fn flush_sit_journal_entries(&mut self) -> FsckResult<usize> {
        let n = self.cursegs[CURSEG_COLD_DATA].sum.journal_count().min(SIT_JOURNAL_ENTRIES);
        for i in 0..n {
            let Some(j) = self.cursegs[CURSEG_COLD_DATA].sum.sit_journal(i) else {
                break;
            };
            if j.segno >= self.meta.main_segments {
                continue;
            }
            self.write_sit_entry(j.segno)?;
        }
        self.cursegs[CURSEG_COLD_DATA].sum.set_journal_count(0);
        Ok(n)
    }

    fn write_sit_entry(&mut self, segno: u32) -> FsckResult {
        let (addr, mut blk) = self.read_sit_block(segno)?;
        blk.entries[segno as usize % SIT_ENTRY_PER_BLOCK] = self.sm.entries[segno as usize].to_raw();
        self.write_block(addr, blk.as_bytes())
    }

    /// Moves both journals to their areas; a new checkpoint follows when
    /// anything moved.
    pub(crate) fn flush_journal_entries(&mut self) -> FsckResult {
        let n_nats = self.flush_nat_journal_entries()?;
        let n_sits = self.flush_sit_journal_entries()?;
        if n_nats > 0 || n_sits > 0 {
            log::info!("flush_journal_entries() n_nats: {n_nats}, n_sits: {n_sits}");
            self.write_checkpoints()?;
        }
        Ok(())
    }
}
