// SPDX-License-Identifier: MIT
//! Quick metadata check for preen mode
//!
//! Compares the loaded tables with the checkpoint without walking the
//! tree. Each check in [`PreenChecks`] can be switched off; the first
//! one that fails stops the list and the caller falls back to the full
//! check.

use f2io::prelude::*;

use crate::core::{errors::*, options::PreenChecks};
use crate::f2fs::{constant::*, session::CheckSession, types::*};

impl<'a, IO: F2IO + ?Sized> CheckSession<'a, IO> {
    pub(crate) fn chk_meta(&mut self) -> FsckResult {
        let checks = self.opts.preen_checks;
        let main = self.meta.main_segments;
        let cp = self.ckpt.cp;

        let mut sit_valid_segs = 0u32;
        let mut sit_node_blks = 0u32;
        for segno in 0..main {
            let se = self.seg_entry(segno);
            if se.valid_blocks != 0 {
                sit_valid_segs += 1;
            } else if self.is_cur_segno(segno) {
                log::info!("curseg {segno} is counted in valid segs");
                sit_valid_segs += 1;
            }
            if is_node_seg(se.seg_type) {
                sit_node_blks += se.valid_blocks as u32;
            }
        }
        let usable = (0..main).filter(|&s| self.is_usable_seg(s)).count() as u32;
        let chk = self.fsck.chk;

        if checks.contains(PreenChecks::SIT_FREE_SEGMENTS)
            && crate::fsck_bug!(
                self,
                chk.sit_free_segs + sit_valid_segs != usable,
                "PREEN.SIT",
                "SIT usage does not match: sit_free_segs {}, sit_valid_segs {sit_valid_segs}, total_segs {usable}",
                chk.sit_free_segs
            )
        {
            return Err(FsckError::counter("sit usage"));
        }
        if checks.contains(PreenChecks::NAT_NODE_COUNT)
            && crate::fsck_bug!(
                self,
                chk.valid_nat_entry_cnt != sit_node_blks,
                "PREEN.NODES",
                "node count does not match: valid_nat_entry_cnt {}, sit_node_blks {sit_node_blks}",
                chk.valid_nat_entry_cnt
            )
        {
            return Err(FsckError::counter("nat node count"));
        }
        if checks.contains(PreenChecks::CP_FREE_SEGMENTS)
            && crate::fsck_bug!(
                self,
                chk.sit_free_segs != { cp.free_segment_count },
                "PREEN.FREE",
                "free segs does not match: sit_free_segs {}, free_segment_count {}",
                chk.sit_free_segs,
                { cp.free_segment_count }
            )
        {
            return Err(FsckError::counter("free segment count"));
        }
        if checks.contains(PreenChecks::CP_NODE_COUNT)
            && crate::fsck_bug!(
                self,
                chk.valid_nat_entry_cnt != { cp.valid_node_count },
                "PREEN.CPNODES",
                "valid node does not match: valid_nat_entry_cnt {}, valid_node_count {}",
                chk.valid_nat_entry_cnt,
                { cp.valid_node_count }
            )
        {
            return Err(FsckError::counter("valid node count"));
        }
        if checks.contains(PreenChecks::ORPHAN_INODES) {
            self.chk_orphan_node()?;
        }
        if checks.contains(PreenChecks::NAT_PLACEMENT) {
            self.chk_nat_placement()?;
        }
        if checks.contains(PreenChecks::QUOTA_INODES) {
            self.chk_quota_node()?;
        }
        if checks.contains(PreenChecks::CP_INODE_COUNT)
            && crate::fsck_bug!(
                self,
                self.fsck.nat_valid_inode_cnt != { cp.valid_inode_count },
                "PREEN.INODES",
                "valid inode does not match: nat_valid_inode_cnt {}, valid_inode_count {}",
                self.fsck.nat_valid_inode_cnt,
                { cp.valid_inode_count }
            )
        {
            return Err(FsckError::counter("valid inode count"));
        }
        Ok(())
    }

    /// Every NAT address must be a SIT-valid main block owned by a
    /// valid inode.
    fn chk_nat_placement(&mut self) -> FsckResult {
        for nid in 0..self.fsck.entries.len() {
            let e = self.fsck.entries[nid];
            let blk = e.block_addr;
            let ino = e.ino;
            if blk == NULL_ADDR {
                continue;
            }
            if crate::fsck_bug!(
                self,
                !self.meta.is_valid_blkaddr(blk),
                "PREEN.NAT",
                "nat entry[ino {ino} block_addr {blk:#x}] is invalid"
            ) {
                return Err(FsckError::device_pointer("nat address").nid(nid as u32).blk(blk));
            }
            if crate::fsck_bug!(
                self,
                !self.test_sit_bitmap(blk),
                "PREEN.NAT",
                "nat entry[ino {ino} block_addr {blk:#x}] not find it in sit_area_bitmap"
            ) {
                return Err(FsckError::cross_ref("nat address not in sit").nid(nid as u32).blk(blk));
            }
            if crate::fsck_bug!(
                self,
                !self.meta.is_valid_nid(ino),
                "PREEN.NAT",
                "nat_entry->ino {ino} exceeds the range of nat entries {}",
                self.fsck.entries.len()
            ) {
                return Err(FsckError::structural("nat owner out of range").nid(nid as u32));
            }
            if crate::fsck_bug!(
                self,
                !self.test_nat_bitmap(ino),
                "PREEN.NAT",
                "nat_entry->ino {ino} is not set in nat_area_bitmap"
            ) {
                return Err(FsckError::cross_ref("nat owner not valid").nid(nid as u32));
            }
        }
        Ok(())
    }
}
