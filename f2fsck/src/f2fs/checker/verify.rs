// SPDX-License-Identifier: MIT
//! Global cross-check after the walk
//!
//! What the walk counted is compared with the checkpoint counters, the
//! main bitmap with the SIT bitmap, and the NAT bitmap must be empty.
//! Any mismatch marks the run as buggy, which makes the commit phase
//! rewrite the metadata from the walk's view.

use f2io::prelude::*;

use crate::core::errors::*;
use crate::f2fs::{constant::*, session::CheckSession};

impl<'a, IO: F2IO + ?Sized> CheckSession<'a, IO> {
    /// Reconnects or reports nodes the walk never reached, and inodes
    /// declaring more links than found.
    pub(crate) fn verify_reachability(&mut self) -> FsckResult {
        let lpf_enabled = self.run.fix_on && self.meta.has_feature(F2FS_FEATURE_LOST_FOUND) && self.opts.lost_found;
        let lost = self.unreached_nids().len();
        if lpf_enabled && lost != 0 {
            // counted as a bug so that the commit rewrites SIT and checkpoint
            crate::fsck_bug!(self, true, "NAT.UNREACHABLE", "{lost:#x} unreachable nodes, reconnecting to lost+found");
            let cnt = self.reconnect_files()?;
            log::info!("reconnect {cnt} files to lost+found");
        }

        let unreached = self.unreached_nids();
        for &nid in &unreached {
            let blk = self.get_node_info(nid).map(|ni| ni.blk_addr).unwrap_or(NULL_ADDR);
            crate::fsck_bug!(self, true, "NAT.UNREACHABLE", "NID[{nid:#x}] is unreachable, blkaddr:{blk:#x}");
        }

        let pending: alloc::vec::Vec<(u32, u32)> = self.fsck.hard_links.iter().map(|(&n, h)| (n, h.links)).collect();
        for (nid, links) in pending {
            crate::fsck_bug!(self, true, "INODE.LINKS", "NID[{nid:#x}] has [{links:#x}] more unreachable links");
        }
        Ok(())
    }

    /// Compares the walk's counters and bitmaps with the checkpoint.
    pub(crate) fn fsck_verify(&mut self) -> FsckResult {
        if self.run.zoned_hm {
            let zones = self.fsck.chk.wp_inconsistent_zones;
            crate::fsck_bug!(self, zones != 0, "WP.ZONES", "write pointers inconsistent in {zones:#x} zones");
            if self.fsck.chk.wp_fixed && self.run.fix_on {
                self.run.force_commit = true;
            }
        }

        self.report_sizes();

        let unreached = self.unreached_nids().len();
        crate::fsck_bug!(self, unreached != 0, "NAT.UNREACHABLE", "Unreachable nat entries [{unreached:#x}]");

        if let Some(byte) = self.bitmap_mismatch() {
            crate::fsck_bug!(
                self,
                true,
                "SIT.BITMAP",
                "SIT valid block bitmap differs from the walk at segment {:#x}",
                byte / SIT_VBLOCK_MAP_SIZE
            );
        }

        let chk = self.fsck.chk;
        let totals = self.totals;
        crate::fsck_bug!(
            self,
            !self.fsck.hard_links.is_empty(),
            "INODE.LINKS",
            "Hard link checking for regular file failed [{:#x}]",
            chk.multi_hard_link_files
        );
        crate::fsck_bug!(
            self,
            totals.valid_blocks != chk.valid_blk_cnt,
            "CP.BLOCKS",
            "valid_block_count mismatch with CP [{:#x}, {:#x}]",
            totals.valid_blocks,
            chk.valid_blk_cnt
        );
        crate::fsck_bug!(
            self,
            totals.valid_nodes != chk.valid_node_cnt,
            "CP.NODES",
            "valid_node_count mismatch with CP (de lookup) [{:#x}, {:#x}]",
            totals.valid_nodes,
            chk.valid_node_cnt
        );
        crate::fsck_bug!(
            self,
            totals.valid_nodes != chk.valid_nat_entry_cnt,
            "CP.NODES",
            "valid_node_count mismatch with CP (nat lookup) [{:#x}, {:#x}]",
            totals.valid_nodes,
            chk.valid_nat_entry_cnt
        );
        crate::fsck_bug!(
            self,
            totals.valid_inodes != chk.valid_inode_cnt,
            "CP.INODES",
            "valid_inode_count mismatch with CP [{:#x}, {:#x}]",
            totals.valid_inodes,
            chk.valid_inode_cnt
        );
        let cp_free = { self.ckpt.cp.free_segment_count };
        crate::fsck_bug!(
            self,
            cp_free != chk.sit_free_segs,
            "CP.FREE",
            "free segment_count mismatch with CP [{cp_free:#x}, {:#x}]",
            chk.sit_free_segs
        );

        if self.check_curseg_offsets(false).is_err() {
            log::warn!("next block offset is not free");
        }
        if !self.check_sit_types() && self.run.fix_on {
            self.run.force_commit = true;
        }
        log::info!(
            "verify done: blocks {:#x}, nodes {:#x}, inodes {:#x}, bug_on {}",
            chk.valid_blk_cnt,
            chk.valid_node_cnt,
            chk.valid_inode_cnt,
            self.run.bug_on
        );
        Ok(())
    }

    /// Smallest image that would hold the valid data, and the free space.
    fn report_sizes(&mut self) {
        let per_sec = self.meta.blocks_per_sec() as u64;
        let nodes = self.totals.valid_nodes as u64;
        let data = self.totals.valid_blocks.saturating_sub(nodes);
        let node_secs = nodes.div_ceil(per_sec);
        let data_secs = data.div_ceil(per_sec);
        let used = node_secs + data_secs;
        let free_blks = (self.meta.total_sections as u64).saturating_sub(used) * per_sec;
        let max_blks = self.meta.main_blkaddr as u64 + used * per_sec;
        let shift = 20 - F2FS_BLKSIZE_BITS;
        let msg = alloc::format!("Max image size: {} MB, Free space: {} MB", max_blks >> shift, free_blks >> shift);
        self.note_info("FS.SIZE", msg);
    }
}
