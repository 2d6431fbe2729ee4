// SPDX-License-Identifier: MIT
//! Block allocation for repairs
//!
//! Repairs that need a fresh block (a lost+found dentry block, a relocated
//! node on a host-managed zoned device) go through [`reserve_new_block`].
//! The search mirrors the kernel's slack-space recycling: it walks the main
//! area looking for a clear bit in a segment of the wanted log type, and
//! only opens an empty section while the free pool stays above the
//! reserved floor.
//!
//! [`reserve_new_block`]: CheckSession::reserve_new_block

pub mod segment;
pub mod zoned;

use f2io::prelude::*;
use zerocopy::IntoBytes;

use crate::core::{bitmap::MsbBitmapOps, errors::*};
use crate::f2fs::{constant::*, session::CheckSession, types::*};

impl<'a, IO: F2IO + ?Sized> CheckSession<'a, IO> {
    /// Finds the next block a log of type `want` may take, scanning from
    /// `from` forward (or backward when `left`).
    ///
    /// With `new_sec` only an empty section is accepted. On host-managed
    /// zoned devices a regular request just takes the log's next block.
    pub fn find_next_free_block(&mut self, from: u32, left: bool, want: usize, new_sec: bool) -> FsckResult<u32> {
        if self.run.zoned_hm && !new_sec {
            return self.next_block_in_zone(want);
        }

        let main = self.meta.main_blkaddr;
        let end = self.meta.end_blkaddr();
        let mut to = from;
        if left && to > 0 {
            to -= 1;
        }
        let not_enough = self.sm.free_segments <= self.sm.reserved_segments + 1;
        let readonly = self.meta.readonly();
        let spp = self.meta.segs_per_sec;

        while to >= main && to < end {
            let segno = self.meta.segno(to);
            let offset = self.meta.blkoff(to) as usize;
            let vblocks = self.seg_vblocks(segno) as u32;

            let skip = vblocks == BLOCKS_PER_SEG
                || (!readonly && self.is_cur_segno(segno))
                || (vblocks == 0 && not_enough);
            if skip {
                to = if left {
                    self.meta.start_block(segno).wrapping_sub(1)
                } else {
                    self.meta.start_block(segno + 1)
                };
                continue;
            }

            if vblocks == 0 && segno % spp == 0 {
                let section_empty = (1..spp).all(|i| segno + i >= self.meta.main_segments || self.seg_vblocks(segno + i) == 0);
                if section_empty && self.write_pointer_at_zone_start(segno) {
                    self.set_section_type(segno, want as u8);
                    return Ok(to);
                }
            }

            if self.seg_type(segno) as usize != want {
                to = if left {
                    self.meta.start_block(segno).wrapping_sub(1)
                } else {
                    self.meta.start_block(segno + 1)
                };
                continue;
            }
            if !new_sec && !self.seg_bitmap(segno).test_msb(offset) {
                return Ok(to);
            }
            to = if left { to.wrapping_sub(1) } else { to + 1 };
        }
        Err(FsckError::fatal("no free block").blk(from))
    }

    /// Host-managed zoned allocation: the log's next block, rolling over to
    /// the next segment, or to a fresh section at a zone boundary.
    fn next_block_in_zone(&mut self, want: usize) -> FsckResult<u32> {
        let to = self.next_free_blkaddr(want);
        self.cursegs[want].next_blkoff += 1;
        if self.cursegs[want].next_blkoff as u32 != BLOCKS_PER_SEG {
            return Ok(to);
        }

        let segs_per_zone = self.meta.segs_per_sec * self.meta.secs_per_zone;
        let mut segno = self.cursegs[want].segno + 1;
        if segno % segs_per_zone == 0 {
            let fresh = self.find_next_free_block(self.meta.main_blkaddr, false, want, true)?;
            segno = self.meta.segno(fresh);
        }

        let old = self.cursegs[want].segno;
        let sum = self.cursegs[want].sum.clone();
        self.write_block(self.meta.sum_blkaddr(old), sum.as_bytes())?;

        let c = &mut self.cursegs[want];
        c.segno = segno;
        c.next_blkoff = 0;
        c.alloc_type = LFS;
        c.zone = self.meta.zone_of(segno);
        self.load_curseg_entries(want)?;
        self.reset_curseg(want);
        self.zero_journal_of(want);
        Ok(to)
    }

    /// Retypes every segment of the section starting at `segno`.
    pub(crate) fn set_section_type(&mut self, segno: u32, ty: u8) {
        if self.meta.segs_per_sec == 1 {
            return;
        }
        for i in 0..self.meta.segs_per_sec {
            if let Some(se) = self.sm.entries.get_mut((segno + i) as usize) {
                se.seg_type = ty;
                se.orig_type = ty;
            }
        }
    }

    /// Replaces the summary entries of log `ty` with its SSA block.
    pub(crate) fn load_curseg_entries(&mut self, ty: usize) -> FsckResult {
        let ssa = self.meta.sum_blkaddr(self.cursegs[ty].segno);
        let sum = self.read_sum_block(ssa)?;
        self.cursegs[ty].sum.entries = sum.entries;
        Ok(())
    }

    /// A log moving to a new zone drops the journal it carries.
    pub(crate) fn zero_journal_of(&mut self, ty: usize) {
        if ty == CURSEG_HOT_DATA || ty == CURSEG_COLD_DATA {
            self.cursegs[ty].sum.set_journal_count(0);
        }
    }

    /// Allocates a block for log type `ty` and records `sum` as its owner.
    ///
    /// `to` holds the block being replaced (or `NULL_ADDR` for a new block)
    /// and receives the new address. New blocks are charged to the valid
    /// counters; replacements are not.
    pub fn reserve_new_block(&mut self, to: &mut u32, sum: &F2fsSummary, ty: usize, is_inode: bool) -> FsckResult {
        let old = *to;
        let is_node = is_node_seg(ty as u8);
        if old == NULL_ADDR {
            if self.fsck.chk.valid_blk_cnt >= self.totals.user_block_count {
                log::error!("not enough space");
                return Err(FsckError::counter("not enough space"));
            }
            if is_node && self.fsck.chk.valid_node_cnt >= self.totals.total_node_count {
                log::error!("not enough space for node block");
                return Err(FsckError::counter("not enough space for node block"));
            }
        }

        let mut ty = ty;
        let mut from = self.meta.main_blkaddr;
        let mut left = false;
        if self.meta.readonly() {
            if is_node {
                ty = CURSEG_HOT_NODE;
                from = self.meta.end_blkaddr();
                left = true;
            } else {
                ty = CURSEG_HOT_DATA;
            }
        }

        let blkaddr = self.find_next_free_block(from, left, ty, false)?;
        let segno = self.meta.segno(blkaddr);
        let offset = self.meta.blkoff(blkaddr) as usize;
        let fsync = self.need_fsync_data_record();

        let se = self.seg_entry_mut(segno);
        se.seg_type = ty as u8;
        se.orig_type = ty as u8;
        let was_free = se.valid_blocks == 0;
        se.valid_blocks += 1;
        se.cur_valid_map.set_msb(offset);
        if fsync {
            se.ckpt_type = ty as u8;
            se.ckpt_valid_blocks += 1;
            se.ckpt_valid_map.set_msb(offset);
        }
        if was_free {
            self.sm.free_segments = self.sm.free_segments.saturating_sub(1);
        }
        self.set_main_bitmap(blkaddr, ty as u8);
        self.set_sit_bitmap(blkaddr);

        if old == NULL_ADDR {
            self.totals.valid_blocks += 1;
            self.fsck.chk.valid_blk_cnt += 1;
            if is_node {
                self.totals.valid_nodes += 1;
                self.fsck.chk.valid_nat_entry_cnt += 1;
                self.fsck.chk.valid_node_cnt += 1;
                if is_inode {
                    self.totals.valid_inodes += 1;
                    self.fsck.chk.valid_inode_cnt += 1;
                }
            }
        }

        *to = blkaddr;
        log::debug!("reserved block {blkaddr:#x} for log {ty} (was {old:#x})");
        self.update_sum_entry(blkaddr, sum)
    }

    /// Writes a repaired block back.
    ///
    /// Conventional devices take it in place. A host-managed zoned device
    /// cannot overwrite, so the block moves to a fresh address of the same
    /// log, `blkaddr` is updated, and the pointer to it follows: the NAT
    /// for a node, or the owning node for a data block. `parent` is the
    /// owning node when the caller holds it and will write it itself.
    pub(crate) fn update_block(&mut self, buf: &[u8], blkaddr: &mut u32, parent: Option<&mut F2fsNode>) -> FsckResult {
        let old = *blkaddr;
        if !self.run.zoned_hm {
            return self.write_block(old, buf);
        }

        let segno = self.meta.segno(old);
        let offset = self.meta.blkoff(old) as usize;
        let fsync = self.need_fsync_data_record();
        let se = self.seg_entry_mut(segno);
        let ty = se.seg_type;
        se.valid_blocks = se.valid_blocks.saturating_sub(1);
        se.cur_valid_map.clear_msb(offset);
        if fsync {
            se.ckpt_valid_map.clear_msb(offset);
        }
        self.clear_main_bitmap(old);
        self.clear_sit_bitmap(old);

        let new = self.find_next_free_block(self.meta.main_blkaddr, false, ty as usize, false)?;
        self.write_block(new, buf)?;
        *blkaddr = new;

        let segno = self.meta.segno(new);
        let offset = self.meta.blkoff(new) as usize;
        let se = self.seg_entry_mut(segno);
        se.seg_type = ty;
        se.orig_type = ty;
        se.valid_blocks += 1;
        se.cur_valid_map.set_msb(offset);
        if fsync {
            se.ckpt_valid_map.set_msb(offset);
        }
        self.set_main_bitmap(new, ty);
        self.set_sit_bitmap(new);

        let (_, sum) = self.get_sum_entry(old)?;
        self.update_sum_entry(new, &sum)?;
        if is_data_seg(ty) {
            self.update_data_blkaddr(sum.nid, sum.ofs_in_node as usize, new, parent)?;
        } else {
            self.update_nat_blkaddr(0, sum.nid, new)?;
        }
        log::debug!(
            "moved {} block {old:#x} -> {new:#x}",
            if is_data_seg(ty) { "data" } else { "node" }
        );
        Ok(())
    }

    /// Points slot `ofs` of node `nid` at `newaddr`, dropping an extent
    /// cache entry that covered the old address.
    fn update_data_blkaddr(&mut self, nid: u32, ofs: usize, newaddr: u32, parent: Option<&mut F2fsNode>) -> FsckResult {
        if let Some(node) = parent {
            let old = set_data_slot(node, ofs, newaddr);
            if node.is_inode() {
                drop_extent_covering(node, old);
            }
            return Ok(());
        }

        let ni = self.get_node_info(nid)?;
        let mut node = self.read_node(ni.blk_addr)?;
        let old = set_data_slot(&mut node, ofs, newaddr);
        let mut at = ni.blk_addr;
        if node.is_inode() {
            drop_extent_covering(&mut node, old);
            self.rewrite_node(&mut node, &mut at)?;
            return Ok(());
        }
        self.rewrite_node(&mut node, &mut at)?;

        let ino = node.ino();
        let ii = self.get_node_info(ino)?;
        let mut inode = self.read_node(ii.blk_addr)?;
        if drop_extent_covering(&mut inode, old) {
            let mut at = ii.blk_addr;
            self.rewrite_node(&mut inode, &mut at)?;
        }
        Ok(())
    }

    /// Refreshes the inode checksum and writes the node through
    /// [`update_block`](Self::update_block).
    pub(crate) fn rewrite_node(&mut self, node: &mut F2fsNode, blkaddr: &mut u32) -> FsckResult {
        if node.is_inode() && self.meta.has_feature(F2FS_FEATURE_INODE_CHKSUM) {
            let crc = crate::f2fs::crc::inode_chksum(self.meta.chksum_seed, node.as_bytes());
            node.set_i_inode_checksum(crc);
        }
        let buf = node.as_bytes().to_vec();
        self.update_block(&buf, blkaddr, None)
    }
}

/// Stores `addr` at data slot `ofs`; returns the previous address.
fn set_data_slot(node: &mut F2fsNode, ofs: usize, addr: u32) -> u32 {
    if node.is_inode() {
        let idx = node.extra_isize() + ofs;
        let old = node.i_addr(idx);
        node.set_i_addr(idx, addr);
        old
    } else {
        let old = node.dn_entry(ofs);
        node.set_dn_entry(ofs, addr);
        old
    }
}

/// Clears the inode's extent cache if it covered `addr`.
fn drop_extent_covering(inode: &mut F2fsNode, addr: u32) -> bool {
    let ext = inode.i.i_ext;
    let (start, len) = (ext.blk_addr, ext.len);
    if addr >= start && addr < start.wrapping_add(len) {
        inode.i.i_ext.len = 0;
        return true;
    }
    false
}
