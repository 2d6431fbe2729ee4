// SPDX-License-Identifier: MIT
//! Fsync chain left by an unclean shutdown
//!
//! After a crash the kernel replays the warm-node chain that starts at the
//! warm node log's next free block. The checker must treat the blocks that
//! chain references as in use, so they are marked in the checkpoint copy of
//! the SIT maps before anything allocates.

use alloc::{boxed::Box, collections::BTreeMap};

use f2io::prelude::*;

use crate::core::{bitmap::MsbBitmapOps, errors::*};
use crate::f2fs::{constant::*, meta::is_valid_data_blkaddr, session::CheckSession, types::*};

/// Fsync inodes found in the chain: ino to the last block naming it.
type FsyncInodes = BTreeMap<u32, u32>;

impl<'a, IO: F2IO + ?Sized> CheckSession<'a, IO> {
    /// True when `node` was written after the current checkpoint.
    pub fn is_recoverable_dnode(&self, node: &F2fsNode) -> bool {
        let mut cp_ver = self.ckpt.cp.checkpoint_ver;
        let node_ver = node.footer.cp_ver;
        if self.ckpt.cp.is_set(CP_NOCRC_RECOVERY_FLAG) {
            return (cp_ver << 32) == (node_ver << 32);
        }
        if self.ckpt.cp.is_set(CP_CRC_RECOVERY_FLAG) {
            let ofs = self.ckpt.cp.checksum_offset as usize;
            let crc = self
                .ckpt
                .raw
                .get(ofs..ofs + 4)
                .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .unwrap_or(0);
            cp_ver |= (crc as u64) << 32;
        }
        cp_ver == node_ver
    }

    /// Reads the chain node at `blkaddr` if it still belongs to it.
    fn read_chain_node(&mut self, blkaddr: u32) -> FsckResult<Option<Box<F2fsNode>>> {
        if !self.meta.is_valid_blkaddr(blkaddr) {
            return Ok(None);
        }
        let node = self.read_node(blkaddr)?;
        Ok(self.is_recoverable_dnode(&node).then_some(node))
    }

    /// Marks what the fsync chain references in the checkpoint SIT copy.
    ///
    /// A looped chain is an error in check-only mode; with repairs on it is
    /// cut and the walk continues.
    pub(crate) fn record_fsync_data(&mut self) -> FsckResult {
        if !self.need_fsync_data_record() {
            return Ok(());
        }
        let inodes = self.find_fsync_inode()?;
        if !inodes.is_empty() {
            self.run.roll_forward = true;
            log::info!("{} fsync inode(s) pending roll-forward", inodes.len());
        }
        self.build_sit_entries()?;
        self.traverse_dnodes(inodes)
    }

    fn find_fsync_inode(&mut self) -> FsckResult<FsyncInodes> {
        let mut inodes = FsyncInodes::new();
        let mut blkaddr = self.next_free_blkaddr(CURSEG_WARM_NODE);
        let mut fast = blkaddr;
        let mut detecting = true;
        // end of the chain once the loop is cut, even if the cut was not written
        let mut cut = None;

        while let Some(node) = self.read_chain_node(blkaddr)? {
            if node.is_fsync() {
                inodes.insert(node.ino(), blkaddr);
            }
            if cut == Some(blkaddr) {
                break;
            }
            blkaddr = node.next_blkaddr();

            if !detecting {
                continue;
            }
            for _ in 0..2 {
                match self.read_chain_node(fast)? {
                    Some(n) => fast = n.next_blkaddr(),
                    None => {
                        detecting = false;
                        break;
                    }
                }
            }
            if !detecting || fast != blkaddr {
                continue;
            }
            crate::fsck_bug!(self, true, "ROLL.LOOP", "detect looped node chain, blkaddr:{blkaddr}");
            if !self.run.fix_on {
                return Err(FsckError::structural("looped node chain").blk(blkaddr));
            }
            let start = self.next_free_blkaddr(CURSEG_WARM_NODE);
            cut = Some(self.loop_node_chain_fix(start, blkaddr)?);
            detecting = false;
        }
        Ok(inodes)
    }

    /// Cuts the loop: finds its entry, then nullifies the next pointer of
    /// the node that closes it. Returns the address of that node.
    fn loop_node_chain_fix(&mut self, mut fast: u32, mut slow: u32) -> FsckResult<u32> {
        while fast != slow {
            fast = self.read_node(fast)?.next_blkaddr();
            slow = self.read_node(slow)?.next_blkaddr();
        }
        let entry = slow;

        let mut blkaddr = entry;
        let (last, mut node) = loop {
            let node = self.read_node(blkaddr)?;
            let next = node.next_blkaddr();
            if next == entry {
                break (blkaddr, node);
            }
            blkaddr = next;
        };
        node.footer.next_blkaddr = NULL_ADDR;
        self.write_node(last, &mut node)?;
        crate::fsck_fix!(self, "ROLL.LOOP", "fix looped node chain on blkaddr {last}");
        Ok(last)
    }

    fn traverse_dnodes(&mut self, mut inodes: FsyncInodes) -> FsckResult {
        let mut blkaddr = self.next_free_blkaddr(CURSEG_WARM_NODE);
        while let Some(node) = self.read_chain_node(blkaddr)? {
            let ino = node.ino();
            if let Some(&last) = inodes.get(&ino) {
                if self.do_record_fsync_data(&node, blkaddr)? {
                    // reached blocks the checkpoint already owns
                    break;
                }
                if last == blkaddr {
                    inodes.remove(&ino);
                }
            }
            blkaddr = node.next_blkaddr();
            if inodes.is_empty() {
                break;
            }
        }
        Ok(())
    }

    /// Marks a chain node and its data. Returns `true` when the node is
    /// already accounted for and the walk should stop.
    fn do_record_fsync_data(&mut self, node: &F2fsNode, blkaddr: u32) -> FsckResult<bool> {
        if !self.mark_ckpt_block(blkaddr, CURSEG_WARM_NODE as u8) {
            return Ok(true);
        }
        log::debug!("record fsync node: ino = {}, ofs = {}, blkaddr = {blkaddr}", node.ino(), node.ofs_of_node());

        if node.is_inode() && node.i.i_inline & F2FS_INLINE_DATA != 0 {
            return Ok(false);
        }
        if node.ofs_of_node() == XATTR_NODE_OFFSET {
            return Ok(false);
        }

        let per_page = if node.is_inode() {
            node.addrs_per_inode(self.meta.flexible_inline_xattr())
        } else {
            DEF_ADDRS_PER_BLOCK
        };
        let mut recorded = 0;
        for ofs in 0..per_page {
            let Some(addr) = node.data_blkaddr(ofs) else {
                break;
            };
            if !is_valid_data_blkaddr(addr) {
                continue;
            }
            if !self.meta.is_valid_blkaddr(addr) {
                return Err(FsckError::device_pointer("fsync data outside the main area").blk(addr));
            }
            if self.mark_ckpt_block(addr, CURSEG_WARM_DATA as u8) {
                recorded += 1;
            }
        }
        log::debug!("recover data: ino = {}, recorded = {recorded}", node.ino());
        Ok(false)
    }

    /// Sets the checkpoint-copy bit of `blkaddr`; `false` if it was
    /// already set in either map.
    fn mark_ckpt_block(&mut self, blkaddr: u32, ty: u8) -> bool {
        let segno = self.meta.segno(blkaddr);
        let off = self.meta.blkoff(blkaddr) as usize;
        let se = self.seg_entry_mut(segno);
        if se.cur_valid_map.test_msb(off) || se.ckpt_valid_map.test_msb(off) {
            return false;
        }
        if se.ckpt_valid_blocks == 0 {
            se.ckpt_type = ty;
        }
        se.ckpt_valid_blocks += 1;
        se.ckpt_valid_map.set_msb(off);
        true
    }
}
