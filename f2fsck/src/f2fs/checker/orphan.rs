// SPDX-License-Identifier: MIT
//! Orphan inode list
//!
//! Inodes unlinked while still open are listed in the checkpoint pack.
//! Each is walked like a regular inode; survivors stay in the list and
//! the rest are dropped so their blocks fall out of the main bitmap.

use alloc::vec::Vec;

use f2io::prelude::*;
use zerocopy::{FromBytes, IntoBytes};

use crate::core::{errors::*, options::PreenMode};
use crate::f2fs::{
    constant::*,
    session::{CheckSession, ChildInfo, ComprBlkCnt},
    types::*,
};

impl<'a, IO: F2IO + ?Sized> CheckSession<'a, IO> {
    /// Blocks of the orphan area: `(first block, count)`.
    pub(crate) fn orphan_area(&self) -> (u32, u32) {
        let start = self.ckpt.pack_start(self.meta.cp_blkaddr) + 1 + self.meta.cp_payload;
        let count = self
            .ckpt
            .cp
            .cp_pack_start_sum
            .saturating_sub(1 + self.meta.cp_payload);
        (start, count)
    }

    pub(crate) fn chk_orphan_node(&mut self) -> FsckResult {
        if !self.ckpt.cp.is_set(CP_ORPHAN_PRESENT_FLAG) {
            return Ok(());
        }
        let (start, count) = self.orphan_area();
        let validate_only = self.opts.preen == PreenMode::Quick && !self.run.fix_on;

        for i in 0..count {
            let mut raw = alloc::vec![0u8; F2FS_BLKSIZE];
            self.read_block(start + i, &mut raw)?;
            let mut blk = F2fsOrphanBlock::read_from_bytes(&raw)
                .map_err(|_| FsckError::structural("orphan block size").blk(start + i))?;
            let entry_count = blk.entry_count;
            if crate::fsck_bug!(
                self,
                entry_count as usize > F2FS_ORPHANS_PER_BLOCK,
                "ORPHAN.COUNT",
                "orphan block {i} lists {entry_count} entries"
            ) {
                blk.entry_count = F2FS_ORPHANS_PER_BLOCK as u32;
            }

            let mut kept: Vec<u32> = Vec::with_capacity(blk.inos().len());
            for &ino in blk.inos() {
                log::debug!("[{i:3}] orphan ino [{ino:#x}]");
                if validate_only {
                    let ni = self.get_node_info(ino)?;
                    if !self.meta.is_valid_nid(ino) || !self.meta.is_valid_blkaddr(ni.blk_addr) {
                        return Err(FsckError::structural("orphan inode address").nid(ino));
                    }
                    continue;
                }
                let mut blk_cnt = 1u64;
                let mut cbc = ComprBlkCnt::default();
                let mut child = ChildInfo::default();
                match self.chk_node_blk(None, ino, F2FS_FT_ORPHAN, NodeKind::Inode, &mut blk_cnt, &mut cbc, &mut child) {
                    Ok(()) => kept.push(ino),
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(_) if self.run.fix_on => {
                        crate::fsck_fix!(self, "ORPHAN.INODE", "[{ino:#x}] remove from orphan list");
                    }
                    Err(_) => {
                        crate::fsck_bug!(self, true, "ORPHAN.INODE", "[{ino:#x}] wrong orphan inode");
                    }
                }
            }

            if !validate_only && self.writable() && kept.len() != entry_count as usize {
                let mut out = F2fsOrphanBlock::default();
                out.ino[..kept.len()].copy_from_slice(&kept);
                out.blk_addr = blk.blk_addr;
                out.blk_count = blk.blk_count;
                out.entry_count = kept.len() as u32;
                self.write_block(start + i, out.as_bytes())?;
            }
        }
        Ok(())
    }
}
