// SPDX-License-Identifier: MIT
//! Data blocks

use f2io::prelude::*;

use crate::core::errors::*;
use crate::f2fs::{
    constant::*,
    session::{CheckSession, ChildInfo},
    types::*,
};

/// Name handling of the directory owning a dentry block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirCtx {
    pub casefolded: bool,
    /// Names are encrypted.
    pub enc_name: bool,
}

impl DirCtx {
    pub fn of_inode(inode: &F2fsNode) -> Self {
        Self {
            casefolded: { inode.i.i_flags } & F2FS_CASEFOLD_FL != 0,
            enc_name: inode.i.i_advise & FADVISE_ENCRYPT_BIT != 0,
        }
    }
}

impl<'a, IO: F2IO + ?Sized> CheckSession<'a, IO> {
    /// The SSA entry of data block `blk` must be `(parent_nid, idx, ver)`.
    ///
    /// With repairs on, a wrong entry is rewritten unless another node
    /// really points at the block; then this reference is the stale one.
    pub(crate) fn is_valid_ssa_data_blk(&mut self, blk: u32, parent_nid: u32, idx: u16, ver: u8) -> FsckResult {
        let segno = self.meta.segno(blk);
        let off = self.meta.blkoff(blk) as usize;
        let (_, sum) = self.get_sum_block(segno)?;
        let mut need_fix = false;

        if sum.is_node() {
            if !self.run.fix_on {
                log::warn!("summary block of segment {segno:#x} should be data");
                return Err(FsckError::cross_ref("summary footer is not data").blk(blk));
            }
            if !is_data_seg(self.seg_entry(segno).seg_type) {
                log::warn!("segment {segno:#x} holding data {blk:#x} is not a data segment");
                return Err(FsckError::cross_ref("data in a node segment").blk(blk));
            }
            crate::fsck_fix!(self, "SSA.FOOTER", "Summary footer indicates a data segment: {segno:#x}");
            need_fix = true;
        }

        let mut entry = sum.entries[off];
        let (e_nid, e_ver, e_ofs) = ({ entry.nid }, entry.version, { entry.ofs_in_node });
        if e_nid != parent_nid || e_ver != ver || e_ofs != idx {
            if !self.run.fix_on {
                log::warn!(
                    "summary entry [{e_nid:#x}, {e_ver:#x}, {e_ofs:#x}] != parent [{parent_nid:#x}, {ver:#x}, {idx:#x}] blk {blk:#x}"
                );
                return Err(FsckError::cross_ref("data summary mismatch").nid(parent_nid).blk(blk));
            }
            if self.is_valid_summary(&entry, blk)? {
                log::warn!("block {blk:#x} belongs to nid {e_nid:#x}, not {parent_nid:#x}");
                return Err(FsckError::cross_ref("stale reference to a data block")
                    .nid(parent_nid)
                    .blk(blk));
            }
            crate::fsck_fix!(
                self,
                "SSA.DATA",
                "Set data summary {blk:#x} -> [{parent_nid:#x}] [{ver:#x}] [{idx:#x}]"
            );
            entry = F2fsSummary::new(parent_nid, idx, ver);
            need_fix = true;
        }
        if need_fix && self.writable() {
            self.update_sum_entry(blk, &entry)?;
        }
        Ok(())
    }

    /// True when the owner named by `sum` really points at `blk`.
    pub(crate) fn is_valid_summary(&mut self, sum: &F2fsSummary, blk: u32) -> FsckResult<bool> {
        let nid = { sum.nid };
        if !self.meta.is_valid_nid(nid) {
            return Ok(false);
        }
        let ni = self.get_node_info(nid)?;
        if !self.meta.is_valid_blkaddr(ni.blk_addr) {
            return Ok(false);
        }
        let node = self.read_node(ni.blk_addr)?;
        if node.nid() != nid {
            return Ok(false);
        }
        Ok(node.data_blkaddr({ sum.ofs_in_node } as usize) == Some(blk))
    }

    /// Checks one data address of node `parent_nid` at `idx`. Directory
    /// blocks are walked as dentry blocks; `parent` is the node holding the
    /// address, updated if the dentry block has to move.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn chk_data_blk(
        &mut self,
        dir: DirCtx,
        blk: u32,
        child: &mut ChildInfo,
        ftype: u8,
        parent_nid: u32,
        idx: u16,
        ver: u8,
        parent: &mut F2fsNode,
    ) -> FsckResult {
        if blk == NEW_ADDR {
            self.fsck.chk.valid_blk_cnt += 1;
            return Ok(());
        }
        if crate::fsck_bug!(
            self,
            !self.meta.is_valid_blkaddr(blk),
            "DATA.ADDR",
            "blkaddress is not valid. [{blk:#x}]"
        ) {
            return Err(FsckError::device_pointer("data address outside the main area").blk(blk));
        }
        if let Err(e) = self.is_valid_ssa_data_blk(blk, parent_nid, idx, ver) {
            if e.is_fatal() {
                return Err(e);
            }
            crate::fsck_bug!(self, true, "SSA.DATA", "summary data block is not valid. [{parent_nid:#x}]");
            return Err(e);
        }
        crate::fsck_bug!(
            self,
            !self.test_sit_bitmap(blk),
            "SIT.BIT",
            "SIT bitmap is 0x0. blk_addr[{blk:#x}]"
        );
        crate::fsck_bug!(
            self,
            self.test_main_bitmap(blk),
            "DATA.DUP",
            "Duplicated data [{blk:#x}]. pnid[{parent_nid:#x}] idx[{idx:#x}]"
        );
        self.fsck.chk.valid_blk_cnt += 1;

        if ftype == F2FS_FT_DIR {
            self.set_main_bitmap(blk, CURSEG_HOT_DATA as u8);
            return self.chk_dentry_blk(dir, blk, child, parent);
        }
        self.set_main_bitmap(blk, CURSEG_WARM_DATA as u8);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dir_ctx_flags() {
        let mut n = F2fsNode::default();
        assert_eq!(DirCtx::of_inode(&n), DirCtx::default());
        n.i.i_flags = F2FS_CASEFOLD_FL;
        n.i.i_advise = FADVISE_ENCRYPT_BIT;
        let d = DirCtx::of_inode(&n);
        assert!(d.casefolded && d.enc_name);
    }
}
