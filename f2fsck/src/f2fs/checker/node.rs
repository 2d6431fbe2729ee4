// SPDX-License-Identifier: MIT
//! Node tree walk
//!
//! Every node is reached through its nid: the NAT must resolve it, the
//! block must name it in its footer, and its SSA entry must point back at
//! it. Once a node passes those checks it is marked in the main bitmap and
//! dispatched on its kind.

use alloc::boxed::Box;

use f2io::prelude::*;

use crate::core::{bitmap::MsbBitmapOps, errors::*};
use crate::f2fs::{
    constant::*,
    meta::is_valid_data_blkaddr,
    session::{CheckSession, ChildInfo, ComprBlkCnt},
    types::*,
};

use super::{data::DirCtx, subtree_ok};

/// Pages covered by a node of `kind` whose direct nodes hold `apb` addresses.
pub(crate) fn pages_spanned(kind: NodeKind, apb: usize) -> u64 {
    let apb = apb as u64;
    let nids = NIDS_PER_BLOCK as u64;
    match kind {
        NodeKind::Direct => apb,
        NodeKind::Indirect => apb * nids,
        NodeKind::DoubleIndirect => apb * nids * nids,
        NodeKind::Inode | NodeKind::Xattr => 0,
    }
}

impl<'a, IO: F2IO + ?Sized> CheckSession<'a, IO> {
    /// Resolves `nid` and checks the NAT entry alone.
    pub(crate) fn sanity_check_nat(&mut self, nid: u32) -> FsckResult<NodeInfo> {
        if crate::fsck_bug!(self, !self.meta.is_valid_nid(nid), "NAT.NID", "nid is not valid. [{nid:#x}]") {
            return Err(FsckError::structural("nid out of range").nid(nid));
        }
        let ni = self.get_node_info(nid)?;
        if crate::fsck_bug!(self, ni.ino == 0, "NAT.INO", "nid[{nid:#x}] ino is 0") {
            return Err(FsckError::structural("nat entry without owner").nid(nid));
        }
        let blk = ni.blk_addr;
        let bad = !is_valid_data_blkaddr(blk) || !self.meta.is_valid_blkaddr(blk);
        if crate::fsck_bug!(self, bad, "NAT.ADDR", "blkaddress is not valid. [{blk:#x}] nid[{nid:#x}]") {
            return Err(FsckError::device_pointer("nat address outside the main area")
                .nid(nid)
                .blk(blk));
        }
        Ok(ni)
    }

    /// Checks that `nid` is a node of kind `ntype` reachable as `ftype`,
    /// then accounts it. Returns the block and its NAT entry.
    pub(crate) fn sanity_check_nid(
        &mut self,
        nid: u32,
        ftype: u8,
        ntype: NodeKind,
    ) -> FsckResult<(Box<F2fsNode>, NodeInfo)> {
        let ni = self.sanity_check_nat(nid)?;
        let node = self.read_node(ni.blk_addr)?;
        let (f_nid, f_ino) = (node.nid(), node.ino());

        if crate::fsck_bug!(
            self,
            ntype == NodeKind::Inode && f_nid != f_ino,
            "NODE.FOOTER",
            "nid[{nid:#x}] footer.nid[{f_nid:#x}] footer.ino[{f_ino:#x}]"
        ) {
            return Err(FsckError::structural("inode footer nid != ino").nid(nid));
        }
        if crate::fsck_bug!(
            self,
            ni.ino != f_ino,
            "NODE.FOOTER",
            "nid[{nid:#x}] nat_entry->ino[{:#x}] footer.ino[{f_ino:#x}]",
            ni.ino
        ) {
            return Err(FsckError::cross_ref("nat owner != footer ino").nid(nid));
        }
        if crate::fsck_bug!(
            self,
            ntype != NodeKind::Inode && node.is_inode(),
            "NODE.FOOTER",
            "nid[{nid:#x}] footer.nid[{f_nid:#x}] footer.ino[{f_ino:#x}]"
        ) {
            return Err(FsckError::structural("inode found where a node was expected").nid(nid));
        }
        if crate::fsck_bug!(
            self,
            f_nid != nid,
            "NODE.FOOTER",
            "nid[{nid:#x}] blk_addr[{:#x}] footer.nid[{f_nid:#x}]",
            ni.blk_addr
        ) {
            return Err(FsckError::cross_ref("footer nid != nid").nid(nid));
        }
        if ntype == NodeKind::Xattr {
            let ofs = node.ofs_of_node();
            if crate::fsck_bug!(
                self,
                ofs != XATTR_NODE_OFFSET,
                "NODE.XATTR",
                "xnid[{nid:#x}] has wrong ofs:[{ofs:#x}]"
            ) {
                return Err(FsckError::structural("xattr node offset").nid(nid));
            }
        }

        let once_only = (ntype == NodeKind::Inode && ftype == F2FS_FT_DIR)
            || (ntype == NodeKind::Xattr && ftype == F2FS_FT_XATTR);
        if crate::fsck_bug!(
            self,
            once_only && self.test_main_bitmap(ni.blk_addr),
            "NODE.DUP",
            "Duplicated node blk. nid[{nid:#x}][{:#x}]",
            ni.blk_addr
        ) {
            return Err(FsckError::cross_ref("node reached twice").nid(nid).blk(ni.blk_addr));
        }

        if ftype == F2FS_FT_MAX {
            return Ok((node, ni));
        }

        if ntype == NodeKind::Inode && ftype < F2FS_FT_MAX {
            let mode = { node.i.i_mode };
            let ft = file_type_of_mode(mode);
            if crate::fsck_bug!(
                self,
                ft == F2FS_FT_UNKNOWN,
                "INODE.MODE",
                "nid[{nid:#x}] has unknown file type, ftype[{ftype:#x}]"
            ) {
                return Err(FsckError::structural("unknown inode mode").nid(nid));
            }
            if crate::fsck_bug!(
                self,
                ft != ftype,
                "INODE.MODE",
                "nid[{nid:#x}] has mismatched file type, ftype[{ftype:#x}] i_mode[{mode:#o}]"
            ) {
                return Err(FsckError::cross_ref("dentry type != inode mode").nid(nid));
            }
        }

        if ftype != F2FS_FT_ORPHAN || self.test_nat_bitmap(nid) {
            self.clear_nat_bitmap(nid);
            // keep the nid away from lost+found allocation
            self.nm.nid_bitmap.set_msb(nid as usize);
        } else {
            crate::fsck_bug!(self, true, "NODE.ORPHAN", "orphan or xattr nid is duplicate [{nid:#x}]");
        }

        if let Err(e) = self.is_valid_ssa_node_blk(nid, ni.blk_addr) {
            if e.is_fatal() {
                return Err(e);
            }
            crate::fsck_bug!(self, true, "SSA.NODE", "summary node block is not valid. [{nid:#x}]");
            return Err(e);
        }

        crate::fsck_bug!(
            self,
            !self.test_sit_bitmap(ni.blk_addr),
            "SIT.BIT",
            "SIT bitmap is 0x0. blk_addr[{:#x}]",
            ni.blk_addr
        );

        if !self.test_main_bitmap(ni.blk_addr) {
            self.fsck.chk.valid_blk_cnt += 1;
            self.fsck.chk.valid_node_cnt += 1;
            self.fsck.chk.checked_node_cnt += 1;
        }
        Ok((node, ni))
    }

    /// The SSA entry of node block `blk` must name `nid`.
    pub(crate) fn is_valid_ssa_node_blk(&mut self, nid: u32, blk: u32) -> FsckResult {
        if self.meta.readonly() {
            return Ok(());
        }
        let segno = self.meta.segno(blk);
        let off = self.meta.blkoff(blk) as usize;
        let (_, sum) = self.get_sum_block(segno)?;
        let mut need_fix = false;

        if !sum.is_node() {
            if !self.run.fix_on {
                log::warn!("summary block of segment {segno:#x} should be node");
                return Err(FsckError::cross_ref("summary footer is not node").blk(blk));
            }
            if !is_node_seg(self.seg_entry(segno).seg_type) {
                log::warn!("segment {segno:#x} holding node {nid:#x} is not a node segment");
                return Err(FsckError::cross_ref("node in a data segment").blk(blk));
            }
            crate::fsck_fix!(self, "SSA.FOOTER", "Summary footer indicates a node segment: {segno:#x}");
            need_fix = true;
        }

        let mut entry = sum.entries[off];
        let owner = { entry.nid };
        if owner != nid {
            if !self.run.fix_on {
                log::warn!("nid [{nid:#x}] summary nid [{owner:#x}]");
                return Err(FsckError::cross_ref("summary nid mismatch").nid(nid).blk(blk));
            }
            crate::fsck_fix!(self, "SSA.NODE", "Set node summary {blk:#x} -> [{nid:#x}] [{owner:#x}]");
            entry.nid = nid;
            need_fix = true;
        }
        if need_fix && self.writable() {
            self.update_sum_entry(blk, &entry)?;
        }
        Ok(())
    }

    /// Checks the xattr node of inode `ino`.
    pub(crate) fn chk_xattr_blk(&mut self, ino: u32, x_nid: u32, blk_cnt: &mut u64) -> FsckResult {
        if x_nid == 0 {
            return Ok(());
        }
        let (_, ni) = self.sanity_check_nid(x_nid, F2FS_FT_XATTR, NodeKind::Xattr)?;
        *blk_cnt += 1;
        self.set_main_bitmap(ni.blk_addr, CURSEG_COLD_NODE as u8);
        log::debug!("ino[{ino:#x}] x_nid[{x_nid:#x}]");
        Ok(())
    }

    /// Validates the subtree rooted at `nid`.
    ///
    /// Reads the owning inode itself when `ntype` is not an inode. This is
    /// the entry point for tools outside the walk; the walk keeps the
    /// owning inode at hand and goes through `chk_node_blk`.
    pub fn validate_node(
        &mut self,
        nid: u32,
        ftype: u8,
        ntype: NodeKind,
        blk_cnt: &mut u64,
        cbc: &mut ComprBlkCnt,
        child: &mut ChildInfo,
    ) -> FsckResult {
        if ntype == NodeKind::Inode || ntype == NodeKind::Xattr {
            return self.chk_node_blk(None, nid, ftype, ntype, blk_cnt, cbc, child);
        }
        let ni = self.sanity_check_nat(nid)?;
        let owner = self.sanity_check_nat(ni.ino)?;
        let inode = self.read_node(owner.blk_addr)?;
        if !inode.is_inode() {
            return Err(FsckError::structural("owner is not an inode").nid(ni.ino));
        }
        self.chk_node_blk(Some(&inode), nid, ftype, ntype, blk_cnt, cbc, child)
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn chk_node_blk(
        &mut self,
        inode: Option<&F2fsNode>,
        nid: u32,
        ftype: u8,
        ntype: NodeKind,
        blk_cnt: &mut u64,
        cbc: &mut ComprBlkCnt,
        child: &mut ChildInfo,
    ) -> FsckResult {
        if ntype == NodeKind::Xattr {
            return self.chk_xattr_blk(nid, nid, blk_cnt);
        }
        let (node, ni) = self.sanity_check_nid(nid, ftype, ntype)?;

        if ntype == NodeKind::Inode {
            let first = !self.test_main_bitmap(ni.blk_addr);
            let node = self.chk_inode_blk(nid, ftype, node, blk_cnt, cbc, &ni, child)?;
            if first {
                self.quota_add_inode_usage(nid, &node);
            }
            return Ok(());
        }

        let Some(inode) = inode else {
            return Err(FsckError::structural("index node without owner").nid(nid));
        };
        match ntype {
            NodeKind::Direct => {
                self.set_main_bitmap(ni.blk_addr, CURSEG_WARM_NODE as u8);
                self.chk_dnode_blk(inode, nid, ftype, node, blk_cnt, cbc, child, &ni)
            }
            NodeKind::Indirect | NodeKind::DoubleIndirect => {
                self.set_main_bitmap(ni.blk_addr, CURSEG_COLD_NODE as u8);
                self.chk_indirect_blk(inode, ftype, ntype, node, blk_cnt, cbc, child)
            }
            NodeKind::Inode | NodeKind::Xattr => Ok(()),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn chk_dnode_blk(
        &mut self,
        inode: &F2fsNode,
        nid: u32,
        ftype: u8,
        mut node: Box<F2fsNode>,
        blk_cnt: &mut u64,
        cbc: &mut ComprBlkCnt,
        child: &mut ChildInfo,
        ni: &NodeInfo,
    ) -> FsckResult {
        child.p_ino = node.ino();
        child.pp_ino = { inode.i.i_pino };
        let compressed = { inode.i.i_flags } & F2FS_COMPR_FL != 0;
        let compr_rel = inode.i.i_inline & F2FS_COMPRESS_RELEASED != 0;
        let cluster = 1u64 << inode.i_log_cluster_size().min(MAX_COMPRESS_LOG_SIZE);
        let dir = DirCtx::of_inode(inode);
        let mut need_fix = false;

        for idx in 0..inode.addrs_per_block() {
            let blkaddr = node.dn_entry(idx);
            child.check_extent(blkaddr, false);

            if blkaddr != NULL_ADDR {
                if blkaddr == COMPRESS_ADDR {
                    if !compressed || child.pgofs & (cluster - 1) != 0 {
                        if self.run.fix_on {
                            node.set_dn_entry(idx, NULL_ADDR);
                            need_fix = true;
                            crate::fsck_fix!(self, "DNODE.ADDR", "[{nid:#x}] dn.addr[{idx}] = 0");
                        }
                    } else if !compr_rel {
                        self.fsck.chk.valid_blk_cnt += 1;
                        *blk_cnt += 1;
                        cbc.cheader_pgofs = Some(child.pgofs);
                        cbc.cnt += 1;
                    }
                } else {
                    if !compr_rel && blkaddr == NEW_ADDR && in_cluster(cbc, child.pgofs, cluster) {
                        cbc.cnt += 1;
                    }
                    let r = self.chk_data_blk(dir, blkaddr, child, ftype, nid, idx as u16, ni.version, &mut node);
                    if blkaddr != node.dn_entry(idx) {
                        need_fix = true;
                    }
                    if subtree_ok(r)? {
                        *blk_cnt += 1;
                    } else if self.run.fix_on {
                        node.set_dn_entry(idx, NULL_ADDR);
                        need_fix = true;
                        crate::fsck_fix!(self, "DNODE.ADDR", "[{nid:#x}] dn.addr[{idx}] = 0");
                    }
                }
            }
            child.pgofs += 1;
        }

        if need_fix && self.writable() {
            let mut at = ni.blk_addr;
            self.rewrite_node(&mut node, &mut at)?;
        }
        Ok(())
    }

    /// Indirect and double indirect nodes: each slot is a nid one level
    /// down.
    #[allow(clippy::too_many_arguments)]
    fn chk_indirect_blk(
        &mut self,
        inode: &F2fsNode,
        ftype: u8,
        ntype: NodeKind,
        mut node: Box<F2fsNode>,
        blk_cnt: &mut u64,
        cbc: &mut ComprBlkCnt,
        child: &mut ChildInfo,
    ) -> FsckResult {
        let down = if ntype == NodeKind::DoubleIndirect {
            NodeKind::Indirect
        } else {
            NodeKind::Direct
        };
        let span = pages_spanned(down, inode.addrs_per_block());
        let mut need_fix = false;

        for i in 0..NIDS_PER_BLOCK {
            let cnid = node.dn_entry(i);
            if cnid == 0 {
                child.pgofs += span;
                continue;
            }
            let r = self.chk_node_blk(Some(inode), cnid, ftype, down, blk_cnt, cbc, child);
            if subtree_ok(r)? {
                *blk_cnt += 1;
                continue;
            }
            if self.run.fix_on {
                node.set_dn_entry(i, 0);
                need_fix = true;
                let what = if ntype == NodeKind::DoubleIndirect { "double indirect" } else { "indirect" };
                crate::fsck_fix!(self, "INODE.NID", "Set {what} node {i:#x} -> 0");
            } else {
                log::info!("should delete in.nid[{i}] = 0");
            }
            child.pgofs += span;
        }

        if need_fix && self.writable() {
            let nid = node.nid();
            let ni = self.get_node_info(nid)?;
            let mut at = ni.blk_addr;
            self.rewrite_node(&mut node, &mut at)?;
        }
        Ok(())
    }
}

/// True while `pgofs` lies in the cluster opened by the last compress header.
#[inline]
pub(crate) fn in_cluster(cbc: &ComprBlkCnt, pgofs: u64, cluster: u64) -> bool {
    cbc.cheader_pgofs
        .is_some_and(|h| pgofs >= h && pgofs - h < cluster)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spans() {
        assert_eq!(pages_spanned(NodeKind::Direct, 1018), 1018);
        assert_eq!(pages_spanned(NodeKind::Indirect, 1018), 1018 * 1018);
        assert_eq!(pages_spanned(NodeKind::DoubleIndirect, 4), 4 * 1018 * 1018);
        assert_eq!(pages_spanned(NodeKind::Inode, 1018), 0);
    }

    #[test]
    fn cluster_window() {
        let mut cbc = ComprBlkCnt::default();
        assert!(!in_cluster(&cbc, 3, 4));
        cbc.cheader_pgofs = Some(4);
        assert!(in_cluster(&cbc, 7, 4));
        assert!(!in_cluster(&cbc, 8, 4));
        assert!(!in_cluster(&cbc, 3, 4));
    }
}
