// SPDX-License-Identifier: MIT
//! Inode checks
//!
//! An inode is validated field by field, then its data addresses and the
//! five node slots are walked in file order. Most findings are repaired in
//! the in-memory copy; the inode is written back once at the end.

use alloc::{boxed::Box, vec::Vec};

use f2io::prelude::*;
use zerocopy::IntoBytes;

use crate::core::{errors::*, options::PreenMode};
use crate::f2fs::{
    constant::*,
    crc::inode_chksum,
    session::{CheckSession, ChildInfo, ComprBlkCnt},
    types::*,
};

use super::{
    data::DirCtx,
    node::{in_cluster, pages_spanned},
    subtree_ok,
};

/// Where the walk of an inode goes after the field checks.
enum Body {
    /// Device files and inline inodes own no blocks.
    None,
    Addresses,
}

#[derive(Clone, Copy)]
struct Cluster {
    compressed: bool,
    released: bool,
    size: u64,
}

impl<'a, IO: F2IO + ?Sized> CheckSession<'a, IO> {
    /// Checks inode `nid` and everything it owns.
    ///
    /// `child_d` is the state of the parent directory walk. Returns the
    /// (possibly repaired) inode for quota accounting.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn chk_inode_blk(
        &mut self,
        nid: u32,
        ftype: u8,
        mut node: Box<F2fsNode>,
        blk_cnt: &mut u64,
        cbc: &mut ComprBlkCnt,
        ni: &NodeInfo,
        child_d: &mut ChildInfo,
    ) -> FsckResult<Box<F2fsNode>> {
        let i_links = { node.i.i_links };
        let i_blocks = { node.i.i_blocks };
        let mut need_fix = false;

        let compr_supported = self.meta.has_feature(F2FS_FEATURE_COMPRESSION);
        if { node.i.i_flags } & F2FS_COMPR_FL != 0
            && (!compr_supported || node.i.i_inline & F2FS_INLINE_DATA != 0)
        {
            crate::fsck_bug!(self, true, "INODE.COMPR", "[{nid:#x}] wrong inode flags {:#x}", { node.i.i_flags });
            if self.run.fix_on {
                node.i.i_flags = { node.i.i_flags } & !F2FS_COMPR_FL;
                need_fix = true;
                crate::fsck_fix!(self, "INODE.COMPR", "[{nid:#x}] clear compression flag");
            }
        }
        let compressed = node.is_compressed_reg();
        let compr_rel = node.i.i_inline & F2FS_COMPRESS_RELEASED != 0;
        let cluster = 1u64 << node.i_log_cluster_size().min(MAX_COMPRESS_LOG_SIZE);

        let mut child = ChildInfo {
            links: 2,
            p_ino: nid,
            pp_ino: { node.i.i_pino },
            dir_level: node.i.i_dir_level,
            depth: child_d.depth + 1,
            ..ChildInfo::default()
        };

        if !self.test_main_bitmap(ni.blk_addr) {
            self.fsck.chk.valid_inode_cnt += 1;
        }

        let mut body = Body::Addresses;
        let mut skip_blkcnt = false;

        if ftype == F2FS_FT_DIR {
            self.set_main_bitmap(ni.blk_addr, CURSEG_HOT_NODE as u8);
        } else if !self.test_main_bitmap(ni.blk_addr) {
            self.set_main_bitmap(ni.blk_addr, CURSEG_WARM_NODE as u8);
            let linked_type = matches!(
                ftype,
                F2FS_FT_REG_FILE
                    | F2FS_FT_SYMLINK
                    | F2FS_FT_CHRDEV
                    | F2FS_FT_BLKDEV
                    | F2FS_FT_FIFO
                    | F2FS_FT_SOCK
            );
            if crate::fsck_bug!(self, i_links == 0 && linked_type, "INODE.LINKS", "[{nid:#x}] i_links is zero") {
                if self.run.fix_on {
                    node.i.i_links = 1;
                    need_fix = true;
                    crate::fsck_fix!(self, "INODE.LINKS", "File: {nid:#x} i_links = 0 -> 1");
                }
            }
            if i_links > 1 && ftype != F2FS_FT_ORPHAN && !self.is_quota_ino(nid) {
                self.add_hard_link(nid, i_links);
                self.fsck.chk.multi_hard_link_files += 1;
            }
        } else {
            log::debug!("[{nid:#x}] has hard links [{i_links:#x}]");
            if !self.find_and_dec_hard_link(nid) {
                crate::fsck_bug!(self, true, "INODE.LINKS", "[{nid:#x}] needs more i_links={i_links:#x}");
                if self.run.fix_on {
                    node.i.i_links = i_links + 1;
                    need_fix = true;
                    crate::fsck_fix!(self, "INODE.LINKS", "File: {nid:#x} i_links = {i_links:#x} -> {:#x}", i_links + 1);
                }
                skip_blkcnt = true;
            } else {
                // already walked through another name
                return Ok(node);
            }
        }

        if !skip_blkcnt {
            let x_nid = { node.i.i_xattr_nid };
            let r = self.chk_xattr_blk(nid, x_nid, blk_cnt);
            if !subtree_ok(r)? && self.run.fix_on {
                node.i.i_xattr_nid = 0;
                need_fix = true;
                crate::fsck_fix!(self, "INODE.XATTR", "Remove xattr block: {nid:#x}, x_nid = {x_nid:#x}");
            }

            if matches!(ftype, F2FS_FT_CHRDEV | F2FS_FT_BLKDEV | F2FS_FT_FIFO | F2FS_FT_SOCK) {
                body = Body::None;
            } else {
                child.ei = node.i.i_ext;
                child.last_blk = 0;
                need_fix |= self.chk_inode_fields(nid, ftype, &mut node)?;
                if node.i.i_inline & (F2FS_INLINE_DATA | F2FS_INLINE_DENTRY) != 0 {
                    need_fix |= self.chk_inline_inode(nid, &mut node, blk_cnt, &mut child)?;
                    child.inline_inode = true;
                    body = Body::None;
                }
            }

            if let Body::Addresses = body {
                let cl = Cluster {
                    compressed,
                    released: compr_rel,
                    size: cluster,
                };
                need_fix |= self.chk_inode_addrs(nid, ftype, &mut node, blk_cnt, cbc, ni, &mut child, cl)?;
            }

            child.check_extent(0, true);
            if child.unmatched_extent {
                let ext = child.ei;
                crate::fsck_bug!(
                    self,
                    true,
                    "INODE.EXTENT",
                    "ino: {nid:#x} has wrong ext: [pgofs:{}, blk:{:#x}, len:{}]",
                    { ext.fofs },
                    { ext.blk_addr },
                    { ext.len }
                );
                if self.run.fix_on {
                    need_fix = true;
                }
            }

            if crate::fsck_bug!(
                self,
                i_blocks != *blk_cnt,
                "INODE.BLOCKS",
                "ino: {nid:#x} has i_blocks: {i_blocks:#010x}, but has {} blocks",
                *blk_cnt
            ) && self.run.fix_on
            {
                node.i.i_blocks = *blk_cnt;
                need_fix = true;
                crate::fsck_fix!(self, "INODE.BLOCKS", "[{nid:#x}] i_blocks={i_blocks:#010x} -> {:#x}", *blk_cnt);
            }

            let compr_blocks = node.i_compr_blocks();
            if compressed && compr_blocks != cbc.cnt && self.run.fix_on {
                node.set_i_compr_blocks(cbc.cnt);
                need_fix = true;
                crate::fsck_fix!(self, "INODE.COMPR", "[{nid:#x}] i_compr_blocks={compr_blocks:#x} -> {:#x}", cbc.cnt);
            }
        }

        need_fix |= self.chk_inode_tail(nid, ftype, &mut node, &child, child_d, i_links, i_blocks);

        if need_fix && self.writable() {
            node.i.i_ext.len = 0;
        }

        if self.meta.has_feature(F2FS_FEATURE_INODE_CHKSUM) && node.has_extra_attr() {
            let provided = node.i_inode_checksum();
            let calculated = inode_chksum(self.meta.chksum_seed, node.as_bytes());
            if crate::fsck_bug!(
                self,
                provided != calculated,
                "INODE.CHKSUM",
                "ino: {nid:#x} chksum:{provided:#x}, but calculated one is: {calculated:#x}"
            ) && self.run.fix_on
            {
                node.set_i_inode_checksum(calculated);
                need_fix = true;
                crate::fsck_fix!(self, "INODE.CHKSUM", "ino: {nid:#x} recover, i_inode_checksum= {provided:#x} -> {calculated:#x}");
            }
        }

        if need_fix && self.writable() {
            let mut at = ni.blk_addr;
            self.rewrite_node(&mut node, &mut at)?;
        }
        Ok(node)
    }

    /// Extra attribute, casefold and xattr area checks.
    fn chk_inode_fields(&mut self, nid: u32, ftype: u8, node: &mut F2fsNode) -> FsckResult<bool> {
        let mut need_fix = false;

        if node.has_extra_attr() {
            if self.meta.has_feature(F2FS_FEATURE_EXTRA_ATTR) {
                let isize = node.i_extra_isize();
                if crate::fsck_bug!(
                    self,
                    isize as usize > 4 * DEF_ADDRS_PER_INODE,
                    "INODE.EXTRA",
                    "[{nid:#x}] wrong i_extra_isize={isize:#x}"
                ) && self.run.fix_on
                {
                    node.set_i_extra_isize(F2FS_TOTAL_EXTRA_ATTR_SIZE as u16);
                    need_fix = true;
                    crate::fsck_fix!(
                        self,
                        "INODE.EXTRA",
                        "ino[{nid:#x}] recover i_extra_isize from {isize} to {F2FS_TOTAL_EXTRA_ATTR_SIZE}"
                    );
                }
            } else {
                crate::fsck_bug!(self, true, "INODE.EXTRA", "[{nid:#x}] wrong extra_attr flag");
                if self.run.fix_on {
                    node.i.i_inline &= !F2FS_EXTRA_ATTR;
                    need_fix = true;
                    crate::fsck_fix!(self, "INODE.EXTRA", "ino[{nid:#x}] remove F2FS_EXTRA_ATTR flag");
                }
            }

            if self.meta.flexible_inline_xattr() && node.i.i_inline & F2FS_INLINE_XATTR != 0 {
                let size = node.i_inline_xattr_size() as usize;
                if crate::fsck_bug!(
                    self,
                    size == 0 || size > MAX_INLINE_XATTR_ADDRS,
                    "INODE.XATTR",
                    "[{nid:#x}] wrong inline_xattr_size:{size}"
                ) && self.run.fix_on
                {
                    node.set_i_inline_xattr_size(DEFAULT_INLINE_XATTR_ADDRS as u16);
                    need_fix = true;
                    crate::fsck_fix!(
                        self,
                        "INODE.XATTR",
                        "ino[{nid:#x}] recover inline xattr size from {size} to {DEFAULT_INLINE_XATTR_ADDRS}"
                    );
                }
            }
        }

        let casefold = { node.i.i_flags } & F2FS_CASEFOLD_FL != 0;
        if crate::fsck_bug!(
            self,
            casefold && (ftype != F2FS_FT_DIR || !self.meta.has_feature(F2FS_FEATURE_CASEFOLD)),
            "INODE.CASEFOLD",
            "[{nid:#x}] unexpected casefold flag"
        ) && self.run.fix_on
        {
            node.i.i_flags = { node.i.i_flags } & !F2FS_CASEFOLD_FL;
            need_fix = true;
            crate::fsck_fix!(self, "INODE.CASEFOLD", "ino[{nid:#x}] clear casefold flag");
        }

        need_fix |= self.chk_extended_attributes(nid, node)?;
        Ok(need_fix)
    }

    /// Walks the inline and node xattr space as one list.
    fn chk_extended_attributes(&mut self, nid: u32, node: &mut F2fsNode) -> FsckResult<bool> {
        let flex = self.meta.flexible_inline_xattr();
        let inline_len = if node.i.i_inline & F2FS_INLINE_XATTR != 0 {
            node.inline_xattr_addrs(flex) * 4
        } else {
            0
        };
        let x_nid = { node.i.i_xattr_nid };
        let mut xnode = None;
        if x_nid != 0 {
            let ni = self.get_node_info(x_nid)?;
            if self.meta.is_valid_blkaddr(ni.blk_addr) {
                xnode = Some((self.read_node(ni.blk_addr)?, ni.blk_addr));
            }
        }
        let block_len = if xnode.is_some() { VALID_XATTR_BLOCK_SIZE } else { 0 };
        if inline_len + block_len == 0 {
            return Ok(false);
        }

        let inline_ofs = node.inline_xattr_offset(flex);
        let mut area: Vec<u8> = Vec::with_capacity(inline_len + block_len);
        area.extend_from_slice(&node.as_bytes()[inline_ofs..inline_ofs + inline_len]);
        if let Some((x, _)) = &xnode {
            area.extend_from_slice(&x.as_bytes()[..VALID_XATTR_BLOCK_SIZE]);
        }

        let scan = scan_xattrs(&area);
        if scan.is_clean() {
            return Ok(false);
        }
        let end = scan.end();
        match scan {
            XattrScan::Overflow { .. } => {
                crate::fsck_bug!(self, true, "INODE.XATTR", "[{nid:#x}] last xattr entry (offset: {end:#x}) crosses the boundary")
            }
            _ => crate::fsck_bug!(self, true, "INODE.XATTR", "[{nid:#x}] nonzero bytes after the xattr list end ({end:#x})"),
        };
        if !self.run.fix_on {
            return Ok(false);
        }

        area[end..].fill(0);
        node.as_mut_bytes()[inline_ofs..inline_ofs + inline_len].copy_from_slice(&area[..inline_len]);
        if let Some((mut x, mut at)) = xnode {
            x.as_mut_bytes()[..VALID_XATTR_BLOCK_SIZE].copy_from_slice(&area[inline_len..]);
            if self.writable() {
                self.rewrite_node(&mut x, &mut at)?;
            }
        }
        crate::fsck_fix!(self, "INODE.XATTR", "[{nid:#x}] nullify wrong xattr entries");
        Ok(true)
    }

    /// Inline data and inline dentry inodes.
    fn chk_inline_inode(&mut self, nid: u32, node: &mut F2fsNode, blk_cnt: &mut u64, child: &mut ChildInfo) -> FsckResult<bool> {
        let flex = self.meta.flexible_inline_xattr();
        let ofs = node.extra_isize();
        let mut need_fix = false;

        let reserved = node.i_addr(ofs);
        if crate::fsck_bug!(
            self,
            reserved != NULL_ADDR,
            "INODE.INLINE",
            "[{nid:#x}] wrong inline reserve blkaddr:{reserved:#x}"
        ) && self.run.fix_on
        {
            node.set_i_addr(ofs, NULL_ADDR);
            node.i.i_blocks = *blk_cnt;
            need_fix = true;
            crate::fsck_fix!(self, "INODE.INLINE", "inline has wrong 0'th block = {reserved:#x}");
        }

        if node.i.i_inline & F2FS_INLINE_DATA != 0 {
            let max = node.max_inline_data(flex) as u64;
            let i_size = { node.i.i_size };
            if crate::fsck_bug!(
                self,
                i_size > max,
                "INODE.INLINE",
                "[{nid:#x}] wrong inline size:{i_size}"
            ) && self.run.fix_on
            {
                node.i.i_size = max;
                need_fix = true;
                crate::fsck_fix!(self, "INODE.INLINE", "inline_data has wrong i_size {i_size}");
            }
            let junk = node.i.i_inline & F2FS_DATA_EXIST == 0 && node.inline_data(flex).iter().any(|&b| b != 0);
            if crate::fsck_bug!(self, junk, "INODE.INLINE", "[{nid:#x}] junk inline data") && self.run.fix_on {
                node.i.i_inline |= F2FS_DATA_EXIST;
                need_fix = true;
                crate::fsck_fix!(self, "INODE.INLINE", "inline_data has DATA_EXIST");
            }
            log::debug!("ino[{nid:#x}] has inline data");
            return Ok(need_fix);
        }

        log::debug!("ino[{nid:#x}] has inline dentry");
        if self.chk_inline_dentries(node, child)? < 0 && self.run.fix_on {
            need_fix = true;
        }
        Ok(need_fix)
    }

    /// Data addresses held by the inode and its five node slots.
    #[allow(clippy::too_many_arguments)]
    fn chk_inode_addrs(
        &mut self,
        nid: u32,
        ftype: u8,
        node: &mut Box<F2fsNode>,
        blk_cnt: &mut u64,
        cbc: &mut ComprBlkCnt,
        ni: &NodeInfo,
        child: &mut ChildInfo,
        cl: Cluster,
    ) -> FsckResult<bool> {
        let Cluster {
            compressed,
            released: compr_rel,
            size: cluster,
        } = cl;
        let flex = self.meta.flexible_inline_xattr();
        let ofs = node.extra_isize();
        let dir = DirCtx::of_inode(node);
        let mut need_fix = false;

        for idx in 0..node.addrs_per_inode(flex) {
            let blkaddr = node.i_addr(ofs + idx);
            child.check_extent(blkaddr, false);

            if blkaddr == COMPRESS_ADDR {
                if !compressed || child.pgofs & (cluster - 1) != 0 {
                    if self.run.fix_on {
                        node.set_i_addr(ofs + idx, NULL_ADDR);
                        need_fix = true;
                        crate::fsck_fix!(self, "INODE.ADDR", "[{nid:#x}] i_addr[{}] = 0", ofs + idx);
                    }
                } else if !compr_rel {
                    self.fsck.chk.valid_blk_cnt += 1;
                    *blk_cnt += 1;
                    cbc.cheader_pgofs = Some(child.pgofs);
                    cbc.cnt += 1;
                }
            } else if blkaddr != NULL_ADDR {
                if !compr_rel && blkaddr == NEW_ADDR && in_cluster(cbc, child.pgofs, cluster) {
                    cbc.cnt += 1;
                }
                let r = self.chk_data_blk(dir, blkaddr, child, ftype, nid, idx as u16, ni.version, node);
                if blkaddr != node.i_addr(ofs + idx) {
                    need_fix = true;
                }
                if subtree_ok(r)? {
                    *blk_cnt += 1;
                } else if self.run.fix_on {
                    node.set_i_addr(ofs + idx, NULL_ADDR);
                    need_fix = true;
                    crate::fsck_fix!(self, "INODE.ADDR", "[{nid:#x}] i_addr[{}] = 0", ofs + idx);
                }
            }
            child.pgofs += 1;
        }

        let apb = node.addrs_per_block();
        for slot in 0..NIDS_PER_INODE {
            let kind = NodeKind::of_inode_slot(slot);
            let i_nid = node.i_nid(slot);
            if i_nid != 0 {
                let r = self.chk_node_blk(Some(&**node), i_nid, ftype, kind, blk_cnt, cbc, child);
                if subtree_ok(r)? {
                    *blk_cnt += 1;
                    continue;
                }
                if self.run.fix_on {
                    node.set_i_nid(slot, 0);
                    need_fix = true;
                    crate::fsck_fix!(self, "INODE.NID", "[{nid:#x}] i_nid[{slot}] = 0");
                }
            }
            child.pgofs += pages_spanned(kind, apb);
        }
        Ok(need_fix)
    }

    /// Checks run on every inode reached, including the second visit of a
    /// hard link.
    #[allow(clippy::too_many_arguments)]
    fn chk_inode_tail(
        &mut self,
        nid: u32,
        ftype: u8,
        node: &mut F2fsNode,
        child: &ChildInfo,
        child_d: &ChildInfo,
        i_links: u32,
        i_blocks: u64,
    ) -> bool {
        let mut need_fix = false;

        let namelen = { node.i.i_namelen };
        if namelen as usize > F2FS_NAME_LEN && child_d.i_namelen as usize <= F2FS_NAME_LEN {
            crate::fsck_bug!(
                self,
                true,
                "INODE.NAMELEN",
                "ino: {nid:#x} has i_namelen: {namelen:#x}, but has {} characters for name",
                child_d.i_namelen
            );
            if self.run.fix_on {
                node.i.i_namelen = child_d.i_namelen;
                need_fix = true;
                crate::fsck_fix!(self, "INODE.NAMELEN", "[{nid:#x}] i_namelen={namelen:#x} -> {:#x}", child_d.i_namelen);
            }
        }

        if ftype == F2FS_FT_DIR {
            log::debug!(
                "directory inode {nid:#x} depth {} has {} files",
                child_d.depth,
                child.files
            );
            if crate::fsck_bug!(
                self,
                i_links != child.links,
                "DIR.LINKS",
                "ino: {nid:#x} i_links: {i_links}, real links: {}",
                child.links
            ) && self.run.fix_on
            {
                node.i.i_links = child.links;
                need_fix = true;
                crate::fsck_fix!(self, "DIR.LINKS", "Dir: {nid:#x} i_links= {i_links:#x} -> {:#x}", child.links);
            }
            let dots = child.dots.count_ones();
            if crate::fsck_bug!(
                self,
                dots < 2 && node.i.i_inline & F2FS_INLINE_DOTS == 0,
                "DIR.DOTS",
                "ino: {nid:#x} dots: {dots}"
            ) && self.run.fix_on
            {
                node.i.i_inline |= F2FS_INLINE_DOTS;
                need_fix = true;
                crate::fsck_fix!(self, "DIR.DOTS", "Dir: {nid:#x} set inline_dots");
            }
        }

        let gc_failures = node.i_gc_failures();
        let keep = self.opts.preen == PreenMode::Full && gc_failures == 1;
        if ftype == F2FS_FT_REG_FILE && gc_failures != 0 && !keep && self.run.fix_on {
            node.set_i_gc_failures(0);
            need_fix = true;
            crate::fsck_fix!(self, "INODE.GC", "Regular: {nid:#x} reset i_gc_failures from {gc_failures:#x} to 0x00");
        }

        let i_size = { node.i.i_size };
        let expect = if { node.i.i_xattr_nid } != 0 { 3 } else { 2 };
        if ftype == F2FS_FT_SYMLINK && i_size == 0 && i_blocks == expect {
            node.i.i_size = F2FS_BLKSIZE as u64;
            need_fix = true;
            crate::fsck_fix!(self, "INODE.SIZE", "Symlink: recover {nid:#x} with i_size={F2FS_BLKSIZE}");
        }

        if crate::fsck_bug!(
            self,
            ftype == F2FS_FT_ORPHAN && i_links != 0,
            "INODE.ORPHAN",
            "ino: {nid:#x} is orphan inode, but has i_links: {i_links}"
        ) && self.run.fix_on
        {
            node.i.i_links = 0;
            need_fix = true;
            crate::fsck_fix!(self, "INODE.ORPHAN", "ino: {nid:#x} orphan_inode, i_links= {i_links:#x} -> 0");
        }
        need_fix
    }
}
