// SPDX-License-Identifier: MIT
//! Reconnecting unreachable files under `/lost+found`
//!
//! After the walk, inodes still marked in the NAT bitmap have no dentry.
//! Regular files among them are checked like any other inode and linked
//! into `/lost+found` under their inode number. The directory is created
//! when missing. Files that cannot be linked are released instead.

use alloc::{boxed::Box, format, vec, vec::Vec};

use f2io::prelude::*;
use zerocopy::IntoBytes;

use crate::core::{bitmap::MsbBitmapOps, errors::*};
use crate::f2fs::{
    constant::*,
    hash::dentry_hash,
    session::{CheckSession, ChildInfo, ComprBlkCnt},
    types::*,
};

use super::data::DirCtx;

impl<'a, IO: F2IO + ?Sized> CheckSession<'a, IO> {
    /// Links every intact unreachable non-directory inode into
    /// `/lost+found`. Returns the number of files reconnected.
    pub(crate) fn reconnect_files(&mut self) -> FsckResult<u32> {
        let mut pending: Vec<u32> = Vec::new();

        for nid in self.unreached_nids() {
            if self.is_quota_ino(nid) {
                log::debug!("quota inode [{nid:#x}] is not reconnected");
                continue;
            }
            let ni = self.get_node_info(nid)?;
            if !self.meta.is_valid_blkaddr(ni.blk_addr) {
                continue;
            }
            let node = self.read_node(ni.blk_addr)?;
            // index nodes come back with their inode
            if !node.is_inode() {
                continue;
            }
            let mode = { node.i.i_mode };
            if mode & S_IFMT == S_IFDIR {
                log::debug!("directory inode [{nid:#x}] is not reconnected");
                continue;
            }

            let ftype = file_type_of_mode(mode);
            let (node, ni) = match self.sanity_check_nid(nid, ftype, NodeKind::Inode) {
                Ok(v) => v,
                Err(e) if e.is_fatal() => return Err(e),
                Err(_) => {
                    crate::fsck_bug!(self, true, "LPF.INODE", "Invalid nid [{nid:#x}]");
                    continue;
                }
            };
            log::debug!("check unreachable inode {nid:#x}");
            let mut blk_cnt = 1u64;
            let mut cbc = ComprBlkCnt::default();
            let mut child = ChildInfo::default();
            match self.chk_inode_blk(nid, ftype, node, &mut blk_cnt, &mut cbc, &ni, &mut child) {
                Ok(_) => pending.push(nid),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    log::debug!("unreachable inode {nid:#x} is broken: {e}");
                    self.disconnect_file(nid)?;
                }
            }
        }
        if pending.is_empty() {
            return Ok(0);
        }

        let Some((mut lpf, mut lpf_blk)) = self.get_lpf()? else {
            return Ok(0);
        };

        let mut cnt = 0u32;
        for nid in pending {
            match self.do_reconnect(&mut lpf, &mut lpf_blk, nid) {
                Ok(node) => {
                    self.quota_add_inode_usage(nid, &node);
                    cnt += 1;
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    log::warn!("failed to reconnect inode [{nid:#x}]: {e}");
                    self.disconnect_file(nid)?;
                }
            }
        }
        if cnt > 0 {
            crate::fsck_fix!(self, "LPF.RECONNECT", "Reconnect {cnt} files to lost+found");
        }
        Ok(cnt)
    }

    /// Finds `/lost+found`, creating it when absent. `None` when a
    /// non-directory holds the name.
    fn get_lpf(&mut self) -> FsckResult<Option<(Box<F2fsNode>, u32)>> {
        let root_ino = self.meta.root_ino;
        let ri = self.get_node_info(root_ino)?;
        let root = self.read_node(ri.blk_addr)?;

        let Some(ino) = self.find_in_dir(&root, LPF_NAME)? else {
            log::debug!("lost+found does not exist, creating it");
            return self.create_lpf(root, ri.blk_addr).map(Some);
        };
        let li = self.get_node_info(ino)?;
        if crate::fsck_bug!(
            self,
            !self.meta.is_valid_blkaddr(li.blk_addr),
            "LPF.ADDR",
            "lost+found [{ino:#x}] has no valid block"
        ) {
            return Ok(None);
        }
        let lpf = self.read_node(li.blk_addr)?;
        let mode = { lpf.i.i_mode };
        if crate::fsck_bug!(
            self,
            !lpf.is_inode() || mode & S_IFMT != S_IFDIR,
            "LPF.TYPE",
            "lost+found is not directory [{mode:#o}]"
        ) {
            return Ok(None);
        }
        self.fsck.lpf_ino = ino;
        Ok(Some((lpf, li.blk_addr)))
    }

    fn create_lpf(&mut self, mut root: Box<F2fsNode>, root_blk: u32) -> FsckResult<(Box<F2fsNode>, u32)> {
        let root_ino = self.meta.root_ino;
        let ino = self.alloc_nid()?;

        let mut lpf = self.new_dir_inode(&root, ino, LPF_NAME);
        self.make_empty_dir(&mut lpf, ino, root_ino)?;

        let mut at = root_blk;
        self.add_link(&mut root, &mut at, LPF_NAME, ino, F2FS_FT_DIR)?;

        let mut blk = NULL_ADDR;
        self.reserve_new_block(&mut blk, &F2fsSummary::new(ino, 0, 0), CURSEG_HOT_NODE, true)?;
        self.update_nat_blkaddr(ino, ino, blk)?;
        self.write_node(blk, &mut lpf)?;
        self.quota_add_inode_usage(ino, &lpf);

        self.fsck.lpf_ino = ino;
        crate::fsck_fix!(self, "LPF.CREATE", "Create lost+found ino [{ino:#x}] at {blk:#x}");
        Ok((lpf, blk))
    }

    /// Links inode `ino` into `lpf` under its number and points it back.
    fn do_reconnect(&mut self, lpf: &mut F2fsNode, lpf_blk: &mut u32, ino: u32) -> FsckResult<Box<F2fsNode>> {
        let ni = self.get_node_info(ino)?;
        let mut node = self.read_node(ni.blk_addr)?;
        let name = format!("{ino}");
        let lpf_ino = self.fsck.lpf_ino;

        if self.find_in_dir(lpf, name.as_bytes())?.is_some() {
            return Err(FsckError::cross_ref("name already exists in lost+found").nid(ino));
        }
        let ftype = file_type_of_mode({ node.i.i_mode });
        self.add_link(lpf, lpf_blk, name.as_bytes(), ino, ftype)?;

        node.i.i_name = [0; F2FS_NAME_LEN];
        node.i.i_name[..name.len()].copy_from_slice(name.as_bytes());
        node.i.i_namelen = name.len() as u32;
        node.i.i_pino = lpf_ino;
        let mut at = ni.blk_addr;
        self.rewrite_node(&mut node, &mut at)?;
        log::info!("reconnected inode [{ino:#x}] as lost+found/{name}");
        Ok(node)
    }

    /// Inode number of `name` in directory `dir`.
    fn find_in_dir(&mut self, dir: &F2fsNode, name: &[u8]) -> FsckResult<Option<u32>> {
        let hash = dentry_hash(DirCtx::of_inode(dir).casefolded, name);
        let flex = self.meta.flexible_inline_xattr();
        if dir.i.i_inline & F2FS_INLINE_DENTRY != 0 {
            let layout = DentryLayout::inline(dir.max_inline_data(flex));
            return Ok(layout.lookup(dir.inline_data(flex), name, hash).map(|(_, ino)| ino));
        }

        let pages = { dir.i.i_size }.div_ceil(F2FS_BLKSIZE as u64);
        let mut buf = vec![0u8; F2FS_BLKSIZE];
        for pgofs in 0..pages {
            let addr = self.file_block_addr(dir, pgofs)?;
            if !self.meta.is_valid_blkaddr(addr) {
                continue;
            }
            self.read_block(addr, &mut buf)?;
            if let Some((_, ino)) = DentryLayout::BLOCK.lookup(&buf, name, hash) {
                return Ok(Some(ino));
            }
        }
        Ok(None)
    }

    /// Adds `name -> ino` to directory `parent`, growing the hash table
    /// as needed, and writes the parent back through `parent_blk`.
    fn add_link(&mut self, parent: &mut F2fsNode, parent_blk: &mut u32, name: &[u8], ino: u32, ftype: u8) -> FsckResult {
        let pino = parent.nid();
        let flex = self.meta.flexible_inline_xattr();
        let hash = dentry_hash(DirCtx::of_inode(parent).casefolded, name);
        let de = F2fsDirEntry {
            hash_code: hash,
            ino,
            name_len: name.len() as u16,
            file_type: ftype,
        };
        let slots = name_slots(name.len());

        if parent.i.i_inline & F2FS_INLINE_DENTRY != 0 {
            let layout = DentryLayout::inline(parent.max_inline_data(flex));
            let start = parent.inline_data_offset();
            let end = start + parent.inline_data(flex).len();
            let area = &mut parent.as_mut_bytes()[start..end];
            if let Some(slot) = layout.find_free(area, slots) {
                layout.insert(area, slot, &de, name);
                if ftype == F2FS_FT_DIR {
                    parent.i.i_links = { parent.i.i_links } + 1;
                }
                return self.rewrite_node(parent, parent_blk);
            }
            self.convert_inline_dentry(parent)?;
        }

        let ver = self.get_node_info(pino)?.version;
        let api = parent.addrs_per_inode(flex) as u64;
        let dir_level = parent.i.i_dir_level;
        let mut depth = { parent.i.i_current_depth };
        let mut level = 0u32;
        let mut buf = vec![0u8; F2FS_BLKSIZE];

        let (block, mut addr, slot) = 'search: loop {
            if depth >= MAX_DIR_HASH_DEPTH {
                return Err(FsckError::counter("directory hash table is full").nid(pino));
            }
            if level == depth {
                depth += 1;
            }
            let nbucket = dir_buckets(level, dir_level);
            let bidx = dir_block_index(level, dir_level, hash as u64 % nbucket);
            for block in bidx..bidx + bucket_blocks(level) {
                let addr = self.file_block_addr(parent, block)?;
                if addr == NULL_ADDR {
                    // blocks past the inode would need new index nodes
                    if block >= api {
                        return Err(FsckError::counter("directory needs an index node").nid(pino));
                    }
                    buf.fill(0);
                    break 'search (block, NULL_ADDR, 0);
                }
                if !self.meta.is_valid_blkaddr(addr) {
                    continue;
                }
                self.read_block(addr, &mut buf)?;
                if let Some(slot) = DentryLayout::BLOCK.find_free(&buf, slots) {
                    break 'search (block, addr, slot);
                }
            }
            level += 1;
        };

        DentryLayout::BLOCK.insert(&mut buf, slot, &de, name);
        if addr == NULL_ADDR {
            let sum = F2fsSummary::new(pino, block as u16, ver);
            self.reserve_new_block(&mut addr, &sum, CURSEG_HOT_DATA, false)?;
            self.write_block(addr, &buf)?;
            let idx = parent.extra_isize() + block as usize;
            parent.set_i_addr(idx, addr);
            parent.i.i_blocks = { parent.i.i_blocks } + 1;
        } else if block < api {
            self.update_block(&buf, &mut addr, Some(&mut *parent))?;
        } else {
            self.update_block(&buf, &mut addr, None)?;
        }

        parent.i.i_current_depth = depth;
        if ftype == F2FS_FT_DIR {
            parent.i.i_links = { parent.i.i_links } + 1;
        }
        let size = { parent.i.i_size };
        parent.i.i_size = size.max((block + 1) * F2FS_BLKSIZE as u64);
        log::debug!("linked {ino:#x} into {pino:#x} at page {block}, block {addr:#x}");
        self.rewrite_node(parent, parent_blk)
    }

    /// Moves the inline dentries of `dir` into a fresh dentry block.
    fn convert_inline_dentry(&mut self, dir: &mut F2fsNode) -> FsckResult {
        let ino = dir.nid();
        let flex = self.meta.flexible_inline_xattr();
        let src = DentryLayout::inline(dir.max_inline_data(flex));
        let area = dir.inline_data(flex).to_vec();
        let dst = DentryLayout::BLOCK;

        let mut buf = vec![0u8; F2FS_BLKSIZE];
        for i in 0..src.nr {
            dst.set_slot(&mut buf, i, src.test_slot(&area, i));
            dst.set_entry(&mut buf, i, &src.entry(&area, i));
            dst.set_name(&mut buf, i, src.name(&area, i, F2FS_SLOT_LEN));
        }

        let ver = self.get_node_info(ino)?.version;
        let mut addr = NULL_ADDR;
        self.reserve_new_block(&mut addr, &F2fsSummary::new(ino, 0, ver), CURSEG_HOT_DATA, false)?;
        self.write_block(addr, &buf)?;

        // the inline area, reserved word included, becomes i_addr again
        let extra = dir.extra_isize();
        let start = OFFSET_OF_END_OF_I_EXT + 4 * extra;
        let end = dir.inline_data_offset() + area.len();
        dir.as_mut_bytes()[start..end].fill(0);
        dir.i.i_inline &= !F2FS_INLINE_DENTRY;
        dir.set_i_addr(extra, addr);
        dir.i.i_blocks = { dir.i.i_blocks } + 1;
        dir.i.i_size = F2FS_BLKSIZE as u64;
        dir.i.i_current_depth = 1;
        dir.i.i_dir_level = 0;
        crate::fsck_fix!(self, "LPF.INLINE", "Convert inline dentries of [{ino:#x}] to block {addr:#x}");
        Ok(())
    }

    /// Fresh directory inode named `name` under `parent`.
    fn new_dir_inode(&self, parent: &F2fsNode, ino: u32, name: &[u8]) -> Box<F2fsNode> {
        let now = now_secs();
        let mut node = F2fsNode::new_boxed();
        node.i.i_mode = S_IFDIR | 0o700;
        node.i.i_uid = parent.i.i_uid;
        node.i.i_gid = parent.i.i_gid;
        node.i.i_links = 2;
        node.i.i_size = F2FS_BLKSIZE as u64;
        node.i.i_blocks = 2;
        node.i.i_atime = now;
        node.i.i_ctime = now;
        node.i.i_mtime = now;
        node.i.i_current_depth = 1;
        node.i.i_pino = parent.nid();
        node.i.i_namelen = name.len() as u32;
        node.i.i_name[..name.len()].copy_from_slice(name);
        node.i.i_inline = F2FS_INLINE_XATTR;
        if self.meta.has_feature(F2FS_FEATURE_EXTRA_ATTR) {
            node.i.i_inline |= F2FS_EXTRA_ATTR;
            node.set_i_extra_isize(F2FS_TOTAL_EXTRA_ATTR_SIZE as u16);
            if self.meta.flexible_inline_xattr() {
                node.set_i_inline_xattr_size(DEFAULT_INLINE_XATTR_ADDRS as u16);
            }
        }
        node.fill_footer(ino, ino, 0);
        node.footer.cp_ver = self.ckpt.cp.checkpoint_ver;
        node
    }

    /// Gives `dir` a dentry block holding `.` and `..`.
    fn make_empty_dir(&mut self, dir: &mut F2fsNode, ino: u32, pino: u32) -> FsckResult {
        let layout = DentryLayout::BLOCK;
        let mut buf = vec![0u8; F2FS_BLKSIZE];
        let dot = F2fsDirEntry {
            hash_code: 0,
            ino,
            name_len: 1,
            file_type: F2FS_FT_DIR,
        };
        layout.insert(&mut buf, 0, &dot, b".");
        let dotdot = F2fsDirEntry {
            ino: pino,
            name_len: 2,
            ..dot
        };
        layout.insert(&mut buf, 1, &dotdot, b"..");

        let mut blk = NULL_ADDR;
        self.reserve_new_block(&mut blk, &F2fsSummary::new(ino, 0, 0), CURSEG_HOT_DATA, false)?;
        self.write_block(blk, &buf)?;
        let idx = dir.extra_isize();
        dir.set_i_addr(idx, blk);
        Ok(())
    }

    /// Lowest nid with no NAT address.
    fn alloc_nid(&mut self) -> FsckResult<u32> {
        let max = self.nm.max_nid as usize;
        let mut at = 1;
        while let Some(nid) = self.nm.nid_bitmap.find_next_zero_msb(at, max) {
            at = nid + 1;
            let nid = nid as u32;
            if self.meta.is_meta_ino(nid) || self.is_quota_ino(nid) {
                continue;
            }
            self.nm.nid_bitmap.set_msb(nid as usize);
            return Ok(nid);
        }
        Err(FsckError::counter("no free nid left"))
    }

    /// Releases inode `ino` and every block it owns, undoing the walk's
    /// accounting and the SIT bits.
    pub(crate) fn disconnect_file(&mut self, ino: u32) -> FsckResult {
        let ni = self.get_node_info(ino)?;
        if !self.meta.is_valid_blkaddr(ni.blk_addr) {
            return Ok(());
        }
        let node = self.read_node(ni.blk_addr)?;
        self.release_counts(true, true);
        self.release_block(ni.blk_addr);

        let xnid = { node.i.i_xattr_nid };
        if xnid != 0 {
            let xi = self.get_node_info(xnid)?;
            self.release_counts(true, false);
            self.release_block(xi.blk_addr);
            self.release_nat_entry(xnid)?;
        }

        let flex = self.meta.flexible_inline_xattr();
        if node.i.i_inline & (F2FS_INLINE_DATA | F2FS_INLINE_DENTRY) == 0 {
            let base = node.extra_isize();
            for i in 0..node.addrs_per_inode(flex) {
                self.release_data(node.i_addr(base + i));
            }
        }
        let apb = node.addrs_per_block();
        for slot in 0..NIDS_PER_INODE {
            let nid = node.i_nid(slot);
            if nid != 0 {
                self.release_tree(nid, NodeKind::of_inode_slot(slot), apb)?;
            }
        }
        self.release_nat_entry(ino)?;
        crate::fsck_fix!(self, "LPF.DISCONNECT", "Release unreachable inode [{ino:#x}]");
        Ok(())
    }

    fn release_tree(&mut self, nid: u32, kind: NodeKind, apb: usize) -> FsckResult {
        let ni = self.get_node_info(nid)?;
        if !self.meta.is_valid_blkaddr(ni.blk_addr) {
            return Ok(());
        }
        let node = self.read_node(ni.blk_addr)?;
        self.release_counts(true, false);
        self.release_block(ni.blk_addr);
        match kind {
            NodeKind::Direct => {
                for i in 0..apb {
                    self.release_data(node.dn_entry(i));
                }
            }
            NodeKind::Indirect | NodeKind::DoubleIndirect => {
                let sub = if kind == NodeKind::Indirect {
                    NodeKind::Direct
                } else {
                    NodeKind::Indirect
                };
                for i in 0..NIDS_PER_BLOCK {
                    let child = node.dn_entry(i);
                    if child != 0 {
                        self.release_tree(child, sub, apb)?;
                    }
                }
            }
            NodeKind::Inode | NodeKind::Xattr => {}
        }
        self.release_nat_entry(nid)
    }

    fn release_data(&mut self, addr: u32) {
        if addr == NULL_ADDR {
            return;
        }
        self.release_counts(false, false);
        if addr != NEW_ADDR && addr != COMPRESS_ADDR {
            self.release_block(addr);
        }
    }

    fn release_counts(&mut self, node: bool, inode: bool) {
        let chk = &mut self.fsck.chk;
        chk.valid_blk_cnt = chk.valid_blk_cnt.saturating_sub(1);
        self.totals.valid_blocks = self.totals.valid_blocks.saturating_sub(1);
        if node {
            chk.valid_node_cnt = chk.valid_node_cnt.saturating_sub(1);
            self.totals.valid_nodes = self.totals.valid_nodes.saturating_sub(1);
        }
        if inode {
            chk.valid_inode_cnt = chk.valid_inode_cnt.saturating_sub(1);
            self.totals.valid_inodes = self.totals.valid_inodes.saturating_sub(1);
        }
    }

    fn release_block(&mut self, blk: u32) {
        self.clear_main_bitmap(blk);
        if !self.meta.is_valid_blkaddr(blk) {
            return;
        }
        let segno = self.meta.segno(blk);
        let offset = self.meta.blkoff(blk) as usize;
        let fsync = self.need_fsync_data_record();
        let se = self.seg_entry_mut(segno);
        se.valid_blocks = se.valid_blocks.saturating_sub(1);
        se.cur_valid_map.clear_msb(offset);
        if fsync {
            se.ckpt_valid_map.clear_msb(offset);
        }
        self.clear_sit_bitmap(blk);
    }

    fn release_nat_entry(&mut self, nid: u32) -> FsckResult {
        self.nullify_nat_entry(nid)?;
        self.nm.nid_bitmap.clear_msb(nid as usize);
        self.fsck.chk.valid_nat_entry_cnt = self.fsck.chk.valid_nat_entry_cnt.saturating_sub(1);
        Ok(())
    }
}

fn now_secs() -> u64 {
    #[cfg(feature = "std")]
    {
        time::OffsetDateTime::now_utc().unix_timestamp().max(0) as u64
    }
    #[cfg(not(feature = "std"))]
    {
        0
    }
}
