// SPDX-License-Identifier: MIT
//! Quota inodes and usage
//!
//! With the QUOTA_INO feature each quota type lives in a hidden regular
//! file named by `qf_ino`. The walk sums blocks and inodes per uid, gid and
//! project id; the totals are compared with the v2 quota tree stored in
//! the files. Mismatches are reported, the files are never rebuilt.

use alloc::{
    collections::{BTreeMap, BTreeSet},
    vec,
    vec::Vec,
};

use f2io::prelude::*;

use crate::core::{errors::*, options::PreenMode};
use crate::f2fs::{
    constant::*,
    session::{CheckSession, ChildInfo, ComprBlkCnt, DqUsage},
    types::*,
};

use super::node::pages_spanned;

const QT_BLKSIZE: usize = 1024;
const QT_TREEOFF: usize = 1;
const QT_TREEDEPTH: usize = 4;
const QT_DQDBHEADER_SIZE: usize = 16;
const V2R1_DQBLK_SIZE: usize = 72;
const V2_INIT_MAGICS: [u32; F2FS_MAX_QUOTAS] = [0xd9c0_1f11, 0xd9c0_1927, 0xd9c0_3f14];
const QUOTA_NAMES: [&str; F2FS_MAX_QUOTAS] = ["user", "group", "project"];

/// Usage recorded in a quota file, per id.
pub(crate) type DiskUsage = BTreeMap<u32, DqUsage>;

impl<'a, IO: F2IO + ?Sized> CheckSession<'a, IO> {
    pub(crate) fn is_quota_ino(&self, ino: u32) -> bool {
        self.meta.has_feature(F2FS_FEATURE_QUOTA_INO) && (0..F2FS_MAX_QUOTAS).any(|q| self.sb.quota_ino(q) == ino)
    }

    /// Validates the quota inodes before the tree walk.
    pub(crate) fn chk_quota_node(&mut self) -> FsckResult {
        if !self.meta.has_feature(F2FS_FEATURE_QUOTA_INO) {
            return Ok(());
        }
        let mut ret = Ok(());
        for q in 0..F2FS_MAX_QUOTAS {
            let ino = self.sb.quota_ino(q);
            if ino == 0 {
                continue;
            }
            log::debug!("qtype [{q}] ino [{ino:#x}]");

            if self.opts.preen == PreenMode::Quick && !self.run.fix_on {
                let ni = self.get_node_info(ino)?;
                if !self.meta.is_valid_nid(ino) || !self.meta.is_valid_blkaddr(ni.blk_addr) {
                    ret = Err(FsckError::structural("quota inode address").nid(ino));
                    break;
                }
                continue;
            }

            let mut blk_cnt = 1u64;
            let mut cbc = ComprBlkCnt::default();
            let mut child = ChildInfo::default();
            if let Err(e) = self.chk_node_blk(None, ino, F2FS_FT_REG_FILE, NodeKind::Inode, &mut blk_cnt, &mut cbc, &mut child) {
                if e.is_fatal() {
                    return Err(e);
                }
                crate::fsck_bug!(self, true, "QUOTA.INODE", "wrong quota inode, qtype [{q}] ino [{ino:#x}]");
                ret = Err(e);
            }
        }
        ret
    }

    /// Charges inode `nid` to its owners.
    pub(crate) fn quota_add_inode_usage(&mut self, nid: u32, node: &F2fsNode) {
        if !self.meta.has_feature(F2FS_FEATURE_QUOTA_INO) || self.is_quota_ino(nid) {
            return;
        }
        let space = { node.i.i_blocks }.saturating_sub(1) * F2FS_BLKSIZE as u64;
        let projid = if node.has_extra_attr() { node.i_projid() } else { 0 };
        let ids = [{ node.i.i_uid }, { node.i.i_gid }, projid];
        for (q, id) in ids.into_iter().enumerate() {
            let u = self.fsck.quota[q].entry(id).or_default();
            u.space += space;
            u.inodes += 1;
        }
    }

    /// Compares the usage gathered by the walk with every quota file.
    pub(crate) fn chk_quota_files(&mut self) -> FsckResult {
        if !self.meta.has_feature(F2FS_FEATURE_QUOTA_INO) {
            return Ok(());
        }
        for q in 0..F2FS_MAX_QUOTAS {
            let ino = self.sb.quota_ino(q);
            if ino == 0 {
                continue;
            }
            let disk = match self.read_quota_file(q, ino) {
                Ok(d) => d,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    crate::fsck_bug!(self, true, "QUOTA.FILE", "{} quota file [{ino:#x}] unreadable: {e}", QUOTA_NAMES[q]);
                    continue;
                }
            };
            let computed = core::mem::take(&mut self.fsck.quota[q]);
            for (id, d, c) in usage_mismatches(&disk, &computed) {
                crate::fsck_bug!(
                    self,
                    true,
                    "QUOTA.USAGE",
                    "[QUOTA WARNING] {} id {id}: inodes {} vs {}, space {} vs {}",
                    QUOTA_NAMES[q],
                    d.inodes,
                    c.inodes,
                    d.space,
                    c.space
                );
            }
            self.fsck.quota[q] = computed;
        }
        Ok(())
    }

    fn read_quota_file(&mut self, q: usize, ino: u32) -> FsckResult<DiskUsage> {
        let ni = self.get_node_info(ino)?;
        let inode = self.read_node(ni.blk_addr)?;
        let size = { inode.i.i_size } as usize;
        let mut file = QuotaFile {
            inode: &inode,
            size,
            page: None,
        };

        let header = file.block(self, 0)?;
        let magic = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
        if magic != V2_INIT_MAGICS[q] {
            return Err(FsckError::structural("bad quota file magic").nid(ino));
        }

        let mut out = DiskUsage::new();
        let mut visited = BTreeSet::new();
        file.walk_tree(self, QT_TREEOFF, 0, &mut out, &mut visited)?;
        Ok(out)
    }

    /// Data address of file page `pgofs` of `inode`, `NULL_ADDR` for holes.
    pub(crate) fn file_block_addr(&mut self, inode: &F2fsNode, pgofs: u64) -> FsckResult<u32> {
        let flex = self.meta.flexible_inline_xattr();
        let api = inode.addrs_per_inode(flex) as u64;
        if pgofs < api {
            return Ok(inode.i_addr(inode.extra_isize() + pgofs as usize));
        }
        let apb = inode.addrs_per_block();
        let mut off = pgofs - api;
        for slot in 0..NIDS_PER_INODE {
            let kind = NodeKind::of_inode_slot(slot);
            let span = pages_spanned(kind, apb);
            if off < span {
                return self.node_block_addr(inode.i_nid(slot), kind, off, apb as u64);
            }
            off -= span;
        }
        Ok(NULL_ADDR)
    }

    fn node_block_addr(&mut self, nid: u32, kind: NodeKind, off: u64, apb: u64) -> FsckResult<u32> {
        if nid == 0 {
            return Ok(NULL_ADDR);
        }
        let ni = self.get_node_info(nid)?;
        if !self.meta.is_valid_blkaddr(ni.blk_addr) {
            return Ok(NULL_ADDR);
        }
        let node = self.read_node(ni.blk_addr)?;
        let nids = NIDS_PER_BLOCK as u64;
        match kind {
            NodeKind::Direct => Ok(node.dn_entry(off as usize)),
            NodeKind::Indirect => self.node_block_addr(node.dn_entry((off / apb) as usize), NodeKind::Direct, off % apb, apb),
            NodeKind::DoubleIndirect => {
                let span = apb * nids;
                self.node_block_addr(node.dn_entry((off / span) as usize), NodeKind::Indirect, off % span, apb)
            }
            NodeKind::Inode | NodeKind::Xattr => Ok(NULL_ADDR),
        }
    }
}

/// Reader of 1 KiB quota blocks over 4 KiB file pages.
struct QuotaFile<'n> {
    inode: &'n F2fsNode,
    size: usize,
    page: Option<(u64, Vec<u8>)>,
}

impl QuotaFile<'_> {
    fn block<IO: F2IO + ?Sized>(&mut self, sess: &mut CheckSession<'_, IO>, blk: usize) -> FsckResult<Vec<u8>> {
        if (blk + 1) * QT_BLKSIZE > self.size {
            return Err(FsckError::structural("quota block beyond i_size"));
        }
        let per_page = F2FS_BLKSIZE / QT_BLKSIZE;
        let pgofs = (blk / per_page) as u64;
        let cached = matches!(&self.page, Some((p, _)) if *p == pgofs);
        if !cached {
            let addr = sess.file_block_addr(self.inode, pgofs)?;
            let mut buf = vec![0u8; F2FS_BLKSIZE];
            if addr != NULL_ADDR && addr != NEW_ADDR {
                sess.read_data_block(addr, &mut buf)?;
            }
            self.page = Some((pgofs, buf));
        }
        let within = (blk % per_page) * QT_BLKSIZE;
        match &self.page {
            Some((_, page)) => Ok(page[within..within + QT_BLKSIZE].to_vec()),
            None => Err(FsckError::structural("quota page not loaded")),
        }
    }

    fn walk_tree<IO: F2IO + ?Sized>(
        &mut self,
        sess: &mut CheckSession<'_, IO>,
        blk: usize,
        depth: usize,
        out: &mut DiskUsage,
        visited: &mut BTreeSet<usize>,
    ) -> FsckResult {
        // leaves are shared between ids; tree blocks are not
        if !visited.insert(blk) {
            return Ok(());
        }
        let buf = self.block(sess, blk)?;
        if depth == QT_TREEDEPTH {
            parse_leaf(&buf, out);
            return Ok(());
        }
        for r in buf.chunks_exact(4) {
            let child = u32::from_le_bytes([r[0], r[1], r[2], r[3]]) as usize;
            if child == 0 {
                continue;
            }
            self.walk_tree(sess, child, depth + 1, out, visited)?;
        }
        Ok(())
    }
}

/// Collects the used entries of a leaf block.
fn parse_leaf(buf: &[u8], out: &mut DiskUsage) {
    let entries = &buf[QT_DQDBHEADER_SIZE..];
    for e in entries.chunks_exact(V2R1_DQBLK_SIZE) {
        if e.iter().all(|&b| b == 0) {
            continue;
        }
        let rd64 = |o: usize| {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&e[o..o + 8]);
            u64::from_le_bytes(raw)
        };
        let id = u32::from_le_bytes([e[0], e[1], e[2], e[3]]);
        out.insert(
            id,
            DqUsage {
                inodes: rd64(24),
                space: rd64(48),
            },
        );
    }
}

/// Ids whose recorded usage differs from the computed one, with both.
fn usage_mismatches(disk: &DiskUsage, computed: &BTreeMap<u32, DqUsage>) -> Vec<(u32, DqUsage, DqUsage)> {
    let mut ids: Vec<u32> = disk.keys().chain(computed.keys()).copied().collect();
    ids.sort_unstable();
    ids.dedup();
    ids.into_iter()
        .filter_map(|id| {
            let d = disk.get(&id).copied().unwrap_or_default();
            let c = computed.get(&id).copied().unwrap_or_default();
            (d != c).then_some((id, d, c))
        })
        .collect()
}
