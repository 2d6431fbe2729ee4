// SPDX-License-Identifier: MIT
//! Small F2FS images for the integration tests
//!
//! The layout is fixed: two checkpoint segments, two SIT, two NAT and one
//! SSA segment, then twelve main segments. Log `ty` owns main segment
//! `ty`, so every block the builder writes lives in an active log:
//! directory inodes in the hot node log, file inodes in the warm node log,
//! dentry blocks in the hot data log and file data in the warm data log.
#![allow(dead_code)]

use std::collections::BTreeMap;

use f2fsck::f2fs::{constant::*, crc::checkpoint_chksum, hash::dentry_hash, types::*};
use f2fsck::prelude::*;
use zerocopy::{FromZeros, IntoBytes};

pub const CP_BLKADDR: u32 = 512;
pub const SIT_BLKADDR: u32 = 1536;
pub const NAT_BLKADDR: u32 = 2560;
pub const SSA_BLKADDR: u32 = 3584;
pub const MAIN_BLKADDR: u32 = 4096;
pub const MAIN_SEGS: u32 = 12;
pub const TOTAL_BLOCKS: u32 = MAIN_BLKADDR + MAIN_SEGS * BLOCKS_PER_SEG;
pub const CP_VERSION: u64 = 1;
pub const OVP_SEGS: u32 = 2;

pub const ROOT: u32 = F2FS_ROOT_INO;

/// Zone size of the zoned test device: one segment per zone.
pub const ZONE_BYTES: u64 = BLOCKS_PER_SEG as u64 * F2FS_BLKSIZE as u64;

/// Byte offset of main segment `segno`.
pub fn seg_offset(segno: u32) -> u64 {
    (MAIN_BLKADDR + segno * BLOCKS_PER_SEG) as u64 * F2FS_BLKSIZE as u64
}

/// Opens and runs a session on any device.
pub fn run_on<IO: F2IO + ?Sized>(io: &mut IO, opts: CheckOptions) -> VerifyReport {
    let mut sess = CheckSession::open(io, opts).expect("open failed");
    sess.run().expect("run failed")
}

#[derive(Debug, Clone)]
enum Kind {
    Dir { entries: Vec<(Vec<u8>, u32, u8)> },
    File { blocks: u32, links: u32 },
    /// Hidden user quota file.
    Quota,
}

#[derive(Debug, Clone)]
struct Inode {
    parent: u32,
    name: Vec<u8>,
    kind: Kind,
}

/// Describes a tree, then lays it out with [`ImageBuilder::build`].
#[derive(Debug, Clone)]
pub struct ImageBuilder {
    inodes: BTreeMap<u32, Inode>,
    next_ino: u32,
    umount: bool,
    mirror_cp: bool,
    features: u32,
    orphans: Vec<u32>,
}

impl Default for ImageBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageBuilder {
    pub fn new() -> Self {
        let mut inodes = BTreeMap::new();
        inodes.insert(
            ROOT,
            Inode {
                parent: ROOT,
                name: Vec::new(),
                kind: Kind::Dir { entries: Vec::new() },
            },
        );
        Self {
            inodes,
            next_ino: ROOT + 1,
            umount: true,
            mirror_cp: false,
            features: 0,
            orphans: Vec::new(),
        }
    }

    /// Inode number handed to the next file or directory.
    pub fn next_ino(&mut self, ino: u32) -> &mut Self {
        self.next_ino = ino;
        self
    }

    /// Leaves the checkpoint without the unmount flag.
    pub fn unclean(&mut self) -> &mut Self {
        self.umount = false;
        self
    }

    /// Writes the same checkpoint into both packs.
    pub fn mirror_checkpoint(&mut self) -> &mut Self {
        self.mirror_cp = true;
        self
    }

    pub fn feature(&mut self, mask: u32) -> &mut Self {
        self.features |= mask;
        self
    }

    fn alloc_ino(&mut self) -> u32 {
        let ino = self.next_ino;
        self.next_ino += 1;
        ino
    }

    fn push_entry(&mut self, parent: u32, name: &[u8], ino: u32, ftype: u8) {
        match self.inodes.get_mut(&parent).map(|i| &mut i.kind) {
            Some(Kind::Dir { entries }) => entries.push((name.to_vec(), ino, ftype)),
            _ => panic!("inode {parent} is not a directory"),
        }
    }

    pub fn mkdir(&mut self, parent: u32, name: &str) -> u32 {
        let ino = self.alloc_ino();
        self.inodes.insert(
            ino,
            Inode {
                parent,
                name: name.as_bytes().to_vec(),
                kind: Kind::Dir { entries: Vec::new() },
            },
        );
        self.push_entry(parent, name.as_bytes(), ino, F2FS_FT_DIR);
        ino
    }

    /// Regular file of `blocks` data blocks.
    pub fn file(&mut self, parent: u32, name: &str, blocks: u32) -> u32 {
        let ino = self.alloc_ino();
        self.inodes.insert(
            ino,
            Inode {
                parent,
                name: name.as_bytes().to_vec(),
                kind: Kind::File { blocks, links: 1 },
            },
        );
        self.push_entry(parent, name.as_bytes(), ino, F2FS_FT_REG_FILE);
        ino
    }

    /// Another name for file `ino`.
    pub fn link(&mut self, parent: u32, name: &str, ino: u32) -> &mut Self {
        match self.inodes.get_mut(&ino).map(|i| &mut i.kind) {
            Some(Kind::File { links, .. }) => *links += 1,
            _ => panic!("inode {ino} is not a regular file"),
        }
        self.push_entry(parent, name.as_bytes(), ino, F2FS_FT_REG_FILE);
        self
    }

    /// Unlinked but still open file: no name, no links, listed in the
    /// checkpoint's orphan block.
    pub fn orphan(&mut self, blocks: u32) -> u32 {
        let ino = self.alloc_ino();
        self.inodes.insert(
            ino,
            Inode {
                parent: ROOT,
                name: Vec::new(),
                kind: Kind::File { blocks, links: 0 },
            },
        );
        self.orphans.push(ino);
        ino
    }

    /// User quota file recording what the rest of the tree uses. Turns
    /// on the QUOTA_INO feature.
    pub fn user_quota(&mut self) -> u32 {
        let ino = self.alloc_ino();
        self.inodes.insert(
            ino,
            Inode {
                parent: ROOT,
                name: Vec::new(),
                kind: Kind::Quota,
            },
        );
        self.features |= F2FS_FEATURE_QUOTA_INO;
        ino
    }

    /// Blocks and inodes charged to uid 0, which owns everything.
    fn root_usage(&self) -> (u64, u64) {
        let mut space = 0u64;
        let mut inodes = 0u64;
        for inode in self.inodes.values() {
            let blocks = match inode.kind {
                Kind::Dir { .. } => 1,
                Kind::File { blocks, .. } => blocks as u64,
                Kind::Quota => continue,
            };
            space += blocks * F2FS_BLKSIZE as u64;
            inodes += 1;
        }
        (space, inodes)
    }

    /// Adds `ino` to the orphan list as is.
    pub fn list_orphan(&mut self, ino: u32) -> &mut Self {
        self.orphans.push(ino);
        self
    }

    pub fn build(&self) -> Image {
        let mut l = Layout::new();
        let mut img = Image {
            bytes: vec![0u8; TOTAL_BLOCKS as usize * F2FS_BLKSIZE],
            nodes: BTreeMap::new(),
            data: BTreeMap::new(),
            next_blkoff: [0; NR_CURSEG_TYPE],
        };

        for (&ino, inode) in &self.inodes {
            match &inode.kind {
                Kind::Dir { entries } => {
                    let node_blk = l.alloc(CURSEG_HOT_NODE, ino, 0);
                    let dent_blk = l.alloc(CURSEG_HOT_DATA, ino, 0);
                    let subdirs = entries.iter().filter(|e| e.2 == F2FS_FT_DIR).count() as u32;

                    let mut node = inode_block(ino, inode, S_IFDIR | 0o755);
                    node.i.i_links = 2 + subdirs;
                    node.i.i_size = F2FS_BLKSIZE as u64;
                    node.i.i_blocks = 2;
                    node.i.i_current_depth = 1;
                    node.set_i_addr(0, dent_blk);
                    img.put(node_blk, node.as_bytes());
                    img.put(dent_blk, &dentry_block(ino, inode.parent, entries));
                    img.data.insert(ino, vec![dent_blk]);
                    l.nat.insert(ino, node_blk);
                    img.nodes.insert(ino, node_blk);
                }
                Kind::File { blocks, links } => {
                    let node_blk = l.alloc(CURSEG_WARM_NODE, ino, 0);
                    let mut node = inode_block(ino, inode, S_IFREG | 0o644);
                    node.i.i_links = *links;
                    node.i.i_size = *blocks as u64 * F2FS_BLKSIZE as u64;
                    node.i.i_blocks = 1 + *blocks as u64;
                    let mut addrs = Vec::new();
                    for idx in 0..*blocks {
                        let blk = l.alloc(CURSEG_WARM_DATA, ino, idx as u16);
                        node.set_i_addr(idx as usize, blk);
                        img.put(blk, &vec![(ino as u8) ^ (idx as u8); F2FS_BLKSIZE]);
                        addrs.push(blk);
                    }
                    img.put(node_blk, node.as_bytes());
                    img.data.insert(ino, addrs);
                    l.nat.insert(ino, node_blk);
                    img.nodes.insert(ino, node_blk);
                }
                Kind::Quota => {
                    let node_blk = l.alloc(CURSEG_WARM_NODE, ino, 0);
                    let pages = quota_pages(QUOTA_USER_MAGIC, self.root_usage());
                    let mut node = inode_block(ino, inode, S_IFREG | 0o600);
                    node.i.i_links = 1;
                    node.i.i_size = (QUOTA_TREE_BLOCKS * QT_BLKSIZE) as u64;
                    node.i.i_blocks = 1 + pages.len() as u64;
                    let mut addrs = Vec::new();
                    for (idx, page) in pages.iter().enumerate() {
                        let blk = l.alloc(CURSEG_WARM_DATA, ino, idx as u16);
                        node.set_i_addr(idx, blk);
                        img.put(blk, page);
                        addrs.push(blk);
                    }
                    img.put(node_blk, node.as_bytes());
                    img.data.insert(ino, addrs);
                    l.nat.insert(ino, node_blk);
                    img.nodes.insert(ino, node_blk);
                }
            }
        }

        img.next_blkoff = l.next;
        self.write_meta(&mut img, &l);
        img
    }

    fn write_meta(&self, img: &mut Image, l: &Layout) {
        let mut sb = F2fsSuperBlock::default();
        sb.block_count = TOTAL_BLOCKS as u64;
        sb.segment0_blkaddr = CP_BLKADDR;
        sb.cp_blkaddr = CP_BLKADDR;
        sb.segment_count_ckpt = 2;
        sb.sit_blkaddr = SIT_BLKADDR;
        sb.segment_count_sit = 2;
        sb.nat_blkaddr = NAT_BLKADDR;
        sb.segment_count_nat = 2;
        sb.ssa_blkaddr = SSA_BLKADDR;
        sb.segment_count_ssa = 1;
        sb.main_blkaddr = MAIN_BLKADDR;
        sb.segment_count_main = MAIN_SEGS;
        sb.segment_count = 7 + MAIN_SEGS;
        sb.section_count = MAIN_SEGS;
        sb.feature = self.features;
        let mut qf_ino = [0u32; F2FS_MAX_QUOTAS];
        for (&ino, inode) in &self.inodes {
            if matches!(inode.kind, Kind::Quota) {
                qf_ino[0] = ino;
            }
        }
        sb.qf_ino = qf_ino;
        sb.uuid = *b"f2fsck-test-uuid";
        sb.update_crc();
        for blk in 0..2u32 {
            let at = blk as usize * F2FS_BLKSIZE + F2FS_SUPER_OFFSET as usize;
            img.bytes[at..at + F2FS_SUPERBLOCK_SIZE].copy_from_slice(sb.as_bytes());
        }

        // NAT: node and meta inodes point at block 1
        let mut nat = Box::new(F2fsNatBlock::new_zeroed());
        for ino in [F2FS_NODE_INO, F2FS_META_INO] {
            nat.entries[ino as usize] = F2fsNatEntry {
                version: 0,
                ino,
                block_addr: 1,
            };
        }
        for (&nid, &blk) in &l.nat {
            assert!((nid as usize) < NAT_ENTRY_PER_BLOCK, "test images keep nids in the first NAT block");
            nat.entries[nid as usize] = F2fsNatEntry {
                version: 0,
                ino: nid,
                block_addr: blk,
            };
        }
        img.put(NAT_BLKADDR, nat.as_bytes());

        let mut sit = Box::new(F2fsSitBlock::new_zeroed());
        for (segno, e) in l.sit.iter().enumerate() {
            sit.entries[segno] = *e;
        }
        img.put(SIT_BLKADDR, sit.as_bytes());

        for (segno, sum) in l.sums.iter().enumerate() {
            img.put(SSA_BLKADDR + segno as u32, sum.as_bytes());
        }

        let mut cp = F2fsCheckpoint::new_zeroed();
        cp.checkpoint_ver = CP_VERSION;
        cp.user_block_count = ((MAIN_SEGS - OVP_SEGS) as u64) << LOG_BLOCKS_PER_SEG;
        cp.valid_block_count = l.valid_blocks;
        cp.rsvd_segment_count = 1;
        cp.overprov_segment_count = OVP_SEGS;
        cp.free_segment_count = MAIN_SEGS - NR_CURSEG_TYPE as u32;
        for ty in 0..NR_CURSEG_TYPE {
            cp.set_curseg(ty, ty as u32, l.next[ty], LFS);
        }
        cp.ckpt_flags = if self.umount { CP_UMOUNT_FLAG } else { 0 };
        let orphan_blks = u32::from(!self.orphans.is_empty());
        if orphan_blks != 0 {
            assert!(self.orphans.len() <= F2FS_ORPHANS_PER_BLOCK);
            cp.ckpt_flags |= CP_ORPHAN_PRESENT_FLAG;
        }
        let total = if self.umount {
            CP_PACK_FIXED_BLOCKS
        } else {
            CP_PACK_FIXED_BLOCKS - NR_CURSEG_NODE_TYPE as u32
        };
        cp.cp_pack_total_block_count = total + orphan_blks;
        cp.cp_pack_start_sum = 1 + orphan_blks;
        cp.valid_node_count = l.nat.len() as u32;
        cp.valid_inode_count = l.nat.len() as u32;
        cp.next_free_nid = self.next_ino;
        cp.sit_ver_bitmap_bytesize = 64;
        cp.nat_ver_bitmap_bytesize = 64;
        cp.checksum_offset = CP_CHKSUM_OFFSET as u32;

        let packs: &[u32] = if self.mirror_cp {
            &[CP_BLKADDR, CP_BLKADDR + BLOCKS_PER_SEG]
        } else {
            &[CP_BLKADDR]
        };
        let mut orphan = Box::new(F2fsOrphanBlock::new_zeroed());
        orphan.ino[..self.orphans.len()].copy_from_slice(&self.orphans);
        orphan.blk_addr = 1;
        orphan.blk_count = 1;
        orphan.entry_count = self.orphans.len() as u32;

        for &pack in packs {
            img.put_checkpoint(pack, &cp);
            if orphan_blks != 0 {
                img.put(pack + 1, orphan.as_bytes());
            }
            let logs = if self.umount { NR_CURSEG_TYPE } else { NR_CURSEG_DATA_TYPE };
            for ty in 0..logs {
                img.put(pack + cp.cp_pack_start_sum + ty as u32, l.sums[ty].as_bytes());
            }
        }
    }
}

/// Block allocation and the accounting that goes with it.
struct Layout {
    next: [u16; NR_CURSEG_TYPE],
    sit: Vec<F2fsSitEntry>,
    sums: Vec<F2fsSummaryBlock>,
    nat: BTreeMap<u32, u32>,
    valid_blocks: u64,
}

impl Layout {
    fn new() -> Self {
        let mut sit = vec![F2fsSitEntry::default(); MAIN_SEGS as usize];
        let mut sums = vec![F2fsSummaryBlock::default(); MAIN_SEGS as usize];
        for ty in 0..NR_CURSEG_TYPE {
            sit[ty].vblocks = (ty as u16) << SIT_VBLOCKS_SHIFT;
            sums[ty].footer.entry_type = if ty >= CURSEG_HOT_NODE { SUM_TYPE_NODE } else { SUM_TYPE_DATA };
        }
        Self {
            next: [0; NR_CURSEG_TYPE],
            sit,
            sums,
            nat: BTreeMap::new(),
            valid_blocks: 0,
        }
    }

    /// Next block of log `ty`, owned by `nid` at `ofs_in_node`.
    fn alloc(&mut self, ty: usize, nid: u32, ofs_in_node: u16) -> u32 {
        let off = self.next[ty];
        assert!((off as u32) < BLOCKS_PER_SEG - 1, "log {ty} is full");
        self.next[ty] += 1;
        let e = &mut self.sit[ty];
        e.vblocks = { e.vblocks } + 1;
        e.valid_map[off as usize / 8] |= 0x80 >> (off % 8);
        self.sums[ty].entries[off as usize] = F2fsSummary::new(nid, ofs_in_node, 0);
        self.valid_blocks += 1;
        MAIN_BLKADDR + ty as u32 * BLOCKS_PER_SEG + off as u32
    }
}

const QUOTA_USER_MAGIC: u32 = 0xd9c0_1f11;
const QT_BLKSIZE: usize = 1024;
/// Header, four tree levels and one leaf.
const QUOTA_TREE_BLOCKS: usize = 6;
const QT_LEAF_BLK: usize = 5;
const QT_LEAF_HEADER: usize = 16;

/// A v2 quota file holding one entry, for id 0, as 4 KiB pages.
fn quota_pages(magic: u32, (space, inodes): (u64, u64)) -> Vec<Vec<u8>> {
    let mut file = vec![0u8; QUOTA_TREE_BLOCKS * QT_BLKSIZE];
    file[..4].copy_from_slice(&magic.to_le_bytes());
    // id 0 takes slot 0 on every level
    for level in 1..QT_LEAF_BLK {
        let at = level * QT_BLKSIZE;
        file[at..at + 4].copy_from_slice(&(level as u32 + 1).to_le_bytes());
    }
    let e = QT_LEAF_BLK * QT_BLKSIZE + QT_LEAF_HEADER;
    file[e + 24..e + 32].copy_from_slice(&inodes.to_le_bytes());
    file[e + 48..e + 56].copy_from_slice(&space.to_le_bytes());
    file.chunks(F2FS_BLKSIZE)
        .map(|c| {
            let mut page = vec![0u8; F2FS_BLKSIZE];
            page[..c.len()].copy_from_slice(c);
            page
        })
        .collect()
}

fn inode_block(ino: u32, inode: &Inode, mode: u16) -> Box<F2fsNode> {
    let mut node = F2fsNode::new_boxed();
    node.i.i_mode = mode;
    node.i.i_pino = inode.parent;
    node.i.i_namelen = inode.name.len() as u32;
    node.i.i_name[..inode.name.len()].copy_from_slice(&inode.name);
    node.i.i_generation = ino;
    node.fill_footer(ino, ino, 0);
    node.footer.cp_ver = CP_VERSION;
    node
}

fn dentry_block(ino: u32, parent: u32, entries: &[(Vec<u8>, u32, u8)]) -> Vec<u8> {
    let layout = DentryLayout::BLOCK;
    let mut buf = vec![0u8; F2FS_BLKSIZE];
    let dots = [(b".".to_vec(), ino, F2FS_FT_DIR), (b"..".to_vec(), parent, F2FS_FT_DIR)];
    let mut slot = 0;
    for (name, child, ftype) in dots.iter().chain(entries) {
        let de = F2fsDirEntry {
            hash_code: dentry_hash(false, name),
            ino: *child,
            name_len: name.len() as u16,
            file_type: *ftype,
        };
        layout.insert(&mut buf, slot, &de, name);
        slot += name_slots(name.len());
    }
    assert!(slot <= layout.nr, "directory {ino} does not fit in one dentry block");
    buf
}

/// A built image plus where the builder put things.
#[derive(Debug, Clone)]
pub struct Image {
    pub bytes: Vec<u8>,
    /// Inode number to node block.
    pub nodes: BTreeMap<u32, u32>,
    /// Inode number to data blocks (the dentry block for directories).
    pub data: BTreeMap<u32, Vec<u32>>,
    /// First free offset of every log.
    pub next_blkoff: [u16; NR_CURSEG_TYPE],
}

impl Image {
    fn range(blk: u32) -> std::ops::Range<usize> {
        let start = blk as usize * F2FS_BLKSIZE;
        start..start + F2FS_BLKSIZE
    }

    pub fn put(&mut self, blk: u32, buf: &[u8]) {
        self.bytes[Self::range(blk)].copy_from_slice(buf);
    }

    pub fn block(&self, blk: u32) -> &[u8] {
        &self.bytes[Self::range(blk)]
    }

    pub fn block_mut(&mut self, blk: u32) -> &mut [u8] {
        &mut self.bytes[Self::range(blk)]
    }

    pub fn node_addr(&self, ino: u32) -> u32 {
        self.nodes[&ino]
    }

    pub fn data_addr(&self, ino: u32, idx: usize) -> u32 {
        self.data[&ino][idx]
    }

    pub fn read_node_at(&self, blk: u32) -> Box<F2fsNode> {
        let mut node = F2fsNode::new_boxed();
        node.as_mut_bytes().copy_from_slice(self.block(blk));
        node
    }

    pub fn node(&self, ino: u32) -> Box<F2fsNode> {
        self.read_node_at(self.node_addr(ino))
    }

    pub fn edit_node(&mut self, ino: u32, f: impl FnOnce(&mut F2fsNode)) {
        let blk = self.node_addr(ino);
        let mut node = self.read_node_at(blk);
        f(&mut node);
        self.put(blk, node.as_bytes());
    }

    /// Entry `name` of directory `dir`: `(slot, ino)`.
    pub fn lookup(&self, dir: u32, name: &str) -> Option<(usize, u32)> {
        let blk = self.data_addr(dir, 0);
        DentryLayout::BLOCK.lookup(self.block(blk), name.as_bytes(), dentry_hash(false, name.as_bytes()))
    }

    pub fn edit_dentry(&mut self, dir: u32, slot: usize, f: impl FnOnce(&mut F2fsDirEntry)) {
        let blk = self.data_addr(dir, 0);
        let layout = DentryLayout::BLOCK;
        let buf = self.block_mut(blk);
        let mut de = layout.entry(buf, slot);
        f(&mut de);
        layout.set_entry(buf, slot, &de);
    }

    pub fn checkpoint(&self, pack: u32) -> F2fsCheckpoint {
        let blk = CP_BLKADDR + (pack - 1) * BLOCKS_PER_SEG;
        let mut cp = F2fsCheckpoint::new_zeroed();
        let n = core::mem::size_of::<F2fsCheckpoint>();
        cp.as_mut_bytes().copy_from_slice(&self.block(blk)[..n]);
        cp
    }

    /// Header and trailer of the pack starting at `pack_blk`.
    pub fn put_checkpoint(&mut self, pack_blk: u32, cp: &F2fsCheckpoint) {
        let mut buf = vec![0u8; F2FS_BLKSIZE];
        buf[..core::mem::size_of::<F2fsCheckpoint>()].copy_from_slice(cp.as_bytes());
        let crc = checkpoint_chksum(&buf);
        buf[CP_CHKSUM_OFFSET..].copy_from_slice(&crc.to_le_bytes());
        self.put(pack_blk, &buf);
        self.put(pack_blk + cp.cp_pack_total_block_count - 1, &buf);
    }

    pub fn edit_checkpoint(&mut self, f: impl FnOnce(&mut F2fsCheckpoint)) {
        let mut cp = self.checkpoint(1);
        f(&mut cp);
        self.put_checkpoint(CP_BLKADDR, &cp);
    }

    /// Entry `nid` of the first NAT block.
    pub fn nat_entry(&self, nid: u32) -> F2fsNatEntry {
        let mut nat = F2fsNatBlock::new_zeroed();
        nat.as_mut_bytes().copy_from_slice(self.block(NAT_BLKADDR));
        nat.entries[nid as usize]
    }

    pub fn edit_nat(&mut self, nid: u32, f: impl FnOnce(&mut F2fsNatEntry)) {
        let mut nat = Box::new(F2fsNatBlock::new_zeroed());
        nat.as_mut_bytes().copy_from_slice(self.block(NAT_BLKADDR));
        f(&mut nat.entries[nid as usize]);
        self.put(NAT_BLKADDR, nat.as_bytes());
    }

    /// SIT entry of main segment `segno`.
    pub fn sit_entry(&self, segno: u32) -> F2fsSitEntry {
        let mut sit = F2fsSitBlock::new_zeroed();
        sit.as_mut_bytes().copy_from_slice(self.block(SIT_BLKADDR));
        sit.entries[segno as usize]
    }

    pub fn edit_sit(&mut self, segno: u32, f: impl FnOnce(&mut F2fsSitEntry)) {
        let mut sit = Box::new(F2fsSitBlock::new_zeroed());
        sit.as_mut_bytes().copy_from_slice(self.block(SIT_BLKADDR));
        f(&mut sit.entries[segno as usize]);
        self.put(SIT_BLKADDR, sit.as_bytes());
    }

    /// Usage entry of id 0 in quota file `ino`: inodes at 24, space at 48.
    pub fn quota_entry_mut(&mut self, ino: u32) -> &mut [u8] {
        let at = QT_LEAF_BLK * QT_BLKSIZE + QT_LEAF_HEADER;
        let page = self.data_addr(ino, at / F2FS_BLKSIZE);
        let ofs = at % F2FS_BLKSIZE;
        &mut self.block_mut(page)[ofs..ofs + 72]
    }

    /// Orphan list of the first checkpoint pack.
    pub fn orphan_inos(&self) -> Vec<u32> {
        let mut blk = F2fsOrphanBlock::new_zeroed();
        blk.as_mut_bytes().copy_from_slice(self.block(CP_BLKADDR + 1));
        blk.inos().to_vec()
    }

    /// Inode block of `ino` found through the NAT, for inodes the fixer
    /// created.
    pub fn node_by_nat(&self, ino: u32) -> Box<F2fsNode> {
        self.read_node_at(self.nat_entry(ino).block_addr)
    }

    /// Address of the first free block of log `ty`.
    pub fn next_free(&self, ty: usize) -> u32 {
        MAIN_BLKADDR + ty as u32 * BLOCKS_PER_SEG + self.next_blkoff[ty] as u32
    }

    /// Writes a warm node chain of `len` nodes past the warm node log.
    /// With `loop_to`, the last node points back at that index.
    pub fn fsync_chain(&mut self, len: usize, loop_to: Option<usize>) -> Vec<u32> {
        let start = self.next_free(CURSEG_WARM_NODE);
        let addrs: Vec<u32> = (0..len as u32).map(|i| start + i).collect();
        for (i, &blk) in addrs.iter().enumerate() {
            let nid = 400 + i as u32;
            let mut node = F2fsNode::new_boxed();
            node.fill_footer(nid, nid, 0);
            node.footer.cp_ver = CP_VERSION;
            node.footer.next_blkaddr = match (addrs.get(i + 1), loop_to) {
                (Some(&next), _) => next,
                (None, Some(j)) => addrs[j],
                (None, None) => NULL_ADDR,
            };
            self.put(blk, node.as_bytes());
        }
        addrs
    }

    pub fn io(&mut self) -> MemF2IO<'_> {
        MemF2IO::new(&mut self.bytes)
    }

    /// The image on a host-managed zoned device. Metadata sits in
    /// conventional zones; every main segment is a sequential zone whose
    /// write pointer matches the log writing it.
    pub fn zoned_io(&mut self) -> MemZonedF2IO<'_> {
        let next = self.next_blkoff;
        let conventional = (MAIN_BLKADDR / BLOCKS_PER_SEG) as usize;
        let mut dev = MemZonedF2IO::new(&mut self.bytes, ZONE_BYTES, conventional);
        for (ty, &off) in next.iter().enumerate() {
            let start = seg_offset(ty as u32);
            dev.set_wp(start, start + off as u64 * F2FS_BLKSIZE as u64).expect("set_wp");
        }
        dev
    }

    /// Opens and runs a session with `opts`.
    pub fn run(&mut self, opts: CheckOptions) -> VerifyReport {
        let mut io = self.io();
        let mut sess = CheckSession::open(&mut io, opts).expect("open failed");
        sess.run().expect("run failed")
    }

    /// Check-only run through an IO counter; returns the report and
    /// whether anything was written.
    pub fn run_counted(&mut self, opts: CheckOptions) -> (VerifyReport, IoStats) {
        let mut io = self.io();
        let mut counter = IOCounter::new(&mut io);
        let rep = {
            let mut sess = CheckSession::open(&mut counter, opts).expect("open failed");
            sess.run().expect("run failed")
        };
        (rep, counter.snapshot())
    }
}

/// Clean image: a subdirectory, a few files and one hard link.
pub fn sample_tree() -> (ImageBuilder, SampleInos) {
    let mut b = ImageBuilder::new();
    let docs = b.mkdir(ROOT, "docs");
    let a = b.file(ROOT, "a.txt", 2);
    let notes = b.file(docs, "notes", 1);
    let empty = b.file(docs, "empty", 0);
    b.link(ROOT, "notes-ln", notes);
    (
        b,
        SampleInos {
            docs,
            a,
            notes,
            empty,
        },
    )
}

#[derive(Debug, Clone, Copy)]
pub struct SampleInos {
    pub docs: u32,
    pub a: u32,
    pub notes: u32,
    pub empty: u32,
}
