// SPDX-License-Identifier: MIT
//! Node blocks: inodes, direct/indirect nodes, xattr nodes
//!
//! A node block is always 4 KiB with a 24-byte footer. The inode header is
//! a packed struct; the address and nid arrays that follow it, and the
//! extra attribute overlay at the start of `i_addr`, are reached through
//! byte-offset accessors since their position depends on the inode flags.

use zerocopy::{FromBytes, FromZeros, Immutable, IntoBytes, KnownLayout};

use crate::f2fs::constant::*;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, IntoBytes, FromBytes, KnownLayout, Immutable)]
#[repr(C, packed)]
pub struct F2fsExtent {
    pub fofs: u32,
    pub blk_addr: u32,
    pub len: u32,
}

/// Fixed inode fields up to the end of `i_ext` (360 bytes).
#[derive(Debug, Clone, Copy, IntoBytes, FromBytes, KnownLayout, Immutable)]
#[repr(C, packed)]
pub struct F2fsInode {
    pub i_mode: u16,
    pub i_advise: u8,
    pub i_inline: u8,
    pub i_uid: u32,
    pub i_gid: u32,
    pub i_links: u32,
    pub i_size: u64,
    pub i_blocks: u64,
    pub i_atime: u64,
    pub i_ctime: u64,
    pub i_mtime: u64,
    pub i_atime_nsec: u32,
    pub i_ctime_nsec: u32,
    pub i_mtime_nsec: u32,
    pub i_generation: u32,
    /// Directory depth; low 16 bits are `i_gc_failures` for regular files
    pub i_current_depth: u32,
    pub i_xattr_nid: u32,
    pub i_flags: u32,
    pub i_pino: u32,
    pub i_namelen: u32,
    pub i_name: [u8; F2FS_NAME_LEN],
    pub i_dir_level: u8,
    pub i_ext: F2fsExtent,
}

#[derive(Debug, Clone, Copy, Default, IntoBytes, FromBytes, KnownLayout, Immutable)]
#[repr(C, packed)]
pub struct NodeFooter {
    pub nid: u32,
    pub ino: u32,
    /// ofs << 3 | dent << 2 | fsync << 1 | cold
    pub flag: u32,
    pub cp_ver: u64,
    pub next_blkaddr: u32,
}

/// A node block. Direct and indirect nodes reuse the inode header bytes as
/// the start of their address/nid arrays.
#[derive(Debug, Clone, Copy, IntoBytes, FromBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct F2fsNode {
    pub i: F2fsInode,
    pub tail: [u8; NODE_FOOTER_OFFSET - OFFSET_OF_END_OF_I_EXT],
    pub footer: NodeFooter,
}

/// What a node block is expected to be at a given position of the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Inode,
    Direct,
    Indirect,
    DoubleIndirect,
    Xattr,
}

impl NodeKind {
    /// Kind of the child behind `i_nid[slot]`.
    pub fn of_inode_slot(slot: usize) -> Self {
        match slot {
            0 | 1 => NodeKind::Direct,
            2 | 3 => NodeKind::Indirect,
            _ => NodeKind::DoubleIndirect,
        }
    }
}

#[inline]
fn rd32(b: &[u8], ofs: usize) -> u32 {
    u32::from_le_bytes([b[ofs], b[ofs + 1], b[ofs + 2], b[ofs + 3]])
}

#[inline]
fn wr32(b: &mut [u8], ofs: usize, v: u32) {
    b[ofs..ofs + 4].copy_from_slice(&v.to_le_bytes());
}

#[inline]
fn rd16(b: &[u8], ofs: usize) -> u16 {
    u16::from_le_bytes([b[ofs], b[ofs + 1]])
}

impl Default for F2fsNode {
    fn default() -> Self {
        Self::new_zeroed()
    }
}

impl F2fsNode {
    pub fn new_boxed() -> alloc::boxed::Box<Self> {
        alloc::boxed::Box::new(Self::new_zeroed())
    }

    // === footer ===

    #[inline]
    pub fn nid(&self) -> u32 {
        self.footer.nid
    }

    #[inline]
    pub fn ino(&self) -> u32 {
        self.footer.ino
    }

    #[inline]
    pub fn is_inode(&self) -> bool {
        self.footer.nid == self.footer.ino
    }

    #[inline]
    pub fn ofs_of_node(&self) -> u32 {
        self.footer.flag >> OFFSET_BIT_SHIFT
    }

    #[inline]
    pub fn is_dent(&self) -> bool {
        self.footer.flag & (1 << DENT_BIT_SHIFT) != 0
    }

    #[inline]
    pub fn is_fsync(&self) -> bool {
        self.footer.flag & (1 << FSYNC_BIT_SHIFT) != 0
    }

    #[inline]
    pub fn is_cold(&self) -> bool {
        self.footer.flag & (1 << COLD_BIT_SHIFT) != 0
    }

    #[inline]
    pub fn next_blkaddr(&self) -> u32 {
        self.footer.next_blkaddr
    }

    /// Fills the footer the way a fresh node is written.
    pub fn fill_footer(&mut self, nid: u32, ino: u32, ofs: u32) {
        self.footer.nid = nid;
        self.footer.ino = ino;
        self.footer.flag = ofs << OFFSET_BIT_SHIFT;
    }

    // === extra attributes ===

    #[inline]
    pub fn has_extra_attr(&self) -> bool {
        self.i.i_inline & F2FS_EXTRA_ATTR != 0
    }

    #[inline]
    pub fn i_extra_isize(&self) -> u16 {
        rd16(self.as_bytes(), F2FS_EXTRA_ISIZE_OFFSET)
    }

    #[inline]
    pub fn set_i_extra_isize(&mut self, v: u16) {
        self.as_mut_bytes()[F2FS_EXTRA_ISIZE_OFFSET..F2FS_EXTRA_ISIZE_OFFSET + 2]
            .copy_from_slice(&v.to_le_bytes());
    }

    /// Extra attribute size in words, 0 without `F2FS_EXTRA_ATTR`.
    #[inline]
    pub fn extra_isize(&self) -> usize {
        if self.has_extra_attr() {
            self.i_extra_isize() as usize / 4
        } else {
            0
        }
    }

    #[inline]
    pub fn i_inline_xattr_size(&self) -> u16 {
        rd16(self.as_bytes(), I_INLINE_XATTR_SIZE_OFFSET)
    }

    #[inline]
    pub fn set_i_inline_xattr_size(&mut self, v: u16) {
        self.as_mut_bytes()[I_INLINE_XATTR_SIZE_OFFSET..I_INLINE_XATTR_SIZE_OFFSET + 2]
            .copy_from_slice(&v.to_le_bytes());
    }

    #[inline]
    pub fn i_projid(&self) -> u32 {
        rd32(self.as_bytes(), I_PROJID_OFFSET)
    }

    #[inline]
    pub fn i_inode_checksum(&self) -> u32 {
        rd32(self.as_bytes(), I_INODE_CHECKSUM_OFFSET)
    }

    #[inline]
    pub fn set_i_inode_checksum(&mut self, v: u32) {
        wr32(self.as_mut_bytes(), I_INODE_CHECKSUM_OFFSET, v)
    }

    pub fn i_compr_blocks(&self) -> u64 {
        let b = self.as_bytes();
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&b[I_COMPR_BLOCKS_OFFSET..I_COMPR_BLOCKS_OFFSET + 8]);
        u64::from_le_bytes(raw)
    }

    pub fn set_i_compr_blocks(&mut self, v: u64) {
        self.as_mut_bytes()[I_COMPR_BLOCKS_OFFSET..I_COMPR_BLOCKS_OFFSET + 8]
            .copy_from_slice(&v.to_le_bytes());
    }

    #[inline]
    pub fn i_compress_algorithm(&self) -> u8 {
        self.as_bytes()[I_COMPRESS_ALGORITHM_OFFSET]
    }

    #[inline]
    pub fn i_log_cluster_size(&self) -> u8 {
        self.as_bytes()[I_LOG_CLUSTER_SIZE_OFFSET]
    }

    #[inline]
    pub fn i_gc_failures(&self) -> u16 {
        (self.i.i_current_depth & 0xFFFF) as u16
    }

    pub fn set_i_gc_failures(&mut self, v: u16) {
        self.i.i_current_depth = (self.i.i_current_depth & 0xFFFF_0000) | v as u32;
    }

    // === address layout ===

    /// Words reserved for inline xattrs at the end of `i_addr`.
    pub fn inline_xattr_addrs(&self, flexible: bool) -> usize {
        if flexible {
            self.i_inline_xattr_size() as usize
        } else if self.i.i_inline & (F2FS_INLINE_XATTR | F2FS_INLINE_DENTRY) != 0 {
            DEFAULT_INLINE_XATTR_ADDRS
        } else {
            0
        }
    }

    #[inline]
    pub fn is_compressed_reg(&self) -> bool {
        self.i.i_mode & S_IFMT == S_IFREG && self.i.i_flags & F2FS_COMPR_FL != 0
    }

    fn align_cluster(&self, addrs: usize) -> usize {
        if !self.is_compressed_reg() {
            return addrs;
        }
        let cluster = 1usize << self.i_log_cluster_size().min(MAX_COMPRESS_LOG_SIZE);
        addrs / cluster * cluster
    }

    /// Data addresses held by the inode itself.
    pub fn addrs_per_inode(&self, flexible: bool) -> usize {
        let used = self.extra_isize() + self.inline_xattr_addrs(flexible);
        self.align_cluster(DEF_ADDRS_PER_INODE.saturating_sub(used))
    }

    /// Data addresses per direct node of this inode.
    pub fn addrs_per_block(&self) -> usize {
        self.align_cluster(DEF_ADDRS_PER_BLOCK)
    }

    /// Raw `i_addr[idx]`, counting the extra attribute words.
    #[inline]
    pub fn i_addr(&self, idx: usize) -> u32 {
        rd32(self.as_bytes(), OFFSET_OF_END_OF_I_EXT + idx * 4)
    }

    #[inline]
    pub fn set_i_addr(&mut self, idx: usize, v: u32) {
        wr32(self.as_mut_bytes(), OFFSET_OF_END_OF_I_EXT + idx * 4, v)
    }

    /// `i_nid[slot]`, slot in 0..5.
    #[inline]
    pub fn i_nid(&self, slot: usize) -> u32 {
        rd32(self.as_bytes(), I_NID_OFFSET + slot * 4)
    }

    #[inline]
    pub fn set_i_nid(&mut self, slot: usize, v: u32) {
        wr32(self.as_mut_bytes(), I_NID_OFFSET + slot * 4, v)
    }

    /// Entry `idx` of a direct (address) or indirect (nid) node.
    #[inline]
    pub fn dn_entry(&self, idx: usize) -> u32 {
        rd32(self.as_bytes(), idx * 4)
    }

    #[inline]
    pub fn set_dn_entry(&mut self, idx: usize, v: u32) {
        wr32(self.as_mut_bytes(), idx * 4, v)
    }

    /// Data address at `ofs_in_node`, as the summary entry would name it.
    pub fn data_blkaddr(&self, ofs_in_node: usize) -> Option<u32> {
        if self.is_inode() {
            let idx = self.extra_isize() + ofs_in_node;
            (idx < DEF_ADDRS_PER_INODE).then(|| self.i_addr(idx))
        } else {
            (ofs_in_node < DEF_ADDRS_PER_BLOCK).then(|| self.dn_entry(ofs_in_node))
        }
    }

    // === inline areas ===

    /// Byte offset of inline data / inline dentries.
    #[inline]
    pub fn inline_data_offset(&self) -> usize {
        OFFSET_OF_END_OF_I_EXT + 4 * (self.extra_isize() + DEF_INLINE_RESERVED_SIZE)
    }

    pub fn max_inline_data(&self, flexible: bool) -> usize {
        4 * DEF_ADDRS_PER_INODE
            .saturating_sub(self.inline_xattr_addrs(flexible))
            .saturating_sub(self.extra_isize())
            .saturating_sub(DEF_INLINE_RESERVED_SIZE)
    }

    pub fn inline_data(&self, flexible: bool) -> &[u8] {
        let start = self.inline_data_offset();
        let end = (start + self.max_inline_data(flexible)).min(I_NID_OFFSET);
        &self.as_bytes()[start.min(end)..end]
    }

    /// Byte offset of the inline xattr area.
    pub fn inline_xattr_offset(&self, flexible: bool) -> usize {
        let words = DEF_ADDRS_PER_INODE.saturating_sub(self.inline_xattr_addrs(flexible));
        OFFSET_OF_END_OF_I_EXT + 4 * words
    }

    /// Name recorded for recovery (`i_name[..i_namelen]`).
    pub fn name(&self) -> &[u8] {
        let len = (self.i.i_namelen as usize).min(F2FS_NAME_LEN);
        &self.as_bytes()[92..92 + len]
    }
}

/// First file block index covered by the node at offset `node_ofs`.
pub fn start_bidx_of_node(node_ofs: u32, inode: &F2fsNode, flexible: bool) -> u64 {
    let nids = NIDS_PER_BLOCK as u32;
    let indirect_blks = 2 * nids + 4;
    if node_ofs == 0 {
        return 0;
    }
    let bidx = if node_ofs <= 2 {
        node_ofs - 1
    } else if node_ofs <= indirect_blks {
        let dec = (node_ofs - 4) / (nids + 1);
        node_ofs - 2 - dec
    } else {
        let dec = (node_ofs - indirect_blks - 3) / (nids + 1);
        node_ofs - 5 - dec
    };
    bidx as u64 * inode.addrs_per_block() as u64 + inode.addrs_per_inode(flexible) as u64
}

/// File type derived from a mode, as stored in dentries.
pub fn file_type_of_mode(mode: u16) -> u8 {
    match mode & S_IFMT {
        S_IFREG => F2FS_FT_REG_FILE,
        S_IFDIR => F2FS_FT_DIR,
        S_IFCHR => F2FS_FT_CHRDEV,
        S_IFBLK => F2FS_FT_BLKDEV,
        S_IFIFO => F2FS_FT_FIFO,
        S_IFSOCK => F2FS_FT_SOCK,
        S_IFLNK => F2FS_FT_SYMLINK,
        _ => F2FS_FT_UNKNOWN,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::mem::{offset_of, size_of};

    #[test]
    fn layout() {
        assert_eq!(size_of::<F2fsInode>(), OFFSET_OF_END_OF_I_EXT);
        assert_eq!(size_of::<NodeFooter>(), NODE_FOOTER_SIZE);
        assert_eq!(size_of::<F2fsNode>(), F2FS_BLKSIZE);
        assert_eq!(offset_of!(F2fsInode, i_generation), 68);
        assert_eq!(offset_of!(F2fsInode, i_name), 92);
        assert_eq!(I_NID_OFFSET + 20, NODE_FOOTER_OFFSET);
    }

    #[test]
    fn addrs_shrink_with_extra_and_xattr() {
        let mut n = F2fsNode::default();
        n.i.i_mode = S_IFREG | 0o644;
        assert_eq!(n.addrs_per_inode(false), DEF_ADDRS_PER_INODE);

        n.i.i_inline = F2FS_EXTRA_ATTR | F2FS_INLINE_XATTR;
        n.set_i_extra_isize(F2FS_TOTAL_EXTRA_ATTR_SIZE as u16);
        assert_eq!(n.addrs_per_inode(false), DEF_ADDRS_PER_INODE - 9 - 50);

        n.set_i_inline_xattr_size(10);
        assert_eq!(n.addrs_per_inode(true), DEF_ADDRS_PER_INODE - 9 - 10);
    }

    #[test]
    fn start_bidx() {
        let n = F2fsNode::default();
        assert_eq!(start_bidx_of_node(0, &n, false), 0);
        assert_eq!(start_bidx_of_node(1, &n, false), 923);
        assert_eq!(start_bidx_of_node(2, &n, false), 923 + 1018);
        // first direct node under the first indirect node
        assert_eq!(start_bidx_of_node(4, &n, false), 923 + 2 * 1018);
    }

    #[test]
    fn data_addr_respects_extra() {
        let mut n = F2fsNode::default();
        n.fill_footer(5, 5, 0);
        n.i.i_inline = F2FS_EXTRA_ATTR;
        n.set_i_extra_isize(36);
        n.set_i_addr(9, 0xABCD);
        assert_eq!(n.data_blkaddr(0), Some(0xABCD));

        let mut d = F2fsNode::default();
        d.fill_footer(6, 5, 1);
        d.set_dn_entry(3, 77);
        assert_eq!(d.data_blkaddr(3), Some(77));
        assert_eq!(d.data_blkaddr(DEF_ADDRS_PER_BLOCK), None);
    }
}
