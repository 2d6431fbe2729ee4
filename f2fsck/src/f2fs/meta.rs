// SPDX-License-Identifier: MIT

use crate::f2fs::{constant::*, crc::chksum_seed, types::F2fsSuperBlock};

/// Geometry derived once from a validated superblock.
#[derive(Debug, Clone)]
pub struct F2fsMeta {
    pub block_count: u64,
    pub segment0_blkaddr: u32,
    pub cp_blkaddr: u32,
    pub sit_blkaddr: u32,
    pub nat_blkaddr: u32,
    pub ssa_blkaddr: u32,
    pub main_blkaddr: u32,
    pub segment_count: u32,
    pub segment_count_sit: u32,
    pub segment_count_nat: u32,
    pub main_segments: u32,
    pub segs_per_sec: u32,
    pub secs_per_zone: u32,
    pub total_sections: u32,
    pub root_ino: u32,
    pub node_ino: u32,
    pub meta_ino: u32,
    pub feature: u32,
    pub cp_payload: u32,
    pub chksum_seed: u32,
}

impl F2fsMeta {
    pub fn from_sb(sb: &F2fsSuperBlock) -> Self {
        let seed = if sb.has_feature(F2FS_FEATURE_INODE_CHKSUM) {
            chksum_seed(&sb.uuid)
        } else {
            0
        };
        Self {
            block_count: sb.block_count,
            segment0_blkaddr: sb.segment0_blkaddr,
            cp_blkaddr: sb.cp_blkaddr,
            sit_blkaddr: sb.sit_blkaddr,
            nat_blkaddr: sb.nat_blkaddr,
            ssa_blkaddr: sb.ssa_blkaddr,
            main_blkaddr: sb.main_blkaddr,
            segment_count: sb.segment_count,
            segment_count_sit: sb.segment_count_sit,
            segment_count_nat: sb.segment_count_nat,
            main_segments: sb.segment_count_main,
            segs_per_sec: sb.segs_per_sec.max(1),
            secs_per_zone: sb.secs_per_zone.max(1),
            total_sections: sb.section_count,
            root_ino: sb.root_ino,
            node_ino: sb.node_ino,
            meta_ino: sb.meta_ino,
            feature: sb.feature,
            cp_payload: sb.cp_payload,
            chksum_seed: seed,
        }
    }

    #[inline]
    pub fn has_feature(&self, mask: u32) -> bool {
        self.feature & mask != 0
    }

    #[inline]
    pub fn flexible_inline_xattr(&self) -> bool {
        self.has_feature(F2FS_FEATURE_FLEXIBLE_INLINE_XATTR)
    }

    #[inline]
    pub fn readonly(&self) -> bool {
        self.has_feature(F2FS_FEATURE_RO)
    }

    // === main area ===

    /// Main-area blocks, the size of the checker's main bitmap.
    #[inline]
    pub fn main_blocks(&self) -> u64 {
        (self.main_segments as u64) << LOG_BLOCKS_PER_SEG
    }

    /// One past the last addressable block.
    #[inline]
    pub fn max_blkaddr(&self) -> u32 {
        self.segment0_blkaddr + (self.segment_count << LOG_BLOCKS_PER_SEG)
    }

    /// End of the main area as declared by `segment_count_main`.
    #[inline]
    pub fn end_blkaddr(&self) -> u32 {
        self.main_blkaddr + (self.main_segments << LOG_BLOCKS_PER_SEG)
    }

    /// True for block addresses inside the main area.
    #[inline]
    pub fn is_valid_blkaddr(&self, blkaddr: u32) -> bool {
        blkaddr >= self.main_blkaddr && blkaddr < self.max_blkaddr()
    }

    #[inline]
    pub fn segno(&self, blkaddr: u32) -> u32 {
        (blkaddr - self.main_blkaddr) >> LOG_BLOCKS_PER_SEG
    }

    #[inline]
    pub fn blkoff(&self, blkaddr: u32) -> u32 {
        (blkaddr - self.main_blkaddr) & (BLOCKS_PER_SEG - 1)
    }

    /// Bit index of `blkaddr` in the main bitmap.
    #[inline]
    pub fn main_offset(&self, blkaddr: u32) -> usize {
        (blkaddr - self.main_blkaddr) as usize
    }

    #[inline]
    pub fn start_block(&self, segno: u32) -> u32 {
        self.main_blkaddr + (segno << LOG_BLOCKS_PER_SEG)
    }

    /// SSA block holding the summary of `segno`.
    #[inline]
    pub fn sum_blkaddr(&self, segno: u32) -> u32 {
        self.ssa_blkaddr + segno
    }

    #[inline]
    pub fn sec_of(&self, segno: u32) -> u32 {
        segno / self.segs_per_sec
    }

    #[inline]
    pub fn zone_of(&self, segno: u32) -> u32 {
        segno / self.segs_per_sec / self.secs_per_zone
    }

    #[inline]
    pub fn blocks_per_sec(&self) -> u32 {
        self.segs_per_sec * BLOCKS_PER_SEG
    }

    // === NAT / SIT ===

    /// NAT blocks in one half of the area.
    #[inline]
    pub fn nat_blocks(&self) -> u32 {
        (self.segment_count_nat >> 1) << LOG_BLOCKS_PER_SEG
    }

    #[inline]
    pub fn max_nid(&self) -> u32 {
        NAT_ENTRY_PER_BLOCK as u32 * self.nat_blocks()
    }

    /// Upper bound used to reject obviously bogus node ids.
    #[inline]
    pub fn is_valid_nid(&self, nid: u32) -> bool {
        (nid as u64)
            < (NAT_ENTRY_PER_BLOCK as u64 * self.segment_count_nat as u64) << (LOG_BLOCKS_PER_SEG - 1)
    }

    /// SIT blocks in one half of the area.
    #[inline]
    pub fn sit_blocks(&self) -> u32 {
        (self.segment_count_sit >> 1) << LOG_BLOCKS_PER_SEG
    }

    #[inline]
    pub fn sit_ver_bitmap_bytes(&self) -> u32 {
        self.sit_blocks() / 8
    }

    #[inline]
    pub fn nat_ver_bitmap_bytes(&self) -> u32 {
        self.nat_blocks() / 8
    }

    /// Reserved inodes that never appear in the tree.
    #[inline]
    pub fn is_meta_ino(&self, ino: u32) -> bool {
        ino == self.node_ino || ino == self.meta_ino
    }
}

/// True for addresses naming a real block (not hole, NEW or COMPRESS).
#[inline]
pub fn is_valid_data_blkaddr(blkaddr: u32) -> bool {
    !matches!(blkaddr, NULL_ADDR | NEW_ADDR | COMPRESS_ADDR)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> F2fsMeta {
        let mut sb = F2fsSuperBlock::default();
        sb.segment0_blkaddr = 512;
        sb.cp_blkaddr = 512;
        sb.sit_blkaddr = 1536;
        sb.nat_blkaddr = 2560;
        sb.ssa_blkaddr = 3584;
        sb.main_blkaddr = 4096;
        sb.segment_count = 24;
        sb.segment_count_sit = 2;
        sb.segment_count_nat = 2;
        sb.segment_count_main = 16;
        F2fsMeta::from_sb(&sb)
    }

    #[test]
    fn main_area_arithmetic() {
        let m = sample();
        assert_eq!(m.max_blkaddr(), 512 + 24 * 512);
        assert_eq!(m.end_blkaddr(), 4096 + 16 * 512);
        assert_eq!(m.segno(4096 + 513), 1);
        assert_eq!(m.blkoff(4096 + 513), 1);
        assert_eq!(m.start_block(2), 4096 + 1024);
        assert!(!m.is_valid_blkaddr(4095));
        assert!(m.is_valid_blkaddr(4096));
    }

    #[test]
    fn nat_sizes() {
        let m = sample();
        assert_eq!(m.nat_blocks(), 512);
        assert_eq!(m.max_nid(), 455 * 512);
        assert!(m.is_valid_nid(455 * 512 - 1));
        assert!(!m.is_valid_nid(455 * 512));
        assert_eq!(m.sit_ver_bitmap_bytes(), 64);
    }

    #[test]
    fn data_addr_markers() {
        assert!(!is_valid_data_blkaddr(NULL_ADDR));
        assert!(!is_valid_data_blkaddr(NEW_ADDR));
        assert!(!is_valid_data_blkaddr(COMPRESS_ADDR));
        assert!(is_valid_data_blkaddr(4096));
    }
}
