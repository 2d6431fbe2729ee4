// SPDX-License-Identifier: MIT
//! F2FS superblock structure

use zerocopy::{FromBytes, FromZeros, Immutable, IntoBytes, KnownLayout};

use crate::f2fs::constant::*;

/// One entry of the multi-device list.
#[derive(Debug, Clone, Copy, IntoBytes, FromBytes, KnownLayout, Immutable)]
#[repr(C, packed)]
pub struct F2fsDevice {
    pub path: [u8; MAX_PATH_LEN],
    pub total_segments: u32,
}

/// F2FS superblock (3072 bytes, stored at byte 1024 of blocks 0 and 1).
#[derive(Debug, Clone, Copy, IntoBytes, FromBytes, KnownLayout, Immutable)]
#[repr(C, packed)]
pub struct F2fsSuperBlock {
    // 0x00
    pub magic: u32,
    pub major_ver: u16,
    pub minor_ver: u16,
    /// log2 sector size in bytes
    pub log_sectorsize: u32,
    pub log_sectors_per_block: u32,
    /// log2 block size in bytes
    pub log_blocksize: u32,
    pub log_blocks_per_seg: u32,
    pub segs_per_sec: u32,
    pub secs_per_zone: u32,
    /// Checksum offset inside the superblock
    pub checksum_offset: u32,
    /// Total # of user blocks
    pub block_count: u64,
    pub section_count: u32,
    pub segment_count: u32,
    pub segment_count_ckpt: u32,
    pub segment_count_sit: u32,
    pub segment_count_nat: u32,
    pub segment_count_ssa: u32,
    pub segment_count_main: u32,
    // Area start addresses
    pub segment0_blkaddr: u32,
    pub cp_blkaddr: u32,
    pub sit_blkaddr: u32,
    pub nat_blkaddr: u32,
    pub ssa_blkaddr: u32,
    pub main_blkaddr: u32,
    pub root_ino: u32,
    pub node_ino: u32,
    pub meta_ino: u32,
    pub uuid: [u8; 16],
    /// UTF-16LE volume name
    pub volume_name: [u8; MAX_VOLUME_NAME * 2],
    pub extension_count: u32,
    pub extension_list: [[u8; F2FS_EXTENSION_LEN]; F2FS_MAX_EXTENSION],
    pub cp_payload: u32,
    pub version: [u8; VERSION_LEN],
    pub init_version: [u8; VERSION_LEN],
    pub feature: u32,
    pub encryption_level: u8,
    pub encrypt_pw_salt: [u8; 16],
    pub devs: [F2fsDevice; MAX_DEVICES],
    pub qf_ino: [u32; F2FS_MAX_QUOTAS],
    pub hot_ext_count: u8,
    pub s_encoding: u16,
    pub s_encoding_flags: u16,
    pub s_stop_reason: [u8; MAX_STOP_REASON],
    pub s_errors: [u8; MAX_F2FS_ERRORS],
    pub reserved: [u8; 258],
    pub crc: u32,
}

impl Default for F2fsSuperBlock {
    fn default() -> Self {
        let mut sb = Self::new_zeroed();
        sb.magic = F2FS_SUPER_MAGIC;
        sb.major_ver = 1;
        sb.minor_ver = 16;
        sb.log_sectorsize = 9;
        sb.log_sectors_per_block = 3;
        sb.log_blocksize = F2FS_BLKSIZE_BITS;
        sb.log_blocks_per_seg = LOG_BLOCKS_PER_SEG;
        sb.segs_per_sec = 1;
        sb.secs_per_zone = 1;
        sb.root_ino = F2FS_ROOT_INO;
        sb.node_ino = F2FS_NODE_INO;
        sb.meta_ino = F2FS_META_INO;
        sb
    }
}

impl F2fsSuperBlock {
    #[inline]
    pub fn has_feature(&self, mask: u32) -> bool {
        self.feature & mask != 0
    }

    /// Quota inode of `qtype`, 0 if none.
    #[inline]
    pub fn quota_ino(&self, qtype: usize) -> u32 {
        let q = self.qf_ino;
        q.get(qtype).copied().unwrap_or(0)
    }

    /// Recomputes `crc` when the image carries superblock checksums.
    pub fn update_crc(&mut self) {
        if self.has_feature(F2FS_FEATURE_SB_CHKSUM) {
            let crc = crate::f2fs::crc::superblock_chksum(self.as_bytes(), F2FS_SB_CHKSUM_OFFSET);
            self.crc = crc;
        }
    }

    /// True when the kernel recorded a stop reason or a corruption.
    pub fn has_error_marks(&self) -> bool {
        let stop = self.s_stop_reason;
        let errs = self.s_errors;
        stop.iter().chain(errs.iter()).any(|&b| b != 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::mem::{offset_of, size_of};

    #[test]
    fn layout_matches_disk() {
        assert_eq!(size_of::<F2fsSuperBlock>(), F2FS_SUPERBLOCK_SIZE);
        assert_eq!(offset_of!(F2fsSuperBlock, block_count), 36);
        assert_eq!(offset_of!(F2fsSuperBlock, uuid), 108);
        assert_eq!(offset_of!(F2fsSuperBlock, cp_payload), 1664);
        assert_eq!(offset_of!(F2fsSuperBlock, feature), 2180);
        assert_eq!(offset_of!(F2fsSuperBlock, qf_ino), 2745);
        assert_eq!(offset_of!(F2fsSuperBlock, crc), F2FS_SB_CHKSUM_OFFSET);
    }

    #[test]
    fn crc_only_with_feature() {
        let mut sb = F2fsSuperBlock::default();
        sb.update_crc();
        assert_eq!({ sb.crc }, 0);
        sb.feature = F2FS_FEATURE_SB_CHKSUM;
        sb.update_crc();
        assert_ne!({ sb.crc }, 0);
    }
}
