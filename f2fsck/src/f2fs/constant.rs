// SPDX-License-Identifier: MIT
// f2fsck/f2fs/constant.rs

// === Superblock ===

pub const F2FS_SUPER_MAGIC: u32 = 0xF2F5_2010;

// Byte offset of each copy inside its block
pub const F2FS_SUPER_OFFSET: u64 = 1024;
pub const F2FS_SUPERBLOCK_SIZE: usize = 3072;

// Checksum position when SB_CHKSUM is set
pub const F2FS_SB_CHKSUM_OFFSET: usize = 3068;

pub const F2FS_MAX_EXTENSION: usize = 64;
pub const F2FS_EXTENSION_LEN: usize = 8;
pub const MAX_VOLUME_NAME: usize = 512;
pub const VERSION_LEN: usize = 256;
pub const MAX_DEVICES: usize = 8;
pub const MAX_PATH_LEN: usize = 64;
pub const F2FS_MAX_QUOTAS: usize = 3;
pub const MAX_STOP_REASON: usize = 32;
pub const MAX_F2FS_ERRORS: usize = 16;

// === Geometry ===

pub const F2FS_BLKSIZE: usize = 4096;
pub const F2FS_BLKSIZE_BITS: u32 = 12;
pub const F2FS_MIN_LOG_SECTOR_SIZE: u32 = 9;
pub const F2FS_MAX_LOG_SECTOR_SIZE: u32 = 12;

pub const LOG_BLOCKS_PER_SEG: u32 = 9;
pub const BLOCKS_PER_SEG: u32 = 1 << LOG_BLOCKS_PER_SEG;

pub const F2FS_MIN_SEGMENTS: u32 = 9;
// Minimum metadata segments a checkpoint may declare
pub const F2FS_MIN_SEGMENT: u32 = 8;
pub const F2FS_MAX_SEGMENT: u32 = (16 * 1024 * 1024) / 2;

// === Reserved inodes ===

pub const F2FS_NODE_INO: u32 = 1;
pub const F2FS_META_INO: u32 = 2;
pub const F2FS_ROOT_INO: u32 = 3;

// === Features (sb.feature) ===

pub const F2FS_FEATURE_ENCRYPT: u32 = 0x0001;
pub const F2FS_FEATURE_BLKZONED: u32 = 0x0002;
pub const F2FS_FEATURE_ATOMIC_WRITE: u32 = 0x0004;
pub const F2FS_FEATURE_EXTRA_ATTR: u32 = 0x0008;
pub const F2FS_FEATURE_PRJQUOTA: u32 = 0x0010;
pub const F2FS_FEATURE_INODE_CHKSUM: u32 = 0x0020;
pub const F2FS_FEATURE_FLEXIBLE_INLINE_XATTR: u32 = 0x0040;
pub const F2FS_FEATURE_QUOTA_INO: u32 = 0x0080;
pub const F2FS_FEATURE_INODE_CRTIME: u32 = 0x0100;
pub const F2FS_FEATURE_LOST_FOUND: u32 = 0x0200;
pub const F2FS_FEATURE_VERITY: u32 = 0x0400;
pub const F2FS_FEATURE_SB_CHKSUM: u32 = 0x0800;
pub const F2FS_FEATURE_CASEFOLD: u32 = 0x1000;
pub const F2FS_FEATURE_COMPRESSION: u32 = 0x2000;
pub const F2FS_FEATURE_RO: u32 = 0x4000;
pub const F2FS_FEATURE_DEVICE_ALIAS: u32 = 0x8000;

// === Checkpoint ===

pub const CP_RESIZEFS_FLAG: u32 = 0x0000_4000;
pub const CP_DISABLED_FLAG: u32 = 0x0000_1000;
pub const CP_QUOTA_NEED_FSCK_FLAG: u32 = 0x0000_0800;
pub const CP_LARGE_NAT_BITMAP_FLAG: u32 = 0x0000_0400;
pub const CP_NOCRC_RECOVERY_FLAG: u32 = 0x0000_0200;
pub const CP_TRIMMED_FLAG: u32 = 0x0000_0100;
pub const CP_NAT_BITS_FLAG: u32 = 0x0000_0080;
pub const CP_CRC_RECOVERY_FLAG: u32 = 0x0000_0040;
pub const CP_FASTBOOT_FLAG: u32 = 0x0000_0020;
pub const CP_FSCK_FLAG: u32 = 0x0000_0010;
pub const CP_ERROR_FLAG: u32 = 0x0000_0008;
pub const CP_COMPACT_SUM_FLAG: u32 = 0x0000_0004;
pub const CP_ORPHAN_PRESENT_FLAG: u32 = 0x0000_0002;
pub const CP_UMOUNT_FLAG: u32 = 0x0000_0001;

// Header size; the version bitmaps start here
pub const CP_BITMAP_OFFSET: usize = 192;
pub const CP_MIN_CHKSUM_OFFSET: usize = CP_BITMAP_OFFSET;
pub const CP_CHKSUM_OFFSET: usize = 4092;

pub const MAX_ACTIVE_LOGS: usize = 16;
pub const MAX_ACTIVE_NODE_LOGS: usize = 8;
pub const MAX_ACTIVE_DATA_LOGS: usize = 8;

// Blocks in a pack besides payload and orphans: cp, 3 data sums, 3 node sums, trailer
pub const CP_PACK_FIXED_BLOCKS: u32 = 8;
pub const F2FS_CP_PACKS: u32 = 2;

// === Orphans ===

pub const F2FS_ORPHANS_PER_BLOCK: usize = (F2FS_BLKSIZE - 4 * 4) / 4;

// === Logs / cursegs ===

pub const CURSEG_HOT_DATA: usize = 0;
pub const CURSEG_WARM_DATA: usize = 1;
pub const CURSEG_COLD_DATA: usize = 2;
pub const CURSEG_HOT_NODE: usize = 3;
pub const CURSEG_WARM_NODE: usize = 4;
pub const CURSEG_COLD_NODE: usize = 5;
pub const NR_CURSEG_TYPE: usize = 6;
pub const NR_CURSEG_DATA_TYPE: usize = 3;
pub const NR_CURSEG_NODE_TYPE: usize = 3;
pub const NULL_SEGNO: u32 = u32::MAX;
pub const NO_CHECK_TYPE: u8 = 6;

// Allocation modes
pub const LFS: u8 = 0;
pub const SSR: u8 = 1;

// === Node ===

pub const DEF_ADDRS_PER_INODE: usize = 923;
pub const DEF_ADDRS_PER_BLOCK: usize = 1018;
pub const NIDS_PER_BLOCK: usize = 1018;
pub const NIDS_PER_INODE: usize = 5;
pub const NODE_FOOTER_SIZE: usize = 24;

// Byte offsets inside a node block
pub const OFFSET_OF_END_OF_I_EXT: usize = 360;
pub const I_NID_OFFSET: usize = OFFSET_OF_END_OF_I_EXT + DEF_ADDRS_PER_INODE * 4;
pub const NODE_FOOTER_OFFSET: usize = F2FS_BLKSIZE - NODE_FOOTER_SIZE;

// Extra attribute overlay (starts at i_addr[0])
pub const F2FS_EXTRA_ISIZE_OFFSET: usize = 360;
pub const I_INLINE_XATTR_SIZE_OFFSET: usize = 362;
pub const I_PROJID_OFFSET: usize = 364;
pub const I_INODE_CHECKSUM_OFFSET: usize = 368;
pub const I_CRTIME_OFFSET: usize = 372;
pub const I_COMPR_BLOCKS_OFFSET: usize = 384;
pub const I_COMPRESS_ALGORITHM_OFFSET: usize = 392;
pub const I_LOG_CLUSTER_SIZE_OFFSET: usize = 393;
pub const I_COMPRESS_FLAG_OFFSET: usize = 394;
pub const F2FS_TOTAL_EXTRA_ATTR_SIZE: usize = 36;

pub const NODE_DIR1_BLOCK: u32 = DEF_ADDRS_PER_INODE as u32 + 1;
pub const NODE_DIR2_BLOCK: u32 = DEF_ADDRS_PER_INODE as u32 + 2;
pub const NODE_IND1_BLOCK: u32 = DEF_ADDRS_PER_INODE as u32 + 3;
pub const NODE_IND2_BLOCK: u32 = DEF_ADDRS_PER_INODE as u32 + 4;
pub const NODE_DIND_BLOCK: u32 = DEF_ADDRS_PER_INODE as u32 + 5;

// Footer flag bits
pub const COLD_BIT_SHIFT: u32 = 0;
pub const FSYNC_BIT_SHIFT: u32 = 1;
pub const DENT_BIT_SHIFT: u32 = 2;
pub const OFFSET_BIT_SHIFT: u32 = 3;
pub const XATTR_NODE_OFFSET: u32 = (u32::MAX << OFFSET_BIT_SHIFT) >> OFFSET_BIT_SHIFT;

// Special block addresses
pub const NULL_ADDR: u32 = 0;
pub const NEW_ADDR: u32 = 0xFFFF_FFFF;
pub const COMPRESS_ADDR: u32 = 0xFFFF_FFFE;

// i_inline flags
pub const F2FS_INLINE_XATTR: u8 = 0x01;
pub const F2FS_INLINE_DATA: u8 = 0x02;
pub const F2FS_INLINE_DENTRY: u8 = 0x04;
pub const F2FS_DATA_EXIST: u8 = 0x08;
pub const F2FS_INLINE_DOTS: u8 = 0x10;
pub const F2FS_EXTRA_ATTR: u8 = 0x20;
pub const F2FS_PIN_FILE: u8 = 0x40;
pub const F2FS_COMPRESS_RELEASED: u8 = 0x80;

// i_flags
pub const F2FS_COMPR_FL: u32 = 0x0000_0004;
pub const F2FS_NOCOMP_FL: u32 = 0x0000_0400;
pub const F2FS_CASEFOLD_FL: u32 = 0x4000_0000;

// i_advise
pub const FADVISE_COLD_BIT: u8 = 0x01;
pub const FADVISE_LOST_PINO_BIT: u8 = 0x02;
pub const FADVISE_ENCRYPT_BIT: u8 = 0x04;
pub const FADVISE_ENC_NAME_BIT: u8 = 0x08;

pub const DEFAULT_INLINE_XATTR_ADDRS: usize = 50;
pub const DEF_INLINE_RESERVED_SIZE: usize = 1;
pub const MIN_INLINE_DENTRY_SIZE: usize = 40;
// Bounds of i_inline_xattr_size, in words
pub const MIN_INLINE_XATTR_ADDRS: usize = XATTR_HEADER_SIZE / 4;
pub const MAX_INLINE_XATTR_ADDRS: usize = DEF_ADDRS_PER_INODE
    - F2FS_TOTAL_EXTRA_ATTR_SIZE / 4
    - DEF_INLINE_RESERVED_SIZE
    - MIN_INLINE_DENTRY_SIZE / 4;

// Compression
pub const MIN_COMPRESS_LOG_SIZE: u8 = 2;
pub const MAX_COMPRESS_LOG_SIZE: u8 = 8;
pub const COMPRESS_MAX: u8 = 4;

pub const F2FS_NAME_LEN: usize = 255;

// === NAT / SIT ===

pub const NAT_ENTRY_SIZE: usize = 9;
pub const NAT_ENTRY_PER_BLOCK: usize = F2FS_BLKSIZE / NAT_ENTRY_SIZE;

pub const SIT_VBLOCK_MAP_SIZE: usize = 64;
pub const SIT_ENTRY_SIZE: usize = 74;
pub const SIT_ENTRY_PER_BLOCK: usize = F2FS_BLKSIZE / SIT_ENTRY_SIZE;
pub const SIT_VBLOCKS_SHIFT: u16 = 10;
pub const SIT_VBLOCKS_MASK: u16 = (1 << SIT_VBLOCKS_SHIFT) - 1;

// === Summary ===

pub const ENTRIES_IN_SUM: usize = 512;
pub const SUMMARY_SIZE: usize = 7;
pub const SUM_FOOTER_SIZE: usize = 5;
pub const SUM_ENTRIES_SIZE: usize = SUMMARY_SIZE * ENTRIES_IN_SUM;
pub const SUM_JOURNAL_SIZE: usize = F2FS_BLKSIZE - SUM_FOOTER_SIZE - SUM_ENTRIES_SIZE;
pub const NAT_JOURNAL_ENTRY_SIZE: usize = 13;
pub const SIT_JOURNAL_ENTRY_SIZE: usize = 78;
pub const NAT_JOURNAL_ENTRIES: usize = (SUM_JOURNAL_SIZE - 2) / NAT_JOURNAL_ENTRY_SIZE;
pub const SIT_JOURNAL_ENTRIES: usize = (SUM_JOURNAL_SIZE - 2) / SIT_JOURNAL_ENTRY_SIZE;

pub const SUM_TYPE_DATA: u8 = 0;
pub const SUM_TYPE_NODE: u8 = 1;

// === Directory ===

pub const F2FS_SLOT_LEN: usize = 8;
pub const SIZE_OF_DIR_ENTRY: usize = 11;
pub const NR_DENTRY_IN_BLOCK: usize = (8 * F2FS_BLKSIZE) / ((SIZE_OF_DIR_ENTRY + F2FS_SLOT_LEN) * 8 + 1);
pub const SIZE_OF_DENTRY_BITMAP: usize = NR_DENTRY_IN_BLOCK.div_ceil(8);
pub const SIZE_OF_RESERVED: usize =
    F2FS_BLKSIZE - ((SIZE_OF_DIR_ENTRY + F2FS_SLOT_LEN) * NR_DENTRY_IN_BLOCK + SIZE_OF_DENTRY_BITMAP);
pub const MAX_DIR_HASH_DEPTH: u32 = 63;
pub const MAX_DIR_BUCKETS: u32 = 1 << ((MAX_DIR_HASH_DEPTH / 2) - 1);
pub const F2FS_DOT_HASH: u32 = 0;

// File types
pub const F2FS_FT_UNKNOWN: u8 = 0;
pub const F2FS_FT_REG_FILE: u8 = 1;
pub const F2FS_FT_DIR: u8 = 2;
pub const F2FS_FT_CHRDEV: u8 = 3;
pub const F2FS_FT_BLKDEV: u8 = 4;
pub const F2FS_FT_FIFO: u8 = 5;
pub const F2FS_FT_SOCK: u8 = 6;
pub const F2FS_FT_SYMLINK: u8 = 7;
pub const F2FS_FT_MAX: u8 = 8;
// Checker-only pseudo types
pub const F2FS_FT_ORPHAN: u8 = 9;
pub const F2FS_FT_XATTR: u8 = 10;
pub const F2FS_FT_LAST_FILE_TYPE: u8 = F2FS_FT_XATTR;

// Mode bits
pub const S_IFMT: u16 = 0o170000;
pub const S_IFSOCK: u16 = 0o140000;
pub const S_IFLNK: u16 = 0o120000;
pub const S_IFREG: u16 = 0o100000;
pub const S_IFBLK: u16 = 0o060000;
pub const S_IFDIR: u16 = 0o040000;
pub const S_IFCHR: u16 = 0o020000;
pub const S_IFIFO: u16 = 0o010000;

// === Xattr ===

pub const F2FS_XATTR_MAGIC: u32 = 0xF2F5_2011;
pub const XATTR_HEADER_SIZE: usize = 24;
pub const XATTR_ENTRY_HEADER_SIZE: usize = 4;
pub const VALID_XATTR_BLOCK_SIZE: usize = F2FS_BLKSIZE - NODE_FOOTER_SIZE;

// === Quota ===

pub const QUOTA_USR: usize = 0;
pub const QUOTA_GRP: usize = 1;
pub const QUOTA_PRJ: usize = 2;

// === Lost+found ===

pub const LPF_NAME: &[u8] = b"lost+found";

// === Superblock error reasons ===

pub const ERROR_INCONSISTENT_FOOTER: usize = 6;
