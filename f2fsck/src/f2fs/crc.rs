// SPDX-License-Identifier: MIT

//! F2FS checksums.
//!
//! F2FS uses the reflected CRC-32 polynomial with a caller supplied seed and
//! no final inversion. `crc32fast` inverts on both ends, so the seed and the
//! result are complemented around it.

use crc32fast::Hasher;

use crate::f2fs::constant::*;

/// Raw f2fs CRC of `data` continuing from `seed`.
#[inline]
pub fn f2fs_crc32(seed: u32, data: &[u8]) -> u32 {
    let mut h = Hasher::new_with_initial(!seed);
    h.update(data);
    !h.finalize()
}

#[inline]
pub fn f2fs_crc_valid(expected: u32, data: &[u8]) -> bool {
    f2fs_crc32(F2FS_SUPER_MAGIC, data) == expected
}

/// Superblock checksum over the first `checksum_offset` bytes.
pub fn superblock_chksum(sb: &[u8], checksum_offset: usize) -> u32 {
    f2fs_crc32(F2FS_SUPER_MAGIC, &sb[..checksum_offset.min(sb.len())])
}

/// Checkpoint block checksum. `cp` is the full 4 KiB cp block.
pub fn checkpoint_chksum(cp: &[u8]) -> u32 {
    let ofs = u32::from_le_bytes([cp[164], cp[165], cp[166], cp[167]]) as usize;
    let ofs = ofs.min(CP_CHKSUM_OFFSET);
    let crc = f2fs_crc32(F2FS_SUPER_MAGIC, &cp[..ofs]);
    if ofs < CP_CHKSUM_OFFSET {
        f2fs_crc32(crc, &cp[ofs + 4..F2FS_BLKSIZE])
    } else {
        crc
    }
}

/// Seed for per-inode checksums, derived from the volume uuid.
#[inline]
pub fn chksum_seed(uuid: &[u8; 16]) -> u32 {
    f2fs_crc32(!0, uuid)
}

/// Inode checksum. `node` is the full inode block; the stored checksum
/// field is treated as zero.
pub fn inode_chksum(seed: u32, node: &[u8]) -> u32 {
    let ino = &node[NODE_FOOTER_OFFSET + 4..NODE_FOOTER_OFFSET + 8];
    let gen_ofs = 68;
    let generation = &node[gen_ofs..gen_ofs + 4];

    let crc = f2fs_crc32(seed, ino);
    let crc = f2fs_crc32(crc, generation);
    let crc = f2fs_crc32(crc, &node[..I_INODE_CHECKSUM_OFFSET]);
    let crc = f2fs_crc32(crc, &[0u8; 4]);
    f2fs_crc32(crc, &node[I_INODE_CHECKSUM_OFFSET + 4..F2FS_BLKSIZE])
}

#[cfg(test)]
mod tests {
    use super::*;

    // Bitwise reference of the same polynomial.
    fn reference(mut crc: u32, data: &[u8]) -> u32 {
        for &b in data {
            crc ^= b as u32;
            for _ in 0..8 {
                crc = (crc >> 1) ^ if crc & 1 != 0 { 0xEDB8_8320 } else { 0 };
            }
        }
        crc
    }

    #[test]
    fn matches_bitwise_reference() {
        let data = b"f2fs checkpoint payload";
        assert_eq!(
            f2fs_crc32(F2FS_SUPER_MAGIC, data),
            reference(F2FS_SUPER_MAGIC, data)
        );
        assert_eq!(f2fs_crc32(0, &[]), 0);
    }

    #[test]
    fn chained_equals_whole() {
        let data = [0xA5u8; 100];
        let a = f2fs_crc32(7, &data[..40]);
        assert_eq!(f2fs_crc32(a, &data[40..]), f2fs_crc32(7, &data));
    }

    #[test]
    fn checkpoint_checksum_skips_field() {
        let mut cp = [0u8; F2FS_BLKSIZE];
        cp[164..168].copy_from_slice(&(CP_MIN_CHKSUM_OFFSET as u32).to_le_bytes());
        let before = checkpoint_chksum(&cp);
        cp[CP_MIN_CHKSUM_OFFSET..CP_MIN_CHKSUM_OFFSET + 4].copy_from_slice(&before.to_le_bytes());
        assert_eq!(checkpoint_chksum(&cp), before);
        cp[300] = 1;
        assert_ne!(checkpoint_chksum(&cp), before);
    }

    #[test]
    fn inode_checksum_ignores_stored_value() {
        let mut node = [0u8; F2FS_BLKSIZE];
        node[NODE_FOOTER_OFFSET + 4] = 5;
        let seed = chksum_seed(&[1u8; 16]);
        let cs = inode_chksum(seed, &node);
        node[I_INODE_CHECKSUM_OFFSET..I_INODE_CHECKSUM_OFFSET + 4].copy_from_slice(&cs.to_le_bytes());
        assert_eq!(inode_chksum(seed, &node), cs);
    }
}
