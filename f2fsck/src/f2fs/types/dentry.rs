// SPDX-License-Identifier: MIT
//! Directory entries, for both dentry blocks and inline dentry areas

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::core::bitmap::BitmapOps;
use crate::f2fs::constant::*;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, IntoBytes, FromBytes, KnownLayout, Immutable)]
#[repr(C, packed)]
pub struct F2fsDirEntry {
    pub hash_code: u32,
    pub ino: u32,
    pub name_len: u16,
    pub file_type: u8,
}

/// Position of the bitmap, entry array and name slots inside a buffer.
///
/// A dentry block and an inline dentry area share the same scheme; only
/// the slot count and the offsets differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DentryLayout {
    pub nr: usize,
    pub dentry_ofs: usize,
    pub name_ofs: usize,
}

impl DentryLayout {
    pub const BLOCK: Self = Self {
        nr: NR_DENTRY_IN_BLOCK,
        dentry_ofs: SIZE_OF_DENTRY_BITMAP + SIZE_OF_RESERVED,
        name_ofs: SIZE_OF_DENTRY_BITMAP + SIZE_OF_RESERVED + NR_DENTRY_IN_BLOCK * SIZE_OF_DIR_ENTRY,
    };

    /// Layout of an inline area of `max_inline` bytes.
    pub fn inline(max_inline: usize) -> Self {
        let nr = max_inline * 8 / ((SIZE_OF_DIR_ENTRY + F2FS_SLOT_LEN) * 8 + 1);
        let bitmap = nr.div_ceil(8);
        let reserved = max_inline - ((SIZE_OF_DIR_ENTRY + F2FS_SLOT_LEN) * nr + bitmap);
        let dentry_ofs = bitmap + reserved;
        Self {
            nr,
            dentry_ofs,
            name_ofs: dentry_ofs + nr * SIZE_OF_DIR_ENTRY,
        }
    }

    #[inline]
    pub fn is_block(&self) -> bool {
        self.nr == NR_DENTRY_IN_BLOCK
    }

    #[inline]
    pub fn bitmap<'a>(&self, buf: &'a [u8]) -> &'a [u8] {
        &buf[..self.nr.div_ceil(8)]
    }

    #[inline]
    pub fn test_slot(&self, buf: &[u8], i: usize) -> bool {
        i < self.nr && self.bitmap(buf).get_bit(i)
    }

    #[inline]
    pub fn set_slot(&self, buf: &mut [u8], i: usize, value: bool) {
        if i < self.nr {
            buf[..self.nr.div_ceil(8)].set_bit(i, value);
        }
    }

    pub fn entry(&self, buf: &[u8], i: usize) -> F2fsDirEntry {
        let ofs = self.dentry_ofs + i * SIZE_OF_DIR_ENTRY;
        F2fsDirEntry::read_from_bytes(&buf[ofs..ofs + SIZE_OF_DIR_ENTRY]).unwrap_or_default()
    }

    pub fn set_entry(&self, buf: &mut [u8], i: usize, de: &F2fsDirEntry) {
        let ofs = self.dentry_ofs + i * SIZE_OF_DIR_ENTRY;
        buf[ofs..ofs + SIZE_OF_DIR_ENTRY].copy_from_slice(de.as_bytes());
    }

    /// Name bytes starting at slot `i`, clipped to the name area.
    pub fn name<'a>(&self, buf: &'a [u8], i: usize, len: usize) -> &'a [u8] {
        let start = self.name_ofs + i * F2FS_SLOT_LEN;
        let end = (start + len).min(self.name_ofs + self.nr * F2FS_SLOT_LEN);
        &buf[start.min(end)..end]
    }

    pub fn set_name(&self, buf: &mut [u8], i: usize, name: &[u8]) {
        let start = self.name_ofs + i * F2FS_SLOT_LEN;
        let room = (self.nr - i) * F2FS_SLOT_LEN;
        let n = name.len().min(room);
        buf[start..start + n].copy_from_slice(&name[..n]);
    }

    /// Clears entry, name slot and bitmap bit of slot `i`.
    pub fn nullify(&self, buf: &mut [u8], i: usize) {
        self.set_entry(buf, i, &F2fsDirEntry::default());
        let start = self.name_ofs + i * F2FS_SLOT_LEN;
        buf[start..start + F2FS_SLOT_LEN].fill(0);
        self.set_slot(buf, i, false);
    }

    /// First run of `slots` free slots.
    pub fn find_free(&self, buf: &[u8], slots: usize) -> Option<usize> {
        let mut start = 0;
        while start + slots <= self.nr {
            match (start..start + slots).find(|&j| self.test_slot(buf, j)) {
                Some(busy) => start = busy + 1,
                None => return Some(start),
            }
        }
        None
    }

    /// Writes a complete entry over `slots` slots starting at `i`.
    pub fn insert(&self, buf: &mut [u8], i: usize, de: &F2fsDirEntry, name: &[u8]) {
        self.set_entry(buf, i, de);
        self.set_name(buf, i, name);
        for j in 0..name_slots(name.len()) {
            self.set_slot(buf, i + j, true);
        }
    }

    /// Finds `name` among the occupied slots; returns `(slot, ino)`.
    pub fn lookup(&self, buf: &[u8], name: &[u8], hash: u32) -> Option<(usize, u32)> {
        let mut i = 0;
        while i < self.nr {
            if !self.test_slot(buf, i) {
                i += 1;
                continue;
            }
            let de = self.entry(buf, i);
            let len = de.name_len as usize;
            if de.hash_code == hash && len == name.len() && self.name(buf, i, len) == name {
                return Some((i, de.ino));
            }
            i += name_slots(len).max(1);
        }
        None
    }
}

/// Name slots used by a name of `len` bytes.
#[inline]
pub fn name_slots(len: usize) -> usize {
    len.div_ceil(F2FS_SLOT_LEN)
}

// === Multi-level hash table ===

pub fn dir_buckets(level: u32, dir_level: u8) -> u64 {
    if level + (dir_level as u32) < MAX_DIR_HASH_DEPTH / 2 {
        1u64 << (level + dir_level as u32)
    } else {
        MAX_DIR_BUCKETS as u64
    }
}

pub fn bucket_blocks(level: u32) -> u64 {
    if level < MAX_DIR_HASH_DEPTH / 2 { 2 } else { 4 }
}

/// First block of bucket `idx` at `level`.
pub fn dir_block_index(level: u32, dir_level: u8, idx: u64) -> u64 {
    let before: u64 = (0..level)
        .map(|i| dir_buckets(i, dir_level) * bucket_blocks(i))
        .sum();
    before + idx * bucket_blocks(level)
}

/// Level holding the dentry block at page offset `pgofs`.
pub fn current_level(dir_level: u8, pgofs: u64) -> u32 {
    let mut bidx = 0u64;
    for i in 0..MAX_DIR_HASH_DEPTH {
        bidx += dir_buckets(i, dir_level) * bucket_blocks(i);
        if bidx > pgofs {
            return i;
        }
    }
    MAX_DIR_HASH_DEPTH
}

/// Whether a dentry with `hash` may live in the block at `pgofs`.
pub fn dirent_in_bucket(hash: u32, pgofs: u64, dir_level: u8) -> Result<(), (u32, u64, u64)> {
    let level = current_level(dir_level, pgofs);
    let nbucket = dir_buckets(level, dir_level);
    let bidx = dir_block_index(level, dir_level, hash as u64 % nbucket);
    let end = bidx + bucket_blocks(level);
    if (bidx..end).contains(&pgofs) {
        Ok(())
    } else {
        Err((level, bidx, end - 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_layout_fills_block() {
        let l = DentryLayout::BLOCK;
        assert_eq!(l.nr, 214);
        assert_eq!(l.dentry_ofs, 30);
        assert_eq!(l.name_ofs + l.nr * F2FS_SLOT_LEN, F2FS_BLKSIZE);
    }

    #[test]
    fn inline_layout_fits_area() {
        // 923 addresses, 50 inline xattr words, no extra attrs
        let max = 4 * (DEF_ADDRS_PER_INODE - 50 - 1);
        let l = DentryLayout::inline(max);
        assert_eq!(l.nr, 182);
        assert!(l.name_ofs + l.nr * F2FS_SLOT_LEN <= max);
        assert!(!l.is_block());
    }

    #[test]
    fn insert_lookup_nullify() {
        let l = DentryLayout::BLOCK;
        let mut buf = vec![0u8; F2FS_BLKSIZE];
        let name = b"a_long_file_name";
        let de = F2fsDirEntry {
            hash_code: 0x1234,
            ino: 9,
            name_len: name.len() as u16,
            file_type: F2FS_FT_REG_FILE,
        };
        let slot = l.find_free(&buf, name_slots(name.len())).unwrap();
        l.insert(&mut buf, slot, &de, name);
        assert!(l.test_slot(&buf, slot + 1));
        assert_eq!(l.lookup(&buf, name, 0x1234), Some((slot, 9)));
        assert_eq!(l.find_free(&buf, 1), Some(2));

        l.nullify(&mut buf, slot);
        assert!(!l.test_slot(&buf, slot));
    }

    #[test]
    fn bucket_position() {
        assert_eq!(dir_block_index(0, 0, 0), 0);
        assert_eq!(dir_block_index(1, 0, 1), 4);
        assert_eq!(current_level(0, 0), 0);
        assert_eq!(current_level(0, 2), 1);
        // level 1 has two buckets of two blocks, at pages 2..6
        assert!(dirent_in_bucket(1, 4, 0).is_ok());
        assert!(dirent_in_bucket(0, 4, 0).is_err());
    }
}
