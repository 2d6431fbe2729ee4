// SPDX-License-Identifier: MIT
//! Extended attribute area
//!
//! The xattr space of an inode is the inline xattr area followed by the
//! first `VALID_XATTR_BLOCK_SIZE` bytes of its xattr node. It starts with a
//! header, then entries padded to 4 bytes, terminated by a zero word.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::f2fs::constant::*;

#[derive(Debug, Clone, Copy, Default, IntoBytes, FromBytes, KnownLayout, Immutable)]
#[repr(C, packed)]
pub struct F2fsXattrHeader {
    pub h_magic: u32,
    pub h_refcount: u32,
    pub h_reserved: [u32; 4],
}

#[derive(Debug, Clone, Copy, Default, IntoBytes, FromBytes, KnownLayout, Immutable)]
#[repr(C, packed)]
pub struct F2fsXattrEntry {
    pub e_name_index: u8,
    pub e_name_len: u8,
    pub e_value_size: u16,
}

impl F2fsXattrEntry {
    /// Bytes taken by the entry, padding included.
    #[inline]
    pub fn size(&self) -> usize {
        (XATTR_ENTRY_HEADER_SIZE + self.e_name_len as usize + self.e_value_size as usize)
            .next_multiple_of(4)
    }
}

/// Result of walking an xattr area.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XattrScan {
    /// List ends at `end`; everything after it is zero.
    Clean { end: usize },
    /// Entry at `end` crosses the end of the area.
    Overflow { end: usize },
    /// List ends at `end` but junk follows.
    TrailingJunk { end: usize },
}

impl XattrScan {
    pub fn end(&self) -> usize {
        match *self {
            XattrScan::Clean { end } | XattrScan::Overflow { end } | XattrScan::TrailingJunk { end } => end,
        }
    }

    pub fn is_clean(&self) -> bool {
        matches!(self, XattrScan::Clean { .. })
    }
}

/// Walks the entries of `area`, a full xattr space with its header.
pub fn scan_xattrs(area: &[u8]) -> XattrScan {
    let last = area.len();
    let mut ofs = XATTR_HEADER_SIZE.min(last);
    loop {
        if ofs + 4 > last {
            return XattrScan::Overflow { end: ofs };
        }
        let word = u32::from_le_bytes([area[ofs], area[ofs + 1], area[ofs + 2], area[ofs + 3]]);
        if word == 0 {
            break;
        }
        let ent = F2fsXattrEntry {
            e_name_index: area[ofs],
            e_name_len: area[ofs + 1],
            e_value_size: u16::from_le_bytes([area[ofs + 2], area[ofs + 3]]),
        };
        let next = ofs + ent.size();
        if next > last {
            return XattrScan::Overflow { end: ofs };
        }
        ofs = next;
    }
    if area[ofs..].iter().all(|&b| b == 0) {
        XattrScan::Clean { end: ofs }
    } else {
        XattrScan::TrailingJunk { end: ofs }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn area_with(entries: &[(u8, &[u8], &[u8])], len: usize) -> alloc::vec::Vec<u8> {
        let mut a = vec![0u8; len];
        a[..4].copy_from_slice(&F2FS_XATTR_MAGIC.to_le_bytes());
        let mut ofs = XATTR_HEADER_SIZE;
        for (idx, name, value) in entries {
            a[ofs] = *idx;
            a[ofs + 1] = name.len() as u8;
            a[ofs + 2..ofs + 4].copy_from_slice(&(value.len() as u16).to_le_bytes());
            a[ofs + 4..ofs + 4 + name.len()].copy_from_slice(name);
            let v = ofs + 4 + name.len();
            a[v..v + value.len()].copy_from_slice(value);
            ofs += (4 + name.len() + value.len()).next_multiple_of(4);
        }
        a
    }

    #[test]
    fn clean_list() {
        let a = area_with(&[(1, b"user.a", b"xyz"), (6, b"b", b"")], 200);
        assert_eq!(scan_xattrs(&a), XattrScan::Clean { end: 24 + 16 + 8 });
    }

    #[test]
    fn overflow_detected() {
        let mut a = area_with(&[(1, b"user.a", b"xyz")], 64);
        // value size pointing past the area
        a[24 + 2..24 + 4].copy_from_slice(&200u16.to_le_bytes());
        assert_eq!(scan_xattrs(&a), XattrScan::Overflow { end: 24 });
    }

    #[test]
    fn junk_after_end() {
        let mut a = area_with(&[(1, b"k", b"v")], 64);
        a[60] = 0xAA;
        let s = scan_xattrs(&a);
        assert_eq!(s, XattrScan::TrailingJunk { end: 32 });
        assert!(!s.is_clean());
    }
}
