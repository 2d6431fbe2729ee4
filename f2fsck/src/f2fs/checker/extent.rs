// SPDX-License-Identifier: MIT
//! Extent cache consistency
//!
//! An inode caches one extent `(fofs, blk, len)`. While its addresses are
//! walked in file order, every page inside the extent must map to the
//! matching block, contiguously, and no block of the extent may show up at
//! another file offset.

use crate::f2fs::{constant::*, session::ChildInfo};

impl ChildInfo {
    /// Feeds the address of page `self.pgofs` to the extent check. With
    /// `last` the walk is over and only the tail of the extent is checked.
    pub(crate) fn check_extent(&mut self, blkaddr: u32, last: bool) {
        let (fofs, ext_blk, len) = (self.ei.fofs, self.ei.blk_addr, self.ei.len);
        if len == 0 || self.unmatched_extent {
            return;
        }
        if self.inline_inode {
            self.unmatched_extent = true;
            return;
        }
        if last {
            if self.last_blk != ext_blk.wrapping_add(len - 1) {
                self.unmatched_extent = true;
            }
            return;
        }

        let pgofs = self.pgofs;
        let hole = blkaddr == NULL_ADDR || blkaddr == NEW_ADDR;
        let (start, end) = (fofs as u64, fofs as u64 + len as u64);

        if pgofs >= start && pgofs < end {
            let expect = (pgofs - start) as u32 + ext_blk;
            let contiguous = if self.last_blk == 0 {
                pgofs == start
            } else {
                self.last_blk.wrapping_add(1) == blkaddr
            };
            if hole || blkaddr != expect || !contiguous {
                self.unmatched_extent = true;
                return;
            }
            self.last_blk = blkaddr;
            return;
        }

        if !hole && blkaddr >= ext_blk && blkaddr < ext_blk.wrapping_add(len) {
            self.unmatched_extent = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::f2fs::types::F2fsExtent;

    fn walker(fofs: u32, blk: u32, len: u32) -> ChildInfo {
        ChildInfo {
            ei: F2fsExtent {
                fofs,
                blk_addr: blk,
                len,
            },
            ..ChildInfo::default()
        }
    }

    fn feed(c: &mut ChildInfo, addrs: &[u32]) {
        for &a in addrs {
            c.check_extent(a, false);
            c.pgofs += 1;
        }
        c.check_extent(0, true);
    }

    #[test]
    fn matching_extent() {
        let mut c = walker(1, 0x100, 3);
        feed(&mut c, &[0x50, 0x100, 0x101, 0x102, 0]);
        assert!(!c.unmatched_extent);
    }

    #[test]
    fn hole_inside_extent() {
        let mut c = walker(0, 0x100, 3);
        feed(&mut c, &[0x100, NULL_ADDR, 0x102]);
        assert!(c.unmatched_extent);
    }

    #[test]
    fn extent_block_at_wrong_offset() {
        let mut c = walker(4, 0x100, 2);
        feed(&mut c, &[0x101]);
        assert!(c.unmatched_extent);
    }

    #[test]
    fn truncated_tail() {
        let mut c = walker(0, 0x100, 4);
        feed(&mut c, &[0x100, 0x101]);
        assert!(c.unmatched_extent);
    }

    #[test]
    fn inline_inode_with_extent() {
        let mut c = walker(0, 0x100, 1);
        c.inline_inode = true;
        c.check_extent(0, true);
        assert!(c.unmatched_extent);
    }
}
