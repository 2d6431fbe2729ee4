// SPDX-License-Identifier: MIT
//! Hard link bookkeeping
//!
//! An inode with `i_links > 1` is recorded on its first visit. Every
//! later dentry reaching it moves one link from declared to observed; the
//! entry is dropped once the two agree. Entries left at the end declare
//! more links than the tree holds.

use f2io::prelude::*;

use crate::core::errors::*;
use crate::f2fs::{
    constant::*,
    session::{CheckSession, HardLink},
    types::*,
};

impl<'a, IO: F2IO + ?Sized> CheckSession<'a, IO> {
    pub(crate) fn add_hard_link(&mut self, nid: u32, links: u32) {
        self.fsck.hard_links.insert(nid, HardLink { links, actual: 1 });
        log::debug!("ino[{nid:#x}] has hard links [{links:#x}]");
    }

    /// Accounts one more dentry for `nid`; false when the inode was not
    /// expecting another link.
    pub(crate) fn find_and_dec_hard_link(&mut self, nid: u32) -> bool {
        let Some(hl) = self.fsck.hard_links.get_mut(&nid) else {
            return false;
        };
        hl.links -= 1;
        hl.actual += 1;
        if hl.links == 1 {
            self.fsck.hard_links.remove(&nid);
        }
        true
    }

    /// Writes the observed link count into every inode still listed.
    pub(crate) fn fix_hard_links(&mut self) -> FsckResult {
        let pending: alloc::vec::Vec<(u32, HardLink)> =
            self.fsck.hard_links.iter().map(|(&n, &h)| (n, h)).collect();
        for (nid, hl) in pending {
            let (mut node, ni) = match self.sanity_check_nid(nid, F2FS_FT_MAX, NodeKind::Inode) {
                Ok(v) => v,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    crate::fsck_fix!(self, "INODE.LINKS", "Failed to fix [{nid:#x}] ({e}), rerun fsck");
                    continue;
                }
            };
            node.i.i_links = hl.actual;
            crate::fsck_fix!(self, "INODE.LINKS", "File: {nid:#x} i_links= {:#x} -> {:#x}", hl.links, hl.actual);
            let mut at = ni.blk_addr;
            self.rewrite_node(&mut node, &mut at)?;
        }
        self.fsck.hard_links.clear();
        Ok(())
    }
}
