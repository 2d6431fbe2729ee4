// SPDX-License-Identifier: MIT
//! Node address table
//!
//! Lookups consult the NAT journal of the hot-data curseg before the NAT
//! block itself. The checker keeps a shadow copy of every valid entry in
//! `fsck.entries`, which lookups prefer once it is populated.

use alloc::boxed::Box;

use f2io::prelude::*;
use zerocopy::{FromZeros, IntoBytes};

use crate::core::{bitmap::MsbBitmapOps, errors::*};
use crate::f2fs::{constant::*, session::CheckSession, types::*};

impl<'a, IO: F2IO + ?Sized> CheckSession<'a, IO> {
    /// Fills the NAT descriptor and the nid bitmap from the journal.
    pub(crate) fn build_node_manager(&mut self) {
        let max_nid = self.meta.max_nid();
        self.nm.blkaddr = self.meta.nat_blkaddr;
        self.nm.nat_blocks = self.meta.nat_blocks();
        self.nm.max_nid = max_nid;
        self.nm.version_bitmap = self.ckpt.nat_bitmap().to_vec();
        self.nm.nid_bitmap = vec![0u8; (max_nid as usize).div_ceil(8)];
        self.early_init_nid_bitmap();
    }

    fn early_init_nid_bitmap(&mut self) {
        self.nm.nid_bitmap.set_msb(0);

        let mut n = self.cursegs[CURSEG_HOT_DATA].sum.journal_count();
        if n > NAT_JOURNAL_ENTRIES {
            crate::fsck_bug!(self, true, "NAT.JOURNAL", "nat journal holds {n} entries, truncated");
            n = NAT_JOURNAL_ENTRIES;
            self.cursegs[CURSEG_HOT_DATA].sum.set_journal_count(n);
        }
        for i in 0..n {
            let Some(e) = self.cursegs[CURSEG_HOT_DATA].sum.nat_journal(i) else {
                break;
            };
            let addr = e.ne.block_addr;
            let nid = e.nid;
            let bad_addr = addr != NULL_ADDR && !self.meta.is_valid_blkaddr(addr);
            let bad_nid = !self.meta.is_valid_nid(nid);
            if bad_addr || bad_nid {
                crate::fsck_bug!(
                    self,
                    true,
                    "NAT.JOURNAL",
                    "journal entry {i}: nid {nid:#x} addr {addr:#x} invalid, journal cut"
                );
                self.cursegs[CURSEG_HOT_DATA].sum.set_journal_count(i);
                break;
            }
            if addr != NULL_ADDR {
                self.nm.nid_bitmap.set_msb(nid as usize);
            }
        }
    }

    /// Marks every nid with an address in the NAT blocks.
    pub(crate) fn late_init_nid_bitmap(&mut self) -> FsckResult {
        for block_off in 0..self.nm.nat_blocks {
            let blk = self.read_nat_block(self.nat_block_addr(block_off))?;
            let base = block_off as usize * NAT_ENTRY_PER_BLOCK;
            for (i, e) in blk.entries.iter().enumerate() {
                if { e.block_addr } != NULL_ADDR {
                    self.nm.nid_bitmap.set_msb(base + i);
                }
            }
        }
        Ok(())
    }

    /// Active copy of NAT block `block_off`.
    pub fn nat_block_addr(&self, block_off: u32) -> u32 {
        let seg_off = block_off >> LOG_BLOCKS_PER_SEG;
        let mut addr = self.nm.blkaddr + (seg_off << (LOG_BLOCKS_PER_SEG + 1)) + (block_off & (BLOCKS_PER_SEG - 1));
        if self.nm.version_bitmap.test_msb(block_off as usize) {
            addr += BLOCKS_PER_SEG;
        }
        addr
    }

    /// Active NAT block holding `nid`.
    #[inline]
    pub fn current_nat_addr(&self, nid: u32) -> u32 {
        self.nat_block_addr(nid / NAT_ENTRY_PER_BLOCK as u32)
    }

    pub(crate) fn read_nat_block(&mut self, blkaddr: u32) -> FsckResult<Box<F2fsNatBlock>> {
        let mut blk = Box::new(F2fsNatBlock::new_zeroed());
        self.read_block(blkaddr, blk.as_mut_bytes())?;
        Ok(blk)
    }

    /// Raw entry of `nid`, journal first.
    pub fn get_nat_entry(&mut self, nid: u32) -> FsckResult<F2fsNatEntry> {
        if let Some((_, ne)) = self.cursegs[CURSEG_HOT_DATA].sum.lookup_nat(nid) {
            return Ok(ne);
        }
        let blk = self.read_nat_block(self.current_nat_addr(nid))?;
        Ok(blk.entries[nid as usize % NAT_ENTRY_PER_BLOCK])
    }

    /// Resolves `nid`, preferring the checker's shadow table.
    pub fn get_node_info(&mut self, nid: u32) -> FsckResult<NodeInfo> {
        if let Some(e) = self.fsck.entries.get(nid as usize).filter(|e| { e.block_addr } != NULL_ADDR) {
            return Ok(NodeInfo::from_raw(nid, e));
        }
        let raw = self.get_nat_entry(nid)?;
        Ok(NodeInfo::from_raw(nid, &raw))
    }

    /// Points `nid` at `newaddr`, in the journal if it lives there.
    /// A zero `ino` keeps the recorded owner.
    pub(crate) fn update_nat_blkaddr(&mut self, ino: u32, nid: u32, newaddr: u32) -> FsckResult {
        let journal = &mut self.cursegs[CURSEG_HOT_DATA].sum;
        if let Some((idx, mut ne)) = journal.lookup_nat(nid) {
            if ino != 0 {
                ne.ino = ino;
            }
            ne.block_addr = newaddr;
            journal.set_nat_journal(idx, &NatJournalEntry { nid, ne });
        } else {
            let addr = self.current_nat_addr(nid);
            let mut blk = self.read_nat_block(addr)?;
            let e = &mut blk.entries[nid as usize % NAT_ENTRY_PER_BLOCK];
            if ino != 0 {
                e.ino = ino;
            }
            e.block_addr = newaddr;
            self.write_block(addr, blk.as_bytes())?;
        }
        if let Some(e) = self.fsck.entries.get_mut(nid as usize) {
            if ino != 0 {
                e.ino = ino;
            }
            e.block_addr = newaddr;
        }
        Ok(())
    }

    /// Drops `nid` from the NAT. Node and meta inodes keep address 1.
    pub(crate) fn nullify_nat_entry(&mut self, nid: u32) -> FsckResult {
        if let Some(e) = self.fsck.entries.get_mut(nid as usize) {
            e.block_addr = NULL_ADDR;
        }
        let journal = &mut self.cursegs[CURSEG_HOT_DATA].sum;
        if let Some((idx, _)) = journal.lookup_nat(nid) {
            journal.set_nat_journal(
                idx,
                &NatJournalEntry {
                    nid,
                    ne: F2fsNatEntry::default(),
                },
            );
            crate::fsck_fix!(self, "NAT.NULLIFY", "remove nid [{nid:#x}] in nat journal");
            return Ok(());
        }
        let addr = self.current_nat_addr(nid);
        let mut blk = self.read_nat_block(addr)?;
        let e = &mut blk.entries[nid as usize % NAT_ENTRY_PER_BLOCK];
        if self.meta.is_meta_ino(nid) {
            e.block_addr = 1;
        } else {
            *e = F2fsNatEntry::default();
        }
        self.write_block(addr, blk.as_bytes())?;
        crate::fsck_fix!(self, "NAT.NULLIFY", "remove nid [{nid:#x}] in nat entry");
        Ok(())
    }

    /// Builds the checker's NAT bitmap and shadow table.
    ///
    /// Every entry with an address sets its bit; the walk clears the bits
    /// it reaches, so what is left at the end is unreachable.
    pub(crate) fn build_nat_area_bitmap(&mut self) -> FsckResult {
        let nr = self.meta.max_nid() as usize;
        self.fsck.nat_bitmap = vec![0u8; nr.div_ceil(8)];
        self.fsck.entries = vec![F2fsNatEntry::default(); nr];
        // Both NAT copies, one pass.
        self.io.readahead_blocks(self.nm.blkaddr as u64, self.nm.nat_blocks as u64 * 2)?;

        for block_off in 0..self.nm.nat_blocks {
            let blk = self.read_nat_block(self.nat_block_addr(block_off))?;
            let base = block_off * NAT_ENTRY_PER_BLOCK as u32;
            for (i, e) in blk.entries.iter().enumerate() {
                let nid = base + i as u32;
                let (ino, addr) = (e.ino, e.block_addr);
                if self.meta.is_meta_ino(nid) {
                    if addr != 1 {
                        crate::fsck_bug!(self, true, "NAT.META", "ino [{nid:#x}] block_addr [{addr:#x}] is invalid");
                        self.fsck.nat_bitmap.set_msb(nid as usize);
                    }
                    continue;
                }
                if addr == NULL_ADDR {
                    continue;
                }
                let bad = ino == 0 || !self.meta.is_valid_blkaddr(addr);
                crate::fsck_bug!(self, bad, "NAT.INO", "ino [{ino:#x}] or blk_addr [{addr:#x}] is invalid");
                if ino == nid {
                    self.fsck.nat_valid_inode_cnt += 1;
                }
                if nid == 0 {
                    crate::fsck_bug!(self, true, "NAT.ZERO", "invalid nat entry[0]: blk_addr [{addr:#x}]");
                    self.fsck.chk.valid_nat_entry_cnt = self.fsck.chk.valid_nat_entry_cnt.wrapping_sub(1);
                }
                self.fsck.nat_bitmap.set_msb(nid as usize);
                self.fsck.chk.valid_nat_entry_cnt = self.fsck.chk.valid_nat_entry_cnt.wrapping_add(1);
                self.fsck.entries[nid as usize] = *e;
            }
        }

        let n = self.cursegs[CURSEG_HOT_DATA].sum.journal_count().min(NAT_JOURNAL_ENTRIES);
        for i in 0..n {
            let Some(j) = self.cursegs[CURSEG_HOT_DATA].sum.nat_journal(i) else {
                break;
            };
            let nid = j.nid;
            let Some(old) = self.fsck.entries.get(nid as usize).copied() else {
                continue;
            };
            if { old.block_addr } != NULL_ADDR {
                self.fsck.chk.valid_nat_entry_cnt -= 1;
                self.fsck.nat_bitmap.clear_msb(nid as usize);
                if { old.ino } == nid {
                    self.fsck.nat_valid_inode_cnt -= 1;
                }
            }
            let (ino, addr) = (j.ne.ino, j.ne.block_addr);
            if addr != NULL_ADDR {
                let bad = ino == 0 || !self.meta.is_valid_blkaddr(addr);
                crate::fsck_bug!(self, bad, "NAT.INO", "ino [{ino:#x}] or blk_addr [{addr:#x}] is invalid");
                if ino == nid {
                    self.fsck.nat_valid_inode_cnt += 1;
                }
                self.fsck.nat_bitmap.set_msb(nid as usize);
                self.fsck.chk.valid_nat_entry_cnt += 1;
            }
            self.fsck.entries[nid as usize] = j.ne;
        }
        log::info!(
            "valid nat entries (block_addr != 0x0) [{:#x} : {}]",
            self.fsck.chk.valid_nat_entry_cnt,
            self.fsck.chk.valid_nat_entry_cnt
        );
        Ok(())
    }

    /// Writes the NAT journal into the NAT blocks and empties it.
    /// Returns how many entries moved.
    pub(crate) fn flush_nat_journal_entries(&mut self) -> FsckResult<usize> {
        let n = self.cursegs[CURSEG_HOT_DATA].sum.journal_count().min(NAT_JOURNAL_ENTRIES);
        for i in 0..n {
            let Some(j) = self.cursegs[CURSEG_HOT_DATA].sum.nat_journal(i) else {
                break;
            };
            let addr = self.current_nat_addr(j.nid);
            let mut blk = self.read_nat_block(addr)?;
            blk.entries[j.nid as usize % NAT_ENTRY_PER_BLOCK] = j.ne;
            self.write_block(addr, blk.as_bytes())?;
        }
        self.cursegs[CURSEG_HOT_DATA].sum.set_journal_count(0);
        Ok(n)
    }
}
