// SPDX-License-Identifier: MIT
//! Segment summary blocks and the NAT/SIT journals they carry

use zerocopy::{FromBytes, FromZeros, Immutable, IntoBytes, KnownLayout};

use super::{F2fsNatEntry, F2fsSitEntry};
use crate::f2fs::constant::*;

/// Reverse pointer of one main-area block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, IntoBytes, FromBytes, KnownLayout, Immutable)]
#[repr(C, packed)]
pub struct F2fsSummary {
    /// Parent node id (data) or the node's own id (node)
    pub nid: u32,
    pub version: u8,
    pub ofs_in_node: u16,
}

impl F2fsSummary {
    pub fn new(nid: u32, ofs_in_node: u16, version: u8) -> Self {
        Self {
            nid,
            version,
            ofs_in_node,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, IntoBytes, FromBytes, KnownLayout, Immutable)]
#[repr(C, packed)]
pub struct SummaryFooter {
    pub entry_type: u8,
    pub check_sum: u32,
}

#[derive(Debug, Clone, Copy, IntoBytes, FromBytes, KnownLayout, Immutable)]
#[repr(C, packed)]
pub struct NatJournalEntry {
    pub nid: u32,
    pub ne: F2fsNatEntry,
}

#[derive(Debug, Clone, Copy, IntoBytes, FromBytes, KnownLayout, Immutable)]
#[repr(C, packed)]
pub struct SitJournalEntry {
    pub segno: u32,
    pub se: F2fsSitEntry,
}

/// Block-sized summary: 512 entries, a 507-byte journal and the footer.
#[derive(Debug, Clone, Copy, IntoBytes, FromBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct F2fsSummaryBlock {
    pub entries: [F2fsSummary; ENTRIES_IN_SUM],
    pub journal: [u8; SUM_JOURNAL_SIZE],
    pub footer: SummaryFooter,
}

impl Default for F2fsSummaryBlock {
    fn default() -> Self {
        Self::new_zeroed()
    }
}

impl F2fsSummaryBlock {
    /// `n_nats` or `n_sits`, depending on which journal the block holds.
    #[inline]
    pub fn journal_count(&self) -> usize {
        u16::from_le_bytes([self.journal[0], self.journal[1]]) as usize
    }

    #[inline]
    pub fn set_journal_count(&mut self, n: usize) {
        self.journal[..2].copy_from_slice(&(n as u16).to_le_bytes());
    }

    fn nat_slot(i: usize) -> core::ops::Range<usize> {
        let start = 2 + i * NAT_JOURNAL_ENTRY_SIZE;
        start..start + NAT_JOURNAL_ENTRY_SIZE
    }

    fn sit_slot(i: usize) -> core::ops::Range<usize> {
        let start = 2 + i * SIT_JOURNAL_ENTRY_SIZE;
        start..start + SIT_JOURNAL_ENTRY_SIZE
    }

    pub fn nat_journal(&self, i: usize) -> Option<NatJournalEntry> {
        if i >= NAT_JOURNAL_ENTRIES {
            return None;
        }
        NatJournalEntry::read_from_bytes(&self.journal[Self::nat_slot(i)]).ok()
    }

    pub fn set_nat_journal(&mut self, i: usize, e: &NatJournalEntry) {
        if i < NAT_JOURNAL_ENTRIES {
            self.journal[Self::nat_slot(i)].copy_from_slice(e.as_bytes());
        }
    }

    pub fn sit_journal(&self, i: usize) -> Option<SitJournalEntry> {
        if i >= SIT_JOURNAL_ENTRIES {
            return None;
        }
        SitJournalEntry::read_from_bytes(&self.journal[Self::sit_slot(i)]).ok()
    }

    pub fn set_sit_journal(&mut self, i: usize, e: &SitJournalEntry) {
        if i < SIT_JOURNAL_ENTRIES {
            self.journal[Self::sit_slot(i)].copy_from_slice(e.as_bytes());
        }
    }

    /// Index of `nid` in the NAT journal.
    pub fn lookup_nat(&self, nid: u32) -> Option<(usize, F2fsNatEntry)> {
        let n = self.journal_count().min(NAT_JOURNAL_ENTRIES);
        (0..n).find_map(|i| {
            let e = self.nat_journal(i)?;
            (e.nid == nid).then_some((i, e.ne))
        })
    }

    #[inline]
    pub fn is_node(&self) -> bool {
        self.footer.entry_type == SUM_TYPE_NODE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::mem::size_of;

    #[test]
    fn sizes() {
        assert_eq!(size_of::<F2fsSummary>(), SUMMARY_SIZE);
        assert_eq!(size_of::<SummaryFooter>(), SUM_FOOTER_SIZE);
        assert_eq!(size_of::<NatJournalEntry>(), NAT_JOURNAL_ENTRY_SIZE);
        assert_eq!(size_of::<SitJournalEntry>(), SIT_JOURNAL_ENTRY_SIZE);
        assert_eq!(size_of::<F2fsSummaryBlock>(), F2FS_BLKSIZE);
        assert_eq!(NAT_JOURNAL_ENTRIES, 38);
        assert_eq!(SIT_JOURNAL_ENTRIES, 6);
    }

    #[test]
    fn nat_journal_lookup() {
        let mut sum = F2fsSummaryBlock::default();
        let e = NatJournalEntry {
            nid: 42,
            ne: F2fsNatEntry {
                version: 1,
                ino: 42,
                block_addr: 0x1234,
            },
        };
        sum.set_nat_journal(3, &e);
        sum.set_journal_count(4);
        let (idx, ne) = sum.lookup_nat(42).unwrap();
        assert_eq!(idx, 3);
        assert_eq!({ ne.block_addr }, 0x1234);
        assert!(sum.lookup_nat(7).is_none());
    }
}
