// SPDX-License-Identifier: MIT
//! Current segments and their summary blocks

use alloc::{boxed::Box, vec::Vec};

use f2io::prelude::*;
use zerocopy::{FromBytes, IntoBytes};

use crate::core::errors::*;
use crate::f2fs::{
    constant::*,
    session::{CheckSession, Curseg, CursegPos},
    types::*,
};

/// Where the summary of a segment came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SumKind {
    /// In-memory summary of an active node log.
    CurNode,
    /// In-memory summary of an active data log.
    CurData,
    Node,
    Data,
    /// An active node log whose summary says data.
    WrongCurNode,
    /// An active data log whose summary says node.
    WrongCurData,
}

impl SumKind {
    #[inline]
    pub fn is_node(self) -> bool {
        matches!(self, SumKind::CurNode | SumKind::Node)
    }

    #[inline]
    pub fn is_data(self) -> bool {
        matches!(self, SumKind::CurData | SumKind::Data)
    }

    #[inline]
    pub fn is_current(self) -> bool {
        !matches!(self, SumKind::Node | SumKind::Data)
    }
}

impl<'a, IO: F2IO + ?Sized> CheckSession<'a, IO> {
    /// Seeds the 6 logs from the checkpoint and loads their summaries.
    pub(crate) fn build_cursegs(&mut self) -> FsckResult {
        let cp = self.ckpt.cp;
        let alloc = cp.alloc_type;
        self.cursegs = (0..NR_CURSEG_TYPE)
            .map(|ty| {
                let segno = cp.cur_segno(ty);
                Curseg {
                    sum: Box::new(F2fsSummaryBlock::default()),
                    alloc_type: alloc[ty],
                    segno,
                    next_blkoff: cp.cur_blkoff(ty),
                    zone: self.meta.zone_of(segno),
                    next_segno: NULL_SEGNO,
                }
            })
            .collect::<Vec<_>>();
        self.restore_curseg_summaries()
    }

    fn restore_curseg_summaries(&mut self) -> FsckResult {
        let mut ty = CURSEG_HOT_DATA;
        if self.ckpt.cp.is_set(CP_COMPACT_SUM_FLAG) {
            self.read_compacted_summaries()?;
            ty = CURSEG_HOT_NODE;
        }
        for t in ty..NR_CURSEG_TYPE {
            self.read_normal_summaries(t)?;
        }
        Ok(())
    }

    /// Compact layout: NAT journal, SIT journal, then the packed data
    /// entries of the 3 data logs, spilling over into following blocks.
    fn read_compacted_summaries(&mut self) -> FsckResult {
        let mut start = self.ckpt.start_sum_block(self.meta.cp_blkaddr);
        let mut kaddr = vec![0u8; F2FS_BLKSIZE];
        self.read_block(start, &mut kaddr)?;
        start += 1;

        self.cursegs[CURSEG_HOT_DATA].sum.journal.copy_from_slice(&kaddr[..SUM_JOURNAL_SIZE]);
        self.cursegs[CURSEG_COLD_DATA]
            .sum
            .journal
            .copy_from_slice(&kaddr[SUM_JOURNAL_SIZE..2 * SUM_JOURNAL_SIZE]);

        let mut offset = 2 * SUM_JOURNAL_SIZE;
        for ty in CURSEG_HOT_DATA..=CURSEG_COLD_DATA {
            self.reset_curseg(ty);
            let c = &self.cursegs[ty];
            let blk_off = if c.alloc_type == SSR {
                BLOCKS_PER_SEG as usize
            } else {
                c.next_blkoff as usize
            };
            for j in 0..blk_off.min(ENTRIES_IN_SUM) {
                let (s, _) = F2fsSummary::read_from_prefix(&kaddr[offset..])
                    .map_err(|_| FsckError::structural("short compact summary"))?;
                self.cursegs[ty].sum.entries[j] = s;
                offset += SUMMARY_SIZE;
                if offset + SUMMARY_SIZE <= F2FS_BLKSIZE - SUM_FOOTER_SIZE {
                    continue;
                }
                kaddr.fill(0);
                self.read_block(start, &mut kaddr)?;
                start += 1;
                offset = 0;
            }
        }
        Ok(())
    }

    fn read_normal_summaries(&mut self, ty: usize) -> FsckResult {
        let umount = self.ckpt.cp.is_set(CP_UMOUNT_FLAG);
        let cp_blkaddr = self.meta.cp_blkaddr;
        let segno = self.ckpt.cp.cur_segno(ty);
        let blk_addr = if ty <= CURSEG_COLD_DATA {
            let base = if umount { NR_CURSEG_TYPE } else { NR_CURSEG_DATA_TYPE };
            self.ckpt.sum_blk_addr(cp_blkaddr, base as u32, ty as u32)
        } else if umount {
            self.ckpt
                .sum_blk_addr(cp_blkaddr, NR_CURSEG_NODE_TYPE as u32, (ty - CURSEG_HOT_NODE) as u32)
        } else {
            self.meta.sum_blkaddr(segno)
        };

        let mut sum = self.read_sum_block(blk_addr)?;
        if ty >= CURSEG_HOT_NODE && !umount {
            self.restore_node_summary(segno, &mut sum)?;
        }
        self.cursegs[ty].sum = sum;
        self.reset_curseg(ty);
        Ok(())
    }

    /// Rebuilds a node summary from the footers of the segment's blocks.
    fn restore_node_summary(&mut self, segno: u32, sum: &mut F2fsSummaryBlock) -> FsckResult {
        let start = self.meta.start_block(segno);
        let mut buf = vec![0u8; F2FS_BLKSIZE];
        for i in 0..BLOCKS_PER_SEG {
            self.read_block(start + i, &mut buf)?;
            let nid = u32::from_le_bytes([
                buf[NODE_FOOTER_OFFSET],
                buf[NODE_FOOTER_OFFSET + 1],
                buf[NODE_FOOTER_OFFSET + 2],
                buf[NODE_FOOTER_OFFSET + 3],
            ]);
            sum.entries[i as usize].nid = nid;
        }
        Ok(())
    }

    /// Clears the footer, stamps the log type and retypes the segment.
    pub(crate) fn reset_curseg(&mut self, ty: usize) {
        let c = &mut self.cursegs[ty];
        c.sum.footer = SummaryFooter::default();
        c.sum.footer.entry_type = if ty <= CURSEG_COLD_DATA { SUM_TYPE_DATA } else { SUM_TYPE_NODE };
        let segno = c.segno;
        if let Some(se) = self.sm.entries.get_mut(segno as usize) {
            se.seg_type = ty as u8;
            se.orig_type = ty as u8;
        }
    }

    fn cur_log_of(&self, segno: u32) -> Option<usize> {
        (CURSEG_HOT_NODE..NR_CURSEG_TYPE)
            .chain(CURSEG_HOT_DATA..=CURSEG_COLD_DATA)
            .find(|&ty| self.cursegs[ty].segno == segno)
    }

    /// Summary block of `segno`: an active log's in-memory copy, or the
    /// SSA block.
    pub fn get_sum_block(&mut self, segno: u32) -> FsckResult<(SumKind, Box<F2fsSummaryBlock>)> {
        if let Some(ty) = self.cur_log_of(segno) {
            let sum = self.cursegs[ty].sum.clone();
            let node_log = ty >= CURSEG_HOT_NODE;
            let kind = match (node_log, sum.is_node()) {
                (true, true) => SumKind::CurNode,
                (true, false) => {
                    crate::fsck_bug!(
                        self,
                        true,
                        "SSA.CURSEG",
                        "segno [{segno:#x}] indicates a data segment, but should be node"
                    );
                    SumKind::WrongCurNode
                }
                (false, false) => SumKind::CurData,
                (false, true) => {
                    crate::fsck_bug!(
                        self,
                        true,
                        "SSA.CURSEG",
                        "segno [{segno:#x}] indicates a node segment, but should be data"
                    );
                    SumKind::WrongCurData
                }
            };
            return Ok((kind, sum));
        }
        let sum = self.read_sum_block(self.meta.sum_blkaddr(segno))?;
        let kind = if sum.is_node() { SumKind::Node } else { SumKind::Data };
        Ok((kind, sum))
    }

    /// Summary entry of the block at `blkaddr`.
    pub fn get_sum_entry(&mut self, blkaddr: u32) -> FsckResult<(SumKind, F2fsSummary)> {
        let segno = self.meta.segno(blkaddr);
        let off = self.meta.blkoff(blkaddr) as usize;
        let (kind, sum) = self.get_sum_block(segno)?;
        Ok((kind, sum.entries[off]))
    }

    /// Stores `entry` as the summary of `blkaddr` and writes the SSA block.
    pub(crate) fn update_sum_entry(&mut self, blkaddr: u32, entry: &F2fsSummary) -> FsckResult {
        if self.meta.readonly() {
            return Ok(());
        }
        let segno = self.meta.segno(blkaddr);
        let off = self.meta.blkoff(blkaddr) as usize;
        let entry_type = if is_node_seg(self.seg_entry(segno).seg_type) {
            SUM_TYPE_NODE
        } else {
            SUM_TYPE_DATA
        };
        let sum = match self.cur_log_of(segno) {
            Some(ty) => {
                let s = &mut self.cursegs[ty].sum;
                s.entries[off] = *entry;
                s.footer.entry_type = entry_type;
                s.clone()
            }
            None => {
                let mut s = self.read_sum_block(self.meta.sum_blkaddr(segno))?;
                s.entries[off] = *entry;
                s.footer.entry_type = entry_type;
                s
            }
        };
        self.write_block(self.meta.sum_blkaddr(segno), sum.as_bytes())
    }

    /// Copies the log positions into the checkpoint.
    pub(crate) fn write_curseg_info(&mut self) {
        for ty in 0..NR_CURSEG_TYPE {
            let c = &self.cursegs[ty];
            self.ckpt.cp.set_curseg(ty, c.segno, c.next_blkoff, c.alloc_type);
        }
    }

    pub(crate) fn save_curseg_warm_node(&mut self) {
        let c = &self.cursegs[CURSEG_WARM_NODE];
        self.saved_warm_node = Some(CursegPos {
            alloc_type: c.alloc_type,
            segno: c.segno,
            next_blkoff: c.next_blkoff,
        });
    }

    pub(crate) fn restore_curseg_warm_node(&mut self) {
        if let Some(pos) = self.saved_warm_node {
            let c = &mut self.cursegs[CURSEG_WARM_NODE];
            c.alloc_type = pos.alloc_type;
            c.segno = pos.segno;
            c.next_blkoff = pos.next_blkoff;
        }
    }

    /// Writes every log's summary to its SSA block.
    pub(crate) fn write_curseg_sums(&mut self) -> FsckResult {
        for ty in 0..NR_CURSEG_TYPE {
            let sum = self.cursegs[ty].sum.clone();
            let ssa = self.meta.sum_blkaddr(self.cursegs[ty].segno);
            self.write_block(ssa, sum.as_bytes())?;
        }
        Ok(())
    }
}
