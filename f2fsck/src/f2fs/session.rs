// SPDX-License-Identifier: MIT
//! Per-run checker state
//!
//! A [`CheckSession`] owns everything a run needs: the loaded superblock
//! and checkpoint, the NAT/SIT/curseg tables, the checker bitmaps and
//! counters, and the report. Every module of the engine is an `impl` block
//! on it.

use alloc::{boxed::Box, collections::BTreeMap, string::String, vec::Vec};

use f2io::prelude::*;
use zerocopy::{FromBytes, IntoBytes};

use crate::core::{
    errors::*,
    options::CheckOptions,
    report::{Finding, VerifyReport},
};
use crate::f2fs::{
    constant::*,
    meta::F2fsMeta,
    mount::{
        checkpoint::{CheckpointState, load_checkpoint},
        superblock::{SbState, validate_super_block},
    },
    types::*,
};

/// NAT descriptors built from the checkpoint.
#[derive(Debug, Clone, Default)]
pub struct NatTable {
    pub blkaddr: u32,
    pub nat_blocks: u32,
    pub max_nid: u32,
    /// Active-half selector, one bit per NAT block (MSB-first).
    pub version_bitmap: Vec<u8>,
    /// Nids with a non-null address, as read at mount.
    pub nid_bitmap: Vec<u8>,
}

/// SIT descriptors and the in-memory segment entries.
#[derive(Debug, Clone, Default)]
pub struct SitTable {
    pub base: u32,
    pub sit_blocks: u32,
    pub version_bitmap: Vec<u8>,
    pub entries: Vec<SegEntry>,
    pub free_segments: u32,
    pub reserved_segments: u32,
    pub ovp_segments: u32,
    /// Entries were read from disk.
    pub loaded: bool,
}

/// One active log.
#[derive(Debug, Clone)]
pub struct Curseg {
    pub sum: Box<F2fsSummaryBlock>,
    pub alloc_type: u8,
    pub segno: u32,
    pub next_blkoff: u16,
    pub zone: u32,
    pub next_segno: u32,
}

/// Position of a curseg, saved around roll-forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursegPos {
    pub alloc_type: u8,
    pub segno: u32,
    pub next_blkoff: u16,
}

/// Filesystem-wide counters, seeded from the checkpoint and updated by
/// the allocator.
#[derive(Debug, Clone, Copy, Default)]
pub struct Totals {
    pub valid_blocks: u64,
    pub valid_nodes: u32,
    pub valid_inodes: u32,
    pub user_block_count: u64,
    pub total_node_count: u32,
}

/// What the walk observed.
#[derive(Debug, Clone, Copy, Default)]
pub struct CheckCounters {
    pub checked_node_cnt: u64,
    pub valid_blk_cnt: u64,
    pub valid_nat_entry_cnt: u32,
    pub valid_node_cnt: u32,
    pub valid_inode_cnt: u32,
    pub multi_hard_link_files: u32,
    pub sit_valid_blocks: u64,
    pub sit_free_segs: u32,
    pub wp_fixed: bool,
    pub wp_inconsistent_zones: u32,
}

/// Declared vs observed link count of a multiply-linked inode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HardLink {
    pub links: u32,
    pub actual: u32,
}

/// Quota usage accumulated for one id.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DqUsage {
    pub space: u64,
    pub inodes: u64,
}

/// Checker bitmaps, the NAT shadow table and the walk bookkeeping.
#[derive(Debug, Clone, Default)]
pub struct FsckState {
    /// Main-area blocks reached by the walk.
    pub main_bitmap: Vec<u8>,
    /// Union of the SIT valid maps.
    pub sit_bitmap: Vec<u8>,
    /// Valid NAT entries not yet reached by the walk.
    pub nat_bitmap: Vec<u8>,
    pub entries: Vec<F2fsNatEntry>,
    pub nat_valid_inode_cnt: u32,
    pub hard_links: BTreeMap<u32, HardLink>,
    pub chk: CheckCounters,
    pub quota: [BTreeMap<u32, DqUsage>; F2FS_MAX_QUOTAS],
    pub lpf_ino: u32,
    pub dentry_depth: u32,
    /// Path of the directory being walked, for messages.
    pub path: Vec<String>,
}

/// Run flags shared by every phase.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunState {
    /// Repairs are applied (to memory, and to disk unless dry-run).
    pub fix_on: bool,
    /// An inconsistency was found.
    pub bug_on: bool,
    /// Fsync data must be replayed by the kernel.
    pub roll_forward: bool,
    pub invalid_sb: SbState,
    pub alloc_failed: bool,
    pub zoned_hm: bool,
    pub cp_backuped: bool,
    /// The image is clean and the check can be skipped.
    pub skip: bool,
    pub quota_fixed: bool,
    pub sb_realigned: bool,
    /// The checkpoint checksum must move back to its fixed offset.
    pub fix_chksum: bool,
    /// Metadata is rewritten at commit even without a recorded bug.
    pub force_commit: bool,
    /// The commit phase rewrote the metadata.
    pub committed: bool,
}

/// Inherited state of the directory walk.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChildInfo {
    pub links: u32,
    pub files: u32,
    pub pgofs: u64,
    /// `DOT_SEEN` / `DOTDOT_SEEN`.
    pub dots: u8,
    pub dir_level: u8,
    pub p_ino: u32,
    pub pp_ino: u32,
    pub ei: F2fsExtent,
    pub last_blk: u32,
    pub i_namelen: u32,
    pub unmatched_extent: bool,
    pub inline_inode: bool,
    pub depth: u32,
}

pub const DOT_SEEN: u8 = 1 << 0;
pub const DOTDOT_SEEN: u8 = 1 << 1;

/// Compressed-cluster accounting of one inode.
#[derive(Debug, Clone, Copy, Default)]
pub struct ComprBlkCnt {
    pub cnt: u64,
    pub cheader_pgofs: Option<u64>,
}

/// State of one check/repair run over a device.
pub struct CheckSession<'a, IO: F2IO + ?Sized> {
    pub(crate) io: &'a mut IO,
    pub opts: CheckOptions,
    pub sb: Box<F2fsSuperBlock>,
    pub sb_addr: u32,
    pub meta: F2fsMeta,
    pub ckpt: CheckpointState,
    pub nm: NatTable,
    pub sm: SitTable,
    pub cursegs: Vec<Curseg>,
    pub saved_warm_node: Option<CursegPos>,
    pub totals: Totals,
    pub fsck: FsckState,
    pub report: VerifyReport,
    pub run: RunState,
}

impl<'a, IO: F2IO + ?Sized> core::fmt::Debug for CheckSession<'a, IO> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CheckSession")
            .field("cur_cp", &self.ckpt.cur_cp)
            .field("version", &self.ckpt.version)
            .field("run", &self.run)
            .field("chk", &self.fsck.chk)
            .finish()
    }
}

impl<'a, IO: F2IO + ?Sized> CheckSession<'a, IO> {
    /// Loads superblock, checkpoint and tables.
    ///
    /// Any failure here is fatal and nothing has been written.
    pub fn open(io: &'a mut IO, opts: CheckOptions) -> FsResult<Self> {
        let zoned_hm = io.as_zoned().is_some_and(|z| z.host_managed());
        let writable = opts.writes_enabled();
        let loaded = validate_super_block(io, writable)?;
        let meta = F2fsMeta::from_sb(&loaded.sb);
        let ckpt = load_checkpoint(io, &loaded.sb)?;

        let mut sess = Self {
            io,
            sb: loaded.sb,
            sb_addr: loaded.addr,
            meta,
            ckpt,
            nm: NatTable::default(),
            sm: SitTable::default(),
            cursegs: Vec::new(),
            saved_warm_node: None,
            totals: Totals::default(),
            fsck: FsckState::default(),
            report: VerifyReport::default(),
            run: RunState {
                fix_on: opts.fix,
                invalid_sb: loaded.state,
                zoned_hm,
                sb_realigned: loaded.realigned,
                ..RunState::default()
            },
            opts,
        };
        log::info!(
            "checkpoint pack {} selected, version {:#x}",
            sess.ckpt.cur_cp,
            sess.ckpt.version
        );

        sess.sanity_check_ckpt()?;

        let cp = &sess.ckpt.cp;
        sess.totals = Totals {
            valid_blocks: cp.valid_block_count,
            valid_nodes: cp.valid_node_count,
            valid_inodes: cp.valid_inode_count,
            user_block_count: cp.user_block_count,
            total_node_count: sess.meta.max_nid(),
        };

        sess.build_sit_info();
        sess.build_cursegs()?;
        sess.build_node_manager();

        match sess.record_fsync_data() {
            Ok(()) => {}
            Err(e) if e.kind == FsckErrorKind::Structural => {
                // a looped chain in check-only mode; keep going
                log::warn!("fsync chain: {e}");
            }
            Err(e) => return Err(e.into()),
        }

        if !sess.should_proceed() {
            sess.run.skip = true;
            return Ok(sess);
        }

        sess.build_sit_entries()?;
        sess.late_init_nid_bitmap()?;
        Ok(sess)
    }

    /// Runs every phase with the options given at [`open`](Self::open).
    pub fn run(&mut self) -> FsResult<VerifyReport> {
        let opts = self.opts.clone();
        crate::core::checker::FsChecker::check_with(self, &opts)
    }

    // === flags ===

    /// True when repairs may reach the device.
    #[inline]
    pub fn writable(&self) -> bool {
        self.run.fix_on && !self.opts.dry_run
    }

    /// Roll-forward bookkeeping is needed (unclean shutdown).
    #[inline]
    pub fn need_fsync_data_record(&self) -> bool {
        !self.ckpt.cp.is_set(CP_UMOUNT_FLAG)
    }

    pub fn cp(&self) -> &F2fsCheckpoint {
        &self.ckpt.cp
    }

    // === reporting ===

    pub(crate) fn note_bug(&mut self, code: &'static str, msg: String) {
        self.run.bug_on = true;
        self.report.push(Finding::err(code, msg));
    }

    /// Records a repair. A check-only run never repairs, so there the
    /// correction it would have made is reported as a warning instead.
    pub(crate) fn note_fix(&mut self, code: &'static str, msg: String) {
        if self.run.fix_on {
            self.report.fix(code, msg);
        } else {
            self.report.push(Finding::warn(code, msg));
        }
    }

    pub(crate) fn note_info(&mut self, code: &'static str, msg: String) {
        log::info!("[{code}] {msg}");
        self.report.push(Finding::info(code, msg));
    }

    pub(crate) fn note_warn(&mut self, code: &'static str, msg: String) {
        log::warn!("[{code}] {msg}");
        self.report.push(Finding::warn(code, msg));
    }

    /// Moves what the session collected into `rep`.
    pub(crate) fn drain_into(&mut self, rep: &mut VerifyReport) {
        rep.findings.append(&mut self.report.findings);
        rep.fixes.append(&mut self.report.fixes);
        rep.exit |= self.report.exit;
    }

    // === block IO ===

    pub(crate) fn read_block(&mut self, blkaddr: u32, buf: &mut [u8]) -> FsckResult {
        self.io
            .read_block(blkaddr as u64, buf)
            .map_err(|e| FsckError::from(e).blk(blkaddr))
    }

    /// Writes a block, unless the run may not touch the device.
    pub(crate) fn write_block(&mut self, blkaddr: u32, buf: &[u8]) -> FsckResult {
        if !self.writable() {
            log::debug!("skip write of block {blkaddr:#x}");
            return Ok(());
        }
        self.io
            .write_block(blkaddr as u64, buf)
            .map_err(|e| FsckError::from(e).blk(blkaddr))
    }

    pub(crate) fn flush(&mut self) -> FsckResult {
        if !self.writable() {
            return Ok(());
        }
        self.io.flush().map_err(FsckError::from)
    }

    pub(crate) fn read_node(&mut self, blkaddr: u32) -> FsckResult<Box<F2fsNode>> {
        let mut node = F2fsNode::new_boxed();
        self.read_block(blkaddr, node.as_mut_bytes())?;
        Ok(node)
    }

    /// Writes a node in place, refreshing the inode checksum.
    pub(crate) fn write_node(&mut self, blkaddr: u32, node: &mut F2fsNode) -> FsckResult {
        if node.is_inode() && self.meta.has_feature(F2FS_FEATURE_INODE_CHKSUM) {
            let crc = crate::f2fs::crc::inode_chksum(self.meta.chksum_seed, node.as_bytes());
            node.set_i_inode_checksum(crc);
        }
        self.write_block(blkaddr, node.as_bytes())
    }

    pub(crate) fn read_sum_block(&mut self, blkaddr: u32) -> FsckResult<Box<F2fsSummaryBlock>> {
        let mut sum = Box::new(F2fsSummaryBlock::default());
        self.read_block(blkaddr, sum.as_mut_bytes())?;
        Ok(sum)
    }

    /// Reads the data block at `blkaddr` after checking it lies in the
    /// main area.
    pub fn read_data_block(&mut self, blkaddr: u32, buf: &mut [u8]) -> FsckResult {
        if !self.meta.is_valid_blkaddr(blkaddr) {
            return Err(FsckError::device_pointer("data block outside the main area").blk(blkaddr));
        }
        self.read_block(blkaddr, buf)
    }

    // === cursegs ===

    #[inline]
    pub fn curseg(&self, ty: usize) -> &Curseg {
        &self.cursegs[ty]
    }

    /// True when `segno` is one of the active logs.
    pub fn is_cur_segno(&self, segno: u32) -> bool {
        self.cursegs.iter().any(|c| c.segno == segno)
    }

    /// Next block the log `ty` would write.
    #[inline]
    pub fn next_free_blkaddr(&self, ty: usize) -> u32 {
        let c = &self.cursegs[ty];
        self.meta.start_block(c.segno) + c.next_blkoff as u32
    }

    /// Segment usable for allocation. Every segment is on a conventional
    /// device; on zoned ones the section must fit the zone.
    #[inline]
    pub fn is_usable_seg(&self, segno: u32) -> bool {
        segno < self.meta.main_segments
    }

    #[inline]
    pub fn seg_entry(&self, segno: u32) -> &SegEntry {
        &self.sm.entries[segno as usize]
    }

    #[inline]
    pub fn seg_entry_mut(&mut self, segno: u32) -> &mut SegEntry {
        &mut self.sm.entries[segno as usize]
    }

    /// Free segments as the checkpoint will record them.
    pub fn free_segments(&self) -> u32 {
        (0..self.meta.main_segments)
            .filter(|&s| {
                self.sm.entries[s as usize].valid_blocks == 0
                    && self.is_usable_seg(s)
                    && !self.is_cur_segno(s)
            })
            .count() as u32
    }

    /// Decodes a block-sized buffer as a typed on-disk block.
    pub(crate) fn decode<T: FromBytes + zerocopy::KnownLayout + zerocopy::Immutable>(
        buf: &[u8],
    ) -> FsckResult<T> {
        T::read_from_prefix(buf)
            .map(|(v, _)| v)
            .map_err(|_| FsckError::fatal("short block"))
    }
}
