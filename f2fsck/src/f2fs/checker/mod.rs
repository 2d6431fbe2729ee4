// SPDX-License-Identifier: MIT
//! Consistency checker phases
//!
//! Each submodule adds one part of the check to [`CheckSession`]; this
//! module wires them into the [`FsChecker`] phases. Validators return
//! non-fatal errors for the subtree they were looking at: the caller
//! detaches that subtree and the walk goes on. Fatal errors abort the run.

mod bitmaps;
mod data;
mod dir;
mod extent;
mod fix;
mod hardlink;
mod inode;
mod lost_found;
mod node;
mod orphan;
mod preen;
mod quota;
mod verify;

use f2io::prelude::*;

use crate::core::{
    checker::FsChecker,
    errors::*,
    options::{CheckOptions, PreenMode},
    report::VerifyReport,
};
use crate::f2fs::{
    constant::*,
    mount::superblock::SbState,
    session::{CheckSession, ChildInfo, ComprBlkCnt},
    types::NodeKind,
};

/// Splits a validator result: `Ok(true)` when the subtree is sound,
/// `Ok(false)` when it should be detached, `Err` only for fatal errors.
pub(crate) fn subtree_ok(r: FsckResult) -> FsckResult<bool> {
    match r {
        Ok(()) => Ok(true),
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => {
            log::debug!("subtree rejected: {e}");
            Ok(false)
        }
    }
}

impl<'a, IO: F2IO + ?Sized> CheckSession<'a, IO> {
    /// Records a non-fatal phase error as a finding and keeps going.
    fn settle(&mut self, r: FsckResult, code: &'static str) -> FsResult {
        match r {
            Ok(()) => Ok(()),
            Err(e) if e.is_fatal() => Err(e.into()),
            Err(e) => {
                crate::fsck_bug!(self, true, code, "{e}");
                Ok(())
            }
        }
    }

    fn walk_root(&mut self) -> FsckResult {
        let root = self.meta.root_ino;
        self.sanity_check_nat(root)?;
        let mut blk_cnt = 1u64;
        let mut cbc = ComprBlkCnt::default();
        let mut child = ChildInfo {
            p_ino: root,
            ..ChildInfo::default()
        };
        self.chk_node_blk(None, root, F2FS_FT_DIR, NodeKind::Inode, &mut blk_cnt, &mut cbc, &mut child)
    }

    /// Preen decision: a clean quick check ends the run.
    fn preen_passes(&mut self) -> FsResult<bool> {
        match self.opts.preen {
            PreenMode::Quick if !self.run.fix_on && !self.run.bug_on => match self.chk_meta() {
                Ok(()) => {
                    log::info!("no error was reported");
                    Ok(true)
                }
                Err(e) if e.is_fatal() => Err(e.into()),
                Err(e) => {
                    log::info!("quick check failed ({e}), running the full check");
                    if !self.meta.readonly() {
                        self.run.fix_on = true;
                    }
                    Ok(false)
                }
            },
            PreenMode::Off => Ok(false),
            _ => {
                self.run.fix_on = true;
                Ok(false)
            }
        }
    }
}

impl<'a, IO: F2IO + ?Sized> FsChecker for CheckSession<'a, IO> {
    type Options = CheckOptions;

    fn quick_check(&mut self, _opt: &CheckOptions, rep: &mut VerifyReport) -> FsResult<bool> {
        if self.run.skip {
            self.drain_into(rep);
            return Ok(true);
        }
        self.fsck_init()?;
        if self.run.roll_forward && self.run.zoned_hm {
            self.save_curseg_warm_node();
        }
        self.chk_and_fix_write_pointers()?;
        self.chk_curseg_info();

        let done = self.preen_passes()?;
        self.drain_into(rep);
        if done {
            rep.exit = self.exit_status();
        }
        Ok(done)
    }

    fn check_super(&mut self, _opt: &CheckOptions, rep: &mut VerifyReport) -> FsResult {
        let cp = self.ckpt.cp;
        if cp.is_set(CP_LARGE_NAT_BITMAP_FLAG) && { cp.checksum_offset } as usize != CP_MIN_CHKSUM_OFFSET {
            crate::fsck_bug!(
                self,
                true,
                "CP.CHKSUM",
                "Deprecated layout of large_nat_bitmap, chksum_offset:{}",
                { cp.checksum_offset }
            );
            self.run.fix_chksum = true;
        }
        let state = self.run.invalid_sb;
        if state.contains(SbState::INVALID) {
            self.note_warn("SB.COPY", alloc::string::String::from("one superblock copy is invalid"));
        }
        if state.intersects(SbState::ABNORMAL_STOP | SbState::FS_ERRORS) {
            self.note_info("SB.ERRORS", alloc::format!("kernel recorded errors: {state:?}"));
        }
        self.drain_into(rep);
        Ok(())
    }

    fn check_cursegs(&mut self, _opt: &CheckOptions, rep: &mut VerifyReport) -> FsResult {
        if let Err(e) = self.check_curseg_offsets(false) {
            crate::fsck_bug!(self, true, "CURSEG.OFFSET", "{e}");
        }
        self.drain_into(rep);
        Ok(())
    }

    fn check_recovery(&mut self, _opt: &CheckOptions, rep: &mut VerifyReport) -> FsResult {
        if self.run.roll_forward {
            self.note_info(
                "ROLL.PENDING",
                alloc::string::String::from("fsync data left for the kernel to roll forward"),
            );
        }
        self.drain_into(rep);
        Ok(())
    }

    fn check_tree(&mut self, _opt: &CheckOptions, rep: &mut VerifyReport) -> FsResult {
        let r = self.chk_quota_node();
        self.settle(r, "QUOTA.NODE")?;
        let r = self.chk_orphan_node();
        self.settle(r, "ORPHAN.LIST")?;
        let r = self.walk_root();
        self.settle(r, "ROOT.INODE")?;
        self.drain_into(rep);
        Ok(())
    }

    fn check_cross_reference(&mut self, _opt: &CheckOptions, rep: &mut VerifyReport) -> FsResult {
        let r = self.chk_quota_files();
        self.settle(r, "QUOTA.FILE")?;
        let r = self.verify_reachability();
        self.settle(r, "LPF.RECONNECT")?;
        self.drain_into(rep);
        Ok(())
    }

    fn check_counters(&mut self, _opt: &CheckOptions, rep: &mut VerifyReport) -> FsResult {
        let r = self.fsck_verify();
        self.settle(r, "FS.VERIFY")?;
        self.drain_into(rep);
        rep.exit = self.exit_status();
        Ok(())
    }

    fn commit(&mut self, _opt: &CheckOptions, rep: &mut VerifyReport) -> FsResult {
        let r = self.commit_repairs();
        self.settle(r, "FS.COMMIT")?;
        self.drain_into(rep);
        rep.exit = self.exit_status();
        Ok(())
    }
}
