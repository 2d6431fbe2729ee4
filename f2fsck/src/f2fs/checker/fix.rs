// SPDX-License-Identifier: MIT
//! Commit of the repairs
//!
//! Once the walk and the cross-check are done, the NAT, SIT, logs and
//! checkpoint are rewritten from what the walk observed. The superblock
//! error marks are cleared last.

use f2io::prelude::*;

use crate::core::{errors::*, report::ExitCode};
use crate::f2fs::{
    constant::*,
    mount::superblock::{SbMask, SbState, update_superblock},
    session::CheckSession,
};

impl<'a, IO: F2IO + ?Sized> CheckSession<'a, IO> {
    /// Drops every NAT entry the walk never reached.
    pub(crate) fn fix_nat_entries(&mut self) -> FsckResult {
        for nid in self.unreached_nids() {
            self.nullify_nat_entry(nid)?;
        }
        Ok(())
    }

    /// Rewrites the metadata when the run found something to fix.
    pub(crate) fn commit_repairs(&mut self) -> FsckResult {
        let writable = self.run.fix_on && !self.opts.dry_run;
        let cp = self.ckpt.cp;

        // check-only runs leave the image and the repair list alone
        if !self.run.fix_on {
            return Ok(());
        }
        if self.run.force_commit || writable {
            if self.run.force_commit || self.run.bug_on || self.run.quota_fixed {
                // host-managed devices flushed their journals in the pre-pass
                if !self.run.zoned_hm {
                    self.flush_journal_entries()?;
                }
                self.fix_hard_links()?;
                self.fix_nat_entries()?;
                self.rewrite_sit_area_bitmap()?;
                if self.run.zoned_hm {
                    self.write_curseg_sums()?;
                    if self.run.roll_forward {
                        self.restore_curseg_warm_node();
                    }
                    self.write_curseg_info();
                } else {
                    self.fix_curseg_info(false)?;
                }
                self.write_checkpoints()?;
            } else if cp.is_set(CP_FSCK_FLAG) || cp.is_set(CP_QUOTA_NEED_FSCK_FLAG) || self.run.fix_chksum {
                log::info!("clear stale fsck marks in the checkpoint");
                self.write_checkpoints()?;
            }
            self.clear_sb_errors()?;
            self.run.committed = self.writable();
        }
        Ok(())
    }

    /// Clears the kernel's stop reasons and error records once the
    /// repairs are on disk.
    fn clear_sb_errors(&mut self) -> FsckResult {
        let state = self.run.invalid_sb;
        if state.intersects(SbState::FORCE_STOP | SbState::ABNORMAL_STOP) {
            self.sb.s_stop_reason = [0; MAX_STOP_REASON];
        }
        if state.contains(SbState::FS_ERRORS) {
            self.sb.s_errors = [0; MAX_F2FS_ERRORS];
        }
        if state.intersects(SbState::NEED_FIX) && self.writable() {
            update_superblock(&mut *self.io, &mut self.sb, SbMask::ALL)?;
            crate::fsck_fix!(self, "SB.ERRORS", "clear stop reasons and error records");
        }
        Ok(())
    }

    /// Exit status for the run: clean, repaired, or left broken.
    pub(crate) fn exit_status(&self) -> ExitCode {
        if !self.run.bug_on {
            ExitCode::SUCCESS
        } else if self.run.committed {
            ExitCode::ERRORS_CORRECTED
        } else {
            ExitCode::UNCORRECTED
        }
    }
}
