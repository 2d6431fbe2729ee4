// SPDX-License-Identifier: MIT

pub use super::options::{VerifierOptionsLike, VerifyPhases};
pub use super::report::{ExitCode, Finding, Severity, VerifyReport};

use super::errors::FsResult;

/// Phase-driven consistency checker.
///
/// Implementors override the phases they need; `check_with` runs them in
/// order and stops early on a fatal error or, with `fail_fast`, after the
/// first phase that records an error.
pub trait FsChecker {
    type Options: VerifierOptionsLike + Default;

    fn check_with(&mut self, opt: &Self::Options) -> FsResult<VerifyReport> {
        let mut rep = VerifyReport::default();
        if self.quick_check(opt, &mut rep)? {
            return Ok(rep);
        }
        self.run_phase(opt, &mut rep, VerifyPhases::SUPER, Self::check_super)?;
        self.run_phase(opt, &mut rep, VerifyPhases::CURSEG, Self::check_cursegs)?;
        self.run_phase(opt, &mut rep, VerifyPhases::RECOVERY, Self::check_recovery)?;
        self.run_phase(opt, &mut rep, VerifyPhases::TREE, Self::check_tree)?;
        self.run_phase(
            opt,
            &mut rep,
            VerifyPhases::CROSSREF,
            Self::check_cross_reference,
        )?;
        self.run_phase(opt, &mut rep, VerifyPhases::COUNTERS, Self::check_counters)?;
        self.run_phase(opt, &mut rep, VerifyPhases::COMMIT, Self::commit)?;
        Ok(rep)
    }

    fn check_all(&mut self) -> FsResult<VerifyReport> {
        self.check_with(&Self::Options::default())
    }

    /// Runs before every phase. Returns `true` when the full check can be skipped.
    fn quick_check(&mut self, _opt: &Self::Options, _rep: &mut VerifyReport) -> FsResult<bool> {
        Ok(false)
    }

    fn check_super(&mut self, _opt: &Self::Options, _rep: &mut VerifyReport) -> FsResult {
        Ok(())
    }
    fn check_cursegs(&mut self, _opt: &Self::Options, _rep: &mut VerifyReport) -> FsResult {
        Ok(())
    }
    fn check_recovery(&mut self, _opt: &Self::Options, _rep: &mut VerifyReport) -> FsResult {
        Ok(())
    }
    fn check_tree(&mut self, _opt: &Self::Options, _rep: &mut VerifyReport) -> FsResult {
        Ok(())
    }
    fn check_cross_reference(
        &mut self,
        _opt: &Self::Options,
        _rep: &mut VerifyReport,
    ) -> FsResult {
        Ok(())
    }
    fn check_counters(&mut self, _opt: &Self::Options, _rep: &mut VerifyReport) -> FsResult {
        Ok(())
    }
    fn commit(&mut self, _opt: &Self::Options, _rep: &mut VerifyReport) -> FsResult {
        Ok(())
    }

    fn run_phase<F>(
        &mut self,
        opt: &Self::Options,
        rep: &mut VerifyReport,
        phase: VerifyPhases,
        f: F,
    ) -> FsResult
    where
        F: Fn(&mut Self, &Self::Options, &mut VerifyReport) -> FsResult,
    {
        if opt.phases().contains(phase) {
            if opt.fail_fast() && rep.has_error() {
                return Ok(());
            }
            f(self, opt, rep)?;
        }
        Ok(())
    }
}
