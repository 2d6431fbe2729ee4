// SPDX-License-Identifier: MIT

use alloc::{string::String, vec::Vec};
use core::fmt;

use bitflags::bitflags;

/// Ordered from least to most severe.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Warn,
    Error,
}

impl Severity {
    fn tag(self) -> &'static str {
        match self {
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERR ",
        }
    }
}

/// One line of the report. `code` is a stable dotted identifier such as
/// `INODE.LINKS` that tests and scripts can match on.
#[derive(Clone, Debug)]
pub struct Finding {
    pub sev: Severity,
    pub code: &'static str,
    pub msg: String,
}

impl Finding {
    pub fn new(sev: Severity, code: &'static str, msg: impl Into<String>) -> Self {
        Self {
            sev,
            code,
            msg: msg.into(),
        }
    }

    pub fn info(code: &'static str, msg: impl Into<String>) -> Self {
        Self::new(Severity::Info, code, msg)
    }

    pub fn warn(code: &'static str, msg: impl Into<String>) -> Self {
        Self::new(Severity::Warn, code, msg)
    }

    pub fn err(code: &'static str, msg: impl Into<String>) -> Self {
        Self::new(Severity::Error, code, msg)
    }
}

bitflags! {
    /// Process exit status. Bits combine, e.g. corrected errors on a
    /// cancelled run.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct ExitCode: u32 {
        const ERRORS_CORRECTED = 1 << 0;
        const SHOULD_REBOOT    = 1 << 1;
        const UNCORRECTED      = 1 << 2;
        const OPERATIONAL      = 1 << 3;
        const USAGE            = 1 << 4;
        const CANCELLED        = 1 << 5;
        const SHARED_LIB       = 1 << 7;
    }
}

impl ExitCode {
    pub const SUCCESS: ExitCode = ExitCode::empty();
}

/// Everything a run found and every repair it applied, with the exit
/// status summarizing both.
#[derive(Clone, Debug, Default)]
pub struct VerifyReport {
    pub findings: Vec<Finding>,
    pub fixes: Vec<Finding>,
    pub exit: ExitCode,
}

impl VerifyReport {
    pub fn push(&mut self, f: Finding) {
        self.findings.push(f)
    }

    pub fn fix(&mut self, code: &'static str, msg: impl Into<String>) {
        self.fixes.push(Finding::info(code, msg))
    }

    pub fn has_error(&self) -> bool {
        self.findings.iter().any(|f| f.sev == Severity::Error)
    }

    pub fn ok(&self) -> bool {
        !self.has_error()
    }

    pub fn has_code(&self, code: &str) -> bool {
        self.findings.iter().any(|f| f.code == code)
    }

    /// True when a repair carrying `code` was applied.
    pub fn fixed(&self, code: &str) -> bool {
        self.fixes.iter().any(|f| f.code == code)
    }

    pub fn exit_code(&self) -> u32 {
        self.exit.bits()
    }

    pub fn display_with(&self, opts: ReportDisplayOpts) -> ReportDisplay<'_> {
        ReportDisplay { rep: self, opts }
    }

    /// Errors only, no fixes, no summary.
    pub fn errors_only(&self) -> ReportDisplay<'_> {
        self.display_with(ReportDisplayOpts {
            min_level: Severity::Error,
            show_fixes: false,
            ..ReportDisplayOpts::default()
        })
    }
}

#[derive(Copy, Clone, Debug)]
pub struct ReportDisplayOpts {
    pub min_level: Severity,
    /// Printed before every line.
    pub prefix: &'static str,
    pub show_summary: bool,
    pub show_fixes: bool,
    /// Width the code column is padded to.
    pub pad_code: usize,
}

impl Default for ReportDisplayOpts {
    fn default() -> Self {
        Self {
            min_level: Severity::Info,
            prefix: "",
            show_summary: false,
            show_fixes: true,
            pad_code: 14,
        }
    }
}

pub struct ReportDisplay<'a> {
    rep: &'a VerifyReport,
    opts: ReportDisplayOpts,
}

impl ReportDisplay<'_> {
    fn line(&self, f: &mut fmt::Formatter<'_>, tag: &str, it: &Finding) -> fmt::Result {
        let o = &self.opts;
        writeln!(f, "{}{tag}: {:<w$} {}", o.prefix, it.code, it.msg, w = o.pad_code)
    }
}

impl fmt::Display for ReportDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // info, warn, error
        let mut shown = [0usize; 3];
        for it in self.rep.findings.iter().filter(|it| it.sev >= self.opts.min_level) {
            shown[it.sev as usize] += 1;
            self.line(f, it.sev.tag(), it)?;
        }
        if self.opts.show_fixes {
            for it in &self.rep.fixes {
                self.line(f, "FIX ", it)?;
            }
        }
        if self.opts.show_summary {
            writeln!(
                f,
                "{}Summary: errors={}  warns={}  infos={}  fixes={}  exit={:#x}",
                self.opts.prefix,
                shown[2],
                shown[1],
                shown[0],
                self.rep.fixes.len(),
                self.rep.exit.bits()
            )?;
        }
        Ok(())
    }
}

impl fmt::Display for VerifyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.display_with(ReportDisplayOpts::default()).fmt(f)
    }
}
