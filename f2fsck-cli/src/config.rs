// SPDX-License-Identifier: MIT

use serde::Deserialize;
use std::fs;
use std::path::Path;

use anyhow::{Context, bail};
use f2fsck::prelude::{CheckOptions, PreenChecks, PreenMode};

/// Options file; every key is optional and command-line flags win.
///
/// ```toml
/// fix = true
/// preen = 1
/// lost_found = false
/// preen_checks = ["sit_free_segments", "cp_node_count"]
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileOptions {
    pub fix: Option<bool>,
    pub auto_fix: Option<bool>,
    pub force: Option<bool>,
    pub preen: Option<u8>,
    pub dry_run: Option<bool>,
    pub fail_fast: Option<bool>,
    pub lost_found: Option<bool>,
    pub max_depth: Option<u32>,
    pub preen_checks: Option<Vec<String>>,
}

impl FileOptions {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let opts: FileOptions = toml::from_str(&content)?;
        Ok(opts)
    }

    /// Engine options from the file alone.
    pub fn to_options(&self) -> anyhow::Result<CheckOptions> {
        let mut opts = CheckOptions::default();
        opts.fix = self.fix.unwrap_or(opts.fix);
        opts.auto_fix = self.auto_fix.unwrap_or(opts.auto_fix);
        opts.force = self.force.unwrap_or(opts.force);
        opts.dry_run = self.dry_run.unwrap_or(opts.dry_run);
        opts.fail_fast = self.fail_fast.unwrap_or(opts.fail_fast);
        opts.lost_found = self.lost_found.unwrap_or(opts.lost_found);
        opts.max_depth = self.max_depth.unwrap_or(opts.max_depth);
        if let Some(level) = self.preen {
            opts.preen = preen_mode(level)?;
        }
        if let Some(names) = &self.preen_checks {
            opts.preen_checks = parse_preen_checks(names)?;
        }
        Ok(opts)
    }
}

pub fn preen_mode(level: u8) -> anyhow::Result<PreenMode> {
    match PreenMode::from_level(level) {
        Some(mode) => Ok(mode),
        None => bail!("preen level must be 0, 1 or 2 (got {level})"),
    }
}

fn parse_preen_checks(names: &[String]) -> anyhow::Result<PreenChecks> {
    let mut checks = PreenChecks::empty();
    for name in names {
        match PreenChecks::from_name(&name.to_ascii_uppercase()) {
            Some(flag) => checks |= flag,
            None => bail!("unknown preen check '{name}'"),
        }
    }
    Ok(checks)
}
