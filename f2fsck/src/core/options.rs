// SPDX-License-Identifier: MIT

use bitflags::bitflags;

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct VerifyPhases: u32 {
        /// Superblock and checkpoint state.
        const SUPER      = 1 << 0;
        /// Current segments and zone write pointers.
        const CURSEG     = 1 << 1;
        /// Fsync chain left after an unclean shutdown.
        const RECOVERY   = 1 << 2;
        /// Orphans, quota inodes and the tree walk from the root.
        const TREE       = 1 << 3;
        /// Hard links, quota usage, unreachable nodes.
        const CROSSREF   = 1 << 4;
        /// Global counters and bitmaps.
        const COUNTERS   = 1 << 5;
        /// Metadata rewrite and checkpoint commit.
        const COMMIT     = 1 << 6;
        const ALL        = u32::MAX;
    }
}

/// Generic options that the FS can encapsulate/extend.
pub trait VerifierOptionsLike {
    fn phases(&self) -> VerifyPhases {
        VerifyPhases::ALL
    }
    fn fail_fast(&self) -> bool {
        false
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PreenMode {
    /// Regular check.
    #[default]
    Off,
    /// Only the [`PreenChecks`] list; the tree walk runs if one of them fails.
    Quick,
    /// Regular check that never resets `i_gc_failures`.
    Full,
}

impl PreenMode {
    pub fn from_level(level: u8) -> Option<Self> {
        match level {
            0 => Some(PreenMode::Off),
            1 => Some(PreenMode::Quick),
            2 => Some(PreenMode::Full),
            _ => None,
        }
    }
}

bitflags! {
    /// Closed list of checks run by [`PreenMode::Quick`].
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct PreenChecks: u32 {
        const SIT_FREE_SEGMENTS = 1 << 0;
        const NAT_NODE_COUNT    = 1 << 1;
        const CP_FREE_SEGMENTS  = 1 << 2;
        const CP_NODE_COUNT     = 1 << 3;
        const NAT_PLACEMENT     = 1 << 4;
        const ORPHAN_INODES     = 1 << 5;
        const QUOTA_INODES      = 1 << 6;
        const CP_INODE_COUNT    = 1 << 7;
        const ALL = Self::SIT_FREE_SEGMENTS.bits()
            | Self::NAT_NODE_COUNT.bits()
            | Self::CP_FREE_SEGMENTS.bits()
            | Self::CP_NODE_COUNT.bits()
            | Self::NAT_PLACEMENT.bits()
            | Self::ORPHAN_INODES.bits()
            | Self::QUOTA_INODES.bits()
            | Self::CP_INODE_COUNT.bits();
    }
}

/// Engine options.
#[derive(Clone, Debug)]
pub struct CheckOptions {
    /// Commit repairs to the image.
    pub fix: bool,
    /// Check even if the image looks clean.
    pub force: bool,
    pub preen: PreenMode,
    pub phases: VerifyPhases,
    pub fail_fast: bool,
    /// Fix only when the image carries an error mark; otherwise skip.
    pub auto_fix: bool,
    /// Reconnect unreachable files under `/lost+found`.
    pub lost_found: bool,
    /// Compute repairs without writing them.
    pub dry_run: bool,
    pub preen_checks: PreenChecks,
    /// Directory nesting limit for the tree walk.
    pub max_depth: u32,
}

impl CheckOptions {
    pub fn check_only() -> Self {
        Self::default()
    }

    pub fn repair() -> Self {
        Self {
            fix: true,
            ..Self::default()
        }
    }

    /// True when repairs may reach the device.
    #[inline]
    pub fn writes_enabled(&self) -> bool {
        self.fix && !self.dry_run
    }
}

impl VerifierOptionsLike for CheckOptions {
    fn phases(&self) -> VerifyPhases {
        self.phases
    }
    fn fail_fast(&self) -> bool {
        self.fail_fast
    }
}

impl Default for CheckOptions {
    fn default() -> Self {
        Self {
            fix: false,
            force: false,
            preen: PreenMode::Off,
            phases: VerifyPhases::ALL,
            fail_fast: false,
            auto_fix: false,
            lost_found: true,
            dry_run: false,
            preen_checks: PreenChecks::ALL,
            max_depth: 256,
        }
    }
}
