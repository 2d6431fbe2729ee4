// SPDX-License-Identifier: MIT

// === Sub-modules ===
pub mod bitmap;
pub mod checker;
pub mod errors;
pub mod macros;
pub mod options;
pub mod report;

// === Core Traits ===
pub mod traits {
    pub use super::bitmap::{BitmapOps, MsbBitmapOps};
    pub use super::checker::FsChecker;
    pub use super::options::VerifierOptionsLike;
}

pub use options::CheckOptions;
pub use report::{Finding, Severity, VerifyReport};
