// SPDX-License-Identifier: MIT
#![cfg_attr(not(feature = "std"), no_std)]

#[macro_use]
extern crate alloc;

// Core Modules
pub mod core;
pub mod f2fs;

// Reusable types and traits
pub use core::traits::*;

// Error types
pub use core::errors::*;

/// F2FS checker and repair engine.
///
/// See [`f2fs::CheckSession`] and [`core::CheckOptions`].
pub mod prelude {
    pub use super::core::errors::*;
    pub use super::core::options::{CheckOptions, PreenChecks, PreenMode, VerifyPhases};
    pub use super::core::report::{ExitCode, Finding, Severity, VerifyReport};
    pub use super::core::traits::*;
    pub use super::f2fs::prelude::*;
}
