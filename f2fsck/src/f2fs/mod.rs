// SPDX-License-Identifier: MIT
//! F2FS consistency checker
//!
//! [`CheckSession::open`] loads an image the way the kernel mounts it,
//! then the [`FsChecker`](crate::core::checker::FsChecker) phases walk the
//! node tree, compare it with the on-disk accounting, and optionally
//! repair what they find.

pub mod allocator;
pub mod checker;
pub mod constant;
pub mod crc;
pub mod hash;
pub mod meta;
pub mod mount;
pub mod session;
pub mod types;

pub use session::CheckSession;

pub mod prelude {
    pub use super::meta::F2fsMeta;
    pub use super::session::{
        CheckCounters, CheckSession, ChildInfo, ComprBlkCnt, DqUsage, HardLink, RunState,
    };
    pub use super::types::NodeKind;
    pub use f2io::prelude::*;
}
