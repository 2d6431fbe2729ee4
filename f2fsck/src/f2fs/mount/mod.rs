// SPDX-License-Identifier: MIT
//! Image loading
//!
//! Everything needed before the walk: superblock, checkpoint pack, NAT and
//! SIT tables, the active logs and the roll-forward marks.

pub mod checkpoint;
pub mod curseg;
pub mod nat;
pub mod recovery;
pub mod sit;
pub mod superblock;

pub use checkpoint::{CheckpointState, load_checkpoint};
pub use curseg::SumKind;
pub use superblock::{LoadedSuper, SbMask, SbState, validate_super_block};
