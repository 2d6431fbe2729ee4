// SPDX-License-Identifier: MIT
pub mod checkpoint;
pub mod dentry;
pub mod nat;
pub mod node;
pub mod orphan;
pub mod sit;
pub mod summary;
pub mod superblock;
pub mod xattr;

pub use checkpoint::*;
pub use dentry::*;
pub use nat::*;
pub use node::*;
pub use orphan::*;
pub use sit::*;
pub use summary::*;
pub use superblock::*;
pub use xattr::*;
