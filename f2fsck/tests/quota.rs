// SPDX-License-Identifier: MIT
mod common;

use common::*;
use f2fsck::prelude::*;

fn quota_image() -> (Image, u32) {
    let (mut b, _) = sample_tree();
    let q = b.user_quota();
    (b.build(), q)
}

fn set_u64(buf: &mut [u8], at: usize, v: u64) {
    buf[at..at + 8].copy_from_slice(&v.to_le_bytes());
}

#[test]
fn matching_usage_checks_clean() {
    let (mut img, _) = quota_image();
    let (rep, stats) = img.run_counted(CheckOptions::check_only());
    assert!(!rep.has_error(), "unexpected errors:\n{}", rep.errors_only());
    assert!(!rep.has_code("QUOTA.USAGE"));
    assert!(stats.is_read_only());

    let quick = CheckOptions {
        preen: PreenMode::Quick,
        ..CheckOptions::check_only()
    };
    let rep = img.run(quick);
    assert_eq!(rep.exit, ExitCode::SUCCESS);
}

#[test]
fn inode_count_drift_is_reported() {
    let (mut img, q) = quota_image();
    set_u64(img.quota_entry_mut(q), 24, 9);

    let (rep, stats) = img.run_counted(CheckOptions::check_only());
    assert!(rep.has_code("QUOTA.USAGE"), "{}", rep);
    let f = rep.findings.iter().find(|f| f.code == "QUOTA.USAGE").unwrap();
    assert!(f.msg.contains("id 0: inodes 9 vs 5"), "{}", f.msg);
    assert_eq!(rep.exit, ExitCode::UNCORRECTED);
    assert_eq!(stats.writes, 0);
}

#[test]
fn space_drift_is_reported() {
    let (mut img, q) = quota_image();
    set_u64(img.quota_entry_mut(q), 48, 0);

    let rep = img.run(CheckOptions::check_only());
    assert!(rep.has_code("QUOTA.USAGE"), "{}", rep);
    assert!(!rep.has_code("QUOTA.FILE"));
}

#[test]
fn bad_magic_makes_file_unreadable() {
    let (mut img, q) = quota_image();
    let blk = img.data_addr(q, 0);
    img.block_mut(blk)[..4].copy_from_slice(&[0; 4]);

    let rep = img.run(CheckOptions::check_only());
    assert!(rep.has_code("QUOTA.FILE"), "{}", rep);
    assert!(!rep.has_code("QUOTA.USAGE"));
    assert!(!rep.has_code("QUOTA.INODE"));
}
