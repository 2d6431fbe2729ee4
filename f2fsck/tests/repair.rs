// SPDX-License-Identifier: MIT
mod common;

use common::*;
use f2fsck::f2fs::constant::*;
use f2fsck::prelude::*;

fn overcounted_links() -> (Image, SampleInos) {
    let (b, inos) = sample_tree();
    let mut img = b.build();
    img.edit_node(inos.a, |n| n.i.i_links = 3);
    (img, inos)
}

#[test]
fn check_only_reports_link_count_without_writing() {
    let (mut img, _) = overcounted_links();
    let (rep, stats) = img.run_counted(CheckOptions::check_only());

    assert!(rep.has_code("INODE.LINKS"));
    assert!(rep.fixes.is_empty());
    assert_eq!(rep.exit, ExitCode::UNCORRECTED);
    assert_eq!(stats.writes, 0);
}

#[test]
fn repair_sets_observed_link_count() {
    let (mut img, inos) = overcounted_links();
    let rep = img.run(CheckOptions::repair());

    assert!(rep.has_code("INODE.LINKS"));
    assert_eq!(rep.fixes.len(), 1, "fixes: {:?}", rep.fixes);
    assert!(rep.fixed("INODE.LINKS"));
    assert_eq!(rep.exit, ExitCode::ERRORS_CORRECTED);
    assert_eq!({ img.node(inos.a).i.i_links }, 1);
}

#[test]
fn repair_is_idempotent() {
    let (mut img, _) = overcounted_links();
    img.run(CheckOptions::repair());
    let once = img.bytes.clone();

    let rep = img.run(CheckOptions::repair());
    assert!(!rep.has_error(), "second run still finds:\n{}", rep.errors_only());
    assert!(rep.fixes.is_empty());
    assert_eq!(rep.exit, ExitCode::SUCCESS);
    assert!(img.bytes == once, "second repair changed the image");
}

#[test]
fn dry_run_computes_fixes_but_writes_nothing() {
    let (mut img, _) = overcounted_links();
    let before = img.bytes.clone();
    let opts = CheckOptions {
        dry_run: true,
        ..CheckOptions::repair()
    };
    let (rep, stats) = img.run_counted(opts);

    assert!(rep.has_code("INODE.LINKS"));
    assert_eq!(stats.writes, 0);
    assert_eq!(rep.exit, ExitCode::UNCORRECTED);
    assert!(img.bytes == before);
}

#[test]
fn hard_link_with_missing_name_is_repaired() {
    let (b, inos) = sample_tree();
    let mut img = b.build();
    // drop the second name of `notes`
    let (slot, ino) = img.lookup(ROOT, "notes-ln").expect("notes-ln");
    assert_eq!(ino, inos.notes);
    let blk = img.data_addr(ROOT, 0);
    f2fsck::f2fs::types::DentryLayout::BLOCK.nullify(img.block_mut(blk), slot);

    let rep = img.run(CheckOptions::repair());
    assert!(rep.fixed("INODE.LINKS"));
    assert_eq!({ img.node(inos.notes).i.i_links }, 1);

    let rep = img.run(CheckOptions::check_only());
    assert!(!rep.has_error(), "{}", rep.errors_only());
}

#[test]
fn wrong_dot_entry_is_rewritten() {
    let mut b = ImageBuilder::new();
    b.next_ino(12);
    let sub = b.mkdir(ROOT, "sub");
    assert_eq!(sub, 12);
    b.file(sub, "f", 1);
    let mut img = b.build();
    img.edit_dentry(sub, 0, |de| de.ino = 7);

    let rep = img.run(CheckOptions::check_only());
    assert!(rep.has_code("DENTRY.DOTS"));
    assert_eq!(rep.exit, ExitCode::UNCORRECTED);

    let rep = img.run(CheckOptions::repair());
    assert!(rep.fixed("DENTRY.DOTS"));
    let blk = img.data_addr(sub, 0);
    let de = f2fsck::f2fs::types::DentryLayout::BLOCK.entry(img.block(blk), 0);
    assert_eq!({ de.ino }, 12);

    let rep = img.run(CheckOptions::check_only());
    assert!(!rep.has_error(), "{}", rep.errors_only());
}

#[test]
fn stale_reference_to_owned_block_is_dropped() {
    let mut b = ImageBuilder::new();
    let a = b.file(ROOT, "a", 1);
    let c = b.file(ROOT, "c", 0);
    let mut img = b.build();
    let a_blk = img.data_addr(a, 0);
    img.edit_node(c, |n| {
        n.set_i_addr(0, a_blk);
        n.i.i_blocks = 2;
    });

    let rep = img.run(CheckOptions::check_only());
    assert!(rep.has_code("SSA.DATA"));

    let rep = img.run(CheckOptions::repair());
    assert!(rep.fixed("INODE.ADDR"));
    assert!(rep.fixed("INODE.BLOCKS"));
    let node = img.node(c);
    assert_eq!(node.i_addr(0), 0);
    assert_eq!({ node.i.i_blocks }, 1);
    // the owner keeps its block
    assert_eq!(img.node(a).i_addr(0), a_blk);

    let rep = img.run(CheckOptions::check_only());
    assert!(!rep.has_error(), "{}", rep.errors_only());
}

#[test]
fn wrong_block_count_is_fixed() {
    let (b, inos) = sample_tree();
    let mut img = b.build();
    img.edit_node(inos.a, |n| n.i.i_blocks = 9);

    let rep = img.run(CheckOptions::repair());
    assert!(rep.fixed("INODE.BLOCKS"));
    assert_eq!({ img.node(inos.a).i.i_blocks }, 3);
}

#[test]
fn directory_link_count_is_fixed() {
    let (b, _) = sample_tree();
    let mut img = b.build();
    img.edit_node(ROOT, |n| n.i.i_links = 7);

    let rep = img.run(CheckOptions::check_only());
    assert!(rep.has_code("DIR.LINKS"));

    let rep = img.run(CheckOptions::repair());
    assert!(rep.fixed("DIR.LINKS"));
    // root holds one subdirectory
    assert_eq!({ img.node(ROOT).i.i_links }, 3);
}

#[test]
fn checkpoint_counter_mismatch_is_rewritten() {
    let (b, _) = sample_tree();
    let mut img = b.build();
    img.edit_checkpoint(|cp| cp.valid_block_count = { cp.valid_block_count } + 5);

    let rep = img.run(CheckOptions::check_only());
    assert!(rep.has_code("CP.BLOCKS"));

    let rep = img.run(CheckOptions::repair());
    assert_eq!(rep.exit, ExitCode::ERRORS_CORRECTED);

    let rep = img.run(CheckOptions::check_only());
    assert!(!rep.has_error(), "{}", rep.errors_only());
}

fn nat_entry_outside_main_area() -> Image {
    let (b, _) = sample_tree();
    let mut img = b.build();
    img.edit_nat(300, |e| {
        e.ino = 300;
        e.block_addr = 0xff_ff00;
    });
    img
}

#[test]
fn nat_entry_with_address_outside_main_is_reported() {
    let mut img = nat_entry_outside_main_area();
    let (rep, stats) = img.run_counted(CheckOptions::check_only());

    assert!(rep.has_code("NAT.INO"), "{}", rep.errors_only());
    assert!(rep.has_code("NAT.UNREACHABLE"));
    assert!(rep.fixes.is_empty());
    assert_eq!(rep.exit, ExitCode::UNCORRECTED);
    assert_eq!(stats.writes, 0);
}

#[test]
fn nat_entry_with_address_outside_main_is_nullified() {
    let mut img = nat_entry_outside_main_area();
    let rep = img.run(CheckOptions::repair());

    assert!(rep.has_code("NAT.INO"));
    assert!(rep.fixed("NAT.NULLIFY"), "fixes: {:?}", rep.fixes);
    assert_eq!(rep.exit, ExitCode::ERRORS_CORRECTED);
    let e = img.nat_entry(300);
    assert_eq!({ e.block_addr }, 0);
    assert_eq!({ e.ino }, 0);

    let rep = img.run(CheckOptions::check_only());
    assert!(!rep.has_error(), "{}", rep.errors_only());
}

/// Warm data segment typed as a cold node segment in the SIT.
fn mistyped_sit_segment() -> Image {
    let (b, _) = sample_tree();
    let mut img = b.build();
    img.edit_sit(CURSEG_WARM_DATA as u32, |e| {
        let valid = e.valid_blocks();
        e.vblocks = ((CURSEG_COLD_NODE as u16) << SIT_VBLOCKS_SHIFT) | valid;
    });
    img
}

#[test]
fn check_only_with_bad_sit_type_records_no_fix() {
    let mut img = mistyped_sit_segment();
    let before = img.bytes.clone();
    let (rep, stats) = img.run_counted(CheckOptions::check_only());

    assert!(rep.has_code("CURSEG.TYPE"), "{}", rep.errors_only());
    assert!(rep.has_code("SIT.TYPE"));
    assert!(rep.fixes.is_empty(), "check-only listed fixes: {:?}", rep.fixes);
    assert_eq!(rep.exit, ExitCode::UNCORRECTED);
    assert_eq!(stats.writes, 0);
    assert!(img.bytes == before);
}

#[test]
fn repair_rewrites_bad_sit_type() {
    let mut img = mistyped_sit_segment();
    let rep = img.run(CheckOptions::repair());

    assert!(rep.fixed("SIT.TYPE"), "fixes: {:?}", rep.fixes);
    assert_eq!(rep.exit, ExitCode::ERRORS_CORRECTED);
    assert_eq!(img.sit_entry(CURSEG_WARM_DATA as u32).seg_type() as usize, CURSEG_WARM_DATA);

    let rep = img.run(CheckOptions::check_only());
    assert!(!rep.has_error(), "{}", rep.errors_only());
}

/// `a.txt` loses its only name.
fn detached_file(features: u32) -> (Image, SampleInos) {
    let (mut b, inos) = sample_tree();
    b.feature(features);
    let mut img = b.build();
    let (slot, _) = img.lookup(ROOT, "a.txt").expect("a.txt");
    let blk = img.data_addr(ROOT, 0);
    f2fsck::f2fs::types::DentryLayout::BLOCK.nullify(img.block_mut(blk), slot);
    (img, inos)
}

#[test]
fn detached_file_is_reported() {
    let (mut img, _) = detached_file(F2FS_FEATURE_LOST_FOUND);
    let (rep, stats) = img.run_counted(CheckOptions::check_only());

    assert!(rep.has_code("NAT.UNREACHABLE"), "{}", rep.errors_only());
    assert!(rep.fixes.is_empty());
    assert_eq!(rep.exit, ExitCode::UNCORRECTED);
    assert_eq!(stats.writes, 0);
}

#[test]
fn detached_file_is_reconnected_under_new_lost_found() {
    let (mut img, inos) = detached_file(F2FS_FEATURE_LOST_FOUND);
    assert!(img.lookup(ROOT, "lost+found").is_none());

    let rep = img.run(CheckOptions::repair());
    assert!(rep.fixed("LPF.CREATE"), "fixes: {:?}", rep.fixes);
    assert!(rep.fixed("LPF.RECONNECT"));
    assert!(!rep.fixed("NAT.NULLIFY"));
    assert_eq!(rep.exit, ExitCode::ERRORS_CORRECTED);

    let (_, lpf) = img.lookup(ROOT, "lost+found").expect("lost+found was not created");
    // root gained a subdirectory
    assert_eq!({ img.node(ROOT).i.i_links }, 4);
    let lpf_node = img.node_by_nat(lpf);
    assert_eq!({ lpf_node.i.i_mode } & S_IFMT, S_IFDIR);
    assert_eq!({ lpf_node.i.i_pino }, ROOT);

    let name = inos.a.to_string();
    let dent = lpf_node.i_addr(0);
    let hash = f2fsck::f2fs::hash::dentry_hash(false, name.as_bytes());
    let hit = f2fsck::f2fs::types::DentryLayout::BLOCK.lookup(img.block(dent), name.as_bytes(), hash);
    assert_eq!(hit.map(|(_, ino)| ino), Some(inos.a));
    let a = img.node(inos.a);
    assert_eq!({ a.i.i_pino }, lpf);
    assert_eq!({ a.i.i_namelen } as usize, name.len());
    assert_eq!(&a.i.i_name[..name.len()], name.as_bytes());

    // every log is busy, so the dentry block and the inode each opened a
    // free segment of their own
    assert_eq!(dent, MAIN_BLKADDR + 6 * BLOCKS_PER_SEG);
    assert_eq!({ img.nat_entry(lpf).block_addr }, MAIN_BLKADDR + 7 * BLOCKS_PER_SEG);
    let (data_seg, node_seg) = (img.sit_entry(6), img.sit_entry(7));
    assert_eq!(data_seg.seg_type() as usize, CURSEG_HOT_DATA);
    assert_eq!(data_seg.valid_blocks(), 1);
    assert_eq!(node_seg.seg_type() as usize, CURSEG_HOT_NODE);
    assert_eq!(node_seg.valid_blocks(), 1);
    let cp = img.checkpoint(1);
    assert_eq!({ cp.valid_inode_count }, 6);
    assert_eq!({ cp.free_segment_count }, MAIN_SEGS - 8);

    let rep = img.run(CheckOptions::check_only());
    assert!(!rep.has_error(), "second run still finds:\n{}", rep.errors_only());
}

#[test]
fn detached_file_is_released_without_lost_found() {
    let (mut img, inos) = detached_file(0);
    let rep = img.run(CheckOptions::repair());

    assert!(rep.has_code("NAT.UNREACHABLE"));
    assert!(rep.fixed("NAT.NULLIFY"), "fixes: {:?}", rep.fixes);
    assert!(!rep.fixed("LPF.CREATE"));
    assert_eq!(rep.exit, ExitCode::ERRORS_CORRECTED);
    let e = img.nat_entry(inos.a);
    assert_eq!({ e.block_addr }, 0);
    // its node and both data blocks drop out of the SIT
    assert_eq!(img.sit_entry(CURSEG_WARM_DATA as u32).valid_blocks(), 1);
    assert_eq!(img.sit_entry(CURSEG_WARM_NODE as u32).valid_blocks(), 2);
    assert_eq!({ img.checkpoint(1).valid_inode_count }, 4);

    let rep = img.run(CheckOptions::check_only());
    assert!(!rep.has_error(), "second run still finds:\n{}", rep.errors_only());
}

#[test]
fn lost_found_option_off_releases_instead() {
    let (mut img, inos) = detached_file(F2FS_FEATURE_LOST_FOUND);
    let opts = CheckOptions {
        lost_found: false,
        ..CheckOptions::repair()
    };
    let rep = img.run(opts);

    assert!(!rep.fixed("LPF.CREATE"));
    assert!(rep.fixed("NAT.NULLIFY"));
    assert!(img.lookup(ROOT, "lost+found").is_none());
    assert_eq!({ img.nat_entry(inos.a).block_addr }, 0);
}

/// One intact orphan, then an entry whose inode does not exist.
fn orphan_list_with_missing_inode() -> (Image, u32) {
    let (mut b, _) = sample_tree();
    let keep = b.orphan(1);
    b.list_orphan(350);
    (b.build(), keep)
}

#[test]
fn intact_orphan_list_checks_clean() {
    let (mut b, _) = sample_tree();
    let keep = b.orphan(2);
    let mut img = b.build();

    let (rep, stats) = img.run_counted(CheckOptions::check_only());
    assert!(!rep.has_error(), "{}", rep.errors_only());
    assert!(stats.is_read_only());
    assert_eq!(img.orphan_inos(), vec![keep]);
}

#[test]
fn missing_orphan_is_reported() {
    let (mut img, keep) = orphan_list_with_missing_inode();
    let (rep, stats) = img.run_counted(CheckOptions::check_only());

    assert!(rep.has_code("ORPHAN.INODE"), "{}", rep.errors_only());
    assert!(rep.fixes.is_empty());
    assert_eq!(rep.exit, ExitCode::UNCORRECTED);
    assert_eq!(stats.writes, 0);
    assert_eq!(img.orphan_inos(), vec![keep, 350]);
}

#[test]
fn missing_orphan_is_dropped_from_the_list() {
    let (mut img, keep) = orphan_list_with_missing_inode();
    let rep = img.run(CheckOptions::repair());

    assert!(rep.fixed("ORPHAN.INODE"), "fixes: {:?}", rep.fixes);
    assert_eq!(rep.exit, ExitCode::ERRORS_CORRECTED);
    assert_eq!(img.orphan_inos(), vec![keep]);
    let cp = img.checkpoint(1);
    assert!(cp.is_set(CP_ORPHAN_PRESENT_FLAG));
    assert_eq!({ cp.cp_pack_start_sum }, 2);
    // the surviving orphan is still accounted for
    assert_eq!({ img.nat_entry(keep).ino }, keep);

    let rep = img.run(CheckOptions::check_only());
    assert!(!rep.has_error(), "second run still finds:\n{}", rep.errors_only());
}

#[test]
fn second_name_raises_declared_links() {
    let (b, inos) = sample_tree();
    let mut img = b.build();
    img.edit_node(inos.notes, |n| n.i.i_links = 1);

    let rep = img.run(CheckOptions::repair());
    assert!(rep.has_code("INODE.LINKS"));
    assert!(rep.fixed("INODE.LINKS"), "fixes: {:?}", rep.fixes);
    assert_eq!(rep.exit, ExitCode::ERRORS_CORRECTED);
    assert_eq!({ img.node(inos.notes).i.i_links }, 2);

    let rep = img.run(CheckOptions::check_only());
    assert!(!rep.has_error(), "second run still finds:\n{}", rep.errors_only());
}

#[test]
fn named_file_without_links_gets_one() {
    let (b, inos) = sample_tree();
    let mut img = b.build();
    img.edit_node(inos.a, |n| n.i.i_links = 0);

    let (rep, stats) = img.run_counted(CheckOptions::check_only());
    assert!(rep.has_code("INODE.LINKS"));
    assert_eq!(stats.writes, 0);

    let rep = img.run(CheckOptions::repair());
    assert!(rep.fixed("INODE.LINKS"), "fixes: {:?}", rep.fixes);
    assert_eq!({ img.node(inos.a).i.i_links }, 1);
    let rep = img.run(CheckOptions::check_only());
    assert!(!rep.has_error(), "second run still finds:\n{}", rep.errors_only());
}

#[test]
fn linked_orphan_is_unlinked() {
    let (mut b, _) = sample_tree();
    let keep = b.orphan(1);
    let mut img = b.build();
    img.edit_node(keep, |n| n.i.i_links = 1);

    let rep = img.run(CheckOptions::repair());
    assert!(rep.has_code("INODE.ORPHAN"), "{}", rep);
    assert!(rep.fixed("INODE.ORPHAN"));
    assert_eq!({ img.node(keep).i.i_links }, 0);
    assert_eq!(img.orphan_inos(), vec![keep]);

    let rep = img.run(CheckOptions::check_only());
    assert!(!rep.has_error(), "second run still finds:\n{}", rep.errors_only());
}

/// Warm data log pointing into the file data it already wrote.
fn log_over_used_block() -> Image {
    let (b, _) = sample_tree();
    let mut img = b.build();
    assert_eq!(img.next_blkoff[CURSEG_WARM_DATA], 3);
    img.edit_checkpoint(|cp| cp.set_curseg(CURSEG_WARM_DATA, CURSEG_WARM_DATA as u32, 1, LFS));
    img
}

#[test]
fn log_over_used_block_is_reported() {
    let mut img = log_over_used_block();
    let (rep, stats) = img.run_counted(CheckOptions::check_only());

    assert!(rep.has_code("CURSEG.OFFSET"), "{}", rep);
    assert_eq!(rep.exit, ExitCode::UNCORRECTED);
    assert_eq!(stats.writes, 0);
    assert_eq!(img.checkpoint(1).cur_blkoff(CURSEG_WARM_DATA), 1);
}

#[test]
fn log_over_used_block_moves_to_first_hole() {
    let mut img = log_over_used_block();
    let rep = img.run(CheckOptions::repair());
    assert_eq!(rep.exit, ExitCode::ERRORS_CORRECTED);

    // the segment still has room, so the log stays and turns SSR
    let cp = img.checkpoint(1);
    assert_eq!(cp.cur_segno(CURSEG_WARM_DATA), CURSEG_WARM_DATA as u32);
    assert_eq!(cp.cur_blkoff(CURSEG_WARM_DATA), 3);
    let alloc = { cp.alloc_type };
    assert_eq!(alloc[CURSEG_WARM_DATA], SSR);
    assert_eq!(img.sit_entry(CURSEG_WARM_DATA as u32).valid_blocks(), 3);

    let rep = img.run(CheckOptions::check_only());
    assert!(!rep.has_error(), "second run still finds:\n{}", rep.errors_only());
}
