// SPDX-License-Identifier: MIT
mod common;

use common::*;
use f2fsck::f2fs::constant::*;
use f2fsck::prelude::*;

const BLK: u64 = F2FS_BLKSIZE as u64;

fn zoned_sample() -> Image {
    let (mut b, _) = sample_tree();
    b.feature(F2FS_FEATURE_BLKZONED);
    b.build()
}

#[test]
fn clean_zoned_image_checks_clean() {
    let mut img = zoned_sample();
    let mut dev = img.zoned_io();
    let mut counter = IOCounter::new(&mut dev);
    let mut sess = CheckSession::open(&mut counter, CheckOptions::check_only()).expect("open");
    assert!(sess.run.zoned_hm);

    let rep = sess.run().expect("run");
    assert!(!rep.has_error(), "unexpected errors:\n{}", rep.errors_only());
    assert_eq!(rep.exit, ExitCode::SUCCESS);
    assert_eq!(sess.fsck.chk.wp_inconsistent_zones, 0);
    drop(sess);
    assert_eq!(counter.snapshot().writes, 0);
}

#[test]
fn repair_leaves_empty_zones_allocatable() {
    let mut img = zoned_sample();
    let mut dev = img.zoned_io();

    let rep = run_on(&mut dev, CheckOptions::repair());
    assert!(!rep.has_error(), "{}", rep.errors_only());
    assert!(rep.fixes.is_empty(), "unexpected fixes: {:?}", rep.fixes);
    for segno in CURSEG_COLD_NODE as u32 + 1..MAIN_SEGS {
        let z = dev.report_zone(seg_offset(segno)).unwrap();
        assert_eq!(z.cond, ZoneCondition::Empty, "zone of segment {segno} was touched");
    }
    // logs still end at their write pointers
    let z = dev.report_zone(seg_offset(CURSEG_WARM_DATA as u32)).unwrap();
    assert_eq!(z.wp, seg_offset(CURSEG_WARM_DATA as u32) + 3 * BLK);
}

#[test]
fn write_pointer_behind_log_moves_the_log() {
    let mut img = zoned_sample();
    let warm_node = CURSEG_WARM_NODE as u32;
    let start = seg_offset(warm_node);
    assert_eq!(img.next_blkoff[CURSEG_WARM_NODE], 3);

    let mut dev = img.zoned_io();
    dev.set_wp(start, start + BLK).unwrap();

    let rep = run_on(&mut dev, CheckOptions::repair());
    assert!(rep.has_code("ZONE.WP"), "{}", rep);
    assert!(rep.fixed("CURSEG.MOVE"), "fixes: {:?}", rep.fixes);
    assert!(rep.fixed("ZONE.FINISH"));
    assert!(!rep.has_error(), "{}", rep.errors_only());
    // the abandoned zone is closed off, the first free zone takes the log
    assert_eq!(dev.report_zone(start).unwrap().cond, ZoneCondition::Full);
    assert_eq!(dev.report_zone(seg_offset(6)).unwrap().cond, ZoneCondition::Empty);

    let rep = run_on(&mut dev, CheckOptions::check_only());
    assert!(!rep.has_error(), "second run still finds:\n{}", rep.errors_only());
    drop(dev);

    let cp = img.checkpoint(1);
    assert_eq!(cp.cur_segno(CURSEG_WARM_NODE), 6);
    assert_eq!(cp.cur_blkoff(CURSEG_WARM_NODE), 0);
    assert_eq!(img.sit_entry(6).seg_type() as usize, CURSEG_WARM_NODE);
    // the nodes stay where they were
    assert_eq!(img.sit_entry(warm_node).valid_blocks(), 3);
}

#[test]
fn write_pointer_ahead_of_log_moves_the_log() {
    let mut img = zoned_sample();
    let warm_data = CURSEG_WARM_DATA as u32;
    let start = seg_offset(warm_data);

    let mut dev = img.zoned_io();
    dev.set_wp(start, start + 6 * BLK).unwrap();

    let rep = run_on(&mut dev, CheckOptions::repair());
    assert!(rep.has_code("ZONE.WP"));
    assert!(rep.fixed("CURSEG.MOVE"), "fixes: {:?}", rep.fixes);
    assert!(rep.fixed("ZONE.FINISH"));
    assert_eq!(dev.report_zone(start).unwrap().wp, start + ZONE_BYTES);

    let rep = run_on(&mut dev, CheckOptions::check_only());
    assert!(!rep.has_error(), "second run still finds:\n{}", rep.errors_only());
    drop(dev);

    let cp = img.checkpoint(1);
    assert_eq!(cp.cur_segno(CURSEG_WARM_DATA), 6);
    assert_eq!(cp.cur_segno(CURSEG_WARM_NODE), CURSEG_WARM_NODE as u32);
}

/// Cold data log moved five blocks into its empty segment, with the zone
/// written up to there.
fn empty_log_with_written_zone() -> Image {
    let mut img = zoned_sample();
    img.edit_checkpoint(|cp| cp.set_curseg(CURSEG_COLD_DATA, CURSEG_COLD_DATA as u32, 5, LFS));
    img
}

#[test]
fn empty_log_zone_off_start_is_reported() {
    let mut img = empty_log_with_written_zone();
    let before = img.bytes.clone();
    let start = seg_offset(CURSEG_COLD_DATA as u32);
    let mut dev = img.zoned_io();
    dev.set_wp(start, start + 5 * BLK).unwrap();

    let mut counter = IOCounter::new(&mut dev);
    let mut sess = CheckSession::open(&mut counter, CheckOptions::check_only()).expect("open");
    let rep = sess.run().expect("run");
    assert!(rep.has_code("ZONE.WP"));
    assert!(rep.has_code("WP.ZONES"), "{}", rep);
    assert_eq!(sess.fsck.chk.wp_inconsistent_zones, 1);
    assert!(rep.fixes.is_empty());
    assert_eq!(rep.exit, ExitCode::UNCORRECTED);
    drop(sess);
    assert_eq!(counter.snapshot().writes, 0);
    assert_eq!(dev.report_zone(start).unwrap().wp, start + 5 * BLK);
    drop(dev);
    assert!(img.bytes == before);
}

#[test]
fn empty_log_zone_off_start_is_reset() {
    let mut img = empty_log_with_written_zone();
    let start = seg_offset(CURSEG_COLD_DATA as u32);
    let mut dev = img.zoned_io();
    dev.set_wp(start, start + 5 * BLK).unwrap();

    let rep = run_on(&mut dev, CheckOptions::repair());
    assert!(rep.fixed("ZONE.RESET"), "fixes: {:?}", rep.fixes);
    assert!(!rep.fixed("CURSEG.MOVE"));
    assert!(!rep.has_error(), "{}", rep.errors_only());
    let z = dev.report_zone(start).unwrap();
    assert_eq!(z.wp, z.start);
    assert_eq!(z.cond, ZoneCondition::Empty);

    let rep = run_on(&mut dev, CheckOptions::check_only());
    assert!(!rep.has_error(), "second run still finds:\n{}", rep.errors_only());
}
