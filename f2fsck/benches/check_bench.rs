// SPDX-License-Identifier: MIT
use std::io::Write;

use criterion::{Criterion, criterion_group, criterion_main};

use f2fsck::prelude::*;

#[path = "../tests/common/mod.rs"]
mod common;

use common::*;

criterion_group!(benches, check_bench, repair_bench);
criterion_main!(benches);

fn wide_tree() -> ImageBuilder {
    let mut b = ImageBuilder::new();
    for d in 0..8 {
        let dir = b.mkdir(ROOT, &format!("dir{d}"));
        for f in 0..12 {
            b.file(dir, &format!("file{f:02}"), 4);
        }
    }
    b
}

pub fn check_bench(c: &mut Criterion) {
    let img = wide_tree().build();

    let mut buf = img.bytes.clone();
    c.bench_function("f2fsck_check_mem", |b| {
        b.iter(|| {
            let mut io = MemF2IO::new(&mut buf);
            let mut sess = CheckSession::open(&mut io, CheckOptions::check_only()).expect("open failed");
            sess.run().expect("check failed")
        });
    });

    let mut file = tempfile::tempfile().expect("tempfile failed");
    file.write_all(&img.bytes).expect("write failed");
    c.bench_function("f2fsck_check_file", |b| {
        b.iter(|| {
            let mut io = StdF2IO::new(&mut file);
            let mut sess = CheckSession::open(&mut io, CheckOptions::check_only()).expect("open failed");
            sess.run().expect("check failed")
        });
    });

    let opts = CheckOptions {
        preen: PreenMode::Quick,
        ..CheckOptions::check_only()
    };
    c.bench_function("f2fsck_preen_quick", |b| {
        b.iter(|| {
            let mut io = MemF2IO::new(&mut buf);
            let mut sess = CheckSession::open(&mut io, opts.clone()).expect("open failed");
            sess.run().expect("preen failed")
        });
    });
}

pub fn repair_bench(c: &mut Criterion) {
    let mut img = wide_tree().build();
    let victim = img.nodes.keys().copied().last().expect("no inode");
    img.edit_node(victim, |n| n.i.i_links = 5);

    c.bench_function("f2fsck_repair_links", |b| {
        b.iter_batched(
            || img.bytes.clone(),
            |mut buf| {
                let mut io = MemF2IO::new(&mut buf);
                let mut sess = CheckSession::open(&mut io, CheckOptions::repair()).expect("open failed");
                sess.run().expect("repair failed")
            },
            criterion::BatchSize::LargeInput,
        );
    });
}
