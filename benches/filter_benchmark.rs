/*!
 * Filter Cascade Benchmarks
 *
 * Measure the per-line cost of the filter algebra, tag overlap tests, and a
 * full monitor emission with the cascade engaged
 */

use activity_engine::filter::{
    clear_tag_filters, install_tag_filters, resolve_line_threshold, TagClamper, TagFilterRule,
};
use activity_engine::{LevelFilter, LogData, LogFilter, LogLevel, Monitor, TagSet};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn bench_level_combine(c: &mut Criterion) {
    c.bench_function("level_filter_combine", |b| {
        b.iter(|| {
            LevelFilter::combine(
                black_box(LevelFilter::Warn),
                black_box(LevelFilter::Debug),
            )
        });
    });

    c.bench_function("log_filter_combine", |b| {
        b.iter(|| LogFilter::combine(black_box(LogFilter::RELEASE), black_box(LogFilter::DEBUG)));
    });
}

fn bench_tag_overlap(c: &mut Criterion) {
    let wide = TagSet::parse("alpha|beta|gamma|delta|epsilon|zeta");
    let hit = TagSet::parse("zeta|omega");
    let miss = TagSet::parse("omega|psi");

    c.bench_function("tag_overlap_hit", |b| {
        b.iter(|| black_box(&wide).overlaps(black_box(&hit)));
    });
    c.bench_function("tag_overlap_miss", |b| {
        b.iter(|| black_box(&wide).overlaps(black_box(&miss)));
    });
    c.bench_function("tag_union", |b| {
        b.iter(|| black_box(&wide).union(black_box(&hit)));
    });
}

fn bench_threshold_resolution(c: &mut Criterion) {
    install_tag_filters(vec![
        TagFilterRule::new(TagSet::parse("sql"), TagClamper::hard(LogFilter::DEBUG)),
        TagFilterRule::new(TagSet::parse("net"), TagClamper::soft(LogFilter::TRACE)),
    ]);
    let tagged = TagSet::parse("net|request");
    let untagged = TagSet::empty();

    c.bench_function("resolve_threshold_tagged", |b| {
        b.iter(|| resolve_line_threshold(black_box(&tagged), black_box(LevelFilter::Warn)));
    });
    c.bench_function("resolve_threshold_untagged", |b| {
        b.iter(|| resolve_line_threshold(black_box(&untagged), black_box(LevelFilter::Warn)));
    });

    clear_tag_filters();
}

fn bench_monitor_emission(c: &mut Criterion) {
    let monitor = Monitor::new();
    monitor.set_configured_filter(LogFilter::TERSE).unwrap();

    c.bench_function("emit_accepted_line", |b| {
        b.iter(|| monitor.log(LogData::new(LogLevel::Warn, black_box("accepted"))).unwrap());
    });
    c.bench_function("emit_filtered_line", |b| {
        b.iter(|| monitor.log(LogData::new(LogLevel::Debug, black_box("rejected"))).unwrap());
    });
    c.bench_function("open_close_group", |b| {
        b.iter(|| {
            let point = monitor
                .open_group(LogData::new(LogLevel::Warn, black_box("span")))
                .unwrap();
            monitor.close_group(point).unwrap();
        });
    });
}

criterion_group!(
    benches,
    bench_level_combine,
    bench_tag_overlap,
    bench_threshold_resolution,
    bench_monitor_emission
);
criterion_main!(benches);
