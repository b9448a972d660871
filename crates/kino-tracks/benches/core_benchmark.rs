//! Benchmark tests for kino-tracks operations
//!
//! Run with: cargo bench -p kino-tracks

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::rc::Rc;

use kino_tracks::dispatcher::{has_same_representations, sort_by_bitrate};
use kino_tracks::{
    Adaptation, LockedRepresentations, Manifest, Period, Representation, SharedReference,
    SwitchingMode, TrackChoice, TrackDispatcher, TrackSetting, TrackType, UpdateOptions,
};

// ============================================================================
// Helpers
// ============================================================================

fn create_test_representations(count: usize) -> Vec<Rc<Representation>> {
    (0..count)
        .map(|i| {
            // Interleave bitrates so the input is never already sorted.
            let bitrate = ((i * 7919) % (count * 10) + 1) as u64 * 10_000;
            Rc::new(Representation::new(format!("video-{}", i), bitrate))
        })
        .collect()
}

fn create_test_manifest(representations: usize) -> Rc<Manifest> {
    let ladder = |prefix: &str| -> Vec<Representation> {
        (0..representations)
            .map(|i| Representation::new(format!("{}-{}", prefix, i), (i as u64 + 1) * 250_000))
            .collect()
    };
    Rc::new(Manifest::new(vec![Period::new(
        "main",
        0.0,
        None,
        vec![
            Adaptation::new("video-avc", TrackType::Video, ladder("avc")),
            Adaptation::new("video-hevc", TrackType::Video, ladder("hevc")),
        ],
    )]))
}

// ============================================================================
// Selection Benchmarks
// ============================================================================

fn bench_sort_by_bitrate(c: &mut Criterion) {
    let mut group = c.benchmark_group("Sort By Bitrate");

    for &count in &[4, 16, 64] {
        let representations = create_test_representations(count);
        group.bench_with_input(
            BenchmarkId::new("sort_by_bitrate", count),
            &representations,
            |b, list| b.iter(|| black_box(sort_by_bitrate(list.clone()))),
        );
    }

    group.finish();
}

fn bench_has_same_representations(c: &mut Criterion) {
    let mut group = c.benchmark_group("Representation Comparison");

    for &count in &[4, 16, 64] {
        let a = sort_by_bitrate(create_test_representations(count));
        let b_list = sort_by_bitrate(create_test_representations(count));
        group.bench_with_input(BenchmarkId::new("equal", count), &(a, b_list), |b, (x, y)| {
            b.iter(|| black_box(has_same_representations(x, y)))
        });
    }

    group.finish();
}

// ============================================================================
// Dispatcher Benchmarks
// ============================================================================

fn bench_dispatcher_update_track(c: &mut Criterion) {
    let mut group = c.benchmark_group("Dispatcher");

    let manifest = create_test_manifest(8);
    let period = manifest.get_period("main").unwrap();
    let avc = period.get_adaptation("video-avc").unwrap();
    let hevc = period.get_adaptation("video-hevc").unwrap();
    let outward = SharedReference::new(TrackChoice::Undecided);
    let dispatcher = TrackDispatcher::new(manifest.clone(), outward);
    dispatcher.start(None).unwrap();

    group.bench_function("update_track_switch", |b| {
        let mut toggle = false;
        b.iter(|| {
            toggle = !toggle;
            let adaptation = if toggle { avc.clone() } else { hevc.clone() };
            dispatcher
                .update_track(Some(TrackSetting::new(adaptation, SwitchingMode::Direct)))
                .unwrap();
        });
    });

    let lock = SharedReference::new(None);
    dispatcher
        .update_track(Some(
            TrackSetting::new(avc.clone(), SwitchingMode::Direct)
                .with_locked_representations(lock.read_only()),
        ))
        .unwrap();
    let locked = LockedRepresentations::new(
        avc.representations()[..2].to_vec(),
        SwitchingMode::Seamless,
    );

    group.bench_function("lock_toggle", |b| {
        let mut toggle = false;
        b.iter(|| {
            toggle = !toggle;
            lock.set_value(if toggle { Some(locked.clone()) } else { None });
        });
    });

    group.bench_function("decipherability_update", |b| {
        let mut toggle = false;
        b.iter(|| {
            toggle = !toggle;
            black_box(manifest.update_representations_decipherability(|_| Some(toggle)))
        });
    });

    group.finish();
}

// ============================================================================
// Reference Benchmarks
// ============================================================================

fn bench_reference_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("Reference Fan-out");

    for &subscribers in &[1, 10, 100] {
        let reference = SharedReference::new(0u64);
        for _ in 0..subscribers {
            reference.on_update(|value| { black_box(*value); }, UpdateOptions::default());
        }
        group.bench_with_input(
            BenchmarkId::new("set_value", subscribers),
            &reference,
            |b, reference| {
                let mut value = 0u64;
                b.iter(|| {
                    value += 1;
                    reference.set_value(value);
                });
            },
        );
    }

    group.finish();
}

// ============================================================================
// Criterion Groups
// ============================================================================

criterion_group!(
    selection_benches,
    bench_sort_by_bitrate,
    bench_has_same_representations,
);

criterion_group!(
    dispatcher_benches,
    bench_dispatcher_update_track,
);

criterion_group!(
    reference_benches,
    bench_reference_fan_out,
);

criterion_main!(
    selection_benches,
    dispatcher_benches,
    reference_benches,
);
