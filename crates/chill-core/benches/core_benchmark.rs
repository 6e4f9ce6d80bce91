//! Benchmark tests for chill-core operations
//!
//! Run with: cargo bench -p chill-core

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::time::Duration;

use chill_core::gesture::{TapDetector, TapZone};
use chill_core::keyboard::KeyOutcome;
use chill_core::manifest::{detect_source_kind, parse_levels};
use chill_core::platform::MediaEvent;
use chill_core::sim::SimHost;
use chill_core::{PlaybackSession, PlaybackSource, PlayerConfig, SessionCallbacks};

// ============================================================================
// Helpers
// ============================================================================

fn generate_hls_master(variant_count: usize) -> String {
    let mut content = String::from("#EXTM3U\n#EXT-X-VERSION:3\n");
    for i in 0..variant_count {
        let height = 240 + i * 120;
        let width = height * 16 / 9;
        content.push_str(&format!(
            "#EXT-X-STREAM-INF:BANDWIDTH={},RESOLUTION={}x{}\nv{}/index.m3u8\n",
            400_000 + i * 600_000,
            width,
            height,
            i
        ));
    }
    content
}

fn playing_session(sim: &SimHost) -> PlaybackSession {
    let mut session = PlaybackSession::new(
        sim.host(),
        PlaybackSource::new("https://cdn.example.com/bench/index.m3u8"),
        PlayerConfig::default(),
        SessionCallbacks::new(),
    );
    sim.pump(&mut session);
    session
}

// ============================================================================
// Manifest Benchmarks
// ============================================================================

fn bench_parse_levels(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_levels");

    for variants in [3, 8, 16] {
        let content = generate_hls_master(variants);
        group.bench_with_input(
            BenchmarkId::from_parameter(variants),
            &content,
            |b, content| b.iter(|| parse_levels(black_box(content.as_bytes()))),
        );
    }

    group.finish();
}

fn bench_source_detection(c: &mut Criterion) {
    let mut group = c.benchmark_group("source_detection");

    group.bench_function("manifest_url", |b| {
        b.iter(|| detect_source_kind(black_box("https://cdn.example.com/phim/tap-01/index.m3u8")))
    });

    group.bench_function("progressive_url", |b| {
        b.iter(|| detect_source_kind(black_box("https://cdn.example.com/trailer.mp4?token=abc")))
    });

    group.finish();
}

// ============================================================================
// Session Benchmarks
// ============================================================================

fn bench_session_startup(c: &mut Criterion) {
    c.bench_function("session_startup_to_playing", |b| {
        b.iter(|| {
            let sim = SimHost::new();
            let session = playing_session(&sim);
            black_box(session.state().status)
        })
    });
}

fn bench_event_dispatch(c: &mut Criterion) {
    let sim = SimHost::new();
    let mut session = playing_session(&sim);
    let mut position = 0.0;

    c.bench_function("time_update_dispatch", |b| {
        b.iter(|| {
            position += 0.25;
            sim.media.emit(MediaEvent::TimeUpdate {
                position,
                buffered_end: Some(position + 10.0),
            });
            sim.pump(&mut session)
        })
    });
}

// ============================================================================
// Input Benchmarks
// ============================================================================

fn bench_input_mapping(c: &mut Criterion) {
    let mut group = c.benchmark_group("input");

    group.bench_function("key_outcome", |b| {
        b.iter(|| KeyOutcome::for_code(black_box("ArrowRight")))
    });

    group.bench_function("tap_classification", |b| {
        let mut detector = TapDetector::new(Duration::from_millis(300));
        let mut at = Duration::ZERO;
        b.iter(|| {
            at += Duration::from_millis(120);
            detector.register(black_box(TapZone::Right), at)
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_parse_levels,
    bench_source_detection,
    bench_session_startup,
    bench_event_dispatch,
    bench_input_mapping,
);
criterion_main!(benches);
