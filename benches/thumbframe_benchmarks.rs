//! Benchmarks for opening, selecting and exporting.
//!
//! Run with: cargo bench
//! Run with all features: cargo bench --all-features
//!
//! Requires fixture files from `tests/fixtures/generate_fixtures.sh`.

use std::{path::Path, time::Duration};

use criterion::Criterion;
use thumbframe::{
    ByteSource, FfmpegLogLevel, MediaSession, ScoringStrategy, SelectionRequest, SessionOptions,
};

#[cfg(feature = "async")]
use tokio::runtime::Runtime;

const SAMPLE_VIDEO: &str = "tests/fixtures/sample_video.mp4";
const SAMPLE_ALPHA: &str = "tests/fixtures/sample_alpha.webm";

fn benchmark_open(criterion: &mut Criterion) {
    thumbframe::set_ffmpeg_log_level(FfmpegLogLevel::Error);

    if !Path::new(SAMPLE_VIDEO).exists() {
        eprintln!("Skipping benchmark: fixture not found");
        return;
    }

    criterion.bench_function("open and close (file)", |bencher| {
        bencher.iter(|| {
            let source = ByteSource::open_file(SAMPLE_VIDEO).unwrap();
            let mut session = MediaSession::open(source).unwrap();
            session.close();
        });
    });

    let bytes = std::fs::read(SAMPLE_VIDEO).unwrap();
    criterion.bench_function("open and close (in memory)", |bencher| {
        bencher.iter(|| {
            let mut session = MediaSession::open(ByteSource::from_bytes(bytes.clone())).unwrap();
            session.close();
        });
    });
}

fn benchmark_best_frame(criterion: &mut Criterion) {
    if !Path::new(SAMPLE_VIDEO).exists() {
        return;
    }

    let mut group = criterion.benchmark_group("best frame");
    group.measurement_time(Duration::from_secs(10));

    for (name, scoring) in [
        ("detail", ScoringStrategy::Detail),
        ("representative", ScoringStrategy::Representative),
    ] {
        group.bench_function(name, |bencher| {
            bencher.iter(|| {
                let options = SessionOptions::new().with_scoring(scoring);
                let source = ByteSource::open_file(SAMPLE_VIDEO).unwrap();
                let mut session = MediaSession::open_with_options(source, options).unwrap();
                let _frame = session.thumbnail(3).unwrap();
            });
        });
    }

    group.finish();
}

fn benchmark_targeted(criterion: &mut Criterion) {
    if !Path::new(SAMPLE_VIDEO).exists() {
        return;
    }

    let requests = [
        ("frame 1", SelectionRequest::Frame(1)),
        ("frame 75", SelectionRequest::Frame(75)),
        ("at 2.5s", SelectionRequest::Duration(Duration::from_millis(2500))),
        ("position 0.9", SelectionRequest::Position(0.9)),
    ];

    for (name, request) in requests {
        criterion.bench_function(&format!("select {name}"), |bencher| {
            bencher.iter(|| {
                let source = ByteSource::open_file(SAMPLE_VIDEO).unwrap();
                let mut session = MediaSession::open(source).unwrap();
                session.select(request).unwrap();
                let _frame = session.export(3).unwrap();
            });
        });
    }
}

fn benchmark_export(criterion: &mut Criterion) {
    if !Path::new(SAMPLE_ALPHA).exists() {
        return;
    }

    let source = ByteSource::open_file(SAMPLE_ALPHA).unwrap();
    let mut session = MediaSession::open(source).unwrap();
    session.select(SelectionRequest::Frame(1)).unwrap();

    criterion.bench_function("export rgb", |bencher| {
        bencher.iter(|| session.export(3).unwrap());
    });
    criterion.bench_function("export rgba", |bencher| {
        bencher.iter(|| session.export(4).unwrap());
    });
}

#[cfg(feature = "async")]
fn benchmark_async(criterion: &mut Criterion) {
    if !Path::new(SAMPLE_VIDEO).exists() {
        return;
    }

    let runtime = Runtime::new().unwrap();
    criterion.bench_function("async thumbnail", |bencher| {
        bencher.iter(|| {
            runtime.block_on(async {
                let source = ByteSource::open_file(SAMPLE_VIDEO).unwrap();
                thumbframe::thumbnail_async(source, SessionOptions::new(), SelectionRequest::Best, 3)
                    .await
                    .unwrap();
            });
        });
    });
}

#[cfg(not(feature = "async"))]
fn benchmark_async(_criterion: &mut Criterion) {}

criterion::criterion_group!(
    benches,
    benchmark_open,
    benchmark_best_frame,
    benchmark_targeted,
    benchmark_export,
    benchmark_async,
);
criterion::criterion_main!(benches);
