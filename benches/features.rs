use criterion::{black_box, criterion_group, criterion_main, Criterion};
use videospec_analyzer::extract::GrayFrame;
use videospec_analyzer::features::{analyze_pcm, average_hash, classify_motion, hamming_distance};

fn gradient_frame(size: usize, offset: usize) -> GrayFrame {
    let pixels = (0..size * size)
        .map(|i| {
            let x = (i % size + offset) % size;
            let y = i / size;
            ((x * 7 + y * 3) % 256) as f32 / 255.0
        })
        .collect();
    GrayFrame::new(size, size, pixels).unwrap()
}

fn pulse_train(seconds: f64, sample_rate: u32, bpm: f64) -> Vec<i16> {
    let total = (seconds * sample_rate as f64) as usize;
    let period = (60.0 / bpm * sample_rate as f64) as usize;
    (0..total)
        .map(|i| if i % period < 512 { 12_000 } else { 200 })
        .collect()
}

fn bench_frame_hash(c: &mut Criterion) {
    let frame = gradient_frame(64, 0);
    c.bench_function("average_hash_64", |b| {
        b.iter(|| black_box(average_hash(black_box(&frame)).unwrap()))
    });

    let a = average_hash(&frame).unwrap();
    let other = average_hash(&gradient_frame(64, 3)).unwrap();
    c.bench_function("hamming_distance", |b| {
        b.iter(|| black_box(hamming_distance(black_box(a), black_box(other))))
    });
}

fn bench_motion(c: &mut Criterion) {
    let a = gradient_frame(64, 0);
    let b_frame = gradient_frame(64, 2);
    c.bench_function("classify_motion_64", |b| {
        b.iter(|| black_box(classify_motion(black_box(&a), black_box(&b_frame)).unwrap()))
    });
}

fn bench_onsets(c: &mut Criterion) {
    let pcm = pulse_train(10.0, 22_050, 120.0);
    c.bench_function("analyze_pcm_10s", |b| {
        b.iter(|| black_box(analyze_pcm(black_box(&pcm), 22_050, 10.0)))
    });
}

criterion_group!(benches, bench_frame_hash, bench_motion, bench_onsets);
criterion_main!(benches);
