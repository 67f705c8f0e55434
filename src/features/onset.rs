use crate::model::BeatGrid;

/// Short-time energy window length in samples.
const WINDOW: usize = 1024;
/// Hop between successive windows.
const HOP: usize = 512;
/// Minimum gap between consecutive onsets, to avoid re-triggering on
/// sustained loud passages.
const MIN_ONSET_GAP_SECONDS: f64 = 0.08;
/// Hard cap on reported onset events.
pub const MAX_ONSETS: usize = 200;
/// Plausible inter-beat interval range (60-240 BPM).
const MIN_INTERVAL: f64 = 0.25;
const MAX_INTERVAL: f64 = 1.0;
/// Intervals required before a BPM estimate is trusted at all.
const MIN_INTERVALS_FOR_BPM: usize = 6;
/// An interval within this fraction of the median counts as agreeing.
const INTERVAL_AGREEMENT: f64 = 0.12;

/// Onsets plus the synthesized beat grid for one PCM buffer.
#[derive(Debug, Clone, Default)]
pub struct OnsetAnalysis {
    /// Rising-threshold-crossing times, seconds.
    pub onsets: Vec<f64>,
    pub beat_grid: BeatGrid,
}

/// Detect onsets and estimate a beat grid from mono PCM.
///
/// Empty input yields `{bpm: None, beats: [], confidence: 0}` and no
/// onsets; this function never fails.
pub fn analyze_pcm(samples: &[i16], sample_rate: u32, duration_seconds: f64) -> OnsetAnalysis {
    if samples.is_empty() || sample_rate == 0 {
        return OnsetAnalysis::default();
    }

    let envelope = energy_envelope(samples);
    if envelope.is_empty() {
        return OnsetAnalysis::default();
    }

    let onsets = detect_onsets(&envelope, sample_rate);
    let beat_grid = build_beat_grid(&onsets, duration_seconds);

    OnsetAnalysis { onsets, beat_grid }
}

/// Mean-absolute-amplitude envelope over overlapping windows, normalized
/// to `[0, 1]` by its own peak.
fn energy_envelope(samples: &[i16]) -> Vec<f64> {
    if samples.len() < WINDOW {
        // One short window is still an envelope.
        let mean = samples.iter().map(|&s| (s as f64).abs()).sum::<f64>() / samples.len() as f64;
        return if mean > 0.0 { vec![1.0] } else { vec![0.0] };
    }

    let mut envelope = Vec::with_capacity(samples.len() / HOP);
    let mut pos = 0;
    while pos + WINDOW <= samples.len() {
        let window = &samples[pos..pos + WINDOW];
        let mean = window.iter().map(|&s| (s as f64).abs()).sum::<f64>() / WINDOW as f64;
        envelope.push(mean);
        pos += HOP;
    }

    let peak = envelope.iter().cloned().fold(0.0f64, f64::max);
    if peak > 0.0 {
        for v in &mut envelope {
            *v /= peak;
        }
    }
    envelope
}

/// Rising crossings of the `mean + 2*stddev` threshold, with an enforced
/// minimum gap, capped at `MAX_ONSETS`.
fn detect_onsets(envelope: &[f64], sample_rate: u32) -> Vec<f64> {
    let n = envelope.len() as f64;
    let mean = envelope.iter().sum::<f64>() / n;
    let variance = envelope.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
    let threshold = mean + 2.0 * variance.sqrt();

    let frame_seconds = HOP as f64 / sample_rate as f64;
    let mut onsets = Vec::new();
    let mut last_onset = f64::NEG_INFINITY;

    for i in 1..envelope.len() {
        if envelope[i - 1] < threshold && envelope[i] >= threshold {
            let t = i as f64 * frame_seconds;
            if t - last_onset >= MIN_ONSET_GAP_SECONDS {
                onsets.push(t);
                last_onset = t;
                if onsets.len() >= MAX_ONSETS {
                    break;
                }
            }
        }
    }
    onsets
}

/// Median-interval tempo estimate plus a synthesized grid of evenly spaced
/// beats stepped from the first onset.
fn build_beat_grid(onsets: &[f64], duration_seconds: f64) -> BeatGrid {
    let mut intervals: Vec<f64> = onsets
        .windows(2)
        .map(|w| w[1] - w[0])
        .filter(|&d| (MIN_INTERVAL..=MAX_INTERVAL).contains(&d))
        .collect();

    if intervals.len() < MIN_INTERVALS_FOR_BPM {
        // Not enough periodicity evidence; report candidate onsets only.
        return BeatGrid {
            bpm: None,
            beats: onsets.to_vec(),
            confidence: 0.0,
        };
    }

    intervals.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let median = intervals[intervals.len() / 2];

    let agreeing = intervals
        .iter()
        .filter(|&&d| (d - median).abs() <= median * INTERVAL_AGREEMENT)
        .count();
    let confidence = (agreeing as f64 / intervals.len() as f64).clamp(0.2, 0.95);

    let bpm = (60.0 / median * 10.0).round() / 10.0;

    let mut beats = Vec::new();
    let mut t = onsets[0];
    while t <= duration_seconds {
        beats.push(t);
        t += median;
    }

    BeatGrid {
        bpm: Some(bpm),
        beats,
        confidence,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: u32 = 22_050;

    /// Silence with short loud pulses every `spacing` seconds.
    fn pulse_train(duration: f64, spacing: f64) -> Vec<i16> {
        let total = (duration * SR as f64) as usize;
        let mut samples = vec![0i16; total];
        let mut t = 0.0;
        while t < duration {
            let start = (t * SR as f64) as usize;
            for i in start..(start + 2048).min(total) {
                samples[i] = 16_000;
            }
            t += spacing;
        }
        samples
    }

    #[test]
    fn empty_pcm_yields_empty_grid() {
        let result = analyze_pcm(&[], SR, 5.0);
        assert_eq!(result.beat_grid.bpm, None);
        assert!(result.beat_grid.beats.is_empty());
        assert_eq!(result.beat_grid.confidence, 0.0);
        assert!(result.onsets.is_empty());
    }

    #[test]
    fn silence_yields_no_onsets() {
        let samples = vec![0i16; SR as usize * 3];
        let result = analyze_pcm(&samples, SR, 3.0);
        assert!(result.onsets.is_empty());
        assert_eq!(result.beat_grid.bpm, None);
    }

    #[test]
    fn recovers_synthetic_120_bpm() {
        // Pulses every 0.5s over 5s.
        let samples = pulse_train(5.0, 0.5);
        let result = analyze_pcm(&samples, SR, 5.0);

        let bpm = result.beat_grid.bpm.expect("expected a bpm estimate");
        assert!(bpm > 90.0 && bpm < 150.0, "bpm {} out of range", bpm);
        assert!(!result.beat_grid.beats.is_empty());
        assert!(result.beat_grid.confidence >= 0.2);
    }

    #[test]
    fn sparse_onsets_report_no_bpm_but_keep_candidates() {
        // Three pulses: too few qualifying intervals for a tempo.
        let samples = pulse_train(3.0, 1.4);
        let result = analyze_pcm(&samples, SR, 3.0);
        assert_eq!(result.beat_grid.bpm, None);
        assert_eq!(result.beat_grid.beats.len(), result.onsets.len());
    }

    #[test]
    fn sustained_loud_passage_does_not_retrigger() {
        // 1s of silence then 2s of constant tone amplitude.
        let mut samples = vec![0i16; SR as usize];
        samples.extend(vec![12_000i16; SR as usize * 2]);
        let result = analyze_pcm(&samples, SR, 3.0);
        // A single rising edge, not hundreds of onsets.
        assert!(result.onsets.len() <= 2, "got {} onsets", result.onsets.len());
    }

    #[test]
    fn onset_count_is_capped() {
        assert!(MAX_ONSETS == 200);
        // 0.1s spacing over 30s would be 300 raw onsets.
        let samples = pulse_train(30.0, 0.1);
        let result = analyze_pcm(&samples, SR, 30.0);
        assert!(result.onsets.len() <= MAX_ONSETS);
    }

    #[test]
    fn beats_step_at_median_interval_until_duration() {
        let samples = pulse_train(5.0, 0.5);
        let result = analyze_pcm(&samples, SR, 5.0);
        let beats = &result.beat_grid.beats;
        assert!(beats.len() >= 8);
        for w in beats.windows(2) {
            assert!((w[1] - w[0] - 0.5).abs() < 0.1);
        }
        assert!(*beats.last().unwrap() <= 5.0);
    }
}
