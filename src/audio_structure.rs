use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::error::AnalyzerResult;
use crate::extract::MediaExtractor;
use crate::features::analyze_pcm;
use crate::model::{AudioStructure, MusicSegment, SoundEffect, TranscriptSegment};

/// Analysis sample rate for beat/onset work.
const ANALYSIS_SAMPLE_RATE: u32 = 22_050;
/// PCM analysis is bounded for runtime safety on long inputs.
const MAX_ANALYZED_SECONDS: f64 = 120.0;

/// A confident grid needs at least this many beats to call it music.
const MIN_BEATS_FOR_MUSIC: usize = 8;
const MIN_GRID_CONFIDENCE: f64 = 0.6;
/// Weaker evidence: onsets plus speech suggest an audio bed.
const MIN_ONSETS_FOR_BED: usize = 6;
const BED_CONFIDENCE: f64 = 0.55;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioOutcome {
    pub audio: AudioStructure,
    pub technique: String,
    pub notes: Vec<String>,
}

/// Beat grid, sound-effect onsets and music-segment inference from raw PCM.
#[derive(Debug, Clone, Default)]
pub struct AudioStructureModule;

impl AudioStructureModule {
    pub fn new() -> Self {
        Self
    }

    pub async fn analyze(
        &self,
        video_path: &Path,
        duration: f64,
        transcript: &[TranscriptSegment],
    ) -> AnalyzerResult<AudioOutcome> {
        let analyzed_seconds = duration.min(MAX_ANALYZED_SECONDS);
        let pcm = MediaExtractor::new()
            .pcm_mono(video_path, ANALYSIS_SAMPLE_RATE, Some(analyzed_seconds))
            .await?;

        if pcm.is_empty() {
            return Ok(AudioOutcome {
                audio: AudioStructure::default(),
                technique: "no-audio".to_string(),
                notes: vec!["audio_structure: no audio stream".to_string()],
            });
        }

        let mut notes = Vec::new();
        if duration > MAX_ANALYZED_SECONDS {
            notes.push(format!(
                "audio_structure: analyzed first {:.0}s of {:.0}s",
                MAX_ANALYZED_SECONDS, duration
            ));
        }

        let analysis = analyze_pcm(&pcm, ANALYSIS_SAMPLE_RATE, analyzed_seconds);

        let sound_effects: Vec<SoundEffect> = analysis
            .onsets
            .iter()
            .map(|&time| SoundEffect {
                time,
                kind: "onset".to_string(),
                confidence: 0.6,
            })
            .collect();

        let music_segments = infer_music_segments(
            &analysis.beat_grid.bpm,
            analysis.beat_grid.beats.len(),
            analysis.beat_grid.confidence,
            analysis.onsets.len(),
            analyzed_seconds,
            transcript,
        );

        info!(
            "🥁 Audio structure: bpm={:?}, {} onsets, {} music segment(s)",
            analysis.beat_grid.bpm,
            sound_effects.len(),
            music_segments.len()
        );

        Ok(AudioOutcome {
            audio: AudioStructure {
                beat_grid: analysis.beat_grid,
                sound_effects,
                music_segments,
            },
            technique: "energy-onset".to_string(),
            notes,
        })
    }
}

fn overlaps_transcript(start: f64, end: f64, transcript: &[TranscriptSegment]) -> bool {
    transcript
        .iter()
        .any(|t| t.start < end && start < t.end)
}

/// Strong periodicity over the analyzed range reads as one music segment;
/// noticeable onsets under speech read as a low-confidence audio bed.
fn infer_music_segments(
    bpm: &Option<f64>,
    beat_count: usize,
    grid_confidence: f64,
    onset_count: usize,
    analyzed_seconds: f64,
    transcript: &[TranscriptSegment],
) -> Vec<MusicSegment> {
    let background = overlaps_transcript(0.0, analyzed_seconds, transcript);

    if bpm.is_some() && beat_count >= MIN_BEATS_FOR_MUSIC && grid_confidence >= MIN_GRID_CONFIDENCE
    {
        return vec![MusicSegment {
            start: 0.0,
            end: analyzed_seconds,
            track: None,
            background,
            description: format!("steady beat around {:.1} BPM", bpm.unwrap_or(0.0)),
            confidence: grid_confidence,
        }];
    }

    if !transcript.is_empty() && onset_count >= MIN_ONSETS_FOR_BED {
        return vec![MusicSegment {
            start: 0.0,
            end: analyzed_seconds,
            track: None,
            background,
            description: "audio bed present".to_string(),
            confidence: BED_CONFIDENCE,
        }];
    }

    Vec::new()
}
