use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::error::{AnalyzerError, AnalyzerResult};

/// Schema version of the output document. Consumers must not assume
/// forward compatibility across bumps.
pub const ANALYSIS_VERSION: &str = "1.0";

/// Timing comparisons tolerate this much jitter (seconds).
pub const TIME_EPSILON: f64 = 0.05;

/// Root output document describing one video end-to-end.
///
/// Immutable once produced; written once per analysis run and never
/// partially persisted except through the per-module cache.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct VideoAnalysis {
    pub version: String,
    pub meta: Meta,
    pub timeline: Timeline,
    pub editing: Editing,
    pub audio: AudioStructure,
    pub entities: Entities,
    pub narrative: Narrative,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inserted_content_blocks: Option<Vec<InsertedContentBlock>>,
    pub provenance: Provenance,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Meta {
    pub source_path: PathBuf,
    pub duration_seconds: f64,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub file_size_bytes: u64,
    pub analyzed_at: DateTime<Utc>,
    pub notes: Vec<String>,
}

/// A contiguous, uncut span of video between two detected cuts.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Shot {
    /// 1-based, strictly increasing.
    pub id: u32,
    pub start: f64,
    pub end: f64,
    /// Absent on the first shot; `"cut"` on all others.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transition_in: Option<String>,
    /// Set when the frames straddling the cut are near-identical.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jump_cut: Option<bool>,
}

impl Shot {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Timeline {
    pub shots: Vec<Shot>,
    pub pacing: Pacing,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Pacing {
    pub shot_count: usize,
    pub mean_shot_seconds: f64,
    pub median_shot_seconds: f64,
    pub min_shot_seconds: f64,
    pub max_shot_seconds: f64,
    pub classification: PacingClass,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum PacingClass {
    VeryFast,
    Fast,
    Moderate,
    Slow,
}

impl PacingClass {
    /// Classification by mean shot duration.
    pub fn from_mean_seconds(mean: f64) -> Self {
        if mean < 1.0 {
            PacingClass::VeryFast
        } else if mean < 2.0 {
            PacingClass::Fast
        } else if mean < 4.0 {
            PacingClass::Moderate
        } else {
            PacingClass::Slow
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TranscriptSegment {
    pub start: f64,
    pub end: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

/// On-screen text that mirrors the spoken transcript.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Caption {
    pub text: String,
    pub start: f64,
    pub end: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
}

/// On-screen text with no transcript counterpart.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TextOverlay {
    pub text: String,
    pub start: f64,
    pub end: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    pub position: String,
}

/// `ZoomIn`/`ZoomOut` are reserved values: the translation-only motion
/// search cannot observe scale change, so the heuristic never emits them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum CameraMotionKind {
    Static,
    ZoomIn,
    ZoomOut,
    PanLeft,
    PanRight,
    Tilt,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CameraMotion {
    pub shot_id: u32,
    pub motion: CameraMotionKind,
    pub start: f64,
    pub end: f64,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Editing {
    pub camera_motions: Vec<CameraMotion>,
    pub jump_cut_count: usize,
}

impl Default for Editing {
    fn default() -> Self {
        Self {
            camera_motions: Vec::new(),
            jump_cut_count: 0,
        }
    }
}

/// Estimated tempo plus synthesized evenly spaced beat timestamps.
/// `bpm` is None when periodicity evidence is insufficient; `beats` may
/// still carry candidate onsets.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct BeatGrid {
    pub bpm: Option<f64>,
    pub beats: Vec<f64>,
    pub confidence: f64,
}

impl Default for BeatGrid {
    fn default() -> Self {
        Self {
            bpm: None,
            beats: Vec::new(),
            confidence: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SoundEffect {
    pub time: f64,
    pub kind: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct MusicSegment {
    pub start: f64,
    pub end: f64,
    pub track: Option<String>,
    /// True when the segment's range overlaps any transcript segment.
    pub background: bool,
    pub description: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct AudioStructure {
    #[serde(default)]
    pub beat_grid: BeatGrid,
    pub sound_effects: Vec<SoundEffect>,
    pub music_segments: Vec<MusicSegment>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct Entities {
    pub transcript: Vec<TranscriptSegment>,
    pub captions: Vec<Caption>,
    pub text_overlays: Vec<TextOverlay>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct NarrativePhase {
    pub start: f64,
    pub end: f64,
    pub description: String,
}

/// Heuristic hook/escalation/payoff decomposition of the timeline.
/// The three phases are contiguous and cover `[0, duration]`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct Narrative {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hook: Option<NarrativePhase>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub escalation: Option<NarrativePhase>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payoff: Option<NarrativePhase>,
    pub themes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_to_action: Option<String>,
}

/// Reserved for the generation pipeline; this analyzer never populates it.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct InsertedContentBlock {
    pub start: f64,
    pub end: f64,
    pub kind: String,
    pub description: String,
}

/// Which technique/engine (or `"cache"`/`"disabled"`/`"unavailable"`)
/// produced each module's output, plus ordered degradation notes.
/// Module keys: `timeline`, `transcript`, `ocr`, `editing`,
/// `beat_tracking`, `narrative`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct Provenance {
    pub modules: BTreeMap<String, String>,
    pub notes: Vec<String>,
}

impl VideoAnalysis {
    /// Invariant pass over the complete document. Failure is fatal for the
    /// whole run: nothing is persisted on a validation error.
    pub fn validate(&self) -> AnalyzerResult<()> {
        let duration = self.meta.duration_seconds;
        if !duration.is_finite() || duration < 0.0 {
            return Err(AnalyzerError::SchemaValidation(format!(
                "meta.duration_seconds invalid: {}",
                duration
            )));
        }

        self.validate_shots(duration)?;
        self.validate_segments()?;
        self.validate_narrative(duration)?;

        for module in [
            "timeline",
            "transcript",
            "ocr",
            "editing",
            "beat_tracking",
            "narrative",
        ] {
            if !self.provenance.modules.contains_key(module) {
                return Err(AnalyzerError::SchemaValidation(format!(
                    "provenance missing module entry '{}'",
                    module
                )));
            }
        }

        if self.audio.sound_effects.len() > 200 {
            return Err(AnalyzerError::SchemaValidation(format!(
                "sound_effects exceeds cap: {}",
                self.audio.sound_effects.len()
            )));
        }

        Ok(())
    }

    fn validate_shots(&self, duration: f64) -> AnalyzerResult<()> {
        let shots = &self.timeline.shots;
        if shots.is_empty() {
            // Degraded timeline: allowed, but pacing must agree.
            if self.timeline.pacing.shot_count != 0 {
                return Err(AnalyzerError::SchemaValidation(
                    "pacing.shot_count disagrees with empty shot list".to_string(),
                ));
            }
            return Ok(());
        }

        if self.timeline.pacing.shot_count != shots.len() {
            return Err(AnalyzerError::SchemaValidation(format!(
                "pacing.shot_count {} != shots.len() {}",
                self.timeline.pacing.shot_count,
                shots.len()
            )));
        }

        if shots[0].start.abs() > TIME_EPSILON {
            return Err(AnalyzerError::SchemaValidation(format!(
                "first shot starts at {}, expected 0",
                shots[0].start
            )));
        }
        if (shots[shots.len() - 1].end - duration).abs() > TIME_EPSILON {
            return Err(AnalyzerError::SchemaValidation(format!(
                "last shot ends at {}, expected duration {}",
                shots[shots.len() - 1].end,
                duration
            )));
        }

        let mut prev_id = 0u32;
        for (i, shot) in shots.iter().enumerate() {
            if shot.end < shot.start {
                return Err(AnalyzerError::SchemaValidation(format!(
                    "shot {} has end {} < start {}",
                    shot.id, shot.end, shot.start
                )));
            }
            if shot.id <= prev_id {
                return Err(AnalyzerError::SchemaValidation(format!(
                    "shot ids not strictly increasing at index {}",
                    i
                )));
            }
            prev_id = shot.id;
            if i > 0 {
                let gap = (shot.start - shots[i - 1].end).abs();
                if gap > TIME_EPSILON {
                    return Err(AnalyzerError::SchemaValidation(format!(
                        "shots {} and {} not contiguous (gap {:.3}s)",
                        shots[i - 1].id,
                        shot.id,
                        gap
                    )));
                }
            }
        }
        Ok(())
    }

    fn validate_segments(&self) -> AnalyzerResult<()> {
        for seg in &self.entities.transcript {
            if seg.end < seg.start {
                return Err(AnalyzerError::SchemaValidation(format!(
                    "transcript segment end {} < start {}",
                    seg.end, seg.start
                )));
            }
        }
        for cap in &self.entities.captions {
            if cap.end < cap.start {
                return Err(AnalyzerError::SchemaValidation(
                    "caption end precedes start".to_string(),
                ));
            }
        }
        for ov in &self.entities.text_overlays {
            if ov.end < ov.start {
                return Err(AnalyzerError::SchemaValidation(
                    "text overlay end precedes start".to_string(),
                ));
            }
        }
        Ok(())
    }

    fn validate_narrative(&self, duration: f64) -> AnalyzerResult<()> {
        let n = &self.narrative;
        match (&n.hook, &n.escalation, &n.payoff) {
            (Some(hook), Some(esc), Some(payoff)) => {
                if hook.start.abs() > TIME_EPSILON {
                    return Err(AnalyzerError::SchemaValidation(
                        "hook does not start at 0".to_string(),
                    ));
                }
                if (hook.end - esc.start).abs() > TIME_EPSILON
                    || (esc.end - payoff.start).abs() > TIME_EPSILON
                {
                    return Err(AnalyzerError::SchemaValidation(
                        "narrative phases not contiguous".to_string(),
                    ));
                }
                if (payoff.end - duration).abs() > TIME_EPSILON {
                    return Err(AnalyzerError::SchemaValidation(
                        "payoff does not end at duration".to_string(),
                    ));
                }
                Ok(())
            }
            (None, None, None) => Ok(()),
            _ => Err(AnalyzerError::SchemaValidation(
                "narrative phases must be all present or all absent".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_analysis() -> VideoAnalysis {
        let mut provenance = Provenance::default();
        for m in [
            "timeline",
            "transcript",
            "ocr",
            "editing",
            "beat_tracking",
            "narrative",
        ] {
            provenance.modules.insert(m.to_string(), "test".to_string());
        }
        VideoAnalysis {
            version: ANALYSIS_VERSION.to_string(),
            meta: Meta {
                source_path: PathBuf::from("test.mp4"),
                duration_seconds: 10.0,
                width: 1080,
                height: 1920,
                fps: 30.0,
                file_size_bytes: 1024,
                analyzed_at: Utc::now(),
                notes: Vec::new(),
            },
            timeline: Timeline {
                shots: vec![
                    Shot {
                        id: 1,
                        start: 0.0,
                        end: 4.0,
                        transition_in: None,
                        jump_cut: None,
                    },
                    Shot {
                        id: 2,
                        start: 4.0,
                        end: 10.0,
                        transition_in: Some("cut".to_string()),
                        jump_cut: None,
                    },
                ],
                pacing: Pacing {
                    shot_count: 2,
                    mean_shot_seconds: 5.0,
                    median_shot_seconds: 5.0,
                    min_shot_seconds: 4.0,
                    max_shot_seconds: 6.0,
                    classification: PacingClass::Slow,
                },
            },
            editing: Editing::default(),
            audio: AudioStructure::default(),
            entities: Entities::default(),
            narrative: Narrative::default(),
            inserted_content_blocks: None,
            provenance,
        }
    }

    #[test]
    fn valid_document_passes() {
        base_analysis().validate().unwrap();
    }

    #[test]
    fn shot_gap_fails_validation() {
        let mut doc = base_analysis();
        doc.timeline.shots[1].start = 5.0;
        assert!(doc.validate().is_err());
    }

    #[test]
    fn non_increasing_shot_ids_fail() {
        let mut doc = base_analysis();
        doc.timeline.shots[1].id = 1;
        assert!(doc.validate().is_err());
    }

    #[test]
    fn missing_provenance_entry_fails() {
        let mut doc = base_analysis();
        doc.provenance.modules.remove("timeline");
        assert!(doc.validate().is_err());
    }

    #[test]
    fn partial_narrative_fails() {
        let mut doc = base_analysis();
        doc.narrative.hook = Some(NarrativePhase {
            start: 0.0,
            end: 3.0,
            description: "hook".to_string(),
        });
        assert!(doc.validate().is_err());
    }

    #[test]
    fn contiguous_narrative_passes() {
        let mut doc = base_analysis();
        doc.narrative.hook = Some(NarrativePhase {
            start: 0.0,
            end: 3.0,
            description: String::new(),
        });
        doc.narrative.escalation = Some(NarrativePhase {
            start: 3.0,
            end: 7.5,
            description: String::new(),
        });
        doc.narrative.payoff = Some(NarrativePhase {
            start: 7.5,
            end: 10.0,
            description: String::new(),
        });
        doc.validate().unwrap();
    }

    #[test]
    fn pacing_classification_thresholds() {
        assert_eq!(PacingClass::from_mean_seconds(0.5), PacingClass::VeryFast);
        assert_eq!(PacingClass::from_mean_seconds(1.5), PacingClass::Fast);
        assert_eq!(PacingClass::from_mean_seconds(3.9), PacingClass::Moderate);
        assert_eq!(PacingClass::from_mean_seconds(4.0), PacingClass::Slow);
    }

    #[test]
    fn schema_round_trip_is_lossless() {
        let doc = base_analysis();
        let json = serde_json::to_string_pretty(&doc).unwrap();
        let back: VideoAnalysis = serde_json::from_str(&json).unwrap();
        let json2 = serde_json::to_string_pretty(&back).unwrap();
        assert_eq!(json, json2);
        back.validate().unwrap();
    }
}
