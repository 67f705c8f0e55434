use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info, warn};

use crate::error::AnalyzerResult;
use crate::extract::MediaExtractor;
use crate::features::{average_hash, classify_motion, hamming_distance};
use crate::model::{CameraMotion, Shot};

/// Hamming distance at or below this flags a jump cut: near-identical
/// frames straddling a registered cut.
const JUMP_CUT_MAX_DISTANCE: u32 = 8;
/// How far inside a shot the motion sample frames sit (seconds).
const FRAME_INSET_SECONDS: f64 = 0.06;
/// Frames are sampled this far either side of a boundary for jump cuts.
const BOUNDARY_OFFSET_SECONDS: f64 = 0.05;
/// Per-shot analysis cap for pathological inputs.
pub const MAX_ANALYZED_SHOTS: usize = 200;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditingOutcome {
    pub camera_motions: Vec<CameraMotion>,
    /// Ids of shots whose entering cut is a jump cut.
    pub jump_cut_shot_ids: Vec<u32>,
    pub notes: Vec<String>,
}

/// Per-shot camera-motion classification plus cross-boundary jump-cut
/// detection.
#[derive(Debug, Clone)]
pub struct EditingModule {
    /// Square sample size for extracted frames.
    pub frame_size: u32,
}

impl Default for EditingModule {
    fn default() -> Self {
        Self { frame_size: 64 }
    }
}

impl EditingModule {
    pub async fn analyze(&self, video_path: &Path, shots: &[Shot]) -> AnalyzerResult<EditingOutcome> {
        let extractor = MediaExtractor::new();
        let mut notes = Vec::new();

        let analyzed = &shots[..shots.len().min(MAX_ANALYZED_SHOTS)];
        if shots.len() > MAX_ANALYZED_SHOTS {
            notes.push(format!(
                "editing: analyzed first {} of {} shots",
                MAX_ANALYZED_SHOTS,
                shots.len()
            ));
        }

        let mut camera_motions = Vec::with_capacity(analyzed.len());
        let mut failed_shots = 0usize;

        for shot in analyzed {
            match self.classify_shot(&extractor, video_path, shot).await {
                Ok(motion) => camera_motions.push(motion),
                Err(e) => {
                    debug!("motion classification failed for shot {}: {}", shot.id, e);
                    failed_shots += 1;
                }
            }
        }
        if failed_shots > 0 {
            notes.push(format!(
                "editing: motion classification failed for {} shot(s)",
                failed_shots
            ));
        }

        let jump_cut_shot_ids = self
            .detect_jump_cuts(&extractor, video_path, analyzed, &mut notes)
            .await;

        info!(
            "✂️ Editing: {} motions classified, {} jump cuts",
            camera_motions.len(),
            jump_cut_shot_ids.len()
        );

        Ok(EditingOutcome {
            camera_motions,
            jump_cut_shot_ids,
            notes,
        })
    }

    /// Sample frames near the shot's start and end and run the
    /// translation-search classifier. Very short shots collapse both
    /// sample points to the midpoint and come out static.
    async fn classify_shot(
        &self,
        extractor: &MediaExtractor,
        video_path: &Path,
        shot: &Shot,
    ) -> AnalyzerResult<CameraMotion> {
        let mid = (shot.start + shot.end) / 2.0;
        let t_start = (shot.start + FRAME_INSET_SECONDS).min(mid);
        let t_end = (shot.end - FRAME_INSET_SECONDS).max(mid);

        let first = extractor
            .gray_frame_at(video_path, t_start, self.frame_size)
            .await?;
        let last = extractor
            .gray_frame_at(video_path, t_end, self.frame_size)
            .await?;

        let estimate = classify_motion(&first, &last)?;

        Ok(CameraMotion {
            shot_id: shot.id,
            motion: estimate.kind,
            start: shot.start,
            end: shot.end,
            confidence: estimate.confidence,
        })
    }

    /// For each adjacent shot pair, hash a frame just before and just after
    /// the boundary; a tiny Hamming distance means the cut joined
    /// near-identical framings.
    async fn detect_jump_cuts(
        &self,
        extractor: &MediaExtractor,
        video_path: &Path,
        shots: &[Shot],
        notes: &mut Vec<String>,
    ) -> Vec<u32> {
        let mut jump_cuts = Vec::new();
        let mut failures = 0usize;

        for pair in shots.windows(2) {
            let boundary = pair[1].start;
            let result = async {
                let before = extractor
                    .gray_frame_at(video_path, boundary - BOUNDARY_OFFSET_SECONDS, self.frame_size)
                    .await?;
                let after = extractor
                    .gray_frame_at(video_path, boundary + BOUNDARY_OFFSET_SECONDS, self.frame_size)
                    .await?;
                let distance =
                    hamming_distance(average_hash(&before)?, average_hash(&after)?);
                Ok::<u32, crate::error::AnalyzerError>(distance)
            }
            .await;

            match result {
                Ok(distance) if distance <= JUMP_CUT_MAX_DISTANCE => {
                    debug!(
                        "jump cut at {:.2}s (hamming {})",
                        boundary, distance
                    );
                    jump_cuts.push(pair[1].id);
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("jump-cut check failed at {:.2}s: {}", boundary, e);
                    failures += 1;
                }
            }
        }

        if failures > 0 {
            notes.push(format!("editing: {} jump-cut check(s) failed", failures));
        }
        jump_cuts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shot_cap_is_two_hundred() {
        assert_eq!(MAX_ANALYZED_SHOTS, 200);
    }

    #[test]
    fn jump_cut_threshold_accepts_near_identical_hashes() {
        assert!(hamming_distance(0xffff_0000_ffff_0000, 0xffff_0000_ffff_0001) <= JUMP_CUT_MAX_DISTANCE);
        assert!(hamming_distance(0xffff_ffff_0000_0000, 0x0000_0000_ffff_ffff) > JUMP_CUT_MAX_DISTANCE);
    }

    #[tokio::test]
    async fn missing_video_degrades_without_panicking() {
        let module = EditingModule::default();
        let shots = vec![
            Shot {
                id: 1,
                start: 0.0,
                end: 1.0,
                transition_in: None,
                jump_cut: None,
            },
            Shot {
                id: 2,
                start: 1.0,
                end: 2.0,
                transition_in: Some("cut".to_string()),
                jump_cut: None,
            },
        ];
        let outcome = module
            .analyze(Path::new("/nonexistent/video.mp4"), &shots)
            .await
            .unwrap();
        assert!(outcome.camera_motions.is_empty());
        assert!(outcome.jump_cut_shot_ids.is_empty());
        assert!(!outcome.notes.is_empty());
    }
}
