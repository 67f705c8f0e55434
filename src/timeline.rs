use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

use crate::error::{AnalyzerError, AnalyzerResult};
use crate::model::{PacingClass, Pacing, Shot, Timeline};

const SCENEDETECT_TIMEOUT: Duration = Duration::from_secs(60);
const FFMPEG_SCENE_TIMEOUT: Duration = Duration::from_secs(60);
/// Cuts closer together than this are the same cut (seconds).
const CUT_EPSILON: f64 = 0.025;

/// Shot boundary detector selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorStrategy {
    /// Try PySceneDetect first, fall back to the ffmpeg scene filter.
    Auto,
    SceneDetect,
    FfmpegScene,
}

impl FromStr for DetectorStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(Self::Auto),
            "scenedetect" => Ok(Self::SceneDetect),
            "ffmpeg" => Ok(Self::FfmpegScene),
            other => Err(format!(
                "unknown detector '{}' (expected auto|scenedetect|ffmpeg)",
                other
            )),
        }
    }
}

/// Shot segmentation: boundary detection, shot building and pacing stats.
#[derive(Debug, Clone)]
pub struct TimelineModule {
    /// PySceneDetect content threshold (its own 0-255-ish scale).
    pub scenedetect_threshold: f64,
    /// ffmpeg scene-score threshold on [0,1].
    pub ffmpeg_scene_threshold: f64,
}

impl Default for TimelineModule {
    fn default() -> Self {
        Self {
            scenedetect_threshold: 30.0,
            ffmpeg_scene_threshold: 0.35,
        }
    }
}

/// Result of one timeline analysis, with the technique that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineOutcome {
    pub timeline: Timeline,
    pub technique: String,
    pub notes: Vec<String>,
}

impl TimelineModule {
    pub async fn analyze(
        &self,
        video_path: &Path,
        duration: f64,
        strategy: DetectorStrategy,
    ) -> AnalyzerResult<TimelineOutcome> {
        let mut notes = Vec::new();

        let (cuts, technique) = match strategy {
            DetectorStrategy::SceneDetect => (
                self.detect_cuts_scenedetect(video_path).await?,
                "pyscenedetect-content".to_string(),
            ),
            DetectorStrategy::FfmpegScene => (
                self.detect_cuts_ffmpeg(video_path).await?,
                "ffmpeg-scene-score".to_string(),
            ),
            DetectorStrategy::Auto => match self.detect_cuts_scenedetect(video_path).await {
                Ok(cuts) => (cuts, "pyscenedetect-content".to_string()),
                Err(e) => {
                    warn!("scenedetect unavailable, falling back to ffmpeg: {}", e);
                    notes.push(format!(
                        "timeline: scenedetect failed ({}), fell back to ffmpeg scene filter",
                        e
                    ));
                    (
                        self.detect_cuts_ffmpeg(video_path).await?,
                        "ffmpeg-scene-score".to_string(),
                    )
                }
            },
        };

        let cuts = normalize_cuts(cuts, duration);
        let shots = build_shots(&cuts, duration);
        let pacing = compute_pacing(&shots);

        info!(
            "🎬 Timeline: {} shots via {} ({:?} pacing)",
            shots.len(),
            technique,
            pacing.classification
        );

        Ok(TimelineOutcome {
            timeline: Timeline { shots, pacing },
            technique,
            notes,
        })
    }

    /// Detector A: PySceneDetect content detector, CSV output parsed from a
    /// scratch directory.
    async fn detect_cuts_scenedetect(&self, video_path: &Path) -> AnalyzerResult<Vec<f64>> {
        let scratch = tempfile::tempdir()?;

        let child = tokio::process::Command::new("scenedetect")
            .arg("--input")
            .arg(video_path)
            .arg("--output")
            .arg(scratch.path())
            .args([
                "detect-content",
                "--threshold",
                &self.scenedetect_threshold.to_string(),
                "list-scenes",
                "--quiet",
            ])
            .output();

        let output = tokio::time::timeout(SCENEDETECT_TIMEOUT, child)
            .await
            .map_err(|_| AnalyzerError::Timeout {
                tool: "scenedetect".to_string(),
                seconds: SCENEDETECT_TIMEOUT.as_secs(),
            })?
            .map_err(|e| {
                AnalyzerError::from_spawn("scenedetect", e, "pip install scenedetect")
            })?;

        if !output.status.success() {
            return Err(AnalyzerError::ToolExecutionFailed {
                tool: "scenedetect".to_string(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        // list-scenes writes "<stem>-Scenes.csv" into the output directory.
        let mut csv_content = None;
        let mut entries = tokio::fs::read_dir(scratch.path()).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry
                .path()
                .file_name()
                .map_or(false, |n| n.to_string_lossy().ends_with("-Scenes.csv"))
            {
                csv_content = Some(tokio::fs::read_to_string(entry.path()).await?);
                break;
            }
        }

        let csv = csv_content.ok_or_else(|| AnalyzerError::ToolExecutionFailed {
            tool: "scenedetect".to_string(),
            message: "no scene CSV produced".to_string(),
        })?;

        Ok(parse_scenedetect_csv(&csv))
    }

    /// Detector B: ffprobe lavfi scene-score filter, frame timestamps read
    /// from its CSV log output.
    async fn detect_cuts_ffmpeg(&self, video_path: &Path) -> AnalyzerResult<Vec<f64>> {
        let movie = format!(
            "movie={}:f=lavfi,select=gt(scene\\,{})",
            escape_lavfi_path(&video_path.to_string_lossy()),
            self.ffmpeg_scene_threshold
        );

        let child = tokio::process::Command::new("ffprobe")
            .args([
                "-v",
                "error",
                "-f",
                "lavfi",
                "-i",
                &movie,
                "-show_entries",
                "frame=pts_time",
                "-of",
                "csv=p=0",
            ])
            .output();

        let output = tokio::time::timeout(FFMPEG_SCENE_TIMEOUT, child)
            .await
            .map_err(|_| AnalyzerError::Timeout {
                tool: "ffprobe".to_string(),
                seconds: FFMPEG_SCENE_TIMEOUT.as_secs(),
            })?
            .map_err(|e| AnalyzerError::from_spawn("ffprobe", e, "install ffmpeg"))?;

        if !output.status.success() {
            return Err(AnalyzerError::ToolExecutionFailed {
                tool: "ffprobe".to_string(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let cuts = stdout
            .lines()
            .filter_map(|line| line.trim().trim_end_matches(',').parse::<f64>().ok())
            .collect();
        Ok(cuts)
    }
}

/// Scene starts (seconds) from a PySceneDetect `list-scenes` CSV. The first
/// scene starts at 0 and is not a cut.
fn parse_scenedetect_csv(csv: &str) -> Vec<f64> {
    let mut cuts = Vec::new();
    for line in csv.lines() {
        let cols: Vec<&str> = line.split(',').collect();
        // Data rows: Scene Number, Start Frame, Start Timecode, Start Time (seconds), ...
        if cols.len() < 4 {
            continue;
        }
        if cols[0].trim().parse::<u32>().is_err() {
            continue; // header / timecode-list rows
        }
        if let Ok(start) = cols[3].trim().parse::<f64>() {
            if start > 0.0 {
                cuts.push(start);
            }
        }
    }
    cuts
}

/// lavfi movie= source needs colons and quotes escaped.
fn escape_lavfi_path(path: &str) -> String {
    path.replace('\\', "\\\\").replace(':', "\\:").replace('\'', "\\'")
}

/// Sort, dedupe within the epsilon, and clip cuts to the open interval
/// `(0, duration)`.
pub fn normalize_cuts(mut cuts: Vec<f64>, duration: f64) -> Vec<f64> {
    cuts.retain(|&t| t.is_finite() && t > 0.0 && t < duration);
    cuts.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let mut deduped: Vec<f64> = Vec::with_capacity(cuts.len());
    for t in cuts {
        if deduped.last().map_or(true, |&last| t - last > CUT_EPSILON) {
            deduped.push(t);
        }
    }
    deduped
}

/// Build contiguous shots `[0,c1), [c1,c2), ..., [cn,duration)`. The first
/// shot has no transition; every other shot enters on a cut.
pub fn build_shots(cuts: &[f64], duration: f64) -> Vec<Shot> {
    let mut boundaries = Vec::with_capacity(cuts.len() + 2);
    boundaries.push(0.0);
    boundaries.extend_from_slice(cuts);
    boundaries.push(duration);

    boundaries
        .windows(2)
        .enumerate()
        .map(|(i, w)| Shot {
            id: (i + 1) as u32,
            start: w[0],
            end: w[1],
            transition_in: if i == 0 { None } else { Some("cut".to_string()) },
            jump_cut: None,
        })
        .collect()
}

pub fn compute_pacing(shots: &[Shot]) -> Pacing {
    if shots.is_empty() {
        return Pacing {
            shot_count: 0,
            mean_shot_seconds: 0.0,
            median_shot_seconds: 0.0,
            min_shot_seconds: 0.0,
            max_shot_seconds: 0.0,
            classification: PacingClass::Slow,
        };
    }

    let mut durations: Vec<f64> = shots.iter().map(Shot::duration).collect();
    durations.sort_by(|a, b| a.partial_cmp(b).unwrap());

    let mean = durations.iter().sum::<f64>() / durations.len() as f64;
    let median = if durations.len() % 2 == 1 {
        durations[durations.len() / 2]
    } else {
        (durations[durations.len() / 2 - 1] + durations[durations.len() / 2]) / 2.0
    };

    Pacing {
        shot_count: shots.len(),
        mean_shot_seconds: mean,
        median_shot_seconds: median,
        min_shot_seconds: durations[0],
        max_shot_seconds: durations[durations.len() - 1],
        classification: PacingClass::from_mean_seconds(mean),
    }
}
