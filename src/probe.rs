use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::{AnalyzerError, AnalyzerResult};

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);
const FFPROBE_HINT: &str = "install ffmpeg (provides ffprobe)";

/// Container-level facts about the input video.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaInfo {
    pub duration_seconds: f64,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub has_audio_stream: bool,
    pub file_size: u64,
    pub container: String,
}

/// ffprobe wrapper reporting duration, resolution, frame rate and audio
/// stream presence.
#[derive(Debug, Clone, Default)]
pub struct MediaProbe;

impl MediaProbe {
    pub fn new() -> Self {
        Self
    }

    pub async fn probe(&self, video_path: &Path) -> AnalyzerResult<MediaInfo> {
        let child = tokio::process::Command::new("ffprobe")
            .args([
                "-v",
                "error",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(video_path)
            .output();

        let output = tokio::time::timeout(PROBE_TIMEOUT, child)
            .await
            .map_err(|_| AnalyzerError::Timeout {
                tool: "ffprobe".to_string(),
                seconds: PROBE_TIMEOUT.as_secs(),
            })?
            .map_err(|e| AnalyzerError::from_spawn("ffprobe", e, FFPROBE_HINT))?;

        if !output.status.success() {
            return Err(AnalyzerError::ToolExecutionFailed {
                tool: "ffprobe".to_string(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let data: serde_json::Value = serde_json::from_slice(&output.stdout)?;
        let streams = data["streams"].as_array().cloned().unwrap_or_default();

        let video_stream = streams
            .iter()
            .find(|s| s["codec_type"] == "video")
            .ok_or_else(|| AnalyzerError::ToolExecutionFailed {
                tool: "ffprobe".to_string(),
                message: format!("no video stream in {}", video_path.display()),
            })?;

        let has_audio_stream = streams.iter().any(|s| s["codec_type"] == "audio");

        let duration_seconds: f64 = data["format"]["duration"]
            .as_str()
            .and_then(|s| s.parse().ok())
            .or_else(|| {
                video_stream["duration"]
                    .as_str()
                    .and_then(|s| s.parse().ok())
            })
            .unwrap_or(0.0);

        let file_size = tokio::fs::metadata(video_path).await?.len();

        let info = MediaInfo {
            duration_seconds,
            width: video_stream["width"].as_u64().unwrap_or(0) as u32,
            height: video_stream["height"].as_u64().unwrap_or(0) as u32,
            fps: parse_fraction(video_stream["r_frame_rate"].as_str()).unwrap_or(0.0),
            has_audio_stream,
            file_size,
            container: data["format"]["format_name"]
                .as_str()
                .unwrap_or("unknown")
                .to_string(),
        };

        info!(
            "📹 Probed {}: {}x{} @ {:.1}fps, {:.2}s, audio={}",
            video_path.display(),
            info.width,
            info.height,
            info.fps,
            info.duration_seconds,
            info.has_audio_stream
        );

        Ok(info)
    }
}

/// Parse ffprobe rational rates like "30000/1001"; "0/0" and empty are None.
fn parse_fraction(value: Option<&str>) -> Option<f64> {
    let value = value?.trim();
    if value.is_empty() || value == "0/0" {
        return None;
    }
    match value.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.parse().ok()?;
            let den: f64 = den.parse().ok()?;
            if den == 0.0 {
                None
            } else {
                Some(num / den)
            }
        }
        None => value.parse().ok(),
    }
}
