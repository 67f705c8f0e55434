use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::error::{AnalyzerError, AnalyzerResult};

const FRAME_TIMEOUT: Duration = Duration::from_secs(15);
const PCM_TIMEOUT: Duration = Duration::from_secs(60);
const FFMPEG_HINT: &str = "install ffmpeg";

pub const MIN_FRAME_SIZE: u32 = 8;
pub const MAX_FRAME_SIZE: u32 = 256;

/// A square grayscale frame with pixel values in `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct GrayFrame {
    pub width: usize,
    pub height: usize,
    pub pixels: Vec<f32>,
}

impl GrayFrame {
    pub fn new(width: usize, height: usize, pixels: Vec<f32>) -> AnalyzerResult<Self> {
        if pixels.len() != width * height {
            return Err(AnalyzerError::InvalidInput(format!(
                "frame buffer has {} pixels, expected {}x{}",
                pixels.len(),
                width,
                height
            )));
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }
}

/// Frame and PCM extraction through ffmpeg stdout pipes.
#[derive(Debug, Clone, Default)]
pub struct MediaExtractor;

impl MediaExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Extract one grayscale frame at `time_seconds`, resized to
    /// `size`x`size`. Negative times clamp to 0; size clamps to `[8, 256]`.
    pub async fn gray_frame_at(
        &self,
        video_path: &Path,
        time_seconds: f64,
        size: u32,
    ) -> AnalyzerResult<GrayFrame> {
        let t = time_seconds.max(0.0);
        let size = size.clamp(MIN_FRAME_SIZE, MAX_FRAME_SIZE);

        let output = run_ffmpeg(
            &[
                "-v".to_string(),
                "error".to_string(),
                "-ss".to_string(),
                format!("{:.3}", t),
                "-i".to_string(),
                video_path.to_string_lossy().to_string(),
                "-frames:v".to_string(),
                "1".to_string(),
                "-vf".to_string(),
                format!("scale={}:{},format=gray", size, size),
                "-f".to_string(),
                "rawvideo".to_string(),
                "-".to_string(),
            ],
            FRAME_TIMEOUT,
        )
        .await?;

        let expected = (size * size) as usize;
        if output.len() < expected {
            return Err(AnalyzerError::ToolExecutionFailed {
                tool: "ffmpeg".to_string(),
                message: format!(
                    "frame extraction at {:.3}s returned {} bytes, expected {}",
                    t,
                    output.len(),
                    expected
                ),
            });
        }

        let pixels: Vec<f32> = output[..expected]
            .iter()
            .map(|&b| b as f32 / 255.0)
            .collect();

        debug!("🖼️ Extracted {}x{} gray frame at {:.3}s", size, size, t);
        GrayFrame::new(size as usize, size as usize, pixels)
    }

    /// Extract mono signed-16-bit PCM at `sample_rate`, optionally bounded
    /// to `max_seconds`. Returns an empty Vec (not an error) when the video
    /// has no audio stream.
    pub async fn pcm_mono(
        &self,
        video_path: &Path,
        sample_rate: u32,
        max_seconds: Option<f64>,
    ) -> AnalyzerResult<Vec<i16>> {
        let mut args = vec![
            "-v".to_string(),
            "error".to_string(),
            "-i".to_string(),
            video_path.to_string_lossy().to_string(),
            "-vn".to_string(),
            "-ac".to_string(),
            "1".to_string(),
            "-ar".to_string(),
            sample_rate.to_string(),
        ];
        if let Some(max) = max_seconds {
            args.push("-t".to_string());
            args.push(format!("{:.3}", max.max(0.0)));
        }
        args.extend([
            "-f".to_string(),
            "s16le".to_string(),
            "-".to_string(),
        ]);

        // ffmpeg exits non-zero when there is no audio stream to map; that
        // case is an empty result, not a failure.
        let bytes = match run_ffmpeg(&args, PCM_TIMEOUT).await {
            Ok(bytes) => bytes,
            Err(AnalyzerError::ToolExecutionFailed { message, .. })
                if message.contains("does not contain any stream")
                    || message.contains("Output file does not contain any stream")
                    || message.contains("matches no streams") =>
            {
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };

        let samples: Vec<i16> = bytes
            .chunks_exact(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]))
            .collect();

        debug!(
            "🎧 Extracted {} PCM samples ({:.2}s at {}Hz)",
            samples.len(),
            samples.len() as f64 / sample_rate as f64,
            sample_rate
        );
        Ok(samples)
    }

    /// Extract a mono WAV sidecar for the ASR engine.
    pub async fn extract_wav(
        &self,
        video_path: &Path,
        output_path: &Path,
        sample_rate: u32,
    ) -> AnalyzerResult<PathBuf> {
        if let Some(parent) = output_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        run_ffmpeg(
            &[
                "-v".to_string(),
                "error".to_string(),
                "-i".to_string(),
                video_path.to_string_lossy().to_string(),
                "-vn".to_string(),
                "-acodec".to_string(),
                "pcm_s16le".to_string(),
                "-ar".to_string(),
                sample_rate.to_string(),
                "-ac".to_string(),
                "1".to_string(),
                "-y".to_string(),
                output_path.to_string_lossy().to_string(),
            ],
            PCM_TIMEOUT,
        )
        .await?;

        debug!("🎵 Extracted audio to {}", output_path.display());
        Ok(output_path.to_path_buf())
    }
}

async fn run_ffmpeg(args: &[String], timeout: Duration) -> AnalyzerResult<Vec<u8>> {
    let child = tokio::process::Command::new("ffmpeg").args(args).output();

    let output = tokio::time::timeout(timeout, child)
        .await
        .map_err(|_| AnalyzerError::Timeout {
            tool: "ffmpeg".to_string(),
            seconds: timeout.as_secs(),
        })?
        .map_err(|e| AnalyzerError::from_spawn("ffmpeg", e, FFMPEG_HINT))?;

    if !output.status.success() {
        return Err(AnalyzerError::ToolExecutionFailed {
            tool: "ffmpeg".to_string(),
            message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(output.stdout)
}
