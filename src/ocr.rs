use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{AnalyzerError, AnalyzerResult};
use crate::model::{Caption, TextOverlay, TranscriptSegment};

const SAMPLE_TIMEOUT: Duration = Duration::from_secs(60);
const TESSERACT_TIMEOUT: Duration = Duration::from_secs(10);
const TESSERACT_HINT: &str = "install tesseract-ocr";

/// Adjacent frames with text this similar are the same on-screen segment.
const GROUP_SIMILARITY: f64 = 0.9;
/// OCR text matching a transcript segment at least this well is a caption.
const CAPTION_SIMILARITY: f64 = 0.55;

/// Recognized text for one sampled frame.
#[derive(Debug, Clone)]
pub struct FrameText {
    pub time: f64,
    pub text: String,
    pub confidence: f64,
}

/// One grouped on-screen text span, before classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrSegment {
    pub text: String,
    pub start: f64,
    pub end: f64,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrOutcome {
    pub captions: Vec<Caption>,
    pub text_overlays: Vec<TextOverlay>,
    pub engine: String,
    pub notes: Vec<String>,
}

/// Frame sampling + external OCR + caption-vs-overlay classification
/// against the transcript.
#[derive(Debug, Clone)]
pub struct OcrModule {
    /// First-pass sampling rate (frames per second).
    pub fps_first: f64,
    /// Refine-pass sampling rate.
    pub fps_refine: f64,
    /// Fraction of frame height, from the bottom, where captions live.
    pub crop_bottom_fraction: f64,
    pub two_pass: bool,
}

impl Default for OcrModule {
    fn default() -> Self {
        Self {
            fps_first: 1.0,
            fps_refine: 2.0,
            crop_bottom_fraction: 0.4,
            two_pass: true,
        }
    }
}

impl OcrModule {
    pub async fn analyze(
        &self,
        video_path: &Path,
        transcript: &[TranscriptSegment],
    ) -> AnalyzerResult<OcrOutcome> {
        let mut notes = Vec::new();

        let mut segments = self.run_pass(video_path, self.fps_first).await?;

        if self.two_pass {
            match self.run_pass(video_path, self.fps_refine).await {
                Ok(refined) if !refined.is_empty() => {
                    debug!("OCR refine pass found {} segments", refined.len());
                    segments = refined;
                }
                Ok(_) => {
                    notes.push(
                        "ocr: refine pass found no text, keeping first-pass segments".to_string(),
                    );
                }
                Err(e) => {
                    warn!("OCR refine pass failed: {}", e);
                    notes.push(format!("ocr: refine pass failed ({}), keeping first pass", e));
                }
            }
        }

        let (captions, text_overlays) = classify_segments(&segments, transcript);

        info!(
            "🔤 OCR: {} captions, {} overlays from {} segments",
            captions.len(),
            text_overlays.len(),
            segments.len()
        );

        Ok(OcrOutcome {
            captions,
            text_overlays,
            engine: "tesseract".to_string(),
            notes,
        })
    }

    /// Sample the caption-likely crop at `fps` and OCR every frame.
    async fn run_pass(&self, video_path: &Path, fps: f64) -> AnalyzerResult<Vec<OcrSegment>> {
        let scratch = tempfile::tempdir()?;
        let pattern = scratch.path().join("frame%05d.png");

        let crop = format!(
            "fps={},crop=iw:ih*{:.2}:0:ih*{:.2}",
            fps,
            self.crop_bottom_fraction,
            1.0 - self.crop_bottom_fraction
        );

        let child = tokio::process::Command::new("ffmpeg")
            .args(["-v", "error", "-i"])
            .arg(video_path)
            .args(["-vf", &crop])
            .arg(&pattern)
            .output();

        let output = tokio::time::timeout(SAMPLE_TIMEOUT, child)
            .await
            .map_err(|_| AnalyzerError::Timeout {
                tool: "ffmpeg".to_string(),
                seconds: SAMPLE_TIMEOUT.as_secs(),
            })?
            .map_err(|e| AnalyzerError::from_spawn("ffmpeg", e, "install ffmpeg"))?;

        if !output.status.success() {
            return Err(AnalyzerError::ToolExecutionFailed {
                tool: "ffmpeg".to_string(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let mut frame_paths: Vec<_> = std::fs::read_dir(scratch.path())?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.extension().map_or(false, |ext| ext == "png"))
            .collect();
        frame_paths.sort();

        let mut frames = Vec::with_capacity(frame_paths.len());
        for (i, path) in frame_paths.iter().enumerate() {
            let (text, confidence) = recognize(path).await?;
            frames.push(FrameText {
                time: i as f64 / fps,
                text,
                confidence,
            });
        }

        Ok(group_frames(&frames, 1.0 / fps))
    }
}

/// Run tesseract on one frame in TSV mode for word confidences. A frame
/// whose TSV carries no words reads as empty text.
async fn recognize(frame_path: &Path) -> AnalyzerResult<(String, f64)> {
    let child = tokio::process::Command::new("tesseract")
        .arg(frame_path)
        .args(["stdout", "--psm", "6", "tsv"])
        .output();

    let output = tokio::time::timeout(TESSERACT_TIMEOUT, child)
        .await
        .map_err(|_| AnalyzerError::Timeout {
            tool: "tesseract".to_string(),
            seconds: TESSERACT_TIMEOUT.as_secs(),
        })?
        .map_err(|e| AnalyzerError::from_spawn("tesseract", e, TESSERACT_HINT))?;

    if !output.status.success() {
        return Err(AnalyzerError::ToolExecutionFailed {
            tool: "tesseract".to_string(),
            message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(parse_tesseract_tsv(&String::from_utf8_lossy(&output.stdout)))
}

/// Words and mean confidence from tesseract TSV output. Rows with
/// confidence -1 are layout nodes, not words.
fn parse_tesseract_tsv(tsv: &str) -> (String, f64) {
    let mut words = Vec::new();
    let mut confidences = Vec::new();

    for line in tsv.lines().skip(1) {
        let cols: Vec<&str> = line.split('\t').collect();
        if cols.len() < 12 {
            continue;
        }
        let conf: f64 = match cols[10].parse() {
            Ok(c) => c,
            Err(_) => continue,
        };
        let text = cols[11].trim();
        if conf < 0.0 || text.is_empty() {
            continue;
        }
        words.push(text.to_string());
        confidences.push(conf / 100.0);
    }

    if words.is_empty() {
        return (String::new(), 0.0);
    }
    let mean_conf = confidences.iter().sum::<f64>() / confidences.len() as f64;
    (words.join(" "), mean_conf)
}

/// Lowercase, strip non-alphanumerics, collapse whitespace.
pub fn normalize_text(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn text_similarity(a: &str, b: &str) -> f64 {
    let (na, nb) = (normalize_text(a), normalize_text(b));
    if na.is_empty() && nb.is_empty() {
        return 1.0;
    }
    strsim::normalized_levenshtein(&na, &nb)
}

/// Group consecutive frames whose recognized text is identical after
/// normalization or fuzzy-matches at >=0.9 into one segment spanning
/// `[first_frame_time, last_frame_time + step)`.
pub fn group_frames(frames: &[FrameText], step: f64) -> Vec<OcrSegment> {
    let mut segments: Vec<OcrSegment> = Vec::new();
    let mut group: Vec<&FrameText> = Vec::new();

    let flush = |group: &[&FrameText], segments: &mut Vec<OcrSegment>| {
        if group.is_empty() {
            return;
        }
        let confidence =
            group.iter().map(|f| f.confidence).sum::<f64>() / group.len() as f64;
        segments.push(OcrSegment {
            text: group[0].text.clone(),
            start: group[0].time,
            end: group[group.len() - 1].time + step,
            confidence,
        });
    };

    for frame in frames {
        if normalize_text(&frame.text).is_empty() {
            flush(&group, &mut segments);
            group.clear();
            continue;
        }
        match group.last() {
            Some(last) if text_similarity(&last.text, &frame.text) >= GROUP_SIMILARITY => {
                group.push(frame);
            }
            Some(_) => {
                flush(&group, &mut segments);
                group.clear();
                group.push(frame);
            }
            None => group.push(frame),
        }
    }
    flush(&group, &mut segments);
    segments
}

fn overlap(a_start: f64, a_end: f64, b_start: f64, b_end: f64) -> f64 {
    (a_end.min(b_end) - a_start.max(b_start)).max(0.0)
}

/// A segment that fuzzy-matches its best-overlapping transcript segment is
/// a caption (it mirrors the speech); anything else is an overlay pinned to
/// the bottom of the frame.
pub fn classify_segments(
    segments: &[OcrSegment],
    transcript: &[TranscriptSegment],
) -> (Vec<Caption>, Vec<TextOverlay>) {
    let mut captions = Vec::new();
    let mut overlays = Vec::new();

    for seg in segments {
        let best = transcript
            .iter()
            .map(|t| (overlap(seg.start, seg.end, t.start, t.end), t))
            .filter(|(ov, _)| *ov > 0.0)
            .max_by(|a, b| a.0.partial_cmp(&b.0).unwrap());

        match best {
            Some((_, t)) if text_similarity(&seg.text, &t.text) >= CAPTION_SIMILARITY => {
                captions.push(Caption {
                    text: seg.text.clone(),
                    start: seg.start,
                    end: seg.end,
                    confidence: Some(seg.confidence),
                    speaker: t.speaker.clone(),
                });
            }
            _ => {
                overlays.push(TextOverlay {
                    text: seg.text.clone(),
                    start: seg.start,
                    end: seg.end,
                    confidence: Some(seg.confidence),
                    position: "bottom".to_string(),
                });
            }
        }
    }

    (captions, overlays)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(time: f64, text: &str) -> FrameText {
        FrameText {
            time,
            text: text.to_string(),
            confidence: 0.8,
        }
    }

    fn transcript_seg(start: f64, end: f64, text: &str) -> TranscriptSegment {
        TranscriptSegment {
            start,
            end,
            speaker: Some("speaker_0".to_string()),
            text: text.to_string(),
            confidence: Some(0.9),
        }
    }

    #[test]
    fn normalization_strips_punctuation_and_case() {
        assert_eq!(normalize_text("Hello, WORLD!"), "hello world");
        assert_eq!(normalize_text("  a   b  "), "a b");
        assert_eq!(normalize_text("***"), "");
    }

    #[test]
    fn identical_text_groups_into_one_segment() {
        let frames = vec![
            frame(0.0, "WAIT FOR IT"),
            frame(1.0, "wait for it"),
            frame(2.0, "Wait for it!"),
        ];
        let segments = group_frames(&frames, 1.0);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].start, 0.0);
        assert_eq!(segments[0].end, 3.0);
    }

    #[test]
    fn text_change_starts_new_segment() {
        let frames = vec![
            frame(0.0, "first line"),
            frame(1.0, "first line"),
            frame(2.0, "completely different words here"),
        ];
        let segments = group_frames(&frames, 1.0);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[1].start, 2.0);
    }

    #[test]
    fn empty_frames_break_groups() {
        let frames = vec![
            frame(0.0, "text"),
            frame(1.0, ""),
            frame(2.0, "text"),
        ];
        let segments = group_frames(&frames, 1.0);
        assert_eq!(segments.len(), 2);
    }

    #[test]
    fn segment_confidence_is_mean() {
        let frames = vec![
            FrameText { time: 0.0, text: "x y".into(), confidence: 0.6 },
            FrameText { time: 1.0, text: "x y".into(), confidence: 1.0 },
        ];
        let segments = group_frames(&frames, 1.0);
        assert!((segments[0].confidence - 0.8).abs() < 1e-9);
    }

    #[test]
    fn exact_transcript_match_is_caption_with_speaker() {
        let segments = vec![OcrSegment {
            text: "never gonna give you up".to_string(),
            start: 1.0,
            end: 3.0,
            confidence: 0.9,
        }];
        let transcript = vec![transcript_seg(0.5, 3.5, "never gonna give you up")];

        let (captions, overlays) = classify_segments(&segments, &transcript);
        assert_eq!(captions.len(), 1);
        assert!(overlays.is_empty());
        assert_eq!(captions[0].speaker.as_deref(), Some("speaker_0"));
    }

    #[test]
    fn zero_overlap_is_always_overlay() {
        let segments = vec![OcrSegment {
            text: "identical words".to_string(),
            start: 10.0,
            end: 12.0,
            confidence: 0.9,
        }];
        // Same text, but no temporal overlap at all.
        let transcript = vec![transcript_seg(0.0, 2.0, "identical words")];

        let (captions, overlays) = classify_segments(&segments, &transcript);
        assert!(captions.is_empty());
        assert_eq!(overlays.len(), 1);
        assert_eq!(overlays[0].position, "bottom");
    }

    #[test]
    fn dissimilar_text_with_overlap_is_overlay() {
        let segments = vec![OcrSegment {
            text: "50% OFF TODAY ONLY".to_string(),
            start: 1.0,
            end: 3.0,
            confidence: 0.9,
        }];
        let transcript = vec![transcript_seg(0.0, 4.0, "welcome back to the channel")];

        let (captions, overlays) = classify_segments(&segments, &transcript);
        assert!(captions.is_empty());
        assert_eq!(overlays.len(), 1);
    }

    #[test]
    fn max_overlap_transcript_segment_wins() {
        let segments = vec![OcrSegment {
            text: "the second sentence".to_string(),
            start: 2.0,
            end: 5.0,
            confidence: 0.9,
        }];
        let transcript = vec![
            transcript_seg(0.0, 2.5, "something else entirely"),
            transcript_seg(2.5, 5.0, "the second sentence"),
        ];

        let (captions, overlays) = classify_segments(&segments, &transcript);
        assert_eq!(captions.len(), 1);
        assert!(overlays.is_empty());
    }

    #[test]
    fn parses_tesseract_tsv_words_and_confidence() {
        let tsv = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext\n\
            1\t1\t0\t0\t0\t0\t0\t0\t100\t40\t-1\t\n\
            5\t1\t1\t1\t1\t1\t5\t5\t30\t20\t90\tHello\n\
            5\t1\t1\t1\t1\t2\t40\t5\t30\t20\t70\tworld\n";
        let (text, conf) = parse_tesseract_tsv(tsv);
        assert_eq!(text, "Hello world");
        assert!((conf - 0.8).abs() < 1e-9);
    }

    #[test]
    fn empty_tsv_is_empty_text() {
        let (text, conf) = parse_tesseract_tsv("header only\n");
        assert!(text.is_empty());
        assert_eq!(conf, 0.0);
    }
}
