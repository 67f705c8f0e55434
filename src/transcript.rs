use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{AnalyzerError, AnalyzerResult};
use crate::extract::MediaExtractor;
use crate::model::TranscriptSegment;

const ASR_TIMEOUT: Duration = Duration::from_secs(60);
const ASR_SAMPLE_RATE: u32 = 16_000;
/// Words are grouped into segments no longer than this window.
const SEGMENT_WINDOW_SECONDS: f64 = 4.0;

/// One word with timing from the ASR engine. The module never assumes a
/// specific engine, only this shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WordTiming {
    pub word: String,
    pub start: f64,
    pub end: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptOutcome {
    pub segments: Vec<TranscriptSegment>,
    pub engine: String,
    pub notes: Vec<String>,
}

/// Audio extraction plus external ASR, grouped into transcript segments.
#[derive(Debug, Clone)]
pub struct TranscriptModule {
    pub model: String,
    /// Worker threads handed to whisper.cpp.
    pub threads: usize,
}

impl Default for TranscriptModule {
    fn default() -> Self {
        Self {
            model: "base".to_string(),
            threads: num_cpus::get().min(8),
        }
    }
}

impl TranscriptModule {
    pub async fn analyze(
        &self,
        video_path: &Path,
        has_audio: bool,
    ) -> AnalyzerResult<TranscriptOutcome> {
        if !has_audio {
            return Ok(TranscriptOutcome {
                segments: Vec::new(),
                engine: "no-audio".to_string(),
                notes: vec!["transcript: video has no audio stream".to_string()],
            });
        }

        let scratch = tempfile::tempdir()?;
        let wav_path = scratch.path().join("audio.wav");
        MediaExtractor::new()
            .extract_wav(video_path, &wav_path, ASR_SAMPLE_RATE)
            .await?;

        let (words, engine) = self.transcribe(&wav_path, scratch.path()).await?;
        let segments = group_words(&words);

        info!(
            "🎤 Transcript via {}: {} words, {} segments",
            engine,
            words.len(),
            segments.len()
        );

        Ok(TranscriptOutcome {
            segments,
            engine,
            notes: Vec::new(),
        })
    }

    /// Try whisper backends in preference order, like any other external
    /// tool: whisper.cpp variants first (fastest), Python whisper last.
    async fn transcribe(
        &self,
        wav_path: &Path,
        scratch: &Path,
    ) -> AnalyzerResult<(Vec<WordTiming>, String)> {
        for backend in ["whisper-cli", "whisper-cpp"] {
            if command_available(backend).await {
                debug!("Using {} ASR backend", backend);
                let words = self.run_whisper_cpp(backend, wav_path, scratch).await?;
                return Ok((words, backend.to_string()));
            }
        }
        if command_available("whisper").await {
            debug!("Using Python whisper ASR backend");
            let words = self.run_python_whisper(wav_path, scratch).await?;
            return Ok((words, "openai-whisper".to_string()));
        }

        Err(AnalyzerError::DependencyMissing {
            tool: "whisper".to_string(),
            hint: "install whisper.cpp or `pip install openai-whisper`".to_string(),
        })
    }

    /// whisper.cpp with max-len 1 so each JSON transcription entry is a
    /// single word-level token.
    async fn run_whisper_cpp(
        &self,
        cmd: &str,
        wav_path: &Path,
        scratch: &Path,
    ) -> AnalyzerResult<Vec<WordTiming>> {
        let out_base = scratch.join("asr");

        let child = tokio::process::Command::new(cmd)
            .arg("-f")
            .arg(wav_path)
            .arg("-oj")
            .arg("-of")
            .arg(&out_base)
            .args(["-ml", "1", "-t"])
            .arg(self.threads.to_string())
            .output();

        let output = tokio::time::timeout(ASR_TIMEOUT, child)
            .await
            .map_err(|_| AnalyzerError::Timeout {
                tool: cmd.to_string(),
                seconds: ASR_TIMEOUT.as_secs(),
            })?
            .map_err(|e| AnalyzerError::from_spawn(cmd, e, "install whisper.cpp"))?;

        if !output.status.success() {
            return Err(AnalyzerError::ToolExecutionFailed {
                tool: cmd.to_string(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let json_path = out_base.with_extension("json");
        let content = tokio::fs::read_to_string(&json_path).await?;
        parse_whisper_cpp_json(&content)
    }

    async fn run_python_whisper(
        &self,
        wav_path: &Path,
        scratch: &Path,
    ) -> AnalyzerResult<Vec<WordTiming>> {
        let child = tokio::process::Command::new("whisper")
            .arg(wav_path)
            .args([
                "--model",
                &self.model,
                "--output_format",
                "json",
                "--word_timestamps",
                "True",
                "--output_dir",
            ])
            .arg(scratch)
            .output();

        let output = tokio::time::timeout(ASR_TIMEOUT, child)
            .await
            .map_err(|_| AnalyzerError::Timeout {
                tool: "whisper".to_string(),
                seconds: ASR_TIMEOUT.as_secs(),
            })?
            .map_err(|e| {
                AnalyzerError::from_spawn("whisper", e, "pip install openai-whisper")
            })?;

        if !output.status.success() {
            return Err(AnalyzerError::ToolExecutionFailed {
                tool: "whisper".to_string(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let stem = wav_path
            .file_stem()
            .ok_or_else(|| AnalyzerError::InvalidInput("wav path has no stem".to_string()))?;
        let json_path = scratch.join(stem).with_extension("json");
        let content = tokio::fs::read_to_string(&json_path).await?;
        parse_python_whisper_json(&content)
    }
}

async fn command_available(cmd: &str) -> bool {
    tokio::process::Command::new(cmd)
        .arg("--help")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .await
        .map(|s| s.success())
        .unwrap_or(false)
}

/// whisper.cpp JSON: `{"transcription":[{"offsets":{"from":ms,"to":ms},"text":"..."}]}`.
fn parse_whisper_cpp_json(content: &str) -> AnalyzerResult<Vec<WordTiming>> {
    let data: serde_json::Value = serde_json::from_str(content)?;
    let entries = data["transcription"]
        .as_array()
        .ok_or_else(|| AnalyzerError::ToolExecutionFailed {
            tool: "whisper-cpp".to_string(),
            message: "JSON output missing 'transcription' array".to_string(),
        })?;

    let mut words = Vec::new();
    for entry in entries {
        let text = entry["text"].as_str().unwrap_or("").trim();
        if text.is_empty() {
            continue;
        }
        let from_ms = entry["offsets"]["from"].as_f64().unwrap_or(0.0);
        let to_ms = entry["offsets"]["to"].as_f64().unwrap_or(from_ms);
        words.push(WordTiming {
            word: text.to_string(),
            start: from_ms / 1000.0,
            end: to_ms / 1000.0,
            confidence: None,
        });
    }
    Ok(words)
}

/// Python whisper JSON with `--word_timestamps`: segments carry a `words`
/// array of `{word, start, end, probability}`.
fn parse_python_whisper_json(content: &str) -> AnalyzerResult<Vec<WordTiming>> {
    let data: serde_json::Value = serde_json::from_str(content)?;
    let segments = data["segments"]
        .as_array()
        .ok_or_else(|| AnalyzerError::ToolExecutionFailed {
            tool: "whisper".to_string(),
            message: "JSON output missing 'segments' array".to_string(),
        })?;

    let mut words = Vec::new();
    for segment in segments {
        if let Some(segment_words) = segment["words"].as_array() {
            for w in segment_words {
                let text = w["word"].as_str().unwrap_or("").trim();
                if text.is_empty() {
                    continue;
                }
                words.push(WordTiming {
                    word: text.to_string(),
                    start: w["start"].as_f64().unwrap_or(0.0),
                    end: w["end"].as_f64().unwrap_or(0.0),
                    confidence: w["probability"].as_f64(),
                });
            }
        } else {
            // No word timings: treat the whole segment as one token.
            let text = segment["text"].as_str().unwrap_or("").trim();
            if !text.is_empty() {
                words.push(WordTiming {
                    word: text.to_string(),
                    start: segment["start"].as_f64().unwrap_or(0.0),
                    end: segment["end"].as_f64().unwrap_or(0.0),
                    confidence: None,
                });
            }
        }
    }
    Ok(words)
}

/// Group word-level timings into segments by a <=4 second window or a
/// sentence-terminal word, whichever comes first.
pub fn group_words(words: &[WordTiming]) -> Vec<TranscriptSegment> {
    let mut segments = Vec::new();
    let mut current: Vec<&WordTiming> = Vec::new();

    for word in words {
        if let Some(first) = current.first() {
            if word.end - first.start > SEGMENT_WINDOW_SECONDS {
                segments.push(flush_segment(&current));
                current.clear();
            }
        }
        current.push(word);
        if word.word.ends_with(['.', '!', '?']) {
            segments.push(flush_segment(&current));
            current.clear();
        }
    }
    if !current.is_empty() {
        segments.push(flush_segment(&current));
    }
    segments
}

fn flush_segment(words: &[&WordTiming]) -> TranscriptSegment {
    let text = words
        .iter()
        .map(|w| w.word.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    let confidences: Vec<f64> = words.iter().filter_map(|w| w.confidence).collect();
    let confidence = if confidences.is_empty() {
        None
    } else {
        Some(confidences.iter().sum::<f64>() / confidences.len() as f64)
    };
    TranscriptSegment {
        start: words.first().map(|w| w.start).unwrap_or(0.0),
        end: words.last().map(|w| w.end).unwrap_or(0.0),
        speaker: Some("speaker_0".to_string()),
        text,
        confidence,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(text: &str, start: f64, end: f64) -> WordTiming {
        WordTiming {
            word: text.to_string(),
            start,
            end,
            confidence: Some(0.9),
        }
    }

    #[test]
    fn sentence_terminal_word_flushes_segment() {
        let words = vec![
            word("hello", 0.0, 0.4),
            word("world.", 0.5, 0.9),
            word("next", 1.0, 1.4),
        ];
        let segments = group_words(&words);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].text, "hello world.");
        assert_eq!(segments[1].text, "next");
    }

    #[test]
    fn window_limit_flushes_segment() {
        let words: Vec<WordTiming> = (0..12)
            .map(|i| word("w", i as f64 * 0.5, i as f64 * 0.5 + 0.4))
            .collect();
        let segments = group_words(&words);
        assert!(segments.len() >= 2);
        for seg in &segments {
            assert!(seg.end - seg.start <= SEGMENT_WINDOW_SECONDS + 0.5);
            assert!(seg.end >= seg.start);
        }
    }

    #[test]
    fn empty_word_list_yields_no_segments() {
        assert!(group_words(&[]).is_empty());
    }

    #[test]
    fn segment_confidence_is_mean_of_words() {
        let words = vec![
            WordTiming {
                word: "a".into(),
                start: 0.0,
                end: 0.2,
                confidence: Some(0.8),
            },
            WordTiming {
                word: "b.".into(),
                start: 0.3,
                end: 0.5,
                confidence: Some(0.6),
            },
        ];
        let segments = group_words(&words);
        assert_eq!(segments.len(), 1);
        assert!((segments[0].confidence.unwrap() - 0.7).abs() < 1e-9);
    }

    #[test]
    fn parses_whisper_cpp_shape() {
        let json = r#"{
            "transcription": [
                {"offsets": {"from": 0, "to": 400}, "text": " hello"},
                {"offsets": {"from": 450, "to": 900}, "text": " world."},
                {"offsets": {"from": 950, "to": 1000}, "text": "  "}
            ]
        }"#;
        let words = parse_whisper_cpp_json(json).unwrap();
        assert_eq!(words.len(), 2);
        assert_eq!(words[0].word, "hello");
        assert!((words[1].start - 0.45).abs() < 1e-9);
    }

    #[test]
    fn parses_python_whisper_shape() {
        let json = r#"{
            "segments": [{
                "start": 0.0, "end": 1.2, "text": "hi there",
                "words": [
                    {"word": " hi", "start": 0.0, "end": 0.5, "probability": 0.95},
                    {"word": " there", "start": 0.6, "end": 1.2, "probability": 0.85}
                ]
            }]
        }"#;
        let words = parse_python_whisper_json(json).unwrap();
        assert_eq!(words.len(), 2);
        assert_eq!(words[1].word, "there");
        assert_eq!(words[1].confidence, Some(0.85));
    }

    #[test]
    fn python_whisper_without_word_timings_falls_back_to_segments() {
        let json = r#"{"segments": [{"start": 0.0, "end": 2.0, "text": " full segment"}]}"#;
        let words = parse_python_whisper_json(json).unwrap();
        assert_eq!(words.len(), 1);
        assert_eq!(words[0].word, "full segment");
        assert_eq!(words[0].end, 2.0);
    }

    #[test]
    fn garbage_asr_output_is_a_tool_failure() {
        assert!(parse_whisper_cpp_json("{}").is_err());
        assert!(parse_python_whisper_json("{\"nope\": 1}").is_err());
    }
}
