use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::llm::{LlmConfig, LlmProvider};

/// Configuration for the video analyzer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Shot boundary detection settings
    pub timeline: TimelineConfig,

    /// Speech-to-text settings
    pub transcription: TranscriptionConfig,

    /// On-screen text recognition settings
    pub ocr: OcrConfig,

    /// Camera motion and jump cut settings
    pub editing: EditingConfig,

    /// Beat and onset detection settings
    pub audio: AudioConfig,

    /// Narrative arc inference settings
    pub narrative: NarrativeConfig,

    /// LLM settings for narrative inference
    pub llm: LlmConfig,

    /// Per-module result caching settings
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineConfig {
    /// Detector strategy: "auto", "scenedetect" or "ffmpeg"
    pub detector: String,

    /// PySceneDetect content threshold
    pub scenedetect_threshold: f64,

    /// ffmpeg scene filter score threshold
    pub ffmpeg_scene_threshold: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionConfig {
    /// Disable to skip ASR entirely
    pub enabled: bool,

    /// Whisper model name
    pub model: String,

    /// Worker threads for whisper.cpp
    pub threads: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrConfig {
    /// Disable to skip on-screen text recognition
    pub enabled: bool,

    /// First-pass sampling rate (frames per second)
    pub fps_first: f64,

    /// Refine-pass sampling rate
    pub fps_refine: f64,

    /// Fraction of frame height sampled from the bottom
    pub crop_bottom_fraction: f64,

    /// Run the denser refine pass after the first pass
    pub two_pass: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditingConfig {
    /// Disable to skip camera motion and jump cut analysis
    pub enabled: bool,

    /// Square sample size for extracted frames
    pub frame_size: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Disable to skip beat and onset analysis
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NarrativeConfig {
    /// Inference mode: "heuristic" or "llm"
    pub mode: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Disable to always recompute every module
    pub enabled: bool,

    /// Cache root directory
    pub dir: PathBuf,
}

impl Config {
    /// Load configuration from file
    pub fn load() -> Result<Self> {
        let config_paths = [
            "videospec-analyzer.toml",
            "config/videospec-analyzer.toml",
            "~/.config/videospec-analyzer/config.toml",
            "/etc/videospec-analyzer/config.toml",
        ];

        for path in &config_paths {
            if let Ok(config_str) = std::fs::read_to_string(path) {
                match toml::from_str(&config_str) {
                    Ok(config) => {
                        tracing::info!("📄 Loaded configuration from: {}", path);
                        return Ok(config);
                    }
                    Err(e) => {
                        tracing::warn!("Failed to parse config file {}: {}", path, e);
                    }
                }
            }
        }

        Self::from_env()
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(detector) = std::env::var("VIDEOSPEC_DETECTOR") {
            config.timeline.detector = detector;
        }

        if let Ok(model) = std::env::var("VIDEOSPEC_WHISPER_MODEL") {
            config.transcription.model = model;
        }

        if let Ok(cache_dir) = std::env::var("VIDEOSPEC_CACHE_DIR") {
            config.cache.dir = PathBuf::from(cache_dir);
        }

        if let Ok(mode) = std::env::var("VIDEOSPEC_NARRATIVE_MODE") {
            config.narrative.mode = mode;
        }

        if let Ok(api_key) = std::env::var("VIDEOSPEC_LLM_API_KEY") {
            config.llm.api_key = Some(api_key);
        }

        if let Ok(endpoint) = std::env::var("VIDEOSPEC_LLM_ENDPOINT") {
            config.llm.endpoint = Some(endpoint);
        }

        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &str) -> Result<()> {
        let config_str = toml::to_string_pretty(self)?;
        std::fs::write(path, config_str)?;
        tracing::info!("💾 Configuration saved to: {}", path);
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        match self.timeline.detector.as_str() {
            "auto" | "scenedetect" | "ffmpeg" => {}
            other => return Err(anyhow!("unknown timeline detector '{}'", other)),
        }

        if self.timeline.scenedetect_threshold <= 0.0 {
            return Err(anyhow!("scenedetect_threshold must be greater than 0"));
        }

        if !(0.0..=1.0).contains(&self.timeline.ffmpeg_scene_threshold) {
            return Err(anyhow!("ffmpeg_scene_threshold must be within [0, 1]"));
        }

        if self.ocr.fps_first <= 0.0 || self.ocr.fps_refine <= 0.0 {
            return Err(anyhow!("ocr sampling rates must be greater than 0"));
        }

        if !(0.0..=1.0).contains(&self.ocr.crop_bottom_fraction) {
            return Err(anyhow!("crop_bottom_fraction must be within [0, 1]"));
        }

        if self.editing.frame_size < 8 {
            return Err(anyhow!("editing frame_size must be at least 8"));
        }

        if self.transcription.threads == 0 {
            return Err(anyhow!("transcription threads must be greater than 0"));
        }

        match self.narrative.mode.as_str() {
            "heuristic" | "llm" => {}
            other => return Err(anyhow!("unknown narrative mode '{}'", other)),
        }

        if self.narrative.mode == "llm"
            && self.llm.provider == LlmProvider::OpenAi
            && self.llm.api_key.is_none()
        {
            return Err(anyhow!("API key required for the OpenAI narrative provider"));
        }

        tracing::info!("✅ Configuration validation passed");
        Ok(())
    }

    /// Get runtime configuration summary
    pub fn summary(&self) -> String {
        format!(
            "Video Analyzer Configuration:\n\
            - Timeline Detector: {}\n\
            - Transcription: {} (model {})\n\
            - OCR: {} ({} pass)\n\
            - Editing: {}\n\
            - Audio Structure: {}\n\
            - Narrative Mode: {}\n\
            - Cache: {} ({})",
            self.timeline.detector,
            on_off(self.transcription.enabled),
            self.transcription.model,
            on_off(self.ocr.enabled),
            if self.ocr.two_pass { "two" } else { "one" },
            on_off(self.editing.enabled),
            on_off(self.audio.enabled),
            self.narrative.mode,
            on_off(self.cache.enabled),
            self.cache.dir.display(),
        )
    }
}

fn on_off(enabled: bool) -> &'static str {
    if enabled {
        "enabled"
    } else {
        "disabled"
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timeline: TimelineConfig {
                detector: "auto".to_string(),
                scenedetect_threshold: 30.0,
                ffmpeg_scene_threshold: 0.35,
            },
            transcription: TranscriptionConfig {
                enabled: true,
                model: "base".to_string(),
                threads: num_cpus::get().min(8),
            },
            ocr: OcrConfig {
                enabled: true,
                fps_first: 1.0,
                fps_refine: 2.0,
                crop_bottom_fraction: 0.4,
                two_pass: true,
            },
            editing: EditingConfig {
                enabled: true,
                frame_size: 64,
            },
            audio: AudioConfig { enabled: true },
            narrative: NarrativeConfig {
                mode: "heuristic".to_string(),
            },
            llm: LlmConfig::default(),
            cache: CacheConfig {
                enabled: true,
                dir: PathBuf::from("./cache"),
            },
        }
    }
}

/// Configuration builder for programmatic config creation
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn with_detector(mut self, detector: impl Into<String>) -> Self {
        self.config.timeline.detector = detector.into();
        self
    }

    pub fn with_whisper_model(mut self, model: impl Into<String>) -> Self {
        self.config.transcription.model = model.into();
        self
    }

    pub fn with_cache_dir(mut self, dir: PathBuf) -> Self {
        self.config.cache.dir = dir;
        self
    }

    pub fn with_narrative_mode(mut self, mode: impl Into<String>) -> Self {
        self.config.narrative.mode = mode.into();
        self
    }

    pub fn enable_transcription(mut self, enable: bool) -> Self {
        self.config.transcription.enabled = enable;
        self
    }

    pub fn enable_ocr(mut self, enable: bool) -> Self {
        self.config.ocr.enabled = enable;
        self
    }

    pub fn enable_caching(mut self, enable: bool) -> Self {
        self.config.cache.enabled = enable;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.timeline.detector, "auto");
        assert_eq!(config.timeline.scenedetect_threshold, 30.0);
        assert!(config.cache.enabled);
    }

    #[test]
    fn test_config_builder() {
        let config = ConfigBuilder::new()
            .with_detector("ffmpeg")
            .with_narrative_mode("llm")
            .enable_ocr(false)
            .build();

        assert_eq!(config.timeline.detector, "ffmpeg");
        assert_eq!(config.narrative.mode, "llm");
        assert!(!config.ocr.enabled);
    }

    #[test]
    fn test_config_validation() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_bad_detector() {
        let config = ConfigBuilder::new().with_detector("magic").build();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_openai_without_key() {
        let mut config = ConfigBuilder::new().with_narrative_mode("llm").build();
        config.llm.provider = LlmProvider::OpenAi;
        config.llm.api_key = None;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_round_trip() {
        let config = Config::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.timeline.detector, config.timeline.detector);
        assert_eq!(parsed.ocr.fps_refine, config.ocr.fps_refine);
    }
}
