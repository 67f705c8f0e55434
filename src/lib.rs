/// Short-form video structure analyzer
///
/// Decomposes a single video into shots, transcript, on-screen text,
/// camera motion, audio structure and a narrative arc, producing one
/// validated JSON document with per-module provenance. External tools
/// (ffmpeg, PySceneDetect, whisper, tesseract) do the heavy lifting;
/// each module degrades independently when its tool is missing.

pub mod analyzer;
pub mod audio_structure;
pub mod cache;
pub mod config;
pub mod editing;
pub mod error;
pub mod extract;
pub mod features;
pub mod llm;
pub mod model;
pub mod narrative;
pub mod ocr;
pub mod probe;
pub mod timeline;
pub mod transcript;

// Re-export main types for easy access
pub use crate::analyzer::Analyzer;
pub use crate::cache::AnalysisCache;
pub use crate::config::{Config, ConfigBuilder};
pub use crate::error::{AnalyzerError, AnalyzerResult};
pub use crate::llm::{LlmConfig, LlmProvider};
pub use crate::model::{VideoAnalysis, ANALYSIS_VERSION};
pub use crate::narrative::NarrativeMode;
pub use crate::probe::{MediaInfo, MediaProbe};
pub use crate::timeline::DetectorStrategy;
