use std::path::PathBuf;
use thiserror::Error;

/// Failure taxonomy for the analysis pipeline.
///
/// Module-internal failures are caught at the module boundary and converted
/// into a provenance note plus an empty result; only `SchemaValidation` and
/// fatal input problems reach the caller.
#[derive(Debug, Error)]
pub enum AnalyzerError {
    /// A required external binary is not installed.
    #[error("required tool '{tool}' not found: {hint}")]
    DependencyMissing { tool: String, hint: String },

    /// An external tool ran but failed (non-zero exit or garbage output).
    #[error("{tool} failed: {message}")]
    ToolExecutionFailed { tool: String, message: String },

    /// An external tool exceeded its deadline and was killed.
    #[error("{tool} timed out after {seconds}s")]
    Timeout { tool: String, seconds: u64 },

    /// Malformed frame/PCM data passed between internal functions.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The final merged document failed its invariant checks. Fatal.
    #[error("analysis document failed schema validation: {0}")]
    SchemaValidation(String),

    /// Input video cannot be read at all. Fatal.
    #[error("cannot read input video {path}: {message}")]
    UnreadableInput { path: PathBuf, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl AnalyzerError {
    /// Build a `DependencyMissing` from a spawn error, falling back to
    /// `ToolExecutionFailed` when the error is not "binary absent".
    pub fn from_spawn(tool: &str, err: std::io::Error, hint: &str) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            Self::DependencyMissing {
                tool: tool.to_string(),
                hint: hint.to_string(),
            }
        } else {
            Self::ToolExecutionFailed {
                tool: tool.to_string(),
                message: err.to_string(),
            }
        }
    }

    /// Short provenance note for a degraded module.
    pub fn degrade_note(&self, module: &str) -> String {
        match self {
            Self::DependencyMissing { tool, hint } => {
                format!("{}: {} not installed ({})", module, tool, hint)
            }
            Self::Timeout { tool, seconds } => {
                format!("{}: {} timed out after {}s", module, tool, seconds)
            }
            other => format!("{}: {}", module, other),
        }
    }
}

pub type AnalyzerResult<T> = Result<T, AnalyzerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawn_not_found_maps_to_dependency_missing() {
        let err = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let e = AnalyzerError::from_spawn("ffprobe", err, "install ffmpeg");
        assert!(matches!(e, AnalyzerError::DependencyMissing { .. }));
    }

    #[test]
    fn spawn_other_maps_to_tool_failure() {
        let err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let e = AnalyzerError::from_spawn("ffmpeg", err, "install ffmpeg");
        assert!(matches!(e, AnalyzerError::ToolExecutionFailed { .. }));
    }

    #[test]
    fn degrade_note_mentions_module_and_tool() {
        let e = AnalyzerError::DependencyMissing {
            tool: "tesseract".to_string(),
            hint: "install tesseract-ocr".to_string(),
        };
        let note = e.degrade_note("ocr");
        assert!(note.contains("ocr"));
        assert!(note.contains("tesseract"));
    }
}
