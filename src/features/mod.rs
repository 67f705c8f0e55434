//! Pure signal/heuristic functions over frames and PCM: perceptual
//! hashing, translation-search motion classification, and onset/beat
//! detection. No I/O and no external tools; everything here is
//! deterministic and unit-tested against synthetic inputs.

pub mod hash;
pub mod motion;
pub mod onset;

pub use hash::{average_hash, hamming_distance};
pub use motion::{classify_motion, MotionEstimate};
pub use onset::{analyze_pcm, OnsetAnalysis};
