use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::AnalyzerResult;

/// Content-addressed per-video artifact cache.
///
/// The key is `hex(sha256(file_bytes))[..16] + "-" + file_size`, so a
/// re-encoded or edited video never reuses stale artifacts. Artifacts are
/// one JSON file per `(key, module[, parameter])` and are never invalidated
/// automatically; cache busting is the caller's job (clear the directory).
#[derive(Debug, Clone)]
pub struct AnalysisCache {
    root: PathBuf,
    enabled: bool,
}

impl AnalysisCache {
    pub fn new(root: PathBuf, enabled: bool) -> Self {
        Self { root, enabled }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Compute the content key for a video file. Reads the whole file;
    /// short-form inputs are small enough that streaming is not worth it.
    pub async fn video_key(video_path: &Path) -> AnalyzerResult<String> {
        let bytes = tokio::fs::read(video_path).await?;
        let digest = Sha256::digest(&bytes);
        let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
        Ok(format!("{}-{}", &hex[..16], bytes.len()))
    }

    /// Resolve (and create) the cache directory for a video.
    pub async fn dir_for(&self, video_path: &Path) -> AnalyzerResult<PathBuf> {
        let key = Self::video_key(video_path).await?;
        let dir = self.root.join(key);
        tokio::fs::create_dir_all(&dir).await?;
        Ok(dir)
    }

    /// Read a cached artifact. Missing file or a parse error both mean
    /// "no cache" - never an error - so a corrupt artifact is recomputed
    /// and overwritten rather than wedging the pipeline.
    pub async fn read_if_exists<T: DeserializeOwned>(&self, path: &Path) -> Option<T> {
        if !self.enabled {
            return None;
        }
        match tokio::fs::read_to_string(path).await {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(value) => {
                    debug!("📚 Cache hit: {}", path.display());
                    Some(value)
                }
                Err(e) => {
                    warn!("Ignoring unparseable cache file {}: {}", path.display(), e);
                    None
                }
            },
            Err(_) => None,
        }
    }

    /// Atomically write an artifact: serialize to a sibling temp file, then
    /// rename over the target. Concurrent runs against the same cache never
    /// observe a half-written file; same-artifact writers race with
    /// last-writer-wins, which is fine because artifacts are pure functions
    /// of the immutable input video.
    pub async fn write_atomic<T: Serialize>(&self, path: &Path, value: &T) -> AnalyzerResult<()> {
        if !self.enabled {
            return Ok(());
        }
        let json = serde_json::to_string_pretty(value)?;
        let parent = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        tokio::fs::create_dir_all(&parent).await?;

        let target = path.to_path_buf();
        // NamedTempFile is blocking API; the write is small.
        tokio::task::spawn_blocking(move || -> AnalyzerResult<()> {
            let mut tmp = tempfile::NamedTempFile::new_in(&parent)?;
            std::io::Write::write_all(&mut tmp, json.as_bytes())?;
            match tmp.persist(&target) {
                Ok(_) => Ok(()),
                Err(e) => {
                    // Windows rejects rename-over-existing; retry after
                    // removing the target.
                    let tmp = e.file;
                    let _ = std::fs::remove_file(&target);
                    tmp.persist(&target)
                        .map_err(|e| crate::error::AnalyzerError::Io(e.error))?;
                    Ok(())
                }
            }
        })
        .await
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))??;

        debug!("💾 Cached artifact: {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Artifact {
        value: u32,
        label: String,
    }

    #[tokio::test]
    async fn video_key_combines_digest_prefix_and_size() {
        let dir = TempDir::new().unwrap();
        let video = dir.path().join("clip.mp4");
        tokio::fs::write(&video, b"not really a video").await.unwrap();

        let key = AnalysisCache::video_key(&video).await.unwrap();
        let (digest, size) = key.split_once('-').unwrap();
        assert_eq!(digest.len(), 16);
        assert_eq!(size, "18");
    }

    #[tokio::test]
    async fn same_bytes_same_key_different_bytes_different_key() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.mp4");
        let b = dir.path().join("b.mp4");
        let c = dir.path().join("c.mp4");
        tokio::fs::write(&a, b"content").await.unwrap();
        tokio::fs::write(&b, b"content").await.unwrap();
        tokio::fs::write(&c, b"other  c").await.unwrap();

        let ka = AnalysisCache::video_key(&a).await.unwrap();
        let kb = AnalysisCache::video_key(&b).await.unwrap();
        let kc = AnalysisCache::video_key(&c).await.unwrap();
        assert_eq!(ka, kb);
        assert_ne!(ka, kc);
    }

    #[tokio::test]
    async fn round_trips_artifacts() {
        let dir = TempDir::new().unwrap();
        let cache = AnalysisCache::new(dir.path().to_path_buf(), true);
        let path = dir.path().join("timeline.json");

        let artifact = Artifact {
            value: 42,
            label: "shots".to_string(),
        };
        cache.write_atomic(&path, &artifact).await.unwrap();

        let back: Artifact = cache.read_if_exists(&path).await.unwrap();
        assert_eq!(back, artifact);
    }

    #[tokio::test]
    async fn missing_file_reads_as_none() {
        let dir = TempDir::new().unwrap();
        let cache = AnalysisCache::new(dir.path().to_path_buf(), true);
        let missing: Option<Artifact> = cache
            .read_if_exists(&dir.path().join("nope.json"))
            .await;
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn corrupt_file_reads_as_none() {
        let dir = TempDir::new().unwrap();
        let cache = AnalysisCache::new(dir.path().to_path_buf(), true);
        let path = dir.path().join("bad.json");
        tokio::fs::write(&path, b"{truncated").await.unwrap();

        let bad: Option<Artifact> = cache.read_if_exists(&path).await;
        assert!(bad.is_none());
    }

    #[tokio::test]
    async fn overwrite_replaces_previous_artifact() {
        let dir = TempDir::new().unwrap();
        let cache = AnalysisCache::new(dir.path().to_path_buf(), true);
        let path = dir.path().join("x.json");

        cache
            .write_atomic(&path, &Artifact { value: 1, label: "a".into() })
            .await
            .unwrap();
        cache
            .write_atomic(&path, &Artifact { value: 2, label: "b".into() })
            .await
            .unwrap();

        let back: Artifact = cache.read_if_exists(&path).await.unwrap();
        assert_eq!(back.value, 2);
    }

    #[tokio::test]
    async fn disabled_cache_never_reads_or_writes() {
        let dir = TempDir::new().unwrap();
        let cache = AnalysisCache::new(dir.path().to_path_buf(), false);
        let path = dir.path().join("x.json");

        cache
            .write_atomic(&path, &Artifact { value: 1, label: "a".into() })
            .await
            .unwrap();
        assert!(!path.exists());

        tokio::fs::write(&path, serde_json::to_string(&Artifact { value: 3, label: "c".into() }).unwrap())
            .await
            .unwrap();
        let ignored: Option<Artifact> = cache.read_if_exists(&path).await;
        assert!(ignored.is_none());
    }
}
