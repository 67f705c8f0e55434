use anyhow::{Context, Result};
use std::path::Path;
use std::str::FromStr;
use std::time::Instant;
use tracing::{info, warn};

use crate::audio_structure::{AudioOutcome, AudioStructureModule};
use crate::cache::AnalysisCache;
use crate::config::Config;
use crate::editing::{EditingModule, EditingOutcome};
use crate::error::AnalyzerError;
use crate::model::{
    AudioStructure, Editing, Entities, Meta, Narrative, Pacing, PacingClass, Provenance, Shot,
    Timeline, VideoAnalysis, ANALYSIS_VERSION,
};
use crate::narrative::{NarrativeMode, NarrativeModule};
use crate::ocr::{OcrModule, OcrOutcome};
use crate::probe::{MediaInfo, MediaProbe};
use crate::timeline::{DetectorStrategy, TimelineModule, TimelineOutcome};
use crate::transcript::{TranscriptModule, TranscriptOutcome};

const TIMELINE_ARTIFACT: &str = "timeline.json";
const TRANSCRIPT_ARTIFACT: &str = "transcript.json";
const OCR_ARTIFACT: &str = "ocr.json";
const EDITING_ARTIFACT: &str = "editing.json";
const AUDIO_ARTIFACT: &str = "audio.json";
const ANALYSIS_ARTIFACT: &str = "analysis.json";

/// One module's resolved contribution: its value, the provenance label
/// recorded for it, and any degradation notes it produced.
struct ModuleResult<T> {
    value: T,
    provenance: String,
    notes: Vec<String>,
}

impl<T> ModuleResult<T> {
    fn cached(value: T, notes: Vec<String>) -> Self {
        Self {
            value,
            provenance: "cache".to_string(),
            notes,
        }
    }

    fn disabled(value: T) -> Self {
        Self {
            value,
            provenance: "disabled".to_string(),
            notes: Vec::new(),
        }
    }

    fn unavailable(value: T, note: String) -> Self {
        Self {
            value,
            provenance: "unavailable".to_string(),
            notes: vec![note],
        }
    }
}

/// Runs every analysis module against one video, resolving each from the
/// content-addressed cache where possible, and assembles the validated
/// output document. Modules degrade independently: a failed module records
/// an `unavailable` provenance entry and a note instead of aborting the
/// run.
pub struct Analyzer {
    config: Config,
    cache: AnalysisCache,
    probe: MediaProbe,
}

impl Analyzer {
    pub fn new(config: Config) -> Self {
        let cache = AnalysisCache::new(config.cache.dir.clone(), config.cache.enabled);
        Self {
            config,
            cache,
            probe: MediaProbe::new(),
        }
    }

    /// Full analysis of one video. Probe failures are fatal; everything
    /// downstream degrades per module.
    pub async fn analyze(&self, video_path: &Path) -> Result<VideoAnalysis> {
        let started = Instant::now();
        info!("🚀 Analyzing {}", video_path.display());

        tokio::fs::metadata(video_path)
            .await
            .map_err(|e| AnalyzerError::UnreadableInput {
                path: video_path.to_path_buf(),
                message: e.to_string(),
            })?;

        let media = self
            .probe
            .probe(video_path)
            .await
            .with_context(|| format!("probing {}", video_path.display()))?;
        info!(
            "🎬 {}x{} @ {:.2} fps, {:.2}s, audio={}",
            media.width, media.height, media.fps, media.duration_seconds, media.has_audio_stream
        );

        let cache_dir = if self.cache.enabled() {
            Some(self.cache.dir_for(video_path).await?)
        } else {
            None
        };

        let analysis_artifact = cache_dir.as_ref().map(|d| d.join(ANALYSIS_ARTIFACT));
        let prior: Option<VideoAnalysis> =
            self.read_artifact(analysis_artifact.as_deref()).await;

        let mut provenance = Provenance::default();

        let (timeline, transcript) = tokio::join!(
            self.run_timeline(video_path, media.duration_seconds, cache_dir.as_deref()),
            self.run_transcript(video_path, media.has_audio_stream, cache_dir.as_deref()),
        );

        let (ocr, editing, audio) = tokio::join!(
            self.run_ocr(video_path, &transcript.value.segments, cache_dir.as_deref()),
            self.run_editing(video_path, &timeline.value.timeline.shots, cache_dir.as_deref()),
            self.run_audio(
                video_path,
                media.duration_seconds,
                &transcript.value.segments,
                cache_dir.as_deref(),
            ),
        );

        let narrative = self
            .run_narrative(&media, &timeline.value, &transcript.value, &ocr.value)
            .await;

        let mut shots = timeline.value.timeline.shots.clone();
        let jump_cut_count = merge_jump_cuts(&mut shots, &editing.value.jump_cut_shot_ids);

        record(&mut provenance, "timeline", &timeline);
        record(&mut provenance, "transcript", &transcript);
        record(&mut provenance, "ocr", &ocr);
        record(&mut provenance, "editing", &editing);
        record(&mut provenance, "beat_tracking", &audio);
        record(&mut provenance, "narrative", &narrative);

        let analysis = VideoAnalysis {
            version: ANALYSIS_VERSION.to_string(),
            meta: Meta {
                source_path: video_path.to_path_buf(),
                duration_seconds: media.duration_seconds,
                width: media.width,
                height: media.height,
                fps: media.fps,
                file_size_bytes: media.file_size,
                // Repeat runs against an unchanged video must serialize
                // byte-identically, so the timestamp sticks to the first
                // analysis of this content.
                analyzed_at: prior
                    .map(|p| p.meta.analyzed_at)
                    .unwrap_or_else(chrono::Utc::now),
                notes: Vec::new(),
            },
            timeline: Timeline {
                shots,
                pacing: timeline.value.timeline.pacing.clone(),
            },
            editing: Editing {
                camera_motions: editing.value.camera_motions.clone(),
                jump_cut_count,
            },
            audio: audio.value.audio.clone(),
            entities: Entities {
                transcript: transcript.value.segments.clone(),
                captions: ocr.value.captions.clone(),
                text_overlays: ocr.value.text_overlays.clone(),
            },
            narrative: narrative.value.clone(),
            inserted_content_blocks: None,
            provenance,
        };

        analysis.validate()?;
        self.write_artifact(analysis_artifact.as_deref(), &analysis).await;

        info!(
            "✅ Analysis complete in {:.1}s: {} shots, {} transcript segments, {} captions, {} overlays",
            started.elapsed().as_secs_f64(),
            analysis.timeline.shots.len(),
            analysis.entities.transcript.len(),
            analysis.entities.captions.len(),
            analysis.entities.text_overlays.len(),
        );
        for (module, source) in &analysis.provenance.modules {
            info!("   {} <- {}", module, source);
        }

        Ok(analysis)
    }

    /// Analyze and persist the validated document as pretty-printed JSON.
    pub async fn analyze_to_file(
        &self,
        video_path: &Path,
        output_path: &Path,
    ) -> Result<VideoAnalysis> {
        let analysis = self.analyze(video_path).await?;
        let json = serde_json::to_string_pretty(&analysis)?;
        tokio::fs::write(output_path, json)
            .await
            .with_context(|| format!("writing {}", output_path.display()))?;
        info!("💾 Wrote analysis to {}", output_path.display());
        Ok(analysis)
    }

    async fn run_timeline(
        &self,
        video_path: &Path,
        duration: f64,
        cache_dir: Option<&Path>,
    ) -> ModuleResult<TimelineOutcome> {
        let artifact = cache_dir.map(|d| d.join(TIMELINE_ARTIFACT));
        if let Some(cached) = self.read_artifact::<TimelineOutcome>(artifact.as_deref()).await {
            let notes = cached.notes.clone();
            return ModuleResult::cached(cached, notes);
        }

        let module = TimelineModule {
            scenedetect_threshold: self.config.timeline.scenedetect_threshold,
            ffmpeg_scene_threshold: self.config.timeline.ffmpeg_scene_threshold,
        };
        let strategy = DetectorStrategy::from_str(&self.config.timeline.detector)
            .unwrap_or(DetectorStrategy::Auto);

        match module.analyze(video_path, duration, strategy).await {
            Ok(outcome) => {
                self.write_artifact(artifact.as_deref(), &outcome).await;
                let notes = outcome.notes.clone();
                ModuleResult {
                    provenance: outcome.technique.clone(),
                    value: outcome,
                    notes,
                }
            }
            Err(e) => {
                warn!("timeline analysis failed: {}", e);
                ModuleResult::unavailable(
                    fallback_timeline(duration),
                    format!("timeline: degraded to a single shot ({})", e),
                )
            }
        }
    }

    async fn run_transcript(
        &self,
        video_path: &Path,
        has_audio: bool,
        cache_dir: Option<&Path>,
    ) -> ModuleResult<TranscriptOutcome> {
        let empty = TranscriptOutcome {
            segments: Vec::new(),
            engine: String::new(),
            notes: Vec::new(),
        };
        if !self.config.transcription.enabled {
            return ModuleResult::disabled(empty);
        }

        let artifact = cache_dir.map(|d| d.join(TRANSCRIPT_ARTIFACT));
        if let Some(cached) = self
            .read_artifact::<TranscriptOutcome>(artifact.as_deref())
            .await
        {
            let notes = cached.notes.clone();
            return ModuleResult::cached(cached, notes);
        }

        let module = TranscriptModule {
            model: self.config.transcription.model.clone(),
            threads: self.config.transcription.threads,
        };
        match module.analyze(video_path, has_audio).await {
            Ok(outcome) => {
                self.write_artifact(artifact.as_deref(), &outcome).await;
                let notes = outcome.notes.clone();
                ModuleResult {
                    provenance: outcome.engine.clone(),
                    value: outcome,
                    notes,
                }
            }
            Err(e) => {
                warn!("transcription failed: {}", e);
                ModuleResult::unavailable(empty, e.degrade_note("transcript"))
            }
        }
    }

    async fn run_ocr(
        &self,
        video_path: &Path,
        transcript: &[crate::model::TranscriptSegment],
        cache_dir: Option<&Path>,
    ) -> ModuleResult<OcrOutcome> {
        let empty = OcrOutcome {
            captions: Vec::new(),
            text_overlays: Vec::new(),
            engine: String::new(),
            notes: Vec::new(),
        };
        if !self.config.ocr.enabled {
            return ModuleResult::disabled(empty);
        }

        let artifact = cache_dir.map(|d| d.join(OCR_ARTIFACT));
        if let Some(cached) = self.read_artifact::<OcrOutcome>(artifact.as_deref()).await {
            let notes = cached.notes.clone();
            return ModuleResult::cached(cached, notes);
        }

        let module = OcrModule {
            fps_first: self.config.ocr.fps_first,
            fps_refine: self.config.ocr.fps_refine,
            crop_bottom_fraction: self.config.ocr.crop_bottom_fraction,
            two_pass: self.config.ocr.two_pass,
        };
        match module.analyze(video_path, transcript).await {
            Ok(outcome) => {
                self.write_artifact(artifact.as_deref(), &outcome).await;
                let notes = outcome.notes.clone();
                ModuleResult {
                    provenance: outcome.engine.clone(),
                    value: outcome,
                    notes,
                }
            }
            Err(e) => {
                warn!("OCR failed: {}", e);
                ModuleResult::unavailable(empty, e.degrade_note("ocr"))
            }
        }
    }

    async fn run_editing(
        &self,
        video_path: &Path,
        shots: &[Shot],
        cache_dir: Option<&Path>,
    ) -> ModuleResult<EditingOutcome> {
        let empty = EditingOutcome {
            camera_motions: Vec::new(),
            jump_cut_shot_ids: Vec::new(),
            notes: Vec::new(),
        };
        if !self.config.editing.enabled {
            return ModuleResult::disabled(empty);
        }

        let artifact = cache_dir.map(|d| d.join(EDITING_ARTIFACT));
        if let Some(cached) = self.read_artifact::<EditingOutcome>(artifact.as_deref()).await {
            let notes = cached.notes.clone();
            return ModuleResult::cached(cached, notes);
        }

        let module = EditingModule {
            frame_size: self.config.editing.frame_size,
        };
        match module.analyze(video_path, shots).await {
            Ok(outcome) => {
                self.write_artifact(artifact.as_deref(), &outcome).await;
                let notes = outcome.notes.clone();
                ModuleResult {
                    provenance: "frame-hash-motion".to_string(),
                    value: outcome,
                    notes,
                }
            }
            Err(e) => {
                warn!("editing analysis failed: {}", e);
                ModuleResult::unavailable(empty, e.degrade_note("editing"))
            }
        }
    }

    async fn run_audio(
        &self,
        video_path: &Path,
        duration: f64,
        transcript: &[crate::model::TranscriptSegment],
        cache_dir: Option<&Path>,
    ) -> ModuleResult<AudioOutcome> {
        let empty = AudioOutcome {
            audio: AudioStructure::default(),
            technique: String::new(),
            notes: Vec::new(),
        };
        if !self.config.audio.enabled {
            return ModuleResult::disabled(empty);
        }

        let artifact = cache_dir.map(|d| d.join(AUDIO_ARTIFACT));
        if let Some(cached) = self.read_artifact::<AudioOutcome>(artifact.as_deref()).await {
            let notes = cached.notes.clone();
            return ModuleResult::cached(cached, notes);
        }

        let module = AudioStructureModule::new();
        match module.analyze(video_path, duration, transcript).await {
            Ok(outcome) => {
                self.write_artifact(artifact.as_deref(), &outcome).await;
                let notes = outcome.notes.clone();
                ModuleResult {
                    provenance: outcome.technique.clone(),
                    value: outcome,
                    notes,
                }
            }
            Err(e) => {
                warn!("audio structure analysis failed: {}", e);
                ModuleResult::unavailable(empty, e.degrade_note("beat_tracking"))
            }
        }
    }

    /// Narrative is cheap and depends on every other module, so it is
    /// always recomputed rather than cached.
    async fn run_narrative(
        &self,
        media: &MediaInfo,
        timeline: &TimelineOutcome,
        transcript: &TranscriptOutcome,
        ocr: &OcrOutcome,
    ) -> ModuleResult<Narrative> {
        let mode = NarrativeMode::from_str(&self.config.narrative.mode)
            .unwrap_or(NarrativeMode::Heuristic);
        let module = NarrativeModule {
            mode,
            llm_config: self.config.llm.clone(),
        };

        let first_cut = timeline.timeline.shots.get(1).map(|s| s.start);
        let ocr_texts: Vec<String> = ocr
            .captions
            .iter()
            .map(|c| c.text.clone())
            .chain(ocr.text_overlays.iter().map(|o| o.text.clone()))
            .collect();

        match module
            .analyze(
                media.duration_seconds,
                first_cut,
                &transcript.segments,
                &ocr_texts,
            )
            .await
        {
            Ok(outcome) => ModuleResult {
                provenance: outcome.technique,
                value: outcome.narrative,
                notes: outcome.notes,
            },
            Err(e) => {
                warn!("narrative inference failed: {}", e);
                ModuleResult::unavailable(Narrative::default(), e.degrade_note("narrative"))
            }
        }
    }

    async fn read_artifact<T: serde::de::DeserializeOwned>(
        &self,
        artifact: Option<&Path>,
    ) -> Option<T> {
        match artifact {
            Some(path) => self.cache.read_if_exists(path).await,
            None => None,
        }
    }

    /// Cache writes are best-effort; a failed write only logs.
    async fn write_artifact<T: serde::Serialize>(&self, artifact: Option<&Path>, value: &T) {
        if let Some(path) = artifact {
            if let Err(e) = self.cache.write_atomic(path, value).await {
                warn!("cache write failed for {}: {}", path.display(), e);
            }
        }
    }
}

fn record<T>(provenance: &mut Provenance, module: &str, result: &ModuleResult<T>) {
    provenance
        .modules
        .insert(module.to_string(), result.provenance.clone());
    provenance.notes.extend(result.notes.iter().cloned());
}

/// Single full-length shot used when every shot detector fails.
fn fallback_timeline(duration: f64) -> TimelineOutcome {
    let shot = Shot {
        id: 1,
        start: 0.0,
        end: duration,
        transition_in: None,
        jump_cut: None,
    };
    TimelineOutcome {
        timeline: Timeline {
            pacing: Pacing {
                shot_count: 1,
                mean_shot_seconds: duration,
                median_shot_seconds: duration,
                min_shot_seconds: duration,
                max_shot_seconds: duration,
                classification: PacingClass::from_mean_seconds(duration),
            },
            shots: vec![shot],
        },
        technique: "fallback".to_string(),
        notes: Vec::new(),
    }
}

/// Marks the shots named by the editing module as jump-cut entries and
/// returns how many were marked.
fn merge_jump_cuts(shots: &mut [Shot], jump_cut_shot_ids: &[u32]) -> usize {
    let mut count = 0;
    for id in jump_cut_shot_ids {
        if let Some(shot) = shots.iter_mut().find(|s| s.id == *id) {
            shot.jump_cut = Some(true);
            count += 1;
        }
    }
    count
}
