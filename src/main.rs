use anyhow::Result;
use clap::{Arg, Command};
use std::path::PathBuf;
use tracing::{info, warn};

use videospec_analyzer::{Analyzer, Config, VideoAnalysis};

#[tokio::main]
async fn main() -> Result<()> {
    let matches = Command::new("videospec-analyzer")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Structural analysis of short-form videos")
        .arg(
            Arg::new("video")
                .short('i')
                .long("video")
                .value_name("FILE")
                .help("Video file to analyze"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("FILE")
                .help("Output JSON path (default: <video>.analysis.json)"),
        )
        .arg(
            Arg::new("cache-dir")
                .long("cache-dir")
                .value_name("DIR")
                .help("Cache root directory"),
        )
        .arg(
            Arg::new("no-cache")
                .long("no-cache")
                .help("Recompute every module, ignoring cached results")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("detector")
                .long("detector")
                .value_name("NAME")
                .help("Shot detector: auto, scenedetect or ffmpeg"),
        )
        .arg(
            Arg::new("narrative-mode")
                .long("narrative-mode")
                .value_name("MODE")
                .help("Narrative inference: heuristic or llm"),
        )
        .arg(
            Arg::new("no-ocr")
                .long("no-ocr")
                .help("Skip on-screen text recognition")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("no-transcript")
                .long("no-transcript")
                .help("Skip speech-to-text")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("print-schema")
                .long("print-schema")
                .help("Print the output document JSON schema and exit")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    let verbose = matches.get_flag("verbose");
    let default_filter = if verbose {
        "videospec_analyzer=debug,info"
    } else {
        "videospec_analyzer=info,warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .init();

    if matches.get_flag("print-schema") {
        let schema = schemars::schema_for!(VideoAnalysis);
        println!("{}", serde_json::to_string_pretty(&schema)?);
        return Ok(());
    }

    let video = matches
        .get_one::<String>("video")
        .map(PathBuf::from)
        .ok_or_else(|| anyhow::anyhow!("--video is required"))?;

    let output = matches
        .get_one::<String>("output")
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            let mut name = video
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "video".to_string());
            name.push_str(".analysis.json");
            video.with_file_name(name)
        });

    let mut config = Config::load().unwrap_or_else(|e| {
        warn!("Failed to load config, using defaults: {}", e);
        Config::default()
    });

    if let Some(dir) = matches.get_one::<String>("cache-dir") {
        config.cache.dir = PathBuf::from(dir);
    }
    if matches.get_flag("no-cache") {
        config.cache.enabled = false;
    }
    if let Some(detector) = matches.get_one::<String>("detector") {
        config.timeline.detector = detector.clone();
    }
    if let Some(mode) = matches.get_one::<String>("narrative-mode") {
        config.narrative.mode = mode.clone();
    }
    if matches.get_flag("no-ocr") {
        config.ocr.enabled = false;
    }
    if matches.get_flag("no-transcript") {
        config.transcription.enabled = false;
    }

    config.validate()?;
    info!("{}", config.summary());

    if !video.exists() {
        return Err(anyhow::anyhow!("video not found: {}", video.display()));
    }

    let analyzer = Analyzer::new(config);
    analyzer.analyze_to_file(&video, &output).await?;

    Ok(())
}
