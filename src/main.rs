use anyhow::{anyhow, Context, Result};
use clap::{Arg, ArgAction, Command};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use xperi3d_upload::{
    Config, FfmpegFrameSampler, HttpProcessingService, ImageAsset, MemoryKind, RoomDetails,
    SubmissionResult, SubmitStrategy, Submitter, ThumbnailGenerator, UploadSession, VideoFile,
};

#[tokio::main]
async fn main() -> Result<()> {
    let matches = Command::new("XPERI3D Memory Room Uploader")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Upload a room video and create its memory room artifacts")
        .arg(
            Arg::new("video")
                .short('i')
                .long("video")
                .value_name("FILE")
                .help("Video of the room or object")
                .required(true),
        )
        .arg(
            Arg::new("thumbnail")
                .short('t')
                .long("thumbnail")
                .value_name("IMAGE")
                .help("Use this image instead of sampling a frame from the video"),
        )
        .arg(
            Arg::new("title")
                .long("title")
                .value_name("TITLE")
                .help("Memory room title (defaults to the video file name)"),
        )
        .arg(
            Arg::new("description")
                .long("description")
                .value_name("TEXT")
                .help("What makes this space special"),
        )
        .arg(
            Arg::new("kind")
                .long("kind")
                .value_name("KIND")
                .help("room or object")
                .default_value("room"),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file"),
        )
        .arg(
            Arg::new("base-url")
                .short('u')
                .long("base-url")
                .value_name("URL")
                .help("Processing service base URL"),
        )
        .arg(
            Arg::new("output-dir")
                .short('o')
                .long("output-dir")
                .value_name("DIR")
                .help("Output directory for results"),
        )
        .arg(
            Arg::new("sequential")
                .long("sequential")
                .help("Call the description service only after depth analysis succeeded")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    let verbose = matches.get_flag("verbose");
    let default_filter = if verbose {
        "xperi3d_upload=debug,info".to_string()
    } else {
        let level = std::env::var("XPERI3D_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        format!("xperi3d_upload={},warn", level)
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    // Load configuration
    let mut config = match matches.get_one::<String>("config") {
        Some(path) => Config::from_file(Path::new(path))?,
        None => Config::load().unwrap_or_else(|e| {
            warn!("Failed to load config, using defaults: {}", e);
            Config::default()
        }),
    };

    if let Some(base_url) = matches.get_one::<String>("base-url") {
        config.service.base_url = Some(base_url.clone());
    }
    if let Some(output_dir) = matches.get_one::<String>("output-dir") {
        config.output.base_dir = PathBuf::from(output_dir);
    }
    if matches.get_flag("sequential") {
        config.service.strategy = SubmitStrategy::Sequential;
    }
    config.validate()?;

    info!("🚀 XPERI3D uploader starting...");
    for line in config.summary().lines() {
        info!("{}", line);
    }

    let video_path = PathBuf::from(
        matches
            .get_one::<String>("video")
            .ok_or_else(|| anyhow!("--video is required"))?,
    );
    if !video_path.exists() {
        error!("Video does not exist: {}", video_path.display());
        return Err(anyhow!("Video not found"));
    }

    let kind: MemoryKind = matches
        .get_one::<String>("kind")
        .map(|k| k.parse::<MemoryKind>())
        .transpose()
        .map_err(|e: String| anyhow!(e))?
        .unwrap_or_default();
    let title = matches
        .get_one::<String>("title")
        .cloned()
        .or_else(|| video_path.file_stem().map(|s| s.to_string_lossy().to_string()))
        .unwrap_or_default();
    let mut details = RoomDetails::new(title).with_kind(kind);
    if let Some(description) = matches.get_one::<String>("description") {
        details = details.with_description(description.clone());
    }

    // Wire up the session
    let service = HttpProcessingService::new(config.service.clone())?;
    let sampler = FfmpegFrameSampler::new(&config.thumbnail);
    let generator = ThumbnailGenerator::new(Arc::new(sampler), &config.thumbnail);
    let submitter = Submitter::new(Arc::new(service), config.service.strategy);
    let session = UploadSession::new(generator, submitter, config.upload.clone());
    session.set_details(details.clone()).await;

    let video = VideoFile::from_path(&video_path)
        .await
        .with_context(|| format!("Cannot read {}", video_path.display()))?;

    let selected = match matches.get_one::<String>("thumbnail") {
        Some(thumbnail_path) => {
            let bytes = tokio::fs::read(thumbnail_path)
                .await
                .with_context(|| format!("Cannot read {}", thumbnail_path))?;
            session
                .select_video_with_thumbnail(video, ImageAsset::from_bytes(bytes))
                .await
        }
        None => session.select_video(video).await.map(|_| ()),
    };
    if let Err(e) = selected {
        error!("❌ {}", e.user_message());
        return Err(anyhow!(e));
    }

    let start_time = std::time::Instant::now();
    let result = match session.submit().await {
        Ok(result) => result,
        Err(e) => {
            error!("❌ {}", e.user_message());
            return Err(anyhow!(e));
        }
    };

    let output_dir = config.output.base_dir.clone();
    tokio::fs::create_dir_all(&output_dir).await?;
    let written = write_artifacts(&output_dir, &video_path, &details, &result, config.output.save_summary).await?;

    info!("🎉 Memory room \"{}\" ready in {:.2}s", details.title, start_time.elapsed().as_secs_f64());
    for path in written {
        info!("💾 Wrote {}", path.display());
    }

    Ok(())
}

async fn write_artifacts(
    output_dir: &Path,
    video_path: &Path,
    details: &RoomDetails,
    result: &SubmissionResult,
    save_summary: bool,
) -> Result<Vec<PathBuf>> {
    let stem = video_path
        .file_stem()
        .map(|s| s.to_string_lossy().replace(' ', "_"))
        .unwrap_or_else(|| "memory_room".to_string());

    let image_path = output_dir.join(format!("{}_depth.{}", stem, result.processed_image.extension()));
    tokio::fs::write(&image_path, result.processed_image.bytes()).await?;

    let text_path = output_dir.join(format!("{}_description.txt", stem));
    tokio::fs::write(&text_path, &result.description).await?;

    let mut written = vec![image_path.clone(), text_path.clone()];

    if save_summary {
        let summary = serde_json::json!({
            "title": details.title,
            "description": details.description,
            "kind": details.kind,
            "video": video_path.display().to_string(),
            "processed_image": image_path.display().to_string(),
            "processed_image_type": result.processed_image.mime_type(),
            "generated_description": result.description,
            "completed_at": result.completed_at.to_rfc3339(),
        });
        let summary_path = output_dir.join(format!("{}_room.json", stem));
        tokio::fs::write(&summary_path, serde_json::to_string_pretty(&summary)?).await?;
        written.push(summary_path);
    }

    Ok(written)
}
