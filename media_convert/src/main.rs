//! `convert` - batch photo/video converter
//!
//! Mirrors SOURCE_DIR into TARGET_DIR: stills become AVIF (WebP fallback), videos
//! become AV1/Opus MP4. Metadata and creation dates are carried over.

mod dispatcher;

use clap::Parser;
use dispatcher::RunConfig;
use img_av1::{AppleGainMap, HdrReconstructor, NoHdr};
use shared_utils::config::{
    parse_resolution, DEFAULT_IMAGE_SPEED, DEFAULT_LOG_FILE, DEFAULT_MAX_FRAMERATE,
    DEFAULT_MAX_IMAGE_RESOLUTION, DEFAULT_MAX_VIDEO_RESOLUTION, DEFAULT_QUALITY,
    DEFAULT_VIDEO_ARGS, DEFAULT_VIDEO_SPEED,
};
use shared_utils::logging::{init_logging, LogConfig};
use shared_utils::thread_manager::default_worker_count;
use shared_utils::tools::check_required_tools;
use shared_utils::{check_dangerous_directory, print_summary_report, ConversionContext, VideoOptions};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn, Level};

#[derive(Parser, Debug)]
#[command(name = "convert")]
#[command(version, about = "Batch photo/video converter - AVIF/WebP images, AV1/Opus videos", long_about = None)]
struct Cli {
    /// Directory to read media from (recursively)
    #[arg(value_name = "SOURCE_DIR")]
    source: PathBuf,

    /// Directory receiving the mirrored outputs
    #[arg(value_name = "TARGET_DIR")]
    target: PathBuf,

    /// Encoder quality, 0-100
    #[arg(short, long, default_value_t = DEFAULT_QUALITY,
          value_parser = clap::value_parser!(u8).range(0..=100))]
    quality: u8,

    /// Image area cap: W*H, WxH or a pixel count
    #[arg(long, default_value = DEFAULT_MAX_IMAGE_RESOLUTION)]
    max_image_resolution: String,

    /// Video area cap: W*H, WxH or a pixel count
    #[arg(long, default_value = DEFAULT_MAX_VIDEO_RESOLUTION)]
    max_video_resolution: String,

    /// Videos above this frame rate are resampled down to it
    #[arg(long, default_value_t = DEFAULT_MAX_FRAMERATE)]
    max_framerate: u32,

    /// ffmpeg output arguments template
    #[arg(long, default_value = DEFAULT_VIDEO_ARGS, allow_hyphen_values = true)]
    video_args: String,

    /// AVIF encoder speed (0 slowest - 10 fastest)
    #[arg(long, default_value_t = DEFAULT_IMAGE_SPEED)]
    image_speed: u8,

    /// AV1 encoder preset
    #[arg(long, default_value_t = DEFAULT_VIDEO_SPEED)]
    video_speed: u8,

    /// Parallel conversions
    #[arg(short = 'w', long, default_value_t = default_worker_count())]
    max_workers: usize,

    /// Delete each source after its output has been verified
    #[arg(long)]
    delete_original: bool,

    /// Skip files whose output already exists (default)
    #[arg(long, default_value_t = true)]
    skip_existing: bool,

    /// Re-encode even when the output already exists
    #[arg(long)]
    no_skip_existing: bool,

    /// Rebuild HDR from Apple gain maps (needs avifenc)
    #[arg(long)]
    keep_apple_hdr: bool,

    #[arg(long, default_value = DEFAULT_LOG_FILE)]
    log_file: PathBuf,

    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    if let Err(e) = init_logging(
        "convert",
        LogConfig::default()
            .with_log_file(&cli.log_file)
            .with_level(level),
    ) {
        eprintln!("⚠️  Logging to {} unavailable: {:#}", cli.log_file.display(), e);
    }

    let config = match build_config(&cli) {
        Ok(c) => c,
        Err(e) => {
            error!("❌ {}", e);
            eprintln!("❌ Error: {}", e);
            std::process::exit(1);
        }
    };

    let cancel = Arc::new(AtomicBool::new(false));
    let flag = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
        eprintln!("\n⚠️  Interrupted: finishing in-flight files, no new ones will start");
    }) {
        warn!("⚠️ Cannot install Ctrl-C handler: {}", e);
    }

    let hdr: Box<dyn HdrReconstructor> = if config.keep_apple_hdr {
        Box::new(AppleGainMap)
    } else {
        Box::new(NoHdr)
    };
    let ctx = ConversionContext::system();

    info!(
        "🚀 Converting {} → {}",
        config.source.display(),
        config.target.display()
    );
    let summary = match dispatcher::run(&config, &ctx, hdr.as_ref(), &cancel) {
        Ok(s) => s,
        Err(e) => {
            error!("❌ {:#}", e);
            eprintln!("❌ Error: {:#}", e);
            std::process::exit(1);
        }
    };

    print_summary_report(
        &summary.result,
        summary.elapsed,
        summary.input_bytes,
        summary.output_bytes,
        "Media Conversion",
    );
    if cancel.load(Ordering::SeqCst) {
        warn!("⚠️ Run was interrupted; unstarted files were counted as skipped");
    }

    // per-file failures are reported, not turned into a failing exit status
    Ok(())
}

/// Validate flags and the environment before any file is touched.
fn build_config(cli: &Cli) -> shared_utils::Result<RunConfig> {
    let max_image_resolution = parse_resolution(&cli.max_image_resolution)?;
    let max_video_resolution = parse_resolution(&cli.max_video_resolution)?;
    if cli.max_framerate == 0 {
        return Err(shared_utils::ConvertError::ConfigurationError(
            "--max-framerate must be positive".to_string(),
        ));
    }

    check_required_tools(cli.keep_apple_hdr)?;

    if cli.delete_original {
        check_dangerous_directory(&cli.source)
            .map_err(shared_utils::ConvertError::ConfigurationError)?;
    }

    Ok(RunConfig {
        source: cli.source.clone(),
        target: cli.target.clone(),
        quality: cli.quality,
        max_image_resolution,
        max_video_resolution,
        video: VideoOptions {
            args_template: cli.video_args.clone(),
            max_framerate: cli.max_framerate,
        },
        image_speed: cli.image_speed,
        video_speed: cli.video_speed,
        max_workers: cli.max_workers,
        delete_original: cli.delete_original,
        keep_apple_hdr: cli.keep_apple_hdr,
        skip_existing: cli.skip_existing && !cli.no_skip_existing,
        show_progress: true,
    })
}
