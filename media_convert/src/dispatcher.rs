//! Discovery & dispatch
//!
//! Walks the source tree once, then runs every image and afterwards every video
//! through one shared rayon pool. Each file is an independent task: its outcome is
//! folded into per-kind atomic counters and never aborts the batch.

use anyhow::{Context, Result};
use img_av1::{convert_image, HdrReconstructor};
use rayon::prelude::*;
use shared_utils::{
    discover_media, BatchResult, ConversionContext, ConversionOutcome, ConversionRequest,
    MediaFile, MediaKind, UnifiedProgressBar, VideoOptions,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use vid_av1::convert_video;

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub source: PathBuf,
    pub target: PathBuf,
    pub quality: u8,
    pub max_image_resolution: u64,
    pub max_video_resolution: u64,
    pub video: VideoOptions,
    pub image_speed: u8,
    pub video_speed: u8,
    pub max_workers: usize,
    pub delete_original: bool,
    pub keep_apple_hdr: bool,
    pub skip_existing: bool,
    pub show_progress: bool,
}

impl RunConfig {
    fn request_for(&self, file: &MediaFile, target_root: &Path) -> ConversionRequest {
        let (max_resolution, speed, video) = match file.kind {
            MediaKind::Image => (self.max_image_resolution, self.image_speed, None),
            MediaKind::Video => (
                self.max_video_resolution,
                self.video_speed,
                Some(self.video.clone()),
            ),
        };
        ConversionRequest {
            file: file.clone(),
            target_root: target_root.to_path_buf(),
            quality: self.quality,
            max_resolution,
            speed,
            delete_original: self.delete_original,
            keep_apple_hdr: self.keep_apple_hdr,
            skip_existing: self.skip_existing,
            video,
        }
    }
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub result: BatchResult,
    pub input_bytes: u64,
    pub output_bytes: u64,
    pub elapsed: Duration,
}

impl RunSummary {
    fn absorb(&mut self, other: RunSummary) {
        self.result.merge(other.result);
        self.input_bytes += other.input_bytes;
        self.output_bytes += other.output_bytes;
    }
}

/// Convert everything under `config.source` into `config.target`.
///
/// `cancel` is polled before each task starts; files not started when it flips
/// are counted as skipped.
pub fn run(
    config: &RunConfig,
    ctx: &ConversionContext,
    hdr: &dyn HdrReconstructor,
    cancel: &AtomicBool,
) -> Result<RunSummary> {
    let start = Instant::now();

    let source = config
        .source
        .canonicalize()
        .with_context(|| format!("Source directory not accessible: {}", config.source.display()))?;
    anyhow::ensure!(source.is_dir(), "Source is not a directory: {}", source.display());

    std::fs::create_dir_all(&config.target)
        .with_context(|| format!("Cannot create target directory: {}", config.target.display()))?;
    let target = config.target.canonicalize()?;

    let exclude = target.starts_with(&source).then_some(target.as_path());
    if exclude.is_some() {
        info!("📂 Target lies inside source, excluding {}", target.display());
    }

    let discovery = discover_media(&source, exclude);
    info!(
        "📂 Found {} media files ({} images, {} videos) in {}",
        discovery.total(),
        discovery.images.len(),
        discovery.videos.len(),
        source.display()
    );

    let workers = config.max_workers.max(1);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()
        .or_else(|_| rayon::ThreadPoolBuilder::new().num_threads(2).build())
        .map_err(|e| anyhow::anyhow!("Failed to create thread pool: {}", e))?;
    info!("🔧 Worker pool: {} threads", pool.current_num_threads());

    let mut summary = RunSummary::default();
    for (kind, files) in [
        (MediaKind::Image, &discovery.images),
        (MediaKind::Video, &discovery.videos),
    ] {
        if files.is_empty() {
            continue;
        }
        let kind_summary =
            pool.install(|| process_kind(config, &target, kind, files, ctx, hdr, cancel));
        info!(
            "{}: {} succeeded, {} skipped, {} failed",
            kind.label(),
            kind_summary.result.succeeded,
            kind_summary.result.skipped,
            kind_summary.result.failed
        );
        summary.absorb(kind_summary);
    }

    summary.elapsed = start.elapsed();
    Ok(summary)
}

fn process_kind(
    config: &RunConfig,
    target: &Path,
    kind: MediaKind,
    files: &[MediaFile],
    ctx: &ConversionContext,
    hdr: &dyn HdrReconstructor,
    cancel: &AtomicBool,
) -> RunSummary {
    let total = files.len();
    let pb = if config.show_progress {
        UnifiedProgressBar::new(total as u64, kind.label())
    } else {
        UnifiedProgressBar::hidden(total as u64)
    };

    let succeeded = AtomicUsize::new(0);
    let skipped = AtomicUsize::new(0);
    let failed = AtomicUsize::new(0);
    let input_bytes = AtomicU64::new(0);
    let output_bytes = AtomicU64::new(0);
    let errors = Mutex::new(Vec::new());

    files.par_iter().for_each(|file| {
        if cancel.load(Ordering::SeqCst) {
            skipped.fetch_add(1, Ordering::Relaxed);
            pb.inc();
            return;
        }

        pb.set_message(
            file.path
                .file_name()
                .unwrap_or_default()
                .to_string_lossy()
                .to_string(),
        );

        // measured up front: the original may be gone afterwards
        let source_size = std::fs::metadata(&file.path).map(|m| m.len()).unwrap_or(0);
        let request = config.request_for(file, target);
        let outcome = match kind {
            MediaKind::Image => convert_image(&request, ctx, hdr),
            MediaKind::Video => convert_video(&request, ctx),
        };

        match &outcome {
            ConversionOutcome::Succeeded(output) => {
                succeeded.fetch_add(1, Ordering::Relaxed);
                input_bytes.fetch_add(source_size, Ordering::Relaxed);
                let out_size = std::fs::metadata(output).map(|m| m.len()).unwrap_or(0);
                output_bytes.fetch_add(out_size, Ordering::Relaxed);
            }
            ConversionOutcome::SkippedExisting(_) => {
                skipped.fetch_add(1, Ordering::Relaxed);
            }
            failure => {
                failed.fetch_add(1, Ordering::Relaxed);
                pb.println(&format!("❌ {}: {}", file.relative.display(), failure.describe()));
                warn!("❌ Conversion failed {}: {}", file.path.display(), failure.describe());
                if let Ok(mut errors) = errors.lock() {
                    errors.push((file.path.clone(), failure.describe()));
                }
            }
        }
        pb.inc();
    });

    pb.finish_with_message("Complete!");

    let mut errors = errors.into_inner().unwrap_or_default();
    errors.sort();

    RunSummary {
        result: BatchResult {
            total,
            succeeded: succeeded.into_inner(),
            failed: failed.into_inner(),
            skipped: skipped.into_inner(),
            errors,
        },
        input_bytes: input_bytes.into_inner(),
        output_bytes: output_bytes.into_inner(),
        elapsed: Duration::ZERO,
    }
}
