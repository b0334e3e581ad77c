//! Conversion request / outcome types shared by the image and video pipelines

use crate::batch::MediaFile;
use crate::command_runner::ConversionContext;
use crate::metadata::copy_metadata;
use crate::safety::safe_delete_original;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoOptions {
    /// Whitespace-separated ffmpeg output arguments
    pub args_template: String,
    pub max_framerate: u32,
}

/// Everything one task needs. Built once per file, never mutated afterwards.
#[derive(Debug, Clone)]
pub struct ConversionRequest {
    pub file: MediaFile,
    pub target_root: PathBuf,
    pub quality: u8,
    /// Maximum output area in pixels
    pub max_resolution: u64,
    pub speed: u8,
    pub delete_original: bool,
    pub keep_apple_hdr: bool,
    /// When false, existing outputs are re-encoded instead of skipped
    pub skip_existing: bool,
    pub video: Option<VideoOptions>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConversionOutcome {
    Succeeded(PathBuf),
    SkippedExisting(PathBuf),
    FailedProbe(String),
    FailedEncode(String),
    FailedIntegrityCheck { source_secs: f64, output_secs: f64 },
}

impl ConversionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ConversionOutcome::Succeeded(_))
    }

    pub fn is_failure(&self) -> bool {
        !matches!(
            self,
            ConversionOutcome::Succeeded(_) | ConversionOutcome::SkippedExisting(_)
        )
    }

    pub fn output_path(&self) -> Option<&PathBuf> {
        match self {
            ConversionOutcome::Succeeded(p) | ConversionOutcome::SkippedExisting(p) => Some(p),
            _ => None,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            ConversionOutcome::Succeeded(p) => format!("converted → {}", p.display()),
            ConversionOutcome::SkippedExisting(p) => format!("output exists: {}", p.display()),
            ConversionOutcome::FailedProbe(msg) => format!("probe failed: {}", msg),
            ConversionOutcome::FailedEncode(msg) => format!("encode failed: {}", msg),
            ConversionOutcome::FailedIntegrityCheck {
                source_secs,
                output_secs,
            } => format!(
                "duration mismatch: source {:.2}s, output {:.2}s",
                source_secs, output_secs
            ),
        }
    }
}

/// Post-encode steps common to both pipelines: metadata copy (never fatal) and
/// the optional deletion of the source once the output is verified.
pub fn finalize_success(
    ctx: &ConversionContext,
    request: &ConversionRequest,
    output: PathBuf,
) -> ConversionOutcome {
    let source = &request.file.path;
    match copy_metadata(ctx, source, &output) {
        Ok(date) => info!(
            "✅ {} → {} (dated {})",
            source.display(),
            output.display(),
            date
        ),
        Err(e) => warn!("⚠️ Metadata copy failed for {}: {}", output.display(), e),
    }

    if request.delete_original {
        if let Err(e) = safe_delete_original(source, &output) {
            warn!("⚠️ Original kept: {}: {}", source.display(), e);
        }
    }
    ConversionOutcome::Succeeded(output)
}
