//! Shared Utilities for the media_convert tools
//!
//! Common functionality shared by the image pipeline, the video pipeline and the
//! `convert` dispatcher:
//! - Process runner abstraction over external tools (magick, ffmpeg, ffprobe, exiftool, avifenc)
//! - Geometry calculator (bounded, even, rotation-aware resize plans)
//! - FFprobe / identify probes
//! - Metadata preservation and creation-date provenance
//! - Discovery, batch counting, progress bars and summary reporting
//! - Logging, configuration defaults, safety checks

pub mod batch;
pub mod command_runner;
pub mod config;
pub mod conversion_types;
pub mod errors;
pub mod ffprobe;
pub mod geometry;
pub mod identify;
pub mod logging;
pub mod metadata;
pub mod path_safety;
pub mod progress;
pub mod report;
pub mod safety;
pub mod thread_manager;
pub mod tools;

pub use batch::{discover_media, BatchResult, Discovery, MediaFile, MediaKind};
pub use command_runner::{
    remove_partial, CommandOutput, CommandRunner, ConversionContext, FnRunner, SystemRunner,
};
pub use conversion_types::{finalize_success, ConversionOutcome, ConversionRequest, VideoOptions};
pub use errors::{ConvertError, Result};
pub use ffprobe::{get_duration, parse_frame_rate, probe_video, VideoProbe};
pub use geometry::{plan, ResizePlan};
pub use identify::probe_image_dimensions;
pub use metadata::{best_creation_date, copy_metadata, DateSource, TimestampCandidate};
pub use path_safety::{is_nonempty_file, mirrored_output, safe_path_arg};
pub use progress::{format_bytes, format_duration, UnifiedProgressBar};
pub use report::print_summary_report;
pub use safety::{check_dangerous_directory, safe_delete_original};
