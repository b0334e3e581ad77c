//! vid-av1: video pipeline
//!
//! Rotation-aware AV1/Opus encoding through ffmpeg with a post-encode duration check.
//!
//! ```rust,ignore
//! use vid_av1::convert_video;
//! let outcome = convert_video(&request, &ctx);
//! ```

pub mod conversion_api;

pub use conversion_api::{
    build_ffmpeg_args, convert_video, default_video_options, raise_crf,
    rewrite_video_args,
};
