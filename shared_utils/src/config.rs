//! Conversion defaults and CLI value parsing

use crate::errors::{ConvertError, Result};

pub const IMAGE_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "webp", "heic", "heif", "gif", "tiff", "tif",
];

pub const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "avi", "mkv", "mov", "mpg", "mpeg", "m4v", "webm", "ts",
];

/// Extensions eligible for the Apple gain-map HDR branch.
pub const HEIF_EXTENSIONS: &[&str] = &["heic", "heif"];

/// Still-image siblings that mark a video as a Live Photo motion clip.
pub const LIVE_PHOTO_STILL_EXTENSIONS: &[&str] = &["heic", "heif", "jpg", "jpeg"];
/// Container of Live Photo motion clips; other videos never pair with a still.
pub const LIVE_PHOTO_MOTION_EXTENSION: &str = "mov";

pub const DEFAULT_VIDEO_ARGS: &str =
    "-c:v libsvtav1 -preset 6 -crf 45 -pix_fmt yuv420p10le -c:a libopus -b:a 96k";

pub const DEFAULT_QUALITY: u8 = 75;
pub const DEFAULT_IMAGE_SPEED: u8 = 4;
pub const DEFAULT_VIDEO_SPEED: u8 = 6;
pub const DEFAULT_MAX_IMAGE_RESOLUTION: &str = "4032*3024";
pub const DEFAULT_MAX_VIDEO_RESOLUTION: &str = "1920*1080";
pub const DEFAULT_MAX_FRAMERATE: u32 = 30;
pub const DEFAULT_LOG_FILE: &str = "conversion.log";

pub const LIVE_PHOTO_CRF_OFFSET: u32 = 15;
/// Highest CRF accepted by libsvtav1 / libaom.
pub const MAX_AV1_CRF: u32 = 63;

/// Allowed |source - output| duration difference before an encode counts as truncated.
pub const DURATION_TOLERANCE_SECS: f64 = 2.0;

/// SDR reference white used when mapping linear HDR into the PQ signal range.
pub const REFERENCE_WHITE_NITS: f32 = 203.0;

pub const VIDEO_CONTAINER_EXTENSION: &str = "mp4";

/// Parse a resolution cap: `WIDTH*HEIGHT`, `WIDTHxHEIGHT` or a raw pixel count.
pub fn parse_resolution(value: &str) -> Result<u64> {
    let value = value.trim();
    let invalid = || {
        ConvertError::ConfigurationError(format!(
            "invalid resolution '{}': expected WIDTH*HEIGHT or a pixel count",
            value
        ))
    };

    let pixels = match value.split_once(['*', 'x', 'X']) {
        Some((w, h)) => {
            let w: u64 = w.trim().parse().map_err(|_| invalid())?;
            let h: u64 = h.trim().parse().map_err(|_| invalid())?;
            w.checked_mul(h).ok_or_else(invalid)?
        }
        None => value.parse::<u64>().map_err(|_| invalid())?,
    };

    if pixels == 0 {
        return Err(invalid());
    }
    Ok(pixels)
}

pub fn is_image_extension(ext: &str) -> bool {
    IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str())
}

pub fn is_video_extension(ext: &str) -> bool {
    VIDEO_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str())
}

pub fn is_heif_extension(ext: &str) -> bool {
    HEIF_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str())
}
