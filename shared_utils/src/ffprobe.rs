//! FFprobe wrapper module
//!
//! Video probing for the conversion pipeline: stored dimensions, display rotation,
//! container duration and frame rate. Everything goes through the process runner so
//! tests can feed canned JSON.

use crate::command_runner::ConversionContext;
use crate::errors::{ConvertError, Result};
use crate::path_safety::safe_path_arg;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, PartialEq)]
pub struct VideoProbe {
    /// Stored (encoded) width, before any display rotation
    pub width: u32,
    pub height: u32,
    /// Display rotation in degrees, 0 when absent
    pub rotation: i32,
    /// Container duration in seconds, 0.0 when unknown
    pub duration: f64,
    pub frame_rate: f64,
}

#[derive(Debug, Deserialize, Default)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
    #[serde(default)]
    format: FfprobeFormat,
}

#[derive(Debug, Deserialize, Default)]
struct FfprobeFormat {
    /// ffprobe prints numbers as strings; some builds do not
    #[serde(default)]
    duration: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize, Default)]
struct FfprobeStream {
    #[serde(default)]
    codec_type: Option<String>,
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    height: Option<u32>,
    #[serde(default)]
    r_frame_rate: Option<String>,
    #[serde(default)]
    tags: Option<StreamTags>,
    #[serde(default)]
    side_data_list: Vec<SideData>,
}

#[derive(Debug, Deserialize, Default)]
struct StreamTags {
    #[serde(default)]
    rotate: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct SideData {
    #[serde(default)]
    rotation: Option<serde_json::Value>,
}

fn json_number(value: &serde_json::Value) -> Option<f64> {
    value
        .as_f64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
}

fn probe_args(path: &Path) -> Vec<String> {
    vec![
        "-v".into(),
        "quiet".into(),
        "-print_format".into(),
        "json".into(),
        "-show_format".into(),
        "-show_streams".into(),
        safe_path_arg(path).into_owned(),
    ]
}

pub fn probe_video(ctx: &ConversionContext, path: &Path) -> Result<VideoProbe> {
    let output = ctx.run("ffprobe", &probe_args(path));
    if !output.success || output.stdout.trim().is_empty() {
        return Err(ConvertError::ProbeFailure(format!(
            "ffprobe failed for '{}': {}",
            path.display(),
            output.error_summary()
        )));
    }
    parse_probe_json(&output.stdout).map_err(|e| match e {
        ConvertError::ProbeFailure(msg) => {
            ConvertError::ProbeFailure(format!("{}: {}", path.display(), msg))
        }
        other => other,
    })
}

pub fn parse_probe_json(json_str: &str) -> Result<VideoProbe> {
    let parsed: FfprobeOutput = serde_json::from_str(json_str)
        .map_err(|e| ConvertError::ProbeFailure(format!("invalid ffprobe JSON: {}", e)))?;

    let duration = parsed
        .format
        .duration
        .as_ref()
        .and_then(json_number)
        .unwrap_or(0.0);

    let video_stream = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| ConvertError::ProbeFailure("No video stream found".to_string()))?;

    let (width, height) = match (video_stream.width, video_stream.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => {
            return Err(ConvertError::ProbeFailure(
                "Video stream has no dimensions".to_string(),
            ))
        }
    };

    let frame_rate = parse_frame_rate(video_stream.r_frame_rate.as_deref().unwrap_or("0/1"));

    Ok(VideoProbe {
        width,
        height,
        rotation: stream_rotation(video_stream),
        duration,
        frame_rate,
    })
}

/// `tags.rotate` (older muxers) first, then the display matrix side data.
fn stream_rotation(stream: &FfprobeStream) -> i32 {
    if let Some(r) = stream
        .tags
        .as_ref()
        .and_then(|t| t.rotate.as_deref())
        .and_then(|s| s.trim().parse::<i32>().ok())
    {
        return r;
    }
    stream
        .side_data_list
        .iter()
        .find_map(|sd| sd.rotation.as_ref().and_then(json_number))
        .map(|r| r.round() as i32)
        .unwrap_or(0)
}

/// Output duration re-probe; `None` when the file cannot be probed.
pub fn get_duration(ctx: &ConversionContext, path: &Path) -> Option<f64> {
    let args = vec![
        "-v".to_string(),
        "quiet".to_string(),
        "-show_entries".to_string(),
        "format=duration".to_string(),
        "-of".to_string(),
        "default=noprint_wrappers=1:nokey=1".to_string(),
        safe_path_arg(path).into_owned(),
    ];
    let output = ctx.run("ffprobe", &args);
    if output.success {
        output.stdout.trim().parse::<f64>().ok()
    } else {
        None
    }
}

const FALLBACK_FRAME_RATE: f64 = 24.0;

pub fn parse_frame_rate(s: &str) -> f64 {
    if s.contains('/') {
        let parts: Vec<&str> = s.split('/').collect();
        if parts.len() == 2 {
            let num = parts[0].parse::<f64>().unwrap_or(0.0);
            let den = parts[1].parse::<f64>().unwrap_or(0.0);
            if den > 0.0 {
                let rate = num / den;
                if rate > 0.0 {
                    return rate;
                }
            }
        }
    }
    match s.parse::<f64>() {
        Ok(v) if v > 0.0 => v,
        _ => {
            if !s.is_empty() && s != "0" && s != "0/1" {
                tracing::warn!("⚠️ [ffprobe] Failed to parse frame rate '{}', using fallback {}fps", s, FALLBACK_FRAME_RATE);
            }
            FALLBACK_FRAME_RATE
        }
    }
}
