//! Video Conversion API Module
//!
//! One video in, one AV1/Opus `.mp4` out:
//! - skip when the mirrored `.mp4` already exists and is non-empty
//! - probe stored size, rotation, duration and frame rate
//! - rewrite the encoder template (speed preset, stale rotate tags, Live Photo CRF)
//! - encode with `-noautorotate`, scaling in stored orientation
//! - reject outputs whose duration drifts more than 2 s from the source

use regex::Regex;
use shared_utils::config::{
    DEFAULT_MAX_FRAMERATE, DEFAULT_VIDEO_ARGS, DURATION_TOLERANCE_SECS, LIVE_PHOTO_CRF_OFFSET,
    MAX_AV1_CRF, VIDEO_CONTAINER_EXTENSION,
};
use shared_utils::metadata::cleanup_exiftool_backup;
use shared_utils::{
    finalize_success, get_duration, is_nonempty_file, mirrored_output, plan, probe_video,
    remove_partial, safe_path_arg, ConversionContext, ConversionOutcome, ConversionRequest,
    ResizePlan, VideoOptions, VideoProbe,
};
use std::path::Path;
use std::sync::OnceLock;
use tracing::{debug, info, warn};

/// `-metadata:s:v`, `-metadata:s:v:0`, ...
fn is_video_stream_metadata_flag(token: &str) -> bool {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^-metadata:s:v(:\d+)?$").ok())
        .as_ref()
        .map_or(false, |re| re.is_match(token))
}

pub fn default_video_options() -> VideoOptions {
    VideoOptions {
        args_template: DEFAULT_VIDEO_ARGS.to_string(),
        max_framerate: DEFAULT_MAX_FRAMERATE,
    }
}

pub fn convert_video(request: &ConversionRequest, ctx: &ConversionContext) -> ConversionOutcome {
    let source = &request.file.path;
    let output = mirrored_output(
        &request.target_root,
        &request.file.relative,
        VIDEO_CONTAINER_EXTENSION,
    );

    if request.skip_existing && is_nonempty_file(&output) {
        debug!("⏭️ Output exists: {}", output.display());
        cleanup_exiftool_backup(&output);
        return ConversionOutcome::SkippedExisting(output);
    }

    let probe = match probe_video(ctx, source) {
        Ok(p) => p,
        Err(e) => {
            warn!("❌ Cannot probe {}: {}", source.display(), e);
            return ConversionOutcome::FailedProbe(e.to_string());
        }
    };
    let resize = match plan(
        probe.width as i64,
        probe.height as i64,
        probe.rotation,
        request.max_resolution,
    ) {
        Ok(p) => p,
        Err(e) => return ConversionOutcome::FailedProbe(e.to_string()),
    };

    if let Some(parent) = output.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            return ConversionOutcome::FailedEncode(format!(
                "cannot create {}: {}",
                parent.display(),
                e
            ));
        }
    }

    let default_options;
    let options = match &request.video {
        Some(o) => o,
        None => {
            default_options = default_video_options();
            &default_options
        }
    };
    let live_photo = request.file.live_photo;
    if live_photo {
        info!("📸 Live Photo motion clip: {}", source.display());
    }

    let args = build_ffmpeg_args(request, options, &probe, &resize, live_photo, &output);
    if let Err(e) = ctx.run_to_output("ffmpeg", &args, &output) {
        warn!("❌ {}", e);
        return ConversionOutcome::FailedEncode(e.to_string());
    }

    let output_secs = get_duration(ctx, &output).unwrap_or(0.0);
    if probe.duration > 0.0 && (probe.duration - output_secs).abs() > DURATION_TOLERANCE_SECS {
        warn!(
            "❌ Duration mismatch for {}: source {:.2}s, output {:.2}s",
            source.display(),
            probe.duration,
            output_secs
        );
        remove_partial(&output);
        return ConversionOutcome::FailedIntegrityCheck {
            source_secs: probe.duration,
            output_secs,
        };
    }

    finalize_success(ctx, request, output)
}

/// Full ffmpeg argument list, input to output.
pub fn build_ffmpeg_args(
    request: &ConversionRequest,
    options: &VideoOptions,
    probe: &VideoProbe,
    resize: &ResizePlan,
    live_photo: bool,
    output: &Path,
) -> Vec<String> {
    let mut args = vec![
        "-y".to_string(),
        "-noautorotate".to_string(),
        "-i".to_string(),
        safe_path_arg(&request.file.path).into_owned(),
    ];

    let mut encoder = rewrite_video_args(&options.args_template, request.speed);
    if live_photo {
        raise_crf(&mut encoder, LIVE_PHOTO_CRF_OFFSET);
    }
    args.extend(encoder);

    if probe.frame_rate > options.max_framerate as f64 {
        args.push("-r".to_string());
        args.push(options.max_framerate.to_string());
    }

    if resize.apply {
        // frames stay in stored orientation under -noautorotate
        let (w, h) = resize.stored_dimensions();
        args.push("-vf".to_string());
        args.push(format!("scale={}:{}", w, h));
    }

    args.push(safe_path_arg(output).into_owned());
    args
}

/// Split the template, drop `-metadata:s:v rotate=...` pairs and force the
/// `-preset` value to `speed` (appended when the template has none).
pub fn rewrite_video_args(template: &str, speed: u8) -> Vec<String> {
    let tokens: Vec<&str> = template.split_whitespace().collect();
    let mut args = Vec::with_capacity(tokens.len() + 2);
    let mut has_preset = false;

    let mut i = 0;
    while i < tokens.len() {
        let token = tokens[i];
        let next = tokens.get(i + 1).copied();

        if is_video_stream_metadata_flag(token) && next.map_or(false, |v| v.starts_with("rotate")) {
            i += 2;
            continue;
        }
        if token == "-preset" {
            has_preset = true;
            args.push(token.to_string());
            args.push(speed.to_string());
            i += if next.is_some() { 2 } else { 1 };
            continue;
        }
        args.push(token.to_string());
        i += 1;
    }

    if !has_preset {
        args.push("-preset".to_string());
        args.push(speed.to_string());
    }
    args
}

/// Add `offset` to the `-crf` value, capped at the AV1 maximum. No-op without `-crf`.
pub fn raise_crf(args: &mut [String], offset: u32) {
    let Some(pos) = args.iter().position(|a| a == "-crf") else {
        return;
    };
    let Some(value) = args.get_mut(pos + 1) else {
        return;
    };
    match value.parse::<u32>() {
        Ok(crf) => *value = (crf + offset).min(MAX_AV1_CRF).to_string(),
        Err(_) => warn!("⚠️ Non-integer -crf value left unchanged: {}", value),
    }
}
