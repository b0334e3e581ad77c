//! iPhone HEIC gain maps via libheif, headroom via exiftool MakerNotes.

use super::{HdrBundle, HdrReconstructor};
use image::{GrayImage, Luma, RgbImage};
use libheif_rs::{AuxiliaryImagesFilter, ColorSpace, HeifContext, ImageHandle, LibHeif, RgbChroma};
use shared_utils::{safe_path_arg, ConversionContext, ConvertError, Result};
use std::path::Path;
use tracing::debug;

pub const GAIN_MAP_AUX_TYPE: &str = "urn:com:apple:photo:2020:aux:hdrgainmap";

#[derive(Debug, Default, Clone, Copy)]
pub struct AppleGainMap;

impl HdrReconstructor for AppleGainMap {
    fn has_gain_map(&self, path: &Path) -> bool {
        let Ok(ctx) = HeifContext::read_from_file(path.to_string_lossy().as_ref()) else {
            return false;
        };
        let Ok(handle) = ctx.primary_image_handle() else {
            return false;
        };
        find_gain_map(&handle).is_some()
    }

    fn read_bundle(&self, ctx: &ConversionContext, path: &Path) -> Result<HdrBundle> {
        let headroom = read_headroom(ctx, path)?;

        let lib_heif = LibHeif::new();
        let heif = HeifContext::read_from_file(path.to_string_lossy().as_ref())
            .map_err(|e| ConvertError::ProbeFailure(format!("Failed to read HEIC: {}", e)))?;
        let handle = heif
            .primary_image_handle()
            .map_err(|e| ConvertError::ProbeFailure(format!("Failed to get primary image: {}", e)))?;
        let gain_handle = find_gain_map(&handle).ok_or_else(|| {
            ConvertError::ProbeFailure(format!("{}: no gain map", path.display()))
        })?;

        let base = decode_rgb(&lib_heif, &handle)?;
        let gain_rgb = decode_rgb(&lib_heif, &gain_handle)?;
        let gain_map = GrayImage::from_fn(gain_rgb.width(), gain_rgb.height(), |x, y| {
            Luma([gain_rgb.get_pixel(x, y).0[0]])
        });

        debug!(
            path = %path.display(),
            base = ?base.dimensions(),
            gain = ?gain_map.dimensions(),
            headroom,
            "Decoded gain-map bundle"
        );

        Ok(HdrBundle {
            base,
            gain_map,
            headroom,
        })
    }
}

fn find_gain_map(handle: &ImageHandle) -> Option<ImageHandle> {
    let filter = AuxiliaryImagesFilter::new();
    handle.auxiliary_images(filter).into_iter().find(|aux| {
        aux.auxiliary_type()
            .map(|t| t == GAIN_MAP_AUX_TYPE)
            .unwrap_or(false)
    })
}

/// Interleaved 8-bit RGB decode. Rows are copied one by one since libheif pads
/// each row to `stride` bytes.
fn decode_rgb(lib_heif: &LibHeif, handle: &ImageHandle) -> Result<RgbImage> {
    let decoded = lib_heif
        .decode(handle, ColorSpace::Rgb(RgbChroma::Rgb), None)
        .map_err(|e| ConvertError::ProbeFailure(format!("Failed to decode HEIC: {}", e)))?;
    let planes = decoded.planes();
    let plane = planes
        .interleaved
        .ok_or_else(|| ConvertError::ProbeFailure("No RGB plane found".to_string()))?;

    let (width, height) = (plane.width, plane.height);
    let row_bytes = width as usize * 3;
    if plane.stride < row_bytes {
        return Err(ConvertError::ProbeFailure(format!(
            "stride {} shorter than row {}",
            plane.stride, row_bytes
        )));
    }

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in plane.data.chunks(plane.stride).take(height as usize) {
        let row = row
            .get(..row_bytes)
            .ok_or_else(|| ConvertError::ProbeFailure("truncated RGB plane".to_string()))?;
        pixels.extend_from_slice(row);
    }

    RgbImage::from_raw(width, height, pixels)
        .ok_or_else(|| ConvertError::ProbeFailure("Failed to create RGB image".to_string()))
}

fn read_headroom(ctx: &ConversionContext, path: &Path) -> Result<f32> {
    let args = vec![
        "-j".to_string(),
        "-n".to_string(),
        "-HDRHeadroom".to_string(),
        "-HDRGain".to_string(),
        safe_path_arg(path).into_owned(),
    ];
    let output = ctx.run("exiftool", &args);
    if !output.success {
        return Err(ConvertError::ProbeFailure(format!(
            "exiftool headroom read failed: {}",
            output.error_summary()
        )));
    }
    parse_headroom_json(&output.stdout)
}

/// Parse `exiftool -j -n -HDRHeadroom -HDRGain` output.
pub fn parse_headroom_json(json: &str) -> Result<f32> {
    let value: serde_json::Value = serde_json::from_str(json)
        .map_err(|e| ConvertError::ProbeFailure(format!("exiftool JSON: {}", e)))?;
    let entry = value
        .get(0)
        .ok_or_else(|| ConvertError::ProbeFailure("exiftool returned no entries".to_string()))?;

    let tag = |name: &str| {
        entry.get(name).and_then(|v| v.as_f64()).ok_or_else(|| {
            ConvertError::ProbeFailure(format!("MakerNotes tag {} missing", name))
        })
    };
    Ok(apple_headroom(tag("HDRHeadroom")?, tag("HDRGain")?))
}

/// Linear headroom from Apple MakerNotes tags 0x0021 (`maker33`) and 0x0030 (`maker48`).
pub fn apple_headroom(maker33: f64, maker48: f64) -> f32 {
    let stops = if maker33 < 1.0 {
        if maker48 <= 0.01 {
            -20.0 * maker48 + 1.8
        } else {
            -0.101 * maker48 + 1.601
        }
    } else if maker48 <= 0.01 {
        -70.0 * maker48 + 3.0
    } else {
        -0.303 * maker48 + 2.303
    };
    2f64.powf(stops.max(0.0)) as f32
}
