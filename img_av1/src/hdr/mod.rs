//! Apple HDR gain-map reconstruction
//!
//! iPhone HEIC photos carry an 8-bit SDR base image plus a monochrome gain map
//! (auxiliary image `urn:com:apple:photo:2020:aux:hdrgainmap`). The HDR rendition is
//!
//! ```text
//! hdr_linear = base_linear * (1 + (headroom - 1) * gain_linear)
//! ```
//!
//! where `headroom` comes from two Apple MakerNotes tags. The result is scaled to
//! reference white, PQ-encoded, and handed to avifenc as a 16-bit PNG.

mod apple;

pub use apple::{apple_headroom, AppleGainMap};

use image::{GrayImage, Rgb32FImage, RgbImage};
use shared_utils::{ConversionContext, Result};
use std::path::Path;

/// Decoded inputs of the HDR reconstruction.
#[derive(Debug, Clone)]
pub struct HdrBundle {
    /// SDR base rendition, sRGB-encoded
    pub base: RgbImage,
    /// Gain map, sRGB-encoded, possibly smaller than `base`
    pub gain_map: GrayImage,
    /// Linear peak multiplier, always >= 1
    pub headroom: f32,
}

/// Detection, decoding and reconstruction of gain-map HDR photos.
///
/// Every failure is recoverable: the image pipeline falls back to the standard
/// SDR encode.
pub trait HdrReconstructor: Send + Sync {
    /// True when `path` carries a gain map this reconstructor understands.
    fn has_gain_map(&self, path: &Path) -> bool;

    fn read_bundle(&self, ctx: &ConversionContext, path: &Path) -> Result<HdrBundle>;

    /// Relative linear light, 1.0 = SDR white.
    fn reconstruct_linear(&self, bundle: &HdrBundle) -> Result<Rgb32FImage> {
        Ok(apply_gain_map(bundle))
    }

    /// Scale relative linear light to `reference_white` nits and PQ-encode in place.
    fn encode_pq(&self, mut linear: Rgb32FImage, reference_white: f32) -> Rgb32FImage {
        for value in linear.iter_mut() {
            *value = pq_inverse_eotf(*value * reference_white);
        }
        linear
    }
}

/// Reconstructor used when `--keep-apple-hdr` is off: nothing is ever detected.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHdr;

impl HdrReconstructor for NoHdr {
    fn has_gain_map(&self, _path: &Path) -> bool {
        false
    }

    fn read_bundle(&self, _ctx: &ConversionContext, path: &Path) -> Result<HdrBundle> {
        Err(shared_utils::ConvertError::ProbeFailure(format!(
            "no HDR reconstructor for {}",
            path.display()
        )))
    }
}

/// sRGB EOTF, input and output in 0..=1.
pub fn srgb_to_linear(v: f32) -> f32 {
    if v <= 0.04045 {
        v / 12.92
    } else {
        ((v + 0.055) / 1.055).powf(2.4)
    }
}

// SMPTE ST 2084 constants
const PQ_M1: f32 = 2610.0 / 16384.0;
const PQ_M2: f32 = 2523.0 / 4096.0 * 128.0;
const PQ_C1: f32 = 3424.0 / 4096.0;
const PQ_C2: f32 = 2413.0 / 4096.0 * 32.0;
const PQ_C3: f32 = 2392.0 / 4096.0 * 32.0;
const PQ_PEAK_NITS: f32 = 10000.0;

/// PQ inverse EOTF: absolute luminance in nits to a 0..=1 signal.
pub fn pq_inverse_eotf(nits: f32) -> f32 {
    let y = (nits / PQ_PEAK_NITS).clamp(0.0, 1.0);
    let ym1 = y.powf(PQ_M1);
    ((PQ_C1 + PQ_C2 * ym1) / (1.0 + PQ_C3 * ym1)).powf(PQ_M2)
}

/// Gain-map formula over the whole image. The gain map is bilinearly upscaled
/// to the base size first.
pub fn apply_gain_map(bundle: &HdrBundle) -> Rgb32FImage {
    let (width, height) = bundle.base.dimensions();
    let gain = if bundle.gain_map.dimensions() == (width, height) {
        bundle.gain_map.clone()
    } else {
        image::imageops::resize(
            &bundle.gain_map,
            width,
            height,
            image::imageops::FilterType::Triangle,
        )
    };

    let boost = bundle.headroom.max(1.0) - 1.0;
    let lut: Vec<f32> = (0..=255u8).map(|v| srgb_to_linear(v as f32 / 255.0)).collect();

    let mut out = Rgb32FImage::new(width, height);
    for ((dst, base), g) in out.pixels_mut().zip(bundle.base.pixels()).zip(gain.pixels()) {
        let factor = 1.0 + boost * lut[g.0[0] as usize];
        for c in 0..3 {
            dst.0[c] = lut[base.0[c] as usize] * factor;
        }
    }
    out
}
