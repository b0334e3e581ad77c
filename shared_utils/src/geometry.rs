//! Geometry Calculator
//!
//! Bounded target resolution for an encode: aspect ratio preserved, both sides even,
//! area never above the cap. Rotation only matters for odd multiples of 90°, where
//! the displayed frame is transposed relative to the stored pixels.

use crate::errors::{ConvertError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizePlan {
    pub apply: bool,
    /// Display-oriented width (after rotation correction)
    pub target_width: u32,
    /// Display-oriented height (after rotation correction)
    pub target_height: u32,
    /// True when the stored frame is transposed relative to the displayed one
    pub swapped: bool,
}

impl ResizePlan {
    /// Target size in stored (pre-rotation) orientation, as seen by a filter that
    /// runs before any display-matrix rotation.
    pub fn stored_dimensions(&self) -> (u32, u32) {
        if self.swapped {
            (self.target_height, self.target_width)
        } else {
            (self.target_width, self.target_height)
        }
    }
}

/// True for ±90°, ±270° and equivalents. Non-cardinal angles get no correction.
pub fn is_transposing_rotation(rotation: i32) -> bool {
    rotation.rem_euclid(180) == 90
}

pub fn plan(width: i64, height: i64, rotation: i32, cap: u64) -> Result<ResizePlan> {
    if width <= 0 || height <= 0 {
        return Err(ConvertError::InvalidGeometry(format!(
            "non-positive dimensions {}x{}",
            width, height
        )));
    }
    if cap == 0 {
        return Err(ConvertError::InvalidGeometry("resolution cap is zero".into()));
    }

    let swapped = is_transposing_rotation(rotation);
    let (w, h) = if swapped { (height, width) } else { (width, height) };
    let (w, h) = (w as u64, h as u64);

    let resolution = w.saturating_mul(h);
    if resolution <= cap {
        return Ok(ResizePlan {
            apply: false,
            target_width: w as u32,
            target_height: h as u32,
            swapped,
        });
    }

    let scale = (cap as f64 / resolution as f64).sqrt();
    let mut tw = even_floor(w as f64 * scale);
    let mut th = even_floor(h as f64 * scale);

    // sqrt rounding can land one step above the cap
    while tw > 0 && th > 0 && tw * th > cap {
        if tw >= th {
            tw -= 2;
        } else {
            th -= 2;
        }
    }

    if tw == 0 || th == 0 {
        return Err(ConvertError::InvalidGeometry(format!(
            "{}x{} cannot be reduced to even dimensions within {} pixels",
            w, h, cap
        )));
    }

    Ok(ResizePlan {
        apply: true,
        target_width: tw as u32,
        target_height: th as u32,
        swapped,
    })
}

fn even_floor(v: f64) -> u64 {
    ((v / 2.0).floor() as u64) * 2
}
