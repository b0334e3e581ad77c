//! External tools detection
//!
//! Pre-flight check run once before any file is touched.

use crate::errors::{ConvertError, Result};

pub const REQUIRED_TOOLS: &[&str] = &["ffmpeg", "ffprobe", "exiftool", "magick"];
/// Needed only for the Apple HDR branch.
pub const HDR_TOOLS: &[&str] = &["avifenc"];

pub fn is_tool_available(tool: &str) -> bool {
    which::which(tool).is_ok()
}

pub fn missing_tools(keep_apple_hdr: bool) -> Vec<&'static str> {
    let hdr: &[&str] = if keep_apple_hdr { HDR_TOOLS } else { &[] };
    REQUIRED_TOOLS
        .iter()
        .chain(hdr.iter())
        .copied()
        .filter(|t| !is_tool_available(t))
        .collect()
}

pub fn check_required_tools(keep_apple_hdr: bool) -> Result<()> {
    let missing = missing_tools(keep_apple_hdr);
    if missing.is_empty() {
        return Ok(());
    }
    for tool in &missing {
        tracing::error!("❌ Required tool not found in PATH: {}", tool);
    }
    Err(ConvertError::ToolNotFound(missing.join(", ")))
}
