//! Still-image dimension probe via ImageMagick `identify`

use crate::command_runner::ConversionContext;
use crate::errors::{ConvertError, Result};
use crate::path_safety::safe_path_arg;
use std::path::Path;

/// Stored pixel dimensions of the first frame.
pub fn probe_image_dimensions(ctx: &ConversionContext, path: &Path) -> Result<(u32, u32)> {
    let args = vec![
        "identify".to_string(),
        "-format".to_string(),
        "%w %h".to_string(),
        // first frame only (GIF, multi-page TIFF)
        format!("{}[0]", safe_path_arg(path)),
    ];
    let output = ctx.run("magick", &args);
    if !output.success {
        return Err(ConvertError::ProbeFailure(format!(
            "identify failed for '{}': {}",
            path.display(),
            output.error_summary()
        )));
    }
    parse_dimensions(&output.stdout).ok_or_else(|| {
        ConvertError::ProbeFailure(format!(
            "unexpected identify output for '{}': {:?}",
            path.display(),
            output.stdout.trim()
        ))
    })
}

fn parse_dimensions(s: &str) -> Option<(u32, u32)> {
    let mut parts = s.split_whitespace();
    let w = parts.next()?.parse::<u32>().ok()?;
    let h = parts.next()?.parse::<u32>().ok()?;
    (w > 0 && h > 0).then_some((w, h))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command_runner::{CommandOutput, FnRunner};
    use std::sync::Arc;

    #[test]
    fn test_parse_dimensions() {
        assert_eq!(parse_dimensions("4032 3024"), Some((4032, 3024)));
        assert_eq!(parse_dimensions(" 10 20\n"), Some((10, 20)));
        assert_eq!(parse_dimensions("0 20"), None);
        assert_eq!(parse_dimensions("abc"), None);
        assert_eq!(parse_dimensions(""), None);
    }

    #[test]
    fn test_probe_uses_first_frame() {
        let ctx = ConversionContext::new(Arc::new(FnRunner(|program: &str, args: &[String]| {
            assert_eq!(program, "magick");
            assert_eq!(args[0], "identify");
            assert!(args[3].ends_with("anim.gif[0]"));
            CommandOutput::ok("320 240")
        })));
        assert_eq!(probe_image_dimensions(&ctx, Path::new("anim.gif")).unwrap(), (320, 240));
    }

    #[test]
    fn test_probe_failure_maps_to_probe_error() {
        let ctx = ConversionContext::new(Arc::new(FnRunner(|_: &str, _: &[String]| {
            CommandOutput::failed("identify: no decode delegate")
        })));
        assert!(matches!(
            probe_image_dimensions(&ctx, Path::new("x.heic")),
            Err(ConvertError::ProbeFailure(_))
        ));
    }
}
