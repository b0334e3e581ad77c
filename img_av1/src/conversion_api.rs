//! Conversion API Module
//!
//! One still image in, one AVIF (or WebP fallback) out:
//!
//! 1. skip when a non-empty `.avif` / `.webp` already exists at the mirrored path
//! 2. probe dimensions, plan a bounded even resize
//! 3. Apple gain-map HEIC → PQ AVIF via avifenc (only with `keep_apple_hdr`)
//! 4. otherwise ImageMagick AVIF, retried as WebP on failure
//! 5. metadata copy, optional deletion of the original

use crate::hdr::HdrReconstructor;
use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageFormat};
use shared_utils::config::{is_heif_extension, REFERENCE_WHITE_NITS};
use shared_utils::metadata::cleanup_exiftool_backup;
use shared_utils::{
    finalize_success, is_nonempty_file, mirrored_output, plan, probe_image_dimensions,
    remove_partial, safe_path_arg, ConversionContext, ConversionOutcome, ConversionRequest,
    ConvertError, ResizePlan, Result,
};
use std::path::Path;
use tracing::{debug, info, warn};

pub const AVIF_EXTENSION: &str = "avif";
pub const WEBP_EXTENSION: &str = "webp";

/// CICP for the HDR output: Display P3 primaries, PQ transfer, BT.601 matrix.
pub const HDR_CICP: &str = "12/16/6";

pub fn convert_image(
    request: &ConversionRequest,
    ctx: &ConversionContext,
    hdr: &dyn HdrReconstructor,
) -> ConversionOutcome {
    let source = &request.file.path;
    let avif_path = mirrored_output(&request.target_root, &request.file.relative, AVIF_EXTENSION);
    let webp_path = mirrored_output(&request.target_root, &request.file.relative, WEBP_EXTENSION);

    if request.skip_existing {
        for existing in [&avif_path, &webp_path] {
            if is_nonempty_file(existing) {
                debug!("⏭️ Output exists: {}", existing.display());
                cleanup_exiftool_backup(existing);
                return ConversionOutcome::SkippedExisting(existing.clone());
            }
        }
    }

    let resize = match probe_image_dimensions(ctx, source)
        .and_then(|(w, h)| plan(w as i64, h as i64, 0, request.max_resolution))
    {
        Ok(p) => p,
        Err(e) => {
            warn!("❌ Cannot probe {}: {}", source.display(), e);
            return ConversionOutcome::FailedProbe(e.to_string());
        }
    };

    if let Some(parent) = avif_path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            return ConversionOutcome::FailedEncode(format!(
                "cannot create {}: {}",
                parent.display(),
                e
            ));
        }
    }

    if request.keep_apple_hdr
        && is_heif_extension(&request.file.extension)
        && hdr.has_gain_map(source)
    {
        match encode_hdr(request, ctx, hdr, &resize, &avif_path) {
            Ok(()) => {
                info!("🌈 HDR gain map preserved: {}", source.display());
                remove_stale(&webp_path);
                return finalize_success(ctx, request, avif_path);
            }
            Err(e) => warn!(
                "⚠️ HDR reconstruction failed for {}, falling back to SDR: {}",
                source.display(),
                e
            ),
        }
    }

    match encode_standard(request, ctx, &resize, &avif_path) {
        Ok(()) => {
            remove_stale(&webp_path);
            return finalize_success(ctx, request, avif_path);
        }
        Err(e) => warn!("⚠️ AVIF encode failed for {}, trying WebP: {}", source.display(), e),
    }

    match encode_standard(request, ctx, &resize, &webp_path) {
        Ok(()) => {
            remove_stale(&avif_path);
            finalize_success(ctx, request, webp_path)
        }
        Err(e) => {
            warn!("❌ WebP fallback failed for {}: {}", source.display(), e);
            ConversionOutcome::FailedEncode(e.to_string())
        }
    }
}

/// ImageMagick arguments for both the AVIF attempt and the WebP retry.
pub fn magick_args(request: &ConversionRequest, resize: &ResizePlan, output: &Path) -> Vec<String> {
    let mut args = vec![safe_path_arg(&request.file.path).into_owned()];
    if resize.apply {
        args.push("-resize".to_string());
        // '!' forces the exact even size instead of preserving the ratio again
        args.push(format!("{}x{}!", resize.target_width, resize.target_height));
    }
    args.extend([
        "-quality".to_string(),
        request.quality.to_string(),
        "-define".to_string(),
        format!("heic:speed={}", request.speed),
        "-depth".to_string(),
        "10".to_string(),
        safe_path_arg(output).into_owned(),
    ]);
    args
}

fn encode_standard(
    request: &ConversionRequest,
    ctx: &ConversionContext,
    resize: &ResizePlan,
    output: &Path,
) -> Result<()> {
    ctx.run_to_output("magick", &magick_args(request, resize, output), output)
}

/// Gain map → linear HDR → PQ → 16-bit PNG → avifenc.
fn encode_hdr(
    request: &ConversionRequest,
    ctx: &ConversionContext,
    hdr: &dyn HdrReconstructor,
    resize: &ResizePlan,
    output: &Path,
) -> Result<()> {
    let linear = {
        let bundle = hdr.read_bundle(ctx, &request.file.path)?;
        hdr.reconstruct_linear(&bundle)?
    };
    let mut pq = hdr.encode_pq(linear, REFERENCE_WHITE_NITS);
    if resize.apply {
        pq = imageops::resize(
            &pq,
            resize.target_width,
            resize.target_height,
            FilterType::Lanczos3,
        );
    }
    let png16 = DynamicImage::ImageRgb32F(pq).into_rgb16();

    let staging_dir = output.parent().unwrap_or_else(|| Path::new("."));
    let staging = tempfile::Builder::new()
        .prefix(".hdr_")
        .suffix(".png")
        .tempfile_in(staging_dir)?;
    png16
        .save_with_format(staging.path(), ImageFormat::Png)
        .map_err(|e| ConvertError::EncodeFailure(format!("16-bit PNG staging: {}", e)))?;

    let args = avifenc_hdr_args(request, staging.path(), output);
    let result = ctx.run_to_output("avifenc", &args, output);
    // NamedTempFile removes the staging PNG on drop
    drop(staging);
    result
}

pub fn avifenc_hdr_args(request: &ConversionRequest, input_png: &Path, output: &Path) -> Vec<String> {
    vec![
        "--depth".to_string(),
        "10".to_string(),
        "--cicp".to_string(),
        HDR_CICP.to_string(),
        "--speed".to_string(),
        request.speed.to_string(),
        "-q".to_string(),
        request.quality.to_string(),
        safe_path_arg(input_png).into_owned(),
        safe_path_arg(output).into_owned(),
    ]
}

/// A re-encode must leave exactly one output per source.
fn remove_stale(other: &Path) {
    if other.exists() {
        remove_partial(other);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hdr::{HdrBundle, NoHdr};
    use image::{GrayImage, Luma, Rgb, RgbImage};
    use shared_utils::{CommandOutput, FnRunner, MediaFile};
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        source_root: PathBuf,
        target_root: PathBuf,
    }

    fn fixture(relative: &str) -> (Fixture, ConversionRequest) {
        let dir = TempDir::new().unwrap();
        let source_root = dir.path().join("src");
        let target_root = dir.path().join("dst");
        let path = source_root.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"source image bytes").unwrap();
        let file = MediaFile::classify(&source_root, &path).unwrap();
        let request = ConversionRequest {
            file,
            target_root: target_root.clone(),
            quality: 75,
            max_resolution: 4032 * 3024,
            speed: 4,
            delete_original: false,
            keep_apple_hdr: false,
            skip_existing: true,
            video: None,
        };
        (
            Fixture {
                _dir: dir,
                source_root,
                target_root,
            },
            request,
        )
    }

    type Calls = Arc<Mutex<Vec<(String, Vec<String>)>>>;

    /// identify answers `dims`; encoders write their last argument unless the
    /// output extension is listed in `failing`.
    fn fake_ctx(dims: &'static str, failing: &'static [&'static str]) -> (ConversionContext, Calls) {
        let calls: Calls = Arc::new(Mutex::new(Vec::new()));
        let log = calls.clone();
        let runner = FnRunner(move |program: &str, args: &[String]| {
            log.lock().unwrap().push((program.to_string(), args.to_vec()));
            match program {
                "magick" if args[0] == "identify" => CommandOutput::ok(dims),
                "magick" | "avifenc" => {
                    let out = PathBuf::from(args.last().unwrap());
                    std::fs::write(&out, b"partial").unwrap();
                    let ext = out.extension().unwrap().to_str().unwrap().to_string();
                    if failing.iter().any(|f| *f == ext || *f == program) {
                        CommandOutput::failed("encoder exploded")
                    } else {
                        std::fs::write(&out, b"encoded output").unwrap();
                        CommandOutput::ok("")
                    }
                }
                "exiftool" => CommandOutput::ok("[]"),
                _ => CommandOutput::failed("unexpected tool"),
            }
        });
        (ConversionContext::new(Arc::new(runner)), calls)
    }

    fn encoder_calls(calls: &Calls, program: &str) -> Vec<Vec<String>> {
        calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(p, a)| p == program && a.first().map(String::as_str) != Some("identify"))
            .map(|(_, a)| a.clone())
            .collect()
    }

    #[test]
    fn test_avif_success_mirrors_layout() {
        let (fx, request) = fixture("2021/trip/a.jpg");
        let (ctx, calls) = fake_ctx("4000 3000", &[]);

        let outcome = convert_image(&request, &ctx, &NoHdr);
        let expected = fx.target_root.join("2021/trip/a.avif");
        assert_eq!(outcome, ConversionOutcome::Succeeded(expected.clone()));
        assert!(is_nonempty_file(&expected));
        assert!(fx.source_root.join("2021/trip/a.jpg").exists());

        let magick = encoder_calls(&calls, "magick");
        assert_eq!(magick.len(), 1);
        // within the cap: no resize
        assert!(!magick[0].contains(&"-resize".to_string()));
        assert!(magick[0].contains(&"heic:speed=4".to_string()));
    }

    #[test]
    fn test_resize_args_are_exact_even_size() {
        let (_fx, mut request) = fixture("big.png");
        request.max_resolution = 250_000;
        let (ctx, calls) = fake_ctx("1000 1000", &[]);

        assert!(convert_image(&request, &ctx, &NoHdr).is_success());
        let magick = encoder_calls(&calls, "magick");
        let pos = magick[0].iter().position(|a| a == "-resize").unwrap();
        assert_eq!(magick[0][pos + 1], "500x500!");
    }

    #[test]
    fn test_webp_fallback_leaves_no_avif() {
        let (fx, request) = fixture("a.jpg");
        let (ctx, calls) = fake_ctx("640 480", &["avif"]);

        let outcome = convert_image(&request, &ctx, &NoHdr);
        let webp = fx.target_root.join("a.webp");
        assert_eq!(outcome, ConversionOutcome::Succeeded(webp.clone()));
        assert!(is_nonempty_file(&webp));
        assert!(!fx.target_root.join("a.avif").exists());

        let magick = encoder_calls(&calls, "magick");
        assert_eq!(magick.len(), 2);
        // same parameters, only the container changes
        assert_eq!(magick[0][..magick[0].len() - 1], magick[1][..magick[1].len() - 1]);
    }

    #[test]
    fn test_both_encodes_fail_leave_nothing() {
        let (fx, request) = fixture("a.jpg");
        let (ctx, _) = fake_ctx("640 480", &["avif", "webp"]);

        let outcome = convert_image(&request, &ctx, &NoHdr);
        assert!(matches!(outcome, ConversionOutcome::FailedEncode(_)));
        assert!(!fx.target_root.join("a.avif").exists());
        assert!(!fx.target_root.join("a.webp").exists());
        assert!(fx.source_root.join("a.jpg").exists());
    }

    #[test]
    fn test_probe_failure() {
        let (fx, request) = fixture("2020/a.jpg");
        let encodes = Arc::new(AtomicUsize::new(0));
        let counter = encodes.clone();
        let ctx = ConversionContext::new(Arc::new(FnRunner(move |_: &str, args: &[String]| {
            if args[0] == "identify" {
                CommandOutput::failed("no decode delegate")
            } else {
                counter.fetch_add(1, Ordering::SeqCst);
                CommandOutput::ok("")
            }
        })));
        let outcome = convert_image(&request, &ctx, &NoHdr);
        assert!(matches!(outcome, ConversionOutcome::FailedProbe(_)));
        assert_eq!(encodes.load(Ordering::SeqCst), 0);
        // no empty directories left in the target tree
        assert!(!fx.target_root.exists());
    }

    #[test]
    fn test_existing_output_is_skipped_untouched() {
        for ext in ["avif", "webp"] {
            let (fx, request) = fixture("a.jpg");
            let existing = fx.target_root.join(format!("a.{}", ext));
            std::fs::create_dir_all(&fx.target_root).unwrap();
            std::fs::write(&existing, b"previous run").unwrap();

            let (ctx, calls) = fake_ctx("640 480", &[]);
            let outcome = convert_image(&request, &ctx, &NoHdr);
            assert_eq!(outcome, ConversionOutcome::SkippedExisting(existing.clone()));
            assert!(calls.lock().unwrap().is_empty());
            assert_eq!(std::fs::read(&existing).unwrap(), b"previous run");
        }
    }

    #[test]
    fn test_skip_removes_stray_exiftool_backup() {
        let (fx, request) = fixture("a.jpg");
        let existing = fx.target_root.join("a.avif");
        std::fs::create_dir_all(&fx.target_root).unwrap();
        std::fs::write(&existing, b"previous run").unwrap();
        let backup = shared_utils::path_safety::exiftool_backup_path(&existing);
        std::fs::write(&backup, b"left by a crash").unwrap();

        let (ctx, _) = fake_ctx("640 480", &[]);
        assert_eq!(
            convert_image(&request, &ctx, &NoHdr),
            ConversionOutcome::SkippedExisting(existing.clone())
        );
        assert!(!backup.exists());
        assert_eq!(std::fs::read(&existing).unwrap(), b"previous run");
    }

    #[test]
    fn test_empty_output_is_not_skipped() {
        let (fx, request) = fixture("a.jpg");
        std::fs::create_dir_all(&fx.target_root).unwrap();
        std::fs::write(fx.target_root.join("a.avif"), b"").unwrap();
        let (ctx, _) = fake_ctx("640 480", &[]);
        assert!(convert_image(&request, &ctx, &NoHdr).is_success());
    }

    #[test]
    fn test_no_skip_existing_reencodes_and_drops_stale_webp() {
        let (fx, mut request) = fixture("a.jpg");
        request.skip_existing = false;
        std::fs::create_dir_all(&fx.target_root).unwrap();
        std::fs::write(fx.target_root.join("a.webp"), b"old fallback").unwrap();

        let (ctx, _) = fake_ctx("640 480", &[]);
        let outcome = convert_image(&request, &ctx, &NoHdr);
        assert_eq!(outcome, ConversionOutcome::Succeeded(fx.target_root.join("a.avif")));
        assert!(!fx.target_root.join("a.webp").exists());
    }

    #[test]
    fn test_delete_original_after_success() {
        let (fx, mut request) = fixture("a.jpg");
        request.delete_original = true;
        let (ctx, _) = fake_ctx("640 480", &[]);
        assert!(convert_image(&request, &ctx, &NoHdr).is_success());
        assert!(!fx.source_root.join("a.jpg").exists());
    }

    #[test]
    fn test_original_kept_on_failure() {
        let (fx, mut request) = fixture("a.jpg");
        request.delete_original = true;
        let (ctx, _) = fake_ctx("640 480", &["avif", "webp"]);
        assert!(convert_image(&request, &ctx, &NoHdr).is_failure());
        assert!(fx.source_root.join("a.jpg").exists());
    }

    struct StubHdr;

    impl HdrReconstructor for StubHdr {
        fn has_gain_map(&self, _path: &Path) -> bool {
            true
        }

        fn read_bundle(&self, _ctx: &ConversionContext, _path: &Path) -> Result<HdrBundle> {
            Ok(HdrBundle {
                base: RgbImage::from_pixel(8, 6, Rgb([200, 180, 160])),
                gain_map: GrayImage::from_pixel(4, 3, Luma([128])),
                headroom: 4.0,
            })
        }
    }

    #[test]
    fn test_hdr_branch_uses_avifenc() {
        let (fx, mut request) = fixture("IMG_0001.HEIC");
        request.keep_apple_hdr = true;
        let (ctx, calls) = fake_ctx("8 6", &[]);

        let outcome = convert_image(&request, &ctx, &StubHdr);
        let avif = fx.target_root.join("IMG_0001.avif");
        assert_eq!(outcome, ConversionOutcome::Succeeded(avif));

        let avifenc = encoder_calls(&calls, "avifenc");
        assert_eq!(avifenc.len(), 1);
        assert!(avifenc[0].windows(2).any(|w| w[0] == "--cicp" && w[1] == HDR_CICP));
        assert!(avifenc[0].windows(2).any(|w| w[0] == "--depth" && w[1] == "10"));
        assert!(encoder_calls(&calls, "magick").is_empty());

        // staging PNG is gone
        let leftovers: Vec<_> = std::fs::read_dir(&fx.target_root)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().map_or(false, |x| x == "png"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_hdr_failure_falls_back_to_standard() {
        let (fx, mut request) = fixture("IMG_0001.heic");
        request.keep_apple_hdr = true;
        let (ctx, calls) = fake_ctx("8 6", &["avifenc"]);

        let outcome = convert_image(&request, &ctx, &StubHdr);
        assert_eq!(outcome, ConversionOutcome::Succeeded(fx.target_root.join("IMG_0001.avif")));
        assert_eq!(encoder_calls(&calls, "magick").len(), 1);
    }

    #[test]
    fn test_hdr_ignored_without_flag_or_for_non_heif() {
        let (_fx, request) = fixture("IMG_0001.heic");
        let (ctx, calls) = fake_ctx("8 6", &[]);
        assert!(convert_image(&request, &ctx, &StubHdr).is_success());
        assert!(encoder_calls(&calls, "avifenc").is_empty());

        let (_fx, mut request) = fixture("photo.jpg");
        request.keep_apple_hdr = true;
        let (ctx, calls) = fake_ctx("8 6", &[]);
        assert!(convert_image(&request, &ctx, &StubHdr).is_success());
        assert!(encoder_calls(&calls, "avifenc").is_empty());
    }
}
