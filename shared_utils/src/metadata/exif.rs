//! ExifTool wrapper
//!
//! 🔥 视频元数据特殊处理：
//! - FFmpeg 转换后 QuickTime Create Date 会变成 0000:00:00 00:00:00
//! - 视频输出额外写入全部 QuickTime 日期标签（UTC 存储）

use super::provenance::DateSource;
use crate::command_runner::ConversionContext;
use crate::errors::{ConvertError, Result};
use crate::path_safety::safe_path_arg;
use chrono::{DateTime, FixedOffset};
use std::path::Path;

const EXIF_DATE_TAGS: &[(DateSource, &str)] = &[
    (DateSource::ExifDateTimeOriginal, "DateTimeOriginal"),
    (DateSource::ExifCreateDate, "CreateDate"),
    (DateSource::ExifModifyDate, "ModifyDate"),
];

const QUICKTIME_DATE_TAGS: &[&str] = &[
    "QuickTime:CreateDate",
    "QuickTime:ModifyDate",
    "QuickTime:TrackCreateDate",
    "QuickTime:TrackModifyDate",
    "QuickTime:MediaCreateDate",
    "QuickTime:MediaModifyDate",
];

/// Raw date strings present on `src`. Missing tool, bad JSON or absent tags
/// all yield an empty list.
///
/// QuickTime stores UTC; `QuickTimeUTC=1` makes exiftool return those dates
/// with an offset instead of a naive wall-clock value.
pub fn read_exif_dates(ctx: &ConversionContext, src: &Path) -> Vec<(DateSource, String)> {
    let mut args = vec![
        "-j".to_string(),
        "-api".to_string(),
        "QuickTimeUTC=1".to_string(),
    ];
    args.extend(EXIF_DATE_TAGS.iter().map(|(_, tag)| format!("-{}", tag)));
    args.push(safe_path_arg(src).into_owned());

    let output = ctx.run("exiftool", &args);
    if !output.success {
        tracing::debug!(file = %src.display(), "exiftool date read failed: {}", output.error_summary());
        return Vec::new();
    }

    let parsed: Vec<serde_json::Value> = match serde_json::from_str(&output.stdout) {
        Ok(v) => v,
        Err(e) => {
            tracing::debug!(file = %src.display(), "exiftool JSON parse error: {}", e);
            return Vec::new();
        }
    };
    let Some(tags) = parsed.into_iter().next() else {
        return Vec::new();
    };

    EXIF_DATE_TAGS
        .iter()
        .filter_map(|(source, tag)| {
            tags.get(*tag)
                .and_then(|v| v.as_str())
                .map(|s| (*source, s.to_string()))
        })
        .collect()
}

/// Copy every writable tag from `src` onto the existing `dst`.
///
/// No `-overwrite_original`: exiftool keeps `<dst>_original` until the caller's
/// cleanup, so a kill mid-write never loses the encoded file.
pub fn copy_all_tags(ctx: &ConversionContext, src: &Path, dst: &Path) -> Result<()> {
    let args = vec![
        "-tagsfromfile".to_string(),
        safe_path_arg(src).into_owned(),
        "-all:all".to_string(),
        "-api".to_string(),
        "LargeFileSupport=1".to_string(),
        "-q".to_string(),
        "-m".to_string(),
        safe_path_arg(dst).into_owned(),
    ];
    let output = ctx.run("exiftool", &args);
    if !output.success && !output.stderr.contains("Warning") {
        return Err(ConvertError::MetadataFailure(format!(
            "tag copy {} → {}: {}",
            src.display(),
            dst.display(),
            output.error_summary()
        )));
    }
    Ok(())
}

/// Force the resolved creation date onto `dst`. Video containers also get the
/// QuickTime date family.
pub fn write_creation_date(
    ctx: &ConversionContext,
    dst: &Path,
    date: DateTime<FixedOffset>,
    is_video: bool,
) -> Result<()> {
    let value = date.format("%Y:%m:%d %H:%M:%S%:z").to_string();

    let mut args: Vec<String> = EXIF_DATE_TAGS
        .iter()
        .map(|(_, tag)| format!("-{}={}", tag, value))
        .collect();
    if is_video {
        args.push("-api".to_string());
        args.push("QuickTimeUTC=1".to_string());
        args.extend(QUICKTIME_DATE_TAGS.iter().map(|tag| format!("-{}={}", tag, value)));
    }
    args.extend([
        "-overwrite_original".to_string(),
        "-q".to_string(),
        "-m".to_string(),
        safe_path_arg(dst).into_owned(),
    ]);

    let output = ctx.run("exiftool", &args);
    if !output.success && !output.stderr.contains("Warning") {
        return Err(ConvertError::MetadataFailure(format!(
            "date write {}: {}",
            dst.display(),
            output.error_summary()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command_runner::{CommandOutput, FnRunner};
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_read_exif_dates_collects_present_tags() {
        let ctx = ConversionContext::new(Arc::new(FnRunner(|_: &str, args: &[String]| {
            assert_eq!(args[0], "-j");
            assert!(args.contains(&"-DateTimeOriginal".to_string()));
            CommandOutput::ok(
                r#"[{"SourceFile": "a.jpg", "CreateDate": "2021:01:01 00:00:00", "ModifyDate": 5}]"#,
            )
        })));
        let dates = read_exif_dates(&ctx, Path::new("a.jpg"));
        assert_eq!(dates, vec![(DateSource::ExifCreateDate, "2021:01:01 00:00:00".to_string())]);
    }

    #[test]
    fn test_read_exif_dates_reads_quicktime_as_utc() {
        let seen = Arc::new(Mutex::new(Vec::<String>::new()));
        let seen_clone = Arc::clone(&seen);
        let ctx = ConversionContext::new(Arc::new(FnRunner(move |_: &str, args: &[String]| {
            seen_clone.lock().unwrap().extend(args.iter().cloned());
            CommandOutput::ok(r#"[{"CreateDate": "2022:01:02 02:00:00+00:00"}]"#)
        })));
        let dates = read_exif_dates(&ctx, Path::new("clip.mov"));

        let args = seen.lock().unwrap();
        let api = args.iter().position(|a| a == "-api").unwrap();
        assert_eq!(args[api + 1], "QuickTimeUTC=1");
        assert_eq!(args.last().map(String::as_str), Some("clip.mov"));

        let instant = crate::metadata::provenance::parse_exif_datetime(&dates[0].1).unwrap();
        let expected = DateTime::parse_from_rfc3339("2022-01-02T10:00:00+08:00").unwrap();
        assert_eq!(instant, expected);
    }

    #[test]
    fn test_read_exif_dates_bad_output() {
        let ctx = ConversionContext::new(Arc::new(FnRunner(|_: &str, _: &[String]| {
            CommandOutput::ok("not json")
        })));
        assert!(read_exif_dates(&ctx, Path::new("a.jpg")).is_empty());
    }

    #[test]
    fn test_write_creation_date_video_tags() {
        let seen = Arc::new(Mutex::new(Vec::<String>::new()));
        let seen_clone = Arc::clone(&seen);
        let ctx = ConversionContext::new(Arc::new(FnRunner(move |_: &str, args: &[String]| {
            seen_clone.lock().unwrap().extend(args.iter().cloned());
            CommandOutput::ok("")
        })));
        let date = DateTime::parse_from_rfc3339("2022-01-02T03:04:05+08:00").unwrap();
        write_creation_date(&ctx, Path::new("out.mp4"), date, true).unwrap();

        let args = seen.lock().unwrap();
        assert!(args.contains(&"-DateTimeOriginal=2022:01:02 03:04:05+08:00".to_string()));
        assert!(args.contains(&"-QuickTime:MediaCreateDate=2022:01:02 03:04:05+08:00".to_string()));
        assert!(args.contains(&"QuickTimeUTC=1".to_string()));
        assert!(args.contains(&"-overwrite_original".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("out.mp4"));
    }

    #[test]
    fn test_copy_all_tags_failure_is_metadata_error() {
        let ctx = ConversionContext::new(Arc::new(FnRunner(|_: &str, _: &[String]| {
            CommandOutput::failed("Error: File not found")
        })));
        let err = copy_all_tags(&ctx, Path::new("a.jpg"), Path::new("a.avif")).unwrap_err();
        assert!(matches!(err, ConvertError::MetadataFailure(_)));
    }

    #[test]
    fn test_copy_all_tags_tolerates_warnings() {
        let ctx = ConversionContext::new(Arc::new(FnRunner(|_: &str, _: &[String]| {
            CommandOutput::failed("Warning: [minor] Unrecognized MakerNotes")
        })));
        assert!(copy_all_tags(&ctx, Path::new("a.jpg"), Path::new("a.avif")).is_ok());
    }
}
