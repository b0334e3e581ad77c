//! Timestamp provenance - 决定文件的"真实"拍摄时间
//!
//! 候选来源按固定优先级尝试，第一个成功的胜出：
//! 1. EXIF `DateTimeOriginal` / `CreateDate` / `ModifyDate` 中最早的一个
//! 2. 文件名中的日期（从最具体到最宽松的模式）
//! 3. 文件修改时间（无条件兜底，保证函数总有结果）
//!
//! 所有结果都不会晚于"现在"。

use super::exif::read_exif_dates;
use crate::command_runner::ConversionContext;
use chrono::{DateTime, FixedOffset, Local, NaiveDate, NaiveDateTime, TimeZone};
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateSource {
    ExifDateTimeOriginal,
    ExifCreateDate,
    ExifModifyDate,
    FilenamePattern,
    FilesystemMtime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimestampCandidate {
    pub source: DateSource,
    pub instant: DateTime<FixedOffset>,
}

/// One provenance strategy: a candidate or nothing.
type DateStrategy = fn(&ConversionContext, &Path, DateTime<FixedOffset>) -> Option<TimestampCandidate>;

const STRATEGIES: &[DateStrategy] = &[exif_strategy, filename_strategy];

/// Best creation instant for `source`, never later than now.
pub fn best_creation_date(ctx: &ConversionContext, source: &Path) -> DateTime<FixedOffset> {
    let best = resolve_creation_date(ctx, source, Local::now().fixed_offset());
    tracing::debug!(
        file = %source.display(),
        source = ?best.source,
        date = %best.instant,
        "Creation date resolved"
    );
    best.instant
}

pub fn resolve_creation_date(
    ctx: &ConversionContext,
    source: &Path,
    now: DateTime<FixedOffset>,
) -> TimestampCandidate {
    STRATEGIES
        .iter()
        .find_map(|strategy| strategy(ctx, source, now))
        .unwrap_or_else(|| mtime_candidate(source, now))
}

fn exif_strategy(
    ctx: &ConversionContext,
    source: &Path,
    now: DateTime<FixedOffset>,
) -> Option<TimestampCandidate> {
    read_exif_dates(ctx, source)
        .into_iter()
        .filter_map(|(source, raw)| {
            parse_exif_datetime(&raw).map(|instant| TimestampCandidate { source, instant })
        })
        .filter(|c| c.instant <= now)
        .min_by_key(|c| c.instant)
}

fn filename_strategy(
    _ctx: &ConversionContext,
    source: &Path,
    now: DateTime<FixedOffset>,
) -> Option<TimestampCandidate> {
    let name = source.file_stem()?.to_string_lossy();
    date_from_filename(&name, now).map(|instant| TimestampCandidate {
        source: DateSource::FilenamePattern,
        instant,
    })
}

fn mtime_candidate(source: &Path, now: DateTime<FixedOffset>) -> TimestampCandidate {
    let instant = std::fs::metadata(source)
        .and_then(|m| m.modified())
        .map(|t| DateTime::<Local>::from(t).fixed_offset())
        .map(|t| t.min(now))
        .unwrap_or(now);
    TimestampCandidate {
        source: DateSource::FilesystemMtime,
        instant,
    }
}

/// EXIF date strings, with or without an offset and sub-seconds.
/// A naive value is read as local time.
pub fn parse_exif_datetime(raw: &str) -> Option<DateTime<FixedOffset>> {
    let raw = raw.trim();
    if raw.is_empty() || raw.starts_with("0000") {
        return None;
    }
    let raw = raw
        .strip_suffix('Z')
        .map(|s| format!("{}+00:00", s))
        .unwrap_or_else(|| raw.to_string());

    for fmt in ["%Y:%m:%d %H:%M:%S%:z", "%Y:%m:%d %H:%M:%S%.f%:z"] {
        if let Ok(dt) = DateTime::parse_from_str(&raw, fmt) {
            return Some(dt);
        }
    }
    for fmt in ["%Y:%m:%d %H:%M:%S", "%Y:%m:%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(&raw, fmt) {
            return local_instant(naive);
        }
    }
    None
}

fn local_instant(naive: NaiveDateTime) -> Option<DateTime<FixedOffset>> {
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.fixed_offset())
}

fn min_valid_date() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2000, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

/// Patterns from most to least specific.
fn filename_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            // 2023-09-15 10:30:00, 2023_09_15-10.30.00, 2023-09-15T10-30-00
            r"(?:^|\D)(\d{4})[-_.:](\d{2})[-_.:](\d{2})[ _T-](\d{2})[-_.:](\d{2})[-_.:](\d{2})",
            // IMG_20230915_103000, PXL_20230915-103000123, VID20230915_103000
            r"(?:^|\D)(\d{4})(\d{2})(\d{2})[_-](\d{2})(\d{2})(\d{2})",
            // 2023-09-15, 2023.09.15, 20230915
            r"(?:^|\D)(\d{4})[-_.]?(\d{2})[-_.]?(\d{2})(?:\D|$)",
        ]
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect()
    })
}

/// First plausible date found in a file name, in [2000-01-01, now].
pub fn date_from_filename(name: &str, now: DateTime<FixedOffset>) -> Option<DateTime<FixedOffset>> {
    let min = min_valid_date();
    for pattern in filename_patterns() {
        for caps in pattern.captures_iter(name) {
            let num = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u32>().ok());
            let Some(date) = NaiveDate::from_ymd_opt(num(1)? as i32, num(2)?, num(3)?) else {
                continue;
            };
            let time = if caps.len() > 4 {
                date.and_hms_opt(num(4)?, num(5)?, num(6)?)
            } else {
                date.and_hms_opt(0, 0, 0)
            };
            let Some(naive) = time else { continue };
            if naive < min {
                continue;
            }
            if let Some(instant) = local_instant(naive) {
                if instant <= now {
                    return Some(instant);
                }
            }
        }
    }
    None
}
