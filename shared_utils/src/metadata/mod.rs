//! Metadata Preservation Module
//!
//! 转换后元数据的统一入口 `copy_metadata(ctx, src, dst)`：
//! 1. 从源文件解析最佳创建时间（见 [`provenance`]）
//! 2. exiftool 复制全部标签到输出文件
//! 3. 强制写入 DateTimeOriginal / CreateDate / ModifyDate（视频另加 QuickTime 日期）
//! 4. 删除 exiftool 的 `_original` 备份（幂等，已不存在也不算错误）
//! 5. 设置文件系统 atime/mtime
//!
//! exiftool 会改写文件，故时间戳一律在写操作之后设置。

use crate::command_runner::ConversionContext;
use crate::errors::{ConvertError, Result};
use crate::path_safety::exiftool_backup_path;
use chrono::{DateTime, FixedOffset};
use std::path::Path;

mod exif;
pub mod provenance;

pub use exif::{copy_all_tags, read_exif_dates, write_creation_date};
pub use provenance::{
    best_creation_date, date_from_filename, parse_exif_datetime, resolve_creation_date,
    DateSource, TimestampCandidate,
};

/// Set atime and mtime of `dst` to `date`.
pub fn apply_file_timestamps(dst: &Path, date: DateTime<FixedOffset>) -> Result<()> {
    let ft = filetime::FileTime::from_unix_time(date.timestamp(), date.timestamp_subsec_nanos());
    filetime::set_file_times(dst, ft, ft).map_err(|e| {
        ConvertError::MetadataFailure(format!("set file times on {}: {}", dst.display(), e))
    })
}

/// Remove a stray `<name>_original` left by an in-place exiftool edit.
pub fn cleanup_exiftool_backup(dst: &Path) {
    let backup = exiftool_backup_path(dst);
    match std::fs::remove_file(&backup) {
        Ok(()) => tracing::debug!(path = %backup.display(), "Removed exiftool backup"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("⚠️ [metadata] Cannot remove {}: {}", backup.display(), e),
    }
}

/// Propagate tags and the resolved creation date from `src` onto `dst`.
///
/// Errors are reported but the output file is kept either way; the first error
/// is returned after every step has been attempted.
pub fn copy_metadata(
    ctx: &ConversionContext,
    src: &Path,
    dst: &Path,
) -> Result<DateTime<FixedOffset>> {
    let best = best_creation_date(ctx, src);
    let is_video = dst
        .extension()
        .and_then(|e| e.to_str())
        .map(crate::config::is_video_extension)
        .unwrap_or(false);

    let copied = copy_all_tags(ctx, src, dst);
    let dated = write_creation_date(ctx, dst, best, is_video);
    cleanup_exiftool_backup(dst);
    let stamped = apply_file_timestamps(dst, best);

    copied.and(dated).and(stamped).map(|_| best)
}
