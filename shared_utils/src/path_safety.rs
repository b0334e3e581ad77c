//! Path helpers for external tool arguments and mirrored output layout

use std::borrow::Cow;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Sanitizes a file path for command-line usage. FFmpeg and ImageMagick do not
/// support '--', so a relative path starting with '-' gets a "./" prefix.
pub fn safe_path_arg(path: &Path) -> Cow<'_, str> {
    let s = path.to_string_lossy();
    if s.starts_with('-') {
        Cow::Owned(format!("./{}", s))
    } else {
        s
    }
}

/// `target_root/relative` with the extension replaced.
pub fn mirrored_output(target_root: &Path, relative: &Path, extension: &str) -> PathBuf {
    target_root.join(relative).with_extension(extension)
}

/// Sibling backup exiftool leaves behind after an in-place edit: `<name>_original`.
pub fn exiftool_backup_path(path: &Path) -> PathBuf {
    let mut name: OsString = path.file_name().unwrap_or_default().to_os_string();
    name.push("_original");
    path.with_file_name(name)
}

/// Non-empty regular file at `path`.
pub fn is_nonempty_file(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.len() > 0)
        .unwrap_or(false)
}
