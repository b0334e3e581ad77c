//! Safety Module
//!
//! Refuses destructive runs (`--delete-original`) on system directories and home
//! roots, and guards original deletion behind an output re-check.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

const DANGEROUS_DIRS: &[&str] = &[
    "/",
    "/System",
    "/usr",
    "/bin",
    "/sbin",
    "/etc",
    "/var",
    "/private",
    "/Library",
    "/Applications",
    "/Users",
    "/home",
    "/root",
    "/boot",
    "/dev",
    "/proc",
    "/sys",
    "/tmp",
    "/opt",
];

pub fn check_dangerous_directory(path: &Path) -> Result<(), String> {
    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    let path_str = canonical.to_string_lossy();

    if DANGEROUS_DIRS.iter().any(|d| path_str == *d) {
        return Err(format!(
            "🚨 DANGEROUS OPERATION BLOCKED!\n\
             ❌ Source directory '{}' is a protected system directory.\n\
             💡 Please specify a safe subdirectory instead.",
            canonical.display()
        ));
    }

    let depth = canonical.components().count();
    if depth <= 3 && (path_str.starts_with("/Users/") || path_str.starts_with("/home/")) {
        return Err(format!(
            "🚨 DANGEROUS OPERATION BLOCKED!\n\
             ❌ Source '{}' is too close to your home directory root.\n\
             💡 Please specify a subdirectory like ~/Pictures/export instead.",
            path.display()
        ));
    }

    Ok(())
}

/// Output exists, is non-empty and readable.
pub fn verify_output_integrity(output: &Path) -> Result<(), String> {
    let metadata =
        std::fs::metadata(output).map_err(|e| format!("Cannot read output metadata: {}", e))?;
    if metadata.len() == 0 {
        return Err("Output file is empty (0 bytes)".to_string());
    }
    let mut file = File::open(output).map_err(|e| format!("Cannot open output file: {}", e))?;
    let mut buffer = [0u8; 16];
    file.read(&mut buffer)
        .map_err(|e| format!("Cannot read output file: {}", e))?;
    Ok(())
}

/// Delete the original only if the output passes [`verify_output_integrity`].
pub fn safe_delete_original(input: &Path, output: &Path) -> io::Result<()> {
    if let Err(reason) = verify_output_integrity(output) {
        tracing::warn!("⚠️  Output integrity check FAILED: {}", reason);
        tracing::warn!("🛡️  Original file PROTECTED: {}", input.display());
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Output integrity check failed: {}", reason),
        ));
    }
    std::fs::remove_file(input)
}
