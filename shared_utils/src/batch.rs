//! Batch Processing Module
//!
//! Discovery of media files under a source root and batch outcome counting.

use crate::config::{
    is_image_extension, is_video_extension, LIVE_PHOTO_MOTION_EXTENSION,
    LIVE_PHOTO_STILL_EXTENSIONS,
};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    pub fn label(&self) -> &'static str {
        match self {
            MediaKind::Image => "Images",
            MediaKind::Video => "Videos",
        }
    }
}

/// One discovered source file. Immutable after discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFile {
    pub path: PathBuf,
    /// Path relative to the source root; unique within one run
    pub relative: PathBuf,
    pub kind: MediaKind,
    /// Lower-cased extension without the dot
    pub extension: String,
    /// `.mov` clip with a same-stem still next to it, decided at discovery
    pub live_photo: bool,
}

impl MediaFile {
    pub fn classify(source_root: &Path, path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        let kind = if is_image_extension(&extension) {
            MediaKind::Image
        } else if is_video_extension(&extension) {
            MediaKind::Video
        } else {
            return None;
        };
        let relative = path.strip_prefix(source_root).ok()?.to_path_buf();
        Some(Self {
            path: path.to_path_buf(),
            relative,
            kind,
            extension,
            live_photo: false,
        })
    }

    /// Directory plus case-folded stem: `IMG_0001.MOV` and `img_0001.heic` share a key.
    fn pairing_key(&self) -> Option<(PathBuf, String)> {
        let parent = self.path.parent()?.to_path_buf();
        let stem = self.path.file_stem()?.to_string_lossy().to_lowercase();
        Some((parent, stem))
    }
}

#[derive(Debug, Default)]
pub struct Discovery {
    pub images: Vec<MediaFile>,
    pub videos: Vec<MediaFile>,
}

impl Discovery {
    pub fn total(&self) -> usize {
        self.images.len() + self.videos.len()
    }
}

/// Walk `source_root` once and partition media by extension (case-insensitive).
/// `exclude` prunes a subtree, used when the target lives inside the source.
pub fn discover_media(source_root: &Path, exclude: Option<&Path>) -> Discovery {
    let mut discovery = Discovery::default();

    let walker = WalkDir::new(source_root)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| exclude.map_or(true, |ex| e.depth() == 0 || !e.path().starts_with(ex)));

    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!("⚠️ Skipping unreadable entry: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        if let Some(file) = MediaFile::classify(source_root, entry.path()) {
            match file.kind {
                MediaKind::Image => discovery.images.push(file),
                MediaKind::Video => discovery.videos.push(file),
            }
        }
    }

    pair_live_photos(&mut discovery);
    discovery
}

/// Mark `.mov` clips that sit next to a same-stem still as Live Photo motion clips.
///
/// Runs on the complete file set before any conversion, so deleting the still
/// during the run cannot change the answer.
fn pair_live_photos(discovery: &mut Discovery) {
    let stills: HashSet<(PathBuf, String)> = discovery
        .images
        .iter()
        .filter(|f| LIVE_PHOTO_STILL_EXTENSIONS.contains(&f.extension.as_str()))
        .filter_map(MediaFile::pairing_key)
        .collect();
    if stills.is_empty() {
        return;
    }
    for video in discovery
        .videos
        .iter_mut()
        .filter(|v| v.extension == LIVE_PHOTO_MOTION_EXTENSION)
    {
        video.live_photo = video.pairing_key().map_or(false, |k| stills.contains(&k));
    }
}

#[derive(Debug, Clone)]
pub struct BatchResult {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub errors: Vec<(PathBuf, String)>,
}

impl BatchResult {
    pub fn new() -> Self {
        Self {
            total: 0,
            succeeded: 0,
            failed: 0,
            skipped: 0,
            errors: Vec::new(),
        }
    }

    pub fn merge(&mut self, other: BatchResult) {
        self.total += other.total;
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        self.skipped += other.skipped;
        self.errors.extend(other.errors);
    }

    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            (self.succeeded as f64 / self.total as f64) * 100.0
        }
    }
}

impl Default for BatchResult {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str) {
        let p = root.join(rel);
        fs::create_dir_all(p.parent().unwrap()).unwrap();
        fs::write(p, b"x").unwrap();
    }

    #[test]
    fn test_discover_partitions_by_extension() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        touch(root, "a.JPG");
        touch(root, "sub/b.heic");
        touch(root, "sub/deeper/c.MOV");
        touch(root, "d.ts");
        touch(root, "notes.txt");
        touch(root, "noext");

        let d = discover_media(root, None);
        let images: Vec<_> = d.images.iter().map(|f| f.relative.clone()).collect();
        let videos: Vec<_> = d.videos.iter().map(|f| f.relative.clone()).collect();
        assert_eq!(images, vec![PathBuf::from("a.JPG"), PathBuf::from("sub/b.heic")]);
        assert_eq!(videos, vec![PathBuf::from("d.ts"), PathBuf::from("sub/deeper/c.MOV")]);
        assert_eq!(d.total(), 4);
        assert!(d.videos.iter().all(|v| !v.live_photo));
        assert_eq!(d.images[0].extension, "jpg");
        assert_eq!(d.videos[1].kind, MediaKind::Video);
    }

    #[test]
    fn test_discover_pairs_live_photo_clips() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        touch(root, "IMG_0001.HEIC");
        touch(root, "IMG_0001.MOV");
        touch(root, "album/img_0002.jpg");
        touch(root, "album/IMG_0002.mov");
        // still in another directory does not pair
        touch(root, "IMG_0003.MOV");
        touch(root, "other/IMG_0003.heic");
        // poster frame next to a non-.mov video
        touch(root, "clip.mp4");
        touch(root, "clip.jpg");
        // png is not a Live Photo still
        touch(root, "shot.png");
        touch(root, "shot.mov");

        let d = discover_media(root, None);
        let live: Vec<_> = d
            .videos
            .iter()
            .filter(|v| v.live_photo)
            .map(|v| v.relative.clone())
            .collect();
        assert_eq!(
            live,
            vec![PathBuf::from("IMG_0001.MOV"), PathBuf::from("album/IMG_0002.mov")]
        );
    }

    #[test]
    fn test_discover_excludes_target_subtree() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        touch(root, "a.png");
        touch(root, "out/a.webp");
        let d = discover_media(root, Some(&root.join("out")));
        assert_eq!(d.images.len(), 1);
        assert_eq!(d.images[0].relative, PathBuf::from("a.png"));
    }

    #[test]
    fn test_classify_outside_root_is_none() {
        assert!(MediaFile::classify(Path::new("/src"), Path::new("/other/a.jpg")).is_none());
        assert!(MediaFile::classify(Path::new("/src"), Path::new("/src/a.doc")).is_none());
    }

    fn counts(succeeded: usize, failed: usize, skipped: usize) -> BatchResult {
        BatchResult {
            total: succeeded + failed + skipped,
            succeeded,
            failed,
            skipped,
            errors: (0..failed)
                .map(|i| (PathBuf::from(format!("f{}.png", i)), "E".to_string()))
                .collect(),
        }
    }

    #[test]
    fn test_merge() {
        let mut images = counts(1, 0, 0);
        let videos = counts(0, 1, 1);
        images.merge(videos);
        assert_eq!(images.total, 3);
        assert_eq!(
            images.total,
            images.succeeded + images.failed + images.skipped,
            "total must equal succeeded + failed + skipped"
        );
        assert_eq!(images.errors.len(), 1);
    }

    #[test]
    fn test_success_rate() {
        let test_cases = [
            (10, 0, 0, 100.0),
            (5, 5, 0, 50.0),
            (3, 1, 0, 75.0),
            (0, 10, 0, 0.0),
            (7, 2, 1, 70.0),
            (0, 0, 0, 100.0),
        ];

        for (success, fail, skip, expected) in test_cases {
            let result = counts(success, fail, skip);
            assert!(
                (result.success_rate() - expected).abs() < 0.001,
                "{}s/{}f/{}k expected {}%, got {}%",
                success,
                fail,
                skip,
                expected,
                result.success_rate()
            );
        }
    }
}
