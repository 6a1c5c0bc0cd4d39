use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::{PipelineError, PipelineResult};

/// Extensions accepted as input images (compared case-insensitively).
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// One image after renaming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequencedImage {
    /// 1-based position in the sequence.
    pub index: usize,
    pub original_name: String,
    pub path: PathBuf,
}

/// Images renamed to `img001.<ext>`, `img002.<ext>`, ... in sorted order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSet {
    pub dir: PathBuf,
    pub images: Vec<SequencedImage>,
}

impl ImageSet {
    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Extension shared by every image, or `None` when they differ.
    pub fn common_extension(&self) -> Option<&str> {
        let first = self.images.first()?.path.extension()?.to_str()?;
        let all_same = self
            .images
            .iter()
            .all(|img| img.path.extension().and_then(|e| e.to_str()) == Some(first));
        all_same.then_some(first)
    }
}

pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known)))
}

/// Image files directly inside `dir`, sorted by file name.
pub fn list_images(dir: &Path) -> Vec<PathBuf> {
    let mut images: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| is_image_file(p))
        .filter(|p| {
            let utf8 = p.file_name().and_then(|n| n.to_str()).is_some();
            if !utf8 {
                warn!(path = %p.display(), "skipping image with a non UTF-8 name");
            }
            utf8
        })
        .collect();
    images.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    images
}

/// Name an image gets at `index` (1-based), keeping its extension.
pub fn canonical_name(index: usize, extension: &str) -> String {
    format!("img{:03}.{}", index, extension)
}

/// Rename every image in `dir` into the canonical sequence.
///
/// Renaming is in place and destructive. Files already carrying their
/// canonical name are left alone.
pub fn sequence_images(dir: &Path) -> PipelineResult<ImageSet> {
    let sources = list_images(dir);
    if sources.is_empty() {
        return Err(PipelineError::EmptyInput { dir: dir.to_path_buf() });
    }
    info!(dir = %dir.display(), count = sources.len(), "renaming images to sequential names");

    let mut planned: Vec<(PathBuf, PathBuf, String, usize)> = Vec::with_capacity(sources.len());
    for (i, src) in sources.into_iter().enumerate() {
        let index = i + 1;
        let original_name = src.file_name().and_then(|n| n.to_str()).unwrap_or_default().to_string();
        let ext = src.extension().and_then(|e| e.to_str()).unwrap_or_default().to_string();
        let target = dir.join(canonical_name(index, &ext));
        planned.push((src, target, original_name, index));
    }

    // Two passes: a canonical name may still belong to another input that
    // sorts later, so everything that moves goes through a staging name first.
    let mut staged: Vec<(PathBuf, PathBuf)> = Vec::new();
    for (src, target, _, index) in &planned {
        if src == target {
            continue;
        }
        let ext = target.extension().and_then(|e| e.to_str()).unwrap_or_default();
        let staging = dir.join(format!(".swapreel-staging-{index:06}.{ext}"));
        fs::rename(src, &staging)?;
        staged.push((staging, target.clone()));
    }
    for (staging, target) in &staged {
        fs::rename(staging, target)?;
    }

    let images = planned
        .into_iter()
        .map(|(src, target, original_name, index)| {
            if src != target {
                debug!(from = %original_name, to = %target.display(), "renamed");
            }
            SequencedImage {
                index,
                original_name,
                path: target,
            }
        })
        .collect();

    Ok(ImageSet {
        dir: dir.to_path_buf(),
        images,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str, body: &str) {
        fs::write(dir.join(name), body).unwrap();
    }

    fn names(dir: &Path) -> Vec<String> {
        let mut v: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        v.sort();
        v
    }

    #[test]
    fn renames_in_lexicographic_order() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "b.jpg", "b");
        touch(tmp.path(), "a.jpg", "a");
        touch(tmp.path(), "c.jpg", "c");
        touch(tmp.path(), "notes.txt", "x");

        let set = sequence_images(tmp.path()).unwrap();
        assert_eq!(set.len(), 3);
        assert_eq!(names(tmp.path()), vec!["img001.jpg", "img002.jpg", "img003.jpg", "notes.txt"]);
        assert_eq!(fs::read_to_string(tmp.path().join("img001.jpg")).unwrap(), "a");
        assert_eq!(fs::read_to_string(tmp.path().join("img003.jpg")).unwrap(), "c");
        let originals: Vec<&str> = set.images.iter().map(|i| i.original_name.as_str()).collect();
        assert_eq!(originals, vec!["a.jpg", "b.jpg", "c.jpg"]);
    }

    #[test]
    fn extension_match_is_case_insensitive_and_preserved() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "A.PNG", "a");
        touch(tmp.path(), "b.Jpeg", "b");
        let set = sequence_images(tmp.path()).unwrap();
        assert_eq!(names(tmp.path()), vec!["img001.PNG", "img002.Jpeg"]);
        assert_eq!(set.common_extension(), None);
    }

    #[test]
    fn canonical_names_are_left_alone() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "img001.jpg", "one");
        touch(tmp.path(), "img002.jpg", "two");
        let set = sequence_images(tmp.path()).unwrap();
        assert_eq!(set.common_extension(), Some("jpg"));
        assert_eq!(fs::read_to_string(tmp.path().join("img002.jpg")).unwrap(), "two");
    }

    #[test]
    fn existing_canonical_name_is_not_clobbered() {
        let tmp = TempDir::new().unwrap();
        // "a.jpg" sorts first and takes img001, the old img001 moves to img002.
        touch(tmp.path(), "a.jpg", "a");
        touch(tmp.path(), "img001.jpg", "old-one");
        sequence_images(tmp.path()).unwrap();
        assert_eq!(names(tmp.path()), vec!["img001.jpg", "img002.jpg"]);
        assert_eq!(fs::read_to_string(tmp.path().join("img001.jpg")).unwrap(), "a");
        assert_eq!(fs::read_to_string(tmp.path().join("img002.jpg")).unwrap(), "old-one");
    }

    #[test]
    fn empty_directory_is_an_error() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "clip.mp4", "v");
        assert!(matches!(sequence_images(tmp.path()), Err(PipelineError::EmptyInput { .. })));
    }

    #[test]
    fn missing_directory_is_an_empty_input() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("nope");
        assert!(matches!(sequence_images(&missing), Err(PipelineError::EmptyInput { .. })));
    }
}
