use std::path::{Path, PathBuf};

use anyhow::bail;
use chrono::NaiveDateTime;

pub const DEFAULT_DOCS_DIR: &str = "docs";
pub const IMAGES_DIR_NAME: &str = "images";
pub const THUMBNAILS_DIR_NAME: &str = "thumbnails";
pub const INDEX_FILE_NAME: &str = "gallery.json";
pub const DEFAULT_IMAGE_FILE_NAME: &str = "output.png";

const FILE_STAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
const RECORD_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Where a gallery lives on disk.
///
/// ```text
/// <docs>/gallery.json
/// <docs>/images/<stamp>_<name>
/// <docs>/images/thumbnails/<stamp>_<name>
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GalleryLayout {
    docs_dir: PathBuf,
}

impl GalleryLayout {
    pub fn new(docs_dir: impl Into<PathBuf>) -> Self {
        Self {
            docs_dir: docs_dir.into(),
        }
    }

    pub fn docs_dir(&self) -> &Path {
        &self.docs_dir
    }

    pub fn images_dir(&self) -> PathBuf {
        self.docs_dir.join(IMAGES_DIR_NAME)
    }

    pub fn thumbnails_dir(&self) -> PathBuf {
        self.images_dir().join(THUMBNAILS_DIR_NAME)
    }

    pub fn index_path(&self) -> PathBuf {
        self.docs_dir.join(INDEX_FILE_NAME)
    }

    pub fn image_path(&self, file_name: &str) -> PathBuf {
        self.images_dir().join(file_name)
    }

    pub fn thumbnail_path(&self, file_name: &str) -> PathBuf {
        self.thumbnails_dir().join(file_name)
    }

    /// Path stored in a gallery record, relative to the docs root.
    pub fn record_image_path(&self, file_name: &str) -> String {
        format!("{IMAGES_DIR_NAME}/{file_name}")
    }
}

impl Default for GalleryLayout {
    fn default() -> Self {
        Self::new(DEFAULT_DOCS_DIR)
    }
}

pub fn stamped_file_name(now: &NaiveDateTime, file_name: &str) -> String {
    format!("{}_{file_name}", now.format(FILE_STAMP_FORMAT))
}

pub fn record_timestamp(now: &NaiveDateTime) -> String {
    now.format(RECORD_TIMESTAMP_FORMAT).to_string()
}

/// Filenames are joined onto the images directory, so they must be a single
/// path component.
pub fn validate_file_name(raw: &str) -> anyhow::Result<&str> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        bail!("filename must not be empty");
    }
    if trimmed.contains(['/', '\\']) || trimmed == "." || trimmed == ".." {
        bail!("filename '{trimmed}' must not contain path separators");
    }
    Ok(trimmed)
}
