use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct GalleryRecord {
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl GalleryRecord {
    pub fn new(
        image: impl Into<String>,
        prompt: impl Into<String>,
        timestamp: impl Into<String>,
    ) -> Self {
        Self {
            image: image.into(),
            prompt: prompt.into(),
            timestamp: timestamp.into(),
            extra: Map::new(),
        }
    }
}

/// How [`GalleryIndex::load`] obtained its contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexSource {
    Existing,
    Missing,
    Corrupt,
}

/// The `gallery.json` document, newest record first.
///
/// Entries are kept as raw JSON so records written by other tools, and any
/// top-level keys besides `images`, survive a rewrite untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct GalleryIndex {
    #[serde(default)]
    pub images: Vec<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl GalleryIndex {
    pub fn load(path: &Path) -> (Self, IndexSource) {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) => {
                if err.kind() != std::io::ErrorKind::NotFound {
                    log::warn!("gallery index {} unreadable: {err}", path.display());
                    return (Self::default(), IndexSource::Corrupt);
                }
                return (Self::default(), IndexSource::Missing);
            }
        };
        match serde_json::from_str::<Self>(&raw) {
            Ok(index) => (index, IndexSource::Existing),
            Err(err) => {
                log::warn!(
                    "gallery index {} is not valid, starting a new one: {err}",
                    path.display()
                );
                (Self::default(), IndexSource::Corrupt)
            }
        }
    }

    pub fn prepend(&mut self, record: &GalleryRecord) -> anyhow::Result<()> {
        self.images.insert(0, serde_json::to_value(record)?);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Entries that have the shape of a gallery record, in index order.
    pub fn records(&self) -> Vec<GalleryRecord> {
        self.images
            .iter()
            .filter_map(|value| serde_json::from_value(value.clone()).ok())
            .collect()
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn missing_file_loads_empty_index() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let (index, source) = GalleryIndex::load(&temp.path().join("gallery.json"));
        assert!(index.is_empty());
        assert_eq!(source, IndexSource::Missing);
        Ok(())
    }

    #[test]
    fn invalid_json_loads_empty_index() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("gallery.json");
        std::fs::write(&path, "{ not json")?;
        let (index, source) = GalleryIndex::load(&path);
        assert!(index.is_empty());
        assert_eq!(source, IndexSource::Corrupt);

        std::fs::write(&path, "[1, 2, 3]")?;
        let (index, source) = GalleryIndex::load(&path);
        assert!(index.is_empty());
        assert_eq!(source, IndexSource::Corrupt);
        Ok(())
    }

    #[test]
    fn prepend_puts_newest_record_first() -> anyhow::Result<()> {
        let mut index = GalleryIndex::default();
        index.prepend(&GalleryRecord::new("images/a.png", "first", "2026-01-01 00:00:00"))?;
        index.prepend(&GalleryRecord::new("images/b.png", "second", "2026-01-02 00:00:00"))?;

        let records = index.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].image, "images/b.png");
        assert_eq!(records[1].image, "images/a.png");
        Ok(())
    }

    #[test]
    fn save_writes_two_space_indented_document() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("docs").join("gallery.json");
        let mut index = GalleryIndex::default();
        index.prepend(&GalleryRecord::new("images/a.png", "a lighthouse", "2026-01-01 00:00:00"))?;
        index.save(&path)?;

        let raw = std::fs::read_to_string(&path)?;
        assert!(raw.starts_with("{\n  \"images\": [\n    {\n      \"image\": \"images/a.png\""));
        let parsed: Value = serde_json::from_str(&raw)?;
        assert_eq!(
            parsed,
            json!({
                "images": [{
                    "image": "images/a.png",
                    "prompt": "a lighthouse",
                    "timestamp": "2026-01-01 00:00:00",
                }]
            })
        );
        Ok(())
    }

    #[test]
    fn rewrite_preserves_unknown_keys_and_entries() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("gallery.json");
        std::fs::write(
            &path,
            serde_json::to_string(&json!({
                "title": "My gallery",
                "images": [
                    {"image": "images/old.png", "prompt": "old", "timestamp": "t", "starred": true},
                    "legacy-entry"
                ]
            }))?,
        )?;

        let (mut index, source) = GalleryIndex::load(&path);
        assert_eq!(source, IndexSource::Existing);
        index.prepend(&GalleryRecord::new("images/new.png", "new", "t2"))?;
        index.save(&path)?;

        let parsed: Value = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
        assert_eq!(parsed["title"], json!("My gallery"));
        assert_eq!(parsed["images"].as_array().map(Vec::len), Some(3));
        assert_eq!(parsed["images"][0]["image"], json!("images/new.png"));
        assert_eq!(parsed["images"][1]["starred"], json!(true));
        assert_eq!(parsed["images"][2], json!("legacy-entry"));

        let (reloaded, _) = GalleryIndex::load(&path);
        let records = reloaded.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].extra.get("starred"), Some(&json!(true)));
        Ok(())
    }

    #[test]
    fn document_without_images_key_reads_as_empty_list() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("gallery.json");
        std::fs::write(&path, "{}")?;
        let (index, source) = GalleryIndex::load(&path);
        assert!(index.is_empty());
        assert_eq!(source, IndexSource::Existing);
        Ok(())
    }
}
