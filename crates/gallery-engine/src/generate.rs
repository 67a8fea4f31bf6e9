use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDateTime};
use gallery_contracts::events::{emit_optional, EventWriter};
use gallery_contracts::gallery::{
    record_timestamp, stamped_file_name, validate_file_name, GalleryIndex, GalleryLayout,
    GalleryRecord,
};
use gallery_contracts::providers::GenerateRequest;
use image::DynamicImage;
use serde_json::json;

use crate::{map_object, ImageProvider};

#[derive(Debug, Clone, PartialEq)]
pub struct SavedImage {
    pub path: PathBuf,
    pub record: GalleryRecord,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GenerateOutcome {
    Saved(SavedImage),
    /// The provider answered without any inline image. Carries whatever text
    /// the model returned instead.
    NoImage { commentary: String },
}

/// Generates one image for a prompt and files it into the gallery.
pub struct ImageRequestHandler<'a> {
    provider: &'a dyn ImageProvider,
    layout: GalleryLayout,
    events: Option<EventWriter>,
}

impl<'a> ImageRequestHandler<'a> {
    pub fn new(provider: &'a dyn ImageProvider, layout: GalleryLayout) -> Self {
        Self {
            provider,
            layout,
            events: None,
        }
    }

    pub fn with_events(mut self, events: EventWriter) -> Self {
        self.events = Some(events);
        self
    }

    pub fn layout(&self) -> &GalleryLayout {
        &self.layout
    }

    pub fn handle(&self, prompt: &str, file_name: &str) -> Result<GenerateOutcome> {
        self.handle_at(prompt, file_name, Local::now().naive_local())
    }

    /// Same as [`Self::handle`] with the clock supplied by the caller. `now`
    /// names the file and stamps the record.
    pub fn handle_at(
        &self,
        prompt: &str,
        file_name: &str,
        now: NaiveDateTime,
    ) -> Result<GenerateOutcome> {
        if prompt.trim().is_empty() {
            bail!("prompt must not be empty");
        }
        let file_name = validate_file_name(file_name)?;

        emit_optional(
            self.events.as_ref(),
            "generation_started",
            map_object(json!({
                "provider": self.provider.name(),
                "prompt": prompt,
                "filename": file_name,
            })),
        );

        let request = GenerateRequest::widescreen(prompt);
        let response = self
            .provider
            .generate(&request)
            .with_context(|| format!("{} image generation failed", self.provider.name()))?;

        let Some(inline) = response.first_inline_data() else {
            let commentary = response.text();
            log::warn!("{} returned no inline image", self.provider.name());
            emit_optional(
                self.events.as_ref(),
                "generation_no_image",
                map_object(json!({
                    "provider": self.provider.name(),
                    "parts": response.parts.len(),
                    "commentary": commentary,
                })),
            );
            return Ok(GenerateOutcome::NoImage { commentary });
        };

        let decoded = image::load_from_memory(&inline.data).with_context(|| {
            format!(
                "failed to decode returned image ({})",
                inline.mime_type.as_deref().unwrap_or("unknown type")
            )
        })?;
        let rgb = DynamicImage::ImageRgb8(decoded.to_rgb8());

        let images_dir = self.layout.images_dir();
        std::fs::create_dir_all(&images_dir)
            .with_context(|| format!("failed to create {}", images_dir.display()))?;

        let stored_name = stamped_file_name(&now, file_name);
        let path = self.layout.image_path(&stored_name);
        rgb.save(&path)
            .with_context(|| format!("failed to save {}", path.display()))?;

        let record = GalleryRecord::new(
            self.layout.record_image_path(&stored_name),
            prompt,
            record_timestamp(&now),
        );
        let index_path = self.layout.index_path();
        let (mut index, source) = GalleryIndex::load(&index_path);
        index.prepend(&record)?;
        index
            .save(&index_path)
            .with_context(|| format!("failed to write {}", index_path.display()))?;
        log::debug!(
            "gallery index {} ({source:?}) now has {} entries",
            index_path.display(),
            index.len()
        );

        emit_optional(
            self.events.as_ref(),
            "generation_saved",
            map_object(json!({
                "provider": self.provider.name(),
                "path": path.to_string_lossy(),
                "image": record.image,
                "width": rgb.width(),
                "height": rgb.height(),
                "bytes": inline.data.len(),
            })),
        );

        Ok(GenerateOutcome::Saved(SavedImage {
            path,
            width: rgb.width(),
            height: rgb.height(),
            record,
        }))
    }
}
