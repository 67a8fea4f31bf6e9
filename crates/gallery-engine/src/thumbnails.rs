use std::io::{self, Cursor};
use std::path::{Path, PathBuf};

use gallery_contracts::events::{emit_optional, EventWriter};
use gallery_contracts::gallery::GalleryLayout;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilterType, PngEncoder};
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, RgbImage};
use serde_json::json;

use crate::map_object;

pub const DEFAULT_MAX_WIDTH: u32 = 800;
pub const DEFAULT_QUALITY: u8 = 85;

#[derive(Debug, Clone, PartialEq)]
pub struct ThumbnailSettings {
    pub max_width: u32,
    /// Used by lossy codecs. PNG output ignores it.
    pub quality: u8,
    /// Lowercase source extensions to pick up.
    pub extensions: Vec<String>,
}

impl Default for ThumbnailSettings {
    fn default() -> Self {
        Self {
            max_width: DEFAULT_MAX_WIDTH,
            quality: DEFAULT_QUALITY,
            extensions: vec!["png".to_string()],
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ThumbnailError {
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
    #[error("cannot decode image: {0}")]
    Decode(#[source] image::ImageError),
    #[error("cannot encode thumbnail: {0}")]
    Encode(#[source] image::ImageError),
}

impl ThumbnailError {
    fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThumbnailStats {
    pub source_bytes: u64,
    pub thumbnail_bytes: u64,
    pub width: u32,
    pub height: u32,
}

impl ThumbnailStats {
    pub fn reduction_pct(&self) -> f64 {
        if self.source_bytes == 0 {
            return 0.0;
        }
        (1.0 - self.thumbnail_bytes as f64 / self.source_bytes as f64) * 100.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ThumbnailOutcome {
    Written(ThumbnailStats),
    /// The thumbnail is strictly newer than its source.
    Skipped,
}

#[derive(Debug)]
pub struct ThumbnailEntry {
    pub file_name: String,
    pub source: PathBuf,
    pub thumbnail: PathBuf,
    pub result: Result<ThumbnailOutcome, ThumbnailError>,
}

#[derive(Debug, Default)]
pub struct ThumbnailReport {
    pub entries: Vec<ThumbnailEntry>,
}

impl ThumbnailReport {
    pub fn processed(&self) -> usize {
        self.entries.len()
    }

    pub fn written(&self) -> usize {
        self.count(|result| matches!(result, Ok(ThumbnailOutcome::Written(_))))
    }

    pub fn skipped(&self) -> usize {
        self.count(|result| matches!(result, Ok(ThumbnailOutcome::Skipped)))
    }

    pub fn failed(&self) -> usize {
        self.count(Result::is_err)
    }

    fn count(&self, pred: impl Fn(&Result<ThumbnailOutcome, ThumbnailError>) -> bool) -> usize {
        self.entries.iter().filter(|entry| pred(&entry.result)).count()
    }
}

pub struct ThumbnailGenerator {
    images_dir: PathBuf,
    thumbnails_dir: PathBuf,
    settings: ThumbnailSettings,
    events: Option<EventWriter>,
}

impl ThumbnailGenerator {
    pub fn new(layout: &GalleryLayout, settings: ThumbnailSettings) -> Self {
        Self {
            images_dir: layout.images_dir(),
            thumbnails_dir: layout.thumbnails_dir(),
            settings,
            events: None,
        }
    }

    pub fn with_events(mut self, events: EventWriter) -> Self {
        self.events = Some(events);
        self
    }

    pub fn settings(&self) -> &ThumbnailSettings {
        &self.settings
    }

    /// Source files directly under the images directory, sorted by name. A
    /// missing directory yields no candidates.
    pub fn candidates(&self) -> anyhow::Result<Vec<PathBuf>> {
        let entries = match std::fs::read_dir(&self.images_dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(anyhow::Error::new(err)
                    .context(format!("failed to list {}", self.images_dir.display())))
            }
        };
        let mut out = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if !path.is_file() || path.starts_with(&self.thumbnails_dir) {
                continue;
            }
            if self.accepts_extension(&path) {
                out.push(path);
            }
        }
        out.sort();
        Ok(out)
    }

    pub fn run(&self) -> anyhow::Result<ThumbnailReport> {
        self.run_with(|_| {})
    }

    /// Processes every candidate, handing each entry to `on_entry` as soon
    /// as it is done. Per-file failures are recorded, never returned.
    pub fn run_with(
        &self,
        mut on_entry: impl FnMut(&ThumbnailEntry),
    ) -> anyhow::Result<ThumbnailReport> {
        let mut report = ThumbnailReport::default();
        for source in self.candidates()? {
            let file_name = source
                .file_name()
                .map(|name| name.to_string_lossy().to_string())
                .unwrap_or_default();
            let thumbnail = self.thumbnails_dir.join(&file_name);
            let result = self.process(&source, &thumbnail);
            let entry = ThumbnailEntry {
                file_name,
                source,
                thumbnail,
                result,
            };
            self.emit_entry(&entry);
            on_entry(&entry);
            report.entries.push(entry);
        }
        emit_optional(
            self.events.as_ref(),
            "thumbnails_finished",
            map_object(json!({
                "processed": report.processed(),
                "written": report.written(),
                "skipped": report.skipped(),
                "failed": report.failed(),
            })),
        );
        Ok(report)
    }

    fn process(&self, source: &Path, thumbnail: &Path) -> Result<ThumbnailOutcome, ThumbnailError> {
        std::fs::create_dir_all(&self.thumbnails_dir).map_err(|err| {
            ThumbnailError::io(format!("cannot create {}", self.thumbnails_dir.display()), err)
        })?;
        if is_up_to_date(source, thumbnail)? {
            return Ok(ThumbnailOutcome::Skipped);
        }

        let raw = std::fs::read(source)
            .map_err(|err| ThumbnailError::io(format!("cannot read {}", source.display()), err))?;
        let decoded = image::load_from_memory(&raw).map_err(ThumbnailError::Decode)?;
        let resized = fit_width(flatten_onto_white(decoded), self.settings.max_width);
        let format = ImageFormat::from_path(thumbnail).unwrap_or(ImageFormat::Png);
        let bytes = encode_thumbnail(&resized, format, self.settings.quality)?;
        std::fs::write(thumbnail, &bytes).map_err(|err| {
            ThumbnailError::io(format!("cannot write {}", thumbnail.display()), err)
        })?;

        Ok(ThumbnailOutcome::Written(ThumbnailStats {
            source_bytes: raw.len() as u64,
            thumbnail_bytes: bytes.len() as u64,
            width: resized.width(),
            height: resized.height(),
        }))
    }

    fn accepts_extension(&self, path: &Path) -> bool {
        let Some(ext) = path.extension().and_then(|ext| ext.to_str()) else {
            return false;
        };
        let ext = ext.to_ascii_lowercase();
        self.settings
            .extensions
            .iter()
            .any(|allowed| allowed.trim_start_matches('.').eq_ignore_ascii_case(&ext))
    }

    fn emit_entry(&self, entry: &ThumbnailEntry) {
        let (event_type, detail) = match &entry.result {
            Ok(ThumbnailOutcome::Written(stats)) => (
                "thumbnail_written",
                json!({
                    "source_bytes": stats.source_bytes,
                    "thumbnail_bytes": stats.thumbnail_bytes,
                    "width": stats.width,
                    "height": stats.height,
                }),
            ),
            Ok(ThumbnailOutcome::Skipped) => ("thumbnail_skipped", json!({})),
            Err(err) => {
                log::warn!("thumbnail for {} failed: {err}", entry.file_name);
                ("thumbnail_failed", json!({ "error": err.to_string() }))
            }
        };
        let mut payload = map_object(detail);
        payload.insert("file".to_string(), json!(entry.file_name));
        emit_optional(self.events.as_ref(), event_type, payload);
    }
}

/// A thumbnail is current only when its mtime is strictly newer than the
/// source's. A missing thumbnail is never current.
pub fn is_up_to_date(source: &Path, thumbnail: &Path) -> Result<bool, ThumbnailError> {
    let Ok(thumb_meta) = std::fs::metadata(thumbnail) else {
        return Ok(false);
    };
    let source_modified = std::fs::metadata(source)
        .and_then(|meta| meta.modified())
        .map_err(|err| ThumbnailError::io(format!("cannot stat {}", source.display()), err))?;
    let thumb_modified = thumb_meta
        .modified()
        .map_err(|err| ThumbnailError::io(format!("cannot stat {}", thumbnail.display()), err))?;
    Ok(thumb_modified > source_modified)
}

/// Composites images that carry alpha onto opaque white. The result never
/// has an alpha channel.
pub fn flatten_onto_white(image: DynamicImage) -> DynamicImage {
    if !image.color().has_alpha() {
        return match image {
            DynamicImage::ImageLuma8(_)
            | DynamicImage::ImageLuma16(_)
            | DynamicImage::ImageRgb8(_)
            | DynamicImage::ImageRgb16(_) => image,
            other => DynamicImage::ImageRgb8(other.to_rgb8()),
        };
    }
    let rgba = image.to_rgba8();
    let mut flattened = RgbImage::new(rgba.width(), rgba.height());
    for (x, y, pixel) in rgba.enumerate_pixels() {
        let alpha = u32::from(pixel[3]);
        let blend = |channel: u8| -> u8 {
            ((u32::from(channel) * alpha + 255 * (255 - alpha) + 127) / 255) as u8
        };
        flattened.put_pixel(
            x,
            y,
            image::Rgb([blend(pixel[0]), blend(pixel[1]), blend(pixel[2])]),
        );
    }
    DynamicImage::ImageRgb8(flattened)
}

/// `(width, height)` after capping the width at `max_width`. The height is
/// floored and never drops below one pixel.
pub fn target_dimensions(width: u32, height: u32, max_width: u32) -> (u32, u32) {
    if width <= max_width {
        return (width, height);
    }
    let scaled = u64::from(height) * u64::from(max_width) / u64::from(width);
    (max_width, scaled.max(1) as u32)
}

pub fn fit_width(image: DynamicImage, max_width: u32) -> DynamicImage {
    let (width, height) = target_dimensions(image.width(), image.height(), max_width);
    if (width, height) == (image.width(), image.height()) {
        return image;
    }
    image.resize_exact(width, height, FilterType::Lanczos3)
}

pub fn encode_thumbnail(
    image: &DynamicImage,
    format: ImageFormat,
    quality: u8,
) -> Result<Vec<u8>, ThumbnailError> {
    let mut bytes = Vec::new();
    match format {
        ImageFormat::Png => image.write_with_encoder(PngEncoder::new_with_quality(
            &mut bytes,
            CompressionType::Best,
            PngFilterType::Adaptive,
        )),
        ImageFormat::Jpeg => {
            let eight_bit = match image {
                DynamicImage::ImageLuma8(_) | DynamicImage::ImageRgb8(_) => image.clone(),
                other => DynamicImage::ImageRgb8(other.to_rgb8()),
            };
            let mut encoder = JpegEncoder::new_with_quality(&mut bytes, quality);
            encoder.encode_image(&eight_bit)
        }
        other => image.write_to(&mut Cursor::new(&mut bytes), other),
    }
    .map_err(ThumbnailError::Encode)?;
    Ok(bytes)
}
