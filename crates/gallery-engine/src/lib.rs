use std::collections::BTreeMap;
use std::io::Cursor;

use anyhow::{Context, Result};
use gallery_contracts::providers::{
    GenerateContentResponse, GenerateRequest, InlineData, ResponsePart,
};
use image::{ImageFormat, Rgb, RgbImage};
use sha2::{Digest, Sha256};

pub mod gemini;
pub mod generate;
pub mod thumbnails;

pub use gemini::{GeminiConfig, GeminiProvider};
pub use generate::{GenerateOutcome, ImageRequestHandler, SavedImage};
pub use thumbnails::{
    ThumbnailEntry, ThumbnailError, ThumbnailGenerator, ThumbnailOutcome, ThumbnailReport,
    ThumbnailSettings, ThumbnailStats,
};

pub trait ImageProvider: Send + Sync {
    fn name(&self) -> &str;
    fn generate(&self, request: &GenerateRequest) -> Result<GenerateContentResponse>;
}

#[derive(Default)]
pub struct ImageProviderRegistry {
    providers: BTreeMap<String, Box<dyn ImageProvider>>,
}

impl ImageProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<P: ImageProvider + 'static>(&mut self, provider: P) {
        self.providers
            .insert(provider.name().to_string(), Box::new(provider));
    }

    pub fn get(&self, name: &str) -> Option<&dyn ImageProvider> {
        self.providers.get(name).map(|provider| provider.as_ref())
    }

    pub fn names(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }
}

pub fn default_provider_registry(gemini: GeminiConfig) -> Result<ImageProviderRegistry> {
    let mut providers = ImageProviderRegistry::new();
    providers.register(DryrunProvider::default());
    providers.register(GeminiProvider::new(gemini)?);
    Ok(providers)
}

/// Offline provider: answers with a short text part followed by a solid PNG
/// whose color is derived from the prompt.
#[derive(Debug, Clone)]
pub struct DryrunProvider {
    width: u32,
    height: u32,
}

impl DryrunProvider {
    pub fn with_size(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
        }
    }
}

impl Default for DryrunProvider {
    fn default() -> Self {
        Self::with_size(320, 180)
    }
}

impl ImageProvider for DryrunProvider {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn generate(&self, request: &GenerateRequest) -> Result<GenerateContentResponse> {
        let (r, g, b) = color_from_prompt(&request.prompt);
        let image = RgbImage::from_pixel(self.width, self.height, Rgb([r, g, b]));
        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .context("dryrun image encode failed")?;
        Ok(GenerateContentResponse::new(vec![
            ResponsePart::Text(format!(
                "dryrun {} image at {} for: {}",
                request.aspect_ratio, request.image_size, request.prompt
            )),
            ResponsePart::InlineData(InlineData {
                mime_type: Some("image/png".to_string()),
                data: bytes,
            }),
        ]))
    }
}

fn color_from_prompt(prompt: &str) -> (u8, u8, u8) {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    let digest = hasher.finalize();
    (digest[0], digest[1], digest[2])
}

/// Cause chain on one line, consecutive duplicates collapsed.
pub fn error_chain_text(err: &anyhow::Error, max_chars: usize) -> String {
    let mut parts = Vec::new();
    for cause in err.chain() {
        let text = cause.to_string();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            continue;
        }
        if parts
            .last()
            .map(|existing: &String| existing == trimmed)
            .unwrap_or(false)
        {
            continue;
        }
        parts.push(trimmed.to_string());
    }
    if parts.is_empty() {
        return truncate_text(&err.to_string(), max_chars);
    }
    truncate_text(&parts.join(" | caused by: "), max_chars)
}

pub(crate) fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

pub(crate) fn map_object(value: serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
    value.as_object().cloned().unwrap_or_default()
}
