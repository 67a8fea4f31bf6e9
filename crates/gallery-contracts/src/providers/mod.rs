use serde_json::Value;

pub const DEFAULT_ASPECT_RATIO: &str = "16:9";
pub const DEFAULT_IMAGE_SIZE: &str = "4K";

/// What the request handler asks a provider for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateRequest {
    pub prompt: String,
    pub aspect_ratio: String,
    pub image_size: String,
}

impl GenerateRequest {
    /// One widescreen image at the highest resolution tier.
    pub fn widescreen(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            aspect_ratio: DEFAULT_ASPECT_RATIO.to_string(),
            image_size: DEFAULT_IMAGE_SIZE.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineData {
    pub mime_type: Option<String>,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResponsePart {
    Text(String),
    InlineData(InlineData),
    /// A part this tool does not interpret (function calls, grounding, ...).
    Other(Value),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct GenerateContentResponse {
    pub parts: Vec<ResponsePart>,
}

impl GenerateContentResponse {
    pub fn new(parts: Vec<ResponsePart>) -> Self {
        Self { parts }
    }

    pub fn first_inline_data(&self) -> Option<&InlineData> {
        self.parts.iter().find_map(|part| match part {
            ResponsePart::InlineData(inline) if !inline.data.is_empty() => Some(inline),
            _ => None,
        })
    }

    /// Text commentary joined in response order.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                ResponsePart::Text(text) => Some(text.trim()),
                _ => None,
            })
            .filter(|text| !text.is_empty())
            .collect::<Vec<&str>>()
            .join("\n")
    }
}
