use std::io::Cursor;

use async_trait::async_trait;
use bytes::Bytes;
use image::{ImageFormat, Rgb, RgbImage};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
    attachment::to_data_url,
    config::Config,
    models::{Attachment, GeneratedImage},
    styles::StyleCandidate,
};

pub const DEMO_KEY: &str = "DEMO_KEY";

const REMOVE_BACKGROUND_PROMPT: &str = "Perfectly segment the main product from the original image. Make the background fully transparent (alpha channel). Do not add any shadows.";
const ENHANCE_IMAGE_PROMPT: &str = "You are a professional photo editor. Enhance this product photograph for an e-commerce website. Subtly improve the lighting, color balance, and sharpness to make the product look its best. Keep the result realistic and do not add, remove, or change any elements or the background. Return only the enhanced image.";
const CATEGORIZE_PROMPT: &str = "Analyze the product in this image. Identify its primary category. Examples: 'Fashion', 'Food', 'Skincare', 'Electronics', 'Home Goods'. Respond with only the category name.";

#[derive(Debug, Error)]
pub enum GeminiError {
    #[error("HTTP error: {0}")] Http(String),
    #[error("no image data in response")] NoImage,
    #[error("malformed JSON reply: {0}")] Json(String),
    #[error("Other: {0}")] Other(String),
}

/// One element of the ordered content list sent to the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentPart {
    Text(String),
    Inline { media_type: String, data: Bytes },
}

impl ContentPart {
    pub fn inline(attachment: &Attachment) -> Self {
        ContentPart::Inline { media_type: attachment.media_type.clone(), data: attachment.data.clone() }
    }

    fn to_json(&self) -> Value {
        use base64::Engine;
        match self {
            ContentPart::Text(text) => json!({ "text": text }),
            ContentPart::Inline { media_type, data } => json!({
                "inlineData": {
                    "mimeType": media_type,
                    "data": base64::engine::general_purpose::STANDARD.encode(data),
                }
            }),
        }
    }
}

/// Requested output shape of a `generateContent` call.
#[derive(Debug, Clone)]
pub enum OutputShape {
    Image,
    Text,
    Json(Value),
}

/// One image generation call: the content parts plus the prompt recorded on the result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRequest {
    pub parts: Vec<ContentPart>,
    pub prompt: String,
}

/// The remote generative model, as seen by the workflow.
#[async_trait]
pub trait StudioModel: Send + Sync {
    async fn remove_background(&self, image: &Attachment) -> Result<Attachment, GeminiError>;
    async fn enhance_image(&self, image: &Attachment) -> Result<Attachment, GeminiError>;
    async fn categorize_product(&self, image: &Attachment) -> Result<String, GeminiError>;
    async fn enhance_prompt(&self, draft: &str, product_context: &str) -> Result<String, GeminiError>;
    async fn generate_captions(&self, product: &str, style_name: &str) -> Result<Vec<String>, GeminiError>;
    /// Raw model picks; callers are expected to sanitize them against `styles`.
    async fn recommend_styles(
        &self,
        image: Option<&Attachment>,
        description: &str,
        styles: &[StyleCandidate],
    ) -> Result<Vec<String>, GeminiError>;
    async fn generate_image(&self, request: &ImageRequest) -> Result<GeneratedImage, GeminiError>;
    async fn generate_mockup(&self, image: &Attachment, prompt: &str) -> Result<GeneratedImage, GeminiError>;
}

// Helper function to truncate base64 data in JSON for cleaner logging
fn truncate_base64_in_json(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, val) in map.iter_mut() {
                if key == "data" {
                    if let Value::String(s) = val {
                        if s.len() > 100 {
                            *val = Value::String(format!("{}...[truncated {} chars]", &s[..50], s.len() - 50));
                        }
                    }
                } else {
                    truncate_base64_in_json(val);
                }
            }
        }
        Value::Array(arr) => {
            for val in arr.iter_mut() {
                truncate_base64_in_json(val);
            }
        }
        _ => {}
    }
}

fn preview(s: &str) -> String {
    let count = s.chars().count();
    if count > 50 { format!("{}...[{} chars total]", s.chars().take(50).collect::<String>(), count) } else { s.to_string() }
}

pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
    image_model: String,
    text_model: String,
}

impl GeminiClient {
    pub fn new(config: &Config) -> Self {
        Self {
            client: Client::new(),
            api_key: config.api_key.clone(),
            base_url: config.api_base.trim_end_matches('/').to_string(),
            image_model: config.image_model.clone(),
            text_model: config.text_model.clone(),
        }
    }

    pub fn is_demo(&self) -> bool {
        self.api_key == DEMO_KEY
    }

    async fn generate_content(&self, model: &str, parts: &[ContentPart], output: OutputShape) -> Result<GeminiResponse, GeminiError> {
        let url = format!("{}/models/{}:generateContent?key={}", self.base_url, model, self.api_key);
        info!("🔗 Making request to: {}", url.replace(&self.api_key, "***"));

        let mut request_body = json!({
            "contents": [{
                "parts": parts.iter().map(ContentPart::to_json).collect::<Vec<_>>()
            }]
        });
        match output {
            OutputShape::Image => {
                request_body["generationConfig"] = json!({ "responseModalities": ["IMAGE"] });
            }
            OutputShape::Json(schema) => {
                request_body["generationConfig"] = json!({
                    "responseMimeType": "application/json",
                    "responseSchema": schema,
                });
            }
            OutputShape::Text => {}
        }

        if tracing::enabled!(tracing::Level::DEBUG) {
            let mut logged = request_body.clone();
            truncate_base64_in_json(&mut logged);
            debug!("📤 Request body: {}", serde_json::to_string_pretty(&logged).unwrap_or_default());
        }

        let response = self.client
            .post(&url)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| GeminiError::Http(e.to_string()))?;

        let status = response.status();
        info!("📥 Response status: {}", status);

        let response_text = response.text().await.map_err(|e| GeminiError::Http(e.to_string()))?;
        if !status.is_success() {
            error!("❌ API Error response: {}", response_text);
            return Err(GeminiError::Http(format!("status={} body={}", status, response_text)));
        }

        serde_json::from_str(&response_text).map_err(|e| {
            let mut shown = response_text.clone();
            if let Ok(mut value) = serde_json::from_str::<Value>(&response_text) {
                truncate_base64_in_json(&mut value);
                shown = value.to_string();
            }
            GeminiError::Other(format!("parse error: {}: {}", e, preview(&shown)))
        })
    }

    async fn generate_image_part(&self, parts: &[ContentPart]) -> Result<String, GeminiError> {
        let parsed = self.generate_content(&self.image_model, parts, OutputShape::Image).await?;
        let image = extract_first_image(&parsed).ok_or(GeminiError::NoImage)?;
        info!("🖼️ Extracted image from API response: {}", preview(&image));
        Ok(image)
    }

    async fn generate_json<T: for<'de> Deserialize<'de>>(&self, parts: &[ContentPart], schema: Value) -> Result<T, GeminiError> {
        let parsed = self.generate_content(&self.text_model, parts, OutputShape::Json(schema)).await?;
        let text = extract_text(&parsed).ok_or_else(|| GeminiError::Json("empty reply".into()))?;
        serde_json::from_str(&text).map_err(|e| GeminiError::Json(format!("{}: {}", e, preview(&text))))
    }

    fn demo_image(&self, prompt: &str) -> Result<String, GeminiError> {
        let colors: [[u8; 3]; 5] = [
            [0x3B, 0x82, 0xF6],
            [0xEF, 0x44, 0x44],
            [0x10, 0xB9, 0x81],
            [0xF5, 0x9E, 0x0B],
            [0x8B, 0x5C, 0xF6],
        ];
        let color = colors[prompt.len() % colors.len()];
        let img = RgbImage::from_fn(256, 256, |x, y| {
            // light diagonal gradient so placeholders are distinguishable from flat fills
            let shade = ((x + y) / 8) as u8;
            Rgb([color[0].saturating_add(shade), color[1].saturating_add(shade), color[2].saturating_add(shade)])
        });
        let mut png = Vec::new();
        img.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .map_err(|e| GeminiError::Other(e.to_string()))?;
        info!("📦 Generated placeholder image ({} bytes)", png.len());
        Ok(to_data_url(&png, "image/png"))
    }
}

#[async_trait]
impl StudioModel for GeminiClient {
    async fn remove_background(&self, image: &Attachment) -> Result<Attachment, GeminiError> {
        if self.is_demo() {
            info!("Using demo mode - returning the image unchanged");
            return Ok(Attachment::new("isolated-product.png", image.media_type.clone(), image.data.clone()));
        }
        let parts = [ContentPart::inline(image), ContentPart::Text(REMOVE_BACKGROUND_PROMPT.into())];
        let src = self.generate_image_part(&parts).await?;
        Attachment::from_data_url(&src, "isolated-product.png").map_err(|e| GeminiError::Other(e.to_string()))
    }

    async fn enhance_image(&self, image: &Attachment) -> Result<Attachment, GeminiError> {
        if self.is_demo() {
            info!("Using demo mode - returning the image unchanged");
            return Ok(Attachment::new("enhanced-product.png", image.media_type.clone(), image.data.clone()));
        }
        let parts = [ContentPart::inline(image), ContentPart::Text(ENHANCE_IMAGE_PROMPT.into())];
        let src = self.generate_image_part(&parts).await?;
        Attachment::from_data_url(&src, "enhanced-product.png").map_err(|e| GeminiError::Other(e.to_string()))
    }

    async fn categorize_product(&self, image: &Attachment) -> Result<String, GeminiError> {
        if self.is_demo() {
            return Ok("General".to_string());
        }
        #[derive(Deserialize)]
        struct Reply { #[serde(default)] category: Option<String> }

        let parts = [ContentPart::inline(image), ContentPart::Text(CATEGORIZE_PROMPT.into())];
        let schema = json!({
            "type": "OBJECT",
            "properties": {
                "category": { "type": "STRING", "description": "The primary category of the product." }
            },
            "required": ["category"]
        });
        let reply: Reply = self.generate_json(&parts, schema).await?;
        reply
            .category
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| GeminiError::Other("Failed to categorize product.".into()))
    }

    async fn enhance_prompt(&self, draft: &str, product_context: &str) -> Result<String, GeminiError> {
        if self.is_demo() {
            return Ok(format!("{draft}. Soft natural light, balanced composition, photorealistic detail."));
        }
        let prompt = format!(
            "You are a world-class photography prompt engineer for an image generation AI. Your task is to take a user's simple idea and a product context, then rewrite it into a highly detailed and effective prompt.\n\n\
            **Instructions:**\n\
            1.  Retain the user's core idea.\n\
            2.  Incorporate the product context seamlessly.\n\
            3.  Add rich, descriptive details about:\n\
            \x20   -   **Lighting:** (e.g., soft morning light, dramatic cinematic lighting, golden hour glow)\n\
            \x20   -   **Composition:** (e.g., minimalist, rule of thirds, dynamic angle, flat lay)\n\
            \x20   -   **Mood & Atmosphere:** (e.g., serene and calming, energetic and vibrant, luxurious and sophisticated)\n\
            \x20   -   **Style:** (e.g., photorealistic, cinematic, high-fashion editorial)\n\
            4.  The final prompt should be a single, coherent paragraph.\n\n\
            **Product Context:** \"{product_context}\"\n\
            **User's Draft Prompt:** \"{draft}\"\n\n\
            Rewrite the prompt now."
        );
        let parsed = self.generate_content(&self.text_model, &[ContentPart::Text(prompt)], OutputShape::Text).await?;
        Ok(extract_text(&parsed)
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| draft.to_string()))
    }

    async fn generate_captions(&self, product: &str, style_name: &str) -> Result<Vec<String>, GeminiError> {
        if self.is_demo() {
            return Ok(vec![
                format!("Meet your new favourite: {product} ✨ Shop now!"),
                format!("{style_name} vibes, everyday quality 📸 Tap to order."),
                format!("Treat yourself to {product} today 🛍️ Link in bio!"),
            ]);
        }
        #[derive(Deserialize)]
        struct Reply { captions: Vec<String> }

        let prompt = format!(
            "You are a savvy e-commerce marketing expert. Write 3 compelling and short social media captions for the following product.\n\
            Product: \"{product}\"\n\
            Photo Style: \"{style_name}\"\n\
            Rules:\n\
            - Keep them short and punchy.\n\
            - Use relevant emojis.\n\
            - End with a call to action."
        );
        let schema = json!({
            "type": "OBJECT",
            "properties": {
                "captions": {
                    "type": "ARRAY",
                    "items": { "type": "STRING" },
                    "description": "An array of 3 unique social media captions."
                }
            },
            "required": ["captions"]
        });
        let reply: Reply = self.generate_json(&[ContentPart::Text(prompt)], schema).await?;
        Ok(reply.captions)
    }

    async fn recommend_styles(
        &self,
        image: Option<&Attachment>,
        description: &str,
        styles: &[StyleCandidate],
    ) -> Result<Vec<String>, GeminiError> {
        if self.is_demo() {
            return Ok(styles.iter().take(3).map(|s| s.id.clone()).collect());
        }
        let style_list = serde_json::to_string_pretty(styles).map_err(|e| GeminiError::Other(e.to_string()))?;
        let mut text = String::new();
        if !description.is_empty() {
            text.push_str(&format!("The product is: \"{description}\"\n\n"));
        }
        text.push_str(&format!(
            "You are an expert art director for product photography. Your task is to recommend the 3 most suitable photography styles for a given product.\n\n\
            **Instructions:**\n\
            1.  Analyze the provided product (from the image or text description).\n\
            2.  Identify the product's category (e.g., beverage, food, fashion, cosmetics, electronics).\n\
            3.  From the list of available styles below, choose the 3 most suitable and commercially viable options.\n\
            4.  **Heavily prioritize specialized styles that match the product's category.**\n\
            5.  Return only the unique IDs of your top 3 choices. Do not repeat IDs.\n\n\
            **Available Styles (with Name and ID):**\n{style_list}\n"
        ));

        let mut parts = Vec::with_capacity(2);
        if let Some(image) = image {
            parts.push(ContentPart::inline(image));
        }
        parts.push(ContentPart::Text(text));

        let schema = json!({
            "type": "OBJECT",
            "properties": {
                "recommendations": {
                    "type": "ARRAY",
                    "items": { "type": "STRING" },
                    "description": "An array of the three most suitable style IDs from the provided list."
                }
            },
            "required": ["recommendations"]
        });
        // Parsed loosely: non-string items are dropped rather than failing the whole reply.
        let reply: Value = self.generate_json(&parts, schema).await?;
        Ok(reply
            .get("recommendations")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(Value::as_str).map(str::to_string).collect())
            .unwrap_or_default())
    }

    async fn generate_image(&self, request: &ImageRequest) -> Result<GeneratedImage, GeminiError> {
        let src = if self.is_demo() {
            info!("Using demo mode - no real images generated");
            self.demo_image(&request.prompt)?
        } else {
            info!("🎯 Generating image with prompt: {}", preview(&request.prompt));
            self.generate_image_part(&request.parts).await.inspect_err(|e| {
                warn!("❌ Failed to generate image: {}", e);
            })?
        };
        Ok(GeneratedImage { src, prompt: request.prompt.clone() })
    }

    async fn generate_mockup(&self, image: &Attachment, prompt: &str) -> Result<GeneratedImage, GeminiError> {
        let src = if self.is_demo() {
            self.demo_image(prompt)?
        } else {
            let text = format!(
                "Create a realistic product mockup. {prompt} The product provided in the image must be the main subject, integrated naturally into the scene."
            );
            self.generate_image_part(&[ContentPart::inline(image), ContentPart::Text(text)]).await?
        };
        Ok(GeneratedImage { src, prompt: prompt.to_string() })
    }
}

// --- Response Parsing Helpers ---

#[derive(Debug, Deserialize)]
pub(crate) struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate { #[serde(default)] content: Content }

#[derive(Debug, Deserialize, Default)]
struct Content { #[serde(default)] parts: Vec<Part> }

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Part {
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: InlineData
    },
    Text { text: String },
    #[allow(dead_code)]
    Other(Value)
}

#[derive(Debug, Deserialize)]
struct InlineData {
    data: String,
    #[serde(rename = "mimeType")]
    mime_type: String,
}

/// First inline image of the first candidate, as a `data:` URL.
fn extract_first_image(resp: &GeminiResponse) -> Option<String> {
    let candidate = resp.candidates.first()?;
    candidate.content.parts.iter().find_map(|p| match p {
        Part::Inline { inline_data } => {
            info!("🎯 Found image data with mime type: {}", inline_data.mime_type);
            Some(format!("data:{};base64,{}", inline_data.mime_type, inline_data.data))
        }
        _ => None,
    })
}

fn extract_text(resp: &GeminiResponse) -> Option<String> {
    let candidate = resp.candidates.first()?;
    let text: String = candidate
        .content
        .parts
        .iter()
        .filter_map(|p| match p {
            Part::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect();
    (!text.is_empty()).then_some(text)
}
