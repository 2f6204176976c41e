//! Scriptable stand-in for the remote model.

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use tokio::sync::Semaphore;

use crate::{
    attachment::to_data_url,
    gemini::{GeminiError, ImageRequest, StudioModel},
    models::{Attachment, GeneratedImage},
    styles::StyleCandidate,
};

#[derive(Default)]
pub struct FakeModel {
    /// Image calls started so far; the n-th call (0-based, start order) uses index n below.
    pub image_calls: AtomicUsize,
    pub image_delays_ms: Vec<u64>,
    pub failing_image_calls: Vec<usize>,
    pub fail_side_calls: bool,
    pub recommendations: Vec<String>,
    pub category: Option<String>,
    pub captions: Vec<String>,
    /// When set, categorization and recommendation wait for a permit.
    pub gate: Option<Arc<Semaphore>>,
    pub side_calls: AtomicUsize,
}

impl FakeModel {
    async fn side_call(&self) -> Result<(), GeminiError> {
        self.side_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate closed").forget();
        }
        if self.fail_side_calls {
            return Err(GeminiError::Http("status=500".into()));
        }
        Ok(())
    }
}

pub fn png(name: &str) -> Attachment {
    Attachment::new(name, "image/png", b"\x89PNG\r\n\x1a\nfake".to_vec())
}

#[async_trait]
impl StudioModel for FakeModel {
    async fn remove_background(&self, image: &Attachment) -> Result<Attachment, GeminiError> {
        self.side_call().await?;
        Ok(Attachment::new("isolated-product.png", "image/png", image.data.clone()))
    }

    async fn enhance_image(&self, image: &Attachment) -> Result<Attachment, GeminiError> {
        self.side_call().await?;
        Ok(Attachment::new("enhanced-product.png", "image/png", image.data.clone()))
    }

    async fn categorize_product(&self, _image: &Attachment) -> Result<String, GeminiError> {
        self.side_call().await?;
        self.category.clone().ok_or_else(|| GeminiError::Other("Failed to categorize product.".into()))
    }

    async fn enhance_prompt(&self, draft: &str, product_context: &str) -> Result<String, GeminiError> {
        self.side_call().await?;
        Ok(format!("{draft}, styled for {product_context}"))
    }

    async fn generate_captions(&self, product: &str, _style_name: &str) -> Result<Vec<String>, GeminiError> {
        self.side_call().await?;
        if self.captions.is_empty() {
            return Ok(vec![format!("Buy {product} now!")]);
        }
        Ok(self.captions.clone())
    }

    async fn recommend_styles(
        &self,
        _image: Option<&Attachment>,
        _description: &str,
        _styles: &[StyleCandidate],
    ) -> Result<Vec<String>, GeminiError> {
        self.side_call().await?;
        Ok(self.recommendations.clone())
    }

    async fn generate_image(&self, request: &ImageRequest) -> Result<GeneratedImage, GeminiError> {
        let n = self.image_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(ms) = self.image_delays_ms.get(n) {
            tokio::time::sleep(Duration::from_millis(*ms)).await;
        }
        if self.failing_image_calls.contains(&n) {
            return Err(GeminiError::NoImage);
        }
        Ok(GeneratedImage { src: to_data_url(&[n as u8], "image/png"), prompt: request.prompt.clone() })
    }

    async fn generate_mockup(&self, _image: &Attachment, prompt: &str) -> Result<GeneratedImage, GeminiError> {
        self.side_call().await?;
        Ok(GeneratedImage { src: to_data_url(b"mockup", "image/png"), prompt: prompt.to_string() })
    }
}
