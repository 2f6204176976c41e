//! Fan-out / fan-in of image generation calls.

use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::{gemini::StudioModel, models::GeneratedImage, prompt::GenerationPlan};

/// Number of images produced per generation batch.
pub const BATCH_SIZE: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchSummary {
    pub succeeded: usize,
    pub failed: usize,
}

/// Issues `BATCH_SIZE` concurrent calls for the same plan.
///
/// `on_image` is invoked once per successful call, as soon as it settles, with the
/// index the call was issued under. Failed calls are logged and leave their slot alone.
/// Returns once every call has settled.
pub async fn run_batch<F>(model: Arc<dyn StudioModel>, plan: &GenerationPlan, mut on_image: F) -> BatchSummary
where
    F: FnMut(usize, GeneratedImage),
{
    let request = Arc::new(plan.request());
    let mut calls = JoinSet::new();
    for index in 0..BATCH_SIZE {
        let model = model.clone();
        let request = request.clone();
        calls.spawn(async move { (index, model.generate_image(&request).await) });
    }
    info!("🚀 Issued {} image generation calls", BATCH_SIZE);

    let mut summary = BatchSummary::default();
    while let Some(joined) = calls.join_next().await {
        match joined {
            Ok((index, Ok(image))) => {
                info!("✅ Image {} generated", index);
                summary.succeeded += 1;
                on_image(index, image);
            }
            Ok((index, Err(e))) => {
                warn!("❌ Image {} failed to generate: {}", index, e);
                summary.failed += 1;
            }
            Err(e) => {
                error!("❌ Image generation task aborted: {}", e);
                summary.failed += 1;
            }
        }
    }
    info!("Batch settled: {} succeeded, {} failed", summary.succeeded, summary.failed);
    summary
}

/// One more call with the same plan, for a single slot.
pub async fn regenerate_slot(model: &dyn StudioModel, plan: &GenerationPlan, index: usize) -> Option<GeneratedImage> {
    match model.generate_image(&plan.request()).await {
        Ok(image) => {
            info!("✅ Slot {} regenerated", index);
            Some(image)
        }
        Err(e) => {
            error!("Single image regeneration failed for slot {}: {}", index, e);
            None
        }
    }
}
