//! Style recommendation advisor.

use std::collections::HashSet;

use tracing::{info, warn};

use crate::{
    gemini::StudioModel,
    models::Attachment,
    styles::{eligible_candidates, StyleCandidate},
};

pub const MAX_RECOMMENDATIONS: usize = 3;

/// Keeps only eligible ids, first occurrence wins, at most three.
pub fn sanitize_recommendations(raw: Vec<String>, eligible: &[StyleCandidate]) -> Vec<String> {
    let allowed: HashSet<&str> = eligible.iter().map(|c| c.id.as_str()).collect();
    let mut seen = HashSet::new();
    raw.into_iter()
        .map(|id| id.trim().to_string())
        .filter(|id| allowed.contains(id.as_str()))
        .filter(|id| seen.insert(id.clone()))
        .take(MAX_RECOMMENDATIONS)
        .collect()
}

/// Ranked style ids for the product. Never fails: any error means "no recommendation".
pub async fn recommend(model: &dyn StudioModel, image: Option<&Attachment>, description: &str) -> Vec<String> {
    let eligible = eligible_candidates();
    match model.recommend_styles(image, description, &eligible).await {
        Ok(raw) => {
            let picks = sanitize_recommendations(raw, &eligible);
            info!("✨ Recommended styles: {:?}", picks);
            picks
        }
        Err(e) => {
            warn!("Failed to fetch style recommendations: {}", e);
            Vec::new()
        }
    }
}
