//! Per-client controller.
//!
//! A `Studio` owns one [`WorkflowState`] and is the only thing that mutates it.
//! User actions call a transition, persist the result and spawn whatever
//! background work the transition asked for. Background results come back
//! through the same transitions, carrying their ticket.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::{
    advisor,
    error::{Result, SessionError, WorkflowError},
    gemini::StudioModel,
    models::{Attachment, GeneratedImage, ManualSettings, Step, WorkflowView},
    orchestrator::{self, run_batch},
    prompt::GenerationPlan,
    session::{self, SavedResults, SessionSnapshot, SessionStore, StorageKeys},
    workflow::{Effect, Ticket, WorkflowState},
};

pub struct Studio {
    state: Mutex<WorkflowState>,
    model: Arc<dyn StudioModel>,
    store: Arc<dyn SessionStore>,
    keys: StorageKeys,
    /// Held across a whole snapshot write so writes land in mutation order.
    persist_lock: tokio::sync::Mutex<()>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Studio {
    /// Hydrates from `store` and resumes the background work the restored step implies.
    pub async fn open(model: Arc<dyn StudioModel>, store: Arc<dyn SessionStore>, keys: StorageKeys) -> Arc<Self> {
        let mut state = session::hydrate(store.as_ref(), &keys).await;
        let effects = state.recommendation_effects();
        let studio = Arc::new(Self {
            state: Mutex::new(state),
            model,
            store,
            keys,
            persist_lock: tokio::sync::Mutex::new(()),
            tasks: Mutex::new(Vec::new()),
        });
        studio.spawn_effects(effects);
        studio
    }

    pub fn view(&self) -> WorkflowView {
        self.state.lock().view()
    }

    /// Runs a synchronous transition and persists the outcome.
    async fn apply<T>(&self, transition: impl FnOnce(&mut WorkflowState) -> Result<T, WorkflowError>) -> Result<T> {
        let outcome = {
            let mut state = self.state.lock();
            transition(&mut *state)
        };
        self.persist().await;
        Ok(outcome?)
    }

    async fn apply_with_effects(
        self: &Arc<Self>,
        transition: impl FnOnce(&mut WorkflowState) -> Result<Vec<Effect>, WorkflowError>,
    ) -> Result<WorkflowView> {
        let effects = self.apply(transition).await?;
        self.spawn_effects(effects);
        Ok(self.view())
    }

    // --- upload step ---

    pub async fn upload(self: &Arc<Self>, upload: Attachment) -> Result<WorkflowView> {
        self.apply_with_effects(|s| s.upload_image(upload)).await
    }

    pub async fn enhance_image(&self) -> Result<WorkflowView> {
        let (ticket, upload) = self.state.lock().begin_enhance()?;
        info!("✨ Enhancing {}", upload.name);
        let result = self.model.enhance_image(&upload).await;
        let applied = self.state.lock().finish_enhance(ticket, result);
        if applied {
            self.persist().await;
        }
        Ok(self.view())
    }

    pub async fn remove_background(self: &Arc<Self>) -> Result<WorkflowView> {
        let (ticket, working) = self.state.lock().begin_remove_background()?;
        info!("✂️ Removing background from {}", working.name);
        let result = self.model.remove_background(&working).await;
        let effects = self.state.lock().finish_remove_background(ticket, result);
        self.persist().await;
        self.spawn_effects(effects);
        Ok(self.view())
    }

    pub async fn submit_description(self: &Arc<Self>, description: &str) -> Result<WorkflowView> {
        self.apply_with_effects(|s| s.submit_description(description)).await
    }

    // --- style selection step ---

    pub async fn select_style(&self, style_id: &str) -> Result<WorkflowView> {
        self.apply(|s| s.select_style(style_id)).await?;
        Ok(self.view())
    }

    pub async fn set_custom_prompt(&self, prompt: &str) -> Result<WorkflowView> {
        self.apply(|s| s.set_custom_prompt(prompt)).await?;
        Ok(self.view())
    }

    pub async fn set_manual_settings(&self, settings: ManualSettings) -> Result<WorkflowView> {
        self.apply(|s| s.set_manual_settings(settings)).await?;
        Ok(self.view())
    }

    pub async fn set_reference(&self, reference: Option<Attachment>) -> Result<WorkflowView> {
        self.apply(|s| s.set_reference(reference)).await?;
        Ok(self.view())
    }

    pub async fn set_negative_prompt(&self, negative_prompt: &str) -> Result<WorkflowView> {
        self.apply(|s| s.set_negative_prompt(negative_prompt)).await?;
        Ok(self.view())
    }

    pub async fn enhance_prompt(&self) -> Result<WorkflowView> {
        let begun = self.state.lock().begin_prompt_enhance()?;
        let Some((ticket, draft, context)) = begun else {
            return Ok(self.view());
        };
        let enhanced = match self.model.enhance_prompt(&draft, &context).await {
            Ok(text) => Some(text),
            Err(e) => {
                warn!("Failed to enhance prompt: {}", e);
                None
            }
        };
        let applied = self.state.lock().finish_prompt_enhance(ticket, enhanced);
        if applied {
            self.persist().await;
        }
        Ok(self.view())
    }

    // --- generation ---

    async fn begin_batch(&self) -> Result<(Ticket, GenerationPlan)> {
        let begun = self.state.lock().begin_generation();
        // either way the step changed: results clear the in-progress slot, a refusal rewrites it
        self.persist().await;
        Ok(begun?)
    }

    async fn fill_batch(self: Arc<Self>, ticket: Ticket, plan: GenerationPlan) {
        let summary = run_batch(self.model.clone(), &plan, |index, image| {
            self.state.lock().fill_slot(ticket, index, image);
        })
        .await;
        let finished = self.state.lock().finish_generation(ticket);
        if finished && summary.succeeded == 0 {
            error!("Every image in the batch failed to generate");
        }
    }

    /// Moves to results and fills the slots in the background.
    pub async fn start_generation(self: &Arc<Self>) -> Result<WorkflowView> {
        let (ticket, plan) = self.begin_batch().await?;
        let handle = tokio::spawn(self.clone().fill_batch(ticket, plan));
        self.tasks.lock().push(handle);
        Ok(self.view())
    }

    /// Like [`Studio::start_generation`], but returns once every slot has settled.
    pub async fn generate(self: &Arc<Self>) -> Result<WorkflowView> {
        let (ticket, plan) = self.begin_batch().await?;
        self.clone().fill_batch(ticket, plan).await;
        Ok(self.view())
    }

    pub async fn regenerate_image(&self, index: usize) -> Result<WorkflowView> {
        let (ticket, plan) = self.state.lock().begin_regenerate(index)?;
        let image = orchestrator::regenerate_slot(self.model.as_ref(), &plan, index).await;
        self.state.lock().finish_regenerate(ticket, index, image);
        Ok(self.view())
    }

    // --- results step ---

    pub async fn generate_captions(&self) -> Result<WorkflowView> {
        let begun = self.state.lock().begin_captions();
        let Some((ticket, context, style_name)) = begun else {
            return Ok(self.view());
        };
        let captions = match self.model.generate_captions(&context, &style_name).await {
            Ok(captions) => Some(captions),
            Err(e) => {
                error!("Failed to generate captions: {}", e);
                None
            }
        };
        self.state.lock().finish_captions(ticket, captions);
        Ok(self.view())
    }

    pub async fn change_style(self: &Arc<Self>) -> Result<WorkflowView> {
        self.apply_with_effects(WorkflowState::change_style).await
    }

    pub async fn generate_mockup(&self, mockup_id: &str) -> Result<GeneratedImage> {
        let (mockup, image) = self.state.lock().mockup_source(mockup_id)?;
        info!("👕 Generating {} mockup", mockup.name);
        Ok(self.model.generate_mockup(&image, mockup.prompt).await?)
    }

    /// Stores the completed results so the next visit opens straight into them.
    pub async fn save_results(&self) -> Result<WorkflowView> {
        let saved = {
            let state = self.state.lock();
            if state.step() != Step::Results {
                return Err(WorkflowError::WrongStep { expected: Step::Results, actual: state.step() }.into());
            }
            SavedResults::capture(&state)
        };
        if let Some(saved) = saved {
            let text = serde_json::to_string(&saved).map_err(SessionError::from)?;
            let _write = self.persist_lock.lock().await;
            self.store.set(&self.keys.saved_results, text).await.map_err(SessionError::from)?;
            info!("💾 Saved {} generated images", saved.generated_images.len());
        }
        Ok(self.view())
    }

    /// Back to a blank upload step; both storage slots are purged.
    pub async fn reset(&self) -> WorkflowView {
        let _write = self.persist_lock.lock().await;
        self.state.lock().reset();
        session::clear(self.store.as_ref(), &self.keys).await;
        self.view()
    }

    // --- background work ---

    fn spawn_effects(self: &Arc<Self>, effects: Vec<Effect>) {
        if effects.is_empty() {
            return;
        }
        let mut tasks = self.tasks.lock();
        tasks.retain(|handle| !handle.is_finished());
        for effect in effects {
            tasks.push(tokio::spawn(self.clone().run_effect(effect)));
        }
    }

    async fn run_effect(self: Arc<Self>, effect: Effect) {
        match effect {
            Effect::Categorize { ticket, image } => {
                let category = match self.model.categorize_product(&image).await {
                    Ok(category) if !category.trim().is_empty() => Some(category.trim().to_string()),
                    Ok(_) => {
                        warn!("Categorization returned an empty category");
                        None
                    }
                    Err(e) => {
                        warn!("Failed to categorize product: {}", e);
                        None
                    }
                };
                let applied = self.state.lock().finish_categorization(ticket, category);
                if applied {
                    self.persist().await;
                }
            }
            Effect::Recommend { ticket, image, description } => {
                let picks = advisor::recommend(self.model.as_ref(), image.as_ref(), &description).await;
                self.state.lock().finish_recommendation(ticket, picks);
            }
        }
    }

    /// Waits until every spawned task, including ones spawned meanwhile, has settled.
    pub async fn wait_for_background(&self) {
        loop {
            let pending = std::mem::take(&mut *self.tasks.lock());
            if pending.is_empty() {
                return;
            }
            for handle in pending {
                if let Err(e) = handle.await {
                    error!("Background task aborted: {}", e);
                }
            }
        }
    }

    // --- persistence ---

    /// Rewrites the in-progress slot from the current state, or clears it while
    /// results are showing. Failures are logged.
    async fn persist(&self) {
        let _write = self.persist_lock.lock().await;
        if let Err(e) = self.write_snapshot().await {
            warn!("Failed to persist session: {}", e);
        }
    }

    async fn write_snapshot(&self) -> Result<(), SessionError> {
        let snapshot = {
            let state = self.state.lock();
            (state.step() != Step::Results).then(|| SessionSnapshot::capture(&state))
        };
        match snapshot {
            None => self.store.remove(&self.keys.session).await?,
            Some(snapshot) => {
                let text = serde_json::to_string(&snapshot)?;
                self.store.set(&self.keys.session, text).await?;
                // an in-progress session supersedes any saved results
                self.store.remove(&self.keys.saved_results).await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::StudioError,
        models::Lighting,
        session::InMemoryStore,
        testing::{png, FakeModel},
        workflow::ENHANCE_FAILED,
    };
    use pretty_assertions::assert_eq;
    use tokio::sync::Semaphore;

    async fn open(model: FakeModel) -> (Arc<Studio>, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        let studio = Studio::open(Arc::new(model), store.clone(), StorageKeys::default()).await;
        (studio, store)
    }

    async fn stored_snapshot(store: &InMemoryStore) -> Option<SessionSnapshot> {
        let text = store.get(session::SESSION_KEY).await.unwrap()?;
        Some(serde_json::from_str(&text).unwrap())
    }

    #[tokio::test]
    async fn text_product_runs_through_to_results() {
        let model = FakeModel { recommendations: vec!["lifestyle".into(), "custom".into()], ..Default::default() };
        let (studio, store) = open(model).await;

        studio.submit_description("a ceramic pour-over dripper").await.unwrap();
        studio.wait_for_background().await;
        let view = studio.view();
        assert_eq!(view.step, Step::StyleSelection);
        assert_eq!(view.recommended_style_ids, vec!["lifestyle".to_string()]);
        assert_eq!(stored_snapshot(&store).await.unwrap().product_description, "a ceramic pour-over dripper");

        studio.select_style("lifestyle").await.unwrap();
        let view = studio.generate().await.unwrap();
        assert_eq!(view.step, Step::Results);
        assert!(!view.is_loading);
        assert!(view.generated_images.iter().all(Option::is_some));
        // the in-progress slot is gone once results are showing
        assert!(stored_snapshot(&store).await.is_none());
    }

    #[tokio::test]
    async fn refused_generation_stays_in_style_selection() {
        let (studio, _) = open(FakeModel::default()).await;
        studio.submit_description("a candle").await.unwrap();
        studio.select_style("custom").await.unwrap();

        let err = studio.start_generation().await.unwrap_err();
        assert!(matches!(err, StudioError::Workflow(WorkflowError::MissingCustomPrompt)));
        let view = studio.view();
        assert_eq!(view.step, Step::StyleSelection);
        assert!(view.generated_images.is_empty());
        assert_eq!(view.error, Some(WorkflowError::MissingCustomPrompt.to_string()));
    }

    #[tokio::test]
    async fn reset_discards_late_categorization() {
        let gate = Arc::new(Semaphore::new(0));
        let model = FakeModel { gate: Some(gate.clone()), category: Some("Kitchen".into()), ..Default::default() };
        let (studio, store) = open(model).await;

        studio.upload(png("kettle.png")).await.unwrap();
        assert!(studio.view().is_categorizing);
        studio.reset().await;
        gate.add_permits(1);
        studio.wait_for_background().await;

        let view = studio.view();
        assert_eq!(view.step, Step::Upload);
        assert_eq!(view.product_category, "");
        assert!(!view.is_categorizing);
        assert!(stored_snapshot(&store).await.is_none());
    }

    #[tokio::test]
    async fn upload_categorizes_in_the_background() {
        let model = FakeModel { category: Some(" Home Goods ".into()), ..Default::default() };
        let (studio, store) = open(model).await;
        studio.upload(png("lamp.png")).await.unwrap();
        studio.wait_for_background().await;
        assert_eq!(studio.view().product_category, "Home Goods");
        assert_eq!(stored_snapshot(&store).await.unwrap().product_category, "Home Goods");
    }

    #[tokio::test]
    async fn enhancement_failure_is_surfaced() {
        let (studio, _) = open(FakeModel { fail_side_calls: true, ..Default::default() }).await;
        studio.upload(png("shoe.png")).await.unwrap();
        let view = studio.enhance_image().await.unwrap();
        assert_eq!(view.error.as_deref(), Some(ENHANCE_FAILED));
        assert!(!view.has_enhanced_image);
        assert_eq!(view.step, Step::Upload);
    }

    #[tokio::test]
    async fn session_survives_reopen() {
        let (studio, store) = open(FakeModel::default()).await;
        studio.upload(png("bottle.png")).await.unwrap();
        studio.remove_background().await.unwrap();
        studio.select_style("manual").await.unwrap();
        studio
            .set_manual_settings(ManualSettings { background: "".into(), lighting: Lighting::Dramatic, props: "ice cubes".into() })
            .await
            .unwrap();
        studio.wait_for_background().await;

        let reopened = Studio::open(Arc::new(FakeModel::default()), store.clone(), StorageKeys::default()).await;
        let (before, after) = (studio.view(), reopened.view());
        assert_eq!(after.step, Step::StyleSelection);
        assert_eq!(after.selected_style_id, before.selected_style_id);
        assert_eq!(after.manual_settings, before.manual_settings);
        assert_eq!(after.isolated_src, before.isolated_src);
        assert_eq!(after.uploaded_file_name.as_deref(), Some("bottle.png"));
    }

    #[tokio::test]
    async fn saved_results_reopen_into_results() {
        let (studio, store) = open(FakeModel::default()).await;
        studio.upload(png("bag.png")).await.unwrap();
        studio.remove_background().await.unwrap();
        studio.select_style("luxury").await.unwrap();
        studio.generate().await.unwrap();
        studio.generate_captions().await.unwrap();
        studio.save_results().await.unwrap();

        let reopened = Studio::open(Arc::new(FakeModel::default()), store.clone(), StorageKeys::default()).await;
        let view = reopened.view();
        assert_eq!(view.step, Step::Results);
        assert_eq!(view.generated_images, studio.view().generated_images);
        assert_eq!(view.generated_captions.len(), 1);

        // leaving results writes an in-progress session and drops the saved one
        reopened.change_style().await.unwrap();
        assert!(store.get(session::SAVED_RESULTS_KEY).await.unwrap().is_none());
        assert!(stored_snapshot(&store).await.is_some());
    }

    #[tokio::test]
    async fn change_style_drops_in_flight_batch() {
        let model = FakeModel { image_delays_ms: vec![30, 30, 30, 30], ..Default::default() };
        let (studio, _) = open(model).await;
        studio.submit_description("a silk scarf").await.unwrap();
        studio.select_style("fashion-editorial").await.unwrap();
        studio.start_generation().await.unwrap();
        assert!(studio.view().is_loading);

        studio.change_style().await.unwrap();
        studio.wait_for_background().await;
        let view = studio.view();
        assert_eq!(view.step, Step::StyleSelection);
        assert!(view.generated_images.iter().all(Option::is_none));
    }

    #[tokio::test]
    async fn regenerate_and_mockup() {
        let (studio, _) = open(FakeModel { failing_image_calls: vec![2], ..Default::default() }).await;
        studio.upload(png("watch.png")).await.unwrap();
        studio.remove_background().await.unwrap();
        studio.select_style("studio-white").await.unwrap();
        let view = studio.generate().await.unwrap();
        let empty: Vec<usize> = (0..view.generated_images.len()).filter(|&i| view.generated_images[i].is_none()).collect();
        assert_eq!(empty.len(), 1);

        let view = studio.regenerate_image(empty[0]).await.unwrap();
        assert!(view.generated_images.iter().all(Option::is_some));
        assert!(matches!(
            studio.regenerate_image(7).await.unwrap_err(),
            StudioError::Workflow(WorkflowError::SlotOutOfRange(7))
        ));

        let mockup = studio.generate_mockup("phone").await.unwrap();
        assert!(mockup.src.starts_with("data:image/png;base64,"));
    }

    #[tokio::test]
    async fn save_requires_results() {
        let (studio, _) = open(FakeModel::default()).await;
        assert!(matches!(
            studio.save_results().await.unwrap_err(),
            StudioError::Workflow(WorkflowError::WrongStep { expected: Step::Results, .. })
        ));
    }
}
