//! Workflow state machine.
//!
//! `WorkflowState` is the single source of truth for a session. It is only changed
//! through the transition methods below; remote work is described by returned
//! [`Effect`]s and reported back through `finish_*` methods carrying the [`Ticket`]
//! the work was issued under. A ticket goes stale as soon as a later transition
//! supersedes it, and stale results are dropped.

use tracing::{debug, info};

use crate::{
    error::WorkflowError,
    gemini::GeminiError,
    models::{
        Attachment, GeneratedCaption, GeneratedImage, ImageInput, ManualSettings, ProductInput, ProductSubject,
        Step, WorkflowView,
    },
    orchestrator::BATCH_SIZE,
    prompt::{GenerationPlan, PlanInputs},
    styles::{find_mockup, find_style, MockupOption, StyleOption},
};

pub const ENHANCE_FAILED: &str = "Image enhancement failed. Please try again.";
pub const BACKGROUND_REMOVAL_FAILED: &str = "Background removal failed. Please try a different image.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    Categorize,
    Recommend,
    Process,
    Batch,
    Captions,
    PromptEnhance,
}

/// Identifies one piece of in-flight remote work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    kind: TaskKind,
    generation: u64,
}

#[derive(Debug, Clone, Default)]
struct Tickets {
    categorize: u64,
    recommend: u64,
    process: u64,
    batch: u64,
    captions: u64,
    prompt_enhance: u64,
}

impl Tickets {
    fn slot(&mut self, kind: TaskKind) -> &mut u64 {
        match kind {
            TaskKind::Categorize => &mut self.categorize,
            TaskKind::Recommend => &mut self.recommend,
            TaskKind::Process => &mut self.process,
            TaskKind::Batch => &mut self.batch,
            TaskKind::Captions => &mut self.captions,
            TaskKind::PromptEnhance => &mut self.prompt_enhance,
        }
    }

    fn issue(&mut self, kind: TaskKind) -> Ticket {
        let slot = self.slot(kind);
        *slot += 1;
        Ticket { kind, generation: *slot }
    }

    fn current(&self, kind: TaskKind) -> Ticket {
        let generation = match kind {
            TaskKind::Categorize => self.categorize,
            TaskKind::Recommend => self.recommend,
            TaskKind::Process => self.process,
            TaskKind::Batch => self.batch,
            TaskKind::Captions => self.captions,
            TaskKind::PromptEnhance => self.prompt_enhance,
        };
        Ticket { kind, generation }
    }

    fn is_current(&self, ticket: Ticket) -> bool {
        self.current(ticket.kind) == ticket
    }

    fn invalidate(&mut self, kind: TaskKind) {
        *self.slot(kind) += 1;
    }

    fn invalidate_all(&mut self) {
        for kind in [
            TaskKind::Categorize,
            TaskKind::Recommend,
            TaskKind::Process,
            TaskKind::Batch,
            TaskKind::Captions,
            TaskKind::PromptEnhance,
        ] {
            self.invalidate(kind);
        }
    }
}

/// Fire-and-forget work requested by a transition. Never gates the transition itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Categorize { ticket: Ticket, image: Attachment },
    Recommend { ticket: Ticket, image: Option<Attachment>, description: String },
}

/// Inputs recovered from persisted storage.
#[derive(Debug, Clone, Default)]
pub struct RestoredSession {
    pub step: Step,
    pub product: Option<ProductInput>,
    pub selected_style: Option<&'static StyleOption>,
    pub custom_prompt: String,
    pub manual: ManualSettings,
    pub reference: Option<Attachment>,
    pub negative_prompt: String,
    pub category: String,
    pub generated_images: Vec<Option<GeneratedImage>>,
    pub captions: Vec<GeneratedCaption>,
}

#[derive(Debug, Clone, Default)]
pub struct WorkflowState {
    step: Step,
    product: Option<ProductInput>,
    selected_style: Option<&'static StyleOption>,
    custom_prompt: String,
    manual: ManualSettings,
    reference: Option<Attachment>,
    negative_prompt: String,
    category: String,
    recommended: Vec<String>,
    generated_images: Vec<Option<GeneratedImage>>,
    regenerating: Vec<bool>,
    captions: Vec<GeneratedCaption>,
    error: Option<String>,
    is_loading: bool,
    is_categorizing: bool,
    is_recommending: bool,
    is_processing: bool,
    is_generating_captions: bool,
    is_enhancing_prompt: bool,
    tickets: Tickets,
}

impl WorkflowState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_restored(restored: RestoredSession) -> Self {
        let regenerating = vec![false; restored.generated_images.len()];
        Self {
            step: restored.step,
            product: restored.product,
            selected_style: restored.selected_style,
            custom_prompt: restored.custom_prompt,
            manual: restored.manual,
            reference: restored.reference,
            negative_prompt: restored.negative_prompt,
            category: restored.category,
            generated_images: restored.generated_images,
            regenerating,
            captions: restored.captions,
            ..Self::default()
        }
    }

    // --- accessors ---

    pub fn step(&self) -> Step { self.step }
    pub fn product(&self) -> Option<&ProductInput> { self.product.as_ref() }
    pub fn selected_style(&self) -> Option<&'static StyleOption> { self.selected_style }
    pub fn custom_prompt(&self) -> &str { &self.custom_prompt }
    pub fn manual_settings(&self) -> &ManualSettings { &self.manual }
    pub fn reference(&self) -> Option<&Attachment> { self.reference.as_ref() }
    pub fn negative_prompt(&self) -> &str { &self.negative_prompt }
    pub fn category(&self) -> &str { &self.category }
    pub fn recommended(&self) -> &[String] { &self.recommended }
    pub fn generated_images(&self) -> &[Option<GeneratedImage>] { &self.generated_images }
    pub fn captions(&self) -> &[GeneratedCaption] { &self.captions }
    pub fn error(&self) -> Option<&str> { self.error.as_deref() }
    pub fn is_loading(&self) -> bool { self.is_loading }

    pub fn description(&self) -> &str {
        self.product.as_ref().and_then(ProductInput::description).unwrap_or_default()
    }

    pub fn isolated_image(&self) -> Option<&Attachment> {
        self.product.as_ref().and_then(ProductInput::image).and_then(|i| i.isolated.as_ref())
    }

    fn subject(&self) -> Option<ProductSubject<'_>> {
        self.product.as_ref().and_then(ProductInput::subject)
    }

    fn image_input_mut(&mut self) -> Option<&mut ImageInput> {
        match self.product.as_mut() {
            Some(ProductInput::Image(img)) => Some(img),
            _ => None,
        }
    }

    fn expect_step(&self, expected: Step) -> Result<(), WorkflowError> {
        if self.step != expected {
            return Err(WorkflowError::WrongStep { expected, actual: self.step });
        }
        Ok(())
    }

    fn plan_inputs(&self) -> PlanInputs<'_> {
        PlanInputs {
            subject: self.subject(),
            style: self.selected_style,
            custom_prompt: &self.custom_prompt,
            manual: &self.manual,
            reference: self.reference.as_ref(),
            negative_prompt: &self.negative_prompt,
        }
    }

    // --- upload step ---

    /// A new upload replaces any previous product input and everything derived from it.
    pub fn upload_image(&mut self, upload: Attachment) -> Result<Vec<Effect>, WorkflowError> {
        self.expect_step(Step::Upload)?;
        info!("📷 New upload: {:?}", upload);
        self.product = Some(ProductInput::Image(ImageInput::new(upload.clone())));
        self.category.clear();
        self.recommended.clear();
        self.error = None;
        self.is_processing = false;
        self.tickets.invalidate(TaskKind::Process);
        self.tickets.invalidate(TaskKind::Recommend);
        self.is_recommending = false;

        let ticket = self.tickets.issue(TaskKind::Categorize);
        self.is_categorizing = true;
        Ok(vec![Effect::Categorize { ticket, image: upload }])
    }

    pub fn finish_categorization(&mut self, ticket: Ticket, category: Option<String>) -> bool {
        if !self.tickets.is_current(ticket) {
            debug!("Dropping stale categorization result");
            return false;
        }
        self.is_categorizing = false;
        if let Some(category) = category {
            self.category = category;
        }
        true
    }

    pub fn begin_enhance(&mut self) -> Result<(Ticket, Attachment), WorkflowError> {
        self.expect_step(Step::Upload)?;
        let upload = self
            .product
            .as_ref()
            .and_then(ProductInput::image)
            .map(|img| img.upload.clone())
            .ok_or(WorkflowError::NothingToProcess)?;
        self.is_processing = true;
        self.error = None;
        Ok((self.tickets.issue(TaskKind::Process), upload))
    }

    pub fn finish_enhance(&mut self, ticket: Ticket, result: Result<Attachment, GeminiError>) -> bool {
        if !self.tickets.is_current(ticket) {
            debug!("Dropping stale enhancement result");
            return false;
        }
        self.is_processing = false;
        match result {
            Ok(enhanced) => {
                if let Some(img) = self.image_input_mut() {
                    img.enhanced = Some(enhanced);
                }
            }
            Err(e) => {
                tracing::error!("Image enhancement failed: {}", e);
                self.error = Some(ENHANCE_FAILED.to_string());
            }
        }
        true
    }

    pub fn begin_remove_background(&mut self) -> Result<(Ticket, Attachment), WorkflowError> {
        self.expect_step(Step::Upload)?;
        let working = self
            .product
            .as_ref()
            .and_then(ProductInput::image)
            .map(|img| img.working_image().clone())
            .ok_or(WorkflowError::NothingToProcess)?;
        self.is_processing = true;
        self.error = None;
        Ok((self.tickets.issue(TaskKind::Process), working))
    }

    /// Success isolates the product and advances to style selection.
    pub fn finish_remove_background(&mut self, ticket: Ticket, result: Result<Attachment, GeminiError>) -> Vec<Effect> {
        if !self.tickets.is_current(ticket) {
            debug!("Dropping stale background removal result");
            return Vec::new();
        }
        self.is_processing = false;
        match result {
            Ok(isolated) => {
                let Some(img) = self.image_input_mut() else { return Vec::new() };
                img.isolated = Some(isolated);
                self.enter_style_selection()
            }
            Err(e) => {
                tracing::error!("Background removal failed: {}", e);
                self.error = Some(BACKGROUND_REMOVAL_FAILED.to_string());
                Vec::new()
            }
        }
    }

    pub fn submit_description(&mut self, description: &str) -> Result<Vec<Effect>, WorkflowError> {
        self.expect_step(Step::Upload)?;
        let description = description.trim();
        if description.is_empty() {
            return Err(WorkflowError::MissingProduct);
        }
        self.product = Some(ProductInput::Text(description.to_string()));
        self.category.clear();
        self.is_categorizing = false;
        self.is_processing = false;
        self.error = None;
        self.tickets.invalidate(TaskKind::Categorize);
        self.tickets.invalidate(TaskKind::Process);
        Ok(self.enter_style_selection())
    }

    fn enter_style_selection(&mut self) -> Vec<Effect> {
        self.step = Step::StyleSelection;
        self.captions.clear();
        self.is_generating_captions = false;
        self.tickets.invalidate(TaskKind::Captions);
        self.recommendation_effects()
    }

    /// Recommendation request for the current product, if there is one to describe.
    pub fn recommendation_effects(&mut self) -> Vec<Effect> {
        self.recommended.clear();
        if self.step != Step::StyleSelection || self.subject().is_none() {
            self.is_recommending = false;
            return Vec::new();
        }
        let ticket = self.tickets.issue(TaskKind::Recommend);
        self.is_recommending = true;
        vec![Effect::Recommend {
            ticket,
            image: self.isolated_image().cloned(),
            description: self.description().to_string(),
        }]
    }

    pub fn finish_recommendation(&mut self, ticket: Ticket, style_ids: Vec<String>) -> bool {
        if !self.tickets.is_current(ticket) {
            debug!("Dropping stale style recommendations");
            return false;
        }
        self.is_recommending = false;
        self.recommended = style_ids;
        true
    }

    // --- style selection step ---

    pub fn select_style(&mut self, style_id: &str) -> Result<(), WorkflowError> {
        self.expect_step(Step::StyleSelection)?;
        let style = find_style(style_id).ok_or_else(|| WorkflowError::UnknownStyle(style_id.to_string()))?;
        self.selected_style = Some(style);
        self.error = None;
        Ok(())
    }

    pub fn set_custom_prompt(&mut self, prompt: &str) -> Result<(), WorkflowError> {
        self.expect_step(Step::StyleSelection)?;
        self.custom_prompt = prompt.to_string();
        self.tickets.invalidate(TaskKind::PromptEnhance);
        self.is_enhancing_prompt = false;
        Ok(())
    }

    pub fn set_manual_settings(&mut self, settings: ManualSettings) -> Result<(), WorkflowError> {
        self.expect_step(Step::StyleSelection)?;
        self.manual = settings;
        Ok(())
    }

    pub fn set_reference(&mut self, reference: Option<Attachment>) -> Result<(), WorkflowError> {
        self.expect_step(Step::StyleSelection)?;
        self.reference = reference;
        Ok(())
    }

    pub fn set_negative_prompt(&mut self, negative_prompt: &str) -> Result<(), WorkflowError> {
        self.expect_step(Step::StyleSelection)?;
        self.negative_prompt = negative_prompt.to_string();
        Ok(())
    }

    /// Draft and context for prompt enhancement; `None` when there is no draft to improve.
    pub fn begin_prompt_enhance(&mut self) -> Result<Option<(Ticket, String, String)>, WorkflowError> {
        self.expect_step(Step::StyleSelection)?;
        if self.custom_prompt.trim().is_empty() {
            return Ok(None);
        }
        let context = [self.description(), self.category.as_str()]
            .into_iter()
            .find(|s| !s.trim().is_empty())
            .unwrap_or("a product")
            .to_string();
        self.is_enhancing_prompt = true;
        Ok(Some((self.tickets.issue(TaskKind::PromptEnhance), self.custom_prompt.clone(), context)))
    }

    pub fn finish_prompt_enhance(&mut self, ticket: Ticket, enhanced: Option<String>) -> bool {
        if !self.tickets.is_current(ticket) {
            return false;
        }
        self.is_enhancing_prompt = false;
        if let Some(enhanced) = enhanced.filter(|e| !e.trim().is_empty()) {
            self.custom_prompt = enhanced;
        }
        true
    }

    // --- generation ---

    /// Validates the inputs and moves to results with four empty slots.
    ///
    /// On a missing input nothing is allocated: the error is recorded and the
    /// workflow falls back to style selection.
    pub fn begin_generation(&mut self) -> Result<(Ticket, GenerationPlan), WorkflowError> {
        if self.step == Step::Upload {
            return Err(WorkflowError::WrongStep { expected: Step::StyleSelection, actual: self.step });
        }
        let plan = match GenerationPlan::build(self.plan_inputs()) {
            Ok(plan) => plan,
            Err(e) => {
                info!("Generation refused: {}", e);
                self.error = Some(e.to_string());
                self.step = Step::StyleSelection;
                self.is_loading = false;
                return Err(e);
            }
        };
        self.error = None;
        self.generated_images = vec![None; BATCH_SIZE];
        self.regenerating = vec![false; BATCH_SIZE];
        self.captions.clear();
        self.is_generating_captions = false;
        self.tickets.invalidate(TaskKind::Captions);
        self.step = Step::Results;
        self.is_loading = true;
        Ok((self.tickets.issue(TaskKind::Batch), plan))
    }

    /// Fills one slot; the other slots are left exactly as they are.
    pub fn fill_slot(&mut self, ticket: Ticket, index: usize, image: GeneratedImage) -> bool {
        if !self.tickets.is_current(ticket) {
            debug!("Dropping stale image for slot {}", index);
            return false;
        }
        match self.generated_images.get_mut(index) {
            Some(slot) => {
                *slot = Some(image);
                true
            }
            None => false,
        }
    }

    pub fn finish_generation(&mut self, ticket: Ticket) -> bool {
        if !self.tickets.is_current(ticket) {
            return false;
        }
        self.is_loading = false;
        true
    }

    pub fn begin_regenerate(&mut self, index: usize) -> Result<(Ticket, GenerationPlan), WorkflowError> {
        self.expect_step(Step::Results)?;
        if index >= self.generated_images.len() {
            return Err(WorkflowError::SlotOutOfRange(index));
        }
        let plan = GenerationPlan::build(self.plan_inputs())?;
        self.regenerating[index] = true;
        Ok((self.tickets.current(TaskKind::Batch), plan))
    }

    pub fn finish_regenerate(&mut self, ticket: Ticket, index: usize, image: Option<GeneratedImage>) -> bool {
        if !self.tickets.is_current(ticket) {
            return false;
        }
        if let Some(flag) = self.regenerating.get_mut(index) {
            *flag = false;
        }
        match image {
            Some(image) => self.fill_slot(ticket, index, image),
            None => false,
        }
    }

    // --- results step ---

    pub fn change_style(&mut self) -> Result<Vec<Effect>, WorkflowError> {
        self.expect_step(Step::Results)?;
        self.tickets.invalidate(TaskKind::Batch);
        self.is_loading = false;
        self.regenerating.iter_mut().for_each(|f| *f = false);
        Ok(self.enter_style_selection())
    }

    /// Product context and style name for captions; `None` when there is nothing to describe.
    pub fn begin_captions(&mut self) -> Option<(Ticket, String, String)> {
        let style = self.selected_style?;
        let mut context = [self.description(), self.category.as_str()]
            .into_iter()
            .find(|s| !s.trim().is_empty())
            .map(str::to_string);
        if context.is_none() {
            if let Some(img) = self.product.as_ref().and_then(ProductInput::image) {
                let stem = img.upload.readable_stem();
                context = Some(if stem.trim().is_empty() { "this product".to_string() } else { stem });
            }
        }
        let context = context?;
        self.is_generating_captions = true;
        Some((self.tickets.issue(TaskKind::Captions), context, style.name.to_string()))
    }

    pub fn finish_captions(&mut self, ticket: Ticket, captions: Option<Vec<String>>) -> bool {
        if !self.tickets.is_current(ticket) {
            return false;
        }
        self.is_generating_captions = false;
        if let Some(captions) = captions {
            self.captions = captions
                .into_iter()
                .enumerate()
                .map(|(id, text)| GeneratedCaption { id, text })
                .collect();
        }
        true
    }

    pub fn mockup_source(&self, mockup_id: &str) -> Result<(&'static MockupOption, Attachment), WorkflowError> {
        let mockup = find_mockup(mockup_id).ok_or_else(|| WorkflowError::UnknownMockup(mockup_id.to_string()))?;
        let image = self.isolated_image().cloned().ok_or(WorkflowError::MissingIsolatedImage)?;
        Ok((mockup, image))
    }

    /// Back to a blank upload step. Every in-flight task is invalidated.
    pub fn reset(&mut self) {
        let mut tickets = std::mem::take(&mut self.tickets);
        tickets.invalidate_all();
        *self = Self { tickets, ..Self::default() };
        info!("🔄 Workflow reset");
    }

    pub fn view(&self) -> WorkflowView {
        let image = self.product.as_ref().and_then(ProductInput::image);
        WorkflowView {
            step: self.step,
            product_description: self.description().to_string(),
            uploaded_file_name: image.map(|i| i.upload.name.clone()),
            has_enhanced_image: image.is_some_and(|i| i.enhanced.is_some()),
            isolated_src: self.isolated_image().map(Attachment::data_url),
            selected_style_id: self.selected_style.map(|s| s.id.to_string()),
            custom_prompt: self.custom_prompt.clone(),
            manual_settings: self.manual.clone(),
            reference_file_name: self.reference.as_ref().map(|r| r.name.clone()),
            negative_prompt: self.negative_prompt.clone(),
            product_category: self.category.clone(),
            recommended_style_ids: self.recommended.clone(),
            is_categorizing: self.is_categorizing,
            is_recommending: self.is_recommending,
            is_processing: self.is_processing,
            is_loading: self.is_loading,
            is_regenerating: self.regenerating.clone(),
            is_generating_captions: self.is_generating_captions,
            is_enhancing_prompt: self.is_enhancing_prompt,
            generated_images: self.generated_images.clone(),
            generated_captions: self.captions.clone(),
            error: self.error.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::png;
    use pretty_assertions::assert_eq;

    fn image(tag: &str) -> GeneratedImage {
        GeneratedImage { src: format!("data:image/png;base64,{tag}"), prompt: tag.into() }
    }

    /// Upload + isolate, ready to pick a style.
    fn at_style_selection() -> WorkflowState {
        let mut state = WorkflowState::new();
        state.upload_image(png("mug.png")).unwrap();
        let (ticket, _) = state.begin_remove_background().unwrap();
        state.finish_remove_background(ticket, Ok(png("isolated-product.png")));
        assert_eq!(state.step(), Step::StyleSelection);
        state
    }

    #[test]
    fn upload_requests_categorization_and_clears_derivatives() {
        let mut state = WorkflowState::new();
        state.upload_image(png("first.png")).unwrap();
        let (ticket, _) = state.begin_enhance().unwrap();
        state.finish_enhance(ticket, Ok(png("enhanced-product.png")));
        assert!(state.view().has_enhanced_image);

        let effects = state.upload_image(png("second.png")).unwrap();
        assert!(matches!(&effects[..], [Effect::Categorize { image, .. }] if image.name == "second.png"));
        let view = state.view();
        assert!(!view.has_enhanced_image);
        assert!(view.is_categorizing);
        assert_eq!(view.product_category, "");
        assert_eq!(view.uploaded_file_name.as_deref(), Some("second.png"));
    }

    #[test]
    fn stale_categorization_is_dropped() {
        let mut state = WorkflowState::new();
        let effects = state.upload_image(png("first.png")).unwrap();
        let Effect::Categorize { ticket: old, .. } = effects[0].clone() else { panic!() };
        let effects = state.upload_image(png("second.png")).unwrap();
        let Effect::Categorize { ticket: new, .. } = effects[0].clone() else { panic!() };

        assert!(!state.finish_categorization(old, Some("Food".into())));
        assert_eq!(state.category(), "");
        assert!(state.finish_categorization(new, Some("Home Goods".into())));
        assert_eq!(state.category(), "Home Goods");
    }

    #[test]
    fn background_removal_uses_enhanced_image_and_advances() {
        let mut state = WorkflowState::new();
        state.upload_image(png("mug.png")).unwrap();
        let (ticket, _) = state.begin_enhance().unwrap();
        state.finish_enhance(ticket, Ok(png("enhanced-product.png")));

        let (ticket, working) = state.begin_remove_background().unwrap();
        assert_eq!(working.name, "enhanced-product.png");
        let effects = state.finish_remove_background(ticket, Ok(png("isolated-product.png")));
        assert_eq!(state.step(), Step::StyleSelection);
        assert!(matches!(&effects[..], [Effect::Recommend { image: Some(_), .. }]));
        assert!(state.view().is_recommending);
    }

    #[test]
    fn blocking_failures_are_surfaced() {
        let mut state = WorkflowState::new();
        assert_eq!(state.begin_enhance().unwrap_err(), WorkflowError::NothingToProcess);
        state.upload_image(png("mug.png")).unwrap();
        let (ticket, _) = state.begin_remove_background().unwrap();
        let effects = state.finish_remove_background(ticket, Err(GeminiError::NoImage));
        assert!(effects.is_empty());
        assert_eq!(state.step(), Step::Upload);
        assert_eq!(state.error(), Some(BACKGROUND_REMOVAL_FAILED));

        let (ticket, _) = state.begin_enhance().unwrap();
        assert_eq!(state.error(), None);
        state.finish_enhance(ticket, Err(GeminiError::Http("boom".into())));
        assert_eq!(state.error(), Some(ENHANCE_FAILED));
    }

    #[test]
    fn description_replaces_upload_and_advances() {
        let mut state = WorkflowState::new();
        let effects = state.upload_image(png("mug.png")).unwrap();
        let Effect::Categorize { ticket, .. } = effects[0].clone() else { panic!() };

        assert_eq!(state.submit_description("   ").unwrap_err(), WorkflowError::MissingProduct);
        let effects = state.submit_description("  hand-thrown ceramic mug ").unwrap();
        assert_eq!(state.step(), Step::StyleSelection);
        assert_eq!(state.description(), "hand-thrown ceramic mug");
        assert!(state.view().uploaded_file_name.is_none());
        assert!(matches!(&effects[..], [Effect::Recommend { image: None, description, .. }] if description == "hand-thrown ceramic mug"));
        // the upload's categorization no longer applies
        assert!(!state.finish_categorization(ticket, Some("Kitchen".into())));
    }

    #[test]
    fn advancement_guards() {
        // no style
        let mut state = at_style_selection();
        assert_eq!(state.begin_generation().unwrap_err(), WorkflowError::MissingStyle);
        assert_eq!(state.step(), Step::StyleSelection);
        assert!(state.generated_images().is_empty());

        // custom with blank prompt
        state.select_style("custom").unwrap();
        state.set_custom_prompt(" \t").unwrap();
        assert_eq!(state.begin_generation().unwrap_err(), WorkflowError::MissingCustomPrompt);
        assert_eq!(state.error(), Some(WorkflowError::MissingCustomPrompt.to_string().as_str()));

        // manual with neither background nor props
        state.select_style("manual").unwrap();
        assert_eq!(state.begin_generation().unwrap_err(), WorkflowError::MissingManualSettings);

        // reference without attachment
        state.select_style("reference").unwrap();
        assert_eq!(state.begin_generation().unwrap_err(), WorkflowError::MissingReference);

        assert_eq!(state.step(), Step::StyleSelection);
        assert!(!state.is_loading());
        assert!(state.generated_images().is_empty());
    }

    #[test]
    fn generation_requires_product_input() {
        let mut state = WorkflowState::from_restored(RestoredSession {
            step: Step::StyleSelection,
            selected_style: find_style("studio-white"),
            ..Default::default()
        });
        assert_eq!(state.begin_generation().unwrap_err(), WorkflowError::MissingProduct);
        assert_eq!(state.step(), Step::StyleSelection);
    }

    #[test]
    fn slots_fill_independently_in_any_order() {
        let mut state = at_style_selection();
        state.select_style("luxury").unwrap();
        let (ticket, _) = state.begin_generation().unwrap();
        assert_eq!(state.step(), Step::Results);
        assert_eq!(state.generated_images(), &[None, None, None, None]);

        assert!(state.fill_slot(ticket, 2, image("c")));
        assert_eq!(state.generated_images(), &[None, None, Some(image("c")), None]);
        assert!(state.fill_slot(ticket, 0, image("a")));
        assert_eq!(state.generated_images(), &[Some(image("a")), None, Some(image("c")), None]);
        assert!(state.fill_slot(ticket, 3, image("d")));
        assert!(state.is_loading());
        assert!(state.finish_generation(ticket));
        assert!(!state.is_loading());
        assert_eq!(state.generated_images(), &[Some(image("a")), None, Some(image("c")), Some(image("d"))]);
        assert!(!state.fill_slot(ticket, 9, image("x")));
    }

    #[test]
    fn regenerate_all_reallocates_and_invalidates_old_batch() {
        let mut state = at_style_selection();
        state.select_style("luxury").unwrap();
        let (first, _) = state.begin_generation().unwrap();
        state.fill_slot(first, 1, image("b"));

        let (second, _) = state.begin_generation().unwrap();
        assert_eq!(state.generated_images(), &[None, None, None, None]);
        assert!(!state.fill_slot(first, 0, image("late")));
        assert!(state.fill_slot(second, 0, image("fresh")));
        assert_eq!(state.generated_images()[0], Some(image("fresh")));
    }

    #[test]
    fn single_slot_regeneration_touches_only_its_slot() {
        let mut state = at_style_selection();
        state.select_style("nature").unwrap();
        let (batch, _) = state.begin_generation().unwrap();
        for (i, tag) in ["a", "b", "c", "d"].iter().enumerate() {
            state.fill_slot(batch, i, image(tag));
        }
        state.finish_generation(batch);

        let (ticket, plan) = state.begin_regenerate(1).unwrap();
        assert!(state.view().is_regenerating[1]);
        assert_eq!(plan.call, crate::prompt::ImageCall::WithImage { product: png("isolated-product.png") });
        state.finish_regenerate(ticket, 1, Some(image("b2")));
        assert_eq!(state.generated_images(), &[Some(image("a")), Some(image("b2")), Some(image("c")), Some(image("d"))]);
        assert_eq!(state.view().is_regenerating, vec![false; 4]);

        let (ticket, _) = state.begin_regenerate(3).unwrap();
        assert!(!state.finish_regenerate(ticket, 3, None));
        assert_eq!(state.generated_images()[3], Some(image("d")));
        assert_eq!(state.step(), Step::Results);

        assert_eq!(state.begin_regenerate(4).unwrap_err(), WorkflowError::SlotOutOfRange(4));
    }

    #[test]
    fn change_style_clears_captions_and_supersedes_batch() {
        let mut state = at_style_selection();
        state.select_style("nature").unwrap();
        let (batch, _) = state.begin_generation().unwrap();
        let (captions, context, style_name) = state.begin_captions().unwrap();
        assert_eq!(context, "mug");
        assert_eq!(style_name, "Outdoor Nature");
        state.finish_captions(captions, Some(vec!["one".into(), "two".into()]));
        assert_eq!(state.captions()[1], GeneratedCaption { id: 1, text: "two".into() });

        let effects = state.change_style().unwrap();
        assert_eq!(state.step(), Step::StyleSelection);
        assert!(state.captions().is_empty());
        assert!(!state.is_loading());
        assert_eq!(effects.len(), 1);
        assert!(!state.fill_slot(batch, 0, image("late")));
        assert_eq!(state.change_style().unwrap_err(), WorkflowError::WrongStep {
            expected: Step::Results,
            actual: Step::StyleSelection,
        });
    }

    #[test]
    fn caption_context_prefers_description_then_category() {
        let mut state = WorkflowState::from_restored(RestoredSession {
            step: Step::Results,
            product: Some(ProductInput::Text("oat milk".into())),
            selected_style: find_style("lifestyle"),
            category: "Beverage".into(),
            ..Default::default()
        });
        assert_eq!(state.begin_captions().unwrap().1, "oat milk");

        let mut state = at_style_selection();
        assert!(state.begin_captions().is_none(), "no style selected");
        state.select_style("lifestyle").unwrap();
        state.category = "Kitchenware".into();
        assert_eq!(state.begin_captions().unwrap().1, "Kitchenware");
    }

    #[test]
    fn prompt_enhancement_rewrites_custom_prompt() {
        let mut state = WorkflowState::from_restored(RestoredSession {
            step: Step::StyleSelection,
            product: Some(ProductInput::Text("a candle".into())),
            ..Default::default()
        });
        assert_eq!(state.begin_prompt_enhance().unwrap(), None);
        state.set_custom_prompt("on a windowsill").unwrap();
        let (ticket, draft, context) = state.begin_prompt_enhance().unwrap().unwrap();
        assert_eq!((draft.as_str(), context.as_str()), ("on a windowsill", "a candle"));
        state.finish_prompt_enhance(ticket, Some("on a sunlit windowsill, golden hour".into()));
        assert_eq!(state.custom_prompt(), "on a sunlit windowsill, golden hour");

        let (ticket, _, _) = state.begin_prompt_enhance().unwrap().unwrap();
        state.finish_prompt_enhance(ticket, Some("   ".into()));
        assert_eq!(state.custom_prompt(), "on a sunlit windowsill, golden hour");
    }

    #[test]
    fn reset_clears_everything_and_invalidates_work() {
        let mut state = at_style_selection();
        let effects = state.recommendation_effects();
        let Effect::Recommend { ticket: rec, .. } = effects[0].clone() else { panic!() };
        state.select_style("custom").unwrap();
        state.set_custom_prompt("floating in space").unwrap();
        let (batch, _) = state.begin_generation().unwrap();

        state.reset();
        assert_eq!(state.step(), Step::Upload);
        assert!(state.product().is_none());
        assert!(state.selected_style().is_none());
        assert_eq!(state.custom_prompt(), "");
        assert!(state.generated_images().is_empty());

        assert!(!state.finish_recommendation(rec, vec!["luxury".into()]));
        assert!(state.recommended().is_empty());
        assert!(!state.fill_slot(batch, 0, image("late")));
        assert!(!state.finish_generation(batch));
    }

    #[test]
    fn edits_are_confined_to_style_selection() {
        let mut state = WorkflowState::new();
        assert!(matches!(state.select_style("luxury"), Err(WorkflowError::WrongStep { .. })));
        let mut state = at_style_selection();
        assert_eq!(state.select_style("nope").unwrap_err(), WorkflowError::UnknownStyle("nope".into()));
        assert!(state.upload_image(png("again.png")).is_err());
    }

    #[test]
    fn mockups_need_an_isolated_image() {
        let state = WorkflowState::from_restored(RestoredSession {
            step: Step::Results,
            product: Some(ProductInput::Text("a lamp".into())),
            ..Default::default()
        });
        assert_eq!(state.mockup_source("tshirt").unwrap_err(), WorkflowError::MissingIsolatedImage);
        assert_eq!(state.mockup_source("poster").unwrap_err(), WorkflowError::UnknownMockup("poster".into()));
        let state = at_style_selection();
        let (mockup, image) = state.mockup_source("billboard").unwrap();
        assert_eq!(mockup.id, "billboard");
        assert_eq!(image.name, "isolated-product.png");
    }
}
