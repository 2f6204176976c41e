//! Prompt construction policy shared by batch generation and single-slot regeneration.

use crate::{
    error::WorkflowError,
    gemini::{ContentPart, ImageRequest},
    models::{Attachment, Lighting, ManualSettings, ProductSubject},
    styles::{StyleKind, StyleOption},
};

pub const NEGATIVE_PROMPT_PREFIX: &str = "Negative prompt: please avoid generating the following elements:";

const REFERENCE_WITH_IMAGE: &str = "Take the product from the first image and place it in an environment with the same style, lighting, and composition as the second image. The product from the first image must be the main subject.";
const REFERENCE_WITH_TEXT: &str = "Create a product photo from the given description in an environment with the same style, lighting, and composition as the reference image.";

impl Lighting {
    pub fn phrase(self) -> &'static str {
        match self {
            Lighting::SoftStudio => "Soft studio light",
            Lighting::NaturalSunlight => "Natural sunlight",
            Lighting::Dramatic => "Dramatic cinematic lighting",
        }
    }
}

pub fn apply_negative_prompt(prompt: &str, negative_prompt: &str) -> String {
    if negative_prompt.trim().is_empty() {
        return prompt.to_string();
    }
    format!("{prompt}\n\n{NEGATIVE_PROMPT_PREFIX} {negative_prompt}.")
}

pub fn manual_instruction(settings: &ManualSettings) -> String {
    let background = non_blank(&settings.background).unwrap_or("neutral");
    let props = non_blank(&settings.props).unwrap_or("minimalist");
    format!(
        "Professional product photo. Background: {background}. Lighting: {}. Props: {props}.",
        settings.lighting.phrase()
    )
}

pub fn text_product_instruction(description: &str, style_prompt: &str) -> String {
    format!("A professional product photograph of {description}. Style: {style_prompt}")
}

fn non_blank(s: &str) -> Option<&str> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

/// Everything the prompt policy reads from the workflow.
#[derive(Debug, Clone, Copy)]
pub struct PlanInputs<'a> {
    pub subject: Option<ProductSubject<'a>>,
    pub style: Option<&'a StyleOption>,
    pub custom_prompt: &'a str,
    pub manual: &'a ManualSettings,
    pub reference: Option<&'a Attachment>,
    pub negative_prompt: &'a str,
}

/// Which remote operation a plan calls, with its resolved attachments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageCall {
    WithImage { product: Attachment },
    FromText,
    WithReference { product: Attachment, reference: Attachment },
    FromTextWithReference { description: String, reference: Attachment },
}

/// A fully resolved generation: repeated verbatim for every slot of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationPlan {
    /// Instruction before the negative prompt is applied; recorded on each image.
    pub instruction: String,
    pub negative_prompt: String,
    pub call: ImageCall,
}

impl GenerationPlan {
    pub fn build(inputs: PlanInputs<'_>) -> Result<Self, WorkflowError> {
        let style = inputs.style.ok_or(WorkflowError::MissingStyle)?;
        let subject = inputs.subject.ok_or(WorkflowError::MissingProduct)?;
        let negative_prompt = inputs.negative_prompt.to_string();

        let template = match style.kind {
            StyleKind::Preset { prompt } => prompt.to_string(),
            StyleKind::Custom => {
                if inputs.custom_prompt.trim().is_empty() {
                    return Err(WorkflowError::MissingCustomPrompt);
                }
                inputs.custom_prompt.to_string()
            }
            StyleKind::Manual => {
                if inputs.manual.is_blank() {
                    return Err(WorkflowError::MissingManualSettings);
                }
                manual_instruction(inputs.manual)
            }
            StyleKind::Reference => {
                let reference = inputs.reference.ok_or(WorkflowError::MissingReference)?.clone();
                let (instruction, call) = match subject {
                    ProductSubject::Image(product) => (
                        REFERENCE_WITH_IMAGE,
                        ImageCall::WithReference { product: product.clone(), reference },
                    ),
                    ProductSubject::Text(description) => (
                        REFERENCE_WITH_TEXT,
                        ImageCall::FromTextWithReference { description: description.to_string(), reference },
                    ),
                };
                return Ok(Self { instruction: instruction.to_string(), negative_prompt, call });
            }
        };

        Ok(match subject {
            ProductSubject::Image(product) => Self {
                instruction: template,
                negative_prompt,
                call: ImageCall::WithImage { product: product.clone() },
            },
            ProductSubject::Text(description) => Self {
                instruction: text_product_instruction(description, &template),
                negative_prompt,
                call: ImageCall::FromText,
            },
        })
    }

    /// Instruction text actually sent to the model.
    pub fn final_text(&self) -> String {
        let text = apply_negative_prompt(&self.instruction, &self.negative_prompt);
        match &self.call {
            ImageCall::FromTextWithReference { description, .. } => format!("{text}\n\nProduct Context: {description}"),
            _ => text,
        }
    }

    pub fn request(&self) -> ImageRequest {
        let text = ContentPart::Text(self.final_text());
        let parts = match &self.call {
            ImageCall::WithImage { product } => vec![ContentPart::inline(product), text],
            ImageCall::FromText => vec![text],
            ImageCall::WithReference { product, reference } => {
                vec![ContentPart::inline(product), ContentPart::inline(reference), text]
            }
            ImageCall::FromTextWithReference { reference, .. } => vec![ContentPart::inline(reference), text],
        };
        ImageRequest { parts, prompt: self.instruction.clone() }
    }
}
