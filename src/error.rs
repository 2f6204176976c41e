use thiserror::Error;

pub use crate::attachment::AttachmentError;
pub use crate::crop::CropError;
pub use crate::gemini::GeminiError;

/// Missing-input and wrong-step conditions raised by workflow transitions.
///
/// The display strings double as the user-visible message stored on the
/// workflow state when a transition is refused.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("Please provide a product image or description and choose a style.")]
    MissingProduct,
    #[error("Please choose a style first.")]
    MissingStyle,
    #[error("Please enter a custom prompt.")]
    MissingCustomPrompt,
    #[error("Please describe a background or props for the manual style.")]
    MissingManualSettings,
    #[error("Please upload a reference image.")]
    MissingReference,
    #[error("Please upload a product image first.")]
    NothingToProcess,
    #[error("Please remove the background from your product first.")]
    MissingIsolatedImage,
    #[error("Unknown style: {0}")]
    UnknownStyle(String),
    #[error("Unknown mockup: {0}")]
    UnknownMockup(String),
    #[error("Action not available in step {actual:?} (expected {expected:?})")]
    WrongStep { expected: crate::models::Step, actual: crate::models::Step },
    #[error("No generated image at index {0}")]
    SlotOutOfRange(usize),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("storage error: {0}")] Store(#[from] std::io::Error),
    #[error("corrupt snapshot: {0}")] Json(#[from] serde_json::Error),
    #[error("corrupt attachment: {0}")] Attachment(#[from] AttachmentError),
}

#[derive(Debug, Error)]
pub enum StudioError {
    #[error(transparent)] Workflow(#[from] WorkflowError),
    #[error(transparent)] Gemini(#[from] GeminiError),
    #[error(transparent)] Session(#[from] SessionError),
    #[error(transparent)] Attachment(#[from] AttachmentError),
    #[error(transparent)] Crop(#[from] CropError),
}

pub type Result<T, E = StudioError> = std::result::Result<T, E>;
