use std::{convert::Infallible, fmt, str::FromStr};

use bytes::Bytes;
use serde::{Serialize, Deserialize};
use serde_with::{DeserializeFromStr, SerializeDisplay};

/// Workflow steps, in their normal order of advancement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    #[default]
    Upload,
    StyleSelection,
    Results,
}

/// A binary file held in memory: an upload, a derivative, a reference image or a crop.
#[derive(Clone, PartialEq, Eq)]
pub struct Attachment {
    pub name: String,
    pub media_type: String,
    pub data: Bytes,
}

impl Attachment {
    pub fn new(name: impl Into<String>, media_type: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self { name: name.into(), media_type: media_type.into(), data: data.into() }
    }

    /// File name without its extension, with `-` and `_` turned into spaces.
    pub fn readable_stem(&self) -> String {
        let stem = self.name.split('.').next().unwrap_or_default();
        stem.replace(['-', '_'], " ")
    }
}

// Attachments can be megabytes; keep Debug output to the metadata.
impl fmt::Debug for Attachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attachment")
            .field("name", &self.name)
            .field("media_type", &self.media_type)
            .field("len", &self.data.len())
            .finish()
    }
}

/// Upload plus the derivatives produced from it in the upload step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInput {
    pub upload: Attachment,
    pub enhanced: Option<Attachment>,
    pub isolated: Option<Attachment>,
}

impl ImageInput {
    pub fn new(upload: Attachment) -> Self {
        Self { upload, enhanced: None, isolated: None }
    }

    /// The image background removal should run on: the enhanced derivative when present.
    pub fn working_image(&self) -> &Attachment {
        self.enhanced.as_ref().unwrap_or(&self.upload)
    }
}

/// What the user gave us to photograph. The two variants are mutually exclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProductInput {
    Image(ImageInput),
    Text(String),
}

/// The authoritative subject handed to generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductSubject<'a> {
    Image(&'a Attachment),
    Text(&'a str),
}

impl ProductInput {
    /// An image only becomes authoritative once its background has been isolated.
    pub fn subject(&self) -> Option<ProductSubject<'_>> {
        match self {
            ProductInput::Image(img) => img.isolated.as_ref().map(ProductSubject::Image),
            ProductInput::Text(text) if !text.trim().is_empty() => Some(ProductSubject::Text(text)),
            ProductInput::Text(_) => None,
        }
    }

    pub fn description(&self) -> Option<&str> {
        match self {
            ProductInput::Text(text) => Some(text),
            ProductInput::Image(_) => None,
        }
    }

    pub fn image(&self) -> Option<&ImageInput> {
        match self {
            ProductInput::Image(img) => Some(img),
            ProductInput::Text(_) => None,
        }
    }
}

/// Lighting choice of the manual style.
///
/// Parsing never fails: anything unrecognised falls back to soft studio light.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, SerializeDisplay, DeserializeFromStr)]
pub enum Lighting {
    #[default]
    SoftStudio,
    NaturalSunlight,
    Dramatic,
}

impl Lighting {
    pub const ALL: [Lighting; 3] = [Lighting::SoftStudio, Lighting::NaturalSunlight, Lighting::Dramatic];

    pub fn label(self) -> &'static str {
        match self {
            Lighting::SoftStudio => "soft-studio",
            Lighting::NaturalSunlight => "natural-sunlight",
            Lighting::Dramatic => "dramatic",
        }
    }
}

impl fmt::Display for Lighting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.label()) }
}

impl FromStr for Lighting {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase();
        Ok(Lighting::ALL
            .into_iter()
            .find(|l| key == l.label() || key == l.phrase().to_ascii_lowercase())
            .or(match key.as_str() {
                "option2" | "2" => Some(Lighting::NaturalSunlight),
                "option3" | "3" => Some(Lighting::Dramatic),
                _ => None,
            })
            .unwrap_or_default())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
#[serde(default)]
pub struct ManualSettings {
    pub background: String,
    pub lighting: Lighting,
    pub props: String,
}

impl ManualSettings {
    pub fn is_blank(&self) -> bool {
        self.background.trim().is_empty() && self.props.trim().is_empty()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    /// `data:` URL of the image.
    pub src: String,
    pub prompt: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct GeneratedCaption {
    pub id: usize,
    pub text: String,
}

/// Render-ready projection of the workflow state returned by every endpoint.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowView {
    pub step: Step,
    pub product_description: String,
    pub uploaded_file_name: Option<String>,
    pub has_enhanced_image: bool,
    pub isolated_src: Option<String>,
    pub selected_style_id: Option<String>,
    pub custom_prompt: String,
    pub manual_settings: ManualSettings,
    pub reference_file_name: Option<String>,
    pub negative_prompt: String,
    pub product_category: String,
    pub recommended_style_ids: Vec<String>,
    pub is_categorizing: bool,
    pub is_recommending: bool,
    pub is_processing: bool,
    pub is_loading: bool,
    pub is_regenerating: Vec<bool>,
    pub is_generating_captions: bool,
    pub is_enhancing_prompt: bool,
    pub generated_images: Vec<Option<GeneratedImage>>,
    pub generated_captions: Vec<GeneratedCaption>,
    pub error: Option<String>,
}
