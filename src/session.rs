//! Session persistence: the in-progress snapshot, the saved-results snapshot,
//! and the string key/value stores they live in.

use std::{collections::HashMap, io, path::PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Serialize, Deserialize};
use serde_with::skip_serializing_none;
use tracing::{info, warn};

use crate::{
    attachment::{decode_attachment, parse_data_url, EncodedAttachment},
    error::SessionError,
    models::{Attachment, GeneratedCaption, GeneratedImage, ImageInput, ManualSettings, ProductInput, Step},
    styles::find_style,
    workflow::{RestoredSession, WorkflowState},
};

pub const SESSION_KEY: &str = "product-studio-session";
pub const SAVED_RESULTS_KEY: &str = "product-studio-saved-results";

/// The two storage slots belonging to one client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageKeys {
    pub session: String,
    pub saved_results: String,
}

impl StorageKeys {
    pub fn scoped(owner: &str) -> Self {
        Self {
            session: format!("{owner}.{SESSION_KEY}"),
            saved_results: format!("{owner}.{SAVED_RESULTS_KEY}"),
        }
    }
}

impl Default for StorageKeys {
    fn default() -> Self {
        Self { session: SESSION_KEY.into(), saved_results: SAVED_RESULTS_KEY.into() }
    }
}

/// String-keyed persistent storage.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, key: &str) -> io::Result<Option<String>>;
    async fn set(&self, key: &str, value: String) -> io::Result<()>;
    async fn remove(&self, key: &str) -> io::Result<()>;
}

#[derive(Default)]
pub struct InMemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemoryStore {
    async fn get(&self, key: &str) -> io::Result<Option<String>> {
        Ok(self.entries.read().get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> io::Result<()> {
        self.entries.write().insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> io::Result<()> {
        self.entries.write().remove(key);
        Ok(())
    }
}

/// One JSON file per key under a directory.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub async fn open(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    fn path(&self, key: &str) -> PathBuf {
        let file: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '_' })
            .collect();
        self.dir.join(format!("{file}.json"))
    }
}

#[async_trait]
impl SessionStore for FileStore {
    async fn get(&self, key: &str) -> io::Result<Option<String>> {
        match tokio::fs::read_to_string(self.path(key)).await {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn set(&self, key: &str, value: String) -> io::Result<()> {
        // write-then-rename so a crash never leaves half a snapshot behind
        let path = self.path(key);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, value).await?;
        tokio::fs::rename(&tmp, &path).await
    }

    async fn remove(&self, key: &str) -> io::Result<()> {
        match tokio::fs::remove_file(self.path(key)).await {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

/// In-progress session as persisted between visits.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionSnapshot {
    pub step: Step,
    pub product_description: String,
    pub selected_style_id: Option<String>,
    pub custom_prompt: String,
    pub manual_settings: ManualSettings,
    pub negative_prompt: String,
    pub product_category: String,
    pub uploaded_file_data_url: Option<String>,
    pub uploaded_file_name: Option<String>,
    pub isolated_file_data_url: Option<String>,
    pub isolated_file_name: Option<String>,
    pub reference_file_data_url: Option<String>,
    pub reference_file_name: Option<String>,
    pub enhanced_file_data_url: Option<String>,
    pub enhanced_file_name: Option<String>,
}

fn split(attachment: Option<&Attachment>) -> (Option<String>, Option<String>) {
    match attachment.map(Attachment::encode) {
        Some(EncodedAttachment { data_url, name }) => (Some(data_url), Some(name)),
        None => (None, None),
    }
}

fn join(data_url: Option<String>, name: Option<String>, fallback: &str) -> Result<Option<Attachment>, SessionError> {
    let Some(data_url) = data_url else { return Ok(None) };
    let token = EncodedAttachment { data_url, name: name.unwrap_or_else(|| fallback.to_string()) };
    Ok(Some(decode_attachment(&token)?))
}

impl SessionSnapshot {
    pub fn capture(state: &WorkflowState) -> Self {
        let image = state.product().and_then(ProductInput::image);
        let (uploaded_file_data_url, uploaded_file_name) = split(image.map(|i| &i.upload));
        let (isolated_file_data_url, isolated_file_name) = split(image.and_then(|i| i.isolated.as_ref()));
        let (enhanced_file_data_url, enhanced_file_name) = split(image.and_then(|i| i.enhanced.as_ref()));
        let (reference_file_data_url, reference_file_name) = split(state.reference());
        Self {
            step: state.step(),
            product_description: state.description().to_string(),
            selected_style_id: state.selected_style().map(|s| s.id.to_string()),
            custom_prompt: state.custom_prompt().to_string(),
            manual_settings: state.manual_settings().clone(),
            negative_prompt: state.negative_prompt().to_string(),
            product_category: state.category().to_string(),
            uploaded_file_data_url,
            uploaded_file_name,
            isolated_file_data_url,
            isolated_file_name,
            reference_file_data_url,
            reference_file_name,
            enhanced_file_data_url,
            enhanced_file_name,
        }
    }

    /// Rebuilds workflow inputs. The style is looked up again in the live catalog.
    pub fn restore(self) -> Result<RestoredSession, SessionError> {
        // upload first, then the derivatives and reference that sit on top of it
        let upload = join(self.uploaded_file_data_url, self.uploaded_file_name, "uploaded-image.png")?;
        let isolated = join(self.isolated_file_data_url, self.isolated_file_name, "isolated-product.png")?;
        let reference = join(self.reference_file_data_url, self.reference_file_name, "reference-image.png")?;
        let enhanced = join(self.enhanced_file_data_url, self.enhanced_file_name, "enhanced-image.png")?;

        let product = match upload.or_else(|| isolated.clone()) {
            Some(upload) => Some(ProductInput::Image(ImageInput { upload, enhanced, isolated })),
            None if !self.product_description.trim().is_empty() => Some(ProductInput::Text(self.product_description)),
            None => None,
        };
        let has_subject = product.as_ref().and_then(ProductInput::subject).is_some();
        let step = match self.step {
            // results are never part of this snapshot
            Step::Results | Step::StyleSelection if has_subject => Step::StyleSelection,
            _ => Step::Upload,
        };

        Ok(RestoredSession {
            step,
            product,
            selected_style: self.selected_style_id.as_deref().and_then(find_style),
            custom_prompt: self.custom_prompt,
            manual: self.manual_settings,
            reference,
            negative_prompt: self.negative_prompt,
            category: self.product_category,
            ..Default::default()
        })
    }
}

/// Completed session the user explicitly chose to keep.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedResults {
    pub generated_images: Vec<GeneratedImage>,
    #[serde(default)]
    pub generated_captions: Vec<GeneratedCaption>,
    pub isolated_file_data_url: Option<String>,
    pub saved_at: Option<DateTime<Utc>>,
}

impl SavedResults {
    /// `None` when there is nothing generated yet.
    pub fn capture(state: &WorkflowState) -> Option<Self> {
        if state.generated_images().is_empty() {
            return None;
        }
        let generated_images = state
            .generated_images()
            .iter()
            .flatten()
            .filter(|img| match parse_data_url(&img.src) {
                Ok(_) => true,
                Err(e) => {
                    warn!("Skipping generated image that is not a data URL: {}", e);
                    false
                }
            })
            .cloned()
            .collect();
        Some(Self {
            generated_images,
            generated_captions: state.captions().to_vec(),
            isolated_file_data_url: state.isolated_image().map(Attachment::data_url),
            saved_at: Some(Utc::now()),
        })
    }

    pub fn restore(self) -> Result<RestoredSession, SessionError> {
        let isolated = self
            .isolated_file_data_url
            .map(|url| Attachment::from_data_url(&url, "isolated-product.png"))
            .transpose()?;
        let product = isolated.map(|isolated| {
            ProductInput::Image(ImageInput { upload: isolated.clone(), enhanced: None, isolated: Some(isolated) })
        });
        Ok(RestoredSession {
            step: Step::Results,
            product,
            generated_images: self.generated_images.into_iter().map(Some).collect(),
            captions: self.generated_captions,
            ..Default::default()
        })
    }
}

async fn load(store: &dyn SessionStore, keys: &StorageKeys) -> Result<Option<RestoredSession>, SessionError> {
    if let Some(text) = store.get(&keys.saved_results).await? {
        let saved: SavedResults = serde_json::from_str(&text)?;
        return saved.restore().map(Some);
    }
    match store.get(&keys.session).await? {
        Some(text) => serde_json::from_str::<SessionSnapshot>(&text)?.restore().map(Some),
        None => Ok(None),
    }
}

/// Startup hydration. Saved results win over an in-progress session; anything
/// unreadable discards both slots and starts fresh.
pub async fn hydrate(store: &dyn SessionStore, keys: &StorageKeys) -> WorkflowState {
    match load(store, keys).await {
        Ok(Some(restored)) => {
            info!("♻️ Restored session at step {:?}", restored.step);
            WorkflowState::from_restored(restored)
        }
        Ok(None) => WorkflowState::new(),
        Err(e) => {
            warn!("Failed to load session, clearing it: {}", e);
            clear(store, keys).await;
            WorkflowState::new()
        }
    }
}

/// Removes both slots. Errors are logged, never returned.
pub async fn clear(store: &dyn SessionStore, keys: &StorageKeys) {
    for key in [&keys.session, &keys.saved_results] {
        if let Err(e) = store.remove(key).await {
            warn!("Failed to remove {}: {}", key, e);
        }
    }
}
