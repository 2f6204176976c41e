use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::{collections::HashMap, sync::Arc};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    crop::{AspectRatio, CropError, CropRect, CropTool, Size},
    error::{StudioError, WorkflowError},
    gemini::StudioModel,
    models::{Attachment, GeneratedImage, Lighting, ManualSettings, WorkflowView},
    session::{SessionStore, StorageKeys},
    studio::Studio,
};

#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<RwLock<HashMap<Uuid, Arc<Studio>>>>,
    pub model: Arc<dyn StudioModel>,
    pub store: Arc<dyn SessionStore>,
}

impl AppState {
    pub fn new(model: Arc<dyn StudioModel>, store: Arc<dyn SessionStore>) -> Self {
        Self { sessions: Arc::default(), model, store }
    }
}

type ApiError = (StatusCode, Json<Value>);
type ApiResult<T> = Result<Json<T>, ApiError>;

fn error_body(status: StatusCode, message: impl ToString) -> ApiError {
    (status, Json(json!({ "error": message.to_string() })))
}

fn api_error(e: StudioError) -> ApiError {
    let status = match &e {
        StudioError::Workflow(WorkflowError::SlotOutOfRange(_)) => StatusCode::NOT_FOUND,
        StudioError::Workflow(_) | StudioError::Attachment(_) | StudioError::Crop(_) => StatusCode::BAD_REQUEST,
        StudioError::Gemini(_) => StatusCode::BAD_GATEWAY,
        StudioError::Session(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        error!("Request failed: {}", e);
    }
    error_body(status, e)
}

fn studio(state: &AppState, id: Uuid) -> Result<Arc<Studio>, ApiError> {
    state
        .sessions
        .read()
        .get(&id)
        .cloned()
        .ok_or_else(|| error_body(StatusCode::NOT_FOUND, format!("Unknown session {id}")))
}

// --- payloads ---

#[derive(Debug, Deserialize, Default)]
pub struct CreateSessionRequest {
    pub id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub id: Uuid,
    #[serde(flatten)]
    pub view: WorkflowView,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentRequest {
    pub data_url: String,
    pub name: String,
}

impl AttachmentRequest {
    fn into_attachment(self) -> Result<Attachment, ApiError> {
        Attachment::from_data_url(&self.data_url, self.name).map_err(|e| api_error(e.into()))
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceRequest {
    pub data_url: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DescriptionRequest {
    pub description: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleRequest {
    pub style_id: String,
}

#[derive(Debug, Deserialize)]
pub struct CustomPromptRequest {
    pub prompt: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NegativePromptRequest {
    pub negative_prompt: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MockupRequest {
    pub mockup_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CropRequest {
    pub src: String,
    pub display_width: f64,
    pub display_height: f64,
    #[serde(default)]
    pub aspect: AspectRatio,
    pub drag_x: Option<f64>,
    pub drag_y: Option<f64>,
    pub base_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CropResponse {
    pub rect: CropRect,
    pub src: String,
    pub name: String,
}

// --- handlers ---

pub async fn create_session(
    State(state): State<AppState>,
    body: Option<Json<CreateSessionRequest>>,
) -> ApiResult<SessionResponse> {
    let id = body.and_then(|Json(b)| b.id).unwrap_or_else(Uuid::new_v4);
    let existing = state.sessions.read().get(&id).cloned();
    let studio = match existing {
        Some(studio) => studio,
        None => {
            info!("🎯 Opening session {}", id);
            let opened = Studio::open(state.model.clone(), state.store.clone(), StorageKeys::scoped(&id.to_string())).await;
            state.sessions.write().entry(id).or_insert(opened).clone()
        }
    };
    Ok(Json(SessionResponse { id, view: studio.view() }))
}

pub async fn get_session(Path(id): Path<Uuid>, State(state): State<AppState>) -> ApiResult<WorkflowView> {
    Ok(Json(studio(&state, id)?.view()))
}

pub async fn upload(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(body): Json<AttachmentRequest>,
) -> ApiResult<WorkflowView> {
    let studio = studio(&state, id)?;
    let upload = body.into_attachment()?;
    studio.upload(upload).await.map(Json).map_err(api_error)
}

pub async fn enhance(Path(id): Path<Uuid>, State(state): State<AppState>) -> ApiResult<WorkflowView> {
    studio(&state, id)?.enhance_image().await.map(Json).map_err(api_error)
}

pub async fn remove_background(Path(id): Path<Uuid>, State(state): State<AppState>) -> ApiResult<WorkflowView> {
    studio(&state, id)?.remove_background().await.map(Json).map_err(api_error)
}

pub async fn submit_description(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(body): Json<DescriptionRequest>,
) -> ApiResult<WorkflowView> {
    studio(&state, id)?.submit_description(&body.description).await.map(Json).map_err(api_error)
}

pub async fn select_style(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(body): Json<StyleRequest>,
) -> ApiResult<WorkflowView> {
    studio(&state, id)?.select_style(&body.style_id).await.map(Json).map_err(api_error)
}

pub async fn set_custom_prompt(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(body): Json<CustomPromptRequest>,
) -> ApiResult<WorkflowView> {
    studio(&state, id)?.set_custom_prompt(&body.prompt).await.map(Json).map_err(api_error)
}

pub async fn set_manual_settings(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(body): Json<ManualSettings>,
) -> ApiResult<WorkflowView> {
    studio(&state, id)?.set_manual_settings(body).await.map(Json).map_err(api_error)
}

pub async fn set_reference(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(body): Json<ReferenceRequest>,
) -> ApiResult<WorkflowView> {
    let studio = studio(&state, id)?;
    let reference = match body.data_url {
        Some(data_url) => Some(
            AttachmentRequest { data_url, name: body.name.unwrap_or_else(|| "reference-image.png".into()) }
                .into_attachment()?,
        ),
        None => None,
    };
    studio.set_reference(reference).await.map(Json).map_err(api_error)
}

pub async fn set_negative_prompt(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(body): Json<NegativePromptRequest>,
) -> ApiResult<WorkflowView> {
    studio(&state, id)?.set_negative_prompt(&body.negative_prompt).await.map(Json).map_err(api_error)
}

pub async fn enhance_prompt(Path(id): Path<Uuid>, State(state): State<AppState>) -> ApiResult<WorkflowView> {
    studio(&state, id)?.enhance_prompt().await.map(Json).map_err(api_error)
}

#[axum::debug_handler]
pub async fn generate(Path(id): Path<Uuid>, State(state): State<AppState>) -> ApiResult<WorkflowView> {
    let studio = studio(&state, id)?;
    info!("🚀 Starting generation for session {}", id);
    studio.start_generation().await.map(Json).map_err(api_error)
}

pub async fn regenerate_image(
    Path((id, index)): Path<(Uuid, usize)>,
    State(state): State<AppState>,
) -> ApiResult<WorkflowView> {
    studio(&state, id)?.regenerate_image(index).await.map(Json).map_err(api_error)
}

pub async fn generate_captions(Path(id): Path<Uuid>, State(state): State<AppState>) -> ApiResult<WorkflowView> {
    studio(&state, id)?.generate_captions().await.map(Json).map_err(api_error)
}

pub async fn change_style(Path(id): Path<Uuid>, State(state): State<AppState>) -> ApiResult<WorkflowView> {
    studio(&state, id)?.change_style().await.map(Json).map_err(api_error)
}

pub async fn reset(Path(id): Path<Uuid>, State(state): State<AppState>) -> ApiResult<WorkflowView> {
    Ok(Json(studio(&state, id)?.reset().await))
}

pub async fn save_results(Path(id): Path<Uuid>, State(state): State<AppState>) -> ApiResult<WorkflowView> {
    studio(&state, id)?.save_results().await.map(Json).map_err(api_error)
}

pub async fn generate_mockup(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(body): Json<MockupRequest>,
) -> ApiResult<GeneratedImage> {
    studio(&state, id)?.generate_mockup(&body.mockup_id).await.map(Json).map_err(api_error)
}

/// One stateless round of the crop tool: fit the ratio, apply an optional drag, rasterize.
pub async fn crop(Json(body): Json<CropRequest>) -> ApiResult<CropResponse> {
    let source = Attachment::from_data_url(&body.src, "image.png").map_err(|e| api_error(e.into()))?;
    let mut tool = CropTool::new(Size::new(body.display_width, body.display_height), body.aspect);
    if body.drag_x.is_some() || body.drag_y.is_some() {
        tool.begin_drag(0.0, 0.0);
        tool.drag_to(body.drag_x.unwrap_or_default(), body.drag_y.unwrap_or_default());
        tool.end_drag();
    }
    let base_name = body.base_name.as_deref().unwrap_or("image");
    let cropped = tool.crop_attachment(&source, base_name).map_err(|e: CropError| {
        warn!("Crop failed: {}", e);
        api_error(e.into())
    })?;
    Ok(Json(CropResponse { rect: tool.rect(), src: cropped.data_url(), name: cropped.name }))
}

pub async fn list_lighting() -> Json<Vec<Value>> {
    Json(Lighting::ALL.iter().map(|l| json!({ "id": l.label(), "phrase": l.phrase() })).collect())
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/:id", get(get_session))
        .route("/api/sessions/:id/upload", post(upload))
        .route("/api/sessions/:id/enhance", post(enhance))
        .route("/api/sessions/:id/remove-background", post(remove_background))
        .route("/api/sessions/:id/description", post(submit_description))
        .route("/api/sessions/:id/style", post(select_style))
        .route("/api/sessions/:id/custom-prompt", post(set_custom_prompt))
        .route("/api/sessions/:id/manual", post(set_manual_settings))
        .route("/api/sessions/:id/reference", post(set_reference))
        .route("/api/sessions/:id/negative-prompt", post(set_negative_prompt))
        .route("/api/sessions/:id/enhance-prompt", post(enhance_prompt))
        .route("/api/sessions/:id/generate", post(generate))
        .route("/api/sessions/:id/images/:index/regenerate", post(regenerate_image))
        .route("/api/sessions/:id/captions", post(generate_captions))
        .route("/api/sessions/:id/change-style", post(change_style))
        .route("/api/sessions/:id/reset", post(reset))
        .route("/api/sessions/:id/save", post(save_results))
        .route("/api/sessions/:id/mockup", post(generate_mockup))
        .route("/api/crop", post(crop))
        .route("/api/lighting", get(list_lighting))
        .with_state(state)
}
