//! Assistant routes backed by the Gemini API.
//!
//! All prompts are wrapped in a pool-maintenance system instruction so
//! answers stay on topic for technicians in the field.

use axum::{
    Router,
    extract::State,
    response::{
        Json as ResponseJson,
        sse::{Event, KeepAlive, Sse},
    },
    routing::post,
};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use futures_util::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use services::services::gemini_api::GeminiApiClient;
use std::convert::Infallible;
use ts_rs::TS;
use utils::response::ApiResponse;

use crate::{error::ApiError, state::AppState};

const SYSTEM_INSTRUCTION: &str = "Você é um assistente especializado em manutenção de piscinas. \
     Responda em português, de forma objetiva, sobre química da água, \
     dosagem de produtos e manutenção de equipamentos.";

#[derive(Debug, Deserialize, TS)]
pub struct AskPayload {
    pub prompt: String,
}

#[derive(Debug, Serialize, TS)]
pub struct AskResponse {
    pub answer: String,
}

fn assistant(state: &AppState) -> Result<&GeminiApiClient, ApiError> {
    state.gemini.as_ref().ok_or(ApiError::AssistantUnavailable)
}

pub async fn ask(
    State(state): State<AppState>,
    axum::Json(payload): axum::Json<AskPayload>,
) -> Result<ResponseJson<ApiResponse<AskResponse>>, ApiError> {
    let answer = assistant(&state)?
        .generate(&payload.prompt, Some(SYSTEM_INSTRUCTION.to_string()))
        .await?;
    Ok(ResponseJson(ApiResponse::success(AskResponse { answer })))
}

#[derive(Debug, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct AskWithImagePayload {
    pub prompt: String,
    pub mime_type: String,
    /// Base64-encoded image, e.g. a photo of a test strip
    pub image: String,
}

pub async fn ask_with_image(
    State(state): State<AppState>,
    axum::Json(payload): axum::Json<AskWithImagePayload>,
) -> Result<ResponseJson<ApiResponse<AskResponse>>, ApiError> {
    let image = BASE64
        .decode(&payload.image)
        .map_err(|e| ApiError::BadRequest(format!("invalid base64 image: {e}")))?;

    let answer = assistant(&state)?
        .generate_from_image(
            &payload.prompt,
            &payload.mime_type,
            &image,
            Some(SYSTEM_INSTRUCTION.to_string()),
        )
        .await?;
    Ok(ResponseJson(ApiResponse::success(AskResponse { answer })))
}

/// POST /api/assistant/stream
/// Server-sent events; each event carries one answer fragment. Errors
/// mid-stream are reported as `error` events since the status line is
/// already sent.
pub async fn ask_stream(
    State(state): State<AppState>,
    axum::Json(payload): axum::Json<AskPayload>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let stream = assistant(&state)?
        .generate_stream(&payload.prompt, Some(SYSTEM_INSTRUCTION.to_string()))
        .await?;

    let events = stream.map(|fragment| {
        let event = match fragment {
            Ok(text) => Event::default().data(text),
            Err(e) => Event::default().event("error").data(e.to_string()),
        };
        Ok(event)
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

pub fn router() -> Router<AppState> {
    Router::new().nest(
        "/assistant",
        Router::new()
            .route("/generate", post(ask))
            .route("/generate-image", post(ask_with_image))
            .route("/stream", post(ask_stream)),
    )
}
