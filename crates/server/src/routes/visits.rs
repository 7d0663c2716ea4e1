//! Service-visit workflow routes.
//!
//! A workflow lives in the in-memory map from `start` until the visit is
//! saved or abandoned. After a persistence failure the entry stays so the
//! technician can retry the save.

use std::sync::Arc;

use axum::{
    Router,
    extract::{Path, State},
    response::Json as ResponseJson,
    routing::{delete, get, post},
};
use db::models::visit::Recommendation;
use serde::{Deserialize, Serialize};
use services::services::visit_workflow::{
    ApplicationInput, AssessmentInput, CheckInInput, Step, StepPayload, VisitWorkflow,
    WorkflowSnapshot, recommendation_catalog, urgent_issue_catalog,
};
use services::services::water_chemistry::WaterParametersInput;
use tokio::sync::Mutex;
use ts_rs::TS;
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{error::ApiError, state::AppState};

#[derive(Debug, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct StartVisitPayload {
    pub client_id: Uuid,
    pub technician: String,
}

pub async fn start_visit(
    State(state): State<AppState>,
    axum::Json(payload): axum::Json<StartVisitPayload>,
) -> Result<ResponseJson<ApiResponse<WorkflowSnapshot>>, ApiError> {
    let workflow = VisitWorkflow::start(
        state.db.clone(),
        state.db.clone(),
        state.db.clone(),
        payload.client_id,
        payload.technician,
    )
    .await?;

    let snapshot = workflow.snapshot();
    state
        .workflows
        .insert(snapshot.record.id, Arc::new(Mutex::new(workflow)));
    Ok(ResponseJson(ApiResponse::success(snapshot)))
}

fn lookup(state: &AppState, visit_id: Uuid) -> Result<Arc<Mutex<VisitWorkflow>>, ApiError> {
    state
        .workflows
        .get(&visit_id)
        .map(|entry| entry.value().clone())
        .ok_or(ApiError::VisitNotFound(visit_id))
}

pub async fn get_snapshot(
    State(state): State<AppState>,
    Path(visit_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<WorkflowSnapshot>>, ApiError> {
    let workflow = lookup(&state, visit_id)?;
    let snapshot = workflow.lock().await.snapshot();
    Ok(ResponseJson(ApiResponse::success(snapshot)))
}

/// POST /api/visits/{visit_id}/steps/{step}
/// Submit one workflow step. The body shape depends on the step number;
/// step 3 takes no body because applications are staged beforehand.
pub async fn submit_step(
    State(state): State<AppState>,
    Path((visit_id, step)): Path<(Uuid, u8)>,
    body: axum::body::Bytes,
) -> Result<ResponseJson<ApiResponse<WorkflowSnapshot>>, ApiError> {
    let step = Step::from_index(step)
        .ok_or_else(|| ApiError::BadRequest(format!("unknown step: {step}")))?;
    let body = if body.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&body).map_err(|e| ApiError::BadRequest(e.to_string()))?
    };

    let payload = match step {
        Step::CheckIn => StepPayload::CheckIn(parse_body::<CheckInInput>(body)?),
        Step::Parameters => StepPayload::Parameters(parse_body::<WaterParametersInput>(body)?),
        Step::Products => StepPayload::Products,
        Step::Assessment => StepPayload::Assessment(parse_body::<AssessmentInput>(body)?),
    };

    let workflow = lookup(&state, visit_id)?;
    let mut guard = workflow.lock().await;
    guard.submit_step(payload).await?;

    let snapshot = guard.snapshot();
    drop(guard);
    if snapshot.saved {
        state.workflows.remove(&visit_id);
    }
    Ok(ResponseJson(ApiResponse::success(snapshot)))
}

fn parse_body<T: serde::de::DeserializeOwned + Default>(
    body: serde_json::Value,
) -> Result<T, ApiError> {
    if body.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(body).map_err(|e| ApiError::BadRequest(e.to_string()))
}

pub async fn stage_application(
    State(state): State<AppState>,
    Path(visit_id): Path<Uuid>,
    axum::Json(payload): axum::Json<ApplicationInput>,
) -> Result<ResponseJson<ApiResponse<WorkflowSnapshot>>, ApiError> {
    let workflow = lookup(&state, visit_id)?;
    let mut guard = workflow.lock().await;
    guard.stage_application(payload).await?;
    Ok(ResponseJson(ApiResponse::success(guard.snapshot())))
}

pub async fn remove_application(
    State(state): State<AppState>,
    Path((visit_id, application_id)): Path<(Uuid, Uuid)>,
) -> Result<ResponseJson<ApiResponse<WorkflowSnapshot>>, ApiError> {
    let workflow = lookup(&state, visit_id)?;
    let mut guard = workflow.lock().await;
    if !guard.remove_application(application_id) {
        return Err(ApiError::BadRequest(format!(
            "no staged application with id {application_id}"
        )));
    }
    Ok(ResponseJson(ApiResponse::success(guard.snapshot())))
}

pub async fn previous_step(
    State(state): State<AppState>,
    Path(visit_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<WorkflowSnapshot>>, ApiError> {
    let workflow = lookup(&state, visit_id)?;
    let mut guard = workflow.lock().await;
    guard.previous_step()?;
    Ok(ResponseJson(ApiResponse::success(guard.snapshot())))
}

pub async fn retry_save(
    State(state): State<AppState>,
    Path(visit_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<WorkflowSnapshot>>, ApiError> {
    let workflow = lookup(&state, visit_id)?;
    let mut guard = workflow.lock().await;
    guard.retry_save().await?;

    let snapshot = guard.snapshot();
    drop(guard);
    if snapshot.saved {
        state.workflows.remove(&visit_id);
    }
    Ok(ResponseJson(ApiResponse::success(snapshot)))
}

pub async fn abandon_visit(
    State(state): State<AppState>,
    Path(visit_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    let (_, workflow) = state
        .workflows
        .remove(&visit_id)
        .ok_or(ApiError::VisitNotFound(visit_id))?;
    if let Ok(mutex) = Arc::try_unwrap(workflow) {
        mutex.into_inner().abandon();
    }
    Ok(ResponseJson(ApiResponse::success(())))
}

/// Static pick lists for the assessment step.
#[derive(Debug, Serialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentCatalogs {
    pub recommendations: Vec<Recommendation>,
    pub urgent_issues: Vec<&'static str>,
}

pub async fn assessment_catalogs() -> ResponseJson<ApiResponse<AssessmentCatalogs>> {
    ResponseJson(ApiResponse::success(AssessmentCatalogs {
        recommendations: recommendation_catalog(),
        urgent_issues: urgent_issue_catalog(),
    }))
}

pub fn router() -> Router<AppState> {
    Router::new().nest(
        "/visits",
        Router::new()
            .route("/start", post(start_visit))
            .route("/catalogs", get(assessment_catalogs))
            .route("/{visit_id}", get(get_snapshot))
            .route("/{visit_id}/steps/{step}", post(submit_step))
            .route("/{visit_id}/applications", post(stage_application))
            .route(
                "/{visit_id}/applications/{application_id}",
                delete(remove_application),
            )
            .route("/{visit_id}/previous", post(previous_step))
            .route("/{visit_id}/retry-save", post(retry_save))
            .route("/{visit_id}/abandon", post(abandon_visit)),
    )
}
