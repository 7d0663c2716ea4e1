use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use services::services::{
    dashboard::DashboardError,
    gemini_api::GeminiApiError,
    inventory::InventoryError,
    visit_workflow::{StepValidationError, WorkflowError},
};
use thiserror::Error;
use tracing::error;
use utils::response::ApiResponse;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Workflow(#[from] WorkflowError),
    #[error(transparent)]
    Inventory(#[from] InventoryError),
    #[error(transparent)]
    Dashboard(#[from] DashboardError),
    #[error(transparent)]
    Gemini(#[from] GeminiApiError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("visit not found: {0}")]
    VisitNotFound(Uuid),
    #[error("client not found: {0}")]
    ClientNotFound(Uuid),
    #[error("product not found: {0}")]
    ProductNotFound(Uuid),
    #[error("assistant is not configured")]
    AssistantUnavailable,
    #[error("{0}")]
    BadRequest(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Workflow(e) => match e {
                WorkflowError::ClientNotFound(_) => StatusCode::NOT_FOUND,
                WorkflowError::OutOfSequence { .. }
                | WorkflowError::AlreadyCompleted
                | WorkflowError::NotCompleted => StatusCode::CONFLICT,
                WorkflowError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
                WorkflowError::Persistence(_) | WorkflowError::Collaborator(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            Self::Inventory(e) => match e {
                InventoryError::ProductNotFound(_) => StatusCode::NOT_FOUND,
                InventoryError::InvalidQuantity(_) => StatusCode::UNPROCESSABLE_ENTITY,
                InventoryError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Gemini(e) => match e {
                GeminiApiError::MissingApiKey | GeminiApiError::InvalidApiKey => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                GeminiApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
                _ => StatusCode::BAD_GATEWAY,
            },
            Self::VisitNotFound(_) | Self::ClientNotFound(_) | Self::ProductNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            Self::AssistantUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Dashboard(_) | Self::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StepValidationError> for ApiError {
    fn from(e: StepValidationError) -> Self {
        Self::Workflow(WorkflowError::Validation(e))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("{}", self);
        }
        (status, Json(ApiResponse::<()>::error(self.to_string()))).into_response()
    }
}
