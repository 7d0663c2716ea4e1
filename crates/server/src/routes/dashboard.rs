//! Dashboard metrics and weekly schedule routes.

use axum::{Router, extract::State, response::Json as ResponseJson, routing::get};
use services::services::dashboard::{DashboardMetrics, ScheduleDay};
use utils::response::ApiResponse;

use crate::{error::ApiError, state::AppState};

pub async fn metrics(
    State(state): State<AppState>,
) -> Result<ResponseJson<ApiResponse<DashboardMetrics>>, ApiError> {
    let metrics = state.dashboard.metrics().await?;
    Ok(ResponseJson(ApiResponse::success(metrics)))
}

pub async fn weekly_schedule(
    State(state): State<AppState>,
) -> Result<ResponseJson<ApiResponse<Vec<ScheduleDay>>>, ApiError> {
    let schedule = state.dashboard.weekly_schedule().await?;
    Ok(ResponseJson(ApiResponse::success(schedule)))
}

pub fn router() -> Router<AppState> {
    Router::new().nest(
        "/dashboard",
        Router::new()
            .route("/metrics", get(metrics))
            .route("/schedule", get(weekly_schedule)),
    )
}
