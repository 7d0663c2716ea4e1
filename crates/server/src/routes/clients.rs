//! Client registry routes.

use axum::{
    Router,
    extract::{Path, State},
    response::Json as ResponseJson,
    routing::get,
};
use db::models::{
    client::{Client, CreateClient, UpdateClient},
    visit::{Visit, VisitRecord},
};
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{error::ApiError, state::AppState};

pub async fn list_clients(
    State(state): State<AppState>,
) -> Result<ResponseJson<ApiResponse<Vec<Client>>>, ApiError> {
    let clients = Client::find_all(&state.db.pool).await?;
    Ok(ResponseJson(ApiResponse::success(clients)))
}

pub async fn get_client(
    State(state): State<AppState>,
    Path(client_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<Client>>, ApiError> {
    let client = Client::find_by_id(&state.db.pool, client_id)
        .await?
        .ok_or(ApiError::ClientNotFound(client_id))?;
    Ok(ResponseJson(ApiResponse::success(client)))
}

pub async fn create_client(
    State(state): State<AppState>,
    axum::Json(payload): axum::Json<CreateClient>,
) -> Result<ResponseJson<ApiResponse<Client>>, ApiError> {
    let client = Client::create(&state.db.pool, Uuid::new_v4(), &payload).await?;
    Ok(ResponseJson(ApiResponse::success(client)))
}

pub async fn update_client(
    State(state): State<AppState>,
    Path(client_id): Path<Uuid>,
    axum::Json(payload): axum::Json<UpdateClient>,
) -> Result<ResponseJson<ApiResponse<Client>>, ApiError> {
    let client = Client::update(&state.db.pool, client_id, &payload)
        .await?
        .ok_or(ApiError::ClientNotFound(client_id))?;
    Ok(ResponseJson(ApiResponse::success(client)))
}

pub async fn delete_client(
    State(state): State<AppState>,
    Path(client_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    let deleted = Client::delete(&state.db.pool, client_id).await?;
    if deleted == 0 {
        return Err(ApiError::ClientNotFound(client_id));
    }
    Ok(ResponseJson(ApiResponse::success(())))
}

/// GET /api/clients/{client_id}/visits
/// Completed visit history, most recent first
pub async fn client_visits(
    State(state): State<AppState>,
    Path(client_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<Vec<VisitRecord>>>, ApiError> {
    if Client::find_by_id(&state.db.pool, client_id).await?.is_none() {
        return Err(ApiError::ClientNotFound(client_id));
    }
    let visits = Visit::find_by_client_id(&state.db.pool, client_id)
        .await?
        .into_iter()
        .map(Visit::into_record)
        .collect();
    Ok(ResponseJson(ApiResponse::success(visits)))
}

pub fn router() -> Router<AppState> {
    Router::new().nest(
        "/clients",
        Router::new()
            .route("/", get(list_clients).post(create_client))
            .route(
                "/{client_id}",
                get(get_client).put(update_client).delete(delete_client),
            )
            .route("/{client_id}/visits", get(client_visits)),
    )
}
