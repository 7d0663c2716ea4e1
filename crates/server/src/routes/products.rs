//! Product inventory routes.

use axum::{
    Router,
    extract::{Path, Query, State},
    response::Json as ResponseJson,
    routing::{get, post},
};
use db::models::product::{CreateProduct, Product, StockMovement, UpdateProduct};
use serde::Deserialize;
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{error::ApiError, state::AppState};

pub async fn list_products(
    State(state): State<AppState>,
) -> Result<ResponseJson<ApiResponse<Vec<Product>>>, ApiError> {
    let products = Product::find_all(&state.db.pool).await?;
    Ok(ResponseJson(ApiResponse::success(products)))
}

pub async fn get_product(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<Product>>, ApiError> {
    let product = Product::find_by_id(&state.db.pool, product_id)
        .await?
        .ok_or(ApiError::ProductNotFound(product_id))?;
    Ok(ResponseJson(ApiResponse::success(product)))
}

pub async fn create_product(
    State(state): State<AppState>,
    axum::Json(payload): axum::Json<CreateProduct>,
) -> Result<ResponseJson<ApiResponse<Product>>, ApiError> {
    let product = Product::create(&state.db.pool, Uuid::new_v4(), &payload).await?;
    Ok(ResponseJson(ApiResponse::success(product)))
}

pub async fn update_product(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
    axum::Json(payload): axum::Json<UpdateProduct>,
) -> Result<ResponseJson<ApiResponse<Product>>, ApiError> {
    let product = Product::update(&state.db.pool, product_id, &payload)
        .await?
        .ok_or(ApiError::ProductNotFound(product_id))?;
    Ok(ResponseJson(ApiResponse::success(product)))
}

pub async fn delete_product(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    let deleted = Product::delete(&state.db.pool, product_id).await?;
    if deleted == 0 {
        return Err(ApiError::ProductNotFound(product_id));
    }
    Ok(ResponseJson(ApiResponse::success(())))
}

pub async fn low_stock(
    State(state): State<AppState>,
) -> Result<ResponseJson<ApiResponse<Vec<Product>>>, ApiError> {
    let products = state.inventory.low_stock().await?;
    Ok(ResponseJson(ApiResponse::success(products)))
}

#[derive(Debug, Deserialize)]
pub struct MovementPayload {
    pub quantity: f64,
    pub note: Option<String>,
}

pub async fn restock_product(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
    axum::Json(payload): axum::Json<MovementPayload>,
) -> Result<ResponseJson<ApiResponse<StockMovement>>, ApiError> {
    let movement = state
        .inventory
        .restock(product_id, payload.quantity, payload.note)
        .await?;
    Ok(ResponseJson(ApiResponse::success(movement)))
}

pub async fn adjust_product(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
    axum::Json(payload): axum::Json<MovementPayload>,
) -> Result<ResponseJson<ApiResponse<StockMovement>>, ApiError> {
    let movement = state
        .inventory
        .adjust(product_id, payload.quantity, payload.note)
        .await?;
    Ok(ResponseJson(ApiResponse::success(movement)))
}

#[derive(Debug, Deserialize)]
pub struct MovementsQuery {
    pub limit: Option<i32>,
}

pub async fn product_movements(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
    Query(query): Query<MovementsQuery>,
) -> Result<ResponseJson<ApiResponse<Vec<StockMovement>>>, ApiError> {
    let movements = state
        .inventory
        .movements(product_id, query.limit.unwrap_or(50))
        .await?;
    Ok(ResponseJson(ApiResponse::success(movements)))
}

pub fn router() -> Router<AppState> {
    Router::new().nest(
        "/products",
        Router::new()
            .route("/", get(list_products).post(create_product))
            .route("/low-stock", get(low_stock))
            .route(
                "/{product_id}",
                get(get_product).put(update_product).delete(delete_product),
            )
            .route("/{product_id}/restock", post(restock_product))
            .route("/{product_id}/adjust", post(adjust_product))
            .route("/{product_id}/movements", get(product_movements)),
    )
}
