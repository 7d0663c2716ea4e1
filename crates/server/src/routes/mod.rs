use axum::Router;

use crate::state::AppState;

pub mod assistant;
pub mod clients;
pub mod dashboard;
pub mod products;
pub mod visits;

pub fn api_router() -> Router<AppState> {
    Router::new().nest(
        "/api",
        Router::new()
            .merge(clients::router())
            .merge(products::router())
            .merge(visits::router())
            .merge(dashboard::router())
            .merge(assistant::router()),
    )
}
