use crate::models::AppState;
use axum::Router;

pub mod auth_routes;
pub mod center_routes;
pub mod schedule_routes;
pub mod template_routes;

pub fn router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1/auth", auth_routes::router())
        .nest("/api/v1", center_routes::router())
        .nest("/api/v1", template_routes::router())
        .nest("/api/v1", schedule_routes::router())
        .with_state(state)
}
