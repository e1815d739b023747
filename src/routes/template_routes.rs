// src/routes/template_routes.rs

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use uuid::Uuid;

use crate::{
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::{ApiOk, AppState, OkData, SessionTemplate},
    scheduling::{
        patch::TemplatePatch,
        templates::{CreateTemplate, create_template, delete_template, update_template},
    },
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/templates", post(create))
        .route(
            "/templates/{session_id}",
            get(get_one).patch(patch_one).delete(delete_one),
        )
}

pub async fn create(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<CreateTemplate>,
) -> Result<Json<ApiOk<SessionTemplate>>, ApiError> {
    auth.ensure_schedule_manager()?;
    let template = create_template(&state.store, req).await?;
    Ok(Json(ApiOk { data: template }))
}

pub async fn get_one(
    State(state): State<AppState>,
    _auth: AuthContext,
    Path(session_id): Path<Uuid>,
) -> Result<Json<ApiOk<SessionTemplate>>, ApiError> {
    let template = sqlx::query_as::<_, SessionTemplate>(
        r#"
        SELECT session_id, center_id, doctor_id, weekday, start_time, end_time,
               default_capacity, recurrence_pattern, status
        FROM sessions
        WHERE session_id = $1
        "#,
    )
    .bind(session_id)
    .fetch_optional(&state.db)
    .await
    .map_err(|e| ApiError::internal("template lookup failed", e))?
    .ok_or_else(|| ApiError::NotFound("NOT_FOUND", "session template not found".into()))?;

    Ok(Json(ApiOk { data: template }))
}

pub async fn patch_one(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(session_id): Path<Uuid>,
    Json(patch): Json<TemplatePatch>,
) -> Result<Json<ApiOk<SessionTemplate>>, ApiError> {
    auth.ensure_schedule_manager()?;
    let template = update_template(&state.store, session_id, patch).await?;
    Ok(Json(ApiOk { data: template }))
}

pub async fn delete_one(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(session_id): Path<Uuid>,
) -> Result<Json<ApiOk<OkData>>, ApiError> {
    auth.ensure_schedule_manager()?;
    delete_template(&state.store, session_id).await?;
    Ok(Json(ApiOk {
        data: OkData { ok: true },
    }))
}
