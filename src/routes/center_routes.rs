// src/routes/center_routes.rs

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::get,
};
use chrono::NaiveDate;
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::{ApiOk, AppState, Bed, SessionTemplate, Weekday},
    routes::schedule_routes::{SESSION_VIEW_SELECT, ScheduledSessionView},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/centers/{center_id}/beds", get(list_beds))
        .route("/centers/{center_id}/templates", get(list_templates))
        .route("/centers/{center_id}/schedule-sessions", get(list_sessions))
}

async fn ensure_center(state: &AppState, center_id: Uuid) -> Result<(), ApiError> {
    let exists: bool =
        sqlx::query_scalar(r#"SELECT EXISTS (SELECT 1 FROM centers WHERE center_id = $1)"#)
            .bind(center_id)
            .fetch_one(&state.db)
            .await
            .map_err(|e| ApiError::internal("center lookup failed", e))?;
    if exists {
        Ok(())
    } else {
        Err(ApiError::NotFound("NOT_FOUND", "center not found".into()))
    }
}

pub async fn list_beds(
    State(state): State<AppState>,
    _auth: AuthContext,
    Path(center_id): Path<Uuid>,
) -> Result<Json<ApiOk<Vec<Bed>>>, ApiError> {
    ensure_center(&state, center_id).await?;

    let beds = sqlx::query_as::<_, Bed>(
        r#"
        SELECT bed_id, center_id, label, status
        FROM beds
        WHERE center_id = $1
        ORDER BY bed_id ASC
        "#,
    )
    .bind(center_id)
    .fetch_all(&state.db)
    .await
    .map_err(|e| ApiError::internal("bed list failed", e))?;

    Ok(Json(ApiOk { data: beds }))
}

#[derive(Debug, Deserialize)]
pub struct TemplateQuery {
    pub weekday: Option<Weekday>,
}

pub async fn list_templates(
    State(state): State<AppState>,
    _auth: AuthContext,
    Path(center_id): Path<Uuid>,
    Query(q): Query<TemplateQuery>,
) -> Result<Json<ApiOk<Vec<SessionTemplate>>>, ApiError> {
    ensure_center(&state, center_id).await?;

    let rows = sqlx::query_as::<_, SessionTemplate>(
        r#"
        SELECT session_id, center_id, doctor_id, weekday, start_time, end_time,
               default_capacity, recurrence_pattern, status
        FROM sessions
        WHERE center_id = $1
          AND ($2::weekday IS NULL OR weekday = $2)
        ORDER BY weekday ASC, start_time ASC
        "#,
    )
    .bind(center_id)
    .bind(q.weekday)
    .fetch_all(&state.db)
    .await
    .map_err(|e| ApiError::internal("template list failed", e))?;

    Ok(Json(ApiOk { data: rows }))
}

#[derive(Debug, Deserialize)]
pub struct SessionRangeQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

pub async fn list_sessions(
    State(state): State<AppState>,
    _auth: AuthContext,
    Path(center_id): Path<Uuid>,
    Query(q): Query<SessionRangeQuery>,
) -> Result<Json<ApiOk<Vec<ScheduledSessionView>>>, ApiError> {
    if let (Some(from), Some(to)) = (q.from, q.to) {
        if from > to {
            return Err(ApiError::BadRequest(
                "VALIDATION_ERROR",
                "from must not be after to".into(),
            ));
        }
    }
    ensure_center(&state, center_id).await?;

    let sql = format!(
        r#"
        {SESSION_VIEW_SELECT}
        WHERE ss.center_id = $1
          AND ($2::date IS NULL OR ss.session_date >= $2)
          AND ($3::date IS NULL OR ss.session_date <= $3)
        ORDER BY ss.session_date ASC, ss.start_time ASC
        "#
    );
    let rows = sqlx::query_as::<_, ScheduledSessionView>(&sql)
        .bind(center_id)
        .bind(q.from)
        .bind(q.to)
        .fetch_all(&state.db)
        .await
        .map_err(|e| ApiError::internal("scheduled session list failed", e))?;

    Ok(Json(ApiOk { data: rows }))
}
