// src/routes/schedule_routes.rs

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::{ApiOk, AppState, OkData, ScheduledSession, SessionBedAssignment, Weekday},
    scheduling::{
        generator::{GenerateRequest, generate_sessions},
        patch::SessionPatch,
        sessions::{
            CreateScheduledSession, create_scheduled_session, delete_scheduled_session,
            update_scheduled_session,
        },
    },
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/schedule-sessions", post(create_session))
        .route("/schedule-sessions/generate", post(generate))
        .route(
            "/schedule-sessions/{schedule_session_id}",
            get(get_session).patch(patch_session).delete(delete_session),
        )
        .route("/schedule-sessions/{schedule_session_id}/beds", get(list_session_beds))
}

/* ============================================================
   DTOs
   ============================================================ */

/// A scheduled session with display fields joined from its template.
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct ScheduledSessionView {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub session: ScheduledSession,
    pub template_weekday: Option<Weekday>,
    pub doctor_id: Option<Uuid>,
    pub doctor_name: Option<String>,
}

pub const SESSION_VIEW_SELECT: &str = r#"
    SELECT
      ss.schedule_session_id,
      ss.center_id,
      ss.session_template_id,
      ss.session_date,
      ss.start_time,
      ss.end_time,
      ss.available_beds,
      ss.notes,
      ss.status,
      ss.created_by_user_id,

      s.weekday AS template_weekday,
      d.doctor_id,
      d.display_name AS doctor_name

    FROM schedule_sessions ss
    LEFT JOIN sessions s ON s.session_id = ss.session_template_id
    LEFT JOIN doctors d ON d.doctor_id = s.doctor_id
"#;

pub(crate) async fn fetch_session_view(
    state: &AppState,
    schedule_session_id: Uuid,
) -> Result<ScheduledSessionView, ApiError> {
    let sql = format!("{SESSION_VIEW_SELECT} WHERE ss.schedule_session_id = $1");
    sqlx::query_as::<_, ScheduledSessionView>(&sql)
        .bind(schedule_session_id)
        .fetch_optional(&state.db)
        .await
        .map_err(|e| ApiError::internal("scheduled session lookup failed", e))?
        .ok_or_else(|| ApiError::NotFound("NOT_FOUND", "scheduled session not found".into()))
}

/* ============================================================
   GET /schedule-sessions/{id}
   ============================================================ */

pub async fn get_session(
    State(state): State<AppState>,
    _auth: AuthContext,
    Path(schedule_session_id): Path<Uuid>,
) -> Result<Json<ApiOk<ScheduledSessionView>>, ApiError> {
    Ok(Json(ApiOk {
        data: fetch_session_view(&state, schedule_session_id).await?,
    }))
}

/* ============================================================
   POST /schedule-sessions
   ============================================================ */

pub async fn create_session(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<CreateScheduledSession>,
) -> Result<Json<ApiOk<ScheduledSessionView>>, ApiError> {
    auth.ensure_schedule_manager()?;

    let session = create_scheduled_session(&state.store, auth.actor(), req).await?;

    Ok(Json(ApiOk {
        data: fetch_session_view(&state, session.schedule_session_id).await?,
    }))
}

/* ============================================================
   POST /schedule-sessions/generate
   ============================================================ */

pub async fn generate(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<GenerateRequest>,
) -> Result<Json<ApiOk<Vec<ScheduledSession>>>, ApiError> {
    auth.ensure_schedule_manager()?;

    let created =
        generate_sessions(&state.store, auth.actor(), req, state.max_generation_days).await?;

    Ok(Json(ApiOk { data: created }))
}

/* ============================================================
   PATCH /schedule-sessions/{id}
   ============================================================ */

pub async fn patch_session(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(schedule_session_id): Path<Uuid>,
    Json(patch): Json<SessionPatch>,
) -> Result<Json<ApiOk<ScheduledSessionView>>, ApiError> {
    auth.ensure_schedule_manager()?;

    update_scheduled_session(&state.store, schedule_session_id, patch).await?;

    Ok(Json(ApiOk {
        data: fetch_session_view(&state, schedule_session_id).await?,
    }))
}

/* ============================================================
   DELETE /schedule-sessions/{id}
   ============================================================ */

pub async fn delete_session(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(schedule_session_id): Path<Uuid>,
) -> Result<Json<ApiOk<OkData>>, ApiError> {
    auth.ensure_schedule_manager()?;

    delete_scheduled_session(&state.store, schedule_session_id).await?;

    Ok(Json(ApiOk {
        data: OkData { ok: true },
    }))
}

/* ============================================================
   GET /schedule-sessions/{id}/beds
   ============================================================ */

pub async fn list_session_beds(
    State(state): State<AppState>,
    _auth: AuthContext,
    Path(schedule_session_id): Path<Uuid>,
) -> Result<Json<ApiOk<Vec<SessionBedAssignment>>>, ApiError> {
    // 404 for unknown sessions rather than an empty list
    fetch_session_view(&state, schedule_session_id).await?;

    let rows = sqlx::query_as::<_, SessionBedAssignment>(
        r#"
        SELECT schedule_session_id, bed_id, status
        FROM session_beds
        WHERE schedule_session_id = $1
        ORDER BY bed_id ASC
        "#,
    )
    .bind(schedule_session_id)
    .fetch_all(&state.db)
    .await
    .map_err(|e| ApiError::internal("session beds lookup failed", e))?;

    Ok(Json(ApiOk { data: rows }))
}
