//! Recurring weekly session templates.

use chrono::NaiveTime;
use serde::Deserialize;
use uuid::Uuid;

use crate::models::{RecordStatus, RecurrencePattern, SessionTemplate, Weekday};
use crate::scheduling::overlap::ensure_no_overlap;
use crate::scheduling::patch::TemplatePatch;
use crate::scheduling::store::NewTemplate;
use crate::scheduling::{Result, ScheduleError, ScheduleStore};

#[derive(Debug, Clone, Deserialize)]
pub struct CreateTemplate {
    pub center_id: Uuid,
    pub doctor_id: Option<Uuid>,
    pub weekday: Weekday,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub default_capacity: i32,
    #[serde(default)]
    pub recurrence_pattern: RecurrencePattern,
}

fn validate_shape(start: NaiveTime, end: NaiveTime, capacity: i32) -> Result<()> {
    if start >= end {
        return Err(ScheduleError::validation("end_time must be after start_time"));
    }
    if capacity <= 0 {
        return Err(ScheduleError::validation("default_capacity must be > 0"));
    }
    Ok(())
}

pub async fn create_template(
    store: &dyn ScheduleStore,
    req: CreateTemplate,
) -> Result<SessionTemplate> {
    validate_shape(req.start_time, req.end_time, req.default_capacity)?;

    let mut tx = store.begin().await?;
    if !tx.lock_center(req.center_id).await? {
        return Err(ScheduleError::NotFound("center"));
    }
    ensure_no_overlap(
        tx.as_mut(),
        req.center_id,
        req.weekday,
        req.start_time,
        req.end_time,
        None,
    )
    .await?;

    let template = tx
        .insert_template(&NewTemplate {
            center_id: req.center_id,
            doctor_id: req.doctor_id,
            weekday: req.weekday,
            start_time: req.start_time,
            end_time: req.end_time,
            default_capacity: req.default_capacity,
            recurrence_pattern: req.recurrence_pattern,
            status: RecordStatus::Active,
        })
        .await?;
    tx.commit().await?;

    tracing::info!(
        session_id = %template.session_id,
        center_id = %template.center_id,
        weekday = ?template.weekday,
        "session template created"
    );
    Ok(template)
}

/// Applies a patch to a template. The overlap rule is checked again against
/// the merged result whenever it ends up active.
///
/// Both create and update hold the center lock across check and write, so
/// two writers on one center cannot both pass the overlap check.
pub async fn update_template(
    store: &dyn ScheduleStore,
    session_id: Uuid,
    patch: TemplatePatch,
) -> Result<SessionTemplate> {
    if patch.is_empty() {
        return Err(ScheduleError::validation("no fields to update"));
    }

    let mut tx = store.begin().await?;
    let center_id = tx
        .get_template(session_id)
        .await?
        .ok_or(ScheduleError::NotFound("session template"))?
        .center_id;
    tx.lock_center(center_id).await?;

    // Re-read under the lock so the merge sees the latest committed row.
    let mut merged = tx
        .get_template(session_id)
        .await?
        .ok_or(ScheduleError::NotFound("session template"))?;
    patch.apply(&mut merged);
    validate_shape(merged.start_time, merged.end_time, merged.default_capacity)?;

    if merged.status == RecordStatus::Active {
        ensure_no_overlap(
            tx.as_mut(),
            merged.center_id,
            merged.weekday,
            merged.start_time,
            merged.end_time,
            Some(session_id),
        )
        .await?;
    }

    let updated = tx.update_template(session_id, &patch).await?;
    tx.commit().await?;

    tracing::info!(%session_id, "session template updated");
    Ok(updated)
}

/// Scheduled sessions generated from the template keep existing and lose
/// their template reference.
pub async fn delete_template(store: &dyn ScheduleStore, session_id: Uuid) -> Result<()> {
    let mut tx = store.begin().await?;
    if !tx.delete_template(session_id).await? {
        return Err(ScheduleError::NotFound("session template"));
    }
    tx.commit().await?;

    tracing::info!(%session_id, "session template deleted");
    Ok(())
}
