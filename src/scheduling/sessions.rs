//! Single scheduled-session operations: add, update (with capacity
//! reconciliation) and delete.

use chrono::{NaiveDate, NaiveTime};
use serde::Deserialize;
use uuid::Uuid;

use crate::models::{ScheduledSession, SessionStatus};
use crate::scheduling::generator::beds_for_capacity;
use crate::scheduling::patch::SessionPatch;
use crate::scheduling::reconciler::reconcile_capacity;
use crate::scheduling::store::NewScheduledSession;
use crate::scheduling::{Actor, Result, ScheduleError, ScheduleStore, ScheduleTx, verify_capacity};

#[derive(Debug, Clone, Deserialize)]
pub struct CreateScheduledSession {
    pub center_id: Uuid,
    pub session_template_id: Option<Uuid>,
    pub session_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub available_beds: i32,
    pub notes: Option<String>,
}

fn validate_times(start: NaiveTime, end: NaiveTime) -> Result<()> {
    if start >= end {
        return Err(ScheduleError::validation("end_time must be after start_time"));
    }
    Ok(())
}

fn validate_beds(available_beds: i32) -> Result<()> {
    if available_beds <= 0 {
        return Err(ScheduleError::validation("available_beds must be > 0"));
    }
    Ok(())
}

async fn ensure_template_at_center(
    tx: &mut dyn ScheduleTx,
    session_template_id: Uuid,
    center_id: Uuid,
) -> Result<()> {
    match tx.get_template(session_template_id).await? {
        Some(t) if t.center_id == center_id => Ok(()),
        _ => Err(ScheduleError::NotFound("session template")),
    }
}

pub async fn create_scheduled_session(
    store: &dyn ScheduleStore,
    actor: Actor,
    req: CreateScheduledSession,
) -> Result<ScheduledSession> {
    validate_times(req.start_time, req.end_time)?;
    validate_beds(req.available_beds)?;

    let mut tx = store.begin().await?;
    if !tx.center_exists(req.center_id).await? {
        return Err(ScheduleError::NotFound("center"));
    }
    if let Some(template_id) = req.session_template_id {
        ensure_template_at_center(tx.as_mut(), template_id, req.center_id).await?;
        if tx
            .session_exists_for(req.center_id, template_id, req.session_date)
            .await?
        {
            return Err(ScheduleError::Conflict(
                "SESSION_EXISTS",
                format!(
                    "session template {template_id} already has a session on {}",
                    req.session_date
                ),
            ));
        }
    }

    let beds = tx.active_beds(req.center_id).await?;
    let bed_ids = beds_for_capacity(&beds, req.available_beds)?;

    let session = tx
        .insert_session(&NewScheduledSession {
            center_id: req.center_id,
            session_template_id: req.session_template_id,
            session_date: req.session_date,
            start_time: req.start_time,
            end_time: req.end_time,
            available_beds: req.available_beds,
            notes: req.notes,
            status: SessionStatus::Scheduled,
            created_by_user_id: actor.user_id,
        })
        .await?;
    tx.insert_assignments(session.schedule_session_id, &bed_ids)
        .await?;
    verify_capacity(tx.as_mut(), session.schedule_session_id, session.available_beds).await?;
    tx.commit().await?;

    tracing::info!(
        schedule_session_id = %session.schedule_session_id,
        center_id = %session.center_id,
        date = %session.session_date,
        beds = session.available_beds,
        "scheduled session created"
    );
    Ok(session)
}

/// Replaces the fields set in `patch`. A change of `available_beds` goes
/// through the capacity reconciler in the same transaction, so a rejected
/// change leaves the session exactly as it was.
pub async fn update_scheduled_session(
    store: &dyn ScheduleStore,
    schedule_session_id: Uuid,
    patch: SessionPatch,
) -> Result<ScheduledSession> {
    if patch.is_empty() {
        return Err(ScheduleError::validation("no fields to update"));
    }

    let mut tx = store.begin().await?;
    let current = tx
        .lock_session(schedule_session_id)
        .await?
        .ok_or(ScheduleError::NotFound("scheduled session"))?;

    let mut merged = current.clone();
    patch.apply(&mut merged);
    validate_times(merged.start_time, merged.end_time)?;
    validate_beds(merged.available_beds)?;

    if let Some(Some(template_id)) = patch.session_template_id.as_set() {
        ensure_template_at_center(tx.as_mut(), *template_id, current.center_id).await?;
    }

    let moved = merged.session_template_id != current.session_template_id
        || merged.session_date != current.session_date;
    if let (true, Some(template_id)) = (moved, merged.session_template_id) {
        if tx
            .session_exists_for(current.center_id, template_id, merged.session_date)
            .await?
        {
            return Err(ScheduleError::Conflict(
                "SESSION_EXISTS",
                format!(
                    "session template {template_id} already has a session on {}",
                    merged.session_date
                ),
            ));
        }
    }

    if let Some(&target) = patch.available_beds.as_set() {
        reconcile_capacity(tx.as_mut(), schedule_session_id, current.center_id, target).await?;
    }

    let updated = tx.update_session(schedule_session_id, &patch).await?;
    verify_capacity(tx.as_mut(), schedule_session_id, updated.available_beds).await?;
    tx.commit().await?;

    tracing::info!(
        %schedule_session_id,
        beds_before = current.available_beds,
        beds_after = updated.available_beds,
        "scheduled session updated"
    );
    Ok(updated)
}

/// Deletes a session together with its bed assignments. Appointment rows
/// referencing the session are not touched here.
pub async fn delete_scheduled_session(
    store: &dyn ScheduleStore,
    schedule_session_id: Uuid,
) -> Result<()> {
    let mut tx = store.begin().await?;
    if tx.lock_session(schedule_session_id).await?.is_none() {
        return Err(ScheduleError::NotFound("scheduled session"));
    }
    let released = tx.clear_assignments(schedule_session_id).await?;
    tx.delete_session(schedule_session_id).await?;
    tx.commit().await?;

    tracing::info!(%schedule_session_id, released, "scheduled session deleted");
    Ok(())
}
