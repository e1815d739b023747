//! Expands weekly session templates into dated, bed-backed sessions.

use chrono::{Datelike, NaiveDate};
use serde::Deserialize;
use uuid::Uuid;

use crate::models::{Bed, ScheduledSession, SessionStatus, SessionTemplate, Weekday};
use crate::scheduling::store::NewScheduledSession;
use crate::scheduling::{Actor, Result, ScheduleError, ScheduleStore, verify_capacity};

#[derive(Debug, Clone, Deserialize)]
pub struct GenerateRequest {
    pub center_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// Restrict generation to these templates. Absent means every active
    /// template of the center.
    pub template_ids: Option<Vec<Uuid>>,
}

/// Every calendar date in `[start, end]`.
pub fn dates_in_range(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    start.iter_days().take_while(|d| *d <= end).collect()
}

/// Dates from `dates` falling on `weekday`.
pub fn dates_on(dates: &[NaiveDate], weekday: Weekday) -> impl Iterator<Item = NaiveDate> + '_ {
    dates
        .iter()
        .copied()
        .filter(move |d| Weekday::from(d.weekday()) == weekday)
}

/// The beds a new session of `capacity` claims: the lowest-id active beds.
pub fn beds_for_capacity(active: &[Bed], capacity: i32) -> Result<Vec<Uuid>> {
    let wanted = usize::try_from(capacity)
        .map_err(|_| ScheduleError::validation("capacity must be > 0"))?;
    if active.len() < wanted {
        return Err(ScheduleError::Validation(
            "INSUFFICIENT_BEDS",
            format!(
                "cannot allocate {wanted} beds: the center only has {} active beds",
                active.len()
            ),
        ));
    }
    Ok(active.iter().take(wanted).map(|b| b.bed_id).collect())
}

pub async fn generate_sessions(
    store: &dyn ScheduleStore,
    actor: Actor,
    req: GenerateRequest,
    max_days: i64,
) -> Result<Vec<ScheduledSession>> {
    if req.start_date > req.end_date {
        return Err(ScheduleError::validation("start_date must not be after end_date"));
    }
    let span = (req.end_date - req.start_date).num_days() + 1;
    if span > max_days {
        return Err(ScheduleError::validation(format!(
            "date range spans {span} days; at most {max_days} are allowed"
        )));
    }

    let mut tx = store.begin().await?;
    if !tx.center_exists(req.center_id).await? {
        return Err(ScheduleError::NotFound("center"));
    }

    let templates: Vec<SessionTemplate> = tx
        .active_templates(req.center_id, req.template_ids.as_deref())
        .await?;
    if templates.is_empty() {
        return Err(ScheduleError::NotFound("session template"));
    }

    let beds = tx.active_beds(req.center_id).await?;
    let dates = dates_in_range(req.start_date, req.end_date);
    let mut created = Vec::new();
    let mut skipped = 0usize;

    for template in &templates {
        let mut bed_ids: Option<Vec<Uuid>> = None;

        for date in dates_on(&dates, template.weekday) {
            if tx
                .session_exists_for(req.center_id, template.session_id, date)
                .await?
            {
                skipped += 1;
                continue;
            }

            if bed_ids.is_none() {
                bed_ids = Some(beds_for_capacity(&beds, template.default_capacity)?);
            }
            let claimed = bed_ids.as_deref().unwrap_or_default();

            let session = tx
                .insert_session(&NewScheduledSession {
                    center_id: req.center_id,
                    session_template_id: Some(template.session_id),
                    session_date: date,
                    start_time: template.start_time,
                    end_time: template.end_time,
                    available_beds: template.default_capacity,
                    notes: None,
                    status: SessionStatus::Scheduled,
                    created_by_user_id: actor.user_id,
                })
                .await?;
            tx.insert_assignments(session.schedule_session_id, claimed)
                .await?;
            verify_capacity(tx.as_mut(), session.schedule_session_id, session.available_beds)
                .await?;

            created.push(session);
        }
    }

    tx.commit().await?;

    tracing::info!(
        center_id = %req.center_id,
        start = %req.start_date,
        end = %req.end_date,
        templates = templates.len(),
        created = created.len(),
        skipped,
        "scheduled sessions generated"
    );
    Ok(created)
}
