//! Half-open time-range intersection for session templates.

use chrono::NaiveTime;
use uuid::Uuid;

use crate::models::{SessionTemplate, Weekday};
use crate::scheduling::{Result, ScheduleError, ScheduleTx};

/// `[s1, e1)` and `[s2, e2)` intersect iff `s1 < e2 && s2 < e1`.
pub fn ranges_overlap(s1: NaiveTime, e1: NaiveTime, s2: NaiveTime, e2: NaiveTime) -> bool {
    s1 < e2 && s2 < e1
}

/// First template in `existing` whose range intersects `[start, end)`,
/// ignoring the template `exclude` (the one being edited).
pub fn find_overlap<'a>(
    existing: &'a [SessionTemplate],
    start: NaiveTime,
    end: NaiveTime,
    exclude: Option<Uuid>,
) -> Option<&'a SessionTemplate> {
    existing
        .iter()
        .filter(|t| Some(t.session_id) != exclude)
        .find(|t| ranges_overlap(start, end, t.start_time, t.end_time))
}

/// Fails with a conflict if an active template of the center on `weekday`
/// intersects `[start, end)`.
pub async fn ensure_no_overlap(
    tx: &mut dyn ScheduleTx,
    center_id: Uuid,
    weekday: Weekday,
    start: NaiveTime,
    end: NaiveTime,
    exclude: Option<Uuid>,
) -> Result<()> {
    let existing = tx.active_templates_on(center_id, weekday).await?;
    if let Some(clash) = find_overlap(&existing, start, end, exclude) {
        return Err(ScheduleError::Conflict(
            "TEMPLATE_OVERLAP",
            format!(
                "time range {start}-{end} overlaps existing session {} ({}-{})",
                clash.session_id, clash.start_time, clash.end_time
            ),
        ));
    }
    Ok(())
}
