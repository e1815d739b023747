//! Keeps a session's bed assignments in step with its `available_beds`.

use std::collections::HashSet;

use uuid::Uuid;

use crate::models::{AssignmentStatus, Bed, SessionBedAssignment};
use crate::scheduling::{Result, ScheduleError, ScheduleTx};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapacityPlan {
    Unchanged,
    /// Delete these assignments (all currently `available`).
    Release(Vec<Uuid>),
    /// Add assignments for these beds.
    Claim(Vec<Uuid>),
}

/// Decides how to move from `current` (sorted by bed id) to `target`
/// assignments. Shrinking drops the highest bed ids; growing takes the
/// lowest-id active beds not yet assigned.
pub fn plan_capacity(
    current: &[SessionBedAssignment],
    active_beds: &[Bed],
    target: i32,
) -> Result<CapacityPlan> {
    let target = usize::try_from(target)
        .ok()
        .filter(|t| *t > 0)
        .ok_or_else(|| ScheduleError::validation("available_beds must be > 0"))?;
    let have = current.len();

    if target < have {
        let victims = &current[target..];
        if victims.iter().any(|a| a.status != AssignmentStatus::Available) {
            return Err(ScheduleError::Conflict(
                "BEDS_ASSIGNED",
                "cannot reduce beds because some are assigned to patients".into(),
            ));
        }
        return Ok(CapacityPlan::Release(
            victims.iter().map(|a| a.bed_id).collect(),
        ));
    }

    if target > have {
        if active_beds.len() < target {
            return Err(ScheduleError::Validation(
                "INSUFFICIENT_BEDS",
                format!(
                    "cannot add more beds than the center has ({} active)",
                    active_beds.len()
                ),
            ));
        }
        let taken: HashSet<Uuid> = current.iter().map(|a| a.bed_id).collect();
        let needed = target - have;
        let picked: Vec<Uuid> = active_beds
            .iter()
            .map(|b| b.bed_id)
            .filter(|id| !taken.contains(id))
            .take(needed)
            .collect();
        if picked.len() < needed {
            return Err(ScheduleError::Validation(
                "INSUFFICIENT_BEDS",
                format!(
                    "only {} unassigned active beds left, {needed} needed",
                    picked.len()
                ),
            ));
        }
        return Ok(CapacityPlan::Claim(picked));
    }

    Ok(CapacityPlan::Unchanged)
}

/// Reconciles the assignments of a session to `target` inside `tx`.
/// The caller persists `available_beds` itself.
pub async fn reconcile_capacity(
    tx: &mut dyn ScheduleTx,
    schedule_session_id: Uuid,
    center_id: Uuid,
    target: i32,
) -> Result<CapacityPlan> {
    let current = tx.assignments(schedule_session_id).await?;
    let beds = tx.active_beds(center_id).await?;

    let plan = match plan_capacity(&current, &beds, target) {
        Ok(plan) => plan,
        Err(e) => {
            tracing::warn!(
                %schedule_session_id,
                current = current.len(),
                target,
                error = %e,
                "bed capacity change rejected"
            );
            return Err(e);
        }
    };

    match &plan {
        CapacityPlan::Unchanged => {}
        CapacityPlan::Release(bed_ids) => {
            let removed = tx.release_assignments(schedule_session_id, bed_ids).await?;
            if removed != bed_ids.len() as u64 {
                // A bed got occupied between the read and the delete.
                return Err(ScheduleError::Conflict(
                    "BEDS_ASSIGNED",
                    "cannot reduce beds because some are assigned to patients".into(),
                ));
            }
        }
        CapacityPlan::Claim(bed_ids) => {
            tx.insert_assignments(schedule_session_id, bed_ids).await?;
        }
    }

    tracing::debug!(%schedule_session_id, ?plan, "bed assignments reconciled");
    Ok(plan)
}
