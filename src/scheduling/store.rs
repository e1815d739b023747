//! Transactional data-access seam for the scheduling core.
//!
//! `ScheduleStore::begin` hands out a unit of work. Nothing written through a
//! [`ScheduleTx`] is visible to other callers until `commit`; dropping the
//! transaction discards it.

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    Bed, RecordStatus, RecurrencePattern, ScheduledSession, SessionBedAssignment, SessionStatus,
    SessionTemplate, Weekday,
};
use crate::scheduling::patch::{SessionPatch, TemplatePatch};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A uniqueness constraint rejected the write.
    #[error("duplicate {0}")]
    Duplicate(String),

    #[error("invariant violated: {0}")]
    Invariant(String),
}

#[derive(Debug, Clone)]
pub struct NewTemplate {
    pub center_id: Uuid,
    pub doctor_id: Option<Uuid>,
    pub weekday: Weekday,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub default_capacity: i32,
    pub recurrence_pattern: RecurrencePattern,
    pub status: RecordStatus,
}

#[derive(Debug, Clone)]
pub struct NewScheduledSession {
    pub center_id: Uuid,
    pub session_template_id: Option<Uuid>,
    pub session_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub available_beds: i32,
    pub notes: Option<String>,
    pub status: SessionStatus,
    pub created_by_user_id: Uuid,
}

#[async_trait]
pub trait ScheduleStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn ScheduleTx>, StoreError>;
}

#[async_trait]
pub trait ScheduleTx: Send {
    async fn center_exists(&mut self, center_id: Uuid) -> Result<bool, StoreError>;

    /// Locks the center row until the transaction ends. Template writes take
    /// this lock before checking for overlaps. Returns `false` if the center
    /// does not exist.
    async fn lock_center(&mut self, center_id: Uuid) -> Result<bool, StoreError>;

    /// Active beds of a center in ascending `bed_id` order.
    async fn active_beds(&mut self, center_id: Uuid) -> Result<Vec<Bed>, StoreError>;

    // ── Templates ─────────────────────────────────────────────────────

    async fn get_template(&mut self, session_id: Uuid)
    -> Result<Option<SessionTemplate>, StoreError>;

    /// Active templates for a center and weekday.
    async fn active_templates_on(
        &mut self,
        center_id: Uuid,
        weekday: Weekday,
    ) -> Result<Vec<SessionTemplate>, StoreError>;

    /// Active templates for a center, optionally restricted to `only`.
    async fn active_templates(
        &mut self,
        center_id: Uuid,
        only: Option<&[Uuid]>,
    ) -> Result<Vec<SessionTemplate>, StoreError>;

    async fn insert_template(&mut self, new: &NewTemplate) -> Result<SessionTemplate, StoreError>;

    async fn update_template(
        &mut self,
        session_id: Uuid,
        patch: &TemplatePatch,
    ) -> Result<SessionTemplate, StoreError>;

    async fn delete_template(&mut self, session_id: Uuid) -> Result<bool, StoreError>;

    // ── Scheduled sessions ────────────────────────────────────────────

    async fn session_exists_for(
        &mut self,
        center_id: Uuid,
        session_template_id: Uuid,
        session_date: NaiveDate,
    ) -> Result<bool, StoreError>;

    /// Loads a session and locks it against concurrent writers until the
    /// transaction ends.
    async fn lock_session(
        &mut self,
        schedule_session_id: Uuid,
    ) -> Result<Option<ScheduledSession>, StoreError>;

    async fn insert_session(
        &mut self,
        new: &NewScheduledSession,
    ) -> Result<ScheduledSession, StoreError>;

    async fn update_session(
        &mut self,
        schedule_session_id: Uuid,
        patch: &SessionPatch,
    ) -> Result<ScheduledSession, StoreError>;

    async fn delete_session(&mut self, schedule_session_id: Uuid) -> Result<bool, StoreError>;

    // ── Bed assignments ───────────────────────────────────────────────

    /// Assignments of a session in ascending `bed_id` order.
    async fn assignments(
        &mut self,
        schedule_session_id: Uuid,
    ) -> Result<Vec<SessionBedAssignment>, StoreError>;

    async fn count_assignments(&mut self, schedule_session_id: Uuid) -> Result<i64, StoreError>;

    /// Inserts one `available` assignment per bed.
    async fn insert_assignments(
        &mut self,
        schedule_session_id: Uuid,
        bed_ids: &[Uuid],
    ) -> Result<(), StoreError>;

    /// Deletes the given assignments, but only those still `available`.
    /// Returns how many rows went away.
    async fn release_assignments(
        &mut self,
        schedule_session_id: Uuid,
        bed_ids: &[Uuid],
    ) -> Result<u64, StoreError>;

    /// Deletes every assignment of a session regardless of status.
    async fn clear_assignments(&mut self, schedule_session_id: Uuid) -> Result<u64, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}
