//! In-memory schedule store used by the test suite.
//!
//! A transaction holds the store lock for its whole lifetime and works on a
//! private copy of the data, which replaces the shared copy on commit.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::models::{
    AssignmentStatus, Bed, RecordStatus, ScheduledSession, SessionBedAssignment, SessionTemplate,
    Weekday,
};
use crate::scheduling::patch::{SessionPatch, TemplatePatch};
use crate::scheduling::store::{
    NewScheduledSession, NewTemplate, ScheduleStore, ScheduleTx, StoreError,
};

#[derive(Debug, Clone, Default)]
pub struct MemoryData {
    pub centers: Vec<Uuid>,
    pub beds: Vec<Bed>,
    pub templates: Vec<SessionTemplate>,
    pub sessions: Vec<ScheduledSession>,
    pub assignments: Vec<SessionBedAssignment>,
    /// When set, inserting the n-th scheduled session (1-based, counted per
    /// transaction) fails with a database error.
    pub fail_session_insert_at: Option<usize>,
}

#[derive(Clone, Default)]
pub struct MemoryScheduleStore {
    inner: Arc<Mutex<MemoryData>>,
}

impl MemoryScheduleStore {
    pub async fn snapshot(&self) -> MemoryData {
        self.inner.lock().await.clone()
    }

    pub async fn with_data<R>(&self, f: impl FnOnce(&mut MemoryData) -> R) -> R {
        let mut data = self.inner.lock().await;
        f(&mut data)
    }
}

#[async_trait]
impl ScheduleStore for MemoryScheduleStore {
    async fn begin(&self) -> Result<Box<dyn ScheduleTx>, StoreError> {
        let guard = self.inner.clone().lock_owned().await;
        let work = guard.clone();
        Ok(Box::new(MemoryTx {
            guard,
            work,
            inserted_sessions: 0,
        }))
    }
}

pub struct MemoryTx {
    guard: OwnedMutexGuard<MemoryData>,
    work: MemoryData,
    inserted_sessions: usize,
}

#[async_trait]
impl ScheduleTx for MemoryTx {
    async fn center_exists(&mut self, center_id: Uuid) -> Result<bool, StoreError> {
        Ok(self.work.centers.contains(&center_id))
    }

    async fn lock_center(&mut self, center_id: Uuid) -> Result<bool, StoreError> {
        Ok(self.work.centers.contains(&center_id))
    }

    async fn active_beds(&mut self, center_id: Uuid) -> Result<Vec<Bed>, StoreError> {
        let mut beds: Vec<Bed> = self
            .work
            .beds
            .iter()
            .filter(|b| b.center_id == center_id && b.status == RecordStatus::Active)
            .cloned()
            .collect();
        beds.sort_by_key(|b| b.bed_id);
        Ok(beds)
    }

    async fn get_template(
        &mut self,
        session_id: Uuid,
    ) -> Result<Option<SessionTemplate>, StoreError> {
        Ok(self
            .work
            .templates
            .iter()
            .find(|t| t.session_id == session_id)
            .cloned())
    }

    async fn active_templates_on(
        &mut self,
        center_id: Uuid,
        weekday: Weekday,
    ) -> Result<Vec<SessionTemplate>, StoreError> {
        Ok(self
            .work
            .templates
            .iter()
            .filter(|t| {
                t.center_id == center_id
                    && t.weekday == weekday
                    && t.status == RecordStatus::Active
            })
            .cloned()
            .collect())
    }

    async fn active_templates(
        &mut self,
        center_id: Uuid,
        only: Option<&[Uuid]>,
    ) -> Result<Vec<SessionTemplate>, StoreError> {
        Ok(self
            .work
            .templates
            .iter()
            .filter(|t| t.center_id == center_id && t.status == RecordStatus::Active)
            .filter(|t| only.is_none_or(|ids| ids.contains(&t.session_id)))
            .cloned()
            .collect())
    }

    async fn insert_template(&mut self, new: &NewTemplate) -> Result<SessionTemplate, StoreError> {
        let t = SessionTemplate {
            session_id: Uuid::new_v4(),
            center_id: new.center_id,
            doctor_id: new.doctor_id,
            weekday: new.weekday,
            start_time: new.start_time,
            end_time: new.end_time,
            default_capacity: new.default_capacity,
            recurrence_pattern: new.recurrence_pattern,
            status: new.status,
        };
        self.work.templates.push(t.clone());
        Ok(t)
    }

    async fn update_template(
        &mut self,
        session_id: Uuid,
        patch: &TemplatePatch,
    ) -> Result<SessionTemplate, StoreError> {
        let t = self
            .work
            .templates
            .iter_mut()
            .find(|t| t.session_id == session_id)
            .ok_or(StoreError::Database(sqlx::Error::RowNotFound))?;
        patch.apply(t);
        Ok(t.clone())
    }

    async fn delete_template(&mut self, session_id: Uuid) -> Result<bool, StoreError> {
        let before = self.work.templates.len();
        self.work.templates.retain(|t| t.session_id != session_id);
        let removed = self.work.templates.len() < before;
        if removed {
            for s in &mut self.work.sessions {
                if s.session_template_id == Some(session_id) {
                    s.session_template_id = None;
                }
            }
        }
        Ok(removed)
    }

    async fn session_exists_for(
        &mut self,
        center_id: Uuid,
        session_template_id: Uuid,
        session_date: NaiveDate,
    ) -> Result<bool, StoreError> {
        Ok(self.work.sessions.iter().any(|s| {
            s.center_id == center_id
                && s.session_template_id == Some(session_template_id)
                && s.session_date == session_date
        }))
    }

    async fn lock_session(
        &mut self,
        schedule_session_id: Uuid,
    ) -> Result<Option<ScheduledSession>, StoreError> {
        Ok(self
            .work
            .sessions
            .iter()
            .find(|s| s.schedule_session_id == schedule_session_id)
            .cloned())
    }

    async fn insert_session(
        &mut self,
        new: &NewScheduledSession,
    ) -> Result<ScheduledSession, StoreError> {
        self.inserted_sessions += 1;
        if self.work.fail_session_insert_at == Some(self.inserted_sessions) {
            return Err(StoreError::Database(sqlx::Error::PoolClosed));
        }
        if let Some(template_id) = new.session_template_id {
            let taken = self.work.sessions.iter().any(|s| {
                s.center_id == new.center_id
                    && s.session_template_id == Some(template_id)
                    && s.session_date == new.session_date
            });
            if taken {
                return Err(StoreError::Duplicate("template and date".into()));
            }
        }
        let s = ScheduledSession {
            schedule_session_id: Uuid::new_v4(),
            center_id: new.center_id,
            session_template_id: new.session_template_id,
            session_date: new.session_date,
            start_time: new.start_time,
            end_time: new.end_time,
            available_beds: new.available_beds,
            notes: new.notes.clone(),
            status: new.status,
            created_by_user_id: new.created_by_user_id,
        };
        self.work.sessions.push(s.clone());
        Ok(s)
    }

    async fn update_session(
        &mut self,
        schedule_session_id: Uuid,
        patch: &SessionPatch,
    ) -> Result<ScheduledSession, StoreError> {
        let s = self
            .work
            .sessions
            .iter_mut()
            .find(|s| s.schedule_session_id == schedule_session_id)
            .ok_or(StoreError::Database(sqlx::Error::RowNotFound))?;
        patch.apply(s);
        Ok(s.clone())
    }

    async fn delete_session(&mut self, schedule_session_id: Uuid) -> Result<bool, StoreError> {
        let before = self.work.sessions.len();
        self.work
            .sessions
            .retain(|s| s.schedule_session_id != schedule_session_id);
        Ok(self.work.sessions.len() < before)
    }

    async fn assignments(
        &mut self,
        schedule_session_id: Uuid,
    ) -> Result<Vec<SessionBedAssignment>, StoreError> {
        let mut rows: Vec<SessionBedAssignment> = self
            .work
            .assignments
            .iter()
            .filter(|a| a.schedule_session_id == schedule_session_id)
            .cloned()
            .collect();
        rows.sort_by_key(|a| a.bed_id);
        Ok(rows)
    }

    async fn count_assignments(&mut self, schedule_session_id: Uuid) -> Result<i64, StoreError> {
        let n = self
            .work
            .assignments
            .iter()
            .filter(|a| a.schedule_session_id == schedule_session_id)
            .count();
        Ok(n as i64)
    }

    async fn insert_assignments(
        &mut self,
        schedule_session_id: Uuid,
        bed_ids: &[Uuid],
    ) -> Result<(), StoreError> {
        for &bed_id in bed_ids {
            let dup = self
                .work
                .assignments
                .iter()
                .any(|a| a.schedule_session_id == schedule_session_id && a.bed_id == bed_id);
            if dup {
                return Err(StoreError::Invariant(format!(
                    "bed {bed_id} already assigned to session {schedule_session_id}"
                )));
            }
            self.work.assignments.push(SessionBedAssignment {
                schedule_session_id,
                bed_id,
                status: AssignmentStatus::Available,
            });
        }
        Ok(())
    }

    async fn release_assignments(
        &mut self,
        schedule_session_id: Uuid,
        bed_ids: &[Uuid],
    ) -> Result<u64, StoreError> {
        let before = self.work.assignments.len();
        self.work.assignments.retain(|a| {
            !(a.schedule_session_id == schedule_session_id
                && bed_ids.contains(&a.bed_id)
                && a.status == AssignmentStatus::Available)
        });
        Ok((before - self.work.assignments.len()) as u64)
    }

    async fn clear_assignments(&mut self, schedule_session_id: Uuid) -> Result<u64, StoreError> {
        let before = self.work.assignments.len();
        self.work
            .assignments
            .retain(|a| a.schedule_session_id != schedule_session_id);
        Ok((before - self.work.assignments.len()) as u64)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryTx {
            mut guard, work, ..
        } = *self;
        *guard = work;
        Ok(())
    }
}
