//! PostgreSQL implementation of the schedule store.

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::models::{Bed, ScheduledSession, SessionBedAssignment, SessionTemplate, Weekday};
use crate::scheduling::patch::{SessionPatch, TemplatePatch};
use crate::scheduling::store::{
    NewScheduledSession, NewTemplate, ScheduleStore, ScheduleTx, StoreError,
};

const TEMPLATE_COLUMNS: &str = r#"
    session_id, center_id, doctor_id, weekday, start_time, end_time,
    default_capacity, recurrence_pattern, status
"#;

const SESSION_COLUMNS: &str = r#"
    schedule_session_id, center_id, session_template_id, session_date,
    start_time, end_time, available_beds, notes, status, created_by_user_id
"#;

#[derive(Clone)]
pub struct PgScheduleStore {
    pool: PgPool,
}

impl PgScheduleStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ScheduleStore for PgScheduleStore {
    async fn begin(&self) -> Result<Box<dyn ScheduleTx>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgScheduleTx { tx }))
    }
}

pub struct PgScheduleTx {
    tx: Transaction<'static, Postgres>,
}

fn map_write_err(e: sqlx::Error) -> StoreError {
    let unique = e
        .as_database_error()
        .map(|d| d.is_unique_violation())
        .unwrap_or(false);
    if unique {
        StoreError::Duplicate("template and date".into())
    } else {
        StoreError::Database(e)
    }
}

#[async_trait]
impl ScheduleTx for PgScheduleTx {
    async fn center_exists(&mut self, center_id: Uuid) -> Result<bool, StoreError> {
        let exists: bool =
            sqlx::query_scalar(r#"SELECT EXISTS (SELECT 1 FROM centers WHERE center_id = $1)"#)
                .bind(center_id)
                .fetch_one(&mut *self.tx)
                .await?;
        Ok(exists)
    }

    async fn lock_center(&mut self, center_id: Uuid) -> Result<bool, StoreError> {
        let row: Option<Uuid> =
            sqlx::query_scalar(r#"SELECT center_id FROM centers WHERE center_id = $1 FOR UPDATE"#)
                .bind(center_id)
                .fetch_optional(&mut *self.tx)
                .await?;
        Ok(row.is_some())
    }

    async fn active_beds(&mut self, center_id: Uuid) -> Result<Vec<Bed>, StoreError> {
        let beds = sqlx::query_as::<_, Bed>(
            r#"
            SELECT bed_id, center_id, label, status
            FROM beds
            WHERE center_id = $1
              AND status = 'active'
            ORDER BY bed_id ASC
            "#,
        )
        .bind(center_id)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(beds)
    }

    async fn get_template(
        &mut self,
        session_id: Uuid,
    ) -> Result<Option<SessionTemplate>, StoreError> {
        let sql = format!("SELECT {TEMPLATE_COLUMNS} FROM sessions WHERE session_id = $1");
        let row = sqlx::query_as::<_, SessionTemplate>(&sql)
            .bind(session_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row)
    }

    async fn active_templates_on(
        &mut self,
        center_id: Uuid,
        weekday: Weekday,
    ) -> Result<Vec<SessionTemplate>, StoreError> {
        let sql = format!(
            r#"
            SELECT {TEMPLATE_COLUMNS}
            FROM sessions
            WHERE center_id = $1
              AND weekday = $2
              AND status = 'active'
            ORDER BY start_time ASC
            "#
        );
        let rows = sqlx::query_as::<_, SessionTemplate>(&sql)
            .bind(center_id)
            .bind(weekday)
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(rows)
    }

    async fn active_templates(
        &mut self,
        center_id: Uuid,
        only: Option<&[Uuid]>,
    ) -> Result<Vec<SessionTemplate>, StoreError> {
        let sql = format!(
            r#"
            SELECT {TEMPLATE_COLUMNS}
            FROM sessions
            WHERE center_id = $1
              AND status = 'active'
              AND ($2::uuid[] IS NULL OR session_id = ANY($2))
            ORDER BY weekday ASC, start_time ASC, session_id ASC
            "#
        );
        let rows = sqlx::query_as::<_, SessionTemplate>(&sql)
            .bind(center_id)
            .bind(only.map(|ids| ids.to_vec()))
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(rows)
    }

    async fn insert_template(&mut self, new: &NewTemplate) -> Result<SessionTemplate, StoreError> {
        let sql = format!(
            r#"
            INSERT INTO sessions (
              center_id, doctor_id, weekday, start_time, end_time,
              default_capacity, recurrence_pattern, status
            )
            VALUES ($1,$2,$3,$4,$5,$6,$7,$8)
            RETURNING {TEMPLATE_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, SessionTemplate>(&sql)
            .bind(new.center_id)
            .bind(new.doctor_id)
            .bind(new.weekday)
            .bind(new.start_time)
            .bind(new.end_time)
            .bind(new.default_capacity)
            .bind(new.recurrence_pattern)
            .bind(new.status)
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(row)
    }

    async fn update_template(
        &mut self,
        session_id: Uuid,
        patch: &TemplatePatch,
    ) -> Result<SessionTemplate, StoreError> {
        let (doctor_set, doctor_id) = patch.doctor_id.nullable_parts();
        let sql = format!(
            r#"
            UPDATE sessions
            SET
              doctor_id          = CASE WHEN $2 THEN $3 ELSE doctor_id END,
              weekday            = COALESCE($4, weekday),
              start_time         = COALESCE($5, start_time),
              end_time           = COALESCE($6, end_time),
              default_capacity   = COALESCE($7, default_capacity),
              recurrence_pattern = COALESCE($8, recurrence_pattern),
              status             = COALESCE($9, status),
              updated_at = now()
            WHERE session_id = $1
            RETURNING {TEMPLATE_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, SessionTemplate>(&sql)
            .bind(session_id)
            .bind(doctor_set)
            .bind(doctor_id)
            .bind(patch.weekday.as_set().copied())
            .bind(patch.start_time.as_set().copied())
            .bind(patch.end_time.as_set().copied())
            .bind(patch.default_capacity.as_set().copied())
            .bind(patch.recurrence_pattern.as_set().copied())
            .bind(patch.status.as_set().copied())
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(row)
    }

    async fn delete_template(&mut self, session_id: Uuid) -> Result<bool, StoreError> {
        let res = sqlx::query(r#"DELETE FROM sessions WHERE session_id = $1"#)
            .bind(session_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn session_exists_for(
        &mut self,
        center_id: Uuid,
        session_template_id: Uuid,
        session_date: NaiveDate,
    ) -> Result<bool, StoreError> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
              SELECT 1
              FROM schedule_sessions
              WHERE center_id = $1
                AND session_template_id = $2
                AND session_date = $3
            )
            "#,
        )
        .bind(center_id)
        .bind(session_template_id)
        .bind(session_date)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(exists)
    }

    async fn lock_session(
        &mut self,
        schedule_session_id: Uuid,
    ) -> Result<Option<ScheduledSession>, StoreError> {
        let sql = format!(
            r#"
            SELECT {SESSION_COLUMNS}
            FROM schedule_sessions
            WHERE schedule_session_id = $1
            FOR UPDATE
            "#
        );
        let row = sqlx::query_as::<_, ScheduledSession>(&sql)
            .bind(schedule_session_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row)
    }

    async fn insert_session(
        &mut self,
        new: &NewScheduledSession,
    ) -> Result<ScheduledSession, StoreError> {
        let sql = format!(
            r#"
            INSERT INTO schedule_sessions (
              center_id, session_template_id, session_date, start_time, end_time,
              available_beds, notes, status, created_by_user_id
            )
            VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9)
            RETURNING {SESSION_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, ScheduledSession>(&sql)
            .bind(new.center_id)
            .bind(new.session_template_id)
            .bind(new.session_date)
            .bind(new.start_time)
            .bind(new.end_time)
            .bind(new.available_beds)
            .bind(new.notes.as_deref())
            .bind(new.status)
            .bind(new.created_by_user_id)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(map_write_err)?;
        Ok(row)
    }

    async fn update_session(
        &mut self,
        schedule_session_id: Uuid,
        patch: &SessionPatch,
    ) -> Result<ScheduledSession, StoreError> {
        let (template_set, template_id) = patch.session_template_id.nullable_parts();
        let (notes_set, notes) = patch.notes.nullable_parts();
        let sql = format!(
            r#"
            UPDATE schedule_sessions
            SET
              session_template_id = CASE WHEN $2 THEN $3 ELSE session_template_id END,
              session_date   = COALESCE($4, session_date),
              start_time     = COALESCE($5, start_time),
              end_time       = COALESCE($6, end_time),
              available_beds = COALESCE($7, available_beds),
              notes          = CASE WHEN $8 THEN $9 ELSE notes END,
              status         = COALESCE($10, status),
              updated_at = now()
            WHERE schedule_session_id = $1
            RETURNING {SESSION_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, ScheduledSession>(&sql)
            .bind(schedule_session_id)
            .bind(template_set)
            .bind(template_id)
            .bind(patch.session_date.as_set().copied())
            .bind(patch.start_time.as_set().copied())
            .bind(patch.end_time.as_set().copied())
            .bind(patch.available_beds.as_set().copied())
            .bind(notes_set)
            .bind(notes)
            .bind(patch.status.as_set().copied())
            .fetch_one(&mut *self.tx)
            .await
            .map_err(map_write_err)?;
        Ok(row)
    }

    async fn delete_session(&mut self, schedule_session_id: Uuid) -> Result<bool, StoreError> {
        let res = sqlx::query(r#"DELETE FROM schedule_sessions WHERE schedule_session_id = $1"#)
            .bind(schedule_session_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn assignments(
        &mut self,
        schedule_session_id: Uuid,
    ) -> Result<Vec<SessionBedAssignment>, StoreError> {
        let rows = sqlx::query_as::<_, SessionBedAssignment>(
            r#"
            SELECT schedule_session_id, bed_id, status
            FROM session_beds
            WHERE schedule_session_id = $1
            ORDER BY bed_id ASC
            "#,
        )
        .bind(schedule_session_id)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(rows)
    }

    async fn count_assignments(&mut self, schedule_session_id: Uuid) -> Result<i64, StoreError> {
        let n: i64 = sqlx::query_scalar(
            r#"SELECT COUNT(*) FROM session_beds WHERE schedule_session_id = $1"#,
        )
        .bind(schedule_session_id)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(n)
    }

    async fn insert_assignments(
        &mut self,
        schedule_session_id: Uuid,
        bed_ids: &[Uuid],
    ) -> Result<(), StoreError> {
        if bed_ids.is_empty() {
            return Ok(());
        }
        sqlx::query(
            r#"
            INSERT INTO session_beds (schedule_session_id, bed_id, status)
            SELECT $1, b.bed_id, 'available'
            FROM UNNEST($2::uuid[]) AS b(bed_id)
            "#,
        )
        .bind(schedule_session_id)
        .bind(bed_ids)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn release_assignments(
        &mut self,
        schedule_session_id: Uuid,
        bed_ids: &[Uuid],
    ) -> Result<u64, StoreError> {
        let res = sqlx::query(
            r#"
            DELETE FROM session_beds
            WHERE schedule_session_id = $1
              AND bed_id = ANY($2)
              AND status = 'available'
            "#,
        )
        .bind(schedule_session_id)
        .bind(bed_ids)
        .execute(&mut *self.tx)
        .await?;
        Ok(res.rows_affected())
    }

    async fn clear_assignments(&mut self, schedule_session_id: Uuid) -> Result<u64, StoreError> {
        let res = sqlx::query(r#"DELETE FROM session_beds WHERE schedule_session_id = $1"#)
            .bind(schedule_session_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(res.rows_affected())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }
}
