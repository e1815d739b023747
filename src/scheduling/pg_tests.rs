//! The scheduling operations run against the Postgres store.
//!
//! These need a scratch database: set `DATABASE_URL` and run
//! `cargo test -- --ignored`. Every test seeds its own center, so they can
//! share one database and run in parallel.

use chrono::{NaiveDate, NaiveTime};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

use crate::models::{SessionStatus, Weekday};
use crate::scheduling::{
    Actor, ScheduleError, ScheduleStore, ScheduleTx, StoreError,
    generator::{GenerateRequest, generate_sessions},
    patch::{Patch, SessionPatch},
    pg::PgScheduleStore,
    sessions::{
        CreateScheduledSession, create_scheduled_session, delete_scheduled_session,
        update_scheduled_session,
    },
    store::NewScheduledSession,
    templates::{CreateTemplate, create_template},
};

const MAX_DAYS: i64 = 366;

fn t(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

struct Fixture {
    pool: PgPool,
    store: PgScheduleStore,
    center: Uuid,
    /// Active beds of the center, ascending.
    beds: Vec<Uuid>,
    actor: Actor,
}

async fn connect() -> PgPool {
    let _ = dotenvy::dotenv();
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must name a scratch database");
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await
        .unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    pool
}

async fn fixture(bed_count: usize) -> Fixture {
    let pool = connect().await;

    let center: Uuid =
        sqlx::query_scalar(r#"INSERT INTO centers (name) VALUES ($1) RETURNING center_id"#)
            .bind("North wing")
            .fetch_one(&pool)
            .await
            .unwrap();

    let user_id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO app_user (username, display_name, password_hash, role)
        VALUES ($1, 'Staff', 'unused', 2)
        RETURNING user_id
        "#,
    )
    .bind(format!("staff-{}", Uuid::new_v4()))
    .fetch_one(&pool)
    .await
    .unwrap();

    let mut beds = Vec::with_capacity(bed_count);
    for i in 1..=bed_count {
        let bed_id: Uuid = sqlx::query_scalar(
            r#"INSERT INTO beds (center_id, label) VALUES ($1, $2) RETURNING bed_id"#,
        )
        .bind(center)
        .bind(format!("Bed {i}"))
        .fetch_one(&pool)
        .await
        .unwrap();
        beds.push(bed_id);
    }
    sqlx::query(
        r#"
        INSERT INTO beds (center_id, label, status)
        VALUES ($1, 'Retired', 'inactive')
        "#,
    )
    .bind(center)
    .execute(&pool)
    .await
    .unwrap();
    beds.sort();

    Fixture {
        store: PgScheduleStore::new(pool.clone()),
        pool,
        center,
        beds,
        actor: Actor { user_id },
    }
}

impl Fixture {
    fn template(&self, weekday: Weekday, start: NaiveTime, end: NaiveTime) -> CreateTemplate {
        CreateTemplate {
            center_id: self.center,
            doctor_id: None,
            weekday,
            start_time: start,
            end_time: end,
            default_capacity: 5,
            recurrence_pattern: Default::default(),
        }
    }

    fn adhoc(&self, beds: i32) -> CreateScheduledSession {
        CreateScheduledSession {
            center_id: self.center,
            session_template_id: None,
            session_date: d(2024, 5, 2),
            start_time: t(14, 0),
            end_time: t(18, 0),
            available_beds: beds,
            notes: Some("extra evening shift".into()),
        }
    }

    async fn generate(&self, start: NaiveDate, end: NaiveDate) -> Vec<Uuid> {
        let req = GenerateRequest {
            center_id: self.center,
            start_date: start,
            end_date: end,
            template_ids: None,
        };
        generate_sessions(&self.store, self.actor, req, MAX_DAYS)
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.schedule_session_id)
            .collect()
    }

    async fn assigned(&self, session: Uuid) -> Vec<Uuid> {
        sqlx::query_scalar(
            r#"SELECT bed_id FROM session_beds WHERE schedule_session_id = $1 ORDER BY bed_id"#,
        )
        .bind(session)
        .fetch_all(&self.pool)
        .await
        .unwrap()
    }

    async fn stored_session(&self, session: Uuid) -> (i32, Option<String>) {
        sqlx::query_as(
            r#"
            SELECT available_beds, notes
            FROM schedule_sessions
            WHERE schedule_session_id = $1
            "#,
        )
        .bind(session)
        .fetch_one(&self.pool)
        .await
        .unwrap()
    }
}

#[tokio::test]
#[ignore = "needs DATABASE_URL for a scratch Postgres database"]
async fn january_mondays_on_postgres() {
    let fx = fixture(5).await;
    create_template(&fx.store, fx.template(Weekday::Mon, t(9, 0), t(11, 0)))
        .await
        .unwrap();

    let created = fx.generate(d(2024, 1, 1), d(2024, 1, 31)).await;
    assert_eq!(created.len(), 5);
    for id in &created {
        assert_eq!(fx.assigned(*id).await, fx.beds);
    }
    assert!(fx.generate(d(2024, 1, 1), d(2024, 1, 31)).await.is_empty());

    let first = created[0];
    let shrunk = update_scheduled_session(
        &fx.store,
        first,
        SessionPatch {
            available_beds: Patch::Set(3),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(shrunk.available_beds, 3);
    assert_eq!(fx.assigned(first).await, fx.beds[..3].to_vec());

    let err = update_scheduled_session(
        &fx.store,
        first,
        SessionPatch {
            available_beds: Patch::Set(7),
            ..Default::default()
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ScheduleError::Validation("INSUFFICIENT_BEDS", _)));
    assert_eq!(fx.assigned(first).await.len(), 3);

    delete_scheduled_session(&fx.store, first).await.unwrap();
    assert!(fx.assigned(first).await.is_empty());
    assert!(matches!(
        delete_scheduled_session(&fx.store, first).await.unwrap_err(),
        ScheduleError::NotFound(_)
    ));
}

#[tokio::test]
#[ignore = "needs DATABASE_URL for a scratch Postgres database"]
async fn null_clears_notes_and_absent_keeps_them() {
    let fx = fixture(3).await;
    let s = create_scheduled_session(&fx.store, fx.actor, fx.adhoc(2))
        .await
        .unwrap();
    let id = s.schedule_session_id;

    let kept = update_scheduled_session(
        &fx.store,
        id,
        SessionPatch {
            status: Patch::Set(SessionStatus::InProgress),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(kept.status, SessionStatus::InProgress);
    assert_eq!(kept.notes.as_deref(), Some("extra evening shift"));

    let patch: SessionPatch = serde_json::from_str(r#"{"notes": null}"#).unwrap();
    let cleared = update_scheduled_session(&fx.store, id, patch).await.unwrap();
    assert_eq!(cleared.notes, None);
    assert_eq!(fx.stored_session(id).await, (2, None));
}

#[tokio::test]
#[ignore = "needs DATABASE_URL for a scratch Postgres database"]
async fn shrink_over_occupied_bed_is_refused_on_postgres() {
    let fx = fixture(5).await;
    let s = create_scheduled_session(&fx.store, fx.actor, fx.adhoc(5))
        .await
        .unwrap();
    let id = s.schedule_session_id;
    sqlx::query(
        r#"
        UPDATE session_beds
        SET status = 'occupied'
        WHERE schedule_session_id = $1 AND bed_id = $2
        "#,
    )
    .bind(id)
    .bind(fx.beds[4])
    .execute(&fx.pool)
    .await
    .unwrap();

    let err = update_scheduled_session(
        &fx.store,
        id,
        SessionPatch {
            available_beds: Patch::Set(3),
            notes: Patch::Set(None),
            ..Default::default()
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ScheduleError::Conflict("BEDS_ASSIGNED", _)));
    assert_eq!(fx.assigned(id).await, fx.beds);
    assert_eq!(
        fx.stored_session(id).await,
        (5, Some("extra evening shift".into()))
    );
}

#[tokio::test]
#[ignore = "needs DATABASE_URL for a scratch Postgres database"]
async fn template_date_uniqueness_on_postgres() {
    let fx = fixture(5).await;
    let tpl = create_template(&fx.store, fx.template(Weekday::Mon, t(9, 0), t(11, 0)))
        .await
        .unwrap();
    let created = fx.generate(d(2024, 1, 1), d(2024, 1, 14)).await;
    assert_eq!(created.len(), 2);

    let err = update_scheduled_session(
        &fx.store,
        created[1],
        SessionPatch {
            session_date: Patch::Set(d(2024, 1, 1)),
            ..Default::default()
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ScheduleError::Conflict("SESSION_EXISTS", _)));

    // Bypassing the pre-check, the partial unique index still refuses it.
    let mut tx = fx.store.begin().await.unwrap();
    let err = tx
        .insert_session(&NewScheduledSession {
            center_id: fx.center,
            session_template_id: Some(tpl.session_id),
            session_date: d(2024, 1, 8),
            start_time: t(9, 0),
            end_time: t(11, 0),
            available_beds: 5,
            notes: None,
            status: SessionStatus::Scheduled,
            created_by_user_id: fx.actor.user_id,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Duplicate(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[ignore = "needs DATABASE_URL for a scratch Postgres database"]
async fn concurrent_overlapping_templates_admit_one_on_postgres() {
    for _ in 0..10 {
        let fx = fixture(1).await;
        let (a, b) = tokio::join!(
            create_template(&fx.store, fx.template(Weekday::Mon, t(9, 0), t(11, 0))),
            create_template(&fx.store, fx.template(Weekday::Mon, t(10, 0), t(12, 0))),
        );
        let ok = [a.is_ok(), b.is_ok()].iter().filter(|x| **x).count();
        assert_eq!(ok, 1, "exactly one overlapping template may be created");

        let active: i64 = sqlx::query_scalar(
            r#"SELECT COUNT(*) FROM sessions WHERE center_id = $1 AND status = 'active'"#,
        )
        .bind(fx.center)
        .fetch_one(&fx.pool)
        .await
        .unwrap();
        assert_eq!(active, 1);
    }
}

#[tokio::test]
#[ignore = "needs DATABASE_URL for a scratch Postgres database"]
async fn drifted_assignment_count_rolls_back_on_postgres() {
    let fx = fixture(5).await;
    let s = create_scheduled_session(&fx.store, fx.actor, fx.adhoc(5))
        .await
        .unwrap();
    let id = s.schedule_session_id;
    sqlx::query(r#"DELETE FROM session_beds WHERE schedule_session_id = $1 AND bed_id = $2"#)
        .bind(id)
        .bind(fx.beds[4])
        .execute(&fx.pool)
        .await
        .unwrap();

    let err = update_scheduled_session(
        &fx.store,
        id,
        SessionPatch {
            notes: Patch::Set(Some("late start".into())),
            ..Default::default()
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ScheduleError::Storage(StoreError::Invariant(_))));
    assert_eq!(
        fx.stored_session(id).await,
        (5, Some("extra evening shift".into()))
    );
}
