//! Scheduled-session and bed-allocation core.
//!
//! Every operation here opens exactly one [`ScheduleTx`], performs its reads
//! and writes through it and commits only when everything succeeded. Dropping
//! the transaction on an error path rolls it back.

pub mod generator;
pub mod overlap;
pub mod patch;
pub mod pg;
pub mod reconciler;
pub mod sessions;
pub mod store;
pub mod templates;

#[cfg(test)]
pub mod memory;
#[cfg(test)]
mod pg_tests;

use thiserror::Error;
use uuid::Uuid;

pub use store::{ScheduleStore, ScheduleTx, StoreError};

#[derive(Debug, Error)]
pub enum ScheduleError {
    /// Malformed or inconsistent input. The first field is a stable code.
    #[error("{1}")]
    Validation(&'static str, String),

    #[error("{0} not found")]
    NotFound(&'static str),

    /// Business rule violated by current state.
    #[error("{1}")]
    Conflict(&'static str, String),

    #[error("storage error: {0}")]
    Storage(StoreError),
}

impl ScheduleError {
    pub fn validation(message: impl Into<String>) -> Self {
        ScheduleError::Validation("VALIDATION_ERROR", message.into())
    }
}

impl From<StoreError> for ScheduleError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Duplicate(what) => ScheduleError::Conflict(
                "SESSION_EXISTS",
                format!("a scheduled session already exists for this {what}"),
            ),
            other => ScheduleError::Storage(other),
        }
    }
}

pub type Result<T, E = ScheduleError> = std::result::Result<T, E>;

/// Who is performing a mutation. Threaded from the authenticated caller.
#[derive(Debug, Clone, Copy)]
pub struct Actor {
    pub user_id: Uuid,
}

/// Compares the stored assignment count for a session with its
/// `available_beds` value. A mismatch means some path wrote assignments
/// without going through the reconciler.
pub(crate) async fn verify_capacity(
    tx: &mut dyn ScheduleTx,
    schedule_session_id: Uuid,
    available_beds: i32,
) -> Result<()> {
    let count = tx.count_assignments(schedule_session_id).await?;
    if count != i64::from(available_beds) {
        tracing::error!(
            %schedule_session_id,
            available_beds,
            assignments = count,
            "assignment count does not match available_beds"
        );
        return Err(ScheduleError::Storage(StoreError::Invariant(format!(
            "session {schedule_session_id} has {count} bed assignments \
             but available_beds = {available_beds}"
        ))));
    }
    Ok(())
}
