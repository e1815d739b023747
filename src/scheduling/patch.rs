//! Partial-update value objects.
//!
//! A field is either left alone (`Unset`) or replaced (`Set`). Nullable
//! columns use `Patch<Option<T>>`, so a JSON `null` becomes `Set(None)` and
//! clears the column while an absent key leaves it untouched.

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Deserializer};
use uuid::Uuid;

use crate::models::{
    RecordStatus, RecurrencePattern, ScheduledSession, SessionStatus, SessionTemplate, Weekday,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Patch<T> {
    Unset,
    Set(T),
}

impl<T> Default for Patch<T> {
    fn default() -> Self {
        Patch::Unset
    }
}

impl<T> Patch<T> {
    pub fn is_set(&self) -> bool {
        matches!(self, Patch::Set(_))
    }

    pub fn as_set(&self) -> Option<&T> {
        match self {
            Patch::Set(v) => Some(v),
            Patch::Unset => None,
        }
    }

    /// Overwrite `target` if set.
    pub fn apply_to(&self, target: &mut T)
    where
        T: Clone,
    {
        if let Patch::Set(v) = self {
            *target = v.clone();
        }
    }
}

impl<T: Clone> Patch<Option<T>> {
    /// Bind helper for nullable columns: `(is_set, new_value)`.
    pub fn nullable_parts(&self) -> (bool, Option<T>) {
        match self {
            Patch::Set(v) => (true, v.clone()),
            Patch::Unset => (false, None),
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Patch<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        T::deserialize(deserializer).map(Patch::Set)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionPatch {
    #[serde(default)]
    pub session_template_id: Patch<Option<Uuid>>,
    #[serde(default)]
    pub session_date: Patch<NaiveDate>,
    #[serde(default)]
    pub start_time: Patch<NaiveTime>,
    #[serde(default)]
    pub end_time: Patch<NaiveTime>,
    #[serde(default)]
    pub available_beds: Patch<i32>,
    #[serde(default)]
    pub notes: Patch<Option<String>>,
    #[serde(default)]
    pub status: Patch<SessionStatus>,
}

impl SessionPatch {
    pub fn is_empty(&self) -> bool {
        !(self.session_template_id.is_set()
            || self.session_date.is_set()
            || self.start_time.is_set()
            || self.end_time.is_set()
            || self.available_beds.is_set()
            || self.notes.is_set()
            || self.status.is_set())
    }

    pub fn apply(&self, s: &mut ScheduledSession) {
        self.session_template_id.apply_to(&mut s.session_template_id);
        self.session_date.apply_to(&mut s.session_date);
        self.start_time.apply_to(&mut s.start_time);
        self.end_time.apply_to(&mut s.end_time);
        self.available_beds.apply_to(&mut s.available_beds);
        self.notes.apply_to(&mut s.notes);
        self.status.apply_to(&mut s.status);
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TemplatePatch {
    #[serde(default)]
    pub doctor_id: Patch<Option<Uuid>>,
    #[serde(default)]
    pub weekday: Patch<Weekday>,
    #[serde(default)]
    pub start_time: Patch<NaiveTime>,
    #[serde(default)]
    pub end_time: Patch<NaiveTime>,
    #[serde(default)]
    pub default_capacity: Patch<i32>,
    #[serde(default)]
    pub recurrence_pattern: Patch<RecurrencePattern>,
    #[serde(default)]
    pub status: Patch<RecordStatus>,
}

impl TemplatePatch {
    pub fn is_empty(&self) -> bool {
        !(self.doctor_id.is_set()
            || self.weekday.is_set()
            || self.start_time.is_set()
            || self.end_time.is_set()
            || self.default_capacity.is_set()
            || self.recurrence_pattern.is_set()
            || self.status.is_set())
    }

    pub fn apply(&self, t: &mut SessionTemplate) {
        self.doctor_id.apply_to(&mut t.doctor_id);
        self.weekday.apply_to(&mut t.weekday);
        self.start_time.apply_to(&mut t.start_time);
        self.end_time.apply_to(&mut t.end_time);
        self.default_capacity.apply_to(&mut t.default_capacity);
        self.recurrence_pattern.apply_to(&mut t.recurrence_pattern);
        self.status.apply_to(&mut t.status);
    }
}
