//! The occurrence data model.
//!
//! An occurrence is any schedulable time-blocked record: a standalone
//! event, an instance generated from a recurring series, or the series
//! master itself. Masters are never schedulable: they hold the
//! recurrence rule and are excluded from conflict checks, availability
//! and the external grid.

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{GridCalError, GridCalResult};

/// Event category, used for grid color-coding and filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Category {
    Class,
    Work,
    Personal,
    Sport,
    Study,
    Meeting,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Class => "class",
            Category::Work => "work",
            Category::Personal => "personal",
            Category::Sport => "sport",
            Category::Study => "study",
            Category::Meeting => "meeting",
        }
    }

    pub fn parse(s: &str) -> GridCalResult<Self> {
        match s {
            "class" => Ok(Category::Class),
            "work" => Ok(Category::Work),
            "personal" => Ok(Category::Personal),
            "sport" => Ok(Category::Sport),
            "study" => Ok(Category::Study),
            "meeting" => Ok(Category::Meeting),
            other => Err(GridCalError::Validation(format!(
                "Unknown category '{other}'. Use: class, work, personal, sport, study, meeting"
            ))),
        }
    }
}

impl Default for Category {
    fn default() -> Self {
        Category::Personal
    }
}

/// How an occurrence repeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecurrenceKind {
    None,
    Daily,
    Weekly,
    Monthly,
}

impl RecurrenceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RecurrenceKind::None => "none",
            RecurrenceKind::Daily => "daily",
            RecurrenceKind::Weekly => "weekly",
            RecurrenceKind::Monthly => "monthly",
        }
    }

    pub fn parse(s: &str) -> GridCalResult<Self> {
        match s {
            "none" => Ok(RecurrenceKind::None),
            "daily" => Ok(RecurrenceKind::Daily),
            "weekly" => Ok(RecurrenceKind::Weekly),
            "monthly" => Ok(RecurrenceKind::Monthly),
            other => Err(GridCalError::Validation(format!(
                "Unknown recurrence '{other}'. Use: none, daily, weekly, monthly"
            ))),
        }
    }
}

/// A single bookable time block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Occurrence {
    /// Opaque unique id, stable for the occurrence's lifetime.
    pub id: String,
    pub title: String,
    pub notes: Option<String>,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub category: Category,
    /// Unordered set of free-form tags.
    pub tags: BTreeSet<String>,
    pub recurrence: RecurrenceKind,
    /// True only for the synthetic root of a recurring series.
    pub is_master: bool,
    /// Owning master for series instances; None for standalone
    /// occurrences and for masters themselves.
    pub master_id: Option<String>,
    /// Set once an instance is edited independently of its series;
    /// series-wide edits then skip it.
    pub manually_modified: bool,
    pub alarm_lead_minutes: u32,
    pub alarm_enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Occurrence {
    pub fn duration_minutes(&self) -> i64 {
        (self.end_time - self.start_time).num_minutes()
    }

    /// The positional/display projection of this occurrence, for
    /// surface operations that outlive the store record.
    pub fn slot_ref(&self) -> SlotRef {
        SlotRef {
            date: self.date,
            start: self.start_time,
            end: self.end_time,
            title: self.title.clone(),
        }
    }

    /// Enforce the same-day `start < end` invariant.
    pub fn validate_times(&self) -> GridCalResult<()> {
        validate_interval(self.start_time, self.end_time)
    }
}

pub fn validate_interval(start: NaiveTime, end: NaiveTime) -> GridCalResult<()> {
    if start >= end {
        return Err(GridCalError::Validation(format!(
            "End time {} must be after start time {}",
            end.format("%H:%M"),
            start.format("%H:%M")
        )));
    }
    Ok(())
}

/// Immutable positional value for surface removal: what the grid needs
/// to locate and clear a block, nothing more.
#[derive(Debug, Clone, PartialEq)]
pub struct SlotRef {
    pub date: NaiveDate,
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub title: String,
}

/// A partial update to an occurrence. Unset fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct OccurrencePatch {
    pub title: Option<String>,
    pub notes: Option<Option<String>>,
    pub date: Option<NaiveDate>,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub category: Option<Category>,
    pub tags: Option<BTreeSet<String>>,
    pub alarm_lead_minutes: Option<u32>,
    pub alarm_enabled: Option<bool>,
}

impl OccurrencePatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.notes.is_none()
            && self.date.is_none()
            && self.start_time.is_none()
            && self.end_time.is_none()
            && self.category.is_none()
            && self.tags.is_none()
            && self.alarm_lead_minutes.is_none()
            && self.alarm_enabled.is_none()
    }

    /// Apply to an occurrence, re-validating the time interval.
    pub fn apply(&self, occurrence: &mut Occurrence) -> GridCalResult<()> {
        if let Some(ref title) = self.title {
            occurrence.title = title.clone();
        }
        if let Some(ref notes) = self.notes {
            occurrence.notes = notes.clone();
        }
        if let Some(date) = self.date {
            occurrence.date = date;
        }
        if let Some(start) = self.start_time {
            occurrence.start_time = start;
        }
        if let Some(end) = self.end_time {
            occurrence.end_time = end;
        }
        if let Some(category) = self.category {
            occurrence.category = category;
        }
        if let Some(ref tags) = self.tags {
            occurrence.tags = tags.clone();
        }
        if let Some(lead) = self.alarm_lead_minutes {
            occurrence.alarm_lead_minutes = lead;
        }
        if let Some(enabled) = self.alarm_enabled {
            occurrence.alarm_enabled = enabled;
        }
        occurrence.validate_times()?;
        occurrence.updated_at = Utc::now();
        Ok(())
    }
}

/// Series membership report for a single occurrence id.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesInfo {
    pub is_series: bool,
    pub is_master: bool,
    pub master_id: Option<String>,
    pub total_instances: usize,
    pub future_instances: usize,
    pub manually_modified: bool,
    pub recurrence: RecurrenceKind,
}

impl SeriesInfo {
    /// The shape reported for a standalone, non-recurring occurrence.
    pub fn standalone() -> Self {
        SeriesInfo {
            is_series: false,
            is_master: false,
            master_id: None,
            total_instances: 0,
            future_instances: 0,
            manually_modified: false,
            recurrence: RecurrenceKind::None,
        }
    }
}
