//! Conflict detection and alternative-slot suggestion.
//!
//! Conflicts are a user-facing warning, not a hard constraint: the
//! engine reports them and offers alternatives, but never resolves
//! them on its own. The caller picks cancel, override, or one of the
//! suggestions.

use chrono::{NaiveDate, NaiveTime};

use crate::availability::free_blocks_between;
use crate::error::GridCalResult;
use crate::occurrence::{Occurrence, validate_interval};
use crate::store::SharedStore;

/// At most this many alternative slots are suggested.
pub const MAX_SUGGESTIONS: usize = 5;

/// Strict interval overlap: `[s1, e1)` and `[s2, e2)` overlap iff
/// `s1 < e2 && e1 > s2`. Back-to-back intervals (`e1 == s2`) do NOT
/// overlap.
pub fn overlaps(s1: NaiveTime, e1: NaiveTime, s2: NaiveTime, e2: NaiveTime) -> bool {
    s1 < e2 && e1 > s2
}

/// A suggested alternative slot with a human-readable rationale.
#[derive(Debug, Clone, PartialEq)]
pub struct Suggestion {
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub rationale: String,
}

/// The caller's decision when conflicts exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Drop the request entirely.
    Cancel,
    /// Proceed with the originally requested interval despite overlap.
    Override,
    /// Substitute the n-th suggested interval.
    UseSuggestion(usize),
}

pub struct ConflictResolver {
    store: SharedStore,
}

impl ConflictResolver {
    pub fn new(store: SharedStore) -> Self {
        ConflictResolver { store }
    }

    /// All non-master occurrences on `date` whose interval strictly
    /// overlaps `[start, end)`. `exclude` skips the occurrence being
    /// edited.
    pub fn detect_conflicts(
        &self,
        date: NaiveDate,
        start: NaiveTime,
        end: NaiveTime,
        exclude: Option<&str>,
    ) -> GridCalResult<Vec<Occurrence>> {
        validate_interval(start, end)?;
        let day = {
            let store = self.store.lock().expect("store lock poisoned");
            store.schedulable_on(date)?
        };
        Ok(day
            .into_iter()
            .filter(|o| exclude != Some(o.id.as_str()))
            .filter(|o| overlaps(start, end, o.start_time, o.end_time))
            .collect())
    }

    /// Up to [`MAX_SUGGESTIONS`] free slots of at least
    /// `duration_minutes` on `date`, each annotated with why it fits.
    pub fn suggest_alternatives(
        &self,
        date: NaiveDate,
        duration_minutes: u32,
        day_start: NaiveTime,
        day_end: NaiveTime,
    ) -> GridCalResult<Vec<Suggestion>> {
        let day = {
            let store = self.store.lock().expect("store lock poisoned");
            store.schedulable_on(date)?
        };
        let blocks = free_blocks_between(&day, duration_minutes, day_start, day_end);

        Ok(blocks
            .into_iter()
            .take(MAX_SUGGESTIONS)
            .map(|block| {
                let rationale = if block.minutes == duration_minutes {
                    "fits exactly".to_string()
                } else if block.minutes > duration_minutes * 2 {
                    format!("ample block ({}min)", block.minutes)
                } else {
                    format!("available ({}min)", block.minutes)
                };
                Suggestion {
                    start: block.start,
                    end: block.start + chrono::Duration::minutes(duration_minutes as i64),
                    rationale,
                }
            })
            .collect())
    }
}
