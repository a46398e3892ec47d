//! Free-time computation.
//!
//! A single linear scan over the day's occurrences: sort by start,
//! walk accumulating gaps between the cursor and each start, emit the
//! trailing gap up to the day's end bound.

use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime};

use crate::error::GridCalResult;
use crate::occurrence::Occurrence;
use crate::store::SharedStore;

/// Minimum block length used by the dashboard summary.
pub const SUMMARY_MIN_MINUTES: u32 = 30;

/// Default day bounds considered for availability (07:00–22:00).
pub fn default_day_bounds() -> (NaiveTime, NaiveTime) {
    (
        NaiveTime::from_hms_opt(7, 0, 0).expect("valid constant time"),
        NaiveTime::from_hms_opt(22, 0, 0).expect("valid constant time"),
    )
}

/// A gap between occupied blocks.
#[derive(Debug, Clone, PartialEq)]
pub struct FreeBlock {
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub minutes: u32,
}

/// Aggregate availability view for dashboards.
#[derive(Debug, Clone, PartialEq)]
pub struct DailySummary {
    pub free_minutes: u32,
    pub largest_block_minutes: u32,
    pub block_count: usize,
    pub largest_block: Option<(NaiveTime, NaiveTime)>,
}

fn minutes_between(from: NaiveTime, to: NaiveTime) -> u32 {
    (to - from).num_minutes().max(0) as u32
}

/// Free blocks of at least `min_minutes` between `day_start` and
/// `day_end`, given the day's occurrences. Masters carry no occupancy
/// and are ignored.
pub fn free_blocks_between(
    occurrences: &[Occurrence],
    min_minutes: u32,
    day_start: NaiveTime,
    day_end: NaiveTime,
) -> Vec<FreeBlock> {
    let mut occupied: Vec<&Occurrence> = occurrences.iter().filter(|o| !o.is_master).collect();
    occupied.sort_by_key(|o| o.start_time);

    let mut blocks = Vec::new();
    let mut cursor = day_start;

    for occurrence in occupied {
        if cursor < occurrence.start_time {
            let gap = minutes_between(cursor, occurrence.start_time.min(day_end));
            if gap >= min_minutes {
                blocks.push(FreeBlock {
                    start: cursor,
                    end: occurrence.start_time.min(day_end),
                    minutes: gap,
                });
            }
        }
        cursor = cursor.max(occurrence.end_time);
        if cursor >= day_end {
            return blocks;
        }
    }

    let trailing = minutes_between(cursor, day_end);
    if trailing >= min_minutes {
        blocks.push(FreeBlock {
            start: cursor,
            end: day_end,
            minutes: trailing,
        });
    }

    blocks
}

pub struct AvailabilityFinder {
    store: SharedStore,
}

impl AvailabilityFinder {
    pub fn new(store: SharedStore) -> Self {
        AvailabilityFinder { store }
    }

    pub fn free_blocks(
        &self,
        date: NaiveDate,
        min_minutes: u32,
        day_start: NaiveTime,
        day_end: NaiveTime,
    ) -> GridCalResult<Vec<FreeBlock>> {
        let occurrences = {
            let store = self.store.lock().expect("store lock poisoned");
            store.schedulable_on(date)?
        };
        Ok(free_blocks_between(
            &occurrences,
            min_minutes,
            day_start,
            day_end,
        ))
    }

    /// Aggregate view with the fixed 30-minute minimum.
    pub fn daily_summary(&self, date: NaiveDate) -> GridCalResult<DailySummary> {
        let (day_start, day_end) = default_day_bounds();
        let blocks = self.free_blocks(date, SUMMARY_MIN_MINUTES, day_start, day_end)?;

        let largest = blocks.iter().max_by_key(|b| b.minutes);
        Ok(DailySummary {
            free_minutes: blocks.iter().map(|b| b.minutes).sum(),
            largest_block_minutes: largest.map(|b| b.minutes).unwrap_or(0),
            block_count: blocks.len(),
            largest_block: largest.map(|b| (b.start, b.end)),
        })
    }
}

impl Clone for AvailabilityFinder {
    fn clone(&self) -> Self {
        AvailabilityFinder {
            store: Arc::clone(&self.store),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::occurrence::{Category, RecurrenceKind};
    use crate::store::{Store, shared};
    use chrono::Utc;
    use std::collections::BTreeSet;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn make_occurrence(id: &str, start: NaiveTime, end: NaiveTime) -> Occurrence {
        Occurrence {
            id: id.to_string(),
            title: id.to_string(),
            notes: None,
            date: "2025-10-28".parse().unwrap(),
            start_time: start,
            end_time: end,
            category: Category::Personal,
            tags: BTreeSet::new(),
            recurrence: RecurrenceKind::None,
            is_master: false,
            master_id: None,
            manually_modified: false,
            alarm_lead_minutes: 5,
            alarm_enabled: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_free_blocks_completeness() {
        // Occurrences 9-10 and 14-15 in a 7-22 day leave exactly
        // 7-9, 10-14 and 15-22 free.
        let occurrences = vec![
            make_occurrence("a", t(9, 0), t(10, 0)),
            make_occurrence("b", t(14, 0), t(15, 0)),
        ];
        let blocks = free_blocks_between(&occurrences, 30, t(7, 0), t(22, 0));

        assert_eq!(blocks.len(), 3);
        assert_eq!((blocks[0].start, blocks[0].end, blocks[0].minutes), (t(7, 0), t(9, 0), 120));
        assert_eq!((blocks[1].start, blocks[1].end, blocks[1].minutes), (t(10, 0), t(14, 0), 240));
        assert_eq!((blocks[2].start, blocks[2].end, blocks[2].minutes), (t(15, 0), t(22, 0), 420));
    }

    #[test]
    fn test_free_blocks_min_duration_filter() {
        let occurrences = vec![
            make_occurrence("a", t(7, 30), t(10, 0)),
            make_occurrence("b", t(10, 15), t(22, 0)),
        ];
        // 7:00-7:30 and 10:00-10:15 are too short for 30 minutes.
        let blocks = free_blocks_between(&occurrences, 30, t(7, 0), t(22, 0));
        assert!(blocks.is_empty());

        let blocks = free_blocks_between(&occurrences, 15, t(7, 0), t(22, 0));
        assert_eq!(blocks.len(), 2);
    }

    #[test]
    fn test_overlapping_occurrences_advance_cursor_monotonically() {
        let occurrences = vec![
            make_occurrence("a", t(9, 0), t(12, 0)),
            make_occurrence("b", t(10, 0), t(11, 0)),
        ];
        let blocks = free_blocks_between(&occurrences, 30, t(7, 0), t(22, 0));
        assert_eq!(blocks.len(), 2);
        assert_eq!((blocks[0].start, blocks[0].end), (t(7, 0), t(9, 0)));
        assert_eq!((blocks[1].start, blocks[1].end), (t(12, 0), t(22, 0)));
    }

    #[test]
    fn test_masters_carry_no_occupancy() {
        let mut master = make_occurrence("m", t(9, 0), t(10, 0));
        master.is_master = true;
        let blocks = free_blocks_between(&[master], 30, t(7, 0), t(22, 0));
        assert_eq!(blocks.len(), 1);
        assert_eq!((blocks[0].start, blocks[0].end), (t(7, 0), t(22, 0)));
    }

    #[test]
    fn test_daily_summary() {
        let store = shared(Store::in_memory().unwrap());
        {
            let guard = store.lock().unwrap();
            guard
                .insert_occurrence(&make_occurrence("a", t(9, 0), t(10, 0)))
                .unwrap();
            guard
                .insert_occurrence(&make_occurrence("b", t(14, 0), t(15, 0)))
                .unwrap();
        }

        let finder = AvailabilityFinder::new(store);
        let summary = finder.daily_summary("2025-10-28".parse().unwrap()).unwrap();
        assert_eq!(summary.free_minutes, 120 + 240 + 420);
        assert_eq!(summary.largest_block_minutes, 420);
        assert_eq!(summary.block_count, 3);
        assert_eq!(summary.largest_block, Some((t(15, 0), t(22, 0))));
    }
}
