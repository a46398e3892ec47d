//! Recurring series: master + instances.
//!
//! A recurring event is stored as one non-schedulable master plus a
//! bounded window of concrete instances. Edits and deletes are scoped:
//! one instance, the whole series, or (for deletes) only what is still
//! ahead. An instance edited on its own is marked `manually_modified`
//! and series-wide edits skip it from then on.

use chrono::{Local, Months, NaiveDate, Utc};
use tracing::info;
use uuid::Uuid;

use crate::error::{GridCalError, GridCalResult};
use crate::occurrence::{Category, Occurrence, OccurrencePatch, RecurrenceKind, SeriesInfo};
use crate::store::SharedStore;

/// Default expansion horizon for new series.
pub const DEFAULT_HORIZON_WEEKS: u32 = 12;

/// The fields shared by every occurrence of a (possibly one-element)
/// series; dates and ids are filled in per instance.
#[derive(Debug, Clone)]
pub struct SeriesTemplate {
    pub title: String,
    pub notes: Option<String>,
    pub start_time: chrono::NaiveTime,
    pub end_time: chrono::NaiveTime,
    pub category: Category,
    pub tags: std::collections::BTreeSet<String>,
    pub alarm_lead_minutes: u32,
    pub alarm_enabled: bool,
}

/// Result of a create-series operation. `master` is None for
/// non-recurring requests, which yield a single standalone occurrence.
#[derive(Debug, Clone)]
pub struct CreatedSeries {
    pub master: Option<Occurrence>,
    pub instances: Vec<Occurrence>,
}

pub struct RecurrenceEngine {
    store: SharedStore,
}

impl RecurrenceEngine {
    pub fn new(store: SharedStore) -> Self {
        RecurrenceEngine { store }
    }

    /// Create a single standalone occurrence.
    pub fn create_occurrence(
        &self,
        template: &SeriesTemplate,
        date: NaiveDate,
    ) -> GridCalResult<Occurrence> {
        let occurrence = build_occurrence(template, date, RecurrenceKind::None, false, None);
        occurrence.validate_times()?;
        let store = self.lock();
        store.insert_occurrence(&occurrence)?;
        info!(id = %occurrence.id, title = %occurrence.title, "occurrence created");
        Ok(occurrence)
    }

    /// Create a series: a master plus instances expanded forward from
    /// `start_date` for `horizon_weeks * 7` days (inclusive).
    ///
    /// Step by kind: daily +1 day, weekly +7 days, monthly the same
    /// day-of-month next month clamped to that month's last day when
    /// the day does not exist. `RecurrenceKind::None` yields a single
    /// standalone occurrence and no master.
    pub fn create_series(
        &self,
        template: &SeriesTemplate,
        kind: RecurrenceKind,
        start_date: NaiveDate,
        horizon_weeks: u32,
    ) -> GridCalResult<CreatedSeries> {
        if kind == RecurrenceKind::None {
            let single = self.create_occurrence(template, start_date)?;
            return Ok(CreatedSeries {
                master: None,
                instances: vec![single],
            });
        }

        let master = build_occurrence(template, start_date, kind, true, None);
        master.validate_times()?;

        let mut instances = Vec::new();
        let horizon_days = (horizon_weeks as i64) * 7;
        let mut cursor = start_date;
        while (cursor - start_date).num_days() <= horizon_days {
            instances.push(build_occurrence(
                template,
                cursor,
                kind,
                false,
                Some(master.id.clone()),
            ));
            cursor = match step(cursor, kind) {
                Some(next) => next,
                None => break,
            };
        }

        let store = self.lock();
        store.insert_occurrence(&master)?;
        for instance in &instances {
            store.insert_occurrence(instance)?;
        }
        info!(
            master = %master.id,
            instances = instances.len(),
            kind = kind.as_str(),
            "series created"
        );
        Ok(CreatedSeries {
            master: Some(master),
            instances,
        })
    }

    /// Patch one instance only, detaching it from series-wide edits.
    pub fn edit_instance(&self, id: &str, patch: &OccurrencePatch) -> GridCalResult<Occurrence> {
        let store = self.lock();
        let mut instance = store
            .get_occurrence(id)?
            .ok_or_else(|| GridCalError::NotFound(format!("Occurrence {id}")))?;
        if instance.is_master {
            return Err(GridCalError::InvalidOperation(
                "Cannot edit a series master directly; use edit_series".into(),
            ));
        }
        patch.apply(&mut instance)?;
        instance.manually_modified = true;
        store.update_occurrence(&instance)?;
        info!(id = %instance.id, "instance edited, detached from series");
        Ok(instance)
    }

    /// Patch the master and every instance not manually modified.
    /// Returns the master and the number of instances updated.
    pub fn edit_series(
        &self,
        master_id: &str,
        patch: &OccurrencePatch,
    ) -> GridCalResult<(Occurrence, usize)> {
        let store = self.lock();
        let mut master = store
            .get_occurrence(master_id)?
            .filter(|o| o.is_master)
            .ok_or_else(|| GridCalError::NotFound(format!("Series master {master_id}")))?;

        patch.apply(&mut master)?;
        store.update_occurrence(&master)?;

        let mut updated = 0;
        for mut instance in store.instances_of(master_id)? {
            if instance.manually_modified {
                continue;
            }
            // Series-wide edits never move individual instance dates.
            let mut scoped = patch.clone();
            scoped.date = None;
            scoped.apply(&mut instance)?;
            store.update_occurrence(&instance)?;
            updated += 1;
        }

        info!(master = %master.id, updated, "series edited");
        Ok((master, updated))
    }

    /// Remove exactly one instance. Returns false when no such id.
    pub fn delete_instance(&self, id: &str) -> GridCalResult<bool> {
        let store = self.lock();
        let Some(instance) = store.get_occurrence(id)? else {
            return Ok(false);
        };
        if instance.is_master {
            return Err(GridCalError::InvalidOperation(
                "Cannot delete a series master directly; use delete_series".into(),
            ));
        }
        let removed = store.delete_occurrence(id)?;
        if removed {
            info!(id, "instance deleted");
        }
        Ok(removed)
    }

    /// Remove a series. With `include_past` everything goes, master
    /// included; otherwise only instances dated today or later, and
    /// the master and earlier instances stay. Returns the number of
    /// instances removed.
    pub fn delete_series(&self, master_id: &str, include_past: bool) -> GridCalResult<usize> {
        self.delete_series_as_of(master_id, include_past, today())
    }

    /// [`RecurrenceEngine::delete_series`] with an explicit "today".
    pub fn delete_series_as_of(
        &self,
        master_id: &str,
        include_past: bool,
        today: NaiveDate,
    ) -> GridCalResult<usize> {
        let store = self.lock();
        store
            .get_occurrence(master_id)?
            .filter(|o| o.is_master)
            .ok_or_else(|| GridCalError::NotFound(format!("Series master {master_id}")))?;

        let removed = if include_past {
            let removed = store.delete_instances_of(master_id, None)?;
            store.delete_occurrence(master_id)?;
            removed
        } else {
            store.delete_instances_of(master_id, Some(today))?
        };

        info!(master = master_id, removed, include_past, "series deleted");
        Ok(removed)
    }

    /// Series membership report; None when the id is unknown.
    pub fn series_info(&self, id: &str) -> GridCalResult<Option<SeriesInfo>> {
        self.series_info_as_of(id, today())
    }

    /// [`RecurrenceEngine::series_info`] with an explicit "today".
    pub fn series_info_as_of(
        &self,
        id: &str,
        today: NaiveDate,
    ) -> GridCalResult<Option<SeriesInfo>> {
        let store = self.lock();
        let Some(occurrence) = store.get_occurrence(id)? else {
            return Ok(None);
        };

        if occurrence.is_master {
            let (total, future) = store.count_instances(&occurrence.id, today)?;
            return Ok(Some(SeriesInfo {
                is_series: true,
                is_master: true,
                master_id: Some(occurrence.id),
                total_instances: total,
                future_instances: future,
                manually_modified: false,
                recurrence: occurrence.recurrence,
            }));
        }

        if let Some(master_id) = occurrence.master_id.clone() {
            let (total, future) = store.count_instances(&master_id, today)?;
            let recurrence = store
                .get_occurrence(&master_id)?
                .map(|m| m.recurrence)
                .unwrap_or(RecurrenceKind::None);
            return Ok(Some(SeriesInfo {
                is_series: true,
                is_master: false,
                master_id: Some(master_id),
                total_instances: total,
                future_instances: future,
                manually_modified: occurrence.manually_modified,
                recurrence,
            }));
        }

        Ok(Some(SeriesInfo::standalone()))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, crate::store::Store> {
        self.store.lock().expect("store lock poisoned")
    }
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Next date of a recurrence step. Monthly steps clamp to the target
/// month's last day instead of skipping the month.
fn step(cursor: NaiveDate, kind: RecurrenceKind) -> Option<NaiveDate> {
    match kind {
        RecurrenceKind::None => None,
        RecurrenceKind::Daily => cursor.succ_opt(),
        RecurrenceKind::Weekly => cursor.checked_add_days(chrono::Days::new(7)),
        RecurrenceKind::Monthly => cursor.checked_add_months(Months::new(1)),
    }
}

fn build_occurrence(
    template: &SeriesTemplate,
    date: NaiveDate,
    kind: RecurrenceKind,
    is_master: bool,
    master_id: Option<String>,
) -> Occurrence {
    let now = Utc::now();
    Occurrence {
        id: Uuid::new_v4().to_string(),
        title: template.title.clone(),
        notes: template.notes.clone(),
        date,
        start_time: template.start_time,
        end_time: template.end_time,
        category: template.category,
        tags: template.tags.clone(),
        recurrence: kind,
        is_master,
        master_id,
        manually_modified: false,
        alarm_lead_minutes: template.alarm_lead_minutes,
        alarm_enabled: template.alarm_enabled,
        created_at: now,
        updated_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::occurrence::Category;
    use crate::store::{Store, shared};
    use chrono::NaiveTime;
    use std::collections::BTreeSet;

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn make_template() -> SeriesTemplate {
        SeriesTemplate {
            title: "Gym".to_string(),
            notes: None,
            start_time: NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(19, 0, 0).unwrap(),
            category: Category::Sport,
            tags: BTreeSet::new(),
            alarm_lead_minutes: 5,
            alarm_enabled: true,
        }
    }

    fn engine() -> RecurrenceEngine {
        RecurrenceEngine::new(shared(Store::in_memory().unwrap()))
    }

    #[test]
    fn test_none_kind_yields_single_standalone() {
        let engine = engine();
        let created = engine
            .create_series(&make_template(), RecurrenceKind::None, d("2025-10-01"), 12)
            .unwrap();
        assert!(created.master.is_none());
        assert_eq!(created.instances.len(), 1);
        let single = &created.instances[0];
        assert!(!single.is_master);
        assert!(single.master_id.is_none());
        assert_eq!(single.recurrence, RecurrenceKind::None);
    }

    #[test]
    fn test_weekly_expansion_window() {
        let engine = engine();
        let created = engine
            .create_series(&make_template(), RecurrenceKind::Weekly, d("2025-10-01"), 11)
            .unwrap();
        // Days 0, 7, ..., 77 inside the inclusive 77-day horizon.
        assert_eq!(created.instances.len(), 12);
        assert_eq!(created.instances[0].date, d("2025-10-01"));
        assert_eq!(created.instances[11].date, d("2025-12-17"));

        let master = created.master.unwrap();
        assert!(master.is_master);
        assert!(master.master_id.is_none());
        assert!(created.instances.iter().all(|i| {
            i.master_id.as_deref() == Some(master.id.as_str()) && !i.is_master
        }));
    }

    #[test]
    fn test_monthly_clamp_to_last_day() {
        let engine = engine();
        let created = engine
            .create_series(&make_template(), RecurrenceKind::Monthly, d("2025-01-31"), 10)
            .unwrap();
        let dates: Vec<NaiveDate> = created.instances.iter().map(|i| i.date).collect();
        // The 31st lands on February's last day, not skipped, not wrapped.
        assert_eq!(dates[0], d("2025-01-31"));
        assert_eq!(dates[1], d("2025-02-28"));
        assert_eq!(dates[2], d("2025-03-28"));
    }

    #[test]
    fn test_monthly_december_wraps_to_january() {
        let engine = engine();
        let created = engine
            .create_series(&make_template(), RecurrenceKind::Monthly, d("2025-12-15"), 8)
            .unwrap();
        assert_eq!(created.instances[1].date, d("2026-01-15"));
    }

    #[test]
    fn test_edit_instance_detaches_and_leaves_siblings() {
        let engine = engine();
        let created = engine
            .create_series(&make_template(), RecurrenceKind::Weekly, d("2025-10-01"), 2)
            .unwrap();
        let master = created.master.unwrap();
        let target = &created.instances[1];

        let patch = OccurrencePatch {
            title: Some("Swimming".to_string()),
            ..Default::default()
        };
        let edited = engine.edit_instance(&target.id, &patch).unwrap();
        assert_eq!(edited.title, "Swimming");
        assert!(edited.manually_modified);

        let store = engine.store.lock().unwrap();
        let master_after = store.get_occurrence(&master.id).unwrap().unwrap();
        assert_eq!(master_after.title, "Gym");
        for sibling in created.instances.iter().filter(|i| i.id != target.id) {
            let after = store.get_occurrence(&sibling.id).unwrap().unwrap();
            assert_eq!(after.title, "Gym");
            assert!(!after.manually_modified);
        }
    }

    #[test]
    fn test_edit_instance_rejects_master() {
        let engine = engine();
        let created = engine
            .create_series(&make_template(), RecurrenceKind::Daily, d("2025-10-01"), 1)
            .unwrap();
        let master = created.master.unwrap();
        let err = engine
            .edit_instance(&master.id, &OccurrencePatch::default())
            .unwrap_err();
        assert!(matches!(err, GridCalError::InvalidOperation(_)));
    }

    #[test]
    fn test_edit_series_skips_manually_modified() {
        let engine = engine();
        let created = engine
            .create_series(&make_template(), RecurrenceKind::Weekly, d("2025-10-01"), 2)
            .unwrap();
        let master = created.master.unwrap();

        let detach = OccurrencePatch {
            title: Some("Swimming".to_string()),
            ..Default::default()
        };
        engine.edit_instance(&created.instances[0].id, &detach).unwrap();

        let patch = OccurrencePatch {
            title: Some("Crossfit".to_string()),
            ..Default::default()
        };
        let (master_after, updated) = engine.edit_series(&master.id, &patch).unwrap();

        assert_eq!(master_after.title, "Crossfit");
        // Three instances (days 0, 7, 14), one detached.
        assert_eq!(updated, 2);

        let store = engine.store.lock().unwrap();
        let detached = store
            .get_occurrence(&created.instances[0].id)
            .unwrap()
            .unwrap();
        assert_eq!(detached.title, "Swimming");
        let sibling = store
            .get_occurrence(&created.instances[1].id)
            .unwrap()
            .unwrap();
        assert_eq!(sibling.title, "Crossfit");
    }

    #[test]
    fn test_edit_series_unknown_master() {
        let engine = engine();
        let err = engine
            .edit_series("nope", &OccurrencePatch::default())
            .unwrap_err();
        assert!(matches!(err, GridCalError::NotFound(_)));
    }

    #[test]
    fn test_delete_instance_scoping() {
        let engine = engine();
        let created = engine
            .create_series(&make_template(), RecurrenceKind::Daily, d("2025-10-01"), 1)
            .unwrap();
        let master = created.master.unwrap();

        assert!(engine.delete_instance(&created.instances[0].id).unwrap());
        assert!(!engine.delete_instance("unknown-id").unwrap());
        let err = engine.delete_instance(&master.id).unwrap_err();
        assert!(matches!(err, GridCalError::InvalidOperation(_)));
    }

    #[test]
    fn test_delete_series_scope() {
        // Weekly series of 12 starting 2025-10-01; deleting future-only
        // on 2025-10-15 keeps the master and the two elapsed instances.
        let engine = engine();
        let created = engine
            .create_series(&make_template(), RecurrenceKind::Weekly, d("2025-10-01"), 11)
            .unwrap();
        let master = created.master.unwrap();
        assert_eq!(created.instances.len(), 12);

        let removed = engine
            .delete_series_as_of(&master.id, false, d("2025-10-15"))
            .unwrap();
        assert_eq!(removed, 10);

        {
            let store = engine.store.lock().unwrap();
            assert!(store.get_occurrence(&master.id).unwrap().is_some());
            let left = store.instances_of(&master.id).unwrap();
            assert_eq!(left.len(), 2);
            assert!(left.iter().all(|i| i.date < d("2025-10-15")));
        }

        let removed = engine
            .delete_series_as_of(&master.id, true, d("2025-10-15"))
            .unwrap();
        assert_eq!(removed, 2);
        let store = engine.store.lock().unwrap();
        assert!(store.get_occurrence(&master.id).unwrap().is_none());
    }

    #[test]
    fn test_delete_series_unknown_master() {
        let engine = engine();
        let err = engine.delete_series_as_of("nope", true, d("2025-10-15")).unwrap_err();
        assert!(matches!(err, GridCalError::NotFound(_)));
    }

    #[test]
    fn test_series_info_shapes() {
        let engine = engine();
        let today = d("2025-10-15");

        // Unknown id.
        assert!(engine.series_info_as_of("nope", today).unwrap().is_none());

        // Standalone occurrence.
        let single = engine
            .create_occurrence(&make_template(), d("2025-10-20"))
            .unwrap();
        let info = engine.series_info_as_of(&single.id, today).unwrap().unwrap();
        assert_eq!(info, SeriesInfo::standalone());

        // Master and instance of a weekly series.
        let created = engine
            .create_series(&make_template(), RecurrenceKind::Weekly, d("2025-10-01"), 3)
            .unwrap();
        let master = created.master.unwrap();

        let info = engine.series_info_as_of(&master.id, today).unwrap().unwrap();
        assert!(info.is_series && info.is_master);
        assert_eq!(info.master_id.as_deref(), Some(master.id.as_str()));
        assert_eq!(info.total_instances, 4);
        assert_eq!(info.future_instances, 2);
        assert_eq!(info.recurrence, RecurrenceKind::Weekly);

        let info = engine
            .series_info_as_of(&created.instances[0].id, today)
            .unwrap()
            .unwrap();
        assert!(info.is_series && !info.is_master);
        assert_eq!(info.master_id.as_deref(), Some(master.id.as_str()));
        assert_eq!(info.recurrence, RecurrenceKind::Weekly);
    }
}
