//! Reconciliation between the store and the weekly grid pages.
//!
//! The store is authoritative; pages are a projection. Pushes go
//! through the batch dispatcher (and so through the rate limiter), and
//! a surface failure never rolls back a store write; `reconcile_all`
//! is the repair path for whatever drift that leaves behind.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Datelike, Duration, Local, NaiveDate, NaiveTime};
use tracing::{debug, info, warn};

use crate::batch::{
    BatchDispatcher, CellWrite, PageOutcome, RangeClear, RangeFormat, first_error,
};
use crate::error::{GridCalError, GridCalResult};
use crate::grid::{
    GridLayout, category_color, monday_of, page_name_for, parse_page_name, priority_color,
    rowcol_to_a1,
};
use crate::occurrence::{Occurrence, RecurrenceKind, SlotRef};
use crate::rate_limit::RateLimiter;
use crate::reminder::Reminder;
use crate::store::SharedStore;
use crate::surface::{BorderStyle, CellStyle, PageHandle, Surface};

/// Archived pages kept before FIFO eviction.
pub const DEFAULT_ARCHIVE_CAP: usize = 8;
pub const DEFAULT_TEMPLATE_PAGE: &str = "Template";
/// Weekly pages kept ahead of today.
pub const DEFAULT_FUTURE_WEEKS: u32 = 12;

/// Reserved column (J) holding the week's reminders.
const REMINDER_COL: u32 = 10;

/// What a caller learns from a store-then-push operation: the durable
/// write and the projection can succeed independently.
#[derive(Debug, Clone, PartialEq)]
pub struct PushOutcome {
    pub store_ok: bool,
    pub surface_ok: bool,
    pub error: Option<String>,
}

impl PushOutcome {
    pub fn full() -> Self {
        PushOutcome {
            store_ok: true,
            surface_ok: true,
            error: None,
        }
    }

    /// Store write landed, projection did not.
    pub fn degraded(error: String) -> Self {
        PushOutcome {
            store_ok: true,
            surface_ok: false,
            error: Some(error),
        }
    }
}

/// Counters from a full `reconcile_all` pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileStats {
    pub weeks: usize,
    pub pushed: usize,
    /// Occurrences skipped because they do not fit the page grid.
    pub skipped: usize,
    pub failed_pages: Vec<String>,
}

/// Per-step outcome of a full sync.
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    pub step: &'static str,
    pub ok: bool,
    pub detail: String,
}

/// Report of the five-step full sync.
#[derive(Debug, Clone, Default)]
pub struct FullSyncReport {
    pub steps: Vec<StepOutcome>,
    pub weeks_created: usize,
    pub occurrences_pushed: usize,
    pub reminder_pages: usize,
    pub archived: Vec<String>,
    pub orphan_instances: Vec<String>,
}

impl FullSyncReport {
    pub fn all_ok(&self) -> bool {
        self.steps.iter().all(|s| s.ok)
    }
}

pub struct SheetReconciler {
    store: SharedStore,
    surface: Arc<dyn Surface>,
    dispatcher: Arc<BatchDispatcher>,
    limiter: Arc<RateLimiter>,
    layout: GridLayout,
    template_page: String,
    archive_cap: usize,
}

impl SheetReconciler {
    pub fn new(
        store: SharedStore,
        surface: Arc<dyn Surface>,
        dispatcher: Arc<BatchDispatcher>,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        SheetReconciler {
            store,
            surface,
            dispatcher,
            limiter,
            layout: GridLayout::default(),
            template_page: DEFAULT_TEMPLATE_PAGE.to_string(),
            archive_cap: DEFAULT_ARCHIVE_CAP,
        }
    }

    pub fn with_template_page(mut self, name: &str) -> Self {
        self.template_page = name.to_string();
        self
    }

    pub fn with_archive_cap(mut self, cap: usize) -> Self {
        self.archive_cap = cap.max(1);
        self
    }

    pub fn with_layout(mut self, layout: GridLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Deterministic page name for the week containing `date`.
    pub fn page_name_for(&self, date: NaiveDate) -> String {
        page_name_for(date)
    }

    /// Look up the week page for `date`, duplicating the template on a
    /// miss.
    pub async fn get_or_create_page(&self, date: NaiveDate) -> GridCalResult<PageHandle> {
        let name = self.page_name_for(date);
        if let Some(handle) = self.dispatcher.page_handle(&name).await? {
            return Ok(handle);
        }

        let template = self
            .dispatcher
            .page_handle(&self.template_page)
            .await?
            .ok_or_else(|| GridCalError::TemplateUnavailable(self.template_page.clone()))?;

        self.limiter.wait_if_needed().await;
        let handle = self.surface.duplicate_page(&template, &name).await?;
        self.dispatcher.invalidate();
        info!(page = %name, "week page created from template");
        Ok(handle)
    }

    /// Idempotently create the next `n` weekly pages. Returns how many
    /// were actually created.
    pub async fn ensure_future_weeks(&self, n: u32) -> GridCalResult<usize> {
        self.ensure_future_weeks_from(n, today()).await
    }

    pub async fn ensure_future_weeks_from(&self, n: u32, today: NaiveDate) -> GridCalResult<usize> {
        let mut created = 0;
        for week in 0..n {
            let date = today + Duration::weeks(week as i64);
            let name = self.page_name_for(date);
            if self.dispatcher.page_handle(&name).await?.is_none() {
                self.get_or_create_page(date).await?;
                created += 1;
            }
        }
        info!(created, horizon_weeks = n, "future weeks ensured");
        Ok(created)
    }

    /// Archive every non-template page whose Monday precedes the
    /// current week's Monday, then trim the archival surface to the
    /// most recent [`DEFAULT_ARCHIVE_CAP`] pages. Returns the names
    /// archived.
    pub async fn archive_elapsed_weeks(&self) -> GridCalResult<Vec<String>> {
        self.archive_elapsed_weeks_as_of(today()).await
    }

    pub async fn archive_elapsed_weeks_as_of(
        &self,
        today: NaiveDate,
    ) -> GridCalResult<Vec<String>> {
        let pages = self.dispatcher.refresh().await?;
        let current_monday = monday_of(today);
        let mut archived = Vec::new();

        for page in pages {
            if page.name == self.template_page {
                continue;
            }
            // Pages that do not parse as week spans are left alone.
            let Some(monday) = parse_page_name(&page.name, today) else {
                continue;
            };
            if monday >= current_monday {
                continue;
            }

            self.limiter.wait_if_needed().await;
            if let Err(e) = self.surface.copy_page_to_archive(&page).await {
                warn!(page = %page.name, error = %e, "archive copy failed, page kept live");
                continue;
            }
            self.limiter.wait_if_needed().await;
            if let Err(e) = self.surface.delete_page(&page).await {
                warn!(page = %page.name, error = %e, "live delete failed after archive copy");
                continue;
            }
            info!(page = %page.name, "week page archived");
            archived.push(page.name);
        }

        if !archived.is_empty() {
            self.dispatcher.invalidate();
            self.trim_archive().await?;
        }
        Ok(archived)
    }

    async fn trim_archive(&self) -> GridCalResult<()> {
        self.limiter.wait_if_needed().await;
        let pages = self.surface.list_archive_pages().await?;
        if pages.len() <= self.archive_cap {
            return Ok(());
        }
        let evict = pages.len() - self.archive_cap;
        for page in pages.into_iter().take(evict) {
            self.limiter.wait_if_needed().await;
            if let Err(e) = self.surface.delete_archive_page(&page).await {
                warn!(page = %page.name, error = %e, "archive eviction failed");
            } else {
                debug!(page = %page.name, "archived page evicted");
            }
        }
        Ok(())
    }

    /// Paint one occurrence onto its week page: text in the first cell
    /// of the block, category color over the row span, readable text
    /// color by luminance, solid outer borders.
    pub async fn push_occurrence(&self, occurrence: &Occurrence) -> GridCalResult<()> {
        if occurrence.is_master {
            return Err(GridCalError::InvalidOperation(
                "Series masters are never projected onto the surface".into(),
            ));
        }

        let page = self.get_or_create_page(occurrence.date).await?;
        let block = self
            .layout
            .block_range(occurrence.date, occurrence.start_time, occurrence.end_time)?;

        let outcomes = self
            .dispatcher
            .batch_clear(vec![RangeClear {
                page: page.name.clone(),
                range: block.range.clone(),
            }])
            .await;
        fail_on_error(outcomes)?;

        let outcomes = self
            .dispatcher
            .batch_update(vec![CellWrite {
                page: page.name.clone(),
                range: block.first_cell.clone(),
                values: vec![vec![cell_text(occurrence)]],
            }])
            .await;
        fail_on_error(outcomes)?;

        let outcomes = self
            .dispatcher
            .batch_format(block_formats(&page.name, occurrence, &block))
            .await;
        fail_on_error(outcomes)?;

        debug!(id = %occurrence.id, page = %page.name, range = %block.range, "occurrence pushed");
        Ok(())
    }

    /// Clear an occurrence's block: content, formatting and borders.
    /// Takes a [`SlotRef`] so removal works after the store record is
    /// gone. A missing page means there is nothing to clear.
    pub async fn remove_occurrence(&self, slot: &SlotRef) -> GridCalResult<()> {
        let name = self.page_name_for(slot.date);
        if self.dispatcher.page_handle(&name).await?.is_none() {
            debug!(page = %name, "no page for removed occurrence, nothing to clear");
            return Ok(());
        }

        let block = self.layout.block_range(slot.date, slot.start, slot.end)?;
        let outcomes = self
            .dispatcher
            .batch_clear(vec![RangeClear {
                page: name.clone(),
                range: block.range.clone(),
            }])
            .await;
        fail_on_error(outcomes)?;

        let outcomes = self
            .dispatcher
            .batch_format(vec![RangeFormat {
                page: name,
                range: block.range,
                style: CellStyle::reset(),
            }])
            .await;
        fail_on_error(outcomes)?;
        Ok(())
    }

    /// Re-paint after an edit: clear the old block, push the new state.
    pub async fn update_occurrence(
        &self,
        old: &SlotRef,
        new: &Occurrence,
    ) -> GridCalResult<()> {
        if let Err(e) = self.remove_occurrence(old).await {
            warn!(error = %e, "could not clear old block before repaint");
        }
        self.push_occurrence(new).await
    }

    /// Full resync: group live occurrences by owning week, clear each
    /// week's data region in one call, and re-push everything. Running
    /// it twice with no store changes yields identical surface state.
    pub async fn reconcile_all(&self) -> GridCalResult<ReconcileStats> {
        let occurrences = {
            let store = self.lock_store();
            store.list_schedulable()?
        };

        let mut by_week: BTreeMap<NaiveDate, Vec<Occurrence>> = BTreeMap::new();
        for occurrence in occurrences {
            by_week
                .entry(monday_of(occurrence.date))
                .or_default()
                .push(occurrence);
        }

        let mut stats = ReconcileStats::default();
        let mut clears = Vec::new();
        let mut writes = Vec::new();
        let mut formats = Vec::new();

        for (monday, week_occurrences) in &by_week {
            let page = self.get_or_create_page(*monday).await?;
            stats.weeks += 1;

            clears.push(RangeClear {
                page: page.name.clone(),
                range: self.layout.data_region(),
            });
            formats.push(RangeFormat {
                page: page.name.clone(),
                range: self.layout.data_region(),
                style: CellStyle::reset(),
            });

            for occurrence in week_occurrences {
                let block = match self.layout.block_range(
                    occurrence.date,
                    occurrence.start_time,
                    occurrence.end_time,
                ) {
                    Ok(block) => block,
                    Err(e) => {
                        warn!(id = %occurrence.id, error = %e, "occurrence does not fit the grid, skipped");
                        stats.skipped += 1;
                        continue;
                    }
                };
                writes.push(CellWrite {
                    page: page.name.clone(),
                    range: block.first_cell.clone(),
                    values: vec![vec![cell_text(occurrence)]],
                });
                formats.extend(block_formats(&page.name, occurrence, &block));
                stats.pushed += 1;
            }
        }

        for outcome in self.dispatcher.batch_clear(clears).await {
            record_failure(&mut stats, outcome);
        }
        for outcome in self.dispatcher.batch_update(writes).await {
            record_failure(&mut stats, outcome);
        }
        for outcome in self.dispatcher.batch_format(formats).await {
            record_failure(&mut stats, outcome);
        }

        info!(
            weeks = stats.weeks,
            pushed = stats.pushed,
            skipped = stats.skipped,
            failed_pages = stats.failed_pages.len(),
            "reconcile pass finished"
        );
        Ok(stats)
    }

    /// Project pending reminders into the reserved column of their
    /// week's page (undated ones land on the current week). Returns
    /// the number of pages written.
    pub async fn sync_reminders(&self) -> GridCalResult<usize> {
        self.sync_reminders_as_of(today()).await
    }

    pub async fn sync_reminders_as_of(&self, today: NaiveDate) -> GridCalResult<usize> {
        let pending = {
            let store = self.lock_store();
            store.pending_reminders()?
        };

        let current_monday = monday_of(today);
        let mut by_week: BTreeMap<NaiveDate, Vec<Reminder>> = BTreeMap::new();
        for reminder in pending {
            let monday = reminder
                .due_date
                .map(monday_of)
                .unwrap_or(current_monday);
            by_week.entry(monday).or_default().push(reminder);
        }

        let mut clears = Vec::new();
        let mut writes = Vec::new();
        let mut formats = Vec::new();
        let column_range = format!(
            "{}:{}",
            rowcol_to_a1(2, REMINDER_COL),
            rowcol_to_a1(self.layout.last_data_row(), REMINDER_COL)
        );

        let mut pages = 0;
        for (monday, reminders) in &by_week {
            // Weeks already elapsed keep their archived state as-is.
            if *monday < current_monday {
                continue;
            }
            let page = self.get_or_create_page(*monday).await?;
            pages += 1;

            clears.push(RangeClear {
                page: page.name.clone(),
                range: column_range.clone(),
            });
            formats.push(RangeFormat {
                page: page.name.clone(),
                range: column_range.clone(),
                style: CellStyle::reset(),
            });

            for (slot, reminder) in reminders.iter().enumerate() {
                let row = 2 + slot as u32;
                if row > self.layout.last_data_row() {
                    warn!(page = %page.name, "more pending reminders than rows, truncating");
                    break;
                }
                let cell = rowcol_to_a1(row, REMINDER_COL);
                writes.push(CellWrite {
                    page: page.name.clone(),
                    range: cell.clone(),
                    values: vec![vec![reminder_text(reminder)]],
                });
                let background = priority_color(reminder.priority);
                formats.push(RangeFormat {
                    page: page.name.clone(),
                    range: cell,
                    style: CellStyle {
                        background: Some(background),
                        text_color: Some(background.readable_text()),
                        bold: reminder.priority <= 2,
                        wrap: true,
                        border: BorderStyle::Clear,
                    },
                });
            }
        }

        fail_on_error(self.dispatcher.batch_clear(clears).await)?;
        fail_on_error(self.dispatcher.batch_update(writes).await)?;
        fail_on_error(self.dispatcher.batch_format(formats).await)?;

        info!(pages, "reminders projected");
        Ok(pages)
    }

    /// Read a week page back and insert any occurrence the store does
    /// not already hold. Cells parse as `title[\n notes]`; the date
    /// comes from the column's weekday header, resolved to the nearest
    /// future occurrence of that weekday.
    pub async fn pull_from_page(&self, date: NaiveDate) -> GridCalResult<usize> {
        self.pull_from_page_as_of(date, today()).await
    }

    pub async fn pull_from_page_as_of(
        &self,
        date: NaiveDate,
        today: NaiveDate,
    ) -> GridCalResult<usize> {
        let name = self.page_name_for(date);
        let handle = self
            .dispatcher
            .page_handle(&name)
            .await?
            .ok_or_else(|| GridCalError::NotFound(format!("Page '{name}'")))?;

        self.limiter.wait_if_needed().await;
        let rows = self.surface.read_grid(&handle).await?;
        let headers = rows.first().cloned().unwrap_or_default();

        let mut imported = 0;
        for (row_index, row) in rows.iter().enumerate().skip(1) {
            let Some(start) = row
                .first()
                .and_then(|label| NaiveTime::parse_from_str(label.trim(), "%H:%M").ok())
            else {
                continue;
            };
            let end = rows
                .get(row_index + 1)
                .and_then(|next| next.first())
                .and_then(|label| NaiveTime::parse_from_str(label.trim(), "%H:%M").ok())
                .unwrap_or(start + Duration::minutes(self.layout.slot_minutes as i64));

            for (col_index, value) in row.iter().enumerate().skip(1) {
                let value = value.trim();
                if value.is_empty() {
                    continue;
                }
                let Some(weekday) = headers
                    .get(col_index)
                    .and_then(|h| self.layout.weekday_from_label(h))
                else {
                    continue;
                };

                let days_ahead =
                    (weekday + 7 - today.weekday().num_days_from_monday()) % 7;
                let target = today + Duration::days(days_ahead as i64);

                let (title, notes) = match value.split_once('\n') {
                    Some((title, notes)) => (title.trim(), Some(notes.trim().to_string())),
                    None => (value, None),
                };

                let store = self.lock_store();
                if store.exists_same(title, target, start)? {
                    continue;
                }
                let now = chrono::Utc::now();
                let occurrence = Occurrence {
                    id: uuid::Uuid::new_v4().to_string(),
                    title: title.to_string(),
                    notes,
                    date: target,
                    start_time: start,
                    end_time: end,
                    category: Default::default(),
                    tags: Default::default(),
                    recurrence: RecurrenceKind::None,
                    is_master: false,
                    master_id: None,
                    manually_modified: false,
                    alarm_lead_minutes: 5,
                    alarm_enabled: true,
                    created_at: now,
                    updated_at: now,
                };
                match store.insert_occurrence(&occurrence) {
                    Ok(()) => imported += 1,
                    Err(e) => {
                        warn!(row = row_index + 1, col = col_index + 1, error = %e,
                              "cell could not be imported");
                    }
                }
            }
        }

        info!(page = %name, imported, "pull finished");
        Ok(imported)
    }

    /// Orphan instances: members of a series whose master is gone.
    pub fn integrity_check(&self) -> GridCalResult<Vec<String>> {
        let store = self.lock_store();
        Ok(store
            .orphan_instances()?
            .into_iter()
            .map(|o| o.id)
            .collect())
    }

    /// The five-step full sync: ensure future weeks, reconcile
    /// occurrences, project reminders, archive elapsed weeks, check
    /// integrity. Steps fail independently; the report carries each
    /// outcome.
    pub async fn full_sync(&self, future_weeks: u32) -> FullSyncReport {
        let mut report = FullSyncReport::default();

        match self.ensure_future_weeks(future_weeks).await {
            Ok(created) => {
                report.weeks_created = created;
                report.steps.push(step_ok("future_weeks", format!("{created} created")));
            }
            Err(e) => report.steps.push(step_failed("future_weeks", e)),
        }

        match self.reconcile_all().await {
            Ok(stats) => {
                report.occurrences_pushed = stats.pushed;
                let ok = stats.failed_pages.is_empty();
                let detail = format!(
                    "{} occurrences over {} weeks ({} skipped)",
                    stats.pushed, stats.weeks, stats.skipped
                );
                report.steps.push(StepOutcome {
                    step: "occurrences",
                    ok,
                    detail,
                });
            }
            Err(e) => report.steps.push(step_failed("occurrences", e)),
        }

        match self.sync_reminders().await {
            Ok(pages) => {
                report.reminder_pages = pages;
                report.steps.push(step_ok("reminders", format!("{pages} pages")));
            }
            Err(e) => report.steps.push(step_failed("reminders", e)),
        }

        match self.archive_elapsed_weeks().await {
            Ok(archived) => {
                report.steps.push(step_ok("archive", format!("{} archived", archived.len())));
                report.archived = archived;
            }
            Err(e) => report.steps.push(step_failed("archive", e)),
        }

        match self.integrity_check() {
            Ok(orphans) => {
                let ok = orphans.is_empty();
                report.steps.push(StepOutcome {
                    step: "integrity",
                    ok,
                    detail: format!("{} orphan instances", orphans.len()),
                });
                report.orphan_instances = orphans;
            }
            Err(e) => report.steps.push(step_failed("integrity", e)),
        }

        report
    }

    fn lock_store(&self) -> std::sync::MutexGuard<'_, crate::store::Store> {
        self.store.lock().expect("store lock poisoned")
    }
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn step_ok(step: &'static str, detail: String) -> StepOutcome {
    StepOutcome {
        step,
        ok: true,
        detail,
    }
}

fn step_failed(step: &'static str, error: GridCalError) -> StepOutcome {
    warn!(step, error = %error, "full sync step failed");
    StepOutcome {
        step,
        ok: false,
        detail: error.to_string(),
    }
}

fn record_failure(stats: &mut ReconcileStats, outcome: PageOutcome) {
    if !outcome.ok && !stats.failed_pages.contains(&outcome.page) {
        stats.failed_pages.push(outcome.page);
    }
}

fn fail_on_error(outcomes: Vec<PageOutcome>) -> GridCalResult<()> {
    match first_error(&outcomes) {
        Some(error) => Err(GridCalError::Surface(error)),
        None => Ok(()),
    }
}

fn cell_text(occurrence: &Occurrence) -> String {
    match occurrence.notes.as_deref() {
        Some(notes) if !notes.is_empty() => format!("{}\n{}", occurrence.title, notes),
        _ => occurrence.title.clone(),
    }
}

fn reminder_text(reminder: &Reminder) -> String {
    let mut text = format!("[P:{}] {}", reminder.priority, reminder.content);
    if let Some(due) = reminder.due_date {
        match reminder.due_time {
            Some(time) => {
                text.push_str(&format!("\ndue {} {}", due.format("%d %b"), time.format("%H:%M")))
            }
            None => text.push_str(&format!("\ndue {}", due.format("%d %b"))),
        }
    }
    text
}

/// The two styles painting one block: the row span and the first cell
/// (which additionally wraps and bolds the text). Applied in order, so
/// the first-cell style lands last.
fn block_formats(
    page: &str,
    occurrence: &Occurrence,
    block: &crate::grid::BlockRange,
) -> Vec<RangeFormat> {
    let background = category_color(occurrence.category);
    let text_color = background.readable_text();
    vec![
        RangeFormat {
            page: page.to_string(),
            range: block.range.clone(),
            style: CellStyle {
                background: Some(background),
                text_color: Some(text_color),
                bold: false,
                wrap: false,
                border: BorderStyle::Solid,
            },
        },
        RangeFormat {
            page: page.to_string(),
            range: block.first_cell.clone(),
            style: CellStyle {
                background: Some(background),
                text_color: Some(text_color),
                bold: true,
                wrap: true,
                border: BorderStyle::Solid,
            },
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemorySurface;
    use crate::occurrence::Category;
    use crate::reminder::{NewReminder, ReminderCategory};
    use crate::store::{Store, shared};
    use crate::surface::Rgb;
    use std::collections::BTreeSet;

    struct Fixture {
        store: SharedStore,
        surface: Arc<MemorySurface>,
        reconciler: SheetReconciler,
    }

    fn fixture() -> Fixture {
        fixture_with_surface(MemorySurface::with_week_template(
            DEFAULT_TEMPLATE_PAGE,
            &GridLayout::default(),
        ))
    }

    fn fixture_with_surface(surface: MemorySurface) -> Fixture {
        let store = shared(Store::in_memory().unwrap());
        let surface = Arc::new(surface);
        let dyn_surface: Arc<dyn Surface> = surface.clone();
        let limiter = Arc::new(RateLimiter::new(1_000_000));
        let dispatcher = Arc::new(BatchDispatcher::new(dyn_surface.clone(), limiter.clone()));
        let reconciler =
            SheetReconciler::new(store.clone(), dyn_surface, dispatcher, limiter);
        Fixture {
            store,
            surface,
            reconciler,
        }
    }

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn make_occurrence(id: &str, date: &str, start: NaiveTime, end: NaiveTime) -> Occurrence {
        Occurrence {
            id: id.to_string(),
            title: "Physics".to_string(),
            notes: Some("Lab".to_string()),
            date: d(date),
            start_time: start,
            end_time: end,
            category: Category::Class,
            tags: BTreeSet::new(),
            recurrence: RecurrenceKind::None,
            is_master: false,
            master_id: None,
            manually_modified: false,
            alarm_lead_minutes: 5,
            alarm_enabled: true,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_get_or_create_page_is_idempotent() {
        let fx = fixture();
        let first = fx.reconciler.get_or_create_page(d("2025-10-28")).await.unwrap();
        assert_eq!(first.name, "27 Oct-02 Nov");
        let second = fx.reconciler.get_or_create_page(d("2025-10-30")).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(fx.surface.call_count("duplicate_page"), 1);
    }

    #[tokio::test]
    async fn test_missing_template_fails_creation() {
        let fx = fixture_with_surface(MemorySurface::new());
        let err = fx
            .reconciler
            .get_or_create_page(d("2025-10-28"))
            .await
            .unwrap_err();
        assert!(matches!(err, GridCalError::TemplateUnavailable(_)));
    }

    #[tokio::test]
    async fn test_ensure_future_weeks_idempotent() {
        let fx = fixture();
        let today = d("2025-10-15");
        assert_eq!(
            fx.reconciler.ensure_future_weeks_from(3, today).await.unwrap(),
            3
        );
        assert_eq!(
            fx.reconciler.ensure_future_weeks_from(3, today).await.unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_push_occurrence_paints_block() {
        let fx = fixture();
        // Tuesday 2025-10-28 -> column C; 09:00-10:30 -> rows 6..8.
        let occurrence = make_occurrence("a", "2025-10-28", t(9, 0), t(10, 30));
        fx.store.lock().unwrap().insert_occurrence(&occurrence).unwrap();
        fx.reconciler.push_occurrence(&occurrence).await.unwrap();

        let page = "27 Oct-02 Nov";
        assert_eq!(fx.surface.cell(page, 6, 3).as_deref(), Some("Physics\nLab"));
        assert_eq!(fx.surface.cell(page, 7, 3), None);

        let first = fx.surface.style(page, 6, 3).unwrap();
        assert!(first.bold && first.wrap);
        assert_eq!(first.border, BorderStyle::Solid);
        // Class color is light, so the text is black.
        assert_eq!(first.text_color, Some(Rgb::BLACK));

        let body = fx.surface.style(page, 8, 3).unwrap();
        assert!(!body.bold);
        assert_eq!(body.background, first.background);
        // End boundary is exclusive: the 10:30 row stays untouched.
        assert!(fx.surface.style(page, 9, 3).is_none());
    }

    #[tokio::test]
    async fn test_dark_category_gets_white_text() {
        let fx = fixture();
        let mut occurrence = make_occurrence("a", "2025-10-28", t(18, 0), t(19, 0));
        occurrence.category = Category::Sport;
        fx.reconciler.push_occurrence(&occurrence).await.unwrap();

        let style = fx.surface.style("27 Oct-02 Nov", 24, 3).unwrap();
        assert_eq!(style.text_color, Some(Rgb::WHITE));
    }

    #[tokio::test]
    async fn test_push_rejects_master() {
        let fx = fixture();
        let mut master = make_occurrence("m", "2025-10-28", t(9, 0), t(10, 0));
        master.is_master = true;
        let err = fx.reconciler.push_occurrence(&master).await.unwrap_err();
        assert!(matches!(err, GridCalError::InvalidOperation(_)));
    }

    #[tokio::test]
    async fn test_remove_occurrence_resets_block() {
        let fx = fixture();
        let occurrence = make_occurrence("a", "2025-10-28", t(9, 0), t(10, 30));
        fx.reconciler.push_occurrence(&occurrence).await.unwrap();

        fx.reconciler
            .remove_occurrence(&occurrence.slot_ref())
            .await
            .unwrap();

        let page = "27 Oct-02 Nov";
        assert_eq!(fx.surface.cell(page, 6, 3), None);
        assert!(fx.surface.style(page, 6, 3).is_none());
        assert!(fx.surface.style(page, 8, 3).is_none());
    }

    #[tokio::test]
    async fn test_remove_without_page_is_noop() {
        let fx = fixture();
        let occurrence = make_occurrence("a", "2025-10-28", t(9, 0), t(10, 0));
        fx.reconciler
            .remove_occurrence(&occurrence.slot_ref())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_reconcile_all_is_idempotent_and_repairs_drift() {
        let fx = fixture();
        {
            let store = fx.store.lock().unwrap();
            store
                .insert_occurrence(&make_occurrence("a", "2025-10-28", t(9, 0), t(10, 30)))
                .unwrap();
            store
                .insert_occurrence(&make_occurrence("b", "2025-11-04", t(14, 0), t(15, 0)))
                .unwrap();
        }

        let stats = fx.reconciler.reconcile_all().await.unwrap();
        assert_eq!(stats.weeks, 2);
        assert_eq!(stats.pushed, 2);
        assert!(stats.failed_pages.is_empty());

        // Introduce drift by hand, outside the engine.
        let page = fx
            .reconciler
            .dispatcher
            .page_handle("27 Oct-02 Nov")
            .await
            .unwrap()
            .unwrap();
        fx.surface
            .write_ranges(&page, &[("D10".to_string(), vec![vec!["junk".to_string()]])])
            .await
            .unwrap();

        fx.reconciler.reconcile_all().await.unwrap();
        let snapshot_one = fx.surface.snapshot();
        assert_eq!(fx.surface.cell("27 Oct-02 Nov", 10, 4), None);

        fx.reconciler.reconcile_all().await.unwrap();
        let snapshot_two = fx.surface.snapshot();
        assert_eq!(snapshot_one, snapshot_two);
    }

    #[tokio::test]
    async fn test_reconcile_clears_each_week_in_one_call() {
        let fx = fixture();
        {
            let store = fx.store.lock().unwrap();
            store
                .insert_occurrence(&make_occurrence("a", "2025-10-28", t(9, 0), t(10, 0)))
                .unwrap();
            store
                .insert_occurrence(&make_occurrence("a2", "2025-10-29", t(11, 0), t(12, 0)))
                .unwrap();
            store
                .insert_occurrence(&make_occurrence("b", "2025-11-04", t(14, 0), t(15, 0)))
                .unwrap();
        }

        let before = fx.surface.call_count("clear_ranges");
        fx.reconciler.reconcile_all().await.unwrap();
        // Two weeks, one clear call each.
        assert_eq!(fx.surface.call_count("clear_ranges") - before, 2);
    }

    #[tokio::test]
    async fn test_archive_uses_full_date_policy() {
        let fx = fixture();
        let today = d("2025-10-28");
        for date in ["2025-10-06", "2025-10-13", "2025-10-27", "2025-11-03"] {
            fx.reconciler.get_or_create_page(d(date)).await.unwrap();
        }

        let archived = fx
            .reconciler
            .archive_elapsed_weeks_as_of(today)
            .await
            .unwrap();
        assert_eq!(archived, vec!["06-12 Oct".to_string(), "13-19 Oct".to_string()]);
        assert_eq!(fx.surface.archive_names(), archived);

        let live: Vec<String> = fx
            .surface
            .snapshot()
            .into_iter()
            .map(|(name, _, _)| name)
            .collect();
        assert!(live.contains(&DEFAULT_TEMPLATE_PAGE.to_string()));
        assert!(live.contains(&"27 Oct-02 Nov".to_string()));
        assert!(live.contains(&"03-09 Nov".to_string()));
        assert!(!live.contains(&"06-12 Oct".to_string()));
    }

    #[tokio::test]
    async fn test_archive_cap_evicts_oldest() {
        let fx = fixture();
        let reconciler = SheetReconciler::new(
            fx.store.clone(),
            fx.reconciler.surface.clone(),
            fx.reconciler.dispatcher.clone(),
            fx.reconciler.limiter.clone(),
        )
        .with_archive_cap(2);

        let today = d("2025-10-28");
        for date in ["2025-09-15", "2025-09-22", "2025-09-29", "2025-10-06"] {
            reconciler.get_or_create_page(d(date)).await.unwrap();
        }

        let archived = reconciler.archive_elapsed_weeks_as_of(today).await.unwrap();
        assert_eq!(archived.len(), 4);
        // Only the two most recent survive the trim.
        assert_eq!(
            fx.surface.archive_names(),
            vec!["29 Sep-05 Oct".to_string(), "06-12 Oct".to_string()]
        );
    }

    #[tokio::test]
    async fn test_pull_imports_adhoc_cells_once() {
        let fx = fixture();
        let today = d("2025-10-27"); // Monday of the pulled week

        // A pushed occurrence already in the store.
        let gym = Occurrence {
            title: "Gym".to_string(),
            notes: None,
            category: Category::Sport,
            ..make_occurrence("gym", "2025-10-29", t(18, 0), t(19, 0))
        };
        fx.store.lock().unwrap().insert_occurrence(&gym).unwrap();
        fx.reconciler.push_occurrence(&gym).await.unwrap();

        // An ad-hoc cell typed straight into the page: Tuesday 09:00.
        let page = fx
            .reconciler
            .dispatcher
            .page_handle("27 Oct-02 Nov")
            .await
            .unwrap()
            .unwrap();
        fx.surface
            .write_ranges(
                &page,
                &[(
                    "C6".to_string(),
                    vec![vec!["Dentist\nCheckup".to_string()]],
                )],
            )
            .await
            .unwrap();

        let imported = fx
            .reconciler
            .pull_from_page_as_of(d("2025-10-28"), today)
            .await
            .unwrap();
        assert_eq!(imported, 1);

        {
            let store = fx.store.lock().unwrap();
            let day = store.schedulable_on(d("2025-10-28")).unwrap();
            assert_eq!(day.len(), 1);
            assert_eq!(day[0].title, "Dentist");
            assert_eq!(day[0].notes.as_deref(), Some("Checkup"));
            assert_eq!(day[0].start_time, t(9, 0));
            assert_eq!(day[0].end_time, t(9, 30));
            assert!(day[0].master_id.is_none());
        }

        // Pulling again finds everything already represented.
        let imported = fx
            .reconciler
            .pull_from_page_as_of(d("2025-10-28"), today)
            .await
            .unwrap();
        assert_eq!(imported, 0);
    }

    #[tokio::test]
    async fn test_pull_missing_page_errors() {
        let fx = fixture();
        let err = fx
            .reconciler
            .pull_from_page_as_of(d("2025-10-28"), d("2025-10-27"))
            .await
            .unwrap_err();
        assert!(matches!(err, GridCalError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_sync_reminders_projects_pending_column() {
        let fx = fixture();
        let today = d("2025-10-27");
        {
            let store = fx.store.lock().unwrap();
            store
                .insert_reminder(&NewReminder {
                    content: "submit report".to_string(),
                    category: ReminderCategory::Urgent,
                    due_date: Some(d("2025-10-29")),
                    due_time: None,
                    priority: None,
                    created_by: "tests".to_string(),
                })
                .unwrap();
            store
                .insert_reminder(&NewReminder {
                    content: "someday idea".to_string(),
                    category: ReminderCategory::Idea,
                    due_date: None,
                    due_time: None,
                    priority: None,
                    created_by: "tests".to_string(),
                })
                .unwrap();
        }

        let pages = fx.reconciler.sync_reminders_as_of(today).await.unwrap();
        assert_eq!(pages, 1);

        let page = "27 Oct-02 Nov";
        assert_eq!(
            fx.surface.cell(page, 2, REMINDER_COL).as_deref(),
            Some("[P:1] submit report\ndue 29 Oct")
        );
        assert_eq!(
            fx.surface.cell(page, 3, REMINDER_COL).as_deref(),
            Some("[P:5] someday idea")
        );
        let style = fx.surface.style(page, 2, REMINDER_COL).unwrap();
        assert_eq!(style.background, Some(priority_color(1)));
        assert!(style.bold);
    }

    #[tokio::test]
    async fn test_full_sync_reports_steps() {
        let fx = fixture();
        let today = today();
        let date = (today + Duration::days(1)).to_string();
        fx.store
            .lock()
            .unwrap()
            .insert_occurrence(&make_occurrence("a", &date, t(9, 0), t(10, 0)))
            .unwrap();

        let report = fx.reconciler.full_sync(2).await;
        assert_eq!(report.steps.len(), 5);
        assert!(report.all_ok(), "steps: {:?}", report.steps);
        assert_eq!(report.occurrences_pushed, 1);
        assert!(report.weeks_created >= 1);
        assert!(report.orphan_instances.is_empty());
    }
}
