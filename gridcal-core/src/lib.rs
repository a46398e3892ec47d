//! Scheduling and synchronization engine for gridcal.
//!
//! This crate owns everything with real algorithmic content:
//! - the occurrence/reminder data model and its SQLite store
//! - recurring series (master + instances) with scoped edits/deletes
//! - conflict detection and free-block computation
//! - the rate-limited, batched reconciliation of weekly grid pages
//! - one-shot alarm timers
//!
//! The CLI and the spreadsheet provider crate sit on top of it.

pub mod alarm;
pub mod audit;
pub mod availability;
pub mod batch;
pub mod conflict;
pub mod error;
pub mod grid;
pub mod memory;
pub mod occurrence;
pub mod rate_limit;
pub mod reconcile;
pub mod recurrence;
pub mod reminder;
pub mod store;
pub mod surface;

pub use alarm::{AlarmScheduler, Notifier};
pub use audit::AuditEntry;
pub use availability::{AvailabilityFinder, DailySummary, FreeBlock};
pub use batch::{BatchDispatcher, CellWrite, PageOutcome, RangeClear, RangeFormat};
pub use conflict::{ConflictResolver, Resolution, Suggestion};
pub use error::{GridCalError, GridCalResult};
pub use occurrence::{Category, Occurrence, OccurrencePatch, RecurrenceKind, SeriesInfo, SlotRef};
pub use rate_limit::{RateLimiter, RateLimiterStats};
pub use reconcile::{FullSyncReport, PushOutcome, ReconcileStats, SheetReconciler};
pub use recurrence::{CreatedSeries, RecurrenceEngine, SeriesTemplate};
pub use reminder::{NewReminder, Reminder, ReminderCategory, ReminderStatus};
pub use store::{SharedStore, Store, shared};
pub use surface::{BorderStyle, CellStyle, PageHandle, Rgb, Surface};
