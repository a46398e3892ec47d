//! One-shot alarm timers per occurrence.
//!
//! Each armed alarm is an independent background task that sleeps
//! until (start - lead) and then re-checks the store: the occurrence
//! may have been edited or deleted since arming, in which case the
//! notification is dropped. At most one timer per occurrence id;
//! re-arming replaces the pending one. Cancellation is best-effort:
//! a timer already in its callback cannot be aborted mid-flight.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{Duration, Local, NaiveDateTime};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{GridCalError, GridCalResult};
use crate::occurrence::Occurrence;
use crate::store::SharedStore;

/// The notification sink invoked when an alarm fires. Implementations
/// must tolerate concurrent invocation.
pub trait Notifier: Send + Sync {
    fn notify(&self, occurrence: &Occurrence);
}

struct Inner {
    store: SharedStore,
    notifier: Arc<dyn Notifier>,
    timers: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl Inner {
    fn lock_timers(&self) -> std::sync::MutexGuard<'_, HashMap<String, JoinHandle<()>>> {
        self.timers.lock().expect("alarm timer map lock poisoned")
    }
}

pub struct AlarmScheduler {
    inner: Arc<Inner>,
}

impl AlarmScheduler {
    pub fn new(store: SharedStore, notifier: Arc<dyn Notifier>) -> Self {
        AlarmScheduler {
            inner: Arc::new(Inner {
                store,
                notifier,
                timers: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Arm a one-shot timer at (start - lead). Returns false (a
    /// no-op, not an error) when that moment is already past.
    pub fn arm(&self, occurrence_id: &str, lead_minutes: u32) -> GridCalResult<bool> {
        let occurrence = {
            let store = self.inner.store.lock().expect("store lock poisoned");
            store
                .get_occurrence(occurrence_id)?
                .ok_or_else(|| GridCalError::NotFound(format!("Occurrence {occurrence_id}")))?
        };

        let fire_at: NaiveDateTime = occurrence.date.and_time(occurrence.start_time)
            - Duration::minutes(lead_minutes as i64);
        let now = Local::now().naive_local();
        let delay = fire_at - now;
        if delay <= Duration::zero() {
            debug!(id = occurrence_id, "alarm time already past, skipping");
            return Ok(false);
        }
        let delay = delay.to_std().unwrap_or_default();

        let inner = Arc::clone(&self.inner);
        let id = occurrence_id.to_string();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            // The entry is no longer pending whatever happens next.
            inner.lock_timers().remove(&id);

            let occurrence = {
                let store = inner.store.lock().expect("store lock poisoned");
                store.get_occurrence(&id)
            };
            match occurrence {
                Ok(Some(occurrence)) => {
                    info!(id = %occurrence.id, title = %occurrence.title, "alarm fired");
                    inner.notifier.notify(&occurrence);
                }
                Ok(None) => debug!(id, "alarmed occurrence no longer exists"),
                Err(e) => warn!(id, error = %e, "alarm lookup failed"),
            }
        });

        // Re-arming replaces any previous timer for this id.
        if let Some(old) = self.inner.lock_timers().insert(occurrence_id.to_string(), handle) {
            old.abort();
        }
        info!(id = occurrence_id, fire_at = %fire_at, "alarm armed");
        Ok(true)
    }

    /// Arm using the occurrence's own alarm configuration; skips
    /// disabled alarms and dates already elapsed.
    pub fn arm_for_occurrence(&self, occurrence: &Occurrence) -> GridCalResult<bool> {
        if !occurrence.alarm_enabled || occurrence.is_master {
            return Ok(false);
        }
        if occurrence.date < Local::now().date_naive() {
            return Ok(false);
        }
        self.arm(&occurrence.id, occurrence.alarm_lead_minutes)
    }

    /// Cancel a pending timer; false when none was pending.
    pub fn cancel(&self, occurrence_id: &str) -> bool {
        match self.inner.lock_timers().remove(occurrence_id) {
            Some(handle) => {
                handle.abort();
                debug!(id = occurrence_id, "alarm cancelled");
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&self) {
        let mut timers = self.inner.lock_timers();
        for (_, handle) in timers.drain() {
            handle.abort();
        }
    }

    pub fn is_armed(&self, occurrence_id: &str) -> bool {
        self.inner.lock_timers().contains_key(occurrence_id)
    }

    pub fn pending(&self) -> usize {
        self.inner.lock_timers().len()
    }
}
