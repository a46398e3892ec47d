use std::sync::Arc;

use anyhow::Result;
use chrono::{Duration, Local};
use tracing::info;

use gridcal_core::{AlarmScheduler, Notifier, Occurrence};

use crate::app::App;

/// Prints alarms to the terminal; stands in for OS notifications.
struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, occurrence: &Occurrence) {
        println!(
            "\x07ALARM: {} at {} ({})",
            occurrence.title,
            occurrence.start_time.format("%H:%M"),
            occurrence.date
        );
    }
}

/// Arm alarms for every upcoming occurrence and stay in the
/// foreground until interrupted. Timers fire as independent tasks.
pub async fn run(days: u32) -> Result<()> {
    let app = App::open()?;
    let scheduler = AlarmScheduler::new(app.store.clone(), Arc::new(ConsoleNotifier));

    let today = Local::now().date_naive();
    let until = today + Duration::days(days as i64);
    let upcoming = {
        let store = app.store.lock().expect("store lock poisoned");
        store.list_range(today, until)?
    };

    let mut armed = 0;
    for occurrence in &upcoming {
        if scheduler.arm_for_occurrence(occurrence)? {
            armed += 1;
        }
    }

    info!(armed, days, "watch started");
    println!("{armed} alarms armed for the next {days} days. Ctrl-C to stop.");
    tokio::signal::ctrl_c().await?;

    scheduler.cancel_all();
    println!("\nStopped.");
    Ok(())
}
