use anyhow::{Result, bail};

use gridcal_core::PushOutcome;

use crate::app::App;

use super::{confirm, report_push, require_some, short_id};

pub async fn run(id: &str, future: bool, series: bool, yes: bool) -> Result<()> {
    let app = App::open()?;

    let existing = {
        let store = app.store.lock().expect("store lock poisoned");
        require_some(store.find_occurrence(id)?, "Occurrence")?
    };
    let slot = existing.slot_ref();
    let info = require_some(app.engine.series_info(&existing.id)?, "Occurrence")?;

    if (future || series) && !info.is_series {
        bail!("Occurrence {} is not part of a series", short_id(&existing.id));
    }

    if info.is_series && !future && !series {
        if existing.is_master {
            bail!(
                "{} is a series master; pass --series to delete the whole series \
                 or --future to drop upcoming instances",
                short_id(&existing.id)
            );
        }
        // Plain delete of a series member takes just that instance.
        if !yes
            && !confirm(&format!(
                "'{}' belongs to a {} series ({} instances). Delete only this instance?",
                existing.title,
                info.recurrence.as_str(),
                info.total_instances
            ))?
        {
            println!("Cancelled.");
            return Ok(());
        }
    } else if !yes && !confirm(&format!("Delete '{}'?", existing.title))? {
        println!("Cancelled.");
        return Ok(());
    }

    if future || series {
        let master_id = if existing.is_master {
            existing.id.clone()
        } else {
            require_some(existing.master_id.clone(), "Series master")?
        };

        // Capture the blocks to clear before the records disappear.
        let today = chrono::Local::now().date_naive();
        let doomed_slots: Vec<gridcal_core::SlotRef> = {
            let store = app.store.lock().expect("store lock poisoned");
            store
                .instances_of(&master_id)?
                .iter()
                .filter(|i| series || i.date >= today)
                .map(|i| i.slot_ref())
                .collect()
        };

        let removed = app.engine.delete_series(&master_id, series)?;
        let action = if series { "delete_series" } else { "delete_future" };
        app.audit("agenda", action, &format!("{} ({removed} instances)", existing.title));
        if series {
            println!("Series deleted: master and {removed} instances removed.");
        } else {
            println!("{removed} future instances removed; master and past instances kept.");
        }

        let outcome = clear_slots(&app, &doomed_slots).await;
        report_push(&outcome, "Result");
        return Ok(());
    }

    if !app.engine.delete_instance(&existing.id)? {
        bail!("Occurrence {} disappeared mid-delete", short_id(&existing.id));
    }
    app.audit("agenda", "delete", &existing.title);
    println!("Occurrence '{}' deleted.", existing.title);

    // The store record is gone; the slot reference still locates the
    // block to clear.
    let outcome = clear_slot(&app, &slot).await;
    report_push(&outcome, "Result");
    Ok(())
}

async fn clear_slot(app: &App, slot: &gridcal_core::SlotRef) -> PushOutcome {
    if !app.surface_configured() {
        return PushOutcome {
            store_ok: true,
            surface_ok: false,
            error: None,
        };
    }
    match app.reconciler() {
        Ok(reconciler) => match reconciler.remove_occurrence(slot).await {
            Ok(()) => PushOutcome::full(),
            Err(e) => PushOutcome::degraded(e.to_string()),
        },
        Err(e) => PushOutcome::degraded(e.to_string()),
    }
}

async fn clear_slots(app: &App, slots: &[gridcal_core::SlotRef]) -> PushOutcome {
    if !app.surface_configured() {
        return PushOutcome {
            store_ok: true,
            surface_ok: false,
            error: None,
        };
    }
    let reconciler = match app.reconciler() {
        Ok(reconciler) => reconciler,
        Err(e) => return PushOutcome::degraded(e.to_string()),
    };
    for slot in slots {
        if let Err(e) = reconciler.remove_occurrence(slot).await {
            return PushOutcome::degraded(e.to_string());
        }
    }
    PushOutcome::full()
}
