use anyhow::{Result, bail};

use gridcal_core::{Category, OccurrencePatch, PushOutcome};

use crate::app::App;

use super::{parse_date, parse_tags, parse_time, report_push, require_some, short_id};

pub struct EditArgs {
    pub id: String,
    pub title: Option<String>,
    pub notes: Option<String>,
    pub date: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub category: Option<String>,
    pub tags: Option<String>,
    pub alarm_lead: Option<u32>,
    pub series: bool,
}

pub async fn run(args: EditArgs) -> Result<()> {
    let app = App::open()?;

    let patch = build_patch(&args)?;
    if patch.is_empty() {
        bail!("Nothing to change; pass at least one field flag (see `gridcal edit --help`)");
    }

    let existing = {
        let store = app.store.lock().expect("store lock poisoned");
        require_some(store.find_occurrence(&args.id)?, "Occurrence")?
    };
    let old_slot = existing.slot_ref();

    if args.series {
        // Resolve the master whichever end of the series was named.
        let master_id = if existing.is_master {
            existing.id.clone()
        } else {
            require_some(existing.master_id.clone(), "Series master")?
        };
        let (master, updated) = app.engine.edit_series(&master_id, &patch)?;
        app.audit(
            "agenda",
            "edit_series",
            &format!("{} ({updated} instances)", master.title),
        );
        println!(
            "Series {} updated: master and {updated} instances (detached ones kept).",
            short_id(&master.id)
        );

        let outcome = resync(&app).await;
        report_push(&outcome, "Result");
        return Ok(());
    }

    let edited = app.engine.edit_instance(&existing.id, &patch)?;
    app.audit("agenda", "edit", &edited.title);
    println!(
        "Occurrence {} updated{}.",
        short_id(&edited.id),
        if edited.master_id.is_some() {
            " (detached from its series)"
        } else {
            ""
        }
    );

    let outcome = repaint(&app, &old_slot, &edited).await;
    report_push(&outcome, "Result");
    Ok(())
}

fn build_patch(args: &EditArgs) -> Result<OccurrencePatch> {
    Ok(OccurrencePatch {
        title: args.title.clone(),
        notes: args.notes.clone().map(Some),
        date: args.date.as_deref().map(parse_date).transpose()?,
        start_time: args.start.as_deref().map(parse_time).transpose()?,
        end_time: args.end.as_deref().map(parse_time).transpose()?,
        category: args.category.as_deref().map(Category::parse).transpose()?,
        tags: args.tags.as_deref().map(|t| parse_tags(Some(t))),
        alarm_lead_minutes: args.alarm_lead,
        alarm_enabled: None,
    })
}

async fn repaint(
    app: &App,
    old: &gridcal_core::SlotRef,
    new: &gridcal_core::Occurrence,
) -> PushOutcome {
    if !app.surface_configured() {
        return PushOutcome {
            store_ok: true,
            surface_ok: false,
            error: None,
        };
    }
    match app.reconciler() {
        Ok(reconciler) => match reconciler.update_occurrence(old, new).await {
            Ok(()) => PushOutcome::full(),
            Err(e) => PushOutcome::degraded(e.to_string()),
        },
        Err(e) => PushOutcome::degraded(e.to_string()),
    }
}

/// Series edits touch many blocks at once; a reconcile pass repaints
/// the affected weeks wholesale.
async fn resync(app: &App) -> PushOutcome {
    if !app.surface_configured() {
        return PushOutcome {
            store_ok: true,
            surface_ok: false,
            error: None,
        };
    }
    match app.reconciler() {
        Ok(reconciler) => match reconciler.reconcile_all().await {
            Ok(stats) if stats.failed_pages.is_empty() => PushOutcome::full(),
            Ok(stats) => {
                PushOutcome::degraded(format!("pages failed: {}", stats.failed_pages.join(", ")))
            }
            Err(e) => PushOutcome::degraded(e.to_string()),
        },
        Err(e) => PushOutcome::degraded(e.to_string()),
    }
}
