use anyhow::Result;

use gridcal_core::{Category, PushOutcome, RecurrenceKind, Resolution, SeriesTemplate};

use crate::app::App;

use super::{parse_date, parse_tags, parse_time, prompt_resolution, report_push, short_id};

pub struct AddArgs {
    pub title: String,
    pub date: String,
    pub start: String,
    pub end: String,
    pub notes: Option<String>,
    pub category: String,
    pub repeat: String,
    pub tags: Option<String>,
    pub alarm_lead: u32,
    pub no_alarm: bool,
    pub horizon_weeks: Option<u32>,
    pub force: bool,
}

pub async fn run(args: AddArgs) -> Result<()> {
    let app = App::open()?;

    let date = parse_date(&args.date)?;
    let mut start = parse_time(&args.start)?;
    let mut end = parse_time(&args.end)?;
    let category = Category::parse(&args.category)?;
    let kind = RecurrenceKind::parse(&args.repeat)?;

    // Conflicts are a warning, never resolved silently: the user
    // cancels, overrides, or picks a suggested slot.
    let conflicts = app.conflicts.detect_conflicts(date, start, end, None)?;
    if !conflicts.is_empty() && !args.force {
        let duration = (end - start).num_minutes() as u32;
        let (day_start, day_end) = gridcal_core::availability::default_day_bounds();
        let suggestions = app
            .conflicts
            .suggest_alternatives(date, duration, day_start, day_end)?;

        match prompt_resolution(&conflicts, &suggestions)? {
            Resolution::Cancel => {
                app.audit("agenda", "add_cancelled", &args.title);
                println!("Cancelled, nothing was created.");
                return Ok(());
            }
            Resolution::Override => {
                app.audit("agenda", "add_override", &args.title);
            }
            Resolution::UseSuggestion(index) => {
                let pick = &suggestions[index];
                start = pick.start;
                end = pick.end;
                println!(
                    "Using suggested slot {}-{}.",
                    start.format("%H:%M"),
                    end.format("%H:%M")
                );
                app.audit("agenda", "add_alternative", &args.title);
            }
        }
    }

    let template = SeriesTemplate {
        title: args.title.clone(),
        notes: args.notes.clone(),
        start_time: start,
        end_time: end,
        category,
        tags: parse_tags(args.tags.as_deref()),
        alarm_lead_minutes: args.alarm_lead,
        alarm_enabled: !args.no_alarm,
    };

    let horizon = args.horizon_weeks.unwrap_or(app.config.horizon_weeks);
    let created = app.engine.create_series(&template, kind, date, horizon)?;

    // The store write is durable intent; the grid push may degrade.
    let outcome = push_created(&app, &created.instances).await;

    match &created.master {
        Some(master) => {
            app.audit(
                "agenda",
                "add_series",
                &format!("{} ({} instances)", args.title, created.instances.len()),
            );
            println!(
                "Series created: master {} with {} instances ({}).",
                short_id(&master.id),
                created.instances.len(),
                kind.as_str()
            );
        }
        None => {
            app.audit("agenda", "add", &args.title);
            println!(
                "Occurrence created: {} on {}.",
                short_id(&created.instances[0].id),
                date
            );
        }
    }
    report_push(&outcome, "Result");

    if !args.no_alarm {
        println!("Alarms fire while `gridcal watch` is running.");
    }
    Ok(())
}

async fn push_created(app: &App, instances: &[gridcal_core::Occurrence]) -> PushOutcome {
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
    for instance in instances {
        if let Err(e) = reconciler.push_occurrence(instance).await {
            return PushOutcome::degraded(e.to_string());
        }
    }
    PushOutcome::full()
}
