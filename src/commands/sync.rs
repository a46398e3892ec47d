use anyhow::Result;
use chrono::Local;

use crate::app::App;

use super::parse_date;

/// The five-step repair path: future weeks, occurrences, reminders,
/// archive, integrity.
pub async fn full_sync() -> Result<()> {
    let app = App::open()?;
    let reconciler = app.reconciler()?;

    println!("Running full sync...");
    let report = reconciler.full_sync(app.config.future_weeks).await;

    for step in &report.steps {
        let mark = if step.ok { "ok " } else { "FAIL" };
        println!("  [{mark}] {:12} {}", step.step, step.detail);
    }
    if !report.archived.is_empty() {
        println!("  archived: {}", report.archived.join(", "));
    }
    if !report.orphan_instances.is_empty() {
        println!(
            "  orphan instances (master gone): {}",
            report.orphan_instances.join(", ")
        );
    }

    app.audit(
        "agenda",
        "full_sync",
        &format!(
            "{}/{} steps ok",
            report.steps.iter().filter(|s| s.ok).count(),
            report.steps.len()
        ),
    );

    if report.all_ok() {
        println!("Sync complete.");
    } else {
        println!("Sync finished with failures; the store is authoritative, re-run later.");
    }
    Ok(())
}

pub async fn import(date: Option<&str>) -> Result<()> {
    let app = App::open()?;
    let reconciler = app.reconciler()?;
    let date = match date {
        Some(date) => parse_date(date)?,
        None => Local::now().date_naive(),
    };

    let imported = reconciler.pull_from_page(date).await?;
    app.audit("agenda", "import", &format!("{imported} from week page"));
    println!("Imported {imported} new occurrences from the week page.");
    Ok(())
}

pub async fn archive() -> Result<()> {
    let app = App::open()?;
    let reconciler = app.reconciler()?;

    let archived = reconciler.archive_elapsed_weeks().await?;
    if archived.is_empty() {
        println!("No elapsed week pages to archive.");
    } else {
        app.audit("agenda", "archive", &archived.join(", "));
        println!("Archived: {}", archived.join(", "));
    }
    Ok(())
}

pub async fn ensure_weeks(n: u32) -> Result<()> {
    let app = App::open()?;
    let reconciler = app.reconciler()?;

    let created = reconciler.ensure_future_weeks(n).await?;
    app.audit("agenda", "ensure_weeks", &format!("{created} created"));
    println!("{created} new week pages created ({n} checked).");
    Ok(())
}
