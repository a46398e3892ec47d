use anyhow::Result;
use chrono::{Datelike, Duration, Local, NaiveDate};

use gridcal_core::grid::monday_of;

use crate::app::App;

use super::{parse_date, parse_time, print_occurrence, require_some, short_id};

pub fn list(span: &str, date: Option<&str>) -> Result<()> {
    let app = App::open()?;
    let anchor = match date {
        Some(date) => parse_date(date)?,
        None => Local::now().date_naive(),
    };

    let (from, to) = match span {
        "day" => (anchor, anchor),
        "week" => {
            let monday = monday_of(anchor);
            (monday, monday + Duration::days(6))
        }
        "month" => {
            let first = anchor.with_day(1).unwrap_or(anchor);
            let next = first
                .checked_add_months(chrono::Months::new(1))
                .unwrap_or(first);
            (first, next - Duration::days(1))
        }
        other => anyhow::bail!("Unknown span '{other}', expected day, week or month"),
    };

    let occurrences = {
        let store = app.store.lock().expect("store lock poisoned");
        store.list_range(from, to)?
    };

    if occurrences.is_empty() {
        println!("No occurrences between {from} and {to}.");
        return Ok(());
    }

    println!("Occurrences {from} to {to}:");
    let mut current: Option<NaiveDate> = None;
    for occurrence in &occurrences {
        if current != Some(occurrence.date) {
            current = Some(occurrence.date);
            println!("{}", occurrence.date.format("%A %d %b"));
        }
        let marker = series_marker(&app, &occurrence.id)?;
        print_occurrence(occurrence, &marker);
    }
    Ok(())
}

fn series_marker(app: &App, id: &str) -> Result<String> {
    Ok(match app.engine.series_info(id)? {
        Some(info) if info.is_series && info.manually_modified => " [series*]".to_string(),
        Some(info) if info.is_series => format!(" [series: {}]", info.recurrence.as_str()),
        _ => String::new(),
    })
}

pub fn search(text: &str) -> Result<()> {
    let app = App::open()?;
    let matches = {
        let store = app.store.lock().expect("store lock poisoned");
        store.search(text)?
    };
    if matches.is_empty() {
        println!("No occurrences match '{text}'.");
        return Ok(());
    }
    println!("Matches for '{text}':");
    for occurrence in &matches {
        print_occurrence(occurrence, "");
    }
    Ok(())
}

pub fn free(date: &str, min_minutes: u32, day_start: &str, day_end: &str) -> Result<()> {
    let app = App::open()?;
    let date = parse_date(date)?;
    let blocks = app.availability.free_blocks(
        date,
        min_minutes,
        parse_time(day_start)?,
        parse_time(day_end)?,
    )?;

    if blocks.is_empty() {
        println!("No free blocks of at least {min_minutes} minutes on {date}.");
        return Ok(());
    }
    println!("Free blocks on {date}:");
    for block in &blocks {
        println!(
            "  {}-{}  ({} min)",
            block.start.format("%H:%M"),
            block.end.format("%H:%M"),
            block.minutes
        );
    }
    Ok(())
}

pub fn suggest(date: &str, duration: u32) -> Result<()> {
    let app = App::open()?;
    let date = parse_date(date)?;
    let (day_start, day_end) = gridcal_core::availability::default_day_bounds();
    let suggestions = app
        .conflicts
        .suggest_alternatives(date, duration, day_start, day_end)?;

    if suggestions.is_empty() {
        println!("No {duration}-minute slot is free on {date}.");
        return Ok(());
    }
    println!("Slots for {duration} minutes on {date}:");
    for (index, suggestion) in suggestions.iter().enumerate() {
        println!(
            "  [{}] {}-{}  ({})",
            index + 1,
            suggestion.start.format("%H:%M"),
            suggestion.end.format("%H:%M"),
            suggestion.rationale
        );
    }
    Ok(())
}

pub fn summary(date: &str) -> Result<()> {
    let app = App::open()?;
    let date = parse_date(date)?;
    let summary = app.availability.daily_summary(date)?;
    println!(
        "{date}: {:.1}h free across {} blocks, largest {} min{}",
        summary.free_minutes as f64 / 60.0,
        summary.block_count,
        summary.largest_block_minutes,
        summary
            .largest_block
            .map(|(start, end)| format!(
                " ({}-{})",
                start.format("%H:%M"),
                end.format("%H:%M")
            ))
            .unwrap_or_default()
    );
    Ok(())
}

pub fn info(id: &str) -> Result<()> {
    let app = App::open()?;
    let occurrence = {
        let store = app.store.lock().expect("store lock poisoned");
        require_some(store.find_occurrence(id)?, "Occurrence")?
    };
    let info = require_some(app.engine.series_info(&occurrence.id)?, "Occurrence")?;

    println!("{} ({})", occurrence.title, short_id(&occurrence.id));
    if !info.is_series {
        println!("  standalone occurrence, no series");
        return Ok(());
    }
    println!(
        "  {} series, {}",
        info.recurrence.as_str(),
        if info.is_master { "master" } else { "instance" }
    );
    if let Some(master_id) = &info.master_id {
        println!("  master: {}", short_id(master_id));
    }
    println!(
        "  instances: {} total, {} upcoming",
        info.total_instances, info.future_instances
    );
    if info.manually_modified {
        println!("  detached: series-wide edits skip this instance");
    }
    Ok(())
}

pub fn audit_log(limit: usize) -> Result<()> {
    let app = App::open()?;
    let entries = {
        let store = app.store.lock().expect("store lock poisoned");
        store.recent_audit(limit)?
    };
    if entries.is_empty() {
        println!("Audit log is empty.");
        return Ok(());
    }
    for entry in &entries {
        println!(
            "[{}] [{}] {} {} ({})",
            entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
            entry.module,
            entry.action,
            entry.description,
            entry.actor
        );
    }
    Ok(())
}
