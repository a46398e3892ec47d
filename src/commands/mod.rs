pub mod add;
pub mod delete;
pub mod edit;
pub mod remind;
pub mod sync;
pub mod view;
pub mod watch;

use std::collections::BTreeSet;
use std::io::Write;

use anyhow::{Context, Result, bail};
use chrono::{NaiveDate, NaiveTime};

use gridcal_core::{Occurrence, PushOutcome, Resolution, Suggestion};

pub fn parse_date(s: &str) -> Result<NaiveDate> {
    s.parse::<NaiveDate>()
        .with_context(|| format!("Invalid date '{s}', expected YYYY-MM-DD"))
}

pub fn parse_time(s: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M")
        .with_context(|| format!("Invalid time '{s}', expected HH:MM"))
}

pub fn parse_tags(s: Option<&str>) -> BTreeSet<String> {
    s.map(|raw| {
        raw.split(',')
            .map(|tag| tag.trim().to_string())
            .filter(|tag| !tag.is_empty())
            .collect()
    })
    .unwrap_or_default()
}

/// Short id shown in listings: the first 8 characters.
pub fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

pub fn print_occurrence(occurrence: &Occurrence, series_marker: &str) {
    println!(
        "  {} {}-{}  {}{}",
        occurrence.date,
        occurrence.start_time.format("%H:%M"),
        occurrence.end_time.format("%H:%M"),
        occurrence.title,
        series_marker,
    );
    println!(
        "      id: {}  [{}]",
        short_id(&occurrence.id),
        occurrence.category.as_str()
    );
    if let Some(notes) = occurrence.notes.as_deref().filter(|n| !n.is_empty()) {
        println!("      {notes}");
    }
}

/// Report the two halves of a store-then-push operation distinctly:
/// the durable write may succeed while the projection does not.
pub fn report_push(outcome: &PushOutcome, what: &str) {
    if outcome.surface_ok {
        println!("{what}: stored and pushed to the grid.");
    } else if let Some(error) = &outcome.error {
        println!("{what}: stored. Grid update failed: {error}");
        println!("Run `gridcal sync` once the surface is reachable.");
    } else {
        println!("{what}: stored (no surface configured).");
    }
}

/// Interactive conflict resolution: show the overlaps and the
/// alternatives, then let the user cancel, override, or pick a slot.
pub fn prompt_resolution(
    conflicts: &[Occurrence],
    suggestions: &[Suggestion],
) -> Result<Resolution> {
    println!("Schedule conflict detected:");
    for (index, occurrence) in conflicts.iter().enumerate() {
        println!(
            "  {}. {}-{}  {}",
            index + 1,
            occurrence.start_time.format("%H:%M"),
            occurrence.end_time.format("%H:%M"),
            occurrence.title
        );
    }

    if suggestions.is_empty() {
        println!("No free slots of that length are left on this day.");
    } else {
        println!("Alternative slots:");
        for (index, suggestion) in suggestions.iter().enumerate() {
            println!(
                "  [{}] {}-{}  ({})",
                index + 1,
                suggestion.start.format("%H:%M"),
                suggestion.end.format("%H:%M"),
                suggestion.rationale
            );
        }
    }
    println!("[o] book anyway (overlap)  [c] cancel");

    loop {
        print!("> ");
        std::io::stdout().flush().ok();
        let mut line = String::new();
        if std::io::stdin().read_line(&mut line)? == 0 {
            return Ok(Resolution::Cancel);
        }
        match line.trim().to_lowercase().as_str() {
            "o" => return Ok(Resolution::Override),
            "c" => return Ok(Resolution::Cancel),
            choice => {
                if let Ok(number) = choice.parse::<usize>() {
                    if number >= 1 && number <= suggestions.len() {
                        return Ok(Resolution::UseSuggestion(number - 1));
                    }
                }
                println!("Enter 'o', 'c', or a suggestion number.");
            }
        }
    }
}

pub fn confirm(question: &str) -> Result<bool> {
    print!("{question} [y/N]: ");
    std::io::stdout().flush().ok();
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    Ok(matches!(line.trim().to_lowercase().as_str(), "y" | "yes"))
}

pub fn require_some<T>(value: Option<T>, what: &str) -> Result<T> {
    match value {
        Some(value) => Ok(value),
        None => bail!("{what} not found"),
    }
}
