use anyhow::Result;

use gridcal_core::{NewReminder, ReminderCategory, ReminderStatus};

use crate::app::App;

use super::{parse_date, parse_time};

pub fn add(
    content: &str,
    category: &str,
    due: Option<&str>,
    at: Option<&str>,
    priority: Option<u8>,
) -> Result<()> {
    let app = App::open()?;
    let new = NewReminder {
        content: content.to_string(),
        category: ReminderCategory::parse(category)?,
        due_date: due.map(parse_date).transpose()?,
        due_time: at.map(parse_time).transpose()?,
        priority,
        created_by: app.actor.clone(),
    };

    let reminder = {
        let store = app.store.lock().expect("store lock poisoned");
        store.insert_reminder(&new)?
    };
    app.audit("reminders", "add", content);
    println!(
        "Reminder #{} saved ({}, priority {}).",
        reminder.id,
        reminder.category.as_str(),
        reminder.priority
    );
    if reminder.due_date.is_some() {
        println!("It will appear on its week page at the next `gridcal sync`.");
    }
    Ok(())
}

pub fn list(all: bool) -> Result<()> {
    let app = App::open()?;
    let reminders = {
        let store = app.store.lock().expect("store lock poisoned");
        if all {
            store.list_reminders(None)?
        } else {
            store.pending_reminders()?
        }
    };

    if reminders.is_empty() {
        println!("No reminders.");
        return Ok(());
    }
    for reminder in &reminders {
        let due = match (reminder.due_date, reminder.due_time) {
            (Some(date), Some(time)) => format!("  due {date} {}", time.format("%H:%M")),
            (Some(date), None) => format!("  due {date}"),
            _ => String::new(),
        };
        println!(
            "  #{:<4} [P{}] [{}] {}{}{}",
            reminder.id,
            reminder.priority,
            reminder.category.as_str(),
            reminder.content,
            due,
            if reminder.status == ReminderStatus::Pending {
                String::new()
            } else {
                format!("  ({})", reminder.status.as_str())
            }
        );
    }
    Ok(())
}

pub fn done(id: i64) -> Result<()> {
    set_status(id, ReminderStatus::Completed, "completed")
}

pub fn cancel(id: i64) -> Result<()> {
    set_status(id, ReminderStatus::Cancelled, "cancelled")
}

fn set_status(id: i64, status: ReminderStatus, verb: &str) -> Result<()> {
    let app = App::open()?;
    let reminder = {
        let store = app.store.lock().expect("store lock poisoned");
        store.set_reminder_status(id, status)?
    };
    app.audit("reminders", verb, &reminder.content);
    println!("Reminder #{id} {verb}.");
    Ok(())
}

pub fn remove(id: i64) -> Result<()> {
    let app = App::open()?;
    let removed = {
        let store = app.store.lock().expect("store lock poisoned");
        store.delete_reminder(id)?
    };
    if removed {
        app.audit("reminders", "remove", &format!("#{id}"));
        println!("Reminder #{id} deleted.");
    } else {
        println!("No reminder #{id}.");
    }
    Ok(())
}
