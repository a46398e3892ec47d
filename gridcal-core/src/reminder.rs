//! Reminders: non-time-blocking tasks and notes.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{GridCalError, GridCalResult};

/// Reminder category; determines the default priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReminderCategory {
    Urgent,
    Important,
    Task,
    Note,
    Idea,
}

impl ReminderCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            ReminderCategory::Urgent => "urgent",
            ReminderCategory::Important => "important",
            ReminderCategory::Task => "task",
            ReminderCategory::Note => "note",
            ReminderCategory::Idea => "idea",
        }
    }

    pub fn parse(s: &str) -> GridCalResult<Self> {
        match s {
            "urgent" => Ok(ReminderCategory::Urgent),
            "important" => Ok(ReminderCategory::Important),
            "task" => Ok(ReminderCategory::Task),
            "note" => Ok(ReminderCategory::Note),
            "idea" => Ok(ReminderCategory::Idea),
            other => Err(GridCalError::Validation(format!(
                "Unknown reminder category '{other}'. Use: urgent, important, task, note, idea"
            ))),
        }
    }

    /// 1 = highest .. 5 = lowest.
    pub fn default_priority(self) -> u8 {
        match self {
            ReminderCategory::Urgent => 1,
            ReminderCategory::Important => 2,
            ReminderCategory::Task => 3,
            ReminderCategory::Note | ReminderCategory::Idea => 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReminderStatus {
    Pending,
    Completed,
    Cancelled,
}

impl ReminderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ReminderStatus::Pending => "pending",
            ReminderStatus::Completed => "completed",
            ReminderStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> GridCalResult<Self> {
        match s {
            "pending" => Ok(ReminderStatus::Pending),
            "completed" => Ok(ReminderStatus::Completed),
            "cancelled" => Ok(ReminderStatus::Cancelled),
            other => Err(GridCalError::Validation(format!(
                "Unknown reminder status '{other}'"
            ))),
        }
    }

    /// pending -> completed|cancelled only; completed/cancelled are terminal.
    pub fn can_transition_to(self, next: ReminderStatus) -> bool {
        self == ReminderStatus::Pending && next != ReminderStatus::Pending
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reminder {
    pub id: i64,
    pub content: String,
    pub category: ReminderCategory,
    pub due_date: Option<NaiveDate>,
    pub due_time: Option<NaiveTime>,
    /// 1 = highest .. 5 = lowest, defaulted by category.
    pub priority: u8,
    pub status: ReminderStatus,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a reminder; id and creation time are assigned by
/// the store.
#[derive(Debug, Clone)]
pub struct NewReminder {
    pub content: String,
    pub category: ReminderCategory,
    pub due_date: Option<NaiveDate>,
    pub due_time: Option<NaiveTime>,
    pub priority: Option<u8>,
    pub created_by: String,
}

impl NewReminder {
    pub fn validate(&self) -> GridCalResult<()> {
        if self.content.trim().is_empty() {
            return Err(GridCalError::Validation(
                "Reminder content cannot be empty".into(),
            ));
        }
        if let Some(p) = self.priority {
            if !(1..=5).contains(&p) {
                return Err(GridCalError::Validation(format!(
                    "Priority {p} out of range 1..=5"
                )));
            }
        }
        Ok(())
    }

    pub fn effective_priority(&self) -> u8 {
        self.priority.unwrap_or(self.category.default_priority())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_priority_by_category() {
        assert_eq!(ReminderCategory::Urgent.default_priority(), 1);
        assert_eq!(ReminderCategory::Important.default_priority(), 2);
        assert_eq!(ReminderCategory::Task.default_priority(), 3);
        assert_eq!(ReminderCategory::Note.default_priority(), 5);
        assert_eq!(ReminderCategory::Idea.default_priority(), 5);
    }

    #[test]
    fn test_status_transitions_are_terminal() {
        use ReminderStatus::*;
        assert!(Pending.can_transition_to(Completed));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(!Completed.can_transition_to(Pending));
        assert!(!Completed.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Completed));
    }

    #[test]
    fn test_new_reminder_validation() {
        let mut new = NewReminder {
            content: "buy milk".into(),
            category: ReminderCategory::Task,
            due_date: None,
            due_time: None,
            priority: None,
            created_by: "tests".into(),
        };
        assert!(new.validate().is_ok());
        assert_eq!(new.effective_priority(), 3);

        new.priority = Some(9);
        assert!(new.validate().is_err());

        new.priority = None;
        new.content = "   ".into();
        assert!(new.validate().is_err());
    }
}
