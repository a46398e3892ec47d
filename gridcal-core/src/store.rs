//! SQLite persistence for occurrences, reminders and the audit log.
//!
//! The store is the sole owner of scheduling data; the external grid
//! only ever holds a projection of it. Schema changes are additive
//! (new nullable columns with defaults, guarded by `PRAGMA
//! table_info`) so upgrades never lose data.

use std::collections::BTreeSet;
use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rusqlite::{Connection, Row, params};
use tracing::info;

use crate::audit::AuditEntry;
use crate::error::{GridCalError, GridCalResult};
use crate::occurrence::{Category, Occurrence, RecurrenceKind};
use crate::reminder::{NewReminder, Reminder, ReminderCategory, ReminderStatus};

const OCCURRENCE_COLS: &str = "id, title, notes, date, start_time, end_time, category, tags, \
     recurrence, is_master, master_id, manually_modified, alarm_lead_minutes, alarm_enabled, \
     created_at, updated_at";

const REMINDER_COLS: &str =
    "id, content, category, due_date, due_time, priority, status, created_by, created_at";

/// The store behind the mutex shared by engine components. The lock is
/// only ever held for the duration of a query, never across awaits.
pub type SharedStore = std::sync::Arc<std::sync::Mutex<Store>>;

/// Wrap a store for shared use by the engine components.
pub fn shared(store: Store) -> SharedStore {
    std::sync::Arc::new(std::sync::Mutex::new(store))
}

pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> GridCalResult<Self> {
        let conn = Connection::open(path)?;
        let store = Store { conn };
        store.init_schema()?;
        store.migrate()?;
        Ok(store)
    }

    /// In-memory store for tests.
    pub fn in_memory() -> GridCalResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Store { conn };
        store.init_schema()?;
        store.migrate()?;
        Ok(store)
    }

    fn init_schema(&self) -> GridCalResult<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS occurrences (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                notes TEXT,
                date TEXT NOT NULL,
                start_time TEXT NOT NULL,
                end_time TEXT NOT NULL,
                category TEXT NOT NULL DEFAULT 'personal',
                tags TEXT NOT NULL DEFAULT '[]',
                recurrence TEXT NOT NULL DEFAULT 'none',
                is_master INTEGER NOT NULL DEFAULT 0,
                master_id TEXT,
                manually_modified INTEGER NOT NULL DEFAULT 0,
                alarm_lead_minutes INTEGER NOT NULL DEFAULT 5,
                alarm_enabled INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_occurrences_date ON occurrences(date);
            CREATE INDEX IF NOT EXISTS idx_occurrences_master ON occurrences(master_id);

            CREATE TABLE IF NOT EXISTS reminders (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                content TEXT NOT NULL,
                category TEXT NOT NULL DEFAULT 'note',
                due_date TEXT,
                due_time TEXT,
                priority INTEGER NOT NULL DEFAULT 5,
                status TEXT NOT NULL DEFAULT 'pending',
                created_by TEXT NOT NULL DEFAULT 'system',
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                module TEXT NOT NULL,
                action TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                actor TEXT NOT NULL,
                timestamp TEXT NOT NULL
            );",
        )?;
        Ok(())
    }

    /// Additive migrations for databases created before the series and
    /// alarm columns existed.
    fn migrate(&self) -> GridCalResult<()> {
        self.ensure_columns(
            "occurrences",
            &[
                ("category", "TEXT NOT NULL DEFAULT 'personal'"),
                ("recurrence", "TEXT NOT NULL DEFAULT 'none'"),
                ("is_master", "INTEGER NOT NULL DEFAULT 0"),
                ("master_id", "TEXT"),
                ("manually_modified", "INTEGER NOT NULL DEFAULT 0"),
                ("alarm_lead_minutes", "INTEGER NOT NULL DEFAULT 5"),
                ("alarm_enabled", "INTEGER NOT NULL DEFAULT 1"),
            ],
        )?;
        self.ensure_columns(
            "reminders",
            &[
                ("due_date", "TEXT"),
                ("due_time", "TEXT"),
                ("priority", "INTEGER NOT NULL DEFAULT 5"),
                ("status", "TEXT NOT NULL DEFAULT 'pending'"),
                ("created_by", "TEXT NOT NULL DEFAULT 'system'"),
            ],
        )?;
        Ok(())
    }

    fn ensure_columns(&self, table: &str, columns: &[(&str, &str)]) -> GridCalResult<()> {
        let mut stmt = self
            .conn
            .prepare(&format!("PRAGMA table_info({table})"))?;
        let existing: Vec<String> = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<Result<_, _>>()?;

        for (name, decl) in columns {
            if !existing.iter().any(|c| c == name) {
                info!(table, column = name, "adding missing column");
                self.conn
                    .execute(&format!("ALTER TABLE {table} ADD COLUMN {name} {decl}"), [])?;
            }
        }
        Ok(())
    }

    // ----- occurrences -----

    pub fn insert_occurrence(&self, occurrence: &Occurrence) -> GridCalResult<()> {
        occurrence.validate_times()?;
        self.conn.execute(
            &format!(
                "INSERT INTO occurrences ({OCCURRENCE_COLS}) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)"
            ),
            params![
                occurrence.id,
                occurrence.title,
                occurrence.notes,
                occurrence.date.to_string(),
                fmt_time(occurrence.start_time),
                fmt_time(occurrence.end_time),
                occurrence.category.as_str(),
                tags_to_json(&occurrence.tags),
                occurrence.recurrence.as_str(),
                occurrence.is_master,
                occurrence.master_id,
                occurrence.manually_modified,
                occurrence.alarm_lead_minutes,
                occurrence.alarm_enabled,
                occurrence.created_at.to_rfc3339(),
                occurrence.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn update_occurrence(&self, occurrence: &Occurrence) -> GridCalResult<()> {
        occurrence.validate_times()?;
        let changed = self.conn.execute(
            "UPDATE occurrences SET title = ?2, notes = ?3, date = ?4, start_time = ?5, \
             end_time = ?6, category = ?7, tags = ?8, recurrence = ?9, is_master = ?10, \
             master_id = ?11, manually_modified = ?12, alarm_lead_minutes = ?13, \
             alarm_enabled = ?14, updated_at = ?15 WHERE id = ?1",
            params![
                occurrence.id,
                occurrence.title,
                occurrence.notes,
                occurrence.date.to_string(),
                fmt_time(occurrence.start_time),
                fmt_time(occurrence.end_time),
                occurrence.category.as_str(),
                tags_to_json(&occurrence.tags),
                occurrence.recurrence.as_str(),
                occurrence.is_master,
                occurrence.master_id,
                occurrence.manually_modified,
                occurrence.alarm_lead_minutes,
                occurrence.alarm_enabled,
                occurrence.updated_at.to_rfc3339(),
            ],
        )?;
        if changed == 0 {
            return Err(GridCalError::NotFound(format!(
                "Occurrence {}",
                occurrence.id
            )));
        }
        Ok(())
    }

    pub fn get_occurrence(&self, id: &str) -> GridCalResult<Option<Occurrence>> {
        let mut found = self.query_occurrences(
            &format!("SELECT {OCCURRENCE_COLS} FROM occurrences WHERE id = ?1"),
            params![id],
        )?;
        Ok(found.pop())
    }

    /// Look up by full id or unique prefix (short ids in the CLI).
    pub fn find_occurrence(&self, id_or_prefix: &str) -> GridCalResult<Option<Occurrence>> {
        if let Some(occurrence) = self.get_occurrence(id_or_prefix)? {
            return Ok(Some(occurrence));
        }
        let matches = self.query_occurrences(
            &format!(
                "SELECT {OCCURRENCE_COLS} FROM occurrences WHERE id LIKE ?1 || '%' LIMIT 2"
            ),
            params![id_or_prefix],
        )?;
        match matches.len() {
            0 => Ok(None),
            1 => Ok(matches.into_iter().next()),
            _ => Err(GridCalError::Validation(format!(
                "Id prefix '{id_or_prefix}' is ambiguous"
            ))),
        }
    }

    pub fn delete_occurrence(&self, id: &str) -> GridCalResult<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM occurrences WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }

    /// Schedulable (non-master) occurrences on a date, in start order.
    pub fn schedulable_on(&self, date: NaiveDate) -> GridCalResult<Vec<Occurrence>> {
        self.query_occurrences(
            &format!(
                "SELECT {OCCURRENCE_COLS} FROM occurrences \
                 WHERE date = ?1 AND is_master = 0 ORDER BY start_time"
            ),
            params![date.to_string()],
        )
    }

    /// All schedulable occurrences, in (date, start) order.
    pub fn list_schedulable(&self) -> GridCalResult<Vec<Occurrence>> {
        self.query_occurrences(
            &format!(
                "SELECT {OCCURRENCE_COLS} FROM occurrences \
                 WHERE is_master = 0 ORDER BY date, start_time"
            ),
            params![],
        )
    }

    pub fn list_range(&self, from: NaiveDate, to: NaiveDate) -> GridCalResult<Vec<Occurrence>> {
        self.query_occurrences(
            &format!(
                "SELECT {OCCURRENCE_COLS} FROM occurrences \
                 WHERE is_master = 0 AND date >= ?1 AND date <= ?2 ORDER BY date, start_time"
            ),
            params![from.to_string(), to.to_string()],
        )
    }

    pub fn search(&self, text: &str) -> GridCalResult<Vec<Occurrence>> {
        let pattern = format!("%{text}%");
        self.query_occurrences(
            &format!(
                "SELECT {OCCURRENCE_COLS} FROM occurrences \
                 WHERE is_master = 0 AND (title LIKE ?1 OR notes LIKE ?1) \
                 ORDER BY date, start_time"
            ),
            params![pattern],
        )
    }

    pub fn instances_of(&self, master_id: &str) -> GridCalResult<Vec<Occurrence>> {
        self.query_occurrences(
            &format!(
                "SELECT {OCCURRENCE_COLS} FROM occurrences \
                 WHERE master_id = ?1 AND is_master = 0 ORDER BY date"
            ),
            params![master_id],
        )
    }

    /// (total, dated >= `from`) instance counts for a master.
    pub fn count_instances(&self, master_id: &str, from: NaiveDate) -> GridCalResult<(usize, usize)> {
        let total: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM occurrences WHERE master_id = ?1 AND is_master = 0",
            params![master_id],
            |row| row.get(0),
        )?;
        let future: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM occurrences \
             WHERE master_id = ?1 AND is_master = 0 AND date >= ?2",
            params![master_id, from.to_string()],
            |row| row.get(0),
        )?;
        Ok((total as usize, future as usize))
    }

    /// Delete a master's instances; with `from` set, only those dated
    /// on or after it. Returns the number removed.
    pub fn delete_instances_of(
        &self,
        master_id: &str,
        from: Option<NaiveDate>,
    ) -> GridCalResult<usize> {
        let changed = match from {
            Some(date) => self.conn.execute(
                "DELETE FROM occurrences \
                 WHERE master_id = ?1 AND is_master = 0 AND date >= ?2",
                params![master_id, date.to_string()],
            )?,
            None => self.conn.execute(
                "DELETE FROM occurrences WHERE master_id = ?1 AND is_master = 0",
                params![master_id],
            )?,
        };
        Ok(changed)
    }

    /// Duplicate check by identity fields, used by the pull path.
    pub fn exists_same(
        &self,
        title: &str,
        date: NaiveDate,
        start: NaiveTime,
    ) -> GridCalResult<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM occurrences \
             WHERE title = ?1 AND date = ?2 AND start_time = ?3",
            params![title, date.to_string(), fmt_time(start)],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Instances whose master no longer exists (integrity check).
    pub fn orphan_instances(&self) -> GridCalResult<Vec<Occurrence>> {
        self.query_occurrences(
            &format!(
                "SELECT {OCCURRENCE_COLS} FROM occurrences o \
                 WHERE o.is_master = 0 AND o.master_id IS NOT NULL \
                 AND NOT EXISTS (SELECT 1 FROM occurrences m \
                                 WHERE m.id = o.master_id AND m.is_master = 1)"
            ),
            params![],
        )
    }

    fn query_occurrences<P: rusqlite::Params>(
        &self,
        sql: &str,
        params: P,
    ) -> GridCalResult<Vec<Occurrence>> {
        let mut stmt = self.conn.prepare(sql)?;
        let raws = stmt.query_map(params, raw_occurrence)?;
        let mut out = Vec::new();
        for raw in raws {
            out.push(occurrence_from_raw(raw?)?);
        }
        Ok(out)
    }

    // ----- reminders -----

    pub fn insert_reminder(&self, new: &NewReminder) -> GridCalResult<Reminder> {
        new.validate()?;
        let created_at = Utc::now();
        self.conn.execute(
            "INSERT INTO reminders (content, category, due_date, due_time, priority, status, \
             created_by, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                new.content,
                new.category.as_str(),
                new.due_date.map(|d| d.to_string()),
                new.due_time.map(fmt_time),
                new.effective_priority(),
                ReminderStatus::Pending.as_str(),
                new.created_by,
                created_at.to_rfc3339(),
            ],
        )?;
        Ok(Reminder {
            id: self.conn.last_insert_rowid(),
            content: new.content.clone(),
            category: new.category,
            due_date: new.due_date,
            due_time: new.due_time,
            priority: new.effective_priority(),
            status: ReminderStatus::Pending,
            created_by: new.created_by.clone(),
            created_at,
        })
    }

    pub fn get_reminder(&self, id: i64) -> GridCalResult<Option<Reminder>> {
        let mut found = self.query_reminders(
            &format!("SELECT {REMINDER_COLS} FROM reminders WHERE id = ?1"),
            params![id],
        )?;
        Ok(found.pop())
    }

    /// Pending reminders, dated ones first in (due, priority) order.
    pub fn pending_reminders(&self) -> GridCalResult<Vec<Reminder>> {
        self.query_reminders(
            &format!(
                "SELECT {REMINDER_COLS} FROM reminders WHERE status = 'pending' \
                 ORDER BY due_date IS NULL, due_date, due_time, priority, id"
            ),
            params![],
        )
    }

    pub fn list_reminders(&self, status: Option<ReminderStatus>) -> GridCalResult<Vec<Reminder>> {
        match status {
            Some(status) => self.query_reminders(
                &format!(
                    "SELECT {REMINDER_COLS} FROM reminders WHERE status = ?1 ORDER BY id"
                ),
                params![status.as_str()],
            ),
            None => self.query_reminders(
                &format!("SELECT {REMINDER_COLS} FROM reminders ORDER BY id"),
                params![],
            ),
        }
    }

    /// Apply a status transition; pending -> completed|cancelled only.
    pub fn set_reminder_status(&self, id: i64, status: ReminderStatus) -> GridCalResult<Reminder> {
        let mut reminder = self
            .get_reminder(id)?
            .ok_or_else(|| GridCalError::NotFound(format!("Reminder {id}")))?;
        if !reminder.status.can_transition_to(status) {
            return Err(GridCalError::InvalidOperation(format!(
                "Reminder {id} is {} and cannot become {}",
                reminder.status.as_str(),
                status.as_str()
            )));
        }
        self.conn.execute(
            "UPDATE reminders SET status = ?2 WHERE id = ?1",
            params![id, status.as_str()],
        )?;
        reminder.status = status;
        Ok(reminder)
    }

    pub fn delete_reminder(&self, id: i64) -> GridCalResult<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM reminders WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }

    fn query_reminders<P: rusqlite::Params>(
        &self,
        sql: &str,
        params: P,
    ) -> GridCalResult<Vec<Reminder>> {
        let mut stmt = self.conn.prepare(sql)?;
        let raws = stmt.query_map(params, raw_reminder)?;
        let mut out = Vec::new();
        for raw in raws {
            out.push(reminder_from_raw(raw?)?);
        }
        Ok(out)
    }

    // ----- audit log -----

    pub fn record_audit(&self, entry: &AuditEntry) -> GridCalResult<()> {
        self.conn.execute(
            "INSERT INTO audit_log (module, action, description, actor, timestamp) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                entry.module,
                entry.action,
                entry.description,
                entry.actor,
                entry.timestamp.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn recent_audit(&self, limit: usize) -> GridCalResult<Vec<AuditEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT module, action, description, actor, timestamp \
             FROM audit_log ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (module, action, description, actor, timestamp) = row?;
            out.push(AuditEntry {
                module,
                action,
                description,
                actor,
                timestamp: parse_timestamp(&timestamp)?,
            });
        }
        Ok(out)
    }
}

// ----- row mapping -----

struct RawOccurrence {
    id: String,
    title: String,
    notes: Option<String>,
    date: String,
    start_time: String,
    end_time: String,
    category: String,
    tags: String,
    recurrence: String,
    is_master: bool,
    master_id: Option<String>,
    manually_modified: bool,
    alarm_lead_minutes: u32,
    alarm_enabled: bool,
    created_at: String,
    updated_at: String,
}

fn raw_occurrence(row: &Row<'_>) -> rusqlite::Result<RawOccurrence> {
    Ok(RawOccurrence {
        id: row.get(0)?,
        title: row.get(1)?,
        notes: row.get(2)?,
        date: row.get(3)?,
        start_time: row.get(4)?,
        end_time: row.get(5)?,
        category: row.get(6)?,
        tags: row.get(7)?,
        recurrence: row.get(8)?,
        is_master: row.get(9)?,
        master_id: row.get(10)?,
        manually_modified: row.get(11)?,
        alarm_lead_minutes: row.get(12)?,
        alarm_enabled: row.get(13)?,
        created_at: row.get(14)?,
        updated_at: row.get(15)?,
    })
}

fn occurrence_from_raw(raw: RawOccurrence) -> GridCalResult<Occurrence> {
    Ok(Occurrence {
        category: Category::parse(&raw.category)?,
        recurrence: RecurrenceKind::parse(&raw.recurrence)?,
        date: parse_date(&raw.date)?,
        start_time: parse_time(&raw.start_time)?,
        end_time: parse_time(&raw.end_time)?,
        tags: tags_from_json(&raw.tags)?,
        created_at: parse_timestamp(&raw.created_at)?,
        updated_at: parse_timestamp(&raw.updated_at)?,
        id: raw.id,
        title: raw.title,
        notes: raw.notes,
        is_master: raw.is_master,
        master_id: raw.master_id,
        manually_modified: raw.manually_modified,
        alarm_lead_minutes: raw.alarm_lead_minutes,
        alarm_enabled: raw.alarm_enabled,
    })
}

struct RawReminder {
    id: i64,
    content: String,
    category: String,
    due_date: Option<String>,
    due_time: Option<String>,
    priority: u8,
    status: String,
    created_by: String,
    created_at: String,
}

fn raw_reminder(row: &Row<'_>) -> rusqlite::Result<RawReminder> {
    Ok(RawReminder {
        id: row.get(0)?,
        content: row.get(1)?,
        category: row.get(2)?,
        due_date: row.get(3)?,
        due_time: row.get(4)?,
        priority: row.get(5)?,
        status: row.get(6)?,
        created_by: row.get(7)?,
        created_at: row.get(8)?,
    })
}

fn reminder_from_raw(raw: RawReminder) -> GridCalResult<Reminder> {
    Ok(Reminder {
        category: ReminderCategory::parse(&raw.category)?,
        status: ReminderStatus::parse(&raw.status)?,
        due_date: raw.due_date.as_deref().map(parse_date).transpose()?,
        due_time: raw.due_time.as_deref().map(parse_time).transpose()?,
        created_at: parse_timestamp(&raw.created_at)?,
        id: raw.id,
        content: raw.content,
        priority: raw.priority,
        created_by: raw.created_by,
    })
}

fn fmt_time(time: NaiveTime) -> String {
    time.format("%H:%M").to_string()
}

fn parse_time(s: &str) -> GridCalResult<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .map_err(|_| GridCalError::Validation(format!("Unparseable time '{s}'")))
}

fn parse_date(s: &str) -> GridCalResult<NaiveDate> {
    s.parse::<NaiveDate>()
        .map_err(|_| GridCalError::Validation(format!("Unparseable date '{s}'")))
}

fn parse_timestamp(s: &str) -> GridCalResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| GridCalError::Validation(format!("Unparseable timestamp '{s}'")))
}

fn tags_to_json(tags: &BTreeSet<String>) -> String {
    serde_json::to_string(&tags.iter().collect::<Vec<_>>()).unwrap_or_else(|_| "[]".to_string())
}

fn tags_from_json(json: &str) -> GridCalResult<BTreeSet<String>> {
    serde_json::from_str(json)
        .map_err(|_| GridCalError::Validation(format!("Unparseable tags '{json}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reminder::ReminderCategory;

    fn make_occurrence(id: &str, date: &str, start: &str, end: &str) -> Occurrence {
        Occurrence {
            id: id.to_string(),
            title: "Physics".to_string(),
            notes: Some("Modeling".to_string()),
            date: date.parse().unwrap(),
            start_time: NaiveTime::parse_from_str(start, "%H:%M").unwrap(),
            end_time: NaiveTime::parse_from_str(end, "%H:%M").unwrap(),
            category: Category::Class,
            tags: ["uni".to_string()].into_iter().collect(),
            recurrence: RecurrenceKind::None,
            is_master: false,
            master_id: None,
            manually_modified: false,
            alarm_lead_minutes: 5,
            alarm_enabled: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_insert_and_get_round_trip() {
        let store = Store::in_memory().unwrap();
        let occurrence = make_occurrence("abc-123", "2025-10-28", "09:00", "10:30");
        store.insert_occurrence(&occurrence).unwrap();

        let loaded = store.get_occurrence("abc-123").unwrap().unwrap();
        assert_eq!(loaded.title, occurrence.title);
        assert_eq!(loaded.date, occurrence.date);
        assert_eq!(loaded.start_time, occurrence.start_time);
        assert_eq!(loaded.tags, occurrence.tags);
        assert_eq!(loaded.category, Category::Class);
    }

    #[test]
    fn test_find_by_prefix() {
        let store = Store::in_memory().unwrap();
        store
            .insert_occurrence(&make_occurrence("aabbccdd-1", "2025-10-28", "09:00", "10:00"))
            .unwrap();
        store
            .insert_occurrence(&make_occurrence("aaffeedd-2", "2025-10-28", "11:00", "12:00"))
            .unwrap();

        assert!(store.find_occurrence("aabb").unwrap().is_some());
        assert!(store.find_occurrence("zzzz").unwrap().is_none());
        // Shared prefix is ambiguous.
        assert!(store.find_occurrence("aa").is_err());
    }

    #[test]
    fn test_schedulable_on_skips_masters() {
        let store = Store::in_memory().unwrap();
        let mut master = make_occurrence("master-1", "2025-10-28", "09:00", "10:00");
        master.is_master = true;
        master.recurrence = RecurrenceKind::Weekly;
        store.insert_occurrence(&master).unwrap();
        store
            .insert_occurrence(&make_occurrence("inst-1", "2025-10-28", "11:00", "12:00"))
            .unwrap();

        let day = store.schedulable_on("2025-10-28".parse().unwrap()).unwrap();
        assert_eq!(day.len(), 1);
        assert_eq!(day[0].id, "inst-1");
    }

    #[test]
    fn test_migration_is_additive() {
        // A database from before the series columns existed.
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE occurrences (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                notes TEXT,
                date TEXT NOT NULL,
                start_time TEXT NOT NULL,
                end_time TEXT NOT NULL,
                tags TEXT NOT NULL DEFAULT '[]',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            INSERT INTO occurrences (id, title, date, start_time, end_time, created_at, updated_at)
            VALUES ('old-1', 'Gym', '2025-10-01', '18:00', '19:00',
                    '2025-09-01T00:00:00+00:00', '2025-09-01T00:00:00+00:00');",
        )
        .unwrap();

        let store = Store { conn };
        store.init_schema().unwrap();
        store.migrate().unwrap();

        let old = store.get_occurrence("old-1").unwrap().unwrap();
        assert_eq!(old.title, "Gym");
        assert_eq!(old.category, Category::Personal);
        assert_eq!(old.recurrence, RecurrenceKind::None);
        assert!(!old.is_master);
    }

    #[test]
    fn test_reminder_lifecycle() {
        let store = Store::in_memory().unwrap();
        let reminder = store
            .insert_reminder(&NewReminder {
                content: "submit report".to_string(),
                category: ReminderCategory::Urgent,
                due_date: Some("2025-10-30".parse().unwrap()),
                due_time: None,
                priority: None,
                created_by: "tests".to_string(),
            })
            .unwrap();
        assert_eq!(reminder.priority, 1);
        assert_eq!(reminder.status, ReminderStatus::Pending);

        let done = store
            .set_reminder_status(reminder.id, ReminderStatus::Completed)
            .unwrap();
        assert_eq!(done.status, ReminderStatus::Completed);

        // Terminal states cannot transition again.
        let err = store
            .set_reminder_status(reminder.id, ReminderStatus::Cancelled)
            .unwrap_err();
        assert!(matches!(err, GridCalError::InvalidOperation(_)));
    }

    #[test]
    fn test_pending_reminders_order() {
        let store = Store::in_memory().unwrap();
        let base = |content: &str, category| NewReminder {
            content: content.to_string(),
            category,
            due_date: None,
            due_time: None,
            priority: None,
            created_by: "tests".to_string(),
        };

        store.insert_reminder(&base("undated", ReminderCategory::Note)).unwrap();
        store
            .insert_reminder(&NewReminder {
                due_date: Some("2025-11-02".parse().unwrap()),
                ..base("later", ReminderCategory::Task)
            })
            .unwrap();
        store
            .insert_reminder(&NewReminder {
                due_date: Some("2025-11-01".parse().unwrap()),
                ..base("sooner", ReminderCategory::Task)
            })
            .unwrap();

        let pending = store.pending_reminders().unwrap();
        let contents: Vec<&str> = pending.iter().map(|r| r.content.as_str()).collect();
        assert_eq!(contents, vec!["sooner", "later", "undated"]);
    }

    #[test]
    fn test_audit_round_trip() {
        let store = Store::in_memory().unwrap();
        store
            .record_audit(&AuditEntry::new("agenda", "add", "Physics", "tests"))
            .unwrap();
        let recent = store.recent_audit(10).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].action, "add");
    }
}
