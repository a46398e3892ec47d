//! Weekly grid geometry and naming.
//!
//! The external surface is a grid with a first column of fixed
//! time-slot labels and a first row of weekday labels. One page covers
//! one Monday–Sunday week. This module owns the mapping between
//! occurrences and grid coordinates: time -> row, date -> column,
//! A1-style range strings, and the page naming scheme ("21-27 Oct",
//! "28 Oct-03 Nov").

use chrono::{Datelike, Duration, NaiveDate, NaiveTime, Timelike};

use crate::error::{GridCalError, GridCalResult};
use crate::occurrence::Category;
use crate::surface::Rgb;

/// Weekday header labels, Monday first (columns B..H).
pub const WEEKDAY_LABELS: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

const MONTH_ABBR: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Convert a 1-indexed column number to letters (1 -> A, 27 -> AA).
pub fn col_letters(mut col: u32) -> String {
    let mut out = String::new();
    while col > 0 {
        let rem = ((col - 1) % 26) as u8;
        out.insert(0, (b'A' + rem) as char);
        col = (col - 1) / 26;
    }
    out
}

/// A1 notation for a 1-indexed (row, col) cell.
pub fn rowcol_to_a1(row: u32, col: u32) -> String {
    format!("{}{}", col_letters(col), row)
}

/// Parse a single A1 cell reference back to (row, col).
pub fn a1_to_rowcol(a1: &str) -> Option<(u32, u32)> {
    let letters: String = a1.chars().take_while(|c| c.is_ascii_alphabetic()).collect();
    let digits = &a1[letters.len()..];
    if letters.is_empty() || digits.is_empty() {
        return None;
    }
    let mut col: u32 = 0;
    for c in letters.chars() {
        col = col * 26 + (c.to_ascii_uppercase() as u32 - 'A' as u32 + 1);
    }
    let row: u32 = digits.parse().ok()?;
    if row == 0 {
        return None;
    }
    Some((row, col))
}

/// Parse "B2:B5" (or a bare "B2") into inclusive (start, end) corners.
pub fn parse_a1_range(range: &str) -> Option<((u32, u32), (u32, u32))> {
    match range.split_once(':') {
        Some((a, b)) => Some((a1_to_rowcol(a)?, a1_to_rowcol(b)?)),
        None => {
            let cell = a1_to_rowcol(range)?;
            Some((cell, cell))
        }
    }
}

/// Monday of the week containing `date`.
pub fn monday_of(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_monday() as i64)
}

/// Page name for the Monday–Sunday span containing `date`.
///
/// Same month: "21-27 Oct". Cross-month spans carry both month
/// abbreviations: "28 Oct-03 Nov".
pub fn page_name_for(date: NaiveDate) -> String {
    let monday = monday_of(date);
    let sunday = monday + Duration::days(6);

    if monday.month() == sunday.month() {
        format!(
            "{:02}-{:02} {}",
            monday.day(),
            sunday.day(),
            MONTH_ABBR[monday.month0() as usize]
        )
    } else {
        format!(
            "{:02} {}-{:02} {}",
            monday.day(),
            MONTH_ABBR[monday.month0() as usize],
            sunday.day(),
            MONTH_ABBR[sunday.month0() as usize]
        )
    }
}

fn month_from_abbr(abbr: &str) -> Option<u32> {
    MONTH_ABBR
        .iter()
        .position(|m| m.eq_ignore_ascii_case(abbr))
        .map(|i| i as u32 + 1)
}

/// Parse a page name back to its week's Monday.
///
/// Page names carry no year, so the year is inferred: among the
/// candidates around `today`, the Monday closest to `today` wins.
/// Returns None for names that are not week pages (template, scratch
/// pages); callers skip those.
pub fn parse_page_name(name: &str, today: NaiveDate) -> Option<NaiveDate> {
    let parts: Vec<&str> = name.split_whitespace().collect();

    let (day, month) = match parts.as_slice() {
        // "21-27 Oct"
        [days, month] => {
            let (start_day, _) = days.split_once('-')?;
            (start_day.parse::<u32>().ok()?, month_from_abbr(month)?)
        }
        // "28 Oct-03 Nov"
        [day, mid, _month_end] => {
            let (start_month, _) = mid.split_once('-')?;
            (day.parse::<u32>().ok()?, month_from_abbr(start_month)?)
        }
        _ => return None,
    };

    (today.year() - 1..=today.year() + 1)
        .filter_map(|year| NaiveDate::from_ymd_opt(year, month, day))
        .filter(|d| d.weekday().num_days_from_monday() == 0)
        .min_by_key(|d| (*d - today).num_days().abs())
}

/// Row/column geometry of a week page.
#[derive(Debug, Clone)]
pub struct GridLayout {
    /// Time label of the first data row (row 2).
    pub first_slot: NaiveTime,
    /// Minutes per row.
    pub slot_minutes: u32,
    /// Number of slot rows on the page.
    pub slot_count: u32,
}

/// Grid coordinates of one occurrence's block on its page.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockRange {
    /// A1 reference of the top cell, where the text goes.
    pub first_cell: String,
    /// Inclusive A1 range of the whole row span.
    pub range: String,
}

impl Default for GridLayout {
    fn default() -> Self {
        // 07:00–22:00 in half-hour rows.
        GridLayout {
            first_slot: NaiveTime::from_hms_opt(7, 0, 0).expect("valid constant time"),
            slot_minutes: 30,
            slot_count: 30,
        }
    }
}

impl GridLayout {
    /// Slot index of a wall-clock time. The index may equal
    /// `slot_count` so that interval *end* times on the last boundary
    /// resolve; it must land exactly on the slot raster.
    fn slot_index(&self, time: NaiveTime) -> GridCalResult<u32> {
        let offset = time.num_seconds_from_midnight() as i64 / 60
            - self.first_slot.num_seconds_from_midnight() as i64 / 60;
        if offset < 0 || offset % self.slot_minutes as i64 != 0 {
            return Err(GridCalError::Validation(format!(
                "Time {} is not on the page's {}-minute slot grid starting {}",
                time.format("%H:%M"),
                self.slot_minutes,
                self.first_slot.format("%H:%M")
            )));
        }
        let index = (offset / self.slot_minutes as i64) as u32;
        if index > self.slot_count {
            return Err(GridCalError::Validation(format!(
                "Time {} is past the page's last slot",
                time.format("%H:%M")
            )));
        }
        Ok(index)
    }

    /// 1-indexed row of the slot starting at `time` (row 1 holds the
    /// weekday headers).
    pub fn time_to_row(&self, time: NaiveTime) -> GridCalResult<u32> {
        Ok(self.slot_index(time)? + 2)
    }

    /// Wall-clock time of a 1-indexed data row.
    pub fn row_to_time(&self, row: u32) -> Option<NaiveTime> {
        if row < 2 || row >= 2 + self.slot_count {
            return None;
        }
        let minutes = (row - 2) * self.slot_minutes;
        let (time, _) = self
            .first_slot
            .overflowing_add_signed(chrono::Duration::minutes(minutes as i64));
        Some(time)
    }

    /// 1-indexed column of a date's weekday (Monday -> B).
    pub fn date_to_col(&self, date: NaiveDate) -> u32 {
        2 + date.weekday().num_days_from_monday()
    }

    /// Weekday offset (0 = Monday) of a header label, if recognized.
    pub fn weekday_from_label(&self, label: &str) -> Option<u32> {
        WEEKDAY_LABELS
            .iter()
            .position(|l| l.eq_ignore_ascii_case(label.trim()))
            .map(|i| i as u32)
    }

    /// Last 1-indexed row holding slot data.
    pub fn last_data_row(&self) -> u32 {
        self.slot_count + 1
    }

    /// A1 range of the whole data region (all days, all slots),
    /// excluding the label row and column.
    pub fn data_region(&self) -> String {
        format!("B2:{}{}", col_letters(8), self.last_data_row())
    }

    /// Resolve an occurrence interval to its block on the page.
    /// The block covers the slots in `[start, end)`, so a 9:00–10:30
    /// event in a 30-minute grid spans three rows.
    pub fn block_range(
        &self,
        date: NaiveDate,
        start: NaiveTime,
        end: NaiveTime,
    ) -> GridCalResult<BlockRange> {
        crate::occurrence::validate_interval(start, end)?;
        let start_row = self.time_to_row(start)?;
        let end_row = self.time_to_row(end)? - 1;
        let col = self.date_to_col(date);

        Ok(BlockRange {
            first_cell: rowcol_to_a1(start_row, col),
            range: format!(
                "{}:{}",
                rowcol_to_a1(start_row, col),
                rowcol_to_a1(end_row, col)
            ),
        })
    }
}

/// Background color painted for a category's blocks.
pub fn category_color(category: Category) -> Rgb {
    match category {
        Category::Class => Rgb::new(0.74, 0.84, 0.97),
        Category::Work => Rgb::new(0.85, 0.42, 0.18),
        Category::Personal => Rgb::new(0.85, 0.92, 0.83),
        Category::Sport => Rgb::new(0.21, 0.46, 0.32),
        Category::Study => Rgb::new(0.99, 0.94, 0.75),
        Category::Meeting => Rgb::new(0.36, 0.26, 0.56),
    }
}

/// Background color for a reminder priority (1 = highest .. 5).
pub fn priority_color(priority: u8) -> Rgb {
    match priority {
        1 => Rgb::new(1.0, 0.8, 0.8),
        2 => Rgb::new(1.0, 0.9, 0.6),
        3 => Rgb::new(1.0, 1.0, 0.8),
        4 => Rgb::new(0.9, 1.0, 0.9),
        _ => Rgb::new(0.85, 0.95, 1.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_col_letters() {
        assert_eq!(col_letters(1), "A");
        assert_eq!(col_letters(8), "H");
        assert_eq!(col_letters(26), "Z");
        assert_eq!(col_letters(27), "AA");
    }

    #[test]
    fn test_a1_round_trip() {
        assert_eq!(rowcol_to_a1(2, 2), "B2");
        assert_eq!(a1_to_rowcol("B2"), Some((2, 2)));
        assert_eq!(a1_to_rowcol("AA10"), Some((10, 27)));
        assert_eq!(parse_a1_range("B2:B5"), Some(((2, 2), (5, 2))));
        assert_eq!(parse_a1_range("C3"), Some(((3, 3), (3, 3))));
        assert_eq!(a1_to_rowcol("42"), None);
    }

    #[test]
    fn test_monday_of() {
        // 2025-10-28 is a Tuesday.
        assert_eq!(monday_of(d(2025, 10, 28)), d(2025, 10, 27));
        assert_eq!(monday_of(d(2025, 10, 27)), d(2025, 10, 27));
        assert_eq!(monday_of(d(2025, 11, 2)), d(2025, 10, 27));
    }

    #[test]
    fn test_page_name_same_month() {
        assert_eq!(page_name_for(d(2025, 10, 22)), "20-26 Oct");
    }

    #[test]
    fn test_page_name_cross_month() {
        // Week of Mon 2025-10-27 runs into November.
        assert_eq!(page_name_for(d(2025, 10, 28)), "27 Oct-02 Nov");
    }

    #[test]
    fn test_parse_page_name_round_trip() {
        let today = d(2025, 10, 15);
        assert_eq!(
            parse_page_name(&page_name_for(d(2025, 10, 22)), today),
            Some(d(2025, 10, 20))
        );
        assert_eq!(
            parse_page_name(&page_name_for(d(2025, 10, 28)), today),
            Some(d(2025, 10, 27))
        );
        assert_eq!(parse_page_name("Template", today), None);
        assert_eq!(parse_page_name("Sheet1", today), None);
    }

    #[test]
    fn test_block_range_spans_slots() {
        let layout = GridLayout::default();
        // 2025-10-28 is a Tuesday -> column C. 09:00 -> row 6 in a
        // 30-minute grid starting 07:00; 10:30 end -> last row 8.
        let block = layout
            .block_range(d(2025, 10, 28), t(9, 0), t(10, 30))
            .unwrap();
        assert_eq!(block.first_cell, "C6");
        assert_eq!(block.range, "C6:C8");
    }

    #[test]
    fn test_block_range_rejects_off_grid_times() {
        let layout = GridLayout::default();
        assert!(layout.block_range(d(2025, 10, 28), t(9, 10), t(10, 0)).is_err());
        assert!(layout.block_range(d(2025, 10, 28), t(6, 0), t(7, 0)).is_err());
        assert!(layout.block_range(d(2025, 10, 28), t(21, 30), t(22, 0)).is_ok());
        assert!(layout.block_range(d(2025, 10, 28), t(22, 0), t(22, 30)).is_err());
    }

    #[test]
    fn test_row_to_time() {
        let layout = GridLayout::default();
        assert_eq!(layout.row_to_time(2), Some(t(7, 0)));
        assert_eq!(layout.row_to_time(6), Some(t(9, 0)));
        assert_eq!(layout.row_to_time(1), None);
        assert_eq!(layout.row_to_time(200), None);
    }
}
