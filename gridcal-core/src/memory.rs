//! In-memory surface implementation.
//!
//! Backs tests and dry runs: pages are plain cell/style maps, every
//! call is logged, and failures can be injected per page to exercise
//! partial-failure isolation.

use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{GridCalError, GridCalResult};
use crate::grid::{self, GridLayout, parse_a1_range};
use crate::surface::{CellStyle, PageHandle, RangeStyle, RangeWrite, Surface};

type CellMap = BTreeMap<(u32, u32), String>;
type StyleMap = BTreeMap<(u32, u32), CellStyle>;

#[derive(Debug, Clone, PartialEq)]
struct MemPage {
    handle: PageHandle,
    cells: CellMap,
    styles: StyleMap,
}

#[derive(Default)]
struct Inner {
    next_id: u64,
    pages: Vec<MemPage>,
    archive: Vec<MemPage>,
    fail_pages: HashSet<String>,
    calls: Vec<String>,
}

/// Comparable dump of one page's content and formatting.
pub type PageSnapshot = (String, CellMap, StyleMap);

pub struct MemorySurface {
    inner: Mutex<Inner>,
}

impl MemorySurface {
    pub fn new() -> Self {
        MemorySurface {
            inner: Mutex::new(Inner::default()),
        }
    }

    /// A surface carrying a template page laid out like a week page:
    /// weekday headers in row 1 and slot labels in column A.
    pub fn with_week_template(template_name: &str, layout: &GridLayout) -> Self {
        let surface = MemorySurface::new();
        {
            let mut inner = surface.lock();
            let mut cells = CellMap::new();
            cells.insert((1, 1), "Time".to_string());
            for (i, label) in grid::WEEKDAY_LABELS.iter().enumerate() {
                cells.insert((1, 2 + i as u32), (*label).to_string());
            }
            for row in 2..=layout.last_data_row() {
                if let Some(time) = layout.row_to_time(row) {
                    cells.insert((row, 1), time.format("%H:%M").to_string());
                }
            }
            let handle = PageHandle {
                id: "0".to_string(),
                name: template_name.to_string(),
            };
            inner.next_id = 1;
            inner.pages.push(MemPage {
                handle,
                cells,
                styles: StyleMap::new(),
            });
        }
        surface
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("memory surface lock poisoned")
    }

    /// Make every mutating call against the named page fail.
    pub fn inject_failure(&self, page_name: &str) {
        self.lock().fail_pages.insert(page_name.to_string());
    }

    /// Ordered log of the underlying calls made so far.
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    /// How many calls of the given kind were made (e.g. "write_ranges").
    pub fn call_count(&self, op: &str) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.starts_with(op))
            .count()
    }

    /// Full, comparable dump of the live surface.
    pub fn snapshot(&self) -> Vec<PageSnapshot> {
        self.lock()
            .pages
            .iter()
            .map(|p| (p.handle.name.clone(), p.cells.clone(), p.styles.clone()))
            .collect()
    }

    pub fn archive_names(&self) -> Vec<String> {
        self.lock()
            .archive
            .iter()
            .map(|p| p.handle.name.clone())
            .collect()
    }

    /// Cell content at a 1-indexed (row, col), if any.
    pub fn cell(&self, page_name: &str, row: u32, col: u32) -> Option<String> {
        let inner = self.lock();
        let page = inner.pages.iter().find(|p| p.handle.name == page_name)?;
        page.cells.get(&(row, col)).cloned()
    }

    /// Style at a 1-indexed (row, col), if any survives.
    pub fn style(&self, page_name: &str, row: u32, col: u32) -> Option<CellStyle> {
        let inner = self.lock();
        let page = inner.pages.iter().find(|p| p.handle.name == page_name)?;
        page.styles.get(&(row, col)).cloned()
    }
}

impl Default for MemorySurface {
    fn default() -> Self {
        MemorySurface::new()
    }
}

impl Inner {
    fn page_index(&self, handle: &PageHandle) -> GridCalResult<usize> {
        self.pages
            .iter()
            .position(|p| p.handle.id == handle.id)
            .ok_or_else(|| GridCalError::NotFound(format!("Page '{}'", handle.name)))
    }

    fn check_failure(&self, handle: &PageHandle) -> GridCalResult<()> {
        if self.fail_pages.contains(&handle.name) {
            return Err(GridCalError::Surface(format!(
                "Injected failure for page '{}'",
                handle.name
            )));
        }
        Ok(())
    }
}

fn range_cells(range: &str) -> GridCalResult<Vec<(u32, u32)>> {
    let ((r1, c1), (r2, c2)) = parse_a1_range(range)
        .ok_or_else(|| GridCalError::Validation(format!("Bad A1 range '{range}'")))?;
    let mut cells = Vec::new();
    for row in r1..=r2 {
        for col in c1..=c2 {
            cells.push((row, col));
        }
    }
    Ok(cells)
}

#[async_trait]
impl Surface for MemorySurface {
    async fn list_pages(&self) -> GridCalResult<Vec<PageHandle>> {
        let mut inner = self.lock();
        inner.calls.push("list_pages".to_string());
        Ok(inner.pages.iter().map(|p| p.handle.clone()).collect())
    }

    async fn duplicate_page(
        &self,
        template: &PageHandle,
        new_name: &str,
    ) -> GridCalResult<PageHandle> {
        let mut inner = self.lock();
        inner.calls.push(format!("duplicate_page:{new_name}"));
        let index = inner.page_index(template)?;
        let id = inner.next_id.to_string();
        inner.next_id += 1;
        let handle = PageHandle {
            id,
            name: new_name.to_string(),
        };
        let mut page = inner.pages[index].clone();
        page.handle = handle.clone();
        inner.pages.push(page);
        Ok(handle)
    }

    async fn rename_page(&self, page: &PageHandle, new_name: &str) -> GridCalResult<()> {
        let mut inner = self.lock();
        inner.calls.push(format!("rename_page:{new_name}"));
        let index = inner.page_index(page)?;
        inner.pages[index].handle.name = new_name.to_string();
        Ok(())
    }

    async fn delete_page(&self, page: &PageHandle) -> GridCalResult<()> {
        let mut inner = self.lock();
        inner.calls.push(format!("delete_page:{}", page.name));
        let index = inner.page_index(page)?;
        inner.pages.remove(index);
        Ok(())
    }

    async fn read_grid(&self, page: &PageHandle) -> GridCalResult<Vec<Vec<String>>> {
        let mut inner = self.lock();
        inner.calls.push(format!("read_grid:{}", page.name));
        let index = inner.page_index(page)?;
        let cells = &inner.pages[index].cells;

        let max_row = cells.keys().map(|(r, _)| *r).max().unwrap_or(0);
        let max_col = cells.keys().map(|(_, c)| *c).max().unwrap_or(0);
        let mut rows =
            vec![vec![String::new(); max_col as usize]; max_row as usize];
        for ((row, col), value) in cells {
            rows[(row - 1) as usize][(col - 1) as usize] = value.clone();
        }
        Ok(rows)
    }

    async fn write_ranges(&self, page: &PageHandle, writes: &[RangeWrite]) -> GridCalResult<()> {
        let mut inner = self.lock();
        inner.calls.push(format!("write_ranges:{}", page.name));
        inner.check_failure(page)?;
        let index = inner.page_index(page)?;
        for (range, values) in writes {
            let ((r1, c1), _) = parse_a1_range(range)
                .ok_or_else(|| GridCalError::Validation(format!("Bad A1 range '{range}'")))?;
            for (dr, row_values) in values.iter().enumerate() {
                for (dc, value) in row_values.iter().enumerate() {
                    let key = (r1 + dr as u32, c1 + dc as u32);
                    if value.is_empty() {
                        inner.pages[index].cells.remove(&key);
                    } else {
                        inner.pages[index].cells.insert(key, value.clone());
                    }
                }
            }
        }
        Ok(())
    }

    async fn clear_ranges(&self, page: &PageHandle, ranges: &[String]) -> GridCalResult<()> {
        let mut inner = self.lock();
        inner.calls.push(format!("clear_ranges:{}", page.name));
        inner.check_failure(page)?;
        let index = inner.page_index(page)?;
        for range in ranges {
            for key in range_cells(range)? {
                inner.pages[index].cells.remove(&key);
            }
        }
        Ok(())
    }

    async fn format_ranges(&self, page: &PageHandle, formats: &[RangeStyle]) -> GridCalResult<()> {
        let mut inner = self.lock();
        inner.calls.push(format!("format_ranges:{}", page.name));
        inner.check_failure(page)?;
        let index = inner.page_index(page)?;
        for (range, style) in formats {
            for key in range_cells(range)? {
                if style.is_reset() {
                    inner.pages[index].styles.remove(&key);
                } else {
                    inner.pages[index].styles.insert(key, style.clone());
                }
            }
        }
        Ok(())
    }

    async fn copy_page_to_archive(&self, page: &PageHandle) -> GridCalResult<()> {
        let mut inner = self.lock();
        inner.calls.push(format!("copy_page_to_archive:{}", page.name));
        inner.check_failure(page)?;
        let index = inner.page_index(page)?;
        let copy = inner.pages[index].clone();
        inner.archive.push(copy);
        Ok(())
    }

    async fn list_archive_pages(&self) -> GridCalResult<Vec<PageHandle>> {
        let mut inner = self.lock();
        inner.calls.push("list_archive_pages".to_string());
        Ok(inner.archive.iter().map(|p| p.handle.clone()).collect())
    }

    async fn delete_archive_page(&self, page: &PageHandle) -> GridCalResult<()> {
        let mut inner = self.lock();
        inner.calls.push(format!("delete_archive_page:{}", page.name));
        if let Some(index) = inner.archive.iter().position(|p| p.handle.id == page.id) {
            inner.archive.remove(index);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::{BorderStyle, Rgb};

    fn handle_for(surface: &MemorySurface, name: &str) -> PageHandle {
        surface
            .lock()
            .pages
            .iter()
            .find(|p| p.handle.name == name)
            .map(|p| p.handle.clone())
            .expect("page exists")
    }

    #[tokio::test]
    async fn test_duplicate_copies_template_labels() {
        let surface = MemorySurface::with_week_template("Template", &GridLayout::default());
        let template = handle_for(&surface, "Template");
        surface.duplicate_page(&template, "20-26 Oct").await.unwrap();

        assert_eq!(surface.cell("20-26 Oct", 1, 2).as_deref(), Some("Monday"));
        assert_eq!(surface.cell("20-26 Oct", 2, 1).as_deref(), Some("07:00"));
    }

    #[tokio::test]
    async fn test_write_clear_format_round_trip() {
        let surface = MemorySurface::with_week_template("Template", &GridLayout::default());
        let template = handle_for(&surface, "Template");
        let page = surface.duplicate_page(&template, "wk").await.unwrap();

        surface
            .write_ranges(&page, &[("B2".to_string(), vec![vec!["Gym".to_string()]])])
            .await
            .unwrap();
        assert_eq!(surface.cell("wk", 2, 2).as_deref(), Some("Gym"));

        let style = CellStyle {
            background: Some(Rgb::new(0.2, 0.2, 0.2)),
            text_color: Some(Rgb::WHITE),
            bold: true,
            wrap: true,
            border: BorderStyle::Solid,
        };
        surface
            .format_ranges(&page, &[("B2:B3".to_string(), style.clone())])
            .await
            .unwrap();
        assert_eq!(surface.style("wk", 3, 2), Some(style));

        surface
            .clear_ranges(&page, &["B2:B3".to_string()])
            .await
            .unwrap();
        assert_eq!(surface.cell("wk", 2, 2), None);
        // Clearing content leaves formatting; reset removes it.
        assert!(surface.style("wk", 2, 2).is_some());
        surface
            .format_ranges(&page, &[("B2:B3".to_string(), CellStyle::reset())])
            .await
            .unwrap();
        assert_eq!(surface.style("wk", 2, 2), None);
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let surface = MemorySurface::with_week_template("Template", &GridLayout::default());
        let template = handle_for(&surface, "Template");
        let page = surface.duplicate_page(&template, "bad").await.unwrap();
        surface.inject_failure("bad");

        let err = surface
            .write_ranges(&page, &[("B2".to_string(), vec![vec!["x".to_string()]])])
            .await
            .unwrap_err();
        assert!(matches!(err, GridCalError::Surface(_)));
    }
}
