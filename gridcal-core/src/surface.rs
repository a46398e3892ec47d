//! The external tabular surface port.
//!
//! The engine only depends on this narrow interface: list pages,
//! duplicate/rename/delete a page, read a grid, and batched
//! write/clear/format of A1-style ranges. The real spreadsheet client
//! lives in a provider crate; tests run against the in-memory
//! implementation in [`crate::memory`]. Authentication and credential
//! loading are the provider's problem.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::GridCalResult;

/// Handle to one page of the surface (one calendar week).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageHandle {
    /// Surface-assigned page id, stable across renames.
    pub id: String,
    pub name: String,
}

/// A color in the surface's 0.0–1.0 RGB space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rgb {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb { r: 0.0, g: 0.0, b: 0.0 };
    pub const WHITE: Rgb = Rgb { r: 1.0, g: 1.0, b: 1.0 };

    pub const fn new(r: f32, g: f32, b: f32) -> Self {
        Rgb { r, g, b }
    }

    /// Perceived luminance (ITU-R BT.601 weights).
    pub fn luminance(self) -> f32 {
        0.299 * self.r + 0.587 * self.g + 0.114 * self.b
    }

    /// Text color that stays readable on this background: black on
    /// light (> 0.7), white on dark.
    pub fn readable_text(self) -> Rgb {
        if self.luminance() > 0.7 {
            Rgb::BLACK
        } else {
            Rgb::WHITE
        }
    }
}

/// Outer border treatment for a formatted range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BorderStyle {
    Solid,
    Clear,
}

/// Cell formatting. A style fully replaces whatever formatting the
/// range had; [`CellStyle::reset`] restores the default look.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellStyle {
    pub background: Option<Rgb>,
    pub text_color: Option<Rgb>,
    pub bold: bool,
    pub wrap: bool,
    pub border: BorderStyle,
}

impl CellStyle {
    /// The default, formatting-free look.
    pub fn reset() -> Self {
        CellStyle {
            background: None,
            text_color: None,
            bold: false,
            wrap: false,
            border: BorderStyle::Clear,
        }
    }

    pub fn is_reset(&self) -> bool {
        *self == CellStyle::reset()
    }
}

/// One batched range write: (A1 range, row-major values).
pub type RangeWrite = (String, Vec<Vec<String>>);

/// One batched range format: (A1 range, style).
pub type RangeStyle = (String, CellStyle);

/// The surface operations the engine depends on. Every method maps to
/// a single underlying API call; batching across ranges happens here,
/// batching across pages happens in the dispatcher.
#[async_trait]
pub trait Surface: Send + Sync {
    async fn list_pages(&self) -> GridCalResult<Vec<PageHandle>>;

    /// Copy the template page under a new name.
    async fn duplicate_page(
        &self,
        template: &PageHandle,
        new_name: &str,
    ) -> GridCalResult<PageHandle>;

    async fn rename_page(&self, page: &PageHandle, new_name: &str) -> GridCalResult<()>;

    async fn delete_page(&self, page: &PageHandle) -> GridCalResult<()>;

    /// Read the page's whole grid as rows of cell strings.
    async fn read_grid(&self, page: &PageHandle) -> GridCalResult<Vec<Vec<String>>>;

    /// Write several ranges of one page in a single call.
    async fn write_ranges(&self, page: &PageHandle, writes: &[RangeWrite]) -> GridCalResult<()>;

    /// Clear several ranges of one page in a single call (content
    /// only; formatting is untouched).
    async fn clear_ranges(&self, page: &PageHandle, ranges: &[String]) -> GridCalResult<()>;

    /// Format several ranges of one page in a single call.
    async fn format_ranges(&self, page: &PageHandle, formats: &[RangeStyle]) -> GridCalResult<()>;

    /// Copy a live page onto the archival surface.
    async fn copy_page_to_archive(&self, page: &PageHandle) -> GridCalResult<()>;

    async fn list_archive_pages(&self) -> GridCalResult<Vec<PageHandle>>;

    async fn delete_archive_page(&self, page: &PageHandle) -> GridCalResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_luminance_weights() {
        assert!((Rgb::WHITE.luminance() - 1.0).abs() < 1e-6);
        assert!(Rgb::BLACK.luminance() < 1e-6);
        // Pure green carries most of the weight.
        assert!((Rgb::new(0.0, 1.0, 0.0).luminance() - 0.587).abs() < 1e-6);
    }

    #[test]
    fn test_readable_text_flips_on_threshold() {
        assert_eq!(Rgb::new(0.9, 0.9, 0.9).readable_text(), Rgb::BLACK);
        assert_eq!(Rgb::new(0.2, 0.2, 0.6).readable_text(), Rgb::WHITE);
    }

    #[test]
    fn test_reset_style_round_trip() {
        assert!(CellStyle::reset().is_reset());
        let mut style = CellStyle::reset();
        style.bold = true;
        assert!(!style.is_reset());
    }
}
