//! Google Sheets implementation of the gridcal surface port.
//!
//! Talks to the Sheets REST API with a pre-issued OAuth bearer token;
//! obtaining and refreshing credentials is the caller's concern. The
//! live spreadsheet holds the weekly pages, a second spreadsheet holds
//! the archive.

mod client;
mod config;

pub use client::SheetsSurface;
pub use config::SheetsConfig;
