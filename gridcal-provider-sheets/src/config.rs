//! Provider configuration.

use serde::Deserialize;

fn default_base_url() -> String {
    "https://sheets.googleapis.com/v4".to_string()
}

/// Connection settings for the Sheets surface.
#[derive(Debug, Clone, Deserialize)]
pub struct SheetsConfig {
    /// Spreadsheet holding the live weekly pages.
    pub spreadsheet_id: String,
    /// Spreadsheet holding archived weeks.
    pub archive_spreadsheet_id: String,
    /// Pre-issued OAuth bearer token with spreadsheet scope.
    pub access_token: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
}
