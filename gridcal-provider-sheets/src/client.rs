//! Sheets REST client implementing the surface port.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, error, info};

use gridcal_core::error::{GridCalError, GridCalResult};
use gridcal_core::grid::parse_a1_range;
use gridcal_core::surface::{
    BorderStyle, CellStyle, PageHandle, RangeStyle, RangeWrite, Rgb, Surface,
};

use crate::config::SheetsConfig;

pub struct SheetsSurface {
    client: Client,
    config: SheetsConfig,
}

#[derive(Deserialize)]
struct SpreadsheetMeta {
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Deserialize)]
struct SheetProperties {
    #[serde(rename = "sheetId")]
    sheet_id: i64,
    title: String,
}

#[derive(Deserialize)]
struct ValuesResponse {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

#[derive(Deserialize)]
struct BatchUpdateResponse {
    #[serde(default)]
    replies: Vec<BatchUpdateReply>,
}

#[derive(Deserialize)]
struct BatchUpdateReply {
    #[serde(rename = "duplicateSheet")]
    duplicate_sheet: Option<DuplicateSheetReply>,
}

#[derive(Deserialize)]
struct DuplicateSheetReply {
    properties: SheetProperties,
}

impl SheetsSurface {
    pub fn new(config: SheetsConfig) -> GridCalResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| GridCalError::Surface(format!("HTTP client init failed: {e}")))?;
        info!(spreadsheet = %config.spreadsheet_id, "sheets surface initialized");
        Ok(SheetsSurface { client, config })
    }

    fn values_url(&self, spreadsheet: &str, suffix: &str) -> String {
        format!(
            "{}/spreadsheets/{}/values{}",
            self.config.base_url, spreadsheet, suffix
        )
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> GridCalResult<T> {
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.config.access_token)
            .send()
            .await
            .map_err(|e| GridCalError::Surface(format!("Request failed: {e}")))?;
        Self::parse(response).await
    }

    async fn post_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        body: &Value,
    ) -> GridCalResult<T> {
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.config.access_token)
            .json(body)
            .send()
            .await
            .map_err(|e| GridCalError::Surface(format!("Request failed: {e}")))?;
        Self::parse(response).await
    }

    async fn parse<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> GridCalResult<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(%status, "sheets API call failed: {}", body);
            return Err(GridCalError::Surface(format!(
                "API call failed: {status} - {body}"
            )));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| GridCalError::Surface(format!("Unparseable response: {e}")))
    }

    async fn list_sheet_pages(&self, spreadsheet: &str) -> GridCalResult<Vec<PageHandle>> {
        let url = format!(
            "{}/spreadsheets/{}?fields=sheets.properties(sheetId,title)",
            self.config.base_url, spreadsheet
        );
        let meta: SpreadsheetMeta = self.get_json(&url).await?;
        Ok(meta
            .sheets
            .into_iter()
            .map(|s| PageHandle {
                id: s.properties.sheet_id.to_string(),
                name: s.properties.title,
            })
            .collect())
    }

    async fn batch_update(
        &self,
        spreadsheet: &str,
        requests: Vec<Value>,
    ) -> GridCalResult<BatchUpdateResponse> {
        let url = format!(
            "{}/spreadsheets/{}:batchUpdate",
            self.config.base_url, spreadsheet
        );
        self.post_json(&url, &json!({ "requests": requests })).await
    }
}

/// "'Page title'!B2:B5" with embedded quotes doubled per A1 syntax.
fn quoted_range(page: &str, range: &str) -> String {
    format!("'{}'!{}", page.replace('\'', "''"), range)
}

fn sheet_id_of(page: &PageHandle) -> GridCalResult<i64> {
    page.id
        .parse::<i64>()
        .map_err(|_| GridCalError::Surface(format!("Bad sheet id '{}'", page.id)))
}

fn color_json(color: Rgb) -> Value {
    json!({ "red": color.r, "green": color.g, "blue": color.b })
}

fn grid_range_json(sheet_id: i64, range: &str) -> GridCalResult<Value> {
    let ((r1, c1), (r2, c2)) = parse_a1_range(range)
        .ok_or_else(|| GridCalError::Surface(format!("Bad A1 range '{range}'")))?;
    Ok(json!({
        "sheetId": sheet_id,
        "startRowIndex": r1 - 1,
        "endRowIndex": r2,
        "startColumnIndex": c1 - 1,
        "endColumnIndex": c2,
    }))
}

/// A style maps to one repeatCell plus one updateBorders request.
fn style_requests(sheet_id: i64, range: &str, style: &CellStyle) -> GridCalResult<Vec<Value>> {
    let grid_range = grid_range_json(sheet_id, range)?;

    let repeat_cell = if style.is_reset() {
        json!({
            "repeatCell": {
                "range": grid_range,
                "cell": { "userEnteredFormat": {} },
                "fields": "userEnteredFormat",
            }
        })
    } else {
        let mut format = serde_json::Map::new();
        if let Some(background) = style.background {
            format.insert("backgroundColor".to_string(), color_json(background));
        }
        let mut text_format = serde_json::Map::new();
        text_format.insert("bold".to_string(), json!(style.bold));
        if let Some(text_color) = style.text_color {
            text_format.insert("foregroundColor".to_string(), color_json(text_color));
        }
        format.insert("textFormat".to_string(), Value::Object(text_format));
        if style.wrap {
            format.insert("wrapStrategy".to_string(), json!("WRAP"));
        }
        json!({
            "repeatCell": {
                "range": grid_range,
                "cell": { "userEnteredFormat": Value::Object(format) },
                "fields": "userEnteredFormat",
            }
        })
    };

    let border = match style.border {
        BorderStyle::Solid => json!({
            "style": "SOLID",
            "width": 1,
            "color": { "red": 0, "green": 0, "blue": 0 },
        }),
        BorderStyle::Clear => json!({ "style": "NONE" }),
    };
    let update_borders = json!({
        "updateBorders": {
            "range": grid_range_json(sheet_id, range)?,
            "top": border.clone(),
            "bottom": border.clone(),
            "left": border.clone(),
            "right": border,
        }
    });

    Ok(vec![repeat_cell, update_borders])
}

fn cell_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[async_trait]
impl Surface for SheetsSurface {
    async fn list_pages(&self) -> GridCalResult<Vec<PageHandle>> {
        self.list_sheet_pages(&self.config.spreadsheet_id).await
    }

    async fn duplicate_page(
        &self,
        template: &PageHandle,
        new_name: &str,
    ) -> GridCalResult<PageHandle> {
        let request = json!({
            "duplicateSheet": {
                "sourceSheetId": sheet_id_of(template)?,
                "newSheetName": new_name,
            }
        });
        let response = self
            .batch_update(&self.config.spreadsheet_id, vec![request])
            .await?;

        let properties = response
            .replies
            .into_iter()
            .find_map(|r| r.duplicate_sheet)
            .map(|r| r.properties)
            .ok_or_else(|| {
                GridCalError::Surface("duplicateSheet returned no properties".to_string())
            })?;
        info!(page = %properties.title, "page duplicated from template");
        Ok(PageHandle {
            id: properties.sheet_id.to_string(),
            name: properties.title,
        })
    }

    async fn rename_page(&self, page: &PageHandle, new_name: &str) -> GridCalResult<()> {
        let request = json!({
            "updateSheetProperties": {
                "properties": { "sheetId": sheet_id_of(page)?, "title": new_name },
                "fields": "title",
            }
        });
        self.batch_update(&self.config.spreadsheet_id, vec![request])
            .await?;
        Ok(())
    }

    async fn delete_page(&self, page: &PageHandle) -> GridCalResult<()> {
        let request = json!({ "deleteSheet": { "sheetId": sheet_id_of(page)? } });
        self.batch_update(&self.config.spreadsheet_id, vec![request])
            .await?;
        Ok(())
    }

    async fn read_grid(&self, page: &PageHandle) -> GridCalResult<Vec<Vec<String>>> {
        let range = format!("'{}'", page.name.replace('\'', "''"));
        let url = self.values_url(&self.config.spreadsheet_id, &format!("/{range}"));
        let response: ValuesResponse = self.get_json(&url).await?;
        debug!(page = %page.name, rows = response.values.len(), "grid read");
        Ok(response
            .values
            .iter()
            .map(|row| row.iter().map(cell_to_string).collect())
            .collect())
    }

    async fn write_ranges(&self, page: &PageHandle, writes: &[RangeWrite]) -> GridCalResult<()> {
        if writes.is_empty() {
            return Ok(());
        }
        let data: Vec<Value> = writes
            .iter()
            .map(|(range, values)| {
                json!({
                    "range": quoted_range(&page.name, range),
                    "values": values,
                })
            })
            .collect();
        let url = self.values_url(&self.config.spreadsheet_id, ":batchUpdate");
        let body = json!({
            "valueInputOption": "USER_ENTERED",
            "data": data,
        });
        let _: Value = self.post_json(&url, &body).await?;
        debug!(page = %page.name, ranges = writes.len(), "ranges written");
        Ok(())
    }

    async fn clear_ranges(&self, page: &PageHandle, ranges: &[String]) -> GridCalResult<()> {
        if ranges.is_empty() {
            return Ok(());
        }
        let ranges: Vec<String> = ranges
            .iter()
            .map(|range| quoted_range(&page.name, range))
            .collect();
        let url = self.values_url(&self.config.spreadsheet_id, ":batchClear");
        let _: Value = self.post_json(&url, &json!({ "ranges": ranges })).await?;
        Ok(())
    }

    async fn format_ranges(&self, page: &PageHandle, formats: &[RangeStyle]) -> GridCalResult<()> {
        if formats.is_empty() {
            return Ok(());
        }
        let sheet_id = sheet_id_of(page)?;
        let mut requests = Vec::with_capacity(formats.len() * 2);
        for (range, style) in formats {
            requests.extend(style_requests(sheet_id, range, style)?);
        }
        self.batch_update(&self.config.spreadsheet_id, requests)
            .await?;
        Ok(())
    }

    async fn copy_page_to_archive(&self, page: &PageHandle) -> GridCalResult<()> {
        let url = format!(
            "{}/spreadsheets/{}/sheets/{}:copyTo",
            self.config.base_url,
            self.config.spreadsheet_id,
            sheet_id_of(page)?
        );
        let body = json!({ "destinationSpreadsheetId": self.config.archive_spreadsheet_id });
        let copy: SheetProperties = self.post_json(&url, &body).await?;

        // The copy arrives named "Copy of X"; restore the week name.
        let rename = json!({
            "updateSheetProperties": {
                "properties": { "sheetId": copy.sheet_id, "title": page.name },
                "fields": "title",
            }
        });
        self.batch_update(&self.config.archive_spreadsheet_id, vec![rename])
            .await?;
        info!(page = %page.name, "page copied to archive");
        Ok(())
    }

    async fn list_archive_pages(&self) -> GridCalResult<Vec<PageHandle>> {
        self.list_sheet_pages(&self.config.archive_spreadsheet_id)
            .await
    }

    async fn delete_archive_page(&self, page: &PageHandle) -> GridCalResult<()> {
        let request = json!({ "deleteSheet": { "sheetId": sheet_id_of(page)? } });
        self.batch_update(&self.config.archive_spreadsheet_id, vec![request])
            .await?;
        Ok(())
    }
}
