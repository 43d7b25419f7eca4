use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use serde_json::Value;

use crate::errors::{DashboardError, DashboardResult};

pub type SheetRows = Vec<Vec<Value>>;

/// Read access to the external spreadsheet. Ranges are A1 strings such as
/// `'Dashboard Template'!A12:BT12`.
#[async_trait]
pub trait SheetSource: Send + Sync {
    async fn read_range(&self, range: &str) -> DashboardResult<SheetRows>;

    /// Reads several ranges in one round-trip. The result holds one entry per
    /// requested range, in request order.
    async fn batch_read(&self, ranges: &[String]) -> DashboardResult<Vec<SheetRows>>;

    /// Cheap metadata request used to verify access. Returns the spreadsheet title.
    async fn probe(&self) -> DashboardResult<String>;
}

/// Where the scorecard lives inside the spreadsheet.
#[derive(Debug, Clone)]
pub struct SheetTarget {
    pub sheet_name: String,
    pub label_column: String,
}

impl SheetTarget {
    pub fn header_range(&self) -> String {
        format!("{}!1:1", quote_sheet_name(&self.sheet_name))
    }

    pub fn label_range(&self) -> String {
        format!(
            "{}!{col}:{col}",
            quote_sheet_name(&self.sheet_name),
            col = self.label_column
        )
    }

    pub fn row_range(&self, row: u32, last_column: usize) -> String {
        format!(
            "{}!A{row}:{}{row}",
            quote_sheet_name(&self.sheet_name),
            column_letter(last_column)
        )
    }
}

pub fn quote_sheet_name(name: &str) -> String {
    if name.contains(' ') {
        format!("'{name}'")
    } else {
        name.to_string()
    }
}

/// Zero-based column index to spreadsheet letters: 0 → A, 25 → Z, 26 → AA.
pub fn column_letter(index: usize) -> String {
    let mut letters = Vec::new();
    let mut remaining = index + 1;
    while remaining > 0 {
        let offset = (remaining - 1) % 26;
        letters.push(char::from(b'A' + offset as u8));
        remaining = (remaining - 1) / 26;
    }
    letters.iter().rev().collect()
}

/// Accepts either a bare spreadsheet id or a full browser URL
/// (`https://docs.google.com/spreadsheets/d/<id>/edit#gid=0`).
pub fn extract_spreadsheet_id(input: &str) -> String {
    let input = input.trim();
    if input.contains("docs.google.com/spreadsheets") {
        if let Some((_, rest)) = input.split_once("/d/") {
            return rest.split('/').next().unwrap_or(rest).to_string();
        }
    }
    input.to_string()
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: SheetRows,
}

#[derive(Debug, Deserialize)]
struct BatchResponse {
    #[serde(default, rename = "valueRanges")]
    value_ranges: Vec<ValueRange>,
}

#[derive(Debug, Deserialize)]
struct SpreadsheetMeta {
    #[serde(default)]
    properties: Option<SpreadsheetProperties>,
}

#[derive(Debug, Deserialize)]
struct SpreadsheetProperties {
    #[serde(default)]
    title: String,
}

/// Client for the Sheets v4 values API.
#[derive(Clone)]
pub struct SheetsClient {
    http: reqwest::Client,
    api_base: String,
    spreadsheet_id: String,
    access_token: Option<String>,
}

impl SheetsClient {
    pub fn new(
        api_base: &str,
        spreadsheet_id: &str,
        access_token: Option<String>,
        timeout: Duration,
    ) -> DashboardResult<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            spreadsheet_id: spreadsheet_id.to_string(),
            access_token,
        })
    }

    fn spreadsheet_url(&self, tail: &[&str]) -> DashboardResult<Url> {
        let mut url = Url::parse(&self.api_base)
            .map_err(|error| DashboardError::Invalid(format!("bad sheets api base: {error}")))?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| DashboardError::Invalid("sheets api base cannot be a base".into()))?;
            segments.pop_if_empty();
            segments.extend(["v4", "spreadsheets", self.spreadsheet_id.as_str()]);
            segments.extend(tail);
        }
        Ok(url)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: Url,
        query: &[(&str, &str)],
    ) -> DashboardResult<T> {
        let mut request = self.http.get(url).query(query);
        if let Some(token) = &self.access_token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?.error_for_status()?;
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl SheetSource for SheetsClient {
    async fn read_range(&self, range: &str) -> DashboardResult<SheetRows> {
        let url = self.spreadsheet_url(&["values", range])?;
        let body: ValueRange = self.get_json(url, &[]).await?;
        Ok(body.values)
    }

    async fn batch_read(&self, ranges: &[String]) -> DashboardResult<Vec<SheetRows>> {
        let url = self.spreadsheet_url(&["values:batchGet"])?;
        let query: Vec<(&str, &str)> = ranges.iter().map(|r| ("ranges", r.as_str())).collect();
        let body: BatchResponse = self.get_json(url, &query).await?;
        Ok(body.value_ranges.into_iter().map(|r| r.values).collect())
    }

    async fn probe(&self) -> DashboardResult<String> {
        let url = self.spreadsheet_url(&[])?;
        let meta: SpreadsheetMeta = self.get_json(url, &[("fields", "properties.title")]).await?;
        Ok(meta.properties.map(|p| p.title).unwrap_or_default())
    }
}
