use std::time::Duration;

use anyhow::Context;
use chrono::{Datelike, Utc};

use crate::models::SourceSettings;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub sheets_api_base: String,
    pub source: SourceSettings,
    pub access_token: Option<String>,
    pub label_column: String,
    pub spreadsheet_year: i32,
    pub layout_ttl: Duration,
    pub source_timeout: Duration,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let get_or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());
        let parse_u64 = |key: &str, default: u64| -> anyhow::Result<u64> {
            match get(key) {
                Some(raw) => raw
                    .trim()
                    .parse()
                    .with_context(|| format!("{key} must be a whole number of seconds")),
                None => Ok(default),
            }
        };

        let database_url = get("DATABASE_URL")
            .context("DATABASE_URL must be set to a production Postgres instance")?;
        let spreadsheet_year = match get("SPREADSHEET_YEAR") {
            Some(raw) => raw
                .trim()
                .parse()
                .context("SPREADSHEET_YEAR must be a year such as 2026")?,
            None => Utc::now().year(),
        };

        Ok(Self {
            database_url,
            sheets_api_base: get_or("SHEETS_API_BASE", "https://sheets.googleapis.com"),
            source: SourceSettings {
                spreadsheet_id: get_or("SPREADSHEET_ID", ""),
                sheet_name: get_or("SHEET_NAME", "DashboardTemplate"),
            },
            access_token: get("SHEETS_ACCESS_TOKEN"),
            label_column: get_or("LABEL_COLUMN", "C").to_uppercase(),
            spreadsheet_year,
            layout_ttl: Duration::from_secs(parse_u64("LAYOUT_TTL_SECS", 300)?),
            source_timeout: Duration::from_secs(parse_u64("SOURCE_TIMEOUT_SECS", 15)?),
        })
    }
}
