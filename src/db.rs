use std::collections::HashMap;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::errors::DashboardResult;
use crate::models::{ComputedIndicator, MetricDefinition, SourceSettings, WeeklySnapshot};
use crate::store::{MetricCatalog, SnapshotStore};

const SETTING_SPREADSHEET_ID: &str = "spreadsheet_id";
const SETTING_SHEET_NAME: &str = "sheet_name";

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub fn default_metrics() -> Vec<MetricDefinition> {
    let metric = |code: &str,
                  department: &str,
                  name: &str,
                  unit: &str,
                  sheet_label: &str,
                  fallback_row: i32,
                  is_inverse: bool,
                  display_order: i32| MetricDefinition {
        code: code.to_string(),
        department: department.to_string(),
        name: name.to_string(),
        unit: unit.to_string(),
        sheet_label: sheet_label.to_string(),
        fallback_row,
        is_inverse,
        display_order,
        is_active: true,
    };

    vec![
        metric("KPI-01", "FINANCE", "Revenue Group", "B", "Revenue Group", 3, false, 1),
        metric("KPI-02", "MARKETING", "MQL-SQL Conversion Rate", "%", "MQL - SQL CR", 12, false, 2),
        metric("KPI-03", "SALES", "Total Sales", "B", "Total Sales", 14, false, 3),
        metric("KPI-04", "OPERATIONS", "COGS & OPEX", "B", "COGS & OPEX", 20, false, 4),
        metric("KPI-05", "FINANCE", "% Collection (Ontime)", "%", "% Collection (Ontime)", 22, false, 5),
        metric("KPI-06", "IT OPERATIONS", "System Uptime", "%", "System Uptime", 23, false, 6),
        metric("KPI-07", "PS", "Non Billable Cost", "IDR", "Non Billable Cost Ratio (max)", 27, true, 7),
        metric(
            "KPI-08",
            "PS",
            "Ontime Timesheet Collection",
            "%",
            "Ontime Timesheet Approval Colledtion",
            29,
            false,
            8,
        ),
        metric("KPI-09", "DELIVERY", "Customer Satisfaction", "score", "Customer Satisfaction", 36, false, 9),
        metric("KPI-10", "HC", "Turn Over", "people", "Turn Over (max / up to)", 42, true, 10),
        metric("KPI-11", "BD", "MQL Outbound", "leads", "MQL Outbound", 47, false, 11),
        metric("KPI-12", "TA", "PS Talents Placement", "people", "PS Talents Placement", 60, false, 12),
    ]
}

async fn upsert_metric(pool: &PgPool, metric: &MetricDefinition) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO kpi_dashboard.metrics
        (code, department, name, unit, sheet_label, fallback_row, is_inverse, display_order, is_active)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        ON CONFLICT (code) DO UPDATE
        SET department = EXCLUDED.department,
            name = EXCLUDED.name,
            unit = EXCLUDED.unit,
            sheet_label = EXCLUDED.sheet_label,
            fallback_row = EXCLUDED.fallback_row,
            is_inverse = EXCLUDED.is_inverse,
            display_order = EXCLUDED.display_order,
            is_active = EXCLUDED.is_active
        "#,
    )
    .bind(&metric.code)
    .bind(&metric.department)
    .bind(&metric.name)
    .bind(&metric.unit)
    .bind(&metric.sheet_label)
    .bind(metric.fallback_row)
    .bind(metric.is_inverse)
    .bind(metric.display_order)
    .bind(metric.is_active)
    .execute(pool)
    .await
    .with_context(|| format!("failed to upsert metric {}", metric.code))?;
    Ok(())
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<usize> {
    let metrics = default_metrics();
    for metric in &metrics {
        upsert_metric(pool, metric).await?;
        tracing::info!(code = %metric.code, label = %metric.sheet_label, "seeded metric");
    }
    Ok(metrics.len())
}

pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        code: String,
        department: String,
        name: String,
        #[serde(default)]
        unit: String,
        #[serde(default)]
        sheet_label: String,
        #[serde(default)]
        fallback_row: i32,
        #[serde(default)]
        is_inverse: bool,
        #[serde(default)]
        display_order: i32,
        is_active: Option<bool>,
    }

    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut imported = 0usize;

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        let metric = MetricDefinition {
            code: row.code,
            department: row.department,
            name: row.name,
            unit: row.unit,
            sheet_label: row.sheet_label,
            fallback_row: row.fallback_row,
            is_inverse: row.is_inverse,
            display_order: row.display_order,
            is_active: row.is_active.unwrap_or(true),
        };
        upsert_metric(pool, &metric).await?;
        imported += 1;
    }

    Ok(imported)
}

pub async fn load_source_settings(pool: &PgPool) -> anyhow::Result<HashMap<String, String>> {
    let rows = sqlx::query("SELECT key, value FROM kpi_dashboard.settings")
        .fetch_all(pool)
        .await
        .context("failed to load settings")?;
    Ok(rows
        .into_iter()
        .map(|row| (row.get::<String, _>("key"), row.get::<String, _>("value")))
        .filter(|(_, value)| !value.is_empty())
        .collect())
}

pub fn apply_source_settings(base: &SourceSettings, stored: &HashMap<String, String>) -> SourceSettings {
    SourceSettings {
        spreadsheet_id: stored
            .get(SETTING_SPREADSHEET_ID)
            .cloned()
            .unwrap_or_else(|| base.spreadsheet_id.clone()),
        sheet_name: stored
            .get(SETTING_SHEET_NAME)
            .cloned()
            .unwrap_or_else(|| base.sheet_name.clone()),
    }
}

pub async fn save_source_settings(pool: &PgPool, settings: &SourceSettings) -> anyhow::Result<()> {
    for (key, value) in [
        (SETTING_SPREADSHEET_ID, &settings.spreadsheet_id),
        (SETTING_SHEET_NAME, &settings.sheet_name),
    ] {
        sqlx::query(
            r#"
            INSERT INTO kpi_dashboard.settings (key, value, updated_at)
            VALUES ($1, $2, now())
            ON CONFLICT (key) DO UPDATE
            SET value = EXCLUDED.value, updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(pool)
        .await
        .with_context(|| format!("failed to save setting {key}"))?;
    }
    Ok(())
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn metric_from_row(row: &PgRow) -> MetricDefinition {
    MetricDefinition {
        code: row.get("code"),
        department: row.get("department"),
        name: row.get("name"),
        unit: row.get("unit"),
        sheet_label: row.get("sheet_label"),
        fallback_row: row.get("fallback_row"),
        is_inverse: row.get("is_inverse"),
        display_order: row.get("display_order"),
        is_active: row.get("is_active"),
    }
}

fn snapshot_from_row(row: &PgRow) -> WeeklySnapshot {
    WeeklySnapshot {
        metric_code: row.get("metric_code"),
        department: row.get("department"),
        metric_name: row.get("metric_name"),
        target_value: row.get("target_value"),
        actual_value: row.get("actual_value"),
        percentage: row.get("percentage"),
        snapshot_date: row.get::<DateTime<Utc>, _>("snapshot_date"),
        month: row.get::<i32, _>("month").unsigned_abs(),
        week_number: row.get::<i32, _>("week_number").unsigned_abs(),
        year: row.get("year"),
    }
}

#[async_trait]
impl MetricCatalog for PgStore {
    async fn active_metrics(&self) -> DashboardResult<Vec<MetricDefinition>> {
        let rows = sqlx::query(
            r#"
            SELECT code, department, name, unit, sheet_label, fallback_row,
                   is_inverse, display_order, is_active
            FROM kpi_dashboard.metrics
            WHERE is_active
            ORDER BY display_order, code
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(metric_from_row).collect())
    }

    async fn inverse_flags(&self) -> DashboardResult<HashMap<String, bool>> {
        let rows = sqlx::query("SELECT code, is_inverse FROM kpi_dashboard.metrics")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|row| (row.get::<String, _>("code"), row.get::<bool, _>("is_inverse")))
            .collect())
    }
}

#[async_trait]
impl SnapshotStore for PgStore {
    async fn save_snapshot(
        &self,
        indicators: &[ComputedIndicator],
        month: u32,
        year: i32,
        week: u32,
    ) -> DashboardResult<usize> {
        let snapshot_date = Utc::now();
        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query(
            r#"
            DELETE FROM kpi_dashboard.weekly_snapshots
            WHERE month = $1 AND year = $2 AND week_number = $3
            "#,
        )
        .bind(month as i32)
        .bind(year)
        .bind(week as i32)
        .execute(&mut *tx)
        .await?;
        if deleted.rows_affected() > 0 {
            tracing::info!(
                rows = deleted.rows_affected(),
                month,
                year,
                week,
                "replacing existing snapshot rows"
            );
        }

        for indicator in indicators {
            sqlx::query(
                r#"
                INSERT INTO kpi_dashboard.weekly_snapshots
                (id, metric_code, department, metric_name, target_value, actual_value,
                 percentage, snapshot_date, month, week_number, year)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(&indicator.code)
            .bind(&indicator.department)
            .bind(&indicator.name)
            .bind(indicator.target)
            .bind(indicator.actual)
            .bind(indicator.percentage)
            .bind(snapshot_date)
            .bind(month as i32)
            .bind(week as i32)
            .bind(year)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        tracing::info!(rows = indicators.len(), month, year, week, "saved weekly snapshot");
        Ok(indicators.len())
    }

    async fn month_rows(&self, month: u32, year: i32) -> DashboardResult<Vec<WeeklySnapshot>> {
        let rows = sqlx::query(
            r#"
            SELECT metric_code, department, metric_name, target_value, actual_value,
                   percentage, snapshot_date, month, week_number, year
            FROM kpi_dashboard.weekly_snapshots
            WHERE month = $1 AND year = $2
            ORDER BY snapshot_date DESC, metric_code
            "#,
        )
        .bind(month as i32)
        .bind(year)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(snapshot_from_row).collect())
    }

    async fn delete_week(&self, month: u32, year: i32, week: u32) -> DashboardResult<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM kpi_dashboard.weekly_snapshots
            WHERE month = $1 AND year = $2 AND week_number = $3
            "#,
        )
        .bind(month as i32)
        .bind(year)
        .bind(week as i32)
        .execute(&self.pool)
        .await?;
        tracing::info!(rows = result.rows_affected(), month, year, week, "deleted snapshot week");
        Ok(result.rows_affected())
    }

    async fn has_data(&self, month: u32, year: i32) -> DashboardResult<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM kpi_dashboard.weekly_snapshots WHERE month = $1 AND year = $2
            )
            "#,
        )
        .bind(month as i32)
        .bind(year)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn default_catalog_has_unique_codes_and_two_inverse_metrics() {
        let metrics = default_metrics();
        let codes: HashSet<&str> = metrics.iter().map(|m| m.code.as_str()).collect();
        assert_eq!(codes.len(), 12);
        let inverse: Vec<&str> = metrics
            .iter()
            .filter(|m| m.is_inverse)
            .map(|m| m.code.as_str())
            .collect();
        assert_eq!(inverse, vec!["KPI-07", "KPI-10"]);
        assert!(metrics.iter().all(|m| m.fallback_row > 0));
    }

    #[test]
    fn stored_settings_override_configured_source() {
        let base = SourceSettings {
            spreadsheet_id: "env-id".to_string(),
            sheet_name: "DashboardTemplate".to_string(),
        };
        let stored = HashMap::from([(SETTING_SHEET_NAME.to_string(), "KPI 2026".to_string())]);

        let merged = apply_source_settings(&base, &stored);

        assert_eq!(merged.spreadsheet_id, "env-id");
        assert_eq!(merged.sheet_name, "KPI 2026");
    }
}
