use std::sync::Arc;

use chrono::{Datelike, NaiveDate, Utc};

use crate::errors::{DashboardError, DashboardResult};
use crate::fetcher::MetricFetcher;
use crate::kpi::{self, Scorecard};
use crate::models::{
    month_name, DashboardResponse, MonthOption, MonthsOverview, Period, RawMetricReading,
};
use crate::store::{prior_week, MetricCatalog, SnapshotStore, MAX_WEEK};

pub struct DashboardService {
    catalog: Arc<dyn MetricCatalog>,
    store: Arc<dyn SnapshotStore>,
    fetcher: MetricFetcher,
    spreadsheet_year: i32,
}

pub fn validate_period(month: u32, year: i32) -> DashboardResult<()> {
    if !(1..=12).contains(&month) {
        return Err(DashboardError::Invalid(format!("month {month} is outside 1-12")));
    }
    if !(2020..=2100).contains(&year) {
        return Err(DashboardError::Invalid(format!("year {year} is outside 2020-2100")));
    }
    Ok(())
}

impl DashboardService {
    pub fn new(
        catalog: Arc<dyn MetricCatalog>,
        store: Arc<dyn SnapshotStore>,
        fetcher: MetricFetcher,
        spreadsheet_year: i32,
    ) -> Self {
        Self {
            catalog,
            store,
            fetcher,
            spreadsheet_year,
        }
    }

    pub fn fetcher(&self) -> &MetricFetcher {
        &self.fetcher
    }

    async fn readings(&self, month: u32, year: i32) -> DashboardResult<Vec<RawMetricReading>> {
        if year != self.spreadsheet_year {
            tracing::info!(
                year,
                spreadsheet_year = self.spreadsheet_year,
                "requested year is not in the spreadsheet, skipping fetch"
            );
            return Ok(Vec::new());
        }
        let definitions = self.catalog.active_metrics().await?;
        self.fetcher.fetch_metric_data(&definitions, month).await
    }

    pub async fn scorecard(&self, month: u32, year: i32, today: NaiveDate) -> DashboardResult<Scorecard> {
        validate_period(month, year)?;
        let readings = self.readings(month, year).await?;
        let rows = self.store.month_rows(month, year).await?;
        let flags = self.catalog.inverse_flags().await?;
        let prior = prior_week(&rows, &flags);
        Ok(kpi::compute(&readings, &prior, today, month, year))
    }

    pub async fn dashboard(&self, month: u32, year: i32, today: NaiveDate) -> DashboardResult<DashboardResponse> {
        let card = self.scorecard(month, year, today).await?;
        Ok(DashboardResponse {
            period: Period {
                month,
                year,
                month_name: month_name(month).to_string(),
            },
            overall_performance: card.overall,
            weekly_trend: card.weekly_trend,
            schedule_summary: card.schedule,
            indicators: card.indicators,
            last_updated: Utc::now(),
        })
    }

    /// Computes the current scorecard and stores it as `week` of the month,
    /// replacing whatever that week held before.
    pub async fn save_week(&self, month: u32, year: i32, week: u32, today: NaiveDate) -> DashboardResult<usize> {
        if !(1..=MAX_WEEK).contains(&week) {
            return Err(DashboardError::Invalid(format!("week {week} is outside 1-{MAX_WEEK}")));
        }
        let card = self.scorecard(month, year, today).await?;
        self.store.save_snapshot(&card.indicators, month, year, week).await
    }
}

/// The spreadsheet year's twelve months, flagged by whether any week was saved.
/// Only reads the snapshot store, so it works before a source is configured.
pub async fn available_months(
    store: &dyn SnapshotStore,
    year: i32,
    today: NaiveDate,
) -> DashboardResult<MonthsOverview> {
    let mut available_months = Vec::with_capacity(12);
    for month in 1..=12 {
        available_months.push(MonthOption {
            month,
            year,
            label: format!("{} {year}", month_name(month)),
            has_data: store.has_data(month, year).await?,
        });
    }
    let current_month = if today.year() == year { today.month() } else { 1 };

    Ok(MonthsOverview {
        available_months,
        current_month,
        current_year: year,
    })
}
