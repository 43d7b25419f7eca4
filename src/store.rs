use std::collections::{BTreeSet, HashMap, HashSet};

use async_trait::async_trait;

use crate::errors::DashboardResult;
use crate::kpi::{PriorReading, PriorWeek};
use crate::models::{
    month_name, ComputedIndicator, MetricDefinition, MetricSeries, MonthlySnapshots, SnapshotWeek,
    WeeklySnapshot,
};

pub const MAX_WEEK: u32 = 5;

#[async_trait]
pub trait MetricCatalog: Send + Sync {
    /// Active metrics in display order.
    async fn active_metrics(&self) -> DashboardResult<Vec<MetricDefinition>>;

    /// Inverse flag of every known metric, active or not.
    async fn inverse_flags(&self) -> DashboardResult<HashMap<String, bool>>;
}

#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Replaces every row stored for `(month, year, week)` with one row per
    /// indicator. Returns the number of rows written.
    async fn save_snapshot(
        &self,
        indicators: &[ComputedIndicator],
        month: u32,
        year: i32,
        week: u32,
    ) -> DashboardResult<usize>;

    /// All rows for the month, newest snapshot first.
    async fn month_rows(&self, month: u32, year: i32) -> DashboardResult<Vec<WeeklySnapshot>>;

    async fn delete_week(&self, month: u32, year: i32, week: u32) -> DashboardResult<u64>;

    async fn has_data(&self, month: u32, year: i32) -> DashboardResult<bool> {
        Ok(!self.month_rows(month, year).await?.is_empty())
    }

    async fn snapshots_for_month(&self, month: u32, year: i32) -> DashboardResult<MonthlySnapshots> {
        let rows = self.month_rows(month, year).await?;
        Ok(group_weekly_series(&rows, month, year))
    }
}

/// Builds the week-over-week lookup from a month's rows (newest first): the
/// latest percentage per metric, and every row sharing the newest
/// `snapshot_date`.
pub fn prior_week(rows: &[WeeklySnapshot], inverse_flags: &HashMap<String, bool>) -> PriorWeek {
    let mut percentages = HashMap::new();
    for row in rows {
        percentages
            .entry(row.metric_code.clone())
            .or_insert(row.percentage);
    }

    let last_batch = match rows.iter().map(|row| row.snapshot_date).max() {
        Some(latest) => rows
            .iter()
            .filter(|row| row.snapshot_date == latest)
            .map(|row| PriorReading {
                percentage: row.percentage,
                is_inverse: inverse_flags.get(&row.metric_code).copied().unwrap_or(false),
            })
            .collect(),
        None => Vec::new(),
    };

    PriorWeek {
        percentages,
        last_batch,
    }
}

/// Groups a month's rows into one weekly series per metric, ordered by
/// metric code and week. Weeks outside 1..=5 are dropped and only the first
/// row per (metric, week) is kept.
pub fn group_weekly_series(rows: &[WeeklySnapshot], month: u32, year: i32) -> MonthlySnapshots {
    let mut sorted: Vec<&WeeklySnapshot> = rows
        .iter()
        .filter(|row| (1..=MAX_WEEK).contains(&row.week_number))
        .collect();
    sorted.sort_by(|a, b| {
        a.metric_code
            .cmp(&b.metric_code)
            .then(a.week_number.cmp(&b.week_number))
    });

    let mut indicators: Vec<MetricSeries> = Vec::new();
    let mut weeks = BTreeSet::new();
    let mut seen = HashSet::new();

    for row in sorted {
        weeks.insert(row.week_number);
        if !seen.insert((row.metric_code.as_str(), row.week_number)) {
            continue;
        }
        let week = SnapshotWeek {
            week: row.week_number,
            target: row.target_value,
            actual: row.actual_value,
            percentage: row.percentage,
        };
        match indicators.last_mut() {
            Some(series) if series.code == row.metric_code => series.weeks.push(week),
            _ => indicators.push(MetricSeries {
                code: row.metric_code.clone(),
                department: row.department.clone(),
                name: row.metric_name.clone(),
                weeks: vec![week],
            }),
        }
    }

    MonthlySnapshots {
        indicators,
        available_weeks: weeks.into_iter().collect(),
        month,
        year,
        month_name: month_name(month).to_string(),
    }
}

#[cfg(test)]
pub(crate) mod memory {
    use super::*;
    use chrono::Utc;
    use std::sync::Mutex;

    #[derive(Default)]
    pub(crate) struct MemoryStore {
        pub metrics: Vec<MetricDefinition>,
        pub rows: Mutex<Vec<WeeklySnapshot>>,
    }

    #[async_trait]
    impl MetricCatalog for MemoryStore {
        async fn active_metrics(&self) -> DashboardResult<Vec<MetricDefinition>> {
            let mut metrics: Vec<MetricDefinition> =
                self.metrics.iter().filter(|m| m.is_active).cloned().collect();
            metrics.sort_by_key(|m| m.display_order);
            Ok(metrics)
        }

        async fn inverse_flags(&self) -> DashboardResult<HashMap<String, bool>> {
            Ok(self
                .metrics
                .iter()
                .map(|m| (m.code.clone(), m.is_inverse))
                .collect())
        }
    }

    #[async_trait]
    impl SnapshotStore for MemoryStore {
        async fn save_snapshot(
            &self,
            indicators: &[ComputedIndicator],
            month: u32,
            year: i32,
            week: u32,
        ) -> DashboardResult<usize> {
            let now = Utc::now();
            let mut rows = self.rows.lock().unwrap();
            rows.retain(|r| !(r.month == month && r.year == year && r.week_number == week));
            rows.extend(indicators.iter().map(|indicator| WeeklySnapshot {
                metric_code: indicator.code.clone(),
                department: indicator.department.clone(),
                metric_name: indicator.name.clone(),
                target_value: indicator.target,
                actual_value: indicator.actual,
                percentage: indicator.percentage,
                snapshot_date: now,
                month,
                week_number: week,
                year,
            }));
            Ok(indicators.len())
        }

        async fn month_rows(&self, month: u32, year: i32) -> DashboardResult<Vec<WeeklySnapshot>> {
            let mut rows: Vec<WeeklySnapshot> = self
                .rows
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.month == month && r.year == year)
                .cloned()
                .collect();
            rows.sort_by(|a, b| b.snapshot_date.cmp(&a.snapshot_date));
            Ok(rows)
        }

        async fn delete_week(&self, month: u32, year: i32, week: u32) -> DashboardResult<u64> {
            let mut rows = self.rows.lock().unwrap();
            let before = rows.len();
            rows.retain(|r| !(r.month == month && r.year == year && r.week_number == week));
            Ok((before - rows.len()) as u64)
        }
    }
}
