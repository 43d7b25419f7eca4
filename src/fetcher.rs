use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::cache::LayoutCache;
use crate::errors::DashboardResult;
use crate::layout::MonthColumns;
use crate::models::{month_name, MetricDefinition, RawMetricReading};
use crate::resolver::resolve_row;
use crate::sheets::SheetSource;
use crate::values::parse_cell;

/// Reads every active metric's row for one month in a single batch request.
pub struct MetricFetcher {
    source: Arc<dyn SheetSource>,
    cache: Arc<LayoutCache>,
    timeout: Duration,
}

impl MetricFetcher {
    pub fn new(source: Arc<dyn SheetSource>, cache: Arc<LayoutCache>, timeout: Duration) -> Self {
        Self {
            source,
            cache,
            timeout,
        }
    }

    pub fn cache(&self) -> &LayoutCache {
        &self.cache
    }

    /// Fails only when no layout can be obtained at all. A failed batch read
    /// degrades to zero-valued readings and a month missing from the sheet
    /// yields no readings.
    pub async fn fetch_metric_data(
        &self,
        definitions: &[MetricDefinition],
        month: u32,
    ) -> DashboardResult<Vec<RawMetricReading>> {
        let layout = self.cache.get_layout().await?;

        let Some(columns) = layout.columns_for(month).copied() else {
            tracing::warn!(month = month_name(month), "month not found in sheet header");
            return Ok(Vec::new());
        };
        let Some(last_column) = columns.read_columns().max() else {
            tracing::warn!(month = month_name(month), "month has no readable columns");
            return Ok(Vec::new());
        };

        let target = self.cache.target();
        let mut resolved: Vec<&MetricDefinition> = Vec::new();
        let mut ranges: Vec<String> = Vec::new();
        for definition in definitions.iter().filter(|d| d.is_active) {
            if let Some(row) = resolve_row(definition, &layout) {
                ranges.push(target.row_range(row, last_column));
                resolved.push(definition);
            }
        }

        if ranges.is_empty() {
            return Ok(Vec::new());
        }

        tracing::info!(
            metrics = ranges.len(),
            month = month_name(month),
            "batch fetching metric rows"
        );

        let response = match tokio::time::timeout(self.timeout, self.source.batch_read(&ranges)).await {
            Ok(result) => result,
            Err(elapsed) => Err(elapsed.into()),
        };
        let value_ranges = match response {
            Ok(value_ranges) => value_ranges,
            Err(error) => {
                tracing::warn!(error = %error, "batch fetch failed, returning zeroed readings");
                return Ok(resolved.into_iter().map(RawMetricReading::zeroed).collect());
            }
        };

        if value_ranges.len() != resolved.len() {
            tracing::warn!(
                requested = resolved.len(),
                returned = value_ranges.len(),
                "batch response size differs from request"
            );
        }

        let readings: Vec<RawMetricReading> = resolved
            .into_iter()
            .zip(value_ranges)
            .map(|(definition, rows)| {
                let reading = parse_metric_row(definition, &rows, &columns);
                tracing::debug!(
                    code = %reading.code,
                    target = reading.target,
                    actual = reading.actual,
                    sheet_percentage = reading.sheet_percentage,
                    "parsed metric row"
                );
                reading
            })
            .collect();

        tracing::info!(metrics = readings.len(), "fetched metric rows");
        Ok(readings)
    }
}

/// Pulls target, actual and the sheet's own percentage out of one fetched row.
/// Cells past the end of a short row read as zero.
pub fn parse_metric_row(
    definition: &MetricDefinition,
    rows: &[Vec<Value>],
    columns: &MonthColumns,
) -> RawMetricReading {
    let mut reading = RawMetricReading::zeroed(definition);
    let Some(row) = rows.first() else {
        return reading;
    };

    let cell = |index: Option<usize>| parse_cell(index.and_then(|i| row.get(i)));
    reading.target = cell(columns.target);
    reading.actual = cell(columns.actual);
    reading.sheet_percentage = cell(columns.percent);
    reading
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::tests::FakeSheet;
    use serde_json::json;
    use std::sync::atomic::Ordering;

    fn definition(code: &str, label: &str, fallback_row: i32, active: bool) -> MetricDefinition {
        MetricDefinition {
            code: code.to_string(),
            department: "FINANCE".to_string(),
            name: label.to_string(),
            unit: "B".to_string(),
            sheet_label: label.to_string(),
            fallback_row,
            is_inverse: false,
            display_order: 1,
            is_active: active,
        }
    }

    fn fetcher(sheet: Arc<FakeSheet>) -> MetricFetcher {
        let cache = Arc::new(LayoutCache::new(
            Arc::clone(&sheet) as Arc<dyn SheetSource>,
            FakeSheet::target(),
            Duration::from_secs(300),
            Duration::from_secs(5),
        ));
        MetricFetcher::new(sheet, cache, Duration::from_secs(5))
    }

    fn sheet_with_rows() -> FakeSheet {
        let mut sheet = FakeSheet::new();
        sheet.rows.insert(
            "Scorecard!A3:G3".to_string(),
            vec![vec![
                json!("1"),
                json!("FINANCE"),
                json!("Revenue Group"),
                json!("1,000"),
                json!("ignored"),
                json!("85%"),
                json!("850"),
            ]],
        );
        sheet.rows.insert(
            "Scorecard!A9:G9".to_string(),
            vec![vec![json!("2"), json!("HC"), json!("Turn Over"), json!(5)]],
        );
        sheet
    }

    #[tokio::test]
    async fn one_batch_request_maps_rows_positionally() {
        let sheet = Arc::new(sheet_with_rows());
        let fetcher = fetcher(Arc::clone(&sheet));
        let definitions = vec![
            definition("KPI-01", "Revenue Group", 3, true),
            definition("KPI-99", "Retired", 5, false),
            definition("KPI-10", "Turn Over", 9, true),
        ];

        let readings = fetcher.fetch_metric_data(&definitions, 3).await.unwrap();

        assert_eq!(sheet.batch_reads.load(Ordering::SeqCst), 1);
        assert_eq!(readings.len(), 2);
        assert_eq!(readings[0].code, "KPI-01");
        assert_eq!(readings[0].target, 1000.0);
        assert_eq!(readings[0].actual, 850.0);
        assert_eq!(readings[0].sheet_percentage, 85.0);
        // short row: only the target cell is present
        assert_eq!(readings[1].code, "KPI-10");
        assert_eq!(readings[1].target, 5.0);
        assert_eq!(readings[1].actual, 0.0);
    }

    #[tokio::test]
    async fn failed_batch_degrades_to_zeroed_readings() {
        let sheet = Arc::new(sheet_with_rows());
        let fetcher = fetcher(Arc::clone(&sheet));
        fetcher.cache().get_layout().await.unwrap();
        sheet.failing.store(true, Ordering::SeqCst);

        let definitions = vec![definition("KPI-01", "Revenue Group", 3, true)];
        let readings = fetcher.fetch_metric_data(&definitions, 3).await.unwrap();

        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0].target, 0.0);
        assert_eq!(readings[0].actual, 0.0);
    }

    #[tokio::test]
    async fn slow_batch_degrades_to_zeroed_readings() {
        let mut slow = sheet_with_rows();
        slow.batch_delay = Duration::from_millis(200);
        let sheet = Arc::new(slow);
        let cache = Arc::new(LayoutCache::new(
            Arc::clone(&sheet) as Arc<dyn SheetSource>,
            FakeSheet::target(),
            Duration::from_secs(300),
            Duration::from_secs(5),
        ));
        let fetcher = MetricFetcher::new(sheet, cache, Duration::from_millis(20));

        let definitions = vec![definition("KPI-01", "Revenue Group", 3, true)];
        let readings = fetcher.fetch_metric_data(&definitions, 3).await.unwrap();

        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0].code, "KPI-01");
        assert_eq!(readings[0].target, 0.0);
        assert_eq!(readings[0].actual, 0.0);
    }

    #[tokio::test]
    async fn unknown_month_yields_no_readings() {
        let sheet = Arc::new(sheet_with_rows());
        let fetcher = fetcher(Arc::clone(&sheet));
        let definitions = vec![definition("KPI-01", "Revenue Group", 3, true)];

        let readings = fetcher.fetch_metric_data(&definitions, 7).await.unwrap();

        assert!(readings.is_empty());
        assert_eq!(sheet.batch_reads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unresolvable_metrics_are_skipped() {
        let sheet = Arc::new(sheet_with_rows());
        let fetcher = fetcher(Arc::clone(&sheet));
        let definitions = vec![
            definition("KPI-01", "Revenue Group", 3, true),
            definition("KPI-77", "Nowhere", 0, true),
        ];

        let readings = fetcher.fetch_metric_data(&definitions, 3).await.unwrap();

        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0].code, "KPI-01");
    }

    #[test]
    fn empty_row_reads_as_zero() {
        let columns = MonthColumns {
            target: Some(3),
            lagging: Some(4),
            percent: Some(5),
            actual: Some(6),
        };
        let reading = parse_metric_row(&definition("KPI-01", "x", 1, true), &[], &columns);
        assert_eq!(reading.target, 0.0);
        assert_eq!(reading.actual, 0.0);
    }
}
