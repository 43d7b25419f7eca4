use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::errors::{DashboardError, DashboardResult};
use crate::models::month_name;
use crate::sheets::{column_letter, SheetSource, SheetTarget};

/// Zero-based column positions of one month's column group. A slot stays
/// `None` when the header row has no matching cell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MonthColumns {
    pub target: Option<usize>,
    pub lagging: Option<usize>,
    pub percent: Option<usize>,
    pub actual: Option<usize>,
}

impl MonthColumns {
    /// Columns the fetcher reads. Lagging is discovered but never read.
    pub fn read_columns(&self) -> impl Iterator<Item = usize> {
        [self.target, self.percent, self.actual].into_iter().flatten()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Target,
    Lagging,
    Percent,
    Actual,
}

/// Where each month's columns and each metric's rows currently live.
/// Built once by [`discover`] and shared read-only afterwards.
#[derive(Debug, Clone)]
pub struct LayoutSnapshot {
    pub month_columns: BTreeMap<u32, MonthColumns>,
    /// Normalized label → 1-based row numbers in sheet order. Duplicates are kept.
    pub label_rows: HashMap<String, Vec<u32>>,
    pub captured_at: DateTime<Utc>,
}

impl LayoutSnapshot {
    pub fn columns_for(&self, month: u32) -> Option<&MonthColumns> {
        self.month_columns.get(&month)
    }

    pub fn rows_for(&self, label: &str) -> &[u32] {
        self.label_rows
            .get(&normalize_label(label))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

pub fn normalize_label(label: &str) -> String {
    label.trim().to_lowercase()
}

fn month_from_name(name: &str) -> Option<u32> {
    (1..=12).find(|month| month_name(*month).eq_ignore_ascii_case(name))
}

/// Classifies one header cell. Recognized shapes, case-insensitive:
/// `"<Month> Target"`, `"<Month> Lagging"`, `"% <Month> Performance"` and a
/// bare `"<Month>"` for the actual column.
pub fn match_month_header(header: &str) -> Option<(u32, ColumnKind)> {
    let lower = header.trim().to_lowercase();

    if let Some(middle) = lower
        .strip_prefix("% ")
        .and_then(|rest| rest.strip_suffix(" performance"))
    {
        return month_from_name(middle.trim()).map(|month| (month, ColumnKind::Percent));
    }
    if let Some(name) = lower.strip_suffix(" target") {
        return month_from_name(name).map(|month| (month, ColumnKind::Target));
    }
    if let Some(name) = lower.strip_suffix(" lagging") {
        return month_from_name(name).map(|month| (month, ColumnKind::Lagging));
    }
    month_from_name(&lower).map(|month| (month, ColumnKind::Actual))
}

/// Builds a snapshot from the raw header row and the raw label column.
///
/// When two header cells claim the same month and slot, the one further to
/// the right wins.
pub fn discover(header: &[Value], label_column: &[Vec<Value>]) -> DashboardResult<LayoutSnapshot> {
    if header.is_empty() {
        return Err(DashboardError::Discovery("header row is empty".into()));
    }
    if label_column.is_empty() {
        return Err(DashboardError::Discovery("label column is empty".into()));
    }

    let mut month_columns: BTreeMap<u32, MonthColumns> = BTreeMap::new();
    for (index, cell) in header.iter().enumerate() {
        let Some(text) = cell.as_str() else {
            continue;
        };
        let Some((month, kind)) = match_month_header(text) else {
            continue;
        };

        let entry = month_columns.entry(month).or_default();
        let slot = match kind {
            ColumnKind::Target => &mut entry.target,
            ColumnKind::Lagging => &mut entry.lagging,
            ColumnKind::Percent => &mut entry.percent,
            ColumnKind::Actual => &mut entry.actual,
        };
        if let Some(previous) = slot.replace(index) {
            tracing::debug!(
                month,
                kind = ?kind,
                previous = %column_letter(previous),
                current = %column_letter(index),
                "duplicate month header, keeping the later column"
            );
        }
    }

    let mut label_rows: HashMap<String, Vec<u32>> = HashMap::new();
    for (index, row) in label_column.iter().enumerate() {
        let Some(text) = row.first().and_then(Value::as_str) else {
            continue;
        };
        let key = normalize_label(text);
        if key.is_empty() {
            continue;
        }
        label_rows.entry(key).or_default().push(index as u32 + 1);
    }
    if label_rows.is_empty() {
        return Err(DashboardError::Discovery(
            "label column has no text cells".into(),
        ));
    }

    tracing::info!(
        months = month_columns.len(),
        labels = label_rows.len(),
        "discovered sheet layout"
    );
    for (month, columns) in &month_columns {
        tracing::debug!(
            month = month_name(*month),
            target = ?columns.target.map(column_letter),
            lagging = ?columns.lagging.map(column_letter),
            percent = ?columns.percent.map(column_letter),
            actual = ?columns.actual.map(column_letter),
            "month columns"
        );
    }

    Ok(LayoutSnapshot {
        month_columns,
        label_rows,
        captured_at: Utc::now(),
    })
}

/// One discovery round-trip: reads the header row and the label column, then
/// runs [`discover`] over them.
pub async fn discover_from_source(
    source: &dyn SheetSource,
    target: &SheetTarget,
) -> DashboardResult<LayoutSnapshot> {
    let header_rows = source.read_range(&target.header_range()).await?;
    let header = header_rows.into_iter().next().unwrap_or_default();
    let labels = source.read_range(&target.label_range()).await?;
    discover(&header, &labels)
}
