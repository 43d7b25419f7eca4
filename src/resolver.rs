use crate::layout::LayoutSnapshot;
use crate::models::MetricDefinition;

/// Finds the sheet row holding a metric.
///
/// The configured label wins; when it occurs more than once the row nearest
/// the fallback row is used (first one on a tie). Without a label match the
/// fallback row is used if it is positive. `None` means the metric is skipped.
pub fn resolve_row(definition: &MetricDefinition, layout: &LayoutSnapshot) -> Option<u32> {
    if !definition.sheet_label.trim().is_empty() {
        let rows = layout.rows_for(&definition.sheet_label);
        match rows {
            [] => {
                tracing::warn!(
                    code = %definition.code,
                    label = %definition.sheet_label,
                    fallback_row = definition.fallback_row,
                    "label not found in sheet, using fallback row"
                );
            }
            [only] => return Some(*only),
            [first, rest @ ..] => {
                let fallback = i64::from(definition.fallback_row);
                let distance = |row: u32| (i64::from(row) - fallback).abs();
                let mut best = *first;
                for row in rest {
                    if distance(*row) < distance(best) {
                        best = *row;
                    }
                }
                tracing::info!(
                    code = %definition.code,
                    label = %definition.sheet_label,
                    candidates = ?rows,
                    chosen = best,
                    "label matched several rows, using the one closest to the fallback row"
                );
                return Some(best);
            }
        }
    }

    if definition.fallback_row > 0 {
        return u32::try_from(definition.fallback_row).ok();
    }

    tracing::warn!(code = %definition.code, "no label match and no fallback row, skipping metric");
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::discover;
    use serde_json::json;

    fn definition(label: &str, fallback_row: i32) -> MetricDefinition {
        MetricDefinition {
            code: "KPI-09".to_string(),
            department: "DELIVERY".to_string(),
            name: "Customer Satisfaction".to_string(),
            unit: "score".to_string(),
            sheet_label: label.to_string(),
            fallback_row,
            is_inverse: false,
            display_order: 9,
            is_active: true,
        }
    }

    fn layout_with(rows: &[(u32, &str)]) -> LayoutSnapshot {
        let height = rows.iter().map(|(row, _)| *row).max().unwrap_or(1) as usize;
        let mut column = vec![Vec::new(); height];
        for (row, label) in rows {
            column[*row as usize - 1] = vec![json!(label)];
        }
        discover(&[json!("January")], &column).unwrap()
    }

    #[test]
    fn duplicate_label_prefers_row_nearest_fallback() {
        let layout = layout_with(&[(36, "Customer Satisfaction"), (61, "Customer Satisfaction")]);
        assert_eq!(resolve_row(&definition("Customer Satisfaction", 36), &layout), Some(36));
        assert_eq!(resolve_row(&definition("Customer Satisfaction", 58), &layout), Some(61));
    }

    #[test]
    fn equal_distance_keeps_first_row() {
        let layout = layout_with(&[(10, "Uptime"), (20, "Uptime")]);
        assert_eq!(resolve_row(&definition("uptime", 15), &layout), Some(10));
    }

    #[test]
    fn single_match_ignores_fallback() {
        let layout = layout_with(&[(14, "Total Sales")]);
        assert_eq!(resolve_row(&definition(" total sales ", 3), &layout), Some(14));
    }

    #[test]
    fn missing_label_falls_back_to_configured_row() {
        let layout = layout_with(&[(14, "Total Sales")]);
        assert_eq!(resolve_row(&definition("Renamed KPI", 22), &layout), Some(22));
        assert_eq!(resolve_row(&definition("", 22), &layout), Some(22));
    }

    #[test]
    fn no_label_and_no_fallback_is_skipped() {
        let layout = layout_with(&[(14, "Total Sales")]);
        assert_eq!(resolve_row(&definition("Renamed KPI", 0), &layout), None);
        assert_eq!(resolve_row(&definition("", -1), &layout), None);
    }
}
