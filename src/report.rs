use std::fmt::Write;

use crate::models::{ComputedIndicator, DashboardResponse, Direction, MonthlySnapshots};

fn signed(value: f64) -> String {
    if value > 0.0 {
        format!("+{value:.1}")
    } else {
        format!("{value:.1}")
    }
}

fn arrow(direction: Direction) -> &'static str {
    match direction {
        Direction::Up => "▲",
        Direction::Down => "▼",
        Direction::Neutral => "–",
    }
}

/// Indicators sorted worst first: lowest achievement for normal metrics,
/// highest for inverse ones.
fn needs_attention(indicators: &[ComputedIndicator]) -> Vec<&ComputedIndicator> {
    let mut flagged: Vec<&ComputedIndicator> = indicators
        .iter()
        .filter(|indicator| !indicator.status.is_green())
        .collect();
    flagged.sort_by(|a, b| {
        let key = |i: &ComputedIndicator| if i.is_inverse { -i.percentage } else { i.percentage };
        key(*a).partial_cmp(&key(*b)).unwrap_or(std::cmp::Ordering::Equal)
    });
    flagged
}

pub fn build_report(dashboard: &DashboardResponse, history: Option<&MonthlySnapshots>) -> String {
    let mut output = String::new();
    let overall = &dashboard.overall_performance;
    let trend = &dashboard.weekly_trend;
    let schedule = &dashboard.schedule_summary;

    let _ = writeln!(output, "# Weekly KPI Report");
    let _ = writeln!(
        output,
        "Generated for {} {} at {}",
        dashboard.period.month_name,
        dashboard.period.year,
        dashboard.last_updated.format("%Y-%m-%d %H:%M UTC")
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Overall");
    let _ = writeln!(
        output,
        "- {:.1}% of indicators on target ({})",
        overall.percentage,
        overall.status.as_str()
    );
    let _ = writeln!(
        output,
        "- {} green, {} yellow, {} red",
        overall.green_count, overall.yellow_count, overall.red_count
    );
    let _ = writeln!(
        output,
        "- Week over week: {} {} pts ({} green indicators)",
        arrow(trend.direction),
        signed(trend.change),
        if trend.green_count_change >= 0 {
            format!("+{}", trend.green_count_change)
        } else {
            trend.green_count_change.to_string()
        }
    );
    let _ = writeln!(
        output,
        "- Schedule: {} ahead, {} on schedule, {} behind",
        schedule.ahead_count, schedule.on_schedule_count, schedule.behind_count
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Indicators");
    if dashboard.indicators.is_empty() {
        let _ = writeln!(output, "No indicator data for this period.");
    } else {
        let _ = writeln!(
            output,
            "| Code | Department | Indicator | Target | Actual | % | Status | WoW | Variance | Schedule |"
        );
        let _ = writeln!(output, "|---|---|---|---:|---:|---:|---|---|---:|---|");
        for indicator in &dashboard.indicators {
            let _ = writeln!(
                output,
                "| {} | {} | {}{} | {:.2} | {:.2} | {:.1} | {} | {} {} | {}% | {} |",
                indicator.code,
                indicator.department,
                indicator.name,
                if indicator.is_inverse { " (max)" } else { "" },
                indicator.target,
                indicator.actual,
                indicator.percentage,
                indicator.status.as_str(),
                arrow(indicator.wow_direction),
                signed(indicator.wow_change),
                signed(indicator.variance),
                indicator.schedule_status.as_str()
            );
        }
    }

    let flagged = needs_attention(&dashboard.indicators);
    let _ = writeln!(output);
    let _ = writeln!(output, "## Needs Attention");
    if flagged.is_empty() {
        let _ = writeln!(output, "Every indicator is green.");
    } else {
        for indicator in flagged.iter().take(5) {
            let _ = writeln!(
                output,
                "- {} ({}): {:.1}% of target, {} with {}% variance",
                indicator.name,
                indicator.status.as_str(),
                indicator.percentage,
                indicator.schedule_status.as_str().replace('_', " "),
                signed(indicator.variance)
            );
        }
    }

    if let Some(history) = history {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Weekly History");
        if history.indicators.is_empty() {
            let _ = writeln!(output, "No snapshots saved for this month.");
        } else {
            for series in &history.indicators {
                let weeks: Vec<String> = series
                    .weeks
                    .iter()
                    .map(|week| {
                        format!(
                            "W{} {:.2}/{:.2} ({:.1}%)",
                            week.week, week.actual, week.target, week.percentage
                        )
                    })
                    .collect();
                let _ = writeln!(output, "- {}: {}", series.name, weeks.join(", "));
            }
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kpi::{compute, PriorWeek};
    use crate::models::{MetricSeries, Period, RawMetricReading, SnapshotWeek};
    use chrono::{NaiveDate, Utc};

    fn dashboard() -> DashboardResponse {
        let readings = vec![
            RawMetricReading {
                code: "KPI-01".to_string(),
                department: "FINANCE".to_string(),
                name: "Revenue Group".to_string(),
                target: 100.0,
                actual: 90.0,
                sheet_percentage: 90.0,
                is_inverse: false,
            },
            RawMetricReading {
                code: "KPI-10".to_string(),
                department: "HC".to_string(),
                name: "Turn Over".to_string(),
                target: 10.0,
                actual: 12.0,
                sheet_percentage: 120.0,
                is_inverse: true,
            },
        ];
        let card = compute(
            &readings,
            &PriorWeek::default(),
            NaiveDate::from_ymd_opt(2026, 3, 15).unwrap(),
            3,
            2026,
        );
        DashboardResponse {
            period: Period {
                month: 3,
                year: 2026,
                month_name: "March".to_string(),
            },
            overall_performance: card.overall,
            weekly_trend: card.weekly_trend,
            schedule_summary: card.schedule,
            indicators: card.indicators,
            last_updated: Utc::now(),
        }
    }

    #[test]
    fn report_lists_indicators_and_flags_red_ones() {
        let report = build_report(&dashboard(), None);

        assert!(report.contains("# Weekly KPI Report"));
        assert!(report.contains("Generated for March 2026"));
        assert!(report.contains("- 1 green, 0 yellow, 1 red"));
        assert!(report.contains("| KPI-10 | HC | Turn Over (max) |"));
        assert!(report.contains("- Turn Over (red): 120.0% of target"));
        assert!(!report.contains("## Weekly History"));
    }

    #[test]
    fn history_shows_actual_against_target() {
        let history = MonthlySnapshots {
            indicators: vec![MetricSeries {
                code: "KPI-01".to_string(),
                department: "FINANCE".to_string(),
                name: "Revenue Group".to_string(),
                weeks: vec![SnapshotWeek {
                    week: 2,
                    target: 100.0,
                    actual: 81.5,
                    percentage: 81.5,
                }],
            }],
            available_weeks: vec![2],
            month: 3,
            year: 2026,
            month_name: "March".to_string(),
        };
        let report = build_report(&dashboard(), Some(&history));

        assert!(report.contains("## Weekly History"));
        assert!(report.contains("- Revenue Group: W2 81.50/100.00 (81.5%)"));
    }

    #[test]
    fn empty_dashboard_still_renders() {
        let mut empty = dashboard();
        empty.indicators.clear();
        let report = build_report(&empty, None);
        assert!(report.contains("No indicator data for this period."));
        assert!(report.contains("Every indicator is green."));
    }
}
