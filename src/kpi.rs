use std::collections::HashMap;

use chrono::{Datelike, NaiveDate};

use crate::models::{
    days_in_month, ComputedIndicator, Direction, OverallPerformance, RawMetricReading,
    ScheduleStatus, ScheduleSummary, Status, WeeklyTrend,
};

const PERCENTAGE_CAP: f64 = 999.0;
const TREND_DEAD_ZONE: f64 = 0.5;
const SCHEDULE_BAND: f64 = 5.0;

/// One row of the most recent stored batch, enough to re-derive its status.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriorReading {
    pub percentage: f64,
    pub is_inverse: bool,
}

/// What the store remembers about earlier weeks of the same month.
#[derive(Debug, Clone, Default)]
pub struct PriorWeek {
    /// Latest stored percentage per metric code.
    pub percentages: HashMap<String, f64>,
    /// Every row of the most recent snapshot batch.
    pub last_batch: Vec<PriorReading>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Scorecard {
    pub indicators: Vec<ComputedIndicator>,
    pub overall: OverallPerformance,
    pub weekly_trend: WeeklyTrend,
    pub schedule: ScheduleSummary,
}

/// Achievement against target, capped at 999. Not floored: negative actuals
/// give negative percentages.
pub fn percentage(target: f64, actual: f64) -> f64 {
    if target == 0.0 {
        return 0.0;
    }
    (actual / target * 100.0).min(PERCENTAGE_CAP)
}

/// Per-metric status. The inverse table uses `>=` where the normal table
/// uses `>`; stored history depends on both boundaries.
pub fn classify(percentage: f64, is_inverse: bool) -> Status {
    if is_inverse {
        if percentage >= 100.0 {
            Status::Red
        } else if percentage >= 85.0 {
            Status::Yellow
        } else if percentage >= 55.0 {
            Status::Green
        } else {
            Status::Supergreen
        }
    } else if percentage > 100.0 {
        Status::Supergreen
    } else if percentage > 85.0 {
        Status::Green
    } else if percentage > 55.0 {
        Status::Yellow
    } else {
        Status::Red
    }
}

/// Status of the share of green metrics. Has no supergreen band.
pub fn overall_status(percentage: f64) -> Status {
    if percentage > 85.0 {
        Status::Green
    } else if percentage > 55.0 {
        Status::Yellow
    } else {
        Status::Red
    }
}

pub fn trend_direction(change: f64) -> Direction {
    if change > TREND_DEAD_ZONE {
        Direction::Up
    } else if change < -TREND_DEAD_ZONE {
        Direction::Down
    } else {
        Direction::Neutral
    }
}

/// Week-over-week change against the previous stored percentage. A missing or
/// zero previous value means there is nothing to compare against.
pub fn week_over_week(current: f64, previous: Option<f64>) -> (f64, Direction) {
    match previous {
        Some(previous) if previous != 0.0 => {
            let change = current - previous;
            (change, trend_direction(change))
        }
        _ => (0.0, Direction::Neutral),
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduleVariance {
    pub expected_progress: f64,
    pub variance: f64,
    pub status: ScheduleStatus,
}

/// Compares the actual value with the target prorated by elapsed days.
/// Positive variance always means "better than expected", whichever way the
/// metric points.
pub fn schedule_variance(
    target: f64,
    actual: f64,
    is_inverse: bool,
    day_of_month: u32,
    days_in_month: u32,
) -> ScheduleVariance {
    let on_schedule = |expected_progress| ScheduleVariance {
        expected_progress,
        variance: 0.0,
        status: ScheduleStatus::OnSchedule,
    };
    if target == 0.0 || days_in_month == 0 {
        return on_schedule(0.0);
    }

    let ratio = f64::from(day_of_month) / f64::from(days_in_month);
    let expected = target * ratio;
    if expected == 0.0 {
        return on_schedule(expected);
    }

    let raw = if is_inverse {
        (expected - actual) / expected * 100.0
    } else {
        (actual - expected) / expected * 100.0
    };
    let variance = round_to(raw, 1);
    let status = if variance > SCHEDULE_BAND {
        ScheduleStatus::Ahead
    } else if variance < -SCHEDULE_BAND {
        ScheduleStatus::Behind
    } else {
        ScheduleStatus::OnSchedule
    };

    ScheduleVariance {
        expected_progress: round_to(expected, 2),
        variance,
        status,
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

pub fn compute_indicator(
    reading: &RawMetricReading,
    previous: Option<f64>,
    day_of_month: u32,
    days_in_month: u32,
) -> ComputedIndicator {
    let percentage = percentage(reading.target, reading.actual);
    let (wow_change, wow_direction) = week_over_week(percentage, previous);
    let schedule = schedule_variance(
        reading.target,
        reading.actual,
        reading.is_inverse,
        day_of_month,
        days_in_month,
    );

    ComputedIndicator {
        code: reading.code.clone(),
        department: reading.department.clone(),
        name: reading.name.clone(),
        target: reading.target,
        actual: reading.actual,
        percentage,
        status: classify(percentage, reading.is_inverse),
        is_inverse: reading.is_inverse,
        wow_change,
        wow_direction,
        expected_progress: schedule.expected_progress,
        variance: schedule.variance,
        schedule_status: schedule.status,
    }
}

pub fn summarize(indicators: &[ComputedIndicator]) -> OverallPerformance {
    let mut green_count = 0;
    let mut yellow_count = 0;
    let mut red_count = 0;
    for indicator in indicators {
        match indicator.status {
            Status::Green | Status::Supergreen => green_count += 1,
            Status::Yellow => yellow_count += 1,
            Status::Red => red_count += 1,
        }
    }

    let total = green_count + yellow_count + red_count;
    let percentage = if total == 0 {
        0.0
    } else {
        green_count as f64 / total as f64 * 100.0
    };

    OverallPerformance {
        percentage,
        status: overall_status(percentage),
        green_count,
        yellow_count,
        red_count,
    }
}

/// Aggregate trend against the last stored batch, whose statuses are
/// re-derived from the stored percentages rather than read back.
pub fn weekly_trend(current: &OverallPerformance, last_batch: &[PriorReading]) -> WeeklyTrend {
    if last_batch.is_empty() {
        return WeeklyTrend {
            change: 0.0,
            direction: Direction::Neutral,
            green_count_change: current.green_count as i64,
        };
    }

    let previous_green = last_batch
        .iter()
        .filter(|prior| classify(prior.percentage, prior.is_inverse).is_green())
        .count();
    let previous_percentage = previous_green as f64 / last_batch.len() as f64 * 100.0;
    let change = current.percentage - previous_percentage;

    WeeklyTrend {
        change,
        direction: trend_direction(change),
        green_count_change: current.green_count as i64 - previous_green as i64,
    }
}

pub fn schedule_summary(indicators: &[ComputedIndicator]) -> ScheduleSummary {
    indicators
        .iter()
        .fold(ScheduleSummary::default(), |mut summary, indicator| {
            match indicator.schedule_status {
                ScheduleStatus::Ahead => summary.ahead_count += 1,
                ScheduleStatus::OnSchedule => summary.on_schedule_count += 1,
                ScheduleStatus::Behind => summary.behind_count += 1,
            }
            summary
        })
}

/// Turns one period's raw readings into the full scorecard. `today` drives the
/// day-of-month proration against the requested month's length.
pub fn compute(
    readings: &[RawMetricReading],
    prior: &PriorWeek,
    today: NaiveDate,
    month: u32,
    year: i32,
) -> Scorecard {
    let total_days = days_in_month(year, month);
    let indicators: Vec<ComputedIndicator> = readings
        .iter()
        .map(|reading| {
            let previous = prior.percentages.get(&reading.code).copied();
            compute_indicator(reading, previous, today.day(), total_days)
        })
        .collect();

    let overall = summarize(&indicators);
    let weekly_trend = weekly_trend(&overall, &prior.last_batch);
    let schedule = schedule_summary(&indicators);

    Scorecard {
        indicators,
        overall,
        weekly_trend,
        schedule,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(code: &str, target: f64, actual: f64, is_inverse: bool) -> RawMetricReading {
        RawMetricReading {
            code: code.to_string(),
            department: "OPS".to_string(),
            name: code.to_string(),
            target,
            actual,
            sheet_percentage: 0.0,
            is_inverse,
        }
    }

    #[test]
    fn percentage_is_ratio_capped_at_999() {
        assert_eq!(percentage(100.0, 90.0), 90.0);
        assert_eq!(percentage(0.0, 90.0), 0.0);
        assert_eq!(percentage(1.0, 50.0), 999.0);
        assert_eq!(percentage(10.0, -5.0), -50.0);
        for (target, actual) in [(3.0, 1.0), (7.5, 7.5), (250.0, 12.0)] {
            assert_eq!(percentage(target, actual), actual / target * 100.0);
        }
    }

    #[test]
    fn normal_thresholds_are_strict() {
        assert_eq!(classify(100.01, false), Status::Supergreen);
        assert_eq!(classify(100.0, false), Status::Green);
        assert_eq!(classify(85.01, false), Status::Green);
        assert_eq!(classify(85.0, false), Status::Yellow);
        assert_eq!(classify(55.01, false), Status::Yellow);
        assert_eq!(classify(55.0, false), Status::Red);
        assert_eq!(classify(-10.0, false), Status::Red);
    }

    #[test]
    fn inverse_thresholds_are_inclusive() {
        assert_eq!(classify(100.0, true), Status::Red);
        assert_eq!(classify(99.99, true), Status::Yellow);
        assert_eq!(classify(85.0, true), Status::Yellow);
        assert_eq!(classify(84.99, true), Status::Green);
        assert_eq!(classify(55.0, true), Status::Green);
        assert_eq!(classify(54.99, true), Status::Supergreen);
    }

    #[test]
    fn overall_status_has_no_supergreen() {
        assert_eq!(overall_status(100.0), Status::Green);
        assert_eq!(overall_status(85.0), Status::Yellow);
        assert_eq!(overall_status(55.0), Status::Red);
    }

    #[test]
    fn week_over_week_dead_zone() {
        assert_eq!(week_over_week(80.0, Some(79.5)), (0.5, Direction::Neutral));
        assert_eq!(week_over_week(79.5, Some(80.0)), (-0.5, Direction::Neutral));
        assert_eq!(week_over_week(81.0, Some(80.0)).1, Direction::Up);
        assert_eq!(week_over_week(79.0, Some(80.0)).1, Direction::Down);
        assert_eq!(week_over_week(79.0, Some(0.0)), (0.0, Direction::Neutral));
        assert_eq!(week_over_week(79.0, None), (0.0, Direction::Neutral));
    }

    #[test]
    fn normal_metric_ahead_of_schedule() {
        let indicator = compute_indicator(&reading("KPI-01", 100.0, 90.0, false), None, 15, 30);
        assert_eq!(indicator.percentage, 90.0);
        assert_eq!(indicator.status, Status::Green);
        assert_eq!(indicator.expected_progress, 50.0);
        assert_eq!(indicator.variance, 80.0);
        assert_eq!(indicator.schedule_status, ScheduleStatus::Ahead);
    }

    #[test]
    fn inverse_metric_over_cap_is_red() {
        let indicator = compute_indicator(&reading("KPI-10", 10.0, 12.0, true), None, 15, 30);
        assert_eq!(indicator.percentage, 120.0);
        assert_eq!(indicator.status, Status::Red);
        // expected 5, actual 12: (5 - 12) / 5 * 100
        assert_eq!(indicator.variance, -140.0);
        assert_eq!(indicator.schedule_status, ScheduleStatus::Behind);
    }

    #[test]
    fn variance_rounding_and_bands() {
        let result = schedule_variance(300.0, 104.0, false, 10, 31);
        assert_eq!(result.expected_progress, 96.77);
        assert_eq!(result.variance, 7.5);
        assert_eq!(result.status, ScheduleStatus::Ahead);

        let result = schedule_variance(100.0, 52.0, false, 15, 30);
        assert_eq!(result.variance, 4.0);
        assert_eq!(result.status, ScheduleStatus::OnSchedule);

        let result = schedule_variance(0.0, 52.0, false, 15, 30);
        assert_eq!(result.variance, 0.0);
        assert_eq!(result.expected_progress, 0.0);
        assert_eq!(result.status, ScheduleStatus::OnSchedule);
    }

    #[test]
    fn aggregate_counts_supergreen_as_green() {
        let readings = vec![
            reading("A", 100.0, 120.0, false),
            reading("B", 100.0, 90.0, false),
            reading("C", 100.0, 60.0, false),
            reading("D", 10.0, 12.0, true),
        ];
        let card = compute(
            &readings,
            &PriorWeek::default(),
            NaiveDate::from_ymd_opt(2026, 3, 15).unwrap(),
            3,
            2026,
        );

        assert_eq!(card.overall.green_count, 2);
        assert_eq!(card.overall.yellow_count, 1);
        assert_eq!(card.overall.red_count, 1);
        assert_eq!(card.overall.percentage, 50.0);
        assert_eq!(card.overall.status, Status::Red);
        assert_eq!(card.weekly_trend.direction, Direction::Neutral);
        assert_eq!(card.weekly_trend.green_count_change, 2);
    }

    #[test]
    fn empty_period_is_zero_percent() {
        let overall = summarize(&[]);
        assert_eq!(overall.percentage, 0.0);
        assert_eq!(overall.status, Status::Red);
    }

    #[test]
    fn weekly_trend_rederives_prior_statuses() {
        let current = OverallPerformance {
            percentage: 75.0,
            status: Status::Yellow,
            green_count: 3,
            yellow_count: 1,
            red_count: 0,
        };
        // 90 normal -> green, 50 inverse -> supergreen, 60 normal -> yellow, 100 inverse -> red
        let batch = vec![
            PriorReading { percentage: 90.0, is_inverse: false },
            PriorReading { percentage: 50.0, is_inverse: true },
            PriorReading { percentage: 60.0, is_inverse: false },
            PriorReading { percentage: 100.0, is_inverse: true },
        ];

        let trend = weekly_trend(&current, &batch);
        assert_eq!(trend.change, 25.0);
        assert_eq!(trend.direction, Direction::Up);
        assert_eq!(trend.green_count_change, 1);
    }

    #[test]
    fn compute_uses_prior_percentages_per_metric() {
        let mut prior = PriorWeek::default();
        prior.percentages.insert("KPI-01".to_string(), 80.0);
        let card = compute(
            &[reading("KPI-01", 100.0, 90.0, false), reading("KPI-02", 100.0, 90.0, false)],
            &prior,
            NaiveDate::from_ymd_opt(2026, 4, 15).unwrap(),
            4,
            2026,
        );

        assert_eq!(card.indicators[0].wow_change, 10.0);
        assert_eq!(card.indicators[0].wow_direction, Direction::Up);
        assert_eq!(card.indicators[1].wow_direction, Direction::Neutral);
        assert_eq!(card.schedule.ahead_count, 2);
    }
}
