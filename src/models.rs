use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct MetricDefinition {
    pub code: String,
    pub department: String,
    pub name: String,
    pub unit: String,
    /// Label expected in the sheet's label column. Empty means "use the fallback row".
    pub sheet_label: String,
    /// 1-based row used when the label lookup fails. Zero or negative means none.
    pub fallback_row: i32,
    pub is_inverse: bool,
    pub display_order: i32,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawMetricReading {
    pub code: String,
    pub department: String,
    pub name: String,
    pub target: f64,
    pub actual: f64,
    /// The sheet's own "% <Month> Performance" cell, kept for diagnostics only.
    pub sheet_percentage: f64,
    pub is_inverse: bool,
}

impl RawMetricReading {
    pub fn zeroed(definition: &MetricDefinition) -> Self {
        Self {
            code: definition.code.clone(),
            department: definition.department.clone(),
            name: definition.name.clone(),
            target: 0.0,
            actual: 0.0,
            sheet_percentage: 0.0,
            is_inverse: definition.is_inverse,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Supergreen,
    Green,
    Yellow,
    Red,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Supergreen => "supergreen",
            Status::Green => "green",
            Status::Yellow => "yellow",
            Status::Red => "red",
        }
    }

    pub fn is_green(self) -> bool {
        matches!(self, Status::Green | Status::Supergreen)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
    Neutral,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
            Direction::Neutral => "neutral",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleStatus {
    Ahead,
    OnSchedule,
    Behind,
}

impl ScheduleStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ScheduleStatus::Ahead => "ahead",
            ScheduleStatus::OnSchedule => "on_schedule",
            ScheduleStatus::Behind => "behind",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComputedIndicator {
    pub code: String,
    pub department: String,
    pub name: String,
    pub target: f64,
    pub actual: f64,
    pub percentage: f64,
    pub status: Status,
    pub is_inverse: bool,
    pub wow_change: f64,
    pub wow_direction: Direction,
    pub expected_progress: f64,
    pub variance: f64,
    pub schedule_status: ScheduleStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverallPerformance {
    pub percentage: f64,
    pub status: Status,
    pub green_count: usize,
    pub yellow_count: usize,
    pub red_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeeklyTrend {
    pub change: f64,
    pub direction: Direction,
    pub green_count_change: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScheduleSummary {
    pub ahead_count: usize,
    pub on_schedule_count: usize,
    pub behind_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct Period {
    pub month: u32,
    pub year: i32,
    pub month_name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardResponse {
    pub period: Period,
    pub overall_performance: OverallPerformance,
    pub weekly_trend: WeeklyTrend,
    pub schedule_summary: ScheduleSummary,
    pub indicators: Vec<ComputedIndicator>,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct WeeklySnapshot {
    pub metric_code: String,
    pub department: String,
    pub metric_name: String,
    pub target_value: f64,
    pub actual_value: f64,
    pub percentage: f64,
    pub snapshot_date: DateTime<Utc>,
    pub month: u32,
    pub week_number: u32,
    pub year: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotWeek {
    pub week: u32,
    pub target: f64,
    pub actual: f64,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSeries {
    pub code: String,
    pub department: String,
    pub name: String,
    pub weeks: Vec<SnapshotWeek>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonthlySnapshots {
    pub indicators: Vec<MetricSeries>,
    pub available_weeks: Vec<u32>,
    pub month: u32,
    pub year: i32,
    pub month_name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonthOption {
    pub month: u32,
    pub year: i32,
    pub label: String,
    pub has_data: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonthsOverview {
    pub available_months: Vec<MonthOption>,
    pub current_month: u32,
    pub current_year: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceSettings {
    pub spreadsheet_id: String,
    pub sheet_name: String,
}

pub fn month_name(month: u32) -> &'static str {
    match month {
        1 => "January",
        2 => "February",
        3 => "March",
        4 => "April",
        5 => "May",
        6 => "June",
        7 => "July",
        8 => "August",
        9 => "September",
        10 => "October",
        11 => "November",
        12 => "December",
        _ => "",
    }
}

pub fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month >= 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|first| first.pred_opt())
        .map(|last| chrono::Datelike::day(&last))
        .unwrap_or(30)
}
