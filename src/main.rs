use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::{Datelike, NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

mod cache;
mod config;
mod dashboard;
mod db;
mod errors;
mod fetcher;
mod kpi;
mod layout;
mod models;
mod report;
mod resolver;
mod sheets;
mod store;
mod values;

use crate::cache::LayoutCache;
use crate::config::Config;
use crate::dashboard::{available_months, validate_period, DashboardService};
use crate::db::PgStore;
use crate::fetcher::MetricFetcher;
use crate::models::{month_name, SourceSettings};
use crate::sheets::{column_letter, extract_spreadsheet_id, SheetSource, SheetTarget, SheetsClient};
use crate::store::SnapshotStore;

#[derive(Parser)]
#[command(name = "kpi-dashboard")]
#[command(about = "Weekly KPI scorecard built from an operator-edited spreadsheet", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone, Copy)]
struct PeriodArgs {
    /// Month 1-12, defaults to the current month
    #[arg(long)]
    month: Option<u32>,
    /// Defaults to the current year
    #[arg(long)]
    year: Option<i32>,
}

impl PeriodArgs {
    fn resolve(self, today: NaiveDate) -> anyhow::Result<(u32, i32)> {
        let month = self.month.unwrap_or_else(|| today.month());
        let year = self.year.unwrap_or_else(|| today.year());
        validate_period(month, year)?;
        Ok((month, year))
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load the default metric catalog
    Seed,
    /// Import metric definitions from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Discover and print the current sheet layout
    Layout,
    /// Compute the scorecard for a month
    Dashboard {
        #[command(flatten)]
        period: PeriodArgs,
        /// Drop the cached layout before reading
        #[arg(long)]
        refresh: bool,
        #[arg(long)]
        json: bool,
    },
    /// Generate a markdown report
    Report {
        #[command(flatten)]
        period: PeriodArgs,
        #[arg(long, default_value = "kpi-report.md")]
        out: PathBuf,
        /// Append the month's saved weekly series
        #[arg(long)]
        with_history: bool,
    },
    /// Save, list or delete weekly snapshots
    Snapshot {
        #[command(subcommand)]
        action: SnapshotAction,
    },
    /// List the spreadsheet year's months and which have saved snapshots
    Months,
    /// Show, change or check the spreadsheet source
    Source {
        #[command(subcommand)]
        action: SourceAction,
    },
}

#[derive(Subcommand)]
enum SnapshotAction {
    /// Store the current scorecard as a week of the month
    Save {
        #[command(flatten)]
        period: PeriodArgs,
        #[arg(long, default_value_t = 1)]
        week: u32,
    },
    /// Print the month's weekly series per metric
    List {
        #[command(flatten)]
        period: PeriodArgs,
        #[arg(long)]
        json: bool,
    },
    /// Remove every row stored for a week
    Delete {
        #[command(flatten)]
        period: PeriodArgs,
        #[arg(long)]
        week: u32,
    },
}

#[derive(Subcommand)]
enum SourceAction {
    Show,
    Set {
        /// Spreadsheet id or full spreadsheet URL
        #[arg(long)]
        spreadsheet: String,
        #[arg(long)]
        sheet: Option<String>,
    },
    /// Verify the configured token can read the spreadsheet
    Check,
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

struct App {
    config: Config,
    pool: PgPool,
    source: SourceSettings,
}

impl App {
    fn sheet_source(&self) -> anyhow::Result<Arc<dyn SheetSource>> {
        anyhow::ensure!(
            !self.source.spreadsheet_id.is_empty(),
            "no spreadsheet configured; set SPREADSHEET_ID or run `source set`"
        );
        let client = SheetsClient::new(
            &self.config.sheets_api_base,
            &self.source.spreadsheet_id,
            self.config.access_token.clone(),
            self.config.source_timeout,
        )?;
        Ok(Arc::new(client))
    }

    fn layout_cache(&self, source: Arc<dyn SheetSource>) -> Arc<LayoutCache> {
        let target = SheetTarget {
            sheet_name: self.source.sheet_name.clone(),
            label_column: self.config.label_column.clone(),
        };
        Arc::new(LayoutCache::new(
            source,
            target,
            self.config.layout_ttl,
            self.config.source_timeout,
        ))
    }

    fn service(&self) -> anyhow::Result<DashboardService> {
        let source = self.sheet_source()?;
        let cache = self.layout_cache(Arc::clone(&source));
        let fetcher = MetricFetcher::new(source, cache, self.config.source_timeout);
        let store = Arc::new(PgStore::new(self.pool.clone()));
        Ok(DashboardService::new(
            store.clone(),
            store,
            fetcher,
            self.config.spreadsheet_year,
        ))
    }

    fn store(&self) -> PgStore {
        PgStore::new(self.pool.clone())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = Config::from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await
        .context("failed to connect to Postgres")?;

    if let Commands::InitDb = cli.command {
        db::init_db(&pool).await?;
        println!("Schema ready.");
        return Ok(());
    }

    let stored = db::load_source_settings(&pool).await?;
    let source = db::apply_source_settings(&config.source, &stored);
    let app = App {
        config,
        pool,
        source,
    };
    let today = Utc::now().date_naive();

    match cli.command {
        Commands::InitDb => {}
        Commands::Seed => {
            let seeded = db::seed(&app.pool).await?;
            println!("Seeded {seeded} metrics.");
        }
        Commands::Import { csv } => {
            let imported = db::import_csv(&app.pool, &csv).await?;
            println!("Imported {imported} metrics from {}.", csv.display());
        }
        Commands::Layout => {
            let source = app.sheet_source()?;
            let layout = app.layout_cache(source).get_layout().await?;
            println!("Layout captured at {}", layout.captured_at);
            for (month, columns) in &layout.month_columns {
                let letter = |slot: Option<usize>| slot.map(column_letter).unwrap_or_else(|| "-".into());
                println!(
                    "{:<10} target {:>3}  lagging {:>3}  percent {:>3}  actual {:>3}",
                    month_name(*month),
                    letter(columns.target),
                    letter(columns.lagging),
                    letter(columns.percent),
                    letter(columns.actual)
                );
            }
            let mut labels: Vec<(&String, &Vec<u32>)> = layout.label_rows.iter().collect();
            labels.sort_by_key(|(_, rows)| rows.first().copied());
            for (label, rows) in labels {
                println!("{rows:?} {label}");
            }
        }
        Commands::Dashboard {
            period,
            refresh,
            json,
        } => {
            let (month, year) = period.resolve(today)?;
            let service = app.service()?;
            if refresh {
                service.fetcher().cache().invalidate().await;
            }
            let dashboard = service.dashboard(month, year, today).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&dashboard)?);
            } else {
                let overall = &dashboard.overall_performance;
                println!(
                    "{} {}: {:.1}% on target ({}), trend {:+.1} pts",
                    dashboard.period.month_name,
                    year,
                    overall.percentage,
                    overall.status.as_str(),
                    dashboard.weekly_trend.change
                );
                for indicator in &dashboard.indicators {
                    println!(
                        "- {} {} {:.1}% {} | wow {} {:+.1} | {} ({:+.1}%)",
                        indicator.code,
                        indicator.name,
                        indicator.percentage,
                        indicator.status.as_str(),
                        indicator.wow_direction.as_str(),
                        indicator.wow_change,
                        indicator.schedule_status.as_str(),
                        indicator.variance
                    );
                }
            }
        }
        Commands::Report {
            period,
            out,
            with_history,
        } => {
            let (month, year) = period.resolve(today)?;
            let dashboard = app.service()?.dashboard(month, year, today).await?;
            let history = if with_history {
                Some(app.store().snapshots_for_month(month, year).await?)
            } else {
                None
            };
            let report = report::build_report(&dashboard, history.as_ref());
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
        Commands::Snapshot { action } => match action {
            SnapshotAction::Save { period, week } => {
                let (month, year) = period.resolve(today)?;
                let saved = app.service()?.save_week(month, year, week, today).await?;
                println!("Saved {saved} indicators for {} {year}, week {week}.", month_name(month));
            }
            SnapshotAction::List { period, json } => {
                let (month, year) = period.resolve(today)?;
                let snapshots = app.store().snapshots_for_month(month, year).await?;
                if json {
                    println!("{}", serde_json::to_string_pretty(&snapshots)?);
                } else if snapshots.indicators.is_empty() {
                    println!("No snapshots saved for {} {year}.", snapshots.month_name);
                } else {
                    println!("Weeks saved: {:?}", snapshots.available_weeks);
                    for series in &snapshots.indicators {
                        let weeks: Vec<String> = series
                            .weeks
                            .iter()
                            .map(|w| {
                                format!("W{} {:.2}/{:.2} ({:.1}%)", w.week, w.actual, w.target, w.percentage)
                            })
                            .collect();
                        println!("- {} {}: {}", series.code, series.name, weeks.join(", "));
                    }
                }
            }
            SnapshotAction::Delete { period, week } => {
                let (month, year) = period.resolve(today)?;
                let deleted = app.store().delete_week(month, year, week).await?;
                println!("Deleted {deleted} rows for {} {year}, week {week}.", month_name(month));
            }
        },
        Commands::Months => {
            let overview =
                available_months(&app.store(), app.config.spreadsheet_year, today).await?;
            for option in &overview.available_months {
                let marker = if option.month == overview.current_month { "*" } else { " " };
                let data = if option.has_data { "snapshots" } else { "" };
                println!("{marker} {:<16} {data}", option.label);
            }
        }
        Commands::Source { action } => match action {
            SourceAction::Show => {
                println!("Spreadsheet: {}", app.source.spreadsheet_id);
                println!("Sheet:       {}", app.source.sheet_name);
            }
            SourceAction::Set { spreadsheet, sheet } => {
                let spreadsheet_id = extract_spreadsheet_id(&spreadsheet);
                anyhow::ensure!(!spreadsheet_id.is_empty(), "spreadsheet id or URL is required");
                let settings = SourceSettings {
                    spreadsheet_id,
                    sheet_name: sheet.unwrap_or_else(|| app.source.sheet_name.clone()),
                };
                db::save_source_settings(&app.pool, &settings).await?;
                tracing::info!(
                    spreadsheet_id = %settings.spreadsheet_id,
                    sheet = %settings.sheet_name,
                    "spreadsheet source updated"
                );
                println!("Source set to {} / {}.", settings.spreadsheet_id, settings.sheet_name);
            }
            SourceAction::Check => {
                let title = app
                    .sheet_source()?
                    .probe()
                    .await
                    .context("no access to the spreadsheet")?;
                println!("Spreadsheet reachable: {title}");
            }
        },
    }

    Ok(())
}
