use std::collections::BTreeSet;
use std::path::PathBuf;

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use clap::{ArgGroup, Args, Parser, Subcommand};
use serde::Serialize;
use sqlx::postgres::{PgPool, PgPoolOptions};

use nps_survey_analytics::clean::{self, Dataset, LoadReport};
use nps_survey_analytics::metrics::{self, MetricSnapshot, MonthlyBucket, TopBottom};
use nps_survey_analytics::models::RawTable;
use nps_survey_analytics::query::{self, PeriodPreset, ResponseFilter, Window};
use nps_survey_analytics::synthetic::{self, SyntheticOptions};
use nps_survey_analytics::{db, report, sources, DashboardConfig, NpsCategory};

#[derive(Parser)]
#[command(name = "nps-survey-analytics")]
#[command(about = "Net Promoter Score analytics for satisfaction survey exports", long_about = None)]
struct Cli {
    /// JSON file overriding parts of the built-in survey configuration
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Minimum responses for a month to count as representative
    #[arg(long, global = true)]
    threshold: Option<usize>,
    /// Log normalization and cleaning details
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct SyntheticArgs {
    /// Months of synthetic history
    #[arg(long, default_value_t = 12)]
    months: u32,
    /// Synthetic responses per month
    #[arg(long, default_value_t = 50)]
    per_month: u32,
    /// Seed for the synthetic generator
    #[arg(long, default_value_t = 42)]
    seed: u64,
}

impl SyntheticArgs {
    fn options(&self) -> SyntheticOptions {
        SyntheticOptions {
            months: self.months,
            responses_per_month: self.per_month,
            seed: self.seed,
            end: Utc::now().naive_utc(),
        }
    }
}

#[derive(Args, Clone)]
#[command(group(
    ArgGroup::new("source")
        .args(["csv", "synthetic", "database"])
        .required(true)
        .multiple(false)
))]
struct SourceArgs {
    /// Survey export (CSV, first row is the header)
    #[arg(long)]
    csv: Option<PathBuf>,
    /// Use seeded synthetic responses
    #[arg(long)]
    synthetic: bool,
    /// Read raw rows stored in Postgres (DATABASE_URL)
    #[arg(long)]
    database: bool,
    #[command(flatten)]
    generator: SyntheticArgs,
}

impl SourceArgs {
    fn describe(&self) -> String {
        if let Some(path) = &self.csv {
            path.display().to_string()
        } else if self.synthetic {
            format!("synthetic data (seed {})", self.generator.seed)
        } else {
            "stored responses".to_string()
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Store seeded synthetic responses in the database
    Seed {
        #[command(flatten)]
        generator: SyntheticArgs,
    },
    /// Store the rows of a survey export in the database
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Monthly NPS with representativeness flags
    Overview {
        #[command(flatten)]
        source: SourceArgs,
    },
    /// Satisfaction averages, trends and rankings per service
    Metrics {
        #[command(flatten)]
        source: SourceArgs,
        /// last-<n>, last-30-days, last-3-months, last-year, this-year or all
        #[arg(long, default_value = "all")]
        period: PeriodPreset,
    },
    /// List filtered responses, newest first
    Responses {
        #[command(flatten)]
        source: SourceArgs,
        #[arg(long, default_value = "last-10")]
        period: PeriodPreset,
        /// Start of an explicit date range (YYYY-MM-DD), replaces --period
        #[arg(long, requires = "to", conflicts_with = "period")]
        from: Option<NaiveDate>,
        /// End of an explicit date range (YYYY-MM-DD), inclusive
        #[arg(long, requires = "from", conflicts_with = "period")]
        to: Option<NaiveDate>,
        /// Case-insensitive search over first and last name
        #[arg(long)]
        search: Option<String>,
        /// Keep only these categories (repeatable)
        #[arg(long = "category")]
        categories: Vec<NpsCategory>,
    },
    /// Write a markdown report
    Report {
        #[command(flatten)]
        source: SourceArgs,
        #[arg(long, default_value = "all")]
        period: PeriodPreset,
        #[arg(long, default_value = "nps_report.md")]
        out: PathBuf,
    },
    /// Print the metric snapshot as JSON
    Snapshot {
        #[command(flatten)]
        source: SourceArgs,
        #[arg(long, default_value = "all")]
        period: PeriodPreset,
    },
    /// Write the cleaned dataset as a canonical CSV
    Export {
        #[command(flatten)]
        source: SourceArgs,
        #[arg(long)]
        out: PathBuf,
    },
}

#[derive(Serialize)]
struct SnapshotOutput<'a> {
    source: String,
    period: String,
    load: &'a LoadReport,
    snapshot: MetricSnapshot,
    monthly: Vec<MonthlyBucket>,
    services: TopBottom,
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn connect() -> anyhow::Result<PgPool> {
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a Postgres instance")?;

    PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")
}

async fn fetch_stored() -> anyhow::Result<Vec<RawTable>> {
    let pool = connect().await?;
    db::fetch_raw_tables(&pool).await
}

/// Load, normalize and clean one source. Source failures end up in the load
/// report with an empty dataset.
async fn load(source: &SourceArgs, config: &DashboardConfig) -> Dataset {
    let tables = if let Some(path) = &source.csv {
        sources::read_csv_table(path).map(|table| vec![table])
    } else if source.synthetic {
        synthetic::generate(&source.generator.options(), config).map(|table| vec![table])
    } else {
        fetch_stored().await
    };

    let dataset = clean::load_tables(tables, config);
    eprint!("{}", report::render_load_summary(&dataset.report));
    dataset
}

fn load_config(cli: &Cli) -> anyhow::Result<DashboardConfig> {
    let mut config = match &cli.config {
        Some(path) => DashboardConfig::from_json_file(path)?,
        None => DashboardConfig::default(),
    };
    if let Some(threshold) = cli.threshold {
        config.representativeness_threshold = threshold;
        config.validate()?;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let config = load_config(&cli)?;

    match cli.command {
        Commands::InitDb => {
            let pool = connect().await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed { generator } => {
            let pool = connect().await?;
            let table = synthetic::generate(&generator.options(), &config)?;
            let inserted = db::seed(&pool, &table, generator.seed).await?;
            println!("Inserted {inserted} synthetic responses.");
        }
        Commands::Import { csv } => {
            let pool = connect().await?;
            let inserted = db::import_csv(&pool, &csv).await?;
            println!("Inserted {inserted} responses from {}.", csv.display());
        }
        Commands::Overview { source } => {
            let dataset = load(&source, &config).await;
            print!("{}", report::render_overview(&dataset.responses, &config));
        }
        Commands::Metrics { source, period } => {
            let dataset = load(&source, &config).await;
            let subset = query::filter_responses(&dataset.responses, &ResponseFilter::preset(period));
            println!("Period: {period} ({} responses)", subset.len());
            print!("{}", report::render_metrics(&subset, &config));
        }
        Commands::Responses {
            source,
            period,
            from,
            to,
            search,
            categories,
        } => {
            let dataset = load(&source, &config).await;
            let window = match (from, to) {
                (Some(start), Some(end)) => Window::Range { start, end },
                _ => Window::Preset(period),
            };
            let filter = ResponseFilter {
                window,
                categories: if categories.is_empty() {
                    None
                } else {
                    Some(categories.into_iter().collect::<BTreeSet<_>>())
                },
                name_query: search,
                as_of: None,
            };
            let subset = query::filter_responses(&dataset.responses, &filter);
            let anchor = query::latest_timestamp(&dataset.responses);
            print!("{}", report::render_responses(&subset, &config, anchor));
        }
        Commands::Report {
            source,
            period,
            out,
        } => {
            let dataset = load(&source, &config).await;
            let subset = query::filter_responses(&dataset.responses, &ResponseFilter::preset(period));
            let scope = format!("{}, period {period}", source.describe());
            let markdown = report::build_report(&scope, &subset, &config, &dataset.report);
            std::fs::write(&out, markdown)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
        Commands::Snapshot { source, period } => {
            let dataset = load(&source, &config).await;
            let subset = query::filter_responses(&dataset.responses, &ResponseFilter::preset(period));
            let output = SnapshotOutput {
                source: source.describe(),
                period: period.to_string(),
                load: &dataset.report,
                snapshot: metrics::snapshot(&subset, &config),
                monthly: metrics::monthly_series(&subset, config.representativeness_threshold),
                services: metrics::top_bottom_services(&subset, &config, metrics::DEFAULT_TOP_BOTTOM),
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Commands::Export { source, out } => {
            let dataset = load(&source, &config).await;
            let table = clean::to_raw_table(&dataset.responses, &config);
            sources::write_csv_table(&out, &table)?;
            println!("Wrote {} canonical responses to {}.", table.rows.len(), out.display());
        }
    }

    Ok(())
}
