mod cli;

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use cli::{Cli, Commands, ForecastArgs, HistoryArgs};
use polars::prelude::*;
use tracing_appender::non_blocking;
use tracing_subscriber::{EnvFilter, prelude::*};
use trendcaster_rs::history::{MonthClose, YearClose};
use trendcaster_rs::{Classifier, ForecastPipeline, ReferenceHistory, model};

fn init_tracing(log_file: Option<PathBuf>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let stdout_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stdout);

    if let Some(path) = log_file {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|err| anyhow!("failed to create log directory {parent:?}: {err}"))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|err| anyhow!("failed to open log file {path:?}: {err}"))?;
        let (non_blocking_writer, guard) = non_blocking(file);
        // The writer flushes only while the guard lives; keep it for the whole process.
        let _guard = Box::leak(Box::new(guard));
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(non_blocking_writer);
        tracing_subscriber::registry()
            .with(filter)
            .with(stdout_layer)
            .with(file_layer)
            .try_init()
            .map_err(|err| anyhow!("failed to initialize tracing: {err}"))
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(stdout_layer)
            .try_init()
            .map_err(|err| anyhow!("failed to initialize tracing: {err}"))
    }
}

fn log_invocation(log_file: Option<&PathBuf>) {
    let cwd = std::env::current_dir().ok();
    let argv: Vec<String> = std::env::args_os()
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect();
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        cwd = ?cwd,
        log_file = ?log_file,
        argv = ?argv,
        "trendcaster invoked"
    );
}

fn run_forecast(args: ForecastArgs) -> Result<()> {
    let config = args.into_config()?;
    let forest = model::shared(&config.model_path)
        .with_context(|| format!("loading classifier from {}", config.model_path.display()))?;
    let classifier: Arc<dyn Classifier> = forest;
    let upload = config.upload_csv.clone();
    let pipeline = ForecastPipeline::new(config, classifier);
    let forecast = pipeline
        .run_configured()
        .with_context(|| format!("forecasting from {}", upload.display()))?;

    println!("{}", forecast.upload);
    println!("Forecast: {}", forecast.direction);
    Ok(())
}

fn run_history(args: HistoryArgs) -> Result<()> {
    let options = args.parse_options()?;
    let (from_year, to_year) = args.year_range()?;
    let history = ReferenceHistory::load(&args.csv_path, options)
        .with_context(|| format!("loading reference history {}", args.csv_path.display()))?;
    let (first, last) = history
        .year_span()
        .ok_or_else(|| anyhow!("reference history is empty"))?;

    let yearly = history.yearly_between(from_year.unwrap_or(first), to_year.unwrap_or(last));
    println!("Yearly trend");
    println!("{}", yearly_frame(&yearly)?);
    println!("Monthly closes");
    println!("{}", monthly_frame(&history.monthly())?);
    Ok(())
}

fn yearly_frame(closes: &[YearClose]) -> Result<DataFrame> {
    let years: Vec<i32> = closes.iter().map(|c| c.year).collect();
    let dates: Vec<String> = closes.iter().map(|c| c.last.date.to_string()).collect();
    let prices: Vec<Option<f64>> = closes.iter().map(|c| c.last.price).collect();
    let frame = DataFrame::new(vec![
        Series::new("Year", years),
        Series::new("Date", dates),
        Series::new("Price", prices),
    ])?;
    Ok(frame)
}

fn monthly_frame(closes: &[MonthClose]) -> Result<DataFrame> {
    let column = |pick: fn(&MonthClose) -> Option<f64>| -> Vec<Option<f64>> {
        closes.iter().map(pick).collect()
    };
    let frame = DataFrame::new(vec![
        Series::new(
            "Month",
            closes.iter().map(|c| c.label.clone()).collect::<Vec<_>>(),
        ),
        Series::new("Price", column(|c| c.last.price)),
        Series::new("Open", column(|c| c.last.open)),
        Series::new("High", column(|c| c.last.high)),
        Series::new("Low", column(|c| c.last.low)),
        Series::new("Vol.", column(|c| c.last.volume)),
        Series::new("Change %", column(|c| c.last.change_pct)),
    ])?;
    Ok(frame)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_file = match &cli.command {
        Commands::Forecast(args) => args.log_file.clone(),
        Commands::History(args) => args.log_file.clone(),
    };

    init_tracing(log_file.clone())?;
    log_invocation(log_file.as_ref());

    match cli.command {
        Commands::Forecast(args) => run_forecast(args),
        Commands::History(args) => run_history(args),
    }
}
