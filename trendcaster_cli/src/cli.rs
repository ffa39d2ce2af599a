use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};

use trendcaster_rs::config::{DEFAULT_DATE_FORMATS, ForecastConfig, MIN_HISTORY_DAYS, ParseOptions};

#[derive(Parser, Debug)]
#[command(
    name = "trendcaster",
    about = "Next-day direction forecasts from daily price exports"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Score an uploaded price history and print the next-day direction
    #[command(name = "forecast")]
    Forecast(ForecastArgs),
    /// Summarize a reference price history by year and by month
    #[command(name = "history")]
    History(HistoryArgs),
}

#[derive(Parser, Debug)]
pub struct ForecastArgs {
    /// Vendor historical-data export (Date, Price, Open, High, Low, Vol., Change %)
    #[arg(long = "csv", value_name = "FILE", value_hint = clap::ValueHint::FilePath)]
    pub csv_path: PathBuf,

    /// Random-forest artifact (JSON)
    #[arg(long = "model", value_name = "FILE", value_hint = clap::ValueHint::FilePath)]
    pub model_path: PathBuf,

    /// Accepted `Date` layout (chrono format). Repeat to accept several;
    /// when omitted the common vendor layouts are tried.
    #[arg(long = "date-format", value_name = "FMT")]
    pub date_formats: Vec<String>,

    /// Minimum number of calendar days required after gap filling
    #[arg(long = "min-days", default_value_t = MIN_HISTORY_DAYS)]
    pub min_days: usize,

    /// Append logs to this file in addition to stdout
    #[arg(long = "log-file", value_name = "FILE")]
    pub log_file: Option<PathBuf>,
}

impl ForecastArgs {
    pub fn into_config(self) -> Result<ForecastConfig> {
        if self.min_days == 0 {
            bail!("--min-days must be at least 1");
        }
        let mut config = ForecastConfig::new(self.csv_path, self.model_path);
        config.min_history_days = self.min_days;
        if let Some(formats) = resolve_date_formats(self.date_formats)? {
            config.date_formats = formats;
        }
        Ok(config)
    }
}

#[derive(Parser, Debug)]
pub struct HistoryArgs {
    /// Reference price history in the vendor export format
    #[arg(long = "csv", value_name = "FILE", value_hint = clap::ValueHint::FilePath)]
    pub csv_path: PathBuf,

    /// First year of the yearly trend (defaults to the earliest year present)
    #[arg(long = "from-year")]
    pub from_year: Option<i32>,

    /// Last year of the yearly trend (defaults to the latest year present)
    #[arg(long = "to-year")]
    pub to_year: Option<i32>,

    #[arg(long = "date-format", value_name = "FMT")]
    pub date_formats: Vec<String>,

    /// Append logs to this file in addition to stdout
    #[arg(long = "log-file", value_name = "FILE")]
    pub log_file: Option<PathBuf>,
}

impl HistoryArgs {
    pub fn parse_options(&self) -> Result<ParseOptions> {
        let mut options = ParseOptions::default();
        if let Some(formats) = resolve_date_formats(self.date_formats.clone())? {
            options.date_formats = formats;
        }
        Ok(options)
    }

    pub fn year_range(&self) -> Result<(Option<i32>, Option<i32>)> {
        if let (Some(from), Some(to)) = (self.from_year, self.to_year) {
            if from > to {
                bail!("--from-year {from} is after --to-year {to}");
            }
        }
        Ok((self.from_year, self.to_year))
    }
}

fn resolve_date_formats(formats: Vec<String>) -> Result<Option<Vec<String>>> {
    if formats.is_empty() {
        return Ok(None);
    }
    if let Some(blank) = formats.iter().find(|f| f.trim().is_empty()) {
        bail!("--date-format must not be blank (got {blank:?}); defaults are {DEFAULT_DATE_FORMATS:?}");
    }
    Ok(Some(formats))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forecast_args_fill_defaults() {
        let cli = Cli::parse_from([
            "trendcaster",
            "forecast",
            "--csv",
            "upload.csv",
            "--model",
            "forest.json",
        ]);
        let Commands::Forecast(args) = cli.command else {
            panic!("expected forecast subcommand");
        };
        let config = args.into_config().expect("config");
        assert_eq!(config.min_history_days, MIN_HISTORY_DAYS);
        assert_eq!(config.date_formats.len(), DEFAULT_DATE_FORMATS.len());
        assert_eq!(config.model_path, PathBuf::from("forest.json"));
    }

    #[test]
    fn explicit_date_formats_replace_defaults() {
        let cli = Cli::parse_from([
            "trendcaster",
            "forecast",
            "--csv",
            "upload.csv",
            "--model",
            "forest.json",
            "--date-format",
            "%d/%m/%Y",
            "--min-days",
            "40",
        ]);
        let Commands::Forecast(args) = cli.command else {
            panic!("expected forecast subcommand");
        };
        let config = args.into_config().expect("config");
        assert_eq!(config.date_formats, vec!["%d/%m/%Y".to_string()]);
        assert_eq!(config.min_history_days, 40);
    }

    #[test]
    fn inverted_year_range_is_rejected() {
        let cli = Cli::parse_from([
            "trendcaster",
            "history",
            "--csv",
            "history.csv",
            "--from-year",
            "2024",
            "--to-year",
            "2020",
        ]);
        let Commands::History(args) = cli.command else {
            panic!("expected history subcommand");
        };
        assert!(args.year_range().is_err());
    }
}
