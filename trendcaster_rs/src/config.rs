use std::path::PathBuf;

use serde::Deserialize;

/// Fewest calendar days (after gap filling) the feature cascade can work
/// with. The longest rolling window is 30 rows and the label needs one more.
pub const MIN_HISTORY_DAYS: usize = 31;

/// Date layouts seen in the vendor's historical-data exports, tried in order.
pub const DEFAULT_DATE_FORMATS: [&str; 4] = ["%m/%d/%Y", "%Y-%m-%d", "%b %d, %Y", "%d.%m.%Y"];

/// Widest calendar span an upload may cover once reindexed to daily rows.
pub const MAX_SPAN_DAYS: usize = 36_525;

fn default_min_history_days() -> usize {
    MIN_HISTORY_DAYS
}

fn default_max_span_days() -> usize {
    MAX_SPAN_DAYS
}

fn default_date_formats() -> Vec<String> {
    DEFAULT_DATE_FORMATS.iter().map(|f| f.to_string()).collect()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ForecastConfig {
    /// Uploaded vendor export to score.
    pub upload_csv: PathBuf,
    /// Serialized classifier artifact.
    pub model_path: PathBuf,
    /// Minimum number of daily rows required after normalization. Runs with
    /// fewer rows fail before any features are computed.
    #[serde(default = "default_min_history_days")]
    pub min_history_days: usize,
    /// Uploads whose first and last dates lie further apart are rejected
    /// before the daily calendar is built.
    #[serde(default = "default_max_span_days")]
    pub max_span_days: usize,
    /// chrono format strings accepted for the `Date` column.
    #[serde(default = "default_date_formats")]
    pub date_formats: Vec<String>,
}

impl ForecastConfig {
    pub fn new(upload_csv: impl Into<PathBuf>, model_path: impl Into<PathBuf>) -> Self {
        Self {
            upload_csv: upload_csv.into(),
            model_path: model_path.into(),
            min_history_days: MIN_HISTORY_DAYS,
            max_span_days: MAX_SPAN_DAYS,
            date_formats: default_date_formats(),
        }
    }
}

/// Settings shared by every reader of the vendor format.
#[derive(Debug, Clone, Deserialize)]
pub struct ParseOptions {
    #[serde(default = "default_date_formats")]
    pub date_formats: Vec<String>,
    #[serde(default = "default_max_span_days")]
    pub max_span_days: usize,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            date_formats: default_date_formats(),
            max_span_days: MAX_SPAN_DAYS,
        }
    }
}

impl From<&ForecastConfig> for ParseOptions {
    fn from(config: &ForecastConfig) -> Self {
        Self {
            date_formats: config.date_formats.clone(),
            max_span_days: config.max_span_days,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_fill_optional_fields() {
        let json = r#"{"upload_csv":"upload.csv","model_path":"model.json"}"#;
        let config: ForecastConfig = serde_json::from_str(json).expect("config");
        assert_eq!(config.min_history_days, MIN_HISTORY_DAYS);
        assert_eq!(config.date_formats.len(), DEFAULT_DATE_FORMATS.len());
        assert_eq!(config.date_formats[0], "%m/%d/%Y");
        assert_eq!(config.max_span_days, MAX_SPAN_DAYS);
        assert_eq!(ParseOptions::from(&config).max_span_days, MAX_SPAN_DAYS);
    }
}
