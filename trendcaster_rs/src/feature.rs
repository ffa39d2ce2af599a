use std::fmt;

use chrono::{Datelike, NaiveDate};
use polars::prelude::*;
use tracing::debug;

use crate::error::{PipelineError, PipelineResult};
use crate::normalize::DailySeries;
use crate::rolling::{
    Column, cumulative_product, map, pct_change, rolling_max, rolling_mean, rolling_median,
    rolling_min, rolling_std, round_column, shift, zip_with,
};
use crate::schema::{self, BOLLINGER_WINDOW, MAX_CHANGE_LAG, ROLLING_WINDOWS};

/// The 5-day window features are emitted early, next to the single-window
/// return columns; wider windows follow the calendar block.
const LEADING_WINDOW: usize = 5;
const BOLLINGER_STD_MULT: f64 = 2.0;
const CHANGE_DECIMALS: u32 = 2;

/// Next-session direction label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    /// Strictly positive change is `Up`; zero, negative and missing are `Down`.
    pub fn from_change(value: Option<f64>) -> Self {
        if categorize_change(value) == 1 {
            Self::Up
        } else {
            Self::Down
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Up => "Up",
            Self::Down => "Down",
        }
    }

    pub fn parse_label(label: &str) -> Option<Self> {
        match label {
            "Up" => Some(Self::Up),
            "Down" => Some(Self::Down),
            _ => None,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Binary bucket for lagged changes: 1 when strictly positive, else 0.
/// Zero and missing values share the 0 bucket.
pub fn categorize_change(value: Option<f64>) -> i64 {
    match value {
        Some(v) if v > 0.0 => 1,
        _ => 0,
    }
}

/// Market columns read back from a normalized frame.
struct MarketSeries {
    dates: Vec<NaiveDate>,
    price: Column,
    open: Column,
    high: Column,
    low: Column,
    volume: Column,
    change_pct: Column,
}

impl MarketSeries {
    fn from_frame(frame: &DataFrame) -> PipelineResult<Self> {
        Ok(Self {
            dates: date_column(frame)?,
            price: column_with_nulls(frame, schema::PRICE)?,
            open: column_with_nulls(frame, schema::OPEN)?,
            high: column_with_nulls(frame, schema::HIGH)?,
            low: column_with_nulls(frame, schema::LOW)?,
            volume: column_with_nulls(frame, schema::VOLUME)?,
            change_pct: column_with_nulls(frame, schema::CHANGE_PCT)?,
        })
    }
}

/// Ordered collection of engineered columns awaiting insertion.
#[derive(Default)]
struct FeatureSet {
    columns: Vec<Series>,
}

impl FeatureSet {
    fn float(&mut self, name: &str, values: Column) {
        self.columns.push(Series::new(name, values));
    }

    fn integer(&mut self, name: &str, values: Vec<i64>) {
        self.columns.push(Series::new(name, values));
    }
}

/// Appends the technical feature columns to a normalized daily frame.
///
/// Existing columns are never removed or reordered. Re-running on an
/// already engineered frame recomputes each derived column in place with
/// identical values.
pub struct FeatureEngineer {
    frame: DataFrame,
}

impl FeatureEngineer {
    pub fn new(frame: DataFrame) -> Self {
        Self { frame }
    }

    pub fn from_series(series: &DailySeries) -> PipelineResult<Self> {
        Ok(Self::new(series.to_frame()?))
    }

    pub fn data_frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn into_frame(self) -> DataFrame {
        self.frame
    }

    pub fn compute_features(&mut self) -> PipelineResult<()> {
        let market = MarketSeries::from_frame(&self.frame)?;
        let features = build_features(&market);
        let count = features.columns.len();
        for series in features.columns {
            self.frame.with_column(series)?;
        }
        debug!(
            rows = self.frame.height(),
            features = count,
            "Feature columns computed"
        );
        Ok(())
    }
}

/// Convenience wrapper: engineer a copy of `frame`.
pub fn engineer_features(frame: &DataFrame) -> PipelineResult<DataFrame> {
    let mut engineer = FeatureEngineer::new(frame.clone());
    engineer.compute_features()?;
    Ok(engineer.into_frame())
}

fn percent(value: f64) -> f64 {
    value * 100.0
}

fn build_features(market: &MarketSeries) -> FeatureSet {
    let mut features = FeatureSet::default();
    return_features(market, &mut features);
    window_features(market, LEADING_WINDOW, &mut features, true);
    bollinger_features(market, &mut features);
    lag_features(market, &mut features);
    calendar_features(market, &mut features);
    features.float(schema::TARGET, shift(&market.change_pct, -1));
    for window in ROLLING_WINDOWS.into_iter().filter(|w| *w != LEADING_WINDOW) {
        window_features(market, window, &mut features, false);
    }
    change_lag_features(market, &mut features);
    change_extrema_features(market, &mut features);
    features
}

fn return_features(market: &MarketSeries, features: &mut FeatureSet) {
    features.float(
        "Price_Diff",
        zip_with(&market.price, &market.open, |price, open| price - open),
    );
    features.float(
        "Price_Range",
        zip_with(&market.high, &market.low, |high, low| high - low),
    );

    let daily_return = zip_with(&market.price, &market.open, |price, open| {
        (price - open) / open * 100.0
    });
    let growth = map(&daily_return, |ret| 1.0 + ret / 100.0);
    let cumulative = map(&cumulative_product(&growth), |product| product - 1.0);
    features.float("Daily_Return", daily_return);
    features.float("Cumulative_Return", cumulative);
}

/// Rolling volatility/mean of price, mean volume and rate of change for one
/// window. The leading window also carries the 1-day volume change, which
/// sits between its price and volume columns.
fn window_features(
    market: &MarketSeries,
    window: usize,
    features: &mut FeatureSet,
    with_volume_change: bool,
) {
    features.float(
        &format!("Volatility_{window}d"),
        rolling_std(&market.price, window),
    );
    features.float(&format!("Mean_{window}d"), rolling_mean(&market.price, window));
    if with_volume_change {
        features.float(
            "Volume_Change",
            map(&pct_change(&market.volume, 1), percent),
        );
    }
    features.float(
        &format!("Volume_Mean_{window}d"),
        rolling_mean(&market.volume, window),
    );
    features.float(
        &format!("RoC_{window}d"),
        map(&pct_change(&market.price, window), percent),
    );
}

fn bollinger_features(market: &MarketSeries, features: &mut FeatureSet) {
    let mid = rolling_mean(&market.price, BOLLINGER_WINDOW);
    let std = rolling_std(&market.price, BOLLINGER_WINDOW);
    let upper = zip_with(&mid, &std, |m, s| m + s * BOLLINGER_STD_MULT);
    let lower = zip_with(&mid, &std, |m, s| m - s * BOLLINGER_STD_MULT);
    features.float("Bollinger_Mid", mid);
    features.float("Bollinger_Upper", upper);
    features.float("Bollinger_Lower", lower);
}

fn lag_features(market: &MarketSeries, features: &mut FeatureSet) {
    features.float("Lagged_Price_1d", shift(&market.price, 1));
    features.float("Lagged_Volume_1d", shift(&market.volume, 1));
}

fn calendar_features(market: &MarketSeries, features: &mut FeatureSet) {
    let day_of_week = market
        .dates
        .iter()
        .map(|date| i64::from(date.weekday().num_days_from_monday()))
        .collect();
    let month = market
        .dates
        .iter()
        .map(|date| i64::from(date.month()))
        .collect();
    let quarter = market
        .dates
        .iter()
        .map(|date| i64::from((date.month() - 1) / 3 + 1))
        .collect();
    features.integer("Day_of_Week", day_of_week);
    features.integer("Month", month);
    features.integer("Quarter", quarter);
}

fn change_lag_features(market: &MarketSeries, features: &mut FeatureSet) {
    for lag in 1..=MAX_CHANGE_LAG {
        let categories = shift(&market.change_pct, lag as isize)
            .into_iter()
            .map(categorize_change)
            .collect();
        features.integer(&format!("Lagged_Change_{lag}d"), categories);
    }
}

fn change_extrema_features(market: &MarketSeries, features: &mut FeatureSet) {
    let change = &market.change_pct;
    for window in ROLLING_WINDOWS {
        let median = round_column(&rolling_median(change, window), CHANGE_DECIMALS);
        let min = round_column(&rolling_min(change, window), CHANGE_DECIMALS);
        let max = round_column(&rolling_max(change, window), CHANGE_DECIMALS);
        let range = round_column(&zip_with(&max, &min, |hi, lo| hi - lo), CHANGE_DECIMALS);
        features.float(&format!("Change_Median_{window}d"), median);
        features.float(&format!("Change_Min_{window}d"), min);
        features.float(&format!("Change_Max_{window}d"), max);
        features.float(&format!("Change_Range_{window}d"), range);
    }
}

pub(crate) fn column_with_nulls(frame: &DataFrame, name: &str) -> PipelineResult<Column> {
    let series = frame
        .column(name)
        .map_err(|_| PipelineError::MissingColumn {
            column: name.to_string(),
        })?;
    let chunk = series
        .f64()
        .map_err(|_| PipelineError::Schema(format!("column {name} must be float")))?;
    Ok(chunk.into_iter().collect())
}

pub(crate) fn date_column(frame: &DataFrame) -> PipelineResult<Vec<NaiveDate>> {
    let series = frame
        .column(schema::DATE)
        .map_err(|_| PipelineError::MissingColumn {
            column: schema::DATE.to_string(),
        })?;
    let mut out = Vec::with_capacity(series.len());
    for (idx, value) in series.iter().enumerate() {
        let raw = match value {
            AnyValue::String(s) => s.to_string(),
            AnyValue::StringOwned(ref s) => s.to_string(),
            other => {
                return Err(PipelineError::Schema(format!(
                    "Date column must hold ISO strings (got {:?} at row {idx})",
                    other.dtype()
                )));
            }
        };
        let date = NaiveDate::parse_from_str(&raw, "%Y-%m-%d").map_err(|_| {
            PipelineError::Schema(format!("Date value '{raw}' at row {idx} is not ISO formatted"))
        })?;
        out.push(date);
    }
    Ok(out)
}
