//! Column names shared by every stage, and the ordered column contract with
//! the classifier artifact.

use once_cell::sync::Lazy;

pub const DATE: &str = "Date";
pub const PRICE: &str = "Price";
pub const OPEN: &str = "Open";
pub const HIGH: &str = "High";
pub const LOW: &str = "Low";
pub const VOLUME: &str = "Vol.";
pub const CHANGE_PCT: &str = "Change %";
pub const TARGET: &str = "Target";

/// Columns every upload must carry, in vendor export order.
pub const UPLOAD_COLUMNS: [&str; 7] = [DATE, PRICE, OPEN, HIGH, LOW, VOLUME, CHANGE_PCT];

/// Market columns that only feed the feature cascade and never reach the model.
pub const RAW_MARKET_COLUMNS: [&str; 6] = [PRICE, OPEN, HIGH, LOW, VOLUME, CHANGE_PCT];

/// Rolling windows used by the volatility, mean, rate-of-change and
/// change-extrema families.
pub const ROLLING_WINDOWS: [usize; 6] = [5, 10, 15, 20, 25, 30];

/// Deepest `Lagged_Change_{i}d` column.
pub const MAX_CHANGE_LAG: usize = 30;

pub const BOLLINGER_WINDOW: usize = 20;

/// Ordered input columns of the serialized classifier. Any change here
/// breaks compatibility with every trained artifact.
pub const MODEL_INPUT_COLUMNS: [&str; 91] = [
    "Price_Diff",
    "Price_Range",
    "Daily_Return",
    "Cumulative_Return",
    "Volatility_5d",
    "Mean_5d",
    "Volume_Change",
    "Volume_Mean_5d",
    "RoC_5d",
    "Bollinger_Mid",
    "Bollinger_Upper",
    "Bollinger_Lower",
    "Lagged_Price_1d",
    "Lagged_Volume_1d",
    "Day_of_Week",
    "Month",
    "Quarter",
    "Volatility_10d",
    "Mean_10d",
    "Volume_Mean_10d",
    "RoC_10d",
    "Volatility_15d",
    "Mean_15d",
    "Volume_Mean_15d",
    "RoC_15d",
    "Volatility_20d",
    "Mean_20d",
    "Volume_Mean_20d",
    "RoC_20d",
    "Volatility_25d",
    "Mean_25d",
    "Volume_Mean_25d",
    "RoC_25d",
    "Volatility_30d",
    "Mean_30d",
    "Volume_Mean_30d",
    "RoC_30d",
    "Lagged_Change_1d",
    "Lagged_Change_2d",
    "Lagged_Change_3d",
    "Lagged_Change_4d",
    "Lagged_Change_5d",
    "Lagged_Change_6d",
    "Lagged_Change_7d",
    "Lagged_Change_8d",
    "Lagged_Change_9d",
    "Lagged_Change_10d",
    "Lagged_Change_11d",
    "Lagged_Change_12d",
    "Lagged_Change_13d",
    "Lagged_Change_14d",
    "Lagged_Change_15d",
    "Lagged_Change_16d",
    "Lagged_Change_17d",
    "Lagged_Change_18d",
    "Lagged_Change_19d",
    "Lagged_Change_20d",
    "Lagged_Change_21d",
    "Lagged_Change_22d",
    "Lagged_Change_23d",
    "Lagged_Change_24d",
    "Lagged_Change_25d",
    "Lagged_Change_26d",
    "Lagged_Change_27d",
    "Lagged_Change_28d",
    "Lagged_Change_29d",
    "Lagged_Change_30d",
    "Change_Median_5d",
    "Change_Min_5d",
    "Change_Max_5d",
    "Change_Range_5d",
    "Change_Median_10d",
    "Change_Min_10d",
    "Change_Max_10d",
    "Change_Range_10d",
    "Change_Median_15d",
    "Change_Min_15d",
    "Change_Max_15d",
    "Change_Range_15d",
    "Change_Median_20d",
    "Change_Min_20d",
    "Change_Max_20d",
    "Change_Range_20d",
    "Change_Median_25d",
    "Change_Min_25d",
    "Change_Max_25d",
    "Change_Range_25d",
    "Change_Median_30d",
    "Change_Min_30d",
    "Change_Max_30d",
    "Change_Range_30d",
];

/// Position of `Target` within the engineered columns: it is appended right
/// after the calendar parts and before the wider-window families.
const TARGET_POSITION: usize = 17;

/// Every column the feature engine appends, in insertion order.
pub static FEATURE_COLUMNS: Lazy<Vec<&'static str>> = Lazy::new(|| {
    let mut columns = MODEL_INPUT_COLUMNS.to_vec();
    columns.insert(TARGET_POSITION, TARGET);
    columns
});

pub fn is_raw_market_column(name: &str) -> bool {
    RAW_MARKET_COLUMNS.contains(&name)
}
