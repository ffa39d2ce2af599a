use chrono::NaiveDate;
use polars::prelude::*;
use tracing::debug;

use crate::error::{PipelineError, PipelineResult};
use crate::feature::{Direction, column_with_nulls, date_column};
use crate::rolling::round_column;
use crate::schema::{self, MODEL_INPUT_COLUMNS, RAW_MARKET_COLUMNS};

const ROUND_DECIMALS: u32 = 2;

/// Smallest daily series that leaves one scoreable row. `RoC_30d` needs 30
/// earlier rows, and the day after the scored one defines its label.
pub const REQUIRED_DAILY_ROWS: usize = 32;

/// One model input vector. `values[i]` belongs to `MODEL_INPUT_COLUMNS[i]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelInput {
    pub date: NaiveDate,
    pub values: Vec<f64>,
}

impl ModelInput {
    pub fn columns(&self) -> &'static [&'static str] {
        &MODEL_INPUT_COLUMNS
    }

    pub fn get(&self, column: &str) -> Option<f64> {
        MODEL_INPUT_COLUMNS
            .iter()
            .position(|name| *name == column)
            .and_then(|idx| self.values.get(idx).copied())
    }
}

/// Feature rows ready for scoring: rounded, stripped of raw market columns
/// and the label, and free of missing values.
#[derive(Debug, Clone)]
pub struct Finalized {
    frame: DataFrame,
    daily_rows: usize,
    historical_directions: Vec<Direction>,
}

impl Finalized {
    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn height(&self) -> usize {
        self.frame.height()
    }

    /// Categorized labels of the surviving rows, for inspection only. They
    /// never reach the classifier.
    pub fn historical_directions(&self) -> &[Direction] {
        &self.historical_directions
    }

    pub fn last_input(&self) -> PipelineResult<ModelInput> {
        let height = self.frame.height();
        if height == 0 {
            return Err(PipelineError::InsufficientHistory {
                required: REQUIRED_DAILY_ROWS,
                available: self.daily_rows,
            });
        }
        let dates = date_column(&self.frame)?;
        self.input_at(&dates, height - 1)
    }

    pub fn inputs(&self) -> PipelineResult<Vec<ModelInput>> {
        let dates = date_column(&self.frame)?;
        (0..self.frame.height())
            .map(|idx| self.input_at(&dates, idx))
            .collect()
    }

    fn input_at(&self, dates: &[NaiveDate], idx: usize) -> PipelineResult<ModelInput> {
        let mut values = Vec::with_capacity(MODEL_INPUT_COLUMNS.len());
        for name in MODEL_INPUT_COLUMNS {
            values.push(cell_as_f64(&self.frame, name, idx)?);
        }
        Ok(ModelInput {
            date: dates[idx],
            values,
        })
    }
}

/// Reduces an engineered frame to scoreable rows.
pub fn finalize(features: &DataFrame) -> PipelineResult<Finalized> {
    let daily_rows = features.height();
    let mut frame = round_float_columns(features)?;

    for name in RAW_MARKET_COLUMNS {
        frame = frame.drop(name)?;
    }

    frame = drop_incomplete_rows(frame)?;

    let target = column_with_nulls(&frame, schema::TARGET)?;
    let historical_directions: Vec<Direction> =
        target.into_iter().map(Direction::from_change).collect();
    let ups = historical_directions
        .iter()
        .filter(|d| **d == Direction::Up)
        .count();
    debug!(
        rows = historical_directions.len(),
        up = ups,
        down = historical_directions.len() - ups,
        "Historical direction mix of complete rows"
    );
    frame = frame.drop(schema::TARGET)?;

    ensure_model_columns(&frame)?;
    debug!(
        daily_rows,
        complete_rows = frame.height(),
        "Feature rows finalized"
    );

    Ok(Finalized {
        frame,
        daily_rows,
        historical_directions,
    })
}

fn round_float_columns(frame: &DataFrame) -> PipelineResult<DataFrame> {
    let mut out = frame.clone();
    let float_names: Vec<String> = frame
        .get_columns()
        .iter()
        .filter(|series| matches!(series.dtype(), DataType::Float64))
        .map(|series| series.name().to_string())
        .collect();
    for name in float_names {
        let rounded = round_column(&column_with_nulls(frame, &name)?, ROUND_DECIMALS);
        out.with_column(Series::new(&name, rounded))?;
    }
    Ok(out)
}

fn drop_incomplete_rows(frame: DataFrame) -> PipelineResult<DataFrame> {
    let mut mask_opt: Option<BooleanChunked> = None;
    for series in frame.get_columns() {
        let col_mask = series.is_not_null();
        mask_opt = Some(match mask_opt {
            None => col_mask,
            Some(prev) => prev & col_mask,
        });
    }
    match mask_opt {
        Some(mask) => Ok(frame.filter(&mask)?),
        None => Ok(frame),
    }
}

fn ensure_model_columns(frame: &DataFrame) -> PipelineResult<()> {
    let names = frame.get_column_names();
    let expected: Vec<&str> = std::iter::once(schema::DATE)
        .chain(MODEL_INPUT_COLUMNS.iter().copied())
        .collect();
    if names == expected {
        return Ok(());
    }
    let mismatch = names
        .iter()
        .zip(expected.iter())
        .position(|(got, want)| got != want)
        .unwrap_or_else(|| names.len().min(expected.len()));
    Err(PipelineError::Schema(format!(
        "finalized columns diverge from the model contract at position {mismatch}: \
         got {:?}, expected {:?} ({} vs {} columns)",
        names.get(mismatch),
        expected.get(mismatch),
        names.len(),
        expected.len()
    )))
}

fn cell_as_f64(frame: &DataFrame, name: &str, idx: usize) -> PipelineResult<f64> {
    let series = frame
        .column(name)
        .map_err(|_| PipelineError::Schema(format!("model column {name} is missing")))?;
    let value = match series.dtype() {
        DataType::Float64 => series.f64()?.get(idx),
        DataType::Int64 => series.i64()?.get(idx).map(|v| v as f64),
        other => {
            return Err(PipelineError::Schema(format!(
                "model column {name} has unsupported dtype {other:?}"
            )));
        }
    };
    value.ok_or_else(|| PipelineError::Schema(format!("model column {name} is null at row {idx}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_input_lookup_by_name() {
        let mut values = vec![0.0; MODEL_INPUT_COLUMNS.len()];
        values[0] = 1.5;
        values[MODEL_INPUT_COLUMNS.len() - 1] = -2.0;
        let input = ModelInput {
            date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            values,
        };
        assert_eq!(input.get("Price_Diff"), Some(1.5));
        assert_eq!(input.get("Change_Range_30d"), Some(-2.0));
        assert_eq!(input.get("Price"), None);
    }
}
