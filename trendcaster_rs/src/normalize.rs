use chrono::{Duration, NaiveDate};
use polars::prelude::*;
use tracing::{info, warn};

use crate::config::ParseOptions;
use crate::data::{
    RawRow, UploadTable, parse_change_pct, parse_date, parse_grouped_number, parse_volume,
};
use crate::error::{PipelineError, PipelineResult};
use crate::rolling::Column;
use crate::schema;

/// Gap-free daily series: one entry per calendar day between the first and
/// last uploaded date.
#[derive(Debug, Clone, PartialEq)]
pub struct DailySeries {
    pub dates: Vec<NaiveDate>,
    pub price: Column,
    pub open: Column,
    pub high: Column,
    pub low: Column,
    pub volume: Column,
    pub change_pct: Column,
}

impl DailySeries {
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    /// Frame form consumed by the feature engine. `Date` is kept as an ISO
    /// `YYYY-MM-DD` string column.
    pub fn to_frame(&self) -> PipelineResult<DataFrame> {
        let dates: Vec<String> = self
            .dates
            .iter()
            .map(|date| date.format("%Y-%m-%d").to_string())
            .collect();
        let frame = DataFrame::new(vec![
            Series::new(schema::DATE, dates),
            Series::new(schema::PRICE, self.price.clone()),
            Series::new(schema::OPEN, self.open.clone()),
            Series::new(schema::HIGH, self.high.clone()),
            Series::new(schema::LOW, self.low.clone()),
            Series::new(schema::VOLUME, self.volume.clone()),
            Series::new(schema::CHANGE_PCT, self.change_pct.clone()),
        ])?;
        Ok(frame)
    }
}

/// One upload row after cell parsing, before calendar reindexing.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub date: NaiveDate,
    pub price: Option<f64>,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub volume: Option<f64>,
    pub change_pct: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    options: ParseOptions,
}

impl Normalizer {
    pub fn new(options: ParseOptions) -> Self {
        Self { options }
    }

    pub fn normalize(&self, upload: &UploadTable) -> PipelineResult<DailySeries> {
        let observations = self.parse_rows(&upload.rows()?)?;
        let series = reindex_daily(observations, self.options.max_span_days)?;
        Ok(series)
    }

    /// Parses every row and returns them sorted by date. Rows sharing a date
    /// keep their upload order.
    pub fn parse_rows(&self, rows: &[RawRow]) -> PipelineResult<Vec<Observation>> {
        let mut observations = rows
            .iter()
            .map(|row| self.parse_row(row))
            .collect::<PipelineResult<Vec<_>>>()?;
        observations.sort_by_key(|obs| obs.date);
        Ok(observations)
    }

    pub fn parse_row(&self, row: &RawRow) -> PipelineResult<Observation> {
        let raw_date = row.date.as_deref().unwrap_or_default();
        let date = parse_date(raw_date, &self.options.date_formats).ok_or_else(|| {
            PipelineError::InvalidDate {
                row: row.line,
                value: raw_date.to_string(),
            }
        })?;

        let change_pct = match row.change_pct.as_deref() {
            Some(raw) => parse_change_pct(raw).map_err(|_| PipelineError::MalformedChange {
                row: row.line,
                value: raw.to_string(),
            })?,
            None => None,
        };

        Ok(Observation {
            date,
            price: grouped_cell(row, schema::PRICE, row.price.as_deref()),
            open: grouped_cell(row, schema::OPEN, row.open.as_deref()),
            high: grouped_cell(row, schema::HIGH, row.high.as_deref()),
            low: grouped_cell(row, schema::LOW, row.low.as_deref()),
            volume: row.volume.as_deref().and_then(parse_volume),
            change_pct,
        })
    }
}

fn grouped_cell(row: &RawRow, column: &str, raw: Option<&str>) -> Option<f64> {
    let raw = raw?;
    let parsed = parse_grouped_number(raw);
    if parsed.is_none() {
        warn!(row = row.line, column, value = raw, "Unparseable number; treating as missing");
    }
    parsed
}

/// Places date-sorted observations on a complete calendar-day index and
/// fills gaps by linear interpolation over row position.
fn reindex_daily(
    observations: Vec<Observation>,
    max_span_days: usize,
) -> PipelineResult<DailySeries> {
    let (Some(first), Some(last)) = (observations.first(), observations.last()) else {
        return Err(PipelineError::EmptyUpload);
    };
    let start = first.date;
    let span = (last.date - start).num_days() as usize + 1;
    if span > max_span_days {
        return Err(PipelineError::SpanTooLong {
            days: span,
            max: max_span_days,
        });
    }

    let mut dates = Vec::with_capacity(span);
    for offset in 0..span {
        dates.push(start + Duration::days(offset as i64));
    }

    let mut series = DailySeries {
        dates,
        price: vec![None; span],
        open: vec![None; span],
        high: vec![None; span],
        low: vec![None; span],
        volume: vec![None; span],
        change_pct: vec![None; span],
    };

    let mut previous: Option<NaiveDate> = None;
    for obs in &observations {
        if previous == Some(obs.date) {
            return Err(PipelineError::DuplicateDate { date: obs.date });
        }
        previous = Some(obs.date);
        let idx = (obs.date - start).num_days() as usize;
        series.price[idx] = obs.price;
        series.open[idx] = obs.open;
        series.high[idx] = obs.high;
        series.low[idx] = obs.low;
        series.volume[idx] = obs.volume;
        series.change_pct[idx] = obs.change_pct;
    }

    let mut filled = 0;
    for column in [
        &mut series.price,
        &mut series.open,
        &mut series.high,
        &mut series.low,
        &mut series.volume,
        &mut series.change_pct,
    ] {
        filled += interpolate_linear(column);
    }

    info!(
        uploaded_rows = observations.len(),
        daily_rows = span,
        interpolated_cells = filled,
        from = %start,
        to = %last.date,
        "Upload normalized onto a daily calendar"
    );
    Ok(series)
}

/// Fills interior gaps between known values; leading and trailing gaps stay
/// missing. Returns how many cells were filled.
pub fn interpolate_linear(values: &mut [Option<f64>]) -> usize {
    let mut filled = 0;
    let mut last_known: Option<(usize, f64)> = None;
    for idx in 0..values.len() {
        let Some(current) = values[idx] else {
            continue;
        };
        if let Some((prev_idx, prev)) = last_known {
            let steps = (idx - prev_idx) as f64;
            for gap in prev_idx + 1..idx {
                let fraction = (gap - prev_idx) as f64 / steps;
                values[gap] = Some(prev + (current - prev) * fraction);
                filled += 1;
            }
        }
        last_known = Some((idx, current));
    }
    filled
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload(body: &str) -> UploadTable {
        let csv = format!("Date,Price,Open,High,Low,Vol.,Change %\n{body}");
        UploadTable::from_bytes(csv.as_bytes()).expect("upload")
    }

    #[test]
    fn skipped_day_takes_the_midpoint() {
        let table = upload("01/03/2024,20,20,20,20,2K,1.00%\n01/01/2024,10,10,10,10,1K,-1.00%\n");
        let series = Normalizer::default().normalize(&table).expect("normalize");
        assert_eq!(series.len(), 3);
        assert_eq!(series.dates[1], NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert_eq!(series.price[1], Some(15.0));
        assert_eq!(series.volume[1], Some(1500.0));
        assert_eq!(series.change_pct[1], Some(0.0));
    }

    #[test]
    fn interpolation_is_positional_not_time_weighted() {
        let mut values = vec![Some(0.0), None, None, Some(3.0), None, Some(5.0)];
        let filled = interpolate_linear(&mut values);
        assert_eq!(filled, 3);
        assert_eq!(
            values,
            vec![Some(0.0), Some(1.0), Some(2.0), Some(3.0), Some(4.0), Some(5.0)]
        );
    }

    #[test]
    fn edge_gaps_stay_missing() {
        let mut values = vec![None, Some(2.0), None, Some(4.0), None];
        interpolate_linear(&mut values);
        assert_eq!(values, vec![None, Some(2.0), Some(3.0), Some(4.0), None]);
    }

    #[test]
    fn unparseable_price_is_filled_from_neighbours() {
        let table = upload(
            "01/01/2024,10,10,10,10,1K,0.10%\n01/02/2024,oops,12,12,12,1K,0.10%\n01/03/2024,14,14,14,14,1K,0.10%\n",
        );
        let series = Normalizer::default().normalize(&table).expect("normalize");
        assert_eq!(series.price[1], Some(12.0));
    }

    #[test]
    fn duplicate_dates_are_rejected() {
        let table = upload("01/01/2024,10,10,10,10,1K,0.10%\n01/01/2024,11,11,11,11,1K,0.10%\n");
        let err = Normalizer::default().normalize(&table).unwrap_err();
        assert!(matches!(err, PipelineError::DuplicateDate { .. }));
    }

    #[test]
    fn span_beyond_the_limit_is_rejected_before_reindexing() {
        let table = upload("01/01/1990,10,10,10,10,1K,0.10%\n01/01/2024,11,11,11,11,1K,0.10%\n");
        let options = ParseOptions {
            max_span_days: 366,
            ..ParseOptions::default()
        };
        match Normalizer::new(options).normalize(&table).unwrap_err() {
            PipelineError::SpanTooLong { days, max } => {
                assert_eq!(days, 12_419);
                assert_eq!(max, 366);
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(Normalizer::default().normalize(&table).is_ok());
    }

    #[test]
    fn unsorted_upload_is_reindexed_in_date_order() {
        let table = upload(
            "01/04/2024,40,40,40,40,1K,0.10%\n01/01/2024,10,10,10,10,1K,0.10%\n01/02/2024,20,20,20,20,1K,0.10%\n",
        );
        let series = Normalizer::default().normalize(&table).expect("normalize");
        assert_eq!(series.price, vec![Some(10.0), Some(20.0), Some(30.0), Some(40.0)]);
    }

    #[test]
    fn malformed_change_names_the_row() {
        let table = upload("01/01/2024,10,10,10,10,1K,0.10%\n01/02/2024,11,11,11,11,1K,abc%\n");
        match Normalizer::default().normalize(&table).unwrap_err() {
            PipelineError::MalformedChange { row, value } => {
                assert_eq!(row, 2);
                assert_eq!(value, "abc%");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn unknown_date_layout_is_rejected() {
        let table = upload("someday,10,10,10,10,1K,0.10%\n");
        assert!(matches!(
            Normalizer::default().normalize(&table).unwrap_err(),
            PipelineError::InvalidDate { row: 1, .. }
        ));
    }
}
