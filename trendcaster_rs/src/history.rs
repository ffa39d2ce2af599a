use std::collections::BTreeMap;
use std::path::Path;

use chrono::Datelike;
use tracing::info;

use crate::config::ParseOptions;
use crate::data::UploadTable;
use crate::error::{PipelineError, PipelineResult};
use crate::normalize::{Normalizer, Observation};

#[derive(Debug, Clone, PartialEq)]
pub struct YearClose {
    pub year: i32,
    pub last: Observation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonthClose {
    /// `YYYY-MM`
    pub label: String,
    pub last: Observation,
}

/// Bundled historical prices shown alongside forecasts. Values are parsed
/// but never interpolated.
#[derive(Debug, Clone)]
pub struct ReferenceHistory {
    observations: Vec<Observation>,
}

impl ReferenceHistory {
    pub fn load(path: &Path, options: ParseOptions) -> PipelineResult<Self> {
        let history = UploadTable::from_path(path)
            .and_then(|table| Self::from_table(&table, options))
            .map_err(|err| match err {
                PipelineError::EmptyUpload => PipelineError::Schema(format!(
                    "reference history {} has no rows",
                    path.display()
                )),
                other => other,
            })?;
        info!(
            path = %path.display(),
            rows = history.observations.len(),
            "Reference history loaded"
        );
        Ok(history)
    }

    pub fn from_table(table: &UploadTable, options: ParseOptions) -> PipelineResult<Self> {
        let observations = Normalizer::new(options).parse_rows(&table.rows()?)?;
        if observations.is_empty() {
            return Err(PipelineError::Schema("reference history has no rows".to_string()));
        }
        Ok(Self { observations })
    }

    /// Observations in ascending date order.
    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    /// First and last calendar year covered.
    pub fn year_span(&self) -> Option<(i32, i32)> {
        let first = self.observations.first()?.date.year();
        let last = self.observations.last()?.date.year();
        Some((first, last))
    }

    /// Last observation of every year, oldest year first.
    pub fn yearly(&self) -> Vec<YearClose> {
        let mut by_year = BTreeMap::new();
        for obs in &self.observations {
            by_year.insert(obs.date.year(), obs);
        }
        by_year
            .into_iter()
            .map(|(year, last)| YearClose {
                year,
                last: last.clone(),
            })
            .collect()
    }

    /// Yearly closes restricted to `[from, to]`, both inclusive.
    pub fn yearly_between(&self, from: i32, to: i32) -> Vec<YearClose> {
        self.yearly()
            .into_iter()
            .filter(|close| close.year >= from && close.year <= to)
            .collect()
    }

    /// Last observation of every month, newest month first.
    pub fn monthly(&self) -> Vec<MonthClose> {
        let mut by_month = BTreeMap::new();
        for obs in &self.observations {
            by_month.insert((obs.date.year(), obs.date.month()), obs);
        }
        by_month
            .into_iter()
            .rev()
            .map(|((year, month), last)| MonthClose {
                label: format!("{year:04}-{month:02}"),
                last: last.clone(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn history(body: &str) -> ReferenceHistory {
        let csv = format!("Date,Price,Open,High,Low,Vol.,Change %\n{body}");
        let table = UploadTable::from_bytes(csv.as_bytes()).expect("table");
        ReferenceHistory::from_table(&table, ParseOptions::default()).expect("history")
    }

    #[test]
    fn yearly_keeps_last_close_of_each_year() {
        let history = history(
            "01/05/2024,30,30,30,30,1K,0.5%\n\
             12/30/2022,10,10,10,10,1K,0.5%\n\
             06/01/2023,15,15,15,15,1K,0.5%\n\
             12/29/2023,20,20,20,20,1K,0.5%\n",
        );
        let yearly = history.yearly();
        let summary: Vec<(i32, Option<f64>)> =
            yearly.iter().map(|c| (c.year, c.last.price)).collect();
        assert_eq!(
            summary,
            vec![(2022, Some(10.0)), (2023, Some(20.0)), (2024, Some(30.0))]
        );
        assert_eq!(history.year_span(), Some((2022, 2024)));
        assert_eq!(history.yearly_between(2023, 2023).len(), 1);
    }

    #[test]
    fn monthly_is_newest_first() {
        let history = history(
            "01/02/2024,10,10,10,10,1K,0.5%\n\
             01/31/2024,11,11,11,11,1K,0.5%\n\
             02/01/2024,12,12,12,12,1K,0.5%\n",
        );
        let monthly = history.monthly();
        assert_eq!(monthly.len(), 2);
        assert_eq!(monthly[0].label, "2024-02");
        assert_eq!(monthly[1].label, "2024-01");
        assert_eq!(
            monthly[1].last.date,
            NaiveDate::from_ymd_opt(2024, 1, 31).unwrap()
        );
    }

    #[test]
    fn empty_history_file_is_a_schema_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("history.csv");
        std::fs::write(&path, "Date,Price,Open,High,Low,Vol.,Change %\n").expect("write");
        let err = ReferenceHistory::load(&path, ParseOptions::default()).unwrap_err();
        assert!(matches!(err, PipelineError::Schema(_)));
    }
}
