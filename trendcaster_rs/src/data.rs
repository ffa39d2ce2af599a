use std::io::Cursor;
use std::path::Path;

use chrono::NaiveDate;
use polars::prelude::*;
use tracing::{debug, warn};

use crate::error::{PipelineError, PipelineResult};
use crate::schema::{self, UPLOAD_COLUMNS};

const BYTE_ORDER_MARK: char = '\u{feff}';

/// One upload row with every field still in its exported text form.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    /// 1-based data row number in the upload (header excluded).
    pub line: usize,
    pub date: Option<String>,
    pub price: Option<String>,
    pub open: Option<String>,
    pub high: Option<String>,
    pub low: Option<String>,
    pub volume: Option<String>,
    pub change_pct: Option<String>,
}

/// A vendor historical-data export, read with every column as text so the
/// locale-specific number formats can be parsed explicitly.
#[derive(Clone)]
pub struct UploadTable {
    frame: DataFrame,
}

impl UploadTable {
    pub fn from_path(path: &Path) -> PipelineResult<Self> {
        let frame = CsvReader::from_path(path)?
            .has_header(true)
            .infer_schema(Some(0))
            .finish()?;
        debug!(path = %path.display(), rows = frame.height(), "Upload read from disk");
        Self::from_frame(frame)
    }

    pub fn from_bytes(bytes: &[u8]) -> PipelineResult<Self> {
        let frame = CsvReader::new(Cursor::new(bytes.to_vec()))
            .has_header(true)
            .infer_schema(Some(0))
            .finish()?;
        Self::from_frame(frame)
    }

    /// Validates the header shape of an already-read frame. Extra columns
    /// are tolerated and ignored downstream.
    pub fn from_frame(mut frame: DataFrame) -> PipelineResult<Self> {
        strip_header_bom(&mut frame)?;
        for column in UPLOAD_COLUMNS {
            if frame.column(column).is_err() {
                return Err(PipelineError::MissingColumn {
                    column: column.to_string(),
                });
            }
        }
        if frame.height() == 0 {
            return Err(PipelineError::EmptyUpload);
        }
        Ok(Self { frame })
    }

    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn height(&self) -> usize {
        self.frame.height()
    }

    pub fn rows(&self) -> PipelineResult<Vec<RawRow>> {
        let dates = text_column(&self.frame, schema::DATE)?;
        let prices = text_column(&self.frame, schema::PRICE)?;
        let opens = text_column(&self.frame, schema::OPEN)?;
        let highs = text_column(&self.frame, schema::HIGH)?;
        let lows = text_column(&self.frame, schema::LOW)?;
        let volumes = text_column(&self.frame, schema::VOLUME)?;
        let changes = text_column(&self.frame, schema::CHANGE_PCT)?;

        let rows = dates
            .into_iter()
            .zip(prices)
            .zip(opens)
            .zip(highs)
            .zip(lows)
            .zip(volumes)
            .zip(changes)
            .enumerate()
            .map(
                |(idx, ((((((date, price), open), high), low), volume), change_pct))| RawRow {
                    line: idx + 1,
                    date,
                    price,
                    open,
                    high,
                    low,
                    volume,
                    change_pct,
                },
            )
            .collect();
        Ok(rows)
    }
}

fn strip_header_bom(frame: &mut DataFrame) -> PipelineResult<()> {
    let names: Vec<String> = frame
        .get_column_names()
        .iter()
        .map(|name| name.to_string())
        .collect();
    for name in names {
        let cleaned = name.trim_start_matches(BYTE_ORDER_MARK).trim();
        if cleaned != name {
            frame.rename(&name, cleaned)?;
        }
    }
    Ok(())
}

fn text_column(frame: &DataFrame, name: &str) -> PipelineResult<Vec<Option<String>>> {
    let series = frame
        .column(name)
        .map_err(|_| PipelineError::MissingColumn {
            column: name.to_string(),
        })?;

    let mut out = Vec::with_capacity(series.len());
    for value in series.iter() {
        let cell = match value {
            AnyValue::Null => None,
            AnyValue::String(s) => Some(s.to_string()),
            AnyValue::StringOwned(ref s) => Some(s.to_string()),
            other => Some(other.to_string()),
        };
        out.push(cell.filter(|text| !text.trim().is_empty()));
    }
    Ok(out)
}

/// Parses a decimal that may carry `,` thousands separators ("1,234.50").
/// Anything unparseable is missing.
pub fn parse_grouped_number(raw: &str) -> Option<f64> {
    let cleaned: String = raw.trim().chars().filter(|c| *c != ',').collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok()
}

/// Parses the abbreviated volume column: `K` and `M` suffixes scale the
/// numeric prefix, a bare number is taken as-is.
pub fn parse_volume(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    let (digits, multiplier) = if let Some(prefix) = trimmed.strip_suffix('K') {
        (prefix, 1_000.0)
    } else if let Some(prefix) = trimmed.strip_suffix('M') {
        (prefix, 1_000_000.0)
    } else {
        (trimmed, 1.0)
    };

    match digits.trim().parse::<f64>() {
        Ok(value) => Some(value * multiplier),
        Err(err) => {
            warn!(value = raw, error = %err, "Unparseable volume; treating as missing");
            None
        }
    }
}

/// Parses a `Change %` cell such as "-1.25%". An empty cell is missing; a
/// non-empty cell that is not a number is an error.
pub fn parse_change_pct(raw: &str) -> Result<Option<f64>, std::num::ParseFloatError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    trimmed.trim_end_matches('%').trim().parse::<f64>().map(Some)
}

pub fn parse_date(raw: &str, formats: &[String]) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    formats
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(trimmed, format).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_DATE_FORMATS;

    fn formats() -> Vec<String> {
        DEFAULT_DATE_FORMATS.iter().map(|f| f.to_string()).collect()
    }

    #[test]
    fn volume_suffixes_scale_the_prefix() {
        assert_eq!(parse_volume("1.5K"), Some(1500.0));
        assert_eq!(parse_volume("2M"), Some(2_000_000.0));
        assert_eq!(parse_volume("123.4"), Some(123.4));
        assert_eq!(parse_volume(" 0.25M "), Some(250_000.0));
    }

    #[test]
    fn unparseable_volume_is_missing_not_an_error() {
        assert_eq!(parse_volume("garbage"), None);
        assert_eq!(parse_volume("-"), None);
        assert_eq!(parse_volume("abcK"), None);
        assert_eq!(parse_volume(""), None);
    }

    #[test]
    fn grouped_numbers_drop_thousands_separators() {
        assert_eq!(parse_grouped_number("1,234.50"), Some(1234.5));
        assert_eq!(parse_grouped_number("2,000"), Some(2000.0));
        assert_eq!(parse_grouped_number("98.7"), Some(98.7));
        assert_eq!(parse_grouped_number("n/a"), None);
        assert_eq!(parse_grouped_number("  "), None);
    }

    #[test]
    fn change_pct_strips_trailing_percent() {
        assert_eq!(parse_change_pct("-1.25%"), Ok(Some(-1.25)));
        assert_eq!(parse_change_pct("0.00%"), Ok(Some(0.0)));
        assert_eq!(parse_change_pct(""), Ok(None));
        assert!(parse_change_pct("up%").is_err());
    }

    #[test]
    fn dates_accept_vendor_layouts() {
        let expected = NaiveDate::from_ymd_opt(2024, 10, 18).unwrap();
        assert_eq!(parse_date("10/18/2024", &formats()), Some(expected));
        assert_eq!(parse_date("2024-10-18", &formats()), Some(expected));
        assert_eq!(parse_date("Oct 18, 2024", &formats()), Some(expected));
        assert_eq!(parse_date("18.10.2024", &formats()), Some(expected));
        assert_eq!(parse_date("yesterday", &formats()), None);
    }

    #[test]
    fn upload_without_volume_column_is_rejected() {
        let csv = "Date,Price,Open,High,Low,Change %\n10/18/2024,1,1,1,1,0.5%\n";
        let err = UploadTable::from_bytes(csv.as_bytes())
            .err()
            .expect("missing column must fail");
        match err {
            PipelineError::MissingColumn { column } => assert_eq!(column, "Vol."),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn rows_keep_text_and_numbering() {
        let csv = "\"Date\",\"Price\",\"Open\",\"High\",\"Low\",\"Vol.\",\"Change %\"\n\
                   \"10/18/2024\",\"1,700.00\",\"1,690.00\",\"1,710.00\",\"1,680.00\",\"52.3K\",\"0.59%\"\n\
                   \"10/17/2024\",\"1,690.00\",\"1,700.00\",\"1,705.00\",\"1,685.00\",\"\",\"-0.59%\"\n";
        let table = UploadTable::from_bytes(csv.as_bytes()).expect("upload");
        let rows = table.rows().expect("rows");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].line, 1);
        assert_eq!(rows[0].price.as_deref(), Some("1,700.00"));
        assert_eq!(rows[0].volume.as_deref(), Some("52.3K"));
        assert_eq!(rows[1].line, 2);
        assert_eq!(rows[1].volume, None);
    }
}
