//! Window and shift primitives over columns with missing values.
//!
//! Every helper returns a column of the same length as its input. A window
//! statistic is only defined when all values inside the window are present;
//! otherwise the output cell is `None`. Non-finite results are stored as
//! `None` so they are treated like any other missing value downstream.

pub type Column = Vec<Option<f64>>;

fn finite(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}

/// Element-wise binary operation; missing if either side is missing.
pub fn zip_with(a: &[Option<f64>], b: &[Option<f64>], op: impl Fn(f64, f64) -> f64) -> Column {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| match (x, y) {
            (Some(x), Some(y)) => finite(op(*x, *y)),
            _ => None,
        })
        .collect()
}

pub fn map(values: &[Option<f64>], op: impl Fn(f64) -> f64) -> Column {
    values
        .iter()
        .map(|value| value.and_then(|v| finite(op(v))))
        .collect()
}

/// Value `lag` rows earlier (positive) or later (negative).
pub fn shift(values: &[Option<f64>], lag: isize) -> Column {
    let len = values.len() as isize;
    (0..len)
        .map(|i| {
            let source = i - lag;
            if source < 0 || source >= len {
                None
            } else {
                values[source as usize]
            }
        })
        .collect()
}

/// Relative change against the value `periods` rows earlier.
pub fn pct_change(values: &[Option<f64>], periods: usize) -> Column {
    values
        .iter()
        .enumerate()
        .map(|(i, current)| {
            if i < periods {
                return None;
            }
            match (current, values[i - periods]) {
                (Some(current), Some(base)) => finite(current / base - 1.0),
                _ => None,
            }
        })
        .collect()
}

/// Running product that steps over missing cells, leaving them missing.
pub fn cumulative_product(values: &[Option<f64>]) -> Column {
    let mut acc = 1.0;
    values
        .iter()
        .map(|value| {
            value.and_then(|v| {
                acc *= v;
                finite(acc)
            })
        })
        .collect()
}

fn rolling(values: &[Option<f64>], window: usize, stat: impl Fn(&[f64]) -> f64) -> Column {
    let mut out = vec![None; values.len()];
    if window == 0 || window > values.len() {
        return out;
    }
    let mut buffer = Vec::with_capacity(window);
    for end in window - 1..values.len() {
        buffer.clear();
        for value in &values[end + 1 - window..=end] {
            match value {
                Some(v) => buffer.push(*v),
                None => break,
            }
        }
        if buffer.len() == window {
            out[end] = finite(stat(&buffer));
        }
    }
    out
}

pub fn rolling_mean(values: &[Option<f64>], window: usize) -> Column {
    rolling(values, window, mean)
}

/// Sample standard deviation (n - 1 denominator).
pub fn rolling_std(values: &[Option<f64>], window: usize) -> Column {
    if window < 2 {
        return vec![None; values.len()];
    }
    rolling(values, window, |slice| {
        let mean_val = mean(slice);
        let variance_sum = slice.iter().map(|x| (x - mean_val).powi(2)).sum::<f64>();
        (variance_sum / (slice.len() - 1) as f64).sqrt()
    })
}

pub fn rolling_median(values: &[Option<f64>], window: usize) -> Column {
    rolling(values, window, |slice| {
        let mut sorted = slice.to_vec();
        sorted.sort_by(f64::total_cmp);
        let mid = sorted.len() / 2;
        if sorted.len() % 2 == 0 {
            (sorted[mid - 1] + sorted[mid]) / 2.0
        } else {
            sorted[mid]
        }
    })
}

pub fn rolling_min(values: &[Option<f64>], window: usize) -> Column {
    rolling(values, window, |slice| {
        slice.iter().copied().fold(f64::INFINITY, f64::min)
    })
}

pub fn rolling_max(values: &[Option<f64>], window: usize) -> Column {
    rolling(values, window, |slice| {
        slice.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    })
}

fn mean(slice: &[f64]) -> f64 {
    slice.iter().sum::<f64>() / slice.len() as f64
}

/// Rounds to `decimals` places, resolving exact halves to the even
/// neighbour on the scaled value.
pub fn round_to_decimals(value: f64, decimals: u32) -> f64 {
    if !value.is_finite() {
        return value;
    }
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round_ties_even() / factor
}

pub fn round_column(values: &[Option<f64>], decimals: u32) -> Column {
    values
        .iter()
        .map(|value| value.map(|v| round_to_decimals(v, decimals)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(values: &[f64]) -> Column {
        values.iter().copied().map(Some).collect()
    }

    #[test]
    fn rolling_std_requires_full_window() {
        let values = col(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        let std = rolling_std(&values, 5);
        assert!(std[..4].iter().all(Option::is_none));
        let expected = 2.5f64.sqrt();
        assert!((std[4].unwrap() - expected).abs() < 1e-12);
    }

    #[test]
    fn missing_value_inside_window_poisons_the_statistic() {
        let values = vec![Some(1.0), None, Some(3.0), Some(4.0), Some(5.0), Some(6.0)];
        let mean = rolling_mean(&values, 3);
        assert_eq!(mean[2], None);
        assert_eq!(mean[3], None);
        assert_eq!(mean[4], Some(4.0));
        assert_eq!(mean[5], Some(5.0));
    }

    #[test]
    fn median_of_even_window_averages_middle_pair() {
        let values = col(&[4.0, 1.0, 3.0, 2.0]);
        assert_eq!(rolling_median(&values, 4)[3], Some(2.5));
        assert_eq!(rolling_median(&values, 3)[2], Some(3.0));
    }

    #[test]
    fn extrema_track_window_bounds() {
        let values = col(&[3.0, -1.0, 2.0, 5.0]);
        assert_eq!(rolling_min(&values, 2), vec![None, Some(-1.0), Some(-1.0), Some(2.0)]);
        assert_eq!(rolling_max(&values, 2), vec![None, Some(3.0), Some(2.0), Some(5.0)]);
    }

    #[test]
    fn pct_change_uses_value_periods_back() {
        let values = col(&[100.0, 110.0, 121.0]);
        let change = pct_change(&values, 1);
        assert_eq!(change[0], None);
        assert!((change[1].unwrap() - 0.1).abs() < 1e-12);
        let two = pct_change(&values, 2);
        assert!((two[2].unwrap() - 0.21).abs() < 1e-12);
    }

    #[test]
    fn pct_change_from_zero_base_is_missing() {
        let values = col(&[0.0, 5.0]);
        assert_eq!(pct_change(&values, 1), vec![None, None]);
    }

    #[test]
    fn shift_moves_both_directions() {
        let values = col(&[1.0, 2.0, 3.0]);
        assert_eq!(shift(&values, 1), vec![None, Some(1.0), Some(2.0)]);
        assert_eq!(shift(&values, -1), vec![Some(2.0), Some(3.0), None]);
    }

    #[test]
    fn cumulative_product_skips_missing_rows() {
        let values = vec![Some(2.0), None, Some(3.0)];
        assert_eq!(cumulative_product(&values), vec![Some(2.0), None, Some(6.0)]);
    }

    #[test]
    fn rounding_resolves_halves_to_even() {
        assert_eq!(round_to_decimals(0.125, 2), 0.12);
        assert_eq!(round_to_decimals(0.375, 2), 0.38);
        assert_eq!(round_to_decimals(-1.234, 2), -1.23);
        assert_eq!(round_to_decimals(2.0, 2), 2.0);
    }
}
