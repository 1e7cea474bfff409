use serde::Serialize;

/// Summary statistics of one column. `std` uses the sample (n - 1)
/// denominator and quartiles interpolate linearly between order statistics.
/// Fields are NaN where undefined (empty column, or `std` of one value).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ColumnStats {
    pub count: usize,
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    #[serde(rename = "25%")]
    pub q25: f64,
    #[serde(rename = "50%")]
    pub q50: f64,
    #[serde(rename = "75%")]
    pub q75: f64,
    pub max: f64,
}

impl ColumnStats {
    pub fn describe(values: &[f64]) -> Self {
        let count = values.len();
        if count == 0 {
            return Self {
                count,
                mean: f64::NAN,
                std: f64::NAN,
                min: f64::NAN,
                q25: f64::NAN,
                q50: f64::NAN,
                q75: f64::NAN,
                max: f64::NAN,
            };
        }

        let mean = mean(values);
        let std = if count > 1 {
            let ss = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>();
            (ss / (count - 1) as f64).sqrt()
        } else {
            f64::NAN
        };

        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);
        Self {
            count,
            mean,
            std,
            min: sorted[0],
            q25: quantile(&sorted, 0.25),
            q50: quantile(&sorted, 0.5),
            q75: quantile(&sorted, 0.75),
            max: sorted[count - 1],
        }
    }
}

pub fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Linear interpolation between the two closest ranks of a sorted slice.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_describe_of_one_to_four() {
        let stats = ColumnStats::describe(&[4.0, 1.0, 3.0, 2.0]);
        assert_eq!(stats.count, 4);
        assert_eq!(stats.mean, 2.5);
        assert!((stats.std - 1.2909944487358056).abs() < 1e-12);
        assert_eq!((stats.min, stats.max), (1.0, 4.0));
        assert_eq!((stats.q25, stats.q50, stats.q75), (1.75, 2.5, 3.25));
    }

    #[test]
    fn single_value_has_undefined_std() {
        let stats = ColumnStats::describe(&[7.0]);
        assert_eq!(stats.q50, 7.0);
        assert!(stats.std.is_nan());
    }

    #[test]
    fn empty_column_is_all_nan() {
        let stats = ColumnStats::describe(&[]);
        assert_eq!(stats.count, 0);
        assert!(stats.mean.is_nan() && stats.max.is_nan());
    }
}
