//! Two-sample Kolmogorov–Smirnov test.

use crate::DriftError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KsResult {
    /// Largest absolute gap between the two empirical CDFs.
    pub statistic: f64,
    pub p_value: f64,
}

/// Samples with fewer grid cells than this get an exact p-value.
const EXACT_MAX_CELLS: usize = 10_000;

/// Runs the test on two samples. Small samples (`n1 * n2 < 10_000`) get the
/// exact two-sided p-value; larger ones use the asymptotic Kolmogorov
/// distribution with Stephens' small-sample correction.
pub fn ks_2samp(column: &str, a: &[f64], b: &[f64]) -> Result<KsResult, DriftError> {
    if a.is_empty() || b.is_empty() {
        return Err(DriftError::EmptyColumn {
            column: column.to_string(),
        });
    }
    if a.iter().chain(b).any(|v| !v.is_finite()) {
        return Err(DriftError::NonFinite {
            column: column.to_string(),
        });
    }

    let mut a = a.to_vec();
    let mut b = b.to_vec();
    a.sort_by(f64::total_cmp);
    b.sort_by(f64::total_cmp);

    let (n1, n2) = (a.len() as f64, b.len() as f64);
    let (mut i, mut j) = (0, 0);
    let mut statistic = 0.0f64;
    while i < a.len() && j < b.len() {
        let x = a[i].min(b[j]);
        while i < a.len() && a[i] <= x {
            i += 1;
        }
        while j < b.len() && b[j] <= x {
            j += 1;
        }
        statistic = statistic.max((i as f64 / n1 - j as f64 / n2).abs());
    }

    let p_value = if a.len() * b.len() < EXACT_MAX_CELLS {
        exact_p_value(a.len(), b.len(), statistic)
    } else {
        let en = (n1 * n2 / (n1 + n2)).sqrt();
        kolmogorov_q((en + 0.12 + 0.11 / en) * statistic)
    };
    Ok(KsResult { statistic, p_value })
}

/// `P(D >= statistic)` under the null, from the share of monotone lattice
/// paths `(0, 0) -> (m, n)` that leave the band `|i/m - j/n| < statistic`.
fn exact_p_value(m: usize, n: usize, statistic: f64) -> f64 {
    // every gap is a multiple of 1 / (m n)
    let bound = (statistic * (m * n) as f64).round() as i64;
    if bound == 0 {
        return 1.0;
    }
    let inside = |i: usize, j: usize| (i as i64 * n as i64 - j as i64 * m as i64).abs() < bound;

    // reach[j]: probability a uniformly random path hits (i, j) without
    // leaving the band, one row of the grid at a time
    let mut reach = vec![0.0f64; n + 1];
    for i in 0..=m {
        for j in 0..=n {
            let value = if i == 0 && j == 0 {
                1.0
            } else {
                let mut value = 0.0;
                if i > 0 {
                    let (left, right) = ((m - i + 1) as f64, (n - j) as f64);
                    value += reach[j] * left / (left + right);
                }
                if j > 0 {
                    let (left, right) = ((m - i) as f64, (n - j + 1) as f64);
                    value += reach[j - 1] * right / (left + right);
                }
                value
            };
            reach[j] = if inside(i, j) { value } else { 0.0 };
        }
    }
    (1.0 - reach[n]).clamp(0.0, 1.0)
}

/// Survival function of the Kolmogorov distribution,
/// `2 Σ (-1)^(k-1) exp(-2 k² λ²)`.
fn kolmogorov_q(lambda: f64) -> f64 {
    let a2 = -2.0 * lambda * lambda;
    let mut sign = 2.0;
    let mut sum = 0.0;
    let mut previous = 0.0f64;

    for k in 1..=100 {
        let term = sign * (a2 * (k * k) as f64).exp();
        sum += term;
        if term.abs() <= 0.001 * previous.abs() || term.abs() <= 1e-8 * sum.abs() {
            return sum.clamp(0.0, 1.0);
        }
        sign = -sign;
        previous = term;
    }
    // series did not converge: lambda is tiny and the samples agree
    1.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linspace(start: f64, step: f64, n: usize) -> Vec<f64> {
        (0..n).map(|i| start + step * i as f64).collect()
    }

    #[test]
    fn identical_samples_have_p_one() {
        let a = linspace(0.0, 0.1, 200);
        let result = ks_2samp("x", &a, &a).unwrap();
        assert_eq!(result.statistic, 0.0);
        assert_eq!(result.p_value, 1.0);
    }

    #[test]
    fn disjoint_samples_are_significant() {
        let a = linspace(0.0, 0.1, 100);
        let b = linspace(100.0, 0.1, 100);
        let result = ks_2samp("x", &a, &b).unwrap();
        assert_eq!(result.statistic, 1.0);
        assert!(result.p_value < 1e-6);
    }

    #[test]
    fn statistic_is_max_cdf_gap() {
        let result = ks_2samp("x", &[1.0, 2.0, 3.0, 4.0], &[3.0, 4.0, 5.0, 6.0]).unwrap();
        assert_eq!(result.statistic, 0.5);
        assert!(result.p_value > 0.05);
    }

    #[test]
    fn small_samples_use_exact_p_value() {
        let a = linspace(1.0, 1.0, 10);
        let b = linspace(7.0, 1.0, 10);
        let result = ks_2samp("x", &a, &b).unwrap();
        assert!((result.statistic - 0.6).abs() < 1e-12);
        // 2 * C(20, 4) / C(20, 10)
        assert!((result.p_value - 9_690.0 / 184_756.0).abs() < 1e-9);
        assert!(result.p_value > 0.05);

        // the asymptotic formula would call this significant
        let en = 5f64.sqrt();
        assert!(kolmogorov_q((en + 0.12 + 0.11 / en) * result.statistic) < 0.05);
    }

    #[test]
    fn exact_p_value_for_unequal_sizes() {
        let result = ks_2samp("x", &[1.0, 2.0, 3.0], &[4.0, 5.0, 6.0, 7.0, 8.0]).unwrap();
        assert_eq!(result.statistic, 1.0);
        // only the two extreme paths reach D = 1, out of C(8, 3)
        assert!((result.p_value - 2.0 / 56.0).abs() < 1e-12);

        let identical = ks_2samp("x", &[1.0, 2.0], &[1.0, 2.0]).unwrap();
        assert_eq!(identical.p_value, 1.0);
    }

    #[test]
    fn rejects_bad_columns() {
        assert!(matches!(
            ks_2samp("x", &[], &[1.0]),
            Err(DriftError::EmptyColumn { .. })
        ));
        assert!(matches!(
            ks_2samp("x", &[f64::NAN], &[1.0]),
            Err(DriftError::NonFinite { .. })
        ));
    }

    #[test]
    fn q_is_monotone() {
        assert!(kolmogorov_q(0.5) > kolmogorov_q(1.0));
        assert!(kolmogorov_q(1.0) > kolmogorov_q(2.0));
        // critical value for alpha = 0.05
        assert!((kolmogorov_q(1.358) - 0.05).abs() < 1e-3);
    }
}
