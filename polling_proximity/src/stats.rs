//! Descriptive statistics and two-sample tests.
//!
//! Quantiles follow the linear interpolation of Hyndman & Fan type 7, which
//! is the default of R and numpy.

use statrs::distribution::{ContinuousCDF, StudentsT};

use crate::config::WelchTest;

pub fn mean(data: &[f64]) -> Option<f64> {
    if data.is_empty() {
        return None;
    }
    Some(data.iter().sum::<f64>() / data.len() as f64)
}

/// Sample variance (denominator n - 1).
pub fn sample_variance(data: &[f64]) -> Option<f64> {
    if data.len() < 2 {
        return None;
    }
    let m = mean(data)?;
    let ss: f64 = data.iter().map(|x| (x - m) * (x - m)).sum();
    Some(ss / (data.len() - 1) as f64)
}

pub fn sample_std_dev(data: &[f64]) -> Option<f64> {
    sample_variance(data).map(f64::sqrt)
}

/// Quantile of sorted data, type 7.
pub fn quantile_sorted(sorted: &[f64], p: f64) -> Option<f64> {
    let n = sorted.len();
    if n == 0 || !(0.0..=1.0).contains(&p) {
        return None;
    }
    if n == 1 {
        return Some(sorted[0]);
    }
    let h = (n - 1) as f64 * p;
    let j = h.floor() as usize;
    let g = h - h.floor();
    if j + 1 >= n {
        Some(sorted[n - 1])
    } else if g == 0.0 || sorted[j] == sorted[j + 1] {
        // Tied neighbours: interpolating could move the value by one ulp.
        Some(sorted[j])
    } else {
        Some((1.0 - g) * sorted[j] + g * sorted[j + 1])
    }
}

/// The k + 1 breakpoints 0, 1/k, ..., 1 of the data.
///
/// Returns None for empty data or data containing NaN.
pub fn quantile_breaks(data: &[f64], k: u32) -> Option<Vec<f64>> {
    if data.is_empty() || k == 0 || data.iter().any(|x| x.is_nan()) {
        return None;
    }
    let mut sorted = data.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    (0..=k)
        .map(|i| {
            // The last breakpoint is exactly 1.0 so that the maximum is included.
            let p = if i == k { 1.0 } else { i as f64 / k as f64 };
            quantile_sorted(&sorted, p)
        })
        .collect()
}

/// Two-sided p-value of a Student t statistic.
pub fn two_sided_t_p_value(t: f64, df: f64) -> Option<f64> {
    if !t.is_finite() || !(df > 0.0) {
        return None;
    }
    let dist = StudentsT::new(0.0, 1.0, df).ok()?;
    Some((2.0 * dist.cdf(-t.abs())).min(1.0))
}

/// Welch's unequal variances t-test, two-sided.
///
/// The statistic is computed as mean(a) - mean(b). Returns None when a
/// group has fewer than two values or when both groups are constant.
pub fn welch_t_test(a: &[f64], b: &[f64]) -> Option<WelchTest> {
    let (n1, n2) = (a.len() as f64, b.len() as f64);
    let v1 = sample_variance(a)?;
    let v2 = sample_variance(b)?;
    let se1 = v1 / n1;
    let se2 = v2 / n2;
    let se_sq = se1 + se2;
    if !(se_sq > 0.0) {
        return None;
    }
    let statistic = (mean(a)? - mean(b)?) / se_sq.sqrt();
    let df = se_sq * se_sq / (se1 * se1 / (n1 - 1.0) + se2 * se2 / (n2 - 1.0));
    let p_value = two_sided_t_p_value(statistic, df)?;
    Some(WelchTest {
        statistic,
        df,
        p_value,
    })
}

/// Pearson correlation with the two-sided p-value of the t test for r = 0.
pub fn pearson(x: &[f64], y: &[f64]) -> Option<(f64, Option<f64>)> {
    if x.len() != y.len() || x.len() < 2 {
        return None;
    }
    let mx = mean(x)?;
    let my = mean(y)?;
    let mut sxy = 0.0;
    let mut sxx = 0.0;
    let mut syy = 0.0;
    for (a, b) in x.iter().zip(y.iter()) {
        sxy += (a - mx) * (b - my);
        sxx += (a - mx) * (a - mx);
        syy += (b - my) * (b - my);
    }
    if !(sxx > 0.0 && syy > 0.0) {
        return None;
    }
    let r = (sxy / (sxx * syy).sqrt()).clamp(-1.0, 1.0);
    let df = x.len() as f64 - 2.0;
    let p = if df > 0.0 && r.abs() < 1.0 {
        two_sided_t_p_value(r * (df / (1.0 - r * r)).sqrt(), df)
    } else {
        None
    };
    Some((r, p))
}

/// Standard scores using the sample standard deviation.
///
/// Returns None when the data is constant.
pub fn z_scores(data: &[f64]) -> Option<Vec<f64>> {
    let m = mean(data)?;
    let sd = sample_std_dev(data)?;
    if !(sd > 0.0) {
        return None;
    }
    Some(data.iter().map(|x| (x - m) / sd).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_and_variance() {
        let v = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert_eq!(mean(&v), Some(5.0));
        assert!((sample_variance(&v).unwrap() - 4.571428571428571).abs() < 1e-12);
        assert_eq!(mean(&[]), None);
        assert_eq!(sample_variance(&[1.0]), None);
    }

    #[test]
    fn type_7_quantiles() {
        // R: quantile(c(1, 2, 3, 4, 10), c(0.1, 0.25, 0.5, 0.9))
        let sorted = [1.0, 2.0, 3.0, 4.0, 10.0];
        assert!((quantile_sorted(&sorted, 0.1).unwrap() - 1.4).abs() < 1e-12);
        assert!((quantile_sorted(&sorted, 0.25).unwrap() - 2.0).abs() < 1e-12);
        assert!((quantile_sorted(&sorted, 0.5).unwrap() - 3.0).abs() < 1e-12);
        assert!((quantile_sorted(&sorted, 0.9).unwrap() - 7.6).abs() < 1e-12);
        assert_eq!(quantile_sorted(&sorted, 1.5), None);
    }

    #[test]
    fn tied_values_are_exact() {
        let sorted = [0.1, 0.1];
        for p in [0.2, 0.4, 0.6, 0.8] {
            assert_eq!(quantile_sorted(&sorted, p), Some(0.1));
        }
        assert_eq!(quantile_breaks(&[0.1, 0.1], 5), Some(vec![0.1; 6]));
    }

    #[test]
    fn breaks_cover_extremes() {
        let data = [5.0, 1.0, 3.0, 2.0, 4.0];
        let b = quantile_breaks(&data, 4).unwrap();
        assert_eq!(b, vec![1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(quantile_breaks(&[], 10), None);
        assert_eq!(quantile_breaks(&[1.0, f64::NAN], 10), None);
    }

    #[test]
    fn welch_reference_values() {
        // t.test(c(1, 2, 3, 4, 5), c(2, 4, 6, 8, 10))
        let w = welch_t_test(&[1.0, 2.0, 3.0, 4.0, 5.0], &[2.0, 4.0, 6.0, 8.0, 10.0]).unwrap();
        assert!((w.statistic - (-1.897366596101028)).abs() < 1e-9);
        assert!((w.df - 5.882352941176471).abs() < 1e-9);
        assert!((w.p_value - 0.10753119493062724).abs() < 1e-6);

        let w = welch_t_test(
            &[19.1, 20.3, 18.7, 21.2, 22.0, 19.9],
            &[24.5, 23.1, 25.8, 22.9, 26.4],
        )
        .unwrap();
        assert!((w.statistic - (-5.009396978366143)).abs() < 1e-9);
        assert!((w.df - 7.645330184012966).abs() < 1e-9);
        assert!((w.p_value - 0.0011918253881362254).abs() < 1e-6);
    }

    #[test]
    fn welch_undefined_cases() {
        assert_eq!(welch_t_test(&[1.0], &[2.0, 3.0]), None);
        assert_eq!(welch_t_test(&[1.0, 1.0], &[2.0, 2.0]), None);
    }

    #[test]
    fn pearson_perfect_and_none() {
        let (r, p) = pearson(&[1.0, 2.0, 3.0, 4.0], &[2.0, 4.0, 6.0, 8.0]).unwrap();
        assert!((r - 1.0).abs() < 1e-12);
        assert_eq!(p, None);
        assert_eq!(pearson(&[1.0, 1.0, 1.0], &[1.0, 2.0, 3.0]), None);
    }

    #[test]
    fn pearson_p_value() {
        // cor.test(c(1, 2, 3, 4, 5), c(2, 1, 4, 3, 5)): r = 0.8, p = 0.1040880
        let (r, p) = pearson(&[1.0, 2.0, 3.0, 4.0, 5.0], &[2.0, 1.0, 4.0, 3.0, 5.0]).unwrap();
        assert!((r - 0.8).abs() < 1e-12);
        assert!((p.unwrap() - 0.10408803866182788).abs() < 1e-6);
    }

    #[test]
    fn z_scores_are_standardized() {
        let z = z_scores(&[1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
        assert!(mean(&z).unwrap().abs() < 1e-12);
        assert!((sample_std_dev(&z).unwrap() - 1.0).abs() < 1e-12);
        assert_eq!(z_scores(&[3.0, 3.0]), None);
    }
}
