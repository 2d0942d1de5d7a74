//! Comparison of majority and non-majority units within density strata.
//!
//! The strata are closed intervals between consecutive quantile breaks:
//! a unit whose density equals a break belongs to both neighbouring strata.

use log::{debug, info};

use crate::config::*;
use crate::stats::{mean, quantile_breaks, welch_t_test};

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum Group {
    Majority,
    NonMajority,
}

/// Units exactly at the threshold belong to neither group.
pub fn classify(share: Option<f64>, threshold: f64) -> Option<Group> {
    match share {
        Some(s) if s > threshold => Some(Group::Majority),
        Some(s) if s < threshold => Some(Group::NonMajority),
        _ => None,
    }
}

fn positive_density(u: &MeasuredUnit) -> Option<f64> {
    u.unit.density.filter(|d| d.is_finite() && *d > 0.0)
}

/// Breakpoints of the densities of the units with a positive density.
pub fn density_breaks(units: &[MeasuredUnit], quantiles: u32) -> Result<Vec<f64>, AnalysisErrors> {
    let densities: Vec<f64> = units.iter().filter_map(positive_density).collect();
    if densities.is_empty() {
        return Err(AnalysisErrors::NoPositiveDensity);
    }
    quantile_breaks(&densities, quantiles).ok_or(AnalysisErrors::NoPositiveDensity)
}

/// The units whose density lies in [lower, upper].
pub fn select_stratum(units: &[MeasuredUnit], lower: f64, upper: f64) -> Vec<&MeasuredUnit> {
    units
        .iter()
        .filter(|u| matches!(positive_density(u), Some(d) if d >= lower && d <= upper))
        .collect()
}

pub fn compare_means(majority: &[f64], non_majority: &[f64]) -> GroupComparison {
    let majority_mean = mean(majority);
    let non_majority_mean = mean(non_majority);
    let difference = match (majority_mean, non_majority_mean) {
        (Some(m), Some(n)) => Some(n - m),
        _ => None,
    };
    let proportional_difference = match (difference, non_majority_mean) {
        (Some(d), Some(n)) if n != 0.0 => Some(d / n),
        _ => None,
    };
    GroupComparison {
        majority_mean,
        non_majority_mean,
        difference,
        proportional_difference,
    }
}

/// Computes the statistics of one stratum.
pub fn stratum_result(
    decile: u32,
    lower: f64,
    upper: f64,
    units: &[MeasuredUnit],
    threshold: f64,
) -> DecileResult {
    let selected = select_stratum(units, lower, upper);

    let mut majority_nearest: Vec<f64> = Vec::new();
    let mut majority_five: Vec<f64> = Vec::new();
    let mut non_majority_nearest: Vec<f64> = Vec::new();
    let mut non_majority_five: Vec<f64> = Vec::new();
    for u in selected.iter() {
        match classify(u.unit.subgroup_share, threshold) {
            Some(Group::Majority) => {
                majority_nearest.push(u.nearest_distance);
                majority_five.push(u.five_nearest_mean);
            }
            Some(Group::NonMajority) => {
                non_majority_nearest.push(u.nearest_distance);
                non_majority_five.push(u.five_nearest_mean);
            }
            None => {}
        }
    }

    let subgroup_population: u64 = selected
        .iter()
        .map(|u| u.unit.subgroup_population.unwrap_or(0))
        .sum();
    let total_population: u64 = selected
        .iter()
        .map(|u| u.unit.total_population.unwrap_or(0))
        .sum();

    let res = DecileResult {
        decile,
        lower_density: lower,
        upper_density: upper,
        majority_units: majority_nearest.len(),
        non_majority_units: non_majority_nearest.len(),
        nearest: compare_means(&majority_nearest, &non_majority_nearest),
        five_nearest: compare_means(&majority_five, &non_majority_five),
        subgroup_population,
        total_population,
        welch: welch_t_test(&non_majority_nearest, &majority_nearest),
    };
    debug!("stratum_result: {:?}", res);
    res
}

/// One result per density stratum, from the least to the most dense.
pub fn stratify(
    units: &[MeasuredUnit],
    rules: &AnalysisRules,
) -> Result<Vec<DecileResult>, AnalysisErrors> {
    let breaks = density_breaks(units, rules.quantiles)?;
    info!("Density breaks: {:?}", breaks);
    Ok(breaks
        .windows(2)
        .enumerate()
        .map(|(idx, w)| stratum_result(idx as u32 + 1, w[0], w[1], units, rules.majority_threshold))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::Point;
    use proptest::prelude::*;

    fn measured(
        id: usize,
        density: Option<f64>,
        share: Option<f64>,
        nearest: f64,
        five: f64,
    ) -> MeasuredUnit {
        let total = 100;
        MeasuredUnit {
            unit: EnrichedUnit {
                id: format!("u{}", id),
                subgroup_population: share.map(|s| (s * total as f64).round() as u64),
                total_population: Some(total),
                centroid: Point::new(0.0, 0.0),
                area: 1.0,
                density,
                subgroup_share: share,
            },
            nearest_distance: nearest,
            five_nearest_mean: five,
            places_averaged: 5,
        }
    }

    /// 20 units in a single stratum: 8 majority, 10 non-majority, 2 at 0.5.
    fn twenty_units() -> Vec<MeasuredUnit> {
        let mut units = Vec::new();
        for i in 0..8 {
            units.push(measured(i, Some(10.0), Some(0.8), 2.0 + i as f64, 4.0 + i as f64));
        }
        for i in 8..18 {
            units.push(measured(i, Some(10.0), Some(0.2), i as f64 - 7.0, 2.0 * i as f64));
        }
        units.push(measured(18, Some(10.0), Some(0.5), 1000.0, 1000.0));
        units.push(measured(19, Some(10.0), Some(0.5), 2000.0, 2000.0));
        units
    }

    #[test]
    fn group_means_by_hand() {
        let units = twenty_units();
        let r = stratum_result(1, 10.0, 10.0, &units, 0.5);
        assert_eq!(r.majority_units, 8);
        assert_eq!(r.non_majority_units, 10);
        // majority nearest: 2..=9 -> 5.5, non-majority nearest: 1..=10 -> 5.5
        assert_eq!(r.nearest.majority_mean, Some(5.5));
        assert_eq!(r.nearest.non_majority_mean, Some(5.5));
        assert_eq!(r.nearest.difference, Some(0.0));
        assert_eq!(r.nearest.proportional_difference, Some(0.0));
        // majority five: 4..=11 -> 7.5, non-majority five: 16, 18, ..., 34 -> 25
        assert_eq!(r.five_nearest.majority_mean, Some(7.5));
        assert_eq!(r.five_nearest.non_majority_mean, Some(25.0));
        assert_eq!(r.five_nearest.difference, Some(17.5));
        assert_eq!(r.five_nearest.proportional_difference, Some(0.7));
        // Population totals include the units at the threshold.
        assert_eq!(r.total_population, 2000);
        assert_eq!(r.subgroup_population, 8 * 80 + 10 * 20 + 2 * 50);
    }

    #[test]
    fn threshold_units_are_excluded() {
        assert_eq!(classify(Some(0.5), 0.5), None);
        assert_eq!(classify(Some(0.5000001), 0.5), Some(Group::Majority));
        assert_eq!(classify(Some(0.4999999), 0.5), Some(Group::NonMajority));
        assert_eq!(classify(None, 0.5), None);
    }

    #[test]
    fn zero_non_majority_mean_has_no_proportion() {
        let c = compare_means(&[3.0, 5.0], &[0.0, 0.0]);
        assert_eq!(c.difference, Some(-4.0));
        assert_eq!(c.proportional_difference, None);
        let c = compare_means(&[], &[1.0]);
        assert_eq!(c.difference, None);
        assert_eq!(c.proportional_difference, None);
    }

    #[test]
    fn boundary_units_belong_to_two_strata() {
        let units: Vec<MeasuredUnit> = (1..=5)
            .map(|i| measured(i, Some(i as f64), Some(0.1), 1.0, 1.0))
            .collect();
        let rules = AnalysisRules {
            quantiles: 4,
            ..AnalysisRules::DEFAULT_RULES
        };
        let res = stratify(&units, &rules).unwrap();
        assert_eq!(res.len(), 4);
        // Breaks 1, 2, 3, 4, 5: each closed interval holds two units.
        for r in res.iter() {
            assert_eq!(r.non_majority_units, 2);
        }
        assert_eq!(res[0].decile, 1);
        assert_eq!(res[3].upper_density, 5.0);
    }

    #[test]
    fn tied_densities_fill_every_stratum() {
        let units = vec![
            measured(0, Some(0.1), Some(0.9), 1.0, 1.0),
            measured(1, Some(0.1), Some(0.2), 3.0, 3.0),
        ];
        let rules = AnalysisRules {
            quantiles: 5,
            ..AnalysisRules::DEFAULT_RULES
        };
        assert_eq!(density_breaks(&units, 5).unwrap(), vec![0.1; 6]);
        let res = stratify(&units, &rules).unwrap();
        assert_eq!(res.len(), 5);
        for r in res.iter() {
            assert_eq!((r.majority_units, r.non_majority_units), (1, 1));
            assert_eq!(r.nearest.difference, Some(2.0));
        }
    }

    #[test]
    fn units_without_density_are_ignored() {
        let units = vec![
            measured(0, None, Some(0.9), 1.0, 1.0),
            measured(1, Some(0.0), Some(0.9), 1.0, 1.0),
            measured(2, Some(3.0), Some(0.9), 1.0, 1.0),
        ];
        let res = stratify(&units, &AnalysisRules::DEFAULT_RULES).unwrap();
        assert_eq!(res.len(), 10);
        assert!(res.iter().all(|r| r.majority_units == 1));

        let none = vec![measured(0, None, Some(0.9), 1.0, 1.0)];
        assert_eq!(
            stratify(&none, &AnalysisRules::DEFAULT_RULES),
            Err(AnalysisErrors::NoPositiveDensity)
        );
    }

    #[test]
    fn welch_compares_nearest_distances() {
        let units = twenty_units();
        let r = stratum_result(1, 0.0, 100.0, &units, 0.5);
        let w = r.welch.unwrap();
        assert!(w.statistic.abs() < 1e-12);
        assert!((w.p_value - 1.0).abs() < 1e-9);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        #[test]
        fn strata_cover_all_dense_units(
            densities in proptest::collection::vec(prop_oneof![Just(0.0), 0.001..5000.0_f64], 1..60),
            k in 1u32..12,
        ) {
            let units: Vec<MeasuredUnit> = densities
                .iter()
                .enumerate()
                .map(|(i, d)| measured(i, Some(*d), Some(0.25), 1.0, 1.0))
                .collect();
            let dense = densities.iter().filter(|d| **d > 0.0).count();
            let rules = AnalysisRules { quantiles: k, ..AnalysisRules::DEFAULT_RULES };
            match stratify(&units, &rules) {
                Ok(res) => {
                    prop_assert_eq!(res.len(), k as usize);
                    let breaks = density_breaks(&units, k).unwrap();
                    let mut covered = vec![false; units.len()];
                    for w in breaks.windows(2) {
                        for u in select_stratum(&units, w[0], w[1]) {
                            let idx: usize = u.unit.id[1..].parse().unwrap();
                            covered[idx] = true;
                        }
                    }
                    prop_assert_eq!(covered.iter().filter(|c| **c).count(), dense);
                }
                Err(e) => {
                    prop_assert_eq!(dense, 0);
                    prop_assert_eq!(e, AnalysisErrors::NoPositiveDensity);
                }
            }
        }
    }
}
