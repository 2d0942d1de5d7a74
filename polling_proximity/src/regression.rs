//! Ordinary least squares of the nearest distance on the demographic and
//! density variables, and the correlations between them.

use faer::linalg::solvers::{DenseSolveCore, Solve};
use faer::{Mat, Side};
use log::{debug, info};

use crate::config::*;
use crate::stats::{pearson, two_sided_t_p_value, z_scores};

pub const NEAREST: &str = "nearest_distance";
pub const FIVE_NEAREST: &str = "five_nearest_mean";
pub const SHARE: &str = "subgroup_share";
pub const DENSITY: &str = "density";
pub const SUBGROUP: &str = "subgroup_population";

/// The variables of one unit, when all of them are defined.
#[derive(PartialEq, Debug, Clone, Copy)]
struct AnalysisRow {
    nearest: f64,
    five_nearest: f64,
    share: f64,
    density: f64,
    subgroup: f64,
}

fn analysis_rows(units: &[MeasuredUnit]) -> Vec<AnalysisRow> {
    units
        .iter()
        .filter_map(|u| {
            let row = AnalysisRow {
                nearest: u.nearest_distance,
                five_nearest: u.five_nearest_mean,
                share: u.unit.subgroup_share?,
                density: u.unit.density.filter(|d| *d > 0.0)?,
                subgroup: u.unit.subgroup_population? as f64,
            };
            let all_finite = [
                row.nearest,
                row.five_nearest,
                row.share,
                row.density,
                row.subgroup,
            ]
            .iter()
            .all(|x| x.is_finite());
            if all_finite {
                Some(row)
            } else {
                None
            }
        })
        .collect()
}

fn standardize(name: &str, values: &[f64]) -> Result<Vec<f64>, AnalysisErrors> {
    z_scores(values).ok_or_else(|| AnalysisErrors::ConstantVariable {
        name: name.to_string(),
    })
}

/// Smallest squared Cholesky pivot, relative to the diagonal of XᵀX, for
/// the design to count as full rank.
const RANK_TOLERANCE: f64 = 1e-12;

/// Fits `response ~ 1 + predictors` by the normal equations.
///
/// XᵀX is factored once (Cholesky). The same factorization gives the
/// coefficients and the (XᵀX)⁻¹ diagonal of the standard errors.
pub fn fit_ols(
    label: &str,
    response: &[f64],
    predictors: &[(&str, Vec<f64>)],
) -> Result<RegressionFit, AnalysisErrors> {
    let n = response.len();
    let p = predictors.len() + 1;
    if n <= p {
        return Err(AnalysisErrors::InsufficientObservations {
            rows: n,
            required: p,
        });
    }

    // Design matrix, intercept first.
    let x = Mat::<f64>::from_fn(n, p, |i, j| if j == 0 { 1.0 } else { predictors[j - 1].1[i] });
    let y = Mat::<f64>::from_fn(n, 1, |i, _| response[i]);

    let xtx = x.transpose() * &x;
    let llt = xtx
        .llt(Side::Lower)
        .map_err(|_| AnalysisErrors::SingularDesign)?;
    let l = llt.L();
    let full_rank = (0..p).all(|j| l[(j, j)] * l[(j, j)] > RANK_TOLERANCE * xtx[(j, j)]);
    if !full_rank {
        return Err(AnalysisErrors::SingularDesign);
    }
    let beta = llt.solve(x.transpose() * &y);
    let xtx_inv = llt.inverse();

    let fitted = &x * &beta;
    let y_mean = response.iter().sum::<f64>() / n as f64;
    let mut rss = 0.0;
    let mut tss = 0.0;
    for (i, yi) in response.iter().enumerate() {
        rss += (yi - fitted[(i, 0)]) * (yi - fitted[(i, 0)]);
        tss += (yi - y_mean) * (yi - y_mean);
    }
    let df = (n - p) as f64;
    let sigma_sq = rss / df;
    let r_squared = if tss > 0.0 { 1.0 - rss / tss } else { 0.0 };
    let adj_r_squared = 1.0 - (1.0 - r_squared) * (n as f64 - 1.0) / df;

    let names: Vec<&str> = std::iter::once("(Intercept)")
        .chain(predictors.iter().map(|(name, _)| *name))
        .collect();
    let coefficients: Vec<Coefficient> = names
        .iter()
        .enumerate()
        .map(|(j, name)| {
            let std_error = (sigma_sq * xtx_inv[(j, j)]).max(0.0).sqrt();
            let t_value = if std_error > 0.0 {
                Some(beta[(j, 0)] / std_error)
            } else {
                None
            };
            Coefficient {
                name: name.to_string(),
                estimate: beta[(j, 0)],
                std_error,
                t_value,
                p_value: t_value.and_then(|t| two_sided_t_p_value(t, df)),
            }
        })
        .collect();

    let fit = RegressionFit {
        label: label.to_string(),
        coefficients,
        r_squared,
        adj_r_squared,
        residual_std_error: sigma_sq.sqrt(),
        n_observations: n,
    };
    debug!("fit_ols: {:?}", fit);
    Ok(fit)
}

/// The standardized fit and the raw-outcome fit of the nearest distance on
/// the standardized subgroup share, density and subgroup population.
pub fn proximity_regressions(units: &[MeasuredUnit]) -> Result<Vec<RegressionFit>, AnalysisErrors> {
    let rows = analysis_rows(units);
    info!("Fitting regressions on {} census units", rows.len());
    if rows.len() <= 4 {
        return Err(AnalysisErrors::InsufficientObservations {
            rows: rows.len(),
            required: 4,
        });
    }
    let column = |f: fn(&AnalysisRow) -> f64| -> Vec<f64> { rows.iter().map(f).collect() };

    let nearest = column(|r| r.nearest);
    let predictors: Vec<(&str, Vec<f64>)> = vec![
        (SHARE, standardize(SHARE, &column(|r| r.share))?),
        (DENSITY, standardize(DENSITY, &column(|r| r.density))?),
        (SUBGROUP, standardize(SUBGROUP, &column(|r| r.subgroup))?),
    ];

    let standardized = fit_ols(
        "standardized",
        &standardize(NEAREST, &nearest)?,
        &predictors,
    )?;
    let raw = fit_ols("raw_outcome", &nearest, &predictors)?;
    Ok(vec![standardized, raw])
}

/// Correlations of both distance measures with the demographic and density
/// variables, plus the correlation between the two distance measures.
pub fn proximity_correlations(units: &[MeasuredUnit]) -> Vec<Correlation> {
    let rows = analysis_rows(units);
    let column = |f: fn(&AnalysisRow) -> f64| -> Vec<f64> { rows.iter().map(f).collect() };
    let nearest = column(|r| r.nearest);
    let five = column(|r| r.five_nearest);
    let others: Vec<(&str, Vec<f64>)> = vec![
        (SHARE, column(|r| r.share)),
        (DENSITY, column(|r| r.density)),
        (SUBGROUP, column(|r| r.subgroup)),
    ];

    let mut pairs: Vec<(&str, &[f64], &str, &[f64])> =
        vec![(NEAREST, nearest.as_slice(), FIVE_NEAREST, five.as_slice())];
    for (name, values) in others.iter() {
        pairs.push((NEAREST, nearest.as_slice(), *name, values.as_slice()));
        pairs.push((FIVE_NEAREST, five.as_slice(), *name, values.as_slice()));
    }

    pairs
        .into_iter()
        .filter_map(|(xn, x, yn, y)| {
            let (r, p_value) = pearson(x, y)?;
            Some(Correlation {
                x: xn.to_string(),
                y: yn.to_string(),
                r,
                n: x.len(),
                p_value,
            })
        })
        .collect()
}
