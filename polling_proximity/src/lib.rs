mod config;
pub mod distance;
pub mod enrich;
pub mod manual;
pub mod regression;
pub mod stats;
pub mod strata;

use log::{debug, info};

pub use crate::config::*;

/// Enriches the census units and measures their distances to the polling
/// places.
///
/// This is the expensive part of the analysis. The output does not depend
/// on the stratification rules and can be cached.
///
/// Arguments:
/// * `units` the census units, with their population counts
/// * `places` the polling places. They must use the same coordinate system as `units`.
/// * `rules` the rules of the analysis
pub fn measure_layers(
    units: &Layer<CensusUnit>,
    places: &Layer<PollingPlace>,
    rules: &AnalysisRules,
) -> Result<Vec<MeasuredUnit>, AnalysisErrors> {
    rules.validate()?;
    // Checked before the enrichment so that a wrong configuration fails fast.
    if units.crs != places.crs {
        return Err(AnalysisErrors::CrsMismatch {
            units: units.crs,
            places: places.crs,
        });
    }
    let enriched = enrich::enrich_units(units)?;
    distance::measure_units(enriched, places, rules)
}

/// Runs the statistics on the measured units.
///
/// Arguments:
/// * `units` the measured units, as returned by `measure_layers` or read back from a cache
/// * `rules` the rules of the analysis
pub fn run_proximity_stats(
    units: &[MeasuredUnit],
    rules: &AnalysisRules,
) -> Result<ProximityResult, AnalysisErrors> {
    rules.validate()?;
    info!(
        "Processing {:?} measured units, rules: {:?}",
        units.len(),
        rules
    );

    let deciles = strata::stratify(units, rules)?;
    for d in deciles.iter() {
        info!(
            "Decile {}: [{:.3}, {:.3}] majority {} non-majority {} difference {:?} p-value {:?}",
            d.decile,
            d.lower_density,
            d.upper_density,
            d.majority_units,
            d.non_majority_units,
            d.nearest.difference,
            d.welch.map(|w| w.p_value)
        );
    }

    let regressions = regression::proximity_regressions(units)?;
    let correlations = regression::proximity_correlations(units);
    debug!("run_proximity_stats: correlations: {:?}", correlations);

    let units_analyzed = units
        .iter()
        .filter(|u| matches!(u.unit.density, Some(d) if d > 0.0))
        .count();

    Ok(ProximityResult {
        units_analyzed,
        deciles,
        regressions,
        correlations,
    })
}
