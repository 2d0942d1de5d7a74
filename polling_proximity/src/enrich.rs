//! Centroid, area and density of the census units.

use geo::orient::{Direction, Orient};
use geo::{Area, Centroid, GeodesicArea, MultiPolygon};
use log::{debug, info};

use crate::config::*;

/// Area of a unit, in the units implied by the coordinate system.
pub fn unit_area(geometry: &MultiPolygon<f64>, crs: Crs) -> f64 {
    match crs {
        // The geodesic computation depends on the ring orientation.
        Crs::Geographic(_) => geometry
            .orient(Direction::Default)
            .geodesic_area_unsigned(),
        Crs::Projected(_) => geometry.unsigned_area(),
    }
}

pub fn density(population: Option<u64>, area: f64) -> Option<f64> {
    match population {
        Some(p) if area > 0.0 && area.is_finite() => {
            let d = p as f64 / area;
            if d.is_finite() {
                Some(d)
            } else {
                None
            }
        }
        _ => None,
    }
}

pub fn subgroup_share(
    id: &str,
    subgroup: Option<u64>,
    total: Option<u64>,
) -> Result<Option<f64>, AnalysisErrors> {
    match (subgroup, total) {
        (Some(s), Some(t)) if s > t => Err(AnalysisErrors::InconsistentPopulation {
            id: id.to_string(),
            subgroup: s,
            total: t,
        }),
        (Some(s), Some(t)) if t > 0 => Ok(Some(s as f64 / t as f64)),
        _ => Ok(None),
    }
}

pub fn enrich_unit(unit: &CensusUnit, crs: Crs) -> Result<EnrichedUnit, AnalysisErrors> {
    let centroid = unit
        .geometry
        .centroid()
        .ok_or_else(|| AnalysisErrors::EmptyGeometry {
            id: unit.id.clone(),
        })?;
    let area = unit_area(&unit.geometry, crs);
    let subgroup_share = subgroup_share(
        &unit.id,
        unit.subgroup_population,
        unit.total_population,
    )?;
    Ok(EnrichedUnit {
        id: unit.id.clone(),
        subgroup_population: unit.subgroup_population,
        total_population: unit.total_population,
        centroid,
        area,
        density: density(unit.total_population, area),
        subgroup_share,
    })
}

/// Enriches all the units of a layer. The coordinate system is carried over.
pub fn enrich_units(layer: &Layer<CensusUnit>) -> Result<Layer<EnrichedUnit>, AnalysisErrors> {
    info!(
        "Enriching {} census units ({})",
        layer.features.len(),
        layer.crs
    );
    let mut res: Vec<EnrichedUnit> = Vec::with_capacity(layer.features.len());
    for unit in layer.features.iter() {
        let e = enrich_unit(unit, layer.crs)?;
        debug!(
            "enrich_units: {}: area {:?} density {:?} share {:?}",
            e.id, e.area, e.density, e.subgroup_share
        );
        res.push(e);
    }
    let without_density = res.iter().filter(|e| e.density.is_none()).count();
    if without_density > 0 {
        info!(
            "{} census units have no density and are excluded from the density strata",
            without_density
        );
    }
    Ok(Layer::new(layer.crs, res))
}
