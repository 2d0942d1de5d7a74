//! Distances from the census unit centroids to the polling places.
//!
//! The reference computation evaluates every (unit, place) pair. The R-tree
//! strategy returns the same distances: it only changes how the closest
//! places are found. Geographic layers are indexed on the unit sphere,
//! where the chord length grows with the great-circle distance.

use geo::{EuclideanDistance, HaversineDistance, Point};
use log::{debug, info, warn};
use rayon::prelude::*;
use rstar::primitives::GeomWithData;
use rstar::RTree;

use crate::config::*;

/// Distance between two points of the same coordinate system.
pub fn place_distance(crs: Crs, a: &Point<f64>, b: &Point<f64>) -> f64 {
    match crs {
        Crs::Geographic(_) => a.haversine_distance(b),
        Crs::Projected(_) => a.euclidean_distance(b),
    }
}

#[derive(PartialEq, Debug, Clone, Copy)]
pub struct NearestDistances {
    pub nearest: f64,
    pub five_nearest_mean: f64,
    pub places_averaged: usize,
}

/// Keeps the NEAREST_COUNT smallest values seen, in increasing order.
#[derive(Debug, Clone)]
struct SmallestDistances {
    values: Vec<f64>,
}

impl SmallestDistances {
    fn new() -> SmallestDistances {
        SmallestDistances {
            values: Vec::with_capacity(NEAREST_COUNT + 1),
        }
    }

    fn push(&mut self, d: f64) {
        if self.values.len() == NEAREST_COUNT && d >= self.values[NEAREST_COUNT - 1] {
            return;
        }
        let pos = self.values.partition_point(|x| *x <= d);
        self.values.insert(pos, d);
        self.values.truncate(NEAREST_COUNT);
    }

    fn reduce(&self) -> Option<NearestDistances> {
        let nearest = *self.values.first()?;
        let places_averaged = self.values.len();
        Some(NearestDistances {
            nearest,
            five_nearest_mean: self.values.iter().sum::<f64>() / places_averaged as f64,
            places_averaged,
        })
    }
}

/// Evaluates the distance to every place.
pub fn brute_force_nearest(
    crs: Crs,
    origin: &Point<f64>,
    places: &[PollingPlace],
) -> Option<NearestDistances> {
    let mut smallest = SmallestDistances::new();
    for p in places.iter() {
        smallest.push(place_distance(crs, origin, &p.location));
    }
    smallest.reduce()
}

type PlanarEntry = GeomWithData<[f64; 2], usize>;
type SphericalEntry = GeomWithData<[f64; 3], usize>;

fn to_unit_sphere(p: &Point<f64>) -> [f64; 3] {
    let (lon, lat) = (p.x().to_radians(), p.y().to_radians());
    [lat.cos() * lon.cos(), lat.cos() * lon.sin(), lat.sin()]
}

/// A spatial index over the polling places of one layer.
pub enum PlaceIndex<'a> {
    Planar(RTree<PlanarEntry>, &'a [PollingPlace]),
    Spherical(RTree<SphericalEntry>, &'a [PollingPlace]),
}

impl<'a> PlaceIndex<'a> {
    pub fn build(places: &'a Layer<PollingPlace>) -> PlaceIndex<'a> {
        let features = places.features.as_slice();
        match places.crs {
            Crs::Geographic(_) => PlaceIndex::Spherical(
                RTree::bulk_load(
                    features
                        .iter()
                        .enumerate()
                        .map(|(idx, p)| GeomWithData::new(to_unit_sphere(&p.location), idx))
                        .collect(),
                ),
                features,
            ),
            Crs::Projected(_) => PlaceIndex::Planar(
                RTree::bulk_load(
                    features
                        .iter()
                        .enumerate()
                        .map(|(idx, p)| GeomWithData::new([p.location.x(), p.location.y()], idx))
                        .collect(),
                ),
                features,
            ),
        }
    }

    /// Indexes of the NEAREST_COUNT closest places.
    fn closest(&self, origin: &Point<f64>) -> Vec<usize> {
        match self {
            PlaceIndex::Planar(tree, _) => tree
                .nearest_neighbor_iter(&[origin.x(), origin.y()])
                .take(NEAREST_COUNT)
                .map(|e| e.data)
                .collect(),
            PlaceIndex::Spherical(tree, _) => tree
                .nearest_neighbor_iter(&to_unit_sphere(origin))
                .take(NEAREST_COUNT)
                .map(|e| e.data)
                .collect(),
        }
    }

    pub fn nearest(&self, crs: Crs, origin: &Point<f64>) -> Option<NearestDistances> {
        let places = match self {
            PlaceIndex::Planar(_, p) | PlaceIndex::Spherical(_, p) => *p,
        };
        let mut smallest = SmallestDistances::new();
        for idx in self.closest(origin) {
            smallest.push(place_distance(crs, origin, &places[idx].location));
        }
        smallest.reduce()
    }
}

fn check_layers(
    units: &Layer<EnrichedUnit>,
    places: &Layer<PollingPlace>,
    rules: &AnalysisRules,
) -> Result<(), AnalysisErrors> {
    if units.crs != places.crs {
        return Err(AnalysisErrors::CrsMismatch {
            units: units.crs,
            places: places.crs,
        });
    }
    if places.is_empty() {
        return Err(AnalysisErrors::NoPollingPlaces);
    }
    if places.len() < NEAREST_COUNT {
        match rules.fewer_places_policy {
            FewerPlacesPolicy::Fail => {
                return Err(AnalysisErrors::TooFewPollingPlaces {
                    found: places.len(),
                    required: NEAREST_COUNT,
                });
            }
            FewerPlacesPolicy::MeanOfAvailable => {
                warn!(
                    "Only {} polling places: the {}-nearest mean averages all of them",
                    places.len(),
                    NEAREST_COUNT
                );
            }
        }
    }
    Ok(())
}

/// Checks units measured earlier, e.g. read back from a cache, against the
/// fewer-places policy.
pub fn check_measured_units(
    units: &[MeasuredUnit],
    rules: &AnalysisRules,
) -> Result<(), AnalysisErrors> {
    let fewest = units.iter().map(|u| u.places_averaged).min();
    match (fewest, rules.fewer_places_policy) {
        (Some(found), FewerPlacesPolicy::Fail) if found < NEAREST_COUNT => {
            Err(AnalysisErrors::TooFewPollingPlaces {
                found,
                required: NEAREST_COUNT,
            })
        }
        _ => Ok(()),
    }
}

/// Measures every unit against the polling places.
///
/// Both layers must share the same coordinate system.
pub fn measure_units(
    units: Layer<EnrichedUnit>,
    places: &Layer<PollingPlace>,
    rules: &AnalysisRules,
) -> Result<Vec<MeasuredUnit>, AnalysisErrors> {
    check_layers(&units, places, rules)?;
    let crs = units.crs;
    info!(
        "Measuring {} census units against {} polling places ({:?}, parallel: {})",
        units.len(),
        places.len(),
        rules.search_strategy,
        rules.parallel
    );

    let index = match rules.search_strategy {
        SearchStrategy::BruteForce => None,
        SearchStrategy::RTree => Some(PlaceIndex::build(places)),
    };

    let measure = |unit: EnrichedUnit| -> Result<MeasuredUnit, AnalysisErrors> {
        let nd = match &index {
            Some(idx) => idx.nearest(crs, &unit.centroid),
            None => brute_force_nearest(crs, &unit.centroid, &places.features),
        }
        .ok_or(AnalysisErrors::NoPollingPlaces)?;
        debug!(
            "measure_units: {}: nearest {} mean of {}: {}",
            unit.id, nd.nearest, nd.places_averaged, nd.five_nearest_mean
        );
        Ok(MeasuredUnit {
            unit,
            nearest_distance: nd.nearest,
            five_nearest_mean: nd.five_nearest_mean,
            places_averaged: nd.places_averaged,
        })
    };

    if rules.parallel {
        units.features.into_par_iter().map(measure).collect()
    } else {
        units.features.into_iter().map(measure).collect()
    }
}
