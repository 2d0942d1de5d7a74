// ********* Input data structures ***********

use std::error::Error;
use std::fmt::Display;

use geo::{MultiPolygon, Point};

/// The number of closest polling places averaged for each census unit.
pub const NEAREST_COUNT: usize = 5;

// EPSG codes of the longitude/latitude systems found in US and international
// census products. Any other code is treated as a planar projection.
const GEOGRAPHIC_EPSG: [u32; 6] = [4326, 4269, 4267, 4258, 4617, 4283];

/// A coordinate reference system, identified by its EPSG code.
///
/// The kind of system decides how distances and areas are measured:
/// - geographic systems use great-circle distances in metres and geodesic
///   areas in square metres,
/// - projected systems use planar distances and areas in the native units
///   of the projection.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum Crs {
    Geographic(u32),
    Projected(u32),
}

impl Crs {
    pub fn from_epsg(code: u32) -> Crs {
        if GEOGRAPHIC_EPSG.contains(&code) {
            Crs::Geographic(code)
        } else {
            Crs::Projected(code)
        }
    }

    /// Parses `EPSG:4326`-style identifiers. A bare code is also accepted.
    pub fn parse(s: &str) -> Result<Crs, AnalysisErrors> {
        let trimmed = s.trim();
        let code_s = match trimmed.split_once(':') {
            Some((authority, code)) if authority.eq_ignore_ascii_case("epsg") => code,
            Some(_) => return Err(AnalysisErrors::InvalidCrs(s.to_string())),
            None => trimmed,
        };
        code_s
            .trim()
            .parse::<u32>()
            .map(Crs::from_epsg)
            .map_err(|_| AnalysisErrors::InvalidCrs(s.to_string()))
    }

    pub fn epsg(&self) -> u32 {
        match self {
            Crs::Geographic(c) | Crs::Projected(c) => *c,
        }
    }

    pub fn is_geographic(&self) -> bool {
        matches!(self, Crs::Geographic(_))
    }
}

impl Display for Crs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EPSG:{}", self.epsg())
    }
}

/// A census tract or block, as provided by the loaders.
#[derive(PartialEq, Debug, Clone)]
pub struct CensusUnit {
    pub id: String,
    pub geometry: MultiPolygon<f64>,
    /// Population of the demographic group under study.
    pub subgroup_population: Option<u64>,
    pub total_population: Option<u64>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct PollingPlace {
    pub id: String,
    pub location: Point<f64>,
}

/// A set of features that all share the same coordinate reference system.
///
/// Distances between two layers are only computed when both layers carry
/// the same system.
#[derive(PartialEq, Debug, Clone)]
pub struct Layer<T> {
    pub crs: Crs,
    pub features: Vec<T>,
}

impl<T> Layer<T> {
    pub fn new(crs: Crs, features: Vec<T>) -> Layer<T> {
        Layer { crs, features }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

// ******** Output data structures *********

/// A census unit with its derived geometric attributes.
#[derive(PartialEq, Debug, Clone)]
pub struct EnrichedUnit {
    pub id: String,
    pub subgroup_population: Option<u64>,
    pub total_population: Option<u64>,
    pub centroid: Point<f64>,
    pub area: f64,
    /// Total population per unit of area. Missing when the area is zero or
    /// the population is unknown.
    pub density: Option<f64>,
    /// Fraction of the population in the subgroup. Missing when the total
    /// population is zero or unknown.
    pub subgroup_share: Option<f64>,
}

/// An enriched unit with its distances to the polling places.
#[derive(PartialEq, Debug, Clone)]
pub struct MeasuredUnit {
    pub unit: EnrichedUnit,
    pub nearest_distance: f64,
    pub five_nearest_mean: f64,
    /// Number of places that entered `five_nearest_mean`. It is lower than
    /// NEAREST_COUNT only when fewer places exist.
    pub places_averaged: usize,
}

#[derive(PartialEq, Debug, Clone, Copy)]
pub struct WelchTest {
    pub statistic: f64,
    pub df: f64,
    pub p_value: f64,
}

/// Mean distances of the majority and non-majority groups of a stratum.
#[derive(PartialEq, Debug, Clone, Copy)]
pub struct GroupComparison {
    pub majority_mean: Option<f64>,
    pub non_majority_mean: Option<f64>,
    /// non-majority mean - majority mean
    pub difference: Option<f64>,
    /// difference / non-majority mean. Missing when the non-majority mean is 0.
    pub proportional_difference: Option<f64>,
}

/// Statistics for one density decile
#[derive(PartialEq, Debug, Clone)]
pub struct DecileResult {
    /// Starts at 1 for the least dense decile.
    pub decile: u32,
    pub lower_density: f64,
    pub upper_density: f64,
    pub majority_units: usize,
    pub non_majority_units: usize,
    pub nearest: GroupComparison,
    pub five_nearest: GroupComparison,
    pub subgroup_population: u64,
    pub total_population: u64,
    /// Welch test on the nearest distances of both groups.
    pub welch: Option<WelchTest>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct Coefficient {
    pub name: String,
    pub estimate: f64,
    pub std_error: f64,
    pub t_value: Option<f64>,
    pub p_value: Option<f64>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct RegressionFit {
    pub label: String,
    pub coefficients: Vec<Coefficient>,
    pub r_squared: f64,
    pub adj_r_squared: f64,
    pub residual_std_error: f64,
    pub n_observations: usize,
}

#[derive(PartialEq, Debug, Clone)]
pub struct Correlation {
    pub x: String,
    pub y: String,
    pub r: f64,
    pub n: usize,
    pub p_value: Option<f64>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct ProximityResult {
    pub units_analyzed: usize,
    pub deciles: Vec<DecileResult>,
    pub regressions: Vec<RegressionFit>,
    pub correlations: Vec<Correlation>,
}

/// Errors that prevent the analysis from completing.
#[derive(PartialEq, Debug, Clone)]
pub enum AnalysisErrors {
    CrsMismatch { units: Crs, places: Crs },
    InvalidCrs(String),
    NoPollingPlaces,
    TooFewPollingPlaces { found: usize, required: usize },
    EmptyGeometry { id: String },
    InconsistentPopulation { id: String, subgroup: u64, total: u64 },
    NoPositiveDensity,
    InsufficientObservations { rows: usize, required: usize },
    ConstantVariable { name: String },
    SingularDesign,
    InvalidRule(String),
}

impl Error for AnalysisErrors {}

impl Display for AnalysisErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnalysisErrors::CrsMismatch { units, places } => write!(
                f,
                "census units are in {} but polling places are in {}",
                units, places
            ),
            AnalysisErrors::InvalidCrs(s) => write!(f, "cannot understand the CRS {:?}", s),
            AnalysisErrors::NoPollingPlaces => write!(f, "no polling place was provided"),
            AnalysisErrors::TooFewPollingPlaces { found, required } => write!(
                f,
                "{} polling places found, at least {} are required",
                found, required
            ),
            AnalysisErrors::EmptyGeometry { id } => {
                write!(f, "census unit {} has an empty geometry", id)
            }
            AnalysisErrors::InconsistentPopulation {
                id,
                subgroup,
                total,
            } => write!(
                f,
                "census unit {}: subgroup population {} exceeds the total population {}",
                id, subgroup, total
            ),
            AnalysisErrors::NoPositiveDensity => {
                write!(f, "no census unit has a positive population density")
            }
            AnalysisErrors::InsufficientObservations { rows, required } => write!(
                f,
                "{} usable observations, more than {} are required",
                rows, required
            ),
            AnalysisErrors::ConstantVariable { name } => {
                write!(f, "variable {} has no variance", name)
            }
            AnalysisErrors::SingularDesign => write!(f, "the regression design is singular"),
            AnalysisErrors::InvalidRule(s) => write!(f, "invalid rule: {}", s),
        }
    }
}

// ********* Configuration **********

/// What to do when fewer than NEAREST_COUNT polling places exist.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum FewerPlacesPolicy {
    /// Average all the available distances.
    MeanOfAvailable,
    /// Stop the analysis.
    Fail,
}

/// How the closest polling places are found.
///
/// Both strategies return the same distances. The R-tree only pays off
/// with thousands of polling places.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum SearchStrategy {
    BruteForce,
    RTree,
}

#[derive(PartialEq, Debug, Clone)]
pub struct AnalysisRules {
    /// Units with a subgroup share strictly above this value form the
    /// majority group, strictly below the non-majority group.
    pub majority_threshold: f64,
    /// Number of density strata (10 for deciles).
    pub quantiles: u32,
    pub fewer_places_policy: FewerPlacesPolicy,
    pub search_strategy: SearchStrategy,
    /// Measure the units on the rayon thread pool.
    pub parallel: bool,
}

impl AnalysisRules {
    pub const DEFAULT_RULES: AnalysisRules = AnalysisRules {
        majority_threshold: 0.5,
        quantiles: 10,
        fewer_places_policy: FewerPlacesPolicy::MeanOfAvailable,
        search_strategy: SearchStrategy::BruteForce,
        parallel: true,
    };

    pub fn validate(&self) -> Result<(), AnalysisErrors> {
        if !(self.majority_threshold > 0.0 && self.majority_threshold < 1.0) {
            return Err(AnalysisErrors::InvalidRule(format!(
                "majority threshold must be in (0, 1), got {}",
                self.majority_threshold
            )));
        }
        if self.quantiles == 0 {
            return Err(AnalysisErrors::InvalidRule(
                "the number of quantiles must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
