// The cache of measured units and the results file, both in MessagePack.
//
// The cache is written once after the distance pass. It records the
// fingerprint of the sources that produced it; a different fingerprint is
// reported but the cache is still used.

use geo::Point;
use serde::{Deserialize, Serialize};

use crate::analysis::*;

pub const CACHE_FORMAT_VERSION: u32 = 1;

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct CacheHeader {
    pub version: u32,
    pub crs: String,
    pub fingerprint: String,
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct CachedUnit {
    pub id: String,
    pub subgroup_population: Option<u64>,
    pub total_population: Option<u64>,
    pub centroid_x: f64,
    pub centroid_y: f64,
    pub area: f64,
    pub density: Option<f64>,
    pub subgroup_share: Option<f64>,
    pub nearest_distance: f64,
    pub five_nearest_mean: f64,
    pub places_averaged: usize,
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct DistanceCache {
    pub header: CacheHeader,
    pub units: Vec<CachedUnit>,
}

/// One row of the results file.
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct DecileRecord {
    pub decile: u32,
    pub lower_density: f64,
    pub upper_density: f64,
    pub majority_units: usize,
    pub non_majority_units: usize,
    pub majority_mean_nearest: Option<f64>,
    pub non_majority_mean_nearest: Option<f64>,
    pub difference_nearest: Option<f64>,
    pub proportional_difference_nearest: Option<f64>,
    pub majority_mean_five_nearest: Option<f64>,
    pub non_majority_mean_five_nearest: Option<f64>,
    pub difference_five_nearest: Option<f64>,
    pub proportional_difference_five_nearest: Option<f64>,
    pub subgroup_population: u64,
    pub total_population: u64,
    pub welch_t: Option<f64>,
    pub welch_df: Option<f64>,
    pub welch_p_value: Option<f64>,
}

impl From<&MeasuredUnit> for CachedUnit {
    fn from(m: &MeasuredUnit) -> CachedUnit {
        CachedUnit {
            id: m.unit.id.clone(),
            subgroup_population: m.unit.subgroup_population,
            total_population: m.unit.total_population,
            centroid_x: m.unit.centroid.x(),
            centroid_y: m.unit.centroid.y(),
            area: m.unit.area,
            density: m.unit.density,
            subgroup_share: m.unit.subgroup_share,
            nearest_distance: m.nearest_distance,
            five_nearest_mean: m.five_nearest_mean,
            places_averaged: m.places_averaged,
        }
    }
}

impl From<CachedUnit> for MeasuredUnit {
    fn from(c: CachedUnit) -> MeasuredUnit {
        MeasuredUnit {
            unit: EnrichedUnit {
                id: c.id,
                subgroup_population: c.subgroup_population,
                total_population: c.total_population,
                centroid: Point::new(c.centroid_x, c.centroid_y),
                area: c.area,
                density: c.density,
                subgroup_share: c.subgroup_share,
            },
            nearest_distance: c.nearest_distance,
            five_nearest_mean: c.five_nearest_mean,
            places_averaged: c.places_averaged,
        }
    }
}

impl From<&DecileResult> for DecileRecord {
    fn from(d: &DecileResult) -> DecileRecord {
        DecileRecord {
            decile: d.decile,
            lower_density: d.lower_density,
            upper_density: d.upper_density,
            majority_units: d.majority_units,
            non_majority_units: d.non_majority_units,
            majority_mean_nearest: d.nearest.majority_mean,
            non_majority_mean_nearest: d.nearest.non_majority_mean,
            difference_nearest: d.nearest.difference,
            proportional_difference_nearest: d.nearest.proportional_difference,
            majority_mean_five_nearest: d.five_nearest.majority_mean,
            non_majority_mean_five_nearest: d.five_nearest.non_majority_mean,
            difference_five_nearest: d.five_nearest.difference,
            proportional_difference_five_nearest: d.five_nearest.proportional_difference,
            subgroup_population: d.subgroup_population,
            total_population: d.total_population,
            welch_t: d.welch.map(|w| w.statistic),
            welch_df: d.welch.map(|w| w.df),
            welch_p_value: d.welch.map(|w| w.p_value),
        }
    }
}

/// SHA-256 of the census and polling sources of the configuration.
pub fn sources_fingerprint(config: &PpConfig) -> PpResult<String> {
    let js = json!({
        "censusSource": config.census_source,
        "pollingSource": config.polling_source,
    });
    let s = serde_json::to_string(&js).context(ParsingJsonSnafu {})?;
    Ok(sha256::digest(s))
}

pub fn write_cache(
    path: &str,
    crs: Crs,
    fingerprint: &str,
    units: &[MeasuredUnit],
) -> BPpResult<()> {
    let cache = DistanceCache {
        header: CacheHeader {
            version: CACHE_FORMAT_VERSION,
            crs: crs.to_string(),
            fingerprint: fingerprint.to_string(),
        },
        units: units.iter().map(CachedUnit::from).collect(),
    };
    let bytes = rmp_serde::to_vec_named(&cache).context(EncodingMsgpackSnafu {})?;
    fs::write(path, bytes).context(WritingFileSnafu { path })?;
    info!("Wrote {} measured units to cache {}", units.len(), path);
    Ok(())
}

/// Reads the measured units back, with the CRS they were measured in.
pub fn read_cache(path: &str, fingerprint: &str) -> BPpResult<(Crs, Vec<MeasuredUnit>)> {
    let bytes = fs::read(path).context(OpeningCacheSnafu { path })?;
    let cache: DistanceCache =
        rmp_serde::from_slice(&bytes).context(DecodingMsgpackSnafu { path })?;
    if cache.header.version != CACHE_FORMAT_VERSION {
        return Err(Box::new(PpError::CacheVersion {
            path: path.to_string(),
            found: cache.header.version,
            expected: CACHE_FORMAT_VERSION,
        }));
    }
    if cache.header.fingerprint != fingerprint {
        warn!(
            "The cache {} was computed from different sources. Delete it or use --recompute to measure the distances again.",
            path
        );
    }
    let crs = Crs::parse(&cache.header.crs).context(AnalysisSnafu {})?;
    let units: Vec<MeasuredUnit> = cache.units.into_iter().map(MeasuredUnit::from).collect();
    info!("Read {} measured units from cache {}", units.len(), path);
    Ok((crs, units))
}

pub fn write_results(path: &str, deciles: &[DecileResult]) -> BPpResult<()> {
    let records: Vec<DecileRecord> = deciles.iter().map(DecileRecord::from).collect();
    let bytes = rmp_serde::to_vec_named(&records).context(EncodingMsgpackSnafu {})?;
    fs::write(path, bytes).context(WritingFileSnafu { path })?;
    info!("Wrote {} decile rows to {}", records.len(), path);
    Ok(())
}

pub fn read_results(path: &str) -> BPpResult<Vec<DecileRecord>> {
    let bytes = fs::read(path).context(OpeningCacheSnafu { path })?;
    let records: Vec<DecileRecord> =
        rmp_serde::from_slice(&bytes).context(DecodingMsgpackSnafu { path })?;
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn measured(i: usize) -> MeasuredUnit {
        MeasuredUnit {
            unit: EnrichedUnit {
                id: format!("4500195{:04}", i),
                subgroup_population: if i == 0 { None } else { Some(i as u64) },
                total_population: Some(10 * i as u64),
                centroid: Point::new(-81.0 + i as f64 * 0.01, 34.0),
                area: 1.5e6,
                density: if i == 0 { None } else { Some(i as f64 / 1.5e5) },
                subgroup_share: if i == 0 { None } else { Some(0.1) },
            },
            nearest_distance: 100.0 * i as f64,
            five_nearest_mean: 150.0 * i as f64,
            places_averaged: 5,
        }
    }

    #[test]
    fn cache_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.msgpack").display().to_string();
        let units: Vec<MeasuredUnit> = (0..4).map(measured).collect();
        write_cache(&path, Crs::Geographic(4269), "abc", &units).unwrap();

        let (crs, read) = read_cache(&path, "abc").unwrap();
        assert_eq!(crs, Crs::Geographic(4269));
        assert_eq!(read, units);

        // A different fingerprint only warns.
        let (_, read2) = read_cache(&path, "other").unwrap();
        assert_eq!(read2.len(), 4);
    }

    #[test]
    fn corrupted_cache() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.msgpack").display().to_string();
        fs::write(&path, b"not msgpack").unwrap();
        assert!(matches!(
            read_cache(&path, "abc").map_err(|e| *e),
            Err(PpError::DecodingMsgpack { .. })
        ));
        assert!(read_cache("/nonexistent/cache.msgpack", "abc").is_err());
    }

    #[test]
    fn results_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deciles.msgpack").display().to_string();
        let d = DecileResult {
            decile: 3,
            lower_density: 1.0,
            upper_density: 2.0,
            majority_units: 4,
            non_majority_units: 6,
            nearest: GroupComparison {
                majority_mean: Some(10.0),
                non_majority_mean: Some(0.0),
                difference: Some(-10.0),
                proportional_difference: None,
            },
            five_nearest: GroupComparison {
                majority_mean: None,
                non_majority_mean: None,
                difference: None,
                proportional_difference: None,
            },
            subgroup_population: 120,
            total_population: 400,
            welch: None,
        };
        write_results(&path, &[d]).unwrap();
        let records = read_results(&path).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].decile, 3);
        assert_eq!(records[0].proportional_difference_nearest, None);
        assert_eq!(records[0].difference_nearest, Some(-10.0));
        assert_eq!(records[0].welch_p_value, None);
    }

    #[test]
    fn fingerprint_follows_sources() {
        let js = r#"{
            "outputSettings": {"analysisName": "a"},
            "censusSource": {"provider": "geojson", "filePath": "u.geojson", "idField": "GEOID",
                "crs": "EPSG:32617",
                "attributes": {"provider": "embedded", "subgroupField": "S", "totalField": "T"}},
            "pollingSource": {"provider": "csv", "filePath": "p.csv", "xColumn": "x", "yColumn": "y",
                "crs": "EPSG:32617"}
        }"#;
        let config: PpConfig = serde_json::from_str(js).unwrap();
        let f1 = sources_fingerprint(&config).unwrap();
        assert_eq!(f1.len(), 64);

        let mut renamed = config.clone();
        renamed.output_settings.analysis_name = "b".to_string();
        assert_eq!(sources_fingerprint(&renamed).unwrap(), f1);

        let mut moved = config;
        moved.polling_source.file_path = "p2.csv".to_string();
        assert_ne!(sources_fingerprint(&moved).unwrap(), f1);
    }
}
