// Census polygons and polling places stored as GeoJSON feature collections.

use std::fs::File;
use std::io::BufReader;

use geo::{Geometry, MultiPolygon, Point};
use geojson::{Feature, FeatureCollection, GeoJson};

use crate::analysis::{
    io_common::{json_count, json_id, make_default_id},
    *,
};

fn read_feature_collection(path: &str) -> BPpResult<FeatureCollection> {
    let file = File::open(path).context(OpeningGeoJsonSnafu { path })?;
    // The whole file is loaded in memory.
    let gj = GeoJson::from_reader(BufReader::new(file))
        .map_err(geojson::Error::from)
        .context(ParsingGeoJsonSnafu { path })?;
    Ok(feature_collection(gj, path)?)
}

fn feature_collection(gj: GeoJson, path: &str) -> PpResult<FeatureCollection> {
    match gj {
        GeoJson::FeatureCollection(fc) => Ok(fc),
        _ => whatever!("{}: GeoJSON must be a FeatureCollection", path),
    }
}

fn property<'a>(feature: &'a Feature, name: &str) -> Option<&'a JSValue> {
    feature
        .properties
        .as_ref()
        .and_then(|props| props.get(name))
}

fn feature_geometry(feature: &Feature, id: &str) -> PpResult<Option<Geometry<f64>>> {
    match &feature.geometry {
        Some(g) => {
            let geometry: Geometry<f64> =
                g.value
                    .clone()
                    .try_into()
                    .map_err(|e: geojson::Error| PpError::ConvertingGeometry {
                        id: id.to_string(),
                        message: e.to_string(),
                    })?;
            Ok(Some(geometry))
        }
        None => Ok(None),
    }
}

pub fn read_geojson_units(
    path: &str,
    id_field: &str,
    population_fields: Option<(&str, &str)>,
) -> BPpResult<Vec<CensusUnit>> {
    let fc = read_feature_collection(path)?;
    Ok(units_from_features(fc, path, id_field, population_fields)?)
}

/// Census units from polygon features.
///
/// When `population_fields` is given, the (subgroup, total) counts are read
/// from the feature properties.
fn units_from_features(
    fc: FeatureCollection,
    path: &str,
    id_field: &str,
    population_fields: Option<(&str, &str)>,
) -> PpResult<Vec<CensusUnit>> {
    let mut res: Vec<CensusUnit> = Vec::new();
    for (idx, feature) in fc.features.iter().enumerate() {
        let id = property(feature, id_field)
            .and_then(json_id)
            .context(MissingFieldSnafu {
                name: id_field,
                path,
                index: idx,
            })?;
        let geometry = match feature_geometry(feature, &id)? {
            Some(Geometry::MultiPolygon(mp)) => mp,
            Some(Geometry::Polygon(p)) => MultiPolygon::new(vec![p]),
            // Checked by the enrichment.
            None => MultiPolygon::new(vec![]),
            Some(g) => whatever!("{}: census unit {} is not a polygon: {:?}", path, id, g),
        };
        let (subgroup_population, total_population) = match population_fields {
            Some((subgroup_field, total_field)) => (
                property(feature, subgroup_field).and_then(json_count),
                property(feature, total_field).and_then(json_count),
            ),
            None => (None, None),
        };
        res.push(CensusUnit {
            id,
            geometry,
            subgroup_population,
            total_population,
        });
    }
    info!("Read {} census units from {}", res.len(), path);
    Ok(res)
}

pub fn read_geojson_places(path: &str, id_field: Option<&str>) -> BPpResult<Vec<PollingPlace>> {
    let fc = read_feature_collection(path)?;
    Ok(places_from_features(fc, path, id_field)?)
}

fn places_from_features(
    fc: FeatureCollection,
    path: &str,
    id_field: Option<&str>,
) -> PpResult<Vec<PollingPlace>> {
    let default_id = make_default_id(path);
    let mut res: Vec<PollingPlace> = Vec::new();
    for (idx, feature) in fc.features.iter().enumerate() {
        let id = id_field
            .and_then(|f| property(feature, f))
            .and_then(json_id)
            .unwrap_or_else(|| default_id(idx + 1));
        let location: Point<f64> = match feature_geometry(feature, &id)? {
            Some(Geometry::Point(p)) => p,
            Some(Geometry::MultiPoint(mp)) if mp.0.len() == 1 => mp.0[0],
            None => {
                warn!("{}: polling place {} has no geometry, skipped", path, id);
                continue;
            }
            Some(g) => whatever!("{}: polling place {} is not a point: {:?}", path, id, g),
        };
        res.push(PollingPlace { id, location });
    }
    info!("Read {} polling places from {}", res.len(), path);
    Ok(res)
}
