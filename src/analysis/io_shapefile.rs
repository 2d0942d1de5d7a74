// Census polygons stored in ESRI shapefiles.

use geo::MultiPolygon;
use shapefile::dbase::FieldValue;
use shapefile::{Reader, Shape};

use crate::analysis::{
    io_common::{float_count, parse_count},
    *,
};

pub fn read_shapefile_units(
    path: &str,
    id_field: &str,
    population_fields: Option<(&str, &str)>,
) -> BPpResult<Vec<CensusUnit>> {
    let mut reader = Reader::from_path(path).context(OpeningShapefileSnafu { path })?;

    let mut res: Vec<CensusUnit> = Vec::new();
    for (idx, shape_record) in reader.iter_shapes_and_records().enumerate() {
        let (shape, record) = shape_record.context(ReadingShapefileSnafu { path })?;
        let id = record
            .get(id_field)
            .and_then(field_text)
            .context(MissingFieldSnafu {
                name: id_field,
                path,
                index: idx,
            })?;
        let geometry = shape_geometry(shape, &id)?;
        let (subgroup_population, total_population) = match population_fields {
            Some((subgroup_field, total_field)) => (
                record.get(subgroup_field).and_then(field_count),
                record.get(total_field).and_then(field_count),
            ),
            None => (None, None),
        };
        debug!(
            "read_shapefile_units: {} {:?} {:?}",
            id, subgroup_population, total_population
        );
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

/// Identifiers are stored as text (GEOID) or as numbers.
fn field_text(v: &FieldValue) -> Option<String> {
    match v {
        FieldValue::Character(Some(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        FieldValue::Numeric(Some(f)) | FieldValue::Double(f) if f.fract() == 0.0 => {
            Some(format!("{}", *f as i64))
        }
        FieldValue::Integer(i) => Some(i.to_string()),
        _ => None,
    }
}

fn field_count(v: &FieldValue) -> Option<u64> {
    match v {
        FieldValue::Numeric(Some(f)) | FieldValue::Double(f) => float_count(*f),
        FieldValue::Integer(i) if *i >= 0 => Some(*i as u64),
        FieldValue::Character(Some(s)) => parse_count(s),
        _ => None,
    }
}

fn shape_geometry(shape: Shape, id: &str) -> PpResult<MultiPolygon<f64>> {
    let converted: Result<MultiPolygon<f64>, String> = match shape {
        Shape::Polygon(polygon) => polygon.try_into().map_err(|e| format!("{:?}", e)),
        Shape::PolygonM(polygon) => polygon.try_into().map_err(|e| format!("{:?}", e)),
        Shape::PolygonZ(polygon) => polygon.try_into().map_err(|e| format!("{:?}", e)),
        // Checked by the enrichment.
        Shape::NullShape => Ok(MultiPolygon::new(vec![])),
        other => Err(format!("not a polygon: {:?}", other.shapetype())),
    };
    converted.map_err(|message| PpError::ConvertingGeometry {
        id: id.to_string(),
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::Area;

    #[test]
    fn identifiers() {
        assert_eq!(
            field_text(&FieldValue::Character(Some("45001950100 ".to_string()))),
            Some("45001950100".to_string())
        );
        assert_eq!(
            field_text(&FieldValue::Numeric(Some(45001950100.0))),
            Some("45001950100".to_string())
        );
        assert_eq!(field_text(&FieldValue::Character(None)), None);
        assert_eq!(field_text(&FieldValue::Numeric(Some(1.5))), None);
    }

    #[test]
    fn counts() {
        assert_eq!(field_count(&FieldValue::Numeric(Some(4059.0))), Some(4059));
        assert_eq!(field_count(&FieldValue::Integer(12)), Some(12));
        assert_eq!(field_count(&FieldValue::Integer(-1)), None);
        assert_eq!(field_count(&FieldValue::Numeric(None)), None);
        assert_eq!(
            field_count(&FieldValue::Character(Some("77".to_string()))),
            Some(77)
        );
    }

    #[test]
    fn polygon_shapes() {
        let polygon = shapefile::Polygon::new(shapefile::PolygonRing::Outer(vec![
            shapefile::Point::new(0.0, 0.0),
            shapefile::Point::new(0.0, 2.0),
            shapefile::Point::new(2.0, 2.0),
            shapefile::Point::new(2.0, 0.0),
            shapefile::Point::new(0.0, 0.0),
        ]));
        let mp = shape_geometry(Shape::Polygon(polygon), "a").unwrap();
        assert_eq!(mp.0.len(), 1);
        assert!((mp.unsigned_area() - 4.0).abs() < 1e-12);

        let empty = shape_geometry(Shape::NullShape, "b").unwrap();
        assert!(empty.0.is_empty());

        let point = Shape::Point(shapefile::Point::new(1.0, 1.0));
        assert!(matches!(
            shape_geometry(point, "c"),
            Err(PpError::ConvertingGeometry { .. })
        ));
    }
}
