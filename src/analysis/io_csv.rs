// Primitives for reading CSV files.

use std::io::Read;

use geo::Point;

use crate::analysis::{
    io_common::{column_index, make_default_id, parse_coordinate, parse_count, PopulationTable},
    *,
};

pub fn read_csv_places(path: &str, source: &PollingSource) -> BPpResult<Vec<PollingPlace>> {
    let rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .context(CsvOpenSnafu { path })?;
    places_from_csv(rdr, path, source)
}

fn places_from_csv<R: Read>(
    mut rdr: csv::Reader<R>,
    path: &str,
    source: &PollingSource,
) -> BPpResult<Vec<PollingPlace>> {
    let (x_col, y_col) = source.coordinate_columns()?;
    let headers = rdr.headers().context(CsvLineParseSnafu {})?.clone();
    let x_idx = column_index(headers.iter(), &x_col, path)?;
    let y_idx = column_index(headers.iter(), &y_col, path)?;
    let id_idx_o = match &source.id_column {
        Some(name) => Some(column_index(headers.iter(), name, path)?),
        None => None,
    };
    let default_id = make_default_id(path);

    let mut res: Vec<PollingPlace> = Vec::new();
    for (idx, line_r) in rdr.records().enumerate() {
        // Line 1 is the header.
        let lineno = idx + 2;
        let line = line_r.context(CsvLineParseSnafu {})?;
        let x_s = cell(&line, x_idx, lineno)?;
        let y_s = cell(&line, y_idx, lineno)?;
        let (x, y) = match (parse_coordinate(x_s), parse_coordinate(y_s)) {
            (Some(x), Some(y)) => (x, y),
            _ => ParsingCoordinateSnafu {
                lineno,
                content: format!("{},{}", x_s, y_s),
            }
            .fail()?,
        };
        let id = match id_idx_o {
            Some(id_idx) => cell(&line, id_idx, lineno)?.to_string(),
            None => default_id(lineno),
        };
        debug!("read_csv_places: lineno: {:?} id: {:?} ({}, {})", lineno, id, x, y);
        res.push(PollingPlace {
            id,
            location: Point::new(x, y),
        });
    }
    Ok(res)
}

fn cell(line: &csv::StringRecord, idx: usize, lineno: usize) -> PpResult<&str> {
    line.get(idx).context(CsvLineTooShortSnafu { lineno })
}

/// Reads the subgroup and total populations of the census units from a CSV
/// file with a header row.
pub fn read_csv_populations(path: &str, attributes: &AttributeSource) -> BPpResult<PopulationTable> {
    let rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .context(CsvOpenSnafu { path })?;
    populations_from_csv(rdr, path, attributes)
}

fn populations_from_csv<R: Read>(
    mut rdr: csv::Reader<R>,
    path: &str,
    attributes: &AttributeSource,
) -> BPpResult<PopulationTable> {
    let id_col = attributes.id_column.clone().context(MissingSettingSnafu {
        name: "idColumn",
        provider: "csv",
    })?;
    let headers = rdr.headers().context(CsvLineParseSnafu {})?.clone();
    let id_idx = column_index(headers.iter(), &id_col, path)?;
    let sub_idx = column_index(headers.iter(), &attributes.subgroup_field, path)?;
    let tot_idx = column_index(headers.iter(), &attributes.total_field, path)?;

    let mut res = PopulationTable::new();
    for (idx, line_r) in rdr.records().enumerate() {
        let lineno = idx + 2;
        let line = line_r.context(CsvLineParseSnafu {})?;
        let id = cell(&line, id_idx, lineno)?.trim().to_string();
        if id.is_empty() {
            continue;
        }
        let subgroup = line.get(sub_idx).and_then(parse_count);
        let total = line.get(tot_idx).and_then(parse_count);
        if res.insert(id.clone(), (subgroup, total)).is_some() {
            warn!("read_csv_populations: duplicate id {} at line {}", id, lineno);
        }
    }
    info!("Read populations of {} census units from {}", res.len(), path);
    Ok(res)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(id_column: Option<&str>) -> PollingSource {
        PollingSource {
            provider: "csv".to_string(),
            file_path: "places.csv".to_string(),
            id_column: id_column.map(|s| s.to_string()),
            x_column: Some("lon".to_string()),
            y_column: Some("lat".to_string()),
            crs: "EPSG:4326".to_string(),
            excel_worksheet_name: None,
        }
    }

    fn reader(data: &str) -> csv::Reader<&[u8]> {
        csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(data.as_bytes())
    }

    #[test]
    fn places_with_ids() {
        let data = "name,lat,lon\nCity Hall,34.0007,-81.0348\nLibrary, 34.01 ,-81.04\n";
        let res = places_from_csv(reader(data), "places.csv", &source(Some("name"))).unwrap();
        assert_eq!(res.len(), 2);
        assert_eq!(res[0].id, "City Hall");
        assert_eq!(res[0].location, Point::new(-81.0348, 34.0007));
        assert_eq!(res[1].location, Point::new(-81.04, 34.01));
    }

    #[test]
    fn places_default_ids() {
        let data = "lat,lon\n34.0,-81.0\n";
        let res = places_from_csv(reader(data), "/tmp/places.csv", &source(None)).unwrap();
        assert_eq!(res[0].id, "places.csv-00000002");
    }

    #[test]
    fn bad_coordinate() {
        let data = "lat,lon\n34.0,west\n";
        let res = places_from_csv(reader(data), "places.csv", &source(None));
        assert!(matches!(
            res.map_err(|e| *e),
            Err(PpError::ParsingCoordinate { lineno: 2, .. })
        ));
    }

    #[test]
    fn missing_coordinate_column() {
        let data = "latitude,lon\n34.0,-81.0\n";
        let res = places_from_csv(reader(data), "places.csv", &source(None));
        assert!(matches!(
            res.map_err(|e| *e),
            Err(PpError::MissingColumn { .. })
        ));
    }

    #[test]
    fn populations() {
        let data = "GEOID,P1_001N,P1_004N\n45001950100,4059,1021\n45001950200,,12\n";
        let attributes = AttributeSource {
            provider: "csv".to_string(),
            subgroup_field: "P1_004N".to_string(),
            total_field: "P1_001N".to_string(),
            file_path: Some("pop.csv".to_string()),
            id_column: Some("GEOID".to_string()),
            year: None,
            dataset: None,
            geography: None,
            state: None,
            counties: None,
            api_key: None,
            max_attempts: None,
        };
        let table = populations_from_csv(reader(data), "pop.csv", &attributes).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table["45001950100"], (Some(1021), Some(4059)));
        assert_eq!(table["45001950200"], (Some(12), None));
    }
}
