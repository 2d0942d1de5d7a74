// Polling places stored in Excel workbooks.

use calamine::{open_workbook, DataType, Reader, Xlsx};
use geo::Point;

use crate::analysis::{
    io_common::{make_default_id, parse_coordinate},
    *,
};

pub fn read_excel_places(path: &str, source: &PollingSource) -> BPpResult<Vec<PollingPlace>> {
    let wrange = get_range(path, source)?;
    places_from_rows(wrange.rows(), path, source)
}

fn get_range(path: &str, source: &PollingSource) -> BPpResult<calamine::Range<DataType>> {
    let worksheet_name_o = source.excel_worksheet_name.clone();
    debug!(
        "read_excel_places: path: {:?} worksheet: {:?}",
        &path, &worksheet_name_o
    );
    let mut workbook: Xlsx<_> = open_workbook(path).context(OpeningExcelSnafu { path })?;

    // A worksheet name was provided, use it.
    if let Some(worksheet_name) = worksheet_name_o {
        let wrange = workbook
            .worksheet_range(&worksheet_name)
            .context(EmptyExcelSnafu {})?
            .context(OpeningExcelSnafu { path })?;
        Ok(wrange)
    } else {
        let all_worksheets = workbook.worksheets();
        match all_worksheets.as_slice() {
            [] => Err(Box::new(PpError::EmptyExcel {})),
            [(worksheet_name, wrange)] => {
                debug!(
                    "read_excel_places: path: {:?} worksheet: {:?}",
                    &path, &worksheet_name
                );
                Ok(wrange.clone())
            }
            _ => Err(Box::new(PpError::AmbiguousWorksheet {
                path: path.to_string(),
            })),
        }
    }
}

fn cell_text(cell: &DataType) -> Option<String> {
    match cell {
        DataType::String(s) => Some(s.trim().to_string()),
        DataType::Int(i) => Some(i.to_string()),
        DataType::Float(f) if f.fract() == 0.0 => Some(format!("{}", *f as i64)),
        DataType::Float(f) => Some(f.to_string()),
        _ => None,
    }
}

fn cell_coordinate(cell: &DataType) -> Option<f64> {
    match cell {
        DataType::Float(f) if f.is_finite() => Some(*f),
        DataType::Int(i) => Some(*i as f64),
        DataType::String(s) => parse_coordinate(s),
        _ => None,
    }
}

fn header_index(header: &[DataType], name: &str, path: &str) -> PpResult<usize> {
    header
        .iter()
        .position(|c| cell_text(c).as_deref() == Some(name))
        .context(MissingColumnSnafu { name, path })
}

/// The first row holds the column names.
fn places_from_rows<'a>(
    mut rows: impl Iterator<Item = &'a [DataType]>,
    path: &str,
    source: &PollingSource,
) -> BPpResult<Vec<PollingPlace>> {
    let (x_col, y_col) = source.coordinate_columns()?;
    let header = rows.next().context(EmptyExcelSnafu {})?;
    debug!("header: {:?}", header);
    let x_idx = header_index(header, &x_col, path)?;
    let y_idx = header_index(header, &y_col, path)?;
    let id_idx_o = match &source.id_column {
        Some(name) => Some(header_index(header, name, path)?),
        None => None,
    };
    let default_id = make_default_id(path);
    let empty = DataType::Empty;

    let mut res: Vec<PollingPlace> = Vec::new();
    for (idx, row) in rows.enumerate() {
        // Excel rows start at 1, and the first one is the header.
        let lineno = idx + 2;
        if row.iter().all(|c| *c == empty) {
            continue;
        }
        let x_cell = row.get(x_idx).unwrap_or(&empty);
        let y_cell = row.get(y_idx).unwrap_or(&empty);
        let location = match (cell_coordinate(x_cell), cell_coordinate(y_cell)) {
            (Some(x), Some(y)) => Point::new(x, y),
            _ => ParsingCoordinateSnafu {
                lineno,
                content: format!("{:?},{:?}", x_cell, y_cell),
            }
            .fail()?,
        };
        let id = match id_idx_o {
            Some(id_idx) => row
                .get(id_idx)
                .and_then(cell_text)
                .context(ExcelWrongCellTypeSnafu {
                    lineno,
                    content: format!("{:?}", row.get(id_idx)),
                })?,
            None => default_id(lineno),
        };
        debug!("read_excel_places: lineno: {:?} id: {:?} {:?}", lineno, id, location);
        res.push(PollingPlace { id, location });
    }
    Ok(res)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> PollingSource {
        PollingSource {
            provider: "xlsx".to_string(),
            file_path: "places.xlsx".to_string(),
            id_column: Some("Precinct".to_string()),
            x_column: Some("Easting".to_string()),
            y_column: Some("Northing".to_string()),
            crs: "EPSG:32617".to_string(),
            excel_worksheet_name: None,
        }
    }

    fn s(x: &str) -> DataType {
        DataType::String(x.to_string())
    }

    #[test]
    fn rows_to_places() {
        let rows = vec![
            vec![s("Precinct"), s("Easting"), s("Northing")],
            vec![DataType::Float(101.0), DataType::Float(496021.5), DataType::Int(3762310)],
            vec![DataType::Empty, DataType::Empty, DataType::Empty],
            vec![s("Ward 2"), s("496100.25"), DataType::Float(3762000.0)],
        ];
        let res = places_from_rows(rows.iter().map(|r| r.as_slice()), "places.xlsx", &source())
            .unwrap();
        assert_eq!(res.len(), 2);
        assert_eq!(res[0].id, "101");
        assert_eq!(res[0].location, Point::new(496021.5, 3762310.0));
        assert_eq!(res[1].id, "Ward 2");
        assert_eq!(res[1].location, Point::new(496100.25, 3762000.0));
    }

    #[test]
    fn wrong_cells() {
        let rows = vec![
            vec![s("Precinct"), s("Easting"), s("Northing")],
            vec![s("1"), DataType::Bool(true), DataType::Float(3.0)],
        ];
        let res = places_from_rows(rows.iter().map(|r| r.as_slice()), "places.xlsx", &source());
        assert!(matches!(
            res.map_err(|e| *e),
            Err(PpError::ParsingCoordinate { lineno: 2, .. })
        ));

        let rows = vec![vec![s("Precinct"), s("X"), s("Northing")]];
        let res = places_from_rows(rows.iter().map(|r| r.as_slice()), "places.xlsx", &source());
        assert!(matches!(res.map_err(|e| *e), Err(PpError::MissingColumn { .. })));
    }
}
