use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::analysis::*;

/// Subgroup and total populations, by census unit identifier.
pub type PopulationTable = HashMap<String, (Option<u64>, Option<u64>)>;

/// Paths in the configuration are relative to the directory of the
/// configuration file.
pub fn resolve_path(root: &Path, file_path: &str) -> String {
    let p: PathBuf = [root, Path::new(file_path)].iter().collect();
    p.as_path().display().to_string()
}

pub fn simplify_file_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or(path)
        .to_string()
}

pub fn make_default_id(path: &str) -> impl Fn(usize) -> String {
    let simplified_file_name = simplify_file_name(path);
    move |lineno| format!("{}-{:08}", simplified_file_name, lineno)
}

/// Reads a population count written as text.
///
/// Census products sometimes write counts as floats ("1234.0"). Empty cells,
/// negative numbers and fractional values are not counts.
pub fn parse_count(content: &str) -> Option<u64> {
    let s = content.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(x) = s.parse::<u64>() {
        return Some(x);
    }
    s.parse::<f64>().ok().and_then(float_count)
}

pub fn float_count(x: f64) -> Option<u64> {
    if x.is_finite() && x >= 0.0 && x.fract() == 0.0 {
        Some(x as u64)
    } else {
        None
    }
}

pub fn parse_coordinate(content: &str) -> Option<f64> {
    content.trim().parse::<f64>().ok().filter(|x| x.is_finite())
}

/// A JSON property read as a count. Strings are accepted.
pub fn json_count(v: &JSValue) -> Option<u64> {
    match v {
        JSValue::Number(n) => n.as_u64().or_else(|| n.as_f64().and_then(float_count)),
        JSValue::String(s) => parse_count(s),
        _ => None,
    }
}

/// A JSON property read as an identifier.
pub fn json_id(v: &JSValue) -> Option<String> {
    match v {
        JSValue::String(s) => Some(s.clone()),
        JSValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub fn column_index<'a>(
    mut headers: impl Iterator<Item = &'a str>,
    name: &str,
    path: &str,
) -> PpResult<usize> {
    headers
        .position(|h| h.trim() == name)
        .context(MissingColumnSnafu { name, path })
}

/// Copies the populations of the table into the census units.
///
/// Units without an entry keep unknown populations.
pub fn join_populations(units: Vec<CensusUnit>, table: &PopulationTable) -> Vec<CensusUnit> {
    let mut missing = 0;
    let res: Vec<CensusUnit> = units
        .into_iter()
        .map(|u| match table.get(&u.id) {
            Some((subgroup, total)) => CensusUnit {
                subgroup_population: *subgroup,
                total_population: *total,
                ..u
            },
            None => {
                debug!("join_populations: no population for census unit {}", u.id);
                missing += 1;
                CensusUnit {
                    subgroup_population: None,
                    total_population: None,
                    ..u
                }
            }
        })
        .collect();
    if missing > 0 {
        warn!(
            "{} census units out of {} have no population data",
            missing,
            res.len()
        );
    }
    res
}
