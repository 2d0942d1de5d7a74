use log::{debug, info, warn};

use polling_proximity::*;
use snafu::{prelude::*, Snafu};

use std::fs;
use std::path::Path;

use serde_json::json;
use serde_json::Value as JSValue;
use text_diff::print_diff;

use crate::analysis::cache::*;
use crate::analysis::config_reader::*;
use crate::analysis::io_common::{join_populations, resolve_path};

pub mod cache;
pub mod config_reader;
mod io_census_api;
mod io_common;
mod io_csv;
mod io_excel;
mod io_geojson;
mod io_shapefile;

#[derive(Debug, Snafu)]
pub enum PpError {
    #[snafu(display("Error opening file {path}"))]
    OpeningJson {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error parsing JSON"))]
    ParsingJson { source: serde_json::Error },
    #[snafu(display("The configuration file has no parent directory"))]
    MissingParentDir {},
    #[snafu(display("Setting {name} is required by provider {provider}"))]
    MissingSetting { name: String, provider: String },
    #[snafu(display("Unknown {kind} provider: {provider}"))]
    UnknownProvider { kind: String, provider: String },

    #[snafu(display("Error opening Excel file {path}"))]
    OpeningExcel {
        source: calamine::XlsxError,
        path: String,
    },
    #[snafu(display("The Excel file has no data"))]
    EmptyExcel {},
    #[snafu(display("{path} has several worksheets: excelWorksheetName must be provided"))]
    AmbiguousWorksheet { path: String },
    #[snafu(display("Unexpected cell at line {lineno}: {content}"))]
    ExcelWrongCellType { lineno: usize, content: String },

    #[snafu(display("Error opening CSV file {path}"))]
    CsvOpen { source: csv::Error, path: String },
    #[snafu(display("Error reading a CSV line"))]
    CsvLineParse { source: csv::Error },
    #[snafu(display("Line {lineno} is too short"))]
    CsvLineTooShort { lineno: usize },

    #[snafu(display("Cannot read the coordinates at line {lineno}: {content}"))]
    ParsingCoordinate { lineno: usize, content: String },
    #[snafu(display("Column {name} not found in {path}"))]
    MissingColumn { name: String, path: String },
    #[snafu(display("Field {name} missing for feature {index} of {path}"))]
    MissingField {
        name: String,
        path: String,
        index: usize,
    },

    #[snafu(display("Error opening shapefile {path}"))]
    OpeningShapefile {
        source: shapefile::Error,
        path: String,
    },
    #[snafu(display("Error reading shapefile {path}"))]
    ReadingShapefile {
        source: shapefile::Error,
        path: String,
    },
    #[snafu(display("Error opening GeoJSON file {path}"))]
    OpeningGeoJson {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error parsing GeoJSON file {path}"))]
    ParsingGeoJson {
        source: geojson::Error,
        path: String,
    },
    #[snafu(display("Cannot convert the geometry of {id}: {message}"))]
    ConvertingGeometry { id: String, message: String },

    #[snafu(display("Census API request {url} failed after {attempts} attempts: {message}"))]
    CensusApi {
        url: String,
        attempts: u32,
        message: String,
    },

    #[snafu(display("Error writing file {path}"))]
    WritingFile {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error opening file {path}"))]
    OpeningCache {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error encoding MessagePack"))]
    EncodingMsgpack { source: rmp_serde::encode::Error },
    #[snafu(display("Error decoding MessagePack file {path}"))]
    DecodingMsgpack {
        source: rmp_serde::decode::Error,
        path: String,
    },
    #[snafu(display("Cache {path} has format version {found}, expected {expected}. Use --recompute"))]
    CacheVersion {
        path: String,
        found: u32,
        expected: u32,
    },

    #[snafu(display("Analysis error: {source}"))]
    Analysis { source: AnalysisErrors },

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

pub type PpResult<T> = Result<T, PpError>;
pub type BPpResult<T> = Result<T, Box<PpError>>;

fn validate_rules(pp_rules: &Option<PpRules>) -> PpResult<AnalysisRules> {
    let defaults = AnalysisRules::DEFAULT_RULES;
    let res = match pp_rules {
        None => defaults,
        Some(r) => AnalysisRules {
            majority_threshold: r.majority_threshold.unwrap_or(defaults.majority_threshold),
            quantiles: r.quantiles.unwrap_or(defaults.quantiles),
            fewer_places_policy: r.fewer_places_policy()?,
            search_strategy: r.search_strategy()?,
            parallel: r.parallel.unwrap_or(defaults.parallel),
        },
    };
    res.validate().context(AnalysisSnafu {})?;
    Ok(res)
}

/// The files written by an analysis.
#[derive(Eq, PartialEq, Debug, Clone)]
struct OutputPaths {
    cache: String,
    results: String,
    /// None: the summary goes to the standard output.
    summary: Option<String>,
}

impl OutputPaths {
    fn new(
        root_p: &Path,
        settings: &OutputSettings,
        out_o: Option<String>,
    ) -> BPpResult<OutputPaths> {
        let out_dir = match &settings.output_directory {
            Some(d) => {
                let dir = resolve_path(root_p, d);
                fs::create_dir_all(&dir).context(WritingFileSnafu { path: dir.clone() })?;
                dir
            }
            None => root_p.display().to_string(),
        };
        let out_p = Path::new(out_dir.as_str());
        let name = settings.analysis_name.as_str();
        let cache = match &settings.cache_file {
            Some(f) => resolve_path(out_p, f),
            None => resolve_path(out_p, &format!("{}_distances.msgpack", name)),
        };
        let results = match &settings.results_file {
            Some(f) => resolve_path(out_p, f),
            None => resolve_path(out_p, &format!("{}_deciles.msgpack", name)),
        };
        let summary = match out_o.as_deref() {
            Some("stdout") | Some("") => None,
            Some(p) => Some(p.to_string()),
            None => settings
                .summary_file
                .as_ref()
                .map(|f| resolve_path(out_p, f)),
        };
        Ok(OutputPaths {
            cache,
            results,
            summary,
        })
    }
}

fn read_census_units(root_p: &Path, source: &CensusSource) -> BPpResult<Layer<CensusUnit>> {
    let crs = Crs::parse(&source.crs).context(AnalysisSnafu {})?;
    let path = resolve_path(root_p, &source.file_path);
    info!("Attempting to read census units {:?}", path);
    let attributes = &source.attributes;

    let embedded_fields = match attributes.provider.as_str() {
        "embedded" => Some((
            attributes.subgroup_field.as_str(),
            attributes.total_field.as_str(),
        )),
        "csv" | "censusApi" => None,
        x => UnknownProviderSnafu {
            kind: "attributes",
            provider: x,
        }
        .fail()?,
    };
    let units = match source.provider.as_str() {
        "shapefile" => {
            io_shapefile::read_shapefile_units(&path, &source.id_field, embedded_fields)?
        }
        "geojson" => io_geojson::read_geojson_units(&path, &source.id_field, embedded_fields)?,
        x => UnknownProviderSnafu {
            kind: "census",
            provider: x,
        }
        .fail()?,
    };

    let units = match attributes.provider.as_str() {
        "csv" => {
            let file_path = attributes.file_path.as_deref().context(MissingSettingSnafu {
                name: "filePath",
                provider: "csv",
            })?;
            let table = io_csv::read_csv_populations(&resolve_path(root_p, file_path), attributes)?;
            join_populations(units, &table)
        }
        "censusApi" => {
            let table = io_census_api::fetch_census_populations(attributes)?;
            join_populations(units, &table)
        }
        _ => units,
    };
    Ok(Layer::new(crs, units))
}

fn read_polling_places(root_p: &Path, source: &PollingSource) -> BPpResult<Layer<PollingPlace>> {
    let crs = Crs::parse(&source.crs).context(AnalysisSnafu {})?;
    let path = resolve_path(root_p, &source.file_path);
    info!("Attempting to read polling places {:?}", path);
    let places = match source.provider.as_str() {
        "csv" => io_csv::read_csv_places(&path, source)?,
        "xlsx" => io_excel::read_excel_places(&path, source)?,
        "geojson" => io_geojson::read_geojson_places(&path, source.id_column.as_deref())?,
        x => UnknownProviderSnafu {
            kind: "polling place",
            provider: x,
        }
        .fail()?,
    };
    info!("Read {} polling places", places.len());
    Ok(Layer::new(crs, places))
}

fn comparison_to_json(c: &GroupComparison) -> JSValue {
    json!({
        "majorityMean": c.majority_mean,
        "nonMajorityMean": c.non_majority_mean,
        "difference": c.difference,
        "proportionalDifference": c.proportional_difference,
    })
}

fn deciles_to_json(deciles: &[DecileResult]) -> Vec<JSValue> {
    deciles
        .iter()
        .map(|d| {
            let welch = match d.welch {
                Some(w) => json!({"t": w.statistic, "df": w.df, "pValue": w.p_value}),
                None => JSValue::Null,
            };
            json!({
                "decile": d.decile,
                "lowerDensity": d.lower_density,
                "upperDensity": d.upper_density,
                "majorityUnits": d.majority_units,
                "nonMajorityUnits": d.non_majority_units,
                "nearest": comparison_to_json(&d.nearest),
                "fiveNearest": comparison_to_json(&d.five_nearest),
                "subgroupPopulation": d.subgroup_population,
                "totalPopulation": d.total_population,
                "welch": welch,
            })
        })
        .collect()
}

fn regressions_to_json(fits: &[RegressionFit]) -> Vec<JSValue> {
    fits.iter()
        .map(|fit| {
            let coefficients: Vec<JSValue> = fit
                .coefficients
                .iter()
                .map(|c| {
                    json!({
                        "name": c.name,
                        "estimate": c.estimate,
                        "stdError": c.std_error,
                        "tValue": c.t_value,
                        "pValue": c.p_value,
                    })
                })
                .collect();
            json!({
                "label": fit.label,
                "coefficients": coefficients,
                "rSquared": fit.r_squared,
                "adjRSquared": fit.adj_r_squared,
                "residualStdError": fit.residual_std_error,
                "observations": fit.n_observations,
            })
        })
        .collect()
}

fn correlations_to_json(correlations: &[Correlation]) -> Vec<JSValue> {
    correlations
        .iter()
        .map(|c| json!({"x": c.x, "y": c.y, "r": c.r, "n": c.n, "pValue": c.p_value}))
        .collect()
}

fn build_summary_js(
    config: &PpConfig,
    crs: Crs,
    rules: &AnalysisRules,
    units_measured: usize,
    result: &ProximityResult,
) -> JSValue {
    json!({
        "config": {
            "analysisName": config.output_settings.analysis_name,
            "crs": crs.to_string(),
            "majorityThreshold": rules.majority_threshold,
            "quantiles": rules.quantiles,
        },
        "unitsMeasured": units_measured,
        "unitsAnalyzed": result.units_analyzed,
        "deciles": deciles_to_json(&result.deciles),
        "regressions": regressions_to_json(&result.regressions),
        "correlations": correlations_to_json(&result.correlations),
    })
}

/// Runs the full analysis described by a configuration file.
///
/// The distances are read from the cache file when it exists, unless
/// `recompute` is set. Returns the summary.
pub fn run_analysis(
    config_path: &str,
    out_o: Option<String>,
    check_summary_path: Option<String>,
    recompute: bool,
) -> BPpResult<JSValue> {
    let config = read_config(config_path)?;
    info!("config: {:?}", config);

    // Validate the rules:
    let rules = validate_rules(&config.rules)?;

    let root_p = Path::new(config_path)
        .parent()
        .context(MissingParentDirSnafu {})?;
    let paths = OutputPaths::new(root_p, &config.output_settings, out_o)?;
    debug!("output paths: {:?}", paths);
    let fingerprint = sources_fingerprint(&config)?;

    let (crs, measured) = if !recompute && Path::new(&paths.cache).exists() {
        info!("Reading distances from cache {}", paths.cache);
        let (crs, cached) = read_cache(&paths.cache, &fingerprint)?;
        distance::check_measured_units(&cached, &rules).context(AnalysisSnafu {})?;
        (crs, cached)
    } else {
        let units = read_census_units(root_p, &config.census_source)?;
        let places = read_polling_places(root_p, &config.polling_source)?;
        let measured = measure_layers(&units, &places, &rules).context(AnalysisSnafu {})?;
        write_cache(&paths.cache, units.crs, &fingerprint, &measured)?;
        (units.crs, measured)
    };

    let result = run_proximity_stats(&measured, &rules).context(AnalysisSnafu {})?;
    write_results(&paths.results, &result.deciles)?;

    // Assemble the final json
    let result_js = build_summary_js(&config, crs, &rules, measured.len(), &result);
    let pretty_js_stats = serde_json::to_string_pretty(&result_js).context(ParsingJsonSnafu {})?;
    match &paths.summary {
        Some(p) => {
            fs::write(p, &pretty_js_stats).context(WritingFileSnafu { path: p.clone() })?;
            info!("Wrote summary to {}", p);
        }
        None => println!("{}", pretty_js_stats),
    }

    // The reference summary, if provided for comparison
    if let Some(summary_p) = check_summary_path {
        let summary_ref = read_summary(summary_p)?;
        let pretty_js_summary_ref =
            serde_json::to_string_pretty(&summary_ref).context(ParsingJsonSnafu {})?;
        if pretty_js_summary_ref != pretty_js_stats {
            warn!("Found differences with the reference summary");
            print_diff(
                pretty_js_summary_ref.as_str(),
                pretty_js_stats.as_ref(),
                "\n",
            );
            return Err(Box::new(PpError::Whatever {
                message: "Difference detected between calculated summary and reference summary"
                    .to_string(),
                source: None,
            }));
        }
    }

    Ok(result_js)
}
