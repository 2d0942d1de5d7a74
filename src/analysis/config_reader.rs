use crate::analysis::*;

use serde::{Deserialize, Serialize};

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct OutputSettings {
    #[serde(rename = "analysisName")]
    pub analysis_name: String,
    #[serde(rename = "outputDirectory")]
    pub output_directory: Option<String>,
    #[serde(rename = "cacheFile")]
    pub cache_file: Option<String>,
    #[serde(rename = "resultsFile")]
    pub results_file: Option<String>,
    #[serde(rename = "summaryFile")]
    pub summary_file: Option<String>,
}

/// Where the population counts of the census units come from.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct AttributeSource {
    pub provider: String,
    #[serde(rename = "subgroupField")]
    pub subgroup_field: String,
    #[serde(rename = "totalField")]
    pub total_field: String,
    // csv
    #[serde(rename = "filePath")]
    pub file_path: Option<String>,
    #[serde(rename = "idColumn")]
    pub id_column: Option<String>,
    // censusApi
    pub year: Option<u32>,
    pub dataset: Option<String>,
    pub geography: Option<String>,
    pub state: Option<String>,
    pub counties: Option<Vec<String>>,
    #[serde(rename = "apiKey")]
    pub api_key: Option<String>,
    #[serde(rename = "maxAttempts")]
    pub max_attempts: Option<u32>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct CensusSource {
    pub provider: String,
    #[serde(rename = "filePath")]
    pub file_path: String,
    #[serde(rename = "idField")]
    pub id_field: String,
    pub crs: String,
    pub attributes: AttributeSource,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct PollingSource {
    pub provider: String,
    #[serde(rename = "filePath")]
    pub file_path: String,
    #[serde(rename = "idColumn")]
    pub id_column: Option<String>,
    #[serde(rename = "xColumn")]
    pub x_column: Option<String>,
    #[serde(rename = "yColumn")]
    pub y_column: Option<String>,
    pub crs: String,
    #[serde(rename = "excelWorksheetName")]
    pub excel_worksheet_name: Option<String>,
}

impl PollingSource {
    /// The names of the x and y columns, required by the tabular providers.
    pub fn coordinate_columns(&self) -> PpResult<(String, String)> {
        match (&self.x_column, &self.y_column) {
            (Some(x), Some(y)) => Ok((x.clone(), y.clone())),
            _ => whatever!(
                "polling source {}: xColumn and yColumn are required for provider {}",
                self.file_path,
                self.provider
            ),
        }
    }
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct PpRules {
    #[serde(rename = "majorityThreshold")]
    pub majority_threshold: Option<f64>,
    pub quantiles: Option<u32>,
    #[serde(rename = "fewerPlacesPolicy")]
    pub fewer_places_policy: Option<String>,
    #[serde(rename = "searchStrategy")]
    pub search_strategy: Option<String>,
    pub parallel: Option<bool>,
}

impl PpRules {
    pub fn fewer_places_policy(&self) -> PpResult<FewerPlacesPolicy> {
        match self.fewer_places_policy.as_deref() {
            None | Some("meanOfAvailable") => Ok(FewerPlacesPolicy::MeanOfAvailable),
            Some("error") => Ok(FewerPlacesPolicy::Fail),
            Some(x) => whatever!("unknown fewer places policy: {}", x),
        }
    }

    pub fn search_strategy(&self) -> PpResult<SearchStrategy> {
        match self.search_strategy.as_deref() {
            None | Some("bruteForce") => Ok(SearchStrategy::BruteForce),
            Some("rtree") => Ok(SearchStrategy::RTree),
            Some(x) => whatever!("unknown search strategy: {}", x),
        }
    }
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct PpConfig {
    #[serde(rename = "outputSettings")]
    pub output_settings: OutputSettings,
    #[serde(rename = "censusSource")]
    pub census_source: CensusSource,
    #[serde(rename = "pollingSource")]
    pub polling_source: PollingSource,
    pub rules: Option<PpRules>,
}

pub fn read_config(path: &str) -> BPpResult<PpConfig> {
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    let config: PpConfig = serde_json::from_str(&contents).context(ParsingJsonSnafu {})?;
    Ok(config)
}

pub fn read_summary(path: String) -> BPpResult<JSValue> {
    let contents = fs::read_to_string(path.clone()).context(OpeningJsonSnafu { path })?;
    let js: JSValue = serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu {})?;
    Ok(js)
}
