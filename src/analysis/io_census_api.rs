// Population counts from the Census Data API (api.census.gov).
//
// The API answers with a JSON array of rows. The first row holds the column
// names: the requested variables first, then the geography codes from the
// largest to the smallest unit (state, county, tract, ...).

use std::thread;
use std::time::Duration;

use crate::analysis::{
    io_common::{json_count, PopulationTable},
    *,
};

const CENSUS_API_ROOT: &str = "https://api.census.gov/data";
const DEFAULT_MAX_ATTEMPTS: u32 = 3;

fn required<'a>(value: &'a Option<String>, name: &str) -> PpResult<&'a str> {
    value.as_deref().context(MissingSettingSnafu {
        name,
        provider: "censusApi",
    })
}

/// One URL per county, or a single URL for the whole state.
pub fn census_api_urls(attributes: &AttributeSource) -> PpResult<Vec<String>> {
    let year = attributes.year.context(MissingSettingSnafu {
        name: "year",
        provider: "censusApi",
    })?;
    let dataset = required(&attributes.dataset, "dataset")?;
    let geography = required(&attributes.geography, "geography")?;
    let state = required(&attributes.state, "state")?;

    let base = format!(
        "{}/{}/{}?get={},{}&for={}:*&in=state:{}",
        CENSUS_API_ROOT,
        year,
        dataset,
        attributes.subgroup_field,
        attributes.total_field,
        geography.replace(' ', "%20"),
        state
    );
    let key = match &attributes.api_key {
        Some(k) => format!("&key={}", k),
        None => "".to_string(),
    };

    let urls = match &attributes.counties {
        Some(counties) if !counties.is_empty() => counties
            .iter()
            .map(|c| format!("{}&in=county:{}{}", base, c, key))
            .collect(),
        _ => {
            if geography.starts_with("block") {
                whatever!("censusApi: geography {} requires a list of counties", geography)
            }
            vec![format!("{}{}", base, key)]
        }
    };
    Ok(urls)
}

/// Parses a response body into populations, keyed by the concatenated
/// geography codes (the GEOID).
pub fn parse_census_rows(
    body: &JSValue,
    subgroup_field: &str,
    total_field: &str,
) -> PpResult<PopulationTable> {
    let rows = match body.as_array() {
        Some(rows) if !rows.is_empty() => rows,
        _ => whatever!("census API: expected a non-empty array of rows"),
    };
    let header: Vec<&str> = match rows[0].as_array() {
        Some(cols) => cols.iter().filter_map(|c| c.as_str()).collect(),
        None => whatever!("census API: the first row must hold the column names"),
    };
    let position = |name: &str| -> PpResult<usize> {
        header.iter().position(|h| *h == name).context(MissingColumnSnafu {
            name,
            path: CENSUS_API_ROOT,
        })
    };
    let sub_idx = position(subgroup_field)?;
    let tot_idx = position(total_field)?;
    let geo_idxs: Vec<usize> = (0..header.len())
        .filter(|i| *i != sub_idx && *i != tot_idx && header[*i] != "NAME")
        .collect();
    if geo_idxs.is_empty() {
        whatever!("census API: no geography column in {:?}", header)
    }

    let mut res = PopulationTable::new();
    for (lineno, row_js) in rows.iter().enumerate().skip(1) {
        let row = match row_js.as_array() {
            Some(r) if r.len() == header.len() => r,
            _ => whatever!("census API: row {} does not match the header", lineno),
        };
        let mut id = String::new();
        for i in geo_idxs.iter() {
            match row[*i].as_str() {
                Some(code) => id.push_str(code),
                None => whatever!("census API: row {}: bad geography code {}", lineno, row[*i]),
            }
        }
        res.insert(id, (json_count(&row[sub_idx]), json_count(&row[tot_idx])));
    }
    Ok(res)
}

fn fetch_json(url: &str) -> Result<JSValue, String> {
    let response = reqwest::blocking::get(url).map_err(|e| e.to_string())?;
    if !response.status().is_success() {
        return Err(format!("status {}", response.status()));
    }
    response.json::<JSValue>().map_err(|e| e.to_string())
}

/// Fetches one URL, retrying up to `max_attempts` times.
fn fetch_with_retry(url: &str, max_attempts: u32) -> PpResult<JSValue> {
    let mut last_error = String::new();
    for attempt in 1..=max_attempts {
        debug!("fetch_with_retry: attempt {} {}", attempt, url);
        match fetch_json(url) {
            Ok(js) => return Ok(js),
            Err(e) => {
                warn!(
                    "Census API request failed (attempt {}/{}): {}",
                    attempt, max_attempts, e
                );
                last_error = e;
                if attempt < max_attempts {
                    thread::sleep(Duration::from_secs(attempt as u64));
                }
            }
        }
    }
    CensusApiSnafu {
        url,
        attempts: max_attempts,
        message: last_error,
    }
    .fail()
}

pub fn fetch_census_populations(attributes: &AttributeSource) -> BPpResult<PopulationTable> {
    let max_attempts = attributes.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS).max(1);
    let mut res = PopulationTable::new();
    for url in census_api_urls(attributes)? {
        info!("Fetching populations from {}", url);
        let body = fetch_with_retry(&url, max_attempts)?;
        let table = parse_census_rows(&body, &attributes.subgroup_field, &attributes.total_field)?;
        res.extend(table);
    }
    info!("Fetched populations of {} census units", res.len());
    Ok(res)
}
