use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, Context, Result};

use super::model::{segments_of, DataType, Dataset, Record, SeriesValue, TimeSeries};

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Load a market dataset from a file.  Dispatch by extension.
///
/// Supported formats:
/// * `.json` – the full dataset document (dimensions, data, metadata)
/// * `.csv`  – one flat record per row, year columns named by the year
pub fn load_file(path: &Path) -> Result<Dataset> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let dataset = match ext.as_str() {
        "json" => load_json(path),
        "csv" => load_csv(path),
        other => bail!("Unsupported file extension: .{other}"),
    }
    .with_context(|| format!("loading dataset {}", path.display()))?;

    log::info!(
        "Loaded {} value / {} volume records across {} geographies from {}",
        dataset.matrix(DataType::Value).len(),
        dataset.matrix(DataType::Volume).len(),
        dataset.geographies().len(),
        path.display()
    );
    Ok(dataset)
}

// ---------------------------------------------------------------------------
// JSON loader
// ---------------------------------------------------------------------------

/// Expected JSON schema:
///
/// ```json
/// {
///   "dimensions": {
///     "geographies": { "all_geographies": ["India", "Brazil"] },
///     "segments": { "By Product": ["Tablets", "Capsules"] }
///   },
///   "data": {
///     "value":  { "geography_segment_matrix": [ { "geography": "India", ... } ] },
///     "volume": { "geography_segment_matrix": [] }
///   },
///   "metadata": { "years": [2024, 2032], "start_year": 2024, "forecast_year": 2032,
///                 "currency": "USD", "value_unit": "Million", "volume_unit": "Units" }
/// }
/// ```
fn load_json(path: &Path) -> Result<Dataset> {
    let text = std::fs::read_to_string(path).context("reading JSON file")?;
    parse_json(&text)
}

/// Parse a dataset document already held in memory.
pub fn parse_json(text: &str) -> Result<Dataset> {
    let mut dataset: Dataset = serde_json::from_str(text).context("parsing dataset JSON")?;
    if dataset.dimensions.segments.is_empty() && !dataset.is_empty() {
        let records = dataset
            .matrix(DataType::Value)
            .iter()
            .chain(dataset.matrix(DataType::Volume));
        let segments = segments_of(records);
        log::debug!(
            "Dataset declares no segment types; derived {} from records",
            segments.len()
        );
        dataset.dimensions.segments = segments;
    }
    Ok(dataset)
}

// ---------------------------------------------------------------------------
// CSV loader
// ---------------------------------------------------------------------------

/// CSV layout:  header row with column names.
/// `geography`, `segment` and `segment_type` are required; `is_aggregated`,
/// `aggregation_level` and `data_type` (`value`/`volume`) are optional.
/// Every column whose header is an integer is a year of the time series.
fn load_csv(path: &Path) -> Result<Dataset> {
    let reader = csv::Reader::from_path(path).context("opening CSV")?;
    read_csv(reader)
}

fn read_csv<R: std::io::Read>(mut reader: csv::Reader<R>) -> Result<Dataset> {
    let headers: Vec<String> = reader
        .headers()
        .context("reading CSV headers")?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let column = |name: &str| headers.iter().position(|h| h == name);
    let geo_idx = column("geography").context("CSV missing 'geography' column")?;
    let seg_idx = column("segment").context("CSV missing 'segment' column")?;
    let type_idx = column("segment_type").context("CSV missing 'segment_type' column")?;
    let flag_idx = column("is_aggregated");
    let level_idx = column("aggregation_level");
    let data_type_idx = column("data_type");

    let year_cols: BTreeMap<usize, i32> = headers
        .iter()
        .enumerate()
        .filter_map(|(i, h)| h.parse::<i32>().ok().map(|year| (i, year)))
        .collect();
    if year_cols.is_empty() {
        bail!("CSV has no year columns");
    }

    let mut value = Vec::new();
    let mut volume = Vec::new();

    for (row_no, result) in reader.records().enumerate() {
        let row = result.with_context(|| format!("CSV row {row_no}"))?;
        let cell = |idx: usize| row.get(idx).unwrap_or("").trim();

        let time_series: TimeSeries = year_cols
            .iter()
            .filter_map(|(&idx, &year)| guess_series_value(cell(idx)).map(|v| (year, v)))
            .collect();

        let record = Record {
            geography: cell(geo_idx).to_string(),
            segment: cell(seg_idx).to_string(),
            segment_type: cell(type_idx).to_string(),
            is_aggregated: flag_idx.and_then(|i| parse_flag(cell(i))),
            aggregation_level: level_idx.and_then(|i| cell(i).parse::<u32>().ok()),
            time_series,
        };

        match data_type_idx.map(|i| cell(i).to_ascii_lowercase()).as_deref() {
            None | Some("") | Some("value") => value.push(record),
            Some("volume") => volume.push(record),
            Some(other) => bail!("CSV row {row_no}: unknown data_type '{other}'"),
        }
    }

    Ok(Dataset::from_records(value, volume))
}

fn parse_flag(s: &str) -> Option<bool> {
    match s.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

/// Empty cells are absent; anything else is kept so malformed values are
/// reported at computation time rather than rejected here.
fn guess_series_value(s: &str) -> Option<SeriesValue> {
    if s.is_empty() {
        return None;
    }
    Some(match s.parse::<f64>() {
        Ok(v) => SeriesValue::Number(v),
        Err(_) => SeriesValue::Text(s.to_string()),
    })
}
