use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value as JsonValue;

// ---------------------------------------------------------------------------
// SeriesValue – a single cell of a record's time series
// ---------------------------------------------------------------------------

/// A time-series cell as it arrives from the dataset document.
///
/// Upstream exports are not strict about numeric types, so a cell may be a
/// number, a numeric string, or something unusable. Coercion happens at read
/// time via [`SeriesValue::as_f64`]; the raw value is never rewritten.
#[derive(Debug, Clone, PartialEq)]
pub enum SeriesValue {
    Number(f64),
    Text(String),
    Null,
    /// Anything else (bool, array, object) kept verbatim for diagnostics.
    Other(String),
}

impl SeriesValue {
    /// Numeric reading of the cell, parsing numeric strings.
    /// Returns `None` for anything not coercible to a finite number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SeriesValue::Number(v) if v.is_finite() => Some(*v),
            SeriesValue::Text(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
            _ => None,
        }
    }
}

impl From<f64> for SeriesValue {
    fn from(v: f64) -> Self {
        SeriesValue::Number(v)
    }
}

impl fmt::Display for SeriesValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SeriesValue::Number(v) => write!(f, "{v}"),
            SeriesValue::Text(s) => write!(f, "\"{s}\""),
            SeriesValue::Null => write!(f, "<null>"),
            SeriesValue::Other(s) => write!(f, "{s}"),
        }
    }
}

impl<'de> Deserialize<'de> for SeriesValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(json_to_series_value(JsonValue::deserialize(deserializer)?))
    }
}

impl Serialize for SeriesValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            SeriesValue::Number(v) => serializer.serialize_f64(*v),
            SeriesValue::Text(s) | SeriesValue::Other(s) => serializer.serialize_str(s),
            SeriesValue::Null => serializer.serialize_none(),
        }
    }
}

fn json_to_series_value(val: JsonValue) -> SeriesValue {
    match val {
        JsonValue::Number(n) => match n.as_f64() {
            Some(f) => SeriesValue::Number(f),
            None => SeriesValue::Other(n.to_string()),
        },
        JsonValue::String(s) => SeriesValue::Text(s),
        JsonValue::Null => SeriesValue::Null,
        other => SeriesValue::Other(other.to_string()),
    }
}

/// Year → value mapping. Ordered so "earliest"/"latest" lookups are cheap.
pub type TimeSeries = BTreeMap<i32, SeriesValue>;

// ---------------------------------------------------------------------------
// Record – one row of a geography × segment matrix
// ---------------------------------------------------------------------------

/// A single market-research row: one geography, one segment, one series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub geography: String,
    pub segment: String,
    pub segment_type: String,
    /// `Some(false)` marks a leaf. A missing or non-boolean flag is `None`,
    /// which is never treated as a leaf.
    #[serde(default, deserialize_with = "lenient_flag")]
    pub is_aggregated: Option<bool>,
    #[serde(default, deserialize_with = "lenient_level")]
    pub aggregation_level: Option<u32>,
    #[serde(
        default,
        deserialize_with = "lenient_time_series",
        serialize_with = "year_keyed_time_series"
    )]
    pub time_series: TimeSeries,
}

impl Record {
    /// Base-level data point. Absence of the flag is not a `false`.
    pub fn is_leaf(&self) -> bool {
        self.is_aggregated == Some(false)
    }

    /// Pre-summed rollup over leaf records.
    pub fn is_rollup(&self) -> bool {
        self.is_aggregated == Some(true)
    }

    /// `geography::segment` key used to track which pairs are already summed.
    pub fn coverage_key(&self) -> String {
        format!("{}::{}", self.geography, self.segment)
    }

    /// Numeric value at `year`, if the cell exists and is coercible.
    pub fn value_at(&self, year: i32) -> Option<f64> {
        self.time_series.get(&year).and_then(SeriesValue::as_f64)
    }
}

fn lenient_flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<bool>, D::Error> {
    Ok(match JsonValue::deserialize(deserializer)? {
        JsonValue::Bool(b) => Some(b),
        _ => None,
    })
}

fn lenient_level<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u32>, D::Error> {
    Ok(match JsonValue::deserialize(deserializer)? {
        JsonValue::Number(n) => n
            .as_u64()
            .or_else(|| {
                // exporters often write `1.0` for level 1
                n.as_f64()
                    .filter(|f| f.fract() == 0.0 && *f >= 0.0 && *f <= f64::from(u32::MAX))
                    .map(|f| f as u64)
            })
            .and_then(|v| u32::try_from(v).ok()),
        _ => None,
    })
}

/// JSON object keys are always strings; keep only the ones that are years.
fn lenient_time_series<'de, D: Deserializer<'de>>(deserializer: D) -> Result<TimeSeries, D::Error> {
    let raw: Option<BTreeMap<String, SeriesValue>> = Option::deserialize(deserializer)?;
    let mut series = TimeSeries::new();
    for (key, value) in raw.unwrap_or_default() {
        match key.trim().parse::<i32>() {
            Ok(year) => {
                series.insert(year, value);
            }
            Err(_) => log::debug!("skipping non-year time_series key {key:?}"),
        }
    }
    Ok(series)
}

fn year_keyed_time_series<S: Serializer>(series: &TimeSeries, serializer: S) -> Result<S::Ok, S::Error> {
    use serde::ser::SerializeMap;
    let mut map = serializer.serialize_map(Some(series.len()))?;
    for (year, value) in series {
        map.serialize_entry(&year.to_string(), value)?;
    }
    map.end()
}

// ---------------------------------------------------------------------------
// Dataset – the complete loaded document
// ---------------------------------------------------------------------------

/// Which matrix of the dataset a computation reads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    #[default]
    Value,
    Volume,
}

impl DataType {
    pub fn label(self) -> &'static str {
        match self {
            DataType::Value => "Market Size",
            DataType::Volume => "Market Volume",
        }
    }
}

impl std::str::FromStr for DataType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "value" => Ok(DataType::Value),
            "volume" => Ok(DataType::Volume),
            other => Err(format!("unknown data type '{other}' (expected value or volume)")),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Value => write!(f, "value"),
            DataType::Volume => write!(f, "volume"),
        }
    }
}

/// Known geographies. Exports ship either a bare list or an object
/// carrying `all_geographies`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "GeographyList")]
pub struct Geographies {
    pub all_geographies: Vec<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum GeographyList {
    Plain(Vec<String>),
    Nested {
        #[serde(default)]
        all_geographies: Vec<String>,
    },
}

impl From<GeographyList> for Geographies {
    fn from(list: GeographyList) -> Self {
        match list {
            GeographyList::Plain(all_geographies) | GeographyList::Nested { all_geographies } => {
                Geographies { all_geographies }
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dimensions {
    #[serde(default)]
    pub geographies: Geographies,
    /// segment_type → segment names, in document order.
    #[serde(default)]
    pub segments: IndexMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Matrix {
    #[serde(default)]
    pub geography_segment_matrix: Vec<Record>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataSets {
    #[serde(default)]
    pub value: Matrix,
    #[serde(default)]
    pub volume: Matrix,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub years: Vec<i32>,
    #[serde(default)]
    pub start_year: Option<i32>,
    #[serde(default)]
    pub forecast_year: Option<i32>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub value_unit: Option<String>,
    #[serde(default)]
    pub volume_unit: Option<String>,
}

/// The full parsed dataset. Immutable once loaded; the core only borrows it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    #[serde(default)]
    pub dimensions: Dimensions,
    #[serde(default)]
    pub data: DataSets,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Dataset {
    /// Build a dataset from flat record lists, deriving dimensions and
    /// the year axis from the records themselves.
    pub fn from_records(value: Vec<Record>, volume: Vec<Record>) -> Self {
        let mut geographies: Vec<String> = Vec::new();
        let mut seen_geographies: BTreeSet<String> = BTreeSet::new();
        let mut years: BTreeSet<i32> = BTreeSet::new();

        for rec in value.iter().chain(volume.iter()) {
            if seen_geographies.insert(rec.geography.clone()) {
                geographies.push(rec.geography.clone());
            }
            years.extend(rec.time_series.keys().copied());
        }
        let segments = segments_of(value.iter().chain(volume.iter()));

        Dataset {
            dimensions: Dimensions {
                geographies: Geographies {
                    all_geographies: geographies,
                },
                segments,
            },
            data: DataSets {
                value: Matrix {
                    geography_segment_matrix: value,
                },
                volume: Matrix {
                    geography_segment_matrix: volume,
                },
            },
            metadata: Metadata {
                years: years.into_iter().collect(),
                ..Metadata::default()
            },
        }
    }

    /// The record matrix for one data type.
    pub fn matrix(&self, data_type: DataType) -> &[Record] {
        match data_type {
            DataType::Value => &self.data.value.geography_segment_matrix,
            DataType::Volume => &self.data.volume.geography_segment_matrix,
        }
    }

    /// Segment types in declaration order.
    pub fn segment_types(&self) -> impl Iterator<Item = &str> {
        self.dimensions.segments.keys().map(String::as_str)
    }

    pub fn geographies(&self) -> &[String] {
        &self.dimensions.geographies.all_geographies
    }

    /// Number of records across both matrices.
    pub fn len(&self) -> usize {
        self.data.value.geography_segment_matrix.len() + self.data.volume.geography_segment_matrix.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// segment_type → segment names, in first-seen order.
pub fn segments_of<'a>(records: impl IntoIterator<Item = &'a Record>) -> IndexMap<String, Vec<String>> {
    let mut segments: IndexMap<String, Vec<String>> = IndexMap::new();
    for rec in records {
        let names = segments.entry(rec.segment_type.clone()).or_default();
        if !names.contains(&rec.segment) {
            names.push(rec.segment.clone());
        }
    }
    segments
}
