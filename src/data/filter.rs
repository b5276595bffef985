use serde::{Deserialize, Serialize};

use super::model::{DataType, Dataset, Record};

// ---------------------------------------------------------------------------
// Filter state: the user's current constraints
// ---------------------------------------------------------------------------

/// User-selected constraints for one KPI computation.
///
/// An empty `geographies` list means "all geographies". A `None`
/// `aggregation_level` means "unspecified, pick the best available".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterState {
    #[serde(default)]
    pub geographies: Vec<String>,
    #[serde(default)]
    pub segment_type: Option<String>,
    #[serde(default)]
    pub data_type: DataType,
    #[serde(default)]
    pub aggregation_level: Option<u32>,
}

impl FilterState {
    /// Initialise a [`FilterState`] that shows everything for the dataset's
    /// first segment type.
    pub fn for_dataset(dataset: &Dataset) -> Self {
        FilterState {
            segment_type: dataset.segment_types().next().map(str::to_string),
            ..FilterState::default()
        }
    }

    pub fn has_geography_filter(&self) -> bool {
        !self.geographies.is_empty()
    }

    /// Whether a record passes the geography constraint.
    pub fn matches_geography(&self, record: &Record) -> bool {
        self.geographies.is_empty() || self.geographies.iter().any(|g| *g == record.geography)
    }

    /// Drop repeated geographies, keeping the first occurrence of each.
    pub fn dedupe_geographies(&mut self) {
        let mut seen = std::collections::BTreeSet::new();
        self.geographies.retain(|g| seen.insert(g.clone()));
    }

    /// Toggle a single geography in the selection, keeping insertion order.
    pub fn toggle_geography(&mut self, geography: &str) {
        if let Some(pos) = self.geographies.iter().position(|g| g == geography) {
            self.geographies.remove(pos);
        } else {
            self.geographies.push(geography.to_string());
        }
    }
}

/// Segment type the computation runs against: the filter's own choice, else
/// the first declared segment type, else the first one found in the active
/// matrix. `None` means nothing is resolvable.
pub fn resolve_segment_type(dataset: &Dataset, filter: &FilterState) -> Option<String> {
    if let Some(st) = filter.segment_type.as_deref().filter(|s| !s.is_empty()) {
        return Some(st.to_string());
    }
    dataset
        .segment_types()
        .next()
        .or_else(|| {
            dataset
                .matrix(filter.data_type)
                .iter()
                .map(|r| r.segment_type.as_str())
                .find(|s| !s.is_empty())
        })
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::{Matrix, Record};

    fn leaf(geo: &str, segment_type: &str) -> Record {
        Record {
            geography: geo.into(),
            segment: "S".into(),
            segment_type: segment_type.into(),
            is_aggregated: Some(false),
            aggregation_level: None,
            time_series: Default::default(),
        }
    }

    #[test]
    fn empty_geography_list_matches_everything() {
        let filter = FilterState::default();
        assert!(filter.matches_geography(&leaf("Anywhere", "T")));
        assert!(!filter.has_geography_filter());
    }

    #[test]
    fn toggle_adds_then_removes() {
        let mut filter = FilterState::default();
        filter.toggle_geography("India");
        filter.toggle_geography("Brazil");
        assert_eq!(filter.geographies, ["India", "Brazil"]);
        assert!(filter.matches_geography(&leaf("India", "T")));
        assert!(!filter.matches_geography(&leaf("Chile", "T")));
        filter.toggle_geography("India");
        assert_eq!(filter.geographies, ["Brazil"]);
    }

    #[test]
    fn dedupe_keeps_first_occurrence() {
        let mut filter = FilterState {
            geographies: ["India", "Brazil", "India", "Brazil", "Chile"].map(String::from).to_vec(),
            ..FilterState::default()
        };
        filter.dedupe_geographies();
        assert_eq!(filter.geographies, ["India", "Brazil", "Chile"]);
    }

    #[test]
    fn segment_type_falls_back_to_dimensions_then_matrix() {
        let mut ds = Dataset::from_records(vec![leaf("India", "By Product")], vec![]);
        let filter = FilterState::default();
        assert_eq!(resolve_segment_type(&ds, &filter).as_deref(), Some("By Product"));

        ds.dimensions.segments.clear();
        assert_eq!(resolve_segment_type(&ds, &filter).as_deref(), Some("By Product"));

        ds.data.value = Matrix::default();
        assert_eq!(resolve_segment_type(&ds, &filter), None);

        let explicit = FilterState {
            segment_type: Some("By Region".into()),
            ..FilterState::default()
        };
        assert_eq!(resolve_segment_type(&ds, &explicit).as_deref(), Some("By Region"));
    }

    #[test]
    fn filter_state_reads_camel_case() {
        let filter: FilterState = serde_json::from_str(
            r#"{ "geographies": ["India"], "segmentType": "By Product",
                 "dataType": "volume", "aggregationLevel": 2 }"#,
        )
        .unwrap();
        assert_eq!(filter.data_type, DataType::Volume);
        assert_eq!(filter.aggregation_level, Some(2));
    }
}
