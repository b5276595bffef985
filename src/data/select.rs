use std::borrow::Cow;
use std::collections::BTreeSet;
use std::fmt;

use indexmap::IndexMap;

use super::filter::{resolve_segment_type, FilterState};
use super::model::{Dataset, Record, SeriesValue};

// ---------------------------------------------------------------------------
// Selection outcome
// ---------------------------------------------------------------------------

/// Why a selection came back empty. Neither case is an error: the caller
/// suppresses the KPI display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoData {
    /// No segment type given and none inferable from the dataset.
    MissingSegmentType,
    /// Every fallback tier was exhausted without a single record.
    NoMatchingData,
}

/// How much of the filter was still honoured when records were found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Segment type, geographies and aggregation level as requested.
    Requested,
    /// Geography selection dropped, aggregation level kept.
    AllGeographies,
    /// Only the segment type kept.
    SegmentTypeOnly,
}

/// Which records of a scope were picked to represent it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Rollups at the requested level, plus uncovered leaves at that level.
    ExactLevel(u32),
    /// Leaf records only.
    Leaf,
    /// Level-1 rollups, one per geography.
    LevelOneRollup,
    /// Every rollup, merged into one synthetic row per geography.
    CoalescedRollup,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::ExactLevel(level) => write!(f, "level-{level} records"),
            Strategy::Leaf => write!(f, "leaf records"),
            Strategy::LevelOneRollup => write!(f, "level-1 rollups"),
            Strategy::CoalescedRollup => write!(f, "rollups coalesced by geography"),
        }
    }
}

/// The resolved, non-overlapping record set for one filter state.
///
/// Records pass through borrowed from the dataset; only coalesced rows are
/// owned, so the dataset is never mutated.
#[derive(Debug, Clone)]
pub struct Selection<'a> {
    pub records: Vec<Cow<'a, Record>>,
    /// Segment type the records belong to, when one was resolvable.
    pub segment_type: Option<String>,
    /// `Some((scope, strategy))` when records were found.
    pub resolved: Option<(Scope, Strategy)>,
    /// A geography filter was requested but a fallback tier ignored it.
    pub geography_dropped: bool,
    pub no_data: Option<NoData>,
}

impl<'a> Selection<'a> {
    fn empty(segment_type: Option<String>, reason: NoData) -> Self {
        Selection {
            records: Vec::new(),
            segment_type,
            resolved: None,
            geography_dropped: false,
            no_data: Some(reason),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.records.iter().map(|r| r.as_ref())
    }
}

// ---------------------------------------------------------------------------
// Decision table
// ---------------------------------------------------------------------------

/// One row of the fallback table: which constraints are still applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Attempt {
    scope: Scope,
    by_geography: bool,
    level: Option<u32>,
}

impl Attempt {
    fn strategies(&self) -> Vec<Strategy> {
        match self.level {
            Some(level) => vec![Strategy::ExactLevel(level)],
            None => vec![Strategy::Leaf, Strategy::LevelOneRollup, Strategy::CoalescedRollup],
        }
    }

    fn same_constraints(&self, other: &Attempt) -> bool {
        self.by_geography == other.by_geography && self.level == other.level
    }
}

/// Fallback tiers in priority order, skipping any tier that would repeat
/// the constraints of the one before it.
fn attempts(filter: &FilterState) -> Vec<Attempt> {
    let tiers = [
        Attempt {
            scope: Scope::Requested,
            by_geography: filter.has_geography_filter(),
            level: filter.aggregation_level,
        },
        Attempt {
            scope: Scope::AllGeographies,
            by_geography: false,
            level: filter.aggregation_level,
        },
        Attempt {
            scope: Scope::SegmentTypeOnly,
            by_geography: false,
            level: None,
        },
    ];

    let mut plan: Vec<Attempt> = Vec::with_capacity(tiers.len());
    for tier in tiers {
        if plan.iter().any(|done| done.same_constraints(&tier)) {
            continue;
        }
        plan.push(tier);
    }
    plan
}

impl Strategy {
    fn apply<'a>(self, candidates: &[&'a Record]) -> Vec<Cow<'a, Record>> {
        match self {
            Strategy::ExactLevel(level) => exact_level(candidates, level),
            Strategy::Leaf => candidates
                .iter()
                .filter(|r| r.is_leaf())
                .map(|r| Cow::Borrowed(*r))
                .collect(),
            Strategy::LevelOneRollup => candidates
                .iter()
                .filter(|r| r.is_rollup() && r.aggregation_level == Some(1))
                .map(|r| Cow::Borrowed(*r))
                .collect(),
            Strategy::CoalescedRollup => {
                coalesce_by_geography(candidates.iter().copied().filter(|r| r.is_rollup()))
                    .into_iter()
                    .map(Cow::Owned)
                    .collect()
            }
        }
    }
}

/// Rollups at `level` represent the pairs they cover; leaves at the same
/// level fill the remaining gaps. Each `geography::segment` pair is summed
/// at most once.
fn exact_level<'a>(candidates: &[&'a Record], level: u32) -> Vec<Cow<'a, Record>> {
    let at_level: Vec<&'a Record> = candidates
        .iter()
        .copied()
        .filter(|r| r.aggregation_level == Some(level))
        .collect();

    let mut covered: BTreeSet<String> = BTreeSet::new();
    let mut picked: Vec<Cow<'a, Record>> = Vec::new();

    for rec in at_level.iter().filter(|r| r.is_rollup()) {
        if covered.insert(rec.coverage_key()) {
            picked.push(Cow::Borrowed(*rec));
        }
    }
    for rec in at_level.iter().filter(|r| r.is_leaf()) {
        if covered.insert(rec.coverage_key()) {
            picked.push(Cow::Borrowed(*rec));
        }
    }
    picked
}

/// Merge rollups into one synthetic record per geography, adding every
/// year of every series. Input records are only read; the first record of
/// each geography is copied and the copy accumulates the rest.
pub fn coalesce_by_geography<'a>(records: impl IntoIterator<Item = &'a Record>) -> Vec<Record> {
    let mut by_geography: IndexMap<&str, Record> = IndexMap::new();

    for rec in records {
        match by_geography.get_mut(rec.geography.as_str()) {
            Some(merged) => {
                if merged.aggregation_level != rec.aggregation_level {
                    merged.aggregation_level = None;
                }
                for (year, cell) in &rec.time_series {
                    let Some(v) = cell.as_f64() else { continue };
                    let slot = merged.time_series.entry(*year).or_insert(SeriesValue::Number(0.0));
                    let base = slot.as_f64().unwrap_or(0.0);
                    *slot = SeriesValue::Number(base + v);
                }
            }
            None => {
                let time_series = rec
                    .time_series
                    .iter()
                    .filter_map(|(year, cell)| cell.as_f64().map(|v| (*year, SeriesValue::Number(v))))
                    .collect();
                by_geography.insert(
                    rec.geography.as_str(),
                    Record {
                        time_series,
                        ..rec.clone()
                    },
                );
            }
        }
    }

    by_geography.into_values().collect()
}

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// Resolve the record subset whose values sum to the non-double-counted
/// total for `filter`.
///
/// The segment type is a hard constraint and must already be set on the
/// filter (see [`select_for`] for inference). Tiers are tried in order:
/// the full request, then without geographies, then segment type alone.
/// Within a tier an explicit aggregation level is honoured exactly;
/// otherwise leaves are preferred, then level-1 rollups, then all rollups
/// coalesced by geography. The first non-empty result wins.
pub fn select<'a>(records: &'a [Record], filter: &FilterState) -> Selection<'a> {
    let Some(segment_type) = filter.segment_type.as_deref().filter(|s| !s.is_empty()) else {
        log::warn!("No KPI data available: no segment type to select on");
        return Selection::empty(None, NoData::MissingSegmentType);
    };

    let typed: Vec<&'a Record> = records
        .iter()
        .filter(|r| r.segment_type == segment_type)
        .collect();

    for attempt in attempts(filter) {
        let scoped: Vec<&'a Record> = typed
            .iter()
            .copied()
            .filter(|r| !attempt.by_geography || filter.matches_geography(r))
            .collect();

        for strategy in attempt.strategies() {
            let picked = strategy.apply(&scoped);
            if picked.is_empty() {
                continue;
            }

            let geography_dropped = filter.has_geography_filter() && !attempt.by_geography;
            if geography_dropped {
                log::info!(
                    "No records for geographies {:?} in {segment_type:?}; falling back to all geographies",
                    filter.geographies
                );
            }
            log::debug!(
                "Selected {} {strategy} for {segment_type:?} ({:?} scope, {} typed records)",
                picked.len(),
                attempt.scope,
                typed.len()
            );

            return Selection {
                records: picked,
                segment_type: Some(segment_type.to_string()),
                resolved: Some((attempt.scope, strategy)),
                geography_dropped,
                no_data: None,
            };
        }
    }

    log::warn!(
        "No KPI data available for segment type {segment_type:?} with geographies {:?}",
        filter.geographies
    );
    Selection::empty(Some(segment_type.to_string()), NoData::NoMatchingData)
}

/// [`select`] over the dataset's matrix for `filter.data_type`, inferring
/// the segment type when the filter leaves it open.
pub fn select_for<'a>(dataset: &'a Dataset, filter: &FilterState) -> Selection<'a> {
    let records = dataset.matrix(filter.data_type);
    match resolve_segment_type(dataset, filter) {
        Some(segment_type) if filter.segment_type.as_deref() == Some(segment_type.as_str()) => {
            select(records, filter)
        }
        Some(segment_type) => {
            let resolved = FilterState {
                segment_type: Some(segment_type),
                ..filter.clone()
            };
            select(records, &resolved)
        }
        None => {
            log::warn!("No KPI data available: dataset declares no segment types");
            Selection::empty(None, NoData::MissingSegmentType)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::TimeSeries;

    fn series(start: f64, end: f64) -> TimeSeries {
        [(2024, SeriesValue::Number(start)), (2032, SeriesValue::Number(end))]
            .into_iter()
            .collect()
    }

    fn rec(geo: &str, seg: &str, flag: Option<bool>, level: Option<u32>, start: f64, end: f64) -> Record {
        Record {
            geography: geo.into(),
            segment: seg.into(),
            segment_type: "By Product".into(),
            is_aggregated: flag,
            aggregation_level: level,
            time_series: series(start, end),
        }
    }

    fn filter(geos: &[&str], level: Option<u32>) -> FilterState {
        FilterState {
            geographies: geos.iter().map(|g| g.to_string()).collect(),
            segment_type: Some("By Product".into()),
            aggregation_level: level,
            ..FilterState::default()
        }
    }

    fn geos(sel: &Selection) -> Vec<String> {
        sel.iter().map(|r| r.geography.clone()).collect()
    }

    #[test]
    fn segment_type_is_a_hard_constraint() {
        let mut other = rec("India", "X", Some(false), None, 1.0, 2.0);
        other.segment_type = "By Channel".into();
        let records = vec![rec("India", "A", Some(false), None, 10.0, 20.0), other];
        let sel = select(&records, &filter(&[], None));
        assert_eq!(sel.len(), 1);
        assert_eq!(sel.records[0].segment, "A");
    }

    #[test]
    fn leaves_win_when_level_unspecified() {
        let records = vec![
            rec("India", "A", Some(false), None, 40.0, 120.0),
            rec("India", "B", Some(false), None, 60.0, 180.0),
            rec("India", "Total", Some(true), Some(1), 100.0, 300.0),
        ];
        let sel = select(&records, &filter(&["India"], None));
        assert_eq!(sel.resolved, Some((Scope::Requested, Strategy::Leaf)));
        assert!(sel.iter().all(Record::is_leaf));
        assert_eq!(sel.len(), 2);
    }

    #[test]
    fn level_one_rollup_when_no_leaves() {
        let records = vec![
            rec("Brazil", "Total", Some(true), Some(1), 50.0, 80.0),
            rec("Brazil", "Sub", Some(true), Some(2), 20.0, 30.0),
        ];
        let sel = select(&records, &filter(&["Brazil"], None));
        assert_eq!(sel.resolved, Some((Scope::Requested, Strategy::LevelOneRollup)));
        assert_eq!(sel.len(), 1);
        assert_eq!(sel.records[0].value_at(2024), Some(50.0));
    }

    #[test]
    fn unflagged_records_are_never_leaves() {
        let records = vec![
            rec("India", "A", None, None, 5.0, 6.0),
            rec("India", "T", Some(true), Some(1), 50.0, 60.0),
        ];
        let sel = select(&records, &filter(&[], None));
        assert_eq!(sel.resolved, Some((Scope::Requested, Strategy::LevelOneRollup)));
        assert_eq!(sel.records[0].segment, "T");
    }

    #[test]
    fn coalesces_mixed_rollups_per_geography_over_full_series() {
        let mut a = rec("India", "North", Some(true), Some(2), 10.0, 20.0);
        a.time_series.insert(2028, SeriesValue::Number(15.0));
        let mut b = rec("India", "South", Some(true), Some(3), 5.0, 7.0);
        b.time_series.insert(2028, SeriesValue::Text("4".into()));
        let c = rec("Chile", "All", Some(true), Some(2), 1.0, 2.0);
        let records = vec![a.clone(), b.clone(), c];

        let sel = select(&records, &filter(&[], None));
        assert_eq!(sel.resolved, Some((Scope::Requested, Strategy::CoalescedRollup)));
        assert_eq!(geos(&sel), ["India", "Chile"]);

        let india = &sel.records[0];
        assert_eq!(india.value_at(2024), Some(15.0));
        assert_eq!(india.value_at(2028), Some(19.0));
        assert_eq!(india.value_at(2032), Some(27.0));
        assert_eq!(india.aggregation_level, None);
        assert!(matches!(india, Cow::Owned(_)));

        // inputs untouched
        assert_eq!(records[0], a);
        assert_eq!(records[1], b);
    }

    #[test]
    fn explicit_level_uses_rollups_and_fills_gaps_with_leaves() {
        let records = vec![
            rec("India", "A", Some(true), Some(2), 30.0, 60.0),
            rec("India", "A", Some(false), Some(2), 30.0, 60.0),
            rec("India", "B", Some(false), Some(2), 10.0, 15.0),
            rec("India", "C", Some(false), Some(3), 99.0, 99.0),
        ];
        let sel = select(&records, &filter(&[], Some(2)));
        assert_eq!(sel.resolved, Some((Scope::Requested, Strategy::ExactLevel(2))));
        assert_eq!(sel.len(), 2);
        assert!(sel.records[0].is_rollup());
        assert_eq!(sel.records[1].segment, "B");
    }

    #[test]
    fn never_mixes_leaf_and_rollup_for_same_pair() {
        let records = vec![
            rec("India", "A", Some(true), Some(1), 30.0, 60.0),
            rec("India", "A", Some(false), Some(1), 30.0, 60.0),
            rec("Peru", "A", Some(false), Some(1), 3.0, 6.0),
            rec("Peru", "A", Some(true), Some(1), 3.0, 6.0),
        ];
        for level in [None, Some(1)] {
            let sel = select(&records, &filter(&[], level));
            let mut keys = BTreeSet::new();
            for r in sel.iter() {
                assert!(keys.insert(r.coverage_key()), "pair {} summed twice", r.coverage_key());
            }
        }
    }

    #[test]
    fn drops_geography_when_requested_one_has_no_records() {
        let records = vec![rec("India", "A", Some(false), None, 1.0, 2.0)];
        let sel = select(&records, &filter(&["Japan"], None));
        assert!(sel.geography_dropped);
        assert_eq!(sel.resolved, Some((Scope::AllGeographies, Strategy::Leaf)));
        assert_eq!(geos(&sel), ["India"]);
    }

    #[test]
    fn keeps_level_when_dropping_geography() {
        // a leaf exists, but only the level-free last tier may use it
        let records = vec![
            rec("India", "North", Some(true), Some(2), 10.0, 20.0),
            rec("Peru", "All", Some(true), Some(1), 5.0, 6.0),
            rec("India", "A", Some(false), None, 1.0, 2.0),
        ];
        let sel = select(&records, &filter(&["Japan"], Some(2)));
        assert_eq!(sel.resolved, Some((Scope::AllGeographies, Strategy::ExactLevel(2))));
        assert!(sel.geography_dropped);
        assert_eq!(sel.len(), 1);
        assert_eq!(sel.records[0].segment, "North");
    }

    #[test]
    fn drops_level_after_geography() {
        let records = vec![rec("India", "A", Some(false), None, 1.0, 2.0)];
        let sel = select(&records, &filter(&["India"], Some(4)));
        assert_eq!(sel.resolved, Some((Scope::SegmentTypeOnly, Strategy::Leaf)));
        assert!(sel.geography_dropped);

        let sel = select(&records, &filter(&[], Some(4)));
        assert_eq!(sel.resolved, Some((Scope::SegmentTypeOnly, Strategy::Leaf)));
        assert!(!sel.geography_dropped);
    }

    #[test]
    fn exhausted_tiers_report_no_matching_data() {
        let mut other = rec("India", "A", Some(false), None, 1.0, 2.0);
        other.segment_type = "By Channel".into();
        let records = vec![other];
        let sel = select(&records, &filter(&["Atlantis"], None));
        assert!(sel.is_empty());
        assert_eq!(sel.no_data, Some(NoData::NoMatchingData));
        assert_eq!(sel.segment_type.as_deref(), Some("By Product"));
    }

    #[test]
    fn missing_segment_type_is_no_data() {
        let records = vec![rec("India", "A", Some(false), None, 1.0, 2.0)];
        let sel = select(&records, &FilterState::default());
        assert_eq!(sel.no_data, Some(NoData::MissingSegmentType));

        let empty = Dataset::default();
        let sel = select_for(&empty, &FilterState::default());
        assert_eq!(sel.no_data, Some(NoData::MissingSegmentType));
    }

    #[test]
    fn select_for_infers_first_segment_type() {
        let ds = Dataset::from_records(vec![rec("India", "A", Some(false), None, 1.0, 2.0)], vec![]);
        let sel = select_for(&ds, &FilterState::default());
        assert_eq!(sel.segment_type.as_deref(), Some("By Product"));
        assert_eq!(sel.len(), 1);
    }

    #[test]
    fn tier_plan_skips_repeats() {
        let plan = attempts(&filter(&[], None));
        assert_eq!(plan.len(), 1);
        let plan = attempts(&filter(&["India"], None));
        assert_eq!(
            plan.iter().map(|a| a.scope).collect::<Vec<_>>(),
            [Scope::Requested, Scope::AllGeographies]
        );
        let plan = attempts(&filter(&["India"], Some(2)));
        assert_eq!(plan.len(), 3);
    }
}
