//! Metric calculator: totals, CAGR and growth over a resolved selection.

use serde::Serialize;

use crate::data::filter::FilterState;
use crate::data::model::{DataType, Dataset, Metadata, Record};
use crate::data::select::{select_for, Selection};
use crate::settings::Settings;

pub const INDIAN_RUPEE: &str = "INR";
const ALL_GEOGRAPHIES: &str = "All Geographies";
const ALL_SEGMENTS: &str = "All Segments";

// ---------------------------------------------------------------------------
// KpiResult
// ---------------------------------------------------------------------------

/// How summed quantities are scaled for display. Totals themselves are
/// always kept unscaled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DisplayScale {
    /// Rupee datasets: native unit, never divided. Value figures use
    /// lakh/crore digit grouping.
    IndianNative,
    /// Unit label mentions millions: divide by one million.
    Millions,
    /// Raw values, unit label unchanged.
    Native,
}

impl DisplayScale {
    pub fn apply(self, value: f64) -> f64 {
        match self {
            DisplayScale::Millions => value / 1_000_000.0,
            DisplayScale::IndianNative | DisplayScale::Native => value,
        }
    }
}

/// Headline KPIs for one filter state. Recomputed on every change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KpiResult {
    pub start_year: i32,
    pub end_year: i32,
    pub period_start_value: f64,
    pub period_end_value: f64,
    pub cagr_percent: f64,
    pub absolute_growth: f64,
    pub growth_percent: f64,
    pub currency: String,
    pub unit: String,
    pub scale: DisplayScale,
    pub data_type: DataType,
    pub data_type_label: String,
    pub geography_label: String,
    pub segment_type_label: String,
    pub records_used: usize,
}

impl KpiResult {
    pub fn display_start(&self) -> f64 {
        self.scale.apply(self.period_start_value)
    }

    pub fn display_end(&self) -> f64 {
        self.scale.apply(self.period_end_value)
    }

    pub fn display_absolute_growth(&self) -> f64 {
        self.scale.apply(self.absolute_growth)
    }

    pub fn is_indian_rupee(&self) -> bool {
        self.currency == INDIAN_RUPEE
    }
}

// ---------------------------------------------------------------------------
// Calculation
// ---------------------------------------------------------------------------

/// Start and end year of the KPI period: declared years first, then the
/// span of `metadata.years`, then the configured fallback.
pub fn period_years(metadata: &Metadata, settings: &Settings) -> (i32, i32) {
    let start = metadata
        .start_year
        .or_else(|| metadata.years.iter().min().copied())
        .unwrap_or(settings.fallback_start_year);
    let end = metadata
        .forecast_year
        .or_else(|| metadata.years.iter().max().copied())
        .unwrap_or(settings.fallback_end_year);
    (start, end)
}

/// Compound annual growth rate in percent. Zero whenever it is undefined.
pub fn cagr_percent(start_total: f64, end_total: f64, years: i32) -> f64 {
    if start_total <= 0.0 || years <= 0 {
        return 0.0;
    }
    let rate = ((end_total / start_total).powf(1.0 / f64::from(years)) - 1.0) * 100.0;
    if rate.is_finite() {
        rate
    } else {
        0.0
    }
}

/// Value of `record` at `year`, with malformed cells read as absent.
fn read_year(record: &Record, year: i32) -> Option<f64> {
    let cell = record.time_series.get(&year)?;
    let value = cell.as_f64();
    if value.is_none() {
        log::debug!(
            "Malformed value {cell} at {year} for {}; treating as absent",
            record.coverage_key()
        );
    }
    value
}

/// Start/end contribution of one record. A zero or absent boundary value is
/// replaced by the earliest (start) or latest (end) strictly positive value
/// in the record's series, if any.
fn boundary_values(record: &Record, start_year: i32, end_year: i32) -> (f64, f64) {
    let mut positive = record
        .time_series
        .values()
        .filter_map(|cell| cell.as_f64())
        .filter(|v| *v > 0.0);
    let earliest = positive.next();
    let latest = positive.next_back().or(earliest);

    let start = match read_year(record, start_year) {
        Some(v) if v != 0.0 => v,
        _ => earliest.unwrap_or(0.0),
    };
    let end = match read_year(record, end_year) {
        Some(v) if v != 0.0 => v,
        _ => latest.unwrap_or(0.0),
    };
    (start, end)
}

fn resolve_currency(metadata: &Metadata, settings: &Settings) -> String {
    fn non_empty(code: &Option<String>) -> Option<&str> {
        code.as_deref().filter(|c| !c.is_empty())
    }
    non_empty(&settings.currency)
        .or_else(|| non_empty(&metadata.currency))
        .unwrap_or(&settings.default_currency)
        .to_string()
}

fn resolve_unit(metadata: &Metadata, data_type: DataType, settings: &Settings) -> String {
    let declared = match data_type {
        DataType::Value => metadata.value_unit.as_deref(),
        DataType::Volume => metadata.volume_unit.as_deref(),
    };
    match (declared, data_type) {
        (Some(unit), _) if !unit.is_empty() => unit.to_string(),
        (_, DataType::Value) => settings.default_value_unit.clone(),
        (_, DataType::Volume) => settings.default_volume_unit.clone(),
    }
}

/// Rupee figures are never divided, whatever the unit label says.
fn display_scale(currency: &str, unit: &str) -> DisplayScale {
    if currency == INDIAN_RUPEE {
        DisplayScale::IndianNative
    } else if unit.to_lowercase().contains("million") {
        DisplayScale::Millions
    } else {
        DisplayScale::Native
    }
}

/// Geography caption. A selection that had to drop the requested
/// geographies is labelled as covering all of them.
fn geography_label(filter: &FilterState, geography_dropped: bool) -> String {
    let mut unique = filter.clone();
    unique.dedupe_geographies();
    let geos = &unique.geographies;
    match geos.len() {
        _ if geography_dropped => ALL_GEOGRAPHIES.to_string(),
        0 => ALL_GEOGRAPHIES.to_string(),
        1 => geos[0].clone(),
        n => format!(
            "{n} Geographies ({}{})",
            geos[..2].join(", "),
            if n > 2 { "..." } else { "" }
        ),
    }
}

/// Compute the KPIs for an already-resolved selection. `None` when the
/// selection is empty; the caller then shows nothing at all.
pub fn compute(
    selection: &Selection<'_>,
    metadata: &Metadata,
    filter: &FilterState,
    settings: &Settings,
) -> Option<KpiResult> {
    if selection.is_empty() {
        return None;
    }

    let (start_year, end_year) = period_years(metadata, settings);

    let (start_total, end_total) = selection
        .iter()
        .map(|rec| boundary_values(rec, start_year, end_year))
        .fold((0.0, 0.0), |(s, e), (rs, re)| (s + rs, e + re));

    let absolute_growth = end_total - start_total;
    let growth_percent = if start_total > 0.0 {
        absolute_growth / start_total * 100.0
    } else {
        0.0
    };

    let currency = resolve_currency(metadata, settings);
    let unit = resolve_unit(metadata, filter.data_type, settings);
    let scale = display_scale(&currency, &unit);

    log::debug!(
        "KPI over {} records: {start_total} ({start_year}) -> {end_total} ({end_year})",
        selection.len()
    );

    Some(KpiResult {
        start_year,
        end_year,
        period_start_value: start_total,
        period_end_value: end_total,
        cagr_percent: cagr_percent(start_total, end_total, end_year - start_year),
        absolute_growth,
        growth_percent,
        currency,
        unit,
        scale,
        data_type: filter.data_type,
        data_type_label: filter.data_type.label().to_string(),
        geography_label: geography_label(filter, selection.geography_dropped),
        segment_type_label: selection
            .segment_type
            .clone()
            .unwrap_or_else(|| ALL_SEGMENTS.to_string()),
        records_used: selection.len(),
    })
}

/// Select then compute against a loaded dataset.
pub fn evaluate(dataset: &Dataset, filter: &FilterState, settings: &Settings) -> Option<KpiResult> {
    let selection = select_for(dataset, filter);
    compute(&selection, &dataset.metadata, filter, settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::SeriesValue;
    use crate::data::select::select;

    fn record(geo: &str, series: &[(i32, SeriesValue)]) -> Record {
        Record {
            geography: geo.into(),
            segment: "S".into(),
            segment_type: "By Product".into(),
            is_aggregated: Some(false),
            aggregation_level: None,
            time_series: series.iter().cloned().collect(),
        }
    }

    fn metadata() -> Metadata {
        Metadata {
            years: (2024..=2032).collect(),
            start_year: Some(2024),
            forecast_year: Some(2032),
            currency: Some("USD".into()),
            value_unit: Some("USD".into()),
            volume_unit: None,
        }
    }

    fn product_filter() -> FilterState {
        FilterState {
            segment_type: Some("By Product".into()),
            ..FilterState::default()
        }
    }

    fn n(v: f64) -> SeriesValue {
        SeriesValue::Number(v)
    }

    #[test]
    fn cagr_is_zero_when_undefined() {
        assert_eq!(cagr_percent(0.0, 100.0, 8), 0.0);
        assert_eq!(cagr_percent(-5.0, 100.0, 8), 0.0);
        assert_eq!(cagr_percent(100.0, 200.0, 0), 0.0);
        assert_eq!(cagr_percent(100.0, 200.0, -3), 0.0);
        assert_eq!(cagr_percent(100.0, -50.0, 2), 0.0);
        assert!((cagr_percent(100.0, 121.0, 2) - 10.0).abs() < 1e-9);
    }

    #[test]
    fn period_years_prefer_declared_then_span_then_fallback() {
        let settings = Settings::default();
        assert_eq!(period_years(&metadata(), &settings), (2024, 2032));

        let span = Metadata {
            years: vec![2027, 2021, 2030],
            ..Metadata::default()
        };
        assert_eq!(period_years(&span, &settings), (2021, 2030));
        assert_eq!(period_years(&Metadata::default(), &settings), (2024, 2032));
    }

    #[test]
    fn sparse_series_borrow_nearest_positive_years() {
        let rec = record("India", &[(2025, n(0.0)), (2026, n(12.0)), (2030, n(40.0)), (2031, n(0.0))]);
        assert_eq!(boundary_values(&rec, 2024, 2032), (12.0, 40.0));

        let single = record("India", &[(2026, n(12.0))]);
        assert_eq!(boundary_values(&single, 2024, 2032), (12.0, 12.0));

        let nothing = record("India", &[(2024, n(0.0))]);
        assert_eq!(boundary_values(&nothing, 2024, 2032), (0.0, 0.0));
    }

    #[test]
    fn malformed_cells_are_recovered() {
        let rec = record(
            "India",
            &[(2024, SeriesValue::Text("10.5".into())), (2028, n(20.0)), (2032, SeriesValue::Text("abc".into()))],
        );
        assert_eq!(boundary_values(&rec, 2024, 2032), (10.5, 20.0));
    }

    #[test]
    fn empty_selection_yields_none() {
        let records: Vec<Record> = Vec::new();
        let sel = select(&records, &product_filter());
        assert!(compute(&sel, &metadata(), &product_filter(), &Settings::default()).is_none());
    }

    #[test]
    fn growth_figures_and_labels() {
        let records = vec![
            record("India", &[(2024, n(40.0)), (2032, n(100.0))]),
            record("India", &[(2024, n(60.0)), (2032, n(200.0))]),
        ];
        let mut filter = product_filter();
        filter.geographies = vec!["India".into()];
        let sel = select(&records, &filter);
        let kpi = compute(&sel, &metadata(), &filter, &Settings::default()).unwrap();

        assert_eq!(kpi.period_start_value, 100.0);
        assert_eq!(kpi.period_end_value, 300.0);
        assert_eq!(kpi.absolute_growth, 200.0);
        assert_eq!(kpi.growth_percent, 200.0);
        assert!((kpi.cagr_percent - 14.72).abs() < 0.01);
        assert_eq!(kpi.geography_label, "India");
        assert_eq!(kpi.segment_type_label, "By Product");
        assert_eq!(kpi.data_type_label, "Market Size");
        assert_eq!(kpi.scale, DisplayScale::Native);
        assert_eq!(kpi.records_used, 2);
    }

    #[test]
    fn geography_label_variants() {
        let mut filter = product_filter();
        assert_eq!(geography_label(&filter, false), "All Geographies");
        filter.geographies = vec!["India".into(), "Brazil".into()];
        assert_eq!(geography_label(&filter, false), "2 Geographies (India, Brazil)");
        filter.geographies.push("Chile".into());
        assert_eq!(geography_label(&filter, false), "3 Geographies (India, Brazil...)");
        assert_eq!(geography_label(&filter, true), "All Geographies");
        filter.geographies = vec!["India".into(), "India".into()];
        assert_eq!(geography_label(&filter, false), "India");
    }

    #[test]
    fn currency_and_unit_resolution() {
        let mut settings = Settings::default();
        let mut meta = metadata();
        meta.value_unit = Some("USD Million".into());
        assert_eq!(resolve_currency(&meta, &settings), "USD");
        assert_eq!(display_scale("USD", "USD Million"), DisplayScale::Millions);

        settings.currency = Some("INR".into());
        assert_eq!(resolve_currency(&meta, &settings), "INR");
        assert_eq!(display_scale("INR", "USD Million"), DisplayScale::IndianNative);
        assert_eq!(display_scale("INR", "Million Units"), DisplayScale::IndianNative);
        assert_eq!(display_scale("USD", "Tons"), DisplayScale::Native);

        // an empty override defers to the dataset
        meta.currency = Some("INR".into());
        settings.currency = Some(String::new());
        assert_eq!(resolve_currency(&meta, &settings), "INR");

        meta.currency = Some(String::new());
        settings.currency = None;
        assert_eq!(resolve_currency(&meta, &settings), "USD");

        assert_eq!(resolve_unit(&Metadata::default(), DataType::Value, &settings), "Million");
        assert_eq!(resolve_unit(&Metadata::default(), DataType::Volume, &settings), "Units");
    }

    #[test]
    fn rupee_volume_is_not_divided() {
        let records = vec![record("India", &[(2024, n(2_000_000.0)), (2032, n(5_000_000.0))])];
        let mut meta = metadata();
        meta.currency = Some("INR".into());
        meta.volume_unit = Some("Million Units".into());
        let mut filter = product_filter();
        filter.data_type = DataType::Volume;
        let sel = select(&records, &filter);
        let kpi = compute(&sel, &meta, &filter, &Settings::default()).unwrap();
        assert_eq!(kpi.scale, DisplayScale::IndianNative);
        assert_eq!(kpi.display_start(), 2_000_000.0);
        assert_eq!(kpi.display_end(), 5_000_000.0);
        assert_eq!(kpi.unit, "Million Units");
    }

    #[test]
    fn millions_scale_only_touches_display() {
        let records = vec![record("India", &[(2024, n(2_000_000.0)), (2032, n(5_000_000.0))])];
        let mut meta = metadata();
        meta.value_unit = Some("million".into());
        let sel = select(&records, &product_filter());
        let kpi = compute(&sel, &meta, &product_filter(), &Settings::default()).unwrap();
        assert_eq!(kpi.period_start_value, 2_000_000.0);
        assert_eq!(kpi.display_start(), 2.0);
        assert_eq!(kpi.display_end(), 5.0);
        assert_eq!(kpi.display_absolute_growth(), 3.0);
        assert_eq!(kpi.unit, "million");
    }
}
