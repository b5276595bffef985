use std::collections::BTreeMap;

use anyhow::{Context, Result};
use indexmap::IndexMap;

use market_kpi::data::model::{
    DataSets, Dataset, Dimensions, Geographies, Matrix, Metadata, Record, SeriesValue, TimeSeries,
};

const START_YEAR: i32 = 2021;
const BASE_YEAR: i32 = 2024;
const FORECAST_YEAR: i32 = 2032;

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5))
            .rotate_left(7)
            .wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Uniform draw in `[lo, hi)`.
    fn range(&mut self, lo: f64, hi: f64) -> f64 {
        lo + (hi - lo) * self.next_f64()
    }
}

/// Compound a base-year value backwards and forwards at `growth` per year.
fn grow_series(base: f64, growth: f64) -> Vec<(i32, f64)> {
    (START_YEAR..=FORECAST_YEAR)
        .map(|year| {
            let v = base * (1.0 + growth).powi(year - BASE_YEAR);
            (year, (v * 10.0).round() / 10.0)
        })
        .collect()
}

fn to_time_series(points: &[(i32, f64)]) -> TimeSeries {
    points
        .iter()
        .map(|&(year, v)| (year, SeriesValue::Number(v)))
        .collect()
}

fn record(
    geography: &str,
    segment: &str,
    segment_type: &str,
    is_aggregated: bool,
    level: Option<u32>,
    points: &[(i32, f64)],
) -> Record {
    Record {
        geography: geography.to_string(),
        segment: segment.to_string(),
        segment_type: segment_type.to_string(),
        is_aggregated: Some(is_aggregated),
        aggregation_level: level,
        time_series: to_time_series(points),
    }
}

/// Leaves per segment plus a level-1 total per geography for each type.
fn build_matrix(
    rng: &mut SimpleRng,
    geographies: &[&str],
    segments: &IndexMap<String, Vec<String>>,
    scale: f64,
) -> Vec<Record> {
    let mut rows = Vec::new();
    for &geo in geographies {
        for (segment_type, names) in segments {
            let mut totals: BTreeMap<i32, f64> = BTreeMap::new();
            for name in names {
                let points = grow_series(rng.range(0.2, 1.0) * scale, rng.range(0.03, 0.15));
                for &(year, v) in &points {
                    *totals.entry(year).or_default() += v;
                }
                rows.push(record(geo, name, segment_type, false, None, &points));
            }
            let total_points: Vec<(i32, f64)> = totals.into_iter().collect();
            rows.push(record(geo, "Total", segment_type, true, Some(1), &total_points));
        }
    }
    rows
}

fn main() -> Result<()> {
    let mut rng = SimpleRng::new(42);

    let geographies = ["India", "Brazil", "Germany", "Japan"];
    let mut segments: IndexMap<String, Vec<String>> = IndexMap::new();
    segments.insert(
        "By Product".to_string(),
        ["Tablets", "Capsules", "Injectables"].map(String::from).to_vec(),
    );
    segments.insert(
        "By Channel".to_string(),
        ["Hospital", "Retail", "Online"].map(String::from).to_vec(),
    );

    let value = build_matrix(&mut rng, &geographies, &segments, 250_000_000.0);
    let volume = build_matrix(&mut rng, &geographies, &segments, 40_000.0);

    let dataset = Dataset {
        dimensions: Dimensions {
            geographies: Geographies {
                all_geographies: geographies.map(String::from).to_vec(),
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
            years: (START_YEAR..=FORECAST_YEAR).collect(),
            start_year: Some(BASE_YEAR),
            forecast_year: Some(FORECAST_YEAR),
            currency: Some("USD".to_string()),
            value_unit: Some("USD Million".to_string()),
            volume_unit: Some("Units".to_string()),
        },
    };

    let output_path = "sample_market.json";
    let json = serde_json::to_string_pretty(&dataset).context("encoding sample dataset")?;
    std::fs::write(output_path, json).with_context(|| format!("writing {output_path}"))?;

    println!(
        "Wrote {} value and {} volume records to {output_path}",
        dataset.data.value.geography_segment_matrix.len(),
        dataset.data.volume.geography_segment_matrix.len()
    );
    Ok(())
}
