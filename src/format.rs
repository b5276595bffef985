//! Presentation formatter: turns a [`KpiResult`] into display strings.
//!
//! Nothing here feeds back into computation; rounding happens only on the
//! way out.

use std::fmt;

use crate::data::model::DataType;
use crate::kpi::{DisplayScale, KpiResult};

// ---------------------------------------------------------------------------
// Number formatting
// ---------------------------------------------------------------------------

/// Split a number rendered with one fractional digit into sign, integer
/// digits and the fractional part.
fn split_one_decimal(value: f64) -> (bool, String, String) {
    let rounded = format!("{:.1}", value.abs());
    let (int_part, frac_part) = rounded.split_once('.').unwrap_or((rounded.as_str(), "0"));
    // "-0.0" reads as zero
    let negative = value < 0.0 && int_part.chars().chain(frac_part.chars()).any(|c| c != '0');
    (negative, int_part.to_string(), frac_part.to_string())
}

fn join(negative: bool, grouped: String, frac: &str) -> String {
    let sign = if negative { "-" } else { "" };
    format!("{sign}{grouped}.{frac}")
}

/// en-US grouping with one fractional digit: `1234567.89` → `1,234,567.9`.
pub fn format_grouped(value: f64) -> String {
    let (negative, digits, frac) = split_one_decimal(value);
    let len = digits.len();
    let mut grouped = String::with_capacity(len + len / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    join(negative, grouped, &frac)
}

/// Indian lakh/crore grouping with one fractional digit:
/// `12345678.9` → `1,23,45,678.9`.
pub fn format_indian(value: f64) -> String {
    let (negative, digits, frac) = split_one_decimal(value);
    if digits.len() <= 3 {
        return join(negative, digits, &frac);
    }
    let (head, last_three) = digits.split_at(digits.len() - 3);
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 2);
    for (i, c) in head.chars().enumerate() {
        if i > 0 && (head.len() - i) % 2 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    grouped.push(',');
    grouped.push_str(last_three);
    join(negative, grouped, &frac)
}

/// Symbol shown in front of value figures; unknown codes print as-is.
pub fn currency_symbol(code: &str) -> &str {
    match code {
        "INR" => "₹",
        "USD" => "$",
        "EUR" => "€",
        "GBP" => "£",
        "JPY" => "¥",
        other => other,
    }
}

/// One money/volume figure as shown on a card.
pub fn format_amount(kpi: &KpiResult, display_value: f64) -> String {
    match (kpi.data_type, kpi.scale) {
        (DataType::Value, DisplayScale::IndianNative) => {
            format!("{} {}", currency_symbol(&kpi.currency), format_indian(display_value))
        }
        (DataType::Value, _) => format!(
            "{} {} {}",
            currency_symbol(&kpi.currency),
            format_grouped(display_value),
            kpi.unit
        )
        .trim_end()
        .to_string(),
        (DataType::Volume, _) => format!("{} {}", format_grouped(display_value), kpi.unit)
            .trim_end()
            .to_string(),
    }
}

// ---------------------------------------------------------------------------
// KPI panel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KpiCard {
    pub title: String,
    pub value: String,
    pub caption: Option<String>,
}

/// The rendered KPI strip: a header line plus four cards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KpiPanel {
    pub header: String,
    pub cards: Vec<KpiCard>,
}

impl KpiPanel {
    /// `None` in, `None` out: an unresolvable selection renders nothing.
    pub fn render(kpi: Option<&KpiResult>) -> Option<Self> {
        kpi.map(Self::from_result)
    }

    pub fn from_result(kpi: &KpiResult) -> Self {
        let period = format!("{}-{}", kpi.start_year, kpi.end_year);
        let sign = if kpi.growth_percent < 0.0 { "" } else { "+" };

        let header = if kpi.segment_type_label.is_empty() {
            format!("{} for {}", kpi.data_type_label, kpi.geography_label)
        } else {
            format!(
                "{} for {} | {}",
                kpi.data_type_label, kpi.geography_label, kpi.segment_type_label
            )
        };

        let cards = vec![
            KpiCard {
                title: format!("{} {}", kpi.data_type_label, kpi.start_year),
                value: format_amount(kpi, kpi.display_start()),
                caption: None,
            },
            KpiCard {
                title: format!("{} {}", kpi.data_type_label, kpi.end_year),
                value: format_amount(kpi, kpi.display_end()),
                caption: None,
            },
            KpiCard {
                title: format!("CAGR ({period})"),
                value: format!("{:.2}%", kpi.cagr_percent),
                caption: None,
            },
            KpiCard {
                title: format!("Absolute Growth ({period})"),
                value: format_amount(kpi, kpi.display_absolute_growth()),
                caption: Some(format!("{sign}{:.1}% increase", kpi.growth_percent)),
            },
        ];

        KpiPanel { header, cards }
    }
}

impl fmt::Display for KpiPanel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.header)?;
        for card in &self.cards {
            write!(f, "  {:<34} {}", card.title.to_uppercase(), card.value)?;
            if let Some(caption) = &card.caption {
                write!(f, "  ({caption})")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
