//! Headline KPIs (market size, CAGR, absolute growth) for hierarchical
//! market-research datasets.
//!
//! The flow is `data::loader` → [`data::select`] → [`kpi`] → [`format`]:
//! selection picks a record set that sums without double counting, the
//! calculator turns it into figures, and the formatter renders them.

pub mod app;
pub mod data;
pub mod export;
pub mod format;
pub mod kpi;
pub mod settings;
pub mod state;

pub use data::filter::FilterState;
pub use data::model::{DataType, Dataset, Record};
pub use data::select::{select, select_for, NoData, Selection};
pub use kpi::{compute, evaluate, KpiResult};
