//! Data layer: dataset types, loading, filtering and record selection.
//!
//! Architecture:
//! ```text
//!  .json / .csv
//!        │
//!        ▼
//!   ┌──────────┐
//!   │  loader   │  parse file → Dataset
//!   └──────────┘
//!        │
//!        ▼
//!   ┌──────────┐
//!   │  Dataset  │  value / volume matrices of Records, dimensions, metadata
//!   └──────────┘
//!        │   FilterState (geographies, segment type, data type, level)
//!        ▼
//!   ┌──────────┐
//!   │  select   │  fallback tiers → non-overlapping Selection
//!   └──────────┘
//! ```

pub mod filter;
pub mod loader;
pub mod model;
pub mod select;
