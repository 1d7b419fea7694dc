//! Data layer: core types, loading, filtering, aggregation and export.
//!
//! Architecture:
//! ```text
//!  .csv / .json / .parquet
//!        │
//!        ▼
//!   ┌──────────┐
//!   │  loader   │  parse file → Dataset
//!   └──────────┘
//!        │
//!        ▼
//!   ┌──────────┐
//!   │ Dataset   │  Vec<Row>, schema, column index
//!   └──────────┘
//!        │
//!        ▼
//!   ┌──────────┐
//!   │  filter   │  FilterSpec → FilteredView (row indices)
//!   └──────────┘
//!        │
//!        ▼
//!   ┌───────────┐
//!   │ aggregate  │  group + reduce → AggregationResult / CrossTab / Correlation
//!   └───────────┘
//!        │
//!        ▼
//!   ┌──────────┐
//!   │  export   │  flat rows → CSV
//!   └──────────┘
//! ```

pub mod aggregate;
pub mod error;
pub mod export;
pub mod filter;
pub mod loader;
pub mod model;

pub use aggregate::{
    aggregate, aggregate_with, correlation, crosstab, value_counts, AggregateRequest,
    AggregationResult, CrossTab, Correlation, Group, GroupOrder, Reducer,
};
pub use error::PipelineError;
pub use export::{ExportTable, ToExportRows};
pub use filter::{apply_filters, filter_options, FilterSpec, FilteredView};
pub use model::{Dataset, FieldKind, Row, Schema, Value};
