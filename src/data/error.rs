use thiserror::Error;

use super::aggregate::Reducer;
use super::model::{FieldKind, Schema};

/// Errors surfaced by the filter/aggregate pipeline.
///
/// Empty views and empty aggregations are not errors; callers check
/// `is_empty()` themselves.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    #[error("Unknown field '{field}' (available: {})", .available.join(", "))]
    UnknownField { field: String, available: Vec<String> },

    #[error("Reducer '{reducer}' cannot be applied to {kind} field '{field}'")]
    InvalidReducer {
        reducer: Reducer,
        field: String,
        kind: FieldKind,
    },

    #[error("Field '{field}' is {kind}, expected a numeric field")]
    NotNumeric { field: String, kind: FieldKind },

    #[error("Aggregation requires at least one group field")]
    NoGroupFields,

    #[error("No rows left to aggregate")]
    EmptyDataset,
}

impl PipelineError {
    pub(crate) fn unknown_field(field: &str, schema: &Schema) -> Self {
        PipelineError::UnknownField {
            field: field.to_string(),
            available: schema.field_names().map(str::to_string).collect(),
        }
    }
}
