use std::collections::{BTreeMap, BTreeSet};

use anyhow::{bail, Result};

use super::error::PipelineError;
use super::model::{Dataset, Row, Schema, Value};

// ---------------------------------------------------------------------------
// Filter predicate: which values are accepted per column
// ---------------------------------------------------------------------------

/// Per-column selection: maps column_name → set of accepted values.
/// If a column is absent or its set is empty, it means "no filter" (keep all).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterSpec {
    selections: BTreeMap<String, BTreeSet<Value>>,
}

impl FilterSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept exactly `values` for `field`, replacing any earlier selection.
    pub fn select<I, V>(mut self, field: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.selections.insert(
            field.to_string(),
            values.into_iter().map(Into::into).collect(),
        );
        self
    }

    /// Toggle a single value in a column's selection.
    pub fn toggle(&mut self, field: &str, value: &Value) {
        let selected = self.selections.entry(field.to_string()).or_default();
        if selected.contains(value) {
            selected.remove(value);
        } else {
            selected.insert(value.clone());
        }
    }

    /// Drop the selection for a column (back to "no filter").
    pub fn clear(&mut self, field: &str) {
        self.selections.remove(field);
    }

    /// Parse a `field=v1,v2` assignment as given on the command line and add
    /// it to the selection. Each value is typed like a loaded cell.
    pub fn parse_assignment(&mut self, assignment: &str) -> Result<()> {
        let Some((field, values)) = assignment.split_once('=') else {
            bail!("Invalid filter '{assignment}': expected field=value[,value...]");
        };
        let field = field.trim();
        if field.is_empty() {
            bail!("Invalid filter '{assignment}': empty field name");
        }
        let selected = self.selections.entry(field.to_string()).or_default();
        for value in values.split(',').map(str::trim).filter(|v| !v.is_empty()) {
            selected.insert(Value::parse_cell(value));
        }
        Ok(())
    }

    /// Accepted values for `field`, if any selection was made.
    pub fn get(&self, field: &str) -> Option<&BTreeSet<Value>> {
        self.selections.get(field)
    }

    /// Whether no field carries an effective (non-empty) restriction.
    pub fn is_unrestricted(&self) -> bool {
        self.selections.values().all(BTreeSet::is_empty)
    }

    /// Validate against `schema` and convert each selected value to its
    /// column's representation, so `4.0` selects the integer cell `4`.
    fn resolve(&self, schema: &Schema) -> Result<FilterSpec, PipelineError> {
        let mut selections = BTreeMap::new();
        for (field, values) in &self.selections {
            let kind = schema.require(field)?;
            selections.insert(
                field.clone(),
                values.iter().cloned().map(|v| v.coerce_to(kind)).collect(),
            );
        }
        Ok(FilterSpec { selections })
    }

    /// Whether `row` satisfies every non-empty selection.
    fn accepts(&self, row: &Row) -> bool {
        self.selections
            .iter()
            .filter(|(_, selected)| !selected.is_empty())
            .all(|(col, selected)| selected.contains(row.get(col)))
    }
}

// ---------------------------------------------------------------------------
// FilteredView – borrowed subset of a dataset
// ---------------------------------------------------------------------------

/// Rows of a [`Dataset`] that passed a filter, by index, in original order.
#[derive(Debug, Clone)]
pub struct FilteredView<'a> {
    dataset: &'a Dataset,
    indices: Vec<usize>,
}

impl<'a> FilteredView<'a> {
    /// View over every row of `dataset`.
    pub fn all(dataset: &'a Dataset) -> Self {
        FilteredView {
            dataset,
            indices: (0..dataset.len()).collect(),
        }
    }

    pub fn dataset(&self) -> &'a Dataset {
        self.dataset
    }

    pub fn schema(&self) -> &'a Schema {
        &self.dataset.schema
    }

    /// Indices into the underlying dataset's rows.
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn rows(&self) -> impl Iterator<Item = &'a Row> + '_ {
        let rows = &self.dataset.rows;
        self.indices.iter().map(move |&i| &rows[i])
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Apply a further filter on top of this view.
    pub fn refine(&self, spec: &FilterSpec) -> Result<FilteredView<'a>, PipelineError> {
        let spec = spec.resolve(self.schema())?;
        let rows = &self.dataset.rows;
        let indices: Vec<usize> = self
            .indices
            .iter()
            .copied()
            .filter(|&i| spec.accepts(&rows[i]))
            .collect();
        log::debug!("filter kept {} of {} rows", indices.len(), self.len());
        Ok(FilteredView {
            dataset: self.dataset,
            indices,
        })
    }

    /// First `n` rows of the view.
    pub fn head(&self, n: usize) -> FilteredView<'a> {
        FilteredView {
            dataset: self.dataset,
            indices: self.indices.iter().copied().take(n).collect(),
        }
    }

    /// Fail with [`PipelineError::EmptyDataset`] when no rows are left.
    pub fn require_non_empty(&self) -> Result<&Self, PipelineError> {
        if self.is_empty() {
            Err(PipelineError::EmptyDataset)
        } else {
            Ok(self)
        }
    }
}

impl PartialEq for FilteredView<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.dataset, other.dataset) && self.indices == other.indices
    }
}

/// Return the rows of `dataset` that pass every active filter in `spec`.
///
/// A row passes a column filter when:
/// * The column is not present in `spec` → passes (no constraint)
/// * The selected set for that column is empty → passes (no constraint)
/// * The row's value for that column is in the selected set → passes
///
/// Every field named in `spec` must exist in the dataset's schema.
pub fn apply_filters<'a>(
    dataset: &'a Dataset,
    spec: &FilterSpec,
) -> Result<FilteredView<'a>, PipelineError> {
    FilteredView::all(dataset).refine(spec)
}

/// Sidebar choices: the sorted unique values for each of `fields`.
pub fn filter_options(
    dataset: &Dataset,
    fields: &[String],
) -> Result<BTreeMap<String, Vec<Value>>, PipelineError> {
    fields
        .iter()
        .map(|field| {
            dataset.schema.require(field)?;
            let values = dataset
                .unique_values
                .get(field)
                .map(|vals| vals.iter().cloned().collect())
                .unwrap_or_default();
            Ok((field.clone(), values))
        })
        .collect()
}
