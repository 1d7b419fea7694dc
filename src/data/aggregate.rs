use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::PipelineError;
use super::filter::FilteredView;
use super::model::{FieldKind, Value};

// ---------------------------------------------------------------------------
// Reducer
// ---------------------------------------------------------------------------

/// Per-group reduction applied to the target field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reducer {
    /// Group size.
    Count,
    /// Sum of the non-null values; numeric targets only.
    Sum,
    /// Number of distinct non-null values.
    DistinctCount,
}

impl Reducer {
    /// Check the reducer against the target's declared kind before running it.
    fn validate(self, field: &str, kind: FieldKind) -> Result<(), PipelineError> {
        match self {
            Reducer::Sum if !kind.is_numeric() => Err(PipelineError::InvalidReducer {
                reducer: self,
                field: field.to_string(),
                kind,
            }),
            _ => Ok(()),
        }
    }

    /// Header of the value column when the result is exported.
    pub fn output_column(self, target: &str) -> String {
        match self {
            Reducer::Count => "count".to_string(),
            Reducer::Sum => target.to_string(),
            Reducer::DistinctCount => format!("{target}_distinct"),
        }
    }
}

impl fmt::Display for Reducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Reducer::Count => "count",
            Reducer::Sum => "sum",
            Reducer::DistinctCount => "distinct_count",
        };
        f.write_str(name)
    }
}

impl FromStr for Reducer {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "count" => Ok(Reducer::Count),
            "sum" => Ok(Reducer::Sum),
            "distinct_count" | "nunique" => Ok(Reducer::DistinctCount),
            other => Err(format!("unknown reducer '{other}'")),
        }
    }
}

/// Order of groups in an [`AggregationResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupOrder {
    /// Key tuples ascending, field by field.
    #[default]
    Sorted,
    /// Order in which each group first appears in the view.
    FirstSeen,
}

// ---------------------------------------------------------------------------
// Request / result
// ---------------------------------------------------------------------------

/// A fully specified aggregation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateRequest {
    pub group_by: Vec<String>,
    pub target: String,
    pub reducer: Reducer,
    #[serde(default)]
    pub order: GroupOrder,
}

impl AggregateRequest {
    pub fn new(group_by: &[&str], target: &str, reducer: Reducer) -> Self {
        AggregateRequest {
            group_by: group_by.iter().map(|f| f.to_string()).collect(),
            target: target.to_string(),
            reducer,
            order: GroupOrder::Sorted,
        }
    }

    pub fn with_order(mut self, order: GroupOrder) -> Self {
        self.order = order;
        self
    }
}

/// One group: its key tuple (one value per group field) and reduced value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Group {
    pub key: Vec<Value>,
    pub value: Value,
}

/// Grouped summary over a [`FilteredView`]. Keys are unique.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregationResult {
    pub group_by: Vec<String>,
    pub target: String,
    pub reducer: Reducer,
    pub groups: Vec<Group>,
}

impl AggregationResult {
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// `(key, value)` pairs in result order.
    pub fn pairs(&self) -> impl Iterator<Item = (&[Value], &Value)> {
        self.groups.iter().map(|g| (g.key.as_slice(), &g.value))
    }

    /// Reorder by aggregate value descending, ties by key ascending.
    pub fn sort_by_value_desc(&mut self) {
        self.groups
            .sort_by(|a, b| b.value.cmp(&a.value).then_with(|| a.key.cmp(&b.key)));
    }
}

// ---------------------------------------------------------------------------
// Accumulators
// ---------------------------------------------------------------------------

enum Accumulator {
    Count(i64),
    IntSum(i64),
    FloatSum(f64),
    Distinct(HashSet<Value>),
}

impl Accumulator {
    fn new(reducer: Reducer, kind: FieldKind) -> Self {
        match (reducer, kind) {
            (Reducer::Count, _) => Accumulator::Count(0),
            (Reducer::Sum, FieldKind::Float) => Accumulator::FloatSum(0.0),
            (Reducer::Sum, _) => Accumulator::IntSum(0),
            (Reducer::DistinctCount, _) => Accumulator::Distinct(HashSet::new()),
        }
    }

    fn add(&mut self, value: &Value) {
        match self {
            Accumulator::Count(n) => *n += 1,
            Accumulator::IntSum(sum) => {
                if let Value::Integer(i) = value {
                    *sum = sum.saturating_add(*i);
                }
            }
            Accumulator::FloatSum(sum) => {
                if let Some(v) = value.as_f64() {
                    *sum += v;
                }
            }
            Accumulator::Distinct(seen) => {
                if !value.is_null() {
                    seen.insert(value.clone());
                }
            }
        }
    }

    fn finish(self) -> Value {
        match self {
            Accumulator::Count(n) | Accumulator::IntSum(n) => Value::Integer(n),
            Accumulator::FloatSum(v) => Value::Float(v),
            Accumulator::Distinct(seen) => Value::Integer(seen.len() as i64),
        }
    }
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// Group `view` by `group_by` and reduce `target` per group, sorted by key.
pub fn aggregate(
    view: &FilteredView<'_>,
    group_by: &[&str],
    target: &str,
    reducer: Reducer,
) -> Result<AggregationResult, PipelineError> {
    aggregate_with(view, &AggregateRequest::new(group_by, target, reducer))
}

/// Run a full [`AggregateRequest`] against `view`.
///
/// Every field is validated, and the reducer is checked against the target's
/// kind, before any row is touched.
pub fn aggregate_with(
    view: &FilteredView<'_>,
    request: &AggregateRequest,
) -> Result<AggregationResult, PipelineError> {
    if request.group_by.is_empty() {
        return Err(PipelineError::NoGroupFields);
    }
    let schema = view.schema();
    for field in &request.group_by {
        schema.require(field)?;
    }
    let kind = schema.require(&request.target)?;
    request.reducer.validate(&request.target, kind)?;

    let mut slots: HashMap<Vec<Value>, usize> = HashMap::new();
    let mut keys: Vec<Vec<Value>> = Vec::new();
    let mut accs: Vec<Accumulator> = Vec::new();

    for row in view.rows() {
        let key: Vec<Value> = request
            .group_by
            .iter()
            .map(|f| row.get(f).clone())
            .collect();
        let slot = match slots.get(&key) {
            Some(&slot) => slot,
            None => {
                slots.insert(key.clone(), keys.len());
                keys.push(key);
                accs.push(Accumulator::new(request.reducer, kind));
                keys.len() - 1
            }
        };
        accs[slot].add(row.get(&request.target));
    }

    let mut groups: Vec<Group> = keys
        .into_iter()
        .zip(accs)
        .map(|(key, acc)| Group {
            key,
            value: acc.finish(),
        })
        .collect();
    if request.order == GroupOrder::Sorted {
        groups.sort_by(|a, b| a.key.cmp(&b.key));
    }

    log::debug!(
        "{} of '{}' by {:?}: {} rows → {} groups",
        request.reducer,
        request.target,
        request.group_by,
        view.len(),
        groups.len()
    );

    Ok(AggregationResult {
        group_by: request.group_by.clone(),
        target: request.target.clone(),
        reducer: request.reducer,
        groups,
    })
}

/// Frequency of each value of `field`, most frequent first.
pub fn value_counts(
    view: &FilteredView<'_>,
    field: &str,
) -> Result<AggregationResult, PipelineError> {
    let mut result = aggregate(view, &[field], field, Reducer::Count)?;
    result.sort_by_value_desc();
    Ok(result)
}

// ---------------------------------------------------------------------------
// Crosstab
// ---------------------------------------------------------------------------

/// Row counts per (row value, column value) combination.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrossTab {
    pub row_field: String,
    pub column_field: String,
    /// Distinct values of the column field, sorted.
    pub columns: Vec<Value>,
    /// Per distinct row value (sorted): one count per entry of `columns`.
    pub rows: Vec<(Value, Vec<i64>)>,
}

/// Count rows of `view` by `row_field` × `column_field`; absent combinations are 0.
pub fn crosstab(
    view: &FilteredView<'_>,
    row_field: &str,
    column_field: &str,
) -> Result<CrossTab, PipelineError> {
    let counts = aggregate(view, &[row_field, column_field], row_field, Reducer::Count)?;

    let columns: Vec<Value> = counts
        .groups
        .iter()
        .map(|g| g.key[1].clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let position: BTreeMap<&Value, usize> =
        columns.iter().enumerate().map(|(i, v)| (v, i)).collect();

    let mut rows: Vec<(Value, Vec<i64>)> = Vec::new();
    for group in &counts.groups {
        let row_value = &group.key[0];
        if rows.last().map(|(v, _)| v) != Some(row_value) {
            rows.push((row_value.clone(), vec![0; columns.len()]));
        }
        let n = match group.value {
            Value::Integer(n) => n,
            _ => 0,
        };
        if let (Some((_, cells)), Some(&col)) = (rows.last_mut(), position.get(&group.key[1])) {
            cells[col] = n;
        }
    }

    Ok(CrossTab {
        row_field: row_field.to_string(),
        column_field: column_field.to_string(),
        columns,
        rows,
    })
}

// ---------------------------------------------------------------------------
// Correlation
// ---------------------------------------------------------------------------

/// Paired numeric observations and their Pearson coefficient.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Correlation {
    pub x_field: String,
    pub y_field: String,
    pub points: Vec<(f64, f64)>,
    /// `None` with fewer than two points or zero variance on either axis.
    pub pearson: Option<f64>,
}

/// Scatter points of `x` against `y` and their correlation.
/// Rows with a null on either axis are skipped.
pub fn correlation(
    view: &FilteredView<'_>,
    x: &str,
    y: &str,
) -> Result<Correlation, PipelineError> {
    let schema = view.schema();
    for field in [x, y] {
        let kind = schema.require(field)?;
        if !kind.is_numeric() {
            return Err(PipelineError::NotNumeric {
                field: field.to_string(),
                kind,
            });
        }
    }

    let points: Vec<(f64, f64)> = view
        .rows()
        .filter_map(|row| Some((row.get(x).as_f64()?, row.get(y).as_f64()?)))
        .collect();

    Ok(Correlation {
        x_field: x.to_string(),
        y_field: y.to_string(),
        pearson: pearson(&points),
        points,
    })
}

fn pearson(points: &[(f64, f64)]) -> Option<f64> {
    if points.len() < 2 {
        return None;
    }
    let n = points.len() as f64;
    let mean_x = points.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = points.iter().map(|p| p.1).sum::<f64>() / n;
    let (mut cov, mut var_x, mut var_y) = (0.0, 0.0, 0.0);
    for &(px, py) in points {
        let (dx, dy) = (px - mean_x, py - mean_y);
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }
    if var_x == 0.0 || var_y == 0.0 {
        return None;
    }
    Some(cov / (var_x.sqrt() * var_y.sqrt()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::filter::{apply_filters, FilterSpec};
    use crate::data::model::{Dataset, Row};

    fn respondent(tools: &str, industry: &str, experience: &str, score: Value) -> Row {
        let mut row: Row = [
            ("tools", tools),
            ("industry", industry),
            ("experience", experience),
        ]
        .into_iter()
        .collect();
        row.values.insert("satisfaction_numeric".into(), score);
        row
    }

    fn survey() -> Dataset {
        Dataset::from_rows(vec![
            respondent("Excel", "Finance", "0-1 years", Value::Integer(4)),
            respondent("SQL", "Finance", "1-3 years", Value::Integer(5)),
            respondent("Excel", "Tech", "1-3 years", Value::Integer(3)),
            respondent("Python", "Tech", "1-3 years", Value::Null),
            respondent("Excel", "Tech", "3-5 years", Value::Integer(2)),
        ])
    }

    fn keys(result: &AggregationResult) -> Vec<Vec<String>> {
        result
            .groups
            .iter()
            .map(|g| g.key.iter().map(Value::to_cell).collect())
            .collect()
    }

    #[test]
    fn worked_example_counts_industries_of_excel_users() {
        let ds = Dataset::from_rows(vec![
            [("tools", "Excel"), ("industry", "Finance")].into_iter().collect(),
            [("tools", "SQL"), ("industry", "Finance")].into_iter().collect(),
            [("tools", "Excel"), ("industry", "Tech")].into_iter().collect(),
        ]);
        let view = apply_filters(&ds, &FilterSpec::new().select("tools", ["Excel"])).unwrap();
        assert_eq!(view.len(), 2);
        let result = aggregate(&view, &["industry"], "tools", Reducer::Count).unwrap();
        let pairs: Vec<(Vec<Value>, Value)> = result
            .pairs()
            .map(|(k, v)| (k.to_vec(), v.clone()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                (vec![Value::from("Finance")], Value::Integer(1)),
                (vec![Value::from("Tech")], Value::Integer(1)),
            ]
        );
    }

    #[test]
    fn multi_field_groups_sort_lexicographically() {
        let ds = survey();
        let view = FilteredView::all(&ds);
        let result = aggregate(&view, &["industry", "experience"], "tools", Reducer::Count).unwrap();
        assert_eq!(
            keys(&result),
            vec![
                vec!["Finance", "0-1 years"],
                vec!["Finance", "1-3 years"],
                vec!["Tech", "1-3 years"],
                vec!["Tech", "3-5 years"],
            ]
        );
        assert_eq!(result.groups[2].value, Value::Integer(2));
    }

    #[test]
    fn first_seen_order_on_request() {
        let ds = survey();
        let view = FilteredView::all(&ds);
        let request = AggregateRequest::new(&["tools"], "tools", Reducer::Count)
            .with_order(GroupOrder::FirstSeen);
        let result = aggregate_with(&view, &request).unwrap();
        assert_eq!(keys(&result), vec![vec!["Excel"], vec!["SQL"], vec!["Python"]]);
    }

    #[test]
    fn sum_skips_nulls_and_keeps_integer_kind() {
        let ds = survey();
        let view = FilteredView::all(&ds);
        let result = aggregate(&view, &["industry"], "satisfaction_numeric", Reducer::Sum).unwrap();
        assert_eq!(result.groups[0].value, Value::Integer(9));
        assert_eq!(result.groups[1].value, Value::Integer(5));
    }

    #[test]
    fn sum_over_float_column_is_float() {
        let ds = Dataset::from_rows(vec![
            [("tools", Value::from("Excel")), ("hours", Value::Integer(1))].into_iter().collect(),
            [("tools", Value::from("Excel")), ("hours", Value::Float(2.5))].into_iter().collect(),
            [("tools", Value::from("SQL")), ("hours", Value::Float(0.25))].into_iter().collect(),
        ]);
        let result = aggregate(&FilteredView::all(&ds), &["tools"], "hours", Reducer::Sum).unwrap();
        assert_eq!(result.groups[0].value, Value::Float(3.5));
        assert_eq!(result.groups[1].value, Value::Float(0.25));
    }

    #[test]
    fn sum_over_all_null_column_is_zero() {
        let ds = Dataset::from_rows(vec![
            [("tools", Value::from("Excel")), ("score", Value::Null)].into_iter().collect(),
            [("tools", Value::from("Excel")), ("score", Value::Null)].into_iter().collect(),
        ]);
        assert_eq!(ds.schema.kind_of("score"), Some(FieldKind::Empty));
        let result = aggregate(&FilteredView::all(&ds), &["tools"], "score", Reducer::Sum).unwrap();
        assert_eq!(result.groups[0].value, Value::Integer(0));
    }

    #[test]
    fn integer_sum_saturates() {
        let ds = Dataset::from_rows(vec![
            [("tools", Value::from("Excel")), ("n", Value::Integer(i64::MAX))].into_iter().collect(),
            [("tools", Value::from("Excel")), ("n", Value::Integer(i64::MAX))].into_iter().collect(),
        ]);
        let result = aggregate(&FilteredView::all(&ds), &["tools"], "n", Reducer::Sum).unwrap();
        assert_eq!(result.groups[0].value, Value::Integer(i64::MAX));
    }

    #[test]
    fn nan_keys_form_one_group() {
        let ds = crate::data::loader::read_csv(csv::Reader::from_reader(
            "score,tools\nNaN,Excel\nNaN,SQL\nNaN,Excel\n".as_bytes(),
        ))
        .unwrap();
        let view = FilteredView::all(&ds);
        let counts = aggregate(&view, &["score"], "tools", Reducer::Count).unwrap();
        assert_eq!(counts.len(), 1);
        assert_eq!(counts.groups[0].value, Value::Integer(3));

        let distinct = aggregate(&view, &["tools"], "score", Reducer::DistinctCount).unwrap();
        assert_eq!(distinct.groups[0].key, vec![Value::from("Excel")]);
        assert_eq!(distinct.groups[0].value, Value::Integer(1));
    }

    #[test]
    fn mixed_integer_and_float_keys_do_not_duplicate() {
        let ds = crate::data::loader::read_csv(csv::Reader::from_reader(
            "s\n4\n4.0\n4.5\n".as_bytes(),
        ))
        .unwrap();
        let result = aggregate(&FilteredView::all(&ds), &["s"], "s", Reducer::Count).unwrap();
        assert_eq!(
            keys(&result),
            vec![vec!["4".to_string()], vec!["4.5".to_string()]]
        );
        assert_eq!(result.groups[0].value, Value::Integer(2));
    }

    #[test]
    fn summing_a_categorical_field_is_rejected() {
        let ds = survey();
        let view = FilteredView::all(&ds);
        let err = aggregate(&view, &["tools"], "industry", Reducer::Sum).unwrap_err();
        assert_eq!(
            err,
            PipelineError::InvalidReducer {
                reducer: Reducer::Sum,
                field: "industry".into(),
                kind: FieldKind::Text,
            }
        );
    }

    #[test]
    fn distinct_count_ignores_nulls() {
        let ds = survey();
        let view = FilteredView::all(&ds);
        let result =
            aggregate(&view, &["industry"], "satisfaction_numeric", Reducer::DistinctCount).unwrap();
        assert_eq!(result.groups[1].key, vec![Value::from("Tech")]);
        assert_eq!(result.groups[1].value, Value::Integer(2));
    }

    #[test]
    fn unknown_and_missing_fields_fail() {
        let ds = survey();
        let view = FilteredView::all(&ds);
        assert_eq!(
            aggregate(&view, &[], "tools", Reducer::Count),
            Err(PipelineError::NoGroupFields)
        );
        assert!(matches!(
            aggregate(&view, &["Industry"], "tools", Reducer::Count),
            Err(PipelineError::UnknownField { .. })
        ));
        assert!(matches!(
            aggregate(&view, &["industry"], "job_ease", Reducer::Count),
            Err(PipelineError::UnknownField { .. })
        ));
    }

    #[test]
    fn empty_view_gives_empty_result() {
        let ds = survey();
        let view = apply_filters(&ds, &FilterSpec::new().select("tools", ["Tableau"])).unwrap();
        let result = aggregate(&view, &["tools"], "tools", Reducer::Count).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn value_counts_most_frequent_first() {
        let ds = survey();
        let view = FilteredView::all(&ds);
        let result = value_counts(&view, "experience").unwrap();
        assert_eq!(
            keys(&result),
            vec![vec!["1-3 years"], vec!["0-1 years"], vec!["3-5 years"]]
        );
        assert_eq!(result.groups[0].value, Value::Integer(3));
    }

    #[test]
    fn crosstab_fills_missing_combinations_with_zero() {
        let ds = survey();
        let view = FilteredView::all(&ds);
        let table = crosstab(&view, "industry", "tools").unwrap();
        assert_eq!(
            table.columns,
            vec![Value::from("Excel"), Value::from("Python"), Value::from("SQL")]
        );
        assert_eq!(
            table.rows,
            vec![
                (Value::from("Finance"), vec![1, 0, 1]),
                (Value::from("Tech"), vec![2, 1, 0]),
            ]
        );
    }

    #[test]
    fn correlation_skips_nulls() {
        let ds = Dataset::from_rows(vec![
            [("s", Value::Integer(1)), ("m", Value::Integer(2))].into_iter().collect(),
            [("s", Value::Integer(2)), ("m", Value::Integer(4))].into_iter().collect(),
            [("s", Value::Integer(3)), ("m", Value::Integer(6))].into_iter().collect(),
            [("s", Value::Null), ("m", Value::Integer(1))].into_iter().collect(),
        ]);
        let view = FilteredView::all(&ds);
        let corr = correlation(&view, "s", "m").unwrap();
        assert_eq!(corr.points.len(), 3);
        let r = corr.pearson.unwrap();
        assert!((r - 1.0).abs() < 1e-12);
    }

    #[test]
    fn correlation_rejects_text_fields_and_degenerate_input() {
        let ds = survey();
        let view = FilteredView::all(&ds);
        assert!(matches!(
            correlation(&view, "tools", "satisfaction_numeric"),
            Err(PipelineError::NotNumeric { .. })
        ));
        let single = view.head(1);
        let corr = correlation(&single, "satisfaction_numeric", "satisfaction_numeric").unwrap();
        assert_eq!(corr.pearson, None);
    }

    #[test]
    fn reducer_parses_from_str() {
        assert_eq!("sum".parse::<Reducer>(), Ok(Reducer::Sum));
        assert_eq!("nunique".parse::<Reducer>(), Ok(Reducer::DistinctCount));
        assert!("mean".parse::<Reducer>().is_err());
    }
}
