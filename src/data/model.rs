use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;

use super::error::PipelineError;

// ---------------------------------------------------------------------------
// Value – a single cell of the survey table
// ---------------------------------------------------------------------------

/// A dynamically-typed cell value mirroring common Pandas dtypes.
/// Grouping and filtering use `BTreeMap` / `BTreeSet`, so `Value` must be `Ord`.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Value {
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Null,
}

// -- Manual Eq/Ord so we can put Value in BTreeSet --
// Equality follows `Ord` (and `Hash`): NaN equals NaN, 0.0 and -0.0 differ.

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == std::cmp::Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        use Value::*;
        fn discriminant(v: &Value) -> u8 {
            match v {
                Null => 0,
                Bool(_) => 1,
                Integer(_) => 2,
                Float(_) => 3,
                String(_) => 4,
            }
        }
        let da = discriminant(self);
        let db = discriminant(other);
        if da != db {
            return da.cmp(&db);
        }
        match (self, other) {
            (Null, Null) => std::cmp::Ordering::Equal,
            (Bool(a), Bool(b)) => a.cmp(b),
            (Integer(a), Integer(b)) => a.cmp(b),
            (Float(a), Float(b)) => a.total_cmp(b),
            (String(a), String(b)) => a.cmp(b),
            _ => std::cmp::Ordering::Equal,
        }
    }
}

impl std::hash::Hash for Value {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::String(s) => s.hash(state),
            Value::Integer(i) => i.hash(state),
            Value::Float(f) => f.to_bits().hash(state),
            Value::Bool(b) => b.hash(state),
            Value::Null => {}
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{s}"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v:.4}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Null => write!(f, "<null>"),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl Value {
    /// Guess the type of a raw text cell: empty → Null, then integer, float,
    /// bool, and finally a verbatim string.
    ///
    /// Shared by the CSV loader and by filter parsing so a typed filter value
    /// matches the typed cell it was loaded as.
    pub fn parse_cell(s: &str) -> Value {
        if s.is_empty() {
            return Value::Null;
        }
        if let Ok(i) = s.parse::<i64>() {
            return Value::Integer(i);
        }
        if let Ok(f) = s.parse::<f64>() {
            return Value::Float(f);
        }
        if s == "true" || s == "false" {
            return Value::Bool(s == "true");
        }
        Value::String(s.to_string())
    }

    /// Interpret the value as an `f64` for numeric reducers and correlation.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Render the value as an export cell. Unlike `Display`, floats keep full
    /// precision and nulls become empty cells.
    pub fn to_cell(&self) -> String {
        match self {
            Value::String(s) => s.clone(),
            Value::Integer(i) => i.to_string(),
            Value::Float(v) => v.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Null => String::new(),
        }
    }

    /// Convert a numeric value to the representation used by a column of
    /// `kind`: integers widen to floats in Float columns, integral floats
    /// narrow to integers in Integer columns. Anything else is unchanged.
    pub fn coerce_to(self, kind: FieldKind) -> Value {
        match (kind, self) {
            (FieldKind::Float, Value::Integer(i)) => Value::Float(i as f64),
            (FieldKind::Integer, Value::Float(f))
                if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 =>
            {
                Value::Integer(f as i64)
            }
            (_, other) => other,
        }
    }

    fn kind(&self) -> FieldKind {
        match self {
            Value::String(_) => FieldKind::Text,
            Value::Integer(_) => FieldKind::Integer,
            Value::Float(_) => FieldKind::Float,
            Value::Bool(_) => FieldKind::Bool,
            Value::Null => FieldKind::Empty,
        }
    }
}

// ---------------------------------------------------------------------------
// Schema – declared column types
// ---------------------------------------------------------------------------

/// Declared type of a column, inferred from its non-null values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    Integer,
    Float,
    Bool,
    /// Every value in the column is null.
    Empty,
}

impl FieldKind {
    /// Whether numeric reducers (sum) and correlation accept this column.
    pub fn is_numeric(self) -> bool {
        matches!(self, FieldKind::Integer | FieldKind::Float | FieldKind::Empty)
    }

    /// Widen `self` so it also covers `other`.
    fn unify(self, other: FieldKind) -> FieldKind {
        use FieldKind::*;
        match (self, other) {
            (Empty, k) | (k, Empty) => k,
            (a, b) if a == b => a,
            (Integer, Float) | (Float, Integer) => Float,
            _ => Text,
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldKind::Text => "text",
            FieldKind::Integer => "integer",
            FieldKind::Float => "float",
            FieldKind::Bool => "bool",
            FieldKind::Empty => "empty",
        };
        f.write_str(name)
    }
}

/// Column name → kind, in column order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Schema {
    fields: Vec<(String, FieldKind)>,
}

impl Schema {
    pub fn kind_of(&self, field: &str) -> Option<FieldKind> {
        self.fields
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, kind)| *kind)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.kind_of(field).is_some()
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    /// Look up a field, failing with [`PipelineError::UnknownField`] when the
    /// (case-sensitive) name is not part of the schema.
    pub fn require(&self, field: &str) -> Result<FieldKind, PipelineError> {
        self.kind_of(field)
            .ok_or_else(|| PipelineError::unknown_field(field, self))
    }
}

// ---------------------------------------------------------------------------
// Row – one survey response
// ---------------------------------------------------------------------------

static NULL: Value = Value::Null;

/// A single response (one row of the source DataFrame).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    /// Dynamic columns: column_name → value.
    pub values: BTreeMap<String, Value>,
}

impl Row {
    /// Value of `field`, or `Null` when the row does not carry that column.
    pub fn get(&self, field: &str) -> &Value {
        self.values.get(field).unwrap_or(&NULL)
    }
}

impl<K, V> FromIterator<(K, V)> for Row
where
    K: Into<String>,
    V: Into<Value>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Row {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Dataset – the complete loaded table
// ---------------------------------------------------------------------------

/// The full parsed dataset with pre-computed schema and column indices.
///
/// Immutable once built; every pipeline step borrows it.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    /// All responses (rows).
    pub rows: Vec<Row>,
    /// Column names in header order.
    pub columns: Vec<String>,
    /// Inferred kind per column.
    pub schema: Schema,
    /// For each column the sorted set of unique values.
    pub unique_values: BTreeMap<String, BTreeSet<Value>>,
}

impl Dataset {
    /// Build schema and column indices for `rows` with an explicit header.
    ///
    /// Columns that appear in rows but not in `columns` are appended in
    /// first-seen order.
    ///
    /// Integer cells of a column widened to Float are stored as Float, so one
    /// number has one representation per column.
    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        let mut columns = columns;
        let mut rows = rows;
        let mut known: BTreeSet<String> = columns.iter().cloned().collect();
        let mut kinds: BTreeMap<String, FieldKind> = BTreeMap::new();
        let mut unique_values: BTreeMap<String, BTreeSet<Value>> = BTreeMap::new();

        for row in &rows {
            for (col, val) in &row.values {
                if known.insert(col.clone()) {
                    columns.push(col.clone());
                }
                let kind = kinds.entry(col.clone()).or_insert(FieldKind::Empty);
                *kind = kind.unify(val.kind());
            }
        }

        for row in &mut rows {
            for (col, val) in row.values.iter_mut() {
                if kinds.get(col) == Some(&FieldKind::Float) {
                    if let Value::Integer(i) = *val {
                        *val = Value::Float(i as f64);
                    }
                }
                unique_values
                    .entry(col.clone())
                    .or_default()
                    .insert(val.clone());
            }
        }

        // A row that lacks a column reads as Null there.
        for col in &columns {
            if rows.iter().any(|row| !row.values.contains_key(col)) {
                unique_values.entry(col.clone()).or_default().insert(Value::Null);
            }
        }

        let schema = Schema {
            fields: columns
                .iter()
                .map(|c| (c.clone(), kinds.get(c).copied().unwrap_or(FieldKind::Empty)))
                .collect(),
        };

        Dataset {
            rows,
            columns,
            schema,
            unique_values,
        }
    }

    /// Build a dataset whose column order is the first-seen order across rows.
    pub fn from_rows(rows: Vec<Row>) -> Self {
        Self::new(Vec::new(), rows)
    }

    /// Number of responses.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the dataset is empty.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
