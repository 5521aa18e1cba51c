//! Typed cells, rows and query results.
//!
//! A [`Cell`] is a typed, possibly-null scalar. Typed accessors return
//! `Ok(None)` for a null cell and [`DataError::WrongTypeAccess`] when asked for
//! a type the cell does not hold, so callers check nullability explicitly
//! where the schema marks a column nullable.

use std::{cmp::Ordering, fmt};

use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use snafu::prelude::*;

use crate::schema::{ColumnDescription, ColumnType, TableDefinition};

/// Errors raised by row/schema checks and typed cell access.
#[derive(Debug, Clone, Snafu, PartialEq, Eq)]
#[snafu(visibility(pub(crate)))]
pub enum DataError {
    /// A row or key has the wrong number of cells.
    #[snafu(display("{what} has {actual} cells, expected {expected}"))]
    ArityMismatch {
        /// "row" or "key".
        what: &'static str,
        /// Number of cells required by the definition.
        expected: usize,
        /// Number of cells supplied.
        actual: usize,
    },

    /// A cell's type does not match its column.
    #[snafu(display("column '{column}' expects {expected}, got {actual}"))]
    CellTypeMismatch {
        /// Column name.
        column: String,
        /// Declared column type.
        expected: ColumnType,
        /// Type of the supplied cell.
        actual: ColumnType,
    },

    /// A null cell was supplied for a non-nullable column.
    #[snafu(display("column '{column}' is not nullable"))]
    NullNotAllowed {
        /// Column name.
        column: String,
    },

    /// A cell was read as a type it does not hold.
    #[snafu(display("cannot read {actual} cell as {requested}"))]
    WrongTypeAccess {
        /// Type the caller asked for.
        requested: ColumnType,
        /// Type the cell holds.
        actual: ColumnType,
    },
}

impl DataError {
    /// `true` for the wrong-type accessor failure, `false` for every
    /// row/schema mismatch.
    pub fn is_wrong_type_access(&self) -> bool {
        matches!(self, DataError::WrongTypeAccess { .. })
    }
}

/// A single typed, possibly-null value.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    /// Absent value; legal only in nullable columns.
    Null,
    /// UTF-8 text stored as raw bytes.
    Varchar(Bytes),
    /// Milliseconds since the Unix epoch.
    Timestamp(i64),
    /// 64-bit float.
    Double(f64),
    /// Signed 64-bit integer.
    Sint64(i64),
    /// Boolean.
    Boolean(bool),
    /// Raw bytes.
    Blob(Bytes),
}

macro_rules! typed_accessor {
    ($(#[$doc:meta])* $name:ident, $variant:ident, $column_type:expr, $out:ty, |$v:ident| $map:expr) => {
        $(#[$doc])*
        pub fn $name(&self) -> Result<Option<$out>, DataError> {
            match self {
                Cell::Null => Ok(None),
                Cell::$variant($v) => Ok(Some($map)),
                other => WrongTypeAccessSnafu {
                    requested: $column_type,
                    actual: other.column_type().unwrap_or($column_type),
                }
                .fail(),
            }
        }
    };
}

impl Cell {
    /// A varchar cell from text.
    pub fn varchar(value: impl Into<String>) -> Self {
        Cell::Varchar(Bytes::from(value.into()))
    }

    /// A timestamp cell from epoch milliseconds.
    pub fn timestamp(millis: i64) -> Self {
        Cell::Timestamp(millis)
    }

    /// A timestamp cell from a UTC datetime (truncated to milliseconds).
    pub fn timestamp_from(at: DateTime<Utc>) -> Self {
        Cell::Timestamp(at.timestamp_millis())
    }

    /// A double cell.
    pub fn double(value: f64) -> Self {
        Cell::Double(value)
    }

    /// A sint64 cell.
    pub fn sint64(value: i64) -> Self {
        Cell::Sint64(value)
    }

    /// A boolean cell.
    pub fn boolean(value: bool) -> Self {
        Cell::Boolean(value)
    }

    /// A blob cell.
    pub fn blob(value: impl Into<Bytes>) -> Self {
        Cell::Blob(value.into())
    }

    /// Whether the cell is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    /// The type tag of a non-null cell.
    pub fn column_type(&self) -> Option<ColumnType> {
        match self {
            Cell::Null => None,
            Cell::Varchar(_) => Some(ColumnType::Varchar),
            Cell::Timestamp(_) => Some(ColumnType::Timestamp),
            Cell::Double(_) => Some(ColumnType::Double),
            Cell::Sint64(_) => Some(ColumnType::Sint64),
            Cell::Boolean(_) => Some(ColumnType::Boolean),
            Cell::Blob(_) => Some(ColumnType::Blob),
        }
    }

    typed_accessor!(
        /// Raw bytes of a varchar cell.
        as_varchar, Varchar, ColumnType::Varchar, &[u8], |v| v.as_ref()
    );
    typed_accessor!(
        /// Epoch milliseconds of a timestamp cell.
        as_timestamp, Timestamp, ColumnType::Timestamp, i64, |v| *v
    );
    typed_accessor!(
        /// Value of a double cell.
        as_double, Double, ColumnType::Double, f64, |v| *v
    );
    typed_accessor!(
        /// Value of a sint64 cell.
        as_sint64, Sint64, ColumnType::Sint64, i64, |v| *v
    );
    typed_accessor!(
        /// Value of a boolean cell.
        as_boolean, Boolean, ColumnType::Boolean, bool, |v| *v
    );
    typed_accessor!(
        /// Bytes of a blob cell.
        as_blob, Blob, ColumnType::Blob, &[u8], |v| v.as_ref()
    );

    /// A varchar cell decoded as UTF-8. Invalid UTF-8 is replaced lossily.
    pub fn as_utf8(&self) -> Result<Option<String>, DataError> {
        Ok(self
            .as_varchar()?
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned()))
    }

    /// A timestamp cell as a UTC datetime.
    pub fn as_datetime(&self) -> Result<Option<DateTime<Utc>>, DataError> {
        Ok(self
            .as_timestamp()?
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single()))
    }
}

/// Cells of the same type compare by value (timestamps numerically); cells of
/// different types are unordered. Nulls compare equal to each other.
impl PartialOrd for Cell {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Cell::Null, Cell::Null) => Some(Ordering::Equal),
            (Cell::Varchar(a), Cell::Varchar(b)) | (Cell::Blob(a), Cell::Blob(b)) => {
                a.partial_cmp(b)
            }
            (Cell::Timestamp(a), Cell::Timestamp(b)) | (Cell::Sint64(a), Cell::Sint64(b)) => {
                a.partial_cmp(b)
            }
            (Cell::Double(a), Cell::Double(b)) => a.partial_cmp(b),
            (Cell::Boolean(a), Cell::Boolean(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Null => f.write_str("NULL"),
            Cell::Varchar(v) => write!(f, "'{}'", String::from_utf8_lossy(v)),
            Cell::Timestamp(v) | Cell::Sint64(v) => write!(f, "{v}"),
            Cell::Double(v) => write!(f, "{v}"),
            Cell::Boolean(v) => write!(f, "{v}"),
            Cell::Blob(v) => write!(f, "<{} bytes>", v.len()),
        }
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::varchar(value)
    }
}

impl From<String> for Cell {
    fn from(value: String) -> Self {
        Cell::varchar(value)
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Cell::Double(value)
    }
}

impl From<i64> for Cell {
    fn from(value: i64) -> Self {
        Cell::Sint64(value)
    }
}

impl From<bool> for Cell {
    fn from(value: bool) -> Self {
        Cell::Boolean(value)
    }
}

impl<T: Into<Cell>> From<Option<T>> for Cell {
    fn from(value: Option<T>) -> Self {
        value.map_or(Cell::Null, Into::into)
    }
}

/// An ordered, fixed-length sequence of cells.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    cells: Vec<Cell>,
}

impl Row {
    /// Build a row from cells.
    pub fn new(cells: Vec<Cell>) -> Self {
        Row { cells }
    }

    /// The cells in order.
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    /// Cell at `index`.
    pub fn get(&self, index: usize) -> Option<&Cell> {
        self.cells.get(index)
    }

    /// Number of cells.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Whether the row has no cells.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Iterate the cells.
    pub fn iter(&self) -> std::slice::Iter<'_, Cell> {
        self.cells.iter()
    }

    /// Take the cells.
    pub fn into_cells(self) -> Vec<Cell> {
        self.cells
    }

    /// A new row holding the cells at `indices`, in that order.
    pub fn project(&self, indices: &[usize]) -> Row {
        indices
            .iter()
            .map(|&i| self.cells.get(i).cloned().unwrap_or(Cell::Null))
            .collect()
    }
}

impl From<Vec<Cell>> for Row {
    fn from(cells: Vec<Cell>) -> Self {
        Row::new(cells)
    }
}

impl FromIterator<Cell> for Row {
    fn from_iter<I: IntoIterator<Item = Cell>>(iter: I) -> Self {
        Row::new(iter.into_iter().collect())
    }
}

impl IntoIterator for Row {
    type Item = Cell;
    type IntoIter = std::vec::IntoIter<Cell>;

    fn into_iter(self) -> Self::IntoIter {
        self.cells.into_iter()
    }
}

impl<'a> IntoIterator for &'a Row {
    type Item = &'a Cell;
    type IntoIter = std::slice::Iter<'a, Cell>;

    fn into_iter(self) -> Self::IntoIter {
        self.cells.iter()
    }
}

/// Rows plus the column descriptions that describe them.
///
/// Both are empty when nothing matched.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryResult {
    columns: Vec<ColumnDescription>,
    rows: Vec<Row>,
}

impl QueryResult {
    /// Build a result.
    pub fn new(columns: Vec<ColumnDescription>, rows: Vec<Row>) -> Self {
        QueryResult { columns, rows }
    }

    /// The result with no rows and no columns.
    pub fn empty() -> Self {
        QueryResult::default()
    }

    /// Column descriptions, in row order.
    pub fn column_descriptions(&self) -> &[ColumnDescription] {
        &self.columns
    }

    /// The rows.
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Number of rows.
    pub fn rows_count(&self) -> usize {
        self.rows.len()
    }

    /// Whether there are no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Iterate the rows.
    pub fn iter(&self) -> std::slice::Iter<'_, Row> {
        self.rows.iter()
    }

    /// Take the columns and rows.
    pub fn into_parts(self) -> (Vec<ColumnDescription>, Vec<Row>) {
        (self.columns, self.rows)
    }

    /// Render a table definition as a DESCRIBE result: one row per column
    /// with `Column`, `Type`, `Nullable`, `Partition Key`, `Local Key`,
    /// `Interval` and `Unit`.
    pub fn describe_table(definition: &TableDefinition) -> Self {
        let columns = vec![
            ColumnDescription::new("Column", ColumnType::Varchar, false),
            ColumnDescription::new("Type", ColumnType::Varchar, false),
            ColumnDescription::new("Nullable", ColumnType::Boolean, false),
            ColumnDescription::new("Partition Key", ColumnType::Sint64, true),
            ColumnDescription::new("Local Key", ColumnType::Sint64, true),
            ColumnDescription::new("Interval", ColumnType::Sint64, true),
            ColumnDescription::new("Unit", ColumnType::Varchar, true),
        ];

        let rows = definition
            .full_column_descriptions()
            .iter()
            .map(|c| {
                Row::new(vec![
                    Cell::varchar(c.name()),
                    Cell::varchar(c.column_type().to_string()),
                    Cell::boolean(c.is_nullable()),
                    c.partition_key_ordinal().map(i64::from).into(),
                    c.local_key_ordinal().map(i64::from).into(),
                    c.quantum().map(|q| i64::from(q.interval())).into(),
                    c.quantum().map(|q| q.unit().code().to_string()).into(),
                ])
            })
            .collect();

        QueryResult::new(columns, rows)
    }
}

impl IntoIterator for QueryResult {
    type Item = Row;
    type IntoIter = std::vec::IntoIter<Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

impl<'a> IntoIterator for &'a QueryResult {
    type Item = &'a Row;
    type IntoIter = std::slice::Iter<'a, Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

fn check_cell(column: &ColumnDescription, cell: &Cell) -> Result<(), DataError> {
    match cell.column_type() {
        None => ensure!(
            column.is_nullable(),
            NullNotAllowedSnafu {
                column: column.name()
            }
        ),
        Some(actual) => ensure!(
            actual == column.column_type(),
            CellTypeMismatchSnafu {
                column: column.name(),
                expected: column.column_type(),
                actual,
            }
        ),
    }
    Ok(())
}

/// Check a row against the full column order of `definition`: arity, per
/// position type, and nulls only in nullable columns.
pub fn matches(row: &Row, definition: &TableDefinition) -> Result<(), DataError> {
    let columns = definition.full_column_descriptions();
    ensure!(
        row.len() == columns.len(),
        ArityMismatchSnafu {
            what: "row",
            expected: columns.len(),
            actual: row.len(),
        }
    );
    columns
        .iter()
        .zip(row.iter())
        .try_for_each(|(column, cell)| check_cell(column.column(), cell))
}

/// Check key cells against the local key columns of `definition`, in key
/// order. Key cells are never null.
pub fn matches_key(key: &[Cell], definition: &TableDefinition) -> Result<(), DataError> {
    let columns = definition.local_key_columns();
    ensure!(
        key.len() == columns.len(),
        ArityMismatchSnafu {
            what: "key",
            expected: columns.len(),
            actual: key.len(),
        }
    );
    columns
        .iter()
        .zip(key)
        .try_for_each(|(column, cell)| check_cell(column.column(), cell))
}
