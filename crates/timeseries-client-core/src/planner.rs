//! Quantum range planning.
//!
//! A query's time interval is half-open, `[start, end)`. Rows are physically
//! partitioned by quantum, so the interval is cut at every quantum boundary
//! and each piece becomes one sub-request:
//!
//! - quantum boundaries are `origin + k * width` for integer `k`;
//! - the first piece starts at `start`, the last ends at `end`, and every
//!   piece lies inside exactly one quantum;
//! - pieces are emitted in increasing time order, so concatenating their
//!   results in emission order yields time-ordered rows.
//!
//! An interval of `N` quanta yields `N` sub-requests; an empty interval
//! yields none.

use std::fmt;

use snafu::prelude::*;

use crate::{
    config::ClientConfig,
    data::{QueryResult, Row},
    error::ErrorKind,
    predicate::{self, Predicate, PredicateError, Projection, Select, SplitPredicate},
    schema::{self, ColumnDescription, SchemaError, TableDefinition},
};

/// Errors raised while planning a query.
#[derive(Debug, Clone, Snafu, PartialEq, Eq)]
#[snafu(visibility(pub(crate)))]
pub enum PlanError {
    /// The predicate's time bounds could not be extracted.
    #[snafu(display("unparsable predicate: {source}"))]
    Predicate {
        /// Underlying parse/extraction failure.
        source: PredicateError,
    },

    /// The table definition cannot be planned against.
    #[snafu(display("invalid table definition: {source}"))]
    Schema {
        /// Underlying schema failure.
        source: SchemaError,
    },

    /// The query names a column the table does not have.
    #[snafu(display("unknown column '{column}' in table '{table}'"))]
    UnknownColumn {
        /// Table the query addresses.
        table: String,
        /// The missing column.
        column: String,
    },

    /// The interval spans more quanta than a single query may fan out to.
    #[snafu(display("query spans {count} quanta, more than the allowed {max_quanta}"))]
    TooManyQuanta {
        /// Quanta the interval covers.
        count: u64,
        /// Configured limit.
        max_quanta: usize,
    },

    /// The quantum width is not positive.
    #[snafu(display("quantum width must be positive, got {width} ms"))]
    NonPositiveWidth {
        /// The offending width in milliseconds.
        width: i64,
    },
}

impl PlanError {
    /// The failure category reported to the caller.
    pub fn kind(&self) -> ErrorKind {
        match self {
            PlanError::Predicate { .. } | PlanError::TooManyQuanta { .. } => {
                ErrorKind::UnparsablePredicate
            }
            PlanError::Schema { .. }
            | PlanError::UnknownColumn { .. }
            | PlanError::NonPositiveWidth { .. } => ErrorKind::Schema,
        }
    }
}

/// A half-open interval of epoch milliseconds, `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeRange {
    start: i64,
    end: i64,
}

impl TimeRange {
    /// Build `[start, end)`. An interval with `start >= end` is empty.
    pub fn new(start: i64, end: i64) -> Self {
        TimeRange { start, end }
    }

    /// Inclusive lower bound.
    pub fn start(&self) -> i64 {
        self.start
    }

    /// Exclusive upper bound.
    pub fn end(&self) -> i64 {
        self.end
    }

    /// Whether no timestamp falls in the interval.
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// Whether `t` falls in the interval.
    pub fn contains(&self, t: i64) -> bool {
        self.start <= t && t < self.end
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

fn floor_to_quantum(t: i64, width: i64, origin: i64) -> i128 {
    let offset = i128::from(t) - i128::from(origin);
    i128::from(origin) + offset.div_euclid(i128::from(width)) * i128::from(width)
}

/// Start of the quantum containing `t`, for quanta of `width` milliseconds
/// aligned to `origin`.
///
/// Uses Euclidean division, so timestamps before `origin` land in the
/// quantum below it rather than rounding toward it.
pub fn quantum_start(t: i64, width: i64, origin: i64) -> i64 {
    debug_assert!(width > 0, "quantum width must be positive");
    let start = floor_to_quantum(t, width, origin);
    i64::try_from(start).unwrap_or(i64::MIN)
}

/// Cut `range` at every quantum boundary.
///
/// # Errors
/// [`PlanError::NonPositiveWidth`] for a zero or negative width, and
/// [`PlanError::TooManyQuanta`] when the interval covers more than
/// `max_quanta` quanta.
pub fn split_by_quantum(
    range: TimeRange,
    width: i64,
    origin: i64,
    max_quanta: usize,
) -> Result<Vec<TimeRange>, PlanError> {
    ensure!(width > 0, NonPositiveWidthSnafu { width });
    if range.is_empty() {
        return Ok(Vec::new());
    }

    // `end > start`, so `end - 1` cannot underflow.
    let first = floor_to_quantum(range.start, width, origin);
    let last = floor_to_quantum(range.end - 1, width, origin);
    let count = (last - first) / i128::from(width) + 1;
    ensure!(
        count <= max_quanta as i128,
        TooManyQuantaSnafu {
            count: u64::try_from(count).unwrap_or(u64::MAX),
            max_quanta,
        }
    );

    let mut pieces = Vec::with_capacity(count as usize);
    let mut lo = range.start;
    while lo < range.end {
        let boundary = floor_to_quantum(lo, width, origin) + i128::from(width);
        let hi = if boundary < i128::from(range.end) {
            boundary as i64
        } else {
            range.end
        };
        pieces.push(TimeRange::new(lo, hi));
        lo = hi;
    }
    Ok(pieces)
}

/// One quantum-scoped query sub-request.
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySpec {
    /// Columns to return, in order.
    pub projection: Vec<String>,
    /// The table's quantum column.
    pub time_column: String,
    /// Time bounds of this piece; `None` for an unbounded query.
    pub range: Option<TimeRange>,
    /// Conditions other than the time bounds, as query text.
    pub residual: Option<String>,
}

impl QuerySpec {
    /// The full WHERE clause this sub-request evaluates, or `None` when it
    /// selects every row.
    pub fn where_clause(&self) -> Option<String> {
        let mut terms = Vec::new();
        if let Some(range) = &self.range {
            terms.push(format!(
                "{col} >= {} AND {col} < {}",
                range.start,
                range.end,
                col = self.time_column
            ));
        }
        if let Some(residual) = &self.residual {
            terms.push(format!("({residual})"));
        }
        (!terms.is_empty()).then(|| terms.join(" AND "))
    }
}

/// The sub-requests for one query, in quantum order, and how to assemble
/// their results.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    table: String,
    columns: Vec<ColumnDescription>,
    time_index: Option<usize>,
    sub_queries: Vec<QuerySpec>,
}

impl QueryPlan {
    /// Table the query addresses.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Output columns, in projection order.
    pub fn columns(&self) -> &[ColumnDescription] {
        &self.columns
    }

    /// Sub-requests in increasing time order.
    pub fn sub_queries(&self) -> &[QuerySpec] {
        &self.sub_queries
    }

    /// Number of sub-requests.
    pub fn len(&self) -> usize {
        self.sub_queries.len()
    }

    /// Whether the plan dispatches nothing.
    pub fn is_empty(&self) -> bool {
        self.sub_queries.is_empty()
    }

    /// Concatenate sub-request results in plan order.
    ///
    /// `parts[i]` must be the result of `sub_queries()[i]`. When the time
    /// column is projected, rows outside their sub-request's interval are
    /// dropped so the overall bounds hold even against a store that returns
    /// the whole quantum. No deduplication happens: pieces are disjoint.
    pub fn merge(&self, parts: Vec<QueryResult>) -> QueryResult {
        debug_assert_eq!(parts.len(), self.sub_queries.len());
        let mut rows: Vec<Row> = Vec::new();
        for (spec, part) in self.sub_queries.iter().zip(parts) {
            let (_, part_rows) = part.into_parts();
            match (spec.range, self.time_index) {
                (Some(range), Some(index)) => rows.extend(part_rows.into_iter().filter(|row| {
                    row.get(index)
                        .and_then(|cell| cell.as_timestamp().ok().flatten())
                        .is_some_and(|t| range.contains(t))
                })),
                _ => rows.extend(part_rows),
            }
        }

        if rows.is_empty() {
            QueryResult::empty()
        } else {
            QueryResult::new(self.columns.clone(), rows)
        }
    }
}

/// Plan `select` against `definition`.
///
/// Resolves the projection, extracts the time interval from the WHERE
/// clause and cuts it into per-quantum sub-requests. A query without time
/// bounds becomes a single unbounded sub-request; one with an empty interval
/// becomes none.
pub fn plan_query(
    definition: &TableDefinition,
    select: &Select,
    config: &ClientConfig,
) -> Result<QueryPlan, PlanError> {
    let table = definition.name();
    let all_columns = definition.column_descriptions();

    let indices: Vec<usize> = match &select.projection {
        Projection::All => (0..all_columns.len()).collect(),
        Projection::Columns(names) => names
            .iter()
            .map(|name| {
                definition
                    .index_of(name)
                    .context(UnknownColumnSnafu { table, column: name })
            })
            .collect::<Result<_, _>>()?,
    };
    let columns: Vec<ColumnDescription> =
        indices.iter().map(|&i| all_columns[i].clone()).collect();
    let projection: Vec<String> = columns.iter().map(|c| c.name().to_string()).collect();

    let width = schema::quantum_width(definition)
        .context(SchemaSnafu)?
        .num_milliseconds();
    // quantum_width succeeded, so the quantum column exists.
    let time_column = definition
        .quantum_column()
        .map(|c| c.name().to_string())
        .unwrap_or_default();

    let split = match &select.predicate {
        Some(predicate) => {
            check_columns(definition, predicate)?;
            predicate::extract_time_range(predicate, &time_column).context(PredicateSnafu)?
        }
        None => SplitPredicate {
            range: None,
            residual: None,
        },
    };
    let residual = split.residual.as_ref().map(Predicate::to_string);

    let ranges = match split.range {
        None => vec![None],
        Some(range) => split_by_quantum(
            range,
            width,
            config.quantum_origin_ms,
            config.max_quanta_per_query,
        )?
        .into_iter()
        .map(Some)
        .collect(),
    };

    let sub_queries = ranges
        .into_iter()
        .map(|range| QuerySpec {
            projection: projection.clone(),
            time_column: time_column.clone(),
            range,
            residual: residual.clone(),
        })
        .collect();

    Ok(QueryPlan {
        table: table.to_string(),
        time_index: projection.iter().position(|name| *name == time_column),
        columns,
        sub_queries,
    })
}

fn check_columns(definition: &TableDefinition, predicate: &Predicate) -> Result<(), PlanError> {
    match predicate {
        Predicate::And(l, r) | Predicate::Or(l, r) => {
            check_columns(definition, l)?;
            check_columns(definition, r)
        }
        Predicate::Compare(c) => {
            ensure!(
                definition.index_of(&c.column).is_some(),
                UnknownColumnSnafu {
                    table: definition.name(),
                    column: &c.column,
                }
            );
            Ok(())
        }
    }
}
