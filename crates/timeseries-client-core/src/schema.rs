//! Table definitions and the composite key model.
//!
//! A time-series table is addressed by a composite primary key:
//!
//! - the **partition key** (identifying columns plus the time column reduced
//!   to a quantum) selects the physical partition, and
//! - the **local key** (the same identifying columns plus the exact
//!   timestamp) selects the row within the partition.
//!
//! ```text
//! PRIMARY KEY ((geohash, user, quantum(time, 15, 'm')), geohash, user, time)
//!              └──────────── partition key ───────────┘ └─── local key ───┘
//! ```
//!
//! [`TableDefinition`] is immutable once built. [`validate`] enforces the key
//! invariants before a definition is sent to the cluster.

pub mod quantum;

use std::{collections::HashSet, fmt};

use chrono::Duration;
use serde::{Deserialize, Serialize};
use snafu::prelude::*;

pub use quantum::{ParseQuantumError, Quantum, QuantumUnit};

/// Errors raised when a table definition violates the key invariants.
#[derive(Debug, Clone, Snafu, PartialEq, Eq)]
#[snafu(visibility(pub(crate)))]
pub enum SchemaError {
    /// The table name is empty.
    #[snafu(display("table name must not be empty"))]
    EmptyTableName,

    /// The definition has no columns.
    #[snafu(display("table '{table}' has no columns"))]
    NoColumns {
        /// Table being validated.
        table: String,
    },

    /// A column has an empty name.
    #[snafu(display("table '{table}' has a column with an empty name at position {position}"))]
    EmptyColumnName {
        /// Table being validated.
        table: String,
        /// Zero-based column position.
        position: usize,
    },

    /// Two columns share a name.
    #[snafu(display("table '{table}' defines column '{column}' more than once"))]
    DuplicateColumn {
        /// Table being validated.
        table: String,
        /// The repeated column name.
        column: String,
    },

    /// The table declares no local key.
    #[snafu(display("table '{table}' has no local key columns"))]
    MissingLocalKey {
        /// Table being validated.
        table: String,
    },

    /// The table declares no partition key.
    #[snafu(display("table '{table}' has no partition key columns"))]
    MissingPartitionKey {
        /// Table being validated.
        table: String,
    },

    /// Key ordinals must run 1, 2, 3, ... without gaps or repeats.
    #[snafu(display("{key} key ordinals of table '{table}' are not contiguous from 1"))]
    NonContiguousOrdinals {
        /// Table being validated.
        table: String,
        /// Which key: "partition" or "local".
        key: &'static str,
    },

    /// The partition key is not a prefix of the local key.
    #[snafu(display(
        "partition key column '{column}' of table '{table}' must be local key column #{position}"
    ))]
    PartitionKeyNotLocalPrefix {
        /// Table being validated.
        table: String,
        /// The offending partition key column.
        column: String,
        /// One-based local key position it should occupy.
        position: usize,
    },

    /// A key column allows nulls.
    #[snafu(display("key column '{column}' of table '{table}' must not be nullable"))]
    NullableKeyColumn {
        /// Table being validated.
        table: String,
        /// The nullable key column.
        column: String,
    },

    /// A key column has a type the store cannot key on.
    #[snafu(display(
        "key column '{column}' of table '{table}' has type {column_type}, which cannot be part of a key"
    ))]
    UnsupportedKeyType {
        /// Table being validated.
        table: String,
        /// The key column.
        column: String,
        /// Its declared type.
        column_type: ColumnType,
    },

    /// No column carries a quantum.
    #[snafu(display("table '{table}' has no quantum on its partition key"))]
    MissingQuantum {
        /// Table being validated.
        table: String,
    },

    /// More than one column carries a quantum.
    #[snafu(display("table '{table}' declares {count} quanta; exactly one is allowed"))]
    MultipleQuanta {
        /// Table being validated.
        table: String,
        /// Number of quantum descriptors found.
        count: usize,
    },

    /// The quantum is attached to a column that is not a timestamp partition key member.
    #[snafu(display(
        "quantum of table '{table}' is on column '{column}', which is not a timestamp partition key column"
    ))]
    MisplacedQuantum {
        /// Table being validated.
        table: String,
        /// The column carrying the quantum.
        column: String,
    },

    /// The quantum interval is zero.
    #[snafu(display("quantum of table '{table}' has a zero interval"))]
    ZeroQuantum {
        /// Table being validated.
        table: String,
    },
}

/// Column value types supported by the store.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    /// UTF-8 text.
    Varchar,
    /// Milliseconds since the Unix epoch.
    Timestamp,
    /// 64-bit float.
    Double,
    /// Signed 64-bit integer.
    Sint64,
    /// Boolean.
    Boolean,
    /// Raw bytes.
    Blob,
}

impl ColumnType {
    /// Whether a column of this type may be a key component.
    pub fn is_keyable(self) -> bool {
        matches!(
            self,
            ColumnType::Varchar | ColumnType::Timestamp | ColumnType::Sint64 | ColumnType::Blob
        )
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnType::Varchar => "varchar",
            ColumnType::Timestamp => "timestamp",
            ColumnType::Double => "double",
            ColumnType::Sint64 => "sint64",
            ColumnType::Boolean => "boolean",
            ColumnType::Blob => "blob",
        };
        f.write_str(name)
    }
}

/// Name, type and nullability of one column.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ColumnDescription {
    name: String,
    column_type: ColumnType,
    nullable: bool,
}

impl ColumnDescription {
    /// Describe a column.
    pub fn new(name: impl Into<String>, column_type: ColumnType, nullable: bool) -> Self {
        ColumnDescription {
            name: name.into(),
            column_type,
            nullable,
        }
    }

    /// Column name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Column type.
    pub fn column_type(&self) -> ColumnType {
        self.column_type
    }

    /// Whether the column accepts null cells.
    pub fn is_nullable(&self) -> bool {
        self.nullable
    }
}

/// A column description plus its role in the primary key.
///
/// Ordinals are one-based positions within the partition key and local key.
/// A column can be a member of both keys.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FullColumnDescription {
    #[serde(flatten)]
    column: ColumnDescription,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    partition_key_ordinal: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    local_key_ordinal: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    quantum: Option<Quantum>,
}

impl FullColumnDescription {
    /// A plain (non-key) column.
    pub fn new(name: impl Into<String>, column_type: ColumnType, nullable: bool) -> Self {
        FullColumnDescription {
            column: ColumnDescription::new(name, column_type, nullable),
            partition_key_ordinal: None,
            local_key_ordinal: None,
            quantum: None,
        }
    }

    /// Mark the column as partition key member at `ordinal` (one-based).
    pub fn partition_key(mut self, ordinal: u32) -> Self {
        self.partition_key_ordinal = Some(ordinal);
        self
    }

    /// Mark the column as local key member at `ordinal` (one-based).
    pub fn local_key(mut self, ordinal: u32) -> Self {
        self.local_key_ordinal = Some(ordinal);
        self
    }

    /// Attach the table's quantum to this column.
    pub fn with_quantum(mut self, quantum: Quantum) -> Self {
        self.quantum = Some(quantum);
        self
    }

    /// The underlying name/type/nullability.
    pub fn column(&self) -> &ColumnDescription {
        &self.column
    }

    /// Column name.
    pub fn name(&self) -> &str {
        self.column.name()
    }

    /// Column type.
    pub fn column_type(&self) -> ColumnType {
        self.column.column_type()
    }

    /// Whether the column accepts null cells.
    pub fn is_nullable(&self) -> bool {
        self.column.is_nullable()
    }

    /// One-based partition key position, if a member.
    pub fn partition_key_ordinal(&self) -> Option<u32> {
        self.partition_key_ordinal
    }

    /// One-based local key position, if a member.
    pub fn local_key_ordinal(&self) -> Option<u32> {
        self.local_key_ordinal
    }

    /// The quantum attached to this column, if any.
    pub fn quantum(&self) -> Option<&Quantum> {
        self.quantum.as_ref()
    }

    /// Whether the column is part of the partition key.
    pub fn is_partition_key_member(&self) -> bool {
        self.partition_key_ordinal.is_some()
    }

    /// Whether the column is part of the local key.
    pub fn is_local_key_member(&self) -> bool {
        self.local_key_ordinal.is_some()
    }
}

/// Definition of a time-series table: ordered columns plus key roles.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TableDefinition {
    name: String,
    columns: Vec<FullColumnDescription>,
}

impl TableDefinition {
    /// Assemble a definition. Call [`validate`] (or build a
    /// [`crate::command::CreateTable`]) to check the key invariants.
    pub fn new(name: impl Into<String>, columns: Vec<FullColumnDescription>) -> Self {
        TableDefinition {
            name: name.into(),
            columns,
        }
    }

    /// Table name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Every column in table order, with key roles.
    pub fn full_column_descriptions(&self) -> &[FullColumnDescription] {
        &self.columns
    }

    /// Every column in table order, without key roles.
    pub fn column_descriptions(&self) -> Vec<ColumnDescription> {
        self.columns.iter().map(|c| c.column().clone()).collect()
    }

    /// Position of the named column in table order.
    pub fn index_of(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name() == column)
    }

    /// Partition key columns ordered by ordinal.
    pub fn partition_key_columns(&self) -> Vec<&FullColumnDescription> {
        keyed_by(&self.columns, FullColumnDescription::partition_key_ordinal)
    }

    /// Local key columns ordered by ordinal.
    pub fn local_key_columns(&self) -> Vec<&FullColumnDescription> {
        keyed_by(&self.columns, FullColumnDescription::local_key_ordinal)
    }

    /// Table positions of the local key columns, in key order.
    pub fn local_key_indices(&self) -> Vec<usize> {
        self.local_key_columns()
            .into_iter()
            .filter_map(|c| self.index_of(c.name()))
            .collect()
    }

    /// The column carrying the quantum, if any.
    pub fn quantum_column(&self) -> Option<&FullColumnDescription> {
        self.columns.iter().find(|c| c.quantum().is_some())
    }

    /// The table quantum, if any.
    pub fn quantum(&self) -> Option<&Quantum> {
        self.quantum_column().and_then(FullColumnDescription::quantum)
    }

    /// Render the `CREATE TABLE` statement for this definition.
    pub fn to_ddl(&self) -> String {
        let columns = self
            .columns
            .iter()
            .map(|c| {
                let ty = c.column_type().to_string().to_ascii_uppercase();
                if c.is_nullable() {
                    format!("{} {ty}", c.name())
                } else {
                    format!("{} {ty} NOT NULL", c.name())
                }
            })
            .collect::<Vec<_>>()
            .join(", ");

        let partition = self
            .partition_key_columns()
            .into_iter()
            .map(|c| match c.quantum() {
                Some(q) => format!(
                    "QUANTUM({}, {}, '{}')",
                    c.name(),
                    q.interval(),
                    q.unit().code()
                ),
                None => c.name().to_string(),
            })
            .collect::<Vec<_>>()
            .join(", ");

        let local = self
            .local_key_columns()
            .into_iter()
            .map(FullColumnDescription::name)
            .collect::<Vec<_>>()
            .join(", ");

        format!(
            "CREATE TABLE {} ({columns}, PRIMARY KEY (({partition}), {local}))",
            self.name
        )
    }
}

fn keyed_by(
    columns: &[FullColumnDescription],
    ordinal: fn(&FullColumnDescription) -> Option<u32>,
) -> Vec<&FullColumnDescription> {
    let mut keyed: Vec<_> = columns.iter().filter(|c| ordinal(c).is_some()).collect();
    keyed.sort_by_key(|c| ordinal(c));
    keyed
}

fn ordinals_contiguous(
    columns: &[&FullColumnDescription],
    ordinal: fn(&FullColumnDescription) -> Option<u32>,
) -> bool {
    columns
        .iter()
        .enumerate()
        .all(|(i, c)| ordinal(c) == u32::try_from(i + 1).ok())
}

/// Check the key invariants of a table definition.
///
/// - columns are non-empty with unique, non-empty names;
/// - partition and local key ordinals are contiguous from 1;
/// - the partition key is a prefix of the local key;
/// - key columns are non-nullable and of a keyable type;
/// - exactly one non-zero quantum sits on a timestamp partition key column.
pub fn validate(definition: &TableDefinition) -> Result<(), SchemaError> {
    let table = definition.name();
    ensure!(!table.is_empty(), EmptyTableNameSnafu);
    ensure!(!definition.columns.is_empty(), NoColumnsSnafu { table });

    let mut seen = HashSet::new();
    for (position, column) in definition.columns.iter().enumerate() {
        ensure!(
            !column.name().is_empty(),
            EmptyColumnNameSnafu { table, position }
        );
        ensure!(
            seen.insert(column.name()),
            DuplicateColumnSnafu {
                table,
                column: column.name()
            }
        );
    }

    let local = definition.local_key_columns();
    let partition = definition.partition_key_columns();
    ensure!(!local.is_empty(), MissingLocalKeySnafu { table });
    ensure!(!partition.is_empty(), MissingPartitionKeySnafu { table });
    ensure!(
        ordinals_contiguous(&local, FullColumnDescription::local_key_ordinal),
        NonContiguousOrdinalsSnafu { table, key: "local" }
    );
    ensure!(
        ordinals_contiguous(&partition, FullColumnDescription::partition_key_ordinal),
        NonContiguousOrdinalsSnafu {
            table,
            key: "partition"
        }
    );

    for (i, column) in partition.iter().enumerate() {
        let in_place = local.get(i).is_some_and(|l| l.name() == column.name());
        ensure!(
            in_place,
            PartitionKeyNotLocalPrefixSnafu {
                table,
                column: column.name(),
                position: i + 1,
            }
        );
    }

    for column in local.iter().chain(partition.iter()) {
        ensure!(
            !column.is_nullable(),
            NullableKeyColumnSnafu {
                table,
                column: column.name()
            }
        );
        ensure!(
            column.column_type().is_keyable(),
            UnsupportedKeyTypeSnafu {
                table,
                column: column.name(),
                column_type: column.column_type(),
            }
        );
    }

    let quantized: Vec<_> = definition
        .columns
        .iter()
        .filter(|c| c.quantum().is_some())
        .collect();
    match quantized.as_slice() {
        [] => MissingQuantumSnafu { table }.fail(),
        [column] => {
            ensure!(
                column.is_partition_key_member() && column.column_type() == ColumnType::Timestamp,
                MisplacedQuantumSnafu {
                    table,
                    column: column.name()
                }
            );
            ensure!(
                column.quantum().is_some_and(|q| q.interval() > 0),
                ZeroQuantumSnafu { table }
            );
            Ok(())
        }
        many => MultipleQuantaSnafu {
            table,
            count: many.len(),
        }
        .fail(),
    }
}

/// The width of the table's quantum.
pub fn quantum_width(definition: &TableDefinition) -> Result<Duration, SchemaError> {
    definition
        .quantum()
        .map(Quantum::width)
        .context(MissingQuantumSnafu {
            table: definition.name(),
        })
}

/// The ordered column list rendered by a DescribeTable result.
pub fn describe(definition: &TableDefinition) -> Vec<FullColumnDescription> {
    definition.full_column_descriptions().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geo_checkin() -> TableDefinition {
        TableDefinition::new(
            "GeoCheckin",
            vec![
                FullColumnDescription::new("geohash", ColumnType::Varchar, false)
                    .partition_key(1)
                    .local_key(1),
                FullColumnDescription::new("user", ColumnType::Varchar, false)
                    .partition_key(2)
                    .local_key(2),
                FullColumnDescription::new("time", ColumnType::Timestamp, false)
                    .partition_key(3)
                    .local_key(3)
                    .with_quantum(Quantum::new(15, QuantumUnit::Minutes)),
                FullColumnDescription::new("weather", ColumnType::Varchar, false),
                FullColumnDescription::new("temperature", ColumnType::Double, true),
            ],
        )
    }

    fn with_columns(columns: Vec<FullColumnDescription>) -> TableDefinition {
        TableDefinition::new("t", columns)
    }

    #[test]
    fn geo_checkin_is_valid() {
        let def = geo_checkin();
        validate(&def).unwrap();
        assert_eq!(quantum_width(&def).unwrap(), Duration::minutes(15));
        assert_eq!(def.local_key_indices(), vec![0, 1, 2]);
        assert_eq!(def.quantum_column().map(|c| c.name()), Some("time"));
    }

    #[test]
    fn key_accessors_sort_by_ordinal() {
        let def = with_columns(vec![
            FullColumnDescription::new("time", ColumnType::Timestamp, false)
                .partition_key(2)
                .local_key(2)
                .with_quantum(Quantum::new(1, QuantumUnit::Hours)),
            FullColumnDescription::new("host", ColumnType::Varchar, false)
                .partition_key(1)
                .local_key(1),
        ]);
        validate(&def).unwrap();
        let names: Vec<_> = def.local_key_columns().iter().map(|c| c.name()).collect();
        assert_eq!(names, ["host", "time"]);
        assert_eq!(def.local_key_indices(), vec![1, 0]);
    }

    #[test]
    fn local_key_may_extend_the_partition_key() {
        let def = with_columns(vec![
            FullColumnDescription::new("host", ColumnType::Varchar, false)
                .partition_key(1)
                .local_key(1),
            FullColumnDescription::new("time", ColumnType::Timestamp, false)
                .partition_key(2)
                .local_key(2)
                .with_quantum(Quantum::new(1, QuantumUnit::Hours)),
            FullColumnDescription::new("seq", ColumnType::Sint64, false).local_key(3),
        ]);
        validate(&def).unwrap();
    }

    #[test]
    fn rejects_partition_key_out_of_local_order() {
        let def = with_columns(vec![
            FullColumnDescription::new("host", ColumnType::Varchar, false)
                .partition_key(1)
                .local_key(2),
            FullColumnDescription::new("time", ColumnType::Timestamp, false)
                .partition_key(2)
                .local_key(1)
                .with_quantum(Quantum::new(1, QuantumUnit::Hours)),
        ]);
        let err = validate(&def).unwrap_err();
        assert!(
            matches!(
                &err,
                SchemaError::PartitionKeyNotLocalPrefix { column, position: 1, .. }
                    if column == "host"
            ),
            "unexpected error: {err:?}"
        );
    }

    #[test]
    fn rejects_missing_or_duplicate_quantum() {
        let no_quantum = with_columns(vec![
            FullColumnDescription::new("time", ColumnType::Timestamp, false)
                .partition_key(1)
                .local_key(1),
        ]);
        assert!(matches!(
            validate(&no_quantum).unwrap_err(),
            SchemaError::MissingQuantum { .. }
        ));
        assert!(quantum_width(&no_quantum).is_err());

        let q = Quantum::new(1, QuantumUnit::Hours);
        let two = with_columns(vec![
            FullColumnDescription::new("a", ColumnType::Timestamp, false)
                .partition_key(1)
                .local_key(1)
                .with_quantum(q),
            FullColumnDescription::new("b", ColumnType::Timestamp, false)
                .partition_key(2)
                .local_key(2)
                .with_quantum(q),
        ]);
        assert!(matches!(
            validate(&two).unwrap_err(),
            SchemaError::MultipleQuanta { count: 2, .. }
        ));
    }

    #[test]
    fn rejects_quantum_on_non_timestamp_or_non_partition_column() {
        let q = Quantum::new(1, QuantumUnit::Hours);
        let on_varchar = with_columns(vec![
            FullColumnDescription::new("host", ColumnType::Varchar, false)
                .partition_key(1)
                .local_key(1)
                .with_quantum(q),
        ]);
        assert!(matches!(
            validate(&on_varchar).unwrap_err(),
            SchemaError::MisplacedQuantum { .. }
        ));

        let off_key = with_columns(vec![
            FullColumnDescription::new("host", ColumnType::Varchar, false)
                .partition_key(1)
                .local_key(1),
            FullColumnDescription::new("time", ColumnType::Timestamp, false).with_quantum(q),
        ]);
        assert!(matches!(
            validate(&off_key).unwrap_err(),
            SchemaError::MisplacedQuantum { .. }
        ));
    }

    #[test]
    fn rejects_nullable_or_unkeyable_key_columns() {
        let q = Quantum::new(15, QuantumUnit::Minutes);
        let nullable = with_columns(vec![
            FullColumnDescription::new("host", ColumnType::Varchar, true)
                .partition_key(1)
                .local_key(1),
            FullColumnDescription::new("time", ColumnType::Timestamp, false)
                .partition_key(2)
                .local_key(2)
                .with_quantum(q),
        ]);
        assert!(matches!(
            validate(&nullable).unwrap_err(),
            SchemaError::NullableKeyColumn { column, .. } if column == "host"
        ));

        let double_key = with_columns(vec![
            FullColumnDescription::new("reading", ColumnType::Double, false)
                .partition_key(1)
                .local_key(1),
            FullColumnDescription::new("time", ColumnType::Timestamp, false)
                .partition_key(2)
                .local_key(2)
                .with_quantum(q),
        ]);
        assert!(matches!(
            validate(&double_key).unwrap_err(),
            SchemaError::UnsupportedKeyType {
                column_type: ColumnType::Double,
                ..
            }
        ));
    }

    #[test]
    fn rejects_structural_problems() {
        assert_eq!(
            validate(&TableDefinition::new("", vec![])).unwrap_err(),
            SchemaError::EmptyTableName
        );
        assert!(matches!(
            validate(&with_columns(vec![])).unwrap_err(),
            SchemaError::NoColumns { .. }
        ));

        let dup = with_columns(vec![
            FullColumnDescription::new("a", ColumnType::Varchar, false),
            FullColumnDescription::new("a", ColumnType::Varchar, false),
        ]);
        assert!(matches!(
            validate(&dup).unwrap_err(),
            SchemaError::DuplicateColumn { .. }
        ));

        let gap = with_columns(vec![
            FullColumnDescription::new("time", ColumnType::Timestamp, false)
                .partition_key(1)
                .local_key(2)
                .with_quantum(Quantum::new(1, QuantumUnit::Days)),
        ]);
        assert!(matches!(
            validate(&gap).unwrap_err(),
            SchemaError::NonContiguousOrdinals { key: "local", .. }
        ));
    }

    #[test]
    fn ddl_includes_quantum_and_both_keys() {
        let ddl = geo_checkin().to_ddl();
        assert_eq!(
            ddl,
            "CREATE TABLE GeoCheckin (geohash VARCHAR NOT NULL, user VARCHAR NOT NULL, \
             time TIMESTAMP NOT NULL, weather VARCHAR NOT NULL, temperature DOUBLE, \
             PRIMARY KEY ((geohash, user, QUANTUM(time, 15, 'm')), geohash, user, time))"
        );
    }

    #[test]
    fn definition_json_roundtrip() {
        let def = geo_checkin();
        let json = serde_json::to_string(&def).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["columns"][4]["column_type"], "double");
        assert!(value["columns"][4].get("partition_key_ordinal").is_none());

        let back: TableDefinition = serde_json::from_str(&json).unwrap();
        assert_eq!(back, def);
        assert_eq!(describe(&back), def.full_column_descriptions());
    }
}
