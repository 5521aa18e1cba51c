//! The seven command kinds.
//!
//! Each kind is a plain payload struct validated when it is built, so a
//! command that reaches the coordinator is always well-formed. Whether it
//! fits the live table is for the cluster to decide.
//!
//! ```
//! use timeseries_client_core::command::{Fetch, Store};
//! use timeseries_client_core::data::{Cell, Row};
//!
//! let store = Store::builder("GeoCheckin")
//!     .with_row(Row::new(vec![
//!         Cell::from("hash1"),
//!         Cell::from("user1"),
//!         Cell::timestamp(1_700_000_000_000),
//!     ]))
//!     .build()
//!     .unwrap();
//! assert_eq!(store.rows().len(), 1);
//!
//! assert!(Fetch::new("GeoCheckin", vec![]).is_err());
//! ```

use std::fmt;

use snafu::prelude::*;

use crate::{
    data::{self, Cell, DataError, QueryResult, Row},
    predicate::{self, PredicateError, Statement},
    schema::{self, SchemaError, TableDefinition},
};

/// Synchronous rejections raised while building a command.
#[derive(Debug, Clone, Snafu, PartialEq, Eq)]
#[snafu(visibility(pub(crate)))]
pub enum BuildError {
    /// No table name was given.
    #[snafu(display("{command} requires a table name"))]
    EmptyTableName {
        /// Command being built.
        command: CommandKind,
    },

    /// The definition passed to CreateTable is invalid.
    #[snafu(display("invalid table definition: {source}"))]
    InvalidSchema {
        /// Schema failure.
        source: SchemaError,
    },

    /// Store was built without rows.
    #[snafu(display("store into '{table}' has no rows"))]
    NoRows {
        /// Target table.
        table: String,
    },

    /// Store rows differ in length.
    #[snafu(display(
        "store into '{table}': row {row} has {actual} cells, the first row has {expected}"
    ))]
    RaggedRows {
        /// Target table.
        table: String,
        /// Index of the offending row.
        row: usize,
        /// Length of the first row.
        expected: usize,
        /// Length of the offending row.
        actual: usize,
    },

    /// Fetch/Delete was built without key cells.
    #[snafu(display("{command} on '{table}' requires key cells"))]
    EmptyKey {
        /// Command being built.
        command: CommandKind,
        /// Target table.
        table: String,
    },

    /// A key cell is null; key columns never are.
    #[snafu(display("{command} on '{table}': key cell {position} is null"))]
    NullKeyCell {
        /// Command being built.
        command: CommandKind,
        /// Target table.
        table: String,
        /// Position of the null cell.
        position: usize,
    },

    /// ListKeys was built without opting in to a full key listing.
    #[snafu(display(
        "listing keys of '{table}' walks every partition; call with_allow_listing() to permit it"
    ))]
    ListingNotAllowed {
        /// Target table.
        table: String,
    },

    /// Query text could not be parsed.
    #[snafu(display("unparsable query: {source}"))]
    UnparsableQuery {
        /// Parse failure.
        source: PredicateError,
    },
}

/// Discriminant of a [`Command`], used in diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    /// [`CreateTable`]
    CreateTable,
    /// [`Store`]
    Store,
    /// [`Fetch`]
    Fetch,
    /// [`Delete`]
    Delete,
    /// [`ListKeys`]
    ListKeys,
    /// [`Query`]
    Query,
    /// [`DescribeTable`]
    DescribeTable,
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CommandKind::CreateTable => "CreateTable",
            CommandKind::Store => "Store",
            CommandKind::Fetch => "Fetch",
            CommandKind::Delete => "Delete",
            CommandKind::ListKeys => "ListKeys",
            CommandKind::Query => "Query",
            CommandKind::DescribeTable => "DescribeTable",
        })
    }
}

fn check_table(table: &str, command: CommandKind) -> Result<(), BuildError> {
    ensure!(!table.trim().is_empty(), EmptyTableNameSnafu { command });
    Ok(())
}

fn check_key_cells(table: &str, key: &[Cell], command: CommandKind) -> Result<(), BuildError> {
    check_table(table, command)?;
    ensure!(!key.is_empty(), EmptyKeySnafu { command, table });
    if let Some(position) = key.iter().position(Cell::is_null) {
        return NullKeyCellSnafu {
            command,
            table,
            position,
        }
        .fail();
    }
    Ok(())
}

/// Create a table.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateTable {
    definition: TableDefinition,
}

impl CreateTable {
    /// Validate `definition` and wrap it.
    pub fn new(definition: TableDefinition) -> Result<Self, BuildError> {
        schema::validate(&definition).context(InvalidSchemaSnafu)?;
        Ok(CreateTable { definition })
    }

    /// The definition to create.
    pub fn definition(&self) -> &TableDefinition {
        &self.definition
    }
}

/// Write rows into a table.
#[derive(Debug, Clone, PartialEq)]
pub struct Store {
    table: String,
    rows: Vec<Row>,
}

impl Store {
    /// Start building a store into `table`.
    pub fn builder(table: impl Into<String>) -> StoreBuilder {
        StoreBuilder {
            table: table.into(),
            rows: Vec::new(),
        }
    }

    /// Target table.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Rows to write, in order.
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }
}

/// Builder for [`Store`].
#[derive(Debug, Clone)]
pub struct StoreBuilder {
    table: String,
    rows: Vec<Row>,
}

impl StoreBuilder {
    /// Append one row.
    pub fn with_row(mut self, row: impl Into<Row>) -> Self {
        self.rows.push(row.into());
        self
    }

    /// Append rows.
    pub fn with_rows(mut self, rows: impl IntoIterator<Item = Row>) -> Self {
        self.rows.extend(rows);
        self
    }

    /// Check the rows are non-empty and of equal length.
    pub fn build(self) -> Result<Store, BuildError> {
        check_table(&self.table, CommandKind::Store)?;
        let Some(first) = self.rows.first() else {
            return NoRowsSnafu { table: self.table }.fail();
        };
        let expected = first.len();
        if let Some((row, ragged)) = self
            .rows
            .iter()
            .enumerate()
            .find(|(_, r)| r.len() != expected)
        {
            return RaggedRowsSnafu {
                table: &self.table,
                row,
                expected,
                actual: ragged.len(),
            }
            .fail();
        }
        Ok(Store {
            table: self.table,
            rows: self.rows,
        })
    }
}

/// Read the row at a local key.
#[derive(Debug, Clone, PartialEq)]
pub struct Fetch {
    table: String,
    key: Vec<Cell>,
}

impl Fetch {
    /// Key cells are given in local-key order and must not be null.
    pub fn new(table: impl Into<String>, key: Vec<Cell>) -> Result<Self, BuildError> {
        let table = table.into();
        check_key_cells(&table, &key, CommandKind::Fetch)?;
        Ok(Fetch { table, key })
    }

    /// Target table.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Key cells in local-key order.
    pub fn key(&self) -> &[Cell] {
        &self.key
    }

    /// Check the key against a known definition.
    pub fn check_key(&self, definition: &TableDefinition) -> Result<(), DataError> {
        data::matches_key(&self.key, definition)
    }
}

/// Remove the row at a local key.
#[derive(Debug, Clone, PartialEq)]
pub struct Delete {
    table: String,
    key: Vec<Cell>,
}

impl Delete {
    /// Key cells are given in local-key order and must not be null.
    pub fn new(table: impl Into<String>, key: Vec<Cell>) -> Result<Self, BuildError> {
        let table = table.into();
        check_key_cells(&table, &key, CommandKind::Delete)?;
        Ok(Delete { table, key })
    }

    /// Target table.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Key cells in local-key order.
    pub fn key(&self) -> &[Cell] {
        &self.key
    }

    /// Check the key against a known definition.
    pub fn check_key(&self, definition: &TableDefinition) -> Result<(), DataError> {
        data::matches_key(&self.key, definition)
    }
}

/// List every local key in a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListKeys {
    table: String,
}

impl ListKeys {
    /// Start building a key listing of `table`.
    pub fn builder(table: impl Into<String>) -> ListKeysBuilder {
        ListKeysBuilder {
            table: table.into(),
            allow_listing: false,
        }
    }

    /// Target table.
    pub fn table(&self) -> &str {
        &self.table
    }
}

/// Builder for [`ListKeys`].
#[derive(Debug, Clone)]
pub struct ListKeysBuilder {
    table: String,
    allow_listing: bool,
}

impl ListKeysBuilder {
    /// Acknowledge that listing touches every partition of the table.
    pub fn with_allow_listing(mut self) -> Self {
        self.allow_listing = true;
        self
    }

    /// Build the command.
    pub fn build(self) -> Result<ListKeys, BuildError> {
        check_table(&self.table, CommandKind::ListKeys)?;
        ensure!(
            self.allow_listing,
            ListingNotAllowedSnafu { table: &self.table }
        );
        Ok(ListKeys { table: self.table })
    }
}

/// A declarative query, parsed when built.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    text: String,
    statement: Statement,
}

impl Query {
    /// Parse `text` as a SELECT or DESCRIBE statement.
    pub fn new(text: impl Into<String>) -> Result<Self, BuildError> {
        let text = text.into();
        let statement = predicate::parse_statement(&text).context(UnparsableQuerySnafu)?;
        Ok(Query { text, statement })
    }

    /// The query text as given.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// The parsed statement.
    pub fn statement(&self) -> &Statement {
        &self.statement
    }

    /// Table the statement addresses.
    pub fn table(&self) -> &str {
        self.statement.table()
    }
}

/// Read a table's definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescribeTable {
    table: String,
}

impl DescribeTable {
    /// Describe `table`.
    pub fn new(table: impl Into<String>) -> Result<Self, BuildError> {
        let table = table.into();
        check_table(&table, CommandKind::DescribeTable)?;
        Ok(DescribeTable { table })
    }

    /// Target table.
    pub fn table(&self) -> &str {
        &self.table
    }
}

/// A command of any kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Create a table.
    CreateTable(CreateTable),
    /// Write rows.
    Store(Store),
    /// Read by key.
    Fetch(Fetch),
    /// Remove by key.
    Delete(Delete),
    /// List keys.
    ListKeys(ListKeys),
    /// Run a query.
    Query(Query),
    /// Read a definition.
    DescribeTable(DescribeTable),
}

impl Command {
    /// The command's kind.
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::CreateTable(_) => CommandKind::CreateTable,
            Command::Store(_) => CommandKind::Store,
            Command::Fetch(_) => CommandKind::Fetch,
            Command::Delete(_) => CommandKind::Delete,
            Command::ListKeys(_) => CommandKind::ListKeys,
            Command::Query(_) => CommandKind::Query,
            Command::DescribeTable(_) => CommandKind::DescribeTable,
        }
    }

    /// The table the command addresses.
    pub fn table(&self) -> &str {
        match self {
            Command::CreateTable(c) => c.definition().name(),
            Command::Store(c) => c.table(),
            Command::Fetch(c) => c.table(),
            Command::Delete(c) => c.table(),
            Command::ListKeys(c) => c.table(),
            Command::Query(c) => c.table(),
            Command::DescribeTable(c) => c.table(),
        }
    }
}

/// The untyped success payload of a command.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutput {
    /// CreateTable, Store and Delete.
    Empty,
    /// Fetch, ListKeys and Query.
    Rows(QueryResult),
    /// DescribeTable.
    Table(TableDefinition),
}

/// A command payload with a typed result.
pub trait TsCommand: Into<Command> {
    /// What the command resolves to.
    type Output: Clone + Send + Sync + 'static;

    /// Pick the typed payload out of an untyped one. `None` means the
    /// coordinator produced the wrong shape for this command.
    fn output_from(output: CommandOutput) -> Option<Self::Output>;
}

macro_rules! ts_command {
    ($ty:ident, $output:ty, $pattern:pat => $value:expr) => {
        impl From<$ty> for Command {
            fn from(command: $ty) -> Self {
                Command::$ty(command)
            }
        }

        impl TsCommand for $ty {
            type Output = $output;

            fn output_from(output: CommandOutput) -> Option<Self::Output> {
                match output {
                    $pattern => Some($value),
                    _ => None,
                }
            }
        }
    };
}

ts_command!(CreateTable, (), CommandOutput::Empty => ());
ts_command!(Store, (), CommandOutput::Empty => ());
ts_command!(Delete, (), CommandOutput::Empty => ());
ts_command!(Fetch, QueryResult, CommandOutput::Rows(rows) => rows);
ts_command!(ListKeys, QueryResult, CommandOutput::Rows(rows) => rows);
ts_command!(Query, QueryResult, CommandOutput::Rows(rows) => rows);
ts_command!(DescribeTable, TableDefinition, CommandOutput::Table(table) => table);

impl TsCommand for Command {
    type Output = CommandOutput;

    fn output_from(output: CommandOutput) -> Option<Self::Output> {
        Some(output)
    }
}
