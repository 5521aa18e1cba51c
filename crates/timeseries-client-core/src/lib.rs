//! Client core for a clustered, table-oriented time-series store.
//!
//! Rows are addressed by a composite key: a partition key (identifying
//! columns plus the time reduced to a fixed-width *quantum*) and a local key
//! (the identifying columns plus the exact timestamp). This crate covers the
//! parts of a client that carry real invariants:
//!
//! - The schema model: table definitions, key roles and quantum descriptors
//!   (`schema` module).
//! - Typed, possibly-null cells, rows and query results (`data` module).
//! - The seven command kinds, validated when built (`command` module).
//! - Query text parsing and time-bound extraction (`predicate` module).
//! - The quantum range planner, which cuts a half-open time interval into
//!   per-quantum sub-requests and merges their results in time order
//!   (`planner` module).
//! - The execution coordinator and the asynchronous result handle
//!   (`exec` module).
//!
//! The cluster itself is reached through the [`transport::ClusterTransport`]
//! trait. [`memory::MemoryCluster`] implements it in-process.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use timeseries_client_core::{
//!     command::Query, exec::Client, memory::MemoryCluster,
//! };
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Client::new(Arc::new(MemoryCluster::new()));
//! let query = Query::new(
//!     "select weather, temperature from GeoCheckin \
//!      where time > 1700000000000 and time < 1700000900000 and geohash = 'hash1'",
//! )?;
//! let rows = client.execute(query).await?;
//! for row in &rows {
//!     println!("{:?}", row.cells());
//! }
//! # Ok(())
//! # }
//! ```
#![deny(missing_docs)]
pub mod command;
pub mod config;
pub mod data;
pub mod error;
pub mod exec;
pub mod memory;
pub mod planner;
pub mod predicate;
pub mod schema;
pub mod transport;

pub use command::{
    BuildError, Command, CommandKind, CommandOutput, CreateTable, Delete, DescribeTable, Fetch,
    ListKeys, Query, Store, TsCommand,
};
pub use config::{ClientConfig, ConfigError};
pub use data::{Cell, DataError, QueryResult, Row};
pub use error::{CommandError, ErrorKind};
pub use exec::{Client, CommandFuture, CommandState};
pub use schema::{
    ColumnDescription, ColumnType, FullColumnDescription, Quantum, QuantumUnit, SchemaError,
    TableDefinition,
};
pub use transport::{ClusterTransport, SubRequest, SubRequestPayload, SubResponse, TransportError};
