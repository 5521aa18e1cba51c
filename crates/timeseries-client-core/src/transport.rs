//! The single capability the core needs from its environment: run one
//! sub-request against the cluster.
//!
//! Wire encoding, node selection, retries and TLS are the implementor's
//! business. The core only relies on responses being typed and on errors
//! carrying a distinguishable [`ErrorKind`].

use async_trait::async_trait;
use snafu::prelude::*;

use crate::{
    command::CommandKind,
    data::{Cell, QueryResult, Row},
    error::ErrorKind,
    planner::QuerySpec,
    schema::TableDefinition,
};

/// A failure reported by the cluster transport.
///
/// The message is passed to the caller verbatim.
#[derive(Debug, Clone, Snafu, PartialEq, Eq)]
#[snafu(display("{message}"))]
pub struct TransportError {
    kind: ErrorKind,
    message: String,
}

impl TransportError {
    /// Build an error of `kind`.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        TransportSnafu {
            kind,
            message: message.into(),
        }
        .build()
    }

    /// The failure category.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// The human-readable message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Kind-specific body of a sub-request.
#[derive(Debug, Clone, PartialEq)]
pub enum SubRequestPayload {
    /// Create the table.
    CreateTable(TableDefinition),
    /// Write rows.
    Store(Vec<Row>),
    /// Read the row at a local key.
    Fetch(Vec<Cell>),
    /// Remove the row at a local key.
    Delete(Vec<Cell>),
    /// Stream every local key.
    ListKeys,
    /// Run one quantum-scoped query.
    Query(QuerySpec),
    /// Read the table definition.
    DescribeTable,
}

/// One request dispatched to the cluster on behalf of a command.
#[derive(Debug, Clone, PartialEq)]
pub struct SubRequest {
    /// Table the request addresses.
    pub table: String,
    /// Kind-specific body.
    pub payload: SubRequestPayload,
}

impl SubRequest {
    /// Build a sub-request.
    pub fn new(table: impl Into<String>, payload: SubRequestPayload) -> Self {
        SubRequest {
            table: table.into(),
            payload,
        }
    }

    /// The command kind this sub-request serves.
    pub fn kind(&self) -> CommandKind {
        match self.payload {
            SubRequestPayload::CreateTable(_) => CommandKind::CreateTable,
            SubRequestPayload::Store(_) => CommandKind::Store,
            SubRequestPayload::Fetch(_) => CommandKind::Fetch,
            SubRequestPayload::Delete(_) => CommandKind::Delete,
            SubRequestPayload::ListKeys => CommandKind::ListKeys,
            SubRequestPayload::Query(_) => CommandKind::Query,
            SubRequestPayload::DescribeTable => CommandKind::DescribeTable,
        }
    }
}

/// A successful sub-request outcome.
#[derive(Debug, Clone, PartialEq)]
pub enum SubResponse {
    /// Success with no payload.
    Empty,
    /// Rows with their column descriptions.
    Rows(QueryResult),
    /// A table definition.
    Table(TableDefinition),
}

impl SubResponse {
    /// Short name of the variant, for diagnostics.
    pub fn describe(&self) -> &'static str {
        match self {
            SubResponse::Empty => "empty response",
            SubResponse::Rows(_) => "rows",
            SubResponse::Table(_) => "table definition",
        }
    }
}

/// Executes sub-requests against the cluster.
///
/// Shared by every command in flight, so implementations must tolerate
/// concurrent calls. Dropping the returned future must abandon the request.
#[async_trait]
pub trait ClusterTransport: Send + Sync {
    /// Run one sub-request.
    async fn execute(&self, request: SubRequest) -> Result<SubResponse, TransportError>;
}
