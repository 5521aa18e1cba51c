//! Failure classification for submitted commands.

use std::fmt;

use snafu::prelude::*;

use crate::{
    command::CommandKind,
    data::DataError,
    planner::PlanError,
    transport::TransportError,
};

/// Machine-readable failure category.
///
/// Every error a command can resolve with maps onto exactly one kind; the
/// transport reports kinds verbatim and the core never reclassifies them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A delete addressed a key that does not exist.
    NotFound,
    /// Invalid or conflicting table definition.
    Schema,
    /// Row arity, cell type or nullability does not fit the table.
    TypeMismatch,
    /// A cell was read as a type other than its own.
    WrongTypeAccess,
    /// The store rejected a write because of local-key ordering constraints.
    OutOfOrderWrite,
    /// The table does not exist or is not yet usable.
    NotActive,
    /// The session lacks required transport security.
    SecurityRequired,
    /// Query text or its time bounds could not be planned.
    UnparsablePredicate,
    /// Opaque transport or connectivity failure.
    Transport,
    /// The command was cancelled by its caller.
    Cancelled,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ErrorKind::NotFound => "not found",
            ErrorKind::Schema => "schema",
            ErrorKind::TypeMismatch => "type mismatch",
            ErrorKind::WrongTypeAccess => "wrong type access",
            ErrorKind::OutOfOrderWrite => "out of order write",
            ErrorKind::NotActive => "not active",
            ErrorKind::SecurityRequired => "security required",
            ErrorKind::UnparsablePredicate => "unparsable predicate",
            ErrorKind::Transport => "transport",
            ErrorKind::Cancelled => "cancelled",
        })
    }
}

/// What an asynchronous result handle fails with.
///
/// Each variant carries the table and command kind so diagnostics can name
/// what failed without the caller threading that context through.
#[derive(Debug, Clone, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CommandError {
    /// The cluster rejected a sub-request.
    #[snafu(display("{command} on '{table}' failed: {source}"))]
    Rejected {
        /// Table the command addressed.
        table: String,
        /// Command kind.
        command: CommandKind,
        /// The transport error, verbatim.
        source: TransportError,
    },

    /// The query could not be planned.
    #[snafu(display("{command} on '{table}' could not be planned: {source}"))]
    QueryPlan {
        /// Table the command addressed.
        table: String,
        /// Command kind.
        command: CommandKind,
        /// Planner failure.
        source: PlanError,
    },

    /// A sub-response did not carry the payload the command expects.
    #[snafu(display("{command} on '{table}' received an unexpected response: {details}"))]
    UnexpectedResponse {
        /// Table the command addressed.
        table: String,
        /// Command kind.
        command: CommandKind,
        /// What arrived instead.
        details: String,
    },

    /// Data returned by the cluster does not fit the table.
    #[snafu(display("{command} on '{table}' returned invalid data: {source}"))]
    Data {
        /// Table the command addressed.
        table: String,
        /// Command kind.
        command: CommandKind,
        /// Row/cell failure.
        source: DataError,
    },

    /// The caller cancelled the command.
    #[snafu(display("{command} on '{table}' was cancelled"))]
    Cancelled {
        /// Table the command addressed.
        table: String,
        /// Command kind.
        command: CommandKind,
    },

    /// The command task stopped (panicked or was torn down with its
    /// runtime) before producing an outcome.
    #[snafu(display("{command} on '{table}' stopped before it settled"))]
    Aborted {
        /// Table the command addressed.
        table: String,
        /// Command kind.
        command: CommandKind,
    },
}

impl CommandError {
    /// The failure category.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CommandError::Rejected { source, .. } => source.kind(),
            CommandError::QueryPlan { source, .. } => source.kind(),
            CommandError::UnexpectedResponse { .. } => ErrorKind::Transport,
            CommandError::Data { source, .. } => {
                if source.is_wrong_type_access() {
                    ErrorKind::WrongTypeAccess
                } else {
                    ErrorKind::TypeMismatch
                }
            }
            CommandError::Cancelled { .. } => ErrorKind::Cancelled,
            CommandError::Aborted { .. } => ErrorKind::Transport,
        }
    }

    /// The table the failed command addressed.
    pub fn table(&self) -> &str {
        match self {
            CommandError::Rejected { table, .. }
            | CommandError::QueryPlan { table, .. }
            | CommandError::UnexpectedResponse { table, .. }
            | CommandError::Data { table, .. }
            | CommandError::Cancelled { table, .. }
            | CommandError::Aborted { table, .. } => table,
        }
    }

    /// The kind of the failed command.
    pub fn command(&self) -> CommandKind {
        match self {
            CommandError::Rejected { command, .. }
            | CommandError::QueryPlan { command, .. }
            | CommandError::UnexpectedResponse { command, .. }
            | CommandError::Data { command, .. }
            | CommandError::Cancelled { command, .. }
            | CommandError::Aborted { command, .. } => *command,
        }
    }

    /// Whether the command was cancelled rather than failed.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, CommandError::Cancelled { .. })
    }
}
