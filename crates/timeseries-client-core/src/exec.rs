//! Command submission.
//!
//! [`Client::submit`] spawns one task per command and hands back a
//! [`CommandFuture`]. The task owns the command's sub-requests; cancelling
//! the handle aborts the task and with it everything still in flight.

mod coordinator;
mod handle;

use std::sync::Arc;

use log::debug;
use snafu::prelude::*;
use tokio::sync::watch;

pub use handle::{CommandFuture, CommandState};

use crate::{
    command::{Command, CommandOutput, TsCommand},
    config::{ClientConfig, ConfigError},
    error::{CommandError, UnexpectedResponseSnafu},
    transport::ClusterTransport,
};

use self::coordinator::Coordinator;

/// Submits commands against a cluster transport.
///
/// Cheap to clone; clones share the transport.
#[derive(Clone)]
pub struct Client {
    transport: Arc<dyn ClusterTransport>,
    config: Arc<ClientConfig>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// A client with the default configuration.
    pub fn new<T: ClusterTransport + 'static>(transport: Arc<T>) -> Self {
        Client {
            transport,
            config: Arc::new(ClientConfig::default()),
        }
    }

    /// A client with `config`, which is validated first.
    pub fn with_config<T: ClusterTransport + 'static>(
        transport: Arc<T>,
        config: ClientConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Client {
            transport,
            config: Arc::new(config),
        })
    }

    /// The active configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Start executing `command`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn submit<C>(&self, command: C) -> CommandFuture<C::Output>
    where
        C: TsCommand + 'static,
    {
        let command: Command = command.into();
        let table = command.table().to_string();
        let kind = command.kind();
        debug!("submitting {kind} on '{table}'");

        let state = Arc::new(watch::channel(CommandState::Pending).0);
        let guard = handle::SettleGuard::new(Arc::clone(&state), table.clone(), kind);
        let coordinator = Coordinator::new(
            Arc::clone(&self.transport),
            Arc::clone(&self.config),
            table.clone(),
            kind,
        );
        let task_table = table.clone();
        let task = tokio::spawn(async move {
            let outcome = coordinator.run(command).await.and_then(|output| {
                C::output_from(output).context(UnexpectedResponseSnafu {
                    table: task_table,
                    command: kind,
                    details: "payload of the wrong shape",
                })
            });
            let settled = match outcome {
                Ok(value) => CommandState::Resolved(value),
                Err(err) => CommandState::Failed(err),
            };
            guard.settle(settled);
        });

        CommandFuture::new(table, kind, state, task.abort_handle())
    }

    /// Start executing an untyped command.
    pub fn submit_command(&self, command: Command) -> CommandFuture<CommandOutput> {
        self.submit(command)
    }

    /// Submit `command` and wait for its result.
    pub async fn execute<C>(&self, command: C) -> Result<C::Output, CommandError>
    where
        C: TsCommand + 'static,
    {
        self.submit(command).await
    }
}
