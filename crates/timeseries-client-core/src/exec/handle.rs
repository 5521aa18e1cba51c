//! The asynchronous result handle returned by [`crate::exec::Client::submit`].

use std::{future::IntoFuture, sync::Arc};

use futures::future::BoxFuture;
use log::{debug, warn};
use tokio::{
    sync::watch,
    task::{AbortHandle, JoinHandle},
};

use crate::{command::CommandKind, error::CommandError};

/// Where a submitted command stands.
///
/// A handle leaves `Pending` exactly once and never changes state again.
#[derive(Debug, Clone)]
pub enum CommandState<T> {
    /// Still executing.
    Pending,
    /// Succeeded with this payload.
    Resolved(T),
    /// Failed with this error.
    Failed(CommandError),
    /// Cancelled by the caller.
    Cancelled,
}

impl<T> CommandState<T> {
    /// Whether the command is still executing.
    pub fn is_pending(&self) -> bool {
        matches!(self, CommandState::Pending)
    }

    fn into_result(self, table: &str, command: CommandKind) -> Option<Result<T, CommandError>> {
        match self {
            CommandState::Pending => None,
            CommandState::Resolved(value) => Some(Ok(value)),
            CommandState::Failed(err) => Some(Err(err)),
            CommandState::Cancelled => Some(Err(CommandError::Cancelled {
                table: table.to_string(),
                command,
            })),
        }
    }
}

/// Move `slot` out of `Pending`. Returns `false` if it already settled.
pub(crate) fn settle<T>(slot: &watch::Sender<CommandState<T>>, state: CommandState<T>) -> bool {
    slot.send_if_modified(|current| {
        if current.is_pending() {
            *current = state;
            true
        } else {
            false
        }
    })
}

/// Settles its slot as [`CommandError::Aborted`] if dropped while the slot
/// is still pending.
///
/// The command task owns one, so a panic or a runtime shutdown that drops
/// the task before it produced an outcome still releases every waiter.
pub(crate) struct SettleGuard<T> {
    slot: Arc<watch::Sender<CommandState<T>>>,
    table: String,
    command: CommandKind,
}

impl<T> SettleGuard<T> {
    pub(crate) fn new(
        slot: Arc<watch::Sender<CommandState<T>>>,
        table: String,
        command: CommandKind,
    ) -> Self {
        SettleGuard {
            slot,
            table,
            command,
        }
    }

    /// Settle with the task's own outcome.
    pub(crate) fn settle(&self, state: CommandState<T>) -> bool {
        settle(&self.slot, state)
    }
}

impl<T> Drop for SettleGuard<T> {
    fn drop(&mut self) {
        let aborted = CommandError::Aborted {
            table: self.table.clone(),
            command: self.command,
        };
        if settle(&self.slot, CommandState::Failed(aborted)) {
            warn!(
                "{} on '{}' stopped before it settled",
                self.command, self.table
            );
        }
    }
}

async fn wait_settled<T: Clone>(
    mut rx: watch::Receiver<CommandState<T>>,
    table: &str,
    command: CommandKind,
) -> Result<T, CommandError> {
    // Every handle holds the sender, and the task's guard settles it before
    // letting go, so the channel cannot close while the state is pending.
    let settled = rx
        .wait_for(|state| !state.is_pending())
        .await
        .map(|state| (*state).clone())
        .unwrap_or(CommandState::Cancelled);
    settled.into_result(table, command).unwrap_or_else(|| {
        Err(CommandError::Cancelled {
            table: table.to_string(),
            command,
        })
    })
}

/// A pending command result.
///
/// Await it (it implements [`IntoFuture`]), [`poll`](Self::poll) it, or
/// register a continuation with [`on_complete`](Self::on_complete).
/// Dropping the handle does not cancel the command; [`cancel`](Self::cancel)
/// does.
#[derive(Debug)]
pub struct CommandFuture<T> {
    table: String,
    command: CommandKind,
    state: Arc<watch::Sender<CommandState<T>>>,
    task: AbortHandle,
}

impl<T> CommandFuture<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(
        table: String,
        command: CommandKind,
        state: Arc<watch::Sender<CommandState<T>>>,
        task: AbortHandle,
    ) -> Self {
        CommandFuture {
            table,
            command,
            state,
            task,
        }
    }

    /// Table the command addresses.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Kind of the command.
    pub fn command(&self) -> CommandKind {
        self.command
    }

    /// Snapshot of the current state without waiting.
    pub fn poll(&self) -> CommandState<T> {
        self.state.borrow().clone()
    }

    /// Whether the command has left `Pending`.
    pub fn is_done(&self) -> bool {
        !self.state.borrow().is_pending()
    }

    /// Wait for the command to settle. May be called any number of times.
    pub async fn wait(&self) -> Result<T, CommandError> {
        wait_settled(self.state.subscribe(), &self.table, self.command).await
    }

    /// Run `callback` with the outcome once the command settles.
    ///
    /// The callback runs on a runtime task; the returned handle resolves
    /// after it has run.
    pub fn on_complete<F>(&self, callback: F) -> JoinHandle<()>
    where
        F: FnOnce(Result<T, CommandError>) + Send + 'static,
    {
        let rx = self.state.subscribe();
        let table = self.table.clone();
        let command = self.command;
        tokio::spawn(async move {
            let outcome = wait_settled(rx, &table, command).await;
            callback(outcome);
        })
    }

    /// Cancel the command.
    ///
    /// The handle settles as cancelled and every in-flight sub-request is
    /// dropped. Writes the cluster already applied stay applied. Returns
    /// `false` if the command had already settled.
    pub fn cancel(&self) -> bool {
        let cancelled = settle(&self.state, CommandState::Cancelled);
        if cancelled {
            warn!(
                "cancelling {} on '{}' with sub-requests possibly in flight",
                self.command, self.table
            );
            self.task.abort();
        } else {
            debug!(
                "cancel of {} on '{}' ignored: already settled",
                self.command, self.table
            );
        }
        cancelled
    }
}

impl<T> IntoFuture for CommandFuture<T>
where
    T: Clone + Send + Sync + 'static,
{
    type Output = Result<T, CommandError>;
    type IntoFuture = BoxFuture<'static, Self::Output>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(async move { self.wait().await })
    }
}
