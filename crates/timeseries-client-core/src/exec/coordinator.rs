//! Drives one command from submission to its merged result.
//!
//! Single-request commands map straight onto one sub-request. A SELECT
//! first resolves the table definition, plans the per-quantum pieces and
//! runs them concurrently, then merges the pieces in quantum order no matter
//! in which order the replies arrive. The first failed piece fails the whole
//! command; the remaining in-flight pieces are dropped with the stream.

use std::sync::Arc;

use futures::{StreamExt, stream};
use log::{debug, trace, warn};
use snafu::prelude::*;

use crate::{
    command::{Command, CommandKind, CommandOutput, Query},
    config::ClientConfig,
    data::{DataError, QueryResult},
    error::{CommandError, DataSnafu, QueryPlanSnafu, RejectedSnafu, UnexpectedResponseSnafu},
    planner::{self, QueryPlan},
    predicate::Statement,
    schema::TableDefinition,
    transport::{ClusterTransport, SubRequest, SubRequestPayload, SubResponse},
};

pub(crate) struct Coordinator {
    transport: Arc<dyn ClusterTransport>,
    config: Arc<ClientConfig>,
    table: String,
    command: CommandKind,
}

impl Coordinator {
    pub(crate) fn new(
        transport: Arc<dyn ClusterTransport>,
        config: Arc<ClientConfig>,
        table: String,
        command: CommandKind,
    ) -> Self {
        Coordinator {
            transport,
            config,
            table,
            command,
        }
    }

    pub(crate) async fn run(&self, command: Command) -> Result<CommandOutput, CommandError> {
        debug!("dispatching {} on '{}'", self.command, self.table);
        let output = match command {
            Command::CreateTable(c) => {
                let response = self
                    .dispatch(SubRequestPayload::CreateTable(c.definition().clone()))
                    .await?;
                self.expect_empty(response)?
            }
            Command::Store(c) => {
                let response = self
                    .dispatch(SubRequestPayload::Store(c.rows().to_vec()))
                    .await?;
                self.expect_empty(response)?
            }
            Command::Delete(c) => {
                let response = self
                    .dispatch(SubRequestPayload::Delete(c.key().to_vec()))
                    .await?;
                self.expect_empty(response)?
            }
            Command::Fetch(c) => {
                let response = self
                    .dispatch(SubRequestPayload::Fetch(c.key().to_vec()))
                    .await?;
                CommandOutput::Rows(self.expect_rows(response)?)
            }
            Command::ListKeys(_) => {
                let response = self.dispatch(SubRequestPayload::ListKeys).await?;
                CommandOutput::Rows(self.expect_rows(response)?)
            }
            Command::DescribeTable(_) => CommandOutput::Table(self.describe().await?),
            Command::Query(query) => CommandOutput::Rows(self.query(&query).await?),
        };
        debug!("{} on '{}' resolved", self.command, self.table);
        Ok(output)
    }

    async fn dispatch(&self, payload: SubRequestPayload) -> Result<SubResponse, CommandError> {
        self.transport
            .execute(SubRequest::new(self.table.clone(), payload))
            .await
            .context(RejectedSnafu {
                table: &self.table,
                command: self.command,
            })
    }

    async fn describe(&self) -> Result<TableDefinition, CommandError> {
        match self.dispatch(SubRequestPayload::DescribeTable).await? {
            SubResponse::Table(definition) => Ok(definition),
            other => self.unexpected(&other),
        }
    }

    async fn query(&self, query: &Query) -> Result<QueryResult, CommandError> {
        let definition = self.describe().await?;
        let select = match query.statement() {
            Statement::Describe { .. } => return Ok(QueryResult::describe_table(&definition)),
            Statement::Select(select) => select,
        };

        let plan = planner::plan_query(&definition, select, &self.config).context(QueryPlanSnafu {
            table: &self.table,
            command: self.command,
        })?;
        if plan.is_empty() {
            debug!("query on '{}' has an empty time range", self.table);
            return Ok(QueryResult::empty());
        }

        let parts = self.fan_out(&plan).await?;
        Ok(plan.merge(parts))
    }

    /// Run every piece of `plan`, at most `max_concurrent_subrequests` at a
    /// time, and return their results in plan order.
    async fn fan_out(&self, plan: &QueryPlan) -> Result<Vec<QueryResult>, CommandError> {
        let total = plan.len();
        let width = plan.columns().len();
        debug!(
            "fanning query on '{}' out to {total} sub-requests",
            self.table
        );

        let mut slots: Vec<Option<QueryResult>> = vec![None; total];
        let mut replies = stream::iter(plan.sub_queries().iter().cloned().enumerate())
            .map(|(index, spec)| async move {
                let reply = self.dispatch(SubRequestPayload::Query(spec)).await;
                (index, reply)
            })
            .buffer_unordered(self.config.max_concurrent_subrequests);

        while let Some((index, reply)) = replies.next().await {
            let part = reply
                .and_then(|response| self.expect_rows(response))
                .and_then(|part| self.check_width(part, width));
            match part {
                Ok(part) => {
                    trace!(
                        "sub-request {}/{total} on '{}' returned {} rows",
                        index + 1,
                        self.table,
                        part.rows_count()
                    );
                    slots[index] = Some(part);
                }
                Err(err) => {
                    warn!(
                        "sub-request {}/{total} on '{}' failed, failing the query: {err}",
                        index + 1,
                        self.table
                    );
                    return Err(err);
                }
            }
        }

        Ok(slots.into_iter().map(Option::unwrap_or_default).collect())
    }

    fn check_width(&self, part: QueryResult, width: usize) -> Result<QueryResult, CommandError> {
        match part.rows().iter().find(|row| row.len() != width) {
            Some(row) => Err(DataError::ArityMismatch {
                what: "row",
                expected: width,
                actual: row.len(),
            })
            .context(DataSnafu {
                table: &self.table,
                command: self.command,
            }),
            None => Ok(part),
        }
    }

    fn expect_empty(&self, response: SubResponse) -> Result<CommandOutput, CommandError> {
        match response {
            SubResponse::Empty => Ok(CommandOutput::Empty),
            other => self.unexpected(&other),
        }
    }

    fn expect_rows(&self, response: SubResponse) -> Result<QueryResult, CommandError> {
        match response {
            SubResponse::Rows(rows) => Ok(rows),
            SubResponse::Empty => Ok(QueryResult::empty()),
            other => self.unexpected(&other),
        }
    }

    fn unexpected<T>(&self, response: &SubResponse) -> Result<T, CommandError> {
        UnexpectedResponseSnafu {
            table: &self.table,
            command: self.command,
            details: response.describe(),
        }
        .fail()
    }
}
