//! Fan-out, merge, failure and cancellation behaviour of the execution
//! coordinator.

mod common;

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use common::*;
use timeseries_client_core::{
    Client, ClientConfig, ClusterTransport, CommandError, CommandKind, CommandOutput,
    CommandState, DescribeTable, ErrorKind, Fetch, Query, Store, SubRequest, SubRequestPayload,
    SubResponse, TransportError,
    memory::MemoryCluster,
    planner::{PlanError, TimeRange},
};

/// A transport with a bug: every request panics.
struct PanickingTransport;

#[async_trait]
impl ClusterTransport for PanickingTransport {
    async fn execute(&self, request: SubRequest) -> Result<SubResponse, TransportError> {
        panic!("transport bug while serving {}", request.kind());
    }
}

/// Start of the quantum containing `NOW`.
const NOW_QUANTUM: i64 = NOW - 800_000;

fn query(text: impl Into<String>) -> Query {
    Query::new(text).expect("query text parses")
}

fn query_range(request: &SubRequest) -> Option<TimeRange> {
    match &request.payload {
        SubRequestPayload::Query(spec) => spec.range,
        _ => None,
    }
}

/// Six quanta: from 4 quanta before `NOW`'s up to the one after it.
fn six_quanta_query() -> Query {
    query(format!(
        "select * from GeoCheckin where time >= {} and time < {}",
        NOW - 3_600_000,
        NOW + QUANTUM_MS
    ))
}

async fn settle_in_flight(cluster: &MemoryCluster, expected: usize) {
    for _ in 0..1_000 {
        if cluster.in_flight() == expected {
            return;
        }
        tokio::task::yield_now().await;
    }
}

#[tokio::test(start_paused = true)]
async fn first_failed_piece_fails_the_whole_query() -> TestResult {
    let cluster = MemoryCluster::builder()
        .latency(|request| match query_range(request) {
            Some(range) if range.start() != NOW_QUANTUM => Some(Duration::from_secs(10)),
            _ => None,
        })
        .build();
    let (cluster, client) = seeded(cluster).await?;
    cluster.fail_when(
        |request| query_range(request).is_some_and(|r| r.start() == NOW_QUANTUM),
        TransportError::new(ErrorKind::Transport, "connection reset by peer"),
    );

    let started = tokio::time::Instant::now();
    let err = client
        .execute(query(format!(
            "select * from GeoCheckin where time >= {TWENTY_MINS_AGO} and time < {NOW}"
        )))
        .await
        .expect_err("one piece failed");

    assert_eq!(err.kind(), ErrorKind::Transport);
    assert_eq!(err.command(), CommandKind::Query);
    assert!(err.to_string().contains("connection reset by peer"));
    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(cluster.query_ranges().len(), 2);
    assert_eq!(cluster.in_flight(), 0, "slow sibling must be dropped");
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn replies_arriving_out_of_order_merge_in_quantum_order() -> TestResult {
    // Earlier quanta answer later.
    let cluster = MemoryCluster::builder()
        .latency(|request| {
            query_range(request).map(|range| {
                let behind = (FIFTEEN_MINS_IN_FUTURE - range.start()) / QUANTUM_MS;
                Duration::from_secs(behind as u64 + 1)
            })
        })
        .build();
    let (cluster, client) = seeded(cluster).await?;

    let result = client
        .execute(query(format!(
            "select * from GeoCheckin where user = 'user1' and geohash = 'hash1' and \
             time >= {TWENTY_MINS_AGO} and time < {FIFTEEN_MINS_IN_FUTURE}"
        )))
        .await?;

    assert_eq!(result.rows(), &geo_rows()[0..3]);
    let starts: Vec<i64> = cluster
        .query_ranges()
        .into_iter()
        .flatten()
        .map(|r| r.start())
        .collect();
    assert_eq!(
        starts,
        vec![TWENTY_MINS_AGO, NOW_QUANTUM, NOW_QUANTUM + QUANTUM_MS]
    );
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn cancel_drops_in_flight_pieces() -> TestResult {
    let cluster = MemoryCluster::builder()
        .latency(|request| query_range(request).map(|_| Duration::from_secs(60)))
        .build();
    let (cluster, client) = seeded(cluster).await?;

    let pending = client.submit(query(format!(
        "select * from GeoCheckin where time >= {TWENTY_MINS_AGO} and time < {FIFTEEN_MINS_IN_FUTURE}"
    )));
    settle_in_flight(&cluster, 3).await;
    assert_eq!(cluster.in_flight(), 3);

    assert!(pending.cancel());
    let err = pending.wait().await.expect_err("cancelled");
    assert!(err.is_cancelled());
    assert_eq!(err.kind(), ErrorKind::Cancelled);
    assert!(matches!(pending.poll(), CommandState::Cancelled));
    assert!(!pending.cancel());

    settle_in_flight(&cluster, 0).await;
    assert_eq!(cluster.in_flight(), 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn fan_out_respects_the_concurrency_bound() -> TestResult {
    let cluster = MemoryCluster::builder()
        .latency(|request| query_range(request).map(|_| Duration::from_secs(1)))
        .build();
    let (cluster, _) = seeded(cluster).await?;
    let client = Client::with_config(
        Arc::clone(&cluster),
        ClientConfig {
            max_concurrent_subrequests: 2,
            ..ClientConfig::default()
        },
    )?;

    let result = client.execute(six_quanta_query()).await?;

    assert_eq!(result.rows_count(), 8);
    assert_eq!(cluster.query_ranges().len(), 6);
    assert_eq!(cluster.peak_in_flight(), 2);
    Ok(())
}

#[tokio::test]
async fn too_many_quanta_is_rejected_before_dispatch() -> TestResult {
    let (cluster, _) = seeded(MemoryCluster::new()).await?;
    let client = Client::with_config(
        Arc::clone(&cluster),
        ClientConfig {
            max_quanta_per_query: 3,
            ..ClientConfig::default()
        },
    )?;

    let err = client
        .execute(six_quanta_query())
        .await
        .expect_err("too many quanta");
    assert_eq!(err.kind(), ErrorKind::UnparsablePredicate);
    assert!(matches!(
        err,
        CommandError::QueryPlan {
            source: PlanError::TooManyQuanta {
                count: 6,
                max_quanta: 3
            },
            ..
        }
    ));
    assert!(cluster.query_ranges().is_empty());
    Ok(())
}

#[tokio::test]
async fn unparsable_time_bounds_fail_the_query() -> TestResult {
    let (cluster, client) = seeded(MemoryCluster::new()).await?;

    let err = client
        .execute(query(format!(
            "select * from GeoCheckin where time > {TEN_MINS_AGO} or user = 'user1'"
        )))
        .await
        .expect_err("time under OR");
    assert_eq!(err.kind(), ErrorKind::UnparsablePredicate);
    assert!(cluster.query_ranges().is_empty());
    Ok(())
}

#[tokio::test]
async fn empty_range_resolves_without_dispatching_pieces() -> TestResult {
    let (cluster, client) = seeded(MemoryCluster::new()).await?;

    let result = client
        .execute(query(format!(
            "select * from GeoCheckin where time > {NOW} and time < {NOW}"
        )))
        .await?;
    assert!(result.is_empty());
    assert!(result.column_descriptions().is_empty());

    let served = cluster.served();
    assert_eq!(served.len(), 1);
    assert_eq!(served[0].kind(), CommandKind::DescribeTable);

    let err = client
        .execute(query(format!(
            "select * from GeoChicken where time > {NOW} and time < {NOW}"
        )))
        .await
        .expect_err("unknown table");
    assert_eq!(err.kind(), ErrorKind::NotActive);
    Ok(())
}

#[tokio::test]
async fn quantum_origin_must_agree_with_the_cluster() -> TestResult {
    let text = format!(
        "select * from GeoCheckin where time >= {FIFTEEN_MINS_AGO} and time < {NOW}"
    );

    let shifted = ClientConfig {
        quantum_origin_ms: 5 * MINUTE,
        ..ClientConfig::default()
    };

    let (cluster, _) = seeded(MemoryCluster::new()).await?;
    let misaligned = Client::with_config(Arc::clone(&cluster), shifted.clone())?;
    let err = misaligned
        .execute(query(text.clone()))
        .await
        .expect_err("pieces straddle the cluster's quanta");
    assert_eq!(err.kind(), ErrorKind::UnparsablePredicate);

    let (cluster, _) =
        seeded(MemoryCluster::builder().quantum_origin_ms(5 * MINUTE).build()).await?;
    let aligned = Client::with_config(Arc::clone(&cluster), shifted)?;
    let result = aligned.execute(query(text)).await?;
    assert_eq!(result.rows_count(), 6);
    Ok(())
}

#[tokio::test]
async fn single_request_errors_pass_through_verbatim() -> TestResult {
    let (cluster, client) = seeded(MemoryCluster::new()).await?;
    cluster.fail_when(
        |request| matches!(request.payload, SubRequestPayload::Store(_)),
        TransportError::new(ErrorKind::OutOfOrderWrite, "rows must be written in key order"),
    );

    let err = client
        .execute(Store::builder(TABLE).with_row(geo_rows()[0].clone()).build()?)
        .await
        .expect_err("injected failure");
    assert_eq!(err.kind(), ErrorKind::OutOfOrderWrite);
    assert_eq!(err.command(), CommandKind::Store);
    assert_eq!(err.table(), TABLE);
    assert!(err.to_string().ends_with("rows must be written in key order"));
    Ok(())
}

#[tokio::test]
async fn poll_and_on_complete_observe_the_outcome() -> TestResult {
    let (_cluster, client) = seeded(MemoryCluster::new()).await?;

    let pending = client.submit(Fetch::new(TABLE, key_of(&geo_rows()[3]))?);
    assert!(pending.poll().is_pending());
    assert!(!pending.is_done());
    assert_eq!(pending.table(), TABLE);
    assert_eq!(pending.command(), CommandKind::Fetch);

    let (tx, rx) = tokio::sync::oneshot::channel();
    let callback = pending.on_complete(move |outcome| {
        let _ = tx.send(outcome.map(|rows| rows.rows_count()).map_err(|e| e.kind()));
    });
    assert_eq!(rx.await?, Ok(1));
    callback.await?;

    assert!(pending.is_done());
    assert!(matches!(
        pending.poll(),
        CommandState::Resolved(ref rows) if rows.rows_count() == 1
    ));
    assert!(!pending.cancel());
    assert_eq!(pending.await?.rows()[0], geo_rows()[3]);
    Ok(())
}

#[tokio::test]
async fn untyped_submission_resolves_to_command_output() -> TestResult {
    let (_cluster, client) = seeded(MemoryCluster::new()).await?;

    let output = client
        .submit_command(Fetch::new(TABLE, key_of(&geo_rows()[6]))?.into())
        .await?;
    match output {
        CommandOutput::Rows(rows) => assert_eq!(rows.rows(), &geo_rows()[6..7]),
        other => panic!("expected rows, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn panicking_transport_settles_the_handle() -> TestResult {
    let client = Client::new(Arc::new(PanickingTransport));

    let pending = client.submit(DescribeTable::new(TABLE)?);
    let (tx, rx) = tokio::sync::oneshot::channel();
    let callback = pending.on_complete(move |outcome| {
        let _ = tx.send(outcome.map(|_| ()).map_err(|e| e.kind()));
    });

    let err = tokio::time::timeout(Duration::from_secs(2), pending.wait())
        .await?
        .expect_err("task panicked");
    assert!(matches!(err, CommandError::Aborted { .. }));
    assert_eq!(err.kind(), ErrorKind::Transport);
    assert_eq!(err.table(), TABLE);
    assert_eq!(err.command(), CommandKind::DescribeTable);
    assert!(matches!(pending.poll(), CommandState::Failed(_)));
    assert!(!pending.cancel());

    assert_eq!(
        tokio::time::timeout(Duration::from_secs(2), rx).await??,
        Err(ErrorKind::Transport)
    );
    callback.await?;

    let err = tokio::time::timeout(
        Duration::from_secs(2),
        client.execute(query("select * from GeoCheckin")),
    )
    .await?
    .expect_err("task panicked");
    assert_eq!(err.command(), CommandKind::Query);
    assert!(err.to_string().contains("stopped before it settled"));
    Ok(())
}

#[tokio::test]
async fn invalid_config_is_rejected() {
    let err = Client::with_config(
        Arc::new(MemoryCluster::new()),
        ClientConfig {
            max_concurrent_subrequests: 0,
            ..ClientConfig::default()
        },
    )
    .expect_err("zero concurrency");
    assert!(err.to_string().contains("max_concurrent_subrequests"));
}
