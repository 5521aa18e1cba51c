//! An in-process cluster that follows the store's observable conventions.
//!
//! [`MemoryCluster`] implements [`ClusterTransport`] over plain maps. It is
//! strict where the real store is strict: unknown tables are not active,
//! rows must match their table, a delete of a missing key is an error, and a
//! query sub-request must stay inside one quantum. It also records what it
//! served and can inject latency and failures, which is what the coordinator
//! tests lean on.

use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use log::trace;

use crate::{
    data::{self, Cell, QueryResult, Row},
    error::ErrorKind,
    planner::{self, QuerySpec, TimeRange},
    predicate,
    schema::{self, TableDefinition},
    transport::{ClusterTransport, SubRequest, SubRequestPayload, SubResponse, TransportError},
};

/// Message a secured cluster answers unsecured sessions with.
pub const SECURITY_REQUIRED_MESSAGE: &str = "Security is enabled, please STARTTLS first";

type LatencyFn = dyn Fn(&SubRequest) -> Option<Duration> + Send + Sync;
type Matcher = dyn Fn(&SubRequest) -> bool + Send + Sync;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum KeyPart {
    Int(i64),
    Bytes(Bytes),
}

fn key_part(cell: &Cell) -> Option<KeyPart> {
    match cell {
        Cell::Varchar(b) | Cell::Blob(b) => Some(KeyPart::Bytes(b.clone())),
        Cell::Timestamp(v) | Cell::Sint64(v) => Some(KeyPart::Int(*v)),
        _ => None,
    }
}

struct MemoryTable {
    definition: TableDefinition,
    rows: BTreeMap<Vec<KeyPart>, Row>,
}

fn key_of<'a>(cells: impl IntoIterator<Item = &'a Cell>) -> Vec<KeyPart> {
    cells.into_iter().filter_map(key_part).collect()
}

impl MemoryTable {
    fn row_key(&self, row: &Row) -> Vec<KeyPart> {
        let indices = self.definition.local_key_indices();
        key_of(indices.iter().filter_map(|&i| row.get(i)))
    }
}

struct FailureRule {
    matcher: Box<Matcher>,
    error: TransportError,
}

/// Builder for [`MemoryCluster`].
#[derive(Default)]
pub struct MemoryClusterBuilder {
    require_security: bool,
    secured_session: bool,
    quantum_origin_ms: i64,
    latency: Option<Arc<LatencyFn>>,
}

impl MemoryClusterBuilder {
    /// Reject sessions that have not negotiated security.
    pub fn require_security(mut self, required: bool) -> Self {
        self.require_security = required;
        self
    }

    /// Whether this session negotiated security.
    pub fn secured_session(mut self, secured: bool) -> Self {
        self.secured_session = secured;
        self
    }

    /// Quantum alignment origin; must match the client's.
    pub fn quantum_origin_ms(mut self, origin: i64) -> Self {
        self.quantum_origin_ms = origin;
        self
    }

    /// Delay each sub-request by what `latency` returns for it.
    pub fn latency<F>(mut self, latency: F) -> Self
    where
        F: Fn(&SubRequest) -> Option<Duration> + Send + Sync + 'static,
    {
        self.latency = Some(Arc::new(latency));
        self
    }

    /// Build the cluster with no tables.
    pub fn build(self) -> MemoryCluster {
        MemoryCluster {
            tables: Mutex::new(HashMap::new()),
            require_security: self.require_security,
            secured_session: self.secured_session,
            quantum_origin_ms: self.quantum_origin_ms,
            latency: self.latency,
            failures: Mutex::new(Vec::new()),
            served: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }
}

/// An in-memory cluster.
pub struct MemoryCluster {
    tables: Mutex<HashMap<String, MemoryTable>>,
    require_security: bool,
    secured_session: bool,
    quantum_origin_ms: i64,
    latency: Option<Arc<LatencyFn>>,
    failures: Mutex<Vec<FailureRule>>,
    served: Mutex<Vec<SubRequest>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl fmt::Debug for MemoryCluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryCluster")
            .field("tables", &lock(&self.tables).keys().collect::<Vec<_>>())
            .field("require_security", &self.require_security)
            .field("secured_session", &self.secured_session)
            .field("in_flight", &self.in_flight())
            .finish_non_exhaustive()
    }
}

impl Default for MemoryCluster {
    fn default() -> Self {
        MemoryCluster::builder().build()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize, peak: &AtomicUsize) -> Self {
        let now = counter.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        InFlight(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

fn not_active(table: &str) -> TransportError {
    TransportError::new(ErrorKind::NotActive, format!("{table} is not an active table"))
}

impl MemoryCluster {
    /// An unsecured cluster with epoch-aligned quanta.
    pub fn new() -> Self {
        MemoryCluster::default()
    }

    /// Start configuring a cluster.
    pub fn builder() -> MemoryClusterBuilder {
        MemoryClusterBuilder::default()
    }

    /// Fail every later sub-request matching `matcher` with `error`.
    /// Rules are checked in registration order.
    pub fn fail_when<F>(&self, matcher: F, error: TransportError)
    where
        F: Fn(&SubRequest) -> bool + Send + Sync + 'static,
    {
        lock(&self.failures).push(FailureRule {
            matcher: Box::new(matcher),
            error,
        });
    }

    /// Every sub-request received so far, in arrival order.
    pub fn served(&self) -> Vec<SubRequest> {
        lock(&self.served).clone()
    }

    /// Time ranges of the query sub-requests received so far.
    pub fn query_ranges(&self) -> Vec<Option<TimeRange>> {
        lock(&self.served)
            .iter()
            .filter_map(|request| match &request.payload {
                SubRequestPayload::Query(spec) => Some(spec.range),
                _ => None,
            })
            .collect()
    }

    /// Forget recorded sub-requests and the in-flight peak.
    pub fn clear_history(&self) {
        lock(&self.served).clear();
        self.peak_in_flight.store(0, Ordering::SeqCst);
    }

    /// Sub-requests currently executing.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Most sub-requests ever executing at once.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Number of rows stored in `table`, if it exists.
    pub fn row_count(&self, table: &str) -> Option<usize> {
        lock(&self.tables).get(table).map(|t| t.rows.len())
    }

    fn apply(&self, request: SubRequest) -> Result<SubResponse, TransportError> {
        let SubRequest { table, payload } = request;
        let mut tables = lock(&self.tables);

        if let SubRequestPayload::CreateTable(definition) = payload {
            schema::validate(&definition)
                .map_err(|e| TransportError::new(ErrorKind::Schema, e.to_string()))?;
            if tables.contains_key(definition.name()) {
                return Err(TransportError::new(
                    ErrorKind::Schema,
                    format!("table {} already exists", definition.name()),
                ));
            }
            tables.insert(
                definition.name().to_string(),
                MemoryTable {
                    definition,
                    rows: BTreeMap::new(),
                },
            );
            return Ok(SubResponse::Empty);
        }

        let entry = tables.get_mut(&table).ok_or_else(|| not_active(&table))?;
        let type_mismatch =
            |e: data::DataError| TransportError::new(ErrorKind::TypeMismatch, e.to_string());

        match payload {
            SubRequestPayload::CreateTable(_) => Ok(SubResponse::Empty),
            SubRequestPayload::Store(rows) => {
                for row in &rows {
                    data::matches(row, &entry.definition).map_err(type_mismatch)?;
                }
                for row in rows {
                    let key = entry.row_key(&row);
                    entry.rows.insert(key, row);
                }
                Ok(SubResponse::Empty)
            }
            SubRequestPayload::Fetch(key) => {
                data::matches_key(&key, &entry.definition).map_err(type_mismatch)?;
                let found = entry.rows.get(&key_of(&key));
                Ok(SubResponse::Rows(match found {
                    Some(row) => QueryResult::new(
                        entry.definition.column_descriptions(),
                        vec![row.clone()],
                    ),
                    None => QueryResult::empty(),
                }))
            }
            SubRequestPayload::Delete(key) => {
                data::matches_key(&key, &entry.definition).map_err(type_mismatch)?;
                let removed = entry.rows.remove(&key_of(&key));
                match removed {
                    Some(_) => Ok(SubResponse::Empty),
                    None => Err(TransportError::new(ErrorKind::NotFound, "notfound")),
                }
            }
            SubRequestPayload::ListKeys => {
                let indices = entry.definition.local_key_indices();
                let all = entry.definition.column_descriptions();
                let columns = indices.iter().map(|&i| all[i].clone()).collect();
                let keys: Vec<Row> = entry.rows.values().map(|row| row.project(&indices)).collect();
                Ok(SubResponse::Rows(if keys.is_empty() {
                    QueryResult::empty()
                } else {
                    QueryResult::new(columns, keys)
                }))
            }
            SubRequestPayload::Query(spec) => self.query(entry, &spec).map(SubResponse::Rows),
            SubRequestPayload::DescribeTable => Ok(SubResponse::Table(entry.definition.clone())),
        }
    }

    fn query(&self, table: &MemoryTable, spec: &QuerySpec) -> Result<QueryResult, TransportError> {
        let definition = &table.definition;
        let unparsable =
            |message: String| TransportError::new(ErrorKind::UnparsablePredicate, message);

        let time_index = definition
            .index_of(&spec.time_column)
            .ok_or_else(|| unparsable(format!("unknown time column {}", spec.time_column)))?;

        if let Some(range) = spec.range {
            if range.is_empty() {
                return Ok(QueryResult::empty());
            }
            let width = schema::quantum_width(definition)
                .map_err(|e| TransportError::new(ErrorKind::Schema, e.to_string()))?
                .num_milliseconds();
            let first = planner::quantum_start(range.start(), width, self.quantum_origin_ms);
            let last = planner::quantum_start(range.end() - 1, width, self.quantum_origin_ms);
            if first != last {
                return Err(unparsable(format!(
                    "query range {range} spans more than one quantum"
                )));
            }
        }

        let residual = spec
            .residual
            .as_deref()
            .map(predicate::parse_predicate)
            .transpose()
            .map_err(|e| unparsable(e.to_string()))?;

        let projection = spec
            .projection
            .iter()
            .map(|name| {
                definition
                    .index_of(name)
                    .ok_or_else(|| unparsable(format!("unknown column {name}")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let columns = definition.column_descriptions();
        let mut rows = Vec::new();
        for row in table.rows.values() {
            if let Some(range) = spec.range {
                let at = row.get(time_index).and_then(|c| c.as_timestamp().ok().flatten());
                if !at.is_some_and(|t| range.contains(t)) {
                    continue;
                }
            }
            if let Some(residual) = &residual {
                if !residual
                    .evaluate(&columns, row)
                    .map_err(|e| unparsable(e.to_string()))?
                {
                    continue;
                }
            }
            rows.push(row.project(&projection));
        }

        if rows.is_empty() {
            return Ok(QueryResult::empty());
        }
        let projected = projection.iter().map(|&i| columns[i].clone()).collect();
        Ok(QueryResult::new(projected, rows))
    }
}

#[async_trait]
impl ClusterTransport for MemoryCluster {
    async fn execute(&self, request: SubRequest) -> Result<SubResponse, TransportError> {
        let _guard = InFlight::enter(&self.in_flight, &self.peak_in_flight);
        lock(&self.served).push(request.clone());
        trace!("memory cluster serving {} on '{}'", request.kind(), request.table);

        if self.require_security && !self.secured_session {
            return Err(TransportError::new(
                ErrorKind::SecurityRequired,
                SECURITY_REQUIRED_MESSAGE,
            ));
        }

        let injected = lock(&self.failures)
            .iter()
            .find(|rule| (rule.matcher)(&request))
            .map(|rule| rule.error.clone());

        if let Some(delay) = self.latency.as_ref().and_then(|latency| latency(&request)) {
            tokio::time::sleep(delay).await;
        }

        match injected {
            Some(error) => Err(error),
            None => self.apply(request),
        }
    }
}
