#![allow(dead_code)]

use std::sync::Arc;

use timeseries_client_core::{
    Cell, Client, ColumnType, CommandError, CreateTable, FullColumnDescription, Quantum,
    QuantumUnit, Row, Store, TableDefinition, memory::MemoryCluster,
};

pub type TestResult = Result<(), Box<dyn std::error::Error>>;

pub const TABLE: &str = "GeoCheckin";
pub const BAD_TABLE: &str = "GeoChicken";

pub const MINUTE: i64 = 60_000;
pub const QUANTUM_MS: i64 = 15 * MINUTE;

/// Fixed "now", 800 000 ms (13m20s) into its 15-minute quantum.
pub const NOW: i64 = 1_700_000_000_000;
pub const FIVE_MINS_AGO: i64 = NOW - 5 * MINUTE;
pub const TEN_MINS_AGO: i64 = NOW - 10 * MINUTE;
pub const FIFTEEN_MINS_AGO: i64 = NOW - 15 * MINUTE;
pub const TWENTY_MINS_AGO: i64 = NOW - 20 * MINUTE;
pub const FIFTEEN_MINS_IN_FUTURE: i64 = NOW + 15 * MINUTE;

pub fn geo_checkin() -> TableDefinition {
    TableDefinition::new(
        TABLE,
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
            FullColumnDescription::new("uv_index", ColumnType::Sint64, true),
            FullColumnDescription::new("observed", ColumnType::Boolean, false),
            FullColumnDescription::new("sensor_data", ColumnType::Blob, true),
        ],
    )
}

#[allow(clippy::too_many_arguments)]
fn row(
    geohash: &str,
    user: &str,
    time: i64,
    weather: &str,
    temperature: Option<f64>,
    uv_index: Option<i64>,
    observed: bool,
    sensor_data: Option<&'static [u8]>,
) -> Row {
    Row::new(vec![
        Cell::from(geohash),
        Cell::from(user),
        Cell::timestamp(time),
        Cell::from(weather),
        Cell::from(temperature),
        uv_index.map(Cell::sint64).unwrap_or(Cell::Null),
        Cell::boolean(observed),
        sensor_data.map(Cell::blob).unwrap_or(Cell::Null),
    ])
}

pub fn geo_rows() -> Vec<Row> {
    vec![
        row("hash1", "user1", FIFTEEN_MINS_AGO, "cloudy", Some(79.0), Some(1), true, Some(b"abc")),
        row("hash1", "user1", FIVE_MINS_AGO, "sunny", Some(80.5), Some(2), true, None),
        row("hash1", "user1", NOW, "sunny", Some(81.0), Some(10), false, Some(b"def")),
        row("hash1", "user2", TWENTY_MINS_AGO, "cloudy", Some(70.0), None, true, None),
        row("hash1", "user2", FIVE_MINS_AGO, "snowy", None, None, true, None),
        row("hash1", "user3", TEN_MINS_AGO, "rain", None, Some(3), false, None),
        row("hash2", "user4", FIVE_MINS_AGO, "cloudy", Some(82.0), None, true, None),
        row("hash2", "user5", FIFTEEN_MINS_AGO, "sunny", Some(79.9), Some(5), true, Some(b"ghi")),
    ]
}

pub fn key_of(row: &Row) -> Vec<Cell> {
    row.cells()[..3].to_vec()
}

/// Create the table and store every fixture row through `client`.
pub async fn seed(client: &Client) -> Result<(), CommandError> {
    let create = CreateTable::new(geo_checkin()).expect("fixture table is valid");
    client.execute(create).await?;
    let store = Store::builder(TABLE)
        .with_rows(geo_rows())
        .build()
        .expect("fixture rows are well formed");
    client.execute(store).await
}

/// A seeded cluster and a default client over it, with history cleared.
pub async fn seeded(cluster: MemoryCluster) -> Result<(Arc<MemoryCluster>, Client), CommandError> {
    let cluster = Arc::new(cluster);
    let client = Client::new(Arc::clone(&cluster));
    seed(&client).await?;
    cluster.clear_history();
    Ok((cluster, client))
}
