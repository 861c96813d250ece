// storage/models.rs
// Database row types

use serde_json::Value;

use crate::models::SystemSnapshot;

/// One row of the telemetry table.
///
/// Nested structures are stored as JSON text. `created_at` is filled in by the
/// store and is not part of the insert.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreRow {
    pub id: i64,
    pub info: String,
    pub cpu_usage: f64,
    pub memory_usage: f64,
    pub disk_usage: String,
    pub processes: String,
    pub connections: String,
}

impl StoreRow {
    pub fn new(id: i64, snapshot: SystemSnapshot) -> Self {
        StoreRow {
            id,
            info: snapshot.info,
            cpu_usage: snapshot.cpu_usage,
            memory_usage: snapshot.memory_usage,
            disk_usage: Value::Object(snapshot.disk_usage).to_string(),
            processes: Value::from(snapshot.processes).to_string(),
            connections: Value::from(snapshot.connections).to_string(),
        }
    }
}
