// storage/mod.rs
// Database operations module

pub mod batch;
pub mod models;
pub mod pool;
pub mod schema;
pub mod sequence;

#[cfg(test)]
pub(crate) mod test_helpers;

// Re-export commonly used items
pub use batch::{BatchBuffer, BatchWriter, FlushResult};
pub use pool::{StoreConnector, StoreTarget};
pub use schema::{ensure_schema, next_free_id};
