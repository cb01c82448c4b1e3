//! Persistence layer: libSQL-backed storage for rules, processed-message
//! markers and action records.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::Database;
