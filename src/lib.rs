//! A ClickHouse client over the HTTP interface.
//!
//! [`Database`] probes the server once, then sends statements with layered settings,
//! streams inserts in bounded chunks, decodes `select` results lazily, paginates and
//! runs recorded migrations.
//!
//! ```rust,no_run
//! use clickhouse_middleware::prelude::*;
//! use futures_util::TryStreamExt;
//!
//! # async fn run() -> Result<(), ClickhouseDbError> {
//! let db = Database::connect(DatabaseConfig::new("analytics")).await?;
//! let rows: Vec<Row> = db
//!     .select_rows("SELECT name, value FROM system.settings LIMIT 5", None, &QueryOptions::default())
//!     .await?
//!     .try_collect()
//!     .await?;
//! for row in &rows {
//!     println!("{:?} = {:?}", row.get("name"), row.get("value"));
//! }
//! # Ok(())
//! # }
//! ```

pub mod capabilities;
pub mod conditions;
pub mod config;
pub mod database;
pub mod engines;
pub mod error;
pub mod migrations;
pub mod model;
pub mod prelude;
pub mod server_error;
pub mod session;
pub mod transport;
pub mod tsv;
pub mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use capabilities::{ServerCapabilities, ServerVersion};
pub use config::DatabaseConfig;
pub use database::{Database, Page};
pub use error::ClickhouseDbError;
pub use server_error::ServerError;
