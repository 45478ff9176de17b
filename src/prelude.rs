//! Convenient imports for common functionality.
//!
//! This module re-exports the most commonly used types so that
//! `use clickhouse_middleware::prelude::*;` is enough to get started.

pub use crate::capabilities::{ServerCapabilities, ServerVersion};
pub use crate::conditions::{Condition, ToConditionSql};
pub use crate::config::DatabaseConfig;
pub use crate::database::{Database, ModelStream, Page, RowStream, DEFAULT_BATCH_SIZE};
pub use crate::engines::{DatabaseEngine, MergeTreeSpec, TableEngine};
pub use crate::error::ClickhouseDbError;
pub use crate::migrations::{
    AlterTable, CreateTable, DEFAULT_UP_TO, DropTable, Migration, MigrationHistory,
    MigrationPackage, Operation, RunFn, RunSql,
};
pub use crate::model::{FieldDef, FieldDefault, FieldType, Model, ModelSchema, Record, Row};
pub use crate::server_error::ServerError;
pub use crate::session::{QueryOptions, Session};
pub use crate::transport::{HttpResponse, ReqwestTransport, Transport};
pub use crate::types::{FieldValue, InsertFormat, Settings};
