//! Ordered, recorded schema migrations.

use std::collections::{BTreeSet, HashSet};

use chrono::Local;
use futures_util::TryStreamExt;

use crate::database::Database;
use crate::error::ClickhouseDbError;
use crate::model::Model;
use crate::session::QueryOptions;
use crate::tsv;

mod history;
mod operations;

pub use history::{HISTORY_TABLE, MigrationHistory};
pub use operations::{AlterTable, CreateTable, DropTable, Operation, RunFn, RunSql};

/// Apply every pending migration.
pub const DEFAULT_UP_TO: u32 = 9999;

/// A named unit of operations, applied together and recorded once.
#[derive(Default)]
pub struct Migration {
    pub name: String,
    pub operations: Vec<Box<dyn Operation>>,
}

impl Migration {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            operations: Vec::new(),
        }
    }

    #[must_use]
    pub fn operation(mut self, operation: impl Operation + 'static) -> Self {
        self.operations.push(Box::new(operation));
        self
    }

    /// Leading digits of the name, at most four, e.g. `12` for `0012_add_index`.
    #[must_use]
    pub fn number(&self) -> Option<u32> {
        let digits: String = self
            .name
            .chars()
            .take(4)
            .take_while(char::is_ascii_digit)
            .collect();
        digits.parse().ok()
    }
}

impl std::fmt::Debug for Migration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let operations: Vec<String> = self.operations.iter().map(|op| op.describe()).collect();
        f.debug_struct("Migration")
            .field("name", &self.name)
            .field("operations", &operations)
            .finish()
    }
}

/// The migrations of one application, identified by `name` in the history table.
#[derive(Debug, Default)]
pub struct MigrationPackage {
    pub name: String,
    pub migrations: Vec<Migration>,
}

impl MigrationPackage {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            migrations: Vec::new(),
        }
    }

    #[must_use]
    pub fn migration(mut self, migration: Migration) -> Self {
        self.migrations.push(migration);
        self
    }

    fn check_unique_names(&self) -> Result<(), ClickhouseDbError> {
        let mut seen = HashSet::new();
        for migration in &self.migrations {
            if !seen.insert(migration.name.as_str()) {
                return Err(ClickhouseDbError::ConfigError(format!(
                    "migration {} is registered twice in {}",
                    migration.name, self.name
                )));
            }
        }
        Ok(())
    }
}

impl Database {
    /// Names of the migrations of `package_name` already recorded as applied.
    ///
    /// Creates the history table if needed.
    ///
    /// # Errors
    /// Any request failure.
    pub async fn applied_migrations(
        &self,
        package_name: &str,
    ) -> Result<BTreeSet<String>, ClickhouseDbError> {
        let schema = MigrationHistory::schema();
        self.create_table(&schema).await?;
        let query = format!(
            "SELECT module_name FROM $table WHERE package_name = {}",
            tsv::quote(package_name)
        );
        self.select::<MigrationHistory>(&query, &QueryOptions::default())
            .await?
            .map_ok(|history| history.module_name)
            .try_collect()
            .await
    }

    /// Apply the package's pending migrations in name order and record each one.
    ///
    /// The run stops after applying the first migration whose number (see
    /// [`Migration::number`]) is at least `up_to`. Returns the names applied.
    ///
    /// # Errors
    /// `ConfigError` for duplicate names. `MigrationError` when an operation fails; the
    /// failing migration is not recorded and earlier ones stay recorded.
    pub async fn migrate(
        &self,
        package: &MigrationPackage,
        up_to: u32,
    ) -> Result<Vec<String>, ClickhouseDbError> {
        package.check_unique_names()?;
        let applied = self.applied_migrations(&package.name).await?;

        let mut pending: Vec<&Migration> = package
            .migrations
            .iter()
            .filter(|migration| !applied.contains(&migration.name))
            .collect();
        pending.sort_by(|a, b| a.name.cmp(&b.name));

        let mut done = Vec::new();
        for migration in pending {
            tracing::info!(package = %package.name, migration = %migration.name, "Applying migration");
            for operation in &migration.operations {
                tracing::debug!(operation = %operation.describe(), "migration step");
                operation
                    .apply(self)
                    .await
                    .map_err(|err| ClickhouseDbError::MigrationError {
                        migration: migration.name.clone(),
                        source: Box::new(err),
                    })?;
            }
            self.insert(vec![MigrationHistory {
                package_name: package.name.clone(),
                module_name: migration.name.clone(),
                applied: Local::now().date_naive(),
            }])
            .await?;
            done.push(migration.name.clone());
            if migration.number().is_some_and(|number| number >= up_to) {
                break;
            }
        }
        Ok(done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migration_numbers() {
        assert_eq!(Migration::new("0001_initial").number(), Some(1));
        assert_eq!(Migration::new("0012").number(), Some(12));
        assert_eq!(Migration::new("123456_long").number(), Some(1234));
        assert_eq!(Migration::new("initial").number(), None);
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let package = MigrationPackage::new("app")
            .migration(Migration::new("0001_a"))
            .migration(Migration::new("0001_a"));
        assert!(matches!(
            package.check_unique_names(),
            Err(ClickhouseDbError::ConfigError(_))
        ));
    }
}
