use std::collections::BTreeMap;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Engine of the database itself, used by `CREATE DATABASE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, ValueEnum, Serialize, Deserialize)]
pub enum DatabaseEngine {
    /// Default engine since ClickHouse 20.10
    #[default]
    Atomic,
    /// Legacy engine
    Ordinary,
    /// Keeps table metadata in memory only
    Memory,
}

impl DatabaseEngine {
    /// The fragment that follows `ENGINE = ` in `CREATE DATABASE`.
    #[must_use]
    pub fn create_database_sql(self) -> &'static str {
        match self {
            DatabaseEngine::Atomic => "Atomic",
            DatabaseEngine::Ordinary => "Ordinary",
            DatabaseEngine::Memory => "Memory",
        }
    }
}

/// Key and tuning clauses shared by the MergeTree family.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeTreeSpec {
    pub order_by: Vec<String>,
    pub partition_by: Vec<String>,
    pub primary_key: Vec<String>,
    pub sample_by: Option<String>,
    pub settings: BTreeMap<String, String>,
}

impl MergeTreeSpec {
    #[must_use]
    pub fn new<I, S>(order_by: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            order_by: order_by.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn partition_by<I, S>(mut self, exprs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.partition_by = exprs.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn primary_key<I, S>(mut self, exprs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_key = exprs.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn sample_by(mut self, expr: impl Into<String>) -> Self {
        self.sample_by = Some(expr.into());
        self
    }

    #[must_use]
    pub fn setting(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.settings.insert(name.into(), value.to_string());
        self
    }

    fn clauses(&self) -> String {
        let mut sql = String::new();
        if !self.partition_by.is_empty() {
            sql.push_str(&format!(" PARTITION BY ({})", self.partition_by.join(", ")));
        }
        if self.order_by.is_empty() {
            sql.push_str(" ORDER BY tuple()");
        } else {
            sql.push_str(&format!(" ORDER BY ({})", self.order_by.join(", ")));
        }
        if !self.primary_key.is_empty() {
            sql.push_str(&format!(" PRIMARY KEY ({})", self.primary_key.join(", ")));
        }
        if let Some(sample) = &self.sample_by {
            sql.push_str(&format!(" SAMPLE BY {sample}"));
        }
        if !self.settings.is_empty() {
            let pairs: Vec<String> = self
                .settings
                .iter()
                .map(|(name, value)| format!("{name} = {value}"))
                .collect();
            sql.push_str(&format!(" SETTINGS {}", pairs.join(", ")));
        }
        sql
    }
}

/// Storage engine of a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableEngine {
    Memory,
    Log,
    TinyLog,
    MergeTree(MergeTreeSpec),
    ReplacingMergeTree {
        spec: MergeTreeSpec,
        version_column: Option<String>,
    },
    SummingMergeTree {
        spec: MergeTreeSpec,
        sum_columns: Vec<String>,
    },
}

impl TableEngine {
    /// The text that follows `ENGINE = ` in `CREATE TABLE`.
    ///
    /// ```rust
    /// use clickhouse_middleware::engines::{MergeTreeSpec, TableEngine};
    ///
    /// let engine = TableEngine::MergeTree(
    ///     MergeTreeSpec::new(["id"]).partition_by(["toYYYYMM(created)"]),
    /// );
    /// assert_eq!(
    ///     engine.create_table_sql(),
    ///     "MergeTree() PARTITION BY (toYYYYMM(created)) ORDER BY (id)"
    /// );
    /// ```
    #[must_use]
    pub fn create_table_sql(&self) -> String {
        match self {
            TableEngine::Memory => "Memory".to_string(),
            TableEngine::Log => "Log".to_string(),
            TableEngine::TinyLog => "TinyLog".to_string(),
            TableEngine::MergeTree(spec) => format!("MergeTree(){}", spec.clauses()),
            TableEngine::ReplacingMergeTree {
                spec,
                version_column,
            } => format!(
                "ReplacingMergeTree({}){}",
                version_column.as_deref().unwrap_or_default(),
                spec.clauses()
            ),
            TableEngine::SummingMergeTree { spec, sum_columns } => {
                let columns = if sum_columns.is_empty() {
                    String::new()
                } else {
                    format!("({})", sum_columns.join(", "))
                };
                format!("SummingMergeTree({columns}){}", spec.clauses())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_engine_fragments() {
        assert_eq!(DatabaseEngine::default().create_database_sql(), "Atomic");
        assert_eq!(DatabaseEngine::Ordinary.create_database_sql(), "Ordinary");
    }

    #[test]
    fn merge_tree_with_all_clauses() {
        let spec = MergeTreeSpec::new(["a", "b"])
            .partition_by(["toYYYYMM(d)"])
            .primary_key(["a"])
            .sample_by("intHash32(a)")
            .setting("index_granularity", 8192);
        assert_eq!(
            TableEngine::MergeTree(spec).create_table_sql(),
            "MergeTree() PARTITION BY (toYYYYMM(d)) ORDER BY (a, b) PRIMARY KEY (a) SAMPLE BY intHash32(a) SETTINGS index_granularity = 8192"
        );
    }

    #[test]
    fn merge_tree_variants() {
        let replacing = TableEngine::ReplacingMergeTree {
            spec: MergeTreeSpec::new(["id"]),
            version_column: Some("ver".into()),
        };
        assert_eq!(
            replacing.create_table_sql(),
            "ReplacingMergeTree(ver) ORDER BY (id)"
        );
        let summing = TableEngine::SummingMergeTree {
            spec: MergeTreeSpec::default(),
            sum_columns: vec![],
        };
        assert_eq!(summing.create_table_sql(), "SummingMergeTree() ORDER BY tuple()");
    }
}
