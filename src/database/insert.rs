use std::sync::{Arc, Mutex};

use bytes::Bytes;
use futures_util::{StreamExt, stream};

use crate::capabilities::ServerCapabilities;
use crate::error::ClickhouseDbError;
use crate::model::{ModelSchema, Record};
use crate::session::QueryOptions;
use crate::transport::RequestBody;
use crate::types::InsertFormat;

use super::Database;

/// Records per chunk when the caller does not say.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// The error that stopped a batch stream, kept for the caller of `insert_with`.
///
/// Transports may wrap body-stream errors in their own error type, so the stream itself
/// only yields a stand-in.
pub(crate) type FailureSlot = Arc<Mutex<Option<ClickhouseDbError>>>;

/// Lazily turns records into body chunks of at most `batch_size` records each.
///
/// Only the first chunk carries the `INSERT` header; the chunks form one POST body.
pub(crate) struct InsertBatches<I: Iterator> {
    first: Option<I::Item>,
    rest: I,
    header: Option<String>,
    schema: Arc<ModelSchema>,
    format: InsertFormat,
    caps: ServerCapabilities,
    batch_size: usize,
    done: bool,
    failure: FailureSlot,
}

impl<I> InsertBatches<I>
where
    I: Iterator,
    I::Item: Record,
{
    pub(crate) fn new(
        first: I::Item,
        rest: I,
        header: String,
        caps: ServerCapabilities,
        batch_size: usize,
    ) -> Self {
        let schema = first.record_schema();
        let format = insert_format(&schema);
        Self {
            first: Some(first),
            rest,
            header: Some(header),
            schema,
            format,
            caps,
            batch_size,
            done: false,
            failure: FailureSlot::default(),
        }
    }

    pub(crate) fn failure(&self) -> FailureSlot {
        Arc::clone(&self.failure)
    }

    fn write(&self, record: &I::Item, buf: &mut Vec<u8>) -> Result<(), ClickhouseDbError> {
        let schema = record.record_schema();
        if schema.table_name() != self.schema.table_name() {
            return Err(ClickhouseDbError::ValidationError(format!(
                "cannot mix {} and {} records in one insert",
                self.schema.table_name(),
                schema.table_name()
            )));
        }
        record.write_line(self.format, &self.caps, buf)
    }

    fn fill(&mut self) -> Result<Option<Bytes>, ClickhouseDbError> {
        let mut buf = Vec::new();
        if let Some(header) = self.header.take() {
            buf.extend_from_slice(header.as_bytes());
        }
        let mut lines = 0;
        while lines < self.batch_size {
            let Some(record) = self.first.take().or_else(|| self.rest.next()) else {
                self.done = true;
                break;
            };
            self.write(&record, &mut buf)?;
            lines += 1;
        }
        if lines == 0 {
            return Ok(None);
        }
        tracing::debug!(records = lines, bytes = buf.len(), "insert chunk");
        Ok(Some(Bytes::from(buf)))
    }
}

impl<I> Iterator for InsertBatches<I>
where
    I: Iterator,
    I::Item: Record,
{
    type Item = Result<Bytes, ClickhouseDbError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.fill() {
            Ok(chunk) => chunk.map(Ok),
            Err(err) => {
                self.done = true;
                let stand_in =
                    ClickhouseDbError::ConnectionError(format!("insert body aborted: {err}"));
                if let Ok(mut slot) = self.failure.lock() {
                    slot.get_or_insert(err);
                }
                Some(Err(stand_in))
            }
        }
    }
}

/// TSKV when the kind has computed defaults, so unset values are left to the server.
fn insert_format(schema: &ModelSchema) -> InsertFormat {
    if schema.has_funcs_as_defaults() {
        InsertFormat::Tskv
    } else {
        InsertFormat::TabSeparated
    }
}

impl Database {
    /// [`Database::insert_with`] using [`DEFAULT_BATCH_SIZE`] and no extra options.
    ///
    /// # Errors
    /// See [`Database::insert_with`].
    pub async fn insert<I>(&self, records: I) -> Result<(), ClickhouseDbError>
    where
        I: IntoIterator,
        I::Item: Record,
        I::IntoIter: Send + 'static,
    {
        self.insert_with(records, DEFAULT_BATCH_SIZE, &QueryOptions::default())
            .await
    }

    /// Insert records of a single kind, streamed as one request in chunks of
    /// `batch_size` records.
    ///
    /// The input is read once and never held in memory as a whole. An empty input sends
    /// nothing.
    ///
    /// # Errors
    /// `ConfigError` for a zero batch size. `ValidationError` for read-only or system
    /// kinds (before anything is sent), for records of a different kind than the first,
    /// or for values that do not fit their field.
    pub async fn insert_with<I>(
        &self,
        records: I,
        batch_size: usize,
        options: &QueryOptions,
    ) -> Result<(), ClickhouseDbError>
    where
        I: IntoIterator,
        I::Item: Record,
        I::IntoIter: Send + 'static,
    {
        if batch_size == 0 {
            return Err(ClickhouseDbError::ConfigError(
                "batch size must be at least 1".to_string(),
            ));
        }
        let mut records = records.into_iter();
        let Some(first) = records.next() else {
            return Ok(());
        };
        let schema = first.record_schema();
        if schema.is_read_only() || schema.is_system() {
            return Err(ClickhouseDbError::ValidationError(
                "You can't insert into read only and system tables".to_string(),
            ));
        }

        let fields: Vec<String> = schema
            .writable_fields()
            .map(|field| format!("`{}`", field.name))
            .collect();
        let header = format!(
            "INSERT INTO $table ({}) FORMAT {}\n",
            fields.join(","),
            insert_format(&schema).as_str()
        );
        let header = self.substitute(&header, Some(&schema)).into_owned();

        let caps = self.capabilities().await?.clone();
        let batches = InsertBatches::new(first, records, header, caps, batch_size);
        let failure = batches.failure();
        let body = RequestBody::Streamed(stream::iter(batches).boxed());
        let sent = match self.dispatch(body, options).await {
            Ok(response) => response.bytes().await.map(drop),
            Err(err) => Err(err),
        };
        if let Some(err) = failure.lock().ok().and_then(|mut slot| slot.take()) {
            return Err(err);
        }
        sent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FieldDef, FieldType, Row};
    use crate::types::FieldValue;

    fn schema(name: &str) -> Arc<ModelSchema> {
        Arc::new(ModelSchema::new(name).field(FieldDef::new("n", FieldType::UInt32)))
    }

    fn rows(schema: &Arc<ModelSchema>, count: u64) -> Vec<Row> {
        (0..count)
            .map(|n| Row::from_values(Arc::clone(schema), vec![FieldValue::UInt(n)]).unwrap())
            .collect()
    }

    fn batches_with_failure(
        records: Vec<Row>,
        batch_size: usize,
    ) -> (Vec<Result<Bytes, ClickhouseDbError>>, FailureSlot) {
        let mut iter = records.into_iter();
        let first = iter.next().unwrap();
        let batches = InsertBatches::new(
            first,
            iter,
            "HEADER\n".to_string(),
            ServerCapabilities::default(),
            batch_size,
        );
        let failure = batches.failure();
        (batches.collect(), failure)
    }

    fn batches(records: Vec<Row>, batch_size: usize) -> Vec<Result<Bytes, ClickhouseDbError>> {
        batches_with_failure(records, batch_size).0
    }

    #[test]
    fn chunks_hold_batch_size_records() {
        let schema = schema("t");
        let chunks = batches(rows(&schema, 7), 3);
        let texts: Vec<String> = chunks
            .into_iter()
            .map(|chunk| String::from_utf8(chunk.unwrap().to_vec()).unwrap())
            .collect();
        assert_eq!(texts, vec!["HEADER\n0\n1\n2\n", "3\n4\n5\n", "6\n"]);
    }

    #[test]
    fn exact_multiple_has_no_empty_tail() {
        let schema = schema("t");
        assert_eq!(batches(rows(&schema, 4), 2).len(), 2);
        assert_eq!(batches(rows(&schema, 1), 5).len(), 1);
    }

    #[test]
    fn mixed_kinds_stop_the_stream() {
        let mut records = rows(&schema("a"), 2);
        records.extend(rows(&schema("b"), 2));
        let (chunks, failure) = batches_with_failure(records, 10);
        assert_eq!(chunks.len(), 1);
        assert!(matches!(chunks[0], Err(ClickhouseDbError::ConnectionError(_))));
        assert!(matches!(
            failure.lock().unwrap().take(),
            Some(ClickhouseDbError::ValidationError(_))
        ));
    }

    #[test]
    fn computed_defaults_select_tskv() {
        let plain = ModelSchema::new("t").field(FieldDef::new("a", FieldType::Int8));
        let computed = plain
            .clone()
            .field(FieldDef::new("b", FieldType::Date).with_default_expr("today()"));
        assert_eq!(insert_format(&plain), InsertFormat::TabSeparated);
        assert_eq!(insert_format(&computed), InsertFormat::Tskv);
    }
}
