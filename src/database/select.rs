use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::stream::{self, BoxStream, Stream};
use futures_util::StreamExt;

use crate::error::ClickhouseDbError;
use crate::model::{LineDecoder, Model, ModelSchema, Row};
use crate::session::QueryOptions;
use crate::transport::ResponseLines;
use crate::tsv;

use super::Database;

/// Table name of kinds synthesized from a response header.
pub const AD_HOC_TABLE: &str = "ad_hoc";

/// Rows of a `select`, decoded as their lines arrive.
///
/// Dropping the stream, exhausted or not, releases the response.
pub struct RowStream {
    schema: Arc<ModelSchema>,
    inner: BoxStream<'static, Result<Row, ClickhouseDbError>>,
}

impl RowStream {
    fn empty(schema: Arc<ModelSchema>) -> Self {
        Self {
            schema,
            inner: stream::empty().boxed(),
        }
    }

    /// The kind rows are decoded into; synthesized from the header when none was given.
    #[must_use]
    pub fn schema(&self) -> &Arc<ModelSchema> {
        &self.schema
    }
}

impl Stream for RowStream {
    type Item = Result<Row, ClickhouseDbError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

/// Typed records of a `select`.
pub struct ModelStream<M> {
    rows: RowStream,
    _model: PhantomData<fn() -> M>,
}

impl<M: Model> Stream for ModelStream<M> {
    type Item = Result<M, ClickhouseDbError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rows
            .poll_next_unpin(cx)
            .map(|item| item.map(|row| row.and_then(M::from_row)))
    }
}

/// Next data line as a row. Blank lines, such as the one before `WITH TOTALS` output,
/// are skipped.
async fn next_row(
    mut lines: ResponseLines,
    decoder: LineDecoder,
) -> Result<Option<(Row, (ResponseLines, LineDecoder))>, ClickhouseDbError> {
    loop {
        let Some(line) = lines.next_line().await? else {
            return Ok(None);
        };
        if line.trim().is_empty() {
            continue;
        }
        let row = decoder.decode(&line)?;
        return Ok(Some((row, (lines, decoder))));
    }
}

impl Database {
    /// Run a query and stream its rows.
    ///
    /// `FORMAT TabSeparatedWithNamesAndTypes` is appended, so the query must not carry a
    /// `FORMAT` clause of its own. `$db` and `$table` are substituted; `$table` needs a
    /// schema. Without one the rows get an ad-hoc kind built from the response header.
    ///
    /// # Errors
    /// Request failures and malformed headers. Errors in data lines surface as stream items.
    pub async fn select_rows(
        &self,
        query: &str,
        schema: Option<Arc<ModelSchema>>,
        options: &QueryOptions,
    ) -> Result<RowStream, ClickhouseDbError> {
        let query = format!("{query} FORMAT TabSeparatedWithNamesAndTypes");
        let query = self.substitute(&query, schema.as_deref()).into_owned();
        let timezone = self.capabilities().await?.timezone;
        let response = self.dispatch(query.into(), options).await?;

        let mut lines = response.into_lines();
        let header = match (lines.next_line().await?, lines.next_line().await?) {
            (Some(names), Some(types)) => Some((tsv::parse_tsv(&names)?, tsv::parse_tsv(&types)?)),
            _ => None,
        };
        let Some((names, types)) = header else {
            let schema = schema.unwrap_or_else(|| Arc::new(ModelSchema::new(AD_HOC_TABLE)));
            return Ok(RowStream::empty(schema));
        };

        let schema = match schema {
            Some(schema) => schema,
            None => Arc::new(ModelSchema::ad_hoc(
                names.iter().cloned().zip(types.iter()),
                AD_HOC_TABLE,
            )?),
        };
        let decoder = LineDecoder::new(Arc::clone(&schema), &names, timezone)?;
        let inner = stream::try_unfold((lines, decoder), |(lines, decoder)| {
            next_row(lines, decoder)
        })
        .boxed();
        Ok(RowStream { schema, inner })
    }

    /// Run a query and stream records of `M`.
    ///
    /// ```rust,no_run
    /// use clickhouse_middleware::prelude::*;
    /// use futures_util::TryStreamExt;
    ///
    /// # async fn run(db: &Database) -> Result<(), ClickhouseDbError> {
    /// let applied: Vec<MigrationHistory> = db
    ///     .select::<MigrationHistory>("SELECT * FROM $table", &QueryOptions::default())
    ///     .await?
    ///     .try_collect()
    ///     .await?;
    /// # let _ = applied;
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    /// See [`Database::select_rows`].
    pub async fn select<M: Model>(
        &self,
        query: &str,
        options: &QueryOptions,
    ) -> Result<ModelStream<M>, ClickhouseDbError> {
        let rows = self.select_rows(query, Some(M::schema()), options).await?;
        Ok(ModelStream {
            rows,
            _model: PhantomData,
        })
    }
}
