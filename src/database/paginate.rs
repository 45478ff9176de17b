use std::sync::Arc;

use futures_util::TryStreamExt;

use crate::conditions::{ToConditionSql, where_clause};
use crate::error::ClickhouseDbError;
use crate::model::{Model, ModelSchema, Row};
use crate::session::QueryOptions;

use super::Database;

/// One page of an ordered result set.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub objects: Vec<T>,
    /// Records matching the conditions, across all pages
    pub number_of_objects: u64,
    pub pages_total: u64,
    /// 1-based page number, after resolving `-1`
    pub number: u64,
    pub page_size: u64,
}

/// Count-derived facts of a page, and the query for its records when there are any.
struct PagePlan {
    count: u64,
    pages_total: u64,
    number: u64,
    query: Option<String>,
}

/// `-1` is the last page, which is page 1 for an empty table.
fn resolve_page_number(page_num: i64, pages_total: u64) -> Result<u64, ClickhouseDbError> {
    match page_num {
        -1 => Ok(pages_total.max(1)),
        n if n < 1 => Err(ClickhouseDbError::ConfigError(format!(
            "Invalid page number: {n}"
        ))),
        n => u64::try_from(n)
            .map_err(|_| ClickhouseDbError::ConfigError(format!("Invalid page number: {n}"))),
    }
}

impl Database {
    async fn plan_page(
        &self,
        schema: &ModelSchema,
        order_by: &str,
        page_num: i64,
        page_size: u64,
        conditions: Option<&dyn ToConditionSql>,
    ) -> Result<PagePlan, ClickhouseDbError> {
        if page_size == 0 {
            return Err(ClickhouseDbError::ConfigError(
                "page size must be at least 1".to_string(),
            ));
        }
        if page_num < 1 && page_num != -1 {
            return Err(ClickhouseDbError::ConfigError(format!(
                "Invalid page number: {page_num}"
            )));
        }
        let count = self.count(schema, conditions).await?;
        let pages_total = count.div_ceil(page_size);
        let number = resolve_page_number(page_num, pages_total)?;

        let query = if count > 0 {
            let offset = (number - 1).saturating_mul(page_size);
            Some(format!(
                "SELECT * FROM $table{} ORDER BY {order_by} LIMIT {offset}, {page_size}",
                where_clause(conditions, schema)?
            ))
        } else {
            None
        };
        Ok(PagePlan {
            count,
            pages_total,
            number,
            query,
        })
    }

    /// One page of rows of `schema`'s table, ordered by `order_by`.
    ///
    /// `page_num` is 1-based; `-1` asks for the last page. Records are only queried when
    /// the count is non-zero.
    ///
    /// # Errors
    /// `ConfigError` for a page number below 1 (other than `-1`) or a zero page size,
    /// plus any request failure.
    pub async fn paginate_rows(
        &self,
        schema: Arc<ModelSchema>,
        order_by: &str,
        page_num: i64,
        page_size: u64,
        conditions: Option<&dyn ToConditionSql>,
        options: &QueryOptions,
    ) -> Result<Page<Row>, ClickhouseDbError> {
        let plan = self
            .plan_page(&schema, order_by, page_num, page_size, conditions)
            .await?;
        let objects = match &plan.query {
            Some(query) => {
                self.select_rows(query, Some(schema), options)
                    .await?
                    .try_collect()
                    .await?
            }
            None => Vec::new(),
        };
        Ok(Page {
            objects,
            number_of_objects: plan.count,
            pages_total: plan.pages_total,
            number: plan.number,
            page_size,
        })
    }

    /// [`Database::paginate_rows`] for a typed record-kind.
    ///
    /// # Errors
    /// See [`Database::paginate_rows`].
    pub async fn paginate<M: Model>(
        &self,
        order_by: &str,
        page_num: i64,
        page_size: u64,
        conditions: Option<&dyn ToConditionSql>,
        options: &QueryOptions,
    ) -> Result<Page<M>, ClickhouseDbError> {
        let schema = M::schema();
        let plan = self
            .plan_page(&schema, order_by, page_num, page_size, conditions)
            .await?;
        let objects = match &plan.query {
            Some(query) => self.select::<M>(query, options).await?.try_collect().await?,
            None => Vec::new(),
        };
        Ok(Page {
            objects,
            number_of_objects: plan.count,
            pages_total: plan.pages_total,
            number: plan.number,
            page_size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_numbers() {
        assert_eq!(resolve_page_number(-1, 10).unwrap(), 10);
        assert_eq!(resolve_page_number(-1, 0).unwrap(), 1);
        assert_eq!(resolve_page_number(3, 10).unwrap(), 3);
        assert!(matches!(
            resolve_page_number(0, 10),
            Err(ClickhouseDbError::ConfigError(_))
        ));
        assert!(resolve_page_number(-2, 10).is_err());
    }
}
