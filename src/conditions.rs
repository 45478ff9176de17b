use crate::error::ClickhouseDbError;
use crate::model::ModelSchema;
use crate::types::FieldValue;

/// Something that renders to the body of a `WHERE` clause.
pub trait ToConditionSql: Send + Sync {
    /// # Errors
    /// Returns `ValidationError` if the condition names a field the schema lacks.
    fn to_condition_sql(&self, schema: &ModelSchema) -> Result<String, ClickhouseDbError>;
}

impl ToConditionSql for &str {
    fn to_condition_sql(&self, _schema: &ModelSchema) -> Result<String, ClickhouseDbError> {
        Ok(self.to_string())
    }
}

impl ToConditionSql for String {
    fn to_condition_sql(&self, _schema: &ModelSchema) -> Result<String, ClickhouseDbError> {
        Ok(self.clone())
    }
}

/// ` WHERE <conditions>`, or nothing when there are none or they render blank.
pub(crate) fn where_clause(
    conditions: Option<&dyn ToConditionSql>,
    schema: &ModelSchema,
) -> Result<String, ClickhouseDbError> {
    let Some(conditions) = conditions else {
        return Ok(String::new());
    };
    let sql = conditions.to_condition_sql(schema)?;
    if sql.trim().is_empty() {
        Ok(String::new())
    } else {
        Ok(format!(" WHERE {sql}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl CompareOp {
    fn as_str(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "!=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
        }
    }
}

/// Composable boolean expression over the fields of a record-kind.
///
/// ```rust
/// use clickhouse_middleware::prelude::*;
///
/// let schema = ModelSchema::new("people")
///     .field(FieldDef::new("first_name", FieldType::String))
///     .field(FieldDef::new("height", FieldType::Float32));
/// let cond = Condition::eq("first_name", "Ada").and(Condition::gt("height", 1.7));
/// assert_eq!(
///     cond.to_condition_sql(&schema).unwrap(),
///     "(`first_name` = 'Ada') AND (`height` > 1.7)"
/// );
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Raw(String),
    Compare {
        field: String,
        op: CompareOp,
        value: FieldValue,
    },
    In {
        field: String,
        values: Vec<FieldValue>,
    },
    And(Vec<Condition>),
    Or(Vec<Condition>),
    Not(Box<Condition>),
}

impl Condition {
    #[must_use]
    pub fn raw(sql: impl Into<String>) -> Self {
        Condition::Raw(sql.into())
    }

    fn compare(field: impl Into<String>, op: CompareOp, value: impl Into<FieldValue>) -> Self {
        Condition::Compare {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    #[must_use]
    pub fn eq(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self::compare(field, CompareOp::Eq, value)
    }

    #[must_use]
    pub fn ne(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self::compare(field, CompareOp::Ne, value)
    }

    #[must_use]
    pub fn gt(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self::compare(field, CompareOp::Gt, value)
    }

    #[must_use]
    pub fn ge(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self::compare(field, CompareOp::Ge, value)
    }

    #[must_use]
    pub fn lt(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self::compare(field, CompareOp::Lt, value)
    }

    #[must_use]
    pub fn le(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self::compare(field, CompareOp::Le, value)
    }

    #[must_use]
    pub fn in_list<I, V>(field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<FieldValue>,
    {
        Condition::In {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    #[must_use]
    pub fn and(self, other: Condition) -> Self {
        match self {
            Condition::And(mut parts) => {
                parts.push(other);
                Condition::And(parts)
            }
            first => Condition::And(vec![first, other]),
        }
    }

    #[must_use]
    pub fn or(self, other: Condition) -> Self {
        match self {
            Condition::Or(mut parts) => {
                parts.push(other);
                Condition::Or(parts)
            }
            first => Condition::Or(vec![first, other]),
        }
    }

    #[must_use]
    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Condition::Not(Box::new(self))
    }

    fn join(parts: &[Condition], glue: &str, schema: &ModelSchema) -> Result<String, ClickhouseDbError> {
        if parts.is_empty() {
            return Ok("1".to_string());
        }
        let rendered = parts
            .iter()
            .map(|part| part.to_condition_sql(schema).map(|sql| format!("({sql})")))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rendered.join(glue))
    }
}

fn checked_field<'a>(schema: &ModelSchema, field: &'a str) -> Result<&'a str, ClickhouseDbError> {
    if schema.get_field(field).is_some() {
        Ok(field)
    } else {
        Err(ClickhouseDbError::ValidationError(format!(
            "{} has no field {field}",
            schema.table_name()
        )))
    }
}

impl ToConditionSql for Condition {
    fn to_condition_sql(&self, schema: &ModelSchema) -> Result<String, ClickhouseDbError> {
        match self {
            Condition::Raw(sql) => Ok(sql.clone()),
            Condition::Compare { field, op, value } => {
                let field = checked_field(schema, field)?;
                if value.is_null() {
                    return Ok(match op {
                        CompareOp::Eq => format!("isNull(`{field}`)"),
                        CompareOp::Ne => format!("isNotNull(`{field}`)"),
                        _ => format!("`{field}` {} NULL", op.as_str()),
                    });
                }
                Ok(format!("`{field}` {} {}", op.as_str(), value.to_sql_literal()))
            }
            Condition::In { field, values } => {
                let field = checked_field(schema, field)?;
                if values.is_empty() {
                    return Ok("0".to_string());
                }
                let items: Vec<String> = values.iter().map(FieldValue::to_sql_literal).collect();
                Ok(format!("`{field}` IN ({})", items.join(", ")))
            }
            Condition::And(parts) => Condition::join(parts, " AND ", schema),
            Condition::Or(parts) => Condition::join(parts, " OR ", schema),
            Condition::Not(inner) => Ok(format!("NOT ({})", inner.to_condition_sql(schema)?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FieldDef, FieldType};

    fn schema() -> ModelSchema {
        ModelSchema::new("people")
            .field(FieldDef::new("name", FieldType::String))
            .field(FieldDef::new("age", FieldType::UInt8))
            .field(FieldDef::new("nick", FieldType::parse("Nullable(String)").unwrap()))
    }

    #[test]
    fn renders_nested_expressions() {
        let cond = Condition::ge("age", 18_u32)
            .and(Condition::in_list("name", ["a", "b"]).or(Condition::eq("nick", None::<String>)))
            .not();
        assert_eq!(
            cond.to_condition_sql(&schema()).unwrap(),
            "NOT ((`age` >= 18) AND ((`name` IN ('a', 'b')) OR (isNull(`nick`))))"
        );
    }

    #[test]
    fn raw_text_passes_through() {
        assert_eq!("age > 3".to_condition_sql(&schema()).unwrap(), "age > 3");
        assert_eq!(
            Condition::raw("1 = 1").to_condition_sql(&schema()).unwrap(),
            "1 = 1"
        );
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(matches!(
            Condition::eq("height", 3).to_condition_sql(&schema()),
            Err(ClickhouseDbError::ValidationError(_))
        ));
    }

    #[test]
    fn blank_conditions_add_no_where() {
        assert_eq!(where_clause(None, &schema()).unwrap(), "");
        assert_eq!(where_clause(Some(&""), &schema()).unwrap(), "");
        assert_eq!(where_clause(Some(&" \n".to_string()), &schema()).unwrap(), "");
        assert_eq!(
            where_clause(Some(&Condition::eq("age", 3_u32)), &schema()).unwrap(),
            " WHERE `age` = 3"
        );
    }

    #[test]
    fn empty_lists() {
        assert_eq!(
            Condition::in_list("age", Vec::<u32>::new())
                .to_condition_sql(&schema())
                .unwrap(),
            "0"
        );
        assert_eq!(Condition::And(vec![]).to_condition_sql(&schema()).unwrap(), "1");
    }
}
