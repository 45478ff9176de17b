use std::borrow::Cow;

use crate::model::ModelSchema;

/// How `$table` is spelled for a record-kind inside `db_name`.
#[must_use]
pub fn table_reference(db_name: &str, schema: &ModelSchema) -> String {
    if schema.is_system() {
        format!("`system`.`{}`", schema.table_name())
    } else if schema.is_temporary() {
        format!("`{}`", schema.table_name())
    } else {
        format!("`{db_name}`.`{}`", schema.table_name())
    }
}

fn is_ident_start(b: u8) -> bool {
    b == b'_' || b.is_ascii_alphabetic()
}

fn is_ident_char(b: u8) -> bool {
    b == b'_' || b.is_ascii_alphanumeric()
}

/// Replace `$db` and `$table` (or `${db}` / `${table}`) in `query`.
///
/// `$$` becomes a single `$`. Any other placeholder, and `$table` when no schema is given,
/// is left as written. A query without `$` is returned borrowed and untouched.
///
/// ```rust
/// use clickhouse_middleware::prelude::*;
/// use clickhouse_middleware::database::substitute;
///
/// let schema = ModelSchema::new("events");
/// assert_eq!(
///     substitute("SELECT * FROM $table WHERE note = '$5'", "shop", Some(&schema)),
///     "SELECT * FROM `shop`.`events` WHERE note = '$5'"
/// );
/// ```
#[must_use]
pub fn substitute<'a>(query: &'a str, db_name: &str, schema: Option<&ModelSchema>) -> Cow<'a, str> {
    if !query.contains('$') {
        return Cow::Borrowed(query);
    }

    let bytes = query.as_bytes();
    let mut out = String::with_capacity(query.len() + 32);
    let mut copied = 0;
    let mut idx = 0;
    while idx < bytes.len() {
        if bytes[idx] != b'$' {
            idx += 1;
            continue;
        }
        out.push_str(&query[copied..idx]);
        let rest = &bytes[idx + 1..];

        if rest.first() == Some(&b'$') {
            out.push('$');
            idx += 2;
            copied = idx;
            continue;
        }

        let (name, consumed) = if rest.first() == Some(&b'{') {
            match rest.iter().position(|&b| b == b'}') {
                Some(end) if end > 1 => (&query[idx + 2..idx + 1 + end], end + 1),
                _ => ("", 0),
            }
        } else if rest.first().copied().is_some_and(is_ident_start) {
            let len = rest.iter().take_while(|&&b| is_ident_char(b)).count();
            (&query[idx + 1..idx + 1 + len], len)
        } else {
            ("", 0)
        };

        let replacement = match name {
            "db" => Some(format!("`{db_name}`")),
            "table" => schema.map(|schema| table_reference(db_name, schema)),
            _ => None,
        };
        match replacement {
            Some(text) => {
                out.push_str(&text);
                idx += 1 + consumed;
            }
            None => {
                out.push('$');
                idx += 1;
            }
        }
        copied = idx;
    }
    out.push_str(&query[copied..]);
    Cow::Owned(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds() -> (ModelSchema, ModelSchema, ModelSchema) {
        (
            ModelSchema::new("parts").system(),
            ModelSchema::new("scratch").temporary(),
            ModelSchema::new("events"),
        )
    }

    #[test]
    fn table_names_by_kind() {
        let (system, temporary, ordinary) = kinds();
        assert_eq!(substitute("$table", "db", Some(&system)), "`system`.`parts`");
        assert_eq!(substitute("$table", "db", Some(&temporary)), "`scratch`");
        assert_eq!(substitute("$table", "db", Some(&ordinary)), "`db`.`events`");
    }

    #[test]
    fn no_dollar_is_borrowed() {
        let query = "SELECT 1";
        assert!(matches!(substitute(query, "db", None), Cow::Borrowed(q) if q == query));
    }

    #[test]
    fn braces_escapes_and_unknown_names() {
        let (_, _, ordinary) = kinds();
        assert_eq!(
            substitute("${db}.x $$table ${table}s $tables $other $ $", "db", Some(&ordinary)),
            "`db`.x $table `db`.`events`s $tables $other $ $"
        );
    }

    #[test]
    fn table_without_schema_is_kept() {
        assert_eq!(substitute("SHOW TABLES FROM $db LIKE '$table'", "db", None), "SHOW TABLES FROM `db` LIKE '$table'");
    }
}
