//! Read-channel statement gate, execution, and result rendering.

use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::Connection;
use serde_json::Value;

use crate::error::{QueryError, SqlResult};

/// Reject any statement whose first meaningful token is not SELECT or WITH.
///
/// Leading whitespace, `--` line comments, and `/* */` block comments are
/// skipped before the check. The statement never reaches the engine when
/// this fails.
pub fn enforce_read_only(sql: &str) -> SqlResult<()> {
    let mut rest = sql;
    loop {
        rest = rest.trim_start();
        if let Some(after) = rest.strip_prefix("--") {
            rest = after.split_once('\n').map(|(_, tail)| tail).unwrap_or("");
        } else if let Some(after) = rest.strip_prefix("/*") {
            match after.split_once("*/") {
                Some((_, tail)) => rest = tail,
                None => return Err(QueryError::Empty),
            }
        } else {
            break;
        }
    }

    let keyword: String = rest
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect();
    if keyword.is_empty() {
        return Err(QueryError::Empty);
    }
    match keyword.to_ascii_uppercase().as_str() {
        "SELECT" | "WITH" => Ok(()),
        _ => Err(QueryError::NotReadOnly { keyword }),
    }
}

/// Execute an already-vetted statement. Prepared statements come from the
/// connection's bounded cache, keyed by query string.
pub fn run_select(conn: &Connection, sql: &str, params: &[Value]) -> SqlResult<QueryResult> {
    let bound: Vec<SqlValue> = params
        .iter()
        .enumerate()
        .map(|(i, v)| json_to_sql(v).ok_or(QueryError::BadParameter { position: i + 1 }))
        .collect::<SqlResult<_>>()?;

    let mut stmt = conn.prepare_cached(sql)?;
    let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();

    let mut rows = stmt.query(rusqlite::params_from_iter(bound))?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut record = Vec::with_capacity(columns.len());
        for i in 0..columns.len() {
            record.push(sql_to_json(row.get_ref(i)?));
        }
        out.push(record);
    }

    Ok(QueryResult {
        columns,
        rows: out,
    })
}

fn json_to_sql(value: &Value) -> Option<SqlValue> {
    match value {
        Value::Null => Some(SqlValue::Null),
        Value::Bool(b) => Some(SqlValue::Integer(i64::from(*b))),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(SqlValue::Integer(i))
            } else {
                n.as_f64().map(SqlValue::Real)
            }
        }
        Value::String(s) => Some(SqlValue::Text(s.clone())),
        Value::Array(_) | Value::Object(_) => None,
    }
}

fn sql_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(t) => Value::from(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::from(String::from_utf8_lossy(b).into_owned()),
    }
}

/// Query output: ordered columns plus rows aligned with them.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl QueryResult {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows as an array of objects, keys in column order.
    pub fn to_json(&self) -> Value {
        let rows: Vec<Value> = self
            .rows
            .iter()
            .map(|row| {
                let mut map = serde_json::Map::new();
                for (column, value) in self.columns.iter().zip(row) {
                    map.insert(column.clone(), value.clone());
                }
                Value::Object(map)
            })
            .collect();
        Value::Array(rows)
    }

    /// Markdown pipe table with a `(N rows)` trailer. Empty results render
    /// only `(0 rows)`.
    pub fn to_text(&self) -> String {
        if self.rows.is_empty() {
            return "(0 rows)".to_string();
        }

        let mut out = String::new();
        out.push_str("| ");
        out.push_str(&self.columns.join(" | "));
        out.push_str(" |\n| ");
        out.push_str(
            &self
                .columns
                .iter()
                .map(|_| "---")
                .collect::<Vec<_>>()
                .join(" | "),
        );
        out.push_str(" |\n");
        for row in &self.rows {
            out.push_str("| ");
            let cells: Vec<String> = row.iter().map(render_cell).collect();
            out.push_str(&cells.join(" | "));
            out.push_str(" |\n");
        }
        out.push_str(&format!("({} rows)", self.rows.len()));
        out
    }
}

fn render_cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.replace('|', "\\|"),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gate_accepts_select_and_with() {
        assert!(enforce_read_only("SELECT 1").is_ok());
        assert!(enforce_read_only("  select name FROM symbols").is_ok());
        assert!(enforce_read_only("WITH t AS (SELECT 1) SELECT * FROM t").is_ok());
        assert!(enforce_read_only("-- comment\nSELECT 1").is_ok());
        assert!(enforce_read_only("/* multi\nline */ SELECT 1").is_ok());
        assert!(enforce_read_only("/* a */ -- b\n  with t as (select 1) select * from t").is_ok());
    }

    #[test]
    fn gate_rejects_writes_and_ddl() {
        for sql in [
            "DELETE FROM symbols",
            "insert into symbols VALUES (1)",
            "UPDATE symbols SET name = 'x'",
            "DROP TABLE symbols",
            "PRAGMA journal_mode = WAL",
            "-- sneaky\nDELETE FROM symbols",
            "/* sneaky */ ATTACH DATABASE 'x' AS x",
        ] {
            assert!(
                matches!(enforce_read_only(sql), Err(QueryError::NotReadOnly { .. })),
                "accepted: {sql}"
            );
        }
    }

    #[test]
    fn gate_rejects_empty_and_unterminated() {
        assert!(matches!(enforce_read_only(""), Err(QueryError::Empty)));
        assert!(matches!(enforce_read_only("   "), Err(QueryError::Empty)));
        assert!(matches!(enforce_read_only("-- only"), Err(QueryError::Empty)));
        assert!(matches!(enforce_read_only("/* open"), Err(QueryError::Empty)));
    }

    #[test]
    fn text_rendering() {
        let result = QueryResult {
            columns: vec!["name".to_string(), "line".to_string()],
            rows: vec![
                vec![Value::from("AuthService"), Value::from(10)],
                vec![Value::from("login"), Value::Null],
            ],
        };
        let text = result.to_text();
        assert_eq!(
            text,
            "| name | line |\n| --- | --- |\n| AuthService | 10 |\n| login |  |\n(2 rows)"
        );
    }

    #[test]
    fn empty_text_rendering() {
        let result = QueryResult {
            columns: vec!["name".to_string()],
            rows: vec![],
        };
        assert_eq!(result.to_text(), "(0 rows)");
    }

    #[test]
    fn json_rendering_preserves_column_order() {
        let result = QueryResult {
            columns: vec!["z".to_string(), "a".to_string()],
            rows: vec![vec![Value::from(1), Value::from(2)]],
        };
        let json = serde_json::to_string(&result.to_json()).unwrap();
        assert_eq!(json, r#"[{"z":1,"a":2}]"#);
    }
}
