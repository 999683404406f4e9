use std::path::Path;
use std::sync::Mutex;

use rusqlite::Connection;

use crate::error::SqlError;
use crate::traits::{Row, SqlStore, Statement, Value};

/// SqliteStore is a SqlStore implementation backed by rusqlite
/// (bundled SQLite).
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a SQLite database at the given path.
    pub fn open(path: &Path) -> Result<Self, SqlError> {
        let conn = Connection::open(path)
            .map_err(|e| SqlError::Connection(e.to_string()))?;

        // WAL mode for better concurrent read performance.
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .map_err(|e| SqlError::Connection(e.to_string()))?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory SQLite database (useful for tests).
    pub fn open_in_memory() -> Result<Self, SqlError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| SqlError::Connection(e.to_string()))?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")
            .map_err(|e| SqlError::Connection(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

/// Convert our Value enum to rusqlite's ToSql.
fn bind_params(params: &[Value]) -> Vec<Box<dyn rusqlite::types::ToSql + '_>> {
    params
        .iter()
        .map(|v| -> Box<dyn rusqlite::types::ToSql + '_> {
            match v {
                Value::Null => Box::new(rusqlite::types::Null),
                Value::Integer(i) => Box::new(*i),
                Value::Real(f) => Box::new(*f),
                Value::Text(s) => Box::new(s.as_str()),
                Value::Blob(b) => Box::new(b.as_slice()),
            }
        })
        .collect()
}

impl SqlStore for SqliteStore {
    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, SqlError> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| SqlError::Query(e.to_string()))?;

        let bound = bind_params(params);
        let param_refs: Vec<&dyn rusqlite::types::ToSql> =
            bound.iter().map(|b| b.as_ref()).collect();

        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| SqlError::Query(e.to_string()))?;

        let column_names: Vec<String> = stmt
            .column_names()
            .iter()
            .map(|s| s.to_string())
            .collect();

        let rows = stmt
            .query_map(param_refs.as_slice(), |row| {
                let mut columns = Vec::new();
                for (i, name) in column_names.iter().enumerate() {
                    let val = row_value_at(row, i);
                    columns.push((name.clone(), val));
                }
                Ok(Row { columns })
            })
            .map_err(|e| SqlError::Query(e.to_string()))?;

        let mut result = Vec::new();
        for row in rows {
            result.push(row.map_err(|e| SqlError::Query(e.to_string()))?);
        }
        Ok(result)
    }

    fn exec(&self, sql: &str, params: &[Value]) -> Result<u64, SqlError> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| SqlError::Execution(e.to_string()))?;

        let bound = bind_params(params);
        let param_refs: Vec<&dyn rusqlite::types::ToSql> =
            bound.iter().map(|b| b.as_ref()).collect();

        let affected = conn
            .execute(sql, param_refs.as_slice())
            .map_err(|e| SqlError::Execution(e.to_string()))?;

        Ok(affected as u64)
    }

    fn exec_batch(&self, statements: &[Statement]) -> Result<u64, SqlError> {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| SqlError::Transaction(e.to_string()))?;

        let tx = conn
            .transaction()
            .map_err(|e| SqlError::Transaction(e.to_string()))?;

        let mut affected: u64 = 0;
        for st in statements {
            let bound = bind_params(&st.params);
            let param_refs: Vec<&dyn rusqlite::types::ToSql> =
                bound.iter().map(|b| b.as_ref()).collect();
            // Dropping `tx` on the error path rolls everything back.
            let n = tx
                .execute(&st.sql, param_refs.as_slice())
                .map_err(|e| SqlError::Transaction(e.to_string()))?;
            affected += n as u64;
        }

        tx.commit()
            .map_err(|e| SqlError::Transaction(e.to_string()))?;

        Ok(affected)
    }
}

/// Extract a Value from a rusqlite row at a given column index.
fn row_value_at(row: &rusqlite::Row, idx: usize) -> Value {
    use rusqlite::types::ValueRef;
    match row.get_ref(idx) {
        Ok(ValueRef::Null) => Value::Null,
        Ok(ValueRef::Integer(i)) => Value::Integer(i),
        Ok(ValueRef::Real(f)) => Value::Real(f),
        Ok(ValueRef::Text(t)) => Value::Text(String::from_utf8_lossy(t).to_string()),
        Ok(ValueRef::Blob(b)) => Value::Blob(b.to_vec()),
        Err(_) => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SqliteStore {
        let s = SqliteStore::open_in_memory().unwrap();
        s.exec(
            "CREATE TABLE items (id TEXT PRIMARY KEY, qty INTEGER NOT NULL)",
            &[],
        )
        .unwrap();
        s
    }

    #[test]
    fn test_exec_and_query() {
        let s = store();
        let n = s
            .exec(
                "INSERT INTO items (id, qty) VALUES (?1, ?2)",
                &[Value::Text("a".into()), Value::Integer(3)],
            )
            .unwrap();
        assert_eq!(n, 1);

        let rows = s
            .query("SELECT id, qty FROM items WHERE id = ?1", &[Value::Text("a".into())])
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get_str("id"), Some("a"));
        assert_eq!(rows[0].get_i64("qty"), Some(3));
    }

    #[test]
    fn test_exec_batch_commits_all() {
        let s = store();
        let n = s
            .exec_batch(&[
                Statement::new(
                    "INSERT INTO items (id, qty) VALUES (?1, ?2)",
                    vec![Value::Text("a".into()), Value::Integer(1)],
                ),
                Statement::new(
                    "INSERT INTO items (id, qty) VALUES (?1, ?2)",
                    vec![Value::Text("b".into()), Value::Integer(2)],
                ),
            ])
            .unwrap();
        assert_eq!(n, 2);

        let rows = s.query("SELECT id FROM items", &[]).unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_exec_batch_rolls_back_on_failure() {
        let s = store();
        s.exec(
            "INSERT INTO items (id, qty) VALUES (?1, ?2)",
            &[Value::Text("keep".into()), Value::Integer(1)],
        )
        .unwrap();

        // Second statement violates the primary key; the whole batch
        // (including the delete) must roll back.
        let result = s.exec_batch(&[
            Statement::new("DELETE FROM items", vec![]),
            Statement::new(
                "INSERT INTO items (id, qty) VALUES (?1, ?2)",
                vec![Value::Text("x".into()), Value::Integer(1)],
            ),
            Statement::new(
                "INSERT INTO items (id, qty) VALUES (?1, ?2)",
                vec![Value::Text("x".into()), Value::Integer(2)],
            ),
        ]);
        assert!(result.is_err());

        let rows = s.query("SELECT id FROM items", &[]).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get_str("id"), Some("keep"));
    }

    #[test]
    fn test_get_bool() {
        let s = store();
        s.exec(
            "INSERT INTO items (id, qty) VALUES (?1, ?2)",
            &[Value::Text("a".into()), Value::Integer(1)],
        )
        .unwrap();
        let rows = s.query("SELECT qty FROM items", &[]).unwrap();
        assert_eq!(rows[0].get_bool("qty"), Some(true));
    }
}
