pub mod assignment;
pub mod authorize;
pub mod custom_role;
pub mod customer;
pub mod schema;
pub mod template;
pub mod user;

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use emitrace_sql::{SqlStore, Value};

use crate::registry::Registry;

/// IAM service error type.
#[derive(Debug, Error)]
pub enum IamError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("validation: {0}")]
    Validation(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Missing registry entry or scope rule — a server bug, kept
    /// distinct from an ordinary denial so operators can tell them
    /// apart.
    #[error("configuration: {0}")]
    Configuration(String),

    #[error("storage: {0}")]
    Storage(String),

    #[error("internal: {0}")]
    Internal(String),
}

impl From<IamError> for emitrace_core::ServiceError {
    fn from(e: IamError) -> Self {
        match e {
            IamError::NotFound(m) => emitrace_core::ServiceError::NotFound(m),
            IamError::Conflict(m) => emitrace_core::ServiceError::Conflict(m),
            IamError::Validation(m) => emitrace_core::ServiceError::Validation(m),
            IamError::Forbidden(m) => emitrace_core::ServiceError::PermissionDenied(m),
            IamError::Configuration(m) => emitrace_core::ServiceError::Configuration(m),
            IamError::Storage(m) => emitrace_core::ServiceError::Storage(m),
            IamError::Internal(m) => emitrace_core::ServiceError::Internal(m),
        }
    }
}

/// The IAM service. Holds the SQL store, the static permission
/// registry, and the per-user resolution cache.
pub struct IamService {
    pub(crate) sql: Arc<dyn SqlStore>,
    pub(crate) registry: Registry,
    pub(crate) resolution_cache: authorize::ResolutionCache,
}

impl IamService {
    /// Create a new IamService, initializing the DB schema and seeding
    /// the role-template catalogue.
    pub fn new(sql: Arc<dyn SqlStore>, registry: Registry) -> Result<Arc<Self>, IamError> {
        schema::init_schema(sql.as_ref())?;
        let svc = Arc::new(Self {
            sql,
            registry,
            resolution_cache: authorize::ResolutionCache::new(),
        });
        svc.seed_templates()?;
        Ok(svc)
    }

    /// The static permission registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    // ── Generic JSON-record helpers ──
    //
    // Records are stored as a JSON `data` column plus indexed columns,
    // one table per resource.

    /// Insert a record as JSON into a table with indexed columns.
    pub(crate) fn insert_record<T: Serialize>(
        &self,
        table: &str,
        id: &str,
        record: &T,
        indexes: &[(&str, Value)],
    ) -> Result<(), IamError> {
        let json = serde_json::to_string(record)
            .map_err(|e| IamError::Internal(e.to_string()))?;

        let mut cols = vec!["id", "data"];
        let mut placeholders = vec!["?1".to_string(), "?2".to_string()];
        let mut params = vec![Value::Text(id.to_string()), Value::Text(json)];

        for (i, (col, val)) in indexes.iter().enumerate() {
            cols.push(col);
            placeholders.push(format!("?{}", i + 3));
            params.push(val.clone());
        }

        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table,
            cols.join(", "),
            placeholders.join(", "),
        );

        self.sql.exec(&sql, &params).map_err(|e| {
            let msg = e.to_string();
            if msg.contains("UNIQUE constraint") {
                IamError::Conflict(msg)
            } else {
                IamError::Storage(msg)
            }
        })?;

        Ok(())
    }

    /// Get a record by id, deserializing the JSON `data` column.
    pub(crate) fn get_record<T: DeserializeOwned>(
        &self,
        table: &str,
        id: &str,
    ) -> Result<T, IamError> {
        let sql = format!("SELECT data FROM {} WHERE id = ?1", table);
        let rows = self.sql
            .query(&sql, &[Value::Text(id.to_string())])
            .map_err(|e| IamError::Storage(e.to_string()))?;
        let row = rows
            .first()
            .ok_or_else(|| IamError::NotFound(format!("{}/{}", table, id)))?;
        let data = row
            .get_str("data")
            .ok_or_else(|| IamError::Internal("missing data column".into()))?;
        serde_json::from_str(data).map_err(|e| IamError::Internal(e.to_string()))
    }

    /// Update a record's JSON data and indexed columns.
    pub(crate) fn update_record<T: Serialize>(
        &self,
        table: &str,
        id: &str,
        record: &T,
        indexes: &[(&str, Value)],
    ) -> Result<(), IamError> {
        let json = serde_json::to_string(record)
            .map_err(|e| IamError::Internal(e.to_string()))?;

        let mut sets = vec!["data = ?1".to_string()];
        let mut params: Vec<Value> = vec![Value::Text(json)];

        for (i, (col, val)) in indexes.iter().enumerate() {
            sets.push(format!("{} = ?{}", col, i + 2));
            params.push(val.clone());
        }

        let id_idx = params.len() + 1;
        params.push(Value::Text(id.to_string()));

        let sql = format!(
            "UPDATE {} SET {} WHERE id = ?{}",
            table,
            sets.join(", "),
            id_idx,
        );

        let affected = self.sql
            .exec(&sql, &params)
            .map_err(|e| IamError::Storage(e.to_string()))?;

        if affected == 0 {
            return Err(IamError::NotFound(format!("{}/{}", table, id)));
        }

        Ok(())
    }

    /// Delete a record by id.
    pub(crate) fn delete_record(&self, table: &str, id: &str) -> Result<(), IamError> {
        let sql = format!("DELETE FROM {} WHERE id = ?1", table);
        let affected = self.sql
            .exec(&sql, &[Value::Text(id.to_string())])
            .map_err(|e| IamError::Storage(e.to_string()))?;
        if affected == 0 {
            return Err(IamError::NotFound(format!("{}/{}", table, id)));
        }
        Ok(())
    }

    /// List records with optional equality filters and pagination.
    pub(crate) fn list_records<T: DeserializeOwned>(
        &self,
        table: &str,
        filters: &[(&str, Value)],
        limit: usize,
        offset: usize,
    ) -> Result<(Vec<T>, usize), IamError> {
        let mut where_clauses = Vec::new();
        let mut params = Vec::new();

        for (i, (col, val)) in filters.iter().enumerate() {
            where_clauses.push(format!("{} = ?{}", col, i + 1));
            params.push(val.clone());
        }

        let where_sql = if where_clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", where_clauses.join(" AND "))
        };

        let count_sql = format!("SELECT COUNT(*) as cnt FROM {}{}", table, where_sql);
        let count_rows = self.sql
            .query(&count_sql, &params)
            .map_err(|e| IamError::Storage(e.to_string()))?;
        let total = count_rows
            .first()
            .and_then(|r| r.get_i64("cnt"))
            .unwrap_or(0) as usize;

        let limit_idx = params.len() + 1;
        let offset_idx = params.len() + 2;
        params.push(Value::Integer(limit as i64));
        params.push(Value::Integer(offset as i64));

        let sql = format!(
            "SELECT data FROM {}{} ORDER BY created_at DESC LIMIT ?{} OFFSET ?{}",
            table, where_sql, limit_idx, offset_idx,
        );

        let rows = self.sql
            .query(&sql, &params)
            .map_err(|e| IamError::Storage(e.to_string()))?;

        let mut items = Vec::new();
        for row in &rows {
            let data = row
                .get_str("data")
                .ok_or_else(|| IamError::Internal("missing data column".into()))?;
            let item: T =
                serde_json::from_str(data).map_err(|e| IamError::Internal(e.to_string()))?;
            items.push(item);
        }

        Ok((items, total))
    }
}
