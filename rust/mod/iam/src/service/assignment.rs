use std::collections::BTreeSet;

use emitrace_core::now_rfc3339;
use emitrace_sql::{Statement, Value};

use crate::model::{CustomerAssignment, ReplaceAssignments};
use crate::service::{IamError, IamService};

impl IamService {
    /// Replace a staff member's full assignment set in one transaction.
    ///
    /// All old rows are deleted and the new rows inserted atomically: a
    /// concurrent `assigned_customer_ids` sees either the previous set
    /// or exactly the new one, never an empty or mixed state.
    pub fn set_assignments(
        &self,
        user_id: &str,
        input: &ReplaceAssignments,
        assigned_by: &str,
    ) -> Result<Vec<CustomerAssignment>, IamError> {
        let user = self.get_user(user_id)?;
        if !user.system_role.is_organization_side() {
            return Err(IamError::Validation(
                "assignments apply to organization staff only".into(),
            ));
        }

        let unique: BTreeSet<&String> = input.customer_ids.iter().collect();
        if unique.len() != input.customer_ids.len() {
            return Err(IamError::Validation("duplicate customer id in assignment set".into()));
        }

        if let Some(primary) = &input.primary_customer_id {
            if !unique.contains(primary) {
                return Err(IamError::Validation(format!(
                    "primary customer '{}' is not in the assignment set",
                    primary,
                )));
            }
        }

        // Every referenced customer must exist.
        for customer_id in &input.customer_ids {
            let _ = self.get_customer(customer_id).map_err(|_| {
                IamError::Validation(format!("customer '{}' does not exist", customer_id))
            })?;
        }

        let now = now_rfc3339();
        let mut assignments = Vec::with_capacity(input.customer_ids.len());
        let mut batch = vec![Statement::new(
            "DELETE FROM customer_assignments WHERE user_id = ?1",
            vec![Value::Text(user_id.to_string())],
        )];

        for customer_id in &input.customer_ids {
            let is_primary = input.primary_customer_id.as_deref() == Some(customer_id.as_str());
            batch.push(Statement::new(
                "INSERT INTO customer_assignments
                    (user_id, customer_id, is_primary, assigned_by, assigned_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                vec![
                    Value::Text(user_id.to_string()),
                    Value::Text(customer_id.clone()),
                    Value::Integer(is_primary as i64),
                    Value::Text(assigned_by.to_string()),
                    Value::Text(now.clone()),
                ],
            ));
            assignments.push(CustomerAssignment {
                user_id: user_id.to_string(),
                customer_id: customer_id.clone(),
                is_primary,
                assigned_by: assigned_by.to_string(),
                assigned_at: now.clone(),
            });
        }

        self.sql
            .exec_batch(&batch)
            .map_err(|e| IamError::Storage(e.to_string()))?;

        Ok(assignments)
    }

    /// The customer ids personally assigned to a user. Read at scope
    /// build time, never cached.
    pub fn assigned_customer_ids(&self, user_id: &str) -> Result<BTreeSet<String>, IamError> {
        let rows = self.sql
            .query(
                "SELECT customer_id FROM customer_assignments WHERE user_id = ?1",
                &[Value::Text(user_id.to_string())],
            )
            .map_err(|e| IamError::Storage(e.to_string()))?;
        Ok(rows
            .iter()
            .filter_map(|r| r.get_str("customer_id").map(|s| s.to_string()))
            .collect())
    }

    /// Full assignment rows for a user, primary first.
    pub fn list_assignments(&self, user_id: &str) -> Result<Vec<CustomerAssignment>, IamError> {
        let rows = self.sql
            .query(
                "SELECT user_id, customer_id, is_primary, assigned_by, assigned_at
                 FROM customer_assignments
                 WHERE user_id = ?1 ORDER BY is_primary DESC, customer_id",
                &[Value::Text(user_id.to_string())],
            )
            .map_err(|e| IamError::Storage(e.to_string()))?;

        Ok(rows
            .iter()
            .map(|r| CustomerAssignment {
                user_id: r.get_str("user_id").unwrap_or_default().to_string(),
                customer_id: r.get_str("customer_id").unwrap_or_default().to_string(),
                is_primary: r.get_bool("is_primary").unwrap_or(false),
                assigned_by: r.get_str("assigned_by").unwrap_or_default().to_string(),
                assigned_at: r.get_str("assigned_at").unwrap_or_default().to_string(),
            })
            .collect())
    }
}
