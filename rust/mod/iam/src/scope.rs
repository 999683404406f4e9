//! Tenant-scope predicates.
//!
//! A [`ScopePredicate`] is the row-visibility rule the route layer must
//! apply to every read or write touching a multi-tenant table. It is
//! produced by `IamService::build_scope` and is independent of — and
//! strictly layered under — permission resolution: no permission grant
//! ever widens it.

use std::collections::BTreeSet;

use emitrace_sql::Value;

/// Row-visibility predicate over a resource's `customer_id` column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopePredicate {
    /// No restriction. Only SuperAdmin without an acting-as narrowing
    /// ever gets this.
    Unrestricted,

    /// Visible iff the row's customer is in the set. An empty set
    /// admits nothing.
    AmongCustomers(BTreeSet<String>),

    /// Visible iff the row's customer equals this id, exactly. The
    /// customer-side branch — a single equality test no matter what
    /// permissions the caller holds.
    ExactCustomer(String),
}

impl ScopePredicate {
    /// Whether a row with the given `customer_id` is visible.
    pub fn allows(&self, customer_id: &str) -> bool {
        match self {
            ScopePredicate::Unrestricted => true,
            ScopePredicate::AmongCustomers(ids) => ids.contains(customer_id),
            ScopePredicate::ExactCustomer(id) => id == customer_id,
        }
    }

    /// Whether the predicate can match any row at all.
    pub fn admits_nothing(&self) -> bool {
        matches!(self, ScopePredicate::AmongCustomers(ids) if ids.is_empty())
    }

    /// Render as a SQL condition over the given column, with positional
    /// parameters starting at `?{first_param}`.
    ///
    /// Callers append the returned values to their parameter list and
    /// AND the condition into their WHERE clause. `Unrestricted`
    /// renders as a tautology so the call site stays uniform.
    pub fn to_sql(&self, column: &str, first_param: usize) -> (String, Vec<Value>) {
        match self {
            ScopePredicate::Unrestricted => ("1 = 1".to_string(), vec![]),
            ScopePredicate::AmongCustomers(ids) if ids.is_empty() => {
                ("1 = 0".to_string(), vec![])
            }
            ScopePredicate::AmongCustomers(ids) => {
                let placeholders: Vec<String> = (0..ids.len())
                    .map(|i| format!("?{}", first_param + i))
                    .collect();
                let params = ids.iter().map(|id| Value::Text(id.clone())).collect();
                (
                    format!("{} IN ({})", column, placeholders.join(", ")),
                    params,
                )
            }
            ScopePredicate::ExactCustomer(id) => (
                format!("{} = ?{}", column, first_param),
                vec![Value::Text(id.clone())],
            ),
        }
    }
}

/// Server-validated impersonation target.
///
/// Only a SuperAdmin may act as a tenant, and the target is re-derived
/// and re-checked on every request — client-held tenant context is
/// never trusted directly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActingAs {
    pub organization_id: Option<String>,
    pub customer_id: Option<String>,
}

impl ActingAs {
    pub fn is_empty(&self) -> bool {
        self.organization_id.is_none() && self.customer_id.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn among(ids: &[&str]) -> ScopePredicate {
        ScopePredicate::AmongCustomers(ids.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn test_allows() {
        assert!(ScopePredicate::Unrestricted.allows("C1"));
        assert!(among(&["C1", "C2"]).allows("C2"));
        assert!(!among(&["C1", "C2"]).allows("C3"));
        assert!(ScopePredicate::ExactCustomer("C1".into()).allows("C1"));
        assert!(!ScopePredicate::ExactCustomer("C1".into()).allows("C2"));
    }

    #[test]
    fn test_empty_set_admits_nothing() {
        let empty = among(&[]);
        assert!(empty.admits_nothing());
        assert!(!empty.allows("C1"));
        assert_eq!(empty.to_sql("customer_id", 1).0, "1 = 0");
    }

    #[test]
    fn test_to_sql() {
        let (cond, params) = ScopePredicate::Unrestricted.to_sql("customer_id", 1);
        assert_eq!(cond, "1 = 1");
        assert!(params.is_empty());

        let (cond, params) = among(&["C1", "C2"]).to_sql("customer_id", 3);
        assert_eq!(cond, "customer_id IN (?3, ?4)");
        assert_eq!(params.len(), 2);

        let (cond, params) = ScopePredicate::ExactCustomer("C9".into()).to_sql("customer_id", 2);
        assert_eq!(cond, "customer_id = ?2");
        assert_eq!(params.len(), 1);
    }
}
