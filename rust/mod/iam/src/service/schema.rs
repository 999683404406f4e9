use emitrace_sql::SqlStore;

use crate::service::IamError;

/// Initialize the SQLite schema for all IAM resources.
pub fn init_schema(sql: &dyn SqlStore) -> Result<(), IamError> {
    let statements = [
        // Users: identity + tenant anchor + role references
        "CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            system_role TEXT NOT NULL,
            organization_id TEXT,
            customer_id TEXT,
            access_scope TEXT NOT NULL DEFAULT 'ALL',
            custom_role_id TEXT,
            data TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        "CREATE INDEX IF NOT EXISTS idx_users_org ON users(organization_id)",
        "CREATE INDEX IF NOT EXISTS idx_users_customer ON users(customer_id)",
        "CREATE INDEX IF NOT EXISTS idx_users_custom_role ON users(custom_role_id)",

        // Role templates: immutable catalogue, seeded at startup
        "CREATE TABLE IF NOT EXISTS role_templates (
            id TEXT PRIMARY KEY,
            category TEXT NOT NULL,
            data TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",

        // Custom roles: tenant-owned
        "CREATE TABLE IF NOT EXISTS custom_roles (
            id TEXT PRIMARY KEY,
            organization_id TEXT,
            customer_id TEXT,
            template_id TEXT,
            data TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        "CREATE INDEX IF NOT EXISTS idx_custom_roles_org ON custom_roles(organization_id)",
        "CREATE INDEX IF NOT EXISTS idx_custom_roles_customer ON custom_roles(customer_id)",

        // Ordered override list of a custom role; replaced wholesale
        "CREATE TABLE IF NOT EXISTS role_overrides (
            role_id TEXT NOT NULL,
            position INTEGER NOT NULL,
            pattern TEXT NOT NULL,
            granted INTEGER NOT NULL,
            PRIMARY KEY (role_id, position),
            FOREIGN KEY (role_id) REFERENCES custom_roles(id) ON DELETE CASCADE
        )",

        // User-level overrides; one row per (user, pattern)
        "CREATE TABLE IF NOT EXISTS user_overrides (
            user_id TEXT NOT NULL,
            pattern TEXT NOT NULL,
            granted INTEGER NOT NULL,
            granted_by TEXT NOT NULL,
            reason TEXT,
            created_at TEXT NOT NULL,
            PRIMARY KEY (user_id, pattern),
            FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
        )",

        // Customers: the tenant records themselves
        "CREATE TABLE IF NOT EXISTS customers (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            organization_id TEXT NOT NULL,
            created_by TEXT NOT NULL,
            is_public INTEGER NOT NULL DEFAULT 0,
            data TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        "CREATE INDEX IF NOT EXISTS idx_customers_org ON customers(organization_id)",

        // Customer-organization links; the only cross-org visibility path
        "CREATE TABLE IF NOT EXISTS customer_links (
            id TEXT PRIMARY KEY,
            customer_id TEXT NOT NULL,
            organization_id TEXT NOT NULL,
            status TEXT NOT NULL,
            data TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE (customer_id, organization_id)
        )",
        "CREATE INDEX IF NOT EXISTS idx_links_org_status ON customer_links(organization_id, status)",

        // Personal customer assignments of organization staff
        "CREATE TABLE IF NOT EXISTS customer_assignments (
            user_id TEXT NOT NULL,
            customer_id TEXT NOT NULL,
            is_primary INTEGER NOT NULL DEFAULT 0,
            assigned_by TEXT NOT NULL,
            assigned_at TEXT NOT NULL,
            PRIMARY KEY (user_id, customer_id),
            FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
        )",
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_assignments_one_primary
            ON customer_assignments(user_id) WHERE is_primary = 1",
    ];

    for stmt in &statements {
        sql.exec(stmt, &[])
            .map_err(|e| IamError::Storage(e.to_string()))?;
    }

    Ok(())
}
