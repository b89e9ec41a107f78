//! DDL for a whsync dataset
//!
//! Table DDL is rendered from the shared column contract under the configured
//! table names; everything is `IF NOT EXISTS` so init can be re-run.

use whsync_config::{AccessRoles, TableNames};
use whsync_schema::schema_for;

pub fn create_database(dataset: &str) -> String {
    format!("CREATE DATABASE IF NOT EXISTS {dataset}")
}

/// CREATE TABLE statements, dimensions first
pub fn create_tables(dataset: &str, tables: &TableNames) -> Vec<String> {
    tables
        .all()
        .into_iter()
        .filter_map(|(key, name)| schema_for(key).map(|schema| schema.create_sql(dataset, name)))
        .collect()
}

pub fn create_roles(roles: &AccessRoles) -> Vec<String> {
    vec![
        format!("CREATE ROLE IF NOT EXISTS {}", roles.viewer),
        format!("CREATE ROLE IF NOT EXISTS {}", roles.job_runner),
    ]
}

/// Viewer reads every table; job runner may also inspect the catalog
pub fn grant_roles(dataset: &str, roles: &AccessRoles) -> Vec<String> {
    vec![
        format!("GRANT SELECT ON {dataset}.* TO {}", roles.viewer),
        format!("GRANT SELECT, SHOW ON {dataset}.* TO {}", roles.job_runner),
    ]
}
