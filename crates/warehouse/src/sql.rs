//! SQL guards and ClickHouse query building

use serde_json::Value;

use crate::error::{Result, WarehouseError};
use crate::model::{Filter, Select};

/// Validate that SQL is a single read-only statement
///
/// Only SELECT and WITH (CTE) queries are allowed.
pub fn validate_sql(sql: &str) -> Result<()> {
    let trimmed = sql.trim();
    // Quoted text and comments can hold `;` or `INTO` without being code
    let code = strip_literals(trimmed);
    let upper = code.to_uppercase();

    if !upper.starts_with("SELECT") && !upper.starts_with("WITH") {
        return Err(WarehouseError::InvalidSql(
            "only SELECT and WITH queries are allowed".to_string(),
        ));
    }

    if upper.contains(" INTO ") {
        return Err(WarehouseError::InvalidSql(
            "SELECT INTO is not allowed".to_string(),
        ));
    }

    // Allow a trailing semicolon, nothing after it
    if code.trim_end().trim_end_matches(';').contains(';') {
        return Err(WarehouseError::InvalidSql(
            "multiple statements not allowed".to_string(),
        ));
    }

    Ok(())
}

/// Blank out string literals, quoted identifiers and comments
///
/// Delimiters are kept so the statement keeps its shape. An unterminated
/// literal blanks the rest of the input.
fn strip_literals(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut chars = sql.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\'' | '"' | '`' => {
                out.push(c);
                while let Some(inner) = chars.next() {
                    if inner == '\\' {
                        chars.next();
                        out.push_str("  ");
                    } else if inner == c {
                        // doubled quote is an escaped quote
                        if chars.peek() == Some(&c) {
                            chars.next();
                            out.push_str("  ");
                        } else {
                            out.push(c);
                            break;
                        }
                    } else {
                        out.push(' ');
                    }
                }
            }
            '-' if chars.peek() == Some(&'-') => {
                out.push(' ');
                for inner in chars.by_ref() {
                    if inner == '\n' {
                        out.push('\n');
                        break;
                    }
                    out.push(' ');
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                out.push_str("  ");
                let mut prev = ' ';
                for inner in chars.by_ref() {
                    out.push(' ');
                    if prev == '*' && inner == '/' {
                        break;
                    }
                    prev = inner;
                }
            }
            _ => out.push(c),
        }
    }
    out
}

/// Whether `name` can be interpolated unquoted as a database, table, column or role
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    name.len() <= 64 && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Reject identifiers that would need quoting
pub fn ensure_identifier(kind: &str, name: &str) -> Result<()> {
    if is_valid_identifier(name) {
        Ok(())
    } else {
        Err(WarehouseError::InvalidSql(format!(
            "invalid {} name '{}'",
            kind, name
        )))
    }
}

/// A statement with its `{name:Type}` parameters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Statement {
    pub sql: String,
    /// Sent as `param_<name>` query-string entries
    pub params: Vec<(String, String)>,
}

impl Statement {
    /// Append a parameter and return its `{name:Type}` placeholder
    pub fn bind(&mut self, prefix: &str, value: &Value) -> Result<String> {
        let name = format!("{}{}", prefix, self.params.len());
        let (ty, text) = param_type_and_text(value)?;
        self.params.push((name.clone(), text));
        Ok(format!("{{{}:{}}}", name, ty))
    }
}

/// ClickHouse parameter type and text form of a JSON value
fn param_type_and_text(value: &Value) -> Result<(&'static str, String)> {
    match value {
        Value::String(s) => Ok(("String", s.clone())),
        Value::Bool(b) => Ok(("Bool", b.to_string())),
        Value::Number(n) if n.is_u64() => Ok(("UInt64", n.to_string())),
        Value::Number(n) if n.is_i64() => Ok(("Int64", n.to_string())),
        Value::Number(n) => Ok(("Float64", n.to_string())),
        Value::Array(items) if items.iter().all(Value::is_string) => {
            let quoted = items
                .iter()
                .filter_map(Value::as_str)
                .map(|s| format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'")))
                .collect::<Vec<_>>()
                .join(",");
            Ok(("Array(String)", format!("[{}]", quoted)))
        }
        other => Err(WarehouseError::Unsupported(format!(
            "cannot bind {} as a query parameter",
            other
        ))),
    }
}

fn render_where(stmt: &mut Statement, filter: &Filter) -> Result<()> {
    if filter.is_empty() {
        return Ok(());
    }
    let mut clauses = Vec::with_capacity(filter.conditions().len());
    for (column, value) in filter.conditions() {
        ensure_identifier("column", column)?;
        if value.is_null() {
            clauses.push(format!("isNull({})", column));
        } else {
            let placeholder = stmt.bind("w", value)?;
            clauses.push(format!("{} = {}", column, placeholder));
        }
    }
    stmt.sql.push_str(" WHERE ");
    stmt.sql.push_str(&clauses.join(" AND "));
    Ok(())
}

/// `SELECT ... FROM db.table WHERE ... ORDER BY ... LIMIT n`
pub fn render_select(database: &str, select: &Select) -> Result<Statement> {
    ensure_identifier("database", database)?;
    ensure_identifier("table", &select.table)?;

    let columns = if select.columns.is_empty() {
        "*".to_string()
    } else {
        for column in &select.columns {
            ensure_identifier("column", column)?;
        }
        select.columns.join(", ")
    };

    let mut stmt = Statement {
        sql: format!("SELECT {} FROM {}.{}", columns, database, select.table),
        params: Vec::new(),
    };
    render_where(&mut stmt, &select.filter)?;

    if !select.order_by.is_empty() {
        for column in &select.order_by {
            ensure_identifier("column", column)?;
        }
        stmt.sql.push_str(" ORDER BY ");
        stmt.sql.push_str(&select.order_by.join(", "));
    }
    if let Some(limit) = select.limit {
        stmt.sql.push_str(&format!(" LIMIT {}", limit));
    }
    Ok(stmt)
}

/// `ALTER TABLE db.table UPDATE ... WHERE ...`, synchronous across replicas
pub fn render_update(
    database: &str,
    table: &str,
    set: &crate::Row,
    filter: &Filter,
) -> Result<Statement> {
    ensure_identifier("database", database)?;
    ensure_identifier("table", table)?;
    if set.is_empty() {
        return Err(WarehouseError::InvalidSql("update sets no columns".to_string()));
    }

    let mut stmt = Statement::default();
    let mut assignments = Vec::with_capacity(set.len());
    for (column, value) in set {
        ensure_identifier("column", column)?;
        if value.is_null() {
            assignments.push(format!("{} = NULL", column));
        } else {
            let placeholder = stmt.bind("s", value)?;
            assignments.push(format!("{} = {}", column, placeholder));
        }
    }
    stmt.sql = format!(
        "ALTER TABLE {}.{} UPDATE {}",
        database,
        table,
        assignments.join(", ")
    );
    render_mutation_where(&mut stmt, filter)?;
    stmt.sql.push_str(" SETTINGS mutations_sync = 2");
    Ok(stmt)
}

/// `ALTER TABLE db.table DELETE WHERE ...`
pub fn render_delete(database: &str, table: &str, filter: &Filter) -> Result<Statement> {
    ensure_identifier("database", database)?;
    ensure_identifier("table", table)?;
    let mut stmt = Statement {
        sql: format!("ALTER TABLE {}.{} DELETE", database, table),
        params: Vec::new(),
    };
    render_mutation_where(&mut stmt, filter)?;
    stmt.sql.push_str(" SETTINGS mutations_sync = 2");
    Ok(stmt)
}

/// ALTER mutations require a WHERE clause; an empty filter means every row
fn render_mutation_where(stmt: &mut Statement, filter: &Filter) -> Result<()> {
    if filter.is_empty() {
        stmt.sql.push_str(" WHERE 1");
        Ok(())
    } else {
        render_where(stmt, filter)
    }
}
