//! SQL Translator
//!
//! Turns query filters, free text and sort specs into parameterized SQL
//! over plain catalog columns. Field names are validated identifiers and
//! are the only thing interpolated; every value goes through a `?`
//! placeholder.
//!
//! # SQL Syntax Generated
//!
//! ```sql
//! LOWER(unit) = ?                           -- Text equality (case-insensitive)
//! price = ?                                 -- Numeric / boolean equality
//! (LOWER(unit) = ? OR LOWER(unit) = ?)      -- IN list
//! price BETWEEN ? AND ?                     -- Range
//! LOWER(name) LIKE ?                        -- Contains
//! ```

use super::query::{is_identifier, Filter, FilterOp, FilterValue, SortSpec};

/// SQL query translator for catalog columns
pub struct SqlTranslator;

/// SQL fragment with parameterized placeholders
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SqlQuery {
    /// The WHERE clause (without "WHERE" keyword), empty when unconstrained
    pub clause: String,
    /// The parameter values in order
    pub params: Vec<SqlParam>,
}

/// SQL parameter value
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Text(String),
    Integer(i64),
    Numeric(f64),
    Boolean(bool),
    Null,
}

impl From<&str> for SqlParam {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for SqlParam {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<Option<String>> for SqlParam {
    fn from(s: Option<String>) -> Self {
        s.map_or(Self::Null, Self::Text)
    }
}

impl From<i64> for SqlParam {
    fn from(n: i64) -> Self {
        Self::Integer(n)
    }
}

impl SqlTranslator {
    /// AND together every filter.
    pub fn translate(filters: &[Filter]) -> SqlQuery {
        let mut params = Vec::new();
        let parts: Vec<String> = filters
            .iter()
            .map(|f| Self::translate_filter(f, &mut params))
            .collect();
        let clause = match parts.len() {
            0 => String::new(),
            1 => parts[0].clone(),
            _ => format!("({})", parts.join(" AND ")),
        };
        SqlQuery { clause, params }
    }

    /// Same as [`translate`](Self::translate) with values inlined.
    ///
    /// Warning: only for logging, never execute the result
    pub fn translate_inline(filters: &[Filter]) -> String {
        let sql = Self::translate(filters);
        let mut result = sql.clause;
        for param in sql.params {
            let value = match param {
                SqlParam::Text(s) => format!("'{}'", s.replace('\'', "''")),
                SqlParam::Integer(n) => n.to_string(),
                SqlParam::Numeric(n) => n.to_string(),
                SqlParam::Boolean(b) => if b { "TRUE" } else { "FALSE" }.to_string(),
                SqlParam::Null => "NULL".to_string(),
            };
            result = result.replacen('?', &value, 1);
        }
        result
    }

    /// `(LOWER(a) LIKE ? OR LOWER(b) LIKE ?)` for a free-text needle.
    pub fn text_match(columns: &[&str], text: &str) -> SqlQuery {
        let pattern = format!("%{}%", text.trim().to_lowercase());
        let parts: Vec<String> = columns
            .iter()
            .filter(|c| is_identifier(c))
            .map(|c| format!("LOWER({}) LIKE ?", c))
            .collect();
        let params = vec![SqlParam::Text(pattern); parts.len()];
        let clause = match parts.len() {
            0 => String::new(),
            1 => parts[0].clone(),
            _ => format!("({})", parts.join(" OR ")),
        };
        SqlQuery { clause, params }
    }

    /// OR together non-empty fragments.
    pub fn any_of(parts: Vec<SqlQuery>) -> SqlQuery {
        let mut clauses = Vec::new();
        let mut params = Vec::new();
        for part in parts.into_iter().filter(|p| !p.clause.is_empty()) {
            clauses.push(part.clause);
            params.extend(part.params);
        }
        let clause = match clauses.len() {
            0 => String::new(),
            1 => clauses.remove(0),
            _ => format!("({})", clauses.join(" OR ")),
        };
        SqlQuery { clause, params }
    }

    /// ` ORDER BY field [DESC]`, or empty.
    pub fn order_by(sort: Option<&SortSpec>) -> String {
        match sort {
            Some(s) if is_identifier(&s.field) => {
                format!(" ORDER BY {}{}", s.field, if s.descending { " DESC" } else { "" })
            }
            _ => String::new(),
        }
    }

    /// Full `SELECT * FROM table WHERE ... [ORDER BY ...] LIMIT n`.
    pub fn select(
        table: &str,
        parts: &[SqlQuery],
        sort: Option<&SortSpec>,
        limit: usize,
    ) -> (String, Vec<SqlParam>) {
        let mut clauses = Vec::new();
        let mut params = Vec::new();
        for part in parts.iter().filter(|p| !p.clause.is_empty()) {
            clauses.push(part.clause.clone());
            params.extend(part.params.iter().cloned());
        }
        let where_clause = if clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", clauses.join(" AND "))
        };
        params.push(SqlParam::Integer(limit as i64));
        let sql = format!(
            "SELECT * FROM {}{}{} LIMIT ?",
            table,
            where_clause,
            Self::order_by(sort)
        );
        (sql, params)
    }

    fn translate_filter(filter: &Filter, params: &mut Vec<SqlParam>) -> String {
        if !is_identifier(&filter.field) {
            return "1=0".to_string();
        }
        let field = filter.field.as_str();

        match &filter.op {
            FilterOp::Eq(value) => Self::translate_eq(field, value, params),
            FilterOp::In(values) => {
                let conditions: Vec<String> = values
                    .iter()
                    .map(|v| Self::translate_eq(field, v, params))
                    .collect();
                match conditions.len() {
                    0 => "1=0".to_string(),
                    1 => conditions[0].clone(),
                    _ => format!("({})", conditions.join(" OR ")),
                }
            }
            FilterOp::Range { min, max } => match (min, max) {
                (Some(min_val), Some(max_val)) => {
                    params.push(SqlParam::Numeric(*min_val));
                    params.push(SqlParam::Numeric(*max_val));
                    format!("{} BETWEEN ? AND ?", field)
                }
                (Some(min_val), None) => {
                    params.push(SqlParam::Numeric(*min_val));
                    format!("{} >= ?", field)
                }
                (None, Some(max_val)) => {
                    params.push(SqlParam::Numeric(*max_val));
                    format!("{} <= ?", field)
                }
                (None, None) => "1=1".to_string(),
            },
            FilterOp::Contains(text) => {
                params.push(SqlParam::Text(format!("%{}%", text.to_lowercase())));
                format!("LOWER({}) LIKE ?", field)
            }
        }
    }

    fn translate_eq(field: &str, value: &FilterValue, params: &mut Vec<SqlParam>) -> String {
        match value {
            FilterValue::Text(text) => {
                params.push(SqlParam::Text(text.to_lowercase()));
                format!("LOWER({}) = ?", field)
            }
            FilterValue::Number(n) => {
                params.push(SqlParam::Numeric(*n));
                format!("{} = ?", field)
            }
            FilterValue::Bool(b) => {
                params.push(SqlParam::Boolean(*b));
                format!("{} = ?", field)
            }
        }
    }
}
