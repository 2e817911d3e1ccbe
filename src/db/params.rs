//! Named command parameters and their binding to backend placeholders.
//!
//! Commands are written with `@name` markers. Binding keeps only the
//! parameters whose marker occurs in the command text and rewrites each marker
//! into the positional placeholder of the active backend.

use std::collections::HashMap;

use chrono::{NaiveDate, NaiveDateTime};
use sea_orm::{DbBackend, Statement, Value};
use tracing::debug;

/// A value bound to a named parameter.
///
/// Every variant carries its SQL type so NULLs bind with the right type.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Bool(Option<bool>),
    Int(Option<i32>),
    BigInt(Option<i64>),
    Text(Option<String>),
    DateTime(Option<NaiveDateTime>),
    Date(Option<NaiveDate>),
    Bytes(Option<Vec<u8>>),
    /// Reference to another entity; binds as that entity's identity.
    Entity { type_name: &'static str, id: i32 },
}

impl ParamValue {
    /// Reference to an entity of `type_name`. An id of `-1` means "not set".
    pub fn reference(type_name: &'static str, id: i32) -> Self {
        ParamValue::Entity { type_name, id }
    }

    /// Whether the value binds as SQL NULL.
    pub fn is_null(&self) -> bool {
        match self {
            ParamValue::Bool(v) => v.is_none(),
            ParamValue::Int(v) => v.is_none(),
            ParamValue::BigInt(v) => v.is_none(),
            ParamValue::Text(v) => v.as_deref().is_none_or(|s| s == "null"),
            ParamValue::DateTime(v) => v.is_none(),
            ParamValue::Date(v) => v.is_none(),
            ParamValue::Bytes(v) => v.is_none(),
            ParamValue::Entity { id, .. } => *id == -1,
        }
    }

    /// Resolve an entity reference to its identity column value.
    pub fn resolve_reference(self) -> Self {
        match self {
            ParamValue::Entity { id, .. } if id == -1 => ParamValue::Int(None),
            ParamValue::Entity { id, .. } => ParamValue::Int(Some(id)),
            other => other,
        }
    }

    fn into_value(self) -> Value {
        match self {
            ParamValue::Bool(v) => v.into(),
            ParamValue::Int(v) => v.into(),
            ParamValue::BigInt(v) => v.into(),
            ParamValue::Text(v) => v.filter(|s| s != "null").into(),
            ParamValue::DateTime(v) => v.into(),
            ParamValue::Date(v) => v.into(),
            ParamValue::Bytes(v) => v.into(),
            ParamValue::Entity { id, .. } => Some(id).filter(|id| *id != -1).into(),
        }
    }
}

impl From<i32> for ParamValue {
    fn from(v: i32) -> Self {
        ParamValue::Int(Some(v))
    }
}

impl From<Option<i32>> for ParamValue {
    fn from(v: Option<i32>) -> Self {
        ParamValue::Int(v)
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::BigInt(Some(v))
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(Some(v))
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        ParamValue::Text(Some(v))
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Text(Some(v.to_string()))
    }
}

impl From<Option<String>> for ParamValue {
    fn from(v: Option<String>) -> Self {
        ParamValue::Text(v)
    }
}

impl From<NaiveDateTime> for ParamValue {
    fn from(v: NaiveDateTime) -> Self {
        ParamValue::DateTime(Some(v))
    }
}

impl From<NaiveDate> for ParamValue {
    fn from(v: NaiveDate) -> Self {
        ParamValue::Date(Some(v))
    }
}

/// Ordered set of named parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    entries: Vec<(String, ParamValue)>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.push(name, value);
        self
    }

    /// Add a parameter, replacing an earlier one with the same name.
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<ParamValue>) {
        let name = name.into();
        let value = value.into();
        match self
            .entries
            .iter_mut()
            .find(|(n, _)| n.eq_ignore_ascii_case(&name))
        {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Name each parameter binds under: entity references are renamed to `<typeName>Id`.
    fn bound_entries(&self) -> HashMap<String, ParamValue> {
        self.entries
            .iter()
            .map(|(name, value)| {
                let bound_name = match value {
                    ParamValue::Entity { type_name, .. } => format!("{}Id", type_name),
                    _ => name.clone(),
                };
                (bound_name.to_lowercase(), value.clone())
            })
            .collect()
    }
}

/// Build a backend statement from a command with `@name` markers.
///
/// Markers inside single-quoted literals and `@@` system variables are left
/// untouched, as are markers with no matching parameter.
pub fn bind(backend: DbBackend, command: &str, params: &Params) -> Statement {
    if params.is_empty() {
        return Statement::from_string(backend, command.to_owned());
    }

    let named = params.bound_entries();
    let mut sql = String::with_capacity(command.len());
    let mut values: Vec<Value> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    let chars: Vec<char> = command.chars().collect();
    let mut in_literal = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c == '\'' {
            in_literal = !in_literal;
            sql.push(c);
            i += 1;
            continue;
        }

        let starts_marker = c == '@'
            && !in_literal
            && (i == 0 || chars[i - 1] != '@')
            && chars
                .get(i + 1)
                .is_some_and(|n| n.is_ascii_alphabetic() || *n == '_');

        if !starts_marker {
            sql.push(c);
            i += 1;
            continue;
        }

        let mut end = i + 1;
        while end < chars.len() && (chars[end].is_ascii_alphanumeric() || chars[end] == '_') {
            end += 1;
        }
        let name: String = chars[i + 1..end].iter().collect();
        let key = name.to_lowercase();

        match named.get(&key) {
            Some(value) => match backend {
                DbBackend::Postgres => {
                    let position = match positions.get(&key) {
                        Some(p) => *p,
                        None => {
                            values.push(value.clone().into_value());
                            positions.insert(key, values.len());
                            values.len()
                        }
                    };
                    sql.push_str(&format!("${}", position));
                }
                _ => {
                    values.push(value.clone().into_value());
                    sql.push('?');
                }
            },
            None => {
                sql.push('@');
                sql.push_str(&name);
            }
        }

        i = end;
    }

    let unused: Vec<&str> = params
        .iter()
        .map(|(n, _)| n)
        .filter(|n| !command.to_lowercase().contains(&format!("@{}", n.to_lowercase())))
        .collect();
    if !unused.is_empty() {
        debug!("Parameters not referenced by command, skipped: {:?}", unused);
    }

    Statement::from_sql_and_values(backend, sql, values)
}

/// Quote a string for inclusion in an inline IN (...) list.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
