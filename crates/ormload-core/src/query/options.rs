//! Normalizers for loosely-typed query options.
//!
//! Options arrive as JSON values (`applyOptions`-style configuration, contain
//! mappings, CLI arguments). Each function here accepts the documented
//! shorthand for one option and rejects anything else with
//! [`Error::InvalidOption`].

use crate::error::{Error, Result};
use ormload_proto::{Condition, JoinClause, JoinKind, OrderDirection, OrderSpec, Value};
use serde_json::Value as Json;

/// Convert a JSON scalar into a [`Value`].
pub fn value_from_json(key: &str, json: &Json) -> Result<Value> {
    match json {
        Json::Null => Ok(Value::Null),
        Json::Bool(b) => Ok(Value::Bool(*b)),
        Json::Number(n) => match n.as_i64() {
            Some(i) => Ok(Value::Int64(i)),
            None => n
                .as_f64()
                .map(Value::Float64)
                .ok_or_else(|| Error::invalid_option(key, format!("unsupported number {}", n))),
        },
        Json::String(s) => Ok(Value::String(s.clone())),
        other => Err(Error::invalid_option(
            key,
            format!("expected a scalar, found {}", other),
        )),
    }
}

/// Parse a list of names: a single string or an array of strings.
pub fn parse_names(key: &str, json: &Json) -> Result<Vec<String>> {
    match json {
        Json::String(s) => Ok(vec![s.clone()]),
        Json::Array(items) => items
            .iter()
            .map(|item| match item {
                Json::String(s) => Ok(s.clone()),
                other => Err(Error::invalid_option(
                    key,
                    format!("expected a string, found {}", other),
                )),
            })
            .collect(),
        other => Err(Error::invalid_option(
            key,
            format!("expected a string or list of strings, found {}", other),
        )),
    }
}

/// Parse a non-negative integer such as `limit` or `offset`.
pub fn parse_count(key: &str, json: &Json) -> Result<u64> {
    match json {
        Json::Number(n) => n
            .as_u64()
            .ok_or_else(|| Error::invalid_option(key, format!("expected a count, found {}", n))),
        Json::String(s) => s
            .trim()
            .parse::<u64>()
            .map_err(|_| Error::invalid_option(key, format!("expected a count, found '{}'", s))),
        other => Err(Error::invalid_option(
            key,
            format!("expected a count, found {}", other),
        )),
    }
}

/// Parse conditions.
///
/// Accepted forms:
/// - `{"field": value}`: equality, `IS NULL` for null, `IN` for arrays
/// - `{"field op": value}` with `op` one of `= != <> < <= > >= LIKE`,
///   `NOT LIKE`, `IN`, `NOT IN`, `IS`, `IS NOT`
/// - `{"OR": ...}`, `{"AND": ...}`, `{"NOT": ...}` for nested groups
/// - a string, taken as a raw SQL fragment
/// - an array of any of the above, combined with AND
pub fn parse_conditions(key: &str, json: &Json) -> Result<Vec<Condition>> {
    match json {
        Json::Null => Ok(Vec::new()),
        Json::String(s) => Ok(vec![Condition::raw(s.clone())]),
        Json::Array(items) => {
            let mut out = Vec::new();
            for item in items {
                match item {
                    Json::Array(_) => out.push(Condition::and(parse_conditions(key, item)?)),
                    _ => out.extend(parse_conditions(key, item)?),
                }
            }
            Ok(out)
        }
        Json::Object(map) => {
            let mut out = Vec::with_capacity(map.len());
            for (field, value) in map {
                out.push(parse_condition_entry(key, field, value)?);
            }
            Ok(out)
        }
        other => Err(Error::invalid_option(
            key,
            format!("expected conditions, found {}", other),
        )),
    }
}

fn parse_condition_entry(key: &str, field: &str, value: &Json) -> Result<Condition> {
    match field.trim().to_ascii_uppercase().as_str() {
        "AND" => return Ok(Condition::and(parse_conditions(key, value)?)),
        "OR" => return Ok(Condition::or(parse_conditions(key, value)?)),
        "NOT" => return Ok(Condition::not(Condition::and(parse_conditions(key, value)?))),
        _ => {}
    }

    let (name, op) = match field.trim().split_once(char::is_whitespace) {
        Some((name, op)) => (name.to_string(), op.trim().to_ascii_uppercase()),
        None => (field.trim().to_string(), "=".to_string()),
    };
    let op = op.split_whitespace().collect::<Vec<_>>().join(" ");

    match op.as_str() {
        "=" => match value {
            Json::Null => Ok(Condition::is_null(name)),
            Json::Array(_) => Ok(Condition::in_values(name, list_values(key, value)?)),
            _ => Ok(Condition::eq(name, value_from_json(key, value)?)),
        },
        "!=" | "<>" => match value {
            Json::Null => Ok(Condition::is_not_null(name)),
            Json::Array(_) => Ok(Condition::not_in_values(name, list_values(key, value)?)),
            _ => Ok(Condition::ne(name, value_from_json(key, value)?)),
        },
        "<" => Ok(Condition::lt(name, value_from_json(key, value)?)),
        "<=" => Ok(Condition::le(name, value_from_json(key, value)?)),
        ">" => Ok(Condition::gt(name, value_from_json(key, value)?)),
        ">=" => Ok(Condition::ge(name, value_from_json(key, value)?)),
        "IN" => Ok(Condition::in_values(name, list_values(key, value)?)),
        "NOT IN" => Ok(Condition::not_in_values(name, list_values(key, value)?)),
        "LIKE" => Ok(Condition::like(name, pattern(key, value)?)),
        "NOT LIKE" => Ok(Condition::not_like(name, pattern(key, value)?)),
        "IS" if value.is_null() => Ok(Condition::is_null(name)),
        "IS NOT" if value.is_null() => Ok(Condition::is_not_null(name)),
        _ => Err(Error::invalid_option(
            key,
            format!("unsupported operator '{}' for field '{}'", op, name),
        )),
    }
}

fn list_values(key: &str, json: &Json) -> Result<Vec<Value>> {
    match json {
        Json::Array(items) => items.iter().map(|v| value_from_json(key, v)).collect(),
        other => Ok(vec![value_from_json(key, other)?]),
    }
}

fn pattern(key: &str, json: &Json) -> Result<String> {
    json.as_str()
        .map(str::to_string)
        .ok_or_else(|| Error::invalid_option(key, format!("expected a pattern, found {}", json)))
}

/// Parse an ordering.
///
/// Accepted forms: `"field"`, `"field DESC"`, `{"field": "asc" | "desc"}`, or
/// an array of those.
pub fn parse_order(key: &str, json: &Json) -> Result<Vec<OrderSpec>> {
    match json {
        Json::Null => Ok(Vec::new()),
        Json::String(s) => Ok(vec![order_from_str(key, s)?]),
        Json::Array(items) => {
            let mut out = Vec::new();
            for item in items {
                out.extend(parse_order(key, item)?);
            }
            Ok(out)
        }
        Json::Object(map) => map
            .iter()
            .map(|(field, direction)| {
                let direction = direction
                    .as_str()
                    .and_then(OrderDirection::parse)
                    .ok_or_else(|| {
                        Error::invalid_option(
                            key,
                            format!("invalid direction {} for '{}'", direction, field),
                        )
                    })?;
                Ok(OrderSpec {
                    field: field.clone(),
                    direction,
                })
            })
            .collect(),
        other => Err(Error::invalid_option(
            key,
            format!("expected an ordering, found {}", other),
        )),
    }
}

fn order_from_str(key: &str, s: &str) -> Result<OrderSpec> {
    let trimmed = s.trim();
    if let Some((field, direction)) = trimmed.rsplit_once(char::is_whitespace) {
        if let Some(direction) = OrderDirection::parse(direction) {
            return Ok(OrderSpec {
                field: field.trim().to_string(),
                direction,
            });
        }
    }
    if trimmed.is_empty() {
        return Err(Error::invalid_option(key, "empty ordering"));
    }
    Ok(OrderSpec::asc(trimmed))
}

/// Parse explicit joins.
///
/// Accepted forms: `{"alias": "table"}`, `{"alias": {"table": .., "type": ..,
/// "conditions": ..}}`, or an array of `{"alias": .., ...}` objects. Joins
/// default to `INNER` and to a table named like their alias.
pub fn parse_joins(key: &str, json: &Json) -> Result<Vec<JoinClause>> {
    match json {
        Json::Null => Ok(Vec::new()),
        Json::String(table) => Ok(vec![JoinClause::new(table.clone(), table.clone())]),
        Json::Object(map) => map
            .iter()
            .map(|(alias, spec)| parse_join(key, alias, spec))
            .collect(),
        Json::Array(items) => items
            .iter()
            .map(|item| match item {
                Json::String(table) => Ok(JoinClause::new(table.clone(), table.clone())),
                Json::Object(map) => {
                    let alias = map
                        .get("alias")
                        .and_then(Json::as_str)
                        .or_else(|| map.get("table").and_then(Json::as_str))
                        .ok_or_else(|| Error::invalid_option(key, "join entry needs an alias"))?;
                    parse_join(key, alias, item)
                }
                other => Err(Error::invalid_option(
                    key,
                    format!("expected a join, found {}", other),
                )),
            })
            .collect(),
        other => Err(Error::invalid_option(
            key,
            format!("expected joins, found {}", other),
        )),
    }
}

fn parse_join(key: &str, alias: &str, spec: &Json) -> Result<JoinClause> {
    match spec {
        Json::String(table) => Ok(JoinClause::new(alias, table.clone())),
        Json::Null => Ok(JoinClause::new(alias, alias)),
        Json::Object(map) => {
            let table = map.get("table").and_then(Json::as_str).unwrap_or(alias);
            let kind = match map.get("type") {
                None | Some(Json::Null) => JoinKind::Inner,
                Some(Json::String(s)) => JoinKind::parse(s).ok_or_else(|| {
                    Error::invalid_option(key, format!("unknown join type '{}'", s))
                })?,
                Some(other) => {
                    return Err(Error::invalid_option(
                        key,
                        format!("expected a join type, found {}", other),
                    ))
                }
            };
            let mut join = JoinClause::new(alias, table).with_kind(kind);
            if let Some(conditions) = map.get("conditions") {
                join.conditions = parse_conditions(key, conditions)?;
            }
            Ok(join)
        }
        other => Err(Error::invalid_option(
            key,
            format!("expected a join for '{}', found {}", alias, other),
        )),
    }
}
