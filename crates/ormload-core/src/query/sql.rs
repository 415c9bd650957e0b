//! SQL rendering for select statements.

use crate::config::PlaceholderStyle;
use ormload_proto::statement::is_identifier;
use ormload_proto::{CompiledStatement, Condition, SelectStatement, Value};

/// Render a statement into SQL text and positional parameters.
pub fn render(statement: &SelectStatement, style: PlaceholderStyle) -> CompiledStatement {
    let mut renderer = Renderer {
        style,
        params: Vec::new(),
    };
    let sql = renderer.statement(statement);
    CompiledStatement::new(sql, renderer.params)
}

/// Quote a column reference or table name.
///
/// `alias.column` is quoted per part and `*` is kept bare. Anything that is
/// not a plain (optionally qualified) identifier is treated as an
/// expression and returned verbatim.
pub fn quote(expr: &str) -> String {
    let parts: Vec<&str> = expr.split('.').collect();
    let last = parts.len() - 1;
    let quotable = parts
        .iter()
        .enumerate()
        .all(|(i, p)| is_identifier(p) || (i == last && *p == "*"));
    if !quotable {
        return expr.to_string();
    }
    parts
        .iter()
        .map(|p| {
            if *p == "*" {
                "*".to_string()
            } else {
                format!("\"{}\"", p)
            }
        })
        .collect::<Vec<_>>()
        .join(".")
}

struct Renderer {
    style: PlaceholderStyle,
    params: Vec<Value>,
}

impl Renderer {
    fn placeholder(&mut self, value: Value) -> String {
        self.params.push(value);
        match self.style {
            PlaceholderStyle::Question => "?".to_string(),
            PlaceholderStyle::Numbered => format!("${}", self.params.len()),
        }
    }

    fn statement(&mut self, statement: &SelectStatement) -> String {
        let mut sql = String::from("SELECT ");
        if statement.select.is_empty() {
            sql.push('*');
        } else {
            let items: Vec<String> = statement
                .select
                .iter()
                .map(|item| match &item.key {
                    Some(key) => format!("{} AS {}", quote(&item.expr), quote_alias(key)),
                    None => quote(&item.expr),
                })
                .collect();
            sql.push_str(&items.join(", "));
        }

        sql.push_str(&format!(
            " FROM {} AS {}",
            quote(&statement.from.table),
            quote_alias(&statement.from.alias)
        ));

        for join in &statement.joins {
            let on = if join.conditions.is_empty() {
                "1 = 1".to_string()
            } else {
                self.conjunction(&join.conditions)
            };
            sql.push_str(&format!(
                " {} JOIN {} AS {} ON {}",
                join.kind.as_sql(),
                quote(&join.table),
                quote_alias(&join.alias),
                on
            ));
        }

        if !statement.conditions.is_empty() {
            let conditions = self.conjunction(&statement.conditions);
            sql.push_str(" WHERE ");
            sql.push_str(&conditions);
        }

        if !statement.group_by.is_empty() {
            let fields: Vec<String> = statement.group_by.iter().map(|f| quote(f)).collect();
            sql.push_str(" GROUP BY ");
            sql.push_str(&fields.join(", "));
        }

        if !statement.having.is_empty() {
            let having = self.conjunction(&statement.having);
            sql.push_str(" HAVING ");
            sql.push_str(&having);
        }

        if !statement.order_by.is_empty() {
            let order: Vec<String> = statement
                .order_by
                .iter()
                .map(|o| format!("{} {}", quote(&o.field), o.direction.as_sql()))
                .collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&order.join(", "));
        }

        match (statement.limit, statement.offset) {
            (Some(limit), Some(offset)) => {
                sql.push_str(&format!(" LIMIT {} OFFSET {}", limit, offset))
            }
            (Some(limit), None) => sql.push_str(&format!(" LIMIT {}", limit)),
            (None, Some(offset)) => sql.push_str(&format!(" LIMIT -1 OFFSET {}", offset)),
            (None, None) => {}
        }

        sql
    }

    fn conjunction(&mut self, conditions: &[Condition]) -> String {
        self.group(conditions, " AND ", "1 = 1")
    }

    fn group(&mut self, items: &[Condition], separator: &str, empty: &str) -> String {
        if items.is_empty() {
            return empty.to_string();
        }
        let parts: Vec<String> = items
            .iter()
            .map(|c| match c {
                Condition::And(inner) | Condition::Or(inner) if inner.len() > 1 => {
                    format!("({})", self.condition(c))
                }
                _ => self.condition(c),
            })
            .collect();
        parts.join(separator)
    }

    fn condition(&mut self, condition: &Condition) -> String {
        match condition {
            Condition::Eq { field, value } if value.is_null() => {
                format!("{} IS NULL", quote(field))
            }
            Condition::Ne { field, value } if value.is_null() => {
                format!("{} IS NOT NULL", quote(field))
            }
            Condition::Eq { field, value } => self.compare(field, "=", value),
            Condition::Ne { field, value } => self.compare(field, "!=", value),
            Condition::Lt { field, value } => self.compare(field, "<", value),
            Condition::Le { field, value } => self.compare(field, "<=", value),
            Condition::Gt { field, value } => self.compare(field, ">", value),
            Condition::Ge { field, value } => self.compare(field, ">=", value),
            Condition::In { values, .. } if values.is_empty() => "1 = 0".to_string(),
            Condition::NotIn { values, .. } if values.is_empty() => "1 = 1".to_string(),
            Condition::In { field, values } => {
                format!("{} IN ({})", quote(field), self.list(values))
            }
            Condition::NotIn { field, values } => {
                format!("{} NOT IN ({})", quote(field), self.list(values))
            }
            Condition::IsNull { field } => format!("{} IS NULL", quote(field)),
            Condition::IsNotNull { field } => format!("{} IS NOT NULL", quote(field)),
            Condition::Like { field, pattern } => {
                let p = self.placeholder(Value::String(pattern.clone()));
                format!("{} LIKE {}", quote(field), p)
            }
            Condition::NotLike { field, pattern } => {
                let p = self.placeholder(Value::String(pattern.clone()));
                format!("{} NOT LIKE {}", quote(field), p)
            }
            Condition::ColumnEq { left, right } => format!("{} = {}", quote(left), quote(right)),
            Condition::InSubquery { field, subquery } => {
                let sub = self.statement(subquery);
                format!("{} IN ({})", quote(field), sub)
            }
            Condition::Raw(sql) => sql.clone(),
            Condition::And(items) => self.group(items, " AND ", "1 = 1"),
            Condition::Or(items) => self.group(items, " OR ", "1 = 0"),
            Condition::Not(inner) => format!("NOT ({})", self.condition(inner)),
        }
    }

    fn compare(&mut self, field: &str, op: &str, value: &Value) -> String {
        let p = self.placeholder(value.clone());
        format!("{} {} {}", quote(field), op, p)
    }

    fn list(&mut self, values: &[Value]) -> String {
        values
            .iter()
            .map(|v| self.placeholder(v.clone()))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

fn quote_alias(alias: &str) -> String {
    format!("\"{}\"", alias.replace('"', "\"\""))
}
