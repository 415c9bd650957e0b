//! Filter conditions and ordering specifications.

use crate::statement::{qualify_field, SelectStatement};
use crate::value::Value;
use std::fmt;

/// A filter condition.
///
/// Field names are either bare column names, which the planner qualifies
/// with the alias of the collection they are attached to, or already
/// qualified `alias.column` references.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Field equals value.
    Eq { field: String, value: Value },
    /// Field not equals value.
    Ne { field: String, value: Value },
    /// Field less than value.
    Lt { field: String, value: Value },
    /// Field less than or equal to value.
    Le { field: String, value: Value },
    /// Field greater than value.
    Gt { field: String, value: Value },
    /// Field greater than or equal to value.
    Ge { field: String, value: Value },
    /// Field is in a set of values.
    In { field: String, values: Vec<Value> },
    /// Field is not in a set of values.
    NotIn { field: String, values: Vec<Value> },
    /// Field is null.
    IsNull { field: String },
    /// Field is not null.
    IsNotNull { field: String },
    /// Field matches a LIKE pattern.
    Like { field: String, pattern: String },
    /// Field does not match a LIKE pattern.
    NotLike { field: String, pattern: String },
    /// Two columns are equal. Used for join conditions.
    ColumnEq { left: String, right: String },
    /// Field is in the single-column result of a subquery.
    InSubquery {
        field: String,
        subquery: Box<SelectStatement>,
    },
    /// Verbatim SQL fragment.
    Raw(String),
    /// All conditions must be true.
    And(Vec<Condition>),
    /// At least one condition must be true.
    Or(Vec<Condition>),
    /// Negation.
    Not(Box<Condition>),
}

impl Condition {
    /// Create an equality condition.
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Condition::Eq {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Create a not-equal condition.
    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Condition::Ne {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Create a less-than condition.
    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Condition::Lt {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Create a less-than-or-equal condition.
    pub fn le(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Condition::Le {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Create a greater-than condition.
    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Condition::Gt {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Create a greater-than-or-equal condition.
    pub fn ge(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Condition::Ge {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Create an IN condition.
    pub fn in_values(field: impl Into<String>, values: Vec<Value>) -> Self {
        Condition::In {
            field: field.into(),
            values,
        }
    }

    /// Create a NOT IN condition.
    pub fn not_in_values(field: impl Into<String>, values: Vec<Value>) -> Self {
        Condition::NotIn {
            field: field.into(),
            values,
        }
    }

    /// Create an IS NULL condition.
    pub fn is_null(field: impl Into<String>) -> Self {
        Condition::IsNull {
            field: field.into(),
        }
    }

    /// Create an IS NOT NULL condition.
    pub fn is_not_null(field: impl Into<String>) -> Self {
        Condition::IsNotNull {
            field: field.into(),
        }
    }

    /// Create a LIKE condition.
    pub fn like(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        Condition::Like {
            field: field.into(),
            pattern: pattern.into(),
        }
    }

    /// Create a NOT LIKE condition.
    pub fn not_like(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        Condition::NotLike {
            field: field.into(),
            pattern: pattern.into(),
        }
    }

    /// Create a column-to-column equality.
    pub fn column_eq(left: impl Into<String>, right: impl Into<String>) -> Self {
        Condition::ColumnEq {
            left: left.into(),
            right: right.into(),
        }
    }

    /// Create a subquery membership condition.
    pub fn in_subquery(field: impl Into<String>, subquery: SelectStatement) -> Self {
        Condition::InSubquery {
            field: field.into(),
            subquery: Box::new(subquery),
        }
    }

    /// Create a verbatim SQL condition.
    pub fn raw(sql: impl Into<String>) -> Self {
        Condition::Raw(sql.into())
    }

    pub fn and(conditions: Vec<Condition>) -> Self {
        Condition::And(conditions)
    }

    pub fn or(conditions: Vec<Condition>) -> Self {
        Condition::Or(conditions)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(condition: Condition) -> Self {
        Condition::Not(Box::new(condition))
    }

    /// Return a copy with every bare field name prefixed by `alias`.
    ///
    /// Qualified names, raw fragments and subqueries are left untouched.
    pub fn qualified(&self, alias: &str) -> Condition {
        let q = |field: &String| qualify_field(field, alias);
        match self {
            Condition::Eq { field, value } => Condition::Eq {
                field: q(field),
                value: value.clone(),
            },
            Condition::Ne { field, value } => Condition::Ne {
                field: q(field),
                value: value.clone(),
            },
            Condition::Lt { field, value } => Condition::Lt {
                field: q(field),
                value: value.clone(),
            },
            Condition::Le { field, value } => Condition::Le {
                field: q(field),
                value: value.clone(),
            },
            Condition::Gt { field, value } => Condition::Gt {
                field: q(field),
                value: value.clone(),
            },
            Condition::Ge { field, value } => Condition::Ge {
                field: q(field),
                value: value.clone(),
            },
            Condition::In { field, values } => Condition::In {
                field: q(field),
                values: values.clone(),
            },
            Condition::NotIn { field, values } => Condition::NotIn {
                field: q(field),
                values: values.clone(),
            },
            Condition::IsNull { field } => Condition::IsNull { field: q(field) },
            Condition::IsNotNull { field } => Condition::IsNotNull { field: q(field) },
            Condition::Like { field, pattern } => Condition::Like {
                field: q(field),
                pattern: pattern.clone(),
            },
            Condition::NotLike { field, pattern } => Condition::NotLike {
                field: q(field),
                pattern: pattern.clone(),
            },
            Condition::ColumnEq { left, right } => Condition::ColumnEq {
                left: q(left),
                right: q(right),
            },
            Condition::InSubquery { field, subquery } => Condition::InSubquery {
                field: q(field),
                subquery: subquery.clone(),
            },
            Condition::Raw(sql) => Condition::Raw(sql.clone()),
            Condition::And(items) => {
                Condition::And(items.iter().map(|c| c.qualified(alias)).collect())
            }
            Condition::Or(items) => {
                Condition::Or(items.iter().map(|c| c.qualified(alias)).collect())
            }
            Condition::Not(inner) => Condition::Not(Box::new(inner.qualified(alias))),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Eq { field, value } => write!(f, "{} = {}", field, value),
            Condition::Ne { field, value } => write!(f, "{} != {}", field, value),
            Condition::Lt { field, value } => write!(f, "{} < {}", field, value),
            Condition::Le { field, value } => write!(f, "{} <= {}", field, value),
            Condition::Gt { field, value } => write!(f, "{} > {}", field, value),
            Condition::Ge { field, value } => write!(f, "{} >= {}", field, value),
            Condition::In { field, values } => {
                write!(f, "{} IN ({})", field, join_values(values))
            }
            Condition::NotIn { field, values } => {
                write!(f, "{} NOT IN ({})", field, join_values(values))
            }
            Condition::IsNull { field } => write!(f, "{} IS NULL", field),
            Condition::IsNotNull { field } => write!(f, "{} IS NOT NULL", field),
            Condition::Like { field, pattern } => write!(f, "{} LIKE '{}'", field, pattern),
            Condition::NotLike { field, pattern } => {
                write!(f, "{} NOT LIKE '{}'", field, pattern)
            }
            Condition::ColumnEq { left, right } => write!(f, "{} = {}", left, right),
            Condition::InSubquery { field, subquery } => {
                write!(f, "{} IN (SELECT ... FROM {})", field, subquery.from.table)
            }
            Condition::Raw(sql) => write!(f, "{}", sql),
            Condition::And(items) => write_group(f, items, " AND "),
            Condition::Or(items) => write_group(f, items, " OR "),
            Condition::Not(inner) => write!(f, "NOT ({})", inner),
        }
    }
}

fn join_values(values: &[Value]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn write_group(f: &mut fmt::Formatter<'_>, items: &[Condition], sep: &str) -> fmt::Result {
    let parts: Vec<String> = items
        .iter()
        .map(|c| match c {
            Condition::And(_) | Condition::Or(_) => format!("({})", c),
            _ => c.to_string(),
        })
        .collect();
    write!(f, "{}", parts.join(sep))
}

/// Order direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OrderDirection {
    #[default]
    Asc,
    Desc,
}

impl OrderDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            OrderDirection::Asc => "ASC",
            OrderDirection::Desc => "DESC",
        }
    }

    /// Parse `asc`/`desc` in any case.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" => Some(OrderDirection::Asc),
            "desc" => Some(OrderDirection::Desc),
            _ => None,
        }
    }
}

/// Order specification.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OrderSpec {
    /// Field or expression to order by.
    pub field: String,
    /// Sort direction.
    pub direction: OrderDirection,
}

impl OrderSpec {
    /// Create an ascending order spec.
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: OrderDirection::Asc,
        }
    }

    /// Create a descending order spec.
    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: OrderDirection::Desc,
        }
    }

    pub fn qualified(&self, alias: &str) -> OrderSpec {
        OrderSpec {
            field: qualify_field(&self.field, alias),
            direction: self.direction,
        }
    }
}
