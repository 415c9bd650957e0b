//! Column definitions for collections.

use crate::types::ScalarType;

/// A declared column of a collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    /// Column name.
    pub name: String,
    /// Logical type. Untyped columns are hydrated as read.
    pub column_type: Option<ScalarType>,
    /// Whether the column accepts null.
    pub nullable: bool,
}

impl ColumnDef {
    /// Create a non-nullable typed column.
    pub fn new(name: impl Into<String>, column_type: ScalarType) -> Self {
        Self {
            name: name.into(),
            column_type: Some(column_type),
            nullable: false,
        }
    }

    /// Create a nullable column of unknown type.
    pub fn untyped(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            column_type: None,
            nullable: true,
        }
    }

    /// Mark the column nullable.
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_def() {
        let id = ColumnDef::new("id", ScalarType::Int64);
        assert_eq!(id.column_type, Some(ScalarType::Int64));
        assert!(!id.nullable);

        let body = ColumnDef::new("body", ScalarType::Text).nullable();
        assert!(body.nullable);

        let loose = ColumnDef::untyped("telephone");
        assert_eq!(loose.column_type, None);
    }
}
