//! Output formatting for hydrated results.

use clap::ValueEnum;
use comfy_table::{Cell, Table};
use ormload_proto::{Datum, Value};
use std::fmt;

/// Output format for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Pretty-printed JSON
    Json,
    /// One row per result, nested records as inline JSON
    Table,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Table => write!(f, "table"),
        }
    }
}

/// Formatter trait for result output.
pub trait Formatter {
    fn format_results(&self, items: &[Datum]) -> String;

    fn format_sql(&self, sql: &str) -> String {
        sql.to_string()
    }
}

pub fn create_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Json => Box::new(JsonFormatter),
        OutputFormat::Table => Box::new(TableFormatter),
    }
}

pub struct JsonFormatter;

impl Formatter for JsonFormatter {
    fn format_results(&self, items: &[Datum]) -> String {
        serde_json::to_string_pretty(items).unwrap_or_else(|_| "[]".to_string())
    }
}

/// Table formatter using comfy-table.
///
/// Columns are the union of the top-level keys of every record, in first
/// seen order.
pub struct TableFormatter;

impl Formatter for TableFormatter {
    fn format_results(&self, items: &[Datum]) -> String {
        let mut headers: Vec<String> = Vec::new();
        for item in items {
            match item {
                Datum::Record(record) => {
                    for key in record.keys() {
                        if !headers.iter().any(|h| h == key) {
                            headers.push(key.to_string());
                        }
                    }
                }
                _ if headers.is_empty() => headers.push("value".to_string()),
                _ => {}
            }
        }

        let mut table = Table::new();
        table.set_header(headers.iter().map(Cell::new).collect::<Vec<_>>());
        for item in items {
            let cells: Vec<Cell> = match item {
                Datum::Record(record) => headers
                    .iter()
                    .map(|h| Cell::new(record.get(h).map(format_datum).unwrap_or_default()))
                    .collect(),
                other => vec![Cell::new(format_datum(other))],
            };
            table.add_row(cells);
        }

        format!("{}\n{} row(s)", table, items.len())
    }
}

/// Render one cell; nested records become compact JSON.
fn format_datum(datum: &Datum) -> String {
    match datum {
        Datum::Value(Value::Null) => "NULL".to_string(),
        Datum::Value(Value::String(s)) => s.clone(),
        Datum::Value(value) => value.to_string(),
        nested => serde_json::to_string(nested).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ormload_proto::Record;
    use pretty_assertions::assert_eq;

    fn authors() -> Vec<Datum> {
        vec![
            Record::new()
                .with("id", 1i64)
                .with("name", "mariano")
                .with(
                    "articles",
                    vec![Record::new().with("id", 1i64).with("title", "First")],
                )
                .into(),
            Record::new().with("id", 2i64).with("name", "nate").into(),
        ]
    }

    #[test]
    fn test_json_output() {
        let output = create_formatter(OutputFormat::Json).format_results(&authors());
        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(
            parsed,
            serde_json::json!([
                {"id": 1, "name": "mariano", "articles": [{"id": 1, "title": "First"}]},
                {"id": 2, "name": "nate"}
            ])
        );
    }

    #[test]
    fn test_table_output() {
        let output = create_formatter(OutputFormat::Table).format_results(&authors());
        assert!(output.contains("articles"));
        assert!(output.contains(r#"[{"id":1,"title":"First"}]"#));
        assert!(output.contains("nate"));
        assert!(output.ends_with("2 row(s)"));
    }

    #[test]
    fn test_table_output_for_scalars() {
        let items = vec![Datum::from(2i64), Datum::Value(Value::Null)];
        let output = TableFormatter.format_results(&items);
        assert!(output.contains("value"));
        assert!(output.contains("NULL"));
    }
}
