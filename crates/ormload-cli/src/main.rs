//! ormload command-line client
//!
//! Runs one eager-loading query against a SQLite database and prints the
//! hydrated records.

mod error;
mod formatter;
mod schema;

use clap::Parser;
use error::{CliError, Result};
use formatter::{create_formatter, OutputFormat};
use ormload_core::catalog::CollectionConfig;
use ormload_core::{Session, TypeMap};
use ormload_sqlite::SqliteExecutor;
use schema::SchemaFile;
use serde_json::Value as Json;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// ormload command-line client
#[derive(Parser, Debug)]
#[command(name = "ormload")]
#[command(version, about = "Query a SQLite database with eager-loaded associations")]
pub struct Args {
    /// SQLite database file
    #[arg(short, long)]
    pub database: PathBuf,

    /// JSON schema declaring collections and associations
    #[arg(short, long)]
    pub schema: Option<PathBuf>,

    /// Root collection to query
    #[arg(short, long)]
    pub root: String,

    /// Associations to load: a dotted path or a JSON contain specification
    #[arg(short, long)]
    pub contain: Option<String>,

    /// Query options as a JSON object (conditions, fields, order, limit, ...)
    #[arg(short, long)]
    pub options: Option<String>,

    /// Fetch only the first record
    #[arg(long)]
    pub first: bool,

    /// Print the root statement instead of running it
    #[arg(long)]
    pub sql: bool,

    /// Output format
    #[arg(long, default_value = "json", value_enum)]
    pub format: OutputFormat,
}

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("ormload_cli=info,ormload_core=warn,ormload_sqlite=warn")
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if let Err(e) = run(args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let types = TypeMap::new();
    let executor = SqliteExecutor::open(&args.database)?.with_types(types.clone());
    let session = Session::new(executor);

    match &args.schema {
        Some(path) => SchemaFile::read(path)?.load(&session, &types)?,
        None => {
            session.collection(&args.root, CollectionConfig::new())?;
        }
    }

    let mut query = session.query(&args.root)?;
    if let Some(options) = &args.options {
        let options: Json =
            serde_json::from_str(options).map_err(|e| CliError::json("--options", e))?;
        query = query.apply_options(options);
    }
    if let Some(contain) = &args.contain {
        query = query.contain(parse_contain(contain));
    }

    let formatter = create_formatter(args.format);
    if args.sql {
        println!("{}", formatter.format_sql(&query.sql()?));
        return Ok(());
    }

    let items = if args.first {
        query.first()?.into_iter().collect()
    } else {
        query.to_array()?
    };
    tracing::info!(root = %args.root, results = items.len(), "query finished");
    println!("{}", formatter.format_results(&items));
    Ok(())
}

/// JSON specifications are used as given; anything else is a dotted path.
fn parse_contain(raw: &str) -> Json {
    serde_json::from_str(raw).unwrap_or_else(|_| Json::String(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_contain() {
        assert_eq!(parse_contain("article.tag"), Json::from("article.tag"));
        assert_eq!(
            parse_contain(r#"["article", "author"]"#),
            serde_json::json!(["article", "author"])
        );
    }

    #[test]
    fn test_args() {
        let args = Args::parse_from([
            "ormload",
            "--database",
            "blog.db",
            "--root",
            "author",
            "--contain",
            "article",
            "--first",
            "--format",
            "table",
        ]);
        assert_eq!(args.root, "author");
        assert_eq!(args.contain.as_deref(), Some("article"));
        assert!(args.first);
        assert!(!args.sql);
        assert_eq!(args.format, OutputFormat::Table);
        assert!(args.schema.is_none());
    }
}
