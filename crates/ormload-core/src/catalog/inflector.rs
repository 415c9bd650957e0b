//! Naming conventions for tables, keys and properties.

use heck::{ToSnakeCase, ToUpperCamelCase};

/// Plural form of a snake_case word.
pub fn pluralize(word: &str) -> String {
    pluralizer::pluralize(word, 2, false)
}

/// Singular form of a snake_case word. Words not ending in `s` are kept.
pub fn singularize(word: &str) -> String {
    if word.ends_with('s') {
        pluralizer::pluralize(word, 1, false)
    } else {
        word.to_string()
    }
}

/// Default table name for a collection alias: `orderType` -> `order_types`.
pub fn tableize(alias: &str) -> String {
    pluralize(&alias.to_snake_case())
}

/// Default foreign key pointing at `name`: `Article` -> `article_id`.
pub fn foreign_key(name: &str) -> String {
    format!("{}_id", singularize(&name.to_snake_case()))
}

/// Default property name under which an association is hydrated.
pub fn property_name(association: &str, to_many: bool) -> String {
    let snake = association.to_snake_case();
    if to_many {
        pluralize(&snake)
    } else {
        snake
    }
}

/// Default junction collection name for a many-to-many pair:
/// both names in UpperCamelCase, sorted, concatenated.
pub fn junction_name(source: &str, target: &str) -> String {
    let mut names = [source.to_upper_camel_case(), target.to_upper_camel_case()];
    names.sort();
    names.concat()
}

/// Default junction table for two tables: sorted and joined by `_`.
pub fn junction_table(source_table: &str, target_table: &str) -> String {
    let mut tables = [source_table, target_table];
    tables.sort_unstable();
    tables.join("_")
}
