//! End-to-end eager loading against an in-memory SQLite database.

use ormload_core::catalog::{AssociationOptions, CollectionConfig};
use ormload_core::query::ContainNode;
use ormload_core::{EngineConfig, Error, ScalarType, Session, Strategy};
use ormload_proto::{Condition, Datum, OrderSpec};
use ormload_sqlite::SqliteExecutor;
use pretty_assertions::assert_eq;
use serde_json::{json, Value as Json};

const FIXTURES: &str = "
    CREATE TABLE authors (id INTEGER PRIMARY KEY, name VARCHAR(255) NOT NULL);
    CREATE TABLE articles (
        id INTEGER PRIMARY KEY,
        author_id INTEGER,
        title VARCHAR(255) NOT NULL
    );
    CREATE TABLE tags (id INTEGER PRIMARY KEY, name VARCHAR(255) NOT NULL);
    CREATE TABLE articles_tags (article_id INTEGER NOT NULL, tag_id INTEGER NOT NULL);

    INSERT INTO authors (id, name) VALUES (1, 'mariano'), (2, 'nate'), (3, 'larry'), (4, 'garrett');
    INSERT INTO articles (id, author_id, title) VALUES
        (1, 1, 'First'), (2, 3, 'Second'), (3, 1, 'Third');
    INSERT INTO tags (id, name) VALUES (1, 'tag1'), (2, 'tag2'), (3, 'tag3');
    INSERT INTO articles_tags (article_id, tag_id) VALUES (1, 1), (1, 2), (2, 1), (2, 3);
";

fn executor() -> SqliteExecutor {
    let executor = SqliteExecutor::open_in_memory().unwrap();
    executor.execute_batch(FIXTURES).unwrap();
    executor
}

fn declare(session: &Session) {
    let author = session.collection("author", CollectionConfig::new()).unwrap();
    let article = session.collection("article", CollectionConfig::new()).unwrap();
    session.collection("tag", CollectionConfig::new()).unwrap();
    author.has_many("article", AssociationOptions::new()).unwrap();
    article.belongs_to("author", AssociationOptions::new()).unwrap();
    article.belongs_to_many("tag", AssociationOptions::new()).unwrap();
}

fn session() -> Session {
    let session = Session::new(executor());
    declare(&session);
    session
}

fn to_json(items: Vec<Datum>) -> Json {
    serde_json::to_value(items).unwrap()
}

fn authors_with_articles(session: &Session, strategy: Strategy) -> Json {
    let results = session
        .query("author")
        .unwrap()
        .order(OrderSpec::asc("id"))
        .contain(ContainNode::new("article").strategy(strategy))
        .to_array()
        .unwrap();
    to_json(results)
}

#[test]
fn test_columns_are_described() {
    let session = session();
    let article = session.registry().get("article").unwrap();
    let names: Vec<&str> = article.columns().iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["id", "author_id", "title"]);
    assert_eq!(article.column_type("author_id"), Some(ScalarType::Int64));
    assert_eq!(article.column_type("title"), Some(ScalarType::Text));
}

#[test]
fn test_has_many_strategies_agree() {
    let session = session();
    let expected = json!([
        {
            "id": 1,
            "name": "mariano",
            "articles": [
                {"id": 1, "author_id": 1, "title": "First"},
                {"id": 3, "author_id": 1, "title": "Third"}
            ]
        },
        {"id": 2, "name": "nate"},
        {
            "id": 3,
            "name": "larry",
            "articles": [{"id": 2, "author_id": 3, "title": "Second"}]
        },
        {"id": 4, "name": "garrett"}
    ]);

    assert_eq!(authors_with_articles(&session, Strategy::Select), expected);
    assert_eq!(authors_with_articles(&session, Strategy::Subquery), expected);
    assert_eq!(authors_with_articles(&session, Strategy::Join), expected);
}

#[test]
fn test_subquery_respects_parent_limit() {
    let session = session();
    let results = session
        .query("author")
        .unwrap()
        .order(OrderSpec::desc("id"))
        .limit(2)
        .contain(ContainNode::new("article").strategy(Strategy::Subquery))
        .to_array()
        .unwrap();

    assert_eq!(
        to_json(results),
        json!([
            {"id": 4, "name": "garrett"},
            {
                "id": 3,
                "name": "larry",
                "articles": [{"id": 2, "author_id": 3, "title": "Second"}]
            }
        ])
    );
}

#[test]
fn test_belongs_to_many_strategies_agree() {
    let session = session();
    let load = |strategy: Strategy| {
        let results = session
            .query("article")
            .unwrap()
            .select(["id", "title"])
            .order(OrderSpec::asc("id"))
            .contain(ContainNode::new("tag").strategy(strategy))
            .to_array()
            .unwrap();
        to_json(results)
    };
    let expected = json!([
        {
            "id": 1,
            "title": "First",
            "tags": [
                {"id": 1, "name": "tag1", "article_tag": {"article_id": 1, "tag_id": 1}},
                {"id": 2, "name": "tag2", "article_tag": {"article_id": 1, "tag_id": 2}}
            ]
        },
        {
            "id": 2,
            "title": "Second",
            "tags": [
                {"id": 1, "name": "tag1", "article_tag": {"article_id": 2, "tag_id": 1}},
                {"id": 3, "name": "tag3", "article_tag": {"article_id": 2, "tag_id": 3}}
            ]
        },
        {"id": 3, "title": "Third"}
    ]);

    assert_eq!(load(Strategy::Select), expected);
    assert_eq!(load(Strategy::Subquery), expected);
    assert_eq!(load(Strategy::Join), expected);
}

#[test]
fn test_nested_deferred_loads() {
    let session = session();
    let results = session
        .query("author")
        .unwrap()
        .select(["id"])
        .and_where(Condition::eq("id", 1i64))
        .contain(json!({"article": {"fields": ["id", "author_id"], "tag": {"fields": ["name"]}}}))
        .to_array()
        .unwrap();

    assert_eq!(
        to_json(results),
        json!([{
            "id": 1,
            "articles": [
                {
                    "id": 1,
                    "author_id": 1,
                    "tags": [
                        {"name": "tag1", "article_tag": {"article_id": 1, "tag_id": 1}},
                        {"name": "tag2", "article_tag": {"article_id": 1, "tag_id": 2}}
                    ]
                },
                {"id": 3, "author_id": 1}
            ]
        }])
    );
}

#[test]
fn test_belongs_to_join_and_missing_parent() {
    let executor = executor();
    executor
        .execute_batch("INSERT INTO articles (id, author_id, title) VALUES (4, NULL, 'Orphan')")
        .unwrap();
    let session = Session::new(executor);
    declare(&session);

    let results = session
        .query("article")
        .unwrap()
        .select(["id"])
        .order(OrderSpec::asc("id"))
        .contain(ContainNode::new("author").fields(["name"]))
        .to_array()
        .unwrap();

    assert_eq!(
        to_json(results),
        json!([
            {"id": 1, "author": {"name": "mariano"}},
            {"id": 2, "author": {"name": "larry"}},
            {"id": 3, "author": {"name": "mariano"}},
            {"id": 4}
        ])
    );
}

#[test]
fn test_matching_filters_roots() {
    let session = session();
    let results = session
        .query("author")
        .unwrap()
        .contain(
            ContainNode::new("article")
                .matching()
                .condition(Condition::eq("title", "Second")),
        )
        .to_array()
        .unwrap();

    assert_eq!(
        to_json(results),
        json!([{
            "id": 3,
            "name": "larry",
            "articles": {"id": 2, "author_id": 3, "title": "Second"}
        }])
    );
}

#[test]
fn test_matching_limit_counts_joined_rows() {
    let session = session();
    let results = session
        .query("author")
        .unwrap()
        .limit(2)
        .contain(
            ContainNode::new("article")
                .matching()
                .condition(Condition::like("title", "%i%")),
        )
        .to_array()
        .unwrap();

    // Both joined rows belong to mariano, so the page holds one root.
    assert_eq!(
        to_json(results),
        json!([{
            "id": 1,
            "name": "mariano",
            "articles": {"id": 1, "author_id": 1, "title": "First"}
        }])
    );
}

#[test]
fn test_matching_keeps_only_first_matched_record() {
    let executor = executor();
    executor
        .execute_batch("INSERT INTO articles_tags (article_id, tag_id) VALUES (3, 3)")
        .unwrap();
    let session = Session::new(executor);
    declare(&session);

    let results = session
        .query("author")
        .unwrap()
        .select(["id"])
        .contain(
            ContainNode::new("article")
                .matching()
                .fields(["id"])
                .with(ContainNode::new("tag").strategy(Strategy::Join).fields(["name"])),
        )
        .to_array()
        .unwrap();

    // Article 3 also matches for mariano, but its tag must not reach article 1.
    assert_eq!(
        to_json(results),
        json!([
            {
                "id": 1,
                "articles": {
                    "id": 1,
                    "tags": [
                        {"name": "tag1", "article_tag": {"article_id": 1, "tag_id": 1}},
                        {"name": "tag2", "article_tag": {"article_id": 1, "tag_id": 2}}
                    ]
                }
            },
            {
                "id": 3,
                "articles": {
                    "id": 2,
                    "tags": [
                        {"name": "tag1", "article_tag": {"article_id": 2, "tag_id": 1}},
                        {"name": "tag3", "article_tag": {"article_id": 2, "tag_id": 3}}
                    ]
                }
            }
        ])
    );
}

#[test]
fn test_first_keeps_every_joined_child() {
    let session = session();
    let mut query = session
        .query("author")
        .unwrap()
        .order(OrderSpec::asc("id"))
        .contain(
            ContainNode::new("article")
                .strategy(Strategy::Join)
                .fields(["title"]),
        );

    assert_eq!(
        serde_json::to_value(query.first().unwrap()).unwrap(),
        json!({
            "id": 1,
            "name": "mariano",
            "articles": [{"title": "First"}, {"title": "Third"}]
        })
    );
}

#[test]
fn test_joined_to_many_pages_by_root() {
    let session = session();
    let page = |limit: u64, offset: u64| {
        let results = session
            .query("author")
            .unwrap()
            .select(["name"])
            .order(OrderSpec::asc("id"))
            .limit(limit)
            .offset(offset)
            .contain(
                ContainNode::new("article")
                    .strategy(Strategy::Join)
                    .fields(["title"]),
            )
            .to_array()
            .unwrap();
        to_json(results)
    };

    assert_eq!(
        page(2, 0),
        json!([
            {"name": "mariano", "articles": [{"title": "First"}, {"title": "Third"}]},
            {"name": "nate"}
        ])
    );
    assert_eq!(
        page(2, 1),
        json!([
            {"name": "nate"},
            {"name": "larry", "articles": [{"title": "Second"}]}
        ])
    );
}

#[test]
fn test_unbuffered_results() {
    let session = Session::with_config(executor(), EngineConfig::new().with_buffer_results(false));
    declare(&session);
    let mut query = session
        .query("author")
        .unwrap()
        .order(OrderSpec::asc("id"));
    let result = query.execute().unwrap();
    assert!(!result.is_buffered());

    let names: Vec<String> = result
        .iter()
        .take(2)
        .map(|item| {
            let record = item.unwrap().into_record().unwrap();
            record.value("name").unwrap().as_str().unwrap().to_string()
        })
        .collect();
    assert_eq!(names, vec!["mariano", "nate"]);
    assert_eq!(result.to_vec().unwrap().len(), 2);
    assert!(result.to_vec().unwrap().is_empty());
}

#[test]
fn test_first_on_disk_database() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("blog.db");
    SqliteExecutor::open(&path)
        .unwrap()
        .execute_batch(FIXTURES)
        .unwrap();

    let session = Session::new(SqliteExecutor::open(&path).unwrap());
    declare(&session);
    let first = session
        .query("author")
        .unwrap()
        .order(OrderSpec::desc("name"))
        .contain("article")
        .first()
        .unwrap();
    assert_eq!(
        serde_json::to_value(first).unwrap(),
        json!({"id": 2, "name": "nate"})
    );
}

#[test]
fn test_execution_error_is_wrapped() {
    let session = session();
    let ghost = session.collection("ghost", CollectionConfig::new()).unwrap();
    assert!(ghost.columns().is_empty());

    let mut query = session.query("ghost").unwrap();
    let error = query.to_array().unwrap_err();
    assert!(matches!(error, Error::Execution(_)));
    assert!(error.to_string().contains("no such table"));
}
