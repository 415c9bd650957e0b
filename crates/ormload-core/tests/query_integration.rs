//! Integration tests for query building, eager loading and result delivery.

mod common;

use common::{blog_session, int, row, text, RecordingExecutor};
use ormload_core::catalog::{AssociationOptions, CollectionConfig};
use ormload_core::query::{Clause, ContainNode, MapReduceStage, ResultSet};
use ormload_core::{Error, Session, Strategy};
use ormload_proto::{Condition, Datum, JoinClause, JoinKind, OrderSpec, Record, Value};
use pretty_assertions::assert_eq;
use serde_json::json;

fn to_json(items: Vec<Datum>) -> serde_json::Value {
    serde_json::to_value(items).unwrap()
}

fn order_session(executor: RecordingExecutor) -> Session {
    let session = Session::new(executor);
    let build = |name: &str, config: CollectionConfig| session.collection(name, config).unwrap();
    let foo = build("foo", CollectionConfig::new());
    let client = build("client", CollectionConfig::new());
    let order = build("order", CollectionConfig::new());
    build("orderType", CollectionConfig::new());
    let stuff = build("stuff", CollectionConfig::new().with_table("things"));
    build("stuffType", CollectionConfig::new());
    let company = build("company", CollectionConfig::new().with_table("organizations"));
    build("category", CollectionConfig::new());

    foo.belongs_to("client", AssociationOptions::new()).unwrap();
    client.has_one("order", AssociationOptions::new()).unwrap();
    client.belongs_to("company", AssociationOptions::new()).unwrap();
    order.belongs_to("orderType", AssociationOptions::new()).unwrap();
    order.has_one("stuff", AssociationOptions::new()).unwrap();
    stuff.belongs_to("stuffType", AssociationOptions::new()).unwrap();
    company.belongs_to("category", AssociationOptions::new()).unwrap();
    session
}

fn left_join(alias: &str, table: &str, left: &str, right: &str) -> JoinClause {
    JoinClause::new(alias, table)
        .with_kind(JoinKind::Left)
        .with_condition(Condition::column_eq(left, right))
}

#[test]
fn test_nested_contain_joins_every_level() {
    let executor = RecordingExecutor::new();
    let session = order_session(executor);
    let mut query = session
        .query("foo")
        .unwrap()
        .select(["foo.id"])
        .contain(json!({
            "client": {
                "order": ["orderType", {"stuff": "stuffType"}],
                "company": {"foreignKey": "organization_id", "category": null}
            }
        }));
    query.compile().unwrap();

    assert_eq!(
        query.clause("join"),
        Clause::Join(vec![
            left_join("client", "clients", "client.id", "foo.client_id"),
            left_join("order", "orders", "client.id", "order.client_id"),
            left_join("orderType", "order_types", "orderType.id", "order.order_type_id"),
            left_join("stuff", "things", "order.id", "stuff.order_id"),
            left_join("stuffType", "stuff_types", "stuffType.id", "stuff.stuff_type_id"),
            left_join("company", "organizations", "company.id", "client.organization_id"),
            left_join("category", "categories", "category.id", "company.category_id"),
        ])
    );
    let aliases: Vec<&str> = query
        .alias_map()
        .unwrap()
        .iter()
        .map(|(alias, _, _)| alias)
        .collect();
    assert_eq!(aliases[0], "foo");
    assert!(aliases.contains(&"category"));
}

#[test]
fn test_select_strategy_loads_children_by_key() {
    let executor = RecordingExecutor::new();
    executor.respond(vec![
        row(&[("author__id", int(1)), ("author__name", text("mariano"))]),
        row(&[("author__id", int(2)), ("author__name", text("nate"))]),
    ]);
    executor.respond(vec![
        row(&[
            ("article__id", int(1)),
            ("article__author_id", int(1)),
            ("article__title", text("First")),
        ]),
        row(&[
            ("article__id", int(3)),
            ("article__author_id", int(1)),
            ("article__title", text("Third")),
        ]),
    ]);
    let session = blog_session(executor.clone());
    let results = session
        .query("author")
        .unwrap()
        .contain("article")
        .to_array()
        .unwrap();

    assert_eq!(
        to_json(results),
        json!([
            {
                "id": 1,
                "name": "mariano",
                "articles": [
                    {"id": 1, "author_id": 1, "title": "First"},
                    {"id": 3, "author_id": 1, "title": "Third"}
                ]
            },
            {"id": 2, "name": "nate"}
        ])
    );

    let statements = executor.statements();
    assert_eq!(statements.len(), 2);
    assert_eq!(
        statements[0].sql,
        "SELECT \"author\".\"id\" AS \"author__id\", \"author\".\"name\" AS \"author__name\" \
         FROM \"authors\" AS \"author\""
    );
    assert_eq!(
        statements[1].sql,
        "SELECT \"article\".\"id\" AS \"article__id\", \"article\".\"author_id\" AS \"article__author_id\", \
         \"article\".\"title\" AS \"article__title\" FROM \"articles\" AS \"article\" \
         WHERE \"article\".\"author_id\" IN (?, ?) ORDER BY \"article\".\"id\" ASC"
    );
    assert_eq!(statements[1].params, vec![int(1), int(2)]);
}

#[test]
fn test_subquery_strategy_reuses_parent_filter() {
    let executor = RecordingExecutor::new();
    executor.respond(vec![row(&[
        ("author__id", int(1)),
        ("author__name", text("mariano")),
    ])]);
    let session = blog_session(executor.clone());
    session
        .query("author")
        .unwrap()
        .and_where(Condition::gt("id", 0i64))
        .order(OrderSpec::asc("name"))
        .limit(2)
        .contain(ContainNode::new("article").strategy(Strategy::Subquery))
        .to_array()
        .unwrap();

    let statements = executor.statements();
    assert_eq!(statements.len(), 2);
    assert_eq!(
        statements[1].sql,
        "SELECT \"article\".\"id\" AS \"article__id\", \"article\".\"author_id\" AS \"article__author_id\", \
         \"article\".\"title\" AS \"article__title\" FROM \"articles\" AS \"article\" \
         WHERE \"article\".\"author_id\" IN (SELECT \"author\".\"id\" FROM \"authors\" AS \"author\" \
         WHERE \"author\".\"id\" > ? ORDER BY \"author\".\"name\" ASC LIMIT 2) \
         ORDER BY \"article\".\"id\" ASC"
    );
    assert_eq!(statements[1].params, vec![int(0)]);
}

#[test]
fn test_no_parent_keys_skips_child_statement() {
    let executor = RecordingExecutor::new();
    let session = blog_session(executor.clone());
    let results = session
        .query("author")
        .unwrap()
        .contain("article")
        .to_array()
        .unwrap();
    assert!(results.is_empty());
    assert_eq!(executor.statements().len(), 1);
}

#[test]
fn test_belongs_to_many_select_groups_by_junction_key() {
    let executor = RecordingExecutor::new();
    executor.respond(vec![
        row(&[("article__id", int(1)), ("article__title", text("First"))]),
        row(&[("article__id", int(2)), ("article__title", text("Second"))]),
    ]);
    let tag_row = |tag: i64, name: &str, article: i64| {
        row(&[
            ("tag__id", int(tag)),
            ("tag__name", text(name)),
            ("ArticleTag__article_id", int(article)),
            ("ArticleTag__tag_id", int(tag)),
        ])
    };
    executor.respond(vec![
        tag_row(1, "tag1", 1),
        tag_row(1, "tag1", 2),
        tag_row(2, "tag2", 1),
    ]);

    let session = blog_session(executor.clone());
    let results = session
        .query("article")
        .unwrap()
        .select(["id", "title"])
        .contain("tag")
        .to_array()
        .unwrap();

    assert_eq!(
        to_json(results),
        json!([
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
                    {"id": 1, "name": "tag1", "article_tag": {"article_id": 2, "tag_id": 1}}
                ]
            }
        ])
    );
    assert_eq!(
        executor.sql()[1],
        "SELECT \"tag\".\"id\" AS \"tag__id\", \"tag\".\"name\" AS \"tag__name\", \
         \"ArticleTag\".\"article_id\" AS \"ArticleTag__article_id\", \
         \"ArticleTag\".\"tag_id\" AS \"ArticleTag__tag_id\" FROM \"tags\" AS \"tag\" \
         INNER JOIN \"articles_tags\" AS \"ArticleTag\" ON \"tag\".\"id\" = \"ArticleTag\".\"tag_id\" \
         WHERE \"ArticleTag\".\"article_id\" IN (?, ?) \
         ORDER BY \"tag\".\"id\" ASC, \"ArticleTag\".\"article_id\" ASC"
    );
}

#[test]
fn test_matching_uses_inner_join_with_conditions() {
    let executor = RecordingExecutor::new();
    let session = blog_session(executor.clone());
    let mut query = session.query("author").unwrap().contain(
        ContainNode::new("article")
            .matching()
            .strategy(Strategy::Select)
            .condition(Condition::eq("title", "First")),
    );
    let sql = query.sql().unwrap();
    assert!(sql.contains(
        "INNER JOIN \"articles\" AS \"article\" ON \"author\".\"id\" = \"article\".\"author_id\" \
         AND \"article\".\"title\" = ?"
    ));
    query.to_array().unwrap();
    assert_eq!(executor.statements().len(), 1);
}

#[test]
fn test_joined_to_many_limit_pages_root_keys() {
    let session = blog_session(RecordingExecutor::new());
    let mut query = session
        .query("author")
        .unwrap()
        .order(OrderSpec::asc("name"))
        .limit(2)
        .contain(ContainNode::new("article").strategy(Strategy::Join));

    let sql = query.sql().unwrap();
    assert!(sql.contains(
        "LEFT JOIN \"articles\" AS \"article\" ON \"author\".\"id\" = \"article\".\"author_id\" \
         WHERE \"author\".\"id\" IN (SELECT \"author\".\"id\" FROM \"authors\" AS \"author\" \
         ORDER BY \"author\".\"name\" ASC LIMIT 2) \
         ORDER BY \"author\".\"name\" ASC, \"author\".\"id\" ASC, \"article\".\"id\" ASC"
    ));
    assert!(!sql.ends_with("LIMIT 2"));
    assert_eq!(query.clause("limit"), Clause::Limit(2));
}

#[test]
fn test_filter_on_joined_to_many_limits_rows() {
    let session = blog_session(RecordingExecutor::new());
    let mut query = session
        .query("author")
        .unwrap()
        .and_where(Condition::eq("article.title", "First"))
        .limit(2)
        .contain(ContainNode::new("article").strategy(Strategy::Join));

    let sql = query.sql().unwrap();
    assert!(!sql.contains("IN (SELECT"));
    assert!(sql.ends_with("LIMIT 2"));
}

#[test]
fn test_explicit_fields_hide_join_keys() {
    let executor = RecordingExecutor::new();
    executor.respond(vec![row(&[
        ("article__id", int(1)),
        ("article__title", text("First")),
        ("author__name", text("mariano")),
        ("author__id", int(1)),
    ])]);
    let session = blog_session(executor.clone());
    let results = session
        .query("article")
        .unwrap()
        .select(["id", "title"])
        .contain(ContainNode::new("author").fields(["name"]))
        .to_array()
        .unwrap();

    assert_eq!(
        to_json(results),
        json!([{"id": 1, "title": "First", "author": {"name": "mariano"}}])
    );
    assert!(executor.sql()[0].starts_with(
        "SELECT \"article\".\"id\" AS \"article__id\", \"article\".\"title\" AS \"article__title\", \
         \"author\".\"name\" AS \"author__name\", \"author\".\"id\" AS \"author__id\" FROM"
    ));
}

#[test]
fn test_apply_options_and_clauses() {
    let session = blog_session(RecordingExecutor::new());
    let mut query = session.query("article").unwrap().apply_options(json!({
        "fields": ["id", "title"],
        "conditions": {"author_id": 1},
        "order": "title DESC",
        "limit": 5,
        "offset": "10",
        "doABanana": true,
        "contain": "author"
    }));

    assert_eq!(query.get_options(), json!({"doABanana": true}).as_object().unwrap());
    assert_eq!(query.clause("limit"), Clause::Limit(5));
    assert_eq!(query.clause("offset"), Clause::Offset(10));
    assert_eq!(
        query.clause("where"),
        Clause::Where(Condition::and(vec![Condition::eq("author_id", 1i64)]))
    );
    assert!(query.clause("join").is_absent());
    assert!(query.clause("whatever").is_absent());
    assert_eq!(query.contain_tree().paths(), vec!["author".to_string()]);

    query.compile().unwrap();
    assert_eq!(
        query.clause("where"),
        Clause::Where(Condition::and(vec![Condition::eq("article.author_id", 1i64)]))
    );
    assert_eq!(
        query.clause("order"),
        Clause::Order(vec![OrderSpec::desc("article.title")])
    );
    match query.clause("join") {
        Clause::Join(joins) => assert_eq!(joins[0].alias, "author"),
        other => panic!("expected joins, found {:?}", other),
    }
    assert!(query.sql().unwrap().ends_with("LIMIT 5 OFFSET 10"));
}

#[test]
fn test_configuration_errors_surface_on_execute() {
    let executor = RecordingExecutor::new();
    let session = blog_session(executor.clone());

    let mut unknown = session.query("author").unwrap().contain("comments");
    assert!(matches!(
        unknown.execute(),
        Err(Error::UnknownAssociation { association, .. }) if association == "comments"
    ));

    let mut malformed = session.query("author").unwrap().contain(json!(5));
    assert!(matches!(malformed.execute(), Err(Error::InvalidContain(_))));

    let mut bad_limit = session
        .query("author")
        .unwrap()
        .apply_options(json!({"limit": "many"}));
    assert!(matches!(
        bad_limit.to_array(),
        Err(Error::InvalidOption { key, .. }) if key == "limit"
    ));

    let mut strategy = session
        .query("article")
        .unwrap()
        .contain(json!({"author": {"strategy": "subquery"}}));
    assert!(matches!(strategy.compile(), Err(Error::UnknownStrategy(_))));

    let mut cyclic = session
        .query("author")
        .unwrap()
        .contain(json!({"article": {"strategy": "join", "author": {"article": null}}}));
    assert!(matches!(cyclic.compile(), Err(Error::DuplicateAlias { .. })));

    assert!(executor.statements().is_empty());
}

#[test]
fn test_first_limits_and_reuses_result() {
    let executor = RecordingExecutor::new();
    executor.respond(vec![row(&[
        ("author__id", int(1)),
        ("author__name", text("mariano")),
    ])]);
    let session = blog_session(executor.clone());
    let mut query = session.query("author").unwrap();

    let first = query.first().unwrap().and_then(Datum::into_record);
    assert_eq!(
        first,
        Some(Record::new().with("id", 1i64).with("name", "mariano"))
    );
    assert_eq!(query.clause("limit"), Clause::Limit(1));
    let again = query.first().unwrap();
    assert!(again.is_some());
    assert_eq!(executor.statements().len(), 1);
    assert!(executor.sql()[0].ends_with("LIMIT 1"));
}

#[test]
fn test_execute_returns_same_result_until_changed() {
    let executor = RecordingExecutor::new();
    let session = blog_session(executor.clone());
    let mut query = session.query("author").unwrap();

    let first = query.execute().unwrap();
    let second = query.execute().unwrap();
    assert!(first.same_as(&second));
    assert_eq!(executor.statements().len(), 1);

    let mut changed = query.limit(3);
    let third = changed.execute().unwrap();
    assert!(!third.same_as(&first));
    assert_eq!(executor.statements().len(), 2);
}

#[test]
fn test_set_result_bypasses_executor() {
    let executor = RecordingExecutor::new();
    let session = blog_session(executor.clone());
    let canned = ResultSet::from_records(vec![Record::new().with("id", 9i64)]);
    let mut query = session.query("author").unwrap().set_result(canned.clone());

    assert!(query.execute().unwrap().same_as(&canned));
    assert_eq!(query.to_array().unwrap().len(), 1);
    assert!(executor.statements().is_empty());
}

#[test]
fn test_map_reduce_over_results() {
    let executor = RecordingExecutor::new();
    executor.respond(vec![
        row(&[("author__id", int(1)), ("author__name", text("mariano"))]),
        row(&[("author__id", int(2)), ("author__name", text("nate"))]),
    ]);
    let session = blog_session(executor);
    let ids = MapReduceStage::new(|_key, item, emitter| {
        let id = item
            .as_record()
            .and_then(|r| r.value("id"))
            .and_then(Value::as_i64)
            .unwrap_or_default();
        emitter.emit(id + 1);
    });
    let mut query = session.query("author").unwrap().map_reduce(ids, false);
    assert_eq!(query.map_reducers().len(), 1);

    assert_eq!(
        query.to_array().unwrap(),
        vec![Datum::from(2i64), Datum::from(3i64)]
    );
}

#[test]
fn test_map_reduce_overwrite_replaces_stages() {
    let session = blog_session(RecordingExecutor::new());
    let noop = || MapReduceStage::new(|_key, item, emitter| emitter.emit(item));
    let query = session
        .query("author")
        .unwrap()
        .map_reduce(noop(), false)
        .map_reduce(noop(), false);
    assert_eq!(query.map_reducers().len(), 2);
    let query = query.map_reduce(noop(), true);
    assert_eq!(query.map_reducers().len(), 1);
}

#[test]
fn test_unbuffered_results_are_forward_only() {
    let executor = RecordingExecutor::new();
    executor.respond(vec![
        row(&[("author__id", int(1)), ("author__name", text("mariano"))]),
        row(&[("author__id", int(2)), ("author__name", text("nate"))]),
    ]);
    let session = blog_session(executor);
    let mut query = session.query("author").unwrap().buffer_results(false);

    let result = query.execute().unwrap();
    assert!(!result.is_buffered());
    assert_eq!(result.to_vec().unwrap().len(), 2);
    assert!(result.to_vec().unwrap().is_empty());
}

#[test]
fn test_clone_is_uncompiled_copy() {
    let executor = RecordingExecutor::new();
    let session = blog_session(executor.clone());
    let mut query = session.query("author").unwrap().contain("article");
    let result = query.execute().unwrap();

    let mut copy = query.clone();
    assert!(copy.alias_map().is_none());
    assert_eq!(copy.contain_tree().paths(), vec!["article".to_string()]);
    let copied = copy.execute().unwrap();
    assert!(!copied.same_as(&result));
    assert_eq!(executor.statements().len(), 2);
}
