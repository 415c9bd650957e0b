//! The chainable query builder.

use super::contain::{ContainTree, IntoContain};
use super::loader::Loader;
use super::mapreduce::{MapReduce, MapReduceStage};
use super::options;
use super::planner::{AliasMap, Planner, RootQuery, StatementPlan};
use super::result::{DatumStream, ResultSet};
use super::sql;
use crate::catalog::Collection;
use crate::error::{Error, Result};
use crate::session::Session;
use ormload_proto::{
    CompiledStatement, Condition, Datum, JoinClause, OrderSpec, SelectItem, TableRef,
};
use serde_json::{Map, Value as Json};
use std::fmt;
use std::sync::Arc;

/// Value of a named clause, as returned by [`Query::clause`].
#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    /// The clause is not set.
    Absent,
    Select(Vec<SelectItem>),
    From(TableRef),
    Join(Vec<JoinClause>),
    Where(Condition),
    Order(Vec<OrderSpec>),
    Group(Vec<String>),
    Having(Condition),
    Limit(u64),
    Offset(u64),
}

impl Clause {
    pub fn is_absent(&self) -> bool {
        matches!(self, Clause::Absent)
    }
}

/// A query against one root collection.
///
/// Builder methods take and return the query by value. Execution methods
/// take `&mut self`: the first execution compiles the query and runs it, and
/// later executions reuse the result until the query is changed again.
pub struct Query<'s> {
    session: &'s Session,
    root: Arc<Collection>,
    select: Vec<SelectItem>,
    joins: Vec<JoinClause>,
    conditions: Vec<Condition>,
    order: Vec<OrderSpec>,
    group: Vec<String>,
    having: Vec<Condition>,
    limit: Option<u64>,
    offset: Option<u64>,
    contain: ContainTree,
    options: Map<String, Json>,
    map_reducers: Vec<MapReduceStage>,
    buffered: bool,
    /// Configuration errors captured while chaining, raised on compile.
    errors: Vec<Error>,
    compiled: Option<Arc<StatementPlan>>,
    dirty: bool,
    result: Option<ResultSet>,
}

impl<'s> Query<'s> {
    pub(crate) fn new(session: &'s Session, root: Arc<Collection>) -> Self {
        Self {
            session,
            root,
            select: Vec::new(),
            joins: Vec::new(),
            conditions: Vec::new(),
            order: Vec::new(),
            group: Vec::new(),
            having: Vec::new(),
            limit: None,
            offset: None,
            contain: ContainTree::new(),
            options: Map::new(),
            map_reducers: Vec::new(),
            buffered: session.config().buffer_results,
            errors: Vec::new(),
            compiled: None,
            dirty: true,
            result: None,
        }
    }

    fn touch(&mut self) {
        self.compiled = None;
        self.dirty = true;
    }

    fn defer(&mut self, error: Error) {
        tracing::debug!(%error, "query configuration error, raised on execution");
        self.errors.push(error);
    }

    /// Root collection.
    pub fn collection(&self) -> &Arc<Collection> {
        &self.root
    }

    /// Add fields to the select list. An empty list resets it to the
    /// root collection's declared columns.
    pub fn select<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fields: Vec<SelectItem> = fields
            .into_iter()
            .map(|f| SelectItem::field(f.into()))
            .collect();
        if fields.is_empty() {
            self.select.clear();
        } else {
            self.select.extend(fields);
        }
        self.touch();
        self
    }

    /// Select an expression under an explicit result key.
    pub fn select_as(mut self, key: impl Into<String>, expr: impl Into<String>) -> Self {
        self.select.push(SelectItem::aliased(key, expr));
        self.touch();
        self
    }

    /// Add a WHERE condition. Bare field names refer to the root collection.
    pub fn and_where(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self.touch();
        self
    }

    pub fn conditions(mut self, conditions: impl IntoIterator<Item = Condition>) -> Self {
        self.conditions.extend(conditions);
        self.touch();
        self
    }

    /// Add an explicit join.
    pub fn join(mut self, join: JoinClause) -> Self {
        self.joins.push(join);
        self.touch();
        self
    }

    pub fn order(mut self, order: OrderSpec) -> Self {
        self.order.push(order);
        self.touch();
        self
    }

    pub fn order_by(mut self, orders: impl IntoIterator<Item = OrderSpec>) -> Self {
        self.order.extend(orders);
        self.touch();
        self
    }

    pub fn group<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.group.extend(fields.into_iter().map(Into::into));
        self.touch();
        self
    }

    pub fn having(mut self, condition: Condition) -> Self {
        self.having.push(condition);
        self.touch();
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self.touch();
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self.touch();
        self
    }

    /// Eager-load associations.
    ///
    /// Accepts a name or dotted path, a list of them, [`ContainNode`]s, or a
    /// JSON mapping. Repeated calls merge into one tree. A malformed
    /// specification is reported when the query executes.
    ///
    /// [`ContainNode`]: super::contain::ContainNode
    pub fn contain(mut self, spec: impl IntoContain) -> Self {
        match spec.into_contain() {
            Ok(tree) => self.contain.merge(tree),
            Err(error) => self.defer(error),
        }
        self.touch();
        self
    }

    /// Apply a flat options object.
    ///
    /// `fields`, `conditions`, `order`, `limit`, `offset`, `group`,
    /// `having`, `contain` and `join` map onto the matching builder calls.
    /// Any other key is kept and returned by [`Query::get_options`].
    pub fn apply_options(mut self, config: Json) -> Self {
        let Json::Object(map) = config else {
            self.defer(Error::invalid_option("options", "expected an object"));
            return self;
        };
        for (key, value) in map {
            if let Err(error) = self.apply_option(&key, &value) {
                self.defer(error);
            }
            if !KNOWN_OPTIONS.contains(&key.as_str()) {
                self.options.insert(key, value);
            }
        }
        self.touch();
        self
    }

    fn apply_option(&mut self, key: &str, value: &Json) -> Result<()> {
        match key {
            "fields" => {
                let fields = options::parse_names(key, value)?;
                if fields.is_empty() {
                    self.select.clear();
                } else {
                    self.select.extend(fields.into_iter().map(SelectItem::field));
                }
            }
            "conditions" => self.conditions.extend(options::parse_conditions(key, value)?),
            "order" => self.order.extend(options::parse_order(key, value)?),
            "limit" => self.limit = Some(options::parse_count(key, value)?),
            "offset" => self.offset = Some(options::parse_count(key, value)?),
            "group" => self.group.extend(options::parse_names(key, value)?),
            "having" => self.having.extend(options::parse_conditions(key, value)?),
            "contain" => self.contain.merge(ContainTree::from_json(value)?),
            "join" => self.joins.extend(options::parse_joins(key, value)?),
            _ => {}
        }
        Ok(())
    }

    /// Options passed to [`Query::apply_options`] that are not query clauses.
    pub fn get_options(&self) -> &Map<String, Json> {
        &self.options
    }

    /// Choose between a buffered and an unbuffered result set.
    pub fn buffer_results(mut self, buffered: bool) -> Self {
        self.buffered = buffered;
        self.touch();
        self
    }

    /// Register a map/reduce stage. `overwrite` drops earlier stages.
    pub fn map_reduce(mut self, stage: MapReduceStage, overwrite: bool) -> Self {
        if overwrite {
            self.map_reducers.clear();
        }
        self.map_reducers.push(stage);
        self.touch();
        self
    }

    /// Use `result` as the outcome of this query instead of executing it.
    pub fn set_result(mut self, result: ResultSet) -> Self {
        self.result = Some(result);
        self.dirty = false;
        self
    }

    pub fn contain_tree(&self) -> &ContainTree {
        &self.contain
    }

    pub fn map_reducers(&self) -> &[MapReduceStage] {
        &self.map_reducers
    }

    pub fn is_buffered(&self) -> bool {
        self.buffered
    }

    /// Alias map of the compiled primary statement.
    pub fn alias_map(&self) -> Option<&AliasMap> {
        self.compiled.as_deref().map(|plan| &plan.alias_map)
    }

    /// Current value of a named clause.
    ///
    /// Once compiled this is the planned statement, association joins and
    /// fields included; before that, the values given to the builder.
    /// Unknown names and unset clauses are [`Clause::Absent`].
    pub fn clause(&self, name: &str) -> Clause {
        match &self.compiled {
            Some(plan) => {
                let s = &plan.statement;
                match name {
                    "select" => non_empty(s.select.clone(), Clause::Select),
                    "from" => Clause::From(s.from.clone()),
                    "join" => non_empty(s.joins.clone(), Clause::Join),
                    "where" => {
                        non_empty(s.conditions.clone(), |c| Clause::Where(Condition::and(c)))
                    }
                    "order" => non_empty(s.order_by.clone(), Clause::Order),
                    "group" => non_empty(s.group_by.clone(), Clause::Group),
                    "having" => non_empty(s.having.clone(), |c| Clause::Having(Condition::and(c))),
                    // Paging by root key moves both into a subquery.
                    "limit" => s.limit.or(self.limit).map_or(Clause::Absent, Clause::Limit),
                    "offset" => s.offset.or(self.offset).map_or(Clause::Absent, Clause::Offset),
                    _ => Clause::Absent,
                }
            }
            None => match name {
                "select" => non_empty(self.select.clone(), Clause::Select),
                "from" => Clause::From(TableRef::new(self.root.table(), self.root.alias())),
                "join" => non_empty(self.joins.clone(), Clause::Join),
                "where" => non_empty(self.conditions.clone(), |c| Clause::Where(Condition::and(c))),
                "order" => non_empty(self.order.clone(), Clause::Order),
                "group" => non_empty(self.group.clone(), Clause::Group),
                "having" => non_empty(self.having.clone(), |c| Clause::Having(Condition::and(c))),
                "limit" => self.limit.map_or(Clause::Absent, Clause::Limit),
                "offset" => self.offset.map_or(Clause::Absent, Clause::Offset),
                _ => Clause::Absent,
            },
        }
    }

    /// Resolve the contain tree and plan every statement.
    ///
    /// Raises any configuration error captured while building.
    #[tracing::instrument(skip_all, fields(root = %self.root.alias()))]
    pub fn compile(&mut self) -> Result<Arc<StatementPlan>> {
        if let Some(error) = self.errors.first() {
            return Err(error.clone());
        }
        if let Some(plan) = &self.compiled {
            return Ok(plan.clone());
        }
        let session = self.session;
        let planner = Planner::new(
            session.registry(),
            session.config(),
            session.converter().as_ref(),
        );
        let plan = Arc::new(planner.plan(RootQuery {
            collection: &self.root,
            select: &self.select,
            joins: &self.joins,
            conditions: &self.conditions,
            order: &self.order,
            group: &self.group,
            having: &self.having,
            limit: self.limit,
            offset: self.offset,
            contain: &self.contain,
        })?);
        self.compiled = Some(plan.clone());
        Ok(plan)
    }

    /// Compiled primary statement.
    pub fn statement(&mut self) -> Result<CompiledStatement> {
        let plan = self.compile()?;
        Ok(sql::render(
            &plan.statement,
            self.session.config().placeholder_style,
        ))
    }

    /// SQL text of the primary statement.
    pub fn sql(&mut self) -> Result<String> {
        Ok(self.statement()?.sql)
    }

    /// Run the query, or return the current result if nothing changed since
    /// the last run.
    #[tracing::instrument(skip_all, fields(root = %self.root.alias()))]
    pub fn execute(&mut self) -> Result<ResultSet> {
        if !self.dirty {
            if let Some(result) = &self.result {
                return Ok(result.clone());
            }
        }

        let plan = self.compile()?;
        let loader = Loader::new(
            self.session.executor(),
            self.session.converter().clone(),
            self.session.config().placeholder_style,
        );
        let records = loader.load(&plan)?;
        let mut stream: DatumStream = Box::new(records.map(|r| r.map(Datum::Record)));
        if !self.map_reducers.is_empty() {
            stream = Box::new(MapReduce::new(stream, self.map_reducers.clone()));
        }
        let result = if self.buffered {
            ResultSet::buffered(stream)
        } else {
            ResultSet::unbuffered(stream)
        };
        self.result = Some(result.clone());
        self.dirty = false;
        Ok(result)
    }

    /// The first result. A query that changed since its last run is limited
    /// to one row first.
    pub fn first(&mut self) -> Result<Option<Datum>> {
        if self.dirty {
            self.limit = Some(1);
            self.touch();
        }
        self.execute()?.first()
    }

    /// Every result, materialized.
    pub fn to_array(&mut self) -> Result<Vec<Datum>> {
        self.execute()?.to_vec()
    }
}

const KNOWN_OPTIONS: &[&str] = &[
    "fields",
    "conditions",
    "order",
    "limit",
    "offset",
    "group",
    "having",
    "contain",
    "join",
];

fn non_empty<T>(items: Vec<T>, clause: impl FnOnce(Vec<T>) -> Clause) -> Clause {
    if items.is_empty() {
        Clause::Absent
    } else {
        clause(items)
    }
}

impl Clone for Query<'_> {
    /// Deep copy of the clause, contain and map/reduce state. The copy is
    /// uncompiled and has no result.
    fn clone(&self) -> Self {
        Self {
            session: self.session,
            root: self.root.clone(),
            select: self.select.clone(),
            joins: self.joins.clone(),
            conditions: self.conditions.clone(),
            order: self.order.clone(),
            group: self.group.clone(),
            having: self.having.clone(),
            limit: self.limit,
            offset: self.offset,
            contain: self.contain.clone(),
            options: self.options.clone(),
            map_reducers: self.map_reducers.clone(),
            buffered: self.buffered,
            errors: self.errors.clone(),
            compiled: None,
            dirty: true,
            result: None,
        }
    }
}

impl fmt::Debug for Query<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("root", &self.root.alias())
            .field("select", &self.select)
            .field("conditions", &self.conditions)
            .field("contain", &self.contain.paths())
            .field("limit", &self.limit)
            .field("offset", &self.offset)
            .field("map_reducers", &self.map_reducers.len())
            .field("compiled", &self.compiled.is_some())
            .field("dirty", &self.dirty)
            .finish()
    }
}
