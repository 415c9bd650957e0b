//! Eager-load planner.
//!
//! The planner walks a contain tree against the association graph and turns
//! it into a primary [`SelectStatement`] plus a tree of deferred loads. Every
//! contained association either becomes join clauses and select items in the
//! statement of its parent, or a [`DeferredLoad`] with its own statement
//! that runs once the parent rows are known.
//!
//! SQL aliases are flat: an association is always aliased by its name, and
//! every selected column gets the result key `alias__column`. The hydration
//! tree records where each key lands in the nested output.

use super::contain::{ContainNode, ContainTree, Fields};
use crate::catalog::{
    inflector, Association, AssociationKind, Collection, CollectionConfig, Registry, Strategy,
};
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::types::{ScalarType, TypeConverter};
use indexmap::IndexMap;
use ormload_proto::statement::{is_identifier, qualify_field, split_qualified};
use ormload_proto::{
    result_key, Condition, JoinClause, JoinKind, OrderSpec, SelectItem, SelectStatement, Value,
};
use std::sync::Arc;

/// Result keys produced for each `(alias, column)` pair of a statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AliasMap {
    entries: IndexMap<(String, String), String>,
}

impl AliasMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, alias: &str, column: &str, key: impl Into<String>) {
        self.entries
            .insert((alias.to_string(), column.to_string()), key.into());
    }

    /// Result key of `alias.column`, if it is selected.
    pub fn key(&self, alias: &str, column: &str) -> Option<&str> {
        self.entries
            .get(&(alias.to_string(), column.to_string()))
            .map(String::as_str)
    }

    pub fn contains(&self, alias: &str, column: &str) -> bool {
        self.key(alias, column).is_some()
    }

    /// `(alias, column, key)` triples in select order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, &str)> {
        self.entries
            .iter()
            .map(|((alias, column), key)| (alias.as_str(), column.as_str(), key.as_str()))
    }

    /// Selected columns of one alias, in select order.
    pub fn columns<'a>(&'a self, alias: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.iter()
            .filter(move |(a, _, _)| *a == alias)
            .map(|(_, column, _)| column)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// How many records a hydrated property holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    One,
    Many,
}

/// A selected column and the record field it hydrates into.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSlot {
    /// Result row key.
    pub key: String,
    /// Record field. Hidden slots use the row key so they never shadow a
    /// real column.
    pub field: String,
    pub column_type: Option<ScalarType>,
    /// Selected for grouping or key lookups only; stripped from output.
    pub hidden: bool,
}

/// Shape of one level of hydrated output.
#[derive(Debug, Clone, PartialEq)]
pub struct HydrationNode {
    /// SQL alias of the collection this node reads from.
    pub alias: String,
    /// Property under which the node is stored in its parent. Empty at the
    /// statement root.
    pub property: String,
    pub cardinality: Cardinality,
    pub matching: bool,
    pub columns: Vec<ColumnSlot>,
    /// Record field holding the primary key, once selected.
    pub identity: Option<String>,
    pub children: Vec<HydrationNode>,
}

impl HydrationNode {
    fn new(alias: &str, property: &str, cardinality: Cardinality, matching: bool) -> Self {
        Self {
            alias: alias.to_string(),
            property: property.to_string(),
            cardinality,
            matching,
            columns: Vec::new(),
            identity: None,
            children: Vec::new(),
        }
    }

    /// Fields removed from output once loading is complete.
    pub fn hidden_fields(&self) -> impl Iterator<Item = &str> {
        self.columns
            .iter()
            .filter(|c| c.hidden)
            .map(|c| c.field.as_str())
    }
}

/// Where a deferred child record carries the key of its parent.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyLocation {
    /// A field of the child record.
    Field(String),
    /// A field of a record nested in the child (the junction row).
    Nested { property: String, field: String },
}

/// An association loaded by its own statement after its parents.
#[derive(Debug, Clone)]
pub struct DeferredLoad {
    pub association: String,
    pub strategy: Strategy,
    /// Property the loaded records are stored under.
    pub property: String,
    /// Properties leading from the statement root to the parent records.
    pub parent_path: Vec<String>,
    /// Field of the parent record holding the parent key.
    pub parent_field: String,
    /// Parent key as a qualified column of the parent statement.
    pub parent_key_column: String,
    pub parent_key_type: Option<ScalarType>,
    /// Child column matched against parent keys.
    pub key_column: String,
    pub key_location: KeyLocation,
    pub plan: StatementPlan,
}

/// A planned statement and how to hydrate its rows.
#[derive(Debug, Clone)]
pub struct StatementPlan {
    /// Root collection name.
    pub collection: String,
    pub statement: SelectStatement,
    pub alias_map: AliasMap,
    pub hydration: Arc<HydrationNode>,
    /// Row keys identifying a root record. When non-empty, consecutive rows
    /// with equal keys are merged into one record.
    pub group_keys: Vec<String>,
    pub deferred: Vec<DeferredLoad>,
}

impl StatementPlan {
    /// Check if rows are merged by root identity.
    pub fn groups_rows(&self) -> bool {
        !self.group_keys.is_empty()
    }

    /// Number of statements this plan issues, deferred loads included.
    pub fn statement_count(&self) -> usize {
        1 + self
            .deferred
            .iter()
            .map(|d| d.plan.statement_count())
            .sum::<usize>()
    }
}

/// Builder state of a root query handed to the planner.
#[derive(Debug, Clone, Copy)]
pub struct RootQuery<'q> {
    pub collection: &'q Arc<Collection>,
    pub select: &'q [SelectItem],
    pub joins: &'q [JoinClause],
    pub conditions: &'q [Condition],
    pub order: &'q [OrderSpec],
    pub group: &'q [String],
    pub having: &'q [Condition],
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub contain: &'q ContainTree,
}

/// Expands contain trees into statement plans.
pub struct Planner<'a> {
    registry: &'a Registry,
    config: &'a EngineConfig,
    converter: &'a dyn TypeConverter,
}

impl<'a> Planner<'a> {
    pub fn new(
        registry: &'a Registry,
        config: &'a EngineConfig,
        converter: &'a dyn TypeConverter,
    ) -> Self {
        Self {
            registry,
            config,
            converter,
        }
    }

    /// Plan a root query and every association it contains.
    #[tracing::instrument(skip_all, fields(root = %query.collection.alias()))]
    pub fn plan(&self, query: RootQuery<'_>) -> Result<StatementPlan> {
        let collection = query.collection;
        let alias = collection.alias();
        let mut state = StatementState::new(collection);
        let mut root = HydrationNode::new(alias, "", Cardinality::One, false);

        for join in query.joins {
            state.claim_alias(&join.alias, &join.alias)?;
            if let Ok(joined) = self.registry.get(&join.alias) {
                state.collections.insert(join.alias.clone(), joined);
            }
            state.statement.joins.push(join.clone());
        }

        if query.select.is_empty() {
            state.add_fields(&mut root, collection, &Fields::All, true);
        } else {
            for item in query.select {
                state.add_select_item(&mut root, collection, item);
            }
        }

        for condition in query.conditions {
            let condition = self.bind(condition.qualified(alias), &state);
            state.statement.conditions.push(condition);
        }
        state.order = query.order.iter().map(|o| o.qualified(alias)).collect();
        state.statement.group_by = query
            .group
            .iter()
            .map(|g| qualify_field(g, alias))
            .collect();
        state.statement.having = query.having.to_vec();
        state.statement.limit = query.limit;
        state.statement.offset = query.offset;

        self.plan_children(
            &mut state,
            &mut root,
            collection,
            &[],
            &[],
            query.contain,
            1,
        )?;

        if state.statement.limit.is_some() || state.statement.offset.is_some() {
            state.page_roots(collection);
        }

        let plan = state.finish(root, collection);
        tracing::debug!(
            statements = plan.statement_count(),
            joins = plan.statement.joins.len(),
            grouped = plan.groups_rows(),
            "planned query"
        );
        Ok(plan)
    }

    #[allow(clippy::too_many_arguments)]
    fn plan_children(
        &self,
        state: &mut StatementState,
        parent: &mut HydrationNode,
        parent_collection: &Arc<Collection>,
        parent_path: &[String],
        names: &[String],
        children: &ContainTree,
        depth: usize,
    ) -> Result<()> {
        for node in children.iter() {
            self.plan_node(
                state,
                parent,
                parent_collection,
                parent_path,
                names,
                node,
                depth,
            )?;
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn plan_node(
        &self,
        state: &mut StatementState,
        parent: &mut HydrationNode,
        parent_collection: &Arc<Collection>,
        parent_path: &[String],
        names: &[String],
        node: &ContainNode,
        depth: usize,
    ) -> Result<()> {
        let association = parent_collection.association(&node.name).ok_or_else(|| {
            Error::UnknownAssociation {
                collection: parent_collection.alias().to_string(),
                association: node.name.clone(),
            }
        })?;

        let mut names = names.to_vec();
        names.push(node.name.clone());
        let path = names.join(".");
        if names[..names.len() - 1].contains(&node.name) {
            return Err(Error::DuplicateAlias {
                alias: node.name.clone(),
                path,
            });
        }
        if depth > self.config.max_contain_depth {
            return Err(Error::ContainTooDeep {
                path,
                max_depth: self.config.max_contain_depth,
            });
        }

        let target = self.registry.get(&association.target)?;
        let strategy = self.strategy(&association, node)?;
        tracing::debug!(
            association = %association.name,
            kind = %association.kind,
            %strategy,
            matching = node.matching,
            "planning contain"
        );

        let ctx = NodeContext {
            association: &association,
            node,
            target: &target,
            path: &path,
            names: &names,
            depth,
        };
        if strategy.is_deferred() {
            self.plan_deferred(state, parent, parent_collection, parent_path, ctx, strategy)
        } else {
            self.plan_join(state, parent, parent_collection, parent_path, ctx)
        }
    }

    fn strategy(&self, association: &Association, node: &ContainNode) -> Result<Strategy> {
        if node.matching {
            if let Some(requested) = node.strategy.filter(|s| s.is_deferred()) {
                tracing::warn!(
                    association = %association.name,
                    %requested,
                    "matching contain is always joined, ignoring requested strategy"
                );
            }
            return Ok(Strategy::Join);
        }
        let strategy = node
            .strategy
            .unwrap_or_else(|| association.default_strategy(self.config.to_many_strategy));
        association.supports(strategy)?;
        Ok(strategy)
    }

    fn plan_join(
        &self,
        state: &mut StatementState,
        parent: &mut HydrationNode,
        parent_collection: &Arc<Collection>,
        parent_path: &[String],
        ctx: NodeContext<'_>,
    ) -> Result<()> {
        let association = ctx.association;
        let target = ctx.target;
        let alias = association.name.as_str();
        let kind = if ctx.node.matching {
            JoinKind::Inner
        } else {
            JoinKind::Left
        };
        let foreign_key = ctx
            .node
            .foreign_key
            .clone()
            .unwrap_or_else(|| association.foreign_key.clone());
        let cardinality = if association.is_to_many() && !ctx.node.matching {
            Cardinality::Many
        } else {
            Cardinality::One
        };

        let mut child =
            HydrationNode::new(alias, &association.property, cardinality, ctx.node.matching);
        let mut junction_node = None;
        let first_join = state.statement.joins.len();

        let link = if association.kind == AssociationKind::BelongsToMany {
            let (through, junction) = self.junction(association, parent_collection, target)?;
            state.claim_alias(&through, ctx.path)?;
            state.statement.joins.push(
                JoinClause::new(through.as_str(), junction.table())
                    .with_kind(kind)
                    .with_condition(association.junction_condition(
                        &through,
                        &parent.alias,
                        parent_collection.primary_key(),
                        &foreign_key,
                    )),
            );
            state.collections.insert(through.clone(), junction.clone());
            let target_foreign_key = target_foreign_key(association);
            if !ctx.node.matching {
                let mut node = HydrationNode::new(
                    &through,
                    &inflector::property_name(&through, false),
                    Cardinality::One,
                    false,
                );
                state.add_junction_fields(&mut node, &junction, &foreign_key, &target_foreign_key);
                junction_node = Some(node);
            }
            association.target_junction_condition(
                &through,
                target.primary_key(),
                &target_foreign_key,
            )
        } else {
            association.link_condition(
                &parent.alias,
                parent_collection.primary_key(),
                target.primary_key(),
                &foreign_key,
            )
        };

        state.claim_alias(alias, ctx.path)?;
        state.collections.insert(alias.to_string(), target.clone());
        let mut join = JoinClause::new(alias, target.table())
            .with_kind(kind)
            .with_condition(link);
        for condition in association.conditions.iter().chain(&ctx.node.conditions) {
            join.conditions.push(self.bind(condition.qualified(alias), state));
        }
        state.statement.joins.push(join);

        state.add_fields(&mut child, target, &ctx.node.fields, false);
        state.ensure_identity(&mut child, target);
        if let Some(node) = junction_node {
            child.children.push(node);
        }

        if association.is_to_many() {
            for order in sort_for(association, ctx.node) {
                state.push_group_order(order.qualified(alias));
            }
            state.push_group_order(OrderSpec::asc(format!(
                "{}.{}",
                alias,
                target.primary_key()
            )));
        }

        let mut path = parent_path.to_vec();
        path.push(association.property.clone());
        self.plan_children(
            state,
            &mut child,
            target,
            &path,
            ctx.names,
            &ctx.node.children,
            ctx.depth + 1,
        )?;
        if cardinality == Cardinality::Many {
            state.mark_fanout(first_join);
        }
        parent.children.push(child);
        Ok(())
    }

    fn plan_deferred(
        &self,
        state: &mut StatementState,
        parent: &mut HydrationNode,
        parent_collection: &Arc<Collection>,
        parent_path: &[String],
        ctx: NodeContext<'_>,
        strategy: Strategy,
    ) -> Result<()> {
        let association = ctx.association;
        let target = ctx.target;
        let alias = association.name.as_str();
        let foreign_key = ctx
            .node
            .foreign_key
            .clone()
            .unwrap_or_else(|| association.foreign_key.clone());

        let parent_key = state.ensure_identity(parent, parent_collection);
        let parent_field = parent_key.field;

        let mut aux = StatementState::aliased(target, alias);
        let mut root = HydrationNode::new(alias, &association.property, Cardinality::One, false);
        aux.add_fields(&mut root, target, &ctx.node.fields, true);

        let (key_column, key_location) = if association.kind == AssociationKind::BelongsToMany {
            let (through, junction) = self.junction(association, parent_collection, target)?;
            let target_foreign_key = target_foreign_key(association);
            aux.claim_alias(&through, ctx.path)?;
            aux.statement.joins.push(
                JoinClause::new(through.as_str(), junction.table())
                    .with_kind(JoinKind::Inner)
                    .with_condition(association.target_junction_condition(
                        &through,
                        target.primary_key(),
                        &target_foreign_key,
                    )),
            );
            aux.collections.insert(through.clone(), junction.clone());

            let property = inflector::property_name(&through, false);
            let mut node = HydrationNode::new(&through, &property, Cardinality::One, false);
            aux.add_junction_fields(&mut node, &junction, &foreign_key, &target_foreign_key);
            let key = aux.ensure_column(&mut node, &junction, &foreign_key);
            root.children.push(node);

            // One target row per junction row, so the parent key is part of
            // the root identity.
            let key_expr = format!("{}.{}", through, foreign_key);
            aux.identity_columns.push((key_expr.clone(), key.key));
            (
                key_expr,
                KeyLocation::Nested {
                    property,
                    field: key.field,
                },
            )
        } else {
            let key = aux.ensure_column(&mut root, target, &foreign_key);
            (
                format!("{}.{}", alias, foreign_key),
                KeyLocation::Field(key.field),
            )
        };

        for condition in association.conditions.iter().chain(&ctx.node.conditions) {
            let condition = self.bind(condition.qualified(alias), &aux);
            aux.statement.conditions.push(condition);
        }
        aux.order = sort_for(association, ctx.node)
            .iter()
            .map(|o| o.qualified(alias))
            .collect();
        if self.config.stable_auxiliary_order {
            let pk = format!("{}.{}", alias, target.primary_key());
            if !aux.order.iter().any(|o| o.field == pk) {
                aux.order.push(OrderSpec::asc(pk));
            }
        }

        self.plan_children(
            &mut aux,
            &mut root,
            target,
            &[],
            ctx.names,
            &ctx.node.children,
            ctx.depth + 1,
        )?;

        let plan = aux.finish(root, target);
        tracing::debug!(
            association = %alias,
            %strategy,
            key = %key_column,
            "scheduled deferred load"
        );
        state.deferred.push(DeferredLoad {
            association: association.name.clone(),
            strategy,
            property: association.property.clone(),
            parent_path: parent_path.to_vec(),
            parent_field,
            parent_key_column: format!("{}.{}", parent.alias, parent_collection.primary_key()),
            parent_key_type: parent_collection.column_type(parent_collection.primary_key()),
            key_column,
            key_location,
            plan,
        });
        Ok(())
    }

    /// Resolve the junction collection of a many-to-many association,
    /// building it with the conventional table name when it is unknown.
    fn junction(
        &self,
        association: &Association,
        source: &Collection,
        target: &Collection,
    ) -> Result<(String, Arc<Collection>)> {
        let through = association
            .through
            .clone()
            .unwrap_or_else(|| inflector::junction_name(&association.source, &association.name));
        let junction = if self.registry.contains(&through)
            || self.registry.config(&through).is_some()
        {
            self.registry.build(&through, CollectionConfig::new())
        } else {
            self.registry.build(
                &through,
                CollectionConfig::new()
                    .with_table(inflector::junction_table(source.table(), target.table())),
            )
        };
        Ok((through, junction))
    }

    /// Convert condition values compared against declared columns.
    fn bind(&self, mut condition: Condition, state: &StatementState) -> Condition {
        self.bind_in_place(&mut condition, state);
        condition
    }

    fn bind_in_place(&self, condition: &mut Condition, state: &StatementState) {
        match condition {
            Condition::Eq { field, value }
            | Condition::Ne { field, value }
            | Condition::Lt { field, value }
            | Condition::Le { field, value }
            | Condition::Gt { field, value }
            | Condition::Ge { field, value } => {
                if let Some(column_type) = state.column_type(field) {
                    let raw = std::mem::replace(value, Value::Null);
                    *value = self.to_database(column_type, raw);
                }
            }
            Condition::In { field, values } | Condition::NotIn { field, values } => {
                if let Some(column_type) = state.column_type(field) {
                    for value in values.iter_mut() {
                        let raw = std::mem::replace(value, Value::Null);
                        *value = self.to_database(column_type, raw);
                    }
                }
            }
            Condition::And(items) | Condition::Or(items) => {
                for item in items.iter_mut() {
                    self.bind_in_place(item, state);
                }
            }
            Condition::Not(inner) => self.bind_in_place(inner, state),
            _ => {}
        }
    }

    fn to_database(&self, column_type: ScalarType, value: Value) -> Value {
        if value.is_null() {
            value
        } else {
            self.converter.to_database(column_type, value)
        }
    }
}

/// Alias part of a qualified `alias.column` field.
fn field_alias(field: &str) -> Option<&str> {
    split_qualified(field).map(|(alias, _)| alias)
}

/// Check if a condition refers to a column of any of `aliases`.
fn mentions_alias(condition: &Condition, aliases: &[String]) -> bool {
    let hit = |field: &str| field_alias(field).is_some_and(|a| aliases.iter().any(|x| x == a));
    match condition {
        Condition::Eq { field, .. }
        | Condition::Ne { field, .. }
        | Condition::Lt { field, .. }
        | Condition::Le { field, .. }
        | Condition::Gt { field, .. }
        | Condition::Ge { field, .. }
        | Condition::In { field, .. }
        | Condition::NotIn { field, .. }
        | Condition::IsNull { field }
        | Condition::IsNotNull { field }
        | Condition::Like { field, .. }
        | Condition::NotLike { field, .. }
        | Condition::InSubquery { field, .. } => hit(field),
        Condition::ColumnEq { left, right } => hit(left) || hit(right),
        Condition::Raw(sql) => aliases.iter().any(|a| sql.contains(&format!("{}.", a))),
        Condition::And(items) | Condition::Or(items) => {
            items.iter().any(|c| mentions_alias(c, aliases))
        }
        Condition::Not(inner) => mentions_alias(inner, aliases),
    }
}

#[derive(Clone, Copy)]
struct NodeContext<'n> {
    association: &'n Association,
    node: &'n ContainNode,
    target: &'n Arc<Collection>,
    path: &'n str,
    names: &'n [String],
    depth: usize,
}

fn sort_for<'n>(association: &'n Association, node: &'n ContainNode) -> &'n [OrderSpec] {
    if node.sort.is_empty() {
        &association.sort
    } else {
        &node.sort
    }
}

fn target_foreign_key(association: &Association) -> String {
    association
        .target_foreign_key
        .clone()
        .unwrap_or_else(|| inflector::foreign_key(&association.target))
}

/// A slot that was found or added for a key column.
struct KeySlot {
    key: String,
    field: String,
}

/// Mutable state for one statement while it is planned.
struct StatementState {
    statement: SelectStatement,
    alias_map: AliasMap,
    /// Collections by alias, for column types.
    collections: IndexMap<String, Arc<Collection>>,
    /// Caller ordering, placed ahead of grouping order.
    order: Vec<OrderSpec>,
    /// Ordering that keeps rows of one joined to-many record together.
    group_order: Vec<OrderSpec>,
    grouped: bool,
    /// Extra `(expression, row key)` pairs identifying a root record.
    identity_columns: Vec<(String, String)>,
    /// Aliases of joins that only repeat root rows, never filter them.
    fanout_aliases: Vec<String>,
    deferred: Vec<DeferredLoad>,
}

impl StatementState {
    fn new(collection: &Arc<Collection>) -> Self {
        Self::aliased(collection, collection.alias())
    }

    fn aliased(collection: &Arc<Collection>, alias: &str) -> Self {
        let mut collections = IndexMap::new();
        collections.insert(alias.to_string(), collection.clone());
        Self {
            statement: SelectStatement::new(collection.table(), alias),
            alias_map: AliasMap::new(),
            collections,
            order: Vec::new(),
            group_order: Vec::new(),
            grouped: false,
            identity_columns: Vec::new(),
            fanout_aliases: Vec::new(),
            deferred: Vec::new(),
        }
    }

    fn claim_alias(&mut self, alias: &str, path: &str) -> Result<()> {
        if self.statement.aliases().any(|a| a == alias) {
            return Err(Error::DuplicateAlias {
                alias: alias.to_string(),
                path: path.to_string(),
            });
        }
        Ok(())
    }

    fn column_type(&self, field: &str) -> Option<ScalarType> {
        let (alias, column) = split_qualified(field)?;
        self.collections.get(alias)?.column_type(column)
    }

    fn add_column(
        &mut self,
        node: &mut HydrationNode,
        collection: &Collection,
        column: &str,
        hidden: bool,
    ) -> KeySlot {
        let wanted = result_key(&node.alias, column);
        if let Some(existing) = node.columns.iter().find(|c| c.key == wanted) {
            return KeySlot {
                key: existing.key.clone(),
                field: existing.field.clone(),
            };
        }
        let key = result_key(&node.alias, column);
        self.statement.select.push(SelectItem::aliased(
            key.as_str(),
            format!("{}.{}", node.alias, column),
        ));
        self.alias_map.insert(&node.alias, column, key.as_str());
        let field = if hidden {
            key.clone()
        } else {
            column.to_string()
        };
        node.columns.push(ColumnSlot {
            key: key.clone(),
            field: field.clone(),
            column_type: collection.column_type(column),
            hidden,
        });
        KeySlot { key, field }
    }

    /// Find or add a column, hidden when it was not requested.
    fn ensure_column(
        &mut self,
        node: &mut HydrationNode,
        collection: &Collection,
        column: &str,
    ) -> KeySlot {
        self.add_column(node, collection, column, true)
    }

    /// Make sure the node selects its primary key and record it as identity.
    fn ensure_identity(&mut self, node: &mut HydrationNode, collection: &Collection) -> KeySlot {
        let slot = self.ensure_column(node, collection, collection.primary_key());
        node.identity = Some(slot.field.clone());
        slot
    }

    fn add_fields(
        &mut self,
        node: &mut HydrationNode,
        collection: &Collection,
        fields: &Fields,
        statement_root: bool,
    ) {
        match fields {
            Fields::All if collection.columns().is_empty() => {
                if statement_root {
                    self.statement
                        .select
                        .push(SelectItem::field(format!("{}.*", node.alias)));
                } else {
                    tracing::warn!(
                        collection = %collection.alias(),
                        "no declared columns, selecting keys only"
                    );
                }
            }
            Fields::All => {
                for column in collection.columns() {
                    self.add_column(node, collection, &column.name, false);
                }
            }
            Fields::Only(names) => {
                for name in names {
                    match split_qualified(name) {
                        Some((alias, column)) if alias == node.alias => {
                            self.add_column(node, collection, column, false);
                        }
                        Some((alias, column)) => self
                            .statement
                            .select
                            .push(SelectItem::aliased(result_key(alias, column), name.as_str())),
                        None if is_identifier(name) => {
                            self.add_column(node, collection, name, false);
                        }
                        None => self.statement.select.push(SelectItem::field(name.as_str())),
                    }
                }
            }
            Fields::None => {}
        }
    }

    /// Root select items given by the caller.
    fn add_select_item(
        &mut self,
        root: &mut HydrationNode,
        collection: &Collection,
        item: &SelectItem,
    ) {
        if item.key.is_some() {
            self.statement.select.push(item.clone());
            return;
        }
        match split_qualified(&item.expr) {
            Some((alias, column)) if alias == root.alias => {
                self.add_column(root, collection, column, false);
            }
            Some((alias, column)) => self.statement.select.push(SelectItem::aliased(
                result_key(alias, column),
                item.expr.as_str(),
            )),
            None if is_identifier(&item.expr) => {
                self.add_column(root, collection, &item.expr, false);
            }
            None => self.statement.select.push(item.clone()),
        }
    }

    fn add_junction_fields(
        &mut self,
        node: &mut HydrationNode,
        junction: &Collection,
        foreign_key: &str,
        target_foreign_key: &str,
    ) {
        if junction.columns().is_empty() {
            self.add_column(node, junction, foreign_key, false);
            self.add_column(node, junction, target_foreign_key, false);
        } else {
            for column in junction.columns() {
                self.add_column(node, junction, &column.name, false);
            }
        }
    }

    /// Record the joins from `first_join` on as fan-out joins of a to-many
    /// node, unless one of them is an inner join and so filters roots.
    fn mark_fanout(&mut self, first_join: usize) {
        let joins = &self.statement.joins[first_join..];
        if joins.iter().all(|j| j.kind == JoinKind::Left) {
            self.fanout_aliases.extend(joins.iter().map(|j| j.alias.clone()));
        }
    }

    /// Apply LIMIT and OFFSET to root records rather than joined rows.
    ///
    /// The page is selected by a subquery over the root keys that leaves out
    /// fan-out joins, and the outer statement reads every joined row of the
    /// roots on that page. Rows are paged as they are when a filter, the
    /// ordering or a grouping needs a fan-out join.
    fn page_roots(&mut self, collection: &Collection) {
        if self.fanout_aliases.is_empty() {
            return;
        }
        let fanout = &self.fanout_aliases;
        let uses_fanout = self
            .statement
            .conditions
            .iter()
            .any(|c| mentions_alias(c, fanout))
            || self
                .order
                .iter()
                .any(|o| field_alias(&o.field).is_some_and(|a| fanout.iter().any(|f| f == a)))
            || !self.statement.group_by.is_empty();
        if uses_fanout {
            tracing::debug!("to-many join needed to page, limiting joined rows");
            return;
        }

        let key = format!("{}.{}", self.statement.from.alias, collection.primary_key());
        let page = SelectStatement {
            select: vec![SelectItem::field(key.as_str())],
            from: self.statement.from.clone(),
            joins: self
                .statement
                .joins
                .iter()
                .filter(|j| !fanout.contains(&j.alias))
                .cloned()
                .collect(),
            conditions: self.statement.conditions.clone(),
            group_by: Vec::new(),
            having: Vec::new(),
            order_by: self.order.clone(),
            limit: self.statement.limit.take(),
            offset: self.statement.offset.take(),
        };
        self.statement.conditions.push(Condition::in_subquery(key, page));
    }

    fn push_group_order(&mut self, order: OrderSpec) {
        self.grouped = true;
        if !self.group_order.iter().any(|o| o.field == order.field) {
            self.group_order.push(order);
        }
    }

    fn finish(mut self, mut root: HydrationNode, collection: &Arc<Collection>) -> StatementPlan {
        let mut group_keys = Vec::new();
        let mut order = std::mem::take(&mut self.order);
        if self.grouped || !self.identity_columns.is_empty() {
            let identity = self.ensure_identity(&mut root, collection);
            group_keys.push(identity.key);
            let mut keys = vec![OrderSpec::asc(format!(
                "{}.{}",
                root.alias,
                collection.primary_key()
            ))];
            for (expr, key) in std::mem::take(&mut self.identity_columns) {
                keys.push(OrderSpec::asc(expr));
                group_keys.push(key);
            }
            if self.grouped {
                keys.extend(std::mem::take(&mut self.group_order));
            }
            for spec in keys {
                if !order.iter().any(|o| o.field == spec.field) {
                    order.push(spec);
                }
            }
        }
        self.statement.order_by = order;

        StatementPlan {
            collection: collection.alias().to_string(),
            statement: self.statement,
            alias_map: self.alias_map,
            hydration: Arc::new(root),
            group_keys,
            deferred: self.deferred,
        }
    }
}
