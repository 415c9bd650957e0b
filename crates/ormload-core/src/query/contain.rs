//! Contain trees: which associations to eager-load, and how.

use super::options;
use crate::catalog::Strategy;
use crate::error::{Error, Result};
use indexmap::IndexMap;
use ormload_proto::statement::is_identifier;
use ormload_proto::{Condition, OrderSpec};
use serde_json::Value as Json;

/// Field selection for a contained association.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Fields {
    /// Every declared column.
    #[default]
    All,
    /// Exactly these columns, in this order.
    Only(Vec<String>),
    /// No columns of its own; the association is still joined.
    None,
}

/// One contained association and its nested contains.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainNode {
    /// Association name, resolved against the parent collection.
    pub name: String,
    pub fields: Fields,
    /// Strategy override.
    pub strategy: Option<Strategy>,
    /// Extra conditions on the association's rows.
    pub conditions: Vec<Condition>,
    pub sort: Vec<OrderSpec>,
    /// Filter parents by this association and hydrate a single record.
    pub matching: bool,
    /// Foreign key override for this load.
    pub foreign_key: Option<String>,
    pub children: ContainTree,
}

impl ContainNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Fields::All,
            strategy: None,
            conditions: Vec::new(),
            sort: Vec::new(),
            matching: false,
            foreign_key: None,
            children: ContainTree::new(),
        }
    }

    /// Select only these columns.
    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fields: Vec<String> = fields.into_iter().map(Into::into).collect();
        self.fields = if fields.is_empty() {
            Fields::All
        } else {
            Fields::Only(fields)
        };
        self
    }

    /// Select none of this association's own columns.
    pub fn no_fields(mut self) -> Self {
        self.fields = Fields::None;
        self
    }

    pub fn strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn sort(mut self, order: OrderSpec) -> Self {
        self.sort.push(order);
        self
    }

    pub fn matching(mut self) -> Self {
        self.matching = true;
        self
    }

    pub fn foreign_key(mut self, key: impl Into<String>) -> Self {
        self.foreign_key = Some(key.into());
        self
    }

    /// Nest another contain under this one.
    pub fn with(mut self, child: ContainNode) -> Self {
        self.children.merge_node(child);
        self
    }

    /// Overlay the settings `other` specifies, then merge its children.
    fn merge(&mut self, other: ContainNode) {
        if other.fields != Fields::All {
            self.fields = other.fields;
        }
        if other.strategy.is_some() {
            self.strategy = other.strategy;
        }
        if !other.conditions.is_empty() {
            self.conditions = other.conditions;
        }
        if !other.sort.is_empty() {
            self.sort = other.sort;
        }
        if other.foreign_key.is_some() {
            self.foreign_key = other.foreign_key;
        }
        self.matching |= other.matching;
        self.children.merge(other.children);
    }
}

/// Ordered mapping of association name to contain node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContainTree {
    nodes: IndexMap<String, ContainNode>,
}

impl ContainTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalize a JSON contain specification.
    ///
    /// Accepts a name or dotted path, an array of those, or a mapping of
    /// name to options. Recognized option keys are `fields`, `strategy`,
    /// `conditions`, `sort`, `matching` and `foreignKey`; any other key
    /// nests a further association.
    pub fn from_json(json: &Json) -> Result<Self> {
        let mut tree = Self::new();
        tree.merge_json(json)?;
        Ok(tree)
    }

    fn merge_json(&mut self, json: &Json) -> Result<()> {
        match json {
            Json::Null => Ok(()),
            Json::String(path) => self.insert_path(path).map(|_| ()),
            Json::Array(items) => items.iter().try_for_each(|item| self.merge_json(item)),
            Json::Object(map) => map.iter().try_for_each(|(key, value)| {
                let (parent, name) = split_path(key)?;
                let node = parse_node(name, value)?;
                self.attach(parent, node)
            }),
            other => Err(Error::InvalidContain(format!(
                "expected a name, list or mapping, found {}",
                other
            ))),
        }
    }

    /// Ensure every node along a dotted path exists; return the last one.
    pub fn insert_path(&mut self, path: &str) -> Result<&mut ContainNode> {
        let segments = path_segments(path)?;
        let mut tree = self;
        let (last, parents) = segments
            .split_last()
            .ok_or_else(|| Error::InvalidContain("empty contain path".into()))?;
        for segment in parents {
            tree = &mut tree
                .nodes
                .entry(segment.to_string())
                .or_insert_with(|| ContainNode::new(*segment))
                .children;
        }
        Ok(tree
            .nodes
            .entry(last.to_string())
            .or_insert_with(|| ContainNode::new(*last)))
    }

    fn attach(&mut self, parent: Option<&str>, node: ContainNode) -> Result<()> {
        match parent {
            Some(path) => self.insert_path(path)?.children.merge_node(node),
            None => self.merge_node(node),
        }
        Ok(())
    }

    /// Add a node, merging with an existing node of the same name.
    ///
    /// A dotted node name is attached under its parent path.
    pub fn merge_node(&mut self, node: ContainNode) {
        if let Some((parent, name)) = node.name.rsplit_once('.') {
            let parent = parent.to_string();
            let node = ContainNode {
                name: name.to_string(),
                ..node
            };
            let mut current = self;
            for segment in parent.split('.') {
                current = &mut current
                    .nodes
                    .entry(segment.to_string())
                    .or_insert_with(|| ContainNode::new(segment))
                    .children;
            }
            current.merge_node(node);
            return;
        }
        match self.nodes.get_mut(&node.name) {
            Some(existing) => existing.merge(node),
            None => {
                self.nodes.insert(node.name.clone(), node);
            }
        }
    }

    /// Merge another tree into this one.
    pub fn merge(&mut self, other: ContainTree) {
        for (_, node) in other.nodes {
            self.merge_node(node);
        }
    }

    pub fn get(&self, name: &str) -> Option<&ContainNode> {
        self.nodes.get(name)
    }

    /// Find a node by dotted path.
    pub fn find(&self, path: &str) -> Option<&ContainNode> {
        let mut segments = path.split('.');
        let mut node = self.nodes.get(segments.next()?)?;
        for segment in segments {
            node = node.children.nodes.get(segment)?;
        }
        Some(node)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ContainNode> {
        self.nodes.values()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Every dotted path in the tree, parents before children.
    pub fn paths(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_paths("", &mut out);
        out
    }

    fn collect_paths(&self, prefix: &str, out: &mut Vec<String>) {
        for node in self.nodes.values() {
            let path = if prefix.is_empty() {
                node.name.clone()
            } else {
                format!("{}.{}", prefix, node.name)
            };
            out.push(path.clone());
            node.children.collect_paths(&path, out);
        }
    }

    /// Length of the longest path.
    pub fn depth(&self) -> usize {
        self.nodes
            .values()
            .map(|n| 1 + n.children.depth())
            .max()
            .unwrap_or(0)
    }
}

fn path_segments(path: &str) -> Result<Vec<&str>> {
    let segments: Vec<&str> = path.split('.').map(str::trim).collect();
    if let Some(bad) = segments.iter().find(|s| !is_identifier(s)) {
        return Err(Error::InvalidContain(format!(
            "invalid association name '{}' in '{}'",
            bad, path
        )));
    }
    Ok(segments)
}

fn split_path(key: &str) -> Result<(Option<&str>, &str)> {
    path_segments(key)?;
    Ok(match key.rsplit_once('.') {
        Some((parent, name)) => (Some(parent), name),
        None => (None, key),
    })
}

fn parse_node(name: &str, json: &Json) -> Result<ContainNode> {
    let mut node = ContainNode::new(name.trim());
    match json {
        Json::Null | Json::Bool(true) => {}
        Json::String(_) | Json::Array(_) => node.children.merge_json(json)?,
        Json::Object(map) => {
            for (key, value) in map {
                match key.as_str() {
                    "fields" => node.fields = parse_fields(value)?,
                    "strategy" => node.strategy = Some(parse_strategy(value)?),
                    "conditions" => node.conditions = options::parse_conditions(key, value)?,
                    "sort" => node.sort = options::parse_order(key, value)?,
                    "matching" => {
                        node.matching = value.as_bool().ok_or_else(|| {
                            Error::InvalidContain(format!(
                                "'matching' on '{}' must be a boolean",
                                name
                            ))
                        })?
                    }
                    "foreignKey" | "foreign_key" => {
                        node.foreign_key = Some(
                            value
                                .as_str()
                                .ok_or_else(|| {
                                    Error::InvalidContain(format!(
                                        "'foreignKey' on '{}' must be a string",
                                        name
                                    ))
                                })?
                                .to_string(),
                        )
                    }
                    _ => {
                        let (parent, child_name) = split_path(key)?;
                        let child = parse_node(child_name, value)?;
                        node.children.attach(parent, child)?;
                    }
                }
            }
        }
        other => {
            return Err(Error::InvalidContain(format!(
                "unsupported options for '{}': {}",
                name, other
            )))
        }
    }
    Ok(node)
}

fn parse_fields(json: &Json) -> Result<Fields> {
    match json {
        Json::Bool(false) => Ok(Fields::None),
        Json::Bool(true) | Json::Null => Ok(Fields::All),
        Json::String(s) if s == "*" => Ok(Fields::All),
        _ => {
            let names = options::parse_names("fields", json)?;
            Ok(if names.is_empty() {
                Fields::All
            } else {
                Fields::Only(names)
            })
        }
    }
}

fn parse_strategy(json: &Json) -> Result<Strategy> {
    match json {
        Json::String(s) => s.parse(),
        other => Err(Error::UnknownStrategy(other.to_string())),
    }
}

/// Conversion into a contain tree, for [`crate::Query::contain`].
pub trait IntoContain {
    fn into_contain(self) -> Result<ContainTree>;
}

impl IntoContain for ContainTree {
    fn into_contain(self) -> Result<ContainTree> {
        Ok(self)
    }
}

impl IntoContain for ContainNode {
    fn into_contain(self) -> Result<ContainTree> {
        path_segments(&self.name)?;
        let mut tree = ContainTree::new();
        tree.merge_node(self);
        Ok(tree)
    }
}

impl IntoContain for Vec<ContainNode> {
    fn into_contain(self) -> Result<ContainTree> {
        let mut tree = ContainTree::new();
        for node in self {
            tree.merge(node.into_contain()?);
        }
        Ok(tree)
    }
}

impl IntoContain for &str {
    fn into_contain(self) -> Result<ContainTree> {
        let mut tree = ContainTree::new();
        tree.insert_path(self)?;
        Ok(tree)
    }
}

impl IntoContain for String {
    fn into_contain(self) -> Result<ContainTree> {
        self.as_str().into_contain()
    }
}

impl IntoContain for &[&str] {
    fn into_contain(self) -> Result<ContainTree> {
        let mut tree = ContainTree::new();
        for path in self {
            tree.insert_path(path)?;
        }
        Ok(tree)
    }
}

impl<const N: usize> IntoContain for [&str; N] {
    fn into_contain(self) -> Result<ContainTree> {
        self.as_slice().into_contain()
    }
}

impl IntoContain for Vec<&str> {
    fn into_contain(self) -> Result<ContainTree> {
        self.as_slice().into_contain()
    }
}

impl IntoContain for Vec<String> {
    fn into_contain(self) -> Result<ContainTree> {
        let mut tree = ContainTree::new();
        for path in &self {
            tree.insert_path(path)?;
        }
        Ok(tree)
    }
}

impl IntoContain for Json {
    fn into_contain(self) -> Result<ContainTree> {
        ContainTree::from_json(&self)
    }
}

impl IntoContain for &Json {
    fn into_contain(self) -> Result<ContainTree> {
        ContainTree::from_json(self)
    }
}
