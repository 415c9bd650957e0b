//! Association definitions between collections.

use super::inflector;
use crate::error::{Error, Result};
use indexmap::IndexMap;
use ormload_proto::{Condition, OrderSpec};
use std::fmt;
use std::str::FromStr;

/// Kind of an association, seen from its source collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssociationKind {
    /// The source holds a foreign key to one target row.
    BelongsTo,
    /// One target row holds a foreign key to the source.
    HasOne,
    /// Many target rows hold a foreign key to the source.
    HasMany,
    /// Source and target are linked through a junction collection.
    BelongsToMany,
}

impl AssociationKind {
    /// Check if the association yields a sequence of records.
    pub fn is_to_many(&self) -> bool {
        matches!(self, AssociationKind::HasMany | AssociationKind::BelongsToMany)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AssociationKind::BelongsTo => "belongs_to",
            AssociationKind::HasOne => "has_one",
            AssociationKind::HasMany => "has_many",
            AssociationKind::BelongsToMany => "belongs_to_many",
        }
    }
}

impl fmt::Display for AssociationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssociationKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "belongs_to" | "belongsto" => Ok(AssociationKind::BelongsTo),
            "has_one" | "hasone" => Ok(AssociationKind::HasOne),
            "has_many" | "hasmany" => Ok(AssociationKind::HasMany),
            "belongs_to_many" | "belongstomany" => Ok(AssociationKind::BelongsToMany),
            _ => Err(Error::invalid_option(
                "kind",
                format!("unknown association kind '{}'", s),
            )),
        }
    }
}

/// How an association's rows are fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    /// Joined into the parent statement.
    Join,
    /// Separate statement filtered by the materialized parent keys.
    Select,
    /// Separate statement filtered by a subquery over the parent statement.
    Subquery,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Join => "join",
            Strategy::Select => "select",
            Strategy::Subquery => "subquery",
        }
    }

    /// Check if the strategy defers loading to a separate statement.
    pub fn is_deferred(&self) -> bool {
        !matches!(self, Strategy::Join)
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "join" => Ok(Strategy::Join),
            "select" => Ok(Strategy::Select),
            "subquery" => Ok(Strategy::Subquery),
            _ => Err(Error::UnknownStrategy(s.to_string())),
        }
    }
}

/// Optional settings for an association declaration.
///
/// Anything left unset is derived from naming conventions when the
/// association is declared.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssociationOptions {
    pub target: Option<String>,
    pub foreign_key: Option<String>,
    pub target_foreign_key: Option<String>,
    pub property: Option<String>,
    pub strategy: Option<Strategy>,
    pub through: Option<String>,
    pub conditions: Vec<Condition>,
    pub sort: Vec<OrderSpec>,
}

impl AssociationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Target collection name, when it differs from the association name.
    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn foreign_key(mut self, key: impl Into<String>) -> Self {
        self.foreign_key = Some(key.into());
        self
    }

    /// Junction column pointing at the target (many-to-many only).
    pub fn target_foreign_key(mut self, key: impl Into<String>) -> Self {
        self.target_foreign_key = Some(key.into());
        self
    }

    pub fn property(mut self, property: impl Into<String>) -> Self {
        self.property = Some(property.into());
        self
    }

    pub fn strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    /// Junction collection name (many-to-many only).
    pub fn through(mut self, junction: impl Into<String>) -> Self {
        self.through = Some(junction.into());
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
}

/// A declared association from a source collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Association {
    /// Association name; also the SQL alias of the target.
    pub name: String,
    pub kind: AssociationKind,
    /// Source collection name.
    pub source: String,
    /// Target collection name.
    pub target: String,
    /// On the source for `BelongsTo`, on the target for `HasOne`/`HasMany`,
    /// on the junction (pointing at the source) for `BelongsToMany`.
    pub foreign_key: String,
    /// Junction column pointing at the target (`BelongsToMany` only).
    pub target_foreign_key: Option<String>,
    /// Junction collection name (`BelongsToMany` only).
    pub through: Option<String>,
    /// Key under which hydrated records are stored.
    pub property: String,
    /// Declared strategy. `None` defers to the engine default for the kind.
    pub strategy: Option<Strategy>,
    /// Extra conditions applied to every load.
    pub conditions: Vec<Condition>,
    /// Ordering applied to every load.
    pub sort: Vec<OrderSpec>,
}

impl Association {
    /// Declare an association, filling unset options from naming conventions.
    pub fn new(
        source: &str,
        name: impl Into<String>,
        kind: AssociationKind,
        options: AssociationOptions,
    ) -> Result<Self> {
        let name = name.into();
        if let Some(strategy) = options.strategy {
            check_strategy(kind, &name, strategy)?;
        }

        let foreign_key = options.foreign_key.unwrap_or_else(|| match kind {
            AssociationKind::BelongsTo => inflector::foreign_key(&name),
            _ => inflector::foreign_key(source),
        });
        let (through, target_foreign_key) = if kind == AssociationKind::BelongsToMany {
            (
                Some(
                    options
                        .through
                        .unwrap_or_else(|| inflector::junction_name(source, &name)),
                ),
                Some(
                    options
                        .target_foreign_key
                        .unwrap_or_else(|| inflector::foreign_key(&name)),
                ),
            )
        } else {
            (None, None)
        };

        Ok(Self {
            property: options
                .property
                .unwrap_or_else(|| inflector::property_name(&name, kind.is_to_many())),
            target: options.target.unwrap_or_else(|| name.clone()),
            source: source.to_string(),
            name,
            kind,
            foreign_key,
            target_foreign_key,
            through,
            strategy: options.strategy,
            conditions: options.conditions,
            sort: options.sort,
        })
    }

    /// Check if the association yields a sequence of records.
    pub fn is_to_many(&self) -> bool {
        self.kind.is_to_many()
    }

    /// Strategy used when a contain does not override it.
    pub fn default_strategy(&self, to_many_default: Strategy) -> Strategy {
        match self.strategy {
            Some(strategy) => strategy,
            None if self.is_to_many() => to_many_default,
            None => Strategy::Join,
        }
    }

    /// Check that `strategy` can load this association.
    pub fn supports(&self, strategy: Strategy) -> Result<()> {
        check_strategy(self.kind, &self.name, strategy)
    }

    /// Join condition linking the target (aliased by the association name) to
    /// its parent. Not used for `BelongsToMany`, which links through the
    /// junction.
    pub fn link_condition(
        &self,
        parent_alias: &str,
        parent_key: &str,
        target_key: &str,
        foreign_key: &str,
    ) -> Condition {
        match self.kind {
            AssociationKind::BelongsTo => Condition::column_eq(
                format!("{}.{}", self.name, target_key),
                format!("{}.{}", parent_alias, foreign_key),
            ),
            _ => Condition::column_eq(
                format!("{}.{}", parent_alias, parent_key),
                format!("{}.{}", self.name, foreign_key),
            ),
        }
    }

    /// Join condition linking the junction to the parent.
    pub fn junction_condition(
        &self,
        junction: &str,
        parent_alias: &str,
        parent_key: &str,
        foreign_key: &str,
    ) -> Condition {
        Condition::column_eq(
            format!("{}.{}", parent_alias, parent_key),
            format!("{}.{}", junction, foreign_key),
        )
    }

    /// Join condition linking the target to the junction.
    pub fn target_junction_condition(
        &self,
        junction: &str,
        target_key: &str,
        target_foreign_key: &str,
    ) -> Condition {
        Condition::column_eq(
            format!("{}.{}", self.name, target_key),
            format!("{}.{}", junction, target_foreign_key),
        )
    }
}

fn check_strategy(kind: AssociationKind, name: &str, strategy: Strategy) -> Result<()> {
    if strategy.is_deferred() && !kind.is_to_many() {
        return Err(Error::UnknownStrategy(format!(
            "{} is not supported by {} association '{}'",
            strategy, kind, name
        )));
    }
    Ok(())
}

/// Ordered set of associations declared on one collection.
#[derive(Debug, Clone, Default)]
pub struct AssociationGraph {
    associations: IndexMap<String, Association>,
}

impl AssociationGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an association; names are unique per source collection.
    pub fn add(&mut self, association: Association) -> Result<()> {
        if self.associations.contains_key(&association.name) {
            return Err(Error::DuplicateAssociation {
                collection: association.source.clone(),
                association: association.name.clone(),
            });
        }
        self.associations
            .insert(association.name.clone(), association);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Association> {
        self.associations.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Association> {
        self.associations.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.associations.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.associations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.associations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_belongs_to_defaults() {
        let assoc = Association::new(
            "article",
            "author",
            AssociationKind::BelongsTo,
            AssociationOptions::new(),
        )
        .unwrap();

        assert_eq!(assoc.target, "author");
        assert_eq!(assoc.foreign_key, "author_id");
        assert_eq!(assoc.property, "author");
        assert_eq!(assoc.default_strategy(Strategy::Select), Strategy::Join);
        assert_eq!(
            assoc.link_condition("article", "id", "id", &assoc.foreign_key),
            Condition::column_eq("author.id", "article.author_id")
        );
    }

    #[test]
    fn test_has_many_defaults() {
        let assoc = Association::new(
            "author",
            "article",
            AssociationKind::HasMany,
            AssociationOptions::new(),
        )
        .unwrap();

        assert_eq!(assoc.foreign_key, "author_id");
        assert_eq!(assoc.property, "articles");
        assert_eq!(assoc.default_strategy(Strategy::Subquery), Strategy::Subquery);
        assert_eq!(
            assoc.link_condition("author", "id", "id", &assoc.foreign_key),
            Condition::column_eq("author.id", "article.author_id")
        );
    }

    #[test]
    fn test_has_one_links_parent_key_to_target_foreign_key() {
        let assoc = Association::new(
            "client",
            "order",
            AssociationKind::HasOne,
            AssociationOptions::new(),
        )
        .unwrap();
        assert_eq!(
            assoc.link_condition("client", "id", "id", &assoc.foreign_key),
            Condition::column_eq("client.id", "order.client_id")
        );
    }

    #[test]
    fn test_belongs_to_many_defaults() {
        let assoc = Association::new(
            "Article",
            "Tag",
            AssociationKind::BelongsToMany,
            AssociationOptions::new(),
        )
        .unwrap();

        assert_eq!(assoc.through.as_deref(), Some("ArticleTag"));
        assert_eq!(assoc.foreign_key, "article_id");
        assert_eq!(assoc.target_foreign_key.as_deref(), Some("tag_id"));
        assert_eq!(assoc.property, "tags");
        assert_eq!(
            assoc.junction_condition("ArticleTag", "Article", "id", "article_id"),
            Condition::column_eq("Article.id", "ArticleTag.article_id")
        );
        assert_eq!(
            assoc.target_junction_condition("ArticleTag", "id", "tag_id"),
            Condition::column_eq("Tag.id", "ArticleTag.tag_id")
        );
    }

    #[test]
    fn test_to_one_rejects_deferred_strategy() {
        let result = Association::new(
            "article",
            "author",
            AssociationKind::BelongsTo,
            AssociationOptions::new().strategy(Strategy::Select),
        );
        assert!(matches!(result, Err(Error::UnknownStrategy(_))));
    }

    #[test]
    fn test_strategy_parse() {
        assert_eq!("Subquery".parse::<Strategy>().unwrap(), Strategy::Subquery);
        assert!(matches!(
            "lazy".parse::<Strategy>(),
            Err(Error::UnknownStrategy(s)) if s == "lazy"
        ));
        assert_eq!(
            "has-many".parse::<AssociationKind>().unwrap(),
            AssociationKind::HasMany
        );
    }

    #[test]
    fn test_graph_rejects_duplicate_names() {
        let mut graph = AssociationGraph::new();
        let assoc = Association::new(
            "author",
            "article",
            AssociationKind::HasMany,
            AssociationOptions::new(),
        )
        .unwrap();
        graph.add(assoc.clone()).unwrap();
        assert!(matches!(
            graph.add(assoc),
            Err(Error::DuplicateAssociation { .. })
        ));
        assert_eq!(graph.names().collect::<Vec<_>>(), vec!["article"]);
    }
}
