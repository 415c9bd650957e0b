//! Query composition, eager-load planning, hydration and result delivery.
//!
//! A [`Query`] collects clauses and a [`ContainTree`]. Compiling it runs the
//! [`Planner`], which produces a [`StatementPlan`]: one primary statement
//! with its joined associations, plus deferred loads for associations
//! fetched by separate statements. The [`Loader`] executes the plan and the
//! [`Hydrator`] folds flat rows into nested records.

mod builder;
pub mod contain;
pub mod hydrator;
pub mod loader;
pub mod mapreduce;
pub mod options;
pub mod planner;
pub mod result;
pub mod sql;

pub use builder::{Clause, Query};
pub use contain::{ContainNode, ContainTree, Fields, IntoContain};
pub use hydrator::Hydrator;
pub use loader::{Loader, RecordStream};
pub use mapreduce::{Emitter, MapReduce, MapReduceStage};
pub use planner::{
    AliasMap, Cardinality, DeferredLoad, HydrationNode, KeyLocation, Planner, RootQuery,
    StatementPlan,
};
pub use result::{DatumStream, ResultIter, ResultSet};
