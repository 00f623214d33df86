//! AST-level rewriting for a single parsed SQL statement.
//!
//! This crate takes a `sqlparser::ast::Statement` (or the SQL text to parse
//! one) and applies composable transformations — predicate injection, sort
//! and pagination, JSON shape projection, join/aggregation decomposition,
//! DML-to-SELECT conversion, CTE dependency analysis, and alias renaming —
//! before handing the result back to `sqlparser`'s own `Display` impl for
//! printing. Tokenizing, parsing, and formatting are `sqlparser`'s job; this
//! crate only rewrites the tree in between.

pub mod alias_rename;
pub mod cte_graph;
pub mod decompose;
pub mod dml;
pub mod error;
pub mod injectors;
pub mod json_builder;
pub mod parser;
pub mod support;
pub mod types;
pub mod visitor;

mod collectors;

pub use error::{ParseError, TransformError};
pub use parser::{parse_one, parse_sql, parse_sql_with_dialect, validate_sql};
pub use types::{Dialect, Position, Span};
pub use visitor::Visitor;

pub use collectors::{
    ColumnReferenceCollector, ColumnResolver, CteCollector, CteTableReferenceCollector,
    SelectValueCollector, TableSourceCollector,
};

pub use cte_graph::{CteDependencyGraph, CteNode, CteNodeKind};

pub use injectors::{
    bind_parameters, inject_filter, inject_pagination, inject_sort, ConditionDescriptor,
    FilterOperator, FilterOptions, OperatorRecord, OperatorTerm, PaginationSpec, Scalar,
    SortDirection, SortSpec,
};

pub use json_builder::{
    build_json_query, JsonEntity, JsonMapping, LegacyFlatMapping, LegacyRelationship,
    LegacyRelationshipKind, ModelDrivenMapping, ModelField, ModelTypeInfo, NestedKind,
    RelationshipType, ResultFormat,
};

pub use dml::{
    select_union_all_to_values, to_delete, to_insert, to_merge, to_select_returning, to_update,
    values_to_select_union_all, Fixture, FixturePolicy, MatchedOutcome, MergeActions,
    MergeOutcome, ReturningOptions,
};

pub use decompose::{analyze_decomposition, decompose_join_aggregation, DecompositionReport};

pub use alias_rename::{rename_alias, AliasChange, RenameOptions, RenameScope, RenameResult};
