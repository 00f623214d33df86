//! Conversions between a SELECT and the DML statements it can seed: INSERT,
//! UPDATE, DELETE, MERGE, and the reverse direction via RETURNING.

mod delete;
mod insert;
mod merge;
mod returning;
mod update;
mod values;

pub use delete::to_delete;
pub use insert::to_insert;
pub use merge::{to_merge, MatchedOutcome, MergeActions, MergeOutcome};
pub use returning::{to_select_returning, Fixture, FixturePolicy, ReturningOptions};
pub use update::to_update;
pub use values::{select_union_all_to_values, values_to_select_union_all};

use crate::error::TransformError;
use sqlparser::ast::{
    BinaryOperator, Expr, Ident, ObjectName, ObjectNamePart, Query, Select, SelectItem, SetExpr,
    TableAlias, TableFactor, TableWithJoins,
};

/// Returns the single top-level `Select` a query must reduce to for these
/// converters — a `WITH` clause is allowed and preserved by the caller, but
/// a set operation is not a valid DML source.
pub(crate) fn top_level_select(query: &Query) -> Result<&Select, TransformError> {
    match query.body.as_ref() {
        SetExpr::Select(select) => Ok(select),
        _ => Err(TransformError::Internal(
            "DML conversion requires a simple SELECT, not a set operation".into(),
        )),
    }
}

pub(crate) fn select_list_names(select: &Select) -> Result<Vec<String>, TransformError> {
    let mut names = Vec::new();
    for item in &select.projection {
        match item {
            SelectItem::UnnamedExpr(Expr::Identifier(ident)) => names.push(ident.value.clone()),
            SelectItem::UnnamedExpr(Expr::CompoundIdentifier(parts)) => {
                names.push(parts.last().map(|p| p.value.clone()).unwrap_or_default())
            }
            SelectItem::ExprWithAlias { alias, .. } => names.push(alias.value.clone()),
            _ => return Err(TransformError::ColumnsNotInferrable),
        }
    }
    Ok(names)
}

pub(crate) fn object_name(name: &str) -> ObjectName {
    ObjectName(
        name.split('.')
            .map(|part| ObjectNamePart::Identifier(Ident::new(part)))
            .collect(),
    )
}

pub(crate) fn qualified_expr(qualifier: &str, name: &str) -> Expr {
    Expr::CompoundIdentifier(vec![Ident::new(qualifier), Ident::new(name)])
}

pub(crate) fn conjoin_eq(
    target_alias: &str,
    source_alias: &str,
    keys: &[String],
) -> Result<Expr, TransformError> {
    let mut iter = keys.iter();
    let first = iter.next().ok_or(TransformError::ColumnsNotInferrable)?;
    let mut expr = Expr::BinaryOp {
        left: Box::new(qualified_expr(target_alias, first)),
        op: BinaryOperator::Eq,
        right: Box::new(qualified_expr(source_alias, first)),
    };
    for key in iter {
        expr = Expr::BinaryOp {
            left: Box::new(expr),
            op: BinaryOperator::And,
            right: Box::new(Expr::BinaryOp {
                left: Box::new(qualified_expr(target_alias, key)),
                op: BinaryOperator::Eq,
                right: Box::new(qualified_expr(source_alias, key)),
            }),
        };
    }
    Ok(expr)
}

pub(crate) fn simple_table_alias(name: &str) -> TableAlias {
    TableAlias {
        name: Ident::new(name),
        columns: Vec::new(),
    }
}

pub(crate) fn table_with_joins(name: &str) -> TableWithJoins {
    TableWithJoins {
        relation: TableFactor::Table {
            name: object_name(name),
            alias: None,
            args: None,
            with_hints: Vec::new(),
            version: None,
            with_ordinality: false,
            partitions: Vec::new(),
            json_path: None,
            sample: None,
            index_hints: Vec::new(),
        },
        joins: Vec::new(),
    }
}

pub(crate) fn derived_table_with_joins(query: Query, alias: &str) -> TableWithJoins {
    TableWithJoins {
        relation: TableFactor::Derived {
            lateral: false,
            subquery: Box::new(query),
            alias: Some(simple_table_alias(alias)),
        },
        joins: Vec::new(),
    }
}

/// Reorders `select`'s projection so its names match `order`, failing if any
/// name in `order` isn't present. Mutates in place.
pub(crate) fn reorder_projection(
    select: &mut Select,
    order: &[String],
) -> Result<(), TransformError> {
    let names = select_list_names(select)?;
    let mut items: Vec<Option<SelectItem>> = select.projection.drain(..).map(Some).collect();
    let mut reordered = Vec::with_capacity(order.len());
    for wanted in order {
        let pos = names
            .iter()
            .position(|n| n == wanted)
            .ok_or_else(|| TransformError::ColumnNotFound(wanted.clone()))?;
        reordered.push(items[pos].take().ok_or(TransformError::Internal(
            "column selected twice during reorder".into(),
        ))?);
    }
    select.projection = reordered;
    Ok(())
}
