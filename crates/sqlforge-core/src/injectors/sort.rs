use crate::error::TransformError;
use sqlparser::ast::{Expr, Ident, OrderBy, OrderByExpr, OrderByKind, OrderByOptions, Query, SetExpr};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone)]
pub struct SortSpec {
    pub column: String,
    pub direction: SortDirection,
    pub nulls_first: Option<bool>,
}

/// Appends `ORDER BY` items in insertion order. Refuses to operate on a
/// `BinarySelect` (set operation) — the caller must wrap it as a subquery
/// first, since ORDER BY on a set operation applies to the combined result,
/// not either branch.
pub fn inject_sort(query: &mut Query, specs: &[SortSpec]) -> Result<(), TransformError> {
    if specs.is_empty() {
        return Ok(());
    }
    if matches!(query.body.as_ref(), SetExpr::SetOperation { .. }) {
        return Err(TransformError::Internal(
            "sort injection does not support BinarySelect; wrap it as a subquery first".into(),
        ));
    }

    let mut exprs = match query.order_by.take() {
        Some(OrderBy {
            kind: OrderByKind::Expressions(existing),
            ..
        }) => existing,
        Some(OrderBy {
            kind: OrderByKind::All(_),
            ..
        }) => {
            return Err(TransformError::Internal(
                "sort injection does not support an existing ORDER BY ALL clause".into(),
            ));
        }
        None => Vec::new(),
    };

    for spec in specs {
        exprs.push(OrderByExpr {
            expr: Expr::Identifier(Ident::new(spec.column.clone())),
            options: OrderByOptions {
                asc: Some(spec.direction == SortDirection::Asc),
                nulls_first: spec.nulls_first,
            },
            with_fill: None,
        });
    }

    query.order_by = Some(OrderBy {
        kind: OrderByKind::Expressions(exprs),
        interpolate: None,
    });
    Ok(())
}
