use crate::error::TransformError;
use sqlparser::ast::{
    BinaryOperator, Expr, Query, Select, SelectFlavor, SelectItem, SetExpr, SetOperator,
    SetQuantifier, Value,
};

/// Converts `VALUES (row1), (row2), …` into `SELECT row1 UNION ALL SELECT
/// row2 …`. A zero-row input emits `SELECT <nulls> WHERE 1 = 0` so the
/// result still carries the right column count.
pub fn values_to_select_union_all(values: &sqlparser::ast::Values, column_count: usize) -> Query {
    if values.rows.is_empty() {
        let projection = (0..column_count)
            .map(|_| SelectItem::UnnamedExpr(Expr::value(Value::Null)))
            .collect();
        return wrap_select(plain_select(projection), Some(always_false()));
    }

    let mut body: Option<SetExpr> = None;
    for row in &values.rows {
        let projection = row.iter().cloned().map(SelectItem::UnnamedExpr).collect();
        let next = SetExpr::Select(Box::new(plain_select(projection)));
        body = Some(match body {
            None => next,
            Some(acc) => SetExpr::SetOperation {
                op: SetOperator::Union,
                set_quantifier: SetQuantifier::All,
                left: Box::new(acc),
                right: Box::new(next),
            },
        });
    }
    Query {
        with: None,
        body: Box::new(body.expect("at least one row produced a branch")),
        order_by: None,
        limit_clause: None,
        fetch: None,
        locks: Vec::new(),
        for_clause: None,
        settings: None,
        format_clause: None,
        pipe_operators: Vec::new(),
    }
}

/// The inverse of [`values_to_select_union_all`]: flattens a chain of
/// `SELECT … UNION ALL SELECT …` branches, each of which must project only
/// literal/constant expressions, back into a `VALUES` list.
pub fn select_union_all_to_values(query: &Query) -> Result<sqlparser::ast::Values, TransformError> {
    let mut rows = Vec::new();
    collect_branches(&query.body, &mut rows)?;
    Ok(sqlparser::ast::Values {
        explicit_row: false,
        rows,
    })
}

fn collect_branches(body: &SetExpr, rows: &mut Vec<Vec<Expr>>) -> Result<(), TransformError> {
    match body {
        SetExpr::Select(select) => {
            let row = select
                .projection
                .iter()
                .map(|item| match item {
                    SelectItem::UnnamedExpr(expr) | SelectItem::ExprWithAlias { expr, .. } => {
                        Ok(expr.clone())
                    }
                    _ => Err(TransformError::Internal(
                        "VALUES conversion requires a literal projection, not a wildcard".into(),
                    )),
                })
                .collect::<Result<Vec<_>, _>>()?;
            rows.push(row);
            Ok(())
        }
        SetExpr::SetOperation {
            op: SetOperator::Union,
            left,
            right,
            ..
        } => {
            collect_branches(left, rows)?;
            collect_branches(right, rows)
        }
        _ => Err(TransformError::Internal(
            "expected a chain of SELECT … UNION ALL SELECT …".into(),
        )),
    }
}

fn plain_select(projection: Vec<SelectItem>) -> Select {
    Select {
        select_token: sqlparser::ast::helpers::attached_token::AttachedToken::empty(),
        distinct: None,
        top: None,
        top_before_distinct: false,
        projection,
        exclude: None,
        into: None,
        from: Vec::new(),
        lateral_views: Vec::new(),
        prewhere: None,
        selection: None,
        group_by: sqlparser::ast::GroupByExpr::Expressions(Vec::new(), Vec::new()),
        cluster_by: Vec::new(),
        distribute_by: Vec::new(),
        sort_by: Vec::new(),
        having: None,
        named_window: Vec::new(),
        qualify: None,
        window_before_qualify: false,
        value_table_mode: None,
        connect_by: None,
        flavor: SelectFlavor::Standard,
    }
}

fn always_false() -> Expr {
    Expr::BinaryOp {
        left: Box::new(Expr::value(Value::Number("1".to_string(), false))),
        op: BinaryOperator::Eq,
        right: Box::new(Expr::value(Value::Number("0".to_string(), false))),
    }
}

fn wrap_select(mut select: Select, selection: Option<Expr>) -> Query {
    select.selection = selection;
    Query {
        with: None,
        body: Box::new(SetExpr::Select(Box::new(select))),
        order_by: None,
        limit_clause: None,
        fetch: None,
        locks: Vec::new(),
        for_clause: None,
        settings: None,
        format_clause: None,
        pipe_operators: Vec::new(),
    }
}
