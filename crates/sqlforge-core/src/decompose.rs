//! Rewrites a joined, aggregated `SELECT` into a `detail_data` CTE carrying
//! the ungrouped join/filter, plus an outer `SELECT` re-expressing the
//! original GROUP BY/HAVING/ORDER BY against it.

use crate::error::TransformError;
use sqlparser::ast::{
    CaseWhen, Expr, GroupByExpr, Query, Select, SelectItem, SetExpr, TableFactor, With,
};

/// Outcome of a non-throwing decomposition attempt.
#[derive(Debug, Clone)]
pub struct DecompositionReport {
    pub success: bool,
    pub decomposed: Option<Query>,
    pub error: Option<String>,
    pub limitations: Vec<String>,
}

/// Attempts the rewrite without throwing; failures surface in `error`.
pub fn analyze_decomposition(query: &Query) -> DecompositionReport {
    match decompose(query) {
        Ok((decomposed, limitations)) => DecompositionReport {
            success: true,
            decomposed: Some(decomposed),
            error: None,
            limitations,
        },
        Err(err) => DecompositionReport {
            success: false,
            decomposed: None,
            error: Some(err.to_string()),
            limitations: Vec::new(),
        },
    }
}

/// Throws a `DecompositionError` carrying the original query text on
/// failure; on success returns the rewritten query alone.
pub fn decompose_join_aggregation(query: &Query) -> Result<Query, TransformError> {
    decompose(query).map(|(q, _)| q)
}

fn decompose(query: &Query) -> Result<(Query, Vec<String>), TransformError> {
    let select = match query.body.as_ref() {
        SetExpr::Select(select) => select.as_ref(),
        _ => {
            return Err(TransformError::DecompositionError {
                reason: "decomposition requires a simple SELECT, not a set operation".into(),
                source_sql: query.to_string(),
            })
        }
    };

    let has_join = select.from.iter().any(|t| !t.joins.is_empty());
    let is_aggregated = is_aggregated_select(select);
    if !has_join || !is_aggregated {
        return Err(TransformError::DecompositionError {
            reason: "decomposition requires at least one JOIN and an aggregate or GROUP BY".into(),
            source_sql: query.to_string(),
        });
    }

    if has_window_function(select) {
        return Err(TransformError::DecompositionError {
            reason: "window functions cannot be safely rewritten against a detail CTE".into(),
            source_sql: query.to_string(),
        });
    }

    let mut limitations = Vec::new();
    if select.having.is_some() {
        limitations.push(
            "HAVING expression was carried over unchanged; it may still reference original table aliases".to_string(),
        );
    }
    if !select.sort_by.is_empty() || query.order_by.is_some() {
        limitations.push(
            "ORDER BY expression was carried over unchanged; it may still reference original table aliases".to_string(),
        );
    }

    let detail_select = Select {
        selection: select.selection.clone(),
        group_by: GroupByExpr::Expressions(Vec::new(), Vec::new()),
        having: None,
        projection: vec![SelectItem::Wildcard(
            sqlparser::ast::WildcardAdditionalOptions::default(),
        )],
        ..select.clone()
    };

    let detail_query = Query {
        with: None,
        body: Box::new(SetExpr::Select(Box::new(detail_select))),
        order_by: None,
        limit_clause: None,
        fetch: None,
        locks: Vec::new(),
        for_clause: None,
        settings: None,
        format_clause: None,
        pipe_operators: Vec::new(),
    };

    let outer_select = Select {
        from: vec![detail_data_source()],
        selection: None,
        ..select.clone()
    };

    let mut outer_query = Query {
        with: query.with.clone(),
        body: Box::new(SetExpr::Select(Box::new(outer_select))),
        order_by: query.order_by.clone(),
        limit_clause: query.limit_clause.clone(),
        fetch: query.fetch.clone(),
        locks: query.locks.clone(),
        for_clause: query.for_clause.clone(),
        settings: query.settings.clone(),
        format_clause: query.format_clause.clone(),
        pipe_operators: query.pipe_operators.clone(),
    };

    let detail_cte = sqlparser::ast::Cte {
        alias: sqlparser::ast::TableAlias {
            name: sqlparser::ast::Ident::new("detail_data"),
            columns: Vec::new(),
        },
        query: Box::new(detail_query),
        from: None,
        materialized: None,
        closing_paren_token: sqlparser::ast::helpers::attached_token::AttachedToken::empty(),
    };

    let mut ctes = vec![detail_cte];
    if let Some(existing) = outer_query.with.take() {
        ctes.extend(existing.cte_tables);
    }
    outer_query.with = Some(With {
        with_token: sqlparser::ast::helpers::attached_token::AttachedToken::empty(),
        recursive: false,
        cte_tables: ctes,
    });

    Ok((outer_query, limitations))
}

fn detail_data_source() -> sqlparser::ast::TableWithJoins {
    sqlparser::ast::TableWithJoins {
        relation: TableFactor::Table {
            name: sqlparser::ast::ObjectName(vec![sqlparser::ast::ObjectNamePart::Identifier(
                sqlparser::ast::Ident::new("detail_data"),
            )]),
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

fn is_aggregated_select(select: &Select) -> bool {
    if !matches!(&select.group_by, GroupByExpr::Expressions(cols, _) if cols.is_empty())
        || matches!(&select.group_by, GroupByExpr::All(_))
    {
        return true;
    }
    select
        .projection
        .iter()
        .any(|item| matches!(item, SelectItem::UnnamedExpr(e) | SelectItem::ExprWithAlias { expr: e, .. } if is_aggregate_call(e)))
}

fn is_aggregate_call(expr: &Expr) -> bool {
    const AGGREGATES: &[&str] = &["count", "sum", "avg", "min", "max", "array_agg", "string_agg"];
    match expr {
        Expr::Function(f) => f
            .name
            .0
            .last()
            .and_then(|p| p.as_ident())
            .is_some_and(|ident| AGGREGATES.contains(&ident.value.to_lowercase().as_str())),
        _ => false,
    }
}

fn has_window_function(select: &Select) -> bool {
    select
        .projection
        .iter()
        .any(|item| match item {
            SelectItem::UnnamedExpr(e) | SelectItem::ExprWithAlias { expr: e, .. } => {
                expr_has_window(e)
            }
            _ => false,
        })
        || select.having.as_ref().is_some_and(expr_has_window)
        || select.sort_by.iter().any(|o| expr_has_window(&o.expr))
}

fn expr_has_window(expr: &Expr) -> bool {
    match expr {
        Expr::Function(f) => f.over.is_some() || function_args_have_window(f),
        Expr::BinaryOp { left, right, .. } => expr_has_window(left) || expr_has_window(right),
        Expr::UnaryOp { expr, .. } | Expr::Nested(expr) | Expr::Cast { expr, .. } => {
            expr_has_window(expr)
        }
        Expr::Case {
            operand,
            conditions,
            else_result,
            ..
        } => {
            operand.as_deref().is_some_and(expr_has_window)
                || conditions.iter().any(|CaseWhen { condition, result }| {
                    expr_has_window(condition) || expr_has_window(result)
                })
                || else_result.as_deref().is_some_and(expr_has_window)
        }
        _ => false,
    }
}

fn function_args_have_window(f: &sqlparser::ast::Function) -> bool {
    let sqlparser::ast::FunctionArguments::List(list) = &f.args else {
        return false;
    };
    list.args.iter().any(|arg| match arg {
        sqlparser::ast::FunctionArg::Unnamed(sqlparser::ast::FunctionArgExpr::Expr(e))
        | sqlparser::ast::FunctionArg::Named {
            arg: sqlparser::ast::FunctionArgExpr::Expr(e),
            ..
        } => expr_has_window(e),
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_one;
    use crate::types::Dialect;
    use sqlparser::ast::Statement;

    fn query_of(sql: &str) -> Query {
        match parse_one(sql, Dialect::Generic).unwrap() {
            Statement::Query(q) => *q,
            _ => panic!("expected a query"),
        }
    }

    #[test]
    fn decomposes_join_with_group_by() {
        let q = query_of(
            "SELECT o.customer_id, count(i.id) AS n \
             FROM orders o JOIN items i ON i.order_id = o.id \
             GROUP BY o.customer_id",
        );
        let result = decompose_join_aggregation(&q).unwrap();
        let sql = result.to_string();
        assert!(sql.starts_with("WITH detail_data AS"));
        assert!(sql.contains("FROM detail_data"));
        assert!(sql.contains("GROUP BY o.customer_id"));
    }

    #[test]
    fn rejects_query_without_join() {
        let q = query_of("SELECT count(*) FROM orders GROUP BY customer_id");
        let err = decompose_join_aggregation(&q).unwrap_err();
        assert!(matches!(err, TransformError::DecompositionError { .. }));
    }

    #[test]
    fn rejects_window_function() {
        let q = query_of(
            "SELECT o.id, row_number() OVER (ORDER BY o.id) AS rn, count(i.id) \
             FROM orders o JOIN items i ON i.order_id = o.id GROUP BY o.id",
        );
        let err = decompose_join_aggregation(&q).unwrap_err();
        match err {
            TransformError::DecompositionError { reason, .. } => {
                assert!(reason.contains("window"))
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn outer_query_does_not_duplicate_original_where() {
        let q = query_of(
            "SELECT o.customer_id, count(i.id) AS n \
             FROM orders o JOIN items i ON i.order_id = o.id \
             WHERE o.status = 'active' GROUP BY o.customer_id",
        );
        let rewritten = decompose_join_aggregation(&q).unwrap();
        let sql = rewritten.to_string();
        assert_eq!(sql.matches("o.status = 'active'").count(), 1);
        assert!(sql.contains("WITH detail_data AS (SELECT * FROM orders"));
    }

    #[test]
    fn analyze_reports_having_limitation() {
        let q = query_of(
            "SELECT o.customer_id, count(i.id) AS n \
             FROM orders o JOIN items i ON i.order_id = o.id \
             GROUP BY o.customer_id HAVING count(i.id) > 1",
        );
        let report = analyze_decomposition(&q);
        assert!(report.success);
        assert!(report.limitations.iter().any(|l| l.contains("HAVING")));
    }
}

