use super::condition::Scalar;
use crate::error::TransformError;
use sqlparser::ast::{Expr, Query, Statement, Value};
use std::collections::HashMap;

/// Walks every placeholder (`Expr::Value(Value::Placeholder(..))`) in
/// `statement`, matches it by name against `values`, and writes the bound
/// literal in place.
///
/// With `require_all_parameters = true`, any placeholder left without a
/// matching entry in `values` is reported as `MissingParameter`.
pub fn bind_parameters(
    statement: &mut Statement,
    values: &HashMap<String, Scalar>,
    require_all_parameters: bool,
) -> Result<(), TransformError> {
    let mut missing = None;
    walk_statement_mut(statement, &mut |expr| {
        if missing.is_some() {
            return;
        }
        if let Expr::Value(vws) = expr {
            if let Value::Placeholder(name) = &vws.value {
                let key = name.trim_start_matches(':');
                match values.get(key) {
                    Some(scalar) => *expr = scalar_to_expr(scalar),
                    None if require_all_parameters => {
                        missing = Some(key.to_string());
                    }
                    None => {}
                }
            }
        }
    });
    match missing {
        Some(name) => Err(TransformError::MissingParameter(name)),
        None => Ok(()),
    }
}

fn scalar_to_expr(scalar: &Scalar) -> Expr {
    let value = match scalar {
        Scalar::Null => Value::Null,
        Scalar::Bool(b) => Value::Boolean(*b),
        Scalar::Number(n) => Value::Number(format_number(*n), false),
        Scalar::String(s) => Value::SingleQuotedString(s.clone()),
    };
    Expr::value(value)
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

fn walk_statement_mut(statement: &mut Statement, f: &mut impl FnMut(&mut Expr)) {
    match statement {
        Statement::Query(query) => walk_query_mut(query, f),
        Statement::Insert(insert) => {
            if let Some(source) = &mut insert.source {
                walk_query_mut(source, f);
            }
        }
        Statement::Update {
            assignments,
            selection,
            ..
        } => {
            for a in assignments {
                walk_expr_mut(&mut a.value, f);
            }
            if let Some(e) = selection {
                walk_expr_mut(e, f);
            }
        }
        Statement::Delete(delete) => {
            if let Some(e) = &mut delete.selection {
                walk_expr_mut(e, f);
            }
        }
        _ => {}
    }
}

fn walk_query_mut(query: &mut Query, f: &mut impl FnMut(&mut Expr)) {
    if let Some(with) = &mut query.with {
        for cte in &mut with.cte_tables {
            walk_query_mut(&mut cte.query, f);
        }
    }
    walk_set_expr_mut(&mut query.body, f);
}

fn walk_set_expr_mut(set_expr: &mut sqlparser::ast::SetExpr, f: &mut impl FnMut(&mut Expr)) {
    use sqlparser::ast::SetExpr;
    match set_expr {
        SetExpr::Select(select) => {
            if let Some(e) = &mut select.selection {
                walk_expr_mut(e, f);
            }
            if let Some(e) = &mut select.having {
                walk_expr_mut(e, f);
            }
            for item in &mut select.projection {
                match item {
                    sqlparser::ast::SelectItem::UnnamedExpr(e)
                    | sqlparser::ast::SelectItem::ExprWithAlias { expr: e, .. } => {
                        walk_expr_mut(e, f)
                    }
                    _ => {}
                }
            }
        }
        SetExpr::Query(q) => walk_query_mut(q, f),
        SetExpr::SetOperation { left, right, .. } => {
            walk_set_expr_mut(left, f);
            walk_set_expr_mut(right, f);
        }
        _ => {}
    }
}

fn walk_expr_mut(expr: &mut Expr, f: &mut impl FnMut(&mut Expr)) {
    match expr {
        Expr::BinaryOp { left, right, .. } => {
            walk_expr_mut(left, f);
            walk_expr_mut(right, f);
        }
        Expr::UnaryOp { expr, .. } | Expr::Nested(expr) | Expr::IsNull(expr) | Expr::IsNotNull(expr) => {
            walk_expr_mut(expr, f)
        }
        Expr::InList { expr, list, .. } => {
            walk_expr_mut(expr, f);
            for e in list {
                walk_expr_mut(e, f);
            }
        }
        Expr::Like { expr, pattern, .. } | Expr::ILike { expr, pattern, .. } => {
            walk_expr_mut(expr, f);
            walk_expr_mut(pattern, f);
        }
        Expr::AnyOp { left, right, .. } | Expr::AllOp { left, right, .. } => {
            walk_expr_mut(left, f);
            walk_expr_mut(right, f);
        }
        Expr::Between {
            expr, low, high, ..
        } => {
            walk_expr_mut(expr, f);
            walk_expr_mut(low, f);
            walk_expr_mut(high, f);
        }
        Expr::Case {
            operand,
            conditions,
            else_result,
            ..
        } => {
            if let Some(operand) = operand {
                walk_expr_mut(operand, f);
            }
            for when in conditions {
                walk_expr_mut(&mut when.condition, f);
                walk_expr_mut(&mut when.result, f);
            }
            if let Some(else_result) = else_result {
                walk_expr_mut(else_result, f);
            }
        }
        Expr::Cast { expr, .. } => walk_expr_mut(expr, f),
        Expr::Subquery(query) => walk_query_mut(query, f),
        Expr::InSubquery {
            expr,
            subquery,
            ..
        } => {
            walk_expr_mut(expr, f);
            walk_query_mut(subquery, f);
        }
        Expr::Tuple(exprs) => {
            for e in exprs {
                walk_expr_mut(e, f);
            }
        }
        Expr::Function(function) => walk_function_args_mut(&mut function.args, f),
        other => f(other),
    }
}

fn walk_function_args_mut(
    args: &mut sqlparser::ast::FunctionArguments,
    f: &mut impl FnMut(&mut Expr),
) {
    use sqlparser::ast::{FunctionArg, FunctionArgExpr, FunctionArguments};
    match args {
        FunctionArguments::None => {}
        FunctionArguments::Subquery(query) => walk_query_mut(query, f),
        FunctionArguments::List(list) => {
            for arg in &mut list.args {
                let arg_expr = match arg {
                    FunctionArg::Named { arg, .. }
                    | FunctionArg::ExprNamed { arg, .. }
                    | FunctionArg::Unnamed(arg) => arg,
                };
                if let FunctionArgExpr::Expr(expr) = arg_expr {
                    walk_expr_mut(expr, f);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_one;
    use crate::types::Dialect;

    #[test]
    fn binds_matching_placeholder() {
        let mut stmt =
            parse_one("SELECT id FROM users WHERE status = :status", Dialect::Generic).unwrap();
        let mut values = HashMap::new();
        values.insert("status".to_string(), Scalar::String("premium".into()));
        bind_parameters(&mut stmt, &values, true).unwrap();
        assert!(stmt.to_string().contains("status = 'premium'"));
    }

    #[test]
    fn missing_required_parameter_errors() {
        let mut stmt =
            parse_one("SELECT id FROM users WHERE status = :status", Dialect::Generic).unwrap();
        let err = bind_parameters(&mut stmt, &HashMap::new(), true).unwrap_err();
        assert_eq!(err, TransformError::MissingParameter("status".to_string()));
    }

    #[test]
    fn unbound_allowed_when_not_required() {
        let mut stmt =
            parse_one("SELECT id FROM users WHERE status = :status", Dialect::Generic).unwrap();
        bind_parameters(&mut stmt, &HashMap::new(), false).unwrap();
        assert!(stmt.to_string().contains(":status"));
    }

    #[test]
    fn binds_placeholder_nested_in_between() {
        let mut stmt = parse_one(
            "SELECT id FROM orders WHERE total BETWEEN :low AND :high",
            Dialect::Generic,
        )
        .unwrap();
        let mut values = HashMap::new();
        values.insert("low".to_string(), Scalar::Number(10.0));
        values.insert("high".to_string(), Scalar::Number(100.0));
        bind_parameters(&mut stmt, &values, true).unwrap();
        assert!(stmt.to_string().contains("BETWEEN 10 AND 100"));
    }

    #[test]
    fn binds_placeholder_nested_in_function_args() {
        let mut stmt =
            parse_one("SELECT COALESCE(name, :fallback) FROM users", Dialect::Generic).unwrap();
        let mut values = HashMap::new();
        values.insert("fallback".to_string(), Scalar::String("unknown".into()));
        bind_parameters(&mut stmt, &values, true).unwrap();
        assert!(stmt.to_string().contains("COALESCE(name, 'unknown')"));
    }

    #[test]
    fn missing_placeholder_nested_in_case_errors() {
        let mut stmt = parse_one(
            "SELECT CASE WHEN status = 'a' THEN :a ELSE :b END FROM users",
            Dialect::Generic,
        )
        .unwrap();
        let mut values = HashMap::new();
        values.insert("a".to_string(), Scalar::String("x".into()));
        let err = bind_parameters(&mut stmt, &values, true).unwrap_err();
        assert_eq!(err, TransformError::MissingParameter("b".to_string()));
    }

    #[test]
    fn binds_placeholder_nested_in_subquery() {
        let mut stmt = parse_one(
            "SELECT id FROM users WHERE id IN (SELECT user_id FROM orders WHERE status = :status)",
            Dialect::Generic,
        )
        .unwrap();
        let mut values = HashMap::new();
        values.insert("status".to_string(), Scalar::String("paid".into()));
        bind_parameters(&mut stmt, &values, true).unwrap();
        assert!(stmt.to_string().contains("status = 'paid'"));
    }
}
