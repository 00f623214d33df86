use super::condition::{ConditionDescriptor, FilterOperator, OperatorTerm, Scalar};
use crate::collectors::{SelectValueCollector, TableSourceCollector};
use crate::error::TransformError;
use sqlparser::ast::{BinaryOperator, Expr, Ident, Query, Select, SetExpr, Value};
use std::collections::HashMap;

/// Options controlling how `inject_filter` resolves and validates columns.
///
/// Normalizes the teacher-flagged `resolver`-or-`options` ambiguity (see
/// DESIGN.md) into one record with the resolver as an optional field.
#[derive(Default)]
pub struct FilterOptions<'r> {
    pub allow_all_undefined: bool,
    pub skip_column_validation: bool,
    pub case_insensitive: bool,
    pub resolver: Option<&'r dyn Fn(&str) -> Vec<String>>,
}

/// Injects `conditions` (state key → descriptor) into `query`'s WHERE
/// clause(s), returning the deterministic parameter names generated along
/// with the scalar value each should eventually bind to.
pub fn inject_filter(
    query: &mut Query,
    conditions: &HashMap<String, ConditionDescriptor>,
    options: &FilterOptions,
) -> Result<HashMap<String, Scalar>, TransformError> {
    if conditions.is_empty() && !options.allow_all_undefined {
        return Err(TransformError::AllParametersUndefined);
    }

    let mut bindings = HashMap::new();
    for (key, descriptor) in conditions {
        let column = descriptor.explicit_column().unwrap_or(key);
        let (predicate, params) = build_predicate(key, column, descriptor);
        bindings.extend(params);
        inject_into_body(&mut query.body, column, predicate, options)?;
    }
    Ok(bindings)
}

fn inject_into_body(
    body: &mut SetExpr,
    column: &str,
    predicate: Expr,
    options: &FilterOptions,
) -> Result<(), TransformError> {
    match body {
        SetExpr::Select(select) => inject_into_select(select, column, predicate, options),
        SetExpr::Query(q) => inject_into_body(&mut q.body, column, predicate, options),
        SetExpr::SetOperation { left, right, .. } => {
            inject_into_body(left, column, predicate.clone(), options)?;
            inject_into_body(right, column, predicate, options)
        }
        _ => Err(TransformError::ColumnNotFound(column.to_string())),
    }
}

fn inject_into_select(
    select: &mut Select,
    column: &str,
    predicate: Expr,
    options: &FilterOptions,
) -> Result<(), TransformError> {
    if !options.skip_column_validation && !column_is_known(select, column, options) {
        return Err(TransformError::ColumnNotFound(column.to_string()));
    }
    select.selection = Some(match select.selection.take() {
        Some(existing) => Expr::BinaryOp {
            left: Box::new(existing),
            op: BinaryOperator::And,
            right: Box::new(predicate),
        },
        None => predicate,
    });
    Ok(())
}

fn column_is_known(select: &Select, column: &str, options: &FilterOptions) -> bool {
    let target = simple_name(column);
    let matches = |candidate: &str| {
        if options.case_insensitive {
            candidate.eq_ignore_ascii_case(&target)
        } else {
            candidate == target
        }
    };

    let dummy_query = wrap_select_as_query(select);
    let projection_names = SelectValueCollector::new().collect(&dummy_query);
    if projection_names.iter().any(|(name, _)| matches(name)) {
        return true;
    }

    if let Some(resolver) = options.resolver {
        let tables = TableSourceCollector::new(false).collect(&dummy_query);
        for table in tables {
            if resolver(&table).iter().any(|c| matches(c)) {
                return true;
            }
        }
    }
    false
}

fn wrap_select_as_query(select: &Select) -> Query {
    Query {
        with: None,
        body: Box::new(SetExpr::Select(Box::new(select.clone()))),
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

fn simple_name(column: &str) -> String {
    column.rsplit('.').next().unwrap_or(column).to_string()
}

/// Builds the predicate expression for one descriptor, plus the bind-value
/// map it expects for every placeholder it introduced.
fn build_predicate(
    base_name: &str,
    column: &str,
    descriptor: &ConditionDescriptor,
) -> (Expr, HashMap<String, Scalar>) {
    match descriptor {
        ConditionDescriptor::Value(Scalar::Null) => (is_null(column), HashMap::new()),
        ConditionDescriptor::Value(scalar) => {
            let mut bindings = HashMap::new();
            bindings.insert(base_name.to_string(), scalar.clone());
            (eq_placeholder(column, base_name), bindings)
        }
        ConditionDescriptor::Array(scalars) => {
            let mut bindings = HashMap::new();
            let mut names = Vec::new();
            for (i, scalar) in scalars.iter().enumerate() {
                let name = format!("{base_name}_in_{i}");
                bindings.insert(name.clone(), scalar.clone());
                names.push(name);
            }
            (in_list(column, &names), bindings)
        }
        ConditionDescriptor::Operator(record) => {
            let mut bindings = HashMap::new();
            let mut exprs = Vec::new();
            for term in &record.terms {
                let (expr, params) = build_term(base_name, column, term, 0);
                bindings.extend(params);
                exprs.push(expr);
            }
            (conjoin(exprs), bindings)
        }
    }
}

fn build_term(
    base_name: &str,
    column: &str,
    term: &OperatorTerm,
    nest_index: usize,
) -> (Expr, HashMap<String, Scalar>) {
    match term {
        OperatorTerm::Cmp(op, scalar) => {
            let name = format!("{base_name}{}", op.name_suffix());
            let mut bindings = HashMap::new();
            bindings.insert(name.clone(), scalar.clone());
            let expr = match op {
                FilterOperator::Eq => eq_placeholder(column, &name),
                FilterOperator::Ne => cmp(column, BinaryOperator::NotEq, &name),
                FilterOperator::Lt => cmp(column, BinaryOperator::Lt, &name),
                FilterOperator::Le => cmp(column, BinaryOperator::LtEq, &name),
                FilterOperator::Gt => cmp(column, BinaryOperator::Gt, &name),
                FilterOperator::Ge => cmp(column, BinaryOperator::GtEq, &name),
                FilterOperator::Min => cmp(column, BinaryOperator::GtEq, &name),
                FilterOperator::Max => cmp(column, BinaryOperator::LtEq, &name),
                FilterOperator::Like => like(column, &name, false),
                FilterOperator::ILike => like(column, &name, true),
                FilterOperator::Any => any_eq(column, &name),
                FilterOperator::In => in_list(column, &[name.clone()]),
            };
            (expr, bindings)
        }
        OperatorTerm::In(scalars) => {
            let mut bindings = HashMap::new();
            let mut names = Vec::new();
            for (i, scalar) in scalars.iter().enumerate() {
                let name = format!("{base_name}_in_{i}");
                bindings.insert(name.clone(), scalar.clone());
                names.push(name);
            }
            (in_list(column, &names), bindings)
        }
        OperatorTerm::Or(subs) => {
            let mut bindings = HashMap::new();
            let mut exprs = Vec::new();
            for (i, sub) in subs.iter().enumerate() {
                let sub_column = sub.explicit_column().unwrap_or(column);
                let sub_base = format!("{base_name}_or_{}_{}", nest_index + i, op_tag(sub));
                let (expr, params) = build_predicate(&sub_base, sub_column, sub);
                bindings.extend(params);
                exprs.push(expr);
            }
            (
                Expr::Nested(Box::new(disjoin(exprs))),
                bindings,
            )
        }
        OperatorTerm::And(subs) => {
            let mut bindings = HashMap::new();
            let mut exprs = Vec::new();
            for (i, sub) in subs.iter().enumerate() {
                let sub_column = sub.explicit_column().unwrap_or(column);
                let sub_base = format!("{base_name}_and_{}_{}", nest_index + i, op_tag(sub));
                let (expr, params) = build_predicate(&sub_base, sub_column, sub);
                bindings.extend(params);
                exprs.push(expr);
            }
            (conjoin(exprs), bindings)
        }
    }
}

fn op_tag(descriptor: &ConditionDescriptor) -> &'static str {
    match descriptor {
        ConditionDescriptor::Value(Scalar::Null) => "isnull",
        ConditionDescriptor::Value(_) => "eq",
        ConditionDescriptor::Array(_) => "in",
        ConditionDescriptor::Operator(_) => "op",
    }
}

fn conjoin(exprs: Vec<Expr>) -> Expr {
    combine(exprs, BinaryOperator::And)
}

fn disjoin(exprs: Vec<Expr>) -> Expr {
    combine(exprs, BinaryOperator::Or)
}

fn combine(mut exprs: Vec<Expr>, op: BinaryOperator) -> Expr {
    let mut iter = exprs.drain(..);
    let first = iter.next().expect("at least one condition");
    iter.fold(first, |acc, next| Expr::BinaryOp {
        left: Box::new(acc),
        op: op.clone(),
        right: Box::new(next),
    })
}

fn column_expr(column: &str) -> Expr {
    let parts: Vec<Ident> = column.split('.').map(Ident::new).collect();
    if parts.len() == 1 {
        Expr::Identifier(parts.into_iter().next().unwrap())
    } else {
        Expr::CompoundIdentifier(parts)
    }
}

fn placeholder_expr(name: &str) -> Expr {
    Expr::Value(Value::Placeholder(format!(":{name}")).with_empty_span())
}

fn eq_placeholder(column: &str, param: &str) -> Expr {
    cmp(column, BinaryOperator::Eq, param)
}

fn cmp(column: &str, op: BinaryOperator, param: &str) -> Expr {
    Expr::BinaryOp {
        left: Box::new(column_expr(column)),
        op,
        right: Box::new(placeholder_expr(param)),
    }
}

fn like(column: &str, param: &str, case_insensitive: bool) -> Expr {
    let expr = Box::new(column_expr(column));
    let pattern = Box::new(placeholder_expr(param));
    if case_insensitive {
        Expr::ILike {
            negated: false,
            any: false,
            expr,
            pattern,
            escape_char: None,
        }
    } else {
        Expr::Like {
            negated: false,
            any: false,
            expr,
            pattern,
            escape_char: None,
        }
    }
}

fn any_eq(column: &str, param: &str) -> Expr {
    Expr::AnyOp {
        left: Box::new(column_expr(column)),
        compare_op: BinaryOperator::Eq,
        right: Box::new(placeholder_expr(param)),
        is_some: false,
    }
}

fn in_list(column: &str, param_names: &[String]) -> Expr {
    Expr::InList {
        expr: Box::new(column_expr(column)),
        list: param_names.iter().map(|n| placeholder_expr(n)).collect(),
        negated: false,
    }
}

fn is_null(column: &str) -> Expr {
    Expr::IsNull(Box::new(column_expr(column)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_one;
    use crate::types::Dialect;
    use sqlparser::ast::Statement;
    use serde_json::json;

    fn query_of(sql: &str) -> Query {
        match parse_one(sql, Dialect::Generic).unwrap() {
            Statement::Query(q) => *q,
            _ => panic!("expected a query"),
        }
    }

    #[test]
    fn simple_value_injects_equality() {
        let mut q = query_of("SELECT id, name, status FROM users WHERE active = true");
        let mut conditions = HashMap::new();
        conditions.insert(
            "status".to_string(),
            ConditionDescriptor::from_json("status", &json!("premium")).unwrap(),
        );
        let options = FilterOptions::default();
        let bindings = inject_filter(&mut q, &conditions, &options).unwrap();
        assert_eq!(bindings.get("status"), Some(&Scalar::String("premium".into())));
        assert!(q.to_string().contains("status = :status"));
    }

    #[test]
    fn min_max_produces_range() {
        let mut q = query_of("SELECT id, price FROM products");
        let mut conditions = HashMap::new();
        conditions.insert(
            "price".to_string(),
            ConditionDescriptor::from_json("price", &json!({"min": 100, "max": 500})).unwrap(),
        );
        let options = FilterOptions::default();
        let bindings = inject_filter(&mut q, &conditions, &options).unwrap();
        assert_eq!(bindings.get("price_min"), Some(&Scalar::Number(100.0)));
        assert_eq!(bindings.get("price_max"), Some(&Scalar::Number(500.0)));
        let sql = q.to_string();
        assert!(sql.contains("price >= :price_min"));
        assert!(sql.contains("price <= :price_max"));
    }

    #[test]
    fn array_descriptor_produces_in_list() {
        let mut q = query_of("SELECT id FROM users");
        let mut conditions = HashMap::new();
        conditions.insert(
            "id".to_string(),
            ConditionDescriptor::from_json("id", &json!([1, 2, 3])).unwrap(),
        );
        inject_filter(&mut q, &conditions, &FilterOptions::default()).unwrap();
        assert!(q.to_string().contains("id IN (:id_in_0, :id_in_1, :id_in_2)"));
    }

    #[test]
    fn empty_conditions_without_allow_all_fails() {
        let mut q = query_of("SELECT id FROM users");
        let err = inject_filter(&mut q, &HashMap::new(), &FilterOptions::default()).unwrap_err();
        assert_eq!(err, TransformError::AllParametersUndefined);
    }

    #[test]
    fn unknown_column_without_skip_validation_fails() {
        let mut q = query_of("SELECT id FROM users");
        let mut conditions = HashMap::new();
        conditions.insert(
            "ghost".to_string(),
            ConditionDescriptor::from_json("ghost", &json!(1)).unwrap(),
        );
        let err = inject_filter(&mut q, &conditions, &FilterOptions::default()).unwrap_err();
        assert_eq!(err, TransformError::ColumnNotFound("ghost".to_string()));
    }

    #[test]
    fn set_operation_branch_missing_column_is_rejected() {
        let mut q = query_of("SELECT id, status FROM a UNION SELECT id FROM b");
        let mut conditions = HashMap::new();
        conditions.insert(
            "status".to_string(),
            ConditionDescriptor::from_json("status", &json!("active")).unwrap(),
        );
        let err = inject_filter(&mut q, &conditions, &FilterOptions::default()).unwrap_err();
        assert_eq!(err, TransformError::ColumnNotFound("status".to_string()));
    }

    #[test]
    fn unknown_operator_key_is_rejected() {
        let err = ConditionDescriptor::from_json("status", &json!({"bogus": 1})).unwrap_err();
        assert_eq!(
            err,
            TransformError::UnsupportedOperator {
                op: "bogus".to_string(),
                name: "status".to_string(),
            }
        );
    }
}
