use super::{conjoin_eq, derived_table_with_joins, select_list_names, top_level_select};
use crate::error::TransformError;
use sqlparser::ast::{Delete, Expr, FromTable, Query, Select, SelectItem, SetExpr, Statement, Value};

/// Builds `DELETE FROM target WHERE EXISTS (SELECT 1 FROM (select) AS src
/// WHERE target.pk = src.pk AND …)`.
///
/// Correlated `EXISTS` is used instead of `USING`/`FROM` so the statement
/// stays portable across dialects that don't support a DELETE…USING form.
pub fn to_delete(
    query: Query,
    target: &str,
    source_alias: &str,
    primary_keys: &[String],
) -> Result<Statement, TransformError> {
    if primary_keys.is_empty() {
        return Err(TransformError::ColumnsNotInferrable);
    }
    let select_names = select_list_names(top_level_select(&query)?)?;
    for pk in primary_keys {
        if !select_names.contains(pk) {
            return Err(TransformError::MissingPrimaryKey(pk.clone()));
        }
    }

    let correlation = conjoin_eq(target, source_alias, primary_keys)?;
    let exists_select = Select {
        select_token: sqlparser::ast::helpers::attached_token::AttachedToken::empty(),
        distinct: None,
        top: None,
        top_before_distinct: false,
        projection: vec![SelectItem::UnnamedExpr(Expr::value(Value::Number(
            "1".to_string(),
            false,
        )))],
        exclude: None,
        into: None,
        from: vec![derived_table_with_joins(query, source_alias)],
        lateral_views: Vec::new(),
        prewhere: None,
        selection: Some(correlation),
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
        flavor: sqlparser::ast::SelectFlavor::Standard,
    };
    let exists_query = Query {
        with: None,
        body: Box::new(SetExpr::Select(Box::new(exists_select))),
        order_by: None,
        limit_clause: None,
        fetch: None,
        locks: Vec::new(),
        for_clause: None,
        settings: None,
        format_clause: None,
        pipe_operators: Vec::new(),
    };

    Ok(Statement::Delete(Delete {
        tables: Vec::new(),
        from: FromTable::WithFromKeyword(vec![super::table_with_joins(target)]),
        using: None,
        selection: Some(Expr::Exists {
            subquery: Box::new(exists_query),
            negated: false,
        }),
        returning: None,
        order_by: Vec::new(),
        limit: None,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_one;
    use crate::types::Dialect;

    fn query_of(sql: &str) -> Query {
        match parse_one(sql, Dialect::Generic).unwrap() {
            Statement::Query(q) => *q,
            _ => panic!("expected a query"),
        }
    }

    #[test]
    fn builds_correlated_exists_delete() {
        let q = query_of("SELECT id FROM stale_rows");
        let stmt = to_delete(q, "users", "src", &["id".to_string()]).unwrap();
        let sql = stmt.to_string();
        assert!(sql.starts_with("DELETE FROM users"));
        assert!(sql.contains("WHERE EXISTS (SELECT 1 FROM (SELECT id FROM stale_rows) AS src WHERE users.id = src.id)"));
    }

    #[test]
    fn missing_primary_key_errors() {
        let q = query_of("SELECT name FROM stale_rows");
        let err = to_delete(q, "users", "src", &["id".to_string()]).unwrap_err();
        assert_eq!(err, TransformError::MissingPrimaryKey("id".to_string()));
    }
}
