use super::{object_name, reorder_projection, select_list_names, top_level_select};
use crate::error::TransformError;
use sqlparser::ast::{Ident, Insert, Query, Statement, TableObject};

/// Builds `INSERT INTO target (columns…) <select>` from a SELECT.
///
/// When `columns` is omitted, the column list is inferred from the select
/// list's own names — a wildcard or an unnamed complex expression makes
/// inference impossible (`ColumnsNotInferrable`). When `columns` is given,
/// every name must be present in the select list; the select list is
/// rewritten to match the declared order.
pub fn to_insert(
    mut query: Query,
    target: &str,
    columns: Option<Vec<String>>,
) -> Result<Statement, TransformError> {
    let select_names = select_list_names(top_level_select(&query)?)?;

    let declared = match columns {
        Some(cols) => {
            for col in &cols {
                if !select_names.contains(col) {
                    return Err(TransformError::ColumnNotFound(col.clone()));
                }
            }
            cols
        }
        None => select_names,
    };

    if let sqlparser::ast::SetExpr::Select(select) = query.body.as_mut() {
        reorder_projection(select, &declared)?;
    }

    Ok(Statement::Insert(Insert {
        or: None,
        ignore: false,
        into: true,
        table: TableObject::TableName(object_name(target)),
        table_alias: None,
        columns: declared.iter().map(|c| Ident::new(c.clone())).collect(),
        overwrite: false,
        source: Some(Box::new(query)),
        assignments: Vec::new(),
        partitioned: None,
        after_columns: Vec::new(),
        has_table_keyword: false,
        on: None,
        returning: None,
        replace_into: false,
        priority: None,
        insert_alias: None,
        settings: None,
        format_clause: None,
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
    fn infers_columns_from_select_list() {
        let q = query_of("SELECT id, name FROM staging");
        let stmt = to_insert(q, "users", None).unwrap();
        let sql = stmt.to_string();
        assert!(sql.starts_with("INSERT INTO users (id, name)"));
    }

    #[test]
    fn explicit_columns_reorder_select_list() {
        let q = query_of("SELECT id, name FROM staging");
        let stmt = to_insert(q, "users", Some(vec!["name".into(), "id".into()])).unwrap();
        let sql = stmt.to_string();
        assert!(sql.contains("(name, id)"));
        assert!(sql.contains("SELECT name, id"));
    }

    #[test]
    fn wildcard_is_not_inferrable() {
        let q = query_of("SELECT * FROM staging");
        let err = to_insert(q, "users", None).unwrap_err();
        assert_eq!(err, TransformError::ColumnsNotInferrable);
    }

    #[test]
    fn explicit_unknown_column_errors() {
        let q = query_of("SELECT id, name FROM staging");
        let err = to_insert(q, "users", Some(vec!["ghost".into()])).unwrap_err();
        assert_eq!(err, TransformError::ColumnNotFound("ghost".to_string()));
    }
}
