use super::{
    conjoin_eq, derived_table_with_joins, qualified_expr, reorder_projection, select_list_names,
    table_with_joins, top_level_select,
};
use crate::error::TransformError;
use sqlparser::ast::{Assignment, AssignmentTarget, Query, Statement, UpdateTableFromKind};

/// Builds `UPDATE target SET col = src.col, … FROM (select) AS src WHERE
/// target.pk = src.pk …`.
///
/// `primary_keys` must be non-empty and present in the select list.
/// `updatable_columns` defaults to every non-key select-list column;
/// if that set ends up empty, `NoUpdatableColumns`.
pub fn to_update(
    mut query: Query,
    target: &str,
    source_alias: &str,
    primary_keys: &[String],
    updatable_columns: Option<Vec<String>>,
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

    let updatable: Vec<String> = match updatable_columns {
        Some(cols) => {
            for col in &cols {
                if !select_names.contains(col) {
                    return Err(TransformError::ColumnNotFound(col.clone()));
                }
            }
            cols
        }
        None => select_names
            .iter()
            .filter(|c| !primary_keys.contains(c))
            .cloned()
            .collect(),
    };
    if updatable.is_empty() {
        return Err(TransformError::NoUpdatableColumns);
    }

    let mut ordered = primary_keys.to_vec();
    ordered.extend(updatable.iter().cloned());
    if let sqlparser::ast::SetExpr::Select(select) = query.body.as_mut() {
        reorder_projection(select, &ordered)?;
    }

    let with = query.with.take();
    let assignments = updatable
        .iter()
        .map(|col| Assignment {
            target: AssignmentTarget::ColumnName(super::object_name(col)),
            value: qualified_expr(source_alias, col),
        })
        .collect();
    let selection = conjoin_eq(target, source_alias, primary_keys)?;

    let mut statement = Statement::Update {
        table: table_with_joins(target),
        assignments,
        from: Some(UpdateTableFromKind::AfterSet(vec![derived_table_with_joins(
            query,
            source_alias,
        )])),
        selection: Some(selection),
        returning: None,
        or: None,
        limit: None,
    };
    // The input's WITH clause is lifted onto the UPDATE by attaching it to
    // the derived source subquery — UPDATE has no WITH clause of its own.
    if let Some(with) = with {
        if let Statement::Update {
            from: Some(UpdateTableFromKind::AfterSet(tables)),
            ..
        } = &mut statement
        {
            if let Some(sqlparser::ast::TableFactor::Derived { subquery, .. }) =
                tables.first_mut().map(|t| &mut t.relation)
            {
                subquery.with = Some(with);
            }
        }
    }
    Ok(statement)
}
