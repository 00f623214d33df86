use super::{conjoin_eq, derived_table_with_joins, qualified_expr, select_list_names, top_level_select};
use crate::error::TransformError;
use sqlparser::ast::{
    Assignment, AssignmentTarget, Ident, MergeAction, MergeClause, MergeClauseKind,
    MergeInsertExpr, MergeInsertKind, Query, Statement, TableFactor,
};

/// The action a `WHEN MATCHED` branch should take. `DoNothing` omits the
/// clause entirely rather than emitting a no-op `WHEN` arm.
#[derive(Debug, Clone)]
pub enum MatchedOutcome {
    Update { columns: Option<Vec<String>> },
    Delete,
    DoNothing,
}

/// The action a `WHEN NOT MATCHED [BY TARGET]` / `WHEN NOT MATCHED BY
/// SOURCE` branch should take.
#[derive(Debug, Clone)]
pub enum MergeOutcome {
    Insert { columns: Option<Vec<String>> },
    Delete,
    DoNothing,
}

/// The three branches of a `MERGE`, keyed by which side failed to match.
#[derive(Debug, Clone)]
pub struct MergeActions {
    pub matched: MatchedOutcome,
    pub not_matched: MergeOutcome,
    pub not_matched_by_source: Option<MergeOutcome>,
}

/// Builds `MERGE INTO target USING (select) AS src ON target.pk = src.pk …
/// WHEN MATCHED THEN … WHEN NOT MATCHED THEN …`.
pub fn to_merge(
    query: Query,
    target: &str,
    source_alias: &str,
    primary_keys: &[String],
    actions: &MergeActions,
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
    let updatable_default: Vec<String> = select_names
        .iter()
        .filter(|c| !primary_keys.contains(c))
        .cloned()
        .collect();

    let on = conjoin_eq(target, source_alias, primary_keys)?;
    let source_table = derived_table_with_joins(query, source_alias).relation;
    let TableFactor::Derived { .. } = &source_table else {
        return Err(TransformError::Internal("expected derived table".into()));
    };

    let mut clauses = Vec::new();

    match &actions.matched {
        MatchedOutcome::Update { columns } => {
            let cols = match columns {
                Some(cols) => {
                    for c in cols {
                        if !select_names.contains(c) {
                            return Err(TransformError::ColumnNotFound(c.clone()));
                        }
                    }
                    cols.clone()
                }
                None => updatable_default.clone(),
            };
            if cols.is_empty() {
                return Err(TransformError::NoUpdatableColumns);
            }
            let assignments = cols
                .iter()
                .map(|col| Assignment {
                    target: AssignmentTarget::ColumnName(super::object_name(col)),
                    value: qualified_expr(source_alias, col),
                })
                .collect();
            clauses.push(MergeClause {
                clause_kind: MergeClauseKind::Matched,
                predicate: None,
                action: MergeAction::Update { assignments },
            });
        }
        MatchedOutcome::Delete => clauses.push(MergeClause {
            clause_kind: MergeClauseKind::Matched,
            predicate: None,
            action: MergeAction::Delete,
        }),
        MatchedOutcome::DoNothing => {}
    }

    push_not_matched_clause(
        &mut clauses,
        MergeClauseKind::NotMatched,
        &actions.not_matched,
        &select_names,
        source_alias,
    )?;

    if let Some(outcome) = &actions.not_matched_by_source {
        push_not_matched_clause(
            &mut clauses,
            MergeClauseKind::NotMatchedBySource,
            outcome,
            &select_names,
            source_alias,
        )?;
    }

    Ok(Statement::Merge {
        into: true,
        table: super::table_with_joins(target).relation,
        source: source_table,
        on: Box::new(on),
        clauses,
        output: None,
    })
}

fn push_not_matched_clause(
    clauses: &mut Vec<MergeClause>,
    kind: MergeClauseKind,
    outcome: &MergeOutcome,
    select_names: &[String],
    source_alias: &str,
) -> Result<(), TransformError> {
    match outcome {
        MergeOutcome::Insert { columns } => {
            let cols = match columns {
                Some(cols) => {
                    for c in cols {
                        if !select_names.contains(c) {
                            return Err(TransformError::ColumnNotFound(c.clone()));
                        }
                    }
                    cols.clone()
                }
                None => select_names.to_vec(),
            };
            let values = cols
                .iter()
                .map(|c| qualified_expr(source_alias, c))
                .collect();
            clauses.push(MergeClause {
                clause_kind: kind,
                predicate: None,
                action: MergeAction::Insert(MergeInsertExpr {
                    columns: cols.iter().map(|c| Ident::new(c.clone())).collect(),
                    kind: MergeInsertKind::Values(sqlparser::ast::Values {
                        explicit_row: false,
                        rows: vec![values],
                    }),
                }),
            });
        }
        MergeOutcome::Delete => clauses.push(MergeClause {
            clause_kind: kind,
            predicate: None,
            action: MergeAction::Delete,
        }),
        MergeOutcome::DoNothing => {}
    }
    Ok(())
}
