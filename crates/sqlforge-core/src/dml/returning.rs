use super::{derived_table_with_joins, simple_table_alias, table_with_joins};
use crate::error::TransformError;
use sqlparser::ast::helpers::attached_token::AttachedToken;
use sqlparser::ast::{
    Cte, CteAsMaterialized, Expr, Function, FunctionArg, FunctionArgExpr,
    FunctionArgumentList, FunctionArguments, GroupByExpr, Ident, ObjectName, ObjectNamePart,
    Query, Select, SelectFlavor, SelectItem, SelectItemQualifiedWildcardKind, SetExpr, Statement,
    TableAlias, TableFactor, TableObject, TableWithJoins, Values, With,
};
use std::collections::HashMap;

/// Whether a table referenced by the mutation but not covered by a supplied
/// fixture should fail the conversion or pass through untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixturePolicy {
    Error,
    Ignore,
}

/// An in-memory table supplied by the caller, injected as a leading CTE
/// shadowing the real table of the same name.
#[derive(Debug, Clone)]
pub struct Fixture {
    pub name: String,
    pub query: Query,
}

pub struct ReturningOptions<'r> {
    pub resolver: Option<&'r dyn Fn(&str) -> Vec<String>>,
    pub fixtures: Vec<Fixture>,
    pub fixture_policy: FixturePolicy,
}

impl<'r> Default for ReturningOptions<'r> {
    fn default() -> Self {
        Self {
            resolver: None,
            fixtures: Vec::new(),
            fixture_policy: FixturePolicy::Ignore,
        }
    }
}

/// Converts a mutation statement (`INSERT`/`UPDATE`/`DELETE`) into a SELECT
/// mirroring its `RETURNING` clause, or `SELECT count(*) AS count` when
/// `RETURNING` is absent.
pub fn to_select_returning(
    statement: &Statement,
    options: &ReturningOptions,
) -> Result<Query, TransformError> {
    let (target, returning, from, selection, column_values) = match statement {
        Statement::Insert(insert) => {
            let target = table_object_name(&insert.table)?;
            let single_row_values = single_row_values(&insert.source);
            let column_values = single_row_values.filter(|_| !insert.columns.is_empty()).map(
                |row| {
                    insert
                        .columns
                        .iter()
                        .zip(row)
                        .map(|(ident, expr)| (ident.value.clone(), expr.clone()))
                        .collect::<HashMap<_, _>>()
                },
            );
            let from = match (&insert.source, &column_values) {
                (Some(_), Some(_)) => table_with_joins(&target),
                (Some(source), None) if !insert.columns.is_empty() => derived_table_with_joins_aliased(
                    (**source).clone(),
                    &target,
                    &insert.columns,
                ),
                (Some(source), None) => derived_table_with_joins((**source).clone(), &target),
                (None, _) => table_with_joins(&target),
            };
            (target, insert.returning.clone(), from, None, column_values)
        }
        Statement::Update {
            table,
            returning,
            selection,
            ..
        } => {
            let target = table_factor_name(&table.relation)?;
            (target, returning.clone(), table.clone(), selection.clone(), None)
        }
        Statement::Delete(delete) => {
            let target = delete
                .tables
                .first()
                .map(|n| n.to_string())
                .or_else(|| match &delete.from {
                    sqlparser::ast::FromTable::WithFromKeyword(tables)
                    | sqlparser::ast::FromTable::WithoutKeyword(tables) => {
                        tables.first().and_then(|t| table_factor_name(&t.relation).ok())
                    }
                })
                .ok_or_else(|| TransformError::Internal("DELETE has no target table".into()))?;
            let from = match &delete.from {
                sqlparser::ast::FromTable::WithFromKeyword(tables)
                | sqlparser::ast::FromTable::WithoutKeyword(tables) => tables
                    .first()
                    .cloned()
                    .unwrap_or_else(|| table_with_joins(&target)),
            };
            (
                target,
                delete.returning.clone(),
                from,
                delete.selection.clone(),
                None,
            )
        }
        _ => {
            return Err(TransformError::Internal(
                "only INSERT/UPDATE/DELETE can be converted to a RETURNING select".into(),
            ))
        }
    };

    let mut projection = match returning {
        Some(items) => expand_returning(items, &target, options)?,
        None => vec![SelectItem::ExprWithAlias {
            expr: Expr::Function(count_star()),
            alias: Ident::new("count"),
        }],
    };

    if let Some(column_values) = &column_values {
        projection = projection
            .into_iter()
            .map(|item| substitute_returning_item(item, column_values))
            .collect();
    }
    let from = if column_values.is_some() { Vec::new() } else { vec![from] };

    let select = Select {
        select_token: AttachedToken::empty(),
        distinct: None,
        top: None,
        top_before_distinct: false,
        projection,
        exclude: None,
        into: None,
        from,
        lateral_views: Vec::new(),
        prewhere: None,
        selection,
        group_by: GroupByExpr::Expressions(Vec::new(), Vec::new()),
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
    };

    let mut query = Query {
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
    };

    apply_fixtures(&mut query, &target, options)?;
    Ok(query)
}

fn expand_returning(
    items: Vec<SelectItem>,
    target: &str,
    options: &ReturningOptions,
) -> Result<Vec<SelectItem>, TransformError> {
    let mut out = Vec::new();
    for item in items {
        match item {
            SelectItem::Wildcard(_) => {
                let Some(resolver) = options.resolver else {
                    return Err(TransformError::ColumnUnresolved(target.to_string()));
                };
                for column in resolver(target) {
                    out.push(SelectItem::UnnamedExpr(Expr::Identifier(Ident::new(column))));
                }
            }
            SelectItem::QualifiedWildcard(SelectItemQualifiedWildcardKind::ObjectName(name), _) => {
                let table = name.to_string();
                let Some(resolver) = options.resolver else {
                    return Err(TransformError::ColumnUnresolved(table));
                };
                for column in resolver(&table) {
                    out.push(SelectItem::UnnamedExpr(Expr::Identifier(Ident::new(column))));
                }
            }
            other => out.push(other),
        }
    }
    Ok(out)
}

fn apply_fixtures(
    query: &mut Query,
    target: &str,
    options: &ReturningOptions,
) -> Result<(), TransformError> {
    let referenced = [target.to_string()];
    let mut ctes = Vec::new();
    for name in &referenced {
        match options.fixtures.iter().find(|f| &f.name == name) {
            Some(fixture) => ctes.push(Cte {
                alias: TableAlias {
                    name: Ident::new(fixture.name.clone()),
                    columns: Vec::new(),
                },
                query: Box::new(fixture.query.clone()),
                from: None,
                materialized: None::<CteAsMaterialized>,
                closing_paren_token: AttachedToken::empty(),
            }),
            None if options.fixture_policy == FixturePolicy::Error => {
                return Err(TransformError::MissingFixture(name.clone()))
            }
            None => {}
        }
    }
    if !ctes.is_empty() {
        query.with = Some(With {
            with_token: AttachedToken::empty(),
            recursive: false,
            cte_tables: ctes,
        });
    }
    Ok(())
}

/// If `source` is exactly a single-row `VALUES (...)`, returns that row's
/// expressions so they can be substituted directly into `RETURNING`.
fn single_row_values(source: &Option<Box<Query>>) -> Option<Vec<Expr>> {
    let query = source.as_ref()?;
    if query.with.is_some() {
        return None;
    }
    let SetExpr::Values(Values { rows, .. }) = query.body.as_ref() else {
        return None;
    };
    match rows.as_slice() {
        [row] => Some(row.clone()),
        _ => None,
    }
}

/// Like [`derived_table_with_joins`], but names the derived table's columns
/// after `columns` so identifiers in `RETURNING` resolve against it instead
/// of dangling against an anonymous `VALUES` source.
fn derived_table_with_joins_aliased(query: Query, alias: &str, columns: &[Ident]) -> TableWithJoins {
    let mut table_alias = simple_table_alias(alias);
    table_alias.columns = columns
        .iter()
        .cloned()
        .map(|name| sqlparser::ast::TableAliasColumnDef { name, data_type: None })
        .collect();
    TableWithJoins {
        relation: TableFactor::Derived {
            lateral: false,
            subquery: Box::new(query),
            alias: Some(table_alias),
        },
        joins: Vec::new(),
    }
}

/// Replaces identifiers in `item` that name an inserted column with that
/// column's literal value from a single-row `VALUES` list.
fn substitute_returning_item(item: SelectItem, values: &HashMap<String, Expr>) -> SelectItem {
    match item {
        SelectItem::UnnamedExpr(Expr::Identifier(ident)) if values.contains_key(&ident.value) => {
            SelectItem::ExprWithAlias {
                expr: values[&ident.value].clone(),
                alias: ident,
            }
        }
        SelectItem::UnnamedExpr(expr) => {
            SelectItem::UnnamedExpr(substitute_columns(expr, values, true))
        }
        SelectItem::ExprWithAlias { expr, alias } => SelectItem::ExprWithAlias {
            expr: substitute_columns(expr, values, true),
            alias,
        },
        other => other,
    }
}

fn substitute_columns(expr: Expr, values: &HashMap<String, Expr>, top_level: bool) -> Expr {
    match expr {
        Expr::Identifier(ident) => match values.get(&ident.value) {
            Some(literal) if top_level => literal.clone(),
            Some(literal) => Expr::Nested(Box::new(literal.clone())),
            None => Expr::Identifier(ident),
        },
        Expr::BinaryOp { left, op, right } => Expr::BinaryOp {
            left: Box::new(substitute_columns(*left, values, false)),
            op,
            right: Box::new(substitute_columns(*right, values, false)),
        },
        Expr::UnaryOp { op, expr } => Expr::UnaryOp {
            op,
            expr: Box::new(substitute_columns(*expr, values, false)),
        },
        Expr::Nested(inner) => Expr::Nested(Box::new(substitute_columns(*inner, values, false))),
        other => other,
    }
}

fn table_object_name(table: &TableObject) -> Result<String, TransformError> {
    match table {
        TableObject::TableName(name) => Ok(name.to_string()),
        _ => Err(TransformError::Internal(
            "expected a plain table name target".into(),
        )),
    }
}

fn table_factor_name(factor: &TableFactor) -> Result<String, TransformError> {
    match factor {
        TableFactor::Table { name, .. } => Ok(name.to_string()),
        _ => Err(TransformError::Internal(
            "expected a plain table reference".into(),
        )),
    }
}

fn count_star() -> Function {
    Function {
        name: ObjectName(vec![ObjectNamePart::Identifier(Ident::new("count"))]),
        uses_odbc_syntax: false,
        parameters: FunctionArguments::None,
        args: FunctionArguments::List(FunctionArgumentList {
            duplicate_treatment: None,
            args: vec![FunctionArg::Unnamed(FunctionArgExpr::Wildcard)],
            clauses: Vec::new(),
        }),
        filter: None,
        null_treatment: None,
        over: None,
        within_group: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_one;
    use crate::types::Dialect;

    #[test]
    fn insert_without_returning_counts_rows() {
        let stmt = parse_one(
            "INSERT INTO users (id, name) SELECT id, name FROM staging",
            Dialect::Generic,
        )
        .unwrap();
        let query = to_select_returning(&stmt, &ReturningOptions::default()).unwrap();
        let sql = query.to_string();
        assert!(sql.contains("count(*) AS count"));
    }

    #[test]
    fn insert_values_returning_materializes_row_into_projection() {
        let stmt = parse_one(
            "INSERT INTO t (x, y) VALUES (1, 2) RETURNING x, y + 1 AS z",
            Dialect::Generic,
        )
        .unwrap();
        let query = to_select_returning(&stmt, &ReturningOptions::default()).unwrap();
        let sql = query.to_string();
        assert_eq!(sql, "SELECT 1 AS x, (2) + 1 AS z");
    }

    #[test]
    fn insert_values_multi_row_aliases_derived_table_columns() {
        let stmt = parse_one(
            "INSERT INTO t (x, y) VALUES (1, 2), (3, 4) RETURNING x, y",
            Dialect::Generic,
        )
        .unwrap();
        let query = to_select_returning(&stmt, &ReturningOptions::default()).unwrap();
        let sql = query.to_string();
        assert!(sql.contains("AS t (x, y)"), "sql was: {sql}");
    }

    #[test]
    fn update_returning_projects_clause() {
        let stmt = parse_one(
            "UPDATE users SET name = 'x' WHERE id = 1 RETURNING id, name",
            Dialect::Generic,
        )
        .unwrap();
        let query = to_select_returning(&stmt, &ReturningOptions::default()).unwrap();
        let sql = query.to_string();
        assert!(sql.starts_with("SELECT id, name FROM users"));
        assert!(sql.contains("WHERE id = 1"));
    }

    #[test]
    fn wildcard_returning_without_resolver_errors() {
        let stmt = parse_one(
            "UPDATE users SET name = 'x' WHERE id = 1 RETURNING *",
            Dialect::Generic,
        )
        .unwrap();
        let err = to_select_returning(&stmt, &ReturningOptions::default()).unwrap_err();
        assert!(matches!(err, TransformError::ColumnUnresolved(_)));
    }

    #[test]
    fn missing_fixture_with_error_policy_fails() {
        let stmt = parse_one(
            "UPDATE users SET name = 'x' WHERE id = 1 RETURNING id",
            Dialect::Generic,
        )
        .unwrap();
        let options = ReturningOptions {
            resolver: None,
            fixtures: Vec::new(),
            fixture_policy: FixturePolicy::Error,
        };
        let err = to_select_returning(&stmt, &options).unwrap_err();
        assert_eq!(err, TransformError::MissingFixture("users".to_string()));
    }
}
