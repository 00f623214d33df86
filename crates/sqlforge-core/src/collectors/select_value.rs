use super::CteMap;
use sqlparser::ast::{
    Expr, Ident, Query, Select, SelectItem, SelectItemQualifiedWildcardKind, SetExpr, TableFactor,
};
use std::collections::HashSet;

/// Caller-supplied callback resolving a physical table's column names, used
/// to expand a wildcard (`SELECT *`) that reaches a real table rather than
/// a CTE or a subquery.
pub type ColumnResolver<'a> = dyn Fn(&str) -> Vec<String> + 'a;

/// Returns the `(name, value-expression)` pairs a `SELECT` clause exposes,
/// expanding `*` and `alias.*` against the sources in `FROM`/`JOIN`.
pub struct SelectValueCollector<'r> {
    resolver: Option<&'r ColumnResolver<'r>>,
}

impl<'r> SelectValueCollector<'r> {
    pub fn new() -> Self {
        Self { resolver: None }
    }

    pub fn with_resolver(resolver: &'r ColumnResolver<'r>) -> Self {
        Self {
            resolver: Some(resolver),
        }
    }

    pub fn collect<'q>(&self, query: &'q Query) -> Vec<(String, Expr)> {
        self.collect_with_scope(query, CteMap::new())
    }

    fn collect_with_scope<'q>(&self, query: &'q Query, mut ctes: CteMap<'q>) -> Vec<(String, Expr)> {
        if let Some(with) = &query.with {
            for cte in &with.cte_tables {
                ctes.insert(cte.alias.name.value.clone(), cte);
            }
        }
        self.collect_body(&query.body, &ctes)
    }

    fn collect_body<'q>(&self, body: &'q SetExpr, ctes: &CteMap<'q>) -> Vec<(String, Expr)> {
        match body {
            SetExpr::Select(select) => self.collect_select(select, ctes),
            SetExpr::Query(q) => self.collect_with_scope(q, ctes.clone()),
            // A set operation's output shape matches its left branch.
            SetExpr::SetOperation { left, .. } => self.collect_body(left, ctes),
            _ => Vec::new(),
        }
    }

    fn collect_select<'q>(&self, select: &'q Select, ctes: &CteMap<'q>) -> Vec<(String, Expr)> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        for item in &select.projection {
            match item {
                SelectItem::UnnamedExpr(expr) => {
                    let name = infer_output_name(expr);
                    if seen.insert(name.clone()) {
                        out.push((name, expr.clone()));
                    }
                }
                SelectItem::ExprWithAlias { expr, alias } => {
                    if seen.insert(alias.value.clone()) {
                        out.push((alias.value.clone(), expr.clone()));
                    }
                }
                SelectItem::Wildcard(_) => {
                    for table in &select.from {
                        self.expand_source(&table.relation, ctes, None, &mut out, &mut seen);
                        for join in &table.joins {
                            self.expand_source(&join.relation, ctes, None, &mut out, &mut seen);
                        }
                    }
                }
                SelectItem::QualifiedWildcard(
                    SelectItemQualifiedWildcardKind::ObjectName(name),
                    _,
                ) => {
                    let target = name.to_string();
                    for table in &select.from {
                        self.expand_source(
                            &table.relation,
                            ctes,
                            Some(&target),
                            &mut out,
                            &mut seen,
                        );
                        for join in &table.joins {
                            self.expand_source(
                                &join.relation,
                                ctes,
                                Some(&target),
                                &mut out,
                                &mut seen,
                            );
                        }
                    }
                }
                SelectItem::QualifiedWildcard(SelectItemQualifiedWildcardKind::Expr(_), _) => {}
            }
        }
        out
    }

    fn expand_source<'q>(
        &self,
        table: &'q TableFactor,
        ctes: &CteMap<'q>,
        filter_alias: Option<&str>,
        out: &mut Vec<(String, Expr)>,
        seen: &mut HashSet<String>,
    ) {
        match table {
            TableFactor::Table { name, alias, .. } => {
                let simple = name.0.last().map(|p| p.to_string()).unwrap_or_default();
                let source_name = alias
                    .as_ref()
                    .map(|a| a.name.value.clone())
                    .unwrap_or_else(|| simple.clone());
                if filter_alias.is_some_and(|f| f != source_name) {
                    return;
                }
                if let Some(cte) = ctes.get(&simple) {
                    let mut reduced = ctes.clone();
                    reduced.remove(&simple);
                    let columns = self.collect_with_scope(&cte.query, reduced);
                    for (col_name, _) in columns {
                        if seen.insert(col_name.clone()) {
                            out.push((
                                col_name.clone(),
                                qualified(&source_name, &col_name),
                            ));
                        }
                    }
                } else if let Some(resolver) = self.resolver {
                    for col_name in resolver(&simple) {
                        if seen.insert(col_name.clone()) {
                            out.push((
                                col_name.clone(),
                                qualified(&source_name, &col_name),
                            ));
                        }
                    }
                }
            }
            TableFactor::Derived { subquery, alias, .. } => {
                let source_name = alias.as_ref().map(|a| a.name.value.clone()).unwrap_or_default();
                if filter_alias.is_some_and(|f| f != source_name) {
                    return;
                }
                let columns = self.collect_with_scope(subquery, ctes.clone());
                for (col_name, _) in columns {
                    if seen.insert(col_name.clone()) {
                        out.push((col_name.clone(), qualified(&source_name, &col_name)));
                    }
                }
            }
            TableFactor::NestedJoin {
                table_with_joins, ..
            } => {
                self.expand_source(&table_with_joins.relation, ctes, filter_alias, out, seen);
                for join in &table_with_joins.joins {
                    self.expand_source(&join.relation, ctes, filter_alias, out, seen);
                }
            }
            _ => {}
        }
    }
}

impl<'r> Default for SelectValueCollector<'r> {
    fn default() -> Self {
        Self::new()
    }
}

fn qualified(source: &str, column: &str) -> Expr {
    Expr::CompoundIdentifier(vec![Ident::new(source), Ident::new(column)])
}

fn infer_output_name(expr: &Expr) -> String {
    match expr {
        Expr::Identifier(ident) => ident.value.clone(),
        Expr::CompoundIdentifier(parts) => {
            parts.last().map(|p| p.value.clone()).unwrap_or_default()
        }
        other => other.to_string(),
    }
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
    fn named_and_aliased_columns() {
        let q = query_of("SELECT id, name AS full_name FROM users");
        let out = SelectValueCollector::new().collect(&q);
        let names: Vec<_> = out.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["id", "full_name"]);
    }

    #[test]
    fn wildcard_expands_via_resolver() {
        let resolver = |table: &str| -> Vec<String> {
            if table == "users" {
                vec!["id".into(), "name".into()]
            } else {
                vec![]
            }
        };
        let q = query_of("SELECT * FROM users");
        let out = SelectValueCollector::with_resolver(&resolver).collect(&q);
        let names: Vec<_> = out.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["id", "name"]);
    }

    #[test]
    fn wildcard_expands_through_cte() {
        let q = query_of("WITH u AS (SELECT id, name FROM users) SELECT * FROM u");
        let out = SelectValueCollector::new().collect(&q);
        let names: Vec<_> = out.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["id", "name"]);
    }

    #[test]
    fn qualified_wildcard_only_expands_matching_alias() {
        let resolver = |table: &str| -> Vec<String> {
            match table {
                "users" => vec!["id".into()],
                "orders" => vec!["order_id".into()],
                _ => vec![],
            }
        };
        let q = query_of("SELECT u.* FROM users u JOIN orders o ON u.id = o.user_id");
        let out = SelectValueCollector::with_resolver(&resolver).collect(&q);
        let names: Vec<_> = out.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["id"]);
    }

    #[test]
    fn idempotent() {
        let q = query_of("SELECT id, name FROM users");
        let first = SelectValueCollector::new().collect(&q);
        let second = SelectValueCollector::new().collect(&q);
        assert_eq!(first, second);
    }
}
