use crate::visitor::{walk_expr_children, Visitor};
use sqlparser::ast::{Expr, Query, Statement, TableFactor};
use std::collections::HashSet;

/// Yields every physical `TableFactor::Table` reachable from `FROM`/`JOIN`
/// clauses, deduplicated by fully qualified name.
///
/// When `selectable_only` is true, sources bound to a CTE name visible in
/// the enclosing scope are excluded (the caller wants physical tables only,
/// e.g. for schema resolution); when false, CTE references are reported
/// like any other source.
pub struct TableSourceCollector {
    selectable_only: bool,
}

impl TableSourceCollector {
    pub fn new(selectable_only: bool) -> Self {
        Self { selectable_only }
    }

    pub fn collect(&self, query: &Query) -> Vec<String> {
        let mut walker = Walker {
            selectable_only: self.selectable_only,
            descend_expr_subqueries: false,
            cte_scope: Vec::new(),
            seen: HashSet::new(),
            tables: Vec::new(),
        };
        walker.walk_query(query);
        walker.tables
    }
}

/// Like `TableSourceCollector` with `selectable_only = false`, but always
/// descends into subqueries embedded in expressions (`WHERE ... IN
/// (SELECT ...)`, scalar subqueries) and into DML `USING`/source clauses —
/// the shape the CTE dependency analyzer needs to see every reference.
pub struct CteTableReferenceCollector;

impl CteTableReferenceCollector {
    pub fn new() -> Self {
        Self
    }

    pub fn collect_query(&self, query: &Query) -> Vec<String> {
        let mut walker = Walker {
            selectable_only: false,
            descend_expr_subqueries: true,
            cte_scope: Vec::new(),
            seen: HashSet::new(),
            tables: Vec::new(),
        };
        walker.walk_query(query);
        walker.tables
    }

    pub fn collect_statement(&self, statement: &Statement) -> Vec<String> {
        let mut walker = Walker {
            selectable_only: false,
            descend_expr_subqueries: true,
            cte_scope: Vec::new(),
            seen: HashSet::new(),
            tables: Vec::new(),
        };
        walker.visit_statement(statement);
        walker.tables
    }
}

impl Default for CteTableReferenceCollector {
    fn default() -> Self {
        Self::new()
    }
}

struct Walker {
    selectable_only: bool,
    descend_expr_subqueries: bool,
    cte_scope: Vec<HashSet<String>>,
    seen: HashSet<String>,
    tables: Vec<String>,
}

impl Walker {
    fn walk_query(&mut self, query: &Query) {
        let mut pushed = false;
        if let Some(with) = &query.with {
            let names: HashSet<String> =
                with.cte_tables.iter().map(|c| c.alias.name.value.clone()).collect();
            self.cte_scope.push(names);
            pushed = true;
            for cte in &with.cte_tables {
                self.walk_query(&cte.query);
            }
        }
        self.visit_query(query);
        if pushed {
            self.cte_scope.pop();
        }
    }

    fn is_cte_name(&self, name: &str) -> bool {
        self.cte_scope.iter().any(|scope| scope.contains(name))
    }

    fn push_table(&mut self, name: String) {
        if self.seen.insert(name.clone()) {
            self.tables.push(name);
        }
    }
}

impl Visitor for Walker {
    fn visit_table_factor(&mut self, table: &TableFactor) {
        match table {
            TableFactor::Table { name, .. } => {
                let qualified = name.to_string();
                let simple = name.0.last().map(|p| p.to_string()).unwrap_or_default();
                if self.selectable_only && self.is_cte_name(&simple) {
                    return;
                }
                self.push_table(qualified);
            }
            TableFactor::Derived { subquery, .. } => self.walk_query(subquery),
            TableFactor::NestedJoin {
                table_with_joins, ..
            } => self.visit_table_with_joins(table_with_joins),
            _ => {}
        }
    }

    fn visit_expr(&mut self, expr: &Expr) {
        if !self.descend_expr_subqueries {
            return;
        }
        match expr {
            Expr::Subquery(q) | Expr::Exists { subquery: q, .. } => self.walk_query(q),
            Expr::InSubquery { expr, subquery, .. } => {
                self.visit_expr(expr);
                self.walk_query(subquery);
            }
            _ => walk_expr_children(self, expr),
        }
    }
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
    fn selectable_only_excludes_cte() {
        let q = query_of("WITH x AS (SELECT * FROM real_table) SELECT * FROM x");
        let tables = TableSourceCollector::new(true).collect(&q);
        assert!(tables.contains(&"real_table".to_string()));
        assert!(!tables.contains(&"x".to_string()));
    }

    #[test]
    fn non_selectable_only_includes_cte_reference() {
        let q = query_of("WITH x AS (SELECT * FROM real_table) SELECT * FROM x");
        let tables = TableSourceCollector::new(false).collect(&q);
        assert!(tables.contains(&"x".to_string()));
    }

    #[test]
    fn cte_reference_collector_descends_into_where_subquery() {
        let q = query_of("SELECT * FROM a WHERE id IN (SELECT id FROM b)");
        let tables = CteTableReferenceCollector::new().collect_query(&q);
        assert!(tables.contains(&"a".to_string()));
        assert!(tables.contains(&"b".to_string()));
    }

    #[test]
    fn cte_reference_collector_descends_into_dml_using() {
        let stmt = parse_one(
            "DELETE FROM t USING other WHERE t.id = other.id",
            Dialect::Generic,
        )
        .unwrap();
        let tables = CteTableReferenceCollector::new().collect_statement(&stmt);
        assert!(tables.contains(&"t".to_string()));
        assert!(tables.contains(&"other".to_string()));
    }
}
