use sqlparser::ast::{Cte, Query, SetExpr, Statement};

/// Returns every `Cte` reachable from a statement, in source order, across
/// arbitrarily nested `WITH` clauses (a CTE body may itself carry a `WITH`).
///
/// Collected references borrow from the statement for as long as the
/// caller holds it, which the `Visitor` trait's elided `&Cte` can't express —
/// so this collector walks the tree itself rather than going through it.
#[derive(Default)]
pub struct CteCollector<'a> {
    ctes: Vec<&'a Cte>,
}

impl<'a> CteCollector<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn collect(mut self, statement: &'a Statement) -> Vec<&'a Cte> {
        match statement {
            Statement::Query(query) => self.walk_query(query),
            Statement::Insert(insert) => {
                if let Some(source) = &insert.source {
                    self.walk_query(source);
                }
            }
            _ => {}
        }
        self.ctes
    }

    fn walk_query(&mut self, query: &'a Query) {
        if let Some(with) = &query.with {
            for cte in &with.cte_tables {
                self.ctes.push(cte);
                self.walk_query(&cte.query);
            }
        }
        self.walk_set_expr(&query.body);
    }

    fn walk_set_expr(&mut self, set_expr: &'a SetExpr) {
        match set_expr {
            SetExpr::Select(select) => {
                for table in &select.from {
                    self.walk_table_factor(&table.relation);
                    for join in &table.joins {
                        self.walk_table_factor(&join.relation);
                    }
                }
            }
            SetExpr::Query(query) => self.walk_query(query),
            SetExpr::SetOperation { left, right, .. } => {
                self.walk_set_expr(left);
                self.walk_set_expr(right);
            }
            _ => {}
        }
    }

    fn walk_table_factor(&mut self, table: &'a sqlparser::ast::TableFactor) {
        match table {
            sqlparser::ast::TableFactor::Derived { subquery, .. } => self.walk_query(subquery),
            sqlparser::ast::TableFactor::NestedJoin {
                table_with_joins, ..
            } => {
                self.walk_table_factor(&table_with_joins.relation);
                for join in &table_with_joins.joins {
                    self.walk_table_factor(&join.relation);
                }
            }
            _ => {}
        }
    }
}
