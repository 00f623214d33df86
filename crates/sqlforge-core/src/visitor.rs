//! Visitor protocol for AST traversal.
//!
//! Every collector and rewriter in this crate shares one protocol: a trait
//! with default no-op methods per node kind, pre-order dispatch, and a
//! visited-set that guards against the AST's only source of cycles (the
//! same CTE body reachable from more than one `FROM`). A "root call" is the
//! outermost `visit_*` invocation on a fresh visitor; nested calls (a CTE
//! body, a subquery) accumulate into the same visited-set rather than
//! resetting it.
//!
//! Traversal order within a single `SELECT` is FROM, then WHERE, then
//! GROUP BY, then HAVING, then ORDER BY, then the SELECT list itself —
//! SELECT is visited last so column references there can resolve against
//! sources FROM has already established.

use sqlparser::ast::{
    Cte, Delete, Expr, Function, FunctionArg, FunctionArgExpr, FunctionArguments, Insert, Join,
    MergeClause, OrderBy, OrderByKind, Query, Select, SelectItem, SetExpr, Statement, TableFactor,
    TableWithJoins, UpdateTableFromKind, Values,
};

/// Identity used by a visitor's visited-set to detect shared subtrees.
///
/// `sqlparser::ast::Query` does not implement `Hash`, so identity is taken
/// from the node's pointer address for the duration of one traversal; the
/// address is never persisted past the call that produced it.
pub type NodeIdentity = usize;

pub fn identity_of<T>(node: &T) -> NodeIdentity {
    node as *const T as usize
}

/// A visitor over the subset of `sqlparser::ast` this crate rewrites.
///
/// Every method has a default implementation that just walks children in
/// declaration order; override only the nodes you care about. Unknown/
/// unhandled node kinds (e.g. `TableFactor::Pivot`) are a silent no-op —
/// the protocol declares interest in a subset of kinds, it does not require
/// exhaustive coverage.
pub trait Visitor {
    fn visit_statement(&mut self, statement: &Statement) {
        match statement {
            Statement::Query(query) => self.visit_query(query),
            Statement::Insert(insert) => self.visit_insert(insert),
            Statement::Update { .. } => self.visit_update_statement(statement),
            Statement::Delete(delete) => self.visit_delete(delete),
            Statement::Merge {
                table,
                source,
                clauses,
                ..
            } => {
                self.visit_table_factor(table);
                self.visit_table_factor(source);
                for clause in clauses {
                    self.visit_merge_clause(clause);
                }
            }
            _ => {}
        }
    }

    fn visit_insert(&mut self, insert: &Insert) {
        if let Some(source) = &insert.source {
            self.visit_query(source);
        }
    }

    fn visit_update_statement(&mut self, statement: &Statement) {
        let Statement::Update {
            table,
            from,
            selection,
            ..
        } = statement
        else {
            return;
        };
        self.visit_table_with_joins(table);
        if let Some(from) = from {
            let tables = match from {
                UpdateTableFromKind::BeforeSet(ts) | UpdateTableFromKind::AfterSet(ts) => ts,
            };
            for t in tables {
                self.visit_table_with_joins(t);
            }
        }
        if let Some(expr) = selection {
            self.visit_expr(expr);
        }
    }

    fn visit_delete(&mut self, delete: &Delete) {
        let froms = match &delete.from {
            sqlparser::ast::FromTable::WithFromKeyword(ts)
            | sqlparser::ast::FromTable::WithoutKeyword(ts) => ts,
        };
        for t in froms {
            self.visit_table_with_joins(t);
        }
        if let Some(using) = &delete.using {
            for t in using {
                self.visit_table_with_joins(t);
            }
        }
        if let Some(expr) = &delete.selection {
            self.visit_expr(expr);
        }
    }

    fn visit_merge_clause(&mut self, clause: &MergeClause) {
        if let Some(pred) = &clause.predicate {
            self.visit_expr(pred);
        }
    }

    fn visit_query(&mut self, query: &Query) {
        if let Some(with) = &query.with {
            for cte in &with.cte_tables {
                self.visit_cte(cte);
            }
        }
        self.visit_set_expr(&query.body);
        if let Some(order_by) = &query.order_by {
            self.visit_order_by(order_by);
        }
    }

    fn visit_cte(&mut self, cte: &Cte) {
        self.visit_query(&cte.query);
    }

    fn visit_set_expr(&mut self, set_expr: &SetExpr) {
        match set_expr {
            SetExpr::Select(select) => self.visit_select(select),
            SetExpr::Query(query) => self.visit_query(query),
            SetExpr::SetOperation { left, right, .. } => {
                self.visit_set_expr(left);
                self.visit_set_expr(right);
            }
            SetExpr::Values(values) => self.visit_values(values),
            SetExpr::Insert(stmt) => self.visit_statement(stmt),
            SetExpr::Update(stmt) => self.visit_statement(stmt),
            SetExpr::Delete(stmt) => self.visit_statement(stmt),
            SetExpr::Merge(stmt) => self.visit_statement(stmt),
            SetExpr::Table(_) => {}
        }
    }

    /// FROM, then WHERE, then GROUP BY, then HAVING, then the SELECT list.
    fn visit_select(&mut self, select: &Select) {
        for from in &select.from {
            self.visit_table_with_joins(from);
        }
        if let Some(selection) = &select.selection {
            self.visit_expr(selection);
        }
        if let sqlparser::ast::GroupByExpr::Expressions(exprs, _) = &select.group_by {
            for e in exprs {
                self.visit_expr(e);
            }
        }
        if let Some(having) = &select.having {
            self.visit_expr(having);
        }
        for item in &select.projection {
            self.visit_select_item(item);
        }
    }

    fn visit_select_item(&mut self, item: &SelectItem) {
        match item {
            SelectItem::UnnamedExpr(expr) | SelectItem::ExprWithAlias { expr, .. } => {
                self.visit_expr(expr)
            }
            SelectItem::QualifiedWildcard(..) | SelectItem::Wildcard(..) => {}
        }
    }

    fn visit_order_by(&mut self, order_by: &OrderBy) {
        if let OrderByKind::Expressions(exprs) = &order_by.kind {
            for e in exprs {
                self.visit_expr(&e.expr);
            }
        }
    }

    fn visit_table_with_joins(&mut self, table: &TableWithJoins) {
        self.visit_table_factor(&table.relation);
        for join in &table.joins {
            self.visit_join(join);
        }
    }

    fn visit_table_factor(&mut self, table: &TableFactor) {
        match table {
            TableFactor::Derived { subquery, .. } => self.visit_query(subquery),
            TableFactor::NestedJoin {
                table_with_joins, ..
            } => self.visit_table_with_joins(table_with_joins),
            _ => {}
        }
    }

    fn visit_join(&mut self, join: &Join) {
        self.visit_table_factor(&join.relation);
        if let Some(expr) = join_condition_expr(join) {
            self.visit_expr(expr);
        }
    }

    fn visit_values(&mut self, values: &Values) {
        for row in &values.rows {
            for expr in row {
                self.visit_expr(expr);
            }
        }
    }

    /// Leaf: descends into subqueries embedded in an expression
    /// (`InlineQuery`/`Subquery`, scalar and `[NOT] IN (SELECT ...)`, `EXISTS`).
    /// Override to inspect other expression shapes; call `walk_expr_children`
    /// from the override to keep this descent.
    fn visit_expr(&mut self, expr: &Expr) {
        walk_expr_children(self, expr);
    }
}

fn join_condition_expr(join: &Join) -> Option<&Expr> {
    use sqlparser::ast::{JoinConstraint, JoinOperator::*};
    let constraint = match &join.join_operator {
        Join(c) | Inner(c) | Left(c) | LeftOuter(c) | Right(c) | RightOuter(c) | FullOuter(c)
        | CrossJoin(c) | Semi(c) | LeftSemi(c) | RightSemi(c) | Anti(c) | LeftAnti(c)
        | RightAnti(c) | StraightJoin(c) | AsOf { constraint: c, .. } => c,
        CrossApply | OuterApply => return None,
    };
    match constraint {
        JoinConstraint::On(expr) => Some(expr),
        _ => None,
    }
}

/// Walks the subqueries and sub-expressions nested inside `expr`, without
/// imposing any ordering beyond "children after parent" (expressions have
/// no FROM/WHERE-style clause ordering to respect).
pub fn walk_expr_children<V: Visitor + ?Sized>(visitor: &mut V, expr: &Expr) {
    match expr {
        Expr::BinaryOp { left, right, .. } => {
            visitor.visit_expr(left);
            visitor.visit_expr(right);
        }
        Expr::UnaryOp { expr, .. } => visitor.visit_expr(expr),
        Expr::Nested(e) => visitor.visit_expr(e),
        Expr::IsNull(e) | Expr::IsNotNull(e) => visitor.visit_expr(e),
        Expr::InList { expr, list, .. } => {
            visitor.visit_expr(expr);
            for e in list {
                visitor.visit_expr(e);
            }
        }
        Expr::InSubquery { expr, subquery, .. } => {
            visitor.visit_expr(expr);
            visitor.visit_query(subquery);
        }
        Expr::Between {
            expr, low, high, ..
        } => {
            visitor.visit_expr(expr);
            visitor.visit_expr(low);
            visitor.visit_expr(high);
        }
        Expr::Like { expr, pattern, .. } | Expr::ILike { expr, pattern, .. } => {
            visitor.visit_expr(expr);
            visitor.visit_expr(pattern);
        }
        Expr::Cast { expr, .. } => visitor.visit_expr(expr),
        Expr::Case {
            operand,
            conditions,
            else_result,
            ..
        } => {
            if let Some(op) = operand {
                visitor.visit_expr(op);
            }
            for when in conditions {
                visitor.visit_expr(&when.condition);
                visitor.visit_expr(&when.result);
            }
            if let Some(e) = else_result {
                visitor.visit_expr(e);
            }
        }
        Expr::Exists { subquery, .. } => visitor.visit_query(subquery),
        Expr::Subquery(query) => visitor.visit_query(query),
        Expr::Function(func) => visit_function_args(visitor, func),
        Expr::Tuple(items) => {
            for e in items {
                visitor.visit_expr(e);
            }
        }
        _ => {}
    }
}

fn visit_function_args<V: Visitor + ?Sized>(visitor: &mut V, func: &Function) {
    if let FunctionArguments::List(list) = &func.args {
        for arg in &list.args {
            if let FunctionArg::Unnamed(FunctionArgExpr::Expr(e))
            | FunctionArg::Named {
                arg: FunctionArgExpr::Expr(e),
                ..
            } = arg
            {
                visitor.visit_expr(e);
            }
        }
    }
}
