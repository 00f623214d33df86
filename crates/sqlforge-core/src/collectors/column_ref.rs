use crate::visitor::{walk_expr_children, Visitor};
use sqlparser::ast::Expr;

/// A column reference as it appears anywhere in a query: an optional
/// namespace path (`schema`, `alias`, …) plus the final column name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnReference {
    pub namespace: Vec<String>,
    pub name: String,
}

impl ColumnReference {
    /// The dot-joined textual form, e.g. `u.id` or `id`.
    pub fn qualified_name(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace.join("."), self.name)
        }
    }
}

/// Yields every `ColumnReference` reachable from a node, deduplicated by
/// (namespace-path, name).
#[derive(Default)]
pub struct ColumnReferenceCollector {
    seen: std::collections::HashSet<(Vec<String>, String)>,
    refs: Vec<ColumnReference>,
}

impl ColumnReferenceCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn collect(mut self, expr: &Expr) -> Vec<ColumnReference> {
        self.visit_expr(expr);
        self.refs
    }

    fn push(&mut self, namespace: Vec<String>, name: String) {
        let key = (namespace.clone(), name.clone());
        if self.seen.insert(key) {
            self.refs.push(ColumnReference { namespace, name });
        }
    }
}

impl Visitor for ColumnReferenceCollector {
    fn visit_expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Identifier(ident) => self.push(Vec::new(), ident.value.clone()),
            Expr::CompoundIdentifier(parts) if !parts.is_empty() => {
                let name = parts.last().unwrap().value.clone();
                let namespace = parts[..parts.len() - 1]
                    .iter()
                    .map(|p| p.value.clone())
                    .collect();
                self.push(namespace, name);
            }
            _ => walk_expr_children(self, expr),
        }
    }
}
