//! CTE dependency graph: build, cycle detection, topological planning.

use crate::collectors::CteTableReferenceCollector;
use crate::error::TransformError;
use sqlparser::ast::{Query, Statement};
use std::collections::HashMap;

/// Whether a graph node is a CTE or the synthetic node representing the
/// statement's own (non-CTE) body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CteNodeKind {
    Cte,
    MainQuery,
}

pub const MAIN_QUERY: &str = "MAIN_QUERY";

#[derive(Debug, Clone)]
pub struct CteNode {
    pub name: String,
    pub kind: CteNodeKind,
}

/// Directed graph of CTE-to-CTE (and main-query-to-CTE) references, built
/// once from a statement and queried many times.
///
/// Edges run `A -> B` iff `A`'s body references `B` as a table source.
/// `dependenciesOf(A)` returns every `B` it points to; `dependentsOf(B)`
/// returns every `A` that points to it.
pub struct CteDependencyGraph {
    nodes: Vec<CteNode>,
    /// source order, used to break ties deterministically during DFS
    order: HashMap<String, usize>,
    edges: HashMap<String, Vec<String>>,
    reverse_edges: HashMap<String, Vec<String>>,
}

impl CteDependencyGraph {
    /// Builds the graph from a statement. `NotAnalyzed` is never returned
    /// here — it is the error a caller gets for querying a graph they
    /// never built (see the `analyze_ctes` façade function).
    pub fn build(statement: &Statement) -> Self {
        let (with, main_body) = match statement {
            Statement::Query(q) => (q.with.as_ref(), Some(q.as_ref())),
            _ => (None, None),
        };

        let mut nodes = Vec::new();
        let mut order = HashMap::new();
        let mut edges: HashMap<String, Vec<String>> = HashMap::new();
        let mut reverse_edges: HashMap<String, Vec<String>> = HashMap::new();

        let cte_names: Vec<String> = with
            .map(|w| w.cte_tables.iter().map(|c| c.alias.name.value.clone()).collect())
            .unwrap_or_default();

        if let Some(with) = with {
            for (idx, cte) in with.cte_tables.iter().enumerate() {
                let name = cte.alias.name.value.clone();
                order.insert(name.clone(), idx);
                nodes.push(CteNode {
                    name: name.clone(),
                    kind: CteNodeKind::Cte,
                });
                let refs = CteTableReferenceCollector::new().collect_query(&cte.query);
                let deps: Vec<String> = refs.into_iter().filter(|r| cte_names.contains(r)).collect();
                for dep in &deps {
                    reverse_edges.entry(dep.clone()).or_default().push(name.clone());
                }
                edges.insert(name, deps);
            }
        }

        order.insert(MAIN_QUERY.to_string(), cte_names.len());
        nodes.push(CteNode {
            name: MAIN_QUERY.to_string(),
            kind: CteNodeKind::MainQuery,
        });
        let main_refs = match main_body {
            Some(query) => {
                let stripped = strip_with(query);
                CteTableReferenceCollector::new().collect_query(&stripped)
            }
            None => Vec::new(),
        };
        let main_deps: Vec<String> = main_refs.into_iter().filter(|r| cte_names.contains(r)).collect();
        for dep in &main_deps {
            reverse_edges
                .entry(dep.clone())
                .or_default()
                .push(MAIN_QUERY.to_string());
        }
        edges.insert(MAIN_QUERY.to_string(), main_deps);

        Self {
            nodes,
            order,
            edges,
            reverse_edges,
        }
    }

    pub fn nodes_by_type(&self, kind: CteNodeKind) -> Vec<&CteNode> {
        self.nodes.iter().filter(|n| n.kind == kind).collect()
    }

    pub fn dependencies_of(&self, name: &str) -> Vec<&str> {
        self.edges
            .get(name)
            .map(|v| v.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    pub fn dependents_of(&self, name: &str) -> Vec<&str> {
        self.reverse_edges
            .get(name)
            .map(|v| v.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    pub fn main_query_dependencies(&self) -> Vec<&str> {
        self.dependencies_of(MAIN_QUERY)
    }

    /// DFS with three-coloring; an in-progress node reached again is a cycle.
    /// Returns names in an order where every dependency precedes its
    /// dependent (including `MAIN_QUERY` last among what it needs).
    pub fn topological_order(&self) -> Result<Vec<String>, TransformError> {
        #[derive(Clone, Copy, PartialEq)]
        enum Color {
            White,
            Gray,
            Black,
        }

        let mut color: HashMap<&str, Color> =
            self.nodes.iter().map(|n| (n.name.as_str(), Color::White)).collect();
        let mut out = Vec::new();

        let mut names: Vec<&str> = self.nodes.iter().map(|n| n.name.as_str()).collect();
        names.sort_by_key(|n| self.order.get(*n).copied().unwrap_or(usize::MAX));

        fn visit<'a>(
            name: &'a str,
            graph: &'a CteDependencyGraph,
            color: &mut HashMap<&'a str, Color>,
            out: &mut Vec<String>,
        ) -> Result<(), TransformError> {
            match color.get(name) {
                Some(Color::Black) => return Ok(()),
                Some(Color::Gray) => return Err(TransformError::CircularReference(name.to_string())),
                _ => {}
            }
            color.insert(name, Color::Gray);
            let mut deps = graph.dependencies_of(name);
            deps.sort_by_key(|d| graph.order.get(*d).copied().unwrap_or(usize::MAX));
            for dep in deps {
                visit(dep, graph, color, out)?;
            }
            color.insert(name, Color::Black);
            out.push(name.to_string());
            Ok(())
        }

        for name in names {
            visit(name, self, &mut color, &mut out)?;
        }
        Ok(out)
    }

    pub fn has_circular_dependency(&self) -> bool {
        self.topological_order().is_err()
    }
}

fn strip_with(query: &Query) -> Query {
    let mut stripped = query.clone();
    stripped.with = None;
    stripped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_one;
    use crate::types::Dialect;

    fn graph_of(sql: &str) -> CteDependencyGraph {
        let stmt = parse_one(sql, Dialect::Generic).unwrap();
        CteDependencyGraph::build(&stmt)
    }

    #[test]
    fn linear_dependency_orders_leaves_first() {
        let g = graph_of(
            "WITH a AS (SELECT 1), b AS (SELECT * FROM a) SELECT * FROM b",
        );
        let order = g.topological_order().unwrap();
        let pos = |n: &str| order.iter().position(|x| x == n).unwrap();
        assert!(pos("a") < pos("b"));
        assert!(pos("b") < pos(MAIN_QUERY));
    }

    #[test]
    fn detects_cycle() {
        let g = graph_of("WITH a AS (SELECT * FROM b), b AS (SELECT * FROM a) SELECT * FROM a");
        assert!(g.has_circular_dependency());
        match g.topological_order() {
            Err(TransformError::CircularReference(_)) => {}
            other => panic!("expected CircularReference, got {other:?}"),
        }
    }

    #[test]
    fn external_table_reference_is_ignored() {
        let g = graph_of("WITH a AS (SELECT * FROM real_table) SELECT * FROM a");
        assert!(g.dependencies_of("a").is_empty());
    }

    #[test]
    fn main_query_dependencies_reported() {
        let g = graph_of("WITH a AS (SELECT 1) SELECT * FROM a");
        assert_eq!(g.main_query_dependencies(), vec!["a"]);
    }

    #[test]
    fn dependents_of_is_inverse_of_dependencies_of() {
        let g = graph_of("WITH a AS (SELECT 1), b AS (SELECT * FROM a) SELECT * FROM b");
        assert_eq!(g.dependents_of("a"), vec!["b"]);
    }
}
