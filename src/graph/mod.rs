//! # Intent Graph
//!
//! Labeled directed graph form of a program used for structural analysis,
//! diffing, and optimization. Nodes live in a `node_id -> IntentNode` map and
//! relations are an explicit typed edge sequence - no back-pointers are ever
//! materialized; walkers go through the edge list.
//!
//! For role sets where order is semantic (arguments, operands, child
//! statements) edges carry an integer `order`; edges without one sort after
//! ordered edges.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ast::{Expr, ExprKind, Program, Stmt, StmtKind};
use crate::source_map::{SourceMap, SourceSpan};

/// A typed semantic node in the Intent Graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentNode {
    pub node_id: String,
    pub kind: String,
    #[serde(default)]
    pub attrs: BTreeMap<String, Value>,
}

/// A directed relation between graph nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentEdge {
    pub source: String,
    pub target: String,
    pub edge_type: String,
    pub order: Option<i64>,
}

impl IntentEdge {
    /// Lexicographic sort key; `order = None` sorts after ordered edges.
    pub fn sort_key(&self) -> (String, String, String, bool, i64) {
        (
            self.source.clone(),
            self.target.clone(),
            self.edge_type.clone(),
            self.order.is_none(),
            self.order.unwrap_or(0),
        )
    }

    pub fn as_tuple(&self) -> (String, String, String, Option<i64>) {
        (
            self.source.clone(),
            self.target.clone(),
            self.edge_type.clone(),
            self.order,
        )
    }
}

/// Structural diff output between two intent graphs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntentDiff {
    pub added_nodes: Vec<String>,
    pub removed_nodes: Vec<String>,
    pub changed_nodes: Vec<String>,
    pub added_edges: Vec<(String, String, String, Option<i64>)>,
    pub removed_edges: Vec<(String, String, String, Option<i64>)>,
}

impl IntentDiff {
    pub fn is_empty(&self) -> bool {
        self.added_nodes.is_empty()
            && self.removed_nodes.is_empty()
            && self.changed_nodes.is_empty()
            && self.added_edges.is_empty()
            && self.removed_edges.is_empty()
    }
}

/// Directed graph representing normalized intent semantics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IntentGraph {
    pub nodes: BTreeMap<String, IntentNode>,
    pub edges: Vec<IntentEdge>,
    pub root_id: Option<String>,
}

impl IntentGraph {
    pub fn new() -> Self {
        IntentGraph::default()
    }

    /// Add a node under an explicit id.
    pub fn add_node(&mut self, node_id: &str, kind: &str, attrs: BTreeMap<String, Value>) {
        self.nodes.insert(
            node_id.to_string(),
            IntentNode {
                node_id: node_id.to_string(),
                kind: kind.to_string(),
                attrs,
            },
        );
    }

    /// Add a directed typed edge.
    pub fn add_edge(&mut self, source: &str, target: &str, edge_type: &str, order: Option<i64>) {
        self.edges.push(IntentEdge {
            source: source.to_string(),
            target: target.to_string(),
            edge_type: edge_type.to_string(),
            order,
        });
    }

    /// Outgoing edges from `source`, optionally filtered by type, ordered
    /// edges first by `order`.
    pub fn outgoing(&self, source: &str, edge_type: Option<&str>) -> Vec<&IntentEdge> {
        let mut edges: Vec<&IntentEdge> = self
            .edges
            .iter()
            .filter(|e| e.source == source)
            .filter(|e| edge_type.is_none_or(|ty| e.edge_type == ty))
            .collect();
        edges.sort_by_key(|e| (e.order.is_none(), e.order.unwrap_or(0)));
        edges
    }

    /// Incoming edges to `target`, optionally filtered by type.
    pub fn incoming(&self, target: &str, edge_type: Option<&str>) -> Vec<&IntentEdge> {
        self.edges
            .iter()
            .filter(|e| e.target == target)
            .filter(|e| edge_type.is_none_or(|ty| e.edge_type == ty))
            .collect()
    }

    /// Target node ids for an ordered outgoing edge type.
    pub fn child_ids(&self, source: &str, edge_type: &str) -> Vec<String> {
        self.outgoing(source, Some(edge_type))
            .into_iter()
            .map(|e| e.target.clone())
            .collect()
    }

    /// Remove a node and every edge touching it.
    pub fn remove_node(&mut self, node_id: &str) {
        self.nodes.remove(node_id);
        self.edges
            .retain(|e| e.source != node_id && e.target != node_id);
    }

    /// Serialize as the versioned JSON graph shape.
    pub fn to_json(&self) -> Value {
        serde_json::json!({
            "schema_version": "1.0",
            "root_id": self.root_id,
            "nodes": self.nodes.values().collect::<Vec<_>>(),
            "edges": self.edges,
        })
    }

    /// Construct a graph from the serialized JSON shape.
    pub fn from_json(data: &Value) -> IntentGraph {
        let mut graph = IntentGraph::new();
        graph.root_id = data
            .get("root_id")
            .and_then(Value::as_str)
            .map(str::to_string);

        if let Some(nodes) = data.get("nodes").and_then(Value::as_array) {
            for node in nodes {
                let Some(node_id) = node.get("node_id").and_then(Value::as_str) else {
                    continue;
                };
                let kind = node.get("kind").and_then(Value::as_str).unwrap_or("");
                let attrs: BTreeMap<String, Value> = node
                    .get("attrs")
                    .and_then(Value::as_object)
                    .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
                    .unwrap_or_default();
                graph.add_node(node_id, kind, attrs);
            }
        }

        if let Some(edges) = data.get("edges").and_then(Value::as_array) {
            for edge in edges {
                let source = edge.get("source").and_then(Value::as_str).unwrap_or("");
                let target = edge.get("target").and_then(Value::as_str).unwrap_or("");
                let edge_type = edge.get("edge_type").and_then(Value::as_str).unwrap_or("");
                let order = edge.get("order").and_then(Value::as_i64);
                graph.add_edge(source, target, edge_type, order);
            }
        }

        graph
    }
}

/// Builds an Intent Graph plus source map from the AST.
pub struct IntentGraphBuilder {
    counter: u32,
    source_map: SourceMap,
}

impl Default for IntentGraphBuilder {
    fn default() -> Self {
        IntentGraphBuilder::new()
    }
}

impl IntentGraphBuilder {
    pub fn new() -> Self {
        IntentGraphBuilder {
            counter: 0,
            source_map: SourceMap::new(),
        }
    }

    /// Source map populated during the last `build` call.
    pub fn source_map(&self) -> &SourceMap {
        &self.source_map
    }

    pub fn into_source_map(self) -> SourceMap {
        self.source_map
    }

    /// Convert a program AST into an IntentGraph.
    pub fn build(&mut self, program: &Program) -> IntentGraph {
        let mut graph = IntentGraph::new();
        let module_id = self.new_node_id();
        graph.add_node(
            &module_id,
            "ModuleIntent",
            attrs([("name", Value::from("module"))]),
        );
        graph.root_id = Some(module_id.clone());
        self.record_span(&module_id, &program.span, "module");

        for (idx, stmt) in program.statements.iter().enumerate() {
            self.build_stmt(&mut graph, stmt, &module_id, "contains", idx as i64);
        }
        graph
    }

    fn build_stmt(
        &mut self,
        graph: &mut IntentGraph,
        stmt: &Stmt,
        parent_id: &str,
        edge_type: &str,
        order: i64,
    ) -> String {
        let node_id = match &stmt.kind {
            StmtKind::Assignment {
                name,
                type_hint,
                value,
            } => {
                let node_id = self.create_node(
                    graph,
                    "AssignmentIntent",
                    attrs([
                        ("name", Value::from(name.clone())),
                        ("type_hint", opt_str(type_hint)),
                    ]),
                    &stmt.span,
                );
                let value_id = self.build_expr(graph, value);
                graph.add_edge(&node_id, &value_id, "value", Some(0));
                node_id
            }

            StmtKind::Expression { expr } => {
                let node_id =
                    self.create_node(graph, "ExpressionIntent", BTreeMap::new(), &stmt.span);
                let expr_id = self.build_expr(graph, expr);
                graph.add_edge(&node_id, &expr_id, "expr", Some(0));
                node_id
            }

            StmtKind::If {
                condition,
                then_block,
                else_block,
            } => {
                let node_id = self.create_node(
                    graph,
                    "ControlIntent",
                    attrs([("control", Value::from("if"))]),
                    &stmt.span,
                );
                let cond_id = self.build_expr(graph, condition);
                graph.add_edge(&node_id, &cond_id, "condition", Some(0));
                for (idx, item) in then_block.iter().enumerate() {
                    self.build_stmt(graph, item, &node_id, "contains_then", idx as i64);
                }
                for (idx, item) in else_block.iter().enumerate() {
                    self.build_stmt(graph, item, &node_id, "contains_else", idx as i64);
                }
                node_id
            }

            StmtKind::Loop {
                iterator,
                start,
                end,
                body,
            } => {
                let node_id = self.create_node(
                    graph,
                    "LoopIntent",
                    attrs([("iterator", Value::from(iterator.clone()))]),
                    &stmt.span,
                );
                let start_id = self.build_expr(graph, start);
                let end_id = self.build_expr(graph, end);
                graph.add_edge(&node_id, &start_id, "start", Some(0));
                graph.add_edge(&node_id, &end_id, "end", Some(1));
                for (idx, item) in body.iter().enumerate() {
                    self.build_stmt(graph, item, &node_id, "contains_body", idx as i64);
                }
                node_id
            }

            StmtKind::FunctionDef {
                name,
                params,
                body,
                expr_body,
                return_type,
            } => {
                let node_id = self.create_node(
                    graph,
                    "FuncIntent",
                    attrs([
                        ("name", Value::from(name.clone())),
                        ("params", params_json(params)),
                        ("return_type", opt_str(return_type)),
                        ("expr_body", Value::from(expr_body.is_some())),
                    ]),
                    &stmt.span,
                );
                if let Some(expr) = expr_body {
                    let expr_id = self.build_expr(graph, expr);
                    graph.add_edge(&node_id, &expr_id, "return_expr", Some(0));
                } else {
                    for (idx, item) in body.iter().enumerate() {
                        self.build_stmt(graph, item, &node_id, "contains_body", idx as i64);
                    }
                }
                node_id
            }

            StmtKind::Return { value } => {
                let node_id = self.create_node(graph, "ReturnIntent", BTreeMap::new(), &stmt.span);
                if let Some(expr) = value {
                    let value_id = self.build_expr(graph, expr);
                    graph.add_edge(&node_id, &value_id, "value", Some(0));
                }
                node_id
            }

            StmtKind::Macro { name, args } => {
                let node_id = self.create_node(
                    graph,
                    "ExpansionIntent",
                    attrs([
                        ("macro", Value::from(name.clone())),
                        ("args", Value::from(args.len() as i64)),
                    ]),
                    &stmt.span,
                );
                for (idx, arg) in args.iter().enumerate() {
                    let arg_id = self.build_expr(graph, arg);
                    graph.add_edge(&node_id, &arg_id, "arg", Some(idx as i64));
                }
                node_id
            }
        };

        graph.add_edge(parent_id, &node_id, edge_type, Some(order));
        node_id
    }

    fn build_expr(&mut self, graph: &mut IntentGraph, expr: &Expr) -> String {
        match &expr.kind {
            ExprKind::Literal { value } => self.create_node(
                graph,
                "LiteralIntent",
                attrs([
                    ("value", value.to_json()),
                    ("value_type", Value::from(value.type_tag())),
                ]),
                &expr.span,
            ),

            ExprKind::Identifier { name } => self.create_node(
                graph,
                "RefIntent",
                attrs([("name", Value::from(name.clone()))]),
                &expr.span,
            ),

            ExprKind::Unary { op, operand } => {
                let node_id = self.create_node(
                    graph,
                    "OperationIntent",
                    attrs([
                        ("operator", Value::from(op.as_str())),
                        ("arity", Value::from(1)),
                    ]),
                    &expr.span,
                );
                let operand_id = self.build_expr(graph, operand);
                graph.add_edge(&node_id, &operand_id, "operand", Some(0));
                node_id
            }

            ExprKind::Binary { left, op, right } => {
                let node_id = self.create_node(
                    graph,
                    "OperationIntent",
                    attrs([
                        ("operator", Value::from(op.as_str())),
                        ("arity", Value::from(2)),
                    ]),
                    &expr.span,
                );
                let left_id = self.build_expr(graph, left);
                let right_id = self.build_expr(graph, right);
                graph.add_edge(&node_id, &left_id, "operand", Some(0));
                graph.add_edge(&node_id, &right_id, "operand", Some(1));
                node_id
            }

            ExprKind::Call {
                callee,
                args,
                at_prefixed,
            } => {
                let node_id = self.create_node(
                    graph,
                    "CallIntent",
                    attrs([("at_prefixed", Value::from(*at_prefixed))]),
                    &expr.span,
                );
                if let ExprKind::Identifier { name } = &callee.kind {
                    if let Some(node) = graph.nodes.get_mut(&node_id) {
                        node.attrs
                            .insert("callee_name".to_string(), Value::from(name.clone()));
                    }
                } else {
                    let callee_id = self.build_expr(graph, callee);
                    graph.add_edge(&node_id, &callee_id, "callee", Some(0));
                }
                for (idx, arg) in args.iter().enumerate() {
                    let arg_id = self.build_expr(graph, arg);
                    graph.add_edge(&node_id, &arg_id, "arg", Some(idx as i64));
                }
                node_id
            }

            ExprKind::Lambda {
                params,
                body,
                return_type,
            } => {
                let node_id = self.create_node(
                    graph,
                    "LambdaIntent",
                    attrs([
                        ("params", params_json(params)),
                        ("return_type", opt_str(return_type)),
                    ]),
                    &expr.span,
                );
                let body_id = self.build_expr(graph, body);
                graph.add_edge(&node_id, &body_id, "body", Some(0));
                node_id
            }
        }
    }

    fn create_node(
        &mut self,
        graph: &mut IntentGraph,
        kind: &str,
        attrs: BTreeMap<String, Value>,
        span: &SourceSpan,
    ) -> String {
        let node_id = self.new_node_id();
        graph.add_node(&node_id, kind, attrs);
        self.record_span(&node_id, span, kind);
        node_id
    }

    fn new_node_id(&mut self) -> String {
        self.counter += 1;
        format!("n{}", self.counter)
    }

    fn record_span(&mut self, node_id: &str, span: &SourceSpan, note: &str) {
        self.source_map.add(node_id, span.clone(), note);
    }
}

/// Compute a structural diff between two graph snapshots.
///
/// Node lists sort by id; edge lists sort lexicographically as tuples with
/// unordered edges after ordered ones. A node is "changed" iff the same id
/// carries a different kind or attrs.
pub fn diff_graphs(before: &IntentGraph, after: &IntentGraph) -> IntentDiff {
    let mut added_nodes: Vec<String> = after
        .nodes
        .keys()
        .filter(|id| !before.nodes.contains_key(*id))
        .cloned()
        .collect();
    added_nodes.sort();

    let mut removed_nodes: Vec<String> = before
        .nodes
        .keys()
        .filter(|id| !after.nodes.contains_key(*id))
        .cloned()
        .collect();
    removed_nodes.sort();

    let mut changed_nodes: Vec<String> = before
        .nodes
        .iter()
        .filter_map(|(id, left)| {
            after.nodes.get(id).and_then(|right| {
                if left.kind != right.kind || left.attrs != right.attrs {
                    Some(id.clone())
                } else {
                    None
                }
            })
        })
        .collect();
    changed_nodes.sort();

    let before_edges: Vec<&IntentEdge> = before.edges.iter().collect();
    let after_edges: Vec<&IntentEdge> = after.edges.iter().collect();

    let mut added_edges: Vec<&IntentEdge> = after_edges
        .iter()
        .filter(|e| !before_edges.iter().any(|b| b.as_tuple() == e.as_tuple()))
        .copied()
        .collect();
    added_edges.sort_by_key(|e| e.sort_key());

    let mut removed_edges: Vec<&IntentEdge> = before_edges
        .iter()
        .filter(|e| !after_edges.iter().any(|a| a.as_tuple() == e.as_tuple()))
        .copied()
        .collect();
    removed_edges.sort_by_key(|e| e.sort_key());

    IntentDiff {
        added_nodes,
        removed_nodes,
        changed_nodes,
        added_edges: added_edges.iter().map(|e| e.as_tuple()).collect(),
        removed_edges: removed_edges.iter().map(|e| e.as_tuple()).collect(),
    }
}

fn attrs<const N: usize>(pairs: [(&str, Value); N]) -> BTreeMap<String, Value> {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

fn opt_str(value: &Option<String>) -> Value {
    match value {
        Some(s) => Value::from(s.clone()),
        None => Value::Null,
    }
}

fn params_json(params: &[crate::ast::Param]) -> Value {
    Value::Array(
        params
            .iter()
            .map(|p| {
                serde_json::json!({
                    "name": p.name,
                    "type_hint": p.type_hint,
                })
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;
    use crate::parser::Parser;

    fn graph(source: &str) -> IntentGraph {
        let tokens = Lexer::new(source, "<test>").tokenize().expect("lex");
        let program = Parser::new(tokens).parse_program().expect("parse");
        IntentGraphBuilder::new().build(&program)
    }

    #[test]
    fn root_is_module_intent() {
        let g = graph("x := 1;");
        let root = g.root_id.clone().expect("root");
        assert_eq!(g.nodes[&root].kind, "ModuleIntent");
    }

    #[test]
    fn every_edge_endpoint_exists() {
        let g = graph("fn add(a,b) => a + b; z := add(1, 2);");
        for edge in &g.edges {
            assert!(g.nodes.contains_key(&edge.source), "missing {}", edge.source);
            assert!(g.nodes.contains_key(&edge.target), "missing {}", edge.target);
        }
    }

    #[test]
    fn operands_keep_order() {
        let g = graph("x := 1 - 2;");
        let op_id = g
            .nodes
            .values()
            .find(|n| n.kind == "OperationIntent")
            .map(|n| n.node_id.clone())
            .expect("operation node");
        let operands = g.child_ids(&op_id, "operand");
        assert_eq!(operands.len(), 2);
        let first = &g.nodes[&operands[0]];
        assert_eq!(first.attrs["value"], serde_json::json!(1));
    }

    #[test]
    fn json_round_trip_preserves_graph() {
        let g = graph("fn f(a):Num => a + 1; if f(1) > 0 ? { x := 1; } : { x := 2; }");
        let restored = IntentGraph::from_json(&g.to_json());
        assert_eq!(g, restored);
    }

    #[test]
    fn diff_of_identical_graphs_is_empty() {
        let a = graph("x := 1;");
        let b = graph("x := 1;");
        assert!(diff_graphs(&a, &b).is_empty());
    }

    #[test]
    fn diff_detects_changed_literal() {
        let before = graph("x := 1;");
        let after = graph("x := 2;");
        let diff = diff_graphs(&before, &after);
        assert!(diff.added_nodes.is_empty());
        assert!(diff.removed_nodes.is_empty());
        assert!(!diff.changed_nodes.is_empty());
    }

    #[test]
    fn diff_swaps_added_and_removed_on_argument_swap() {
        let before = graph("x := 1;");
        let after = graph("x := 1; y := 2;");
        let forward = diff_graphs(&before, &after);
        let backward = diff_graphs(&after, &before);
        assert_eq!(forward.added_nodes, backward.removed_nodes);
        assert_eq!(forward.removed_nodes, backward.added_nodes);
        assert_eq!(forward.added_edges, backward.removed_edges);
        assert_eq!(forward.changed_nodes, backward.changed_nodes);
    }

    #[test]
    fn source_map_records_every_node() {
        let tokens = Lexer::new("x := 1;", "<test>").tokenize().expect("lex");
        let program = Parser::new(tokens).parse_program().expect("parse");
        let mut builder = IntentGraphBuilder::new();
        let g = builder.build(&program);
        assert_eq!(builder.source_map().entries.len(), g.nodes.len());
    }
}
