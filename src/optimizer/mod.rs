//! # Graph Optimizer
//!
//! Deterministic optimization passes over an Intent Graph, applied in order
//! on a deep copy of the input:
//!
//! 1. Constant folding: operation nodes whose operands are all literals
//!    become literal nodes tagged with `folded_from`.
//! 2. Dead-assignment removal: assignments to names never referenced.
//! 3. Orphan pruning: repeatedly drop non-root nodes with no incoming edges.
//!
//! The optimizer is error-tolerant: a fold that cannot be evaluated (type
//! mix, division by zero) leaves the node untouched.

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;

use crate::graph::IntentGraph;

/// Summary of optimization actions applied to a graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OptimizationReport {
    pub folded_operations: usize,
    pub removed_assignments: usize,
    pub notes: Vec<String>,
}

/// Applies the pass pipeline to an IntentGraph.
#[derive(Default)]
pub struct GraphOptimizer;

impl GraphOptimizer {
    pub fn new() -> Self {
        GraphOptimizer
    }

    /// Run all passes and return the optimized graph plus a report.
    pub fn optimize(&self, graph: &IntentGraph) -> (IntentGraph, OptimizationReport) {
        let mut optimized = graph.clone();
        let mut report = OptimizationReport::default();

        self.constant_fold(&mut optimized, &mut report);
        self.remove_dead_assignments(&mut optimized, &mut report);
        self.prune_orphans(&mut optimized);

        (optimized, report)
    }

    fn constant_fold(&self, graph: &mut IntentGraph, report: &mut OptimizationReport) {
        let node_ids: Vec<String> = graph.nodes.keys().cloned().collect();
        for node_id in node_ids {
            let Some(node) = graph.nodes.get(&node_id) else {
                continue;
            };
            if node.kind != "OperationIntent" {
                continue;
            }

            let operand_ids = graph.child_ids(&node_id, "operand");
            if operand_ids.is_empty() {
                continue;
            }
            let mut values: Vec<Value> = Vec::with_capacity(operand_ids.len());
            let mut all_literals = true;
            for operand_id in &operand_ids {
                match graph.nodes.get(operand_id) {
                    Some(op) if op.kind == "LiteralIntent" => {
                        values.push(op.attrs.get("value").cloned().unwrap_or(Value::Null));
                    }
                    _ => {
                        all_literals = false;
                        break;
                    }
                }
            }
            if !all_literals {
                continue;
            }

            let operator = graph.nodes[&node_id]
                .attrs
                .get("operator")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string();

            let Ok(folded) = eval_operator(&operator, &values) else {
                continue;
            };

            let value_type = json_type_tag(&folded);
            if let Some(node) = graph.nodes.get_mut(&node_id) {
                node.kind = "LiteralIntent".to_string();
                node.attrs.clear();
                node.attrs.insert("value".to_string(), folded);
                node.attrs
                    .insert("value_type".to_string(), Value::from(value_type));
                node.attrs
                    .insert("folded_from".to_string(), Value::from(operator.clone()));
            }
            graph
                .edges
                .retain(|e| !(e.source == node_id && e.edge_type == "operand"));

            report.folded_operations += 1;
            report
                .notes
                .push(format!("Folded operation node {node_id} ({operator})."));
        }
    }

    fn remove_dead_assignments(&self, graph: &mut IntentGraph, report: &mut OptimizationReport) {
        let referenced: BTreeSet<String> = graph
            .nodes
            .values()
            .filter(|n| n.kind == "RefIntent")
            .filter_map(|n| n.attrs.get("name").and_then(Value::as_str))
            .map(str::to_string)
            .collect();

        let dead: Vec<(String, String)> = graph
            .nodes
            .values()
            .filter(|n| n.kind == "AssignmentIntent")
            .filter_map(|n| {
                let name = n.attrs.get("name").and_then(Value::as_str)?;
                if referenced.contains(name) {
                    None
                } else {
                    Some((n.node_id.clone(), name.to_string()))
                }
            })
            .collect();

        for (node_id, name) in dead {
            // Splice the value subtree into the assignment's slot so folded
            // results stay reachable for downstream pruning and reporting.
            let parents: Vec<(String, String, Option<i64>)> = graph
                .incoming(&node_id, None)
                .into_iter()
                .map(|e| (e.source.clone(), e.edge_type.clone(), e.order))
                .collect();
            let values: Vec<String> = graph.child_ids(&node_id, "value");
            graph.remove_node(&node_id);
            for (parent, edge_type, order) in &parents {
                for value_id in &values {
                    graph.add_edge(parent, value_id, edge_type, *order);
                }
            }
            report.removed_assignments += 1;
            report
                .notes
                .push(format!("Removed dead assignment node {node_id} ({name})."));
        }
    }

    fn prune_orphans(&self, graph: &mut IntentGraph) {
        loop {
            let orphans: Vec<String> = graph
                .nodes
                .keys()
                .filter(|id| Some(id.as_str()) != graph.root_id.as_deref())
                .filter(|id| graph.incoming(id, None).is_empty())
                .cloned()
                .collect();
            if orphans.is_empty() {
                break;
            }
            for node_id in orphans {
                graph.remove_node(&node_id);
            }
        }
    }
}

#[derive(Debug)]
struct FoldError;

/// Evaluate an operator over literal JSON values.
///
/// Numeric folds keep `int op int` integral except `/`, which always yields a
/// float. Logic folds require booleans. Any unsupported shape (including
/// division by zero) aborts the fold for that node.
fn eval_operator(operator: &str, values: &[Value]) -> Result<Value, FoldError> {
    match operator {
        "+" => {
            let (a, b) = two(values)?;
            // String + string is concatenation.
            if let (Some(left), Some(right)) = (a.as_str(), b.as_str()) {
                return Ok(Value::from(format!("{left}{right}")));
            }
            numeric_fold(a, b, i64::checked_add, |x, y| x + y)
        }
        "-" => {
            if values.len() == 1 {
                return match &values[0] {
                    Value::Number(n) if n.is_i64() => {
                        let negated = n
                            .as_i64()
                            .and_then(i64::checked_neg)
                            .ok_or(FoldError)?;
                        Ok(Value::from(negated))
                    }
                    Value::Number(n) => Ok(Value::from(-n.as_f64().ok_or(FoldError)?)),
                    _ => Err(FoldError),
                };
            }
            let (a, b) = two(values)?;
            numeric_fold(a, b, i64::checked_sub, |x, y| x - y)
        }
        "*" => {
            let (a, b) = two(values)?;
            numeric_fold(a, b, i64::checked_mul, |x, y| x * y)
        }
        "/" => {
            let (a, b) = two(values)?;
            let x = as_f64(a)?;
            let y = as_f64(b)?;
            if y == 0.0 {
                return Err(FoldError);
            }
            Ok(Value::from(x / y))
        }
        "%" => {
            let (a, b) = two(values)?;
            if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
                if y == 0 {
                    return Err(FoldError);
                }
                return Ok(Value::from(x.rem_euclid(y)));
            }
            let x = as_f64(a)?;
            let y = as_f64(b)?;
            if y == 0.0 {
                return Err(FoldError);
            }
            Ok(Value::from(x.rem_euclid(y)))
        }
        "==" | "!=" => {
            let (a, b) = two(values)?;
            let equal = json_values_equal(a, b);
            Ok(Value::from(if operator == "==" { equal } else { !equal }))
        }
        "<" | "<=" | ">" | ">=" => {
            let (a, b) = two(values)?;
            let x = as_f64(a)?;
            let y = as_f64(b)?;
            let result = match operator {
                "<" => x < y,
                "<=" => x <= y,
                ">" => x > y,
                _ => x >= y,
            };
            Ok(Value::from(result))
        }
        "&&" | "||" => {
            let (a, b) = two(values)?;
            let x = a.as_bool().ok_or(FoldError)?;
            let y = b.as_bool().ok_or(FoldError)?;
            Ok(Value::from(if operator == "&&" { x && y } else { x || y }))
        }
        "!" => {
            if values.len() != 1 {
                return Err(FoldError);
            }
            let x = values[0].as_bool().ok_or(FoldError)?;
            Ok(Value::from(!x))
        }
        _ => Err(FoldError),
    }
}

fn two(values: &[Value]) -> Result<(&Value, &Value), FoldError> {
    if values.len() != 2 {
        return Err(FoldError);
    }
    Ok((&values[0], &values[1]))
}

fn as_f64(value: &Value) -> Result<f64, FoldError> {
    value.as_f64().ok_or(FoldError)
}

fn numeric_fold(
    a: &Value,
    b: &Value,
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> Result<Value, FoldError> {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        return int_op(x, y).map(Value::from).ok_or(FoldError);
    }
    if a.is_boolean() || b.is_boolean() || a.is_string() || b.is_string() {
        return Err(FoldError);
    }
    Ok(Value::from(float_op(as_f64(a)?, as_f64(b)?)))
}

fn json_values_equal(a: &Value, b: &Value) -> bool {
    // Numeric equality crosses the int/float boundary; other types compare
    // structurally.
    if let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) {
        return x == y;
    }
    a == b
}

fn json_type_tag(value: &Value) -> &'static str {
    match value {
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_i64() => "int",
        Value::Number(_) => "float",
        Value::String(_) => "str",
        _ => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::IntentGraphBuilder;
    use crate::lexer::Lexer;
    use crate::parser::Parser;

    fn graph(source: &str) -> IntentGraph {
        let tokens = Lexer::new(source, "<test>").tokenize().expect("lex");
        let program = Parser::new(tokens).parse_program().expect("parse");
        IntentGraphBuilder::new().build(&program)
    }

    fn find_folded(graph: &IntentGraph) -> Option<&crate::graph::IntentNode> {
        graph
            .nodes
            .values()
            .find(|n| n.attrs.contains_key("folded_from"))
    }

    #[test]
    fn folds_integer_addition_and_removes_dead_assignment() {
        let (optimized, report) = GraphOptimizer::new().optimize(&graph("x := 1 + 2;"));
        assert_eq!(report.folded_operations, 1);
        assert_eq!(report.removed_assignments, 1);

        // `x` is never referenced so the assignment is gone, but the folded
        // literal stays reachable in the assignment's slot.
        assert!(!optimized
            .nodes
            .values()
            .any(|n| n.kind == "AssignmentIntent"));
        let folded = find_folded(&optimized).expect("folded literal survives");
        assert_eq!(folded.attrs["value"], serde_json::json!(3));
        assert_eq!(folded.attrs["folded_from"], serde_json::json!("+"));
    }

    #[test]
    fn folded_node_carries_value_and_operator() {
        let (optimized, _) = GraphOptimizer::new().optimize(&graph("x := 1 + 2; y := x;"));
        let folded = find_folded(&optimized).expect("folded literal");
        assert_eq!(folded.kind, "LiteralIntent");
        assert_eq!(folded.attrs["value"], serde_json::json!(3));
        assert_eq!(folded.attrs["value_type"], serde_json::json!("int"));
        assert_eq!(folded.attrs["folded_from"], serde_json::json!("+"));
    }

    #[test]
    fn division_always_folds_to_float() {
        let (optimized, _) = GraphOptimizer::new().optimize(&graph("x := 6 / 3; y := x;"));
        let folded = find_folded(&optimized).expect("folded literal");
        assert_eq!(folded.attrs["value"], serde_json::json!(2.0));
        assert_eq!(folded.attrs["value_type"], serde_json::json!("float"));
    }

    #[test]
    fn division_by_zero_skips_fold() {
        let (optimized, report) = GraphOptimizer::new().optimize(&graph("x := 1 / 0; y := x;"));
        assert_eq!(report.folded_operations, 0);
        assert!(optimized
            .nodes
            .values()
            .any(|n| n.kind == "OperationIntent"));
    }

    #[test]
    fn referenced_assignment_survives() {
        let (optimized, report) = GraphOptimizer::new().optimize(&graph("x := 1; y := x + 2;"));
        assert_eq!(report.removed_assignments, 1); // only y is dead
        assert!(optimized
            .nodes
            .values()
            .any(|n| n.kind == "AssignmentIntent" && n.attrs["name"] == serde_json::json!("x")));
    }

    #[test]
    fn logic_folds_on_boolean_literals() {
        let (optimized, report) =
            GraphOptimizer::new().optimize(&graph("ok := true && false; out := ok;"));
        assert_eq!(report.folded_operations, 1);
        let folded = find_folded(&optimized).expect("&& folded");
        assert_eq!(folded.attrs["folded_from"], serde_json::json!("&&"));
        assert_eq!(folded.attrs["value"], serde_json::json!(false));
    }

    #[test]
    fn folding_is_single_pass_not_fixpoint() {
        // The `!` operand folds, but the enclosing `&&` saw a non-literal
        // operand when it was visited and stays an operation.
        let (optimized, report) =
            GraphOptimizer::new().optimize(&graph("ok := true && !false; out := ok;"));
        assert_eq!(report.folded_operations, 1);
        let folded = find_folded(&optimized).expect("! folded");
        assert_eq!(folded.attrs["folded_from"], serde_json::json!("!"));
        assert!(optimized
            .nodes
            .values()
            .any(|n| n.kind == "OperationIntent"));
    }

    #[test]
    fn unary_minus_folds_unary_plus_does_not() {
        let (_, report) = GraphOptimizer::new().optimize(&graph("x := -5; y := x;"));
        assert_eq!(report.folded_operations, 1);

        let (_, report) = GraphOptimizer::new().optimize(&graph("x := +5; y := x;"));
        assert_eq!(report.folded_operations, 0);
    }

    #[test]
    fn comparison_folds_to_bool() {
        let (optimized, _) = GraphOptimizer::new().optimize(&graph("ok := 1 <= 2; out := ok;"));
        let folded = find_folded(&optimized).expect("folded literal");
        assert_eq!(folded.attrs["value"], serde_json::json!(true));
        assert_eq!(folded.attrs["value_type"], serde_json::json!("bool"));
    }

    #[test]
    fn string_concat_folds() {
        let (optimized, _) =
            GraphOptimizer::new().optimize(&graph("s := \"ab\" + \"cd\"; out := s;"));
        let folded = find_folded(&optimized).expect("folded literal");
        assert_eq!(folded.attrs["value"], serde_json::json!("abcd"));
    }

    #[test]
    fn orphan_pruning_keeps_root_and_reachable_nodes() {
        let (optimized, _) = GraphOptimizer::new().optimize(&graph("x := 1 + 2;"));
        let root = optimized.root_id.clone().expect("root");
        assert!(optimized.nodes.contains_key(&root));
        for node_id in optimized.nodes.keys() {
            if *node_id != root {
                assert!(
                    !optimized.incoming(node_id, None).is_empty(),
                    "orphan {node_id} survived"
                );
            }
        }
    }

    #[test]
    fn input_graph_is_untouched() {
        let original = graph("x := 1 + 2;");
        let before = original.clone();
        let _ = GraphOptimizer::new().optimize(&original);
        assert_eq!(original, before);
    }
}
