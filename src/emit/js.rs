//! JavaScript backend emitter (C-brace block model).

use std::cell::RefCell;
use std::collections::HashSet;

use serde_json::Value;

use crate::emit::{indent, json_literal, BackendEmitter, ExpansionContext};
use crate::graph::IntentGraph;

/// Expands an Intent Graph into executable JavaScript source.
///
/// First assignment to a name declares it with `let`; later assignments to
/// the same name reassign.
#[derive(Default, Debug)]
pub struct JavaScriptBackend {
    declared: RefCell<HashSet<String>>,
}

impl JavaScriptBackend {
    pub fn new() -> Self {
        JavaScriptBackend::default()
    }

    fn emit_stmt(&self, graph: &IntentGraph, node_id: &str, level: usize) -> Vec<String> {
        let node = &graph.nodes[node_id];

        match node.kind.as_str() {
            "AssignmentIntent" => {
                let value_id = graph.child_ids(node_id, "value").remove(0);
                let value_src = self.emit_expr(graph, &value_id);
                let name = attr_str(node, "name");
                if self.declared.borrow().contains(&name) {
                    return vec![indent(&format!("{name} = {value_src};"), level)];
                }
                self.declared.borrow_mut().insert(name.clone());
                vec![indent(&format!("let {name} = {value_src};"), level)]
            }

            "ExpressionIntent" => {
                let expr_id = graph.child_ids(node_id, "expr").remove(0);
                vec![indent(&format!("{};", self.emit_expr(graph, &expr_id)), level)]
            }

            "ControlIntent" => {
                let cond_id = graph.child_ids(node_id, "condition").remove(0);
                let cond_src = self.emit_expr(graph, &cond_id);
                let mut lines = vec![indent(&format!("if ({cond_src}) {{"), level)];
                for then_id in graph.child_ids(node_id, "contains_then") {
                    lines.extend(self.emit_stmt(graph, &then_id, level + 1));
                }
                lines.push(indent("}", level));

                let else_ids = graph.child_ids(node_id, "contains_else");
                if !else_ids.is_empty() {
                    let last = lines.len() - 1;
                    lines[last] = indent("} else {", level);
                    for else_id in &else_ids {
                        lines.extend(self.emit_stmt(graph, else_id, level + 1));
                    }
                    lines.push(indent("}", level));
                }
                lines
            }

            "LoopIntent" => {
                let start_id = graph.child_ids(node_id, "start").remove(0);
                let end_id = graph.child_ids(node_id, "end").remove(0);
                let start_src = self.emit_expr(graph, &start_id);
                let end_src = self.emit_expr(graph, &end_id);
                let it = attr_str(node, "iterator");
                let mut lines = vec![indent(
                    &format!("for (let {it} = {start_src}; {it} < {end_src}; {it}++) {{"),
                    level,
                )];
                for body_id in graph.child_ids(node_id, "contains_body") {
                    lines.extend(self.emit_stmt(graph, &body_id, level + 1));
                }
                lines.push(indent("}", level));
                lines
            }

            "FuncIntent" => {
                let name = attr_str(node, "name");
                let params = param_names(node).join(", ");
                let mut lines = vec![indent(&format!("function {name}({params}) {{"), level)];

                if node.attrs.get("expr_body") == Some(&Value::Bool(true)) {
                    let expr_id = graph.child_ids(node_id, "return_expr").remove(0);
                    lines.push(indent(
                        &format!("return {};", self.emit_expr(graph, &expr_id)),
                        level + 1,
                    ));
                    lines.push(indent("}", level));
                    return lines;
                }

                for body_id in graph.child_ids(node_id, "contains_body") {
                    lines.extend(self.emit_stmt(graph, &body_id, level + 1));
                }
                lines.push(indent("}", level));
                lines
            }

            "ReturnIntent" => {
                let value_ids = graph.child_ids(node_id, "value");
                match value_ids.first() {
                    Some(value_id) => vec![indent(
                        &format!("return {};", self.emit_expr(graph, &value_id)),
                        level,
                    )],
                    None => vec![indent("return;", level)],
                }
            }

            "ExpansionIntent" => {
                vec![indent(
                    &format!("// expansion macro: {}", attr_str(node, "macro")),
                    level,
                )]
            }

            other => vec![indent(&format!("// unsupported intent: {other}"), level)],
        }
    }

    fn emit_expr(&self, graph: &IntentGraph, node_id: &str) -> String {
        let node = &graph.nodes[node_id];

        match node.kind.as_str() {
            "LiteralIntent" => json_literal(node.attrs.get("value").unwrap_or(&Value::Null)),

            "RefIntent" => attr_str(node, "name"),

            "OperationIntent" => {
                let operator = attr_str(node, "operator");
                let operands: Vec<String> = graph
                    .child_ids(node_id, "operand")
                    .iter()
                    .map(|id| self.emit_expr(graph, id))
                    .collect();
                if operands.len() == 1 {
                    return format!("({operator}{})", operands[0]);
                }
                format!("({} {operator} {})", operands[0], operands[1])
            }

            "CallIntent" => {
                let callee = node
                    .attrs
                    .get("callee_name")
                    .and_then(Value::as_str)
                    .map_or_else(
                        || {
                            graph
                                .child_ids(node_id, "callee")
                                .first()
                                .map_or_else(|| "unknown".to_string(), |id| self.emit_expr(graph, id))
                        },
                        str::to_string,
                    );
                let args: Vec<String> = graph
                    .child_ids(node_id, "arg")
                    .iter()
                    .map(|id| self.emit_expr(graph, id))
                    .collect();
                format!("{callee}({})", args.join(", "))
            }

            "LambdaIntent" => {
                let params = param_names(node).join(", ");
                let body = graph
                    .child_ids(node_id, "body")
                    .first()
                    .map_or_else(|| "null".to_string(), |id| self.emit_expr(graph, id));
                format!("(({params}) => {body})")
            }

            _ => "null".to_string(),
        }
    }
}

impl BackendEmitter for JavaScriptBackend {
    fn name(&self) -> &'static str {
        "js"
    }

    fn emit_module(&self, graph: &IntentGraph, _context: &ExpansionContext) -> String {
        self.declared.borrow_mut().clear();
        let Some(root_id) = graph.root_id.as_deref() else {
            return String::new();
        };
        let mut lines: Vec<String> = Vec::new();
        for stmt_id in graph.child_ids(root_id, "contains") {
            lines.extend(self.emit_stmt(graph, &stmt_id, 0));
        }
        format!("{}\n", lines.join("\n").trim_end())
    }
}

fn attr_str(node: &crate::graph::IntentNode, key: &str) -> String {
    node.attrs
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string()
}

fn param_names(node: &crate::graph::IntentNode) -> Vec<String> {
    node.attrs
        .get("params")
        .and_then(Value::as_array)
        .map(|params| {
            params
                .iter()
                .filter_map(|p| p.get("name").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::IntentGraphBuilder;
    use crate::lexer::Lexer;
    use crate::parser::Parser;

    fn emit(source: &str) -> String {
        let tokens = Lexer::new(source, "<test>").tokenize().expect("lex");
        let program = Parser::new(tokens).parse_program().expect("parse");
        let graph = IntentGraphBuilder::new().build(&program);
        JavaScriptBackend::new().emit_module(&graph, &ExpansionContext::for_target("js"))
    }

    #[test]
    fn first_assignment_declares_with_let() {
        let code = emit("x := 1; y := x + 2;");
        assert!(code.contains("let x = 1;"));
        assert!(code.contains("let y = (x + 2);"));
        let x_pos = code.find("let x").expect("x");
        let y_pos = code.find("let y").expect("y");
        assert!(x_pos < y_pos, "statement order preserved");
    }

    #[test]
    fn reassignment_drops_let() {
        let code = emit("x := 1; x := 2;");
        assert!(code.contains("let x = 1;"));
        assert!(code.contains("\nx = 2;"));
    }

    #[test]
    fn loop_is_c_style_half_open() {
        let code = emit("loop i in 0..3 { print(i); }");
        assert!(code.contains("for (let i = 0; i < 3; i++) {"));
    }

    #[test]
    fn if_else_braces() {
        let code = emit("x := 2; if x > 1 ? { y := x; } : { y := 0; }");
        assert!(code.contains("if ((x > 1)) {"));
        assert!(code.contains("} else {"));
    }

    #[test]
    fn lambda_emits_arrow_function() {
        let code = emit("f := lam (a, b) => a + b;");
        assert!(code.contains("let f = ((a, b) => (a + b));"));
    }

    #[test]
    fn string_literal_uses_json_quoting() {
        assert_eq!(emit("s := \"hi\\n\";"), "let s = \"hi\\n\";\n");
    }
}
