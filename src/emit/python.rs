//! Python backend emitter (indent block model).

use serde_json::Value;

use crate::emit::{indent, BackendEmitter, ExpansionContext};
use crate::graph::IntentGraph;

/// Expands an Intent Graph into executable Python source.
#[derive(Default, Debug)]
pub struct PythonBackend;

impl PythonBackend {
    pub fn new() -> Self {
        PythonBackend
    }

    fn emit_stmt(&self, graph: &IntentGraph, node_id: &str, level: usize) -> Vec<String> {
        let node = &graph.nodes[node_id];

        match node.kind.as_str() {
            "AssignmentIntent" => {
                let value_id = graph.child_ids(node_id, "value").remove(0);
                let value_src = self.emit_expr(graph, &value_id);
                let name = attr_str(node, "name");
                vec![indent(&format!("{name} = {value_src}"), level)]
            }

            "ExpressionIntent" => {
                let expr_id = graph.child_ids(node_id, "expr").remove(0);
                vec![indent(&self.emit_expr(graph, &expr_id), level)]
            }

            "ControlIntent" => {
                let cond_id = graph.child_ids(node_id, "condition").remove(0);
                let cond_src = self.emit_expr(graph, &cond_id);
                let mut lines = vec![indent(&format!("if {cond_src}:"), level)];

                let then_ids = graph.child_ids(node_id, "contains_then");
                if then_ids.is_empty() {
                    lines.push(indent("pass", level + 1));
                } else {
                    for then_id in &then_ids {
                        lines.extend(self.emit_stmt(graph, then_id, level + 1));
                    }
                }

                let else_ids = graph.child_ids(node_id, "contains_else");
                if !else_ids.is_empty() {
                    lines.push(indent("else:", level));
                    for else_id in &else_ids {
                        lines.extend(self.emit_stmt(graph, else_id, level + 1));
                    }
                }
                lines
            }

            "LoopIntent" => {
                let start_id = graph.child_ids(node_id, "start").remove(0);
                let end_id = graph.child_ids(node_id, "end").remove(0);
                let start_src = self.emit_expr(graph, &start_id);
                let end_src = self.emit_expr(graph, &end_id);
                let iterator = attr_str(node, "iterator");
                let mut lines = vec![indent(
                    &format!("for {iterator} in range({start_src}, {end_src}):"),
                    level,
                )];
                let body_ids = graph.child_ids(node_id, "contains_body");
                if body_ids.is_empty() {
                    lines.push(indent("pass", level + 1));
                } else {
                    for body_id in &body_ids {
                        lines.extend(self.emit_stmt(graph, body_id, level + 1));
                    }
                }
                lines
            }

            "FuncIntent" => {
                let name = attr_str(node, "name");
                let params = param_names(node).join(", ");
                let mut lines = vec![indent(&format!("def {name}({params}):"), level)];

                if node.attrs.get("expr_body") == Some(&Value::Bool(true)) {
                    let expr_id = graph.child_ids(node_id, "return_expr").remove(0);
                    let expr_src = self.emit_expr(graph, &expr_id);
                    lines.push(indent(&format!("return {expr_src}"), level + 1));
                    return lines;
                }

                let body_ids = graph.child_ids(node_id, "contains_body");
                if body_ids.is_empty() {
                    lines.push(indent("pass", level + 1));
                } else {
                    for body_id in &body_ids {
                        lines.extend(self.emit_stmt(graph, body_id, level + 1));
                    }
                }
                lines
            }

            "ReturnIntent" => {
                let value_ids = graph.child_ids(node_id, "value");
                match value_ids.first() {
                    Some(value_id) => {
                        vec![indent(&format!("return {}", self.emit_expr(graph, &value_id)), level)]
                    }
                    None => vec![indent("return", level)],
                }
            }

            "ExpansionIntent" => {
                vec![indent(
                    &format!("# expansion macro: {}", attr_str(node, "macro")),
                    level,
                )]
            }

            other => vec![indent(&format!("# unsupported intent: {other}"), level)],
        }
    }

    fn emit_expr(&self, graph: &IntentGraph, node_id: &str) -> String {
        let node = &graph.nodes[node_id];

        match node.kind.as_str() {
            "LiteralIntent" => py_literal(node.attrs.get("value").unwrap_or(&Value::Null)),

            "RefIntent" => attr_str(node, "name"),

            "OperationIntent" => {
                let operator = attr_str(node, "operator");
                let operands: Vec<String> = graph
                    .child_ids(node_id, "operand")
                    .iter()
                    .map(|id| self.emit_expr(graph, id))
                    .collect();
                if operands.len() == 1 {
                    if operator == "!" {
                        return format!("(not {})", operands[0]);
                    }
                    return format!("({operator}{})", operands[0]);
                }
                let mapped = match operator.as_str() {
                    "&&" => "and".to_string(),
                    "||" => "or".to_string(),
                    other => other.to_string(),
                };
                format!("({} {mapped} {})", operands[0], operands[1])
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
                    .map_or_else(|| "None".to_string(), |id| self.emit_expr(graph, id));
                format!("(lambda {params}: {body})")
            }

            _ => "None".to_string(),
        }
    }
}

impl BackendEmitter for PythonBackend {
    fn name(&self) -> &'static str {
        "python"
    }

    fn emit_module(&self, graph: &IntentGraph, _context: &ExpansionContext) -> String {
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

/// Render a literal attr as Python source.
fn py_literal(value: &Value) -> String {
    match value {
        Value::Bool(b) => {
            if *b {
                "True".to_string()
            } else {
                "False".to_string()
            }
        }
        Value::String(s) => py_repr_str(s),
        Value::Null => "None".to_string(),
        other => serde_json::to_string(other).unwrap_or_else(|_| "None".to_string()),
    }
}

/// Single-quoted Python string literal with escapes.
fn py_repr_str(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for ch in s.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
    out.push('\'');
    out
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
        PythonBackend::new().emit_module(&graph, &ExpansionContext::for_target("python"))
    }

    #[test]
    fn assignment_emits_parenthesized_expression() {
        assert_eq!(emit("x := 1 + 2;"), "x = (1 + 2)\n");
    }

    #[test]
    fn logic_operators_map_to_keywords() {
        assert_eq!(emit("ok := true && !false;"), "ok = (True and (not False))\n");
    }

    #[test]
    fn loop_maps_to_range() {
        let code = emit("sum := 0; loop i in 0..3 { sum := sum + i; }");
        assert!(code.contains("for i in range(0, 3):"));
        assert!(code.contains("    sum = (sum + i)"));
    }

    #[test]
    fn function_def_and_call() {
        let code = emit("fn add(a,b) { ret a + b; } out := add(1, 2);");
        assert!(code.contains("def add(a, b):"));
        assert!(code.contains("    return (a + b)"));
        assert!(code.contains("out = add(1, 2)"));
    }

    #[test]
    fn empty_blocks_get_pass() {
        let code = emit("if true ? { }");
        assert!(code.contains("if True:"));
        assert!(code.contains("    pass"));
    }

    #[test]
    fn string_literals_are_quoted() {
        assert_eq!(emit("s := \"a'b\";"), "s = 'a\\'b'\n");
    }

    #[test]
    fn lambda_emits_python_lambda() {
        let code = emit("f := lam (a, b) => a + b;");
        assert!(code.contains("f = (lambda a, b: (a + b))"));
    }

    #[test]
    fn output_ends_with_single_newline() {
        let code = emit("x := 1;");
        assert!(code.ends_with('\n'));
        assert!(!code.ends_with("\n\n"));
    }
}
