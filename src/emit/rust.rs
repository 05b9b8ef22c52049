//! Rust backend emitter: typed block-structured output with local type
//! inference across scopes.
//!
//! The symbolic type mapping is `Any`/`Num` -> `f64`, `Bool` -> `bool`,
//! `Str` -> `String`, `Void` -> `()`; `Fn` maps to `f64` at signature sites
//! while closure-carrying locals track the pseudo-type `Fn` inside scopes so
//! assignments never re-declare a closure-typed binding. Loop iterators are
//! the only `i64` values. Coercions are a fixed pairwise table, not a general
//! cast system.

use std::cell::RefCell;
use std::collections::HashMap;

use serde_json::Value;

use crate::emit::{indent, BackendEmitter, ExpansionContext};
use crate::graph::{IntentGraph, IntentNode};

#[derive(Default, Debug)]
struct EmitState {
    function_return_types: HashMap<String, String>,
    function_param_types: HashMap<String, Vec<String>>,
    scope_stack: Vec<HashMap<String, String>>,
    current_function_return: Option<String>,
}

impl EmitState {
    fn push_scope(&mut self) {
        self.scope_stack.push(HashMap::new());
    }

    fn pop_scope(&mut self) {
        self.scope_stack.pop();
    }

    fn define(&mut self, name: &str, rust_type: &str) {
        if self.scope_stack.is_empty() {
            self.push_scope();
        }
        if let Some(scope) = self.scope_stack.last_mut() {
            scope.insert(name.to_string(), rust_type.to_string());
        }
    }

    fn resolve(&self, name: &str) -> Option<String> {
        self.scope_stack
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).cloned())
    }
}

/// Expands an Intent Graph into runnable Rust source for core ICL constructs.
#[derive(Default, Debug)]
pub struct RustBackend {
    state: RefCell<EmitState>,
}

impl RustBackend {
    pub fn new() -> Self {
        RustBackend::default()
    }

    fn collect_function_signatures(&self, graph: &IntentGraph, function_ids: &[String]) {
        let mut state = self.state.borrow_mut();
        for fn_id in function_ids {
            let node = &graph.nodes[fn_id];
            let name = attr_str(node, "name");
            let param_types: Vec<String> = params_of(node)
                .iter()
                .map(|(_, hint)| symbolic_to_rust(hint.as_deref()).to_string())
                .collect();
            let return_type =
                symbolic_to_rust(node.attrs.get("return_type").and_then(Value::as_str));
            state.function_param_types.insert(name.clone(), param_types);
            state
                .function_return_types
                .insert(name, return_type.to_string());
        }
    }

    fn emit_function(&self, graph: &IntentGraph, node_id: &str, level: usize) -> Vec<String> {
        let node = &graph.nodes[node_id];
        let name = attr_str(node, "name");
        let params = params_of(node);

        let (return_type, param_types) = {
            let state = self.state.borrow();
            (
                state
                    .function_return_types
                    .get(&name)
                    .cloned()
                    .unwrap_or_else(|| "f64".to_string()),
                state
                    .function_param_types
                    .get(&name)
                    .cloned()
                    .unwrap_or_else(|| vec!["f64".to_string(); params.len()]),
            )
        };

        let rendered_params: Vec<String> = params
            .iter()
            .enumerate()
            .map(|(idx, (p_name, _))| {
                let p_type = param_types.get(idx).map_or("f64", String::as_str);
                format!("{p_name}: {p_type}")
            })
            .collect();

        let mut lines = vec![indent(
            &format!("fn {name}({}) -> {return_type} {{", rendered_params.join(", ")),
            level,
        )];

        {
            let mut state = self.state.borrow_mut();
            state.push_scope();
            for (idx, (p_name, _)) in params.iter().enumerate() {
                let p_type = param_types.get(idx).map_or("f64", String::as_str).to_string();
                state.define(p_name, &p_type);
            }
        }
        let prev_return = {
            let mut state = self.state.borrow_mut();
            std::mem::replace(
                &mut state.current_function_return,
                Some(return_type.clone()),
            )
        };

        let mut saw_return = false;
        for body_id in graph.child_ids(node_id, "contains_body") {
            let (stmt_lines, returned) = self.emit_stmt(graph, &body_id, level + 1);
            lines.extend(stmt_lines);
            saw_return = saw_return || returned;
        }

        // Missing trailing return gets the return type's default value.
        if !saw_return {
            lines.push(indent(
                &format!("return {};", default_value(&return_type)),
                level + 1,
            ));
        }

        {
            let mut state = self.state.borrow_mut();
            state.current_function_return = prev_return;
            state.pop_scope();
        }
        lines.push(indent("}", level));
        lines
    }

    fn emit_stmt(&self, graph: &IntentGraph, node_id: &str, level: usize) -> (Vec<String>, bool) {
        let node = &graph.nodes[node_id];

        match node.kind.as_str() {
            "AssignmentIntent" => {
                let value_id = graph.child_ids(node_id, "value").remove(0);
                let (value_src, value_ty) = self.emit_expr(graph, &value_id);
                let name = attr_str(node, "name");

                let existing = self.state.borrow().resolve(&name);
                if let Some(existing_ty) = existing {
                    if existing_ty == "Fn" {
                        return (vec![indent(&format!("{name} = {value_src};"), level)], false);
                    }
                    let coerced = coerce(&value_src, &value_ty, &existing_ty);
                    return (vec![indent(&format!("{name} = {coerced};"), level)], false);
                }

                let inferred = normalize_decl_type(&value_ty);
                self.state.borrow_mut().define(&name, &inferred);
                if inferred == "Fn" {
                    return (
                        vec![indent(&format!("let mut {name} = {value_src};"), level)],
                        false,
                    );
                }
                let coerced = coerce(&value_src, &value_ty, &inferred);
                (
                    vec![indent(
                        &format!("let mut {name}: {inferred} = {coerced};"),
                        level,
                    )],
                    false,
                )
            }

            "ExpressionIntent" => {
                let expr_id = graph.child_ids(node_id, "expr").remove(0);
                let expr_node = &graph.nodes[&expr_id];
                // print(...) statements become println! with debug formatting.
                if expr_node.kind == "CallIntent"
                    && expr_node.attrs.get("callee_name").and_then(Value::as_str) == Some("print")
                {
                    let args: Vec<String> = graph
                        .child_ids(&expr_id, "arg")
                        .iter()
                        .map(|id| self.emit_expr(graph, id).0)
                        .collect();
                    let arg = args
                        .first()
                        .cloned()
                        .unwrap_or_else(|| "\"\"".to_string());
                    return (
                        vec![indent(&format!("println!(\"{{:?}}\", {arg});"), level)],
                        false,
                    );
                }

                let (expr_src, _) = self.emit_expr(graph, &expr_id);
                (vec![indent(&format!("{expr_src};"), level)], false)
            }

            "ControlIntent" => {
                let cond_id = graph.child_ids(node_id, "condition").remove(0);
                let (cond_src, cond_ty) = self.emit_expr(graph, &cond_id);
                let cond_src = coerce(&cond_src, &cond_ty, "bool");
                let mut lines = vec![indent(&format!("if {cond_src} {{"), level)];

                self.state.borrow_mut().push_scope();
                let mut then_returned = false;
                for then_id in graph.child_ids(node_id, "contains_then") {
                    let (then_lines, returned) = self.emit_stmt(graph, &then_id, level + 1);
                    lines.extend(then_lines);
                    then_returned = then_returned || returned;
                }
                self.state.borrow_mut().pop_scope();
                lines.push(indent("}", level));

                let else_ids = graph.child_ids(node_id, "contains_else");
                let mut else_returned = false;
                if !else_ids.is_empty() {
                    let last = lines.len() - 1;
                    lines[last] = indent("} else {", level);
                    self.state.borrow_mut().push_scope();
                    for else_id in &else_ids {
                        let (else_lines, returned) = self.emit_stmt(graph, else_id, level + 1);
                        lines.extend(else_lines);
                        else_returned = else_returned || returned;
                    }
                    self.state.borrow_mut().pop_scope();
                    lines.push(indent("}", level));
                }

                (lines, !else_ids.is_empty() && then_returned && else_returned)
            }

            "LoopIntent" => {
                let start_id = graph.child_ids(node_id, "start").remove(0);
                let end_id = graph.child_ids(node_id, "end").remove(0);
                let (start_src, start_ty) = self.emit_expr(graph, &start_id);
                let (end_src, end_ty) = self.emit_expr(graph, &end_id);
                let it = attr_str(node, "iterator");

                let start_i64 = coerce(&start_src, &start_ty, "i64");
                let end_i64 = coerce(&end_src, &end_ty, "i64");

                let mut lines = vec![indent(
                    &format!("for {it} in ({start_i64})..({end_i64}) {{"),
                    level,
                )];
                {
                    let mut state = self.state.borrow_mut();
                    state.push_scope();
                    state.define(&it, "i64");
                }
                for body_id in graph.child_ids(node_id, "contains_body") {
                    let (body_lines, _) = self.emit_stmt(graph, &body_id, level + 1);
                    lines.extend(body_lines);
                }
                self.state.borrow_mut().pop_scope();
                lines.push(indent("}", level));
                (lines, false)
            }

            "FuncIntent" => (self.emit_function(graph, node_id, level), false),

            "ReturnIntent" => {
                let value_ids = graph.child_ids(node_id, "value");
                let target_ty = self
                    .state
                    .borrow()
                    .current_function_return
                    .clone()
                    .unwrap_or_else(|| "f64".to_string());
                if let Some(value_id) = value_ids.first() {
                    let (value_src, value_ty) = self.emit_expr(graph, &value_id);
                    let coerced = coerce(&value_src, &value_ty, &target_ty);
                    return (vec![indent(&format!("return {coerced};"), level)], true);
                }
                if target_ty == "()" {
                    return (vec![indent("return;", level)], true);
                }
                (
                    vec![indent(
                        &format!("return {};", default_value(&target_ty)),
                        level,
                    )],
                    true,
                )
            }

            "ExpansionIntent" => (
                vec![indent(
                    &format!("// expansion macro: {}", attr_str(node, "macro")),
                    level,
                )],
                false,
            ),

            other => (
                vec![indent(&format!("// unsupported intent: {other}"), level)],
                false,
            ),
        }
    }

    fn emit_expr(&self, graph: &IntentGraph, node_id: &str) -> (String, String) {
        let node = &graph.nodes[node_id];

        match node.kind.as_str() {
            "LiteralIntent" => {
                let value = node.attrs.get("value").unwrap_or(&Value::Null);
                match value {
                    Value::Bool(b) => (
                        if *b { "true" } else { "false" }.to_string(),
                        "bool".to_string(),
                    ),
                    Value::String(s) => (
                        format!(
                            "{}.to_string()",
                            serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
                        ),
                        "String".to_string(),
                    ),
                    other => (render_number(other), "f64".to_string()),
                }
            }

            "RefIntent" => {
                let name = attr_str(node, "name");
                let ty = self
                    .state
                    .borrow()
                    .resolve(&name)
                    .unwrap_or_else(|| "f64".to_string());
                (name, ty)
            }

            "OperationIntent" => {
                let operator = attr_str(node, "operator");
                let operands: Vec<(String, String)> = graph
                    .child_ids(node_id, "operand")
                    .iter()
                    .map(|id| self.emit_expr(graph, id))
                    .collect();

                if operands.len() == 1 {
                    let (operand_src, operand_ty) = &operands[0];
                    if operator == "!" {
                        let coerced = coerce(operand_src, operand_ty, "bool");
                        return (format!("(!{coerced})"), "bool".to_string());
                    }
                    let coerced = coerce(operand_src, operand_ty, "f64");
                    return (format!("({operator}{coerced})"), "f64".to_string());
                }

                let (left_src, left_ty) = operands[0].clone();
                let (right_src, right_ty) = operands[1].clone();

                match operator.as_str() {
                    "+" | "-" | "*" | "/" | "%" => {
                        // String + anything concatenates via format!.
                        if operator == "+" && (left_ty == "String" || right_ty == "String") {
                            let left_str = to_string_expr(&left_src, &left_ty);
                            let right_str = to_string_expr(&right_src, &right_ty);
                            return (
                                format!("format!(\"{{}}{{}}\", {left_str}, {right_str})"),
                                "String".to_string(),
                            );
                        }
                        let left_num = coerce(&left_src, &left_ty, "f64");
                        let right_num = coerce(&right_src, &right_ty, "f64");
                        (
                            format!("({left_num} {operator} {right_num})"),
                            "f64".to_string(),
                        )
                    }

                    "==" | "!=" => {
                        let (mut left_src, mut left_ty) = (left_src, left_ty);
                        let (mut right_src, mut right_ty) = (right_src, right_ty);
                        // Equality across a String side forces the other side
                        // to String.
                        if left_ty == "String" && right_ty != "String" {
                            right_src = to_string_expr(&right_src, &right_ty);
                            right_ty = "String".to_string();
                        }
                        if right_ty == "String" && left_ty != "String" {
                            left_src = to_string_expr(&left_src, &left_ty);
                            left_ty = "String".to_string();
                        }
                        if is_numeric(&left_ty) && is_numeric(&right_ty) {
                            left_src = coerce(&left_src, &left_ty, "f64");
                            right_src = coerce(&right_src, &right_ty, "f64");
                        }
                        (
                            format!("({left_src} {operator} {right_src})"),
                            "bool".to_string(),
                        )
                    }

                    "<" | "<=" | ">" | ">=" => {
                        let left_num = coerce(&left_src, &left_ty, "f64");
                        let right_num = coerce(&right_src, &right_ty, "f64");
                        (
                            format!("({left_num} {operator} {right_num})"),
                            "bool".to_string(),
                        )
                    }

                    "&&" | "||" => {
                        let left_bool = coerce(&left_src, &left_ty, "bool");
                        let right_bool = coerce(&right_src, &right_ty, "bool");
                        (
                            format!("({left_bool} {operator} {right_bool})"),
                            "bool".to_string(),
                        )
                    }

                    _ => ("0.0".to_string(), "f64".to_string()),
                }
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
                                .map_or_else(|| "unknown".to_string(), |id| self.emit_expr(graph, id).0)
                        },
                        str::to_string,
                    );

                let arg_ids = graph.child_ids(node_id, "arg");
                let expected: Vec<String> = self
                    .state
                    .borrow()
                    .function_param_types
                    .get(&callee)
                    .cloned()
                    .unwrap_or_else(|| vec!["f64".to_string(); arg_ids.len()]);

                let args: Vec<String> = arg_ids
                    .iter()
                    .enumerate()
                    .map(|(idx, arg_id)| {
                        let (arg_src, arg_ty) = self.emit_expr(graph, arg_id);
                        let target = expected.get(idx).cloned().unwrap_or_else(|| arg_ty.clone());
                        coerce(&arg_src, &arg_ty, &target)
                    })
                    .collect();

                let return_type = self
                    .state
                    .borrow()
                    .function_return_types
                    .get(&callee)
                    .cloned()
                    .unwrap_or_else(|| "f64".to_string());
                (format!("{callee}({})", args.join(", ")), return_type)
            }

            "LambdaIntent" => {
                let params = params_of(node);
                {
                    let mut state = self.state.borrow_mut();
                    state.push_scope();
                    for (p_name, p_hint) in &params {
                        state.define(p_name, symbolic_to_rust(p_hint.as_deref()));
                    }
                }
                let body = graph
                    .child_ids(node_id, "body")
                    .first()
                    .map_or_else(|| "0.0".to_string(), |id| self.emit_expr(graph, id).0);
                self.state.borrow_mut().pop_scope();

                let names: Vec<String> = params.iter().map(|(n, _)| n.clone()).collect();
                (format!("|{}| {body}", names.join(", ")), "Fn".to_string())
            }

            _ => ("0.0".to_string(), "f64".to_string()),
        }
    }
}

impl BackendEmitter for RustBackend {
    fn name(&self) -> &'static str {
        "rust"
    }

    fn emit_module(&self, graph: &IntentGraph, _context: &ExpansionContext) -> String {
        let Some(root_id) = graph.root_id.as_deref() else {
            return String::new();
        };
        *self.state.borrow_mut() = EmitState::default();

        let mut function_ids: Vec<String> = Vec::new();
        let mut main_ids: Vec<String> = Vec::new();
        for stmt_id in graph.child_ids(root_id, "contains") {
            if graph.nodes[&stmt_id].kind == "FuncIntent" {
                function_ids.push(stmt_id);
            } else {
                main_ids.push(stmt_id);
            }
        }

        self.collect_function_signatures(graph, &function_ids);

        let mut lines: Vec<String> = Vec::new();
        for fn_id in &function_ids {
            lines.extend(self.emit_function(graph, fn_id, 0));
            lines.push(String::new());
        }

        lines.push("fn main() {".to_string());
        self.state.borrow_mut().push_scope();
        if main_ids.is_empty() {
            lines.push(indent("// empty", 1));
        } else {
            for stmt_id in &main_ids {
                let (stmt_lines, _) = self.emit_stmt(graph, stmt_id, 1);
                lines.extend(stmt_lines);
            }
        }
        self.state.borrow_mut().pop_scope();
        lines.push("}".to_string());

        format!("{}\n", lines.join("\n").trim_end())
    }
}

fn attr_str(node: &IntentNode, key: &str) -> String {
    node.attrs
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string()
}

fn params_of(node: &IntentNode) -> Vec<(String, Option<String>)> {
    node.attrs
        .get("params")
        .and_then(Value::as_array)
        .map(|params| {
            params
                .iter()
                .map(|p| {
                    (
                        p.get("name")
                            .and_then(Value::as_str)
                            .unwrap_or("")
                            .to_string(),
                        p.get("type_hint")
                            .and_then(Value::as_str)
                            .map(str::to_string),
                    )
                })
                .collect()
        })
        .unwrap_or_default()
}

fn symbolic_to_rust(type_hint: Option<&str>) -> &'static str {
    match type_hint {
        Some("Bool") => "bool",
        Some("Str") => "String",
        Some("Void") => "()",
        // Any, Num, Fn, unknown names, and missing hints all land on f64.
        _ => "f64",
    }
}

fn normalize_decl_type(inferred: &str) -> String {
    match inferred {
        "f64" | "i64" | "bool" | "String" | "()" | "Fn" => inferred.to_string(),
        _ => "f64".to_string(),
    }
}

/// Fixed pairwise coercion table between emitted Rust types.
fn coerce(expr_src: &str, from_ty: &str, to_ty: &str) -> String {
    if from_ty == to_ty {
        return expr_src.to_string();
    }
    if from_ty == "Fn" || to_ty == "Fn" {
        return expr_src.to_string();
    }

    match (from_ty, to_ty) {
        ("i64", "f64") => format!("({expr_src} as f64)"),
        ("f64", "i64") => format!("({expr_src} as i64)"),
        ("bool", "f64") => format!("(if {expr_src} {{ 1.0 }} else {{ 0.0 }})"),
        ("f64", "bool") => format!("({expr_src} != 0.0)"),
        ("i64", "bool") => format!("({expr_src} != 0)"),
        ("String", "bool") => format!("(!{expr_src}.is_empty())"),
        (_, "String") => to_string_expr(expr_src, from_ty),
        _ => expr_src.to_string(),
    }
}

fn is_numeric(ty: &str) -> bool {
    ty == "f64" || ty == "i64"
}

fn to_string_expr(expr_src: &str, from_ty: &str) -> String {
    match from_ty {
        "String" => expr_src.to_string(),
        "bool" | "f64" | "i64" => format!("({expr_src}).to_string()"),
        _ => format!("format!(\"{{:?}}\", {expr_src})"),
    }
}

fn default_value(rust_type: &str) -> &'static str {
    match rust_type {
        "bool" => "false",
        "String" => "String::new()",
        "()" => "()",
        "i64" => "0",
        _ => "0.0",
    }
}

/// Numbers always render as `f64` literals (integers gain `.0`).
fn render_number(value: &Value) -> String {
    match value {
        Value::Number(n) if n.is_i64() => format!("{}.0", n),
        Value::Number(n) => {
            let text = n.to_string();
            if text.contains('.') || text.contains('e') || text.contains('E') {
                text
            } else {
                format!("{text}.0")
            }
        }
        _ => "0.0".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::IntentGraphBuilder;
    use crate::lexer::Lexer;
    use crate::parser::Parser;
    use crate::lowering::{lowered_to_graph, Feature, Lowerer};
    use crate::semantic::SemanticAnalyzer;

    fn emit(source: &str) -> String {
        // The rust backend consumes lowered-shaped graphs (expr bodies already
        // canonicalized to block bodies).
        let tokens = Lexer::new(source, "<test>").tokenize().expect("lex");
        let program = Parser::new(tokens).parse_program().expect("parse");
        let semantic = SemanticAnalyzer::new().analyze(&program).expect("semantic");
        let ir = crate::ir::IrBuilder::new(&semantic)
            .build(&program)
            .expect("ir");
        let coverage = Feature::catalog().into_iter().map(|f| (f, true)).collect();
        let lowered = Lowerer::new().lower(&ir, "rust", &coverage).expect("lower");
        let graph = lowered_to_graph(&lowered);
        RustBackend::new().emit_module(&graph, &ExpansionContext::for_target("rust"))
    }

    fn emit_ast_graph(source: &str) -> String {
        let tokens = Lexer::new(source, "<test>").tokenize().expect("lex");
        let program = Parser::new(tokens).parse_program().expect("parse");
        let graph = IntentGraphBuilder::new().build(&program);
        RustBackend::new().emit_module(&graph, &ExpansionContext::for_target("rust"))
    }

    #[test]
    fn top_level_statements_wrap_in_main() {
        let code = emit("x := 1;");
        assert!(code.contains("fn main() {"));
        assert!(code.contains("let mut x: f64 = 1.0;"));
        assert!(code.trim_end().ends_with('}'));
    }

    #[test]
    fn functions_emit_before_main() {
        let code = emit("fn add(a:Num, b:Num):Num => a + b; out := add(1, 2);");
        let fn_pos = code.find("fn add(a: f64, b: f64) -> f64 {").expect("signature");
        let main_pos = code.find("fn main() {").expect("main");
        assert!(fn_pos < main_pos);
        assert!(code.contains("return (a + b);"));
    }

    #[test]
    fn loop_iterator_is_i64_and_coerces_in_arithmetic() {
        let code = emit("sum := 0; loop i in 0..3 { sum := sum + i; }");
        assert!(code.contains("for i in ((0.0 as i64))..((3.0 as i64)) {"));
        assert!(code.contains("sum = ((sum + (i as f64)));") || code.contains("sum = (sum + (i as f64));"));
    }

    #[test]
    fn print_becomes_println_debug() {
        let code = emit("print(1);");
        assert!(code.contains("println!(\"{:?}\", 1.0);"));
    }

    #[test]
    fn string_concat_uses_format() {
        let code = emit("s := \"a\" + \"b\";");
        assert!(code.contains("format!(\"{}{}\", \"a\".to_string(), \"b\".to_string())"));
        assert!(code.contains("let mut s: String ="));
    }

    #[test]
    fn missing_return_appends_default() {
        let code = emit("fn noop(a:Num) { x := a; }");
        assert!(code.contains("return 0.0;"));
    }

    #[test]
    fn bool_condition_reused_directly() {
        let code = emit("ok := true; if ok ? { print(1); }");
        assert!(code.contains("let mut ok: bool = true;"));
        assert!(code.contains("if ok {"));
    }

    #[test]
    fn closure_assignment_has_no_type_annotation() {
        let code = emit("f := lam (a) => a + 1.0; g := f;");
        assert!(code.contains("let mut f = |a|"));
    }

    #[test]
    fn ast_shaped_graph_expr_body_function_still_renders() {
        // FuncIntent with expr_body=true has no contains_body edges; the
        // emitter falls back to the default return.
        let code = emit_ast_graph("fn one() => 1;");
        assert!(code.contains("fn one() -> f64 {"));
        assert!(code.contains("return 0.0;"));
    }
}
