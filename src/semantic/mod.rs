//! # Semantic Analysis
//!
//! Scope building, symbol binding, and gradual type inference over the AST.
//!
//! Two-phase walk: the first pass registers every top-level `fn` signature in
//! the module scope so forward references resolve; the second pass walks
//! statements in order in a fresh scope chain. Scopes live in an arena with
//! parent indices and are discarded once the [`SemanticResult`] is produced.
//!
//! ```text
//! Program (expanded AST) -> [SemanticAnalyzer] -> SemanticResult -> IR Builder
//! ```

use std::collections::HashMap;

use crate::ast::{BinOp, Expr, ExprKind, NodeId, Program, Stmt, StmtKind, UnaryOp};
use crate::errors::CompileError;

pub mod types {
    //! The closed gradual type vocabulary. Annotations outside this set are
    //! carried opaquely and are only compatible with `Any`.

    pub const ANY: &str = "Any";
    pub const NUM: &str = "Num";
    pub const STR: &str = "Str";
    pub const BOOL: &str = "Bool";
    pub const VOID: &str = "Void";
    pub const FN: &str = "Fn";

    /// Gradual compatibility: `Any` on either side always passes, otherwise
    /// the names must match exactly.
    pub fn is_compatible(expected: &str, actual: &str) -> bool {
        expected == ANY || actual == ANY || expected == actual
    }

    pub fn is_num_like(name: &str) -> bool {
        name == NUM || name == ANY
    }

    pub fn is_bool_like(name: &str) -> bool {
        name == BOOL || name == ANY
    }
}

use types::{ANY, BOOL, FN, NUM, STR, VOID};

/// Symbol table entry for variables and functions.
#[derive(Debug, Clone)]
pub struct SymbolInfo {
    pub name: String,
    pub type_name: String,
    pub is_function: bool,
    pub arity: Option<usize>,
    pub return_type: Option<String>,
    pub param_types: Vec<String>,
}

impl SymbolInfo {
    fn variable(name: &str, type_name: &str) -> Self {
        SymbolInfo {
            name: name.to_string(),
            type_name: type_name.to_string(),
            is_function: false,
            arity: None,
            return_type: None,
            param_types: Vec::new(),
        }
    }
}

/// Scope arena index.
type ScopeId = usize;

#[derive(Debug, Default)]
struct Scope {
    parent: Option<ScopeId>,
    symbols: HashMap<String, SymbolInfo>,
}

/// Arena of lexical scopes with parent chaining.
#[derive(Debug, Default)]
struct ScopeArena {
    scopes: Vec<Scope>,
}

impl ScopeArena {
    fn push(&mut self, parent: Option<ScopeId>) -> ScopeId {
        self.scopes.push(Scope {
            parent,
            symbols: HashMap::new(),
        });
        self.scopes.len() - 1
    }

    fn define(&mut self, scope: ScopeId, symbol: SymbolInfo) {
        self.scopes[scope].symbols.insert(symbol.name.clone(), symbol);
    }

    fn defined_locally(&self, scope: ScopeId, name: &str) -> bool {
        self.scopes[scope].symbols.contains_key(name)
    }

    /// A symbol resolves iff defined in the given scope or an ancestor.
    fn resolve(&self, scope: ScopeId, name: &str) -> Option<&SymbolInfo> {
        let mut current = Some(scope);
        while let Some(idx) = current {
            if let Some(found) = self.scopes[idx].symbols.get(name) {
                return Some(found);
            }
            current = self.scopes[idx].parent;
        }
        None
    }
}

/// Semantic model output consumed by the IR builder.
#[derive(Debug, Clone, Default)]
pub struct SemanticResult {
    /// Inferred type name per expression node.
    pub inferred_expr_types: HashMap<NodeId, String>,
}

impl SemanticResult {
    pub fn expr_type(&self, id: NodeId) -> Option<&str> {
        self.inferred_expr_types.get(&id).map(String::as_str)
    }
}

/// Performs scope, binding, and type checks.
#[derive(Default)]
pub struct SemanticAnalyzer {
    arena: ScopeArena,
    expr_types: HashMap<NodeId, String>,
}

impl SemanticAnalyzer {
    pub fn new() -> Self {
        SemanticAnalyzer::default()
    }

    /// Run semantic analysis for a full AST.
    pub fn analyze(mut self, program: &Program) -> Result<SemanticResult, CompileError> {
        let global = self.arena.push(None);
        self.define_builtins(global);

        for stmt in &program.statements {
            if let StmtKind::FunctionDef { .. } = &stmt.kind {
                self.register_function_signature(global, stmt)?;
            }
        }

        for stmt in &program.statements {
            self.analyze_stmt(stmt, global, false, None)?;
        }

        tracing::debug!(
            expressions = self.expr_types.len(),
            "semantic analysis complete"
        );
        Ok(SemanticResult {
            inferred_expr_types: self.expr_types,
        })
    }

    fn define_builtins(&mut self, scope: ScopeId) {
        self.arena.define(
            scope,
            SymbolInfo {
                name: "print".to_string(),
                type_name: FN.to_string(),
                is_function: true,
                arity: Some(1),
                return_type: Some(VOID.to_string()),
                param_types: vec![ANY.to_string()],
            },
        );
    }

    fn register_function_signature(
        &mut self,
        scope: ScopeId,
        stmt: &Stmt,
    ) -> Result<(), CompileError> {
        let StmtKind::FunctionDef {
            name,
            params,
            return_type,
            ..
        } = &stmt.kind
        else {
            return Ok(());
        };

        if self.arena.defined_locally(scope, name) {
            return Err(CompileError::semantic(
                "SEM001",
                format!("Function '{name}' is already defined in this scope."),
                Some(stmt.span.clone()),
                "Use a unique function name or rename the existing function.",
            ));
        }

        let param_types: Vec<String> = params
            .iter()
            .map(|p| p.type_hint.clone().unwrap_or_else(|| ANY.to_string()))
            .collect();
        self.arena.define(
            scope,
            SymbolInfo {
                name: name.clone(),
                type_name: FN.to_string(),
                is_function: true,
                arity: Some(params.len()),
                return_type: Some(return_type.clone().unwrap_or_else(|| ANY.to_string())),
                param_types,
            },
        );
        Ok(())
    }

    /// Analyze a statement; the returned flag reports whether it is guaranteed
    /// to return on every path.
    fn analyze_stmt(
        &mut self,
        stmt: &Stmt,
        scope: ScopeId,
        in_function: bool,
        expected_return_type: Option<&str>,
    ) -> Result<bool, CompileError> {
        match &stmt.kind {
            StmtKind::Assignment {
                name,
                type_hint,
                value,
            } => {
                let value_type = self.infer_expr_type(value, scope)?;
                if let Some(hint) = type_hint {
                    if !types::is_compatible(hint, &value_type) {
                        return Err(CompileError::semantic(
                            "SEM002",
                            format!(
                                "Cannot assign value of type '{value_type}' to '{name}' annotated as '{hint}'."
                            ),
                            Some(stmt.span.clone()),
                            "Align annotation with expression type or cast in source.",
                        ));
                    }
                }
                let target_type = type_hint.clone().unwrap_or(value_type);
                self.arena
                    .define(scope, SymbolInfo::variable(name, &target_type));
                Ok(false)
            }

            StmtKind::Expression { expr } => {
                self.infer_expr_type(expr, scope)?;
                Ok(false)
            }

            StmtKind::If {
                condition,
                then_block,
                else_block,
            } => {
                let cond_type = self.infer_expr_type(condition, scope)?;
                if !types::is_bool_like(&cond_type) {
                    return Err(CompileError::semantic(
                        "SEM003",
                        format!("If condition expects Bool, got '{cond_type}'."),
                        Some(condition.span.clone()),
                        "Use comparison/logical expressions for conditions.",
                    ));
                }

                let then_scope = self.arena.push(Some(scope));
                let mut then_returns = false;
                for item in then_block {
                    then_returns = self
                        .analyze_stmt(item, then_scope, in_function, expected_return_type)?
                        || then_returns;
                }

                let else_scope = self.arena.push(Some(scope));
                let mut else_returns = false;
                for item in else_block {
                    else_returns = self
                        .analyze_stmt(item, else_scope, in_function, expected_return_type)?
                        || else_returns;
                }

                // An if returns on every path only when both branches do.
                Ok(then_returns && else_returns && !else_block.is_empty())
            }

            StmtKind::Loop {
                iterator,
                start,
                end,
                body,
            } => {
                let start_type = self.infer_expr_type(start, scope)?;
                let end_type = self.infer_expr_type(end, scope)?;
                if !types::is_num_like(&start_type) || !types::is_num_like(&end_type) {
                    return Err(CompileError::semantic(
                        "SEM004",
                        "Loop bounds must evaluate to Num.".to_string(),
                        Some(stmt.span.clone()),
                        "Convert loop bound expressions to numbers.",
                    ));
                }
                let loop_scope = self.arena.push(Some(scope));
                self.arena
                    .define(loop_scope, SymbolInfo::variable(iterator, NUM));
                for item in body {
                    self.analyze_stmt(item, loop_scope, in_function, expected_return_type)?;
                }
                Ok(false)
            }

            StmtKind::FunctionDef {
                name,
                params,
                body,
                expr_body,
                return_type,
            } => {
                let symbol = self.arena.resolve(scope, name).cloned();
                let Some(symbol) = symbol.filter(|s| s.is_function) else {
                    return Err(CompileError::semantic(
                        "SEM005",
                        format!("Function signature for '{name}' is missing."),
                        Some(stmt.span.clone()),
                        "Function signatures must be registered before body analysis.",
                    ));
                };
                self.analyze_function_body(
                    stmt,
                    &symbol,
                    params,
                    body,
                    expr_body.as_ref(),
                    return_type.as_deref(),
                    scope,
                    name,
                )
            }

            StmtKind::Return { value } => {
                if !in_function {
                    return Err(CompileError::semantic(
                        "SEM008",
                        "Return statements are only valid inside functions.".to_string(),
                        Some(stmt.span.clone()),
                        "Move ret into a fn block or remove it.",
                    ));
                }
                let value_type = match value {
                    Some(expr) => self.infer_expr_type(expr, scope)?,
                    None => VOID.to_string(),
                };
                if let Some(expected) = expected_return_type {
                    if !types::is_compatible(expected, &value_type) {
                        return Err(CompileError::semantic(
                            "SEM009",
                            format!(
                                "Return type '{value_type}' does not satisfy expected '{expected}'."
                            ),
                            Some(stmt.span.clone()),
                            "Change ret expression or function return annotation.",
                        ));
                    }
                }
                Ok(true)
            }

            StmtKind::Macro { name, .. } => Err(CompileError::semantic(
                "SEM010",
                format!("Unexpanded macro '#{name}' reached semantic analysis."),
                Some(stmt.span.clone()),
                "Register a macro plugin for this macro or remove it.",
            )),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn analyze_function_body(
        &mut self,
        stmt: &Stmt,
        symbol: &SymbolInfo,
        params: &[crate::ast::Param],
        body: &[Stmt],
        expr_body: Option<&Expr>,
        return_type: Option<&str>,
        scope: ScopeId,
        name: &str,
    ) -> Result<bool, CompileError> {
        let fn_scope = self.arena.push(Some(scope));
        for (idx, param) in params.iter().enumerate() {
            let param_type = symbol
                .param_types
                .get(idx)
                .cloned()
                .unwrap_or_else(|| ANY.to_string());
            self.arena
                .define(fn_scope, SymbolInfo::variable(&param.name, &param_type));
        }

        if let Some(expr) = expr_body {
            let expr_type = self.infer_expr_type(expr, fn_scope)?;
            if let Some(annotated) = return_type {
                if !types::is_compatible(annotated, &expr_type) {
                    return Err(CompileError::semantic(
                        "SEM006",
                        format!(
                            "Function '{name}' returns '{expr_type}' but is annotated as '{annotated}'."
                        ),
                        Some(expr.span.clone()),
                        "Adjust return annotation or expression type.",
                    ));
                }
            }
            return Ok(false);
        }

        let mut found_return = false;
        for item in body {
            found_return = self.analyze_stmt(item, fn_scope, true, return_type)? || found_return;
        }

        if let Some(annotated) = return_type {
            if annotated != VOID && !found_return {
                return Err(CompileError::semantic(
                    "SEM007",
                    format!("Function '{name}' is missing a return value."),
                    Some(stmt.span.clone()),
                    "Add a ret statement in all execution paths.",
                ));
            }
        }
        Ok(false)
    }

    fn infer_expr_type(&mut self, expr: &Expr, scope: ScopeId) -> Result<String, CompileError> {
        match &expr.kind {
            ExprKind::Literal { value } => {
                let type_name = match value {
                    crate::ast::LiteralValue::Bool(_) => BOOL,
                    crate::ast::LiteralValue::Int(_) | crate::ast::LiteralValue::Float(_) => NUM,
                    crate::ast::LiteralValue::Str(_) => STR,
                };
                Ok(self.record(expr.id, type_name.to_string()))
            }

            ExprKind::Identifier { name } => {
                let Some(symbol) = self.arena.resolve(scope, name) else {
                    return Err(CompileError::semantic(
                        "SEM011",
                        format!("Undefined symbol '{name}'."),
                        Some(expr.span.clone()),
                        "Declare the variable or function before use.",
                    ));
                };
                let type_name = if symbol.is_function {
                    FN.to_string()
                } else {
                    symbol.type_name.clone()
                };
                Ok(self.record(expr.id, type_name))
            }

            ExprKind::Unary { op, operand } => {
                let operand_type = self.infer_expr_type(operand, scope)?;
                match op {
                    UnaryOp::Not => {
                        if !types::is_bool_like(&operand_type) {
                            return Err(CompileError::semantic(
                                "SEM012",
                                format!("Unary '!' expects Bool, got '{operand_type}'."),
                                Some(expr.span.clone()),
                                "Use '!' with boolean expressions.",
                            ));
                        }
                        Ok(self.record(expr.id, BOOL.to_string()))
                    }
                    UnaryOp::Neg | UnaryOp::Pos => {
                        if !types::is_num_like(&operand_type) {
                            return Err(CompileError::semantic(
                                "SEM013",
                                format!(
                                    "Unary '{}' expects Num, got '{operand_type}'.",
                                    op.as_str()
                                ),
                                Some(expr.span.clone()),
                                "Use numeric expressions with unary +/-.",
                            ));
                        }
                        Ok(self.record(expr.id, NUM.to_string()))
                    }
                }
            }

            ExprKind::Binary { left, op, right } => {
                let left_type = self.infer_expr_type(left, scope)?;
                let right_type = self.infer_expr_type(right, scope)?;

                if op.is_arithmetic() {
                    // `+` on Str,Str is concatenation.
                    if *op == BinOp::Add && left_type == STR && right_type == STR {
                        return Ok(self.record(expr.id, STR.to_string()));
                    }
                    if types::is_num_like(&left_type) && types::is_num_like(&right_type) {
                        return Ok(self.record(expr.id, NUM.to_string()));
                    }
                    return Err(CompileError::semantic(
                        "SEM014",
                        format!("Operator '{}' requires numeric operands.", op.as_str()),
                        Some(expr.span.clone()),
                        "Use Num operands or convert expression types.",
                    ));
                }

                if matches!(op, BinOp::Eq | BinOp::Ne) {
                    return Ok(self.record(expr.id, BOOL.to_string()));
                }

                if op.is_comparison() {
                    if !types::is_num_like(&left_type) || !types::is_num_like(&right_type) {
                        return Err(CompileError::semantic(
                            "SEM015",
                            format!(
                                "Comparison '{}' requires Num-compatible operands.",
                                op.as_str()
                            ),
                            Some(expr.span.clone()),
                            "Compare numeric values for ordering operators.",
                        ));
                    }
                    return Ok(self.record(expr.id, BOOL.to_string()));
                }

                // Logic operators remain.
                if !types::is_bool_like(&left_type) || !types::is_bool_like(&right_type) {
                    return Err(CompileError::semantic(
                        "SEM016",
                        format!(
                            "Logical operator '{}' requires Bool operands.",
                            op.as_str()
                        ),
                        Some(expr.span.clone()),
                        "Use logical operators with boolean expressions.",
                    ));
                }
                Ok(self.record(expr.id, BOOL.to_string()))
            }

            ExprKind::Lambda {
                params,
                body,
                return_type,
            } => {
                let lambda_scope = self.arena.push(Some(scope));
                for param in params {
                    let param_type = param.type_hint.clone().unwrap_or_else(|| ANY.to_string());
                    self.arena
                        .define(lambda_scope, SymbolInfo::variable(&param.name, &param_type));
                }
                let body_type = self.infer_expr_type(body, lambda_scope)?;
                if let Some(annotated) = return_type {
                    if !types::is_compatible(annotated, &body_type) {
                        return Err(CompileError::semantic(
                            "SEM021",
                            format!(
                                "Lambda returns '{body_type}' but is annotated as '{annotated}'."
                            ),
                            Some(expr.span.clone()),
                            "Adjust lambda return annotation or expression type.",
                        ));
                    }
                }
                Ok(self.record(expr.id, FN.to_string()))
            }

            ExprKind::Call { callee, args, .. } => {
                for arg in args {
                    self.infer_expr_type(arg, scope)?;
                }

                let callee_type = self.infer_expr_type(callee, scope)?;
                if let ExprKind::Identifier { name } = &callee.kind {
                    let Some(symbol) = self.arena.resolve(scope, name).cloned() else {
                        return Err(CompileError::semantic(
                            "SEM017",
                            format!("Call target '{name}' is undefined."),
                            Some(expr.span.clone()),
                            "Define function before calling it.",
                        ));
                    };
                    if symbol.is_function {
                        if let Some(arity) = symbol.arity {
                            if arity != args.len() {
                                return Err(CompileError::semantic(
                                    "SEM019",
                                    format!(
                                        "Function '{name}' expects {arity} args, got {}.",
                                        args.len()
                                    ),
                                    Some(expr.span.clone()),
                                    "Adjust call argument count.",
                                ));
                            }
                        }
                        let return_type =
                            symbol.return_type.unwrap_or_else(|| ANY.to_string());
                        return Ok(self.record(expr.id, return_type));
                    }
                    if symbol.type_name == FN || symbol.type_name == ANY {
                        return Ok(self.record(expr.id, ANY.to_string()));
                    }
                    return Err(CompileError::semantic(
                        "SEM018",
                        format!("Symbol '{name}' is not callable."),
                        Some(expr.span.clone()),
                        "Only function symbols or Fn-typed values can be invoked.",
                    ));
                }

                // Dynamic callee: allowed when the inferred type is callable.
                if callee_type != FN && callee_type != ANY {
                    return Err(CompileError::semantic(
                        "SEM020",
                        "Call expression target is not callable.".to_string(),
                        Some(expr.span.clone()),
                        "Use identifier/function references as call targets.",
                    ));
                }
                Ok(self.record(expr.id, ANY.to_string()))
            }
        }
    }

    fn record(&mut self, id: NodeId, inferred: String) -> String {
        self.expr_types.insert(id, inferred.clone());
        inferred
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;
    use crate::parser::Parser;

    fn analyze(source: &str) -> Result<SemanticResult, CompileError> {
        let tokens = Lexer::new(source, "<test>").tokenize()?;
        let program = Parser::new(tokens).parse_program()?;
        SemanticAnalyzer::new().analyze(&program)
    }

    #[test]
    fn forward_reference_within_module_is_legal() {
        analyze("out := later(1); fn later(n) => n;").expect("forward reference should resolve");
    }

    #[test]
    fn return_outside_function_is_sem008() {
        let err = analyze("ret 1;").expect_err("should fail");
        assert_eq!(err.code(), "SEM008");
    }

    #[test]
    fn annotation_mismatch_is_sem002() {
        let err = analyze("x:Num := \"hello\";").expect_err("should fail");
        assert_eq!(err.code(), "SEM002");
    }

    #[test]
    fn arity_mismatch_is_sem019() {
        let err = analyze("fn add(a,b)=>a+b; x := add(1);").expect_err("should fail");
        assert_eq!(err.code(), "SEM019");
    }

    #[test]
    fn undefined_symbol_is_sem011() {
        let err = analyze("y := missing + 1;").expect_err("should fail");
        assert_eq!(err.code(), "SEM011");
    }

    #[test]
    fn string_concat_infers_str() {
        let result = analyze("s := \"a\" + \"b\";").expect("analyze");
        assert!(result
            .inferred_expr_types
            .values()
            .any(|t| t == types::STR));
    }

    #[test]
    fn arithmetic_on_strings_is_sem014() {
        let err = analyze("s := \"a\" - \"b\";").expect_err("should fail");
        assert_eq!(err.code(), "SEM014");
    }

    #[test]
    fn loop_iterator_is_num_inside_body() {
        analyze("loop i in 0..3 { x := i + 1; }").expect("iterator should type as Num");
    }

    #[test]
    fn non_void_function_must_return_on_every_path() {
        let err = analyze("fn f(n):Num { if n > 1 ? { ret 1; } }").expect_err("should fail");
        assert_eq!(err.code(), "SEM007");
        analyze("fn f(n):Num { if n > 1 ? { ret 1; } : { ret 2; } }").expect("both branches return");
    }

    #[test]
    fn duplicate_function_is_sem001() {
        let err = analyze("fn f() => 1; fn f() => 2;").expect_err("should fail");
        assert_eq!(err.code(), "SEM001");
    }

    #[test]
    fn lambda_value_is_callable() {
        analyze("f := lam (a) => a + 1; x := f(2);").expect("lambda calls allowed");
    }

    #[test]
    fn calling_a_num_is_sem018() {
        let err = analyze("x := 1; y := x(2);").expect_err("should fail");
        assert_eq!(err.code(), "SEM018");
    }

    #[test]
    fn unexpanded_macro_is_sem010() {
        let err = analyze("#mystery(1);").expect_err("should fail");
        assert_eq!(err.code(), "SEM010");
    }

    #[test]
    fn unknown_annotation_only_compatible_with_any() {
        let err = analyze("x:Custom := 1;").expect_err("should fail");
        assert_eq!(err.code(), "SEM002");
        analyze("fn id(v) => v; x:Custom := id(1);").expect("Any value accepts any annotation");
    }
}
