//! # Lowering
//!
//! Turns target-agnostic IR into a target-shaped Lowered Module, gated by the
//! pack's declared feature coverage.
//!
//! The feature set of a module is computed by structural walk first; any
//! feature the pack declares `false` raises `LOW001` naming every missing
//! feature, before a single node is lowered. This separation is load-bearing:
//! the contract harness distinguishes `LOW001` from every other failure.
//!
//! ```text
//! IrModule + feature_coverage -> [Lowerer] -> LoweredModule -> pack.emit
//! ```

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::ast::LiteralValue;
use crate::errors::CompileError;
use crate::graph::IntentGraph;
use crate::ir::{IrExpr, IrExprKind, IrModule, IrStmt, IrStmtKind};
use crate::source_map::SourceSpan;

/// Closed feature catalog enforced by the lowerer.
///
/// `Lambda` is collected for analysis but absent from the coverage catalog;
/// a feature a manifest does not mention is treated as supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    Assignment,
    ExpressionStmt,
    If,
    Loop,
    Function,
    Return,
    Literal,
    Reference,
    Unary,
    Arithmetic,
    Comparison,
    Logic,
    Call,
    AtCall,
    TypedAnnotation,
    Lambda,
}

impl Feature {
    pub fn as_str(self) -> &'static str {
        match self {
            Feature::Assignment => "assignment",
            Feature::ExpressionStmt => "expression_stmt",
            Feature::If => "if",
            Feature::Loop => "loop",
            Feature::Function => "function",
            Feature::Return => "return",
            Feature::Literal => "literal",
            Feature::Reference => "reference",
            Feature::Unary => "unary",
            Feature::Arithmetic => "arithmetic",
            Feature::Comparison => "comparison",
            Feature::Logic => "logic",
            Feature::Call => "call",
            Feature::AtCall => "at_call",
            Feature::TypedAnnotation => "typed_annotation",
            Feature::Lambda => "lambda",
        }
    }

    /// The fifteen features of the closed coverage catalog.
    pub fn catalog() -> [Feature; 15] {
        [
            Feature::Assignment,
            Feature::ExpressionStmt,
            Feature::If,
            Feature::Loop,
            Feature::Function,
            Feature::Return,
            Feature::Literal,
            Feature::Reference,
            Feature::Unary,
            Feature::Arithmetic,
            Feature::Comparison,
            Feature::Logic,
            Feature::Call,
            Feature::AtCall,
            Feature::TypedAnnotation,
        ]
    }
}

impl std::fmt::Display for Feature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Collect the features an IR module requires, by structural walk.
pub fn collect_ir_features(module: &IrModule) -> BTreeSet<Feature> {
    let mut features = BTreeSet::new();
    for stmt in &module.statements {
        walk_stmt(stmt, &mut features);
    }
    features
}

fn walk_stmt(stmt: &IrStmt, features: &mut BTreeSet<Feature>) {
    match &stmt.kind {
        IrStmtKind::Assignment {
            type_hint, value, ..
        } => {
            features.insert(Feature::Assignment);
            if type_hint.is_some() {
                features.insert(Feature::TypedAnnotation);
            }
            walk_expr(value, features);
        }
        IrStmtKind::ExpressionStmt { expr } => {
            features.insert(Feature::ExpressionStmt);
            walk_expr(expr, features);
        }
        IrStmtKind::If {
            condition,
            then_block,
            else_block,
        } => {
            features.insert(Feature::If);
            walk_expr(condition, features);
            for item in then_block.iter().chain(else_block) {
                walk_stmt(item, features);
            }
        }
        IrStmtKind::Loop {
            start, end, body, ..
        } => {
            features.insert(Feature::Loop);
            walk_expr(start, features);
            walk_expr(end, features);
            for item in body {
                walk_stmt(item, features);
            }
        }
        IrStmtKind::Function {
            body, expr_body, ..
        } => {
            features.insert(Feature::Function);
            for item in body {
                walk_stmt(item, features);
            }
            if let Some(expr) = expr_body {
                walk_expr(expr, features);
            }
        }
        IrStmtKind::Return { value } => {
            features.insert(Feature::Return);
            if let Some(expr) = value {
                walk_expr(expr, features);
            }
        }
    }
}

fn walk_expr(expr: &IrExpr, features: &mut BTreeSet<Feature>) {
    match &expr.kind {
        IrExprKind::Literal { .. } => {
            features.insert(Feature::Literal);
        }
        IrExprKind::Ref { .. } => {
            features.insert(Feature::Reference);
        }
        IrExprKind::Unary { operand, .. } => {
            features.insert(Feature::Unary);
            walk_expr(operand, features);
        }
        IrExprKind::Binary {
            left,
            operator,
            right,
        } => {
            // Operator flavor distinguishes arithmetic/comparison/logic.
            let feature = match operator.as_str() {
                "&&" | "||" => Feature::Logic,
                "==" | "!=" | "<" | "<=" | ">" | ">=" => Feature::Comparison,
                _ => Feature::Arithmetic,
            };
            features.insert(feature);
            walk_expr(left, features);
            walk_expr(right, features);
        }
        IrExprKind::Call {
            callee,
            args,
            at_prefixed,
        } => {
            features.insert(Feature::Call);
            if *at_prefixed {
                features.insert(Feature::AtCall);
            }
            walk_expr(callee, features);
            for arg in args {
                walk_expr(arg, features);
            }
        }
        IrExprKind::Lambda { body, .. } => {
            features.insert(Feature::Lambda);
            walk_expr(body, features);
        }
    }
}

// ============================================================================
// Lowered model
// ============================================================================

/// Target-shaped lowered module ready for emission.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoweredModule {
    pub lowered_id: String,
    pub span: Option<SourceSpan>,
    pub ir_schema_version: String,
    pub target: String,
    pub statements: Vec<LoweredStmt>,
    /// Ordered helper names the pack must prepend to its output.
    pub required_helpers: Vec<String>,
    /// Soft warnings accumulated while lowering.
    pub diagnostics: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoweredParam {
    pub name: String,
    pub type_hint: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoweredStmt {
    pub lowered_id: String,
    pub span: Option<SourceSpan>,
    #[serde(flatten)]
    pub kind: LoweredStmtKind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "node_type", rename_all = "snake_case")]
pub enum LoweredStmtKind {
    Assignment {
        name: String,
        type_hint: Option<String>,
        value: LoweredExpr,
    },
    ExpressionStmt {
        expr: LoweredExpr,
    },
    If {
        condition: LoweredExpr,
        then_block: Vec<LoweredStmt>,
        else_block: Vec<LoweredStmt>,
    },
    Loop {
        iterator: String,
        start: LoweredExpr,
        end: LoweredExpr,
        body: Vec<LoweredStmt>,
    },
    Function {
        name: String,
        params: Vec<LoweredParam>,
        return_type: Option<String>,
        body: Vec<LoweredStmt>,
    },
    Return {
        value: Option<LoweredExpr>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoweredExpr {
    pub lowered_id: String,
    pub span: Option<SourceSpan>,
    pub expr_type: Option<String>,
    #[serde(flatten)]
    pub kind: LoweredExprKind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "node_type", rename_all = "snake_case")]
pub enum LoweredExprKind {
    Literal {
        value: LiteralValue,
    },
    Ref {
        name: String,
    },
    Unary {
        operator: String,
        operand: Box<LoweredExpr>,
    },
    Binary {
        left: Box<LoweredExpr>,
        operator: String,
        right: Box<LoweredExpr>,
    },
    Call {
        callee: Box<LoweredExpr>,
        args: Vec<LoweredExpr>,
    },
    Lambda {
        params: Vec<LoweredParam>,
        body: Box<LoweredExpr>,
        return_type: Option<String>,
    },
}

impl LoweredModule {
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Lowers canonical IR into target-shaped lowered nodes.
#[derive(Default)]
pub struct Lowerer {
    counter: u32,
}

impl Lowerer {
    pub fn new() -> Self {
        Lowerer::default()
    }

    /// Lower an IR module for a specific target under its feature coverage.
    pub fn lower(
        &mut self,
        module: &IrModule,
        target: &str,
        feature_coverage: &BTreeMap<Feature, bool>,
    ) -> Result<LoweredModule, CompileError> {
        let features = collect_ir_features(module);
        let mut missing: Vec<&str> = features
            .iter()
            .filter(|f| !feature_coverage.get(*f).copied().unwrap_or(true))
            .map(|f| f.as_str())
            .collect();
        missing.sort_unstable();
        if !missing.is_empty() {
            return Err(CompileError::lowering(
                "LOW001",
                format!(
                    "Target '{target}' does not support required features: {}.",
                    missing.join(", ")
                ),
                module.span.clone(),
                "Choose a compatible target or reduce source feature usage.",
            ));
        }

        let mut diagnostics: Vec<String> = Vec::new();
        let statements = module
            .statements
            .iter()
            .map(|stmt| self.lower_stmt(stmt, &mut diagnostics))
            .collect::<Result<Vec<_>, _>>()?;
        let required_helpers = required_helpers(&statements, target);

        tracing::debug!(pack = target, helpers = ?required_helpers, "lowered module");
        Ok(LoweredModule {
            lowered_id: self.new_id("lmod"),
            span: module.span.clone(),
            ir_schema_version: module.schema_version.clone(),
            target: target.to_string(),
            statements,
            required_helpers,
            diagnostics,
        })
    }

    fn lower_stmt(
        &mut self,
        stmt: &IrStmt,
        diagnostics: &mut Vec<String>,
    ) -> Result<LoweredStmt, CompileError> {
        let kind = match &stmt.kind {
            IrStmtKind::Assignment {
                name,
                type_hint,
                value,
            } => LoweredStmtKind::Assignment {
                name: name.clone(),
                type_hint: type_hint.clone(),
                value: self.lower_expr(value, diagnostics)?,
            },

            IrStmtKind::ExpressionStmt { expr } => LoweredStmtKind::ExpressionStmt {
                expr: self.lower_expr(expr, diagnostics)?,
            },

            IrStmtKind::If {
                condition,
                then_block,
                else_block,
            } => LoweredStmtKind::If {
                condition: self.lower_expr(condition, diagnostics)?,
                then_block: self.lower_block(then_block, diagnostics)?,
                else_block: self.lower_block(else_block, diagnostics)?,
            },

            IrStmtKind::Loop {
                iterator,
                start,
                end,
                body,
            } => LoweredStmtKind::Loop {
                iterator: iterator.clone(),
                start: self.lower_expr(start, diagnostics)?,
                end: self.lower_expr(end, diagnostics)?,
                body: self.lower_block(body, diagnostics)?,
            },

            IrStmtKind::Function {
                name,
                params,
                body,
                expr_body,
                return_type,
            } => {
                let mut lowered_body = self.lower_block(body, diagnostics)?;
                // Expression bodies canonicalize to a block with an appended
                // return carrying the expression.
                if let Some(expr) = expr_body {
                    let value = self.lower_expr(expr, diagnostics)?;
                    lowered_body.push(LoweredStmt {
                        lowered_id: self.new_id("lstmt"),
                        span: expr.span.clone(),
                        kind: LoweredStmtKind::Return { value: Some(value) },
                    });
                }
                LoweredStmtKind::Function {
                    name: name.clone(),
                    params: params
                        .iter()
                        .map(|p| LoweredParam {
                            name: p.name.clone(),
                            type_hint: p.type_hint.clone(),
                        })
                        .collect(),
                    return_type: return_type.clone(),
                    body: lowered_body,
                }
            }

            IrStmtKind::Return { value } => LoweredStmtKind::Return {
                value: value
                    .as_ref()
                    .map(|expr| self.lower_expr(expr, diagnostics))
                    .transpose()?,
            },
        };

        Ok(LoweredStmt {
            lowered_id: self.new_id("lstmt"),
            span: stmt.span.clone(),
            kind,
        })
    }

    fn lower_block(
        &mut self,
        block: &[IrStmt],
        diagnostics: &mut Vec<String>,
    ) -> Result<Vec<LoweredStmt>, CompileError> {
        block
            .iter()
            .map(|stmt| self.lower_stmt(stmt, diagnostics))
            .collect()
    }

    fn lower_expr(
        &mut self,
        expr: &IrExpr,
        diagnostics: &mut Vec<String>,
    ) -> Result<LoweredExpr, CompileError> {
        let kind = match &expr.kind {
            IrExprKind::Literal { value } => LoweredExprKind::Literal {
                value: value.clone(),
            },
            IrExprKind::Ref { name } => LoweredExprKind::Ref { name: name.clone() },
            IrExprKind::Unary { operator, operand } => LoweredExprKind::Unary {
                operator: operator.clone(),
                operand: Box::new(self.lower_expr(operand, diagnostics)?),
            },
            IrExprKind::Binary {
                left,
                operator,
                right,
            } => LoweredExprKind::Binary {
                left: Box::new(self.lower_expr(left, diagnostics)?),
                operator: operator.clone(),
                right: Box::new(self.lower_expr(right, diagnostics)?),
            },
            IrExprKind::Call { callee, args, .. } => LoweredExprKind::Call {
                callee: Box::new(self.lower_expr(callee, diagnostics)?),
                args: args
                    .iter()
                    .map(|arg| self.lower_expr(arg, diagnostics))
                    .collect::<Result<Vec<_>, _>>()?,
            },
            IrExprKind::Lambda {
                params,
                body,
                return_type,
            } => LoweredExprKind::Lambda {
                params: params
                    .iter()
                    .map(|p| LoweredParam {
                        name: p.name.clone(),
                        type_hint: p.type_hint.clone(),
                    })
                    .collect(),
                body: Box::new(self.lower_expr(body, diagnostics)?),
                return_type: return_type.clone(),
            },
        };

        Ok(LoweredExpr {
            lowered_id: self.new_id("lexpr"),
            span: expr.span.clone(),
            expr_type: expr.expr_type.clone(),
            kind,
        })
    }

    fn new_id(&mut self, prefix: &str) -> String {
        self.counter += 1;
        format!("{prefix}{}", self.counter)
    }
}

/// Helper names a target must prepend: `print` for web/JS family targets
/// whose tree transitively calls the `print` reference.
fn required_helpers(statements: &[LoweredStmt], target: &str) -> Vec<String> {
    let mut helpers: BTreeSet<String> = BTreeSet::new();
    if matches!(target, "web" | "js" | "typescript") && contains_print_call(statements) {
        helpers.insert("print".to_string());
    }
    helpers.into_iter().collect()
}

fn contains_print_call(statements: &[LoweredStmt]) -> bool {
    statements.iter().any(|stmt| match &stmt.kind {
        LoweredStmtKind::ExpressionStmt { expr } => expr_has_print(expr),
        LoweredStmtKind::Assignment { value, .. } => expr_has_print(value),
        LoweredStmtKind::If {
            condition,
            then_block,
            else_block,
        } => {
            expr_has_print(condition)
                || contains_print_call(then_block)
                || contains_print_call(else_block)
        }
        LoweredStmtKind::Loop {
            start, end, body, ..
        } => expr_has_print(start) || expr_has_print(end) || contains_print_call(body),
        LoweredStmtKind::Function { body, .. } => contains_print_call(body),
        LoweredStmtKind::Return { value } => value.as_ref().is_some_and(expr_has_print),
    })
}

fn expr_has_print(expr: &LoweredExpr) -> bool {
    match &expr.kind {
        LoweredExprKind::Call { callee, args } => {
            if matches!(&callee.kind, LoweredExprKind::Ref { name } if name == "print") {
                return true;
            }
            expr_has_print(callee) || args.iter().any(expr_has_print)
        }
        LoweredExprKind::Unary { operand, .. } => expr_has_print(operand),
        LoweredExprKind::Binary { left, right, .. } => expr_has_print(left) || expr_has_print(right),
        LoweredExprKind::Lambda { body, .. } => expr_has_print(body),
        LoweredExprKind::Literal { .. } | LoweredExprKind::Ref { .. } => false,
    }
}

// ============================================================================
// Lowered -> Intent Graph
// ============================================================================

/// Convert a lowered module into an IntentGraph for emitters and the
/// optimizer. Function nodes here always carry block bodies (`expr_body`
/// already canonicalized to an appended return).
pub fn lowered_to_graph(module: &LoweredModule) -> IntentGraph {
    let mut graph = IntentGraph::new();
    let mut counter: u32 = 0;
    let mut new_node_id = move || {
        counter += 1;
        format!("n{counter}")
    };

    let module_id = new_node_id();
    graph.add_node(
        &module_id,
        "ModuleIntent",
        [
            ("name".to_string(), serde_json::Value::from("module")),
            (
                "target".to_string(),
                serde_json::Value::from(module.target.clone()),
            ),
        ]
        .into_iter()
        .collect(),
    );
    graph.root_id = Some(module_id.clone());

    for (idx, stmt) in module.statements.iter().enumerate() {
        build_stmt(
            &mut graph,
            &mut new_node_id,
            stmt,
            &module_id,
            "contains",
            idx as i64,
        );
    }
    graph
}

fn build_stmt(
    graph: &mut IntentGraph,
    new_node_id: &mut impl FnMut() -> String,
    stmt: &LoweredStmt,
    parent_id: &str,
    edge_type: &str,
    order: i64,
) {
    let node_id = new_node_id();
    match &stmt.kind {
        LoweredStmtKind::Assignment {
            name,
            type_hint,
            value,
        } => {
            graph.add_node(
                &node_id,
                "AssignmentIntent",
                [
                    ("name".to_string(), serde_json::Value::from(name.clone())),
                    (
                        "type_hint".to_string(),
                        type_hint
                            .clone()
                            .map_or(serde_json::Value::Null, serde_json::Value::from),
                    ),
                ]
                .into_iter()
                .collect(),
            );
            let value_id = build_expr(graph, new_node_id, value);
            graph.add_edge(&node_id, &value_id, "value", Some(0));
        }

        LoweredStmtKind::ExpressionStmt { expr } => {
            graph.add_node(&node_id, "ExpressionIntent", BTreeMap::new());
            let expr_id = build_expr(graph, new_node_id, expr);
            graph.add_edge(&node_id, &expr_id, "expr", Some(0));
        }

        LoweredStmtKind::If {
            condition,
            then_block,
            else_block,
        } => {
            graph.add_node(
                &node_id,
                "ControlIntent",
                [("control".to_string(), serde_json::Value::from("if"))]
                    .into_iter()
                    .collect(),
            );
            let cond_id = build_expr(graph, new_node_id, condition);
            graph.add_edge(&node_id, &cond_id, "condition", Some(0));
            for (idx, item) in then_block.iter().enumerate() {
                build_stmt(graph, new_node_id, item, &node_id, "contains_then", idx as i64);
            }
            for (idx, item) in else_block.iter().enumerate() {
                build_stmt(graph, new_node_id, item, &node_id, "contains_else", idx as i64);
            }
        }

        LoweredStmtKind::Loop {
            iterator,
            start,
            end,
            body,
        } => {
            graph.add_node(
                &node_id,
                "LoopIntent",
                [(
                    "iterator".to_string(),
                    serde_json::Value::from(iterator.clone()),
                )]
                .into_iter()
                .collect(),
            );
            let start_id = build_expr(graph, new_node_id, start);
            let end_id = build_expr(graph, new_node_id, end);
            graph.add_edge(&node_id, &start_id, "start", Some(0));
            graph.add_edge(&node_id, &end_id, "end", Some(1));
            for (idx, item) in body.iter().enumerate() {
                build_stmt(graph, new_node_id, item, &node_id, "contains_body", idx as i64);
            }
        }

        LoweredStmtKind::Function {
            name,
            params,
            return_type,
            body,
        } => {
            graph.add_node(
                &node_id,
                "FuncIntent",
                [
                    ("name".to_string(), serde_json::Value::from(name.clone())),
                    (
                        "params".to_string(),
                        serde_json::Value::Array(
                            params
                                .iter()
                                .map(|p| {
                                    serde_json::json!({
                                        "name": p.name,
                                        "type_hint": p.type_hint,
                                    })
                                })
                                .collect(),
                        ),
                    ),
                    (
                        "return_type".to_string(),
                        return_type
                            .clone()
                            .map_or(serde_json::Value::Null, serde_json::Value::from),
                    ),
                    ("expr_body".to_string(), serde_json::Value::from(false)),
                ]
                .into_iter()
                .collect(),
            );
            for (idx, item) in body.iter().enumerate() {
                build_stmt(graph, new_node_id, item, &node_id, "contains_body", idx as i64);
            }
        }

        LoweredStmtKind::Return { value } => {
            graph.add_node(&node_id, "ReturnIntent", BTreeMap::new());
            if let Some(expr) = value {
                let value_id = build_expr(graph, new_node_id, expr);
                graph.add_edge(&node_id, &value_id, "value", Some(0));
            }
        }
    }

    graph.add_edge(parent_id, &node_id, edge_type, Some(order));
}

fn build_expr(
    graph: &mut IntentGraph,
    new_node_id: &mut impl FnMut() -> String,
    expr: &LoweredExpr,
) -> String {
    match &expr.kind {
        LoweredExprKind::Literal { value } => {
            let node_id = new_node_id();
            graph.add_node(
                &node_id,
                "LiteralIntent",
                [
                    ("value".to_string(), value.to_json()),
                    (
                        "value_type".to_string(),
                        serde_json::Value::from(value.type_tag()),
                    ),
                ]
                .into_iter()
                .collect(),
            );
            node_id
        }

        LoweredExprKind::Ref { name } => {
            let node_id = new_node_id();
            graph.add_node(
                &node_id,
                "RefIntent",
                [("name".to_string(), serde_json::Value::from(name.clone()))]
                    .into_iter()
                    .collect(),
            );
            node_id
        }

        LoweredExprKind::Unary { operator, operand } => {
            let node_id = new_node_id();
            graph.add_node(
                &node_id,
                "OperationIntent",
                [
                    (
                        "operator".to_string(),
                        serde_json::Value::from(operator.clone()),
                    ),
                    ("arity".to_string(), serde_json::Value::from(1)),
                ]
                .into_iter()
                .collect(),
            );
            let operand_id = build_expr(graph, new_node_id, operand);
            graph.add_edge(&node_id, &operand_id, "operand", Some(0));
            node_id
        }

        LoweredExprKind::Binary {
            left,
            operator,
            right,
        } => {
            let node_id = new_node_id();
            graph.add_node(
                &node_id,
                "OperationIntent",
                [
                    (
                        "operator".to_string(),
                        serde_json::Value::from(operator.clone()),
                    ),
                    ("arity".to_string(), serde_json::Value::from(2)),
                ]
                .into_iter()
                .collect(),
            );
            let left_id = build_expr(graph, new_node_id, left);
            let right_id = build_expr(graph, new_node_id, right);
            graph.add_edge(&node_id, &left_id, "operand", Some(0));
            graph.add_edge(&node_id, &right_id, "operand", Some(1));
            node_id
        }

        LoweredExprKind::Call { callee, args } => {
            let node_id = new_node_id();
            graph.add_node(&node_id, "CallIntent", BTreeMap::new());
            if let LoweredExprKind::Ref { name } = &callee.kind {
                if let Some(node) = graph.nodes.get_mut(&node_id) {
                    node.attrs.insert(
                        "callee_name".to_string(),
                        serde_json::Value::from(name.clone()),
                    );
                }
            } else {
                let callee_id = build_expr(graph, new_node_id, callee);
                graph.add_edge(&node_id, &callee_id, "callee", Some(0));
            }
            for (idx, arg) in args.iter().enumerate() {
                let arg_id = build_expr(graph, new_node_id, arg);
                graph.add_edge(&node_id, &arg_id, "arg", Some(idx as i64));
            }
            node_id
        }

        LoweredExprKind::Lambda {
            params,
            body,
            return_type,
        } => {
            let node_id = new_node_id();
            graph.add_node(
                &node_id,
                "LambdaIntent",
                [
                    (
                        "params".to_string(),
                        serde_json::Value::Array(
                            params
                                .iter()
                                .map(|p| {
                                    serde_json::json!({
                                        "name": p.name,
                                        "type_hint": p.type_hint,
                                    })
                                })
                                .collect(),
                        ),
                    ),
                    (
                        "return_type".to_string(),
                        return_type
                            .clone()
                            .map_or(serde_json::Value::Null, serde_json::Value::from),
                    ),
                ]
                .into_iter()
                .collect(),
            );
            let body_id = build_expr(graph, new_node_id, body);
            graph.add_edge(&node_id, &body_id, "body", Some(0));
            node_id
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::IrBuilder;
    use crate::lexer::Lexer;
    use crate::parser::Parser;
    use crate::semantic::SemanticAnalyzer;

    fn ir(source: &str) -> IrModule {
        let tokens = Lexer::new(source, "<test>").tokenize().expect("lex");
        let program = Parser::new(tokens).parse_program().expect("parse");
        let semantic = SemanticAnalyzer::new().analyze(&program).expect("semantic");
        IrBuilder::new(&semantic).build(&program).expect("ir")
    }

    fn full_coverage() -> BTreeMap<Feature, bool> {
        Feature::catalog().into_iter().map(|f| (f, true)).collect()
    }

    #[test]
    fn collects_operator_flavored_features() {
        let features = collect_ir_features(&ir("ok := 1 < 2 && true; s := 1 + 2;"));
        assert!(features.contains(&Feature::Comparison));
        assert!(features.contains(&Feature::Logic));
        assert!(features.contains(&Feature::Arithmetic));
        assert!(features.contains(&Feature::Assignment));
    }

    #[test]
    fn typed_annotation_detected() {
        let features = collect_ir_features(&ir("v:Num := 1;"));
        assert!(features.contains(&Feature::TypedAnnotation));
    }

    #[test]
    fn missing_feature_is_low001_naming_it() {
        let mut coverage = full_coverage();
        coverage.insert(Feature::TypedAnnotation, false);
        let err = Lowerer::new()
            .lower(&ir("v:Num := 1;"), "pseudo", &coverage)
            .expect_err("should fail");
        assert_eq!(err.code(), "LOW001");
        assert!(err.diagnostic().message.contains("typed_annotation"));
        assert!(err.diagnostic().span.is_some());
    }

    #[test]
    fn low001_names_every_missing_feature() {
        let mut coverage = full_coverage();
        coverage.insert(Feature::Logic, false);
        coverage.insert(Feature::TypedAnnotation, false);
        let err = Lowerer::new()
            .lower(&ir("v:Num := 1; ok := true && false;"), "pseudo", &coverage)
            .expect_err("should fail");
        let message = &err.diagnostic().message;
        assert!(message.contains("logic"));
        assert!(message.contains("typed_annotation"));
    }

    #[test]
    fn expr_body_canonicalizes_to_appended_return() {
        let lowered = Lowerer::new()
            .lower(&ir("fn add(a,b) => a + b;"), "python", &full_coverage())
            .expect("lower");
        let LoweredStmtKind::Function { body, .. } = &lowered.statements[0].kind else {
            panic!("expected function");
        };
        assert_eq!(body.len(), 1);
        assert!(matches!(body[0].kind, LoweredStmtKind::Return { .. }));
    }

    #[test]
    fn print_helper_required_for_js_only() {
        let module = ir("print(1);");
        let js = Lowerer::new()
            .lower(&module, "js", &full_coverage())
            .expect("lower");
        assert_eq!(js.required_helpers, vec!["print".to_string()]);

        let py = Lowerer::new()
            .lower(&module, "python", &full_coverage())
            .expect("lower");
        assert!(py.required_helpers.is_empty());
    }

    #[test]
    fn nested_print_call_detected() {
        let module = ir("fn shout(v) { print(v); } shout(1);");
        let lowered = Lowerer::new()
            .lower(&module, "web", &full_coverage())
            .expect("lower");
        assert_eq!(lowered.required_helpers, vec!["print".to_string()]);
    }

    #[test]
    fn no_print_no_helper() {
        let lowered = Lowerer::new()
            .lower(&ir("x := 1;"), "js", &full_coverage())
            .expect("lower");
        assert!(lowered.required_helpers.is_empty());
    }

    #[test]
    fn lowered_graph_has_module_root_with_target() {
        let lowered = Lowerer::new()
            .lower(&ir("x := 1;"), "js", &full_coverage())
            .expect("lower");
        let graph = lowered_to_graph(&lowered);
        let root = graph.root_id.clone().expect("root");
        assert_eq!(graph.nodes[&root].kind, "ModuleIntent");
        assert_eq!(graph.nodes[&root].attrs["target"], serde_json::json!("js"));
    }
}
