//! # Intermediate Representation
//!
//! Target-agnostic IR mirroring the AST shape but normalized: every node gets
//! a monotonically increasing `ir_id`, every expression copies its inferred
//! semantic type, and every statement copies its AST span. Macro invocations
//! must be fully expanded before IR construction - reaching this builder with
//! one is a pipeline invariant violation.
//!
//! ```text
//! Program (AST) + SemanticResult -> [IrBuilder] -> IrModule -> Lowerer
//! ```

use serde::Serialize;

use crate::ast::{Expr, ExprKind, LiteralValue, Program, Stmt, StmtKind};
use crate::errors::CompileError;
use crate::semantic::SemanticResult;
use crate::source_map::SourceSpan;

/// Schema tag recorded on every module for artifact consumers.
pub const IR_SCHEMA_VERSION: &str = "2.0";

/// Normalized function parameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IrParam {
    pub name: String,
    pub type_hint: Option<String>,
}

/// Top-level module IR container.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IrModule {
    pub ir_id: String,
    pub schema_version: String,
    pub span: Option<SourceSpan>,
    pub statements: Vec<IrStmt>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IrStmt {
    pub ir_id: String,
    pub span: Option<SourceSpan>,
    #[serde(flatten)]
    pub kind: IrStmtKind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "node_type", rename_all = "snake_case")]
pub enum IrStmtKind {
    Assignment {
        name: String,
        type_hint: Option<String>,
        value: IrExpr,
    },
    ExpressionStmt {
        expr: IrExpr,
    },
    If {
        condition: IrExpr,
        then_block: Vec<IrStmt>,
        else_block: Vec<IrStmt>,
    },
    Loop {
        iterator: String,
        start: IrExpr,
        end: IrExpr,
        body: Vec<IrStmt>,
    },
    Function {
        name: String,
        params: Vec<IrParam>,
        body: Vec<IrStmt>,
        expr_body: Option<IrExpr>,
        return_type: Option<String>,
    },
    Return {
        value: Option<IrExpr>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IrExpr {
    pub ir_id: String,
    pub span: Option<SourceSpan>,
    pub expr_type: Option<String>,
    #[serde(flatten)]
    pub kind: IrExprKind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "node_type", rename_all = "snake_case")]
pub enum IrExprKind {
    Literal {
        value: LiteralValue,
    },
    Ref {
        name: String,
    },
    Unary {
        operator: String,
        operand: Box<IrExpr>,
    },
    Binary {
        left: Box<IrExpr>,
        operator: String,
        right: Box<IrExpr>,
    },
    Call {
        callee: Box<IrExpr>,
        args: Vec<IrExpr>,
        at_prefixed: bool,
    },
    Lambda {
        params: Vec<IrParam>,
        body: Box<IrExpr>,
        return_type: Option<String>,
    },
}

impl IrModule {
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Lowers AST into target-agnostic IR.
pub struct IrBuilder<'a> {
    semantic: &'a SemanticResult,
    counter: u32,
}

impl<'a> IrBuilder<'a> {
    pub fn new(semantic: &'a SemanticResult) -> Self {
        IrBuilder {
            semantic,
            counter: 0,
        }
    }

    /// Create an IR module from the analyzed AST.
    pub fn build(mut self, program: &Program) -> Result<IrModule, CompileError> {
        let statements = program
            .statements
            .iter()
            .map(|stmt| self.build_stmt(stmt))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(IrModule {
            ir_id: self.new_id("mod"),
            schema_version: IR_SCHEMA_VERSION.to_string(),
            span: Some(program.span.clone()),
            statements,
        })
    }

    fn build_stmt(&mut self, stmt: &Stmt) -> Result<IrStmt, CompileError> {
        let kind = match &stmt.kind {
            StmtKind::Assignment {
                name,
                type_hint,
                value,
            } => IrStmtKind::Assignment {
                name: name.clone(),
                type_hint: type_hint.clone(),
                value: self.build_expr(value),
            },

            StmtKind::Expression { expr } => IrStmtKind::ExpressionStmt {
                expr: self.build_expr(expr),
            },

            StmtKind::If {
                condition,
                then_block,
                else_block,
            } => IrStmtKind::If {
                condition: self.build_expr(condition),
                then_block: self.build_block(then_block)?,
                else_block: self.build_block(else_block)?,
            },

            StmtKind::Loop {
                iterator,
                start,
                end,
                body,
            } => IrStmtKind::Loop {
                iterator: iterator.clone(),
                start: self.build_expr(start),
                end: self.build_expr(end),
                body: self.build_block(body)?,
            },

            StmtKind::FunctionDef {
                name,
                params,
                body,
                expr_body,
                return_type,
            } => IrStmtKind::Function {
                name: name.clone(),
                params: params
                    .iter()
                    .map(|p| IrParam {
                        name: p.name.clone(),
                        type_hint: p.type_hint.clone(),
                    })
                    .collect(),
                body: self.build_block(body)?,
                expr_body: expr_body.as_ref().map(|expr| self.build_expr(expr)),
                return_type: return_type.clone(),
            },

            StmtKind::Return { value } => IrStmtKind::Return {
                value: value.as_ref().map(|expr| self.build_expr(expr)),
            },

            StmtKind::Macro { name, .. } => {
                return Err(CompileError::semantic(
                    "SEM010",
                    format!("Unexpanded macro '#{name}' reached IR construction."),
                    Some(stmt.span.clone()),
                    "Macro expansion must run before the IR builder.",
                ));
            }
        };

        Ok(IrStmt {
            ir_id: self.new_id("stmt"),
            span: Some(stmt.span.clone()),
            kind,
        })
    }

    fn build_block(&mut self, block: &[Stmt]) -> Result<Vec<IrStmt>, CompileError> {
        block.iter().map(|stmt| self.build_stmt(stmt)).collect()
    }

    fn build_expr(&mut self, expr: &Expr) -> IrExpr {
        let expr_type = self.semantic.expr_type(expr.id).map(str::to_string);
        let kind = match &expr.kind {
            ExprKind::Literal { value } => IrExprKind::Literal {
                value: value.clone(),
            },
            ExprKind::Identifier { name } => IrExprKind::Ref { name: name.clone() },
            ExprKind::Unary { op, operand } => IrExprKind::Unary {
                operator: op.as_str().to_string(),
                operand: Box::new(self.build_expr(operand)),
            },
            ExprKind::Binary { left, op, right } => IrExprKind::Binary {
                left: Box::new(self.build_expr(left)),
                operator: op.as_str().to_string(),
                right: Box::new(self.build_expr(right)),
            },
            ExprKind::Call {
                callee,
                args,
                at_prefixed,
            } => IrExprKind::Call {
                callee: Box::new(self.build_expr(callee)),
                args: args.iter().map(|arg| self.build_expr(arg)).collect(),
                at_prefixed: *at_prefixed,
            },
            ExprKind::Lambda {
                params,
                body,
                return_type,
            } => IrExprKind::Lambda {
                params: params
                    .iter()
                    .map(|p| IrParam {
                        name: p.name.clone(),
                        type_hint: p.type_hint.clone(),
                    })
                    .collect(),
                body: Box::new(self.build_expr(body)),
                return_type: return_type.clone(),
            },
        };

        IrExpr {
            ir_id: self.new_id("expr"),
            span: Some(expr.span.clone()),
            expr_type,
            kind,
        }
    }

    fn new_id(&mut self, prefix: &str) -> String {
        self.counter += 1;
        format!("{prefix}{}", self.counter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;
    use crate::parser::Parser;
    use crate::semantic::SemanticAnalyzer;

    fn build(source: &str) -> IrModule {
        let tokens = Lexer::new(source, "<test>").tokenize().expect("lex");
        let program = Parser::new(tokens).parse_program().expect("parse");
        let semantic = SemanticAnalyzer::new().analyze(&program).expect("semantic");
        IrBuilder::new(&semantic).build(&program).expect("ir")
    }

    #[test]
    fn module_records_schema_version() {
        let module = build("x := 1;");
        assert_eq!(module.schema_version, IR_SCHEMA_VERSION);
        assert_eq!(module.statements.len(), 1);
    }

    #[test]
    fn expression_types_copied_from_semantic_pass() {
        let module = build("x := 1 + 2;");
        let IrStmtKind::Assignment { value, .. } = &module.statements[0].kind else {
            panic!("expected assignment");
        };
        assert_eq!(value.expr_type.as_deref(), Some("Num"));
    }

    #[test]
    fn ir_ids_are_monotonic() {
        let module = build("x := 1; y := 2;");
        let IrStmtKind::Assignment { value: first, .. } = &module.statements[0].kind else {
            panic!("expected assignment");
        };
        let IrStmtKind::Assignment { value: second, .. } = &module.statements[1].kind else {
            panic!("expected assignment");
        };
        assert_ne!(first.ir_id, second.ir_id);
        assert!(module.ir_id.starts_with("mod"));
    }

    #[test]
    fn spans_carry_through() {
        let module = build("x := 1;");
        let span = module.statements[0].span.clone().expect("span");
        assert_eq!(span.line, 1);
        assert!(span.column >= 1);
    }
}
