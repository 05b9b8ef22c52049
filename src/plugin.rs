//! Plugin seams and macro expansion for the compiler frontend.
//!
//! The manager holds macro expanders (for `#name(args)` statements) and syntax
//! transforms (source rewrite before lexing, AST rewrite after parse). Dynamic
//! loading from external modules is an adapter concern; the core only knows
//! the traits and the standard macro set. A macro with no registered expander
//! is left in place so the semantic analyzer rejects it as `SEM010`.

use crate::ast::{Expr, ExprKind, LiteralValue, NodeIdGen, Program, Stmt, StmtKind};
use crate::errors::CompileError;
use crate::source_map::SourceSpan;

/// Macro expansion hook for `#macro(args)` statements.
pub trait MacroPlugin {
    /// Macro identifier without the leading `#`.
    fn name(&self) -> &str;

    /// Expand one invocation into replacement statements.
    fn expand(
        &self,
        span: &SourceSpan,
        args: &[Expr],
        ids: &mut NodeIdGen,
    ) -> Result<Vec<Stmt>, CompileError>;
}

/// Syntax extension hooks before and after parse.
pub trait SyntaxPlugin {
    fn name(&self) -> &str;

    /// Optional source rewrite pass before lexing.
    fn preprocess_source(&self, source: &str) -> String {
        source.to_string()
    }

    /// Optional AST transform pass after parse.
    fn transform_program(&self, program: Program) -> Program {
        program
    }
}

/// Registry and orchestration for compiler plugins.
#[derive(Default)]
pub struct PluginManager {
    macros: Vec<Box<dyn MacroPlugin>>,
    syntax: Vec<Box<dyn SyntaxPlugin>>,
}

impl PluginManager {
    /// Empty manager with no macros or syntax transforms.
    pub fn new() -> Self {
        PluginManager::default()
    }

    /// Manager with the standard macro set (`#echo`, `#dbg`) registered.
    pub fn with_std_macros() -> Self {
        let mut manager = PluginManager::new();
        manager.register_macro(Box::new(EchoMacro));
        manager.register_macro(Box::new(DbgMacro));
        manager
    }

    pub fn register_macro(&mut self, plugin: Box<dyn MacroPlugin>) {
        self.macros.push(plugin);
    }

    pub fn register_syntax(&mut self, plugin: Box<dyn SyntaxPlugin>) {
        self.syntax.push(plugin);
    }

    pub fn macro_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.macros.iter().map(|m| m.name().to_string()).collect();
        names.sort();
        names
    }

    /// Apply pre-lexing syntax plugin transformations in registration order.
    pub fn preprocess_source(&self, source: &str) -> String {
        let mut updated = source.to_string();
        for plugin in &self.syntax {
            updated = plugin.preprocess_source(&updated);
        }
        updated
    }

    /// Apply post-parse syntax plugin transformations.
    pub fn transform_program(&self, program: Program) -> Program {
        let mut updated = program;
        for plugin in &self.syntax {
            updated = plugin.transform_program(updated);
        }
        updated
    }

    /// Expand macro statements recursively through nested blocks.
    ///
    /// Unknown macros are left intact for the semantic stage to reject.
    pub fn expand_macros(&self, program: Program) -> Result<Program, CompileError> {
        let mut ids = NodeIdGen::starting_at(program.next_node_id);
        let mut expanded: Vec<Stmt> = Vec::new();
        for stmt in program.statements {
            expanded.extend(self.expand_stmt(stmt, &mut ids)?);
        }
        Ok(Program {
            span: program.span,
            statements: expanded,
            next_node_id: ids.next_value(),
        })
    }

    fn find_macro(&self, name: &str) -> Option<&dyn MacroPlugin> {
        self.macros
            .iter()
            .find(|m| m.name() == name)
            .map(std::convert::AsRef::as_ref)
    }

    fn expand_stmt(&self, stmt: Stmt, ids: &mut NodeIdGen) -> Result<Vec<Stmt>, CompileError> {
        match stmt.kind {
            StmtKind::Macro { ref name, ref args } => {
                let Some(plugin) = self.find_macro(name) else {
                    return Ok(vec![stmt]);
                };
                let mut result: Vec<Stmt> = Vec::new();
                for produced in plugin.expand(&stmt.span, args, ids)? {
                    result.extend(self.expand_stmt(produced, ids)?);
                }
                Ok(result)
            }
            StmtKind::If {
                condition,
                then_block,
                else_block,
            } => {
                let then_block = self.expand_block(then_block, ids)?;
                let else_block = self.expand_block(else_block, ids)?;
                Ok(vec![Stmt {
                    span: stmt.span,
                    kind: StmtKind::If {
                        condition,
                        then_block,
                        else_block,
                    },
                }])
            }
            StmtKind::Loop {
                iterator,
                start,
                end,
                body,
            } => {
                let body = self.expand_block(body, ids)?;
                Ok(vec![Stmt {
                    span: stmt.span,
                    kind: StmtKind::Loop {
                        iterator,
                        start,
                        end,
                        body,
                    },
                }])
            }
            StmtKind::FunctionDef {
                name,
                params,
                body,
                expr_body,
                return_type,
            } => {
                let body = self.expand_block(body, ids)?;
                Ok(vec![Stmt {
                    span: stmt.span,
                    kind: StmtKind::FunctionDef {
                        name,
                        params,
                        body,
                        expr_body,
                        return_type,
                    },
                }])
            }
            _ => Ok(vec![stmt]),
        }
    }

    fn expand_block(&self, block: Vec<Stmt>, ids: &mut NodeIdGen) -> Result<Vec<Stmt>, CompileError> {
        let mut expanded: Vec<Stmt> = Vec::new();
        for stmt in block {
            expanded.extend(self.expand_stmt(stmt, ids)?);
        }
        Ok(expanded)
    }
}

fn print_call_stmt(span: &SourceSpan, arg: Expr, ids: &mut NodeIdGen) -> Stmt {
    let callee = Expr {
        id: ids.fresh(),
        span: span.clone(),
        kind: ExprKind::Identifier {
            name: "print".to_string(),
        },
    };
    let call = Expr {
        id: ids.fresh(),
        span: span.clone(),
        kind: ExprKind::Call {
            callee: Box::new(callee),
            args: vec![arg],
            at_prefixed: true,
        },
    };
    Stmt {
        span: span.clone(),
        kind: StmtKind::Expression { expr: call },
    }
}

/// `#echo(expr)` -> `@print(expr)`
pub struct EchoMacro;

impl MacroPlugin for EchoMacro {
    fn name(&self) -> &str {
        "echo"
    }

    fn expand(
        &self,
        span: &SourceSpan,
        args: &[Expr],
        ids: &mut NodeIdGen,
    ) -> Result<Vec<Stmt>, CompileError> {
        if args.len() != 1 {
            return Err(CompileError::expansion(
                "SEM101",
                "#echo expects exactly one argument.".to_string(),
                Some(span.clone()),
                "Use #echo(value).",
            ));
        }
        Ok(vec![print_call_stmt(span, args[0].clone(), ids)])
    }
}

/// `#dbg(expr)` -> `@print("dbg:"); @print(expr)`
pub struct DbgMacro;

impl MacroPlugin for DbgMacro {
    fn name(&self) -> &str {
        "dbg"
    }

    fn expand(
        &self,
        span: &SourceSpan,
        args: &[Expr],
        ids: &mut NodeIdGen,
    ) -> Result<Vec<Stmt>, CompileError> {
        if args.len() != 1 {
            return Err(CompileError::expansion(
                "SEM102",
                "#dbg expects exactly one argument.".to_string(),
                Some(span.clone()),
                "Use #dbg(value).",
            ));
        }
        let label = Expr {
            id: ids.fresh(),
            span: span.clone(),
            kind: ExprKind::Literal {
                value: LiteralValue::Str("dbg:".to_string()),
            },
        };
        Ok(vec![
            print_call_stmt(span, label, ids),
            print_call_stmt(span, args[0].clone(), ids),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;
    use crate::parser::Parser;

    fn parse(source: &str) -> Program {
        let tokens = Lexer::new(source, "<test>").tokenize().expect("lex");
        Parser::new(tokens).parse_program().expect("parse")
    }

    #[test]
    fn echo_expands_to_print_call() {
        let manager = PluginManager::with_std_macros();
        let program = manager.expand_macros(parse("#echo(42);")).expect("expand");
        assert_eq!(program.statements.len(), 1);
        let StmtKind::Expression { expr } = &program.statements[0].kind else {
            panic!("expected expression statement");
        };
        let ExprKind::Call {
            callee,
            at_prefixed,
            ..
        } = &expr.kind
        else {
            panic!("expected call");
        };
        assert!(at_prefixed);
        assert!(matches!(
            &callee.kind,
            ExprKind::Identifier { name } if name == "print"
        ));
    }

    #[test]
    fn dbg_expands_to_two_statements() {
        let manager = PluginManager::with_std_macros();
        let program = manager.expand_macros(parse("#dbg(1);")).expect("expand");
        assert_eq!(program.statements.len(), 2);
    }

    #[test]
    fn unknown_macro_left_in_place() {
        let manager = PluginManager::with_std_macros();
        let program = manager.expand_macros(parse("#nope(1);")).expect("expand");
        assert!(matches!(program.statements[0].kind, StmtKind::Macro { .. }));
    }

    #[test]
    fn macros_expand_inside_nested_blocks() {
        let manager = PluginManager::with_std_macros();
        let program = manager
            .expand_macros(parse("if true ? { #echo(1); }"))
            .expect("expand");
        let StmtKind::If { then_block, .. } = &program.statements[0].kind else {
            panic!("expected if");
        };
        assert!(matches!(
            then_block[0].kind,
            StmtKind::Expression { .. }
        ));
    }

    #[test]
    fn echo_arity_violation_is_expansion_error() {
        let manager = PluginManager::with_std_macros();
        let err = manager
            .expand_macros(parse("#echo(1, 2);"))
            .expect_err("should fail");
        assert_eq!(err.code(), "SEM101");
    }

    #[test]
    fn expansion_allocates_fresh_node_ids() {
        let manager = PluginManager::with_std_macros();
        let before = parse("#echo(42);");
        let high_water = before.next_node_id;
        let program = manager.expand_macros(before).expect("expand");
        assert!(program.next_node_id > high_water);
    }
}
