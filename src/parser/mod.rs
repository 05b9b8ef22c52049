//! # ICL Parser
//!
//! Recursive-descent statements with a Pratt expression core.
//!
//! Precedence (low to high): `||` 1, `&&` 2, `== !=` 3, `< <= > >=` 4,
//! `+ -` 5, `* / %` 6. Unary `! - +` bind tighter than any binary operator;
//! the postfix call `(...)` is highest.
//!
//! A parse error inside a statement triggers synchronization (skip until the
//! next `;`, `}`, or statement-starting keyword); the program collects errors
//! and, if any remain, raises the first one annotated with the count of
//! additional errors.

use crate::ast::{
    BinOp, Expr, ExprKind, LiteralValue, NodeIdGen, Param, Program, Stmt, StmtKind, UnaryOp,
};
use crate::errors::CompileError;
use crate::source_map::SourceSpan;
use crate::tokens::{Token, TokenKind};

fn precedence(kind: TokenKind) -> Option<(u8, BinOp)> {
    match kind {
        TokenKind::Or => Some((1, BinOp::Or)),
        TokenKind::And => Some((2, BinOp::And)),
        TokenKind::Eq => Some((3, BinOp::Eq)),
        TokenKind::Ne => Some((3, BinOp::Ne)),
        TokenKind::Lt => Some((4, BinOp::Lt)),
        TokenKind::Le => Some((4, BinOp::Le)),
        TokenKind::Gt => Some((4, BinOp::Gt)),
        TokenKind::Ge => Some((4, BinOp::Ge)),
        TokenKind::Plus => Some((5, BinOp::Add)),
        TokenKind::Minus => Some((5, BinOp::Sub)),
        TokenKind::Star => Some((6, BinOp::Mul)),
        TokenKind::Slash => Some((6, BinOp::Div)),
        TokenKind::Percent => Some((6, BinOp::Mod)),
        _ => None,
    }
}

/// Recursive-descent + Pratt parser for ICL token streams.
pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    ids: NodeIdGen,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Parser {
            tokens,
            pos: 0,
            ids: NodeIdGen::new(),
        }
    }

    /// Parse the full token stream into a program AST.
    pub fn parse_program(mut self) -> Result<Program, CompileError> {
        let mut statements: Vec<Stmt> = Vec::new();
        let mut errors: Vec<CompileError> = Vec::new();

        while !self.is_at_end() {
            self.consume_optional_semicolons();
            if self.is_at_end() {
                break;
            }
            match self.parse_statement() {
                Ok(stmt) => {
                    statements.push(stmt);
                    self.consume_optional_semicolons();
                }
                Err(err) => {
                    errors.push(err);
                    self.synchronize();
                }
            }
        }

        if let Some(first) = errors.first() {
            if errors.len() == 1 {
                return Err(first.clone());
            }
            let diag = first.diagnostic();
            return Err(CompileError::parse(
                &diag.code,
                format!(
                    "{} (plus {} additional parse error(s)).",
                    diag.message,
                    errors.len() - 1
                ),
                diag.span.clone(),
                &diag.hint,
            ));
        }

        let span = match (statements.first(), statements.last()) {
            (Some(first), Some(last)) => SourceSpan::merge(&first.span, &last.span),
            _ => self.peek(0).span.clone(),
        };
        Ok(Program {
            span,
            statements,
            next_node_id: self.ids.next_value(),
        })
    }

    fn parse_statement(&mut self) -> Result<Stmt, CompileError> {
        if self.match_kind(TokenKind::Fn) {
            let fn_token = self.previous().clone();
            return self.parse_function_def(&fn_token);
        }
        if self.match_kind(TokenKind::If) {
            let if_token = self.previous().clone();
            return self.parse_if_stmt(&if_token);
        }
        if self.match_kind(TokenKind::Loop) {
            let loop_token = self.previous().clone();
            return self.parse_loop_stmt(&loop_token);
        }
        if self.match_kind(TokenKind::Ret) {
            let ret_token = self.previous().clone();
            return self.parse_return_stmt(&ret_token);
        }
        if self.match_kind(TokenKind::Hash) {
            let hash_token = self.previous().clone();
            return self.parse_macro_stmt(&hash_token);
        }
        if self.is_assignment_start() {
            return self.parse_assignment_stmt();
        }

        let expr = self.parse_expression(1)?;
        Ok(Stmt {
            span: expr.span.clone(),
            kind: StmtKind::Expression { expr },
        })
    }

    /// Assignment is recognized by lookahead: `IDENT :=` or `IDENT : IDENT :=`.
    fn is_assignment_start(&self) -> bool {
        if !self.check(TokenKind::Ident) {
            return false;
        }
        if self.peek(1).kind == TokenKind::Assign {
            return true;
        }
        self.peek(1).kind == TokenKind::Colon
            && self.peek(2).kind == TokenKind::Ident
            && self.peek(3).kind == TokenKind::Assign
    }

    fn parse_assignment_stmt(&mut self) -> Result<Stmt, CompileError> {
        let name_tok = self.consume(TokenKind::Ident, "Expected identifier in assignment.")?;
        let mut type_hint: Option<String> = None;

        if self.match_kind(TokenKind::Colon) {
            let type_tok = self.consume(TokenKind::Ident, "Expected type name after ':'.")?;
            type_hint = Some(type_tok.lexeme);
        }

        self.consume(TokenKind::Assign, "Expected ':=' in assignment.")?;
        let value = self.parse_expression(1)?;
        let span = SourceSpan::merge(&name_tok.span, &value.span);
        Ok(Stmt {
            span,
            kind: StmtKind::Assignment {
                name: name_tok.lexeme,
                type_hint,
                value,
            },
        })
    }

    fn parse_function_def(&mut self, fn_token: &Token) -> Result<Stmt, CompileError> {
        let name_tok = self.consume(TokenKind::Ident, "Expected function name after 'fn'.")?;
        self.consume(TokenKind::LParen, "Expected '(' after function name.")?;
        let params = self.parse_param_list("parameter")?;
        self.consume(TokenKind::RParen, "Expected ')' after function parameters.")?;

        let mut return_type: Option<String> = None;
        if self.match_kind(TokenKind::Colon) {
            let return_tok = self.consume(TokenKind::Ident, "Expected return type after ':'.")?;
            return_type = Some(return_tok.lexeme);
        }

        if self.match_kind(TokenKind::Arrow) {
            let expr = self.parse_expression(1)?;
            let span = SourceSpan::merge(&fn_token.span, &expr.span);
            return Ok(Stmt {
                span,
                kind: StmtKind::FunctionDef {
                    name: name_tok.lexeme,
                    params,
                    body: Vec::new(),
                    expr_body: Some(expr),
                    return_type,
                },
            });
        }

        let (body, block_span) = self.parse_block()?;
        let span = SourceSpan::merge(&fn_token.span, &block_span);
        Ok(Stmt {
            span,
            kind: StmtKind::FunctionDef {
                name: name_tok.lexeme,
                params,
                body,
                expr_body: None,
                return_type,
            },
        })
    }

    fn parse_if_stmt(&mut self, if_token: &Token) -> Result<Stmt, CompileError> {
        let condition = self.parse_expression(1)?;
        self.consume(TokenKind::Question, "Expected '?' after if condition.")?;
        let (then_block, then_span) = self.parse_block()?;

        let mut else_block: Vec<Stmt> = Vec::new();
        let mut end_span = then_span;
        if self.match_kind(TokenKind::Colon) {
            let (parsed_else, else_span) = self.parse_block()?;
            else_block = parsed_else;
            end_span = else_span;
        }

        let span = SourceSpan::merge(&if_token.span, &end_span);
        Ok(Stmt {
            span,
            kind: StmtKind::If {
                condition,
                then_block,
                else_block,
            },
        })
    }

    fn parse_loop_stmt(&mut self, loop_token: &Token) -> Result<Stmt, CompileError> {
        let iterator_tok =
            self.consume(TokenKind::Ident, "Expected loop iterator name after 'loop'.")?;
        self.consume(TokenKind::In, "Expected 'in' in loop header.")?;
        let start = self.parse_expression(1)?;
        self.consume(TokenKind::Range, "Expected '..' in loop range.")?;
        let end = self.parse_expression(1)?;
        let (body, body_span) = self.parse_block()?;

        let span = SourceSpan::merge(&loop_token.span, &body_span);
        Ok(Stmt {
            span,
            kind: StmtKind::Loop {
                iterator: iterator_tok.lexeme,
                start,
                end,
                body,
            },
        })
    }

    fn parse_return_stmt(&mut self, ret_token: &Token) -> Result<Stmt, CompileError> {
        if self.check(TokenKind::Semicolon)
            || self.check(TokenKind::RBrace)
            || self.check(TokenKind::Eof)
        {
            return Ok(Stmt {
                span: ret_token.span.clone(),
                kind: StmtKind::Return { value: None },
            });
        }
        let value = self.parse_expression(1)?;
        let span = SourceSpan::merge(&ret_token.span, &value.span);
        Ok(Stmt {
            span,
            kind: StmtKind::Return { value: Some(value) },
        })
    }

    fn parse_macro_stmt(&mut self, hash_token: &Token) -> Result<Stmt, CompileError> {
        let name_tok = self.consume(TokenKind::Ident, "Expected macro name after '#'.")?;
        self.consume(TokenKind::LParen, "Expected '(' after macro name.")?;
        let args = self.parse_arg_list()?;
        let end_tok = self.consume(TokenKind::RParen, "Expected ')' after macro arguments.")?;
        let span = SourceSpan::merge(&hash_token.span, &end_tok.span);
        Ok(Stmt {
            span,
            kind: StmtKind::Macro {
                name: name_tok.lexeme,
                args,
            },
        })
    }

    /// Parse `{ stmt* }` consuming optional `;` separators between statements.
    fn parse_block(&mut self) -> Result<(Vec<Stmt>, SourceSpan), CompileError> {
        let lbrace = self.consume(TokenKind::LBrace, "Expected '{' to start block.")?;
        let mut statements: Vec<Stmt> = Vec::new();
        self.consume_optional_semicolons();

        while !self.check(TokenKind::RBrace) && !self.is_at_end() {
            let stmt = self.parse_statement()?;
            statements.push(stmt);
            self.consume_optional_semicolons();
        }

        let rbrace = self.consume(TokenKind::RBrace, "Expected '}' to close block.")?;
        Ok((statements, SourceSpan::merge(&lbrace.span, &rbrace.span)))
    }

    fn parse_expression(&mut self, min_prec: u8) -> Result<Expr, CompileError> {
        let mut expr = self.parse_unary()?;

        loop {
            let Some((prec, op)) = precedence(self.peek(0).kind) else {
                break;
            };
            if prec < min_prec {
                break;
            }
            self.advance();
            let right = self.parse_expression(prec + 1)?;
            let span = SourceSpan::merge(&expr.span, &right.span);
            expr = Expr {
                id: self.ids.fresh(),
                span,
                kind: ExprKind::Binary {
                    left: Box::new(expr),
                    op,
                    right: Box::new(right),
                },
            };
        }

        Ok(expr)
    }

    fn parse_unary(&mut self) -> Result<Expr, CompileError> {
        let op = if self.match_kind(TokenKind::Not) {
            Some(UnaryOp::Not)
        } else if self.match_kind(TokenKind::Minus) {
            Some(UnaryOp::Neg)
        } else if self.match_kind(TokenKind::Plus) {
            Some(UnaryOp::Pos)
        } else {
            None
        };

        if let Some(op) = op {
            let op_span = self.previous().span.clone();
            let operand = self.parse_unary()?;
            let span = SourceSpan::merge(&op_span, &operand.span);
            return Ok(Expr {
                id: self.ids.fresh(),
                span,
                kind: ExprKind::Unary {
                    op,
                    operand: Box::new(operand),
                },
            });
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, CompileError> {
        let mut expr = self.parse_primary()?;
        while self.match_kind(TokenKind::LParen) {
            let args = self.parse_arg_list()?;
            let rpar = self.consume(TokenKind::RParen, "Expected ')' after call arguments.")?;
            let span = SourceSpan::merge(&expr.span, &rpar.span);
            expr = Expr {
                id: self.ids.fresh(),
                span,
                kind: ExprKind::Call {
                    callee: Box::new(expr),
                    args,
                    at_prefixed: false,
                },
            };
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr, CompileError> {
        if self.match_kind(TokenKind::Number) {
            let tok = self.previous().clone();
            let value = parse_number(&tok.lexeme);
            return Ok(self.expr(tok.span, ExprKind::Literal { value }));
        }

        if self.match_kind(TokenKind::Str) {
            let tok = self.previous().clone();
            return Ok(self.expr(
                tok.span,
                ExprKind::Literal {
                    value: LiteralValue::Str(tok.lexeme),
                },
            ));
        }

        if self.match_kind(TokenKind::True) {
            let tok = self.previous().clone();
            return Ok(self.expr(
                tok.span,
                ExprKind::Literal {
                    value: LiteralValue::Bool(true),
                },
            ));
        }

        if self.match_kind(TokenKind::False) {
            let tok = self.previous().clone();
            return Ok(self.expr(
                tok.span,
                ExprKind::Literal {
                    value: LiteralValue::Bool(false),
                },
            ));
        }

        if self.match_kind(TokenKind::Lam) {
            let lam_token = self.previous().clone();
            return self.parse_lambda_expr(&lam_token);
        }

        if self.match_kind(TokenKind::Ident) {
            let tok = self.previous().clone();
            return Ok(self.expr(tok.span, ExprKind::Identifier { name: tok.lexeme }));
        }

        if self.match_kind(TokenKind::At) {
            let at_tok = self.previous().clone();
            let callee_tok =
                self.consume(TokenKind::Ident, "Expected callee identifier after '@'.")?;
            self.consume(TokenKind::LParen, "Expected '(' after @callee.")?;
            let args = self.parse_arg_list()?;
            let end_tok = self.consume(TokenKind::RParen, "Expected ')' after call arguments.")?;
            let callee = self.expr(
                callee_tok.span.clone(),
                ExprKind::Identifier {
                    name: callee_tok.lexeme,
                },
            );
            let span = SourceSpan::merge(&at_tok.span, &end_tok.span);
            return Ok(self.expr(
                span,
                ExprKind::Call {
                    callee: Box::new(callee),
                    args,
                    at_prefixed: true,
                },
            ));
        }

        if self.match_kind(TokenKind::LParen) {
            let expr = self.parse_expression(1)?;
            self.consume(TokenKind::RParen, "Expected ')' to close grouped expression.")?;
            return Ok(expr);
        }

        let tok = self.peek(0);
        Err(CompileError::parse(
            "PAR001",
            format!("Unexpected token {:?} in expression.", tok.kind),
            Some(tok.span.clone()),
            "Use literals, identifiers, calls, or parenthesized expressions.",
        ))
    }

    fn parse_lambda_expr(&mut self, lam_token: &Token) -> Result<Expr, CompileError> {
        self.consume(TokenKind::LParen, "Expected '(' after 'lam'.")?;
        let params = self.parse_param_list("lambda parameter")?;
        self.consume(TokenKind::RParen, "Expected ')' after lambda parameters.")?;

        let mut return_type: Option<String> = None;
        if self.match_kind(TokenKind::Colon) {
            let return_tok =
                self.consume(TokenKind::Ident, "Expected lambda return type after ':'.")?;
            return_type = Some(return_tok.lexeme);
        }

        self.consume(TokenKind::Arrow, "Expected '=>' in lambda expression.")?;
        let body = self.parse_expression(1)?;
        let span = SourceSpan::merge(&lam_token.span, &body.span);
        Ok(self.expr(
            span,
            ExprKind::Lambda {
                params,
                body: Box::new(body),
                return_type,
            },
        ))
    }

    fn parse_param_list(&mut self, what: &str) -> Result<Vec<Param>, CompileError> {
        let mut params: Vec<Param> = Vec::new();
        if self.check(TokenKind::RParen) {
            return Ok(params);
        }
        loop {
            let name_tok = self.consume(TokenKind::Ident, &format!("Expected {what} name."))?;
            let mut type_hint: Option<String> = None;
            if self.match_kind(TokenKind::Colon) {
                let type_tok =
                    self.consume(TokenKind::Ident, "Expected parameter type after ':'.")?;
                type_hint = Some(type_tok.lexeme);
            }
            params.push(Param {
                name: name_tok.lexeme,
                type_hint,
            });
            if !self.match_kind(TokenKind::Comma) {
                break;
            }
        }
        Ok(params)
    }

    fn parse_arg_list(&mut self) -> Result<Vec<Expr>, CompileError> {
        let mut args: Vec<Expr> = Vec::new();
        if self.check(TokenKind::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.parse_expression(1)?);
            if !self.match_kind(TokenKind::Comma) {
                break;
            }
        }
        Ok(args)
    }

    fn expr(&mut self, span: SourceSpan, kind: ExprKind) -> Expr {
        Expr {
            id: self.ids.fresh(),
            span,
            kind,
        }
    }

    fn consume(&mut self, kind: TokenKind, message: &str) -> Result<Token, CompileError> {
        if self.check(kind) {
            return Ok(self.advance().clone());
        }
        let tok = self.peek(0);
        Err(CompileError::parse(
            "PAR002",
            message.to_string(),
            Some(tok.span.clone()),
            "Adjust token order to match grammar.",
        ))
    }

    fn match_kind(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            return true;
        }
        false
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek(0).kind == kind
    }

    fn advance(&mut self) -> &Token {
        if !self.is_at_end() {
            self.pos += 1;
        }
        self.previous()
    }

    fn peek(&self, offset: usize) -> &Token {
        let idx = self.pos + offset;
        if idx >= self.tokens.len() {
            return self.tokens.last().expect("token stream ends with EOF");
        }
        &self.tokens[idx]
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.pos - 1]
    }

    fn is_at_end(&self) -> bool {
        self.peek(0).kind == TokenKind::Eof
    }

    fn consume_optional_semicolons(&mut self) {
        while self.match_kind(TokenKind::Semicolon) {}
    }

    /// Skip tokens until the next statement boundary after a parse error.
    fn synchronize(&mut self) {
        while !self.is_at_end() {
            if self.pos > 0
                && matches!(
                    self.previous().kind,
                    TokenKind::Semicolon | TokenKind::RBrace
                )
            {
                return;
            }
            if matches!(
                self.peek(0).kind,
                TokenKind::Fn | TokenKind::If | TokenKind::Loop | TokenKind::Ret
            ) {
                return;
            }
            self.advance();
        }
    }
}

/// Numbers with a decimal point parse as floats, everything else as integers.
fn parse_number(lexeme: &str) -> LiteralValue {
    if lexeme.contains('.') {
        LiteralValue::Float(lexeme.parse::<f64>().unwrap_or(0.0))
    } else {
        match lexeme.parse::<i64>() {
            Ok(value) => LiteralValue::Int(value),
            Err(_) => LiteralValue::Float(lexeme.parse::<f64>().unwrap_or(0.0)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;

    fn parse(source: &str) -> Result<Program, CompileError> {
        let tokens = Lexer::new(source, "<test>").tokenize()?;
        Parser::new(tokens).parse_program()
    }

    #[test]
    fn parses_typed_assignment() {
        let program = parse("x:Num := 1;").expect("parse");
        assert_eq!(program.statements.len(), 1);
        match &program.statements[0].kind {
            StmtKind::Assignment { name, type_hint, .. } => {
                assert_eq!(name, "x");
                assert_eq!(type_hint.as_deref(), Some("Num"));
            }
            other => panic!("expected assignment, got {other:?}"),
        }
    }

    #[test]
    fn precedence_binds_mul_over_add() {
        let program = parse("v := 1 + 2 * 3;").expect("parse");
        let StmtKind::Assignment { value, .. } = &program.statements[0].kind else {
            panic!("expected assignment");
        };
        let ExprKind::Binary { op, right, .. } = &value.kind else {
            panic!("expected binary");
        };
        assert_eq!(*op, BinOp::Add);
        assert!(matches!(
            right.kind,
            ExprKind::Binary { op: BinOp::Mul, .. }
        ));
    }

    #[test]
    fn unary_binds_tighter_than_binary() {
        let program = parse("v := -1 + 2;").expect("parse");
        let StmtKind::Assignment { value, .. } = &program.statements[0].kind else {
            panic!("expected assignment");
        };
        let ExprKind::Binary { left, op, .. } = &value.kind else {
            panic!("expected binary");
        };
        assert_eq!(*op, BinOp::Add);
        assert!(matches!(left.kind, ExprKind::Unary { op: UnaryOp::Neg, .. }));
    }

    #[test]
    fn if_with_else_blocks() {
        let program = parse("if x > 1 ? { y := 1; } : { y := 2; }").expect("parse");
        let StmtKind::If {
            then_block,
            else_block,
            ..
        } = &program.statements[0].kind
        else {
            panic!("expected if");
        };
        assert_eq!(then_block.len(), 1);
        assert_eq!(else_block.len(), 1);
    }

    #[test]
    fn function_expression_body() {
        let program = parse("fn add(a, b):Num => a + b;").expect("parse");
        let StmtKind::FunctionDef {
            name,
            params,
            expr_body,
            return_type,
            ..
        } = &program.statements[0].kind
        else {
            panic!("expected fn");
        };
        assert_eq!(name, "add");
        assert_eq!(params.len(), 2);
        assert!(expr_body.is_some());
        assert_eq!(return_type.as_deref(), Some("Num"));
    }

    #[test]
    fn at_call_sets_flag() {
        let program = parse("z := @inc(1);").expect("parse");
        let StmtKind::Assignment { value, .. } = &program.statements[0].kind else {
            panic!("expected assignment");
        };
        assert!(matches!(
            value.kind,
            ExprKind::Call { at_prefixed: true, .. }
        ));
    }

    #[test]
    fn lambda_parses_as_expression() {
        let program = parse("f := lam (a, b) => a + b;").expect("parse");
        let StmtKind::Assignment { value, .. } = &program.statements[0].kind else {
            panic!("expected assignment");
        };
        assert!(matches!(value.kind, ExprKind::Lambda { .. }));
    }

    #[test]
    fn macro_statement_parses() {
        let program = parse("#echo(42);").expect("parse");
        assert!(matches!(program.statements[0].kind, StmtKind::Macro { .. }));
    }

    #[test]
    fn loop_has_half_open_range_parts() {
        let program = parse("loop i in 0..3 { x := i; }").expect("parse");
        let StmtKind::Loop { iterator, body, .. } = &program.statements[0].kind else {
            panic!("expected loop");
        };
        assert_eq!(iterator, "i");
        assert_eq!(body.len(), 1);
    }

    #[test]
    fn aggregated_error_reports_extra_count() {
        let err = parse("x := ;\ny := ;\n").expect_err("should fail");
        assert_eq!(err.code(), "PAR001");
        assert!(err.diagnostic().message.contains("1 additional parse error"));
    }

    #[test]
    fn compound_span_covers_children() {
        let program = parse("x := 1 + 2;").expect("parse");
        let span = &program.statements[0].span;
        assert_eq!((span.line, span.column), (1, 1));
        assert_eq!((span.end_line, span.end_column), (1, 11));
    }
}
