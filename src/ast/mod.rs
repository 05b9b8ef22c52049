//! # ICL AST - Abstract Syntax Tree Types
//!
//! Closed tagged sums for statements and expressions, produced by the parser
//! and consumed by macro expansion, semantic analysis, the IR builder, and the
//! Intent Graph builder. Every node carries a [`SourceSpan`]; every expression
//! additionally carries a stable [`NodeId`] so semantic inference results can
//! be keyed per node without back-pointers.

use serde::{Deserialize, Serialize};

use crate::source_map::SourceSpan;

/// Stable per-expression identity assigned at construction time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

/// Allocator for [`NodeId`]s. The parser owns one; macro expansion continues
/// from the program's counter so synthesized nodes never collide.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeIdGen {
    next: u32,
}

impl NodeIdGen {
    pub fn new() -> Self {
        NodeIdGen::default()
    }

    pub fn starting_at(next: u32) -> Self {
        NodeIdGen { next }
    }

    pub fn fresh(&mut self) -> NodeId {
        let id = NodeId(self.next);
        self.next += 1;
        id
    }

    pub fn next_value(&self) -> u32 {
        self.next
    }
}

/// Literal value carried by literal expressions and graph attrs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LiteralValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl LiteralValue {
    /// Short value-type tag used in graph attrs (`int`/`float`/`str`/`bool`).
    pub fn type_tag(&self) -> &'static str {
        match self {
            LiteralValue::Bool(_) => "bool",
            LiteralValue::Int(_) => "int",
            LiteralValue::Float(_) => "float",
            LiteralValue::Str(_) => "str",
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            LiteralValue::Bool(b) => serde_json::Value::Bool(*b),
            LiteralValue::Int(i) => serde_json::Value::from(*i),
            LiteralValue::Float(f) => serde_json::Value::from(*f),
            LiteralValue::Str(s) => serde_json::Value::from(s.clone()),
        }
    }
}

/// Binary operators in precedence-free spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl BinOp {
    pub fn as_str(self) -> &'static str {
        match self {
            BinOp::Or => "||",
            BinOp::And => "&&",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
        }
    }

    pub fn is_arithmetic(self) -> bool {
        matches!(self, BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod)
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge
        )
    }

    pub fn is_logic(self) -> bool {
        matches!(self, BinOp::And | BinOp::Or)
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    Not,
    Neg,
    Pos,
}

impl UnaryOp {
    pub fn as_str(self) -> &'static str {
        match self {
            UnaryOp::Not => "!",
            UnaryOp::Neg => "-",
            UnaryOp::Pos => "+",
        }
    }
}

/// Function or lambda parameter with optional type hint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub type_hint: Option<String>,
}

/// Expression node: identity + provenance + kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expr {
    pub id: NodeId,
    pub span: SourceSpan,
    #[serde(flatten)]
    pub kind: ExprKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node_type", rename_all = "snake_case")]
pub enum ExprKind {
    Literal {
        value: LiteralValue,
    },
    Identifier {
        name: String,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        left: Box<Expr>,
        op: BinOp,
        right: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
        at_prefixed: bool,
    },
    Lambda {
        params: Vec<Param>,
        body: Box<Expr>,
        return_type: Option<String>,
    },
}

/// Statement node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stmt {
    pub span: SourceSpan,
    #[serde(flatten)]
    pub kind: StmtKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node_type", rename_all = "snake_case")]
pub enum StmtKind {
    Assignment {
        name: String,
        type_hint: Option<String>,
        value: Expr,
    },
    Expression {
        expr: Expr,
    },
    If {
        condition: Expr,
        then_block: Vec<Stmt>,
        else_block: Vec<Stmt>,
    },
    /// Half-open range loop: `loop i in start..end { body }`.
    Loop {
        iterator: String,
        start: Expr,
        end: Expr,
        body: Vec<Stmt>,
    },
    FunctionDef {
        name: String,
        params: Vec<Param>,
        body: Vec<Stmt>,
        expr_body: Option<Expr>,
        return_type: Option<String>,
    },
    Return {
        value: Option<Expr>,
    },
    /// `#name(args)` - must be expanded before semantic analysis.
    Macro {
        name: String,
        args: Vec<Expr>,
    },
}

/// Root AST node: an ordered statement sequence covering the whole input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub span: SourceSpan,
    pub statements: Vec<Stmt>,
    /// High-water mark of allocated expression ids; macro expansion continues
    /// allocation from here.
    pub next_node_id: u32,
}

impl Program {
    /// Serialize the AST recursively for explain output.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "node_type": "program",
            "span": self.span,
            "statements": self.statements,
        })
    }
}
