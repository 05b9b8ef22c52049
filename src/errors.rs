//! Structured compiler diagnostics and the error sum used as control flow.
//!
//! Every failure in the pipeline is a [`CompileError`] variant carrying a
//! [`Diagnostic`] with a short stable code (`LEX*`, `PAR*`, `SEM*`, `LOW*`,
//! `PACK*`, `CLI*`, `SRV*`), a message, an optional source span, and a hint.
//! `LOW001` (feature not covered by a pack) is deliberately its own code so
//! the contract harness can tell structured rejection apart from other
//! lowering failures.

use serde::{Deserialize, Serialize};

use crate::source_map::SourceSpan;

/// Machine-readable diagnostic emitted by compiler phases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub code: String,
    pub message: String,
    #[serde(default)]
    pub hint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span: Option<SourceSpan>,
}

impl Diagnostic {
    pub fn new(code: &str, message: String, span: Option<SourceSpan>, hint: &str) -> Self {
        Diagnostic {
            code: code.to_string(),
            message,
            hint: hint.to_string(),
            span,
        }
    }

    /// Format into a stable human-readable line.
    pub fn render(&self) -> String {
        let suffix = match &self.span {
            Some(span) => format!(" {span}"),
            None => String::new(),
        };
        let hint = if self.hint.is_empty() {
            String::new()
        } else {
            format!(" Hint: {}", self.hint)
        };
        format!("{}{}: {}{}", self.code, suffix, self.message, hint)
    }
}

/// Compiler error sum keyed by the pipeline stage that raised it.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CompileError {
    /// Lexical analysis failure (`LEX*`).
    #[error("[{}] {}", .0.code, .0.message)]
    Lex(Diagnostic),

    /// Parser failure (`PAR*`).
    #[error("[{}] {}", .0.code, .0.message)]
    Parse(Diagnostic),

    /// Semantic analysis failure (`SEM*`).
    #[error("[{}] {}", .0.code, .0.message)]
    Semantic(Diagnostic),

    /// Macro/plugin expansion failure.
    #[error("[{}] {}", .0.code, .0.message)]
    Expansion(Diagnostic),

    /// Lowering failure (`LOW*`), including the feature-coverage gate.
    #[error("[{}] {}", .0.code, .0.message)]
    Lowering(Diagnostic),

    /// Language pack registration or lookup failure (`PACK*`).
    #[error("[{}] {}", .0.code, .0.message)]
    Pack(Diagnostic),

    /// CLI usage or orchestration failure (`CLI*`).
    #[error("[{}] {}", .0.code, .0.message)]
    Cli(Diagnostic),

    /// Service façade usage failure (`SRV*`).
    #[error("[{}] {}", .0.code, .0.message)]
    Service(Diagnostic),
}

impl CompileError {
    pub fn lex(code: &str, message: String, span: Option<SourceSpan>, hint: &str) -> Self {
        CompileError::Lex(Diagnostic::new(code, message, span, hint))
    }

    pub fn parse(code: &str, message: String, span: Option<SourceSpan>, hint: &str) -> Self {
        CompileError::Parse(Diagnostic::new(code, message, span, hint))
    }

    pub fn semantic(code: &str, message: String, span: Option<SourceSpan>, hint: &str) -> Self {
        CompileError::Semantic(Diagnostic::new(code, message, span, hint))
    }

    pub fn expansion(code: &str, message: String, span: Option<SourceSpan>, hint: &str) -> Self {
        CompileError::Expansion(Diagnostic::new(code, message, span, hint))
    }

    pub fn lowering(code: &str, message: String, span: Option<SourceSpan>, hint: &str) -> Self {
        CompileError::Lowering(Diagnostic::new(code, message, span, hint))
    }

    pub fn pack(code: &str, message: String, hint: &str) -> Self {
        CompileError::Pack(Diagnostic::new(code, message, None, hint))
    }

    pub fn cli(code: &str, message: String, hint: &str) -> Self {
        CompileError::Cli(Diagnostic::new(code, message, None, hint))
    }

    pub fn service(code: &str, message: String, hint: &str) -> Self {
        CompileError::Service(Diagnostic::new(code, message, None, hint))
    }

    /// The diagnostic carried by any variant.
    pub fn diagnostic(&self) -> &Diagnostic {
        match self {
            CompileError::Lex(d)
            | CompileError::Parse(d)
            | CompileError::Semantic(d)
            | CompileError::Expansion(d)
            | CompileError::Lowering(d)
            | CompileError::Pack(d)
            | CompileError::Cli(d)
            | CompileError::Service(d) => d,
        }
    }

    /// Short stable error code, e.g. `SEM008`.
    pub fn code(&self) -> &str {
        &self.diagnostic().code
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostic_renders_span_and_hint() {
        let diag = Diagnostic::new(
            "LEX001",
            "Unexpected character '~'.".to_string(),
            Some(SourceSpan::new("demo.icl", 2, 5, 2, 6)),
            "Remove the character.",
        );
        assert_eq!(
            diag.render(),
            "LEX001 demo.icl:2:5: Unexpected character '~'. Hint: Remove the character."
        );
    }

    #[test]
    fn error_exposes_code() {
        let err = CompileError::semantic("SEM008", "ret outside fn".to_string(), None, "");
        assert_eq!(err.code(), "SEM008");
        assert!(err.diagnostic().span.is_none());
    }
}
