//! Built-in language packs: stable python/js/rust/web plus the experimental
//! pseudo-pack family.

use std::collections::BTreeMap;

use crate::emit::{
    json_literal, BackendEmitter, ExpansionContext, JavaScriptBackend, PythonBackend, RustBackend,
};
use crate::errors::CompileError;
use crate::lowering::{
    lowered_to_graph, Feature, LoweredExpr, LoweredExprKind, LoweredModule, LoweredStmt,
    LoweredStmtKind,
};
use crate::packs::{EmissionContext, LanguagePack, OutputBundle, PackManifest, PackRegistry};

/// Full coverage over the closed feature catalog.
pub fn common_features() -> BTreeMap<Feature, bool> {
    Feature::catalog().into_iter().map(|f| (f, true)).collect()
}

/// Experimental pseudo packs intentionally reject these until implemented
/// per target.
pub fn experimental_features() -> BTreeMap<Feature, bool> {
    let mut features = common_features();
    features.insert(Feature::TypedAnnotation, false);
    features.insert(Feature::Logic, false);
    features.insert(Feature::AtCall, false);
    features
}

fn scaffolding(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

// ============================================================================
// Stable packs
// ============================================================================

/// Stable Python pack (indent block model).
#[derive(Debug)]
pub struct PythonPack {
    manifest: PackManifest,
    backend: PythonBackend,
}

impl PythonPack {
    pub fn new() -> Self {
        PythonPack {
            manifest: PackManifest {
                pack_id: "icl.python".to_string(),
                version: "2.0.0".to_string(),
                target: "python".to_string(),
                stability: "stable".to_string(),
                file_extension: "py".to_string(),
                block_model: "indent".to_string(),
                statement_termination: "newline".to_string(),
                type_strategy: "gradual_symbolic_runtime".to_string(),
                runtime_helpers: Vec::new(),
                scaffolding: scaffolding(&[("primary", "main.py")]),
                feature_coverage: common_features(),
                aliases: vec!["py".to_string()],
            },
            backend: PythonBackend::new(),
        }
    }
}

impl Default for PythonPack {
    fn default() -> Self {
        PythonPack::new()
    }
}

impl LanguagePack for PythonPack {
    fn manifest(&self) -> &PackManifest {
        &self.manifest
    }

    fn emit(&self, lowered: &LoweredModule, context: &EmissionContext) -> String {
        let graph = lowered_to_graph(lowered);
        self.backend
            .emit_module(&graph, &ExpansionContext::for_target(&context.target))
    }
}

/// Stable JavaScript pack with runtime helper injection for runnable output.
#[derive(Debug)]
pub struct JavaScriptPack {
    manifest: PackManifest,
    backend: JavaScriptBackend,
}

impl JavaScriptPack {
    pub fn new() -> Self {
        JavaScriptPack {
            manifest: PackManifest {
                pack_id: "icl.javascript".to_string(),
                version: "2.0.0".to_string(),
                target: "js".to_string(),
                stability: "stable".to_string(),
                file_extension: "js".to_string(),
                block_model: "braces".to_string(),
                statement_termination: "semicolon".to_string(),
                type_strategy: "gradual_symbolic_runtime".to_string(),
                runtime_helpers: vec!["print".to_string()],
                scaffolding: scaffolding(&[("primary", "main.js")]),
                feature_coverage: common_features(),
                aliases: vec!["javascript".to_string(), "node".to_string()],
            },
            backend: JavaScriptBackend::new(),
        }
    }
}

impl Default for JavaScriptPack {
    fn default() -> Self {
        JavaScriptPack::new()
    }
}

impl LanguagePack for JavaScriptPack {
    fn manifest(&self) -> &PackManifest {
        &self.manifest
    }

    fn emit(&self, lowered: &LoweredModule, context: &EmissionContext) -> String {
        let graph = lowered_to_graph(lowered);
        let body = self
            .backend
            .emit_module(&graph, &ExpansionContext::for_target(&context.target));
        if !lowered.required_helpers.iter().any(|h| h == "print") {
            return body;
        }
        let helper = "function print(value) {\n  console.log(value);\n}\n\n";
        format!("{helper}{body}")
    }
}

/// Stable Rust pack (typed block-structured emitter).
#[derive(Debug)]
pub struct RustPack {
    manifest: PackManifest,
    backend: RustBackend,
}

impl RustPack {
    pub fn new() -> Self {
        RustPack {
            manifest: PackManifest {
                pack_id: "icl.rust".to_string(),
                version: "2.0.0".to_string(),
                target: "rust".to_string(),
                stability: "stable".to_string(),
                file_extension: "rs".to_string(),
                block_model: "braces".to_string(),
                statement_termination: "semicolon".to_string(),
                type_strategy: "gradual_symbolic_scaffold".to_string(),
                runtime_helpers: Vec::new(),
                scaffolding: scaffolding(&[("primary", "main.rs")]),
                feature_coverage: common_features(),
                aliases: vec!["rs".to_string()],
            },
            backend: RustBackend::new(),
        }
    }
}

impl Default for RustPack {
    fn default() -> Self {
        RustPack::new()
    }
}

impl LanguagePack for RustPack {
    fn manifest(&self) -> &PackManifest {
        &self.manifest
    }

    fn emit(&self, lowered: &LoweredModule, context: &EmissionContext) -> String {
        let graph = lowered_to_graph(lowered);
        self.backend
            .emit_module(&graph, &ExpansionContext::for_target(&context.target))
    }
}

/// Web target: browser JavaScript plus an HTML/CSS scaffold. The print
/// helper appends to the element with id `icl-output`.
#[derive(Debug)]
pub struct WebPack {
    manifest: PackManifest,
    backend: JavaScriptBackend,
}

impl WebPack {
    pub fn new() -> Self {
        WebPack {
            manifest: PackManifest {
                pack_id: "icl.web.browser".to_string(),
                version: "2.0.0".to_string(),
                target: "web".to_string(),
                stability: "stable".to_string(),
                file_extension: "js".to_string(),
                block_model: "braces".to_string(),
                statement_termination: "semicolon".to_string(),
                type_strategy: "gradual_symbolic_runtime".to_string(),
                runtime_helpers: vec!["print".to_string()],
                scaffolding: scaffolding(&[
                    ("primary", "app.js"),
                    ("html", "index.html"),
                    ("css", "styles.css"),
                ]),
                feature_coverage: common_features(),
                aliases: vec!["browser".to_string(), "webapp".to_string()],
            },
            backend: JavaScriptBackend::new(),
        }
    }
}

impl Default for WebPack {
    fn default() -> Self {
        WebPack::new()
    }
}

const WEB_HTML: &str = r#"<!doctype html>
<html lang="en">
  <head>
    <meta charset="utf-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1" />
    <title>ICL Web Output</title>
    <link rel="stylesheet" href="styles.css" />
  </head>
  <body>
    <main class="container">
      <h1>ICL Web Output</h1>
      <pre id="icl-output"></pre>
    </main>
    <script type="module" src="app.js"></script>
  </body>
</html>
"#;

const WEB_CSS: &str = r#"body {
  margin: 0;
  padding: 2rem;
  font-family: "JetBrains Mono", "Fira Code", monospace;
  background: radial-gradient(circle at top left, #f3f4f6, #dbeafe 50%, #bfdbfe);
  color: #0f172a;
}

.container {
  max-width: 64rem;
  margin: 0 auto;
  padding: 1.5rem;
  border: 1px solid #94a3b8;
  border-radius: 0.75rem;
  background: rgba(255, 255, 255, 0.92);
}

#icl-output {
  min-height: 10rem;
  padding: 1rem;
  border-radius: 0.5rem;
  background: #0f172a;
  color: #e2e8f0;
  overflow: auto;
}
"#;

const WEB_PRINT_HELPER: &str = "const __icl_output = document.getElementById('icl-output');\n\
function print(value) {\n\
  if (__icl_output) {\n\
    __icl_output.textContent += String(value) + '\\n';\n\
  }\n\
  console.log(value);\n\
}\n\n";

impl LanguagePack for WebPack {
    fn manifest(&self) -> &PackManifest {
        &self.manifest
    }

    fn emit(&self, lowered: &LoweredModule, _context: &EmissionContext) -> String {
        let graph = lowered_to_graph(lowered);
        let code = self
            .backend
            .emit_module(&graph, &ExpansionContext::for_target("js"));
        if lowered.required_helpers.iter().any(|h| h == "print") {
            return format!("{WEB_PRINT_HELPER}{code}");
        }
        code
    }

    fn scaffold(&self, emitted_code: String, _context: &EmissionContext) -> OutputBundle {
        let mut files = BTreeMap::new();
        files.insert("index.html".to_string(), WEB_HTML.to_string());
        files.insert("styles.css".to_string(), WEB_CSS.to_string());
        files.insert("app.js".to_string(), emitted_code);
        OutputBundle {
            primary_path: "app.js".to_string(),
            files,
        }
    }
}

// ============================================================================
// Experimental pseudo packs
// ============================================================================

/// Small syntax profile for experimental emitters.
#[derive(Debug, Clone)]
pub struct PseudoProfile {
    pub target: &'static str,
    pub extension: &'static str,
    pub comment_prefix: &'static str,
    pub function_keyword: &'static str,
    pub declaration_prefix: &'static str,
}

/// Experimental pseudo-emitter for broad best-effort language coverage.
#[derive(Debug)]
pub struct PseudoPack {
    profile: PseudoProfile,
    manifest: PackManifest,
}

impl PseudoPack {
    pub fn new(profile: PseudoProfile) -> Self {
        let mut scaffold_files = BTreeMap::new();
        scaffold_files.insert(
            "primary".to_string(),
            format!("main.{}", profile.extension),
        );
        let manifest = PackManifest {
            pack_id: format!("icl.experimental.{}", profile.target),
            version: "2.0.0".to_string(),
            target: profile.target.to_string(),
            stability: "experimental".to_string(),
            file_extension: profile.extension.to_string(),
            block_model: "braces".to_string(),
            statement_termination: "semicolon".to_string(),
            type_strategy: "gradual_symbolic_best_effort".to_string(),
            runtime_helpers: Vec::new(),
            scaffolding: scaffold_files,
            feature_coverage: experimental_features(),
            aliases: Vec::new(),
        };
        PseudoPack { profile, manifest }
    }

    fn emit_stmt(&self, stmt: &LoweredStmt, level: usize) -> Vec<String> {
        let pad = "    ".repeat(level);

        match &stmt.kind {
            LoweredStmtKind::Assignment { name, value, .. } => {
                vec![format!(
                    "{pad}{}{name} = {};",
                    self.profile.declaration_prefix,
                    self.emit_expr(value)
                )]
            }

            LoweredStmtKind::ExpressionStmt { expr } => {
                vec![format!("{pad}{};", self.emit_expr(expr))]
            }

            LoweredStmtKind::If {
                condition,
                then_block,
                else_block,
            } => {
                let mut lines = vec![format!("{pad}if ({}) {{", self.emit_expr(condition))];
                for item in then_block {
                    lines.extend(self.emit_stmt(item, level + 1));
                }
                lines.push(format!("{pad}}}"));
                if !else_block.is_empty() {
                    let last = lines.len() - 1;
                    lines[last] = format!("{pad}}} else {{");
                    for item in else_block {
                        lines.extend(self.emit_stmt(item, level + 1));
                    }
                    lines.push(format!("{pad}}}"));
                }
                lines
            }

            LoweredStmtKind::Loop {
                iterator,
                start,
                end,
                body,
            } => {
                let start_src = self.emit_expr(start);
                let end_src = self.emit_expr(end);
                let decl = self.profile.declaration_prefix;
                let mut lines = vec![format!(
                    "{pad}for ({decl}{iterator} = {start_src}; {iterator} < {end_src}; {iterator}++) {{"
                )];
                for item in body {
                    lines.extend(self.emit_stmt(item, level + 1));
                }
                lines.push(format!("{pad}}}"));
                lines
            }

            LoweredStmtKind::Function { name, params, body, .. } => {
                let param_src: Vec<&str> = params.iter().map(|p| p.name.as_str()).collect();
                let mut lines = vec![format!(
                    "{pad}{} {name}({}) {{",
                    self.profile.function_keyword,
                    param_src.join(", ")
                )];
                for item in body {
                    lines.extend(self.emit_stmt(item, level + 1));
                }
                if body.is_empty() {
                    lines.push(format!("{pad}    return 0;"));
                }
                lines.push(format!("{pad}}}"));
                lines
            }

            LoweredStmtKind::Return { value } => match value {
                Some(expr) => vec![format!("{pad}return {};", self.emit_expr(expr))],
                None => vec![format!("{pad}return;")],
            },
        }
    }

    fn emit_expr(&self, expr: &LoweredExpr) -> String {
        match &expr.kind {
            LoweredExprKind::Literal { value } => json_literal(&value.to_json()),
            LoweredExprKind::Ref { name } => name.clone(),
            LoweredExprKind::Unary { operator, operand } => {
                format!("({operator}{})", self.emit_expr(operand))
            }
            LoweredExprKind::Binary {
                left,
                operator,
                right,
            } => format!(
                "({} {operator} {})",
                self.emit_expr(left),
                self.emit_expr(right)
            ),
            LoweredExprKind::Call { callee, args } => {
                let args: Vec<String> = args.iter().map(|a| self.emit_expr(a)).collect();
                format!("{}({})", self.emit_expr(callee), args.join(", "))
            }
            LoweredExprKind::Lambda { .. } => "null".to_string(),
        }
    }
}

impl LanguagePack for PseudoPack {
    fn manifest(&self) -> &PackManifest {
        &self.manifest
    }

    fn emit(&self, lowered: &LoweredModule, _context: &EmissionContext) -> String {
        let prefix = self.profile.comment_prefix;
        let mut lines = vec![
            format!("{prefix} experimental ICL pack: {}", self.profile.target),
            format!("{prefix} semantics-parity target, syntax is best-effort scaffold"),
            String::new(),
        ];
        for stmt in &lowered.statements {
            lines.extend(self.emit_stmt(stmt, 0));
        }
        format!("{}\n", lines.join("\n").trim_end())
    }
}

/// Profiles for the experimental pseudo-pack family.
pub fn pseudo_profiles() -> Vec<PseudoProfile> {
    vec![
        PseudoProfile { target: "typescript", extension: "ts", comment_prefix: "//", function_keyword: "function", declaration_prefix: "let " },
        PseudoProfile { target: "go", extension: "go", comment_prefix: "//", function_keyword: "func", declaration_prefix: "var " },
        PseudoProfile { target: "java", extension: "java", comment_prefix: "//", function_keyword: "static Object", declaration_prefix: "var " },
        PseudoProfile { target: "csharp", extension: "cs", comment_prefix: "//", function_keyword: "static object", declaration_prefix: "var " },
        PseudoProfile { target: "cpp", extension: "cpp", comment_prefix: "//", function_keyword: "auto", declaration_prefix: "auto " },
        PseudoProfile { target: "php", extension: "php", comment_prefix: "//", function_keyword: "function", declaration_prefix: "$" },
        PseudoProfile { target: "ruby", extension: "rb", comment_prefix: "#", function_keyword: "def", declaration_prefix: "" },
        PseudoProfile { target: "kotlin", extension: "kt", comment_prefix: "//", function_keyword: "fun", declaration_prefix: "var " },
        PseudoProfile { target: "swift", extension: "swift", comment_prefix: "//", function_keyword: "func", declaration_prefix: "var " },
        PseudoProfile { target: "lua", extension: "lua", comment_prefix: "--", function_keyword: "function", declaration_prefix: "local " },
        PseudoProfile { target: "dart", extension: "dart", comment_prefix: "//", function_keyword: "dynamic", declaration_prefix: "var " },
    ]
}

/// Create a registry populated with stable and experimental built-in packs.
pub fn build_builtin_registry() -> Result<PackRegistry, CompileError> {
    let mut registry = PackRegistry::new();

    registry.register(Box::new(PythonPack::new()))?;
    registry.register(Box::new(JavaScriptPack::new()))?;
    registry.register(Box::new(RustPack::new()))?;
    registry.register(Box::new(WebPack::new()))?;

    for profile in pseudo_profiles() {
        registry.register(Box::new(PseudoPack::new(profile)))?;
    }

    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::IrBuilder;
    use crate::lexer::Lexer;
    use crate::lowering::Lowerer;
    use crate::parser::Parser;
    use crate::semantic::SemanticAnalyzer;

    fn lowered(source: &str, target: &str) -> LoweredModule {
        let tokens = Lexer::new(source, "<test>").tokenize().expect("lex");
        let program = Parser::new(tokens).parse_program().expect("parse");
        let semantic = SemanticAnalyzer::new().analyze(&program).expect("semantic");
        let ir = IrBuilder::new(&semantic).build(&program).expect("ir");
        Lowerer::new()
            .lower(&ir, target, &common_features())
            .expect("lower")
    }

    #[test]
    fn builtin_registry_has_stable_and_experimental_targets() {
        let registry = build_builtin_registry().expect("registry");
        assert_eq!(
            registry.targets(Some("stable")),
            vec!["js", "python", "rust", "web"]
        );
        assert_eq!(registry.targets(Some("experimental")).len(), 11);
        assert!(registry.has_target("py"));
        assert!(registry.has_target("node"));
        assert!(registry.has_target("browser"));
    }

    #[test]
    fn js_pack_injects_print_helper_when_required() {
        let registry = build_builtin_registry().expect("registry");
        let pack = registry.get("js").expect("js pack");
        let code = pack.emit(&lowered("print(1);", "js"), &EmissionContext::for_target("js"));
        assert!(code.starts_with("function print(value) {"));
        assert!(code.contains("console.log(value);"));
    }

    #[test]
    fn js_pack_skips_helper_without_print() {
        let registry = build_builtin_registry().expect("registry");
        let pack = registry.get("js").expect("js pack");
        let code = pack.emit(&lowered("x := 1;", "js"), &EmissionContext::for_target("js"));
        assert!(!code.contains("function print"));
    }

    #[test]
    fn web_pack_scaffold_has_three_files() {
        let registry = build_builtin_registry().expect("registry");
        let pack = registry.get("web").expect("web pack");
        let code = pack.emit(&lowered("print(1);", "web"), &EmissionContext::for_target("web"));
        let bundle = pack.scaffold(code, &EmissionContext::for_target("web"));
        assert_eq!(bundle.primary_path, "app.js");
        let keys: Vec<&String> = bundle.files.keys().collect();
        assert_eq!(keys, vec!["app.js", "index.html", "styles.css"]);
        assert!(bundle.files["app.js"].contains("getElementById('icl-output')"));
        assert!(bundle.files["index.html"].contains("app.js"));
        assert!(bundle.files["index.html"].contains("styles.css"));
    }

    #[test]
    fn pseudo_pack_emits_commented_header_and_braces() {
        let registry = build_builtin_registry().expect("registry");
        let pack = registry.get("lua").expect("lua pack");
        let code = pack.emit(&lowered("x := 1;", "lua"), &EmissionContext::for_target("lua"));
        assert!(code.starts_with("-- experimental ICL pack: lua"));
        assert!(code.contains("local x = 1;"));
    }

    #[test]
    fn pseudo_pack_declares_unsupported_features() {
        let registry = build_builtin_registry().expect("registry");
        let manifest = registry.get("go").expect("go pack").manifest().clone();
        assert!(!manifest.feature_coverage[&Feature::TypedAnnotation]);
        assert!(!manifest.feature_coverage[&Feature::Logic]);
        assert!(!manifest.feature_coverage[&Feature::AtCall]);
        assert!(manifest.feature_coverage[&Feature::Loop]);
    }
}
