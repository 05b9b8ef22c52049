//! # Language Packs & Registry
//!
//! A language pack is a `(manifest, emit, scaffold)` bundle for one target.
//! The registry keys packs by canonical target name and resolves aliases;
//! registration validates the manifest first. Targets are listed in sorted
//! order everywhere so outputs stay deterministic.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::errors::CompileError;
use crate::lowering::{Feature, LoweredModule};

pub mod builtin;

pub use builtin::build_builtin_registry;

pub const VALID_STABILITIES: [&str; 3] = ["experimental", "beta", "stable"];

/// Declarative metadata for a target language pack.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PackManifest {
    pub pack_id: String,
    pub version: String,
    pub target: String,
    pub stability: String,
    pub file_extension: String,
    pub block_model: String,
    pub statement_termination: String,
    pub type_strategy: String,
    pub runtime_helpers: Vec<String>,
    pub scaffolding: BTreeMap<String, String>,
    pub feature_coverage: BTreeMap<Feature, bool>,
    pub aliases: Vec<String>,
}

/// Context passed into pack emit/scaffold calls.
#[derive(Debug, Clone, Default)]
pub struct EmissionContext {
    pub target: String,
    pub debug: bool,
    pub metadata: BTreeMap<String, String>,
}

impl EmissionContext {
    pub fn for_target(target: &str) -> Self {
        EmissionContext {
            target: target.to_string(),
            ..EmissionContext::default()
        }
    }
}

/// Scaffolded output payload for a target.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputBundle {
    pub primary_path: String,
    pub files: BTreeMap<String, String>,
}

impl OutputBundle {
    /// Contents of the primary file.
    pub fn code(&self) -> &str {
        self.files
            .get(&self.primary_path)
            .map_or("", String::as_str)
    }

    pub fn single_file(path: &str, code: String) -> Self {
        let mut files = BTreeMap::new();
        files.insert(path.to_string(), code);
        OutputBundle {
            primary_path: path.to_string(),
            files,
        }
    }
}

/// Language pack contract: emit a source string, scaffold an output bundle.
pub trait LanguagePack: std::fmt::Debug {
    /// Pack manifest used for registration and capability lookup.
    fn manifest(&self) -> &PackManifest;

    /// Emit target source text for a lowered module.
    fn emit(&self, lowered: &LoweredModule, context: &EmissionContext) -> String;

    /// Default scaffolding: one file at `primary` (or `main.<ext>`).
    fn scaffold(&self, emitted_code: String, _context: &EmissionContext) -> OutputBundle {
        let manifest = self.manifest();
        let filename = manifest
            .scaffolding
            .get("primary")
            .cloned()
            .unwrap_or_else(|| format!("main.{}", manifest.file_extension));
        OutputBundle::single_file(&filename, emitted_code)
    }
}

/// Validation summary for one pack manifest.
#[derive(Debug, Clone, Serialize)]
pub struct PackValidationResult {
    pub target: String,
    pub ok: bool,
    pub errors: Vec<String>,
}

/// Registry for language packs with alias-aware lookup.
#[derive(Default)]
pub struct PackRegistry {
    packs: BTreeMap<String, Box<dyn LanguagePack>>,
    alias_to_target: BTreeMap<String, String>,
}

impl PackRegistry {
    pub fn new() -> Self {
        PackRegistry::default()
    }

    /// Validate and register a pack under its canonical target and aliases.
    pub fn register(&mut self, pack: Box<dyn LanguagePack>) -> Result<(), CompileError> {
        let manifest = pack.manifest().clone();
        let errors = validate_manifest(&manifest);
        if !errors.is_empty() {
            return Err(CompileError::pack(
                "PACK002",
                format!(
                    "Invalid language pack manifest for target '{}'.",
                    manifest.target
                ),
                &errors.join("; "),
            ));
        }

        self.alias_to_target
            .insert(manifest.target.clone(), manifest.target.clone());
        for alias in &manifest.aliases {
            self.alias_to_target
                .insert(alias.clone(), manifest.target.clone());
        }
        self.packs.insert(manifest.target.clone(), pack);
        Ok(())
    }

    pub fn has_target(&self, target: &str) -> bool {
        self.alias_to_target.contains_key(target)
    }

    /// Resolve a target or alias to its pack; misses raise `PACK001` listing
    /// every available target.
    pub fn get(&self, target: &str) -> Result<&dyn LanguagePack, CompileError> {
        let Some(canonical) = self.alias_to_target.get(target) else {
            return Err(CompileError::pack(
                "PACK001",
                format!("Unknown target language pack '{target}'."),
                &format!("Available packs: {}", self.targets(None).join(", ")),
            ));
        };
        Ok(self.packs[canonical].as_ref())
    }

    /// Canonical target names, sorted, optionally filtered by stability.
    pub fn targets(&self, stability: Option<&str>) -> Vec<String> {
        self.manifests(stability)
            .into_iter()
            .map(|m| m.target)
            .collect()
    }

    /// Manifests sorted by target, optionally filtered by stability.
    pub fn manifests(&self, stability: Option<&str>) -> Vec<PackManifest> {
        self.packs
            .values()
            .map(|p| p.manifest().clone())
            .filter(|m| stability.is_none_or(|s| m.stability == s))
            .collect()
    }

    /// Re-validate one target's manifest, or all of them.
    pub fn validate(&self, target: Option<&str>) -> Result<Vec<PackValidationResult>, CompileError> {
        let manifests = match target {
            Some(t) => vec![self.get(t)?.manifest().clone()],
            None => self.manifests(None),
        };
        Ok(manifests
            .into_iter()
            .map(|m| {
                let errors = validate_manifest(&m);
                PackValidationResult {
                    target: m.target,
                    ok: errors.is_empty(),
                    errors,
                }
            })
            .collect())
    }
}

fn validate_manifest(manifest: &PackManifest) -> Vec<String> {
    let mut errors: Vec<String> = Vec::new();
    if manifest.pack_id.trim().is_empty() {
        errors.push("pack_id is required".to_string());
    }
    if manifest.version.trim().is_empty() {
        errors.push("version is required".to_string());
    }
    if manifest.target.trim().is_empty() {
        errors.push("target is required".to_string());
    }
    if !VALID_STABILITIES.contains(&manifest.stability.as_str()) {
        errors.push("stability must be one of: experimental, beta, stable".to_string());
    }
    if manifest.file_extension.trim().is_empty() {
        errors.push("file_extension is required".to_string());
    }
    if manifest.block_model.trim().is_empty() {
        errors.push("block_model is required".to_string());
    }
    if manifest.statement_termination.trim().is_empty() {
        errors.push("statement_termination is required".to_string());
    }
    if manifest.type_strategy.trim().is_empty() {
        errors.push("type_strategy is required".to_string());
    }
    errors
}
