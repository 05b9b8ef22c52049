//! Output scaffolding and bundle persistence.
//!
//! Writing a bundle follows the persisted-bundle contract: a path with a file
//! extension receives a single file's contents directly; a directory path
//! receives every bundle file at `path/relative_name`; a multi-file bundle
//! aimed at an extensioned path is a usage error (`CLI010`).

use std::fs;
use std::path::Path;

use crate::errors::CompileError;
use crate::packs::{EmissionContext, LanguagePack, OutputBundle};

/// Run the pack scaffolding stage and return the output bundle.
pub fn scaffold_output(
    pack: &dyn LanguagePack,
    code: String,
    target: &str,
    debug: bool,
) -> OutputBundle {
    let context = EmissionContext {
        target: target.to_string(),
        debug,
        metadata: std::collections::BTreeMap::new(),
    };
    pack.scaffold(code, &context)
}

/// Write a scaffolded bundle to `output_path` and return the primary text.
pub fn write_bundle(bundle: &OutputBundle, output_path: &Path) -> Result<String, CompileError> {
    if output_path.extension().is_some() {
        if bundle.files.len() > 1 {
            return Err(CompileError::cli(
                "CLI010",
                format!(
                    "Output path '{}' must be a directory for multi-file target artifacts.",
                    output_path.display()
                ),
                "Use -o <directory> for targets like web that emit multiple files.",
            ));
        }
        write_text(output_path, bundle.code())?;
        return Ok(bundle.code().to_string());
    }

    fs::create_dir_all(output_path).map_err(|err| io_error(output_path, &err))?;
    for (relative_path, body) in &bundle.files {
        let file_path = output_path.join(relative_path);
        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent).map_err(|err| io_error(parent, &err))?;
        }
        write_text(&file_path, body)?;
    }
    Ok(bundle.code().to_string())
}

fn write_text(path: &Path, contents: &str) -> Result<(), CompileError> {
    fs::write(path, contents).map_err(|err| io_error(path, &err))
}

fn io_error(path: &Path, err: &std::io::Error) -> CompileError {
    CompileError::cli(
        "CLI011",
        format!("Failed to write '{}': {err}", path.display()),
        "Check output path and permissions.",
    )
}
