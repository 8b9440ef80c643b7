use crate::definition::schema::{PatchDefinition, ValidationError};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

/// File extensions picked up when a definition path names a directory.
pub const DEFINITION_EXTENSIONS: &[&str] = &["def", "json"];

#[derive(Error, Debug)]
pub enum DefinitionError {
    #[error("failed to read patch definition from {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse patch definition{}: {source}", display_path(.path))]
    Parse {
        path: Option<PathBuf>,
        source: serde_json::Error,
    },

    #[error("invalid patch definition{}: {source}", display_path(.path))]
    Validation {
        path: Option<PathBuf>,
        source: ValidationError,
    },

    #[error("failed to scan definition directory {}: {source}", .path.display())]
    Discovery {
        path: PathBuf,
        source: walkdir::Error,
    },

    #[error("no definition files (*.def, *.json) found in {}", .path.display())]
    NoDefinitions { path: PathBuf },
}

fn display_path(path: &Option<PathBuf>) -> String {
    match path {
        Some(path) => format!(" ({})", path.display()),
        None => String::new(),
    }
}

impl DefinitionError {
    fn with_path(self, path: &Path) -> Self {
        let path = path.to_path_buf();
        match self {
            DefinitionError::Parse { path: None, source } => DefinitionError::Parse {
                path: Some(path),
                source,
            },
            DefinitionError::Validation { path: None, source } => DefinitionError::Validation {
                path: Some(path),
                source,
            },
            other => other,
        }
    }
}

pub fn load_from_str(input: &str) -> Result<PatchDefinition, DefinitionError> {
    let definition: PatchDefinition = serde_json::from_str(input)
        .map_err(|source| DefinitionError::Parse { path: None, source })?;
    definition
        .validate()
        .map_err(|source| DefinitionError::Validation { path: None, source })?;
    Ok(definition)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<PatchDefinition, DefinitionError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|source| DefinitionError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    load_from_str(&contents).map_err(|error| error.with_path(path))
}

/// List the definition files directly inside `dir`, sorted by path.
pub fn discover_definition_files(dir: &Path) -> Result<Vec<PathBuf>, DefinitionError> {
    let mut files = Vec::new();

    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|source| DefinitionError::Discovery {
            path: dir.to_path_buf(),
            source,
        })?;
        let is_definition = entry
            .path()
            .extension()
            .and_then(|s| s.to_str())
            .is_some_and(|ext| DEFINITION_EXTENSIONS.contains(&ext));
        if entry.file_type().is_file() && is_definition {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort();

    if files.is_empty() {
        return Err(DefinitionError::NoDefinitions {
            path: dir.to_path_buf(),
        });
    }

    Ok(files)
}

/// Load a definition from a file, or concatenate every definition in a directory.
pub fn load(path: impl AsRef<Path>) -> Result<PatchDefinition, DefinitionError> {
    let path = path.as_ref();
    if !path.is_dir() {
        return load_from_path(path);
    }

    let mut merged = PatchDefinition::default();
    for file in discover_definition_files(path)? {
        tracing::debug!(file = %file.display(), "loading definition file");
        merged.files.extend(load_from_path(&file)?.files);
    }
    Ok(merged)
}
