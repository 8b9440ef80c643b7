pub mod loader;
pub mod schema;

pub use loader::{
    discover_definition_files, load, load_from_path, load_from_str, DefinitionError,
    DEFINITION_EXTENSIONS,
};
pub use schema::{
    FileSequence, PatchDefinition, SignaturePatch, Transition, ValidationError, ValidationIssue,
};
