//! Sequence runner - drives each file through its ordered transitions
//!
//! For every [`FileSequence`] the runner:
//! - Reads the input file once into a [`FileBuffer`]
//! - Decodes each transition's signature and patch, enforcing equal length
//! - Locates the signature in the buffer *as modified by earlier transitions*
//! - Patches the unique match in place
//! - Persists the final buffer if an output location is given
//!
//! Every failure is returned as a [`RunError`]; whether a failing sequence
//! stops the batch is decided by the caller through [`FailurePolicy`].

use crate::codec::{self, CodecError};
use crate::definition::{FileSequence, PatchDefinition, Transition};
use crate::edit::{atomic_write, ByteEdit, EditError, EditResult};
use crate::locate::{locate, Location};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};
use xxhash_rust::xxh3::xxh3_64;

#[derive(Error, Debug)]
pub enum RunError {
    #[error("failed to read input file {}: {source}", .path.display())]
    InputRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("sequence {index} of {}: {field} is not valid hex: {source}", .file.display())]
    HexDecode {
        index: usize,
        file: PathBuf,
        field: &'static str,
        source: CodecError,
    },

    #[error(
        "sequence {index} of {}: signature is {signature_len} bytes but patch is {patch_len} bytes \
         (signature and patch must match in byte size: in-place changes only)",
        .file.display()
    )]
    SizeMismatch {
        index: usize,
        file: PathBuf,
        signature_len: usize,
        patch_len: usize,
    },

    #[error(
        "sequence {index} of {}: patch transition not applied: signature not found",
        .file.display()
    )]
    SignatureNotFound {
        index: usize,
        file: PathBuf,
        /// Offset of a unique occurrence of the patch bytes, if any
        patch_found_at: Option<usize>,
    },

    #[error(
        "sequence {index} of {}: multiple matches ({count}, first at {first:#x}, second at {second:#x}): \
         signature not specific enough",
        .file.display()
    )]
    AmbiguousSignature {
        index: usize,
        file: PathBuf,
        count: usize,
        first: usize,
        second: usize,
    },

    #[error("failed to write output file {}: {source}", .path.display())]
    OutputWrite { path: PathBuf, source: EditError },

    #[error("edit error: {0}")]
    Edit(#[from] EditError),
}

/// What to do with the remaining file sequences after one fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Stop at the first failing sequence
    #[default]
    Abort,
    /// Record the failure and keep going
    Continue,
}

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Directory relative input/output paths are resolved against
    pub base_dir: Option<PathBuf>,
    /// Never persist output, even when an output location is given
    pub dry_run: bool,
}

impl RunOptions {
    pub fn resolve(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }
}

/// A transition that was located and applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedTransition {
    pub index: usize,
    pub desc: String,
    pub offset: usize,
    pub len: usize,
    /// False when the patch bytes equal the signature bytes
    pub changed: bool,
}

/// Outcome of a successful file sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceReport {
    pub input: PathBuf,
    pub output: Option<PathBuf>,
    pub transitions: Vec<AppliedTransition>,
    pub len: usize,
    pub digest_before: u64,
    pub digest_after: u64,
    pub persisted: bool,
}

/// Observer for progress through a run.
///
/// All methods default to doing nothing.
pub trait Progress {
    fn sequence_started(&mut self, _input: &Path, _buffer: &[u8]) {}

    fn before_transition(&mut self, _index: usize, _transition: &Transition, _buffer: &[u8]) {}

    fn after_transition(&mut self, _applied: &AppliedTransition, _buffer: &[u8]) {}

    fn sequence_finished(&mut self, _report: &SequenceReport, _buffer: &[u8]) {}
}

/// Progress observer that reports nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct Silent;

impl Progress for Silent {}

/// The in-memory contents of one input file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileBuffer {
    path: PathBuf,
    bytes: Vec<u8>,
}

impl FileBuffer {
    /// Read the whole input file.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, RunError> {
        let path = path.into();
        let bytes = fs::read(&path).map_err(|source| RunError::InputRead {
            path: path.clone(),
            source,
        })?;
        Ok(Self { path, bytes })
    }

    pub fn from_bytes(path: impl Into<PathBuf>, bytes: Vec<u8>) -> Self {
        Self {
            path: path.into(),
            bytes,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Apply one transition against the current contents.
    pub fn apply(
        &mut self,
        index: usize,
        transition: &Transition,
    ) -> Result<AppliedTransition, RunError> {
        apply_transition(&mut self.bytes, &self.path, index, transition)
    }

    /// Write the current contents to `path` atomically.
    pub fn persist(&self, path: &Path) -> Result<(), RunError> {
        atomic_write(path, &self.bytes).map_err(|source| RunError::OutputWrite {
            path: path.to_path_buf(),
            source,
        })
    }
}

fn decode_field(
    text: &str,
    field: &'static str,
    index: usize,
    file: &Path,
) -> Result<Vec<u8>, RunError> {
    codec::decode(text).map_err(|source| RunError::HexDecode {
        index,
        file: file.to_path_buf(),
        field,
        source,
    })
}

/// Decode, check, locate and patch a single transition.
///
/// `buffer` is only mutated when every check passes, so a failed transition
/// leaves it exactly as it was.
pub fn apply_transition(
    buffer: &mut [u8],
    file: &Path,
    index: usize,
    transition: &Transition,
) -> Result<AppliedTransition, RunError> {
    let signature = decode_field(&transition.transition.signature, "signature", index, file)?;
    let patch = decode_field(&transition.transition.patch, "patch", index, file)?;

    // Ensure in-place editing only
    if signature.len() != patch.len() {
        return Err(RunError::SizeMismatch {
            index,
            file: file.to_path_buf(),
            signature_len: signature.len(),
            patch_len: patch.len(),
        });
    }

    let offset = match locate(buffer, &signature) {
        Location::Unique(offset) => offset,
        Location::NotFound => {
            return Err(RunError::SignatureNotFound {
                index,
                file: file.to_path_buf(),
                patch_found_at: locate(buffer, &patch).offset(),
            });
        }
        Location::Ambiguous {
            count,
            first,
            second,
        } => {
            return Err(RunError::AmbiguousSignature {
                index,
                file: file.to_path_buf(),
                count,
                first,
                second,
            });
        }
    };

    let edit = ByteEdit::new(offset, patch, &signature);
    let changed = match edit.apply(buffer)? {
        EditResult::Applied { .. } => true,
        EditResult::AlreadyApplied { .. } => false,
    };

    debug!(
        file = %file.display(),
        index,
        offset,
        len = signature.len(),
        changed,
        "applied transition"
    );

    Ok(AppliedTransition {
        index,
        desc: transition.desc.clone(),
        offset,
        len: signature.len(),
        changed,
    })
}

/// Run every transition of `sequence` against an already loaded buffer.
pub fn apply_sequence(
    sequence: &[Transition],
    buffer: &mut FileBuffer,
    progress: &mut dyn Progress,
) -> Result<Vec<AppliedTransition>, RunError> {
    let mut applied = Vec::with_capacity(sequence.len());

    for (index, transition) in sequence.iter().enumerate() {
        progress.before_transition(index, transition, buffer.bytes());
        let result = buffer.apply(index, transition)?;
        progress.after_transition(&result, buffer.bytes());
        applied.push(result);
    }

    Ok(applied)
}

/// Load, patch and (optionally) persist one file sequence.
pub fn run_sequence(
    file: &FileSequence,
    options: &RunOptions,
    progress: &mut dyn Progress,
) -> Result<SequenceReport, RunError> {
    let input = options.resolve(&file.input_file);
    let output = file.output().map(|path| options.resolve(path));

    let mut buffer = FileBuffer::load(&input)?;
    let digest_before = xxh3_64(buffer.bytes());
    progress.sequence_started(&input, buffer.bytes());

    let transitions = apply_sequence(&file.sequence, &mut buffer, progress)?;

    let mut persisted = false;
    if let Some(path) = &output {
        if options.dry_run {
            debug!(output = %path.display(), "dry run, output not written");
        } else {
            buffer.persist(path)?;
            info!(
                input = %input.display(),
                output = %path.display(),
                bytes = buffer.bytes().len(),
                "wrote patched output"
            );
            persisted = true;
        }
    }

    let report = SequenceReport {
        input,
        output,
        transitions,
        len: buffer.bytes().len(),
        digest_before,
        digest_after: xxh3_64(buffer.bytes()),
        persisted,
    };
    progress.sequence_finished(&report, buffer.bytes());

    Ok(report)
}

/// Run every file sequence of a definition, in order.
///
/// Returns one `(input-file, result)` pair per sequence that was attempted.
/// Under [`FailurePolicy::Abort`] the last pair is the failure that stopped
/// the run; later sequences are not attempted.
pub fn run_definition(
    definition: &PatchDefinition,
    options: &RunOptions,
    policy: FailurePolicy,
    progress: &mut dyn Progress,
) -> Vec<(String, Result<SequenceReport, RunError>)> {
    let mut results = Vec::with_capacity(definition.files.len());

    for file in &definition.files {
        let result = run_sequence(file, options, progress);
        let failed = result.is_err();

        if let Err(e) = &result {
            warn!(input = %file.input_file, error = %e, "file sequence failed");
        }
        results.push((file.input_file.clone(), result));

        if failed && policy == FailurePolicy::Abort {
            break;
        }
    }

    results
}
