//! Sigpatch: deterministic in-place binary patching
//!
//! Binary files are patched by locating a byte *signature* and overwriting it
//! with a *patch* of exactly the same length. A declarative definition lists,
//! per input file, an ordered sequence of such transitions.
//!
//! # Architecture
//!
//! - [`codec`] turns the hex text of a definition into bytes (and back)
//! - [`locate`] finds the single occurrence of a signature in a buffer
//! - [`edit`] overwrites a span in place and writes files atomically
//! - [`definition`] loads and validates JSON definitions
//! - [`runner`] drives each file through its transitions
//!
//! # Safety
//!
//! - A signature must match exactly once; more than one match is an error,
//!   never resolved by picking the first
//! - Signature and patch must decode to the same length (in-place only)
//! - Each transition searches the buffer as modified by the previous ones
//! - Outputs are written atomically (tempfile + fsync + rename)
//!
//! # Example
//!
//! ```
//! use sigpatch::{locate, Location};
//!
//! let mut rom = vec![0u8; 20];
//! rom[10..14].copy_from_slice(&[0xde, 0xad, 0xbe, 0xef]);
//!
//! let signature = sigpatch::codec::decode("DEADBEEF").unwrap();
//! let patch = sigpatch::codec::decode("CAFEBABE").unwrap();
//!
//! let Location::Unique(offset) = locate(&rom, &signature) else {
//!     panic!("signature is not unique");
//! };
//! sigpatch::apply_patch(&mut rom, offset, &patch).unwrap();
//! assert_eq!(&rom[10..14], &[0xca, 0xfe, 0xba, 0xbe]);
//! ```

pub mod codec;
pub mod definition;
pub mod edit;
pub mod locate;
pub mod runner;

// Re-exports
pub use codec::CodecError;
pub use definition::{
    load, load_from_path, load_from_str, DefinitionError, FileSequence, PatchDefinition,
    SignaturePatch, Transition,
};
pub use edit::{apply_patch, atomic_write, ByteEdit, EditError, EditResult, EditVerification};
pub use locate::{locate, Location};
pub use runner::{
    apply_sequence, apply_transition, run_definition, run_sequence, AppliedTransition,
    FailurePolicy, FileBuffer, Progress, RunError, RunOptions, SequenceReport, Silent,
};
