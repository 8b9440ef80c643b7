use std::fs;
use std::io::Write;
use std::path::Path;
use thiserror::Error;
use xxhash_rust::xxh3::xxh3_64;

/// Overwrite `buffer[offset..offset + patch.len()]` with `patch`.
///
/// Strictly in place: the buffer never grows or shrinks. The span must lie
/// inside the buffer; the runner guarantees this by only patching offsets
/// returned from a unique locate of a signature with the same length.
pub fn apply_patch(buffer: &mut [u8], offset: usize, patch: &[u8]) -> Result<(), EditError> {
    let span = checked_span(buffer.len(), offset, patch.len())?;
    buffer[span].copy_from_slice(patch);
    Ok(())
}

fn checked_span(
    buffer_len: usize,
    offset: usize,
    len: usize,
) -> Result<std::ops::Range<usize>, EditError> {
    match offset.checked_add(len) {
        Some(end) if end <= buffer_len => Ok(offset..end),
        _ => Err(EditError::InvalidByteRange {
            offset,
            len,
            buffer_len,
        }),
    }
}

/// A verified in-place byte edit.
///
/// Unlike [`apply_patch`], a `ByteEdit` carries what it expects to find at the
/// span before writing, so a stale offset is caught instead of silently
/// overwriting unrelated bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "ByteEdit does nothing until apply() is called"]
pub struct ByteEdit {
    /// Starting byte offset (inclusive)
    pub offset: usize,
    /// Bytes written at [offset, offset + replacement.len())
    pub replacement: Vec<u8>,
    /// Verification of what we expect to find before applying
    pub expected_before: EditVerification,
}

/// Verification strategy for edit safety.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditVerification {
    /// Exact byte match required
    ExactMatch(Vec<u8>),
    /// xxh3 hash of expected bytes (cheaper to carry for large spans)
    Hash(u64),
}

impl EditVerification {
    /// Check if the provided bytes match the verification criteria.
    pub fn matches(&self, bytes: &[u8]) -> bool {
        match self {
            EditVerification::ExactMatch(expected) => bytes == expected.as_slice(),
            EditVerification::Hash(expected_hash) => xxh3_64(bytes) == *expected_hash,
        }
    }

    /// Create verification from bytes, using hash for spans over 1KB.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        if bytes.len() > 1024 {
            EditVerification::Hash(xxh3_64(bytes))
        } else {
            EditVerification::ExactMatch(bytes.to_vec())
        }
    }
}

#[derive(Error, Debug)]
pub enum EditError {
    #[error("Before-bytes verification failed at offset {offset:#x}: found {found}")]
    BeforeBytesMismatch { offset: usize, found: String },

    #[error("Invalid byte range: {len} bytes at offset {offset:#x} in buffer of length {buffer_len}")]
    InvalidByteRange {
        offset: usize,
        len: usize,
        buffer_len: usize,
    },

    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result of applying an edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "EditResult should be checked for applied/already-applied"]
pub enum EditResult {
    /// Edit was applied
    Applied { offset: usize, bytes_changed: usize },
    /// Span already held the replacement bytes
    AlreadyApplied { offset: usize },
}

impl ByteEdit {
    /// Create a new edit with automatic verification generation.
    pub fn new(offset: usize, replacement: impl Into<Vec<u8>>, expected_before: &[u8]) -> Self {
        Self {
            offset,
            replacement: replacement.into(),
            expected_before: EditVerification::from_bytes(expected_before),
        }
    }

    /// Create an edit with explicit verification strategy.
    pub fn with_verification(
        offset: usize,
        replacement: impl Into<Vec<u8>>,
        verification: EditVerification,
    ) -> Self {
        Self {
            offset,
            replacement: replacement.into(),
            expected_before: verification,
        }
    }

    /// Validate and apply this edit to `buffer` in place.
    pub fn apply(&self, buffer: &mut [u8]) -> Result<EditResult, EditError> {
        let span = checked_span(buffer.len(), self.offset, self.replacement.len())?;
        let current = &buffer[span];

        // Check if already applied (idempotency)
        if current == self.replacement.as_slice() {
            return Ok(EditResult::AlreadyApplied {
                offset: self.offset,
            });
        }

        if !self.expected_before.matches(current) {
            return Err(EditError::BeforeBytesMismatch {
                offset: self.offset,
                found: crate::codec::encode(current),
            });
        }

        apply_patch(buffer, self.offset, &self.replacement)?;

        Ok(EditResult::Applied {
            offset: self.offset,
            bytes_changed: self.replacement.len(),
        })
    }
}

/// Atomic file write: tempfile + fsync + rename.
///
/// Either the full write succeeds or the destination is left untouched. An
/// existing destination keeps its permissions; a new one is created 0644 on
/// unix.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<(), EditError> {
    // Create tempfile in same directory to ensure same filesystem
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let existing_permissions = fs::metadata(path).ok().map(|m| m.permissions());

    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(content)?;
    temp.as_file().sync_all()?;

    match existing_permissions {
        Some(permissions) => temp.as_file().set_permissions(permissions)?,
        None => set_new_file_permissions(temp.as_file())?,
    }

    temp.persist(path).map_err(|e| e.error)?;

    Ok(())
}

#[cfg(unix)]
fn set_new_file_permissions(file: &fs::File) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(fs::Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
fn set_new_file_permissions(_file: &fs::File) -> std::io::Result<()> {
    Ok(())
}
