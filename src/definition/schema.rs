use serde::Deserialize;
use std::fmt;

/// An ordered list of file sequences, processed in list order.
#[derive(Debug, Deserialize, Default, Clone, PartialEq, Eq)]
#[serde(transparent)]
pub struct PatchDefinition {
    pub files: Vec<FileSequence>,
}

impl PatchDefinition {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();

        for (entry, file) in self.files.iter().enumerate() {
            if file.input_file.trim().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    entry,
                    transition: None,
                    field: "input-file",
                });
            }

            for (index, step) in file.sequence.iter().enumerate() {
                if step.transition.signature.trim().is_empty() {
                    issues.push(ValidationIssue::MissingField {
                        entry,
                        transition: Some(index),
                        field: "transition.signature",
                    });
                }
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }

    /// Total number of transitions across all file sequences.
    pub fn transition_count(&self) -> usize {
        self.files.iter().map(|f| f.sequence.len()).sum()
    }
}

/// One input file and the transitions applied to it, in order.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct FileSequence {
    pub input_file: String,
    #[serde(default)]
    pub output_file: Option<String>,
    #[serde(default)]
    pub sequence: Vec<Transition>,
}

impl FileSequence {
    /// Output location, treating an empty string the same as an absent one.
    pub fn output(&self) -> Option<&str> {
        self.output_file
            .as_deref()
            .filter(|path| !path.trim().is_empty())
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct Transition {
    /// Free-text label, shown in progress output
    #[serde(default)]
    pub desc: String,
    /// Reserved; carried through but never interpreted
    #[serde(default)]
    pub settings: String,
    pub transition: SignaturePatch,
}

/// Hex-encoded signature and its same-length replacement.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct SignaturePatch {
    pub signature: String,
    pub patch: String,
}

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, issue) in self.issues.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationIssue {
    MissingField {
        entry: usize,
        transition: Option<usize>,
        field: &'static str,
    },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::MissingField {
                entry,
                transition,
                field,
            } => match transition {
                Some(index) => write!(
                    f,
                    "entry {entry}, transition {index}: missing required field '{field}'"
                ),
                None => write!(f, "entry {entry}: missing required field '{field}'"),
            },
        }
    }
}
