//! Error types for relnotes
//!
//! Covers every failure mode of the release-notes pipeline:
//! - Change source access (missing refs, unreadable repository)
//! - LLM capability calls (unavailable, rate limited, timeouts)
//! - Output validation of LLM payloads (schema violations)
//! - Review manifest integrity (corrupt edits, pending entries, locking)
//! - Per-language translation failures
//! - File I/O

use std::fmt;
use std::io;

/// Result type alias for relnotes operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for relnotes
#[derive(Debug)]
pub enum Error {
    /// Change source errors
    Source(SourceError),
    /// LLM capability errors
    Llm(LlmError),
    /// LLM output failed schema validation
    Validation(ValidationError),
    /// Ambiguous change could not be classified
    Classification(ClassificationError),
    /// Review manifest errors
    Manifest(ManifestError),
    /// Translation errors
    Translation(TranslationError),
    /// I/O errors
    Io(IoError),
}

/// Change source errors
#[derive(Debug)]
pub enum SourceError {
    /// Reference could not be resolved to a commit
    RefNotFound(String),
    /// Repository missing or unreadable
    SourceUnavailable { location: String, details: String },
}

/// LLM capability errors (transport level, never schema level)
#[derive(Debug)]
pub enum LlmError {
    /// Endpoint or process could not serve the request
    CapabilityUnavailable { model: String, details: String },
    /// Rate limit exceeded (429 response)
    RateLimited { model: String, retry_after: Option<u64> },
    /// Call exceeded its timeout budget
    Timeout { model: String, secs: u64 },
    /// Credentials rejected
    AuthenticationFailed(String),
    /// Transport envelope could not be decoded
    InvalidResponse { model: String, details: String },
}

/// Output validation errors
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Payload does not conform to the response schema
    SchemaViolation(String),
}

/// Classification errors
#[derive(Debug)]
pub enum ClassificationError {
    /// Retries exhausted without an acceptable result
    Unresolved { id: String, attempts: u32, last_error: String },
}

/// A single offending manifest entry
#[derive(Debug, Clone, PartialEq)]
pub struct EntryProblem {
    pub id: String,
    pub details: String,
}

/// Review manifest errors
#[derive(Debug)]
pub enum ManifestError {
    /// No entries qualified and policy forbids an empty release
    EmptyManifest,
    /// Persisted manifest failed shape validation
    ManifestCorrupt { path: String, problems: Vec<EntryProblem> },
    /// Enforcement is on and entries are still pending
    PendingEntriesRemain(Vec<String>),
    /// Requested lifecycle transition is not allowed from the current state
    InvalidTransition { from: String, to: String },
    /// Another run holds the manifest lock
    ManifestLocked(String),
    /// No manifest has been drafted at the given location
    NotFound(String),
}

/// Translation errors
#[derive(Debug)]
pub enum TranslationError {
    /// At least one entry could not be translated
    TranslationIncomplete { lang: String, missing: Vec<String>, details: String },
}

/// File I/O errors
#[derive(Debug)]
pub enum IoError {
    /// Failed to read file
    FileReadFailed { path: String, source: io::Error },
    /// Failed to write file
    FileWriteFailed { path: String, source: io::Error },
    /// Failed to create directory
    DirectoryCreateFailed { path: String, source: io::Error },
    /// Other I/O error
    Other(io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Source(e) => write!(f, "Source error: {}", e),
            Error::Llm(e) => write!(f, "LLM error: {}", e),
            Error::Validation(e) => write!(f, "Validation error: {}", e),
            Error::Classification(e) => write!(f, "Classification error: {}", e),
            Error::Manifest(e) => write!(f, "Manifest error: {}", e),
            Error::Translation(e) => write!(f, "Translation error: {}", e),
            Error::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceError::RefNotFound(name) => write!(f, "Reference not found: {}", name),
            SourceError::SourceUnavailable { location, details } => {
                write!(f, "Source unavailable at {}: {}", location, details)
            }
        }
    }
}

impl fmt::Display for LlmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LlmError::CapabilityUnavailable { model, details } => {
                write!(f, "{} unavailable: {}", model, details)
            }
            LlmError::RateLimited { model, retry_after } => match retry_after {
                Some(seconds) => write!(
                    f,
                    "Rate limit exceeded for {} (retry after {} seconds)",
                    model, seconds
                ),
                None => write!(f, "Rate limit exceeded for {}", model),
            },
            LlmError::Timeout { model, secs } => {
                write!(f, "Request to {} timed out after {}s", model, secs)
            }
            LlmError::AuthenticationFailed(model) => {
                write!(f, "Authentication failed for {}", model)
            }
            LlmError::InvalidResponse { model, details } => {
                write!(f, "Invalid response from {}: {}", model, details)
            }
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::SchemaViolation(details) => {
                write!(f, "Schema violation: {}", details)
            }
        }
    }
}

impl fmt::Display for ClassificationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClassificationError::Unresolved { id, attempts, last_error } => write!(
                f,
                "Change {} unresolved after {} attempts: {}",
                id, attempts, last_error
            ),
        }
    }
}

impl fmt::Display for EntryProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.id, self.details)
    }
}

impl fmt::Display for ManifestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManifestError::EmptyManifest => {
                write!(f, "No changes qualified for the release notes")
            }
            ManifestError::ManifestCorrupt { path, problems } => {
                let listed: Vec<String> = problems.iter().map(|p| p.to_string()).collect();
                write!(f, "Manifest {} is corrupt: {}", path, listed.join("; "))
            }
            ManifestError::PendingEntriesRemain(ids) => write!(
                f,
                "{} entries still pending review: {}",
                ids.len(),
                ids.join(", ")
            ),
            ManifestError::InvalidTransition { from, to } => {
                write!(f, "Cannot move manifest from {} to {}", from, to)
            }
            ManifestError::ManifestLocked(path) => {
                write!(f, "Manifest is locked by another run: {}", path)
            }
            ManifestError::NotFound(path) => {
                write!(f, "No review manifest found at {}", path)
            }
        }
    }
}

impl fmt::Display for TranslationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TranslationError::TranslationIncomplete { lang, missing, details } => {
                if missing.is_empty() {
                    write!(f, "Translation to {} incomplete: {}", lang, details)
                } else {
                    write!(
                        f,
                        "Translation to {} incomplete ({} entries untranslated): {}",
                        lang,
                        missing.len(),
                        details
                    )
                }
            }
        }
    }
}

impl fmt::Display for IoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IoError::FileReadFailed { path, source } => {
                write!(f, "Failed to read {}: {}", path, source)
            }
            IoError::FileWriteFailed { path, source } => {
                write!(f, "Failed to write {}: {}", path, source)
            }
            IoError::DirectoryCreateFailed { path, source } => {
                write!(f, "Failed to create directory {}: {}", path, source)
            }
            IoError::Other(source) => write!(f, "{}", source),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(IoError::FileReadFailed { source, .. })
            | Error::Io(IoError::FileWriteFailed { source, .. })
            | Error::Io(IoError::DirectoryCreateFailed { source, .. })
            | Error::Io(IoError::Other(source)) => Some(source),
            _ => None,
        }
    }
}

impl std::error::Error for SourceError {}
impl std::error::Error for LlmError {}
impl std::error::Error for ValidationError {}
impl std::error::Error for ClassificationError {}
impl std::error::Error for ManifestError {}
impl std::error::Error for TranslationError {}
impl std::error::Error for IoError {}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(IoError::Other(err))
    }
}

impl From<ValidationError> for Error {
    fn from(err: ValidationError) -> Self {
        Error::Validation(err)
    }
}

impl From<ManifestError> for Error {
    fn from(err: ManifestError) -> Self {
        Error::Manifest(err)
    }
}

impl Error {
    /// Check if a capability call should be attempted again
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Llm(LlmError::CapabilityUnavailable { .. })
                | Error::Llm(LlmError::RateLimited { .. })
                | Error::Llm(LlmError::Timeout { .. })
        )
    }

    /// Check if the error must halt forward progress of the run
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Source(_)
                | Error::Manifest(_)
                | Error::Llm(LlmError::AuthenticationFailed(_))
        )
    }

    /// Ids of the manifest entries an operator must look at, if any
    pub fn offending_ids(&self) -> Vec<String> {
        match self {
            Error::Manifest(ManifestError::ManifestCorrupt { problems, .. }) => {
                problems.iter().map(|p| p.id.clone()).collect()
            }
            Error::Manifest(ManifestError::PendingEntriesRemain(ids)) => ids.clone(),
            _ => Vec::new(),
        }
    }

    /// Get formatted context string for logging
    pub fn context(&self) -> String {
        match self {
            Error::Source(e) => format!("source: {}", e),
            Error::Llm(e) => format!("llm: {}", e),
            Error::Validation(e) => format!("validation: {}", e),
            Error::Classification(e) => format!("classification: {}", e),
            Error::Manifest(e) => format!("manifest: {}", e),
            Error::Translation(e) => format!("translation: {}", e),
            Error::Io(e) => format!("io: {}", e),
        }
    }
}
