use std::io;
use thiserror::Error;

/// Fatal conditions raised by the patch protocol.
///
/// None of these are retried: every run is a deterministic transformation of
/// local files, so the whole run aborts on the first one.
#[derive(Error, Debug)]
pub enum PatchError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    // Configuration
    #[error("No \"Name\" field could be read from {0}")]
    AppCodeNotFound(String),

    #[error("Patch archive does not start with a manifest entry")]
    MissingManifest,

    #[error("Unsupported patch version: {found:?} (expected {expected})")]
    UnsupportedVersion { found: String, expected: u32 },

    #[error("Duplicate archive entry: {0}")]
    DuplicateEntry(String),

    #[error("Unrecognized archive entry: {0}")]
    UnknownEntry(String),

    // Paths
    #[error("Output path already exists: {0}")]
    OutputExists(String),

    #[error("Baseline file is missing: {0}")]
    MissingBaseline(String),

    #[error("Entry path escapes the output directory: {0}")]
    UnsafePath(String),

    #[error("Baseline path contains a line break and cannot head a diff entry: {0:?}")]
    LineBreakInPath(String),

    // Format
    #[error("Invalid escape sequence '\\{0}' in inserted text")]
    InvalidEscape(char),

    #[error("Inserted text ends with an unresolved backslash")]
    TrailingBackslash,

    #[error("Unrecognized instruction prefix {0:?}")]
    UnknownInstruction(String),

    #[error("Invalid instruction count {0:?}")]
    InvalidCount(String),

    #[error("Diff entry has no baseline path line")]
    MissingBaselinePath,

    #[error("Invalid patch archive: {0}")]
    InvalidArchive(String),

    // Stream
    #[error("Baseline ended early: needed {expected} more bytes, got {actual}")]
    BaselineExhausted { expected: u64, actual: u64 },

    #[error("Edit script does not reconstruct its inputs")]
    BrokenEditScript,
}

impl PatchError {
    pub fn invalid_archive<S: Into<String>>(msg: S) -> Self {
        PatchError::InvalidArchive(msg.into())
    }
}
