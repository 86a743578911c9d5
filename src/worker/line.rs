//! Classification of worker status lines.
//!
//! The worker prefixes every status line with a fixed-width level token
//! (`ERROR: relay driver not found`, `INFO: Starting up...`). Only the first
//! [`LEVEL_WIDTH`] bytes are inspected; matching is exact and case-sensitive.

use serde::{Deserialize, Serialize};

/// Width of the level token at the start of a status line.
pub const LEVEL_WIDTH: usize = 5;

/// Severity of a worker status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineLevel {
    Informational,
    Warning,
    /// The worker hit a problem it expects to recover from.
    Error,
    /// The worker detected an unrecoverable device state.
    Fatal,
    Unrecognized,
}

impl LineLevel {
    /// Map a level token to its level.
    #[must_use]
    pub fn from_token(token: &[u8]) -> Self {
        match token {
            b"ERROR" => Self::Error,
            b"FATAL" => Self::Fatal,
            b"INFO:" => Self::Informational,
            b"WARN:" => Self::Warning,
            _ => Self::Unrecognized,
        }
    }
}

/// A classified worker output line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Line {
    pub level: LineLevel,
    /// The line as received, without surrounding whitespace.
    pub text: String,
}

/// Classify a single line of worker output.
#[must_use]
pub fn classify(line: &str) -> Line {
    let text = line.trim();
    let level = text
        .as_bytes()
        .get(..LEVEL_WIDTH)
        .map_or(LineLevel::Unrecognized, LineLevel::from_token);

    Line {
        level,
        text: text.to_string(),
    }
}
