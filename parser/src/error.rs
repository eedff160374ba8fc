use thiserror::Error;

/// Errors produced while decoding a `.wowsreplay` file.
///
/// In lenient mode an incomplete battle (no terminal statistics packet) is
/// not an error; `NoBattleStats` is only raised by strict-mode callers.
#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("malformed header: {0}")]
    MalformedHeader(&'static str),

    #[error("packet stream decryption failed: {0}")]
    DecryptFailure(&'static str),

    #[error("unsupported client version {0}")]
    UnsupportedVersion(String),

    #[error("truncated packet stream at offset {offset}")]
    TruncatedStream { offset: usize },

    #[error("replay has no battle statistics packet")]
    NoBattleStats,

    #[error("metadata is not valid JSON: {0}")]
    MalformedMeta(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ReplayError>;
