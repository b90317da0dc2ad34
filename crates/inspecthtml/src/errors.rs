use thiserror::Error;

/// Fatal parse failures. Recoverable anomalies (an attribute the dissector
/// could not locate, a stand-in key with no stored metadata) degrade the
/// side table instead of failing the parse.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The byte source or the upstream parser failed; surfaced unchanged.
    #[error("upstream parse failed: {0}")]
    Upstream(#[from] std::io::Error),

    /// An end-tag marker comment failed to parse back into a range. The
    /// rebuild is deterministic, so this indicates a bug in the shim rather
    /// than bad input.
    #[error("corrupt end-tag marker: {0:?}")]
    CorruptEndTagMarker(String),
}
