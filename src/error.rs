use thiserror::Error;

/// Failure to retrieve a feed from upstream.
///
/// Variants carry rendered messages rather than the underlying `reqwest`
/// errors so that one failure can be handed to every caller waiting on the
/// same conversion.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("invalid feed url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("request failed: {0}")]
    Transport(String),

    #[error("upstream returned status {0}")]
    Status(u16),

    #[error("failed to read response body: {0}")]
    Body(String),
}

/// The fetched document is not well-formed XML or not an RSS 2.0 tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("document has no root element")]
    Empty,

    #[error("document root is <{0}>, expected <rss>")]
    UnexpectedRoot(String),

    #[error("malformed feed: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("parse failed: {0}")]
    Parse(#[from] ParseError),

    /// The background conversion panicked or was cancelled by runtime shutdown.
    #[error("conversion interrupted: {0}")]
    Interrupted(String),
}
