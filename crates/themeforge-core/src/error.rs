//! Error types for Themeforge

/// Result type alias using Themeforge's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Maximum number of raw model characters kept inside a parse error
pub const RAW_SNIPPET_LIMIT: usize = 400;

/// Core error type for Themeforge operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A field required by the selected provider is missing
    #[error("configuration error: {0}")]
    Config(String),

    /// Unrecognized provider id
    #[error("unknown provider: {0}")]
    Provider(String),

    /// Extraction output could not be parsed, even after one repair
    #[error("failed to parse model output: {message} (raw: {raw})")]
    Parse { message: String, raw: String },

    /// No theme survived normalization
    #[error("model returned no usable themes")]
    EmptyResult,

    /// Secondary tagger failure, recoverable
    #[error("tag enhancement failed: {0}")]
    Enhancement(String),

    /// Backend transport or inference failure
    #[error("backend error: {0}")]
    Backend(String),

    /// Timeout errors
    #[error("operation timed out")]
    Timeout,

    /// Local generation was cancelled
    #[error("generation cancelled")]
    Cancelled,

    /// Network/IO errors
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic internal errors
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new provider error
    pub fn provider(id: impl Into<String>) -> Self {
        Self::Provider(id.into())
    }

    /// Create a parse error, keeping only a prefix of the raw text
    pub fn parse(message: impl Into<String>, raw: &str) -> Self {
        Self::Parse {
            message: message.into(),
            raw: truncate_chars(raw, RAW_SNIPPET_LIMIT),
        }
    }

    /// Create a new enhancement error
    pub fn enhancement(msg: impl Into<String>) -> Self {
        Self::Enhancement(msg.into())
    }

    /// Create a new backend error
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether the error may be swallowed by the stage that raised it
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Enhancement(_))
    }
}

/// Truncate to at most `limit` characters, marking the cut with an ellipsis
pub fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
