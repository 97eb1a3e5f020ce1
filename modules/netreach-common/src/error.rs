use thiserror::Error;

/// Error taxonomy for the search engine core.
///
/// No single plugin or channel failure is allowed to propagate as an
/// `EngineError` — those are absorbed at their source (§7 of the spec) and
/// surface only as missing entries in a response. This enum covers the
/// failures that are allowed to reach a caller: validation, and the
/// catastrophic cases the HTTP entry maps to a 5xx.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("required field missing: {0}")]
    MissingField(String),

    #[error("cache error: {0}")]
    Cache(String),

    #[error("plugin error: {0}")]
    Plugin(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
