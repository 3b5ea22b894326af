/// Error types for language variant conversion
use crate::variant::VariantCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LangConvError {
    /// A string could not be parsed as a variant code
    #[error("Invalid variant code '{code}': {reason}")]
    InvalidVariantCode { code: String, reason: String },

    /// The replacement machine has no table for one side of the pair
    #[error("Unsupported variant conversion: {from} -> {to}")]
    UnsupportedVariant { from: VariantCode, to: VariantCode },

    /// The caller declared a source variant the machine does not implement
    #[error("Invalid source variant: {source_variant} for target {target}")]
    InvalidSourceVariant {
        source_variant: String,
        target: String,
    },

    /// Language data was found but could not be turned into tables
    #[error("Failed to load language data from '{origin}': {message}")]
    DataLoad { origin: String, message: String },

    /// Markup could not be parsed into a document tree
    #[error("Markup error: {0}")]
    Markup(String),

    /// Unsupported or malformed selector
    #[error("Invalid selector '{0}'")]
    Selector(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Result type for conversion operations
pub type LangConvResult<T> = Result<T, LangConvError>;
