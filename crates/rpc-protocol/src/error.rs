//! Error types for envelope encoding, decoding and typed field access.

/// A payload could not be decoded into an envelope.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The payload is not valid JSON for the envelope shape.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Valid JSON whose top level is an array, string, number or null.
    #[error("envelope is not a JSON object")]
    NotAnObject,
}

/// An envelope could not be encoded.
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    /// Requests must name a function before they are sent.
    #[error("request function is empty")]
    EmptyFunction,

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A typed accessor could not produce a value.
///
/// Callers treat this as a failed operation, never as a default value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FieldError {
    #[error("field '{field}' is missing")]
    Missing { field: String },

    #[error("field '{field}' is not {expected}")]
    WrongType {
        field: String,
        expected: &'static str,
    },

    /// `status` and `message` are envelope fields, not result fields.
    #[error("field '{field}' is reserved")]
    Reserved { field: String },
}

impl FieldError {
    pub(crate) fn missing(field: &str) -> Self {
        Self::Missing {
            field: field.to_string(),
        }
    }

    pub(crate) fn wrong_type(field: &str, expected: &'static str) -> Self {
        Self::WrongType {
            field: field.to_string(),
            expected,
        }
    }

    /// Name of the field this error refers to.
    pub fn field(&self) -> &str {
        match self {
            Self::Missing { field } | Self::WrongType { field, .. } | Self::Reserved { field } => {
                field
            }
        }
    }
}
