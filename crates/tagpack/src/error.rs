//! # Error Definitions
//!
//! Every failure the codec can report. Decode errors are fatal to the message
//! being read; nothing is skipped or retried.

/// Tagpack serialization and deserialization errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// A byte that does not open the expected element (malformed or truncated data).
    #[error("{}", describe_unexpected(*actual, expected.as_deref()))]
    UnexpectedTag { actual: u8, expected: Option<Vec<u8>> },
    /// The input ended while another byte was required.
    #[error("no byte found in stream")]
    StreamExhausted,
    /// A reference index with no matching entry in the reference table.
    #[error("reference index {0} has no matching entry")]
    BadReference(usize),
    /// The value cannot be represented on the wire.
    #[error("unsupported type: {0}")]
    UnsupportedType(String),
    /// String or char data is not valid UTF-8.
    #[error("bad utf-8 encoding")]
    InvalidUtf8,
    /// A numeric literal failed to parse.
    #[error("invalid number literal {0:?}")]
    InvalidNumber(String),
    /// A date or time literal has out-of-range fields.
    #[error("invalid date literal {0:?}")]
    InvalidDate(String),
    /// A GUID literal failed to parse.
    #[error("invalid guid literal {0:?}")]
    InvalidGuid(String),
    /// A typed accessor or class conversion found a different kind of value.
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: &'static str, found: &'static str },
    /// Containers nested deeper than [`MAX_DEPTH`](crate::MAX_DEPTH), including a cycle written without references.
    #[error("value nested deeper than {0} levels")]
    TooDeep(usize),
}

impl Error {
    pub(crate) fn unexpected(actual: u8) -> Self {
        Error::UnexpectedTag { actual, expected: None }
    }

    pub(crate) fn expected(actual: u8, expected: &[u8]) -> Self {
        Error::UnexpectedTag { actual, expected: Some(expected.to_vec()) }
    }
}

fn describe_unexpected(actual: u8, expected: Option<&[u8]>) -> String {
    let actual = char::from(actual);
    match expected {
        None => format!("unexpected serialize tag '{}' in stream", actual),
        Some(tags) => {
            let tags: String = tags.iter().map(|&b| char::from(b)).collect();
            format!("tag '{}' expected, but '{}' found in stream", tags, actual)
        }
    }
}

/// Specialized `Result` for Tagpack operations.
pub type Result<T> = std::result::Result<T, Error>;
