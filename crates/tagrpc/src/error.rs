//! # Error Definitions

use crate::mode::ResultMode;
use crate::transport::TransportError;

/// Everything that can fail while making or answering a call.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Encoding or decoding a message body failed.
    #[error("codec error: {0}")]
    Codec(#[from] tagpack::Error),
    /// The transport could not deliver the request or the reply.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    /// No function is registered under the requested name and there is no wildcard.
    #[error("can't find this function {0}()")]
    UnknownMethod(String),
    /// The service answered with an `Error` section.
    #[error("{0}")]
    Remote(String),
    /// The request is not terminated, or opens with something other than a call.
    #[error("wrong request: {0}")]
    MalformedRequest(String),
    /// The response is not terminated, or carries an unknown section.
    #[error("wrong response: {0}")]
    MalformedResponse(String),
    /// A handler or hook reported a failure.
    #[error(transparent)]
    Handler(#[from] anyhow::Error),
    /// A handler in a byte-producing result mode returned something else.
    #[error("function {method}() must return bytes in {mode:?} mode")]
    InvalidOutput { method: String, mode: ResultMode },
}

pub type Result<T> = std::result::Result<T, Error>;
