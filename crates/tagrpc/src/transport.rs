//! # Transport Abstraction
//!
//! The client's only view of the network: send a request buffer, await the
//! response buffer. The transport knows nothing about tags, values or sections.

use std::sync::Arc;

use crate::service::Service;

/// Failures below the call protocol.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransportError {
    /// The peer is unreachable or the connection was dropped.
    #[error("connection lost: {0}")]
    ConnectionLost(String),
    #[error("request timed out")]
    Timeout,
    #[error("i/o error: {0}")]
    Io(String),
}

pub type Result<T> = std::result::Result<T, TransportError>;

/// A mechanism to send a request and receive its reply.
///
/// Object-safe, so clients hold it as `Arc<dyn Transport>`.
#[async_trait::async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Sends a complete request and waits for the complete response.
    ///
    /// # invariants
    /// - Returns the raw reply bytes on success.
    /// - Does not interpret the payload.
    async fn send_and_receive(&self, request: &[u8]) -> Result<Vec<u8>>;
}

/// Connects a client to a service in the same process.
pub struct ServiceTransport {
    service: Arc<Service<()>>,
}

impl ServiceTransport {
    pub fn new(service: Arc<Service<()>>) -> Self {
        Self { service }
    }
}

#[async_trait::async_trait]
impl Transport for ServiceTransport {
    async fn send_and_receive(&self, request: &[u8]) -> Result<Vec<u8>> {
        Ok(self.service.handle(request, &()))
    }
}
