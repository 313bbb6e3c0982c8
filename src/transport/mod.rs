//! Byte-oriented bidirectional transport to the relay.
//!
//! # Architecture
//!
//! ```text
//! Credential ──▶ ConnectionEstablisher::connect(role)
//!                   │  Sec-WebSocket-Protocol: pcm-f32le,basic-auth-…
//!                   ▼
//!               WsTransport  (impl Transport)
//!                   │  one binary message == one SampleBlock
//!                   ▼
//!               relay (external)
//! ```
//!
//! [`Transport`] is the seam the sessions are written against;
//! [`MemoryTransport`] is an in-process byte-identity pair used for local
//! monitoring and tests.

pub mod endpoint;
pub mod memory;
pub mod ws;

pub use endpoint::{endpoint_url, ChannelKey, Role};
pub use memory::MemoryTransport;
pub use ws::{ConnectionEstablisher, WsTransport};

use async_trait::async_trait;
use thiserror::Error;

use crate::auth::Credential;

// ---------------------------------------------------------------------------
// TransportError
// ---------------------------------------------------------------------------

/// Errors from establishing or using a transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The relay refused the handshake (bad or missing credential, protocol
    /// mismatch).
    #[error("connection rejected: {0}")]
    ConnectionRejected(String),

    /// Network failure while connecting or after the connection was up.
    #[error("connection error: {0}")]
    ConnectionError(String),

    #[error("invalid channel key {0:?}")]
    InvalidChannelKey(String),
}

// ---------------------------------------------------------------------------
// Transport trait
// ---------------------------------------------------------------------------

/// A message-framed, bidirectional byte pipe.
#[async_trait]
pub trait Transport: Send {
    /// Send one message.  The payload is moved into the transport.
    async fn send(&mut self, payload: Vec<u8>) -> Result<(), TransportError>;

    /// Receive the next message; `None` once the peer has closed.
    ///
    /// Must be cancel-safe: sessions race it against other events.
    async fn recv(&mut self) -> Option<Result<Vec<u8>, TransportError>>;

    /// Close the connection.  Closing twice is not an error.
    async fn close(&mut self) -> Result<(), TransportError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Box<T> {
    async fn send(&mut self, payload: Vec<u8>) -> Result<(), TransportError> {
        (**self).send(payload).await
    }

    async fn recv(&mut self) -> Option<Result<Vec<u8>, TransportError>> {
        (**self).recv().await
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        (**self).close().await
    }
}

// ---------------------------------------------------------------------------
// Connector trait
// ---------------------------------------------------------------------------

/// Opens transports; one attempt per call, no retry.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        credential: Option<Credential>,
        role: &Role,
    ) -> Result<Box<dyn Transport>, TransportError>;
}
