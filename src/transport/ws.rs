//! WebSocket transport via `tokio-tungstenite`.
//!
//! The credential travels only in the upgrade request's
//! `Sec-WebSocket-Protocol` header; there is no post-connect challenge.  The
//! header offers the non-secret wire protocol first and the token second, so
//! a conforming relay validates the token and selects the wire protocol.
//!
//! tungstenite splits the offered list on `,` without trimming, so the values
//! are joined with no space; otherwise a relay that selects the token would
//! fail the client-side check.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{
    self,
    client::IntoClientRequest,
    handshake::client::Request,
    http::{header::SEC_WEBSOCKET_PROTOCOL, HeaderValue, StatusCode},
    protocol::Message,
};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::auth::Credential;
use crate::config::ServerConfig;

use super::{endpoint_url, Connector, Role, Transport, TransportError};

// ---------------------------------------------------------------------------
// ConnectionEstablisher
// ---------------------------------------------------------------------------

/// Opens role-scoped WebSocket connections to the relay.
#[derive(Debug, Clone)]
pub struct ConnectionEstablisher {
    server: ServerConfig,
}

impl ConnectionEstablisher {
    pub fn new(server: ServerConfig) -> Self {
        Self { server }
    }

    /// Build the upgrade request for `role`, embedding `credential` when
    /// given.
    pub fn build_request(
        &self,
        credential: Option<&Credential>,
        role: &Role,
    ) -> Result<Request, TransportError> {
        let url = endpoint_url(&self.server, role);
        let mut request = url.as_str().into_client_request().map_err(|e| {
            TransportError::ConnectionError(format!("invalid endpoint {url}: {e}"))
        })?;

        if let Some(credential) = credential {
            let offered = format!(
                "{},{}",
                self.server.wire_protocol,
                credential.negotiation_token()
            );
            let value = HeaderValue::from_str(&offered).map_err(|_| {
                TransportError::ConnectionError(
                    "credential cannot be carried in a handshake header".into(),
                )
            })?;
            request.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, value);
        }

        Ok(request)
    }

    /// Make exactly one connection attempt.
    ///
    /// The credential is consumed: it is encoded into the request and dropped
    /// once the handshake is done.
    ///
    /// # Errors
    ///
    /// * [`TransportError::ConnectionRejected`]: HTTP 401/403 or a failed
    ///   WebSocket handshake.
    /// * [`TransportError::ConnectionError`]: network / DNS / IO failure.
    pub async fn connect(
        &self,
        credential: Option<Credential>,
        role: &Role,
    ) -> Result<WsTransport, TransportError> {
        let token = credential.as_ref().map(Credential::negotiation_token);
        let request = self.build_request(credential.as_ref(), role)?;
        drop(credential);

        log::info!("transport: connecting to {}", request.uri());
        let (stream, response) = connect_async(request)
            .await
            .map_err(classify_handshake_error)?;

        if echoes_token(token.as_deref(), response.headers().get(SEC_WEBSOCKET_PROTOCOL)) {
            log::warn!(
                "transport: relay echoed the credential token; it should select {:?}",
                self.server.wire_protocol
            );
        }

        log::info!("transport: connected ({:?})", role);
        Ok(WsTransport { inner: stream })
    }
}

#[async_trait]
impl Connector for ConnectionEstablisher {
    async fn connect(
        &self,
        credential: Option<Credential>,
        role: &Role,
    ) -> Result<Box<dyn Transport>, TransportError> {
        let transport = ConnectionEstablisher::connect(self, credential, role).await?;
        Ok(Box::new(transport))
    }
}

/// Whether the relay selected the credential token instead of the wire
/// protocol.
fn echoes_token(token: Option<&str>, selected: Option<&HeaderValue>) -> bool {
    match (token, selected) {
        (Some(token), Some(selected)) => selected.as_bytes() == token.as_bytes(),
        _ => false,
    }
}

/// Map a handshake failure to rejected (auth / protocol) vs. error (network).
fn classify_handshake_error(err: tungstenite::Error) -> TransportError {
    match err {
        tungstenite::Error::Http(response) => {
            let status = response.status();
            if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                TransportError::ConnectionRejected(format!("relay answered {status}"))
            } else {
                TransportError::ConnectionError(format!("relay answered {status}"))
            }
        }
        tungstenite::Error::Protocol(e) => TransportError::ConnectionRejected(e.to_string()),
        other => TransportError::ConnectionError(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// WsTransport
// ---------------------------------------------------------------------------

/// An established WebSocket connection.
pub struct WsTransport {
    inner: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&mut self, payload: Vec<u8>) -> Result<(), TransportError> {
        self.inner
            .send(Message::Binary(payload.into()))
            .await
            .map_err(|e| TransportError::ConnectionError(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<Vec<u8>, TransportError>> {
        loop {
            match self.inner.next().await? {
                Ok(Message::Binary(data)) => return Some(Ok(data.into())),
                Ok(Message::Close(frame)) => {
                    log::info!("transport: closed by relay ({frame:?})");
                    return None;
                }
                Ok(Message::Text(_)) => {
                    log::debug!("transport: ignoring text message");
                }
                // ping / pong are answered by tungstenite itself
                Ok(_) => {}
                Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                    return None
                }
                Err(e) => return Some(Err(TransportError::ConnectionError(e.to_string()))),
            }
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        match self.inner.close(None).await {
            Ok(())
            | Err(tungstenite::Error::ConnectionClosed)
            | Err(tungstenite::Error::AlreadyClosed) => Ok(()),
            Err(e) => Err(TransportError::ConnectionError(e.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::ChannelKey;

    fn establisher() -> ConnectionEstablisher {
        ConnectionEstablisher::new(ServerConfig::default())
    }

    #[test]
    fn sender_request_carries_wire_protocol_then_token() {
        let credential = Credential::new("tech", "pw1");
        let request = establisher()
            .build_request(Some(&credential), &Role::Sender)
            .expect("request");

        assert_eq!(
            request.uri().to_string(),
            "ws://localhost:8000/ws/technician"
        );
        let header = request
            .headers()
            .get(SEC_WEBSOCKET_PROTOCOL)
            .expect("subprotocol header")
            .to_str()
            .expect("ascii");
        assert_eq!(header, "pcm-f32le,basic-auth-dGVjaDpwdzE=");
    }

    #[test]
    fn receiver_request_without_credential_has_no_subprotocol() {
        let role = Role::Receiver(ChannelKey::new("en").unwrap());
        let request = establisher().build_request(None, &role).expect("request");

        assert_eq!(request.uri().to_string(), "ws://localhost:8000/ws/stream/en");
        assert!(request.headers().get(SEC_WEBSOCKET_PROTOCOL).is_none());
    }

    #[test]
    fn bad_server_url_is_connection_error() {
        let est = ConnectionEstablisher::new(ServerConfig {
            url: "not a url".into(),
            ..ServerConfig::default()
        });
        assert!(matches!(
            est.build_request(None, &Role::Sender),
            Err(TransportError::ConnectionError(_))
        ));
    }

    #[tokio::test]
    async fn refused_port_is_connection_error() {
        // bind then drop to get a port nothing listens on
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
            listener.local_addr().expect("addr").port()
        };
        let est = ConnectionEstablisher::new(ServerConfig {
            url: format!("ws://127.0.0.1:{port}"),
            ..ServerConfig::default()
        });

        let result = est
            .connect(Some(Credential::new("tech", "pw1")), &Role::Sender)
            .await;
        assert!(matches!(result, Err(TransportError::ConnectionError(_))));
    }

    #[tokio::test]
    async fn unauthorized_upgrade_is_rejected() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let port = listener.local_addr().expect("addr").port();

        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 2048];
                let _ = socket.read(&mut buf).await;
                let _ = socket
                    .write_all(
                        b"HTTP/1.1 401 Unauthorized\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                    )
                    .await;
            }
        });

        let est = ConnectionEstablisher::new(ServerConfig {
            url: format!("ws://127.0.0.1:{port}"),
            ..ServerConfig::default()
        });
        let result = est
            .connect(Some(Credential::new("tech", "wrong")), &Role::Sender)
            .await;
        assert!(
            matches!(result, Err(TransportError::ConnectionRejected(_))),
            "got {:?}",
            result.err()
        );
    }

    /// Accepts one upgrade and answers 101 selecting `selected`.
    async fn upgrading_relay(selected: &'static str) -> u16 {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio_tungstenite::tungstenite::handshake::derive_accept_key;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let port = listener.local_addr().expect("addr").port();

        tokio::spawn(async move {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                match socket.read(&mut buf).await {
                    Ok(0) | Err(_) => return,
                    Ok(n) => request.extend_from_slice(&buf[..n]),
                }
            }
            let request = String::from_utf8_lossy(&request);
            let key = request
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    name.eq_ignore_ascii_case("sec-websocket-key")
                        .then(|| value.trim().to_string())
                })
                .expect("key header");
            let response = format!(
                "HTTP/1.1 101 Switching Protocols\r\n\
                 Upgrade: websocket\r\n\
                 Connection: Upgrade\r\n\
                 Sec-WebSocket-Accept: {}\r\n\
                 Sec-WebSocket-Protocol: {selected}\r\n\r\n",
                derive_accept_key(key.as_bytes())
            );
            let _ = socket.write_all(response.as_bytes()).await;
            // hold the connection until the client goes away
            let _ = socket.read(&mut buf).await;
        });

        port
    }

    fn establisher_on(port: u16) -> ConnectionEstablisher {
        ConnectionEstablisher::new(ServerConfig {
            url: format!("ws://127.0.0.1:{port}"),
            ..ServerConfig::default()
        })
    }

    #[tokio::test]
    async fn relay_selecting_wire_protocol_connects() {
        let port = upgrading_relay("pcm-f32le").await;
        let result = establisher_on(port)
            .connect(Some(Credential::new("tech", "pw1")), &Role::Sender)
            .await;
        assert!(result.is_ok(), "got {:?}", result.err());
    }

    #[tokio::test]
    async fn relay_echoing_token_still_connects() {
        let port = upgrading_relay("basic-auth-dGVjaDpwdzE=").await;
        let result = establisher_on(port)
            .connect(Some(Credential::new("tech", "pw1")), &Role::Sender)
            .await;
        assert!(result.is_ok(), "got {:?}", result.err());
    }

    #[test]
    fn echoed_token_is_detected() {
        let token = Credential::new("tech", "pw1").negotiation_token();
        let echoed = HeaderValue::from_str(&token).unwrap();
        let wire = HeaderValue::from_static("pcm-f32le");

        assert!(echoes_token(Some(token.as_str()), Some(&echoed)));
        assert!(!echoes_token(Some(token.as_str()), Some(&wire)));
        assert!(!echoes_token(None, Some(&echoed)));
        assert!(!echoes_token(Some(token.as_str()), None));
    }
}
