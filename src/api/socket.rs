//! Minimal socket.io 0.9 exchange.
//!
//! Overleaf only serves the project tree and doc contents over its real-time
//! channel. This module speaks just enough of the protocol to join a project,
//! read docs and leave again; it never sends edits.
//!
//! Frames are `type:id:endpoint:data`:
//! - `1::` connect, `2::` heartbeat (must be echoed), `0::` disconnect
//! - `5:[id+]::{json}` event, `6:::id+{json}` ack, `7:::reason` error

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Url;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{DigitallySignedStruct, SignatureScheme};
use serde_json::{json, Value};
use tungstenite::client::IntoClientRequest;
use tungstenite::handshake::HandshakeRole;
use tungstenite::http::header::COOKIE;
use tungstenite::http::HeaderValue;
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Connector, HandshakeError, Message, WebSocket};

use crate::config::ClientConfig;
use crate::error::{OverleafError, Result};

const JOIN_PROJECT_RESPONSE: &str = "joinProjectResponse";
const CONNECTION_REJECTED: &str = "connectionRejected";
const FORCE_DISCONNECT: &str = "forceDisconnect";

/// Upper bound on frames read while waiting for one reply.
const MAX_FRAMES: usize = 10_000;

/// Upper bound on the proxy's reply to `CONNECT`.
const MAX_PROXY_HEAD: usize = 8 * 1024;

/// A decoded socket.io frame.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Frame {
    Disconnect,
    Connect,
    Heartbeat,
    /// Server event: `{"name": ..., "args": [...]}`
    Event(Value),
    /// Reply to a client event sent with an ack id.
    Ack { id: u64, data: Value },
    /// Protocol error, sent on rejected handshakes.
    Error(String),
    Other(String),
}

/// Parse one text frame.
pub(crate) fn parse_frame(raw: &str) -> Result<Frame> {
    let mut parts = raw.splitn(4, ':');
    let kind = parts.next().unwrap_or_default();
    let _message_id = parts.next();
    let _endpoint = parts.next();
    let data = parts.next().unwrap_or_default();

    let frame = match kind {
        "0" => Frame::Disconnect,
        "1" => Frame::Connect,
        "2" => Frame::Heartbeat,
        "5" => Frame::Event(serde_json::from_str(data)?),
        "6" => {
            let (id, payload) = data.split_once('+').ok_or_else(|| {
                OverleafError::InvalidResponse(format!("malformed ack frame: {}", raw))
            })?;
            let id = id.parse().map_err(|_| {
                OverleafError::InvalidResponse(format!("malformed ack id: {}", raw))
            })?;
            let data = if payload.is_empty() {
                Value::Null
            } else {
                serde_json::from_str(payload)?
            };
            Frame::Ack { id, data }
        }
        "7" => Frame::Error(data.to_string()),
        _ => Frame::Other(raw.to_string()),
    };
    Ok(frame)
}

/// Decode doc lines received with `encodeRanges`.
///
/// The server sends each line's UTF-8 bytes as individual code points below
/// 256. Lines that are not in that form are taken as-is.
pub(crate) fn decode_doc_lines(lines: &[Value]) -> Result<String> {
    let mut decoded = Vec::with_capacity(lines.len());
    for line in lines {
        let line = line.as_str().ok_or_else(|| {
            OverleafError::InvalidResponse("doc line is not a string".to_string())
        })?;
        decoded.push(decode_line(line));
    }
    Ok(decoded.join("\n"))
}

fn decode_line(line: &str) -> String {
    let bytes: Option<Vec<u8>> = line
        .chars()
        .map(|c| u8::try_from(u32::from(c)).ok())
        .collect();
    match bytes.map(String::from_utf8) {
        Some(Ok(text)) => text,
        _ => line.to_string(),
    }
}

fn socket_error(err: tungstenite::Error) -> OverleafError {
    match err {
        tungstenite::Error::Io(ref io)
            if matches!(
                io.kind(),
                std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
            ) =>
        {
            OverleafError::Timeout
        }
        other => OverleafError::WebSocket(other.to_string()),
    }
}

fn rejection_error(message: &str) -> OverleafError {
    let lower = message.to_lowercase();
    if lower.contains("not found") {
        OverleafError::NotFound {
            path: String::new(),
            id: None,
        }
    } else {
        OverleafError::Unauthorized(message.to_string())
    }
}

fn handshake_error<R: HandshakeRole>(err: HandshakeError<R>) -> OverleafError {
    match err {
        HandshakeError::Failure(err) => socket_error(err),
        HandshakeError::Interrupted(_) => OverleafError::Timeout,
    }
}

/// `host:port` of an HTTP proxy URL ("proxy:8080" is read as http).
pub(crate) fn proxy_address(proxy: &str) -> Result<(String, u16)> {
    let url = if proxy.contains("://") {
        Url::parse(proxy)
    } else {
        Url::parse(&format!("http://{}", proxy))
    }
    .map_err(|e| OverleafError::Custom(format!("Invalid proxy URL: {}", e)))?;

    if url.scheme() != "http" {
        return Err(OverleafError::Custom(format!(
            "Unsupported proxy scheme for the project socket: {}",
            url.scheme()
        )));
    }
    if !url.username().is_empty() {
        return Err(OverleafError::Custom(
            "Proxy credentials are not supported for the project socket".to_string(),
        ));
    }
    let host = url
        .host_str()
        .ok_or_else(|| OverleafError::Custom("Proxy URL has no host".to_string()))?;
    Ok((host.to_string(), url.port_or_known_default().unwrap_or(80)))
}

/// Read the proxy's reply up to the blank line, one byte at a time so that
/// nothing past the header is consumed.
fn read_proxy_head<S: Read>(stream: &mut S) -> Result<String> {
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        if head.len() >= MAX_PROXY_HEAD {
            return Err(OverleafError::WebSocket("proxy reply too long".to_string()));
        }
        if stream.read(&mut byte)? == 0 {
            return Err(OverleafError::WebSocket(
                "proxy closed the connection".to_string(),
            ));
        }
        head.push(byte[0]);
    }
    Ok(String::from_utf8_lossy(&head).into_owned())
}

fn check_proxy_reply(head: &str) -> Result<()> {
    let status_line = head.lines().next().unwrap_or_default();
    match status_line.split_whitespace().nth(1) {
        Some(code) if code.starts_with('2') => Ok(()),
        Some("407") => Err(OverleafError::Unauthorized(
            "proxy authentication required".to_string(),
        )),
        _ => Err(OverleafError::WebSocket(format!(
            "proxy refused tunnel: {}",
            status_line
        ))),
    }
}

/// Open a TCP stream to `host:port` through an HTTP `CONNECT` tunnel.
pub(crate) fn open_tunnel(proxy: &str, host: &str, port: u16, timeout: Duration) -> Result<TcpStream> {
    let (proxy_host, proxy_port) = proxy_address(proxy)?;
    let mut stream = TcpStream::connect((proxy_host.as_str(), proxy_port))?;
    stream.set_read_timeout(Some(timeout))?;
    stream.set_write_timeout(Some(timeout))?;

    let target = format!("{}:{}", host, port);
    write!(stream, "CONNECT {0} HTTP/1.1\r\nHost: {0}\r\n\r\n", target)?;
    stream.flush()?;
    check_proxy_reply(&read_proxy_head(&mut stream)?)?;
    tracing::debug!(proxy = %proxy_host, target = %target, "proxy tunnel established");
    Ok(stream)
}

/// Certificate verifier for `ssl_verify = false`: any certificate is
/// accepted, handshake signatures are still checked.
#[derive(Debug)]
struct AcceptAnyCertificate(Arc<CryptoProvider>);

impl ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

/// TLS connector for the socket. `None` keeps tungstenite's default
/// (webpki roots, full verification).
pub(crate) fn tls_connector(ssl_verify: bool) -> Result<Option<Connector>> {
    if ssl_verify {
        return Ok(None);
    }
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = rustls::ClientConfig::builder_with_provider(Arc::clone(&provider))
        .with_safe_default_protocol_versions()
        .map_err(|e| OverleafError::Custom(format!("TLS setup failed: {}", e)))?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate(provider)))
        .with_no_client_auth();
    Ok(Some(Connector::Rustls(Arc::new(config))))
}

/// Blocking socket.io session for one project.
pub(crate) struct SocketSession {
    ws: WebSocket<MaybeTlsStream<TcpStream>>,
    last_ack: u64,
}

impl SocketSession {
    /// Open the WebSocket for a handshaken socket.io session.
    ///
    /// Honours the proxy (as a `CONNECT` tunnel), the TLS verification
    /// switch and the timeout of `config`.
    pub(crate) fn connect(url: &str, cookie_header: &str, config: &ClientConfig) -> Result<Self> {
        let mut request = url.into_client_request().map_err(socket_error)?;
        if !cookie_header.is_empty() {
            let value = HeaderValue::from_str(cookie_header)
                .map_err(|e| OverleafError::Custom(format!("Invalid cookie header: {}", e)))?;
            request.headers_mut().insert(COOKIE, value);
        }

        let host = request
            .uri()
            .host()
            .ok_or_else(|| OverleafError::Custom(format!("Socket URL has no host: {}", url)))?
            .to_string();
        let port = request
            .uri()
            .port_u16()
            .unwrap_or(match request.uri().scheme_str() {
                Some("wss") => 443,
                _ => 80,
            });

        let stream = match config.proxy.as_deref() {
            Some(proxy) => open_tunnel(proxy, &host, port, config.timeout)?,
            None => TcpStream::connect((host.as_str(), port))?,
        };
        stream.set_read_timeout(Some(config.timeout))?;
        stream.set_write_timeout(Some(config.timeout))?;

        let connector = tls_connector(config.ssl_verify)?;
        let (ws, _response) = tungstenite::client_tls_with_config(request, stream, None, connector)
            .map_err(handshake_error)?;
        Ok(Self { ws, last_ack: 0 })
    }

    fn send(&mut self, frame: String) -> Result<()> {
        tracing::debug!(frame = %frame, "socket send");
        self.ws.send(Message::text(frame)).map_err(socket_error)
    }

    /// Read the next meaningful frame, answering heartbeats on the way.
    fn next_frame(&mut self) -> Result<Frame> {
        loop {
            let message = self.ws.read().map_err(socket_error)?;
            let text = match message {
                Message::Text(text) => text.as_str().to_string(),
                Message::Close(_) => {
                    return Err(OverleafError::WebSocket("connection closed".to_string()))
                }
                _ => continue,
            };
            let frame = parse_frame(&text)?;
            if frame == Frame::Heartbeat {
                self.send("2::".to_string())?;
                continue;
            }
            return Ok(frame);
        }
    }

    /// Emit a client event that expects an ack; returns the ack id.
    fn emit(&mut self, name: &str, args: Value) -> Result<u64> {
        self.last_ack += 1;
        let payload = json!({ "name": name, "args": args });
        self.send(format!("5:{}+::{}", self.last_ack, payload))?;
        Ok(self.last_ack)
    }

    fn wait_ack(&mut self, ack_id: u64) -> Result<Value> {
        for _ in 0..MAX_FRAMES {
            match self.next_frame()? {
                Frame::Ack { id, data } if id == ack_id => return Ok(data),
                Frame::Error(reason) => return Err(rejection_error(&reason)),
                Frame::Disconnect => {
                    return Err(OverleafError::WebSocket("server disconnected".to_string()))
                }
                _ => {}
            }
        }
        Err(OverleafError::WebSocket(format!("no reply for ack {}", ack_id)))
    }

    /// Wait for the project join the server performs on connect.
    ///
    /// Returns the first argument of `joinProjectResponse`.
    pub(crate) fn wait_join_project(&mut self) -> Result<Value> {
        for _ in 0..MAX_FRAMES {
            match self.next_frame()? {
                Frame::Event(event) => {
                    let name = event.get("name").and_then(|v| v.as_str()).unwrap_or("");
                    let first_arg = event
                        .get("args")
                        .and_then(|v| v.as_array())
                        .and_then(|a| a.first())
                        .cloned()
                        .unwrap_or(Value::Null);
                    match name {
                        JOIN_PROJECT_RESPONSE => return Ok(first_arg),
                        CONNECTION_REJECTED | FORCE_DISCONNECT => {
                            let message = first_arg
                                .get("message")
                                .and_then(|v| v.as_str())
                                .unwrap_or(name);
                            return Err(rejection_error(message));
                        }
                        _ => {}
                    }
                }
                Frame::Error(reason) => return Err(rejection_error(&reason)),
                Frame::Disconnect => {
                    return Err(OverleafError::WebSocket("server disconnected".to_string()))
                }
                _ => {}
            }
        }
        Err(OverleafError::WebSocket(
            "no joinProjectResponse received".to_string(),
        ))
    }

    /// Read the current content of a doc.
    pub(crate) fn read_doc(&mut self, doc_id: &str) -> Result<String> {
        self.emit("clientTracking.getConnectedUsers", json!([]))?;
        let join = self.emit("joinDoc", json!([doc_id, { "encodeRanges": true }]))?;
        let reply = self.wait_ack(join)?;

        let reply = reply.as_array().cloned().unwrap_or_default();
        if let Some(err) = reply.first().filter(|v| !v.is_null()) {
            let message = err
                .get("message")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string())
                .unwrap_or_else(|| err.to_string());
            if message.to_lowercase().contains("not found") {
                return Err(OverleafError::stale(doc_id));
            }
            return Err(OverleafError::WebSocket(message));
        }

        let lines = reply
            .get(1)
            .and_then(|v| v.as_array())
            .ok_or_else(|| OverleafError::InvalidResponse("joinDoc reply has no lines".to_string()))?;
        let text = decode_doc_lines(lines)?;

        let leave = self.emit("leaveDoc", json!([doc_id]))?;
        if let Err(e) = self.wait_ack(leave) {
            tracing::debug!(error = %e, "leaveDoc not acknowledged");
        }
        Ok(text)
    }

    pub(crate) fn close(mut self) {
        let _ = self.ws.close(None);
        let _ = self.ws.flush();
    }
}
