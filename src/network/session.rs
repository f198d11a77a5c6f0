// FEEDGATE — NETWORK: WEBSOCKET/TLS BOOTSTRAP
// Establishment is the one place the TLS and WebSocket libraries get to drive
// the socket, and only through blocking I/O on the bootstrap path: TCP
// connect, kernel timestamping on, rustls handshake, WebSocket upgrade,
// subscribe frame out. Then the wrapper is dismantled and the raw socket plus
// the bare TLS session are detached for the reactor — after that the library
// never touches the socket again.

use std::io;
use std::net::{TcpStream, ToSocketAddrs};
use std::os::unix::io::AsRawFd;
use std::time::Duration;

use rustls::pki_types::ServerName;
use rustls::{ClientConnection, StreamOwned};
use tungstenite::client::IntoClientRequest;
use tungstenite::Message;

use crate::cryptography::trust;
use crate::engine::venue::{TlsTrust, Venue};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug)]
pub enum SessionError {
    Connect(String),
    Sockopt(io::Error),
    Tls(String),
    WebSocket(String),
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::Connect(e) => write!(f, "TCP connect failed: {}", e),
            SessionError::Sockopt(e) => write!(f, "setsockopt rejected: {}", e),
            SessionError::Tls(e) => write!(f, "TLS setup failed: {}", e),
            SessionError::WebSocket(e) => write!(f, "WebSocket establishment failed: {}", e),
        }
    }
}

impl SessionError {
    /// Diagnostic exit code for the boot tier.
    pub fn code(&self) -> i32 {
        use crate::engine::runtime::{E_CONNECT, E_SOCKOPT, E_TLS_ESTABLISH, E_WS_ESTABLISH};
        match self {
            SessionError::Connect(_) => E_CONNECT,
            SessionError::Sockopt(_) => E_SOCKOPT,
            SessionError::Tls(_) => E_TLS_ESTABLISH,
            SessionError::WebSocket(_) => E_WS_ESTABLISH,
        }
    }
}

/// A subscribed connection, detached from the libraries that built it. The
/// TcpStream keeps the descriptor alive; the session goes to the record pump.
pub struct Established {
    pub sock: TcpStream,
    pub tls: ClientConnection,
    pub symbol: String,
}

/// Shared TLS client configs, built once at bootstrap.
pub struct TlsConfigs {
    verified: std::sync::Arc<rustls::ClientConfig>,
    trust_any: std::sync::Arc<rustls::ClientConfig>,
}

impl TlsConfigs {
    pub fn build() -> TlsConfigs {
        TlsConfigs {
            verified: trust::verified_config(),
            trust_any: trust::trust_any_config(),
        }
    }

    fn for_venue(&self, venue: Venue) -> std::sync::Arc<rustls::ClientConfig> {
        match venue.trust() {
            TlsTrust::Verified => self.verified.clone(),
            TlsTrust::TrustAny => self.trust_any.clone(),
        }
    }
}

/// Bring up one subscribed venue connection. Blocking, serial, bootstrap-only.
pub fn establish(venue: Venue, symbol: &str, configs: &TlsConfigs) -> Result<Established, SessionError> {
    let ep = venue.endpoint();

    let addr = (ep.host, ep.port)
        .to_socket_addrs()
        .map_err(|e| SessionError::Connect(e.to_string()))?
        .next()
        .ok_or_else(|| SessionError::Connect(format!("{} resolved to no address", ep.host)))?;
    let sock = TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT)
        .map_err(|e| SessionError::Connect(e.to_string()))?;

    sock.set_nodelay(true).map_err(SessionError::Sockopt)?;
    // Kernel rx timestamps from the very first packet: enabled before the TLS
    // handshake so even handshake traffic is accounted.
    enable_rx_timestamps(sock.as_raw_fd()).map_err(SessionError::Sockopt)?;
    // Bounds the TLS + WebSocket handshakes; cleared when the socket goes
    // non-blocking at detach.
    sock.set_read_timeout(Some(HANDSHAKE_TIMEOUT)).map_err(SessionError::Sockopt)?;
    sock.set_write_timeout(Some(HANDSHAKE_TIMEOUT)).map_err(SessionError::Sockopt)?;

    let server_name = ServerName::try_from(ep.host.to_string())
        .map_err(|e| SessionError::Tls(format!("bad server name {}: {}", ep.host, e)))?;
    let session = ClientConnection::new(configs.for_venue(venue), server_name)
        .map_err(|e| SessionError::Tls(e.to_string()))?;
    let mut tls_stream = StreamOwned::new(session, sock);

    // WebSocket upgrade over the TLS stream. Host and Origin match the
    // address, as the venues require.
    let url = format!("wss://{}:{}{}", ep.host, ep.port, ep.path);
    let mut request = url
        .into_client_request()
        .map_err(|e| SessionError::WebSocket(e.to_string()))?;
    let origin = tungstenite::http::HeaderValue::from_str(ep.host)
        .map_err(|e| SessionError::WebSocket(e.to_string()))?;
    request.headers_mut().insert("Origin", origin);

    {
        let (mut ws, _response) = tungstenite::client(request, &mut tls_stream)
            .map_err(|e| SessionError::WebSocket(e.to_string()))?;

        if let Some(frame) = venue.subscribe_frame(symbol) {
            ws.send(Message::Text(frame.into()))
                .map_err(|e| SessionError::WebSocket(format!("subscribe frame rejected: {}", e)))?;
        }
        // The wrapper's borrow of the TLS stream ends here. Anything it
        // over-read past the 101 response dies with it; the venues only start
        // pushing after the subscribe lands, so nothing of value is in flight
        // yet.
    }

    let StreamOwned { conn: tls, sock } = tls_stream;
    sock.set_nonblocking(true).map_err(SessionError::Sockopt)?;

    Ok(Established { sock, tls, symbol: symbol.to_string() })
}

fn enable_rx_timestamps(fd: i32) -> io::Result<()> {
    let on: libc::c_int = 1;
    // SAFETY: plain setsockopt on a descriptor we own.
    let ret = unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_TIMESTAMP,
            &on as *const _ as *const libc::c_void,
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    if ret != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}
