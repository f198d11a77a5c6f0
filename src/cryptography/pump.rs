// FEEDGATE — CRYPTOGRAPHY: TLS RECORD PUMP
// The WebSocket/TLS stack is not permitted to drive the socket — every read
// lives in the io_uring reactor. Each connection's rustls session is used
// purely as an in-memory record machine: ciphertext chunks from ring
// completions go in through `read_tls`, plaintext comes out through the
// session reader into a buffer sized once at bootstrap. The hot path
// allocates nothing.

use std::io::{self, Read};

use rustls::ClientConnection;

#[derive(Debug)]
pub enum PumpError {
    /// Ciphertext chunk exceeds the plaintext buffer; nothing was fed.
    ChunkTooLarge { len: usize, cap: usize },
    /// TLS-level failure (bad record, MAC failure, protocol violation).
    Tls(rustls::Error),
    /// The in-memory sink refused the bytes.
    Sink(io::Error),
}

impl std::fmt::Display for PumpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PumpError::ChunkTooLarge { len, cap } => {
                write!(f, "ciphertext chunk {} bytes exceeds {} byte buffer", len, cap)
            }
            PumpError::Tls(e) => write!(f, "TLS decrypt failed: {}", e),
            PumpError::Sink(e) => write!(f, "TLS input sink rejected bytes: {}", e),
        }
    }
}

impl std::error::Error for PumpError {}

pub struct RecordPump {
    session: ClientConnection,
    plaintext: Box<[u8]>,
}

impl RecordPump {
    /// Takes ownership of an established (or establishing) session. The
    /// plaintext buffer is the only allocation this type ever makes.
    pub fn new(session: ClientConnection, plaintext_capacity: usize) -> Self {
        RecordPump {
            session,
            plaintext: vec![0u8; plaintext_capacity].into_boxed_slice(),
        }
    }

    /// Feed one ciphertext chunk and drain all plaintext the session can
    /// produce from it. Returns the number of plaintext bytes now valid in
    /// `plaintext()`.
    ///
    /// Zero is a legitimate result: a partial TLS record, or a session still
    /// handshaking (the bytes are retained either way — each ciphertext byte
    /// is fed exactly once). Errors leave nothing half-published; the caller
    /// skips the cycle and the connection retries on its next readiness event.
    pub fn feed(&mut self, ciphertext: &[u8]) -> Result<usize, PumpError> {
        if ciphertext.len() > self.plaintext.len() {
            return Err(PumpError::ChunkTooLarge { len: ciphertext.len(), cap: self.plaintext.len() });
        }

        let mut src = ciphertext;
        while !src.is_empty() {
            match self.session.read_tls(&mut src) {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) => return Err(PumpError::Sink(e)),
            }
        }

        self.session.process_new_packets().map_err(PumpError::Tls)?;

        let mut total = 0usize;
        while total < self.plaintext.len() {
            match self.session.reader().read(&mut self.plaintext[total..]) {
                // Clean close_notify — no more plaintext will ever arrive.
                Ok(0) => break,
                Ok(n) => total += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(PumpError::Sink(e)),
            }
        }
        Ok(total)
    }

    /// The plaintext drained by the last `feed`. Valid up to its return value.
    #[inline(always)]
    pub fn plaintext(&self) -> &[u8] {
        &self.plaintext
    }

    pub fn is_handshaking(&self) -> bool {
        self.session.is_handshaking()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cryptography::trust;
    use rustls::pki_types::ServerName;
    use std::sync::Arc;

    fn fresh_pump() -> RecordPump {
        let cfg: Arc<rustls::ClientConfig> = trust::trust_any_config();
        let name = ServerName::try_from("127.0.0.1").unwrap();
        let session = ClientConnection::new(cfg, name).unwrap();
        RecordPump::new(session, 16384)
    }

    #[test]
    fn empty_chunk_yields_no_plaintext() {
        let mut pump = fresh_pump();
        assert_eq!(pump.feed(&[]).unwrap(), 0);
        assert!(pump.is_handshaking());
    }

    #[test]
    fn garbage_ciphertext_is_a_decrypt_error() {
        let mut pump = fresh_pump();
        let garbage = [0xABu8; 1024];
        assert!(pump.feed(&garbage).is_err(), "non-TLS bytes must fail the pump");
    }

    #[test]
    fn oversized_chunk_rejected_whole() {
        let mut pump = fresh_pump();
        let chunk = vec![0u8; 16385];
        match pump.feed(&chunk) {
            Err(PumpError::ChunkTooLarge { len, cap }) => {
                assert_eq!(len, 16385);
                assert_eq!(cap, 16384);
            }
            other => panic!("expected ChunkTooLarge, got {:?}", other.map(|_| ())),
        }
        // The rejection must not have poisoned the session.
        assert_eq!(pump.feed(&[]).unwrap(), 0);
    }
}
