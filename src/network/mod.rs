// FEEDGATE — NETWORK MODULE
// Three-module structure:
//   reactor.rs  — io_uring read submitter (SQPOLL setup, fixed files, recvmsg,
//                 ancillary timestamp extraction, ring-FD hand-off)
//   session.rs  — WebSocket/TLS bootstrap: establish, subscribe, detach
//   gateway.rs  — connection manager + epoll readiness loop + read cycle

pub mod gateway;
pub mod reactor;
pub mod session;

use bytemuck::{Pod, Zeroable};

/// Hard capacity of the per-connection read buffers and the queue-entry
/// payload. The configurable `--rx-buf` length (default 16378, the venue's
/// documented maximum frame size) must fit inside this.
pub const RX_BUF_CAPACITY: usize = 16384;
pub const DEFAULT_RX_BUF: usize = 16378;

// ============================================================================
// MARKET UPDATE — the queue-entry record handed to the book builder
// ============================================================================

/// One decrypted market update plus its four capture timestamps, all encoded
/// as nanoseconds since the UNIX epoch. Fixed-size and indirection-free so a
/// ring-slot hand-off is a single memcpy; field order keeps the layout free of
/// implicit padding (Pod), which also gives the byte-level serialisation.
///
/// Only `payload[..len]` is meaningful; the tail beyond `len` is whatever the
/// slot last held.
#[repr(C)]
#[derive(Clone, Copy, PartialEq, Eq, Zeroable, Pod)]
pub struct MarketUpdate {
    /// Kernel SCM_TIMESTAMP at packet arrival (wall clock).
    pub ts_rx_kernel: u64,
    /// Readiness watcher fired.
    pub ts_poll_wake: u64,
    /// Ring completion reaped.
    pub ts_read_complete: u64,
    /// TLS plaintext extracted.
    pub ts_decrypt_complete: u64,
    pub len: u64,
    pub payload: [u8; RX_BUF_CAPACITY],
}

impl MarketUpdate {
    pub const EMPTY: Self = MarketUpdate {
        ts_rx_kernel: 0,
        ts_poll_wake: 0,
        ts_read_complete: 0,
        ts_decrypt_complete: 0,
        len: 0,
        payload: [0; RX_BUF_CAPACITY],
    };

    #[inline(always)]
    pub fn payload(&self) -> &[u8] {
        &self.payload[..self.len as usize]
    }
}
