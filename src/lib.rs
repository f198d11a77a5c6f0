// FEEDGATE — CRATE ROOT (LIBRARY)
// Market-data ingestion gateway for order-book feeds.
//
// Module hierarchy:
//   engine/runtime   — fatal exit diagnostics, TSC wall clock, CPU pinning
//   engine/spsc      — lock-free SPSC ring feeding the book builder
//   engine/venue     — venue strategy: endpoints, subscribe frames, portfolios
//   network/         — io_uring read reactor, WebSocket/TLS bootstrap, gateway loop
//   cryptography/    — manual TLS record pump (ring-fed rustls session)

pub mod cryptography;
pub mod engine;
pub mod network;
