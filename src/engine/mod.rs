// FEEDGATE — ENGINE MODULE
// Everything the gateway IS, minus the bytes in flight: process infrastructure
// (runtime), the consumer hand-off (spsc), and the venue strategy (venue).

pub mod runtime;
pub mod spsc;
pub mod venue;
