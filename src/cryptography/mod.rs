// FEEDGATE — CRYPTOGRAPHY MODULE
// TLS, fed by hand: the socket belongs to the io_uring reactor, so the
// session never sees it. pump.rs moves ciphertext in and plaintext out;
// trust.rs builds the client configs the sessions are born from.

pub mod pump;
pub mod trust;
