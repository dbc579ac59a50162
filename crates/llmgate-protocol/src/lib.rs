//! Wire-format decoding shared by upstream providers.
//!
//! This crate intentionally does **not** depend on any HTTP client or
//! runtime; it consumes byte chunks and produces structured events, while a
//! higher layer performs IO.

pub mod sse;

pub use sse::{DONE_SENTINEL, SseDecoder, StreamEvent};
