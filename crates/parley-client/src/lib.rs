//! Parley Client Library
//!
//! Outbound relay to the upstream completion service: single-shot calls with
//! retry, and streaming calls decoded frame by frame.

pub mod http_client;
pub mod sse;

pub use http_client::{key_id, ChunkStream, RelayClient};
pub use sse::FrameDecoder;
