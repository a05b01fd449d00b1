//! Upstream provider client.
//!
//! This module talks to the DeepSeek chat completion endpoint:
//! - Non-streaming completions returned as a single [`ChatResponse`](crate::proxy::types::ChatResponse)
//! - Streaming completions relayed as a lazy stream of deltas

mod client;

pub use client::{DeepSeekClient, UPSTREAM_TIMEOUT};
