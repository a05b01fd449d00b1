//! HTTP proxy server module.
//!
//! This module provides the REST and streaming chat API that validates
//! requests and relays them to the DeepSeek provider.

mod handlers;
mod openapi;
mod server;
pub mod stream;
pub mod types;

pub use server::{create_router, run_server, AppState};
pub use stream::{outbound_sse, relay_events, StreamChunk};
pub use types::{ChatRequest, ChatResponse, ErrorResponse, Message, Role};
