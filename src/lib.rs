//! deepseek-proxy - REST and streaming proxy for the DeepSeek chat API
//!
//! This library provides the core functionality for the proxy, including
//! configuration, the upstream client and the SSE relay.

pub mod config;
pub mod error;
pub mod proxy;
pub mod upstream;

pub use config::Config;
pub use error::{Error, Result};
