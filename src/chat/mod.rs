//! Chat-completions client with tool calling
//!
//! The model is treated as an opaque blocking RPC: one request carries the
//! system directive, the full conversation and the declared tool schemas, and
//! one reply message comes back. The adapter normalizes every provider reply
//! into a single tagged [`ChatMessage`] shape so the rest of the crate never
//! probes response JSON.

pub mod client;
pub mod messages;
pub mod rate_limit;

pub use client::{ChatClient, ModelClient};
pub use messages::{
    ChatError, ChatMessage, ContentBlock, FunctionCall, MessageContent, Role, Tool, ToolCall,
    ToolFunction,
};
pub use rate_limit::RateLimiter;
