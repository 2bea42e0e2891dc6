//! Agent module: the turn-based quiz-solving loop
//!
//! # Architecture
//!
//! ```text
//! Start URL → AgentController → model (chat completions, with tools)
//!                  ↓
//!           route(latest reply)
//!            ├─ tool calls      → ToolRegistry.dispatch → results appended → model again
//!            ├─ content "END"   → run terminates
//!            └─ anything else   → model again
//! ```
//!
//! A step budget bounds total transitions; exhausting it aborts the run
//! instead of looping forever.

pub mod controller;

pub use controller::{
    route, AgentController, AgentError, AgentResult, RouteDecision, END_SENTINEL,
};
