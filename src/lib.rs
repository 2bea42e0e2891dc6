//! quizagent - autonomous quiz-solving agent driven by an LLM
//!
//! The agent fetches a quiz page, asks the model what to do, executes
//! model-generated scripts in a restricted Rhai sandbox, and submits computed
//! answers to whatever endpoint the page declares, looping until the server
//! stops handing out new URLs.
//!
//! # Modules
//!
//! - `agent` - the turn-based control loop and routing state machine
//! - `chat` - chat-completions client with tool calling and rate limiting
//! - `sandbox` - restricted script runner and payload sanitizer
//! - `tools` - tool adapters the model can invoke (fetch, download, POST, ...)
//! - `config` - startup configuration and credentials
//!
//! # Quick Start
//!
//! ```ignore
//! use quizagent::{AgentController, ChatClient, Config, ToolRegistry};
//!
//! let config = Config::from_env()?;
//! let controller = AgentController::new(
//!     ChatClient::new(&config),
//!     ToolRegistry::new(&config),
//!     config,
//! );
//! controller.run("https://quiz.example.com/start").await?;
//! ```

pub mod agent;
pub mod chat;
pub mod config;
pub mod sandbox;
pub mod tools;
pub mod tracing;

// Re-export commonly used types at crate root for convenience
pub use agent::{AgentController, AgentError, AgentResult, RouteDecision};
pub use chat::{ChatClient, ChatMessage, ModelClient};
pub use config::{Config, ConfigError, Credentials};
pub use sandbox::{ScriptOutcome, ScriptRunner};
pub use tools::ToolRegistry;
