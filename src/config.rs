//! Startup configuration for the agent
//!
//! Everything is resolved once from the environment at process start and then
//! passed by reference into the components that need it. Missing required
//! variables are fatal: the run never starts without credentials.

use std::path::PathBuf;

use thiserror::Error;

/// Error raised while resolving configuration at startup
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is absent or empty
    #[error("missing required environment variable {0}")]
    MissingVar(&'static str),

    /// A variable is present but cannot be parsed
    #[error("invalid value for {var}: {value}")]
    InvalidVar { var: &'static str, value: String },
}

/// Identity and secret submitted alongside answers and injected into every
/// script execution scope. Never logged.
#[derive(Clone)]
pub struct Credentials {
    pub email: String,
    pub secret: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Resource limits applied to the script engine before each execution
#[derive(Debug, Clone)]
pub struct SandboxLimits {
    /// Maximum number of operations a script can perform
    pub max_operations: u64,
    /// Maximum function call nesting depth
    pub max_call_levels: usize,
    /// Maximum size of strings in characters
    pub max_string_size: usize,
    /// Maximum number of array elements
    pub max_array_size: usize,
}

impl Default for SandboxLimits {
    fn default() -> Self {
        Self {
            // Scripts parse whole web pages, so the string budget is generous.
            max_operations: 5_000_000,
            max_call_levels: 32,
            max_string_size: 4_000_000,
            max_array_size: 100_000,
        }
    }
}

/// Configuration for a whole agent run
#[derive(Debug, Clone)]
pub struct Config {
    /// Identity/secret pair the server expects with submissions
    pub credentials: Credentials,
    /// API key for the model provider
    pub api_key: String,
    /// Base URL of the model provider
    pub api_base: String,
    /// Chat model name
    pub model: String,
    /// Transcription model name
    pub transcription_model: String,
    /// Maximum number of loop transitions before the run aborts
    pub step_budget: usize,
    /// Client-side ceiling on model calls per second
    pub requests_per_second: f64,
    /// Directory downloaded files are saved under
    pub files_dir: PathBuf,
    /// Fetched pages are truncated to this many bytes before entering the
    /// conversation
    pub max_page_bytes: usize,
    /// Script engine resource limits
    pub sandbox: SandboxLimits,
}

impl Config {
    /// Resolve configuration from the environment.
    ///
    /// `EMAIL`, `SECRET` and `GROQ_API_KEY` are required; everything else has
    /// a default that can be overridden with a `QUIZ_*` variable.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            credentials: Credentials {
                email: required("EMAIL")?,
                secret: required("SECRET")?,
            },
            api_key: required("GROQ_API_KEY")?,
            api_base: optional("QUIZ_API_BASE")
                .unwrap_or_else(|| "https://api.groq.com".to_string()),
            model: optional("QUIZ_MODEL")
                .unwrap_or_else(|| "llama-3.3-70b-versatile".to_string()),
            transcription_model: optional("QUIZ_TRANSCRIPTION_MODEL")
                .unwrap_or_else(|| "whisper-large-v3".to_string()),
            step_budget: parsed("QUIZ_STEP_BUDGET", 5_000)?,
            requests_per_second: parsed("QUIZ_REQUESTS_PER_SECOND", 0.5)?,
            files_dir: optional("QUIZ_FILES_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("downloads")),
            max_page_bytes: parsed("QUIZ_MAX_PAGE_BYTES", 200_000)?,
            sandbox: SandboxLimits::default(),
        })
    }
}

fn required(var: &'static str) -> Result<String, ConfigError> {
    match std::env::var(var) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::MissingVar(var)),
    }
}

fn optional(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.trim().is_empty())
}

fn parsed<T: std::str::FromStr>(var: &'static str, default: T) -> Result<T, ConfigError> {
    match optional(var) {
        Some(value) => value.parse().map_err(|_| ConfigError::InvalidVar {
            var,
            value,
        }),
        None => Ok(default),
    }
}
