//! Tool adapters the model can invoke
//!
//! Each adapter is a narrow capability: fetch a page, download a file, POST a
//! payload, run a fragment, acknowledge dependency requests, transcribe
//! audio. Adapter failures are routine — they come back as `Err` and the loop
//! folds the description into a tool-result message so the model can react;
//! nothing here aborts a run.

pub mod transcribe;
pub mod web;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use serde_json::{json, Value};
use thiserror::Error;

use crate::chat::{Tool, ToolCall};
use crate::config::Config;
use crate::sandbox::{ScriptOutcome, ScriptRunner};

/// Error type for tool adapter operations
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("tool {tool} called without required argument '{name}'")]
    MissingArgument { tool: &'static str, name: &'static str },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("script execution task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("transcription failed: {0}")]
    Transcription(String),
}

/// Dispatches tool calls from the model to their adapters.
///
/// Tracks the most recently fetched page URL so `run_code` can hand the
/// fragment its context URL without the model having to repeat it.
pub struct ToolRegistry {
    pub(crate) http: reqwest::Client,
    pub(crate) runner: Arc<ScriptRunner>,
    pub(crate) files_dir: PathBuf,
    pub(crate) max_page_bytes: usize,
    pub(crate) api_base: String,
    pub(crate) api_key: String,
    pub(crate) transcription_model: String,
    pub(crate) current_url: Mutex<String>,
}

impl ToolRegistry {
    pub fn new(config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            runner: Arc::new(ScriptRunner::new(
                config.credentials.clone(),
                config.sandbox.clone(),
            )),
            files_dir: config.files_dir.clone(),
            max_page_bytes: config.max_page_bytes,
            api_base: config.api_base.clone(),
            api_key: config.api_key.clone(),
            transcription_model: config.transcription_model.clone(),
            current_url: Mutex::new(String::new()),
        }
    }

    /// Resolve one tool call against the adapter set.
    pub async fn dispatch(&self, call: &ToolCall) -> Result<String, ToolError> {
        let args = &call.function.arguments;
        match call.function.name.as_str() {
            "get_rendered_html" => {
                self.get_rendered_html(&str_arg(args, "get_rendered_html", "url")?)
                    .await
            }
            "download_file" => {
                self.download_file(&str_arg(args, "download_file", "url")?)
                    .await
            }
            "post_request" => {
                let url = str_arg(args, "post_request", "url")?;
                let payload = args.get("payload").cloned().unwrap_or(Value::Null);
                self.post_request(&url, &payload).await
            }
            "run_code" => self.run_code(str_arg(args, "run_code", "code")?).await,
            "add_dependencies" => Ok(Self::add_dependencies(args)),
            "transcribe_audio" => {
                self.transcribe_audio(&str_arg(args, "transcribe_audio", "filename")?)
                    .await
            }
            other => Err(ToolError::UnknownTool(other.to_string())),
        }
    }

    /// Execute a fragment, then submit its payload to the destination it
    /// declared. Fragment failures come back as tool content, not `Err`: the
    /// model is the recovery mechanism.
    async fn run_code(&self, code: String) -> Result<String, ToolError> {
        let current_url = self.current_url();
        let runner = self.runner.clone();

        let outcome =
            tokio::task::spawn_blocking(move || runner.execute(&code, &current_url)).await?;

        match outcome {
            ScriptOutcome::Success {
                payload,
                dest,
                output,
            } => {
                let reply = self.post_request(&dest, &payload).await?;
                Ok(format!(
                    "Script output:\n{output}\nSubmitted payload {payload} to {dest}.\n{reply}"
                ))
            }
            ScriptOutcome::Failure { message, output } => {
                Ok(format!("{message}\nScript output:\n{output}"))
            }
        }
    }

    /// Acknowledge a dependency request. The capability surface is fixed, so
    /// everything a fragment can legally use is already present.
    fn add_dependencies(args: &Value) -> String {
        let names = match args.get("names") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str())
                .collect::<Vec<_>>()
                .join(", "),
            Some(Value::String(name)) => name.clone(),
            _ => String::new(),
        };
        if names.is_empty() {
            "The script environment has a fixed capability set; nothing to install.".to_string()
        } else {
            format!(
                "Requested dependencies ({names}) are covered by the built-in script \
                 capabilities (fetch, fetch_json, post_json, html_text, html_attr, url_join, \
                 base64_encode, base64_decode, parse_json, to_json, fetch_pdf_text). \
                 Nothing to install."
            )
        }
    }

    /// Schemas declared to the model for every tool in the registry.
    pub fn schemas() -> Vec<Tool> {
        vec![
            Tool::function(
                "get_rendered_html",
                "Fetch a web page and return its HTML. Use this first on every quiz URL \
                 to read the instructions and find the submit endpoint.",
                json!({
                    "type": "object",
                    "properties": {
                        "url": {"type": "string", "description": "Full URL of the page to fetch"}
                    },
                    "required": ["url"]
                }),
            ),
            Tool::function(
                "run_code",
                "Execute a Rhai script to compute the answer. The script runs in a sandbox \
                 with my_email, my_secret and current_url pre-defined, plus helpers: \
                 fetch(url), fetch_json(url), post_json(url, map), html_text(html, css), \
                 html_attr(html, css, attr), url_join(base, rel), base64_encode/decode, \
                 parse_json, to_json, fetch_pdf_text(url), print. The script MUST define \
                 'submission_payload' (the answer object) and 'submission_dest' (the URL \
                 to post it to); the payload is then submitted automatically and the \
                 server's reply is returned.",
                json!({
                    "type": "object",
                    "properties": {
                        "code": {"type": "string", "description": "The Rhai script to execute"}
                    },
                    "required": ["code"]
                }),
            ),
            Tool::function(
                "download_file",
                "Download a file (for example an audio file) and save it locally. \
                 Returns the saved filename.",
                json!({
                    "type": "object",
                    "properties": {
                        "url": {"type": "string", "description": "Full URL of the file"}
                    },
                    "required": ["url"]
                }),
            ),
            Tool::function(
                "post_request",
                "POST a JSON payload to a URL and return the server's response text. \
                 Only use endpoints declared on the current page.",
                json!({
                    "type": "object",
                    "properties": {
                        "url": {"type": "string", "description": "Endpoint to post to"},
                        "payload": {"description": "JSON payload to send"}
                    },
                    "required": ["url", "payload"]
                }),
            ),
            Tool::function(
                "add_dependencies",
                "Request extra libraries for the script environment. The environment has \
                 a fixed capability set, so this acknowledges what is already available.",
                json!({
                    "type": "object",
                    "properties": {
                        "names": {
                            "type": "array",
                            "items": {"type": "string"},
                            "description": "Names of the requested libraries"
                        }
                    },
                    "required": ["names"]
                }),
            ),
            Tool::function(
                "transcribe_audio",
                "Transcribe speech from a previously downloaded audio file into text. \
                 Use this immediately after download_file on an .mp3 or .wav.",
                json!({
                    "type": "object",
                    "properties": {
                        "filename": {
                            "type": "string",
                            "description": "Filename returned by download_file"
                        }
                    },
                    "required": ["filename"]
                }),
            ),
        ]
    }

    pub(crate) fn current_url(&self) -> String {
        match self.current_url.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub(crate) fn set_current_url(&self, url: &str) {
        let mut guard = match self.current_url.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = url.to_string();
    }
}

fn str_arg(args: &Value, tool: &'static str, name: &'static str) -> Result<String, ToolError> {
    args.get(name)
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or(ToolError::MissingArgument { tool, name })
}
