//! Client for an OpenAI-compatible chat completions endpoint
//!
//! Wire-format details (string-encoded tool arguments, nullable content,
//! content blocks) stay inside this module; everything past
//! [`parse_chat_response`] works with the uniform [`ChatMessage`] shape.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::chat::messages::{
    ChatError, ChatMessage, FunctionCall, MessageContent, Role, Tool, ToolCall,
};
use crate::chat::rate_limit::RateLimiter;
use crate::config::Config;

/// A synchronous (from the loop's point of view) model invocation.
///
/// The agent controller is generic over this trait so tests can drive it with
/// a scripted fake instead of a live endpoint.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Send the system directive, the full conversation and the declared tool
    /// schemas; receive exactly one reply message.
    async fn complete(
        &self,
        system: &str,
        conversation: &[ChatMessage],
        tools: &[Tool],
    ) -> Result<ChatMessage, ChatError>;
}

/// Chat client for a Groq/OpenAI-compatible provider
pub struct ChatClient {
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
    limiter: RateLimiter,
}

impl ChatClient {
    pub fn new(config: &Config) -> Self {
        Self {
            base_url: config.api_base.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            client: reqwest::Client::new(),
            // Burst of one: the loop is strictly turn-based anyway.
            limiter: RateLimiter::new(1, config.requests_per_second),
        }
    }
}

#[async_trait]
impl ModelClient for ChatClient {
    async fn complete(
        &self,
        system: &str,
        conversation: &[ChatMessage],
        tools: &[Tool],
    ) -> Result<ChatMessage, ChatError> {
        self.limiter.acquire().await;

        let endpoint = format!("{}/openai/v1/chat/completions", self.base_url);

        let mut body = json!({
            "model": self.model,
            "messages": wire_messages(system, conversation)?,
            "temperature": 0.0,
        });
        if !tools.is_empty() {
            body["tools"] = serde_json::to_value(tools)?;
            body["tool_choice"] = json!("auto");
        }

        let response = self
            .client
            .post(&endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(ChatError::Api {
                status: status.as_u16(),
                body: text,
            });
        }
        if text.is_empty() {
            return Err(ChatError::EmptyResponse);
        }

        parse_chat_response(&text)
    }
}

/// Render the conversation in the provider's wire format.
///
/// Tool-call arguments go out JSON-string-encoded the way OpenAI-compatible
/// endpoints expect them.
fn wire_messages(system: &str, conversation: &[ChatMessage]) -> Result<Vec<Value>, ChatError> {
    let mut messages = Vec::with_capacity(conversation.len() + 1);
    messages.push(json!({ "role": "system", "content": system }));

    for message in conversation {
        let content = match &message.content {
            MessageContent::Text(text) => Value::String(text.clone()),
            MessageContent::Blocks(blocks) => serde_json::to_value(blocks)?,
        };

        let mut wire = json!({ "role": message.role.as_str(), "content": content });

        if !message.tool_calls.is_empty() {
            let calls = message
                .tool_calls
                .iter()
                .map(|call| {
                    Ok(json!({
                        "id": call.id,
                        "type": "function",
                        "function": {
                            "name": call.function.name,
                            "arguments": serde_json::to_string(&call.function.arguments)?,
                        },
                    }))
                })
                .collect::<Result<Vec<Value>, serde_json::Error>>()?;
            wire["tool_calls"] = Value::Array(calls);
        }

        if let Some(id) = &message.tool_call_id {
            wire["tool_call_id"] = Value::String(id.clone());
        }

        messages.push(wire);
    }

    Ok(messages)
}

#[derive(Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
}

#[derive(Deserialize)]
struct WireChoice {
    message: WireMessage,
}

#[derive(Deserialize)]
struct WireMessage {
    #[serde(default)]
    content: Option<MessageContent>,
    #[serde(default)]
    tool_calls: Vec<WireToolCall>,
}

#[derive(Deserialize)]
struct WireToolCall {
    #[serde(default)]
    id: String,
    function: WireFunction,
}

#[derive(Deserialize)]
struct WireFunction {
    name: String,
    arguments: Value,
}

/// Decode one provider reply into the uniform message shape.
pub fn parse_chat_response(body: &str) -> Result<ChatMessage, ChatError> {
    let response: WireResponse = serde_json::from_str(body)?;
    let wire = response
        .choices
        .into_iter()
        .next()
        .ok_or(ChatError::EmptyResponse)?
        .message;

    let tool_calls = wire
        .tool_calls
        .into_iter()
        .map(|call| ToolCall {
            id: call.id,
            function: FunctionCall {
                name: call.function.name,
                arguments: normalize_arguments(call.function.arguments),
            },
        })
        .collect();

    Ok(ChatMessage {
        role: Role::Assistant,
        content: wire
            .content
            .unwrap_or_else(|| MessageContent::Text(String::new())),
        tool_calls,
        tool_call_id: None,
    })
}

/// Tool arguments usually arrive as a JSON-encoded string; decode them once
/// here so adapters receive structured values.
fn normalize_arguments(arguments: Value) -> Value {
    match arguments {
        Value::String(text) => serde_json::from_str(&text).unwrap_or(Value::String(text)),
        other => other,
    }
}
