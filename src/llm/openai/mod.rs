
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::debug;
use url::Url;

use super::{
    ChatCompletion, ChatMessage, ChatModel, ChatRequest, ResponseFormat, ToolCall, ToolDefinition,
};
use crate::config::OpenAiConfig;
use crate::http::{Auth, JsonClient, blocking, endpoint};
use crate::{RagError, Result, Service};

/// Client for the OpenAI chat-completions endpoint with function calling
#[derive(Debug, Clone)]
pub struct OpenAiChat {
    client: JsonClient,
    url: Url,
    model: String,
}

#[derive(Debug, Serialize)]
struct WireRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<WireResponseFormat>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(
        default,
        deserialize_with = "null_as_empty",
        skip_serializing_if = "Vec::is_empty"
    )]
    tool_calls: Vec<WireToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type", default = "function_type")]
    kind: String,
    function: WireFunctionCall,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Serialize)]
struct WireTool {
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunction,
}

#[derive(Debug, Serialize)]
struct WireFunction {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Serialize)]
struct WireResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
    json_schema: WireJsonSchema,
}

#[derive(Debug, Serialize)]
struct WireJsonSchema {
    name: String,
    schema: Value,
    strict: bool,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    #[serde(default)]
    choices: Vec<WireChoice>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

fn function_type() -> String {
    "function".to_string()
}

/// Compatible servers send `"tool_calls": null` on plain answers
fn null_as_empty<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

impl From<&ChatMessage> for WireMessage {
    fn from(message: &ChatMessage) -> Self {
        Self {
            role: message.role.as_str().to_string(),
            content: message.content.clone(),
            tool_calls: message
                .tool_calls
                .iter()
                .map(|call| WireToolCall {
                    id: call.id.clone(),
                    kind: function_type(),
                    function: WireFunctionCall {
                        name: call.name.clone(),
                        arguments: call.arguments.clone(),
                    },
                })
                .collect(),
            tool_call_id: message.tool_call_id.clone(),
        }
    }
}

impl From<&ToolDefinition> for WireTool {
    fn from(tool: &ToolDefinition) -> Self {
        Self {
            kind: "function",
            function: WireFunction {
                name: tool.name.clone(),
                description: tool.description.clone(),
                parameters: tool.parameters.clone(),
            },
        }
    }
}

impl From<&ResponseFormat> for WireResponseFormat {
    fn from(format: &ResponseFormat) -> Self {
        Self {
            kind: "json_schema",
            json_schema: WireJsonSchema {
                name: format.name.clone(),
                schema: format.schema.clone(),
                strict: true,
            },
        }
    }
}

impl OpenAiChat {
    #[inline]
    pub fn new(config: &OpenAiConfig) -> Result<Self> {
        let base_url = config
            .base_url()
            .map_err(|e| RagError::Config(e.to_string()))?;

        Ok(Self {
            client: JsonClient::new(
                Service::OpenAi,
                Auth::Bearer(config.api_key.clone()),
                Duration::from_secs(config.timeout_seconds),
            ),
            url: endpoint(&base_url, "chat/completions")?,
            model: config.chat_model.clone(),
        })
    }

    #[inline]
    pub fn model(&self) -> &str {
        &self.model
    }

    fn wire_request(&self, request: ChatRequest<'_>) -> WireRequest {
        WireRequest {
            model: self.model.clone(),
            messages: request.messages.iter().map(WireMessage::from).collect(),
            tools: request.tools.iter().map(WireTool::from).collect(),
            response_format: request.response_format.map(WireResponseFormat::from),
        }
    }

    fn send(&self, request: &WireRequest) -> Result<ChatCompletion> {
        debug!(
            "Requesting completion from {} with {} messages",
            self.model,
            request.messages.len()
        );

        let response: WireResponse = self.client.post(&self.url, request)?;
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| RagError::UnexpectedResponse {
                service: Service::OpenAi,
                message: "Completion response contained no choices".to_string(),
            })?;

        let completion = ChatCompletion {
            content: choice.message.content,
            tool_calls: choice
                .message
                .tool_calls
                .into_iter()
                .map(|call| ToolCall {
                    id: call.id,
                    name: call.function.name,
                    arguments: call.function.arguments,
                })
                .collect(),
            finish_reason: choice.finish_reason,
        };

        debug!(
            "Completion finished ({:?}) with {} tool calls",
            completion.finish_reason,
            completion.tool_calls.len()
        );
        Ok(completion)
    }
}

#[async_trait]
impl ChatModel for OpenAiChat {
    async fn complete(&self, request: ChatRequest<'_>) -> Result<ChatCompletion> {
        let wire = self.wire_request(request);
        let chat = self.clone();
        blocking(move || chat.send(&wire)).await
    }
}
