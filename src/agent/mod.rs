//! Tool-calling agent.
//!
//! Each run starts from the fixed system prompt and the user's prompt, then
//! alternates model turns and retrieval-tool executions until the model
//! answers without requesting tools. The number of tool rounds is capped.


use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::llm::{ChatMessage, ChatModel, ChatRequest, ResponseFormat, ToolCall};
use crate::retrieval::{RetrievalTool, RetrieveArgs, TOOL_NAME};
use crate::{RagError, Result};

pub const SYSTEM_PROMPT: &str = "You are a helpful assistant that answers questions based on the retrieved context. \
     Always use the retrieved information to formulate your answers. \
     If you cannot find relevant information in the context, say so.";

pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 5;

/// Answer constrained to a schema, produced by [`Agent::run_structured`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StructuredAnswer {
    pub answer: String,
    pub sources: Vec<String>,
    /// Model's confidence in the answer, within `[0, 1]`
    pub confidence: f64,
}

impl StructuredAnswer {
    /// JSON schema sent to the model as the response format
    #[inline]
    pub fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "answer": {
                    "type": "string",
                    "description": "The answer to the question"
                },
                "sources": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Retrieved passages the answer is based on"
                },
                "confidence": {
                    "type": "number",
                    "description": "Confidence between 0 and 1"
                }
            },
            "required": ["answer", "sources", "confidence"],
            "additionalProperties": false
        })
    }

    #[inline]
    pub fn response_format() -> ResponseFormat {
        ResponseFormat {
            name: "structured_answer".to_string(),
            schema: Self::schema(),
        }
    }

    /// Parse and validate the model's final content
    #[inline]
    pub fn parse(content: &str) -> Result<Self> {
        let answer: Self = serde_json::from_str(content)
            .map_err(|e| RagError::Validation(format!("Malformed structured answer: {}", e)))?;
        answer.validate()?;
        Ok(answer)
    }

    #[inline]
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(RagError::Validation(format!(
                "Confidence {} is outside [0, 1]",
                self.confidence
            )));
        }
        Ok(())
    }
}

pub struct Agent {
    model: Arc<dyn ChatModel>,
    retrieval: RetrievalTool,
    system_prompt: String,
    max_tool_rounds: usize,
}

impl Agent {
    #[inline]
    pub fn new(model: Arc<dyn ChatModel>, retrieval: RetrievalTool) -> Self {
        Self {
            model,
            retrieval,
            system_prompt: SYSTEM_PROMPT.to_string(),
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
        }
    }

    #[inline]
    pub fn with_max_tool_rounds(mut self, rounds: usize) -> Self {
        self.max_tool_rounds = rounds;
        self
    }

    #[inline]
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Run the conversation and return the model's final text
    #[inline]
    pub async fn run(&self, prompt: &str) -> Result<String> {
        self.converse(prompt, None).await
    }

    /// Run the conversation with the final answer constrained to
    /// [`StructuredAnswer`]. Validation failures are returned as-is.
    #[inline]
    pub async fn run_structured(&self, prompt: &str) -> Result<StructuredAnswer> {
        let format = StructuredAnswer::response_format();
        let content = self.converse(prompt, Some(&format)).await?;
        StructuredAnswer::parse(&content)
    }

    async fn converse(&self, prompt: &str, format: Option<&ResponseFormat>) -> Result<String> {
        let tools = vec![RetrievalTool::definition()];
        let mut messages = vec![
            ChatMessage::system(self.system_prompt.as_str()),
            ChatMessage::user(prompt),
        ];
        let mut round = 0;

        loop {
            let completion = self
                .model
                .complete(ChatRequest {
                    messages: &messages,
                    tools: &tools,
                    response_format: format,
                })
                .await?;

            if completion.tool_calls.is_empty() {
                info!("Agent answered after {} tool rounds", round);
                return completion
                    .content
                    .filter(|content| !content.trim().is_empty())
                    .ok_or(RagError::EmptyCompletion);
            }

            if round == self.max_tool_rounds {
                warn!(
                    "Model still requesting tools after {} rounds, giving up",
                    round
                );
                return Err(RagError::ToolRoundsExceeded(self.max_tool_rounds));
            }
            round += 1;

            debug!(
                "Round {}: model requested {} tool calls",
                round,
                completion.tool_calls.len()
            );

            let calls = completion.tool_calls;
            messages.push(ChatMessage::tool_request(
                completion.content,
                calls.clone(),
            ));
            for call in &calls {
                let output = self.execute_tool(call).await?;
                messages.push(ChatMessage::tool_result(call.id.as_str(), output));
            }
        }
    }

    /// Malformed calls are answered with an error message the model can
    /// react to; failures of the retrieval itself propagate.
    async fn execute_tool(&self, call: &ToolCall) -> Result<String> {
        if call.name != TOOL_NAME {
            warn!("Model called unknown tool '{}'", call.name);
            return Ok(format!(
                "Unknown tool '{}'. Available tools: {}",
                call.name, TOOL_NAME
            ));
        }

        let args: RetrieveArgs = match serde_json::from_str(&call.arguments) {
            Ok(args) => args,
            Err(e) => {
                warn!("Invalid arguments for {}: {}", TOOL_NAME, e);
                return Ok(format!(
                    "Invalid arguments for {}: {}. Expected {{\"query\": string}}.",
                    TOOL_NAME, e
                ));
            }
        };

        self.retrieval.retrieve(&args.query).await
    }
}
