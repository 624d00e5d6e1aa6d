//! OpenAI LLM provider with streaming support

use futures::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use std::env;

use super::{
    CompletionRequest, FinishReason, LlmProvider, LlmStream, LlmStreamSender, StreamChunk,
    ToolCallDelta,
};
use crate::agents::domain::{Message, Role};
use crate::agents::error::{LlmError, LlmResult};
use crate::config::LlmProviderSettings;

/// OpenAI chat-completions provider
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    default_temperature: Option<f32>,
    default_max_tokens: Option<u32>,
}

impl OpenAiProvider {
    /// Create a new OpenAI provider from configuration
    pub fn new(config: &LlmProviderSettings) -> LlmResult<Self> {
        let env_var = config.api_key_env.as_deref().unwrap_or("OPENAI_API_KEY");
        let api_key = env::var(env_var).map_err(|_| {
            LlmError::Authentication(format!("Environment variable {} not set", env_var))
        })?;

        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string());

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            base_url,
            model: config.model.clone(),
            default_temperature: config.temperature,
            default_max_tokens: config.max_tokens,
        })
    }

    fn build_request_body(&self, request: &CompletionRequest) -> Value {
        let mut body = json!({
            "model": request.model.as_ref().unwrap_or(&self.model),
            "messages": convert_messages(&request.messages),
            "stream": true,
        });

        if let Some(temp) = request.temperature.or(self.default_temperature) {
            body["temperature"] = json!(temp);
        }

        if let Some(max_tokens) = request.max_tokens.or(self.default_max_tokens) {
            body["max_tokens"] = json!(max_tokens);
        }

        if let Some(tools) = &request.tools {
            if !tools.is_empty() {
                body["tools"] = json!(tools
                    .iter()
                    .map(|t| {
                        // The API rejects empty function parameters; always send
                        // at least {"type": "object"}
                        let params = if t.parameters.is_null()
                            || t.parameters.as_object().map_or(true, |o| o.is_empty())
                        {
                            json!({
                                "type": "object",
                                "properties": {},
                                "required": []
                            })
                        } else {
                            t.parameters.clone()
                        };
                        json!({
                            "type": "function",
                            "function": {
                                "name": t.name,
                                "description": t.description,
                                "parameters": params
                            }
                        })
                    })
                    .collect::<Vec<_>>());
            }
        }

        body
    }

    async fn stream_completion(
        client: reqwest::Client,
        api_key: String,
        base_url: String,
        body: Value,
        sender: LlmStreamSender,
    ) -> LlmResult<()> {
        let response = client
            .post(format!("{}/chat/completions", base_url))
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                message: error_text,
            });
        }

        let mut stream = response.bytes_stream();
        let mut buffer = String::new();

        while let Some(chunk_result) = stream.next().await {
            let chunk = chunk_result.map_err(|e| LlmError::Streaming(e.to_string()))?;
            buffer.push_str(&String::from_utf8_lossy(&chunk));

            while let Some(pos) = buffer.find('\n') {
                let line = buffer[..pos].trim().to_string();
                buffer = buffer[pos + 1..].to_string();

                let Some(data) = line.strip_prefix("data: ") else {
                    continue;
                };
                if data == "[DONE]" {
                    return Ok(());
                }

                if let Some(chunk) = parse_stream_data(data) {
                    if sender.send(chunk).await.is_err() {
                        // Receiver dropped
                        return Ok(());
                    }
                }
            }
        }

        Ok(())
    }
}

impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn complete_stream(&self, request: CompletionRequest) -> LlmStream {
        let (sender, stream) = LlmStream::channel(64);

        let client = self.client.clone();
        let api_key = self.api_key.clone();
        let base_url = self.base_url.clone();
        let body = self.build_request_body(&request);

        tokio::spawn(async move {
            let result =
                Self::stream_completion(client, api_key, base_url, body, sender.clone()).await;
            if let Err(e) = result {
                let _ = sender.send_error(e).await;
            }
        });

        stream
    }
}

fn convert_messages(messages: &[Message]) -> Vec<Value> {
    messages
        .iter()
        .map(|m| {
            let mut msg = json!({
                "role": match m.role {
                    Role::System => "system",
                    Role::User => "user",
                    Role::Assistant => "assistant",
                    Role::Tool => "tool",
                },
                "content": m.content,
            });

            if let Some(tool_calls) = &m.tool_calls {
                msg["tool_calls"] = json!(tool_calls
                    .iter()
                    .map(|tc| {
                        json!({
                            "id": tc.id,
                            "type": "function",
                            "function": {
                                "name": tc.name,
                                "arguments": serde_json::to_string(&tc.arguments)
                                    .unwrap_or_default()
                            }
                        })
                    })
                    .collect::<Vec<_>>());
            }

            if let Some(tool_call_id) = &m.tool_call_id {
                msg["tool_call_id"] = json!(tool_call_id);
            }

            if let Some(name) = &m.name {
                msg["name"] = json!(name);
            }

            msg
        })
        .collect()
}

fn parse_finish_reason(reason: Option<&str>) -> FinishReason {
    match reason {
        Some("length") => FinishReason::Length,
        Some("tool_calls") => FinishReason::ToolCalls,
        Some("content_filter") => FinishReason::ContentFilter,
        _ => FinishReason::Stop,
    }
}

fn parse_stream_data(data: &str) -> Option<StreamChunk> {
    let parsed: OpenAiStreamResponse = serde_json::from_str(data).ok()?;
    let choice = parsed.choices.first()?;

    let mut chunk = StreamChunk {
        content: choice.delta.content.clone().unwrap_or_default(),
        tool_calls: Vec::new(),
        finish_reason: None,
    };

    if let Some(tool_calls) = &choice.delta.tool_calls {
        for tc in tool_calls {
            let mut delta = ToolCallDelta::new(tc.index);
            if let Some(id) = &tc.id {
                delta = delta.with_id(id);
            }
            if let Some(func) = &tc.function {
                if let Some(name) = &func.name {
                    delta = delta.with_name(name);
                }
                if let Some(args) = &func.arguments {
                    delta = delta.with_arguments(args);
                }
            }
            chunk.tool_calls.push(delta);
        }
    }

    if let Some(reason) = &choice.finish_reason {
        chunk.finish_reason = Some(parse_finish_reason(Some(reason)));
    }

    Some(chunk)
}

// OpenAI API stream response types

#[derive(Debug, Deserialize)]
struct OpenAiStreamResponse {
    choices: Vec<OpenAiStreamChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamChoice {
    delta: OpenAiDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiDelta {
    content: Option<String>,
    tool_calls: Option<Vec<OpenAiStreamToolCall>>,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamToolCall {
    index: usize,
    id: Option<String>,
    function: Option<OpenAiStreamFunction>,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamFunction {
    name: Option<String>,
    arguments: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tool_call_delta_line() {
        let data = r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_1","function":{"name":"browser_snapshot","arguments":"{}"}}]},"finish_reason":null}]}"#;
        let chunk = parse_stream_data(data).unwrap();
        assert_eq!(chunk.tool_calls.len(), 1);
        assert_eq!(chunk.tool_calls[0].name.as_deref(), Some("browser_snapshot"));
    }

    #[test]
    fn parses_finish_reason() {
        let data = r#"{"choices":[{"delta":{},"finish_reason":"tool_calls"}]}"#;
        let chunk = parse_stream_data(data).unwrap();
        assert_eq!(chunk.finish_reason, Some(FinishReason::ToolCalls));
    }
}
