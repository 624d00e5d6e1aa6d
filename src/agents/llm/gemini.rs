//! Google Gemini LLM provider with streaming support

use futures::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use std::env;

use super::{
    CompletionRequest, FinishReason, LlmProvider, LlmStream, LlmStreamSender, StreamChunk,
    ToolCallDelta,
};
use crate::agents::domain::{Message, Role, ToolCall};
use crate::agents::error::{LlmError, LlmResult};
use crate::config::LlmProviderSettings;

/// Google Gemini provider
pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    default_temperature: Option<f32>,
    default_max_tokens: Option<u32>,
}

impl GeminiProvider {
    /// Create a new Gemini provider from configuration
    pub fn new(config: &LlmProviderSettings) -> LlmResult<Self> {
        let env_var = config.api_key_env.as_deref().unwrap_or("GEMINI_API_KEY");
        let api_key = env::var(env_var).map_err(|_| {
            LlmError::Authentication(format!("Environment variable {} not set", env_var))
        })?;

        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| "https://generativelanguage.googleapis.com/v1beta".to_string());

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
            "contents": convert_messages(&request.messages),
        });

        let mut generation_config = json!({});

        if let Some(temp) = request.temperature.or(self.default_temperature) {
            generation_config["temperature"] = json!(temp);
        }

        if let Some(max_tokens) = request.max_tokens.or(self.default_max_tokens) {
            generation_config["maxOutputTokens"] = json!(max_tokens);
        }

        if generation_config
            .as_object()
            .map_or(false, |o| !o.is_empty())
        {
            body["generationConfig"] = generation_config;
        }

        if let Some(tools) = &request.tools {
            if !tools.is_empty() {
                body["tools"] = json!([{
                    "function_declarations": tools.iter().map(|t| {
                        json!({
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters
                        })
                    }).collect::<Vec<_>>()
                }]);
            }
        }

        body
    }

    async fn stream_completion(
        client: reqwest::Client,
        api_key: String,
        base_url: String,
        model: String,
        body: Value,
        sender: LlmStreamSender,
    ) -> LlmResult<()> {
        let url = format!(
            "{}/models/{}:streamGenerateContent?key={}&alt=sse",
            base_url, model, api_key
        );

        let response = client
            .post(&url)
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
        let mut tool_call_index = 0usize;

        while let Some(chunk_result) = stream.next().await {
            let chunk = chunk_result.map_err(|e| LlmError::Streaming(e.to_string()))?;
            buffer.push_str(&String::from_utf8_lossy(&chunk));

            while let Some(pos) = buffer.find('\n') {
                let line = buffer[..pos].trim().to_string();
                buffer = buffer[pos + 1..].to_string();

                let Some(data) = line.strip_prefix("data: ") else {
                    continue;
                };

                let Ok(parsed) = serde_json::from_str::<GeminiStreamResponse>(data) else {
                    continue;
                };
                let Some(candidate) = parsed.candidates.and_then(|c| c.into_iter().next()) else {
                    continue;
                };

                let mut stream_chunk = StreamChunk {
                    content: String::new(),
                    tool_calls: Vec::new(),
                    finish_reason: None,
                };

                if let Some(parts) = candidate.content.and_then(|c| c.parts) {
                    for part in parts {
                        if let Some(text) = part.text {
                            stream_chunk.content.push_str(&text);
                        }
                        if let Some(fc) = part.function_call {
                            let args = serde_json::to_string(&fc.args.unwrap_or(Value::Null))
                                .unwrap_or_default();
                            // Gemini sends whole calls without ids; fabricate one
                            // so tool results can be matched back
                            let delta = ToolCallDelta::new(tool_call_index)
                                .with_id(ToolCall::generate_id())
                                .with_name(&fc.name)
                                .with_arguments(args);
                            stream_chunk.tool_calls.push(delta);
                            tool_call_index += 1;
                        }
                    }
                }

                if let Some(reason) = candidate.finish_reason {
                    stream_chunk.finish_reason = Some(parse_finish_reason(Some(&reason)));
                }

                if !stream_chunk.content.is_empty()
                    || !stream_chunk.tool_calls.is_empty()
                    || stream_chunk.finish_reason.is_some()
                {
                    if sender.send(stream_chunk).await.is_err() {
                        // Receiver dropped
                        return Ok(());
                    }
                }
            }
        }

        Ok(())
    }
}

impl LlmProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn complete_stream(&self, request: CompletionRequest) -> LlmStream {
        let (sender, stream) = LlmStream::channel(64);

        let client = self.client.clone();
        let api_key = self.api_key.clone();
        let base_url = self.base_url.clone();
        let model = request.model.clone().unwrap_or_else(|| self.model.clone());
        let body = self.build_request_body(&request);

        tokio::spawn(async move {
            let result =
                Self::stream_completion(client, api_key, base_url, model, body, sender.clone())
                    .await;
            if let Err(e) = result {
                let _ = sender.send_error(e).await;
            }
        });

        stream
    }
}

fn parse_finish_reason(reason: Option<&str>) -> FinishReason {
    match reason {
        Some("MAX_TOKENS") => FinishReason::Length,
        Some("SAFETY") | Some("RECITATION") => FinishReason::ContentFilter,
        _ => FinishReason::Stop,
    }
}

/// Convert internal messages to Gemini contents
///
/// Gemini has no system role; the system instruction is folded into the
/// first user message. Tool results become `functionResponse` parts.
fn convert_messages(messages: &[Message]) -> Vec<Value> {
    let mut contents = Vec::new();
    let mut system_instruction: Option<String> = None;

    for m in messages {
        match m.role {
            Role::System => {
                system_instruction = Some(m.content.clone());
            }
            Role::User => {
                let mut parts = vec![json!({ "text": m.content })];

                if let Some(sys) = system_instruction.take() {
                    parts.insert(
                        0,
                        json!({ "text": format!("[System Instructions]\n{}\n\n", sys) }),
                    );
                }

                contents.push(json!({
                    "role": "user",
                    "parts": parts
                }));
            }
            Role::Assistant => {
                let mut parts = Vec::new();

                if !m.content.is_empty() {
                    parts.push(json!({ "text": m.content }));
                }

                if let Some(tool_calls) = &m.tool_calls {
                    for tc in tool_calls {
                        parts.push(json!({
                            "functionCall": {
                                "name": tc.name,
                                "args": tc.arguments
                            }
                        }));
                    }
                }

                if !parts.is_empty() {
                    contents.push(json!({
                        "role": "model",
                        "parts": parts
                    }));
                }
            }
            Role::Tool => {
                let tool_name = m.name.clone().unwrap_or_else(|| "tool".to_string());
                let response_value: Value = serde_json::from_str(&m.content)
                    .unwrap_or_else(|_| json!({ "result": m.content }));

                contents.push(json!({
                    "role": "user",
                    "parts": [{
                        "functionResponse": {
                            "name": tool_name,
                            "response": response_value
                        }
                    }]
                }));
            }
        }
    }

    contents
}

// Gemini API stream response types

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiContent {
    parts: Option<Vec<GeminiPart>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPart {
    text: Option<String>,
    function_call: Option<GeminiFunctionCall>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiFunctionCall {
    name: String,
    args: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiStreamResponse {
    candidates: Option<Vec<GeminiStreamCandidate>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiStreamCandidate {
    content: Option<GeminiContent>,
    finish_reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folds_system_instruction_into_first_user_message() {
        let messages = vec![Message::system("trade carefully"), Message::user("hello")];
        let contents = convert_messages(&messages);
        assert_eq!(contents.len(), 1);
        let parts = contents[0]["parts"].as_array().unwrap();
        assert!(parts[0]["text"]
            .as_str()
            .unwrap()
            .contains("trade carefully"));
        assert_eq!(parts[1]["text"], "hello");
    }

    #[test]
    fn tool_result_becomes_function_response() {
        let result = json!({"ok": true});
        let messages = vec![Message::tool_result("call_1", "browser_snapshot", &result)];
        let contents = convert_messages(&messages);
        assert_eq!(
            contents[0]["parts"][0]["functionResponse"]["name"],
            "browser_snapshot"
        );
    }
}
