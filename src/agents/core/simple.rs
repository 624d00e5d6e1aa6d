//! Tool-loop agent implementation
//!
//! Runs a bounded model/tool loop: stream a completion, execute any tool
//! calls, feed results back, repeat until the model stops calling tools or
//! the iteration bound is hit. The final output is the last non-empty text
//! produced across iterations.

use std::sync::Arc;
use std::time::Instant;

use futures::StreamExt;
use serde_json::json;
use tracing::{debug, warn};

use super::{last_non_empty, Agent, AgentInvocation};
use crate::agents::config::AgentConfig;
use crate::agents::domain::{
    AgentChunk, AgentResponse, AgentStream, AgentStreamSender, Message, RunContext, ToolCallResult,
    ToolDefinition,
};
use crate::agents::error::AgentError;
use crate::agents::llm::{CompletionRequest, LlmProvider, ToolCallAccumulator};
use crate::domain::ToolPort;

/// Streaming agent with an optional tool loop
pub struct SimpleAgent {
    config: AgentConfig,
    llm: Arc<dyn LlmProvider>,
    tool_handler: Arc<dyn ToolPort>,
}

impl SimpleAgent {
    /// Create a new agent
    pub fn new(
        config: AgentConfig,
        llm: Arc<dyn LlmProvider>,
        tool_handler: Arc<dyn ToolPort>,
    ) -> Self {
        Self {
            config,
            llm,
            tool_handler,
        }
    }

    /// Interpolate `{{placeholder}}` references from the run context
    fn render_instructions(instructions: &str, context: &RunContext) -> String {
        let mut tera_ctx = tera::Context::new();
        for (key, value) in context.iter() {
            tera_ctx.insert(key, value);
        }

        match tera::Tera::one_off(instructions, &tera_ctx, false) {
            Ok(rendered) => rendered,
            Err(e) => {
                warn!("Failed to render instructions, using raw text: {}", e);
                instructions.to_string()
            }
        }
    }

    async fn build_tool_definitions(
        tool_handler: &Arc<dyn ToolPort>,
        allowed: &[String],
    ) -> Vec<ToolDefinition> {
        if allowed.is_empty() {
            return Vec::new();
        }

        let all_tools = match tool_handler.list_tools().await {
            Ok(tools) => tools,
            Err(e) => {
                warn!("Failed to list tools: {}", e);
                return Vec::new();
            }
        };

        // Entries ending in '*' match by prefix, e.g. "mcp__playwright_*"
        all_tools
            .into_iter()
            .filter(|t| {
                allowed.iter().any(|a| {
                    a == "*"
                        || a == &t.name
                        || (a.ends_with('*') && t.name.starts_with(a.trim_end_matches('*')))
                })
            })
            .map(|t| ToolDefinition {
                name: t.name,
                description: t.description,
                parameters: t.input_schema,
            })
            .collect()
    }

    async fn execute_internal(
        config: AgentConfig,
        llm: Arc<dyn LlmProvider>,
        tool_handler: Arc<dyn ToolPort>,
        invocation: AgentInvocation,
        sender: AgentStreamSender,
    ) {
        let start_time = Instant::now();

        let instructions = Self::render_instructions(&config.instructions, &invocation.context);

        let mut messages = vec![Message::system(instructions)];
        messages.extend(invocation.history);
        messages.push(Message::user(&invocation.prompt));

        let tools = Self::build_tool_definitions(&tool_handler, &config.tools).await;

        let mut all_tool_calls: Vec<ToolCallResult> = Vec::new();
        let mut iteration_outputs: Vec<String> = Vec::new();

        for iteration in 0..config.max_iterations {
            let request = CompletionRequest {
                messages: messages.clone(),
                model: Some(config.model.clone()),
                temperature: config.temperature,
                max_tokens: config.max_tokens,
                tools: if tools.is_empty() {
                    None
                } else {
                    Some(tools.clone())
                },
            };

            let mut stream = llm.complete_stream(request);
            let mut content = String::new();
            let mut tool_accumulator = ToolCallAccumulator::new();

            while let Some(result) = stream.next().await {
                match result {
                    Ok(chunk) => {
                        if !chunk.content.is_empty() {
                            content.push_str(&chunk.content);
                            if sender.send(AgentChunk::text(&chunk.content)).await.is_err() {
                                return;
                            }
                        }
                        for delta in &chunk.tool_calls {
                            tool_accumulator.apply_delta(delta);
                        }
                    }
                    Err(e) => {
                        let _ = sender.send_error(AgentError::Llm(e)).await;
                        return;
                    }
                }
            }

            iteration_outputs.push(content.clone());

            let tool_calls = tool_accumulator.build();
            if tool_calls.is_empty() {
                break;
            }

            debug!(
                agent = %config.name,
                iteration,
                count = tool_calls.len(),
                "Executing tool calls"
            );

            messages.push(Message::assistant_with_tools(&content, tool_calls.clone()));

            for tool_call in &tool_calls {
                if sender.send(AgentChunk::tool_call(tool_call)).await.is_err() {
                    return;
                }

                let result = tool_handler
                    .execute_tool(&tool_call.name, tool_call.arguments.clone())
                    .await;

                let tool_result = match result {
                    Ok(output) => ToolCallResult::success(
                        tool_call.id.clone(),
                        tool_call.name.clone(),
                        output,
                    ),
                    Err(e) if e.is_fatal() => {
                        // Server unreachable: abort the whole stage
                        let _ = sender.send_error(AgentError::ToolConnection(e.to_string())).await;
                        return;
                    }
                    Err(e) => {
                        // Execution failure goes back to the model as a
                        // payload so it can react
                        warn!(tool = %tool_call.name, "Tool failed: {}", e);
                        let mut r = ToolCallResult::failure(
                            tool_call.id.clone(),
                            tool_call.name.clone(),
                            e.to_string(),
                        );
                        r.output = json!({ "success": false, "error": e.to_string() });
                        r
                    }
                };

                if sender
                    .send(AgentChunk::tool_result(&tool_result))
                    .await
                    .is_err()
                {
                    return;
                }

                messages.push(Message::tool_result(
                    &tool_call.id,
                    &tool_call.name,
                    &tool_result.output,
                ));

                all_tool_calls.push(tool_result);
            }
        }

        let response = AgentResponse {
            output: last_non_empty(&iteration_outputs),
            tool_calls: all_tool_calls,
            execution_time_ms: start_time.elapsed().as_millis() as u64,
        };

        let _ = sender.send(AgentChunk::complete(response)).await;
    }
}

impl Agent for SimpleAgent {
    fn config(&self) -> &AgentConfig {
        &self.config
    }

    fn execute(&self, invocation: AgentInvocation) -> AgentStream {
        let (sender, stream) = AgentStream::channel(64);

        let config = self.config.clone();
        let llm = self.llm.clone();
        let tool_handler = self.tool_handler.clone();

        tokio::spawn(async move {
            Self::execute_internal(config, llm, tool_handler, invocation, sender).await;
        });

        stream
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::domain::RunContext;

    #[test]
    fn renders_context_placeholders() {
        let mut ctx = RunContext::new();
        ctx.set_str("chart_analysis", "bullish momentum on H4");
        let rendered = SimpleAgent::render_instructions(
            "Use this analysis: {{ chart_analysis }}",
            &ctx,
        );
        assert_eq!(rendered, "Use this analysis: bullish momentum on H4");
    }

    #[test]
    fn falls_back_to_raw_text_on_bad_template() {
        let ctx = RunContext::new();
        let raw = "Unbalanced {{ thing";
        assert_eq!(SimpleAgent::render_instructions(raw, &ctx), raw);
    }
}
