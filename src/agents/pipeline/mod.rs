//! Sequential pipeline runner
//!
//! A pipeline is an ordered list of stages. Each stage runs one agent; the
//! stage's final output is written to the run context under the stage's
//! output key and becomes the next stage's input. The last stage's output is
//! the pipeline result.

use std::collections::HashMap;
use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::agents::config::{HistoryMode, PipelineConfig};
use crate::agents::core::{Agent, AgentInvocation};
use crate::agents::domain::{
    AgentChunk, ConversationMessage, EventStream, Message, PipelineEvent, Role, RunContext,
};
use crate::agents::memory::SessionStore;

/// Lifecycle of one pipeline run, used for tracing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    SessionResolved,
    Running,
    Completed,
    Failed,
}

/// Executes pipelines against a set of named agents
///
/// The runner owns all session handling: it appends the user message before
/// the first stage and the final result (or error text) after the last, so
/// agents themselves never touch the store.
pub struct PipelineRunner {
    agents: HashMap<String, Arc<dyn Agent>>,
    store: Arc<dyn SessionStore>,
}

impl PipelineRunner {
    /// Create a runner over the given agents and session store
    pub fn new(agents: HashMap<String, Arc<dyn Agent>>, store: Arc<dyn SessionStore>) -> Self {
        Self { agents, store }
    }

    /// Get an agent by name
    pub fn get_agent(&self, name: &str) -> Option<Arc<dyn Agent>> {
        self.agents.get(name).cloned()
    }

    /// List available agents
    pub fn list_agents(&self) -> Vec<String> {
        self.agents.keys().cloned().collect()
    }

    /// Run a pipeline, streaming ordered events
    ///
    /// The stream always starts with `connected` and ends with either
    /// `result` followed by `done`, or a single `error`.
    pub fn run(
        &self,
        pipeline: &PipelineConfig,
        message: String,
        session_id: Option<String>,
        initial_context: RunContext,
    ) -> EventStream {
        let (tx, stream) = EventStream::channel(64);

        let agents = self.agents.clone();
        let store = self.store.clone();
        let pipeline = pipeline.clone();

        tokio::spawn(async move {
            Self::run_internal(agents, store, pipeline, message, session_id, initial_context, tx)
                .await;
        });

        stream
    }

    async fn run_internal(
        agents: HashMap<String, Arc<dyn Agent>>,
        store: Arc<dyn SessionStore>,
        pipeline: PipelineConfig,
        message: String,
        session_id: Option<String>,
        initial_context: RunContext,
        tx: mpsc::Sender<PipelineEvent>,
    ) {
        let session_id = session_id.unwrap_or_else(|| pipeline.default_session.clone());

        if let Err(e) = store.create_if_absent(&session_id).await {
            let _ = tx
                .send(PipelineEvent::Error {
                    message: format!("Failed to resolve session: {}", e),
                })
                .await;
            return;
        }

        let mut state = RunState::SessionResolved;
        debug!(pipeline = %pipeline.name, session_id = %session_id, ?state, "Pipeline run starting");

        if tx
            .send(PipelineEvent::Connected {
                session_id: session_id.clone(),
            })
            .await
            .is_err()
        {
            return;
        }

        // History snapshot predates this turn's user message, so agents see
        // prior turns in history and the current input as the prompt
        let history_snapshot = match store.get(&session_id).await {
            Ok(session) => session
                .map(|s| {
                    s.messages
                        .iter()
                        .map(ConversationMessage::to_message)
                        .collect::<Vec<Message>>()
                })
                .unwrap_or_default(),
            Err(_) => Vec::new(),
        };

        if let Err(e) = store
            .append(&session_id, ConversationMessage::new(Role::User, &message))
            .await
        {
            let _ = tx
                .send(PipelineEvent::Error {
                    message: format!("Failed to record user message: {}", e),
                })
                .await;
            return;
        }

        state = RunState::Running;
        debug!(pipeline = %pipeline.name, ?state, stages = pipeline.stages.len(), "Executing stages");
        let mut context = initial_context;
        let mut current_input = message;

        for stage in &pipeline.stages {
            let announce = stage
                .announce
                .clone()
                .unwrap_or_else(|| format!("Running {}", stage.agent));
            if tx
                .send(PipelineEvent::Processing { message: announce })
                .await
                .is_err()
            {
                return;
            }

            let Some(agent) = agents.get(&stage.agent) else {
                let msg = format!("Agent not found: {}", stage.agent);
                Self::fail(&store, &session_id, &tx, msg).await;
                return;
            };

            let history = match agent.config().include_history {
                HistoryMode::Full => history_snapshot.clone(),
                HistoryMode::None => Vec::new(),
            };

            let invocation = AgentInvocation::new(&current_input)
                .with_history(history)
                .with_context(context.clone());

            let mut agent_stream = agent.execute(invocation);
            let mut stage_output: Option<String> = None;

            while let Some(result) = agent_stream.next().await {
                match result {
                    Ok(AgentChunk::Text { content }) => {
                        if tx
                            .send(PipelineEvent::Step { text: content })
                            .await
                            .is_err()
                        {
                            return;
                        }
                    }
                    Ok(AgentChunk::ToolCall { name, .. }) => {
                        info!(stage = %stage.agent, tool = %name, "Tool call");
                        if tx
                            .send(PipelineEvent::Processing {
                                message: format!("Calling tool {}", name),
                            })
                            .await
                            .is_err()
                        {
                            return;
                        }
                    }
                    Ok(AgentChunk::ToolResult { name, success, .. }) => {
                        debug!(stage = %stage.agent, tool = %name, success, "Tool result");
                    }
                    Ok(AgentChunk::Complete { response }) => {
                        stage_output = Some(response.output);
                    }
                    // The emitted error text is the stage's failure text,
                    // unwrapped; the stage name goes to the log only
                    Ok(AgentChunk::Error { message })
                    | Err(crate::agents::error::AgentError::Execution(message)) => {
                        error!(stage = %stage.agent, "Stage failed");
                        Self::fail(&store, &session_id, &tx, message).await;
                        return;
                    }
                    Err(e) => {
                        error!(stage = %stage.agent, "Stage failed");
                        Self::fail(&store, &session_id, &tx, e.to_string()).await;
                        return;
                    }
                }
            }

            let Some(output) = stage_output else {
                let msg = format!("Stage '{}' produced no result", stage.agent);
                Self::fail(&store, &session_id, &tx, msg).await;
                return;
            };

            context.set_str(&stage.output_key, &output);
            current_input = output;
        }

        state = RunState::Completed;
        info!(pipeline = %pipeline.name, session_id = %session_id, ?state, "Pipeline run finished");

        if let Err(e) = store
            .append(
                &session_id,
                ConversationMessage::new(Role::Assistant, &current_input),
            )
            .await
        {
            error!("Failed to record assistant message: {}", e);
        }

        if tx
            .send(PipelineEvent::Result {
                content: current_input,
                session_id: session_id.clone(),
            })
            .await
            .is_err()
        {
            return;
        }
        let _ = tx.send(PipelineEvent::Done).await;
    }

    /// Emit the terminal `error` event, recording the error text in history.
    /// No `done` follows an error; the stream just closes.
    async fn fail(
        store: &Arc<dyn SessionStore>,
        session_id: &str,
        tx: &mpsc::Sender<PipelineEvent>,
        message: String,
    ) {
        let state = RunState::Failed;
        error!(session_id, ?state, "{}", message);

        if let Err(e) = store
            .append(
                session_id,
                ConversationMessage::new(Role::Assistant, &message),
            )
            .await
        {
            error!("Failed to record error message: {}", e);
        }

        let _ = tx.send(PipelineEvent::Error { message }).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::config::{AgentConfig, StageConfig};
    use crate::agents::domain::{AgentResponse, AgentStream};
    use crate::agents::memory::InMemoryStore;

    /// Agent that emits a fixed script without touching any model
    struct ScriptedAgent {
        config: AgentConfig,
        output: Result<String, String>,
        echo_context_key: Option<String>,
    }

    impl ScriptedAgent {
        fn ok(name: &str, output: &str) -> Arc<dyn Agent> {
            Arc::new(Self {
                config: AgentConfig::new(name, "openai", "gpt-4o", "test"),
                output: Ok(output.to_string()),
                echo_context_key: None,
            })
        }

        fn failing(name: &str, message: &str) -> Arc<dyn Agent> {
            Arc::new(Self {
                config: AgentConfig::new(name, "openai", "gpt-4o", "test"),
                output: Err(message.to_string()),
                echo_context_key: None,
            })
        }

        fn echoing_context(name: &str, key: &str) -> Arc<dyn Agent> {
            Arc::new(Self {
                config: AgentConfig::new(name, "openai", "gpt-4o", "test"),
                output: Ok(String::new()),
                echo_context_key: Some(key.to_string()),
            })
        }
    }

    impl Agent for ScriptedAgent {
        fn config(&self) -> &AgentConfig {
            &self.config
        }

        fn execute(&self, invocation: AgentInvocation) -> AgentStream {
            let (sender, stream) = AgentStream::channel(16);
            let output = self.output.clone();
            let echo = self
                .echo_context_key
                .as_ref()
                .and_then(|k| invocation.context.get_str(k).map(str::to_string));
            tokio::spawn(async move {
                match output {
                    Ok(text) => {
                        let final_text = echo.unwrap_or(text);
                        let _ = sender.send(AgentChunk::text(&final_text)).await;
                        let _ = sender
                            .send(AgentChunk::complete(AgentResponse {
                                output: final_text,
                                tool_calls: Vec::new(),
                                execution_time_ms: 1,
                            }))
                            .await;
                    }
                    Err(message) => {
                        let _ = sender.send(AgentChunk::error(message)).await;
                    }
                }
            });
            stream
        }
    }

    fn pipeline_of(stages: Vec<StageConfig>) -> PipelineConfig {
        PipelineConfig {
            name: "test-pipeline".to_string(),
            description: String::new(),
            stages,
            default_session: "default-session".to_string(),
        }
    }

    #[tokio::test]
    async fn events_follow_the_fixed_order() {
        let mut agents = HashMap::new();
        agents.insert("a".to_string(), ScriptedAgent::ok("a", "answer"));
        let store = Arc::new(InMemoryStore::new(50));
        let runner = PipelineRunner::new(agents, store);

        let pipeline = pipeline_of(vec![StageConfig::new("a", "a_output")]);
        let events = runner
            .run(&pipeline, "question".to_string(), None, RunContext::new())
            .collect_all()
            .await;

        assert!(matches!(events[0], PipelineEvent::Connected { .. }));
        assert!(matches!(events[1], PipelineEvent::Processing { .. }));
        let terminal: Vec<_> = events.iter().filter(|e| e.is_terminal()).collect();
        assert_eq!(terminal.len(), 1);
        assert_eq!(events.last(), Some(&PipelineEvent::Done));
        match terminal[0] {
            PipelineEvent::Result { content, session_id } => {
                assert_eq!(content, "answer");
                assert_eq!(session_id, "default-session");
            }
            other => panic!("expected result, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn stage_failure_aborts_without_done() {
        let mut agents = HashMap::new();
        agents.insert("a".to_string(), ScriptedAgent::ok("a", "fine"));
        agents.insert("b".to_string(), ScriptedAgent::failing("b", "provider down"));
        agents.insert("c".to_string(), ScriptedAgent::ok("c", "never runs"));
        let store: Arc<dyn SessionStore> = Arc::new(InMemoryStore::new(50));
        let runner = PipelineRunner::new(agents, store.clone());

        let pipeline = pipeline_of(vec![
            StageConfig::new("a", "a_output"),
            StageConfig::new("b", "b_output"),
            StageConfig::new("c", "c_output"),
        ]);
        let events = runner
            .run(&pipeline, "go".to_string(), None, RunContext::new())
            .collect_all()
            .await;

        let error_text = match events.last() {
            Some(PipelineEvent::Error { message }) => message.clone(),
            other => panic!("expected error last, got {:?}", other),
        };
        // Error text equals the failing stage's own message, unwrapped
        assert_eq!(error_text, "provider down");
        assert!(!events.contains(&PipelineEvent::Done));

        // The error text lands in history as the assistant turn
        let session = store.get("default-session").await.unwrap().unwrap();
        let last = session.messages.last().unwrap();
        assert_eq!(last.role, Role::Assistant);
        assert_eq!(last.content, error_text);
    }

    #[tokio::test]
    async fn unknown_agent_is_a_run_error() {
        let runner = PipelineRunner::new(HashMap::new(), Arc::new(InMemoryStore::new(50)));
        let pipeline = pipeline_of(vec![StageConfig::new("ghost", "out")]);
        let outcome = runner
            .run(&pipeline, "hi".to_string(), None, RunContext::new())
            .into_outcome()
            .await;
        assert!(outcome.unwrap_err().contains("Agent not found"));
    }

    #[tokio::test]
    async fn stage_outputs_thread_through_context() {
        let mut agents = HashMap::new();
        agents.insert("first".to_string(), ScriptedAgent::ok("first", "stage one says hi"));
        agents.insert(
            "second".to_string(),
            ScriptedAgent::echoing_context("second", "first_output"),
        );
        let runner = PipelineRunner::new(agents, Arc::new(InMemoryStore::new(50)));

        let pipeline = pipeline_of(vec![
            StageConfig::new("first", "first_output"),
            StageConfig::new("second", "second_output"),
        ]);
        let outcome = runner
            .run(&pipeline, "go".to_string(), None, RunContext::new())
            .into_outcome()
            .await;
        assert_eq!(outcome.unwrap(), "stage one says hi");
    }

    #[tokio::test]
    async fn concurrent_runs_keep_sessions_apart() {
        let mut agents = HashMap::new();
        agents.insert("a".to_string(), ScriptedAgent::ok("a", "alpha answer"));
        agents.insert("b".to_string(), ScriptedAgent::ok("b", "beta answer"));
        let store: Arc<dyn SessionStore> = Arc::new(InMemoryStore::new(50));
        let runner = PipelineRunner::new(agents, store.clone());

        let first = pipeline_of(vec![StageConfig::new("a", "out")]);
        let second = pipeline_of(vec![StageConfig::new("b", "out")]);

        let run_first = runner
            .run(
                &first,
                "alpha question".to_string(),
                Some("alpha".to_string()),
                RunContext::new(),
            )
            .collect_all();
        let run_second = runner
            .run(
                &second,
                "beta question".to_string(),
                Some("beta".to_string()),
                RunContext::new(),
            )
            .collect_all();
        tokio::join!(run_first, run_second);

        // Each session holds exactly its own turns, nothing crossed over
        let alpha = store.get("alpha").await.unwrap().unwrap();
        let turns: Vec<&str> = alpha.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(turns, vec!["alpha question", "alpha answer"]);

        let beta = store.get("beta").await.unwrap().unwrap();
        let turns: Vec<&str> = beta.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(turns, vec!["beta question", "beta answer"]);
    }

    #[tokio::test]
    async fn explicit_session_id_wins_over_default() {
        let mut agents = HashMap::new();
        agents.insert("a".to_string(), ScriptedAgent::ok("a", "ok"));
        let store: Arc<dyn SessionStore> = Arc::new(InMemoryStore::new(50));
        let runner = PipelineRunner::new(agents, store.clone());

        let pipeline = pipeline_of(vec![StageConfig::new("a", "out")]);
        runner
            .run(
                &pipeline,
                "hello".to_string(),
                Some("mine".to_string()),
                RunContext::new(),
            )
            .collect_all()
            .await;

        let session = store.get("mine").await.unwrap().unwrap();
        assert_eq!(session.message_count(), 2);
        assert_eq!(session.messages[0].content, "hello");
        assert_eq!(session.messages[1].content, "ok");
        assert!(store.get("default-session").await.unwrap().is_none());
    }
}
