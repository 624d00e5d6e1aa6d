//! Agent handler: wires providers, tools and pipelines together
//!
//! One handler instance owns the whole agent system: the LLM provider
//! registry, the tool router (local tools plus MCP servers), the preset
//! agent roster and the pipeline runner with its session store. HTTP
//! handlers talk to the rest of the crate exclusively through this type.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};

use crate::adapters::daily_plan_tool::SaveDailyPlanTool;
use crate::adapters::mcp_client::McpClientManager;
use crate::adapters::tool_handler::{AgentTool, ToolBinding, ToolRouter};
use crate::agents::config::PipelineConfig;
use crate::agents::core::{Agent, SimpleAgent};
use crate::agents::domain::{EventStream, RunContext, SessionState};
use crate::agents::error::{AgentError, AgentResult};
use crate::agents::llm::{GeminiProvider, LlmProvider, OpenAiProvider, ProviderRegistry};
use crate::agents::memory::{create_store, SessionStore};
use crate::agents::pipeline::PipelineRunner;
use crate::agents::presets;
use crate::config::{LlmProviderSettings, Settings};
use crate::persistence::{PgPlanSink, PlanSink, UnconfiguredSink};

/// Prompt used to kick off a daily-planner run; the real inputs travel in
/// the run context, not the prompt
const PLAN_KICKOFF_PROMPT: &str = "Generate today's trading plan.";

/// Fixed chart reference handed to the strategy analyst
const MORNING_CHART_IMAGE: &str = "morning_chart.png";

/// Facade over the agent system
pub struct AgentHandler {
    runner: PipelineRunner,
    pipelines: HashMap<String, PipelineConfig>,
    store: Arc<dyn SessionStore>,
}

impl AgentHandler {
    /// Build the full agent system from configuration
    ///
    /// Providers whose credentials are missing are skipped with a warning;
    /// pipelines that need them fail at invocation time rather than at
    /// startup. The same applies to the plan database.
    pub async fn from_settings(
        settings: &Settings,
        mcp: Arc<McpClientManager>,
    ) -> AgentResult<Self> {
        let registry = build_registry(&settings.providers);
        let store = create_store(&settings.memory);

        let sink: Arc<dyn PlanSink> = match &settings.database {
            Some(db) => match PgPlanSink::connect(db).await {
                Ok(sink) => Arc::new(sink),
                Err(e) => {
                    warn!("Plan database unavailable: {}", e);
                    Arc::new(UnconfiguredSink)
                }
            },
            None => Arc::new(UnconfiguredSink),
        };

        let agent_configs = presets::default_agents();

        // The orchestrator calls the analyst as a tool. That analyst copy
        // only needs browser tools, so it is built over a bare MCP router
        // before the full router exists.
        let browser_tools = Arc::new(ToolRouter::new(mcp.clone()));
        let mut router = ToolRouter::new(mcp);
        router.register(ToolBinding::Function(Arc::new(SaveDailyPlanTool::new(
            sink,
        ))));

        if let Some(analyst_cfg) = agent_configs.iter().find(|a| a.name == "analyst") {
            match registry.get(&analyst_cfg.provider) {
                Ok(provider) => {
                    let analyst: Arc<dyn Agent> = Arc::new(SimpleAgent::new(
                        analyst_cfg.clone(),
                        provider,
                        browser_tools,
                    ));
                    router.register(ToolBinding::Agent(AgentTool::new(
                        "analyst_agent",
                        "Runs the Forex market analyst on a task and returns its analysis",
                        analyst,
                    )));
                }
                Err(e) => warn!("analyst_agent tool disabled: {}", e),
            }
        }

        let tools = Arc::new(router);

        let mut agents: HashMap<String, Arc<dyn Agent>> = HashMap::new();
        for config in agent_configs {
            match registry.get(&config.provider) {
                Ok(provider) => {
                    let name = config.name.clone();
                    agents.insert(
                        name,
                        Arc::new(SimpleAgent::new(config, provider, tools.clone())),
                    );
                }
                Err(e) => warn!("Agent '{}' disabled: {}", config.name, e),
            }
        }

        info!(agents = agents.len(), "Agent system initialized");

        Ok(Self::new(
            PipelineRunner::new(agents, store.clone()),
            presets::default_pipelines(),
            store,
        ))
    }

    /// Assemble a handler from prebuilt parts
    pub fn new(
        runner: PipelineRunner,
        pipelines: Vec<PipelineConfig>,
        store: Arc<dyn SessionStore>,
    ) -> Self {
        Self {
            runner,
            pipelines: pipelines.into_iter().map(|p| (p.name.clone(), p)).collect(),
            store,
        }
    }

    /// Resolve the pipeline for a requested agent type
    ///
    /// `executor`, `orchestrator` and `planner` map to their pipelines;
    /// anything else, including no type at all, runs the analyst.
    fn pipeline_for(&self, agent_type: Option<&str>) -> AgentResult<&PipelineConfig> {
        let name = match agent_type {
            Some("executor") => "executor",
            Some("orchestrator") => "chat",
            Some("planner") => "daily-planner",
            _ => "analyst",
        };
        self.pipelines
            .get(name)
            .ok_or_else(|| AgentError::NotFound(name.to_string()))
    }

    /// Run the pipeline selected by `agent_type` on a chat message
    pub fn invoke(
        &self,
        message: String,
        session_id: Option<String>,
        agent_type: Option<&str>,
    ) -> AgentResult<EventStream> {
        let pipeline = self.pipeline_for(agent_type)?;
        Ok(self
            .runner
            .run(pipeline, message, session_id, RunContext::new()))
    }

    /// Run the daily-planner pipeline over the supplied strategy inputs
    pub fn plan(
        &self,
        strategy_pdf_text: String,
        broker_url: String,
        session_id: Option<String>,
    ) -> AgentResult<EventStream> {
        let pipeline = self
            .pipelines
            .get("daily-planner")
            .ok_or_else(|| AgentError::NotFound("daily-planner".to_string()))?;

        let mut context = RunContext::new();
        context.set_str("strategy_pdf_text", &strategy_pdf_text);
        context.set_str("broker_url", &broker_url);
        context.set_str("morning_chart_image", MORNING_CHART_IMAGE);

        Ok(self
            .runner
            .run(pipeline, PLAN_KICKOFF_PROMPT.to_string(), session_id, context))
    }

    /// Load one session's history
    pub async fn history(&self, session_id: &str) -> AgentResult<Option<SessionState>> {
        self.store.get(session_id).await
    }

    /// Delete one session's history
    pub async fn clear_history(&self, session_id: &str) -> AgentResult<()> {
        self.store.clear(session_id).await
    }

    /// Delete every session's history
    pub async fn clear_all_history(&self) -> AgentResult<()> {
        self.store.clear_all().await
    }

    /// Names of the agents available to pipelines
    pub fn agent_names(&self) -> Vec<String> {
        self.runner.list_agents()
    }
}

/// Build the provider registry, skipping providers whose credentials are
/// missing so a partially configured deployment still starts
fn build_registry(configured: &HashMap<String, LlmProviderSettings>) -> ProviderRegistry {
    let providers = if configured.is_empty() {
        default_providers()
    } else {
        configured.clone()
    };

    let mut registry = ProviderRegistry::default();
    for (name, config) in &providers {
        let provider: Result<Arc<dyn LlmProvider>, _> = match name.as_str() {
            "openai" => OpenAiProvider::new(config).map(|p| Arc::new(p) as Arc<dyn LlmProvider>),
            "gemini" => GeminiProvider::new(config).map(|p| Arc::new(p) as Arc<dyn LlmProvider>),
            other => {
                warn!("Unknown LLM provider '{}' in configuration, skipping", other);
                continue;
            }
        };
        match provider {
            Ok(p) => registry.register(name.clone(), p),
            Err(e) => warn!("LLM provider '{}' unavailable: {}", name, e),
        }
    }
    registry
}

/// Provider settings used when the config file names none; the preset
/// agents all run on Gemini
fn default_providers() -> HashMap<String, LlmProviderSettings> {
    let mut providers = HashMap::new();
    providers.insert(
        "gemini".to_string(),
        LlmProviderSettings {
            model: "gemini-1.5-pro".to_string(),
            api_key_env: None,
            base_url: None,
            temperature: None,
            max_tokens: None,
        },
    );
    providers
}
