//! Built-in agents and pipelines
//!
//! The server ships with a fixed roster: a chat flow (orchestrator feeding a
//! synthesizer), single-agent analyst and executor flows, and the three-stage
//! daily planner. Instruction text is configuration, not code; it lives here
//! verbatim so deployments run without any config file.

use crate::agents::config::{AgentConfig, HistoryMode, PipelineConfig, StageConfig};

/// Session used by chat-style flows when the request names none
pub const DEFAULT_CHAT_SESSION: &str = "default-session";

/// Session used by the daily planner when the request names none
pub const DEFAULT_PLAN_SESSION: &str = "daily-plan-session";

const ANALYST_INSTRUCTIONS: &str = r#"You are a professional Forex market analyst with expertise in technical analysis.

Your role is to:
1. Navigate to the given URL to gather market data
2. Analyze currency pair charts, price action, and market conditions
3. Identify key technical levels (support, resistance, pivot points)
4. Determine market bias (BULLISH, BEARISH, or NEUTRAL)
5. Provide clear, actionable analysis

When analyzing a currency pair:
- Look for trend direction using price action and chart patterns
- Identify key support and resistance levels
- Note any significant chart patterns (head and shoulders, triangles, etc.)
- Consider the overall market sentiment
- Provide a confidence level (0-100) for your analysis

Always return your analysis in the following JSON format:
{
  "symbol": "EURUSD",
  "bias": "BULLISH" | "BEARISH" | "NEUTRAL",
  "confidence": 0-100,
  "key_levels": {
    "support": [1.0500, 1.0450],
    "resistance": [1.0600, 1.0650]
  },
  "reasoning": "Brief explanation of your analysis",
  "entry_signal": true | false,
  "recommended_action": "BUY" | "SELL" | "WAIT"
}

Use the browser tools available to you to navigate websites, take screenshots, and gather the information needed for your analysis."#;

const EXECUTOR_INSTRUCTIONS: &str = r#"You are a trade execution specialist responsible for browser automation on trading platforms.

Your responsibilities:
1. Connect to and control the browser
2. Navigate to specific pages on the broker platform
3. Take screenshots of charts and trading interfaces
4. Execute buy and sell orders when instructed
5. Verify trade confirmations

Safety protocols:
- Always verify the current page before executing trades
- Take a screenshot before and after every trade action
- Confirm the correct trading pair is selected
- Report any errors or unexpected states immediately

When executing trades:
1. Verify you're on the correct trading pair
2. Confirm the trade direction (BUY/SELL)
3. Check lot size and risk parameters
4. Execute the trade
5. Capture confirmation screenshot
6. Report execution status

Respond with execution status in JSON format:
{
  "action": "BUY" | "SELL" | "SCREENSHOT" | "NAVIGATE",
  "status": "SUCCESS" | "FAILED" | "PENDING",
  "details": "description of what happened",
  "screenshot_path": "path to screenshot if applicable",
  "error": "error message if failed"
}"#;

const ORCHESTRATOR_INSTRUCTIONS: &str = r#"You are the ForexAI Orchestrator, responsible for coordinating analysis tasks across specialized agents.

Your role is to:
1. Understand the user's request and determine which tools/agents to use
2. Delegate tasks to the appropriate specialized agents
3. Coordinate multiple analyses when needed
4. Gather and compile results from all agents

AVAILABLE TOOLS:
- Analyst Agent: Use for market analysis, chart reading, and technical analysis tasks

WORKFLOW:
1. Parse the user's request to understand what analysis is needed
2. Call the appropriate tool(s) to gather information
3. Compile the results and pass them to the synthesizer

Always be thorough in your analysis and use the available tools to gather comprehensive market data.
When in doubt, use the analyst tool to get more information about market conditions.

Return all gathered information in a structured format that can be synthesized into a final response."#;

const SYNTHESIZER_INSTRUCTIONS: &str = r#"You are the ForexAI Synthesizer, responsible for processing analysis results and generating clear, actionable responses.

Your role is to:
1. Take the raw output from the orchestrator and its tools
2. Extract the key insights and findings
3. Format the response in a clear, professional manner
4. Highlight actionable recommendations

OUTPUT FORMAT:
Structure your response as follows:

## Market Analysis Summary
[Brief overview of the analysis performed]

## Key Findings
- [Finding 1]
- [Finding 2]
- [etc.]

## Technical Levels
- **Support**: [levels]
- **Resistance**: [levels]

## Market Bias
[BULLISH/BEARISH/NEUTRAL] - Confidence: [X]%

## Recommendation
[Clear action recommendation: BUY/SELL/WAIT with reasoning]

## Risk Considerations
[Any important caveats or risks to consider]

GUIDELINES:
- Be concise but comprehensive
- Use clear, professional language
- Highlight the most important information
- Always include a clear recommendation
- Note any limitations or uncertainties in the analysis"#;

const CHART_SCRAPER_INSTRUCTIONS: &str = r#"Your goal is to capture a high-timeframe screenshot of the market chart.

1. Navigate to the broker URL provided: {{ broker_url }}
2. Wait for the chart to load completely.
3. Take a screenshot of the page.
4. Respond with the path or confirmation that the screenshot was taken.

Use the tools provided by the Playwright MCP server to achieve this."#;

const STRATEGY_ANALYST_INSTRUCTIONS: &str = r#"You are a Master Forex Strategist.

CONTEXT:
1. Strategy PDF Rules: {{ strategy_pdf_text }}
2. Morning Chart Screenshot: {{ morning_chart_image }} (Analyze the visual data from the chart)

TASK:
Analyze the chart based strictly on the PDF rules provided in the context.
- Determine Market Bias (BULLISH, BEARISH, or NEUTRAL).
- Identify 3 Key Support/Resistance levels from the chart.
- Summarize the reasoning behind your bias and levels."#;

const PLAN_WRITER_INSTRUCTIONS: &str = r#"You will receive a JSON object containing a trading plan (bias, levels, and reasoning).
Extract this data and call the save_daily_plan tool to persist it to the database.
Report the status of the save operation."#;

/// Built-in agent roster
pub fn default_agents() -> Vec<AgentConfig> {
    vec![
        AgentConfig::new("analyst", "gemini", "gemini-1.5-pro", ANALYST_INSTRUCTIONS)
            .with_tools(vec!["mcp__playwright_*".to_string()]),
        AgentConfig::new("executor", "gemini", "gemini-1.5-pro", EXECUTOR_INSTRUCTIONS)
            .with_tools(vec!["mcp__playwright_*".to_string()]),
        AgentConfig::new(
            "orchestrator",
            "gemini",
            "gemini-1.5-pro",
            ORCHESTRATOR_INSTRUCTIONS,
        )
        .with_tools(vec!["analyst_agent".to_string()]),
        AgentConfig::new(
            "synthesizer",
            "gemini",
            "gemini-1.5-pro",
            SYNTHESIZER_INSTRUCTIONS,
        ),
        AgentConfig::new(
            "chart-scraper",
            "gemini",
            "gemini-1.5-flash",
            CHART_SCRAPER_INSTRUCTIONS,
        )
        .with_tools(vec!["mcp__playwright_*".to_string()]),
        // High-context stage that must reason from the PDF text alone, so
        // session history is withheld
        AgentConfig::new(
            "strategy-analyst",
            "gemini",
            "gemini-1.5-pro",
            STRATEGY_ANALYST_INSTRUCTIONS,
        )
        .with_history(HistoryMode::None),
        AgentConfig::new(
            "plan-writer",
            "gemini",
            "gemini-1.5-flash",
            PLAN_WRITER_INSTRUCTIONS,
        )
        .with_tools(vec!["save_daily_plan".to_string()]),
    ]
}

/// Built-in pipeline roster
pub fn default_pipelines() -> Vec<PipelineConfig> {
    vec![
        PipelineConfig {
            name: "analyst".to_string(),
            description: "Market analysis with browser tools".to_string(),
            stages: vec![StageConfig::new("analyst", "analysis")
                .with_announce("Analyzing market conditions")],
            default_session: DEFAULT_CHAT_SESSION.to_string(),
        },
        PipelineConfig {
            name: "executor".to_string(),
            description: "Trade execution on the broker platform".to_string(),
            stages: vec![StageConfig::new("executor", "execution")
                .with_announce("Executing trade instructions")],
            default_session: DEFAULT_CHAT_SESSION.to_string(),
        },
        PipelineConfig {
            name: "chat".to_string(),
            description: "Orchestrated analysis with a synthesized summary".to_string(),
            stages: vec![
                StageConfig::new("orchestrator", "orchestrator_output")
                    .with_announce("Coordinating analysis"),
                StageConfig::new("synthesizer", "summary")
                    .with_announce("Synthesizing final response"),
            ],
            default_session: DEFAULT_CHAT_SESSION.to_string(),
        },
        PipelineConfig {
            name: "daily-planner".to_string(),
            description: "Strict linear sequence to establish daily trading bias".to_string(),
            stages: vec![
                StageConfig::new("chart-scraper", "chart_capture")
                    .with_announce("Capturing the morning chart"),
                StageConfig::new("strategy-analyst", "daily_plan")
                    .with_announce("Analyzing the chart against the strategy rules"),
                StageConfig::new("plan-writer", "save_report")
                    .with_announce("Persisting the daily plan"),
            ],
            default_session: DEFAULT_PLAN_SESSION.to_string(),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn planner_pipeline_is_three_linear_stages() {
        let pipelines = default_pipelines();
        let planner = pipelines.iter().find(|p| p.name == "daily-planner").unwrap();
        let agents: Vec<_> = planner.stages.iter().map(|s| s.agent.as_str()).collect();
        assert_eq!(agents, ["chart-scraper", "strategy-analyst", "plan-writer"]);
        assert_eq!(planner.default_session, "daily-plan-session");
    }

    #[test]
    fn strategy_analyst_runs_without_history() {
        let agents = default_agents();
        let analyst = agents.iter().find(|a| a.name == "strategy-analyst").unwrap();
        assert_eq!(analyst.include_history, HistoryMode::None);
    }

    #[test]
    fn every_pipeline_stage_names_a_known_agent() {
        let agents = default_agents();
        for pipeline in default_pipelines() {
            for stage in &pipeline.stages {
                assert!(
                    agents.iter().any(|a| a.name == stage.agent),
                    "unknown agent {} in pipeline {}",
                    stage.agent,
                    pipeline.name
                );
            }
        }
    }
}
