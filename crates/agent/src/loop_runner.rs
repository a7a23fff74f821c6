//! The search agent's reasoning loop.
//!
//! Each iteration asks the reasoning model for one step, executes the
//! requested tool (if any), folds the observation into the history and asks
//! the judge whether the question can now be answered:
//!
//! ```text
//! Planning ─▶ ToolExecuting ─▶ HistoryUpdate ─▶ SufficiencyCheck ─▶ Done
//!    ▲  │                          ▲                  │
//!    │  └──────── (message) ───────┘                  │
//!    └──────────────── (insufficient) ────────────────┘
//! ```
//!
//! Planning with no iterations left moves to `Exhausted`.

use chrono::Utc;
use hybridrag_core::error::Result;
use hybridrag_core::event::{DomainEvent, EventBus};
use hybridrag_core::message::{Conversation, MessageToolCall};
use hybridrag_core::provider::{Provider, ProviderRequest, ToolDefinition};
use hybridrag_core::scope::ScopeKey;
use hybridrag_core::tool::{ToolCall, ToolResult};
use hybridrag_tools::ToolDispatcher;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::history::ReasoningHistory;
use crate::judge::{SufficiencyJudge, SufficiencyVerdict};

pub const DEFAULT_REASONING_PROMPT: &str = include_str!("../prompts/reasoning_prompt.txt");

/// How the reasoning model is driven.
#[derive(Debug, Clone)]
pub struct ReasoningSettings {
    pub model: String,
    pub reasoning_effort: Option<String>,
    pub max_iterations: usize,
    pub truncate_chars: usize,
    pub system_prompt: String,
}

impl Default for ReasoningSettings {
    fn default() -> Self {
        Self {
            model: "o4-mini".into(),
            reasoning_effort: Some("medium".into()),
            max_iterations: 10,
            truncate_chars: 2000,
            system_prompt: DEFAULT_REASONING_PROMPT.to_string(),
        }
    }
}

/// What a step produced, waiting to be written to the history.
#[derive(Debug, Clone)]
pub enum Observation {
    Tool(ToolResult),
    Message(String),
}

#[derive(Debug, Clone)]
pub enum LoopState {
    Planning,
    ToolExecuting(ToolCall),
    HistoryUpdate(Observation),
    SufficiencyCheck,
    Done(String),
    Exhausted,
}

impl LoopState {
    pub fn name(&self) -> &'static str {
        match self {
            LoopState::Planning => "planning",
            LoopState::ToolExecuting(_) => "tool_executing",
            LoopState::HistoryUpdate(_) => "history_update",
            LoopState::SufficiencyCheck => "sufficiency_check",
            LoopState::Done(_) => "done",
            LoopState::Exhausted => "exhausted",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Answered,
    Exhausted,
}

/// Everything a finished run produced.
#[derive(Debug, Clone)]
pub struct AgentOutcome {
    pub status: RunStatus,
    pub answer: Option<String>,
    pub iterations: usize,
    pub history: Conversation,
    pub verdicts: Vec<SufficiencyVerdict>,
}

impl AgentOutcome {
    pub fn is_answered(&self) -> bool {
        self.status == RunStatus::Answered
    }
}

enum Step {
    Tool(ToolCall),
    Message(String),
}

fn to_tool_call(call: MessageToolCall) -> ToolCall {
    let arguments = if call.arguments.trim().is_empty() {
        serde_json::Value::Object(Default::default())
    } else {
        serde_json::from_str(&call.arguments).unwrap_or_else(|e| {
            warn!(tool = %call.name, error = %e, "Tool arguments are not valid JSON");
            serde_json::Value::Null
        })
    };
    ToolCall {
        id: call.id,
        name: call.name,
        arguments,
    }
}

/// One query's agent. Owns its history; shares everything else.
pub struct SearchAgent {
    query: String,
    scope: ScopeKey,
    provider: Arc<dyn Provider>,
    dispatcher: Arc<ToolDispatcher>,
    judge: SufficiencyJudge,
    event_bus: Arc<EventBus>,
    settings: ReasoningSettings,
}

impl SearchAgent {
    pub fn new(
        query: impl Into<String>,
        scope: ScopeKey,
        provider: Arc<dyn Provider>,
        dispatcher: Arc<ToolDispatcher>,
        judge: SufficiencyJudge,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            query: query.into(),
            scope,
            provider,
            dispatcher,
            judge,
            event_bus,
            settings: ReasoningSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: ReasoningSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn scope(&self) -> &ScopeKey {
        &self.scope
    }

    async fn plan(&self, history: &ReasoningHistory, tools: &[ToolDefinition]) -> Result<Step> {
        let mut request = ProviderRequest::new(self.settings.model.clone(), history.messages().to_vec())
            .with_tools(tools.to_vec());
        if let Some(effort) = &self.settings.reasoning_effort {
            request = request.with_reasoning_effort(effort.clone());
        }

        let response = self.provider.complete(request).await?;

        let mut calls = response.message.tool_calls.into_iter();
        match calls.next() {
            Some(first) => {
                let ignored = calls.count();
                if ignored > 0 {
                    warn!(tool = %first.name, ignored, "Model requested several tools, executing only the first");
                }
                Ok(Step::Tool(to_tool_call(first)))
            }
            None => Ok(Step::Message(response.message.content)),
        }
    }

    /// Run until the judge accepts an answer or the iteration limit is hit.
    ///
    /// Only a reasoning-model failure is an error; exhaustion is an outcome.
    pub async fn run(self) -> Result<AgentOutcome> {
        let mut history = ReasoningHistory::new(
            &self.settings.system_prompt,
            &self.query,
            self.settings.truncate_chars,
        );
        let conversation_id = history.conversation_id();
        let tools = self.dispatcher.definitions();
        let mut verdicts = Vec::new();
        let mut iteration = 0usize;
        let mut state = LoopState::Planning;

        info!(
            conversation_id = %conversation_id,
            scope = %self.scope,
            tools = tools.len(),
            max_iterations = self.settings.max_iterations,
            "Starting search run"
        );

        let answer = loop {
            let from = state.name();
            let next = match state {
                LoopState::Planning if iteration >= self.settings.max_iterations => LoopState::Exhausted,
                LoopState::Planning => {
                    iteration += 1;
                    let step = match self.plan(&history, &tools).await {
                        Ok(step) => step,
                        Err(e) => {
                            self.event_bus.publish(DomainEvent::ErrorOccurred {
                                context: format!("reasoning iteration {iteration}"),
                                error_message: e.to_string(),
                                timestamp: Utc::now(),
                            });
                            return Err(e);
                        }
                    };
                    let requested_tool = match &step {
                        Step::Tool(call) => Some(call.name.clone()),
                        Step::Message(_) => None,
                    };
                    self.event_bus.publish(DomainEvent::ReasoningStep {
                        conversation_id: conversation_id.clone(),
                        iteration,
                        requested_tool,
                        timestamp: Utc::now(),
                    });
                    match step {
                        Step::Tool(call) => LoopState::ToolExecuting(call),
                        Step::Message(text) => LoopState::HistoryUpdate(Observation::Message(text)),
                    }
                }
                LoopState::ToolExecuting(call) => {
                    let started = Instant::now();
                    let result = self.dispatcher.dispatch(&call, &self.scope).await;
                    self.event_bus.publish(DomainEvent::ToolExecuted {
                        tool_name: call.name.clone(),
                        success: result.success,
                        duration_ms: started.elapsed().as_millis() as u64,
                        timestamp: Utc::now(),
                    });
                    LoopState::HistoryUpdate(Observation::Tool(result))
                }
                LoopState::HistoryUpdate(observation) => {
                    match observation {
                        Observation::Tool(result) => history.push_tool_result(&result),
                        Observation::Message(text) => history.push_message(&text),
                    }
                    LoopState::SufficiencyCheck
                }
                LoopState::SufficiencyCheck => {
                    let verdict = self.judge.evaluate(&self.query, &history.transcript()).await;
                    self.event_bus.publish(DomainEvent::SufficiencyJudged {
                        conversation_id: conversation_id.clone(),
                        iteration,
                        sufficient: verdict.sufficient,
                        timestamp: Utc::now(),
                    });
                    let next = match verdict.answer() {
                        Some(answer) => LoopState::Done(answer.to_string()),
                        None => LoopState::Planning,
                    };
                    verdicts.push(verdict);
                    next
                }
                LoopState::Done(answer) => break Some(answer),
                LoopState::Exhausted => {
                    warn!(
                        conversation_id = %conversation_id,
                        iterations = iteration,
                        "Iteration limit reached without a sufficient answer"
                    );
                    break None;
                }
            };
            debug!(from, to = next.name(), iteration, "Loop transition");
            state = next;
        };

        let status = if answer.is_some() {
            RunStatus::Answered
        } else {
            RunStatus::Exhausted
        };
        self.event_bus.publish(DomainEvent::RunFinished {
            conversation_id: conversation_id.clone(),
            iterations: iteration,
            answered: answer.is_some(),
            timestamp: Utc::now(),
        });
        info!(conversation_id = %conversation_id, iterations = iteration, ?status, "Search run finished");

        Ok(AgentOutcome {
            status,
            answer,
            iterations: iteration,
            history: history.into_conversation(),
            verdicts,
        })
    }
}
