//! Process-wide services, built once at startup and shared by every query.

use hybridrag_config::AppConfig;
use hybridrag_context::{EmbeddingScorer, LocalContextBuilder};
use hybridrag_core::error::{Error, Result, StoreError};
use hybridrag_core::event::EventBus;
use hybridrag_core::provider::Provider;
use hybridrag_core::scope::ScopeKey;
use hybridrag_core::store::{GraphStore, HealthReport, RelationalStore};
use hybridrag_store::{Neo4jHttpStore, PgRelationalStore};
use hybridrag_tools::{
    AnswerSynthesizer, StructuredService, ToolCatalog, ToolDispatcher, UnstructuredService,
};
use std::sync::Arc;
use tracing::{info, warn};

use crate::judge::SufficiencyJudge;
use crate::loop_runner::{AgentOutcome, DEFAULT_REASONING_PROMPT, ReasoningSettings, SearchAgent};

pub struct AppContext {
    config: AppConfig,
    provider: Arc<dyn Provider>,
    graph: Arc<dyn GraphStore>,
    relational: Arc<dyn RelationalStore>,
    dispatcher: Arc<ToolDispatcher>,
    event_bus: Arc<EventBus>,
    settings: ReasoningSettings,
}

fn config_error(e: impl std::fmt::Display) -> Error {
    Error::Config {
        message: e.to_string(),
    }
}

/// The tool catalog named by the config, or the built-in one.
pub fn load_catalog(config: &AppConfig) -> ToolCatalog {
    match &config.agent.tools_dir {
        Some(dir) => ToolCatalog::load_dir(dir),
        None => ToolCatalog::builtin(),
    }
}

impl AppContext {
    /// Connect every backend. Missing secrets and an unreachable relational
    /// store are fatal; graph schema setup failures only warn.
    pub async fn initialize(config: AppConfig) -> Result<Self> {
        config.require_secrets().map_err(config_error)?;

        let provider = hybridrag_providers::build_from_config(&config.provider)?;

        let relational = PgRelationalStore::connect(&config.relational).await?;
        let health = relational.health_check().await;
        if !health.connected {
            return Err(StoreError::unavailable(health.backend, health.detail).into());
        }

        let graph = Neo4jHttpStore::from_config(&config.graph)?;
        if let Err(e) = graph.initialize_schema().await {
            warn!(error = %e, "Graph schema initialization failed, continuing");
        }

        let catalog = load_catalog(&config);
        if catalog.is_empty() {
            warn!("No tools loaded; the agent can only answer from the model");
        }

        let context = Self::from_parts(config, provider, Arc::new(graph), Arc::new(relational), catalog)?;
        info!(tools = context.dispatcher.catalog().len(), "Application context ready");
        Ok(context)
    }

    /// Assemble a context from already-built services.
    pub fn from_parts(
        config: AppConfig,
        provider: Arc<dyn Provider>,
        graph: Arc<dyn GraphStore>,
        relational: Arc<dyn RelationalStore>,
        catalog: ToolCatalog,
    ) -> Result<Self> {
        let system_prompt = match &config.agent.system_prompt_path {
            Some(path) => std::fs::read_to_string(path).map_err(|e| {
                config_error(format!("cannot read system prompt {}: {e}", path.display()))
            })?,
            None => DEFAULT_REASONING_PROMPT.to_string(),
        };

        let scorer = EmbeddingScorer::new(provider.clone(), config.provider.embedding_model.clone());
        let mut unstructured = UnstructuredService::new(
            graph.clone(),
            LocalContextBuilder::new(graph.clone(), scorer),
            config.global_search.clone(),
            config.local_search.clone(),
        );
        if config.provider.synthesize_answers {
            unstructured = unstructured.with_synthesizer(AnswerSynthesizer::new(
                provider.clone(),
                config.provider.judge_model.clone(),
            ));
        }

        let dispatcher = ToolDispatcher::new(catalog, StructuredService::new(relational.clone()), unstructured);

        let settings = ReasoningSettings {
            model: config.provider.reasoning_model.clone(),
            reasoning_effort: Some(config.provider.reasoning_effort.clone())
                .filter(|effort| !effort.is_empty()),
            max_iterations: config.agent.max_iterations,
            truncate_chars: config.agent.truncate_chars,
            system_prompt,
        };

        Ok(Self {
            config,
            provider,
            graph,
            relational,
            dispatcher: Arc::new(dispatcher),
            event_bus: Arc::new(EventBus::default()),
            settings,
        })
    }

    /// A fresh agent for one query. Nothing from earlier runs carries over.
    pub fn agent(&self, query: &str, scope: ScopeKey) -> SearchAgent {
        SearchAgent::new(
            query,
            scope,
            self.provider.clone(),
            self.dispatcher.clone(),
            SufficiencyJudge::new(self.provider.clone(), self.config.provider.judge_model.clone()),
            self.event_bus.clone(),
        )
        .with_settings(self.settings.clone())
    }

    pub async fn ask(&self, query: &str, scope: ScopeKey) -> Result<AgentOutcome> {
        self.agent(query, scope).run().await
    }

    pub async fn health(&self) -> Vec<HealthReport> {
        vec![self.graph.health_check().await, self.relational.health_check().await]
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &Arc<ToolDispatcher> {
        &self.dispatcher
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    pub fn graph(&self) -> &Arc<dyn GraphStore> {
        &self.graph
    }

    pub async fn shutdown(&self) {
        self.relational.close().await;
        info!("Application context shut down");
    }
}
