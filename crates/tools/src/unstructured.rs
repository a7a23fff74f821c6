//! Graph-backed retrieval: global and local search, raw Cypher, top documents.
//!
//! The search tools assemble a scoped context and, when a synthesizer is
//! configured, answer from it. With a synthesizer the context is packed into
//! what the prompt leaves of `max_context_tokens`, so each synthesis request
//! stays under that ceiling. The result is always an envelope
//! `{"response", "context_data", "success"}`.

use crate::synthesis::AnswerSynthesizer;
use hybridrag_context::{
    ContextBuilder, ContextResult, GlobalContextBuilder, LocalContextBuilder,
};
use hybridrag_core::error::Result;
use hybridrag_core::scope::ScopeKey;
use hybridrag_core::search::{GlobalContextOptions, LocalContextOptions};
use hybridrag_core::store::GraphStore;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{debug, info};

/// Retrieval over the document graph for one deployment.
pub struct UnstructuredService {
    store: Arc<dyn GraphStore>,
    global: GlobalContextBuilder,
    local: LocalContextBuilder,
    global_options: GlobalContextOptions,
    local_options: LocalContextOptions,
    synthesizer: Option<AnswerSynthesizer>,
}

impl UnstructuredService {
    pub fn new(
        store: Arc<dyn GraphStore>,
        local: LocalContextBuilder,
        global_options: GlobalContextOptions,
        local_options: LocalContextOptions,
    ) -> Self {
        Self {
            global: GlobalContextBuilder::new(store.clone()),
            store,
            local,
            global_options,
            local_options,
            synthesizer: None,
        }
    }

    pub fn with_synthesizer(mut self, synthesizer: AnswerSynthesizer) -> Self {
        self.synthesizer = Some(synthesizer);
        self
    }

    pub fn store(&self) -> &Arc<dyn GraphStore> {
        &self.store
    }

    /// Data budget for a context that will be synthesized under `ceiling`.
    fn packing_budget(&self, query: &str, response_type: &str, ceiling: usize) -> usize {
        match &self.synthesizer {
            Some(synth) => synth.data_budget(query, response_type, ceiling),
            None => ceiling,
        }
    }

    async fn respond(
        &self,
        query: &str,
        response_type: &str,
        context: ContextResult,
        ceiling: usize,
    ) -> Result<Value> {
        let response = match (&self.synthesizer, context.is_empty()) {
            (Some(synth), false) => synth.answer(query, response_type, &context, ceiling).await?,
            _ => String::new(),
        };
        Ok(json!({
            "response": response,
            "context_data": serde_json::to_value(&context.context_records)?,
            "success": true,
        }))
    }

    /// Answer from community reports visible to `scope`.
    pub async fn global_search(&self, query: &str, response_type: &str, scope: &ScopeKey) -> Result<Value> {
        let ceiling = self.global_options.max_context_tokens;
        let options = GlobalContextOptions {
            max_context_tokens: self.packing_budget(query, response_type, ceiling),
            ..self.global_options.clone()
        };
        let context = self
            .global
            .build_context(query, None, &options, Some(scope))
            .await?;
        info!(scope = %scope, batches = context.context_chunks.len(), "Global search context ready");
        self.respond(query, response_type, context, ceiling).await
    }

    /// Answer from the chunks most similar to `query`, optionally within one
    /// document type.
    pub async fn local_search(
        &self,
        query: &str,
        response_type: &str,
        document_type: Option<&str>,
        scope: &ScopeKey,
    ) -> Result<Value> {
        let ceiling = self.local_options.max_context_tokens;
        let options = LocalContextOptions {
            max_context_tokens: self.packing_budget(query, response_type, ceiling),
            ..self.local_options.clone()
        };
        let context = self
            .local
            .build_context_for_type(query, None, &options, document_type, Some(scope))
            .await?;
        info!(scope = %scope, batches = context.context_chunks.len(), "Local search context ready");
        self.respond(query, response_type, context, ceiling).await
    }

    /// Run `statement` with `$user_email` bound to the caller.
    pub async fn run_cypher_query(&self, statement: &str, scope: &ScopeKey) -> Result<Value> {
        let rows = self
            .store
            .run_query(statement, json!({ "user_email": scope.as_str() }))
            .await?;
        debug!(scope = %scope, rows = rows.len(), "Cypher query returned");
        Ok(Value::Array(rows.into_iter().map(Value::Object).collect()))
    }

    /// `[{"title", "score"}]` for the `k` most relevant documents.
    pub async fn top_k_documents(
        &self,
        query: &str,
        k: usize,
        document_type: Option<&str>,
        scope: &ScopeKey,
    ) -> Result<Value> {
        let ranked = self
            .local
            .top_k_documents(query, k, document_type, self.local_options.min_relevance, Some(scope))
            .await?;
        Ok(Value::Array(
            ranked
                .into_iter()
                .map(|(title, score)| json!({ "title": title, "score": score }))
                .collect(),
        ))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use hybridrag_context::{EmbeddingScorer, estimate_tokens};
    use hybridrag_core::error::ProviderError;
    use hybridrag_core::message::Message;
    use hybridrag_core::provider::{
        EmbeddingRequest, EmbeddingResponse, Provider, ProviderRequest, ProviderResponse,
    };
    use hybridrag_core::record::{Chunk, CommunityReport};
    use hybridrag_store::InMemoryGraphStore;
    use std::sync::Mutex;

    /// Embeds everything as `[1, 0]`. Map requests get one key point, any
    /// other completion a fixed string.
    #[derive(Default)]
    pub(crate) struct StubModel {
        pub requests: Mutex<Vec<ProviderRequest>>,
    }

    #[async_trait]
    impl Provider for StubModel {
        fn name(&self) -> &str {
            "stub"
        }

        async fn complete(&self, request: ProviderRequest) -> std::result::Result<ProviderResponse, ProviderError> {
            let text = if request.messages[0].content.contains("extracting key points") {
                r#"{"points": [{"description": "Acme is growing", "score": 50}]}"#
            } else {
                "synthesized answer"
            };
            self.requests.lock().unwrap().push(request.clone());
            Ok(ProviderResponse {
                message: Message::assistant(text),
                usage: None,
                model: request.model,
                metadata: Default::default(),
            })
        }

        async fn embed(&self, request: EmbeddingRequest) -> std::result::Result<EmbeddingResponse, ProviderError> {
            Ok(EmbeddingResponse {
                embeddings: request.inputs.iter().map(|_| vec![1.0, 0.0]).collect(),
                model: request.model,
                usage: None,
            })
        }
    }

    pub(crate) async fn seeded_graph() -> Arc<InMemoryGraphStore> {
        let store = Arc::new(InMemoryGraphStore::new());
        let alice = ScopeKey::new("alice@example.com").unwrap();
        store
            .add_report(
                &alice,
                CommunityReport {
                    id: "7".into(),
                    title: "Acme board".into(),
                    summary: "The Acme board has five members".into(),
                    full_content: "The Acme board has five members chaired by Dana".into(),
                    entity_names: vec!["Acme".into(), "Dana".into()],
                    ..Default::default()
                },
            )
            .await;
        store
            .add_chunk(
                &alice,
                Chunk {
                    id: "c1".into(),
                    text: "Dana chairs the Acme board".into(),
                    document_titles: vec!["Minutes".into()],
                    embedding: vec![1.0, 0.0],
                    ..Default::default()
                },
                Some("pdf"),
            )
            .await;
        store
    }

    pub(crate) fn service(store: Arc<InMemoryGraphStore>, model: Arc<StubModel>) -> UnstructuredService {
        let embedder: Arc<dyn Provider> = model;
        let local = LocalContextBuilder::new(store.clone(), EmbeddingScorer::new(embedder, "embed"));
        UnstructuredService::new(
            store,
            local,
            GlobalContextOptions::default(),
            LocalContextOptions::default(),
        )
    }

    fn alice() -> ScopeKey {
        ScopeKey::new("alice@example.com").unwrap()
    }

    #[tokio::test]
    async fn global_search_returns_context_without_synthesis() {
        let svc = service(seeded_graph().await, Arc::new(StubModel::default()));
        let result = svc.global_search("acme board", "single paragraph", &alice()).await.unwrap();
        assert_eq!(result["success"], true);
        assert_eq!(result["response"], "");
        assert_eq!(result["context_data"]["reports"][0]["id"], "7");
    }

    #[tokio::test]
    async fn synthesis_uses_context_and_response_type() {
        let model = Arc::new(StubModel::default());
        let synth = AnswerSynthesizer::new(model.clone(), "gpt-4o-mini");
        let svc = service(seeded_graph().await, model.clone()).with_synthesizer(synth);

        let result = svc.local_search("who chairs", "single paragraph", None, &alice()).await.unwrap();
        assert_eq!(result["response"], "synthesized answer");
        assert_eq!(result["context_data"]["chunks"][0]["id"], "c1");

        let requests = model.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        let system = &requests[0].messages[0].content;
        assert!(system.contains("single paragraph"));
        assert!(system.contains("Dana chairs the Acme board"));
    }

    #[tokio::test]
    async fn empty_context_skips_synthesis() {
        let model = Arc::new(StubModel::default());
        let synth = AnswerSynthesizer::new(model.clone(), "gpt-4o-mini");
        let svc = service(seeded_graph().await, model.clone()).with_synthesizer(synth);

        let bob = ScopeKey::new("bob@example.com").unwrap();
        let result = svc.global_search("acme", "single paragraph", &bob).await.unwrap();
        assert_eq!(result["response"], "");
        assert!(model.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn every_synthesis_request_fits_the_ceiling() {
        let store = Arc::new(InMemoryGraphStore::new());
        for i in 0..40 {
            store
                .add_report(
                    &alice(),
                    CommunityReport {
                        id: i.to_string(),
                        title: format!("Acme report {i}"),
                        summary: "Acme revenue grew in every region".into(),
                        full_content: "Acme revenue grew in every region while costs stayed flat across the quarter".into(),
                        rank: f64::from(i),
                        ..Default::default()
                    },
                )
                .await;
        }
        let model = Arc::new(StubModel::default());
        let embedder: Arc<dyn Provider> = model.clone();
        let local = LocalContextBuilder::new(store.clone(), EmbeddingScorer::new(embedder, "embed"));
        let options = GlobalContextOptions {
            max_context_tokens: 500,
            ..Default::default()
        };
        let svc = UnstructuredService::new(store, local, options, LocalContextOptions::default())
            .with_synthesizer(AnswerSynthesizer::new(model.clone(), "gpt-4o-mini"));

        let result = svc.global_search("acme", "multiple paragraphs", &alice()).await.unwrap();
        assert_eq!(result["response"], "synthesized answer");
        assert_eq!(result["context_data"]["reports"].as_array().unwrap().len(), 40);

        let requests = model.requests.lock().unwrap();
        assert!(requests.len() > 2, "expected map and reduce, got {}", requests.len());
        for request in requests.iter() {
            let tokens: usize = request.messages.iter().map(|m| estimate_tokens(&m.content)).sum();
            assert!(tokens <= 500, "synthesis prompt over ceiling: {tokens}");
        }
        let reduce = &requests.last().unwrap().messages[0].content;
        assert!(reduce.contains("---Analyst Reports---"));
    }

    #[tokio::test]
    async fn local_search_document_type_filter() {
        let svc = service(seeded_graph().await, Arc::new(StubModel::default()));
        let result = svc.local_search("board", "list", Some("email"), &alice()).await.unwrap();
        assert_eq!(result["context_data"], json!({}));
    }

    #[tokio::test]
    async fn cypher_binds_caller_email() {
        let store = seeded_graph().await;
        let svc = service(store.clone(), Arc::new(StubModel::default()));
        svc.run_cypher_query("MATCH (d:__Document__ {userEmail: $user_email}) RETURN d.title", &alice())
            .await
            .unwrap();
        let (_, params) = store.last_query().await.unwrap();
        assert_eq!(params, json!({"user_email": "alice@example.com"}));
    }

    #[tokio::test]
    async fn top_documents_listed() {
        let svc = service(seeded_graph().await, Arc::new(StubModel::default()));
        let top = svc.top_k_documents("board", 3, None, &alice()).await.unwrap();
        assert_eq!(top, json!([{"title": "Minutes", "score": 1.0}]));
    }
}
