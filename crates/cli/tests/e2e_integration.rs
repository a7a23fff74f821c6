//! End-to-end tests for the hybridrag question-answering pipeline.
//!
//! These run the full path from a user question to a judged answer:
//! application wiring, reasoning, tool dispatch under the caller's scope,
//! context assembly and the sufficiency judge. Backends are in memory and
//! the model is scripted.

use std::sync::{Arc, Mutex};

use hybridrag_agent::{AppContext, RunStatus};
use hybridrag_config::AppConfig;
use hybridrag_context::{ContextBuilder, GlobalContextBuilder, estimate_tokens};
use hybridrag_core::error::ProviderError;
use hybridrag_core::message::{Message, MessageToolCall};
use hybridrag_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use hybridrag_core::record::CommunityReport;
use hybridrag_core::scope::ScopeKey;
use hybridrag_core::search::GlobalContextOptions;
use hybridrag_store::{InMemoryGraphStore, InMemoryRelationalStore};
use hybridrag_tools::ToolCatalog;
use serde_json::json;

// ── Mock Provider ────────────────────────────────────────────────────────

/// Routes each request to a script by its shape: JSON-mode requests go to
/// the judge, requests carrying tools go to the reasoner, the rest are
/// answer synthesis. The last entry of a script repeats.
struct RoutedProvider {
    reasoning: Mutex<Vec<ProviderResponse>>,
    judge: Mutex<Vec<ProviderResponse>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl RoutedProvider {
    fn new(reasoning: Vec<ProviderResponse>, judge: Vec<ProviderResponse>) -> Self {
        Self {
            reasoning: Mutex::new(reasoning),
            judge: Mutex::new(judge),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn count(&self, pred: impl Fn(&ProviderRequest) -> bool) -> usize {
        self.requests.lock().unwrap().iter().filter(|r| pred(r)).count()
    }
}

fn next(script: &Mutex<Vec<ProviderResponse>>) -> ProviderResponse {
    let mut script = script.lock().unwrap();
    if script.len() > 1 {
        script.remove(0)
    } else {
        script[0].clone()
    }
}

#[async_trait::async_trait]
impl Provider for RoutedProvider {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let response = if request.json_mode {
            next(&self.judge)
        } else if !request.tools.is_empty() {
            next(&self.reasoning)
        } else {
            text_response("Synthesized from context.")
        };
        self.requests.lock().unwrap().push(request);
        Ok(response)
    }
}

fn text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock-model".into(),
        metadata: serde_json::Map::new(),
    }
}

fn tool_response(name: &str, arguments: serde_json::Value) -> ProviderResponse {
    let mut response = text_response("");
    response.message.tool_calls = vec![MessageToolCall {
        id: format!("call_{name}"),
        name: name.into(),
        arguments: arguments.to_string(),
    }];
    response
}

fn verdict(sufficient: bool, answer: Option<&str>) -> ProviderResponse {
    text_response(
        &json!({
            "sufficient": sufficient,
            "reasoning": "checked",
            "final_answer": answer,
        })
        .to_string(),
    )
}

// ── Fixtures ─────────────────────────────────────────────────────────────

fn scope(email: &str) -> ScopeKey {
    ScopeKey::new(email).unwrap()
}

fn report(id: &str, title: &str, summary: &str, rank: f64) -> CommunityReport {
    CommunityReport {
        id: id.into(),
        title: title.into(),
        summary: summary.into(),
        full_content: summary.into(),
        rank,
        ..Default::default()
    }
}

async fn app(provider: Arc<RoutedProvider>) -> (AppContext, Arc<InMemoryGraphStore>) {
    let graph = Arc::new(InMemoryGraphStore::new());
    graph
        .add_report(&scope("alice@example.com"), report("1", "Acme board", "Dana chairs the Acme board", 8.0))
        .await;
    graph
        .add_report(&scope("bob@example.com"), report("2", "Globex board", "Hank chairs the Globex board", 9.0))
        .await;

    let relational = Arc::new(InMemoryRelationalStore::new());
    let rows = (1..=3)
        .map(|i| json!({"id": i, "total": i * 10}).as_object().cloned().unwrap())
        .collect();
    relational.add_table("orders", rows).await;

    let app = AppContext::from_parts(
        AppConfig::default(),
        provider,
        graph.clone(),
        relational,
        ToolCatalog::builtin(),
    )
    .unwrap();
    (app, graph)
}

// ── Agent runs ───────────────────────────────────────────────────────────

#[tokio::test]
async fn structured_question_answered_in_two_iterations() {
    let provider = Arc::new(RoutedProvider::new(
        vec![
            tool_response("get_all_tables", json!({})),
            tool_response("run_sql_query", json!({"query": "SELECT * FROM orders"})),
        ],
        vec![verdict(false, None), verdict(true, Some("There are 3 orders."))],
    ));
    let (app, _) = app(provider.clone()).await;

    let outcome = app.ask("How many orders are there?", scope("alice@example.com")).await.unwrap();

    assert_eq!(outcome.status, RunStatus::Answered);
    assert_eq!(outcome.iterations, 2);
    assert_eq!(outcome.answer.as_deref(), Some("There are 3 orders."));

    let messages = &outcome.history.messages;
    assert_eq!(messages[2].content, r#"Tool result: ["orders"]"#);
    assert!(messages[3].content.starts_with("Tool result: ["));
    assert!(messages[3].content.contains("\"total\":30"));

    assert_eq!(provider.count(|r| !r.tools.is_empty()), 2);
    assert_eq!(provider.count(|r| r.json_mode), 2);
}

#[tokio::test]
async fn never_sufficient_exhausts_at_default_limit() {
    let provider = Arc::new(RoutedProvider::new(
        vec![tool_response("get_all_tables", json!({}))],
        vec![verdict(false, None)],
    ));
    let (app, _) = app(provider.clone()).await;

    let outcome = app.ask("What is the meaning of life?", scope("alice@example.com")).await.unwrap();

    assert_eq!(outcome.status, RunStatus::Exhausted);
    assert!(outcome.answer.is_none());
    assert_eq!(outcome.iterations, 10);
    assert_eq!(outcome.verdicts.len(), 10);
    assert_eq!(provider.count(|r| !r.tools.is_empty()), 10);
}

#[tokio::test]
async fn concurrent_callers_only_see_their_own_graph() {
    let provider = Arc::new(RoutedProvider::new(
        vec![tool_response("global_search", json!({"query": "board", "response_type": "list"}))],
        vec![verdict(true, Some("The board is chaired."))],
    ));
    let (app, graph) = app(provider.clone()).await;

    let (alice, bob) = futures::join!(
        app.ask("Who chairs the board?", scope("alice@example.com")),
        app.ask("Who chairs the board?", scope("bob@example.com")),
    );
    let alice = alice.unwrap();
    let bob = bob.unwrap();

    let alice_seen = &alice.history.messages[2].content;
    assert!(alice_seen.contains("Acme board"));
    assert!(!alice_seen.contains("Globex"));

    let bob_seen = &bob.history.messages[2].content;
    assert!(bob_seen.contains("Globex board"));
    assert!(!bob_seen.contains("Acme"));

    assert!(alice.is_answered() && bob.is_answered());
    assert!(graph.query_count() >= 2);
}

#[tokio::test]
async fn cypher_tool_binds_caller_email() {
    let provider = Arc::new(RoutedProvider::new(
        vec![tool_response(
            "run_cypher_query",
            json!({"query": "MATCH (d:Document {userEmail: $user_email}) RETURN d.title"}),
        )],
        vec![verdict(true, Some("done"))],
    ));
    let (app, graph) = app(provider).await;

    app.ask("List my documents", scope("bob@example.com")).await.unwrap();

    let (statement, params) = graph.last_query().await.unwrap();
    assert!(statement.contains("$user_email"));
    assert_eq!(params["user_email"], "bob@example.com");
}

// ── Context assembly ─────────────────────────────────────────────────────

#[tokio::test]
async fn global_context_respects_token_ceiling() {
    let graph = Arc::new(InMemoryGraphStore::new());
    let caller = scope("alice@example.com");
    for i in 0..40 {
        graph
            .add_report(
                &caller,
                report(
                    &i.to_string(),
                    &format!("Quarterly report {i}"),
                    "Revenue grew in every region while costs stayed flat across the quarter",
                    f64::from(i),
                ),
            )
            .await;
    }

    let options = GlobalContextOptions {
        max_context_tokens: 200,
        ..Default::default()
    };
    let builder = GlobalContextBuilder::new(graph);
    let result = builder
        .build_context("revenue", None, &options, Some(&caller))
        .await
        .unwrap();

    assert!(result.context_chunks.len() > 1);
    for chunk in &result.context_chunks {
        assert!(estimate_tokens(chunk) <= 200, "batch over budget: {}", estimate_tokens(chunk));
    }
    assert!(result.context_chunks[0].starts_with("-----Reports-----\n"));
    assert_eq!(result.context_records["reports"].len(), 40);
}
