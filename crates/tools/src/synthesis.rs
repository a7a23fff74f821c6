//! Answer synthesis from a packed context.
//!
//! A single batch is answered directly. Several batches go through a
//! map-reduce: each batch is mapped to scored key points by its own
//! completion, then the best points are reduced into one answer. Every
//! prompt, data plus instructions plus the query, stays within the token
//! ceiling the context was packed for; callers pack with
//! [`AnswerSynthesizer::data_budget`] to leave room for the instructions.

use hybridrag_context::{ContextResult, HeuristicCounter, TokenCounter};
use hybridrag_core::error::Result;
use hybridrag_core::message::Message;
use hybridrag_core::provider::{Provider, ProviderRequest};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Returned when no batch produced a usable key point.
pub const NO_DATA_ANSWER: &str = "I am sorry but I am unable to answer this question given the provided data.";

const ANSWER_PROMPT: &str = "You are a helpful assistant answering questions about the data in the tables below.\n\
Answer using only the information in the data tables. If the tables do not contain the answer, say so; do not make anything up.\n\
Target response length and format: {response_type}\n\n\
---Data tables---\n\n{context_data}";

const MAP_PROMPT: &str = "You are a helpful assistant extracting key points from the data tables below that answer the user's question.\n\
Use only the data tables. Give each point an importance score from 0 to 100; score 0 when the tables do not help.\n\
Respond only with JSON: {\"points\": [{\"description\": \"...\", \"score\": 0}]}\n\n\
---Data tables---\n\n{context_data}";

const REDUCE_PROMPT: &str = "You are a helpful assistant combining reports from several analysts who each studied part of a dataset.\n\
Reports are ranked by importance, highest first. Merge them into one answer to the user's question and drop anything irrelevant.\n\
Do not add information the reports do not contain.\n\
Target response length and format: {response_type}\n\n\
---Analyst Reports---\n\n{report_data}";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct KeyPoint {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub score: f64,
}

#[derive(Deserialize)]
struct MapReply {
    #[serde(default)]
    points: Vec<KeyPoint>,
}

/// Key points from one map reply. Replies that are not a points object
/// yield nothing.
pub fn parse_key_points(text: &str) -> Vec<KeyPoint> {
    let trimmed = text.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .unwrap_or(trimmed);

    match serde_json::from_str::<MapReply>(body.trim()) {
        Ok(reply) => reply.points,
        Err(e) => {
            warn!(error = %e, "Map reply was not a key point list");
            Vec::new()
        }
    }
}

fn answer_prompt(response_type: &str, data: &str) -> String {
    ANSWER_PROMPT
        .replace("{response_type}", response_type)
        .replace("{context_data}", data)
}

fn map_prompt(data: &str) -> String {
    MAP_PROMPT.replace("{context_data}", data)
}

fn reduce_prompt(response_type: &str, data: &str) -> String {
    REDUCE_PROMPT
        .replace("{response_type}", response_type)
        .replace("{report_data}", data)
}

/// Answers a query from an assembled context.
#[derive(Clone)]
pub struct AnswerSynthesizer {
    provider: Arc<dyn Provider>,
    model: String,
    counter: Arc<dyn TokenCounter>,
}

impl AnswerSynthesizer {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            counter: Arc::new(HeuristicCounter),
        }
    }

    pub fn with_counter(mut self, counter: Arc<dyn TokenCounter>) -> Self {
        self.counter = counter;
        self
    }

    /// Tokens every request spends outside the data section.
    pub fn prompt_overhead(&self, query: &str, response_type: &str) -> usize {
        let instructions = [
            answer_prompt(response_type, ""),
            map_prompt(""),
            reduce_prompt(response_type, ""),
        ]
        .iter()
        .map(|p| self.counter.count(p))
        .max()
        .unwrap_or(0);
        instructions + self.counter.count(query)
    }

    /// The data budget left under `max_tokens` once the prompt is added.
    pub fn data_budget(&self, query: &str, response_type: &str, max_tokens: usize) -> usize {
        max_tokens.saturating_sub(self.prompt_overhead(query, response_type))
    }

    async fn complete(&self, system: String, query: &str) -> Result<String> {
        let request = ProviderRequest::new(
            self.model.clone(),
            vec![Message::system(system), Message::user(query)],
        )
        .with_temperature(0.0);
        let response = self.provider.complete(request).await?;
        Ok(response.message.content)
    }

    /// Answer `query` from `context`, keeping every request within
    /// `max_tokens`.
    pub async fn answer(
        &self,
        query: &str,
        response_type: &str,
        context: &ContextResult,
        max_tokens: usize,
    ) -> Result<String> {
        match context.context_chunks.as_slice() {
            [] => Ok(NO_DATA_ANSWER.to_string()),
            [only] => self.complete(answer_prompt(response_type, only), query).await,
            batches => self.map_reduce(query, response_type, batches, max_tokens).await,
        }
    }

    async fn map_reduce(
        &self,
        query: &str,
        response_type: &str,
        batches: &[String],
        max_tokens: usize,
    ) -> Result<String> {
        let mut points = Vec::new();
        for (index, batch) in batches.iter().enumerate() {
            match self.complete(map_prompt(batch), query).await {
                Ok(reply) => points.extend(parse_key_points(&reply)),
                Err(e) => warn!(batch = index, error = %e, "Map completion failed, batch skipped"),
            }
        }

        let Some(report_data) = self.reduce_data(points, self.data_budget(query, response_type, max_tokens)) else {
            info!(batches = batches.len(), "No key points survived the map step");
            return Ok(NO_DATA_ANSWER.to_string());
        };
        self.complete(reduce_prompt(response_type, &report_data), query).await
    }

    /// Best-scored points, highest first, while they fit in `budget`.
    fn reduce_data(&self, mut points: Vec<KeyPoint>, budget: usize) -> Option<String> {
        points.retain(|p| p.score > 0.0 && !p.description.trim().is_empty());
        points.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

        let mut data = String::new();
        let mut tokens = 0;
        let mut kept = 0;
        for (i, point) in points.iter().enumerate() {
            let entry = format!(
                "----Analyst {}----\nImportance Score: {}\n{}\n\n",
                i + 1,
                point.score,
                point.description.trim()
            );
            let cost = self.counter.count(&entry);
            if tokens + cost > budget {
                break;
            }
            tokens += cost;
            kept += 1;
            data.push_str(&entry);
        }

        debug!(points = points.len(), kept, tokens, budget, "Reduce data assembled");
        (kept > 0).then_some(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use hybridrag_context::estimate_tokens;
    use hybridrag_core::error::ProviderError;
    use hybridrag_core::provider::ProviderResponse;
    use std::sync::Mutex;

    /// Map requests get `map_reply`; anything else gets "final answer".
    struct AnalystModel {
        map_reply: String,
        requests: Mutex<Vec<ProviderRequest>>,
    }

    impl AnalystModel {
        fn new(map_reply: &str) -> Arc<Self> {
            Arc::new(Self {
                map_reply: map_reply.into(),
                requests: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Provider for AnalystModel {
        fn name(&self) -> &str {
            "analyst"
        }

        async fn complete(&self, request: ProviderRequest) -> std::result::Result<ProviderResponse, ProviderError> {
            let is_map = request.messages[0].content.contains("extracting key points");
            self.requests.lock().unwrap().push(request.clone());
            let text = if is_map { self.map_reply.clone() } else { "final answer".to_string() };
            Ok(ProviderResponse {
                message: Message::assistant(text),
                usage: None,
                model: request.model,
                metadata: Default::default(),
            })
        }
    }

    fn context(batches: &[&str]) -> ContextResult {
        ContextResult {
            context_chunks: batches.iter().map(|b| b.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn key_points_parsed_with_or_without_fences() {
        let points = parse_key_points(r#"{"points": [{"description": "Acme grew", "score": 80}]}"#);
        assert_eq!(points, vec![KeyPoint { description: "Acme grew".into(), score: 80.0 }]);
        let fenced = parse_key_points("```json\n{\"points\": []}\n```");
        assert!(fenced.is_empty());
        assert!(parse_key_points("no idea").is_empty());
    }

    #[tokio::test]
    async fn single_batch_answers_directly() {
        let model = AnalystModel::new("unused");
        let synth = AnswerSynthesizer::new(model.clone(), "gpt-4o-mini");
        let answer = synth.answer("q", "list", &context(&["id|text\n1|x\n"]), 8000).await.unwrap();
        assert_eq!(answer, "final answer");

        let requests = model.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].messages[0].content.contains("1|x"));
        assert_eq!(requests[0].temperature, Some(0.0));
    }

    #[tokio::test]
    async fn several_batches_map_then_reduce() {
        let model = AnalystModel::new(r#"{"points": [{"description": "Acme grew 10%", "score": 70}]}"#);
        let synth = AnswerSynthesizer::new(model.clone(), "gpt-4o-mini");
        let answer = synth
            .answer("how did acme do", "list", &context(&["batch one", "batch two", "batch three"]), 8000)
            .await
            .unwrap();
        assert_eq!(answer, "final answer");

        let requests = model.requests.lock().unwrap();
        assert_eq!(requests.len(), 4);
        let reduce = &requests[3].messages[0].content;
        assert!(reduce.contains("----Analyst 1----\nImportance Score: 70\nAcme grew 10%"));
        assert!(reduce.contains("----Analyst 3----"));
    }

    #[tokio::test]
    async fn zero_scored_points_give_no_data_answer() {
        let model = AnalystModel::new(r#"{"points": [{"description": "nothing here", "score": 0}]}"#);
        let synth = AnswerSynthesizer::new(model.clone(), "gpt-4o-mini");
        let answer = synth.answer("q", "list", &context(&["a", "b"]), 8000).await.unwrap();
        assert_eq!(answer, NO_DATA_ANSWER);
        assert_eq!(model.requests.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn reduce_keeps_best_points_within_ceiling() {
        let long = "x".repeat(400);
        let reply = format!(
            r#"{{"points": [{{"description": "{long}", "score": 10}}, {{"description": "best", "score": 90}}]}}"#
        );
        let model = AnalystModel::new(&reply);
        let synth = AnswerSynthesizer::new(model.clone(), "gpt-4o-mini");
        let ceiling = synth.prompt_overhead("q", "list") + 60;

        synth.answer("q", "list", &context(&["a", "b"]), ceiling).await.unwrap();

        let requests = model.requests.lock().unwrap();
        let reduce = &requests[2];
        assert!(reduce.messages[0].content.contains("Importance Score: 90\nbest"));
        assert!(!reduce.messages[0].content.contains(&long));
        let tokens: usize = reduce.messages.iter().map(|m| estimate_tokens(&m.content)).sum();
        assert!(tokens <= ceiling);
    }
}
