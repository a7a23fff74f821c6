//! `hybridrag query` runs one agent query for one caller.

use hybridrag_agent::{AgentOutcome, AppContext};
use hybridrag_config::AppConfig;
use hybridrag_core::scope::ScopeKey;

/// Exit code when the iteration limit is reached without an answer.
pub const EXIT_EXHAUSTED: i32 = 2;

pub async fn run(user: &str, question: &str, json: bool) -> Result<i32, Box<dyn std::error::Error>> {
    let scope = ScopeKey::new(user).map_err(|e| format!("Invalid --user: {e}"))?;
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    let app = AppContext::initialize(config).await?;
    let result = app.ask(question, scope).await;
    app.shutdown().await;
    let outcome = result?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary(&outcome))?);
    } else if let Some(answer) = &outcome.answer {
        println!("{answer}");
    } else {
        eprintln!(
            "  No sufficient answer after {} iterations. Try rephrasing the question.",
            outcome.iterations
        );
    }

    Ok(exit_code(&outcome))
}

pub fn exit_code(outcome: &AgentOutcome) -> i32 {
    if outcome.is_answered() { 0 } else { EXIT_EXHAUSTED }
}

fn summary(outcome: &AgentOutcome) -> serde_json::Value {
    serde_json::json!({
        "status": outcome.status,
        "answer": outcome.answer,
        "iterations": outcome.iterations,
        "verdicts": outcome.verdicts,
    })
}
