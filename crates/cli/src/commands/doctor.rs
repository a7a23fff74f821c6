//! `hybridrag doctor` and `hybridrag init-schema`.

use hybridrag_config::AppConfig;
use hybridrag_core::store::{GraphStore, RelationalStore};
use hybridrag_store::{Neo4jHttpStore, PgRelationalStore};

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    println!("hybridrag doctor");
    println!("================\n");

    let mut issues = 0;

    let config = match AppConfig::load() {
        Ok(config) => {
            println!("  [ok]   Config valid");
            config
        }
        Err(e) => {
            println!("  [fail] Config invalid: {e}");
            return Err(e.into());
        }
    };

    match config.require_secrets() {
        Ok(()) => println!("  [ok]   All secrets set"),
        Err(e) => {
            println!("  [fail] {e}");
            issues += 1;
        }
    }

    match Neo4jHttpStore::from_config(&config.graph) {
        Ok(graph) => {
            let report = graph.health_check().await;
            print_report(report.connected, &report.backend, &report.detail, &mut issues);
        }
        Err(e) => {
            println!("  [skip] graph: {e}");
            issues += 1;
        }
    }

    match PgRelationalStore::connect(&config.relational).await {
        Ok(relational) => {
            let report = relational.health_check().await;
            print_report(report.connected, &report.backend, &report.detail, &mut issues);
            relational.close().await;
        }
        Err(e) => {
            println!("  [skip] relational: {e}");
            issues += 1;
        }
    }

    println!();
    if issues == 0 {
        println!("  All checks passed.");
    } else {
        println!("  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}

fn print_report(connected: bool, backend: &str, detail: &str, issues: &mut usize) {
    if connected {
        println!("  [ok]   {backend}: {detail}");
    } else {
        println!("  [fail] {backend}: {detail}");
        *issues += 1;
    }
}

pub async fn init_schema() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let graph = Neo4jHttpStore::from_config(&config.graph)?;
    graph.initialize_schema().await?;
    println!("  Graph schema initialized at {}", graph.endpoint());
    Ok(())
}
