use clap::Parser;
use tracing::{error, info};

mod config;
mod db;
mod llm;
mod pipeline;
mod report;
mod util;

use crate::config::{AppConfig, CliArgs};
use crate::db::db_pool::{build_pool, run_init_script};
use crate::llm::LlmManager;
use crate::pipeline::Pipeline;
use crate::report::Reporter;
use crate::util::logging::init_tracing;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging
    init_tracing();

    // Parse command line arguments
    let args = CliArgs::parse();

    // Load configuration
    let config = match AppConfig::new(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };
    let kind = config.pipeline.variant;

    info!("Initializing DuckDB connection pool for {}", config.database.connection_string);
    let pool = build_pool(&config.database)?;

    if let Some(script) = &config.database.init_script {
        run_init_script(&pool, script)?;
    }

    let backend = config.llm.backend.unwrap_or(kind.default_backend());
    info!("Initializing LLM manager with backend: {} (model {})", backend, config.llm.model);
    let llm_manager = LlmManager::new(&config.llm, backend)?;

    let pipeline = Pipeline::new(kind, pool, Box::new(llm_manager), &config.pipeline)?;
    pipeline.verify_schema().await?;

    let reporter = Reporter::new(config.pipeline.output.unwrap_or(kind.default_output()));

    let questions: Vec<String> = if config.pipeline.questions.is_empty() {
        kind.default_questions().iter().map(|q| q.to_string()).collect()
    } else {
        config.pipeline.questions.clone()
    };

    info!("Running {:?} pipeline over {} questions", pipeline.kind(), questions.len());
    let mut answered = 0;
    for question in &questions {
        info!("Processing question: {}", question);
        let run = pipeline.answer(question).await;
        let report = reporter.report(&run);
        if report.is_some() {
            answered += 1;
        }
        println!("\n=== Q: {} ===\n{}", question, report.as_deref().unwrap_or("None"));
    }

    info!("Answered {} of {} questions", answered, questions.len());
    Ok(())
}
