pub mod prompt;
pub mod questions;

use crate::config::PipelineConfig;
use crate::db::checker::{CheckError, QueryChecker};
use crate::db::db_pool::DuckDBConnectionManager;
use crate::db::executor::{self, QueryError, ResultSet};
use crate::db::schema::{SchemaDescription, SchemaError, SchemaSource};
use crate::llm::extract::clean_sql;
use crate::llm::{Backend, LanguageModel, LlmError};
use crate::report::OutputFormat;
use prompt::{PromptContext, PromptTemplate};
use r2d2::Pool;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Which of the three question-to-rows flows to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PipelineKind {
    /// Live schema, query checker, natural-language answer
    Chain,
    /// Hardcoded patients + notes schema, raw completion
    Direct,
    /// Hardcoded patients schema, chat completion, JSON rows
    Agent,
}

impl PipelineKind {
    pub fn default_backend(self) -> Backend {
        match self {
            PipelineKind::Chain | PipelineKind::Direct => Backend::Ollama,
            PipelineKind::Agent => Backend::OllamaChat,
        }
    }

    pub fn default_output(self) -> OutputFormat {
        match self {
            PipelineKind::Chain => OutputFormat::Steps,
            PipelineKind::Direct => OutputFormat::Table,
            PipelineKind::Agent => OutputFormat::Json,
        }
    }

    pub fn default_questions(self) -> &'static [&'static str] {
        match self {
            PipelineKind::Chain => questions::CHAIN_QUESTIONS,
            PipelineKind::Direct => questions::DIRECT_QUESTIONS,
            PipelineKind::Agent => questions::AGENT_QUESTIONS,
        }
    }

    fn template(self) -> &'static str {
        match self {
            PipelineKind::Chain => prompt::CHAIN_TEMPLATE,
            PipelineKind::Direct => prompt::DIRECT_TEMPLATE,
            PipelineKind::Agent => prompt::AGENT_TEMPLATE,
        }
    }

    fn schema_source(self, config: &PipelineConfig) -> SchemaSource {
        match self {
            PipelineKind::Chain => SchemaSource::Live {
                include_tables: config.include_tables.clone(),
                sample_rows: config.sample_rows,
            },
            PipelineKind::Direct => SchemaSource::patients_and_notes(),
            PipelineKind::Agent => SchemaSource::patients(),
        }
    }

    fn name(self) -> &'static str {
        match self {
            PipelineKind::Chain => "chain",
            PipelineKind::Direct => "direct",
            PipelineKind::Agent => "agent",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Prompt,
    Schema,
    Model,
    Rejected,
    SqlSyntax,
    Execution,
    Connectivity,
}

/// Why a single question produced no rows.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("prompt formatting failed: {0}")]
    Prompt(#[from] minijinja::Error),
    #[error("schema lookup failed: {0}")]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Model(#[from] LlmError),
    #[error("query rejected: {0}")]
    Rejected(#[from] CheckError),
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error("database task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl PipelineError {
    pub fn kind(&self) -> FailureKind {
        match self {
            PipelineError::Prompt(_) => FailureKind::Prompt,
            PipelineError::Schema(SchemaError::Query(QueryError::Connectivity(_))) => {
                FailureKind::Connectivity
            }
            PipelineError::Schema(_) => FailureKind::Schema,
            PipelineError::Model(_) => FailureKind::Model,
            PipelineError::Rejected(CheckError::Syntax(_)) => FailureKind::SqlSyntax,
            PipelineError::Rejected(_) => FailureKind::Rejected,
            PipelineError::Query(QueryError::Syntax(_)) => FailureKind::SqlSyntax,
            PipelineError::Query(QueryError::Execution(_)) => FailureKind::Execution,
            PipelineError::Query(QueryError::Connectivity(_)) => FailureKind::Connectivity,
            PipelineError::Task(_) => FailureKind::Execution,
        }
    }
}

/// Everything produced while answering one question.
#[derive(Debug)]
pub struct QuestionRun {
    pub question: String,
    pub sql: Option<String>,
    pub outcome: Result<ResultSet, PipelineError>,
    /// Natural-language answer, chain pipeline only
    pub answer: Option<String>,
}

/// Owns the long-lived pool and model client for one process run.
pub struct Pipeline {
    kind: PipelineKind,
    pool: Pool<DuckDBConnectionManager>,
    model: Box<dyn LanguageModel>,
    template: PromptTemplate,
    answer_template: Option<PromptTemplate>,
    schema: SchemaSource,
    check_queries: bool,
    dialect: String,
}

impl Pipeline {
    pub fn new(
        kind: PipelineKind,
        pool: Pool<DuckDBConnectionManager>,
        model: Box<dyn LanguageModel>,
        config: &PipelineConfig,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let template = match &config.template {
            Some(path) => {
                info!("Loading prompt template from {}", path.display());
                PromptTemplate::from_file(path)?
            }
            None => PromptTemplate::new(kind.name(), kind.template())?,
        };

        let answer_template = match kind {
            PipelineKind::Chain => Some(PromptTemplate::new("answer", prompt::ANSWER_TEMPLATE)?),
            _ => None,
        };

        Ok(Self {
            kind,
            pool,
            model,
            template,
            answer_template,
            schema: kind.schema_source(config),
            check_queries: config.check_queries || kind == PipelineKind::Chain,
            dialect: config.dialect.clone(),
        })
    }

    pub fn kind(&self) -> PipelineKind {
        self.kind
    }

    /// Fails fast on schema problems (e.g. a missing included table) before
    /// any question is asked.
    pub async fn verify_schema(&self) -> Result<(), PipelineError> {
        let description = self.describe_schema().await?;
        info!(
            "Schema for {} pipeline covers {} tables",
            self.kind.name(),
            description.tables.len()
        );
        Ok(())
    }

    /// format -> invoke -> clean -> check -> execute, then summarize for the
    /// chain pipeline. Never fails; the outcome carries the error.
    pub async fn answer(&self, question: &str) -> QuestionRun {
        let mut run = QuestionRun {
            question: question.to_string(),
            sql: None,
            outcome: Ok(ResultSet::default()),
            answer: None,
        };

        run.outcome = self.generate_and_run(question, &mut run.sql).await;

        if let (Ok(rows), Some(sql)) = (&run.outcome, &run.sql) {
            if self.answer_template.is_some() {
                match self.summarize(question, sql, rows).await {
                    Ok(answer) => run.answer = Some(answer),
                    Err(e) => warn!("Could not phrase an answer: {}", e),
                }
            }
        }

        run
    }

    async fn generate_and_run(
        &self,
        question: &str,
        sql_slot: &mut Option<String>,
    ) -> Result<ResultSet, PipelineError> {
        let schema = self.describe_schema().await?;

        let prompt = self.template.render(&PromptContext {
            question,
            schema: &schema.text,
            dialect: &self.dialect,
            ..Default::default()
        })?;
        debug!("Prepared LLM prompt: {}", prompt);

        let raw = self.model.complete(&prompt).await?;
        info!("Raw SQL from generator:\n{}", raw);

        let sql = clean_sql(&raw);
        *sql_slot = Some(sql.clone());

        if self.check_queries {
            QueryChecker::with_known_tables(&schema.tables).check(&sql)?;
        }

        self.run_sql(sql).await
    }

    async fn describe_schema(&self) -> Result<SchemaDescription, PipelineError> {
        if let Some(description) = self.schema.fixed() {
            return Ok(description);
        }

        let pool = self.pool.clone();
        let source = self.schema.clone();
        let description = tokio::task::spawn_blocking(move || -> Result<SchemaDescription, SchemaError> {
            let conn = pool.get().map_err(QueryError::from)?;
            source.describe(&conn)
        })
        .await??;

        Ok(description)
    }

    async fn run_sql(&self, sql: String) -> Result<ResultSet, PipelineError> {
        let pool = self.pool.clone();
        let rows = tokio::task::spawn_blocking(move || -> Result<ResultSet, QueryError> {
            let conn = pool.get()?;
            executor::execute(&conn, &sql)
        })
        .await??;

        info!("Query returned {} rows", rows.len());
        Ok(rows)
    }

    async fn summarize(&self, question: &str, sql: &str, rows: &ResultSet) -> Result<String, PipelineError> {
        let Some(template) = &self.answer_template else {
            return Ok(String::new());
        };

        let result = serde_json::to_string(&rows.rows).unwrap_or_default();
        let prompt = template.render(&PromptContext {
            question,
            sql,
            result: &result,
            ..Default::default()
        })?;

        let answer = self.model.complete(&prompt).await?;
        Ok(answer.trim().to_string())
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::config::AppConfig;
    use crate::report::Reporter;
    use serde_json::json;

    fn config() -> PipelineConfig {
        AppConfig::default().pipeline
    }

    #[tokio::test]
    async fn test_male_patient_count_end_to_end() {
        let model = ScriptedModel::replying(&["SELECT COUNT(*) FROM Patients WHERE Gender = 'Male'"]);
        let prompts = model.prompts.clone();
        let pipeline = pipeline(PipelineKind::Agent, model, &config());

        let question = "How many male patients are currently in the database?";
        let run = pipeline.answer(question).await;

        let json = Reporter::new(PipelineKind::Agent.default_output())
            .report(&run)
            .unwrap();
        let printed: Vec<serde_json::Map<String, serde_json::Value>> =
            serde_json::from_str(&json).unwrap();
        assert_eq!(printed.len(), 1);
        assert_eq!(printed[0].values().collect::<Vec<_>>(), vec![&json!(3)]);

        let table = Reporter::new(OutputFormat::Table).report(&run).unwrap();
        assert_eq!(table.lines().nth(2), Some("3"), "{table}");
        assert!(table.ends_with("(1 row)"));

        let rows = run.outcome.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows.columns.len(), 1);
        let value = rows.rows[0].values().next().unwrap();
        assert_eq!(value, &json!(3));
        assert_eq!(run.sql.as_deref(), Some("SELECT COUNT(*) FROM Patients WHERE Gender = 'Male'"));
        assert!(run.answer.is_none());

        let prompts = prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains(question));
        assert!(prompts[0].contains("Gender VARCHAR"));
    }

    #[tokio::test]
    async fn test_execution_failure_continues_with_next_question() {
        let model = ScriptedModel::replying(&[
            "SELECT * FROM PatientNotes",
            "```sql\nSELECT FirstName FROM Patients WHERE RiskFlag = 'High' ORDER BY PatientID\n```",
        ]);
        let pipeline = pipeline(PipelineKind::Direct, model, &config());

        let first = pipeline.answer("Get all notes written by Dr. Carter.").await;
        let err = first.outcome.unwrap_err();
        assert_eq!(err.kind(), FailureKind::Execution);

        let second = pipeline.answer("Which patients are high risk?").await;
        let rows = second.outcome.unwrap();
        assert_eq!(rows.rows, vec![
            json!({"FirstName": "John"}).as_object().unwrap().clone(),
            json!({"FirstName": "Li"}).as_object().unwrap().clone(),
        ]);
    }

    #[tokio::test]
    async fn test_syntax_error_kind() {
        let model = ScriptedModel::replying(&["SELEC FirstName FRM Patients"]);
        let pipeline = pipeline(PipelineKind::Direct, model, &config());

        let run = pipeline.answer("q").await;
        assert_eq!(run.outcome.unwrap_err().kind(), FailureKind::SqlSyntax);
        assert_eq!(run.sql.as_deref(), Some("SELEC FirstName FRM Patients"));
    }

    #[tokio::test]
    async fn test_model_failure_kind() {
        let model = ScriptedModel::new([Err(LlmError::ConnectionError("refused".to_string()))]);
        let pipeline = pipeline(PipelineKind::Agent, model, &config());

        let run = pipeline.answer("q").await;
        assert_eq!(run.outcome.unwrap_err().kind(), FailureKind::Model);
        assert!(run.sql.is_none());
    }

    #[tokio::test]
    async fn test_zero_rows_is_success() {
        let model = ScriptedModel::replying(&["SELECT * FROM Patients WHERE Gender = 'Other'"]);
        let pipeline = pipeline(PipelineKind::Agent, model, &config());

        let rows = pipeline.answer("q").await.outcome.unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_chain_rejects_destructive_sql_without_running_it() {
        let model = ScriptedModel::replying(&["DELETE FROM Patients"]);
        let pool = seeded_pool();
        let pipeline = Pipeline::new(PipelineKind::Chain, pool.clone(), Box::new(model), &config()).unwrap();

        let run = pipeline.answer("Remove everyone").await;
        assert_eq!(run.outcome.unwrap_err().kind(), FailureKind::Rejected);

        let count: i64 = pool
            .get()
            .unwrap()
            .query_row("SELECT COUNT(*) FROM Patients", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 4);
    }

    #[tokio::test]
    async fn test_chain_uses_live_schema_and_summarizes() {
        let model = ScriptedModel::replying(&[
            "SQLQuery: SELECT FirstName, LastName FROM Patients WHERE RiskFlag = 'High' ORDER BY PatientID",
            "John Adams and Li Wei are high risk.",
        ]);
        let prompts = model.prompts.clone();
        let pipeline = pipeline(PipelineKind::Chain, model, &config());

        let run = pipeline
            .answer("List the names and diagnoses of patients flagged as high risk")
            .await;

        assert_eq!(run.outcome.unwrap().len(), 2);
        assert_eq!(run.answer.as_deref(), Some("John Adams and Li Wei are high risk."));

        let prompts = prompts.lock().unwrap();
        assert!(prompts[0].contains("CREATE TABLE Patients ("));
        assert!(prompts[0].ends_with("SQLQuery:\n"));
        assert!(prompts[1].contains("SQLResult: [{\"FirstName\":\"John\",\"LastName\":\"Adams\"}"));
    }

    #[tokio::test]
    async fn test_check_queries_flag_applies_to_static_schema() {
        let model = ScriptedModel::replying(&["SELECT * FROM Admissions"]);
        let mut config = config();
        config.check_queries = true;
        let pipeline = pipeline(PipelineKind::Agent, model, &config);

        let err = pipeline.answer("q").await.outcome.unwrap_err();
        assert!(matches!(err, PipelineError::Rejected(CheckError::UnknownTable(_))), "{err:?}");
    }

    #[tokio::test]
    async fn test_verify_schema_reports_missing_tables() {
        let mut config = config();
        config.include_tables = vec!["Admissions".to_string()];
        let pipeline = pipeline(PipelineKind::Chain, ScriptedModel::replying(&[]), &config);

        let err = pipeline.verify_schema().await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::Schema);
    }

    #[test]
    fn test_variant_defaults() {
        assert_eq!(PipelineKind::Agent.default_backend(), Backend::OllamaChat);
        assert_eq!(PipelineKind::Direct.default_output(), OutputFormat::Table);
        assert_eq!(PipelineKind::Chain.default_questions().len(), 1);
        assert_eq!(PipelineKind::Direct.default_questions().len(), 15);
        assert_eq!(PipelineKind::Agent.default_questions().len(), 4);
    }
}
