use clap::Parser;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::llm::Backend;
use crate::pipeline::PipelineKind;
use crate::report::OutputFormat;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// DuckDB file path, or `:memory:`
    pub connection_string: String,
    pub pool_size: usize,
    /// SQL batch executed once after the pool is built
    pub init_script: Option<PathBuf>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LlmConfig {
    pub backend: Option<Backend>, // None picks the variant default
    pub model: String,
    pub api_key: Option<String>,
    pub api_url: Option<String>,
    pub temperature: f32,
    pub num_ctx: Option<u32>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PipelineConfig {
    pub variant: PipelineKind,
    /// Forces the query checker on; the chain variant always checks
    pub check_queries: bool,
    /// Tables exposed by live introspection, empty means all
    #[serde(default)]
    pub include_tables: Vec<String>,
    pub sample_rows: usize,
    pub dialect: String,
    pub output: Option<OutputFormat>,
    pub template: Option<PathBuf>,
    #[serde(default)]
    pub questions: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub pipeline: PipelineConfig,
}

#[derive(Parser, Debug, Default)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Pipeline variant to run
    #[arg(long, value_enum)]
    pub variant: Option<PipelineKind>,

    /// Question to ask, may be repeated; replaces the built-in list
    #[arg(short, long = "question")]
    pub questions: Vec<String>,

    /// DuckDB database path
    #[arg(long)]
    pub database: Option<String>,

    /// Model identifier
    #[arg(short, long)]
    pub model: Option<String>,

    /// Validate generated SQL before running it
    #[arg(long)]
    pub check_queries: bool,

    /// Output format for result sets
    #[arg(short, long, value_enum)]
    pub output: Option<OutputFormat>,
}

impl AppConfig {
    pub fn new(args: &CliArgs) -> Result<Self, ConfigError> {
        // Start with default configuration
        let mut config_builder = Config::builder().add_source(Config::try_from(&AppConfig::default())?);

        // Add configuration from file if specified
        if let Some(config_path) = &args.config {
            config_builder = config_builder.add_source(File::from(config_path.as_path()));
        } else {
            // Check for config in default locations
            let default_locations = vec![
                "config.toml",
                "config/config.toml",
                "/etc/patient-nlq/config.toml",
            ];

            for location in default_locations {
                if Path::new(location).exists() {
                    config_builder =
                        config_builder.add_source(File::new(location, config::FileFormat::Toml));
                    break;
                }
            }
        }

        // NLQ_DATABASE__CONNECTION_STRING, NLQ_LLM__MODEL, ...
        config_builder = config_builder.add_source(
            Environment::with_prefix("NLQ")
                .prefix_separator("_")
                .separator("__"),
        );

        let mut config: AppConfig = config_builder.build()?.try_deserialize()?;
        config.apply_args(args);

        Ok(config)
    }

    /// Command line flags win over file and environment values.
    fn apply_args(&mut self, args: &CliArgs) {
        if let Some(variant) = args.variant {
            self.pipeline.variant = variant;
        }
        if !args.questions.is_empty() {
            self.pipeline.questions = args.questions.clone();
        }
        if let Some(database) = &args.database {
            self.database.connection_string = database.clone();
        }
        if let Some(model) = &args.model {
            self.llm.model = model.clone();
        }
        if args.check_queries {
            self.pipeline.check_queries = true;
        }
        if let Some(output) = args.output {
            self.pipeline.output = Some(output);
        }
    }
}

// Default implementation
impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                connection_string: "patients.duckdb".to_string(),
                pool_size: 1,
                init_script: None,
            },
            llm: LlmConfig {
                backend: None,
                model: "llama3:instruct".to_string(),
                api_key: None,
                api_url: None,
                temperature: 0.0,
                num_ctx: Some(8192),
                timeout_secs: None,
            },
            pipeline: PipelineConfig {
                variant: PipelineKind::Direct,
                check_queries: false,
                include_tables: Vec::new(),
                sample_rows: 0,
                dialect: "DuckDB".to_string(),
                output: None,
                template: None,
                questions: Vec::new(),
            },
        }
    }
}
