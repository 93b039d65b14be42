use minijinja::Environment;
use serde::Serialize;
use std::path::Path;

/// Chain pipeline: live schema, dialect-specific rules, `SQLQuery:` cue.
pub const CHAIN_TEMPLATE: &str = r#"
You are a senior data analyst writing **{{ dialect }}** SQL.

Rules:
- Use only the tables/columns from the provided schema.
- Prefer the exact table names shown in the schema, including any schema prefix.
- Use {{ dialect }} syntax for limits, date arithmetic and casts.
- Strings use single quotes; quote identifiers with double quotes only if they contain spaces or special characters.
- Return only a single SQL query, no explanations, no markdown.

Schema:
{{ schema }}

User question: {{ question }}
SQLQuery:
"#;

/// Direct pipeline: hardcoded patients + notes schema.
pub const DIRECT_TEMPLATE: &str = r#"
You are a {{ dialect }} expert. Convert the user question into a SQL query
for {{ dialect }}. Only return the SQL query, nothing else.

Rules:
- Use exact column names from schema. Never invent tables or columns.
- Always alias tables when more than one table is used (e.g., Patients AS p, PatientNotes AS pn).
- For text filters (like gender, diagnosis, risk flags), use ILIKE with wildcards unless the value is guaranteed exact.
- Avoid backticks at the start and end of the query.
- Format DATE or TIMESTAMP fields in the result as DD-MM-YYYY hh:mm:ss AM/PM using strftime, e.g. strftime(LastVisitDate, '%d-%m-%Y %I:%M:%S %p').
- When grouping by dates, make the SELECT and GROUP BY use the same date granularity.
- For filtering with WHERE clauses, always use ISO format 'YYYY-MM-DD' for dates.
- When calculating age, use date_diff('year', DOB, current_date) so the result is an integer in years.
- Use JOINs when accessing related data across tables.
- Use EXISTS only to check for related rows without counting or selecting their fields.

Database schema:
{{ schema }}

User question:
{{ question }}
"#;

/// Agent pipeline: hardcoded single-table schema, chat-style model.
pub const AGENT_TEMPLATE: &str = r#"
You are a helpful assistant that converts natural language questions into
valid {{ dialect }} queries. Only return the SQL query, nothing else.

Rules:
- Use exact column names.
- For text filters (like Gender, Diagnosis, RiskFlag), use ILIKE with wildcards
  unless the value is guaranteed exact.
- Always output valid {{ dialect }} syntax.

Database schema:
{{ schema }}

User question:
{{ question }}
"#;

/// Second chain step: phrase the rows as an answer.
pub const ANSWER_TEMPLATE: &str = r#"
Given an input question, the SQL query that was run and its result, write a
short answer to the question. Use only facts present in the result.

Question: {{ question }}
SQLQuery: {{ sql }}
SQLResult: {{ result }}
Answer:
"#;

/// Values a template may reference. Unused fields render nothing.
#[derive(Debug, Default, Serialize)]
pub struct PromptContext<'a> {
    pub question: &'a str,
    pub schema: &'a str,
    pub dialect: &'a str,
    pub sql: &'a str,
    pub result: &'a str,
}

/// A single named template. Substituted values are inserted as-is and are
/// never parsed as template syntax themselves.
pub struct PromptTemplate {
    env: Environment<'static>,
    name: String,
}

impl PromptTemplate {
    pub fn new(name: &str, source: &str) -> Result<Self, minijinja::Error> {
        let mut env = Environment::new();
        env.set_keep_trailing_newline(true);
        env.add_template_owned(name.to_string(), source.to_string())?;

        Ok(Self {
            env,
            name: name.to_string(),
        })
    }

    pub fn from_file(path: &Path) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let source = std::fs::read_to_string(path)?;
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("custom");
        Ok(Self::new(name, &source)?)
    }

    pub fn render(&self, context: &PromptContext<'_>) -> Result<String, minijinja::Error> {
        self.env.get_template(&self.name)?.render(context)
    }
}
