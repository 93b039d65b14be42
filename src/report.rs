use crate::db::executor::ResultSet;
use crate::pipeline::QuestionRun;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt::Write as _;
use tracing::error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Pretty JSON array of row objects
    Json,
    /// Aligned text table
    Table,
    /// Header plus comma separated rows
    Csv,
    /// Intermediate steps, then the final answer
    Steps,
}

pub struct Reporter {
    format: OutputFormat,
}

impl Reporter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Renders a successful run. A failed run logs one error line and yields
    /// `None`; so does a rendering failure.
    pub fn report(&self, run: &QuestionRun) -> Option<String> {
        let rows = match &run.outcome {
            Ok(rows) => rows,
            Err(e) => {
                error!(kind = ?e.kind(), "SQL execution failed: {}", e);
                return None;
            }
        };

        let rendered = match self.format {
            OutputFormat::Json => render_json(rows).map_err(|e| e.to_string()),
            OutputFormat::Table => Ok(render_table(rows)),
            OutputFormat::Csv => render_csv(rows),
            OutputFormat::Steps => render_steps(run, rows).map_err(|e| e.to_string()),
        };

        match rendered {
            Ok(text) => Some(text),
            Err(e) => {
                error!("Failed to render result set: {}", e);
                None
            }
        }
    }
}

pub fn render_json(rows: &ResultSet) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&rows.rows)
}

pub fn render_table(rows: &ResultSet) -> String {
    if rows.columns.is_empty() {
        return "(0 rows)".to_string();
    }

    let cells: Vec<Vec<String>> = rows
        .rows
        .iter()
        .map(|row| rows.columns.iter().map(|c| cell_text(row.get(c))).collect())
        .collect();

    let widths: Vec<usize> = rows
        .columns
        .iter()
        .enumerate()
        .map(|(i, name)| {
            cells
                .iter()
                .map(|r| r[i].chars().count())
                .chain(std::iter::once(name.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let line = |values: &[String]| -> String {
        values
            .iter()
            .zip(&widths)
            .map(|(v, w)| format!("{:<width$}", v, width = *w))
            .collect::<Vec<_>>()
            .join(" | ")
            .trim_end()
            .to_string()
    };

    let mut out = String::new();
    let _ = writeln!(out, "{}", line(&rows.columns));
    let _ = writeln!(
        out,
        "{}",
        widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>().join("-+-")
    );
    for row in &cells {
        let _ = writeln!(out, "{}", line(row));
    }
    let _ = write!(
        out,
        "({} row{})",
        rows.len(),
        if rows.len() == 1 { "" } else { "s" }
    );
    out
}

pub fn render_csv(rows: &ResultSet) -> Result<String, String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(&rows.columns).map_err(|e| e.to_string())?;
    for row in &rows.rows {
        writer
            .write_record(rows.columns.iter().map(|c| cell_text(row.get(c))))
            .map_err(|e| e.to_string())?;
    }
    let bytes = writer.into_inner().map_err(|e| e.to_string())?;
    String::from_utf8(bytes).map_err(|e| e.to_string())
}

fn render_steps(run: &QuestionRun, rows: &ResultSet) -> Result<String, serde_json::Error> {
    let mut out = String::from("=== Intermediate Steps ===\n");
    let _ = writeln!(out, "[0] {}", run.question);
    let _ = writeln!(out, "[1] {}", run.sql.as_deref().unwrap_or_default());
    let _ = writeln!(out, "[2] {}", serde_json::to_string(&rows.rows)?);
    if let Some(answer) = &run.answer {
        let _ = writeln!(out, "[3] {}", answer);
    }
    out.push_str("\n=== Final Answer ===\n");
    match &run.answer {
        Some(answer) => out.push_str(answer),
        None => out.push_str(&render_table(rows)),
    }
    Ok(out)
}

fn cell_text(value: Option<&JsonValue>) -> String {
    match value {
        None | Some(JsonValue::Null) => "NULL".to_string(),
        Some(JsonValue::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}
