use crate::db::executor::{self, QueryError};
use duckdb::Connection;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::debug;

/// Two-table schema embedded in the direct pipeline's prompt.
pub const PATIENTS_AND_NOTES_SCHEMA: &str = "\
1. Patients
   - PatientID (INTEGER, PK)
   - FirstName (VARCHAR)
   - LastName (VARCHAR)
   - Gender (VARCHAR)
   - DOB (DATE)
   - Diagnosis (VARCHAR)
   - RiskFactor (VARCHAR)
   - LastVisitDate (DATE)

2. PatientNotes
   - NoteID (INTEGER, PK)
   - PatientID (INTEGER, FK -> Patients.PatientID)
   - NoteDate (DATE)
   - NoteText (VARCHAR)
   - Provider (VARCHAR)";

/// One-table schema embedded in the agent pipeline's prompt.
pub const PATIENTS_SCHEMA: &str = "\
Patients(
  PatientID INTEGER PRIMARY KEY,
  FirstName VARCHAR,
  LastName VARCHAR,
  Gender VARCHAR,
  DOB DATE,
  Diagnosis VARCHAR,
  RiskFlag VARCHAR, -- 'High', 'Medium', 'Low'
  LastVisitDate DATE
)";

const SAMPLE_VALUE_WIDTH: usize = 100;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("include_tables {0:?} not found in database")]
    MissingTables(Vec<String>),
    #[error(transparent)]
    Database(#[from] duckdb::Error),
    #[error(transparent)]
    Query(#[from] QueryError),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
}

impl ColumnSchema {
    pub fn to_sql_definition(&self) -> String {
        let nullable_str = if self.nullable { "" } else { " NOT NULL" };
        format!("{} {}{}", quote_ident(&self.name), self.data_type, nullable_str)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSchema {
    pub schema: String,
    pub name: String,
    pub columns: Vec<ColumnSchema>,
}

impl TableSchema {
    /// Name as it should appear in generated SQL; `main` is implicit.
    pub fn qualified_name(&self) -> String {
        if self.schema == "main" {
            quote_ident(&self.name)
        } else {
            format!("{}.{}", quote_ident(&self.schema), quote_ident(&self.name))
        }
    }

    pub fn to_create_table_sql(&self) -> String {
        let columns_sql: Vec<String> = self.columns
            .iter()
            .map(|col| col.to_sql_definition())
            .collect();

        format!(
            "CREATE TABLE {} (\n    {}\n);",
            self.qualified_name(),
            columns_sql.join(",\n    ")
        )
    }
}

/// Schema text handed to the prompt, plus the table names it mentions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaDescription {
    pub text: String,
    pub tables: Vec<String>,
}

#[derive(Debug, Clone)]
pub enum SchemaSource {
    /// Introspect the connected database on every request
    Live {
        include_tables: Vec<String>,
        sample_rows: usize,
    },
    /// Fixed text; never compared against the live database
    Static { text: String, tables: Vec<String> },
}

impl SchemaSource {
    pub fn patients() -> Self {
        SchemaSource::Static {
            text: PATIENTS_SCHEMA.to_string(),
            tables: vec!["Patients".to_string()],
        }
    }

    pub fn patients_and_notes() -> Self {
        SchemaSource::Static {
            text: PATIENTS_AND_NOTES_SCHEMA.to_string(),
            tables: vec!["Patients".to_string(), "PatientNotes".to_string()],
        }
    }

    /// The description of a static source, which needs no connection.
    pub fn fixed(&self) -> Option<SchemaDescription> {
        match self {
            SchemaSource::Static { text, tables } => Some(SchemaDescription {
                text: text.clone(),
                tables: tables.clone(),
            }),
            SchemaSource::Live { .. } => None,
        }
    }

    pub fn describe(&self, conn: &Connection) -> Result<SchemaDescription, SchemaError> {
        match self {
            SchemaSource::Static { .. } => Ok(self.fixed().unwrap_or_default()),
            SchemaSource::Live {
                include_tables,
                sample_rows,
            } => {
                let tables = introspect_tables(conn, include_tables)?;
                let mut blocks = Vec::with_capacity(tables.len());
                for table in &tables {
                    let mut block = table.to_create_table_sql();
                    if *sample_rows > 0 {
                        block.push_str("\n\n");
                        block.push_str(&sample_rows_block(conn, table, *sample_rows)?);
                    }
                    blocks.push(block);
                }

                Ok(SchemaDescription {
                    text: blocks.join("\n\n"),
                    tables: tables.into_iter().map(|t| t.name).collect(),
                })
            }
        }
    }
}

/// Lists user tables and views with their columns, optionally limited to
/// `include` (case-insensitive). Every name in `include` must exist.
pub fn introspect_tables(conn: &Connection, include: &[String]) -> Result<Vec<TableSchema>, SchemaError> {
    let mut tables_stmt = conn.prepare(
        "SELECT table_schema, table_name FROM information_schema.tables
         WHERE table_catalog = current_database()
           AND table_schema NOT IN ('information_schema', 'pg_catalog')
         ORDER BY table_schema, table_name",
    )?;
    let mut names: Vec<(String, String)> = tables_stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
        .collect::<Result<_, _>>()?;

    if !include.is_empty() {
        let missing: Vec<String> = include
            .iter()
            .filter(|wanted| !names.iter().any(|(_, name)| name.eq_ignore_ascii_case(wanted)))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(SchemaError::MissingTables(missing));
        }
        names.retain(|(_, name)| include.iter().any(|wanted| name.eq_ignore_ascii_case(wanted)));
    }

    let mut columns_stmt = conn.prepare(
        "SELECT column_name, data_type, is_nullable
         FROM information_schema.columns
         WHERE table_schema = ? AND table_name = ?
         ORDER BY ordinal_position",
    )?;

    let mut tables = Vec::with_capacity(names.len());
    for (schema, name) in names {
        let columns = columns_stmt
            .query_map(duckdb::params![schema, name], |row| {
                Ok(ColumnSchema {
                    name: row.get(0)?,
                    data_type: row.get(1)?,
                    nullable: row.get::<_, String>(2)? == "YES",
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        tables.push(TableSchema { schema, name, columns });
    }

    debug!("Introspected {} tables", tables.len());
    Ok(tables)
}

fn sample_rows_block(conn: &Connection, table: &TableSchema, limit: usize) -> Result<String, SchemaError> {
    let sql = format!("SELECT * FROM {} LIMIT {}", table.qualified_name(), limit);
    let result = executor::execute(conn, &sql)?;

    let mut block = format!("/*\n{} rows from {} table:\n", limit, table.name);
    block.push_str(&result.columns.join("\t"));
    for row in &result.rows {
        let cells: Vec<String> = row.values().map(sample_cell).collect();
        block.push('\n');
        block.push_str(&cells.join("\t"));
    }
    block.push_str("\n*/");
    Ok(block)
}

fn sample_cell(value: &JsonValue) -> String {
    let text = match value {
        JsonValue::Null => "NULL".to_string(),
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    };
    text.chars().take(SAMPLE_VALUE_WIDTH).collect()
}

fn quote_ident(ident: &str) -> String {
    if !ident.is_empty() && ident.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        ident.to_string()
    } else {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::db_pool::memory_pool;

    const SEED: &str = "
        CREATE TABLE Patients (PatientID INTEGER NOT NULL, FirstName VARCHAR, Gender VARCHAR);
        CREATE TABLE PatientNotes (NoteID INTEGER NOT NULL, PatientID INTEGER, \"Note Text\" VARCHAR);
        INSERT INTO Patients VALUES (1, 'Jane', 'Female'), (2, 'John', 'Male');
    ";

    #[test]
    fn test_live_describes_all_tables() {
        let conn = memory_pool().get().unwrap();
        conn.execute_batch(SEED).unwrap();

        let source = SchemaSource::Live {
            include_tables: Vec::new(),
            sample_rows: 0,
        };
        let description = source.describe(&conn).unwrap();

        assert_eq!(description.tables, vec!["PatientNotes", "Patients"]);
        assert!(description.text.contains("CREATE TABLE Patients (\n    PatientID INTEGER NOT NULL,"));
        assert!(description.text.contains("\"Note Text\" VARCHAR"));
        assert!(!description.text.contains("/*"));
    }

    #[test]
    fn test_live_include_tables_with_samples() {
        let conn = memory_pool().get().unwrap();
        conn.execute_batch(SEED).unwrap();

        let source = SchemaSource::Live {
            include_tables: vec!["patients".to_string()],
            sample_rows: 3,
        };
        let description = source.describe(&conn).unwrap();

        assert_eq!(description.tables, vec!["Patients"]);
        assert!(!description.text.contains("PatientNotes"));
        assert!(description.text.contains("3 rows from Patients table:\nPatientID\tFirstName\tGender"));
        assert!(description.text.contains("1\tJane\tFemale"));
        assert!(description.text.ends_with("*/"));
    }

    #[test]
    fn test_live_missing_include_table() {
        let conn = memory_pool().get().unwrap();
        conn.execute_batch(SEED).unwrap();

        let source = SchemaSource::Live {
            include_tables: vec!["Admissions".to_string()],
            sample_rows: 0,
        };
        match source.describe(&conn) {
            Err(SchemaError::MissingTables(missing)) => assert_eq!(missing, vec!["Admissions"]),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_empty_database_is_empty_description() {
        let conn = memory_pool().get().unwrap();
        let source = SchemaSource::Live {
            include_tables: Vec::new(),
            sample_rows: 2,
        };
        assert_eq!(source.describe(&conn).unwrap(), SchemaDescription::default());
    }

    #[test]
    fn test_static_source_ignores_database() {
        let conn = memory_pool().get().unwrap();
        let description = SchemaSource::patients().describe(&conn).unwrap();
        assert_eq!(description.text, PATIENTS_SCHEMA);
        assert_eq!(description.tables, vec!["Patients"]);
        assert!(SchemaSource::patients_and_notes().fixed().unwrap().text.contains("PatientNotes"));
    }

    #[test]
    fn test_non_main_schema_is_qualified() {
        let table = TableSchema {
            schema: "clinic".to_string(),
            name: "Patients".to_string(),
            columns: vec![ColumnSchema {
                name: "PatientID".to_string(),
                data_type: "INTEGER".to_string(),
                nullable: true,
            }],
        };
        assert_eq!(
            table.to_create_table_sql(),
            "CREATE TABLE clinic.Patients (\n    PatientID INTEGER\n);"
        );
    }
}
