use sqlparser::ast::{
    visit_relations, ObjectName, Query, SetExpr, Statement, Visit, Visitor,
};
use sqlparser::dialect::DuckDbDialect;
use sqlparser::parser::Parser;
use std::collections::HashSet;
use std::ops::ControlFlow;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CheckError {
    #[error("generated SQL does not parse: {0}")]
    Syntax(String),
    #[error("expected exactly one statement, found {0}")]
    StatementCount(usize),
    #[error("only read-only queries may run, got {0}")]
    NotReadOnly(String),
    #[error("query references unknown table {0}")]
    UnknownTable(String),
}

/// Gate between the model and the database: one statement, read-only,
/// touching only known tables.
#[derive(Debug, Clone, Default)]
pub struct QueryChecker {
    known_tables: Option<HashSet<String>>,
}

impl QueryChecker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_known_tables<I, S>(tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            known_tables: Some(tables.into_iter().map(|t| t.as_ref().to_lowercase()).collect()),
        }
    }

    pub fn check(&self, sql: &str) -> Result<(), CheckError> {
        let statements = Parser::parse_sql(&DuckDbDialect {}, sql)
            .map_err(|e| CheckError::Syntax(e.to_string()))?;

        let statement = match statements.as_slice() {
            [statement] => statement,
            other => return Err(CheckError::StatementCount(other.len())),
        };

        let Statement::Query(query) = statement else {
            return Err(CheckError::NotReadOnly(leading_keyword(statement)));
        };
        if !is_read_only(&query.body) {
            return Err(CheckError::NotReadOnly(leading_keyword(statement)));
        }

        if let Some(known) = &self.known_tables {
            let mut ctes = CteNames::default();
            let _ = statement.visit(&mut ctes);

            let unknown = visit_relations(statement, |relation| {
                let table = bare_name(relation);
                if known.contains(&table) || ctes.0.contains(&table) {
                    ControlFlow::Continue(())
                } else {
                    ControlFlow::Break(relation.to_string())
                }
            });
            if let ControlFlow::Break(table) = unknown {
                return Err(CheckError::UnknownTable(table));
            }
        }

        debug!("Query passed checks");
        Ok(())
    }
}

/// CTE aliases declared anywhere in the statement, lower-cased.
#[derive(Default)]
struct CteNames(HashSet<String>);

impl Visitor for CteNames {
    type Break = ();

    fn pre_visit_query(&mut self, query: &Query) -> ControlFlow<Self::Break> {
        if let Some(with) = &query.with {
            self.0.extend(
                with.cte_tables
                    .iter()
                    .map(|cte| cte.alias.name.value.to_lowercase()),
            );
        }
        ControlFlow::Continue(())
    }
}

fn is_read_only(body: &SetExpr) -> bool {
    match body {
        SetExpr::Select(_) | SetExpr::Values(_) | SetExpr::Table(_) => true,
        SetExpr::Query(query) => is_read_only(&query.body),
        SetExpr::SetOperation { left, right, .. } => is_read_only(left) && is_read_only(right),
        _ => false,
    }
}

fn leading_keyword(statement: &Statement) -> String {
    statement
        .to_string()
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_uppercase()
}

/// Unquoted value of the last name part, lower-cased: `"dbo"."Patients"` -> `patients`.
fn bare_name(relation: &ObjectName) -> String {
    relation
        .0
        .last()
        .and_then(|part| part.as_ident())
        .map(|ident| ident.value.to_lowercase())
        .unwrap_or_default()
}
