use crate::config::DatabaseConfig;
use duckdb::Connection;
use r2d2::{ManageConnection, Pool};
use std::path::Path;
use tracing::info;

pub struct DuckDBConnectionManager {
    connection_string: String,
}

impl DuckDBConnectionManager {
    pub fn new(connection_string: String) -> Self {
        Self { connection_string }
    }

    pub fn is_in_memory(&self) -> bool {
        self.connection_string == ":memory:"
    }
}

impl ManageConnection for DuckDBConnectionManager {
    type Connection = Connection;
    type Error = duckdb::Error;

    fn connect(&self) -> Result<Self::Connection, Self::Error> {
        if self.is_in_memory() {
            Connection::open_in_memory()
        } else {
            Connection::open(&self.connection_string)
        }
    }

    fn is_valid(&self, conn: &mut Self::Connection) -> Result<(), Self::Error> {
        conn.execute("SELECT 1", [])?;
        Ok(())
    }

    fn has_broken(&self, _conn: &mut Self::Connection) -> bool {
        false
    }
}

/// Builds the process-wide pool. Every in-memory connection is its own
/// database, so `:memory:` only makes sense with a pool size of one, and
/// that connection must never be recycled.
pub fn build_pool(config: &DatabaseConfig) -> Result<Pool<DuckDBConnectionManager>, r2d2::Error> {
    let manager = DuckDBConnectionManager::new(config.connection_string.clone());
    let mut builder = Pool::builder().max_size(config.pool_size.max(1) as u32);
    if manager.is_in_memory() {
        builder = builder.max_lifetime(None).idle_timeout(None);
    }
    builder.build(manager)
}

/// Runs a SQL batch (DDL and seed data) once at start-up.
pub fn run_init_script(
    pool: &Pool<DuckDBConnectionManager>,
    path: &Path,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let script = std::fs::read_to_string(path)?;
    let conn = pool.get()?;
    conn.execute_batch(&script)?;
    info!("Executed init script {}", path.display());
    Ok(())
}

#[cfg(test)]
pub(crate) fn memory_pool() -> Pool<DuckDBConnectionManager> {
    let config = DatabaseConfig {
        connection_string: ":memory:".to_string(),
        pool_size: 1,
        init_script: None,
    };
    build_pool(&config).unwrap()
}
