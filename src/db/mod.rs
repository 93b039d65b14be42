pub mod checker;
pub mod db_pool;
pub mod executor;
pub mod schema;
