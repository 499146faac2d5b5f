//! Postgres implementations of the agent port traits.
//!
//! Each adapter is a newtype wrapping PgPool. All SQL is runtime-checked
//! (sqlx::query, not sqlx::query!) to avoid a compile-time DB requirement.
//! Generated SQL only ever reaches the database through the
//! `execute_readonly_query` stored function (see migrations/).

mod audit;
mod directory;
mod gateway;

pub use audit::PgActionAudit;
pub use directory::PgContactDirectory;
pub use gateway::PgQueryGateway;
