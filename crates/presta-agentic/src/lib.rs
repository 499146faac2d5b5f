//! LLM-powered text-to-SQL agent for loan queries
//!
//! This crate turns a natural-language question about informal loans into a
//! validated, tenant-scoped, read-only SQL query and a formatted answer. It
//! has no database dependencies - execution goes through the `QueryGateway`
//! port, implemented elsewhere.
//!
//! ## Architecture
//!
//! ```text
//! Question → SqlGenerator → syntax validation → SqlReviewer → QueryGateway → formatting
//!                ↑                                   │
//!                └───────── bounded retry ───────────┘
//! ```
//!
//! Two independent safety layers sit between the model and the database: a
//! deterministic syntax/policy validator (no model call) and a second-model
//! security review. Both must pass before anything is executed, and the
//! gateway itself only accepts single SELECT statements.
//!
//! ## Backend Selection
//!
//! Set `AGENT_BACKEND` environment variable:
//! - `anthropic` (default): Anthropic Claude API
//! - `openai`: OpenAI API

// LLM client abstraction
pub mod anthropic_client;
pub mod backend;
pub mod client_factory;
pub mod llm_client;
pub mod openai_client;

// Core agent modules
pub mod agent;
pub mod context;
pub mod error;
pub mod format;
pub mod generator;
pub mod ports;
pub mod reviewer;
pub mod schema;
pub mod validator;

// Re-exports for convenience
pub use agent::{AgentConfig, AnswerOutcome, Attempt, QueryAnswer, SqlAgent};
pub use backend::AgentBackend;
pub use client_factory::{create_llm_client, create_review_client};
pub use context::ContextProvider;
pub use error::AgentError;
pub use format::ResponseShape;
pub use generator::{GeneratedSql, SqlGenerator};
pub use llm_client::LlmClient;
pub use ports::{ActionAudit, ContactDirectory, ExecutionResult, QueryGateway, Row};
pub use reviewer::{ReviewVerdict, SqlReviewer};
pub use schema::{Contact, SchemaContext};
pub use validator::{validate_sql, QueryComplexity, QueryPolicy, SyntaxReport};
