//! One-shot harness: run a single question end-to-end against the
//! configured database and LLM backend.
//!
//! ```text
//! ask --tenant <uuid> --caller <uuid> --shape list "préstamos vencidos"
//! ```

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use presta_agentic::agent::{AnswerOutcome, SqlAgent};
use presta_agentic::context::ContextProvider;
use presta_agentic::format::ResponseShape;
use presta_agentic::generator::SqlGenerator;
use presta_agentic::reviewer::SqlReviewer;
use presta_bot::{BotConfig, BotService};
use presta_postgres::{PgActionAudit, PgContactDirectory, PgQueryGateway};

#[derive(Parser)]
#[command(name = "ask", about = "Ask the loan bot one question")]
struct Args {
    /// Natural-language question
    question: String,

    /// Tenant id the query is scoped to
    #[arg(long)]
    tenant: Uuid,

    /// Caller's contact id within the tenant
    #[arg(long)]
    caller: Uuid,

    /// Expected answer shape: single_value, list, aggregation, comparison
    #[arg(long, default_value = "single_value")]
    shape: ResponseShape,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let config = BotConfig::from_env()?;
    tracing::info!(backend = %config.backend, "starting query harness");

    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&config.database_url)
        .await?;

    let service = BotService::new(
        ContextProvider::new(Arc::new(PgContactDirectory::new(pool.clone()))),
        SqlAgent::new(
            SqlGenerator::from_env()?,
            SqlReviewer::from_env()?,
            Arc::new(PgQueryGateway::new(pool.clone())),
        ),
        Arc::new(PgActionAudit::new(pool)),
    );

    let outcome = service
        .answer_question(args.tenant, args.caller, &args.question, args.shape)
        .await?;

    match outcome {
        AnswerOutcome::Answer(answer) => {
            println!("{}", answer.message);
            println!("\n({})", answer.explanation);
        }
        AnswerOutcome::Clarification { message } => {
            println!("{message}");
        }
    }

    Ok(())
}
