//! Orchestrator: the bounded generate → validate → review → execute loop.
//!
//! Each question runs through a strictly ordered pipeline with failure edges
//! back to generation, up to a fixed attempt budget. Exhaustion surfaces to
//! the user only as a clarification request; candidate SQL and validator
//! output go to the operator log, never into the reply.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::AgentError;
use crate::format::{format_rows, ResponseShape};
use crate::generator::{GeneratedSql, SqlGenerator};
use crate::ports::{QueryGateway, Row};
use crate::reviewer::{ReviewVerdict, SqlReviewer};
use crate::schema::SchemaContext;
use crate::validator::{sanitize_for_logging, validate_sql, QueryPolicy, SyntaxReport};

/// Tunable policy knobs of the retry loop. The confidence thresholds are
/// heuristic policy parameters, not calibrated probabilities.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub max_attempts: usize,
    /// Server-side cap, also passed to the gateway.
    pub max_rows: i64,
    /// A verdict is only honored as approval at or above this confidence.
    pub approve_confidence: u8,
    /// Rejections at or above this confidence may contribute a fix hint;
    /// below it the loop aborts rather than spending more model calls.
    pub fix_confidence: u8,
    pub max_joins: usize,
    pub max_query_length: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            max_rows: 100,
            approve_confidence: 95,
            fix_confidence: 80,
            max_joins: 3,
            max_query_length: 2000,
        }
    }
}

/// Pipeline stage where an attempt died.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureStage {
    Generation,
    SyntaxCheck,
    SemanticReview,
    Execution,
}

/// One iteration of the retry loop, kept for audit and tests.
#[derive(Debug, Clone)]
pub struct Attempt {
    pub number: usize,
    pub candidate: Option<GeneratedSql>,
    pub syntax: Option<SyntaxReport>,
    pub review: Option<ReviewVerdict>,
    pub failure: Option<(FailureStage, String)>,
}

impl Attempt {
    fn new(number: usize) -> Self {
        Self {
            number,
            candidate: None,
            syntax: None,
            review: None,
            failure: None,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.failure.is_none()
    }
}

/// Successful answer to a question.
#[derive(Debug, Clone, Serialize)]
pub struct QueryAnswer {
    pub message: String,
    pub rows: Vec<Row>,
    pub explanation: String,
}

/// Terminal outcome of one question-answering invocation.
#[derive(Debug, Clone)]
pub enum AnswerOutcome {
    Answer(QueryAnswer),
    /// Attempt budget exhausted; generic user-facing message only.
    Clarification { message: String },
}

impl AnswerOutcome {
    pub fn is_clarification(&self) -> bool {
        matches!(self, Self::Clarification { .. })
    }

    pub fn as_answer(&self) -> Option<&QueryAnswer> {
        match self {
            Self::Answer(answer) => Some(answer),
            _ => None,
        }
    }
}

const CLARIFY_MESSAGE: &str = "No pude entender tu consulta. ¿Puedes reformularla? \
Por ejemplo: \"cuánto me debe Juan\" o \"préstamos vencidos\".";

/// Drives generator, validators and gateway for one question at a time.
/// Holds no cross-request state; invocations may run concurrently.
pub struct SqlAgent {
    generator: SqlGenerator,
    reviewer: SqlReviewer,
    gateway: Arc<dyn QueryGateway>,
    config: AgentConfig,
}

impl SqlAgent {
    pub fn new(generator: SqlGenerator, reviewer: SqlReviewer, gateway: Arc<dyn QueryGateway>) -> Self {
        Self::with_config(generator, reviewer, gateway, AgentConfig::default())
    }

    pub fn with_config(
        generator: SqlGenerator,
        reviewer: SqlReviewer,
        gateway: Arc<dyn QueryGateway>,
        config: AgentConfig,
    ) -> Self {
        Self {
            generator,
            reviewer,
            gateway,
            config,
        }
    }

    /// Answer a question. Never returns a raw error to the conversation
    /// layer: every failure path ends in a clarification request.
    pub async fn answer(
        &self,
        question: &str,
        context: &SchemaContext,
        shape: ResponseShape,
    ) -> AnswerOutcome {
        let (outcome, _attempts) = self.run(question, context, shape).await;
        outcome
    }

    /// Same as [`answer`], also returning the attempt log.
    pub async fn run(
        &self,
        question: &str,
        context: &SchemaContext,
        shape: ResponseShape,
    ) -> (AnswerOutcome, Vec<Attempt>) {
        let policy = QueryPolicy {
            required_tenant_id: context.tenant_id.to_string(),
            max_joins: self.config.max_joins,
            max_length: self.config.max_query_length,
        };

        let mut attempts: Vec<Attempt> = Vec::new();
        let mut feedback: Option<String> = None;
        let mut abort = false;

        while attempts.len() < self.config.max_attempts && !abort {
            let number = attempts.len();
            let mut attempt = Attempt::new(number);
            tracing::info!(attempt = number, "starting generation attempt");

            // GENERATE
            let candidate = match self
                .generator
                .generate(question, context, feedback.as_deref())
                .await
            {
                Ok(candidate) => candidate,
                Err(e) => {
                    tracing::warn!(attempt = number, error = %e, "generation failed");
                    feedback = Some(
                        "The previous attempt did not produce a parseable response. \
                         Return a single JSON object with \"sql\" and \"explanation\"."
                            .to_string(),
                    );
                    attempt.failure = Some((FailureStage::Generation, e.to_string()));
                    attempts.push(attempt);
                    continue;
                }
            };
            attempt.candidate = Some(candidate.clone());

            // SYNTAX_CHECK
            let syntax = validate_sql(&candidate.sql, &policy);
            for warning in &syntax.warnings {
                tracing::warn!(attempt = number, warning = %warning, "syntax validator warning");
            }
            attempt.syntax = Some(syntax.clone());
            if !syntax.valid {
                let joined = syntax.errors.join("; ");
                tracing::warn!(
                    attempt = number,
                    errors = %joined,
                    candidate = %sanitize_for_logging(&candidate.sql),
                    "syntax validation rejected candidate"
                );
                feedback = Some(joined.clone());
                attempt.failure = Some((FailureStage::SyntaxCheck, joined));
                attempts.push(attempt);
                continue;
            }

            // SEMANTIC_CHECK
            let verdict = self.reviewer.review(&candidate.sql, context, question).await;
            attempt.review = Some(verdict.clone());
            // The approval gate is re-derived here; the reviewer's raw flag
            // is untrusted input.
            let approved = verdict.approved && verdict.confidence >= self.config.approve_confidence;
            if !approved {
                let issues = verdict.issues.join("; ");
                tracing::warn!(
                    attempt = number,
                    confidence = verdict.confidence,
                    raw_approved = verdict.approved,
                    issues = %issues,
                    candidate = %sanitize_for_logging(&candidate.sql),
                    "semantic review rejected candidate"
                );
                if verdict.confidence >= self.config.fix_confidence {
                    feedback = Some(match &verdict.suggested_fix {
                        Some(fix) => format!(
                            "A security review rejected the query: {issues}. Suggested fix:\n{fix}"
                        ),
                        None => format!("A security review rejected the query: {issues}"),
                    });
                } else {
                    // Stubbornly low confidence: stop spending model calls.
                    abort = true;
                }
                attempt.failure = Some((FailureStage::SemanticReview, issues));
                attempts.push(attempt);
                continue;
            }

            // Defense in depth: the syntax rules run once more on the
            // approved text before anything reaches the database.
            let recheck = validate_sql(&candidate.sql, &policy);
            if !recheck.valid {
                let joined = recheck.errors.join("; ");
                feedback = Some(joined.clone());
                attempt.failure = Some((FailureStage::SyntaxCheck, joined));
                attempts.push(attempt);
                continue;
            }

            // EXECUTE
            match self
                .gateway
                .execute_readonly(&candidate.sql, self.config.max_rows)
                .await
            {
                Ok(result) => {
                    tracing::info!(
                        attempt = number,
                        row_count = result.rows.len(),
                        complexity = %candidate.complexity,
                        "query executed"
                    );
                    let message = format_rows(shape, &result.rows);
                    attempts.push(attempt);
                    return (
                        AnswerOutcome::Answer(QueryAnswer {
                            message,
                            rows: result.rows,
                            explanation: candidate.explanation.clone(),
                        }),
                        attempts,
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        attempt = number,
                        error = %e,
                        candidate = %sanitize_for_logging(&candidate.sql),
                        "execution failed"
                    );
                    feedback = Some(format!("The database rejected the query: {e}"));
                    attempt.failure = Some((FailureStage::Execution, e.to_string()));
                    attempts.push(attempt);
                    continue;
                }
            }
        }

        tracing::info!(
            attempt_count = attempts.len(),
            aborted = abort,
            "attempt budget exhausted, asking for clarification"
        );
        (
            AnswerOutcome::Clarification {
                message: CLARIFY_MESSAGE.to_string(),
            },
            attempts,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_client::LlmClient;
    use crate::ports::ExecutionResult;
    use crate::schema::{allowed_tables, scope_rules, worked_examples, Contact, SchemaContext};
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use uuid::Uuid;

    const TENANT: &str = "11111111-2222-3333-4444-555555555555";
    const CALLER: &str = "aaaaaaaa-bbbb-cccc-dddd-eeeeeeeeeeee";

    fn context() -> SchemaContext {
        let tenant: Uuid = TENANT.parse().unwrap();
        let caller: Uuid = CALLER.parse().unwrap();
        SchemaContext {
            tables: allowed_tables(),
            scope_rules: scope_rules(tenant, caller),
            tenant_id: tenant,
            caller_contact_id: caller,
            contacts: vec![Contact {
                id: Uuid::new_v4(),
                name: "Caty".to_string(),
            }],
            examples: worked_examples(tenant, caller),
            current_date: NaiveDate::from_ymd_opt(2026, 8, 7).unwrap(),
        }
    }

    fn good_sql() -> String {
        format!(
            "SELECT SUM(amount) AS total_owed FROM agreements WHERE tenant_id = '{TENANT}' \
             AND type = 'loan' AND status = 'active' AND lender_tenant_contact_id = '{CALLER}'"
        )
    }

    fn generation_json(sql: &str) -> String {
        serde_json::json!({ "sql": sql, "explanation": "suma de préstamos activos" }).to_string()
    }

    fn verdict_json(approved: bool, confidence: u8, fix: Option<&str>) -> String {
        serde_json::json!({
            "approved": approved,
            "confidence": confidence,
            "issues": if approved { vec![] } else { vec!["direction looks wrong"] },
            "suggested_fix": fix,
            "reasoning": "test verdict"
        })
        .to_string()
    }

    /// Pops one canned response per call.
    struct ScriptedClient {
        responses: Mutex<VecDeque<String>>,
    }

    impl ScriptedClient {
        fn new(responses: Vec<String>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
            })
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedClient {
        async fn chat(&self, _system: &str, _user: &str) -> anyhow::Result<String> {
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| anyhow::anyhow!("script exhausted"))
        }
        async fn chat_json(&self, system: &str, user: &str) -> anyhow::Result<String> {
            self.chat(system, user).await
        }
        fn model_name(&self) -> &str {
            "scripted"
        }
        fn provider_name(&self) -> &str {
            "test"
        }
    }

    struct StaticGateway {
        rows: Vec<Row>,
        calls: AtomicUsize,
        fail_first: bool,
    }

    impl StaticGateway {
        fn ok(rows: Vec<Row>) -> Arc<Self> {
            Arc::new(Self {
                rows,
                calls: AtomicUsize::new(0),
                fail_first: false,
            })
        }

        fn failing_then_ok(rows: Vec<Row>) -> Arc<Self> {
            Arc::new(Self {
                rows,
                calls: AtomicUsize::new(0),
                fail_first: true,
            })
        }
    }

    #[async_trait]
    impl QueryGateway for StaticGateway {
        async fn execute_readonly(&self, _sql: &str, max_rows: i64) -> crate::error::Result<ExecutionResult> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_first && call == 0 {
                return Err(AgentError::Execution("column \"amout\" does not exist".into()));
            }
            let rows = self.rows.iter().take(max_rows as usize).cloned().collect();
            Ok(ExecutionResult { rows })
        }
    }

    fn money_row(total: i64) -> Row {
        let mut row = Row::new();
        row.insert("total_owed".to_string(), serde_json::json!(total));
        row
    }

    fn agent(
        generator_responses: Vec<String>,
        reviewer_responses: Vec<String>,
        gateway: Arc<StaticGateway>,
    ) -> SqlAgent {
        SqlAgent::new(
            SqlGenerator::with_client(ScriptedClient::new(generator_responses)),
            SqlReviewer::with_client(ScriptedClient::new(reviewer_responses)),
            gateway,
        )
    }

    #[tokio::test]
    async fn test_happy_path_single_attempt() {
        let gateway = StaticGateway::ok(vec![money_row(50000)]);
        let agent = agent(
            vec![generation_json(&good_sql())],
            vec![verdict_json(true, 97, None)],
            gateway.clone(),
        );
        let (outcome, attempts) = agent
            .run("cuánto me deben", &context(), ResponseShape::SingleValue)
            .await;

        let answer = outcome.as_answer().expect("expected an answer");
        assert!(answer.message.contains("$50.000"));
        assert_eq!(answer.rows.len(), 1);
        assert_eq!(attempts.len(), 1);
        assert!(attempts[0].succeeded());
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_approval_below_gate_is_not_honored() {
        // Reviewer claims approved=true at confidence 80 three times; the
        // orchestrator must clamp every one of them.
        let gateway = StaticGateway::ok(vec![money_row(1)]);
        let agent = agent(
            vec![
                generation_json(&good_sql()),
                generation_json(&good_sql()),
                generation_json(&good_sql()),
            ],
            vec![
                verdict_json(true, 80, None),
                verdict_json(true, 80, None),
                verdict_json(true, 80, None),
            ],
            gateway.clone(),
        );
        let (outcome, attempts) = agent
            .run("cuánto me deben", &context(), ResponseShape::SingleValue)
            .await;

        assert!(outcome.is_clarification());
        assert_eq!(attempts.len(), 3);
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 0, "never reached execution");
        for attempt in &attempts {
            assert_eq!(attempt.failure.as_ref().unwrap().0, FailureStage::SemanticReview);
        }
    }

    #[tokio::test]
    async fn test_three_syntax_failures_exhaust_budget() {
        // Candidate lacks the tenant filter every time.
        let bad = "SELECT * FROM agreements".to_string();
        let gateway = StaticGateway::ok(vec![]);
        let agent = agent(
            vec![
                generation_json(&bad),
                generation_json(&bad),
                generation_json(&bad),
            ],
            vec![],
            gateway.clone(),
        );
        let (outcome, attempts) = agent
            .run("cuánto me deben", &context(), ResponseShape::List)
            .await;

        match outcome {
            AnswerOutcome::Clarification { message } => {
                // Generic text only: no SQL, no validator internals.
                assert!(!message.contains("SELECT"));
                assert!(!message.contains("tenant_id"));
            }
            AnswerOutcome::Answer(_) => panic!("expected clarification"),
        }
        assert_eq!(attempts.len(), 3);
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 0);
        assert!(attempts
            .iter()
            .all(|a| a.failure.as_ref().unwrap().0 == FailureStage::SyntaxCheck));
    }

    #[tokio::test]
    async fn test_stacked_statement_never_reaches_execution() {
        let injection = format!(
            "SELECT * FROM agreements WHERE tenant_id = '{TENANT}'; DROP TABLE agreements;"
        );
        let gateway = StaticGateway::ok(vec![]);
        let agent = agent(
            vec![generation_json(&injection)],
            vec![],
            gateway.clone(),
        );
        let (outcome, attempts) = agent
            .run("cuánto me deben", &context(), ResponseShape::List)
            .await;

        assert!(outcome.is_clarification());
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 0);
        let (stage, reason) = attempts[0].failure.as_ref().unwrap();
        assert_eq!(*stage, FailureStage::SyntaxCheck);
        assert!(reason.contains("multiple statements"));
    }

    #[tokio::test]
    async fn test_execution_error_is_retried() {
        let gateway = StaticGateway::failing_then_ok(vec![money_row(7000)]);
        let agent = agent(
            vec![generation_json(&good_sql()), generation_json(&good_sql())],
            vec![verdict_json(true, 96, None), verdict_json(true, 96, None)],
            gateway.clone(),
        );
        let (outcome, attempts) = agent
            .run("cuánto me deben", &context(), ResponseShape::SingleValue)
            .await;

        assert!(outcome.as_answer().is_some());
        assert_eq!(attempts.len(), 2);
        assert_eq!(attempts[0].failure.as_ref().unwrap().0, FailureStage::Execution);
        assert!(attempts[1].succeeded());
    }

    #[tokio::test]
    async fn test_low_confidence_rejection_aborts_early() {
        let gateway = StaticGateway::ok(vec![]);
        let agent = agent(
            vec![generation_json(&good_sql())],
            vec![verdict_json(false, 40, None)],
            gateway.clone(),
        );
        let (outcome, attempts) = agent
            .run("cuánto me deben", &context(), ResponseShape::List)
            .await;

        assert!(outcome.is_clarification());
        // One attempt spent, no further generation on a hopeless path.
        assert_eq!(attempts.len(), 1);
    }

    #[tokio::test]
    async fn test_mid_band_rejection_feeds_fix_into_retry() {
        let gateway = StaticGateway::ok(vec![money_row(12000)]);
        let agent = agent(
            vec![generation_json(&good_sql()), generation_json(&good_sql())],
            vec![
                verdict_json(false, 85, Some("use lender_tenant_contact_id")),
                verdict_json(true, 98, None),
            ],
            gateway.clone(),
        );
        let (outcome, attempts) = agent
            .run("cuánto me deben", &context(), ResponseShape::SingleValue)
            .await;

        assert!(outcome.as_answer().is_some());
        assert_eq!(attempts.len(), 2);
        assert_eq!(
            attempts[0].failure.as_ref().unwrap().0,
            FailureStage::SemanticReview
        );
    }

    #[tokio::test]
    async fn test_unparsable_generation_is_retried() {
        let gateway = StaticGateway::ok(vec![money_row(100)]);
        let agent = agent(
            vec!["not json at all".to_string(), generation_json(&good_sql())],
            vec![verdict_json(true, 99, None)],
            gateway.clone(),
        );
        let (outcome, attempts) = agent
            .run("cuánto me deben", &context(), ResponseShape::SingleValue)
            .await;

        assert!(outcome.as_answer().is_some());
        assert_eq!(attempts.len(), 2);
        assert_eq!(
            attempts[0].failure.as_ref().unwrap().0,
            FailureStage::Generation
        );
    }

    #[tokio::test]
    async fn test_row_cap_is_enforced() {
        let rows: Vec<Row> = (0..500i64).map(money_row).collect();
        let gateway = StaticGateway::ok(rows);
        let agent = agent(
            vec![generation_json(&good_sql())],
            vec![verdict_json(true, 96, None)],
            gateway,
        );
        let (outcome, _) = agent
            .run("cuánto me deben", &context(), ResponseShape::List)
            .await;
        let answer = outcome.as_answer().unwrap();
        assert!(answer.rows.len() <= AgentConfig::default().max_rows as usize);
    }
}
