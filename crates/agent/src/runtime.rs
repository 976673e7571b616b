//! The repair loop: generate, repair heuristically, vet, execute, and feed
//! failures back to the model until a statement runs or the budget is spent.

use std::sync::Arc;
use std::time::Duration;

use textsql_core::config::{AppConfig, PipelineConfig};
use textsql_core::domain::candidate::Candidate;
use textsql_core::domain::diagnostic::{DiagnosticEntry, DiagnosticEvent, DiagnosticHistory};
use textsql_core::domain::execution::{ExecutionError, ExecutionErrorClass, ExecutionOutcome, ResultSet};
use textsql_core::domain::prompt::CustomerId;
use textsql_core::domain::schema::{ConnectionRef, KnownIdentifiers, SchemaDescription};
use textsql_core::errors::{ApplicationError, ConnectivityError, DomainError};
use textsql_core::ports::{ExecutionAdapter, SchemaDescriptor};
use textsql_core::sql::HeuristicRepairer;
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::generation::{preview, GenerationClient, GenerationFailure, GenerationInput};
use crate::guardrails::{ApprovedCandidate, GuardrailDecision, ReadOnlyPolicy};

#[derive(Clone, Debug, PartialEq)]
pub struct RuntimeSettings {
    /// Total rounds per question, the first generation included.
    pub retry_budget: u32,
    pub similarity_threshold: f64,
    pub generation_timeout: Duration,
    pub execution_timeout: Duration,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self::from_pipeline(&AppConfig::default().pipeline)
    }
}

impl RuntimeSettings {
    pub fn from_pipeline(pipeline: &PipelineConfig) -> Self {
        Self {
            retry_budget: pipeline.retry_budget,
            similarity_threshold: pipeline.similarity_threshold,
            generation_timeout: Duration::from_secs(pipeline.generation_timeout_secs),
            execution_timeout: Duration::from_secs(pipeline.execution_timeout_secs),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueryRequest {
    pub question: String,
    pub connection: ConnectionRef,
    pub customer: Option<CustomerId>,
    /// Overrides the configured budget for this request only.
    pub retry_budget: Option<u32>,
    pub correlation_id: Option<String>,
}

impl QueryRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            connection: ConnectionRef::default(),
            customer: None,
            retry_budget: None,
            correlation_id: None,
        }
    }

    pub fn with_connection(mut self, connection: ConnectionRef) -> Self {
        self.connection = connection;
        self
    }

    pub fn with_customer(mut self, customer: CustomerId) -> Self {
        self.customer = Some(customer);
        self
    }

    pub fn with_retry_budget(mut self, retry_budget: u32) -> Self {
        self.retry_budget = Some(retry_budget);
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct QuerySuccess {
    pub correlation_id: String,
    /// The statement that ran.
    pub candidate: Candidate,
    pub result: ResultSet,
    pub history: DiagnosticHistory,
}

impl QuerySuccess {
    pub fn sql(&self) -> &str {
        self.candidate.sql()
    }

    pub fn columns(&self) -> &[String] {
        &self.result.columns
    }

    pub fn rounds_used(&self) -> usize {
        self.history.len()
    }
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum QueryFailure {
    #[error(transparent)]
    InvalidRequest(DomainError),
    #[error("no safe, executable SQL was produced within {rounds} round(s)")]
    BudgetExhausted { correlation_id: String, rounds: u32, history: DiagnosticHistory },
    #[error(transparent)]
    Connectivity(ConnectivityError),
}

impl QueryFailure {
    pub fn history(&self) -> Option<&DiagnosticHistory> {
        match self {
            Self::BudgetExhausted { history, .. } => Some(history),
            Self::InvalidRequest(_) | Self::Connectivity(_) => None,
        }
    }

    pub fn into_application_error(self) -> ApplicationError {
        match self {
            Self::InvalidRequest(error) => ApplicationError::Domain(error),
            Self::BudgetExhausted { rounds, .. } => ApplicationError::BudgetExhausted { rounds },
            Self::Connectivity(error) => ApplicationError::Connectivity(error),
        }
    }
}

/// Mutable state of one question, owned by the task running it.
struct RepairSession<'a> {
    correlation_id: String,
    input: GenerationInput<'a>,
    known: KnownIdentifiers,
    history: DiagnosticHistory,
    remaining: u32,
    next_round: u32,
}

impl RepairSession<'_> {
    /// Spends one unit of budget, returning the round it pays for.
    fn begin_round(&mut self) -> Option<u32> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let round = self.next_round;
        self.next_round += 1;
        Some(round)
    }

    fn record(&mut self, round: u32, candidate: Option<Candidate>, event: DiagnosticEvent) {
        self.history.record(DiagnosticEntry::new(round, candidate, event));
    }
}

pub struct AgentRuntime {
    generation: GenerationClient,
    schema: Arc<dyn SchemaDescriptor>,
    executor: Arc<dyn ExecutionAdapter>,
    guardrails: ReadOnlyPolicy,
    repairer: HeuristicRepairer,
    settings: RuntimeSettings,
}

impl AgentRuntime {
    pub fn new(
        generation: GenerationClient,
        schema: Arc<dyn SchemaDescriptor>,
        executor: Arc<dyn ExecutionAdapter>,
        settings: RuntimeSettings,
    ) -> Self {
        Self {
            generation,
            schema,
            executor,
            guardrails: ReadOnlyPolicy::default(),
            repairer: HeuristicRepairer::new(settings.similarity_threshold),
            settings,
        }
    }

    pub fn with_guardrails(mut self, guardrails: ReadOnlyPolicy) -> Self {
        self.guardrails = guardrails;
        self
    }

    pub fn settings(&self) -> &RuntimeSettings {
        &self.settings
    }

    pub fn guardrails(&self) -> &ReadOnlyPolicy {
        &self.guardrails
    }

    pub fn repairer(&self) -> &HeuristicRepairer {
        &self.repairer
    }

    /// Runs one question to completion. Dropping the returned future abandons
    /// the session; nothing is executed after cancellation.
    pub async fn run_query(&self, request: QueryRequest) -> Result<QuerySuccess, QueryFailure> {
        let correlation_id =
            request.correlation_id.clone().unwrap_or_else(|| Uuid::new_v4().to_string());
        let question = request.question.trim();
        if question.is_empty() {
            return Err(QueryFailure::InvalidRequest(DomainError::EmptyQuestion));
        }

        let schema = self.schema.describe(&request.connection).await.map_err(|error| {
            warn!(
                event_name = "agent.session.connectivity_failed",
                correlation_id = %correlation_id,
                connection = %request.connection,
                error = %error,
                "schema unavailable, skipping repair loop"
            );
            QueryFailure::Connectivity(error)
        })?;

        let budget = request.retry_budget.unwrap_or(self.settings.retry_budget);
        info!(
            event_name = "agent.session.started",
            correlation_id = %correlation_id,
            connection = %request.connection,
            retry_budget = budget,
            tables = schema.tables.len(),
            "starting query session"
        );

        let mut session = RepairSession {
            correlation_id,
            input: GenerationInput {
                question,
                schema: schema.as_ref(),
                customer: request.customer.as_ref(),
            },
            known: schema.identifiers(),
            history: DiagnosticHistory::new(),
            remaining: budget,
            next_round: 0,
        };

        self.drive(&mut session, &request.connection).await
    }

    async fn drive(
        &self,
        session: &mut RepairSession<'_>,
        connection: &ConnectionRef,
    ) -> Result<QuerySuccess, QueryFailure> {
        while let Some(round) = session.begin_round() {
            let proposed = match self.propose(session, round).await {
                Ok(candidate) => candidate,
                Err(failure) => {
                    warn!(
                        event_name = "agent.round.generation_failed",
                        correlation_id = %session.correlation_id,
                        round,
                        error = %failure,
                        "model produced no usable sql"
                    );
                    session.record(
                        round,
                        None,
                        DiagnosticEvent::GenerationFailed { message: failure.to_string() },
                    );
                    continue;
                }
            };

            let (candidate, corrections) = self.repairer.repair_candidate(&proposed, &session.known);
            if !corrections.is_empty() {
                debug!(
                    event_name = "agent.round.heuristic_repair",
                    correlation_id = %session.correlation_id,
                    round,
                    corrections = corrections.len(),
                    sql = %preview(candidate.sql()),
                    "applied heuristic corrections"
                );
            }

            let approved = match self.guardrails.vet(&candidate) {
                GuardrailDecision::Allow(approved) => approved,
                GuardrailDecision::Deny(rejection) => {
                    warn!(
                        event_name = "agent.round.rejected",
                        correlation_id = %session.correlation_id,
                        round,
                        reason = rejection.reason.as_str(),
                        sql = %preview(candidate.sql()),
                        "candidate rejected by read-only policy"
                    );
                    session.record(
                        round,
                        Some(candidate),
                        DiagnosticEvent::Rejected {
                            reason: rejection.reason,
                            fragment: rejection.fragment,
                        },
                    );
                    continue;
                }
            };

            match self.execute(&approved, connection).await {
                ExecutionOutcome::Success(result) => {
                    info!(
                        event_name = "agent.round.executed",
                        correlation_id = %session.correlation_id,
                        round,
                        rows = result.row_count(),
                        truncated = result.truncated,
                        "query succeeded"
                    );
                    session.record(
                        round,
                        Some(approved.candidate().clone()),
                        DiagnosticEvent::Executed { row_count: result.row_count() },
                    );
                    return Ok(QuerySuccess {
                        correlation_id: session.correlation_id.clone(),
                        candidate: approved.into_inner(),
                        result,
                        history: std::mem::take(&mut session.history),
                    });
                }
                ExecutionOutcome::Failure(error) => {
                    warn!(
                        event_name = "agent.round.execution_failed",
                        correlation_id = %session.correlation_id,
                        round,
                        error_class = error.class.as_str(),
                        error = %error.message,
                        "approved candidate failed to execute"
                    );
                    session.record(
                        round,
                        Some(approved.into_inner()),
                        DiagnosticEvent::ExecutionFailed { message: error.message, class: error.class },
                    );
                }
            }
        }

        warn!(
            event_name = "agent.session.exhausted",
            correlation_id = %session.correlation_id,
            rounds = session.next_round,
            "retry budget exhausted"
        );
        Err(QueryFailure::BudgetExhausted {
            correlation_id: session.correlation_id.clone(),
            rounds: session.next_round,
            history: std::mem::take(&mut session.history),
        })
    }

    /// Fresh generation until some round yields a candidate, LLM repair of the
    /// latest candidate afterwards.
    async fn propose(
        &self,
        session: &RepairSession<'_>,
        round: u32,
    ) -> Result<Candidate, GenerationFailure> {
        let limit = self.settings.generation_timeout;
        let input = session.input;
        let attempt = async {
            match session.history.last_candidate() {
                None => {
                    let generated = self.generation.generate(input).await?;
                    if round == 0 {
                        Ok(generated)
                    } else {
                        Ok(Candidate::regenerated(generated.sql(), round))
                    }
                }
                Some((prior, event)) => {
                    let diagnostic = event.feedback().unwrap_or_default();
                    self.generation.repair(input, prior, &diagnostic, round).await
                }
            }
        };

        timeout(limit, attempt)
            .await
            .unwrap_or(Err(GenerationFailure::Timeout { millis: limit.as_millis() }))
    }

    async fn execute(&self, approved: &ApprovedCandidate, connection: &ConnectionRef) -> ExecutionOutcome {
        let limit = self.settings.execution_timeout;
        match timeout(limit, self.executor.run(approved.sql(), connection)).await {
            Ok(outcome) => outcome,
            Err(_) => ExecutionOutcome::Failure(ExecutionError::new(
                format!("statement timed out after {} ms", limit.as_millis()),
                ExecutionErrorClass::Timeout,
            )),
        }
    }

    /// Describes `connection` for callers that need the schema outside a session.
    pub async fn describe(
        &self,
        connection: &ConnectionRef,
    ) -> Result<Arc<SchemaDescription>, ConnectivityError> {
        self.schema.describe(connection).await
    }
}
