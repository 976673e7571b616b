//! Agent runtime for text-to-SQL.
//!
//! Turns a natural-language question into a read-only SQL statement and runs it:
//!
//! 1. **Generation** (`generation`, `prompts`, `extraction`) - ask the model for SQL
//!    and pull a single statement out of its reply.
//! 2. **Heuristic repair** - fix misspelled identifiers and unquoted literals
//!    without another model call (`textsql_core::sql::repair`).
//! 3. **Guardrails** (`guardrails`) - the read-only policy. Only an
//!    [`guardrails::ApprovedCandidate`] can reach the database.
//! 4. **Repair loop** (`runtime`) - feed rejections and execution errors back to
//!    the model until a statement runs or the retry budget is spent.
//! 5. **Summary** (`summary`) - describe the rows in plain language.
//!
//! The model only ever proposes SQL. Whether a statement is allowed to run is
//! decided by the deterministic policy in `guardrails`.

pub mod extraction;
pub mod generation;
pub mod guardrails;
pub mod llm;
pub mod prompts;
pub mod runtime;
pub mod summary;

pub use generation::{GenerationClient, GenerationFailure, GenerationInput};
pub use guardrails::{ApprovedCandidate, GuardrailDecision, ReadOnlyPolicy};
pub use llm::{HttpLlmClient, LlmClient, LlmError};
pub use prompts::PromptResolver;
pub use runtime::{AgentRuntime, QueryFailure, QueryRequest, QuerySuccess, RuntimeSettings};
pub use summary::{ResultSummarizer, Summary};
