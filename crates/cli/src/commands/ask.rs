use std::sync::Arc;

use serde_json::json;
use textsql_agent::generation::GenerationClient;
use textsql_agent::llm::{HttpLlmClient, LlmClient};
use textsql_agent::prompts::PromptResolver;
use textsql_agent::runtime::{AgentRuntime, QueryFailure, QueryRequest, RuntimeSettings};
use textsql_agent::summary::ResultSummarizer;
use textsql_core::config::AppConfig;
use textsql_core::domain::prompt::CustomerId;
use textsql_core::domain::schema::ConnectionRef;
use textsql_core::ports::PromptStore;
use textsql_db::{
    connect_with_settings, migrations, SchemaCache, SqlPromptRepository, SqliteExecutionAdapter,
    SqliteSchemaDescriptor, TargetRegistry,
};

use crate::commands::{load_config, runtime, CommandResult};

#[derive(Debug, Clone)]
pub struct AskArgs {
    pub question: String,
    pub connection: Option<String>,
    pub customer_id: Option<String>,
    pub retry_budget: Option<u32>,
    pub summarize: bool,
}

pub fn run(args: AskArgs) -> CommandResult {
    let config = match load_config("ask") {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match runtime("ask") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    runtime.block_on(async {
        let (agent, summarizer) = match assemble(&config).await {
            Ok(parts) => parts,
            Err((error_class, message, exit_code)) => {
                return CommandResult::failure("ask", error_class, message, exit_code);
            }
        };
        execute(&agent, args.summarize.then_some(&summarizer), args).await
    })
}

async fn assemble(
    config: &AppConfig,
) -> Result<(AgentRuntime, ResultSummarizer), (&'static str, String, u8)> {
    let pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
    migrations::run_pending(&pool).await.map_err(|error| ("migration", error.to_string(), 5u8))?;

    let targets = TargetRegistry::from_config(&config.target)
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
    let llm: Arc<dyn LlmClient> = Arc::new(
        HttpLlmClient::from_config(&config.llm)
            .map_err(|error| ("llm_client", error.to_string(), 2u8))?,
    );
    let store: Arc<dyn PromptStore> = Arc::new(SqlPromptRepository::new(pool));
    let resolver = PromptResolver::new(store);

    let pipeline = &config.pipeline;
    let agent = AgentRuntime::new(
        GenerationClient::new(llm.clone(), resolver.clone(), pipeline.dialect),
        Arc::new(SchemaCache::new(SqliteSchemaDescriptor::new(
            targets.clone(),
            pipeline.schema_sample_rows,
        ))),
        Arc::new(SqliteExecutionAdapter::new(targets, pipeline.max_result_rows)),
        RuntimeSettings::from_pipeline(pipeline),
    );
    Ok((agent, ResultSummarizer::new(llm, resolver, pipeline.summary_rows)))
}

/// Runs one question through the agent and shapes the outcome as a command result.
pub async fn execute(
    agent: &AgentRuntime,
    summarizer: Option<&ResultSummarizer>,
    args: AskArgs,
) -> CommandResult {
    let customer = args.customer_id.filter(|id| !id.trim().is_empty()).map(CustomerId);
    let mut request = QueryRequest::new(args.question.clone()).with_connection(
        args.connection.as_deref().map(ConnectionRef::new).unwrap_or_default(),
    );
    if let Some(customer) = customer.clone() {
        request = request.with_customer(customer);
    }
    if let Some(budget) = args.retry_budget {
        request = request.with_retry_budget(budget);
    }

    let success = match agent.run_query(request).await {
        Ok(success) => success,
        Err(failure) => return failure_result(failure),
    };

    let summary = match summarizer {
        Some(summarizer) => Some(
            summarizer
                .summarize(&args.question, success.sql(), &success.result, customer.as_ref())
                .await
                .text,
        ),
        None => None,
    };

    let message = summary.clone().unwrap_or_else(|| {
        format!("{} row(s) returned by: {}", success.result.row_count(), success.sql())
    });
    CommandResult::success_with_data(
        "ask",
        message,
        Some(json!({
            "correlation_id": success.correlation_id,
            "sql": success.sql(),
            "columns": success.result.columns,
            "rows": success.result.records(),
            "record_count": success.result.row_count(),
            "truncated": success.result.truncated,
            "summary": summary,
            "rounds": success.rounds_used(),
            "history": success.history,
        })),
    )
}

fn failure_result(failure: QueryFailure) -> CommandResult {
    let history = failure.history().map(|history| json!({ "history": history }));
    let (error_class, exit_code) = match &failure {
        QueryFailure::InvalidRequest(_) => ("invalid_request", 2),
        QueryFailure::Connectivity(_) => ("db_connectivity", 4),
        QueryFailure::BudgetExhausted { .. } => ("budget_exhausted", 7),
    };
    CommandResult::failure_with_data("ask", error_class, failure.to_string(), exit_code, history)
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use serde_json::Value;
    use textsql_agent::generation::GenerationClient;
    use textsql_agent::llm::{LlmClient, LlmError};
    use textsql_agent::prompts::PromptResolver;
    use textsql_agent::runtime::{AgentRuntime, RuntimeSettings};
    use textsql_agent::summary::ResultSummarizer;
    use textsql_core::config::SqlDialect;
    use textsql_core::domain::schema::ConnectionRef;
    use textsql_db::{
        connect_with_settings, SchemaCache, SqliteExecutionAdapter, SqliteSchemaDescriptor,
        TargetRegistry, UniversityDataset,
    };

    use super::{execute, AskArgs};

    struct ScriptedLlm {
        replies: Mutex<VecDeque<&'static str>>,
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn complete(&self, _system_prompt: &str, _user_prompt: &str) -> Result<String, LlmError> {
            self.replies
                .lock()
                .expect("replies lock")
                .pop_front()
                .map(str::to_string)
                .ok_or_else(|| LlmError::Unavailable("script exhausted".to_string()))
        }
    }

    async fn agent(replies: &[&'static str]) -> (AgentRuntime, ResultSummarizer) {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("connect");
        UniversityDataset::load(&pool).await.expect("seed");
        let targets = TargetRegistry::new();
        targets.register(ConnectionRef::default(), pool).await;

        let llm: Arc<dyn LlmClient> =
            Arc::new(ScriptedLlm { replies: Mutex::new(replies.iter().copied().collect()) });
        let agent = AgentRuntime::new(
            GenerationClient::new(llm.clone(), PromptResolver::builtin(), SqlDialect::Sqlite),
            Arc::new(SchemaCache::new(SqliteSchemaDescriptor::new(targets.clone(), 0))),
            Arc::new(SqliteExecutionAdapter::new(targets, 100)),
            RuntimeSettings::default(),
        );
        (agent, ResultSummarizer::new(llm, PromptResolver::builtin(), 5))
    }

    fn args(question: &str, retry_budget: Option<u32>) -> AskArgs {
        AskArgs {
            question: question.to_string(),
            connection: None,
            customer_id: None,
            retry_budget,
            summarize: false,
        }
    }

    fn payload(output: &str) -> Value {
        serde_json::from_str(output).expect("command output should be JSON")
    }

    #[tokio::test]
    async fn answers_with_rows_and_sql() {
        let (agent, _) = agent(&["SELECT name FROM departments ORDER BY name"]).await;

        let result = execute(&agent, None, args("List the departments", None)).await;

        assert_eq!(result.exit_code, 0);
        let payload = payload(&result.output);
        assert_eq!(payload["status"], "ok");
        assert_eq!(payload["data"]["record_count"], 4);
        assert_eq!(payload["data"]["sql"], "SELECT name FROM departments ORDER BY name");
        assert_eq!(payload["data"]["rounds"], 1);
    }

    #[tokio::test]
    async fn summary_becomes_the_message() {
        let (agent, summarizer) =
            agent(&["SELECT name FROM departments", "There are four departments."]).await;

        let result = execute(
            &agent,
            Some(&summarizer),
            AskArgs { summarize: true, ..args("How many departments?", None) },
        )
        .await;

        let payload = payload(&result.output);
        assert!(payload["message"].as_str().unwrap_or_default().starts_with("There are four departments."));
    }

    #[tokio::test]
    async fn exhausted_budget_exits_with_history() {
        let (agent, _) = agent(&["DELETE FROM students", "DELETE FROM students"]).await;

        let result = execute(&agent, None, args("Remove everyone", Some(2))).await;

        assert_eq!(result.exit_code, 7);
        let payload = payload(&result.output);
        assert_eq!(payload["error_class"], "budget_exhausted");
        assert_eq!(payload["data"]["history"].as_array().map(Vec::len), Some(2));
    }

    #[tokio::test]
    async fn blank_question_is_an_invalid_request() {
        let (agent, _) = agent(&[]).await;

        let result = execute(&agent, None, args("   ", None)).await;

        assert_eq!(result.exit_code, 2);
        assert_eq!(payload(&result.output)["error_class"], "invalid_request");
    }
}
