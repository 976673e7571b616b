use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use textsql_agent::prompts::{builtin_template, render_template, PromptContext};
use textsql_agent::runtime::{AgentRuntime, QueryRequest, QuerySuccess};
use textsql_agent::summary::ResultSummarizer;
use textsql_core::domain::candidate::CandidateSource;
use textsql_core::domain::diagnostic::DiagnosticHistory;
use textsql_core::domain::prompt::{CustomerId, PromptKind, PromptTemplate};
use textsql_core::domain::schema::ConnectionRef;
use textsql_core::errors::{ApplicationError, DomainError, InterfaceError};
use textsql_db::{PromptRepository, SchemaCache, SqliteSchemaDescriptor};
use tracing::{info, warn};
use uuid::Uuid;

const MAX_REQUEST_RETRY_BUDGET: u32 = 10;

#[derive(Clone)]
pub struct ApiState {
    pub runtime: Arc<AgentRuntime>,
    pub summarizer: Arc<ResultSummarizer>,
    pub prompts: Arc<dyn PromptRepository>,
    pub schema: Arc<SchemaCache<SqliteSchemaDescriptor>>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/v1/query", post(run_query))
        .route("/api/v1/prompts", get(list_prompts).put(upsert_prompt))
        .route("/api/v1/prompts/info", get(prompt_info))
        .route("/api/v1/prompts/{kind}", delete(delete_prompt))
        .route("/api/v1/schema/refresh", post(refresh_schema))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct QueryPayload {
    pub question: String,
    pub connection: Option<String>,
    pub customer_id: Option<String>,
    pub retry_budget: Option<u32>,
    #[serde(default = "default_summarize")]
    pub summarize: bool,
}

fn default_summarize() -> bool {
    true
}

#[derive(Debug, Serialize)]
pub struct QueryResponse {
    pub success: bool,
    pub correlation_id: String,
    pub query: String,
    pub columns: Vec<String>,
    pub data: Vec<Map<String, Value>>,
    pub record_count: usize,
    pub truncated: bool,
    pub summary: Option<String>,
    pub was_repaired: bool,
    pub rounds: usize,
    pub history: DiagnosticHistory,
}

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub kind: &'static str,
    pub message: &'static str,
    pub detail: String,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub success: bool,
    pub correlation_id: String,
    pub error: ApiErrorBody,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history: Option<DiagnosticHistory>,
}

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ApiError>)>;

fn status_for(error: &InterfaceError) -> StatusCode {
    match error {
        InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        InterfaceError::Unprocessable { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn api_error(
    error: ApplicationError,
    correlation_id: &str,
    history: Option<DiagnosticHistory>,
) -> (StatusCode, Json<ApiError>) {
    let interface = error.into_interface(correlation_id);
    let body = ApiError {
        success: false,
        correlation_id: interface.correlation_id().to_string(),
        error: ApiErrorBody {
            kind: interface.kind(),
            message: interface.user_message(),
            detail: interface.to_string(),
        },
        history,
    };
    (status_for(&interface), Json(body))
}

fn bad_request(message: impl Into<String>, correlation_id: &str) -> (StatusCode, Json<ApiError>) {
    api_error(
        ApplicationError::Domain(DomainError::InvariantViolation(message.into())),
        correlation_id,
        None,
    )
}

fn customer_id(value: Option<&str>) -> Option<CustomerId> {
    value.map(str::trim).filter(|id| !id.is_empty()).map(|id| CustomerId(id.to_string()))
}

async fn run_query(
    State(state): State<ApiState>,
    Json(payload): Json<QueryPayload>,
) -> ApiResult<QueryResponse> {
    let correlation_id = Uuid::new_v4().to_string();
    if let Some(budget) = payload.retry_budget {
        if budget == 0 || budget > MAX_REQUEST_RETRY_BUDGET {
            return Err(bad_request(
                format!("retry_budget must be between 1 and {MAX_REQUEST_RETRY_BUDGET}"),
                &correlation_id,
            ));
        }
    }

    let customer = customer_id(payload.customer_id.as_deref());
    let mut request = QueryRequest::new(payload.question.clone())
        .with_correlation_id(correlation_id.clone())
        .with_connection(
            payload.connection.as_deref().map(ConnectionRef::new).unwrap_or_default(),
        );
    if let Some(customer) = customer.clone() {
        request = request.with_customer(customer);
    }
    if let Some(budget) = payload.retry_budget {
        request = request.with_retry_budget(budget);
    }

    let success = match state.runtime.run_query(request).await {
        Ok(success) => success,
        Err(failure) => {
            warn!(
                event_name = "http.query.failed",
                correlation_id = %correlation_id,
                error = %failure,
                "query request failed"
            );
            let history = failure.history().cloned();
            return Err(api_error(failure.into_application_error(), &correlation_id, history));
        }
    };

    let summary = if payload.summarize {
        Some(
            state
                .summarizer
                .summarize(&payload.question, success.sql(), &success.result, customer.as_ref())
                .await
                .text,
        )
    } else {
        None
    };

    info!(
        event_name = "http.query.completed",
        correlation_id = %correlation_id,
        rows = success.result.row_count(),
        rounds = success.rounds_used(),
        "query request completed"
    );
    Ok(Json(query_response(success, summary)))
}

fn query_response(success: QuerySuccess, summary: Option<String>) -> QueryResponse {
    let was_repaired = success.candidate.source() != CandidateSource::Generated
        || success.history.len() > 1;
    QueryResponse {
        success: true,
        correlation_id: success.correlation_id.clone(),
        query: success.sql().to_string(),
        columns: success.result.columns.clone(),
        data: success.result.records(),
        record_count: success.result.row_count(),
        truncated: success.result.truncated,
        summary,
        was_repaired,
        rounds: success.rounds_used(),
        history: success.history,
    }
}

#[derive(Debug, Deserialize)]
pub struct CustomerQuery {
    pub customer_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PromptListResponse {
    pub success: bool,
    pub prompts: Vec<PromptTemplate>,
}

async fn list_prompts(
    State(state): State<ApiState>,
    Query(query): Query<CustomerQuery>,
) -> ApiResult<PromptListResponse> {
    let correlation_id = Uuid::new_v4().to_string();
    let customer = customer_id(query.customer_id.as_deref());
    let prompts = state.prompts.list_for_customer(customer.as_ref()).await.map_err(|error| {
        api_error(ApplicationError::Persistence(error.to_string()), &correlation_id, None)
    })?;
    Ok(Json(PromptListResponse { success: true, prompts }))
}

#[derive(Debug, Deserialize)]
pub struct PromptPayload {
    /// Canonical kind or one of the legacy prompt ids.
    pub kind: String,
    pub template: String,
    pub customer_id: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PromptResponse {
    pub success: bool,
    pub message: String,
}

async fn upsert_prompt(
    State(state): State<ApiState>,
    Json(payload): Json<PromptPayload>,
) -> ApiResult<PromptResponse> {
    let correlation_id = Uuid::new_v4().to_string();
    let kind = PromptKind::parse(&payload.kind).ok_or_else(|| {
        api_error(
            ApplicationError::Domain(DomainError::UnknownPromptKind(payload.kind.clone())),
            &correlation_id,
            None,
        )
    })?;
    if payload.template.trim().is_empty() {
        return Err(bad_request("template must not be empty", &correlation_id));
    }
    // Reject templates that cannot render before they reach the store.
    render_template(kind, &payload.template, &PromptContext::default())
        .map_err(|error| bad_request(error.to_string(), &correlation_id))?;

    let mut template =
        PromptTemplate::new(kind, customer_id(payload.customer_id.as_deref()), payload.template);
    if let Some(description) = payload.description {
        template = template.with_description(description);
    }
    let stored = state.prompts.upsert(template).await.map_err(|error| {
        api_error(ApplicationError::Persistence(error.to_string()), &correlation_id, None)
    })?;

    info!(
        event_name = "http.prompt.upserted",
        correlation_id = %correlation_id,
        kind = stored.kind.as_str(),
        default = stored.is_default(),
        "prompt template stored"
    );
    Ok(Json(PromptResponse {
        success: true,
        message: format!("Prompt '{}' created or updated successfully", stored.kind.as_str()),
    }))
}

async fn delete_prompt(
    State(state): State<ApiState>,
    Path(kind): Path<String>,
    Query(query): Query<CustomerQuery>,
) -> ApiResult<PromptResponse> {
    let correlation_id = Uuid::new_v4().to_string();
    let parsed = PromptKind::parse(&kind).ok_or_else(|| {
        api_error(ApplicationError::Domain(DomainError::UnknownPromptKind(kind.clone())), &correlation_id, None)
    })?;
    let removed = state
        .prompts
        .delete(parsed, customer_id(query.customer_id.as_deref()).as_ref())
        .await
        .map_err(|error| api_error(ApplicationError::Persistence(error.to_string()), &correlation_id, None))?;

    Ok(Json(PromptResponse {
        success: removed,
        message: if removed {
            format!("Prompt '{}' removed", parsed.as_str())
        } else {
            format!("No stored prompt '{}' to remove", parsed.as_str())
        },
    }))
}

#[derive(Debug, Serialize)]
pub struct PromptInfo {
    pub kind: &'static str,
    pub builtin_template: &'static str,
}

#[derive(Debug, Serialize)]
pub struct PromptInfoResponse {
    pub success: bool,
    pub info: Vec<PromptInfo>,
}

async fn prompt_info() -> Json<PromptInfoResponse> {
    let info = PromptKind::ALL
        .iter()
        .map(|kind| PromptInfo { kind: kind.as_str(), builtin_template: builtin_template(*kind) })
        .collect();
    Json(PromptInfoResponse { success: true, info })
}

#[derive(Debug, Deserialize)]
pub struct ConnectionQuery {
    pub connection: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SchemaRefreshResponse {
    pub success: bool,
    pub connection: String,
    pub tables: Vec<String>,
}

async fn refresh_schema(
    State(state): State<ApiState>,
    Query(query): Query<ConnectionQuery>,
) -> ApiResult<SchemaRefreshResponse> {
    let correlation_id = Uuid::new_v4().to_string();
    let connection = query.connection.as_deref().map(ConnectionRef::new).unwrap_or_default();
    let description = state.schema.refresh(&connection).await.map_err(|error| {
        api_error(ApplicationError::Connectivity(error), &correlation_id, None)
    })?;
    Ok(Json(SchemaRefreshResponse {
        success: true,
        connection: connection.to_string(),
        tables: description.tables.iter().map(|table| table.name.clone()).collect(),
    }))
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use textsql_agent::generation::GenerationClient;
    use textsql_agent::llm::{LlmClient, LlmError};
    use textsql_agent::prompts::PromptResolver;
    use textsql_agent::runtime::{AgentRuntime, RuntimeSettings};
    use textsql_agent::summary::ResultSummarizer;
    use textsql_core::config::SqlDialect;
    use textsql_core::domain::schema::ConnectionRef;
    use textsql_core::ports::PromptStore;
    use textsql_db::{
        connect_with_settings, InMemoryPromptRepository, SchemaCache, SqliteExecutionAdapter,
        SqliteSchemaDescriptor, TargetRegistry, UniversityDataset,
    };
    use tower::ServiceExt;

    use super::{router, ApiState};

    struct ScriptedLlm {
        replies: Mutex<VecDeque<String>>,
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn complete(&self, _system_prompt: &str, _user_prompt: &str) -> Result<String, LlmError> {
            self.replies
                .lock()
                .expect("replies lock")
                .pop_front()
                .ok_or_else(|| LlmError::Unavailable("script exhausted".to_string()))
        }
    }

    async fn state(replies: &[&str]) -> ApiState {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("connect");
        UniversityDataset::load(&pool).await.expect("seed");
        let targets = TargetRegistry::new();
        targets.register(ConnectionRef::default(), pool).await;

        let llm: Arc<dyn LlmClient> = Arc::new(ScriptedLlm {
            replies: Mutex::new(replies.iter().map(|reply| reply.to_string()).collect()),
        });
        let prompts = Arc::new(InMemoryPromptRepository::new());
        let store: Arc<dyn PromptStore> = prompts.clone();
        let resolver = PromptResolver::new(store);
        let schema = Arc::new(SchemaCache::new(SqliteSchemaDescriptor::new(targets.clone(), 2)));

        let runtime = AgentRuntime::new(
            GenerationClient::new(llm.clone(), resolver.clone(), SqlDialect::Sqlite),
            schema.clone(),
            Arc::new(SqliteExecutionAdapter::new(targets, 100)),
            RuntimeSettings::default(),
        );

        ApiState {
            runtime: Arc::new(runtime),
            summarizer: Arc::new(ResultSummarizer::new(llm, resolver, 10)),
            prompts,
            schema,
        }
    }

    async fn send(state: ApiState, method: &str, uri: &str, body: Value) -> (StatusCode, Value) {
        let response = router(state)
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .expect("request"),
            )
            .await
            .expect("response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let payload = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, payload)
    }

    #[tokio::test]
    async fn query_returns_rows_and_summary() {
        let state = state(&[
            "SELECT name FROM students WHERE major LIKE CS ORDER BY name",
            "Four students major in CS.",
        ])
        .await;

        let (status, body) =
            send(state, "POST", "/api/v1/query", json!({ "question": "Who majors in CS?" })).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], json!(true));
        assert_eq!(body["record_count"], json!(4));
        assert_eq!(body["query"], json!("SELECT name FROM students WHERE major LIKE 'CS' ORDER BY name"));
        assert_eq!(body["was_repaired"], json!(true));
        assert!(body["summary"].as_str().unwrap_or_default().starts_with("Four students major in CS."));
    }

    #[tokio::test]
    async fn exhausted_budget_is_unprocessable_with_history() {
        let state = state(&["DROP TABLE students", "DROP TABLE students"]).await;

        let (status, body) = send(
            state,
            "POST",
            "/api/v1/query",
            json!({ "question": "delete everything", "retry_budget": 2, "summarize": false }),
        )
        .await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"]["kind"], json!("unprocessable"));
        assert_eq!(body["history"].as_array().map(Vec::len), Some(2));
        assert_eq!(body["history"][0]["kind"], json!("rejected"));
    }

    #[tokio::test]
    async fn unknown_connection_is_service_unavailable() {
        let state = state(&[]).await;

        let (status, body) = send(
            state,
            "POST",
            "/api/v1/query",
            json!({ "question": "anything", "connection": "warehouse" }),
        )
        .await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"]["kind"], json!("service_unavailable"));
        assert!(body.get("history").is_none());
    }

    #[tokio::test]
    async fn invalid_retry_budget_is_rejected() {
        let state = state(&[]).await;

        let (status, _) = send(
            state,
            "POST",
            "/api/v1/query",
            json!({ "question": "anything", "retry_budget": 0 }),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn prompt_override_round_trips_through_the_api() {
        let state = state(&[]).await;

        let (status, _) = send(
            state.clone(),
            "PUT",
            "/api/v1/prompts",
            json!({
                "kind": "sql_system_message",
                "template": "Answer in {dialect}. Schema: {schema}",
                "customer_id": "acme"
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) =
            send(state.clone(), "GET", "/api/v1/prompts?customer_id=acme", Value::Null).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["prompts"][0]["kind"], json!("sql_generation"));
        assert_eq!(body["prompts"][0]["customer"], json!("acme"));

        let (status, body) =
            send(state, "DELETE", "/api/v1/prompts/sql_generation?customer_id=acme", Value::Null).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], json!(true));
    }

    #[tokio::test]
    async fn unknown_prompt_kind_and_broken_templates_are_rejected() {
        let state = state(&[]).await;

        let (status, body) = send(
            state.clone(),
            "PUT",
            "/api/v1/prompts",
            json!({ "kind": "greeting", "template": "hi" }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let correlation_id = body["correlation_id"].as_str().expect("correlation id");
        assert!(uuid::Uuid::parse_str(correlation_id).is_ok(), "{correlation_id}");

        let (status, _) = send(
            state,
            "PUT",
            "/api/v1/prompts",
            json!({ "kind": "sql_repair", "template": "{{ unclosed" }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn schema_refresh_lists_tables() {
        let state = state(&[]).await;

        let (status, body) = send(state, "POST", "/api/v1/schema/refresh", Value::Null).await;

        assert_eq!(status, StatusCode::OK);
        let tables = body["tables"].as_array().expect("tables");
        assert!(tables.contains(&json!("students")));
    }
}
