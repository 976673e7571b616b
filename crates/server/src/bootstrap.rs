use std::sync::Arc;

use textsql_agent::generation::GenerationClient;
use textsql_agent::llm::{HttpLlmClient, LlmClient, LlmError};
use textsql_agent::prompts::PromptResolver;
use textsql_agent::runtime::{AgentRuntime, RuntimeSettings};
use textsql_agent::summary::ResultSummarizer;
use textsql_core::config::{AppConfig, ConfigError, LoadOptions};
use textsql_core::errors::ConnectivityError;
use textsql_core::ports::PromptStore;
use textsql_db::{
    connect_with_settings, migrations, DbPool, SchemaCache, SqlPromptRepository,
    SqliteExecutionAdapter, SqliteSchemaDescriptor, TargetRegistry,
};
use thiserror::Error;
use tracing::info;

use crate::api::ApiState;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub targets: TargetRegistry,
    pub runtime: Arc<AgentRuntime>,
    pub summarizer: Arc<ResultSummarizer>,
    pub prompts: Arc<SqlPromptRepository>,
    pub schema: Arc<SchemaCache<SqliteSchemaDescriptor>>,
}

impl Application {
    pub fn api_state(&self) -> ApiState {
        ApiState {
            runtime: self.runtime.clone(),
            summarizer: self.summarizer.clone(),
            prompts: self.prompts.clone(),
            schema: self.schema.clone(),
        }
    }
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("target database unavailable: {0}")]
    Target(#[source] ConnectivityError),
    #[error("llm client could not be built: {0}")]
    Llm(#[source] LlmError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let targets = TargetRegistry::from_config(&config.target).await.map_err(BootstrapError::Target)?;
    info!(
        event_name = "system.bootstrap.target_connected",
        correlation_id = "bootstrap",
        read_only = config.target.read_only,
        "target database connection established"
    );

    let llm: Arc<dyn LlmClient> =
        Arc::new(HttpLlmClient::from_config(&config.llm).map_err(BootstrapError::Llm)?);
    let prompts = Arc::new(SqlPromptRepository::new(db_pool.clone()));
    let store: Arc<dyn PromptStore> = prompts.clone();
    let resolver = PromptResolver::new(store);

    let pipeline = &config.pipeline;
    let schema = Arc::new(SchemaCache::new(SqliteSchemaDescriptor::new(
        targets.clone(),
        pipeline.schema_sample_rows,
    )));
    let runtime = AgentRuntime::new(
        GenerationClient::new(llm.clone(), resolver.clone(), pipeline.dialect),
        schema.clone(),
        Arc::new(SqliteExecutionAdapter::new(targets.clone(), pipeline.max_result_rows)),
        RuntimeSettings::from_pipeline(pipeline),
    );
    let summarizer = ResultSummarizer::new(llm, resolver, pipeline.summary_rows);
    info!(
        event_name = "system.bootstrap.runtime_ready",
        correlation_id = "bootstrap",
        provider = config.llm.provider.as_str(),
        model = %config.llm.model,
        retry_budget = pipeline.retry_budget,
        "agent runtime assembled"
    );

    Ok(Application {
        config,
        db_pool,
        targets,
        runtime: Arc::new(runtime),
        summarizer: Arc::new(summarizer),
        prompts,
        schema,
    })
}
