use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub target: TargetConfig,
    pub llm: LlmConfig,
    pub pipeline: PipelineConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

/// Application store holding prompt overrides.
#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

/// The database questions are asked against.
#[derive(Clone, Debug)]
pub struct TargetConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
    pub read_only: bool,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub fallback_model: Option<String>,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Total rounds per question, the first generation included.
    pub retry_budget: u32,
    pub similarity_threshold: f64,
    pub generation_timeout_secs: u64,
    pub execution_timeout_secs: u64,
    pub max_result_rows: usize,
    pub summary_rows: usize,
    pub schema_sample_rows: usize,
    pub dialect: SqlDialect,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    #[serde(rename = "openai")]
    OpenAi,
    Anthropic,
    Ollama,
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Ollama => "ollama",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SqlDialect {
    Sqlite,
    Postgres,
}

impl SqlDialect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sqlite => "SQLite",
            Self::Postgres => "PostgreSQL",
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub target_url: Option<String>,
    pub log_level: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub retry_budget: Option<u32>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://textsql.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            target: TargetConfig {
                url: "sqlite://textsql-demo.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
                read_only: true,
            },
            llm: LlmConfig {
                provider: LlmProvider::Ollama,
                api_key: None,
                base_url: Some("http://localhost:11434".to_string()),
                model: "llama3.1".to_string(),
                fallback_model: None,
                timeout_secs: 30,
                max_retries: 2,
            },
            pipeline: PipelineConfig {
                retry_budget: 3,
                similarity_threshold: 0.8,
                generation_timeout_secs: 45,
                execution_timeout_secs: 15,
                max_result_rows: 1_000,
                summary_rows: 10,
                schema_sample_rows: 3,
                dialect: SqlDialect::Sqlite,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai|anthropic|ollama)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl std::str::FromStr for SqlDialect {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            other => Err(ConfigError::Validation(format!(
                "unsupported sql dialect `{other}` (expected sqlite|postgres)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("textsql.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(target) = patch.target {
            if let Some(url) = target.url {
                self.target.url = url;
            }
            if let Some(max_connections) = target.max_connections {
                self.target.max_connections = max_connections;
            }
            if let Some(timeout_secs) = target.timeout_secs {
                self.target.timeout_secs = timeout_secs;
            }
            if let Some(read_only) = target.read_only {
                self.target.read_only = read_only;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(llm_api_key_value) = llm.api_key {
                self.llm.api_key = Some(secret_value(llm_api_key_value));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(fallback_model) = llm.fallback_model {
                self.llm.fallback_model = Some(fallback_model);
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(max_retries) = llm.max_retries {
                self.llm.max_retries = max_retries;
            }
        }

        if let Some(pipeline) = patch.pipeline {
            if let Some(retry_budget) = pipeline.retry_budget {
                self.pipeline.retry_budget = retry_budget;
            }
            if let Some(similarity_threshold) = pipeline.similarity_threshold {
                self.pipeline.similarity_threshold = similarity_threshold;
            }
            if let Some(generation_timeout_secs) = pipeline.generation_timeout_secs {
                self.pipeline.generation_timeout_secs = generation_timeout_secs;
            }
            if let Some(execution_timeout_secs) = pipeline.execution_timeout_secs {
                self.pipeline.execution_timeout_secs = execution_timeout_secs;
            }
            if let Some(max_result_rows) = pipeline.max_result_rows {
                self.pipeline.max_result_rows = max_result_rows;
            }
            if let Some(summary_rows) = pipeline.summary_rows {
                self.pipeline.summary_rows = summary_rows;
            }
            if let Some(schema_sample_rows) = pipeline.schema_sample_rows {
                self.pipeline.schema_sample_rows = schema_sample_rows;
            }
            if let Some(dialect) = pipeline.dialect {
                self.pipeline.dialect = dialect;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("TEXTSQL_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("TEXTSQL_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("TEXTSQL_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("TEXTSQL_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("TEXTSQL_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("TEXTSQL_TARGET_URL") {
            self.target.url = value;
        }
        if let Some(value) = read_env("TEXTSQL_TARGET_MAX_CONNECTIONS") {
            self.target.max_connections = parse_u32("TEXTSQL_TARGET_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("TEXTSQL_TARGET_TIMEOUT_SECS") {
            self.target.timeout_secs = parse_u64("TEXTSQL_TARGET_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("TEXTSQL_TARGET_READ_ONLY") {
            self.target.read_only = parse_bool("TEXTSQL_TARGET_READ_ONLY", &value)?;
        }

        if let Some(value) = read_env("TEXTSQL_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("TEXTSQL_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("TEXTSQL_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("TEXTSQL_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("TEXTSQL_LLM_FALLBACK_MODEL") {
            self.llm.fallback_model = Some(value);
        }
        if let Some(value) = read_env("TEXTSQL_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("TEXTSQL_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("TEXTSQL_LLM_MAX_RETRIES") {
            self.llm.max_retries = parse_u32("TEXTSQL_LLM_MAX_RETRIES", &value)?;
        }

        if let Some(value) = read_env("TEXTSQL_PIPELINE_RETRY_BUDGET") {
            self.pipeline.retry_budget = parse_u32("TEXTSQL_PIPELINE_RETRY_BUDGET", &value)?;
        }
        if let Some(value) = read_env("TEXTSQL_PIPELINE_SIMILARITY_THRESHOLD") {
            self.pipeline.similarity_threshold =
                parse_f64("TEXTSQL_PIPELINE_SIMILARITY_THRESHOLD", &value)?;
        }
        if let Some(value) = read_env("TEXTSQL_PIPELINE_GENERATION_TIMEOUT_SECS") {
            self.pipeline.generation_timeout_secs =
                parse_u64("TEXTSQL_PIPELINE_GENERATION_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("TEXTSQL_PIPELINE_EXECUTION_TIMEOUT_SECS") {
            self.pipeline.execution_timeout_secs =
                parse_u64("TEXTSQL_PIPELINE_EXECUTION_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("TEXTSQL_PIPELINE_MAX_RESULT_ROWS") {
            self.pipeline.max_result_rows = parse_usize("TEXTSQL_PIPELINE_MAX_RESULT_ROWS", &value)?;
        }
        if let Some(value) = read_env("TEXTSQL_PIPELINE_SUMMARY_ROWS") {
            self.pipeline.summary_rows = parse_usize("TEXTSQL_PIPELINE_SUMMARY_ROWS", &value)?;
        }
        if let Some(value) = read_env("TEXTSQL_PIPELINE_SCHEMA_SAMPLE_ROWS") {
            self.pipeline.schema_sample_rows =
                parse_usize("TEXTSQL_PIPELINE_SCHEMA_SAMPLE_ROWS", &value)?;
        }
        if let Some(value) = read_env("TEXTSQL_PIPELINE_DIALECT") {
            self.pipeline.dialect = value.parse()?;
        }

        if let Some(value) = read_env("TEXTSQL_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("TEXTSQL_SERVER_PORT") {
            self.server.port = parse_u16("TEXTSQL_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("TEXTSQL_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("TEXTSQL_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level = read_env("TEXTSQL_LOGGING_LEVEL").or_else(|| read_env("TEXTSQL_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("TEXTSQL_LOGGING_FORMAT").or_else(|| read_env("TEXTSQL_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(target_url) = overrides.target_url {
            self.target.url = target_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(retry_budget) = overrides.retry_budget {
            self.pipeline.retry_budget = retry_budget;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_target(&self.target)?;
        validate_llm(&self.llm)?;
        validate_pipeline(&self.pipeline)?;
        validate_dialect(&self.pipeline, &self.target)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }

    /// Effective configuration as TOML-shaped JSON with secrets redacted.
    pub fn redacted(&self) -> serde_json::Value {
        let api_key = self.llm.api_key.as_ref().map(|_| "[redacted]");
        serde_json::json!({
            "database": {
                "url": self.database.url,
                "max_connections": self.database.max_connections,
                "timeout_secs": self.database.timeout_secs,
            },
            "target": {
                "url": self.target.url,
                "max_connections": self.target.max_connections,
                "timeout_secs": self.target.timeout_secs,
                "read_only": self.target.read_only,
            },
            "llm": {
                "provider": self.llm.provider.as_str(),
                "api_key": api_key,
                "base_url": self.llm.base_url,
                "model": self.llm.model,
                "fallback_model": self.llm.fallback_model,
                "timeout_secs": self.llm.timeout_secs,
                "max_retries": self.llm.max_retries,
            },
            "pipeline": {
                "retry_budget": self.pipeline.retry_budget,
                "similarity_threshold": self.pipeline.similarity_threshold,
                "generation_timeout_secs": self.pipeline.generation_timeout_secs,
                "execution_timeout_secs": self.pipeline.execution_timeout_secs,
                "max_result_rows": self.pipeline.max_result_rows,
                "summary_rows": self.pipeline.summary_rows,
                "schema_sample_rows": self.pipeline.schema_sample_rows,
                "dialect": self.pipeline.dialect,
            },
            "server": {
                "bind_address": self.server.bind_address,
                "port": self.server.port,
                "graceful_shutdown_secs": self.server.graceful_shutdown_secs,
            },
            "logging": {
                "level": self.logging.level,
                "format": self.logging.format,
            },
        })
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("textsql.toml"), PathBuf::from("config/textsql.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn is_sqlite_url(url: &str) -> bool {
    let url = url.trim();
    url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:"
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    if !is_sqlite_url(&database.url) {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_target(target: &TargetConfig) -> Result<(), ConfigError> {
    if !is_sqlite_url(&target.url) {
        return Err(ConfigError::Validation(
            "target.url must be a sqlite URL pointing at the database questions are asked against"
                .to_string(),
        ));
    }

    if target.max_connections == 0 {
        return Err(ConfigError::Validation(
            "target.max_connections must be greater than zero".to_string(),
        ));
    }

    if target.timeout_secs == 0 || target.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "target.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if llm.model.trim().is_empty() {
        return Err(ConfigError::Validation("llm.model must not be empty".to_string()));
    }

    match llm.provider {
        LlmProvider::OpenAi | LlmProvider::Anthropic => {
            let missing = llm
                .api_key
                .as_ref()
                .map(|value| value.expose_secret().trim().is_empty())
                .unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.api_key is required for openai/anthropic providers (set TEXTSQL_LLM_API_KEY)"
                        .to_string(),
                ));
            }
        }
        LlmProvider::Ollama => {
            let missing =
                llm.base_url.as_ref().map(|value| value.trim().is_empty()).unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.base_url is required for ollama provider".to_string(),
                ));
            }
        }
    }

    if let Some(base_url) = &llm.base_url {
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::Validation(
                "llm.base_url must start with http:// or https://".to_string(),
            ));
        }
    }

    Ok(())
}

/// Generated SQL must run on the target driver, and only SQLite targets are wired.
fn validate_dialect(pipeline: &PipelineConfig, target: &TargetConfig) -> Result<(), ConfigError> {
    if is_sqlite_url(&target.url) && pipeline.dialect != SqlDialect::Sqlite {
        return Err(ConfigError::Validation(format!(
            "pipeline.dialect `{}` does not match the sqlite target at target.url",
            pipeline.dialect.as_str()
        )));
    }

    Ok(())
}

fn validate_pipeline(pipeline: &PipelineConfig) -> Result<(), ConfigError> {
    if pipeline.retry_budget == 0 || pipeline.retry_budget > 10 {
        return Err(ConfigError::Validation(
            "pipeline.retry_budget must be in range 1..=10".to_string(),
        ));
    }

    if !(pipeline.similarity_threshold > 0.0 && pipeline.similarity_threshold <= 1.0) {
        return Err(ConfigError::Validation(
            "pipeline.similarity_threshold must be greater than 0 and at most 1".to_string(),
        ));
    }

    if pipeline.generation_timeout_secs == 0 || pipeline.generation_timeout_secs > 600 {
        return Err(ConfigError::Validation(
            "pipeline.generation_timeout_secs must be in range 1..=600".to_string(),
        ));
    }

    if pipeline.execution_timeout_secs == 0 || pipeline.execution_timeout_secs > 600 {
        return Err(ConfigError::Validation(
            "pipeline.execution_timeout_secs must be in range 1..=600".to_string(),
        ));
    }

    if pipeline.max_result_rows == 0 {
        return Err(ConfigError::Validation(
            "pipeline.max_result_rows must be greater than zero".to_string(),
        ));
    }

    if pipeline.summary_rows == 0 {
        return Err(ConfigError::Validation(
            "pipeline.summary_rows must be greater than zero".to_string(),
        ));
    }

    if pipeline.schema_sample_rows > 20 {
        return Err(ConfigError::Validation(
            "pipeline.schema_sample_rows must be at most 20".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() }
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| invalid(key, value))
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| invalid(key, value))
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| invalid(key, value))
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| invalid(key, value))
}

fn parse_f64(key: &str, value: &str) -> Result<f64, ConfigError> {
    value.parse::<f64>().map_err(|_| invalid(key, value))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| invalid(key, value))
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    target: Option<TargetPatch>,
    llm: Option<LlmPatch>,
    pipeline: Option<PipelinePatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct TargetPatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
    read_only: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    fallback_model: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct PipelinePatch {
    retry_budget: Option<u32>,
    similarity_threshold: Option<f64>,
    generation_timeout_secs: Option<u64>,
    execution_timeout_secs: Option<u64>,
    max_result_rows: Option<usize>,
    summary_rows: Option<usize>,
    schema_sample_rows: Option<usize>,
    dialect: Option<SqlDialect>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LlmProvider, LoadOptions, LogFormat, SqlDialect};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn defaults_are_valid() -> Result<(), String> {
        let config = AppConfig::default();
        config.validate().map_err(|err| format!("defaults should validate: {err}"))?;

        ensure(config.pipeline.retry_budget == 3, "default retry budget should be 3")?;
        ensure(config.target.read_only, "target should be read-only by default")?;
        ensure(config.pipeline.dialect == SqlDialect::Sqlite, "default dialect should be sqlite")
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_TEXTSQL_API_KEY", "sk-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("textsql.toml");
            fs::write(
                &path,
                r#"
[llm]
provider = "openai"
api_key = "${TEST_TEXTSQL_API_KEY}"
base_url = "https://api.openai.com"
model = "gpt-4o-mini"
fallback_model = "gpt-4o"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.llm.provider == LlmProvider::OpenAi, "provider should come from file")?;
            ensure(
                config.llm.api_key.as_ref().map(|key| key.expose_secret() == "sk-from-env")
                    == Some(true),
                "api key should be interpolated from environment",
            )?;
            ensure(
                config.llm.fallback_model.as_deref() == Some("gpt-4o"),
                "fallback model should come from file",
            )
        })();

        clear_vars(&["TEST_TEXTSQL_API_KEY"]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEXTSQL_LOG_LEVEL", "warn");
        env::set_var("TEXTSQL_LOG_FORMAT", "pretty");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Pretty),
                "pretty logging format should be set from env var",
            )
        })();

        clear_vars(&["TEXTSQL_LOG_LEVEL", "TEXTSQL_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEXTSQL_TARGET_URL", "sqlite://from-env.db");
        env::set_var("TEXTSQL_PIPELINE_RETRY_BUDGET", "4");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("textsql.toml");
            fs::write(
                &path,
                r#"
[target]
url = "sqlite://from-file.db"

[pipeline]
retry_budget = 2
similarity_threshold = 0.7

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    retry_budget: Some(5),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.pipeline.retry_budget == 5, "override retry budget should win")?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(config.target.url == "sqlite://from-env.db", "env target url should win over file")?;
            ensure(
                (config.pipeline.similarity_threshold - 0.7).abs() < f64::EPSILON,
                "file similarity threshold should win over defaults",
            )
        })();

        clear_vars(&["TEXTSQL_TARGET_URL", "TEXTSQL_PIPELINE_RETRY_BUDGET"]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEXTSQL_LLM_PROVIDER", "anthropic");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("llm.api_key")
            );
            ensure(has_message, "validation failure should mention llm.api_key")
        })();

        clear_vars(&["TEXTSQL_LLM_PROVIDER"]);
        result
    }

    #[test]
    fn zero_retry_budget_is_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let error = AppConfig::load(LoadOptions {
            overrides: ConfigOverrides { retry_budget: Some(0), ..ConfigOverrides::default() },
            ..LoadOptions::default()
        })
        .err()
        .ok_or_else(|| "zero budget should fail validation".to_string())?;

        ensure(
            matches!(error, ConfigError::Validation(ref message) if message.contains("retry_budget")),
            "validation failure should mention pipeline.retry_budget",
        )
    }

    #[test]
    fn postgres_dialect_is_rejected_for_sqlite_target() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEXTSQL_PIPELINE_DIALECT", "postgres");

        let result = (|| -> Result<(), String> {
            let error = AppConfig::load(LoadOptions::default())
                .err()
                .ok_or_else(|| "postgres dialect against a sqlite target should fail".to_string())?;
            ensure(
                matches!(error, ConfigError::Validation(ref message) if message.contains("pipeline.dialect")),
                "validation failure should mention pipeline.dialect",
            )
        })();

        clear_vars(&["TEXTSQL_PIPELINE_DIALECT"]);
        result
    }

    #[test]
    fn malformed_env_override_is_reported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEXTSQL_PIPELINE_SIMILARITY_THRESHOLD", "very");

        let result = (|| -> Result<(), String> {
            let error = AppConfig::load(LoadOptions::default())
                .err()
                .ok_or_else(|| "malformed threshold should fail".to_string())?;
            ensure(
                matches!(error, ConfigError::InvalidEnvOverride { ref key, .. } if key == "TEXTSQL_PIPELINE_SIMILARITY_THRESHOLD"),
                "error should name the offending variable",
            )
        })();

        clear_vars(&["TEXTSQL_PIPELINE_SIMILARITY_THRESHOLD"]);
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug_or_redaction() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEXTSQL_LLM_PROVIDER", "openai");
        env::set_var("TEXTSQL_LLM_API_KEY", "sk-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");
            let redacted = config.redacted().to_string();

            ensure(!debug.contains("sk-secret-value"), "debug output should not contain api key")?;
            ensure(!redacted.contains("sk-secret-value"), "redacted view should not contain api key")?;
            ensure(redacted.contains("[redacted]"), "redacted view should mark the api key")
        })();

        clear_vars(&["TEXTSQL_LLM_PROVIDER", "TEXTSQL_LLM_API_KEY"]);
        result
    }
}
