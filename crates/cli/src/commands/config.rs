use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value as JsonValue;
use textsql_core::config::{AppConfig, LoadOptions};
use toml::Value;

/// Every reported key with the environment variable that overrides it.
const FIELDS: &[(&str, &str)] = &[
    ("database.url", "TEXTSQL_DATABASE_URL"),
    ("database.max_connections", "TEXTSQL_DATABASE_MAX_CONNECTIONS"),
    ("database.timeout_secs", "TEXTSQL_DATABASE_TIMEOUT_SECS"),
    ("target.url", "TEXTSQL_TARGET_URL"),
    ("target.max_connections", "TEXTSQL_TARGET_MAX_CONNECTIONS"),
    ("target.timeout_secs", "TEXTSQL_TARGET_TIMEOUT_SECS"),
    ("target.read_only", "TEXTSQL_TARGET_READ_ONLY"),
    ("llm.provider", "TEXTSQL_LLM_PROVIDER"),
    ("llm.api_key", "TEXTSQL_LLM_API_KEY"),
    ("llm.base_url", "TEXTSQL_LLM_BASE_URL"),
    ("llm.model", "TEXTSQL_LLM_MODEL"),
    ("llm.fallback_model", "TEXTSQL_LLM_FALLBACK_MODEL"),
    ("llm.timeout_secs", "TEXTSQL_LLM_TIMEOUT_SECS"),
    ("llm.max_retries", "TEXTSQL_LLM_MAX_RETRIES"),
    ("pipeline.retry_budget", "TEXTSQL_PIPELINE_RETRY_BUDGET"),
    ("pipeline.similarity_threshold", "TEXTSQL_PIPELINE_SIMILARITY_THRESHOLD"),
    ("pipeline.generation_timeout_secs", "TEXTSQL_PIPELINE_GENERATION_TIMEOUT_SECS"),
    ("pipeline.execution_timeout_secs", "TEXTSQL_PIPELINE_EXECUTION_TIMEOUT_SECS"),
    ("pipeline.max_result_rows", "TEXTSQL_PIPELINE_MAX_RESULT_ROWS"),
    ("pipeline.summary_rows", "TEXTSQL_PIPELINE_SUMMARY_ROWS"),
    ("pipeline.schema_sample_rows", "TEXTSQL_PIPELINE_SCHEMA_SAMPLE_ROWS"),
    ("pipeline.dialect", "TEXTSQL_PIPELINE_DIALECT"),
    ("server.bind_address", "TEXTSQL_SERVER_BIND_ADDRESS"),
    ("server.port", "TEXTSQL_SERVER_PORT"),
    ("server.graceful_shutdown_secs", "TEXTSQL_SERVER_GRACEFUL_SHUTDOWN_SECS"),
    ("logging.level", "TEXTSQL_LOGGING_LEVEL"),
    ("logging.format", "TEXTSQL_LOGGING_FORMAT"),
];

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    render(&config.redacted(), config_file_doc.as_ref(), config_file_path.as_deref())
}

fn render(redacted: &JsonValue, file_doc: Option<&Value>, file_path: Option<&Path>) -> String {
    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for (key_path, env_key) in FIELDS {
        let value = lookup(redacted, key_path).map(display_value).unwrap_or_else(|| "<unset>".to_string());
        lines.push(render_line(key_path, &value, field_source(key_path, env_key, file_doc, file_path)));
    }
    lines.join("\n")
}

fn lookup<'a>(root: &'a JsonValue, key_path: &str) -> Option<&'a JsonValue> {
    key_path.split('.').try_fold(root, |current, key| current.get(key))
}

fn display_value(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => "<unset>".to_string(),
        JsonValue::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("textsql.toml"), PathBuf::from("config/textsql.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: &str,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if env::var_os(env_key).is_some() {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}
