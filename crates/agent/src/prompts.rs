//! Prompt templates, override resolution and rendering.

use std::sync::Arc;

use tera::{Context, Tera};
use textsql_core::domain::prompt::{CustomerId, PromptKind};
use textsql_core::ports::PromptStore;
use thiserror::Error;
use tracing::warn;

pub const SQL_GENERATION_TEMPLATE: &str = r#"You are an expert SQL assistant that turns natural-language questions into {{ dialect }} queries.
Follow these rules strictly:
1. Produce exactly one read-only SELECT statement (a leading WITH clause is allowed). Never insert, update, delete or change the schema.
2. Use table and column names exactly as they appear in the schema.
3. Join tables through the listed foreign keys when the question spans several tables.
4. Quote text values with single quotes.
5. If the question cannot be answered from this schema, explain why in the error field instead of guessing.
Respond with a JSON object only: {"query": "<sql>", "error": null} or {"query": null, "error": "<reason>"}.

Database schema:
{{ schema }}

Sample rows:
{{ samples }}"#;

pub const SQL_REPAIR_TEMPLATE: &str = r#"You are an expert SQL debugging assistant for {{ dialect }}.
A query written for the user's question failed. Rewrite it so that it runs against the schema below and still answers the question.
The result must remain a single read-only SELECT statement (a leading WITH clause is allowed).
Respond with a JSON object only: {"query": "<fixed sql>", "error": null} or {"query": null, "error": "<reason>"}.

Failure reported for the previous query:
{{ error }}

Database schema:
{{ schema }}"#;

pub const RESULT_SUMMARY_TEMPLATE: &str = r#"You are a data analyst summarising SQL query results.
Answer the user's original question in plain language using only the rows provided.
Point out the key figures and any obvious pattern. Keep it short and direct, and do not repeat the SQL."#;

const LEGACY_PLACEHOLDERS: &[(&str, &str)] = &[
    ("{schema}", "{{ schema }}"),
    ("{samples}", "{{ samples }}"),
    ("{error}", "{{ error }}"),
    ("{error_message}", "{{ error }}"),
    ("{dialect}", "{{ dialect }}"),
];

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("prompt template `{kind}` failed to render: {message}")]
    Render { kind: &'static str, message: String },
}

pub fn builtin_template(kind: PromptKind) -> &'static str {
    match kind {
        PromptKind::SqlGeneration => SQL_GENERATION_TEMPLATE,
        PromptKind::SqlRepair => SQL_REPAIR_TEMPLATE,
        PromptKind::ResultSummary => RESULT_SUMMARY_TEMPLATE,
    }
}

/// Values available to every template.
#[derive(Clone, Debug, Default)]
pub struct PromptContext {
    pub schema: String,
    pub samples: String,
    pub error: Option<String>,
    pub dialect: String,
}

impl PromptContext {
    fn to_tera(&self) -> Context {
        let mut context = Context::new();
        context.insert("schema", &self.schema);
        context.insert("samples", &self.samples);
        context.insert("error", self.error.as_deref().unwrap_or(""));
        context.insert("dialect", &self.dialect);
        context
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PromptSource {
    Customer,
    StoredDefault,
    BuiltIn,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedPrompt {
    pub kind: PromptKind,
    pub source: PromptSource,
    pub template: String,
}

impl ResolvedPrompt {
    pub fn render(&self, context: &PromptContext) -> Result<String, PromptError> {
        render_template(self.kind, &self.template, context)
    }
}

pub fn render_template(
    kind: PromptKind,
    template: &str,
    context: &PromptContext,
) -> Result<String, PromptError> {
    let template = upgrade_legacy_placeholders(template);
    Tera::one_off(&template, &context.to_tera(), false)
        .map_err(|error| PromptError::Render { kind: kind.as_str(), message: error.to_string() })
}

/// Stored prompts written with single-brace `{schema}` placeholders are
/// rewritten to template syntax. Templates already using `{{` are untouched.
pub fn upgrade_legacy_placeholders(template: &str) -> String {
    if template.contains("{{") || template.contains("{%") {
        return template.to_string();
    }
    LEGACY_PLACEHOLDERS
        .iter()
        .fold(template.to_string(), |text, (legacy, modern)| text.replace(legacy, modern))
}

/// Resolves a prompt through customer override, stored default and built-in
/// template, in that order.
#[derive(Clone, Default)]
pub struct PromptResolver {
    store: Option<Arc<dyn PromptStore>>,
}

impl PromptResolver {
    pub fn builtin() -> Self {
        Self { store: None }
    }

    pub fn new(store: Arc<dyn PromptStore>) -> Self {
        Self { store: Some(store) }
    }

    pub async fn resolve(&self, kind: PromptKind, customer: Option<&CustomerId>) -> ResolvedPrompt {
        if let Some(store) = &self.store {
            if let Some(customer) = customer {
                match store.find_prompt(kind, Some(customer)).await {
                    Ok(Some(template)) if !template.trim().is_empty() => {
                        return ResolvedPrompt { kind, source: PromptSource::Customer, template };
                    }
                    Ok(_) => {}
                    Err(error) => warn!(
                        event_name = "prompt.resolve.degraded",
                        prompt_kind = kind.as_str(),
                        level_tried = "customer",
                        error = %error,
                        "prompt store failed, falling back"
                    ),
                }
            }

            match store.find_prompt(kind, None).await {
                Ok(Some(template)) if !template.trim().is_empty() => {
                    return ResolvedPrompt { kind, source: PromptSource::StoredDefault, template };
                }
                Ok(_) => {}
                Err(error) => warn!(
                    event_name = "prompt.resolve.degraded",
                    prompt_kind = kind.as_str(),
                    level_tried = "default",
                    error = %error,
                    "prompt store failed, falling back"
                ),
            }
        }

        ResolvedPrompt {
            kind,
            source: PromptSource::BuiltIn,
            template: builtin_template(kind).to_string(),
        }
    }

    /// Resolves and renders; a stored template that fails to render is
    /// replaced by the built-in one.
    pub async fn render(
        &self,
        kind: PromptKind,
        customer: Option<&CustomerId>,
        context: &PromptContext,
    ) -> Result<String, PromptError> {
        let resolved = self.resolve(kind, customer).await;
        match resolved.render(context) {
            Ok(rendered) => Ok(rendered),
            Err(error) if resolved.source != PromptSource::BuiltIn => {
                warn!(
                    event_name = "prompt.render.degraded",
                    prompt_kind = kind.as_str(),
                    error = %error,
                    "stored prompt failed to render, using built-in template"
                );
                render_template(kind, builtin_template(kind), context)
            }
            Err(error) => Err(error),
        }
    }
}
