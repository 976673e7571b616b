use std::sync::Arc;

use textsql_core::config::SqlDialect;
use textsql_core::domain::candidate::Candidate;
use textsql_core::domain::prompt::{CustomerId, PromptKind};
use textsql_core::domain::schema::SchemaDescription;
use thiserror::Error;
use tracing::debug;

use crate::extraction::{extract_sql, ExtractionError};
use crate::llm::{LlmClient, LlmError};
use crate::prompts::{PromptContext, PromptError, PromptResolver};

/// Sample rows are capped per table to keep prompts bounded.
pub const SAMPLE_CHARS_PER_TABLE: usize = 500;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum GenerationFailure {
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    #[error("prompt rendering failed: {0}")]
    Prompt(String),
    #[error("generation timed out after {millis} ms")]
    Timeout { millis: u128 },
}

impl From<PromptError> for GenerationFailure {
    fn from(value: PromptError) -> Self {
        Self::Prompt(value.to_string())
    }
}

/// Question-level inputs shared by both prompt modes.
#[derive(Clone, Copy, Debug)]
pub struct GenerationInput<'a> {
    pub question: &'a str,
    pub schema: &'a SchemaDescription,
    pub customer: Option<&'a CustomerId>,
}

#[derive(Clone)]
pub struct GenerationClient {
    llm: Arc<dyn LlmClient>,
    prompts: PromptResolver,
    dialect: SqlDialect,
}

impl GenerationClient {
    pub fn new(llm: Arc<dyn LlmClient>, prompts: PromptResolver, dialect: SqlDialect) -> Self {
        Self { llm, prompts, dialect }
    }

    pub fn llm(&self) -> &Arc<dyn LlmClient> {
        &self.llm
    }

    pub fn prompts(&self) -> &PromptResolver {
        &self.prompts
    }

    pub async fn generate(&self, input: GenerationInput<'_>) -> Result<Candidate, GenerationFailure> {
        let context = self.context(input.schema, None);
        let system_prompt =
            self.prompts.render(PromptKind::SqlGeneration, input.customer, &context).await?;

        let response = self.llm.complete(&system_prompt, input.question).await?;
        let sql = extract_sql(&response)?;
        debug!(event_name = "agent.generation.extracted", sql = %preview(&sql), "extracted generated sql");

        Ok(Candidate::generated(sql))
    }

    /// Asks the model to fix `prior` given why it failed. The new candidate
    /// carries `round`.
    pub async fn repair(
        &self,
        input: GenerationInput<'_>,
        prior: &Candidate,
        diagnostic: &str,
        round: u32,
    ) -> Result<Candidate, GenerationFailure> {
        let context = self.context(input.schema, Some(diagnostic));
        let system_prompt = self.prompts.render(PromptKind::SqlRepair, input.customer, &context).await?;
        let user_prompt = repair_user_prompt(input.question, prior.sql(), diagnostic);

        let response = self.llm.complete(&system_prompt, &user_prompt).await?;
        let sql = extract_sql(&response)?;
        debug!(
            event_name = "agent.repair.extracted",
            round,
            sql = %preview(&sql),
            "extracted repaired sql"
        );

        Ok(Candidate::llm_repaired(sql, round))
    }

    fn context(&self, schema: &SchemaDescription, diagnostic: Option<&str>) -> PromptContext {
        PromptContext {
            schema: schema.to_prompt_json(),
            samples: schema.samples_for_prompt(SAMPLE_CHARS_PER_TABLE),
            error: diagnostic.map(str::to_string),
            dialect: self.dialect.as_str().to_string(),
        }
    }
}

fn repair_user_prompt(question: &str, sql: &str, diagnostic: &str) -> String {
    format!("Question: {question}\n\nPrevious SQL:\n{sql}\n\nError:\n{diagnostic}")
}

/// First 120 characters, for logs.
pub fn preview(text: &str) -> String {
    const LIMIT: usize = 120;
    if text.chars().count() <= LIMIT {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(LIMIT).collect();
    cut.push('…');
    cut
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use textsql_core::config::SqlDialect;
    use textsql_core::domain::candidate::{Candidate, CandidateSource};
    use textsql_core::domain::schema::{ColumnInfo, SchemaDescription, TableInfo};

    use super::{GenerationClient, GenerationFailure, GenerationInput};
    use crate::extraction::ExtractionError;
    use crate::llm::{LlmClient, LlmError};
    use crate::prompts::PromptResolver;

    struct RecordingLlm {
        reply: Result<String, LlmError>,
        prompts: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl LlmClient for RecordingLlm {
        async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String, LlmError> {
            self.prompts
                .lock()
                .expect("lock")
                .push((system_prompt.to_string(), user_prompt.to_string()));
            self.reply.clone()
        }
    }

    fn schema() -> SchemaDescription {
        SchemaDescription {
            tables: vec![TableInfo {
                name: "students".to_string(),
                columns: vec![ColumnInfo {
                    name: "major".to_string(),
                    data_type: "TEXT".to_string(),
                    nullable: true,
                }],
                primary_keys: Vec::new(),
                foreign_keys: Vec::new(),
            }],
            samples: Default::default(),
        }
    }

    fn client(reply: Result<String, LlmError>) -> (GenerationClient, Arc<RecordingLlm>) {
        let llm = Arc::new(RecordingLlm { reply, prompts: Mutex::new(Vec::new()) });
        (GenerationClient::new(llm.clone(), PromptResolver::builtin(), SqlDialect::Sqlite), llm)
    }

    #[tokio::test]
    async fn generate_embeds_schema_and_question() {
        let (client, llm) = client(Ok("```sql\nSELECT major FROM students;\n```".to_string()));
        let schema = schema();
        let input = GenerationInput { question: "Which majors exist?", schema: &schema, customer: None };

        let candidate = client.generate(input).await.expect("candidate");

        assert_eq!(candidate, Candidate::generated("SELECT major FROM students"));
        let prompts = llm.prompts.lock().expect("lock");
        assert!(prompts[0].0.contains("\"major\""));
        assert_eq!(prompts[0].1, "Which majors exist?");
    }

    #[tokio::test]
    async fn repair_embeds_prior_sql_and_diagnostic() {
        let (client, llm) = client(Ok(r#"{"query": "SELECT major FROM students", "error": null}"#.to_string()));
        let schema = schema();
        let input = GenerationInput { question: "Which majors exist?", schema: &schema, customer: None };
        let prior = Candidate::generated("SELECT majr FROM students");

        let candidate = client
            .repair(input, &prior, "no such column: majr", 1)
            .await
            .expect("candidate");

        assert_eq!(candidate.source(), CandidateSource::LlmRepaired);
        assert_eq!(candidate.round(), 1);
        let prompts = llm.prompts.lock().expect("lock");
        assert!(prompts[0].0.contains("no such column: majr"));
        assert!(prompts[0].1.contains("SELECT majr FROM students"));
    }

    #[tokio::test]
    async fn unusable_responses_are_generation_failures() {
        let schema = schema();
        let input = GenerationInput { question: "q", schema: &schema, customer: None };

        let (prose, _) = client(Ok("I am not sure.".to_string()));
        assert_eq!(
            prose.generate(input).await,
            Err(GenerationFailure::Extraction(ExtractionError::NoSql))
        );

        let (down, _) = client(Err(LlmError::Unavailable("connection refused".to_string())));
        assert!(matches!(down.generate(input).await, Err(GenerationFailure::Llm(_))));
    }
}
