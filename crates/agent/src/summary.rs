use std::sync::Arc;

use serde_json::Value;
use textsql_core::domain::execution::ResultSet;
use textsql_core::domain::prompt::{CustomerId, PromptKind};
use tracing::{info, warn};

use crate::llm::LlmClient;
use crate::prompts::{PromptContext, PromptResolver};

pub const NO_RESULTS_MESSAGE: &str = "The query returned no results.";
pub const SUMMARY_FALLBACK_MESSAGE: &str = "I couldn't generate a summary for the query results.";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SummarySource {
    NoResults,
    Model,
    Fallback,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Summary {
    pub text: String,
    pub source: SummarySource,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MarkdownTable {
    pub markdown: String,
    pub total_rows: usize,
    pub displayed_rows: usize,
}

/// Turns result rows into a natural-language answer followed by a markdown table.
#[derive(Clone)]
pub struct ResultSummarizer {
    llm: Arc<dyn LlmClient>,
    prompts: PromptResolver,
    summary_rows: usize,
}

impl ResultSummarizer {
    pub fn new(llm: Arc<dyn LlmClient>, prompts: PromptResolver, summary_rows: usize) -> Self {
        Self { llm, prompts, summary_rows: summary_rows.max(1) }
    }

    /// Never fails: model or prompt errors degrade to a fixed message.
    pub async fn summarize(
        &self,
        question: &str,
        sql: &str,
        result: &ResultSet,
        customer: Option<&CustomerId>,
    ) -> Summary {
        if result.is_empty() {
            return Summary { text: NO_RESULTS_MESSAGE.to_string(), source: SummarySource::NoResults };
        }

        let system_prompt = match self
            .prompts
            .render(PromptKind::ResultSummary, customer, &PromptContext::default())
            .await
        {
            Ok(prompt) => prompt,
            Err(error) => {
                warn!(event_name = "agent.summary.failed", error = %error, "summary prompt failed to render");
                return fallback();
            }
        };
        let user_prompt = self.user_prompt(question, sql, result);

        match self.llm.complete(&system_prompt, &user_prompt).await {
            Ok(text) if !text.trim().is_empty() => {
                let table = markdown_table(result, self.summary_rows);
                let mut summary = text.trim().to_string();
                summary.push_str("\n\n");
                summary.push_str(&table_heading(&table, result.truncated));
                summary.push_str(&format!(":\n\n{}", table.markdown));
                info!(
                    event_name = "agent.summary.completed",
                    total_rows = table.total_rows,
                    displayed_rows = table.displayed_rows,
                    truncated = result.truncated,
                    "summarised query results"
                );
                Summary { text: summary, source: SummarySource::Model }
            }
            Ok(_) => {
                warn!(event_name = "agent.summary.failed", "model returned an empty summary");
                fallback()
            }
            Err(error) => {
                warn!(event_name = "agent.summary.failed", error = %error, "summary request failed");
                fallback()
            }
        }
    }

    fn user_prompt(&self, question: &str, sql: &str, result: &ResultSet) -> String {
        let shown: Vec<_> = result.records().into_iter().take(self.summary_rows).collect();
        let mut rows = serde_json::to_string_pretty(&shown).unwrap_or_default();
        if result.row_count() > self.summary_rows {
            rows.push_str(&format!("\n... and {} more rows", result.row_count() - self.summary_rows));
        }
        if result.truncated {
            rows.push_str(&format!(
                "\n(the result set was cut off at {} rows; the full result is larger)",
                result.row_count()
            ));
        }
        format!(
            "Original question: {question}\nSQL query executed: {sql}\nQuery results: {rows}\n\n\
             Please summarize these results to answer the original question."
        )
    }
}

/// A truncated result only bounds the real row count from below.
fn table_heading(table: &MarkdownTable, truncated: bool) -> String {
    match (truncated, table.total_rows > table.displayed_rows) {
        (false, true) => format!(
            "Here are the top {} results out of {} total rows",
            table.displayed_rows, table.total_rows
        ),
        (false, false) => format!("Here are all {} results", table.total_rows),
        (true, true) => format!(
            "Here are the top {} results out of at least {} rows (the result set was truncated)",
            table.displayed_rows, table.total_rows
        ),
        (true, false) => format!(
            "Here are the first {} results (the result set was truncated)",
            table.total_rows
        ),
    }
}

fn fallback() -> Summary {
    Summary { text: SUMMARY_FALLBACK_MESSAGE.to_string(), source: SummarySource::Fallback }
}

pub fn markdown_table(result: &ResultSet, max_rows: usize) -> MarkdownTable {
    let total_rows = result.row_count();
    if total_rows == 0 {
        return MarkdownTable { markdown: "No results found".to_string(), total_rows, displayed_rows: 0 };
    }

    let displayed: Vec<&Vec<Value>> = result.rows.iter().take(max_rows).collect();
    let mut markdown = format!("| {} |\n", result.columns.join(" | "));
    markdown.push_str(&format!(
        "| {} |\n",
        result.columns.iter().map(|_| "---").collect::<Vec<_>>().join(" | ")
    ));
    for row in &displayed {
        let cells: Vec<String> = (0..result.columns.len())
            .map(|index| row.get(index).map(markdown_cell).unwrap_or_default())
            .collect();
        markdown.push_str(&format!("| {} |\n", cells.join(" | ")));
    }

    MarkdownTable { markdown, total_rows, displayed_rows: displayed.len() }
}

fn markdown_cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) if text.contains('|') || text.contains('\n') => format!("`{text}`"),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::json;
    use textsql_core::domain::execution::ResultSet;

    use super::{markdown_table, ResultSummarizer, SummarySource, NO_RESULTS_MESSAGE, SUMMARY_FALLBACK_MESSAGE};
    use crate::llm::{LlmClient, LlmError};
    use crate::prompts::PromptResolver;

    struct FixedLlm {
        reply: Result<String, LlmError>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LlmClient for FixedLlm {
        async fn complete(&self, _system_prompt: &str, user_prompt: &str) -> Result<String, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert!(user_prompt.contains("Original question"));
            self.reply.clone()
        }
    }

    fn summarizer(reply: Result<String, LlmError>, rows: usize) -> (ResultSummarizer, Arc<FixedLlm>) {
        let llm = Arc::new(FixedLlm { reply, calls: AtomicUsize::new(0) });
        (ResultSummarizer::new(llm.clone(), PromptResolver::builtin(), rows), llm)
    }

    fn departments(count: usize) -> ResultSet {
        ResultSet::new(
            vec!["department".to_string(), "students".to_string()],
            (0..count).map(|i| vec![json!(format!("Dept {i}")), json!(i)]).collect(),
        )
    }

    #[tokio::test]
    async fn empty_results_skip_the_model() {
        let (summarizer, llm) = summarizer(Ok("unused".to_string()), 10);
        let summary = summarizer.summarize("q", "SELECT 1", &ResultSet::default(), None).await;

        assert_eq!(summary.text, NO_RESULTS_MESSAGE);
        assert_eq!(summary.source, SummarySource::NoResults);
        assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn summary_is_followed_by_a_truncated_table() {
        let (summarizer, _) = summarizer(Ok("Dept 0 is the smallest.".to_string()), 2);
        let summary = summarizer.summarize("q", "SELECT 1", &departments(3), None).await;

        assert_eq!(summary.source, SummarySource::Model);
        assert!(summary.text.starts_with("Dept 0 is the smallest."));
        assert!(summary.text.contains("Here are the top 2 results out of 3 total rows"));
        assert!(summary.text.contains("| department | students |"));
    }

    #[tokio::test]
    async fn truncated_results_report_a_lower_bound() {
        let (summarizer, _) = summarizer(Ok("Many departments.".to_string()), 2);
        let mut result = departments(3);
        result.truncated = true;

        let summary = summarizer.summarize("q", "SELECT 1", &result, None).await;

        assert!(summary.text.contains("Here are the top 2 results out of at least 3 rows"));
        assert!(!summary.text.contains("3 total rows"));
    }

    #[tokio::test]
    async fn truncated_results_within_the_display_limit_say_so() {
        let (summarizer, _) = summarizer(Ok("Two departments shown.".to_string()), 5);
        let mut result = departments(2);
        result.truncated = true;

        let summary = summarizer.summarize("q", "SELECT 1", &result, None).await;

        assert!(summary.text.contains("Here are the first 2 results (the result set was truncated)"));
        assert!(!summary.text.contains("Here are all"));
    }

    #[tokio::test]
    async fn model_failure_degrades_to_fallback_message() {
        let (summarizer, _) = summarizer(Err(LlmError::Timeout), 10);
        let summary = summarizer.summarize("q", "SELECT 1", &departments(1), None).await;

        assert_eq!(summary.text, SUMMARY_FALLBACK_MESSAGE);
        assert_eq!(summary.source, SummarySource::Fallback);
    }

    #[test]
    fn markdown_cells_escape_pipes_and_blank_nulls() {
        let result = ResultSet::new(
            vec!["note".to_string(), "score".to_string()],
            vec![vec![json!("a|b"), json!(null)], vec![json!("plain"), json!(2.5)]],
        );
        let table = markdown_table(&result, 10);

        assert_eq!(
            table.markdown,
            "| note | score |\n| --- | --- |\n| `a|b` |  |\n| plain | 2.5 |\n"
        );
        assert_eq!(table.displayed_rows, 2);
    }
}
