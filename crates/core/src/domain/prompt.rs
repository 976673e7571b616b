use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CustomerId(pub String);

impl CustomerId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptKind {
    SqlGeneration,
    SqlRepair,
    ResultSummary,
}

impl PromptKind {
    pub const ALL: [PromptKind; 3] = [Self::SqlGeneration, Self::SqlRepair, Self::ResultSummary];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SqlGeneration => "sql_generation",
            Self::SqlRepair => "sql_repair",
            Self::ResultSummary => "result_summary",
        }
    }

    /// Accepts the canonical ids plus the legacy `*_system_message` ids.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sql_generation" | "sql_system_message" => Some(Self::SqlGeneration),
            "sql_repair" | "sql_debug_system_message" => Some(Self::SqlRepair),
            "result_summary" | "result_summary_system_message" => Some(Self::ResultSummary),
            _ => None,
        }
    }
}

/// A stored prompt override. `customer == None` is the stored default for every customer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptTemplate {
    pub kind: PromptKind,
    pub customer: Option<CustomerId>,
    pub template: String,
    pub description: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl PromptTemplate {
    pub fn new(kind: PromptKind, customer: Option<CustomerId>, template: impl Into<String>) -> Self {
        Self { kind, customer, template: template.into(), description: None, updated_at: Utc::now() }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn is_default(&self) -> bool {
        self.customer.is_none()
    }
}
