use serde::{Deserialize, Serialize};

/// Rejection reasons of the read-only policy, declared in reporting priority
/// order: when several apply, the earliest variant is the one reported.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    WriteKeyword,
    MultipleStatements,
    InjectionPattern,
    EmptyOrUnparseable,
    UnsupportedStatement,
}

impl RejectionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WriteKeyword => "write_keyword",
            Self::MultipleStatements => "multiple_statements",
            Self::InjectionPattern => "injection_pattern",
            Self::EmptyOrUnparseable => "empty_or_unparseable",
            Self::UnsupportedStatement => "unsupported_statement",
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            Self::WriteKeyword => "the statement contains a write or DDL keyword",
            Self::MultipleStatements => "more than one statement is present",
            Self::InjectionPattern => "the statement contains a comment-based injection pattern",
            Self::EmptyOrUnparseable => "the statement is empty or cannot be parsed",
            Self::UnsupportedStatement => "only SELECT statements (optionally with a WITH clause) are allowed",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    pub reason: RejectionReason,
    pub fragment: String,
}

impl Rejection {
    pub fn new(reason: RejectionReason, fragment: impl Into<String>) -> Self {
        Self { reason, fragment: fragment.into() }
    }

    /// Text fed back to the model when it is asked to repair the statement.
    pub fn diagnostic(&self) -> String {
        if self.fragment.is_empty() {
            format!("read-only policy violation ({}): {}", self.reason.as_str(), self.reason.describe())
        } else {
            format!(
                "read-only policy violation ({}): {} (offending fragment: `{}`)",
                self.reason.as_str(),
                self.reason.describe(),
                self.fragment
            )
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum ValidationVerdict {
    Accepted,
    Rejected(Rejection),
}

impl ValidationVerdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }

    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            Self::Accepted => None,
            Self::Rejected(rejection) => Some(rejection),
        }
    }
}
