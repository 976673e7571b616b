use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::candidate::Candidate;
use super::execution::ExecutionErrorClass;
use super::verdict::RejectionReason;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DiagnosticEvent {
    GenerationFailed { message: String },
    Rejected { reason: RejectionReason, fragment: String },
    ExecutionFailed { message: String, class: ExecutionErrorClass },
    Executed { row_count: usize },
}

impl DiagnosticEvent {
    pub fn is_failure(&self) -> bool {
        !matches!(self, Self::Executed { .. })
    }

    /// Feedback handed to the repair prompt for this event.
    pub fn feedback(&self) -> Option<String> {
        match self {
            Self::GenerationFailed { message } => Some(message.clone()),
            Self::Rejected { reason, fragment } => {
                Some(super::verdict::Rejection::new(*reason, fragment.clone()).diagnostic())
            }
            Self::ExecutionFailed { message, .. } => Some(message.clone()),
            Self::Executed { .. } => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticEntry {
    pub round: u32,
    pub candidate: Option<Candidate>,
    #[serde(flatten)]
    pub event: DiagnosticEvent,
    pub recorded_at: DateTime<Utc>,
}

impl DiagnosticEntry {
    pub fn new(round: u32, candidate: Option<Candidate>, event: DiagnosticEvent) -> Self {
        Self { round, candidate, event, recorded_at: Utc::now() }
    }
}

/// Ordered record of every round of a session. Entries are only ever appended.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DiagnosticHistory {
    entries: Vec<DiagnosticEntry>,
}

impl DiagnosticHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, entry: DiagnosticEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[DiagnosticEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&DiagnosticEntry> {
        self.entries.last()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DiagnosticEntry> {
        self.entries.iter()
    }

    /// Most recent entry that carries a candidate, i.e. the statement to repair next.
    pub fn last_candidate(&self) -> Option<(&Candidate, &DiagnosticEvent)> {
        self.entries
            .iter()
            .rev()
            .find_map(|entry| entry.candidate.as_ref().map(|candidate| (candidate, &entry.event)))
    }
}
