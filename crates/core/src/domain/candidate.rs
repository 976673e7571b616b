use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateSource {
    Generated,
    HeuristicallyRepaired,
    LlmRepaired,
}

impl CandidateSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Generated => "generated",
            Self::HeuristicallyRepaired => "heuristically_repaired",
            Self::LlmRepaired => "llm_repaired",
        }
    }
}

/// One proposed SQL statement plus where it came from.
///
/// Candidates are never mutated: every pipeline stage that changes the SQL
/// derives a new candidate.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    sql: String,
    round: u32,
    source: CandidateSource,
}

impl Candidate {
    pub fn generated(sql: impl Into<String>) -> Self {
        Self { sql: sql.into(), round: 0, source: CandidateSource::Generated }
    }

    /// A fresh generation in a later round, after an earlier round produced no SQL at all.
    pub fn regenerated(sql: impl Into<String>, round: u32) -> Self {
        Self { sql: sql.into(), round, source: CandidateSource::Generated }
    }

    pub fn llm_repaired(sql: impl Into<String>, round: u32) -> Self {
        Self { sql: sql.into(), round, source: CandidateSource::LlmRepaired }
    }

    /// Derives the heuristic rewrite of this candidate within the same round.
    pub fn heuristically_repaired(&self, sql: impl Into<String>) -> Self {
        Self { sql: sql.into(), round: self.round, source: CandidateSource::HeuristicallyRepaired }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn source(&self) -> CandidateSource {
        self.source
    }
}
