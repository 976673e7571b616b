use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionErrorClass {
    UnknownColumn,
    UnknownTable,
    Syntax,
    ReadOnlyViolation,
    Connectivity,
    Timeout,
    Other,
}

impl ExecutionErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnknownColumn => "unknown_column",
            Self::UnknownTable => "unknown_table",
            Self::Syntax => "syntax",
            Self::ReadOnlyViolation => "read_only_violation",
            Self::Connectivity => "connectivity",
            Self::Timeout => "timeout",
            Self::Other => "other",
        }
    }

    /// Best-effort classification of a driver message. SQLite and PostgreSQL
    /// phrasings are both recognised.
    pub fn from_driver_message(message: &str) -> Self {
        let message = message.to_ascii_lowercase();
        if message.contains("no such column")
            || (message.contains("column") && message.contains("does not exist"))
        {
            Self::UnknownColumn
        } else if message.contains("no such table")
            || (message.contains("relation") && message.contains("does not exist"))
        {
            Self::UnknownTable
        } else if message.contains("syntax error") || message.contains("incomplete input") {
            Self::Syntax
        } else if message.contains("readonly") || message.contains("read-only") {
            Self::ReadOnlyViolation
        } else if message.contains("timed out") || message.contains("timeout") {
            Self::Timeout
        } else if message.contains("connection") || message.contains("pool") {
            Self::Connectivity
        } else {
            Self::Other
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{message}")]
pub struct ExecutionError {
    pub message: String,
    pub class: ExecutionErrorClass,
}

impl ExecutionError {
    pub fn new(message: impl Into<String>, class: ExecutionErrorClass) -> Self {
        Self { message: message.into(), class }
    }

    pub fn classified(message: impl Into<String>) -> Self {
        let message = message.into();
        let class = ExecutionErrorClass::from_driver_message(&message);
        Self { message, class }
    }
}

/// Rows returned by a successful execution, in column order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    pub truncated: bool,
}

impl ResultSet {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self { columns, rows, truncated: false }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows as column-name keyed objects. Duplicate column names keep the last value.
    pub fn records(&self) -> Vec<Map<String, Value>> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .cloned()
                    .zip(row.iter().cloned())
                    .collect::<Map<String, Value>>()
            })
            .collect()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ExecutionOutcome {
    Success(ResultSet),
    Failure(ExecutionError),
}

impl From<Result<ResultSet, ExecutionError>> for ExecutionOutcome {
    fn from(value: Result<ResultSet, ExecutionError>) -> Self {
        match value {
            Ok(result) => Self::Success(result),
            Err(error) => Self::Failure(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{ExecutionError, ExecutionErrorClass, ResultSet};

    #[test]
    fn driver_messages_are_classified() {
        let cases = [
            ("no such column: studnet_name", ExecutionErrorClass::UnknownColumn),
            ("column \"majr\" does not exist", ExecutionErrorClass::UnknownColumn),
            ("no such table: studnets", ExecutionErrorClass::UnknownTable),
            ("near \"FORM\": syntax error", ExecutionErrorClass::Syntax),
            ("attempt to write a readonly database", ExecutionErrorClass::ReadOnlyViolation),
            ("pool timed out while waiting for an open connection", ExecutionErrorClass::Timeout),
            ("division by zero", ExecutionErrorClass::Other),
        ];

        for (message, expected) in cases {
            assert_eq!(ExecutionError::classified(message).class, expected, "{message}");
        }
    }

    #[test]
    fn records_pair_columns_with_values() {
        let result = ResultSet::new(
            vec!["department".to_string(), "students".to_string()],
            vec![vec![json!("Physics"), json!(12)]],
        );

        let records = result.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["department"], json!("Physics"));
        assert_eq!(records[0]["students"], json!(12));
    }
}
