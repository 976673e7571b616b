use async_trait::async_trait;
use futures::TryStreamExt;
use sqlx::Executor;
use textsql_core::domain::execution::{
    ExecutionError, ExecutionErrorClass, ExecutionOutcome, ResultSet,
};
use textsql_core::domain::schema::ConnectionRef;
use textsql_core::ports::ExecutionAdapter;
use tracing::debug;

use crate::rows::{column_names, decode_row};
use crate::targets::TargetRegistry;

/// Runs vetted statements against a registered SQLite target. Rows are
/// streamed and the statement is abandoned once `max_rows` is exceeded.
#[derive(Clone)]
pub struct SqliteExecutionAdapter {
    targets: TargetRegistry,
    max_rows: usize,
}

impl SqliteExecutionAdapter {
    pub fn new(targets: TargetRegistry, max_rows: usize) -> Self {
        Self { targets, max_rows: max_rows.max(1) }
    }

    pub fn targets(&self) -> &TargetRegistry {
        &self.targets
    }

    async fn fetch(&self, sql: &str, connection: &ConnectionRef) -> Result<ResultSet, ExecutionError> {
        let pool = self.targets.pool(connection).await.map_err(|error| {
            ExecutionError::new(error.to_string(), ExecutionErrorClass::Connectivity)
        })?;

        let mut columns = None;
        let mut decoded = Vec::new();
        let mut truncated = false;
        {
            let mut rows = sqlx::query(sql).fetch(&pool);
            while let Some(row) = rows.try_next().await.map_err(execution_error)? {
                if decoded.len() == self.max_rows {
                    truncated = true;
                    break;
                }
                if columns.is_none() {
                    columns = Some(column_names(&row));
                }
                decoded.push(decode_row(&row).map_err(execution_error)?);
            }
        }

        let columns = match columns {
            Some(columns) => columns,
            None => {
                let described = (&pool).describe(sql).await.map_err(execution_error)?;
                described.columns().iter().map(|column| sqlx::Column::name(column).to_string()).collect()
            }
        };

        let mut result = ResultSet::new(columns, decoded);
        result.truncated = truncated;
        Ok(result)
    }
}

#[async_trait]
impl ExecutionAdapter for SqliteExecutionAdapter {
    async fn run(&self, sql: &str, connection: &ConnectionRef) -> ExecutionOutcome {
        let outcome = self.fetch(sql, connection).await;
        if let Err(error) = &outcome {
            debug!(
                event_name = "db.execution.failed",
                connection = %connection,
                error_class = error.class.as_str(),
                error = %error.message,
                "statement failed"
            );
        }
        outcome.into()
    }
}

/// Keeps the driver's message verbatim; it is fed back to the model.
fn execution_error(error: sqlx::Error) -> ExecutionError {
    match error {
        sqlx::Error::Database(database) => ExecutionError::classified(database.message()),
        sqlx::Error::PoolTimedOut => {
            ExecutionError::new("timed out waiting for a database connection", ExecutionErrorClass::Timeout)
        }
        sqlx::Error::PoolClosed | sqlx::Error::Io(_) | sqlx::Error::WorkerCrashed => {
            ExecutionError::new(error.to_string(), ExecutionErrorClass::Connectivity)
        }
        other => ExecutionError::classified(other.to_string()),
    }
}
