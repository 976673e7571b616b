use async_trait::async_trait;
use thiserror::Error;

use textsql_core::domain::prompt::{CustomerId, PromptKind, PromptTemplate};
use textsql_core::errors::PromptStoreError;
use textsql_core::ports::PromptStore;

pub mod memory;
pub mod prompt;

pub use memory::InMemoryPromptRepository;
pub use prompt::SqlPromptRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<RepositoryError> for PromptStoreError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::Database(error) => Self::Unavailable(error.to_string()),
            RepositoryError::Decode(message) => Self::Malformed(message),
        }
    }
}

/// Administration of stored prompt overrides. Lookup goes through [`PromptStore`].
#[async_trait]
pub trait PromptRepository: PromptStore {
    /// Inserts or replaces the template for `(kind, customer)`.
    async fn upsert(&self, template: PromptTemplate) -> Result<PromptTemplate, RepositoryError>;

    /// Templates visible to `customer`: its own overrides plus the stored
    /// defaults. `None` lists only the defaults.
    async fn list_for_customer(
        &self,
        customer: Option<&CustomerId>,
    ) -> Result<Vec<PromptTemplate>, RepositoryError>;

    /// Returns whether a template was removed.
    async fn delete(
        &self,
        kind: PromptKind,
        customer: Option<&CustomerId>,
    ) -> Result<bool, RepositoryError>;
}

/// The `customer_id` column value for a scope. The stored default is `''`.
pub(crate) fn customer_scope(customer: Option<&CustomerId>) -> &str {
    customer.map(CustomerId::as_str).unwrap_or("")
}
