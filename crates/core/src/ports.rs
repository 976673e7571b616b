//! Async seams between the pipeline and its external collaborators.

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::execution::ExecutionOutcome;
use crate::domain::prompt::{CustomerId, PromptKind};
use crate::domain::schema::{ConnectionRef, SchemaDescription};
use crate::errors::{ConnectivityError, PromptStoreError};

#[async_trait]
pub trait SchemaDescriptor: Send + Sync {
    async fn describe(
        &self,
        connection: &ConnectionRef,
    ) -> Result<Arc<SchemaDescription>, ConnectivityError>;
}

/// Runs a statement that already passed the read-only policy.
#[async_trait]
pub trait ExecutionAdapter: Send + Sync {
    async fn run(&self, sql: &str, connection: &ConnectionRef) -> ExecutionOutcome;
}

#[async_trait]
pub trait PromptStore: Send + Sync {
    /// Stored override for `kind`. `customer == None` asks for the stored default.
    async fn find_prompt(
        &self,
        kind: PromptKind,
        customer: Option<&CustomerId>,
    ) -> Result<Option<String>, PromptStoreError>;
}

#[async_trait]
impl<T: SchemaDescriptor + ?Sized> SchemaDescriptor for Arc<T> {
    async fn describe(
        &self,
        connection: &ConnectionRef,
    ) -> Result<Arc<SchemaDescription>, ConnectivityError> {
        (**self).describe(connection).await
    }
}

#[async_trait]
impl<T: ExecutionAdapter + ?Sized> ExecutionAdapter for Arc<T> {
    async fn run(&self, sql: &str, connection: &ConnectionRef) -> ExecutionOutcome {
        (**self).run(sql, connection).await
    }
}

#[async_trait]
impl<T: PromptStore + ?Sized> PromptStore for Arc<T> {
    async fn find_prompt(
        &self,
        kind: PromptKind,
        customer: Option<&CustomerId>,
    ) -> Result<Option<String>, PromptStoreError> {
        (**self).find_prompt(kind, customer).await
    }
}
