use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use textsql_core::domain::prompt::{CustomerId, PromptKind, PromptTemplate};
use textsql_core::errors::PromptStoreError;
use textsql_core::ports::PromptStore;

use super::{customer_scope, PromptRepository, RepositoryError};

type PromptKey = (PromptKind, String);

#[derive(Default)]
pub struct InMemoryPromptRepository {
    templates: RwLock<BTreeMap<PromptKey, PromptTemplate>>,
}

impl InMemoryPromptRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PromptStore for InMemoryPromptRepository {
    async fn find_prompt(
        &self,
        kind: PromptKind,
        customer: Option<&CustomerId>,
    ) -> Result<Option<String>, PromptStoreError> {
        let templates = self.templates.read().await;
        Ok(templates
            .get(&(kind, customer_scope(customer).to_string()))
            .map(|template| template.template.clone()))
    }
}

#[async_trait]
impl PromptRepository for InMemoryPromptRepository {
    async fn upsert(&self, template: PromptTemplate) -> Result<PromptTemplate, RepositoryError> {
        let key = (template.kind, customer_scope(template.customer.as_ref()).to_string());
        self.templates.write().await.insert(key, template.clone());
        Ok(template)
    }

    async fn list_for_customer(
        &self,
        customer: Option<&CustomerId>,
    ) -> Result<Vec<PromptTemplate>, RepositoryError> {
        let scope = customer_scope(customer);
        let templates = self.templates.read().await;
        Ok(templates
            .iter()
            .filter(|((_, owner), _)| owner.is_empty() || owner == scope)
            .map(|(_, template)| template.clone())
            .collect())
    }

    async fn delete(
        &self,
        kind: PromptKind,
        customer: Option<&CustomerId>,
    ) -> Result<bool, RepositoryError> {
        let key = (kind, customer_scope(customer).to_string());
        Ok(self.templates.write().await.remove(&key).is_some())
    }
}
