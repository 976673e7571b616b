use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use tracing::debug;

use textsql_core::domain::prompt::{CustomerId, PromptKind, PromptTemplate};
use textsql_core::errors::PromptStoreError;
use textsql_core::ports::PromptStore;

use super::{customer_scope, PromptRepository, RepositoryError};
use crate::DbPool;

#[derive(Clone)]
pub struct SqlPromptRepository {
    pool: DbPool,
}

impl SqlPromptRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_template(row: &sqlx::sqlite::SqliteRow) -> Result<PromptTemplate, RepositoryError> {
    let kind: String = row.try_get("kind").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let customer_id: String =
        row.try_get("customer_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let template: String =
        row.try_get("template").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let description: Option<String> =
        row.try_get("description").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let updated_at_str: String =
        row.try_get("updated_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let kind = PromptKind::parse(&kind)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown prompt kind `{kind}`")))?;
    let updated_at = DateTime::parse_from_rfc3339(&updated_at_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(PromptTemplate {
        kind,
        customer: (!customer_id.is_empty()).then(|| CustomerId(customer_id)),
        template,
        description,
        updated_at,
    })
}

#[async_trait]
impl PromptStore for SqlPromptRepository {
    async fn find_prompt(
        &self,
        kind: PromptKind,
        customer: Option<&CustomerId>,
    ) -> Result<Option<String>, PromptStoreError> {
        let template: Option<String> = sqlx::query_scalar(
            "SELECT template FROM prompt_template WHERE kind = ?1 AND customer_id = ?2",
        )
        .bind(kind.as_str())
        .bind(customer_scope(customer))
        .fetch_optional(&self.pool)
        .await
        .map_err(RepositoryError::from)?;
        Ok(template)
    }
}

#[async_trait]
impl PromptRepository for SqlPromptRepository {
    async fn upsert(&self, template: PromptTemplate) -> Result<PromptTemplate, RepositoryError> {
        let scope = customer_scope(template.customer.as_ref()).to_string();
        let now = template.updated_at.to_rfc3339();

        sqlx::query(
            "INSERT INTO prompt_template (id, kind, customer_id, template, description, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
             ON CONFLICT (kind, customer_id) DO UPDATE SET
                template = excluded.template,
                description = excluded.description,
                updated_at = excluded.updated_at",
        )
        .bind(format!("{}:{}", template.kind.as_str(), scope))
        .bind(template.kind.as_str())
        .bind(&scope)
        .bind(&template.template)
        .bind(&template.description)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        debug!(
            event_name = "db.prompt.upserted",
            kind = template.kind.as_str(),
            customer_scope = %scope,
            "stored prompt template"
        );
        Ok(template)
    }

    async fn list_for_customer(
        &self,
        customer: Option<&CustomerId>,
    ) -> Result<Vec<PromptTemplate>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT kind, customer_id, template, description, updated_at
             FROM prompt_template
             WHERE customer_id = '' OR customer_id = ?1
             ORDER BY kind, customer_id",
        )
        .bind(customer_scope(customer))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_template).collect()
    }

    async fn delete(
        &self,
        kind: PromptKind,
        customer: Option<&CustomerId>,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM prompt_template WHERE kind = ?1 AND customer_id = ?2")
            .bind(kind.as_str())
            .bind(customer_scope(customer))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
