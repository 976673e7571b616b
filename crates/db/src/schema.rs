use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::Row;
use textsql_core::domain::schema::{ColumnInfo, ConnectionRef, ForeignKey, SchemaDescription, TableInfo};
use textsql_core::errors::ConnectivityError;
use textsql_core::ports::SchemaDescriptor;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::connection::DbPool;
use crate::rows::decode_record;
use crate::targets::TargetRegistry;

/// Introspects SQLite targets through `sqlite_master` and the table pragmas.
#[derive(Clone)]
pub struct SqliteSchemaDescriptor {
    targets: TargetRegistry,
    sample_rows: usize,
}

impl SqliteSchemaDescriptor {
    pub fn new(targets: TargetRegistry, sample_rows: usize) -> Self {
        Self { targets, sample_rows }
    }

    async fn introspect(&self, pool: &DbPool) -> Result<SchemaDescription, sqlx::Error> {
        let table_names: Vec<String> = sqlx::query_scalar(
            r"SELECT name FROM sqlite_master
              WHERE type = 'table'
                AND name NOT LIKE 'sqlite\_%' ESCAPE '\'
                AND name NOT LIKE '\_sqlx\_%' ESCAPE '\'
              ORDER BY name",
        )
        .fetch_all(pool)
        .await?;

        let mut description = SchemaDescription::default();
        for name in table_names {
            let table = describe_table(pool, &name).await?;
            if self.sample_rows > 0 {
                let samples = sample_rows(pool, &name, self.sample_rows).await?;
                description.samples.insert(name.clone(), samples);
            }
            description.tables.push(table);
        }
        Ok(description)
    }
}

#[async_trait]
impl SchemaDescriptor for SqliteSchemaDescriptor {
    async fn describe(
        &self,
        connection: &ConnectionRef,
    ) -> Result<Arc<SchemaDescription>, ConnectivityError> {
        let pool = self.targets.pool(connection).await?;
        let description = self.introspect(&pool).await.map_err(|error| {
            ConnectivityError::Introspection {
                connection: connection.to_string(),
                message: error.to_string(),
            }
        })?;
        debug!(
            event_name = "db.schema.introspected",
            connection = %connection,
            tables = description.tables.len(),
            "introspected target schema"
        );
        Ok(Arc::new(description))
    }
}

async fn describe_table(pool: &DbPool, table: &str) -> Result<TableInfo, sqlx::Error> {
    let column_rows = sqlx::query(
        r#"SELECT name, type, "notnull", pk FROM pragma_table_info(?1) ORDER BY cid"#,
    )
    .bind(table)
    .fetch_all(pool)
    .await?;

    let mut columns = Vec::with_capacity(column_rows.len());
    let mut primary_keys: Vec<(i64, String)> = Vec::new();
    for row in column_rows {
        let name: String = row.try_get("name")?;
        let data_type: String = row.try_get("type")?;
        let not_null: i64 = row.try_get("notnull")?;
        let pk: i64 = row.try_get("pk")?;
        if pk > 0 {
            primary_keys.push((pk, name.clone()));
        }
        columns.push(ColumnInfo { name, data_type, nullable: not_null == 0 && pk == 0 });
    }
    primary_keys.sort();

    let foreign_keys = sqlx::query(
        r#"SELECT "from", "table", "to" FROM pragma_foreign_key_list(?1) ORDER BY id, seq"#,
    )
    .bind(table)
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(|row| {
        Ok(ForeignKey {
            column: row.try_get("from")?,
            references_table: row.try_get("table")?,
            references_column: row.try_get::<Option<String>, _>("to")?.unwrap_or_default(),
        })
    })
    .collect::<Result<Vec<_>, sqlx::Error>>()?;

    Ok(TableInfo {
        name: table.to_string(),
        columns,
        primary_keys: primary_keys.into_iter().map(|(_, name)| name).collect(),
        foreign_keys,
    })
}

async fn sample_rows(
    pool: &DbPool,
    table: &str,
    limit: usize,
) -> Result<Vec<serde_json::Map<String, serde_json::Value>>, sqlx::Error> {
    let sql = format!("SELECT * FROM {} LIMIT {limit}", quote_identifier(table));
    sqlx::query(&sql).fetch_all(pool).await?.iter().map(decode_record).collect()
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Caches descriptions per connection. Entries are read-only once loaded;
/// [`SchemaCache::refresh`] replaces one.
pub struct SchemaCache<D> {
    inner: D,
    entries: RwLock<HashMap<ConnectionRef, Arc<SchemaDescription>>>,
}

impl<D: SchemaDescriptor> SchemaCache<D> {
    pub fn new(inner: D) -> Self {
        Self { inner, entries: RwLock::new(HashMap::new()) }
    }

    pub async fn refresh(
        &self,
        connection: &ConnectionRef,
    ) -> Result<Arc<SchemaDescription>, ConnectivityError> {
        let description = self.inner.describe(connection).await?;
        self.entries.write().await.insert(connection.clone(), description.clone());
        info!(
            event_name = "db.schema.refreshed",
            connection = %connection,
            tables = description.tables.len(),
            "schema cache refreshed"
        );
        Ok(description)
    }

    pub async fn invalidate(&self, connection: &ConnectionRef) {
        self.entries.write().await.remove(connection);
    }

    pub async fn cached(&self, connection: &ConnectionRef) -> Option<Arc<SchemaDescription>> {
        self.entries.read().await.get(connection).cloned()
    }
}

#[async_trait]
impl<D: SchemaDescriptor> SchemaDescriptor for SchemaCache<D> {
    async fn describe(
        &self,
        connection: &ConnectionRef,
    ) -> Result<Arc<SchemaDescription>, ConnectivityError> {
        if let Some(description) = self.cached(connection).await {
            return Ok(description);
        }
        self.refresh(connection).await
    }
}

/// Column names per table, for quick listings.
pub fn table_columns(description: &SchemaDescription) -> BTreeMap<String, Vec<String>> {
    description
        .tables
        .iter()
        .map(|table| {
            (table.name.clone(), table.columns.iter().map(|column| column.name.clone()).collect())
        })
        .collect()
}
