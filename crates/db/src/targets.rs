use std::collections::BTreeMap;
use std::sync::Arc;

use textsql_core::config::TargetConfig;
use textsql_core::domain::schema::ConnectionRef;
use textsql_core::errors::ConnectivityError;
use tokio::sync::RwLock;
use tracing::info;

use crate::connection::{connect_target, DbPool};

/// Pools of the databases questions are asked against, by connection name.
#[derive(Clone, Default)]
pub struct TargetRegistry {
    pools: Arc<RwLock<BTreeMap<ConnectionRef, DbPool>>>,
}

impl TargetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens the configured target and registers it as the default connection.
    pub async fn from_config(config: &TargetConfig) -> Result<Self, ConnectivityError> {
        let registry = Self::new();
        let pool = connect_target(
            &config.url,
            config.max_connections,
            config.timeout_secs,
            config.read_only,
        )
        .await
        .map_err(|error| ConnectivityError::Unreachable {
            connection: ConnectionRef::DEFAULT.to_string(),
            message: error.to_string(),
        })?;
        registry.register(ConnectionRef::default(), pool).await;
        info!(
            event_name = "db.target.registered",
            connection = ConnectionRef::DEFAULT,
            read_only = config.read_only,
            "registered target database"
        );
        Ok(registry)
    }

    pub async fn register(&self, connection: ConnectionRef, pool: DbPool) {
        self.pools.write().await.insert(connection, pool);
    }

    pub async fn pool(&self, connection: &ConnectionRef) -> Result<DbPool, ConnectivityError> {
        self.pools
            .read()
            .await
            .get(connection)
            .cloned()
            .ok_or_else(|| ConnectivityError::UnknownConnection(connection.to_string()))
    }

    pub async fn connections(&self) -> Vec<ConnectionRef> {
        self.pools.read().await.keys().cloned().collect()
    }

    /// Round-trips `SELECT 1` on `connection`.
    pub async fn ping(&self, connection: &ConnectionRef) -> Result<(), ConnectivityError> {
        let pool = self.pool(connection).await?;
        sqlx::query("SELECT 1").execute(&pool).await.map(|_| ()).map_err(|error| {
            ConnectivityError::Unreachable {
                connection: connection.to_string(),
                message: error.to_string(),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use textsql_core::domain::schema::ConnectionRef;
    use textsql_core::errors::ConnectivityError;

    use super::TargetRegistry;
    use crate::connect_with_settings;

    #[tokio::test]
    async fn unknown_connection_is_a_connectivity_error() {
        let registry = TargetRegistry::new();

        let missing = registry.pool(&ConnectionRef::new("warehouse")).await;

        assert!(matches!(missing, Err(ConnectivityError::UnknownConnection(name)) if name == "warehouse"));
    }

    #[tokio::test]
    async fn registered_pool_answers_ping() {
        let registry = TargetRegistry::new();
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("connect");
        registry.register(ConnectionRef::default(), pool).await;

        registry.ping(&ConnectionRef::default()).await.expect("ping");
        assert_eq!(registry.connections().await, vec![ConnectionRef::default()]);
    }
}
