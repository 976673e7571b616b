use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

pub type DbPool = sqlx::SqlitePool;

/// Pool for the application store (prompt templates).
pub async fn connect(database_url: &str) -> Result<DbPool, sqlx::Error> {
    connect_with_settings(database_url, 5, 30).await
}

pub async fn connect_with_settings(
    database_url: &str,
    max_connections: u32,
    timeout_secs: u64,
) -> Result<DbPool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
    SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .acquire_timeout(Duration::from_secs(timeout_secs.max(1)))
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                sqlx::query("PRAGMA foreign_keys = ON").execute(&mut *conn).await?;
                sqlx::query("PRAGMA journal_mode = WAL").execute(&mut *conn).await?;
                sqlx::query("PRAGMA busy_timeout = 5000").execute(&mut *conn).await?;
                Ok(())
            })
        })
        .connect_with(options)
        .await
}

/// Pool for a queried database. With `read_only` the file is opened
/// read-only and every connection additionally sets `query_only`.
pub async fn connect_target(
    database_url: &str,
    max_connections: u32,
    timeout_secs: u64,
    read_only: bool,
) -> Result<DbPool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .read_only(read_only)
        .create_if_missing(!read_only);
    SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .acquire_timeout(Duration::from_secs(timeout_secs.max(1)))
        .after_connect(move |conn, _meta| {
            Box::pin(async move {
                sqlx::query("PRAGMA busy_timeout = 5000").execute(&mut *conn).await?;
                if read_only {
                    sqlx::query("PRAGMA query_only = ON").execute(&mut *conn).await?;
                }
                Ok(())
            })
        })
        .connect_with(options)
        .await
}

#[cfg(test)]
mod tests {
    use super::connect_target;

    #[tokio::test]
    async fn read_only_target_refuses_writes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let url = format!("sqlite://{}", dir.path().join("target.db").display());

        let writable = connect_target(&url, 1, 5, false).await.expect("create database");
        sqlx::query("CREATE TABLE students (id INTEGER PRIMARY KEY, name TEXT)")
            .execute(&writable)
            .await
            .expect("create table");
        writable.close().await;

        let target = connect_target(&url, 1, 5, true).await.expect("open read-only");
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM students")
            .fetch_one(&target)
            .await
            .expect("read works");
        assert_eq!(count, 0);

        let write = sqlx::query("INSERT INTO students (name) VALUES ('Ada')").execute(&target).await;
        assert!(write.is_err());
    }
}
