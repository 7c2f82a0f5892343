//! Ledger database setup: connection options, pool and the embedded schema.

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

const SCHEMA: &str = include_str!("schema.sql");
const POOL_SIZE: u32 = 5;
/// How long a writer waits on another connection's lock before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Open (creating if needed) the ledger database and apply the schema.
///
/// # Errors
/// Returns an error if the parent directory cannot be created, the database
/// cannot be opened, or a schema statement fails.
pub async fn init_db(db_path: &str) -> Result<SqlitePool, sqlx::Error> {
    if let Some(dir) = Path::new(db_path)
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
    {
        std::fs::create_dir_all(dir)?;
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(POOL_SIZE)
        .connect_with(connect_options(db_path))
        .await?;
    apply_schema(&pool).await?;

    info!(path = %db_path, "Ledger database ready");
    Ok(pool)
}

/// WAL with `synchronous=NORMAL`, foreign keys on, and a busy timeout so
/// concurrent ledger writers queue instead of erroring.
fn connect_options(db_path: &str) -> SqliteConnectOptions {
    SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(BUSY_TIMEOUT)
}

fn schema_statements() -> impl Iterator<Item = &'static str> {
    SCHEMA.split(';').map(str::trim).filter(|s| !s.is_empty())
}

/// Apply every schema statement in one transaction. Statements are
/// `IF NOT EXISTS`, so reapplying to an existing ledger is a no-op.
async fn apply_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    let mut applied = 0usize;
    for statement in schema_statements() {
        sqlx::query(statement).execute(&mut *tx).await?;
        applied += 1;
    }
    tx.commit().await?;

    debug!(statements = applied, "Ledger schema applied");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Repository;
    use crate::domain::{Asset, Decimal, Exchange, TimeMs, Transaction, TransactionType, UserId};
    use tempfile::TempDir;

    async fn open(temp: &TempDir, name: &str) -> (SqlitePool, String) {
        let path = temp.path().join(name).to_string_lossy().to_string();
        let pool = init_db(&path).await.expect("init_db failed");
        (pool, path)
    }

    async fn schema_objects(pool: &SqlitePool, kind: &str) -> Vec<String> {
        sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = ? AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .bind(kind)
        .fetch_all(pool)
        .await
        .unwrap()
    }

    fn deposit(external_id: &str) -> Transaction {
        Transaction::new(
            UserId::new("u1"),
            Exchange::new("kraken"),
            external_id,
            Asset::new("ETH"),
            Decimal::one(),
            TransactionType::Deposit,
            None,
            None,
            TimeMs::new(1_000),
        )
    }

    #[test]
    fn schema_splits_into_table_and_index_statements() {
        let statements: Vec<&str> = schema_statements().collect();
        assert_eq!(statements.len(), 8);
        assert!(statements
            .iter()
            .all(|s| s.starts_with("CREATE TABLE IF NOT EXISTS")
                || s.starts_with("CREATE INDEX IF NOT EXISTS")));
    }

    #[tokio::test]
    async fn test_init_db_creates_missing_directories() {
        let temp = TempDir::new().unwrap();
        let (pool, path) = open(&temp, "nested/data/ledger.db").await;
        assert!(Path::new(&path).exists());

        assert_eq!(
            schema_objects(&pool, "table").await,
            vec!["cost_basis_lots", "realized_gains", "transactions"]
        );
        assert_eq!(
            schema_objects(&pool, "index").await,
            vec![
                "idx_lots_fifo",
                "idx_lots_open",
                "idx_realized_user_asset",
                "idx_realized_user_time",
                "idx_transactions_user_time",
            ]
        );
    }

    #[tokio::test]
    async fn test_reopening_keeps_stored_transactions() {
        let temp = TempDir::new().unwrap();
        let (pool, path) = open(&temp, "ledger.db").await;
        let repo = Repository::new(pool.clone());
        assert!(repo.insert_transaction(&deposit("d-1")).await.unwrap());
        pool.close().await;

        let reopened = init_db(&path).await.expect("reopen failed");
        apply_schema(&reopened).await.expect("reapply failed");
        let repo = Repository::new(reopened);
        assert_eq!(
            repo.count_transactions_for_user(&UserId::new("u1")).await.unwrap(),
            1
        );
        assert!(!repo.insert_transaction(&deposit("d-1")).await.unwrap());
    }

    #[tokio::test]
    async fn test_transaction_ids_are_unique() {
        let temp = TempDir::new().unwrap();
        let (pool, _) = open(&temp, "ledger.db").await;

        let insert = "INSERT INTO transactions \
             (id, user_id, exchange, external_id, asset, amount, tx_type, timestamp_ms) \
             VALUES ('tx:1', 'u1', 'kraken', 'e1', 'ETH', '1', 'deposit', 0)";
        sqlx::query(insert).execute(&pool).await.unwrap();
        assert!(sqlx::query(insert).execute(&pool).await.is_err());
    }

    #[tokio::test]
    async fn test_connection_options_applied() {
        let temp = TempDir::new().unwrap();
        let (pool, _) = open(&temp, "ledger.db").await;
        let mut conn = pool.acquire().await.unwrap();

        let foreign_keys: i64 = sqlx::query_scalar("PRAGMA foreign_keys")
            .fetch_one(&mut *conn)
            .await
            .unwrap();
        assert_eq!(foreign_keys, 1);

        let busy_timeout: i64 = sqlx::query_scalar("PRAGMA busy_timeout")
            .fetch_one(&mut *conn)
            .await
            .unwrap();
        assert_eq!(busy_timeout, 5000);

        // 1 = NORMAL
        let synchronous: i64 = sqlx::query_scalar("PRAGMA synchronous")
            .fetch_one(&mut *conn)
            .await
            .unwrap();
        assert_eq!(synchronous, 1);

        let journal_mode: String = sqlx::query_scalar("PRAGMA journal_mode")
            .fetch_one(&mut *conn)
            .await
            .unwrap();
        // some filesystems refuse WAL and SQLite falls back
        assert!(
            matches!(journal_mode.as_str(), "wal" | "delete"),
            "unexpected journal_mode: {}",
            journal_mode
        );
    }
}
