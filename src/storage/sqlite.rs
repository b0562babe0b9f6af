//! SQLite Persistent Storage
//!
//! Durable ledger, registry and accounts that survive service restarts.
//! Uses connection pooling via r2d2. Compound mutations run inside one SQL
//! transaction, and status updates are guarded by `status = 'processing'`
//! so terminal records are never overwritten.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

use super::traits::{AccountStore, CurrencyRegistry, StorageError, StorageResult, WithdrawalLedger};
use crate::types::{
    Account, InvalidTransition, Referral, SupportedCurrency, WithdrawalRecord, WithdrawalStatus,
};

/// SQLite-backed store with connection pooling
pub struct SqliteStore {
    pool: Pool<SqliteConnectionManager>,
}

fn db_err(e: rusqlite::Error) -> StorageError {
    StorageError::Database(e.to_string())
}

/// PRIMARY KEY (1555) or UNIQUE (2067) violation
fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.extended_code == 1555 || err.extended_code == 2067
    )
}

/// Point values are stored as INTEGER, which is signed
fn points_param(points: u64) -> StorageResult<i64> {
    i64::try_from(points)
        .map_err(|_| StorageError::InvalidData(format!("point value out of range: {}", points)))
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_default()
}

impl SqliteStore {
    /// Open the database file, creating it and running migrations if needed
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self, StorageError> {
        if let Some(parent) = db_path.as_ref().parent() {
            std::fs::create_dir_all(parent).ok();
        }

        let manager = SqliteConnectionManager::file(db_path);
        let pool = Pool::builder()
            .max_size(10)
            .build(manager)
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations()?;

        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> Result<Self, StorageError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations()?;

        Ok(store)
    }

    /// Get a connection from the pool
    ///
    /// The in-memory pool holds a single connection, so helpers below take
    /// `&Connection` instead of checking out a second one.
    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, StorageError> {
        self.pool
            .get()
            .map_err(|e| StorageError::Connection(e.to_string()))
    }

    fn run_migrations(&self) -> Result<(), StorageError> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS withdrawals (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                currency TEXT NOT NULL,
                amount REAL NOT NULL,
                points_deducted INTEGER NOT NULL,
                crypto_address TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'processing',
                transaction_hash TEXT,
                network_fee REAL NOT NULL DEFAULT 0,
                exchange_rate REAL NOT NULL DEFAULT 0,
                usd_value REAL NOT NULL DEFAULT 0,
                blockchain_confirmations INTEGER NOT NULL DEFAULT 0,
                error_message TEXT,
                created_at INTEGER NOT NULL,
                processed_at INTEGER,
                completed_at INTEGER
            );

            CREATE INDEX IF NOT EXISTS idx_withdrawals_user ON withdrawals(user_id, created_at);
            CREATE INDEX IF NOT EXISTS idx_withdrawals_status ON withdrawals(status);
            CREATE INDEX IF NOT EXISTS idx_withdrawals_tx_hash ON withdrawals(transaction_hash);

            CREATE TABLE IF NOT EXISTS supported_cryptos (
                symbol TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1,
                network_fee REAL NOT NULL DEFAULT 0,
                confirmations_required INTEGER NOT NULL DEFAULT 1,
                conversion_rate REAL NOT NULL,
                min_withdrawal REAL NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS accounts (
                user_id TEXT PRIMARY KEY,
                referral_code TEXT NOT NULL UNIQUE,
                points INTEGER NOT NULL DEFAULT 0,
                total_earned INTEGER NOT NULL DEFAULT 0,
                signup_bonus_claimed INTEGER NOT NULL DEFAULT 0,
                referred_by TEXT,
                created_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS referrals (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                referrer_id TEXT NOT NULL,
                referred_id TEXT NOT NULL UNIQUE,
                reward_points_referrer INTEGER NOT NULL,
                reward_points_referred INTEGER NOT NULL,
                created_at INTEGER NOT NULL
            );
            "#,
        )
        .map_err(db_err)?;

        let seeded: i64 = conn
            .query_row("SELECT COUNT(*) FROM supported_cryptos", [], |row| row.get(0))
            .map_err(db_err)?;

        if seeded == 0 {
            for currency in SupportedCurrency::defaults() {
                Self::upsert_currency_with(&conn, &currency)?;
            }
        }

        Ok(())
    }

    // Row mapping

    fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<WithdrawalRecord> {
        let status_str: String = row.get("status")?;
        let status = status_str.parse().unwrap_or_default();

        Ok(WithdrawalRecord {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            currency: row.get("currency")?,
            amount: row.get("amount")?,
            points_deducted: row.get::<_, i64>("points_deducted")? as u64,
            crypto_address: row.get("crypto_address")?,
            status,
            transaction_hash: row.get("transaction_hash")?,
            network_fee: row.get("network_fee")?,
            exchange_rate: row.get("exchange_rate")?,
            usd_value: row.get("usd_value")?,
            blockchain_confirmations: row.get::<_, i64>("blockchain_confirmations")? as u32,
            error_message: row.get("error_message")?,
            created_at: from_millis(row.get("created_at")?),
            processed_at: row.get::<_, Option<i64>>("processed_at")?.map(from_millis),
            completed_at: row.get::<_, Option<i64>>("completed_at")?.map(from_millis),
        })
    }

    fn row_to_currency(row: &rusqlite::Row) -> rusqlite::Result<SupportedCurrency> {
        Ok(SupportedCurrency {
            symbol: row.get("symbol")?,
            name: row.get("name")?,
            is_active: row.get("is_active")?,
            network_fee: row.get("network_fee")?,
            confirmations_required: row.get::<_, i64>("confirmations_required")?.max(0) as u32,
            conversion_rate: row.get("conversion_rate")?,
            min_withdrawal: row.get("min_withdrawal")?,
        })
    }

    fn row_to_account(row: &rusqlite::Row) -> rusqlite::Result<Account> {
        Ok(Account {
            user_id: row.get("user_id")?,
            referral_code: row.get("referral_code")?,
            points: row.get::<_, i64>("points")? as u64,
            total_earned: row.get::<_, i64>("total_earned")? as u64,
            signup_bonus_claimed: row.get("signup_bonus_claimed")?,
            referred_by: row.get("referred_by")?,
            created_at: from_millis(row.get("created_at")?),
        })
    }

    // Connection-scoped helpers, usable inside a transaction

    fn fetch_withdrawal(conn: &Connection, id: &str) -> StorageResult<Option<WithdrawalRecord>> {
        conn.query_row(
            "SELECT * FROM withdrawals WHERE id = ?1",
            params![id],
            |row| Self::row_to_record(row),
        )
        .optional()
        .map_err(db_err)
    }

    fn fetch_account(conn: &Connection, user_id: &str) -> StorageResult<Option<Account>> {
        conn.query_row(
            "SELECT * FROM accounts WHERE user_id = ?1",
            params![user_id],
            |row| Self::row_to_account(row),
        )
        .optional()
        .map_err(db_err)
    }

    /// Explain why a guarded status update touched no rows
    fn transition_error(conn: &Connection, id: &str, to: WithdrawalStatus) -> StorageError {
        match Self::fetch_withdrawal(conn, id) {
            Ok(Some(record)) => StorageError::InvalidTransition(InvalidTransition {
                id: id.to_string(),
                from: record.status,
                to,
            }),
            Ok(None) => StorageError::NotFound(id.to_string()),
            Err(e) => e,
        }
    }

    fn upsert_currency_with(conn: &Connection, currency: &SupportedCurrency) -> StorageResult<()> {
        conn.execute(
            r#"
            INSERT INTO supported_cryptos (
                symbol, name, is_active, network_fee,
                confirmations_required, conversion_rate, min_withdrawal
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(symbol) DO UPDATE SET
                name = excluded.name,
                is_active = excluded.is_active,
                network_fee = excluded.network_fee,
                confirmations_required = excluded.confirmations_required,
                conversion_rate = excluded.conversion_rate,
                min_withdrawal = excluded.min_withdrawal
            "#,
            params![
                currency.symbol,
                currency.name,
                currency.is_active,
                currency.network_fee,
                currency.confirmations_required as i64,
                currency.conversion_rate,
                currency.min_withdrawal,
            ],
        )
        .map_err(db_err)?;

        Ok(())
    }

    // Synchronous helper methods for the trait implementations

    fn open_withdrawal_sync(&self, record: &WithdrawalRecord) -> StorageResult<u64> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(db_err)?;

        let available = tx
            .query_row(
                "SELECT points FROM accounts WHERE user_id = ?1",
                params![record.user_id],
                |row| row.get::<_, i64>(0),
            )
            .optional()
            .map_err(db_err)?
            .ok_or_else(|| StorageError::NotFound(record.user_id.clone()))?
            .max(0) as u64;

        let cost = points_param(record.points_deducted)?;

        let debited = tx
            .execute(
                "UPDATE accounts SET points = points - ?2 WHERE user_id = ?1 AND points >= ?2",
                params![record.user_id, cost],
            )
            .map_err(db_err)?;

        if debited == 0 {
            return Err(StorageError::InsufficientPoints {
                user_id: record.user_id.clone(),
                required: record.points_deducted,
                available,
            });
        }

        tx.execute(
            r#"
            INSERT INTO withdrawals (
                id, user_id, currency, amount, points_deducted, crypto_address,
                status, transaction_hash, network_fee, exchange_rate, usd_value,
                blockchain_confirmations, error_message, created_at,
                processed_at, completed_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6,
                ?7, ?8, ?9, ?10, ?11,
                ?12, ?13, ?14,
                ?15, ?16
            )
            "#,
            params![
                record.id,
                record.user_id,
                record.currency,
                record.amount,
                cost,
                record.crypto_address,
                record.status.to_string(),
                record.transaction_hash,
                record.network_fee,
                record.exchange_rate,
                record.usd_value,
                record.blockchain_confirmations as i64,
                record.error_message,
                record.created_at.timestamp_millis(),
                record.processed_at.map(|t| t.timestamp_millis()),
                record.completed_at.map(|t| t.timestamp_millis()),
            ],
        )
        .map_err(|e| {
            if is_constraint_violation(&e) {
                return StorageError::Duplicate(record.id.clone());
            }
            db_err(e)
        })?;

        let balance: i64 = tx
            .query_row(
                "SELECT points FROM accounts WHERE user_id = ?1",
                params![record.user_id],
                |row| row.get(0),
            )
            .map_err(db_err)?;

        tx.commit().map_err(db_err)?;

        Ok(balance.max(0) as u64)
    }

    fn complete_withdrawal_sync(
        &self,
        id: &str,
        transaction_hash: &str,
        at: DateTime<Utc>,
    ) -> StorageResult<WithdrawalRecord> {
        let conn = self.conn()?;

        let updated = conn
            .execute(
                r#"
            UPDATE withdrawals SET
                status = 'completed',
                transaction_hash = ?2,
                processed_at = ?3,
                completed_at = ?3
            WHERE id = ?1 AND status = 'processing'
            "#,
                params![id, transaction_hash, at.timestamp_millis()],
            )
            .map_err(db_err)?;

        if updated == 0 {
            return Err(Self::transition_error(&conn, id, WithdrawalStatus::Completed));
        }

        Self::fetch_withdrawal(&conn, id)?.ok_or_else(|| StorageError::NotFound(id.to_string()))
    }

    fn fail_withdrawal_sync(
        &self,
        id: &str,
        error: &str,
        refund: bool,
    ) -> StorageResult<WithdrawalRecord> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(db_err)?;

        let updated = tx
            .execute(
                "UPDATE withdrawals SET status = 'failed', error_message = ?2 \
                 WHERE id = ?1 AND status = 'processing'",
                params![id, error],
            )
            .map_err(db_err)?;

        if updated == 0 {
            return Err(Self::transition_error(&tx, id, WithdrawalStatus::Failed));
        }

        let record = Self::fetch_withdrawal(&tx, id)?
            .ok_or_else(|| StorageError::NotFound(id.to_string()))?;

        if refund {
            tx.execute(
                "UPDATE accounts SET points = points + ?2 WHERE user_id = ?1",
                params![record.user_id, points_param(record.points_deducted)?],
            )
            .map_err(db_err)?;
        }

        tx.commit().map_err(db_err)?;

        Ok(record)
    }

    fn record_confirmations_sync(&self, id: &str, confirmations: u32) -> StorageResult<()> {
        let conn = self.conn()?;

        let updated = conn
            .execute(
                "UPDATE withdrawals SET blockchain_confirmations = ?2 WHERE id = ?1",
                params![id, confirmations as i64],
            )
            .map_err(db_err)?;

        if updated == 0 {
            return Err(StorageError::NotFound(id.to_string()));
        }

        Ok(())
    }

    fn query_withdrawals(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> StorageResult<Vec<WithdrawalRecord>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(sql).map_err(db_err)?;
        let records = stmt
            .query_map(params, |row| Self::row_to_record(row))
            .map_err(db_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err)?;

        Ok(records)
    }

    fn create_account_sync(&self, account: &Account) -> StorageResult<()> {
        let conn = self.conn()?;

        conn.execute(
            r#"
            INSERT INTO accounts (
                user_id, referral_code, points, total_earned,
                signup_bonus_claimed, referred_by, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                account.user_id,
                account.referral_code,
                points_param(account.points)?,
                points_param(account.total_earned)?,
                account.signup_bonus_claimed,
                account.referred_by,
                account.created_at.timestamp_millis(),
            ],
        )
        .map_err(|e| {
            if is_constraint_violation(&e) {
                return StorageError::Duplicate(account.user_id.clone());
            }
            db_err(e)
        })?;

        Ok(())
    }

    fn claim_signup_bonus_sync(&self, user_id: &str, bonus: u64) -> StorageResult<Account> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(db_err)?;

        let account = Self::fetch_account(&tx, user_id)?
            .ok_or_else(|| StorageError::NotFound(user_id.to_string()))?;

        if account.signup_bonus_claimed {
            return Err(StorageError::Duplicate(format!("signup bonus for {}", user_id)));
        }

        tx.execute(
            r#"
            UPDATE accounts SET
                signup_bonus_claimed = 1,
                points = points + ?2,
                total_earned = total_earned + ?2
            WHERE user_id = ?1 AND signup_bonus_claimed = 0
            "#,
            params![user_id, points_param(bonus)?],
        )
        .map_err(db_err)?;

        let account = Self::fetch_account(&tx, user_id)?
            .ok_or_else(|| StorageError::NotFound(user_id.to_string()))?;

        tx.commit().map_err(db_err)?;

        Ok(account)
    }

    fn apply_referral_sync(&self, referral: &Referral) -> StorageResult<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(db_err)?;

        if Self::fetch_account(&tx, &referral.referrer_id)?.is_none() {
            return Err(StorageError::NotFound(referral.referrer_id.clone()));
        }

        let referred = Self::fetch_account(&tx, &referral.referred_id)?
            .ok_or_else(|| StorageError::NotFound(referral.referred_id.clone()))?;

        if referred.referred_by.is_some() {
            return Err(StorageError::Duplicate(referral.referred_id.clone()));
        }

        tx.execute(
            r#"
            INSERT INTO referrals (
                referrer_id, referred_id, reward_points_referrer,
                reward_points_referred, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                referral.referrer_id,
                referral.referred_id,
                points_param(referral.reward_points_referrer)?,
                points_param(referral.reward_points_referred)?,
                referral.created_at.timestamp_millis(),
            ],
        )
        .map_err(|e| {
            if is_constraint_violation(&e) {
                return StorageError::Duplicate(referral.referred_id.clone());
            }
            db_err(e)
        })?;

        tx.execute(
            r#"
            UPDATE accounts SET
                points = points + ?2,
                total_earned = total_earned + ?2,
                referred_by = ?3
            WHERE user_id = ?1
            "#,
            params![
                referral.referred_id,
                points_param(referral.reward_points_referred)?,
                referral.referrer_id,
            ],
        )
        .map_err(db_err)?;

        tx.execute(
            "UPDATE accounts SET points = points + ?2, total_earned = total_earned + ?2 \
             WHERE user_id = ?1",
            params![referral.referrer_id, points_param(referral.reward_points_referrer)?],
        )
        .map_err(db_err)?;

        tx.commit().map_err(db_err)?;

        Ok(())
    }
}

#[async_trait]
impl WithdrawalLedger for SqliteStore {
    async fn open_withdrawal(&self, record: &WithdrawalRecord) -> StorageResult<u64> {
        self.open_withdrawal_sync(record)
    }

    async fn complete_withdrawal(
        &self,
        id: &str,
        transaction_hash: &str,
        at: DateTime<Utc>,
    ) -> StorageResult<WithdrawalRecord> {
        self.complete_withdrawal_sync(id, transaction_hash, at)
    }

    async fn fail_withdrawal(
        &self,
        id: &str,
        error: &str,
        refund: bool,
    ) -> StorageResult<WithdrawalRecord> {
        self.fail_withdrawal_sync(id, error, refund)
    }

    async fn record_confirmations(&self, id: &str, confirmations: u32) -> StorageResult<()> {
        self.record_confirmations_sync(id, confirmations)
    }

    async fn get_withdrawal(&self, id: &str) -> StorageResult<Option<WithdrawalRecord>> {
        let conn = self.conn()?;
        Self::fetch_withdrawal(&conn, id)
    }

    async fn get_by_transaction_hash(
        &self,
        hash: &str,
    ) -> StorageResult<Option<WithdrawalRecord>> {
        let records = self.query_withdrawals(
            "SELECT * FROM withdrawals WHERE transaction_hash = ?1 LIMIT 1",
            params![hash],
        )?;
        Ok(records.into_iter().next())
    }

    async fn list_for_user(
        &self,
        user_id: &str,
        limit: usize,
    ) -> StorageResult<Vec<WithdrawalRecord>> {
        self.query_withdrawals(
            "SELECT * FROM withdrawals WHERE user_id = ?1 ORDER BY created_at DESC LIMIT ?2",
            params![user_id, limit as i64],
        )
    }

    async fn list_stale_processing(
        &self,
        older_than: DateTime<Utc>,
    ) -> StorageResult<Vec<WithdrawalRecord>> {
        self.query_withdrawals(
            "SELECT * FROM withdrawals WHERE status = 'processing' AND created_at < ?1 \
             ORDER BY created_at ASC",
            params![older_than.timestamp_millis()],
        )
    }
}

#[async_trait]
impl CurrencyRegistry for SqliteStore {
    async fn get_currency(&self, symbol: &str) -> StorageResult<Option<SupportedCurrency>> {
        let conn = self.conn()?;

        conn.query_row(
            "SELECT * FROM supported_cryptos WHERE symbol = ?1",
            params![symbol],
            |row| Self::row_to_currency(row),
        )
        .optional()
        .map_err(db_err)
    }

    async fn list_currencies(&self) -> StorageResult<Vec<SupportedCurrency>> {
        let conn = self.conn()?;

        let mut stmt = conn
            .prepare("SELECT * FROM supported_cryptos ORDER BY symbol ASC")
            .map_err(db_err)?;

        let currencies = stmt
            .query_map([], |row| Self::row_to_currency(row))
            .map_err(db_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err)?;

        Ok(currencies)
    }

    async fn upsert_currency(&self, currency: &SupportedCurrency) -> StorageResult<()> {
        let conn = self.conn()?;
        Self::upsert_currency_with(&conn, currency)
    }
}

#[async_trait]
impl AccountStore for SqliteStore {
    async fn create_account(&self, account: &Account) -> StorageResult<()> {
        self.create_account_sync(account)
    }

    async fn get_account(&self, user_id: &str) -> StorageResult<Option<Account>> {
        let conn = self.conn()?;
        Self::fetch_account(&conn, user_id)
    }

    async fn find_by_referral_code(&self, code: &str) -> StorageResult<Option<Account>> {
        let conn = self.conn()?;

        conn.query_row(
            "SELECT * FROM accounts WHERE referral_code = ?1",
            params![code],
            |row| Self::row_to_account(row),
        )
        .optional()
        .map_err(db_err)
    }

    async fn claim_signup_bonus(&self, user_id: &str, bonus: u64) -> StorageResult<Account> {
        self.claim_signup_bonus_sync(user_id, bonus)
    }

    async fn apply_referral(&self, referral: &Referral) -> StorageResult<()> {
        self.apply_referral_sync(referral)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn store_with_account(user_id: &str, points: u64) -> SqliteStore {
        let store = SqliteStore::in_memory().unwrap();
        let mut account = Account::new(user_id.to_string());
        account.points = points;
        store.create_account_sync(&account).unwrap();
        store
    }

    fn create_test_record(user_id: &str, points: u64) -> WithdrawalRecord {
        WithdrawalRecord::new(
            user_id.to_string(),
            "ETH".to_string(),
            0.5,
            points,
            "0x742d35Cc6634C0532925a3b844Bc454e4438f44e".to_string(),
            0.002,
            3_000.0,
        )
    }

    #[tokio::test]
    async fn test_registry_seeded_once() {
        let store = SqliteStore::in_memory().unwrap();
        let currencies = store.list_currencies().await.unwrap();
        assert_eq!(currencies.len(), 6);
        assert_eq!(currencies[0].symbol, "BTC");

        let mut eth = store.get_currency("ETH").await.unwrap().unwrap();
        assert_eq!(eth.confirmations_required, 12);
        eth.is_active = false;
        store.upsert_currency(&eth).await.unwrap();

        store.run_migrations().unwrap();
        assert!(!store.get_currency("ETH").await.unwrap().unwrap().is_active);
    }

    #[tokio::test]
    async fn test_open_and_get() {
        let store = store_with_account("alice", 20_000);
        let record = create_test_record("alice", 15_000);

        assert_eq!(store.open_withdrawal(&record).await.unwrap(), 5_000);

        let retrieved = store.get_withdrawal(&record.id).await.unwrap().unwrap();
        assert_eq!(retrieved.status, WithdrawalStatus::Processing);
        assert_eq!(retrieved.points_deducted, 15_000);
        assert_eq!(retrieved.usd_value, 1_500.0);
        assert_eq!(
            retrieved.created_at.timestamp_millis(),
            record.created_at.timestamp_millis()
        );
    }

    #[tokio::test]
    async fn test_open_rejects_cost_beyond_integer_range() {
        let store = store_with_account("eve", 0);
        let record = create_test_record("eve", 10_000_000_000_000_000_000);

        let result = store.open_withdrawal(&record).await;
        assert!(matches!(result, Err(StorageError::InvalidData(_))));

        assert_eq!(store.get_account("eve").await.unwrap().unwrap().points, 0);
        assert!(store.get_withdrawal(&record.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_open_rolls_back_on_short_balance() {
        let store = store_with_account("bob", 1_000);
        let result = store.open_withdrawal(&create_test_record("bob", 15_000)).await;

        assert!(matches!(result, Err(StorageError::InsufficientPoints { .. })));
        assert!(store.list_for_user("bob", 10).await.unwrap().is_empty());
        assert_eq!(store.get_account("bob").await.unwrap().unwrap().points, 1_000);
    }

    #[tokio::test]
    async fn test_open_unknown_account() {
        let store = SqliteStore::in_memory().unwrap();
        assert!(matches!(
            store.open_withdrawal(&create_test_record("ghost", 1)).await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_terminal_states_are_final() {
        let store = store_with_account("carol", 15_000);
        let record = create_test_record("carol", 15_000);
        store.open_withdrawal(&record).await.unwrap();

        let done = store
            .complete_withdrawal(&record.id, "0xfeed", Utc::now())
            .await
            .unwrap();
        assert_eq!(done.transaction_hash.as_deref(), Some("0xfeed"));
        assert!(done.completed_at.is_some());

        let result = store.fail_withdrawal(&record.id, "late", true).await;
        assert!(matches!(result, Err(StorageError::InvalidTransition(_))));
        assert_eq!(store.get_account("carol").await.unwrap().unwrap().points, 0);

        assert!(matches!(
            store.complete_withdrawal("missing", "0x", Utc::now()).await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_fail_with_refund() {
        let store = store_with_account("dave", 15_000);
        let record = create_test_record("dave", 15_000);
        store.open_withdrawal(&record).await.unwrap();

        let failed = store.fail_withdrawal(&record.id, "rejected", true).await.unwrap();
        assert_eq!(failed.status, WithdrawalStatus::Failed);
        assert_eq!(failed.error_message.as_deref(), Some("rejected"));
        assert!(failed.transaction_hash.is_none());
        assert_eq!(store.get_account("dave").await.unwrap().unwrap().points, 15_000);
    }

    #[tokio::test]
    async fn test_history_and_stale() {
        let store = store_with_account("erin", 100_000);

        let mut old = create_test_record("erin", 10_000);
        old.created_at = Utc::now() - Duration::hours(2);
        let fresh = create_test_record("erin", 10_000);

        store.open_withdrawal(&old).await.unwrap();
        store.open_withdrawal(&fresh).await.unwrap();

        let history = store.list_for_user("erin", 10).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id, fresh.id);
        assert_eq!(store.list_for_user("erin", 1).await.unwrap().len(), 1);

        let stale = store
            .list_stale_processing(Utc::now() - Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].id, old.id);
    }

    #[tokio::test]
    async fn test_confirmations_and_hash_lookup() {
        let store = store_with_account("frank", 15_000);
        let record = create_test_record("frank", 15_000);
        store.open_withdrawal(&record).await.unwrap();
        store
            .complete_withdrawal(&record.id, "0xabc", Utc::now())
            .await
            .unwrap();

        store.record_confirmations(&record.id, 4).await.unwrap();
        let found = store.get_by_transaction_hash("0xabc").await.unwrap().unwrap();
        assert_eq!(found.blockchain_confirmations, 4);
        assert!(store.get_by_transaction_hash("0xdef").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_account() {
        let store = store_with_account("gina", 0);
        let result = store.create_account(&Account::new("gina".to_string())).await;
        assert!(matches!(result, Err(StorageError::Duplicate(_))));
    }

    #[tokio::test]
    async fn test_bonus_and_referral() {
        let store = store_with_account("referrer", 0);
        store
            .create_account(&Account::new("newbie".to_string()))
            .await
            .unwrap();

        let account = store.claim_signup_bonus("newbie", 1_000_000).await.unwrap();
        assert_eq!(account.points, 1_000_000);
        assert!(account.signup_bonus_claimed);
        assert!(matches!(
            store.claim_signup_bonus("newbie", 1_000_000).await,
            Err(StorageError::Duplicate(_))
        ));

        let referral = Referral {
            referrer_id: "referrer".to_string(),
            referred_id: "newbie".to_string(),
            reward_points_referrer: 250_000,
            reward_points_referred: 100_000,
            created_at: Utc::now(),
        };
        store.apply_referral(&referral).await.unwrap();

        let referrer = store.get_account("referrer").await.unwrap().unwrap();
        assert_eq!(referrer.points, 250_000);
        assert_eq!(referrer.total_earned, 250_000);

        let newbie = store.get_account("newbie").await.unwrap().unwrap();
        assert_eq!(newbie.points, 1_100_000);
        assert_eq!(newbie.referred_by.as_deref(), Some("referrer"));

        assert!(matches!(
            store.apply_referral(&referral).await,
            Err(StorageError::Duplicate(_))
        ));

        let by_code = store
            .find_by_referral_code(&referrer.referral_code)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_code.user_id, "referrer");
    }
}
