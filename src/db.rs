//! SQLite-backed key-value store for bet records
//!
//! Layout mirrors a key-value store: one `bets` row per bet id holding its
//! fields, plus a `pointers` table for the well-known `last_id` and
//! `open_bet` keys. Every write is a single statement; multi-field updates
//! are issued back to back without a transaction, so a failure part way
//! through leaves the earlier writes in place.

use crate::codec::{decode_guesses, encode_guesses, GuessCipher};
use crate::error::BetResult;
use crate::types::{BetStatus, BetSummary, Guess};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::str::FromStr;
use tracing::{debug, info};

const LAST_ID_KEY: &str = "last_id";
const OPEN_BET_KEY: &str = "open_bet";

/// Database connection pool plus the optional guess cipher
pub struct Database {
    pool: SqlitePool,
    cipher: Option<GuessCipher>,
}

impl Database {
    /// Create a new database connection
    pub async fn new(path: &str, cipher: Option<GuessCipher>) -> BetResult<Self> {
        let options = SqliteConnectOptions::from_str(path)?.create_if_missing(true);

        // An in-memory database lives and dies with its connection
        let in_memory = path.contains(":memory:");
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };
        let pool = pool_options.connect_with(options).await?;

        let db = Self { pool, cipher };
        db.initialize().await?;

        Ok(db)
    }

    /// Fresh in-memory store, used by tests and dry runs
    pub async fn in_memory(cipher: Option<GuessCipher>) -> BetResult<Self> {
        Self::new("sqlite::memory:", cipher).await
    }

    /// Initialize database schema
    async fn initialize(&self) -> BetResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS bets (
                id INTEGER PRIMARY KEY,
                status TEXT NOT NULL,
                start_date TEXT NOT NULL,
                end_date TEXT NOT NULL DEFAULT '',
                winner INTEGER,
                details BLOB
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS pointers (
                name TEXT PRIMARY KEY,
                value INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        info!(encrypted = self.cipher.is_some(), "Bet store initialized");
        Ok(())
    }

    /// Close the pool. Later calls fail with `StoreUnavailable`.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Create an open bet and point `last_id` and `open_bet` at it.
    ///
    /// Three separate writes: if a later one fails the bet row stays behind.
    pub async fn create_bet(&self, id: i64, start_date: &str) -> BetResult<()> {
        let details = encode_guesses(&[], self.cipher.as_ref())?;

        sqlx::query(
            r#"
            INSERT INTO bets (id, status, start_date, end_date, details)
            VALUES (?, ?, ?, '', ?)
            ON CONFLICT(id) DO UPDATE SET
                status = excluded.status,
                start_date = excluded.start_date,
                details = excluded.details
            "#,
        )
        .bind(id)
        .bind(BetStatus::Open.as_str())
        .bind(start_date)
        .bind(details)
        .execute(&self.pool)
        .await?;

        self.set_pointer(LAST_ID_KEY, id).await?;
        self.set_pointer(OPEN_BET_KEY, id).await?;

        debug!(bet_id = id, "Created bet");
        Ok(())
    }

    /// Check if a bet with this id exists
    pub async fn bet_exists(&self, id: i64) -> BetResult<bool> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT id FROM bets WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    /// Get bet metadata without the guesses
    pub async fn get_summary(&self, id: i64) -> BetResult<Option<BetSummary>> {
        let row = sqlx::query(
            "SELECT id, status, start_date, end_date, winner FROM bets WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let summary = row
            .map(|r| -> Result<BetSummary, sqlx::Error> {
                let status: String = r.try_get("status")?;
                Ok(BetSummary {
                    id: r.try_get("id")?,
                    status: BetStatus::from_stored(&status),
                    start_date: r.try_get("start_date")?,
                    end_date: r.try_get("end_date")?,
                    winner_score: r.try_get("winner")?,
                })
            })
            .transpose()?;

        Ok(summary)
    }

    /// Get the guesses for a bet in submission order.
    /// An unknown bet or a missing payload both yield an empty list.
    pub async fn get_guesses(&self, id: i64) -> BetResult<Vec<Guess>> {
        let row: Option<(Option<Vec<u8>>,)> =
            sqlx::query_as("SELECT details FROM bets WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        match row.and_then(|(details,)| details) {
            Some(payload) => Ok(decode_guesses(&payload, self.cipher.as_ref())?),
            None => Ok(Vec::new()),
        }
    }

    /// Overwrite the stored guess list for a bet
    pub async fn set_guesses(&self, id: i64, guesses: &[Guess]) -> BetResult<()> {
        let details = encode_guesses(guesses, self.cipher.as_ref())?;
        sqlx::query("UPDATE bets SET details = ? WHERE id = ?")
            .bind(details)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Mark a bet closed and clear the open-bet pointer
    pub async fn set_ended(&self, id: i64, end_date: &str) -> BetResult<()> {
        sqlx::query("UPDATE bets SET status = ?, end_date = ? WHERE id = ?")
            .bind(BetStatus::Closed.as_str())
            .bind(end_date)
            .bind(id)
            .execute(&self.pool)
            .await?;

        sqlx::query("DELETE FROM pointers WHERE name = ?")
            .bind(OPEN_BET_KEY)
            .execute(&self.pool)
            .await?;

        debug!(bet_id = id, "Closed bet");
        Ok(())
    }

    /// Record the actual outcome for a bet
    pub async fn set_winner_score(&self, id: i64, score: i64) -> BetResult<()> {
        sqlx::query("UPDATE bets SET winner = ? WHERE id = ?")
            .bind(score)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Winner score of a bet, `None` while unset
    pub async fn get_winner_score(&self, id: i64) -> BetResult<Option<i64>> {
        let row: Option<(Option<i64>,)> = sqlx::query_as("SELECT winner FROM bets WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.and_then(|(winner,)| winner))
    }

    /// Id of the currently open bet, if any
    pub async fn get_open_bet_id(&self) -> BetResult<Option<i64>> {
        self.get_pointer(OPEN_BET_KEY).await
    }

    /// Id of the most recently created bet, if any
    pub async fn get_last_bet_id(&self) -> BetResult<Option<i64>> {
        self.get_pointer(LAST_ID_KEY).await
    }

    async fn get_pointer(&self, name: &str) -> BetResult<Option<i64>> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT value FROM pointers WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(value,)| value))
    }

    async fn set_pointer(&self, name: &str, value: i64) -> BetResult<()> {
        sqlx::query(
            r#"
            INSERT INTO pointers (name, value) VALUES (?, ?)
            ON CONFLICT(name) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(name)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Raw stored payload, for inspecting what actually lands on disk
    #[cfg(test)]
    pub(crate) async fn raw_details(&self, id: i64) -> BetResult<Option<Vec<u8>>> {
        let row: Option<(Option<Vec<u8>>,)> =
            sqlx::query_as("SELECT details FROM bets WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.and_then(|(details,)| details))
    }

    #[cfg(test)]
    pub(crate) async fn execute_raw(&self, sql: &str) -> BetResult<()> {
        sqlx::query(sql).execute(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BetError;

    #[tokio::test]
    async fn test_empty_store() {
        let db = Database::in_memory(None).await.unwrap();
        assert_eq!(db.get_last_bet_id().await.unwrap(), None);
        assert_eq!(db.get_open_bet_id().await.unwrap(), None);
        assert!(!db.bet_exists(1).await.unwrap());
        assert!(db.get_summary(1).await.unwrap().is_none());
        assert!(db.get_guesses(1).await.unwrap().is_empty());
        assert_eq!(db.get_winner_score(1).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_create_bet_sets_pointers() {
        let db = Database::in_memory(None).await.unwrap();
        db.create_bet(1, "03-01-2024").await.unwrap();

        assert!(db.bet_exists(1).await.unwrap());
        assert_eq!(db.get_last_bet_id().await.unwrap(), Some(1));
        assert_eq!(db.get_open_bet_id().await.unwrap(), Some(1));

        let summary = db.get_summary(1).await.unwrap().unwrap();
        assert_eq!(summary.status, BetStatus::Open);
        assert_eq!(summary.start_date, "03-01-2024");
        assert!(summary.end_date.is_empty());
        assert_eq!(summary.winner_score, None);

        assert_eq!(db.raw_details(1).await.unwrap().unwrap(), b"[]".to_vec());
    }

    #[tokio::test]
    async fn test_set_ended_clears_open_pointer() {
        let db = Database::in_memory(None).await.unwrap();
        db.create_bet(1, "03-01-2024").await.unwrap();
        db.set_ended(1, "03-08-2024").await.unwrap();

        assert_eq!(db.get_open_bet_id().await.unwrap(), None);
        assert_eq!(db.get_last_bet_id().await.unwrap(), Some(1));

        let summary = db.get_summary(1).await.unwrap().unwrap();
        assert_eq!(summary.status, BetStatus::Closed);
        assert_eq!(summary.end_date, "03-08-2024");
    }

    #[tokio::test]
    async fn test_guesses_round_trip_plaintext() {
        let db = Database::in_memory(None).await.unwrap();
        db.create_bet(1, "03-01-2024").await.unwrap();

        let guesses = vec![
            Guess::new("user1", 250, None),
            Guess::new("user2", 300, Some("hunch".to_string())),
        ];
        db.set_guesses(1, &guesses).await.unwrap();

        assert_eq!(db.get_guesses(1).await.unwrap(), guesses);
        assert_eq!(
            String::from_utf8(db.raw_details(1).await.unwrap().unwrap()).unwrap(),
            r#"[{"User":"user1","Number":250},{"User":"user2","Number":300,"ExtraInfo":"hunch"}]"#
        );
    }

    #[tokio::test]
    async fn test_guesses_encrypted_at_rest() {
        let cipher = GuessCipher::new("0123456789abcdef").unwrap();
        let db = Database::in_memory(Some(cipher)).await.unwrap();
        db.create_bet(1, "03-01-2024").await.unwrap();

        // The initial empty list goes through the cipher too
        assert!(db.get_guesses(1).await.unwrap().is_empty());
        assert_ne!(db.raw_details(1).await.unwrap().unwrap(), b"[]".to_vec());

        let guesses = vec![Guess::new("user1", 42, None)];
        db.set_guesses(1, &guesses).await.unwrap();
        let raw = db.raw_details(1).await.unwrap().unwrap();
        assert!(!raw.windows(5).any(|w| w == b"user1"));
        assert_eq!(db.get_guesses(1).await.unwrap(), guesses);
    }

    #[tokio::test]
    async fn test_winner_score() {
        let db = Database::in_memory(None).await.unwrap();
        db.create_bet(1, "03-01-2024").await.unwrap();
        db.set_winner_score(1, 250).await.unwrap();

        assert_eq!(db.get_winner_score(1).await.unwrap(), Some(250));
        assert_eq!(db.get_summary(1).await.unwrap().unwrap().winner_score, Some(250));
    }

    #[tokio::test]
    async fn test_closed_pool_is_unavailable() {
        let db = Database::in_memory(None).await.unwrap();
        db.close().await;
        assert!(matches!(
            db.get_open_bet_id().await,
            Err(BetError::StoreUnavailable(_))
        ));
    }
}
