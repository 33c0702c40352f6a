pub mod models;
pub mod predictions;
pub mod reservations;
pub mod schema;
pub mod users;

use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::result::DatabaseErrorKind;
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use pointsbot_shared::{DiscordId, ParseStatusError, PredictionStatus};
use tracing::info;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!();

// The initialization script is the schema migration run backwards then forwards.
const SCHEMA_DROP: &str =
    include_str!("../../migrations/2025-06-01-000000_create_points_schema/down.sql");
const SCHEMA_CREATE: &str =
    include_str!("../../migrations/2025-06-01-000000_create_points_schema/up.sql");

/// Structured error type for all storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A Diesel ORM error (query failure, constraint violation, etc.)
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),

    /// Failed to acquire or build a connection from the pool.
    #[error("pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),

    /// A `spawn_blocking` task panicked or was cancelled.
    #[error("task error: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// A database migration failed to apply.
    #[error("migration error: {0}")]
    Migration(String),

    /// The caller supplied invalid input.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("prediction {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: i32,
        from: PredictionStatus,
        to: PredictionStatus,
    },

    #[error("prediction {id} is {status} and no longer takes bets")]
    PredictionClosed { id: i32, status: PredictionStatus },

    #[error("user {creator_id} already has prediction {prediction_id} open")]
    AlreadyOpen {
        creator_id: DiscordId,
        prediction_id: i32,
    },

    #[error("not enough points: {available} available, {requested} requested")]
    InsufficientPoints { available: i32, requested: i32 },

    /// A balance change would leave the range of the `points` column.
    #[error("balance of {discord_id} cannot change by {delta} from {balance}")]
    PointsOverflow {
        discord_id: DiscordId,
        balance: i32,
        delta: i32,
    },

    /// A user tried to bet on the option opposite to their existing bet.
    #[error("already bet on {current:?}")]
    SideSwitch { current: String },

    /// A stored row could not be decoded into a domain value.
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

impl From<ParseStatusError> for StorageError {
    fn from(value: ParseStatusError) -> Self {
        StorageError::Corrupt(value.to_string())
    }
}

impl StorageError {
    /// The constraint the database engine rejected the statement with, if any.
    pub fn violation(&self) -> Option<&DatabaseErrorKind> {
        match self {
            StorageError::Database(diesel::result::Error::DatabaseError(kind, _)) => Some(kind),
            _ => None,
        }
    }
}

#[derive(Clone)]
pub struct Store {
    pool: Pool<ConnectionManager<SqliteConnection>>,
}

impl Store {
    pub async fn connect_sqlite(path: &str) -> Result<Self, StorageError> {
        let url = path.to_string();
        let manager = ConnectionManager::<SqliteConnection>::new(url);
        let pool = Pool::builder().max_size(8).build(manager)?;
        let store = Store { pool };

        // Create the tables on first use; existing data is left alone.
        store
            .with_conn(|conn| {
                let applied = conn
                    .run_pending_migrations(MIGRATIONS)
                    .map_err(|e| StorageError::Migration(e.to_string()))?;
                for version in applied {
                    info!(%version, "applied migration");
                }
                Ok(())
            })
            .await?;

        Ok(store)
    }

    /// Drops all four tables (if present) and recreates them empty.
    ///
    /// Children are dropped before parents and parents are created first, so
    /// the result is identical to a fresh database whatever state it started in.
    pub async fn reset_schema(&self) -> Result<(), StorageError> {
        info!("dropping and recreating users, reservations, predictions, prediction_bets");
        self.with_conn(|conn| {
            conn.batch_execute(SCHEMA_DROP)?;
            conn.batch_execute(SCHEMA_CREATE)?;
            Ok(())
        })
        .await
    }

    /// Runs `f` on a pooled connection on the blocking thread pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&mut SqliteConnection) -> Result<T, StorageError> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<T, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            f(&mut *conn)
        })
        .await?
    }
}

fn configure_sqlite_conn(conn: &mut SqliteConnection) -> Result<(), diesel::result::Error> {
    // WAL for concurrent readers, and a busy timeout instead of failing on lock.
    // foreign_keys is off by default in SQLite and is per connection; the bet
    // cascade and foreign-key violations depend on it.
    diesel::sql_query("PRAGMA journal_mode=WAL;").execute(conn)?;
    diesel::sql_query("PRAGMA synchronous=NORMAL;").execute(conn)?;
    diesel::sql_query("PRAGMA busy_timeout=5000;").execute(conn)?;
    diesel::sql_query("PRAGMA foreign_keys=ON;").execute(conn)?;
    Ok(())
}
