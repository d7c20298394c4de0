use std::path::Path;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// One row in the `trials` table.
#[derive(Debug, Clone)]
pub struct TrialRecord {
    pub study: String,
    pub number: i64,
    pub param_fingerprint: String,
    pub status: String,
    pub score: f64,
    pub outcome_json: String,
    pub created_at: String,
}

/// SQLite-backed study storage. The connection uses a 10 s busy timeout so
/// short contention is retried at the driver level instead of surfacing.
pub struct StudyDb {
    pool: SqlitePool,
}

impl StudyDb {
    pub async fn open(path: &Path) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(10));
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS trials (
                study TEXT NOT NULL,
                number INTEGER NOT NULL,
                param_fingerprint TEXT NOT NULL,
                status TEXT NOT NULL,
                score REAL NOT NULL,
                outcome_json TEXT NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY (study, number)
            )",
        )
        .execute(&pool)
        .await?;

        Ok(Self { pool })
    }

    pub async fn insert_trial(&self, record: &TrialRecord) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT OR REPLACE INTO trials (
                study, number, param_fingerprint, status, score, outcome_json, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.study)
        .bind(record.number)
        .bind(&record.param_fingerprint)
        .bind(&record.status)
        .bind(record.score)
        .bind(&record.outcome_json)
        .bind(&record.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn trial_count(&self, study: &str) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM trials WHERE study = ?")
                .bind(study)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    pub async fn best_score(&self, study: &str) -> Result<Option<f64>, sqlx::Error> {
        let row: Option<(f64,)> =
            sqlx::query_as("SELECT MAX(score) FROM trials WHERE study = ? AND status = 'ok'")
                .bind(study)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(s,)| s))
    }
}

/// Single-writer actor over the study database. Workers submit records
/// through a bounded channel; only this task ever touches the pool, so
/// SQLite never sees concurrent writers.
pub struct StudyWriter {
    tx: mpsc::Sender<TrialRecord>,
    handle: JoinHandle<()>,
}

impl StudyWriter {
    pub fn spawn(db: StudyDb) -> Self {
        let (tx, mut rx) = mpsc::channel::<TrialRecord>(64);
        let handle = tokio::spawn(async move {
            let mut written = 0usize;
            while let Some(record) = rx.recv().await {
                if let Err(e) = db.insert_trial(&record).await {
                    error!(trial = record.number, error = %e, "study write failed");
                }
                written += 1;
            }
            info!(written, "study writer drained");
        });
        Self { tx, handle }
    }

    /// Enqueue a record; applies backpressure when the writer is behind.
    pub async fn submit(&self, record: TrialRecord) {
        if self.tx.send(record).await.is_err() {
            error!("study writer channel closed early");
        }
    }

    /// Close the queue and wait for the writer to drain.
    pub async fn shutdown(self) {
        drop(self.tx);
        let _ = self.handle.await;
    }
}
