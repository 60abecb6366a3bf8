//! SQLite store behind the history API

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::{params, Connection, Row};

use crate::history::{SessionRecord, Steam64};

/// Sessions returned by one history query
pub const HISTORY_LIMIT: usize = 50;

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS sessions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        steam64 TEXT NOT NULL,
        timestamp INTEGER NOT NULL,
        score INTEGER,
        accuracy REAL,
        hits INTEGER,
        misses INTEGER,
        totalClicks INTEGER,
        averageReactionTime REAL,
        consistency REAL,
        grade TEXT,
        efficiency REAL,
        hitRate REAL,
        difficulty TEXT,
        gameMode TEXT,
        fov INTEGER,
        reactionTimeScore REAL,
        accuracyScore REAL,
        overallScore REAL,
        performanceTier TEXT,
        percentile REAL,
        maxStreak INTEGER,
        streakBonus REAL,
        warmUpAverage REAL
    );
    CREATE INDEX IF NOT EXISTS idx_sessions_player_time ON sessions(steam64, timestamp);
"#;

/// Columns missing from databases created before they were added
const ADDED_COLUMNS: &[(&str, &str)] = &[("efficiency", "REAL"), ("hitRate", "REAL")];

/// Session table, shared by all request handlers
#[derive(Clone)]
pub struct SessionStore {
    conn: Arc<Mutex<Connection>>,
}

impl SessionStore {
    /// Open (and create if needed) the database file
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(StoreError::Io)?;
        }
        Self::init(Connection::open(path)?)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        migrate(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Insert one session for a player, returns the row id
    pub async fn insert(&self, steam64: Steam64, record: SessionRecord) -> Result<i64, StoreError> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || insert_row(&conn.lock(), &steam64, &record)).await?
    }

    /// Newest sessions of a player, at most [`HISTORY_LIMIT`]
    pub async fn recent(&self, steam64: Steam64) -> Result<Vec<SessionRecord>, StoreError> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || select_recent(&conn.lock(), &steam64, HISTORY_LIMIT))
            .await?
    }

    pub async fn count(&self) -> Result<u64, StoreError> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || -> Result<u64, StoreError> {
            let count: i64 = conn
                .lock()
                .query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))?;
            Ok(count.max(0) as u64)
        })
        .await?
    }
}

fn migrate(conn: &Connection) -> Result<(), StoreError> {
    let existing = {
        let mut stmt = conn.prepare("PRAGMA table_info(sessions)")?;
        let columns = stmt.query_map([], |row| row.get::<_, String>(1))?;
        columns.collect::<Result<Vec<_>, _>>()?
    };

    for (name, kind) in ADDED_COLUMNS {
        if !existing.iter().any(|column| column == name) {
            conn.execute_batch(&format!("ALTER TABLE sessions ADD COLUMN {name} {kind}"))?;
            tracing::info!(column = *name, "Added missing column to sessions table");
        }
    }
    Ok(())
}

fn insert_row(conn: &Connection, steam64: &Steam64, r: &SessionRecord) -> Result<i64, StoreError> {
    conn.execute(
        r#"
        INSERT INTO sessions (
            steam64, timestamp, score, accuracy, hits, misses, totalClicks,
            averageReactionTime, consistency, grade, efficiency, hitRate, difficulty,
            gameMode, fov, reactionTimeScore, accuracyScore, overallScore, performanceTier,
            percentile, maxStreak, streakBonus, warmUpAverage
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17,
                  ?18, ?19, ?20, ?21, ?22, ?23)
        "#,
        params![
            steam64.as_str(),
            r.timestamp,
            r.score,
            r.accuracy,
            r.hits,
            r.misses,
            r.total_clicks,
            r.average_reaction_time,
            r.consistency,
            r.grade,
            r.efficiency,
            r.hit_rate,
            r.difficulty,
            r.game_mode,
            r.fov,
            r.reaction_time_score,
            r.accuracy_score,
            r.overall_score,
            r.performance_tier,
            r.percentile,
            r.max_streak,
            r.streak_bonus,
            r.warm_up_average,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

fn select_recent(conn: &Connection, steam64: &Steam64, limit: usize) -> Result<Vec<SessionRecord>, StoreError> {
    let mut stmt = conn.prepare(
        r#"
        SELECT steam64, timestamp, score, accuracy, hits, misses, totalClicks,
               averageReactionTime, consistency, grade, efficiency, hitRate, difficulty,
               gameMode, fov, reactionTimeScore, accuracyScore, overallScore, performanceTier,
               percentile, maxStreak, streakBonus, warmUpAverage
        FROM sessions
        WHERE steam64 = ?1
        ORDER BY timestamp DESC, id DESC
        LIMIT ?2
        "#,
    )?;

    let rows = stmt.query_map(params![steam64.as_str(), limit as i64], record_from_row)?;
    let records = rows.collect::<Result<Vec<_>, _>>()?;
    Ok(records)
}

/// Columns written by older clients may be NULL
fn record_from_row(row: &Row<'_>) -> rusqlite::Result<SessionRecord> {
    Ok(SessionRecord {
        steam64: row.get(0)?,
        timestamp: row.get(1)?,
        score: row.get::<_, Option<u32>>(2)?.unwrap_or_default(),
        accuracy: row.get::<_, Option<f64>>(3)?.unwrap_or_default(),
        hits: row.get::<_, Option<u32>>(4)?.unwrap_or_default(),
        misses: row.get::<_, Option<u32>>(5)?.unwrap_or_default(),
        total_clicks: row.get::<_, Option<u32>>(6)?.unwrap_or_default(),
        average_reaction_time: row.get::<_, Option<f64>>(7)?.unwrap_or_default(),
        consistency: row.get::<_, Option<f64>>(8)?.unwrap_or_default(),
        grade: row.get::<_, Option<String>>(9)?.unwrap_or_default(),
        efficiency: row.get::<_, Option<f64>>(10)?.unwrap_or_default(),
        hit_rate: row.get::<_, Option<f64>>(11)?.unwrap_or_default(),
        difficulty: row.get::<_, Option<String>>(12)?.unwrap_or_default(),
        game_mode: row.get::<_, Option<String>>(13)?.unwrap_or_default(),
        fov: row.get::<_, Option<u32>>(14)?.unwrap_or_default(),
        reaction_time_score: row.get::<_, Option<f64>>(15)?.unwrap_or_default(),
        accuracy_score: row.get::<_, Option<f64>>(16)?.unwrap_or_default(),
        overall_score: row.get::<_, Option<f64>>(17)?.unwrap_or_default(),
        performance_tier: row.get::<_, Option<String>>(18)?.unwrap_or_default(),
        percentile: row.get::<_, Option<f64>>(19)?.unwrap_or_default(),
        max_streak: row.get::<_, Option<u32>>(20)?.unwrap_or_default(),
        streak_bonus: row.get::<_, Option<f64>>(21)?.unwrap_or_default(),
        warm_up_average: row.get::<_, Option<f64>>(22)?.unwrap_or_default(),
    })
}

/// Store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Failed to create database directory: {0}")]
    Io(std::io::Error),

    #[error("Database task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
