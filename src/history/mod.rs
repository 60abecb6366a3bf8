//! Session history: local cache plus best-effort relay to the remote store

pub mod local;
pub mod record;
pub mod remote;

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

pub use local::{HistoryError, LocalHistory, MAX_RECORDS};
pub use record::{InvalidSteam64, RecordContext, SessionRecord, Steam64};
pub use remote::{RelayError, RemoteHistoryClient};

use local::push_newest;

/// Sessions listed on the menu
pub const RECENT_LIMIT: usize = 10;

/// Where finished sessions go
pub trait SessionHistory: Send + Sync {
    /// Persist a finished session. Must not block on the network.
    fn save(&self, record: SessionRecord);

    /// Stored sessions, newest first
    fn load_recent(&self, limit: usize) -> Vec<SessionRecord>;

    /// Player the records are attributed to
    fn player(&self) -> Option<Steam64> {
        None
    }
}

/// Highest-scoring record, the earliest one on ties
pub fn best(records: &[SessionRecord]) -> Option<&SessionRecord> {
    records.iter().fold(None, |best, record| match best {
        Some(b) if record.score <= b.score => Some(b),
        _ => Some(record),
    })
}

/// Aggregates shown on the menu
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistorySummary {
    pub best_score: u32,
    pub total_games: usize,
    pub average_accuracy: f64,
    pub average_reaction_time: f64,
}

impl HistorySummary {
    pub fn from_records(records: &[SessionRecord]) -> Option<Self> {
        if records.is_empty() {
            return None;
        }

        let count = records.len() as f64;
        Some(Self {
            best_score: best(records).map(|r| r.score).unwrap_or(0),
            total_games: records.len(),
            average_accuracy: records.iter().map(|r| r.accuracy).sum::<f64>() / count,
            average_reaction_time: records.iter().map(|r| r.average_reaction_time).sum::<f64>()
                / count,
        })
    }
}

/// Local history with an optional remote leg, attributed to the bound player.
///
/// Sessions played before any player is bound stay in memory and belong to
/// this connection only.
pub struct History {
    local: Arc<LocalHistory>,
    remote: Option<RemoteHistoryClient>,
    player: RwLock<Option<Steam64>>,
    anonymous: Mutex<Vec<SessionRecord>>,
}

impl History {
    pub fn new(local: Arc<LocalHistory>, remote: Option<RemoteHistoryClient>) -> Self {
        Self {
            local,
            remote,
            player: RwLock::new(None),
            anonymous: Mutex::new(Vec::new()),
        }
    }

    pub fn bound_player(&self) -> Option<Steam64> {
        self.player.read().clone()
    }

    /// Bind a player id, or clear the binding with an empty string.
    ///
    /// A successful bind refreshes the local cache from the remote store in the
    /// background.
    pub fn bind_player(&self, raw: &str) -> Result<Option<Steam64>, InvalidSteam64> {
        let raw = raw.trim();
        if raw.is_empty() {
            *self.player.write() = None;
            tracing::info!("Player binding cleared");
            return Ok(None);
        }

        let id = Steam64::parse(raw)?;
        *self.player.write() = Some(id.clone());
        tracing::info!(steam64 = %id, "Player bound");

        if let Some(remote) = self.remote.clone() {
            spawn_relay(refresh(self.local.clone(), remote, id.clone()));
        }

        Ok(Some(id))
    }

    pub fn summary(&self) -> Option<HistorySummary> {
        HistorySummary::from_records(&self.load_all())
    }

    pub fn recent(&self) -> Vec<SessionRecord> {
        self.load_recent(RECENT_LIMIT)
    }

    /// Drop the bound player's local history, or this connection's sessions
    pub fn clear(&self) -> Result<(), HistoryError> {
        match self.bound_player() {
            Some(player) => self.local.clear(&player),
            None => {
                self.anonymous.lock().clear();
                Ok(())
            }
        }
    }

    fn load_all(&self) -> Vec<SessionRecord> {
        self.load_recent(MAX_RECORDS)
    }
}

impl SessionHistory for History {
    fn save(&self, mut record: SessionRecord) {
        let player = self.bound_player();
        if record.steam64.is_none() {
            record.steam64 = player.as_ref().map(|id| id.to_string());
        }

        let Some(player) = player else {
            push_newest(&mut self.anonymous.lock(), record);
            return;
        };

        if let Err(e) = self.local.append(&player, record.clone()) {
            tracing::warn!(steam64 = %player, error = %e, "Failed to save session locally");
        }

        if let Some(remote) = self.remote.clone() {
            spawn_relay(async move {
                match remote.post_session(&record).await {
                    Ok(()) => tracing::debug!(score = record.score, "Session relayed"),
                    Err(e) => tracing::warn!(error = %e, "Failed to relay session"),
                }
            });
        }
    }

    fn load_recent(&self, limit: usize) -> Vec<SessionRecord> {
        let Some(player) = self.bound_player() else {
            return self.anonymous.lock().iter().take(limit).cloned().collect();
        };

        match self.local.load(&player) {
            Ok(mut records) => {
                records.truncate(limit);
                records
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load history");
                Vec::new()
            }
        }
    }

    fn player(&self) -> Option<Steam64> {
        self.bound_player()
    }
}

/// Replace the local cache with the remote copy, keeping it on failure
async fn refresh(local: Arc<LocalHistory>, remote: RemoteHistoryClient, player: Steam64) {
    match remote.fetch_history(&player).await {
        Ok(records) => {
            let count = records.len();
            if let Err(e) = local.replace(&player, records) {
                tracing::warn!(steam64 = %player, error = %e, "Failed to cache remote history");
            } else {
                tracing::info!(steam64 = %player, count, "History refreshed from remote store");
            }
        }
        Err(e) => tracing::warn!(steam64 = %player, error = %e, "Failed to refresh history"),
    }
}

/// Run a network leg on the current runtime. Outside a runtime the leg is skipped.
fn spawn_relay<F>(task: F)
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(task);
        }
        Err(_) => tracing::warn!("No async runtime, skipping history relay"),
    }
}
