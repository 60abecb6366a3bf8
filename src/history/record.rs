//! Persisted session record and player identity

use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

use crate::game::metrics::{PerformanceSnapshot, ProgressScores};
use crate::ws::protocol::{Difficulty, GameMode};

/// Steam64 player id: exactly 17 ASCII digits
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Steam64(String);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid steam64")]
pub struct InvalidSteam64;

impl Steam64 {
    pub const LEN: usize = 17;

    pub fn parse(raw: &str) -> Result<Self, InvalidSteam64> {
        if raw.len() == Self::LEN && raw.bytes().all(|b| b.is_ascii_digit()) {
            Ok(Self(raw.to_string()))
        } else {
            Err(InvalidSteam64)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Steam64 {
    type Err = InvalidSteam64;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Steam64 {
    type Error = InvalidSteam64;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Steam64> for String {
    fn from(value: Steam64) -> Self {
        value.0
    }
}

impl fmt::Display for Steam64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One finished session, as stored locally and in the remote `sessions` table.
///
/// Every field defaults so that records written by older clients still load.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionRecord {
    /// Milliseconds since the Unix epoch
    #[serde(deserialize_with = "lenient")]
    pub timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient")]
    pub steam64: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub score: u32,
    #[serde(deserialize_with = "lenient")]
    pub accuracy: f64,
    #[serde(deserialize_with = "lenient")]
    pub hits: u32,
    #[serde(deserialize_with = "lenient")]
    pub misses: u32,
    #[serde(deserialize_with = "lenient")]
    pub total_clicks: u32,
    #[serde(deserialize_with = "lenient")]
    pub average_reaction_time: f64,
    #[serde(deserialize_with = "lenient")]
    pub consistency: f64,
    #[serde(deserialize_with = "lenient")]
    pub grade: String,
    #[serde(deserialize_with = "lenient")]
    pub efficiency: f64,
    #[serde(deserialize_with = "lenient")]
    pub hit_rate: f64,
    #[serde(deserialize_with = "lenient")]
    pub difficulty: String,
    #[serde(deserialize_with = "lenient")]
    pub game_mode: String,
    #[serde(deserialize_with = "lenient")]
    pub fov: u32,
    #[serde(deserialize_with = "lenient")]
    pub reaction_time_score: f64,
    #[serde(deserialize_with = "lenient")]
    pub accuracy_score: f64,
    #[serde(deserialize_with = "lenient")]
    pub overall_score: f64,
    #[serde(deserialize_with = "lenient")]
    pub performance_tier: String,
    #[serde(deserialize_with = "lenient")]
    pub percentile: f64,
    #[serde(deserialize_with = "lenient")]
    pub max_streak: u32,
    #[serde(deserialize_with = "lenient")]
    pub streak_bonus: f64,
    #[serde(deserialize_with = "lenient")]
    pub warm_up_average: f64,
}

/// Null or mistyped fields fall back to the field default
fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(T::deserialize(value).unwrap_or_default())
}

/// Session configuration carried into the record
#[derive(Debug, Clone, Copy)]
pub struct RecordContext {
    pub difficulty: Difficulty,
    pub mode: GameMode,
    pub fov: u32,
    pub score: u32,
    pub hits: u32,
    pub misses: u32,
    pub max_streak: u32,
}

impl SessionRecord {
    pub fn from_performance(
        timestamp: i64,
        steam64: Option<&Steam64>,
        context: RecordContext,
        snapshot: &PerformanceSnapshot,
    ) -> Self {
        let scores = ProgressScores::from_snapshot(snapshot);

        Self {
            timestamp,
            steam64: steam64.map(|id| id.to_string()),
            score: context.score,
            accuracy: snapshot.accuracy as f64,
            hits: context.hits,
            misses: context.misses,
            total_clicks: snapshot.total_clicks,
            average_reaction_time: snapshot.average_reaction_time_ms,
            consistency: snapshot.consistency_ms,
            grade: snapshot.grade.to_string(),
            efficiency: snapshot.efficiency,
            hit_rate: snapshot.hit_rate,
            difficulty: context.difficulty.as_str().to_string(),
            game_mode: context.mode.as_str().to_string(),
            fov: context.fov,
            reaction_time_score: scores.reaction_time_score,
            accuracy_score: scores.accuracy_score,
            overall_score: scores.overall_score,
            max_streak: context.max_streak,
            ..Self::default()
        }
    }
}
