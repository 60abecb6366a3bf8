//! Performance metrics derived from a session's event log

use serde::{Deserialize, Serialize};

/// A successful hit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HitEvent {
    /// Milliseconds between the target's spawn and the click
    pub reaction_time_ms: u64,
    pub timestamp: u64,
}

/// Raw counters the metrics are computed from
#[derive(Debug, Clone, Copy)]
pub struct SessionLog<'a> {
    pub hit_events: &'a [HitEvent],
    pub hits: u32,
    pub misses: u32,
    pub total_clicks: u32,
    pub targets_spawned: usize,
}

/// Letter grade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Grade {
    S,
    A,
    B,
    C,
    D,
    F,
}

/// (minimum accuracy, reaction time must be below, grade), first match wins
const GRADE_TABLE: [(u32, Option<f64>, Grade); 5] = [
    (95, Some(300.0), Grade::S),
    (90, Some(400.0), Grade::A),
    (80, Some(500.0), Grade::B),
    (70, Some(600.0), Grade::C),
    (60, None, Grade::D),
];

impl Grade {
    pub fn from_performance(accuracy: u32, average_reaction_time_ms: f64) -> Self {
        GRADE_TABLE
            .iter()
            .find(|(min_accuracy, max_reaction, _)| {
                accuracy >= *min_accuracy
                    && max_reaction.map_or(true, |limit| average_reaction_time_ms < limit)
            })
            .map(|(_, _, grade)| *grade)
            .unwrap_or(Grade::F)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Grade::S => "S",
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
            Grade::D => "D",
            Grade::F => "F",
        }
    }
}

impl std::fmt::Display for Grade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derived performance figures, recomputed wholesale from the log
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceSnapshot {
    /// Hits over attempts, rounded percent
    pub accuracy: u32,
    pub average_reaction_time_ms: f64,
    /// Population standard deviation of reaction times, lower is steadier
    pub consistency_ms: f64,
    pub grade: Grade,
    /// Hits over registered clicks, percent
    pub efficiency: f64,
    /// Hits over spawned targets, percent
    pub hit_rate: f64,
    pub total_clicks: u32,
    pub total_targets: usize,
}

/// Hits over attempts as a rounded percentage, 100 when nothing was attempted
pub fn accuracy(hits: u32, misses: u32) -> u32 {
    let attempts = hits + misses;
    if attempts == 0 {
        return 100;
    }
    (hits as f64 / attempts as f64 * 100.0).round() as u32
}

pub fn compute(log: &SessionLog<'_>) -> PerformanceSnapshot {
    let accuracy = accuracy(log.hits, log.misses);

    let reactions: Vec<f64> = log
        .hit_events
        .iter()
        .map(|event| event.reaction_time_ms as f64)
        .collect();

    let average = if reactions.is_empty() {
        0.0
    } else {
        reactions.iter().sum::<f64>() / reactions.len() as f64
    };

    let consistency = if reactions.len() < 2 {
        0.0
    } else {
        let variance = reactions
            .iter()
            .map(|r| (r - average).powi(2))
            .sum::<f64>()
            / reactions.len() as f64;
        variance.sqrt()
    };

    let efficiency = if log.total_clicks == 0 {
        0.0
    } else {
        log.hits as f64 / log.total_clicks as f64 * 100.0
    };

    let hit_rate = log.hits as f64 / log.targets_spawned.max(1) as f64 * 100.0;

    PerformanceSnapshot {
        accuracy,
        average_reaction_time_ms: average,
        consistency_ms: consistency,
        grade: Grade::from_performance(accuracy, average),
        efficiency,
        hit_rate,
        total_clicks: log.total_clicks,
        total_targets: log.targets_spawned,
    }
}

/// Reaction time mapped to 0% at this value
const SLOWEST_REACTION_MS: f64 = 1000.0;
/// Reaction time mapped to 100%
const FASTEST_REACTION_MS: f64 = 200.0;
/// Standard deviation mapped to 0%
const WORST_CONSISTENCY_MS: f64 = 300.0;

/// 0-100 ratings shown on the results screen
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressScores {
    pub accuracy_score: f64,
    pub reaction_time_score: f64,
    pub consistency_score: f64,
    pub overall_score: f64,
}

impl ProgressScores {
    pub fn from_snapshot(snapshot: &PerformanceSnapshot) -> Self {
        let accuracy_score = (snapshot.accuracy as f64).min(100.0);

        let reaction_time_score = if snapshot.average_reaction_time_ms > 0.0 {
            let span = SLOWEST_REACTION_MS - FASTEST_REACTION_MS;
            (100.0 - (snapshot.average_reaction_time_ms - FASTEST_REACTION_MS) / span * 100.0)
                .clamp(0.0, 100.0)
        } else {
            0.0
        };

        let consistency_score = if snapshot.consistency_ms > 0.0 {
            (100.0 - snapshot.consistency_ms / WORST_CONSISTENCY_MS * 100.0).clamp(0.0, 100.0)
        } else {
            100.0
        };

        Self {
            accuracy_score,
            reaction_time_score,
            consistency_score,
            overall_score: (snapshot.accuracy as f64 + reaction_time_score + consistency_score) / 3.0,
        }
    }
}
