//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use glam::Vec3;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::game::metrics::PerformanceSnapshot;
use crate::game::session::SessionPhase;
use crate::game::target::TargetId;
use crate::history::{HistorySummary, SessionRecord};

/// Difficulty selected in the menu, recorded with every session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
    Expert,
}

impl Default for Difficulty {
    fn default() -> Self {
        Self::Medium
    }
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Easy => "easy",
            Self::Medium => "medium",
            Self::Hard => "hard",
            Self::Expert => "expert",
        }
    }
}

/// Game mode selected in the menu
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GameMode {
    /// Default mode, three large targets at all times
    JumboTileFrenzy,
    SpeedTest,
    /// Smaller targets
    Precision,
}

impl Default for GameMode {
    fn default() -> Self {
        Self::JumboTileFrenzy
    }
}

impl GameMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::JumboTileFrenzy => "jumbo-tile-frenzy",
            Self::SpeedTest => "speed-test",
            Self::Precision => "precision",
        }
    }
}

/// Target primitive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetShape {
    Sphere,
    Box,
}

/// Games whose sensitivity scale can be converted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GamePreset {
    Overwatch,
    Valorant,
    Csgo,
    Apex,
    Fortnite,
    Cod,
    Rainbow,
    Other,
}

impl GamePreset {
    /// Default horizontal field of view used by the game
    pub fn fov(&self) -> u32 {
        match self {
            Self::Overwatch | Self::Valorant => 103,
            Self::Apex => 110,
            Self::Csgo | Self::Fortnite | Self::Cod | Self::Rainbow | Self::Other => 90,
        }
    }
}

/// Session settings a client may send with `start`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSettings {
    #[serde(default)]
    pub difficulty: Option<Difficulty>,
    #[serde(default)]
    pub mode: Option<GameMode>,
    #[serde(default)]
    pub fov: Option<u32>,
}

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Start a session from the menu or the results screen
    Start {
        #[serde(default)]
        settings: SessionSettings,
    },

    /// Relative mouse movement in pixels
    Aim { dx: f32, dy: f32 },

    /// Absolute camera orientation in radians
    AimAt { yaw: f32, pitch: f32 },

    /// Primary click
    Fire,

    Pause,

    Resume,

    /// Escape key: pause while playing, resume while paused
    TogglePause,

    /// End the running session early
    End,

    /// Restart shortcut, valid from any state
    Restart,

    ReturnToMenu,

    /// Bind (or clear, with an empty string) the player's Steam64 id
    BindPlayer { steam64: String },

    /// Convert and apply an in-game sensitivity
    SetSensitivity {
        game: GamePreset,
        sensitivity: f32,
        /// Separate vertical sensitivity, if the player uses one
        #[serde(default)]
        vertical: Option<f32>,
    },

    /// Request the history summary for the bound player
    GetHistory,

    /// Drop the stored history, answered with an empty `history`
    ClearHistory,

    /// Ping for latency measurement
    Ping {
        /// Client timestamp
        t: u64,
    },
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Welcome message after connection
    Welcome {
        session_id: Uuid,
        server_time: u64,
        steam64: Option<String>,
    },

    /// HUD state (sent at regular intervals)
    Snapshot {
        /// Server tick number
        tick: u64,
        hud: HudSnapshot,
        /// Targets currently in the scene, including ones being removed
        targets: Vec<TargetView>,
    },

    /// Events produced since the previous message
    Events { events: Vec<GameEvent> },

    /// History summary for the bound player
    History {
        summary: Option<HistorySummary>,
        recent: Vec<SessionRecord>,
    },

    /// Result of a bind request
    PlayerBound { steam64: Option<String> },

    /// Error message
    Error { code: String, message: String },

    /// Pong response
    Pong {
        /// Echo back client timestamp
        t: u64,
    },
}

/// Target as seen by the rendering collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetView {
    pub id: TargetId,
    pub shape: TargetShape,
    pub size: f32,
    pub position: Vec3,
    pub being_removed: bool,
    /// Earliest-spawned target still alive
    pub current: bool,
}

/// Heads-up display values
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HudSnapshot {
    pub phase: SessionPhase,
    pub score: u32,
    pub hits: u32,
    pub misses: u32,
    pub streak: u32,
    pub elapsed_secs: f64,
    pub remaining_secs: f64,
    pub performance: PerformanceSnapshot,
    /// Camera yaw in radians
    pub yaw: f32,
    /// Camera pitch in radians
    pub pitch: f32,
}

/// Session events (spawns, hits, transitions)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum GameEvent {
    /// A target entered the scene
    TargetSpawned { target: TargetView },

    /// The current target changed
    TargetHighlighted { target_id: TargetId },

    /// Hit registered, removal animation started
    TargetHit {
        target_id: TargetId,
        reaction_time_ms: u64,
        streak: u32,
        score: u32,
    },

    /// Click that eliminated nothing
    Missed,

    /// Target left the scene
    TargetRemoved { target_id: TargetId },

    PhaseChanged { phase: SessionPhase },

    /// Session finished, record handed to history
    SessionEnded { summary: SessionSummary },
}

/// Results screen payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub record: SessionRecord,
    pub elapsed_secs: f64,
    pub new_highscore: bool,
    /// Best score before this session, if any
    pub previous_best: Option<u32>,
}
