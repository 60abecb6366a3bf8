//! Target-session engine and its tick loop

pub mod aim;
pub mod hit;
pub mod metrics;
pub mod placement;
pub mod runner;
pub mod session;
pub mod snapshot;
pub mod target;

use std::time::Instant;

pub use runner::{SessionHandle, SessionRegistry, SessionRunner};

use crate::ws::protocol::{ClientMsg, SessionSettings};

use aim::Sensitivity;

/// Client message received from the WebSocket, stamped on arrival
#[derive(Debug, Clone)]
pub struct SessionInput {
    pub msg: ClientMsg,
    pub received_at: Instant,
}

/// Gameplay input consumed by [`SessionMachine::handle`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    Start(SessionSettings),
    /// Relative mouse movement in pixels
    Aim { dx: f32, dy: f32 },
    /// Absolute orientation in radians
    AimAt { yaw: f32, pitch: f32 },
    Fire,
    Pause,
    Resume,
    TogglePause,
    End,
    Restart,
    ReturnToMenu,
    SetSensitivity(Sensitivity),
}

impl InputEvent {
    /// Gameplay part of a client message. Messages handled outside the
    /// engine map to `None`.
    pub fn from_client(msg: &ClientMsg) -> Option<Self> {
        let event = match *msg {
            ClientMsg::Start { settings } => Self::Start(settings),
            ClientMsg::Aim { dx, dy } => Self::Aim { dx, dy },
            ClientMsg::AimAt { yaw, pitch } => Self::AimAt { yaw, pitch },
            ClientMsg::Fire => Self::Fire,
            ClientMsg::Pause => Self::Pause,
            ClientMsg::Resume => Self::Resume,
            ClientMsg::TogglePause => Self::TogglePause,
            ClientMsg::End => Self::End,
            ClientMsg::Restart => Self::Restart,
            ClientMsg::ReturnToMenu => Self::ReturnToMenu,
            ClientMsg::BindPlayer { .. }
            | ClientMsg::SetSensitivity { .. }
            | ClientMsg::GetHistory
            | ClientMsg::ClearHistory
            | ClientMsg::Ping { .. } => return None,
        };
        Some(event)
    }
}
