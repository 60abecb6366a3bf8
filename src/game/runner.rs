//! Per-connection session runner and the registry of active sessions

use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};
use tokio::time::interval;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::history::History;
use crate::util::time::{snapshot_interval_ticks, TICK_DURATION_MICROS};
use crate::ws::protocol::{ClientMsg, GameEvent, ServerMsg};

use super::aim::Sensitivity;
use super::session::{SessionMachine, SessionPhase};
use super::snapshot::SnapshotBuilder;
use super::{InputEvent, SessionInput};

/// Inputs buffered per session before the socket reader waits
const INPUT_QUEUE: usize = 256;

/// Handle to a running session
#[derive(Clone)]
pub struct SessionHandle {
    pub id: Uuid,
    pub input_tx: mpsc::Sender<SessionInput>,
}

/// Registry of all active sessions
pub struct SessionRegistry {
    sessions: DashMap<Uuid, SessionHandle>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    pub fn insert(&self, handle: SessionHandle) {
        self.sessions.insert(handle.id, handle);
    }

    pub fn remove(&self, id: &Uuid) -> Option<SessionHandle> {
        self.sessions.remove(id).map(|(_, h)| h)
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Drives one [`SessionMachine`] from a fixed-rate tick and a queue of client inputs
pub struct SessionRunner {
    id: Uuid,
    tick: u64,
    /// Origin of the engine clock
    clock: Instant,
    machine: SessionMachine,
    history: Arc<History>,
    input_rx: mpsc::Receiver<SessionInput>,
    out_tx: mpsc::Sender<ServerMsg>,
    snapshot_builder: SnapshotBuilder,
}

impl SessionRunner {
    /// Create a runner; outbound messages go to `out_tx`
    pub fn new(
        id: Uuid,
        seed: u64,
        history: Arc<History>,
        out_tx: mpsc::Sender<ServerMsg>,
    ) -> (Self, SessionHandle) {
        let (input_tx, input_rx) = mpsc::channel(INPUT_QUEUE);

        let handle = SessionHandle { id, input_tx };

        let runner = Self {
            id,
            tick: 0,
            clock: Instant::now(),
            machine: SessionMachine::new(seed, history.clone()),
            history,
            input_rx,
            out_tx,
            snapshot_builder: SnapshotBuilder::new(snapshot_interval_ticks()),
        };

        (runner, handle)
    }

    /// Run the tick loop until the input side hangs up
    pub async fn run(mut self) {
        info!(session_id = %self.id, "Session runner started");

        let tick_duration = Duration::from_micros(TICK_DURATION_MICROS);
        let mut tick_interval = interval(tick_duration);
        tick_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tick_interval.tick().await;

            // Drain input queue
            if !self.process_inputs().await {
                break;
            }

            let now = self.engine_millis(Instant::now());
            let events = self.machine.tick(now);
            self.tick += 1;

            if !self.emit_events(events).await {
                break;
            }

            if self.snapshot_builder.should_send() {
                let snapshot = self.snapshot_builder.build(self.tick, &self.machine, now);
                if !self.send_snapshot(snapshot) {
                    break;
                }
            }
        }

        // keep a scored run that was cut off by the disconnect
        let phase = self.machine.phase();
        if matches!(phase, SessionPhase::Playing | SessionPhase::Paused) {
            let now = self.engine_millis(Instant::now());
            self.machine.return_to_menu(now);
        }

        info!(
            session_id = %self.id,
            ticks = self.tick,
            snapshots = self.snapshot_builder.stats().total_snapshots,
            "Session runner stopped"
        );
    }

    /// Milliseconds since the runner started, never going backwards
    fn engine_millis(&self, at: Instant) -> u64 {
        at.saturating_duration_since(self.clock).as_millis() as u64
    }

    /// Process all pending inputs. Returns false once the sender is gone.
    async fn process_inputs(&mut self) -> bool {
        loop {
            match self.input_rx.try_recv() {
                Ok(input) => {
                    if !self.handle_input(input).await {
                        return false;
                    }
                }
                Err(TryRecvError::Empty) => return true,
                Err(TryRecvError::Disconnected) => return false,
            }
        }
    }

    async fn handle_input(&mut self, input: SessionInput) -> bool {
        let received_at = self.engine_millis(input.received_at);

        if let Some(event) = InputEvent::from_client(&input.msg) {
            let events = self.machine.handle(event, received_at);
            return self.emit_events(events).await;
        }

        let reply = match input.msg {
            ClientMsg::BindPlayer { steam64 } => match self.history.bind_player(&steam64) {
                Ok(bound) => ServerMsg::PlayerBound {
                    steam64: bound.map(|id| id.to_string()),
                },
                Err(e) => error_msg("invalid_steam64", e),
            },
            ClientMsg::SetSensitivity {
                game,
                sensitivity,
                vertical,
            } => match Sensitivity::convert(game, sensitivity, vertical) {
                Ok(converted) => {
                    self.machine.handle(InputEvent::SetSensitivity(converted), received_at);
                    self.machine.config_mut().fov = game.fov();
                    debug!(session_id = %self.id, ?game, "Sensitivity applied");
                    return true;
                }
                Err(e) => error_msg("invalid_sensitivity", e),
            },
            ClientMsg::GetHistory => self.history_msg(),
            ClientMsg::ClearHistory => match self.history.clear() {
                Ok(()) => {
                    info!(session_id = %self.id, "History cleared");
                    self.history_msg()
                }
                Err(e) => error_msg("history_clear_failed", e),
            },
            ClientMsg::Ping { t } => ServerMsg::Pong { t },
            other => {
                warn!(session_id = %self.id, msg = ?other, "Unhandled message");
                return true;
            }
        };

        self.out_tx.send(reply).await.is_ok()
    }

    fn history_msg(&self) -> ServerMsg {
        ServerMsg::History {
            summary: self.history.summary(),
            recent: self.history.recent(),
        }
    }

    async fn emit_events(&mut self, events: Vec<GameEvent>) -> bool {
        if events.is_empty() {
            return true;
        }

        // HUD follows important events without waiting for the next interval
        self.snapshot_builder.force_next();
        self.out_tx.send(ServerMsg::Events { events }).await.is_ok()
    }

    /// Snapshots are superseded by the next one, a full queue drops them
    fn send_snapshot(&self, snapshot: ServerMsg) -> bool {
        match self.out_tx.try_send(snapshot) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                debug!(session_id = %self.id, "Outbound queue full, snapshot dropped");
                true
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }
}

fn error_msg(code: &str, error: impl std::fmt::Display) -> ServerMsg {
    ServerMsg::Error {
        code: code.to_string(),
        message: error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::LocalHistory;
    use crate::ws::protocol::SessionSettings;
    use tempfile::TempDir;
    use tokio::time::timeout;

    struct Harness {
        _dir: TempDir,
        input_tx: mpsc::Sender<SessionInput>,
        out_rx: mpsc::Receiver<ServerMsg>,
        task: tokio::task::JoinHandle<()>,
        history: Arc<History>,
    }

    fn spawn_runner() -> Harness {
        let dir = TempDir::new().unwrap();
        let history = Arc::new(History::new(Arc::new(LocalHistory::new(dir.path())), None));
        let (out_tx, out_rx) = mpsc::channel(1024);
        let (runner, handle) = SessionRunner::new(Uuid::new_v4(), 9, history.clone(), out_tx);
        let task = tokio::spawn(runner.run());

        Harness {
            _dir: dir,
            input_tx: handle.input_tx,
            out_rx,
            task,
            history,
        }
    }

    async fn send(harness: &Harness, msg: ClientMsg) {
        let input = SessionInput {
            msg,
            received_at: Instant::now(),
        };
        harness.input_tx.send(input).await.unwrap();
    }

    /// Skip messages until one matches
    async fn recv_matching<F>(harness: &mut Harness, pred: F) -> ServerMsg
    where
        F: Fn(&ServerMsg) -> bool,
    {
        timeout(Duration::from_secs(2), async {
            loop {
                let msg = harness.out_rx.recv().await.expect("runner hung up");
                if pred(&msg) {
                    return msg;
                }
            }
        })
        .await
        .expect("timed out waiting for message")
    }

    #[tokio::test]
    async fn test_ping_pong() {
        let mut harness = spawn_runner();
        send(&harness, ClientMsg::Ping { t: 77 }).await;

        let msg = recv_matching(&mut harness, |m| matches!(m, ServerMsg::Pong { .. })).await;
        assert!(matches!(msg, ServerMsg::Pong { t: 77 }));
    }

    #[tokio::test]
    async fn test_start_emits_spawn_events_and_snapshots() {
        let mut harness = spawn_runner();
        send(
            &harness,
            ClientMsg::Start {
                settings: SessionSettings::default(),
            },
        )
        .await;

        let msg = recv_matching(&mut harness, |m| matches!(m, ServerMsg::Events { .. })).await;
        let ServerMsg::Events { events } = msg else {
            unreachable!()
        };
        let spawned = events
            .iter()
            .filter(|e| matches!(e, GameEvent::TargetSpawned { .. }))
            .count();
        assert_eq!(spawned, 3);

        let snapshot = recv_matching(&mut harness, |m| matches!(m, ServerMsg::Snapshot { .. })).await;
        let ServerMsg::Snapshot { hud, targets, .. } = snapshot else {
            unreachable!()
        };
        assert_eq!(hud.phase, SessionPhase::Playing);
        assert_eq!(targets.len(), 3);
    }

    #[tokio::test]
    async fn test_invalid_bind_reports_error() {
        let mut harness = spawn_runner();
        send(
            &harness,
            ClientMsg::BindPlayer {
                steam64: "123".to_string(),
            },
        )
        .await;

        let msg = recv_matching(&mut harness, |m| matches!(m, ServerMsg::Error { .. })).await;
        let ServerMsg::Error { code, .. } = msg else {
            unreachable!()
        };
        assert_eq!(code, "invalid_steam64");
        assert!(harness.history.bound_player().is_none());
    }

    #[tokio::test]
    async fn test_bind_then_history() {
        let mut harness = spawn_runner();
        send(
            &harness,
            ClientMsg::BindPlayer {
                steam64: "76561198000000005".to_string(),
            },
        )
        .await;
        let msg = recv_matching(&mut harness, |m| matches!(m, ServerMsg::PlayerBound { .. })).await;
        assert!(matches!(
            msg,
            ServerMsg::PlayerBound { steam64: Some(ref id) } if id == "76561198000000005"
        ));

        send(&harness, ClientMsg::Start { settings: SessionSettings::default() }).await;
        send(&harness, ClientMsg::End).await;
        recv_matching(&mut harness, |m| match m {
            ServerMsg::Events { events } => events
                .iter()
                .any(|e| matches!(e, GameEvent::SessionEnded { .. })),
            _ => false,
        })
        .await;

        send(&harness, ClientMsg::GetHistory).await;
        let msg = recv_matching(&mut harness, |m| matches!(m, ServerMsg::History { .. })).await;
        let ServerMsg::History { summary, recent } = msg else {
            unreachable!()
        };
        assert_eq!(recent.len(), 1);
        assert_eq!(summary.map(|s| s.total_games), Some(1));
    }

    #[tokio::test]
    async fn test_clear_history_replies_with_empty_history() {
        let mut harness = spawn_runner();
        send(&harness, ClientMsg::Start { settings: SessionSettings::default() }).await;
        send(&harness, ClientMsg::End).await;
        recv_matching(&mut harness, |m| match m {
            ServerMsg::Events { events } => events
                .iter()
                .any(|e| matches!(e, GameEvent::SessionEnded { .. })),
            _ => false,
        })
        .await;
        assert_eq!(harness.history.recent().len(), 1);

        send(&harness, ClientMsg::ClearHistory).await;
        let msg = recv_matching(&mut harness, |m| matches!(m, ServerMsg::History { .. })).await;
        let ServerMsg::History { summary, recent } = msg else {
            unreachable!()
        };
        assert!(summary.is_none());
        assert!(recent.is_empty());
        assert!(harness.history.recent().is_empty());
    }

    #[test]
    fn test_engine_clock_never_goes_backwards() {
        let (out_tx, _out_rx) = mpsc::channel(1);
        let dir = TempDir::new().unwrap();
        let history = Arc::new(History::new(Arc::new(LocalHistory::new(dir.path())), None));
        let (runner, _handle) = SessionRunner::new(Uuid::new_v4(), 1, history, out_tx);

        let before_start = runner.clock - Duration::from_millis(50);
        assert_eq!(runner.engine_millis(before_start), 0);
        assert_eq!(runner.engine_millis(runner.clock + Duration::from_millis(1_500)), 1_500);
    }

    #[tokio::test]
    async fn test_bad_sensitivity_is_rejected() {
        let mut harness = spawn_runner();
        send(
            &harness,
            ClientMsg::SetSensitivity {
                game: crate::ws::protocol::GamePreset::Valorant,
                sensitivity: -1.0,
                vertical: None,
            },
        )
        .await;

        let msg = recv_matching(&mut harness, |m| matches!(m, ServerMsg::Error { .. })).await;
        assert!(matches!(msg, ServerMsg::Error { ref code, .. } if code == "invalid_sensitivity"));
    }

    #[tokio::test]
    async fn test_runner_stops_when_input_closes() {
        let harness = spawn_runner();
        let Harness { input_tx, task, .. } = harness;
        drop(input_tx);

        timeout(Duration::from_secs(2), task)
            .await
            .expect("runner did not stop")
            .unwrap();
    }

    #[test]
    fn test_registry() {
        let registry = SessionRegistry::new();
        let (input_tx, _rx) = mpsc::channel(1);
        let id = Uuid::new_v4();
        registry.insert(SessionHandle { id, input_tx });

        assert_eq!(registry.active_sessions(), 1);
        assert!(registry.remove(&id).is_some());
        assert!(registry.remove(&id).is_none());
        assert_eq!(registry.active_sessions(), 0);
    }
}
