//! Session state machine
//!
//! Owns the live targets and the run counters, and turns timestamps and
//! discrete inputs into [`GameEvent`]s. All time values are milliseconds from
//! the caller's monotonic clock, so the machine runs the same under a synthetic
//! clock. Only the saved record carries wall-clock time.

use std::sync::Arc;

use glam::Vec3;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::history::{best, RecordContext, SessionHistory, SessionRecord, MAX_RECORDS};
use crate::util::time::unix_millis;
use crate::ws::protocol::{
    Difficulty, GameEvent, GameMode, HudSnapshot, SessionSettings, SessionSummary, TargetView,
};

use super::aim::{AimState, Sensitivity, AIM_ORIGIN};
use super::hit::{resolve_fire, HitResult, PrimitiveCaster, RayCaster};
use super::metrics::{compute, HitEvent, PerformanceSnapshot, SessionLog};
use super::placement::{place_target, PlacementBounds};
use super::target::{Target, TargetId, TargetSpec};
use super::InputEvent;

/// Length of a timed run
pub const SESSION_DURATION_SECS: f64 = 30.0;
/// Targets kept alive while playing
pub const INITIAL_TARGETS: usize = 3;
pub const DEFAULT_FOV: u32 = 90;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Menu,
    Playing,
    Paused,
    GameOver,
}

/// Per-run configuration, chosen in the menu
#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    pub difficulty: Difficulty,
    pub mode: GameMode,
    pub fov: u32,
    pub duration_secs: f64,
    pub initial_targets: usize,
    pub target_size_scale: f32,
    pub bounds: PlacementBounds,
    pub aim_origin: Vec3,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            difficulty: Difficulty::default(),
            mode: GameMode::default(),
            fov: DEFAULT_FOV,
            duration_secs: SESSION_DURATION_SECS,
            initial_targets: INITIAL_TARGETS,
            target_size_scale: 1.0,
            bounds: PlacementBounds::default(),
            aim_origin: AIM_ORIGIN,
        }
    }
}

impl SessionConfig {
    pub fn apply(&mut self, settings: &SessionSettings) {
        if let Some(difficulty) = settings.difficulty {
            self.difficulty = difficulty;
        }
        if let Some(mode) = settings.mode {
            self.mode = mode;
        }
        if let Some(fov) = settings.fov {
            self.fov = fov;
        }
    }
}

/// Counters of one run
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub started_at: u64,
    pub paused_at: Option<u64>,
    pub elapsed_secs: f64,
    pub score: u32,
    pub hits: u32,
    pub misses: u32,
    pub consecutive_hits: u32,
    pub max_streak: u32,
    pub hit_events: Vec<HitEvent>,
    pub total_clicks: u32,
    pub target_spawn_timestamps: Vec<u64>,
}

impl SessionState {
    fn new(now: u64) -> Self {
        Self {
            started_at: now,
            ..Self::default()
        }
    }

    pub fn log(&self) -> SessionLog<'_> {
        SessionLog {
            hit_events: &self.hit_events,
            hits: self.hits,
            misses: self.misses,
            total_clicks: self.total_clicks,
            targets_spawned: self.target_spawn_timestamps.len(),
        }
    }

    /// Unpaused seconds since the start. While paused the clock stands at `paused_at`.
    fn elapsed_at(&self, now: u64) -> f64 {
        let until = self.paused_at.unwrap_or(now);
        until.saturating_sub(self.started_at) as f64 / 1000.0
    }
}

/// One player's training session
pub struct SessionMachine {
    phase: SessionPhase,
    state: SessionState,
    /// Spawn order, oldest first
    targets: Vec<Target>,
    next_target_id: TargetId,
    current: Option<TargetId>,
    config: SessionConfig,
    aim: AimState,
    sensitivity: Sensitivity,
    rng: ChaCha8Rng,
    caster: Box<dyn RayCaster>,
    history: Arc<dyn SessionHistory>,
    last_summary: Option<SessionSummary>,
}

impl SessionMachine {
    pub fn new(seed: u64, history: Arc<dyn SessionHistory>) -> Self {
        Self::with_caster(seed, history, Box::new(PrimitiveCaster))
    }

    pub fn with_caster(seed: u64, history: Arc<dyn SessionHistory>, caster: Box<dyn RayCaster>) -> Self {
        Self {
            phase: SessionPhase::Menu,
            state: SessionState::default(),
            targets: Vec::new(),
            next_target_id: 1,
            current: None,
            config: SessionConfig::default(),
            aim: AimState::default(),
            sensitivity: Sensitivity::default(),
            rng: ChaCha8Rng::seed_from_u64(seed),
            caster,
            history,
            last_summary: None,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut SessionConfig {
        &mut self.config
    }

    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    pub fn aim(&self) -> AimState {
        self.aim
    }

    pub fn set_sensitivity(&mut self, sensitivity: Sensitivity) {
        self.sensitivity = sensitivity;
    }

    pub fn current_target(&self) -> Option<TargetId> {
        self.current
    }

    pub fn last_summary(&self) -> Option<&SessionSummary> {
        self.last_summary.as_ref()
    }

    /// Dispatch a typed input
    pub fn handle(&mut self, event: InputEvent, now: u64) -> Vec<GameEvent> {
        match event {
            InputEvent::Start(settings) => {
                if self.can_start() {
                    self.config.apply(&settings);
                }
                self.start(now)
            }
            InputEvent::Aim { dx, dy } => {
                self.aim.apply_mouse_delta(dx, dy, &self.sensitivity);
                Vec::new()
            }
            InputEvent::AimAt { yaw, pitch } => {
                self.aim.set(yaw, pitch);
                Vec::new()
            }
            InputEvent::Fire => self.fire(now),
            InputEvent::Pause => self.pause(now),
            InputEvent::Resume => self.resume(now),
            InputEvent::TogglePause => self.toggle_pause(now),
            InputEvent::End => self.end(now),
            InputEvent::Restart => self.restart(now),
            InputEvent::ReturnToMenu => self.return_to_menu(now),
            InputEvent::SetSensitivity(sensitivity) => {
                self.set_sensitivity(sensitivity);
                Vec::new()
            }
        }
    }

    fn can_start(&self) -> bool {
        matches!(self.phase, SessionPhase::Menu | SessionPhase::GameOver)
    }

    /// Begin a run from the menu or the results screen
    pub fn start(&mut self, now: u64) -> Vec<GameEvent> {
        if !self.can_start() {
            return Vec::new();
        }

        let mut events = self.clear_targets();
        self.state = SessionState::new(now);
        self.aim = AimState::default();
        self.last_summary = None;
        self.set_phase(SessionPhase::Playing, &mut events);

        for _ in 0..self.config.initial_targets {
            events.push(self.spawn_target(now));
        }
        self.update_current(&mut events);

        tracing::info!(
            mode = self.config.mode.as_str(),
            difficulty = self.config.difficulty.as_str(),
            "Session started"
        );

        events
    }

    /// Advance the clock: retire finished removals and end the run on time
    pub fn tick(&mut self, now: u64) -> Vec<GameEvent> {
        if self.phase != SessionPhase::Playing {
            return Vec::new();
        }

        let mut events = Vec::new();
        self.targets.retain(|target| {
            if target.removal_finished(now) {
                events.push(GameEvent::TargetRemoved { target_id: target.id });
                false
            } else {
                true
            }
        });

        self.state.elapsed_secs = self.state.elapsed_at(now);
        if self.state.elapsed_secs >= self.config.duration_secs {
            events.extend(self.end(now));
        }

        events
    }

    pub fn pause(&mut self, now: u64) -> Vec<GameEvent> {
        if self.phase != SessionPhase::Playing {
            return Vec::new();
        }

        let mut events = Vec::new();
        self.state.elapsed_secs = self.state.elapsed_at(now);
        self.state.paused_at = Some(now);
        self.set_phase(SessionPhase::Paused, &mut events);
        events
    }

    pub fn resume(&mut self, now: u64) -> Vec<GameEvent> {
        if self.phase != SessionPhase::Paused {
            return Vec::new();
        }

        let mut events = Vec::new();
        if let Some(paused_at) = self.state.paused_at.take() {
            // shift the start so the paused span never counts
            self.state.started_at += now.saturating_sub(paused_at);
        }
        self.set_phase(SessionPhase::Playing, &mut events);
        events
    }

    pub fn toggle_pause(&mut self, now: u64) -> Vec<GameEvent> {
        match self.phase {
            SessionPhase::Playing => self.pause(now),
            SessionPhase::Paused => self.resume(now),
            _ => Vec::new(),
        }
    }

    /// Finish the run, hand the record to history and show the results
    pub fn end(&mut self, now: u64) -> Vec<GameEvent> {
        let mut events = match self.phase {
            SessionPhase::Paused => self.resume(now),
            SessionPhase::Playing => Vec::new(),
            _ => return Vec::new(),
        };

        let summary = self.finalize(now);
        tracing::info!(
            score = summary.record.score,
            accuracy = summary.record.accuracy,
            grade = %summary.record.grade,
            new_highscore = summary.new_highscore,
            "Session ended"
        );

        events.extend(self.clear_targets());
        self.set_phase(SessionPhase::GameOver, &mut events);
        events.push(GameEvent::SessionEnded {
            summary: summary.clone(),
        });
        self.last_summary = Some(summary);

        events
    }

    /// Register a click along the current aim direction
    pub fn fire(&mut self, now: u64) -> Vec<GameEvent> {
        if self.phase != SessionPhase::Playing {
            return Vec::new();
        }

        self.state.total_clicks += 1;

        let result = resolve_fire(
            self.config.aim_origin,
            self.aim.direction(),
            &self.targets,
            self.caster.as_ref(),
        );

        let mut events = Vec::new();
        match result {
            HitResult::Hit { target_id, method } => {
                let Some(target) = self.targets.iter_mut().find(|t| t.id == target_id) else {
                    return events;
                };
                if !target.mark_removed(now) {
                    return events;
                }
                let reaction_time_ms = now.saturating_sub(target.spawned_at);

                let state = &mut self.state;
                state.score += 1;
                state.hits += 1;
                state.consecutive_hits += 1;
                state.max_streak = state.max_streak.max(state.consecutive_hits);
                state.hit_events.push(HitEvent {
                    reaction_time_ms,
                    timestamp: now,
                });

                tracing::debug!(target_id, reaction_time_ms, ?method, "Target hit");
                events.push(GameEvent::TargetHit {
                    target_id,
                    reaction_time_ms,
                    streak: state.consecutive_hits,
                    score: state.score,
                });

                events.push(self.spawn_target(now));
                self.update_current(&mut events);
            }
            HitResult::Miss => {
                self.state.misses += 1;
                self.state.consecutive_hits = 0;
                events.push(GameEvent::Missed);
            }
        }

        events
    }

    /// Drop the run and go back to the menu
    pub fn reset(&mut self) -> Vec<GameEvent> {
        let mut events = self.clear_targets();
        self.state = SessionState::default();
        self.aim = AimState::default();
        self.set_phase(SessionPhase::Menu, &mut events);
        events
    }

    /// Restart shortcut: reset then start, from any phase
    pub fn restart(&mut self, now: u64) -> Vec<GameEvent> {
        let mut events = self.reset();
        events.extend(self.start(now));
        events
    }

    /// Leave to the menu, keeping a run in progress if it scored anything
    pub fn return_to_menu(&mut self, now: u64) -> Vec<GameEvent> {
        let in_progress = matches!(self.phase, SessionPhase::Playing | SessionPhase::Paused);
        if in_progress && self.state.hits > 0 {
            let summary = self.finalize(now);
            tracing::info!(score = summary.record.score, "Unfinished session saved");
        }
        self.reset()
    }

    /// Metrics of the run so far
    pub fn performance(&self) -> PerformanceSnapshot {
        compute(&self.state.log())
    }

    pub fn hud(&self, now: u64) -> HudSnapshot {
        let elapsed_secs = match self.phase {
            SessionPhase::Playing | SessionPhase::Paused => self.state.elapsed_at(now),
            _ => self.state.elapsed_secs,
        }
        .min(self.config.duration_secs);

        HudSnapshot {
            phase: self.phase,
            score: self.state.score,
            hits: self.state.hits,
            misses: self.state.misses,
            streak: self.state.consecutive_hits,
            elapsed_secs,
            remaining_secs: (self.config.duration_secs - elapsed_secs).max(0.0),
            performance: self.performance(),
            yaw: self.aim.yaw,
            pitch: self.aim.pitch,
        }
    }

    pub fn target_views(&self) -> Vec<TargetView> {
        self.targets
            .iter()
            .map(|t| t.view(self.current == Some(t.id)))
            .collect()
    }

    /// Build the record, compare with the best so far and save it
    fn finalize(&mut self, now: u64) -> SessionSummary {
        let elapsed_secs = self.state.elapsed_at(now).min(self.config.duration_secs);
        self.state.elapsed_secs = elapsed_secs;

        let snapshot = self.performance();
        let context = RecordContext {
            difficulty: self.config.difficulty,
            mode: self.config.mode,
            fov: self.config.fov,
            score: self.state.score,
            hits: self.state.hits,
            misses: self.state.misses,
            max_streak: self.state.max_streak,
        };
        let player = self.history.player();
        let record = SessionRecord::from_performance(
            unix_millis() as i64,
            player.as_ref(),
            context,
            &snapshot,
        );

        let previous = self.history.load_recent(MAX_RECORDS);
        let previous_best = best(&previous).map(|r| r.score);
        let new_highscore = previous_best.map_or(true, |best| record.score > best);

        self.history.save(record.clone());

        SessionSummary {
            record,
            elapsed_secs,
            new_highscore,
            previous_best,
        }
    }

    fn spawn_target(&mut self, now: u64) -> GameEvent {
        let spec = TargetSpec::for_score(self.state.score, self.config.mode, self.config.target_size_scale);
        let placement = place_target(&self.targets, &spec, &self.config.bounds, &mut self.rng);
        if placement.fallback {
            tracing::debug!(live = self.targets.len(), "Placement fell back to best spread");
        }

        let id = self.next_target_id;
        self.next_target_id = self.next_target_id.wrapping_add(1);

        let target = Target::new(id, spec, placement.position, now);
        let view = target.view(false);
        self.targets.push(target);
        self.state.target_spawn_timestamps.push(now);

        GameEvent::TargetSpawned { target: view }
    }

    fn update_current(&mut self, events: &mut Vec<GameEvent>) {
        let current = self.targets.iter().find(|t| !t.being_removed).map(|t| t.id);
        if current != self.current {
            self.current = current;
            if let Some(target_id) = current {
                events.push(GameEvent::TargetHighlighted { target_id });
            }
        }
    }

    fn clear_targets(&mut self) -> Vec<GameEvent> {
        self.current = None;
        self.targets
            .drain(..)
            .map(|t| GameEvent::TargetRemoved { target_id: t.id })
            .collect()
    }

    fn set_phase(&mut self, phase: SessionPhase, events: &mut Vec<GameEvent>) {
        if self.phase != phase {
            self.phase = phase;
            events.push(GameEvent::PhaseChanged { phase });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::aim::AIM_ORIGIN;
    use crate::game::target::REMOVAL_ANIMATION_MS;
    use crate::history::Steam64;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingHistory {
        saved: Mutex<Vec<SessionRecord>>,
    }

    impl RecordingHistory {
        fn with(records: Vec<SessionRecord>) -> Self {
            Self {
                saved: Mutex::new(records),
            }
        }

        fn saved(&self) -> Vec<SessionRecord> {
            self.saved.lock().clone()
        }
    }

    impl SessionHistory for RecordingHistory {
        fn save(&self, record: SessionRecord) {
            self.saved.lock().insert(0, record);
        }

        fn load_recent(&self, limit: usize) -> Vec<SessionRecord> {
            self.saved.lock().iter().take(limit).cloned().collect()
        }

        fn player(&self) -> Option<Steam64> {
            Steam64::parse("76561198000000004").ok()
        }
    }

    fn machine() -> (SessionMachine, Arc<RecordingHistory>) {
        let history = Arc::new(RecordingHistory::default());
        (SessionMachine::new(42, history.clone()), history)
    }

    /// Point the camera at a live target and fire
    fn hit_current(machine: &mut SessionMachine, now: u64) -> Vec<GameEvent> {
        let id = machine.current_target().unwrap();
        let position = machine.targets().iter().find(|t| t.id == id).unwrap().position;
        machine.aim.look_at(AIM_ORIGIN, position);
        machine.fire(now)
    }

    fn miss(machine: &mut SessionMachine, now: u64) -> Vec<GameEvent> {
        // straight up, nothing lives there
        machine.aim.set(0.0, std::f32::consts::FRAC_PI_2);
        machine.fire(now)
    }

    fn live_count(machine: &SessionMachine) -> usize {
        machine.targets().iter().filter(|t| !t.being_removed).count()
    }

    #[test]
    fn test_start_spawns_three_targets() {
        let (mut machine, _) = machine();
        let events = machine.start(1_000);

        assert_eq!(machine.phase(), SessionPhase::Playing);
        assert_eq!(machine.targets().len(), INITIAL_TARGETS);
        let spawned = events
            .iter()
            .filter(|e| matches!(e, GameEvent::TargetSpawned { .. }))
            .count();
        assert_eq!(spawned, INITIAL_TARGETS);
        assert_eq!(machine.current_target(), Some(machine.targets()[0].id));
        assert!(events
            .iter()
            .any(|e| matches!(e, GameEvent::TargetHighlighted { .. })));
    }

    #[test]
    fn test_start_is_ignored_while_playing() {
        let (mut machine, _) = machine();
        machine.start(0);
        hit_current(&mut machine, 100);

        assert!(machine.start(200).is_empty());
        assert_eq!(machine.state().hits, 1);
    }

    #[test]
    fn test_pause_does_not_count_towards_elapsed() {
        let (mut machine, _) = machine();
        machine.start(0);
        machine.tick(10_000);
        machine.pause(10_000);
        machine.resume(20_000);
        machine.tick(25_000);

        assert!((machine.state().elapsed_secs - 15.0).abs() < 1e-9);
        assert_eq!(machine.phase(), SessionPhase::Playing);
    }

    #[test]
    fn test_hud_clock_stands_still_while_paused() {
        let (mut machine, _) = machine();
        machine.start(0);
        machine.pause(5_000);

        assert_eq!(machine.hud(60_000).elapsed_secs, 5.0);
        assert_eq!(machine.hud(60_000).remaining_secs, 25.0);
    }

    #[test]
    fn test_session_ends_after_thirty_seconds() {
        let (mut machine, history) = machine();
        machine.start(0);
        assert!(machine.tick(29_999).is_empty());

        let events = machine.tick(30_000);
        assert_eq!(machine.phase(), SessionPhase::GameOver);
        assert!(machine.targets().is_empty());
        assert!(events
            .iter()
            .any(|e| matches!(e, GameEvent::SessionEnded { .. })));
        assert_eq!(history.saved().len(), 1);
    }

    #[test]
    fn test_end_from_paused() {
        let (mut machine, history) = machine();
        machine.start(0);
        hit_current(&mut machine, 500);
        machine.pause(2_000);

        let events = machine.end(9_000);

        assert_eq!(machine.phase(), SessionPhase::GameOver);
        assert!(events.iter().any(|e| matches!(
            e,
            GameEvent::PhaseChanged {
                phase: SessionPhase::Playing
            }
        )));
        let summary = machine.last_summary().unwrap();
        assert!((summary.elapsed_secs - 2.0).abs() < 1e-9);
        assert_eq!(history.saved()[0].score, 1);
        assert_eq!(history.saved()[0].steam64.as_deref(), Some("76561198000000004"));
    }

    #[test]
    fn test_fire_outside_play_is_ignored() {
        let (mut machine, _) = machine();
        assert!(machine.fire(0).is_empty());
        assert_eq!(machine.state().total_clicks, 0);

        machine.start(0);
        machine.pause(100);
        assert!(machine.fire(200).is_empty());
        assert_eq!(machine.state().total_clicks, 0);
    }

    #[test]
    fn test_hit_updates_counters_and_replaces_target() {
        let (mut machine, _) = machine();
        machine.start(1_000);

        let events = hit_current(&mut machine, 1_350);

        let state = machine.state();
        assert_eq!((state.score, state.hits, state.misses), (1, 1, 0));
        assert_eq!(state.hit_events[0].reaction_time_ms, 350);
        assert_eq!(state.total_clicks, 1);
        assert_eq!(state.target_spawn_timestamps.len(), INITIAL_TARGETS + 1);
        assert!(events.iter().any(|e| matches!(
            e,
            GameEvent::TargetHit {
                reaction_time_ms: 350,
                streak: 1,
                score: 1,
                ..
            }
        )));
        assert!(events
            .iter()
            .any(|e| matches!(e, GameEvent::TargetSpawned { .. })));
    }

    #[test]
    fn test_second_shot_at_removed_target_is_not_a_hit() {
        let (mut machine, _) = machine();
        machine.start(0);

        let first = machine.current_target().unwrap();
        hit_current(&mut machine, 200);
        let aim = machine.aim();
        let removed = machine.targets().iter().find(|t| t.id == first).unwrap();
        assert!(removed.being_removed);

        machine.aim = aim;
        let events = machine.fire(250);

        let hits_on_first = events.iter().any(|e| {
            matches!(e, GameEvent::TargetHit { target_id, .. } if *target_id == first)
        });
        assert!(!hits_on_first);
        assert!(machine.state().hits <= 2);
    }

    #[test]
    fn test_live_target_count_is_constant() {
        let (mut machine, _) = machine();
        machine.start(0);

        let mut now = 0;
        for _ in 0..20 {
            now += 100;
            hit_current(&mut machine, now);
            assert_eq!(live_count(&machine), INITIAL_TARGETS);
            machine.tick(now);
        }

        machine.tick(now + REMOVAL_ANIMATION_MS);
        assert_eq!(machine.targets().len(), INITIAL_TARGETS);
    }

    #[test]
    fn test_removal_animation_retires_target() {
        let (mut machine, _) = machine();
        machine.start(0);
        let first = machine.current_target().unwrap();
        hit_current(&mut machine, 100);

        assert!(machine.tick(100 + REMOVAL_ANIMATION_MS - 1).is_empty());
        let events = machine.tick(100 + REMOVAL_ANIMATION_MS);
        assert!(events.iter().any(
            |e| matches!(e, GameEvent::TargetRemoved { target_id } if *target_id == first)
        ));
        assert!(machine.targets().iter().all(|t| t.id != first));
    }

    #[test]
    fn test_miss_breaks_streak() {
        let (mut machine, _) = machine();
        machine.start(0);
        hit_current(&mut machine, 100);
        hit_current(&mut machine, 200);
        let events = miss(&mut machine, 300);

        assert!(matches!(events.as_slice(), [GameEvent::Missed]));
        let state = machine.state();
        assert_eq!(state.consecutive_hits, 0);
        assert_eq!(state.max_streak, 2);
        assert_eq!((state.score, state.misses, state.total_clicks), (2, 1, 3));
    }

    #[test]
    fn test_consecutive_starts_fully_reset() {
        let (mut machine, _) = machine();
        machine.start(0);
        hit_current(&mut machine, 100);
        miss(&mut machine, 200);
        machine.end(1_000);

        machine.start(2_000);

        let state = machine.state();
        assert_eq!((state.score, state.hits, state.misses), (0, 0, 0));
        assert!(state.hit_events.is_empty());
        assert_eq!(state.total_clicks, 0);
        assert_eq!(state.started_at, 2_000);
        assert_eq!(machine.targets().len(), INITIAL_TARGETS);
    }

    #[test]
    fn test_restart_mid_run_resets() {
        let (mut machine, history) = machine();
        machine.start(0);
        hit_current(&mut machine, 100);

        machine.restart(500);

        assert_eq!(machine.phase(), SessionPhase::Playing);
        assert_eq!(machine.state().score, 0);
        assert_eq!(machine.targets().len(), INITIAL_TARGETS);
        assert!(history.saved().is_empty());
    }

    #[test]
    fn test_return_to_menu_saves_only_scored_runs() {
        let (mut machine, history) = machine();
        machine.start(0);
        miss(&mut machine, 100);
        machine.return_to_menu(200);
        assert!(history.saved().is_empty());
        assert_eq!(machine.phase(), SessionPhase::Menu);
        assert!(machine.targets().is_empty());

        machine.start(1_000);
        hit_current(&mut machine, 1_200);
        machine.pause(1_500);
        machine.return_to_menu(3_000);
        assert_eq!(history.saved().len(), 1);
        assert_eq!(machine.phase(), SessionPhase::Menu);
    }

    #[test]
    fn test_new_highscore_flag() {
        let previous = SessionRecord {
            score: 1,
            ..SessionRecord::default()
        };
        let history = Arc::new(RecordingHistory::with(vec![previous]));
        let mut machine = SessionMachine::new(5, history.clone());

        machine.start(0);
        let summary = match machine.end(1_000).pop() {
            Some(GameEvent::SessionEnded { summary }) => summary,
            other => panic!("unexpected {other:?}"),
        };
        assert!(!summary.new_highscore);
        assert_eq!(summary.previous_best, Some(1));

        machine.start(2_000);
        hit_current(&mut machine, 2_100);
        hit_current(&mut machine, 2_200);
        machine.end(3_000);
        let summary = machine.last_summary().unwrap();
        assert!(summary.new_highscore);
        assert_eq!(summary.record.score, 2);
    }

    #[test]
    fn test_first_session_is_a_highscore() {
        let (mut machine, _) = machine();
        machine.start(0);
        machine.end(100);
        let summary = machine.last_summary().unwrap();
        assert!(summary.new_highscore);
        assert_eq!(summary.previous_best, None);
    }

    #[test]
    fn test_toggle_pause() {
        let (mut machine, _) = machine();
        assert!(machine.toggle_pause(0).is_empty());

        machine.start(0);
        machine.toggle_pause(100);
        assert_eq!(machine.phase(), SessionPhase::Paused);
        machine.toggle_pause(200);
        assert_eq!(machine.phase(), SessionPhase::Playing);
    }

    #[test]
    fn test_start_settings_apply_from_menu() {
        let (mut machine, history) = machine();
        let settings = SessionSettings {
            difficulty: Some(Difficulty::Hard),
            mode: Some(GameMode::Precision),
            fov: Some(103),
        };
        machine.handle(InputEvent::Start(settings), 0);
        hit_current(&mut machine, 100);
        machine.handle(InputEvent::End, 200);

        let record = &history.saved()[0];
        assert_eq!(record.difficulty, "hard");
        assert_eq!(record.game_mode, "precision");
        assert_eq!(record.fov, 103);
    }

    #[test]
    fn test_boxes_spawn_past_threshold() {
        let (mut machine, _) = machine();
        machine.start(0);
        let mut now = 0;
        for _ in 0..15 {
            now += 50;
            hit_current(&mut machine, now);
            machine.tick(now);
        }

        let newest = machine.targets().last().unwrap();
        assert_eq!(newest.shape, crate::ws::protocol::TargetShape::Box);
    }
}
