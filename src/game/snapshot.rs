//! HUD snapshot pacing and building

use crate::ws::protocol::ServerMsg;

use super::session::SessionMachine;

/// Decides when a HUD snapshot goes out and builds it
pub struct SnapshotBuilder {
    /// Tick counter since last snapshot
    ticks_since_snapshot: u32,
    /// Snapshot interval in ticks
    snapshot_interval: u32,
    stats: SnapshotStats,
}

impl SnapshotBuilder {
    pub fn new(snapshot_interval: u32) -> Self {
        Self {
            ticks_since_snapshot: 0,
            snapshot_interval: snapshot_interval.max(1),
            stats: SnapshotStats::default(),
        }
    }

    /// Check if it's time to send a snapshot
    pub fn should_send(&mut self) -> bool {
        self.ticks_since_snapshot += 1;
        if self.ticks_since_snapshot >= self.snapshot_interval {
            self.ticks_since_snapshot = 0;
            true
        } else {
            false
        }
    }

    /// Force snapshot on next check (used for important events)
    pub fn force_next(&mut self) {
        self.ticks_since_snapshot = self.snapshot_interval;
    }

    /// Build a snapshot message
    pub fn build(&mut self, tick: u64, machine: &SessionMachine, now: u64) -> ServerMsg {
        let targets = machine.target_views();
        self.stats.record(targets.len());

        ServerMsg::Snapshot {
            tick,
            hud: machine.hud(now),
            targets,
        }
    }

    pub fn stats(&self) -> &SnapshotStats {
        &self.stats
    }
}

/// Snapshot stats for debugging
#[derive(Debug, Default)]
pub struct SnapshotStats {
    pub total_snapshots: u64,
    pub avg_targets_per_snapshot: f32,
}

impl SnapshotStats {
    pub fn record(&mut self, target_count: usize) {
        self.total_snapshots += 1;

        // Running average
        let n = self.total_snapshots as f32;
        self.avg_targets_per_snapshot =
            self.avg_targets_per_snapshot * ((n - 1.0) / n) + (target_count as f32 / n);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::{SessionHistory, SessionRecord};
    use std::sync::Arc;

    struct NoHistory;

    impl SessionHistory for NoHistory {
        fn save(&self, _: SessionRecord) {}

        fn load_recent(&self, _: usize) -> Vec<SessionRecord> {
            Vec::new()
        }
    }

    #[test]
    fn test_sends_every_interval() {
        let mut builder = SnapshotBuilder::new(3);
        let sent: Vec<bool> = (0..6).map(|_| builder.should_send()).collect();
        assert_eq!(sent, vec![false, false, true, false, false, true]);
    }

    #[test]
    fn test_force_next() {
        let mut builder = SnapshotBuilder::new(3);
        builder.should_send();
        builder.force_next();
        assert!(builder.should_send());
        assert!(!builder.should_send());
    }

    #[test]
    fn test_build_carries_hud_and_targets() {
        let mut machine = SessionMachine::new(1, Arc::new(NoHistory));
        machine.start(0);
        let mut builder = SnapshotBuilder::new(3);

        match builder.build(7, &machine, 1_000) {
            ServerMsg::Snapshot { tick, hud, targets } => {
                assert_eq!(tick, 7);
                assert_eq!(hud.elapsed_secs, 1.0);
                assert_eq!(targets.len(), 3);
                assert_eq!(targets.iter().filter(|t| t.current).count(), 1);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(builder.stats().total_snapshots, 1);
        assert_eq!(builder.stats().avg_targets_per_snapshot, 3.0);
    }
}
