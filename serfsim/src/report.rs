use serfsim_core::{Game, SimMetrics, State};
use std::fmt;

/// Rough grouping of serf states for the tick summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activity {
    Idle,
    Walking,
    Working,
}

impl Activity {
    pub fn of(state: State) -> Self {
        match state {
            State::IdleInStock
            | State::IdleOnPath
            | State::WaitIdleOnPath
            | State::WakeAtFlag
            | State::WakeOnPath
            | State::Lost
            | State::DefendingHut
            | State::DefendingTower
            | State::DefendingFortress
            | State::DefendingCastle => Activity::Idle,
            State::Walking
            | State::Transporting
            | State::EnteringBuilding
            | State::LeavingBuilding
            | State::ReadyToEnter
            | State::ReadyToLeave
            | State::ReadyToLeaveInventory
            | State::FreeWalking
            | State::StoneCutterFreeWalking
            | State::KnightFreeWalking
            | State::Scatter => Activity::Walking,
            _ => Activity::Working,
        }
    }
}

/// Snapshot of a game taken between ticks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickSummary {
    pub game_time: u32,
    pub serfs: usize,
    pub idle: usize,
    pub walking: usize,
    pub working: usize,
    pub buildings_done: usize,
    pub buildings: usize,
    pub checksum: u64,
}

impl TickSummary {
    pub fn of(game: &Game) -> Self {
        let mut summary = TickSummary {
            game_time: game.game_time,
            serfs: game.serfs.len(),
            idle: 0,
            walking: 0,
            working: 0,
            buildings_done: game.buildings.iter().filter(|(_, b)| b.is_done()).count(),
            buildings: game.buildings.len(),
            checksum: game.checksum(),
        };
        for (_, serf) in game.serfs.iter() {
            match Activity::of(serf.state) {
                Activity::Idle => summary.idle += 1,
                Activity::Walking => summary.walking += 1,
                Activity::Working => summary.working += 1,
            }
        }
        summary
    }
}

impl fmt::Display for TickSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "tick {} | serfs {} | idle {} | walking {} | working {} | buildings done {}/{} | checksum {:016x}",
            self.game_time,
            self.serfs,
            self.idle,
            self.walking,
            self.working,
            self.buildings_done,
            self.buildings,
            self.checksum
        )
    }
}

/// End-of-run statistics, one item per line.
pub fn format_metrics(metrics: &SimMetrics) -> String {
    format!(
        "ticks: {}\n\
         average tick: {:.3} ms\n\
         serf updates per tick: {:.1}\n\
         state transitions: {}\n\
         fights: {}\n\
         deadlocks broken: {}\n\
         serfs lost: {}\n\
         resources produced: {}",
        metrics.total_ticks,
        metrics.tick_avg_ms(),
        metrics.updates_per_tick(),
        metrics.state_transitions,
        metrics.fights,
        metrics.deadlocks_broken,
        metrics.serfs_lost,
        metrics.resources_produced,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demo::build_demo_colony;
    use serfsim_core::SimConfig;

    #[test]
    fn test_fresh_colony_is_all_idle() {
        let game = build_demo_colony(7, SimConfig::default()).unwrap();
        let summary = TickSummary::of(&game);
        assert_eq!(summary.game_time, 0);
        assert_eq!(summary.serfs, summary.idle + summary.walking + summary.working);
        assert_eq!(summary.buildings, 6);
        assert!(summary.buildings_done < summary.buildings);
    }

    #[test]
    fn test_summary_line_format() {
        let summary = TickSummary {
            game_time: 42,
            serfs: 5,
            idle: 2,
            walking: 2,
            working: 1,
            buildings_done: 1,
            buildings: 3,
            checksum: 0xabc,
        };
        assert_eq!(
            summary.to_string(),
            "tick 42 | serfs 5 | idle 2 | walking 2 | working 1 | buildings done 1/3 | checksum 0000000000000abc"
        );
    }

    #[test]
    fn test_metrics_report_lists_fights() {
        let metrics = SimMetrics {
            total_ticks: 10,
            serf_updates: 40,
            fights: 3,
            ..Default::default()
        };
        let text = format_metrics(&metrics);
        assert!(text.contains("ticks: 10"));
        assert!(text.contains("serf updates per tick: 4.0"));
        assert!(text.contains("fights: 3"));
        assert!(text.contains("average tick: "));
        assert!(text.lines().all(|l| !l.starts_with("tick ")));
    }

    #[test]
    fn test_activity_groups() {
        assert_eq!(Activity::of(State::Transporting), Activity::Walking);
        assert_eq!(Activity::of(State::IdleOnPath), Activity::Idle);
        assert_eq!(Activity::of(State::Sawing), Activity::Working);
    }
}
