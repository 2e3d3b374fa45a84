use crate::error::SimError;
use crate::Game;
use rustc_hash::FxHasher;
use std::hash::{Hash, Hasher};
use std::time::Instant;

/// Ticks between passes that let trees and fields grow.
const GROWTH_INTERVAL: u32 = 64;

impl Game {
    /// Advance the game by `config.tick_step` ticks.
    ///
    /// Every serf is updated once per tick in id order. A failing handler
    /// does not stop the rest of the tick; the first error is returned once
    /// all serfs have run.
    #[tracing::instrument(skip_all)]
    pub fn update(&mut self) -> Result<(), SimError> {
        let start = Instant::now();
        let mut first_error = None;
        for _ in 0..self.config.tick_step.max(1) {
            self.tick = self.tick.wrapping_add(1);
            self.game_time = self.game_time.wrapping_add(1);

            if self.game_time % GROWTH_INTERVAL == 0 {
                self.grow_objects();
            }
            self.update_requests();

            for id in self.serfs.ids() {
                if !self.serfs.contains(id) {
                    continue;
                }
                if let Err(err) = self.update_serf(id) {
                    log::error!("tick {}: {}", self.game_time, err);
                    first_error.get_or_insert(err);
                }
            }

            self.metrics.total_ticks += 1;
            crate::profiling::frame_mark_tick();
            let every = self.config.checksum_frequency;
            if every > 0 && self.game_time % every == 0 {
                self.last_checksum = self.checksum();
                log::trace!("tick {}: checksum {:016x}", self.game_time, self.last_checksum);
            }
        }
        self.metrics.total_time += start.elapsed();
        first_error.map_or(Ok(()), Err)
    }

    pub fn run_ticks(&mut self, ticks: u32) -> Result<(), SimError> {
        let mut first_error = None;
        for _ in 0..ticks {
            if let Err(err) = self.update() {
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Hash of the whole simulation state, in arena order.
    pub fn checksum(&self) -> u64 {
        let mut hasher = FxHasher::default();
        self.tick.hash(&mut hasher);
        self.game_time.hash(&mut hasher);
        self.rng.hash(&mut hasher);
        self.map.hash(&mut hasher);
        self.players.hash(&mut hasher);
        for (id, flag) in self.flags.iter() {
            (id, flag).hash(&mut hasher);
        }
        for (id, building) in self.buildings.iter() {
            (id, building).hash(&mut hasher);
        }
        for (id, inventory) in self.inventories.iter() {
            (id, inventory).hash(&mut hasher);
        }
        for (id, serf) in self.serfs.iter() {
            (id, serf).hash(&mut hasher);
        }
        hasher.finish()
    }

    /// Full JSON dump of the game state.
    pub fn snapshot_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use crate::building::BuildingType;
    use crate::map::Direction;
    use crate::resource::Resource;
    use crate::serf::{SerfType, State};
    use crate::testing::GameBuilder;
    use crate::Game;

    fn colony(seed: u64) -> Game {
        let mut builder = GameBuilder::new().with_player().seed(seed);
        let (castle, inv) = builder.castle(0, 6, 6);
        let castle_flag = builder.building_flag(castle);
        builder.flag(0, 11, 7);
        builder.road(castle_flag, &[Direction::Right; 4]);
        for col in 12..20 {
            let p = builder.pos(col, 3);
            builder.tree(p);
        }
        let mut game = builder.build();
        game.build_building(0, game.map.pos(10, 6), BuildingType::Lumberjack);
        game.add_serfs_to_inventory(inv, SerfType::Generic, 6);
        game.add_resources_to_inventory(inv, Resource::Plank, 10);
        game.add_resources_to_inventory(inv, Resource::Stone, 4);
        game.add_resources_to_inventory(inv, Resource::Axe, 1);
        game.add_resources_to_inventory(inv, Resource::Hammer, 2);
        game.add_resources_to_inventory(inv, Resource::Shovel, 1);
        game
    }

    #[test]
    fn test_update_advances_clock() {
        let mut game = colony(1);
        game.run_ticks(10).unwrap();
        assert_eq!(game.tick, 10);
        assert_eq!(game.game_time, 10);
        assert_eq!(game.metrics.total_ticks, 10);
    }

    #[test]
    fn test_identical_seeds_give_identical_runs() {
        let mut a = colony(7);
        let mut b = colony(7);
        for _ in 0..40 {
            a.run_ticks(50).unwrap();
            b.run_ticks(50).unwrap();
            assert_eq!(a.checksum(), b.checksum(), "diverged at tick {}", a.game_time);
        }
        assert_eq!(a.snapshot_json().unwrap(), b.snapshot_json().unwrap());
    }

    #[test]
    fn test_payload_always_matches_state() {
        let mut game = colony(3);
        for _ in 0..3000 {
            game.update().unwrap();
            for (id, serf) in game.serfs.iter() {
                assert!(serf.data.matches(serf.state), "serf {id} in {:?} with {:?}", serf.state, serf.data);
            }
        }
    }

    #[test]
    fn test_occupancy_points_back_at_serf() {
        let mut game = colony(5);
        for _ in 0..3000 {
            game.update().unwrap();
            for (id, serf) in game.serfs.iter() {
                if let Some(other) = game.map.serf_index(serf.pos) {
                    if other == id {
                        continue;
                    }
                    let o = game.get_serf(other).unwrap();
                    assert_eq!(o.pos, serf.pos);
                }
            }
            for pos in 0..game.map.size() as u32 {
                if let Some(id) = game.map.serf_index(pos) {
                    assert_eq!(game.get_serf(id).map(|s| s.pos), Some(pos));
                }
            }
        }
    }

    #[test]
    fn test_zero_delta_update_leaves_waiting_serfs_alone() {
        let mut game = colony(11);
        game.run_ticks(500).unwrap();
        let before = game.clone();
        for id in game.serfs.ids() {
            game.update_serf(id).unwrap();
        }
        for (id, serf) in before.serfs.iter().filter(|(_, s)| s.counter >= 0) {
            let now = game.serfs.get(id).unwrap();
            assert_eq!(serf.counter, now.counter);
            assert_eq!(serf.state, now.state);
            assert_eq!(serf.pos, now.pos);
            assert_eq!(serf.data, now.data);
        }
    }

    #[test]
    fn test_colony_builds_the_lumberjack() {
        let mut game = colony(2);
        game.run_ticks(20_000).unwrap();
        let hut = game
            .buildings
            .iter()
            .find(|(_, b)| b.kind == BuildingType::Lumberjack)
            .map(|(id, _)| id)
            .unwrap();
        assert!(game.get_building(hut).unwrap().is_done());
        assert!(game.serfs.iter().any(|(_, s)| s.kind == SerfType::Lumberjack));
        assert!(game.serfs.iter().all(|(_, s)| s.state != State::Invalid));
    }
}
