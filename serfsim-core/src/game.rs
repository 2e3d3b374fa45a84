//! The game: every entity arena plus the shared clock and random source.
//!
//! State handlers are methods on [`Game`] taking a serf id. They hold borrows
//! of a single arena only for as long as they need a value out of it, so a
//! handler is free to touch the map, flags, buildings and other serfs in the
//! same call. All of this happens on one thread in serf-id order.

use crate::arena::{Arena, BuildingId, FlagId, Id, InventoryId, SerfId};
use crate::building::Building;
use crate::config::SimConfig;
use crate::error::SimError;
use crate::flag::{Flag, FlagNetwork};
use crate::inventory::Inventory;
use crate::map::{Direction, Map, MapPos};
use crate::metrics::SimMetrics;
use crate::player::Player;
use crate::rng::GameRng;
use crate::serf::tables::{counter_from_animation, walking_animation};
use crate::serf::{Serf, SerfType, State, StateData};
use game_pathfinding::BreadthFirst;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Game {
    pub config: SimConfig,
    /// 16-bit game clock; serfs measure elapsed time against it modulo 2^16.
    pub tick: u16,
    /// Ticks since the game started, never wraps in practice.
    pub game_time: u32,
    pub rng: GameRng,
    pub map: Map,
    pub players: Vec<Player>,
    pub flags: Arena<FlagId, Flag>,
    pub buildings: Arena<BuildingId, Building>,
    pub inventories: Arena<InventoryId, Inventory>,
    pub serfs: Arena<SerfId, Serf>,
    pub last_checksum: u64,
    #[serde(skip)]
    pub metrics: SimMetrics,
}

impl Game {
    pub fn new(map: Map, config: SimConfig, seed: u64) -> Self {
        Self {
            config,
            tick: 0,
            game_time: 0,
            rng: GameRng::seed_from_u64(seed),
            map,
            players: Vec::new(),
            flags: Arena::new(),
            buildings: Arena::new(),
            inventories: Arena::new(),
            serfs: Arena::new(),
            last_checksum: 0,
            metrics: SimMetrics::default(),
        }
    }

    pub fn add_player(&mut self) -> u8 {
        let index = self.players.len() as u8;
        self.players
            .push(Player::new(index, self.config.default_knight_morale));
        index
    }

    pub fn random_int(&mut self) -> u16 {
        self.rng.random_int()
    }

    pub fn player_mut(&mut self, index: u8) -> Option<&mut Player> {
        self.players.get_mut(index as usize)
    }

    pub fn get_flag(&self, id: FlagId) -> Option<&Flag> {
        self.flags.get(id)
    }

    pub fn get_building(&self, id: BuildingId) -> Option<&Building> {
        self.buildings.get(id)
    }

    pub fn get_inventory(&self, id: InventoryId) -> Option<&Inventory> {
        self.inventories.get(id)
    }

    pub fn get_serf(&self, id: SerfId) -> Option<&Serf> {
        self.serfs.get(id)
    }

    pub fn serf(&self, id: SerfId) -> Result<&Serf, SimError> {
        self.serfs.get(id).ok_or(SimError::NoSuchSerf(id))
    }

    pub fn serf_mut(&mut self, id: SerfId) -> Result<&mut Serf, SimError> {
        self.serfs.get_mut(id).ok_or(SimError::NoSuchSerf(id))
    }

    pub(crate) fn missing(
        &self,
        serf: SerfId,
        kind: &'static str,
        index: u32,
        op: &'static str,
    ) -> SimError {
        SimError::MissingEntity {
            serf,
            state: self.serfs.get(serf).map(|s| s.state).unwrap_or_default(),
            kind,
            index,
            op,
        }
    }

    pub(crate) fn unreachable(&self, serf: SerfId, op: &'static str, detail: String) -> SimError {
        SimError::Unreachable {
            serf,
            state: self.serfs.get(serf).map(|s| s.state).unwrap_or_default(),
            op,
            detail,
        }
    }

    /// Flag at a map position.
    pub fn flag_at(&self, pos: MapPos) -> Option<FlagId> {
        if self.map.has_flag(pos) {
            FlagId::from_raw(self.map.obj_index(pos))
        } else {
            None
        }
    }

    /// Building at a map position.
    pub fn building_at(&self, pos: MapPos) -> Option<BuildingId> {
        if self.map.has_building(pos) {
            BuildingId::from_raw(self.map.obj_index(pos))
        } else {
            None
        }
    }

    /// Flag in front of a building position.
    pub fn flag_pos_of(&self, building_pos: MapPos) -> MapPos {
        self.map.move_dir(building_pos, Direction::DownRight)
    }

    // ---- serf lifecycle ----

    pub fn create_serf(&mut self, owner: u8, kind: SerfType, pos: MapPos) -> SerfId {
        let tick = self.tick;
        let id = self
            .serfs
            .allocate(Serf::new(SerfId(0), owner, kind, pos, tick));
        if let Some(serf) = self.serfs.get_mut(id) {
            serf.id = id;
        }
        if let Some(player) = self.player_mut(owner) {
            player.increase_serf_count(kind);
        }
        id
    }

    /// Remove a serf, clearing its map cell and every reference held by
    /// flags and buildings.
    pub fn delete_serf(&mut self, id: SerfId) {
        let Some(serf) = self.serfs.remove(id) else {
            return;
        };
        log::debug!("serf {}: deleted in state {}", id, serf.state.name());
        self.vacate(serf.pos, id);
        if let StateData::IdleOnPath(_) = serf.data {
            if self.map.idle_serf(serf.pos) {
                self.map.clear_idle_serf(serf.pos);
            }
        }
        for (_, flag) in self.flags.iter_mut() {
            for link in flag.links.iter_mut().flatten() {
                if link.transporter == Some(id) {
                    link.transporter = None;
                }
            }
        }
        for (_, building) in self.buildings.iter_mut() {
            building.remove_knight(id);
            if building.holder == Some(id) {
                building.holder = None;
            }
        }
        if let Some(player) = self.player_mut(serf.owner) {
            player.decrease_serf_count(serf.kind);
        }
    }

    /// Change state through the one path every transition takes.
    pub fn set_serf_state(&mut self, id: SerfId, state: State) -> Result<(), SimError> {
        let serf = self.serf_mut(id)?;
        serf.set_state(state);
        self.after_state_change(id, state);
        Ok(())
    }

    pub fn set_serf_state_with(
        &mut self,
        id: SerfId,
        state: State,
        data: StateData,
    ) -> Result<(), SimError> {
        let serf = self.serf_mut(id)?;
        serf.set_state_with(state, data);
        self.after_state_change(id, state);
        Ok(())
    }

    fn after_state_change(&mut self, id: SerfId, state: State) {
        self.metrics.state_transitions += 1;
        if state.detaches_from_building() {
            for (_, building) in self.buildings.iter_mut() {
                if building.holder == Some(id) {
                    building.holder = None;
                }
            }
        }
    }

    /// Put a serf on a map cell.
    pub fn occupy(&mut self, id: SerfId, pos: MapPos) -> Result<(), SimError> {
        let serf = self.serf_mut(id)?;
        serf.pos = pos;
        self.map.set_serf_index(pos, Some(id));
        Ok(())
    }

    /// Clear a cell if (and only if) it holds `id`.
    pub fn vacate(&mut self, pos: MapPos, id: SerfId) {
        if self.map.is_valid(pos) && self.map.serf_index(pos) == Some(id) {
            self.map.set_serf_index(pos, None);
        }
    }

    /// Step a serf one cell, setting its walking animation and counter.
    /// The target cell must be free.
    pub fn step_serf(&mut self, id: SerfId, dir: Direction) -> Result<MapPos, SimError> {
        let from = self.serf(id)?.pos;
        let to = self.map.move_dir(from, dir);
        if let Some(other) = self.map.serf_index(to).filter(|&other| other != id) {
            return Err(self.unreachable(id, "step_serf", format!("{to} is taken by serf {other}")));
        }
        let h_diff = self.map.height(to) - self.map.height(from);
        self.vacate(from, id);
        self.occupy(id, to)?;
        let serf = self.serf_mut(id)?;
        serf.animation = walking_animation(h_diff, dir.index(), false);
        serf.counter += counter_from_animation(serf.animation);
        log::trace!("serf {}: step {:?} to {}", id, dir, to);
        Ok(to)
    }

    /// Start a pose animation and re-arm the counter with its duration.
    pub fn animate(&mut self, id: SerfId, animation: i32) -> Result<(), SimError> {
        let serf = self.serf_mut(id)?;
        serf.animation = animation;
        serf.counter += counter_from_animation(animation);
        Ok(())
    }

    /// Re-arm the counter so the serf retries on the next tick.
    pub fn wait_one_tick(&mut self, id: SerfId) -> Result<(), SimError> {
        self.serf_mut(id)?.counter = 0;
        Ok(())
    }

    // ---- flag network searches ----

    /// Nearest flag (by road hops, `start` included) whose inventory takes
    /// in serfs.
    #[tracing::instrument(skip_all)]
    pub fn find_nearest_inventory_for_serf(&self, start: FlagId) -> Option<FlagId> {
        let network = FlagNetwork { flags: &self.flags };
        BreadthFirst::find_nearest(&network, start, &(), |f| {
            self.flags
                .get(f)
                .is_some_and(|flag| flag.has_inventory() && flag.accepts_serfs)
        })
        .map(|(flag, _)| flag)
    }

    /// Nearest flag whose inventory accepts resources.
    pub fn find_nearest_inventory_for_resource(&self, start: FlagId) -> Option<FlagId> {
        let network = FlagNetwork { flags: &self.flags };
        BreadthFirst::find_nearest(&network, start, &(), |f| {
            self.flags
                .get(f)
                .is_some_and(|flag| flag.has_inventory() && flag.accepts_resources)
        })
        .map(|(flag, _)| flag)
    }

    /// Outgoing road of `from` that leads towards `dest`.
    ///
    /// The search is seeded with every road neighbour in direction order and
    /// tagged with the road taken; the first seed to reach `dest` wins.
    #[tracing::instrument(skip_all)]
    pub fn find_direction_to(&self, from: FlagId, dest: FlagId) -> Option<Direction> {
        let flag = self.flags.get(from)?;
        let seeds: Vec<(FlagId, Direction)> = Direction::ALL
            .into_iter()
            .filter_map(|d| flag.other_end_flag(d).map(|other| (other, d)))
            .collect();
        let network = FlagNetwork { flags: &self.flags };
        BreadthFirst::find_tagged(&network, &seeds, &[from], &(), |f| f == dest)
            .map(|found| found.tag)
    }

    /// Whether `from` and `to` are connected by roads.
    pub fn flags_connected(&self, from: FlagId, to: FlagId) -> bool {
        let network = FlagNetwork { flags: &self.flags };
        BreadthFirst::find_nearest(&network, from, &(), |f| f == to).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::GameBuilder;

    #[test]
    fn test_create_and_delete_serf_keeps_counts() {
        let mut game = GameBuilder::new().with_player().build();
        let pos = game.map.pos(3, 3);
        let id = game.create_serf(0, SerfType::Generic, pos);
        game.occupy(id, pos).unwrap();
        assert_eq!(game.players[0].serf_count[SerfType::Generic as usize], 1);
        game.delete_serf(id);
        assert!(!game.map.has_serf(pos));
        assert!(game.get_serf(id).is_none());
        assert_eq!(game.players[0].serf_count[SerfType::Generic as usize], 0);
    }

    #[test]
    fn test_step_into_taken_cell_is_refused() {
        let mut game = GameBuilder::new().with_player().build();
        let (a_pos, b_pos) = (game.map.pos(3, 3), game.map.pos(4, 3));
        let a = game.create_serf(0, SerfType::Generic, a_pos);
        game.occupy(a, a_pos).unwrap();
        let b = game.create_serf(0, SerfType::Generic, b_pos);
        game.occupy(b, b_pos).unwrap();

        assert!(matches!(
            game.step_serf(a, Direction::Right),
            Err(SimError::Unreachable { op: "step_serf", .. })
        ));
        assert_eq!(game.map.serf_index(a_pos), Some(a));
        assert_eq!(game.map.serf_index(b_pos), Some(b));
        assert_eq!(game.step_serf(a, Direction::Left), Ok(game.map.pos(2, 3)));
        assert!(!game.map.has_serf(a_pos));
    }

    #[test]
    fn test_detaching_state_clears_holder() {
        let mut builder = GameBuilder::new().with_player();
        let building = builder.building(0, 4, 4, crate::building::BuildingType::Sawmill, true);
        let mut game = builder.build();
        let pos = game.buildings.get(building).unwrap().pos;
        let id = game.create_serf(0, SerfType::Sawmiller, pos);
        game.buildings.get_mut(building).unwrap().holder = Some(id);
        game.set_serf_state(id, State::Sawing).unwrap();
        assert_eq!(game.buildings.get(building).unwrap().holder, Some(id));
        game.set_serf_state(id, State::Lost).unwrap();
        assert_eq!(game.buildings.get(building).unwrap().holder, None);
    }

    #[test]
    fn test_direction_search_prefers_direction_order() {
        // Two equally long routes from A to D: via B (Right) and via C (Down).
        let mut builder = GameBuilder::new().with_player();
        let a = builder.flag(0, 2, 2);
        let b = builder.flag(0, 6, 2);
        let c = builder.flag(0, 2, 6);
        let d = builder.flag(0, 6, 6);
        builder.road(a, &[Direction::Right; 4]);
        builder.road(a, &[Direction::Down; 4]);
        builder.road(b, &[Direction::Down; 4]);
        builder.road(c, &[Direction::Right; 4]);
        let game = builder.build();
        assert_eq!(game.find_direction_to(a, d), Some(Direction::Right));
        assert_eq!(game.find_direction_to(d, a), Some(Direction::Left));
        assert_eq!(game.find_direction_to(a, a), None);
    }
}
