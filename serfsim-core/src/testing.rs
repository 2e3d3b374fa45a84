//! Small hand-built worlds for tests.
//!
//! The builder panics on impossible setups (a flag on a tree, a road that
//! does not end at a flag); test code wants to fail loudly there.

use crate::arena::{BuildingId, FlagId, InventoryId, SerfId};
use crate::building::BuildingType;
use crate::config::SimConfig;
use crate::flag::RoadLink;
use crate::map::{Direction, Map, MapObject, MapPos};
use crate::rng::GameRng;
use crate::serf::{
    FreeWalkingData, IdleInStockData, SerfType, State, StateData, WalkingData, DIR1_UNRESOLVED,
};
use crate::Game;
use rand::SeedableRng;

/// 64 × 64 flat grass.
const TEST_MAP_SHIFT: u32 = 6;

pub struct GameBuilder {
    game: Game,
}

impl GameBuilder {
    pub fn new() -> Self {
        Self {
            game: Game::new(
                Map::new(TEST_MAP_SHIFT, TEST_MAP_SHIFT),
                SimConfig::default(),
                0,
            ),
        }
    }

    pub fn with_player(mut self) -> Self {
        self.game.add_player();
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.game.rng = GameRng::seed_from_u64(seed);
        self
    }

    pub fn config(mut self, config: SimConfig) -> Self {
        self.game.config = config;
        self
    }

    pub fn pos(&self, col: i32, row: i32) -> MapPos {
        self.game.map.pos(col, row)
    }

    pub fn step(&self, pos: MapPos, dir: Direction) -> MapPos {
        self.game.map.move_dir(pos, dir)
    }

    pub fn height(&mut self, pos: MapPos, height: i32) -> &mut Self {
        self.game.map.set_height(pos, height);
        self
    }

    pub fn tree(&mut self, pos: MapPos) -> &mut Self {
        self.game.map.set_object(pos, MapObject::Tree(0), 0);
        self
    }

    pub fn flag(&mut self, owner: u8, col: i32, row: i32) -> FlagId {
        let pos = self.pos(col, row);
        self.game
            .build_flag(owner, pos)
            .unwrap_or_else(|| panic!("no room for a flag at ({col}, {row})"))
    }

    pub fn road(&mut self, start: FlagId, dirs: &[Direction]) -> FlagId {
        self.game
            .build_road(start, dirs)
            .unwrap_or_else(|| panic!("road from {start} {dirs:?} does not end at a flag"))
    }

    /// Finished castle with an empty inventory and its inventory carrier.
    pub fn castle(&mut self, owner: u8, col: i32, row: i32) -> (BuildingId, InventoryId) {
        let pos = self.pos(col, row);
        let (castle, inventory) = self
            .game
            .found_colony(owner, pos)
            .unwrap_or_else(|| panic!("no room for a castle at ({col}, {row})"));
        let builder = self.game.get_building(castle).and_then(|b| b.holder);
        if let Some(b) = self.game.buildings.get_mut(castle) {
            b.progress = crate::building::BUILD_DONE;
            b.holder = None;
            b.active = true;
        }
        if let Some(builder) = builder {
            let data = StateData::IdleInStock(IdleInStockData {
                inventory: Some(inventory),
            });
            self.game
                .set_serf_state_with(builder, State::IdleInStock, data)
                .expect("castle builder exists");
        }
        (castle, inventory)
    }

    pub fn building_flag(&self, building: BuildingId) -> FlagId {
        self.game
            .get_building(building)
            .map(|b| b.flag)
            .expect("building exists")
    }

    /// Place a building with its flag. `done` skips construction.
    pub fn building(
        &mut self,
        owner: u8,
        col: i32,
        row: i32,
        kind: BuildingType,
        done: bool,
    ) -> BuildingId {
        let pos = self.pos(col, row);
        let id = self
            .game
            .build_building(owner, pos, kind)
            .unwrap_or_else(|| panic!("no room for {kind:?} at ({col}, {row})"));
        if done {
            if let Some(b) = self.game.buildings.get_mut(id) {
                b.leveling = false;
                b.finish();
            }
        }
        id
    }

    /// A serf inside `building` in `state`; anyone but a knight becomes its
    /// holder. Work states get the payload the building would give them.
    pub fn worker(&mut self, building: BuildingId, kind: SerfType, state: State) -> SerfId {
        let b = self.game.get_building(building).expect("building exists");
        let (owner, pos, btype) = (b.owner, b.pos, b.kind);
        let id = self.game.create_serf(owner, kind, pos);
        let data = crate::systems::buildings::work_payload(state, btype);
        self.game
            .set_serf_state_with(id, state, data)
            .expect("serf exists");
        if let Some(b) = self.game.buildings.get_mut(building).filter(|_| !kind.is_knight()) {
            b.holder = Some(id);
            b.active = true;
        }
        id
    }

    /// A knight stationed in a finished military building.
    pub fn garrison(&mut self, building: BuildingId, kind: SerfType) -> SerfId {
        let b = self.game.get_building(building).expect("building exists");
        let (owner, pos, btype) = (b.owner, b.pos, b.kind);
        let state = btype.defending_state().expect("military building");
        let id = self.game.create_serf(owner, kind, pos);
        self.game
            .set_serf_state_with(id, state, StateData::Defending)
            .expect("serf exists");
        if let Some(b) = self.game.buildings.get_mut(building) {
            b.knight_occupy(id);
        }
        id
    }

    /// A serf standing on (and occupying) `pos`.
    pub fn serf_at(&mut self, pos: MapPos, kind: SerfType, state: State) -> SerfId {
        let id = self.serf_inside(pos, kind, state);
        self.game.occupy(id, pos).expect("serf exists");
        id
    }

    /// A serf at `pos` that does not occupy the cell, as inside a building.
    pub fn serf_inside(&mut self, pos: MapPos, kind: SerfType, state: State) -> SerfId {
        let id = self.game.create_serf(0, kind, pos);
        self.game.set_serf_state(id, state).expect("serf exists");
        id
    }

    /// A `Walking` serf standing on `flag`.
    pub fn walker(
        &mut self,
        flag: FlagId,
        kind: SerfType,
        dir1: i32,
        dest: Option<FlagId>,
    ) -> SerfId {
        let f = self.game.get_flag(flag).expect("flag exists");
        let (owner, pos) = (f.owner, f.pos);
        let id = self.game.create_serf(owner, kind, pos);
        let data = StateData::Walking(WalkingData {
            dir1,
            dest,
            ..WalkingData::default()
        });
        self.game
            .set_serf_state_with(id, State::Walking, data)
            .expect("serf exists");
        self.game.occupy(id, pos).expect("serf exists");
        id
    }

    /// A generic serf on a road cell with raw walking direction `dir`.
    pub fn road_serf(&mut self, pos: MapPos, state: State, dir: i32) -> SerfId {
        let id = self.serf_at(pos, SerfType::Generic, state);
        let data = StateData::Walking(WalkingData {
            dir1: DIR1_UNRESOLVED,
            dir,
            ..WalkingData::default()
        });
        self.game
            .set_serf_state_with(id, state, data)
            .expect("serf exists");
        id
    }

    /// A transporter standing on `flag`, serving its road `dir`.
    pub fn transporter(&mut self, flag: FlagId, dir: Direction) -> SerfId {
        let f = self.game.get_flag(flag).expect("flag exists");
        let (owner, pos) = (f.owner, f.pos);
        let link: RoadLink = *f.link(dir).expect("road exists");
        let id = self.game.create_serf(owner, SerfType::Transporter, pos);
        for (end, d) in [(flag, dir), (link.other, link.other_dir)] {
            if let Some(l) = self.game.flags.get_mut(end).and_then(|f| f.link_mut(d)) {
                l.transporter = Some(id);
            }
        }
        let data = StateData::Walking(WalkingData {
            dir1: dir.index() as i32,
            dir: dir.index() as i32,
            ..WalkingData::default()
        });
        self.game
            .set_serf_state_with(id, State::Transporting, data)
            .expect("serf exists");
        self.game.occupy(id, pos).expect("serf exists");
        id
    }

    /// A free walker at `pos` heading `dist` away, with the way back saved.
    pub fn free_walker(
        &mut self,
        pos: MapPos,
        kind: SerfType,
        state: State,
        (dist_col, dist_row): (i32, i32),
    ) -> SerfId {
        let id = self.serf_at(pos, kind, State::Null);
        let data = StateData::FreeWalking(FreeWalkingData {
            dist_col,
            dist_row,
            neg_dist1: -dist_col,
            neg_dist2: -dist_row,
            flags: 0,
        });
        self.game
            .set_serf_state_with(id, state, data)
            .expect("serf exists");
        id
    }

    pub fn build(self) -> Game {
        self.game
    }
}

impl Default for GameBuilder {
    fn default() -> Self {
        Self::new()
    }
}
