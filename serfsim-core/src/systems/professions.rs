//! Outdoor professions: planning a trip from inside the building, working
//! the spot, and the geologist's sampling tour.

use crate::arena::SerfId;
use crate::error::SimError;
use crate::map::{Direction, GroundDeposit, MapObject, MapPos};
use crate::player::NotificationKind;
use crate::serf::tables::*;
use crate::serf::{FreeWalkingData, State, StateData};
use crate::Game;

/// Spiral positions searched when planning a trip.
const PLANNING_RANGE: u16 = 91;
/// Random cells tried per planning attempt.
const PLANNING_TRIES: usize = 8;
/// Ticks a worker rests inside after a fruitless search.
const PLANNING_REST: i32 = 1024;
/// Geologist hop, in cells along each axis.
const GEO_HOP: u16 = 9;
/// Deposit amount that earns a large sign.
const LARGE_DEPOSIT: u8 = 12;

/// Ticks each outdoor job takes once the serf is on the spot.
fn work_timing(state: State) -> Option<(i32, i32)> {
    Some(match state {
        State::Logging => (ANIM_CHOPPING, 1024),
        State::Planting => (ANIM_PLANTING, 512),
        State::StoneCutting => (ANIM_STONECUTTING, 1024),
        State::Fishing => (ANIM_FISHING, 768),
        State::Farming => (ANIM_FARMING, 768),
        State::SamplingGeoSpot => (ANIM_SAMPLING, 512),
        _ => return None,
    })
}

impl Game {
    /// Pick a spot for the next trip, or rest when nothing is in reach.
    #[tracing::instrument(skip_all)]
    pub(crate) fn handle_planning(&mut self, id: SerfId) -> Result<(), SimError> {
        let serf = self.serf(id)?;
        if serf.counter >= 0 {
            return Ok(());
        }
        let (state, pos) = (serf.state, serf.pos);
        let flag_pos = self.flag_pos_of(pos);

        let mut spot = None;
        for _ in 0..PLANNING_TRIES {
            let n = 1 + (self.random_int() % PLANNING_RANGE) as usize;
            let cell = self.map.position_add_spirally(pos, n);
            if let Some(stand) = self.work_spot(state, cell) {
                if stand != flag_pos && self.map.is_passable(stand) {
                    spot = Some(stand);
                    break;
                }
            }
        }

        let Some(stand) = spot else {
            log::trace!("serf {}: nothing to do, resting", id);
            self.serf_mut(id)?.counter += PLANNING_REST;
            return Ok(());
        };
        let next = if state == State::PlanningStoneCutting {
            State::StoneCutterFreeWalking
        } else {
            State::FreeWalking
        };
        let (dc, dr) = self.map.dist(flag_pos, stand);
        log::debug!("serf {}: heading out to {} ({}, {})", id, stand, dc, dr);
        self.leave_building(id, next, 0, dc, dr)
    }

    /// Where to stand to work `cell`, if it suits the planning state.
    fn work_spot(&self, state: State, cell: MapPos) -> Option<MapPos> {
        let object = self.map.object(cell);
        match state {
            State::PlanningLogging if matches!(object, MapObject::Tree(_)) => {
                Some(self.map.move_dir(cell, Direction::Down))
            }
            State::PlanningStoneCutting if matches!(object, MapObject::Stone(_)) => {
                Some(self.map.move_dir(cell, Direction::Down))
            }
            State::PlanningPlanting if self.plantable(cell) => Some(cell),
            State::PlanningFishing
                if self.map.is_water_shore(cell) && !self.map.is_in_water(cell) =>
            {
                Some(cell)
            }
            State::PlanningFarming
                if matches!(object, MapObject::Field(_)) || self.plantable(cell) =>
            {
                Some(cell)
            }
            _ => None,
        }
    }

    fn plantable(&self, pos: MapPos) -> bool {
        self.map.object(pos) == MapObject::None
            && self.map.paths(pos) == 0
            && !self.map.is_water_shore(pos)
    }

    /// Arm the timing of the job a serf just arrived for.
    pub(crate) fn start_outdoor_work(&mut self, id: SerfId) -> Result<(), SimError> {
        let state = self.serf(id)?.state;
        let Some((animation, ticks)) = work_timing(state) else {
            return Err(self.unreachable(id, "start_outdoor_work", format!("no outdoor work in {state:?}")));
        };
        let serf = self.serf_mut(id)?;
        serf.animation = animation;
        serf.counter = serf.counter.max(0) + ticks;
        Ok(())
    }

    /// Finish the job at the current spot and head back.
    #[tracing::instrument(skip_all)]
    pub(crate) fn handle_outdoor_work(&mut self, id: SerfId) -> Result<(), SimError> {
        let serf = self.serf(id)?;
        if serf.counter >= 0 {
            return Ok(());
        }
        let (state, pos, owner) = (serf.state, serf.pos, serf.owner);
        let carrying = match state {
            State::Logging => {
                let tree = self.map.move_dir(pos, Direction::Up);
                match self.map.object(tree) {
                    MapObject::Tree(_) => {
                        self.map.set_object(tree, MapObject::FelledTree, 0);
                        true
                    }
                    _ => false,
                }
            }
            State::Planting => {
                if self.plantable(pos) {
                    self.map.set_object(pos, MapObject::NewTree, 0);
                }
                false
            }
            State::StoneCutting => {
                let stone = self.map.move_dir(pos, Direction::Up);
                match self.map.object(stone) {
                    MapObject::Stone(0) => {
                        self.map.set_object(stone, MapObject::None, 0);
                        true
                    }
                    MapObject::Stone(n) => {
                        self.map.set_object(stone, MapObject::Stone(n - 1), 0);
                        true
                    }
                    _ => false,
                }
            }
            State::Fishing => self.try_fishing(pos),
            State::Farming => match self.map.object(pos) {
                MapObject::Field(0) => {
                    self.map.set_object(pos, MapObject::FieldExpired, 0);
                    true
                }
                MapObject::Field(n) => {
                    self.map.set_object(pos, MapObject::Field(n - 1), 0);
                    true
                }
                _ => {
                    if self.plantable(pos) {
                        self.map.set_object(pos, MapObject::Seeds(0), 0);
                    }
                    false
                }
            },
            State::SamplingGeoSpot => return self.sample_geo_spot(id, pos, owner),
            other => {
                return Err(self.unreachable(id, "handle_outdoor_work", format!("{other:?}")));
            }
        };
        self.start_return_walk(id, carrying)
    }

    fn try_fishing(&mut self, pos: MapPos) -> bool {
        let water = Direction::ALL
            .into_iter()
            .map(|d| self.map.move_dir(pos, d))
            .find(|&p| {
                self.map.is_in_water(p)
                    && self.map.deposit(p) == GroundDeposit::Fish
                    && self.map.deposit_amount(p) > 0
            });
        match water {
            Some(p) if self.random_int() & 3 != 0 => {
                self.map.remove_ground_deposit(p, 1);
                true
            }
            _ => false,
        }
    }

    fn sample_geo_spot(&mut self, id: SerfId, pos: MapPos, owner: u8) -> Result<(), SimError> {
        if self.map.object(pos) == MapObject::None && !self.map.has_flag(pos) {
            let deposit = self.map.deposit(pos);
            let amount = self.map.deposit_amount(pos);
            let found = match deposit {
                GroundDeposit::Gold => Some(NotificationKind::FoundGold),
                GroundDeposit::Iron => Some(NotificationKind::FoundIron),
                GroundDeposit::Coal => Some(NotificationKind::FoundCoal),
                GroundDeposit::Stone => Some(NotificationKind::FoundStone),
                GroundDeposit::None | GroundDeposit::Fish => None,
            };
            match found {
                Some(kind) => {
                    let sign = MapObject::Sign {
                        deposit,
                        large: amount >= LARGE_DEPOSIT,
                    };
                    self.map.set_object(pos, sign, 0);
                    let tick = self.game_time;
                    if let Some(player) = self.player_mut(owner) {
                        player.add_notification(kind, pos, tick);
                    }
                    log::debug!("serf {}: found {:?} at {}", id, deposit, pos);
                }
                None => self.map.set_object(pos, MapObject::SignEmpty, 0),
            }
        }

        let samples = self.config.geologist_samples.max(1) as u16;
        if self.random_int() % samples == 0 {
            return self.start_return_walk(id, false);
        }
        let (dc, dr) = self.geo_hop();
        let f = *self.serf(id)?.free_walking()?;
        let data = StateData::FreeWalking(FreeWalkingData {
            dist_col: dc,
            dist_row: dr,
            neg_dist1: f.neg_dist1 - dc,
            neg_dist2: f.neg_dist2 - dr,
            flags: 0,
        });
        self.set_serf_state_with(id, State::LookingForGeoSpot, data)
    }

    fn geo_hop(&mut self) -> (i32, i32) {
        let half = (GEO_HOP / 2) as i32;
        loop {
            let dc = (self.random_int() % GEO_HOP) as i32 - half;
            let dr = (self.random_int() % GEO_HOP) as i32 - half;
            if (dc, dr) != (0, 0) {
                return (dc, dr);
            }
        }
    }

    /// Geologist sent to a flag: start sampling around it.
    pub(crate) fn start_geologist(&mut self, id: SerfId) -> Result<(), SimError> {
        let (dc, dr) = self.geo_hop();
        let data = StateData::FreeWalking(FreeWalkingData {
            dist_col: dc,
            dist_row: dr,
            neg_dist1: -dc,
            neg_dist2: -dr,
            flags: 0,
        });
        self.set_serf_state_with(id, State::LookingForGeoSpot, data)?;
        self.wait_one_tick(id)
    }

    /// Advance trees and fields by one growth step.
    pub fn grow_objects(&mut self) {
        for pos in 0..self.map.size() as MapPos {
            let next = match self.map.object(pos) {
                MapObject::NewTree if self.random_int() & 3 == 0 => {
                    MapObject::Tree((self.random_int() & 7) as u8)
                }
                MapObject::Seeds(n) if n < 5 => MapObject::Seeds(n + 1),
                MapObject::Seeds(_) => MapObject::Field(5),
                MapObject::FelledTree => MapObject::Stub,
                MapObject::Stub | MapObject::FieldExpired if self.random_int() & 7 == 0 => {
                    MapObject::None
                }
                _ => continue,
            };
            self.map.set_object(pos, next, 0);
        }
    }
}
