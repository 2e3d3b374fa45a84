//! Off-road walking towards a relative offset.
//!
//! The remaining offset is split into one of twelve sectors (the closest of
//! the six directions, plus which neighbour the target leans towards). Each
//! sector has a fixed order of directions to try. Falling back past the
//! first three switches to edge-following around the obstacle, which is
//! abandoned as soon as the preferred direction opens up again.
//!
//! `FreeWalkingData::flags` layout: bits 0-2 edge heading + 1, bit 3
//! arrived, bits 4-6 blocked direction + 1, bit 7 edge side.

use crate::arena::SerfId;
use crate::error::SimError;
use crate::map::{Direction, MapPos};
use crate::serf::tables::ANIM_STUCK;
use crate::serf::{
    FreeWalkingData, SerfType, State, StateData, WalkingData, DIR1_UNRESOLVED, NEG_DIST_RETURNING,
};
use crate::Game;

const FLAG_EDGE: u8 = 0x07;
const FLAG_ARRIVED: u8 = 0x08;
const FLAG_BLOCKED: u8 = 0x70;
const FLAG_EDGE_RIGHT: u8 = 0x80;

const fn wrap(d: i32) -> u8 {
    (((d % 6) + 6) % 6) as u8
}

const fn build_preferences() -> [[u8; 6]; 12] {
    let mut table = [[0u8; 6]; 12];
    let mut sector = 0;
    while sector < 12 {
        let d = (sector / 2) as i32;
        table[sector] = if sector % 2 == 1 {
            [wrap(d), wrap(d + 1), wrap(d - 1), wrap(d + 2), wrap(d - 2), wrap(d + 3)]
        } else {
            [wrap(d), wrap(d - 1), wrap(d + 1), wrap(d - 2), wrap(d + 2), wrap(d + 3)]
        };
        sector += 1;
    }
    table
}

const fn build_edge(right: bool) -> [[u8; 6]; 6] {
    let mut table = [[0u8; 6]; 6];
    let mut h = 0;
    while h < 6 {
        let d = h as i32;
        table[h] = if right {
            [wrap(d + 1), wrap(d), wrap(d - 1), wrap(d - 2), wrap(d - 3), wrap(d + 2)]
        } else {
            [wrap(d - 1), wrap(d), wrap(d + 1), wrap(d + 2), wrap(d + 3), wrap(d - 2)]
        };
        h += 1;
    }
    table
}

/// Direction order per sector.
pub const FREE_WALK_PREFERENCES: [[u8; 6]; 12] = build_preferences();
/// Edge-following order per heading, obstacle on the left.
pub const FREE_WALK_EDGE_LEFT: [[u8; 6]; 6] = build_edge(false);
/// Edge-following order per heading, obstacle on the right.
pub const FREE_WALK_EDGE_RIGHT: [[u8; 6]; 6] = build_edge(true);

/// Sector of a non-zero offset: `2 * closest + 1` when the target leans
/// clockwise of the closest direction, `2 * closest` otherwise. Ties go to
/// the first direction of the wedge.
pub fn free_walk_sector(dist_col: i32, dist_row: i32) -> usize {
    let (dc, dr) = (dist_col, dist_row);
    // Wedge between directions d and d + 1, with the offset written as
    // x * dir(d) + y * dir(d + 1), x and y both non-negative.
    let (d, x, y) = if dr >= 0 && dc >= dr {
        (0, dc - dr, dr)
    } else if dc >= 0 && dr >= dc {
        (1, dc, dr - dc)
    } else if dc <= 0 && dr >= 0 {
        (2, dr, -dc)
    } else if dr <= 0 && dc <= dr {
        (3, dr - dc, -dr)
    } else if dc <= 0 && dr <= dc {
        (4, -dc, dc - dr)
    } else {
        (5, -dr, dc)
    };
    if x >= y {
        2 * d + 1
    } else {
        2 * ((d + 1) % 6)
    }
}

/// Result of one free-walking attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FreeStep {
    Arrived,
    Moved,
    Blocked,
}

impl Game {
    fn free_cell(&self, pos: MapPos, sailing: bool) -> bool {
        let walkable = if sailing {
            self.map.is_water_shore(pos)
        } else {
            self.map.is_passable(pos)
        };
        walkable && !self.map.has_serf(pos)
    }

    /// Advance a free-walking serf by one cell if it can.
    pub(crate) fn free_walk_step(&mut self, id: SerfId, sailing: bool) -> Result<FreeStep, SimError> {
        let serf = self.serf(id)?;
        let pos = serf.pos;
        let f = *serf.free_walking()?;
        if f.dist_col == 0 && f.dist_row == 0 {
            self.serf_mut(id)?.free_walking_mut()?.flags |= FLAG_ARRIVED;
            return Ok(FreeStep::Arrived);
        }

        let sector = free_walk_sector(f.dist_col, f.dist_row);
        let prefs = FREE_WALK_PREFERENCES[sector];
        let edge = f.flags & FLAG_EDGE;
        let first_free = self.free_cell(self.map.move_dir(pos, dir_of(prefs[0])), sailing);

        let mut flags = f.flags;
        let chosen = if edge != 0 && !first_free {
            let table = if f.flags & FLAG_EDGE_RIGHT != 0 {
                &FREE_WALK_EDGE_RIGHT
            } else {
                &FREE_WALK_EDGE_LEFT
            };
            let heading = (edge - 1) as usize % 6;
            let found = table[heading]
                .iter()
                .copied()
                .find(|&d| self.free_cell(self.map.move_dir(pos, dir_of(d)), sailing));
            if let Some(d) = found {
                flags = (flags & !FLAG_EDGE) | (d + 1);
            }
            found
        } else {
            flags &= !(FLAG_EDGE | FLAG_EDGE_RIGHT);
            let found = prefs
                .iter()
                .position(|&d| self.free_cell(self.map.move_dir(pos, dir_of(d)), sailing));
            if let Some(i) = found {
                if i >= 3 {
                    let side = if sector % 2 == 1 { FLAG_EDGE_RIGHT } else { 0 };
                    flags |= (prefs[i] + 1) | side;
                }
            }
            found.map(|i| prefs[i])
        };

        if let Some(d) = chosen {
            self.serf_mut(id)?.free_walking_mut()?.flags = flags;
            let dir = dir_of(d);
            self.step_serf(id, dir)?;
            self.note_moved(id, dir)?;
            return Ok(FreeStep::Moved);
        }

        for &d in &prefs {
            let dir = dir_of(d);
            let target = self.map.move_dir(pos, dir);
            if let Some(other) = self.map.serf_index(target) {
                let walkable = if sailing {
                    self.map.is_water_shore(target)
                } else {
                    self.map.is_passable(target)
                };
                if walkable && self.serf(other)?.waiting_direction() == Some(dir.reverse().index()) {
                    self.swap_serfs(id, other, dir)?;
                    return Ok(FreeStep::Moved);
                }
            }
        }

        let serf = self.serf_mut(id)?;
        serf.animation = ANIM_STUCK;
        serf.counter = 0;
        let data = serf.free_walking_mut()?;
        data.flags = (data.flags & !FLAG_BLOCKED) | ((prefs[0] + 1) << 4);
        Ok(FreeStep::Blocked)
    }

    /// Drive a free-walking state until its counter is positive again,
    /// calling `arrived` when the target cell is reached.
    pub(crate) fn free_walk(
        &mut self,
        id: SerfId,
        state: State,
        sailing: bool,
        arrived: fn(&mut Game, SerfId) -> Result<(), SimError>,
    ) -> Result<(), SimError> {
        loop {
            let serf = self.serf(id)?;
            if serf.state != state || serf.counter >= 0 {
                return Ok(());
            }
            match self.free_walk_step(id, sailing)? {
                FreeStep::Arrived => {
                    arrived(self, id)?;
                    let serf = self.serf_mut(id)?;
                    if serf.state == state && serf.counter < 0 {
                        serf.counter = 0;
                    }
                }
                FreeStep::Moved => {}
                FreeStep::Blocked => return Ok(()),
            }
        }
    }

    pub(crate) fn handle_free_walking(&mut self, id: SerfId) -> Result<(), SimError> {
        self.free_walk(id, State::FreeWalking, false, Game::free_walking_arrived)
    }

    pub(crate) fn handle_free_sailing(&mut self, id: SerfId) -> Result<(), SimError> {
        self.free_walk(id, State::FreeSailing, true, |game, id| {
            let pos = game.serf(id)?.pos;
            if game.map.is_in_water(pos) {
                game.set_serf_state(id, State::LostSailor)
            } else {
                game.set_lost_state(id)
            }
        })
    }

    pub(crate) fn handle_stonecutter_free_walking(&mut self, id: SerfId) -> Result<(), SimError> {
        self.free_walk(id, State::StoneCutterFreeWalking, false, |game, id| {
            game.set_serf_state(id, State::StoneCutting)?;
            game.start_outdoor_work(id)
        })
    }

    pub(crate) fn handle_looking_for_geo_spot(&mut self, id: SerfId) -> Result<(), SimError> {
        self.free_walk(id, State::LookingForGeoSpot, false, |game, id| {
            game.set_serf_state(id, State::SamplingGeoSpot)?;
            game.start_outdoor_work(id)
        })
    }

    fn free_walking_arrived(&mut self, id: SerfId) -> Result<(), SimError> {
        let serf = self.serf(id)?;
        let (pos, owner, kind) = (serf.pos, serf.owner, serf.kind);
        let f = *serf.free_walking()?;

        if f.neg_dist1 == NEG_DIST_RETURNING && f.neg_dist2 == NEG_DIST_RETURNING {
            let own_flag = self
                .flag_at(pos)
                .is_some_and(|flag| self.flags.get(flag).is_some_and(|f| f.owner == owner));
            if own_flag {
                let data = StateData::Walking(WalkingData {
                    dir1: DIR1_UNRESOLVED,
                    ..WalkingData::default()
                });
                return self.set_serf_state_with(id, State::Walking, data);
            }
            return self.set_lost_state(id);
        }

        if f.neg_dist1 == NEG_DIST_RETURNING {
            return self.return_home(id, f.neg_dist2 != 0);
        }

        let next = match kind {
            SerfType::Lumberjack => State::Logging,
            SerfType::Forester => State::Planting,
            SerfType::Fisher => State::Fishing,
            SerfType::Farmer => State::Farming,
            SerfType::Geologist => State::SamplingGeoSpot,
            _ => return self.set_lost_state(id),
        };
        self.set_serf_state(id, next)?;
        self.start_outdoor_work(id)
    }

    /// Back at the flag after outdoor work: drop the harvest, then walk
    /// back in and plan the next trip.
    fn return_home(&mut self, id: SerfId, carrying: bool) -> Result<(), SimError> {
        let serf = self.serf(id)?;
        let (pos, kind, owner) = (serf.pos, serf.kind, serf.owner);
        let Some(flag) = self.flag_at(pos) else {
            return self.set_lost_state(id);
        };
        if kind == SerfType::Geologist {
            let data = StateData::Walking(WalkingData {
                dir1: DIR1_UNRESOLVED,
                ..WalkingData::default()
            });
            return self.set_serf_state_with(id, State::Walking, data);
        }
        let building_pos = self.map.move_dir(pos, Direction::UpLeft);
        if self.building_at(building_pos).is_none() {
            return self.set_lost_state(id);
        }
        if carrying {
            let Some(res) = kind.harvest() else {
                return Err(self.unreachable(id, "return_home", format!("{kind:?} has no harvest")));
            };
            let dropped = self.flags.get_mut(flag).and_then(|f| f.drop_resource(res, None));
            if dropped.is_none() {
                return self.wait_one_tick(id);
            }
            if let Some(player) = self.player_mut(owner) {
                player.increase_resource_count(res);
            }
            self.serf_mut(id)?.free_walking_mut()?.neg_dist2 = 0;
            self.schedule_slots(flag);
        }
        self.enter_building(id, crate::serf::ENTER_WORKER)
    }

    /// Head back to the start point of a free walk.
    pub(crate) fn start_return_walk(&mut self, id: SerfId, carrying: bool) -> Result<(), SimError> {
        let f = *self.serf(id)?.free_walking()?;
        let data = StateData::FreeWalking(FreeWalkingData {
            dist_col: f.neg_dist1,
            dist_row: f.neg_dist2,
            neg_dist1: NEG_DIST_RETURNING,
            neg_dist2: i32::from(carrying),
            flags: 0,
        });
        self.set_serf_state_with(id, State::FreeWalking, data)
    }
}

fn dir_of(d: u8) -> Direction {
    Direction::ALL[d as usize % 6]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::GameBuilder;
    use proptest::prelude::*;

    /// Steps in direction order, as on the map.
    const STEPS: [(i32, i32); 6] = [(1, 0), (1, 1), (0, 1), (-1, 0), (-1, -1), (0, -1)];

    fn hex_distance(dc: i32, dr: i32) -> i32 {
        if (dc >= 0) == (dr >= 0) {
            dc.abs().max(dr.abs())
        } else {
            dc.abs() + dr.abs()
        }
    }

    proptest! {
        #[test]
        fn prop_first_preference_closes_distance(dc in -40i32..=40, dr in -40i32..=40) {
            prop_assume!(dc != 0 || dr != 0);
            let first = FREE_WALK_PREFERENCES[free_walk_sector(dc, dr)][0] as usize;
            let (sc, sr) = STEPS[first];
            prop_assert_eq!(hex_distance(dc - sc, dr - sr), hex_distance(dc, dr) - 1);
        }
    }

    #[test]
    fn test_sectors_pick_closest_direction() {
        assert_eq!(free_walk_sector(3, 0), 1);
        assert_eq!(free_walk_sector(2, -1), 0);
        assert_eq!(free_walk_sector(0, 3), 4);
        assert_eq!(free_walk_sector(-1, 2), 5);
        assert_eq!(free_walk_sector(-3, -1), 7);
        assert_eq!(free_walk_sector(-1, -3), 10);
        for sector in 0..12 {
            assert_eq!(FREE_WALK_PREFERENCES[sector][0] as usize, sector / 2);
        }
    }

    #[test]
    fn test_preference_rows_are_permutations() {
        for row in FREE_WALK_PREFERENCES.iter().chain(&FREE_WALK_EDGE_LEFT).chain(&FREE_WALK_EDGE_RIGHT) {
            let mut seen = [false; 6];
            for &d in row {
                seen[d as usize] = true;
            }
            assert!(seen.iter().all(|&s| s), "{row:?}");
        }
    }

    #[test]
    fn test_free_walk_reaches_offset() {
        let mut builder = GameBuilder::new().with_player();
        let start = builder.pos(10, 10);
        let serf = builder.free_walker(start, SerfType::Generic, State::FreeWalking, (4, -3));
        let mut game = builder.build();
        let target = game.map.move_by(start, 4, -3);
        for _ in 0..4000 {
            game.update().unwrap();
            if game.get_serf(serf).unwrap().state != State::FreeWalking {
                break;
            }
        }
        // Nothing to do at the target: the serf ends up lost right there.
        let s = game.get_serf(serf).unwrap();
        assert_eq!(s.state, State::Lost);
        assert_eq!(s.pos, target);
    }

    #[test]
    fn test_free_walk_goes_around_obstacle() {
        let mut builder = GameBuilder::new().with_player();
        let start = builder.pos(10, 10);
        for row in 10..=11 {
            let p = builder.pos(12, row);
            builder.tree(p);
        }
        let serf = builder.free_walker(start, SerfType::Generic, State::FreeWalking, (4, 0));
        let mut game = builder.build();
        let target = game.map.move_by(start, 4, 0);
        for _ in 0..8000 {
            game.update().unwrap();
            if game.get_serf(serf).unwrap().pos == target {
                break;
            }
        }
        assert_eq!(game.get_serf(serf).unwrap().pos, target);
    }

    #[test]
    fn test_blocked_walker_records_direction() {
        let mut builder = GameBuilder::new().with_player();
        let start = builder.pos(10, 10);
        for d in Direction::ALL {
            let p = builder.step(start, d);
            builder.tree(p);
        }
        let serf = builder.free_walker(start, SerfType::Generic, State::FreeWalking, (3, 0));
        let mut game = builder.build();
        game.update().unwrap();
        let s = game.get_serf(serf).unwrap();
        assert_eq!(s.pos, start);
        assert_eq!(s.waiting_direction(), Some(Direction::Right.index()));
    }
}
