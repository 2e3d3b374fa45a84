//! Knights: garrisons, attacks on buildings and fights in the open.
//!
//! A fight always has an attacker and a defender, and only the attacker's
//! handler advances it. The defender sits in a passive state while the
//! attacker sets both sides' animations and counters each round.

use crate::arena::{raw_index, BuildingId, SerfId};
use crate::building::BuildingType;
use crate::error::SimError;
use crate::map::{Direction, MapPos};
use crate::player::NotificationKind;
use crate::serf::tables::*;
use crate::serf::{
    AttackingData, AttackingVictoryFreeData, DefendingFreeData, FreeWalkingData,
    LeaveForWalkToFightData, LeavingBuildingData, SerfType, State, StateData, WalkingData,
    DIR1_UNRESOLVED, ENTER_INVENTORY, ENTER_KNIGHT,
};
use crate::Game;

/// Morale on land the knight's own player holds.
const HOME_LAND_FACTOR: u32 = 0x1000;
/// Hex distance within which buildings can send knights to an attack.
const ATTACK_RANGE: i32 = 16;
/// Spiral entries that change hands with a captured building.
const CAPTURE_TERRITORY: usize = 19;

/// Fighting strength of a knight of `rank` on land worth `land_factor`.
pub fn knight_morale(rank: u32, land_factor: u32) -> u32 {
    let exp_factor = 1u32 << rank.min(4);
    (0x400 * exp_factor * land_factor) >> 16
}

/// Decide a fight from one 16-bit draw. The attacker wins only when the
/// weighted draw falls below its own morale.
pub fn attacker_wins(morale_attacker: u32, morale_defender: u32, draw: u16) -> bool {
    let result = ((morale_attacker + morale_defender) * u32::from(draw)) >> 16;
    result < morale_attacker
}

fn hex_distance((dc, dr): (i32, i32)) -> i32 {
    if dc.signum() * dr.signum() >= 0 {
        dc.abs().max(dr.abs())
    } else {
        dc.abs() + dr.abs()
    }
}

impl Game {
    fn morale_of(&self, id: SerfId) -> Result<u32, SimError> {
        let serf = self.serf(id)?;
        let rank = serf.kind.knight_rank().unwrap_or(0);
        let land = if self.map.owner(serf.pos) == Some(serf.owner) {
            HOME_LAND_FACTOR
        } else {
            self.players
                .get(serf.owner as usize)
                .map_or(self.config.default_knight_morale, |p| p.knight_morale)
        };
        Ok(knight_morale(rank, land))
    }

    /// Roll the outcome of a fight between `attacker` and `defender`.
    pub fn fight_outcome(&mut self, attacker: SerfId, defender: SerfId) -> Result<bool, SimError> {
        let ma = self.morale_of(attacker)?;
        let md = self.morale_of(defender)?;
        let won = attacker_wins(ma, md, self.random_int());
        log::debug!(
            "fight {} ({}) vs {} ({}): {} wins",
            attacker,
            ma,
            defender,
            md,
            if won { attacker } else { defender }
        );
        self.metrics.fights += 1;
        Ok(won)
    }

    /// Mark a serf dead. It lies where it fell until `defeat_delay` runs out.
    pub(crate) fn kill_serf(&mut self, id: SerfId) -> Result<(), SimError> {
        let delay = self.config.defeat_delay;
        let serf = self.serf(id)?;
        let (owner, kind, pos) = (serf.owner, serf.kind, serf.pos);
        let tick = self.game_time;
        if let Some(player) = self.player_mut(owner) {
            player.decrease_serf_count(kind);
            player.increase_serf_count(SerfType::Dead);
            player.add_notification(NotificationKind::LostFight, pos, tick);
        }
        for (_, b) in self.buildings.iter_mut() {
            b.remove_knight(id);
        }
        self.vacate(pos, id);
        self.set_serf_state(id, State::Null)?;
        let serf = self.serf_mut(id)?;
        serf.kind = SerfType::Dead;
        serf.animation = ANIM_DYING;
        serf.counter = delay;
        log::debug!("serf {}: killed at {}", id, pos);
        Ok(())
    }

    pub(crate) fn handle_dead(&mut self, id: SerfId) -> Result<(), SimError> {
        if self.serf(id)?.counter < 0 {
            self.delete_serf(id);
        }
        Ok(())
    }

    fn notify_victory(&mut self, winner: SerfId) -> Result<(), SimError> {
        let serf = self.serf(winner)?;
        let (owner, pos) = (serf.owner, serf.pos);
        let tick = self.game_time;
        if let Some(player) = self.player_mut(owner) {
            player.add_notification(NotificationKind::VictoryFight, pos, tick);
        }
        Ok(())
    }

    /// Play one round of a fight. Returns `true` once the move table runs
    /// out and the outcome must be applied.
    fn fight_round(&mut self, attacker: SerfId, defender: SerfId) -> Result<bool, SimError> {
        let data = *self.serf(attacker)?.attacking()?;
        let row = (data.move_index as usize) % KNIGHT_ATTACK_MOVES.len();
        let at = data.field_d as usize;
        let code = KNIGHT_ATTACK_MOVES[row].get(at).copied().unwrap_or(-1);
        if code < 0 {
            return Ok(true);
        }
        let anim_row = if data.attacker_won != 0 {
            code as usize
        } else {
            (code as usize ^ 1) % KNIGHT_FIGHT_ANIM.len()
        };
        let pick = self.random_int() as usize % KNIGHT_FIGHT_ANIM_MAX[anim_row] as usize;
        let pair = KNIGHT_FIGHT_ANIM[anim_row][pick];

        let a = self.serf_mut(attacker)?;
        a.animation = ANIM_FIGHT_ATTACKER + i32::from(pair >> 4);
        a.counter += counter_from_animation(a.animation);
        a.attacking_mut()?.field_d += 1;
        let counter = a.counter;
        let d = self.serf_mut(defender)?;
        d.animation = ANIM_FIGHT_DEFENDER + i32::from(pair & 0xf);
        d.counter = counter;
        Ok(false)
    }

    fn start_fight(&mut self, attacker: SerfId, defender: SerfId) -> Result<AttackingData, SimError> {
        let won = self.fight_outcome(attacker, defender)?;
        let row = (self.random_int() & 7) as i32;
        Ok(AttackingData {
            move_index: row,
            attacker_won: u8::from(won),
            field_d: 0,
            defender: Some(defender),
        })
    }

    // ---- garrison ----

    /// Knight reached the inside of a military building.
    pub(crate) fn knight_enter_building(&mut self, id: SerfId, building: BuildingId) -> Result<(), SimError> {
        let owner = self.serf(id)?.owner;
        let Some(b) = self.buildings.get_mut(building) else {
            return self.set_lost_state(id);
        };
        let Some(state) = b.kind.defending_state().filter(|_| b.owner == owner && b.is_done()) else {
            return self.leave_building(id, State::Walking, DIR1_UNRESOLVED, 0, 0);
        };
        if !b.has_knight_space() {
            b.requested_knight_defeat_on_walk();
            return self.leave_building(id, State::Walking, DIR1_UNRESOLVED, 0, 0);
        }
        if b.knights_requested > 0 {
            b.requested_knight_arrived(id);
        } else {
            b.knight_occupy(id);
        }
        log::debug!("serf {}: stationed in {} ({:?})", id, building, b.kind);
        self.set_serf_state_with(id, state, StateData::Defending)?;
        self.wait_one_tick(id)
    }

    /// Stationed knights and defenders the attacker is driving just idle.
    pub(crate) fn handle_knight_idle(&mut self, id: SerfId) -> Result<(), SimError> {
        let serf = self.serf_mut(id)?;
        if serf.counter < 0 {
            serf.counter = 0;
        }
        Ok(())
    }

    /// Send up to `max_knights` knights from `player`'s garrisons in range
    /// against `target`. Returns how many set out.
    ///
    /// A garrison listing a knight that no longer exists is an error; the
    /// knight id goes back to its queue first.
    pub fn start_attack(
        &mut self,
        player: u8,
        target: BuildingId,
        max_knights: usize,
    ) -> Result<usize, SimError> {
        let Some(t) = self.buildings.get(target) else {
            return Ok(0);
        };
        if t.owner == player || !t.kind.is_military() || !t.is_done() {
            return Ok(0);
        }
        let (target_pos, target_flag_pos) = (t.pos, self.flag_pos_of(t.pos));
        let garrisons: Vec<(BuildingId, MapPos)> = self
            .buildings
            .iter()
            .filter(|(_, b)| b.owner == player && b.kind.is_military() && b.is_done())
            .filter(|(_, b)| hex_distance(self.map.dist(b.pos, target_pos)) <= ATTACK_RANGE)
            .map(|(id, b)| (id, b.pos))
            .collect();

        let mut sent = 0;
        for (building, pos) in garrisons {
            let (dc, dr) = self.map.dist(self.flag_pos_of(pos), target_flag_pos);
            while sent < max_knights {
                let Some(knight) = self.buildings.get_mut(building).and_then(|b| b.call_attacker_out()) else {
                    break;
                };
                let data = StateData::LeavingBuilding(LeavingBuildingData {
                    field_b: raw_index(Some(target)) as i32,
                    dest: dc,
                    dest2: dr,
                    dir: 0,
                    next_state: State::KnightLeaveForWalkToFight,
                });
                if let Err(err) = self.set_serf_state_with(knight, State::KnightLeaveForFight, data) {
                    if let Some(b) = self.buildings.get_mut(building) {
                        b.knights.push_back(knight);
                    }
                    return Err(err);
                }
                self.wait_one_tick(knight)?;
                sent += 1;
            }
        }
        if sent > 0 {
            log::info!("player {} attacks {} with {} knights", player, target, sent);
            let (owner, tick) = (self.buildings.get(target).map(|b| b.owner), self.game_time);
            if let Some(p) = owner.and_then(|o| self.player_mut(o)) {
                p.add_notification(NotificationKind::UnderAttack, target_pos, tick);
            }
        }
        Ok(sent)
    }

    pub(crate) fn handle_knight_leave_for_fight(&mut self, id: SerfId) -> Result<(), SimError> {
        let serf = self.serf(id)?;
        if serf.counter >= 0 {
            return Ok(());
        }
        let leave = *serf.leaving_building()?;
        if !self.step_out_to_flag(id)? {
            return Ok(());
        }
        let data = StateData::LeaveForWalkToFight(LeaveForWalkToFightData {
            dist_col: leave.dest,
            dist_row: leave.dest2,
            field_d: 0,
            field_e: leave.field_b,
            next_state: State::KnightFreeWalking,
        });
        self.set_serf_state_with(id, State::KnightLeaveForWalkToFight, data)
    }

    pub(crate) fn handle_knight_leave_for_walk_to_fight(&mut self, id: SerfId) -> Result<(), SimError> {
        let serf = self.serf(id)?;
        if serf.counter >= 0 {
            return Ok(());
        }
        let leave = *serf.leave_for_walk_to_fight()?;
        let data = StateData::FreeWalking(FreeWalkingData {
            dist_col: leave.dist_col,
            dist_row: leave.dist_row,
            neg_dist1: -leave.dist_col,
            neg_dist2: -leave.dist_row,
            flags: 0,
        });
        self.set_serf_state_with(id, leave.next_state, data)?;
        self.wait_one_tick(id)
    }

    // ---- roaming knights ----

    /// Enemy knight on a walkable cell next to `pos` that can be engaged.
    fn find_enemy_knight(&self, id: SerfId, pos: MapPos, owner: u8) -> Option<(SerfId, Direction)> {
        Direction::ALL.into_iter().find_map(|d| {
            let cell = self.map.move_dir(pos, d);
            if !self.map.is_passable(cell) {
                return None;
            }
            let other = self.map.serf_index(cell)?;
            let serf = self.serfs.get(other)?;
            let roaming = matches!(serf.state, State::KnightFreeWalking | State::KnightLeaveForWalkToFight);
            (other != id && serf.owner != owner && serf.kind.is_knight() && roaming).then_some((other, d))
        })
    }

    #[tracing::instrument(skip_all)]
    pub(crate) fn handle_knight_free_walking(&mut self, id: SerfId) -> Result<(), SimError> {
        loop {
            let serf = self.serf(id)?;
            if serf.state != State::KnightFreeWalking || serf.counter >= 0 {
                return Ok(());
            }
            let (pos, owner) = (serf.pos, serf.owner);
            if let Some((enemy, dir)) = self.find_enemy_knight(id, pos, owner) {
                return self.engage_free(id, enemy, dir);
            }
            match self.free_walk_step(id, false)? {
                crate::systems::free_walking::FreeStep::Arrived => return self.knight_arrived(id),
                crate::systems::free_walking::FreeStep::Moved => {}
                crate::systems::free_walking::FreeStep::Blocked => return Ok(()),
            }
        }
    }

    /// Attacking knight reached the flag of its target.
    fn knight_arrived(&mut self, id: SerfId) -> Result<(), SimError> {
        let serf = self.serf(id)?;
        let (pos, owner) = (serf.pos, serf.owner);
        let building = self
            .building_at(self.map.move_dir(pos, Direction::UpLeft))
            .filter(|_| self.flag_at(pos).is_some());
        match building.and_then(|b| self.buildings.get(b)) {
            Some(b) if b.kind.is_military() && b.is_done() => {
                let next = if b.owner != owner {
                    State::KnightEngagingBuilding
                } else {
                    State::KnightOccupyEnemyBuilding
                };
                self.set_serf_state_with(id, next, StateData::Attacking(AttackingData::default()))?;
                self.wait_one_tick(id)
            }
            _ => self.knight_go_home(id),
        }
    }

    fn knight_go_home(&mut self, id: SerfId) -> Result<(), SimError> {
        let serf = self.serf(id)?;
        let own_flag = self
            .flag_at(serf.pos)
            .and_then(|f| self.flags.get(f))
            .is_some_and(|f| f.owner == serf.owner);
        if own_flag {
            let data = StateData::Walking(WalkingData {
                dir1: DIR1_UNRESOLVED,
                ..WalkingData::default()
            });
            self.set_serf_state_with(id, State::Walking, data)?;
            return self.wait_one_tick(id);
        }
        self.set_lost_state(id)
    }

    fn engage_free(&mut self, id: SerfId, enemy: SerfId, dir: Direction) -> Result<(), SimError> {
        let own = *self.serf(id)?.free_walking()?;
        let (their_col, their_row) = match &self.serf(enemy)?.data {
            StateData::FreeWalking(f) => (f.dist_col, f.dist_row),
            StateData::LeaveForWalkToFight(l) => (l.dist_col, l.dist_row),
            _ => return Err(self.missing(enemy, "roaming knight payload", 0, "engage_free")),
        };
        log::debug!("serf {}: engaging {} {:?}", id, enemy, dir);
        let defender_data = StateData::DefendingFree(DefendingFreeData {
            dist_col: their_col,
            dist_row: their_row,
            field_d: dir.reverse().index() as i32,
            other_dist_col: own.dist_col,
            other_dist_row: own.dist_row,
        });
        self.set_serf_state_with(enemy, State::KnightEngageDefendingFree, defender_data)?;
        self.animate_from_zero(enemy, ANIM_ENGAGE)?;
        let data = StateData::Attacking(AttackingData {
            defender: Some(enemy),
            field_d: dir.index() as i32,
            ..AttackingData::default()
        });
        self.set_serf_state_with(id, State::KnightEngageAttackingFree, data)?;
        self.animate_from_zero(id, ANIM_ENGAGE)
    }

    fn animate_from_zero(&mut self, id: SerfId, animation: i32) -> Result<(), SimError> {
        let serf = self.serf_mut(id)?;
        serf.counter = serf.counter.max(0);
        self.animate(id, animation)
    }

    /// Defender of an attack in progress, if it is still around.
    fn fight_partner(&self, id: SerfId) -> Result<Option<SerfId>, SimError> {
        let defender = self.serf(id)?.attacking()?.defender;
        Ok(defender.filter(|&d| {
            self.serfs
                .get(d)
                .is_some_and(|s| s.kind != SerfType::Dead)
        }))
    }

    // ---- free fights, attacker side ----

    pub(crate) fn handle_knight_engage_attacking_free(&mut self, id: SerfId) -> Result<(), SimError> {
        if self.serf(id)?.counter >= 0 {
            return Ok(());
        }
        if self.fight_partner(id)?.is_none() {
            return self.set_lost_state(id);
        }
        self.set_serf_state(id, State::KnightEngageAttackingFreeJoin)?;
        self.animate_from_zero(id, ANIM_KNIGHT_LOOKOUT)
    }

    pub(crate) fn handle_knight_engage_attacking_free_join(&mut self, id: SerfId) -> Result<(), SimError> {
        if self.serf(id)?.counter >= 0 {
            return Ok(());
        }
        if self.fight_partner(id)?.is_none() {
            return self.set_lost_state(id);
        }
        self.set_serf_state(id, State::KnightAttackingFreeWait)?;
        self.wait_one_tick(id)
    }

    /// Wait until the defender has squared up.
    pub(crate) fn handle_knight_attacking_free_wait(&mut self, id: SerfId) -> Result<(), SimError> {
        if self.serf(id)?.counter >= 0 {
            return Ok(());
        }
        let Some(defender) = self.fight_partner(id)? else {
            return self.set_lost_state(id);
        };
        if self.serf(defender)?.state != State::KnightPrepareDefendingFreeWait {
            return self.wait_one_tick(id);
        }
        let fight = self.start_fight(id, defender)?;
        let field_d = self.serf(id)?.attacking()?.field_d;
        let data = StateData::Attacking(AttackingData { field_d, ..fight });
        self.set_serf_state_with(id, State::KnightPrepareAttackingFree, data)?;
        self.animate_from_zero(id, ANIM_ENGAGE)
    }

    pub(crate) fn handle_knight_prepare_attacking_free(&mut self, id: SerfId) -> Result<(), SimError> {
        if self.serf(id)?.counter >= 0 {
            return Ok(());
        }
        let Some(defender) = self.fight_partner(id)? else {
            return self.set_lost_state(id);
        };
        self.set_serf_state(defender, State::KnightDefendingFree)?;
        self.serf_mut(id)?.attacking_mut()?.field_d = 0;
        self.set_serf_state(id, State::KnightAttackingFree)?;
        self.wait_one_tick(id)
    }

    #[tracing::instrument(skip_all)]
    pub(crate) fn handle_knight_attacking_free(&mut self, id: SerfId) -> Result<(), SimError> {
        loop {
            let serf = self.serf(id)?;
            if serf.state != State::KnightAttackingFree || serf.counter >= 0 {
                return Ok(());
            }
            let Some(defender) = self.fight_partner(id)? else {
                return self.set_lost_state(id);
            };
            if !self.fight_round(id, defender)? {
                continue;
            }
            let data = *self.serf(id)?.attacking()?;
            if data.attacker_won != 0 {
                let d = *self.serf(defender)?.defending_free()?;
                self.kill_serf(defender)?;
                self.notify_victory(id)?;
                let victory = StateData::AttackingVictoryFree(AttackingVictoryFreeData {
                    move_index: data.move_index,
                    dist_col: d.other_dist_col,
                    dist_row: d.other_dist_row,
                    defender: Some(defender),
                });
                self.set_serf_state_with(id, State::KnightAttackingVictoryFree, victory)?;
                return self.animate_from_zero(id, ANIM_VICTORY);
            }
            self.set_serf_state(defender, State::KnightDefendingVictoryFree)?;
            self.animate_from_zero(defender, ANIM_VICTORY)?;
            self.notify_victory(defender)?;
            self.set_serf_state(id, State::KnightAttackingDefeatFree)?;
            return self.animate_from_zero(id, ANIM_DYING);
        }
    }

    pub(crate) fn handle_knight_attacking_victory_free(&mut self, id: SerfId) -> Result<(), SimError> {
        let serf = self.serf(id)?;
        if serf.counter >= 0 {
            return Ok(());
        }
        let v = *serf.attacking_victory_free()?;
        let data = StateData::FreeWalking(FreeWalkingData {
            dist_col: v.dist_col,
            dist_row: v.dist_row,
            neg_dist1: -v.dist_col,
            neg_dist2: -v.dist_row,
            flags: 0,
        });
        self.set_serf_state_with(id, State::KnightFreeWalking, data)?;
        self.wait_one_tick(id)
    }

    /// Loser of a fight it started.
    pub(crate) fn handle_knight_attacking_defeat(&mut self, id: SerfId) -> Result<(), SimError> {
        if self.serf(id)?.counter >= 0 {
            return Ok(());
        }
        self.kill_serf(id)
    }

    // ---- free fights, defender side ----

    pub(crate) fn handle_knight_engage_defending_free(&mut self, id: SerfId) -> Result<(), SimError> {
        if self.serf(id)?.counter >= 0 {
            return Ok(());
        }
        self.set_serf_state(id, State::KnightPrepareDefendingFree)?;
        self.animate_from_zero(id, ANIM_KNIGHT_LOOKOUT)
    }

    pub(crate) fn handle_knight_prepare_defending_free(&mut self, id: SerfId) -> Result<(), SimError> {
        if self.serf(id)?.counter >= 0 {
            return Ok(());
        }
        self.set_serf_state(id, State::KnightPrepareDefendingFreeWait)?;
        self.wait_one_tick(id)
    }

    pub(crate) fn handle_knight_defending_victory_free(&mut self, id: SerfId) -> Result<(), SimError> {
        if self.serf(id)?.counter >= 0 {
            return Ok(());
        }
        self.set_lost_state(id)
    }

    // ---- attacks on buildings ----

    fn doorstep_building(&self, id: SerfId) -> Result<Option<BuildingId>, SimError> {
        let pos = self.serf(id)?.pos;
        Ok(self.building_at(self.map.move_dir(pos, Direction::UpLeft)))
    }

    /// Attacker at an enemy flag calls the next defender out.
    pub(crate) fn handle_knight_engaging_building(&mut self, id: SerfId) -> Result<(), SimError> {
        let serf = self.serf(id)?;
        if serf.counter >= 0 {
            return Ok(());
        }
        let owner = serf.owner;
        let Some(building) = self.doorstep_building(id)? else {
            return self.knight_go_home(id);
        };
        let Some(b) = self.buildings.get_mut(building) else {
            return self.knight_go_home(id);
        };
        if b.owner == owner || b.knights.is_empty() {
            self.set_serf_state(id, State::KnightOccupyEnemyBuilding)?;
            return self.wait_one_tick(id);
        }
        let Some(defender) = b.call_defender_out() else {
            return self.wait_one_tick(id);
        };
        log::debug!("serf {}: {} comes out of {} to defend", id, defender, building);
        self.set_serf_state(defender, State::KnightPrepareDefending)?;
        self.wait_one_tick(defender)?;
        let data = StateData::Attacking(AttackingData {
            defender: Some(defender),
            ..AttackingData::default()
        });
        self.set_serf_state_with(id, State::KnightPrepareAttacking, data)?;
        self.animate_from_zero(id, ANIM_ENGAGE)
    }

    /// Defender steps into its doorway once the way is clear.
    pub(crate) fn handle_knight_prepare_defending(&mut self, id: SerfId) -> Result<(), SimError> {
        let serf = self.serf(id)?;
        if serf.counter >= 0 {
            return Ok(());
        }
        let pos = serf.pos;
        if self.map.has_serf(pos) && self.map.serf_index(pos) != Some(id) {
            return self.wait_one_tick(id);
        }
        self.occupy(id, pos)?;
        self.set_serf_state(id, State::KnightDefending)?;
        self.wait_one_tick(id)
    }

    pub(crate) fn handle_knight_prepare_attacking(&mut self, id: SerfId) -> Result<(), SimError> {
        if self.serf(id)?.counter >= 0 {
            return Ok(());
        }
        let Some(defender) = self.fight_partner(id)? else {
            self.set_serf_state(id, State::KnightEngagingBuilding)?;
            return self.wait_one_tick(id);
        };
        if self.serf(defender)?.state != State::KnightDefending {
            return self.wait_one_tick(id);
        }
        let fight = self.start_fight(id, defender)?;
        self.set_serf_state_with(id, State::KnightAttacking, StateData::Attacking(fight))?;
        self.wait_one_tick(id)
    }

    #[tracing::instrument(skip_all)]
    pub(crate) fn handle_knight_attacking(&mut self, id: SerfId) -> Result<(), SimError> {
        loop {
            let serf = self.serf(id)?;
            if serf.state != State::KnightAttacking || serf.counter >= 0 {
                return Ok(());
            }
            let Some(defender) = self.fight_partner(id)? else {
                self.set_serf_state(id, State::KnightEngagingBuilding)?;
                return self.wait_one_tick(id);
            };
            if !self.fight_round(id, defender)? {
                continue;
            }
            if self.serf(id)?.attacking()?.attacker_won != 0 {
                self.kill_serf(defender)?;
                self.notify_victory(id)?;
                self.set_serf_state(id, State::KnightAttackingVictory)?;
                return self.animate_from_zero(id, ANIM_VICTORY);
            }
            self.defender_returns(defender)?;
            self.set_serf_state(id, State::KnightAttackingDefeat)?;
            return self.animate_from_zero(id, ANIM_DYING);
        }
    }

    /// Victorious defender goes back to the end of its building's queue.
    fn defender_returns(&mut self, defender: SerfId) -> Result<(), SimError> {
        self.notify_victory(defender)?;
        let pos = self.serf(defender)?.pos;
        let Some(building) = self.building_at(pos) else {
            return self.set_lost_state(defender);
        };
        let state = self.buildings.get_mut(building).and_then(|b| {
            b.knight_occupy(defender);
            b.kind.defending_state()
        });
        self.vacate(pos, defender);
        match state {
            Some(state) => {
                self.set_serf_state_with(defender, state, StateData::Defending)?;
                self.wait_one_tick(defender)
            }
            None => self.set_lost_state(defender),
        }
    }

    pub(crate) fn handle_knight_attacking_victory(&mut self, id: SerfId) -> Result<(), SimError> {
        if self.serf(id)?.counter >= 0 {
            return Ok(());
        }
        let defended = self
            .doorstep_building(id)?
            .and_then(|b| self.buildings.get(b))
            .is_some_and(|b| !b.knights.is_empty());
        let next = if defended {
            State::KnightEngagingBuilding
        } else {
            State::KnightOccupyEnemyBuilding
        };
        self.set_serf_state(id, next)?;
        self.wait_one_tick(id)
    }

    /// Winner at the door: move in, capture, or fight the next defender.
    pub(crate) fn handle_knight_occupy_enemy_building(&mut self, id: SerfId) -> Result<(), SimError> {
        let serf = self.serf(id)?;
        if serf.counter >= 0 {
            return Ok(());
        }
        let owner = serf.owner;
        let Some(building) = self.doorstep_building(id)? else {
            return self.knight_go_home(id);
        };
        let Some(b) = self.buildings.get(building) else {
            return self.knight_go_home(id);
        };
        let (kind, b_owner, has_space, defended) =
            (b.kind, b.owner, b.has_knight_space(), !b.knights.is_empty());

        if b_owner == owner {
            return match kind {
                BuildingType::Castle => self.enter_building(id, ENTER_INVENTORY),
                _ if has_space && kind.is_military() => self.enter_building(id, ENTER_KNIGHT),
                _ => self.knight_go_home(id),
            };
        }
        if defended {
            self.set_serf_state(id, State::KnightEngagingBuilding)?;
            return self.wait_one_tick(id);
        }
        if kind == BuildingType::Castle {
            log::info!("player {} razes the castle of player {}", owner, b_owner);
            self.demolish_building(building);
            return self.knight_go_home(id);
        }
        self.capture_building(building, owner);
        self.enter_building(id, ENTER_KNIGHT)
    }

    /// Hand a building, its flag and the land around it to `owner`.
    fn capture_building(&mut self, building: BuildingId, owner: u8) {
        let Some(b) = self.buildings.get_mut(building) else {
            return;
        };
        let (old, pos, flag, kind) = (b.owner, b.pos, b.flag, b.kind);
        b.owner = owner;
        b.serf_requested = false;
        b.knights_requested = 0;
        log::info!("building {} ({:?}) captured by player {}", building, kind, owner);

        let cut: Vec<Direction> = self
            .flags
            .get(flag)
            .map(|f| Direction::ALL.into_iter().filter(|&d| f.has_road(d)).collect())
            .unwrap_or_default();
        for d in cut {
            self.remove_road(flag, d);
        }
        if let Some(f) = self.flags.get_mut(flag) {
            f.owner = owner;
        }
        for n in 0..CAPTURE_TERRITORY {
            let p = self.map.position_add_spirally(pos, n);
            self.map.set_owner(p, Some(owner));
        }
        let score = kind.max_knights() as i32;
        let tick = self.game_time;
        if let Some(p) = self.player_mut(old) {
            p.decrease_military_score(score);
            p.add_notification(NotificationKind::LostBuilding, pos, tick);
        }
        if let Some(p) = self.player_mut(owner) {
            p.increase_military_score(score);
            p.add_notification(NotificationKind::CapturedBuilding, pos, tick);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::GameBuilder;
    use proptest::prelude::*;

    #[test]
    fn test_morale_by_rank_on_neutral_land() {
        assert_eq!(knight_morale(0, 0x1000), 0x40);
        assert_eq!(knight_morale(4, 0x1000), 0x400);
    }

    #[test]
    fn test_weak_attacker_loses_on_high_draw() {
        let ma = knight_morale(0, 0x1000);
        let md = knight_morale(4, 0x1000);
        // ((0x40 + 0x400) * 0x1000) >> 16 = 0x44, not below 0x40.
        assert!(!attacker_wins(ma, md, 0x1000));
        assert!(attacker_wins(ma, md, 0x0f00));
        assert!(!attacker_wins(ma, md, 0xffff));
    }

    #[test]
    fn test_hex_distance() {
        assert_eq!(hex_distance((3, 2)), 3);
        assert_eq!(hex_distance((-3, 2)), 5);
        assert_eq!(hex_distance((0, -4)), 4);
    }

    proptest! {
        #[test]
        fn prop_stronger_side_never_always_loses(rank_a in 0u32..5, rank_d in 0u32..5, draw: u16) {
            let ma = knight_morale(rank_a, 0x1000);
            let md = knight_morale(rank_d, 0x1000);
            let low = attacker_wins(ma, md, 0);
            prop_assert!(low);
            let won = attacker_wins(ma, md, draw);
            let result = ((ma + md) * u32::from(draw)) >> 16;
            prop_assert_eq!(won, result < ma);
        }
    }

    #[test]
    fn test_knight_joins_garrison() {
        let mut builder = GameBuilder::new().with_player();
        let hut = builder.building(0, 8, 8, BuildingType::Hut, true);
        let knight = builder.worker(hut, SerfType::Knight0, State::Null);
        let mut game = builder.build();
        game.knight_enter_building(knight, hut).unwrap();
        assert_eq!(game.get_serf(knight).unwrap().state, State::DefendingHut);
        assert_eq!(game.get_building(hut).unwrap().first_knight(), Some(knight));
    }

    #[test]
    fn test_attack_on_empty_hut_captures_it() {
        let mut builder = GameBuilder::new().with_player().with_player();
        let ours = builder.building(0, 8, 8, BuildingType::Tower, true);
        let a = builder.garrison(ours, SerfType::Knight2);
        let b = builder.garrison(ours, SerfType::Knight2);
        let theirs = builder.building(1, 14, 8, BuildingType::Hut, true);
        let mut game = builder.build();

        assert_eq!(game.start_attack(0, theirs, 3).unwrap(), 1);
        assert_eq!(game.get_building(ours).unwrap().knights.len(), 1);
        let attacker = if game.get_serf(a).unwrap().state == State::KnightLeaveForFight { a } else { b };

        for _ in 0..30_000 {
            game.update().unwrap();
            if game.get_building(theirs).unwrap().owner == 0 {
                break;
            }
        }
        assert_eq!(game.get_building(theirs).unwrap().owner, 0);
        for _ in 0..2_000 {
            game.update().unwrap();
        }
        assert_eq!(game.get_serf(attacker).unwrap().state, State::DefendingHut);
        assert!(game.get_building(theirs).unwrap().knights.contains(&attacker));
    }

    #[test]
    fn test_stale_garrison_entry_stays_queued() {
        let mut builder = GameBuilder::new().with_player().with_player();
        let ours = builder.building(0, 8, 8, BuildingType::Tower, true);
        let a = builder.garrison(ours, SerfType::Knight2);
        let theirs = builder.building(1, 14, 8, BuildingType::Hut, true);
        let mut game = builder.build();
        let ghost = SerfId(99);
        game.buildings.get_mut(ours).unwrap().knights.push_back(ghost);

        assert_eq!(game.start_attack(0, theirs, 1), Err(SimError::NoSuchSerf(ghost)));
        assert_eq!(game.get_building(ours).unwrap().knights, [a, ghost]);
        assert_eq!(game.get_serf(a).unwrap().state, State::DefendingTower);
    }

    fn knights_side_by_side(blocked: bool) -> (Game, SerfId, SerfId) {
        let mut builder = GameBuilder::new().with_player().with_player();
        let pos = builder.pos(8, 8);
        let ours = builder.free_walker(pos, SerfType::Knight1, State::KnightFreeWalking, (5, 0));
        let enemy_pos = builder.step(pos, Direction::Right);
        if blocked {
            builder.tree(enemy_pos);
        }
        let enemy = builder.serf_at(enemy_pos, SerfType::Knight1, State::Null);
        let mut game = builder.build();
        let data = StateData::LeaveForWalkToFight(LeaveForWalkToFightData {
            dist_col: 3,
            dist_row: -2,
            field_d: 0,
            field_e: 0,
            next_state: State::KnightFreeWalking,
        });
        game.set_serf_state_with(enemy, State::KnightLeaveForWalkToFight, data).unwrap();
        game.serfs.get_mut(enemy).unwrap().owner = 1;
        game.serfs.get_mut(ours).unwrap().counter = -1;
        (game, ours, enemy)
    }

    #[test]
    fn test_knight_on_its_way_out_is_engaged_with_its_own_offset() {
        let (mut game, ours, enemy) = knights_side_by_side(false);
        game.handle_knight_free_walking(ours).unwrap();
        assert_eq!(game.get_serf(ours).unwrap().state, State::KnightEngageAttackingFree);
        let e = game.get_serf(enemy).unwrap();
        assert_eq!(e.state, State::KnightEngageDefendingFree);
        let d = e.defending_free().unwrap();
        assert_eq!((d.dist_col, d.dist_row), (3, -2));
        assert_eq!((d.other_dist_col, d.other_dist_row), (5, 0));
    }

    #[test]
    fn test_enemy_on_blocked_cell_is_left_alone() {
        let (mut game, ours, enemy) = knights_side_by_side(true);
        game.handle_knight_free_walking(ours).unwrap();
        assert_ne!(game.get_serf(ours).unwrap().state, State::KnightEngageAttackingFree);
        assert_eq!(game.get_serf(enemy).unwrap().state, State::KnightLeaveForWalkToFight);
    }

    #[test]
    fn test_building_fight_has_one_survivor() {
        let mut builder = GameBuilder::new().with_player().with_player();
        let ours = builder.building(0, 8, 8, BuildingType::Tower, true);
        builder.garrison(ours, SerfType::Knight1);
        builder.garrison(ours, SerfType::Knight1);
        let theirs = builder.building(1, 14, 8, BuildingType::Hut, true);
        builder.garrison(theirs, SerfType::Knight1);
        let mut game = builder.build();
        let knights = |game: &Game| game.serfs.iter().filter(|(_, s)| s.kind.is_knight()).count();

        assert_eq!(game.start_attack(0, theirs, 1).unwrap(), 1);
        for _ in 0..40_000 {
            game.update().unwrap();
            if knights(&game) == 2 {
                break;
            }
        }
        assert_eq!(game.metrics.fights, 1);
        assert_eq!(knights(&game), 2);
        assert!(game.players.iter().any(|p| !p.notifications.is_empty()));
    }
}
