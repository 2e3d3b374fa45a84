//! Per-serf tick entry point: elapsed-time bookkeeping and the state switch.

use crate::arena::SerfId;
use crate::error::SimError;
use crate::serf::{SerfType, State};
use crate::Game;

impl Game {
    /// Advance one serf to the current tick.
    ///
    /// The ticks elapsed since the serf's last update (16-bit wrapping) are
    /// taken off its counter, then its state handler runs. Handlers act only
    /// once the counter has gone negative.
    #[tracing::instrument(skip_all)]
    pub fn update_serf(&mut self, id: SerfId) -> Result<(), SimError> {
        let now = self.tick;
        let serf = self.serf_mut(id)?;
        let delta = now.wrapping_sub(serf.tick);
        serf.tick = now;
        serf.counter -= i32::from(delta);
        let (state, kind) = (serf.state, serf.kind);
        self.metrics.serf_updates += 1;

        if kind == SerfType::Dead {
            return self.handle_dead(id);
        }

        use State as S;
        match state {
            S::Null => Ok(()),
            S::IdleInStock => self.handle_idle_in_stock(id),
            S::Walking => self.handle_walking(id),
            S::Transporting => self.handle_transporting(id),
            S::EnteringBuilding => self.handle_entering_building(id),
            S::LeavingBuilding => self.handle_leaving_building(id),
            S::ReadyToEnter => self.handle_ready_to_enter(id),
            S::ReadyToLeave => self.handle_ready_to_leave(id),
            S::Digging => self.handle_digging(id),
            S::Building => self.handle_building(id),
            S::BuildingCastle => self.handle_building_castle(id),
            S::MoveResourceOut => self.handle_move_resource_out(id),
            S::WaitForResourceOut => self.handle_wait_for_resource_out(id),
            S::DropResourceOut => self.handle_drop_resource_out(id),
            S::Delivering => self.handle_delivering(id),
            S::ReadyToLeaveInventory => self.handle_ready_to_leave_inventory(id),
            S::FreeWalking => self.handle_free_walking(id),
            S::StoneCutterFreeWalking => self.handle_stonecutter_free_walking(id),
            S::FreeSailing => self.handle_free_sailing(id),
            S::LookingForGeoSpot => self.handle_looking_for_geo_spot(id),
            S::PlanningLogging
            | S::PlanningPlanting
            | S::PlanningStoneCutting
            | S::PlanningFishing
            | S::PlanningFarming => self.handle_planning(id),
            S::Logging
            | S::Planting
            | S::StoneCutting
            | S::Fishing
            | S::Farming
            | S::SamplingGeoSpot => self.handle_outdoor_work(id),
            S::Sawing
            | S::Milling
            | S::Baking
            | S::PigFarming
            | S::Butchering
            | S::MakingWeapon
            | S::MakingTool
            | S::BuildingBoat => self.handle_production(id),
            S::Mining => self.handle_mining(id),
            S::Smelting => self.handle_smelting(id),
            S::Lost => self.handle_lost(id),
            S::LostSailor => self.handle_lost_sailor(id),
            S::EscapeBuilding => self.handle_escape_building(id),
            S::Scatter => self.handle_scatter(id),
            S::FinishedBuilding => self.handle_finished_building(id),
            S::IdleOnPath => self.handle_idle_on_path(id),
            S::WaitIdleOnPath => self.handle_wait_idle_on_path(id),
            S::WakeAtFlag | S::WakeOnPath => self.handle_wake(id),

            S::KnightLeaveForFight => self.handle_knight_leave_for_fight(id),
            S::KnightLeaveForWalkToFight => self.handle_knight_leave_for_walk_to_fight(id),
            S::KnightFreeWalking => self.handle_knight_free_walking(id),
            S::KnightEngagingBuilding => self.handle_knight_engaging_building(id),
            S::KnightPrepareAttacking => self.handle_knight_prepare_attacking(id),
            S::KnightAttacking => self.handle_knight_attacking(id),
            S::KnightAttackingVictory => self.handle_knight_attacking_victory(id),
            S::KnightAttackingDefeat | S::KnightAttackingDefeatFree => {
                self.handle_knight_attacking_defeat(id)
            }
            S::KnightOccupyEnemyBuilding => self.handle_knight_occupy_enemy_building(id),
            S::KnightPrepareDefending => self.handle_knight_prepare_defending(id),
            S::KnightEngageAttackingFree => self.handle_knight_engage_attacking_free(id),
            S::KnightEngageAttackingFreeJoin => self.handle_knight_engage_attacking_free_join(id),
            S::KnightAttackingFreeWait => self.handle_knight_attacking_free_wait(id),
            S::KnightPrepareAttackingFree => self.handle_knight_prepare_attacking_free(id),
            S::KnightAttackingFree => self.handle_knight_attacking_free(id),
            S::KnightAttackingVictoryFree => self.handle_knight_attacking_victory_free(id),
            S::KnightEngageDefendingFree => self.handle_knight_engage_defending_free(id),
            S::KnightPrepareDefendingFree => self.handle_knight_prepare_defending_free(id),
            S::KnightDefendingVictoryFree => self.handle_knight_defending_victory_free(id),
            S::KnightDefending
            | S::KnightDefendingFree
            | S::KnightPrepareDefendingFreeWait
            | S::DefendingHut
            | S::DefendingTower
            | S::DefendingFortress
            | S::DefendingCastle => self.handle_knight_idle(id),

            S::Invalid => {
                log::error!("serf {}: no handler for state {}", id, state.name());
                self.set_serf_state(id, State::Null)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::serf::{SerfType, State};
    use crate::testing::GameBuilder;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn prop_counter_drops_by_wrapped_delta(last in any::<u16>(), delta in 0u16..2000) {
            let mut builder = GameBuilder::new().with_player();
            let pos = builder.pos(4, 4);
            let serf = builder.serf_at(pos, SerfType::Generic, State::Null);
            let mut game = builder.build();
            game.serf_mut(serf).unwrap().tick = last;
            game.serf_mut(serf).unwrap().counter = 0;
            game.tick = last.wrapping_add(delta);
            game.update_serf(serf).unwrap();
            prop_assert_eq!(game.get_serf(serf).unwrap().counter, -i32::from(delta));
        }
    }

    #[test]
    fn test_counter_counts_down_between_updates() {
        let mut builder = GameBuilder::new().with_player();
        let pos = builder.pos(5, 5);
        let serf = builder.serf_at(pos, SerfType::Transporter, State::Null);
        let mut game = builder.build();
        game.serf_mut(serf).unwrap().counter = 100;
        game.tick = game.tick.wrapping_add(30);
        game.update_serf(serf).unwrap();
        let s = game.get_serf(serf).unwrap();
        assert_eq!(s.counter, 70);
        assert_eq!(s.tick, game.tick);
    }

    #[test]
    fn test_tick_wraparound_yields_small_delta() {
        let mut builder = GameBuilder::new().with_player();
        let pos = builder.pos(3, 3);
        let serf = builder.serf_at(pos, SerfType::Generic, State::Null);
        let mut game = builder.build();
        game.serf_mut(serf).unwrap().tick = u16::MAX - 4;
        game.serf_mut(serf).unwrap().counter = 20;
        game.tick = 5;
        game.update_serf(serf).unwrap();
        assert_eq!(game.get_serf(serf).unwrap().counter, 10);
    }

    #[test]
    fn test_invalid_state_falls_back_to_null() {
        let mut builder = GameBuilder::new().with_player();
        let pos = builder.pos(2, 2);
        let serf = builder.serf_at(pos, SerfType::Generic, State::Null);
        let mut game = builder.build();
        game.set_serf_state(serf, State::Invalid).unwrap();
        game.update_serf(serf).unwrap();
        assert_eq!(game.get_serf(serf).unwrap().state, State::Null);
    }
}
