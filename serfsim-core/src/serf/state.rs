//! The serf state enumeration.
//!
//! Codes are the persisted numbering; names are the text save spelling.

use serde::{Deserialize, Serialize};

macro_rules! define_states {
    ($($variant:ident = $code:literal => $name:literal,)*) => {
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub enum State {
            #[default]
            $($variant = $code,)*
        }

        impl State {
            pub const ALL: &'static [State] = &[$(State::$variant,)*];

            pub fn code(self) -> u8 {
                self as u8
            }

            pub fn from_code(code: u8) -> Option<Self> {
                match code {
                    $($code => Some(State::$variant),)*
                    _ => None,
                }
            }

            pub fn name(self) -> &'static str {
                match self {
                    $(State::$variant => $name,)*
                }
            }

            pub fn from_name(name: &str) -> Option<Self> {
                match name {
                    $($name => Some(State::$variant),)*
                    _ => None,
                }
            }
        }
    };
}

define_states! {
    Null = 0 => "null",
    IdleInStock = 1 => "idle_in_stock",
    Walking = 2 => "walking",
    Transporting = 3 => "transporting",
    EnteringBuilding = 4 => "entering_building",
    LeavingBuilding = 5 => "leaving_building",
    ReadyToEnter = 6 => "ready_to_enter",
    ReadyToLeave = 7 => "ready_to_leave",
    Digging = 8 => "digging",
    Building = 9 => "building",
    BuildingCastle = 10 => "building_castle",
    MoveResourceOut = 11 => "move_resource_out",
    WaitForResourceOut = 12 => "wait_for_resource_out",
    DropResourceOut = 13 => "drop_resource_out",
    Delivering = 14 => "delivering",
    ReadyToLeaveInventory = 15 => "ready_to_leave_inventory",
    FreeWalking = 16 => "free_walking",
    Logging = 17 => "logging",
    PlanningLogging = 18 => "planning_logging",
    PlanningPlanting = 19 => "planning_planting",
    Planting = 20 => "planting",
    PlanningStoneCutting = 21 => "planning_stonecutting",
    StoneCutterFreeWalking = 22 => "stonecutter_free_walking",
    StoneCutting = 23 => "stonecutting",
    Sawing = 24 => "sawing",
    Lost = 25 => "lost",
    LostSailor = 26 => "lost_sailor",
    FreeSailing = 27 => "free_sailing",
    EscapeBuilding = 28 => "escape_building",
    Mining = 29 => "mining",
    Smelting = 30 => "smelting",
    PlanningFishing = 31 => "planning_fishing",
    Fishing = 32 => "fishing",
    PlanningFarming = 33 => "planning_farming",
    Farming = 34 => "farming",
    Milling = 35 => "milling",
    Baking = 36 => "baking",
    PigFarming = 37 => "pigfarming",
    Butchering = 38 => "butchering",
    MakingWeapon = 39 => "making_weapon",
    MakingTool = 40 => "making_tool",
    BuildingBoat = 41 => "building_boat",
    LookingForGeoSpot = 42 => "looking_for_geo_spot",
    SamplingGeoSpot = 43 => "sampling_geo_spot",
    KnightEngagingBuilding = 44 => "knight_engaging_building",
    KnightPrepareAttacking = 45 => "knight_prepare_attacking",
    KnightLeaveForFight = 46 => "knight_leave_for_fight",
    KnightPrepareDefending = 47 => "knight_prepare_defending",
    KnightAttacking = 48 => "knight_attacking",
    KnightDefending = 49 => "knight_defending",
    KnightAttackingVictory = 50 => "knight_attacking_victory",
    KnightAttackingDefeat = 51 => "knight_attacking_defeat",
    KnightOccupyEnemyBuilding = 52 => "knight_occupy_enemy_building",
    KnightFreeWalking = 53 => "knight_free_walking",
    KnightEngageDefendingFree = 54 => "knight_engage_defending_free",
    KnightEngageAttackingFree = 55 => "knight_engage_attacking_free",
    KnightEngageAttackingFreeJoin = 56 => "knight_engage_attacking_free_join",
    KnightPrepareAttackingFree = 57 => "knight_prepare_attacking_free",
    KnightPrepareDefendingFree = 58 => "knight_prepare_defending_free",
    KnightPrepareDefendingFreeWait = 59 => "knight_prepare_defending_free_wait",
    KnightAttackingFree = 60 => "knight_attacking_free",
    KnightDefendingFree = 61 => "knight_defending_free",
    KnightAttackingVictoryFree = 62 => "knight_attacking_victory_free",
    KnightDefendingVictoryFree = 63 => "knight_defending_victory_free",
    KnightAttackingFreeWait = 64 => "knight_attacking_free_wait",
    KnightLeaveForWalkToFight = 65 => "knight_leave_for_walk_to_fight",
    IdleOnPath = 66 => "idle_on_path",
    WaitIdleOnPath = 67 => "wait_idle_on_path",
    WakeAtFlag = 68 => "wake_at_flag",
    WakeOnPath = 69 => "wake_on_path",
    DefendingHut = 70 => "defending_hut",
    DefendingTower = 71 => "defending_tower",
    DefendingFortress = 72 => "defending_fortress",
    Scatter = 73 => "scatter",
    FinishedBuilding = 74 => "finished_building",
    DefendingCastle = 75 => "defending_castle",
    KnightAttackingDefeatFree = 76 => "knight_attacking_defeat_free",
    Invalid = 77 => "invalid",
}

impl State {
    /// States in which the serf is stationed inside a building and has no
    /// map cell of its own.
    pub fn is_inside_building(self) -> bool {
        matches!(
            self,
            State::IdleInStock
                | State::BuildingCastle
                | State::WaitForResourceOut
                | State::PlanningLogging
                | State::PlanningPlanting
                | State::PlanningStoneCutting
                | State::PlanningFishing
                | State::PlanningFarming
                | State::Sawing
                | State::Milling
                | State::Baking
                | State::PigFarming
                | State::Butchering
                | State::MakingWeapon
                | State::MakingTool
                | State::BuildingBoat
                | State::Smelting
                | State::Mining
                | State::MoveResourceOut
                | State::ReadyToLeave
                | State::ReadyToLeaveInventory
                | State::EscapeBuilding
                | State::DefendingHut
                | State::DefendingTower
                | State::DefendingFortress
                | State::DefendingCastle
        )
    }

    /// States that leave the serf with no building to return to.
    pub fn detaches_from_building(self) -> bool {
        matches!(
            self,
            State::IdleInStock
                | State::Lost
                | State::LostSailor
                | State::EscapeBuilding
                | State::Null
                | State::Scatter
                | State::FinishedBuilding
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_dense_and_named() {
        assert_eq!(State::ALL.len(), 78);
        for (i, state) in State::ALL.iter().enumerate() {
            assert_eq!(state.code() as usize, i);
            assert_eq!(State::from_code(i as u8), Some(*state));
            assert_eq!(State::from_name(state.name()), Some(*state));
        }
        assert_eq!(State::from_code(78), None);
    }
}
