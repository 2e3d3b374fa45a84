//! Per-state payloads.
//!
//! Each variant of [`StateData`] serves a group of states. The variant is
//! always rebuilt by `Serf::set_state`, so a serf never carries the payload
//! of a group its current state does not belong to.

use super::State;
use crate::arena::{BuildingId, FlagId, InventoryId, SerfId};
use crate::map::GroundDeposit;
use crate::resource::Resource;
use serde::{Deserialize, Serialize};

/// `dir1` value: become the transporter of road `dir1` at the destination.
pub const DIR1_TRANSPORTER_MAX: i32 = 5;
/// `dir1` value: enter the inventory at the destination flag.
pub const DIR1_TO_INVENTORY: i32 = 6;
/// `dir1` value: report to the building (or flag) that requested the serf.
pub const DIR1_REQUESTED: i32 = -1;
/// `dir1` value: no destination yet, look for the nearest inventory.
pub const DIR1_UNRESOLVED: i32 = -2;

/// `neg_dist1` sentinel for a walk that has reached its work spot and is
/// now heading back.
pub const NEG_DIST_RETURNING: i32 = -128;

/// Entering mode: go straight into the inventory.
pub const ENTER_INVENTORY: i32 = -2;
/// Entering mode: report as the building's requested worker.
pub const ENTER_WORKER: i32 = -1;
/// Entering mode: station as a knight.
pub const ENTER_KNIGHT: i32 = 0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdleInStockData {
    pub inventory: Option<InventoryId>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WalkingData {
    pub dir1: i32,
    pub res: Option<Resource>,
    pub dest: Option<FlagId>,
    /// Travel direction; `d - 6` while waiting to step in direction `d`.
    pub dir: i32,
    pub wait_counter: i32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EnteringBuildingData {
    pub field_b: i32,
    pub slope_len: i32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LeavingBuildingData {
    pub field_b: i32,
    pub dest: i32,
    pub dest2: i32,
    pub dir: i32,
    pub next_state: State,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReadyToEnterData {
    pub field_b: i32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DiggingData {
    pub h_index: i32,
    pub target_h: i32,
    /// 0 = building site, 1..=6 = neighbour in direction `dig_pos - 1`.
    pub dig_pos: i32,
    pub substate: i32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BuildingData {
    pub mode: i32,
    pub index: Option<BuildingId>,
    pub material_step: u8,
    pub counter: i32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BuildingCastleData {
    pub inventory: Option<InventoryId>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MoveResourceOutData {
    /// Resource code plus one; 0 = nothing.
    pub res: u8,
    pub res_dest: Option<FlagId>,
    pub next_state: State,
}

impl MoveResourceOutData {
    pub fn resource(&self) -> Option<Resource> {
        self.res.checked_sub(1).and_then(Resource::from_code)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReadyToLeaveInventoryData {
    pub mode: i32,
    pub dest: Option<FlagId>,
    pub inventory: Option<InventoryId>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FreeWalkingData {
    pub dist_col: i32,
    pub dist_row: i32,
    pub neg_dist1: i32,
    pub neg_dist2: i32,
    pub flags: u8,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProductionData {
    pub mode: i32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LostData {
    pub field_b: i32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MiningData {
    pub substate: i32,
    pub res: Option<Resource>,
    pub deposit: GroundDeposit,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SmeltingData {
    pub mode: i32,
    pub counter: i32,
    /// 0 = steel, otherwise gold.
    pub kind: u8,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttackingData {
    pub move_index: i32,
    pub attacker_won: u8,
    pub field_d: i32,
    pub defender: Option<SerfId>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttackingVictoryFreeData {
    pub move_index: i32,
    pub dist_col: i32,
    pub dist_row: i32,
    pub defender: Option<SerfId>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DefendingFreeData {
    pub dist_col: i32,
    pub dist_row: i32,
    pub field_d: i32,
    pub other_dist_col: i32,
    pub other_dist_row: i32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LeaveForWalkToFightData {
    pub dist_col: i32,
    pub dist_row: i32,
    pub field_d: i32,
    pub field_e: i32,
    pub next_state: State,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdleOnPathData {
    pub flag: Option<FlagId>,
    /// Pending wake direction plus one; 0 = asleep.
    pub field_e: i32,
    /// Direction from the idle cell back to `flag`.
    pub rev_dir: i32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StateData {
    #[default]
    None,
    IdleInStock(IdleInStockData),
    Walking(WalkingData),
    EnteringBuilding(EnteringBuildingData),
    LeavingBuilding(LeavingBuildingData),
    ReadyToEnter(ReadyToEnterData),
    Digging(DiggingData),
    Building(BuildingData),
    BuildingCastle(BuildingCastleData),
    MoveResourceOut(MoveResourceOutData),
    ReadyToLeaveInventory(ReadyToLeaveInventoryData),
    FreeWalking(FreeWalkingData),
    Production(ProductionData),
    Lost(LostData),
    Mining(MiningData),
    Smelting(SmeltingData),
    Attacking(AttackingData),
    AttackingVictoryFree(AttackingVictoryFreeData),
    DefendingFree(DefendingFreeData),
    LeaveForWalkToFight(LeaveForWalkToFightData),
    IdleOnPath(IdleOnPathData),
    /// Stationed knights. The defender order lives in the building's queue.
    Defending,
}

impl StateData {
    /// Fresh payload for `state`'s group.
    pub fn for_state(state: State) -> Self {
        use State as S;
        match state {
            S::IdleInStock => StateData::IdleInStock(Default::default()),
            S::Walking | S::Transporting | S::Delivering => StateData::Walking(Default::default()),
            S::EnteringBuilding => StateData::EnteringBuilding(Default::default()),
            S::LeavingBuilding | S::ReadyToLeave | S::KnightLeaveForFight => {
                StateData::LeavingBuilding(Default::default())
            }
            S::ReadyToEnter => StateData::ReadyToEnter(Default::default()),
            S::Digging => StateData::Digging(Default::default()),
            S::Building => StateData::Building(Default::default()),
            S::BuildingCastle => StateData::BuildingCastle(Default::default()),
            S::MoveResourceOut | S::DropResourceOut => {
                StateData::MoveResourceOut(Default::default())
            }
            S::ReadyToLeaveInventory => StateData::ReadyToLeaveInventory(Default::default()),
            S::FreeWalking
            | S::Logging
            | S::Planting
            | S::StoneCutterFreeWalking
            | S::StoneCutting
            | S::Fishing
            | S::Farming
            | S::LookingForGeoSpot
            | S::SamplingGeoSpot
            | S::KnightFreeWalking
            | S::FreeSailing => StateData::FreeWalking(Default::default()),
            S::Sawing
            | S::Milling
            | S::Baking
            | S::PigFarming
            | S::Butchering
            | S::MakingWeapon
            | S::MakingTool
            | S::BuildingBoat => StateData::Production(Default::default()),
            S::Lost => StateData::Lost(Default::default()),
            S::Mining => StateData::Mining(Default::default()),
            S::Smelting => StateData::Smelting(Default::default()),
            S::KnightEngagingBuilding
            | S::KnightPrepareAttacking
            | S::KnightAttacking
            | S::KnightAttackingVictory
            | S::KnightAttackingDefeat
            | S::KnightOccupyEnemyBuilding
            | S::KnightEngageAttackingFree
            | S::KnightEngageAttackingFreeJoin
            | S::KnightPrepareAttackingFree
            | S::KnightAttackingFree
            | S::KnightAttackingFreeWait
            | S::KnightAttackingDefeatFree => StateData::Attacking(Default::default()),
            S::KnightAttackingVictoryFree => StateData::AttackingVictoryFree(Default::default()),
            S::KnightEngageDefendingFree
            | S::KnightPrepareDefendingFree
            | S::KnightPrepareDefendingFreeWait
            | S::KnightDefendingFree => StateData::DefendingFree(Default::default()),
            S::KnightLeaveForWalkToFight => StateData::LeaveForWalkToFight(Default::default()),
            S::IdleOnPath | S::WaitIdleOnPath | S::WakeAtFlag | S::WakeOnPath => {
                StateData::IdleOnPath(Default::default())
            }
            S::DefendingHut | S::DefendingTower | S::DefendingFortress | S::DefendingCastle => {
                StateData::Defending
            }
            S::Null
            | S::WaitForResourceOut
            | S::PlanningLogging
            | S::PlanningPlanting
            | S::PlanningStoneCutting
            | S::PlanningFishing
            | S::PlanningFarming
            | S::LostSailor
            | S::EscapeBuilding
            | S::KnightPrepareDefending
            | S::KnightDefending
            | S::KnightDefendingVictoryFree
            | S::Scatter
            | S::FinishedBuilding
            | S::Invalid => StateData::None,
        }
    }

    /// The payload belongs to `state`'s group.
    pub fn matches(&self, state: State) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(&Self::for_state(state))
    }
}

macro_rules! data_accessors {
    ($($variant:ident($ty:ty) => $get:ident, $get_mut:ident;)*) => {
        impl StateData {
            $(
                pub fn $get(&self) -> Option<&$ty> {
                    match self {
                        StateData::$variant(data) => Some(data),
                        _ => None,
                    }
                }

                pub fn $get_mut(&mut self) -> Option<&mut $ty> {
                    match self {
                        StateData::$variant(data) => Some(data),
                        _ => None,
                    }
                }
            )*
        }
    };
}

data_accessors! {
    IdleInStock(IdleInStockData) => as_idle_in_stock, as_idle_in_stock_mut;
    Walking(WalkingData) => as_walking, as_walking_mut;
    EnteringBuilding(EnteringBuildingData) => as_entering_building, as_entering_building_mut;
    LeavingBuilding(LeavingBuildingData) => as_leaving_building, as_leaving_building_mut;
    ReadyToEnter(ReadyToEnterData) => as_ready_to_enter, as_ready_to_enter_mut;
    Digging(DiggingData) => as_digging, as_digging_mut;
    Building(BuildingData) => as_building, as_building_mut;
    BuildingCastle(BuildingCastleData) => as_building_castle, as_building_castle_mut;
    MoveResourceOut(MoveResourceOutData) => as_move_resource_out, as_move_resource_out_mut;
    ReadyToLeaveInventory(ReadyToLeaveInventoryData) => as_ready_to_leave_inventory, as_ready_to_leave_inventory_mut;
    FreeWalking(FreeWalkingData) => as_free_walking, as_free_walking_mut;
    Production(ProductionData) => as_production, as_production_mut;
    Lost(LostData) => as_lost, as_lost_mut;
    Mining(MiningData) => as_mining, as_mining_mut;
    Smelting(SmeltingData) => as_smelting, as_smelting_mut;
    Attacking(AttackingData) => as_attacking, as_attacking_mut;
    AttackingVictoryFree(AttackingVictoryFreeData) => as_attacking_victory_free, as_attacking_victory_free_mut;
    DefendingFree(DefendingFreeData) => as_defending_free, as_defending_free_mut;
    LeaveForWalkToFight(LeaveForWalkToFightData) => as_leave_for_walk_to_fight, as_leave_for_walk_to_fight_mut;
    IdleOnPath(IdleOnPathData) => as_idle_on_path, as_idle_on_path_mut;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_state_has_a_matching_payload() {
        for &state in State::ALL {
            assert!(StateData::for_state(state).matches(state), "{state:?}");
        }
    }

    #[test]
    fn test_group_membership() {
        let walking = StateData::for_state(State::Transporting);
        assert!(walking.matches(State::Delivering));
        assert!(!walking.matches(State::FreeWalking));
        assert!(StateData::None.matches(State::Scatter));
        assert!(StateData::Defending.matches(State::DefendingCastle));
    }

    #[test]
    fn test_wrong_accessor_returns_none() {
        let mut data = StateData::for_state(State::Lost);
        assert!(data.as_walking().is_none());
        data.as_lost_mut().unwrap().field_b = 1;
        assert_eq!(data.as_lost().map(|d| d.field_b), Some(1));
    }

    #[test]
    fn test_move_resource_out_is_one_based() {
        let mut data = MoveResourceOutData::default();
        assert_eq!(data.resource(), None);
        data.res = Resource::Steel.code() + 1;
        assert_eq!(data.resource(), Some(Resource::Steel));
    }
}
