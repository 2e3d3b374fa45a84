//! Serf entity and its state model.
//!
//! | Piece | Role |
//! |-------|------|
//! | [`State`] | Discrete behaviour state, one handler each |
//! | [`StateData`] | Payload of the state's group |
//! | [`tables`] | Animation timings and fight tables |

mod data;
mod state;
pub mod tables;

pub use data::*;
pub use state::State;

use crate::arena::SerfId;
use crate::error::SimError;
use crate::map::MapPos;
use crate::resource::Resource;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SerfType {
    Transporter,
    Sailor,
    Digger,
    Builder,
    TransporterInventory,
    Lumberjack,
    Sawmiller,
    Stonecutter,
    Forester,
    Miner,
    Smelter,
    Fisher,
    PigFarmer,
    Butcher,
    Farmer,
    Miller,
    Baker,
    BoatBuilder,
    Toolmaker,
    WeaponSmith,
    Geologist,
    Generic,
    Knight0,
    Knight1,
    Knight2,
    Knight3,
    Knight4,
    Dead,
}

impl SerfType {
    pub const COUNT: usize = 28;

    pub const ALL: [SerfType; Self::COUNT] = [
        SerfType::Transporter,
        SerfType::Sailor,
        SerfType::Digger,
        SerfType::Builder,
        SerfType::TransporterInventory,
        SerfType::Lumberjack,
        SerfType::Sawmiller,
        SerfType::Stonecutter,
        SerfType::Forester,
        SerfType::Miner,
        SerfType::Smelter,
        SerfType::Fisher,
        SerfType::PigFarmer,
        SerfType::Butcher,
        SerfType::Farmer,
        SerfType::Miller,
        SerfType::Baker,
        SerfType::BoatBuilder,
        SerfType::Toolmaker,
        SerfType::WeaponSmith,
        SerfType::Geologist,
        SerfType::Generic,
        SerfType::Knight0,
        SerfType::Knight1,
        SerfType::Knight2,
        SerfType::Knight3,
        SerfType::Knight4,
        SerfType::Dead,
    ];

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }

    pub fn is_knight(self) -> bool {
        self.knight_rank().is_some()
    }

    /// 0..=4 for knights.
    pub fn knight_rank(self) -> Option<u32> {
        match self {
            SerfType::Knight0 => Some(0),
            SerfType::Knight1 => Some(1),
            SerfType::Knight2 => Some(2),
            SerfType::Knight3 => Some(3),
            SerfType::Knight4 => Some(4),
            _ => None,
        }
    }

    /// Tools a generic serf needs to take up this profession.
    pub fn tools(self) -> &'static [Resource] {
        match self {
            SerfType::Sailor => &[Resource::Boat],
            SerfType::Digger => &[Resource::Shovel],
            SerfType::Builder | SerfType::Geologist | SerfType::BoatBuilder => &[Resource::Hammer],
            SerfType::Lumberjack => &[Resource::Axe],
            SerfType::Sawmiller => &[Resource::Saw],
            SerfType::Stonecutter | SerfType::Miner => &[Resource::Pick],
            SerfType::Fisher => &[Resource::Rod],
            SerfType::Butcher => &[Resource::Cleaver],
            SerfType::Farmer => &[Resource::Scythe],
            SerfType::Toolmaker => &[Resource::Hammer, Resource::Saw],
            SerfType::WeaponSmith => &[Resource::Hammer, Resource::Pincer],
            SerfType::Knight0 => &[Resource::Sword, Resource::Shield],
            _ => &[],
        }
    }

    /// Resource carried home by an outdoor worker.
    pub fn harvest(self) -> Option<Resource> {
        match self {
            SerfType::Lumberjack => Some(Resource::Lumber),
            SerfType::Stonecutter => Some(Resource::Stone),
            SerfType::Fisher => Some(Resource::Fish),
            SerfType::Farmer => Some(Resource::Wheat),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Serf {
    pub id: SerfId,
    pub owner: u8,
    pub kind: SerfType,
    pub state: State,
    pub data: StateData,
    pub animation: i32,
    pub counter: i32,
    pub pos: MapPos,
    /// Game tick of the last update.
    pub tick: u16,
    pub sound: bool,
}

impl Serf {
    pub fn new(id: SerfId, owner: u8, kind: SerfType, pos: MapPos, tick: u16) -> Self {
        Self {
            id,
            owner,
            kind,
            state: State::Null,
            data: StateData::None,
            animation: 0,
            counter: 0,
            pos,
            tick,
            sound: false,
        }
    }

    /// Switch state. The payload survives only when the new state belongs to
    /// the same group; otherwise a fresh default payload is attached.
    pub fn set_state(&mut self, state: State) {
        log::debug!(
            "serf {}: {} -> {}",
            self.id,
            self.state.name(),
            state.name()
        );
        self.state = state;
        if !self.data.matches(state) {
            self.data = StateData::for_state(state);
        }
    }

    /// Switch state and replace the payload in one step.
    pub fn set_state_with(&mut self, state: State, data: StateData) {
        debug_assert!(data.matches(state), "{data:?} does not serve {state:?}");
        self.set_state(state);
        self.data = data;
    }

    pub fn is_waiting(&self) -> bool {
        self.waiting_direction().is_some()
    }

    /// Direction the serf is waiting to step in, if it is blocked.
    pub fn waiting_direction(&self) -> Option<usize> {
        match &self.data {
            StateData::Walking(w) if w.dir < 0 => Some((w.dir + 6) as usize),
            StateData::FreeWalking(f) if f.flags & 0x70 != 0 => {
                Some((((f.flags >> 4) & 7) - 1) as usize)
            }
            StateData::Digging(d) if d.substate < 0 => Some((-d.substate - 1) as usize),
            _ => None,
        }
        .filter(|&d| d < 6)
    }

    fn invalid(&self, op: &'static str) -> SimError {
        SimError::InvalidState {
            serf: self.id,
            state: self.state,
            op,
        }
    }
}

macro_rules! serf_data {
    ($($name:ident, $name_mut:ident => $get:ident, $get_mut:ident: $ty:ty;)*) => {
        impl Serf {
            $(
                pub fn $name(&self) -> Result<&$ty, SimError> {
                    match self.data.$get() {
                        Some(data) => Ok(data),
                        None => Err(self.invalid(stringify!($name))),
                    }
                }

                pub fn $name_mut(&mut self) -> Result<&mut $ty, SimError> {
                    let err = self.invalid(stringify!($name_mut));
                    self.data.$get_mut().ok_or(err)
                }
            )*
        }
    };
}

serf_data! {
    idle_in_stock, idle_in_stock_mut => as_idle_in_stock, as_idle_in_stock_mut: IdleInStockData;
    walking, walking_mut => as_walking, as_walking_mut: WalkingData;
    entering_building, entering_building_mut => as_entering_building, as_entering_building_mut: EnteringBuildingData;
    leaving_building, leaving_building_mut => as_leaving_building, as_leaving_building_mut: LeavingBuildingData;
    ready_to_enter, ready_to_enter_mut => as_ready_to_enter, as_ready_to_enter_mut: ReadyToEnterData;
    digging, digging_mut => as_digging, as_digging_mut: DiggingData;
    building, building_mut => as_building, as_building_mut: BuildingData;
    building_castle, building_castle_mut => as_building_castle, as_building_castle_mut: BuildingCastleData;
    move_resource_out, move_resource_out_mut => as_move_resource_out, as_move_resource_out_mut: MoveResourceOutData;
    ready_to_leave_inventory, ready_to_leave_inventory_mut => as_ready_to_leave_inventory, as_ready_to_leave_inventory_mut: ReadyToLeaveInventoryData;
    free_walking, free_walking_mut => as_free_walking, as_free_walking_mut: FreeWalkingData;
    production, production_mut => as_production, as_production_mut: ProductionData;
    lost, lost_mut => as_lost, as_lost_mut: LostData;
    mining, mining_mut => as_mining, as_mining_mut: MiningData;
    smelting, smelting_mut => as_smelting, as_smelting_mut: SmeltingData;
    attacking, attacking_mut => as_attacking, as_attacking_mut: AttackingData;
    attacking_victory_free, attacking_victory_free_mut => as_attacking_victory_free, as_attacking_victory_free_mut: AttackingVictoryFreeData;
    defending_free, defending_free_mut => as_defending_free, as_defending_free_mut: DefendingFreeData;
    leave_for_walk_to_fight, leave_for_walk_to_fight_mut => as_leave_for_walk_to_fight, as_leave_for_walk_to_fight_mut: LeaveForWalkToFightData;
    idle_on_path, idle_on_path_mut => as_idle_on_path, as_idle_on_path_mut: IdleOnPathData;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn serf() -> Serf {
        Serf::new(SerfId(1), 0, SerfType::Transporter, 0, 0)
    }

    #[test]
    fn test_set_state_keeps_payload_within_group() {
        let mut s = serf();
        s.set_state(State::Walking);
        s.walking_mut().unwrap().dir1 = 4;
        s.set_state(State::Transporting);
        assert_eq!(s.walking().unwrap().dir1, 4);
    }

    #[test]
    fn test_set_state_resets_payload_across_groups() {
        let mut s = serf();
        s.set_state(State::Walking);
        s.walking_mut().unwrap().dir1 = 4;
        s.set_state(State::Lost);
        assert!(s.walking().is_err());
        assert_eq!(s.lost().unwrap().field_b, 0);
        s.set_state(State::Scatter);
        assert_eq!(s.data, StateData::None);
    }

    #[test]
    fn test_wrong_accessor_reports_context() {
        let mut s = serf();
        s.set_state(State::Mining);
        match s.walking_mut() {
            Err(SimError::InvalidState { serf, state, op }) => {
                assert_eq!(serf, SerfId(1));
                assert_eq!(state, State::Mining);
                assert_eq!(op, "walking_mut");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_waiting_direction() {
        let mut s = serf();
        s.set_state(State::Walking);
        assert!(!s.is_waiting());
        s.walking_mut().unwrap().dir = 3 - 6;
        assert_eq!(s.waiting_direction(), Some(3));
        s.set_state(State::FreeWalking);
        s.free_walking_mut().unwrap().flags = (2 + 1) << 4;
        assert_eq!(s.waiting_direction(), Some(2));
    }

    #[test]
    fn test_type_codes() {
        assert_eq!(SerfType::Dead.code(), 27);
        assert_eq!(SerfType::from_code(22), Some(SerfType::Knight0));
        assert_eq!(SerfType::Knight3.knight_rank(), Some(3));
        assert!(!SerfType::Generic.is_knight());
    }
}
