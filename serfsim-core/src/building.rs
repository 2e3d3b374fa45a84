use crate::arena::{FlagId, InventoryId, SerfId};
use crate::map::{GroundDeposit, MapPos};
use crate::resource::Resource;
use crate::serf::{SerfType, State};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Construction progress at which a building is complete.
pub const BUILD_DONE: u32 = 0xffff;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum BuildingType {
    Fisher,
    Lumberjack,
    Boatbuilder,
    Stonecutter,
    StoneMine,
    CoalMine,
    IronMine,
    GoldMine,
    Forester,
    Stock,
    Hut,
    Farm,
    Butcher,
    PigFarm,
    Mill,
    Baker,
    Sawmill,
    SteelSmelter,
    ToolMaker,
    WeaponSmith,
    Tower,
    Fortress,
    GoldSmelter,
    Castle,
}

impl BuildingType {
    pub fn is_military(self) -> bool {
        matches!(
            self,
            BuildingType::Hut | BuildingType::Tower | BuildingType::Fortress | BuildingType::Castle
        )
    }

    pub fn is_large(self) -> bool {
        matches!(
            self,
            BuildingType::Stock
                | BuildingType::Farm
                | BuildingType::PigFarm
                | BuildingType::SteelSmelter
                | BuildingType::GoldSmelter
                | BuildingType::WeaponSmith
                | BuildingType::Fortress
                | BuildingType::Castle
        )
    }

    pub fn is_mine(self) -> bool {
        self.mine_deposit().is_some()
    }

    pub fn mine_deposit(self) -> Option<GroundDeposit> {
        match self {
            BuildingType::StoneMine => Some(GroundDeposit::Stone),
            BuildingType::CoalMine => Some(GroundDeposit::Coal),
            BuildingType::IronMine => Some(GroundDeposit::Iron),
            BuildingType::GoldMine => Some(GroundDeposit::Gold),
            _ => None,
        }
    }

    /// Profession that works inside (military buildings take knights).
    pub fn worker(self) -> Option<SerfType> {
        Some(match self {
            BuildingType::Fisher => SerfType::Fisher,
            BuildingType::Lumberjack => SerfType::Lumberjack,
            BuildingType::Boatbuilder => SerfType::BoatBuilder,
            BuildingType::Stonecutter => SerfType::Stonecutter,
            BuildingType::StoneMine
            | BuildingType::CoalMine
            | BuildingType::IronMine
            | BuildingType::GoldMine => SerfType::Miner,
            BuildingType::Forester => SerfType::Forester,
            BuildingType::Farm => SerfType::Farmer,
            BuildingType::Butcher => SerfType::Butcher,
            BuildingType::PigFarm => SerfType::PigFarmer,
            BuildingType::Mill => SerfType::Miller,
            BuildingType::Baker => SerfType::Baker,
            BuildingType::Sawmill => SerfType::Sawmiller,
            BuildingType::SteelSmelter | BuildingType::GoldSmelter => SerfType::Smelter,
            BuildingType::ToolMaker => SerfType::Toolmaker,
            BuildingType::WeaponSmith => SerfType::WeaponSmith,
            BuildingType::Stock
            | BuildingType::Hut
            | BuildingType::Tower
            | BuildingType::Fortress
            | BuildingType::Castle => return None,
        })
    }

    /// Knight capacity of a military building.
    pub fn max_knights(self) -> usize {
        match self {
            BuildingType::Hut => 3,
            BuildingType::Tower => 6,
            BuildingType::Fortress => 12,
            BuildingType::Castle => usize::MAX,
            _ => 0,
        }
    }

    /// Planks and stones consumed by construction.
    pub fn materials(self) -> (u32, u32) {
        match self {
            BuildingType::Hut => (2, 1),
            BuildingType::Tower => (3, 2),
            BuildingType::Fortress => (5, 5),
            BuildingType::Stock => (4, 3),
            BuildingType::Castle => (0, 0),
            t if t.is_mine() => (4, 0),
            t if t.is_large() => (4, 1),
            _ => (2, 0),
        }
    }

    /// Resources accepted by the two stock slots of a finished building.
    pub fn stock_inputs(self) -> [&'static [Resource]; 2] {
        const FOOD: &[Resource] = &[Resource::Fish, Resource::Meat, Resource::Bread];
        match self {
            BuildingType::Sawmill => [&[Resource::Lumber], &[]],
            BuildingType::Mill => [&[Resource::Wheat], &[]],
            BuildingType::Baker => [&[Resource::Flour], &[]],
            BuildingType::Butcher => [&[Resource::Pig], &[]],
            BuildingType::PigFarm => [&[Resource::Wheat], &[]],
            BuildingType::Boatbuilder => [&[Resource::Plank], &[]],
            BuildingType::SteelSmelter => [&[Resource::Coal], &[Resource::IronOre]],
            BuildingType::GoldSmelter => [&[Resource::Coal], &[Resource::GoldOre]],
            BuildingType::ToolMaker => [&[Resource::Plank], &[Resource::Steel]],
            BuildingType::WeaponSmith => [&[Resource::Coal], &[Resource::Steel]],
            t if t.is_mine() => [FOOD, &[]],
            _ => [&[], &[]],
        }
    }

    /// State a worker adopts once inside.
    pub fn work_state(self) -> Option<State> {
        Some(match self {
            BuildingType::Fisher => State::PlanningFishing,
            BuildingType::Lumberjack => State::PlanningLogging,
            BuildingType::Stonecutter => State::PlanningStoneCutting,
            BuildingType::Forester => State::PlanningPlanting,
            BuildingType::Farm => State::PlanningFarming,
            BuildingType::Boatbuilder => State::BuildingBoat,
            BuildingType::Sawmill => State::Sawing,
            BuildingType::Mill => State::Milling,
            BuildingType::Baker => State::Baking,
            BuildingType::PigFarm => State::PigFarming,
            BuildingType::Butcher => State::Butchering,
            BuildingType::ToolMaker => State::MakingTool,
            BuildingType::WeaponSmith => State::MakingWeapon,
            BuildingType::SteelSmelter | BuildingType::GoldSmelter => State::Smelting,
            t if t.is_mine() => State::Mining,
            _ => return None,
        })
    }

    /// Defending state for knights stationed here.
    pub fn defending_state(self) -> Option<State> {
        match self {
            BuildingType::Hut => Some(State::DefendingHut),
            BuildingType::Tower => Some(State::DefendingTower),
            BuildingType::Fortress => Some(State::DefendingFortress),
            BuildingType::Castle => Some(State::DefendingCastle),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Stock {
    pub accepts: Vec<Resource>,
    pub available: u32,
    pub requested: u32,
    pub maximum: u32,
}

impl Stock {
    fn new(accepts: &[Resource], maximum: u32) -> Self {
        Self {
            accepts: accepts.to_vec(),
            available: 0,
            requested: 0,
            maximum,
        }
    }

    pub fn accepts(&self, resource: Resource) -> bool {
        self.accepts.contains(&resource)
    }

    /// Free room not yet covered by outstanding requests.
    pub fn missing(&self) -> u32 {
        self.maximum
            .saturating_sub(self.available + self.requested)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Building {
    pub kind: BuildingType,
    pub owner: u8,
    pub pos: MapPos,
    pub flag: FlagId,
    pub progress: u32,
    /// Site still needs a digger before construction starts.
    pub leveling: bool,
    pub stock: [Stock; 2],
    /// Worker, builder or digger currently assigned.
    pub holder: Option<SerfId>,
    pub serf_requested: bool,
    pub active: bool,
    pub pig_count: u32,
    /// Last eight mining rounds, bit set on success.
    pub mining_history: u8,
    /// Stationed knights; the front one is called out first.
    pub knights: VecDeque<SerfId>,
    pub knights_requested: u32,
    pub inventory: Option<InventoryId>,
    pub burning: bool,
    /// Alternates sword/shield output of a weapon smith.
    pub weapon_toggle: bool,
    /// Planks worked into the boat on the slip.
    pub progress_boat: u32,
}

impl Building {
    pub fn new(kind: BuildingType, owner: u8, pos: MapPos, flag: FlagId) -> Self {
        let (planks, stones) = kind.materials();
        Self {
            kind,
            owner,
            pos,
            flag,
            progress: 0,
            leveling: false,
            stock: [
                Stock::new(&[Resource::Plank], planks),
                Stock::new(&[Resource::Stone], stones),
            ],
            holder: None,
            serf_requested: false,
            active: false,
            pig_count: 0,
            mining_history: 0,
            knights: VecDeque::new(),
            knights_requested: 0,
            inventory: None,
            burning: false,
            weapon_toggle: false,
            progress_boat: 0,
        }
    }

    pub fn is_done(&self) -> bool {
        self.progress >= BUILD_DONE
    }

    pub fn build_progress(&self) -> u32 {
        self.progress
    }

    /// Add construction progress; returns true when the building completes.
    pub fn increase_progress(&mut self, amount: u32) -> bool {
        self.progress = (self.progress + amount).min(BUILD_DONE);
        if self.is_done() {
            self.finish();
            true
        } else {
            false
        }
    }

    /// Switch stocks over from construction materials to production inputs.
    pub fn finish(&mut self) {
        self.progress = BUILD_DONE;
        let inputs = self.kind.stock_inputs();
        self.stock = [Stock::new(inputs[0], 8), Stock::new(inputs[1], 8)];
        if self.kind == BuildingType::Boatbuilder {
            self.stock[0].maximum = 8;
        }
    }

    pub fn use_resource_in_stock(&mut self, index: usize) -> bool {
        let stock = &mut self.stock[index];
        if stock.available > 0 {
            stock.available -= 1;
            true
        } else {
            false
        }
    }

    /// Consume one unit from both stocks, or nothing.
    pub fn use_resources_in_stocks(&mut self) -> bool {
        if self.stock[0].available > 0 && self.stock[1].available > 0 {
            self.stock[0].available -= 1;
            self.stock[1].available -= 1;
            true
        } else {
            false
        }
    }

    /// Accept a delivered resource into the matching stock.
    pub fn deliver(&mut self, resource: Resource) -> bool {
        match self.stock.iter_mut().find(|s| s.accepts(resource)) {
            Some(stock) => {
                stock.requested = stock.requested.saturating_sub(1);
                stock.available += 1;
                true
            }
            None => false,
        }
    }

    pub fn start_activity(&mut self) {
        self.active = true;
    }

    pub fn stop_activity(&mut self) {
        self.active = false;
    }

    pub fn requested_serf_reached(&mut self, serf: SerfId) {
        self.serf_requested = false;
        self.holder = Some(serf);
    }

    pub fn requested_serf_lost(&mut self) {
        self.serf_requested = false;
    }

    pub fn first_knight(&self) -> Option<SerfId> {
        self.knights.front().copied()
    }

    pub fn has_knight_space(&self) -> bool {
        self.knights.len() < self.kind.max_knights()
    }

    pub fn requested_knight_arrived(&mut self, serf: SerfId) {
        self.knights_requested = self.knights_requested.saturating_sub(1);
        self.knight_occupy(serf);
    }

    pub fn requested_knight_defeat_on_walk(&mut self) {
        self.knights_requested = self.knights_requested.saturating_sub(1);
    }

    pub fn knight_occupy(&mut self, serf: SerfId) {
        if !self.knights.contains(&serf) {
            self.knights.push_back(serf);
        }
        self.active = true;
    }

    /// Send the first stationed knight out to meet an attacker.
    pub fn call_defender_out(&mut self) -> Option<SerfId> {
        self.knights.pop_front()
    }

    /// Release a knight for an attack, keeping at least one at home.
    pub fn call_attacker_out(&mut self) -> Option<SerfId> {
        if self.knights.len() > 1 {
            self.knights.pop_back()
        } else {
            None
        }
    }

    pub fn remove_knight(&mut self, serf: SerfId) {
        self.knights.retain(|&k| k != serf);
    }

    /// Knight after `serf` in the defender queue.
    pub fn next_knight(&self, serf: SerfId) -> Option<SerfId> {
        let at = self.knights.iter().position(|&k| k == serf)?;
        self.knights.get(at + 1).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hut() -> Building {
        Building::new(BuildingType::Hut, 0, 40, FlagId(1))
    }

    #[test]
    fn test_progress_completes_and_switches_stock() {
        let mut b = Building::new(BuildingType::Sawmill, 0, 40, FlagId(1));
        assert!(b.stock[0].accepts(Resource::Plank));
        assert!(!b.increase_progress(BUILD_DONE / 2));
        assert!(b.increase_progress(BUILD_DONE));
        assert!(b.is_done());
        assert!(b.stock[0].accepts(Resource::Lumber));
    }

    #[test]
    fn test_use_resources_needs_both_stocks() {
        let mut b = Building::new(BuildingType::SteelSmelter, 0, 40, FlagId(1));
        b.finish();
        assert!(b.deliver(Resource::Coal));
        assert!(!b.use_resources_in_stocks());
        assert!(b.deliver(Resource::IronOre));
        assert!(b.use_resources_in_stocks());
        assert_eq!(b.stock[0].available, 0);
    }

    #[test]
    fn test_defender_queue_order() {
        let mut b = hut();
        b.knight_occupy(SerfId(3));
        b.knight_occupy(SerfId(7));
        b.knight_occupy(SerfId(5));
        assert_eq!(b.next_knight(SerfId(3)), Some(SerfId(7)));
        assert_eq!(b.next_knight(SerfId(5)), None);
        assert_eq!(b.call_defender_out(), Some(SerfId(3)));
        assert_eq!(b.first_knight(), Some(SerfId(7)));
        assert_eq!(b.call_attacker_out(), Some(SerfId(5)));
        assert_eq!(b.call_attacker_out(), None);
    }

    #[test]
    fn test_hut_capacity() {
        let mut b = hut();
        for i in 1..=3 {
            assert!(b.has_knight_space());
            b.knight_occupy(SerfId(i));
        }
        assert!(!b.has_knight_space());
    }
}
