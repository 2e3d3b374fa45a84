use crate::arena::BuildingId;
use crate::map::MapPos;
use crate::resource::{Resource, ResourceCounts};
use crate::serf::SerfType;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NotificationKind {
    UnderAttack,
    LostFight,
    VictoryFight,
    LostBuilding,
    CapturedBuilding,
    FoundGold,
    FoundIron,
    FoundCoal,
    FoundStone,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub pos: MapPos,
    pub tick: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Player {
    pub index: u8,
    /// Fighting strength on foreign land, 0x1000 = neutral.
    pub knight_morale: u32,
    pub resource_count: ResourceCounts,
    pub serf_count: [u32; SerfType::COUNT],
    pub military_score: i32,
    pub castle: Option<BuildingId>,
    /// Relative weights for the toolmaker, indexed like [`Resource::TOOLS`].
    pub tool_priorities: [u16; 9],
    pub notifications: Vec<Notification>,
}

impl Player {
    pub fn new(index: u8, knight_morale: u32) -> Self {
        Self {
            index,
            knight_morale,
            resource_count: [0; Resource::COUNT],
            serf_count: [0; SerfType::COUNT],
            military_score: 0,
            castle: None,
            tool_priorities: [1; 9],
            notifications: Vec::new(),
        }
    }

    pub fn increase_resource_count(&mut self, resource: Resource) {
        self.resource_count[resource.code() as usize] += 1;
    }

    pub fn increase_serf_count(&mut self, kind: SerfType) {
        self.serf_count[kind as usize] += 1;
    }

    pub fn decrease_serf_count(&mut self, kind: SerfType) {
        let count = &mut self.serf_count[kind as usize];
        *count = count.saturating_sub(1);
    }

    pub fn increase_military_score(&mut self, amount: i32) {
        self.military_score += amount;
    }

    pub fn decrease_military_score(&mut self, amount: i32) {
        self.military_score -= amount;
    }

    pub fn add_notification(&mut self, kind: NotificationKind, pos: MapPos, tick: u32) {
        self.notifications.push(Notification { kind, pos, tick });
    }
}
