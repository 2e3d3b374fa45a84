//! Road network nodes.
//!
//! A flag links up to six roads, one per direction, and queues up to
//! [`FLAG_MAX_RES`] resources waiting for a transporter. A slot with a
//! direction set is "scheduled": the transporter of that road picks it up
//! next time it stands on the flag.

use crate::arena::{Arena, BuildingId, FlagId, InventoryId, SerfId};
use crate::map::{Direction, MapPos};
use crate::resource::Resource;
use game_pathfinding::Graph;
use serde::{Deserialize, Serialize};

pub const FLAG_MAX_RES: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoadLink {
    pub other: FlagId,
    /// Direction of this road as seen from `other`.
    pub other_dir: Direction,
    /// Number of steps between the two flags.
    pub length: u32,
    pub transporter: Option<SerfId>,
    pub serf_requested: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceSlot {
    pub resource: Option<Resource>,
    pub dest: Option<FlagId>,
    /// Outgoing road the resource waits for; `None` until routed.
    pub dir: Option<Direction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Flag {
    pub owner: u8,
    pub pos: MapPos,
    pub links: [Option<RoadLink>; 6],
    pub slots: [ResourceSlot; FLAG_MAX_RES],
    pub building: Option<BuildingId>,
    pub inventory: Option<InventoryId>,
    pub accepts_serfs: bool,
    pub accepts_resources: bool,
}

impl Flag {
    pub fn new(owner: u8, pos: MapPos) -> Self {
        Self {
            owner,
            pos,
            links: [None; 6],
            slots: [ResourceSlot::default(); FLAG_MAX_RES],
            building: None,
            inventory: None,
            accepts_serfs: false,
            accepts_resources: false,
        }
    }

    pub fn link(&self, dir: Direction) -> Option<&RoadLink> {
        self.links[dir.index()].as_ref()
    }

    pub fn link_mut(&mut self, dir: Direction) -> Option<&mut RoadLink> {
        self.links[dir.index()].as_mut()
    }

    pub fn has_road(&self, dir: Direction) -> bool {
        self.links[dir.index()].is_some()
    }

    pub fn other_end_flag(&self, dir: Direction) -> Option<FlagId> {
        self.link(dir).map(|l| l.other)
    }

    pub fn other_end_dir(&self, dir: Direction) -> Option<Direction> {
        self.link(dir).map(|l| l.other_dir)
    }

    pub fn has_inventory(&self) -> bool {
        self.inventory.is_some()
    }

    /// A resource is waiting for pickup along road `dir`.
    pub fn is_scheduled(&self, dir: Direction) -> bool {
        self.scheduled_slot(dir).is_some()
    }

    /// Slot to pick up next along `dir`: the lowest scheduled slot.
    pub fn scheduled_slot(&self, dir: Direction) -> Option<usize> {
        self.slots
            .iter()
            .position(|s| s.resource.is_some() && s.dir == Some(dir))
    }

    pub fn has_empty_slot(&self) -> bool {
        self.slots.iter().any(|s| s.resource.is_none())
    }

    pub fn resource_count(&self) -> usize {
        self.slots.iter().filter(|s| s.resource.is_some()).count()
    }

    pub fn pick_up_resource(&mut self, slot: usize) -> Option<(Resource, Option<FlagId>)> {
        let taken = std::mem::take(&mut self.slots[slot]);
        taken.resource.map(|r| (r, taken.dest))
    }

    /// Put a resource in the first empty slot, unrouted. Returns the slot.
    pub fn drop_resource(&mut self, resource: Resource, dest: Option<FlagId>) -> Option<usize> {
        let slot = self.slots.iter().position(|s| s.resource.is_none())?;
        self.slots[slot] = ResourceSlot {
            resource: Some(resource),
            dest,
            dir: None,
        };
        Some(slot)
    }

    /// Swap a carried resource into the scheduled slot for `dir`, returning
    /// the resource that was waiting there. The swapped-in resource is left
    /// unrouted so the next scheduling pass can send it on its way.
    pub fn swap_resource(
        &mut self,
        dir: Direction,
        carried: Resource,
        carried_dest: Option<FlagId>,
    ) -> Option<(Resource, Option<FlagId>)> {
        let slot = self.scheduled_slot(dir)?;
        let taken = self.pick_up_resource(slot);
        self.slots[slot] = ResourceSlot {
            resource: Some(carried),
            dest: carried_dest,
            dir: None,
        };
        taken
    }

    /// Move the slots still waiting along `dir` to the front of the queue so
    /// they keep their pickup order after a slot was vacated.
    pub fn prioritize_pickup(&mut self, dir: Direction) {
        let (mut waiting, rest): (Vec<ResourceSlot>, Vec<ResourceSlot>) = self
            .slots
            .iter()
            .copied()
            .filter(|s| s.resource.is_some())
            .partition(|s| s.dir == Some(dir));
        waiting.extend(rest);
        waiting.resize(FLAG_MAX_RES, ResourceSlot::default());
        for (slot, value) in self.slots.iter_mut().zip(waiting) {
            *slot = value;
        }
    }

    pub fn serf_requested(&self, dir: Direction) -> bool {
        self.link(dir).is_some_and(|l| l.serf_requested)
    }

    pub fn request_serf(&mut self, dir: Direction) {
        if let Some(link) = self.link_mut(dir) {
            link.serf_requested = true;
        }
    }

    pub fn cancel_serf_request(&mut self, dir: Direction) {
        if let Some(link) = self.link_mut(dir) {
            link.serf_requested = false;
        }
    }

    /// Register `serf` as the road's transporter. Fails if the road is gone
    /// or already served.
    pub fn complete_serf_request(&mut self, dir: Direction, serf: SerfId) -> bool {
        match self.link_mut(dir) {
            Some(link) if link.transporter.is_none() => {
                link.serf_requested = false;
                link.transporter = Some(serf);
                true
            }
            _ => false,
        }
    }

    pub fn transporter(&self, dir: Direction) -> Option<SerfId> {
        self.link(dir).and_then(|l| l.transporter)
    }

    /// Road direction served by `serf`, if any.
    pub fn transporter_to_serve(&self, serf: SerfId) -> Option<Direction> {
        Direction::ALL
            .into_iter()
            .find(|&d| self.transporter(d) == Some(serf))
    }

    /// Unroute every slot waiting along `dir` (the road was removed).
    pub fn unschedule(&mut self, dir: Direction) {
        for slot in self.slots.iter_mut().filter(|s| s.dir == Some(dir)) {
            slot.dir = None;
        }
    }
}

/// Read-only view of the flag arena as a search graph.
///
/// Neighbours are listed in direction order, which makes the first-found
/// result of a breadth-first search follow the direction cycle.
pub struct FlagNetwork<'a> {
    pub flags: &'a Arena<FlagId, Flag>,
}

impl Graph<FlagId, ()> for FlagNetwork<'_> {
    fn neighbors(&self, node: FlagId, _context: &()) -> Vec<FlagId> {
        match self.flags.get(node) {
            Some(flag) => flag.links.iter().flatten().map(|l| l.other).collect(),
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drop_and_schedule() {
        let mut flag = Flag::new(0, 10);
        let slot = flag.drop_resource(Resource::Plank, None).unwrap();
        assert!(!flag.is_scheduled(Direction::Right));
        flag.slots[slot].dir = Some(Direction::Right);
        assert!(flag.is_scheduled(Direction::Right));
        assert_eq!(flag.scheduled_slot(Direction::Right), Some(slot));
    }

    #[test]
    fn test_full_flag_rejects_drop() {
        let mut flag = Flag::new(0, 10);
        for _ in 0..FLAG_MAX_RES {
            assert!(flag.drop_resource(Resource::Stone, None).is_some());
        }
        assert!(!flag.has_empty_slot());
        assert!(flag.drop_resource(Resource::Stone, None).is_none());
    }

    #[test]
    fn test_swap_keeps_carried_resource_on_flag() {
        let mut flag = Flag::new(0, 10);
        let slot = flag.drop_resource(Resource::Fish, Some(FlagId(4))).unwrap();
        flag.slots[slot].dir = Some(Direction::Left);
        let taken = flag.swap_resource(Direction::Left, Resource::Coal, Some(FlagId(9)));
        assert_eq!(taken, Some((Resource::Fish, Some(FlagId(4)))));
        assert_eq!(flag.slots[slot].resource, Some(Resource::Coal));
        assert_eq!(flag.slots[slot].dir, None);
    }

    #[test]
    fn test_prioritize_pickup_moves_waiting_slots_first() {
        let mut flag = Flag::new(0, 10);
        flag.drop_resource(Resource::Fish, None);
        flag.drop_resource(Resource::Coal, None);
        flag.drop_resource(Resource::Stone, None);
        flag.slots[2].dir = Some(Direction::Up);
        flag.slots[0].resource = None;
        flag.prioritize_pickup(Direction::Up);
        assert_eq!(flag.slots[0].resource, Some(Resource::Stone));
        assert_eq!(flag.slots[1].resource, Some(Resource::Coal));
        assert_eq!(flag.resource_count(), 2);
    }

    #[test]
    fn test_complete_serf_request_only_once() {
        let mut flag = Flag::new(0, 10);
        flag.links[0] = Some(RoadLink {
            other: FlagId(2),
            other_dir: Direction::Left,
            length: 3,
            transporter: None,
            serf_requested: true,
        });
        assert!(flag.complete_serf_request(Direction::Right, SerfId(5)));
        assert!(!flag.complete_serf_request(Direction::Right, SerfId(6)));
        assert_eq!(flag.transporter_to_serve(SerfId(5)), Some(Direction::Right));
    }
}
