use crate::arena::{BuildingId, FlagId};
use crate::resource::{Resource, ResourceCounts};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Stock of a castle or storehouse.
///
/// Idle serfs are not counted here: they are live serfs in `IdleInStock`
/// pointing back at the inventory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Inventory {
    pub owner: u8,
    pub flag: FlagId,
    pub building: BuildingId,
    pub resources: ResourceCounts,
    /// Resources waiting to be carried out, with their destination flag.
    pub out_queue: VecDeque<(Resource, FlagId)>,
}

impl Inventory {
    pub fn new(owner: u8, flag: FlagId, building: BuildingId) -> Self {
        Self {
            owner,
            flag,
            building,
            resources: [0; Resource::COUNT],
            out_queue: VecDeque::new(),
        }
    }

    pub fn count(&self, resource: Resource) -> u32 {
        self.resources[resource.code() as usize]
    }

    pub fn push_resource(&mut self, resource: Resource) {
        self.resources[resource.code() as usize] += 1;
    }

    pub fn take_resource(&mut self, resource: Resource) -> bool {
        let count = &mut self.resources[resource.code() as usize];
        if *count > 0 {
            *count -= 1;
            true
        } else {
            false
        }
    }

    /// Queue a resource for release towards `dest`.
    pub fn send_resource(&mut self, resource: Resource, dest: FlagId) -> bool {
        if self.take_resource(resource) {
            self.out_queue.push_back((resource, dest));
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_resource_requires_stock() {
        let mut inv = Inventory::new(0, FlagId(1), BuildingId(1));
        assert!(!inv.send_resource(Resource::Plank, FlagId(2)));
        inv.push_resource(Resource::Plank);
        assert!(inv.send_resource(Resource::Plank, FlagId(2)));
        assert_eq!(inv.count(Resource::Plank), 0);
        assert_eq!(inv.out_queue.front(), Some(&(Resource::Plank, FlagId(2))));
    }
}
