//! Supply side of the economy: staffing buildings and roads from
//! inventories, ordering construction materials and production inputs, and
//! routing resources that sit on flags.

use crate::arena::{BuildingId, FlagId, InventoryId, SerfId};
use crate::building::BuildingType;
use crate::map::Direction;
use crate::resource::Resource;
use crate::serf::{ReadyToLeaveInventoryData, SerfType, State, StateData, DIR1_REQUESTED};
use crate::Game;

/// What a building is short of this pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Need {
    Serf(SerfType),
    Knight,
    Stock(usize),
}

impl Game {
    /// Idle serf of `kind` in `inventory`, or a generic one that can be
    /// handed the tools for the job.
    fn take_serf(&mut self, inventory: InventoryId, kind: SerfType) -> Option<SerfId> {
        let idle_in = |game: &Game, want: &dyn Fn(SerfType) -> bool| {
            game.serfs.iter().find_map(|(id, s)| {
                let here = s.state == State::IdleInStock
                    && s.data.as_idle_in_stock().and_then(|d| d.inventory) == Some(inventory);
                (here && want(s.kind)).then_some(id)
            })
        };
        let found = if kind.is_knight() {
            idle_in(self, &|k: SerfType| k.is_knight())
        } else {
            idle_in(self, &|k: SerfType| k == kind)
        };
        if found.is_some() {
            return found;
        }

        let tools = kind.tools();
        let inv = self.inventories.get(inventory)?;
        if !tools.iter().all(|&t| inv.count(t) > 0) {
            return None;
        }
        let generic = idle_in(self, &|k: SerfType| k == SerfType::Generic)?;
        let inv = self.inventories.get_mut(inventory)?;
        for &tool in tools {
            inv.take_resource(tool);
        }
        let owner = self.serfs.get(generic)?.owner;
        if let Some(player) = self.player_mut(owner) {
            player.decrease_serf_count(SerfType::Generic);
            player.increase_serf_count(kind);
        }
        self.serfs.get_mut(generic)?.kind = kind;
        log::debug!("serf {}: trained as {:?} in {}", generic, kind, inventory);
        Some(generic)
    }

    /// Release a serf of `kind` from `inventory` towards `dest`. `mode` is the
    /// job code it carries in `dir1` once it is walking.
    pub fn send_serf_from_inventory(
        &mut self,
        inventory: InventoryId,
        kind: SerfType,
        dest: FlagId,
        mode: i32,
    ) -> Option<SerfId> {
        let serf = self.take_serf(inventory, kind)?;
        let data = StateData::ReadyToLeaveInventory(ReadyToLeaveInventoryData {
            mode,
            dest: Some(dest),
            inventory: Some(inventory),
        });
        self.set_serf_state_with(serf, State::ReadyToLeaveInventory, data).ok()?;
        self.wait_one_tick(serf).ok()?;
        log::debug!("serf {}: leaves {} for {} (mode {})", serf, inventory, dest, mode);
        Some(serf)
    }

    fn nearest_serf_source(&self, flag: FlagId) -> Option<InventoryId> {
        let inv_flag = self.find_nearest_inventory_for_serf(flag)?;
        self.flags.get(inv_flag)?.inventory
    }

    /// Lowest-numbered inventory of `owner` holding `res` and reachable
    /// from `flag` by road.
    fn resource_source(&self, owner: u8, res: Resource, flag: FlagId) -> Option<InventoryId> {
        self.inventories
            .iter()
            .filter(|(_, inv)| inv.owner == owner && inv.count(res) > 0)
            .find(|(_, inv)| self.flags_connected(inv.flag, flag))
            .map(|(id, _)| id)
    }

    fn building_needs(&self, id: BuildingId) -> Vec<Need> {
        let Some(b) = self.buildings.get(id) else {
            return Vec::new();
        };
        let mut needs = Vec::new();
        if b.burning || b.inventory.is_some() {
            return needs;
        }
        let unstaffed = b.holder.is_none() && !b.serf_requested;
        if !b.is_done() {
            if unstaffed {
                needs.push(Need::Serf(if b.leveling {
                    SerfType::Digger
                } else {
                    SerfType::Builder
                }));
            }
        } else if let Some(worker) = b.kind.worker() {
            if unstaffed {
                needs.push(Need::Serf(worker));
            }
        }
        if b.is_done() && b.kind.is_military() {
            let manned = b.knights.len() + b.knights_requested as usize;
            if manned < b.kind.max_knights() {
                needs.push(Need::Knight);
            }
        }
        if !b.leveling {
            needs.extend((0..2).filter(|&i| b.stock[i].missing() > 0).map(Need::Stock));
        }
        needs
    }

    fn fill_stock(&mut self, id: BuildingId, index: usize) {
        let Some(b) = self.buildings.get(id) else {
            return;
        };
        let (owner, flag) = (b.owner, b.flag);
        let accepts = b.stock[index].accepts.clone();
        for res in accepts {
            while self.buildings.get(id).is_some_and(|b| b.stock[index].missing() > 0) {
                let Some(source) = self.resource_source(owner, res, flag) else {
                    break;
                };
                let sent = self
                    .inventories
                    .get_mut(source)
                    .is_some_and(|inv| inv.send_resource(res, flag));
                if !sent {
                    break;
                }
                if let Some(b) = self.buildings.get_mut(id) {
                    b.stock[index].requested += 1;
                }
                log::trace!("{} ordered from {} for {}", res, source, id);
            }
        }
    }

    /// Staff roads that have no transporter.
    fn staff_roads(&mut self) {
        let mut open: Vec<(FlagId, Direction)> = Vec::new();
        for (id, flag) in self.flags.iter() {
            for d in Direction::ALL {
                let Some(link) = flag.link(d) else { continue };
                let this_end = id < link.other || (id == link.other && d < link.other_dir);
                let served = link.transporter.is_some() || link.serf_requested;
                let other_requested = self
                    .flags
                    .get(link.other)
                    .is_some_and(|f| f.serf_requested(link.other_dir));
                if this_end && !served && !other_requested {
                    open.push((id, d));
                }
            }
        }
        for (flag, d) in open {
            let Some(inventory) = self.nearest_serf_source(flag) else {
                continue;
            };
            let mode = d.index() as i32;
            if self
                .send_serf_from_inventory(inventory, SerfType::Transporter, flag, mode)
                .is_some()
            {
                if let Some(f) = self.flags.get_mut(flag) {
                    f.request_serf(d);
                }
            }
        }
    }

    /// One pass over every outstanding need of every building and road.
    #[tracing::instrument(skip_all)]
    pub fn update_requests(&mut self) {
        for id in self.buildings.ids() {
            for need in self.building_needs(id) {
                let Some(flag) = self.buildings.get(id).map(|b| b.flag) else {
                    break;
                };
                match need {
                    Need::Stock(index) => self.fill_stock(id, index),
                    Need::Serf(kind) => {
                        let Some(inv) = self.nearest_serf_source(flag) else {
                            continue;
                        };
                        if self
                            .send_serf_from_inventory(inv, kind, flag, DIR1_REQUESTED)
                            .is_some()
                        {
                            if let Some(b) = self.buildings.get_mut(id) {
                                b.serf_requested = true;
                            }
                        }
                    }
                    Need::Knight => {
                        let Some(inv) = self.nearest_serf_source(flag) else {
                            continue;
                        };
                        if self
                            .send_serf_from_inventory(inv, SerfType::Knight0, flag, DIR1_REQUESTED)
                            .is_some()
                        {
                            if let Some(b) = self.buildings.get_mut(id) {
                                b.knights_requested += 1;
                            }
                        }
                    }
                }
            }
        }
        self.staff_roads();

        let waiting: Vec<FlagId> = self
            .flags
            .iter()
            .filter(|(_, f)| f.slots.iter().any(|s| s.resource.is_some() && s.dir.is_none()))
            .map(|(id, _)| id)
            .collect();
        for flag in waiting {
            self.schedule_slots(flag);
        }
    }

    /// Building of `owner` reachable from `flag` that still has room for `res`.
    fn resource_consumer(&mut self, owner: u8, res: Resource, flag: FlagId) -> Option<FlagId> {
        let target = self
            .buildings
            .iter()
            .filter(|(_, b)| b.owner == owner && b.inventory.is_none() && !b.leveling)
            .filter(|(_, b)| b.kind != BuildingType::Castle || b.is_done())
            .find(|(_, b)| {
                b.stock
                    .iter()
                    .any(|s| s.accepts(res) && s.missing() > 0)
                    && b.flag != flag
                    && self.flags_connected(flag, b.flag)
            })
            .map(|(id, _)| id)?;
        let b = self.buildings.get_mut(target)?;
        let stock = b.stock.iter_mut().find(|s| s.accepts(res) && s.missing() > 0)?;
        stock.requested += 1;
        Some(b.flag)
    }

    /// Give every unrouted resource on `flag` a destination and an outgoing
    /// road. Resources with nowhere to go stay unrouted for a later pass.
    pub(crate) fn schedule_slots(&mut self, flag: FlagId) {
        let Some(owner) = self.flags.get(flag).map(|f| f.owner) else {
            return;
        };
        for slot in 0..crate::flag::FLAG_MAX_RES {
            let Some(s) = self.flags.get(flag).map(|f| f.slots[slot]) else {
                return;
            };
            let Some(res) = s.resource.filter(|_| s.dir.is_none()) else {
                continue;
            };
            let dest = match s.dest.filter(|&d| self.flags.contains(d)) {
                Some(dest) => Some(dest),
                None => self
                    .resource_consumer(owner, res, flag)
                    .or_else(|| self.find_nearest_inventory_for_resource(flag)),
            };
            let Some(dest) = dest else {
                continue;
            };
            if dest == flag {
                self.deliver_in_place(flag, slot, res);
                continue;
            }
            let Some(dir) = self.find_direction_to(flag, dest) else {
                if let Some(f) = self.flags.get_mut(flag) {
                    f.slots[slot].dest = Some(dest);
                }
                continue;
            };
            if let Some(f) = self.flags.get_mut(flag) {
                f.slots[slot].dest = Some(dest);
                f.slots[slot].dir = Some(dir);
            }
            log::trace!("{} at {} routed {:?} towards {}", res, flag, dir, dest);
            if let Err(err) = self.wake_transporter(flag, dir) {
                log::error!("schedule_slots: {}", err);
            }
        }
    }

    /// A resource already lying on the flag of the building that wants it.
    fn deliver_in_place(&mut self, flag: FlagId, slot: usize, res: Resource) {
        let Some(f) = self.flags.get(flag) else {
            return;
        };
        let (building, inventory) = (f.building, f.inventory);
        let taken = match inventory.and_then(|i| self.inventories.get_mut(i)) {
            Some(inv) => {
                inv.push_resource(res);
                true
            }
            None => building
                .and_then(|b| self.buildings.get_mut(b))
                .is_some_and(|b| b.deliver(res)),
        };
        if taken {
            if let Some(f) = self.flags.get_mut(flag) {
                f.pick_up_resource(slot);
            }
            log::trace!("{} handed into the building at {}", res, flag);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::Direction::*;
    use crate::testing::GameBuilder;

    #[test]
    fn test_generic_serf_trained_with_tools() {
        let mut builder = GameBuilder::new().with_player();
        let (_, inv) = builder.castle(0, 6, 6);
        let mut game = builder.build();
        let flag = game.get_inventory(inv).unwrap().flag;
        game.add_serfs_to_inventory(inv, SerfType::Generic, 2);

        assert!(game.send_serf_from_inventory(inv, SerfType::Lumberjack, flag, DIR1_REQUESTED).is_none());
        game.add_resources_to_inventory(inv, Resource::Axe, 1);
        let serf = game
            .send_serf_from_inventory(inv, SerfType::Lumberjack, flag, DIR1_REQUESTED)
            .unwrap();
        let serf = game.get_serf(serf).unwrap();
        assert_eq!(serf.kind, SerfType::Lumberjack);
        assert_eq!(serf.state, State::ReadyToLeaveInventory);
        assert_eq!(game.get_inventory(inv).unwrap().count(Resource::Axe), 0);
    }

    #[test]
    fn test_new_road_gets_a_transporter() {
        let mut builder = GameBuilder::new().with_player();
        let (castle, inv) = builder.castle(0, 6, 6);
        let mut game = builder.build();
        let start = game.get_building(castle).unwrap().flag;
        let end = game.build_flag(0, game.map.pos(10, 7)).unwrap();
        game.build_road(start, &[Right, Right, Right]).unwrap();
        game.add_serfs_to_inventory(inv, SerfType::Transporter, 1);

        game.update_requests();
        assert!(game.get_flag(start).unwrap().serf_requested(Right));
        for _ in 0..2_000 {
            game.update().unwrap();
        }
        let transporter = game.get_flag(start).unwrap().transporter(Right);
        assert!(transporter.is_some());
        assert_eq!(game.get_flag(end).unwrap().transporter(Left), transporter);
    }

    #[test]
    fn test_construction_site_orders_builder_and_materials() {
        let mut builder = GameBuilder::new().with_player();
        let (castle, inv) = builder.castle(0, 6, 6);
        let mut game = builder.build();
        let start = game.get_building(castle).unwrap().flag;
        let site = game.build_building(0, game.map.pos(9, 6), BuildingType::Lumberjack).unwrap();
        if let Some(b) = game.buildings.get_mut(site) {
            b.leveling = false;
        }
        let site_flag = game.get_building(site).unwrap().flag;
        game.build_road(start, &[Right, Right, Right]).unwrap();
        assert_eq!(game.get_flag(site_flag).unwrap().pos, game.map.pos(10, 7));
        game.add_serfs_to_inventory(inv, SerfType::Builder, 1);
        game.add_resources_to_inventory(inv, Resource::Plank, 5);

        game.update_requests();
        let b = game.get_building(site).unwrap();
        assert!(b.serf_requested);
        assert_eq!(b.stock[0].requested, 2);
        assert_eq!(game.get_inventory(inv).unwrap().out_queue.len(), 2);
    }

    #[test]
    fn test_unroutable_resource_stays_put() {
        let mut builder = GameBuilder::new().with_player();
        let flag = builder.flag(0, 8, 8);
        let mut game = builder.build();
        game.flags.get_mut(flag).unwrap().drop_resource(Resource::Stone, None);

        game.schedule_slots(flag);
        let slot = game.get_flag(flag).unwrap().slots[0];
        assert_eq!(slot.resource, Some(Resource::Stone));
        assert_eq!(slot.dir, None);
    }
}
