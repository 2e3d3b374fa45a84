//! Construction and destruction of flags, roads and buildings.
//!
//! These are the lifecycle callbacks that fire between ticks. They never
//! leave a serf pointing at something that is gone: serfs caught inside are
//! sent into `EscapeBuilding`, serfs on a removed road or heading for a
//! removed building are sent into `Lost`.

use crate::arena::{BuildingId, FlagId, Id, InventoryId, SerfId};
use crate::building::{Building, BuildingType};
use crate::flag::{Flag, RoadLink};
use crate::inventory::Inventory;
use crate::map::{Direction, MapObject, MapPos};
use crate::player::NotificationKind;
use crate::resource::Resource;
use crate::serf::{
    BuildingCastleData, IdleInStockData, SerfType, State, StateData, DIR1_REQUESTED,
};
use crate::Game;

/// Spiral entries claimed as territory around a new castle.
const CASTLE_TERRITORY: usize = 127;

impl Game {
    pub fn build_flag(&mut self, owner: u8, pos: MapPos) -> Option<FlagId> {
        if self.map.object(pos) != MapObject::None || !self.map.is_passable(pos) {
            return None;
        }
        let id = self.flags.allocate(Flag::new(owner, pos));
        self.map.set_object(pos, MapObject::Flag, id.index());
        self.map.set_owner(pos, Some(owner));
        Some(id)
    }

    /// Place a construction site and its flag (reusing an existing flag).
    pub fn build_building(
        &mut self,
        owner: u8,
        pos: MapPos,
        kind: BuildingType,
    ) -> Option<BuildingId> {
        if kind == BuildingType::Castle
            || self.map.object(pos) != MapObject::None
            || !self.map.is_passable(pos)
        {
            return None;
        }
        let flag_pos = self.flag_pos_of(pos);
        let flag = match self.flag_at(flag_pos) {
            Some(flag) => {
                if self.flags.get(flag)?.building.is_some() {
                    return None;
                }
                flag
            }
            None => self.build_flag(owner, flag_pos)?,
        };
        let mut building = Building::new(kind, owner, pos, flag);
        let h = self.map.height(pos);
        building.leveling = Direction::ALL
            .into_iter()
            .filter(|&d| d != Direction::DownRight)
            .any(|d| self.map.height(self.map.move_dir(pos, d)) != h);
        let id = self.buildings.allocate(building);
        let object = if kind.is_large() {
            MapObject::LargeBuilding
        } else {
            MapObject::SmallBuilding
        };
        self.map.set_object(pos, object, id.index());
        self.map.set_owner(pos, Some(owner));
        if let Some(flag) = self.flags.get_mut(flag) {
            flag.building = Some(id);
        }
        log::debug!("building {} ({:?}) placed at {}", id, kind, pos);
        Some(id)
    }

    /// Found a player's castle with its inventory, castle builder and
    /// inventory transporter. Returns the castle and its inventory.
    pub fn found_colony(&mut self, owner: u8, pos: MapPos) -> Option<(BuildingId, InventoryId)> {
        if self.map.object(pos) != MapObject::None || !self.map.is_passable(pos) {
            return None;
        }
        let flag_pos = self.flag_pos_of(pos);
        let flag = self.build_flag(owner, flag_pos)?;
        let id = self
            .buildings
            .allocate(Building::new(BuildingType::Castle, owner, pos, flag));
        let inventory = self.inventories.allocate(Inventory::new(owner, flag, id));
        self.map.set_object(pos, MapObject::Castle, id.index());
        for n in 0..CASTLE_TERRITORY {
            let p = self.map.position_add_spirally(pos, n);
            if !self.map.has_owner(p) {
                self.map.set_owner(p, Some(owner));
            }
        }
        if let Some(b) = self.buildings.get_mut(id) {
            b.inventory = Some(inventory);
        }
        if let Some(f) = self.flags.get_mut(flag) {
            f.building = Some(id);
            f.inventory = Some(inventory);
            f.accepts_serfs = true;
            f.accepts_resources = true;
        }
        if let Some(player) = self.player_mut(owner) {
            player.castle = Some(id);
        }

        let builder = self.create_serf(owner, SerfType::Builder, pos);
        let data = StateData::BuildingCastle(BuildingCastleData {
            inventory: Some(inventory),
        });
        self.set_serf_state_with(builder, State::BuildingCastle, data)
            .ok()?;
        if let Some(b) = self.buildings.get_mut(id) {
            b.holder = Some(builder);
        }

        let carrier = self.create_serf(owner, SerfType::TransporterInventory, pos);
        self.set_serf_state(carrier, State::WaitForResourceOut).ok()?;
        Some((id, inventory))
    }

    /// Add idle serfs to an inventory.
    pub fn add_serfs_to_inventory(
        &mut self,
        inventory: InventoryId,
        kind: SerfType,
        count: u32,
    ) -> Vec<SerfId> {
        let Some(inv) = self.inventories.get(inventory) else {
            return Vec::new();
        };
        let (owner, building) = (inv.owner, inv.building);
        let pos = self.buildings.get(building).map(|b| b.pos).unwrap_or(0);
        (0..count)
            .filter_map(|_| {
                let id = self.create_serf(owner, kind, pos);
                let data = StateData::IdleInStock(IdleInStockData {
                    inventory: Some(inventory),
                });
                self.set_serf_state_with(id, State::IdleInStock, data)
                    .ok()
                    .map(|_| id)
            })
            .collect()
    }

    pub fn add_resources_to_inventory(&mut self, inventory: InventoryId, resource: Resource, count: u32) {
        if let Some(inv) = self.inventories.get_mut(inventory) {
            for _ in 0..count {
                inv.push_resource(resource);
            }
        }
    }

    /// Lay a road from `start` following `dirs`. The last step lands on
    /// another flag, or on free ground where a new flag is placed. Returns
    /// the end flag.
    pub fn build_road(&mut self, start: FlagId, dirs: &[Direction]) -> Option<FlagId> {
        if dirs.len() < 2 {
            return None;
        }
        let (&first, &last) = (dirs.first()?, dirs.last()?);
        let start_flag = self.flags.get(start)?;
        let owner = start_flag.owner;
        if start_flag.has_road(first)
            || (first == Direction::UpLeft && start_flag.building.is_some())
        {
            return None;
        }
        let mut pos = start_flag.pos;
        let mut cells = Vec::with_capacity(dirs.len());
        for &d in dirs {
            pos = self.map.move_dir(pos, d);
            if self.map.has_flag(pos) {
                break;
            }
            if self.map.paths(pos) != 0 || !self.map.is_passable(pos) {
                return None;
            }
            cells.push(pos);
        }
        if self.map.has_flag(pos) {
            if cells.len() + 1 != dirs.len() {
                return None;
            }
            cells.push(pos);
        }
        let end_dir = last.reverse();
        if let Some(end) = self.flag_at(pos) {
            let end_flag = self.flags.get(end)?;
            if end == start
                || end_flag.has_road(end_dir)
                || (end_dir == Direction::UpLeft && end_flag.building.is_some())
            {
                return None;
            }
        } else if self.map.object(pos) != MapObject::None {
            return None;
        }
        let end = match self.flag_at(pos) {
            Some(end) => end,
            None => self.build_flag(owner, pos)?,
        };

        let mut from = self.flags.get(start)?.pos;
        for (&d, &to) in dirs.iter().zip(&cells) {
            self.map.add_path(from, d);
            self.map.add_path(to, d.reverse());
            from = to;
        }
        let length = dirs.len() as u32;
        if let Some(flag) = self.flags.get_mut(start) {
            flag.links[first.index()] = Some(RoadLink {
                other: end,
                other_dir: end_dir,
                length,
                transporter: None,
                serf_requested: false,
            });
        }
        if let Some(flag) = self.flags.get_mut(end) {
            flag.links[end_dir.index()] = Some(RoadLink {
                other: start,
                other_dir: first,
                length,
                transporter: None,
                serf_requested: false,
            });
        }
        log::debug!("road {} {:?} -> {} ({} steps)", start, first, end, length);
        Some(end)
    }

    /// Cells of the road leaving `flag` in `dir`, ending with the far flag.
    pub fn road_cells(&self, flag: FlagId, dir: Direction) -> Vec<MapPos> {
        let Some(f) = self.flags.get(flag) else {
            return Vec::new();
        };
        let Some(link) = f.link(dir) else {
            return Vec::new();
        };
        let mut cells = Vec::new();
        let mut pos = self.map.move_dir(f.pos, dir);
        let mut d = dir;
        cells.push(pos);
        while !self.map.has_flag(pos) && (cells.len() as u32) < link.length {
            let Some(next) = self.map.path_continuation(pos, d) else {
                break;
            };
            pos = self.map.move_dir(pos, next);
            d = next;
            cells.push(pos);
        }
        cells
    }

    /// Tear down a road. Serfs standing on it or serving it become lost and
    /// resources waiting for it are unrouted.
    pub fn remove_road(&mut self, flag: FlagId, dir: Direction) -> bool {
        let Some(link) = self.flags.get(flag).and_then(|f| f.link(dir).copied()) else {
            return false;
        };
        let cells = self.road_cells(flag, dir);
        let Some(start_pos) = self.flags.get(flag).map(|f| f.pos) else {
            return false;
        };

        let mut affected: Vec<SerfId> = link.transporter.into_iter().collect();
        for &pos in &cells[..cells.len().saturating_sub(1)] {
            if let Some(serf) = self.map.serf_index(pos) {
                affected.push(serf);
            }
        }
        for (id, serf) in self.serfs.iter() {
            if let StateData::IdleOnPath(idle) = serf.data {
                if idle.flag == Some(flag) || idle.flag == Some(link.other) {
                    if cells.contains(&serf.pos) {
                        affected.push(id);
                    }
                }
            }
        }

        let mut from = start_pos;
        let mut d = dir;
        for &pos in &cells {
            self.map.remove_path(from, d);
            self.map.remove_path(pos, d.reverse());
            if let Some(next) = self.map.path_continuation(pos, d) {
                d = next;
            }
            from = pos;
        }

        if let Some(f) = self.flags.get_mut(flag) {
            f.links[dir.index()] = None;
            f.unschedule(dir);
        }
        if let Some(f) = self.flags.get_mut(link.other) {
            f.links[link.other_dir.index()] = None;
            f.unschedule(link.other_dir);
        }

        affected.sort();
        affected.dedup();
        for serf in affected {
            if let Err(err) = self.set_lost_state(serf) {
                log::error!("remove_road: {}", err);
            }
        }
        log::debug!("road {} {:?} removed", flag, dir);
        true
    }

    /// Destroy a building. Occupants escape, serfs on their way to it get
    /// lost, and stock inside is gone.
    pub fn demolish_building(&mut self, id: BuildingId) -> bool {
        let Some(building) = self.buildings.remove(id) else {
            return false;
        };
        log::debug!("building {} ({:?}) demolished", id, building.kind);
        self.map.set_object(building.pos, MapObject::None, 0);
        if let Some(flag) = self.flags.get_mut(building.flag) {
            flag.building = None;
            flag.inventory = None;
            flag.accepts_serfs = false;
            flag.accepts_resources = false;
        }
        if let Some(inv) = building.inventory {
            self.inventories.remove(inv);
        }
        if let Some(player) = self.player_mut(building.owner) {
            if player.castle == Some(id) {
                player.castle = None;
            }
        }
        let tick = self.game_time;
        if let Some(player) = self.player_mut(building.owner) {
            player.add_notification(NotificationKind::LostBuilding, building.pos, tick);
        }

        let mut escaping = Vec::new();
        let mut lost = Vec::new();
        for (sid, serf) in self.serfs.iter() {
            let inside = serf.pos == building.pos && serf.state.is_inside_building();
            let in_inventory = matches!(
                serf.data,
                StateData::IdleInStock(d) if d.inventory.is_some() && d.inventory == building.inventory
            );
            let heading_here = matches!(
                serf.data,
                StateData::Walking(w) if w.dest == Some(building.flag) && w.dir1 == DIR1_REQUESTED
            );
            if inside || in_inventory || building.knights.contains(&sid) {
                escaping.push(sid);
            } else if serf.pos == building.pos || heading_here {
                lost.push(sid);
            }
        }
        for sid in escaping {
            if let Err(err) = self.set_serf_state(sid, State::EscapeBuilding) {
                log::error!("demolish_building: {}", err);
            }
            if let Ok(serf) = self.serf_mut(sid) {
                serf.counter = 0;
            }
        }
        for sid in lost {
            if let Err(err) = self.set_lost_state(sid) {
                log::error!("demolish_building: {}", err);
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use crate::building::BuildingType;
    use crate::map::Direction;
    use crate::serf::{SerfType, State};
    use crate::testing::GameBuilder;

    #[test]
    fn test_build_road_links_both_flags() {
        let mut builder = GameBuilder::new().with_player();
        let a = builder.flag(0, 2, 2);
        let b = builder.flag(0, 5, 2);
        let mut game = builder.build();
        assert_eq!(game.build_road(a, &[Direction::Right; 3]), Some(b));
        let fa = game.get_flag(a).unwrap();
        assert_eq!(fa.other_end_flag(Direction::Right), Some(b));
        assert_eq!(
            game.get_flag(b).unwrap().other_end_dir(Direction::Left),
            Some(Direction::Right)
        );
        let mid = game.map.pos(3, 2);
        assert!(game.map.has_path(mid, Direction::Right));
        assert!(game.map.has_path(mid, Direction::Left));
        assert_eq!(game.road_cells(a, Direction::Right).len(), 3);
    }

    #[test]
    fn test_build_road_places_end_flag_on_free_ground() {
        let mut builder = GameBuilder::new().with_player();
        let a = builder.flag(0, 2, 2);
        let mut game = builder.build();
        let end = game.build_road(a, &[Direction::Right; 3]).unwrap();
        assert_eq!(game.get_flag(end).unwrap().pos, game.map.pos(5, 2));
        assert_eq!(game.flag_at(game.map.pos(5, 2)), Some(end));
        assert_eq!(game.get_flag(a).unwrap().other_end_flag(Direction::Right), Some(end));
        assert_eq!(game.road_cells(a, Direction::Right).len(), 3);
    }

    #[test]
    fn test_build_road_rejects_blocked_end() {
        let mut builder = GameBuilder::new().with_player();
        let a = builder.flag(0, 2, 2);
        let end = builder.pos(5, 2);
        builder.tree(end);
        let mut game = builder.build();
        assert_eq!(game.build_road(a, &[Direction::Right; 3]), None);
        assert_eq!(game.map.paths(game.map.pos(3, 2)), 0);
        assert_eq!(game.flag_at(end), None);
    }

    #[test]
    fn test_build_road_stops_at_flag_midway() {
        let mut builder = GameBuilder::new().with_player();
        let a = builder.flag(0, 2, 2);
        builder.flag(0, 4, 2);
        let mut game = builder.build();
        assert_eq!(game.build_road(a, &[Direction::Right; 4]), None);
        assert_eq!(game.map.paths(game.map.pos(3, 2)), 0);
    }

    #[test]
    fn test_remove_road_clears_paths_and_links() {
        let mut builder = GameBuilder::new().with_player();
        let a = builder.flag(0, 2, 2);
        let b = builder.flag(0, 2, 5);
        builder.road(a, &[Direction::Down; 3]);
        let mut game = builder.build();
        assert!(game.remove_road(a, Direction::Down));
        assert!(!game.get_flag(a).unwrap().has_road(Direction::Down));
        assert!(!game.get_flag(b).unwrap().has_road(Direction::Up));
        for row in 2..=5 {
            assert_eq!(game.map.paths(game.map.pos(2, row)), 0, "row {row}");
        }
    }

    #[test]
    fn test_demolish_sends_worker_into_escape() {
        let mut builder = GameBuilder::new().with_player();
        let mill = builder.building(0, 6, 6, BuildingType::Mill, true);
        let worker = builder.worker(mill, SerfType::Miller, State::Milling);
        let mut game = builder.build();
        assert!(game.demolish_building(mill));
        assert_eq!(game.get_serf(worker).unwrap().state, State::EscapeBuilding);
        assert!(game.get_building(mill).is_none());
    }

    #[test]
    fn test_found_colony_sets_up_inventory() {
        let mut game = GameBuilder::new().with_player().build();
        let pos = game.map.pos(8, 8);
        let (castle, inv) = game.found_colony(0, pos).unwrap();
        let flag = game.get_building(castle).unwrap().flag;
        assert_eq!(game.get_flag(flag).unwrap().inventory, Some(inv));
        assert_eq!(game.find_nearest_inventory_for_serf(flag), Some(flag));
        let states: Vec<State> = game.serfs.iter().map(|(_, s)| s.state).collect();
        assert!(states.contains(&State::BuildingCastle));
        assert!(states.contains(&State::WaitForResourceOut));
        assert!(!game.get_building(castle).unwrap().is_done());
    }

    #[test]
    fn test_castle_builder_retires_into_stock() {
        let mut game = GameBuilder::new().with_player().build();
        let pos = game.map.pos(8, 8);
        let (castle, inv) = game.found_colony(0, pos).unwrap();
        let builder = game.get_building(castle).unwrap().holder.unwrap();
        for _ in 0..50_000 {
            if game.get_building(castle).unwrap().is_done() {
                break;
            }
            game.update().unwrap();
        }
        assert!(game.get_building(castle).unwrap().is_done());
        let s = game.get_serf(builder).unwrap();
        assert_eq!(s.state, State::IdleInStock);
        assert_eq!(s.idle_in_stock().unwrap().inventory, Some(inv));
    }
}
