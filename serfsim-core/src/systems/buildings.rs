//! Serfs attached to buildings: inventory residents, resource carriers
//! between a building and its flag, diggers and builders.

use crate::arena::{BuildingId, SerfId};
use crate::building::{BuildingType, BUILD_DONE};
use crate::error::SimError;
use crate::map::{Direction, MapPos};
use crate::serf::tables::{ANIM_DIGGING, ANIM_HAMMERING, DIGGING_HEIGHT_DIFFERENCES};
use crate::serf::{
    BuildingData, DiggingData, IdleInStockData, LeavingBuildingData, MiningData,
    MoveResourceOutData, ProductionData, SerfType, SmeltingData, State, StateData,
    DIR1_UNRESOLVED,
};
use crate::Game;

/// Hammer strokes per plank or stone used.
const STROKES_PER_MATERIAL: i32 = 4;
/// Castle progress per hammer stroke.
const CASTLE_PROGRESS_PER_STROKE: u32 = 0x1000;
/// `dig_pos` of the flag cell, which is never dug.
const DIG_POS_FLAG: i32 = Direction::DownRight as i32 + 1;

impl Game {
    /// Worker reached the inside of its building: start working, or head
    /// home if there is nothing for it to do.
    pub(crate) fn start_work(&mut self, id: SerfId, building: BuildingId) -> Result<(), SimError> {
        let kind = self.serf(id)?.kind;
        let Some(b) = self.buildings.get_mut(building) else {
            return self.set_lost_state(id);
        };
        b.requested_serf_reached(id);
        let (btype, done, leveling) = (b.kind, b.is_done(), b.leveling);

        if !done {
            return match kind {
                SerfType::Digger if leveling => self.start_digging(id, building),
                SerfType::Builder if !leveling => self.start_building(id, building),
                _ => self.leave_building(id, State::Walking, DIR1_UNRESOLVED, 0, 0),
            };
        }
        match btype.work_state() {
            Some(state) => {
                if let Some(b) = self.buildings.get_mut(building) {
                    b.start_activity();
                }
                let data = work_payload(state, btype);
                self.set_serf_state_with(id, state, data)?;
                self.wait_one_tick(id)
            }
            None => self.leave_building(id, State::Walking, DIR1_UNRESOLVED, 0, 0),
        }
    }

    pub(crate) fn handle_idle_in_stock(&mut self, id: SerfId) -> Result<(), SimError> {
        let serf = self.serf_mut(id)?;
        if serf.counter < 0 {
            serf.counter = 0;
        }
        Ok(())
    }

    pub(crate) fn handle_ready_to_leave_inventory(&mut self, id: SerfId) -> Result<(), SimError> {
        let serf = self.serf(id)?;
        if serf.counter >= 0 {
            return Ok(());
        }
        let ready = *serf.ready_to_leave_inventory()?;
        if !self.step_out_to_flag(id)? {
            return Ok(());
        }
        let data = StateData::LeavingBuilding(LeavingBuildingData {
            field_b: ready.mode,
            dest: crate::arena::raw_index(ready.dest) as i32,
            dest2: 0,
            dir: 0,
            next_state: State::Walking,
        });
        self.set_serf_state_with(id, State::LeavingBuilding, data)
    }

    /// Carry a freshly made resource out once the flag can take it.
    pub(crate) fn handle_move_resource_out(&mut self, id: SerfId) -> Result<(), SimError> {
        let serf = self.serf(id)?;
        if serf.counter >= 0 {
            return Ok(());
        }
        let flag_pos = self.map.move_dir(serf.pos, Direction::DownRight);
        let has_room = self
            .flag_at(flag_pos)
            .and_then(|f| self.flags.get(f))
            .is_some_and(|f| f.has_empty_slot());
        if !has_room {
            return self.wait_one_tick(id);
        }
        if self.step_out_to_flag(id)? {
            self.set_serf_state(id, State::DropResourceOut)?;
        }
        Ok(())
    }

    /// Inventory carrier: take the next queued resource out.
    pub(crate) fn handle_wait_for_resource_out(&mut self, id: SerfId) -> Result<(), SimError> {
        let serf = self.serf(id)?;
        if serf.counter >= 0 {
            return Ok(());
        }
        let pos = serf.pos;
        let Some(inventory) = self
            .building_at(pos)
            .and_then(|b| self.buildings.get(b))
            .and_then(|b| b.inventory)
        else {
            return self.wait_one_tick(id);
        };
        let Some((res, dest)) = self
            .inventories
            .get_mut(inventory)
            .and_then(|inv| inv.out_queue.pop_front())
        else {
            return self.wait_one_tick(id);
        };
        log::trace!("serf {}: taking {} out of {}", id, res, inventory);
        let data = StateData::MoveResourceOut(MoveResourceOutData {
            res: res.code() + 1,
            res_dest: Some(dest),
            next_state: State::WaitForResourceOut,
        });
        self.set_serf_state_with(id, State::MoveResourceOut, data)?;
        self.wait_one_tick(id)
    }

    /// On the flag with the resource: put it down, walk back in and resume.
    pub(crate) fn handle_drop_resource_out(&mut self, id: SerfId) -> Result<(), SimError> {
        let serf = self.serf(id)?;
        if serf.counter >= 0 {
            return Ok(());
        }
        let pos = serf.pos;
        let out = *serf.move_resource_out()?;
        let building_pos = self.map.move_dir(pos, Direction::UpLeft);
        let (Some(flag), Some(building)) = (self.flag_at(pos), self.building_at(building_pos)) else {
            if let Some(res) = out.resource() {
                self.lose_resource(res, out.res_dest);
            }
            return self.set_lost_state(id);
        };
        if let Some(res) = out.resource() {
            let dropped = self
                .flags
                .get_mut(flag)
                .and_then(|f| f.drop_resource(res, out.res_dest));
            if dropped.is_none() {
                return self.wait_one_tick(id);
            }
            self.serf_mut(id)?.move_resource_out_mut()?.res = 0;
            self.schedule_slots(flag);
        }
        if self.map.has_serf(building_pos) {
            return self.wait_one_tick(id);
        }

        let btype = self.buildings.get(building).map(|b| b.kind);
        let next = out.next_state;
        let data = match btype {
            Some(btype) => work_payload(next, btype),
            None => StateData::for_state(next),
        };
        let h_diff = self.map.height(building_pos) - self.map.height(pos);
        self.vacate(pos, id);
        self.set_serf_state_with(id, next, data)?;
        let serf = self.serf_mut(id)?;
        serf.pos = building_pos;
        serf.animation = crate::serf::tables::walking_animation(h_diff, Direction::UpLeft.index(), false);
        serf.counter = serf.counter.min(0) + crate::serf::tables::counter_from_animation(serf.animation);
        Ok(())
    }

    // ---- digging ----

    fn start_digging(&mut self, id: SerfId, building: BuildingId) -> Result<(), SimError> {
        let Some(site) = self.buildings.get(building).map(|b| b.pos) else {
            return self.set_lost_state(id);
        };
        let flag_h = self.map.height(self.flag_pos_of(site));
        let h = self.map.height(site);
        let (h_index, target_h) = if (h - flag_h).abs() <= 1 {
            (-1, h)
        } else {
            DIGGING_HEIGHT_DIFFERENCES
                .iter()
                .enumerate()
                .map(|(i, diff)| (i as i32, h + diff))
                .find(|&(_, t)| (t - flag_h).abs() <= 1 && (0..=crate::map::MAX_HEIGHT as i32).contains(&t))
                .unwrap_or((-1, flag_h))
        };
        log::debug!("serf {}: levelling {} to height {}", id, building, target_h);
        self.occupy(id, site)?;
        let data = StateData::Digging(DiggingData {
            h_index,
            target_h,
            dig_pos: 0,
            substate: 0,
        });
        self.set_serf_state_with(id, State::Digging, data)?;
        self.wait_one_tick(id)
    }

    /// Centre of the site a digger works on.
    fn dig_site(&self, pos: MapPos, dig: &DiggingData) -> MapPos {
        match Direction::from_index(dig.dig_pos - 1) {
            Some(d) if !self.map.has_building(pos) => self.map.move_dir(pos, d.reverse()),
            _ => pos,
        }
    }

    fn dig_cell(&self, site: MapPos, dig_pos: i32) -> MapPos {
        match Direction::from_index(dig_pos - 1) {
            Some(d) => self.map.move_dir(site, d),
            None => site,
        }
    }

    #[tracing::instrument(skip_all)]
    pub(crate) fn handle_digging(&mut self, id: SerfId) -> Result<(), SimError> {
        loop {
            let serf = self.serf(id)?;
            if serf.state != State::Digging || serf.counter >= 0 {
                return Ok(());
            }
            let pos = serf.pos;
            let dig = *serf.digging()?;
            let site = self.dig_site(pos, &dig);
            let Some(building) = self.building_at(site) else {
                return self.set_lost_state(id);
            };

            if dig.substate < 0 {
                let dir = self.direction(id, -dig.substate - 1, "handle_digging")?;
                let cell = self.map.move_dir(pos, dir);
                if self.map.has_serf(cell) {
                    if !self.change_direction(id, dir)? {
                        return self.wait_one_tick(id);
                    }
                } else {
                    self.step_serf(id, dir)?;
                }
                self.serf_mut(id)?.digging_mut()?.substate = 2;
                continue;
            }

            if dig.substate == 0 {
                let next = (dig.dig_pos..=6)
                    .filter(|&p| p != DIG_POS_FLAG)
                    .find(|&p| self.map.height(self.dig_cell(site, p)) != dig.target_h);
                let Some(p) = next else {
                    if pos != site && !self.step_back_to_site(id, pos, site)? {
                        return self.wait_one_tick(id);
                    }
                    self.serf_mut(id)?.digging_mut()?.substate = 1;
                    continue;
                };
                // dig_pos names the cell the digger stands on, so it only
                // moves on while the digger is back on the site.
                let cell = self.dig_cell(site, p);
                if cell == pos {
                    self.serf_mut(id)?.digging_mut()?.substate = 2;
                } else if pos != site {
                    if !self.step_back_to_site(id, pos, site)? {
                        return self.wait_one_tick(id);
                    }
                } else {
                    let dir = self.direction(id, p - 1, "handle_digging")?;
                    let d = self.serf_mut(id)?.digging_mut()?;
                    d.dig_pos = p;
                    d.substate = -(dir.index() as i32 + 1);
                }
                continue;
            }

            if dig.substate == 1 {
                if let Some(b) = self.buildings.get_mut(building) {
                    b.leveling = false;
                    b.holder = None;
                }
                let flag_pos = self.flag_pos_of(site);
                if self.map.has_serf(flag_pos) {
                    return self.wait_one_tick(id);
                }
                log::debug!("serf {}: site {} levelled", id, building);
                self.step_serf(id, Direction::DownRight)?;
                let data = StateData::Walking(crate::serf::WalkingData {
                    dir1: DIR1_UNRESOLVED,
                    dir: Direction::DownRight.index() as i32,
                    ..Default::default()
                });
                return self.set_serf_state_with(id, State::Walking, data);
            }

            let h = self.map.height(pos);
            let step = (dig.target_h - h).signum();
            self.map.set_height(pos, h + step);
            self.animate(id, ANIM_DIGGING)?;
            if h + step == dig.target_h {
                self.serf_mut(id)?.digging_mut()?.substate = 0;
            }
        }
    }

    /// Returns false while another serf blocks the site and will not swap.
    fn step_back_to_site(&mut self, id: SerfId, pos: MapPos, site: MapPos) -> Result<bool, SimError> {
        let dir = Direction::ALL
            .into_iter()
            .find(|&d| self.map.move_dir(pos, d) == site)
            .ok_or_else(|| self.unreachable(id, "step_back_to_site", format!("{pos} not next to {site}")))?;
        if self.map.has_serf(site) {
            return self.change_direction(id, dir);
        }
        self.step_serf(id, dir)?;
        Ok(true)
    }

    // ---- construction ----

    fn start_building(&mut self, id: SerfId, building: BuildingId) -> Result<(), SimError> {
        let Some((site, large)) = self.buildings.get(building).map(|b| (b.pos, b.kind.is_large())) else {
            return self.set_lost_state(id);
        };
        self.occupy(id, site)?;
        let data = StateData::Building(BuildingData {
            mode: 0,
            index: Some(building),
            material_step: if large { 0x80 } else { 0 },
            counter: 0,
        });
        self.set_serf_state_with(id, State::Building, data)?;
        self.wait_one_tick(id)
    }

    #[tracing::instrument(skip_all)]
    pub(crate) fn handle_building(&mut self, id: SerfId) -> Result<(), SimError> {
        loop {
            let serf = self.serf(id)?;
            if serf.state != State::Building || serf.counter >= 0 {
                return Ok(());
            }
            let data = *serf.building()?;
            let Some(building) = data.index.filter(|&b| self.buildings.contains(b)) else {
                return self.set_lost_state(id);
            };

            if data.mode <= 0 {
                let plank_first = data.material_step & 1 == 0;
                let used = self.buildings.get_mut(building).is_some_and(|b| {
                    let order = if plank_first { [0, 1] } else { [1, 0] };
                    order.into_iter().any(|i| b.use_resource_in_stock(i))
                });
                let d = self.serf_mut(id)?.building_mut()?;
                if !used {
                    d.mode = -1;
                    return self.wait_one_tick(id);
                }
                d.mode = STROKES_PER_MATERIAL;
                d.material_step ^= 1;
                d.counter += 1;
            }

            let serf = self.serf_mut(id)?;
            serf.building_mut()?.mode -= 1;
            self.animate(id, ANIM_HAMMERING)?;

            let Some(b) = self.buildings.get_mut(building) else {
                return self.set_lost_state(id);
            };
            let (planks, stones) = b.kind.materials();
            let strokes = ((planks + stones).max(1) as i32 * STROKES_PER_MATERIAL) as u32;
            if b.increase_progress(BUILD_DONE.div_ceil(strokes)) {
                self.building_completed(building);
                self.set_serf_state(id, State::FinishedBuilding)?;
            }
        }
    }

    fn building_completed(&mut self, building: BuildingId) {
        let Some(b) = self.buildings.get_mut(building) else {
            return;
        };
        b.holder = None;
        let (kind, owner) = (b.kind, b.owner);
        log::debug!("building {} ({:?}) completed", building, kind);
        if kind.is_military() {
            if let Some(player) = self.player_mut(owner) {
                player.increase_military_score(kind.max_knights().min(16) as i32);
            }
        }
    }

    /// Builder leaves the finished site for the nearest inventory.
    pub(crate) fn handle_finished_building(&mut self, id: SerfId) -> Result<(), SimError> {
        let serf = self.serf(id)?;
        if serf.counter >= 0 {
            return Ok(());
        }
        let flag_pos = self.map.move_dir(serf.pos, Direction::DownRight);
        if self.map.has_serf(flag_pos) {
            return self.wait_one_tick(id);
        }
        self.step_serf(id, Direction::DownRight)?;
        let data = StateData::Walking(crate::serf::WalkingData {
            dir1: DIR1_UNRESOLVED,
            dir: Direction::DownRight.index() as i32,
            ..Default::default()
        });
        self.set_serf_state_with(id, State::Walking, data)
    }

    /// The castle builder works from inside until the castle stands, then
    /// retires into its stock.
    pub(crate) fn handle_building_castle(&mut self, id: SerfId) -> Result<(), SimError> {
        let serf = self.serf(id)?;
        if serf.counter >= 0 {
            return Ok(());
        }
        let inventory = serf.building_castle()?.inventory;
        let Some(castle) = inventory
            .and_then(|i| self.inventories.get(i))
            .map(|inv| inv.building)
        else {
            return self.set_lost_state(id);
        };
        let Some(b) = self.buildings.get_mut(castle) else {
            return self.set_lost_state(id);
        };
        if b.increase_progress(CASTLE_PROGRESS_PER_STROKE) {
            log::debug!("castle {} completed", castle);
            b.holder = None;
            b.active = true;
            let data = StateData::IdleInStock(IdleInStockData { inventory });
            self.set_serf_state_with(id, State::IdleInStock, data)?;
            return self.wait_one_tick(id);
        }
        self.animate(id, ANIM_HAMMERING)
    }
}

/// Starting payload for a building's work state.
pub(crate) fn work_payload(state: State, kind: BuildingType) -> StateData {
    match state {
        State::Mining => StateData::Mining(MiningData {
            substate: 0,
            res: None,
            deposit: kind.mine_deposit().unwrap_or_default(),
        }),
        State::Smelting => StateData::Smelting(SmeltingData {
            mode: 0,
            counter: 0,
            kind: u8::from(kind == BuildingType::GoldSmelter),
        }),
        s if matches!(StateData::for_state(s), StateData::Production(_)) => {
            StateData::Production(ProductionData { mode: 0 })
        }
        s => StateData::for_state(s),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::Resource;
    use crate::testing::GameBuilder;

    #[test]
    fn test_digger_levels_site_then_leaves() {
        let mut builder = GameBuilder::new().with_player();
        let site = builder.building(0, 8, 8, BuildingType::Sawmill, false);
        let digger = builder.worker(site, SerfType::Digger, State::Null);
        let mut game = builder.build();
        let pos = game.get_building(site).unwrap().pos;
        game.map.set_height(game.map.move_dir(pos, Direction::Up), 3);
        game.map.set_height(game.map.move_dir(pos, Direction::Left), 2);
        game.buildings.get_mut(site).unwrap().leveling = true;
        game.start_work(digger, site).unwrap();
        assert_eq!(game.get_serf(digger).unwrap().state, State::Digging);

        game.run_ticks(20_000).unwrap();
        for d in Direction::ALL.into_iter().filter(|&d| d != Direction::DownRight) {
            assert_eq!(game.map.height(game.map.move_dir(pos, d)), 0, "{d:?}");
        }
        assert!(!game.get_building(site).unwrap().leveling);
        assert_ne!(game.get_serf(digger).unwrap().state, State::Digging);
    }

    #[test]
    fn test_digger_waits_while_site_is_taken() {
        let mut builder = GameBuilder::new().with_player();
        let site = builder.building(0, 8, 8, BuildingType::Sawmill, false);
        let digger = builder.worker(site, SerfType::Digger, State::Null);
        let mut game = builder.build();
        let pos = game.get_building(site).unwrap().pos;
        let left = game.map.move_dir(pos, Direction::Left);
        game.map.set_height(left, 1);
        game.buildings.get_mut(site).unwrap().leveling = true;
        game.start_work(digger, site).unwrap();
        for _ in 0..2000 {
            if game.get_serf(digger).unwrap().pos == left {
                break;
            }
            game.update().unwrap();
        }
        assert_eq!(game.get_serf(digger).unwrap().pos, left);

        let blocker = game.create_serf(0, SerfType::Generic, pos);
        game.occupy(blocker, pos).unwrap();
        game.run_ticks(500).unwrap();
        let s = game.get_serf(digger).unwrap();
        assert_eq!((s.state, s.pos), (State::Digging, left));
        assert_eq!(game.map.serf_index(pos), Some(blocker));
        assert_eq!(game.map.height(left), 0);

        game.delete_serf(blocker);
        game.run_ticks(2000).unwrap();
        assert!(!game.get_building(site).unwrap().leveling);
        assert_ne!(game.get_serf(digger).unwrap().state, State::Digging);
    }

    #[test]
    fn test_builder_waits_for_materials_then_finishes() {
        let mut builder = GameBuilder::new().with_player();
        let site = builder.building(0, 8, 8, BuildingType::Sawmill, false);
        let worker = builder.worker(site, SerfType::Builder, State::Null);
        let mut game = builder.build();
        game.start_work(worker, site).unwrap();
        game.run_ticks(50).unwrap();
        let s = game.get_serf(worker).unwrap();
        assert_eq!(s.state, State::Building);
        assert_eq!(s.building().unwrap().mode, -1);
        assert_eq!(game.get_building(site).unwrap().progress, 0);

        game.buildings.get_mut(site).unwrap().stock[0].available = 2;
        for _ in 0..20_000 {
            game.update().unwrap();
            if game.get_building(site).unwrap().is_done() {
                break;
            }
        }
        let b = game.get_building(site).unwrap();
        assert!(b.is_done());
        assert_eq!(b.stock[0].accepts, vec![Resource::Lumber]);
        assert_eq!(game.get_serf(worker).unwrap().state, State::FinishedBuilding);
    }

    #[test]
    fn test_inventory_carrier_moves_queue_out() {
        let mut builder = GameBuilder::new().with_player();
        let (castle, inv) = builder.castle(0, 8, 8);
        let flag = builder.building_flag(castle);
        let far = builder.road(flag, &[Direction::Right; 3]);
        let mut game = builder.build();
        game.add_resources_to_inventory(inv, Resource::Plank, 1);
        assert!(game.inventories.get_mut(inv).unwrap().send_resource(Resource::Plank, far));
        for _ in 0..3000 {
            game.update().unwrap();
            if game.get_flag(flag).unwrap().resource_count() == 1 {
                break;
            }
        }
        let slot = game.get_flag(flag).unwrap().slots[0];
        assert_eq!(slot.resource, Some(Resource::Plank));
        assert_eq!(slot.dest, Some(far));
        assert_eq!(slot.dir, Some(Direction::Right));
        assert!(game.get_inventory(inv).unwrap().out_queue.is_empty());
        assert_eq!(game.get_inventory(inv).unwrap().count(Resource::Plank), 0);
    }
}
