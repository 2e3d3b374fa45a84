//! Road walking between flags, entering and leaving buildings, and the
//! recovery states for serfs that lost their way.

use crate::arena::{FlagId, Id, SerfId};
use crate::error::SimError;
use crate::map::Direction;
use crate::resource::Resource;
use crate::serf::tables::{counter_from_animation, walking_animation, ANIM_IDLE};
use crate::serf::{
    EnteringBuildingData, FreeWalkingData, IdleInStockData, LeavingBuildingData, LostData,
    ReadyToEnterData, SerfType, State, StateData, WalkingData, DIR1_REQUESTED,
    DIR1_TO_INVENTORY, DIR1_TRANSPORTER_MAX, DIR1_UNRESOLVED, ENTER_INVENTORY, ENTER_KNIGHT,
    ENTER_WORKER, NEG_DIST_RETURNING,
};
use crate::Game;

/// Longest chain of waiting serfs followed when looking for a deadlock.
const DEADLOCK_CHAIN_LIMIT: usize = 64;

impl Game {
    pub(crate) fn direction(&self, id: SerfId, value: i32, op: &'static str) -> Result<Direction, SimError> {
        Direction::from_index(value)
            .ok_or_else(|| self.unreachable(id, op, format!("direction {value}")))
    }

    /// Send a serf into `Lost`, releasing every claim it held.
    pub fn set_lost_state(&mut self, id: SerfId) -> Result<(), SimError> {
        self.set_lost_state_with(id, 0)
    }

    pub(crate) fn set_lost_state_with(&mut self, id: SerfId, field_b: i32) -> Result<(), SimError> {
        let serf = self.serf(id)?;
        let (state, kind, pos, data) = (serf.state, serf.kind, serf.pos, serf.data);
        match data {
            StateData::Walking(w) => {
                if let Some(dest) = w.dest.and_then(|d| self.flags.get(d)) {
                    if state == State::Walking && w.dir1 == DIR1_REQUESTED {
                        if let Some(b) = dest.building.and_then(|b| self.buildings.get_mut(b)) {
                            if kind.is_knight() {
                                b.requested_knight_defeat_on_walk();
                            } else {
                                b.requested_serf_lost();
                            }
                        }
                    } else if state == State::Walking && (0..=DIR1_TRANSPORTER_MAX).contains(&w.dir1) {
                        let dir = self.direction(id, w.dir1, "set_lost_state")?;
                        if let Some(dest) = w.dest.and_then(|d| self.flags.get_mut(d)) {
                            dest.cancel_serf_request(dir);
                        }
                    }
                }
                if let Some(res) = w.res {
                    let dest = if state == State::Walking { None } else { w.dest };
                    self.lose_resource(res, dest);
                }
            }
            StateData::IdleOnPath(_) => {
                if self.map.idle_serf(pos) {
                    self.map.clear_idle_serf(pos);
                }
            }
            _ => {}
        }
        for (_, flag) in self.flags.iter_mut() {
            for link in flag.links.iter_mut().flatten() {
                if link.transporter == Some(id) {
                    link.transporter = None;
                }
            }
        }
        if self.map.serf_index(pos) != Some(id) && !self.map.has_serf(pos) {
            self.occupy(id, pos)?;
        }

        self.metrics.serfs_lost += 1;
        if kind == SerfType::Sailor && self.map.is_in_water(pos) {
            log::warn!("serf {}: lost at sea in state {}", id, state.name());
            self.set_serf_state(id, State::LostSailor)?;
        } else {
            log::warn!("serf {}: lost in state {}", id, state.name());
            self.set_serf_state_with(id, State::Lost, StateData::Lost(LostData { field_b }))?;
        }
        self.serf_mut(id)?.counter = 0;
        Ok(())
    }

    /// A resource vanished in transit: release the stock slot it was headed for.
    pub fn cancel_transported_resource(&mut self, res: Resource, dest: Option<FlagId>) {
        let Some(building) = dest
            .and_then(|d| self.flags.get(d))
            .and_then(|f| f.building)
        else {
            return;
        };
        if let Some(b) = self.buildings.get_mut(building) {
            if let Some(stock) = b.stock.iter_mut().find(|s| s.accepts(res)) {
                stock.requested = stock.requested.saturating_sub(1);
            }
        }
    }

    pub fn lose_resource(&mut self, res: Resource, dest: Option<FlagId>) {
        log::debug!("resource {} lost on the way to {:?}", res, dest);
        self.cancel_transported_resource(res, dest);
    }

    #[tracing::instrument(skip_all)]
    pub(crate) fn handle_walking(&mut self, id: SerfId) -> Result<(), SimError> {
        loop {
            let serf = self.serf(id)?;
            if serf.state != State::Walking || serf.counter >= 0 {
                return Ok(());
            }
            let pos = serf.pos;
            let w = *serf.walking()?;
            if w.dir < 0 {
                let dir = self.direction(id, w.dir + 6, "handle_walking")?;
                self.road_step(id, dir)?;
                continue;
            }
            if let Some(flag) = self.flag_at(pos) {
                self.walking_at_flag(id, flag)?;
                continue;
            }
            let dir = self.direction(id, w.dir, "handle_walking")?;
            match self.map.path_continuation(pos, dir) {
                Some(next) => self.road_step(id, next)?,
                None => return self.set_lost_state(id),
            }
        }
    }

    fn walking_at_flag(&mut self, id: SerfId, flag: FlagId) -> Result<(), SimError> {
        let mut w = *self.serf(id)?.walking()?;
        if w.dir1 == DIR1_UNRESOLVED || w.dest.is_none() {
            match self.find_nearest_inventory_for_serf(flag) {
                Some(inventory_flag) => {
                    w.dest = Some(inventory_flag);
                    w.dir1 = DIR1_TO_INVENTORY;
                    *self.serf_mut(id)?.walking_mut()? = w;
                }
                None => return self.set_lost_state_with(id, 1),
            }
        }
        let Some(dest) = w.dest.filter(|&d| self.flags.contains(d)) else {
            return self.set_lost_state(id);
        };
        if dest == flag {
            return self.walking_arrived(id, flag, w.dir1);
        }
        match self.find_direction_to(flag, dest) {
            Some(dir) => self.road_step(id, dir),
            None => self.set_lost_state(id),
        }
    }

    /// Reached the destination flag: take up the job encoded in `dir1`.
    fn walking_arrived(&mut self, id: SerfId, flag: FlagId, dir1: i32) -> Result<(), SimError> {
        let redirect = |game: &mut Game| -> Result<(), SimError> {
            let w = game.serf_mut(id)?.walking_mut()?;
            w.dir1 = DIR1_UNRESOLVED;
            w.dest = None;
            Ok(())
        };
        match dir1 {
            0..=DIR1_TRANSPORTER_MAX => {
                let dir = self.direction(id, dir1, "walking_arrived")?;
                let accepted = self
                    .flags
                    .get_mut(flag)
                    .is_some_and(|f| f.complete_serf_request(dir, id));
                if !accepted {
                    return redirect(self);
                }
                let far_end = self.flags.get(flag).and_then(|f| f.link(dir)).map(|l| (l.other, l.other_dir));
                if let Some(link) = far_end.and_then(|(other, d)| self.flags.get_mut(other)?.link_mut(d)) {
                    link.transporter = Some(id);
                }
                log::debug!("serf {}: transporter for {} {:?}", id, flag, dir);
                let data = StateData::Walking(WalkingData {
                    dir1,
                    res: None,
                    dest: None,
                    dir: dir1,
                    wait_counter: 0,
                });
                self.set_serf_state_with(id, State::Transporting, data)?;
                self.serf_mut(id)?.counter = 0;
                Ok(())
            }
            DIR1_TO_INVENTORY => {
                let accepts = self
                    .flags
                    .get(flag)
                    .is_some_and(|f| f.has_inventory() && f.accepts_serfs);
                if accepts {
                    self.enter_building(id, ENTER_INVENTORY)
                } else {
                    redirect(self)
                }
            }
            DIR1_REQUESTED => {
                let kind = self.serf(id)?.kind;
                match self.flags.get(flag).and_then(|f| f.building) {
                    Some(building) => {
                        let military = self
                            .buildings
                            .get(building)
                            .is_some_and(|b| b.kind.is_military() && b.is_done());
                        let mode = if kind.is_knight() && military {
                            ENTER_KNIGHT
                        } else {
                            ENTER_WORKER
                        };
                        self.enter_building(id, mode)
                    }
                    None if kind == SerfType::Geologist => self.start_geologist(id),
                    None => redirect(self),
                }
            }
            other => Err(self.unreachable(id, "walking_arrived", format!("dir1 {other}"))),
        }
    }

    /// Try one road step. Blocked serfs wait, swap places with a serf
    /// waiting to come the other way, or break a deadlock.
    pub(crate) fn road_step(&mut self, id: SerfId, dir: Direction) -> Result<(), SimError> {
        let pos = self.serf(id)?.pos;
        let next = self.map.move_dir(pos, dir);
        if !self.map.has_serf(next) {
            self.step_serf(id, dir)?;
            let w = self.serf_mut(id)?.walking_mut()?;
            w.dir = dir.index() as i32;
            w.wait_counter = 0;
            return Ok(());
        }
        if self.change_direction(id, dir)? {
            return Ok(());
        }

        let limit = if self.map.has_flag(pos) {
            self.config.wait_limit_on_flag
        } else {
            self.config.wait_limit_on_road
        };
        let serf = self.serf_mut(id)?;
        serf.counter = 0;
        serf.animation = ANIM_IDLE;
        let w = serf.walking_mut()?;
        w.dir = dir.index() as i32 - 6;
        w.wait_counter += 1;
        if w.wait_counter > limit {
            self.break_deadlock(id, dir)?;
        }
        Ok(())
    }

    /// Trade places with the serf ahead if it waits to step towards us.
    /// Returns whether the swap happened.
    pub fn change_direction(&mut self, id: SerfId, dir: Direction) -> Result<bool, SimError> {
        let pos = self.serf(id)?.pos;
        let next = self.map.move_dir(pos, dir);
        let Some(other) = self.map.serf_index(next) else {
            return Ok(false);
        };
        if other == id || self.serf(other)?.waiting_direction() != Some(dir.reverse().index()) {
            return Ok(false);
        }
        self.swap_serfs(id, other, dir)?;
        Ok(true)
    }

    /// Exchange the cells of `id` and the serf one step away in `dir`.
    pub(crate) fn swap_serfs(&mut self, id: SerfId, other: SerfId, dir: Direction) -> Result<(), SimError> {
        let here = self.serf(id)?.pos;
        let there = self.map.move_dir(here, dir);
        let h_diff = self.map.height(there) - self.map.height(here);
        log::trace!("serf {}: swapping with {} at {}", id, other, there);

        for (serf_id, to, d, diff) in [(id, there, dir, h_diff), (other, here, dir.reverse(), -h_diff)] {
            let serf = self.serf_mut(serf_id)?;
            serf.pos = to;
            serf.animation = walking_animation(diff, d.index(), true);
            serf.counter = serf.counter.min(0) + counter_from_animation(serf.animation);
            self.note_moved(serf_id, d)?;
        }
        self.map.set_serf_index(here, Some(other));
        self.map.set_serf_index(there, Some(id));
        Ok(())
    }

    /// Bookkeeping after a serf moved one cell in `dir`: clear its waiting
    /// posture and advance whatever progress its payload tracks.
    pub(crate) fn note_moved(&mut self, id: SerfId, dir: Direction) -> Result<(), SimError> {
        let (dc, dr) = dir.delta();
        match &mut self.serf_mut(id)?.data {
            StateData::Walking(w) => {
                w.dir = dir.index() as i32;
                w.wait_counter = 0;
            }
            StateData::FreeWalking(f) => {
                f.dist_col -= dc;
                f.dist_row -= dr;
                f.flags &= !0x70;
            }
            StateData::Digging(d) if d.substate < 0 => d.substate = 0,
            _ => {}
        }
        Ok(())
    }

    /// Follow the chain of waiting serfs ahead. If it loops back to us, send
    /// a member standing on an inventory flag inside; otherwise turn around.
    fn break_deadlock(&mut self, id: SerfId, dir: Direction) -> Result<(), SimError> {
        let mut members = vec![id];
        let mut cursor = self.map.move_dir(self.serf(id)?.pos, dir);
        let mut cycle = false;
        for _ in 0..DEADLOCK_CHAIN_LIMIT {
            let Some(other) = self.map.serf_index(cursor) else {
                break;
            };
            if other == id {
                cycle = true;
                break;
            }
            if members.contains(&other) {
                break;
            }
            let serf = self.serf(other)?;
            let Some(wd) = serf.waiting_direction().and_then(|d| Direction::from_index(d as i32)) else {
                break;
            };
            members.push(other);
            cursor = self.map.move_dir(serf.pos, wd);
        }

        self.metrics.deadlocks_broken += 1;
        if cycle {
            for &member in &members {
                let serf = self.serf(member)?;
                if !matches!(serf.state, State::Walking | State::Transporting) {
                    continue;
                }
                let at_inventory = self
                    .flag_at(serf.pos)
                    .and_then(|f| self.flags.get(f))
                    .is_some_and(|f| f.has_inventory() && f.accepts_serfs);
                if at_inventory {
                    log::debug!("serf {}: deadlock broken by retiring {}", id, member);
                    return self.retire_to_inventory(member);
                }
            }
        }

        let pos = self.serf(id)?.pos;
        if self.map.has_flag(pos) {
            self.serf_mut(id)?.walking_mut()?.wait_counter = 0;
            return Ok(());
        }
        log::debug!("serf {}: deadlock, reversing", id);
        let state = self.serf(id)?.state;
        if state == State::Transporting {
            self.reverse_transporter(id, dir)?;
        }
        let w = self.serf_mut(id)?.walking_mut()?;
        w.dir = dir.reverse().index() as i32;
        w.wait_counter = 0;
        Ok(())
    }

    /// Walk a serf standing on an inventory flag straight inside, carrying
    /// along whatever it holds.
    fn retire_to_inventory(&mut self, id: SerfId) -> Result<(), SimError> {
        let pos = self.serf(id)?.pos;
        let w = *self.serf(id)?.walking()?;
        let inventory = self.flag_at(pos).and_then(|f| self.flags.get(f)).and_then(|f| f.inventory);
        if let (Some(res), Some(inv)) = (w.res, inventory.and_then(|i| self.inventories.get_mut(i))) {
            inv.push_resource(res);
        }
        for (_, flag) in self.flags.iter_mut() {
            for link in flag.links.iter_mut().flatten() {
                if link.transporter == Some(id) {
                    link.transporter = None;
                }
            }
        }
        let data = StateData::Walking(WalkingData {
            dir1: DIR1_TO_INVENTORY,
            ..WalkingData::default()
        });
        self.set_serf_state_with(id, State::Walking, data)?;
        self.enter_building(id, ENTER_INVENTORY)
    }

    /// Start walking from a flag into the building behind it.
    pub(crate) fn enter_building(&mut self, id: SerfId, field_b: i32) -> Result<(), SimError> {
        let pos = self.serf(id)?.pos;
        let building_pos = self.map.move_dir(pos, Direction::UpLeft);
        if self.map.has_serf(building_pos) {
            let data = StateData::ReadyToEnter(ReadyToEnterData { field_b });
            self.set_serf_state_with(id, State::ReadyToEnter, data)?;
            return self.wait_one_tick(id);
        }
        let h_diff = self.map.height(building_pos) - self.map.height(pos);
        let animation = walking_animation(h_diff, Direction::UpLeft.index(), false);
        let slope_len = counter_from_animation(animation);
        self.vacate(pos, id);
        let data = StateData::EnteringBuilding(EnteringBuildingData { field_b, slope_len });
        self.set_serf_state_with(id, State::EnteringBuilding, data)?;
        let serf = self.serf_mut(id)?;
        serf.pos = building_pos;
        serf.animation = animation;
        serf.counter = serf.counter.min(0) + slope_len;
        Ok(())
    }

    pub(crate) fn handle_entering_building(&mut self, id: SerfId) -> Result<(), SimError> {
        let serf = self.serf(id)?;
        if serf.counter >= 0 {
            return Ok(());
        }
        let field_b = serf.entering_building()?.field_b;
        let Some(building) = self.building_at(serf.pos) else {
            return self.set_lost_state(id);
        };
        match field_b {
            ENTER_INVENTORY => {
                let Some(inventory) = self.buildings.get(building).and_then(|b| b.inventory) else {
                    return self.set_lost_state(id);
                };
                let data = StateData::IdleInStock(IdleInStockData {
                    inventory: Some(inventory),
                });
                self.set_serf_state_with(id, State::IdleInStock, data)?;
                self.serf_mut(id)?.counter = 0;
                Ok(())
            }
            ENTER_KNIGHT => self.knight_enter_building(id, building),
            ENTER_WORKER => self.start_work(id, building),
            other => Err(self.unreachable(id, "handle_entering_building", format!("mode {other}"))),
        }
    }

    pub(crate) fn handle_ready_to_enter(&mut self, id: SerfId) -> Result<(), SimError> {
        let serf = self.serf(id)?;
        if serf.counter >= 0 {
            return Ok(());
        }
        let field_b = serf.ready_to_enter()?.field_b;
        let building_pos = self.map.move_dir(serf.pos, Direction::UpLeft);
        if self.building_at(building_pos).is_none() {
            return self.set_lost_state(id);
        }
        self.enter_building(id, field_b)
    }

    /// Queue a serf inside a building to walk out to the flag and then
    /// adopt `next_state`.
    pub(crate) fn leave_building(
        &mut self,
        id: SerfId,
        next_state: State,
        field_b: i32,
        dest: i32,
        dest2: i32,
    ) -> Result<(), SimError> {
        let data = StateData::LeavingBuilding(LeavingBuildingData {
            field_b,
            dest,
            dest2,
            dir: 0,
            next_state,
        });
        self.set_serf_state_with(id, State::ReadyToLeave, data)?;
        self.wait_one_tick(id)
    }

    /// Move from inside a building onto its flag cell. Returns false (and
    /// re-arms) when the flag is occupied.
    pub(crate) fn step_out_to_flag(&mut self, id: SerfId) -> Result<bool, SimError> {
        let pos = self.serf(id)?.pos;
        let flag_pos = self.map.move_dir(pos, Direction::DownRight);
        if self.map.has_serf(flag_pos) {
            self.wait_one_tick(id)?;
            return Ok(false);
        }
        let h_diff = self.map.height(flag_pos) - self.map.height(pos);
        self.vacate(pos, id);
        self.occupy(id, flag_pos)?;
        let serf = self.serf_mut(id)?;
        serf.animation = walking_animation(h_diff, Direction::DownRight.index(), false);
        serf.counter = serf.counter.min(0) + counter_from_animation(serf.animation);
        Ok(true)
    }

    pub(crate) fn handle_ready_to_leave(&mut self, id: SerfId) -> Result<(), SimError> {
        if self.serf(id)?.counter >= 0 {
            return Ok(());
        }
        if self.step_out_to_flag(id)? {
            self.set_serf_state(id, State::LeavingBuilding)?;
        }
        Ok(())
    }

    pub(crate) fn handle_leaving_building(&mut self, id: SerfId) -> Result<(), SimError> {
        let serf = self.serf(id)?;
        if serf.counter >= 0 {
            return Ok(());
        }
        let leave = *serf.leaving_building()?;
        match leave.next_state {
            State::Walking => {
                let data = StateData::Walking(WalkingData {
                    dir1: leave.field_b,
                    res: None,
                    dest: FlagId::from_raw(leave.dest.max(0) as u32),
                    dir: 0,
                    wait_counter: 0,
                });
                self.set_serf_state_with(id, State::Walking, data)
            }
            State::Lost => self.set_lost_state(id),
            next if StateData::for_state(next).as_free_walking().is_some() => {
                let data = StateData::FreeWalking(FreeWalkingData {
                    dist_col: leave.dest,
                    dist_row: leave.dest2,
                    neg_dist1: -leave.dest,
                    neg_dist2: -leave.dest2,
                    flags: 0,
                });
                self.set_serf_state_with(id, next, data)
            }
            next => self.set_serf_state(id, next),
        }
    }

    /// Lost serfs look for a flag of their own to walk to, wandering at
    /// random when none is in range.
    pub(crate) fn handle_lost(&mut self, id: SerfId) -> Result<(), SimError> {
        let serf = self.serf(id)?;
        if serf.counter >= 0 {
            return Ok(());
        }
        let (pos, owner) = (serf.pos, serf.owner);
        let field_b = serf.lost()?.field_b;

        if field_b == 0 {
            if let Some(flag) = self.flag_at(pos).filter(|&f| self.flags.get(f).is_some_and(|f| f.owner == owner)) {
                log::debug!("serf {}: found flag {}", id, flag);
                let data = StateData::Walking(WalkingData {
                    dir1: DIR1_UNRESOLVED,
                    ..WalkingData::default()
                });
                self.set_serf_state_with(id, State::Walking, data)?;
                return self.wait_one_tick(id);
            }
        }

        let radius = self.config.lost_search_radius.min(crate::map::SPIRAL_LEN);
        let target = (1..radius).find_map(|n| {
            let p = self.map.position_add_spirally(pos, n);
            let flag = self.flag_at(p)?;
            let f = self.flags.get(flag)?;
            let usable = f.owner == owner
                && (field_b == 0 || self.find_nearest_inventory_for_serf(flag).is_some());
            usable.then_some(p)
        });
        let (dist_col, dist_row) = match target {
            Some(p) => self.map.dist(pos, p),
            None => {
                let r = self.random_int() as i32;
                let col = (r & 0xf) - 8;
                let row = ((r >> 4) & 0xf) - 8;
                if col == 0 && row == 0 {
                    (1, 0)
                } else {
                    (col, row)
                }
            }
        };
        let data = StateData::FreeWalking(FreeWalkingData {
            dist_col,
            dist_row,
            neg_dist1: NEG_DIST_RETURNING,
            neg_dist2: NEG_DIST_RETURNING,
            flags: 0,
        });
        self.set_serf_state_with(id, State::FreeWalking, data)?;
        self.wait_one_tick(id)
    }

    pub(crate) fn handle_lost_sailor(&mut self, id: SerfId) -> Result<(), SimError> {
        let serf = self.serf(id)?;
        if serf.counter >= 0 {
            return Ok(());
        }
        if !self.map.is_in_water(serf.pos) {
            return self.set_lost_state(id);
        }
        let r = self.random_int() as i32;
        let data = StateData::FreeWalking(FreeWalkingData {
            dist_col: (r & 0x7) - 4,
            dist_row: ((r >> 3) & 0x7) - 4,
            neg_dist1: NEG_DIST_RETURNING,
            neg_dist2: NEG_DIST_RETURNING,
            flags: 0,
        });
        self.set_serf_state_with(id, State::FreeSailing, data)?;
        self.wait_one_tick(id)
    }

    /// Serf trapped in a building that is gone: step out onto the vacated
    /// site as soon as it is free.
    pub(crate) fn handle_escape_building(&mut self, id: SerfId) -> Result<(), SimError> {
        let serf = self.serf(id)?;
        if serf.counter >= 0 {
            return Ok(());
        }
        let pos = serf.pos;
        if self.map.has_serf(pos) && self.map.serf_index(pos) != Some(id) {
            return self.wait_one_tick(id);
        }
        self.occupy(id, pos)?;
        self.set_lost_state(id)
    }

    pub(crate) fn handle_scatter(&mut self, id: SerfId) -> Result<(), SimError> {
        let serf = self.serf(id)?;
        if serf.counter >= 0 {
            return Ok(());
        }
        let pos = serf.pos;
        let dir = Direction::ALL[(self.random_int() % 6) as usize];
        let next = self.map.move_dir(pos, dir);
        if self.map.is_passable(next) && !self.map.has_serf(next) {
            self.step_serf(id, dir)?;
        }
        self.set_lost_state(id)
    }
}
