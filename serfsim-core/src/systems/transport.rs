//! Road transporters: carrying resources between the two flags of a road,
//! delivering into buildings, and dozing on the road while idle.
//!
//! A transporter keeps the `Walking` payload. While transporting, `res` and
//! `dest` describe the carried resource and where it is bound, and `dir1` is
//! the direction of the served road as seen from the flag the transporter is
//! heading for (or standing on).

use crate::arena::{FlagId, SerfId};
use crate::error::SimError;
use crate::map::{Direction, MapPos};
use crate::serf::tables::{counter_from_animation, walking_animation, ANIM_DROP, ANIM_PICK_UP};
use crate::serf::{IdleOnPathData, State, StateData, WalkingData};
use crate::Game;

impl Game {
    #[tracing::instrument(skip_all)]
    pub(crate) fn handle_transporting(&mut self, id: SerfId) -> Result<(), SimError> {
        loop {
            let serf = self.serf(id)?;
            if serf.state != State::Transporting || serf.counter >= 0 {
                return Ok(());
            }
            let pos = serf.pos;
            let w = *serf.walking()?;
            if w.dir < 0 {
                let dir = self.direction(id, w.dir + 6, "handle_transporting")?;
                self.road_step(id, dir)?;
                continue;
            }
            if let Some(flag) = self.flag_at(pos) {
                self.transporter_move_to_flag(id, flag)?;
                if self.serf(id)?.pos == pos && self.serf(id)?.state == State::Transporting {
                    // Still on the flag: waiting for a slot or for the road.
                    let serf = self.serf_mut(id)?;
                    if serf.counter < 0 {
                        serf.counter = 0;
                    }
                    return Ok(());
                }
                continue;
            }
            let dir = self.direction(id, w.dir, "handle_transporting")?;
            match self.map.path_continuation(pos, dir) {
                Some(next) => self.road_step(id, next)?,
                None => return self.set_lost_state(id),
            }
        }
    }

    /// A transporter stands on `flag`, at the end of the road `dir1`.
    pub(crate) fn transporter_move_to_flag(&mut self, id: SerfId, flag: FlagId) -> Result<(), SimError> {
        let w = *self.serf(id)?.walking()?;
        let road = self.direction(id, w.dir1, "transporter_move_to_flag")?;
        let Some(link) = self.flags.get(flag).and_then(|f| f.link(road)).copied() else {
            return self.set_lost_state(id);
        };
        if link.transporter != Some(id) {
            return self.set_lost_state(id);
        }

        if let Some(res) = w.res {
            if w.dest == Some(flag) {
                return self.start_delivering(id, flag);
            }
            if self.flags.get(flag).is_some_and(|f| f.is_scheduled(road)) {
                let swapped = self
                    .flags
                    .get_mut(flag)
                    .and_then(|f| f.swap_resource(road, res, w.dest));
                if let Some((new_res, new_dest)) = swapped {
                    log::trace!("serf {}: swapped {} for {} at {}", id, res, new_res, flag);
                    if let Some(f) = self.flags.get_mut(flag) {
                        f.prioritize_pickup(road);
                    }
                    let data = self.serf_mut(id)?.walking_mut()?;
                    data.res = Some(new_res);
                    data.dest = new_dest;
                    self.schedule_slots(flag);
                    self.animate(id, ANIM_PICK_UP)?;
                    return self.transporter_depart(id, road, link.other_dir);
                }
            }
            let dropped = self
                .flags
                .get_mut(flag)
                .and_then(|f| f.drop_resource(res, w.dest));
            if dropped.is_none() {
                return self.wait_one_tick(id);
            }
            let data = self.serf_mut(id)?.walking_mut()?;
            data.res = None;
            data.dest = None;
            self.schedule_slots(flag);
            self.animate(id, ANIM_DROP)?;
        }

        let slot = self.flags.get(flag).and_then(|f| f.scheduled_slot(road));
        if let Some(slot) = slot {
            let picked = self.flags.get_mut(flag).and_then(|f| f.pick_up_resource(slot));
            if let Some((res, dest)) = picked {
                if let Some(f) = self.flags.get_mut(flag) {
                    f.prioritize_pickup(road);
                }
                let data = self.serf_mut(id)?.walking_mut()?;
                data.res = Some(res);
                data.dest = dest;
                self.animate(id, ANIM_PICK_UP)?;
                return self.transporter_depart(id, road, link.other_dir);
            }
        }
        let work_at_other_end = self
            .flags
            .get(link.other)
            .is_some_and(|f| f.is_scheduled(link.other_dir));
        if work_at_other_end {
            return self.transporter_depart(id, road, link.other_dir);
        }
        self.transporter_go_idle(id, flag, road)
    }

    fn transporter_depart(&mut self, id: SerfId, road: Direction, other_dir: Direction) -> Result<(), SimError> {
        self.serf_mut(id)?.walking_mut()?.dir1 = other_dir.index() as i32;
        self.road_step(id, road)
    }

    /// Turn a transporter around mid-road: it was about to step in `dir`
    /// and now heads for the flag behind it.
    pub(crate) fn reverse_transporter(&mut self, id: SerfId, dir: Direction) -> Result<(), SimError> {
        let pos = self.serf(id)?.pos;
        match self.follow_path(pos, dir.reverse()) {
            Some(arrival) => {
                self.serf_mut(id)?.walking_mut()?.dir1 = arrival.index() as i32;
                Ok(())
            }
            None => self.set_lost_state(id),
        }
    }

    /// Step off the flag onto the first road cell and doze there.
    fn transporter_go_idle(&mut self, id: SerfId, flag: FlagId, road: Direction) -> Result<(), SimError> {
        let Some(flag_pos) = self.flags.get(flag).map(|f| f.pos) else {
            return self.set_lost_state(id);
        };
        let cell = self.map.move_dir(flag_pos, road);
        if self.map.has_serf(cell) || self.map.idle_serf(cell) {
            return self.wait_one_tick(id);
        }
        let h_diff = self.map.height(cell) - self.map.height(flag_pos);
        self.vacate(flag_pos, id);
        self.map.set_idle_serf(cell);
        let data = StateData::IdleOnPath(IdleOnPathData {
            flag: Some(flag),
            field_e: 0,
            rev_dir: road.reverse().index() as i32,
        });
        self.set_serf_state_with(id, State::IdleOnPath, data)?;
        let serf = self.serf_mut(id)?;
        serf.pos = cell;
        // A resource just put down keeps its drop animation running.
        if serf.counter < 0 {
            serf.animation = walking_animation(h_diff, road.index(), false);
            serf.counter = 0;
        }
        log::trace!("serf {}: idle on road {:?} of {}", id, road, flag);
        Ok(())
    }

    /// A resource at `flag` was routed onto road `dir`: nudge that road's
    /// transporter if it is dozing. Roads without one are staffed by the
    /// request pass.
    pub(crate) fn wake_transporter(&mut self, flag: FlagId, dir: Direction) -> Result<(), SimError> {
        let Some(link) = self.flags.get(flag).and_then(|f| f.link(dir)).copied() else {
            return Ok(());
        };
        let Some(serf_id) = link.transporter else {
            return Ok(());
        };
        let Some(serf) = self.serfs.get(serf_id) else {
            return Ok(());
        };
        if serf.state != State::IdleOnPath {
            return Ok(());
        }
        let idle = *serf.data.as_idle_on_path().ok_or_else(|| self.missing(serf_id, "idle data", 0, "wake_transporter"))?;
        if idle.field_e != 0 {
            return Ok(());
        }
        let toward = self.idle_wake_direction(serf.pos, &idle, flag)?;
        if let Some(d) = toward {
            if let Some(idle) = self.serf_mut(serf_id)?.data.as_idle_on_path_mut() {
                idle.field_e = d.index() as i32 + 1;
            }
        }
        Ok(())
    }

    /// Direction an idle transporter at `pos` walks to reach `flag`.
    fn idle_wake_direction(
        &self,
        pos: MapPos,
        idle: &IdleOnPathData,
        flag: FlagId,
    ) -> Result<Option<Direction>, SimError> {
        let Some(back) = Direction::from_index(idle.rev_dir) else {
            return Ok(None);
        };
        if idle.flag == Some(flag) {
            Ok(Some(back))
        } else {
            Ok(self.map.path_continuation(pos, back.reverse()))
        }
    }

    /// Idle transporters check both ends of their road each time their
    /// counter runs out.
    pub(crate) fn handle_idle_on_path(&mut self, id: SerfId) -> Result<(), SimError> {
        let serf = self.serf(id)?;
        if serf.counter >= 0 {
            return Ok(());
        }
        let pos = serf.pos;
        let mut idle = *serf.data.as_idle_on_path().ok_or_else(|| self.missing(id, "idle data", 0, "handle_idle_on_path"))?;
        if idle.field_e == 0 {
            let Some(near) = idle.flag else {
                return self.set_lost_state(id);
            };
            let road = self.direction(id, idle.rev_dir, "handle_idle_on_path")?.reverse();
            let Some(link) = self.flags.get(near).and_then(|f| f.link(road)).copied() else {
                return self.set_lost_state(id);
            };
            let target = if self.flags.get(near).is_some_and(|f| f.is_scheduled(road)) {
                Some(near)
            } else if self.flags.get(link.other).is_some_and(|f| f.is_scheduled(link.other_dir)) {
                Some(link.other)
            } else {
                None
            };
            match target.map(|t| self.idle_wake_direction(pos, &idle, t)).transpose()?.flatten() {
                Some(d) => idle.field_e = d.index() as i32 + 1,
                None => return self.wait_one_tick(id),
            }
            let missing = self.missing(id, "idle data", 0, "handle_idle_on_path");
            *self.serf_mut(id)?.data.as_idle_on_path_mut().ok_or(missing)? = idle;
        }
        if self.map.has_serf(pos) {
            self.set_serf_state(id, State::WaitIdleOnPath)?;
            return self.wait_one_tick(id);
        }
        self.wake_up(id)
    }

    pub(crate) fn handle_wait_idle_on_path(&mut self, id: SerfId) -> Result<(), SimError> {
        let serf = self.serf(id)?;
        if serf.counter >= 0 {
            return Ok(());
        }
        if self.map.has_serf(serf.pos) {
            return self.wait_one_tick(id);
        }
        self.wake_up(id)
    }

    /// Claim the idle cell and get ready to walk in the wake direction.
    fn wake_up(&mut self, id: SerfId) -> Result<(), SimError> {
        let serf = self.serf(id)?;
        let pos = serf.pos;
        let idle = *serf.data.as_idle_on_path().ok_or_else(|| self.missing(id, "idle data", 0, "wake_up"))?;
        let dir = self.direction(id, idle.field_e - 1, "wake_up")?;
        self.map.clear_idle_serf(pos);
        self.occupy(id, pos)?;
        let next = self.map.move_dir(pos, dir);
        let state = if self.map.has_flag(next) {
            State::WakeAtFlag
        } else {
            State::WakeOnPath
        };
        self.set_serf_state(id, state)?;
        self.wait_one_tick(id)
    }

    /// Resume transporting after a wake-up.
    pub(crate) fn handle_wake(&mut self, id: SerfId) -> Result<(), SimError> {
        let serf = self.serf(id)?;
        if serf.counter >= 0 {
            return Ok(());
        }
        let pos = serf.pos;
        let idle = *serf.data.as_idle_on_path().ok_or_else(|| self.missing(id, "idle data", 0, "handle_wake"))?;
        let dir = self.direction(id, idle.field_e - 1, "handle_wake")?;
        let Some(arrival) = self.follow_path(pos, dir) else {
            return self.set_lost_state(id);
        };
        let data = StateData::Walking(WalkingData {
            dir1: arrival.index() as i32,
            res: None,
            dest: None,
            dir: dir.index() as i32,
            wait_counter: 0,
        });
        self.set_serf_state_with(id, State::Transporting, data)?;
        self.road_step(id, dir)
    }

    /// Follow the road from `pos` heading `dir` until it reaches a flag.
    /// Returns the road's direction as seen from that flag.
    fn follow_path(&self, pos: MapPos, dir: Direction) -> Option<Direction> {
        let mut pos = pos;
        let mut dir = dir;
        for _ in 0..self.map.size() {
            pos = self.map.move_dir(pos, dir);
            if self.map.has_flag(pos) {
                return Some(dir.reverse());
            }
            dir = self.map.path_continuation(pos, dir)?;
        }
        None
    }

    /// Walk from the flag into the building the carried resource is bound for.
    fn start_delivering(&mut self, id: SerfId, flag: FlagId) -> Result<(), SimError> {
        let pos = self.serf(id)?.pos;
        let building_pos = self.map.move_dir(pos, Direction::UpLeft);
        let building = self.flags.get(flag).and_then(|f| f.building);
        if building.is_none() {
            // Destination gone: leave the resource on the flag for rerouting.
            let w = *self.serf(id)?.walking()?;
            if let Some(res) = w.res {
                let dropped = self.flags.get_mut(flag).and_then(|f| f.drop_resource(res, None));
                if dropped.is_none() {
                    self.lose_resource(res, None);
                }
                let data = self.serf_mut(id)?.walking_mut()?;
                data.res = None;
                data.dest = None;
                self.schedule_slots(flag);
            }
            return self.wait_one_tick(id);
        }
        // A builder stands on its site; deliveries go in past it.
        let holder = building.and_then(|b| self.buildings.get(b)).and_then(|b| b.holder);
        if self.map.serf_index(building_pos).is_some_and(|s| Some(s) != holder) {
            return self.wait_one_tick(id);
        }
        let h_diff = self.map.height(building_pos) - self.map.height(pos);
        self.vacate(pos, id);
        self.set_serf_state(id, State::Delivering)?;
        let serf = self.serf_mut(id)?;
        serf.pos = building_pos;
        serf.animation = walking_animation(h_diff, Direction::UpLeft.index(), false);
        serf.counter = serf.counter.min(0) + counter_from_animation(serf.animation);
        Ok(())
    }

    pub(crate) fn handle_delivering(&mut self, id: SerfId) -> Result<(), SimError> {
        let serf = self.serf(id)?;
        if serf.counter >= 0 {
            return Ok(());
        }
        let pos = serf.pos;
        let w = *serf.walking()?;
        let Some(building) = self.building_at(pos) else {
            if let Some(res) = w.res {
                self.lose_resource(res, w.dest);
            }
            return self.set_lost_state(id);
        };
        if let Some(res) = w.res {
            let inventory = self.buildings.get(building).and_then(|b| b.inventory);
            let accepted = match inventory.and_then(|i| self.inventories.get_mut(i)) {
                Some(inv) => {
                    inv.push_resource(res);
                    true
                }
                None => self.buildings.get_mut(building).is_some_and(|b| b.deliver(res)),
            };
            if !accepted {
                self.lose_resource(res, None);
            }
            log::trace!("serf {}: delivered {} to {}", id, res, building);
            let data = self.serf_mut(id)?.walking_mut()?;
            data.res = None;
            data.dest = None;
            self.animate(id, ANIM_DROP)?;
            return Ok(());
        }
        if self.step_out_to_flag(id)? {
            self.set_serf_state(id, State::Transporting)?;
            self.serf_mut(id)?.walking_mut()?.dir = Direction::DownRight.index() as i32;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::building::BuildingType;
    use crate::map::Direction;
    use crate::resource::Resource;
    use crate::serf::tables::ANIM_DROP;
    use crate::serf::{SerfType, State};
    use crate::testing::GameBuilder;

    #[test]
    fn test_transporter_carries_resource_across_road() {
        let mut builder = GameBuilder::new().with_player();
        let a = builder.flag(0, 2, 2);
        let b = builder.flag(0, 6, 2);
        builder.road(a, &[Direction::Right; 4]);
        let carrier = builder.transporter(a, Direction::Right);
        let mut game = builder.build();
        let slot = game.flags.get_mut(a).unwrap().drop_resource(Resource::Stone, Some(b)).unwrap();
        game.flags.get_mut(a).unwrap().slots[slot].dir = Some(Direction::Right);

        game.run_ticks(5000).unwrap();
        let fb = game.get_flag(b).unwrap();
        assert_eq!(fb.resource_count(), 1);
        assert!(game.get_flag(a).unwrap().resource_count() == 0);
        let s = game.get_serf(carrier).unwrap();
        assert!(matches!(s.state, State::IdleOnPath | State::Transporting));
    }

    #[test]
    fn test_drop_animation_runs_before_dozing() {
        let mut builder = GameBuilder::new().with_player();
        let a = builder.flag(0, 2, 2);
        let b = builder.flag(0, 6, 2);
        let elsewhere = builder.flag(0, 12, 12);
        builder.road(a, &[Direction::Right; 4]);
        let carrier = builder.transporter(a, Direction::Right);
        let mut game = builder.build();
        let slot = game.flags.get_mut(a).unwrap().drop_resource(Resource::Stone, Some(elsewhere)).unwrap();
        game.flags.get_mut(a).unwrap().slots[slot].dir = Some(Direction::Right);

        for _ in 0..5000 {
            game.update().unwrap();
            if game.get_flag(b).unwrap().resource_count() == 1 {
                break;
            }
        }
        assert_eq!(game.get_flag(b).unwrap().resource_count(), 1);
        let s = game.get_serf(carrier).unwrap();
        assert_eq!(s.state, State::IdleOnPath);
        assert_eq!(s.animation, ANIM_DROP);
        assert!(s.counter > 0);
    }

    #[test]
    fn test_delivery_reaches_site_past_its_builder() {
        let mut builder = GameBuilder::new().with_player();
        let site = builder.building(0, 8, 8, BuildingType::Sawmill, false);
        let worker = builder.worker(site, SerfType::Builder, State::Null);
        let site_flag = builder.building_flag(site);
        let a = builder.flag(0, 9, 13);
        builder.road(a, &[Direction::Up; 4]);
        let carrier = builder.transporter(a, Direction::Up);
        let mut game = builder.build();
        game.start_work(worker, site).unwrap();
        let pos = game.get_building(site).unwrap().pos;
        assert_eq!(game.map.serf_index(pos), Some(worker));
        let slot = game.flags.get_mut(a).unwrap().drop_resource(Resource::Plank, Some(site_flag)).unwrap();
        game.flags.get_mut(a).unwrap().slots[slot].dir = Some(Direction::Up);

        game.run_ticks(5000).unwrap();
        assert!(game.get_building(site).unwrap().progress > 0);
        assert_eq!(game.get_serf(worker).unwrap().state, State::Building);
        assert_ne!(game.get_serf(carrier).unwrap().state, State::Delivering);
    }

    #[test]
    fn test_idle_transporter_frees_its_cell() {
        let mut builder = GameBuilder::new().with_player();
        let a = builder.flag(0, 2, 2);
        builder.flag(0, 6, 2);
        builder.road(a, &[Direction::Right; 4]);
        let carrier = builder.transporter(a, Direction::Right);
        let mut game = builder.build();
        game.run_ticks(600).unwrap();
        let s = game.get_serf(carrier).unwrap();
        assert_eq!(s.state, State::IdleOnPath);
        assert!(game.map.idle_serf(s.pos));
        assert!(!game.map.has_serf(s.pos));
    }

    #[test]
    fn test_scheduled_resource_wakes_idle_transporter() {
        let mut builder = GameBuilder::new().with_player();
        let a = builder.flag(0, 2, 2);
        let b = builder.flag(0, 6, 2);
        builder.road(a, &[Direction::Right; 4]);
        let carrier = builder.transporter(a, Direction::Right);
        let mut game = builder.build();
        game.run_ticks(600).unwrap();
        assert_eq!(game.get_serf(carrier).unwrap().state, State::IdleOnPath);

        let slot = game.flags.get_mut(b).unwrap().drop_resource(Resource::Plank, Some(a)).unwrap();
        game.flags.get_mut(b).unwrap().slots[slot].dir = Some(Direction::Left);
        game.wake_transporter(b, Direction::Left).unwrap();
        game.run_ticks(3000).unwrap();
        assert_eq!(game.get_flag(a).unwrap().resource_count(), 1);
    }
}
