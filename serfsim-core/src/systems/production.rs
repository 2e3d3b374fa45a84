//! Workshop serfs: fixed-phase production, smelting and mining.
//!
//! Every workshop cycle starts in mode 0 by taking its inputs from the
//! building stock. Without stock the serf simply retries next tick. Once
//! the inputs are gone the remaining phases run on fixed timings and end
//! with one unit of output carried out through [`State::MoveResourceOut`].

use crate::arena::{BuildingId, SerfId};
use crate::error::SimError;
use crate::map::GroundDeposit;
use crate::resource::Resource;
use crate::serf::tables::*;
use crate::serf::{MoveResourceOutData, State, StateData};
use crate::Game;

/// Inputs a cycle consumes before it starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Inputs {
    None,
    First,
    Both,
}

/// One timed phase: animation shown and ticks spent.
type Phase = (i32, i32);

struct Recipe {
    inputs: Inputs,
    phases: &'static [Phase],
}

const SAWING: Recipe = Recipe {
    inputs: Inputs::First,
    phases: &[(ANIM_SAWING, 384), (ANIM_SAWING, 384), (ANIM_IDLE, 128)],
};
const MILLING: Recipe = Recipe {
    inputs: Inputs::First,
    phases: &[(ANIM_MILLING, 256), (ANIM_MILLING, 512), (ANIM_IDLE, 128)],
};
const BAKING: Recipe = Recipe {
    inputs: Inputs::First,
    phases: &[(ANIM_BAKING, 512), (ANIM_BAKING, 512)],
};
const PIG_FARMING: Recipe = Recipe {
    inputs: Inputs::First,
    phases: &[(ANIM_PIGFARMING, 512), (ANIM_IDLE, 256)],
};
const BUTCHERING: Recipe = Recipe {
    inputs: Inputs::First,
    phases: &[(ANIM_BUTCHERING, 384), (ANIM_BUTCHERING, 384)],
};
const MAKING_WEAPON: Recipe = Recipe {
    inputs: Inputs::Both,
    phases: &[(ANIM_MAKING_WEAPON, 256), (ANIM_MAKING_WEAPON, 256), (ANIM_MAKING_WEAPON, 256)],
};
const MAKING_TOOL: Recipe = Recipe {
    inputs: Inputs::Both,
    phases: &[(ANIM_MAKING_TOOL, 256), (ANIM_MAKING_TOOL, 256), (ANIM_MAKING_TOOL, 256)],
};
const BUILDING_BOAT: Recipe = Recipe {
    inputs: Inputs::First,
    phases: &[(ANIM_BUILDING_BOAT, 1536)],
};
const NO_RECIPE: Recipe = Recipe {
    inputs: Inputs::None,
    phases: &[],
};

fn recipe(state: State) -> &'static Recipe {
    match state {
        State::Sawing => &SAWING,
        State::Milling => &MILLING,
        State::Baking => &BAKING,
        State::PigFarming => &PIG_FARMING,
        State::Butchering => &BUTCHERING,
        State::MakingWeapon => &MAKING_WEAPON,
        State::MakingTool => &MAKING_TOOL,
        State::BuildingBoat => &BUILDING_BOAT,
        _ => &NO_RECIPE,
    }
}

/// Chance out of 65536 that a pig is born, by current headcount.
const PIG_BREEDING: [u16; 8] = [6000, 8000, 10000, 11000, 13000, 14000, 15000, 16000];
/// Planks a boat takes.
const BOAT_PLANKS: u32 = 8;

/// Smelting: ticks of each furnace round and how many rounds make a unit.
const SMELTING_ROUND: i32 = 256;
const SMELTING_ROUNDS: i32 = 4;

/// Spiral positions a miner samples underground.
const MINE_SAMPLE_RANGE: u16 = 37;
const MINE_ELEVATOR_TICKS: i32 = 128;
const MINE_STEP_TICKS: i32 = 32;

impl Game {
    #[tracing::instrument(skip_all)]
    pub(crate) fn handle_production(&mut self, id: SerfId) -> Result<(), SimError> {
        loop {
            let serf = self.serf(id)?;
            if serf.counter >= 0 {
                return Ok(());
            }
            let state = serf.state;
            let mode = serf.production()?.mode;
            let Some(building) = self.building_at(serf.pos) else {
                return self.set_lost_state(id);
            };
            let recipe = recipe(state);

            if mode == 0 {
                let ready = self.buildings.get_mut(building).is_some_and(|b| match recipe.inputs {
                    Inputs::None => true,
                    Inputs::First => b.use_resource_in_stock(0),
                    Inputs::Both => b.use_resources_in_stocks(),
                });
                if !ready {
                    return self.wait_one_tick(id);
                }
                self.serf_mut(id)?.production_mut()?.mode = 1;
                continue;
            }

            let phase = mode as usize - 1;
            if let Some(&(animation, ticks)) = recipe.phases.get(phase) {
                let serf = self.serf_mut(id)?;
                serf.animation = animation;
                serf.counter += ticks;
                serf.production_mut()?.mode += 1;
                continue;
            }

            self.serf_mut(id)?.production_mut()?.mode = 0;
            match self.production_output(state, building) {
                Some(res) => return self.produce(id, res, state),
                None => continue,
            }
        }
    }

    /// What a finished cycle yields; `None` for a cycle that made nothing.
    fn production_output(&mut self, state: State, building: BuildingId) -> Option<Resource> {
        match state {
            State::Sawing => Some(Resource::Plank),
            State::Milling => Some(Resource::Flour),
            State::Baking => Some(Resource::Bread),
            State::Butchering => Some(Resource::Meat),
            State::MakingWeapon => {
                let b = self.buildings.get_mut(building)?;
                b.weapon_toggle = !b.weapon_toggle;
                Some(if b.weapon_toggle { Resource::Sword } else { Resource::Shield })
            }
            State::MakingTool => {
                let owner = self.buildings.get(building)?.owner;
                let player = self.players.get(owner as usize)?;
                let at = (0..Resource::TOOLS.len()).max_by_key(|&i| {
                    (player.tool_priorities[i], std::cmp::Reverse(i))
                })?;
                Some(Resource::TOOLS[at])
            }
            State::PigFarming => self.breed_pigs(building),
            State::BuildingBoat => {
                let b = self.buildings.get_mut(building)?;
                b.progress_boat += 1;
                if b.progress_boat < BOAT_PLANKS {
                    return None;
                }
                b.progress_boat = 0;
                Some(Resource::Boat)
            }
            _ => None,
        }
    }

    fn breed_pigs(&mut self, building: BuildingId) -> Option<Resource> {
        let born = self.random_int();
        let ready = self.random_int() & 0xff;
        let b = self.buildings.get_mut(building)?;
        let index = (b.pig_count as usize).min(PIG_BREEDING.len() - 1);
        if born < PIG_BREEDING[index] {
            b.pig_count += 1;
            log::trace!("building {}: pig born, {} now", building, b.pig_count);
        }
        if b.pig_count > 0 && ready < (16 * b.pig_count.min(16)) as u16 {
            b.pig_count -= 1;
            Some(Resource::Pig)
        } else {
            None
        }
    }

    /// Count the new unit and carry it out, coming back to `next_state`.
    pub(crate) fn produce(&mut self, id: SerfId, res: Resource, next_state: State) -> Result<(), SimError> {
        let owner = self.serf(id)?.owner;
        if let Some(player) = self.player_mut(owner) {
            player.increase_resource_count(res);
        }
        self.metrics.resources_produced += 1;
        log::debug!("serf {}: produced {}", id, res);
        let data = StateData::MoveResourceOut(MoveResourceOutData {
            res: res.code() + 1,
            res_dest: None,
            next_state,
        });
        self.set_serf_state_with(id, State::MoveResourceOut, data)
    }

    #[tracing::instrument(skip_all)]
    pub(crate) fn handle_smelting(&mut self, id: SerfId) -> Result<(), SimError> {
        loop {
            let serf = self.serf(id)?;
            if serf.counter >= 0 {
                return Ok(());
            }
            let smelt = *serf.smelting()?;
            let Some(building) = self.building_at(serf.pos) else {
                return self.set_lost_state(id);
            };
            match smelt.mode {
                0 => {
                    let ready = self
                        .buildings
                        .get_mut(building)
                        .is_some_and(|b| b.use_resources_in_stocks());
                    if !ready {
                        return self.wait_one_tick(id);
                    }
                    let s = self.serf_mut(id)?.smelting_mut()?;
                    s.mode = 1;
                    s.counter = SMELTING_ROUNDS;
                }
                1 => {
                    let serf = self.serf_mut(id)?;
                    serf.animation = ANIM_SMELTING;
                    serf.counter += SMELTING_ROUND;
                    let s = serf.smelting_mut()?;
                    s.counter -= 1;
                    if s.counter == 0 {
                        s.mode = 2;
                    }
                }
                _ => {
                    let res = if smelt.kind == 0 { Resource::Steel } else { Resource::GoldBar };
                    self.serf_mut(id)?.smelting_mut()?.mode = 0;
                    return self.produce(id, res, State::Smelting);
                }
            }
        }
    }

    #[tracing::instrument(skip_all)]
    pub(crate) fn handle_mining(&mut self, id: SerfId) -> Result<(), SimError> {
        loop {
            let serf = self.serf(id)?;
            if serf.counter >= 0 {
                return Ok(());
            }
            let mining = *serf.mining()?;
            let pos = serf.pos;
            let Some(building) = self.building_at(pos) else {
                return self.set_lost_state(id);
            };
            let next = match mining.substate {
                0 => {
                    self.serf_mut(id)?.counter += MINE_STEP_TICKS;
                    if self.random_int() & 7 < 6 {
                        1
                    } else {
                        2
                    }
                }
                1 => {
                    let fed = self
                        .buildings
                        .get_mut(building)
                        .is_some_and(|b| b.use_resource_in_stock(0));
                    if !fed {
                        return self.wait_one_tick(id);
                    }
                    self.serf_mut(id)?.counter += MINE_STEP_TICKS;
                    3
                }
                2 => {
                    self.serf_mut(id)?.counter += MINE_STEP_TICKS;
                    3
                }
                3 => {
                    self.animate(id, ANIM_IDLE)?;
                    4
                }
                4 => {
                    let serf = self.serf_mut(id)?;
                    serf.animation = ANIM_ELEVATOR_DOWN;
                    serf.counter += MINE_ELEVATOR_TICKS;
                    5
                }
                5..=7 => {
                    if mining.res.is_none() {
                        let n = (self.random_int() % MINE_SAMPLE_RANGE) as usize;
                        let spot = self.map.position_add_spirally(pos, n);
                        if mining.deposit != GroundDeposit::None
                            && self.map.deposit(spot) == mining.deposit
                            && self.map.deposit_amount(spot) > 0
                        {
                            self.map.remove_ground_deposit(spot, 1);
                            self.serf_mut(id)?.mining_mut()?.res = deposit_resource(mining.deposit);
                        }
                    }
                    self.animate(id, ANIM_MINING)?;
                    mining.substate + 1
                }
                8 => {
                    let serf = self.serf_mut(id)?;
                    serf.animation = ANIM_ELEVATOR_UP;
                    serf.counter += MINE_ELEVATOR_TICKS;
                    9
                }
                9 => {
                    let found = mining.res.is_some();
                    if let Some(b) = self.buildings.get_mut(building) {
                        b.mining_history = (b.mining_history << 1) | u8::from(found);
                    }
                    self.serf_mut(id)?.counter += MINE_STEP_TICKS;
                    10
                }
                _ => {
                    let m = self.serf_mut(id)?.mining_mut()?;
                    m.substate = 0;
                    m.res = None;
                    if let Some(res) = mining.res {
                        return self.produce(id, res, State::Mining);
                    }
                    self.wait_one_tick(id)?;
                    return Ok(());
                }
            };
            self.serf_mut(id)?.mining_mut()?.substate = next;
        }
    }
}

fn deposit_resource(deposit: GroundDeposit) -> Option<Resource> {
    match deposit {
        GroundDeposit::Gold => Some(Resource::GoldOre),
        GroundDeposit::Iron => Some(Resource::IronOre),
        GroundDeposit::Coal => Some(Resource::Coal),
        GroundDeposit::Stone => Some(Resource::Stone),
        GroundDeposit::None | GroundDeposit::Fish => None,
    }
}
