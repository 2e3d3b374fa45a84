//! Text serf saves on top of the `serftxt` format.
//!
//! ```text
//! game = {
//!     tick = 812
//!     game_time = 812
//!     rng_0 = 23130
//!     rng_1 = 42405
//!     rng_2 = 50115
//! }
//! serf = {
//!     index = 4
//!     owner = 0
//!     type = 21
//!     animation = 3
//!     counter = 17
//!     pos = 390
//!     tick = 812
//!     sound = 0
//!     state = walking
//!     data = {
//!         direction1 = -2
//!         resource = none
//!         destination = 0
//!         direction = 1
//!         wait_counter = 0
//!     }
//! }
//! ```
//!
//! Every field of the current state's payload group is written to `data`
//! and all of them are required on load; states without a payload have no
//! `data` block. Entity references are 1-based, 0 = none.

use super::{PersistError, SaveHeader, SerfRecord};
use crate::arena::{raw_index, Id, SerfId};
use crate::map::GroundDeposit;
use crate::resource::Resource;
use crate::serf::*;
use crate::Game;
use serftxt::{DefaultSerfTxt, SerfTxt, TxtNode, TxtWriter};

fn resource_name(res: Option<Resource>) -> &'static str {
    res.map_or("none", Resource::name)
}

fn write_id<I: Id>(w: &mut TxtWriter, key: &str, id: Option<I>) {
    w.int(key, i64::from(raw_index(id)));
}

/// Append one `serf = { ... }` block.
pub fn write_serf(w: &mut TxtWriter, record: &SerfRecord) {
    let serf = &record.serf;
    w.begin_block("serf")
        .int("index", i64::from(serf.id.index()))
        .int("owner", i64::from(serf.owner))
        .int("type", i64::from(serf.kind.code()))
        .int("animation", i64::from(serf.animation))
        .int("counter", i64::from(serf.counter))
        .int("pos", i64::from(serf.pos))
        .int("tick", i64::from(serf.tick))
        .int("sound", i64::from(serf.sound))
        .ident("state", serf.state.name());

    if !matches!(serf.data, StateData::None) {
        w.begin_block("data");
    }
    match &serf.data {
        StateData::None => {}
        StateData::IdleInStock(d) => write_id(w, "inventory", d.inventory),
        StateData::Walking(d) => {
            w.int("direction1", d.dir1.into())
                .ident("resource", resource_name(d.res));
            write_id(w, "destination", d.dest);
            w.int("direction", d.dir.into())
                .int("wait_counter", d.wait_counter.into());
        }
        StateData::EnteringBuilding(d) => {
            w.int("field_b", d.field_b.into())
                .int("slope_length", d.slope_len.into());
        }
        StateData::LeavingBuilding(d) => {
            w.int("field_b", d.field_b.into())
                .int("destination", d.dest.into())
                .int("destination2", d.dest2.into())
                .int("direction", d.dir.into())
                .ident("next_state", d.next_state.name());
        }
        StateData::ReadyToEnter(d) => {
            w.int("field_b", d.field_b.into());
        }
        StateData::Digging(d) => {
            w.int("height_index", d.h_index.into())
                .int("target_height", d.target_h.into())
                .int("dig_position", d.dig_pos.into())
                .int("substate", d.substate.into());
        }
        StateData::Building(d) => {
            w.int("mode", d.mode.into());
            write_id(w, "index", d.index);
            w.int("material_step", d.material_step.into())
                .int("counter", d.counter.into());
        }
        StateData::BuildingCastle(d) => write_id(w, "inventory", d.inventory),
        StateData::MoveResourceOut(d) => {
            w.int("resource", d.res.into());
            write_id(w, "resource_destination", d.res_dest);
            w.ident("next_state", d.next_state.name());
        }
        StateData::ReadyToLeaveInventory(d) => {
            w.int("mode", d.mode.into());
            write_id(w, "destination", d.dest);
            write_id(w, "inventory", d.inventory);
        }
        StateData::FreeWalking(d) => {
            w.int("distance_x", d.dist_col.into())
                .int("distance_y", d.dist_row.into())
                .int("neg_distance1", d.neg_dist1.into())
                .int("neg_distance2", d.neg_dist2.into())
                .int("flags", d.flags.into());
        }
        StateData::Production(d) => {
            w.int("mode", d.mode.into());
        }
        StateData::Lost(d) => {
            w.int("field_b", d.field_b.into());
        }
        StateData::Mining(d) => {
            w.int("substate", d.substate.into())
                .ident("resource", resource_name(d.res))
                .int("deposit", d.deposit.code().into());
        }
        StateData::Smelting(d) => {
            w.int("mode", d.mode.into())
                .int("counter", d.counter.into())
                .int("type", d.kind.into());
        }
        StateData::Attacking(d) => {
            w.int("move", d.move_index.into())
                .int("attacker_won", d.attacker_won.into())
                .int("field_d", d.field_d.into());
            write_id(w, "defender", d.defender);
        }
        StateData::AttackingVictoryFree(d) => {
            w.int("move", d.move_index.into())
                .int("distance_column", d.dist_col.into())
                .int("distance_row", d.dist_row.into());
            write_id(w, "defender", d.defender);
        }
        StateData::DefendingFree(d) => {
            w.int("distance_column", d.dist_col.into())
                .int("distance_row", d.dist_row.into())
                .int("field_d", d.field_d.into())
                .int("other_distance_column", d.other_dist_col.into())
                .int("other_distance_row", d.other_dist_row.into());
        }
        StateData::LeaveForWalkToFight(d) => {
            w.int("distance_column", d.dist_col.into())
                .int("distance_row", d.dist_row.into())
                .int("field_d", d.field_d.into())
                .int("field_e", d.field_e.into())
                .ident("next_state", d.next_state.name());
        }
        StateData::IdleOnPath(d) => {
            write_id(w, "flag", d.flag);
            w.int("field_e", d.field_e.into())
                .int("reverse_direction", d.rev_dir.into());
        }
        StateData::Defending => write_id(w, "next_knight", record.next_knight),
    }
    if !matches!(serf.data, StateData::None) {
        w.end_block();
    }
    w.end_block();
}

/// Typed access to the assignments of one `serf` block.
struct Fields<'a> {
    node: &'a TxtNode,
    serf: u32,
    state: State,
}

impl Fields<'_> {
    fn int(&self, key: &'static str) -> Result<i64, PersistError> {
        self.node
            .get(key)
            .and_then(TxtNode::as_int)
            .ok_or(PersistError::MissingField {
                serf: self.serf,
                state: self.state,
                field: key,
            })
    }

    fn num<T: TryFrom<i64>>(&self, key: &'static str) -> Result<T, PersistError> {
        let value = self.int(key)?;
        T::try_from(value).map_err(|_| PersistError::UnknownCode {
            serf: self.serf,
            what: key,
            code: value,
        })
    }

    fn id<I: Id>(&self, key: &'static str) -> Result<Option<I>, PersistError> {
        Ok(I::from_raw(self.num(key)?))
    }

    fn ident(&self, key: &'static str) -> Result<&str, PersistError> {
        self.node
            .get(key)
            .and_then(TxtNode::as_str)
            .ok_or(PersistError::MissingField {
                serf: self.serf,
                state: self.state,
                field: key,
            })
    }

    fn state(&self, key: &'static str) -> Result<State, PersistError> {
        let name = self.ident(key)?;
        State::from_name(name).ok_or_else(|| self.unknown_name("state", name))
    }

    fn resource(&self, key: &'static str) -> Result<Option<Resource>, PersistError> {
        match self.ident(key)? {
            "none" => Ok(None),
            name => Resource::from_name(name)
                .map(Some)
                .ok_or_else(|| self.unknown_name("resource", name)),
        }
    }

    fn unknown_name(&self, what: &'static str, name: &str) -> PersistError {
        PersistError::UnknownName {
            serf: self.serf,
            what,
            name: name.to_string(),
        }
    }
}

/// Decode one `serf = { ... }` block.
pub fn read_serf(node: &TxtNode) -> Result<SerfRecord, PersistError> {
    let mut f = Fields {
        node,
        serf: 0,
        state: State::Null,
    };
    let index: u32 = f.num("index")?;
    f.serf = index;
    let id = SerfId::from_raw(index).ok_or(PersistError::UnknownCode {
        serf: index,
        what: "index",
        code: 0,
    })?;
    let state = f.state("state")?;
    f.state = state;
    let kind_code: u8 = f.num("type")?;
    let kind = SerfType::from_code(kind_code).ok_or(PersistError::UnknownCode {
        serf: index,
        what: "type",
        code: kind_code.into(),
    })?;

    let payload = StateData::for_state(state);
    let d = Fields {
        node: match payload {
            StateData::None => node,
            _ => node.get("data").ok_or(PersistError::MissingField {
                serf: index,
                state,
                field: "data",
            })?,
        },
        serf: index,
        state,
    };
    let mut next_knight = None;
    let data = match payload {
        StateData::None => StateData::None,
        StateData::IdleInStock(_) => StateData::IdleInStock(IdleInStockData {
            inventory: d.id("inventory")?,
        }),
        StateData::Walking(_) => StateData::Walking(WalkingData {
            dir1: d.num("direction1")?,
            res: d.resource("resource")?,
            dest: d.id("destination")?,
            dir: d.num("direction")?,
            wait_counter: d.num("wait_counter")?,
        }),
        StateData::EnteringBuilding(_) => StateData::EnteringBuilding(EnteringBuildingData {
            field_b: d.num("field_b")?,
            slope_len: d.num("slope_length")?,
        }),
        StateData::LeavingBuilding(_) => StateData::LeavingBuilding(LeavingBuildingData {
            field_b: d.num("field_b")?,
            dest: d.num("destination")?,
            dest2: d.num("destination2")?,
            dir: d.num("direction")?,
            next_state: d.state("next_state")?,
        }),
        StateData::ReadyToEnter(_) => StateData::ReadyToEnter(ReadyToEnterData {
            field_b: d.num("field_b")?,
        }),
        StateData::Digging(_) => StateData::Digging(DiggingData {
            h_index: d.num("height_index")?,
            target_h: d.num("target_height")?,
            dig_pos: d.num("dig_position")?,
            substate: d.num("substate")?,
        }),
        StateData::Building(_) => StateData::Building(BuildingData {
            mode: d.num("mode")?,
            index: d.id("index")?,
            material_step: d.num("material_step")?,
            counter: d.num("counter")?,
        }),
        StateData::BuildingCastle(_) => StateData::BuildingCastle(BuildingCastleData {
            inventory: d.id("inventory")?,
        }),
        StateData::MoveResourceOut(_) => StateData::MoveResourceOut(MoveResourceOutData {
            res: d.num("resource")?,
            res_dest: d.id("resource_destination")?,
            next_state: d.state("next_state")?,
        }),
        StateData::ReadyToLeaveInventory(_) => {
            StateData::ReadyToLeaveInventory(ReadyToLeaveInventoryData {
                mode: d.num("mode")?,
                dest: d.id("destination")?,
                inventory: d.id("inventory")?,
            })
        }
        StateData::FreeWalking(_) => StateData::FreeWalking(FreeWalkingData {
            dist_col: d.num("distance_x")?,
            dist_row: d.num("distance_y")?,
            neg_dist1: d.num("neg_distance1")?,
            neg_dist2: d.num("neg_distance2")?,
            flags: d.num("flags")?,
        }),
        StateData::Production(_) => StateData::Production(ProductionData {
            mode: d.num("mode")?,
        }),
        StateData::Lost(_) => StateData::Lost(LostData {
            field_b: d.num("field_b")?,
        }),
        StateData::Mining(_) => {
            let code: u8 = d.num("deposit")?;
            StateData::Mining(MiningData {
                substate: d.num("substate")?,
                res: d.resource("resource")?,
                deposit: GroundDeposit::from_code(code).ok_or(PersistError::UnknownCode {
                    serf: index,
                    what: "deposit",
                    code: code.into(),
                })?,
            })
        }
        StateData::Smelting(_) => StateData::Smelting(SmeltingData {
            mode: d.num("mode")?,
            counter: d.num("counter")?,
            kind: d.num("type")?,
        }),
        StateData::Attacking(_) => StateData::Attacking(AttackingData {
            move_index: d.num("move")?,
            attacker_won: d.num("attacker_won")?,
            field_d: d.num("field_d")?,
            defender: d.id("defender")?,
        }),
        StateData::AttackingVictoryFree(_) => {
            StateData::AttackingVictoryFree(AttackingVictoryFreeData {
                move_index: d.num("move")?,
                dist_col: d.num("distance_column")?,
                dist_row: d.num("distance_row")?,
                defender: d.id("defender")?,
            })
        }
        StateData::DefendingFree(_) => StateData::DefendingFree(DefendingFreeData {
            dist_col: d.num("distance_column")?,
            dist_row: d.num("distance_row")?,
            field_d: d.num("field_d")?,
            other_dist_col: d.num("other_distance_column")?,
            other_dist_row: d.num("other_distance_row")?,
        }),
        StateData::LeaveForWalkToFight(_) => {
            StateData::LeaveForWalkToFight(LeaveForWalkToFightData {
                dist_col: d.num("distance_column")?,
                dist_row: d.num("distance_row")?,
                field_d: d.num("field_d")?,
                field_e: d.num("field_e")?,
                next_state: d.state("next_state")?,
            })
        }
        StateData::IdleOnPath(_) => StateData::IdleOnPath(IdleOnPathData {
            flag: d.id("flag")?,
            field_e: d.num("field_e")?,
            rev_dir: d.num("reverse_direction")?,
        }),
        StateData::Defending => {
            next_knight = d.id("next_knight")?;
            StateData::Defending
        }
    };

    Ok(SerfRecord {
        serf: Serf {
            id,
            owner: f.num("owner")?,
            kind,
            state,
            data,
            animation: f.num("animation")?,
            counter: f.num("counter")?,
            pos: f.num("pos")?,
            tick: f.num("tick")?,
            sound: f.int("sound")? != 0,
        },
        next_knight,
    })
}

fn read_header(root: &TxtNode) -> Result<SaveHeader, PersistError> {
    let game = root
        .get("game")
        .ok_or_else(|| PersistError::Syntax("missing `game` block".into()))?;
    let f = Fields {
        node: game,
        serf: 0,
        state: State::Null,
    };
    Ok(SaveHeader {
        tick: f.num("tick")?,
        game_time: f.num("game_time")?,
        rng: [f.num("rng_0")?, f.num("rng_1")?, f.num("rng_2")?],
    })
}

impl Game {
    /// Text serf save.
    pub fn save_serfs_text(&self) -> String {
        let header = self.save_header();
        let mut w = TxtWriter::new();
        w.begin_block("game")
            .int("tick", header.tick.into())
            .int("game_time", header.game_time.into())
            .int("rng_0", header.rng[0].into())
            .int("rng_1", header.rng[1].into())
            .int("rng_2", header.rng[2].into())
            .end_block();
        for record in self.serf_records() {
            write_serf(&mut w, &record);
        }
        w.finish()
    }

    pub fn load_serfs_text(&mut self, text: &str) -> Result<(), PersistError> {
        let root =
            DefaultSerfTxt::parse_str(text).map_err(|e| PersistError::Syntax(e.to_string()))?;
        let header = read_header(&root)?;
        let records = root
            .get_all("serf")
            .map(read_serf)
            .collect::<Result<Vec<_>, _>>()?;
        self.restore_serfs(header, records)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::testing::GameBuilder;
    use proptest::prelude::*;

    fn id<I: Id>(raw: u32) -> Option<I> {
        I::from_raw(raw)
    }

    /// Any serf whose payload fits both save encodings.
    pub(crate) fn arb_record() -> impl Strategy<Value = SerfRecord> {
        (
            (1u32..5000, 0u8..4, 0..SerfType::COUNT, 0..State::ALL.len()),
            (0i32..256, any::<i32>(), any::<u32>(), any::<u16>(), any::<bool>()),
            proptest::collection::vec(-100i32..=100, 6),
            0u32..300,
        )
            .prop_map(|((index, owner, kind, state), (anim, counter, pos, tick, sound), v, raw)| {
                let state = State::ALL[state];
                let res = |x: i32| (x >= 0).then(|| Resource::ALL[x as usize % Resource::COUNT]);
                let data = match StateData::for_state(state) {
                    StateData::IdleInStock(_) => {
                        StateData::IdleInStock(IdleInStockData { inventory: id(raw) })
                    }
                    StateData::Walking(_) => StateData::Walking(WalkingData {
                        dir1: v[0] % 7,
                        res: res(v[1]),
                        dest: id(raw),
                        dir: v[2] % 12,
                        wait_counter: v[3],
                    }),
                    StateData::EnteringBuilding(_) => {
                        StateData::EnteringBuilding(EnteringBuildingData {
                            field_b: v[0],
                            slope_len: v[1],
                        })
                    }
                    StateData::LeavingBuilding(_) => StateData::LeavingBuilding(LeavingBuildingData {
                        field_b: raw as i32,
                        dest: v[0],
                        dest2: v[1],
                        dir: v[2] % 6,
                        next_state: State::ALL[raw as usize % State::ALL.len()],
                    }),
                    StateData::ReadyToEnter(_) => {
                        StateData::ReadyToEnter(ReadyToEnterData { field_b: v[0] })
                    }
                    StateData::Digging(_) => StateData::Digging(DiggingData {
                        h_index: v[0] % 32,
                        target_h: v[1] % 32,
                        dig_pos: v[2] % 7,
                        substate: v[3],
                    }),
                    StateData::Building(_) => StateData::Building(BuildingData {
                        mode: v[0],
                        index: id(raw),
                        material_step: v[1].rem_euclid(256) as u8,
                        counter: v[2],
                    }),
                    StateData::BuildingCastle(_) => {
                        StateData::BuildingCastle(BuildingCastleData { inventory: id(raw) })
                    }
                    StateData::MoveResourceOut(_) => StateData::MoveResourceOut(MoveResourceOutData {
                        res: v[0].rem_euclid(Resource::COUNT as i32 + 1) as u8,
                        res_dest: id(raw),
                        next_state: State::ALL[v[1].unsigned_abs() as usize % State::ALL.len()],
                    }),
                    StateData::ReadyToLeaveInventory(_) => {
                        StateData::ReadyToLeaveInventory(ReadyToLeaveInventoryData {
                            mode: v[0],
                            dest: id(raw),
                            inventory: id(v[1].unsigned_abs()),
                        })
                    }
                    StateData::FreeWalking(_) => StateData::FreeWalking(FreeWalkingData {
                        dist_col: v[0],
                        dist_row: v[1],
                        neg_dist1: if v[2] < 0 { NEG_DIST_RETURNING } else { v[2] },
                        neg_dist2: v[3],
                        flags: v[4].rem_euclid(256) as u8,
                    }),
                    StateData::Production(_) => {
                        StateData::Production(ProductionData { mode: v[0] })
                    }
                    StateData::Lost(_) => StateData::Lost(LostData { field_b: v[0] }),
                    StateData::Mining(_) => StateData::Mining(MiningData {
                        substate: v[0].rem_euclid(11),
                        res: res(v[1]),
                        deposit: GroundDeposit::ALL[v[2].unsigned_abs() as usize % 6],
                    }),
                    StateData::Smelting(_) => StateData::Smelting(SmeltingData {
                        mode: v[0],
                        counter: v[1],
                        kind: u8::from(v[2] > 0),
                    }),
                    StateData::Attacking(_) => StateData::Attacking(AttackingData {
                        move_index: v[0],
                        attacker_won: u8::from(v[1] > 0),
                        field_d: v[2],
                        defender: id(raw),
                    }),
                    StateData::AttackingVictoryFree(_) => {
                        StateData::AttackingVictoryFree(AttackingVictoryFreeData {
                            move_index: v[0],
                            dist_col: v[1],
                            dist_row: v[2],
                            defender: id(raw),
                        })
                    }
                    StateData::DefendingFree(_) => StateData::DefendingFree(DefendingFreeData {
                        dist_col: v[0],
                        dist_row: v[1],
                        field_d: v[2],
                        other_dist_col: v[3],
                        other_dist_row: v[4],
                    }),
                    StateData::LeaveForWalkToFight(_) => {
                        StateData::LeaveForWalkToFight(LeaveForWalkToFightData {
                            dist_col: v[0],
                            dist_row: v[1],
                            field_d: v[2],
                            field_e: raw as i32,
                            next_state: State::ALL[v[3].unsigned_abs() as usize % State::ALL.len()],
                        })
                    }
                    StateData::IdleOnPath(_) => StateData::IdleOnPath(IdleOnPathData {
                        flag: id(raw),
                        field_e: v[0],
                        rev_dir: v[1] % 6,
                    }),
                    other => other,
                };
                let mut serf = Serf::new(SerfId(index), owner, SerfType::ALL[kind], pos, tick);
                serf.set_state_with(state, data);
                serf.animation = anim;
                serf.counter = counter;
                serf.sound = sound;
                let next_knight = matches!(data, StateData::Defending).then(|| id(raw)).flatten();
                SerfRecord { serf, next_knight }
            })
    }

    fn block(text: &str) -> TxtNode {
        let root = DefaultSerfTxt::parse_str(text).unwrap();
        root.get("serf").unwrap().clone()
    }

    #[test]
    fn test_walking_serf_text() {
        let mut serf = Serf::new(SerfId(4), 0, SerfType::Generic, 390, 812);
        serf.set_state_with(
            State::Walking,
            StateData::Walking(WalkingData {
                dir1: -2,
                res: Some(Resource::Plank),
                dest: Some(crate::arena::FlagId(7)),
                dir: 1,
                wait_counter: 0,
            }),
        );
        let mut w = TxtWriter::new();
        write_serf(
            &mut w,
            &SerfRecord {
                serf,
                next_knight: None,
            },
        );
        let text = w.finish();
        assert!(text.contains("state = walking"));
        assert!(text.contains("direction1 = -2"));
        assert!(text.contains("resource = plank"));
        assert!(text.contains("destination = 7"));
        assert!(!text.contains("field_b"));
    }

    #[test]
    fn test_missing_payload_field_is_an_error() {
        let node = block(
            "serf = { index = 2 owner = 0 type = 0 animation = 0 counter = 0 pos = 0 \
             tick = 0 sound = 0 state = lost }",
        );
        assert_eq!(
            read_serf(&node).unwrap_err(),
            PersistError::MissingField {
                serf: 2,
                state: State::Lost,
                field: "data",
            }
        );

        let node = block(
            "serf = { index = 2 owner = 0 type = 0 animation = 0 counter = 0 pos = 0 \
             tick = 0 sound = 0 state = lost data = { field_c = 1 } }",
        );
        assert!(matches!(
            read_serf(&node).unwrap_err(),
            PersistError::MissingField { field: "field_b", .. }
        ));
    }

    #[test]
    fn test_unknown_state_name_is_an_error() {
        let node = block("serf = { index = 2 state = dancing }");
        assert!(matches!(
            read_serf(&node).unwrap_err(),
            PersistError::UnknownName { what: "state", .. }
        ));
    }

    #[test]
    fn test_text_save_restores_running_colony() {
        let mut builder = GameBuilder::new().with_player().seed(9);
        let (castle, inv) = builder.castle(0, 6, 6);
        let start = builder.building_flag(castle);
        builder.road(start, &[crate::map::Direction::Right; 3]);
        let mut game = builder.build();
        game.add_serfs_to_inventory(inv, SerfType::Generic, 3);
        game.run_ticks(400).unwrap();

        let text = game.save_serfs_text();
        let mut restored = game.clone();
        restored.rng = crate::rng::GameRng::default();
        restored.load_serfs_text(&text).unwrap();
        assert_eq!(restored.checksum(), game.checksum());

        game.run_ticks(300).unwrap();
        restored.run_ticks(300).unwrap();
        assert_eq!(restored.checksum(), game.checksum());
    }

    #[test]
    fn test_text_save_without_header_is_rejected() {
        let mut game = GameBuilder::new().with_player().build();
        assert!(matches!(
            game.load_serfs_text("serf = { index = 1 }"),
            Err(PersistError::Syntax(_))
        ));
    }

    proptest! {
        #[test]
        fn prop_text_round_trips(record in arb_record()) {
            let mut w = TxtWriter::new();
            write_serf(&mut w, &record);
            let node = block(&w.finish());
            prop_assert_eq!(read_serf(&node).unwrap(), record);
        }
    }
}
