//! Fixed 32-byte little-endian serf records.
//!
//! ```text
//! 0       owner (bits 0-1) | type (bits 2-6) | sound (bit 7)
//! 1       animation
//! 2..6    counter (i32)
//! 6..10   position (u32)
//! 10..12  tick (u16)
//! 12      state code
//! 13..32  payload, laid out per state group
//! ```
//!
//! Carried resources in `Walking` and `Mining` payloads are stored plus one
//! so that 0 means "nothing"; `MoveResourceOut` already keeps them that way
//! and is stored raw. Entity references are 1-based arena indices, 0 = none.
//!
//! A save file is a `u32` record count followed by the header words
//! (`tick: u16`, `game_time: u32`, three RNG `u16`s) and then one
//! `(u32 index, record)` pair per serf.

use super::{PersistError, SaveHeader, SerfRecord};
use crate::arena::{raw_index, Id, SerfId};
use crate::map::GroundDeposit;
use crate::resource::Resource;
use crate::serf::*;
use crate::Game;

pub const RECORD_LEN: usize = 32;
const PAYLOAD: usize = 13;
const HEADER_LEN: usize = 4 + 2 + 4 + 6;

struct Writer {
    buf: [u8; RECORD_LEN],
    at: usize,
}

impl Writer {
    fn put(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf[self.at..self.at + bytes.len()].copy_from_slice(bytes);
        self.at += bytes.len();
        self
    }

    fn u8(&mut self, v: u8) -> &mut Self {
        self.put(&[v])
    }

    fn i8(&mut self, v: i32) -> &mut Self {
        self.put(&(v as i8).to_le_bytes())
    }

    fn i16(&mut self, v: i32) -> &mut Self {
        self.put(&(v as i16).to_le_bytes())
    }

    fn i32(&mut self, v: i32) -> &mut Self {
        self.put(&v.to_le_bytes())
    }

    fn id<I: Id>(&mut self, id: Option<I>) -> &mut Self {
        self.put(&raw_index(id).to_le_bytes())
    }

    fn state(&mut self, s: State) -> &mut Self {
        self.u8(s.code())
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    at: usize,
    serf: u32,
}

impl Reader<'_> {
    fn take<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0; N];
        out.copy_from_slice(&self.buf[self.at..self.at + N]);
        self.at += N;
        out
    }

    fn u8(&mut self) -> u8 {
        self.take::<1>()[0]
    }

    fn i8(&mut self) -> i32 {
        i32::from(i8::from_le_bytes(self.take()))
    }

    fn i16(&mut self) -> i32 {
        i32::from(i16::from_le_bytes(self.take()))
    }

    fn i32(&mut self) -> i32 {
        i32::from_le_bytes(self.take())
    }

    fn id<I: Id>(&mut self) -> Option<I> {
        I::from_raw(u32::from_le_bytes(self.take()))
    }

    fn state(&mut self) -> Result<State, PersistError> {
        let code = self.u8();
        State::from_code(code).ok_or(self.unknown("state", code))
    }

    /// A resource stored plus one.
    fn resource(&mut self) -> Result<Option<Resource>, PersistError> {
        match self.u8() {
            0 => Ok(None),
            code => Resource::from_code(code - 1)
                .map(Some)
                .ok_or(self.unknown("resource", code)),
        }
    }

    fn unknown(&self, what: &'static str, code: u8) -> PersistError {
        PersistError::UnknownCode {
            serf: self.serf,
            what,
            code: i64::from(code),
        }
    }
}

fn resource_code(res: Option<Resource>) -> u8 {
    res.map_or(0, |r| r.code() + 1)
}

/// Encode one serf.
pub fn encode_serf(record: &SerfRecord) -> [u8; RECORD_LEN] {
    let serf = &record.serf;
    let mut w = Writer {
        buf: [0; RECORD_LEN],
        at: 0,
    };
    w.u8((serf.owner & 3) | (serf.kind.code() & 0x1f) << 2 | u8::from(serf.sound) << 7)
        .u8(serf.animation as u8)
        .i32(serf.counter)
        .put(&serf.pos.to_le_bytes())
        .put(&serf.tick.to_le_bytes())
        .state(serf.state);

    match &serf.data {
        StateData::None => {}
        StateData::IdleInStock(d) => {
            w.id(d.inventory);
        }
        StateData::Walking(d) => {
            w.i8(d.dir1)
                .u8(resource_code(d.res))
                .id(d.dest)
                .i8(d.dir)
                .i32(d.wait_counter);
        }
        StateData::EnteringBuilding(d) => {
            w.i32(d.field_b).i16(d.slope_len);
        }
        StateData::LeavingBuilding(d) => {
            w.i32(d.field_b)
                .i32(d.dest)
                .i32(d.dest2)
                .i8(d.dir)
                .state(d.next_state);
        }
        StateData::ReadyToEnter(d) => {
            w.i32(d.field_b);
        }
        StateData::Digging(d) => {
            w.i8(d.h_index).i8(d.target_h).i8(d.dig_pos).i16(d.substate);
        }
        StateData::Building(d) => {
            w.i32(d.mode).id(d.index).u8(d.material_step).i32(d.counter);
        }
        StateData::BuildingCastle(d) => {
            w.id(d.inventory);
        }
        StateData::MoveResourceOut(d) => {
            w.u8(d.res).id(d.res_dest).state(d.next_state);
        }
        StateData::ReadyToLeaveInventory(d) => {
            w.i32(d.mode).id(d.dest).id(d.inventory);
        }
        StateData::FreeWalking(d) => {
            w.i16(d.dist_col)
                .i16(d.dist_row)
                .i16(d.neg_dist1)
                .i16(d.neg_dist2)
                .u8(d.flags);
        }
        StateData::Production(d) => {
            w.i32(d.mode);
        }
        StateData::Lost(d) => {
            w.i32(d.field_b);
        }
        StateData::Mining(d) => {
            w.i8(d.substate)
                .u8(resource_code(d.res))
                .u8(d.deposit.code());
        }
        StateData::Smelting(d) => {
            w.i32(d.mode).i32(d.counter).u8(d.kind);
        }
        StateData::Attacking(d) => {
            w.i32(d.move_index)
                .u8(d.attacker_won)
                .i32(d.field_d)
                .id(d.defender);
        }
        StateData::AttackingVictoryFree(d) => {
            w.i32(d.move_index)
                .i16(d.dist_col)
                .i16(d.dist_row)
                .id(d.defender);
        }
        StateData::DefendingFree(d) => {
            w.i16(d.dist_col)
                .i16(d.dist_row)
                .i32(d.field_d)
                .i16(d.other_dist_col)
                .i16(d.other_dist_row);
        }
        StateData::LeaveForWalkToFight(d) => {
            w.i16(d.dist_col)
                .i16(d.dist_row)
                .i32(d.field_d)
                .i32(d.field_e)
                .state(d.next_state);
        }
        StateData::IdleOnPath(d) => {
            w.id(d.flag).i32(d.field_e).i8(d.rev_dir);
        }
        StateData::Defending => {
            w.id(record.next_knight);
        }
    }
    w.buf
}

/// Decode the record of serf `id`.
pub fn decode_serf(id: SerfId, bytes: &[u8]) -> Result<SerfRecord, PersistError> {
    if bytes.len() != RECORD_LEN {
        return Err(PersistError::Truncated {
            serf: id.index(),
            expected: RECORD_LEN,
            found: bytes.len(),
        });
    }
    let mut r = Reader {
        buf: bytes,
        at: 0,
        serf: id.index(),
    };
    let packed = r.u8();
    let kind_code = (packed >> 2) & 0x1f;
    let kind = SerfType::from_code(kind_code).ok_or(r.unknown("serf type", kind_code))?;
    let animation = i32::from(r.u8());
    let counter = r.i32();
    let pos = u32::from_le_bytes(r.take());
    let tick = u16::from_le_bytes(r.take());
    let state = r.state()?;
    debug_assert_eq!(r.at, PAYLOAD);

    let mut next_knight = None;
    let data = match StateData::for_state(state) {
        StateData::None => StateData::None,
        StateData::IdleInStock(_) => StateData::IdleInStock(IdleInStockData {
            inventory: r.id(),
        }),
        StateData::Walking(_) => StateData::Walking(WalkingData {
            dir1: r.i8(),
            res: r.resource()?,
            dest: r.id(),
            dir: r.i8(),
            wait_counter: r.i32(),
        }),
        StateData::EnteringBuilding(_) => StateData::EnteringBuilding(EnteringBuildingData {
            field_b: r.i32(),
            slope_len: r.i16(),
        }),
        StateData::LeavingBuilding(_) => StateData::LeavingBuilding(LeavingBuildingData {
            field_b: r.i32(),
            dest: r.i32(),
            dest2: r.i32(),
            dir: r.i8(),
            next_state: r.state()?,
        }),
        StateData::ReadyToEnter(_) => StateData::ReadyToEnter(ReadyToEnterData {
            field_b: r.i32(),
        }),
        StateData::Digging(_) => StateData::Digging(DiggingData {
            h_index: r.i8(),
            target_h: r.i8(),
            dig_pos: r.i8(),
            substate: r.i16(),
        }),
        StateData::Building(_) => StateData::Building(BuildingData {
            mode: r.i32(),
            index: r.id(),
            material_step: r.u8(),
            counter: r.i32(),
        }),
        StateData::BuildingCastle(_) => StateData::BuildingCastle(BuildingCastleData {
            inventory: r.id(),
        }),
        StateData::MoveResourceOut(_) => StateData::MoveResourceOut(MoveResourceOutData {
            res: r.u8(),
            res_dest: r.id(),
            next_state: r.state()?,
        }),
        StateData::ReadyToLeaveInventory(_) => {
            StateData::ReadyToLeaveInventory(ReadyToLeaveInventoryData {
                mode: r.i32(),
                dest: r.id(),
                inventory: r.id(),
            })
        }
        StateData::FreeWalking(_) => StateData::FreeWalking(FreeWalkingData {
            dist_col: r.i16(),
            dist_row: r.i16(),
            neg_dist1: r.i16(),
            neg_dist2: r.i16(),
            flags: r.u8(),
        }),
        StateData::Production(_) => StateData::Production(ProductionData { mode: r.i32() }),
        StateData::Lost(_) => StateData::Lost(LostData { field_b: r.i32() }),
        StateData::Mining(_) => {
            let substate = r.i8();
            let res = r.resource()?;
            let code = r.u8();
            let deposit = GroundDeposit::from_code(code).ok_or(r.unknown("deposit", code))?;
            StateData::Mining(MiningData {
                substate,
                res,
                deposit,
            })
        }
        StateData::Smelting(_) => StateData::Smelting(SmeltingData {
            mode: r.i32(),
            counter: r.i32(),
            kind: r.u8(),
        }),
        StateData::Attacking(_) => StateData::Attacking(AttackingData {
            move_index: r.i32(),
            attacker_won: r.u8(),
            field_d: r.i32(),
            defender: r.id(),
        }),
        StateData::AttackingVictoryFree(_) => {
            StateData::AttackingVictoryFree(AttackingVictoryFreeData {
                move_index: r.i32(),
                dist_col: r.i16(),
                dist_row: r.i16(),
                defender: r.id(),
            })
        }
        StateData::DefendingFree(_) => StateData::DefendingFree(DefendingFreeData {
            dist_col: r.i16(),
            dist_row: r.i16(),
            field_d: r.i32(),
            other_dist_col: r.i16(),
            other_dist_row: r.i16(),
        }),
        StateData::LeaveForWalkToFight(_) => {
            StateData::LeaveForWalkToFight(LeaveForWalkToFightData {
                dist_col: r.i16(),
                dist_row: r.i16(),
                field_d: r.i32(),
                field_e: r.i32(),
                next_state: r.state()?,
            })
        }
        StateData::IdleOnPath(_) => StateData::IdleOnPath(IdleOnPathData {
            flag: r.id(),
            field_e: r.i32(),
            rev_dir: r.i8(),
        }),
        StateData::Defending => {
            next_knight = r.id();
            StateData::Defending
        }
    };

    Ok(SerfRecord {
        serf: Serf {
            id,
            owner: packed & 3,
            kind,
            state,
            data,
            animation,
            counter,
            pos,
            tick,
            sound: packed & 0x80 != 0,
        },
        next_knight,
    })
}

impl Game {
    /// Binary serf save.
    pub fn save_serfs_binary(&self) -> Vec<u8> {
        let records = self.serf_records();
        let header = self.save_header();
        let mut out = Vec::with_capacity(HEADER_LEN + records.len() * (4 + RECORD_LEN));
        out.extend_from_slice(&(records.len() as u32).to_le_bytes());
        out.extend_from_slice(&header.tick.to_le_bytes());
        out.extend_from_slice(&header.game_time.to_le_bytes());
        for word in header.rng {
            out.extend_from_slice(&word.to_le_bytes());
        }
        for record in &records {
            out.extend_from_slice(&record.serf.id.index().to_le_bytes());
            out.extend_from_slice(&encode_serf(record));
        }
        log::debug!("binary save: {} serfs, {} bytes", records.len(), out.len());
        out
    }

    pub fn load_serfs_binary(&mut self, bytes: &[u8]) -> Result<(), PersistError> {
        let truncated = |found: usize, expected: usize| PersistError::Truncated {
            serf: 0,
            expected,
            found,
        };
        if bytes.len() < HEADER_LEN {
            return Err(truncated(bytes.len(), HEADER_LEN));
        }
        let mut r = Reader {
            buf: bytes,
            at: 0,
            serf: 0,
        };
        let count = u32::from_le_bytes(r.take()) as usize;
        let header = SaveHeader {
            tick: u16::from_le_bytes(r.take()),
            game_time: u32::from_le_bytes(r.take()),
            rng: [
                u16::from_le_bytes(r.take()),
                u16::from_le_bytes(r.take()),
                u16::from_le_bytes(r.take()),
            ],
        };
        let expected = HEADER_LEN + count * (4 + RECORD_LEN);
        if bytes.len() != expected {
            return Err(truncated(bytes.len(), expected));
        }
        let records = bytes[HEADER_LEN..]
            .chunks_exact(4 + RECORD_LEN)
            .map(|chunk| {
                let index = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                let id = SerfId::from_raw(index).ok_or(PersistError::UnknownCode {
                    serf: 0,
                    what: "serf index",
                    code: 0,
                })?;
                decode_serf(id, &chunk[4..])
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.restore_serfs(header, records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::text::tests::arb_record;
    use crate::testing::GameBuilder;
    use proptest::prelude::*;

    fn record(state: State, data: StateData) -> SerfRecord {
        let mut serf = Serf::new(SerfId(3), 2, SerfType::Miner, 0x0405, 77);
        serf.set_state_with(state, data);
        serf.counter = -12;
        serf.animation = 131;
        SerfRecord {
            serf,
            next_knight: None,
        }
    }

    #[test]
    fn test_header_layout() {
        let mut rec = record(State::Null, StateData::None);
        rec.serf.sound = true;
        let bytes = encode_serf(&rec);
        assert_eq!(bytes[0], 2 | (SerfType::Miner.code() << 2) | 0x80);
        assert_eq!(bytes[1], 131);
        assert_eq!(&bytes[2..6], &(-12i32).to_le_bytes());
        assert_eq!(&bytes[6..10], &0x0405u32.to_le_bytes());
        assert_eq!(&bytes[10..12], &77u16.to_le_bytes());
        assert_eq!(bytes[12], State::Null.code());
        assert!(bytes[13..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_walking_resource_is_stored_plus_one() {
        let data = StateData::Walking(WalkingData {
            dir1: -2,
            res: Some(Resource::Fish),
            ..WalkingData::default()
        });
        let bytes = encode_serf(&record(State::Transporting, data));
        assert_eq!(bytes[13] as i8, -2);
        assert_eq!(bytes[14], Resource::Fish.code() + 1);

        let empty = record(State::Walking, StateData::for_state(State::Walking));
        assert_eq!(encode_serf(&empty)[14], 0);
    }

    #[test]
    fn test_move_resource_out_is_stored_raw() {
        let data = StateData::MoveResourceOut(MoveResourceOutData {
            res: Resource::Plank.code() + 1,
            res_dest: None,
            next_state: State::DropResourceOut,
        });
        let bytes = encode_serf(&record(State::MoveResourceOut, data));
        assert_eq!(bytes[13], Resource::Plank.code() + 1);
        assert_eq!(bytes[18], State::DropResourceOut.code());
    }

    #[test]
    fn test_short_record_is_rejected() {
        let err = decode_serf(SerfId(1), &[0; 20]).unwrap_err();
        assert!(matches!(err, PersistError::Truncated { found: 20, .. }));
    }

    #[test]
    fn test_unknown_state_code_is_rejected() {
        let mut bytes = encode_serf(&record(State::Null, StateData::None));
        bytes[12] = 200;
        let err = decode_serf(SerfId(1), &bytes).unwrap_err();
        assert!(matches!(err, PersistError::UnknownCode { what: "state", code: 200, .. }));
    }

    #[test]
    fn test_save_file_restores_garrison_order() {
        let mut builder = GameBuilder::new().with_player();
        let tower = builder.building(0, 8, 8, crate::building::BuildingType::Tower, true);
        let a = builder.garrison(tower, SerfType::Knight1);
        let b = builder.garrison(tower, SerfType::Knight3);
        let c = builder.garrison(tower, SerfType::Knight0);
        let mut game = builder.build();
        game.run_ticks(5).unwrap();
        let saved = game.save_serfs_binary();

        let mut restored = game.clone();
        restored.buildings.get_mut(tower).unwrap().knights.clear();
        restored.tick = 0;
        restored.load_serfs_binary(&saved).unwrap();
        assert_eq!(
            restored.get_building(tower).unwrap().knights,
            vec![a, b, c]
        );
        assert_eq!(restored.tick, game.tick);
        assert_eq!(restored.checksum(), game.checksum());
    }

    #[test]
    fn test_idle_on_path_without_flag_fails_to_load() {
        let mut builder = GameBuilder::new().with_player();
        let pos = builder.pos(4, 4);
        let serf = builder.serf_inside(pos, SerfType::Transporter, State::IdleOnPath);
        let mut game = builder.build();
        let saved = game.save_serfs_binary();
        let err = game.load_serfs_binary(&saved).unwrap_err();
        assert_eq!(
            err,
            PersistError::Unresolved {
                serf: serf.0,
                state: State::IdleOnPath,
                what: "flag",
                index: 0,
            }
        );
    }

    proptest! {
        #[test]
        fn prop_record_round_trips(record in arb_record()) {
            let bytes = encode_serf(&record);
            prop_assert_eq!(decode_serf(record.serf.id, &bytes).unwrap(), record);
        }
    }
}
