//! Serf save adapters.
//!
//! Two encodings of the same content: the serf arena plus the game clock and
//! RNG words. Collaborator state (map, flags, buildings, inventories,
//! players) travels in the JSON snapshot; a serf save is loaded on top of the
//! world it was taken from.
//!
//! Only the fields of the current state's payload group are stored. The
//! defender order of a garrison is stored as a `next_knight` link on each
//! stationed knight and turned back into the building's queue on load.

pub mod binary;
pub mod text;

use crate::arena::{Arena, BuildingId, Id, SerfId};
use crate::rng::GameRng;
use crate::serf::{Serf, State, StateData};
use crate::Game;
use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PersistError {
    #[error("record for serf {serf} is {found} bytes, expected {expected}")]
    Truncated {
        serf: u32,
        expected: usize,
        found: usize,
    },
    #[error("serf {serf}: unknown {what} code {code}")]
    UnknownCode {
        serf: u32,
        what: &'static str,
        code: i64,
    },
    #[error("serf {serf}: unknown {what} name `{name}`")]
    UnknownName {
        serf: u32,
        what: &'static str,
        name: String,
    },
    #[error("serf {serf} in state {state:?}: missing field `{field}`")]
    MissingField {
        serf: u32,
        state: State,
        field: &'static str,
    },
    #[error("serf {serf} in state {state:?}: {what} {index} does not exist")]
    Unresolved {
        serf: u32,
        state: State,
        what: &'static str,
        index: u32,
    },
    #[error("serf {0} appears twice")]
    Duplicate(u32),
    #[error("map cell {pos} is occupied by serf {serf}, which the save does not place there")]
    Occupancy { pos: u32, serf: u32 },
    #[error("text save: {0}")]
    Syntax(String),
}

/// A decoded serf plus the persisted link to the next knight in its
/// building's defender queue.
#[derive(Debug, Clone, PartialEq)]
pub struct SerfRecord {
    pub serf: Serf,
    pub next_knight: Option<SerfId>,
}

/// Clock and RNG stored alongside the serfs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveHeader {
    pub tick: u16,
    pub game_time: u32,
    pub rng: [u16; 3],
}

impl Game {
    pub(crate) fn save_header(&self) -> SaveHeader {
        SaveHeader {
            tick: self.tick,
            game_time: self.game_time,
            rng: self.rng.words(),
        }
    }

    /// Every serf in id order, with its defender-queue successor filled in.
    pub(crate) fn serf_records(&self) -> Vec<SerfRecord> {
        let mut next = FxHashMap::default();
        for (_, building) in self.buildings.iter() {
            for pair in building.knights.iter().zip(building.knights.iter().skip(1)) {
                next.insert(*pair.0, *pair.1);
            }
        }
        self.serfs
            .iter()
            .map(|(id, serf)| SerfRecord {
                serf: serf.clone(),
                next_knight: match serf.data {
                    StateData::Defending => next.get(&id).copied(),
                    _ => None,
                },
            })
            .collect()
    }

    /// Replace the serf arena, clock and RNG with a decoded save.
    ///
    /// Every flag, building and inventory a payload names must exist in the
    /// current world, and every occupied map cell must point at a serf the
    /// save places there. On error the game is left unchanged.
    pub fn restore_serfs(
        &mut self,
        header: SaveHeader,
        records: Vec<SerfRecord>,
    ) -> Result<(), PersistError> {
        let mut serfs: Arena<SerfId, Serf> = Arena::new();
        let mut positions = FxHashMap::default();
        for record in &records {
            let id = record.serf.id;
            if positions.insert(id, record.serf.pos).is_some() {
                return Err(PersistError::Duplicate(id.index()));
            }
            self.check_references(record)?;
        }
        for pos in 0..self.map.size() as u32 {
            if let Some(serf) = self.map.serf_index(pos) {
                if positions.get(&serf) != Some(&pos) {
                    return Err(PersistError::Occupancy {
                        pos,
                        serf: serf.index(),
                    });
                }
            }
        }

        let queues = self.defender_queues(&records)?;
        for record in records {
            serfs.insert_at(record.serf.id, record.serf);
        }
        for (_, building) in self.buildings.iter_mut() {
            building.knights.clear();
        }
        for (building, queue) in queues {
            if let Some(b) = self.buildings.get_mut(building) {
                b.knights = queue.into();
            }
        }
        self.serfs = serfs;
        self.tick = header.tick;
        self.game_time = header.game_time;
        self.rng = GameRng::from_words(header.rng);
        log::info!(
            "restored {} serfs at game time {}",
            self.serfs.len(),
            self.game_time
        );
        Ok(())
    }

    fn check_references(&self, record: &SerfRecord) -> Result<(), PersistError> {
        let serf = &record.serf;
        let missing = |what: &'static str, index: u32| PersistError::Unresolved {
            serf: serf.id.index(),
            state: serf.state,
            what,
            index,
        };
        let flag = |id: Option<crate::arena::FlagId>| match id {
            Some(f) if !self.flags.contains(f) => Err(missing("flag", f.index())),
            _ => Ok(()),
        };
        let inventory = |id: Option<crate::arena::InventoryId>| match id {
            Some(i) if !self.inventories.contains(i) => Err(missing("inventory", i.index())),
            _ => Ok(()),
        };
        match &serf.data {
            StateData::IdleInStock(d) => inventory(d.inventory),
            StateData::BuildingCastle(d) => inventory(d.inventory),
            StateData::Walking(d) => flag(d.dest),
            StateData::MoveResourceOut(d) => flag(d.res_dest),
            StateData::ReadyToLeaveInventory(d) => {
                flag(d.dest)?;
                inventory(d.inventory)
            }
            StateData::Building(d) => match d.index {
                Some(b) if !self.buildings.contains(b) => Err(missing("building", b.index())),
                _ => Ok(()),
            },
            StateData::IdleOnPath(d) => match d.flag {
                None => Err(missing("flag", 0)),
                f => flag(f),
            },
            _ => Ok(()),
        }
    }

    /// Rebuild each garrison's queue from the `next_knight` links: the head
    /// is the stationed knight nobody links to. Every stationed knight must
    /// end up in exactly one queue, so a chain that loops back on itself is
    /// rejected.
    fn defender_queues(
        &self,
        records: &[SerfRecord],
    ) -> Result<Vec<(BuildingId, Vec<SerfId>)>, PersistError> {
        let stationed: Vec<&SerfRecord> = records
            .iter()
            .filter(|r| matches!(r.serf.data, StateData::Defending))
            .collect();
        let linked: FxHashSet<SerfId> = stationed.iter().filter_map(|r| r.next_knight).collect();
        let mut queues = Vec::new();
        for head in stationed.iter().filter(|r| !linked.contains(&r.serf.id)) {
            let building = self.building_at(head.serf.pos).ok_or(PersistError::Unresolved {
                serf: head.serf.id.index(),
                state: head.serf.state,
                what: "building at position",
                index: head.serf.pos,
            })?;
            let mut queue = vec![head.serf.id];
            let mut link = head.next_knight;
            while let Some(next) = link {
                let record = stationed
                    .iter()
                    .find(|r| r.serf.id == next)
                    .filter(|_| !queue.contains(&next))
                    .ok_or(PersistError::Unresolved {
                        serf: queue[queue.len() - 1].index(),
                        state: head.serf.state,
                        what: "next knight",
                        index: next.index(),
                    })?;
                queue.push(next);
                link = record.next_knight;
            }
            queues.push((building, queue));
        }
        let mut placed = FxHashSet::default();
        for (_, queue) in &queues {
            for &knight in queue {
                if !placed.insert(knight) {
                    let record = stationed.iter().find(|r| r.serf.id == knight);
                    return Err(PersistError::Unresolved {
                        serf: knight.index(),
                        state: record.map_or(State::Null, |r| r.serf.state),
                        what: "single defender queue for knight",
                        index: knight.index(),
                    });
                }
            }
        }
        if let Some(orphan) = stationed.iter().find(|r| !placed.contains(&r.serf.id)) {
            return Err(PersistError::Unresolved {
                serf: orphan.serf.id.index(),
                state: orphan.serf.state,
                what: "queue head for next knight",
                index: orphan.next_knight.map_or(0, |k| k.index()),
            });
        }
        Ok(queues)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::building::BuildingType;
    use crate::serf::SerfType;
    use crate::testing::GameBuilder;

    fn garrisoned_hut() -> (Game, BuildingId, SerfId, SerfId) {
        let mut builder = GameBuilder::new().with_player();
        let hut = builder.building(0, 8, 8, BuildingType::Hut, true);
        let a = builder.garrison(hut, SerfType::Knight1);
        let b = builder.garrison(hut, SerfType::Knight2);
        (builder.build(), hut, a, b)
    }

    #[test]
    fn test_defender_queue_survives_restore() {
        let (mut game, hut, a, b) = garrisoned_hut();
        let records = game.serf_records();
        game.restore_serfs(game.save_header(), records).unwrap();
        assert_eq!(game.get_building(hut).unwrap().knights, [a, b]);
    }

    #[test]
    fn test_cyclic_defender_chain_is_rejected() {
        let (mut game, hut, a, b) = garrisoned_hut();
        let mut records = game.serf_records();
        for record in &mut records {
            record.next_knight = Some(if record.serf.id == a { b } else { a });
        }
        let err = game.restore_serfs(game.save_header(), records).unwrap_err();
        assert!(matches!(err, PersistError::Unresolved { serf, .. } if serf == a.index()));
        assert_eq!(game.get_building(hut).unwrap().knights, [a, b]);
    }

    #[test]
    fn test_shared_defender_link_is_rejected() {
        let mut builder = GameBuilder::new().with_player();
        let hut = builder.building(0, 8, 8, BuildingType::Hut, true);
        let a = builder.garrison(hut, SerfType::Knight1);
        let b = builder.garrison(hut, SerfType::Knight1);
        let c = builder.garrison(hut, SerfType::Knight1);
        let mut game = builder.build();
        let mut records = game.serf_records();
        for record in &mut records {
            record.next_knight = (record.serf.id != c).then_some(c);
        }
        let err = game.restore_serfs(game.save_header(), records).unwrap_err();
        assert!(matches!(err, PersistError::Unresolved { serf, .. } if serf == c.index()));
        assert_eq!(game.get_building(hut).unwrap().knights, [a, b, c]);
    }
}
