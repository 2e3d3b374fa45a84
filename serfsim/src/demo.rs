use anyhow::{anyhow, Context, Result};
use rand::{Rng, SeedableRng};
use serfsim_core::{
    BuildingType, Direction, FlagId, Game, GameRng, Map, MapObject, Resource, SerfType, SimConfig,
};

/// 64 × 64.
const DEMO_MAP_SHIFT: u32 = 6;
const CASTLE: (i32, i32) = (20, 20);

/// Buildings hung off the castle road network: `(col, row, kind)`. Each
/// building's flag sits one step down-right of it.
const SITES: [(i32, i32, BuildingType); 5] = [
    (24, 20, BuildingType::Lumberjack),
    (28, 20, BuildingType::Sawmill),
    (20, 24, BuildingType::Stonecutter),
    (16, 20, BuildingType::Forester),
    (28, 24, BuildingType::Hut),
];

/// Straight roads of `ROAD_STEPS` cells as `(start flag, direction)`.
const ROADS: [((i32, i32), Direction); 5] = [
    ((21, 21), Direction::Right),
    ((25, 21), Direction::Right),
    ((21, 21), Direction::Down),
    ((21, 21), Direction::Left),
    ((29, 21), Direction::Down),
];
const ROAD_STEPS: usize = 4;

const STARTING_SERFS: [(SerfType, u32); 3] = [
    (SerfType::Generic, 20),
    (SerfType::Knight0, 3),
    (SerfType::Knight1, 1),
];

const STARTING_STOCK: [(Resource, u32); 8] = [
    (Resource::Plank, 40),
    (Resource::Stone, 20),
    (Resource::Axe, 2),
    (Resource::Saw, 1),
    (Resource::Pick, 1),
    (Resource::Hammer, 4),
    (Resource::Shovel, 2),
    (Resource::Lumber, 8),
];

/// A single-player colony: castle, four working buildings and a hut joined
/// by roads, with forest to the north and stone to the south. Scenery comes
/// from its own generator so `seed` also fixes the game's RNG stream.
pub fn build_demo_colony(seed: u64, config: SimConfig) -> Result<Game> {
    let mut game = Game::new(Map::new(DEMO_MAP_SHIFT, DEMO_MAP_SHIFT), config, seed);
    let player = game.add_player();
    let mut scenery = GameRng::seed_from_u64(seed.rotate_left(17) ^ 0x5e1f);

    let castle_pos = game.map.pos(CASTLE.0, CASTLE.1);
    let (_, inventory) = game
        .found_colony(player, castle_pos)
        .ok_or_else(|| anyhow!("no room for the castle at {:?}", CASTLE))?;

    for (col, row, kind) in SITES {
        let pos = game.map.pos(col, row);
        game.build_building(player, pos, kind)
            .ok_or_else(|| anyhow!("no room for {:?} at ({}, {})", kind, col, row))?;
    }
    for ((col, row), dir) in ROADS {
        let start = flag_at(&game, col, row)?;
        game.build_road(start, &[dir; ROAD_STEPS])
            .with_context(|| format!("road {:?} from ({}, {})", dir, col, row))?;
    }

    for row in 8..16 {
        for col in 14..34 {
            let pos = game.map.pos(col, row);
            if game.map.object(pos) == MapObject::None && scenery.gen_bool(0.4) {
                game.map.set_object(pos, MapObject::Tree(scenery.gen_range(0..8)), 0);
            }
        }
    }
    for row in 27..31 {
        for col in 14..26 {
            let pos = game.map.pos(col, row);
            if game.map.object(pos) == MapObject::None && scenery.gen_bool(0.25) {
                game.map.set_object(pos, MapObject::Stone(scenery.gen_range(0..8)), 0);
            }
        }
    }

    for (kind, count) in STARTING_SERFS {
        game.add_serfs_to_inventory(inventory, kind, count);
    }
    for (res, count) in STARTING_STOCK {
        game.add_resources_to_inventory(inventory, res, count);
    }
    log::info!(
        "demo colony: {} serfs, {} buildings, {} flags",
        game.serfs.len(),
        game.buildings.len(),
        game.flags.len()
    );
    Ok(game)
}

fn flag_at(game: &Game, col: i32, row: i32) -> Result<FlagId> {
    game.flag_at(game.map.pos(col, row))
        .ok_or_else(|| anyhow!("no flag at ({}, {})", col, row))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demo_colony_is_seed_stable() {
        let a = build_demo_colony(3, SimConfig::default()).unwrap();
        let b = build_demo_colony(3, SimConfig::default()).unwrap();
        let c = build_demo_colony(4, SimConfig::default()).unwrap();
        assert_eq!(a.checksum(), b.checksum());
        assert_ne!(a.checksum(), c.checksum());
    }

    #[test]
    fn test_demo_roads_reach_every_site() {
        let game = build_demo_colony(1, SimConfig::default()).unwrap();
        let castle_flag = flag_at(&game, 21, 21).unwrap();
        for (_, b) in game.buildings.iter().filter(|(_, b)| b.flag != castle_flag) {
            assert!(game.flags_connected(castle_flag, b.flag), "{:?}", b.kind);
        }
    }
}
