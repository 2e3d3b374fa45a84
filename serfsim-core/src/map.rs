//! Map storage and position arithmetic.
//!
//! The map is a wrapping grid of `2^col_shift x 2^row_shift` vertices. Each
//! vertex has six neighbours; moving `Down` keeps the column while moving
//! `DownRight` advances both column and row, which gives the skewed hex
//! layout the road network is drawn on.

use crate::arena::SerfId;
use serde::{Deserialize, Serialize};

/// Flat cell index, `row << col_shift | col`.
pub type MapPos = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Direction {
    Right,
    DownRight,
    Down,
    Left,
    UpLeft,
    Up,
}

impl Direction {
    pub const ALL: [Direction; 6] = [
        Direction::Right,
        Direction::DownRight,
        Direction::Down,
        Direction::Left,
        Direction::UpLeft,
        Direction::Up,
    ];

    pub fn from_index(index: i32) -> Option<Self> {
        if (0..6).contains(&index) {
            Some(Self::ALL[index as usize])
        } else {
            None
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn reverse(self) -> Self {
        self.turn(3)
    }

    /// Rotate by `steps` sixths of a turn (positive = clockwise).
    pub fn turn(self, steps: i32) -> Self {
        Self::ALL[(self as i32 + steps).rem_euclid(6) as usize]
    }

    /// Column and row step.
    pub fn delta(self) -> (i32, i32) {
        match self {
            Direction::Right => (1, 0),
            Direction::DownRight => (1, 1),
            Direction::Down => (0, 1),
            Direction::Left => (-1, 0),
            Direction::UpLeft => (-1, -1),
            Direction::Up => (0, -1),
        }
    }
}

pub const DIRECTION_CYCLE_CW: [Direction; 6] = Direction::ALL;
pub const DIRECTION_CYCLE_CCW: [Direction; 6] = [
    Direction::Up,
    Direction::UpLeft,
    Direction::Left,
    Direction::Down,
    Direction::DownRight,
    Direction::Right,
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GroundDeposit {
    #[default]
    None,
    Gold,
    Iron,
    Coal,
    Stone,
    Fish,
}

impl GroundDeposit {
    pub const ALL: [GroundDeposit; 6] = [
        GroundDeposit::None,
        GroundDeposit::Gold,
        GroundDeposit::Iron,
        GroundDeposit::Coal,
        GroundDeposit::Stone,
        GroundDeposit::Fish,
    ];

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }
}

/// What stands on a map vertex.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MapObject {
    #[default]
    None,
    Flag,
    SmallBuilding,
    LargeBuilding,
    Castle,
    /// Grown tree, variant 0..7.
    Tree(u8),
    NewTree,
    FelledTree,
    Stub,
    /// Stone pile with 0..7 pieces left beyond the last one.
    Stone(u8),
    /// Sown field growing, stage 0..5.
    Seeds(u8),
    /// Ripe field, 0..5 harvests left.
    Field(u8),
    FieldExpired,
    Sign { deposit: GroundDeposit, large: bool },
    SignEmpty,
    Cross,
}

impl MapObject {
    /// Whether a serf may walk across a vertex holding this object.
    pub fn is_passable(self) -> bool {
        matches!(
            self,
            MapObject::None
                | MapObject::Flag
                | MapObject::NewTree
                | MapObject::Stub
                | MapObject::Seeds(_)
                | MapObject::Field(_)
                | MapObject::FieldExpired
                | MapObject::Sign { .. }
                | MapObject::SignEmpty
                | MapObject::Cross
        )
    }

    pub fn is_building(self) -> bool {
        matches!(
            self,
            MapObject::SmallBuilding | MapObject::LargeBuilding | MapObject::Castle
        )
    }
}

/// Terrain type codes below this are water.
pub const TERRAIN_WATER_LIMIT: u8 = 4;
pub const TERRAIN_GRASS: u8 = 5;
pub const MAX_HEIGHT: u8 = 31;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cell {
    pub height: u8,
    pub type_up: u8,
    pub type_down: u8,
    pub object: MapObject,
    /// Flag or building id for flag/building objects.
    pub obj_index: u32,
    pub owner: Option<u8>,
    pub serf: Option<SerfId>,
    pub idle_serf: bool,
    /// Road bitmask, bit `d` set when a road leaves in direction `d`.
    pub paths: u8,
    pub deposit: GroundDeposit,
    pub deposit_amount: u8,
}

impl Default for Cell {
    fn default() -> Self {
        Self {
            height: 0,
            type_up: TERRAIN_GRASS,
            type_down: TERRAIN_GRASS,
            object: MapObject::None,
            obj_index: 0,
            owner: None,
            serf: None,
            idle_serf: false,
            paths: 0,
            deposit: GroundDeposit::None,
            deposit_amount: 0,
        }
    }
}

pub const SPIRAL_LEN: usize = 331;

/// Ring 0 is the centre; ring k starts k steps up-left and walks k steps in
/// each direction in turn.
const fn build_spiral() -> [(i32, i32); SPIRAL_LEN] {
    let steps = [(1, 0), (1, 1), (0, 1), (-1, 0), (-1, -1), (0, -1)];
    let mut out = [(0, 0); SPIRAL_LEN];
    let mut n = 1;
    let mut ring = 1;
    while ring <= 10 {
        let mut col = -ring;
        let mut row = -ring;
        let mut d = 0;
        while d < 6 {
            let mut k = 0;
            while k < ring {
                out[n] = (col, row);
                n += 1;
                col += steps[d].0;
                row += steps[d].1;
                k += 1;
            }
            d += 1;
        }
        ring += 1;
    }
    out
}

pub const SPIRAL: [(i32, i32); SPIRAL_LEN] = build_spiral();

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Map {
    col_shift: u32,
    row_shift: u32,
    cells: Vec<Cell>,
}

impl Map {
    pub fn new(col_shift: u32, row_shift: u32) -> Self {
        let size = 1usize << (col_shift + row_shift);
        Self {
            col_shift,
            row_shift,
            cells: vec![Cell::default(); size],
        }
    }

    pub fn cols(&self) -> u32 {
        1 << self.col_shift
    }

    pub fn rows(&self) -> u32 {
        1 << self.row_shift
    }

    pub fn size(&self) -> usize {
        self.cells.len()
    }

    pub fn pos(&self, col: i32, row: i32) -> MapPos {
        let c = col.rem_euclid(self.cols() as i32) as u32;
        let r = row.rem_euclid(self.rows() as i32) as u32;
        (r << self.col_shift) | c
    }

    pub fn col(&self, pos: MapPos) -> i32 {
        (pos & (self.cols() - 1)) as i32
    }

    pub fn row(&self, pos: MapPos) -> i32 {
        ((pos >> self.col_shift) & (self.rows() - 1)) as i32
    }

    pub fn is_valid(&self, pos: MapPos) -> bool {
        (pos as usize) < self.cells.len()
    }

    pub fn move_dir(&self, pos: MapPos, dir: Direction) -> MapPos {
        let (dc, dr) = dir.delta();
        self.move_by(pos, dc, dr)
    }

    pub fn move_by(&self, pos: MapPos, dcol: i32, drow: i32) -> MapPos {
        self.pos(self.col(pos) + dcol, self.row(pos) + drow)
    }

    /// Shortest wrapped offset from `from` to `to`.
    pub fn dist(&self, from: MapPos, to: MapPos) -> (i32, i32) {
        let wrap = |d: i32, size: i32| {
            let d = d.rem_euclid(size);
            if d >= size / 2 {
                d - size
            } else {
                d
            }
        };
        (
            wrap(self.col(to) - self.col(from), self.cols() as i32),
            wrap(self.row(to) - self.row(from), self.rows() as i32),
        )
    }

    pub fn position_add_spirally(&self, pos: MapPos, n: usize) -> MapPos {
        let (dc, dr) = SPIRAL[n % SPIRAL_LEN];
        self.move_by(pos, dc, dr)
    }

    pub fn cell(&self, pos: MapPos) -> &Cell {
        &self.cells[pos as usize]
    }

    pub fn cell_mut(&mut self, pos: MapPos) -> &mut Cell {
        &mut self.cells[pos as usize]
    }

    pub fn height(&self, pos: MapPos) -> i32 {
        self.cell(pos).height as i32
    }

    pub fn set_height(&mut self, pos: MapPos, height: i32) {
        self.cell_mut(pos).height = height.clamp(0, MAX_HEIGHT as i32) as u8;
    }

    pub fn object(&self, pos: MapPos) -> MapObject {
        self.cell(pos).object
    }

    pub fn obj_index(&self, pos: MapPos) -> u32 {
        self.cell(pos).obj_index
    }

    pub fn set_object(&mut self, pos: MapPos, object: MapObject, index: u32) {
        let cell = self.cell_mut(pos);
        cell.object = object;
        cell.obj_index = index;
    }

    pub fn owner(&self, pos: MapPos) -> Option<u8> {
        self.cell(pos).owner
    }

    pub fn has_owner(&self, pos: MapPos) -> bool {
        self.owner(pos).is_some()
    }

    pub fn set_owner(&mut self, pos: MapPos, owner: Option<u8>) {
        self.cell_mut(pos).owner = owner;
    }

    pub fn serf_index(&self, pos: MapPos) -> Option<SerfId> {
        self.cell(pos).serf
    }

    pub fn has_serf(&self, pos: MapPos) -> bool {
        self.cell(pos).serf.is_some()
    }

    pub fn set_serf_index(&mut self, pos: MapPos, serf: Option<SerfId>) {
        self.cell_mut(pos).serf = serf;
    }

    pub fn idle_serf(&self, pos: MapPos) -> bool {
        self.cell(pos).idle_serf
    }

    pub fn set_idle_serf(&mut self, pos: MapPos) {
        self.cell_mut(pos).idle_serf = true;
    }

    pub fn clear_idle_serf(&mut self, pos: MapPos) {
        self.cell_mut(pos).idle_serf = false;
    }

    pub fn paths(&self, pos: MapPos) -> u8 {
        self.cell(pos).paths
    }

    pub fn has_path(&self, pos: MapPos, dir: Direction) -> bool {
        self.paths(pos) & (1 << dir.index()) != 0
    }

    pub fn add_path(&mut self, pos: MapPos, dir: Direction) {
        self.cell_mut(pos).paths |= 1 << dir.index();
    }

    pub fn remove_path(&mut self, pos: MapPos, dir: Direction) {
        self.cell_mut(pos).paths &= !(1 << dir.index());
    }

    /// Next road direction out of a path cell entered by moving `dir`: the
    /// lowest path bit other than the way back.
    pub fn path_continuation(&self, pos: MapPos, dir: Direction) -> Option<Direction> {
        let out = self.paths(pos) & !(1 << dir.reverse().index());
        (0..6)
            .find(|&d| out & (1 << d) != 0)
            .and_then(|d| Direction::from_index(d as i32))
    }

    pub fn has_flag(&self, pos: MapPos) -> bool {
        self.object(pos) == MapObject::Flag
    }

    pub fn has_building(&self, pos: MapPos) -> bool {
        self.object(pos).is_building()
    }

    pub fn type_up(&self, pos: MapPos) -> u8 {
        self.cell(pos).type_up
    }

    pub fn type_down(&self, pos: MapPos) -> u8 {
        self.cell(pos).type_down
    }

    pub fn set_terrain(&mut self, pos: MapPos, type_up: u8, type_down: u8) {
        let cell = self.cell_mut(pos);
        cell.type_up = type_up;
        cell.type_down = type_down;
    }

    /// The six terrain triangles touching a vertex.
    fn surrounding_types(&self, pos: MapPos) -> [u8; 6] {
        let left = self.move_dir(pos, Direction::Left);
        let up_left = self.move_dir(pos, Direction::UpLeft);
        let up = self.move_dir(pos, Direction::Up);
        [
            self.type_up(pos),
            self.type_down(pos),
            self.type_down(left),
            self.type_up(up_left),
            self.type_down(up_left),
            self.type_up(up),
        ]
    }

    /// Vertex is completely surrounded by water.
    pub fn is_in_water(&self, pos: MapPos) -> bool {
        self.surrounding_types(pos)
            .iter()
            .all(|&t| t < TERRAIN_WATER_LIMIT)
    }

    /// Vertex touches at least one water triangle.
    pub fn is_water_shore(&self, pos: MapPos) -> bool {
        self.surrounding_types(pos)
            .iter()
            .any(|&t| t < TERRAIN_WATER_LIMIT)
    }

    /// Land vertex whose object can be walked over.
    pub fn is_passable(&self, pos: MapPos) -> bool {
        !self.is_in_water(pos) && self.object(pos).is_passable()
    }

    pub fn deposit(&self, pos: MapPos) -> GroundDeposit {
        self.cell(pos).deposit
    }

    pub fn deposit_amount(&self, pos: MapPos) -> u8 {
        self.cell(pos).deposit_amount
    }

    pub fn set_deposit(&mut self, pos: MapPos, deposit: GroundDeposit, amount: u8) {
        let cell = self.cell_mut(pos);
        cell.deposit = if amount == 0 { GroundDeposit::None } else { deposit };
        cell.deposit_amount = amount;
    }

    pub fn remove_ground_deposit(&mut self, pos: MapPos, amount: u8) {
        let cell = self.cell_mut(pos);
        cell.deposit_amount = cell.deposit_amount.saturating_sub(amount);
        if cell.deposit_amount == 0 {
            cell.deposit = GroundDeposit::None;
        }
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_move_wraps_around() {
        let map = Map::new(3, 3);
        let origin = map.pos(0, 0);
        let up_left = map.move_dir(origin, Direction::UpLeft);
        assert_eq!(map.col(up_left), 7);
        assert_eq!(map.row(up_left), 7);
        for dir in Direction::ALL {
            assert_eq!(map.move_dir(map.move_dir(origin, dir), dir.reverse()), origin);
        }
    }

    #[test]
    fn test_direction_turns() {
        assert_eq!(Direction::Right.reverse(), Direction::Left);
        assert_eq!(Direction::Up.turn(1), Direction::Right);
        assert_eq!(Direction::Right.turn(-1), Direction::Up);
        assert_eq!(Direction::from_index(6), None);
    }

    #[test]
    fn test_spiral_rings() {
        assert_eq!(SPIRAL[0], (0, 0));
        assert_eq!(SPIRAL[1], (-1, -1));
        assert_eq!(SPIRAL[7], (-2, -2));
        assert_eq!(SPIRAL[SPIRAL_LEN - 1], (-10, -9));
        // Every entry is distinct.
        let mut seen = std::collections::HashSet::new();
        assert!(SPIRAL.iter().all(|p| seen.insert(*p)));
    }

    #[test]
    fn test_dist_takes_short_way_round() {
        let map = Map::new(4, 4);
        let a = map.pos(1, 1);
        let b = map.pos(15, 2);
        assert_eq!(map.dist(a, b), (-2, 1));
    }

    #[test]
    fn test_water_and_passability() {
        let mut map = Map::new(3, 3);
        let pos = map.pos(3, 3);
        assert!(map.is_passable(pos));
        map.set_object(pos, MapObject::Tree(2), 0);
        assert!(!map.is_passable(pos));
        map.set_object(pos, MapObject::None, 0);
        let left = map.move_dir(pos, Direction::Left);
        let up_left = map.move_dir(pos, Direction::UpLeft);
        let up = map.move_dir(pos, Direction::Up);
        for p in [pos, left, up_left, up] {
            map.set_terrain(p, 0, 0);
        }
        assert!(map.is_in_water(pos));
        assert!(!map.is_passable(pos));
    }

    #[test]
    fn test_ground_deposit_depletes() {
        let mut map = Map::new(3, 3);
        map.set_deposit(5, GroundDeposit::Coal, 2);
        map.remove_ground_deposit(5, 1);
        assert_eq!(map.deposit(5), GroundDeposit::Coal);
        map.remove_ground_deposit(5, 1);
        assert_eq!(map.deposit(5), GroundDeposit::None);
    }
}
