//! Fixed timing and fight tables.

/// Base duration in ticks of each animation.
///
/// Entries 0..=80 are walking animations laid out as
/// `4 + height_diff + 9 * dir_slot` (see [`walking_animation`]); the rest are
/// work, fight and idle poses.
pub const COUNTER_FROM_ANIMATION: [i32; 180] = [
    511, 447, 383, 319, 255, 319, 511, 767, 1023, 511, 447, 383,
    319, 255, 319, 511, 767, 1023, 511, 447, 383, 319, 255, 319,
    511, 767, 1023, 511, 447, 383, 319, 255, 319, 511, 767, 1023,
    511, 447, 383, 319, 255, 319, 511, 767, 1023, 511, 447, 383,
    319, 255, 319, 511, 767, 1023, 511, 447, 383, 319, 255, 319,
    511, 767, 1023, 511, 447, 383, 319, 255, 319, 511, 767, 1023,
    511, 447, 383, 319, 255, 319, 511, 767, 1023, 380, 128, 300,
    260, 400, 360, 320, 400, 420, 500, 500, 560, 480, 460, 420,
    520, 520, 600, 380, 256, 640, 256, 200, 200, 300, 255, 340,
    300, 300, 300, 300, 300, 300, 300, 300, 300, 300, 300, 300,
    300, 300, 300, 300, 300, 300, 300, 300, 300, 300, 300, 300,
    300, 300, 300, 300, 300, 300, 300, 300, 300, 300, 300, 300,
    300, 300, 120, 140, 160, 180, 200, 220, 240, 160, 180, 200,
    120, 140, 160, 180, 200, 220, 240, 160, 180, 200, 300, 300,
    300, 300, 300, 300, 300, 300, 300, 300, 300, 300, 300, 300,];

pub const ANIM_IDLE: i32 = 81;
pub const ANIM_STUCK: i32 = 82;
pub const ANIM_DIGGING: i32 = 83;
pub const ANIM_HAMMERING: i32 = 84;
pub const ANIM_CHOPPING: i32 = 85;
pub const ANIM_STONECUTTING: i32 = 86;
pub const ANIM_PLANTING: i32 = 87;
pub const ANIM_FISHING: i32 = 88;
pub const ANIM_FARMING: i32 = 89;
pub const ANIM_SAWING: i32 = 90;
pub const ANIM_MILLING: i32 = 91;
pub const ANIM_BAKING: i32 = 92;
pub const ANIM_PIGFARMING: i32 = 93;
pub const ANIM_BUTCHERING: i32 = 94;
pub const ANIM_SMELTING: i32 = 95;
pub const ANIM_MAKING_TOOL: i32 = 96;
pub const ANIM_MAKING_WEAPON: i32 = 97;
pub const ANIM_BUILDING_BOAT: i32 = 98;
pub const ANIM_SAMPLING: i32 = 99;
pub const ANIM_ELEVATOR_DOWN: i32 = 100;
pub const ANIM_MINING: i32 = 101;
pub const ANIM_ELEVATOR_UP: i32 = 102;
pub const ANIM_DROP: i32 = 103;
pub const ANIM_PICK_UP: i32 = 104;
pub const ANIM_KNIGHT_LOOKOUT: i32 = 105;
pub const ANIM_DYING: i32 = 106;
pub const ANIM_VICTORY: i32 = 107;
pub const ANIM_ENGAGE: i32 = 108;
/// Attacker fight poses are `ANIM_FIGHT_ATTACKER + (code >> 4)`.
pub const ANIM_FIGHT_ATTACKER: i32 = 146;
/// Defender fight poses are `ANIM_FIGHT_DEFENDER + (code & 0xf)`.
pub const ANIM_FIGHT_DEFENDER: i32 = 156;

/// Ticks for an animation id; unknown ids count as idle.
pub fn counter_from_animation(animation: i32) -> i32 {
    usize::try_from(animation)
        .ok()
        .and_then(|i| COUNTER_FROM_ANIMATION.get(i))
        .copied()
        .unwrap_or(COUNTER_FROM_ANIMATION[ANIM_IDLE as usize])
}

/// Walking animation for a step in direction `dir` with the given height
/// difference. `switched` selects the alternate pose used when two serfs
/// trade places.
pub fn walking_animation(height_diff: i32, dir: usize, switched: bool) -> i32 {
    let slot = dir as i32 + if switched && dir < 3 { 6 } else { 0 };
    4 + height_diff.clamp(-4, 4) + 9 * slot
}

/// Height offsets tried, in order, when a building site cannot be levelled
/// to its own height.
pub const DIGGING_HEIGHT_DIFFERENCES: [i32; 16] =
    [-1, 1, -2, 2, -3, 3, -4, 4, -5, 5, -6, 6, -7, 7, -8, 8];

/// Fight move sequences. A fight picks a row at random and plays moves
/// until it reaches -1.
pub const KNIGHT_ATTACK_MOVES: [[i8; 16]; 8] = [
    [1, 2, 4, 2, 0, 2, 4, 2, 1, 0, 2, 2, 3, 0, 5, -1],
    [3, 2, 2, 3, 0, 4, 1, 3, 2, 4, 2, 5, -1, -1, -1, -1],
    [0, 1, 2, 3, 4, 5, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1],
    [2, 4, 0, 1, 1, 3, 2, 0, 5, -1, -1, -1, -1, -1, -1, -1],
    [4, 4, 2, 2, 0, 0, 1, 3, 3, 1, 5, -1, -1, -1, -1, -1],
    [1, 3, 0, 2, 5, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1],
    [2, 0, 3, 1, 4, 0, 2, 1, 3, 4, 0, 2, 1, 5, -1, -1],
    [0, 3, 3, 0, 1, 2, 4, 5, -1, -1, -1, -1, -1, -1, -1, -1],
];

/// Animation pairs per move, `attacker << 4 | defender`. Row `code` is used
/// when the attacker will win, row `code ^ 1` otherwise.
pub const KNIGHT_FIGHT_ANIM: [[u8; 8]; 6] = [
    [0x00, 0x11, 0x22, 0x10, 0x01, 0x21, 0x12, 0x02],
    [0x03, 0x13, 0x23, 0x30, 0x31, 0x32, 0x33, 0x00],
    [0x44, 0x45, 0x54, 0x55, 0x40, 0x04, 0x00, 0x00],
    [0x46, 0x64, 0x66, 0x56, 0x65, 0x00, 0x00, 0x00],
    [0x77, 0x78, 0x87, 0x70, 0x07, 0x88, 0x00, 0x00],
    [0x99, 0x98, 0x89, 0x90, 0x09, 0x00, 0x00, 0x00],
];

/// Number of valid entries in each [`KNIGHT_FIGHT_ANIM`] row.
pub const KNIGHT_FIGHT_ANIM_MAX: [u8; 6] = [8, 7, 6, 5, 6, 5];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_walking_animation_layout() {
        assert_eq!(walking_animation(0, 0, false), 4);
        assert_eq!(walking_animation(-9, 0, false), 0);
        assert_eq!(walking_animation(2, 3, false), 33);
        assert_eq!(walking_animation(0, 1, true), 4 + 9 * 7);
        assert_eq!(walking_animation(4, 2, true), 80);
        // Switching has no effect on directions 3..5.
        assert_eq!(walking_animation(0, 4, true), walking_animation(0, 4, false));
    }

    #[test]
    fn test_walking_durations_follow_slope() {
        assert_eq!(COUNTER_FROM_ANIMATION[4], 255);
        assert_eq!(COUNTER_FROM_ANIMATION[8], 1023);
        assert_eq!(COUNTER_FROM_ANIMATION[9 * 5 + 4], 255);
        assert!(COUNTER_FROM_ANIMATION[..81].iter().all(|&c| c > 0));
    }

    #[test]
    fn test_fight_tables_are_well_formed() {
        for row in KNIGHT_ATTACK_MOVES {
            let end = row.iter().position(|&m| m < 0).unwrap();
            assert!(row[..end].iter().all(|&m| (0..6).contains(&m)));
            assert!(row[end..].iter().all(|&m| m < 0));
        }
        for (row, &max) in KNIGHT_FIGHT_ANIM.iter().zip(&KNIGHT_FIGHT_ANIM_MAX) {
            for &code in &row[..max as usize] {
                assert!(ANIM_FIGHT_DEFENDER + ((code & 0xf) as i32) < 180);
                assert!(((code >> 4) as i32) < 10);
            }
        }
    }

    #[test]
    fn test_unknown_animation_defaults_to_idle() {
        assert_eq!(counter_from_animation(-1), COUNTER_FROM_ANIMATION[81]);
        assert_eq!(counter_from_animation(500), COUNTER_FROM_ANIMATION[81]);
    }
}
