use serde::{Deserialize, Serialize};

/// Transportable goods. Codes match the persisted resource numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Resource {
    Fish,
    Pig,
    Meat,
    Wheat,
    Flour,
    Bread,
    Lumber,
    Plank,
    Boat,
    Stone,
    IronOre,
    Steel,
    Coal,
    GoldOre,
    GoldBar,
    Shovel,
    Hammer,
    Rod,
    Cleaver,
    Scythe,
    Axe,
    Saw,
    Pick,
    Pincer,
    Sword,
    Shield,
}

impl Resource {
    pub const COUNT: usize = 26;

    pub const ALL: [Resource; Self::COUNT] = [
        Resource::Fish,
        Resource::Pig,
        Resource::Meat,
        Resource::Wheat,
        Resource::Flour,
        Resource::Bread,
        Resource::Lumber,
        Resource::Plank,
        Resource::Boat,
        Resource::Stone,
        Resource::IronOre,
        Resource::Steel,
        Resource::Coal,
        Resource::GoldOre,
        Resource::GoldBar,
        Resource::Shovel,
        Resource::Hammer,
        Resource::Rod,
        Resource::Cleaver,
        Resource::Scythe,
        Resource::Axe,
        Resource::Saw,
        Resource::Pick,
        Resource::Pincer,
        Resource::Sword,
        Resource::Shield,
    ];

    /// Tools in toolmaker priority-slot order.
    pub const TOOLS: [Resource; 9] = [
        Resource::Shovel,
        Resource::Hammer,
        Resource::Rod,
        Resource::Cleaver,
        Resource::Scythe,
        Resource::Axe,
        Resource::Saw,
        Resource::Pick,
        Resource::Pincer,
    ];

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }

    pub fn is_food(self) -> bool {
        matches!(self, Resource::Fish | Resource::Meat | Resource::Bread)
    }

    pub fn name(self) -> &'static str {
        match self {
            Resource::Fish => "fish",
            Resource::Pig => "pig",
            Resource::Meat => "meat",
            Resource::Wheat => "wheat",
            Resource::Flour => "flour",
            Resource::Bread => "bread",
            Resource::Lumber => "lumber",
            Resource::Plank => "plank",
            Resource::Boat => "boat",
            Resource::Stone => "stone",
            Resource::IronOre => "iron_ore",
            Resource::Steel => "steel",
            Resource::Coal => "coal",
            Resource::GoldOre => "gold_ore",
            Resource::GoldBar => "gold_bar",
            Resource::Shovel => "shovel",
            Resource::Hammer => "hammer",
            Resource::Rod => "rod",
            Resource::Cleaver => "cleaver",
            Resource::Scythe => "scythe",
            Resource::Axe => "axe",
            Resource::Saw => "saw",
            Resource::Pick => "pick",
            Resource::Pincer => "pincer",
            Resource::Sword => "sword",
            Resource::Shield => "shield",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|r| r.name() == name)
    }
}

impl std::fmt::Display for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Per-resource counters indexed by [`Resource::code`].
pub type ResourceCounts = [u32; Resource::COUNT];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_dense() {
        for (i, r) in Resource::ALL.iter().enumerate() {
            assert_eq!(r.code() as usize, i);
            assert_eq!(Resource::from_code(i as u8), Some(*r));
        }
        assert_eq!(Resource::from_code(26), None);
    }

    #[test]
    fn test_names_round_trip() {
        assert_eq!(Resource::from_name("gold_bar"), Some(Resource::GoldBar));
        assert_eq!(Resource::from_name("mithril"), None);
    }
}
