//! Block-state classification for the supported protocol's registry.
//!
//! A navigating client needs four booleans per state id, not the full
//! registry, so the interesting ids are carried as a compact table.
//! Unknown ids classify as solid: walking into a mystery block is a
//! bounce, walking over one is a fall.

/// Air is state id 0 in every registry dump.
pub const AIR: i32 = 0;

const CAVE_AIR: i32 = 12959;
const VOID_AIR: i32 = 12958;

// Fluids occupy a contiguous run of level states per fluid.
const WATER_FIRST: i32 = 86;
const WATER_LAST: i32 = 101;
const LAVA_FIRST: i32 = 102;
const LAVA_LAST: i32 = 117;

// Climbables.
const LADDER_FIRST: i32 = 4862;
const LADDER_LAST: i32 = 4869;
const VINE_FIRST: i32 = 6806;
const VINE_LAST: i32 = 6837;
const SCAFFOLDING_FIRST: i32 = 19252;
const SCAFFOLDING_LAST: i32 = 19315;

// Common passable ground cover (grass, ferns, flowers).
const SHORT_GRASS: i32 = 2098;
const FERN: i32 = 2100;
const DANDELION: i32 = 2690;
const POPPY: i32 = 2691;
const TORCH_FIRST: i32 = 2886;
const TORCH_LAST: i32 = 2890;

/// What the navigation layers need to know about one block state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockProperties {
    pub solid: bool,
    pub climbable: bool,
    pub fluid: bool,
    pub transparent: bool,
}

impl BlockProperties {
    const PASSABLE: BlockProperties = BlockProperties {
        solid: false,
        climbable: false,
        fluid: false,
        transparent: true,
    };

    const SOLID: BlockProperties = BlockProperties {
        solid: true,
        climbable: false,
        fluid: false,
        transparent: false,
    };

    const FLUID: BlockProperties = BlockProperties {
        solid: false,
        climbable: false,
        fluid: true,
        transparent: true,
    };

    const CLIMBABLE: BlockProperties = BlockProperties {
        solid: false,
        climbable: true,
        fluid: false,
        transparent: true,
    };

    /// Classify a block state id. Unknown ids are solid.
    pub fn of(state_id: i32) -> BlockProperties {
        match state_id {
            AIR | CAVE_AIR | VOID_AIR => Self::PASSABLE,
            WATER_FIRST..=WATER_LAST => Self::FLUID,
            LAVA_FIRST..=LAVA_LAST => Self::FLUID,
            LADDER_FIRST..=LADDER_LAST => Self::CLIMBABLE,
            VINE_FIRST..=VINE_LAST => Self::CLIMBABLE,
            SCAFFOLDING_FIRST..=SCAFFOLDING_LAST => Self::CLIMBABLE,
            SHORT_GRASS | FERN | DANDELION | POPPY => Self::PASSABLE,
            TORCH_FIRST..=TORCH_LAST => Self::PASSABLE,
            _ => Self::SOLID,
        }
    }
}

/// Lava is the one fluid the pathfinder refuses outright.
pub fn is_hazard(state_id: i32) -> bool {
    (LAVA_FIRST..=LAVA_LAST).contains(&state_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_air_is_passable_and_transparent() {
        let props = BlockProperties::of(AIR);
        assert!(!props.solid);
        assert!(props.transparent);
    }

    #[test]
    fn test_unknown_id_fails_closed() {
        assert!(BlockProperties::of(999_999).solid);
        assert!(BlockProperties::of(1).solid); // stone
    }

    #[test]
    fn test_water_is_fluid_not_hazard() {
        let props = BlockProperties::of(WATER_FIRST + 3);
        assert!(props.fluid);
        assert!(!props.solid);
        assert!(!is_hazard(WATER_FIRST + 3));
    }

    #[test]
    fn test_lava_is_hazard() {
        assert!(is_hazard(LAVA_FIRST));
        assert!(BlockProperties::of(LAVA_FIRST).fluid);
    }

    #[test]
    fn test_ladder_is_climbable() {
        assert!(BlockProperties::of(LADDER_FIRST + 2).climbable);
    }
}
