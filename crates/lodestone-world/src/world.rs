use crate::{decode_chunk_body, is_hazard, BlockProperties, ChunkDecodeError, ChunkSection, MIN_Y};
use lodestone_types::{BlockPos, ChunkPos};
use std::collections::{HashMap, HashSet};
use std::time::Instant;
use tracing::{debug, warn};

/// Sentinel returned by `block_at` for cells in unloaded chunks.
/// Distinct from any storable state id (ids are nonnegative).
pub const UNLOADED: i32 = -1;

/// How solidity/walkability queries treat cells in unloaded chunks.
///
/// The motion controller fails closed (`Solid`); the long-range
/// planner crosses unmapped territory (`Passable`). Always an explicit
/// parameter, never ambient state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnloadedPolicy {
    Solid,
    Passable,
}

pub struct ChunkRecord {
    pub pos: ChunkPos,
    pub sections: Vec<ChunkSection>,
    pub last_update: Instant,
}

/// The in-memory voxel world.
///
/// Non-air cells live in a flat `block_cache` keyed by the packed
/// block position; `chunk_blocks` remembers which keys each chunk
/// contributed so eviction costs O(blocks in that chunk). The two
/// stay in lockstep: every key in `block_cache` appears in exactly one
/// chunk's set and vice versa.
pub struct World {
    chunks: HashMap<ChunkPos, ChunkRecord>,
    block_cache: HashMap<u64, i32>,
    chunk_blocks: HashMap<ChunkPos, HashSet<u64>>,
    decode_failures: u64,
}

impl World {
    pub fn new() -> Self {
        Self {
            chunks: HashMap::new(),
            block_cache: HashMap::new(),
            chunk_blocks: HashMap::new(),
            decode_failures: 0,
        }
    }

    /// Decode and index a chunk-data payload. An existing record for
    /// the column is fully replaced. On decode failure the chunk is
    /// skipped and the failure counter bumped; the connection goes on.
    pub fn store_chunk(&mut self, chunk_x: i32, chunk_z: i32, body: &[u8]) -> Result<(), ChunkDecodeError> {
        let pos = ChunkPos::new(chunk_x, chunk_z);
        let sections = match decode_chunk_body(body) {
            Ok(sections) => sections,
            Err(e) => {
                self.decode_failures += 1;
                warn!(
                    "Failed to decode chunk ({}, {}): {} ({} failures so far)",
                    chunk_x, chunk_z, e, self.decode_failures
                );
                return Err(e);
            }
        };

        // Re-store: drop the old index before building the new one.
        if self.chunks.contains_key(&pos) {
            self.unload_chunk(chunk_x, chunk_z);
        }

        let mut keys = HashSet::new();
        for (section_index, section) in sections.iter().enumerate() {
            if section.block_count == 0 && section.block_states.iter().all(|&s| s == 0) {
                continue;
            }
            let base_y = MIN_Y + (section_index as i32) * 16;
            for local_y in 0..16usize {
                for local_z in 0..16usize {
                    for local_x in 0..16usize {
                        let state = section.block_state(local_x, local_y, local_z);
                        if state == 0 {
                            continue;
                        }
                        let key = BlockPos::new(
                            chunk_x * 16 + local_x as i32,
                            base_y + local_y as i32,
                            chunk_z * 16 + local_z as i32,
                        )
                        .encode();
                        self.block_cache.insert(key, state);
                        keys.insert(key);
                    }
                }
            }
        }

        debug!(
            "Stored chunk ({}, {}): {} sections, {} non-air cells",
            chunk_x,
            chunk_z,
            sections.len(),
            keys.len()
        );
        self.chunk_blocks.insert(pos, keys);
        self.chunks.insert(
            pos,
            ChunkRecord {
                pos,
                sections,
                last_update: Instant::now(),
            },
        );
        Ok(())
    }

    /// Drop a chunk and every cell it contributed.
    pub fn unload_chunk(&mut self, chunk_x: i32, chunk_z: i32) {
        let pos = ChunkPos::new(chunk_x, chunk_z);
        self.chunks.remove(&pos);
        if let Some(keys) = self.chunk_blocks.remove(&pos) {
            for key in keys {
                self.block_cache.remove(&key);
            }
        }
    }

    /// Unload every chunk farther than `keep_range` (Chebyshev, chunk
    /// coordinates) from the center. Returns how many went.
    pub fn clear_distant_chunks(&mut self, center: ChunkPos, keep_range: i32) -> usize {
        let distant: Vec<ChunkPos> = self
            .chunks
            .keys()
            .filter(|pos| pos.chebyshev_distance(&center) > keep_range)
            .copied()
            .collect();
        for pos in &distant {
            self.unload_chunk(pos.x, pos.z);
        }
        if !distant.is_empty() {
            debug!("Evicted {} distant chunks", distant.len());
        }
        distant.len()
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_chunk_loaded(&self, pos: &ChunkPos) -> bool {
        self.chunks.contains_key(pos)
    }

    pub fn decode_failures(&self) -> u64 {
        self.decode_failures
    }

    /// State id at a cell: `UNLOADED` if the chunk is absent, 0 for
    /// air (only non-air cells are stored), the id otherwise.
    pub fn block_at(&self, x: i32, y: i32, z: i32) -> i32 {
        let chunk = BlockPos::new(x, y, z).chunk_pos();
        if !self.chunks.contains_key(&chunk) {
            return UNLOADED;
        }
        self.block_cache
            .get(&BlockPos::new(x, y, z).encode())
            .copied()
            .unwrap_or(0)
    }

    pub fn is_solid(&self, x: i32, y: i32, z: i32, policy: UnloadedPolicy) -> bool {
        match self.block_at(x, y, z) {
            UNLOADED => policy == UnloadedPolicy::Solid,
            id => BlockProperties::of(id).solid,
        }
    }

    pub fn is_fluid(&self, x: i32, y: i32, z: i32) -> bool {
        match self.block_at(x, y, z) {
            UNLOADED => false,
            id => BlockProperties::of(id).fluid,
        }
    }

    pub fn is_climbable(&self, x: i32, y: i32, z: i32) -> bool {
        match self.block_at(x, y, z) {
            UNLOADED => false,
            id => BlockProperties::of(id).climbable,
        }
    }

    /// Can an avatar occupy `(x, y, z)` and stay there: feet and head
    /// passable, and either solid ground below, a climbable at the
    /// feet, or fluid to float in.
    pub fn is_walkable(&self, x: i32, y: i32, z: i32, policy: UnloadedPolicy) -> bool {
        let feet = self.block_at(x, y, z);
        if feet == UNLOADED {
            return policy == UnloadedPolicy::Passable;
        }
        let feet_props = BlockProperties::of(feet);
        if feet_props.solid || is_hazard(feet) {
            return false;
        }
        if self.is_solid(x, y + 1, z, policy) {
            return false;
        }
        let below = self.block_at(x, y - 1, z);
        // Unmapped support counts as ground; planning across it is the
        // whole point of the passable policy, and under the strict
        // policy an unloaded cell is solid anyway.
        let supported = below == UNLOADED || BlockProperties::of(below).solid;
        supported || feet_props.climbable || feet_props.fluid
    }

    /// Headroom for a jump: one extra cell above the avatar.
    pub fn can_jump(&self, x: i32, y: i32, z: i32, policy: UnloadedPolicy) -> bool {
        !self.is_solid(x, y + 2, z, policy)
    }

    /// First standable cell at or below `y`, scanning down at most
    /// `max_fall` cells. Returns the feet y.
    pub fn find_floor_below(&self, x: i32, y: i32, z: i32, max_fall: i32) -> Option<i32> {
        for dy in 0..=max_fall {
            let yy = y - dy;
            if !self.is_solid(x, yy, z, UnloadedPolicy::Solid)
                && self.is_solid(x, yy - 1, z, UnloadedPolicy::Solid)
            {
                return Some(yy);
            }
        }
        None
    }

    /// Base cost of stepping into a cell. Fluids are slow, and open
    /// cells away from any wall are mildly discouraged so paths hug
    /// terrain.
    pub fn movement_cost(&self, x: i32, y: i32, z: i32) -> f64 {
        let mut cost = 1.0;
        if self.is_fluid(x, y, z) {
            cost += 2.0;
        }
        if self.is_fluid(x, y - 1, z) {
            cost += 1.5;
        }
        let mut any_solid_neighbor = false;
        for dx in -1..=1 {
            for dz in -1..=1 {
                if dx == 0 && dz == 0 {
                    continue;
                }
                if self.is_solid(x + dx, y, z + dz, UnloadedPolicy::Solid) {
                    any_solid_neighbor = true;
                }
            }
        }
        if !any_solid_neighbor {
            cost += 0.5;
        }
        cost
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}
