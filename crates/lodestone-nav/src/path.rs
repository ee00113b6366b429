use lodestone_types::BlockPos;
use lodestone_world::{UnloadedPolicy, World};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum PathError {
    #[error("no path to goal")]
    NoPath,
    #[error("pathfinding timed out")]
    Timeout,
}

/// Tuning knobs for a path query. Defaults match the client's walking
/// profile.
#[derive(Debug, Clone)]
pub struct PathConfig {
    /// Node-expansion cap for a direct query.
    pub max_nodes: usize,
    /// Wall-clock budget for the whole query, segments included.
    pub timeout: Duration,
    /// Queries at or beyond this distance go through the waypoint
    /// planner.
    pub long_range_threshold: f64,
    /// Straight-line spacing of long-range waypoints.
    pub waypoint_distance: f64,
    /// Per-segment node cap in the long-range planner.
    pub segment_max_nodes: usize,
    /// Node cap when retrying past a failed waypoint.
    pub fallback_max_nodes: usize,
    /// How unloaded chunks are treated.
    pub policy: UnloadedPolicy,
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            max_nodes: 20_000,
            timeout: Duration::from_secs(10),
            long_range_threshold: 100.0,
            waypoint_distance: 50.0,
            segment_max_nodes: 10_000,
            fallback_max_nodes: 15_000,
            policy: UnloadedPolicy::Passable,
        }
    }
}

/// Find a cell path from `start` to `goal`.
///
/// Short queries run one A* search. Long queries are broken into
/// straight-line waypoints and solved segment by segment; a failed
/// segment is bypassed by aiming at the next waypoint, and accumulated
/// progress is returned as a partial path rather than failing.
pub fn find_path(
    world: &World,
    start: BlockPos,
    goal: BlockPos,
    config: &PathConfig,
) -> Result<Vec<BlockPos>, PathError> {
    let deadline = Instant::now() + config.timeout;
    let start = rebase_start(world, start, config.policy);

    if start.distance_to(&goal) < config.long_range_threshold {
        astar(world, start, goal, config.max_nodes, deadline, config.policy)
            .ok_or(PathError::NoPath)
    } else {
        find_long_path(world, start, goal, config, deadline)
    }
}

/// If the start cell itself is not walkable (mid-air after a teleport,
/// inside a slab edge), rebase onto the nearest walkable cell in the
/// surrounding 3x3x3 block, then one layer further down.
fn rebase_start(world: &World, start: BlockPos, policy: UnloadedPolicy) -> BlockPos {
    if world.is_walkable(start.x, start.y, start.z, policy) {
        return start;
    }
    let mut best: Option<(f64, BlockPos)> = None;
    for dy in [0, 1, -1, -2] {
        for dx in -1..=1 {
            for dz in -1..=1 {
                let candidate = start.offset(dx, dy, dz);
                if !world.is_walkable(candidate.x, candidate.y, candidate.z, policy) {
                    continue;
                }
                let dist = candidate.distance_to(&start);
                if best.map_or(true, |(d, _)| dist < d) {
                    best = Some((dist, candidate));
                }
            }
        }
        // Closest match in the nearer layers wins outright.
        if dy == -1 {
            if let Some((_, found)) = best {
                return found;
            }
        }
    }
    match best {
        Some((_, found)) => {
            debug!("Rebased unwalkable start {:?} to {:?}", start, found);
            found
        }
        None => start,
    }
}

fn find_long_path(
    world: &World,
    start: BlockPos,
    goal: BlockPos,
    config: &PathConfig,
    deadline: Instant,
) -> Result<Vec<BlockPos>, PathError> {
    let waypoints = plan_waypoints(world, start, goal, config.waypoint_distance);
    let mut full: Vec<BlockPos> = Vec::new();
    let mut current = start;
    let mut i = 0;

    while i < waypoints.len() {
        if Instant::now() >= deadline {
            return if full.is_empty() {
                Err(PathError::Timeout)
            } else {
                Ok(full)
            };
        }
        match astar(
            world,
            current,
            waypoints[i],
            config.segment_max_nodes,
            deadline,
            config.policy,
        ) {
            Some(segment) => {
                append_segment(&mut full, segment);
                if let Some(&end) = full.last() {
                    current = end;
                }
                i += 1;
            }
            None => {
                // Soft-goal bypass: the waypoint may be inside a cliff
                // or a sealed pocket; aim past it.
                if i + 1 < waypoints.len() {
                    if let Some(segment) = astar(
                        world,
                        current,
                        waypoints[i + 1],
                        config.fallback_max_nodes,
                        deadline,
                        config.policy,
                    ) {
                        debug!("Bypassed unreachable waypoint {:?}", waypoints[i]);
                        append_segment(&mut full, segment);
                        if let Some(&end) = full.last() {
                            current = end;
                        }
                        i += 2;
                        continue;
                    }
                }
                return if full.is_empty() {
                    Err(PathError::NoPath)
                } else {
                    warn!(
                        "Long-range path stalled at waypoint {} of {}; returning partial path",
                        i,
                        waypoints.len()
                    );
                    Ok(full)
                };
            }
        }
    }

    Ok(full)
}

/// Straight-line waypoints every `spacing` cells, y snapped to the
/// local floor where the chunk is loaded.
fn plan_waypoints(world: &World, start: BlockPos, goal: BlockPos, spacing: f64) -> Vec<BlockPos> {
    let total = start.distance_to(&goal);
    let count = (total / spacing).ceil().max(1.0) as usize;
    let mut waypoints = Vec::with_capacity(count);
    for i in 1..=count {
        let t = i as f64 / count as f64;
        let x = (start.x as f64 + (goal.x - start.x) as f64 * t).round() as i32;
        let y = (start.y as f64 + (goal.y - start.y) as f64 * t).round() as i32;
        let z = (start.z as f64 + (goal.z - start.z) as f64 * t).round() as i32;
        let snapped_y = if world.is_chunk_loaded(&BlockPos::new(x, y, z).chunk_pos()) {
            world.find_floor_below(x, y + 5, z, 20).unwrap_or(y)
        } else {
            y
        };
        waypoints.push(BlockPos::new(x, snapped_y, z));
    }
    waypoints
}

fn append_segment(full: &mut Vec<BlockPos>, segment: Vec<BlockPos>) {
    for cell in segment {
        // Segments start where the previous one ended.
        if full.last() != Some(&cell) {
            full.push(cell);
        }
    }
}

// === A* core ===

struct OpenNode {
    f: f64,
    pos: BlockPos,
}

impl PartialEq for OpenNode {
    fn eq(&self, other: &Self) -> bool {
        self.f.total_cmp(&other.f) == std::cmp::Ordering::Equal
    }
}

impl Eq for OpenNode {}

impl PartialOrd for OpenNode {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OpenNode {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.f.total_cmp(&other.f)
    }
}

/// Plain A* over cells. Returns `None` on open-set exhaustion, node
/// cap, or deadline.
fn astar(
    world: &World,
    start: BlockPos,
    goal: BlockPos,
    max_nodes: usize,
    deadline: Instant,
    policy: UnloadedPolicy,
) -> Option<Vec<BlockPos>> {
    let goal_key = goal.encode();
    let mut open: BinaryHeap<Reverse<OpenNode>> = BinaryHeap::new();
    let mut came_from: HashMap<u64, BlockPos> = HashMap::new();
    let mut g_score: HashMap<u64, f64> = HashMap::new();
    let mut closed: HashSet<u64> = HashSet::new();

    g_score.insert(start.encode(), 0.0);
    open.push(Reverse(OpenNode {
        f: start.distance_to(&goal),
        pos: start,
    }));

    let mut expanded = 0usize;

    while let Some(Reverse(node)) = open.pop() {
        let key = node.pos.encode();
        if closed.contains(&key) {
            continue;
        }

        if key == goal_key {
            return Some(reconstruct(&came_from, node.pos, start));
        }
        if node.pos.distance_to(&goal) < 2.0 {
            // Close enough; finish the path at the goal cell.
            let mut path = reconstruct(&came_from, node.pos, start);
            if path.last() != Some(&goal) {
                path.push(goal);
            }
            return Some(path);
        }

        closed.insert(key);
        expanded += 1;
        if expanded >= max_nodes {
            debug!("A* node cap {} hit toward {:?}", max_nodes, goal);
            return None;
        }
        if expanded % 256 == 0 && Instant::now() >= deadline {
            debug!("A* deadline hit toward {:?}", goal);
            return None;
        }

        let g = *g_score.get(&key).unwrap_or(&f64::INFINITY);
        for (neighbor, cost) in neighbors(world, node.pos, policy) {
            let neighbor_key = neighbor.encode();
            if closed.contains(&neighbor_key) {
                continue;
            }
            let tentative = g + cost;
            if tentative < *g_score.get(&neighbor_key).unwrap_or(&f64::INFINITY) {
                g_score.insert(neighbor_key, tentative);
                came_from.insert(neighbor_key, node.pos);
                open.push(Reverse(OpenNode {
                    f: tentative + neighbor.distance_to(&goal),
                    pos: neighbor,
                }));
            }
        }
    }

    None
}

fn reconstruct(came_from: &HashMap<u64, BlockPos>, end: BlockPos, start: BlockPos) -> Vec<BlockPos> {
    let mut path = vec![end];
    let mut current = end;
    while current != start {
        match came_from.get(&current.encode()) {
            Some(&prev) => {
                path.push(prev);
                current = prev;
            }
            None => break,
        }
    }
    path.reverse();
    path
}

/// Generate the moves out of `p`: 8 horizontal directions with
/// same-level / step-up / fall variants, plus climbs on ladders.
fn neighbors(world: &World, p: BlockPos, policy: UnloadedPolicy) -> Vec<(BlockPos, f64)> {
    const DIRS: [(i32, i32); 8] = [
        (1, 0),
        (-1, 0),
        (0, 1),
        (0, -1),
        (1, 1),
        (1, -1),
        (-1, 1),
        (-1, -1),
    ];

    let mut out = Vec::with_capacity(10);

    for (dx, dz) in DIRS {
        // No cutting corners through walls.
        if dx != 0
            && dz != 0
            && (world.is_solid(p.x + dx, p.y, p.z, policy)
                || world.is_solid(p.x, p.y, p.z + dz, policy))
        {
            continue;
        }
        let (tx, tz) = (p.x + dx, p.z + dz);

        if world.is_walkable(tx, p.y, tz, policy) {
            out.push((BlockPos::new(tx, p.y, tz), step_cost(world, tx, p.y, tz)));
            continue;
        }

        if world.can_jump(p.x, p.y, p.z, policy) && world.is_walkable(tx, p.y + 1, tz, policy) {
            out.push((
                BlockPos::new(tx, p.y + 1, tz),
                1.3 * step_cost(world, tx, p.y + 1, tz),
            ));
            continue;
        }

        for fall in 1..=3 {
            let ty = p.y - fall;
            if world.is_walkable(tx, ty, tz, policy) && world.is_solid(tx, ty - 1, tz, policy) {
                out.push((
                    BlockPos::new(tx, ty, tz),
                    (1.0 + 0.2 * fall as f64) * step_cost(world, tx, ty, tz),
                ));
                break;
            }
            // Falling into solid ground: nothing lower can be a landing.
            if world.is_solid(tx, ty, tz, policy) {
                break;
            }
        }
    }

    if world.is_climbable(p.x, p.y, p.z) {
        let up = p.offset(0, 1, 0);
        if world.is_walkable(up.x, up.y, up.z, policy) || world.is_climbable(up.x, up.y, up.z) {
            out.push((up, 1.5));
        }
        let down = p.offset(0, -1, 0);
        if world.is_walkable(down.x, down.y, down.z, policy)
            || world.is_climbable(down.x, down.y, down.z)
        {
            out.push((down, 1.2));
        }
    }

    out
}

fn step_cost(world: &World, x: i32, y: i32, z: i32) -> f64 {
    let mut cost = world.movement_cost(x, y, z);
    if world.is_fluid(x, y, z) {
        cost += 8.0;
    }
    cost
}

#[cfg(test)]
mod tests {
    use super::*;
    use lodestone_world::{encode_chunk_body, SectionData, MIN_Y, SECTION_VOLUME};
    use std::collections::HashMap as Map;

    /// Build a world from explicit (x, y, z, state) cells, chunk by
    /// chunk, through the real wire decode path.
    fn world_with_blocks(blocks: &[(i32, i32, i32, i32)]) -> World {
        let mut per_chunk: Map<(i32, i32), Vec<(i32, i32, i32, i32)>> = Map::new();
        for &(x, y, z, state) in blocks {
            per_chunk
                .entry((x.div_euclid(16), z.div_euclid(16)))
                .or_default()
                .push((x, y, z, state));
        }
        let mut world = World::new();
        for ((cx, cz), cells) in per_chunk {
            let mut sections: Vec<Vec<i32>> = vec![vec![0; SECTION_VOLUME]; 24];
            for (x, y, z, state) in cells {
                let section = ((y - MIN_Y) / 16) as usize;
                let (lx, ly, lz) = (
                    x.rem_euclid(16) as usize,
                    (y - MIN_Y).rem_euclid(16) as usize,
                    z.rem_euclid(16) as usize,
                );
                sections[section][ly * 256 + lz * 16 + lx] = state;
            }
            let wire: Vec<SectionData> = sections
                .iter()
                .map(|blocks| SectionData::from_blocks(blocks))
                .collect();
            let body = encode_chunk_body(&wire, false);
            world.store_chunk(cx, cz, &body).unwrap();
        }
        world
    }

    fn slab(x_range: std::ops::Range<i32>, y: i32, z_range: std::ops::Range<i32>) -> Vec<(i32, i32, i32, i32)> {
        let mut out = Vec::new();
        for x in x_range {
            for z in z_range.clone() {
                out.push((x, y, z, 1));
            }
        }
        out
    }

    /// The adjacency rules every returned path must satisfy.
    fn assert_path_sound(path: &[BlockPos]) {
        for pair in path.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            let (dx, dy, dz) = (b.x - a.x, b.y - a.y, b.z - a.z);
            let climb = dx == 0 && dz == 0 && dy.abs() == 1;
            let step = dx.abs() <= 1 && dz.abs() <= 1 && (-3..=1).contains(&dy);
            assert!(
                climb || step,
                "unsound move {:?} -> {:?} in {:?}",
                a,
                b,
                path
            );
        }
    }

    fn strict() -> PathConfig {
        PathConfig {
            policy: UnloadedPolicy::Solid,
            ..PathConfig::default()
        }
    }

    #[test]
    fn test_flat_ground_straight_path() {
        let world = world_with_blocks(&slab(0..10, 63, 0..10));
        let path = find_path(
            &world,
            BlockPos::new(0, 64, 0),
            BlockPos::new(8, 64, 0),
            &strict(),
        )
        .unwrap();

        assert_eq!(path.len(), 9);
        assert!(path.iter().all(|p| p.y == 64));
        for pair in path.windows(2) {
            assert!(pair[1].x > pair[0].x, "x not monotonic: {:?}", path);
        }
        assert_path_sound(&path);
    }

    #[test]
    fn test_step_up_over_single_block() {
        // A one-wide walkway so the riser cannot be sidestepped.
        let mut blocks = slab(0..10, 63, 0..1);
        blocks.push((4, 64, 0, 1));
        let world = world_with_blocks(&blocks);
        let path = find_path(
            &world,
            BlockPos::new(0, 64, 0),
            BlockPos::new(8, 65, 0),
            &strict(),
        )
        .unwrap();

        assert!(
            path.contains(&BlockPos::new(4, 65, 0)),
            "no jump-up cell in {:?}",
            path
        );
        assert_path_sound(&path);
    }

    #[test]
    fn test_pit_descend_and_climb_out() {
        // Slab with a terraced pit across x = 3..=5: drop to feet
        // y = 61 at the bottom, stepped exit on the far side.
        let mut blocks = Vec::new();
        blocks.extend(slab(0..3, 63, 0..1));
        blocks.push((3, 61, 0, 1)); // feet 62
        blocks.push((4, 60, 0, 1)); // feet 61 (bottom)
        blocks.push((5, 61, 0, 1)); // feet 62
        blocks.push((6, 62, 0, 1)); // feet 63
        blocks.extend(slab(7..10, 63, 0..1));
        let world = world_with_blocks(&blocks);

        let path = find_path(
            &world,
            BlockPos::new(0, 64, 0),
            BlockPos::new(8, 64, 0),
            &strict(),
        )
        .unwrap();

        assert_path_sound(&path);
        let min_y = path.iter().map(|p| p.y).min().unwrap();
        assert_eq!(min_y, 61, "path should bottom out at 61: {:?}", path);
        for banned in [
            BlockPos::new(3, 64, 0),
            BlockPos::new(4, 64, 0),
            BlockPos::new(5, 64, 0),
        ] {
            assert!(!path.contains(&banned), "floating cell {:?}", banned);
        }
        assert_eq!(path.last(), Some(&BlockPos::new(8, 64, 0)));
    }

    #[test]
    fn test_walled_goal_has_no_path() {
        let mut blocks = slab(0..12, 63, 0..12);
        // A 2-high ring around (5, 64, 5).
        for (x, z) in [
            (4, 4), (5, 4), (6, 4),
            (4, 5), (6, 5),
            (4, 6), (5, 6), (6, 6),
        ] {
            blocks.push((x, 64, z, 1));
            blocks.push((x, 65, z, 1));
            blocks.push((x, 66, z, 1));
        }
        let world = world_with_blocks(&blocks);

        let result = find_path(
            &world,
            BlockPos::new(0, 64, 0),
            BlockPos::new(5, 64, 5),
            &strict(),
        );
        assert!(matches!(result, Err(PathError::NoPath)));
    }

    #[test]
    fn test_diagonal_does_not_cut_corners() {
        // An L-shaped wall at the corner: the diagonal through it must
        // be rejected, forcing the path around.
        let mut blocks = slab(0..4, 63, 0..4);
        blocks.push((1, 64, 0, 1));
        blocks.push((1, 65, 0, 1));
        blocks.push((0, 64, 1, 1));
        blocks.push((0, 65, 1, 1));
        let world = world_with_blocks(&blocks);

        let path = find_path(
            &world,
            BlockPos::new(0, 64, 0),
            BlockPos::new(2, 64, 2),
            &strict(),
        );
        // Fully boxed in at (0,0): both cardinals solid, diagonal
        // rejected by the corner rule.
        assert!(path.is_err());
    }

    #[test]
    fn test_long_range_partial_path_on_sealed_goal() {
        // 7 chunks of slab along x, goal sealed inside a 3-high box in
        // the last chunk. The first waypoint segment succeeds; the
        // final segment exhausts its node cap against the box, and the
        // planner returns the progress it made.
        let mut blocks = slab(0..112, 63, 0..16);
        for (x, z) in [
            (98, 6), (99, 6), (100, 6), (101, 6), (102, 6),
            (98, 7), (102, 7),
            (98, 8), (102, 8),
            (98, 9), (102, 9),
            (98, 10), (99, 10), (100, 10), (101, 10), (102, 10),
        ] {
            for y in 64..=66 {
                blocks.push((x, y, z, 1));
            }
        }
        let world = world_with_blocks(&blocks);

        let config = PathConfig {
            policy: UnloadedPolicy::Passable,
            segment_max_nodes: 3000,
            fallback_max_nodes: 4000,
            ..PathConfig::default()
        };
        let path = find_path(
            &world,
            BlockPos::new(0, 64, 8),
            BlockPos::new(100, 64, 8),
            &config,
        )
        .unwrap();

        assert!(!path.is_empty());
        assert_path_sound(&path);
        let last = path.last().unwrap();
        assert!(
            last.x >= 40,
            "partial path should reach the first waypoint: {:?}",
            last
        );
        assert!(
            !(99..=101).contains(&last.x) || !(7..=9).contains(&last.z),
            "partial path must not enter the sealed box"
        );
    }

    #[test]
    fn test_long_range_crosses_unloaded_territory() {
        // Only the start chunk is loaded; with the passable policy the
        // planner must still produce a full-length path.
        let world = world_with_blocks(&slab(0..16, 63, 0..16));
        let config = PathConfig::default();
        let path = find_path(
            &world,
            BlockPos::new(4, 64, 4),
            BlockPos::new(150, 64, 4),
            &config,
        )
        .unwrap();
        assert_path_sound(&path);
        assert_eq!(path.last().unwrap().x, 150);
    }

    #[test]
    fn test_soft_start_rebases_midair_start() {
        let world = world_with_blocks(&slab(0..10, 63, 0..10));
        // Start one cell above the walkable layer.
        let path = find_path(
            &world,
            BlockPos::new(2, 65, 2),
            BlockPos::new(7, 64, 7),
            &strict(),
        )
        .unwrap();
        assert_eq!(path.first().unwrap().y, 64);
        assert_path_sound(&path);
    }

    #[test]
    fn test_node_cap_terminates_adversarial_search() {
        // With the passable policy the reachable space is unbounded
        // (unloaded territory expands forever) and the goal hangs in
        // loaded mid-air: only the node cap can stop the search.
        let world = world_with_blocks(&slab(0..16, 63, 0..16));
        let config = PathConfig {
            max_nodes: 500,
            policy: UnloadedPolicy::Passable,
            ..PathConfig::default()
        };
        let result = find_path(
            &world,
            BlockPos::new(8, 64, 8),
            BlockPos::new(8, 90, 8),
            &config,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_fluid_cells_are_penalized() {
        // Two lanes: a dry one and a wet one of equal length. The
        // path must pick the dry lane.
        let mut blocks = Vec::new();
        blocks.extend(slab(0..10, 63, 0..2));
        for x in 2..8 {
            blocks.push((x, 64, 0, 90)); // water in lane z=0
        }
        let world = world_with_blocks(&blocks);
        let path = find_path(
            &world,
            BlockPos::new(0, 64, 0),
            BlockPos::new(9, 64, 0),
            &strict(),
        )
        .unwrap();
        assert!(
            path.iter().any(|p| p.z == 1),
            "path should detour around water: {:?}",
            path
        );
    }
}
