use lodestone_types::Vec3d;
use lodestone_world::{UnloadedPolicy, World};

/// Vanilla-compliant movement constants, per tick unless noted.
pub const GRAVITY: f64 = -0.08;
pub const VERTICAL_DRAG: f64 = 0.98;
pub const TERMINAL_VELOCITY: f64 = -3.92;
pub const JUMP_VELOCITY: f64 = 0.42;
/// Walking speed in cells per second.
pub const WALK_SPEED: f64 = 4.317;
pub const TICK_MS: u64 = 50;
/// Horizontal step per tick at walking speed.
pub const STEP_PER_TICK: f64 = WALK_SPEED * TICK_MS as f64 / 1000.0;

pub const AVATAR_HALF_WIDTH: f64 = 0.3;
pub const AVATAR_HEIGHT: f64 = 1.8;
/// Maximum ledge the avatar walks up without jumping.
pub const STEP_HEIGHT: f64 = 0.6;

/// An axis-aligned box. Block boxes are full unit cubes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3d,
    pub max: Vec3d,
}

impl Aabb {
    /// The avatar's box standing with its feet at `feet`.
    pub fn avatar(feet: &Vec3d) -> Self {
        Self {
            min: Vec3d::new(
                feet.x - AVATAR_HALF_WIDTH,
                feet.y,
                feet.z - AVATAR_HALF_WIDTH,
            ),
            max: Vec3d::new(
                feet.x + AVATAR_HALF_WIDTH,
                feet.y + AVATAR_HEIGHT,
                feet.z + AVATAR_HALF_WIDTH,
            ),
        }
    }

    pub fn unit_cube(x: i32, y: i32, z: i32) -> Self {
        Self {
            min: Vec3d::new(x as f64, y as f64, z as f64),
            max: Vec3d::new(x as f64 + 1.0, y as f64 + 1.0, z as f64 + 1.0),
        }
    }

    pub fn feet(&self) -> Vec3d {
        Vec3d::new(
            (self.min.x + self.max.x) / 2.0,
            self.min.y,
            (self.min.z + self.max.z) / 2.0,
        )
    }

    pub fn translated(&self, dx: f64, dy: f64, dz: f64) -> Self {
        Self {
            min: Vec3d::new(self.min.x + dx, self.min.y + dy, self.min.z + dz),
            max: Vec3d::new(self.max.x + dx, self.max.y + dy, self.max.z + dz),
        }
    }

    fn overlaps_x(&self, other: &Aabb) -> bool {
        self.min.x < other.max.x && self.max.x > other.min.x
    }

    fn overlaps_y(&self, other: &Aabb) -> bool {
        self.min.y < other.max.y && self.max.y > other.min.y
    }

    fn overlaps_z(&self, other: &Aabb) -> bool {
        self.min.z < other.max.z && self.max.z > other.min.z
    }

    pub fn intersects(&self, other: &Aabb) -> bool {
        self.overlaps_x(other) && self.overlaps_y(other) && self.overlaps_z(other)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    Z,
}

/// Clamp `motion` along one axis so the box stops flush against the
/// first candidate it would hit. Candidates not overlapping on the
/// other two axes are ignored. Zero motion is a no-op.
pub fn sweep_axis(aabb: &Aabb, boxes: &[Aabb], axis: Axis, motion: f64) -> f64 {
    if motion == 0.0 {
        return 0.0;
    }
    let mut motion = motion;
    for block in boxes {
        let blocking = match axis {
            Axis::X => aabb.overlaps_y(block) && aabb.overlaps_z(block),
            Axis::Y => aabb.overlaps_x(block) && aabb.overlaps_z(block),
            Axis::Z => aabb.overlaps_x(block) && aabb.overlaps_y(block),
        };
        if !blocking {
            continue;
        }
        let (own_min, own_max, other_min, other_max) = match axis {
            Axis::X => (aabb.min.x, aabb.max.x, block.min.x, block.max.x),
            Axis::Y => (aabb.min.y, aabb.max.y, block.min.y, block.max.y),
            Axis::Z => (aabb.min.z, aabb.max.z, block.min.z, block.max.z),
        };
        if motion > 0.0 && own_max <= other_min {
            motion = motion.min(other_min - own_max);
        } else if motion < 0.0 && own_min >= other_max {
            motion = motion.max(other_max - own_min);
        }
    }
    motion
}

/// Enumerate solid unit cubes over the box's footprint padded by the
/// intended motion (ceiling-padded on the high side).
pub fn collect_block_boxes(world: &World, aabb: &Aabb, dx: f64, dy: f64, dz: f64) -> Vec<Aabb> {
    let min_x = (aabb.min.x + dx.min(0.0)).floor() as i32;
    let max_x = (aabb.max.x + dx.max(0.0)).ceil() as i32;
    let min_y = (aabb.min.y + dy.min(0.0)).floor() as i32;
    let max_y = (aabb.max.y + dy.max(0.0)).ceil() as i32;
    let min_z = (aabb.min.z + dz.min(0.0)).floor() as i32;
    let max_z = (aabb.max.z + dz.max(0.0)).ceil() as i32;

    let mut boxes = Vec::new();
    for x in min_x..=max_x {
        for y in min_y..=max_y {
            for z in min_z..=max_z {
                if world.is_solid(x, y, z, UnloadedPolicy::Solid) {
                    boxes.push(Aabb::unit_cube(x, y, z));
                }
            }
        }
    }
    boxes
}

/// Outcome of one collision-resolved movement step.
#[derive(Debug, Clone, Copy)]
pub struct MoveResult {
    pub feet: Vec3d,
    pub moved_x: f64,
    pub moved_z: f64,
    /// Horizontal motion was clipped on either axis.
    pub horizontally_blocked: bool,
    /// Vertical motion was clipped; the caller zeroes its velocity.
    pub vertically_blocked: bool,
    pub on_ground: bool,
}

/// Move the avatar by the desired `(dx, dy, dz)`, sweeping X then Z
/// then Y against block boxes, with a step-up retry when walking into
/// a low ledge while on the ground.
pub fn move_avatar(world: &World, feet: &Vec3d, dx: f64, dy: f64, dz: f64, on_ground: bool) -> MoveResult {
    let start = Aabb::avatar(feet);
    let boxes = collect_block_boxes(world, &start, dx, dy, dz);

    let mut aabb = start;
    let mut moved_x = sweep_axis(&aabb, &boxes, Axis::X, dx);
    aabb = aabb.translated(moved_x, 0.0, 0.0);
    let mut moved_z = sweep_axis(&aabb, &boxes, Axis::Z, dz);
    aabb = aabb.translated(0.0, 0.0, moved_z);

    let x_blocked = moved_x != dx;
    let z_blocked = moved_z != dz;

    if (x_blocked || z_blocked) && on_ground {
        // Re-run both horizontal sweeps from the original position,
        // lifted by the step height, against candidates enumerated at
        // the new height.
        let lifted = start.translated(0.0, STEP_HEIGHT, 0.0);
        let lifted_boxes = collect_block_boxes(world, &lifted, dx, -STEP_HEIGHT, dz);
        let mut retry = lifted;
        let retry_x = sweep_axis(&retry, &lifted_boxes, Axis::X, dx);
        retry = retry.translated(retry_x, 0.0, 0.0);
        let retry_z = sweep_axis(&retry, &lifted_boxes, Axis::Z, dz);
        retry = retry.translated(0.0, 0.0, retry_z);

        if retry_x.abs() + retry_z.abs() > moved_x.abs() + moved_z.abs() {
            // Settle back onto the ledge.
            let drop = sweep_axis(&retry, &lifted_boxes, Axis::Y, -STEP_HEIGHT);
            aabb = retry.translated(0.0, drop, 0.0);
            moved_x = retry_x;
            moved_z = retry_z;
        }
    }

    let y_boxes = collect_block_boxes(world, &aabb, 0.0, dy, 0.0);
    let moved_y = sweep_axis(&aabb, &y_boxes, Axis::Y, dy);
    aabb = aabb.translated(0.0, moved_y, 0.0);

    let vertically_blocked = moved_y != dy;
    MoveResult {
        feet: aabb.feet(),
        moved_x,
        moved_z,
        horizontally_blocked: moved_x != dx || moved_z != dz,
        vertically_blocked,
        // Clipping while falling grounds the avatar; rising lifts it
        // off; zero vertical motion leaves the flag alone.
        on_ground: if dy < 0.0 {
            vertically_blocked
        } else if dy > 0.0 {
            false
        } else {
            on_ground
        },
    }
}
