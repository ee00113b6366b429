use crate::path::{find_path, PathConfig};
use crate::physics::{
    move_avatar, GRAVITY, JUMP_VELOCITY, STEP_PER_TICK, TERMINAL_VELOCITY, VERTICAL_DRAG,
};
use lodestone_types::{BlockPos, Vec3d};
use lodestone_world::World;
use tracing::{debug, warn};

/// Motion tuning. Defaults are the vanilla-compliant walking profile
/// at 20 ticks per second.
#[derive(Debug, Clone)]
pub struct MotionConfig {
    /// A waypoint counts as reached inside this XZ radius.
    pub waypoint_radius: f64,
    /// The goal counts as reached inside this 3D radius.
    pub arrival_radius: f64,
    /// Less XZ progress than this per tick counts as stuck.
    pub stuck_epsilon: f64,
    /// Degrees of yaw per tick.
    pub max_turn_speed: f32,
    /// Periodic full-path refresh while moving (ticks).
    pub recalc_interval_ticks: u32,
    /// Ticks to hold still after a server teleport.
    pub teleport_cooldown_ticks: u32,
    /// Minimum ticks between jumps.
    pub jump_cooldown_ticks: u32,
    pub path: PathConfig,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            waypoint_radius: 0.7,
            arrival_radius: 1.5,
            stuck_epsilon: 0.05,
            max_turn_speed: 18.0,
            recalc_interval_ticks: 100,
            teleport_cooldown_ticks: 10,
            jump_cooldown_ticks: 10,
            path: PathConfig::default(),
        }
    }
}

/// A position-and-rotation report for the server.
#[derive(Debug, Clone, Copy)]
pub struct PositionUpdate {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub yaw: f32,
    pub pitch: f32,
    pub on_ground: bool,
}

/// Everything a single tick produced. The caller turns the position
/// into a packet and the flags into events.
#[derive(Debug, Default)]
pub struct TickOutput {
    pub position: Option<PositionUpdate>,
    pub arrived: bool,
    pub path_failed: bool,
}

/// Tick-driven avatar motion: follows a cell path with
/// vanilla-compliant physics, detects lack of progress, and works
/// through a staged obstacle-recovery routine.
pub struct MotionController {
    config: MotionConfig,
    pub position: Vec3d,
    /// Only the y component is integrated; horizontal motion is
    /// position-level and the XZ components are written by teleport
    /// resets alone.
    pub velocity: Vec3d,
    pub yaw: f32,
    pub pitch: f32,
    pub on_ground: bool,

    target: Option<Vec3d>,
    moving: bool,
    path: Vec<BlockPos>,
    path_index: usize,
    needs_path: bool,
    ticks_since_recalc: u32,

    jump_queued: bool,
    jump_cooldown: u32,
    stuck_counter: u32,
    obstacle_stage: u8,
    lateral_sign: f64,
    backup_ticks: u32,

    movement_cooldown: u32,
    awaiting_teleport: bool,
    teleport_anchor: Option<Vec3d>,
    last_tick_position: Vec3d,
}

impl MotionController {
    pub fn new(config: MotionConfig) -> Self {
        Self {
            config,
            position: Vec3d::ZERO,
            velocity: Vec3d::ZERO,
            yaw: 0.0,
            pitch: 0.0,
            on_ground: false,
            target: None,
            moving: false,
            path: Vec::new(),
            path_index: 0,
            needs_path: false,
            ticks_since_recalc: 0,
            jump_queued: false,
            jump_cooldown: 0,
            stuck_counter: 0,
            obstacle_stage: 0,
            lateral_sign: 1.0,
            backup_ticks: 0,
            movement_cooldown: 0,
            awaiting_teleport: false,
            teleport_anchor: None,
            last_tick_position: Vec3d::ZERO,
        }
    }

    pub fn is_moving(&self) -> bool {
        self.moving
    }

    pub fn target(&self) -> Option<Vec3d> {
        self.target
    }

    /// Start navigating toward a goal point.
    pub fn goto(&mut self, target: Vec3d) {
        debug!("Navigation goal set: {:?}", target);
        self.target = Some(target);
        self.moving = true;
        self.needs_path = true;
        self.path.clear();
        self.path_index = 0;
        self.stuck_counter = 0;
        self.obstacle_stage = 0;
        self.last_tick_position = self.position;
    }

    /// Abandon the current goal and hold position.
    pub fn stop(&mut self) {
        self.target = None;
        self.moving = false;
        self.path.clear();
        self.path_index = 0;
        self.stuck_counter = 0;
        self.obstacle_stage = 0;
        self.backup_ticks = 0;
        self.jump_queued = false;
    }

    /// The server sent a position sync: freeze, adopt its position as
    /// the anchor, and resynchronize local physics to it once the
    /// cooldown runs out.
    pub fn server_position_reset(&mut self, x: f64, y: f64, z: f64, yaw: f32, pitch: f32) {
        self.movement_cooldown = self.config.teleport_cooldown_ticks;
        self.awaiting_teleport = true;
        self.velocity = Vec3d::ZERO;
        self.teleport_anchor = Some(Vec3d::new(x, y, z));
        self.yaw = yaw;
        self.pitch = pitch;
    }

    /// One 50 ms tick. Never emits a position while a teleport is
    /// pending or cooling down.
    pub fn tick(&mut self, world: &World) -> TickOutput {
        let mut out = TickOutput::default();

        if self.jump_cooldown > 0 {
            self.jump_cooldown -= 1;
        }

        if self.movement_cooldown > 0 {
            self.movement_cooldown -= 1;
            if self.movement_cooldown == 0 {
                self.awaiting_teleport = false;
                if let Some(anchor) = self.teleport_anchor.take() {
                    debug!("Resynchronized to teleport anchor {:?}", anchor);
                    self.position = anchor;
                    self.last_tick_position = anchor;
                    self.velocity = Vec3d::ZERO;
                    self.on_ground = true;
                    self.needs_path = true;
                }
            }
            return out;
        }

        if self.awaiting_teleport {
            return out;
        }

        let Some(target) = self.target else {
            return out;
        };
        if !self.moving {
            return out;
        }

        if self.position.distance_to(&target) < self.config.arrival_radius {
            debug!("Arrived at {:?}", target);
            out.arrived = true;
            self.stop();
            return out;
        }

        self.ticks_since_recalc += 1;
        if self.needs_path
            || self.path_index >= self.path.len()
            || self.ticks_since_recalc >= self.config.recalc_interval_ticks
        {
            if !self.recalculate_path(world, &target) {
                out.path_failed = true;
                self.stop();
                return out;
            }
        }

        // Advance past a reached waypoint.
        let mut waypoint = self.path[self.path_index].center();
        if self.position.xz_distance_to(&waypoint) < self.config.waypoint_radius {
            self.path_index += 1;
            self.stuck_counter = 0;
            if self.path_index >= self.path.len() {
                return out;
            }
            waypoint = self.path[self.path_index].center();
        }

        // Progress check against last tick's end position.
        let progress = self.position.xz_distance_to(&self.last_tick_position);
        if progress < self.config.stuck_epsilon {
            self.stuck_counter += 1;
            self.run_obstacle_recovery();
            if self.path_index >= self.path.len() || self.needs_path {
                return out;
            }
            waypoint = self.path[self.path_index].center();
        } else {
            self.stuck_counter = 0;
            self.obstacle_stage = 0;
        }

        // An upcoming rise needs a running jump.
        if self.on_ground {
            if let Some(next_next) = self.path.get(self.path_index + 1) {
                if next_next.y as f64 - self.position.y > 0.5 {
                    self.jump_queued = true;
                }
            }
        }

        out.position = Some(self.run_physics(world, &waypoint));
        out
    }

    fn recalculate_path(&mut self, world: &World, target: &Vec3d) -> bool {
        let start = BlockPos::containing(&self.position);
        let goal = BlockPos::containing(target);
        match find_path(world, start, goal, &self.config.path) {
            Ok(path) => {
                debug!("Path to {:?}: {} cells", goal, path.len());
                self.path = path;
                self.path_index = 0;
                self.needs_path = false;
                self.ticks_since_recalc = 0;
                true
            }
            Err(e) => {
                warn!("Cannot navigate to {:?}: {}", goal, e);
                false
            }
        }
    }

    /// Escalating responses to consecutive stuck ticks: jump, strafe
    /// sideways, back up, then give the current waypoint up entirely.
    fn run_obstacle_recovery(&mut self) {
        match self.stuck_counter {
            5..=15 => {
                self.obstacle_stage = 1;
                if self.on_ground {
                    self.jump_queued = true;
                }
            }
            16..=30 => {
                self.obstacle_stage = 2;
                if self.stuck_counter % 5 == 0 {
                    self.lateral_sign = -self.lateral_sign;
                }
            }
            31..=45 => {
                if self.obstacle_stage != 3 {
                    self.backup_ticks = 15;
                }
                self.obstacle_stage = 3;
            }
            46.. => {
                if self.path_index + 1 < self.path.len() {
                    debug!("Giving up on waypoint {}, skipping ahead", self.path_index);
                    self.path_index += 1;
                } else {
                    debug!("Giving up on final waypoint, recalculating");
                    self.needs_path = true;
                }
                self.stuck_counter = 0;
                self.obstacle_stage = 0;
            }
            _ => {}
        }
    }

    fn run_physics(&mut self, world: &World, waypoint: &Vec3d) -> PositionUpdate {
        let to_x = waypoint.x - self.position.x;
        let to_z = waypoint.z - self.position.z;
        let xz_dist = (to_x * to_x + to_z * to_z).sqrt();
        let scale = if xz_dist > 1e-9 {
            (STEP_PER_TICK / xz_dist).min(1.0)
        } else {
            0.0
        };
        let mut dx = to_x * scale;
        let mut dz = to_z * scale;

        let yaw_rad = (self.yaw as f64).to_radians();
        match self.obstacle_stage {
            2 => {
                // Sidestep perpendicular to the facing direction.
                dx = 0.3 * self.lateral_sign * yaw_rad.cos();
                dz = 0.3 * self.lateral_sign * yaw_rad.sin();
            }
            3 if self.backup_ticks > 0 => {
                self.backup_ticks -= 1;
                // Straight back from the facing direction.
                dx = STEP_PER_TICK * yaw_rad.sin();
                dz = -STEP_PER_TICK * yaw_rad.cos();
            }
            _ => {}
        }

        if !self.on_ground {
            self.velocity.y =
                ((self.velocity.y + GRAVITY) * VERTICAL_DRAG).max(TERMINAL_VELOCITY);
        } else if self.velocity.y < 0.0 {
            self.velocity.y = 0.0;
        }

        if self.jump_queued && self.on_ground && self.jump_cooldown == 0 {
            self.velocity.y = JUMP_VELOCITY;
            self.on_ground = false;
            self.jump_cooldown = self.config.jump_cooldown_ticks;
        }
        self.jump_queued = false;

        let result = move_avatar(world, &self.position, dx, self.velocity.y, dz, self.on_ground);
        self.last_tick_position = self.position;
        self.position = result.feet;
        self.on_ground = result.on_ground;
        if result.vertically_blocked {
            self.velocity.y = 0.0;
        }

        self.turn_toward(dx, dz);

        PositionUpdate {
            x: self.position.x,
            y: self.position.y,
            z: self.position.z,
            yaw: self.yaw,
            pitch: self.pitch,
            on_ground: self.on_ground,
        }
    }

    /// Rotate toward the movement direction, at most `max_turn_speed`
    /// degrees per tick.
    fn turn_toward(&mut self, dx: f64, dz: f64) {
        if dx.abs() < 1e-9 && dz.abs() < 1e-9 {
            return;
        }
        let target_yaw = -dx.atan2(dz).to_degrees() as f32;
        let mut diff = target_yaw - self.yaw;
        while diff > 180.0 {
            diff -= 360.0;
        }
        while diff <= -180.0 {
            diff += 360.0;
        }
        let step = diff.clamp(-self.config.max_turn_speed, self.config.max_turn_speed);
        self.yaw += step;
        while self.yaw > 180.0 {
            self.yaw -= 360.0;
        }
        while self.yaw <= -180.0 {
            self.yaw += 360.0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lodestone_world::{encode_chunk_body, SectionData, MIN_Y, SECTION_VOLUME};
    use lodestone_world::UnloadedPolicy;

    fn flat_world() -> World {
        // Chunk (0,0) with a full stone layer at y = 63.
        let mut sections: Vec<SectionData> = Vec::new();
        for i in 0..24 {
            if MIN_Y + (i as i32) * 16 <= 63 && 63 < MIN_Y + (i as i32 + 1) * 16 {
                let mut blocks = vec![0i32; SECTION_VOLUME];
                let ly = (63 - (MIN_Y + (i as i32) * 16)) as usize;
                for z in 0..16 {
                    for x in 0..16 {
                        blocks[ly * 256 + z * 16 + x] = 1;
                    }
                }
                sections.push(SectionData::from_blocks(&blocks));
            } else {
                sections.push(SectionData::single_value(0));
            }
        }
        let mut world = World::new();
        world
            .store_chunk(0, 0, &encode_chunk_body(&sections, false))
            .unwrap();
        world
    }

    fn grounded_controller(x: f64, z: f64) -> MotionController {
        let mut config = MotionConfig::default();
        config.path.policy = UnloadedPolicy::Solid;
        let mut motion = MotionController::new(config);
        motion.position = Vec3d::new(x, 64.0, z);
        motion.last_tick_position = motion.position;
        motion.on_ground = true;
        motion
    }

    #[test]
    fn test_walks_to_goal_on_flat_ground() {
        let world = flat_world();
        let mut motion = grounded_controller(2.5, 2.5);
        motion.goto(Vec3d::new(10.5, 64.0, 10.5));

        let mut arrived = false;
        let mut packets = 0;
        for _ in 0..600 {
            let out = motion.tick(&world);
            if out.position.is_some() {
                packets += 1;
            }
            if out.arrived {
                arrived = true;
                break;
            }
        }
        assert!(arrived, "never arrived; ended at {:?}", motion.position);
        assert!(packets > 10);
        assert!(motion.position.distance_to(&Vec3d::new(10.5, 64.0, 10.5)) < 1.5);
        assert!(!motion.is_moving());
    }

    #[test]
    fn test_teleport_freezes_then_resynchronizes() {
        let world = flat_world();
        let mut motion = grounded_controller(2.5, 2.5);
        motion.goto(Vec3d::new(12.5, 64.0, 2.5));

        // Get some movement going first.
        for _ in 0..5 {
            motion.tick(&world);
        }
        let anchor = (7.5, 64.0, 7.5);
        motion.server_position_reset(anchor.0, anchor.1, anchor.2, 0.0, 0.0);

        // No position packets while the cooldown runs.
        for tick in 0..10 {
            let out = motion.tick(&world);
            assert!(
                out.position.is_none(),
                "packet emitted during cooldown tick {}",
                tick
            );
        }
        // Snapped to the anchor, and navigation resumes with a fresh
        // path on the following ticks.
        assert_eq!(
            (motion.position.x, motion.position.y, motion.position.z),
            anchor
        );
        assert!(motion.on_ground);
        assert_eq!(motion.velocity.y, 0.0);

        let out = motion.tick(&world);
        assert!(out.position.is_some() || out.arrived);
    }

    #[test]
    fn test_idle_controller_emits_nothing() {
        let world = flat_world();
        let mut motion = grounded_controller(5.5, 5.5);
        for _ in 0..20 {
            let out = motion.tick(&world);
            assert!(out.position.is_none());
            assert!(!out.arrived);
        }
    }

    #[test]
    fn test_goal_within_arrival_radius_is_immediate() {
        let world = flat_world();
        let mut motion = grounded_controller(5.5, 5.5);
        motion.goto(Vec3d::new(5.8, 64.0, 5.8));
        let out = motion.tick(&world);
        assert!(out.arrived);
        assert!(out.position.is_none());
    }

    #[test]
    fn test_unreachable_goal_fails_and_stops() {
        let world = flat_world();
        let mut motion = grounded_controller(5.5, 5.5);
        // Goal hangs in mid-air inside the loaded chunk.
        motion.goto(Vec3d::new(5.5, 90.0, 5.5));
        let out = motion.tick(&world);
        assert!(out.path_failed);
        assert!(!motion.is_moving());
    }

    #[test]
    fn test_obstacle_recovery_stages_escalate() {
        let mut motion = grounded_controller(0.5, 0.5);
        motion.path = vec![BlockPos::new(5, 64, 0), BlockPos::new(8, 64, 0)];
        motion.path_index = 0;

        motion.stuck_counter = 5;
        motion.run_obstacle_recovery();
        assert_eq!(motion.obstacle_stage, 1);
        assert!(motion.jump_queued);

        motion.stuck_counter = 20;
        motion.run_obstacle_recovery();
        assert_eq!(motion.obstacle_stage, 2);
        let sign_before = motion.lateral_sign;
        motion.stuck_counter = 25;
        motion.run_obstacle_recovery();
        assert_eq!(motion.lateral_sign, -sign_before);

        motion.stuck_counter = 31;
        motion.run_obstacle_recovery();
        assert_eq!(motion.obstacle_stage, 3);
        assert_eq!(motion.backup_ticks, 15);

        // Stage 4 with a next waypoint available: skip to it.
        motion.stuck_counter = 46;
        motion.run_obstacle_recovery();
        assert_eq!(motion.path_index, 1);
        assert_eq!(motion.stuck_counter, 0);
        assert_eq!(motion.obstacle_stage, 0);

        // Stage 4 on the last waypoint: request a fresh path.
        motion.stuck_counter = 46;
        motion.run_obstacle_recovery();
        assert!(motion.needs_path);
    }

    #[test]
    fn test_yaw_turns_are_rate_limited() {
        let mut motion = grounded_controller(0.5, 0.5);
        motion.yaw = 0.0;
        // Due -x: target yaw is 90.
        motion.turn_toward(-1.0, 0.0);
        assert_eq!(motion.yaw, 18.0);
        motion.turn_toward(-1.0, 0.0);
        assert_eq!(motion.yaw, 36.0);
        for _ in 0..3 {
            motion.turn_toward(-1.0, 0.0);
        }
        assert_eq!(motion.yaw, 90.0);
        // Settled: no overshoot.
        motion.turn_toward(-1.0, 0.0);
        assert_eq!(motion.yaw, 90.0);
    }

    #[test]
    fn test_gravity_pulls_airborne_avatar_to_terminal_velocity() {
        let mut world = World::new();
        // A chunk with no blocks at all: free fall.
        world
            .store_chunk(0, 0, &encode_chunk_body(&[SectionData::single_value(0)], false))
            .unwrap();
        let mut motion = grounded_controller(5.5, 5.5);
        motion.position = Vec3d::new(5.5, 200.0, 5.5);
        motion.on_ground = false;
        motion.goto(Vec3d::new(5.5, 64.0, 8.5));

        // The path request fails (nothing walkable), so drive physics
        // directly to observe the velocity converge onto the clamp.
        for _ in 0..2000 {
            motion.run_physics(&world, &Vec3d::new(5.5, 64.0, 8.5));
        }
        assert!((motion.velocity.y - TERMINAL_VELOCITY).abs() < 1e-6);
        assert!(motion.velocity.y >= TERMINAL_VELOCITY);
    }
}
