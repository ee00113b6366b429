use lodestone_types::Vec3d;
use std::collections::HashMap;
use std::time::Instant;
use uuid::Uuid;

/// One tracked entity. `kind` is the registry type id from the spawn
/// packet; the client does not interpret it beyond logging.
#[derive(Debug, Clone)]
pub struct Entity {
    pub id: i32,
    pub uuid: Uuid,
    pub kind: i32,
    pub position: Vec3d,
    pub last_update: Instant,
}

/// Entities the server has spawned around the avatar.
///
/// Used for proximity checks and for "is something standing on my next
/// step" queries during navigation.
#[derive(Default)]
pub struct EntityTracker {
    entities: HashMap<i32, Entity>,
}

impl EntityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn(&mut self, id: i32, uuid: Uuid, kind: i32, position: Vec3d) {
        self.entities.insert(
            id,
            Entity {
                id,
                uuid,
                kind,
                position,
                last_update: Instant::now(),
            },
        );
    }

    /// Absolute position update (teleport-entity).
    pub fn set_position(&mut self, id: i32, position: Vec3d) {
        if let Some(entity) = self.entities.get_mut(&id) {
            entity.position = position;
            entity.last_update = Instant::now();
        }
    }

    /// Relative update; deltas already converted from packed units.
    pub fn apply_delta(&mut self, id: i32, dx: f64, dy: f64, dz: f64) {
        if let Some(entity) = self.entities.get_mut(&id) {
            entity.position.x += dx;
            entity.position.y += dy;
            entity.position.z += dz;
            entity.last_update = Instant::now();
        }
    }

    pub fn remove(&mut self, id: i32) -> Option<Entity> {
        self.entities.remove(&id)
    }

    pub fn get(&self, id: i32) -> Option<&Entity> {
        self.entities.get(&id)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Entities within `radius` of `center` in the XZ plane.
    pub fn nearby(&self, center: &Vec3d, radius: f64) -> Vec<&Entity> {
        self.entities
            .values()
            .filter(|e| e.position.xz_distance_to(center) <= radius)
            .collect()
    }

    /// Entities whose perpendicular XZ distance to the segment
    /// `from → to` is at most `max_dist` — the ones standing along an
    /// intended step.
    pub fn along_segment(&self, from: &Vec3d, to: &Vec3d, max_dist: f64) -> Vec<&Entity> {
        self.entities
            .values()
            .filter(|e| segment_distance_xz(&e.position, from, to) <= max_dist)
            .collect()
    }
}

/// XZ-plane distance from a point to a line segment.
fn segment_distance_xz(point: &Vec3d, a: &Vec3d, b: &Vec3d) -> f64 {
    let (px, pz) = (point.x - a.x, point.z - a.z);
    let (sx, sz) = (b.x - a.x, b.z - a.z);
    let len_sq = sx * sx + sz * sz;
    if len_sq < 1e-12 {
        return point.xz_distance_to(a);
    }
    let t = ((px * sx + pz * sz) / len_sq).clamp(0.0, 1.0);
    let (cx, cz) = (a.x + t * sx, a.z + t * sz);
    let (dx, dz) = (point.x - cx, point.z - cz);
    (dx * dx + dz * dz).sqrt()
}
