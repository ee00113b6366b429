use uuid::Uuid;

/// Observable client lifecycle events, delivered through the client's
/// outbound mailbox. Child components never call back into the client;
/// everything flows up through this channel.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    Login { username: String, uuid: Uuid },
    Spawn { entity_id: i32 },
    Position { x: f64, y: f64, z: f64 },
    Health { health: f32, food: i32 },
    Chat { message: String },
    Arrived { x: f64, y: f64, z: f64 },
    Error { message: String },
    Disconnected { reason: String },
}
