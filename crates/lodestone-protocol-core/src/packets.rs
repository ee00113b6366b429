use bytes::BytesMut;
use uuid::Uuid;

/// Version-independent packet representation, from the client's point
/// of view. The protocol adapter converts between wire format and
/// these; everything above the adapter matches on this enum.
#[derive(Debug, Clone)]
pub enum Packet {
    // === Serverbound: handshaking ===
    Handshake {
        protocol_version: i32,
        server_address: String,
        server_port: u16,
        next_state: i32,
    },

    // === Serverbound: login ===
    LoginStart {
        name: String,
        uuid: Uuid,
    },
    LoginAcknowledged,

    // === Serverbound: configuration ===
    ClientInformation {
        locale: String,
        view_distance: i8,
        chat_mode: i32,
        chat_colors: bool,
        skin_parts: u8,
        main_hand: i32,
        text_filtering: bool,
        allow_listing: bool,
        particle_status: i32,
    },
    AcknowledgeFinishConfiguration,
    /// Reply to the server's known-packs request; the client claims none.
    KnownPacksResponse,
    /// Accepts-then-declines are not modelled; the client reports
    /// "successfully downloaded" (3) for every push and moves on.
    ResourcePackResponse {
        uuid: Uuid,
        result: i32,
    },
    /// Cookie refusal: the key echoed back with no payload.
    CookieResponse {
        key: String,
    },

    // === Serverbound: play ===
    KeepAliveResponse {
        id: i64,
    },
    PongResponse {
        id: i32,
    },
    ConfirmTeleport {
        teleport_id: i32,
    },
    ChunkBatchReceived {
        chunks_per_tick: f32,
    },
    PlayerPositionRotation {
        x: f64,
        y: f64,
        z: f64,
        yaw: f32,
        pitch: f32,
        on_ground: bool,
    },
    /// Unsigned chat (signed = false, no acknowledgements).
    ChatMessage {
        message: String,
        timestamp: i64,
        salt: i64,
    },
    /// Client status action 0: respawn after death.
    ClientStatusRespawn,
    /// Accepts the server's demand to re-enter configuration.
    ConfigurationAcknowledged,

    // === Clientbound: login ===
    SetCompression {
        threshold: i32,
    },
    LoginSuccess {
        uuid: Uuid,
        username: String,
    },

    // === Clientbound: configuration ===
    FinishConfiguration,
    KnownPacksRequest,
    ResourcePackPush {
        uuid: Uuid,
    },
    CookieRequest {
        key: String,
    },

    // === Clientbound: play ===
    JoinGame {
        entity_id: i32,
        hardcore: bool,
    },
    SynchronizePosition {
        teleport_id: i32,
        x: f64,
        y: f64,
        z: f64,
        dx: f64,
        dy: f64,
        dz: f64,
        yaw: f32,
        pitch: f32,
    },
    KeepAlive {
        id: i64,
    },
    Ping {
        id: i32,
    },
    /// Column coordinates are packet fields; the body (heightmaps,
    /// section data, block entities, light) stays opaque here and is
    /// handed to the chunk decoder as-is.
    ChunkData {
        chunk_x: i32,
        chunk_z: i32,
        body: BytesMut,
    },
    UnloadChunk {
        chunk_x: i32,
        chunk_z: i32,
    },
    /// End of a chunk batch; the client reports its consumption rate.
    ChunkBatchFinished {
        batch_size: i32,
    },
    SpawnEntity {
        entity_id: i32,
        uuid: Uuid,
        kind: i32,
        x: f64,
        y: f64,
        z: f64,
    },
    /// Deltas already converted from packed 1/4096-cell units.
    EntityPositionDelta {
        entity_id: i32,
        dx: f64,
        dy: f64,
        dz: f64,
        on_ground: bool,
    },
    TeleportEntity {
        entity_id: i32,
        x: f64,
        y: f64,
        z: f64,
    },
    RemoveEntities {
        entity_ids: Vec<i32>,
    },
    SetHealth {
        health: f32,
        food: i32,
        saturation: f32,
    },
    SystemChat {
        content: String,
        overlay: bool,
    },
    /// Server demands a return to the configuration state.
    StartConfiguration,
    Disconnect {
        reason: String,
    },

    /// Anything the client has no handler for. Logged at trace and
    /// dropped.
    Unknown {
        packet_id: i32,
    },
}
