use anyhow::{bail, Result};
use bytes::{Buf, BufMut, BytesMut};
use lodestone_protocol_core::*;

/// Protocol number the client speaks unless the config overrides it.
pub const DEFAULT_PROTOCOL_VERSION: i32 = 772;

pub struct V1_21Adapter {
    protocol_version: i32,
}

impl V1_21Adapter {
    pub fn new(protocol_version: i32) -> Self {
        Self { protocol_version }
    }
}

impl Default for V1_21Adapter {
    fn default() -> Self {
        Self::new(DEFAULT_PROTOCOL_VERSION)
    }
}

impl ProtocolAdapter for V1_21Adapter {
    fn protocol_version(&self) -> i32 {
        self.protocol_version
    }

    fn decode_packet(
        &self,
        state: ConnectionState,
        id: i32,
        data: &mut BytesMut,
    ) -> Result<Packet> {
        match state {
            ConnectionState::Handshaking => Ok(Packet::Unknown { packet_id: id }),
            ConnectionState::Login => decode_login(id, data),
            ConnectionState::Configuration => decode_configuration(id, data),
            ConnectionState::Play => decode_play(id, data),
        }
    }

    fn encode_packet(&self, state: ConnectionState, packet: &Packet) -> Result<BytesMut> {
        match state {
            ConnectionState::Handshaking => encode_handshaking(packet),
            ConnectionState::Login => encode_login(packet),
            ConnectionState::Configuration => encode_configuration(packet),
            ConnectionState::Play => encode_play(packet),
        }
    }
}

// === Packet ID constants ===

// Handshaking serverbound
const HANDSHAKE: i32 = 0x00;

// Login serverbound
const LOGIN_START: i32 = 0x00;
const LOGIN_ACKNOWLEDGED: i32 = 0x03;
const LOGIN_COOKIE_RESPONSE: i32 = 0x04;

// Login clientbound
const LOGIN_DISCONNECT: i32 = 0x00;
const LOGIN_SUCCESS: i32 = 0x02;
const SET_COMPRESSION: i32 = 0x03;
const LOGIN_COOKIE_REQUEST: i32 = 0x05;

// Configuration serverbound
const CONFIG_CLIENT_INFORMATION: i32 = 0x00;
const CONFIG_COOKIE_RESPONSE: i32 = 0x01;
const CONFIG_ACK_FINISH: i32 = 0x03;
const CONFIG_KEEP_ALIVE_RESPONSE: i32 = 0x04;
const CONFIG_PONG: i32 = 0x05;
const CONFIG_RESOURCE_PACK_RESPONSE: i32 = 0x06;
const CONFIG_KNOWN_PACKS_RESPONSE: i32 = 0x07;

// Configuration clientbound
const CONFIG_COOKIE_REQUEST: i32 = 0x00;
const CONFIG_DISCONNECT: i32 = 0x02;
const CONFIG_FINISH: i32 = 0x03;
const CONFIG_KEEP_ALIVE: i32 = 0x04;
const CONFIG_PING: i32 = 0x05;
const CONFIG_RESOURCE_PACK_PUSH: i32 = 0x09;
const CONFIG_KNOWN_PACKS: i32 = 0x0E;

// Play serverbound
const PLAY_CONFIRM_TELEPORT: i32 = 0x00;
const PLAY_CHAT: i32 = 0x08;
const PLAY_CHUNK_BATCH_RECEIVED: i32 = 0x0A;
const PLAY_CLIENT_STATUS: i32 = 0x0B;
const PLAY_CONFIGURATION_ACK: i32 = 0x0E;
const PLAY_KEEP_ALIVE_RESPONSE: i32 = 0x1B;
const PLAY_POSITION_ROTATION: i32 = 0x1E;
const PLAY_PONG: i32 = 0x2C;

// Play clientbound
const PLAY_SPAWN_ENTITY: i32 = 0x01;
const PLAY_CHUNK_BATCH_FINISHED: i32 = 0x0C;
const PLAY_DISCONNECT: i32 = 0x1D;
const PLAY_UNLOAD_CHUNK: i32 = 0x21;
const PLAY_KEEP_ALIVE: i32 = 0x26;
const PLAY_CHUNK_DATA: i32 = 0x27;
const PLAY_JOIN_GAME: i32 = 0x2B;
const PLAY_ENTITY_POSITION: i32 = 0x2E;
const PLAY_ENTITY_POSITION_ROTATION: i32 = 0x2F;
const PLAY_PING: i32 = 0x35;
const PLAY_SYNC_PLAYER_POSITION: i32 = 0x40;
const PLAY_REMOVE_ENTITIES: i32 = 0x42;
const PLAY_SET_HEALTH: i32 = 0x5D;
const PLAY_START_CONFIGURATION: i32 = 0x69;
const PLAY_SYSTEM_CHAT: i32 = 0x6C;
const PLAY_TELEPORT_ENTITY: i32 = 0x70;

/// Entity delta positions come as 16-bit fixed-point 1/4096-cell units.
const DELTA_SCALE: f64 = 4096.0;

// === Decode functions (clientbound) ===

fn decode_login(id: i32, data: &mut BytesMut) -> Result<Packet> {
    match id {
        LOGIN_DISCONNECT => {
            // Login-state disconnect reason is a JSON string.
            let reason = read_string(data, 262144)?;
            Ok(Packet::Disconnect { reason })
        }
        LOGIN_SUCCESS => {
            let uuid = read_uuid(data)?;
            let username = read_string(data, 16)?;
            // Remainder (profile properties) is irrelevant to a
            // headless client.
            Ok(Packet::LoginSuccess { uuid, username })
        }
        SET_COMPRESSION => {
            let threshold = read_varint(data)?;
            Ok(Packet::SetCompression { threshold })
        }
        LOGIN_COOKIE_REQUEST => {
            let key = read_string(data, 32767)?;
            Ok(Packet::CookieRequest { key })
        }
        _ => Ok(Packet::Unknown { packet_id: id }),
    }
}

fn decode_configuration(id: i32, data: &mut BytesMut) -> Result<Packet> {
    match id {
        CONFIG_COOKIE_REQUEST => {
            let key = read_string(data, 32767)?;
            Ok(Packet::CookieRequest { key })
        }
        CONFIG_DISCONNECT => Ok(Packet::Disconnect {
            reason: lodestone_nbt::extract_text(data),
        }),
        CONFIG_FINISH => Ok(Packet::FinishConfiguration),
        CONFIG_KEEP_ALIVE => {
            let id = read_i64(data)?;
            Ok(Packet::KeepAlive { id })
        }
        CONFIG_PING => {
            let id = read_i32(data)?;
            Ok(Packet::Ping { id })
        }
        CONFIG_RESOURCE_PACK_PUSH => {
            let uuid = read_uuid(data)?;
            // URL, hash and prompt are irrelevant: every push is
            // answered with "successfully downloaded".
            Ok(Packet::ResourcePackPush { uuid })
        }
        CONFIG_KNOWN_PACKS => Ok(Packet::KnownPacksRequest),
        _ => Ok(Packet::Unknown { packet_id: id }),
    }
}

fn decode_play(id: i32, data: &mut BytesMut) -> Result<Packet> {
    match id {
        PLAY_SPAWN_ENTITY => {
            let entity_id = read_varint(data)?;
            let uuid = read_uuid(data)?;
            let kind = read_varint(data)?;
            let x = read_f64(data)?;
            let y = read_f64(data)?;
            let z = read_f64(data)?;
            // pitch/yaw/head-yaw angle bytes, data varint and initial
            // velocity are ignored.
            Ok(Packet::SpawnEntity {
                entity_id,
                uuid,
                kind,
                x,
                y,
                z,
            })
        }
        PLAY_CHUNK_BATCH_FINISHED => {
            let batch_size = read_varint(data)?;
            Ok(Packet::ChunkBatchFinished { batch_size })
        }
        PLAY_DISCONNECT => Ok(Packet::Disconnect {
            reason: lodestone_nbt::extract_text(data),
        }),
        PLAY_UNLOAD_CHUNK => {
            let chunk_z = read_i32(data)?;
            let chunk_x = read_i32(data)?;
            Ok(Packet::UnloadChunk { chunk_x, chunk_z })
        }
        PLAY_KEEP_ALIVE => {
            let id = read_i64(data)?;
            Ok(Packet::KeepAlive { id })
        }
        PLAY_CHUNK_DATA => {
            let chunk_x = read_i32(data)?;
            let chunk_z = read_i32(data)?;
            let len = data.remaining();
            let body = data.split_to(len);
            Ok(Packet::ChunkData {
                chunk_x,
                chunk_z,
                body,
            })
        }
        PLAY_JOIN_GAME => {
            let entity_id = read_i32(data)?;
            let hardcore = read_bool(data)?;
            // The long tail of dimension metadata is irrelevant here.
            Ok(Packet::JoinGame { entity_id, hardcore })
        }
        PLAY_ENTITY_POSITION => {
            let entity_id = read_varint(data)?;
            let dx = read_i16(data)? as f64 / DELTA_SCALE;
            let dy = read_i16(data)? as f64 / DELTA_SCALE;
            let dz = read_i16(data)? as f64 / DELTA_SCALE;
            let on_ground = read_bool(data)?;
            Ok(Packet::EntityPositionDelta {
                entity_id,
                dx,
                dy,
                dz,
                on_ground,
            })
        }
        PLAY_ENTITY_POSITION_ROTATION => {
            let entity_id = read_varint(data)?;
            let dx = read_i16(data)? as f64 / DELTA_SCALE;
            let dy = read_i16(data)? as f64 / DELTA_SCALE;
            let dz = read_i16(data)? as f64 / DELTA_SCALE;
            let _yaw = read_u8(data)?;
            let _pitch = read_u8(data)?;
            let on_ground = read_bool(data)?;
            Ok(Packet::EntityPositionDelta {
                entity_id,
                dx,
                dy,
                dz,
                on_ground,
            })
        }
        PLAY_PING => {
            let id = read_i32(data)?;
            Ok(Packet::Ping { id })
        }
        PLAY_SYNC_PLAYER_POSITION => {
            let teleport_id = read_varint(data)?;
            let x = read_f64(data)?;
            let y = read_f64(data)?;
            let z = read_f64(data)?;
            let dx = read_f64(data)?;
            let dy = read_f64(data)?;
            let dz = read_f64(data)?;
            let yaw = read_f32(data)?;
            let pitch = read_f32(data)?;
            Ok(Packet::SynchronizePosition {
                teleport_id,
                x,
                y,
                z,
                dx,
                dy,
                dz,
                yaw,
                pitch,
            })
        }
        PLAY_REMOVE_ENTITIES => {
            let count = read_varint(data)? as usize;
            let mut entity_ids = Vec::with_capacity(count.min(4096));
            for _ in 0..count {
                entity_ids.push(read_varint(data)?);
            }
            Ok(Packet::RemoveEntities { entity_ids })
        }
        PLAY_SET_HEALTH => {
            let health = read_f32(data)?;
            let food = read_varint(data)?;
            let saturation = read_f32(data)?;
            Ok(Packet::SetHealth {
                health,
                food,
                saturation,
            })
        }
        PLAY_START_CONFIGURATION => Ok(Packet::StartConfiguration),
        PLAY_SYSTEM_CHAT => {
            let end = lodestone_nbt::skip_root_nameless(data)
                .map_err(|e| anyhow::anyhow!("chat component: {}", e))?;
            let content = lodestone_nbt::extract_text(&data[..end]);
            data.advance(end);
            let overlay = read_bool(data)?;
            Ok(Packet::SystemChat { content, overlay })
        }
        PLAY_TELEPORT_ENTITY => {
            let entity_id = read_varint(data)?;
            let x = read_f64(data)?;
            let y = read_f64(data)?;
            let z = read_f64(data)?;
            // Angle bytes and on-ground flag ignored.
            Ok(Packet::TeleportEntity { entity_id, x, y, z })
        }
        _ => Ok(Packet::Unknown { packet_id: id }),
    }
}

// === Encode functions (serverbound) ===

fn encode_handshaking(packet: &Packet) -> Result<BytesMut> {
    let mut buf = BytesMut::new();
    match packet {
        Packet::Handshake {
            protocol_version,
            server_address,
            server_port,
            next_state,
        } => {
            write_varint(&mut buf, HANDSHAKE);
            write_varint(&mut buf, *protocol_version);
            write_string(&mut buf, server_address);
            buf.put_u16(*server_port);
            write_varint(&mut buf, *next_state);
        }
        _ => bail!("Cannot encode {:?} in handshaking state", std::mem::discriminant(packet)),
    }
    Ok(buf)
}

fn encode_login(packet: &Packet) -> Result<BytesMut> {
    let mut buf = BytesMut::new();
    match packet {
        Packet::LoginStart { name, uuid } => {
            write_varint(&mut buf, LOGIN_START);
            write_string(&mut buf, name);
            write_uuid(&mut buf, uuid);
        }
        Packet::LoginAcknowledged => {
            write_varint(&mut buf, LOGIN_ACKNOWLEDGED);
        }
        Packet::CookieResponse { key } => {
            write_varint(&mut buf, LOGIN_COOKIE_RESPONSE);
            write_string(&mut buf, key);
            buf.put_u8(0); // no payload
        }
        _ => bail!("Cannot encode {:?} in login state", std::mem::discriminant(packet)),
    }
    Ok(buf)
}

fn encode_configuration(packet: &Packet) -> Result<BytesMut> {
    let mut buf = BytesMut::new();
    match packet {
        Packet::ClientInformation {
            locale,
            view_distance,
            chat_mode,
            chat_colors,
            skin_parts,
            main_hand,
            text_filtering,
            allow_listing,
            particle_status,
        } => {
            write_varint(&mut buf, CONFIG_CLIENT_INFORMATION);
            write_string(&mut buf, locale);
            buf.put_i8(*view_distance);
            write_varint(&mut buf, *chat_mode);
            buf.put_u8(*chat_colors as u8);
            buf.put_u8(*skin_parts);
            write_varint(&mut buf, *main_hand);
            buf.put_u8(*text_filtering as u8);
            buf.put_u8(*allow_listing as u8);
            write_varint(&mut buf, *particle_status);
        }
        Packet::AcknowledgeFinishConfiguration => {
            write_varint(&mut buf, CONFIG_ACK_FINISH);
        }
        Packet::KnownPacksResponse => {
            write_varint(&mut buf, CONFIG_KNOWN_PACKS_RESPONSE);
            write_varint(&mut buf, 0);
        }
        Packet::ResourcePackResponse { uuid, result } => {
            write_varint(&mut buf, CONFIG_RESOURCE_PACK_RESPONSE);
            write_uuid(&mut buf, uuid);
            write_varint(&mut buf, *result);
        }
        Packet::CookieResponse { key } => {
            write_varint(&mut buf, CONFIG_COOKIE_RESPONSE);
            write_string(&mut buf, key);
            buf.put_u8(0); // no payload
        }
        Packet::KeepAliveResponse { id } => {
            write_varint(&mut buf, CONFIG_KEEP_ALIVE_RESPONSE);
            buf.put_i64(*id);
        }
        Packet::PongResponse { id } => {
            write_varint(&mut buf, CONFIG_PONG);
            buf.put_i32(*id);
        }
        _ => bail!(
            "Cannot encode {:?} in configuration state",
            std::mem::discriminant(packet)
        ),
    }
    Ok(buf)
}

fn encode_play(packet: &Packet) -> Result<BytesMut> {
    let mut buf = BytesMut::new();
    match packet {
        Packet::ConfirmTeleport { teleport_id } => {
            write_varint(&mut buf, PLAY_CONFIRM_TELEPORT);
            write_varint(&mut buf, *teleport_id);
        }
        Packet::ChatMessage {
            message,
            timestamp,
            salt,
        } => {
            write_varint(&mut buf, PLAY_CHAT);
            write_string(&mut buf, message);
            buf.put_i64(*timestamp);
            buf.put_i64(*salt);
            buf.put_u8(0); // not signed
            write_varint(&mut buf, 0); // message count
            write_varint(&mut buf, 0); // acknowledged bitset
        }
        Packet::ChunkBatchReceived { chunks_per_tick } => {
            write_varint(&mut buf, PLAY_CHUNK_BATCH_RECEIVED);
            buf.put_f32(*chunks_per_tick);
        }
        Packet::ClientStatusRespawn => {
            write_varint(&mut buf, PLAY_CLIENT_STATUS);
            write_varint(&mut buf, 0);
        }
        Packet::ConfigurationAcknowledged => {
            write_varint(&mut buf, PLAY_CONFIGURATION_ACK);
        }
        Packet::KeepAliveResponse { id } => {
            write_varint(&mut buf, PLAY_KEEP_ALIVE_RESPONSE);
            buf.put_i64(*id);
        }
        Packet::PlayerPositionRotation {
            x,
            y,
            z,
            yaw,
            pitch,
            on_ground,
        } => {
            write_varint(&mut buf, PLAY_POSITION_ROTATION);
            buf.put_f64(*x);
            buf.put_f64(*y);
            buf.put_f64(*z);
            buf.put_f32(*yaw);
            buf.put_f32(*pitch);
            buf.put_u8(*on_ground as u8);
        }
        Packet::PongResponse { id } => {
            write_varint(&mut buf, PLAY_PONG);
            buf.put_i32(*id);
        }
        _ => bail!("Cannot encode {:?} in play state", std::mem::discriminant(packet)),
    }
    Ok(buf)
}
