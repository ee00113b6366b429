use crate::events::ClientEvent;
use anyhow::{bail, Result};
use lodestone_nav::{MotionConfig, MotionController};
use lodestone_protocol_core::{
    read_varint, Connection, ConnectionReader, ConnectionState, ConnectionWriter, Packet,
    ProtocolAdapter,
};
use lodestone_protocol_v1_21::V1_21Adapter;
use lodestone_types::Vec3d;
use lodestone_world::{EntityTracker, World};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

/// Everything one client needs to come up.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub host: String,
    pub port: u16,
    pub protocol_version: i32,
    pub username: String,
    pub uuid: Option<Uuid>,
    pub view_distance: i8,
    pub keep_alive_interval: Duration,
}

/// Commands the supervisor injects into a running client.
#[derive(Debug, Clone)]
pub enum ClientCommand {
    Goto { x: f64, y: f64, z: f64 },
    Stop,
    ReportPosition,
    Disconnect,
}

enum Flow {
    Continue,
    Reconfigure,
    Disconnect(String),
}

/// One headless avatar: a connection, the world as the server has
/// revealed it, nearby entities, and the motion controller walking the
/// avatar around. All state is owned and mutated by a single
/// cooperative loop.
struct Client {
    settings: ClientSettings,
    adapter: V1_21Adapter,
    world: World,
    entities: EntityTracker,
    motion: MotionController,
    events: mpsc::UnboundedSender<ClientEvent>,
    entity_id: Option<i32>,
    health: f32,
    food: i32,
    tick_count: u64,
    last_keep_alive: Instant,
}

/// Run a client session to completion: connect, log in, configure,
/// then pump packets and motion ticks until disconnect.
pub async fn run(
    settings: ClientSettings,
    events: mpsc::UnboundedSender<ClientEvent>,
    commands: &mut mpsc::UnboundedReceiver<ClientCommand>,
) -> Result<()> {
    let uuid = settings
        .uuid
        .unwrap_or_else(|| offline_uuid(&settings.username));
    let adapter = V1_21Adapter::new(settings.protocol_version);

    let mut conn = Connection::connect(&settings.host, settings.port).await?;
    info!(
        "{} connected to {}:{} (protocol {})",
        settings.username, settings.host, settings.port, settings.protocol_version
    );

    send(
        &mut conn,
        &adapter,
        ConnectionState::Handshaking,
        &Packet::Handshake {
            protocol_version: settings.protocol_version,
            server_address: settings.host.clone(),
            server_port: settings.port,
            next_state: 2,
        },
    )
    .await?;

    send(
        &mut conn,
        &adapter,
        ConnectionState::Login,
        &Packet::LoginStart {
            name: settings.username.clone(),
            uuid,
        },
    )
    .await?;

    // Login phase: compression may be enabled before success arrives.
    loop {
        let (id, mut data) = conn.read_packet().await?;
        match adapter.decode_packet(ConnectionState::Login, id, &mut data) {
            Ok(Packet::SetCompression { threshold }) => {
                if threshold >= 0 {
                    debug!("Compression enabled, threshold {}", threshold);
                    conn.enable_compression(threshold);
                }
            }
            Ok(Packet::LoginSuccess {
                uuid: server_uuid,
                username,
            }) => {
                send(
                    &mut conn,
                    &adapter,
                    ConnectionState::Login,
                    &Packet::LoginAcknowledged,
                )
                .await?;
                info!("{} logged in as {}", settings.username, server_uuid);
                let _ = events.send(ClientEvent::Login {
                    username,
                    uuid: server_uuid,
                });
                break;
            }
            Ok(Packet::CookieRequest { key }) => {
                send(
                    &mut conn,
                    &adapter,
                    ConnectionState::Login,
                    &Packet::CookieResponse { key },
                )
                .await?;
            }
            Ok(Packet::Disconnect { reason }) => {
                let _ = events.send(ClientEvent::Disconnected {
                    reason: reason.clone(),
                });
                bail!("Disconnected during login: {}", reason);
            }
            Ok(other) => trace!("Ignoring login packet {:?}", other),
            Err(e) => debug!("Dropping malformed login packet 0x{:02X}: {}", id, e),
        }
    }

    let (mut reader, mut writer) = conn.into_split();
    run_configuration(&mut reader, &mut writer, &adapter, &settings, &events).await?;

    let mut motion_config = MotionConfig::default();
    motion_config.path.policy = lodestone_world::UnloadedPolicy::Passable;
    let mut client = Client {
        settings,
        adapter,
        world: World::new(),
        entities: EntityTracker::new(),
        motion: MotionController::new(motion_config),
        events,
        entity_id: None,
        health: 20.0,
        food: 20,
        tick_count: 0,
        last_keep_alive: Instant::now(),
    };
    client.run_play(reader, writer, commands).await
}

/// Drive the configuration state until the server finishes it. Also
/// used for mid-session reconfiguration after a play-state
/// start-configuration.
async fn run_configuration(
    reader: &mut ConnectionReader,
    writer: &mut ConnectionWriter,
    adapter: &V1_21Adapter,
    settings: &ClientSettings,
    events: &mpsc::UnboundedSender<ClientEvent>,
) -> Result<()> {
    let state = ConnectionState::Configuration;
    loop {
        let (id, mut data) = reader.read_packet().await?;
        let packet = match adapter.decode_packet(state, id, &mut data) {
            Ok(packet) => packet,
            Err(e) => {
                debug!("Dropping malformed configuration packet 0x{:02X}: {}", id, e);
                continue;
            }
        };
        match packet {
            Packet::FinishConfiguration => {
                send_split(
                    writer,
                    adapter,
                    state,
                    &Packet::ClientInformation {
                        locale: "en_us".into(),
                        view_distance: settings.view_distance,
                        chat_mode: 0,
                        chat_colors: true,
                        skin_parts: 0x7F,
                        main_hand: 1,
                        text_filtering: false,
                        allow_listing: true,
                        particle_status: 0,
                    },
                )
                .await?;
                send_split(writer, adapter, state, &Packet::AcknowledgeFinishConfiguration)
                    .await?;
                debug!("Configuration finished");
                return Ok(());
            }
            Packet::KnownPacksRequest => {
                send_split(writer, adapter, state, &Packet::KnownPacksResponse).await?;
            }
            Packet::ResourcePackPush { uuid } => {
                // Report success without downloading anything.
                send_split(
                    writer,
                    adapter,
                    state,
                    &Packet::ResourcePackResponse { uuid, result: 3 },
                )
                .await?;
            }
            Packet::CookieRequest { key } => {
                send_split(writer, adapter, state, &Packet::CookieResponse { key }).await?;
            }
            Packet::KeepAlive { id } => {
                send_split(writer, adapter, state, &Packet::KeepAliveResponse { id }).await?;
            }
            Packet::Ping { id } => {
                send_split(writer, adapter, state, &Packet::PongResponse { id }).await?;
            }
            Packet::Disconnect { reason } => {
                let _ = events.send(ClientEvent::Disconnected {
                    reason: reason.clone(),
                });
                bail!("Disconnected during configuration: {}", reason);
            }
            Packet::Unknown { packet_id } => {
                trace!("Ignoring configuration packet 0x{:02X}", packet_id);
            }
            other => trace!("Ignoring configuration packet {:?}", other),
        }
    }
}

impl Client {
    async fn run_play(
        &mut self,
        mut reader: ConnectionReader,
        mut writer: ConnectionWriter,
        commands: &mut mpsc::UnboundedReceiver<ClientCommand>,
    ) -> Result<()> {
        let mut tick = tokio::time::interval(Duration::from_millis(lodestone_nav::TICK_MS));
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        self.last_keep_alive = Instant::now();

        loop {
            tokio::select! {
                result = reader.read_packet() => {
                    let (id, mut data) = result?;
                    match self.adapter.decode_packet(ConnectionState::Play, id, &mut data) {
                        Ok(packet) => match self.handle_play_packet(packet, &mut writer).await? {
                            Flow::Continue => {}
                            Flow::Reconfigure => {
                                run_configuration(
                                    &mut reader,
                                    &mut writer,
                                    &self.adapter,
                                    &self.settings,
                                    &self.events,
                                )
                                .await?;
                            }
                            Flow::Disconnect(reason) => {
                                info!("{} disconnected: {}", self.settings.username, reason);
                                return Ok(());
                            }
                        },
                        // A short or garbled payload fails its handler,
                        // never the connection.
                        Err(e) => debug!("Dropping malformed play packet 0x{:02X}: {}", id, e),
                    }
                }
                _ = tick.tick() => {
                    self.run_tick(&mut writer).await?;
                }
                cmd = commands.recv() => match cmd {
                    Some(ClientCommand::Goto { x, y, z }) => {
                        info!("{} heading to ({:.1}, {:.1}, {:.1})", self.settings.username, x, y, z);
                        self.motion.goto(Vec3d::new(x, y, z));
                    }
                    Some(ClientCommand::Stop) => {
                        info!("{} stopping", self.settings.username);
                        self.motion.stop();
                    }
                    Some(ClientCommand::ReportPosition) => {
                        let p = self.motion.position;
                        info!(
                            "{} (entity {}) at ({:.2}, {:.2}, {:.2}) yaw {:.1}, health {:.1}, food {}",
                            self.settings.username,
                            self.entity_id.map_or("?".into(), |id| id.to_string()),
                            p.x, p.y, p.z, self.motion.yaw, self.health, self.food
                        );
                        let _ = self.events.send(ClientEvent::Position { x: p.x, y: p.y, z: p.z });
                    }
                    Some(ClientCommand::Disconnect) | None => {
                        info!("{} shutting down", self.settings.username);
                        return Ok(());
                    }
                },
            }
        }
    }

    async fn handle_play_packet(&mut self, packet: Packet, writer: &mut ConnectionWriter) -> Result<Flow> {
        match packet {
            Packet::JoinGame { entity_id, hardcore } => {
                info!(
                    "{} joined the world (entity {}, hardcore: {})",
                    self.settings.username, entity_id, hardcore
                );
                self.entity_id = Some(entity_id);
                let _ = self.events.send(ClientEvent::Spawn { entity_id });
            }
            Packet::SynchronizePosition {
                teleport_id,
                x,
                y,
                z,
                yaw,
                pitch,
                ..
            } => {
                debug!("Position sync #{} to ({:.2}, {:.2}, {:.2})", teleport_id, x, y, z);
                self.send_play(writer, &Packet::ConfirmTeleport { teleport_id })
                    .await?;
                self.motion.server_position_reset(x, y, z, yaw, pitch);
                let _ = self.events.send(ClientEvent::Position { x, y, z });
            }
            Packet::KeepAlive { id } => {
                self.last_keep_alive = Instant::now();
                self.send_play(writer, &Packet::KeepAliveResponse { id }).await?;
            }
            Packet::Ping { id } => {
                self.send_play(writer, &Packet::PongResponse { id }).await?;
            }
            Packet::ChunkData {
                chunk_x,
                chunk_z,
                body,
            } => {
                // Decode failures are counted and skipped inside the
                // world; the stream continues either way.
                let _ = self.world.store_chunk(chunk_x, chunk_z, &body);
            }
            Packet::UnloadChunk { chunk_x, chunk_z } => {
                self.world.unload_chunk(chunk_x, chunk_z);
            }
            Packet::ChunkBatchFinished { batch_size } => {
                trace!("Chunk batch of {} done", batch_size);
                self.send_play(
                    writer,
                    &Packet::ChunkBatchReceived {
                        chunks_per_tick: 20.0,
                    },
                )
                .await?;
            }
            Packet::SpawnEntity {
                entity_id,
                uuid,
                kind,
                x,
                y,
                z,
            } => {
                self.entities.spawn(entity_id, uuid, kind, Vec3d::new(x, y, z));
            }
            Packet::EntityPositionDelta {
                entity_id,
                dx,
                dy,
                dz,
                ..
            } => {
                self.entities.apply_delta(entity_id, dx, dy, dz);
            }
            Packet::TeleportEntity { entity_id, x, y, z } => {
                self.entities.set_position(entity_id, Vec3d::new(x, y, z));
            }
            Packet::RemoveEntities { entity_ids } => {
                for id in entity_ids {
                    self.entities.remove(id);
                }
            }
            Packet::SetHealth {
                health,
                food,
                saturation: _,
            } => {
                self.health = health;
                self.food = food;
                let _ = self.events.send(ClientEvent::Health { health, food });
                if health <= 0.0 {
                    warn!("{} died, respawning", self.settings.username);
                    self.send_play(writer, &Packet::ClientStatusRespawn).await?;
                    self.motion.stop();
                }
            }
            Packet::SystemChat { content, overlay } => {
                if !overlay {
                    debug!("[chat] {}", content);
                    let _ = self.events.send(ClientEvent::Chat { message: content });
                }
            }
            Packet::StartConfiguration => {
                debug!("Server requested reconfiguration");
                self.send_play(writer, &Packet::ConfigurationAcknowledged).await?;
                return Ok(Flow::Reconfigure);
            }
            Packet::Disconnect { reason } => {
                let _ = self.events.send(ClientEvent::Disconnected {
                    reason: reason.clone(),
                });
                return Ok(Flow::Disconnect(reason));
            }
            Packet::Unknown { packet_id } => {
                trace!("Ignoring play packet 0x{:02X}", packet_id);
            }
            other => trace!("Ignoring play packet {:?}", other),
        }
        Ok(Flow::Continue)
    }

    async fn run_tick(&mut self, writer: &mut ConnectionWriter) -> Result<()> {
        self.tick_count += 1;

        // Keep-alive watchdog: a silent server is a dead server.
        if self.last_keep_alive.elapsed() > 2 * self.settings.keep_alive_interval {
            bail!("No keep-alive for {:?}", self.last_keep_alive.elapsed());
        }

        let out = self.motion.tick(&self.world);

        if let Some(p) = out.position {
            self.send_play(
                writer,
                &Packet::PlayerPositionRotation {
                    x: p.x,
                    y: p.y,
                    z: p.z,
                    yaw: p.yaw,
                    pitch: p.pitch,
                    on_ground: p.on_ground,
                },
            )
            .await?;
        }

        if out.arrived {
            let p = self.motion.position;
            info!(
                "{} arrived at ({:.1}, {:.1}, {:.1})",
                self.settings.username, p.x, p.y, p.z
            );
            let _ = self.events.send(ClientEvent::Arrived { x: p.x, y: p.y, z: p.z });
            let message = format!("Arrived at {:.0} {:.0} {:.0}", p.x, p.y, p.z);
            self.send_play(
                writer,
                &Packet::ChatMessage {
                    message,
                    timestamp: epoch_millis(),
                    salt: rand::random(),
                },
            )
            .await?;
        }

        if out.path_failed {
            let _ = self.events.send(ClientEvent::Error {
                message: "no path to goal".into(),
            });
        }

        if self.tick_count % 100 == 0 {
            let center = self.motion.position.chunk_pos();
            self.world
                .clear_distant_chunks(center, self.settings.view_distance as i32 + 2);
        }
        if self.tick_count % 20 == 0 && self.motion.is_moving() {
            let p = self.motion.position;
            let _ = self.events.send(ClientEvent::Position { x: p.x, y: p.y, z: p.z });
        }

        Ok(())
    }

    async fn send_play(&self, writer: &mut ConnectionWriter, packet: &Packet) -> Result<()> {
        send_split(writer, &self.adapter, ConnectionState::Play, packet).await
    }
}

/// Encode and frame a packet on an unsplit connection.
async fn send(
    conn: &mut Connection,
    adapter: &V1_21Adapter,
    state: ConnectionState,
    packet: &Packet,
) -> Result<()> {
    let mut encoded = adapter.encode_packet(state, packet)?;
    let packet_id = read_varint(&mut encoded)?;
    conn.write_packet(packet_id, &encoded).await
}

/// Encode and frame a packet on the write half.
async fn send_split(
    writer: &mut ConnectionWriter,
    adapter: &V1_21Adapter,
    state: ConnectionState,
    packet: &Packet,
) -> Result<()> {
    let mut encoded = adapter.encode_packet(state, packet)?;
    let packet_id = read_varint(&mut encoded)?;
    writer.write_packet(packet_id, &encoded).await
}

fn epoch_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Offline-mode UUID: MD5 of `"OfflinePlayer:" + name` with the
/// version nibble forced to 3 and the IETF variant bits set.
pub fn offline_uuid(name: &str) -> Uuid {
    use md5::{Digest, Md5};
    let mut hasher = Md5::new();
    hasher.update(format!("OfflinePlayer:{}", name).as_bytes());
    let mut bytes: [u8; 16] = hasher.finalize().into();
    bytes[6] = (bytes[6] & 0x0F) | 0x30;
    bytes[8] = (bytes[8] & 0x3F) | 0x80;
    Uuid::from_bytes(bytes)
}
