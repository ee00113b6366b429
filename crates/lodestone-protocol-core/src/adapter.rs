use crate::{ConnectionState, Packet};
use anyhow::Result;
use bytes::BytesMut;

/// Trait for version-specific protocol adapters.
///
/// The client targets one wire protocol number; the adapter is the
/// single place that knows packet ids and field layouts for it.
pub trait ProtocolAdapter: Send + Sync {
    /// The protocol version number this adapter speaks.
    fn protocol_version(&self) -> i32;

    /// Decode a clientbound packet from wire format.
    ///
    /// Unknown ids decode to `Packet::Unknown`; a malformed payload is
    /// an error contained by the caller (the connection survives).
    fn decode_packet(
        &self,
        state: ConnectionState,
        id: i32,
        data: &mut BytesMut,
    ) -> Result<Packet>;

    /// Encode a serverbound packet into `[varint id, payload]` bytes.
    fn encode_packet(&self, state: ConnectionState, packet: &Packet) -> Result<BytesMut>;
}
