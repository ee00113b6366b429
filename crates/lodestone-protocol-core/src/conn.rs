use crate::codec::{read_varint, varint_len, write_varint, CodecError};
use bytes::{Buf, BytesMut};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::{Read as _, Write as _};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::trace;

/// A framed protocol connection with optional zlib compression.
///
/// Frames are `[varint length, body]`; once the server enables
/// compression the body becomes `[varint uncompressed_len,
/// deflate(id ++ payload)]` with `uncompressed_len == 0` marking a
/// body below the threshold that was left uncompressed.
pub struct Connection {
    stream: TcpStream,
    read_buf: BytesMut,
    compression_threshold: Option<i32>,
}

impl Connection {
    /// Open a TCP connection to the server.
    pub async fn connect(host: &str, port: u16) -> anyhow::Result<Self> {
        let stream = TcpStream::connect((host, port)).await?;
        stream.set_nodelay(true)?;
        Ok(Self {
            stream,
            read_buf: BytesMut::with_capacity(4096),
            compression_threshold: None,
        })
    }

    /// Enable zlib compression with the given threshold.
    /// A threshold of 0 compresses every outbound packet.
    pub fn enable_compression(&mut self, threshold: i32) {
        self.compression_threshold = Some(threshold);
    }

    /// Read a single packet frame, returning (packet_id, payload).
    pub async fn read_packet(&mut self) -> anyhow::Result<(i32, BytesMut)> {
        loop {
            if let Some(result) = try_parse_packet(&mut self.read_buf, self.compression_threshold)?
            {
                return Ok(result);
            }
            let mut tmp = [0u8; 4096];
            let n = self.stream.read(&mut tmp).await?;
            if n == 0 {
                return Err(anyhow::anyhow!("Connection closed"));
            }
            self.read_buf.extend_from_slice(&tmp[..n]);
        }
    }

    /// Write a packet with the given ID and payload.
    pub async fn write_packet(&mut self, packet_id: i32, payload: &[u8]) -> anyhow::Result<()> {
        let frame = build_frame(packet_id, payload, self.compression_threshold);
        self.stream.write_all(&frame).await?;
        Ok(())
    }

    pub fn peer_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.stream.peer_addr()
    }

    /// Split the connection into read and write halves so the packet
    /// pump and the motion tick can share one `select!` loop.
    /// Compression state is transferred to each half.
    pub fn into_split(self) -> (ConnectionReader, ConnectionWriter) {
        let (read_half, write_half) = self.stream.into_split();
        (
            ConnectionReader {
                stream: read_half,
                read_buf: self.read_buf,
                compression_threshold: self.compression_threshold,
            },
            ConnectionWriter {
                stream: write_half,
                compression_threshold: self.compression_threshold,
            },
        )
    }
}

/// Read half of a split connection.
pub struct ConnectionReader {
    stream: OwnedReadHalf,
    read_buf: BytesMut,
    compression_threshold: Option<i32>,
}

impl ConnectionReader {
    pub async fn read_packet(&mut self) -> anyhow::Result<(i32, BytesMut)> {
        loop {
            if let Some(result) = try_parse_packet(&mut self.read_buf, self.compression_threshold)?
            {
                return Ok(result);
            }
            let mut tmp = [0u8; 4096];
            let n = self.stream.read(&mut tmp).await?;
            if n == 0 {
                return Err(anyhow::anyhow!("Connection closed"));
            }
            self.read_buf.extend_from_slice(&tmp[..n]);
        }
    }
}

/// Write half of a split connection.
pub struct ConnectionWriter {
    stream: OwnedWriteHalf,
    compression_threshold: Option<i32>,
}

impl ConnectionWriter {
    pub async fn write_packet(&mut self, packet_id: i32, payload: &[u8]) -> anyhow::Result<()> {
        let frame = build_frame(packet_id, payload, self.compression_threshold);
        self.stream.write_all(&frame).await?;
        Ok(())
    }
}

// === Shared helpers ===

/// Try to parse one complete frame out of `read_buf`.
///
/// Returns `Ok(None)` when more bytes are needed. A varint overflow in
/// the length prefix is fatal for the connection; a short buffer is
/// not.
fn try_parse_packet(
    read_buf: &mut BytesMut,
    compression_threshold: Option<i32>,
) -> anyhow::Result<Option<(i32, BytesMut)>> {
    if read_buf.is_empty() {
        return Ok(None);
    }

    let mut peek = read_buf.clone();
    let length = match read_varint(&mut peek) {
        Ok(len) => len as usize,
        Err(CodecError::NotEnoughData) => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let varint_bytes = read_buf.len() - peek.len();

    if peek.remaining() < length {
        return Ok(None);
    }

    read_buf.advance(varint_bytes);
    let mut packet_data = read_buf.split_to(length);

    if compression_threshold.is_some() {
        let data_length = read_varint(&mut packet_data)? as usize;
        if data_length > 0 {
            let mut decompressed = vec![0u8; data_length];
            let mut decoder = ZlibDecoder::new(&packet_data[..]);
            decoder.read_exact(&mut decompressed)?;
            // The declared length must be exact: `read_exact` already
            // rejects a short stream, and anything left past it means
            // the prefix is a mis-declared envelope.
            let mut overrun = [0u8; 1];
            if decoder.read(&mut overrun)? != 0 {
                return Err(anyhow::anyhow!(
                    "compressed packet inflates past its declared length of {}",
                    data_length
                ));
            }
            packet_data = BytesMut::from(&decompressed[..]);
        }
    }

    let packet_id = read_varint(&mut packet_data)?;
    trace!(
        "Read packet id=0x{:02X} len={}",
        packet_id,
        packet_data.len()
    );

    Ok(Some((packet_id, packet_data)))
}

fn build_frame(packet_id: i32, payload: &[u8], compression_threshold: Option<i32>) -> BytesMut {
    let mut packet_buf = BytesMut::new();
    write_varint(&mut packet_buf, packet_id);
    packet_buf.extend_from_slice(payload);

    let mut frame = BytesMut::new();

    if let Some(threshold) = compression_threshold {
        let uncompressed_len = packet_buf.len() as i32;
        if uncompressed_len >= threshold {
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
            let _ = encoder.write_all(&packet_buf);
            let compressed = encoder.finish().unwrap_or_default();

            let data_length_size = varint_len(uncompressed_len);
            let total_length = data_length_size + compressed.len();
            write_varint(&mut frame, total_length as i32);
            write_varint(&mut frame, uncompressed_len);
            frame.extend_from_slice(&compressed);
        } else {
            let total_length = 1 + packet_buf.len();
            write_varint(&mut frame, total_length as i32);
            write_varint(&mut frame, 0);
            frame.extend_from_slice(&packet_buf);
        }
    } else {
        write_varint(&mut frame, packet_buf.len() as i32);
        frame.extend_from_slice(&packet_buf);
    }

    frame
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain_all(stream: &[u8], batch: usize, threshold: Option<i32>) -> Vec<(i32, Vec<u8>)> {
        let mut read_buf = BytesMut::new();
        let mut out = Vec::new();
        for chunk in stream.chunks(batch.max(1)) {
            read_buf.extend_from_slice(chunk);
            while let Some((id, data)) = try_parse_packet(&mut read_buf, threshold).unwrap() {
                out.push((id, data.to_vec()));
            }
        }
        assert!(read_buf.is_empty(), "leftover bytes after drain");
        out
    }

    #[test]
    fn test_frame_reassembly_any_chunking() {
        let packets: Vec<(i32, Vec<u8>)> = vec![
            (0x00, vec![]),
            (0x27, (0..200u8).collect()),
            (0x1B, vec![1, 2, 3, 4, 5, 6, 7, 8]),
            (0x7F, vec![0xFF; 300]),
        ];
        let mut stream = Vec::new();
        for (id, payload) in &packets {
            stream.extend_from_slice(&build_frame(*id, payload, None));
        }

        for batch in [1, 2, 3, 7, 64, 4096] {
            let parsed = drain_all(&stream, batch, None);
            assert_eq!(parsed, packets, "batch size {}", batch);
        }
    }

    #[test]
    fn test_compression_envelope_roundtrip() {
        // Payload large enough to compress, one small enough to pass
        // through uncompressed inside the envelope.
        let mut big = b"chunk data ".repeat(200);
        big.truncate(2048);
        let small = vec![0x2A; 8];

        for threshold in [0, 64, 256, 4096] {
            let mut stream = Vec::new();
            stream.extend_from_slice(&build_frame(0x27, &big, Some(threshold)));
            stream.extend_from_slice(&build_frame(0x1B, &small, Some(threshold)));

            let parsed = drain_all(&stream, 13, Some(threshold));
            assert_eq!(parsed.len(), 2, "threshold {}", threshold);
            assert_eq!(parsed[0], (0x27, big.clone()));
            assert_eq!(parsed[1], (0x1B, small.clone()));
        }
    }

    #[test]
    fn test_mis_declared_uncompressed_length_rejected() {
        use std::io::Write as _;

        let mut packet_buf = BytesMut::new();
        write_varint(&mut packet_buf, 0x27);
        packet_buf.extend_from_slice(&(0..100u8).collect::<Vec<u8>>());
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&packet_buf).unwrap();
        let compressed = encoder.finish().unwrap();

        // Declared too short (the stream inflates past it) and too
        // long (the stream runs dry): both must fail the connection.
        let actual = packet_buf.len() as i32;
        for declared in [actual - 10, actual + 10] {
            let mut frame = BytesMut::new();
            let body_len = varint_len(declared) + compressed.len();
            write_varint(&mut frame, body_len as i32);
            write_varint(&mut frame, declared);
            frame.extend_from_slice(&compressed);
            assert!(
                try_parse_packet(&mut frame, Some(0)).is_err(),
                "declared {} of {} accepted",
                declared,
                actual
            );
        }
    }

    #[test]
    fn test_length_varint_overflow_is_fatal() {
        let mut read_buf = BytesMut::from(&[0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x01][..]);
        assert!(try_parse_packet(&mut read_buf, None).is_err());
    }

    #[test]
    fn test_partial_frame_suspends() {
        let frame = build_frame(0x05, &[1, 2, 3, 4], None);
        let mut read_buf = BytesMut::from(&frame[..frame.len() - 2]);
        assert!(try_parse_packet(&mut read_buf, None).unwrap().is_none());
        read_buf.extend_from_slice(&frame[frame.len() - 2..]);
        let (id, data) = try_parse_packet(&mut read_buf, None).unwrap().unwrap();
        assert_eq!(id, 0x05);
        assert_eq!(&data[..], &[1, 2, 3, 4]);
    }
}
