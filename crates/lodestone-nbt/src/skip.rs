//! Forward-only skipping over serialized NBT.
//!
//! Heightmaps arrive at the front of every chunk packet and the client
//! never looks inside them; the skipper walks the tag structure and
//! returns the offset past it without allocating a tree.

use thiserror::Error;

use crate::{
    TAG_BYTE, TAG_BYTE_ARRAY, TAG_COMPOUND, TAG_DOUBLE, TAG_END, TAG_FLOAT, TAG_INT,
    TAG_INT_ARRAY, TAG_LIST, TAG_LONG, TAG_LONG_ARRAY, TAG_SHORT, TAG_STRING,
};

#[derive(Debug, Error)]
pub enum NbtError {
    #[error("unexpected end of NBT data at offset {0}")]
    UnexpectedEof(usize),
    #[error("unknown NBT tag type {0} at offset {1}")]
    UnknownTag(u8, usize),
    #[error("negative length in NBT data at offset {0}")]
    NegativeLength(usize),
}

pub type NbtResult<T> = Result<T, NbtError>;

/// Skip a named root tag (`type, u16-prefixed name, payload`).
/// Returns the offset of the first byte after the root.
pub fn skip_root_named(data: &[u8]) -> NbtResult<usize> {
    let tag = read_u8(data, 0)?;
    if tag == TAG_END {
        return Ok(1);
    }
    let offset = skip_name(data, 1)?;
    skip_payload(data, offset, tag)
}

/// Skip a nameless root tag (`type, payload` — network NBT since
/// 1.20.2). Returns the offset of the first byte after the root.
pub fn skip_root_nameless(data: &[u8]) -> NbtResult<usize> {
    let tag = read_u8(data, 0)?;
    if tag == TAG_END {
        return Ok(1);
    }
    skip_payload(data, 1, tag)
}

/// Best-effort rendering of an NBT text component as plain text:
/// concatenates every string payload in document order. Used for
/// disconnect reasons, where losing formatting is acceptable.
pub fn extract_text(data: &[u8]) -> String {
    let mut out = String::new();
    let tag = match read_u8(data, 0) {
        Ok(t) => t,
        Err(_) => return out,
    };
    // Probe nameless first (the network form), then named.
    if collect_strings(data, 1, tag, &mut out).is_err() {
        out.clear();
        if let Ok(offset) = skip_name(data, 1) {
            let _ = collect_strings(data, offset, tag, &mut out);
        }
    }
    out
}

fn skip_payload(data: &[u8], offset: usize, tag: u8) -> NbtResult<usize> {
    match tag {
        TAG_BYTE => ensure(data, offset, 1),
        TAG_SHORT => ensure(data, offset, 2),
        TAG_INT | TAG_FLOAT => ensure(data, offset, 4),
        TAG_LONG | TAG_DOUBLE => ensure(data, offset, 8),
        TAG_BYTE_ARRAY => {
            let (len, offset) = read_i32_len(data, offset)?;
            ensure(data, offset, len)
        }
        TAG_STRING => {
            let len = read_u16(data, offset)? as usize;
            ensure(data, offset + 2, len)
        }
        TAG_LIST => {
            let element_tag = read_u8(data, offset)?;
            let (len, mut offset) = read_i32_len(data, offset + 1)?;
            for _ in 0..len {
                offset = skip_payload(data, offset, element_tag)?;
            }
            Ok(offset)
        }
        TAG_COMPOUND => {
            let mut offset = offset;
            loop {
                let entry_tag = read_u8(data, offset)?;
                offset += 1;
                if entry_tag == TAG_END {
                    return Ok(offset);
                }
                offset = skip_name(data, offset)?;
                offset = skip_payload(data, offset, entry_tag)?;
            }
        }
        TAG_INT_ARRAY => {
            let (len, offset) = read_i32_len(data, offset)?;
            ensure(data, offset, len * 4)
        }
        TAG_LONG_ARRAY => {
            let (len, offset) = read_i32_len(data, offset)?;
            ensure(data, offset, len * 8)
        }
        other => Err(NbtError::UnknownTag(other, offset)),
    }
}

/// Like `skip_payload`, appending every string payload encountered.
fn collect_strings(data: &[u8], offset: usize, tag: u8, out: &mut String) -> NbtResult<usize> {
    match tag {
        TAG_STRING => {
            let len = read_u16(data, offset)? as usize;
            let end = ensure(data, offset + 2, len)?;
            out.push_str(&String::from_utf8_lossy(&data[offset + 2..end]));
            Ok(end)
        }
        TAG_LIST => {
            let element_tag = read_u8(data, offset)?;
            let (len, mut offset) = read_i32_len(data, offset + 1)?;
            for _ in 0..len {
                offset = collect_strings(data, offset, element_tag, out)?;
            }
            Ok(offset)
        }
        TAG_COMPOUND => {
            let mut offset = offset;
            loop {
                let entry_tag = read_u8(data, offset)?;
                offset += 1;
                if entry_tag == TAG_END {
                    return Ok(offset);
                }
                offset = skip_name(data, offset)?;
                offset = collect_strings(data, offset, entry_tag, out)?;
            }
        }
        _ => skip_payload(data, offset, tag),
    }
}

fn skip_name(data: &[u8], offset: usize) -> NbtResult<usize> {
    let len = read_u16(data, offset)? as usize;
    ensure(data, offset + 2, len)
}

fn read_u8(data: &[u8], offset: usize) -> NbtResult<u8> {
    data.get(offset)
        .copied()
        .ok_or(NbtError::UnexpectedEof(offset))
}

fn read_u16(data: &[u8], offset: usize) -> NbtResult<u16> {
    let hi = read_u8(data, offset)?;
    let lo = read_u8(data, offset + 1)?;
    Ok(u16::from_be_bytes([hi, lo]))
}

fn read_i32_len(data: &[u8], offset: usize) -> NbtResult<(usize, usize)> {
    if data.len() < offset + 4 {
        return Err(NbtError::UnexpectedEof(offset));
    }
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&data[offset..offset + 4]);
    let len = i32::from_be_bytes(raw);
    if len < 0 {
        return Err(NbtError::NegativeLength(offset));
    }
    Ok((len as usize, offset + 4))
}

/// Bounds-check `len` bytes at `offset`, returning the end offset.
fn ensure(data: &[u8], offset: usize, len: usize) -> NbtResult<usize> {
    let end = offset
        .checked_add(len)
        .ok_or(NbtError::UnexpectedEof(offset))?;
    if end > data.len() {
        return Err(NbtError::UnexpectedEof(offset));
    }
    Ok(end)
}
