use bytes::{BufMut, BytesMut};
use lodestone_protocol_core::{read_varint_slice, write_varint, CodecError};
use thiserror::Error;

/// Total number of sections in a chunk column (y=-64 to y=320).
pub const SECTION_COUNT: usize = 24;
/// Minimum world Y coordinate.
pub const MIN_Y: i32 = -64;
/// Block entries per section.
pub const SECTION_VOLUME: usize = 4096;
/// Biome entries per section (4x4x4 cells).
pub const BIOME_VOLUME: usize = 64;

#[derive(Debug, Error)]
pub enum ChunkDecodeError {
    #[error("chunk payload truncated at offset {0}")]
    Truncated(usize),
    #[error("bad paletted container: {0}")]
    BadContainer(&'static str),
    #[error("no payload strategy matched (heightmaps prefix unrecognized)")]
    NoStrategyMatched,
    #[error("varint: {0}")]
    Codec(#[from] CodecError),
    #[error("heightmaps: {0}")]
    Nbt(#[from] lodestone_nbt::NbtError),
}

type ChunkResult<T> = Result<T, ChunkDecodeError>;

/// One decoded 16x16x16 section: expanded block states and the
/// server's non-air count. Local indexing is `y*256 + z*16 + x`.
#[derive(Clone)]
pub struct ChunkSection {
    pub block_count: i16,
    pub block_states: Vec<i32>,
}

impl ChunkSection {
    pub fn block_state(&self, x: usize, y: usize, z: usize) -> i32 {
        self.block_states[y * 256 + z * 16 + x]
    }
}

/// Decode the opaque body of a chunk-data packet into sections.
///
/// The body starts with the heightmaps tree, whose framing varies
/// between upstream packagings: a named root, a nameless root, or a
/// varint-length-prefixed blob. Each strategy is probed in that order
/// and the first one whose *continuation* (data size + section data)
/// also decodes wins.
pub fn decode_chunk_body(body: &[u8]) -> ChunkResult<Vec<ChunkSection>> {
    let mut last_err = ChunkDecodeError::NoStrategyMatched;

    const STRATEGIES: [fn(&[u8]) -> ChunkResult<usize>; 3] = [
        heightmaps_end_named,
        heightmaps_end_nameless,
        heightmaps_end_prefixed,
    ];
    for strategy in STRATEGIES {
        let data_start = match strategy(body) {
            Ok(offset) => offset,
            Err(e) => {
                last_err = e;
                continue;
            }
        };
        match decode_section_data(body, data_start) {
            Ok(sections) => return Ok(sections),
            Err(e) => last_err = e,
        }
    }

    Err(last_err)
}

fn heightmaps_end_named(body: &[u8]) -> ChunkResult<usize> {
    Ok(lodestone_nbt::skip_root_named(body)?)
}

fn heightmaps_end_nameless(body: &[u8]) -> ChunkResult<usize> {
    Ok(lodestone_nbt::skip_root_nameless(body)?)
}

fn heightmaps_end_prefixed(body: &[u8]) -> ChunkResult<usize> {
    let (len, consumed) = read_varint_slice(body, 0)?;
    if len < 0 {
        return Err(ChunkDecodeError::BadContainer("negative heightmaps length"));
    }
    let end = consumed + len as usize;
    if end > body.len() {
        return Err(ChunkDecodeError::Truncated(consumed));
    }
    Ok(end)
}

/// Continuation after the heightmaps: varint data size, then that many
/// bytes of section data. Sections are read until the slice is
/// exhausted or `SECTION_COUNT` have been read; block entities and
/// lighting after the slice are not the client's business.
fn decode_section_data(body: &[u8], offset: usize) -> ChunkResult<Vec<ChunkSection>> {
    let (data_size, consumed) = read_varint_slice(body, offset)?;
    if data_size < 0 {
        return Err(ChunkDecodeError::BadContainer("negative data size"));
    }
    let data_start = offset + consumed;
    let data_end = data_start + data_size as usize;
    if data_end > body.len() {
        return Err(ChunkDecodeError::Truncated(data_start));
    }

    let data = &body[data_start..data_end];
    let mut sections = Vec::with_capacity(SECTION_COUNT);
    let mut cursor = 0usize;

    while cursor < data.len() && sections.len() < SECTION_COUNT {
        let (section, next) = decode_section(data, cursor)?;
        sections.push(section);
        cursor = next;
    }

    Ok(sections)
}

fn decode_section(data: &[u8], offset: usize) -> ChunkResult<(ChunkSection, usize)> {
    if data.len() < offset + 2 {
        return Err(ChunkDecodeError::Truncated(offset));
    }
    let block_count = i16::from_be_bytes([data[offset], data[offset + 1]]);
    let (block_states, offset) = decode_paletted_container(data, offset + 2, SECTION_VOLUME)?;
    // Biomes are decoded only to advance the cursor.
    let (_biomes, offset) = decode_paletted_container(data, offset, BIOME_VOLUME)?;
    Ok((
        ChunkSection {
            block_count,
            block_states,
        },
        offset,
    ))
}

/// Decode one paletted container, returning the expanded entries and
/// the offset after the container.
///
/// `bits_per_entry == 0` is a single-value container, `1..=8` an
/// indirect palette, `>= 9` direct ids. Entries are packed low-bit
/// first, `64 / bits_per_entry` per word, never spanning words.
pub fn decode_paletted_container(
    data: &[u8],
    offset: usize,
    expected_entries: usize,
) -> ChunkResult<(Vec<i32>, usize)> {
    let bits_per_entry = *data.get(offset).ok_or(ChunkDecodeError::Truncated(offset))?;
    let mut offset = offset + 1;

    if bits_per_entry > 32 {
        return Err(ChunkDecodeError::BadContainer("bits per entry too large"));
    }

    if bits_per_entry == 0 {
        let (value, consumed) = read_varint_slice(data, offset)?;
        offset += consumed;
        let (data_longs, consumed) = read_varint_slice(data, offset)?;
        offset += consumed;
        if data_longs != 0 {
            return Err(ChunkDecodeError::BadContainer(
                "single-value container with data words",
            ));
        }
        return Ok((vec![value; expected_entries], offset));
    }

    let palette: Option<Vec<i32>> = if bits_per_entry <= 8 {
        let (palette_len, consumed) = read_varint_slice(data, offset)?;
        offset += consumed;
        if palette_len < 0 {
            return Err(ChunkDecodeError::BadContainer("negative palette length"));
        }
        let mut palette = Vec::with_capacity(palette_len as usize);
        for _ in 0..palette_len {
            let (id, consumed) = read_varint_slice(data, offset)?;
            offset += consumed;
            palette.push(id);
        }
        Some(palette)
    } else {
        None
    };

    let (long_count, consumed) = read_varint_slice(data, offset)?;
    offset += consumed;
    if long_count < 0 {
        return Err(ChunkDecodeError::BadContainer("negative word count"));
    }
    let words_end = offset + long_count as usize * 8;
    if words_end > data.len() {
        return Err(ChunkDecodeError::Truncated(offset));
    }

    let entries_per_word = 64 / bits_per_entry as usize;
    let mask = (1u64 << bits_per_entry) - 1;
    let mut entries = Vec::with_capacity(expected_entries);

    'words: for word_index in 0..long_count as usize {
        let word_offset = offset + word_index * 8;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&data[word_offset..word_offset + 8]);
        let word = u64::from_be_bytes(raw);

        for slot in 0..entries_per_word {
            if entries.len() == expected_entries {
                break 'words;
            }
            let value = ((word >> (slot * bits_per_entry as usize)) & mask) as i32;
            let state = match &palette {
                // Out-of-range palette indices map to air.
                Some(palette) => palette.get(value as usize).copied().unwrap_or(0),
                None => value,
            };
            entries.push(state);
        }
    }

    if entries.len() != expected_entries {
        return Err(ChunkDecodeError::BadContainer("short container data"));
    }

    Ok((entries, words_end))
}

// === Encoding (tests and tooling; the inverse of the decode above) ===

/// Pack values into 64-bit words, low-bit first, no word spanning.
pub fn pack_entries(values: &[u32], bits_per_entry: u8) -> Vec<u64> {
    let entries_per_word = 64 / bits_per_entry as usize;
    let mask = (1u64 << bits_per_entry) - 1;
    let word_count = values.len().div_ceil(entries_per_word);
    let mut words = vec![0u64; word_count];
    for (i, &value) in values.iter().enumerate() {
        let slot = (i % entries_per_word) * bits_per_entry as usize;
        words[i / entries_per_word] |= (value as u64 & mask) << slot;
    }
    words
}

/// A section in wire form, built from expanded block states. The
/// palette construction mirrors what servers send: single-value when
/// uniform, indirect with at least 4 bits otherwise.
pub struct SectionData {
    pub block_count: i16,
    pub palette: Vec<i32>,
    pub data: Vec<u64>,
    pub bits_per_entry: u8,
}

impl SectionData {
    pub fn single_value(state_id: i32) -> Self {
        Self {
            block_count: if state_id == 0 { 0 } else { SECTION_VOLUME as i16 },
            palette: vec![state_id],
            data: Vec::new(),
            bits_per_entry: 0,
        }
    }

    /// Build from 4096 expanded states, `y*256 + z*16 + x` order.
    pub fn from_blocks(blocks: &[i32]) -> Self {
        assert_eq!(blocks.len(), SECTION_VOLUME);
        let mut palette = Vec::new();
        let mut palette_map = std::collections::HashMap::new();
        let mut indices = vec![0u32; SECTION_VOLUME];
        let mut block_count: i16 = 0;

        for (i, &state_id) in blocks.iter().enumerate() {
            if state_id != 0 {
                block_count += 1;
            }
            let idx = *palette_map.entry(state_id).or_insert_with(|| {
                let idx = palette.len();
                palette.push(state_id);
                idx
            });
            indices[i] = idx as u32;
        }

        if palette.len() == 1 {
            return Self::single_value(palette[0]);
        }

        let bits_per_entry = std::cmp::max(4, (palette.len() as f64).log2().ceil() as u8);
        let data = pack_entries(&indices, bits_per_entry);

        Self {
            block_count,
            palette,
            data,
            bits_per_entry,
        }
    }

    /// Serialize block states plus a single-value plains biome
    /// container, exactly as a chunk-data packet carries them.
    pub fn write_to(&self, buf: &mut BytesMut) {
        buf.put_i16(self.block_count);

        buf.put_u8(self.bits_per_entry);
        if self.bits_per_entry == 0 {
            write_varint(buf, self.palette[0]);
            write_varint(buf, 0); // data array length = 0
        } else {
            if self.bits_per_entry <= 8 {
                write_varint(buf, self.palette.len() as i32);
                for &entry in &self.palette {
                    write_varint(buf, entry);
                }
            }
            write_varint(buf, self.data.len() as i32);
            for &word in &self.data {
                buf.put_u64(word);
            }
        }

        // Biomes: single-value, biome id 0.
        buf.put_u8(0);
        write_varint(buf, 0);
        write_varint(buf, 0);
    }
}

/// Assemble a full chunk-data packet body (heightmaps + sized section
/// data) from wire-form sections. Test servers and tests use this; the
/// live client only decodes.
pub fn encode_chunk_body(sections: &[SectionData], named_heightmaps: bool) -> BytesMut {
    let heightmaps = lodestone_nbt::NbtTag::compound(vec![(
        "MOTION_BLOCKING",
        lodestone_nbt::NbtTag::LongArray(vec![0; 37]),
    )]);

    let mut body = BytesMut::new();
    if named_heightmaps {
        heightmaps.write_named_root("", &mut body);
    } else {
        heightmaps.write_network(&mut body);
    }

    let mut data = BytesMut::new();
    for section in sections {
        section.write_to(&mut data);
    }
    write_varint(&mut body, data.len() as i32);
    body.extend_from_slice(&data);
    body
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_value_container_roundtrip() {
        let mut buf = BytesMut::new();
        SectionData::single_value(9).write_to(&mut buf);
        let (section, _) = decode_section(&buf, 0).unwrap();
        assert_eq!(section.block_count, SECTION_VOLUME as i16);
        assert!(section.block_states.iter().all(|&s| s == 9));
    }

    #[test]
    fn test_indirect_palette_roundtrip() {
        let mut blocks = vec![0i32; SECTION_VOLUME];
        blocks[0] = 1;
        blocks[17] = 9;
        blocks[SECTION_VOLUME - 1] = 5;
        let mut buf = BytesMut::new();
        SectionData::from_blocks(&blocks).write_to(&mut buf);

        let (section, consumed) = decode_section(&buf, 0).unwrap();
        assert_eq!(section.block_states, blocks);
        assert_eq!(section.block_count, 3);
        assert_eq!(consumed, buf.len());
    }

    #[test]
    fn test_container_bijection_across_bit_widths() {
        // Indirect widths: entries are palette indices.
        for bits_per_entry in 1u8..=8 {
            let palette: Vec<i32> = (0..(1 << bits_per_entry)).map(|i| i * 7 + 1).collect();
            let indices: Vec<u32> = (0..SECTION_VOLUME as u32)
                .map(|i| i % (1 << bits_per_entry))
                .collect();

            let mut buf = BytesMut::new();
            buf.put_u8(bits_per_entry);
            write_varint(&mut buf, palette.len() as i32);
            for &id in &palette {
                write_varint(&mut buf, id);
            }
            let words = pack_entries(&indices, bits_per_entry);
            write_varint(&mut buf, words.len() as i32);
            for &word in &words {
                buf.put_u64(word);
            }

            let (entries, end) =
                decode_paletted_container(&buf, 0, SECTION_VOLUME).unwrap();
            assert_eq!(end, buf.len(), "bpe {}", bits_per_entry);
            for (i, &entry) in entries.iter().enumerate() {
                assert_eq!(entry, palette[indices[i] as usize], "bpe {}", bits_per_entry);
            }
        }

        // Direct widths: entries are raw state ids.
        for bits_per_entry in 9u8..=15 {
            let values: Vec<u32> = (0..BIOME_VOLUME as u32)
                .map(|i| (i * 31) % (1 << bits_per_entry))
                .collect();
            let mut buf = BytesMut::new();
            buf.put_u8(bits_per_entry);
            let words = pack_entries(&values, bits_per_entry);
            write_varint(&mut buf, words.len() as i32);
            for &word in &words {
                buf.put_u64(word);
            }

            let (entries, end) = decode_paletted_container(&buf, 0, BIOME_VOLUME).unwrap();
            assert_eq!(end, buf.len());
            let expected: Vec<i32> = values.iter().map(|&v| v as i32).collect();
            assert_eq!(entries, expected, "bpe {}", bits_per_entry);
        }
    }

    #[test]
    fn test_no_entry_crosses_word_boundary() {
        // With 5 bits per entry, 12 entries fit and the top 4 bits of
        // each word stay zero. An all-ones payload must decode to
        // all-31 values, proving no entry straddles into the next word.
        let values = vec![31u32; 24];
        let words = pack_entries(&values, 5);
        assert_eq!(words.len(), 2);
        for word in &words {
            assert_eq!(word >> 60, 0, "spill into dead bits");
        }

        let mut buf = BytesMut::new();
        buf.put_u8(9); // direct, to skip palette handling
        let words9 = pack_entries(&vec![511u32; 14], 9);
        write_varint(&mut buf, words9.len() as i32);
        for &word in &words9 {
            buf.put_u64(word);
        }
        let (entries, _) = decode_paletted_container(&buf, 0, 14).unwrap();
        assert!(entries.iter().all(|&e| e == 511));
    }

    #[test]
    fn test_out_of_range_palette_index_maps_to_air() {
        let mut buf = BytesMut::new();
        buf.put_u8(4);
        write_varint(&mut buf, 2); // palette: [7, 8]
        write_varint(&mut buf, 7);
        write_varint(&mut buf, 8);
        let indices = vec![15u32; 16]; // far past the palette
        let words = pack_entries(&indices, 4);
        write_varint(&mut buf, words.len() as i32);
        for &word in &words {
            buf.put_u64(word);
        }
        let (entries, _) = decode_paletted_container(&buf, 0, 16).unwrap();
        assert!(entries.iter().all(|&e| e == 0));
    }

    #[test]
    fn test_single_value_with_data_words_rejected() {
        let mut buf = BytesMut::new();
        buf.put_u8(0);
        write_varint(&mut buf, 5);
        write_varint(&mut buf, 1); // must be 0
        buf.put_u64(0);
        assert!(decode_paletted_container(&buf, 0, SECTION_VOLUME).is_err());
    }

    #[test]
    fn test_chunk_body_probe_accepts_all_three_prefixes() {
        let sections = vec![SectionData::single_value(1), SectionData::single_value(0)];

        // Named and nameless heightmaps roots.
        for named in [true, false] {
            let body = encode_chunk_body(&sections, named);
            let decoded = decode_chunk_body(&body).unwrap();
            assert_eq!(decoded.len(), 2, "named={}", named);
            assert!(decoded[0].block_states.iter().all(|&s| s == 1));
            assert_eq!(decoded[1].block_count, 0);
        }

        // Varint-prefixed tree blob.
        let nameless = encode_chunk_body(&sections, false);
        let tree_end = lodestone_nbt::skip_root_nameless(&nameless).unwrap();
        let mut prefixed = BytesMut::new();
        write_varint(&mut prefixed, tree_end as i32);
        prefixed.extend_from_slice(&nameless);
        let decoded = decode_chunk_body(&prefixed).unwrap();
        assert_eq!(decoded.len(), 2);
    }

    #[test]
    fn test_chunk_body_garbage_fails_all_strategies() {
        let garbage = [0x42u8, 0x13, 0x37, 0xFF, 0xFF, 0xFF, 0xFF];
        assert!(decode_chunk_body(&garbage).is_err());
    }

    #[test]
    fn test_section_cap_at_24() {
        let sections: Vec<SectionData> =
            (0..30).map(|_| SectionData::single_value(1)).collect();
        let body = encode_chunk_body(&sections, false);
        let decoded = decode_chunk_body(&body).unwrap();
        assert_eq!(decoded.len(), SECTION_COUNT);
    }
}
