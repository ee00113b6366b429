use bytes::{BufMut, BytesMut};

/// NBT tag type IDs.
pub const TAG_END: u8 = 0;
pub const TAG_BYTE: u8 = 1;
pub const TAG_SHORT: u8 = 2;
pub const TAG_INT: u8 = 3;
pub const TAG_LONG: u8 = 4;
pub const TAG_FLOAT: u8 = 5;
pub const TAG_DOUBLE: u8 = 6;
pub const TAG_BYTE_ARRAY: u8 = 7;
pub const TAG_STRING: u8 = 8;
pub const TAG_LIST: u8 = 9;
pub const TAG_COMPOUND: u8 = 10;
pub const TAG_INT_ARRAY: u8 = 11;
pub const TAG_LONG_ARRAY: u8 = 12;

/// A tag tree in the forward (write) direction.
///
/// Only the shapes the client ever fabricates exist here: the
/// heightmap-style compound of long arrays and chat-style text
/// components, as test servers and payload builders need them. The
/// wire read path goes through the offset skipper and never builds a
/// tree; the full 13-tag table lives there.
#[derive(Debug, Clone, PartialEq)]
pub enum NbtTag {
    Int(i32),
    Long(i64),
    Double(f64),
    String(String),
    List(Vec<NbtTag>),
    Compound(Vec<(String, NbtTag)>),
    LongArray(Vec<i64>),
}

impl NbtTag {
    /// Compound from borrowed names, the common construction in tests.
    pub fn compound(entries: Vec<(&str, NbtTag)>) -> NbtTag {
        NbtTag::Compound(
            entries
                .into_iter()
                .map(|(name, tag)| (name.to_string(), tag))
                .collect(),
        )
    }

    fn type_id(&self) -> u8 {
        match self {
            NbtTag::Int(_) => TAG_INT,
            NbtTag::Long(_) => TAG_LONG,
            NbtTag::Double(_) => TAG_DOUBLE,
            NbtTag::String(_) => TAG_STRING,
            NbtTag::List(_) => TAG_LIST,
            NbtTag::Compound(_) => TAG_COMPOUND,
            NbtTag::LongArray(_) => TAG_LONG_ARRAY,
        }
    }

    /// Nameless root form: type byte, then the body (network NBT
    /// since 1.20.2).
    pub fn write_network(&self, buf: &mut BytesMut) {
        buf.put_u8(self.type_id());
        self.write_body(buf);
    }

    /// Named root form: type byte, u16-prefixed name, then the body.
    pub fn write_named_root(&self, name: &str, buf: &mut BytesMut) {
        buf.put_u8(self.type_id());
        put_name(buf, name);
        self.write_body(buf);
    }

    fn write_body(&self, buf: &mut BytesMut) {
        match self {
            NbtTag::Int(v) => buf.put_i32(*v),
            NbtTag::Long(v) => buf.put_i64(*v),
            NbtTag::Double(v) => buf.put_f64(*v),
            NbtTag::String(v) => put_name(buf, v),
            NbtTag::List(items) => {
                let element = items.first().map_or(TAG_END, NbtTag::type_id);
                buf.put_u8(element);
                buf.put_i32(items.len() as i32);
                for item in items {
                    item.write_body(buf);
                }
            }
            NbtTag::Compound(entries) => {
                for (name, tag) in entries {
                    buf.put_u8(tag.type_id());
                    put_name(buf, name);
                    tag.write_body(buf);
                }
                buf.put_u8(TAG_END);
            }
            NbtTag::LongArray(values) => {
                buf.put_i32(values.len() as i32);
                for v in values {
                    buf.put_i64(*v);
                }
            }
        }
    }
}

fn put_name(buf: &mut BytesMut, s: &str) {
    buf.put_u16(s.len() as u16);
    buf.put_slice(s.as_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_root_byte_layout() {
        let mut buf = BytesMut::new();
        NbtTag::compound(vec![("y", NbtTag::Int(7))]).write_network(&mut buf);
        assert_eq!(
            buf.to_vec(),
            vec![
                TAG_COMPOUND,
                TAG_INT, 0x00, 0x01, b'y', // entry header
                0x00, 0x00, 0x00, 0x07, // payload
                TAG_END,
            ]
        );
    }

    #[test]
    fn test_named_root_carries_name_prefix() {
        let mut named = BytesMut::new();
        let mut nameless = BytesMut::new();
        let tag = NbtTag::LongArray(vec![3]);
        tag.write_named_root("hm", &mut named);
        tag.write_network(&mut nameless);

        assert_eq!(&named[..4], &[TAG_LONG_ARRAY, 0x00, 0x02, b'h']);
        assert_eq!(named.len(), nameless.len() + 4); // u16 len + "hm"
        assert_eq!(&named[5..], &nameless[1..]);
    }

    #[test]
    fn test_empty_list_header() {
        let mut buf = BytesMut::new();
        NbtTag::List(vec![]).write_body(&mut buf);
        // Element type falls back to TAG_END with a zero length.
        assert_eq!(buf.to_vec(), vec![TAG_END, 0, 0, 0, 0]);
    }

    #[test]
    fn test_list_header_uses_element_type() {
        let mut buf = BytesMut::new();
        NbtTag::List(vec![NbtTag::Double(0.5), NbtTag::Double(1.5)]).write_body(&mut buf);
        assert_eq!(buf[0], TAG_DOUBLE);
        assert_eq!(buf.len(), 1 + 4 + 2 * 8);
    }
}
