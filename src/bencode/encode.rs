//! Bencode encoder
//!
//! Dictionaries are written in raw key byte order, so the output is canonical
//! no matter how the dictionary was built. Info hashes depend on this.

use bytes::{BufMut, BytesMut};

use crate::bencode::value::Value;

/// Encode a value to its canonical bencoded bytes.
pub fn encode(value: &Value) -> Vec<u8> {
    let mut buf = BytesMut::new();
    encode_value(value, &mut buf);
    buf.to_vec()
}

fn encode_value(value: &Value, buf: &mut BytesMut) {
    match value {
        Value::Integer(i) => {
            buf.put_u8(b'i');
            buf.put_slice(i.to_string().as_bytes());
            buf.put_u8(b'e');
        }
        Value::Bytes(b) => encode_bytes(b, buf),
        Value::List(items) => {
            buf.put_u8(b'l');
            for item in items {
                encode_value(item, buf);
            }
            buf.put_u8(b'e');
        }
        Value::Dict(entries) => {
            buf.put_u8(b'd');
            // BTreeMap<Vec<u8>, _> iterates in byte order
            for (key, value) in entries {
                encode_bytes(key, buf);
                encode_value(value, buf);
            }
            buf.put_u8(b'e');
        }
    }
}

fn encode_bytes(bytes: &[u8], buf: &mut BytesMut) {
    buf.put_slice(bytes.len().to_string().as_bytes());
    buf.put_u8(b':');
    buf.put_slice(bytes);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bencode::decode;

    #[test]
    fn test_encode_scalars() {
        assert_eq!(encode(&Value::Integer(42)), b"i42e");
        assert_eq!(encode(&Value::Integer(-7)), b"i-7e");
        assert_eq!(encode(&Value::string("spam")), b"4:spam");
        assert_eq!(encode(&Value::Bytes(vec![])), b"0:");
    }

    #[test]
    fn test_encode_list() {
        let list = Value::List(vec![Value::Integer(1), Value::string("two")]);
        assert_eq!(encode(&list), b"li1e3:twoe");
    }

    #[test]
    fn test_encode_dict_sorts_keys() {
        let unsorted = Value::dict([
            ("piece length", Value::Integer(10)),
            ("name", Value::string("f")),
            ("length", Value::Integer(10)),
        ]);
        let sorted = Value::dict([
            ("length", Value::Integer(10)),
            ("name", Value::string("f")),
            ("piece length", Value::Integer(10)),
        ]);
        assert_eq!(encode(&unsorted), encode(&sorted));
        assert_eq!(encode(&sorted), b"d6:lengthi10e4:name1:f12:piece lengthi10ee");
    }

    #[test]
    fn test_encode_sorts_by_raw_bytes() {
        // 'Z' (0x5a) sorts before 'a' (0x61); a prefix sorts before its extensions
        let value = Value::dict([
            ("ab", Value::Integer(3)),
            ("a", Value::Integer(2)),
            ("Z", Value::Integer(1)),
        ]);
        assert_eq!(encode(&value), b"d1:Zi1e1:ai2e2:abi3ee");
    }

    #[test]
    fn test_round_trip_programmatic_value() {
        let value = Value::dict([
            ("announce", Value::string("http://x/a")),
            (
                "info",
                Value::dict([
                    ("length", Value::Integer(10)),
                    ("pieces", Value::Bytes((0u8..20).collect())),
                    ("files", Value::List(vec![Value::Integer(-1), Value::List(vec![])])),
                ]),
            ),
        ]);
        assert_eq!(decode(&encode(&value)).unwrap(), value);
    }

    #[test]
    fn test_sorted_source_round_trips_byte_for_byte() {
        let source = b"d8:announce10:http://x/a4:infod6:lengthi10e4:name1:fee";
        assert_eq!(encode(&decode(source).unwrap()), source.to_vec());
    }
}
