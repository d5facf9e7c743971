//! Bencode decoder
//!
//! Recursive descent over a byte slice with an explicit cursor, so callers
//! can learn how many bytes one value occupied.

use tracing::trace;

use crate::bencode::value::{Dict, Value};
use crate::error::{Result, TorrentError};

/// Maximum container nesting accepted from untrusted input
pub const MAX_DEPTH: usize = 64;

/// Decode exactly one value; trailing bytes are an error.
pub fn decode(data: &[u8]) -> Result<Value> {
    let (value, consumed) = decode_prefix(data)?;
    if consumed != data.len() {
        return Err(TorrentError::malformed_at(
            format!("{} trailing bytes after value", data.len() - consumed),
            consumed,
        ));
    }
    Ok(value)
}

/// Decode the first value in `data` and return it with the number of bytes it used.
pub fn decode_prefix(data: &[u8]) -> Result<(Value, usize)> {
    let mut pos = 0;
    let value = decode_value(data, &mut pos, 0)?;
    trace!("Decoded {} from {} of {} bytes", value.kind(), pos, data.len());
    Ok((value, pos))
}

fn decode_value(data: &[u8], pos: &mut usize, depth: usize) -> Result<Value> {
    if depth > MAX_DEPTH {
        return Err(TorrentError::malformed_at("nesting too deep", *pos));
    }

    match data.get(*pos) {
        None => Err(TorrentError::malformed_at("unexpected end of input", *pos)),
        Some(b'i') => decode_integer(data, pos),
        Some(b'l') => decode_list(data, pos, depth),
        Some(b'd') => decode_dict(data, pos, depth),
        Some(b'0'..=b'9') => decode_bytes(data, pos),
        Some(&c) => Err(TorrentError::malformed_at(
            format!("unexpected byte 0x{:02x}", c),
            *pos,
        )),
    }
}

fn decode_integer(data: &[u8], pos: &mut usize) -> Result<Value> {
    let start = *pos + 1;
    let end = data[start..]
        .iter()
        .position(|&b| b == b'e')
        .map(|p| start + p)
        .ok_or_else(|| TorrentError::malformed_at("integer missing terminating 'e'", *pos))?;

    let digits = std::str::from_utf8(&data[start..end])
        .map_err(|_| TorrentError::malformed_at("integer is not ASCII", start))?;

    let unsigned = digits.strip_prefix('-').unwrap_or(digits);
    if unsigned.is_empty() || !unsigned.bytes().all(|b| b.is_ascii_digit()) {
        return Err(TorrentError::malformed_at(format!("invalid integer '{}'", digits), start));
    }
    if (unsigned.starts_with('0') && unsigned.len() > 1) || digits == "-0" {
        return Err(TorrentError::malformed_at(format!("non-canonical integer '{}'", digits), start));
    }

    let value: i64 = digits
        .parse()
        .map_err(|_| TorrentError::malformed_at(format!("integer out of range '{}'", digits), start))?;

    *pos = end + 1;
    Ok(Value::Integer(value))
}

fn decode_bytes(data: &[u8], pos: &mut usize) -> Result<Value> {
    let start = *pos;
    let colon = data[start..]
        .iter()
        .position(|&b| b == b':')
        .map(|p| start + p)
        .ok_or_else(|| TorrentError::malformed_at("string length missing ':'", start))?;

    let len_str = std::str::from_utf8(&data[start..colon])
        .map_err(|_| TorrentError::malformed_at("string length is not ASCII", start))?;
    let length: usize = len_str
        .parse()
        .map_err(|_| TorrentError::malformed_at(format!("invalid string length '{}'", len_str), start))?;

    let body = colon + 1;
    let end = body
        .checked_add(length)
        .filter(|&end| end <= data.len())
        .ok_or_else(|| {
            TorrentError::malformed_at(
                format!("string of length {} runs past end of input", length),
                start,
            )
        })?;

    *pos = end;
    Ok(Value::Bytes(data[body..end].to_vec()))
}

fn decode_list(data: &[u8], pos: &mut usize, depth: usize) -> Result<Value> {
    let open = *pos;
    *pos += 1;
    let mut list = Vec::new();

    loop {
        match data.get(*pos) {
            None => return Err(TorrentError::malformed_at("unterminated list", open)),
            Some(b'e') => break,
            Some(_) => list.push(decode_value(data, pos, depth + 1)?),
        }
    }

    *pos += 1;
    Ok(Value::List(list))
}

fn decode_dict(data: &[u8], pos: &mut usize, depth: usize) -> Result<Value> {
    let open = *pos;
    *pos += 1;
    let mut dict = Dict::new();

    loop {
        match data.get(*pos) {
            None => return Err(TorrentError::malformed_at("unterminated dictionary", open)),
            Some(b'e') => break,
            Some(_) => {
                let key_at = *pos;
                let key = match decode_value(data, pos, depth + 1)? {
                    Value::Bytes(b) => b,
                    other => {
                        return Err(TorrentError::malformed_at(
                            format!("dictionary key must be a byte string, got {}", other.kind()),
                            key_at,
                        ))
                    }
                };
                let value = decode_value(data, pos, depth + 1)?;
                if dict.insert(key, value).is_some() {
                    return Err(TorrentError::malformed_at("duplicate dictionary key", key_at));
                }
            }
        }
    }

    *pos += 1;
    Ok(Value::Dict(dict))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_malformed(result: Result<Value>) -> bool {
        matches!(result, Err(TorrentError::MalformedInput { .. }))
    }

    #[test]
    fn test_decode_string() {
        assert_eq!(decode(b"5:hello").unwrap(), Value::string("hello"));
        assert_eq!(decode(b"0:").unwrap(), Value::Bytes(vec![]));
    }

    #[test]
    fn test_decode_binary_string() {
        let data = [b'3', b':', 0xff, 0x00, 0xc0];
        assert_eq!(decode(&data).unwrap(), Value::Bytes(vec![0xff, 0x00, 0xc0]));
    }

    #[test]
    fn test_decode_integers() {
        assert_eq!(decode(b"i52e").unwrap(), Value::Integer(52));
        assert_eq!(decode(b"i-52e").unwrap(), Value::Integer(-52));
        assert_eq!(decode(b"i0e").unwrap(), Value::Integer(0));
        assert_eq!(decode(b"i4294967300e").unwrap(), Value::Integer(4294967300));
    }

    #[test]
    fn test_decode_list() {
        let value = decode(b"l5:helloi52ee").unwrap();
        assert_eq!(value, Value::List(vec![Value::string("hello"), Value::Integer(52)]));
        assert_eq!(decode(b"le").unwrap(), Value::List(vec![]));
    }

    #[test]
    fn test_decode_nested() {
        let value = decode(b"d3:foo3:bar5:helloi52e4:listll1:aeee").unwrap();
        assert_eq!(value.get(b"foo"), Some(&Value::string("bar")));
        assert_eq!(value.get(b"hello"), Some(&Value::Integer(52)));
        assert_eq!(
            value.get(b"list"),
            Some(&Value::List(vec![Value::List(vec![Value::string("a")])]))
        );
    }

    #[test]
    fn test_decode_prefix_reports_consumed() {
        let data = b"d8:msg_typei1e5:piecei0eeREST";
        let (value, consumed) = decode_prefix(data).unwrap();
        assert_eq!(consumed, data.len() - 4);
        assert_eq!(&data[consumed..], b"REST");
        assert_eq!(value.get(b"msg_type"), Some(&Value::Integer(1)));
    }

    #[test]
    fn test_decode_rejects_trailing_bytes() {
        assert!(is_malformed(decode(b"i1ei2e")));
    }

    #[test]
    fn test_decode_malformed() {
        assert!(is_malformed(decode(b"5hello")));
        assert!(is_malformed(decode(b"i52")));
        assert!(is_malformed(decode(b"l5:hello")));
        assert!(is_malformed(decode(b"d3:foo3:bar")));
        assert!(is_malformed(decode(b"x")));
        assert!(is_malformed(decode(b"")));
        assert!(is_malformed(decode(b"10:short")));
    }

    #[test]
    fn test_decode_non_canonical_integers() {
        assert!(is_malformed(decode(b"i-0e")));
        assert!(is_malformed(decode(b"i03e")));
        assert!(is_malformed(decode(b"ie")));
        assert!(is_malformed(decode(b"i1x2e")));
        assert!(is_malformed(decode(b"i99999999999999999999e")));
    }

    #[test]
    fn test_decode_dict_key_errors() {
        assert!(is_malformed(decode(b"di1ei2ee")));
        assert!(is_malformed(decode(b"d1:ai1e1:ai2ee")));
    }

    #[test]
    fn test_decode_depth_limit() {
        let mut deep = vec![b'l'; MAX_DEPTH + 2];
        deep.extend(vec![b'e'; MAX_DEPTH + 2]);
        assert!(is_malformed(decode(&deep)));

        let mut ok = vec![b'l'; MAX_DEPTH];
        ok.extend(vec![b'e'; MAX_DEPTH]);
        assert!(decode(&ok).is_ok());
    }

    #[test]
    fn test_unsorted_source_is_accepted() {
        let value = decode(b"d1:bi2e1:ai1ee").unwrap();
        let keys: Vec<_> = value.as_dict().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec()]);
    }
}
