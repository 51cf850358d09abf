//! Minimal blocking client session for the Rserve QAP1 wire protocol.
//!
//! Only the subset the bridge needs is implemented: the ID-string
//! handshake, `CMD_eval`, and decoding of numeric results. Anything else
//! that comes back is surfaced as [`Rexp::Other`].

use std::io::{Read, Write};
use std::net::TcpStream;

use super::RserveError;

const CMD_EVAL: u32 = 0x003;
const CMD_RESP: u32 = 0x10000;
const RESP_OK: u32 = CMD_RESP | 0x0001;

const DT_STRING: u8 = 4;
const DT_SEXP: u8 = 10;

const XT_NULL: u8 = 0;
const XT_INT: u8 = 1;
const XT_DOUBLE: u8 = 2;
const XT_ARRAY_INT: u8 = 32;
const XT_ARRAY_DOUBLE: u8 = 33;

const TYPE_MASK: u8 = 0x3f;
const LARGE_FLAG: u8 = 0x40;
const ATTR_FLAG: u8 = 0x80;

// Refuse to buffer responses beyond this; a numeric vector result is
// nowhere near it.
const MAX_RESPONSE: u64 = 1 << 30;

/// A value decoded from an Rserve eval response.
#[derive(Debug, Clone, PartialEq)]
pub enum Rexp {
    Null,
    Doubles(Vec<f64>),
    Ints(Vec<i32>),
    /// An expression type the bridge does not decode (the raw type byte).
    Other(u8),
}

impl Rexp {
    /// The result as a vector of doubles, converting integer vectors.
    /// `None` for null or non-numeric expressions.
    pub fn into_doubles(self) -> Option<Vec<f64>> {
        match self {
            Rexp::Doubles(v) => Some(v),
            Rexp::Ints(v) => Some(v.into_iter().map(f64::from).collect()),
            Rexp::Null | Rexp::Other(_) => None,
        }
    }
}

/// One open session against an Rserve endpoint. Holds the connection for a
/// single evaluation and is dropped afterwards; there is no pooling.
pub struct RserveConnection {
    stream: TcpStream,
}

impl RserveConnection {
    /// Connect and consume the 32-byte server ID string.
    pub fn open(addr: &str) -> Result<Self, RserveError> {
        let stream = TcpStream::connect(addr).map_err(|source| RserveError::Connect {
            addr: addr.to_string(),
            source,
        })?;
        let mut conn = Self { stream };

        let mut id = [0u8; 32];
        conn.stream.read_exact(&mut id)?;
        if &id[0..4] != b"Rsrv" {
            return Err(RserveError::Handshake(
                "server did not identify itself as Rserve".into(),
            ));
        }
        if &id[8..12] != b"QAP1" {
            return Err(RserveError::Handshake(format!(
                "unsupported transfer protocol {:?}",
                String::from_utf8_lossy(&id[8..12])
            )));
        }
        Ok(conn)
    }

    /// Submit one script for evaluation and decode the result.
    pub fn eval(&mut self, script: &str) -> Result<Rexp, RserveError> {
        let request = eval_request_bytes(script)?;
        self.stream.write_all(&request)?;

        let mut head = [0u8; 16];
        self.stream.read_exact(&mut head)?;
        let cmd = u32::from_le_bytes(head[0..4].try_into().unwrap());
        let len = u64::from(u32::from_le_bytes(head[4..8].try_into().unwrap()))
            | u64::from(u32::from_le_bytes(head[12..16].try_into().unwrap())) << 32;

        if cmd & CMD_RESP == 0 {
            return Err(RserveError::Protocol(format!(
                "unexpected message 0x{cmd:x} where a response was expected"
            )));
        }
        if len > MAX_RESPONSE {
            return Err(RserveError::Protocol(format!("response too large ({len} bytes)")));
        }

        let mut body = vec![0u8; len as usize];
        self.stream.read_exact(&mut body)?;

        if cmd != RESP_OK {
            // Upper bits of the command carry the server status code
            return Err(RserveError::Eval { status: (cmd >> 24) & 0x7f });
        }
        decode_eval_body(&body)
    }
}

/// Frame one `CMD_eval` request: a 16-byte header followed by a DT_STRING
/// parameter holding the NUL-terminated script, padded to 4 bytes.
fn eval_request_bytes(script: &str) -> Result<Vec<u8>, RserveError> {
    let mut content = script.as_bytes().to_vec();
    content.push(0);
    while content.len() % 4 != 0 {
        content.push(0);
    }
    if content.len() >= 1 << 24 {
        // Would need the DT_LARGE form, which no sane script reaches
        return Err(RserveError::Protocol("script too large to frame".into()));
    }

    let payload_len = (4 + content.len()) as u32;
    let mut buf = Vec::with_capacity(16 + payload_len as usize);
    buf.extend_from_slice(&CMD_EVAL.to_le_bytes());
    buf.extend_from_slice(&payload_len.to_le_bytes());
    buf.extend_from_slice(&0u32.to_le_bytes()); // data offset
    buf.extend_from_slice(&0u32.to_le_bytes()); // high bits of length

    let str_len = (content.len() as u32).to_le_bytes();
    buf.push(DT_STRING);
    buf.extend_from_slice(&str_len[0..3]);
    buf.extend_from_slice(&content);
    Ok(buf)
}

/// Header of a QAP1 data item: raw type byte, content length, header size.
fn item_header(buf: &[u8]) -> Result<(u8, usize, usize), RserveError> {
    if buf.is_empty() {
        return Err(RserveError::Protocol("truncated data item".into()));
    }
    let ty = buf[0];
    if ty & LARGE_FLAG != 0 {
        if buf.len() < 8 {
            return Err(RserveError::Protocol("truncated large data item".into()));
        }
        let mut len: u64 = 0;
        for (i, b) in buf[1..8].iter().enumerate() {
            len |= u64::from(*b) << (8 * i);
        }
        if len > MAX_RESPONSE {
            return Err(RserveError::Protocol(format!("data item too large ({len} bytes)")));
        }
        Ok((ty, len as usize, 8))
    } else {
        if buf.len() < 4 {
            return Err(RserveError::Protocol("truncated data item".into()));
        }
        let len = usize::from(buf[1]) | usize::from(buf[2]) << 8 | usize::from(buf[3]) << 16;
        Ok((ty, len, 4))
    }
}

/// Decode an OK eval response body: one DT_SEXP item wrapping the result.
fn decode_eval_body(body: &[u8]) -> Result<Rexp, RserveError> {
    let (ty, len, header) = item_header(body)?;
    if ty & TYPE_MASK != DT_SEXP {
        return Err(RserveError::Protocol(format!(
            "expected SEXP payload, got data type {}",
            ty & TYPE_MASK
        )));
    }
    let content = body
        .get(header..header + len)
        .ok_or_else(|| RserveError::Protocol("SEXP payload shorter than declared".into()))?;
    parse_sexp(content)
}

fn parse_sexp(buf: &[u8]) -> Result<Rexp, RserveError> {
    let (ty, len, header) = item_header(buf)?;
    let mut content = buf
        .get(header..header + len)
        .ok_or_else(|| RserveError::Protocol("SEXP shorter than declared".into()))?;

    // An attribute SEXP (names, dims, ...) precedes the value; skip it.
    if ty & ATTR_FLAG != 0 {
        let (_, alen, aheader) = item_header(content)?;
        content = content
            .get(aheader + alen..)
            .ok_or_else(|| RserveError::Protocol("attribute SEXP shorter than declared".into()))?;
    }

    match ty & TYPE_MASK {
        XT_NULL => Ok(Rexp::Null),
        XT_ARRAY_DOUBLE => {
            let values = content
                .chunks_exact(8)
                .map(|c| f64::from_le_bytes(c.try_into().unwrap()))
                .collect();
            Ok(Rexp::Doubles(values))
        }
        XT_ARRAY_INT => {
            let values = content
                .chunks_exact(4)
                .map(|c| i32::from_le_bytes(c.try_into().unwrap()))
                .collect();
            Ok(Rexp::Ints(values))
        }
        XT_DOUBLE => {
            if content.len() < 8 {
                return Err(RserveError::Protocol("truncated double scalar".into()));
            }
            Ok(Rexp::Doubles(vec![f64::from_le_bytes(content[0..8].try_into().unwrap())]))
        }
        XT_INT => {
            if content.len() < 4 {
                return Err(RserveError::Protocol("truncated int scalar".into()));
            }
            Ok(Rexp::Ints(vec![i32::from_le_bytes(content[0..4].try_into().unwrap())]))
        }
        other => Ok(Rexp::Other(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sexp_item(ty: u8, content: &[u8]) -> Vec<u8> {
        let mut buf = vec![ty];
        let len = (content.len() as u32).to_le_bytes();
        buf.extend_from_slice(&len[0..3]);
        buf.extend_from_slice(content);
        buf
    }

    #[test]
    fn eval_request_is_padded_and_framed() {
        let buf = eval_request_bytes("1+1").unwrap();
        assert_eq!(u32::from_le_bytes(buf[0..4].try_into().unwrap()), CMD_EVAL);
        // "1+1\0" happens to be exactly one 4-byte unit
        assert_eq!(u32::from_le_bytes(buf[4..8].try_into().unwrap()), 8);
        assert_eq!(buf[16], DT_STRING);
        assert_eq!(&buf[20..24], b"1+1\0");
        assert_eq!(buf.len() % 4, 0);

        let longer = eval_request_bytes("mean(data)").unwrap();
        assert_eq!(longer.len() % 4, 0);
    }

    #[test]
    fn decodes_double_array() {
        let mut doubles = Vec::new();
        doubles.extend_from_slice(&2.0f64.to_le_bytes());
        doubles.extend_from_slice(&3.5f64.to_le_bytes());
        let body = sexp_item(DT_SEXP, &sexp_item(XT_ARRAY_DOUBLE, &doubles));

        let rexp = decode_eval_body(&body).unwrap();
        assert_eq!(rexp, Rexp::Doubles(vec![2.0, 3.5]));
    }

    #[test]
    fn decodes_int_array_as_doubles() {
        let mut ints = Vec::new();
        ints.extend_from_slice(&7i32.to_le_bytes());
        ints.extend_from_slice(&(-1i32).to_le_bytes());
        let body = sexp_item(DT_SEXP, &sexp_item(XT_ARRAY_INT, &ints));

        let rexp = decode_eval_body(&body).unwrap();
        assert_eq!(rexp.into_doubles(), Some(vec![7.0, -1.0]));
    }

    #[test]
    fn skips_attribute_sexp() {
        // names attribute ahead of the values, as R produces for named vectors
        let mut inner = sexp_item(21, b"ig\0\0"); // XT_LIST_TAG, opaque to us
        inner.extend_from_slice(&4.25f64.to_le_bytes());
        let body = sexp_item(DT_SEXP, &sexp_item(XT_ARRAY_DOUBLE | ATTR_FLAG, &inner));

        let rexp = decode_eval_body(&body).unwrap();
        assert_eq!(rexp, Rexp::Doubles(vec![4.25]));
    }

    #[test]
    fn null_and_unknown_results_are_not_numeric() {
        let null_body = sexp_item(DT_SEXP, &sexp_item(XT_NULL, &[]));
        assert_eq!(decode_eval_body(&null_body).unwrap().into_doubles(), None);

        let str_body = sexp_item(DT_SEXP, &sexp_item(34, b"abc\0"));
        assert_eq!(decode_eval_body(&str_body).unwrap(), Rexp::Other(34));
    }

    #[test]
    fn truncated_payload_is_a_protocol_error() {
        let mut body = sexp_item(DT_SEXP, &sexp_item(XT_ARRAY_DOUBLE, &2.0f64.to_le_bytes()));
        body.truncate(body.len() - 4);
        assert!(decode_eval_body(&body).is_err());
    }
}
