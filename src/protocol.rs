//! Binary wire protocol.
//!
//! Every request starts with a 5-byte header, little-endian throughout:
//!
//! ```text
//! Offset  Field    Type   Description
//! 0       CMD      u8     operation code
//! 1       META     u32    context-dependent integer (key, N, name length)
//! 5       PAYLOAD  bytes  command-determined (vector floats or db name)
//! ```
//!
//! | cmd | name        | meta       | payload                | response                     |
//! |-----|-------------|------------|------------------------|------------------------------|
//! | 1   | INSERT      | key        | dim × 4 bytes          | `'1'` / `'0'`                |
//! | 2   | SEARCH      | —          | dim × 4 bytes          | i32 key (−1 = empty)         |
//! | 3   | DELETE      | key        | —                      | `'1'` / `'0'`                |
//! | 4   | SELECT_DB   | name len   | name + u32 dim         | `'1'`                        |
//! | 5   | UPDATE      | key        | dim × 4 bytes          | `'1'` / `'0'`                |
//! | 6   | INSERT_AUTO | —          | dim × 4 bytes          | u64 key (0 = failure)        |
//! | 7   | SEARCH_N    | N          | dim × 4 bytes          | u32 count + count × i32 keys |
//!
//! META carries only the low 32 bits of a key; the engine itself works
//! with full u64 keys. Auto-assigned ids start at 1, so a 0 in the
//! INSERT_AUTO response can only mean the insert failed.

pub const CMD_INSERT: u8 = 1;
pub const CMD_SEARCH: u8 = 2;
pub const CMD_DELETE: u8 = 3;
pub const CMD_SELECT_DB: u8 = 4;
pub const CMD_UPDATE: u8 = 5;
pub const CMD_INSERT_AUTO: u8 = 6;
pub const CMD_SEARCH_N: u8 = 7;

/// Byte length of the fixed request header.
pub const REQUEST_HEADER_LEN: usize = 5;

/// Upper bound on database name length in SELECT_DB.
pub const MAX_NAME_LEN: usize = 128;

/// Success / failure acknowledgement bytes.
pub const ACK_OK: u8 = b'1';
pub const ACK_FAIL: u8 = b'0';

/// Decoded request header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestHeader {
    pub cmd: u8,
    pub meta: u32,
}

impl RequestHeader {
    pub fn decode(bytes: &[u8; REQUEST_HEADER_LEN]) -> Self {
        Self {
            cmd: bytes[0],
            meta: u32::from_le_bytes(bytes[1..5].try_into().unwrap()),
        }
    }

    pub fn encode(&self) -> [u8; REQUEST_HEADER_LEN] {
        let mut out = [0u8; REQUEST_HEADER_LEN];
        out[0] = self.cmd;
        out[1..5].copy_from_slice(&self.meta.to_le_bytes());
        out
    }
}

/// Decodes a vector payload of little-endian f32s.
pub fn decode_vector(payload: &[u8]) -> Vec<f32> {
    payload
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes(chunk.try_into().unwrap()))
        .collect()
}

/// Encodes a vector as the wire expects it.
pub fn encode_vector(values: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * 4);
    for v in values {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}
