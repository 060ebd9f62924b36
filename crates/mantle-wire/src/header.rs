use std::fmt;

/// Size of the fixed message header in bytes.
pub const HEADER_LEN: usize = 16;

/// Largest message, header included, that will be read or written.
pub const MAX_MESSAGE_LEN: usize = 48_000_000;

/// Operation code selecting the wire-level meaning of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpCode {
    Reply,
    Update,
    Insert,
    Query,
    GetMore,
    Delete,
    KillCursors,
    Compressed,
    Msg,
    Other(i32),
}

impl OpCode {
    pub fn from_i32(code: i32) -> Self {
        match code {
            1 => OpCode::Reply,
            2001 => OpCode::Update,
            2002 => OpCode::Insert,
            2004 => OpCode::Query,
            2005 => OpCode::GetMore,
            2006 => OpCode::Delete,
            2007 => OpCode::KillCursors,
            2012 => OpCode::Compressed,
            2013 => OpCode::Msg,
            other => OpCode::Other(other),
        }
    }

    pub fn as_i32(self) -> i32 {
        match self {
            OpCode::Reply => 1,
            OpCode::Update => 2001,
            OpCode::Insert => 2002,
            OpCode::Query => 2004,
            OpCode::GetMore => 2005,
            OpCode::Delete => 2006,
            OpCode::KillCursors => 2007,
            OpCode::Compressed => 2012,
            OpCode::Msg => 2013,
            OpCode::Other(code) => code,
        }
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpCode::Reply => f.write_str("OP_REPLY"),
            OpCode::Update => f.write_str("OP_UPDATE"),
            OpCode::Insert => f.write_str("OP_INSERT"),
            OpCode::Query => f.write_str("OP_QUERY"),
            OpCode::GetMore => f.write_str("OP_GET_MORE"),
            OpCode::Delete => f.write_str("OP_DELETE"),
            OpCode::KillCursors => f.write_str("OP_KILL_CURSORS"),
            OpCode::Compressed => f.write_str("OP_COMPRESSED"),
            OpCode::Msg => f.write_str("OP_MSG"),
            OpCode::Other(code) => write!(f, "OP_UNKNOWN({code})"),
        }
    }
}

/// Fixed-size prefix of every message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MsgHeader {
    /// Total message length including this header.
    pub message_length: i32,
    pub request_id: i32,
    pub response_to: i32,
    pub op_code: OpCode,
}

impl MsgHeader {
    /// Header for a reply to `request`. The length is filled in on write.
    pub fn reply_to(request: &MsgHeader, request_id: i32) -> Self {
        Self {
            message_length: 0,
            request_id,
            response_to: request.request_id,
            op_code: OpCode::Msg,
        }
    }

    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0..4].copy_from_slice(&self.message_length.to_le_bytes());
        out[4..8].copy_from_slice(&self.request_id.to_le_bytes());
        out[8..12].copy_from_slice(&self.response_to.to_le_bytes());
        out[12..16].copy_from_slice(&self.op_code.as_i32().to_le_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8; HEADER_LEN]) -> Self {
        let field = |i: usize| i32::from_le_bytes([bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]]);
        Self {
            message_length: field(0),
            request_id: field(4),
            response_to: field(8),
            op_code: OpCode::from_i32(field(12)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_bytes_are_little_endian() {
        let header = MsgHeader {
            message_length: 0x0102_0304,
            request_id: 7,
            response_to: -1,
            op_code: OpCode::Msg,
        };
        let bytes = header.to_bytes();
        assert_eq!(bytes[..4], [4, 3, 2, 1]);
        assert_eq!(bytes[8..12], [0xff; 4]);
        assert_eq!(bytes[12..], 2013_i32.to_le_bytes());
        assert_eq!(MsgHeader::from_bytes(&bytes), header);
    }

    #[test]
    fn unknown_opcodes_survive() {
        assert_eq!(OpCode::from_i32(4242), OpCode::Other(4242));
        assert_eq!(OpCode::Other(4242).as_i32(), 4242);
        assert_eq!(OpCode::from_i32(2004), OpCode::Query);
    }
}
