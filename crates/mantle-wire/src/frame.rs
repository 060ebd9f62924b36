use std::io::{self, Read, Write};

use crate::error::WireError;
use crate::header::{HEADER_LEN, MAX_MESSAGE_LEN, MsgHeader, OpCode};
use crate::op_msg::{MsgFlags, OpMsg};

/// One length-delimited message whose body has not been interpreted.
///
/// Proxy paths forward frames as-is, so unknown opcodes survive the trip.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub header: MsgHeader,
    pub body: Vec<u8>,
}

impl Frame {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut header = self.header;
        header.message_length = (HEADER_LEN + self.body.len()) as i32;
        let mut out = Vec::with_capacity(HEADER_LEN + self.body.len());
        out.extend_from_slice(&header.to_bytes());
        out.extend_from_slice(&self.body);
        out
    }

    /// Whether the peer waits for a reply to this message.
    pub fn expects_reply(&self) -> bool {
        match self.header.op_code {
            OpCode::Msg => {
                let flags = self
                    .body
                    .get(..4)
                    .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                    .unwrap_or(0);
                flags & MsgFlags::MORE_TO_COME == 0
            }
            OpCode::Update | OpCode::Insert | OpCode::Delete | OpCode::KillCursors => false,
            _ => true,
        }
    }
}

/// Fills `buf` from `r`, stopping early only at end of stream.
fn read_full(r: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match r.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Reads one complete message.
///
/// The length prefix is checked before anything else is read. A stream
/// that ends before any byte of the header yields
/// [`WireError::ConnectionClosed`]; one that ends mid-message yields
/// [`WireError::UnexpectedEof`].
pub fn read_frame(r: &mut impl Read) -> Result<Frame, WireError> {
    let mut header_bytes = [0u8; HEADER_LEN];
    let n = read_full(r, &mut header_bytes[..4])?;
    if n == 0 {
        return Err(WireError::ConnectionClosed);
    }
    if n < 4 {
        return Err(WireError::UnexpectedEof {
            read: n,
            expected: HEADER_LEN,
        });
    }

    let len = i32::from_le_bytes([header_bytes[0], header_bytes[1], header_bytes[2], header_bytes[3]]);
    if len < HEADER_LEN as i32 || len as i64 > MAX_MESSAGE_LEN as i64 {
        return Err(WireError::malformed(format!("invalid message length {len}")));
    }

    let n = read_full(r, &mut header_bytes[4..])?;
    if n < HEADER_LEN - 4 {
        return Err(WireError::UnexpectedEof {
            read: 4 + n,
            expected: HEADER_LEN,
        });
    }
    let header = MsgHeader::from_bytes(&header_bytes);

    let mut body = vec![0u8; len as usize - HEADER_LEN];
    let n = read_full(r, &mut body)?;
    if n < body.len() {
        return Err(WireError::UnexpectedEof {
            read: HEADER_LEN + n,
            expected: len as usize,
        });
    }
    Ok(Frame { header, body })
}

/// Reads one message and parses it as `OP_MSG`.
pub fn read_message(r: &mut impl Read) -> Result<(MsgHeader, OpMsg), WireError> {
    let frame = read_frame(r)?;
    parse_message(&frame).map(|msg| (frame.header, msg))
}

/// Parses an already-read frame as `OP_MSG`.
pub fn parse_message(frame: &Frame) -> Result<OpMsg, WireError> {
    if frame.header.op_code != OpCode::Msg {
        return Err(WireError::UnsupportedOpCode(frame.header.op_code.as_i32()));
    }
    OpMsg::decode(&frame.body)
}

/// Encodes `msg` under `header` (length and opcode are overwritten) and
/// writes it with a single `write_all`, then flushes.
pub fn write_message(w: &mut impl Write, header: MsgHeader, msg: &OpMsg) -> Result<usize, WireError> {
    let mut out = Vec::with_capacity(256);
    out.extend_from_slice(&[0u8; HEADER_LEN]);
    msg.encode(&mut out)?;
    if out.len() > MAX_MESSAGE_LEN {
        return Err(WireError::malformed(format!(
            "message of {} bytes exceeds limit of {MAX_MESSAGE_LEN}",
            out.len()
        )));
    }

    let header = MsgHeader {
        message_length: out.len() as i32,
        op_code: OpCode::Msg,
        ..header
    };
    out[..HEADER_LEN].copy_from_slice(&header.to_bytes());
    w.write_all(&out)?;
    w.flush()?;
    Ok(out.len())
}

/// Writes a raw frame, flushing afterwards.
pub fn write_frame(w: &mut impl Write, frame: &Frame) -> Result<usize, WireError> {
    let bytes = frame.to_bytes();
    w.write_all(&bytes)?;
    w.flush()?;
    Ok(bytes.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mantle_document::doc;

    fn header(request_id: i32) -> MsgHeader {
        MsgHeader {
            message_length: 0,
            request_id,
            response_to: 0,
            op_code: OpCode::Msg,
        }
    }

    #[test]
    fn write_then_read() {
        let msg = OpMsg::new(doc! { "ping" => 1, "$db" => "admin" });
        let mut buf = Vec::new();
        let written = write_message(&mut buf, header(9), &msg).unwrap();
        assert_eq!(written, buf.len());
        assert_eq!(i32::from_le_bytes(buf[..4].try_into().unwrap()) as usize, buf.len());

        let (h, decoded) = read_message(&mut buf.as_slice()).unwrap();
        assert_eq!(h.request_id, 9);
        assert_eq!(h.op_code, OpCode::Msg);
        assert_eq!(decoded, msg);
    }

    #[test]
    fn empty_stream_is_closed() {
        let mut empty: &[u8] = &[];
        assert!(matches!(read_frame(&mut empty), Err(WireError::ConnectionClosed)));
    }

    #[test]
    fn short_header_is_unexpected_eof() {
        let mut short: &[u8] = &[1, 2, 3];
        assert!(matches!(
            read_frame(&mut short),
            Err(WireError::UnexpectedEof { read: 3, expected: 16 })
        ));
    }

    #[test]
    fn length_bounds_are_enforced() {
        for len in [15_i32, -1, MAX_MESSAGE_LEN as i32 + 1] {
            let mut h = header(1);
            h.message_length = len;
            let bytes = h.to_bytes();
            assert!(matches!(
                read_frame(&mut bytes.as_slice()),
                Err(WireError::MalformedMessage(_))
            ));
        }
    }

    #[test]
    fn length_is_checked_before_the_rest_of_the_header() {
        for len in [0_i32, -1, 8, 64 * 1024 * 1024] {
            let prefix = len.to_le_bytes();
            assert!(
                matches!(read_frame(&mut prefix.as_slice()), Err(WireError::MalformedMessage(_))),
                "length {len}"
            );
        }
    }

    #[test]
    fn header_cut_after_length_is_unexpected_eof() {
        let mut bytes = 32_i32.to_le_bytes().to_vec();
        bytes.extend_from_slice(&[0; 6]);
        assert!(matches!(
            read_frame(&mut bytes.as_slice()),
            Err(WireError::UnexpectedEof { read: 10, expected: 16 })
        ));
    }

    #[test]
    fn more_to_come_suppresses_reply() {
        let msg = OpMsg::new(doc! { "insert" => "c" })
            .with_flags(MsgFlags::default().with(MsgFlags::MORE_TO_COME));
        let mut buf = Vec::new();
        write_message(&mut buf, header(1), &msg).unwrap();
        let frame = read_frame(&mut buf.as_slice()).unwrap();
        assert!(!frame.expects_reply());
        assert!(parse_message(&frame).unwrap().more_to_come());
    }

    #[test]
    fn non_msg_opcodes_are_rejected_by_parse() {
        let frame = Frame {
            header: MsgHeader {
                op_code: OpCode::Query,
                ..header(1)
            },
            body: vec![0; 8],
        };
        assert!(matches!(parse_message(&frame), Err(WireError::UnsupportedOpCode(2004))));
        assert!(frame.expects_reply());
    }
}
