//! Message framing: the 16-byte header, `OP_MSG` bodies, and blocking
//! read/write helpers over any `Read`/`Write` stream.

mod error;
mod frame;
mod header;
mod op_msg;

pub use error::WireError;
pub use frame::{Frame, parse_message, read_frame, read_message, write_frame, write_message};
pub use header::{HEADER_LEN, MAX_MESSAGE_LEN, MsgHeader, OpCode};
pub use op_msg::{DocumentSequence, MsgFlags, OpMsg, Section};
