use std::io::{BufReader, BufWriter, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use mantle_document::{Array, Document, Value, doc};
use mantle_wire::{MsgHeader, OpCode, OpMsg, WireError, read_message, write_message};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("wire error: {0}")]
    Wire(#[from] WireError),
    #[error("command failed ({code_name}, code {code}): {message}")]
    Command {
        code: i32,
        code_name: String,
        message: String,
    },
    #[error("unexpected reply: {0}")]
    UnexpectedReply(String),
}

/// A blocking connection speaking `OP_MSG`, one request in flight at a time.
pub struct Client {
    reader: BufReader<TcpStream>,
    writer: BufWriter<TcpStream>,
    next_request_id: i32,
}

impl Client {
    pub fn connect(addr: impl ToSocketAddrs) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        let reader = BufReader::new(stream.try_clone()?);
        let writer = BufWriter::new(stream);
        Ok(Self {
            reader,
            writer,
            next_request_id: 1,
        })
    }

    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<(), ClientError> {
        self.writer.get_ref().set_read_timeout(timeout)?;
        Ok(())
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ClientError> {
        Ok(self.writer.get_ref().local_addr()?)
    }

    /// Closes the write half so the server sees end of stream.
    pub fn shutdown_write(&self) -> Result<(), ClientError> {
        self.writer.get_ref().shutdown(Shutdown::Write)?;
        Ok(())
    }

    fn next_header(&mut self) -> MsgHeader {
        let request_id = self.next_request_id;
        self.next_request_id = self.next_request_id.wrapping_add(1);
        MsgHeader {
            message_length: 0,
            request_id,
            response_to: 0,
            op_code: OpCode::Msg,
        }
    }

    /// Sends `msg` and waits for the reply, checking that it answers this
    /// request.
    pub fn send(&mut self, msg: &OpMsg) -> Result<OpMsg, ClientError> {
        let header = self.next_header();
        write_message(&mut self.writer, header, msg)?;
        let (reply_header, reply) = read_message(&mut self.reader)?;
        if reply_header.response_to != header.request_id {
            return Err(ClientError::UnexpectedReply(format!(
                "reply to {} while waiting for {}",
                reply_header.response_to, header.request_id
            )));
        }
        Ok(reply)
    }

    /// Writes arbitrary bytes, for exercising how the server handles bad input.
    pub fn send_raw(&mut self, bytes: &[u8]) -> Result<(), ClientError> {
        self.writer.write_all(bytes)?;
        self.writer.flush()?;
        Ok(())
    }

    /// Reads the next message, whatever it answers.
    pub fn read_reply(&mut self) -> Result<(MsgHeader, OpMsg), ClientError> {
        Ok(read_message(&mut self.reader)?)
    }

    /// Runs `command` against `db` and returns the reply document as-is,
    /// including error replies.
    pub fn run_command(&mut self, db: &str, mut command: Document) -> Result<Document, ClientError> {
        command.set("$db", db);
        let reply = self.send(&OpMsg::new(command))?;
        Ok(reply.into_body())
    }

    /// Like [`Client::run_command`], but an `ok: 0` reply becomes
    /// [`ClientError::Command`].
    pub fn command(&mut self, db: &str, command: Document) -> Result<Document, ClientError> {
        let reply = self.run_command(db, command)?;
        match reply.get("ok").and_then(Value::as_f64) {
            Some(ok) if ok == 1.0 => Ok(reply),
            _ => Err(ClientError::Command {
                code: match reply.get("code") {
                    Some(Value::Int32(code)) => *code,
                    _ => 0,
                },
                code_name: reply.get_str("codeName").unwrap_or_default().to_string(),
                message: reply.get_str("errmsg").unwrap_or_default().to_string(),
            }),
        }
    }

    // ── Convenience wrappers ────────────────────────────────────

    pub fn ping(&mut self) -> Result<(), ClientError> {
        self.command("admin", doc! { "ping" => 1 }).map(|_| ())
    }

    pub fn create_collection(&mut self, db: &str, collection: &str) -> Result<(), ClientError> {
        self.command(db, doc! { "create" => collection }).map(|_| ())
    }

    pub fn drop_collection(&mut self, db: &str, collection: &str) -> Result<(), ClientError> {
        self.command(db, doc! { "drop" => collection }).map(|_| ())
    }

    pub fn insert(&mut self, db: &str, collection: &str, docs: Vec<Document>) -> Result<i32, ClientError> {
        let reply = self.command(db, doc! { "insert" => collection, "documents" => docs })?;
        match reply.get("n") {
            Some(Value::Int32(n)) => Ok(*n),
            other => Err(ClientError::UnexpectedReply(format!("insert n: {other:?}"))),
        }
    }

    /// Runs `find` and returns the first batch.
    pub fn find(&mut self, db: &str, collection: &str, filter: Document) -> Result<Vec<Document>, ClientError> {
        let reply = self.command(db, doc! { "find" => collection, "filter" => filter })?;
        first_batch(&reply)
    }

    pub fn count(&mut self, db: &str, collection: &str, query: Document) -> Result<i32, ClientError> {
        let reply = self.command(db, doc! { "count" => collection, "query" => query })?;
        match reply.get("n") {
            Some(Value::Int32(n)) => Ok(*n),
            other => Err(ClientError::UnexpectedReply(format!("count n: {other:?}"))),
        }
    }
}

/// Extracts `cursor.firstBatch` from a `find` reply.
pub fn first_batch(reply: &Document) -> Result<Vec<Document>, ClientError> {
    let batch: &Array = reply
        .get_document("cursor")
        .and_then(|c| c.get_array("firstBatch"))
        .ok_or_else(|| ClientError::UnexpectedReply("missing cursor.firstBatch".into()))?;
    batch
        .iter()
        .map(|v| {
            v.as_document()
                .cloned()
                .ok_or_else(|| ClientError::UnexpectedReply(format!("batch element {v:?}")))
        })
        .collect()
}
