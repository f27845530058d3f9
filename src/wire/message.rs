//! Frame header, per-opcode request bodies, and `OP_REPLY` parsing.
//!
//! Every frame is pushed onto a `BufStream` as little-endian bytes using
//! `byteorder`, matching the wire's fixed `{length, requestId, responseTo,
//! opCode, body}` layout.

use std::io::{self, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use bson::Document;

use super::opcode::{DeleteFlags, OpCode, QueryFlags, ReplyFlags, UpdateFlags};
use crate::error::{ErrorKind, Result};

/// Monotonically increasing per-connection request identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestId(pub(crate) i32);

impl RequestId {
    pub(crate) fn value(self) -> i32 {
        self.0
    }
}

const HEADER_LEN: i32 = 16;

struct Header {
    length: i32,
    request_id: i32,
    response_to: i32,
    op_code: i32,
}

impl Header {
    fn write(&self, w: &mut impl Write) -> io::Result<()> {
        w.write_i32::<LittleEndian>(self.length)?;
        w.write_i32::<LittleEndian>(self.request_id)?;
        w.write_i32::<LittleEndian>(self.response_to)?;
        w.write_i32::<LittleEndian>(self.op_code)
    }

    fn read(r: &mut impl Read) -> io::Result<Header> {
        Ok(Header {
            length: r.read_i32::<LittleEndian>()?,
            request_id: r.read_i32::<LittleEndian>()?,
            response_to: r.read_i32::<LittleEndian>()?,
            op_code: r.read_i32::<LittleEndian>()?,
        })
    }
}

/// A fully framed request body, ready to be written after a `Header`.
pub(crate) enum Request {
    Query {
        flags: QueryFlags,
        full_collection_name: String,
        number_to_skip: i32,
        number_to_return: i32,
        query: Document,
        return_fields_selector: Option<Document>,
    },
    Insert {
        full_collection_name: String,
        documents: Vec<Document>,
    },
    Update {
        full_collection_name: String,
        flags: UpdateFlags,
        selector: Document,
        update: Document,
    },
    Delete {
        full_collection_name: String,
        flags: DeleteFlags,
        selector: Document,
    },
    GetMore {
        full_collection_name: String,
        number_to_return: i32,
        cursor_id: i64,
    },
    KillCursors {
        cursor_ids: Vec<i64>,
    },
}

impl Request {
    fn op_code(&self) -> OpCode {
        match self {
            Request::Query { .. } => OpCode::Query,
            Request::Insert { .. } => OpCode::Insert,
            Request::Update { .. } => OpCode::Update,
            Request::Delete { .. } => OpCode::Delete,
            Request::GetMore { .. } => OpCode::GetMore,
            Request::KillCursors { .. } => OpCode::KillCursors,
        }
    }

    fn write_body(&self, w: &mut impl Write) -> Result<()> {
        match self {
            Request::Query {
                flags,
                full_collection_name,
                number_to_skip,
                number_to_return,
                query,
                return_fields_selector,
            } => {
                w.write_i32::<LittleEndian>(flags.bits())?;
                write_cstring(w, full_collection_name)?;
                w.write_i32::<LittleEndian>(*number_to_skip)?;
                w.write_i32::<LittleEndian>(*number_to_return)?;
                query.to_writer(&mut *w)?;
                if let Some(selector) = return_fields_selector {
                    selector.to_writer(&mut *w)?;
                }
            }
            Request::Insert {
                full_collection_name,
                documents,
            } => {
                // ContinueOnError is never set: a mid-batch failure is
                // treated as fatal to that batch.
                w.write_i32::<LittleEndian>(0)?;
                write_cstring(w, full_collection_name)?;
                for doc in documents {
                    doc.to_writer(&mut *w)?;
                }
            }
            Request::Update {
                full_collection_name,
                flags,
                selector,
                update,
            } => {
                w.write_i32::<LittleEndian>(0)?; // reserved
                write_cstring(w, full_collection_name)?;
                w.write_i32::<LittleEndian>(flags.bits())?;
                selector.to_writer(&mut *w)?;
                update.to_writer(&mut *w)?;
            }
            Request::Delete {
                full_collection_name,
                flags,
                selector,
            } => {
                w.write_i32::<LittleEndian>(0)?; // reserved
                write_cstring(w, full_collection_name)?;
                w.write_i32::<LittleEndian>(flags.bits())?;
                selector.to_writer(&mut *w)?;
            }
            Request::GetMore {
                full_collection_name,
                number_to_return,
                cursor_id,
            } => {
                w.write_i32::<LittleEndian>(0)?; // reserved
                write_cstring(w, full_collection_name)?;
                w.write_i32::<LittleEndian>(*number_to_return)?;
                w.write_i64::<LittleEndian>(*cursor_id)?;
            }
            Request::KillCursors { cursor_ids } => {
                w.write_i32::<LittleEndian>(0)?; // reserved
                w.write_i32::<LittleEndian>(cursor_ids.len() as i32)?;
                for id in cursor_ids {
                    w.write_i64::<LittleEndian>(*id)?;
                }
            }
        }
        Ok(())
    }

    /// Writes `{length, requestId, responseTo:0, opCode, body}` to `w` and
    /// returns the `requestId` that was stamped into the header, so the
    /// caller can match it against the eventual reply.
    ///
    /// `scratch` is a reusable body buffer drawn from the connection's
    /// `BufferPool` — framing a request needs to know the body's encoded
    /// length before the header can be written, so the body is built up in
    /// `scratch` first and then copied after the header.
    pub(crate) fn write(&self, w: &mut impl Write, request_id: RequestId, scratch: &mut Vec<u8>) -> Result<()> {
        scratch.clear();
        self.write_body(scratch)?;

        let header = Header {
            length: HEADER_LEN + scratch.len() as i32,
            request_id: request_id.value(),
            response_to: 0,
            op_code: self.op_code().code(),
        };
        header.write(w)?;
        w.write_all(scratch)?;
        w.flush()?;
        Ok(())
    }
}

fn write_cstring(w: &mut impl Write, s: &str) -> io::Result<()> {
    w.write_all(s.as_bytes())?;
    w.write_all(&[0])
}

/// A decoded `OP_REPLY`, correlated to the request that produced it.
#[derive(Debug)]
pub(crate) struct Reply {
    pub(crate) response_to: i32,
    pub(crate) flags: ReplyFlags,
    pub(crate) cursor_id: i64,
    pub(crate) starting_from: i32,
    pub(crate) documents: Vec<Document>,
}

impl Reply {
    pub(crate) fn cursor_not_found(&self) -> bool {
        self.flags.contains(ReplyFlags::CURSOR_NOT_FOUND)
    }

    pub(crate) fn query_failure(&self) -> bool {
        self.flags.contains(ReplyFlags::QUERY_FAILURE)
    }

    /// Reads one frame and decodes it as an `OP_REPLY`.
    /// Any other opcode, or a frame whose `responseTo` doesn't match
    /// `expected_response_to`, is a `ProtocolError` — the single
    /// in-flight-per-connection guarantee means this should never happen
    /// in normal operation.
    pub(crate) fn read(r: &mut impl Read, expected_response_to: RequestId) -> Result<Reply> {
        let header = Header::read(r)?;
        if OpCode::from_code(header.op_code) != Some(OpCode::Reply) {
            return Err(ErrorKind::Protocol {
                message: format!("expected OP_REPLY, got opcode {}", header.op_code),
            }
            .into());
        }
        if header.response_to != expected_response_to.value() {
            return Err(ErrorKind::Protocol {
                message: format!(
                    "reply responseTo {} did not match outstanding request {}",
                    header.response_to,
                    expected_response_to.value()
                ),
            }
            .into());
        }

        let flags = ReplyFlags::from_bits_truncate(r.read_i32::<LittleEndian>()?);
        let cursor_id = r.read_i64::<LittleEndian>()?;
        let starting_from = r.read_i32::<LittleEndian>()?;
        let number_returned = r.read_i32::<LittleEndian>()?;

        let mut documents = Vec::with_capacity(number_returned.max(0) as usize);
        for _ in 0..number_returned {
            documents.push(Document::from_reader(&mut *r)?);
        }

        Ok(Reply {
            response_to: header.response_to,
            flags,
            cursor_id,
            starting_from,
            documents,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use bson::doc;

    #[test]
    fn query_request_round_trips_through_a_reply_shaped_frame() {
        let request = Request::Query {
            flags: QueryFlags::SLAVE_OK,
            full_collection_name: "appdb.widgets".to_string(),
            number_to_skip: 0,
            number_to_return: 100,
            query: doc! { "x": 1 },
            return_fields_selector: None,
        };
        let mut buf = Vec::new();
        let mut scratch = Vec::new();
        request.write(&mut buf, RequestId(7), &mut scratch).unwrap();

        // Header length field must match the actual frame length.
        let len = i32::from_le_bytes(buf[0..4].try_into().unwrap());
        assert_eq!(len as usize, buf.len());
        let request_id = i32::from_le_bytes(buf[4..8].try_into().unwrap());
        assert_eq!(request_id, 7);
        let op_code = i32::from_le_bytes(buf[12..16].try_into().unwrap());
        assert_eq!(op_code, OpCode::Query.code());
    }

    #[test]
    fn reply_rejects_mismatched_response_to() {
        let mut buf = Vec::new();
        let header = Header {
            length: HEADER_LEN + 20,
            request_id: 99,
            response_to: 5,
            op_code: OpCode::Reply.code(),
        };
        header.write(&mut buf).unwrap();
        buf.write_i32::<LittleEndian>(0).unwrap();
        buf.write_i64::<LittleEndian>(0).unwrap();
        buf.write_i32::<LittleEndian>(0).unwrap();
        buf.write_i32::<LittleEndian>(0).unwrap();

        let err = Reply::read(&mut buf.as_slice(), RequestId(6)).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Protocol { .. }));
    }

    #[test]
    fn reply_decodes_cursor_not_found_flag() {
        let mut buf = Vec::new();
        let header = Header {
            length: HEADER_LEN + 20,
            request_id: 1,
            response_to: 6,
            op_code: OpCode::Reply.code(),
        };
        header.write(&mut buf).unwrap();
        buf.write_i32::<LittleEndian>(ReplyFlags::CURSOR_NOT_FOUND.bits()).unwrap();
        buf.write_i64::<LittleEndian>(42).unwrap();
        buf.write_i32::<LittleEndian>(0).unwrap();
        buf.write_i32::<LittleEndian>(0).unwrap();

        let reply = Reply::read(&mut buf.as_slice(), RequestId(6)).unwrap();
        assert!(reply.cursor_not_found());
        assert_eq!(reply.cursor_id, 42);
        assert!(reply.documents.is_empty());
    }
}
