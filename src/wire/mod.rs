//! Wire-protocol framing: opcodes, request/reply messages, the BSON codec,
//! and pooled I/O buffers.

pub(crate) mod buffer;
pub(crate) mod codec;
pub(crate) mod message;
pub(crate) mod opcode;

pub(crate) use buffer::{BufferPool, GLOBAL_BUFFER_POOL};
pub(crate) use message::{Reply, Request, RequestId};
pub(crate) use opcode::{DeleteFlags, QueryFlags, UpdateFlags};
