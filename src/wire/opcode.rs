//! The legacy opcodes this driver speaks.

/// Numeric opcode tag carried in every frame's header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum OpCode {
    Reply,
    Update,
    Insert,
    Query,
    GetMore,
    Delete,
    KillCursors,
}

impl OpCode {
    pub(crate) fn code(self) -> i32 {
        match self {
            OpCode::Reply => 1,
            OpCode::Update => 2001,
            OpCode::Insert => 2002,
            OpCode::Query => 2004,
            OpCode::GetMore => 2005,
            OpCode::Delete => 2006,
            OpCode::KillCursors => 2007,
        }
    }

    pub(crate) fn from_code(code: i32) -> Option<OpCode> {
        match code {
            1 => Some(OpCode::Reply),
            2001 => Some(OpCode::Update),
            2002 => Some(OpCode::Insert),
            2004 => Some(OpCode::Query),
            2005 => Some(OpCode::GetMore),
            2006 => Some(OpCode::Delete),
            2007 => Some(OpCode::KillCursors),
            _ => None,
        }
    }
}

bitflags::bitflags! {
    /// OP_UPDATE's flag byte: upsert and multi-update.
    pub(crate) struct UpdateFlags: i32 {
        const UPSERT = 1 << 0;
        const MULTI_UPDATE = 1 << 1;
    }
}

bitflags::bitflags! {
    pub(crate) struct DeleteFlags: i32 {
        const SINGLE_REMOVE = 1 << 0;
    }
}

bitflags::bitflags! {
    pub(crate) struct QueryFlags: i32 {
        const TAILABLE_CURSOR = 1 << 1;
        const SLAVE_OK = 1 << 2;
        const NO_CURSOR_TIMEOUT = 1 << 4;
        const AWAIT_DATA = 1 << 5;
        const EXHAUST = 1 << 6;
    }
}

bitflags::bitflags! {
    /// OP_REPLY's `responseFlags`.
    pub(crate) struct ReplyFlags: i32 {
        const CURSOR_NOT_FOUND = 1 << 0;
        const QUERY_FAILURE = 1 << 1;
        const SHARD_CONFIG_STALE = 1 << 2;
        const AWAIT_CAPABLE = 1 << 3;
    }
}
