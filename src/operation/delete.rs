//! `Delete`: a single `OP_DELETE` carrying the
//! single-remove flag byte, followed by `getLastError` when acknowledged.

use bson::Document;

use super::{full_collection_name, run_get_last_error};
use crate::{
    error::Result,
    options::WriteConcern,
    session::Session,
    selection_criteria::SelectionCriteria,
    wire::{DeleteFlags, Request},
    Namespace,
};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DeleteResult {
    pub deleted_count: i64,
}

pub struct Delete {
    pub namespace: Namespace,
    pub selector: Document,
    pub single_remove: bool,
    pub write_concern: WriteConcern,
}

impl Delete {
    pub fn execute(&self, session: &Session) -> Result<DeleteResult> {
        let mut conn = session.checkout(&SelectionCriteria::Write)?;

        let mut flags = DeleteFlags::empty();
        if self.single_remove {
            flags |= DeleteFlags::SINGLE_REMOVE;
        }

        let request = Request::Delete {
            full_collection_name: full_collection_name(&self.namespace),
            flags,
            selector: self.selector.clone(),
        };
        conn.send(&request)?;

        let reply = run_get_last_error(&mut conn, &self.namespace.db, &self.write_concern)?;
        Ok(DeleteResult {
            deleted_count: reply.map(|doc| doc.get_i64("n").unwrap_or(0)).unwrap_or(0),
        })
    }
}
