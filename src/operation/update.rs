//! `Update`: a single `OP_UPDATE` carrying the upsert/multi
//! flags byte, followed by `getLastError` when acknowledged.

use bson::Document;

use super::{full_collection_name, run_get_last_error};
use crate::{
    error::Result,
    options::WriteConcern,
    session::Session,
    selection_criteria::SelectionCriteria,
    wire::{Request, UpdateFlags},
    Namespace,
};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UpdateResult {
    pub matched_count: i64,
    pub updated_existing: bool,
}

pub struct Update {
    pub namespace: Namespace,
    pub selector: Document,
    pub update: Document,
    pub upsert: bool,
    pub multi: bool,
    pub write_concern: WriteConcern,
}

impl Update {
    pub fn execute(&self, session: &Session) -> Result<UpdateResult> {
        let mut conn = session.checkout(&SelectionCriteria::Write)?;

        let mut flags = UpdateFlags::empty();
        if self.upsert {
            flags |= UpdateFlags::UPSERT;
        }
        if self.multi {
            flags |= UpdateFlags::MULTI_UPDATE;
        }

        let request = Request::Update {
            full_collection_name: full_collection_name(&self.namespace),
            flags,
            selector: self.selector.clone(),
            update: self.update.clone(),
        };
        conn.send(&request)?;

        let reply = run_get_last_error(&mut conn, &self.namespace.db, &self.write_concern)?;
        Ok(match reply {
            Some(doc) => UpdateResult {
                matched_count: doc.get_i64("n").unwrap_or(0),
                updated_existing: doc.get_bool("updatedExisting").unwrap_or(false),
            },
            None => UpdateResult::default(),
        })
    }
}
