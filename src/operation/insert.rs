//! `Insert`: batches documents under `maxMessageSize`/
//! `maxWriteBatchSize`, sending one `OP_INSERT` per batch and chaining a
//! `getLastError` when the write concern calls for acknowledgment.

use bson::Document;

use super::{full_collection_name, run_get_last_error};
use crate::{
    error::Result,
    options::WriteConcern,
    session::Session,
    selection_criteria::SelectionCriteria,
    wire::{codec, Request},
    Namespace,
};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct InsertResult {
    pub inserted_count: usize,
}

pub struct Insert {
    pub namespace: Namespace,
    pub documents: Vec<Document>,
    pub write_concern: WriteConcern,
}

impl Insert {
    pub fn new(namespace: Namespace, documents: Vec<Document>, write_concern: WriteConcern) -> Self {
        Self {
            namespace,
            documents,
            write_concern,
        }
    }

    pub fn execute(&self, session: &Session) -> Result<InsertResult> {
        let mut conn = session.checkout(&SelectionCriteria::Write)?;
        let full_name = full_collection_name(&self.namespace);

        // The frame header (16 bytes) plus the flags i32 plus the
        // collection-name cstring, mirroring `Request::write_body`'s
        // `Insert` layout.
        let header_overhead = 16 + 4 + full_name.len() + 1;
        let (max_message_size, max_write_batch_size) = conn.limits();
        let batches = codec::split_insert_batches(
            self.documents.clone(),
            header_overhead,
            max_message_size as usize,
            max_write_batch_size as usize,
        )?;

        let mut inserted_count = 0usize;
        for batch in batches {
            let count = batch.len();
            let request = Request::Insert {
                full_collection_name: full_name.clone(),
                documents: batch,
            };
            conn.send(&request)?;
            run_get_last_error(&mut conn, &self.namespace.db, &self.write_concern)?;
            inserted_count += count;
        }

        Ok(InsertResult { inserted_count })
    }
}
