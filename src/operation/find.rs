//! `Find`: an `OP_QUERY` that opens a server-side cursor,
//! iterated afterwards by `Cursor` via `OP_GET_MORE`/`OP_KILL_CURSORS`.

use bson::Document;

use super::full_collection_name;
use crate::{
    cursor::Cursor,
    error::Result,
    selection_criteria::{ReadPreference, SelectionCriteria},
    session::Session,
    wire::{QueryFlags, Request},
    Namespace,
};

/// A single find, built against one namespace. `skip`/`batch_size`/
/// `projection` become `OP_QUERY`'s numberToSkip, numberToReturn, and the
/// optional projection document.
pub struct Find {
    pub namespace: Namespace,
    pub filter: Document,
    pub projection: Option<Document>,
    pub skip: i32,
    pub batch_size: i32,
    pub read_preference: ReadPreference,
}

impl Find {
    pub fn new(namespace: Namespace, filter: Document) -> Self {
        Self {
            namespace,
            filter,
            projection: None,
            skip: 0,
            batch_size: 101,
            read_preference: ReadPreference::Primary,
        }
    }

    pub fn execute(&self, session: &Session) -> Result<Cursor> {
        let criteria = SelectionCriteria::ReadPreference(self.read_preference.clone());
        let pool = session.select_pool(&criteria)?;
        let mut conn = pool.checkout()?;

        // Secondary reads need SLAVE_OK set or the server rejects the
        // query outright; Primary never sets it.
        let mut flags = QueryFlags::empty();
        if !matches!(self.read_preference, ReadPreference::Primary) {
            flags |= QueryFlags::SLAVE_OK;
        }

        let request = Request::Query {
            flags,
            full_collection_name: full_collection_name(&self.namespace),
            number_to_skip: self.skip,
            number_to_return: self.batch_size,
            query: self.filter.clone(),
            return_fields_selector: self.projection.clone(),
        };

        let request_id = conn.send(&request)?;
        let reply = conn.receive(request_id)?;

        if reply.query_failure() {
            let error_doc = reply.documents.into_iter().next().unwrap_or_default();
            return Err(crate::error::ErrorKind::command_failure_from_document(&error_doc)
                .unwrap_or(crate::error::ErrorKind::CommandFailure {
                    code: None,
                    code_name: None,
                    message: "query failure with no error document".to_string(),
                })
                .into());
        }

        // The checked-out connection is dropped (and returned to the
        // pool) here; `Cursor` checks out a fresh one from the same pool
        // for each `getMore`, since it only pins a `serverAddress`, not a
        // specific `Connection`.
        Ok(Cursor::new(
            self.namespace.clone(),
            pool,
            reply.cursor_id,
            self.batch_size,
            reply.documents,
        ))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn new_find_defaults_to_no_skip_and_primary_read_preference() {
        let find = Find::new(Namespace::new("appdb", "widgets"), bson::doc! {});
        assert_eq!(find.skip, 0);
        assert_eq!(find.read_preference, ReadPreference::Primary);
    }
}
