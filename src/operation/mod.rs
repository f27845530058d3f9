//! Typed operations executed against a [`crate::session::Session`]: insert,
//! update, delete, find, find-and-modify, and administrative commands.
//!
//! Laid out one operation per file with a `pub(crate) use` re-export list.
//! Each operation is a concrete struct with its own `execute` rather than a
//! shared trait abstraction — the legacy OP_INSERT/OP_UPDATE/OP_DELETE/
//! OP_QUERY opcodes this core speaks don't share enough shape with each
//! other to make a `build`/`handle_response` trait worthwhile.

mod delete;
mod find;
mod find_and_modify;
mod insert;
mod run_command;
mod update;

pub use delete::{Delete, DeleteResult};
pub use find::Find;
pub use find_and_modify::{
    FindAndModify, FindAndModifyResult, FindAndRemove, FindAndReplace, FindAndUpdate,
};
pub use insert::{Insert, InsertResult};
pub use run_command::RunCommand;
pub use update::{Update, UpdateResult};

use bson::Document;

use crate::{cmap::Connection, error::{ErrorKind, Result}, options::WriteConcern};

/// Chains a `getLastError` onto `conn` when `write_concern` calls for
/// acknowledgment, classifying its reply against the error taxonomy. Shared by
/// every write operation (Insert/Update/Delete) so the wtimeout/duplicate-
/// key/plain-failure rules are applied identically everywhere. Returns the
/// raw reply (for callers that need e.g. `n`/`updatedExisting`) or `None`
/// for an unacknowledged write, which never sends `getLastError` at all.
fn run_get_last_error(
    conn: &mut Connection,
    db: &str,
    write_concern: &WriteConcern,
) -> Result<Option<Document>> {
    if !write_concern.is_acknowledged() {
        return Ok(None);
    }

    let command = write_concern.to_get_last_error_command();
    let doc = crate::auth::run_command(conn, db, command)?;

    match ErrorKind::write_concern_error_from_get_last_error(&doc) {
        Some(kind) => Err(kind.into()),
        None => Ok(Some(doc)),
    }
}

/// Builds the `full_collection_name` an OP_* frame expects: `db.coll`.
fn full_collection_name(namespace: &crate::Namespace) -> String {
    namespace.to_string()
}
