//! `RunCommand`: a thin escape hatch for administrative
//! commands — `{ping: 1}`, a caller-driven `{isMaster: 1}`, `{buildInfo: 1}`
//! — that don't warrant their own operation type. Reuses the same
//! `OP_QUERY`-on-`$cmd` framing `FindAndModify` and the auth handshake
//! already use.

use bson::Document;

use crate::{error::Result, session::Session, selection_criteria::SelectionCriteria};

pub struct RunCommand {
    pub db: String,
    pub command: Document,
    pub selection_criteria: SelectionCriteria,
}

impl RunCommand {
    /// Runs `command` against `db`, selecting a server for a write
    /// (default) unless `selection_criteria` asks for a specific read
    /// preference — most administrative commands (`ping`, `buildInfo`)
    /// are read-like and safe against any server type, so callers are
    /// free to relax this.
    pub fn new(db: impl Into<String>, command: Document) -> Self {
        Self {
            db: db.into(),
            command,
            selection_criteria: SelectionCriteria::Write,
        }
    }

    pub fn with_selection_criteria(mut self, criteria: SelectionCriteria) -> Self {
        self.selection_criteria = criteria;
        self
    }

    pub fn execute(&self, session: &Session) -> Result<Document> {
        let mut conn = session.checkout(&self.selection_criteria)?;
        crate::auth::run_command(&mut conn, &self.db, self.command.clone())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn new_defaults_to_a_writable_server() {
        let cmd = RunCommand::new("admin", bson::doc! { "ping": 1 });
        assert!(cmd.selection_criteria.is_write());
    }
}
