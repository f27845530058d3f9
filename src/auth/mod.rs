//! Authentication handshakes.
//!
//! Each mechanism runs over a freshly opened `Connection`, before that
//! connection is ever offered to the pool — failure closes the connection
//! and raises a typed `Authentication` error rather than letting the pool
//! cache credentials against a socket that never proved them.

mod gssapi;
mod mongodb_cr;
mod plain;
mod x509;

use bson::Document;

use crate::{
    cmap::Connection,
    error::{ErrorKind, Result},
    options::{AuthMechanism, Credential},
    wire::{QueryFlags, Request},
};

/// Runs the handshake for `credential` against `conn`. On failure, the
/// caller is expected to discard the connection — the pool must never
/// cache an unauthenticated connection against a credential that requires
/// one.
pub(crate) fn authenticate(conn: &mut Connection, credential: &Credential) -> Result<()> {
    match credential.mechanism.resolve() {
        AuthMechanism::MongoCr | AuthMechanism::Default => mongodb_cr::authenticate(conn, credential),
        AuthMechanism::Plain => plain::authenticate(conn, credential),
        AuthMechanism::X509 => x509::authenticate(conn, credential),
        AuthMechanism::GssApi => gssapi::authenticate(conn, credential),
    }
}

/// Sends `command` as an `OP_QUERY` against `<source>.$cmd` and returns the
/// single reply document, the same framing `FindAndModify` and other
/// administrative commands use.
pub(crate) fn run_command(conn: &mut Connection, source: &str, command: Document) -> Result<Document> {
    let request = Request::Query {
        flags: QueryFlags::empty(),
        full_collection_name: format!("{source}.$cmd"),
        number_to_skip: 0,
        number_to_return: -1,
        query: command,
        return_fields_selector: None,
    };
    let request_id = conn.send(&request)?;
    let reply = conn.receive(request_id)?;

    let doc = reply.documents.into_iter().next().ok_or_else(|| {
        ErrorKind::Protocol {
            message: "command reply carried no documents".to_string(),
        }
    })?;

    if let Some(failure) = ErrorKind::command_failure_from_document(&doc) {
        return Err(failure.into());
    }
    Ok(doc)
}

pub(crate) fn authentication_error(credential: &Credential, message: impl Into<String>) -> crate::Error {
    ErrorKind::Authentication {
        user: credential.username.clone(),
        source: credential.source.clone(),
        message: message.into(),
    }
    .into()
}
