//! MONGODB-X509: the TLS handshake already supplied the
//! credential, so this is a single opaque `authenticate` command.

use bson::doc;

use super::{authentication_error, run_command};
use crate::{cmap::Connection, error::Result, options::Credential};

pub(crate) fn authenticate(conn: &mut Connection, credential: &Credential) -> Result<()> {
    let mut command = doc! {
        "authenticate": 1,
        "mechanism": "MONGODB-X509",
    };
    if let Some(username) = &credential.username {
        command.insert("user", username);
    }

    let reply = run_command(conn, &credential.source, command)
        .map_err(|e| authentication_error(credential, format!("X509 authenticate failed: {e}")))?;

    match reply.get_f64("ok").or_else(|_| reply.get_i32("ok").map(|o| o as f64)) {
        Ok(ok) if ok == 1.0 => Ok(()),
        _ => Err(authentication_error(credential, "server rejected X509 credentials")),
    }
}
