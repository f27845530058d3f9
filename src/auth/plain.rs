//! SASL PLAIN: one round, payload `\0user\0password`
//! base64-encoded under `saslStart`.

use bson::doc;
use stringprep::saslprep;

use super::{authentication_error, run_command};
use crate::{cmap::Connection, error::Result, options::Credential};

pub(crate) fn authenticate(conn: &mut Connection, credential: &Credential) -> Result<()> {
    let username = credential
        .username
        .as_deref()
        .ok_or_else(|| authentication_error(credential, "PLAIN requires a username"))?;
    let password = credential
        .password()
        .map(|p| String::from_utf8_lossy(p).into_owned())
        .ok_or_else(|| authentication_error(credential, "PLAIN requires a password"))?;
    let password = saslprep(&password).map(|s| s.into_owned()).unwrap_or(password);

    let payload = format!("\0{username}\0{password}");
    let reply = run_command(
        conn,
        &credential.source,
        doc! {
            "saslStart": 1,
            "mechanism": "PLAIN",
            "payload": base64::encode(payload),
        },
    )
    .map_err(|e| authentication_error(credential, format!("saslStart failed: {e}")))?;

    match reply.get_bool("done") {
        Ok(true) => Ok(()),
        _ => Err(authentication_error(credential, "server did not complete PLAIN handshake in one round")),
    }
}
