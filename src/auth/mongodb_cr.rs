//! MongoCR challenge-response: `getnonce` then
//! `md5(nonce + username + md5(username + ":mongo:" + password))`.

use bson::doc;
use md5::{Digest, Md5};
use stringprep::saslprep;

use super::{authentication_error, run_command};
use crate::{cmap::Connection, error::Result, options::Credential};

fn hex_md5(input: &[u8]) -> String {
    hex::encode(Md5::digest(input))
}

pub(crate) fn authenticate(conn: &mut Connection, credential: &Credential) -> Result<()> {
    let username = credential
        .username
        .as_deref()
        .ok_or_else(|| authentication_error(credential, "MongoCR requires a username"))?;

    let nonce_reply = run_command(conn, &credential.source, doc! { "getnonce": 1 })
        .map_err(|e| authentication_error(credential, format!("getnonce failed: {e}")))?;
    let nonce = nonce_reply
        .get_str("nonce")
        .map_err(|_| authentication_error(credential, "getnonce reply missing nonce"))?;

    let password = credential
        .password()
        .map(|p| saslprep(&String::from_utf8_lossy(p)).unwrap_or_else(|_| String::from_utf8_lossy(p).into_owned()))
        .unwrap_or_default();

    let password_digest = hex_md5(format!("{username}:mongo:{password}").as_bytes());
    let key = hex_md5(format!("{nonce}{username}{password_digest}").as_bytes());

    let auth_reply = run_command(
        conn,
        &credential.source,
        doc! {
            "authenticate": 1,
            "user": username,
            "nonce": nonce,
            "key": key,
        },
    )
    .map_err(|e| authentication_error(credential, format!("authenticate failed: {e}")))?;

    match auth_reply.get_f64("ok").or_else(|_| auth_reply.get_i32("ok").map(|o| o as f64)) {
        Ok(ok) if ok == 1.0 => Ok(()),
        _ => Err(authentication_error(credential, "server rejected MongoCR credentials")),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn hex_md5_matches_known_vector() {
        assert_eq!(hex_md5(b""), "d41d8cd98f00b204e9800998ecf8427e");
    }
}
