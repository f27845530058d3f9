//! `Cursor`: iterates the results of a `Find` past its initial batch,
//! as a plain blocking `Iterator`.
//!
//! A `Cursor` only pins a `serverAddress`, not a specific `Connection`: it
//! checks one out of that server's pool, fresh, for each `GetMore` once
//! its buffered batch is exhausted.

use std::collections::VecDeque;

use bson::Document;

use crate::{
    cmap::ConnectionPool,
    error::Result,
    options::ServerAddress,
    wire::{Request, RequestId},
    Namespace,
};

/// An open result-set cursor. A non-zero `cursor_id` that's never fully
/// exhausted is killed on `Drop` — an unclosed cursor left dangling on the
/// server would otherwise pin resources there indefinitely.
pub struct Cursor {
    namespace: Namespace,
    pool: ConnectionPool,
    cursor_id: i64,
    batch_size: i32,
    buffer: VecDeque<Document>,
}

impl Cursor {
    pub(crate) fn new(
        namespace: Namespace,
        pool: ConnectionPool,
        cursor_id: i64,
        batch_size: i32,
        initial_batch: Vec<Document>,
    ) -> Self {
        Self {
            namespace,
            pool,
            cursor_id,
            batch_size,
            buffer: initial_batch.into(),
        }
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn server_address(&self) -> &ServerAddress {
        self.pool.address()
    }

    /// `true` once the server has reported `cursorId == 0` and every
    /// buffered document has been consumed.
    pub fn is_exhausted(&self) -> bool {
        self.cursor_id == 0 && self.buffer.is_empty()
    }

    fn fetch_more(&mut self) -> Result<()> {
        let request = Request::GetMore {
            full_collection_name: self.namespace.to_string(),
            number_to_return: self.batch_size,
            cursor_id: self.cursor_id,
        };

        let mut conn = self.pool.checkout()?;
        let request_id: RequestId = conn.send(&request)?;
        let reply = conn.receive(request_id)?;

        if reply.cursor_not_found() {
            let cursor_id = self.cursor_id;
            self.cursor_id = 0;
            return Err(crate::error::ErrorKind::CursorNotFound {
                cursor_id,
                address: self.pool.address().clone(),
            }
            .into());
        }

        self.cursor_id = reply.cursor_id;
        self.buffer.extend(reply.documents);
        Ok(())
    }

    fn kill(&mut self) {
        if self.cursor_id == 0 {
            return;
        }
        let request = Request::KillCursors {
            cursor_ids: vec![self.cursor_id],
        };
        if let Ok(mut conn) = self.pool.checkout() {
            // Best-effort: OP_KILL_CURSORS has no reply to wait for.
            let _ = conn.send(&request);
        }
        self.cursor_id = 0;
    }
}

impl Iterator for Cursor {
    type Item = Result<Document>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() {
            if self.cursor_id == 0 {
                return None;
            }
            if let Err(e) = self.fetch_more() {
                return Some(Err(e));
            }
            if self.buffer.is_empty() {
                return None;
            }
        }
        self.buffer.pop_front().map(Ok)
    }
}

impl Drop for Cursor {
    fn drop(&mut self) {
        self.kill();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::cmap::ConnectionPoolOptions;
    use std::time::Duration;

    fn pool() -> ConnectionPool {
        ConnectionPool::new(
            ServerAddress::new("127.0.0.1", Some(1)),
            ConnectionPoolOptions {
                max_pool_size: 1,
                min_pool_size: 0,
                max_wait_queue_size: 1,
                max_wait_time: Duration::from_millis(10),
                max_connection_idle_time: None,
                max_connection_life_time: None,
                connect_timeout: Duration::from_millis(10),
                socket_timeout: None,
                socket_keep_alive: false,
                credential: None,
            },
        )
    }

    #[test]
    fn zero_cursor_id_with_empty_batch_is_exhausted_immediately() {
        let cursor = Cursor::new(Namespace::new("appdb", "widgets"), pool(), 0, 100, vec![]);
        assert!(cursor.is_exhausted());
    }

    #[test]
    fn buffered_documents_are_yielded_before_any_getmore() {
        let batch = vec![bson::doc! { "x": 1 }, bson::doc! { "x": 2 }];
        let mut cursor = Cursor::new(Namespace::new("appdb", "widgets"), pool(), 0, 100, batch);
        assert_eq!(cursor.next().unwrap().unwrap(), bson::doc! { "x": 1 });
        assert_eq!(cursor.next().unwrap().unwrap(), bson::doc! { "x": 2 });
        assert!(cursor.next().is_none());
    }
}
