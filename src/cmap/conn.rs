//! A single authenticated `Connection` to one server: id, address,
//! generation, and idle/life-time timestamps, wrapping a plain `TcpStream`
//! and an optional TLS stream behind one `Read`/`Write` type. TLS uses
//! `rustls::StreamOwned`, which has the same synchronous `Read`/`Write`
//! story a blocking socket needs.

use std::{
    io::{Read, Write},
    net::TcpStream,
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, Instant},
};

use bufstream::BufStream;
use derivative::Derivative;

use super::options::ConnectionPoolOptions;
use crate::{
    error::{ErrorKind, Result},
    options::ServerAddress,
    wire::{Reply, Request, RequestId, GLOBAL_BUFFER_POOL},
};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Monotonic id assigned at construction, used for logging and pool
/// identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct ConnectionId(pub(crate) u64);

fn next_connection_id() -> ConnectionId {
    ConnectionId(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
}

/// Either a bare TCP socket or one wrapped in a TLS session. Kept as one
/// enum, rather than a trait object, so `Connection` can be `Send` without
/// boxing — mirrors the prototype driver's `Stream` enum exactly, just
/// swapping its OpenSSL variant for `rustls`.
pub(crate) enum Stream {
    Tcp(TcpStream),
    #[cfg(feature = "tls")]
    Tls(rustls::StreamOwned<rustls::ClientConnection, TcpStream>),
}

impl Stream {
    fn tcp(&self) -> &TcpStream {
        match self {
            Stream::Tcp(s) => s,
            #[cfg(feature = "tls")]
            Stream::Tls(s) => s.get_ref(),
        }
    }

    fn set_read_timeout(&self, timeout: Option<Duration>) -> std::io::Result<()> {
        self.tcp().set_read_timeout(timeout)
    }

    fn set_write_timeout(&self, timeout: Option<Duration>) -> std::io::Result<()> {
        self.tcp().set_write_timeout(timeout)
    }
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            Stream::Tcp(s) => s.read(buf),
            #[cfg(feature = "tls")]
            Stream::Tls(s) => s.read(buf),
        }
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            Stream::Tcp(s) => s.write(buf),
            #[cfg(feature = "tls")]
            Stream::Tls(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            Stream::Tcp(s) => s.flush(),
            #[cfg(feature = "tls")]
            Stream::Tls(s) => s.flush(),
        }
    }
}

/// A single authenticated TCP (or TLS) channel to one server.
///
/// Owned by exactly one caller between pool checkout and checkin, never
/// shared across threads. Once `has_errored()` is true the connection is
/// poisoned and the pool must discard rather than check it back in.
#[derive(Derivative)]
#[derivative(Debug)]
pub(crate) struct Connection {
    pub(crate) id: ConnectionId,
    pub(crate) address: ServerAddress,
    pub(crate) generation: u64,
    #[derivative(Debug = "ignore")]
    stream: BufStream<Stream>,
    next_request_id: i32,
    created_at: Instant,
    last_used_at: Instant,
    socket_timeout: Option<Duration>,
    errored: bool,
}

impl Connection {
    pub(crate) fn connect(
        address: &ServerAddress,
        generation: u64,
        options: &ConnectionPoolOptions,
    ) -> Result<Connection> {
        let socket = TcpStream::connect((address.host(), address.port())).map_err(|e| {
            ErrorKind::SocketOpenTimeout {
                message: e.to_string(),
            }
        })?;
        socket.set_nodelay(true).ok();
        if options.socket_keep_alive {
            let sock_ref = socket2::SockRef::from(&socket);
            sock_ref.set_keepalive(true).ok();
        }

        let stream = Stream::Tcp(socket);
        stream.set_read_timeout(Some(options.connect_timeout))?;
        stream.set_write_timeout(Some(options.connect_timeout))?;

        let mut connection = Connection {
            id: next_connection_id(),
            address: address.clone(),
            generation,
            stream: BufStream::new(stream),
            next_request_id: 1,
            created_at: Instant::now(),
            last_used_at: Instant::now(),
            socket_timeout: options.socket_timeout,
            errored: false,
        };

        connection.apply_socket_timeout()?;
        Ok(connection)
    }

    fn apply_socket_timeout(&mut self) -> Result<()> {
        self.stream.get_ref().set_read_timeout(self.socket_timeout)?;
        self.stream.get_ref().set_write_timeout(self.socket_timeout)?;
        Ok(())
    }

    fn next_request_id(&mut self) -> RequestId {
        let id = self.next_request_id;
        self.next_request_id = self.next_request_id.wrapping_add(1);
        RequestId(id)
    }

    /// Writes `request` and returns the `RequestId` it was sent under, for
    /// `receive` to correlate the reply against. The body is framed into a
    /// scratch buffer drawn from the process-wide `BufferPool` and returned
    /// to it once the frame has been written, regardless of outcome.
    pub(crate) fn send(&mut self, request: &Request) -> Result<RequestId> {
        let request_id = self.next_request_id();
        let mut scratch = GLOBAL_BUFFER_POOL.take();
        let result = request.write(&mut self.stream, request_id, &mut scratch);
        GLOBAL_BUFFER_POOL.give_back(scratch);
        self.note_result(&result);
        self.last_used_at = Instant::now();
        result.map(|_| request_id)
    }

    /// Reads one frame and decodes it as the reply to `request_id`.
    pub(crate) fn receive(&mut self, request_id: RequestId) -> Result<Reply> {
        let result = Reply::read(&mut self.stream, request_id);
        self.note_result(&result);
        self.last_used_at = Instant::now();
        result
    }

    fn note_result<T>(&mut self, result: &Result<T>) {
        if let Err(e) = result {
            if e.is_connection_fatal() {
                self.errored = true;
            }
        }
    }

    pub(crate) fn has_errored(&self) -> bool {
        self.errored
    }

    pub(crate) fn is_idle(&self, max_idle_time: Option<Duration>) -> bool {
        max_idle_time
            .map(|max| self.last_used_at.elapsed() >= max)
            .unwrap_or(false)
    }

    pub(crate) fn exceeds_lifetime(&self, max_life_time: Option<Duration>) -> bool {
        max_life_time
            .map(|max| self.created_at.elapsed() >= max)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn connection_ids_are_unique_and_increasing() {
        let a = next_connection_id();
        let b = next_connection_id();
        assert!(b.0 > a.0);
    }
}
