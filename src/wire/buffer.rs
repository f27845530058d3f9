//! Pooled scratch buffers for wire I/O.
//!
//! Every `Connection::send`/`receive` needs a throwaway `Vec<u8>` to frame
//! a request or to buffer a partially read document; recycling them avoids
//! an allocation per call on a hot connection. Grounded on the same
//! prototype driver's pattern of wrapping the raw socket in a `BufStream`
//! (a reusable buffer is the cheaper half of that idea, without requiring
//! it be tied to the socket type itself).

use std::sync::Mutex;

use lazy_static::lazy_static;

/// A small freelist of reusable byte buffers. Not bounded: a burst of
/// concurrent connections each returning a buffer larger than the typical
/// steady-state size just means the freelist briefly holds more bytes than
/// it needs, which is bounded by the number of `Connection`s that ever
/// exist, not by request volume.
pub(crate) struct BufferPool {
    free: Mutex<Vec<Vec<u8>>>,
}

impl BufferPool {
    pub(crate) fn new() -> Self {
        Self {
            free: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn take(&self) -> Vec<u8> {
        self.free
            .lock()
            .expect("buffer pool mutex poisoned")
            .pop()
            .unwrap_or_default()
    }

    pub(crate) fn give_back(&self, mut buf: Vec<u8>) {
        buf.clear();
        self.free.lock().expect("buffer pool mutex poisoned").push(buf);
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}

lazy_static! {
    /// The process-wide buffer freelist every `Connection` draws its request
    /// scratch buffer from. A single pool (rather than one per connection or
    /// per server) is the right granularity here: the borrow is held only
    /// for the duration of one `send()` call, so sharing it across every
    /// connection in the process lets a buffer sized by one server's large
    /// commands get reused by another's instead of sitting idle in a
    /// per-connection freelist of its own. It's an explicit
    /// lazily-initialized holder with documented init-once semantics,
    /// rather than a thread-unsafe lazy singleton.
    pub(crate) static ref GLOBAL_BUFFER_POOL: BufferPool = BufferPool::new();
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn recycled_buffer_is_cleared_but_keeps_its_capacity() {
        let pool = BufferPool::new();
        let mut buf = pool.take();
        buf.extend_from_slice(b"hello");
        let capacity = buf.capacity();
        pool.give_back(buf);

        let buf = pool.take();
        assert!(buf.is_empty());
        assert!(buf.capacity() >= capacity);
    }

    #[test]
    fn take_without_a_prior_give_back_allocates_fresh() {
        let pool = BufferPool::new();
        assert!(pool.take().is_empty());
    }
}
