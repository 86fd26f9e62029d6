use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex};

/// Pool of reusable I/O buffers shared by the hashing workers.
///
/// Concurrency is already bounded by the scheduler's permit semaphore, so the
/// pool never holds more buffers than there are permits.
pub struct BufferPool {
    buffer_size: usize,
    free: Mutex<Vec<Vec<u8>>>,
}

impl BufferPool {
    pub fn new(buffer_size: usize) -> Arc<Self> {
        Arc::new(Self {
            buffer_size,
            free: Mutex::new(Vec::new()),
        })
    }

    /// Rent a zeroed buffer of the pool's block size. The buffer returns to
    /// the pool when the guard drops, on every exit path.
    pub fn rent(self: &Arc<Self>) -> PooledBuffer {
        let buf = {
            let mut free = self.free.lock().expect("buffer pool poisoned");
            free.pop()
        };
        let buf = buf.unwrap_or_else(|| vec![0u8; self.buffer_size]);
        PooledBuffer {
            pool: Arc::clone(self),
            buf: Some(buf),
        }
    }

    fn give_back(&self, buf: Vec<u8>) {
        let mut free = self.free.lock().expect("buffer pool poisoned");
        free.push(buf);
    }
}

pub struct PooledBuffer {
    pool: Arc<BufferPool>,
    buf: Option<Vec<u8>>,
}

impl Deref for PooledBuffer {
    type Target = Vec<u8>;

    fn deref(&self) -> &Vec<u8> {
        self.buf.as_ref().expect("buffer already returned")
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut Vec<u8> {
        self.buf.as_mut().expect("buffer already returned")
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            self.pool.give_back(buf);
        }
    }
}
