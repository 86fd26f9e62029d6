//! Sampled file hashing.
//!
//! Large files are fingerprinted from three sampled windows (head, middle,
//! tail) instead of their full contents, bounding I/O per file at three times
//! the segment length. Small files are always whole-hashed so that a sampled
//! fingerprint of a small file equals its exact content fingerprint.

mod pool;

pub use pool::{BufferPool, PooledBuffer};

use std::io::SeekFrom;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use blake2::{Blake2b512, Digest};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::error::Error;
use crate::fingerprint::Fingerprint;
use crate::progress::HashCounters;

/// Fixed I/O block size for streaming reads.
pub const IO_BLOCK_SIZE: usize = 4096;

/// Number of sampled windows per file.
pub const WINDOW_COUNT: u64 = 3;

/// How a file of a given length is fingerprinted at a given segment length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplePlan {
    /// Hash the entire stream.
    Whole { data_length: u64 },
    /// Hash three `segment_length`-byte windows: head, middle, tail.
    Windows {
        segment_length: u64,
        data_length: u64,
    },
}

impl SamplePlan {
    /// Decide between whole and sampled hashing.
    ///
    /// Whenever the three windows would touch or overlap (`3·S ≥ L`) the
    /// whole file is hashed instead, and the plan reports an effective
    /// segment length of zero.
    pub fn for_length(data_length: u64, segment_length: u64) -> Self {
        if segment_length == 0 || segment_length.saturating_mul(WINDOW_COUNT) >= data_length {
            SamplePlan::Whole { data_length }
        } else {
            SamplePlan::Windows {
                segment_length,
                data_length,
            }
        }
    }

    /// The segment length to record: zero when the whole file was read.
    pub fn effective_segment_length(&self) -> u64 {
        match self {
            SamplePlan::Whole { .. } => 0,
            SamplePlan::Windows { segment_length, .. } => *segment_length,
        }
    }

    /// Bytes this plan will read.
    pub fn bytes_to_read(&self) -> u64 {
        match self {
            SamplePlan::Whole { data_length } => *data_length,
            SamplePlan::Windows { segment_length, .. } => segment_length * WINDOW_COUNT,
        }
    }

    /// `(offset, length)` of each sampled window, in hash order.
    ///
    /// The order is head, middle, tail and must stay that way: feeding the
    /// windows in a data-dependent order would let files that differ only in
    /// the middle collide.
    pub fn windows(&self) -> Option<[(u64, u64); 3]> {
        match *self {
            SamplePlan::Whole { .. } => None,
            SamplePlan::Windows {
                segment_length: s,
                data_length: len,
            } => Some([
                (0, s),
                (len / 2 - s / 2, s),
                (len - s, s),
            ]),
        }
    }
}

/// Hash a file according to `plan`.
///
/// Reads go through the shared buffer pool in `IO_BLOCK_SIZE` chunks and are
/// reported to `counters` as they complete. Cancellation is checked before
/// every read.
pub async fn hash_file(
    path: &Path,
    plan: &SamplePlan,
    pool: &Arc<BufferPool>,
    counters: &HashCounters,
    cancel: &AtomicBool,
) -> Result<Fingerprint, Error> {
    let mut file = File::open(path).await?;
    let mut hasher = Blake2b512::new();
    let mut buf = pool.rent();

    match plan.windows() {
        None => {
            loop {
                if cancel.load(Ordering::Relaxed) {
                    return Err(Error::Cancelled);
                }
                let n = file.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                hasher.update(&buf[..n]);
                counters.add_read(n as u64);
            }
        }
        Some(windows) => {
            for (offset, length) in windows {
                file.seek(SeekFrom::Start(offset)).await?;
                let mut remaining = length;
                while remaining > 0 {
                    if cancel.load(Ordering::Relaxed) {
                        return Err(Error::Cancelled);
                    }
                    let want = remaining.min(buf.len() as u64) as usize;
                    let n = file.read(&mut buf[..want]).await?;
                    if n == 0 {
                        // File shrank under us; the stale length will fail
                        // the freshness check on the next lookup.
                        break;
                    }
                    hasher.update(&buf[..n]);
                    counters.add_read(n as u64);
                    remaining -= n as u64;
                }
            }
        }
    }

    Ok(Fingerprint::from_digest(hasher))
}
