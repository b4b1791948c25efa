//! Fixed-capacity, lock-guarded history of three synchronized float channels.
//!
//! Each channel is backed by an array of `2 × capacity` slots so that the most
//! recent samples are always contiguous. Appends write at `head` until the
//! double-length array is exhausted, then compact the surviving tail back to
//! the front. Compaction runs at most once per `capacity` appended samples and
//! reads never need modular index arithmetic.

use serde::Serialize;
use std::sync::{Mutex, MutexGuard};

use crate::error::BufferError;
use crate::lock;
use crate::types::Sample3;

pub struct RingBuffer {
    capacity: usize,
    channels: Mutex<Channels>,
}

struct Channels {
    x: Vec<f32>,
    y: Vec<f32>,
    z: Vec<f32>,
    /// Next write slot; the valid samples are `[head - count, head)`.
    head: usize,
    count: usize,
}

impl Channels {
    fn zeroed(capacity: usize) -> Self {
        Channels {
            x: vec![0.0; 2 * capacity],
            y: vec![0.0; 2 * capacity],
            z: vec![0.0; 2 * capacity],
            head: 0,
            count: 0,
        }
    }

    fn write(&mut self, capacity: usize, xs: &[f32], ys: &[f32], zs: &[f32]) {
        let len = xs.len();
        let head = self.head;

        if head + len <= 2 * capacity {
            self.x[head..head + len].copy_from_slice(xs);
            self.y[head..head + len].copy_from_slice(ys);
            self.z[head..head + len].copy_from_slice(zs);
            self.head = head + len;
            self.count = (self.count + len).min(capacity);
            return;
        }

        // head > capacity here, so at least `capacity` samples exist behind it.
        let keep = capacity - len;
        for (channel, data) in [(&mut self.x, xs), (&mut self.y, ys), (&mut self.z, zs)] {
            channel.copy_within(head - keep..head, 0);
            channel[keep..capacity].copy_from_slice(data);
        }
        self.head = capacity;
        self.count = capacity;
    }
}

impl RingBuffer {
    pub fn new(capacity: usize) -> Self {
        RingBuffer {
            capacity,
            channels: Mutex::new(Channels::zeroed(capacity)),
        }
    }

    /// A buffer that already holds `capacity` copies of `sample`, so readers
    /// get a full window before the first real sample arrives.
    pub fn filled(capacity: usize, sample: Sample3) -> Self {
        let mut channels = Channels::zeroed(capacity);
        channels.x[..capacity].fill(sample.x);
        channels.y[..capacity].fill(sample.y);
        channels.z[..capacity].fill(sample.z);
        channels.head = capacity;
        channels.count = capacity;
        RingBuffer {
            capacity,
            channels: Mutex::new(channels),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of valid samples, saturating at capacity.
    pub fn size(&self) -> usize {
        lock(&self.channels).count
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Append `xs.len()` synchronized samples. All three channels are written
    /// inside one critical section.
    pub fn append(&self, xs: &[f32], ys: &[f32], zs: &[f32]) -> Result<(), BufferError> {
        if xs.len() != ys.len() || xs.len() != zs.len() {
            return Err(BufferError::ChannelLengthMismatch {
                x: xs.len(),
                y: ys.len(),
                z: zs.len(),
            });
        }
        let len = xs.len();
        if len > self.capacity {
            return Err(BufferError::Capacity {
                len,
                capacity: self.capacity,
            });
        }
        if len == 0 {
            return Ok(());
        }

        lock(&self.channels).write(self.capacity, xs, ys, zs);
        Ok(())
    }

    pub fn push(&self, sample: Sample3) -> Result<(), BufferError> {
        self.append(&[sample.x], &[sample.y], &[sample.z])
    }

    /// Borrow the most recent `n` samples of each channel.
    ///
    /// Returns `Ok(None)` while fewer than `n` samples have been written. The
    /// returned window holds the buffer lock: writers block until it is
    /// dropped, so keep it short-lived or use [`RingBuffer::recent_copy`].
    pub fn recent_window(&self, n: usize) -> Result<Option<RecentWindow<'_>>, BufferError> {
        if n > self.capacity {
            return Err(BufferError::Range {
                requested: n,
                capacity: self.capacity,
            });
        }

        let guard = lock(&self.channels);
        if guard.count < n {
            return Ok(None);
        }
        let end = guard.head;
        Ok(Some(RecentWindow {
            guard,
            start: end - n,
            end,
        }))
    }

    /// Copy-on-read variant of [`RingBuffer::recent_window`].
    pub fn recent_copy(&self, n: usize) -> Result<Option<WindowData>, BufferError> {
        Ok(self.recent_window(n)?.map(|window| window.to_data()))
    }

    /// Most recently appended sample, if any.
    pub fn latest(&self) -> Option<Sample3> {
        let channels = lock(&self.channels);
        if channels.count == 0 {
            return None;
        }
        let i = channels.head - 1;
        Some(Sample3::new(channels.x[i], channels.y[i], channels.z[i]))
    }
}

/// Read-only view of the newest samples, valid while the buffer lock is held.
pub struct RecentWindow<'a> {
    guard: MutexGuard<'a, Channels>,
    start: usize,
    end: usize,
}

impl RecentWindow<'_> {
    pub fn x(&self) -> &[f32] {
        &self.guard.x[self.start..self.end]
    }

    pub fn y(&self) -> &[f32] {
        &self.guard.y[self.start..self.end]
    }

    pub fn z(&self) -> &[f32] {
        &self.guard.z[self.start..self.end]
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn samples(&self) -> impl Iterator<Item = Sample3> + '_ {
        self.x()
            .iter()
            .zip(self.y())
            .zip(self.z())
            .map(|((&x, &y), &z)| Sample3::new(x, y, z))
    }

    pub fn to_data(&self) -> WindowData {
        WindowData {
            x: self.x().to_vec(),
            y: self.y().to_vec(),
            z: self.z().to_vec(),
        }
    }
}

/// Owned copy of a window, safe to keep after the lock is released.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct WindowData {
    pub x: Vec<f32>,
    pub y: Vec<f32>,
    pub z: Vec<f32>,
}

impl WindowData {
    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }
}
