//! Single-producer / single-consumer ring of stereo audio samples.
//!
//! The audio producer task pushes through a [`SampleProducer`]; the data
//! island scheduler, running in the tick interrupt, drains through the
//! matching [`SampleConsumer`]. The two sides share nothing but the two
//! cursors, each written by exactly one side, so no lock is taken on either
//! path. Only atomic load/store is used, which the Cortex-M0+ provides.
//!
//! # Cursor scheme
//!
//! Cursors run over `0..2 * capacity` and index the storage modulo
//! `capacity`. `write == read` means empty and a difference of `capacity`
//! means full, so every slot of the caller's storage is usable.
//!
//! # Constraints
//!
//! - Storage is caller-provided `'static` memory; the ring never allocates.
//! - [`SampleRing::split`] succeeds once per ring; there is exactly one
//!   producer and one consumer for its lifetime.

use core::cell::Cell;
use core::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use platform::AudioSample;

use crate::error::DviError;

/// Lock-free SPSC ring of [`AudioSample`]s.
pub struct SampleRing {
    storage: AtomicPtr<AudioSample>,
    capacity: AtomicUsize,
    /// Next position to read. Written by the consumer only.
    read: AtomicUsize,
    /// Next position to write. Written by the producer only.
    write: AtomicUsize,
    claimed: Mutex<CriticalSectionRawMutex, Cell<bool>>,
}

impl SampleRing {
    /// Ring with no storage attached, usable in a `static`.
    pub const fn new() -> Self {
        Self {
            storage: AtomicPtr::new(core::ptr::null_mut()),
            capacity: AtomicUsize::new(0),
            read: AtomicUsize::new(0),
            write: AtomicUsize::new(0),
            claimed: Mutex::new(Cell::new(false)),
        }
    }

    /// Attach `storage` and hand out the producer and consumer halves.
    ///
    /// # Errors
    ///
    /// - [`DviError::EmptyAudioBuffer`] if `storage` is empty.
    /// - [`DviError::AudioBufferAlreadyAllocated`] on a second call.
    pub fn split(
        &self,
        storage: &'static mut [AudioSample],
    ) -> Result<(SampleProducer<'_>, SampleConsumer<'_>), DviError> {
        if storage.is_empty() {
            return Err(DviError::EmptyAudioBuffer);
        }
        if self.claimed.lock(|claimed| claimed.replace(true)) {
            return Err(DviError::AudioBufferAlreadyAllocated);
        }
        storage.fill(AudioSample::SILENCE);
        self.read.store(0, Ordering::Relaxed);
        self.write.store(0, Ordering::Relaxed);
        self.capacity.store(storage.len(), Ordering::Relaxed);
        self.storage.store(storage.as_mut_ptr(), Ordering::Release);
        Ok((SampleProducer { ring: self }, SampleConsumer { ring: self }))
    }

    /// Slots in the attached storage; 0 before [`split`](Self::split).
    pub fn capacity(&self) -> usize {
        self.capacity.load(Ordering::Relaxed)
    }

    /// Samples waiting to be read.
    pub fn readable(&self) -> usize {
        distance(
            self.read.load(Ordering::Acquire),
            self.write.load(Ordering::Acquire),
            self.capacity(),
        )
    }

    /// Free slots.
    pub fn writable(&self) -> usize {
        self.capacity().saturating_sub(self.readable())
    }
}

impl Default for SampleRing {
    fn default() -> Self {
        Self::new()
    }
}

/// Cursor distance from `from` to `to` on the `0..2 * cap` circle.
#[allow(clippy::arithmetic_side_effects)] // Safety: both cursors < 2 * cap, so the sum cannot overflow
fn distance(from: usize, to: usize, cap: usize) -> usize {
    if to >= from {
        to - from
    } else {
        to + 2 * cap - from
    }
}

/// Cursor `pos` moved on by `n` (`n <= cap`).
#[allow(clippy::arithmetic_side_effects)] // Safety: pos < 2 * cap and n <= cap; cap > 0 once split
fn step(pos: usize, n: usize, cap: usize) -> usize {
    (pos + n) % (2 * cap)
}

/// Storage index of cursor `pos`.
#[allow(clippy::arithmetic_side_effects)] // Safety: pos < 2 * cap, so the subtraction only runs when pos >= cap
fn slot(pos: usize, cap: usize) -> usize {
    if pos >= cap {
        pos - cap
    } else {
        pos
    }
}

/// Writing half of a [`SampleRing`]. Owned by the audio producer task.
pub struct SampleProducer<'a> {
    ring: &'a SampleRing,
}

impl SampleProducer<'_> {
    /// Free slots.
    pub fn writable(&self) -> usize {
        self.ring.writable()
    }

    /// Append as many of `samples` as fit; returns how many were written.
    #[allow(clippy::arithmetic_side_effects)] // Safety: index + i < cap for every write below
    pub fn push_slice(&mut self, samples: &[AudioSample]) -> usize {
        let ring = self.ring;
        let cap = ring.capacity();
        let base = ring.storage.load(Ordering::Acquire);
        let write = ring.write.load(Ordering::Relaxed);
        let n = samples.len().min(self.writable());
        for (i, sample) in samples.iter().take(n).enumerate() {
            let index = slot(step(write, i, cap), cap);
            // SAFETY: `index < cap` and `base` points at `cap` live samples
            // (the `'static` storage given to `split`). Slots between write
            // and read + cap are never read by the consumer until the
            // Release store below publishes them.
            unsafe { base.add(index).write(*sample) };
        }
        ring.write.store(step(write, n, cap), Ordering::Release);
        n
    }
}

/// Reading half of a [`SampleRing`]. Owned by the data island scheduler.
pub struct SampleConsumer<'a> {
    ring: &'a SampleRing,
}

impl SampleConsumer<'_> {
    /// Samples waiting to be read.
    pub fn readable(&self) -> usize {
        self.ring.readable()
    }

    /// Readable samples stored contiguously from the read pointer.
    ///
    /// Shorter than [`readable`](Self::readable) when the data wraps past
    /// the end of the storage.
    #[allow(clippy::arithmetic_side_effects)] // Safety: index < cap
    pub fn read_slice(&self) -> &[AudioSample] {
        let ring = self.ring;
        let cap = ring.capacity();
        if cap == 0 {
            return &[];
        }
        let base = ring.storage.load(Ordering::Acquire);
        let read = ring.read.load(Ordering::Relaxed);
        let index = slot(read, cap);
        let len = self.readable().min(cap - index);
        // SAFETY: `index + len <= cap` inside the live storage, and the
        // producer never writes into the readable region; `advance` takes
        // `&mut self`, so the region cannot be released while borrowed.
        unsafe { core::slice::from_raw_parts(base.add(index), len) }
    }

    /// Copy up to `out.len()` readable samples into `out` without consuming
    /// them; returns how many were copied.
    pub fn peek_into(&self, out: &mut [AudioSample]) -> usize {
        let ring = self.ring;
        let cap = ring.capacity();
        let base = ring.storage.load(Ordering::Acquire);
        let read = ring.read.load(Ordering::Relaxed);
        let n = out.len().min(self.readable());
        for (i, dst) in out.iter_mut().take(n).enumerate() {
            let index = slot(step(read, i, cap), cap);
            // SAFETY: `index < cap`, inside the readable region published by
            // the producer's Release store.
            *dst = unsafe { base.add(index).read() };
        }
        n
    }

    /// Consume `n` samples (clamped to what is readable).
    pub fn advance(&mut self, n: usize) {
        let ring = self.ring;
        let cap = ring.capacity();
        if cap == 0 {
            return;
        }
        let n = n.min(self.readable());
        let read = ring.read.load(Ordering::Relaxed);
        ring.read.store(step(read, n, cap), Ordering::Release);
    }
}
