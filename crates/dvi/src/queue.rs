//! Bounded buffer-handle queue shared between the tick interrupt and
//! producer tasks.
//!
//! The queue is a fixed-capacity FIFO behind an embassy critical-section
//! mutex. Producer tasks use the async [`enqueue`](BufferQueue::enqueue) /
//! [`dequeue`](BufferQueue::dequeue), which park on a waker registration
//! when the queue is full or empty. The tick interrupt only ever uses the
//! `try_*` and [`dequeue_if`](BufferQueue::dequeue_if) methods, which never
//! wait.
//!
//! Every operation holds the critical section for a handful of instructions
//! only, so a task holding the lock delays the tick by at most that much and
//! can never be preempted by it mid-update.

use core::cell::RefCell;
use core::future::poll_fn;
use core::task::Poll;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::waitqueue::MultiWakerRegistration;
use heapless::Deque;

/// Maximum number of tasks parked on one side of a queue.
const MAX_WAITERS: usize = 4;

struct Inner<T, const N: usize> {
    items: Deque<T, N>,
    receivers: MultiWakerRegistration<MAX_WAITERS>,
    senders: MultiWakerRegistration<MAX_WAITERS>,
}

/// Fixed-capacity FIFO of buffer handles.
pub struct BufferQueue<T, const N: usize> {
    inner: Mutex<CriticalSectionRawMutex, RefCell<Inner<T, N>>>,
}

impl<T, const N: usize> BufferQueue<T, N> {
    /// Empty queue, usable in a `static`.
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(Inner {
                items: Deque::new(),
                receivers: MultiWakerRegistration::new(),
                senders: MultiWakerRegistration::new(),
            })),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut Inner<T, N>) -> R) -> R {
        self.inner.lock(|cell| f(&mut cell.borrow_mut()))
    }

    /// Append `item` unless the queue is full.
    ///
    /// # Errors
    ///
    /// Hands `item` back when the queue is full.
    pub fn try_enqueue(&self, item: T) -> Result<(), T> {
        self.with(|inner| {
            inner.items.push_back(item)?;
            inner.receivers.wake();
            Ok(())
        })
    }

    /// Append `item`, waiting for space if the queue is full.
    pub async fn enqueue(&self, item: T) {
        self.enqueue_and(item, || ()).await;
    }

    /// Append `item`, waiting for space if the queue is full, and run
    /// `on_queued` under the same lock as the append.
    ///
    /// The hook must not touch this queue.
    pub async fn enqueue_and(&self, item: T, on_queued: impl FnOnce()) {
        let mut pending = Some(item);
        let mut on_queued = Some(on_queued);
        poll_fn(|cx| {
            self.with(|inner| {
                let Some(item) = pending.take() else {
                    return Poll::Ready(());
                };
                match inner.items.push_back(item) {
                    Ok(()) => {
                        if let Some(hook) = on_queued.take() {
                            hook();
                        }
                        inner.receivers.wake();
                        Poll::Ready(())
                    }
                    Err(item) => {
                        pending = Some(item);
                        inner.senders.register(cx.waker());
                        Poll::Pending
                    }
                }
            })
        })
        .await;
    }

    /// Remove the head, if any.
    pub fn try_dequeue(&self) -> Option<T> {
        self.with(|inner| {
            let item = inner.items.pop_front();
            if item.is_some() {
                inner.senders.wake();
            }
            item
        })
    }

    /// Remove the head, waiting for one to arrive if the queue is empty.
    pub async fn dequeue(&self) -> T {
        self.dequeue_and(|| ()).await
    }

    /// Remove the head, waiting for one to arrive if the queue is empty, and
    /// run `on_taken` under the same lock as the removal.
    ///
    /// The hook must not touch this queue.
    pub async fn dequeue_and(&self, on_taken: impl FnOnce()) -> T {
        let mut on_taken = Some(on_taken);
        poll_fn(|cx| {
            self.with(|inner| match inner.items.pop_front() {
                Some(item) => {
                    if let Some(hook) = on_taken.take() {
                        hook();
                    }
                    inner.senders.wake();
                    Poll::Ready(item)
                }
                None => {
                    inner.receivers.register(cx.waker());
                    Poll::Pending
                }
            })
        })
        .await
    }

    /// Remove the head only if `accept` approves it.
    ///
    /// The peek and the removal happen under one lock, so no other context
    /// can slip an item in between.
    pub fn dequeue_if(&self, accept: impl FnOnce(&T) -> bool) -> Option<T> {
        self.with(|inner| {
            if !inner.items.front().is_some_and(accept) {
                return None;
            }
            let item = inner.items.pop_front();
            inner.senders.wake();
            item
        })
    }

    /// Wait until the queue holds at least one item, without removing it.
    pub async fn wait_until_content_available(&self) {
        poll_fn(|cx| {
            self.with(|inner| {
                if inner.items.is_empty() {
                    inner.receivers.register(cx.waker());
                    Poll::Pending
                } else {
                    Poll::Ready(())
                }
            })
        })
        .await;
    }

    /// Items currently queued.
    pub fn len(&self) -> usize {
        self.with(|inner| inner.items.len())
    }

    /// `true` when nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Queue capacity.
    pub const fn capacity(&self) -> usize {
        N
    }
}

impl<T, const N: usize> Default for BufferQueue<T, N> {
    fn default() -> Self {
        Self::new()
    }
}
