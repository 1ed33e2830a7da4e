// =============================================================================
// TickChannel — bounded, drop-oldest single-consumer tick queue
// =============================================================================
//
// `tokio::sync::mpsc` blocks the producer once its buffer is full, which is
// wrong for a live market-data feed: a slow consumer should never throttle
// the exchange connection. Spec §5 backpressure instead drops the oldest
// buffered tick and keeps the newest, tracking how many were dropped. No
// channel in the stack expresses that policy, so this is a small hand-built
// primitive over the same sync tools (`parking_lot::Mutex`, `tokio::sync::
// Notify`) the rest of the engine already depends on.
// =============================================================================

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::types::Tick;

pub struct TickChannel {
    queue: Mutex<VecDeque<Tick>>,
    capacity: usize,
    notify: Notify,
    dropped: AtomicU64,
    closed: AtomicBool,
}

impl TickChannel {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity: capacity.max(1),
            notify: Notify::new(),
            dropped: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Push a tick. If the queue is at capacity, the oldest buffered tick is
    /// dropped and the drop counter incremented so the newest tick is always
    /// admitted. A no-op once the channel is closed.
    pub fn send(&self, tick: Tick) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        let mut queue = self.queue.lock();
        if queue.len() >= self.capacity {
            queue.pop_front();
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        queue.push_back(tick);
        drop(queue);
        self.notify.notify_one();
    }

    /// Wait for and remove the oldest tick. Returns `None` once the channel
    /// is closed and drained.
    pub async fn recv(&self) -> Option<Tick> {
        loop {
            {
                let mut queue = self.queue.lock();
                if let Some(tick) = queue.pop_front() {
                    return Some(tick);
                }
                if self.closed.load(Ordering::Acquire) {
                    return None;
                }
            }
            self.notify.notified().await;
        }
    }

    /// Non-blocking pop, for tests and drain-on-shutdown paths.
    pub fn try_recv(&self) -> Option<Tick> {
        self.queue.lock().pop_front()
    }

    /// Marks the channel closed and wakes any pending receiver; already
    /// queued ticks are still drained by `recv`/`try_recv` afterward.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tick(ts: i64, price: f64) -> Tick {
        Tick::new(ts, price, 1.0, false)
    }

    #[test]
    fn send_within_capacity_does_not_drop() {
        let chan = TickChannel::new(4);
        for i in 0..4 {
            chan.send(tick(i, 100.0));
        }
        assert_eq!(chan.len(), 4);
        assert_eq!(chan.dropped_count(), 0);
    }

    #[test]
    fn send_over_capacity_drops_oldest_and_counts() {
        let chan = TickChannel::new(2);
        chan.send(tick(0, 100.0));
        chan.send(tick(1, 101.0));
        chan.send(tick(2, 102.0));

        assert_eq!(chan.dropped_count(), 1);
        assert_eq!(chan.len(), 2);
        assert_eq!(chan.try_recv().unwrap().price, 101.0);
        assert_eq!(chan.try_recv().unwrap().price, 102.0);
    }

    #[test]
    fn recv_keeps_newest_ticks_under_sustained_overflow() {
        let chan = TickChannel::new(3);
        for i in 0..10 {
            chan.send(tick(i, i as f64));
        }
        assert_eq!(chan.dropped_count(), 7);
        let remaining: Vec<f64> = std::iter::from_fn(|| chan.try_recv())
            .map(|t| t.price)
            .collect();
        assert_eq!(remaining, vec![7.0, 8.0, 9.0]);
    }

    #[tokio::test]
    async fn recv_drains_in_fifo_order() {
        let chan = TickChannel::new(8);
        chan.send(tick(0, 1.0));
        chan.send(tick(1, 2.0));
        assert_eq!(chan.recv().await.unwrap().price, 1.0);
        assert_eq!(chan.recv().await.unwrap().price, 2.0);
    }

    #[tokio::test]
    async fn recv_returns_none_after_close_and_drain() {
        let chan = TickChannel::new(8);
        chan.send(tick(0, 1.0));
        chan.close();
        assert_eq!(chan.recv().await.unwrap().price, 1.0);
        assert!(chan.recv().await.is_none());
    }

    #[test]
    fn send_after_close_is_noop() {
        let chan = TickChannel::new(8);
        chan.close();
        chan.send(tick(0, 1.0));
        assert!(chan.is_empty());
        assert_eq!(chan.dropped_count(), 0);
    }
}
