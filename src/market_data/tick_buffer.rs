// =============================================================================
// TickBuffer — bounded per-symbol ring of recent trade prints
// =============================================================================

use std::collections::VecDeque;

use crate::types::Tick;

/// Fixed-capacity ordered sequence of ticks for one symbol. Append is O(1)
/// amortized; oldest-element eviction on overflow. Owned exclusively by a
/// single symbol worker — no internal locking.
pub struct TickBuffer {
    ticks: VecDeque<Tick>,
    capacity: usize,
}

impl TickBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            ticks: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a tick, evicting the oldest entry if at capacity.
    pub fn push(&mut self, tick: Tick) {
        if self.ticks.len() == self.capacity {
            self.ticks.pop_front();
        }
        self.ticks.push_back(tick);
    }

    pub fn len(&self) -> usize {
        self.ticks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }

    /// The newest tick, if any.
    pub fn last(&self) -> Option<&Tick> {
        self.ticks.back()
    }

    /// The last `count` ticks, oldest-first. Returns fewer than `count` (but
    /// never panics) when the buffer holds fewer ticks — fails silently per
    /// the buffer's contract; callers decide whether that's enough to compute
    /// an indicator.
    pub fn recent(&self, count: usize) -> Vec<Tick> {
        let start = self.ticks.len().saturating_sub(count);
        self.ticks.iter().skip(start).copied().collect()
    }

    /// All ticks whose timestamp falls within `[newest - seconds, newest]`,
    /// where `newest` is the timestamp of the buffer's newest tick (not wall
    /// clock). Empty if the buffer is empty or spans less than `seconds`.
    pub fn since(&self, seconds: f64) -> Vec<Tick> {
        let Some(newest) = self.ticks.back() else {
            return Vec::new();
        };
        let cutoff = newest.timestamp_ms - (seconds * 1000.0) as i64;
        self.ticks
            .iter()
            .skip_while(|t| t.timestamp_ms < cutoff)
            .copied()
            .collect()
    }

    /// Wall-clock span covered by the buffer, in seconds.
    pub fn span_seconds(&self) -> f64 {
        match (self.ticks.front(), self.ticks.back()) {
            (Some(first), Some(last)) => (last.timestamp_ms - first.timestamp_ms) as f64 / 1000.0,
            _ => 0.0,
        }
    }
}
