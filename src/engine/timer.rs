//! Virtual-clock timer queue.
//!
//! Timers are keyed: scheduling a key that is already pending replaces it,
//! which is exactly the debounce pattern (clear, then set again). Time only
//! moves when the owner pops due timers.

#[derive(Debug, Clone, PartialEq, Eq)]
struct Pending<K> {
    key: K,
    due_ms: u64,
    seq: u64,
}

#[derive(Debug, Clone)]
pub struct TimerQueue<K> {
    now_ms: u64,
    next_seq: u64,
    pending: Vec<Pending<K>>,
}

impl<K: Copy + PartialEq> Default for TimerQueue<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Copy + PartialEq> TimerQueue<K> {
    pub fn new() -> Self {
        Self {
            now_ms: 0,
            next_seq: 0,
            pending: Vec::new(),
        }
    }

    pub fn now(&self) -> u64 {
        self.now_ms
    }

    /// Arm `key` to fire `delay_ms` from now, replacing any pending timer
    /// with the same key.
    pub fn schedule(&mut self, key: K, delay_ms: u64) {
        self.cancel(key);
        self.pending.push(Pending {
            key,
            due_ms: self.now_ms + delay_ms,
            seq: self.next_seq,
        });
        self.next_seq += 1;
    }

    pub fn cancel(&mut self, key: K) {
        self.pending.retain(|p| p.key != key);
    }

    pub fn is_pending(&self, key: K) -> bool {
        self.pending.iter().any(|p| p.key == key)
    }

    /// Due time of a pending timer.
    pub fn due(&self, key: K) -> Option<u64> {
        self.pending.iter().find(|p| p.key == key).map(|p| p.due_ms)
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Remove and return the earliest timer due at or before `until`,
    /// moving the clock to its due time. Ties go to the one scheduled
    /// first. Returns `None` once nothing else is due, with the clock left
    /// at `until`.
    pub fn pop_due(&mut self, until: u64) -> Option<K> {
        let next = self
            .pending
            .iter()
            .enumerate()
            .filter(|(_, p)| p.due_ms <= until)
            .min_by_key(|(_, p)| (p.due_ms, p.seq))
            .map(|(i, _)| i);
        match next {
            Some(i) => {
                let timer = self.pending.remove(i);
                self.now_ms = self.now_ms.max(timer.due_ms);
                Some(timer.key)
            }
            None => {
                self.now_ms = self.now_ms.max(until);
                None
            }
        }
    }
}
