//! Deferred per-block updates ("scheduled ticks").
//!
//! Blocks such as falling sand or spreading water ask to be updated again a
//! few ticks later. The [`TickScheduler`] keeps those requests in a single
//! queue ordered by `(trigger tick, sequence)`. The sequence number is taken
//! from a counter owned by the scheduler at creation time, so entries that
//! fall due on the same tick replay in exactly the order they were scheduled.

use std::collections::BTreeMap;

use tracing::trace;
use voxsim_core::{BlockPos, SimTick};

use crate::BlockId;

/// Total-order key for a scheduled tick.
///
/// Derived ordering is lexicographic: earlier trigger first, then lower sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TickKey {
    /// Absolute tick at which the entry falls due.
    pub trigger: SimTick,
    /// Creation order, unique for the scheduler's lifetime.
    pub sequence: u64,
}

/// A pending state change for one block.
#[derive(Debug, Clone, Copy)]
pub struct ScheduledTick {
    /// Block identity the update was scheduled for.
    pub block_id: BlockId,
    /// World position of the block.
    pub pos: BlockPos,
    /// Absolute tick at which the entry falls due.
    pub trigger: SimTick,
    /// Creation order; never reused.
    pub sequence: u64,
}

impl ScheduledTick {
    /// Ordering key within the scheduler.
    #[inline]
    pub fn key(&self) -> TickKey {
        TickKey {
            trigger: self.trigger,
            sequence: self.sequence,
        }
    }

    /// Ticks left before this entry is due, as seen from `now`.
    #[inline]
    pub fn remaining_ticks(&self, now: SimTick) -> u64 {
        now.ticks_until(self.trigger)
    }
}

/// Two entries are the same update when identity, position and due time match.
/// The sequence number is ignored.
impl PartialEq for ScheduledTick {
    fn eq(&self, other: &Self) -> bool {
        self.block_id == other.block_id && self.pos == other.pos && self.trigger == other.trigger
    }
}

impl Eq for ScheduledTick {}

type DedupKey = (BlockPos, BlockId, SimTick);

/// Time-ordered queue of pending block updates.
#[derive(Debug, Default)]
pub struct TickScheduler {
    now: SimTick,
    next_sequence: u64,
    queue: BTreeMap<TickKey, ScheduledTick>,
    /// Number of queued entries per (pos, id, trigger).
    pending: BTreeMap<DedupKey, u32>,
}

impl TickScheduler {
    /// Create an empty scheduler at tick zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty scheduler whose clock starts at `now`.
    pub fn starting_at(now: SimTick) -> Self {
        Self {
            now,
            ..Self::default()
        }
    }

    /// Current simulation tick.
    #[inline]
    pub fn now(&self) -> SimTick {
        self.now
    }

    /// Move the clock forward by one tick, returning the new tick.
    ///
    /// Remaining-tick counts of every pending entry drop by one as a result.
    pub fn advance(&mut self) -> SimTick {
        self.now = self.now.advance(1);
        self.now
    }

    /// Queue an update `delay_ticks` from now.
    pub fn schedule(&mut self, block_id: BlockId, pos: BlockPos, delay_ticks: u32) -> ScheduledTick {
        let tick = ScheduledTick {
            block_id,
            pos,
            trigger: self.now.advance(u64::from(delay_ticks)),
            sequence: self.next_sequence,
        };
        self.next_sequence += 1;
        self.queue.insert(tick.key(), tick);
        *self.pending.entry((pos, block_id, tick.trigger)).or_insert(0) += 1;
        tick
    }

    /// Queue an update unless an equal one (same block, position and due tick) is pending.
    ///
    /// Returns whether a new entry was queued.
    pub fn schedule_unique(&mut self, block_id: BlockId, pos: BlockPos, delay_ticks: u32) -> bool {
        let trigger = self.now.advance(u64::from(delay_ticks));
        if self.pending.contains_key(&(pos, block_id, trigger)) {
            trace!(%pos, block_id, trigger = trigger.0, "duplicate tick suppressed");
            return false;
        }
        self.schedule(block_id, pos, delay_ticks);
        true
    }

    /// Whether any update for `block_id` at `pos` is pending.
    pub fn is_scheduled(&self, pos: BlockPos, block_id: BlockId) -> bool {
        self.pending
            .range((pos, block_id, SimTick::ZERO)..=(pos, block_id, SimTick(u64::MAX)))
            .next()
            .is_some()
    }

    /// Entry with the smallest `(remaining ticks, sequence)`.
    pub fn peek(&self) -> Option<&ScheduledTick> {
        self.queue.values().next()
    }

    /// Remove and return the entry with the smallest `(remaining ticks, sequence)`,
    /// whether or not it is due yet.
    pub fn pop_next(&mut self) -> Option<ScheduledTick> {
        let (_, tick) = self.queue.pop_first()?;
        self.forget(&tick);
        Some(tick)
    }

    /// Remove and return the head entry if it is due on the current tick.
    pub fn pop_due(&mut self) -> Option<ScheduledTick> {
        if self.peek()?.trigger > self.now {
            return None;
        }
        self.pop_next()
    }

    /// Pop up to `max` due entries in order.
    pub fn drain_due(&mut self, max: usize) -> Vec<ScheduledTick> {
        let mut due = Vec::new();
        while due.len() < max {
            match self.pop_due() {
                Some(tick) => due.push(tick),
                None => break,
            }
        }
        due
    }

    /// Pending entries in pop order.
    pub fn iter(&self) -> impl Iterator<Item = &ScheduledTick> + '_ {
        self.queue.values()
    }

    /// Number of pending entries.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Drop every pending entry. The clock and sequence counter are kept.
    pub fn clear(&mut self) {
        self.queue.clear();
        self.pending.clear();
    }

    fn forget(&mut self, tick: &ScheduledTick) {
        let key = (tick.pos, tick.block_id, tick.trigger);
        if let Some(count) = self.pending.get_mut(&key) {
            *count -= 1;
            if *count == 0 {
                self.pending.remove(&key);
            }
        }
    }
}
