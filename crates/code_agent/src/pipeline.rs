//! Owner of the cross-thread pipeline state: pending blocks, activity clock and the
//! in-flight flag.
//!
//! [`Pipeline::tick`] is the only place a batch is started, and the flag it sets is held by an
//! [`InFlightGuard`] inside the returned [`ExecutionBatch`], so at most one batch exists at a
//! time and the flag clears when the batch owner drops it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::block::CodeBlock;
use crate::clock::ActivityClock;
use crate::queue::PendingBlockQueue;

pub const DEFAULT_IDLE_THRESHOLD: Duration = Duration::from_millis(1000);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug)]
pub struct Pipeline {
    queue: PendingBlockQueue,
    clock: ActivityClock,
    in_flight: Arc<AtomicBool>,
    idle_threshold: Duration,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new(DEFAULT_IDLE_THRESHOLD)
    }
}

impl Pipeline {
    #[must_use]
    pub fn new(idle_threshold: Duration) -> Self {
        Self {
            queue: PendingBlockQueue::new(),
            clock: ActivityClock::new(),
            in_flight: Arc::new(AtomicBool::new(false)),
            idle_threshold,
        }
    }

    #[must_use]
    pub fn idle_threshold(&self) -> Duration {
        self.idle_threshold
    }

    pub fn push(&self, block: CodeBlock) {
        self.queue.push(block);
    }

    /// Stamps the activity clock for a received chunk.
    pub fn record_activity(&self) {
        self.clock.stamp();
    }

    pub fn record_activity_at(&self, instant: Instant) {
        self.clock.stamp_at(instant);
    }

    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    #[must_use]
    pub fn is_executing(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn tick(&self, initialized: bool) -> Option<ExecutionBatch> {
        self.tick_at(Instant::now(), initialized)
    }

    /// Starts a batch when the stream has been idle for the threshold, the model is
    /// initialized, no batch is in flight and blocks are pending.
    ///
    /// An empty queue leaves the in-flight flag untouched.
    pub fn tick_at(&self, now: Instant, initialized: bool) -> Option<ExecutionBatch> {
        if self.clock.elapsed_at(now) < self.idle_threshold || !initialized {
            return None;
        }
        if self.queue.is_empty() {
            return None;
        }
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return None;
        }

        let guard = InFlightGuard {
            flag: Arc::clone(&self.in_flight),
        };
        let blocks = self.queue.drain_all();
        if blocks.is_empty() {
            return None;
        }
        Some(ExecutionBatch { blocks, guard })
    }
}

/// Clears the in-flight flag when dropped.
#[derive(Debug)]
pub struct InFlightGuard {
    flag: Arc<AtomicBool>,
}

impl InFlightGuard {
    /// Clears the flag now. Equivalent to dropping the guard.
    pub fn release(self) {}
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Blocks drained by one tick, plus the right to be the only running batch.
#[derive(Debug)]
pub struct ExecutionBatch {
    blocks: Vec<CodeBlock>,
    guard: InFlightGuard,
}

impl ExecutionBatch {
    #[must_use]
    pub fn blocks(&self) -> &[CodeBlock] {
        &self.blocks
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Hands the blocks to the dispatcher. The batch stays in flight until the guard drops.
    #[must_use]
    pub fn into_parts(self) -> (Vec<CodeBlock>, InFlightGuard) {
        (self.blocks, self.guard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn idle_pipeline() -> (Pipeline, Instant) {
        let pipeline = Pipeline::new(Duration::from_millis(1000));
        let base = Instant::now();
        pipeline.record_activity_at(base);
        (pipeline, base)
    }

    fn after(base: Instant, millis: u64) -> Instant {
        base + Duration::from_millis(millis)
    }

    #[test]
    fn tick_waits_for_the_idle_threshold() {
        let (pipeline, base) = idle_pipeline();
        pipeline.push(CodeBlock::new("ls", "shell"));

        assert!(pipeline.tick_at(after(base, 999), true).is_none());
        let batch = pipeline.tick_at(after(base, 1000), true).expect("batch at threshold");
        assert_eq!(batch.blocks(), &[CodeBlock::new("ls", "shell")]);
        assert!(pipeline.is_executing());
    }

    #[test]
    fn tick_requires_an_initialized_model() {
        let (pipeline, base) = idle_pipeline();
        pipeline.push(CodeBlock::new("ls", "shell"));

        assert!(pipeline.tick_at(after(base, 5000), false).is_none());
        assert_eq!(pipeline.pending(), 1);
        assert!(!pipeline.is_executing());
    }

    #[test]
    fn empty_queue_never_sets_the_in_flight_flag() {
        let (pipeline, base) = idle_pipeline();
        assert!(pipeline.tick_at(after(base, 5000), true).is_none());
        assert!(!pipeline.is_executing());
    }

    #[test]
    fn second_tick_is_a_no_op_while_a_batch_is_in_flight() {
        let (pipeline, base) = idle_pipeline();
        pipeline.push(CodeBlock::new("one", "python"));
        let first = pipeline.tick_at(after(base, 1500), true).expect("first batch");

        pipeline.push(CodeBlock::new("two", "python"));
        assert!(pipeline.tick_at(after(base, 1600), true).is_none());
        assert_eq!(pipeline.pending(), 1);

        let (blocks, guard) = first.into_parts();
        assert_eq!(blocks.len(), 1);
        assert!(pipeline.is_executing());
        guard.release();
        assert!(!pipeline.is_executing());

        let second = pipeline.tick_at(after(base, 1700), true).expect("second batch");
        assert_eq!(second.blocks(), &[CodeBlock::new("two", "python")]);
    }

    #[test]
    fn activity_postpones_execution() {
        let (pipeline, base) = idle_pipeline();
        pipeline.push(CodeBlock::new("ls", "shell"));
        pipeline.record_activity_at(after(base, 900));

        assert!(pipeline.tick_at(after(base, 1500), true).is_none());
        assert!(pipeline.tick_at(after(base, 1900), true).is_some());
    }

    #[test]
    fn dropping_a_batch_clears_the_flag() {
        let (pipeline, base) = idle_pipeline();
        pipeline.push(CodeBlock::new("ls", "shell"));
        let batch = pipeline.tick_at(after(base, 2000), true).expect("batch");
        assert_eq!(batch.len(), 1);
        drop(batch);
        assert!(!pipeline.is_executing());
    }
}
