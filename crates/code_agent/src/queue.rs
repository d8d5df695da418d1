use std::sync::{Mutex, MutexGuard};

use crate::block::CodeBlock;

/// Ordered, thread-safe list of blocks waiting for execution.
#[derive(Debug, Default)]
pub struct PendingBlockQueue {
    blocks: Mutex<Vec<CodeBlock>>,
}

impl PendingBlockQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, block: CodeBlock) {
        self.lock().push(block);
    }

    /// Takes every queued block, in push order, leaving the queue empty.
    ///
    /// A concurrent `push` lands either in the returned batch or in the next one.
    pub fn drain_all(&self) -> Vec<CodeBlock> {
        std::mem::take(&mut *self.lock())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<CodeBlock>> {
        match self.blocks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn drain_preserves_push_order_and_empties_the_queue() {
        let queue = PendingBlockQueue::new();
        queue.push(CodeBlock::new("a", "python"));
        queue.push(CodeBlock::new("b", "shell"));

        let drained = queue.drain_all();
        assert_eq!(
            drained,
            vec![CodeBlock::new("a", "python"), CodeBlock::new("b", "shell")]
        );
        assert!(queue.is_empty());
    }

    #[test]
    fn draining_an_empty_queue_is_a_no_op() {
        let queue = PendingBlockQueue::new();
        assert!(queue.drain_all().is_empty());
        assert!(queue.drain_all().is_empty());
    }

    #[test]
    fn pushes_after_a_drain_start_a_fresh_batch() {
        let queue = PendingBlockQueue::new();
        queue.push(CodeBlock::new("old", "python"));
        let _ = queue.drain_all();
        queue.push(CodeBlock::new("new", "python"));

        assert_eq!(queue.drain_all(), vec![CodeBlock::new("new", "python")]);
    }

    #[test]
    fn concurrent_pushes_are_never_lost_or_duplicated() {
        let queue = Arc::new(PendingBlockQueue::new());
        let writers: Vec<_> = (0..4)
            .map(|writer| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    for index in 0..250 {
                        queue.push(CodeBlock::new(format!("{writer}-{index}"), "shell"));
                    }
                })
            })
            .collect();

        let mut drained = Vec::new();
        while drained.len() < 1000 {
            drained.extend(queue.drain_all());
            thread::yield_now();
        }
        for writer in writers {
            writer.join().expect("writer thread");
        }
        drained.extend(queue.drain_all());

        let mut codes: Vec<String> = drained.into_iter().map(|block| block.code).collect();
        assert_eq!(codes.len(), 1000);
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), 1000);
    }
}
