//! Background thread that polls the pipeline for idle batches.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::pipeline::{ExecutionBatch, Pipeline};

/// Periodically ticks a [`Pipeline`] and hands each started batch to a callback.
///
/// The callback runs on the monitor thread and should return quickly; long work belongs on a
/// thread of its own, holding the batch until done. Dropping the monitor stops and joins it.
pub struct IdleMonitor {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl IdleMonitor {
    pub fn spawn<I, F>(
        pipeline: Arc<Pipeline>,
        poll_interval: Duration,
        is_initialized: I,
        mut on_batch: F,
    ) -> std::io::Result<Self>
    where
        I: Fn() -> bool + Send + 'static,
        F: FnMut(ExecutionBatch) + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name("idle-monitor".to_string())
            .spawn(move || {
                while !thread_stop.load(Ordering::SeqCst) {
                    thread::park_timeout(poll_interval);
                    if thread_stop.load(Ordering::SeqCst) {
                        break;
                    }
                    if let Some(batch) = pipeline.tick(is_initialized()) {
                        tracing::info!(blocks = batch.len(), "idle threshold reached");
                        on_batch(batch);
                    }
                }
                tracing::debug!("idle monitor stopped");
            })?;

        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    /// Stops polling and waits for the thread to exit. Idempotent.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            handle.thread().unpark();
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }
}

impl Drop for IdleMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;
    use std::time::Instant;

    use super::*;
    use crate::block::CodeBlock;

    #[test]
    fn monitor_delivers_one_batch_after_idle_period() {
        let pipeline = Arc::new(Pipeline::new(Duration::from_millis(50)));
        pipeline.push(CodeBlock::new("echo hi", "shell"));
        pipeline.record_activity();

        let (tx, rx) = mpsc::channel();
        let mut monitor = IdleMonitor::spawn(
            Arc::clone(&pipeline),
            Duration::from_millis(5),
            || true,
            move |batch| {
                let _ = tx.send(batch);
            },
        )
        .expect("spawn monitor");

        let started = Instant::now();
        let batch = rx
            .recv_timeout(Duration::from_secs(5))
            .expect("batch delivered");
        assert!(started.elapsed() >= Duration::from_millis(40));
        assert_eq!(batch.blocks(), &[CodeBlock::new("echo hi", "shell")]);

        // The held batch keeps later ticks from starting another one.
        pipeline.push(CodeBlock::new("echo again", "shell"));
        assert!(rx.recv_timeout(Duration::from_millis(150)).is_err());

        drop(batch);
        let second = rx
            .recv_timeout(Duration::from_secs(5))
            .expect("second batch");
        assert_eq!(second.len(), 1);

        monitor.stop();
        assert!(!monitor.is_running());
    }

    #[test]
    fn monitor_waits_for_initialization() {
        let pipeline = Arc::new(Pipeline::new(Duration::ZERO));
        pipeline.push(CodeBlock::new("echo hi", "shell"));

        let (tx, rx) = mpsc::channel();
        let _monitor = IdleMonitor::spawn(
            Arc::clone(&pipeline),
            Duration::from_millis(5),
            || false,
            move |batch| {
                let _ = tx.send(batch.len());
            },
        )
        .expect("spawn monitor");

        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
        assert_eq!(pipeline.pending(), 1);
    }
}
