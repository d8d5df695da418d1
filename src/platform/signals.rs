//! SIGINT/SIGTERM handling.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

#[cfg(unix)]
use signal_hook::iterator::Signals;

/// Stops the signal thread when dropped.
pub struct SignalHookGuard {
    #[cfg(unix)]
    handle: signal_hook::iterator::Handle,
    thread: Option<JoinHandle<()>>,
}

impl Drop for SignalHookGuard {
    fn drop(&mut self) {
        #[cfg(unix)]
        self.handle.close();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Runs `cleanup` once on the first SIGINT or SIGTERM.
#[cfg(unix)]
pub fn install_signal_handlers<F>(cleanup: F) -> std::io::Result<SignalHookGuard>
where
    F: Fn() + Send + Sync + 'static,
{
    let cleanup = Arc::new(cleanup);
    let ran = Arc::new(AtomicBool::new(false));
    let mut signals = Signals::new([libc::SIGINT, libc::SIGTERM])?;
    let handle = signals.handle();

    let thread = std::thread::Builder::new()
        .name("signal-watch".to_string())
        .spawn(move || {
            for signal in signals.forever() {
                tracing::info!(signal, "termination signal received");
                run_cleanup_once(&cleanup, &ran);
            }
        })?;

    Ok(SignalHookGuard {
        handle,
        thread: Some(thread),
    })
}

#[cfg(not(unix))]
pub fn install_signal_handlers<F>(_cleanup: F) -> std::io::Result<SignalHookGuard>
where
    F: Fn() + Send + Sync + 'static,
{
    Ok(SignalHookGuard { thread: None })
}

fn run_cleanup_once<F>(cleanup: &Arc<F>, ran: &AtomicBool)
where
    F: Fn() + Send + Sync + 'static + ?Sized,
{
    if !ran.swap(true, Ordering::SeqCst) {
        cleanup();
    }
}
