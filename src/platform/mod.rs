//! Process-level integrations.

pub mod signals;

pub use signals::{install_signal_handlers, SignalHookGuard};
