//! Console rendering primitives for a streaming model agent.
//!
//! Text arrives as [`StyledSegment`]s, is written through a [`StyledRenderer`] to any
//! [`Terminal`], and the renderer only emits SGR sequences when the style changes.

pub mod config;
pub mod logging;
pub mod platform;
pub mod renderer;
pub mod style;
pub mod terminal;
pub mod theme;

pub use crate::config::EnvConfig;
pub use crate::platform::{install_signal_handlers, SignalHookGuard};
pub use crate::renderer::StyledRenderer;
pub use crate::style::{push_styled, StyledSegment, TextStyle};
pub use crate::terminal::{strip_sgr, CaptureTerminal, ProcessTerminal, Terminal};
pub use crate::theme::Theme;
