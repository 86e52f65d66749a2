//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → wait_for_shutdown_signal resolves
//!
//! Shutdown (shutdown.rs):
//!     trigger → gateway stops accepting, drains
//!             → exposition server stops
//!     composition root flushes the tracer last
//! ```
//!
//! # Design Decisions
//! - Ordered shutdown: stop accept, drain, flush telemetry
//! - One broadcast reaches every long-running task

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
