//! HTTP gateway subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → request id (set + propagate x-request-id)
//!     → middleware.rs (span, in-flight, sizes, latency, log entry)
//!     → panic recovery, timeout
//!     → server.rs handlers (/healthz, /random)
//!     → random service via the RPC interceptor
//! ```
//!
//! # Design Decisions
//! - Status labels are numeric HTTP codes
//! - The route label is the matched route template, never the raw path

pub mod middleware;
pub mod server;

pub use middleware::{track_request, TrackingState};
pub use server::{build_router, AppState, HttpServer};
