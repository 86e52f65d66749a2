//! RPC instrumentation subsystem.
//!
//! # Data Flow
//! ```text
//! caller (RequestContext + request)
//!     → interceptor.rs (started/received/in-flight, span)
//!     → service handler
//!     → status.rs (error → StatusCode)
//!     → interceptor.rs (handled/latency/sent, log entry, end span)
//!     → caller (result unchanged)
//! ```
//!
//! # Design Decisions
//! - Status labels are kebab-case codes, not HTTP numbers
//! - Classification prefers typed errors over message matching

pub mod interceptor;
pub mod status;

pub use interceptor::{split_method, UnaryInterceptor, UnaryServerInfo};
pub use status::{classify, ServiceError, StatusCode};
