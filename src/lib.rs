//! Random number gateway with a pluggable observability subsystem.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod random;
pub mod rpc;

pub use config::AppConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use observability::Telemetry;
