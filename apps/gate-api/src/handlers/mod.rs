//! Handlers 模块

pub mod access;
pub mod audit;
pub mod auth;
pub mod devices;
pub mod members;
pub mod metrics;
pub mod rate_limits;

pub use access::*;
pub use audit::*;
pub use auth::*;
pub use devices::*;
pub use members::*;
pub use metrics::*;
pub use rate_limits::*;
