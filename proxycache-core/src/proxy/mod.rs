//! Forward proxy relay
//!
//! Turns a client connection into an upstream HTTP/1.0 GET, streams the
//! origin's answer back, and feeds small enough answers to the object cache.

pub mod headers;
pub mod io;
pub mod relay;
pub mod request;
pub mod target;

pub use headers::{HeaderRewriter, DEFAULT_USER_AGENT};
pub use relay::{OutcomeKind, RelayHandler, RelayOutcome};
pub use request::{InboundRequest, Method};
pub use target::{UpstreamTarget, DEFAULT_PORT};
