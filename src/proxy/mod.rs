//! Outbound proxy routing
//!
//! Every outbound call (forwarded third-party requests and asset retrieval)
//! goes through a client built by [`ProxyRouter::build_client`], which asks
//! the router for each destination whether to connect directly or via the
//! configured upstream proxy.

pub mod pattern;
mod router;
mod transport;

pub use pattern::matches;
pub use router::{HostPort, ProxyCredentials, ProxyDecision, ProxyRouter};
pub use transport::{ClientOptions, TransportError};
