//! Request/response filtering pipeline
//!
//! Each third-party integration is described by a [`RoutePolicy`]; a single
//! [`Forwarder`] applies any policy to an inbound request.

pub mod client_ip;
mod error;
pub mod filter;
mod forward;
mod policy;

pub use error::ForwardError;
pub use filter::InboundCookie;
pub use forward::{ForwardedResponse, Forwarder, InboundRequest};
pub use policy::{CookieMatchMode, QueryEncoding, RouteMethod, RoutePolicy};
