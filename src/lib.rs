pub mod api;
pub mod config;
pub mod observability;
pub mod proxy;
pub mod retrieval;
pub mod routing;
pub mod storage;
