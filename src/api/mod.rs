mod error;
pub mod models;
mod server;
pub mod services;
pub mod state;
pub(crate) mod utils;

pub use error::{ApiError, StartupError};
pub use server::{build_scheduler, router, run};
