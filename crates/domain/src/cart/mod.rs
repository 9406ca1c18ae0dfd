//! Cache-aside cart operations.

mod config;
mod service;

pub use config::CartConfig;
pub use service::CartService;
